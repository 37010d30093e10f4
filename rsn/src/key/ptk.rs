//! Pairwise Transient Key derivation, IEEE Std 802.11-2016, 12.7.1.3.

use std::cmp::{max, min};
use zeroize::Zeroize;

use wifi_common::ie::rsn::akm::Akm;
use wifi_common::ie::rsn::cipher::Cipher;
use wifi_common::MacAddr;

use crate::crypto_utils::{kdf, prf};
use crate::Error;

/// KCK | KEK | TK as one zeroized-on-drop buffer with typed accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Ptk {
    ptk: Vec<u8>,
    kck_len: usize,
    kek_len: usize,
    tk_len: usize,
    pub cipher: Cipher,
}

impl Ptk {
    /// PTK = PRF(PMK, "Pairwise key expansion",
    ///           min(AA,SPA) || max(AA,SPA) || min(ANonce,SNonce) || max(...))
    pub fn new(
        pmk: &[u8],
        aa: &MacAddr,
        spa: &MacAddr,
        anonce: &[u8],
        snonce: &[u8],
        akm: &Akm,
        cipher: Cipher,
    ) -> Result<Ptk, Error> {
        if pmk.len() != 32 {
            return Err(Error::InvalidPmkLen(pmk.len()));
        }
        if anonce.len() != 32 {
            return Err(Error::InvalidNonceLen(anonce.len()));
        }
        if snonce.len() != 32 {
            return Err(Error::InvalidNonceLen(snonce.len()));
        }
        let kck_len = akm.kck_bytes().ok_or(Error::UnsupportedAkmSuite)?;
        let kek_len = akm.kek_bytes().ok_or(Error::UnsupportedAkmSuite)?;
        let tk_len = cipher.tk_bytes().ok_or(Error::UnsupportedCipherSuite)?;

        let mut data = Vec::with_capacity(12 + 64);
        data.extend_from_slice(&min(aa, spa)[..]);
        data.extend_from_slice(&max(aa, spa)[..]);
        data.extend_from_slice(min(anonce, snonce));
        data.extend_from_slice(max(anonce, snonce));

        let bits = (kck_len + kek_len + tk_len) * 8;
        let ptk = if akm.uses_sha256() {
            kdf::kdf_sha256(pmk, "Pairwise key expansion", &data[..], bits)
        } else {
            prf::prf(pmk, "Pairwise key expansion", &data[..], bits)?
        };
        data.zeroize();
        Ok(Ptk { ptk, kck_len, kek_len, tk_len, cipher })
    }

    /// Wraps pre-derived PTK bytes, e.g. from the FT key hierarchy.
    pub fn from_raw(
        ptk: Vec<u8>,
        kck_len: usize,
        kek_len: usize,
        tk_len: usize,
        cipher: Cipher,
    ) -> Result<Ptk, Error> {
        if ptk.len() != kck_len + kek_len + tk_len {
            return Err(Error::InvalidPmkLen(ptk.len()));
        }
        Ok(Ptk { ptk, kck_len, kek_len, tk_len, cipher })
    }

    pub fn kck(&self) -> &[u8] {
        &self.ptk[..self.kck_len]
    }

    pub fn kek(&self) -> &[u8] {
        &self.ptk[self.kck_len..self.kck_len + self.kek_len]
    }

    pub fn tk(&self) -> &[u8] {
        &self.ptk[self.kck_len + self.kek_len..]
    }
}

impl Drop for Ptk {
    fn drop(&mut self) {
        self.ptk.zeroize();
    }
}
