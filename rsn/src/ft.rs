//! Fast BSS Transition key hierarchy, IEEE Std 802.11-2016, 12.7.1.7.

use crypto::digest::Digest;
use crypto::sha2::Sha256;
use zeroize::Zeroize;

use wifi_common::ie::rsn::akm::Akm;
use wifi_common::ie::rsn::cipher::Cipher;
use wifi_common::MacAddr;

use crate::crypto_utils::kdf::kdf_sha256;
use crate::integrity::{CmacAes128, IntegrityAlgorithm};
use crate::key::ptk::Ptk;
use crate::Error;

/// First-level key and its name, held by the R0 key holder.
#[derive(Debug, Clone, PartialEq)]
pub struct PmkR0 {
    key: Vec<u8>,
    pub name: [u8; 16],
}

impl PmkR0 {
    pub fn key(&self) -> &[u8] {
        &self.key[..]
    }
}

impl Drop for PmkR0 {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Second-level key bound to one target AP (R1 key holder).
#[derive(Debug, Clone, PartialEq)]
pub struct PmkR1 {
    key: Vec<u8>,
    pub name: [u8; 16],
}

impl PmkR1 {
    pub fn key(&self) -> &[u8] {
        &self.key[..]
    }
}

impl Drop for PmkR1 {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn sha256_truncate_128(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.input(part);
    }
    let mut digest = [0u8; 32];
    hasher.result(&mut digest);
    let mut name = [0u8; 16];
    name.copy_from_slice(&digest[..16]);
    name
}

/// IEEE Std 802.11-2016, 12.7.1.7.3. For a PSK AKM the XXKey is the PSK.
pub fn derive_pmk_r0(
    xxkey: &[u8],
    ssid: &[u8],
    mdid: u16,
    r0kh_id: &[u8],
    s0kh_id: &MacAddr,
) -> Result<PmkR0, Error> {
    if xxkey.len() != 32 {
        return Err(Error::InvalidPmkLen(xxkey.len()));
    }
    if r0kh_id.is_empty() || r0kh_id.len() > 48 {
        return Err(Error::InvalidKhIdLen);
    }
    if ssid.len() > 32 {
        return Err(Error::InvalidSsidLen(ssid.len()));
    }

    let mut context = Vec::with_capacity(1 + ssid.len() + 2 + 1 + r0kh_id.len() + 6);
    context.push(ssid.len() as u8);
    context.extend_from_slice(ssid);
    context.extend_from_slice(&mdid.to_le_bytes()[..]);
    context.push(r0kh_id.len() as u8);
    context.extend_from_slice(r0kh_id);
    context.extend_from_slice(&s0kh_id[..]);

    // R0-Key-Data = KDF-384(XXKey, "FT-R0", context); the trailing 16 bytes
    // salt the key name.
    let mut r0_key_data = kdf_sha256(xxkey, "FT-R0", &context[..], 384);
    let key = r0_key_data[..32].to_vec();
    let name = sha256_truncate_128(&[b"FT-R0N", &r0_key_data[32..48]]);
    r0_key_data.zeroize();
    Ok(PmkR0 { key, name })
}

/// IEEE Std 802.11-2016, 12.7.1.7.4.
pub fn derive_pmk_r1(pmk_r0: &PmkR0, r1kh_id: &MacAddr, s1kh_id: &MacAddr) -> PmkR1 {
    let mut context = Vec::with_capacity(12);
    context.extend_from_slice(&r1kh_id[..]);
    context.extend_from_slice(&s1kh_id[..]);
    let key = kdf_sha256(pmk_r0.key(), "FT-R1", &context[..], 256);
    let name = sha256_truncate_128(&[b"FT-R1N", &pmk_r0.name[..], &r1kh_id[..], &s1kh_id[..]]);
    PmkR1 { key, name }
}

/// IEEE Std 802.11-2016, 12.7.1.7.5: the FT PTK is derived over both nonces
/// and both addresses, without the min/max reordering of the plain 4-Way
/// derivation.
pub fn derive_ft_ptk(
    pmk_r1: &PmkR1,
    snonce: &[u8; 32],
    anonce: &[u8; 32],
    bssid: &MacAddr,
    sta_addr: &MacAddr,
    akm: &Akm,
    cipher: Cipher,
) -> Result<Ptk, Error> {
    let kck_len = akm.kck_bytes().ok_or(Error::UnsupportedAkmSuite)?;
    let kek_len = akm.kek_bytes().ok_or(Error::UnsupportedAkmSuite)?;
    let tk_len = cipher.tk_bytes().ok_or(Error::UnsupportedCipherSuite)?;

    let mut context = Vec::with_capacity(64 + 12);
    context.extend_from_slice(&snonce[..]);
    context.extend_from_slice(&anonce[..]);
    context.extend_from_slice(&bssid[..]);
    context.extend_from_slice(&sta_addr[..]);

    let bits = (kck_len + kek_len + tk_len) * 8;
    let ptk = kdf_sha256(pmk_r1.key(), "FT-PTK", &context[..], bits);
    Ptk::from_raw(ptk, kck_len, kek_len, tk_len, cipher)
}

/// FTE MIC for the reassociation exchange, IEEE Std 802.11-2016, 13.8.4 and
/// 13.8.5: AES-128-CMAC over the station address, the target AP address, the
/// transaction sequence number, and the verbatim RSNE, MDE and FTE (the
/// latter with a zeroed MIC field).
pub fn compute_ft_mic(
    kck: &[u8],
    sta_addr: &MacAddr,
    target_addr: &MacAddr,
    trans_seq_num: u8,
    rsne: &[u8],
    mde: &[u8],
    fte_zero_mic: &[u8],
) -> Result<[u8; 16], Error> {
    let mut data =
        Vec::with_capacity(13 + rsne.len() + mde.len() + fte_zero_mic.len());
    data.extend_from_slice(&sta_addr[..]);
    data.extend_from_slice(&target_addr[..]);
    data.push(trans_seq_num);
    data.extend_from_slice(rsne);
    data.extend_from_slice(mde);
    data.extend_from_slice(fte_zero_mic);

    let mic = CmacAes128 {}.compute(kck, &data[..])?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&mic[..16]);
    Ok(out)
}
