//! EAPOL Key Data encryption, selected by the negotiated AKM.
//! IEEE Std 802.11-2016, 12.7.2, Table 12-7.

use byteorder::{BigEndian, ByteOrder};
use crypto::aessafe::{AesSafe128Decryptor, AesSafe128Encryptor};
use crypto::symmetriccipher::{BlockDecryptor, BlockEncryptor};

use wifi_common::ie::rsn::akm::{self, Akm};

use crate::Error;

pub trait KeywrapAlgorithm {
    fn wrap(&self, kek: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>;
    fn unwrap(&self, kek: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>;
}

pub fn keywrap_algorithm(akm: &Akm) -> Option<Box<dyn KeywrapAlgorithm>> {
    if !akm.has_known_algorithm() {
        return None;
    }
    match akm.suite_type {
        akm::EAP | akm::PSK | akm::FT_EAP | akm::FT_PSK | akm::EAP_SHA256 | akm::PSK_SHA256 => {
            Some(Box::new(NistAes {}))
        }
        _ => None,
    }
}

/// NIST AES key wrap, RFC 3394, with a 128-bit KEK.
pub struct NistAes;

const DEFAULT_IV: [u8; 8] = [0xA6; 8];

impl KeywrapAlgorithm for NistAes {
    fn wrap(&self, kek: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        if kek.len() != 16 {
            return Err(Error::WrongAesKeywrapKey);
        }
        if data.len() < 16 || data.len() % 8 != 0 {
            return Err(Error::InvalidAesKeywrapDataLength(data.len()));
        }
        let encryptor = AesSafe128Encryptor::new(kek);
        let n = data.len() / 8;

        let mut a = DEFAULT_IV;
        let mut r = data.to_vec();
        let mut block_in = [0u8; 16];
        let mut block_out = [0u8; 16];
        for j in 0..6 {
            for i in 1..=n {
                block_in[..8].copy_from_slice(&a[..]);
                block_in[8..].copy_from_slice(&r[(i - 1) * 8..i * 8]);
                encryptor.encrypt_block(&block_in, &mut block_out);
                let t = (n * j + i) as u64;
                a.copy_from_slice(&block_out[..8]);
                let a_val = BigEndian::read_u64(&a[..]) ^ t;
                BigEndian::write_u64(&mut a[..], a_val);
                r[(i - 1) * 8..i * 8].copy_from_slice(&block_out[8..]);
            }
        }

        let mut out = Vec::with_capacity(8 + data.len());
        out.extend_from_slice(&a[..]);
        out.extend_from_slice(&r[..]);
        Ok(out)
    }

    fn unwrap(&self, kek: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        if kek.len() != 16 {
            return Err(Error::WrongAesKeywrapKey);
        }
        if data.len() < 24 || data.len() % 8 != 0 {
            return Err(Error::InvalidAesKeywrapDataLength(data.len()));
        }
        let decryptor = AesSafe128Decryptor::new(kek);
        let n = data.len() / 8 - 1;

        let mut a = [0u8; 8];
        a.copy_from_slice(&data[..8]);
        let mut r = data[8..].to_vec();
        let mut block_in = [0u8; 16];
        let mut block_out = [0u8; 16];
        for j in (0..6).rev() {
            for i in (1..=n).rev() {
                let t = (n * j + i) as u64;
                let a_val = BigEndian::read_u64(&a[..]) ^ t;
                BigEndian::write_u64(&mut a[..], a_val);
                block_in[..8].copy_from_slice(&a[..]);
                block_in[8..].copy_from_slice(&r[(i - 1) * 8..i * 8]);
                decryptor.decrypt_block(&block_in, &mut block_out);
                a.copy_from_slice(&block_out[..8]);
                r[(i - 1) * 8..i * 8].copy_from_slice(&block_out[8..]);
            }
        }

        if a != DEFAULT_IV {
            return Err(Error::WrongAesKeywrapKey);
        }
        Ok(r)
    }
}
