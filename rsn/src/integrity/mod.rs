//! EAPOL-Key MIC algorithms, selected by the negotiated AKM.
//! IEEE Std 802.11-2016, 12.7.3, Table 12-8.

use crypto::aessafe::AesSafe128Encryptor;
use crypto::hmac::Hmac;
use crypto::mac::Mac;
use crypto::sha1::Sha1;
use crypto::symmetriccipher::BlockEncryptor;

use wifi_common::ie::rsn::akm::{self, Akm};

use crate::Error;

pub trait IntegrityAlgorithm {
    fn compute(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>;

    fn verify(&self, key: &[u8], data: &[u8], expected: &[u8]) -> bool {
        match self.compute(key, data) {
            // Truncate to the expected size; AKMs cut the MIC to 128 bits.
            Ok(mic) => !expected.is_empty()
                && mic.len() >= expected.len()
                && constant_time_eq(&mic[..expected.len()], expected),
            Err(_) => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn integrity_algorithm(akm: &Akm) -> Option<Box<dyn IntegrityAlgorithm>> {
    if !akm.has_known_algorithm() {
        return None;
    }
    match akm.suite_type {
        akm::EAP | akm::PSK => Some(Box::new(HmacSha1 {})),
        akm::FT_EAP | akm::FT_PSK | akm::EAP_SHA256 | akm::PSK_SHA256 => {
            Some(Box::new(CmacAes128 {}))
        }
        _ => None,
    }
}

/// HMAC-SHA1; the caller truncates the 20-byte output to the AKM's MIC size.
pub struct HmacSha1;

impl IntegrityAlgorithm for HmacSha1 {
    fn compute(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut hmac = Hmac::new(Sha1::new(), key);
        hmac.input(data);
        Ok(hmac.result().code().to_vec())
    }
}

/// AES-128-CMAC, NIST SP 800-38B / RFC 4493.
pub struct CmacAes128;

const CMAC_RB: u8 = 0x87;

fn shift_left_one(block: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = block[i] << 1;
        if i < 15 && block[i + 1] & 0x80 != 0 {
            out[i] |= 1;
        }
    }
    out
}

fn generate_subkey(encryptor: &AesSafe128Encryptor) -> ([u8; 16], [u8; 16]) {
    let mut l = [0u8; 16];
    encryptor.encrypt_block(&[0u8; 16], &mut l);

    let mut k1 = shift_left_one(&l);
    if l[0] & 0x80 != 0 {
        k1[15] ^= CMAC_RB;
    }
    let mut k2 = shift_left_one(&k1);
    if k1[0] & 0x80 != 0 {
        k2[15] ^= CMAC_RB;
    }
    (k1, k2)
}

impl IntegrityAlgorithm for CmacAes128 {
    fn compute(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        if key.len() != 16 {
            return Err(Error::InvalidMicSize);
        }
        let encryptor = AesSafe128Encryptor::new(key);
        let (k1, k2) = generate_subkey(&encryptor);

        let n_blocks = (data.len() + 15) / 16;
        let (full_blocks, last_complete) =
            if n_blocks == 0 { (0, false) } else { (n_blocks - 1, data.len() % 16 == 0) };

        let mut x = [0u8; 16];
        for block in 0..full_blocks {
            let mut y = [0u8; 16];
            for i in 0..16 {
                y[i] = x[i] ^ data[block * 16 + i];
            }
            encryptor.encrypt_block(&y, &mut x);
        }

        let mut last = [0u8; 16];
        if last_complete {
            let offset = full_blocks * 16;
            for i in 0..16 {
                last[i] = data[offset + i] ^ k1[i];
            }
        } else {
            let offset = full_blocks * 16;
            let remainder = data.len() - offset;
            last[..remainder].copy_from_slice(&data[offset..]);
            last[remainder] = 0x80;
            for i in 0..16 {
                last[i] ^= k2[i];
            }
        }

        let mut y = [0u8; 16];
        for i in 0..16 {
            y[i] = x[i] ^ last[i];
        }
        let mut mic = [0u8; 16];
        encryptor.encrypt_block(&y, &mut mic);
        Ok(mic.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex::FromHex;

    // RFC 2202, Test case 1
    #[test]
    fn test_hmac_sha1() {
        let key = Vec::from_hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b").unwrap();
        let mic = HmacSha1 {}.compute(&key[..], "Hi There".as_bytes()).unwrap();
        let expected = Vec::from_hex("b617318655057264e28bc0b6fb378c8ef146be00").unwrap();
        assert_eq!(mic, expected);
        assert!(HmacSha1 {}.verify(&key[..], "Hi There".as_bytes(), &expected[..16]));
    }

    // RFC 4493, Example 1: empty message
    #[test]
    fn test_cmac_empty() {
        let key = Vec::from_hex("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let mic = CmacAes128 {}.compute(&key[..], &[]).unwrap();
        let expected = Vec::from_hex("bb1d6929e95937287fa37d129b756746").unwrap();
        assert_eq!(mic, expected);
    }

    // RFC 4493, Example 2: 16-byte message
    #[test]
    fn test_cmac_one_block() {
        let key = Vec::from_hex("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let data = Vec::from_hex("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let mic = CmacAes128 {}.compute(&key[..], &data[..]).unwrap();
        let expected = Vec::from_hex("070a16b46b4d4144f79bdd9dd04a287c").unwrap();
        assert_eq!(mic, expected);
    }

    // RFC 4493, Example 3: 40-byte message
    #[test]
    fn test_cmac_partial_block() {
        let key = Vec::from_hex("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let data = Vec::from_hex(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5130c81c46a35ce411",
        )
        .unwrap();
        let mic = CmacAes128 {}.compute(&key[..], &data[..]).unwrap();
        let expected = Vec::from_hex("dfa66747de9ae63030ca32611497c827").unwrap();
        assert_eq!(mic, expected);
    }

    #[test]
    fn test_algorithm_selection() {
        use wifi_common::ie::rsn::akm::Akm;
        assert!(integrity_algorithm(&Akm::new_dot11(akm::PSK)).is_some());
        assert!(integrity_algorithm(&Akm::new_dot11(akm::FT_PSK)).is_some());
        assert!(integrity_algorithm(&Akm::new_dot11(200)).is_none());
    }

    #[test]
    fn test_verify_rejects_wrong_mic() {
        let key = [0x0b; 20];
        assert!(!HmacSha1 {}.verify(&key[..], b"Hi There", &[0u8; 16]));
    }
}
