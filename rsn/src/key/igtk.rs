//! Integrity GTK for protected management frames.

use zeroize::Zeroize;

use wifi_common::ie::rsn::cipher::Cipher;

use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Igtk {
    igtk: Vec<u8>,
    pub key_id: u16,
    pub ipn: [u8; 6],
    pub cipher: Cipher,
}

impl Igtk {
    pub fn from_kde(payload: &[u8], cipher: Cipher) -> Result<Igtk, Error> {
        // IGTK KDE: KeyID (2) || IPN (6) || IGTK.
        if payload.len() < 8 {
            return Err(Error::InvalidKeyData("IGTK KDE too short"));
        }
        let tk_len = cipher.tk_bytes().ok_or(Error::UnsupportedCipherSuite)?;
        if payload.len() != 8 + tk_len {
            return Err(Error::InvalidKeyData("IGTK length does not match cipher"));
        }
        let key_id = u16::from_le_bytes([payload[0], payload[1]]);
        let mut ipn = [0u8; 6];
        ipn.copy_from_slice(&payload[2..8]);
        Ok(Igtk { igtk: payload[8..].to_vec(), key_id, ipn, cipher })
    }

    pub fn tk(&self) -> &[u8] {
        &self.igtk[..]
    }
}

impl Drop for Igtk {
    fn drop(&mut self) {
        self.igtk.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_common::ie::rsn::cipher;

    #[test]
    fn parse_igtk_kde() {
        let mut payload = vec![4, 0, 1, 2, 3, 4, 5, 6];
        payload.extend_from_slice(&[0xEE; 16]);
        let igtk = Igtk::from_kde(&payload[..], Cipher::new_dot11(cipher::BIP_CMAC_128))
            .expect("error parsing IGTK KDE");
        assert_eq!(igtk.key_id, 4);
        assert_eq!(igtk.ipn, [1, 2, 3, 4, 5, 6]);
        assert_eq!(igtk.tk(), &[0xEE; 16][..]);
    }

    #[test]
    fn reject_short_kde() {
        assert!(Igtk::from_kde(&[0u8; 7], Cipher::new_dot11(cipher::BIP_CMAC_128)).is_err());
    }
}
