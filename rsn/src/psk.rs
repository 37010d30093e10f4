//! PSK derivation from a passphrase, IEEE Std 802.11-2016, J.4.1.

use crypto::hmac::Hmac;
use crypto::pbkdf2::pbkdf2;
use crypto::sha1::Sha1;

use crate::Error;

pub type Psk = Box<[u8]>;

const ITERATIONS: u32 = 4096;

/// PSK = PBKDF2-HMAC-SHA1(passphrase, ssid, 4096, 256 bits).
pub fn compute(passphrase: &[u8], ssid: &[u8]) -> Result<Psk, Error> {
    // IEEE Std 802.11-2016, J.4.1 limits the passphrase to printable ASCII.
    if passphrase.len() < 8 || passphrase.len() > 63 {
        return Err(Error::InvalidPassphraseLen(passphrase.len()));
    }
    if passphrase.iter().any(|c| *c < 32 || *c > 126) {
        return Err(Error::InvalidPassphraseChar);
    }
    if ssid.len() > 32 {
        return Err(Error::InvalidSsidLen(ssid.len()));
    }

    let mut hmac = Hmac::new(Sha1::new(), passphrase);
    let mut psk = vec![0u8; 32];
    pbkdf2(&mut hmac, ssid, ITERATIONS, &mut psk[..]);
    Ok(psk.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex::FromHex;

    // IEEE Std 802.11-2016, J.4.2, Test case 1
    #[test]
    fn test_psk_ieee_test_case_1() {
        let actual = compute("password".as_bytes(), "IEEE".as_bytes()).unwrap();
        let expected = Vec::from_hex(
            "f42c6fc52df0ebef9ebb4b90b38a5f902e83fe1b135a70e23aed762e9710a12e",
        )
        .unwrap();
        assert_eq!(&actual[..], &expected[..]);
    }

    // IEEE Std 802.11-2016, J.4.2, Test case 2
    #[test]
    fn test_psk_ieee_test_case_2() {
        let actual = compute("ThisIsAPassword".as_bytes(), "ThisIsASSID".as_bytes()).unwrap();
        let expected = Vec::from_hex(
            "0dc0d6eb90555ed6419756b9a15ec3e3209b63df707dd508d14581f8982721af",
        )
        .unwrap();
        assert_eq!(&actual[..], &expected[..]);
    }

    #[test]
    fn test_psk_too_short_passphrase() {
        compute("short".as_bytes(), "Net".as_bytes()).expect_err("expected length error");
    }

    #[test]
    fn test_psk_too_long_passphrase() {
        let passphrase: Vec<u8> = ::std::iter::repeat(b'a').take(64).collect();
        compute(&passphrase[..], "Net".as_bytes()).expect_err("expected length error");
    }

    #[test]
    fn test_psk_non_ascii_passphrase() {
        compute("pässword12".as_bytes(), "Net".as_bytes()).expect_err("expected ASCII error");
    }
}
