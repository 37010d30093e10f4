//! PRF-n from IEEE Std 802.11-2016, 12.7.1.2, built on HMAC-SHA1.

use crypto::hmac::Hmac;
use crypto::mac::Mac;
use crypto::sha1::Sha1;

use crate::Error;

/// Derives `bits` bits of keying material. `bits` must be a multiple of 8.
pub fn prf(k: &[u8], a: &str, b: &[u8], bits: usize) -> Result<Vec<u8>, Error> {
    if bits % 8 != 0 {
        return Err(Error::UnsupportedCipherSuite);
    }
    let bytes = bits / 8;
    let iterations = (bytes + 19) / 20;
    let mut result = Vec::with_capacity(iterations * 20);
    for i in 0..iterations {
        let mut hmac = Hmac::new(Sha1::new(), k);
        hmac.input(a.as_bytes());
        hmac.input(&[0u8]);
        hmac.input(b);
        hmac.input(&[i as u8]);
        result.extend_from_slice(hmac.result().code());
    }
    result.truncate(bytes);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex::FromHex;

    // IEEE Std 802.11-2016, J.3.2, Test case 1
    #[test]
    fn test_prf_192() {
        let key = Vec::from_hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b").unwrap();
        let actual = prf(&key[..], "prefix", "Hi There".as_bytes(), 192).unwrap();
        let expected =
            Vec::from_hex("bcd4c650b30b9684951829e0d75f9d54b862175ed9f00606").unwrap();
        assert_eq!(actual, expected);
    }

    // IEEE Std 802.11-2016, J.3.2, Test case 2
    #[test]
    fn test_prf_jefe() {
        let actual = prf(
            "Jefe".as_bytes(),
            "prefix-2",
            "what do ya want for nothing?".as_bytes(),
            256,
        )
        .unwrap();
        let expected = Vec::from_hex(
            "47c4908e30c947521ad20be9053450ecbea23d3aa604b77326d8b3825ff7475c",
        )
        .unwrap();
        assert_eq!(actual, expected);
    }

    // IEEE Std 802.11-2016, J.3.2, Test case 3
    #[test]
    fn test_prf_384() {
        let key = Vec::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let data: Vec<u8> = ::std::iter::repeat(0xdd).take(50).collect();
        let actual = prf(&key[..], "prefix-3", &data[..], 384).unwrap();
        let expected = Vec::from_hex(
            "0ab6c33ccf70d0d736f4b04c8a7373255511abc5073713163bd0b8c9eeb7e1956fa066820a73ddee3f6d3bd407e0682a",
        )
        .unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_prf_rejects_partial_bytes() {
        prf(&[0u8; 16][..], "prefix", &[][..], 100).expect_err("expected bit-count error");
    }
}
