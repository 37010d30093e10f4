//! KDF-Hash-Length from IEEE Std 802.11-2016, 12.7.1.7.2, over HMAC-SHA256.
//! Used by SHA256-based AKMs and the FT key hierarchy.

use byteorder::{ByteOrder, LittleEndian};
use crypto::hmac::Hmac;
use crypto::mac::Mac;
use crypto::sha2::Sha256;

/// Derives `bits` bits of keying material; `bits` is rounded up to whole
/// bytes internally and the result truncated.
pub fn kdf_sha256(k: &[u8], label: &str, context: &[u8], bits: usize) -> Vec<u8> {
    let bytes = (bits + 7) / 8;
    let iterations = (bytes + 31) / 32;
    let mut length = [0u8; 2];
    LittleEndian::write_u16(&mut length, bits as u16);
    let mut result = Vec::with_capacity(iterations * 32);
    for i in 1..=iterations as u16 {
        let mut counter = [0u8; 2];
        LittleEndian::write_u16(&mut counter, i);
        let mut hmac = Hmac::new(Sha256::new(), k);
        hmac.input(&counter[..]);
        hmac.input(label.as_bytes());
        hmac.input(context);
        hmac.input(&length[..]);
        result.extend_from_slice(hmac.result().code());
    }
    result.truncate(bytes);
    result
}
