//! Nonce generation per IEEE Std 802.11-2016, 12.7.5.

use crypto::digest::Digest;
use crypto::sha2::Sha256;
use rand::RngCore;
use std::sync::{Arc, Mutex};

use crate::Error;

/// Produces unique 32-byte nonces for one device. The reader mixes a random
/// key, the device address and a monotonic counter so that nonces never
/// repeat even across associations. Cloning shares the counter.
#[derive(Clone, Debug)]
pub struct NonceReader {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug)]
struct Inner {
    key: [u8; 32],
    addr: [u8; 6],
    counter: u128,
}

impl NonceReader {
    pub fn new(device_addr: &[u8]) -> Result<NonceReader, Error> {
        if device_addr.len() != 6 {
            return Err(Error::InvalidNonceLen(device_addr.len()));
        }
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let mut addr = [0u8; 6];
        addr.copy_from_slice(device_addr);
        // Seed the counter randomly; predictable nonces weaken the handshake.
        let mut seed = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let counter = u128::from_le_bytes(seed);
        Ok(NonceReader { inner: Arc::new(Mutex::new(Inner { key, addr, counter })) })
    }

    pub fn next(&self) -> [u8; 32] {
        let mut inner = self.inner.lock().unwrap();
        inner.counter = inner.counter.wrapping_add(1);

        let mut hasher = Sha256::new();
        hasher.input(&inner.key[..]);
        hasher.input(&inner.addr[..]);
        hasher.input(&inner.counter.to_le_bytes()[..]);
        let mut nonce = [0u8; 32];
        hasher.result(&mut nonce);
        nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique() {
        let reader = NonceReader::new(&[0x22; 6][..]).expect("error creating nonce reader");
        let a = reader.next();
        let b = reader.next();
        let c = reader.next();
        assert_ne!(&a[..], &b[..]);
        assert_ne!(&b[..], &c[..]);
        assert_ne!(&a[..], &c[..]);
    }

    #[test]
    fn cloned_readers_share_the_counter() {
        let reader = NonceReader::new(&[0x22; 6][..]).expect("error creating nonce reader");
        let clone = reader.clone();
        assert_ne!(&reader.next()[..], &clone.next()[..]);
    }

    #[test]
    fn rejects_bad_address() {
        NonceReader::new(&[0x22; 5][..]).expect_err("expected address length error");
    }
}
