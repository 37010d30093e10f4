//! Group Temporal Key and the AP-side provider that generates and rotates it.

use rand::RngCore;
use zeroize::Zeroize;

use wifi_common::ie::rsn::cipher::Cipher;

use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Gtk {
    gtk: Vec<u8>,
    key_id: u8,
    rsc: u64,
    pub cipher: Cipher,
}

impl Gtk {
    pub fn from_gtk(gtk: Vec<u8>, key_id: u8, cipher: Cipher, rsc: u64) -> Result<Gtk, Error> {
        let tk_len = cipher.tk_bytes().ok_or(Error::UnsupportedCipherSuite)?;
        if gtk.len() != tk_len {
            return Err(Error::InvalidKeyData("GTK length does not match group cipher"));
        }
        Ok(Gtk { gtk, key_id, rsc, cipher })
    }

    pub fn tk(&self) -> &[u8] {
        &self.gtk[..]
    }

    pub fn key_id(&self) -> u8 {
        self.key_id
    }

    pub fn rsc(&self) -> u64 {
        self.rsc
    }
}

impl Drop for Gtk {
    fn drop(&mut self) {
        self.gtk.zeroize();
    }
}

/// Owns the BSS's group key. The first GTK uses key id 1; rotation flips
/// between ids 1 and 2 so stations never see a new key under the id of the
/// one still in use.
#[derive(Debug)]
pub struct GtkProvider {
    gtk: Gtk,
}

impl GtkProvider {
    pub fn new(cipher: Cipher) -> Result<GtkProvider, Error> {
        let gtk = generate_gtk(cipher, 1, 0)?;
        Ok(GtkProvider { gtk })
    }

    pub fn get_gtk(&self) -> &Gtk {
        &self.gtk
    }

    /// Some drivers refuse a user-supplied Tx-RSC; the AP reads it back from
    /// the kernel after installing the key and records it here.
    pub fn set_rsc(&mut self, rsc: u64) {
        self.gtk.rsc = rsc;
    }

    pub fn rotate(&mut self) -> Result<&Gtk, Error> {
        let next_id = if self.gtk.key_id() == 1 { 2 } else { 1 };
        self.gtk = generate_gtk(self.gtk.cipher.clone(), next_id, 0)?;
        Ok(&self.gtk)
    }
}

fn generate_gtk(cipher: Cipher, key_id: u8, rsc: u64) -> Result<Gtk, Error> {
    let tk_len = cipher.tk_bytes().ok_or(Error::UnsupportedCipherSuite)?;
    let mut gtk = vec![0u8; tk_len];
    rand::rngs::OsRng.fill_bytes(&mut gtk[..]);
    Gtk::from_gtk(gtk, key_id, cipher, rsc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_common::ie::rsn::cipher;

    #[test]
    fn provider_generates_16_byte_ccmp_gtk() {
        let provider =
            GtkProvider::new(Cipher::new_dot11(cipher::CCMP_128)).expect("error creating provider");
        assert_eq!(provider.get_gtk().tk().len(), 16);
        assert_eq!(provider.get_gtk().key_id(), 1);
    }

    #[test]
    fn rotation_changes_key_and_flips_id() {
        let mut provider =
            GtkProvider::new(Cipher::new_dot11(cipher::CCMP_128)).expect("error creating provider");
        let first = provider.get_gtk().clone();
        let second = provider.rotate().expect("error rotating GTK").clone();
        assert_ne!(first.tk(), second.tk());
        assert_eq!(second.key_id(), 2);
        let third = provider.rotate().expect("error rotating GTK").clone();
        assert_eq!(third.key_id(), 1);
    }

    #[test]
    fn gtk_must_match_cipher_length() {
        let result = Gtk::from_gtk(vec![0u8; 5], 1, Cipher::new_dot11(cipher::CCMP_128), 0);
        assert!(result.is_err());
    }
}
