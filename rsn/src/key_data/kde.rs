//! Key data encapsulations and the writer assembling a key data blob.

use bytes::BufMut;

use wifi_common::ie::rsn::rsne::Rsne;

use crate::Error;

const KDE_TYPE: u8 = 0xDD;
const KDE_OUI: [u8; 3] = [0x00, 0x0F, 0xAC];
const KDE_GTK: u8 = 1;
const KDE_IGTK: u8 = 9;

/// GTK KDE Tx bit, IEEE Std 802.11-2016, Figure 12-36.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GtkInfoTx {
    RxOnly,
    BothRxTx,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gtk {
    info: u8,
    gtk: Vec<u8>,
}

impl Gtk {
    pub fn new(key_id: u8, tx: GtkInfoTx, gtk: &[u8]) -> Gtk {
        let mut info = key_id & 0x03;
        if let GtkInfoTx::BothRxTx = tx {
            info |= 0x04;
        }
        Gtk { info, gtk: gtk.to_vec() }
    }

    pub fn parse(payload: &[u8]) -> Result<Gtk, Error> {
        // KeyID/Tx byte, one reserved byte, then the key.
        if payload.len() < 2 {
            return Err(Error::InvalidKeyData("GTK KDE too short"));
        }
        Ok(Gtk { info: payload[0], gtk: payload[2..].to_vec() })
    }

    pub fn key_id(&self) -> u8 {
        self.info & 0x03
    }

    pub fn tx(&self) -> GtkInfoTx {
        if self.info & 0x04 != 0 {
            GtkInfoTx::BothRxTx
        } else {
            GtkInfoTx::RxOnly
        }
    }

    pub fn gtk(&self) -> &[u8] {
        &self.gtk[..]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Igtk {
    pub payload: Vec<u8>,
}

impl Igtk {
    pub fn new(key_id: u16, ipn: &[u8; 6], igtk: &[u8]) -> Igtk {
        let mut payload = Vec::with_capacity(8 + igtk.len());
        payload.extend_from_slice(&key_id.to_le_bytes()[..]);
        payload.extend_from_slice(&ipn[..]);
        payload.extend_from_slice(igtk);
        Igtk { payload }
    }

    pub fn parse(payload: &[u8]) -> Result<Igtk, Error> {
        if payload.len() < 8 {
            return Err(Error::InvalidKeyData("IGTK KDE too short"));
        }
        Ok(Igtk { payload: payload.to_vec() })
    }
}

pub struct Writer<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Writer<'a> {
        Writer { buf }
    }

    fn write_kde_hdr(&mut self, data_type: u8, payload_len: usize) -> Result<(), Error> {
        if payload_len + 4 > 255 {
            return Err(Error::InvalidKeyData("KDE payload too long"));
        }
        self.buf.put_u8(KDE_TYPE);
        self.buf.put_u8((payload_len + 4) as u8);
        self.buf.put_slice(&KDE_OUI[..]);
        self.buf.put_u8(data_type);
        Ok(())
    }

    pub fn write_gtk(&mut self, gtk: &Gtk) -> Result<(), Error> {
        self.write_kde_hdr(KDE_GTK, 2 + gtk.gtk.len())?;
        self.buf.put_u8(gtk.info);
        self.buf.put_u8(0); // reserved
        self.buf.put_slice(&gtk.gtk[..]);
        Ok(())
    }

    pub fn write_igtk(&mut self, igtk: &Igtk) -> Result<(), Error> {
        self.write_kde_hdr(KDE_IGTK, igtk.payload.len())?;
        self.buf.put_slice(&igtk.payload[..]);
        Ok(())
    }

    pub fn write_rsne(&mut self, rsne: &Rsne) -> Result<(), Error> {
        rsne.write_into(self.buf).map_err(|_| Error::InvalidKeyData("unwritable RSNE"))
    }
}

/// Pads a key data blob for AES key wrap: append 0xDD, then zeros, until the
/// length is at least 16 and a multiple of 8. IEEE Std 802.11-2016, 12.7.2.
pub fn pad_for_encryption(mut key_data: Vec<u8>) -> Vec<u8> {
    if key_data.len() < 16 || key_data.len() % 8 != 0 {
        key_data.push(KDE_TYPE);
        while key_data.len() < 16 || key_data.len() % 8 != 0 {
            key_data.push(0);
        }
    }
    key_data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gtk_kde_layout() {
        let mut buf = vec![];
        Writer::new(&mut buf).write_gtk(&Gtk::new(2, GtkInfoTx::BothRxTx, &[0xAB; 16])).unwrap();
        assert_eq!(&buf[..8], &[0xDD, 22, 0x00, 0x0F, 0xAC, 0x01, 0x06, 0x00]);
        assert_eq!(&buf[8..], &[0xAB; 16][..]);
    }

    #[test]
    fn gtk_kde_parse_extracts_id_and_tx() {
        let gtk = Gtk::parse(&[0x05, 0x00, 1, 2, 3]).unwrap();
        assert_eq!(gtk.key_id(), 1);
        assert_eq!(gtk.tx(), GtkInfoTx::BothRxTx);
        assert_eq!(gtk.gtk(), &[1, 2, 3][..]);
    }

    #[test]
    fn padding_reaches_min_16_and_multiple_of_8() {
        assert_eq!(pad_for_encryption(vec![1, 2, 3]).len(), 16);
        assert_eq!(pad_for_encryption(vec![0; 16]).len(), 16);
        assert_eq!(pad_for_encryption(vec![0; 17]).len(), 24);
        let padded = pad_for_encryption(vec![1, 2, 3]);
        assert_eq!(padded[3], 0xDD);
        assert!(padded[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn igtk_kde_roundtrip() {
        let igtk = Igtk::new(4, &[1, 2, 3, 4, 5, 6], &[0xEE; 16]);
        let mut buf = vec![];
        Writer::new(&mut buf).write_igtk(&igtk).unwrap();
        assert_eq!(buf[1] as usize, buf.len() - 2);
        let parsed = Igtk::parse(&buf[6..]).unwrap();
        assert_eq!(parsed, igtk);
    }
}
