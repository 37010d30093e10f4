//! EAPOL Key Data field: IEEE elements and key data encapsulations (KDEs).
//! IEEE Std 802.11-2016, 12.7.2, Figure 12-34 ff.

pub mod kde;

use wifi_common::ie::rsn::rsne::{self, Rsne};
use wifi_common::ie::{ft, Id};

use crate::Error;

#[derive(Debug, PartialEq)]
pub enum Element {
    Gtk(kde::Gtk),
    Igtk(kde::Igtk),
    Rsne(Rsne),
    Mde(ft::Mde),
    Padding,
    Unsupported { id: u8 },
}

const KDE_TYPE: u8 = 0xDD;
const KDE_OUI: [u8; 3] = [0x00, 0x0F, 0xAC];

const KDE_GTK: u8 = 1;
const KDE_IGTK: u8 = 9;

/// Extracts all elements from a decrypted key data blob. Padding (a 0xDD
/// type with zero or short length at the tail) ends extraction.
pub fn extract_elements(key_data: &[u8]) -> Result<Vec<Element>, Error> {
    let mut elements = vec![];
    let mut rest = key_data;
    while !rest.is_empty() {
        let id = rest[0];
        if id == KDE_TYPE && (rest.len() < 2 || rest[1] == 0) {
            // Padding fills the remainder of the encrypted blob.
            elements.push(Element::Padding);
            break;
        }
        if rest.len() < 2 {
            return Err(Error::InvalidKeyData("dangling element header"));
        }
        let body_len = rest[1] as usize;
        if rest.len() < 2 + body_len {
            return Err(Error::InvalidKeyData("element overruns key data"));
        }
        let element_bytes = &rest[..2 + body_len];
        let body = &rest[2..2 + body_len];
        match id {
            KDE_TYPE if body_len >= 4 && body[0..3] == KDE_OUI => match body[3] {
                KDE_GTK => elements.push(Element::Gtk(kde::Gtk::parse(&body[4..])?)),
                KDE_IGTK => elements.push(Element::Igtk(kde::Igtk::parse(&body[4..])?)),
                _ => elements.push(Element::Unsupported { id }),
            },
            Id::RSNE => {
                let rsne = rsne::from_bytes(element_bytes)
                    .map_err(|_| Error::InvalidKeyData("malformed RSNE"))?;
                elements.push(Element::Rsne(rsne));
            }
            Id::MOBILITY_DOMAIN => {
                let mde = ft::Mde::from_bytes(element_bytes)
                    .map_err(|_| Error::InvalidKeyData("malformed MDE"))?;
                elements.push(Element::Mde(mde));
            }
            _ => elements.push(Element::Unsupported { id }),
        }
        rest = &rest[2 + body_len..];
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_common::ie::rsn::{akm, cipher};

    #[test]
    fn extract_gtk_and_rsne() {
        let mut rsne = Rsne::new();
        rsne.group_data_cipher_suite =
            Some(wifi_common::ie::rsn::cipher::Cipher::new_dot11(cipher::CCMP_128));
        rsne.pairwise_cipher_suites
            .push(wifi_common::ie::rsn::cipher::Cipher::new_dot11(cipher::CCMP_128));
        rsne.akm_suites.push(wifi_common::ie::rsn::akm::Akm::new_dot11(akm::PSK));

        let mut buf = vec![];
        let mut writer = kde::Writer::new(&mut buf);
        writer.write_gtk(&kde::Gtk::new(2, kde::GtkInfoTx::BothRxTx, &[0xCD; 16])).unwrap();
        writer.write_rsne(&rsne).unwrap();

        let elements = extract_elements(&buf[..]).expect("error extracting elements");
        assert_eq!(elements.len(), 2);
        match &elements[0] {
            Element::Gtk(gtk) => {
                assert_eq!(gtk.key_id(), 2);
                assert_eq!(gtk.gtk(), &[0xCD; 16][..]);
            }
            other => panic!("expected GTK KDE, got {:?}", other),
        }
        match &elements[1] {
            Element::Rsne(parsed) => assert_eq!(parsed, &rsne),
            other => panic!("expected RSNE, got {:?}", other),
        }
    }

    #[test]
    fn padding_terminates_extraction() {
        let mut buf = vec![];
        let mut writer = kde::Writer::new(&mut buf);
        writer.write_gtk(&kde::Gtk::new(1, kde::GtkInfoTx::BothRxTx, &[0xCD; 16])).unwrap();
        let padded = kde::pad_for_encryption(buf);
        assert_eq!(padded.len() % 8, 0);
        let elements = extract_elements(&padded[..]).expect("error extracting elements");
        assert!(elements.iter().any(|e| match e {
            Element::Gtk(..) => true,
            _ => false,
        }));
        assert_eq!(elements.last(), Some(&Element::Padding));
    }

    #[test]
    fn overrun_element_is_fatal() {
        let buf = [0xDD, 0x10, 0x00, 0x0F, 0xAC, 0x01];
        extract_elements(&buf[..]).expect_err("expected overrun error");
    }

    #[test]
    fn unknown_kde_is_skipped() {
        let buf = [0xDD, 0x06, 0x00, 0x0F, 0xAC, 0x0C, 0x01, 0x02];
        let elements = extract_elements(&buf[..]).expect("error extracting elements");
        assert_eq!(elements, vec![Element::Unsupported { id: 0xDD }]);
    }
}
