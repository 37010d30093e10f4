//! Helpers shared by the RSNA handshake tests.

use bytes::Bytes;
use hex::FromHex;
use std::sync::{Arc, Mutex};

use wifi_common::ie::rsn::akm::{self, Akm};
use wifi_common::ie::rsn::cipher::{self, Cipher};
use wifi_common::ie::rsn::rsne::Rsne;
use wifi_common::ie::rsn::suite_selector::OUI;
use wifi_common::MacAddr;

use crate::crypto_utils::nonce::NonceReader;
use crate::key::exchange::{compute_mic, Key};
use crate::key::gtk::{Gtk, GtkProvider};
use crate::key::ptk::Ptk;
use crate::key_data::kde;
use crate::keywrap::keywrap_algorithm;
use crate::psk;
use crate::rsna::{SecAssocStatus, SecAssocUpdate};
use crate::{Authenticator, Supplicant};

pub const S_ADDR: MacAddr = [0x81, 0x76, 0x61, 0x14, 0xDF, 0xC9];
pub const A_ADDR: MacAddr = [0x1D, 0xE3, 0xFD, 0xDF, 0xCB, 0xD3];

pub fn get_a_rsne() -> Rsne {
    let mut rsne = Rsne::new();
    rsne.group_data_cipher_suite = Some(Cipher { oui: OUI, suite_type: cipher::CCMP_128 });
    rsne.pairwise_cipher_suites.push(Cipher { oui: OUI, suite_type: cipher::CCMP_128 });
    rsne.pairwise_cipher_suites.push(Cipher { oui: OUI, suite_type: cipher::TKIP });
    rsne.akm_suites.push(Akm { oui: OUI, suite_type: akm::PSK });
    rsne
}

pub fn get_s_rsne() -> Rsne {
    let mut rsne = Rsne::new();
    rsne.group_data_cipher_suite = Some(Cipher { oui: OUI, suite_type: cipher::CCMP_128 });
    rsne.pairwise_cipher_suites.push(Cipher { oui: OUI, suite_type: cipher::CCMP_128 });
    rsne.akm_suites.push(Akm { oui: OUI, suite_type: akm::PSK });
    rsne
}

pub fn get_akm() -> Akm {
    Akm::new_dot11(akm::PSK)
}

pub fn get_pmk() -> Vec<u8> {
    Vec::from_hex("0dc0d6eb90555ed6419756b9a15ec3e3209b63df707dd508d14581f8982721af")
        .expect("error reading PMK from hex")
}

pub fn get_psk() -> psk::Psk {
    psk::compute("ThisIsAPassword".as_bytes(), "ThisIsASSID".as_bytes())
        .expect("error computing PSK")
}

pub fn get_supplicant() -> Supplicant {
    let nonce_rdr = NonceReader::new(&S_ADDR[..]).expect("error creating nonce reader");
    Supplicant::new_wpa2psk_ccmp128(
        nonce_rdr,
        get_psk(),
        S_ADDR,
        get_s_rsne(),
        A_ADDR,
        get_a_rsne(),
    )
    .expect("could not create Supplicant")
}

pub fn get_authenticator() -> (Authenticator, Arc<Mutex<GtkProvider>>) {
    let gtk_provider = Arc::new(Mutex::new(
        GtkProvider::new(Cipher::new_dot11(cipher::CCMP_128)).expect("error creating GtkProvider"),
    ));
    let nonce_rdr = NonceReader::new(&A_ADDR[..]).expect("error creating nonce reader");
    let authenticator = Authenticator::new_wpa2psk_ccmp128(
        nonce_rdr,
        gtk_provider.clone(),
        get_psk(),
        S_ADDR,
        get_s_rsne(),
        A_ADDR,
        get_a_rsne(),
    )
    .expect("could not create Authenticator");
    (authenticator, gtk_provider)
}

pub fn get_ptk(anonce: &[u8], snonce: &[u8]) -> Ptk {
    Ptk::new(
        &get_pmk()[..],
        &A_ADDR,
        &S_ADDR,
        anonce,
        snonce,
        &get_akm(),
        Cipher::new_dot11(cipher::CCMP_128),
    )
    .expect("error deriving PTK")
}

pub fn encrypt_key_data(kek: &[u8], key_data: Vec<u8>) -> Vec<u8> {
    keywrap_algorithm(&get_akm())
        .expect("AKM has no known keywrap algorithm")
        .wrap(kek, &kde::pad_for_encryption(key_data)[..])
        .expect("could not encrypt key data")
}

pub fn finalize_key_frame(frame: &mut eapol::KeyFrame, kck: &[u8]) {
    let mic = compute_mic(kck, &get_akm(), frame).expect("failed to compute MIC");
    frame.key_mic = Bytes::from(mic);
}

/// An authenticator-built message 1 with the given ANonce and replay counter.
pub fn get_4whs_msg1(anonce: &[u8; 32], krc: u64) -> eapol::KeyFrame {
    let mut key_info = eapol::KeyInformation(0);
    key_info.set_key_descriptor_version(2);
    key_info.set_key_type(1);
    key_info.set_key_ack(true);
    eapol::KeyFrame::new(
        eapol::ProtocolVersion::Ieee802dot1x2001,
        key_info,
        16,
        16,
        krc,
        *anonce,
        vec![],
    )
}

/// An authenticator-built message 3 carrying the given GTK and the RSNE from
/// `rsne` (the AP's advertised RSNE when None).
pub fn get_4whs_msg3(
    ptk: &Ptk,
    anonce: &[u8; 32],
    gtk: &[u8],
    rsne: Option<Rsne>,
    krc: u64,
) -> eapol::KeyFrame {
    let mut plaintext = vec![];
    {
        let mut writer = kde::Writer::new(&mut plaintext);
        writer.write_rsne(&rsne.unwrap_or_else(get_a_rsne)).expect("error writing RSNE");
        writer.write_gtk(&kde::Gtk::new(2, kde::GtkInfoTx::BothRxTx, gtk)).expect("error writing GTK");
    }
    let key_data = encrypt_key_data(ptk.kek(), plaintext);

    let mut key_info = eapol::KeyInformation(0);
    key_info.set_key_descriptor_version(2);
    key_info.set_key_type(1);
    key_info.set_key_ack(true);
    key_info.set_key_mic(true);
    key_info.set_install(true);
    key_info.set_secure(true);
    key_info.set_encrypted_key_data(true);
    let mut msg3 = eapol::KeyFrame::new(
        eapol::ProtocolVersion::Ieee802dot1x2001,
        key_info,
        16,
        16,
        krc,
        *anonce,
        key_data,
    );
    finalize_key_frame(&mut msg3, ptk.kck());
    msg3
}

/// An authenticator-built Group-Key handshake message 1.
pub fn get_group_key_hs_msg1(ptk: &Ptk, gtk: &[u8], key_id: u8, krc: u64) -> eapol::KeyFrame {
    let mut plaintext = vec![];
    {
        let mut writer = kde::Writer::new(&mut plaintext);
        writer
            .write_gtk(&kde::Gtk::new(key_id, kde::GtkInfoTx::BothRxTx, gtk))
            .expect("error writing GTK");
    }
    let key_data = encrypt_key_data(ptk.kek(), plaintext);

    let mut key_info = eapol::KeyInformation(0);
    key_info.set_key_descriptor_version(2);
    key_info.set_key_ack(true);
    key_info.set_key_mic(true);
    key_info.set_secure(true);
    key_info.set_encrypted_key_data(true);
    let mut msg1 = eapol::KeyFrame::new(
        eapol::ProtocolVersion::Ieee802dot1x2001,
        key_info,
        16,
        0,
        krc,
        [0u8; 32],
        key_data,
    );
    finalize_key_frame(&mut msg1, ptk.kck());
    msg1
}

pub fn get_eapol_resp(updates: &[SecAssocUpdate]) -> Option<eapol::KeyFrame> {
    updates
        .iter()
        .filter_map(|u| match u {
            SecAssocUpdate::TxEapolKeyFrame(resp) => Some(resp.clone()),
            _ => None,
        })
        .next()
}

pub fn expect_eapol_resp(updates: &[SecAssocUpdate]) -> eapol::KeyFrame {
    get_eapol_resp(updates).expect("updates do not contain an EAPOL frame")
}

pub fn get_reported_ptk(updates: &[SecAssocUpdate]) -> Option<Ptk> {
    updates
        .iter()
        .filter_map(|u| match u {
            SecAssocUpdate::Key(Key::Ptk(ptk)) => Some(ptk.clone()),
            _ => None,
        })
        .next()
}

pub fn expect_reported_ptk(updates: &[SecAssocUpdate]) -> Ptk {
    get_reported_ptk(updates).expect("updates do not contain a PTK")
}

pub fn get_reported_gtk(updates: &[SecAssocUpdate]) -> Option<Gtk> {
    updates
        .iter()
        .filter_map(|u| match u {
            SecAssocUpdate::Key(Key::Gtk(gtk)) => Some(gtk.clone()),
            _ => None,
        })
        .next()
}

pub fn expect_reported_gtk(updates: &[SecAssocUpdate]) -> Gtk {
    get_reported_gtk(updates).expect("updates do not contain a GTK")
}

pub fn get_reported_status(updates: &[SecAssocUpdate]) -> Option<SecAssocStatus> {
    updates
        .iter()
        .filter_map(|u| match u {
            SecAssocUpdate::Status(status) => Some(status.clone()),
            _ => None,
        })
        .next()
}
