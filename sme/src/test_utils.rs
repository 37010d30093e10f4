//! Shared fakes and frame builders for SME tests.

use bytes::BufMut;
use futures::channel::mpsc;

use wifi_common::ie::rsn::akm::{self, Akm};
use wifi_common::ie::rsn::cipher::{self, Cipher};
use wifi_common::ie::rsn::rsne::{Rsne, RsnCapabilities};
use wifi_common::ie::{self, wsc};
use wifi_common::mac::{self, AuthAlgorithm, CapabilityInfo, StatusCode};
use wifi_common::{MacAddr, Ssid};

use crate::ap::ApEvent;
use crate::client::{BssDescription, ClientEvent};
use crate::DeviceInfo;

pub fn fake_device_info(addr: MacAddr) -> DeviceInfo {
    DeviceInfo { ifindex: 3, addr, supports_rekey_offload: false, supports_control_port: true }
}

pub fn make_rsne(data: Option<u8>, pairwise: Vec<u8>, akms: Vec<u8>) -> Rsne {
    let mut rsne = Rsne::new();
    rsne.group_data_cipher_suite = data.map(Cipher::new_dot11);
    rsne.pairwise_cipher_suites = pairwise.into_iter().map(Cipher::new_dot11).collect();
    rsne.akm_suites = akms.into_iter().map(Akm::new_dot11).collect();
    rsne
}

pub fn wpa2_psk_ccmp_rsne_with_caps(caps: RsnCapabilities) -> Rsne {
    let mut rsne = make_rsne(Some(cipher::CCMP_128), vec![cipher::CCMP_128], vec![akm::PSK]);
    rsne.rsn_capabilities = Some(caps);
    rsne
}

pub fn rsne_as_bytes(rsne: &Rsne) -> Vec<u8> {
    rsne.to_bytes().expect("failed to serialize RSNE")
}

fn fake_bss(ssid: Ssid, rsne: Option<Rsne>) -> BssDescription {
    let mut ies = vec![];
    ie::write_ssid(&mut ies, &ssid[..]);
    ie::write_supported_rates(&mut ies, &[0x82, 0x84, 0x8B, 0x96]);
    if let Some(rsne) = rsne {
        ies.extend_from_slice(&rsne_as_bytes(&rsne)[..]);
    }
    BssDescription {
        bssid: [0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
        ssid,
        freq: 2412,
        capability: 0x0431,
        ies,
    }
}

pub fn fake_unprotected_bss_description(ssid: Ssid) -> BssDescription {
    fake_bss(ssid, None)
}

pub fn fake_protected_bss_description(ssid: Ssid) -> BssDescription {
    fake_bss(ssid, Some(make_rsne(Some(cipher::CCMP_128), vec![cipher::CCMP_128], vec![akm::PSK])))
}

#[allow(deprecated)]
pub fn expect_client_event(
    stream: &mut mpsc::UnboundedReceiver<ClientEvent>,
    expected: ClientEvent,
) {
    match stream.try_next() {
        Ok(Some(event)) => assert_eq!(event, expected),
        other => panic!("expected event {:?}, got {:?}", expected, other),
    }
}

#[allow(deprecated)]
pub fn expect_ap_event(stream: &mut mpsc::UnboundedReceiver<ApEvent>, expected: ApEvent) {
    match stream.try_next() {
        Ok(Some(event)) => assert_eq!(event, expected),
        other => panic!("expected event {:?}, got {:?}", expected, other),
    }
}

/// An Open System authentication request as a station would send it.
pub fn auth_frame(client: MacAddr, bssid: MacAddr) -> Vec<u8> {
    let mut frame = vec![];
    mac::write_auth_frame(
        &mut frame,
        bssid,
        client,
        bssid,
        AuthAlgorithm::OPEN_SYSTEM,
        1,
        StatusCode::SUCCESS,
        &[],
    );
    frame
}

pub fn shared_key_auth_frame(client: MacAddr, bssid: MacAddr) -> Vec<u8> {
    let mut frame = vec![];
    mac::write_auth_frame(
        &mut frame,
        bssid,
        client,
        bssid,
        AuthAlgorithm::SHARED_KEY,
        1,
        StatusCode::SUCCESS,
        &[],
    );
    frame
}

/// An association request with the given IE tail.
pub fn assoc_req_frame(client: MacAddr, bssid: MacAddr, ssid: &[u8], extra_ies: &[u8]) -> Vec<u8> {
    let mut frame = vec![];
    mac::write_mgmt_hdr(&mut frame, mac::MgmtSubtype::ASSOC_REQ, bssid, client, bssid);
    let mut capabilities = CapabilityInfo(0);
    capabilities.set_ess(true);
    frame.put_u16_le(capabilities.value());
    frame.put_u16_le(100); // listen interval
    ie::write_ssid(&mut frame, ssid);
    ie::write_supported_rates(&mut frame, &[0x82, 0x84, 0x8B, 0x96]);
    frame.extend_from_slice(extra_ies);
    frame
}

/// A probe request, optionally carrying a WSC push-button IE.
pub fn probe_req_frame(client: MacAddr, ssid: &[u8], pbc_uuid: Option<[u8; 16]>) -> Vec<u8> {
    let mut frame = vec![];
    mac::write_mgmt_hdr(
        &mut frame,
        mac::MgmtSubtype::PROBE_REQ,
        [0xFF; 6],
        client,
        [0xFF; 6],
    );
    ie::write_ssid(&mut frame, ssid);
    ie::write_supported_rates(&mut frame, &[0x82, 0x84, 0x8B, 0x96]);
    if let Some(uuid_e) = pbc_uuid {
        let device = wsc::DeviceInfo {
            manufacturer: b"Acme".to_vec(),
            model_name: b"STA".to_vec(),
            model_number: b"1".to_vec(),
            serial_number: b"0002".to_vec(),
            device_name: b"enrollee".to_vec(),
            primary_device_type: [0x00, 0x01, 0x00, 0x50, 0xF2, 0x04, 0x00, 0x01],
            uuid_e,
        };
        frame.extend_from_slice(&wsc::build_probe_request(&device)[..]);
    }
    frame
}

/// The WSC IE an enrollee puts into its association request.
pub fn wsc_assoc_ie() -> Vec<u8> {
    wsc::build_association_response()
}

pub fn fake_wsc_device() -> wsc::DeviceInfo {
    wsc::DeviceInfo {
        manufacturer: b"Acme".to_vec(),
        model_name: b"AP".to_vec(),
        model_number: b"1".to_vec(),
        serial_number: b"0001".to_vec(),
        device_name: b"acme-ap".to_vec(),
        primary_device_type: [0x00, 0x06, 0x00, 0x50, 0xF2, 0x04, 0x00, 0x01],
        uuid_e: [0x42; 16],
    }
}

/// Parses the status code out of a serialized auth or assoc response frame.
pub fn response_status(frame: &[u8]) -> StatusCode {
    let parsed = mac::MgmtFrame::parse(frame).expect("failed to parse response frame");
    match parsed.body {
        mac::MgmtBody::Authentication { auth_hdr, .. } => auth_hdr.status_code,
        mac::MgmtBody::AssocResp { assoc_resp_hdr, .. }
        | mac::MgmtBody::ReassocResp { assoc_resp_hdr, .. } => assoc_resp_hdr.status_code,
        other => panic!("unexpected response frame body: {:?}", other),
    }
}

pub fn find_ie<'a>(frame_ies: &'a [u8], id: u8) -> Option<&'a [u8]> {
    ie::find_element(frame_ies, id)
}

// --- EAPOL key frames for driving the supplicant under test ---

use wifi_rsn::key::exchange::compute_mic;
use wifi_rsn::key::ptk::Ptk;
use wifi_rsn::key_data::kde;
use wifi_rsn::keywrap::keywrap_algorithm;
use wifi_rsn::rsna::{derive_key_descriptor_version, NegotiatedProtection};

pub fn negotiated_protection(s_rsne: &Rsne) -> NegotiatedProtection {
    NegotiatedProtection::from_rsne(s_rsne).expect("invalid negotiated RSNE")
}

/// Message 1 of the 4-Way Handshake as the AP would send it.
pub fn eapol_msg1(protection: &NegotiatedProtection, anonce: &[u8; 32], krc: u64) -> Vec<u8> {
    let mut key_info = eapol::KeyInformation(0);
    key_info.set_key_descriptor_version(derive_key_descriptor_version(protection));
    key_info.set_key_type(1);
    key_info.set_key_ack(true);
    let frame = eapol::KeyFrame::new(
        eapol::ProtocolVersion::Ieee802dot1x2004,
        key_info,
        protection.mic_size,
        16,
        krc,
        *anonce,
        vec![],
    );
    frame.to_bytes(false)
}

/// Message 3, carrying the AP's RSNE and a wrapped GTK.
pub fn eapol_msg3(
    protection: &NegotiatedProtection,
    ptk: &Ptk,
    anonce: &[u8; 32],
    a_rsne: &Rsne,
    gtk: &[u8],
    krc: u64,
) -> Vec<u8> {
    let mut plaintext = vec![];
    {
        let mut writer = kde::Writer::new(&mut plaintext);
        writer.write_rsne(a_rsne).expect("error writing RSNE");
        writer
            .write_gtk(&kde::Gtk::new(1, kde::GtkInfoTx::BothRxTx, gtk))
            .expect("error writing GTK KDE");
    }
    let padded = kde::pad_for_encryption(plaintext);
    let key_data = keywrap_algorithm(&protection.akm)
        .expect("AKM has no keywrap algorithm")
        .wrap(ptk.kek(), &padded[..])
        .expect("error wrapping key data");

    let mut key_info = eapol::KeyInformation(0);
    key_info.set_key_descriptor_version(derive_key_descriptor_version(protection));
    key_info.set_key_type(1);
    key_info.set_key_ack(true);
    key_info.set_key_mic(true);
    key_info.set_install(true);
    key_info.set_secure(true);
    key_info.set_encrypted_key_data(true);
    let mut frame = eapol::KeyFrame::new(
        eapol::ProtocolVersion::Ieee802dot1x2004,
        key_info,
        protection.mic_size,
        16,
        krc,
        *anonce,
        key_data,
    );
    let mic =
        compute_mic(ptk.kck(), &protection.akm, &frame).expect("error computing msg3 MIC");
    frame.key_mic = bytes::Bytes::from(mic);
    frame.to_bytes(false)
}

/// Extracts the SNonce from a serialized message 2.
pub fn snonce_of(msg2: &[u8]) -> [u8; 32] {
    match eapol::Frame::from_bytes(msg2, 16).expect("invalid EAPOL frame") {
        eapol::Frame::Key(frame) => frame.key_nonce,
        other => panic!("expected a key frame, got {:?}", other),
    }
}
