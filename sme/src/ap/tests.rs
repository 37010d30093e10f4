use super::*;
use wifi_common::assert_variant;
use wifi_common::ie::rsn::{akm, cipher};

use crate::test_utils::*;
use crate::Station;

const AP_ADDR: MacAddr = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
const CLIENT_ADDR: MacAddr = [0x7A, 0xE7, 0x76, 0xD9, 0xF2, 0x67];
const CLIENT_ADDR2: MacAddr = [0x22, 0x22, 0x22, 0x22, 0x22, 0x22];
const SSID: &[u8] = b"AcmeNet";

fn unprotected_config() -> Config {
    Config {
        ssid: SSID.to_vec(),
        password: vec![],
        freq: 2462,
        channel: 11,
        rates: vec![0x82, 0x84, 0x8B, 0x96],
        authorized_macs: None,
        wsc_device: None,
    }
}

fn protected_config() -> Config {
    Config { password: b"abcdefgh".to_vec(), ..unprotected_config() }
}

fn wsc_config() -> Config {
    Config { wsc_device: Some(fake_wsc_device()), ..protected_config() }
}

fn create_sme() -> (ApSme, MlmeStream, ApEventStream, TimeStream) {
    ApSme::new(fake_device_info(AP_ADDR))
}

#[allow(deprecated)]
fn try_next<T>(stream: &mut futures::channel::mpsc::UnboundedReceiver<T>) -> Option<T> {
    stream.try_next().ok().flatten()
}

fn start_ap(config: Config) -> (ApSme, MlmeStream, ApEventStream, TimeStream) {
    let (mut sme, mut mlme_stream, mut event_stream, mut time_stream) = create_sme();
    let mut receiver = sme.on_start_command(config);
    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::StartAp { token, .. }) => token);
    // Frame registrations for the responder subtypes.
    for _ in 0..6 {
        assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::RegisterFrame { .. }));
    }
    // Drain the start timer so later tests see only their own entries.
    while let Some(_) = try_next(&mut time_stream) {}
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });
    assert_eq!(receiver.try_recv(), Ok(Some(StartResult::Success)));
    expect_ap_event(&mut event_stream, ApEvent::Started);
    (sme, mlme_stream, event_stream, time_stream)
}

fn start_protected_ap() -> (ApSme, MlmeStream, ApEventStream, TimeStream) {
    start_ap(protected_config())
}

fn start_unprotected_ap() -> (ApSme, MlmeStream, ApEventStream, TimeStream) {
    start_ap(unprotected_config())
}

/// Feeds an auth exchange and drains the response frame.
fn authenticate(sme: &mut ApSme, mlme_stream: &mut MlmeStream, addr: MacAddr) {
    sme.on_mlme_event(MlmeEvent::MgmtFrame { frame: auth_frame(addr, AP_ADDR) });
    assert_variant!(try_next(mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::SUCCESS);
    });
}

/// Runs an association request up to the acknowledged response; returns the
/// AID the response carried.
fn associate(
    sme: &mut ApSme,
    mlme_stream: &mut MlmeStream,
    addr: MacAddr,
    extra_ies: &[u8],
) -> u16 {
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: assoc_req_frame(addr, AP_ADDR, SSID, extra_ies),
    });
    let (token, aid) =
        assert_variant!(try_next(mlme_stream), Some(MlmeRequest::SendFrame { token, frame }) => {
            assert_eq!(response_status(&frame[..]), StatusCode::SUCCESS);
            let parsed = mac::MgmtFrame::parse(&frame[..]).unwrap();
            let aid = assert_variant!(parsed.body, mac::MgmtBody::AssocResp { assoc_resp_hdr, .. } => {
                assoc_resp_hdr.aid
            });
            (token, aid)
        });
    let cookie = u64::from(token) | 0x1000_0000;
    sme.on_mlme_event(MlmeEvent::RequestComplete {
        token,
        result: Ok(MlmeResponse::FrameCookie(cookie)),
    });
    sme.on_mlme_event(MlmeEvent::FrameTxStatus { cookie, ack: true });
    let token = assert_variant!(try_next(mlme_stream), Some(MlmeRequest::NewStation { token, params }) => {
        assert_eq!(params.peer, addr);
        assert_eq!(params.aid, aid);
        token
    });
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });
    aid
}

/// After the first protected association the AP installs the GTK and reads
/// back its Tx-RSC before starting the handshake.
fn complete_group_key_setup(sme: &mut ApSme, mlme_stream: &mut MlmeStream) {
    let token = assert_variant!(try_next(mlme_stream), Some(MlmeRequest::NewKey { token, key }) => {
        assert_eq!(key.address, None);
        assert_eq!(key.key_id, 1);
        assert_eq!(key.key.len(), 16);
        token
    });
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });
    let token = assert_variant!(try_next(mlme_stream), Some(MlmeRequest::GetKey { token, peer: None, key_id: 1 }) => token);
    sme.on_mlme_event(MlmeEvent::RequestComplete {
        token,
        result: Ok(MlmeResponse::KeySeq(Some(vec![0u8; 8]))),
    });
}

#[test]
fn ap_starts_success() {
    let (mut sme, mut mlme_stream, mut event_stream, _time_stream) = create_sme();
    let mut receiver = sme.on_start_command(unprotected_config());

    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::StartAp { token, params }) => {
        assert_eq!(params.ssid, SSID.to_vec());
        assert_ne!(params.beacon_interval, 0);
        assert_ne!(params.dtim_period, 0);
        assert!(!params.beacon_head.is_empty());
        token
    });
    assert_eq!(receiver.try_recv(), Ok(None));
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });
    assert_eq!(receiver.try_recv(), Ok(Some(StartResult::Success)));
    expect_ap_event(&mut event_stream, ApEvent::Started);
}

#[test]
fn ap_starts_timeout() {
    let (mut sme, _mlme_stream, _event_stream, mut time_stream) = create_sme();
    let mut receiver = sme.on_start_command(unprotected_config());

    let (_, event) = try_next(&mut time_stream).expect("expected a timer entry");
    sme.on_timeout(event);
    assert_eq!(receiver.try_recv(), Ok(Some(StartResult::TimedOut)));
}

#[test]
fn ap_starts_fails() {
    let (mut sme, mut mlme_stream, mut event_stream, _time_stream) = create_sme();
    let mut receiver = sme.on_start_command(unprotected_config());
    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::StartAp { token, .. }) => token);
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Err(-22) });
    assert_eq!(receiver.try_recv(), Ok(Some(StartResult::InternalError)));
    expect_ap_event(&mut event_stream, ApEvent::StartFailed);
}

#[test]
fn start_req_while_ap_is_starting() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = create_sme();
    let mut receiver_one = sme.on_start_command(unprotected_config());
    let mut receiver_two = sme.on_start_command(unprotected_config());
    assert_eq!(receiver_two.try_recv(), Ok(Some(StartResult::PreviousStartInProgress)));

    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::StartAp { token, .. }) => token);
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });
    assert_eq!(receiver_one.try_recv(), Ok(Some(StartResult::Success)));
}

#[test]
fn ap_stops_after_started() {
    let (mut sme, mut mlme_stream, mut event_stream, _time_stream) = start_unprotected_ap();
    let mut receiver = sme.on_stop_command();
    expect_ap_event(&mut event_stream, ApEvent::Stopping);
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::StopAp { .. }));
    assert_eq!(receiver.try_recv(), Ok(Some(())));
}

#[test]
fn invalid_configs_are_rejected() {
    let (mut sme, _mlme_stream, _event_stream, _time_stream) = create_sme();
    let mut receiver =
        sme.on_start_command(Config { ssid: vec![], ..unprotected_config() });
    assert_eq!(receiver.try_recv(), Ok(Some(StartResult::InvalidArguments)));

    let mut receiver =
        sme.on_start_command(Config { password: b"short".to_vec(), ..unprotected_config() });
    assert_eq!(receiver.try_recv(), Ok(Some(StartResult::InvalidArguments)));
}

#[test]
fn client_authenticates_open_system() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_unprotected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
}

#[test]
fn client_authenticates_unsupported_algorithm() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_unprotected_ap();
    sme.on_mlme_event(MlmeEvent::MgmtFrame { frame: shared_key_auth_frame(CLIENT_ADDR, AP_ADDR) });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::UNSUPPORTED_AUTH_ALGORITHM);
    });
}

#[test]
fn station_not_on_allow_list_is_refused_without_a_record() {
    let allowed: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    let refused: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
    let config = Config { authorized_macs: Some(vec![allowed]), ..unprotected_config() };
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_ap(config);

    sme.on_mlme_event(MlmeEvent::MgmtFrame { frame: auth_frame(refused, AP_ADDR) });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::UNSPECIFIED);
    });

    // No station record was created: a follow-up association is refused.
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: assoc_req_frame(refused, AP_ADDR, SSID, &[]),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::UNSPECIFIED);
    });
}

#[test]
fn client_associates_unprotected_network() {
    let (mut sme, mut mlme_stream, mut event_stream, _time_stream) = start_unprotected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    let aid = associate(&mut sme, &mut mlme_stream, CLIENT_ADDR, &[]);
    assert_eq!(aid, 1);
    expect_ap_event(&mut event_stream, ApEvent::StationAdded { addr: CLIENT_ADDR });
}

#[test]
fn client_associates_valid_rsne() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_protected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    let s_rsne = rsne_as_bytes(&make_rsne(
        Some(cipher::CCMP_128),
        vec![cipher::CCMP_128],
        vec![akm::PSK],
    ));
    associate(&mut sme, &mut mlme_stream, CLIENT_ADDR, &s_rsne[..]);
    complete_group_key_setup(&mut sme, &mut mlme_stream);

    // The authenticator opens the 4-Way Handshake with message 1.
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::Eapol { dst, data, .. }) => {
        assert_eq!(dst, CLIENT_ADDR);
        assert!(!data.is_empty());
    });
}

#[test]
fn client_associates_invalid_pairwise_cipher() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_protected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    let s_rsne =
        rsne_as_bytes(&make_rsne(Some(cipher::CCMP_128), vec![cipher::TKIP], vec![akm::PSK]));
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: assoc_req_frame(CLIENT_ADDR, AP_ADDR, SSID, &s_rsne[..]),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::INVALID_PAIRWISE_CIPHER);
    });
}

#[test]
fn client_associates_invalid_akm() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_protected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    let s_rsne =
        rsne_as_bytes(&make_rsne(Some(cipher::CCMP_128), vec![cipher::CCMP_128], vec![akm::SAE]));
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: assoc_req_frame(CLIENT_ADDR, AP_ADDR, SSID, &s_rsne[..]),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::INVALID_AKMP);
    });
}

#[test]
fn client_associates_missing_rsne() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_protected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: assoc_req_frame(CLIENT_ADDR, AP_ADDR, SSID, &[]),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::INVALID_IE);
    });
}

#[test]
fn aids_are_unique_across_stations() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_protected_ap();
    let s_rsne = rsne_as_bytes(&make_rsne(
        Some(cipher::CCMP_128),
        vec![cipher::CCMP_128],
        vec![akm::PSK],
    ));

    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    let aid1 = associate(&mut sme, &mut mlme_stream, CLIENT_ADDR, &s_rsne[..]);
    complete_group_key_setup(&mut sme, &mut mlme_stream);
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::Eapol { .. }));

    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR2);
    let aid2 = associate(&mut sme, &mut mlme_stream, CLIENT_ADDR2, &s_rsne[..]);
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::Eapol { .. }));

    assert_ne!(aid1, aid2);
    assert!(aid1 >= 1 && aid1 <= 2007);
    assert!(aid2 >= 1 && aid2 <= 2007);
}

#[test]
fn rsn_handshake_timeout_deauthenticates() {
    let (mut sme, mut mlme_stream, mut event_stream, mut time_stream) = start_protected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    let s_rsne = rsne_as_bytes(&make_rsne(
        Some(cipher::CCMP_128),
        vec![cipher::CCMP_128],
        vec![akm::PSK],
    ));
    associate(&mut sme, &mut mlme_stream, CLIENT_ADDR, &s_rsne[..]);
    complete_group_key_setup(&mut sme, &mut mlme_stream);
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::Eapol { .. }));

    for _ in 0..event::KEY_EXCHANGE_MAX_ATTEMPTS - 1 {
        let (_, event) = try_next(&mut time_stream).expect("expected a timer entry");
        sme.on_timeout(event);
        // Each expiry retransmits the outstanding key frame.
        assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::Eapol { .. }));
    }
    let (_, event) = try_next(&mut time_stream).expect("expected a timer entry");
    sme.on_timeout(event);

    // Retry budget exhausted: the station is deauthenticated and removed.
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        let parsed = mac::MgmtFrame::parse(&frame[..]).unwrap();
        assert_variant!(parsed.body, mac::MgmtBody::Deauth { deauth_hdr } => {
            assert_eq!(deauth_hdr.reason_code, mac::ReasonCode::FOURWAY_HANDSHAKE_TIMEOUT);
        });
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::DelStation { peer, .. }) => {
        assert_eq!(peer, CLIENT_ADDR);
    });
    expect_ap_event(&mut event_stream, ApEvent::StationRemoved { addr: CLIENT_ADDR });
}

#[test]
fn pbc_session_overlap_exits_pbc_mode() {
    let (mut sme, mut mlme_stream, mut event_stream, _time_stream) = start_ap(wsc_config());
    sme.push_button().expect("failed to enter PBC mode");
    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SetBeacon { token, tail, .. }) => {
        // PBC mode advertises the selected registrar.
        let attrs = wsc_ie::find_wsc_attrs(&tail[..]).expect("expected WSC IE in tail");
        let parsed = wsc_ie::parse_wsc_attrs(attrs).unwrap();
        assert_eq!(parsed.selected_registrar, Some(true));
        token
    });
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });

    // First enrollee probes; PBC stays active.
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: probe_req_frame([0x02, 0x11, 0x22, 0x33, 0x44, 0x55], SSID, Some([0x11; 16])),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { .. }));

    // A second, distinct enrollee within the monitor window: overlap. PBC
    // mode exits before this probe's response goes out.
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: probe_req_frame([0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE], SSID, Some([0x22; 16])),
    });
    expect_ap_event(&mut event_stream, ApEvent::PbcModeExit);
    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SetBeacon { token, tail, .. }) => {
        let attrs = wsc_ie::find_wsc_attrs(&tail[..]).expect("expected WSC IE in tail");
        let parsed = wsc_ie::parse_wsc_attrs(attrs).unwrap();
        assert_eq!(parsed.selected_registrar, None);
        token
    });
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        let parsed = mac::MgmtFrame::parse(&frame[..]).unwrap();
        assert_variant!(parsed.body, mac::MgmtBody::ProbeResp { .. });
    });

    // WSC associations are refused after the overlap.
    authenticate(&mut sme, &mut mlme_stream, [0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: assoc_req_frame(
            [0x02, 0x11, 0x22, 0x33, 0x44, 0x55],
            AP_ADDR,
            SSID,
            &wsc_assoc_ie()[..],
        ),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { frame, .. }) => {
        assert_eq!(response_status(&frame[..]), StatusCode::UNSPECIFIED);
    });
}

#[test]
fn pbc_enrollee_admitted_and_purged_after_success() {
    let enrollee: MacAddr = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
    let (mut sme, mut mlme_stream, mut event_stream, _time_stream) = start_ap(wsc_config());
    sme.push_button().expect("failed to enter PBC mode");
    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SetBeacon { token, .. }) => token);
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });

    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: probe_req_frame(enrollee, SSID, Some([0x11; 16])),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { .. }));

    authenticate(&mut sme, &mut mlme_stream, enrollee);
    associate(&mut sme, &mut mlme_stream, enrollee, &wsc_assoc_ie()[..]);
    expect_ap_event(&mut event_stream, ApEvent::RegistrationStart { addr: enrollee });

    sme.on_registration_success(enrollee);
    // Credential delivered: the session ends and the enrollee's probe
    // records are purged.
    expect_ap_event(&mut event_stream, ApEvent::PbcModeExit);
    expect_ap_event(&mut event_stream, ApEvent::RegistrationSuccess { addr: enrollee });
}

#[test]
fn beacon_updates_are_serialized() {
    let (mut sme, mut mlme_stream, _event_stream, _time_stream) = start_ap(wsc_config());
    sme.push_button().expect("failed to enter PBC mode");
    let token = assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SetBeacon { token, .. }) => token);

    // Overlap while the first SET_BEACON is still in flight: no second
    // SET_BEACON yet.
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: probe_req_frame([0x02, 0x11, 0x22, 0x33, 0x44, 0x55], SSID, Some([0x11; 16])),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { .. }));
    sme.on_mlme_event(MlmeEvent::MgmtFrame {
        frame: probe_req_frame([0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE], SSID, Some([0x22; 16])),
    });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SendFrame { .. }));
    assert_variant!(try_next(&mut mlme_stream), None);

    // The ack releases the queued update.
    sme.on_mlme_event(MlmeEvent::RequestComplete { token, result: Ok(MlmeResponse::Ack) });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::SetBeacon { .. }));
}

#[test]
fn disassociation_removes_station() {
    let (mut sme, mut mlme_stream, mut event_stream, _time_stream) = start_unprotected_ap();
    authenticate(&mut sme, &mut mlme_stream, CLIENT_ADDR);
    associate(&mut sme, &mut mlme_stream, CLIENT_ADDR, &[]);
    expect_ap_event(&mut event_stream, ApEvent::StationAdded { addr: CLIENT_ADDR });

    let mut frame = vec![];
    mac::write_disassoc_frame(&mut frame, AP_ADDR, CLIENT_ADDR, AP_ADDR, ReasonCode::LEAVING);
    sme.on_mlme_event(MlmeEvent::MgmtFrame { frame });
    assert_variant!(try_next(&mut mlme_stream), Some(MlmeRequest::DelStation { peer, .. }) => {
        assert_eq!(peer, CLIENT_ADDR);
    });
    expect_ap_event(&mut event_stream, ApEvent::StationRemoved { addr: CLIENT_ADDR });
}
