//! Per-interface serve loops: carry SME requests to the kernel, route
//! kernel events and timer expirations back into the state machines.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use failure::{format_err, Error};
use futures::channel::{mpsc, oneshot};
use futures::{select, FutureExt, StreamExt};
use log::{debug, info, warn};

use wifi_common::mac::{MgmtBody, MgmtFrame};
use wifi_common::MacAddr;
use wifi_nl80211::rtnl::RtnlHandle;
use wifi_nl80211::{
    CmdResult, CommandId, CqmAttr, Handle, Nl80211Attr, Nl80211Cmd, Nl80211Event, RekeyAttr,
    StationFlagUpdate, STA_FLAG_ASSOCIATED, STA_FLAG_AUTHENTICATED, STA_FLAG_AUTHORIZED,
};
use wifi_sme::ap::{ApSme, Config as ApConfig};
use wifi_sme::client::{BssDescription, ClientSme, ConnectResult, Credential};
use wifi_sme::timer::{TimeEntry, TimedEvent};
use wifi_sme::{
    CqmEvent, DeviceInfo, MlmeEvent, MlmeRequest, MlmeResponse, MlmeStream, RequestToken, Station,
};

use crate::config::ProfileStorage;

const EAPOL_ETHERTYPE: u16 = 0x888E;

/// Operations the upper layer may request on a client interface. The
/// command surface (D-Bus or similar) lives outside this daemon core.
#[allow(dead_code)]
pub enum ControlRequest {
    Connect { bss: BssDescription, done: oneshot::Sender<ConnectResult> },
    Disconnect { done: oneshot::Sender<()> },
    Roam { bss: BssDescription, done: oneshot::Sender<ConnectResult> },
}

/// Operations on an AP interface.
#[allow(dead_code)]
pub enum ApControlRequest {
    Start { config: ApConfig },
    Stop,
    PushButton,
}

/// What a request expects back from the kernel.
#[derive(Clone, Copy, Debug)]
enum ResponseKind {
    Ack,
    KeySeq,
    FrameCookie,
}

type Completion = (RequestToken, ResponseKind, CmdResult);

/// Tracks the outstanding nl80211 commands of one interface so that
/// teardown can cancel all of them; a cancelled completion never reaches
/// the state machine.
struct Mlme {
    handle: Handle,
    rtnl: Rc<RefCell<RtnlHandle>>,
    ifindex: u32,
    outstanding: HashMap<RequestToken, CommandId>,
    completion_sink: mpsc::UnboundedSender<Completion>,
}

impl Mlme {
    fn new(
        handle: Handle,
        rtnl: Rc<RefCell<RtnlHandle>>,
        ifindex: u32,
        completion_sink: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Mlme { handle, rtnl, ifindex, outstanding: HashMap::new(), completion_sink }
    }

    fn forward(&mut self, request: MlmeRequest) {
        match request {
            MlmeRequest::SetLinkMode { mode } => {
                if let Err(e) = self.rtnl.borrow_mut().set_link_mode(self.ifindex, mode) {
                    warn!("failed to set link mode: {}", e);
                }
            }
            MlmeRequest::SetLinkOperUp => {
                if let Err(e) = self.rtnl.borrow_mut().set_oper_up(self.ifindex) {
                    warn!("failed to set operational state: {}", e);
                }
            }
            MlmeRequest::CancelAll => {
                for (_, command_id) in self.outstanding.drain() {
                    self.handle.cancel(command_id);
                }
            }
            MlmeRequest::RegisterFrame { frame_type, match_prefix } => {
                let (_, _completion) =
                    self.handle.register_frame(self.ifindex, frame_type, &match_prefix[..]);
                // Registrations are fire-and-forget; a failure surfaces as
                // missing frames, which the FSMs time out on.
            }
            tracked => self.forward_tracked(tracked),
        }
    }

    fn forward_tracked(&mut self, request: MlmeRequest) {
        let (token, kind, cmd, attrs) = match self.build_command(request) {
            Some(parts) => parts,
            None => return,
        };
        let (command_id, receiver) = self.handle.send(cmd, attrs);
        if let Some(token) = token {
            self.outstanding.insert(token, command_id);
            let sink = self.completion_sink.clone();
            tokio::task::spawn_local(async move {
                // A dropped sender means the command was cancelled; nothing
                // is delivered then.
                if let Ok(result) = receiver.await {
                    let _ = sink.unbounded_send((token, kind, result));
                }
            });
        }
    }

    /// Maps a typed request onto an nl80211 command. Returns None for
    /// requests that are handled elsewhere.
    fn build_command(
        &self,
        request: MlmeRequest,
    ) -> Option<(Option<RequestToken>, ResponseKind, Nl80211Cmd, Vec<Nl80211Attr>)> {
        let ifindex = self.ifindex;
        Some(match request {
            MlmeRequest::Connect { token, params } => {
                let mut attrs = vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Ssid(params.ssid),
                    Nl80211Attr::Mac(params.bssid),
                    Nl80211Attr::WiphyFreq(params.freq),
                    Nl80211Attr::AuthType(params.auth_type),
                ];
                if let Some(prev_bssid) = params.prev_bssid {
                    attrs.push(Nl80211Attr::PrevBssid(prev_bssid));
                }
                if !params.ies.is_empty() {
                    attrs.push(Nl80211Attr::Ie(params.ies));
                }
                if let Some(rsn) = params.rsn {
                    attrs.push(Nl80211Attr::WpaVersions(rsn.wpa_versions));
                    attrs.push(Nl80211Attr::CipherSuitesPairwise(vec![rsn.pairwise_cipher]));
                    attrs.push(Nl80211Attr::CipherSuiteGroup(rsn.group_cipher));
                    attrs.push(Nl80211Attr::AkmSuites(vec![rsn.akm]));
                    attrs.push(Nl80211Attr::UseMfp(rsn.mfp));
                    attrs.push(Nl80211Attr::ControlPort);
                    attrs.push(Nl80211Attr::ControlPortEthertype(EAPOL_ETHERTYPE));
                    attrs.push(Nl80211Attr::ControlPortOverNl80211);
                }
                (Some(token), ResponseKind::Ack, Nl80211Cmd::Connect, attrs)
            }
            MlmeRequest::Authenticate { token, params } => (
                Some(token),
                ResponseKind::Ack,
                Nl80211Cmd::Authenticate,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Mac(params.bssid),
                    Nl80211Attr::WiphyFreq(params.freq),
                    Nl80211Attr::Ssid(params.ssid),
                    Nl80211Attr::AuthType(wifi_nl80211::AUTH_TYPE_FT),
                    Nl80211Attr::Ie(params.ies),
                ],
            ),
            MlmeRequest::Reassociate { token, params } => {
                let mut attrs = vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Mac(params.bssid),
                    Nl80211Attr::WiphyFreq(params.freq),
                    Nl80211Attr::Ssid(params.ssid),
                    Nl80211Attr::PrevBssid(params.prev_bssid),
                    Nl80211Attr::Ie(params.ies),
                ];
                if let Some(rsn) = params.rsn {
                    attrs.push(Nl80211Attr::WpaVersions(rsn.wpa_versions));
                    attrs.push(Nl80211Attr::CipherSuitesPairwise(vec![rsn.pairwise_cipher]));
                    attrs.push(Nl80211Attr::CipherSuiteGroup(rsn.group_cipher));
                    attrs.push(Nl80211Attr::AkmSuites(vec![rsn.akm]));
                    attrs.push(Nl80211Attr::UseMfp(rsn.mfp));
                }
                (Some(token), ResponseKind::Ack, Nl80211Cmd::Associate, attrs)
            }
            MlmeRequest::Deauthenticate { peer, reason_code } => (
                None,
                ResponseKind::Ack,
                Nl80211Cmd::Deauthenticate,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Mac(peer),
                    Nl80211Attr::ReasonCode(reason_code),
                ],
            ),
            MlmeRequest::Eapol { token, dst, data } => (
                Some(token),
                ResponseKind::Ack,
                Nl80211Cmd::ControlPortFrame,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Mac(dst),
                    Nl80211Attr::ControlPortEthertype(EAPOL_ETHERTYPE),
                    Nl80211Attr::Frame(data),
                ],
            ),
            MlmeRequest::NewKey { token, key } => {
                let mut attrs = vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::KeyData(key.key),
                    Nl80211Attr::KeyIdx(key.key_id),
                    Nl80211Attr::KeyCipher(key.cipher),
                ];
                if let Some(address) = key.address {
                    attrs.push(Nl80211Attr::Mac(address));
                }
                if let Some(rsc) = key.rsc {
                    attrs.push(Nl80211Attr::KeySeq(rsc));
                }
                (Some(token), ResponseKind::Ack, Nl80211Cmd::NewKey, attrs)
            }
            MlmeRequest::SetKeyDefault { token, key_id, mgmt } => {
                let mut attrs =
                    vec![Nl80211Attr::Ifindex(ifindex), Nl80211Attr::KeyIdx(key_id)];
                attrs.push(if mgmt {
                    Nl80211Attr::KeyDefaultMgmt
                } else {
                    Nl80211Attr::KeyDefault
                });
                (Some(token), ResponseKind::Ack, Nl80211Cmd::SetKey, attrs)
            }
            MlmeRequest::DelKey { peer, key_id } => {
                let mut attrs =
                    vec![Nl80211Attr::Ifindex(ifindex), Nl80211Attr::KeyIdx(key_id)];
                if let Some(peer) = peer {
                    attrs.push(Nl80211Attr::Mac(peer));
                }
                (None, ResponseKind::Ack, Nl80211Cmd::DelKey, attrs)
            }
            MlmeRequest::GetKey { token, peer, key_id } => {
                let mut attrs =
                    vec![Nl80211Attr::Ifindex(ifindex), Nl80211Attr::KeyIdx(key_id)];
                if let Some(peer) = peer {
                    attrs.push(Nl80211Attr::Mac(peer));
                }
                (Some(token), ResponseKind::KeySeq, Nl80211Cmd::GetKey, attrs)
            }
            MlmeRequest::NewStation { token, params } => (
                Some(token),
                ResponseKind::Ack,
                Nl80211Cmd::NewStation,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Mac(params.peer),
                    Nl80211Attr::StaAid(params.aid),
                    Nl80211Attr::StaListenInterval(params.listen_interval),
                    Nl80211Attr::StaSupportedRates(params.supported_rates),
                    Nl80211Attr::StaFlags2(StationFlagUpdate {
                        mask: STA_FLAG_AUTHENTICATED | STA_FLAG_ASSOCIATED,
                        set: STA_FLAG_AUTHENTICATED | STA_FLAG_ASSOCIATED,
                    }),
                ],
            ),
            MlmeRequest::SetStationAuthorized { token, peer } => (
                Some(token),
                ResponseKind::Ack,
                Nl80211Cmd::SetStation,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Mac(peer),
                    Nl80211Attr::StaFlags2(StationFlagUpdate {
                        mask: STA_FLAG_AUTHORIZED,
                        set: STA_FLAG_AUTHORIZED,
                    }),
                ],
            ),
            MlmeRequest::DelStation { peer, reason_code } => (
                None,
                ResponseKind::Ack,
                Nl80211Cmd::DelStation,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Mac(peer),
                    Nl80211Attr::ReasonCode(reason_code),
                ],
            ),
            MlmeRequest::StartAp { token, params } => (
                Some(token),
                ResponseKind::Ack,
                Nl80211Cmd::StartAp,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Ssid(params.ssid),
                    Nl80211Attr::WiphyFreq(params.freq),
                    Nl80211Attr::BeaconInterval(u32::from(params.beacon_interval)),
                    Nl80211Attr::DtimPeriod(u32::from(params.dtim_period)),
                    Nl80211Attr::BeaconHead(params.beacon_head),
                    Nl80211Attr::BeaconTail(params.beacon_tail),
                ],
            ),
            MlmeRequest::StopAp { token } => (
                Some(token),
                ResponseKind::Ack,
                Nl80211Cmd::StopAp,
                vec![Nl80211Attr::Ifindex(ifindex)],
            ),
            MlmeRequest::SetBeacon { token, head, tail } => (
                Some(token),
                ResponseKind::Ack,
                Nl80211Cmd::SetBeacon,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::BeaconHead(head),
                    Nl80211Attr::BeaconTail(tail),
                ],
            ),
            MlmeRequest::SendFrame { token, frame } => (
                Some(token),
                ResponseKind::FrameCookie,
                Nl80211Cmd::Frame,
                vec![Nl80211Attr::Ifindex(ifindex), Nl80211Attr::Frame(frame)],
            ),
            MlmeRequest::SetCqm { rssi_thold_dbm, hysteresis_db } => (
                None,
                ResponseKind::Ack,
                Nl80211Cmd::SetCqm,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::Cqm(vec![
                        CqmAttr::RssiThold(rssi_thold_dbm as u32),
                        CqmAttr::RssiHyst(hysteresis_db),
                    ]),
                ],
            ),
            MlmeRequest::SetRekeyOffload { kek, kck, replay_ctr } => (
                None,
                ResponseKind::Ack,
                Nl80211Cmd::SetRekeyOffload,
                vec![
                    Nl80211Attr::Ifindex(ifindex),
                    Nl80211Attr::RekeyData(vec![
                        RekeyAttr::Kek(kek),
                        RekeyAttr::Kck(kck),
                        RekeyAttr::ReplayCtr(replay_ctr),
                    ]),
                ],
            ),
            MlmeRequest::SetLinkMode { .. }
            | MlmeRequest::SetLinkOperUp
            | MlmeRequest::CancelAll
            | MlmeRequest::RegisterFrame { .. } => return None,
        })
    }

    fn complete(
        &mut self,
        token: RequestToken,
        kind: ResponseKind,
        result: CmdResult,
    ) -> Option<MlmeEvent> {
        if self.outstanding.remove(&token).is_none() {
            // Cancelled while the completion was in flight.
            return None;
        }
        let result = match result {
            Err(errno) => Err(errno),
            Ok(messages) => Ok(match kind {
                ResponseKind::Ack => MlmeResponse::Ack,
                ResponseKind::KeySeq => {
                    let seq = messages.iter().find_map(|m| {
                        m.find(|a| match a {
                            Nl80211Attr::KeySeq(seq) => Some(seq.clone()),
                            _ => None,
                        })
                    });
                    MlmeResponse::KeySeq(seq)
                }
                ResponseKind::FrameCookie => {
                    let cookie = messages.iter().find_map(|m| {
                        m.find(|a| match a {
                            Nl80211Attr::Cookie(cookie) => Some(*cookie),
                            _ => None,
                        })
                    });
                    match cookie {
                        Some(cookie) => MlmeResponse::FrameCookie(cookie),
                        None => MlmeResponse::Ack,
                    }
                }
            }),
        };
        Some(MlmeEvent::RequestComplete { token, result })
    }

    fn teardown(&mut self) {
        for (_, command_id) in self.outstanding.drain() {
            self.handle.cancel(command_id);
        }
    }
}

/// Decodes a multicast notification into the SME's event type.
fn decode_event(event: Nl80211Event) -> Option<MlmeEvent> {
    let find_mac = |attrs: &[Nl80211Attr]| -> Option<MacAddr> {
        attrs.iter().find_map(|a| match a {
            Nl80211Attr::Mac(mac) => Some(*mac),
            _ => None,
        })
    };
    let find_frame = |attrs: &[Nl80211Attr]| -> Option<Vec<u8>> {
        attrs.iter().find_map(|a| match a {
            Nl80211Attr::Frame(frame) => Some(frame.clone()),
            _ => None,
        })
    };
    match event.cmd {
        Nl80211Cmd::Connect => {
            let status_code = event
                .attrs
                .iter()
                .find_map(|a| match a {
                    Nl80211Attr::StatusCode(code) => Some(*code),
                    _ => None,
                })
                .unwrap_or(1);
            let timed_out = event.attrs.iter().any(|a| *a == Nl80211Attr::TimedOut);
            let resp_ies = event
                .attrs
                .iter()
                .find_map(|a| match a {
                    Nl80211Attr::RespIe(ies) => Some(ies.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            Some(MlmeEvent::ConnectConf { status_code, timed_out, resp_ies })
        }
        Nl80211Cmd::Authenticate => {
            find_frame(&event.attrs).map(|frame| MlmeEvent::AuthenticateConf { frame })
        }
        Nl80211Cmd::Associate => {
            find_frame(&event.attrs).map(|frame| MlmeEvent::AssociateConf { frame })
        }
        Nl80211Cmd::Deauthenticate | Nl80211Cmd::Disassociate => {
            // The notification wraps the management frame itself.
            let frame = find_frame(&event.attrs)?;
            let parsed = MgmtFrame::parse(&frame[..]).ok()?;
            let peer = parsed.hdr.addr2;
            match parsed.body {
                MgmtBody::Deauth { deauth_hdr } => Some(MlmeEvent::DeauthenticateInd {
                    peer,
                    reason_code: deauth_hdr.reason_code.0,
                }),
                MgmtBody::Disassoc { disassoc_hdr } => Some(MlmeEvent::DisassociateInd {
                    peer,
                    reason_code: disassoc_hdr.reason_code.0,
                }),
                _ => None,
            }
        }
        Nl80211Cmd::Disconnect => {
            let reason_code = event
                .attrs
                .iter()
                .find_map(|a| match a {
                    Nl80211Attr::ReasonCode(code) => Some(*code),
                    _ => None,
                })
                .unwrap_or(0);
            let by_ap = event.attrs.iter().any(|a| *a == Nl80211Attr::DisconnectedByAp);
            Some(MlmeEvent::DisconnectInd { reason_code, by_ap })
        }
        Nl80211Cmd::Frame => find_frame(&event.attrs).map(|frame| MlmeEvent::MgmtFrame { frame }),
        Nl80211Cmd::FrameTxStatus => {
            let cookie = event.attrs.iter().find_map(|a| match a {
                Nl80211Attr::Cookie(cookie) => Some(*cookie),
                _ => None,
            })?;
            let ack = event.attrs.iter().any(|a| *a == Nl80211Attr::Ack);
            Some(MlmeEvent::FrameTxStatus { cookie, ack })
        }
        Nl80211Cmd::ControlPortFrame => {
            let src = find_mac(&event.attrs)?;
            let data = find_frame(&event.attrs)?;
            Some(MlmeEvent::EapolRx { src, data })
        }
        Nl80211Cmd::NotifyCqm => {
            let cqm = event.attrs.iter().find_map(|a| match a {
                Nl80211Attr::Cqm(attrs) => Some(attrs.clone()),
                _ => None,
            })?;
            cqm.iter().find_map(|attr| match attr {
                CqmAttr::RssiThresholdEvent(0) => Some(MlmeEvent::Cqm(CqmEvent::RssiLow)),
                CqmAttr::RssiThresholdEvent(_) => Some(MlmeEvent::Cqm(CqmEvent::RssiHigh)),
                attr if attr.is_beacon_loss() => Some(MlmeEvent::Cqm(CqmEvent::BeaconLoss)),
                _ => None,
            })
        }
        Nl80211Cmd::SetRekeyOffload => {
            let rekey = event.attrs.iter().find_map(|a| match a {
                Nl80211Attr::RekeyData(attrs) => Some(attrs.clone()),
                _ => None,
            })?;
            let replay_ctr = rekey.iter().find_map(|attr| match attr {
                RekeyAttr::ReplayCtr(ctr) => Some(u64::from_be_bytes(*ctr)),
                _ => None,
            });
            match replay_ctr {
                Some(replay_ctr) => Some(MlmeEvent::RekeyOffload { replay_ctr }),
                None => {
                    // A rekey notification without the counter carries no
                    // usable state; it is dropped.
                    debug!("REKEY_DATA without REPLAY_CTR; dropping event");
                    None
                }
            }
        }
        Nl80211Cmd::DelInterface => Some(MlmeEvent::InterfaceRemoved),
        _ => None,
    }
}

/// The single-threaded serve loop shared by both SME roles.
async fn serve_station<S, C, F>(
    mut mlme: Mlme,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    mut station: S,
    mut mlme_stream: MlmeStream,
    time_stream: wifi_sme::timer::TimeStream<S::Event>,
    mut events: mpsc::UnboundedReceiver<Nl80211Event>,
    mut control: mpsc::UnboundedReceiver<C>,
    mut on_control: F,
) -> Result<(), Error>
where
    S: Station,
    F: FnMut(&mut S, C),
{
    let mut timeouts = make_timeout_stream(time_stream).fuse();

    loop {
        select! {
            request = mlme_stream.next() => match request {
                Some(request) => mlme.forward(request),
                None => return Err(format_err!("SME request stream ended unexpectedly")),
            },
            event = events.next() => match event {
                Some(event) => {
                    let removed = event.cmd == Nl80211Cmd::DelInterface;
                    if let Some(event) = decode_event(event) {
                        station.on_mlme_event(event);
                    }
                    if removed {
                        info!("interface {} is gone; stopping its serve loop", mlme.ifindex);
                        mlme.teardown();
                        return Ok(());
                    }
                }
                None => {
                    // Watcher dropped us: the interface went away.
                    station.on_mlme_event(MlmeEvent::InterfaceRemoved);
                    mlme.teardown();
                    return Ok(());
                }
            },
            completion = completions.next() => match completion {
                Some((token, kind, result)) => {
                    if let Some(event) = mlme.complete(token, kind, result) {
                        station.on_mlme_event(event);
                    }
                }
                None => return Err(format_err!("completion stream ended unexpectedly")),
            },
            timeout = timeouts.next() => match timeout {
                Some(timed_event) => station.on_timeout(timed_event),
                None => return Err(format_err!("SME timer stream ended unexpectedly")),
            },
            request = control.next() => match request {
                Some(request) => on_control(&mut station, request),
                // The controller going away is not fatal; the FSM lives on.
                None => (),
            },
        }
    }
}

/// Turns (deadline, event) entries into a stream of fired timeouts.
fn make_timeout_stream<E>(
    time_stream: wifi_sme::timer::TimeStream<E>,
) -> impl futures::Stream<Item = TimedEvent<E>> {
    time_stream
        .map(|(deadline, timed_event): TimeEntry<E>| {
            let now = Instant::now();
            let delay = if deadline > now { deadline - now } else { std::time::Duration::from_millis(0) };
            tokio::time::sleep(delay).map(|_| timed_event)
        })
        .buffer_unordered(usize::max_value())
}

/// Serves a client-mode interface until it disappears.
pub async fn serve_client(
    device_info: DeviceInfo,
    handle: Handle,
    rtnl: Rc<RefCell<RtnlHandle>>,
    events: mpsc::UnboundedReceiver<Nl80211Event>,
    control: mpsc::UnboundedReceiver<ControlRequest>,
    storage: Rc<dyn ProfileStorage>,
) -> Result<(), Error> {
    let ifindex = device_info.ifindex;
    let (sme, mlme_stream, mut sme_events, time_stream) = ClientSme::new(device_info);
    tokio::task::spawn_local(async move {
        while let Some(event) = sme_events.next().await {
            info!("client iface {}: {:?}", ifindex, event);
        }
    });

    let (completion_sink, completions) = mpsc::unbounded();
    let mlme = Mlme::new(handle, rtnl, ifindex, completion_sink);
    serve_station(mlme, completions, sme, mlme_stream, time_stream, events, control, move |sme, request| {
        match request {
            ControlRequest::Connect { bss, done } => {
                let credential = storage
                    .load(&bss.ssid[..])
                    .ok()
                    .flatten()
                    .map(|profile| profile.credential)
                    .unwrap_or(Credential::None);
                let receiver =
                    sme.on_connect_command(wifi_sme::client::ConnectRequest { bss, credential });
                forward_oneshot(receiver, done);
            }
            ControlRequest::Disconnect { done } => {
                forward_oneshot(sme.on_disconnect_command(), done);
            }
            ControlRequest::Roam { bss, done } => {
                forward_oneshot(sme.on_roam_command(bss), done);
            }
        }
    })
    .await
}

/// Serves an AP-mode interface until it disappears.
pub async fn serve_ap(
    device_info: DeviceInfo,
    handle: Handle,
    rtnl: Rc<RefCell<RtnlHandle>>,
    events: mpsc::UnboundedReceiver<Nl80211Event>,
    control: mpsc::UnboundedReceiver<ApControlRequest>,
) -> Result<(), Error> {
    let ifindex = device_info.ifindex;
    let (sme, mlme_stream, mut sme_events, time_stream) = ApSme::new(device_info);
    tokio::task::spawn_local(async move {
        while let Some(event) = sme_events.next().await {
            info!("ap iface {}: {:?}", ifindex, event);
        }
    });

    let (completion_sink, completions) = mpsc::unbounded();
    let mlme = Mlme::new(handle, rtnl, ifindex, completion_sink);
    serve_station(mlme, completions, sme, mlme_stream, time_stream, events, control, |sme, request| {
        match request {
            ApControlRequest::Start { config } => {
                let _ = sme.on_start_command(config);
            }
            ApControlRequest::Stop => {
                let _ = sme.on_stop_command();
            }
            ApControlRequest::PushButton => {
                if let Err(e) = sme.push_button() {
                    warn!("push button refused: {}", e);
                }
            }
        }
    })
    .await
}

fn forward_oneshot<T: 'static>(receiver: oneshot::Receiver<T>, done: oneshot::Sender<T>) {
    tokio::task::spawn_local(async move {
        if let Ok(result) = receiver.await {
            let _ = done.send(result);
        }
    });
}
