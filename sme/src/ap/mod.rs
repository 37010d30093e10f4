//! Soft-AP station management: the probe/authentication/association
//! responder, per-client key exchanges, and WSC push-button sessions.

mod aid;
mod authenticator;
pub mod event;
mod remote_client;
mod rsn;
mod wsc;

use futures::channel::{mpsc, oneshot};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use wifi_common::ie::rsn::rsne::{self, Rsne};
use wifi_common::ie::wsc as wsc_ie;
use wifi_common::ie::{self, Id};
use wifi_common::mac::{
    self, AuthAlgorithm, CapabilityInfo, MgmtBody, MgmtFrame, ReasonCode, StatusCode,
};
use wifi_common::{MacAddr, Ssid, BCAST_ADDR};
use wifi_rsn::key::exchange::Key;
use wifi_rsn::key::gtk::GtkProvider;
use wifi_rsn::psk;
use wifi_rsn::rsna::{SecAssocStatus, SecAssocUpdate, UpdateSink};
use wifi_rsn::crypto_utils::nonce::NonceReader;

use crate::responder::Responder;
use crate::sink::{MlmeSink, UnboundedSink};
use crate::timer::{self, EventId, TimedEvent};
use crate::{
    DeviceInfo, KeyConfig, MlmeEvent, MlmeRequest, MlmeResponse, MlmeStream, RequestToken,
    StationParams,
};

use self::aid::AssociationId;
use self::event::{ClientEvent, Event, SmeEvent};
use self::remote_client::ClientState;
use self::rsn::{create_wpa2_psk_rsne, validate_s_rsne};
use self::wsc::PbcState;

pub use self::event::{PBC_MONITOR_TIME, PBC_WALK_TIME};

const DEFAULT_BEACON_PERIOD: u16 = 100;
const DEFAULT_DTIM_PERIOD: u8 = 1;

/// Events surfaced to the upper layer.
#[derive(Clone, Debug, PartialEq)]
pub enum ApEvent {
    Started,
    StartFailed,
    Stopping,
    StationAdded { addr: MacAddr },
    StationRemoved { addr: MacAddr },
    RegistrationStart { addr: MacAddr },
    RegistrationSuccess { addr: MacAddr },
    PbcModeExit,
}

pub type ApEventStream = mpsc::UnboundedReceiver<ApEvent>;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub ssid: Ssid,
    pub password: Vec<u8>,
    pub freq: u32,
    pub channel: u8,
    /// Supported rates in 500 kb/s units; the basic-rate bit 0x80 marks the
    /// mandatory subset.
    pub rates: Vec<u8>,
    /// When set, only these stations may authenticate.
    pub authorized_macs: Option<Vec<MacAddr>>,
    pub wsc_device: Option<wsc_ie::DeviceInfo>,
}

#[derive(Debug, PartialEq)]
pub enum StartResult {
    Success,
    AlreadyStarted,
    InternalError,
    Canceled,
    TimedOut,
    PreviousStartInProgress,
    InvalidArguments,
}

mod internal {
    use std::sync::Arc;

    use crate::ap::{ApEvent, Event};
    use crate::sink::{MlmeSink, UnboundedSink};
    use crate::timer::Timer;
    use crate::{DeviceInfo, RequestToken};

    pub struct Context {
        pub device_info: Arc<DeviceInfo>,
        pub mlme_sink: MlmeSink,
        pub event_sink: UnboundedSink<ApEvent>,
        pub(crate) timer: Timer<Event>,
        next_token: RequestToken,
    }

    impl Context {
        pub fn new(
            device_info: Arc<DeviceInfo>,
            mlme_sink: MlmeSink,
            event_sink: UnboundedSink<ApEvent>,
            timer: Timer<Event>,
        ) -> Self {
            Context { device_info, mlme_sink, event_sink, timer, next_token: 0 }
        }

        pub fn token(&mut self) -> RequestToken {
            self.next_token += 1;
            self.next_token
        }
    }
}

use self::internal::Context;

pub type TimeStream = timer::TimeStream<Event>;

#[derive(Clone)]
struct RsnCfg {
    psk: psk::Psk,
    rsne: Rsne,
}

enum State {
    Idle {
        ctx: Context,
    },
    Starting {
        ctx: Context,
        config: Config,
        rsn_cfg: Option<RsnCfg>,
        responder: Responder<StartResult>,
        token: RequestToken,
        start_timeout: EventId,
    },
    Started {
        bss: InfraBss,
    },
}

pub struct ApSme {
    state: Option<State>,
}

impl ApSme {
    pub fn new(device_info: DeviceInfo) -> (Self, MlmeStream, ApEventStream, TimeStream) {
        let (mlme_sink, mlme_stream) = mpsc::unbounded();
        let (event_sink, event_stream) = mpsc::unbounded();
        let (timer, time_stream) = timer::create_timer();
        let sme = ApSme {
            state: Some(State::Idle {
                ctx: Context::new(
                    Arc::new(device_info),
                    MlmeSink::new(mlme_sink),
                    UnboundedSink::new(event_sink),
                    timer,
                ),
            }),
        };
        (sme, mlme_stream, event_stream, time_stream)
    }

    pub fn on_start_command(&mut self, config: Config) -> oneshot::Receiver<StartResult> {
        let (responder, receiver) = Responder::new();
        self.state = self.state.take().map(|state| match state {
            State::Idle { mut ctx } => {
                if let Err(result) = validate_config(&config) {
                    responder.respond(result);
                    return State::Idle { ctx };
                }

                let rsn_cfg = match create_rsn_cfg(&config.ssid[..], &config.password[..]) {
                    Ok(rsn_cfg) => rsn_cfg,
                    Err(e) => {
                        error!("error configuring RSN: {}", e);
                        responder.respond(StartResult::InternalError);
                        return State::Idle { ctx };
                    }
                };

                let (head, tail) = build_beacon_frames(
                    &ctx.device_info.addr,
                    &config,
                    rsn_cfg.as_ref(),
                    false,
                );
                let token = ctx.token();
                ctx.mlme_sink.send(MlmeRequest::StartAp {
                    token,
                    params: crate::StartApParams {
                        ssid: config.ssid.clone(),
                        freq: config.freq,
                        beacon_interval: DEFAULT_BEACON_PERIOD,
                        dtim_period: DEFAULT_DTIM_PERIOD,
                        beacon_head: head,
                        beacon_tail: tail,
                    },
                });
                register_mgmt_frames(&mut ctx);
                let start_timeout = ctx.timer.schedule(Event::Sme { event: SmeEvent::StartTimeout });

                State::Starting { ctx, config, rsn_cfg, responder, token, start_timeout }
            }
            s @ State::Starting { .. } => {
                responder.respond(StartResult::PreviousStartInProgress);
                s
            }
            s @ State::Started { .. } => {
                responder.respond(StartResult::AlreadyStarted);
                s
            }
        });
        receiver
    }

    pub fn on_stop_command(&mut self) -> oneshot::Receiver<()> {
        let (stop_responder, receiver) = Responder::new();
        self.state = self.state.take().map(|state| match state {
            s @ State::Idle { .. } => {
                stop_responder.respond(());
                s
            }
            State::Starting { ctx, responder: start_responder, .. } => {
                start_responder.respond(StartResult::Canceled);
                stop_responder.respond(());
                State::Idle { ctx }
            }
            State::Started { bss } => {
                let mut ctx = bss.destroy();
                ctx.event_sink.send(ApEvent::Stopping);
                let token = ctx.token();
                ctx.mlme_sink.send(MlmeRequest::StopAp { token });
                stop_responder.respond(());
                State::Idle { ctx }
            }
        });
        receiver
    }

    /// Activates WSC push-button mode for one walk time.
    pub fn push_button(&mut self) -> Result<(), failure::Error> {
        match self.state.as_mut() {
            Some(State::Started { bss }) => bss.push_button(),
            _ => failure::bail!("AP is not started"),
        }
    }

    /// The external EAP-WSC method delivered the credential to an enrollee.
    pub fn on_registration_success(&mut self, addr: MacAddr) {
        if let Some(State::Started { bss }) = self.state.as_mut() {
            bss.on_registration_success(addr);
        }
    }

    /// Generates a fresh GTK and distributes it to every associated station.
    pub fn rekey_group_key(&mut self) {
        if let Some(State::Started { bss }) = self.state.as_mut() {
            bss.rekey_group_key();
        }
    }
}

impl crate::Station for ApSme {
    type Event = Event;

    fn on_mlme_event(&mut self, event: MlmeEvent) {
        self.state = self.state.take().map(|mut state| match state {
            State::Idle { .. } => {
                debug!("received MLME event while ApSme is idle: {:?}", event);
                state
            }
            State::Starting { ctx, config, rsn_cfg, responder, token, start_timeout } => {
                match event {
                    MlmeEvent::RequestComplete { token: done, result } if done == token => {
                        handle_start_conf(result, ctx, config, rsn_cfg, responder)
                    }
                    other => {
                        debug!("received MLME event while ApSme is starting: {:?}", other);
                        State::Starting { ctx, config, rsn_cfg, responder, token, start_timeout }
                    }
                }
            }
            State::Started { ref mut bss } => {
                match event {
                    MlmeEvent::MgmtFrame { frame } => bss.handle_mgmt_frame(&frame[..]),
                    MlmeEvent::FrameTxStatus { cookie, ack } => {
                        bss.handle_frame_tx_status(cookie, ack)
                    }
                    MlmeEvent::EapolRx { src, data } => {
                        let _ = bss.handle_eapol_frame(src, &data[..]).map_err(|e| warn!("{}", e));
                    }
                    MlmeEvent::RequestComplete { token, result } => {
                        bss.handle_request_complete(token, result)
                    }
                    other => debug!("unsupported MLME event for the AP: {:?}", other),
                }
                state
            }
        });
    }

    fn on_timeout(&mut self, timed_event: TimedEvent<Event>) {
        self.state = self.state.take().map(|mut state| match state {
            State::Idle { .. } => state,
            State::Starting { start_timeout, ctx, config, rsn_cfg, responder, token } => {
                match &timed_event.event {
                    Event::Sme { event: SmeEvent::StartTimeout }
                        if start_timeout == timed_event.id =>
                    {
                        warn!("timed out waiting for the kernel to start the BSS");
                        responder.respond(StartResult::TimedOut);
                        State::Idle { ctx }
                    }
                    _ => State::Starting { start_timeout, ctx, config, rsn_cfg, responder, token },
                }
            }
            State::Started { ref mut bss } => {
                bss.handle_timeout(timed_event);
                state
            }
        });
    }
}

fn validate_config(config: &Config) -> Result<(), StartResult> {
    if config.ssid.is_empty() || config.ssid.len() > 32 {
        return Err(StartResult::InvalidArguments);
    }
    if config.rates.is_empty() {
        return Err(StartResult::InvalidArguments);
    }
    if !config.password.is_empty() && (config.password.len() < 8 || config.password.len() > 63) {
        return Err(StartResult::InvalidArguments);
    }
    Ok(())
}

fn create_rsn_cfg(ssid: &[u8], password: &[u8]) -> Result<Option<RsnCfg>, failure::Error> {
    if password.is_empty() {
        Ok(None)
    } else {
        let psk = psk::compute(password, ssid)?;
        Ok(Some(RsnCfg { psk, rsne: create_wpa2_psk_rsne() }))
    }
}

fn handle_start_conf(
    result: Result<MlmeResponse, i32>,
    ctx: Context,
    config: Config,
    rsn_cfg: Option<RsnCfg>,
    responder: Responder<StartResult>,
) -> State {
    match result {
        Ok(_) => {
            let gtk_provider = match &rsn_cfg {
                Some(_) => {
                    match GtkProvider::new(wifi_common::ie::rsn::cipher::Cipher::new_dot11(
                        wifi_common::ie::rsn::cipher::CCMP_128,
                    )) {
                        Ok(provider) => Some(Arc::new(Mutex::new(provider))),
                        Err(e) => {
                            error!("failed to create GTK provider: {}", e);
                            responder.respond(StartResult::InternalError);
                            return State::Idle { ctx };
                        }
                    }
                }
                None => None,
            };
            let nonce_rdr = match NonceReader::new(&ctx.device_info.addr[..]) {
                Ok(nonce_rdr) => nonce_rdr,
                Err(e) => {
                    error!("failed to create nonce reader: {}", e);
                    responder.respond(StartResult::InternalError);
                    return State::Idle { ctx };
                }
            };
            responder.respond(StartResult::Success);
            ctx.event_sink.send(ApEvent::Started);
            State::Started {
                bss: InfraBss {
                    config,
                    rsn_cfg,
                    clients: remote_client::Map::default(),
                    gtk_provider,
                    nonce_rdr,
                    group_key_state: GroupKeyState::NotInstalled,
                    waiting_for_group_key: vec![],
                    rekey_in_progress: false,
                    pending: HashMap::new(),
                    tx_cookies: HashMap::new(),
                    pbc: PbcState::default(),
                    pbc_walk_timeout: None,
                    beacon_in_flight: None,
                    beacon_dirty: false,
                    ctx,
                },
            }
        }
        Err(errno) => {
            error!("failed to start BSS: errno {}", errno);
            responder.respond(StartResult::InternalError);
            ctx.event_sink.send(ApEvent::StartFailed);
            State::Idle { ctx }
        }
    }
}

/// Management subtypes the kernel forwards to this daemon.
fn register_mgmt_frames(ctx: &mut Context) {
    for subtype in [
        mac::MgmtSubtype::PROBE_REQ,
        mac::MgmtSubtype::AUTH,
        mac::MgmtSubtype::ASSOC_REQ,
        mac::MgmtSubtype::REASSOC_REQ,
        mac::MgmtSubtype::DISASSOC,
        mac::MgmtSubtype::DEAUTH,
    ]
    .iter()
    {
        ctx.mlme_sink.send(MlmeRequest::RegisterFrame {
            frame_type: (subtype.0 as u16) << 4,
            match_prefix: vec![],
        });
    }
}

#[derive(Debug, PartialEq)]
enum GroupKeyState {
    NotInstalled,
    Installing,
    QueryingRsc,
    Ready,
}

/// Commands awaiting their kernel completion.
#[derive(Debug)]
enum PendingCmd {
    AssocFrame { addr: MacAddr },
    PairwiseKey { addr: MacAddr },
    Authorize { addr: MacAddr },
    NewStation { addr: MacAddr },
    GroupKeyInstall,
    GroupRscQuery,
    #[allow(dead_code)]
    Beacon,
}

struct InfraBss {
    config: Config,
    rsn_cfg: Option<RsnCfg>,
    clients: remote_client::Map,
    gtk_provider: Option<Arc<Mutex<GtkProvider>>>,
    nonce_rdr: NonceReader,
    group_key_state: GroupKeyState,
    waiting_for_group_key: Vec<MacAddr>,
    rekey_in_progress: bool,
    pending: HashMap<RequestToken, PendingCmd>,
    tx_cookies: HashMap<u64, MacAddr>,
    pbc: PbcState,
    pbc_walk_timeout: Option<EventId>,
    beacon_in_flight: Option<RequestToken>,
    beacon_dirty: bool,
    ctx: Context,
}

impl InfraBss {
    fn destroy(self) -> Context {
        // Stations drop here; their handshakes zeroize on drop.
        self.ctx
    }

    fn bssid(&self) -> MacAddr {
        self.ctx.device_info.addr
    }

    fn handle_mgmt_frame(&mut self, frame: &[u8]) {
        let parsed = match MgmtFrame::parse(frame) {
            Ok(parsed) => parsed,
            Err(e) => {
                // A malformed frame fails only itself.
                debug!("ignoring unparseable management frame: {}", e);
                return;
            }
        };
        let peer = parsed.hdr.addr2;
        match parsed.body {
            MgmtBody::ProbeReq { elements } => self.handle_probe_req(peer, elements),
            MgmtBody::Authentication { auth_hdr, .. } => self.handle_auth(peer, &auth_hdr),
            MgmtBody::AssocReq { assoc_req_hdr, elements } => {
                self.handle_assoc_req(peer, assoc_req_hdr.capabilities, assoc_req_hdr.listen_interval, elements, false)
            }
            MgmtBody::ReassocReq { reassoc_req_hdr, elements } => self.handle_assoc_req(
                peer,
                reassoc_req_hdr.capabilities,
                reassoc_req_hdr.listen_interval,
                elements,
                true,
            ),
            MgmtBody::Disassoc { .. } | MgmtBody::Deauth { .. } => self.remove_client(peer, false),
            _ => debug!("ignoring unsupported management frame from {:02X?}", peer),
        }
    }

    fn handle_probe_req(&mut self, peer: MacAddr, elements: &[u8]) {
        // Wildcard probes and probes for our SSID get a response.
        if let Some(ssid) = ie::find_element(elements, Id::SSID) {
            if !ssid.is_empty() && ssid != &self.config.ssid[..] {
                return;
            }
        }

        let now = Instant::now();
        if let Some(attrs) = wsc_ie::find_wsc_attrs(elements) {
            if let Ok(parsed) = wsc_ie::parse_wsc_attrs(attrs) {
                if parsed.device_password_id == Some(wsc_ie::DEVICE_PASSWORD_PUSH_BUTTON) {
                    let uuid_e = parsed.uuid_e.unwrap_or([0u8; 16]);
                    self.pbc.record_probe(peer, uuid_e, now);
                    if self.pbc.is_active() && self.pbc.overlap(now) {
                        // Overlap must take effect before this probe is
                        // answered.
                        info!("PBC session overlap detected; leaving push-button mode");
                        self.exit_pbc_mode();
                    }
                }
            }
        }

        let frame = self.build_probe_resp(peer);
        let token = self.ctx.token();
        self.ctx.mlme_sink.send(MlmeRequest::SendFrame { token, frame });
    }

    fn handle_auth(&mut self, peer: MacAddr, auth_hdr: &mac::AuthHdr) {
        if let Some(authorized) = &self.config.authorized_macs {
            if !authorized.contains(&peer) {
                info!("station {:02X?} is not on the allow-list", peer);
                // No station record is created for a refused peer.
                self.send_auth_resp(peer, StatusCode::UNSPECIFIED);
                return;
            }
        }
        if auth_hdr.auth_alg != AuthAlgorithm::OPEN_SYSTEM || auth_hdr.auth_txn_seq_num != 1 {
            warn!("unsupported authentication algorithm {:?}", auth_hdr.auth_alg);
            self.send_auth_resp(peer, StatusCode::UNSUPPORTED_AUTH_ALGORITHM);
            return;
        }
        self.clients.add_or_refresh(peer);
        self.send_auth_resp(peer, StatusCode::SUCCESS);
    }

    fn send_auth_resp(&mut self, peer: MacAddr, status: StatusCode) {
        let mut frame = vec![];
        mac::write_auth_frame(
            &mut frame,
            peer,
            self.bssid(),
            self.bssid(),
            AuthAlgorithm::OPEN_SYSTEM,
            2,
            status,
            &[],
        );
        let token = self.ctx.token();
        self.ctx.mlme_sink.send(MlmeRequest::SendFrame { token, frame });
    }

    fn handle_assoc_req(
        &mut self,
        peer: MacAddr,
        capabilities: CapabilityInfo,
        listen_interval: u16,
        elements: &[u8],
        reassoc: bool,
    ) {
        let result = self.validate_assoc_req(&peer, elements);
        let (aid, status) = match result {
            Ok(admission) => {
                match self.admit_client(peer, capabilities, listen_interval, elements, admission) {
                    Some(aid) => (aid, StatusCode::SUCCESS),
                    None => (0, StatusCode::UNSPECIFIED),
                }
            }
            Err(status) => (0, status),
        };

        let wsc_resp = status == StatusCode::SUCCESS
            && self.clients.get(&peer).map_or(false, |c| c.wsc_enrollee);
        let mut resp_ies = vec![];
        ie::write_supported_rates(&mut resp_ies, &self.config.rates[..]);
        if wsc_resp {
            resp_ies.extend_from_slice(&wsc_ie::build_association_response()[..]);
        }
        let mut frame = vec![];
        mac::write_assoc_resp_frame(
            &mut frame,
            peer,
            self.bssid(),
            reassoc,
            self.capability_info(),
            status,
            aid,
            &resp_ies[..],
        );
        let token = self.ctx.token();
        if status == StatusCode::SUCCESS {
            self.pending.insert(token, PendingCmd::AssocFrame { addr: peer });
        }
        self.ctx.mlme_sink.send(MlmeRequest::SendFrame { token, frame });
    }

    fn validate_assoc_req(
        &mut self,
        peer: &MacAddr,
        elements: &[u8],
    ) -> Result<Admission, StatusCode> {
        match self.clients.get(peer) {
            Some(_) => (),
            None => {
                warn!("association request from unauthenticated station {:02X?}", peer);
                return Err(StatusCode::UNSPECIFIED);
            }
        }
        let parsed = ie::parse_checked(elements).map_err(|_| StatusCode::INVALID_IE)?;

        let ssid = parsed
            .iter()
            .filter_map(|(id, body)| if *id == Id::SSID { Some(*body) } else { None })
            .next()
            .ok_or(StatusCode::INVALID_IE)?;
        if ssid != &self.config.ssid[..] {
            return Err(StatusCode::UNSPECIFIED);
        }

        let rates = ie::find_element(elements, Id::SUPPORTED_RATES).unwrap_or(&[]);
        if !self.has_common_basic_rate(rates, elements) {
            return Err(StatusCode::DENIED_RATES);
        }

        let a_rsn = match &self.rsn_cfg {
            Some(rsn_cfg) => rsn_cfg,
            None => {
                // Open BSS: an RSNE-carrying station is confused.
                return match ie::find_element(elements, Id::RSNE) {
                    Some(_) => Err(StatusCode::INVALID_IE),
                    None => Ok(Admission::Open),
                };
            }
        };

        // An active push-button session admits its sole recorded enrollee
        // without an RSNE.
        if let Some(_) = wsc_ie::find_wsc_attrs(elements) {
            let now = Instant::now();
            if self.pbc.is_active() && self.pbc.sole_enrollee(now) == Some(*peer) {
                return Ok(Admission::WscEnrollee);
            }
            // Outside an admitted session, a WSC association is refused
            // outright -- including after a session overlap.
            return Err(StatusCode::UNSPECIFIED);
        }

        let s_rsne_bytes =
            ie::find_raw_element(elements, Id::RSNE).ok_or(StatusCode::INVALID_IE)?;
        let s_rsne = rsne::from_bytes(s_rsne_bytes).map_err(|_| StatusCode::INVALID_IE)?;
        validate_s_rsne(&s_rsne, &a_rsn.rsne)?;
        Ok(Admission::Rsna(s_rsne))
    }

    /// At least one of the AP's basic rates must appear in the station's
    /// supported or extended supported rates.
    fn has_common_basic_rate(&self, rates: &[u8], elements: &[u8]) -> bool {
        let mut all_rates: Vec<u8> = rates.to_vec();
        if let Some(ext) = ie::find_element(elements, Id::EXTENDED_SUPPORTED_RATES) {
            all_rates.extend_from_slice(ext);
        }
        self.config
            .rates
            .iter()
            .filter(|r| *r & 0x80 != 0)
            .all(|basic| all_rates.iter().any(|r| r & 0x7F == basic & 0x7F))
    }

    fn admit_client(
        &mut self,
        peer: MacAddr,
        capabilities: CapabilityInfo,
        listen_interval: u16,
        elements: &[u8],
        admission: Admission,
    ) -> Option<AssociationId> {
        let aid = self.clients.assign_aid(&peer)?;
        let authenticator = match &admission {
            Admission::Rsna(s_rsne) => {
                let rsn_cfg = self.rsn_cfg.as_ref().expect("validated above");
                let gtk_provider = self.gtk_provider.as_ref().expect("RSN BSS has a provider");
                match wifi_rsn::Authenticator::new_wpa2psk_ccmp128(
                    self.nonce_rdr.clone(),
                    gtk_provider.clone(),
                    rsn_cfg.psk.clone(),
                    peer,
                    s_rsne.clone(),
                    self.ctx.device_info.addr,
                    rsn_cfg.rsne.clone(),
                ) {
                    Ok(authenticator) => Some(Box::new(authenticator)),
                    Err(e) => {
                        error!("failed to create authenticator: {}", e);
                        return None;
                    }
                }
            }
            _ => None,
        };

        let client = self.clients.get_mut(&peer).expect("aid was just assigned");
        client.state = ClientState::Associating;
        client.capabilities = capabilities.value();
        client.listen_interval = listen_interval;
        client.rates = ie::find_element(elements, Id::SUPPORTED_RATES).unwrap_or(&[]).to_vec();
        client.assoc_ies = elements.to_vec();
        client.wsc_enrollee = admission == Admission::WscEnrollee;
        if let Some(authenticator) = authenticator {
            client.set_authenticator(authenticator);
        }
        Some(aid)
    }

    fn handle_frame_tx_status(&mut self, cookie: u64, ack: bool) {
        let addr = match self.tx_cookies.remove(&cookie) {
            Some(addr) => addr,
            None => return,
        };
        if !ack {
            warn!("association response to {:02X?} was not acknowledged", addr);
            self.remove_client(addr, false);
            return;
        }
        let (aid, capabilities, listen_interval, rates) = match self.clients.get_mut(&addr) {
            Some(client) if client.state == ClientState::Associating => {
                client.state = ClientState::Associated;
                (
                    client.aid.expect("associated client holds an aid"),
                    client.capabilities,
                    client.listen_interval,
                    client.rates.clone(),
                )
            }
            _ => return,
        };
        let token = self.ctx.token();
        self.pending.insert(token, PendingCmd::NewStation { addr });
        self.ctx.mlme_sink.send(MlmeRequest::NewStation {
            token,
            params: StationParams {
                peer: addr,
                aid,
                capabilities,
                listen_interval,
                supported_rates: rates,
            },
        });
    }

    fn handle_eapol_frame(&mut self, src: MacAddr, data: &[u8]) -> Result<(), failure::Error> {
        let mic_size = 16;
        let client = match self.clients.get_mut(&src) {
            Some(client) => client,
            None => failure::bail!("client {:02X?} not found; ignoring EAPOL frame", src),
        };
        if client.wsc_enrollee {
            // EAP-WSC traffic is driven by the external EAP method; the
            // association machinery only tracks the session.
            debug!("EAP frame from WSC enrollee {:02X?}", src);
            return Ok(());
        }
        let frame = eapol::Frame::from_bytes(data, mic_size)?;
        let updates = client.on_eapol_frame(&frame)?;
        self.process_updates(src, updates);
        Ok(())
    }

    fn initiate_key_exchange(&mut self, addr: MacAddr) {
        let updates = match self.clients.get_mut(&addr) {
            Some(client) if client.has_authenticator() => match client.initiate_key_exchange() {
                Ok(updates) => updates,
                Err(e) => {
                    error!("cannot initiate key exchange with {:02X?}: {}", addr, e);
                    return;
                }
            },
            _ => return,
        };
        self.process_updates(addr, updates);
    }

    fn process_updates(&mut self, addr: MacAddr, updates: UpdateSink) {
        for update in updates {
            match update {
                SecAssocUpdate::TxEapolKeyFrame(key_frame) => {
                    let data = key_frame.to_bytes(false);
                    let token = self.ctx.token();
                    self.ctx.mlme_sink.send(MlmeRequest::Eapol { token, dst: addr, data: data.clone() });
                    if let Some(client) = self.clients.get_mut(&addr) {
                        client.last_key_frame = Some(data);
                        let id = self.ctx.timer.schedule(Event::Client {
                            addr,
                            event: ClientEvent::KeyExchangeTimeout { attempt: 1 },
                        });
                        client.key_exchange_timeout = Some(id);
                    }
                }
                SecAssocUpdate::Key(Key::Ptk(ptk)) => {
                    let token = self.ctx.token();
                    self.pending.insert(token, PendingCmd::PairwiseKey { addr });
                    self.ctx.mlme_sink.send(MlmeRequest::NewKey {
                        token,
                        key: KeyConfig {
                            key: ptk.tk().to_vec(),
                            key_id: 0,
                            cipher: ptk.cipher.to_u32(),
                            address: Some(addr),
                            rsc: None,
                        },
                    });
                }
                // The group key is installed once per BSS, not per station.
                SecAssocUpdate::Key(Key::Gtk(..)) | SecAssocUpdate::Key(Key::Igtk(..)) => (),
                SecAssocUpdate::Key(_) => (),
                SecAssocUpdate::Status(SecAssocStatus::EssSaEstablished) => {
                    let token = self.ctx.token();
                    self.pending.insert(token, PendingCmd::Authorize { addr });
                    self.ctx.mlme_sink.send(MlmeRequest::SetStationAuthorized { token, peer: addr });
                }
                SecAssocUpdate::Status(SecAssocStatus::WrongPassword) => {
                    info!("station {:02X?} failed the handshake; wrong passphrase", addr);
                    self.deauth_and_remove(addr, ReasonCode::IEEE8021X_AUTH_FAILED);
                }
            }
        }
    }

    fn handle_request_complete(&mut self, token: RequestToken, result: Result<MlmeResponse, i32>) {
        if Some(token) == self.beacon_in_flight {
            self.beacon_in_flight = None;
            if let Err(errno) = result {
                warn!("SET_BEACON failed: errno {}", errno);
            }
            if self.beacon_dirty {
                self.send_beacon_update();
            }
            return;
        }
        let cmd = match self.pending.remove(&token) {
            Some(cmd) => cmd,
            None => return,
        };
        match cmd {
            PendingCmd::AssocFrame { addr } => match result {
                Ok(MlmeResponse::FrameCookie(cookie)) => {
                    self.tx_cookies.insert(cookie, addr);
                }
                Ok(_) => warn!("FRAME command returned no cookie"),
                Err(errno) => {
                    warn!("failed to transmit association response: errno {}", errno);
                    self.remove_client(addr, false);
                }
            },
            PendingCmd::NewStation { addr } => match result {
                Ok(_) => self.on_station_installed(addr),
                Err(errno) => {
                    error!("NEW_STATION failed: errno {}", errno);
                    self.deauth_and_remove(addr, ReasonCode::UNSPECIFIED);
                }
            },
            PendingCmd::PairwiseKey { addr } => {
                if let Err(errno) = result {
                    error!("pairwise key installation failed: errno {}", errno);
                    self.deauth_and_remove(addr, ReasonCode::UNSPECIFIED);
                }
            }
            PendingCmd::Authorize { addr } => match result {
                Ok(_) => {
                    if let Some(client) = self.clients.get_mut(&addr) {
                        client.state = ClientState::Rsna;
                        client.key_exchange_timeout = None;
                        client.last_key_frame = None;
                    }
                    self.ctx.event_sink.send(ApEvent::StationAdded { addr });
                }
                Err(errno) => {
                    error!("SET_STATION failed: errno {}", errno);
                    self.deauth_and_remove(addr, ReasonCode::UNSPECIFIED);
                }
            },
            PendingCmd::GroupKeyInstall => match result {
                Ok(_) => {
                    // Some drivers refuse a user-supplied Tx-RSC; read the
                    // effective one back before handing the GTK out.
                    let token = self.ctx.token();
                    self.pending.insert(token, PendingCmd::GroupRscQuery);
                    let key_id = self.current_gtk_key_id();
                    self.group_key_state = GroupKeyState::QueryingRsc;
                    self.ctx.mlme_sink.send(MlmeRequest::GetKey {
                        token,
                        peer: None,
                        key_id,
                    });
                }
                Err(errno) => {
                    error!("group key installation failed: errno {}", errno);
                    self.group_key_state = GroupKeyState::NotInstalled;
                    self.waiting_for_group_key.clear();
                }
            },
            PendingCmd::GroupRscQuery => {
                match result {
                    Ok(MlmeResponse::KeySeq(rsc)) => {
                        if let (Some(provider), Some(rsc)) = (&self.gtk_provider, rsc) {
                            let mut bytes = [0u8; 8];
                            let n = rsc.len().min(8);
                            bytes[..n].copy_from_slice(&rsc[..n]);
                            provider.lock().unwrap().set_rsc(u64::from_le_bytes(bytes));
                        }
                    }
                    Ok(_) => (),
                    Err(errno) => debug!("GET_KEY failed: errno {}; assuming zero RSC", errno),
                }
                self.group_key_state = GroupKeyState::Ready;
                let waiting = std::mem::replace(&mut self.waiting_for_group_key, vec![]);
                for addr in waiting {
                    self.initiate_key_exchange(addr);
                }
                if self.rekey_in_progress {
                    self.rekey_in_progress = false;
                    self.distribute_group_key();
                }
            }
            PendingCmd::Beacon => (),
        }
    }

    fn on_station_installed(&mut self, addr: MacAddr) {
        let (wsc_enrollee, has_authenticator) = match self.clients.get(&addr) {
            Some(client) => (client.wsc_enrollee, client.has_authenticator()),
            None => return,
        };
        if wsc_enrollee {
            self.ctx.event_sink.send(ApEvent::RegistrationStart { addr });
            return;
        }
        if !has_authenticator {
            // Open BSS: the station is done associating.
            self.ctx.event_sink.send(ApEvent::StationAdded { addr });
            return;
        }
        match self.group_key_state {
            GroupKeyState::Ready => self.initiate_key_exchange(addr),
            GroupKeyState::NotInstalled => {
                self.waiting_for_group_key.push(addr);
                self.install_group_key();
            }
            _ => self.waiting_for_group_key.push(addr),
        }
    }

    fn current_gtk_key_id(&self) -> u8 {
        self.gtk_provider
            .as_ref()
            .map(|p| p.lock().unwrap().get_gtk().key_id())
            .unwrap_or(1)
    }

    fn install_group_key(&mut self) {
        let (key, key_id, cipher) = match &self.gtk_provider {
            Some(provider) => {
                let guard = provider.lock().unwrap();
                let gtk = guard.get_gtk();
                (gtk.tk().to_vec(), gtk.key_id(), gtk.cipher.to_u32())
            }
            None => return,
        };
        self.group_key_state = GroupKeyState::Installing;
        let token = self.ctx.token();
        self.pending.insert(token, PendingCmd::GroupKeyInstall);
        self.ctx.mlme_sink.send(MlmeRequest::NewKey {
            token,
            key: KeyConfig { key, key_id, cipher, address: None, rsc: None },
        });
    }

    /// Rotates the GTK and redistributes it through per-station Group-Key
    /// handshakes.
    fn rekey_group_key(&mut self) {
        if let Some(provider) = &self.gtk_provider {
            if let Err(e) = provider.lock().unwrap().rotate() {
                error!("failed to rotate GTK: {}", e);
                return;
            }
            self.rekey_in_progress = true;
            self.group_key_state = GroupKeyState::NotInstalled;
            self.install_group_key();
        }
    }

    fn distribute_group_key(&mut self) {
        let addrs: Vec<MacAddr> = self
            .clients
            .iter_mut()
            .filter(|c| c.state == ClientState::Rsna)
            .map(|c| c.addr)
            .collect();
        for addr in addrs {
            let updates = match self.clients.get_mut(&addr) {
                Some(client) => match client.initiate_group_rekey() {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!("group rekey with {:02X?} failed: {}", addr, e);
                        continue;
                    }
                },
                None => continue,
            };
            self.process_updates(addr, updates);
        }
    }

    fn handle_timeout(&mut self, timed_event: TimedEvent<Event>) {
        match timed_event.event {
            Event::Sme { event: SmeEvent::PbcWalkTimeout } => {
                if self.pbc_walk_timeout == Some(timed_event.id) && self.pbc.is_active() {
                    info!("push-button walk time expired");
                    self.exit_pbc_mode();
                }
            }
            Event::Sme { .. } => (),
            Event::Client { addr, event: ClientEvent::KeyExchangeTimeout { attempt } } => {
                self.handle_key_exchange_timeout(addr, attempt, timed_event.id);
            }
        }
    }

    fn handle_key_exchange_timeout(&mut self, addr: MacAddr, attempt: u32, id: EventId) {
        let frame = match self.clients.get_mut(&addr) {
            Some(client) if client.key_exchange_timeout == Some(id) => {
                if attempt >= event::KEY_EXCHANGE_MAX_ATTEMPTS {
                    None
                } else {
                    client.last_key_frame.clone()
                }
            }
            _ => return,
        };
        match frame {
            Some(data) => {
                let token = self.ctx.token();
                self.ctx.mlme_sink.send(MlmeRequest::Eapol { token, dst: addr, data });
                let id = self.ctx.timer.schedule(Event::Client {
                    addr,
                    event: ClientEvent::KeyExchangeTimeout { attempt: attempt + 1 },
                });
                if let Some(client) = self.clients.get_mut(&addr) {
                    client.key_exchange_timeout = Some(id);
                }
            }
            None => {
                warn!("4-Way Handshake with {:02X?} timed out", addr);
                self.deauth_and_remove(addr, ReasonCode::FOURWAY_HANDSHAKE_TIMEOUT);
            }
        }
    }

    fn deauth_and_remove(&mut self, addr: MacAddr, reason: ReasonCode) {
        let mut frame = vec![];
        mac::write_deauth_frame(&mut frame, addr, self.bssid(), self.bssid(), reason);
        let token = self.ctx.token();
        self.ctx.mlme_sink.send(MlmeRequest::SendFrame { token, frame });
        self.remove_client(addr, true);
    }

    fn remove_client(&mut self, addr: MacAddr, kernel_removal: bool) {
        if let Some(client) = self.clients.remove(&addr) {
            // Dropping the client drops its handshake; key material is
            // zeroized there.
            if client.state == ClientState::Associated
                || client.state == ClientState::Rsna
                || kernel_removal
            {
                self.ctx.mlme_sink.send(MlmeRequest::DelStation {
                    peer: addr,
                    reason_code: ReasonCode::UNSPECIFIED.0,
                });
            }
            self.ctx.event_sink.send(ApEvent::StationRemoved { addr });
        }
    }

    fn push_button(&mut self) -> Result<(), failure::Error> {
        let now = Instant::now();
        if self.pbc.overlap(now) {
            failure::bail!("PBC session overlap; refusing to start a registration");
        }
        if self.config.wsc_device.is_none() {
            failure::bail!("AP has no WSC device identity configured");
        }
        self.pbc.activate();
        self.pbc_walk_timeout =
            Some(self.ctx.timer.schedule(Event::Sme { event: SmeEvent::PbcWalkTimeout }));
        self.send_beacon_update();
        Ok(())
    }

    fn exit_pbc_mode(&mut self) {
        self.pbc.deactivate();
        self.pbc_walk_timeout = None;
        self.send_beacon_update();
        self.ctx.event_sink.send(ApEvent::PbcModeExit);
    }

    fn on_registration_success(&mut self, addr: MacAddr) {
        self.pbc.purge(&addr);
        if self.pbc.is_active() {
            // The session served its purpose.
            self.exit_pbc_mode();
        }
        self.ctx.event_sink.send(ApEvent::RegistrationSuccess { addr });
    }

    /// Beacon updates are serialized: at most one SET_BEACON in flight.
    fn send_beacon_update(&mut self) {
        if self.beacon_in_flight.is_some() {
            self.beacon_dirty = true;
            return;
        }
        self.beacon_dirty = false;
        let (head, tail) = build_beacon_frames(
            &self.ctx.device_info.addr,
            &self.config,
            self.rsn_cfg.as_ref(),
            self.pbc.is_active(),
        );
        let token = self.ctx.token();
        self.beacon_in_flight = Some(token);
        self.ctx.mlme_sink.send(MlmeRequest::SetBeacon { token, head, tail });
    }

    fn capability_info(&self) -> CapabilityInfo {
        let mut capabilities = CapabilityInfo(0);
        capabilities.set_ess(true);
        capabilities.set_privacy(self.rsn_cfg.is_some());
        capabilities
    }

    fn build_probe_resp(&self, peer: MacAddr) -> Vec<u8> {
        let mut ies = vec![];
        ie::write_ssid(&mut ies, &self.config.ssid[..]);
        ie::write_supported_rates(&mut ies, &self.config.rates[..]);
        ie::write_element(&mut ies, Id::DSSS_PARAM_SET, &[self.config.channel]);
        if let Some(rsn_cfg) = &self.rsn_cfg {
            if let Ok(rsne_bytes) = rsn_cfg.rsne.to_bytes() {
                ies.extend_from_slice(&rsne_bytes[..]);
            }
        }
        if let Some(device) = &self.config.wsc_device {
            ies.extend_from_slice(
                &wsc_ie::build_probe_response(device, true, self.pbc.is_active())[..],
            );
        }
        let mut frame = vec![];
        mac::write_probe_resp_frame(
            &mut frame,
            peer,
            self.bssid(),
            self.capability_info(),
            DEFAULT_BEACON_PERIOD,
            &ies[..],
        );
        frame
    }
}

#[derive(Debug, PartialEq)]
enum Admission {
    Open,
    Rsna(Rsne),
    WscEnrollee,
}

/// Beacon head (up to the TIM element) and tail (after it). The tail is
/// rebuilt whenever push-button mode toggles, because the WSC IE's
/// Selected-Registrar and Device-Password-ID attributes change.
fn build_beacon_frames(
    bssid: &MacAddr,
    config: &Config,
    rsn_cfg: Option<&RsnCfg>,
    pbc_active: bool,
) -> (Vec<u8>, Vec<u8>) {
    let mut capabilities = CapabilityInfo(0);
    capabilities.set_ess(true);
    capabilities.set_privacy(rsn_cfg.is_some());

    let mut head = vec![];
    mac::write_mgmt_hdr(&mut head, mac::MgmtSubtype::BEACON, BCAST_ADDR, *bssid, *bssid);
    use bytes::BufMut;
    head.put_u64_le(0); // timestamp, filled by the driver
    head.put_u16_le(DEFAULT_BEACON_PERIOD);
    head.put_u16_le(capabilities.value());
    ie::write_ssid(&mut head, &config.ssid[..]);
    ie::write_supported_rates(&mut head, &config.rates[..]);
    ie::write_element(&mut head, Id::DSSS_PARAM_SET, &[config.channel]);

    // Tail IEs in ascending element-id order; the vendor-specific WSC IE
    // comes last.
    let mut tail = vec![];
    if let Some(rsn_cfg) = rsn_cfg {
        if let Ok(rsne_bytes) = rsn_cfg.rsne.to_bytes() {
            tail.extend_from_slice(&rsne_bytes[..]);
        }
    }
    if config.wsc_device.is_some() {
        tail.extend_from_slice(&wsc_ie::build_beacon(true, pbc_active)[..]);
    }
    (head, tail)
}

#[cfg(test)]
mod tests;
