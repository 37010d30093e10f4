//! Station management: the client connect/roam state machine and the soft-AP
//! association state machine. Both are pure event-driven machines; the
//! daemon's serve loop carries their requests to the kernel and feeds kernel
//! events and timer expirations back in.

#![deny(warnings)]
#![allow(non_local_definitions)]

pub mod ap;
pub mod client;
mod sink;
pub mod timer;

#[cfg(test)]
pub mod test_utils;

use futures::channel::mpsc;

pub use wifi_common::{MacAddr, Ssid};

use crate::timer::TimedEvent;
pub use crate::sink::MlmeSink;

/// What the daemon knows about one managed netdev.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub ifindex: u32,
    pub addr: MacAddr,
    /// Driver advertises GTK rekey offload.
    pub supports_rekey_offload: bool,
    /// Driver forwards EAPOL over the nl80211 control port.
    pub supports_control_port: bool,
}

/// Correlates a request with its eventual completion. Tokens are allocated
/// by the FSM; the serve loop echoes them in `MlmeEvent::RequestComplete`.
pub type RequestToken = u64;

/// Key material handed to NEW_KEY.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyConfig {
    pub key: Vec<u8>,
    pub key_id: u8,
    /// Cipher suite selector in nl80211's packed form, e.g. 0x000FAC04.
    pub cipher: u32,
    /// Peer address for pairwise keys; None installs a group key.
    pub address: Option<MacAddr>,
    /// Receive sequence counter, when the kernel accepts one.
    pub rsc: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectParams {
    pub ssid: Ssid,
    pub bssid: MacAddr,
    pub freq: u32,
    pub auth_type: u32,
    pub prev_bssid: Option<MacAddr>,
    /// IE section appended to the request (own RSNE, echoed MDE).
    pub ies: Vec<u8>,
    pub rsn: Option<RsnParams>,
}

/// The RSN attributes of CONNECT / ASSOCIATE.
#[derive(Clone, Debug, PartialEq)]
pub struct RsnParams {
    pub wpa_versions: u32,
    pub pairwise_cipher: u32,
    pub group_cipher: u32,
    pub akm: u32,
    pub mfp: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FtAuthParams {
    pub bssid: MacAddr,
    pub freq: u32,
    pub ssid: Ssid,
    /// RSNE + MDE + FTE for the FT Authentication frame.
    pub ies: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FtReassocParams {
    pub bssid: MacAddr,
    pub freq: u32,
    pub ssid: Ssid,
    pub prev_bssid: MacAddr,
    pub ies: Vec<u8>,
    pub rsn: Option<RsnParams>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartApParams {
    pub ssid: Ssid,
    pub freq: u32,
    pub beacon_interval: u16,
    pub dtim_period: u8,
    pub beacon_head: Vec<u8>,
    pub beacon_tail: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StationParams {
    pub peer: MacAddr,
    pub aid: u16,
    pub capabilities: u16,
    pub listen_interval: u16,
    pub supported_rates: Vec<u8>,
}

/// Commands the FSMs issue; the serve loop maps them onto nl80211 and
/// route-netlink.
#[derive(Debug, PartialEq)]
pub enum MlmeRequest {
    Connect { token: RequestToken, params: ConnectParams },
    Authenticate { token: RequestToken, params: FtAuthParams },
    Reassociate { token: RequestToken, params: FtReassocParams },
    Deauthenticate { peer: MacAddr, reason_code: u16 },
    Eapol { token: RequestToken, dst: MacAddr, data: Vec<u8> },
    NewKey { token: RequestToken, key: KeyConfig },
    SetKeyDefault { token: RequestToken, key_id: u8, mgmt: bool },
    DelKey { peer: Option<MacAddr>, key_id: u8 },
    GetKey { token: RequestToken, peer: Option<MacAddr>, key_id: u8 },
    NewStation { token: RequestToken, params: StationParams },
    SetStationAuthorized { token: RequestToken, peer: MacAddr },
    DelStation { peer: MacAddr, reason_code: u16 },
    StartAp { token: RequestToken, params: StartApParams },
    StopAp { token: RequestToken },
    SetBeacon { token: RequestToken, head: Vec<u8>, tail: Vec<u8> },
    RegisterFrame { frame_type: u16, match_prefix: Vec<u8> },
    SendFrame { token: RequestToken, frame: Vec<u8> },
    SetCqm { rssi_thold_dbm: i32, hysteresis_db: u32 },
    SetRekeyOffload { kek: Vec<u8>, kck: Vec<u8>, replay_ctr: [u8; 8] },
    SetLinkMode { mode: u8 },
    SetLinkOperUp,
    /// Connection teardown: cancel every outstanding command of this
    /// interface; their completions will not be delivered.
    CancelAll,
}

/// Response payloads surfaced through `RequestComplete`.
#[derive(Debug, Clone, PartialEq)]
pub enum MlmeResponse {
    Ack,
    /// GET_KEY: the key's transmit sequence counter, if reported.
    KeySeq(Option<Vec<u8>>),
    /// FRAME: cookie correlating the later TX-status notification.
    FrameCookie(u64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CqmEvent {
    RssiLow,
    RssiHigh,
    BeaconLoss,
}

/// Kernel events after decoding, plus request completions.
#[derive(Debug)]
pub enum MlmeEvent {
    RequestComplete { token: RequestToken, result: Result<MlmeResponse, i32> },
    ConnectConf { status_code: u16, timed_out: bool, resp_ies: Vec<u8> },
    AuthenticateConf { frame: Vec<u8> },
    AssociateConf { frame: Vec<u8> },
    DeauthenticateInd { peer: MacAddr, reason_code: u16 },
    DisassociateInd { peer: MacAddr, reason_code: u16 },
    DisconnectInd { reason_code: u16, by_ap: bool },
    MgmtFrame { frame: Vec<u8> },
    FrameTxStatus { cookie: u64, ack: bool },
    EapolRx { src: MacAddr, data: Vec<u8> },
    Cqm(CqmEvent),
    RekeyOffload { replay_ctr: u64 },
    InterfaceRemoved,
}

/// A station-mode or AP-mode state machine driven by the serve loop.
pub trait Station {
    type Event;

    fn on_mlme_event(&mut self, event: MlmeEvent);
    fn on_timeout(&mut self, timed_event: TimedEvent<Self::Event>);
}

pub type MlmeStream = mpsc::UnboundedReceiver<MlmeRequest>;

pub(crate) mod responder {
    use futures::channel::oneshot;

    #[derive(Debug)]
    pub struct Responder<T>(oneshot::Sender<T>);

    impl<T> Responder<T> {
        pub fn new() -> (Self, oneshot::Receiver<T>) {
            let (sender, receiver) = oneshot::channel();
            (Responder(sender), receiver)
        }

        pub fn respond(self, result: T) {
            self.0.send(result).unwrap_or_else(|_| ());
        }
    }
}
