//! The client connection state machine:
//! Idle -> Connecting -> EstablishingRsna -> SettingKeys -> LinkUp,
//! with the FT sub-path FtAuthenticating -> FtReassociating reachable from
//! LinkUp.

use log::{error, info, warn};
use std::collections::VecDeque;
use zeroize::Zeroizing;

use wifi_common::ie::rsn::rsne::Rsne;
use wifi_common::ie::{self, Id};
use wifi_common::mac::ReasonCode;
use wifi_common::MacAddr;
use wifi_nl80211::rtnl::LINK_MODE_DORMANT;
use wifi_nl80211::{AUTH_TYPE_OPEN_SYSTEM, MFP_NO, WPA_VERSION_2};
use wifi_rsn::key::exchange::Key;
use wifi_rsn::key::gtk::Gtk;
use wifi_rsn::key::igtk::Igtk;
use wifi_rsn::key::ptk::Ptk;
use wifi_rsn::rsna::{NegotiatedProtection, SecAssocStatus, SecAssocUpdate};
use wifi_rsn::Supplicant;

use super::event::{self, Event};
use super::ft::{self, FtContext};
use super::internal::Context;
use super::{report_connect_finished, ClientEvent, DisconnectCause};
use crate::client::bss::BssDescription;
use crate::responder::Responder;
use crate::timer::EventId;
use crate::{ConnectParams, KeyConfig, MlmeEvent, MlmeRequest, MlmeResponse, RequestToken, RsnParams};

#[derive(Clone, Debug, PartialEq)]
pub enum ConnectResult {
    Success,
    Canceled,
    Failed(ConnectFailure),
}

impl<T: Into<ConnectFailure>> From<T> for ConnectResult {
    fn from(failure: T) -> Self {
        ConnectResult::Failed(failure.into())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConnectFailure {
    InvalidIe,
    AssociationFailed(u16),
    AuthenticationFailed,
    HandshakeFailed(HandshakeFailure),
    KeySettingFailed,
    Aborted,
    NotSupported,
    NotConnected,
    InProgress,
    InvalidArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HandshakeFailure {
    Timeout,
    MicMismatch,
    ReplayViolation,
    IeMismatch,
    WrongPassword,
}

impl From<HandshakeFailure> for ConnectFailure {
    fn from(failure: HandshakeFailure) -> Self {
        ConnectFailure::HandshakeFailed(failure)
    }
}

#[derive(Debug)]
pub enum Protection {
    Open,
    Rsna(Rsna),
}

#[derive(Debug)]
pub struct Rsna {
    pub negotiated_protection: NegotiatedProtection,
    pub s_rsne: Rsne,
    /// Retained for the FT key hierarchy; zeroized on drop.
    pub psk: Zeroizing<Vec<u8>>,
    pub supplicant: Supplicant,
}

#[derive(Debug)]
pub struct ConnectCommand {
    pub bss: Box<BssDescription>,
    pub responder: Option<Responder<ConnectResult>>,
    pub protection: Protection,
}

/// IEs of interest captured from the (re)association response, kept for the
/// lifetime of the link. FT needs the FTE's key-holder ids later.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkIes {
    pub mde: Option<Vec<u8>>,
    pub fte: Option<Vec<u8>>,
}

/// One step of the ordered key-installation batch. A failed step aborts the
/// remainder and tears the connection down.
#[derive(Debug)]
enum InstallStep {
    NewKey(KeyConfig),
    SetKeyDefault { key_id: u8, mgmt: bool },
    Authorize,
    RekeyOffload { kek: Vec<u8>, kck: Vec<u8>, replay_ctr: [u8; 8] },
}

#[derive(Debug)]
pub struct KeyInstaller {
    peer: MacAddr,
    queue: VecDeque<InstallStep>,
    current: Option<RequestToken>,
}

enum InstallProgress {
    InProgress,
    Done,
    Failed,
}

impl KeyInstaller {
    fn new(peer: MacAddr) -> Self {
        KeyInstaller { peer, queue: VecDeque::new(), current: None }
    }

    /// Installation order per IEEE Std 802.11-2016, 12.6.14: pairwise key
    /// first, then group keys, then port authorization.
    fn for_rsna(
        peer: MacAddr,
        protection: &NegotiatedProtection,
        ptk: &Ptk,
        gtk: &Gtk,
        igtk: Option<&Igtk>,
        rekey_offload: bool,
    ) -> Self {
        let mut installer = KeyInstaller::new(peer);
        installer.queue.push_back(InstallStep::NewKey(KeyConfig {
            key: ptk.tk().to_vec(),
            key_id: 0,
            cipher: protection.pairwise.to_u32(),
            address: Some(peer),
            rsc: None,
        }));
        installer.queue.push_back(InstallStep::SetKeyDefault { key_id: 0, mgmt: false });
        installer.queue.push_back(InstallStep::NewKey(KeyConfig {
            key: gtk.tk().to_vec(),
            key_id: gtk.key_id(),
            cipher: protection.group_data.to_u32(),
            address: None,
            rsc: Some(gtk.rsc().to_be_bytes().to_vec()),
        }));
        if let Some(igtk) = igtk {
            installer.queue.push_back(InstallStep::NewKey(KeyConfig {
                key: igtk.tk().to_vec(),
                key_id: igtk.key_id as u8,
                cipher: igtk.cipher.to_u32(),
                address: None,
                rsc: Some(igtk.ipn.to_vec()),
            }));
        }
        installer.queue.push_back(InstallStep::Authorize);
        if rekey_offload {
            // The kernel continues the replay counter from the value last
            // seen on the air.
            installer.queue.push_back(InstallStep::RekeyOffload {
                kek: ptk.kek().to_vec(),
                kck: ptk.kck().to_vec(),
                replay_ctr: [0u8; 8],
            });
        }
        installer
    }

    fn send_next(&mut self, ctx: &mut Context) -> InstallProgress {
        match self.queue.pop_front() {
            None => InstallProgress::Done,
            Some(step) => {
                let token = ctx.token();
                self.current = Some(token);
                let request = match step {
                    InstallStep::NewKey(key) => MlmeRequest::NewKey { token, key },
                    InstallStep::SetKeyDefault { key_id, mgmt } => {
                        MlmeRequest::SetKeyDefault { token, key_id, mgmt }
                    }
                    InstallStep::Authorize => {
                        MlmeRequest::SetStationAuthorized { token, peer: self.peer }
                    }
                    InstallStep::RekeyOffload { kek, kck, replay_ctr } => {
                        // Offload acks are not fatal; drivers without support
                        // report -EOPNOTSUPP which the completion tolerates.
                        MlmeRequest::SetRekeyOffload { kek, kck, replay_ctr }
                    }
                };
                let fire_and_forget = match &request {
                    MlmeRequest::SetRekeyOffload { .. } => true,
                    _ => false,
                };
                ctx.mlme_sink.send(request);
                if fire_and_forget {
                    self.current = None;
                    self.send_next(ctx)
                } else {
                    InstallProgress::InProgress
                }
            }
        }
    }

    fn on_request_complete(
        &mut self,
        token: RequestToken,
        result: &Result<MlmeResponse, i32>,
        ctx: &mut Context,
    ) -> InstallProgress {
        if self.current != Some(token) {
            return InstallProgress::InProgress;
        }
        self.current = None;
        match result {
            Ok(_) => self.send_next(ctx),
            Err(errno) => {
                error!("key installation command failed: errno {}", errno);
                // Remaining steps of the batch are dropped.
                self.queue.clear();
                InstallProgress::Failed
            }
        }
    }
}

#[derive(Debug)]
pub enum State {
    Idle,
    Connecting {
        cmd: ConnectCommand,
        token: RequestToken,
    },
    EstablishingRsna {
        bss: Box<BssDescription>,
        responder: Option<Responder<ConnectResult>>,
        rsna: Rsna,
        link_ies: LinkIes,
        rsna_timeout: EventId,
        resp_timeout: EventId,
        pending_ptk: Option<Ptk>,
        pending_gtk: Option<Gtk>,
        pending_igtk: Option<Igtk>,
    },
    SettingKeys {
        bss: Box<BssDescription>,
        responder: Option<Responder<ConnectResult>>,
        rsna: Option<Rsna>,
        link_ies: LinkIes,
        installer: KeyInstaller,
    },
    LinkUp {
        bss: Box<BssDescription>,
        rsna: Option<Rsna>,
        link_ies: LinkIes,
    },
    FtAuthenticating {
        ft: FtContext,
        responder: Option<Responder<ConnectResult>>,
        token: RequestToken,
        timeout: EventId,
    },
    FtReassociating {
        ft: FtContext,
        responder: Option<Responder<ConnectResult>>,
        ptk: Ptk,
        token: RequestToken,
        timeout: EventId,
    },
    Disconnecting {
        responder: Option<Responder<()>>,
        token: RequestToken,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub connected_to: Option<MacAddr>,
    pub connecting_to: Option<Vec<u8>>,
}

impl State {
    pub fn connect(self, cmd: ConnectCommand, ctx: &mut Context) -> State {
        match self.disconnect_internal(ctx, DisconnectCause::BySme) {
            // A deauthentication of the previous link was in flight; its
            // caller resolves now, and the new attempt starts fresh.
            State::Disconnecting { responder, .. } => {
                if let Some(responder) = responder {
                    responder.respond(());
                }
            }
            _ => (),
        }

        let built = build_connect_ies(&cmd);
        let (ies, rsn) = match built {
            Ok(parts) => parts,
            Err(e) => {
                error!("cannot serialize own RSNE: {}", e);
                report_connect_finished(cmd.responder, ctx, ConnectFailure::InvalidArgs.into());
                return State::Idle;
            }
        };

        let token = ctx.token();
        ctx.mlme_sink.send(MlmeRequest::SetLinkMode { mode: LINK_MODE_DORMANT });
        ctx.mlme_sink.send(MlmeRequest::Connect {
            token,
            params: ConnectParams {
                ssid: cmd.bss.ssid.clone(),
                bssid: cmd.bss.bssid,
                freq: cmd.bss.freq,
                auth_type: AUTH_TYPE_OPEN_SYSTEM,
                prev_bssid: None,
                ies,
                rsn,
            },
        });
        ctx.event_sink.send(ClientEvent::Connecting);
        State::Connecting { cmd, token }
    }

    pub fn disconnect(self, responder: Option<Responder<()>>, ctx: &mut Context) -> State {
        match self {
            State::Disconnecting { responder: prev, token } => {
                // A deauthentication is already on the wire; a second
                // disconnect must not produce another one.
                if let Some(responder) = responder {
                    responder.respond(());
                }
                State::Disconnecting { responder: prev, token }
            }
            State::Idle => {
                if let Some(responder) = responder {
                    responder.respond(());
                }
                State::Idle
            }
            other => {
                let peer = other.peer();
                let state = other.disconnect_internal(ctx, DisconnectCause::BySme);
                let _ = state;
                match peer {
                    Some(peer) => {
                        let token = ctx.token();
                        ctx.mlme_sink.send(MlmeRequest::Deauthenticate {
                            peer,
                            reason_code: ReasonCode::LEAVING.0,
                        });
                        State::Disconnecting { responder, token }
                    }
                    None => {
                        if let Some(responder) = responder {
                            responder.respond(());
                        }
                        State::Idle
                    }
                }
            }
        }
    }

    fn peer(&self) -> Option<MacAddr> {
        match self {
            State::Idle | State::Disconnecting { .. } => None,
            State::Connecting { cmd, .. } => Some(cmd.bss.bssid),
            State::EstablishingRsna { bss, .. }
            | State::SettingKeys { bss, .. }
            | State::LinkUp { bss, .. } => Some(bss.bssid),
            State::FtAuthenticating { ft, .. } | State::FtReassociating { ft, .. } => {
                Some(ft.target.bssid)
            }
        }
    }

    /// Cancels whatever is in flight without emitting a deauthentication;
    /// pending responders resolve exactly once.
    fn disconnect_internal(self, ctx: &mut Context, cause: DisconnectCause) -> State {
        ctx.mlme_sink.send(MlmeRequest::CancelAll);
        match self {
            State::Idle => State::Idle,
            State::Connecting { cmd, .. } => {
                report_connect_finished(cmd.responder, ctx, ConnectResult::Canceled);
                State::Idle
            }
            State::EstablishingRsna { responder, .. } | State::SettingKeys { responder, .. } => {
                report_connect_finished(responder, ctx, ConnectResult::Canceled);
                State::Idle
            }
            State::LinkUp { .. } => {
                ctx.event_sink.send(ClientEvent::Disconnected(cause));
                State::Idle
            }
            State::FtAuthenticating { responder, .. }
            | State::FtReassociating { responder, .. } => {
                report_connect_finished(responder, ctx, ConnectResult::Canceled);
                ctx.event_sink.send(ClientEvent::Disconnected(cause));
                State::Idle
            }
            s @ State::Disconnecting { .. } => s,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            State::Idle | State::Disconnecting { .. } => {
                Status { connected_to: None, connecting_to: None }
            }
            State::Connecting { cmd, .. } => {
                Status { connected_to: None, connecting_to: Some(cmd.bss.ssid.clone()) }
            }
            State::EstablishingRsna { bss, .. } | State::SettingKeys { bss, .. } => {
                Status { connected_to: None, connecting_to: Some(bss.ssid.clone()) }
            }
            State::LinkUp { bss, .. } => {
                Status { connected_to: Some(bss.bssid), connecting_to: None }
            }
            State::FtAuthenticating { ft, .. } | State::FtReassociating { ft, .. } => {
                Status { connected_to: None, connecting_to: Some(ft.target.ssid.clone()) }
            }
        }
    }

    pub fn on_mlme_event(self, event: MlmeEvent, ctx: &mut Context) -> State {
        match self {
            State::Idle => {
                if let MlmeEvent::RequestComplete { .. } = event {
                } else {
                    warn!("unexpected MLME event while Idle: {:?}", event);
                }
                State::Idle
            }
            State::Connecting { cmd, token } => Self::on_connecting_event(cmd, token, event, ctx),
            State::EstablishingRsna {
                bss,
                responder,
                rsna,
                link_ies,
                rsna_timeout,
                resp_timeout,
                pending_ptk,
                pending_gtk,
                pending_igtk,
            } => Self::on_establishing_rsna_event(
                bss,
                responder,
                rsna,
                link_ies,
                rsna_timeout,
                resp_timeout,
                pending_ptk,
                pending_gtk,
                pending_igtk,
                event,
                ctx,
            ),
            State::SettingKeys { bss, responder, rsna, link_ies, mut installer } => match event {
                MlmeEvent::RequestComplete { token, result } => {
                    match installer.on_request_complete(token, &result, ctx) {
                        InstallProgress::InProgress => {
                            State::SettingKeys { bss, responder, rsna, link_ies, installer }
                        }
                        InstallProgress::Done => {
                            finish_link_up(bss, responder, rsna, link_ies, ctx)
                        }
                        InstallProgress::Failed => {
                            send_deauthenticate_request(bss.bssid, ctx);
                            report_connect_finished(
                                responder,
                                ctx,
                                ConnectFailure::KeySettingFailed.into(),
                            );
                            State::Idle
                        }
                    }
                }
                MlmeEvent::DeauthenticateInd { reason_code, .. }
                | MlmeEvent::DisassociateInd { reason_code, .. } => {
                    report_connect_finished(
                        responder,
                        ctx,
                        ConnectFailure::AssociationFailed(reason_code).into(),
                    );
                    State::Idle
                }
                _ => State::SettingKeys { bss, responder, rsna, link_ies, installer },
            },
            State::LinkUp { bss, rsna, link_ies } => {
                Self::on_link_up_event(bss, rsna, link_ies, event, ctx)
            }
            State::FtAuthenticating { ft: ft_ctx, responder, token, timeout } => {
                Self::on_ft_authenticating_event(ft_ctx, responder, token, timeout, event, ctx)
            }
            State::FtReassociating { ft: ft_ctx, responder, ptk, token, timeout } => {
                Self::on_ft_reassociating_event(ft_ctx, responder, ptk, token, timeout, event, ctx)
            }
            State::Disconnecting { responder, token } => match event {
                MlmeEvent::RequestComplete { token: done, .. } if done == token => {
                    if let Some(responder) = responder {
                        responder.respond(());
                    }
                    State::Idle
                }
                // Events of the torn-down connection are ignored.
                _ => State::Disconnecting { responder, token },
            },
        }
    }

    fn on_connecting_event(
        cmd: ConnectCommand,
        token: RequestToken,
        event: MlmeEvent,
        ctx: &mut Context,
    ) -> State {
        match event {
            MlmeEvent::ConnectConf { status_code, timed_out, resp_ies } => {
                if status_code != 0 || timed_out {
                    warn!(
                        "CONNECT to {:02x?} failed: status {}, timed_out {}",
                        cmd.bss.bssid, status_code, timed_out
                    );
                    report_connect_finished(
                        cmd.responder,
                        ctx,
                        ConnectFailure::AssociationFailed(status_code).into(),
                    );
                    return State::Idle;
                }
                let link_ies = match validate_connect_resp_ies(&cmd, &resp_ies[..]) {
                    Ok(link_ies) => link_ies,
                    Err(failure) => {
                        error!("CONNECT response IEs rejected");
                        send_deauthenticate_request(cmd.bss.bssid, ctx);
                        report_connect_finished(cmd.responder, ctx, failure.into());
                        return State::Idle;
                    }
                };
                match cmd.protection {
                    Protection::Open => finish_link_up(cmd.bss, cmd.responder, None, link_ies, ctx),
                    Protection::Rsna(mut rsna) => {
                        if let Err(e) = rsna.supplicant.start() {
                            error!("failed to start supplicant: {}", e);
                            send_deauthenticate_request(cmd.bss.bssid, ctx);
                            report_connect_finished(
                                cmd.responder,
                                ctx,
                                HandshakeFailure::Timeout.into(),
                            );
                            return State::Idle;
                        }
                        ctx.event_sink.send(ClientEvent::FourWayHandshake);
                        let rsna_timeout = ctx.timer.schedule(Event::EstablishingRsnaTimeout);
                        let resp_timeout =
                            ctx.timer.schedule(Event::KeyFrameExchangeTimeout { attempt: 1 });
                        State::EstablishingRsna {
                            bss: cmd.bss,
                            responder: cmd.responder,
                            rsna,
                            link_ies,
                            rsna_timeout,
                            resp_timeout,
                            pending_ptk: None,
                            pending_gtk: None,
                            pending_igtk: None,
                        }
                    }
                }
            }
            MlmeEvent::RequestComplete { token: done, result: Err(errno) } if done == token => {
                error!("kernel rejected CONNECT: errno {}", errno);
                report_connect_finished(
                    cmd.responder,
                    ctx,
                    ConnectFailure::AssociationFailed(0).into(),
                );
                State::Idle
            }
            MlmeEvent::DeauthenticateInd { reason_code, .. } => {
                report_connect_finished(
                    cmd.responder,
                    ctx,
                    ConnectFailure::AssociationFailed(reason_code).into(),
                );
                State::Idle
            }
            _ => State::Connecting { cmd, token },
        }
    }

    fn on_establishing_rsna_event(
        bss: Box<BssDescription>,
        responder: Option<Responder<ConnectResult>>,
        mut rsna: Rsna,
        link_ies: LinkIes,
        rsna_timeout: EventId,
        mut resp_timeout: EventId,
        mut pending_ptk: Option<Ptk>,
        mut pending_gtk: Option<Gtk>,
        mut pending_igtk: Option<Igtk>,
        event: MlmeEvent,
        ctx: &mut Context,
    ) -> State {
        match event {
            MlmeEvent::EapolRx { src, data } => {
                if src != bss.bssid {
                    // Not our authenticator; the frame fails only itself.
                    return State::EstablishingRsna {
                        bss,
                        responder,
                        rsna,
                        link_ies,
                        rsna_timeout,
                        resp_timeout,
                        pending_ptk,
                        pending_gtk,
                        pending_igtk,
                    };
                }
                let mic_size = rsna.negotiated_protection.mic_size;
                let frame = match eapol::Frame::from_bytes(&data[..], mic_size) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // A malformed frame never brings down the attempt.
                        warn!("received invalid EAPOL frame: {}", e);
                        return State::EstablishingRsna {
                            bss,
                            responder,
                            rsna,
                            link_ies,
                            rsna_timeout,
                            resp_timeout,
                            pending_ptk,
                            pending_gtk,
                            pending_igtk,
                        };
                    }
                };
                let mut updates = vec![];
                match rsna.supplicant.on_eapol_frame(&mut updates, &frame) {
                    Ok(()) => (),
                    Err(e) => {
                        let failure = map_handshake_error(&e);
                        error!("4-Way Handshake failed: {}", e);
                        send_deauthenticate_request(bss.bssid, ctx);
                        report_connect_finished(responder, ctx, failure.into());
                        return State::Idle;
                    }
                }

                let mut established = false;
                let mut wrong_password = false;
                for update in updates {
                    match update {
                        SecAssocUpdate::TxEapolKeyFrame(key_frame) => {
                            let token = ctx.token();
                            ctx.mlme_sink.send(MlmeRequest::Eapol {
                                token,
                                dst: bss.bssid,
                                data: key_frame.to_bytes(false),
                            });
                        }
                        SecAssocUpdate::Key(Key::Ptk(ptk)) => pending_ptk = Some(ptk),
                        SecAssocUpdate::Key(Key::Gtk(gtk)) => pending_gtk = Some(gtk),
                        SecAssocUpdate::Key(Key::Igtk(igtk)) => pending_igtk = Some(igtk),
                        SecAssocUpdate::Key(_) => (),
                        SecAssocUpdate::Status(SecAssocStatus::EssSaEstablished) => {
                            established = true
                        }
                        SecAssocUpdate::Status(SecAssocStatus::WrongPassword) => {
                            wrong_password = true
                        }
                    }
                }

                if wrong_password {
                    send_deauthenticate_request(bss.bssid, ctx);
                    report_connect_finished(
                        responder,
                        ctx,
                        HandshakeFailure::WrongPassword.into(),
                    );
                    return State::Idle;
                }

                if established {
                    let (ptk, gtk) = match (pending_ptk.take(), pending_gtk.take()) {
                        (Some(ptk), Some(gtk)) => (ptk, gtk),
                        _ => {
                            error!("RSNA established without a PTK and GTK");
                            send_deauthenticate_request(bss.bssid, ctx);
                            report_connect_finished(
                                responder,
                                ctx,
                                ConnectFailure::KeySettingFailed.into(),
                            );
                            return State::Idle;
                        }
                    };
                    ctx.event_sink.send(ClientEvent::SettingKeys);
                    let mut installer = KeyInstaller::for_rsna(
                        bss.bssid,
                        &rsna.negotiated_protection,
                        &ptk,
                        &gtk,
                        pending_igtk.as_ref(),
                        ctx.device_info.supports_rekey_offload,
                    );
                    match installer.send_next(ctx) {
                        InstallProgress::InProgress => State::SettingKeys {
                            bss,
                            responder,
                            rsna: Some(rsna),
                            link_ies,
                            installer,
                        },
                        // The batch is never empty; completion is immediate
                        // only in tests with no install steps.
                        _ => finish_link_up(bss, responder, Some(rsna), link_ies, ctx),
                    }
                } else {
                    // Progress resets the per-message retransmit budget.
                    resp_timeout = ctx.timer.schedule(Event::KeyFrameExchangeTimeout { attempt: 1 });
                    State::EstablishingRsna {
                        bss,
                        responder,
                        rsna,
                        link_ies,
                        rsna_timeout,
                        resp_timeout,
                        pending_ptk,
                        pending_gtk,
                        pending_igtk,
                    }
                }
            }
            MlmeEvent::DeauthenticateInd { reason_code, .. }
            | MlmeEvent::DisassociateInd { reason_code, .. } => {
                report_connect_finished(
                    responder,
                    ctx,
                    ConnectFailure::AssociationFailed(reason_code).into(),
                );
                State::Idle
            }
            _ => State::EstablishingRsna {
                bss,
                responder,
                rsna,
                link_ies,
                rsna_timeout,
                resp_timeout,
                pending_ptk,
                pending_gtk,
                pending_igtk,
            },
        }
    }

    fn on_link_up_event(
        bss: Box<BssDescription>,
        mut rsna: Option<Rsna>,
        link_ies: LinkIes,
        event: MlmeEvent,
        ctx: &mut Context,
    ) -> State {
        match event {
            MlmeEvent::EapolRx { src, data } => {
                if let Some(rsna) = rsna.as_mut() {
                    if src == bss.bssid {
                        handle_rekey_frame(&bss, rsna, &data[..], ctx);
                    }
                }
                State::LinkUp { bss, rsna, link_ies }
            }
            MlmeEvent::RequestComplete { result: Err(errno), .. } => {
                // The only tracked commands in LinkUp are rekey installs.
                error!("group rekey key installation failed: errno {}", errno);
                send_deauthenticate_request(bss.bssid, ctx);
                ctx.event_sink.send(ClientEvent::Disconnected(DisconnectCause::BySme));
                State::Idle
            }
            MlmeEvent::Cqm(crate::CqmEvent::RssiLow) => {
                ctx.event_sink.send(ClientEvent::RssiLow);
                ctx.event_sink.send(ClientEvent::RoamingCandidate);
                State::LinkUp { bss, rsna, link_ies }
            }
            MlmeEvent::Cqm(crate::CqmEvent::RssiHigh) => {
                ctx.event_sink.send(ClientEvent::RssiHigh);
                State::LinkUp { bss, rsna, link_ies }
            }
            MlmeEvent::Cqm(crate::CqmEvent::BeaconLoss) => {
                info!("beacon lost; tearing down the link");
                send_deauthenticate_request(bss.bssid, ctx);
                ctx.event_sink.send(ClientEvent::Disconnected(DisconnectCause::LostBeacon));
                State::Idle
            }
            MlmeEvent::RekeyOffload { replay_ctr } => {
                if let Some(rsna) = rsna.as_mut() {
                    rsna.supplicant.on_rekey_offload_replay_counter(replay_ctr);
                }
                State::LinkUp { bss, rsna, link_ies }
            }
            MlmeEvent::DeauthenticateInd { .. }
            | MlmeEvent::DisassociateInd { .. }
            | MlmeEvent::DisconnectInd { .. } => {
                ctx.event_sink.send(ClientEvent::Disconnected(DisconnectCause::ByPeer));
                State::Idle
            }
            MlmeEvent::InterfaceRemoved => {
                ctx.event_sink.send(ClientEvent::Disconnected(DisconnectCause::BySme));
                State::Idle
            }
            _ => State::LinkUp { bss, rsna, link_ies },
        }
    }

    /// Initiates a fast transition to `target`, which must advertise the
    /// same mobility domain as the current BSS.
    pub fn roam(
        self,
        target: Box<BssDescription>,
        responder: Responder<ConnectResult>,
        ctx: &mut Context,
    ) -> State {
        match self {
            State::LinkUp { bss, rsna: Some(rsna), link_ies } => {
                match ft::initiate(&bss, target, &rsna, &link_ies, ctx) {
                    Ok((ft_ctx, token)) => {
                        let timeout = ctx.timer.schedule(Event::FtExchangeTimeout);
                        State::FtAuthenticating {
                            ft: ft_ctx,
                            responder: Some(responder),
                            token,
                            timeout,
                        }
                    }
                    Err(e) => {
                        warn!("cannot start fast transition: {}", e);
                        responder.respond(ConnectFailure::NotSupported.into());
                        State::LinkUp { bss, rsna: Some(rsna), link_ies }
                    }
                }
            }
            State::LinkUp { bss, rsna: None, link_ies } => {
                responder.respond(ConnectFailure::NotSupported.into());
                State::LinkUp { bss, rsna: None, link_ies }
            }
            other => {
                responder.respond(ConnectFailure::NotConnected.into());
                other
            }
        }
    }

    fn on_ft_authenticating_event(
        ft_ctx: FtContext,
        responder: Option<Responder<ConnectResult>>,
        token: RequestToken,
        timeout: EventId,
        event: MlmeEvent,
        ctx: &mut Context,
    ) -> State {
        match event {
            MlmeEvent::AuthenticateConf { frame } => {
                match ft::on_authenticate_conf(&ft_ctx, &frame[..], ctx) {
                    Ok((ptk, reassoc_token)) => {
                        let timeout = ctx.timer.schedule(Event::FtExchangeTimeout);
                        State::FtReassociating {
                            ft: ft_ctx,
                            responder,
                            ptk,
                            token: reassoc_token,
                            timeout,
                        }
                    }
                    Err(e) => {
                        error!("FT authentication failed: {}", e);
                        send_deauthenticate_request(ft_ctx.target.bssid, ctx);
                        report_connect_finished(
                            responder,
                            ctx,
                            ConnectFailure::AuthenticationFailed.into(),
                        );
                        State::Idle
                    }
                }
            }
            MlmeEvent::RequestComplete { token: done, result: Err(errno) } if done == token => {
                error!("kernel rejected AUTHENTICATE: errno {}", errno);
                report_connect_finished(
                    responder,
                    ctx,
                    ConnectFailure::AuthenticationFailed.into(),
                );
                State::Idle
            }
            MlmeEvent::DeauthenticateInd { .. } => {
                report_connect_finished(
                    responder,
                    ctx,
                    ConnectFailure::AuthenticationFailed.into(),
                );
                State::Idle
            }
            _ => State::FtAuthenticating { ft: ft_ctx, responder, token, timeout },
        }
    }

    fn on_ft_reassociating_event(
        ft_ctx: FtContext,
        responder: Option<Responder<ConnectResult>>,
        ptk: Ptk,
        token: RequestToken,
        timeout: EventId,
        event: MlmeEvent,
        ctx: &mut Context,
    ) -> State {
        match event {
            MlmeEvent::AssociateConf { frame } => {
                match ft::on_reassociate_conf(&ft_ctx, &ptk, &frame[..]) {
                    Ok(reassoc) => {
                        // The whole point of FT: keys install with no 4-Way
                        // Handshake.
                        ctx.event_sink.send(ClientEvent::SettingKeys);
                        let mut installer = KeyInstaller::for_rsna(
                            ft_ctx.target.bssid,
                            &ft_ctx.negotiated_protection,
                            &ptk,
                            &reassoc.gtk,
                            None,
                            ctx.device_info.supports_rekey_offload,
                        );
                        let bss = ft_ctx.target.clone();
                        let link_ies = reassoc.link_ies;
                        let rsna = ft::into_rsna(ft_ctx, ptk, ctx);
                        match installer.send_next(ctx) {
                            InstallProgress::InProgress => State::SettingKeys {
                                bss,
                                responder,
                                rsna,
                                link_ies,
                                installer,
                            },
                            _ => finish_link_up(bss, responder, rsna, link_ies, ctx),
                        }
                    }
                    Err(e) => {
                        error!("FT reassociation failed: {}", e);
                        send_deauthenticate_request(ft_ctx.target.bssid, ctx);
                        report_connect_finished(
                            responder,
                            ctx,
                            ConnectFailure::AuthenticationFailed.into(),
                        );
                        State::Idle
                    }
                }
            }
            MlmeEvent::RequestComplete { token: done, result: Err(errno) } if done == token => {
                error!("kernel rejected ASSOCIATE: errno {}", errno);
                report_connect_finished(
                    responder,
                    ctx,
                    ConnectFailure::AuthenticationFailed.into(),
                );
                State::Idle
            }
            MlmeEvent::DeauthenticateInd { .. } => {
                report_connect_finished(
                    responder,
                    ctx,
                    ConnectFailure::AuthenticationFailed.into(),
                );
                State::Idle
            }
            _ => State::FtReassociating { ft: ft_ctx, responder, ptk, token, timeout },
        }
    }

    pub fn handle_timeout(self, event_id: EventId, event: Event, ctx: &mut Context) -> State {
        match self {
            State::EstablishingRsna {
                bss,
                responder,
                rsna,
                link_ies,
                rsna_timeout,
                resp_timeout,
                pending_ptk,
                pending_gtk,
                pending_igtk,
            } => match event {
                Event::EstablishingRsnaTimeout if event_id == rsna_timeout => {
                    warn!("timed out establishing the RSNA");
                    send_deauthenticate_request(bss.bssid, ctx);
                    report_connect_finished(responder, ctx, HandshakeFailure::Timeout.into());
                    State::Idle
                }
                Event::KeyFrameExchangeTimeout { attempt } if event_id == resp_timeout => {
                    if attempt >= event::KEY_FRAME_EXCHANGE_MAX_ATTEMPTS {
                        warn!("key frame exchange timed out after {} attempts", attempt);
                        send_deauthenticate_request(bss.bssid, ctx);
                        report_connect_finished(responder, ctx, HandshakeFailure::Timeout.into());
                        State::Idle
                    } else {
                        let resp_timeout = ctx
                            .timer
                            .schedule(Event::KeyFrameExchangeTimeout { attempt: attempt + 1 });
                        State::EstablishingRsna {
                            bss,
                            responder,
                            rsna,
                            link_ies,
                            rsna_timeout,
                            resp_timeout,
                            pending_ptk,
                            pending_gtk,
                            pending_igtk,
                        }
                    }
                }
                _ => State::EstablishingRsna {
                    bss,
                    responder,
                    rsna,
                    link_ies,
                    rsna_timeout,
                    resp_timeout,
                    pending_ptk,
                    pending_gtk,
                    pending_igtk,
                },
            },
            State::FtAuthenticating { ft, responder, token, timeout } => match event {
                Event::FtExchangeTimeout if event_id == timeout => {
                    send_deauthenticate_request(ft.target.bssid, ctx);
                    report_connect_finished(
                        responder,
                        ctx,
                        ConnectFailure::AuthenticationFailed.into(),
                    );
                    State::Idle
                }
                _ => State::FtAuthenticating { ft, responder, token, timeout },
            },
            State::FtReassociating { ft, responder, ptk, token, timeout } => match event {
                Event::FtExchangeTimeout if event_id == timeout => {
                    send_deauthenticate_request(ft.target.bssid, ctx);
                    report_connect_finished(
                        responder,
                        ctx,
                        ConnectFailure::AuthenticationFailed.into(),
                    );
                    State::Idle
                }
                _ => State::FtReassociating { ft, responder, ptk, token, timeout },
            },
            other => other,
        }
    }
}

/// Own RSNE plus the bit-exact echo of the target's MDE, and the RSN
/// attributes of the CONNECT command.
fn build_connect_ies(
    cmd: &ConnectCommand,
) -> Result<(Vec<u8>, Option<RsnParams>), failure::Error> {
    let mut ies = vec![];
    let rsn = match &cmd.protection {
        Protection::Open => None,
        Protection::Rsna(rsna) => {
            ies.extend_from_slice(&rsna.s_rsne.to_bytes()?[..]);
            if let Some(mde) = cmd.bss.mde() {
                ies.extend_from_slice(mde);
            }
            let protection = &rsna.negotiated_protection;
            Some(RsnParams {
                wpa_versions: WPA_VERSION_2,
                pairwise_cipher: protection.pairwise.to_u32(),
                group_cipher: protection.group_data.to_u32(),
                akm: protection.akm.to_u32(),
                mfp: MFP_NO,
            })
        }
    };
    Ok((ies, rsn))
}

const CQM_RSSI_THRESHOLD_DBM: i32 = -70;
const CQM_RSSI_HYSTERESIS_DB: u32 = 5;

fn finish_link_up(
    bss: Box<BssDescription>,
    responder: Option<Responder<ConnectResult>>,
    rsna: Option<Rsna>,
    link_ies: LinkIes,
    ctx: &mut Context,
) -> State {
    ctx.mlme_sink.send(MlmeRequest::SetLinkOperUp);
    ctx.mlme_sink.send(MlmeRequest::SetCqm {
        rssi_thold_dbm: CQM_RSSI_THRESHOLD_DBM,
        hysteresis_db: CQM_RSSI_HYSTERESIS_DB,
    });
    report_connect_finished(responder, ctx, ConnectResult::Success);
    ctx.event_sink.send(ClientEvent::Operational);
    State::LinkUp { bss, rsna, link_ies }
}

fn handle_rekey_frame(bss: &BssDescription, rsna: &mut Rsna, data: &[u8], ctx: &mut Context) {
    let mic_size = rsna.negotiated_protection.mic_size;
    let frame = match eapol::Frame::from_bytes(data, mic_size) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("received invalid EAPOL frame: {}", e);
            return;
        }
    };
    let mut updates = vec![];
    if let Err(e) = rsna.supplicant.on_eapol_frame(&mut updates, &frame) {
        error!("error processing group rekey frame: {}", e);
        return;
    }
    for update in updates {
        match update {
            SecAssocUpdate::TxEapolKeyFrame(key_frame) => {
                let token = ctx.token();
                ctx.mlme_sink.send(MlmeRequest::Eapol {
                    token,
                    dst: bss.bssid,
                    data: key_frame.to_bytes(false),
                });
            }
            SecAssocUpdate::Key(Key::Gtk(gtk)) => {
                let token = ctx.token();
                ctx.mlme_sink.send(MlmeRequest::NewKey {
                    token,
                    key: KeyConfig {
                        key: gtk.tk().to_vec(),
                        key_id: gtk.key_id(),
                        cipher: rsna.negotiated_protection.group_data.to_u32(),
                        address: None,
                        rsc: Some(gtk.rsc().to_be_bytes().to_vec()),
                    },
                });
            }
            SecAssocUpdate::Key(Key::Igtk(igtk)) => {
                let token = ctx.token();
                ctx.mlme_sink.send(MlmeRequest::NewKey {
                    token,
                    key: KeyConfig {
                        key: igtk.tk().to_vec(),
                        key_id: igtk.key_id as u8,
                        cipher: igtk.cipher.to_u32(),
                        address: None,
                        rsc: Some(igtk.ipn.to_vec()),
                    },
                });
            }
            _ => (),
        }
    }
}

pub(crate) fn send_deauthenticate_request(peer: MacAddr, ctx: &mut Context) {
    let _token = ctx.token();
    ctx.mlme_sink.send(MlmeRequest::Deauthenticate {
        peer,
        reason_code: ReasonCode::UNSPECIFIED.0,
    });
}

fn map_handshake_error(e: &failure::Error) -> HandshakeFailure {
    match e.downcast_ref::<wifi_rsn::Error>() {
        Some(wifi_rsn::Error::InvalidMic) => HandshakeFailure::MicMismatch,
        Some(wifi_rsn::Error::InvalidKeyReplayCounter(..)) => HandshakeFailure::ReplayViolation,
        Some(wifi_rsn::Error::RsneMismatch) | Some(wifi_rsn::Error::MissingGtk) => {
            HandshakeFailure::IeMismatch
        }
        _ => HandshakeFailure::Timeout,
    }
}

/// Validates the (re)association response IEs surfaced by the CONNECT event
/// per the negotiated protection: an RSN association requires a response
/// RSNE; the MDE must echo ours bit-exact; an FTE is only admitted (and, in
/// an FT initial mobility-domain association, required) when FT was
/// negotiated. Elements this daemon does not know are skipped.
fn validate_connect_resp_ies(
    cmd: &ConnectCommand,
    resp_ies: &[u8],
) -> Result<LinkIes, ConnectFailure> {
    let elements = ie::parse_checked(resp_ies).map_err(|_| ConnectFailure::InvalidIe)?;
    let is_rsna = match &cmd.protection {
        Protection::Rsna(..) => true,
        Protection::Open => false,
    };
    let is_ft = match &cmd.protection {
        Protection::Rsna(rsna) => rsna.negotiated_protection.akm.is_ft(),
        Protection::Open => false,
    };
    let sent_mde = cmd.bss.mde();

    let mut link_ies = LinkIes::default();
    let mut saw_rsne = false;
    for (id, _body) in elements {
        match id {
            Id::RSNE => {
                if !is_rsna {
                    return Err(ConnectFailure::InvalidIe);
                }
                let raw = ie::find_raw_element(resp_ies, Id::RSNE).expect("present by id");
                wifi_common::ie::rsn::rsne::from_bytes(raw)
                    .map_err(|_| ConnectFailure::InvalidIe)?;
                saw_rsne = true;
            }
            Id::MOBILITY_DOMAIN => {
                let raw = ie::find_raw_element(resp_ies, Id::MOBILITY_DOMAIN)
                    .expect("present by id");
                match sent_mde {
                    Some(sent) if sent == raw => link_ies.mde = Some(raw.to_vec()),
                    _ => return Err(ConnectFailure::InvalidIe),
                }
            }
            Id::FAST_BSS_TRANSITION => {
                if !is_ft {
                    return Err(ConnectFailure::InvalidIe);
                }
                let raw = ie::find_raw_element(resp_ies, Id::FAST_BSS_TRANSITION)
                    .expect("present by id");
                wifi_common::ie::ft::Fte::from_bytes(raw)
                    .map_err(|_| ConnectFailure::InvalidIe)?;
                link_ies.fte = Some(raw.to_vec());
            }
            // Unknown elements are skipped silently.
            _ => (),
        }
    }
    if is_rsna && !saw_rsne {
        return Err(ConnectFailure::InvalidIe);
    }
    if is_ft && sent_mde.is_some() && link_ies.fte.is_none() {
        // An FT initial mobility-domain association must deliver the FTE.
        return Err(ConnectFailure::InvalidIe);
    }
    Ok(link_ies)
}
