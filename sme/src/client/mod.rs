//! Client-mode station management.

pub mod bss;
pub mod event;
mod ft;
mod rsn;
mod state;

use futures::channel::{mpsc, oneshot};
use log::error;
use std::sync::Arc;

use crate::responder::Responder;
use crate::sink::{MlmeSink, UnboundedSink};
use crate::timer::{self, TimedEvent};
use crate::{DeviceInfo, MlmeEvent, MlmeStream};

use self::event::Event;
use self::rsn::get_rsna;
use self::state::{ConnectCommand, Protection, State};

pub use self::bss::BssDescription;
pub use self::rsn::Credential;
pub use self::state::{ConnectFailure, ConnectResult, HandshakeFailure, Status};

/// Events surfaced to the upper layer (the D-Bus surface or another
/// caller).
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    Connecting,
    FourWayHandshake,
    SettingKeys,
    Operational,
    Disconnected(DisconnectCause),
    RssiLow,
    RssiHigh,
    RoamingCandidate,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DisconnectCause {
    ByPeer,
    BySme,
    LostBeacon,
}

pub type ClientEventStream = mpsc::UnboundedReceiver<ClientEvent>;

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectRequest {
    pub bss: BssDescription,
    pub credential: Credential,
}

// A private module hides the context type from the public interface while
// keeping it visible to the state machine submodules.
mod internal {
    use std::sync::Arc;

    use crate::client::{ClientEvent, Event};
    use crate::sink::{MlmeSink, UnboundedSink};
    use crate::timer::Timer;
    use crate::{DeviceInfo, RequestToken};

    pub struct Context {
        pub device_info: Arc<DeviceInfo>,
        pub mlme_sink: MlmeSink,
        pub event_sink: UnboundedSink<ClientEvent>,
        pub(crate) timer: Timer<Event>,
        next_token: RequestToken,
    }

    impl Context {
        pub fn new(
            device_info: Arc<DeviceInfo>,
            mlme_sink: MlmeSink,
            event_sink: UnboundedSink<ClientEvent>,
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

pub struct ClientSme {
    state: Option<State>,
    context: Context,
}

impl ClientSme {
    pub fn new(info: DeviceInfo) -> (Self, MlmeStream, ClientEventStream, TimeStream) {
        let device_info = Arc::new(info);
        let (mlme_sink, mlme_stream) = mpsc::unbounded();
        let (event_sink, event_stream) = mpsc::unbounded();
        let (timer, time_stream) = timer::create_timer();
        (
            ClientSme {
                state: Some(State::Idle),
                context: Context::new(
                    device_info,
                    MlmeSink::new(mlme_sink),
                    UnboundedSink::new(event_sink),
                    timer,
                ),
            },
            mlme_stream,
            event_stream,
            time_stream,
        )
    }

    pub fn on_connect_command(
        &mut self,
        req: ConnectRequest,
    ) -> oneshot::Receiver<ConnectResult> {
        let (responder, receiver) = Responder::new();
        let protection = if req.bss.is_protected() {
            match get_rsna(&self.context.device_info, &req.credential, &req.bss) {
                Ok(protection) => protection,
                Err(e) => {
                    error!("cannot join '{}': {}", String::from_utf8_lossy(&req.bss.ssid[..]), e);
                    responder.respond(ConnectFailure::InvalidArgs.into());
                    return receiver;
                }
            }
        } else {
            match req.credential {
                Credential::None => Protection::Open,
                _ => {
                    error!("credential provided for an open network");
                    responder.respond(ConnectFailure::InvalidArgs.into());
                    return receiver;
                }
            }
        };

        let cmd = ConnectCommand {
            bss: Box::new(req.bss),
            responder: Some(responder),
            protection,
        };
        self.state =
            self.state.take().map(|state| state.connect(cmd, &mut self.context));
        receiver
    }

    pub fn on_disconnect_command(&mut self) -> oneshot::Receiver<()> {
        let (responder, receiver) = Responder::new();
        self.state = self
            .state
            .take()
            .map(|state| state.disconnect(Some(responder), &mut self.context));
        receiver
    }

    /// Fast transition to another BSS of the same mobility domain.
    pub fn on_roam_command(
        &mut self,
        target: BssDescription,
    ) -> oneshot::Receiver<ConnectResult> {
        let (responder, receiver) = Responder::new();
        self.state = self
            .state
            .take()
            .map(|state| state.roam(Box::new(target), responder, &mut self.context));
        receiver
    }

    pub fn status(&self) -> Status {
        self.state.as_ref().expect("state is always present").status()
    }
}

impl crate::Station for ClientSme {
    type Event = Event;

    fn on_mlme_event(&mut self, event: MlmeEvent) {
        self.state =
            self.state.take().map(|state| state.on_mlme_event(event, &mut self.context));
    }

    fn on_timeout(&mut self, timed_event: TimedEvent<Event>) {
        self.state = self.state.take().map(|state| {
            state.handle_timeout(timed_event.id, timed_event.event, &mut self.context)
        });
    }
}

fn report_connect_finished(
    responder: Option<Responder<ConnectResult>>,
    _ctx: &mut Context,
    result: ConnectResult,
) {
    if let Some(responder) = responder {
        responder.respond(result);
    }
}
