use std::time::Duration;

use wifi_common::MacAddr;

use crate::timer::TimeoutDuration;

pub const START_TIMEOUT: Duration = Duration::from_secs(5);
pub const KEY_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(1);
pub const KEY_EXCHANGE_MAX_ATTEMPTS: u32 = 3;
/// WSC 2.0.5, 11.3: the push-button walk time.
pub const PBC_WALK_TIME: Duration = Duration::from_secs(120);
/// WSC 2.0.5, 11.3: the sliding session-overlap monitor window.
pub const PBC_MONITOR_TIME: Duration = Duration::from_secs(120);

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Sme { event: SmeEvent },
    Client { addr: MacAddr, event: ClientEvent },
}

#[derive(Clone, Debug, PartialEq)]
pub enum SmeEvent {
    StartTimeout,
    PbcWalkTimeout,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    KeyExchangeTimeout { attempt: u32 },
}

impl TimeoutDuration for Event {
    fn timeout_duration(&self) -> Duration {
        match self {
            Event::Sme { event: SmeEvent::StartTimeout } => START_TIMEOUT,
            Event::Sme { event: SmeEvent::PbcWalkTimeout } => PBC_WALK_TIME,
            Event::Client { event: ClientEvent::KeyExchangeTimeout { .. }, .. } => {
                KEY_EXCHANGE_TIMEOUT
            }
        }
    }
}
