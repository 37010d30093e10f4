//! WSC push-button session tracking: probe records, walk time and
//! session-overlap detection.

use std::time::Instant;

use wifi_common::MacAddr;

use super::event::PBC_MONITOR_TIME;

/// One PBC probe request seen on the air.
#[derive(Clone, Debug, PartialEq)]
pub struct PbcProbe {
    pub mac: MacAddr,
    pub uuid_e: [u8; 16],
    pub timestamp: Instant,
}

/// Push-button state of one BSS. Probe records outlive PBC mode itself:
/// the monitor window keeps sliding so a button press during a burst of
/// foreign enrollees still detects the overlap.
#[derive(Debug, Default)]
pub struct PbcState {
    active: bool,
    probes: Vec<PbcProbe>,
}

impl PbcState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Records a PBC probe request, refreshing an existing record of the
    /// same enrollee.
    pub fn record_probe(&mut self, mac: MacAddr, uuid_e: [u8; 16], now: Instant) {
        self.expire(now);
        match self.probes.iter_mut().find(|p| p.mac == mac) {
            Some(probe) => {
                probe.uuid_e = uuid_e;
                probe.timestamp = now;
            }
            None => self.probes.push(PbcProbe { mac, uuid_e, timestamp: now }),
        }
    }

    /// Drops records older than the monitor window.
    pub fn expire(&mut self, now: Instant) {
        self.probes.retain(|p| now.duration_since(p.timestamp) < PBC_MONITOR_TIME);
    }

    /// Two or more distinct enrollees within the monitor window constitute
    /// session overlap. Records are unique by MAC.
    pub fn overlap(&mut self, now: Instant) -> bool {
        self.expire(now);
        self.probes.len() >= 2
    }

    /// The single enrollee admitted to associate while PBC is active.
    pub fn sole_enrollee(&mut self, now: Instant) -> Option<MacAddr> {
        self.expire(now);
        match &self.probes[..] {
            [probe] => Some(probe.mac),
            _ => None,
        }
    }

    /// After a successful credential delivery the enrollee's records are
    /// purged so its next button press is not mistaken for overlap.
    pub fn purge(&mut self, mac: &MacAddr) {
        self.probes.retain(|p| &p.mac != mac);
    }
}
