//! Per-station records of one infrastructure BSS.

use log::warn;
use std::collections::HashMap;

use wifi_common::MacAddr;
use wifi_rsn::rsna::UpdateSink;

use super::aid::{Aids, AssociationId};
use super::authenticator::Authenticator;
use crate::timer::EventId;

/// None -> Authenticated -> Associated -> Rsna. A station that loses its
/// record drops back to None implicitly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientState {
    Authenticated,
    /// Association response sent; its TX status is outstanding.
    Associating,
    Associated,
    Rsna,
}

#[derive(Debug)]
pub struct RemoteClient {
    pub addr: MacAddr,
    pub state: ClientState,
    pub aid: Option<AssociationId>,
    pub capabilities: u16,
    pub listen_interval: u16,
    pub rates: Vec<u8>,
    /// The association request's IE section, original framing preserved,
    /// retained for the life of the client.
    pub assoc_ies: Vec<u8>,
    /// Admitted through an active push-button session; runs EAP-WSC instead
    /// of the 4-Way Handshake.
    pub wsc_enrollee: bool,
    pub key_exchange_timeout: Option<EventId>,
    pub last_key_frame: Option<Vec<u8>>,
    authenticator: Option<Box<dyn Authenticator>>,
}

impl RemoteClient {
    pub fn new(addr: MacAddr) -> Self {
        RemoteClient {
            addr,
            state: ClientState::Authenticated,
            aid: None,
            capabilities: 0,
            listen_interval: 0,
            rates: vec![],
            assoc_ies: vec![],
            wsc_enrollee: false,
            key_exchange_timeout: None,
            last_key_frame: None,
            authenticator: None,
        }
    }

    pub fn set_authenticator(&mut self, authenticator: Box<dyn Authenticator>) {
        self.authenticator = Some(authenticator);
    }

    pub fn has_authenticator(&self) -> bool {
        self.authenticator.is_some()
    }

    pub fn initiate_key_exchange(&mut self) -> Result<UpdateSink, failure::Error> {
        let mut updates = vec![];
        match self.authenticator.as_mut() {
            Some(authenticator) => authenticator.initiate(&mut updates)?,
            None => failure::bail!("client {:02X?} has no authenticator", self.addr),
        }
        Ok(updates)
    }

    pub fn on_eapol_frame(&mut self, frame: &eapol::Frame) -> Result<UpdateSink, failure::Error> {
        let mut updates = vec![];
        match self.authenticator.as_mut() {
            Some(authenticator) => authenticator.on_eapol_frame(&mut updates, frame)?,
            None => failure::bail!("client {:02X?} has no authenticator", self.addr),
        }
        Ok(updates)
    }

    pub fn initiate_group_rekey(&mut self) -> Result<UpdateSink, failure::Error> {
        let mut updates = vec![];
        match self.authenticator.as_mut() {
            Some(authenticator) => authenticator.initiate_group_rekey(&mut updates)?,
            None => failure::bail!("client {:02X?} has no authenticator", self.addr),
        }
        Ok(updates)
    }
}

/// All stations of one BSS, unique by MAC, with their AID allocator.
#[derive(Debug, Default)]
pub struct Map {
    clients: HashMap<MacAddr, RemoteClient>,
    aids: Aids,
}

impl Map {
    /// (Re-)creates the record for an authenticating station. A client
    /// authenticating while still associated starts over.
    pub fn add_or_refresh(&mut self, addr: MacAddr) -> &mut RemoteClient {
        if let Some(old) = self.clients.remove(&addr) {
            warn!("client {:02X?} authenticates while known; restarting its state", addr);
            if let Some(aid) = old.aid {
                self.aids.release(aid);
            }
        }
        self.clients.entry(addr).or_insert_with(|| RemoteClient::new(addr))
    }

    pub fn get(&self, addr: &MacAddr) -> Option<&RemoteClient> {
        self.clients.get(addr)
    }

    pub fn get_mut(&mut self, addr: &MacAddr) -> Option<&mut RemoteClient> {
        self.clients.get_mut(addr)
    }

    pub fn remove(&mut self, addr: &MacAddr) -> Option<RemoteClient> {
        let client = self.clients.remove(addr);
        if let Some(client) = &client {
            if let Some(aid) = client.aid {
                self.aids.release(aid);
            }
        }
        client
    }

    /// Assigns an AID if the client does not hold one yet.
    pub fn assign_aid(&mut self, addr: &MacAddr) -> Option<AssociationId> {
        let aids = &mut self.aids;
        let client = self.clients.get_mut(addr)?;
        match client.aid {
            Some(aid) => Some(aid),
            None => {
                let aid = aids.assign()?;
                client.aid = Some(aid);
                Some(aid)
            }
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RemoteClient> {
        self.clients.values_mut()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: MacAddr = [2, 0, 0, 0, 0, 1];

    #[test]
    fn refresh_releases_the_aid() {
        let mut map = Map::default();
        map.add_or_refresh(ADDR);
        let aid = map.assign_aid(&ADDR).expect("no aid assigned");
        assert_eq!(map.get(&ADDR).unwrap().aid, Some(aid));

        let client = map.add_or_refresh(ADDR);
        assert_eq!(client.aid, None);
        assert_eq!(client.state, ClientState::Authenticated);
    }

    #[test]
    fn aid_is_stable_across_reassociation() {
        let mut map = Map::default();
        map.add_or_refresh(ADDR);
        let first = map.assign_aid(&ADDR).unwrap();
        let second = map.assign_aid(&ADDR).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn remove_releases_the_aid() {
        let mut map = Map::default();
        map.add_or_refresh(ADDR);
        map.assign_aid(&ADDR).unwrap();
        assert!(map.remove(&ADDR).is_some());
        assert_eq!(map.len(), 0);
    }
}
