//! The interface table: discovers netdevs, applies the operator's name
//! filters, spawns a serve loop per managed interface and demultiplexes
//! kernel events to it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use failure::Error;
use futures::channel::mpsc;
use futures::StreamExt;
use log::{debug, info, warn};

use wifi_common::MacAddr;
use wifi_nl80211::rtnl::RtnlHandle;
use wifi_nl80211::{Handle, Nl80211Attr, Nl80211Cmd, Nl80211Event, IFTYPE_AP, IFTYPE_STATION};
use wifi_sme::DeviceInfo;

use crate::config::{EnvStorage, ProfileStorage};
use crate::station;

/// Interface-name allow/block patterns. A trailing `*` matches any suffix;
/// anything else matches exactly. An empty allow list admits every name.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    allow: Vec<String>,
    block: Vec<String>,
}

impl Filter {
    pub fn from_patterns(allow: Option<&str>, block: Option<&str>) -> Self {
        let split = |s: Option<&str>| -> Vec<String> {
            s.map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
                .unwrap_or_default()
        };
        Filter { allow: split(allow), block: split(block) }
    }

    fn pattern_matches(pattern: &str, name: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == pattern,
        }
    }

    pub fn admits(&self, name: &str) -> bool {
        if self.block.iter().any(|p| Self::pattern_matches(p, name)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|p| Self::pattern_matches(p, name))
    }
}

struct Interface {
    name: String,
    events: mpsc::UnboundedSender<Nl80211Event>,
}

/// Runs until the nl80211 connection dies. Netlink socket errors surface
/// here as the end of the event stream, which tears every interface down.
pub async fn serve(
    handle: Handle,
    rtnl: Rc<RefCell<RtnlHandle>>,
    mut events: mpsc::UnboundedReceiver<Nl80211Event>,
    filter: Filter,
) -> Result<(), Error> {
    let storage: Rc<dyn ProfileStorage> = Rc::new(EnvStorage::from_env());
    let mut interfaces: HashMap<u32, Interface> = HashMap::new();

    // Learn the existing netdevs.
    let (_, dump) = handle.dump(Nl80211Cmd::GetInterface, vec![]);
    if let Ok(Ok(messages)) = dump.await {
        for message in messages {
            if let Some((ifindex, info)) = decode_interface(&message.attrs[..]) {
                add_interface(&mut interfaces, &handle, &rtnl, &filter, &storage, ifindex, info);
            }
        }
    }

    while let Some(event) = events.next().await {
        match event.cmd {
            Nl80211Cmd::NewInterface => {
                if let Some((ifindex, info)) = decode_interface(&event.attrs[..]) {
                    if !interfaces.contains_key(&ifindex) {
                        add_interface(
                            &mut interfaces,
                            &handle,
                            &rtnl,
                            &filter,
                            &storage,
                            ifindex,
                            info,
                        );
                    }
                }
            }
            Nl80211Cmd::DelInterface => {
                if let Some(ifindex) = event.ifindex() {
                    if let Some(interface) = interfaces.remove(&ifindex) {
                        info!("interface {} ({}) removed", ifindex, interface.name);
                        // Forward the removal, then drop the sender; the
                        // serve loop finishes and cancels its commands.
                        let _ = interface.events.unbounded_send(event);
                    }
                }
            }
            _ => match event.ifindex() {
                Some(ifindex) => match interfaces.get(&ifindex) {
                    Some(interface) => {
                        let _ = interface.events.unbounded_send(event);
                    }
                    None => debug!("event for unmanaged interface {}", ifindex),
                },
                None => debug!("ignoring event without an interface: {:?}", event.cmd),
            },
        }
    }
    warn!("nl80211 event stream ended; shutting down");
    Ok(())
}

struct InterfaceInfo {
    name: String,
    addr: MacAddr,
    iftype: u32,
}

fn decode_interface(attrs: &[Nl80211Attr]) -> Option<(u32, InterfaceInfo)> {
    let mut ifindex = None;
    let mut name = None;
    let mut addr = None;
    let mut iftype = None;
    for attr in attrs {
        match attr {
            Nl80211Attr::Ifindex(idx) => ifindex = Some(*idx),
            Nl80211Attr::Ifname(n) => name = Some(n.clone()),
            Nl80211Attr::Mac(mac) => addr = Some(*mac),
            Nl80211Attr::Iftype(t) => iftype = Some(*t),
            _ => (),
        }
    }
    Some((ifindex?, InterfaceInfo { name: name?, addr: addr?, iftype: iftype? }))
}

fn add_interface(
    interfaces: &mut HashMap<u32, Interface>,
    handle: &Handle,
    rtnl: &Rc<RefCell<RtnlHandle>>,
    filter: &Filter,
    storage: &Rc<dyn ProfileStorage>,
    ifindex: u32,
    info: InterfaceInfo,
) {
    if !filter.admits(&info.name[..]) {
        info!("interface {} ({}) filtered out", ifindex, info.name);
        return;
    }
    let device_info = DeviceInfo {
        ifindex,
        addr: info.addr,
        supports_rekey_offload: false,
        supports_control_port: true,
    };
    let (events_tx, events_rx) = mpsc::unbounded();
    match info.iftype {
        IFTYPE_STATION => {
            info!("managing client interface {} ({})", ifindex, info.name);
            // The control half belongs to the (external) command surface;
            // dropping it leaves the interface passively managed.
            let (_control_tx, control_rx) = mpsc::unbounded::<station::ControlRequest>();
            let handle = handle.clone();
            let rtnl = rtnl.clone();
            let storage = storage.clone();
            tokio::task::spawn_local(async move {
                if let Err(e) =
                    station::serve_client(device_info, handle, rtnl, events_rx, control_rx, storage)
                        .await
                {
                    warn!("client serve loop for {} failed: {}", ifindex, e);
                }
            });
        }
        IFTYPE_AP => {
            info!("managing AP interface {} ({})", ifindex, info.name);
            let (_control_tx, control_rx) = mpsc::unbounded::<station::ApControlRequest>();
            let handle = handle.clone();
            let rtnl = rtnl.clone();
            tokio::task::spawn_local(async move {
                if let Err(e) =
                    station::serve_ap(device_info, handle, rtnl, events_rx, control_rx).await
                {
                    warn!("AP serve loop for {} failed: {}", ifindex, e);
                }
            });
        }
        other => {
            debug!("interface {} has unmanaged type {}", ifindex, other);
            return;
        }
    }
    interfaces.insert(ifindex, Interface { name: info.name, events: events_tx });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_exact_and_prefix() {
        let filter = Filter::from_patterns(Some("wlan*,wlp3s0"), None);
        assert!(filter.admits("wlan0"));
        assert!(filter.admits("wlan1"));
        assert!(filter.admits("wlp3s0"));
        assert!(!filter.admits("eth0"));
    }

    #[test]
    fn block_wins_over_allow() {
        let filter = Filter::from_patterns(Some("wlan*"), Some("wlan1"));
        assert!(filter.admits("wlan0"));
        assert!(!filter.admits("wlan1"));
    }

    #[test]
    fn empty_allow_admits_all_but_blocked() {
        let filter = Filter::from_patterns(None, Some("p2p*"));
        assert!(filter.admits("wlan0"));
        assert!(!filter.admits("p2p-dev-wlan0"));
    }
}
