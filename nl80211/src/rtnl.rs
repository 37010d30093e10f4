//! Route-netlink side channel: link flags, link mode / operational state,
//! and the IPv4 address the AP path installs.
//!
//! These calls are short request/ack exchanges against the local kernel and
//! run synchronously on the main loop.

use std::io;
use std::net::Ipv4Addr;

use failure::{bail, format_err};
use log::debug;
use netlink_packet_core::{
    NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL,
    NLM_F_REQUEST,
};
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkFlag, LinkMessage, State};
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
use netlink_sys::{protocols::NETLINK_ROUTE, Socket};

// IFLA_LINKMODE values from linux/if.h.
pub const LINK_MODE_DEFAULT: u8 = 0;
pub const LINK_MODE_DORMANT: u8 = 1;

pub struct RtnlHandle {
    socket: Socket,
    seq: u32,
}

impl RtnlHandle {
    pub fn new() -> Result<RtnlHandle, failure::Error> {
        let mut socket = Socket::new(NETLINK_ROUTE).map_err(map_io)?;
        socket.bind_auto().map_err(map_io)?;
        Ok(RtnlHandle { socket, seq: 0 })
    }

    /// Brings the link administratively up.
    pub fn set_link_up(&mut self, ifindex: u32) -> Result<(), failure::Error> {
        let mut link = LinkMessage::default();
        link.header.index = ifindex;
        link.header.flags = vec![LinkFlag::Up];
        link.header.change_mask = vec![LinkFlag::Up];
        self.request_ack(RouteNetlinkMessage::SetLink(link))
    }

    /// Sets IFLA_LINKMODE; dormant mode gates operational-up on the RSNA.
    pub fn set_link_mode(&mut self, ifindex: u32, mode: u8) -> Result<(), failure::Error> {
        let mut link = LinkMessage::default();
        link.header.index = ifindex;
        link.attributes.push(LinkAttribute::Mode(mode));
        self.request_ack(RouteNetlinkMessage::SetLink(link))
    }

    /// Sets IFLA_OPERSTATE to IF_OPER_UP.
    pub fn set_oper_up(&mut self, ifindex: u32) -> Result<(), failure::Error> {
        let mut link = LinkMessage::default();
        link.header.index = ifindex;
        link.attributes.push(LinkAttribute::OperState(State::Up));
        self.request_ack(RouteNetlinkMessage::SetLink(link))
    }

    /// Installs an IPv4 address on the interface (AP provisioning).
    pub fn add_ipv4_address(
        &mut self,
        ifindex: u32,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<(), failure::Error> {
        let mut message = AddressMessage::default();
        message.header.family = AddressFamily::Inet;
        message.header.prefix_len = prefix_len;
        message.header.index = ifindex;
        message.attributes.push(AddressAttribute::Local(address.into()));
        message.attributes.push(AddressAttribute::Address(address.into()));
        self.request_ack_with_flags(
            RouteNetlinkMessage::NewAddress(message),
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )
    }

    pub fn del_ipv4_address(
        &mut self,
        ifindex: u32,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<(), failure::Error> {
        let mut message = AddressMessage::default();
        message.header.family = AddressFamily::Inet;
        message.header.prefix_len = prefix_len;
        message.header.index = ifindex;
        message.attributes.push(AddressAttribute::Local(address.into()));
        self.request_ack(RouteNetlinkMessage::DelAddress(message))
    }

    fn request_ack(&mut self, message: RouteNetlinkMessage) -> Result<(), failure::Error> {
        self.request_ack_with_flags(message, NLM_F_REQUEST | NLM_F_ACK)
    }

    fn request_ack_with_flags(
        &mut self,
        message: RouteNetlinkMessage,
        flags: u16,
    ) -> Result<(), failure::Error> {
        self.seq += 1;
        let mut header = NetlinkHeader::default();
        header.flags = flags;
        header.sequence_number = self.seq;
        let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(message));
        packet.finalize();
        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf[..]);
        self.socket.send(&buf[..], 0).map_err(map_io)?;

        loop {
            let mut rbuf: Vec<u8> = Vec::with_capacity(4096);
            self.socket.recv(&mut rbuf, 0).map_err(map_io)?;
            for bytes in crate::conn::split_messages(&rbuf[..]) {
                let response =
                    NetlinkMessage::<RouteNetlinkMessage>::deserialize(bytes)
                        .map_err(|e| format_err!("invalid rtnetlink message: {}", e))?;
                if response.header.sequence_number != self.seq {
                    debug!("ignoring unrelated rtnetlink message");
                    continue;
                }
                if let NetlinkPayload::Error(e) = response.payload {
                    match e.code {
                        Some(code) => bail!("rtnetlink request failed: errno {}", code),
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

fn map_io(e: io::Error) -> failure::Error {
    format_err!("rtnetlink socket error: {}", e)
}
