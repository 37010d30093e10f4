//! Generic-netlink payload for the nl80211 family.

use anyhow::Context;
use netlink_packet_generic::{GenlFamily, GenlHeader};
use netlink_packet_utils::{
    nla::NlasIterator, DecodeError, Emitable, Parseable, ParseableParametrized,
};

use crate::attr::Nl80211Attr;
use crate::cmd::Nl80211Cmd;

#[derive(Debug, Clone, PartialEq)]
pub struct Nl80211Message {
    pub cmd: Nl80211Cmd,
    pub attrs: Vec<Nl80211Attr>,
}

impl Nl80211Message {
    pub fn new(cmd: Nl80211Cmd, attrs: Vec<Nl80211Attr>) -> Self {
        Nl80211Message { cmd, attrs }
    }

    /// First attribute matched by the given selector.
    pub fn find<T, F: Fn(&Nl80211Attr) -> Option<T>>(&self, f: F) -> Option<T> {
        self.attrs.iter().filter_map(f).next()
    }
}

impl GenlFamily for Nl80211Message {
    fn family_name() -> &'static str {
        "nl80211"
    }

    fn command(&self) -> u8 {
        self.cmd.into()
    }

    fn version(&self) -> u8 {
        1
    }
}

impl Emitable for Nl80211Message {
    fn buffer_len(&self) -> usize {
        self.attrs.as_slice().buffer_len()
    }

    fn emit(&self, buffer: &mut [u8]) {
        self.attrs.as_slice().emit(buffer)
    }
}

impl ParseableParametrized<[u8], GenlHeader> for Nl80211Message {
    fn parse_with_param(buffer: &[u8], header: GenlHeader) -> Result<Self, DecodeError> {
        let mut attrs = Vec::new();
        for nla in NlasIterator::new(buffer) {
            let nla = &nla.context("invalid nl80211 NLA")?;
            attrs.push(Nl80211Attr::parse(nla).context("failed to parse nl80211 attribute")?);
        }
        Ok(Nl80211Message { cmd: header.cmd.into(), attrs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlink_packet_core::{NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_REQUEST};
    use netlink_packet_generic::GenlMessage;

    #[test]
    fn serialize_and_deserialize_connect_request() {
        let message = Nl80211Message::new(
            Nl80211Cmd::Connect,
            vec![
                Nl80211Attr::Ifindex(3),
                Nl80211Attr::Ssid(b"Net".to_vec()),
                Nl80211Attr::Mac([2, 0, 0, 0, 0, 1]),
                Nl80211Attr::WiphyFreq(2412),
                Nl80211Attr::AuthType(crate::AUTH_TYPE_OPEN_SYSTEM),
            ],
        );
        let mut genl = GenlMessage::from_payload(message.clone());
        genl.set_resolved_family_id(0x1C);

        let mut header = NetlinkHeader::default();
        header.flags = NLM_F_REQUEST;
        header.sequence_number = 7;
        let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(genl));
        packet.finalize();

        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf[..]);

        let parsed = NetlinkMessage::<GenlMessage<Nl80211Message>>::deserialize(&buf[..])
            .expect("failed to deserialize message");
        assert_eq!(parsed.header.sequence_number, 7);
        match parsed.payload {
            NetlinkPayload::InnerMessage(genl) => assert_eq!(genl.payload, message),
            other => panic!("expected inner message, got {:?}", other),
        }
    }
}
