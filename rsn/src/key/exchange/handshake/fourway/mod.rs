//! The 4-Way Handshake, IEEE Std 802.11-2016, 12.7.6.

mod authenticator;
mod supplicant;

use failure::ensure;
use std::sync::{Arc, Mutex};

use wifi_common::ie::rsn::rsne::Rsne;
use wifi_common::MacAddr;

use crate::crypto_utils::nonce::NonceReader;
use crate::key::gtk::GtkProvider;
use crate::rsna::{Dot11VerifiedKeyFrame, NegotiatedProtection, Role, UpdateSink};
use crate::Error;

/// Message position within the exchange, derived from the key info bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageNumber {
    Message1,
    Message2,
    Message3,
    Message4,
}

/// IEEE Std 802.11-2016, 12.7.6.2-5: ack and MIC identify messages from the
/// authenticator; the secure bit separates message 2 from message 4.
pub fn message_number(frame: &eapol::KeyFrame) -> Result<MessageNumber, Error> {
    let info = &frame.key_info;
    match (info.key_ack(), info.key_mic(), info.install()) {
        (true, false, false) => Ok(MessageNumber::Message1),
        (true, true, true) => Ok(MessageNumber::Message3),
        (false, true, false) => {
            if info.secure() {
                Ok(MessageNumber::Message4)
            } else {
                Ok(MessageNumber::Message2)
            }
        }
        _ => Err(Error::UnexpectedHandshakeMessage),
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub role: Role,
    pub s_addr: MacAddr,
    pub s_rsne: Rsne,
    pub a_addr: MacAddr,
    pub a_rsne: Rsne,
    pub nonce_rdr: NonceReader,
    pub gtk_provider: Option<Arc<Mutex<GtkProvider>>>,
}

impl Config {
    pub fn new(
        role: Role,
        s_addr: MacAddr,
        s_rsne: Rsne,
        a_addr: MacAddr,
        a_rsne: Rsne,
        nonce_rdr: NonceReader,
        gtk_provider: Option<Arc<Mutex<GtkProvider>>>,
    ) -> Result<Config, failure::Error> {
        // The supplicant's RSNE names the negotiated protection; it must be
        // valid for either role.
        let _ = NegotiatedProtection::from_rsne(&s_rsne)?;
        if let Role::Authenticator = role {
            ensure!(gtk_provider.is_some(), "authenticator requires a GTK provider");
        }
        Ok(Config { role, s_addr, s_rsne, a_addr, a_rsne, nonce_rdr, gtk_provider })
    }

    pub fn negotiated_protection(&self) -> NegotiatedProtection {
        // Validated in the constructor.
        NegotiatedProtection::from_rsne(&self.s_rsne).expect("negotiated protection was validated")
    }
}

#[derive(Debug)]
pub enum Fourway {
    Authenticator(authenticator::Authenticator),
    Supplicant(supplicant::Supplicant),
}

impl Fourway {
    pub fn new(cfg: Config, pmk: Vec<u8>) -> Result<Fourway, failure::Error> {
        Ok(match cfg.role {
            Role::Supplicant => Fourway::Supplicant(supplicant::Supplicant::new(cfg, pmk)?),
            Role::Authenticator => Fourway::Authenticator(authenticator::Authenticator::new(cfg, pmk)?),
        })
    }

    /// Emits message 1; a no-op for the supplicant side.
    pub fn initiate(
        &mut self,
        update_sink: &mut UpdateSink,
        key_replay_counter: u64,
    ) -> Result<(), failure::Error> {
        match self {
            Fourway::Authenticator(hs) => hs.initiate(update_sink, key_replay_counter),
            Fourway::Supplicant(_) => Ok(()),
        }
    }

    pub fn on_eapol_key_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        key_replay_counter: u64,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        match self {
            Fourway::Authenticator(hs) => {
                hs.on_eapol_key_frame(update_sink, key_replay_counter, frame)
            }
            Fourway::Supplicant(hs) => hs.on_eapol_key_frame(update_sink, frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_info(value: u16) -> eapol::KeyFrame {
        eapol::KeyFrame::new(
            eapol::ProtocolVersion::Ieee802dot1x2004,
            eapol::KeyInformation(value),
            16,
            0,
            1,
            [0u8; 32],
            vec![],
        )
    }

    #[test]
    fn classify_messages() {
        // 0x008a: version 2, pairwise, ack
        assert_eq!(message_number(&frame_with_info(0x008a)).unwrap(), MessageNumber::Message1);
        // 0x010a: version 2, pairwise, mic
        assert_eq!(message_number(&frame_with_info(0x010a)).unwrap(), MessageNumber::Message2);
        // 0x13ca: version 2, pairwise, install, ack, mic, secure, encrypted
        assert_eq!(message_number(&frame_with_info(0x13ca)).unwrap(), MessageNumber::Message3);
        // 0x030a: version 2, pairwise, mic, secure
        assert_eq!(message_number(&frame_with_info(0x030a)).unwrap(), MessageNumber::Message4);
    }

    #[test]
    fn reject_contradictory_bits() {
        // install without ack
        assert!(message_number(&frame_with_info(0x0148)).is_err());
    }
}
