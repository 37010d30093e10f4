//! Supplicant side of the 4-Way Handshake.

use bytes::Bytes;
use failure::bail;
use log::info;
use zeroize::Zeroize;

use super::{message_number, Config, MessageNumber};
use crate::key::exchange::{compute_mic, Key};
use crate::key::gtk::Gtk;
use crate::key::igtk::Igtk;
use crate::key::ptk::Ptk;
use crate::key_data::{self, Element};
use crate::rsna::{
    ap_ie_matches, derive_key_descriptor_version, Dot11VerifiedKeyFrame, NegotiatedProtection,
    SecAssocUpdate, UnverifiedKeyData, UpdateSink,
};
use crate::Error;

#[derive(Debug)]
enum State {
    AwaitingMsg1,
    AwaitingMsg3 { ptk: Ptk, anonce: [u8; 32], last_krc: u64, msg2: eapol::KeyFrame },
    Completed { ptk: Ptk, anonce: [u8; 32], last_krc: u64, msg4: eapol::KeyFrame },
}

#[derive(Debug)]
pub struct Supplicant {
    cfg: Config,
    protection: NegotiatedProtection,
    pmk: Vec<u8>,
    state: State,
}

impl Supplicant {
    pub fn new(cfg: Config, pmk: Vec<u8>) -> Result<Supplicant, failure::Error> {
        let protection = cfg.negotiated_protection();
        Ok(Supplicant { cfg, protection, pmk, state: State::AwaitingMsg1 })
    }

    pub fn on_eapol_key_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        match message_number(frame.unsafe_get_raw())? {
            MessageNumber::Message1 => self.on_message_1(update_sink, frame),
            MessageNumber::Message3 => self.on_message_3(update_sink, frame),
            _ => bail!(Error::UnexpectedHandshakeMessage),
        }
    }

    fn on_message_1(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        // Message 1 carries no MIC.
        let frame = match frame {
            Dot11VerifiedKeyFrame::WithoutMic(frame) => frame,
            Dot11VerifiedKeyFrame::WithUnverifiedMic(_) => {
                bail!(Error::UnexpectedHandshakeMessage)
            }
        };
        let krc = frame.key_replay_counter;

        match &self.state {
            State::AwaitingMsg3 { last_krc, msg2, .. } if krc == *last_krc => {
                // Retransmitted message 1; answer without deriving new keys.
                update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg2.clone()));
                return Ok(());
            }
            State::AwaitingMsg3 { last_krc, .. } | State::Completed { last_krc, .. }
                if krc < *last_krc =>
            {
                bail!(Error::InvalidKeyReplayCounter(krc, *last_krc))
            }
            _ => (),
        }

        // A fresh message 1: new handshake attempt, possibly a rekey.
        let anonce = frame.key_nonce;
        let snonce = self.cfg.nonce_rdr.next();
        let ptk = Ptk::new(
            &self.pmk[..],
            &self.cfg.a_addr,
            &self.cfg.s_addr,
            &anonce[..],
            &snonce[..],
            &self.protection.akm,
            self.protection.pairwise.clone(),
        )?;

        let msg2 = self.build_msg2(&ptk, &frame, snonce)?;
        update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg2.clone()));
        self.state = State::AwaitingMsg3 { ptk, anonce, last_krc: krc, msg2 };
        Ok(())
    }

    fn build_msg2(
        &self,
        ptk: &Ptk,
        msg1: &eapol::KeyFrame,
        snonce: [u8; 32],
    ) -> Result<eapol::KeyFrame, failure::Error> {
        let mut key_info = eapol::KeyInformation(0);
        key_info.set_key_descriptor_version(derive_key_descriptor_version(&self.protection));
        key_info.set_key_type(1);
        key_info.set_key_mic(true);

        let key_data = self.cfg.s_rsne.to_bytes()?;
        let mut msg2 = eapol::KeyFrame::new(
            protocol_version(msg1.version),
            key_info,
            self.protection.mic_size,
            0, // IEEE Std 802.11-2016, 12.7.6.3: length zeroed by the supplicant
            msg1.key_replay_counter,
            snonce,
            key_data,
        );
        let mic = compute_mic(ptk.kck(), &self.protection.akm, &msg2)?;
        msg2.key_mic = Bytes::from(mic);
        Ok(msg2)
    }

    fn on_message_3(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        let krc = frame.unsafe_get_raw().key_replay_counter;

        // Take the state to move the PTK through verification; it is restored
        // on every path.
        let state = std::mem::replace(&mut self.state, State::AwaitingMsg1);
        match state {
            State::AwaitingMsg1 => bail!(Error::UnexpectedHandshakeMessage),
            State::AwaitingMsg3 { ptk, anonce, last_krc, msg2 } => {
                if krc <= last_krc {
                    self.state = State::AwaitingMsg3 { ptk, anonce, last_krc, msg2 };
                    bail!(Error::InvalidKeyReplayCounter(krc, last_krc));
                }
                match self.process_msg3(update_sink, frame, &ptk, &anonce, true) {
                    Ok(msg4) => {
                        update_sink.push(SecAssocUpdate::Key(Key::Ptk(ptk.clone())));
                        self.state = State::Completed { ptk, anonce, last_krc: krc, msg4 };
                        Ok(())
                    }
                    Err(e) => {
                        self.state = State::AwaitingMsg3 { ptk, anonce, last_krc, msg2 };
                        Err(e)
                    }
                }
            }
            State::Completed { ptk, anonce, last_krc, msg4 } => {
                if krc == last_krc {
                    // Retransmitted message 3: answer idempotently. Keys are
                    // deliberately not reported again, which prevents nonce
                    // reinstallation.
                    info!("received retransmitted msg3 of 4-Way Handshake; resending msg4");
                    update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg4.clone()));
                    self.state = State::Completed { ptk, anonce, last_krc, msg4 };
                    return Ok(());
                }
                if krc < last_krc {
                    self.state = State::Completed { ptk, anonce, last_krc, msg4 };
                    bail!(Error::InvalidKeyReplayCounter(krc, last_krc));
                }
                // The authenticator retransmitted message 3 under a new
                // replay counter. Respond, but again do not reinstall keys.
                match self.process_msg3(update_sink, frame, &ptk, &anonce, false) {
                    Ok(msg4) => {
                        self.state = State::Completed { ptk, anonce, last_krc: krc, msg4 };
                        Ok(())
                    }
                    Err(e) => {
                        self.state = State::Completed { ptk, anonce, last_krc, msg4 };
                        Err(e)
                    }
                }
            }
        }
    }

    /// Verifies message 3 and emits message 4. When `report_keys` is set the
    /// decrypted GTK (and IGTK, if present) are pushed into the sink.
    fn process_msg3(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: Dot11VerifiedKeyFrame,
        ptk: &Ptk,
        anonce: &[u8; 32],
        report_keys: bool,
    ) -> Result<eapol::KeyFrame, failure::Error> {
        let unverified = match frame {
            Dot11VerifiedKeyFrame::WithUnverifiedMic(mic_frame) => {
                mic_frame.verify_mic(ptk.kck(), &self.protection.akm)?
            }
            Dot11VerifiedKeyFrame::WithoutMic(_) => bail!(Error::UnexpectedHandshakeMessage),
        };
        let (frame, key_data) = match unverified {
            UnverifiedKeyData::Encrypted(encrypted) => {
                encrypted.decrypt(ptk.kek(), &self.protection.akm)?
            }
            // IEEE Std 802.11-2016, 12.7.6.4: message 3 encrypts its key data.
            UnverifiedKeyData::NotEncrypted(_) => bail!(Error::UnexpectedHandshakeMessage),
        };

        if &frame.key_nonce != anonce {
            bail!(Error::InvalidNonce);
        }

        let mut gtk: Option<Gtk> = None;
        let mut igtk: Option<Igtk> = None;
        let mut rsne_seen = false;
        for element in key_data::extract_elements(&key_data[..])? {
            match element {
                Element::Rsne(rsne) => {
                    // The AP's RSNE must match its advertisement; only the
                    // PMKID list may differ.
                    if !ap_ie_matches(&rsne, &self.cfg.a_rsne) {
                        bail!(Error::RsneMismatch);
                    }
                    rsne_seen = true;
                }
                Element::Gtk(gtk_kde) => {
                    gtk = Some(Gtk::from_gtk(
                        gtk_kde.gtk().to_vec(),
                        gtk_kde.key_id(),
                        self.protection.group_data.clone(),
                        frame.key_rsc,
                    )?);
                }
                Element::Igtk(igtk_kde) => {
                    let cipher = self
                        .protection
                        .group_mgmt
                        .clone()
                        .unwrap_or(wifi_common::ie::rsn::cipher::Cipher::new_dot11(
                            wifi_common::ie::rsn::cipher::BIP_CMAC_128,
                        ));
                    igtk = Some(Igtk::from_kde(&igtk_kde.payload[..], cipher)?);
                }
                _ => (),
            }
        }
        if !rsne_seen {
            bail!(Error::RsneMismatch);
        }
        let gtk = gtk.ok_or(Error::MissingGtk)?;

        let msg4 = self.build_msg4(ptk, &frame)?;
        update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg4.clone()));
        if report_keys {
            update_sink.push(SecAssocUpdate::Key(Key::Gtk(gtk)));
            if let Some(igtk) = igtk {
                update_sink.push(SecAssocUpdate::Key(Key::Igtk(igtk)));
            }
        }
        Ok(msg4)
    }

    fn build_msg4(
        &self,
        ptk: &Ptk,
        msg3: &eapol::KeyFrame,
    ) -> Result<eapol::KeyFrame, failure::Error> {
        let mut key_info = eapol::KeyInformation(0);
        key_info.set_key_descriptor_version(derive_key_descriptor_version(&self.protection));
        key_info.set_key_type(1);
        key_info.set_key_mic(true);
        key_info.set_secure(true);

        let mut msg4 = eapol::KeyFrame::new(
            protocol_version(msg3.version),
            key_info,
            self.protection.mic_size,
            0,
            msg3.key_replay_counter,
            [0u8; 32],
            vec![],
        );
        let mic = compute_mic(ptk.kck(), &self.protection.akm, &msg4)?;
        msg4.key_mic = Bytes::from(mic);
        Ok(msg4)
    }
}

impl Drop for Supplicant {
    fn drop(&mut self) {
        self.pmk.zeroize();
        match &mut self.state {
            State::AwaitingMsg3 { anonce, .. } | State::Completed { anonce, .. } => {
                anonce.zeroize()
            }
            State::AwaitingMsg1 => (),
        }
    }
}

fn protocol_version(version: u8) -> eapol::ProtocolVersion {
    match version {
        1 => eapol::ProtocolVersion::Ieee802dot1x2001,
        3 => eapol::ProtocolVersion::Ieee802dot1x2010,
        _ => eapol::ProtocolVersion::Ieee802dot1x2004,
    }
}
