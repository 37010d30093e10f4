//! Authenticator side of the 4-Way Handshake, one instance per station.

use bytes::Bytes;
use failure::{bail, ensure};
use log::info;
use zeroize::Zeroize;

use super::{message_number, Config, MessageNumber};
use crate::key::exchange::{compute_mic, Key};
use crate::key::gtk::Gtk;
use crate::key::ptk::Ptk;
use crate::key_data::kde;
use crate::keywrap::keywrap_algorithm;
use crate::rsna::{
    derive_key_descriptor_version, Dot11VerifiedKeyFrame, NegotiatedProtection, SecAssocUpdate,
    UnverifiedKeyData, UpdateSink,
};
use crate::Error;

#[derive(Debug)]
enum State {
    Idle,
    AwaitingMsg2 { anonce: [u8; 32], krc: u64 },
    AwaitingMsg4 { ptk: Ptk, gtk: Gtk, krc: u64, msg3: eapol::KeyFrame },
    Completed { ptk: Ptk },
}

#[derive(Debug)]
pub struct Authenticator {
    cfg: Config,
    protection: NegotiatedProtection,
    pmk: Vec<u8>,
    state: State,
}

impl Authenticator {
    pub fn new(cfg: Config, pmk: Vec<u8>) -> Result<Authenticator, failure::Error> {
        ensure!(cfg.gtk_provider.is_some(), "authenticator requires a GTK provider");
        let protection = cfg.negotiated_protection();
        Ok(Authenticator { cfg, protection, pmk, state: State::Idle })
    }

    /// Sends message 1 carrying a fresh ANonce.
    pub fn initiate(
        &mut self,
        update_sink: &mut UpdateSink,
        key_replay_counter: u64,
    ) -> Result<(), failure::Error> {
        match self.state {
            State::Idle | State::AwaitingMsg2 { .. } => (),
            _ => bail!(Error::EstablishedSaRejectsUpdates),
        }
        let anonce = self.cfg.nonce_rdr.next();
        let msg1 = self.build_msg1(&anonce, key_replay_counter);
        update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg1));
        self.state = State::AwaitingMsg2 { anonce, krc: key_replay_counter };
        Ok(())
    }

    fn build_msg1(&self, anonce: &[u8; 32], krc: u64) -> eapol::KeyFrame {
        let mut key_info = eapol::KeyInformation(0);
        key_info.set_key_descriptor_version(derive_key_descriptor_version(&self.protection));
        key_info.set_key_type(1);
        key_info.set_key_ack(true);

        let tk_len = self.protection.pairwise.tk_bytes().unwrap_or(16) as u16;
        // The MIC bit is clear; the MIC field itself is still present, zeroed
        // at the AKM's MIC size.
        eapol::KeyFrame::new(
            eapol::ProtocolVersion::Ieee802dot1x2004,
            key_info,
            self.protection.mic_size,
            tk_len,
            krc,
            *anonce,
            vec![],
        )
    }

    pub fn on_eapol_key_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        key_replay_counter: u64,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        match message_number(frame.unsafe_get_raw())? {
            MessageNumber::Message2 => self.on_message_2(update_sink, key_replay_counter, frame),
            MessageNumber::Message4 => self.on_message_4(update_sink, frame),
            _ => bail!(Error::UnexpectedHandshakeMessage),
        }
    }

    fn on_message_2(
        &mut self,
        update_sink: &mut UpdateSink,
        _key_replay_counter: u64,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::AwaitingMsg2 { anonce, krc } => {
                let raw = frame.unsafe_get_raw();
                // Message 2 echoes message 1's replay counter.
                if raw.key_replay_counter != krc {
                    let err = Error::InvalidKeyReplayCounter(raw.key_replay_counter, krc);
                    self.state = State::AwaitingMsg2 { anonce, krc };
                    bail!(err);
                }
                let snonce = raw.key_nonce;
                let ptk = Ptk::new(
                    &self.pmk[..],
                    &self.cfg.a_addr,
                    &self.cfg.s_addr,
                    &anonce[..],
                    &snonce[..],
                    &self.protection.akm,
                    self.protection.pairwise.clone(),
                )?;

                if let Err(e) = self.validate_msg2(&ptk, frame) {
                    self.state = State::AwaitingMsg2 { anonce, krc };
                    return Err(e);
                }

                let gtk = {
                    let provider = self.cfg.gtk_provider.as_ref().expect("validated in new");
                    let guard = provider.lock().unwrap();
                    guard.get_gtk().clone()
                };
                // Message 3 advances the replay counter past message 1's.
                let next_krc = krc + 1;
                let msg3 = self.build_msg3(&ptk, &anonce, &gtk, next_krc)?;
                update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg3.clone()));
                self.state = State::AwaitingMsg4 { ptk, gtk, krc: next_krc, msg3 };
                Ok(())
            }
            State::AwaitingMsg4 { ptk, gtk, krc, msg3 } => {
                // Message 3 was lost; the station repeated message 2.
                info!("received retransmitted msg2 of 4-Way Handshake; resending msg3");
                let result = self.validate_msg2(&ptk, frame);
                self.state = State::AwaitingMsg4 { ptk, gtk, krc, msg3 };
                result?;
                if let State::AwaitingMsg4 { msg3, .. } = &self.state {
                    update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg3.clone()));
                }
                Ok(())
            }
            other => {
                self.state = other;
                bail!(Error::UnexpectedHandshakeMessage)
            }
        }
    }

    /// Verifies the MIC and that the station's RSNE is bit-exact equal to the
    /// one from its association request.
    fn validate_msg2(
        &self,
        ptk: &Ptk,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        let unverified = match frame {
            Dot11VerifiedKeyFrame::WithUnverifiedMic(mic_frame) => {
                mic_frame.verify_mic(ptk.kck(), &self.protection.akm)?
            }
            Dot11VerifiedKeyFrame::WithoutMic(_) => bail!(Error::UnexpectedHandshakeMessage),
        };
        let frame = match unverified {
            UnverifiedKeyData::NotEncrypted(frame) => frame,
            UnverifiedKeyData::Encrypted(_) => bail!(Error::UnexpectedHandshakeMessage),
        };
        let expected_rsne = self.cfg.s_rsne.to_bytes()?;
        ensure!(&frame.key_data[..] == &expected_rsne[..], Error::RsneMismatch);
        Ok(())
    }

    fn build_msg3(
        &self,
        ptk: &Ptk,
        anonce: &[u8; 32],
        gtk: &Gtk,
        krc: u64,
    ) -> Result<eapol::KeyFrame, failure::Error> {
        let mut plaintext = vec![];
        {
            let mut writer = kde::Writer::new(&mut plaintext);
            writer.write_rsne(&self.cfg.a_rsne)?;
            writer.write_gtk(&kde::Gtk::new(gtk.key_id(), kde::GtkInfoTx::BothRxTx, gtk.tk()))?;
        }
        let padded = kde::pad_for_encryption(plaintext);
        let key_data = keywrap_algorithm(&self.protection.akm)
            .ok_or(Error::UnsupportedAkmSuite)?
            .wrap(ptk.kek(), &padded[..])?;

        let mut key_info = eapol::KeyInformation(0);
        key_info.set_key_descriptor_version(derive_key_descriptor_version(&self.protection));
        key_info.set_key_type(1);
        key_info.set_key_ack(true);
        key_info.set_key_mic(true);
        key_info.set_install(true);
        key_info.set_secure(true);
        key_info.set_encrypted_key_data(true);

        let tk_len = self.protection.pairwise.tk_bytes().unwrap_or(16) as u16;
        let mut msg3 = eapol::KeyFrame::new(
            eapol::ProtocolVersion::Ieee802dot1x2004,
            key_info,
            self.protection.mic_size,
            tk_len,
            krc,
            *anonce,
            key_data,
        );
        msg3.key_rsc = gtk.rsc();
        msg3.update_packet_body_len();
        let mic = compute_mic(ptk.kck(), &self.protection.akm, &msg3)?;
        msg3.key_mic = Bytes::from(mic);
        Ok(msg3)
    }

    fn on_message_4(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::AwaitingMsg4 { ptk, gtk, krc, msg3 } => {
                let raw = frame.unsafe_get_raw();
                if raw.key_replay_counter != krc {
                    let err = Error::InvalidKeyReplayCounter(raw.key_replay_counter, krc);
                    self.state = State::AwaitingMsg4 { ptk, gtk, krc, msg3 };
                    bail!(err);
                }
                match frame {
                    Dot11VerifiedKeyFrame::WithUnverifiedMic(mic_frame) => {
                        match mic_frame.verify_mic(ptk.kck(), &self.protection.akm) {
                            Ok(_) => (),
                            Err(e) => {
                                self.state = State::AwaitingMsg4 { ptk, gtk, krc, msg3 };
                                return Err(e);
                            }
                        }
                    }
                    Dot11VerifiedKeyFrame::WithoutMic(_) => {
                        self.state = State::AwaitingMsg4 { ptk, gtk, krc, msg3 };
                        bail!(Error::UnexpectedHandshakeMessage)
                    }
                }
                update_sink.push(SecAssocUpdate::Key(Key::Ptk(ptk.clone())));
                update_sink.push(SecAssocUpdate::Key(Key::Gtk(gtk)));
                self.state = State::Completed { ptk };
                Ok(())
            }
            State::Completed { ptk } => {
                // Duplicate message 4; the PTK is already reported.
                self.state = State::Completed { ptk };
                Ok(())
            }
            other => {
                self.state = other;
                bail!(Error::UnexpectedHandshakeMessage)
            }
        }
    }
}

impl Drop for Authenticator {
    fn drop(&mut self) {
        self.pmk.zeroize();
        match &mut self.state {
            State::AwaitingMsg2 { anonce, .. } => anonce.zeroize(),
            _ => (),
        }
    }
}
