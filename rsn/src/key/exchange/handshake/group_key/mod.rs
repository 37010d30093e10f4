//! Group Key Handshake, IEEE Std 802.11-2016, 12.7.7.

use bytes::Bytes;
use failure::{bail, ensure};

use crate::key::exchange::{compute_mic, Key};
use crate::key::gtk::Gtk;
use crate::key::igtk::Igtk;
use crate::key::ptk::Ptk;
use crate::key_data::{self, kde, Element};
use crate::keywrap::keywrap_algorithm;
use crate::rsna::{
    derive_key_descriptor_version, Dot11VerifiedKeyFrame, NegotiatedProtection, Role,
    SecAssocUpdate, UnverifiedKeyData, UpdateSink,
};
use crate::Error;

#[derive(Debug)]
pub struct Config {
    pub role: Role,
    pub protection: NegotiatedProtection,
}

/// Distributes (authenticator) or accepts (supplicant) a new GTK under the
/// protection of an established PTKSA.
#[derive(Debug)]
pub struct GroupKey {
    cfg: Config,
    ptk: Ptk,
    /// Pending GTK while the authenticator waits for the acknowledgement.
    pending_gtk: Option<Gtk>,
    /// Replay counter and response of the last accepted message 1, kept for
    /// idempotent handling of retransmissions.
    last_krc: Option<u64>,
    last_msg2: Option<eapol::KeyFrame>,
}

impl GroupKey {
    pub fn new(cfg: Config, ptk: Ptk) -> Result<GroupKey, failure::Error> {
        Ok(GroupKey { cfg, ptk, pending_gtk: None, last_krc: None, last_msg2: None })
    }

    /// Authenticator: sends message 1 wrapping the new GTK.
    pub fn initiate_with_gtk(
        &mut self,
        update_sink: &mut UpdateSink,
        key_replay_counter: u64,
        gtk: Gtk,
    ) -> Result<(), failure::Error> {
        ensure!(self.cfg.role == Role::Authenticator, Error::UnexpectedHandshakeMessage);
        let msg1 = self.build_msg1(key_replay_counter, &gtk)?;
        update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg1));
        self.pending_gtk = Some(gtk);
        Ok(())
    }

    pub fn on_eapol_key_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        key_replay_counter: u64,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        match self.cfg.role {
            Role::Supplicant => self.on_message_1(update_sink, key_replay_counter, frame),
            Role::Authenticator => self.on_message_2(update_sink, frame),
        }
    }

    fn on_message_1(
        &mut self,
        update_sink: &mut UpdateSink,
        key_replay_counter: u64,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        let krc = frame.unsafe_get_raw().key_replay_counter;
        match self.last_krc {
            // A retransmission is acknowledged again; the GTK is not
            // reinstalled.
            Some(last) if krc == last => {
                if let Some(msg2) = &self.last_msg2 {
                    update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg2.clone()));
                }
                return Ok(());
            }
            _ if krc <= key_replay_counter => {
                bail!(Error::InvalidKeyReplayCounter(krc, key_replay_counter))
            }
            _ => (),
        }

        let unverified = match frame {
            Dot11VerifiedKeyFrame::WithUnverifiedMic(mic_frame) => {
                mic_frame.verify_mic(self.ptk.kck(), &self.cfg.protection.akm)?
            }
            Dot11VerifiedKeyFrame::WithoutMic(_) => bail!(Error::UnexpectedHandshakeMessage),
        };
        let (frame, key_data) = match unverified {
            UnverifiedKeyData::Encrypted(encrypted) => {
                encrypted.decrypt(self.ptk.kek(), &self.cfg.protection.akm)?
            }
            // IEEE Std 802.11-2016, 12.7.7.2: key data is always encrypted.
            UnverifiedKeyData::NotEncrypted(_) => bail!(Error::UnexpectedHandshakeMessage),
        };
        ensure!(frame.key_info.key_ack(), Error::UnexpectedHandshakeMessage);
        ensure!(frame.key_info.secure(), Error::UnexpectedHandshakeMessage);

        let mut gtk: Option<Gtk> = None;
        let mut igtk: Option<Igtk> = None;
        for element in key_data::extract_elements(&key_data[..])? {
            match element {
                Element::Gtk(gtk_kde) => {
                    gtk = Some(Gtk::from_gtk(
                        gtk_kde.gtk().to_vec(),
                        gtk_kde.key_id(),
                        self.cfg.protection.group_data.clone(),
                        frame.key_rsc,
                    )?);
                }
                Element::Igtk(igtk_kde) => {
                    let cipher = self.cfg.protection.group_mgmt.clone().unwrap_or(
                        wifi_common::ie::rsn::cipher::Cipher::new_dot11(
                            wifi_common::ie::rsn::cipher::BIP_CMAC_128,
                        ),
                    );
                    igtk = Some(Igtk::from_kde(&igtk_kde.payload[..], cipher)?);
                }
                _ => (),
            }
        }
        let gtk = gtk.ok_or(Error::MissingGtk)?;

        let msg2 = self.build_msg2(&frame)?;
        update_sink.push(SecAssocUpdate::TxEapolKeyFrame(msg2.clone()));
        update_sink.push(SecAssocUpdate::Key(Key::Gtk(gtk)));
        if let Some(igtk) = igtk {
            update_sink.push(SecAssocUpdate::Key(Key::Igtk(igtk)));
        }
        self.last_krc = Some(krc);
        self.last_msg2 = Some(msg2);
        Ok(())
    }

    fn on_message_2(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: Dot11VerifiedKeyFrame,
    ) -> Result<(), failure::Error> {
        match frame {
            Dot11VerifiedKeyFrame::WithUnverifiedMic(mic_frame) => {
                mic_frame.verify_mic(self.ptk.kck(), &self.cfg.protection.akm)?;
            }
            Dot11VerifiedKeyFrame::WithoutMic(_) => bail!(Error::UnexpectedHandshakeMessage),
        }
        match self.pending_gtk.take() {
            Some(gtk) => {
                update_sink.push(SecAssocUpdate::Key(Key::Gtk(gtk)));
                Ok(())
            }
            None => bail!(Error::UnexpectedHandshakeMessage),
        }
    }

    fn build_msg1(&self, krc: u64, gtk: &Gtk) -> Result<eapol::KeyFrame, failure::Error> {
        let mut plaintext = vec![];
        {
            let mut writer = kde::Writer::new(&mut plaintext);
            writer.write_gtk(&kde::Gtk::new(gtk.key_id(), kde::GtkInfoTx::BothRxTx, gtk.tk()))?;
        }
        let padded = kde::pad_for_encryption(plaintext);
        let key_data = keywrap_algorithm(&self.cfg.protection.akm)
            .ok_or(Error::UnsupportedAkmSuite)?
            .wrap(self.ptk.kek(), &padded[..])?;

        let mut key_info = eapol::KeyInformation(0);
        key_info.set_key_descriptor_version(derive_key_descriptor_version(&self.cfg.protection));
        key_info.set_key_ack(true);
        key_info.set_key_mic(true);
        key_info.set_secure(true);
        key_info.set_encrypted_key_data(true);

        let mut msg1 = eapol::KeyFrame::new(
            eapol::ProtocolVersion::Ieee802dot1x2004,
            key_info,
            self.cfg.protection.mic_size,
            0,
            krc,
            [0u8; 32],
            key_data,
        );
        msg1.key_rsc = gtk.rsc();
        let mic = compute_mic(self.ptk.kck(), &self.cfg.protection.akm, &msg1)?;
        msg1.key_mic = Bytes::from(mic);
        Ok(msg1)
    }

    fn build_msg2(&self, msg1: &eapol::KeyFrame) -> Result<eapol::KeyFrame, failure::Error> {
        let mut key_info = eapol::KeyInformation(0);
        key_info.set_key_descriptor_version(derive_key_descriptor_version(&self.cfg.protection));
        key_info.set_key_mic(true);
        key_info.set_secure(true);

        let mut msg2 = eapol::KeyFrame::new(
            eapol::ProtocolVersion::Ieee802dot1x2004,
            key_info,
            self.cfg.protection.mic_size,
            0,
            msg1.key_replay_counter,
            [0u8; 32],
            vec![],
        );
        let mic = compute_mic(self.ptk.kck(), &self.cfg.protection.akm, &msg2)?;
        msg2.key_mic = Bytes::from(mic);
        Ok(msg2)
    }
}
