//! The ESS security association: owns the PTKSA and GTKSA of one
//! (supplicant, authenticator) pair and drives their handshakes.

use failure::bail;
use log::{debug, error};
use std::sync::{Arc, Mutex};
use zeroize::Zeroize;

use crate::key::exchange::handshake::fourway::{self, Fourway};
use crate::key::exchange::handshake::group_key::{self, GroupKey};
use crate::key::exchange::Key;
use crate::key::gtk::GtkProvider;
use crate::key::ptk::Ptk;
use crate::rsna::{
    Dot11VerifiedKeyFrame, NegotiatedProtection, Role, SecAssocStatus, SecAssocUpdate, UpdateSink,
};
use crate::Error;

#[derive(Debug)]
pub struct EssSa {
    role: Role,
    pub negotiated_protection: NegotiatedProtection,
    pmk: Vec<u8>,
    gtk_provider: Option<Arc<Mutex<GtkProvider>>>,

    fourway_cfg: fourway::Config,
    fourway: Fourway,
    group_key: Option<GroupKey>,

    // The authenticator's transmit counter, or the highest counter the
    // supplicant accepted a key-installing message under.
    key_replay_counter: u64,
    ptk: Option<Ptk>,
    gtk_installed: bool,
    established: bool,
}

impl EssSa {
    pub fn new(
        role: Role,
        negotiated_protection: NegotiatedProtection,
        pmk: Vec<u8>,
        fourway_cfg: fourway::Config,
    ) -> Result<EssSa, failure::Error> {
        let gtk_provider = fourway_cfg.gtk_provider.clone();
        let fourway = Fourway::new(fourway_cfg.clone(), pmk.clone())?;
        Ok(EssSa {
            role,
            negotiated_protection,
            pmk,
            gtk_provider,
            fourway_cfg,
            fourway,
            group_key: None,
            key_replay_counter: 0,
            ptk: None,
            gtk_installed: false,
            established: false,
        })
    }

    /// Starts the 4-Way Handshake (authenticator role only).
    pub fn initiate(&mut self, update_sink: &mut UpdateSink) -> Result<(), failure::Error> {
        if self.established {
            bail!(Error::EstablishedSaRejectsUpdates);
        }
        if let Role::Authenticator = self.role {
            self.key_replay_counter += 1;
            self.fourway.initiate(update_sink, self.key_replay_counter)?;
        }
        Ok(())
    }

    /// Distributes the GTK provider's current group key to this station.
    pub fn initiate_group_rekey(
        &mut self,
        update_sink: &mut UpdateSink,
    ) -> Result<(), failure::Error> {
        if !self.established {
            bail!(Error::UnexpectedHandshakeMessage);
        }
        let gtk = match &self.gtk_provider {
            Some(provider) => provider.lock().unwrap().get_gtk().clone(),
            None => bail!(Error::UnexpectedHandshakeMessage),
        };
        self.key_replay_counter += 1;
        let key_replay_counter = self.key_replay_counter;
        let group_key = self.group_key_method()?;
        group_key.initiate_with_gtk(update_sink, key_replay_counter, gtk)
    }

    pub fn reset(&mut self) {
        debug!("resetting ESS-SA");
        match Fourway::new(self.fourway_cfg.clone(), self.pmk.clone()) {
            Ok(fourway) => self.fourway = fourway,
            Err(e) => error!("failed to reset 4-Way Handshake: {}", e),
        }
        self.group_key = None;
        self.key_replay_counter = 0;
        self.ptk = None;
        self.gtk_installed = false;
        self.established = false;
    }

    /// Installs an externally derived PTK, e.g. from the FT key hierarchy,
    /// and marks the association established. Once installed, the
    /// association is frozen: `initiate` is rejected until `reset`.
    pub fn install_ptk(&mut self, ptk: Ptk) {
        self.ptk = Some(ptk);
        self.gtk_installed = true;
        self.established = true;
    }

    /// Kernel-offloaded rekeying moved the replay counter forward.
    pub fn update_key_replay_counter(&mut self, key_replay_counter: u64) {
        if key_replay_counter > self.key_replay_counter {
            self.key_replay_counter = key_replay_counter;
        }
    }

    pub fn on_eapol_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: &eapol::Frame,
    ) -> Result<(), failure::Error> {
        let key_frame = match frame {
            eapol::Frame::Key(key_frame) => key_frame.clone(),
            eapol::Frame::Eap(_) => bail!(Error::UnexpectedHandshakeMessage),
        };
        let frame_krc = key_frame.key_replay_counter;
        let is_pairwise = key_frame.key_info.key_type() == eapol::KEY_TYPE_PAIRWISE;

        // Replay enforcement happens inside the handshake state machines:
        // they must tell a retransmission from a replay so the former can be
        // answered idempotently. The 12.7.2 d) check is therefore disarmed
        // here by passing a zero counter.
        let verified = Dot11VerifiedKeyFrame::from_frame(
            key_frame,
            &self.role,
            &self.negotiated_protection,
            0,
        )?;

        let update_start = update_sink.len();
        if is_pairwise {
            let krc = self.key_replay_counter;
            self.fourway.on_eapol_key_frame(update_sink, krc, verified)?;
        } else {
            let krc = self.key_replay_counter;
            self.group_key_method()?.on_eapol_key_frame(update_sink, krc, verified)?;
        }

        // Track reported keys to detect establishment, and keep the replay
        // counter in sync with frames this side transmitted.
        for update in update_sink[update_start..].iter() {
            match update {
                SecAssocUpdate::Key(Key::Ptk(ptk)) => self.ptk = Some(ptk.clone()),
                SecAssocUpdate::Key(Key::Gtk(..)) => self.gtk_installed = true,
                SecAssocUpdate::TxEapolKeyFrame(frame) => {
                    if let Role::Authenticator = self.role {
                        if frame.key_replay_counter > self.key_replay_counter {
                            self.key_replay_counter = frame.key_replay_counter;
                        }
                    }
                }
                _ => (),
            }
        }

        if let Role::Supplicant = self.role {
            if frame_krc > self.key_replay_counter {
                self.key_replay_counter = frame_krc;
            }
        }

        if !self.established && self.ptk.is_some() && self.gtk_installed {
            self.established = true;
            debug!("ESS-SA established");
            update_sink.push(SecAssocUpdate::Status(SecAssocStatus::EssSaEstablished));
        }
        Ok(())
    }

    fn group_key_method(&mut self) -> Result<&mut GroupKey, failure::Error> {
        if self.group_key.is_none() {
            let ptk = match &self.ptk {
                Some(ptk) => ptk.clone(),
                None => bail!(Error::UnexpectedHandshakeMessage),
            };
            let cfg = group_key::Config {
                role: self.role,
                protection: self.negotiated_protection.clone(),
            };
            self.group_key = Some(GroupKey::new(cfg, ptk)?);
        }
        Ok(self.group_key.as_mut().expect("just initialized"))
    }
}

impl Drop for EssSa {
    fn drop(&mut self) {
        self.pmk.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use crate::rsna::test_util::{self, *};
    use crate::rsna::SecAssocStatus;
    use wifi_common::ie::rsn::cipher;
    use wifi_common::ie::rsn::rsne::Rsne;
    use wifi_common::ie::rsn::suite_selector::OUI;

    #[test]
    fn full_handshake_establishes_matching_keys() {
        let mut supplicant = get_supplicant();
        let (mut authenticator, _gtk_provider) = get_authenticator();

        let mut a_sink = vec![];
        authenticator.initiate(&mut a_sink).expect("authenticator failed initiating");
        let msg1 = expect_eapol_resp(&a_sink[..]);

        let mut s_sink = vec![];
        supplicant
            .on_eapol_frame(&mut s_sink, &eapol::Frame::Key(msg1))
            .expect("supplicant failed processing msg1");
        let msg2 = expect_eapol_resp(&s_sink[..]);

        let mut a_sink = vec![];
        authenticator
            .on_eapol_frame(&mut a_sink, &eapol::Frame::Key(msg2))
            .expect("authenticator failed processing msg2");
        let msg3 = expect_eapol_resp(&a_sink[..]);

        let mut s_sink = vec![];
        supplicant
            .on_eapol_frame(&mut s_sink, &eapol::Frame::Key(msg3))
            .expect("supplicant failed processing msg3");
        let msg4 = expect_eapol_resp(&s_sink[..]);
        let s_ptk = expect_reported_ptk(&s_sink[..]);
        let s_gtk = expect_reported_gtk(&s_sink[..]);
        assert_eq!(get_reported_status(&s_sink[..]), Some(SecAssocStatus::EssSaEstablished));

        let mut a_sink = vec![];
        authenticator
            .on_eapol_frame(&mut a_sink, &eapol::Frame::Key(msg4))
            .expect("authenticator failed processing msg4");
        let a_ptk = expect_reported_ptk(&a_sink[..]);
        let a_gtk = expect_reported_gtk(&a_sink[..]);
        assert_eq!(get_reported_status(&a_sink[..]), Some(SecAssocStatus::EssSaEstablished));

        assert_eq!(s_ptk, a_ptk);
        assert_eq!(s_gtk.tk(), a_gtk.tk());
    }

    #[test]
    fn msg2_carries_snonce_and_supplicant_rsne() {
        let mut supplicant = get_supplicant();
        let msg1 = get_4whs_msg1(&[0xAA; 32], 1);

        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(msg1))
            .expect("supplicant failed processing msg1");
        let msg2 = expect_eapol_resp(&sink[..]);
        assert_ne!(&msg2.key_nonce[..], &[0u8; 32][..]);
        assert_eq!(msg2.key_replay_counter, 1);
        assert_eq!(
            &msg2.key_data[..],
            &get_s_rsne().to_bytes().expect("failed writing RSNE")[..]
        );
        // No keys may be installed before message 3 verified.
        assert!(get_reported_ptk(&sink[..]).is_none());
    }

    #[test]
    fn retransmitted_msg3_is_answered_without_reinstalling_keys() {
        let mut supplicant = get_supplicant();
        let anonce = [0xAA; 32];
        let gtk_bytes = [0xCD; 16];

        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(get_4whs_msg1(&anonce, 41)))
            .expect("supplicant failed processing msg1");
        let msg2 = expect_eapol_resp(&sink[..]);
        let ptk = get_ptk(&anonce[..], &msg2.key_nonce[..]);

        let msg3 = get_4whs_msg3(&ptk, &anonce, &gtk_bytes[..], None, 42);
        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(msg3.clone()))
            .expect("supplicant failed processing msg3");
        let first_msg4 = expect_eapol_resp(&sink[..]);
        assert!(get_reported_ptk(&sink[..]).is_some());
        assert!(get_reported_gtk(&sink[..]).is_some());

        // Same replay counter again: message 4 is retransmitted but neither
        // the PTK nor the GTK are reported a second time.
        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(msg3))
            .expect("supplicant failed processing retransmitted msg3");
        let second_msg4 = expect_eapol_resp(&sink[..]);
        assert_eq!(first_msg4, second_msg4);
        assert!(get_reported_ptk(&sink[..]).is_none());
        assert!(get_reported_gtk(&sink[..]).is_none());
    }

    #[test]
    fn msg3_with_mismatching_rsne_is_rejected() {
        let mut supplicant = get_supplicant();
        let anonce = [0xAA; 32];

        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(get_4whs_msg1(&anonce, 1)))
            .expect("supplicant failed processing msg1");
        let msg2 = expect_eapol_resp(&sink[..]);
        let ptk = get_ptk(&anonce[..], &msg2.key_nonce[..]);

        // Beacon advertised CCMP-128; message 3 claims TKIP.
        let mut tkip_rsne = Rsne::new();
        tkip_rsne.group_data_cipher_suite =
            Some(wifi_common::ie::rsn::cipher::Cipher { oui: OUI, suite_type: cipher::CCMP_128 });
        tkip_rsne.pairwise_cipher_suites =
            vec![wifi_common::ie::rsn::cipher::Cipher { oui: OUI, suite_type: cipher::TKIP }];
        tkip_rsne.akm_suites = get_a_rsne().akm_suites;

        let msg3 = get_4whs_msg3(&ptk, &anonce, &[0xCD; 16][..], Some(tkip_rsne), 2);
        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(msg3))
            .expect_err("expected RSNE mismatch failure");
        assert!(get_reported_ptk(&sink[..]).is_none());
    }

    #[test]
    fn stale_msg3_replay_counter_is_rejected() {
        let mut supplicant = get_supplicant();
        let anonce = [0xAA; 32];

        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(get_4whs_msg1(&anonce, 10)))
            .expect("supplicant failed processing msg1");
        let msg2 = expect_eapol_resp(&sink[..]);
        let ptk = get_ptk(&anonce[..], &msg2.key_nonce[..]);

        // Equal to msg1's counter instead of strictly greater.
        let msg3 = get_4whs_msg3(&ptk, &anonce, &[0xCD; 16][..], None, 10);
        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(msg3))
            .expect_err("expected replay counter failure");
    }

    #[test]
    fn group_key_handshake_after_establishment() {
        let mut supplicant = get_supplicant();
        let anonce = [0xAA; 32];

        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(get_4whs_msg1(&anonce, 1)))
            .expect("supplicant failed processing msg1");
        let msg2 = expect_eapol_resp(&sink[..]);
        let ptk = get_ptk(&anonce[..], &msg2.key_nonce[..]);
        let msg3 = get_4whs_msg3(&ptk, &anonce, &[0xCD; 16][..], None, 2);
        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(msg3))
            .expect("supplicant failed processing msg3");

        // Group rekey with a fresh GTK under a larger replay counter.
        let rekey = test_util::get_group_key_hs_msg1(&ptk, &[0xEF; 16][..], 2, 3);
        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(rekey.clone()))
            .expect("supplicant failed processing group key msg1");
        let gtk = expect_reported_gtk(&sink[..]);
        assert_eq!(gtk.tk(), &[0xEF; 16][..]);
        let first_resp = expect_eapol_resp(&sink[..]);

        // Retransmission: acknowledged again, no reinstallation.
        let mut sink = vec![];
        supplicant
            .on_eapol_frame(&mut sink, &eapol::Frame::Key(rekey))
            .expect("supplicant failed processing retransmitted group key msg1");
        assert_eq!(expect_eapol_resp(&sink[..]), first_resp);
        assert!(get_reported_gtk(&sink[..]).is_none());
    }
}

