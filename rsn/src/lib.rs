//! RSNA key management: the 4-Way and Group-Key handshakes, the key
//! hierarchy they install, and the FT key hierarchy for 802.11r roams.

#![deny(warnings)]
#![allow(non_local_definitions)]

pub mod crypto_utils;
pub mod ft;
pub mod integrity;
pub mod key;
pub mod key_data;
pub mod keywrap;
pub mod psk;
pub mod rsna;

use failure::Fail;
use std::sync::{Arc, Mutex};

use wifi_common::ie::rsn::rsne::Rsne;
use wifi_common::MacAddr;

use crate::crypto_utils::nonce::NonceReader;
use crate::key::exchange::handshake::fourway;
use crate::key::gtk::GtkProvider;
use crate::rsna::esssa::EssSa;
use crate::rsna::{NegotiatedProtection, Role, UpdateSink};

#[derive(Debug, Fail, PartialEq)]
pub enum Error {
    #[fail(display = "invalid passphrase length: {}", _0)]
    InvalidPassphraseLen(usize),
    #[fail(display = "passphrase is not printable ASCII")]
    InvalidPassphraseChar,
    #[fail(display = "invalid SSID length: {}", _0)]
    InvalidSsidLen(usize),
    #[fail(display = "invalid PMK length: {}", _0)]
    InvalidPmkLen(usize),
    #[fail(display = "invalid nonce length: {}", _0)]
    InvalidNonceLen(usize),
    #[fail(display = "the negotiated protection is invalid")]
    InvalidNegotiatedProtection,
    #[fail(display = "unsupported AKM suite")]
    UnsupportedAkmSuite,
    #[fail(display = "unsupported cipher suite")]
    UnsupportedCipherSuite,
    #[fail(display = "invalid MIC size")]
    InvalidMicSize,
    #[fail(display = "invalid MIC")]
    InvalidMic,
    #[fail(display = "cannot compute MIC for an unprotected frame")]
    ComputingMicForUnprotectedFrame,
    #[fail(display = "MIC size differs: {} vs {}", _0, _1)]
    MicSizesDiffer(usize, usize),
    #[fail(display = "unsupported key descriptor type: {}", _0)]
    UnsupportedKeyDescriptor(u8),
    #[fail(display = "unsupported key descriptor version: {}", _0)]
    UnsupportedKeyDescriptorVersion(u16),
    #[fail(display = "install bit must not be set in Group/SMK handshakes")]
    InvalidInstallBitGroupSmkHandshake,
    #[fail(display = "key ack bit must not be set in frames sent by the supplicant")]
    InvalidKeyAckBitSupplicant,
    #[fail(display = "error bit must not be set in frames sent by the authenticator")]
    InvalidErrorBitAuthenticator,
    #[fail(display = "request bit must not be set in frames sent by the authenticator")]
    InvalidRequestBitAuthenticator,
    #[fail(display = "SMK handshake is not supported")]
    SmkHandshakeNotSupported,
    #[fail(display = "encrypted key data requires the MIC bit")]
    InvalidMicBitForEncryptedKeyData,
    #[fail(display = "invalid key length {}; expected {}", _0, _1)]
    InvalidKeyLength(u16, u16),
    #[fail(display = "invalid key replay counter {}; expected larger than {}", _0, _1)]
    InvalidKeyReplayCounter(u64, u64),
    #[fail(display = "invalid nonce in key frame")]
    InvalidNonce,
    #[fail(display = "AES keywrap input has invalid length: {}", _0)]
    InvalidAesKeywrapDataLength(usize),
    #[fail(display = "AES keywrap integrity check failed; wrong KEK or corrupted data")]
    WrongAesKeywrapKey,
    #[fail(display = "invalid key data: {}", _0)]
    InvalidKeyData(&'static str),
    #[fail(display = "key data does not carry the required GTK")]
    MissingGtk,
    #[fail(display = "key data RSNE does not match the advertised RSNE")]
    RsneMismatch,
    #[fail(display = "security association is established and rejects state changes")]
    EstablishedSaRejectsUpdates,
    #[fail(display = "unexpected handshake message")]
    UnexpectedHandshakeMessage,
    #[fail(display = "invalid R0KH-ID or R1KH-ID length")]
    InvalidKhIdLen,
}

/// Supplicant side of an ESS security association.
#[derive(Debug)]
pub struct Supplicant {
    esssa: EssSa,
}

impl Supplicant {
    /// WPA2-Personal, CCMP-128 pairwise cipher.
    pub fn new_wpa2psk_ccmp128(
        nonce_rdr: NonceReader,
        psk: psk::Psk,
        s_addr: MacAddr,
        s_rsne: Rsne,
        a_addr: MacAddr,
        a_rsne: Rsne,
    ) -> Result<Supplicant, failure::Error> {
        let negotiated_protection = NegotiatedProtection::from_rsne(&s_rsne)?;
        let fourway_cfg =
            fourway::Config::new(Role::Supplicant, s_addr, s_rsne, a_addr, a_rsne, nonce_rdr, None)?;
        let esssa = EssSa::new(Role::Supplicant, negotiated_protection, psk.to_vec(), fourway_cfg)?;
        Ok(Supplicant { esssa })
    }

    /// Readies the supplicant to process the authenticator's first message.
    pub fn start(&mut self) -> Result<(), failure::Error> {
        // The supplicant does not initiate the exchange.
        Ok(())
    }

    pub fn reset(&mut self) {
        self.esssa.reset();
    }

    pub fn on_eapol_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: &eapol::Frame,
    ) -> Result<(), failure::Error> {
        self.esssa.on_eapol_frame(update_sink, frame)
    }

    /// Kernel-offloaded group rekey advanced the replay counter.
    pub fn on_rekey_offload_replay_counter(&mut self, key_replay_counter: u64) {
        self.esssa.update_key_replay_counter(key_replay_counter);
    }

    /// Installs an externally derived PTK (fast transition) and freezes the
    /// association; group rekeys run under this PTK.
    pub fn install_ft_ptk(&mut self, ptk: key::ptk::Ptk) {
        self.esssa.install_ptk(ptk);
    }

    pub fn negotiated_protection(&self) -> &NegotiatedProtection {
        &self.esssa.negotiated_protection
    }
}

/// Authenticator side of an ESS security association, one per station.
#[derive(Debug)]
pub struct Authenticator {
    esssa: EssSa,
}

impl Authenticator {
    /// WPA2-Personal, CCMP-128 pairwise cipher. `s_rsne` is the RSNE the
    /// station carried in its association request.
    pub fn new_wpa2psk_ccmp128(
        nonce_rdr: NonceReader,
        gtk_provider: Arc<Mutex<GtkProvider>>,
        psk: psk::Psk,
        s_addr: MacAddr,
        s_rsne: Rsne,
        a_addr: MacAddr,
        a_rsne: Rsne,
    ) -> Result<Authenticator, failure::Error> {
        let negotiated_protection = NegotiatedProtection::from_rsne(&s_rsne)?;
        let fourway_cfg = fourway::Config::new(
            Role::Authenticator,
            s_addr,
            s_rsne,
            a_addr,
            a_rsne,
            nonce_rdr,
            Some(gtk_provider),
        )?;
        let esssa =
            EssSa::new(Role::Authenticator, negotiated_protection, psk.to_vec(), fourway_cfg)?;
        Ok(Authenticator { esssa })
    }

    /// Kicks off the 4-Way Handshake by emitting message 1.
    pub fn initiate(&mut self, update_sink: &mut UpdateSink) -> Result<(), failure::Error> {
        self.esssa.initiate(update_sink)
    }

    pub fn reset(&mut self) {
        self.esssa.reset();
    }

    pub fn on_eapol_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: &eapol::Frame,
    ) -> Result<(), failure::Error> {
        self.esssa.on_eapol_frame(update_sink, frame)
    }

    /// Starts a Group-Key handshake distributing the provider's current GTK.
    pub fn initiate_group_rekey(
        &mut self,
        update_sink: &mut UpdateSink,
    ) -> Result<(), failure::Error> {
        self.esssa.initiate_group_rekey(update_sink)
    }

    pub fn negotiated_protection(&self) -> &NegotiatedProtection {
        &self.esssa.negotiated_protection
    }
}
