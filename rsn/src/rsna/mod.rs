//! Frame validation and shared types for RSNA key exchanges,
//! IEEE Std 802.11-2016, 12.7.2.

pub mod esssa;

use failure::{bail, ensure};

use wifi_common::ie::rsn::akm::Akm;
use wifi_common::ie::rsn::cipher::Cipher;
use wifi_common::ie::rsn::rsne::{Rsne, RsnCapabilities};

use crate::integrity::integrity_algorithm;
use crate::key::exchange::Key;
use crate::keywrap::keywrap_algorithm;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedProtection {
    pub group_data: Cipher,
    pub pairwise: Cipher,
    pub akm: Akm,
    pub mic_size: u16,
    pub group_mgmt: Option<Cipher>,
    // Some networks carry RSN capabilities. To reconstruct a bit-exact RSNE
    // these must be tracked.
    caps: Option<RsnCapabilities>,
}

impl NegotiatedProtection {
    /// Validates that this RSNE contains exactly one pairwise cipher and one
    /// AKM and produces the corresponding negotiated protection scheme.
    pub fn from_rsne(rsne: &Rsne) -> Result<Self, failure::Error> {
        let group_data =
            rsne.group_data_cipher_suite.as_ref().ok_or(Error::InvalidNegotiatedProtection)?;

        ensure!(rsne.pairwise_cipher_suites.len() == 1, Error::InvalidNegotiatedProtection);
        let pairwise = &rsne.pairwise_cipher_suites[0];

        ensure!(rsne.akm_suites.len() == 1, Error::InvalidNegotiatedProtection);
        let akm = &rsne.akm_suites[0];

        let mic_size = akm.mic_bytes().ok_or(Error::InvalidNegotiatedProtection)?;

        Ok(Self {
            group_data: group_data.clone(),
            pairwise: pairwise.clone(),
            akm: akm.clone(),
            mic_size,
            group_mgmt: rsne.group_mgmt_cipher_suite.clone(),
            caps: rsne.rsn_capabilities.clone(),
        })
    }

    /// The RSNE this protection writes into 802.11 frames.
    pub fn to_rsne(&self) -> Rsne {
        let mut rsne = Rsne::new();
        rsne.group_data_cipher_suite = Some(self.group_data.clone());
        rsne.pairwise_cipher_suites = vec![self.pairwise.clone()];
        rsne.akm_suites = vec![self.akm.clone()];
        rsne.rsn_capabilities = self.caps.clone();
        rsne
    }
}

/// Compares two RSNEs semantically, tolerating differences in the PMKID
/// list only. Used where an AP re-advertises its RSNE inside the 4-Way
/// Handshake with a PMKID appended.
pub fn ap_ie_matches(a: &Rsne, b: &Rsne) -> bool {
    a.version == b.version
        && a.group_data_cipher_suite == b.group_data_cipher_suite
        && a.pairwise_cipher_suites == b.pairwise_cipher_suites
        && a.akm_suites == b.akm_suites
        && a.rsn_capabilities == b.rsn_capabilities
        && a.group_mgmt_cipher_suite == b.group_mgmt_cipher_suite
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Role {
    Authenticator,
    Supplicant,
}

#[derive(Debug, PartialEq, Clone)]
pub enum SecAssocStatus {
    WrongPassword,
    EssSaEstablished,
}

#[derive(Debug, PartialEq, Clone)]
pub enum SecAssocUpdate {
    TxEapolKeyFrame(eapol::KeyFrame),
    Key(Key),
    Status(SecAssocStatus),
}

pub type UpdateSink = Vec<SecAssocUpdate>;

/// Wraps an EAPOL key frame to enforce successful decryption before the key
/// data can be used.
#[derive(Debug)]
pub struct EncryptedKeyData(eapol::KeyFrame);

impl EncryptedKeyData {
    pub fn decrypt(
        self,
        kek: &[u8],
        akm: &Akm,
    ) -> Result<(eapol::KeyFrame, Vec<u8>), failure::Error> {
        let key_data = keywrap_algorithm(akm)
            .ok_or(Error::UnsupportedAkmSuite)?
            .unwrap(kek, &self.0.key_data[..])?;
        Ok((self.0, key_data))
    }
}

/// Wraps an EAPOL key frame to enforce MIC verification before it is used.
#[derive(Debug)]
pub struct WithUnverifiedMic(eapol::KeyFrame);

impl WithUnverifiedMic {
    /// Yields the frame if the MIC verifies. Frames carrying encrypted key
    /// data stay wrapped until the key data is decrypted as well.
    pub fn verify_mic(self, kck: &[u8], akm: &Akm) -> Result<UnverifiedKeyData, failure::Error> {
        // IEEE Std 802.11-2016, 12.7.2 h)
        // IEEE Std 802.11-2016, 12.7.2 b.6)
        let mic_bytes = akm.mic_bytes().ok_or(Error::UnsupportedAkmSuite)?;
        ensure!(self.0.key_mic.len() == mic_bytes as usize, Error::InvalidMicSize);

        let buf = self.0.to_bytes(true);
        let valid_mic = integrity_algorithm(akm)
            .ok_or(Error::UnsupportedAkmSuite)?
            .verify(kck, &buf[..], &self.0.key_mic[..]);
        ensure!(valid_mic, Error::InvalidMic);

        if self.0.key_info.encrypted_key_data() {
            Ok(UnverifiedKeyData::Encrypted(EncryptedKeyData(self.0)))
        } else {
            Ok(UnverifiedKeyData::NotEncrypted(self.0))
        }
    }
}

pub enum UnverifiedKeyData {
    Encrypted(EncryptedKeyData),
    NotEncrypted(eapol::KeyFrame),
}

/// An EAPOL key frame which passed the role-independent checks of
/// IEEE Std 802.11-2016, 12.7.2. Neither MIC nor key data are verified yet.
#[derive(Debug)]
pub enum Dot11VerifiedKeyFrame {
    WithUnverifiedMic(WithUnverifiedMic),
    WithoutMic(eapol::KeyFrame),
}

impl Dot11VerifiedKeyFrame {
    pub fn from_frame(
        frame: eapol::KeyFrame,
        role: &Role,
        protection: &NegotiatedProtection,
        key_replay_counter: u64,
    ) -> Result<Dot11VerifiedKeyFrame, failure::Error> {
        let sender = match role {
            Role::Supplicant => Role::Authenticator,
            Role::Authenticator => Role::Supplicant,
        };

        // IEEE Std 802.11-2016, 12.7.2 a)
        // IEEE Std 802.1X-2010, 11.9
        match eapol::KeyDescriptor::from_u8(frame.descriptor_type) {
            Some(eapol::KeyDescriptor::Ieee802dot11) => (),
            _ => bail!(Error::UnsupportedKeyDescriptor(frame.descriptor_type)),
        };

        // IEEE Std 802.11-2016, 12.7.2 b.1)
        let expected_version = derive_key_descriptor_version(protection);
        ensure!(
            frame.key_info.key_descriptor_version() == expected_version,
            Error::UnsupportedKeyDescriptorVersion(frame.key_info.key_descriptor_version())
        );

        // IEEE Std 802.11-2016, 12.7.2 b.2)
        // IEEE Std 802.11-2016, 12.7.2 b.4)
        if frame.key_info.key_type() == eapol::KEY_TYPE_GROUP_SMK {
            // IEEE Std 802.11-2016, 12.7.2 b.4 ii)
            ensure!(!frame.key_info.install(), Error::InvalidInstallBitGroupSmkHandshake);
        }

        // IEEE Std 802.11-2016, 12.7.2 b.5)
        if let Role::Supplicant = sender {
            ensure!(!frame.key_info.key_ack(), Error::InvalidKeyAckBitSupplicant);
        }

        // IEEE Std 802.11-2016, 12.7.2 b.6) & b.7)
        // MIC and Secure bit depend on the selected exchange and are verified
        // there; some frames must first derive the PTK to check either.

        // IEEE Std 802.11-2016, 12.7.2 b.8) & b.9)
        if let Role::Authenticator = sender {
            ensure!(!frame.key_info.error(), Error::InvalidErrorBitAuthenticator);
            ensure!(!frame.key_info.request(), Error::InvalidRequestBitAuthenticator);
        }

        // IEEE Std 802.11-2016, 12.7.2 b.11)
        ensure!(!frame.key_info.smk_message(), Error::SmkHandshakeNotSupported);

        // IEEE Std 802.11-2016, 12.7.2 c)
        if frame.key_info.key_type() == eapol::KEY_TYPE_PAIRWISE {
            let tk_len =
                protection.pairwise.tk_bytes().ok_or(Error::UnsupportedCipherSuite)? as u16;
            match sender {
                // IEEE requires a key length of 0 from the Supplicant, but
                // some vendors send the pairwise key length instead; both are
                // accepted for interoperability.
                Role::Supplicant if frame.key_len != 0 => {
                    ensure!(frame.key_len == tk_len, Error::InvalidKeyLength(frame.key_len, tk_len));
                }
                Role::Authenticator => {
                    ensure!(frame.key_len == tk_len, Error::InvalidKeyLength(frame.key_len, tk_len));
                }
                _ => {}
            }
        }

        // IEEE Std 802.11-2016, 12.7.2, d)
        if key_replay_counter > 0 {
            match sender {
                // The supplicant echoes the authenticator's counter.
                Role::Supplicant => {
                    ensure!(
                        frame.key_replay_counter >= key_replay_counter,
                        Error::InvalidKeyReplayCounter(frame.key_replay_counter, key_replay_counter)
                    );
                }
                // The authenticator's counter increases strictly.
                Role::Authenticator => {
                    ensure!(
                        frame.key_replay_counter > key_replay_counter,
                        Error::InvalidKeyReplayCounter(frame.key_replay_counter, key_replay_counter)
                    );
                }
            }
        }

        // Encrypted key data requires the MIC bit in all 802.11 handshakes.
        if frame.key_info.encrypted_key_data() {
            ensure!(frame.key_info.key_mic(), Error::InvalidMicBitForEncryptedKeyData);
        }

        if frame.key_info.key_mic() {
            Ok(Dot11VerifiedKeyFrame::WithUnverifiedMic(WithUnverifiedMic(frame)))
        } else {
            Ok(Dot11VerifiedKeyFrame::WithoutMic(frame))
        }
    }

    /// CAUTION: returns the frame without MIC or key data verification.
    pub fn unsafe_get_raw(&self) -> &eapol::KeyFrame {
        match self {
            Dot11VerifiedKeyFrame::WithUnverifiedMic(WithUnverifiedMic(frame)) => frame,
            Dot11VerifiedKeyFrame::WithoutMic(frame) => frame,
        }
    }
}

/// IEEE Std 802.11-2016, 12.7.2 b.1)
/// The key descriptor version is derived from the negotiated AKM and ciphers.
pub fn derive_key_descriptor_version(protection: &NegotiatedProtection) -> u16 {
    let akm = &protection.akm;
    let pairwise = &protection.pairwise;

    if !akm.has_known_algorithm() || !pairwise.has_known_usage() {
        return 0;
    }

    match akm.suite_type {
        1 | 2 if pairwise.is_enhanced() || protection.group_data.is_enhanced() => 2,
        3..=6 => 3,
        _ => 0,
    }
}

#[cfg(test)]
pub mod test_util;
