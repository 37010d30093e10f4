pub mod handshake;

use crate::integrity::integrity_algorithm;
use crate::key::gtk::Gtk;
use crate::key::igtk::Igtk;
use crate::key::ptk::Ptk;
use crate::Error;

use wifi_common::ie::rsn::akm::Akm;

#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Pmk(Vec<u8>),
    Ptk(Ptk),
    Gtk(Gtk),
    Igtk(Igtk),
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::Pmk(..) => "PMK",
            Key::Ptk(..) => "PTK",
            Key::Gtk(..) => "GTK",
            Key::Igtk(..) => "IGTK",
        }
    }
}

/// Computes a serialized key frame's MIC.
/// Fails if the AKM has no associated integrity algorithm or MIC size.
pub fn compute_mic_from_buf(kck: &[u8], akm: &Akm, frame: &[u8]) -> Result<Vec<u8>, Error> {
    let integrity_alg = integrity_algorithm(akm).ok_or(Error::UnsupportedAkmSuite)?;
    let mic_len = akm.mic_bytes().ok_or(Error::UnsupportedAkmSuite)? as usize;
    let mut mic = integrity_alg.compute(kck, frame)?;
    mic.truncate(mic_len);
    Ok(mic)
}

/// Computes a key frame's MIC over its serialization with the MIC zeroed.
/// Fails if the frame does not have its MIC bit set or carries a MIC of the
/// wrong size for the AKM.
pub fn compute_mic(kck: &[u8], akm: &Akm, frame: &eapol::KeyFrame) -> Result<Vec<u8>, Error> {
    let mic_len = akm.mic_bytes().ok_or(Error::UnsupportedAkmSuite)? as usize;
    if !frame.key_info.key_mic() {
        return Err(Error::ComputingMicForUnprotectedFrame);
    }
    if frame.key_mic.len() != mic_len {
        return Err(Error::MicSizesDiffer(frame.key_mic.len(), mic_len));
    }
    let buf = frame.to_bytes(true);
    compute_mic_from_buf(kck, akm, &buf[..])
}

/// Stamps the computed MIC into a finished key frame.
pub fn finalize_with_mic(
    kck: &[u8],
    akm: &Akm,
    frame: &mut eapol::KeyFrame,
) -> Result<(), Error> {
    let mic = compute_mic(kck, akm, frame)?;
    frame.key_mic = bytes::Bytes::from(mic);
    Ok(())
}
