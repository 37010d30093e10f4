//! The persisted network-profile contract. Storage itself is a
//! collaborator; this module fixes the read contract: INI-style text with a
//! `[Security]` section carrying `Passphrase` or `PreSharedKey`.

use std::path::PathBuf;

use failure::{bail, format_err, Error};
use log::debug;

use wifi_sme::client::Credential;

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkProfile {
    pub credential: Credential,
}

pub trait ProfileStorage {
    /// Loads the profile for an SSID, if one is persisted.
    fn load(&self, ssid: &[u8]) -> Result<Option<NetworkProfile>, Error>;
}

/// Parses an INI-style profile. Only the `[Security]` section is
/// interpreted; unknown sections and keys pass through untouched.
pub fn parse_profile(text: &str) -> Result<NetworkProfile, Error> {
    let mut section = String::new();
    let mut passphrase: Option<String> = None;
    let mut psk: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].to_string();
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().map(|v| v.trim());
        if section == "Security" {
            match (key, value) {
                ("Passphrase", Some(value)) => passphrase = Some(value.to_string()),
                ("PreSharedKey", Some(value)) => psk = Some(value.to_string()),
                _ => debug!("ignoring unknown security key '{}'", key),
            }
        }
    }

    // An explicit pre-shared key wins over a passphrase.
    if let Some(psk) = psk {
        let bytes = parse_hex(&psk[..])?;
        if bytes.len() != 32 {
            bail!("PreSharedKey must be 32 hex-encoded bytes");
        }
        return Ok(NetworkProfile { credential: Credential::Psk(bytes) });
    }
    if let Some(passphrase) = passphrase {
        return Ok(NetworkProfile { credential: Credential::Password(passphrase.into_bytes()) });
    }
    Ok(NetworkProfile { credential: Credential::None })
}

fn parse_hex(s: &str) -> Result<Vec<u8>, Error> {
    if s.len() % 2 != 0 {
        bail!("odd-length hex string");
    }
    (0..s.len() / 2)
        .map(|i| {
            u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| format_err!("invalid hex: {}", e))
        })
        .collect()
}

/// File-backed storage rooted at `$WIFID_PROFILE_DIR`; profiles are named
/// `<ssid>.network`. Absent configuration means no persisted networks.
pub struct EnvStorage {
    dir: Option<PathBuf>,
}

impl EnvStorage {
    pub fn from_env() -> Self {
        EnvStorage { dir: std::env::var_os("WIFID_PROFILE_DIR").map(PathBuf::from) }
    }
}

impl ProfileStorage for EnvStorage {
    fn load(&self, ssid: &[u8]) -> Result<Option<NetworkProfile>, Error> {
        let dir = match &self.dir {
            Some(dir) => dir,
            None => return Ok(None),
        };
        let name = String::from_utf8_lossy(ssid).to_string();
        let path = dir.join(format!("{}.network", name));
        match std::fs::read_to_string(&path) {
            Ok(text) => parse_profile(&text[..]).map(Some),
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format_err!("cannot read {}: {}", path.display(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_passphrase() {
        let profile = parse_profile("[Security]\nPassphrase=hello1234\n").unwrap();
        assert_eq!(profile.credential, Credential::Password(b"hello1234".to_vec()));
    }

    #[test]
    fn psk_wins_over_passphrase() {
        let text = "[Security]\nPassphrase=hello1234\nPreSharedKey=";
        let psk_hex = "0dc0d6eb90555ed6419756b9a15ec3e3209b63df707dd508d14581f8982721af";
        let profile = parse_profile(&format!("{}{}\n", text, psk_hex)).unwrap();
        match profile.credential {
            Credential::Psk(psk) => assert_eq!(psk.len(), 32),
            other => panic!("expected PSK credential, got {:?}", other),
        }
    }

    #[test]
    fn rejects_short_psk() {
        assert!(parse_profile("[Security]\nPreSharedKey=0011\n").is_err());
    }

    #[test]
    fn ignores_foreign_sections_and_comments() {
        let text = "# comment\n[General]\nAutoConnect=true\n[Security]\nPassphrase=pw12345678\n";
        let profile = parse_profile(text).unwrap();
        assert_eq!(profile.credential, Credential::Password(b"pw12345678".to_vec()));
    }

    #[test]
    fn empty_profile_has_no_credential() {
        assert_eq!(parse_profile("").unwrap().credential, Credential::None);
    }
}
