//! RSNA construction for the connect path.

use failure::{bail, ensure, format_err};
use zeroize::Zeroizing;

use wifi_common::ie::rsn::rsne::{self, Rsne};
use wifi_common::ie::rsn::{akm, cipher, OUI};
use wifi_rsn::crypto_utils::nonce::NonceReader;
use wifi_rsn::rsna::NegotiatedProtection;
use wifi_rsn::{psk, Supplicant};

use crate::client::bss::BssDescription;
use crate::client::state::{Protection, Rsna};
use crate::DeviceInfo;

#[derive(Clone, Debug, PartialEq)]
pub enum Credential {
    None,
    Password(Vec<u8>),
    Psk(Vec<u8>),
}

/// Supported ciphers and AKMs:
/// group data: CCMP-128, TKIP; pairwise: CCMP-128; AKM: PSK, FT-PSK.
pub fn is_rsn_compatible(a_rsne: &Rsne) -> bool {
    let group_data_supported = a_rsne.group_data_cipher_suite.as_ref().map_or(false, |c| {
        // TKIP is only allowed as a group cipher, for compatibility with
        // mixed-mode networks.
        c.has_known_usage() && (c.suite_type == cipher::CCMP_128 || c.suite_type == cipher::TKIP)
    });

    let pairwise_supported = a_rsne
        .pairwise_cipher_suites
        .iter()
        .any(|c| c.has_known_usage() && c.suite_type == cipher::CCMP_128);
    let akm_supported = a_rsne.akm_suites.iter().any(|a| {
        a.has_known_algorithm() && (a.suite_type == akm::PSK || a.suite_type == akm::FT_PSK)
    });
    let caps_supported = a_rsne.rsn_capabilities.as_ref().map_or(true, |caps| {
        !(caps.no_pairwise()
            || caps.mgmt_frame_protection_req()
            || caps.joint_multiband()
            || caps.peerkey_enabled()
            || caps.ssp_amsdu_req()
            || caps.pbac()
            || caps.extended_key_id())
    });

    group_data_supported && pairwise_supported && akm_supported && caps_supported
}

pub fn get_rsna(
    device_info: &DeviceInfo,
    credential: &Credential,
    bss: &BssDescription,
) -> Result<Protection, failure::Error> {
    let a_rsne_bytes = match bss.rsne() {
        None => bail!("RSNE not present in BSS"),
        Some(rsne) => rsne,
    };

    let a_rsne = rsne::from_bytes(a_rsne_bytes)
        .map_err(|e| format_err!("invalid RSNE {:02x?}: {}", a_rsne_bytes, e))?;
    let s_rsne = derive_s_rsne(&a_rsne, bss.mde().is_some())?;
    let negotiated_protection = NegotiatedProtection::from_rsne(&s_rsne)?;
    let psk = compute_psk(credential, &bss.ssid[..])?;
    let supplicant = Supplicant::new_wpa2psk_ccmp128(
        // Note: there should be one reader per device, not per association.
        NonceReader::new(&device_info.addr[..])?,
        psk.clone(),
        device_info.addr,
        s_rsne.clone(),
        bss.bssid,
        a_rsne,
    )
    .map_err(|e| format_err!("failed to create ESS-SA: {}", e))?;
    Ok(Protection::Rsna(Rsna {
        negotiated_protection,
        s_rsne,
        psk: Zeroizing::new(psk.to_vec()),
        supplicant,
    }))
}

pub fn compute_psk(credential: &Credential, ssid: &[u8]) -> Result<psk::Psk, failure::Error> {
    match credential {
        Credential::Password(password) => psk::compute(&password[..], ssid).map_err(|e| e.into()),
        Credential::Psk(psk) => {
            ensure!(psk.len() == 32, "PSK must be 32 octets but was {}", psk.len());
            Ok(psk.clone().into_boxed_slice())
        }
        Credential::None => bail!("protected network requires a credential"),
    }
}

/// Constructs the supplicant's RSNE:
/// group data cipher from the AP (CCMP-128 or TKIP), pairwise CCMP-128,
/// AKM PSK -- or FT-PSK when the BSS advertises a mobility domain and
/// offers it.
fn derive_s_rsne(a_rsne: &Rsne, has_mde: bool) -> Result<Rsne, failure::Error> {
    if !is_rsn_compatible(&a_rsne) {
        bail!("incompatible RSNE {:?}", a_rsne);
    }

    let use_ft = has_mde
        && a_rsne
            .akm_suites
            .iter()
            .any(|a| a.has_known_algorithm() && a.suite_type == akm::FT_PSK);

    let mut s_rsne = Rsne::new();
    s_rsne.group_data_cipher_suite = a_rsne.group_data_cipher_suite.clone();
    let pairwise_cipher = cipher::Cipher { oui: OUI, suite_type: cipher::CCMP_128 };
    s_rsne.pairwise_cipher_suites.push(pairwise_cipher);
    let akm_suite = akm::Akm { oui: OUI, suite_type: if use_ft { akm::FT_PSK } else { akm::PSK } };
    s_rsne.akm_suites.push(akm_suite);
    s_rsne.rsn_capabilities = a_rsne.rsn_capabilities.clone();
    Ok(s_rsne)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        fake_device_info, fake_protected_bss_description, fake_unprotected_bss_description,
        make_rsne, wpa2_psk_ccmp_rsne_with_caps,
    };
    use wifi_common::ie::rsn::rsne::RsnCapabilities;

    const CLIENT_ADDR: [u8; 6] = [0x7A, 0xE7, 0x76, 0xD9, 0xF2, 0x67];

    #[test]
    fn test_rsn_capabilities() {
        let a_rsne = wpa2_psk_ccmp_rsne_with_caps(RsnCapabilities(0x000C));
        assert!(is_rsn_compatible(&a_rsne));

        let a_rsne = wpa2_psk_ccmp_rsne_with_caps(RsnCapabilities(0));
        assert!(is_rsn_compatible(&a_rsne));

        let a_rsne = wpa2_psk_ccmp_rsne_with_caps(RsnCapabilities(1));
        assert!(is_rsn_compatible(&a_rsne));

        let a_rsne = wpa2_psk_ccmp_rsne_with_caps(RsnCapabilities(2));
        assert!(!is_rsn_compatible(&a_rsne));
    }

    #[test]
    fn test_incompatible_group_data_cipher() {
        let a_rsne = make_rsne(Some(cipher::GCMP_256), vec![cipher::CCMP_128], vec![akm::PSK]);
        assert_eq!(is_rsn_compatible(&a_rsne), false);
    }

    #[test]
    fn test_tkip_pairwise_cipher() {
        let a_rsne = make_rsne(Some(cipher::CCMP_128), vec![cipher::TKIP], vec![akm::PSK]);
        assert_eq!(is_rsn_compatible(&a_rsne), false);
    }

    #[test]
    fn test_tkip_group_data_cipher() {
        let a_rsne = make_rsne(Some(cipher::TKIP), vec![cipher::CCMP_128], vec![akm::PSK]);
        assert_eq!(is_rsn_compatible(&a_rsne), true);

        let s_rsne = derive_s_rsne(&a_rsne, false).unwrap();
        let expected_rsne_bytes =
            vec![48, 18, 1, 0, 0, 15, 172, 2, 1, 0, 0, 15, 172, 4, 1, 0, 0, 15, 172, 2];
        assert_eq!(s_rsne.to_bytes().unwrap(), expected_rsne_bytes);
    }

    #[test]
    fn test_ccmp128_group_data_pairwise_cipher_psk() {
        let a_rsne = make_rsne(Some(cipher::CCMP_128), vec![cipher::CCMP_128], vec![akm::PSK]);
        assert_eq!(is_rsn_compatible(&a_rsne), true);

        let s_rsne = derive_s_rsne(&a_rsne, false).unwrap();
        let expected_rsne_bytes =
            vec![48, 18, 1, 0, 0, 15, 172, 4, 1, 0, 0, 15, 172, 4, 1, 0, 0, 15, 172, 2];
        assert_eq!(s_rsne.to_bytes().unwrap(), expected_rsne_bytes);
    }

    #[test]
    fn test_ft_psk_selected_with_mde() {
        let a_rsne =
            make_rsne(Some(cipher::CCMP_128), vec![cipher::CCMP_128], vec![akm::PSK, akm::FT_PSK]);
        let s_rsne = derive_s_rsne(&a_rsne, true).unwrap();
        assert_eq!(s_rsne.akm_suites[0].suite_type, akm::FT_PSK);

        // Without a mobility domain, plain PSK wins even if FT is offered.
        let s_rsne = derive_s_rsne(&a_rsne, false).unwrap();
        assert_eq!(s_rsne.akm_suites[0].suite_type, akm::PSK);
    }

    #[test]
    fn test_no_akm() {
        let a_rsne = make_rsne(Some(cipher::CCMP_128), vec![cipher::CCMP_128], vec![]);
        assert_eq!(is_rsn_compatible(&a_rsne), false);
    }

    #[test]
    fn test_get_rsna_password_for_unprotected_network() {
        let bss = fake_unprotected_bss_description(b"foo_bss".to_vec());
        let credential = Credential::Password("somepass".as_bytes().to_vec());
        let rsna = get_rsna(&fake_device_info(CLIENT_ADDR), &credential, &bss);
        assert!(rsna.is_err(), "expect error when password is supplied for unprotected network");
    }

    #[test]
    fn test_get_rsna_no_password_for_protected_network() {
        let bss = fake_protected_bss_description(b"foo_bss".to_vec());
        let credential = Credential::None;
        let rsna = get_rsna(&fake_device_info(CLIENT_ADDR), &credential, &bss);
        assert!(rsna.is_err(), "expect error when no password is supplied for protected network");
    }

    #[test]
    fn test_get_rsna_psk() {
        let bss = fake_protected_bss_description(b"foo_bss".to_vec());
        let credential = Credential::Psk(vec![0xAA; 32]);
        get_rsna(&fake_device_info(CLIENT_ADDR), &credential, &bss)
            .expect("expected successful RSNA with valid PSK");
    }

    #[test]
    fn test_get_rsna_invalid_psk() {
        let bss = fake_protected_bss_description(b"foo_bss".to_vec());
        // PSK too short.
        let credential = Credential::Psk(vec![0xAA; 31]);
        get_rsna(&fake_device_info(CLIENT_ADDR), &credential, &bss)
            .expect_err("expected RSNA failure with invalid PSK");
    }
}
