//! RSNE construction and validation for the AP side.

use wifi_common::ie::rsn::rsne::Rsne;
use wifi_common::ie::rsn::{akm, cipher};
use wifi_common::mac::StatusCode;

/// The RSNE this AP advertises: WPA2-Personal, CCMP-128 only.
pub fn create_wpa2_psk_rsne() -> Rsne {
    let mut rsne = Rsne::new();
    rsne.group_data_cipher_suite = Some(cipher::Cipher::new_dot11(cipher::CCMP_128));
    rsne.pairwise_cipher_suites = vec![cipher::Cipher::new_dot11(cipher::CCMP_128)];
    rsne.akm_suites = vec![akm::Akm::new_dot11(akm::PSK)];
    rsne
}

/// IEEE Std 802.11-2016, 12.6.3: the station picks exactly one pairwise
/// cipher and AKM out of what the AP offered. Violations map to the status
/// code the association response carries.
pub fn validate_s_rsne(s_rsne: &Rsne, a_rsne: &Rsne) -> Result<(), StatusCode> {
    match &s_rsne.group_data_cipher_suite {
        Some(group) => {
            if a_rsne.group_data_cipher_suite.as_ref() != Some(group) {
                return Err(StatusCode::INVALID_GROUP_CIPHER);
            }
        }
        None => return Err(StatusCode::INVALID_IE),
    }

    if s_rsne.pairwise_cipher_suites.len() != 1 {
        return Err(StatusCode::INVALID_PAIRWISE_CIPHER);
    }
    if !a_rsne.pairwise_cipher_suites.contains(&s_rsne.pairwise_cipher_suites[0]) {
        return Err(StatusCode::INVALID_PAIRWISE_CIPHER);
    }

    if s_rsne.akm_suites.len() != 1 {
        return Err(StatusCode::INVALID_AKMP);
    }
    let akm_suite = &s_rsne.akm_suites[0];
    if !akm_suite.has_known_algorithm()
        || akm_suite.suite_type != akm::PSK
        || !a_rsne.akm_suites.contains(akm_suite)
    {
        return Err(StatusCode::INVALID_AKMP);
    }

    if let Some(caps) = &s_rsne.rsn_capabilities {
        if caps.mgmt_frame_protection_req() || caps.ssp_amsdu_req() {
            return Err(StatusCode::INVALID_RSNE_CAPABILITIES);
        }
    }
    Ok(())
}
