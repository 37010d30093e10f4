//! Fast BSS Transition: the over-the-air Authenticate/Reassociate exchange
//! that moves an established RSNA to another BSS in the same mobility
//! domain without a 4-Way Handshake.

use failure::{bail, ensure, format_err};
use log::warn;
use zeroize::Zeroizing;

use wifi_common::ie::ft::Fte;
use wifi_common::ie::rsn::rsne::{self, Rsne};
use wifi_common::ie::{self, Id};
use wifi_common::mac::{AuthAlgorithm, MgmtBody, MgmtFrame, StatusCode};
use wifi_common::MacAddr;
use wifi_nl80211::{MFP_NO, WPA_VERSION_2};
use wifi_rsn::crypto_utils::nonce::NonceReader;
use wifi_rsn::ft::{compute_ft_mic, derive_ft_ptk, derive_pmk_r0, derive_pmk_r1, PmkR0};
use wifi_rsn::key::gtk::Gtk;
use wifi_rsn::key::ptk::Ptk;
use wifi_rsn::keywrap::keywrap_algorithm;
use wifi_rsn::rsna::NegotiatedProtection;
use wifi_rsn::Supplicant;

use super::internal::Context;
use crate::client::bss::BssDescription;
use crate::client::state::{LinkIes, Rsna};
use crate::{FtAuthParams, FtReassocParams, MlmeRequest, RequestToken, RsnParams};

/// FT authentication transaction sequence numbers covered by the FTE MIC.
const FT_MIC_TRANS_SEQ_REASSOC_REQ: u8 = 5;

#[derive(Debug)]
pub struct FtContext {
    pub target: Box<BssDescription>,
    pub prev_bssid: MacAddr,
    /// The target's MDE, echoed bit-exact through the whole exchange.
    pub mde: Vec<u8>,
    pub r0kh_id: Vec<u8>,
    pub snonce: [u8; 32],
    pub pmk_r0: PmkR0,
    pub s_rsne: Rsne,
    pub negotiated_protection: NegotiatedProtection,
    pub psk: Zeroizing<Vec<u8>>,
}

/// Builds and sends the FT Authenticate request; the previous SNonce is
/// superseded by a fresh one for this transition.
pub fn initiate(
    current_bss: &BssDescription,
    target: Box<BssDescription>,
    rsna: &Rsna,
    link_ies: &LinkIes,
    ctx: &mut Context,
) -> Result<(FtContext, RequestToken), failure::Error> {
    ensure!(rsna.negotiated_protection.akm.is_ft(), "connection did not negotiate an FT AKM");
    let current_mdid =
        current_bss.mdid().ok_or_else(|| format_err!("current BSS has no mobility domain"))?;
    let target_mde =
        target.mde().ok_or_else(|| format_err!("target BSS has no mobility domain"))?.to_vec();
    let target_mdid = target.mdid().ok_or_else(|| format_err!("target MDE is malformed"))?;
    ensure!(current_mdid == target_mdid, "target BSS is in a different mobility domain");

    let fte_bytes = link_ies
        .fte
        .as_ref()
        .ok_or_else(|| format_err!("initial association delivered no FTE"))?;
    let initial_fte = Fte::from_bytes(&fte_bytes[..])?;
    let r0kh_id =
        initial_fte.r0kh_id.ok_or_else(|| format_err!("initial FTE carries no R0KH-ID"))?;

    let pmk_r0 = derive_pmk_r0(
        &rsna.psk[..],
        &target.ssid[..],
        target_mdid,
        &r0kh_id[..],
        &ctx.device_info.addr,
    )?;
    let snonce = NonceReader::new(&ctx.device_info.addr[..])?.next();

    // The Authenticate request rewrites the RSNE to name PMK-R0 as the sole
    // PMKID; ANonce, MIC and the MIC element count stay zeroed.
    let mut auth_rsne = rsna.s_rsne.clone();
    auth_rsne.pmkids = vec![pmk_r0.name];
    let mut fte = Fte::new();
    fte.snonce = snonce;
    fte.r0kh_id = Some(r0kh_id.clone());

    let mut ies = vec![];
    ies.extend_from_slice(&auth_rsne.to_bytes()?[..]);
    ies.extend_from_slice(&target_mde[..]);
    ies.extend_from_slice(&fte.to_bytes()?[..]);

    let token = ctx.token();
    ctx.mlme_sink.send(MlmeRequest::Authenticate {
        token,
        params: FtAuthParams {
            bssid: target.bssid,
            freq: target.freq,
            ssid: target.ssid.clone(),
            ies,
        },
    });

    let ft_ctx = FtContext {
        prev_bssid: current_bss.bssid,
        mde: target_mde,
        r0kh_id,
        snonce,
        pmk_r0,
        s_rsne: rsna.s_rsne.clone(),
        negotiated_protection: rsna.negotiated_protection.clone(),
        psk: rsna.psk.clone(),
        target,
    };
    Ok((ft_ctx, token))
}

/// Validates the FT Authenticate response, derives the transition PTK and
/// sends the Reassociate request carrying the FTE MIC.
pub fn on_authenticate_conf(
    ft_ctx: &FtContext,
    frame: &[u8],
    ctx: &mut Context,
) -> Result<(Ptk, RequestToken), failure::Error> {
    let parsed = MgmtFrame::parse(frame)?;
    let elements = match parsed.body {
        MgmtBody::Authentication { auth_hdr, elements } => {
            ensure!(
                auth_hdr.auth_alg == AuthAlgorithm::FAST_BSS_TRANSITION,
                "unexpected authentication algorithm {:?}",
                auth_hdr.auth_alg
            );
            ensure!(auth_hdr.auth_txn_seq_num == 2, "unexpected transaction sequence");
            ensure!(
                auth_hdr.status_code == StatusCode::SUCCESS,
                "authentication refused: status {}",
                auth_hdr.status_code.0
            );
            elements
        }
        _ => bail!("expected an authentication frame"),
    };
    ie::parse_checked(elements).map_err(|e| format_err!("invalid response IEs: {}", e))?;

    let mde = ie::find_raw_element(elements, Id::MOBILITY_DOMAIN)
        .ok_or_else(|| format_err!("response misses the MDE"))?;
    ensure!(mde == &ft_ctx.mde[..], "response MDE does not match the advertised MDE");

    let fte_bytes = ie::find_raw_element(elements, Id::FAST_BSS_TRANSITION)
        .ok_or_else(|| format_err!("response misses the FTE"))?;
    let fte = Fte::from_bytes(fte_bytes)?;
    ensure!(fte.snonce == ft_ctx.snonce, "response FTE does not echo our SNonce");
    let r1kh_id = fte.r1kh_id.ok_or_else(|| format_err!("response FTE carries no R1KH-ID"))?;
    if let Some(r0kh_id) = &fte.r0kh_id {
        ensure!(&r0kh_id[..] == &ft_ctx.r0kh_id[..], "R0KH-ID changed mid-transition");
    }

    let pmk_r1 = derive_pmk_r1(&ft_ctx.pmk_r0, &r1kh_id, &ctx.device_info.addr);
    let ptk = derive_ft_ptk(
        &pmk_r1,
        &ft_ctx.snonce,
        &fte.anonce,
        &ft_ctx.target.bssid,
        &ctx.device_info.addr,
        &ft_ctx.negotiated_protection.akm,
        ft_ctx.negotiated_protection.pairwise.clone(),
    )?;

    // Reassociation request IE trio: RSNE naming PMK-R1, the verbatim MDE,
    // and an FTE whose MIC covers the five elements of 13.8.4.
    let mut reassoc_rsne = ft_ctx.s_rsne.clone();
    reassoc_rsne.pmkids = vec![pmk_r1.name];
    let rsne_bytes = reassoc_rsne.to_bytes()?;

    let mut reassoc_fte = Fte::new();
    reassoc_fte.anonce = fte.anonce;
    reassoc_fte.snonce = ft_ctx.snonce;
    reassoc_fte.r1kh_id = Some(r1kh_id);
    reassoc_fte.r0kh_id = Some(ft_ctx.r0kh_id.clone());
    reassoc_fte.mic_element_count = 3;
    let fte_zero_mic = reassoc_fte.to_bytes()?;
    let mic = compute_ft_mic(
        ptk.kck(),
        &ctx.device_info.addr,
        &ft_ctx.target.bssid,
        FT_MIC_TRANS_SEQ_REASSOC_REQ,
        &rsne_bytes[..],
        &ft_ctx.mde[..],
        &fte_zero_mic[..],
    )?;
    reassoc_fte.mic = mic;

    let mut ies = vec![];
    ies.extend_from_slice(&rsne_bytes[..]);
    ies.extend_from_slice(&ft_ctx.mde[..]);
    ies.extend_from_slice(&reassoc_fte.to_bytes()?[..]);

    let protection = &ft_ctx.negotiated_protection;
    let token = ctx.token();
    ctx.mlme_sink.send(MlmeRequest::Reassociate {
        token,
        params: FtReassocParams {
            bssid: ft_ctx.target.bssid,
            freq: ft_ctx.target.freq,
            ssid: ft_ctx.target.ssid.clone(),
            prev_bssid: ft_ctx.prev_bssid,
            ies,
            rsn: Some(RsnParams {
                wpa_versions: WPA_VERSION_2,
                pairwise_cipher: protection.pairwise.to_u32(),
                group_cipher: protection.group_data.to_u32(),
                akm: protection.akm.to_u32(),
                mfp: MFP_NO,
            }),
        },
    });
    Ok((ptk, token))
}

pub struct ReassocOutcome {
    pub gtk: Gtk,
    pub link_ies: LinkIes,
}

/// Validates the Reassociate response and unwraps the GTK delivered in the
/// FTE's GTK subelement.
pub fn on_reassociate_conf(
    ft_ctx: &FtContext,
    ptk: &Ptk,
    frame: &[u8],
) -> Result<ReassocOutcome, failure::Error> {
    let parsed = MgmtFrame::parse(frame)?;
    let elements = match parsed.body {
        MgmtBody::ReassocResp { assoc_resp_hdr, elements }
        | MgmtBody::AssocResp { assoc_resp_hdr, elements } => {
            ensure!(
                assoc_resp_hdr.status_code == StatusCode::SUCCESS,
                "reassociation refused: status {}",
                assoc_resp_hdr.status_code.0
            );
            elements
        }
        _ => bail!("expected a reassociation response"),
    };
    ie::parse_checked(elements).map_err(|e| format_err!("invalid response IEs: {}", e))?;

    let mde = ie::find_raw_element(elements, Id::MOBILITY_DOMAIN)
        .ok_or_else(|| format_err!("response misses the MDE"))?;
    ensure!(mde == &ft_ctx.mde[..], "response MDE does not match the advertised MDE");

    let fte_bytes = ie::find_raw_element(elements, Id::FAST_BSS_TRANSITION)
        .ok_or_else(|| format_err!("response misses the FTE"))?;
    let fte = Fte::from_bytes(fte_bytes)?;
    let gtk_sub = fte.gtk.ok_or_else(|| format_err!("response FTE delivers no GTK"))?;
    let gtk = unwrap_fte_gtk(ft_ctx, ptk, &gtk_sub[..])?;

    let link_ies = LinkIes { mde: Some(mde.to_vec()), fte: Some(fte_bytes.to_vec()) };
    Ok(ReassocOutcome { gtk, link_ies })
}

/// FTE GTK subelement, IEEE Std 802.11-2016, 13.8.5: key info (2), key
/// length (1), RSC (8), then the AES-keywrapped key.
fn unwrap_fte_gtk(ft_ctx: &FtContext, ptk: &Ptk, sub: &[u8]) -> Result<Gtk, failure::Error> {
    ensure!(sub.len() > 11, "GTK subelement too short");
    let key_id = (sub[0] & 0x03) as u8;
    let key_len = sub[2] as usize;
    let mut rsc_bytes = [0u8; 8];
    rsc_bytes.copy_from_slice(&sub[3..11]);
    let rsc = u64::from_le_bytes(rsc_bytes);

    let unwrapped = keywrap_algorithm(&ft_ctx.negotiated_protection.akm)
        .ok_or_else(|| format_err!("AKM has no keywrap algorithm"))?
        .unwrap(ptk.kek(), &sub[11..])?;
    ensure!(unwrapped.len() >= key_len, "GTK shorter than its declared length");
    let gtk = Gtk::from_gtk(
        unwrapped[..key_len].to_vec(),
        key_id,
        ft_ctx.negotiated_protection.group_data.clone(),
        rsc,
    )?;
    Ok(gtk)
}

/// Rebuilds the link's RSNA around the transition PTK so group rekeys keep
/// working on the new BSS.
pub fn into_rsna(ft_ctx: FtContext, ptk: Ptk, ctx: &mut Context) -> Option<Rsna> {
    let a_rsne = match ft_ctx.target.rsne().map(rsne::from_bytes) {
        Some(Ok(a_rsne)) => a_rsne,
        _ => {
            warn!("target BSS advertises no parseable RSNE; group rekey disabled");
            return None;
        }
    };
    let nonce_rdr = match NonceReader::new(&ctx.device_info.addr[..]) {
        Ok(nonce_rdr) => nonce_rdr,
        Err(_) => return None,
    };
    let psk: Box<[u8]> = ft_ctx.psk.to_vec().into_boxed_slice();
    match Supplicant::new_wpa2psk_ccmp128(
        nonce_rdr,
        psk,
        ctx.device_info.addr,
        ft_ctx.s_rsne.clone(),
        ft_ctx.target.bssid,
        a_rsne,
    ) {
        Ok(mut supplicant) => {
            supplicant.install_ft_ptk(ptk);
            Some(Rsna {
                negotiated_protection: ft_ctx.negotiated_protection,
                s_rsne: ft_ctx.s_rsne,
                psk: ft_ctx.psk,
                supplicant,
            })
        }
        Err(e) => {
            warn!("failed to rebuild RSNA after transition: {}", e);
            None
        }
    }
}
