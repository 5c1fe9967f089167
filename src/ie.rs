//! 802.11 Information Element decoding.
//!
//! Turns the IE hex transcripts found in beacon-scan output (the
//! `IE: Unknown:` lines) into structured records. Every record keeps the
//! exact hex it was decoded from; the element field names and bit layouts
//! follow the wire format and are a JSON contract consumed by downstream
//! analytics, so they must not drift. Multi-byte numeric fields are
//! little-endian throughout.
//!
//! Decoding never fails: malformed input is logged and yields a record with
//! whatever could be decoded, falling back to an empty element body.

use log::error;
use serde::Serialize;

use crate::freq::hex_to_bssid;

/// One decoded Information Element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ie {
    pub id: u8,
    /// Exact hex string the decoder consumed.
    pub raw: String,
    #[serde(rename = "type")]
    pub ie_type: &'static str,
    pub elements: Elements,
}

/// Element body, one variant per recognized tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Elements {
    BssLoad(BssLoad),
    TpcReport(TpcReport),
    HtCapabilities(Box<HtCapabilities>),
    HtOperation(Box<HtOperation>),
    ApName(ApName),
    VhtCapabilities(Box<VhtCapabilities>),
    VhtOperation(VhtOperation),
    Vendor(Vendor),
    HeCapabilities(Box<HeCapabilities>),
    HeOperation(Box<HeOperation>),
    /// Extension element whose body was not decoded; `ext_id` is kept.
    Extension { ext_id: u8 },
    /// Unrecognized or undecodable element; serializes as `{}`.
    Unknown(Empty),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Empty {}

/// BSS Load (tag 11).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BssLoad {
    pub sta_count: u16,
    /// Channel utilization scaled to [0, 1].
    pub ch_utilization: f64,
    pub available_admission_cap: u16,
}

/// TPC Report (tag 35).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TpcReport {
    pub tx_power: i32,
    pub link_margin: i32,
}

/// Rx MCS bitmask plus tx parameters, shared by HT Capabilities (supported
/// MCS set) and HT Operation (basic MCS set).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McsSet {
    pub rx_mcs_bitmask: u128,
    pub rx_highest_supported_rate: u16,
    pub tx_mcs_set_defined: u8,
    pub tx_rx_mcs_set_not_equal: u8,
    pub tx_max_ss_supported: u8,
    pub tx_unequal_modulation_supported: u8,
}

/// HT Capabilities (tag 45).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HtCapabilities {
    pub ht_ldpc_coding_capability: u8,
    pub ht_support_channel_width: u8,
    pub ht_sm_power_save: u8,
    pub ht_green_field: u8,
    pub ht_short_gi_for_20mhz: u8,
    pub ht_short_gi_for_40mhz: u8,
    pub ht_tx_stbc: u8,
    pub ht_rx_stbc: u8,
    pub ht_delayed_block_ack: u8,
    pub ht_max_a_msdu_length: u8,
    pub ht_dsss_cck_mode_in_40mhz: u8,
    pub ht_psmp_support: u8,
    pub ht_forty_mhz_intolerant: u8,
    pub ht_l_sig_txop_protection_support: u8,
    pub maximum_rx_a_mpdu_length: u8,
    pub mpdu_density: u8,
    #[serde(flatten)]
    pub mcs_set: McsSet,
    pub transmitter_supports_pco: u8,
    pub time_needed_to_transition_between_20mhz_and_40mhz: u8,
    pub mcs_feedback_capability: u8,
    pub high_throughput: u8,
    pub reverse_direction_responder: u8,
    pub transmit_beamforming: u8,
    pub receive_staggered_sounding: u8,
    pub transmit_staggered_sounding: u8,
    #[serde(rename = "receive_null_data_packet_(ndp)")]
    pub receive_null_data_packet: u8,
    #[serde(rename = "transmit_null_data_packet_(ndp)")]
    pub transmit_null_data_packet: u8,
    pub implicit_txbf_capable: u8,
    pub calibration: u8,
    pub sta_can_apply_txbf_using_csi_explicit_feedback: u8,
    pub sta_can_apply_txbf_using_uncompressed_beamforming_feedback_matrix: u8,
    pub sta_can_apply_txbf_using_compressed_beamforming_feedback_matrix: u8,
    pub receiver_can_return_explicit_csi_feedback: u8,
    pub receiver_can_return_explicit_uncompressed_beamforming_feedback_matrix: u8,
    pub sta_can_compress_and_use_compressed_beamforming_feedback_matrix: u8,
    pub minimal_grouping_used_for_explicit_feedback_reports: u8,
    pub max_antennae_sta_can_support_when_csi_feedback_required: u8,
    pub max_antennae_sta_can_support_when_uncompressed_beamforming_feedback_required: u8,
    pub max_antennae_sta_can_support_when_compressed_beamforming_feedback_required: u8,
    pub maximum_number_of_rows_of_csi_explicit_feedback: u8,
    pub maximum_number_of_space_time_streams_for_which_channel_dimensions_can_be_simultaneously_estimated:
        u8,
    pub antenna_selection_capable: u8,
    pub explicit_csi_feedback_based_tx_asel: u8,
    pub antenna_indices_feedback_based_tx_asel: u8,
    pub explicit_csi_feedback: u8,
    pub antenna_indices_feedback: u8,
    pub rx_asel: u8,
    pub tx_sounding_ppdus: u8,
}

/// HT Operation (tag 61).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HtOperation {
    pub primary_channel: u8,
    pub secondary_channel_offset: u8,
    pub sta_channel_width: u8,
    pub rifs_mode: u8,
    pub ht_protection: u8,
    pub nongf_ht_sta_present: u8,
    pub obss_nonht_sta_present: u8,
    pub channel_center_freq_segment_2: u16,
    pub dual_beacon: u8,
    pub dual_cts_protection: u8,
    pub stbc_beacon: u8,
    pub lsig_txop_protection: u8,
    pub pco_active: u8,
    pub pco_phase: u8,
    #[serde(flatten)]
    pub basic_mcs_set: McsSet,
}

/// Cisco CCX1 CKIP + Device Name (tag 133). Fixed layout: the AP name sits
/// at bytes 10..25 and the association count follows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApName {
    pub ap_name: String,
    pub sta_count: u16,
}

/// VHT Capabilities (tag 191).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VhtCapabilities {
    pub max_mpdu_length: u8,
    pub supported_channel_width_set: u8,
    pub rx_ldpc: u8,
    pub short_gi_for_80mhz: u8,
    pub short_gi_for_160mhz: u8,
    pub tx_stbc: u8,
    pub rx_stbc: u8,
    pub su_beamformer_capable: u8,
    pub su_beamformee_capable: u8,
    pub beamformee_sts_capability: u8,
    pub number_of_sounding_dimensions: u8,
    pub mu_beamformer_capable: u8,
    pub mu_beamformee_capable: u8,
    pub txop_ps: u8,
    pub htc_vht_capable: u8,
    pub max_a_mpdu_length_exponent: u8,
    pub vht_link_adaptation: u8,
    pub rx_antenna_pattern_consistency: u8,
    pub tx_antenna_pattern_consistency: u8,
    pub extended_nss_bw_support: u8,
    pub supported_rx_mcs_set: u16,
    pub rx_highest_long_gi_data_rate: u16,
    pub supported_tx_mcs_set: u16,
    pub tx_highest_long_gi_data_rate: u16,
    pub extended_nss_bw_capable: u8,
}

/// VHT Operation (tag 192).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VhtOperation {
    pub channel_width: u8,
    pub channel_center_freq_0: u8,
    pub channel_center_freq_1: u8,
    pub basic_mcs_set: u16,
}

/// Vendor Specific (tag 221).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vendor {
    /// Lowercase hex of the 3-byte OUI.
    pub oui: String,
    pub oui_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oui_subtype: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
}

/// HE Capabilities (tag 255, extension 35).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeCapabilities {
    pub ext_id: u8,
    // HE MAC Capabilities Information
    pub htc_he_support: u8,
    pub twt_requester_support: u8,
    pub twt_responder_support: u8,
    pub fragmentation_support: u8,
    pub max_number_fragmented_msdus: u8,
    pub min_fragment_size: u8,
    pub trigger_frame_mac_padding_duration: u8,
    pub multi_tid_aggregation_rx_support: u8,
    pub he_link_adaptation_support: u8,
    pub all_ack_support: u8,
    pub trs_support: u8,
    pub bsr_support: u8,
    pub broadcast_twt_support: u8,
    #[serde(rename = "32_bit_ba_bitmap_support")]
    pub ba_bitmap_support_32_bit: u8,
    pub mu_cascading_support: u8,
    pub ack_enabled_aggregation_support: u8,
    pub om_control_support: u8,
    pub ofdma_ra_support: u8,
    pub max_a_mpdu_length_exponent_extension: u8,
    pub a_msdu_fragmentation_support: u8,
    pub flexible_twt_schedule_support: u8,
    pub rx_control_frame_to_multibss: u8,
    // HE PHY Capabilities Information
    pub channel_width_set: u8,
    pub preamble_puncturing_rx: u8,
    pub device_class: u8,
    pub ldpc_coding_in_payload: u8,
    pub he_su_ppdu_1x_he_ltf_08us_gi: u8,
    pub midamble_tx_rx_max_nsts: u8,
    pub ndp_4x_he_ltf_32us_gi: u8,
    pub stbc_tx_lte_80mhz: u8,
    pub stbc_rx_lte_80mhz: u8,
    pub doppler_tx: u8,
    pub doppler_rx: u8,
    pub full_bandwidth_ul_mu_mimo: u8,
    pub partial_bandwidth_ul_mu_mimo: u8,
    pub dcm_max_constellation_tx: u8,
    pub dcm_max_nss_tx: u8,
    pub dcm_max_constellation_rx: u8,
    pub dcm_max_nss_rx: u8,
    pub rx_partial_bw_su_in_20mhz_he_mu_ppdu: u8,
    pub su_beamformer: u8,
    pub su_beamformee: u8,
    pub mu_beamformer: u8,
    pub beamformee_sts_lte_80mhz: u8,
    pub beamformee_sts_gt_80mhz: u8,
    pub number_of_sounding_dimensions_lte_80mhz: u8,
    pub number_of_sounding_dimensions_gt_80mhz: u8,
    pub ng_16_su_feedback: u8,
    pub ng_16_mu_feedback: u8,
    pub codebook_size_42_su_feedback: u8,
    pub codebook_size_75_mu_feedback: u8,
    pub triggered_su_beamforming_feedback: u8,
    pub triggered_mu_beamforming_partial_bw_feedback: u8,
    pub triggered_cqi_feedback: u8,
    pub partial_bandwidth_extended_range: u8,
    pub partial_bandwidth_dl_mu_mimo: u8,
    pub ppe_threshold_present: u8,
    // Supported HE-MCS sets; the 160 MHz and 80+80 MHz pairs are present
    // only when channel_width_set bits 2 and 3 say so
    pub rx_mcs_set_lte_80mhz: u16,
    pub tx_mcs_set_lte_80mhz: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_mcs_set_160mhz: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_mcs_set_160mhz: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_mcs_set_80p80mhz: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_mcs_set_80p80mhz: Option<u16>,
}

/// HE Operation (tag 255, extension 36).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeOperation {
    pub ext_id: u8,
    pub default_pe_duration: u8,
    pub twt_required: u8,
    pub txop_dur_rts_thresh: u16,
    pub vht_info_present: u8,
    pub cohosted_bss: u8,
    pub er_su_disable: u8,
    #[serde(rename = "6ghz_info_present")]
    pub sixghz_info_present: u8,
    pub bss_color: u8,
    pub partial_bss_color: u8,
    pub bss_color_disabled: u8,
    pub basic_mcs_set: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vht_info: Option<VhtInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cohosted_bss_indicator: Option<u8>,
    #[serde(rename = "6ghz_info", skip_serializing_if = "Option::is_none")]
    pub sixghz_info: Option<SixGhzInfo>,
}

/// Optional VHT operation info inside HE Operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VhtInfo {
    pub channel_width: u8,
    pub channel_center_freq_0: u8,
    pub channel_center_freq_1: u8,
}

/// Optional 6 GHz operation info inside HE Operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SixGhzInfo {
    pub primary_channel: u8,
    pub channel_width: u8,
    pub duplicate_beacon: u8,
    pub regulatory_info: u8,
    pub channel_center_freq_0: u8,
    pub channel_center_freq_1: u8,
    pub min_rate: u8,
}

/// Decode one IE hex transcript (tag, length, payload) into a record.
///
/// Unrecognized tags and malformed payloads yield a record with `type`
/// `"Unknown"` or the matched type and whatever fields could be decoded;
/// this function never panics or propagates an error.
pub fn read_beacon_ie(ie_hex: &str) -> Ie {
    let mut out = Ie {
        id: 0,
        raw: ie_hex.to_string(),
        ie_type: "Unknown",
        elements: Elements::Unknown(Empty {}),
    };
    let Some(data) = decode_hex(ie_hex) else {
        error!("Invalid IE hex: {ie_hex:?}");
        return out;
    };
    let Some(&id) = data.first() else {
        error!("Empty IE hex");
        return out;
    };
    out.id = id;

    let (ie_type, elements) = match id {
        11 => ("BSS Load", decode_bss_load(&data)),
        35 => ("TPC Report", decode_tpc_report(&data)),
        45 => ("HT Capabilities", decode_ht_capabilities(&data)),
        61 => ("HT Operation", decode_ht_operation(&data)),
        133 => ("Cisco CCX1 CKIP", decode_ccx_ap_name(&data)),
        191 => ("VHT Capabilities", decode_vht_capabilities(&data)),
        192 => ("VHT Operation", decode_vht_operation(&data)),
        221 => ("Vendor Specific", decode_vendor(&data)),
        255 => return decode_extension(out, &data),
        _ => return out,
    };
    out.ie_type = ie_type;
    match elements {
        Some(elements) => out.elements = elements,
        None => error!("Truncated {ie_type} element: {ie_hex:?}"),
    }
    out
}

fn decode_extension(mut out: Ie, data: &[u8]) -> Ie {
    let Some(&ext_id) = data.get(2) else {
        error!("Extension element without ext id: {:?}", out.raw);
        return out;
    };
    out.elements = Elements::Extension { ext_id };
    match ext_id {
        35 => {
            out.ie_type = "HE Capabilities";
            match decode_he_capabilities(data, ext_id) {
                Some(elements) => out.elements = elements,
                None => error!("Truncated HE Capabilities element: {:?}", out.raw),
            }
        }
        36 => {
            out.ie_type = "HE Operation";
            match decode_he_operation(data, ext_id) {
                Some(elements) => out.elements = elements,
                None => error!("Truncated HE Operation element: {:?}", out.raw),
            }
        }
        _ => {}
    }
    out
}

// ── Per-tag decoders ───────────────────────────────────────────────────
//
// Offsets index the full transcript: byte 0 is the tag, byte 1 the length,
// payload starts at byte 2. Each decoder returns None on a short payload.

fn decode_bss_load(d: &[u8]) -> Option<Elements> {
    Some(Elements::BssLoad(BssLoad {
        sta_count: u16_le(d, 2)?,
        ch_utilization: f64::from(*d.get(4)?) / 255.0,
        available_admission_cap: u16_le(d, 5)?,
    }))
}

fn decode_tpc_report(d: &[u8]) -> Option<Elements> {
    Some(Elements::TpcReport(TpcReport {
        tx_power: byte_uint_to_int(u16::from(*d.get(2)?)),
        link_margin: byte_uint_to_int(u16::from(*d.get(3)?)),
    }))
}

fn decode_ht_capabilities(d: &[u8]) -> Option<Elements> {
    let info = d.get(2..4)?;
    let ampdu = *d.get(4)?;
    let mcs_set = decode_mcs_set(d, 5)?;
    let ext = d.get(21..23)?;
    let txbf = d.get(23..27)?;
    let asel = *d.get(27)?;

    Some(Elements::HtCapabilities(Box::new(HtCapabilities {
        ht_ldpc_coding_capability: info[0] & 0x01,
        ht_support_channel_width: (info[0] >> 1) & 0x01,
        ht_sm_power_save: (info[0] >> 2) & 0x03,
        ht_green_field: (info[0] >> 4) & 0x01,
        ht_short_gi_for_20mhz: (info[0] >> 5) & 0x01,
        ht_short_gi_for_40mhz: (info[0] >> 6) & 0x01,
        ht_tx_stbc: (info[0] >> 7) & 0x01,
        ht_rx_stbc: info[1] & 0x03,
        ht_delayed_block_ack: (info[1] >> 2) & 0x01,
        ht_max_a_msdu_length: (info[1] >> 3) & 0x01,
        ht_dsss_cck_mode_in_40mhz: (info[1] >> 4) & 0x01,
        ht_psmp_support: (info[1] >> 5) & 0x01,
        ht_forty_mhz_intolerant: (info[1] >> 6) & 0x01,
        ht_l_sig_txop_protection_support: (info[1] >> 7) & 0x01,
        maximum_rx_a_mpdu_length: ampdu & 0x03,
        mpdu_density: (ampdu >> 2) & 0x07,
        mcs_set,
        transmitter_supports_pco: ext[0] & 0x01,
        time_needed_to_transition_between_20mhz_and_40mhz: (ext[0] >> 1) & 0x03,
        mcs_feedback_capability: ext[1] & 0x03,
        high_throughput: (ext[1] >> 2) & 0x01,
        reverse_direction_responder: (ext[1] >> 3) & 0x01,
        transmit_beamforming: txbf[0] & 0x01,
        receive_staggered_sounding: (txbf[0] >> 1) & 0x01,
        transmit_staggered_sounding: (txbf[0] >> 2) & 0x01,
        receive_null_data_packet: (txbf[0] >> 3) & 0x01,
        transmit_null_data_packet: (txbf[0] >> 4) & 0x01,
        implicit_txbf_capable: (txbf[0] >> 5) & 0x01,
        calibration: (txbf[0] >> 6) & 0x03,
        sta_can_apply_txbf_using_csi_explicit_feedback: txbf[1] & 0x01,
        sta_can_apply_txbf_using_uncompressed_beamforming_feedback_matrix: (txbf[1] >> 1) & 0x01,
        sta_can_apply_txbf_using_compressed_beamforming_feedback_matrix: (txbf[1] >> 2) & 0x01,
        receiver_can_return_explicit_csi_feedback: (txbf[1] >> 3) & 0x03,
        receiver_can_return_explicit_uncompressed_beamforming_feedback_matrix: (txbf[1] >> 5) & 0x03,
        sta_can_compress_and_use_compressed_beamforming_feedback_matrix: ((txbf[1] >> 7) & 0x01)
            + ((txbf[2] & 0x01) << 1),
        minimal_grouping_used_for_explicit_feedback_reports: (txbf[2] >> 1) & 0x03,
        max_antennae_sta_can_support_when_csi_feedback_required: (txbf[2] >> 3) & 0x03,
        max_antennae_sta_can_support_when_uncompressed_beamforming_feedback_required:
            (txbf[2] >> 5) & 0x03,
        max_antennae_sta_can_support_when_compressed_beamforming_feedback_required:
            ((txbf[2] >> 7) & 0x01) + ((txbf[3] & 0x01) << 1),
        maximum_number_of_rows_of_csi_explicit_feedback: (txbf[3] >> 1) & 0x03,
        maximum_number_of_space_time_streams_for_which_channel_dimensions_can_be_simultaneously_estimated:
            (txbf[3] >> 3) & 0x03,
        antenna_selection_capable: asel & 0x01,
        explicit_csi_feedback_based_tx_asel: (asel >> 1) & 0x01,
        antenna_indices_feedback_based_tx_asel: (asel >> 2) & 0x01,
        explicit_csi_feedback: (asel >> 3) & 0x01,
        antenna_indices_feedback: (asel >> 4) & 0x01,
        rx_asel: (asel >> 5) & 0x01,
        tx_sounding_ppdus: (asel >> 6) & 0x01,
    })))
}

fn decode_ht_operation(d: &[u8]) -> Option<Elements> {
    let primary_channel = *d.get(2)?;
    let info = d.get(3..8)?;
    let basic_mcs_set = decode_mcs_set(d, 8)?;

    Some(Elements::HtOperation(Box::new(HtOperation {
        primary_channel,
        secondary_channel_offset: info[0] & 0x03,
        sta_channel_width: (info[0] >> 2) & 0x01,
        rifs_mode: (info[0] >> 3) & 0x01,
        ht_protection: info[1] & 0x03,
        nongf_ht_sta_present: (info[1] >> 2) & 0x01,
        obss_nonht_sta_present: (info[1] >> 4) & 0x01,
        channel_center_freq_segment_2: u16::from((info[1] >> 5) & 0x07)
            + (u16::from(info[2] & 0x1f) << 3),
        dual_beacon: (info[3] >> 6) & 0x01,
        dual_cts_protection: (info[3] >> 7) & 0x01,
        stbc_beacon: info[4] & 0x01,
        lsig_txop_protection: (info[4] >> 1) & 0x01,
        pco_active: (info[4] >> 2) & 0x01,
        pco_phase: (info[4] >> 3) & 0x01,
        basic_mcs_set,
    })))
}

fn decode_mcs_set(d: &[u8], at: usize) -> Option<McsSet> {
    let set = d.get(at..at + 16)?;
    Some(McsSet {
        rx_mcs_bitmask: uint_le(set, 0, 10)?,
        rx_highest_supported_rate: u16::from(set[10]) + (u16::from(set[11] & 0x03) << 8),
        tx_mcs_set_defined: set[12] & 0x01,
        tx_rx_mcs_set_not_equal: (set[12] >> 1) & 0x01,
        tx_max_ss_supported: (set[12] >> 2) & 0x03,
        tx_unequal_modulation_supported: (set[12] >> 4) & 0x01,
    })
}

fn decode_ccx_ap_name(d: &[u8]) -> Option<Elements> {
    let name = d.get(10..25)?;
    Some(Elements::ApName(ApName {
        ap_name: std::str::from_utf8(name).ok()?.to_string(),
        sta_count: u16_le(d, 25)?,
    }))
}

fn decode_vht_capabilities(d: &[u8]) -> Option<Elements> {
    let info = u32_le(d, 2)?;
    let bits = |at: u32, width: u32| ((info >> at) & ((1 << width) - 1)) as u8;
    let rx_rate = u16_le(d, 8)?;
    let tx_rate = u16_le(d, 12)?;

    Some(Elements::VhtCapabilities(Box::new(VhtCapabilities {
        max_mpdu_length: bits(0, 2),
        supported_channel_width_set: bits(2, 2),
        rx_ldpc: bits(4, 1),
        short_gi_for_80mhz: bits(5, 1),
        short_gi_for_160mhz: bits(6, 1),
        tx_stbc: bits(7, 1),
        rx_stbc: bits(8, 3),
        su_beamformer_capable: bits(11, 1),
        su_beamformee_capable: bits(12, 1),
        beamformee_sts_capability: bits(13, 3),
        number_of_sounding_dimensions: bits(16, 3),
        mu_beamformer_capable: bits(19, 1),
        mu_beamformee_capable: bits(20, 1),
        txop_ps: bits(21, 1),
        htc_vht_capable: bits(22, 1),
        max_a_mpdu_length_exponent: bits(23, 3),
        vht_link_adaptation: bits(26, 2),
        rx_antenna_pattern_consistency: bits(28, 1),
        tx_antenna_pattern_consistency: bits(29, 1),
        extended_nss_bw_support: bits(30, 2),
        supported_rx_mcs_set: u16_le(d, 6)?,
        rx_highest_long_gi_data_rate: rx_rate & 0x1fff,
        supported_tx_mcs_set: u16_le(d, 10)?,
        tx_highest_long_gi_data_rate: tx_rate & 0x1fff,
        extended_nss_bw_capable: ((tx_rate >> 13) & 0x01) as u8,
    })))
}

fn decode_vht_operation(d: &[u8]) -> Option<Elements> {
    Some(Elements::VhtOperation(VhtOperation {
        channel_width: *d.get(2)?,
        channel_center_freq_0: *d.get(3)?,
        channel_center_freq_1: *d.get(4)?,
        basic_mcs_set: u16_le(d, 5)?,
    }))
}

fn decode_vendor(d: &[u8]) -> Option<Elements> {
    let oui: String = d.get(2..5)?.iter().map(|b| format!("{b:02x}")).collect();
    let oui_type = *d.get(5)?;
    let mut vendor = Vendor {
        oui,
        oui_type,
        vendor: None,
        oui_subtype: None,
        ap_name: None,
        bssid: None,
        ssid: None,
    };

    match vendor.oui.as_str() {
        "000b86" => {
            vendor.vendor = Some("Aruba");
            vendor.oui_subtype = d.get(6).copied();
            if oui_type == 1 && vendor.oui_subtype == Some(3) {
                vendor.ap_name = d
                    .get(8..)
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .map(str::to_string);
            }
        }
        "0050f2" => vendor.vendor = Some("Microsoft"),
        "8cfdf0" => vendor.vendor = Some("Qualcomm"),
        "506f9a" => {
            vendor.vendor = Some("Wi-Fi Alliance");
            if oui_type == 28 {
                let hex: String = d.get(6..12)?.iter().map(|b| format!("{b:02x}")).collect();
                vendor.bssid = Some(hex_to_bssid(&hex));
                vendor.ssid = d
                    .get(13..)
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .map(str::to_string);
            }
        }
        _ => {}
    }
    Some(Elements::Vendor(vendor))
}

fn decode_he_capabilities(d: &[u8], ext_id: u8) -> Option<Elements> {
    let mac = uint_le(d, 3, 6)?;
    let phy = uint_le(d, 9, 11)?;
    let mbits = |at: u32, width: u32| ((mac >> at) & ((1 << width) - 1)) as u8;
    let pbits = |at: u32, width: u32| ((phy >> at) & ((1 << width) - 1)) as u8;

    let channel_width_set = pbits(1, 7);
    let mut caps = HeCapabilities {
        ext_id,
        htc_he_support: mbits(0, 1),
        twt_requester_support: mbits(1, 1),
        twt_responder_support: mbits(2, 1),
        fragmentation_support: mbits(3, 2),
        max_number_fragmented_msdus: mbits(5, 3),
        min_fragment_size: mbits(8, 2),
        trigger_frame_mac_padding_duration: mbits(10, 2),
        multi_tid_aggregation_rx_support: mbits(12, 3),
        he_link_adaptation_support: mbits(15, 2),
        all_ack_support: mbits(17, 1),
        trs_support: mbits(18, 1),
        bsr_support: mbits(19, 1),
        broadcast_twt_support: mbits(20, 1),
        ba_bitmap_support_32_bit: mbits(21, 1),
        mu_cascading_support: mbits(22, 1),
        ack_enabled_aggregation_support: mbits(23, 1),
        om_control_support: mbits(25, 1),
        ofdma_ra_support: mbits(26, 1),
        max_a_mpdu_length_exponent_extension: mbits(27, 2),
        a_msdu_fragmentation_support: mbits(29, 1),
        flexible_twt_schedule_support: mbits(30, 1),
        rx_control_frame_to_multibss: mbits(31, 1),
        channel_width_set,
        preamble_puncturing_rx: pbits(8, 4),
        device_class: pbits(12, 1),
        ldpc_coding_in_payload: pbits(13, 1),
        he_su_ppdu_1x_he_ltf_08us_gi: pbits(14, 1),
        midamble_tx_rx_max_nsts: pbits(15, 2),
        ndp_4x_he_ltf_32us_gi: pbits(17, 1),
        stbc_tx_lte_80mhz: pbits(18, 1),
        stbc_rx_lte_80mhz: pbits(19, 1),
        doppler_tx: pbits(20, 1),
        doppler_rx: pbits(21, 1),
        full_bandwidth_ul_mu_mimo: pbits(22, 1),
        partial_bandwidth_ul_mu_mimo: pbits(23, 1),
        dcm_max_constellation_tx: pbits(24, 2),
        dcm_max_nss_tx: pbits(26, 1),
        dcm_max_constellation_rx: pbits(27, 2),
        dcm_max_nss_rx: pbits(29, 1),
        rx_partial_bw_su_in_20mhz_he_mu_ppdu: pbits(30, 1),
        su_beamformer: pbits(31, 1),
        su_beamformee: pbits(32, 1),
        mu_beamformer: pbits(33, 1),
        beamformee_sts_lte_80mhz: pbits(34, 3),
        beamformee_sts_gt_80mhz: pbits(37, 3),
        number_of_sounding_dimensions_lte_80mhz: pbits(40, 3),
        number_of_sounding_dimensions_gt_80mhz: pbits(43, 3),
        ng_16_su_feedback: pbits(46, 1),
        ng_16_mu_feedback: pbits(47, 1),
        codebook_size_42_su_feedback: pbits(48, 1),
        codebook_size_75_mu_feedback: pbits(49, 1),
        triggered_su_beamforming_feedback: pbits(50, 1),
        triggered_mu_beamforming_partial_bw_feedback: pbits(51, 1),
        triggered_cqi_feedback: pbits(52, 1),
        partial_bandwidth_extended_range: pbits(53, 1),
        partial_bandwidth_dl_mu_mimo: pbits(54, 1),
        ppe_threshold_present: pbits(55, 1),
        rx_mcs_set_lte_80mhz: u16_le(d, 20)?,
        tx_mcs_set_lte_80mhz: u16_le(d, 22)?,
        rx_mcs_set_160mhz: None,
        tx_mcs_set_160mhz: None,
        rx_mcs_set_80p80mhz: None,
        tx_mcs_set_80p80mhz: None,
    };

    let mut at = 24;
    if channel_width_set & 0x04 != 0 {
        caps.rx_mcs_set_160mhz = u16_le(d, at);
        caps.tx_mcs_set_160mhz = u16_le(d, at + 2);
        at += 4;
    }
    if channel_width_set & 0x08 != 0 {
        caps.rx_mcs_set_80p80mhz = u16_le(d, at);
        caps.tx_mcs_set_80p80mhz = u16_le(d, at + 2);
    }
    Some(Elements::HeCapabilities(Box::new(caps)))
}

fn decode_he_operation(d: &[u8], ext_id: u8) -> Option<Elements> {
    let info = d.get(3..6)?;
    let bss_color_info = *d.get(6)?;

    let mut op = HeOperation {
        ext_id,
        default_pe_duration: info[0] & 0x07,
        twt_required: (info[0] >> 3) & 0x01,
        txop_dur_rts_thresh: u16::from((info[0] >> 4) & 0x0f) + (u16::from(info[1] & 0x3f) << 4),
        vht_info_present: (info[1] >> 6) & 0x01,
        cohosted_bss: (info[1] >> 7) & 0x01,
        er_su_disable: info[2] & 0x01,
        sixghz_info_present: (info[2] >> 1) & 0x01,
        bss_color: bss_color_info & 0x3f,
        partial_bss_color: (bss_color_info >> 6) & 0x01,
        bss_color_disabled: (bss_color_info >> 7) & 0x01,
        basic_mcs_set: u16_le(d, 7)?,
        vht_info: None,
        max_cohosted_bss_indicator: None,
        sixghz_info: None,
    };

    // The optional tails are parsed in declared order; a truncated tail
    // yields the record decoded so far
    let mut at = 9;
    if op.vht_info_present == 1 {
        let Some(b) = d.get(at..at + 3) else {
            return Some(Elements::HeOperation(Box::new(op)));
        };
        op.vht_info = Some(VhtInfo {
            channel_width: b[0],
            channel_center_freq_0: b[1],
            channel_center_freq_1: b[2],
        });
        at += 3;
    }
    if op.cohosted_bss == 1 {
        let Some(&b) = d.get(at) else {
            return Some(Elements::HeOperation(Box::new(op)));
        };
        op.max_cohosted_bss_indicator = Some(b);
        at += 1;
    }
    if op.sixghz_info_present == 1 {
        let Some(b) = d.get(at..at + 5) else {
            return Some(Elements::HeOperation(Box::new(op)));
        };
        let control = b[1];
        op.sixghz_info = Some(SixGhzInfo {
            primary_channel: b[0],
            channel_width: control & 0x03,
            duplicate_beacon: (control >> 2) & 0x01,
            regulatory_info: (control >> 3) & 0x07,
            channel_center_freq_0: b[2],
            channel_center_freq_1: b[3],
            min_rate: b[4],
        });
    }
    Some(Elements::HeOperation(Box::new(op)))
}

// ── Byte helpers ───────────────────────────────────────────────────────

/// Sign conversion as performed on the wire transcript: the sign test is on
/// bit 15 regardless of the field width, so 8-bit inputs never go negative
/// through this path.
fn byte_uint_to_int(v: u16) -> i32 {
    if v & 0x8000 == 0x8000 {
        -(i32::from(v ^ 0xffff) + 1)
    } else {
        i32::from(v)
    }
}

fn u16_le(d: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes([*d.get(at)?, *d.get(at + 1)?]))
}

fn u32_le(d: &[u8], at: usize) -> Option<u32> {
    let b = d.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Little-endian unsigned integer over `len` bytes starting at `at`.
fn uint_le(d: &[u8], at: usize, len: usize) -> Option<u128> {
    let bytes = d.get(at..at + len)?;
    let mut value: u128 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= u128::from(*b) << (8 * i);
    }
    Some(value)
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
