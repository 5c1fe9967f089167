//! Monitor-mode channel sweeps and packet-capture bundling.
//!
//! Walks a monitor-mode radio across the channel plan: retune, capture for a
//! fixed dwell time, stop the capture, move on. Completed capture files are
//! bundled into one timestamped zip under `logs/pcap-log/`. Tuning and
//! capture failures are per-channel and never abort the sweep.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use log::{error, info, warn};

use crate::channels::{Channel, CHANNEL_PLAN};
use crate::cmd::{self, CmdError};
use crate::freq::{self, Band};
use crate::scan::Beacon;

/// Default tcpdump snapshot length in bytes.
pub const DEFAULT_PACKET_SIZE: u32 = 765;

/// Directory capture bundles are written to.
const ARCHIVE_DIR: &str = "logs/pcap-log";

/// Which part of the channel plan a sweep covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// The full channel plan.
    All,
    /// One band only.
    Band(Band),
    /// Only channels whose primary center frequency showed up in the last
    /// beacon scan.
    Scan,
}

impl FromStr for MonitorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(MonitorMode::All),
            "2.4ghz" => Ok(MonitorMode::Band(Band::Ghz2_4)),
            "5ghz" => Ok(MonitorMode::Band(Band::Ghz5)),
            "6ghz" => Ok(MonitorMode::Band(Band::Ghz6)),
            "scan" => Ok(MonitorMode::Scan),
            other => Err(format!("unknown monitor mode {other:?}")),
        }
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::All => f.write_str("all"),
            MonitorMode::Band(band) => write!(f, "{band}"),
            MonitorMode::Scan => f.write_str("scan"),
        }
    }
}

/// Pick the sweep targets for a mode, preserving channel plan order.
pub fn select_channels(mode: MonitorMode, last_scan: &[Beacon]) -> Vec<&'static Channel> {
    match mode {
        MonitorMode::All => CHANNEL_PLAN.iter().collect(),
        MonitorMode::Band(band) => CHANNEL_PLAN.iter().filter(|c| c.band == band).collect(),
        MonitorMode::Scan => {
            if last_scan.is_empty() {
                error!("Monitor mode scan needs a previous beacon scan");
                return Vec::new();
            }
            let freqs: HashSet<u32> = last_scan
                .iter()
                .map(|b| freq::freq_str_to_mhz(&b.freq))
                .collect();
            CHANNEL_PLAN
                .iter()
                .filter(|c| freqs.contains(&u32::from(c.primary_center_mhz)))
                .collect()
        }
    }
}

/// Sweep the selected channels on a monitor-mode interface, capturing
/// packets for `duration` seconds per channel, then bundle the completed
/// capture files. The interface must already be in monitor mode.
///
/// Returns the archive path when at least one capture completed and was
/// zipped; capture files are deleted only after a successful zip.
pub fn monitor(
    iface: &str,
    duration: u64,
    packet_size: u32,
    mode: MonitorMode,
    last_scan: &[Beacon],
) -> Result<Option<PathBuf>, CmdError> {
    let targets = select_channels(mode, last_scan);
    info!("Capturing {} channels", targets.len());
    if targets.is_empty() {
        return Ok(None);
    }

    let mut capture_files: Vec<PathBuf> = Vec::new();
    for channel in targets {
        if !tune(iface, channel)? {
            continue;
        }

        let file_name = PathBuf::from(format!(
            "capture_{}_{}_{}.pcap",
            channel.band, channel.primary_ch, channel.width_mhz
        ));
        let proc = cmd::run_async(
            &format!(
                "sudo tcpdump -i {iface} -s {packet_size} -w {}",
                file_name.display()
            ),
            &format!(
                "Capture Wi-Fi packets on {iface}, size {packet_size} to {}",
                file_name.display()
            ),
        )?;
        thread::sleep(Duration::from_secs(duration));
        proc.resolve(
            "Resolving Wi-Fi packet capture",
            true,
            Some(Duration::from_secs(duration + 1)),
            true,
        );
        info!("Capture finished");
        capture_files.push(file_name);
        // Give tcpdump a beat to flush before the next retune
        thread::sleep(Duration::from_secs(1));
    }

    archive_captures(&capture_files)
}

/// Retune the radio to a channel. Returns false (and logs) when the tune
/// command fails, so the caller can skip the channel.
fn tune(iface: &str, channel: &Channel) -> Result<bool, CmdError> {
    let mut set_freq = format!(
        "sudo iw dev {iface} set freq {} {}",
        channel.primary_center_mhz, channel.width_mhz
    );
    if channel.width_mhz > 20 {
        set_freq.push_str(&format!(" {}", channel.center_mhz));
    }
    let result = cmd::run_raw(
        &set_freq,
        &format!(
            "Set iface {iface} freq {} {} {}",
            channel.primary_center_mhz, channel.width_mhz, channel.center_mhz
        ),
        None,
    )?;
    if result.returncode != 0 {
        warn!("Cannot set {iface} freq: {}", result.stderr);
        return Ok(false);
    }
    Ok(true)
}

/// Zip the capture files that made it to disk and delete them afterwards.
/// On archival failure the files stay behind for a retry.
fn archive_captures(capture_files: &[PathBuf]) -> Result<Option<PathBuf>, CmdError> {
    let completed: Vec<&PathBuf> = capture_files.iter().filter(|f| f.is_file()).collect();
    if completed.is_empty() {
        info!("No completed captures, skip zipping");
        return Ok(None);
    }

    info!("Zipping {} pcap files", completed.len());
    if let Err(err) = std::fs::create_dir_all(ARCHIVE_DIR) {
        error!("Cannot create {ARCHIVE_DIR}: {err}");
        return Ok(None);
    }
    let archive = PathBuf::from(format!(
        "{ARCHIVE_DIR}/{}.zip",
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
    ));
    let files: Vec<String> = completed.iter().map(|f| f.display().to_string()).collect();
    let result = cmd::run_raw(
        &format!("zip {} {}", archive.display(), files.join(" ")),
        "Zipping all capture files",
        None,
    )?;
    if result.returncode != 0 {
        error!("Zipping capture files failed: {}", result.stderr);
        return Ok(None);
    }

    for file in completed {
        if let Err(err) = std::fs::remove_file(file) {
            warn!("Cannot remove {}: {err}", file.display());
        }
    }
    Ok(Some(archive))
}

// ── Interface mode helpers ─────────────────────────────────────────────

/// Interface type reported by `iw dev <iface> info` ("managed", "monitor").
pub fn iface_type(iface: &str) -> Result<Option<String>, CmdError> {
    let info = cmd::run(
        &format!("sudo iw dev {iface} info"),
        &format!("Get iface {iface} info"),
        true,
        None,
    )?;
    Ok(parse_iface_type(&info))
}

/// Switch an interface between monitor and managed. Returns whether the
/// mode change command succeeded.
pub fn set_iface_type(iface: &str, iface_type: &str) -> Result<bool, CmdError> {
    let result = cmd::run_raw(
        &format!("sudo iw dev {iface} set type {iface_type}"),
        &format!("Set iface {iface} type {iface_type}"),
        None,
    )?;
    if result.returncode != 0 {
        warn!("Cannot set {iface} type {iface_type}: {}", result.stderr);
        return Ok(false);
    }
    Ok(true)
}

fn parse_iface_type(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("type "))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon_with_freq(freq: &str) -> Beacon {
        Beacon {
            freq: freq.to_string(),
            ..Beacon::default()
        }
    }

    // ── Channel selection ───────────────────────────────────────────

    #[test]
    fn mode_all_selects_whole_plan() {
        assert_eq!(select_channels(MonitorMode::All, &[]).len(), CHANNEL_PLAN.len());
    }

    #[test]
    fn band_modes_filter_by_band() {
        let five = select_channels(MonitorMode::Band(Band::Ghz5), &[]);
        assert!(five.iter().all(|c| c.band == Band::Ghz5));
        assert_eq!(five.len(), 23);

        let two = select_channels(MonitorMode::Band(Band::Ghz2_4), &[]);
        assert_eq!(two.len(), 11);

        let six = select_channels(MonitorMode::Band(Band::Ghz6), &[]);
        assert_eq!(six.len(), 14);
    }

    #[test]
    fn scan_mode_matches_observed_frequencies() {
        let last_scan = vec![
            beacon_with_freq("5.18 GHz"),
            beacon_with_freq("5.2 GHz"),
            // A duplicate should not produce a duplicate channel
            beacon_with_freq("5.18 GHz"),
        ];
        let targets = select_channels(MonitorMode::Scan, &last_scan);
        let chs: Vec<u16> = targets.iter().map(|c| c.primary_ch).collect();
        assert_eq!(chs, vec![36, 40]);
    }

    #[test]
    fn scan_mode_with_empty_scan_selects_nothing() {
        assert!(select_channels(MonitorMode::Scan, &[]).is_empty());
    }

    #[test]
    fn scan_mode_preserves_plan_order() {
        let last_scan = vec![
            beacon_with_freq("2.412 GHz"),
            beacon_with_freq("5.975 GHz"),
            beacon_with_freq("5.18 GHz"),
        ];
        let targets = select_channels(MonitorMode::Scan, &last_scan);
        let bands: Vec<Band> = targets.iter().map(|c| c.band).collect();
        assert_eq!(bands, vec![Band::Ghz6, Band::Ghz5, Band::Ghz2_4]);
    }

    // ── Mode parsing ────────────────────────────────────────────────

    #[test]
    fn mode_round_trips_through_strings() {
        for s in ["all", "2.4ghz", "5ghz", "6ghz", "scan"] {
            let mode: MonitorMode = s.parse().unwrap();
            assert_eq!(mode.to_string(), s);
        }
        assert!("bluetooth".parse::<MonitorMode>().is_err());
    }

    // ── Interface info parsing ──────────────────────────────────────

    #[test]
    fn iface_type_parses_from_info_output() {
        let info = "Interface wlan1\n\tifindex 4\n\twdev 0x1\n\taddr aa:bb:cc:dd:ee:ff\n\ttype monitor\n\twiphy 0\n";
        assert_eq!(parse_iface_type(info).as_deref(), Some("monitor"));
        assert_eq!(parse_iface_type("no type line"), None);
    }
}
