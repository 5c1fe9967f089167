//! Beacon scan and link-state parsing.
//!
//! Drives the host scan utility (`iwlist`) and link query (`iw dev … link`)
//! and turns their text into beacon records. The parsing contract is fixed:
//! whitespace runs collapse to single spaces, the scan text splits on the
//! literal token `"Cell"`, and one regex per field extracts values from each
//! segment. IE hex transcripts are handed to [`crate::ie`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::cmd::{self, CmdError, CmdHandle};
use crate::ie::{self, Ie};

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("whitespace regex")
});
static RE_BSSID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Address: *([0-9A-F:]+)").expect("bssid regex")
});
static RE_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Channel: *(\d+)").expect("channel regex")
});
static RE_FREQ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Frequency: *([\d\.]+ ?.Hz)").expect("frequency regex")
});
static RE_RSSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Signal level= *([-\d\.]+ ?dBm)").expect("rssi regex")
});
static RE_SSID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ESSID: *"([^"]+)""#).expect("ssid regex")
});
static RE_RATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+ Mb/s").expect("rates regex")
});
static RE_IE_HEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"IE: +Unknown: +([0-9A-F]+)").expect("ie hex regex")
});

static RE_CONNECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Connected to ([0-9a-f:]{17})").expect("connected regex")
});
static RE_TX_BITRATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"tx bitrate: *(.+)").expect("tx bitrate regex")
});
static RE_RX_BITRATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rx bitrate: *(.+)").expect("rx bitrate regex")
});
static RE_LINK_RSSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"signal: *([-\d\.]+ ?dBm)").expect("link rssi regex")
});
static RE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2},\d+[+-]\d{2}:\d{2}").expect("timestamp regex")
});

/// One observed beacon.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Beacon {
    pub bssid: String,
    pub channel: String,
    pub freq: String,
    pub rssi: String,
    pub ssid: String,
    pub connected: bool,
    pub rates: Vec<String>,
    pub tx_bitrate: String,
    pub rx_bitrate: String,
    pub extras: Vec<Ie>,
}

/// Connected-link state extracted from the link query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStatus {
    pub bssid: String,
    pub tx_bitrate: String,
    pub rx_bitrate: String,
}

/// One sample from the periodic link query loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSample {
    pub timestamp: String,
    pub rssi: String,
    pub tx_bitrate: String,
    pub rx_bitrate: String,
}

/// Scan beacons on an interface and mark the connected one.
pub fn scan(iface: &str) -> Result<Vec<Beacon>, CmdError> {
    let results = cmd::run(
        &format!("sudo iwlist {iface} scanning"),
        "Scanning Wi-Fi beacons",
        false,
        None,
    )?;
    let result_conn = cmd::run(
        &format!("sudo iw dev {iface} link"),
        "Get connected Wi-Fi",
        true,
        None,
    )?;
    Ok(process_scan_results(&results, &process_link(&result_conn)))
}

/// Handles for a scan paired with a delayed link query, so the link sample
/// lands mid-way through a concurrent performance test instead of at its
/// start. Resolve with [`resolve_scan_async`].
pub struct ScanAsync {
    scan: CmdHandle,
    link: CmdHandle,
}

/// Start a beacon scan and a link query delayed by `link_wait` seconds.
pub fn scan_async(iface: &str, link_wait: u32) -> Result<ScanAsync, CmdError> {
    // Sanitize the delayed command first so a rejection cannot leak an
    // already-spawned scan handle
    let link_cmd = format!("sleep {link_wait}; sudo iw dev {iface} link");
    cmd::sanitize(&link_cmd)?;
    Ok(ScanAsync {
        scan: cmd::run_async(
            &format!("sudo iwlist {iface} scanning"),
            "Scanning Wi-Fi beacons asynchronously",
        )?,
        link: cmd::run_async(&link_cmd, "Get connected Wi-Fi link")?,
    })
}

/// Resolve a paired asynchronous scan into beacon records.
pub fn resolve_scan_async(pair: ScanAsync) -> Vec<Beacon> {
    let results = pair
        .scan
        .resolve("Resolving Wi-Fi beacon scan", false, None, false);
    let result_conn = pair.link.resolve("Resolving Wi-Fi link", false, None, false);
    process_scan_results(&results, &process_link(&result_conn))
}

/// Start a loop that prints a nanosecond-precision timestamp and a link
/// query once per second. Resolve with [`resolve_link_async`].
pub fn link_async(iface: &str) -> Result<CmdHandle, CmdError> {
    cmd::run_async(
        &format!("while true; do sleep 1; date -Ins; sudo iw dev {iface} link; done"),
        "Continuously get Wi-Fi link",
    )
}

/// Stop the link query loop and extract its samples.
pub fn resolve_link_async(handle: CmdHandle) -> Vec<LinkSample> {
    let results = handle.resolve("Resolving repeated Wi-Fi link call", false, None, true);
    process_link_results(&results)
}

/// Extract the connected BSSID (uppercased) and current bitrates from link
/// query output.
pub fn process_link(result: &str) -> LinkStatus {
    let mut link = LinkStatus::default();
    if let Some(c) = RE_CONNECTED.captures(result) {
        link.bssid = c[1].to_uppercase();
    }
    if let Some(c) = RE_TX_BITRATE.captures(result) {
        link.tx_bitrate = c[1].to_string();
    }
    if let Some(c) = RE_RX_BITRATE.captures(result) {
        link.rx_bitrate = c[1].to_string();
    }
    link
}

/// Extract the parallel timestamp/RSSI/bitrate streams from the link loop
/// transcript into samples.
///
/// The arrays are zipped positionally; the sample count follows the rx
/// bitrate lines (the last line of each block), and a disagreement between
/// the streams truncates to the shortest.
pub fn process_link_results(results: &str) -> Vec<LinkSample> {
    let timestamps: Vec<&str> = RE_TIMESTAMP.find_iter(results).map(|m| m.as_str()).collect();
    let rssis: Vec<&str> = capture_all(&RE_LINK_RSSI, results);
    let tx_bitrates: Vec<&str> = capture_all(&RE_TX_BITRATE, results);
    let rx_bitrates: Vec<&str> = capture_all(&RE_RX_BITRATE, results);

    let mut samples = Vec::new();
    for (i, rx_bitrate) in rx_bitrates.iter().enumerate() {
        let (Some(timestamp), Some(rssi), Some(tx_bitrate)) =
            (timestamps.get(i), rssis.get(i), tx_bitrates.get(i))
        else {
            break;
        };
        samples.push(LinkSample {
            timestamp: timestamp.replace(',', "."),
            rssi: rssi.to_string(),
            tx_bitrate: tx_bitrate.to_string(),
            rx_bitrate: rx_bitrate.to_string(),
        });
    }
    samples
}

/// Parse beacon-scan text into records, marking the beacon that matches the
/// connected BSSID. Only segments with a BSSID are emitted.
pub fn process_scan_results(results: &str, wifi_link: &LinkStatus) -> Vec<Beacon> {
    let collapsed = RE_WHITESPACE.replace_all(results, " ");
    let mut cells = Vec::new();

    for entry in collapsed.split("Cell") {
        let mut cell = Beacon::default();
        if let Some(c) = RE_BSSID.captures(entry) {
            cell.bssid = c[1].to_string();
        }
        if let Some(c) = RE_CHANNEL.captures(entry) {
            cell.channel = c[1].to_string();
        }
        if let Some(c) = RE_FREQ.captures(entry) {
            cell.freq = c[1].to_string();
        }
        if let Some(c) = RE_RSSI.captures(entry) {
            cell.rssi = c[1].to_string();
        }
        if let Some(c) = RE_SSID.captures(entry) {
            cell.ssid = c[1].to_string();
        }
        cell.rates = RE_RATES
            .find_iter(entry)
            .map(|m| m.as_str().to_string())
            .collect();
        cell.extras = RE_IE_HEX
            .captures_iter(entry)
            .map(|c| ie::read_beacon_ie(&c[1]))
            .collect();

        if cell.bssid.is_empty() {
            continue;
        }
        if !wifi_link.bssid.is_empty() && cell.bssid.eq_ignore_ascii_case(&wifi_link.bssid) {
            cell.connected = true;
            cell.tx_bitrate = wifi_link.tx_bitrate.clone();
            cell.rx_bitrate = wifi_link.rx_bitrate.clone();
        }
        cells.push(cell);
    }
    cells
}

fn capture_all<'t>(re: &Regex, text: &'t str) -> Vec<&'t str> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN_TEXT: &str = r#"wlan0     Scan completed :
          Cell 01 - Address: AA:BB:CC:DD:EE:01
                    Channel:36
                    Frequency:5.18 GHz (Channel 36)
                    Quality=70/70  Signal level=-40 dBm
                    Encryption key:on
                    ESSID:"LabNet"
                    Bit Rates:6 Mb/s; 9 Mb/s; 12 Mb/s
                    IE: Unknown: 0B050A00804000
                    IE: Unknown: C005012A00FAFF
          Cell 02 - Address: AA:BB:CC:DD:EE:02
                    Channel:40
                    Frequency:5.2 GHz (Channel 40)
                    Quality=60/70  Signal level=-52 dBm
                    ESSID:"FieldNet"
                    Bit Rates:24 Mb/s; 36 Mb/s
                    IE: Unknown: 23020D05
"#;

    const LINK_TEXT: &str = "Connected to aa:bb:cc:dd:ee:02 (on wlan0)
\tSSID: FieldNet
\tfreq: 5200
\tsignal: -52 dBm
\ttx bitrate: 866.7 MBit/s VHT-MCS 9 80MHz short GI VHT-NSS 2
\trx bitrate: 780.0 MBit/s VHT-MCS 8 80MHz short GI VHT-NSS 2
";

    // ── Scan parsing ────────────────────────────────────────────────

    #[test]
    fn scan_text_parses_into_beacons() {
        let beacons = process_scan_results(SCAN_TEXT, &LinkStatus::default());
        assert_eq!(beacons.len(), 2);

        let first = &beacons[0];
        assert_eq!(first.bssid, "AA:BB:CC:DD:EE:01");
        assert_eq!(first.channel, "36");
        assert_eq!(first.freq, "5.18 GHz");
        assert_eq!(first.rssi, "-40 dBm");
        assert_eq!(first.ssid, "LabNet");
        assert_eq!(first.rates, vec!["6 Mb/s", "9 Mb/s", "12 Mb/s"]);
        assert!(!first.connected);
        assert_eq!(first.tx_bitrate, "");

        // IE records appear in text order
        assert_eq!(first.extras.len(), 2);
        assert_eq!(first.extras[0].id, 11);
        assert_eq!(first.extras[0].ie_type, "BSS Load");
        assert_eq!(first.extras[0].raw, "0B050A00804000");
        assert_eq!(first.extras[1].id, 192);
        assert_eq!(first.extras[1].ie_type, "VHT Operation");
    }

    #[test]
    fn scan_parse_is_idempotent() {
        let link = process_link(LINK_TEXT);
        let first = process_scan_results(SCAN_TEXT, &link);
        let second = process_scan_results(SCAN_TEXT, &link);
        assert_eq!(first, second);
    }

    #[test]
    fn emitted_bssids_are_uppercase_mac_format() {
        let beacons = process_scan_results(SCAN_TEXT, &LinkStatus::default());
        let re = Regex::new(r"^([0-9A-F]{2}:){5}[0-9A-F]{2}$").unwrap();
        for b in &beacons {
            assert!(re.is_match(&b.bssid), "{:?}", b.bssid);
        }
    }

    #[test]
    fn connected_beacon_gets_marked_with_bitrates() {
        let link = process_link(LINK_TEXT);
        let beacons = process_scan_results(SCAN_TEXT, &link);
        assert!(!beacons[0].connected);
        assert!(beacons[1].connected);
        assert_eq!(
            beacons[1].tx_bitrate,
            "866.7 MBit/s VHT-MCS 9 80MHz short GI VHT-NSS 2"
        );
        assert_eq!(
            beacons[1].rx_bitrate,
            "780.0 MBit/s VHT-MCS 8 80MHz short GI VHT-NSS 2"
        );
        assert_eq!(beacons.iter().filter(|b| b.connected).count(), 1);
    }

    #[test]
    fn segments_without_bssid_are_dropped() {
        let beacons = process_scan_results("wlan0  Scan completed :\n  nothing here\n", &LinkStatus::default());
        assert!(beacons.is_empty());
    }

    #[test]
    fn disconnected_link_marks_nothing() {
        let beacons = process_scan_results(SCAN_TEXT, &process_link("Not connected."));
        assert_eq!(beacons.iter().filter(|b| b.connected).count(), 0);
    }

    // ── Asynchronous scan pairing ───────────────────────────────────

    #[test]
    fn scan_async_rejects_delays_the_sanitizer_does_not_allow() {
        // Only the literal "sleep 1;" is on the sanitizer allow-list, so
        // any other delay aborts before anything spawns
        assert!(matches!(
            scan_async("wlan0", 5),
            Err(crate::cmd::CmdError::Unsafe(_))
        ));
        assert!(matches!(
            scan_async("wlan0", 0),
            Err(crate::cmd::CmdError::Unsafe(_))
        ));
    }

    #[test]
    fn scan_async_with_one_second_wait_spawns_and_resolves() {
        // The spawned commands fail soft without the host utilities; the
        // pairing itself must pass the sanitizer and resolve to an empty
        // beacon list
        let pair = scan_async("wlan0", 1).expect("one-second delay should pass the sanitizer");
        assert!(resolve_scan_async(pair).is_empty());
    }

    // ── Link parsing ────────────────────────────────────────────────

    #[test]
    fn link_text_parses_uppercased_bssid_and_bitrates() {
        let link = process_link(LINK_TEXT);
        assert_eq!(link.bssid, "AA:BB:CC:DD:EE:02");
        assert_eq!(
            link.tx_bitrate,
            "866.7 MBit/s VHT-MCS 9 80MHz short GI VHT-NSS 2"
        );
        assert_eq!(
            link.rx_bitrate,
            "780.0 MBit/s VHT-MCS 8 80MHz short GI VHT-NSS 2"
        );
    }

    #[test]
    fn empty_link_output_parses_to_default() {
        assert_eq!(process_link(""), LinkStatus::default());
    }

    // ── Link loop samples ───────────────────────────────────────────

    fn loop_block(ts: &str, rssi: i32, tx: &str, rx: &str) -> String {
        format!(
            "{ts}\nConnected to aa:bb:cc:dd:ee:02 (on wlan0)\n\tsignal: {rssi} dBm\n\ttx bitrate: {tx}\n\trx bitrate: {rx}\n"
        )
    }

    #[test]
    fn link_loop_samples_extract_with_dot_timestamps() {
        let text = loop_block(
            "2024-03-01T12:34:56,123456789+00:00",
            -51,
            "866.7 MBit/s",
            "780.0 MBit/s",
        ) + &loop_block(
            "2024-03-01T12:34:57,223456789+00:00",
            -53,
            "780.0 MBit/s",
            "650.0 MBit/s",
        );
        let samples = process_link_results(&text);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, "2024-03-01T12:34:56.123456789+00:00");
        assert_eq!(samples[0].rssi, "-51 dBm");
        assert_eq!(samples[0].tx_bitrate, "866.7 MBit/s");
        assert_eq!(samples[1].rx_bitrate, "650.0 MBit/s");
    }

    #[test]
    fn link_loop_truncates_to_rx_bitrate_count() {
        // The last block is cut off before its rx bitrate line, so it is
        // dropped entirely; the output follows the rx count
        let text = loop_block(
            "2024-03-01T12:34:56,123456789+00:00",
            -51,
            "866.7 MBit/s",
            "780.0 MBit/s",
        ) + "2024-03-01T12:34:57,223456789+00:00\n\tsignal: -53 dBm\n\ttx bitrate: 780.0 MBit/s\n";
        let samples = process_link_results(&text);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].rx_bitrate, "780.0 MBit/s");
    }

    #[test]
    fn link_loop_with_more_rx_lines_truncates_to_shortest_stream() {
        // An rx line with no matching timestamp cannot form a sample
        let text = "\trx bitrate: 780.0 MBit/s\n\trx bitrate: 650.0 MBit/s\n";
        assert!(process_link_results(text).is_empty());
    }
}
