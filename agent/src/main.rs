//! sigscout agent — CLI driver for the observation library.
//!
//! Thin consumer wiring the library to the OS: runs beacon scans, monitor
//! sweeps, link sampling, and heartbeat reports, and persists results as
//! NDJSON under the log directory. Scheduling (systemd timers, cron) and
//! cloud uplinks live outside this binary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use log::{info, warn};

use sigscout::latency;
use sigscout::monitor::{self, MonitorMode, DEFAULT_PACKET_SIZE};
use sigscout::report;
use sigscout::scan;

#[derive(Parser)]
#[command(name = "sigscout-agent", version, about = "Wi-Fi field measurement agent")]
struct Cli {
    /// Directory for persisted scan logs and heartbeats
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan beacons on an interface and print the records
    Scan {
        iface: String,
        /// Append the result to the scan log instead of printing
        #[arg(long)]
        persist: bool,
        /// Query the link this many seconds into the scan instead of after
        /// it (only the one-second delay passes the command sanitizer)
        #[arg(long)]
        link_wait: Option<u32>,
    },
    /// Sweep channels in monitor mode and archive the captures
    Monitor {
        iface: String,
        /// Dwell time per channel in seconds
        #[arg(long, default_value_t = 10)]
        duration: u64,
        /// all | 2.4ghz | 5ghz | 6ghz | scan
        #[arg(long, default_value = "all", value_parser = parse_mode)]
        mode: MonitorMode,
        /// tcpdump snapshot length in bytes
        #[arg(long, default_value_t = DEFAULT_PACKET_SIZE)]
        packet_size: u32,
        /// Interface to beacon-scan first when mode is "scan"
        #[arg(long)]
        scan_iface: Option<String>,
        /// Switch the interface back to managed after the sweep
        #[arg(long)]
        restore_managed: bool,
    },
    /// Sample the connected link once per second for a duration
    Link {
        iface: String,
        /// Sampling window in seconds
        #[arg(long, default_value_t = 10)]
        duration: u64,
    },
    /// Probe latency to a remote target and the gateway
    Ping {
        iface: String,
        /// Remote probe target
        #[arg(long, default_value = "9.9.9.9")]
        target: String,
        /// Echo requests per destination
        #[arg(long, default_value_t = 5)]
        count: u32,
    },
    /// Write a node status heartbeat
    Status {
        /// NIC whose MAC identifies this node
        #[arg(long, default_value = "eth0")]
        nic: String,
        /// Wireless interface to read the connected SSID from
        #[arg(long, default_value = "wlan0")]
        iface: String,
    },
}

fn parse_mode(s: &str) -> Result<MonitorMode, String> {
    s.parse()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Scan {
            iface,
            persist,
            link_wait,
        } => run_scan(&iface, &cli.log_dir, persist, link_wait),
        Command::Monitor {
            iface,
            duration,
            mode,
            packet_size,
            scan_iface,
            restore_managed,
        } => run_monitor(&iface, duration, mode, packet_size, scan_iface.as_deref(), restore_managed),
        Command::Link { iface, duration } => run_link(&iface, duration),
        Command::Ping {
            iface,
            target,
            count,
        } => run_ping(&iface, &target, count),
        Command::Status { nic, iface } => run_status(&nic, &iface, &cli.log_dir),
    }
}

fn run_scan(iface: &str, log_dir: &Path, persist: bool, link_wait: Option<u32>) -> Result<()> {
    let beacons = match link_wait {
        Some(wait) => scan::resolve_scan_async(scan::scan_async(iface, wait)?),
        None => scan::scan(iface)?,
    };
    info!("{} beacons observed on {iface}", beacons.len());

    let entry = serde_json::json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        "beacons": beacons,
    });
    if persist {
        let dir = log_dir.join("wifi-scan");
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join("scan_log.json");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        writeln!(file, "{entry}")?;
        info!("Scan appended to {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    Ok(())
}

fn run_monitor(
    iface: &str,
    duration: u64,
    mode: MonitorMode,
    packet_size: u32,
    scan_iface: Option<&str>,
    restore_managed: bool,
) -> Result<()> {
    let last_scan = match (mode, scan_iface) {
        (MonitorMode::Scan, Some(scan_iface)) => scan::scan(scan_iface)?,
        (MonitorMode::Scan, None) => {
            bail!("mode \"scan\" needs --scan-iface to observe beacons first")
        }
        _ => Vec::new(),
    };

    if monitor::iface_type(iface)?.as_deref() != Some("monitor") {
        info!("Switching {iface} to monitor mode");
        if !monitor::set_iface_type(iface, "monitor")? {
            bail!("cannot switch {iface} to monitor mode");
        }
    }

    let archive = monitor::monitor(iface, duration, packet_size, mode, &last_scan)?;
    match &archive {
        Some(path) => info!("Capture bundle written to {}", path.display()),
        None => warn!("No captures archived"),
    }

    if restore_managed && !monitor::set_iface_type(iface, "managed")? {
        warn!("Cannot restore {iface} to managed mode");
    }
    Ok(())
}

fn run_link(iface: &str, duration: u64) -> Result<()> {
    let handle = scan::link_async(iface)?;
    thread::sleep(Duration::from_secs(duration));
    let samples = scan::resolve_link_async(handle);
    info!("{} link samples collected on {iface}", samples.len());
    println!("{}", serde_json::to_string_pretty(&samples)?);
    Ok(())
}

fn run_ping(iface: &str, target: &str, count: u32) -> Result<()> {
    let reports = latency::ping(iface, target, count)?;
    if reports.is_empty() {
        bail!("no gateway found for {iface}");
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn run_status(nic: &str, iface: &str, log_dir: &Path) -> Result<()> {
    let heartbeat = report::status(nic, iface)?;
    fs::create_dir_all(log_dir).with_context(|| format!("creating {}", log_dir.display()))?;
    let path = log_dir.join("heartbeat.json");
    fs::write(&path, serde_json::to_string_pretty(&heartbeat)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Heartbeat written to {}", path.display());
    Ok(())
}
