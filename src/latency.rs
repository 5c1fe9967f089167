//! Latency probes over the active link.
//!
//! Pings a remote target and the interface's gateway (found in the routing
//! table) and parses the `ping -D` output into structured reports. Epoch
//! timestamps convert to ISO-8601 UTC. Throughput probes (iperf3,
//! speedtest) live outside this crate; latency is probed here because it
//! only needs the host `ping` utility.

use std::sync::LazyLock;

use log::{info, warn};
use regex::Regex;
use serde::Serialize;

use crate::cmd::{self, CmdError, CmdHandle};

static RE_DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"PING (\S+) \(").expect("ping destination regex")
});
static RE_RESPONSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+)\.(\d+)\] \d+ bytes from (\S+?):? icmp_seq=(\d+) ttl=(\d+) time=([\d\.]+) ms")
        .expect("ping response regex")
});
static RE_STATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) received.*?([\d\.]+)% packet loss")
        .expect("ping statistics regex")
});
static RE_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rtt min/avg/max/mdev = ([\d\.]+)/([\d\.]+)/([\d\.]+)/([\d\.]+) ms")
        .expect("ping rtt regex")
});

/// One echo reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingResponse {
    pub timestamp: String,
    pub response_ip: String,
    pub icmp_seq: u32,
    pub ttl: u32,
    pub time_ms: f64,
}

/// Parsed result of one ping run. The rtt summary is absent when no reply
/// came back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingReport {
    pub destination: String,
    pub packets_transmitted: u32,
    pub packets_received: u32,
    pub packet_loss_percent: f64,
    pub round_trip_ms_min: Option<f64>,
    pub round_trip_ms_avg: Option<f64>,
    pub round_trip_ms_max: Option<f64>,
    pub round_trip_ms_stddev: Option<f64>,
    pub responses: Vec<PingResponse>,
}

/// Gateway IPv4 of an interface, from the routing table.
pub fn gateway_ip(iface: &str) -> Result<Option<String>, CmdError> {
    info!("Fetching gateway IP of {iface}");
    let routes = cmd::run("ip route", "Fetching gateway IP", true, None)?;
    Ok(parse_gateway_ip(&routes, iface))
}

/// Ping a remote target and the interface's gateway `count` times each.
/// Returns one report per destination, target first; empty when the
/// interface has no gateway.
pub fn ping(iface: &str, target: &str, count: u32) -> Result<Vec<PingReport>, CmdError> {
    let Some(gateway) = gateway_ip(iface)? else {
        warn!("Cannot find gateway for {iface}");
        return Ok(Vec::new());
    };
    info!("Running ping to target {target} and gateway {gateway}");

    let mut reports = Vec::new();
    for dest in [target, gateway.as_str()] {
        let results = cmd::run(
            &format!("ping {dest} -Dc {count}"),
            &format!("Running ping to {dest}"),
            false,
            None,
        )?;
        reports.push(process_ping_results(&results));
    }
    Ok(reports)
}

/// Paired handles for continuous pings to a target and the gateway, meant
/// to run alongside a performance test. Resolve with
/// [`resolve_ping_async`].
pub struct PingAsync {
    target: CmdHandle,
    gateway: CmdHandle,
}

/// Start continuous pings to a target and the interface's gateway. Returns
/// None when the interface has no gateway.
pub fn ping_async(iface: &str, target: &str) -> Result<Option<PingAsync>, CmdError> {
    let Some(gateway) = gateway_ip(iface)? else {
        warn!("Cannot find gateway for {iface}");
        return Ok(None);
    };
    info!("Running asynchronous ping to target {target} and gateway {gateway}");
    Ok(Some(PingAsync {
        target: cmd::run_async(&format!("ping {target} -D"), &format!("Running ping to {target}"))?,
        gateway: cmd::run_async(
            &format!("ping {gateway} -D"),
            &format!("Running ping to {gateway}"),
        )?,
    }))
}

/// Stop the continuous pings and parse their reports, target first.
pub fn resolve_ping_async(pair: PingAsync) -> Vec<PingReport> {
    let target = pair.target.resolve("Resolving ping to target", false, None, true);
    let gateway = pair.gateway.resolve("Resolving ping to gateway", false, None, true);
    vec![process_ping_results(&target), process_ping_results(&gateway)]
}

fn parse_gateway_ip(routes: &str, iface: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r"default via (\d+\.\d+\.\d+\.\d+) dev {}",
        regex::escape(iface)
    ))
    .ok()?;
    re.captures(routes).map(|c| c[1].to_string())
}

/// Parse `ping -D` output into a report. Missing sections leave their
/// fields zeroed or absent; this never fails.
pub fn process_ping_results(results: &str) -> PingReport {
    let destination = RE_DESTINATION
        .captures(results)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    let responses = RE_RESPONSE
        .captures_iter(results)
        .map(|c| PingResponse {
            timestamp: epoch_to_iso(&c[1], &c[2]),
            response_ip: c[3].to_string(),
            icmp_seq: c[4].parse().unwrap_or(0),
            ttl: c[5].parse().unwrap_or(0),
            time_ms: c[6].parse().unwrap_or(0.0),
        })
        .collect();

    let (packets_transmitted, packets_received, packet_loss_percent) = RE_STATS
        .captures(results)
        .map(|c| {
            (
                c[1].parse().unwrap_or(0),
                c[2].parse().unwrap_or(0),
                c[3].parse().unwrap_or(0.0),
            )
        })
        .unwrap_or((0, 0, 0.0));

    let rtt = RE_RTT.captures(results);
    let rtt_field = |i: usize| rtt.as_ref().and_then(|c| c[i].parse().ok());

    PingReport {
        destination,
        packets_transmitted,
        packets_received,
        packet_loss_percent,
        round_trip_ms_min: rtt_field(1),
        round_trip_ms_avg: rtt_field(2),
        round_trip_ms_max: rtt_field(3),
        round_trip_ms_stddev: rtt_field(4),
        responses,
    }
}

/// Convert a `ping -D` epoch timestamp (seconds and fraction captured as
/// separate digit runs) to ISO-8601 UTC. Unconvertible input stays as the
/// raw token.
fn epoch_to_iso(secs: &str, frac: &str) -> String {
    let Ok(secs_n) = secs.parse::<i64>() else {
        return format!("{secs}.{frac}");
    };
    let mut digits = frac.to_string();
    digits.truncate(9);
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos = digits.parse::<u32>().unwrap_or(0);
    match chrono::DateTime::from_timestamp(secs_n, nanos) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, false),
        None => format!("{secs}.{frac}"),
    }
}
