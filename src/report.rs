//! Node status reporting: uplink MAC, connected SSID, interface inventory.

use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use log::error;
use regex::Regex;
use serde::Serialize;

use crate::cmd::{self, CmdError};

static RE_SSID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SSID: *(.+)").expect("ssid regex")
});

/// One network interface as reported in the heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfaceInfo {
    pub name: String,
    pub up: bool,
    pub ip_address: Option<String>,
    pub mac_address: String,
}

/// Periodic heartbeat payload.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub mac: String,
    pub ssid: String,
    pub ifaces: Vec<IfaceInfo>,
    pub timestamp: String,
}

/// Gather a status report for the node, identified by its uplink NIC's MAC.
pub fn status(nic: &str, wifi_iface: &str) -> Result<StatusReport, CmdError> {
    Ok(StatusReport {
        mac: node_mac(nic),
        ssid: ssid(wifi_iface)?,
        ifaces: interfaces()?,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
    })
}

/// The node identity: the uplink NIC's MAC address, uppercased with dash
/// separators. Falls back to all zeros when the NIC cannot be read.
pub fn node_mac(nic: &str) -> String {
    match std::fs::read_to_string(format!("/sys/class/net/{nic}/address")) {
        Ok(addr) => addr.trim().to_uppercase().replace(':', "-"),
        Err(err) => {
            error!("Cannot retrieve {nic} MAC address: {err}");
            "00-00-00-00-00-00".to_string()
        }
    }
}

/// SSID of the currently connected network, or "NONE".
pub fn ssid(iface: &str) -> Result<String, CmdError> {
    let output = cmd::run(
        &format!("sudo iw dev {iface} link"),
        "Get connected Wi-Fi link",
        true,
        None,
    )?;
    Ok(parse_ssid(&output))
}

/// Enumerate non-loopback interfaces with their state, MAC, and IPv4.
pub fn interfaces() -> Result<Vec<IfaceInfo>, CmdError> {
    let links = cmd::run("ip -o link show", "Listing network interfaces", true, None)?;
    let addrs = cmd::run("ip -o -4 addr show", "Listing interface addresses", true, None)?;
    Ok(parse_interfaces(&links, &addrs))
}

fn parse_ssid(link_output: &str) -> String {
    RE_SSID
        .captures(link_output)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| "NONE".to_string())
}

fn parse_interfaces(links: &str, addrs: &str) -> Vec<IfaceInfo> {
    let mut out = Vec::new();
    for line in links.lines() {
        // "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ... link/ether dc:a6:32:01:02:03 brd ..."
        let mut fields = line.split_whitespace();
        let Some(name) = fields.nth(1).map(|n| n.trim_end_matches(':')) else {
            continue;
        };
        if name.is_empty() || name == "lo" {
            continue;
        }
        let flags = fields.next().unwrap_or("");
        let up = flags
            .trim_matches(['<', '>'])
            .split(',')
            .any(|flag| flag == "UP");
        let mac = line
            .split_whitespace()
            .skip_while(|f| *f != "link/ether")
            .nth(1)
            .unwrap_or("")
            .to_string();
        let ip_address = ipv4_for(addrs, name);
        out.push(IfaceInfo {
            name: name.to_string(),
            up,
            ip_address,
            mac_address: mac,
        });
    }
    out
}

fn ipv4_for(addrs: &str, name: &str) -> Option<String> {
    addrs.lines().find_map(|line| {
        // "2: eth0    inet 192.168.1.7/24 brd 192.168.1.255 ..."
        let mut fields = line.split_whitespace();
        if fields.nth(1) != Some(name) || fields.next() != Some("inet") {
            return None;
        }
        fields
            .next()
            .and_then(|cidr| cidr.split('/').next())
            .map(str::to_string)
    })
}
