//! sigscout library — Wi-Fi observation core for field measurement nodes.
//!
//! Runs on small Linux nodes (Raspberry Pi class, Ethernet uplink plus one
//! or two radios) and characterizes the local wireless environment: beacon
//! scans with bit-accurate 802.11 Information Element decoding, and
//! channel-hopping monitor-mode packet capture. Every observation is
//! obtained by driving host utilities (`iwlist`, `iw`, `tcpdump`, `zip`),
//! so shared command execution sits at the bottom of the stack.
//!
//! Module layout, leaf first:
//! - `cmd`: external command runner (sync with timeout, async with
//!   process-group cancellation, command sanitizer)
//! - `ie`: pure IE hex decoder (BSS Load, TPC, HT/VHT/HE, vendor elements)
//! - `freq`: frequency token conversion and MAC formatting
//! - `channels`: the static channel plan for monitor sweeps
//! - `scan`: beacon scan and link query parsing on top of `cmd` and `ie`
//! - `monitor`: channel-hopping capture orchestration and archival
//! - `latency`: ping probes to a remote target and the gateway
//! - `report`: node heartbeat (uplink MAC, SSID, interface inventory)
//!
//! Platform binaries (the agent CLI) are thin consumers that schedule these
//! calls and persist results; cloud uplinks live outside this crate.

pub mod channels;
pub mod cmd;
pub mod freq;
pub mod ie;
pub mod latency;
pub mod monitor;
pub mod report;
pub mod scan;
