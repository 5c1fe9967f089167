//! End-to-end monitor sweep against stub host utilities.
//!
//! Builds a temporary bin directory with fake `sudo`, `iw`, `tcpdump`, and
//! `zip`, prepends it to PATH, and runs a real sweep in a temporary working
//! directory. Everything lives in one test because PATH and the working
//! directory are process-wide.

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use sigscout::monitor::{self, MonitorMode};
use sigscout::scan::Beacon;

fn write_stub(bin: &Path, name: &str, body: &str) {
    let path = bin.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn beacon_with_freq(freq: &str) -> Beacon {
    Beacon {
        freq: freq.to_string(),
        ..Beacon::default()
    }
}

#[test]
fn monitor_sweep_tunes_captures_and_archives() {
    let work = tempfile::tempdir().unwrap();
    let bin = work.path().join("bin");
    fs::create_dir_all(&bin).unwrap();

    // sudo forwards to the stubbed utilities
    write_stub(&bin, "sudo", "#!/bin/sh\nexec \"$@\"\n");
    // iw records every call and refuses to tune channel 48 (5240 MHz)
    write_stub(
        &bin,
        "iw",
        "#!/bin/sh\necho \"$@\" >> iw_calls.log\ncase \"$*\" in\n  *\"set freq 5240\"*) echo refused >&2; exit 1;;\nesac\nexit 0\n",
    );
    // tcpdump touches its -w target, then waits for the resolve SIGINT
    write_stub(
        &bin,
        "tcpdump",
        "#!/bin/sh\nwhile [ \"$1\" != \"-w\" ]; do shift; done\n: > \"$2\"\nsleep 30\n",
    );
    // zip records its argv and creates the archive file
    write_stub(
        &bin,
        "zip",
        "#!/bin/sh\necho \"$@\" >> zip_calls.log\n: > \"$1\"\n",
    );

    env::set_var(
        "PATH",
        format!("{}:{}", bin.display(), env::var("PATH").unwrap_or_default()),
    );
    env::set_current_dir(work.path()).unwrap();

    // mode=scan with an empty last scan plans nothing and archives nothing
    assert_eq!(
        monitor::monitor("mon0", 0, 765, MonitorMode::Scan, &[]).unwrap(),
        None
    );
    assert!(!Path::new("iw_calls.log").exists());

    // Five observed frequencies map to channels 36..52; tuning fails on 48
    let last_scan = vec![
        beacon_with_freq("5.18 GHz"),
        beacon_with_freq("5.2 GHz"),
        beacon_with_freq("5.22 GHz"),
        beacon_with_freq("5.24 GHz"),
        beacon_with_freq("5.26 GHz"),
    ];
    let archive = monitor::monitor("mon0", 1, 765, MonitorMode::Scan, &last_scan)
        .unwrap()
        .expect("an archive should be produced");

    assert!(archive.exists(), "{} missing", archive.display());
    assert!(archive.starts_with("logs/pcap-log"));

    // Tuning was attempted for every selected channel, in plan order
    let iw_calls = fs::read_to_string("iw_calls.log").unwrap();
    let tunes: Vec<&str> = iw_calls
        .lines()
        .filter(|l| l.contains("set freq"))
        .collect();
    assert_eq!(tunes.len(), 5);
    assert!(tunes[0].contains("set freq 5180 40 5190"));
    assert!(tunes[3].contains("set freq 5240 40 5230"));

    // The failed channel produced no capture; the sweep carried on to 52
    let zip_calls = fs::read_to_string("zip_calls.log").unwrap();
    for ch in [36, 40, 44, 52] {
        assert!(
            zip_calls.contains(&format!("capture_5ghz_{ch}_40.pcap")),
            "channel {ch} missing from archive"
        );
    }
    assert!(!zip_calls.contains("capture_5ghz_48_40.pcap"));

    // Archived capture files are deleted after a successful zip
    for ch in [36, 40, 44, 52] {
        assert!(!Path::new(&format!("capture_5ghz_{ch}_40.pcap")).exists());
    }
}
