//! Frequency token conversion and address formatting helpers.

use std::fmt;

use log::warn;

/// Radio band, labeled the way scan output and capture file names spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Ghz2_4,
    Ghz5,
    Ghz6,
}

impl Band {
    pub fn label(&self) -> &'static str {
        match self {
            Band::Ghz2_4 => "2.4ghz",
            Band::Ghz5 => "5ghz",
            Band::Ghz6 => "6ghz",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Convert a frequency token like `"2.412 GHz"` or `"2412 MHz"` to integer
/// MHz. Unknown units convert to 0 with a warning.
pub fn freq_str_to_mhz(token: &str) -> u32 {
    let trimmed = token.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (value, unit) = trimmed.split_at(split);

    let value: f64 = match value.parse() {
        Ok(v) => v,
        Err(_) => {
            warn!("Cannot parse frequency value in {token:?}");
            return 0;
        }
    };
    let factor = match unit.trim() {
        "GHz" => 1e3,
        "MHz" => 1.0,
        "kHz" => 1e-3,
        "Hz" => 1e-6,
        other => {
            warn!("Unknown frequency unit {other:?} in {token:?}");
            return 0;
        }
    };
    (value * factor).round() as u32
}

/// Check whether a frequency token falls inside a band.
pub fn freq_str_cmp(token: &str, band: Band) -> bool {
    let mhz = freq_str_to_mhz(token);
    match band {
        Band::Ghz2_4 => mhz < 2500,
        Band::Ghz5 => mhz > 5160 && mhz < 5925,
        Band::Ghz6 => mhz > 5925,
    }
}

/// Format a run of hex nibbles as an uppercase colon-separated MAC address,
/// e.g. `"aabbccddeeff"` to `"AA:BB:CC:DD:EE:FF"`.
pub fn hex_to_bssid(hex: &str) -> String {
    if hex.len() != 12 {
        warn!("Unexpected BSSID hex length {}: {hex:?}", hex.len());
    }
    let upper = hex.to_ascii_uppercase();
    let chars: Vec<char> = upper.chars().collect();
    chars
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── freq_str_to_mhz tests ───────────────────────────────────────

    #[test]
    fn ghz_token_converts() {
        assert_eq!(freq_str_to_mhz("2.412 GHz"), 2412);
        assert_eq!(freq_str_to_mhz("5.18 GHz"), 5180);
    }

    #[test]
    fn mhz_token_converts() {
        assert_eq!(freq_str_to_mhz("2412 MHz"), 2412);
    }

    #[test]
    fn khz_and_hz_tokens_convert() {
        assert_eq!(freq_str_to_mhz("2412000 kHz"), 2412);
        assert_eq!(freq_str_to_mhz("2412000000 Hz"), 2412);
    }

    #[test]
    fn token_without_space_converts() {
        assert_eq!(freq_str_to_mhz("5.2GHz"), 5200);
    }

    #[test]
    fn unknown_unit_converts_to_zero() {
        assert_eq!(freq_str_to_mhz("2.412 THz"), 0);
        assert_eq!(freq_str_to_mhz("garbage"), 0);
    }

    // ── freq_str_cmp tests ──────────────────────────────────────────

    #[test]
    fn band_comparison_bounds() {
        assert!(freq_str_cmp("2.462 GHz", Band::Ghz2_4));
        assert!(!freq_str_cmp("5.18 GHz", Band::Ghz2_4));
        assert!(freq_str_cmp("5.18 GHz", Band::Ghz5));
        assert!(!freq_str_cmp("5.925 GHz", Band::Ghz5));
        assert!(freq_str_cmp("5.975 GHz", Band::Ghz6));
        assert!(!freq_str_cmp("2.412 GHz", Band::Ghz6));
    }

    // ── hex_to_bssid tests ──────────────────────────────────────────

    #[test]
    fn hex_formats_as_uppercase_mac() {
        assert_eq!(hex_to_bssid("aabbccddeeff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(hex_to_bssid("0A1B2C3D4E5F"), "0A:1B:2C:3D:4E:5F");
    }

    #[test]
    fn short_hex_still_formats() {
        // Warns about the length but formats what it was given
        assert_eq!(hex_to_bssid("aabb"), "AA:BB");
    }

    #[test]
    fn band_labels() {
        assert_eq!(Band::Ghz2_4.label(), "2.4ghz");
        assert_eq!(Band::Ghz5.to_string(), "5ghz");
        assert_eq!(Band::Ghz6.to_string(), "6ghz");
    }
}
