//! Line grammars for the output of the external networking tools.
//!
//! Each function here owns exactly one output format. A line that does not
//! match its grammar is skipped, and a value that cannot be extracted comes
//! back as `None` or an empty collection; none of these functions fail.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::scan::{Security, VisibleNetwork};

/// One row of `nmcli -t -f NAME,TYPE,DEVICE connection show --active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProfile {
    pub name: String,
    pub kind: String,
    pub device: String,
}

/// Round trip summary of a `ping` run, values carry their unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundTrip {
    pub min: String,
    pub avg: String,
    pub max: String,
}

/// Splits an nmcli terse record on unescaped `:` separators.
///
/// nmcli escapes `:` and `\` inside values with a backslash; those escapes are
/// resolved in the returned fields.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next @ (':' | '\\')) => current.push(next),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parses one `SSID:SIGNAL:SECURITY` scan record.
///
/// Fewer than two fields or an empty SSID yields `None`. A missing or
/// non-numeric signal reads as 0; any non-empty security text means secured.
pub fn scan_line(line: &str) -> Option<VisibleNetwork> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let fields = split_terse(line);
    if fields.len() < 2 {
        return None;
    }

    let ssid = fields[0].trim();
    if ssid.is_empty() {
        return None;
    }

    let signal = fields[1]
        .trim()
        .parse::<u32>()
        .map(|s| s.min(100) as u8)
        .unwrap_or(0);

    let security = match fields.get(2).map(|s| s.trim()) {
        Some(flag) if !flag.is_empty() => Security::Secured,
        _ => Security::Open,
    };

    Some(VisibleNetwork {
        ssid: ssid.to_string(),
        signal,
        security,
    })
}

/// Parses the active connection listing. Rows without all three fields are dropped.
pub fn active_profiles(stdout: &str) -> Vec<ActiveProfile> {
    stdout
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line.trim());
            match fields.as_slice() {
                [name, kind, device, ..] if !name.trim().is_empty() => Some(ActiveProfile {
                    name: name.trim().to_string(),
                    kind: kind.trim().to_string(),
                    device: device.trim().to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Splits a `KEY:VALUE` line on its first colon.
pub fn key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Extracts `802-11-wireless.ssid` from a per-profile field dump.
pub fn profile_ssid(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter_map(key_value)
        .find(|(key, _)| *key == "802-11-wireless.ssid")
        .map(|(_, value)| value.to_string())
        .filter(|ssid| !ssid.is_empty())
}

/// First IPv4 address in `ip -4 addr show <iface>` output, without prefix length.
pub fn ipv4_address(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "inet" {
                let cidr = tokens.next()?;
                let addr = cidr.split('/').next()?;
                return addr.parse::<Ipv4Addr>().ok().map(|a| a.to_string());
            }
        }
        None
    })
}

/// Whether `ip link show <iface>` reports the link as `state UP`.
pub fn link_is_up(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        tokens.windows(2).any(|w| w[0] == "state" && w[1] == "UP")
    })
}

/// Picks the device state, bound profile and first IPv4 address out of a
/// `nmcli -t device show` dump.
pub fn device_fields(stdout: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for (key, value) in stdout.lines().filter_map(key_value) {
        if value.is_empty() {
            continue;
        }
        let name = match key {
            "GENERAL.STATE" => "state",
            "GENERAL.CONNECTION" => "connection",
            k if k.starts_with("IP4.ADDRESS") => "ip_address",
            _ => continue,
        };
        fields
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }
    fields
}

/// Signal level in dBm from `iwconfig <iface>` output.
pub fn signal_level(stdout: &str) -> Option<i32> {
    let start = stdout.find("Signal level")? + "Signal level".len();
    let rest = stdout[start..].trim_start_matches(['=', ':']);
    let end = rest
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Next hop of the default route in `ip route` output.
pub fn default_gateway(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|line| line.trim_start().starts_with("default"))
        .find_map(|line| {
            let mut tokens = line.split_whitespace();
            tokens.find(|t| *t == "via")?;
            tokens.next()?.parse::<IpAddr>().ok().map(|ip| ip.to_string())
        })
}

/// All non-empty `IP4.DNS[n]` values, in order.
pub fn dns_servers(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(key_value)
        .filter(|(key, value)| key.starts_with("IP4.DNS") && !value.is_empty())
        .map(|(_, value)| value.to_string())
        .collect()
}

/// Packet loss percentage from a `ping` summary, e.g. `"25%"`.
pub fn packet_loss(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .find_map(|part| part.strip_suffix(" packet loss"))
        .filter(|loss| loss.ends_with('%'))
        .map(str::to_string)
}

/// `min/avg/max` round trip times from a `ping` summary.
pub fn round_trip(stdout: &str) -> Option<RoundTrip> {
    let line = stdout.lines().find(|l| l.contains("min/avg/max"))?;
    let (_, values) = line.split_once('=')?;
    let mut values = values.split_whitespace();
    let numbers = values.next()?;
    let unit = values.next().unwrap_or("ms");
    let parts: Vec<&str> = numbers.split('/').collect();
    if parts.len() < 3 || parts[..3].iter().any(|p| p.parse::<f64>().is_err()) {
        return None;
    }
    Some(RoundTrip {
        min: format!("{} {unit}", parts[0]),
        avg: format!("{} {unit}", parts[1]),
        max: format!("{} {unit}", parts[2]),
    })
}
