//! WiFi network scanning module.
//!
//! Lists the networks visible to the client interface using NetworkManager's
//! `nmcli` tool and renders them for the console.
//!
//! # Scanning Process
//!
//! 1. Optionally triggers a rescan with `nmcli device wifi rescan` and waits
//!    for the radio to finish a scan cycle (2 seconds)
//! 2. Retrieves the list of discovered networks in terse `SSID:SIGNAL:SECURITY` form
//! 3. Parses and deduplicates the results (first occurrence of an SSID wins)
//! 4. Sorts networks by signal strength (strongest first, ties keep scan order)

use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::CommandRunner;
use crate::parse;

/// Time the radio is given to complete a scan cycle after a rescan request.
pub const RESCAN_GRACE: Duration = Duration::from_secs(2);

/// Binary encryption classification of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Security {
    Open,
    Secured,
}

impl Security {
    pub fn as_str(&self) -> &'static str {
        match self {
            Security::Open => "Open",
            Security::Secured => "Secured",
        }
    }
}

/// A network seen in the most recent scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleNetwork {
    /// The SSID (network name), never empty.
    pub ssid: String,

    /// Signal strength as a percentage (0-100).
    pub signal: u8,

    pub security: Security,
}

/// Produces the list of networks visible to one interface.
pub struct NetworkScanner {
    runner: Arc<dyn CommandRunner>,
    interface: String,
    grace: Duration,
}

impl NetworkScanner {
    pub fn new(runner: Arc<dyn CommandRunner>, interface: impl Into<String>) -> Self {
        Self {
            runner,
            interface: interface.into(),
            grace: RESCAN_GRACE,
        }
    }

    /// Overrides the wait between a rescan request and the listing.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Lists the networks currently known to NetworkManager.
    ///
    /// A failing `nmcli` call yields an empty list: no data is the declared
    /// failure mode of a scan.
    ///
    /// # Command Executed
    /// ```bash
    /// nmcli -t -f SSID,SIGNAL,SECURITY device wifi list ifname <interface>
    /// ```
    pub fn scan(&self) -> Vec<VisibleNetwork> {
        let output = self.runner.run_argv(&[
            "nmcli",
            "-t",
            "-f",
            "SSID,SIGNAL,SECURITY",
            "device",
            "wifi",
            "list",
            "ifname",
            self.interface.as_str(),
        ]);

        if !output.success() {
            warn!(
                interface = %self.interface,
                stderr = %output.stderr,
                "wifi list failed, reporting no networks"
            );
            return Vec::new();
        }

        let networks = collect_networks(&output.stdout);
        debug!(interface = %self.interface, count = networks.len(), "scan complete");
        networks
    }

    /// Asks the radio for a fresh scan, waits for it, then lists networks.
    ///
    /// # Command Executed
    /// ```bash
    /// nmcli device wifi rescan ifname <interface>
    /// ```
    ///
    /// The rescan result is ignored: it fails when the radio is already
    /// scanning, and the listing still returns the latest cached results.
    pub fn rescan(&self) -> Vec<VisibleNetwork> {
        let _ = self.runner.run_argv(&[
            "nmcli",
            "device",
            "wifi",
            "rescan",
            "ifname",
            self.interface.as_str(),
        ]);

        if !self.grace.is_zero() {
            thread::sleep(self.grace);
        }

        self.scan()
    }
}

/// Parses a terse scan listing into a deduplicated, signal-sorted list.
pub fn collect_networks(stdout: &str) -> Vec<VisibleNetwork> {
    // The same SSID is reported once per access point
    let mut seen = HashSet::new();
    let mut networks: Vec<VisibleNetwork> = stdout
        .lines()
        .filter_map(parse::scan_line)
        .filter(|network| seen.insert(network.ssid.clone()))
        .collect();

    // Stable sort, so equal signals keep scan order
    networks.sort_by(|a, b| b.signal.cmp(&a.signal));
    networks
}

/// Writes networks as a numbered table.
///
/// # Output Format
/// ```text
/// #    SSID                             SIGNAL      SECURITY
/// ------------------------------------------------------------
/// 1    MyHomeNetwork                     95% ████ Secured
/// 2    OpenCafe                          45% ██░░ Open
/// ```
pub fn write_network_table<W: Write>(out: &mut W, networks: &[VisibleNetwork]) -> io::Result<()> {
    if networks.is_empty() {
        writeln!(out, "No networks found.")?;
        return Ok(());
    }

    writeln!(out, "{:<4} {:<32} {:>11} {}", "#", "SSID", "SIGNAL", "SECURITY")?;
    writeln!(out, "{}", "-".repeat(60))?;

    for (idx, network) in networks.iter().enumerate() {
        writeln!(
            out,
            "{:<4} {:<32} {:>5}% {} {}",
            idx + 1,
            truncate_ssid(&network.ssid, 32),
            network.signal,
            signal_to_bar(network.signal),
            network.security.as_str()
        )?;
    }

    Ok(())
}

/// Truncates an SSID to `max_len` characters, ending in "..." when cut.
pub fn truncate_ssid(ssid: &str, max_len: usize) -> String {
    if ssid.chars().count() > max_len {
        let kept: String = ssid.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        ssid.to_string()
    }
}

/// Four-segment bar for a signal percentage.
fn signal_to_bar(signal: u8) -> &'static str {
    match signal {
        80..=100 => "████",
        60..=79 => "███░",
        40..=59 => "██░░",
        20..=39 => "█░░░",
        _ => "░░░░",
    }
}
