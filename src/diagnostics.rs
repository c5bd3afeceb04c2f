//! Connectivity health snapshot for the client and access-point radios.
//!
//! A snapshot is assembled from several independent queries. Each one falls
//! back to its own default when it fails, so a broken routing table never
//! hides the interface or DNS picture.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::command::CommandRunner;
use crate::error::WifiManagerError;
use crate::parse;

pub const UNKNOWN_GATEWAY: &str = "Unknown";
pub const NO_DNS_SERVERS: &str = "None configured";

pub const DEFAULT_PING_HOST: &str = "8.8.8.8";
pub const DEFAULT_PING_COUNT: u32 = 4;
pub const MAX_PING_COUNT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterfaceStatus {
    Up,
    Down,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceReport {
    pub status: InterfaceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub interfaces: BTreeMap<String, InterfaceReport>,
    pub connection_stats: BTreeMap<String, String>,
    pub gateway: String,
    /// Never empty; `["None configured"]` when nothing was found.
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingReport {
    pub success: bool,
    pub host: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<String>,
}

impl PingReport {
    fn failed(host: &str, output: impl Into<String>) -> Self {
        Self {
            success: false,
            host: host.to_string(),
            output: output.into(),
            packet_loss: None,
            min_time: None,
            avg_time: None,
            max_time: None,
        }
    }
}

/// Read-only collector of link, route and DNS facts.
pub struct DiagnosticsCollector {
    runner: Arc<dyn CommandRunner>,
    client: String,
    access_point: String,
}

impl DiagnosticsCollector {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        client: impl Into<String>,
        access_point: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            client: client.into(),
            access_point: access_point.into(),
        }
    }

    pub fn collect(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            interfaces: self.interfaces(),
            connection_stats: self.connection_stats(),
            gateway: self.gateway(),
            dns_servers: self.dns_servers(),
        }
    }

    /// Link state of the client and access-point interfaces via `ip link show`.
    pub fn interfaces(&self) -> BTreeMap<String, InterfaceReport> {
        [&self.client, &self.access_point]
            .into_iter()
            .map(|name| {
                let output = self.runner.run_argv(&["ip", "link", "show", name.as_str()]);
                let status = if !output.success() {
                    InterfaceStatus::Missing
                } else if parse::link_is_up(&output.stdout) {
                    InterfaceStatus::Up
                } else {
                    InterfaceStatus::Down
                };
                debug!(interface = %name, ?status, "link state");
                (name.clone(), InterfaceReport { status })
            })
            .collect()
    }

    /// Device state, bound profile, IPv4 address and signal level of the client.
    ///
    /// # Commands Executed
    /// ```bash
    /// nmcli -t -f GENERAL.STATE,GENERAL.CONNECTION,IP4.ADDRESS device show <client>
    /// iwconfig <client>
    /// ```
    pub fn connection_stats(&self) -> BTreeMap<String, String> {
        let device = self.runner.run_argv(&[
            "nmcli",
            "-t",
            "-f",
            "GENERAL.STATE,GENERAL.CONNECTION,IP4.ADDRESS",
            "device",
            "show",
            self.client.as_str(),
        ]);
        let mut stats = if device.success() {
            parse::device_fields(&device.stdout)
        } else {
            warn!(interface = %self.client, stderr = %device.stderr, "device field query failed");
            BTreeMap::new()
        };

        let wireless = self.runner.run_argv(&["iwconfig", self.client.as_str()]);
        if let Some(level) = wireless
            .success()
            .then(|| parse::signal_level(&wireless.stdout))
            .flatten()
        {
            stats.insert("signal_strength".to_string(), format!("{level} dBm"));
        }

        stats
    }

    /// Next hop of the default route, or [`UNKNOWN_GATEWAY`].
    pub fn gateway(&self) -> String {
        let output = self.runner.run("ip route");
        if !output.success() {
            warn!(stderr = %output.stderr, "routing table query failed");
        }
        output
            .success()
            .then(|| parse::default_gateway(&output.stdout))
            .flatten()
            .unwrap_or_else(|| UNKNOWN_GATEWAY.to_string())
    }

    /// DNS servers configured on the client interface.
    pub fn dns_servers(&self) -> Vec<String> {
        let output = self
            .runner
            .run_argv(&["nmcli", "-t", "-f", "IP4.DNS", "device", "show", self.client.as_str()]);
        let servers = if output.success() {
            parse::dns_servers(&output.stdout)
        } else {
            Vec::new()
        };

        if servers.is_empty() {
            vec![NO_DNS_SERVERS.to_string()]
        } else {
            servers
        }
    }

    /// Pings `host` `count` times (clamped to 1..=20) and summarises the result.
    pub fn ping(&self, host: &str, count: u32) -> PingReport {
        let host = host.trim();
        if host.is_empty() || host.starts_with('-') || host.chars().any(char::is_whitespace) {
            let err = WifiManagerError::InvalidRequest(format!("invalid host '{host}'"));
            return PingReport::failed(host, err.to_string());
        }

        let count = count.clamp(1, MAX_PING_COUNT).to_string();
        let output = self.runner.run_argv(&["ping", "-c", count.as_str(), host]);

        if !output.success() {
            let text = if output.stderr.is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return PingReport::failed(host, text);
        }

        let round_trip = parse::round_trip(&output.stdout);
        PingReport {
            success: true,
            host: host.to_string(),
            packet_loss: parse::packet_loss(&output.stdout),
            min_time: round_trip.as_ref().map(|rt| rt.min.clone()),
            avg_time: round_trip.as_ref().map(|rt| rt.avg.clone()),
            max_time: round_trip.map(|rt| rt.max),
            output: output.stdout,
        }
    }
}
