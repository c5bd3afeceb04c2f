//! WiFi connection management module.
//!
//! Determines the active connection of the client interface and performs the
//! connect and forget transitions through NetworkManager's `nmcli` tool,
//! keeping the saved-networks ledger in step with every successful change.
//!
//! # Requirements
//!
//! - NetworkManager must be installed and running
//! - The `nmcli` and `ip` commands must be available in PATH
//! - The process must have permission to manage network connections
//!
//! # Serialization
//!
//! NetworkManager's create-then-activate sequence is not atomic, so `connect`
//! and `forget` hold an exclusive guard for their whole multi-step sequence.
//! Concurrent callers queue on that guard. Read-only queries do not take it.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::ledger::SavedNetworkLedger;
use crate::parse;

/// Address reported when the client interface has no IPv4 address.
pub const NOT_CONNECTED: &str = "Not connected";

/// Refusal returned when asked to forget the network currently in use.
pub const ACTIVE_NETWORK_REFUSAL: &str = "Cannot forget currently active network";

const ACTIVE_CONNECTIONS: &str = "nmcli -t -f NAME,TYPE,DEVICE connection show --active";

/// The connection currently bound to the client interface.
///
/// Derived from live state on every request. `connection_name` is the
/// NetworkManager profile name and may differ from `ssid` when a profile was
/// renamed; the SSID is what callers match on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentConnection {
    pub ssid: String,
    pub connection_name: String,
    pub ip_address: String,
}

/// Result of a state transition, carrying a message fit for the end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Owns the connect/forget transitions for the client interface.
pub struct ConnectionState {
    runner: Arc<dyn CommandRunner>,
    ledger: Arc<dyn SavedNetworkLedger>,
    interface: String,
    mutation: Mutex<()>,
}

impl ConnectionState {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        ledger: Arc<dyn SavedNetworkLedger>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            ledger,
            interface: interface.into(),
            mutation: Mutex::new(()),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Returns the connection bound to the client interface, if any.
    ///
    /// # Commands Executed
    /// ```bash
    /// nmcli -t -f NAME,TYPE,DEVICE connection show --active
    /// nmcli -t -f 802-11-wireless.ssid connection show <name>
    /// ```
    ///
    /// When the per-profile lookup fails the profile name stands in for the SSID.
    pub fn current(&self) -> Option<CurrentConnection> {
        let output = self.runner.run(ACTIVE_CONNECTIONS);
        if !output.success() {
            warn!(stderr = %output.stderr, "active connection listing failed");
            return None;
        }

        let profile = parse::active_profiles(&output.stdout)
            .into_iter()
            .find(|p| p.device == self.interface)?;

        let detail = self.runner.run_argv(&[
            "nmcli",
            "-t",
            "-f",
            "802-11-wireless.ssid",
            "connection",
            "show",
            profile.name.as_str(),
        ]);
        let ssid = detail
            .success()
            .then(|| parse::profile_ssid(&detail.stdout))
            .flatten()
            .unwrap_or_else(|| profile.name.clone());

        Some(CurrentConnection {
            ssid,
            connection_name: profile.name,
            ip_address: self.current_ip(),
        })
    }

    /// IPv4 address of the client interface, or [`NOT_CONNECTED`].
    ///
    /// # Command Executed
    /// ```bash
    /// ip -4 addr show <interface>
    /// ```
    pub fn current_ip(&self) -> String {
        let output = self
            .runner
            .run_argv(&["ip", "-4", "addr", "show", self.interface.as_str()]);

        output
            .success()
            .then(|| parse::ipv4_address(&output.stdout))
            .flatten()
            .unwrap_or_else(|| NOT_CONNECTED.to_string())
    }

    /// Joins `ssid`, optionally with a passphrase.
    ///
    /// - With a password, any existing profile for the SSID is deleted first
    ///   so the new credential replaces a possibly stale one, then a fresh
    ///   profile is created and activated.
    /// - Without a password, an existing profile is activated as is, otherwise
    ///   an open-network profile is created.
    ///
    /// The passphrase only ever travels in an argument vector. On success the
    /// ledger entry is created or touched; on failure the ledger is untouched.
    pub fn connect(&self, ssid: &str, password: Option<&str>) -> Outcome {
        if ssid.is_empty() {
            return Outcome::failed("SSID is required");
        }
        let password = password.filter(|p| !p.is_empty());

        let _guard = self.lock();
        let exists = self.profile_exists(ssid);

        let output = match password {
            Some(password) => {
                if exists {
                    let deleted = self.runner.run_argv(&["nmcli", "connection", "delete", ssid]);
                    if !deleted.success() {
                        warn!(ssid, stderr = %deleted.stderr, "could not delete stale profile");
                    }
                }
                self.runner.run_argv(&[
                    "nmcli",
                    "device",
                    "wifi",
                    "connect",
                    ssid,
                    "password",
                    password,
                    "ifname",
                    self.interface.as_str(),
                ])
            }
            None if exists => self.runner.run_argv(&[
                "nmcli",
                "connection",
                "up",
                ssid,
                "ifname",
                self.interface.as_str(),
            ]),
            None => self.runner.run_argv(&[
                "nmcli",
                "device",
                "wifi",
                "connect",
                ssid,
                "ifname",
                self.interface.as_str(),
            ]),
        };

        if !output.success() {
            warn!(ssid, exit_code = output.exit_code, "connect failed");
            return Outcome::failed(if output.stderr.is_empty() {
                "Failed to connect".to_string()
            } else {
                output.stderr
            });
        }

        // The radio is joined at this point; a ledger hiccup does not undo that.
        if let Err(e) = self.ledger.add_or_touch(ssid) {
            warn!(ssid, error = %e, "connected but could not record network");
        }

        info!(ssid, interface = %self.interface, "connected");
        Outcome::ok("Connected successfully")
    }

    /// Forgets `ssid`, unless it is the network currently in use.
    ///
    /// The NetworkManager profile is deleted and the ledger entry removed.
    /// A failing profile delete is tolerated on purpose: forgotten means
    /// absent from the ledger, and that holds whatever nmcli reports.
    pub fn forget(&self, ssid: &str) -> Outcome {
        if ssid.is_empty() {
            return Outcome::failed("SSID is required");
        }

        let _guard = self.lock();

        if self.current().is_some_and(|c| c.ssid == ssid) {
            info!(ssid, "refusing to forget active network");
            return Outcome::failed(ACTIVE_NETWORK_REFUSAL);
        }

        let deleted = self.runner.run_argv(&["nmcli", "connection", "delete", ssid]);
        if !deleted.success() {
            warn!(ssid, stderr = %deleted.stderr, "profile delete failed, removing ledger entry anyway");
        }

        match self.ledger.remove(ssid) {
            Ok(_) => {
                info!(ssid, "network forgotten");
                Outcome::ok("Network forgotten")
            }
            Err(e) => {
                warn!(ssid, error = %e, "could not update saved networks");
                Outcome::failed(format!("Failed to update saved networks: {e}"))
            }
        }
    }

    fn profile_exists(&self, ssid: &str) -> bool {
        self.runner
            .run_argv(&["nmcli", "connection", "show", ssid])
            .success()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
