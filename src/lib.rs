//! WiFi Manager library for headless devices.
//!
//! Drives NetworkManager's `nmcli` (plus `ip`, `iwconfig` and `ping`) to
//! discover, join and forget wireless networks on a device with one client
//! radio and one access-point radio, and keeps a small ledger of networks it
//! has joined.
//!
//! # Modules
//!
//! - [`command`] - Bounded execution of external commands behind a trait
//! - [`parse`] - Line grammars for the tools' text output
//! - [`scan`] - Visible network listing
//! - [`connection`] - Current connection, connect and forget
//! - [`diagnostics`] - Link, route and DNS snapshot, ping test
//! - [`ledger`] - Persisted saved-networks record
//! - [`manager`] - Facade used by the HTTP API and console
//! - [`config`] - Settings file
//! - [`server`] - HTTP API and web interface
//! - [`console`] - Interactive menu
//!
//! # Example Usage
//!
//! ```no_run
//! use wifi_manager::{config::Settings, WifiManager};
//!
//! let settings = Settings::load(None).expect("Invalid settings");
//! let manager = WifiManager::from_settings(&settings).expect("Setup failed");
//!
//! for network in manager.scan() {
//!     println!("{} {}%", network.ssid, network.signal);
//! }
//!
//! let outcome = manager.connect("Home", Some("password123"));
//! println!("{}", outcome.message);
//! ```

/// External command execution with a fixed timeout.
pub mod command;

/// Settings loaded from a TOML file.
pub mod config;

/// Connection state and the connect/forget transitions.
pub mod connection;

/// Interactive menu-driven console.
pub mod console;

/// Connectivity diagnostics.
pub mod diagnostics;

/// Error types for the library.
pub mod error;

/// Saved-networks ledger.
pub mod ledger;

/// Facade over the whole network-state layer.
pub mod manager;

/// Parsers for nmcli, ip, iwconfig and ping output.
pub mod parse;

/// WiFi network scanning.
pub mod scan;

/// HTTP API and web UI built on Axum.
pub mod server;

pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use connection::{CurrentConnection, Outcome};
pub use diagnostics::{DiagnosticsSnapshot, InterfaceStatus};
pub use error::WifiManagerError;
pub use ledger::{SavedNetwork, SavedNetworkLedger, TomlLedger};
pub use manager::WifiManager;
pub use scan::{Security, VisibleNetwork};
