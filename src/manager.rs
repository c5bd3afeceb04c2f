//! Facade over the scanner, connection state, diagnostics and ledger.
//!
//! This is the surface the HTTP API, the console and the one-shot CLI
//! commands talk to. Everything it returns is plain data.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::command::{CommandRunner, SystemRunner};
use crate::config::{Interfaces, Settings};
use crate::connection::{ConnectionState, CurrentConnection, Outcome};
use crate::diagnostics::{DiagnosticsCollector, DiagnosticsSnapshot, PingReport};
use crate::ledger::{SavedNetwork, SavedNetworkLedger, TomlLedger};
use crate::scan::{NetworkScanner, VisibleNetwork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub current: Option<CurrentConnection>,
    pub ip: String,
    pub saved_count: usize,
}

pub struct WifiManager {
    scanner: NetworkScanner,
    connections: ConnectionState,
    diagnostics: DiagnosticsCollector,
    ledger: Arc<dyn SavedNetworkLedger>,
}

impl WifiManager {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        ledger: Arc<dyn SavedNetworkLedger>,
        interfaces: &Interfaces,
    ) -> Self {
        Self {
            scanner: NetworkScanner::new(runner.clone(), &interfaces.client),
            connections: ConnectionState::new(runner.clone(), ledger.clone(), &interfaces.client),
            diagnostics: DiagnosticsCollector::new(
                runner,
                &interfaces.client,
                &interfaces.access_point,
            ),
            ledger,
        }
    }

    /// Wires the real command runner and the TOML ledger from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let ledger_path = settings.ledger_path()?;
        info!(
            client = %settings.interfaces.client,
            access_point = %settings.interfaces.access_point,
            ledger = %ledger_path.display(),
            "network manager ready"
        );
        Ok(Self::new(
            Arc::new(SystemRunner::new()),
            Arc::new(TomlLedger::new(ledger_path)),
            &settings.interfaces,
        ))
    }

    pub fn with_rescan_grace(mut self, grace: Duration) -> Self {
        self.scanner = self.scanner.with_grace(grace);
        self
    }

    pub fn client_interface(&self) -> &str {
        self.connections.interface()
    }

    pub fn scan(&self) -> Vec<VisibleNetwork> {
        self.scanner.scan()
    }

    pub fn rescan(&self) -> Vec<VisibleNetwork> {
        self.scanner.rescan()
    }

    pub fn current(&self) -> Option<CurrentConnection> {
        self.connections.current()
    }

    pub fn current_ip(&self) -> String {
        self.connections.current_ip()
    }

    pub fn connect(&self, ssid: &str, password: Option<&str>) -> Outcome {
        self.connections.connect(ssid, password)
    }

    pub fn forget(&self, ssid: &str) -> Outcome {
        self.connections.forget(ssid)
    }

    pub fn collect_diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.collect()
    }

    pub fn ping(&self, host: &str, count: u32) -> PingReport {
        self.diagnostics.ping(host, count)
    }

    pub fn saved_networks(&self) -> Result<Vec<SavedNetwork>> {
        self.ledger.list()
    }

    pub fn status(&self) -> Result<StatusSummary> {
        Ok(StatusSummary {
            current: self.current(),
            ip: self.current_ip(),
            saved_count: self.saved_networks()?.len(),
        })
    }
}
