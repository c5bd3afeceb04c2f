//! Interactive menu for operators on a serial line or SSH session.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::diagnostics::{DEFAULT_PING_COUNT, DEFAULT_PING_HOST};
use crate::ledger::SavedNetwork;
use crate::manager::WifiManager;
use crate::scan::{truncate_ssid, write_network_table};

const MENU: &str = "\
Main Menu:
1. Scan for networks
2. Connect to network
3. Show current connection
4. List saved networks
5. Forget network
6. Run network diagnostics
7. Run ping test
8. Exit";

/// Runs the menu loop until the operator exits or input ends.
pub fn run_console<R: BufRead, W: Write>(manager: &WifiManager, mut input: R, mut out: W) -> Result<()> {
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "WiFi Manager Console")?;
    writeln!(out, "{}", "=".repeat(60))?;

    loop {
        writeln!(out, "\n{MENU}")?;
        writeln!(out, "{}", "-".repeat(60))?;
        let Some(choice) = prompt(&mut input, &mut out, "Enter your choice (1-8): ")? else {
            break;
        };

        match choice.as_str() {
            "1" => scan(manager, &mut out)?,
            "2" => connect(manager, &mut input, &mut out)?,
            "3" => current(manager, &mut out)?,
            "4" => {
                writeln!(out, "\n--- Saved Networks ---")?;
                saved(manager, &mut out)?;
            }
            "5" => forget(manager, &mut input, &mut out)?,
            "6" => diagnostics(manager, &mut out)?,
            "7" => ping(manager, &mut input, &mut out)?,
            "8" => break,
            _ => writeln!(out, "\nInvalid choice. Please enter a number between 1 and 8.")?,
        }
    }

    writeln!(out, "\nExiting WiFi Manager console...")?;
    Ok(())
}

/// Prints `message` and reads one trimmed line; `None` at end of input.
fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, message: &str) -> io::Result<Option<String>> {
    write!(out, "{message}")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn report<W: Write>(out: &mut W, success: bool, message: &str) -> io::Result<()> {
    let mark = if success { "✓" } else { "✗" };
    writeln!(out, "{mark} {message}")
}

fn scan<W: Write>(manager: &WifiManager, out: &mut W) -> Result<()> {
    writeln!(out, "\nScanning for networks...")?;
    let networks = manager.scan();
    if !networks.is_empty() {
        writeln!(out, "\nFound {} networks:", networks.len())?;
    }
    write_network_table(out, &networks)?;
    Ok(())
}

fn connect<R: BufRead, W: Write>(manager: &WifiManager, input: &mut R, out: &mut W) -> Result<()> {
    writeln!(out, "\n--- Connect to Network ---")?;
    scan(manager, out)?;

    let Some(ssid) = prompt(input, out, "\nEnter network SSID (or 'c' to cancel): ")? else {
        return Ok(());
    };
    if ssid.eq_ignore_ascii_case("c") {
        return Ok(());
    }
    if ssid.is_empty() {
        writeln!(out, "Error: SSID cannot be empty")?;
        return Ok(());
    }

    let password = prompt(input, out, "Enter password (leave empty for open networks): ")?
        .unwrap_or_default();

    writeln!(out, "\nConnecting to '{ssid}'...")?;
    let outcome = manager.connect(&ssid, Some(password.as_str()).filter(|p| !p.is_empty()));
    report(out, outcome.success, &outcome.message)?;
    Ok(())
}

fn current<W: Write>(manager: &WifiManager, out: &mut W) -> Result<()> {
    writeln!(out, "\n--- Current Connection ---")?;
    match manager.current() {
        Some(current) => {
            writeln!(out, "Network:    {}", current.ssid)?;
            if current.connection_name != current.ssid {
                writeln!(out, "Profile:    {}", current.connection_name)?;
            }
            writeln!(out, "IP Address: {}", current.ip_address)?;
        }
        None => writeln!(out, "Not connected to any network")?,
    }
    Ok(())
}

/// Prints the numbered saved list and returns it for selection.
fn saved<W: Write>(manager: &WifiManager, out: &mut W) -> Result<Vec<SavedNetwork>> {
    let saved = manager.saved_networks()?;
    if saved.is_empty() {
        writeln!(out, "No saved networks")?;
        return Ok(saved);
    }

    let current_ssid = manager.current().map(|c| c.ssid);

    writeln!(out, "{}", "-".repeat(60))?;
    writeln!(out, "{:<4} {:<40} {}", "#", "SSID", "STATUS")?;
    writeln!(out, "{}", "-".repeat(60))?;
    for (idx, network) in saved.iter().enumerate() {
        let status = if current_ssid.as_deref() == Some(network.ssid.as_str()) {
            "(Connected)"
        } else {
            ""
        };
        writeln!(out, "{:<4} {:<40} {}", idx + 1, truncate_ssid(&network.ssid, 38), status)?;
    }
    writeln!(out, "{}", "-".repeat(60))?;

    Ok(saved)
}

fn forget<R: BufRead, W: Write>(manager: &WifiManager, input: &mut R, out: &mut W) -> Result<()> {
    writeln!(out, "\n--- Forget Network ---")?;
    let saved = saved(manager, out)?;
    if saved.is_empty() {
        return Ok(());
    }

    let Some(choice) = prompt(input, out, "\nEnter network number to forget (or 'c' to cancel): ")? else {
        return Ok(());
    };
    if choice.eq_ignore_ascii_case("c") {
        return Ok(());
    }

    let network = match choice.parse::<usize>() {
        Ok(idx) if (1..=saved.len()).contains(&idx) => &saved[idx - 1],
        Ok(_) => {
            writeln!(out, "Invalid network number")?;
            return Ok(());
        }
        Err(_) => {
            writeln!(out, "Invalid input")?;
            return Ok(());
        }
    };

    let confirm = prompt(input, out, &format!("Forget '{}'? (y/n): ", network.ssid))?;
    if !matches!(confirm.as_deref(), Some("y" | "Y")) {
        writeln!(out, "Cancelled")?;
        return Ok(());
    }

    let outcome = manager.forget(&network.ssid);
    report(out, outcome.success, &outcome.message)?;
    Ok(())
}

fn diagnostics<W: Write>(manager: &WifiManager, out: &mut W) -> Result<()> {
    writeln!(out, "\n--- Network Diagnostics ---")?;
    let snapshot = manager.collect_diagnostics();

    writeln!(out, "\nInterface Status:")?;
    for (name, report) in &snapshot.interfaces {
        writeln!(out, "  {name}: {:?}", report.status)?;
    }

    if !snapshot.connection_stats.is_empty() {
        writeln!(out, "\nConnection Statistics:")?;
        for (key, value) in &snapshot.connection_stats {
            writeln!(out, "  {key}: {value}")?;
        }
    }

    writeln!(out, "\nGateway: {}", snapshot.gateway)?;
    writeln!(out, "DNS Servers: {}", snapshot.dns_servers.join(", "))?;
    Ok(())
}

fn ping<R: BufRead, W: Write>(manager: &WifiManager, input: &mut R, out: &mut W) -> Result<()> {
    writeln!(out, "\n--- Ping Test ---")?;

    let host = prompt(input, out, &format!("Enter host to ping (default: {DEFAULT_PING_HOST}): "))?
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_PING_HOST.to_string());
    let count = prompt(input, out, &format!("Enter number of pings (default: {DEFAULT_PING_COUNT}): "))?
        .and_then(|c| c.parse().ok())
        .unwrap_or(DEFAULT_PING_COUNT);

    writeln!(out, "\nPinging {host}...")?;
    let result = manager.ping(&host, count);

    if result.success {
        writeln!(out, "\n✓ Ping successful")?;
        if let Some(loss) = &result.packet_loss {
            writeln!(out, "Packet Loss: {loss}")?;
        }
        if let (Some(min), Some(avg), Some(max)) = (&result.min_time, &result.avg_time, &result.max_time) {
            writeln!(out, "Min: {min}\nAvg: {avg}\nMax: {max}")?;
        }
        writeln!(out, "\nFull output:\n{}", result.output)?;
    } else {
        writeln!(out, "\n✗ Ping failed")?;
        writeln!(out, "Error: {}", result.output)?;
    }
    Ok(())
}
