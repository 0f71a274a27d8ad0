//! MIDI Pro Adapter monitor
//!
//! Opens the configured adapters, polls them at the device interval and
//! prints every input report that changes.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::*;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_pro_adapter::config::{AppConfig, DeviceConfig};
use midi_pro_adapter::device::open_device;
use midi_pro_adapter::handshake::{
    HANDSHAKE_LEN, SELECTOR_DISABLE, SELECTOR_ENABLE, SELECTOR_OFFSET,
};
use midi_pro_adapter::midi::{format_hex, list_input_ports};
use midi_pro_adapter::report::Report;
use midi_pro_adapter::usb::{SetupPacket, StallingFallback, UsbDevice};

/// GET_REPORT size used when reading the handshake answer back
const HANDSHAKE_CHUNK: usize = 8;

/// MIDI Pro Adapter - emulate the Rock Band 3 adapter from a MIDI instrument
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Device to emulate as <type>:<port> (repeatable, replaces the config file's list)
    #[arg(short, long = "device", value_name = "TYPE:PORT")]
    devices: Vec<DeviceConfig>,

    /// Connect --device entries to an existing port matching their name
    /// instead of publishing a virtual port
    #[arg(long)]
    connect: bool,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Send the enable or disable handshake on startup and print the answer
    #[arg(long, value_enum)]
    handshake: Option<HandshakeCommand>,

    /// Poll once, print the reports and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    /// Devices given on the command line, with `--connect` applied
    fn cli_devices(&self) -> Vec<DeviceConfig> {
        self.devices
            .iter()
            .cloned()
            .map(|mut device| {
                if self.connect {
                    device.virtual_port = false;
                }
                device
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HandshakeCommand {
    Enable,
    Disable,
}

impl HandshakeCommand {
    fn selector(self) -> u8 {
        match self {
            HandshakeCommand::Enable => SELECTOR_ENABLE,
            HandshakeCommand::Disable => SELECTOR_DISABLE,
        }
    }
}

/// One emulated adapter and the last report printed for it
struct Monitor {
    label: String,
    device: Box<dyn UsbDevice>,
    last: Option<Report>,
}

impl Monitor {
    fn open(index: usize, config: &DeviceConfig) -> Self {
        let device = open_device(config, Box::new(StallingFallback));
        let identity = device.identity();
        let label = format!("{} #{}", config.kind, index + 1);

        println!(
            "{} {} {} on '{}'",
            "[DEVICE]".green(),
            label.bold(),
            format!("{:04x}:{:04x}", identity.vendor_id, identity.product_id).dimmed(),
            config.port_name()
        );

        Self {
            label,
            device,
            last: None,
        }
    }

    /// Drive the SET_REPORT + GET_REPORT sequence a console sends
    fn run_handshake(&mut self, command: HandshakeCommand) {
        let mut payload = [0u8; HANDSHAKE_LEN];
        payload[SELECTOR_OFFSET] = command.selector();
        let outcome = self
            .device
            .handle_control(&SetupPacket::set_report(HANDSHAKE_LEN as u16), &mut payload);
        debug!("{} handshake SET_REPORT: {:?}", self.label, outcome);

        let mut response = Vec::with_capacity(HANDSHAKE_LEN);
        while response.len() < HANDSHAKE_LEN {
            let mut chunk = [0u8; HANDSHAKE_CHUNK];
            self.device
                .handle_control(&SetupPacket::get_report(HANDSHAKE_CHUNK as u16), &mut chunk);
            response.extend_from_slice(&chunk);
        }

        println!(
            "{} {} {:?}: {}",
            "[HANDSHAKE]".cyan(),
            self.label.bold(),
            command,
            format_hex(&response)
        );
    }

    /// Poll and print the report if it changed (or always, with `force`)
    fn poll(&mut self, force: bool) {
        let report = self.device.poll();
        if !force && self.last.as_ref() == Some(&report) {
            return;
        }

        println!(
            "{} {}",
            format!("[{}]", self.label).bright_blue(),
            render_report(&report, self.last.as_ref())
        );
        self.last = Some(report);
    }
}

/// Hex dump with the bytes that changed since `previous` highlighted
fn render_report(report: &Report, previous: Option<&Report>) -> String {
    report
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, &byte)| {
            let text = format!("{:02X}", byte);
            match previous {
                Some(prev) if prev.byte(i) != byte => text.bright_yellow().bold().to_string(),
                _ => text,
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting MIDI Pro Adapter v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(&args.config).await?;
    config.override_devices(args.cli_devices());
    config.validate()?;

    if config.devices.is_empty() {
        anyhow::bail!(
            "No devices configured: add `devices:` to {} or pass --device <type>:<port>",
            args.config
        );
    }

    let mut monitors: Vec<Monitor> = config
        .devices
        .iter()
        .enumerate()
        .map(|(index, device)| Monitor::open(index, device))
        .collect();

    if let Some(command) = args.handshake {
        for monitor in &mut monitors {
            monitor.run_handshake(command);
        }
    }

    if args.once {
        for monitor in &mut monitors {
            monitor.poll(true);
        }
        return Ok(());
    }

    let interval = Duration::from_millis(config.poll_interval_ms);
    run_poll_loop(&mut monitors, interval, shutdown_signal()).await;

    info!("MIDI Pro Adapter shutdown complete");
    Ok(())
}

async fn run_poll_loop(
    monitors: &mut [Monitor],
    period: Duration,
    shutdown: impl std::future::Future<Output = ()>,
) {
    info!(
        "Polling {} device(s) every {}ms",
        monitors.len(),
        period.as_millis()
    );

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for monitor in monitors.iter_mut() {
                    monitor.poll(false);
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping poll loop");
                break;
            }
        }
    }
}

fn list_ports_formatted() {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    println!("\n{}", "Input Ports:".bold());
    match list_input_ports() {
        Ok(ports) if ports.is_empty() => println!("  {}", "No input ports found".dimmed()),
        Ok(ports) => {
            for port in ports {
                println!("  {} {}", "[INPUT]".green(), port);
            }
        }
        Err(e) => println!("  {} {}", "[ERROR]".red(), e),
    }

    println!();
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midi_pro_adapter::instrument::guitar;

    #[test]
    fn test_args_parse_devices() {
        let args = Args::try_parse_from([
            "midi-pro-adapter",
            "--device",
            "guitar:RPCS3 Guitar",
            "-d",
            "keyboard",
            "--handshake",
            "enable",
            "--once",
        ])
        .unwrap();

        assert_eq!(args.devices.len(), 2);
        assert_eq!(args.devices[0].port_name(), "RPCS3 Guitar");
        assert!(matches!(args.handshake, Some(HandshakeCommand::Enable)));
        assert!(args.once);
    }

    #[test]
    fn test_devices_publish_virtual_ports_by_default() {
        let args = Args::try_parse_from(["midi-pro-adapter", "--device", "guitar:Mustang"]).unwrap();

        assert!(!args.connect);
        assert!(args.cli_devices()[0].virtual_port);
    }

    #[test]
    fn test_connect_flag_uses_existing_ports() {
        let args = Args::try_parse_from([
            "midi-pro-adapter",
            "--connect",
            "--device",
            "guitar:Mustang",
            "--device",
            "keyboard:Keytar",
        ])
        .unwrap();

        let devices = args.cli_devices();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|device| !device.virtual_port));
        assert_eq!(devices[0].port_name(), "Mustang");
        assert_eq!(devices[1].port_name(), "Keytar");
    }

    #[test]
    fn test_args_reject_bad_device() {
        assert!(Args::try_parse_from(["midi-pro-adapter", "--device", "drums:Kit"]).is_err());
    }

    #[test]
    fn test_render_report_without_previous_is_plain_hex() {
        assert_eq!(
            render_report(&guitar::BASELINE, None),
            guitar::BASELINE.to_string()
        );
    }
}
