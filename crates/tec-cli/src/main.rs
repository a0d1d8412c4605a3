//! `tecctl`: command-line control of a Meerstetter TEC-1089-SV
//!
//! # Usage
//!
//! One-off commands against a port given on the command line:
//! ```bash
//! tecctl --port /dev/ttyUSB0 identify
//! tecctl --port /dev/ttyUSB0 set-target 25.0
//! tecctl --port /dev/ttyUSB0 enable
//! tecctl --port /dev/ttyUSB0 poll --interval-ms 500 --count 20
//! ```
//!
//! Or against a device from a hardware config file:
//! ```bash
//! tecctl --config hardware.toml --device stage_tec status
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tec_core::capabilities::TemperatureControl;
use tec_core::config::HardwareConfig;
use tec_core::driver::DriverFactory;
use tec_core::error::TecError;
use tec_driver_meerstetter::{
    registers, DeviceErrorCode, DeviceSession, Tec1089Config, Tec1089Driver, Tec1089Factory,
    ValueKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tecctl")]
#[command(about = "Control a Meerstetter TEC-1089-SV over its serial port", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Hardware configuration file (TOML format)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Device id in the config file (default: first tec1089 device)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Serial port path, overrides the config file
    #[arg(long, global = true)]
    port: Option<String>,

    /// MeCom device address, overrides the config file
    #[arg(long, global = true)]
    address: Option<u8>,

    /// Baud rate, overrides the config file
    #[arg(long, global = true)]
    baud_rate: Option<u32>,

    /// Response timeout in milliseconds, overrides the config file
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports on this machine
    Ports,

    /// Connect and print the device identity
    Identify,

    /// Print every readback once
    Status,

    /// Read one quantity
    Get {
        /// What to read
        quantity: Quantity,
    },

    /// Set the target temperature in °C (does not enable the output)
    SetTarget {
        /// Target in °C
        #[arg(allow_negative_numbers = true)]
        celsius: f32,
    },

    /// Enable temperature control
    Enable,

    /// Disable temperature control
    Disable,

    /// Emergency stop
    Stop,

    /// Reset the controller
    Reset,

    /// Read a raw parameter by id
    ReadParam {
        /// Parameter id
        id: u16,
        /// How to decode the value (default: the register table's kind, else float)
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },

    /// Write a raw parameter by id
    WriteParam {
        /// Parameter id
        id: u16,
        /// New value
        #[arg(allow_negative_numbers = true)]
        value: String,
        /// How to encode the value (default: the register table's kind, else float)
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },

    /// Sample object temperature and stability at a fixed interval
    Poll {
        /// Time between samples
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
        /// Number of samples
        #[arg(long, default_value = "10")]
        count: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Quantity {
    ObjectTemperature,
    SinkTemperature,
    TargetTemperature,
    OutputCurrent,
    OutputVoltage,
    Stability,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Int,
    Float,
}

impl Kind {
    /// Explicit choice, else the kind the register table records for `id`.
    fn for_param(id: u16, explicit: Option<Kind>) -> Self {
        explicit.unwrap_or_else(|| match registers::by_id(id).map(|r| r.kind) {
            Some(ValueKind::Int32) => Kind::Int,
            _ => Kind::Float,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let hardware = match &cli.connection.config {
        Some(path) => Some(HardwareConfig::load(path)?),
        None => None,
    };
    init_logging(cli.verbose, hardware.as_ref());

    let result = run(cli, hardware).await;
    if let Err(e) = &result {
        if let Some(code) = e.downcast_ref::<TecError>().and_then(DeviceErrorCode::from_error) {
            eprintln!("device error {}", code);
        }
    }
    result
}

fn init_logging(verbose: bool, hardware: Option<&HardwareConfig>) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        hardware
            .and_then(|h| h.log_level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli, hardware: Option<HardwareConfig>) -> Result<()> {
    if let Commands::Ports = cli.command {
        return list_ports();
    }

    let config = resolve_config(&cli.connection, hardware.as_ref())?;
    let driver = Tec1089Driver::connect(&config).await?;
    tracing::info!(port = %config.port, identity = driver.identity(), "connected");

    let outcome = execute(&cli.command, &driver).await;

    if let Err(e) = driver.close().await {
        tracing::warn!(error = %e, "failed to close serial port");
    }
    outcome
}

/// Merge config file entry and command-line overrides into a driver config.
fn resolve_config(
    args: &ConnectionArgs,
    hardware: Option<&HardwareConfig>,
) -> Result<Tec1089Config> {
    let factory = Tec1089Factory;

    let mut table = match hardware {
        Some(hw) => {
            let device = hw
                .find_device(args.device.as_deref(), factory.driver_type())
                .ok_or_else(|| match &args.device {
                    Some(id) => anyhow!("no device '{}' in hardware config", id),
                    None => anyhow!("no {} device in hardware config", factory.driver_type()),
                })?;
            if device.driver_type() != Some(factory.driver_type()) {
                return Err(anyhow!(
                    "device '{}' is not a {} ({})",
                    device.id,
                    factory.driver_type(),
                    factory.name()
                ));
            }
            device.driver.clone()
        }
        None => toml::Table::new(),
    };

    if let Some(port) = &args.port {
        table.insert("port".into(), toml::Value::String(port.clone()));
    }
    if let Some(address) = args.address {
        table.insert("address".into(), toml::Value::Integer(address.into()));
    }
    if let Some(baud_rate) = args.baud_rate {
        table.insert("baud_rate".into(), toml::Value::Integer(baud_rate.into()));
    }
    if let Some(timeout_ms) = args.timeout_ms {
        let timeout_ms = i64::try_from(timeout_ms).context("timeout_ms out of range")?;
        table.insert("timeout_ms".into(), toml::Value::Integer(timeout_ms));
    }
    if !table.contains_key("port") {
        return Err(anyhow!("no serial port given (use --port or --config)"));
    }

    let value = toml::Value::Table(table);
    factory.validate(&value)?;
    value.try_into().context("Invalid TEC-1089 config")
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

async fn execute(command: &Commands, driver: &Tec1089Driver) -> Result<()> {
    let session = driver.session();

    match command {
        Commands::Ports => list_ports(),
        Commands::Identify => {
            println!("{}", driver.identity());
            Ok(())
        }
        Commands::Status => {
            println!("identity            {}", driver.identity());
            for quantity in [
                Quantity::ObjectTemperature,
                Quantity::SinkTemperature,
                Quantity::TargetTemperature,
                Quantity::OutputCurrent,
                Quantity::OutputVoltage,
                Quantity::Stability,
            ] {
                match read_quantity(session, quantity).await {
                    Ok(text) => println!("{:<20}{}", label(quantity), text),
                    Err(e) => println!("{:<20}error: {}", label(quantity), e),
                }
            }
            Ok(())
        }
        Commands::Get { quantity } => {
            println!("{}", read_quantity(session, *quantity).await?);
            Ok(())
        }
        Commands::SetTarget { celsius } => {
            driver.set_target_temperature(f64::from(*celsius)).await?;
            println!("target set to {:.3} °C", celsius);
            Ok(())
        }
        Commands::Enable => {
            driver.enable_control().await?;
            println!("temperature control enabled");
            Ok(())
        }
        Commands::Disable => {
            driver.disable_control().await?;
            println!("temperature control disabled");
            Ok(())
        }
        Commands::Stop => {
            session.stop().await?;
            println!("stopped");
            Ok(())
        }
        Commands::Reset => {
            session.reset().await?;
            println!("reset");
            Ok(())
        }
        Commands::ReadParam { id, kind } => {
            match Kind::for_param(*id, *kind) {
                Kind::Int => println!("{}", session.read_int32(*id).await?),
                Kind::Float => println!("{}", session.read_float32(*id).await?),
            }
            Ok(())
        }
        Commands::WriteParam { id, value, kind } => {
            match Kind::for_param(*id, *kind) {
                Kind::Int => {
                    let v: i32 = value
                        .parse()
                        .with_context(|| format!("'{}' is not an integer", value))?;
                    session.write_int32(*id, v).await?;
                }
                Kind::Float => {
                    let v: f32 = value
                        .parse()
                        .with_context(|| format!("'{}' is not a number", value))?;
                    session.write_float32(*id, v).await?;
                }
            }
            println!("parameter {} = {}", id, value);
            Ok(())
        }
        Commands::Poll { interval_ms, count } => {
            poll(session, Duration::from_millis(*interval_ms), *count).await;
            Ok(())
        }
    }
}

/// Sample at a fixed rate. A failed sample is reported and polling goes on.
async fn poll(session: &DeviceSession, interval: Duration, count: u32) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    for sample in 1..=count {
        ticker.tick().await;

        let temperature = session.object_temperature().await;
        let stability = session.stability_state().await;

        match (temperature, stability) {
            (Ok(t), Ok(s)) => println!("{:>4}  {:>9.3} °C  {}", sample, t, s),
            (t, s) => {
                let describe = |e: &TecError| match DeviceErrorCode::from_error(e) {
                    Some(code) => format!("device error {}", code),
                    None => e.to_string(),
                };
                let t = t.map_or_else(|e| describe(&e), |t| format!("{:.3} °C", t));
                let s = s.map_or_else(|e| describe(&e), |s| s.to_string());
                tracing::warn!(sample, temperature = %t, stability = %s, "sample failed");
                println!("{:>4}  {}  {}", sample, t, s);
            }
        }
    }
}

async fn read_quantity(session: &DeviceSession, quantity: Quantity) -> Result<String> {
    let text = match quantity {
        Quantity::ObjectTemperature => format!("{:.3} °C", session.object_temperature().await?),
        Quantity::SinkTemperature => format!("{:.3} °C", session.sink_temperature().await?),
        Quantity::TargetTemperature => format!("{:.3} °C", session.target_temperature().await?),
        Quantity::OutputCurrent => format!("{:.3} A", session.output_current().await?),
        Quantity::OutputVoltage => format!("{:.3} V", session.output_voltage().await?),
        Quantity::Stability => session.stability_state().await?.to_string(),
    };
    Ok(text)
}

fn label(quantity: Quantity) -> &'static str {
    match quantity {
        Quantity::ObjectTemperature => "object temperature",
        Quantity::SinkTemperature => "sink temperature",
        Quantity::TargetTemperature => "target temperature",
        Quantity::OutputCurrent => "output current",
        Quantity::OutputVoltage => "output voltage",
        Quantity::Stability => "stability",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn args(port: Option<&str>) -> ConnectionArgs {
        ConnectionArgs {
            config: None,
            device: None,
            port: port.map(str::to_string),
            address: None,
            baud_rate: None,
            timeout_ms: None,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::parse_from(["tecctl", "--port", "/dev/ttyUSB0", "set-target", "-5.5"]);
        assert!(matches!(cli.command, Commands::SetTarget { celsius } if celsius == -5.5));

        let cli = Cli::parse_from(["tecctl", "get", "object-temperature", "--port", "COM3"]);
        assert!(matches!(
            cli.command,
            Commands::Get {
                quantity: Quantity::ObjectTemperature
            }
        ));
        assert_eq!(cli.connection.port.as_deref(), Some("COM3"));
    }

    #[test]
    fn raw_params_default_to_the_table_kind() {
        assert_eq!(Kind::for_param(1200, None), Kind::Int);
        assert_eq!(Kind::for_param(3000, None), Kind::Float);
        assert_eq!(Kind::for_param(0x1234, None), Kind::Float);
        assert_eq!(Kind::for_param(3000, Some(Kind::Int)), Kind::Int);

        let cli = Cli::parse_from(["tecctl", "read-param", "1200"]);
        assert!(matches!(cli.command, Commands::ReadParam { id: 1200, kind: None }));
    }

    #[test]
    fn port_only_uses_defaults() {
        let config = resolve_config(&args(Some("/dev/ttyUSB0")), None).unwrap();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.address, 2);
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.timeout_ms, 10_000);
    }

    #[test]
    fn missing_port_is_an_error() {
        assert!(resolve_config(&args(None), None).is_err());
    }

    #[test]
    fn command_line_overrides_config_file() {
        let hardware: HardwareConfig = toml::from_str(
            r#"
[[devices]]
id = "stage_tec"
[devices.driver]
type = "tec1089"
port = "/dev/ttyUSB0"
address = 3
timeout_ms = 500
"#,
        )
        .unwrap();

        let mut overrides = args(Some("/dev/ttyUSB1"));
        overrides.timeout_ms = Some(1500);
        let config = resolve_config(&overrides, Some(&hardware)).unwrap();

        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.address, 3);
        assert_eq!(config.timeout_ms, 1500);
    }

    #[test]
    fn unknown_device_id_is_an_error() {
        let hardware: HardwareConfig = toml::from_str(
            r#"
[[devices]]
id = "stage_tec"
[devices.driver]
type = "tec1089"
port = "/dev/ttyUSB0"
"#,
        )
        .unwrap();

        let mut selection = args(None);
        selection.device = Some("other".into());
        assert!(resolve_config(&selection, Some(&hardware)).is_err());
    }
}
