use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use crate::config::ConfigurationProfile;
use crate::device::BenchManager;
use crate::serial::{list_ports, SimulatedDevice};
use crate::settings::BenchSettings;

pub const USAGE: &str = "\
usage: switch-bench [--settings FILE] [--port NAME] [--baud N] [--simulate] <command>

commands:
  ports                                   list serial ports
  status                                  check that the device answers
  send-config --product P --mac XXXX [--light N] [--outlet N] [--dimming N]
                                          send a configuration packet
  test <name>                             run one test
  sequence [name...]                      run tests in order (default: all)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ports,
    Status,
    SendConfig(ConfigurationProfile),
    Test(String),
    Sequence(Vec<String>),
}

/// Global options plus the command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub settings_path: Option<PathBuf>,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub simulate: bool,
    pub command: Command,
}

impl Invocation {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::<String>::into);
        let mut settings_path = None;
        let mut port = None;
        let mut baud_rate = None;
        let mut simulate = false;

        let command_name = loop {
            let arg = args.next().ok_or_else(|| anyhow!("missing command\n\n{}", USAGE))?;
            match arg.as_str() {
                "--settings" => settings_path = Some(PathBuf::from(value_of(&mut args, "--settings")?)),
                "--port" => port = Some(value_of(&mut args, "--port")?),
                "--baud" => {
                    let value = value_of(&mut args, "--baud")?;
                    baud_rate = Some(value.parse().with_context(|| format!("invalid baud rate {:?}", value))?);
                }
                "--simulate" => simulate = true,
                flag if flag.starts_with("--") => bail!("unknown option {}\n\n{}", flag, USAGE),
                _ => break arg,
            }
        };

        let command = match command_name.as_str() {
            "ports" => Command::Ports,
            "status" => Command::Status,
            "send-config" => Command::SendConfig(parse_profile(&mut args)?),
            "test" => {
                let name = args.next().ok_or_else(|| anyhow!("test: missing test name"))?;
                Command::Test(name)
            }
            "sequence" => Command::Sequence(args.by_ref().collect()),
            other => bail!("unknown command {:?}\n\n{}", other, USAGE),
        };

        if let Some(extra) = args.next() {
            bail!("unexpected argument {:?}", extra);
        }

        Ok(Self {
            settings_path,
            port,
            baud_rate,
            simulate,
            command,
        })
    }

    /// Settings from file (or defaults) with command-line overrides applied
    pub fn settings(&self) -> Result<BenchSettings> {
        let mut settings = match &self.settings_path {
            Some(path) => BenchSettings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => BenchSettings::default(),
        };

        if let Some(port) = &self.port {
            settings.port_name = Some(port.clone());
        }
        if let Some(baud_rate) = self.baud_rate {
            settings.baud_rate = baud_rate;
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn value_of(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().ok_or_else(|| anyhow!("{} requires a value", flag))
}

/// Accepts decimal or `0x`-prefixed hex
fn parse_u8(value: &str, flag: &str) -> Result<u8> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("{}: invalid value {:?}", flag, value))
}

fn parse_profile(args: &mut impl Iterator<Item = String>) -> Result<ConfigurationProfile> {
    let mut profile = ConfigurationProfile::default();
    let mut mac = None;

    while let Some(flag) = args.next() {
        let value = value_of(args, &flag)?;
        match flag.as_str() {
            "--product" => profile.product_type = parse_u8(&value, &flag)?.into(),
            "--mac" => mac = Some(value),
            "--light" => profile.light_circuits = parse_u8(&value, &flag)?,
            "--outlet" => profile.outlet_circuits = parse_u8(&value, &flag)?,
            "--dimming" => profile.dimming_type = parse_u8(&value, &flag)?,
            _ => bail!("send-config: unknown option {}", flag),
        }
    }

    profile.mac_suffix = mac.ok_or_else(|| anyhow!("send-config: --mac is required"))?;
    Ok(profile)
}

/// Run `invocation` against a fresh manager, printing results as JSON on stdout
pub async fn execute(invocation: &Invocation, settings: BenchSettings) -> Result<()> {
    if invocation.command == Command::Ports {
        return print_ports();
    }

    let manager = BenchManager::new(settings);
    if invocation.simulate {
        manager.attach(Box::new(SimulatedDevice::healthy()), "simulator").await;
    } else {
        manager.connect(None).await.context("opening serial port")?;
    }

    let result = dispatch(&manager, &invocation.command).await;
    manager.disconnect().await;
    result
}

fn print_ports() -> Result<()> {
    let ports = list_ports().context("listing serial ports")?;
    println!("{}", serde_json::to_string_pretty(&ports)?);
    Ok(())
}

async fn dispatch(manager: &BenchManager, command: &Command) -> Result<()> {
    match command {
        Command::Ports => print_ports()?,
        Command::Status => {
            let alive = manager.device_status().await?;
            println!("{}", alive);
        }
        Command::SendConfig(profile) => {
            let packet = manager
                .send_config(profile)
                .await
                .context("sending configuration")?;
            println!("{}", packet.to_hex());
        }
        Command::Test(name) => {
            let outcome = manager.run_test(name).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Sequence(names) => {
            let report = manager
                .run_sequence(names.as_slice(), |name, percent| eprintln!("[{:>3}%] {}", percent, name))
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
