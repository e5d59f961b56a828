pub mod commands;
pub mod config;
pub mod device;
pub mod serial;
pub mod settings;

use anyhow::Context;

use commands::{execute, Invocation};

/// Parse the process arguments, install logging and run the command
pub async fn run() -> anyhow::Result<()> {
    let invocation = Invocation::parse(std::env::args().skip(1))?;
    let settings = invocation.settings().context("invalid settings")?;

    // RUST_LOG, when set, wins over the configured level
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    )
    .try_init();

    log::debug!("Running {:?}", invocation.command);
    execute(&invocation, settings).await
}
