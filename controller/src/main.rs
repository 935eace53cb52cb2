#[macro_use]
extern crate lazy_static;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use resources::config::ControllerConfig;

mod autoscaler;
mod cli;
mod controller;
mod core;
mod errors;
mod utils;

use cli::Cli;
use controller::StackSetController;

lazy_static! {
    pub static ref CONFIG: ControllerConfig = {
        let loaded = Config::builder()
            .add_source(File::with_name("/etc/stackset-controller/config.yaml").required(false))
            .add_source(Environment::with_prefix("STACKSET"))
            .build()
            .unwrap_or_default()
            .try_deserialize::<ControllerConfig>()
            .with_context(|| "failed to parse controller config".to_string())
            .unwrap_or_default();
        Cli::parse().apply(loaded)
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut controller = StackSetController::new(CONFIG.clone());
    controller.run().await?;
    Ok(())
}
