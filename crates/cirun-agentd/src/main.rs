use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use cirun_core::Orchestrator;
use cirun_infra::Terraform;
use cirun_observe::{LoggerConfig, init_logger};

mod cli;
use cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cfg = LoggerConfig {
        format: args.log_format,
        level: args.log_level.clone(),
        ..Default::default()
    };
    init_logger(&cfg)?;

    if std::env::var_os("RUNNER_NAME").is_some() {
        warn!("Ignoring RUNNER_NAME environment variable, use CIRUN_RUNNER_NAME or --name instead.");
    }

    let config = args.into_config()?;
    info!(
        name = %config.name,
        driver = %config.driver,
        labels = %config.labels,
        workdir = %config.workdir.display(),
        cloud = config.is_cloud(),
        "runner configured"
    );

    let platform = cirun_platform::connect(config.driver, &config.repo, &config.token)
        .context("failed to create platform client")?;
    let provisioner = Arc::new(Terraform::new());

    let code = Orchestrator::new(config, platform, provisioner).run().await;
    std::process::exit(code)
}
