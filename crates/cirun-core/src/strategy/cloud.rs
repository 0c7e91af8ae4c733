use tracing::{info, warn};

use cirun_infra::{MAIN_FILE, STATE_FILE};

use crate::{CoreError, strategy::StrategyContext};

pub(super) async fn deploy(ctx: &StrategyContext) -> Result<(), CoreError> {
    let dir = ctx.config.infra_dir();
    let provisioner = &ctx.provisioner;
    info!("Deploying cloud runner plan...");

    provisioner.check_minimum_version().await?;
    let template = provisioner.render_cloud_runner_template(&ctx.config)?;
    tokio::fs::write(dir.join(MAIN_FILE), template).await?;
    provisioner.init_workspace(dir).await?;
    provisioner.apply(dir).await?;

    let state = provisioner.load_state(&dir.join(STATE_FILE)).await?;
    for attributes in state.runner_attributes() {
        match serde_json::to_string(&attributes) {
            Ok(json) => info!(attributes = %json, "cloud runner deployed"),
            Err(e) => warn!("failed to render runner attributes: {e}"),
        }
    }
    Ok(())
}
