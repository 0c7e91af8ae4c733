use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::info;

use cirun_exec::RunnerProcess;
use cirun_infra::{MAIN_FILE, STATE_FILE, TfResource};
use cirun_model::ConfigError;

use crate::{
    CoreError,
    strategy::{LocalRunner, StrategyContext},
    watch::{IdleWatcher, JobWatchdog, PowerEventListener},
};

pub(super) async fn launch(ctx: &StrategyContext) -> Result<LocalRunner, CoreError> {
    let config = &ctx.config;
    info!(driver = %config.driver, name = %config.name, "Launching runner");

    if let Some(raw) = &config.tf_resource {
        inject_destroy_target(ctx, raw).await?;
    }

    if let Some(listener) = PowerEventListener::for_platform() {
        let shutdown = ctx.shutdown_handle();
        let task = listener.spawn(shutdown.clone(), ctx.cancel.child_token());
        shutdown.monitor(task, "power listener");
    }

    let spec = ctx.platform.prepare_runner(config).await?;
    let process = RunnerProcess::spawn(&spec, ctx.events.clone())?;
    info!(pid = ?process.pid(), "runner agent started");

    Ok(LocalRunner {
        process,
        idle: IdleWatcher::new(config.idle_timeout),
        watchdog: JobWatchdog::for_driver(config.driver, config.retries_enabled()),
    })
}

/// Seed an infra workspace whose state holds only the resource this runner
/// lives on, so teardown can destroy it.
async fn inject_destroy_target(ctx: &StrategyContext, raw: &str) -> Result<(), CoreError> {
    let resource = decode_tf_resource(raw)?;
    let dir = ctx.config.infra_dir();
    let provisioner = &ctx.provisioner;

    provisioner.check_minimum_version().await?;
    let template = provisioner.render_local_destroy_template(&ctx.config.tpi_version);
    tokio::fs::write(dir.join(MAIN_FILE), template).await?;
    provisioner.init_workspace(dir).await?;
    provisioner.apply(dir).await?;

    let path = dir.join(STATE_FILE);
    let mut state = provisioner.load_state(&path).await?;
    state.resources = vec![resource];
    provisioner.save_state(&state, &path).await?;

    info!(workdir = %dir.display(), "destroy target recorded");
    Ok(())
}

fn decode_tf_resource(raw: &str) -> Result<TfResource, ConfigError> {
    let json = STANDARD
        .decode(raw.trim())
        .map_err(|e| ConfigError::InvalidTfResource(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| ConfigError::InvalidTfResource(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_resource() {
        let json = r#"{"type":"iterative_cml_runner","name":"runner","instances":[{"attributes":{"id":"i-1"}}]}"#;
        let res = decode_tf_resource(&STANDARD.encode(json)).unwrap();
        assert_eq!(res.kind, "iterative_cml_runner");
        assert_eq!(res.instances.len(), 1);
        assert_eq!(res.extra["name"], "runner");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_tf_resource("not base64!"),
            Err(ConfigError::InvalidTfResource(_))
        ));
        assert!(matches!(
            decode_tf_resource(&STANDARD.encode("[1,2]")),
            Err(ConfigError::InvalidTfResource(_))
        ));
    }
}
