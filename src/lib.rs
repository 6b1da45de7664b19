//! Unattended auto-updater and process supervisor for a single target
//! application. See the component crates for the update state machine
//! (`update-engine`), the on-disk layout (`version-store`), the Omaha
//! wire format (`omaha-codec`), download/verification
//! (`package-fetcher`), archive staging (`archive-extractor`), and the
//! child-process lifecycle (`supervisor`).

pub mod config;
mod scheduler;

pub use config::{Config, ConfigError, Target};
pub use supervisor::{BufferingSink, OutputSink, PassthroughSink, Stream};
pub use update_engine::{EngineError, UpdateManifest};

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Supervisor(#[from] supervisor::SupervisorError),
}

/// Wire the update engine and the supervisor together and run until the
/// target exits for the last time or the returned handle's `stop()` is
/// called. `sink` receives the target's captured stdout/stderr.
pub async fn run(config: Config, sink: Arc<dyn OutputSink>) -> Result<(), RunError> {
    let layout = supervisor::TargetLayout {
        versions_root: config.target.versions_root.clone(),
        executable_name: config.target.executable_name.clone(),
        executable_args: config.target.executable_args.clone(),
    };
    let versions_root = config.target.versions_root.clone();
    let latest = move || version_store::latest_version(&versions_root).unwrap_or(None);
    let sup = Arc::new(supervisor::Supervisor::new(layout, latest, sink));

    let engine_config = update_engine::EngineConfig {
        client_id: config.client_id,
        channel: config.target.channel,
        versions_root: config.target.versions_root,
        manifests: config.update_manifests,
    };

    let scheduler = Arc::new(scheduler::Scheduler::new(
        sup,
        engine_config,
        config.update_check_interval,
    ));
    scheduler.run().await.map_err(Into::into)
}

/// Run exactly one update-check tick without starting the supervisor.
/// Used by `--once` and by callers that only want to exercise the update
/// engine directly.
pub async fn apply_updates_once(config: &Config) -> Result<bool, EngineError> {
    let client = reqwest::Client::new();
    let engine_config = update_engine::EngineConfig {
        client_id: config.client_id.clone(),
        channel: config.target.channel.clone(),
        versions_root: config.target.versions_root.clone(),
        manifests: config.update_manifests.clone(),
    };
    update_engine::apply_updates(&client, &engine_config).await
}
