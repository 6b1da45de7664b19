//! Glues the update engine and the supervisor together. The engine never
//! touches the supervisor directly; this is the only place that knows
//! about both, so each stays unit-testable in isolation.
//!
//! Two cooperating tasks, per spec: a run task that blocks on the child's
//! exit, and an update task that re-arms its own sleep at the end of each
//! tick so ticks never overlap even if one runs longer than the interval.
//!
//! The update task never calls `restart()` itself — it only notifies the
//! run task, which performs the stop-then-start sequence between waits on
//! its own child. That keeps exactly one task ever driving the
//! supervisor's state transitions, so a restart can never race a `wait()`
//! call for the same child out from under it; the timer is still not
//! blocked, since notifying is instant and the update task's sleep
//! re-arms independently of how long the restart takes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info};
use update_engine::EngineConfig;

pub struct Scheduler {
    supervisor: Arc<supervisor::Supervisor>,
    engine_config: EngineConfig,
    client: reqwest::Client,
    interval: Duration,
    shutdown: Notify,
    restart_requested: Notify,
}

impl Scheduler {
    pub fn new(
        supervisor: Arc<supervisor::Supervisor>,
        engine_config: EngineConfig,
        interval: Duration,
    ) -> Self {
        Self {
            supervisor,
            engine_config,
            client: reqwest::Client::new(),
            interval,
            shutdown: Notify::new(),
            restart_requested: Notify::new(),
        }
    }

    /// External cancellation: the only primitive the design allows.
    /// In-flight HTTP requests and extractions run to completion; their
    /// results are discarded once shutdown is observed.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }

    pub async fn run(self: Arc<Self>) -> Result<(), supervisor::SupervisorError> {
        self.supervisor.start().await?;

        let update_task = {
            let this = self.clone();
            tokio::spawn(async move { this.update_loop().await })
        };

        let result = self.run_task_loop().await;
        update_task.abort();
        result
    }

    /// Waits on the current child, restarting in place (and looping back
    /// to wait on the replacement) whenever the update task signals a new
    /// version was installed. Returns once the child exits on its own or
    /// shutdown is requested.
    async fn run_task_loop(&self) -> Result<(), supervisor::SupervisorError> {
        loop {
            tokio::select! {
                result = self.supervisor.wait() => return result.map(|_| ()),
                () = self.restart_requested.notified() => {
                    info!("update installed, restarting target");
                    if let Err(e) = self.supervisor.restart().await {
                        error!(error = %e, "restart after update failed");
                        return Err(e);
                    }
                }
                () = self.shutdown.notified() => return self.supervisor.stop().await,
            }
        }
    }

    async fn update_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = self.shutdown.notified() => return,
            }

            match update_engine::apply_updates(&self.client, &self.engine_config).await {
                Ok(true) => self.restart_requested.notify_one(),
                Ok(false) => {}
                Err(e) => error!(error = %e, "update tick failed, currently running target undisturbed"),
            }
            // Re-arm by looping back to `sleep`, not a recurring timer —
            // guarantees no overlap between ticks.
        }
    }
}
