//! Wires the orchestrator and the LCD driver together on the blocking pool.

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::actor::Mailbox;
use crate::error::CommandError;
use crate::lcd::{DriverConfig, LcdDevice, LcdDriver};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};

/// Starts the LCD driver and the orchestrator as blocking tasks on
/// `task_tracker`. The returned mailbox is the front end's end of its channel
/// to the orchestrator.
///
/// If either run loop fails, `shutdown` is cancelled so the other one (and
/// whatever else watches the token) stops too. Close and wait on the tracker
/// after cancelling to join both loops.
///
/// Must be called from within a tokio runtime.
pub fn spawn(
    task_tracker: &TaskTracker,
    orchestrator_config: OrchestratorConfig,
    driver_config: DriverConfig,
    device: Box<dyn LcdDevice>,
    shutdown: CancellationToken,
) -> Mailbox {
    let (web, orchestrator_web) = Mailbox::pair("web", "orchestrator");
    let (orchestrator_lcd, lcd) = Mailbox::pair("orchestrator", "lcd");

    let driver = LcdDriver::new(driver_config, device, LcdDriver::commands());
    let orchestrator = Orchestrator::new(
        orchestrator_config,
        orchestrator_lcd,
        Orchestrator::commands(),
    );

    let token = shutdown.clone();
    task_tracker.spawn_blocking(move || supervise("lcd", driver.run(lcd, token.clone()), &token));
    let token = shutdown;
    task_tracker.spawn_blocking(move || {
        supervise(
            "orchestrator",
            orchestrator.run(orchestrator_web, token.clone()),
            &token,
        )
    });

    info!("started orchestrator and lcd tasks");
    web
}

fn supervise(name: &str, outcome: Result<(), CommandError>, shutdown: &CancellationToken) {
    match outcome {
        Ok(()) => {}
        // a peer hanging up during shutdown is expected
        Err(e) if shutdown.is_cancelled() => warn!("{name} stopped: {e}"),
        Err(e) => {
            error!("{name} failed, shutting down: {e}");
            shutdown.cancel();
        }
    }
}
