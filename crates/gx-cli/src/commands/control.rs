//! Start, stop, restart and reload

use std::sync::Arc;

use anyhow::Result;
use gx_core::results::for_each;
use gx_core::{
    Context, Instance, StartOptions, StartOutcome, StopOptions, StopOutcome, Supervisor,
};

use super::{report, select};

fn started(outcome: StartOutcome) -> String {
    match outcome {
        StartOutcome::Started { pid } => format!("started with PID {}", pid),
        StartOutcome::AlreadyRunning { pid } => format!("already running with PID {}", pid),
    }
}

fn stopped(outcome: StopOutcome) -> String {
    match outcome {
        StopOutcome::NotRunning => "not running".to_string(),
        StopOutcome::Stopped { pid } => format!("stopped PID {}", pid),
        StopOutcome::Killed { pid } => format!("killed PID {}", pid),
        StopOutcome::Refused { pid } => format!("PID {} belongs to another user, not stopped", pid),
    }
}

async fn start_one(
    supervisor: &Supervisor,
    instance: Arc<Instance>,
    options: &StartOptions,
) -> gx_core::Result<String> {
    instance.load().await?;
    Ok(started(supervisor.start(&instance, options).await?))
}

async fn stop_one(
    supervisor: &Supervisor,
    instance: Arc<Instance>,
    options: StopOptions,
) -> gx_core::Result<String> {
    instance.load().await?;
    Ok(stopped(supervisor.stop(&instance, options).await?))
}

/// Execute the start command
pub async fn start_command(ctx: &Context, refs: &[String], options: StartOptions) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let supervisor = Supervisor::from_config(ctx.config());
    let (supervisor, options) = (&supervisor, &options);
    let responses = for_each(&instances, |instance| start_one(supervisor, instance, options)).await;
    report(responses)
}

/// Execute the stop command
pub async fn stop_command(ctx: &Context, refs: &[String], options: StopOptions) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let supervisor = Supervisor::from_config(ctx.config());
    let supervisor = &supervisor;
    let responses = for_each(&instances, |instance| stop_one(supervisor, instance, options)).await;
    report(responses)
}

/// Execute the restart command
pub async fn restart_command(
    ctx: &Context,
    refs: &[String],
    stop: StopOptions,
    start: StartOptions,
) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let supervisor = Supervisor::from_config(ctx.config());
    let (supervisor, start) = (&supervisor, &start);
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        let outcome = supervisor.restart(&instance, stop, start).await?;
        Ok::<_, gx_core::GeneosError>(started(outcome))
    })
    .await;
    report(responses)
}

/// Execute the reload command
pub async fn reload_command(ctx: &Context, refs: &[String]) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let supervisor = Supervisor::from_config(ctx.config());
    let supervisor = &supervisor;
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        let pid = supervisor.reload(&instance).await?;
        Ok::<_, gx_core::GeneosError>(format!("reload signal sent to PID {}", pid))
    })
    .await;
    report(responses)
}
