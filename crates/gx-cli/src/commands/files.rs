//! Commands that change files in instance homes: enable, disable, clean,
//! migrate and roll

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use gx_core::results::for_each;
use gx_core::rollout::roll_files;
use gx_core::{Context, GeneosError, Supervisor};

use super::{report, select};
use crate::output::print_success;

/// Execute the enable command
pub async fn enable_command(ctx: &Context, refs: &[String]) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        Ok::<_, GeneosError>(if instance.enable().await? {
            "enabled".to_string()
        } else {
            "already enabled".to_string()
        })
    })
    .await;
    report(responses)
}

/// Execute the disable command. Running instances are left running.
pub async fn disable_command(ctx: &Context, refs: &[String]) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        Ok::<_, GeneosError>(if instance.disable().await? {
            "disabled".to_string()
        } else {
            "already disabled".to_string()
        })
    })
    .await;
    report(responses)
}

/// Execute the clean command
pub async fn clean_command(ctx: &Context, refs: &[String], full: bool) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let supervisor = Supervisor::from_config(ctx.config());
    let supervisor = &supervisor;
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        let removed = supervisor.clean(&instance, ctx.config(), full).await?;
        Ok::<_, GeneosError>(format!("removed {} path(s)", removed))
    })
    .await;
    report(responses)
}

/// Execute the migrate command, or undo a migration with `revert`
pub async fn migrate_command(ctx: &Context, refs: &[String], revert: bool) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        let message = if revert {
            if instance.revert().await? {
                "reverted to legacy configuration"
            } else {
                "no migrated configuration to revert"
            }
        } else if instance.migrate().await? {
            "migrated"
        } else {
            "nothing to migrate"
        };
        Ok::<_, GeneosError>(message.to_string())
    })
    .await;
    report(responses)
}

/// Execute the roll command
pub async fn roll_command(ctx: &Context, host: &str, paths: &[PathBuf]) -> Result<()> {
    let target = ctx.host(host)?;
    roll_files(target.as_ref(), paths)
        .await
        .with_context(|| format!("rollout on {} failed, earlier files restored", host))?;
    for path in paths {
        print_success(&format!("{}:{} rolled out", host, path.display()));
    }
    Ok(())
}
