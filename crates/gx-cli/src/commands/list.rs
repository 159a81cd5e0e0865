//! List and ps command implementations

use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use futures::future::join_all;
use gx_core::process::{listening_ports, process_info};
use gx_core::{Context, Instance};

use super::select;
use crate::output::{format_duration, format_instances, format_processes, InstanceRow, ProcessRow};

async fn instance_row(instance: Arc<Instance>) -> InstanceRow {
    let mut flags = Vec::new();
    if let Err(e) = instance.load().await {
        tracing::debug!("{}: {}", instance, e);
        flags.push("unconfigured");
    }
    if instance.is_disabled().await {
        flags.push("disabled");
    }
    let settings = instance.settings();
    if settings.get_bool("protected") {
        flags.push("protected");
    }
    if instance.is_legacy() {
        flags.push("legacy");
    }

    InstanceRow {
        kind: instance.kind().to_string(),
        name: instance.name().to_string(),
        host: instance.host().name().to_string(),
        port: settings
            .get_u16("port")
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string()),
        version: settings.get_string("version"),
        flags: if flags.is_empty() {
            "-".to_string()
        } else {
            flags.join(",")
        },
        home: instance.home().display().to_string(),
    }
}

/// Execute the list command
pub async fn list_command(ctx: &Context, refs: &[String]) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let rows = join_all(instances.into_iter().map(instance_row)).await;
    println!("{}", format_instances(rows));
    Ok(())
}

async fn process_row(instance: Arc<Instance>) -> gx_core::Result<Option<ProcessRow>> {
    if let Err(e) = instance.load().await {
        tracing::debug!("{}: {}", instance, e);
    }
    let Some(info) = process_info(&instance).await? else {
        return Ok(None);
    };
    let ports = listening_ports(instance.host().as_ref(), info.pid).await?;
    let uptime = info
        .started
        .and_then(|started| SystemTime::now().duration_since(started).ok())
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());

    Ok(Some(ProcessRow {
        kind: instance.kind().to_string(),
        name: instance.name().to_string(),
        host: instance.host().name().to_string(),
        pid: info.pid,
        owner: format!("{}:{}", info.uid, info.gid),
        uptime,
        ports: ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(","),
    }))
}

/// Execute the ps command
pub async fn ps_command(ctx: &Context, refs: &[String]) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let mut rows = Vec::new();
    for (instance, row) in instances
        .iter()
        .zip(join_all(instances.iter().cloned().map(process_row)).await)
    {
        match row {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => {}
            Err(e) => tracing::warn!("{}: {}", instance, e),
        }
    }
    println!("{}", format_processes(rows));
    Ok(())
}
