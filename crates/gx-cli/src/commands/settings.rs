//! Creating instances and editing their settings

use anyhow::{Context as _, Result};
use gx_core::ports::next_free_port;
use gx_core::results::for_each;
use gx_core::{ComponentKind, Context, GeneosError, InstanceRef};

use super::{report, select};
use crate::output::print_success;

/// Execute the add command: create the home directory, pick a port and
/// write the initial configuration
pub async fn add_command(ctx: &Context, kind: &str, name: &str, port: Option<u16>) -> Result<()> {
    let kind: ComponentKind = kind.parse()?;
    let target: InstanceRef = name
        .parse()
        .with_context(|| format!("invalid instance name {:?}", name))?;
    if target.is_pattern() {
        anyhow::bail!("{:?} is a pattern, not an instance name", name);
    }
    if target.kind.is_some_and(|k| k != kind) {
        anyhow::bail!("{:?} does not name a {}", name, kind);
    }

    let instance = ctx.instance(kind, &target.name, &target.host)?;
    if instance.exists().await {
        return Err(GeneosError::AlreadyExists(instance.to_string()).into());
    }

    let port = match port {
        Some(port) => port,
        None => next_free_port(ctx, &target.host, kind).await?,
    };
    instance.update(|settings| settings.set("port", port));

    let host = instance.host();
    for dir in kind.component().directories() {
        let path = ctx.root_on(&target.host).join(dir);
        host.mkdir_all(&path, 0o775)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    if kind.component().uses_keyfiles() {
        let keyfiles = ctx
            .root_on(&target.host)
            .join(kind.name())
            .join(format!("{}_shared", kind.name()))
            .join("keyfiles");
        host.mkdir_all(&keyfiles, 0o775)
            .await
            .with_context(|| format!("Failed to create {}", keyfiles.display()))?;
    }
    instance.save().await?;

    print_success(&format!("{} added, port {}", instance, port));
    Ok(())
}

/// Execute the set command with `key=value` assignments
pub async fn set_command(ctx: &Context, refs: &[String], assignments: &[String]) -> Result<()> {
    if let Some(bad) = assignments.iter().find(|a| !a.contains('=')) {
        anyhow::bail!("{:?} is not a key=value assignment", bad);
    }
    let instances = select(ctx, refs).await?;
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        instance.update(|settings| {
            for assignment in assignments {
                settings.set_assignment(assignment).ok_or_else(|| {
                    GeneosError::InvalidArgument(format!("assignment {:?}", assignment))
                })?;
            }
            Ok::<_, GeneosError>(())
        })?;
        instance.save().await?;
        Ok::<_, GeneosError>(format!("{} setting(s) updated", assignments.len()))
    })
    .await;
    report(responses)
}

/// Execute the unset command
pub async fn unset_command(ctx: &Context, refs: &[String], keys: &[String]) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let responses = for_each(&instances, |instance| async move {
        instance.load().await?;
        let removed = instance.update(|settings| {
            keys.iter()
                .filter(|key| settings.unset(key).is_some())
                .count()
        });
        instance.save().await?;
        Ok::<_, GeneosError>(format!("{} setting(s) removed", removed))
    })
    .await;
    report(responses)
}

/// Execute the show command: print each instance's settings as JSON
pub async fn show_command(ctx: &Context, refs: &[String]) -> Result<()> {
    let instances = select(ctx, refs).await?;
    let mut shown = Vec::new();
    let mut failed = 0;
    for instance in &instances {
        match instance.load().await {
            Ok(()) => shown.push(serde_json::json!({
                "instance": instance.to_string(),
                "settings": instance.settings(),
            })),
            Err(e) => {
                crate::output::print_error(&format!("{} {}", instance, e));
                failed += 1;
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    if failed > 0 {
        anyhow::bail!("{} instance(s) could not be loaded", failed);
    }
    Ok(())
}
