//! CLI command implementations

mod control;
mod files;
mod hosts;
mod list;
mod settings;

pub use control::{reload_command, restart_command, start_command, stop_command};
pub use files::{clean_command, disable_command, enable_command, migrate_command, roll_command};
pub use hosts::{hosts_add_command, hosts_list_command};
pub use list::{list_command, ps_command};
pub use settings::{add_command, set_command, show_command, unset_command};

use std::sync::Arc;

use anyhow::{Context as _, Result};
use gx_core::{Context, Instance, InstanceRef, Responses};

use crate::output::{format_summary, print_responses, print_warning};

/// Parse `[TYPE:]NAME[@HOST]` arguments
pub fn parse_refs(args: &[String]) -> Result<Vec<InstanceRef>> {
    args.iter()
        .map(|arg| {
            arg.parse::<InstanceRef>()
                .with_context(|| format!("invalid instance reference {:?}", arg))
        })
        .collect()
}

/// Instances selected by `args`; none selects every instance
pub async fn select(ctx: &Context, args: &[String]) -> Result<Vec<Arc<Instance>>> {
    let refs = parse_refs(args)?;
    let instances = ctx.matching(&refs).await?;
    if instances.is_empty() {
        print_warning("No matching instances");
    }
    Ok(instances)
}

/// Print each outcome and fail if any instance failed
fn report(responses: Responses) -> Result<()> {
    print_responses(&responses);
    let summary = responses.summary();
    if summary.failed > 0 {
        anyhow::bail!("{}", format_summary(&summary));
    }
    Ok(())
}
