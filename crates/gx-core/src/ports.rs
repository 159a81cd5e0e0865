//! Port allocation from range specs such as `7039,7100-`

use std::collections::BTreeSet;

use crate::component::ComponentKind;
use crate::context::Context;
use crate::error::{GeneosError, Result};
use crate::process;

/// Upper bound of an open-ended range, `min-`
pub const OPEN_RANGE_MAX: u16 = 49151;

/// One token of a range spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRange {
    Single(u16),
    /// Inclusive range
    Range(u16, u16),
}

impl PortRange {
    fn ports(self) -> impl Iterator<Item = u16> {
        let (min, max) = match self {
            PortRange::Single(p) => (p, p),
            PortRange::Range(min, max) => (min, max),
        };
        min..=max
    }
}

/// Numbers above 65534 become 65535
fn parse_port(s: &str) -> Option<u16> {
    let n: u64 = s.trim().parse().ok()?;
    Some(if n > 65534 { 65535 } else { n as u16 })
}

fn parse_token(token: &str) -> Option<PortRange> {
    let token = token.trim();
    let split = token
        .split_once("..")
        .or_else(|| token.split_once('-'));
    match split {
        None => parse_port(token).map(PortRange::Single),
        Some((min, "")) => Some(PortRange::Range(parse_port(min)?, OPEN_RANGE_MAX)),
        Some((min, max)) => Some(PortRange::Range(parse_port(min)?, parse_port(max)?)),
    }
}

/// Parse a comma separated range spec.
///
/// Malformed tokens are skipped with a warning and so are ranges whose
/// minimum is not below their maximum. A spec with no usable token is an
/// error.
pub fn parse_range_spec(spec: &str) -> Result<Vec<PortRange>> {
    let mut ranges = Vec::new();
    for token in spec.split(',').filter(|t| !t.trim().is_empty()) {
        match parse_token(token) {
            Some(PortRange::Range(min, max)) if min >= max => {
                tracing::warn!("ignoring empty port range {:?} in {:?}", token, spec);
            }
            Some(range) => ranges.push(range),
            None => tracing::warn!("ignoring malformed port range {:?} in {:?}", token, spec),
        }
    }
    if ranges.is_empty() {
        return Err(GeneosError::InvalidArgument(format!(
            "no valid ports in range {:?}",
            spec
        )));
    }
    Ok(ranges)
}

/// First port in `spec` order that is not in `used`
pub fn first_free(spec: &str, used: &BTreeSet<u16>) -> Result<u16> {
    parse_range_spec(spec)?
        .into_iter()
        .flat_map(PortRange::ports)
        .find(|port| *port != 0 && !used.contains(port))
        .ok_or_else(|| GeneosError::NotFound(format!("free port in range {:?}", spec)))
}

/// Ports configured for every instance on `host`, plus ports the host
/// is listening on
pub async fn used_ports(ctx: &Context, host: &str) -> Result<BTreeSet<u16>> {
    let mut used = BTreeSet::new();
    for kind in ComponentKind::ALL {
        for instance in ctx.instances_on(host, kind).await? {
            if !instance.is_loaded() {
                if let Err(e) = instance.load().await {
                    tracing::debug!("{}: {}", instance, e);
                    continue;
                }
            }
            if let Some(port) = instance.settings().get_u16("port") {
                if port != 0 {
                    used.insert(port);
                }
            }
        }
    }

    let host_ref = ctx.host(host)?;
    for socket in process::listening_sockets(host_ref.as_ref()).await? {
        used.insert(socket.port);
    }
    Ok(used)
}

/// Next port for a new `kind` instance on `host`, from the global
/// `<type>::ports` setting or the type's default range
pub async fn next_free_port(ctx: &Context, host: &str, kind: ComponentKind) -> Result<u16> {
    let component = kind.component();
    let spec = ctx
        .config()
        .setting(&component.ports_key())
        .unwrap_or_else(|| component.default_ports())
        .to_string();
    let used = used_ports(ctx, host).await?;
    let port = first_free(&spec, &used)?;
    tracing::debug!("allocated port {} for new {} on {}", port, kind, host);
    Ok(port)
}
