//! gx-core: Instance control plane for geneos-ctl
//!
//! Instances are identified by `[TYPE:]NAME[@HOST]` and live in directories
//! under a Geneos root on their host. This crate resolves references to
//! instances, loads and saves their settings (including legacy `.rc`
//! files), finds their processes, starts and stops them, allocates ports
//! and rolls staged files into place.

pub mod certs;
pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod instance;
pub mod ports;
pub mod process;
pub mod results;
pub mod rollout;
pub mod settings;
pub mod supervisor;

pub use component::{Component, ComponentKind};
pub use config::{GlobalConfig, HostsFile};
pub use context::Context;
pub use error::{ConfigError, ErrorKind, GeneosError, Result};
pub use instance::{Instance, InstanceRef};
pub use results::{Response, Responses};
pub use settings::Settings;
pub use supervisor::{StartOptions, StartOutcome, StopOptions, StopOutcome, Supervisor};
