//! Component types: the static description of each kind of instance
//!
//! Every kind is a [`ComponentKind`] variant with a [`Component`]
//! implementation holding its defaults, legacy parameter names, argument
//! builder and process match rule.

mod gateway;
mod licd;
mod netprobe;
mod san;
mod webserver;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gx_host::Signal;
use serde::{Deserialize, Serialize};

use crate::error::GeneosError;
use crate::settings::Settings;

pub use gateway::Gateway;
pub use licd::Licd;
pub use netprobe::Netprobe;
pub use san::San;
pub use webserver::Webserver;

/// The kinds of instance this control plane manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Gateway,
    Netprobe,
    Webserver,
    Licd,
    San,
}

impl ComponentKind {
    /// Every kind, in listing order
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Gateway,
        ComponentKind::Netprobe,
        ComponentKind::Webserver,
        ComponentKind::Licd,
        ComponentKind::San,
    ];

    /// The static descriptor for this kind
    pub fn component(self) -> &'static dyn Component {
        match self {
            ComponentKind::Gateway => &Gateway,
            ComponentKind::Netprobe => &Netprobe,
            ComponentKind::Webserver => &Webserver,
            ComponentKind::Licd => &Licd,
            ComponentKind::San => &San,
        }
    }

    /// Canonical lowercase name, also used in paths and file names
    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Gateway => "gateway",
            ComponentKind::Netprobe => "netprobe",
            ComponentKind::Webserver => "webserver",
            ComponentKind::Licd => "licd",
            ComponentKind::San => "san",
        }
    }

    /// Directory holding instance homes: `<root>/<type-or-parent>/<type>s`
    pub fn instances_dir(self, root: &Path) -> PathBuf {
        let top = self.component().parent().unwrap_or(self);
        root.join(top.name()).join(format!("{}s", self.name()))
    }

    /// Pre-parent location of instance homes: `<root>/<type>/<type>s`.
    /// Only kinds with a parent have one.
    pub fn legacy_instances_dir(self, root: &Path) -> Option<PathBuf> {
        self.component()
            .parent()
            .map(|_| root.join(self.name()).join(format!("{}s", self.name())))
    }

    /// `<type>.<ext>`, e.g. `gateway.json`
    pub fn file_name(self, ext: &str) -> String {
        format!("{}.{}", self.name(), ext)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ComponentKind {
    type Err = GeneosError;

    /// Accepts the canonical name or any alias, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ComponentKind::ALL
            .into_iter()
            .find(|kind| kind.component().aliases().contains(&lower.as_str()))
            .ok_or_else(|| GeneosError::InvalidArgument(format!("unknown component type {:?}", s)))
    }
}

/// What a component needs to know about an instance to build its command
/// line or recognise its process
#[derive(Debug, Clone, Copy)]
pub struct InstanceView<'a> {
    pub name: &'a str,
    pub home: &'a Path,
    pub settings: &'a Settings,
}

impl InstanceView<'_> {
    /// `<install>/<version>`
    pub fn base_dir(&self) -> PathBuf {
        PathBuf::from(self.settings.get_string("install")).join(self.settings.get_string("version"))
    }

    /// Log file location from `logdir` (absolute, relative to home, or
    /// unset meaning home) and `logfile`
    pub fn log_path(&self) -> PathBuf {
        let logdir = self.settings.get_string("logdir");
        let dir = if logdir.is_empty() {
            self.home.to_path_buf()
        } else if Path::new(&logdir).is_absolute() {
            PathBuf::from(logdir)
        } else {
            self.home.join(logdir)
        };
        dir.join(self.settings.get_string("logfile"))
    }

    /// Resolve a path-valued setting against home; empty if unset
    pub fn path_setting(&self, key: &str) -> Option<PathBuf> {
        let value = self.settings.get_string(key);
        if value.is_empty() {
            None
        } else if Path::new(&value).is_absolute() {
            Some(PathBuf::from(value))
        } else {
            Some(self.home.join(value))
        }
    }
}

/// Arguments and extra environment produced by [`Component::command`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Launch {
    pub args: Vec<String>,
    pub env: Vec<String>,
}

/// Static description of a component type
pub trait Component: Send + Sync {
    fn kind(&self) -> ComponentKind;

    /// Accepted spellings of the type name (lowercase)
    fn aliases(&self) -> &'static [&'static str];

    /// Prefix of this type's keys in legacy `.rc` files
    fn legacy_prefix(&self) -> &'static str;

    /// Legacy `.rc` key to settings key
    fn legacy_parameters(&self) -> &'static [(&'static str, &'static str)];

    /// Ordered `(key, template)` defaults. Templates may reference
    /// `{root}`, `{name}` and any setting assigned earlier.
    fn defaults(&self) -> &'static [(&'static str, &'static str)];

    /// Directories under the root that this type needs
    fn directories(&self) -> &'static [&'static str];

    /// Port range spec used when `<type>::ports` is not configured
    fn default_ports(&self) -> &'static str;

    /// Colon separated globs removed by a normal clean
    fn default_clean(&self) -> &'static str;

    /// Colon separated globs removed by a full clean
    fn default_purge(&self) -> &'static str;

    /// True if this type keeps shared key files in
    /// `<root>/<type>/<type>_shared/keyfiles`
    fn uses_keyfiles(&self) -> bool {
        false
    }

    /// The type this one historically lived under, if any
    fn parent(&self) -> Option<ComponentKind> {
        None
    }

    /// True if TLS arguments should include `-secure`
    fn secure_flag(&self) -> bool {
        false
    }

    /// Build arguments (after the program) and extra environment.
    /// `secure_args` are the already-resolved TLS arguments.
    fn command(&self, view: &InstanceView<'_>, secure_args: Vec<String>) -> Launch;

    /// Does `argv` belong to this instance? By default the program's
    /// basename starts with the `binary` setting and a later bare
    /// argument is exactly the instance name.
    fn matches_process(&self, view: &InstanceView<'_>, argv: &[String]) -> bool {
        let Some((program, rest)) = argv.split_first() else {
            return false;
        };
        let binary = view.settings.get_string("binary");
        if binary.is_empty() || !basename(program).starts_with(&binary) {
            return false;
        }
        rest.iter().any(|arg| !arg.starts_with('-') && arg == view.name)
    }

    /// Signal that makes a running instance reload, if it supports one
    fn reload_signal(&self) -> Option<Signal> {
        None
    }

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Global setting naming the port range spec
    fn ports_key(&self) -> String {
        format!("{}::ports", self.name())
    }

    /// Map a lowercased legacy key to its settings key
    fn legacy_key(&self, key: &str) -> Option<&'static str> {
        self.legacy_parameters()
            .iter()
            .find(|(legacy, _)| *legacy == key)
            .map(|(_, modern)| *modern)
    }

    /// Fill in every default not already set, in order
    fn apply_defaults(&self, settings: &mut Settings, root: &Path, name: &str) {
        if !settings.is_set("name") {
            settings.set("name", name);
        }
        for (key, template) in self.defaults() {
            if settings.is_set(key) {
                continue;
            }
            let value = expand(template, root, name, settings);
            match value.parse::<u64>() {
                Ok(n) => settings.set(*key, n),
                Err(_) => settings.set(*key, value),
            }
        }
    }
}

/// Last path component of a program name
pub(crate) fn basename(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

/// Replace `{key}` placeholders. Unknown placeholders expand to nothing.
fn expand(template: &str, root: &Path, name: &str, settings: &Settings) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match key {
            "root" => out.push_str(&root.to_string_lossy()),
            "name" => out.push_str(name),
            _ => out.push_str(&settings.get_string(key)),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
