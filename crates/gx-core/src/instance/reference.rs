//! `[TYPE:]NAME[@HOST]` instance references

use std::fmt;
use std::str::FromStr;

use gx_host::LOCALHOST;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::component::ComponentKind;
use crate::error::{GeneosError, Result};

static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w. _-]+$").expect("name regex is valid"));

static PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w. _*?\[\]^-]+$").expect("pattern regex is valid"));

/// Check an instance or host name. With `allow_wildcards`, the glob
/// characters `*?[]^` are accepted too.
pub fn validate_name(name: &str, allow_wildcards: bool) -> Result<()> {
    let valid = if allow_wildcards {
        PATTERN.is_match(name)
    } else {
        NAME.is_match(name)
    };
    if !valid || name == "." || name == ".." {
        return Err(GeneosError::InvalidArgument(format!(
            "invalid instance name {:?}",
            name
        )));
    }
    Ok(())
}

/// True if `name` contains glob characters
pub fn is_pattern(name: &str) -> bool {
    name.contains(['*', '?', '['])
}

/// A parsed reference to one instance, or a pattern selecting several
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    /// Component type, if given
    pub kind: Option<ComponentKind>,
    /// Instance name or glob pattern
    pub name: String,
    /// Host name, `localhost` when not given
    pub host: String,
}

impl InstanceRef {
    /// Reference to exactly one instance
    pub fn new(kind: ComponentKind, name: &str, host: &str) -> Result<Self> {
        validate_name(name, false)?;
        validate_name(host, false)?;
        Ok(Self {
            kind: Some(kind),
            name: name.to_string(),
            host: host.to_string(),
        })
    }

    /// True if the name selects by glob
    pub fn is_pattern(&self) -> bool {
        is_pattern(&self.name) || is_pattern(&self.host)
    }

    /// Does this reference select `name` of `kind` on `host`?
    pub fn matches(&self, kind: ComponentKind, name: &str, host: &str) -> bool {
        if self.kind.is_some_and(|k| k != kind) {
            return false;
        }
        glob_match(&self.host, host) && glob_match(&self.name, name)
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    if !is_pattern(pattern) {
        return pattern == value;
    }
    glob::Pattern::new(pattern)
        .map(|p| p.matches(value))
        .unwrap_or(false)
}

impl FromStr for InstanceRef {
    type Err = GeneosError;

    fn from_str(s: &str) -> Result<Self> {
        let (rest, host) = match s.rsplit_once('@') {
            Some((rest, host)) if !host.is_empty() => (rest, host),
            Some(_) => {
                return Err(GeneosError::InvalidArgument(format!(
                    "empty host in {:?}",
                    s
                )))
            }
            None => (s, LOCALHOST),
        };
        let (kind, name) = match rest.split_once(':') {
            Some((kind, name)) => (Some(kind.parse::<ComponentKind>()?), name),
            None => (None, rest),
        };
        validate_name(name, true)?;
        validate_name(host, true)?;
        Ok(Self {
            kind,
            name: name.to_string(),
            host: host.to_string(),
        })
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}:{}@{}", kind, self.name, self.host),
            None => write!(f, "{}@{}", self.name, self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reference() {
        let r: InstanceRef = "gateway:Demo Gateway@db1".parse().unwrap();
        assert_eq!(r.kind, Some(ComponentKind::Gateway));
        assert_eq!(r.name, "Demo Gateway");
        assert_eq!(r.host, "db1");
        assert_eq!(r.to_string(), "gateway:Demo Gateway@db1");
    }

    #[test]
    fn test_host_defaults_to_localhost() {
        let r: InstanceRef = "probe1".parse().unwrap();
        assert_eq!(r.kind, None);
        assert_eq!(r.host, "localhost");
        assert_eq!(r.to_string(), "probe1@localhost");

        let r: InstanceRef = "netprobe:probe1".parse().unwrap();
        assert_eq!(r.to_string(), "netprobe:probe1@localhost");
    }

    #[test]
    fn test_round_trip() {
        for text in ["san:s_1@web-01", "licd:main.lic@localhost", "x@h"] {
            let r: InstanceRef = text.parse().unwrap();
            let again: InstanceRef = r.to_string().parse().unwrap();
            assert_eq!(r, again);
        }
    }

    #[test]
    fn test_rejects_bad_names() {
        for text in [".", "..", "a/b", "gateway:", "x@", "bogus:name", "semi;colon", ""] {
            assert!(text.parse::<InstanceRef>().is_err(), "{:?} should fail", text);
        }
        assert!(InstanceRef::new(ComponentKind::Gateway, "gw*", "localhost").is_err());
    }

    #[test]
    fn test_patterns() {
        let r: InstanceRef = "netprobe:probe*".parse().unwrap();
        assert!(r.is_pattern());
        assert!(r.matches(ComponentKind::Netprobe, "probe12", "localhost"));
        assert!(!r.matches(ComponentKind::San, "probe12", "localhost"));
        assert!(!r.matches(ComponentKind::Netprobe, "probe12", "db1"));

        let any_host: InstanceRef = "gw1@*".parse().unwrap();
        assert!(any_host.matches(ComponentKind::Gateway, "gw1", "db1"));
    }
}
