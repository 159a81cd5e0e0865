//! Legacy `<type>.rc` configuration files

use serde_json::Value;

use crate::component::{Component, ComponentKind};
use crate::settings::{typed_value, Settings};

/// Parse the `KEY=value` lines of a legacy file.
///
/// Keys are matched case-insensitively. `BinSuffix` and keys carrying the
/// type's legacy prefix are translated through its parameter table;
/// anything else is an environment variable and is collected, with its
/// original spelling, into the `env` list.
pub fn parse_rc(text: &str, component: &dyn Component) -> Settings {
    let prefix = component.legacy_prefix();
    let mut settings = Settings::new();
    let mut env = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            tracing::debug!("ignoring malformed legacy line {:?}", line);
            continue;
        };
        let key = key.trim();
        let value = value.trim_matches(|c| c == '"' || c == '\'' || c == ' ' || c == '\t');
        let lower = key.to_ascii_lowercase();

        if lower == "binsuffix" || (!prefix.is_empty() && lower.starts_with(prefix)) {
            let target = component.legacy_key(&lower).unwrap_or(lower.as_str());
            settings.set(target, typed_value(value));
        } else {
            env.push(Value::String(format!("{}={}", key, value)));
        }
    }

    if !env.is_empty() {
        settings.set("env", Value::Array(env));
    }
    if component.kind() == ComponentKind::Gateway && settings.is_set("name") {
        let name = settings.get_string("name");
        settings.set("gatewayname", name);
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_rc() {
        let text = r#"
# written by an older tool
GateName=Example
GatePort="7039"
GateLogF='gateway.log'
BinSuffix=gateway2.linux_64
JAVA_HOME=/usr/lib/jvm/default

GateOpts=-nopassword
"#;
        let settings = parse_rc(text, ComponentKind::Gateway.component());
        assert_eq!(settings.get_string("name"), "Example");
        assert_eq!(settings.get_string("gatewayname"), "Example");
        assert_eq!(settings.get("port"), Some(&Value::from(7039)));
        assert_eq!(settings.get_string("logfile"), "gateway.log");
        assert_eq!(settings.get_string("binary"), "gateway2.linux_64");
        assert_eq!(settings.get_string("options"), "-nopassword");
        assert_eq!(settings.get_list("env"), vec!["JAVA_HOME=/usr/lib/jvm/default"]);
    }

    #[test]
    fn test_unknown_prefixed_key_is_kept() {
        let settings = parse_rc("NetpExtra=1\n", ComponentKind::Netprobe.component());
        assert_eq!(settings.get("netpextra"), Some(&Value::from(1)));
        assert!(!settings.is_set("gatewayname"));
    }
}
