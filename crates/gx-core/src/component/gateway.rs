//! Gateway

use gx_host::Signal;

use super::{Component, ComponentKind, InstanceView, Launch};

pub struct Gateway;

impl Component for Gateway {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Gateway
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["gateway", "gateways"]
    }

    fn legacy_prefix(&self) -> &'static str {
        "gate"
    }

    fn legacy_parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binsuffix", "binary"),
            ("gatehome", "home"),
            ("gatebins", "install"),
            ("gatebase", "version"),
            ("gateexec", "program"),
            ("gatelogd", "logdir"),
            ("gatelogf", "logfile"),
            ("gateport", "port"),
            ("gatelibs", "libpaths"),
            ("gatecert", "certificate"),
            ("gatekey", "privatekey"),
            ("gateaes", "keyfile"),
            ("aesfile", "keyfile"),
            ("gatename", "name"),
            ("gatelich", "licdhost"),
            ("gatelicp", "licdport"),
            ("gatelics", "licdsecure"),
            ("gateuser", "user"),
            ("gateopts", "options"),
        ]
    }

    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binary", "gateway2.linux_64"),
            ("home", "{root}/gateway/gateways/{name}"),
            ("install", "{root}/packages/gateway"),
            ("version", "active_prod"),
            ("program", "{install}/{version}/{binary}"),
            ("logfile", "gateway.log"),
            ("port", "7039"),
            ("libpaths", "{install}/{version}/lib64:/usr/lib64"),
            ("gatewayname", "{name}"),
        ]
    }

    fn directories(&self) -> &'static [&'static str] {
        &[
            "packages/gateway",
            "gateway/gateways",
            "gateway/gateway_shared",
            "gateway/gateway_config",
            "gateway/templates",
        ]
    }

    fn default_ports(&self) -> &'static str {
        "7039,7100-"
    }

    fn default_clean(&self) -> &'static str {
        "*.old:*.history"
    }

    fn default_purge(&self) -> &'static str {
        "gateway.log:gateway.txt:gateway.snooze:gateway.user_assignment:licences.cache:cache/:database/"
    }

    fn uses_keyfiles(&self) -> bool {
        true
    }

    fn command(&self, view: &InstanceView<'_>, secure_args: Vec<String>) -> Launch {
        let settings = view.settings;
        let mut args = Vec::new();

        if settings.is_set("port") {
            args.push("-port".to_string());
            args.push(settings.get_string("port"));
        }
        let gatewayname = settings.get_string("gatewayname");
        if !gatewayname.is_empty() && gatewayname != view.name {
            args.push(gatewayname);
        }
        args.extend([
            view.name.to_string(),
            "-resources-dir".to_string(),
            view.base_dir().join("resources").to_string_lossy().into_owned(),
            "-log".to_string(),
            view.log_path().to_string_lossy().into_owned(),
            "-setup".to_string(),
            view.home.join("gateway.setup.xml").to_string_lossy().into_owned(),
            "-stats".to_string(),
        ]);

        if settings.is_set("licdhost") {
            args.push("-licd-host".to_string());
            args.push(settings.get_string("licdhost"));
        }
        if settings.get_u16("licdport").unwrap_or(0) != 0 {
            args.push("-licd-port".to_string());
            args.push(settings.get_string("licdport"));
        }

        let has_certificate = !secure_args.is_empty();
        args.extend(secure_args);

        let licdsecure = settings.get_string("licdsecure");
        if (has_certificate && licdsecure != "false") || (!has_certificate && licdsecure == "true") {
            args.push("-licd-secure".to_string());
        }

        if settings.get_bool("usekeyfile") {
            if let Some(keyfile) = view.path_setting("keyfile") {
                args.push("-key-file".to_string());
                args.push(keyfile.to_string_lossy().into_owned());
            }
            if let Some(previous) = view.path_setting("prevkeyfile") {
                args.push("-previous-key-file".to_string());
                args.push(previous.to_string_lossy().into_owned());
            }
        }

        Launch { args, env: vec![] }
    }

    fn reload_signal(&self) -> Option<Signal> {
        Some(Signal::Usr1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::path::Path;

    fn settings() -> Settings {
        let mut settings = Settings::new();
        Gateway.apply_defaults(&mut settings, Path::new("/opt/geneos"), "Demo");
        settings
    }

    #[test]
    fn test_command_line() {
        let settings = settings();
        let view = InstanceView {
            name: "Demo",
            home: Path::new("/opt/geneos/gateway/gateways/Demo"),
            settings: &settings,
        };
        let launch = Gateway.command(&view, vec![]);
        assert_eq!(
            launch.args,
            vec![
                "-port",
                "7039",
                "Demo",
                "-resources-dir",
                "/opt/geneos/packages/gateway/active_prod/resources",
                "-log",
                "/opt/geneos/gateway/gateways/Demo/gateway.log",
                "-setup",
                "/opt/geneos/gateway/gateways/Demo/gateway.setup.xml",
                "-stats",
            ]
        );
        assert!(launch.env.is_empty());
    }

    #[test]
    fn test_secure_and_licd_arguments() {
        let mut settings = settings();
        settings.set("licdhost", "licd.example.com");
        settings.set("licdport", 7041);
        settings.set("usekeyfile", true);
        settings.set("keyfile", "keyfiles/current.aes");
        let view = InstanceView {
            name: "Demo",
            home: Path::new("/g"),
            settings: &settings,
        };
        let secure = vec!["-ssl-certificate".to_string(), "/g/gateway.pem".to_string()];
        let args = Gateway.command(&view, secure).args;

        let tail: Vec<&str> = args.iter().skip(10).map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "-licd-host",
                "licd.example.com",
                "-licd-port",
                "7041",
                "-ssl-certificate",
                "/g/gateway.pem",
                "-licd-secure",
                "-key-file",
                "/g/keyfiles/current.aes",
            ]
        );
    }

    #[test]
    fn test_reload_is_usr1() {
        assert_eq!(Gateway.reload_signal(), Some(Signal::Usr1));
    }
}
