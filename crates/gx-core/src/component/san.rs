//! Self-announcing netprobe

use super::{Component, ComponentKind, InstanceView, Launch};

pub struct San;

impl Component for San {
    fn kind(&self) -> ComponentKind {
        ComponentKind::San
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["san", "sans"]
    }

    fn legacy_prefix(&self) -> &'static str {
        "san"
    }

    fn legacy_parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binsuffix", "binary"),
            ("sanhome", "home"),
            ("sanbins", "install"),
            ("sanbase", "version"),
            ("sanexec", "program"),
            ("sanlogd", "logdir"),
            ("sanlogf", "logfile"),
            ("sanport", "port"),
            ("sanlibs", "libpaths"),
            ("sancert", "certificate"),
            ("sankey", "privatekey"),
            ("sanuser", "user"),
            ("sanopts", "options"),
        ]
    }

    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binary", "netprobe.linux_64"),
            ("home", "{root}/netprobe/sans/{name}"),
            ("install", "{root}/packages/netprobe"),
            ("version", "active_prod"),
            ("program", "{install}/{version}/{binary}"),
            ("logfile", "san.log"),
            ("port", "7036"),
            ("libpaths", "{install}/{version}/lib64:{install}/{version}"),
            ("sanname", "{name}"),
        ]
    }

    fn directories(&self) -> &'static [&'static str] {
        &["packages/netprobe", "netprobe/sans", "netprobe/templates"]
    }

    fn default_ports(&self) -> &'static str {
        "7036,7100-"
    }

    fn default_clean(&self) -> &'static str {
        "*.old"
    }

    fn default_purge(&self) -> &'static str {
        "san.log:san.txt:*.snooze:*.user_assignment"
    }

    fn parent(&self) -> Option<ComponentKind> {
        Some(ComponentKind::Netprobe)
    }

    fn secure_flag(&self) -> bool {
        true
    }

    fn command(&self, view: &InstanceView<'_>, secure_args: Vec<String>) -> Launch {
        let mut args = vec![
            view.name.to_string(),
            "-listenip".to_string(),
            "none".to_string(),
            "-port".to_string(),
            view.settings.get_string("port"),
            "-setup".to_string(),
            "netprobe.setup.xml".to_string(),
            "-setup-interval".to_string(),
            "300".to_string(),
        ];
        args.extend(secure_args);
        Launch {
            args,
            env: vec![format!("LOG_FILENAME={}", view.log_path().display())],
        }
    }
}
