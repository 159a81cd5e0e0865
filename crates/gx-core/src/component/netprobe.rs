//! Netprobe

use super::{Component, ComponentKind, InstanceView, Launch};

pub struct Netprobe;

impl Component for Netprobe {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Netprobe
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["netprobe", "probe", "netprobes", "probes"]
    }

    fn legacy_prefix(&self) -> &'static str {
        "netp"
    }

    fn legacy_parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binsuffix", "binary"),
            ("netphome", "home"),
            ("netpbins", "install"),
            ("netpbase", "version"),
            ("netpexec", "program"),
            ("netplogd", "logdir"),
            ("netplogf", "logfile"),
            ("netpport", "port"),
            ("netplibs", "libpaths"),
            ("netpcert", "certificate"),
            ("netpkey", "privatekey"),
            ("netpuser", "user"),
            ("netpopts", "options"),
        ]
    }

    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binary", "netprobe.linux_64"),
            ("home", "{root}/netprobe/netprobes/{name}"),
            ("install", "{root}/packages/netprobe"),
            ("version", "active_prod"),
            ("program", "{install}/{version}/{binary}"),
            ("logfile", "netprobe.log"),
            ("port", "7036"),
            ("libpaths", "{install}/{version}/lib64:{install}/{version}"),
        ]
    }

    fn directories(&self) -> &'static [&'static str] {
        &["packages/netprobe", "netprobe/netprobes"]
    }

    fn default_ports(&self) -> &'static str {
        "7036,7100-"
    }

    fn default_clean(&self) -> &'static str {
        "*.old"
    }

    fn default_purge(&self) -> &'static str {
        "netprobe.log:netprobe.txt:*.snooze:*.user_assignment"
    }

    fn secure_flag(&self) -> bool {
        true
    }

    fn command(&self, view: &InstanceView<'_>, secure_args: Vec<String>) -> Launch {
        let mut args = vec![
            view.name.to_string(),
            "-port".to_string(),
            view.settings.get_string("port"),
        ];
        args.extend(secure_args);
        Launch {
            args,
            env: vec![format!("LOG_FILENAME={}", view.log_path().display())],
        }
    }
}
