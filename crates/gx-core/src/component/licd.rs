//! License daemon

use super::{Component, ComponentKind, InstanceView, Launch};

pub struct Licd;

impl Component for Licd {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Licd
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["licd", "licds"]
    }

    fn legacy_prefix(&self) -> &'static str {
        "licd"
    }

    fn legacy_parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binsuffix", "binary"),
            ("licdhome", "home"),
            ("licdbins", "install"),
            ("licdbase", "version"),
            ("licdexec", "program"),
            ("licdlogd", "logdir"),
            ("licdlogf", "logfile"),
            ("licdport", "port"),
            ("licdlibs", "libpaths"),
            ("licdcert", "certificate"),
            ("licdkey", "privatekey"),
            ("licduser", "user"),
            ("licdopts", "options"),
        ]
    }

    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binary", "licd.linux_64"),
            ("home", "{root}/licd/licds/{name}"),
            ("install", "{root}/packages/licd"),
            ("version", "active_prod"),
            ("program", "{install}/{version}/{binary}"),
            ("logfile", "licd.log"),
            ("port", "7041"),
            ("libpaths", "{install}/{version}/lib64"),
        ]
    }

    fn directories(&self) -> &'static [&'static str] {
        &["packages/licd", "licd/licds"]
    }

    fn default_ports(&self) -> &'static str {
        "7041,7100-"
    }

    fn default_clean(&self) -> &'static str {
        "*.old"
    }

    fn default_purge(&self) -> &'static str {
        "licd.log:licd.txt"
    }

    fn secure_flag(&self) -> bool {
        true
    }

    fn command(&self, view: &InstanceView<'_>, secure_args: Vec<String>) -> Launch {
        let mut args = vec![
            view.name.to_string(),
            "-port".to_string(),
            view.settings.get_string("port"),
            "-log".to_string(),
            view.log_path().to_string_lossy().into_owned(),
        ];
        args.extend(secure_args);
        Launch { args, env: vec![] }
    }
}
