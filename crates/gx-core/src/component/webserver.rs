//! Web dashboard server, a Java application

use super::{basename, Component, ComponentKind, InstanceView, Launch};

const JAR: &str = "geneos-web-server.jar";

pub struct Webserver;

impl Component for Webserver {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Webserver
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["web-server", "webserver", "webservers", "webdashboard", "dashboards"]
    }

    fn legacy_prefix(&self) -> &'static str {
        "webs"
    }

    fn legacy_parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("binsuffix", "binary"),
            ("webshome", "home"),
            ("websbins", "install"),
            ("websbase", "version"),
            ("websexec", "program"),
            ("webslogd", "logdir"),
            ("webslogf", "logfile"),
            ("websport", "port"),
            ("webslibs", "libpaths"),
            ("webscert", "certificate"),
            ("webskey", "privatekey"),
            ("websuser", "user"),
            ("websopts", "options"),
        ]
    }

    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("home", "{root}/webserver/webservers/{name}"),
            ("install", "{root}/packages/webserver"),
            ("version", "active_prod"),
            ("program", "{install}/{version}/JRE/bin/java"),
            ("logdir", "logs"),
            ("logfile", "webdashboard.log"),
            ("port", "8080"),
            ("libpaths", "{install}/{version}/JRE/lib:{install}/{version}/lib64"),
            ("websxmx", "1024m"),
        ]
    }

    fn directories(&self) -> &'static [&'static str] {
        &["packages/webserver", "webserver/webservers"]
    }

    fn default_ports(&self) -> &'static str {
        "8080,8100-"
    }

    fn default_clean(&self) -> &'static str {
        "*.old"
    }

    fn default_purge(&self) -> &'static str {
        "logs/*.log:webserver.txt"
    }

    fn command(&self, view: &InstanceView<'_>, _secure_args: Vec<String>) -> Launch {
        let home = view.home.display();
        let base = view.base_dir();
        let base = base.display();
        let settings = view.settings;

        let args = vec![
            "-XX:+UseConcMarkSweepGC".to_string(),
            format!("-Xmx{}", settings.get_string("websxmx")),
            "-server".to_string(),
            format!("-Djava.io.tmpdir={}/webapps", home),
            "-Djava.awt.headless=true".to_string(),
            format!("-DsecurityConfig={}/config/security.xml", home),
            format!("-Dcom.itrsgroup.configuration.file={}/config/config.xml", home),
            format!("-Dcom.itrsgroup.dashboard.resources.dir={}/resources", base),
            format!("-Djava.library.path={}", settings.get_string("libpaths")),
            format!("-Dlog4j2.configurationFile=file:{}/config/log4j2.properties", home),
            format!("-Dworking.directory={}", home),
            "-Dcom.itrsgroup.legacy.database.maxconnections=100".to_string(),
            format!("-Dcom.itrsgroup.sso.config.file={}/config/sso.properties", home),
            format!("-Djava.security.auth.login.config={}/config/login.conf", home),
            "-Djava.security.krb5.conf=/etc/krb5.conf".to_string(),
            "-Dcom.itrsgroup.bdosync=DataView,BDOSyncType_Level,DV1_SyncLevel_RedAmberCells"
                .to_string(),
            "-XX:+HeapDumpOnOutOfMemoryError".to_string(),
            "-XX:HeapDumpPath=/tmp".to_string(),
            "-jar".to_string(),
            format!("{}/{}", base, JAR),
            "-dir".to_string(),
            format!("{}/webapps", base),
            "-port".to_string(),
            settings.get_string("port"),
            "-maxThreads".to_string(),
            "254".to_string(),
        ];
        Launch { args, env: vec![] }
    }

    /// The JVM is identified by its working directory and the server jar
    fn matches_process(&self, view: &InstanceView<'_>, argv: &[String]) -> bool {
        let Some((program, rest)) = argv.split_first() else {
            return false;
        };
        if basename(program) != "java" {
            return false;
        }
        let workdir = format!("-Dworking.directory={}", view.home.display());
        rest.iter().any(|arg| *arg == workdir) && rest.iter().any(|arg| arg.ends_with(JAR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::path::Path;

    #[test]
    fn test_matches_own_jvm_only() {
        let mut settings = Settings::new();
        Webserver.apply_defaults(&mut settings, Path::new("/opt/geneos"), "dash");
        let home = Path::new("/opt/geneos/webserver/webservers/dash");
        let view = InstanceView {
            name: "dash",
            home,
            settings: &settings,
        };

        let mut argv = vec!["/opt/geneos/packages/webserver/active_prod/JRE/bin/java".to_string()];
        argv.extend(Webserver.command(&view, vec![]).args);
        assert!(Webserver.matches_process(&view, &argv));

        let other = InstanceView {
            name: "other",
            home: Path::new("/opt/geneos/webserver/webservers/other"),
            settings: &settings,
        };
        assert!(!Webserver.matches_process(&other, &argv));

        argv[0] = "/usr/bin/python3".to_string();
        assert!(!Webserver.matches_process(&view, &argv));
    }
}
