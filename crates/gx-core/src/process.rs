//! Locating instance processes through `/proc` on the instance's host

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use gx_host::Host;

use crate::error::Result;
use crate::instance::Instance;

/// Owner and start time of a running instance process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
    pub started: Option<SystemTime>,
}

/// A TCP socket in LISTEN state from `/proc/net/tcp` or `/proc/net/tcp6`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListeningSocket {
    pub port: u16,
    pub inode: u64,
}

const TCP_LISTEN: &str = "0A";

/// Parse the text of `/proc/net/tcp{,6}`, keeping LISTEN sockets
pub fn parse_proc_net_tcp(text: &str) -> Vec<ListeningSocket> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN {
                return None;
            }
            let (_, port) = fields[1].rsplit_once(':')?;
            Some(ListeningSocket {
                port: u16::from_str_radix(port, 16).ok()?,
                inode: fields[9].parse().ok()?,
            })
        })
        .collect()
}

/// Every LISTEN socket on `host`. Missing tables are skipped.
pub async fn listening_sockets(host: &dyn Host) -> Result<Vec<ListeningSocket>> {
    let mut sockets = Vec::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        match host.read_file(Path::new(table)).await {
            Ok(data) => sockets.extend(parse_proc_net_tcp(&String::from_utf8_lossy(&data))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(sockets)
}

/// Split a raw `cmdline` on NUL, dropping the trailing empty field
pub fn split_cmdline(raw: &[u8]) -> Vec<String> {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    if raw.is_empty() {
        return vec![];
    }
    raw.split(|b| *b == 0)
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Numeric `/proc` entries on `host`, ascending
#[cfg(target_os = "linux")]
async fn pids(host: &dyn Host) -> Result<Vec<u32>> {
    let mut pids: Vec<u32> = host
        .read_dir(Path::new("/proc"))
        .await?
        .into_iter()
        .filter_map(|entry| entry.name.parse().ok())
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

fn proc_path(pid: u32) -> PathBuf {
    PathBuf::from(format!("/proc/{}", pid))
}

/// The pid of the running process belonging to `instance`, if any.
///
/// Processes whose command line cannot be read are skipped; only a failure
/// to list `/proc` itself is an error.
#[cfg(target_os = "linux")]
pub async fn find_pid(instance: &Instance) -> Result<Option<u32>> {
    let host = instance.host();
    for pid in pids(host.as_ref()).await? {
        let raw = match host.read_file(&proc_path(pid).join("cmdline")).await {
            Ok(raw) => raw,
            Err(e) if e.is_transport() => return Err(e.into()),
            Err(_) => continue,
        };
        let argv = split_cmdline(&raw);
        if argv.is_empty() {
            continue;
        }
        if instance.with_view(|view| instance.component().matches_process(view, &argv)) {
            tracing::debug!("{}: found pid {}", instance, pid);
            return Ok(Some(pid));
        }
    }
    Ok(None)
}

#[cfg(not(target_os = "linux"))]
pub async fn find_pid(_instance: &Instance) -> Result<Option<u32>> {
    Ok(None)
}

/// pid, owner and start time of `instance`'s process, if running
pub async fn process_info(instance: &Instance) -> Result<Option<ProcessInfo>> {
    let Some(pid) = find_pid(instance).await? else {
        return Ok(None);
    };
    match instance.host().stat(&proc_path(pid)).await {
        Ok(info) => Ok(Some(ProcessInfo {
            pid,
            uid: info.uid,
            gid: info.gid,
            started: info.modified,
        })),
        // exited between the scan and the stat
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// TCP ports `pid` is listening on, found by matching its socket inodes
/// against the kernel's socket tables
pub async fn listening_ports(host: &dyn Host, pid: u32) -> Result<Vec<u16>> {
    let fd_dir = proc_path(pid).join("fd");
    let entries = match host.read_dir(&fd_dir).await {
        Ok(entries) => entries,
        Err(e) if e.is_transport() => return Err(e.into()),
        Err(_) => return Ok(vec![]),
    };

    let mut inodes = Vec::new();
    for entry in entries {
        if let Ok(target) = host.read_link(&fd_dir.join(&entry.name)).await {
            let target = target.to_string_lossy();
            if let Some(inode) = target
                .strip_prefix("socket:[")
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse::<u64>().ok())
            {
                inodes.push(inode);
            }
        }
    }
    if inodes.is_empty() {
        return Ok(vec![]);
    }

    let mut ports: Vec<u16> = listening_sockets(host)
        .await?
        .into_iter()
        .filter(|s| inodes.contains(&s.inode))
        .map(|s| s.port)
        .collect();
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:1B7F 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41234 1 0000000000000000 100 0 0 10 0
   1: 0100007F:0277 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 15321 1 0000000000000000 100 0 0 10 0
   2: 0100007F:1B7F 0100007F:C2A4 01 00000000:00000000 00:00000000 00000000  1000        0 41999 1 0000000000000000 20 4 30 10 -1
";

    #[test]
    fn test_parse_listen_sockets() {
        let sockets = parse_proc_net_tcp(TCP);
        assert_eq!(
            sockets,
            vec![
                ListeningSocket { port: 7039, inode: 41234 },
                ListeningSocket { port: 631, inode: 15321 },
            ]
        );
    }

    #[test]
    fn test_parse_ignores_garbage() {
        assert!(parse_proc_net_tcp("header\nnot a socket line\n").is_empty());
        assert!(parse_proc_net_tcp("").is_empty());
    }

    #[test]
    fn test_split_cmdline() {
        assert_eq!(
            split_cmdline(b"/usr/bin/netprobe.linux_64\0probe1\0-port\07036\0"),
            vec!["/usr/bin/netprobe.linux_64", "probe1", "-port", "7036"]
        );
        assert_eq!(split_cmdline(b"a\0\0b\0"), vec!["a", "", "b"]);
        assert!(split_cmdline(b"").is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_find_pid_of_stopped_instance() {
        use crate::component::ComponentKind;
        use crate::config::{GlobalConfig, HostsFile};
        use crate::Context;

        let dir = tempfile::TempDir::new().unwrap();
        let config = GlobalConfig {
            root: dir.path().to_path_buf(),
            ..GlobalConfig::default()
        };
        let ctx = Context::new(config, HostsFile::default());
        let np = ctx
            .instance(ComponentKind::Netprobe, "no-such-probe-running", "localhost")
            .unwrap();
        assert_eq!(find_pid(&np).await.unwrap(), None);
        assert_eq!(process_info(&np).await.unwrap(), None);
    }
}
