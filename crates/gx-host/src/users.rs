//! Local user and group lookups used for privilege separation

use crate::error::{HostError, Result};
use crate::host::Credentials;

/// Name of the user this process runs as
pub fn current_username() -> String {
    whoami::username()
}

/// True if the effective user is root
#[cfg(unix)]
pub fn is_superuser() -> bool {
    // SAFETY: geteuid cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_superuser() -> bool {
    false
}

/// True if the caller may act on behalf of `username`: the same user, or root
pub fn can_control(username: &str) -> bool {
    username.is_empty() || is_superuser() || username == current_username()
}

/// Look up uid, primary gid and supplementary groups for `username`
#[cfg(unix)]
pub fn lookup_user(username: &str) -> Result<Credentials> {
    use std::ffi::{CStr, CString};
    use std::path::PathBuf;

    let c_name = CString::new(username)
        .map_err(|_| HostError::InvalidArgument(format!("invalid user name {:?}", username)))?;

    // SAFETY: passwd is plain data; getpwnam_r fills it using `buf` for strings
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; 16 * 1024];
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe {
        libc::getpwnam_r(
            c_name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() {
        return Err(HostError::InvalidArgument(format!(
            "unknown user {:?}",
            username
        )));
    }

    let uid = pwd.pw_uid as u32;
    let gid = pwd.pw_gid as u32;
    // SAFETY: pw_dir points into `buf`, which is still alive
    let home = unsafe { CStr::from_ptr(pwd.pw_dir) }
        .to_string_lossy()
        .into_owned();

    Ok(Credentials {
        username: username.to_string(),
        uid,
        gid,
        groups: supplementary_groups(&c_name, gid),
        home: PathBuf::from(home),
    })
}

#[cfg(target_os = "linux")]
fn supplementary_groups(c_name: &std::ffi::CStr, gid: u32) -> Vec<u32> {
    let mut count: libc::c_int = 32;
    loop {
        let mut groups: Vec<libc::gid_t> = vec![0; count as usize];
        let previous = count;
        // SAFETY: `groups` has room for `count` entries
        let rc = unsafe {
            libc::getgrouplist(
                c_name.as_ptr(),
                gid as libc::gid_t,
                groups.as_mut_ptr(),
                &mut count,
            )
        };
        if rc >= 0 {
            groups.truncate(count as usize);
            return groups.into_iter().map(|g| g as u32).collect();
        }
        if count <= previous {
            count = previous * 2;
        }
        if count > 65536 {
            return vec![gid];
        }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn supplementary_groups(_c_name: &std::ffi::CStr, gid: u32) -> Vec<u32> {
    vec![gid]
}

#[cfg(not(unix))]
pub fn lookup_user(username: &str) -> Result<Credentials> {
    Err(HostError::NotSupported(format!(
        "user lookup for {} on this platform",
        username
    )))
}
