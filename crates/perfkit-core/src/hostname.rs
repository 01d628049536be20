//! Local hostname lookup for the plugin catalog's `get_hostname`. Mirrors
//! `spawn.rs`'s `cfg(unix)`/fallback split for the same reason: the only
//! syscall involved is POSIX-only, and there is no portable crate already
//! in the dependency stack worth pulling in for one `gethostname(2)` call.

#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = vec![0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    "unknown".to_string()
}
