//! Reload signaling for the external OpenVPN process.
//!
//! Fire-and-forget: a missing pid file or dead process is at most a
//! warning. The service manager owns actual process lifecycle.

use std::fs;
use std::path::Path;

/// Read the pid OpenVPN wrote via its `writepid` directive. Any problem
/// yields `None` with the appropriate log line.
pub fn read_pid(pid_path: &Path) -> Option<i32> {
    let content = match fs::read_to_string(pid_path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(
                "PID file {} does not exist, OpenVPN doesn't seem to be running",
                pid_path.display()
            );
            return None;
        }
        Err(err) => {
            tracing::warn!("Failed to read PID file {}: {}", pid_path.display(), err);
            return None;
        }
    };

    match content.trim().parse::<i32>() {
        // kill() aimed at pid 0 or a negative pid targets whole process
        // groups; only a concrete single pid is acceptable here.
        Ok(pid) if pid > 0 => Some(pid),
        _ => {
            tracing::warn!(
                "PID file {} holds no usable process id: {:?}",
                pid_path.display(),
                content.trim()
            );
            None
        }
    }
}

/// Send SIGHUP to the process recorded in the pid file so it re-reads its
/// configuration.
pub fn signal_reload(pid_path: &Path) {
    let Some(pid) = read_pid(pid_path) else {
        return;
    };

    tracing::info!("Reloading OpenVPN (pid {})", pid);
    send_sighup(pid);
}

#[cfg(unix)]
fn send_sighup(pid: i32) {
    // kill(2) is safe here: the pid is positive and came from the file
    // OpenVPN itself wrote.
    let ret = unsafe { libc::kill(pid, libc::SIGHUP) };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            tracing::warn!("No such process {}, cannot reload OpenVPN", pid);
        } else {
            tracing::warn!("Failed to signal process {}: {}", pid, err);
        }
    }
}

#[cfg(not(unix))]
fn send_sighup(pid: i32) {
    tracing::warn!(
        "Reload signaling is not supported on this platform (pid {})",
        pid
    );
}
