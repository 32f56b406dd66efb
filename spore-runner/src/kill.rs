//! Process tree termination

use std::io;

/// Sends `SIGKILL` to the process group led by `pid`
///
/// Children are spawned as group leaders, so this reaches every descendant
/// that did not start a group of its own. A group that is already gone is
/// not an error.
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: killpg only sends a signal; the group id comes from a child we spawned
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

/// No process groups here; the supervisor kills the direct child instead
#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: u32) -> io::Result<()> {
    Ok(())
}
