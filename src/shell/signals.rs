use std::io;

use log::{debug, warn};
use nix::sys::signal::{signal, SigHandler, Signal};

/// Signals an interactive shell must survive.
const IGNORED_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTOU,
];

/// Dispositions children get back. SIGTSTP stays ignored: without job control
/// a stopped foreground job could never be resumed.
const RESTORED_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTTOU];

/// 忽略终端产生的信号，如 Ctrl-C, Ctrl-\ 和 Ctrl-Z
pub fn ignore_block_signals() {
    for sig in IGNORED_SIGNALS {
        // SAFETY: installing SIG_IGN does not run any handler code.
        if let Err(err) = unsafe { signal(sig, SigHandler::SigIgn) } {
            warn!("无法忽略信号 {}: {}", sig, err);
        }
    }
    debug!("已忽略终端信号");
}

/// Restores default dispositions. Runs in the forked child right before
/// exec, so it only makes async-signal-safe calls.
pub fn restore_default_signals() -> io::Result<()> {
    for sig in RESTORED_SIGNALS {
        // SAFETY: SIG_DFL installs no handler; `signal` is async-signal-safe.
        unsafe { signal(sig, SigHandler::SigDfl) }?;
    }
    Ok(())
}
