// common.rs -- console printing shared by the server crates
//
// Output is forwarded to the `log` facade; the host installs the logger.

use parking_lot::{const_mutex, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

const LOG_TARGET: &str = "console";

// ============================================================
// Redirect buffer for Com_Printf
// ============================================================

// Redirects are per calling thread so concurrent server instances do not
// capture each other's output.
static RD_BUFFERS: Mutex<Option<HashMap<ThreadId, String>>> = const_mutex(None);

static DEVELOPER: AtomicBool = AtomicBool::new(false);

/// Begin redirecting console output of the calling thread into a buffer.
pub fn com_begin_redirect() {
    let mut guard = RD_BUFFERS.lock();
    guard
        .get_or_insert_with(HashMap::new)
        .insert(std::thread::current().id(), String::new());
}

/// End redirect and return the captured output.
pub fn com_end_redirect() -> Option<String> {
    let mut guard = RD_BUFFERS.lock();
    guard.as_mut()?.remove(&std::thread::current().id())
}

/// Append to the calling thread's redirect buffer. Returns false when not redirecting.
fn redirect(msg: &str) -> bool {
    let mut guard = RD_BUFFERS.lock();
    match guard
        .as_mut()
        .and_then(|buffers| buffers.get_mut(&std::thread::current().id()))
    {
        Some(buf) => {
            buf.push_str(msg);
            true
        }
        None => false,
    }
}

// ============================================================
// Com_Printf / Com_DPrintf / Com_Warning
// ============================================================

pub fn com_set_developer(enabled: bool) {
    DEVELOPER.store(enabled, Ordering::Relaxed);
}

pub fn com_developer() -> bool {
    DEVELOPER.load(Ordering::Relaxed)
}

/// General-purpose print function.
pub fn com_printf(msg: &str) {
    if redirect(msg) {
        return;
    }
    log::info!(target: LOG_TARGET, "{}", msg.trim_end());
}

/// Developer-only print. Dropped unless developer mode is on.
pub fn com_dprintf(msg: &str) {
    if !com_developer() {
        return;
    }
    if redirect(msg) {
        return;
    }
    log::debug!(target: LOG_TARGET, "{}", msg.trim_end());
}

/// Something went wrong but the server keeps running.
pub fn com_warning(msg: &str) {
    if redirect(msg) {
        return;
    }
    log::warn!(target: LOG_TARGET, "{}", msg.trim_end());
}
