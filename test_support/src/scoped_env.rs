//! Temporary changes to the process environment.
//!
//! `cmk::runner::run` reads `CMK_BUILD_HOME` and `CMK_PLATFORM` from the real
//! environment. [`ScopedEnv`] holds a process-wide lock while a test changes
//! them and puts the previous values back when dropped.

use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Environment changes that last until the guard is dropped.
#[derive(Debug)]
pub struct ScopedEnv {
    saved: Vec<(&'static str, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    /// Take the environment lock. Blocks while another test holds it.
    #[must_use]
    pub fn lock() -> Self {
        let guard = ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            saved: Vec::new(),
            _lock: guard,
        }
    }

    /// Set `name` to `value` until the guard is dropped.
    pub fn set(&mut self, name: &'static str, value: &str) -> &mut Self {
        self.saved.push((name, std::env::var_os(name)));
        // SAFETY: the lock serialises every mutation made through this type.
        unsafe { std::env::set_var(name, value) };
        self
    }

    /// Unset `name` until the guard is dropped.
    pub fn remove(&mut self, name: &'static str) -> &mut Self {
        self.saved.push((name, std::env::var_os(name)));
        // SAFETY: the lock serialises every mutation made through this type.
        unsafe { std::env::remove_var(name) };
        self
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (name, previous) in self.saved.drain(..).rev() {
            // SAFETY: the lock is still held; it is released after this body.
            unsafe {
                match previous {
                    Some(value) => std::env::set_var(name, value),
                    None => std::env::remove_var(name),
                }
            }
        }
    }
}
