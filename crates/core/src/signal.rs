// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop signals and bounded thread joins for worker threads.

use crate::clock::deadline_after;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll interval while waiting on a thread to finish.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Shared stop flag whose waits wake as soon as it is triggered.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    /// Re-arm for a new worker run.
    pub fn reset(&self) {
        *self.inner.0.lock() = false;
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep up to `timeout`. Returns true if the signal was triggered.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = deadline_after(Instant::now(), timeout);
        let mut stopped = flag.lock();
        while !*stopped {
            if cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Errors from [`join_with_timeout`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("thread did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("thread panicked")]
    Panicked,
    #[error("a thread cannot join itself")]
    CurrentThread,
}

/// Join `handle`, giving up after `timeout`. A thread that overruns is
/// detached and keeps running, as is a thread asked to join itself.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Result<T, JoinError> {
    if handle.thread().id() == std::thread::current().id() {
        return Err(JoinError::CurrentThread);
    }
    let deadline = deadline_after(Instant::now(), timeout);
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Err(JoinError::TimedOut(timeout));
        }
        std::thread::sleep(JOIN_POLL);
    }
    handle.join().map_err(|_| JoinError::Panicked)
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
