//! Next action decision table and periodic countdown.
//!
//! Each run of the periodic task performs at most one link operation, chosen
//! by [`next_action()`] from the link's current state.  The write completion
//! handler consults the same table to decide whether to chain a poll straight
//! after a flush.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// What the periodic task should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the pending write frame
    Flush,
    /// Poll the peripheral for a reply
    Poll,
    /// Wake pending host requests
    Wake,
}

/// The parts of link state the decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkView {
    /// A transport error is stuck on the link
    pub failed: bool,
    pub write_pos: usize,
    pub read_left: usize,
    pub wake_scheduled: bool,
}

/// Decide the next action, in priority order:
///
/// 1. After a transport error, only wake requests so they can report it.
/// 2. Flush pending writes, before anything is read.
/// 3. Poll once the read buffer is empty.
/// 4. Otherwise wake requests.
///
/// While a wake is scheduled, no I/O is started, so freshly received data is
/// offered to pending requests first.
pub const fn next_action(view: &LinkView) -> Action {
    if view.failed {
        Action::Wake
    } else if view.write_pos > 0 && !view.wake_scheduled {
        Action::Flush
    } else if view.read_left == 0 && !view.wake_scheduled {
        Action::Poll
    } else {
        Action::Wake
    }
}

/// Countdown driving the periodic task.
///
/// The host calls [`Schedule::tick()`] on every system tick.  The task is due
/// when the countdown expires, at which point it is reloaded with the poll
/// interval.  [`Schedule::asap()`] shortens the countdown so the task runs
/// on the next tick.
pub struct Schedule {
    countdown: AtomicU16,
    interval: AtomicU16,
    installed: AtomicBool,
}

impl Schedule {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            countdown: AtomicU16::new(0),
            interval: AtomicU16::new(0),
            installed: AtomicBool::new(false),
        }
    }

    /// Start the periodic task.  Returns false if it was already running.
    pub fn install(&self) -> bool {
        let installed = !self.installed.swap(true, Ordering::AcqRel);
        if installed {
            self.countdown.store(self.interval(), Ordering::Release);
        }
        installed
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn interval(&self) -> u16 {
        self.interval.load(Ordering::Acquire)
    }

    /// Set the idle poll interval in ticks.  Takes effect when the countdown
    /// is next reloaded.
    pub fn set_interval(&self, ticks: u16) {
        self.interval.store(ticks.max(1), Ordering::Release);
    }

    /// Run the task on the next tick.
    pub fn asap(&self) {
        self.countdown.store(1, Ordering::Release);
    }

    /// Count down one tick.  Returns true if the task is due, having reloaded
    /// the countdown.
    pub fn tick(&self) -> bool {
        if !self.is_installed() {
            return false;
        }
        let interval = self.interval().max(1);
        let prev = self
            .countdown
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(if count <= 1 { interval } else { count - 1 })
            })
            .unwrap_or(interval);
        prev <= 1
    }
}
