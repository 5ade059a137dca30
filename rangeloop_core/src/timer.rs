//! Fixed-period action runner with overrun detection.
//!
//! A `PeriodicTimer` owns at most one worker thread. The worker waits until
//! the armed deadline, runs the bound action, and flags an overrun when the
//! action finishes more than one period after the deadline. The action gets a
//! `TimerHandle` so it can re-arm the deadline (`reset`) from inside a tick.
//! A `reset` from any other thread postpones the pending tick.
//!
//! Safety: the worker is joined on `disable()` and on drop, so a timer never
//! leaks its thread.

use crossbeam_channel as xch;
use rangeloop_traits::clock::{Clock, MonotonicClock};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::error::LoopError;

type Action = Box<dyn FnMut(&TimerHandle) + Send>;

struct TimerShared {
    period: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
    armed_at: Mutex<Instant>,
    rearms: AtomicU64,
    running: AtomicBool,
    quiet: AtomicBool,
    ticks: AtomicU64,
    overruns: AtomicU64,
    panics: AtomicU64,
}

impl TimerShared {
    fn arm(&self, at: Instant) {
        *self.armed_at.lock().unwrap_or_else(PoisonError::into_inner) = at;
        self.rearms.fetch_add(1, Ordering::Relaxed);
    }

    fn armed_at(&self) -> Instant {
        *self.armed_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left until the armed deadline, never more than one period.
    fn until_deadline(&self) -> Duration {
        let due = self.armed_at() + self.period;
        due.saturating_duration_since(self.clock.now())
            .min(self.period)
    }

    /// Advance the deadline after a wait. A late wake-up keeps the schedule;
    /// an early one (simulated clocks) re-arms from now.
    fn rearm_after_wait(&self) {
        let now = self.clock.now();
        let mut armed = self.armed_at.lock().unwrap_or_else(PoisonError::into_inner);
        let due = *armed + self.period;
        *armed = if now >= due { due } else { now };
    }

    fn check_overrun(&self) {
        let now = self.clock.now();
        let mut armed = self.armed_at.lock().unwrap_or_else(PoisonError::into_inner);
        let late = now.saturating_duration_since(*armed);
        if late > self.period {
            let n = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            if !self.quiet.load(Ordering::Relaxed) {
                tracing::warn!(
                    period_us = self.period.as_micros() as u64,
                    late_us = late.as_micros() as u64,
                    overruns = n,
                    "periodic action overran its period"
                );
            }
            *armed = now;
        }
    }
}

/// Handle passed to the action on every tick.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<TimerShared>,
}

impl TimerHandle {
    /// Re-arm the deadline from now, suppressing a pending overrun for this cycle.
    pub fn reset(&self) {
        self.shared.arm(self.shared.clock.now());
    }

    /// Ask the worker to exit after the current tick.
    pub fn cancel(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
    }

    pub fn period(&self) -> Duration {
        self.shared.period
    }

    pub fn overrun_count(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}

struct Worker {
    stop_tx: xch::Sender<()>,
    join: JoinHandle<()>,
    thread: ThreadId,
}

pub struct PeriodicTimer {
    shared: Arc<TimerShared>,
    action: Arc<Mutex<Action>>,
    name: String,
    worker: Option<Worker>,
}

impl core::fmt::Debug for PeriodicTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PeriodicTimer")
            .field("name", &self.name)
            .field("period", &self.shared.period)
            .field("enabled", &self.is_enabled())
            .field("overruns", &self.overrun_count())
            .finish()
    }
}

impl PeriodicTimer {
    /// Bind `action` to a period. No thread is started until `enable()`.
    pub fn new<F>(period: Duration, action: F) -> Result<Self, LoopError>
    where
        F: FnMut(&TimerHandle) + Send + 'static,
    {
        if period.is_zero() {
            return Err(LoopError::Config("timer period must be > 0".into()));
        }
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
        let now = clock.now();
        Ok(Self {
            shared: Arc::new(TimerShared {
                period,
                clock,
                armed_at: Mutex::new(now),
                rearms: AtomicU64::new(0),
                running: AtomicBool::new(false),
                quiet: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                overruns: AtomicU64::new(0),
                panics: AtomicU64::new(0),
            }),
            action: Arc::new(Mutex::new(Box::new(action))),
            name: "periodic-timer".into(),
            worker: None,
        })
    }

    /// Replace the time source. Only valid before the first `enable()`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            let now = clock.now();
            shared.clock = clock;
            *shared
                .armed_at
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner) = now;
        } else {
            tracing::warn!(timer = %self.name, "clock not replaced: timer already shared");
        }
        self
    }

    /// Worker thread name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn suppress_overrun_log(&self, quiet: bool) {
        self.shared.quiet.store(quiet, Ordering::Relaxed);
    }

    pub fn period(&self) -> Duration {
        self.shared.period
    }

    pub fn is_enabled(&self) -> bool {
        self.worker.is_some() && self.shared.running.load(Ordering::Relaxed)
    }

    pub fn overrun_count(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// Completed action invocations, panicking ones included.
    pub fn tick_count(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    pub fn panic_count(&self) -> u64 {
        self.shared.panics.load(Ordering::Relaxed)
    }

    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            shared: self.shared.clone(),
        }
    }

    /// Re-arm the deadline from now.
    pub fn reset(&self) {
        self.handle().reset();
    }

    /// Start invoking the action once per period. No-op if already running.
    pub fn enable(&mut self) -> Result<(), LoopError> {
        if self.is_enabled() {
            return Ok(());
        }
        // A worker that cancelled itself is still joinable.
        self.disable();

        let (stop_tx, stop_rx) = xch::bounded::<()>(1);
        let shared = self.shared.clone();
        let action = self.action.clone();
        shared.arm(shared.clock.now());
        shared.running.store(true, Ordering::Relaxed);

        let join = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_worker(&shared, &action, &stop_rx))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Relaxed);
                LoopError::Thread(e.to_string())
            })?;
        tracing::debug!(timer = %self.name, period_us = self.shared.period.as_micros() as u64, "timer enabled");
        self.worker = Some(Worker {
            stop_tx,
            thread: join.thread().id(),
            join,
        });
        Ok(())
    }

    /// Stop future invocations. An in-flight action runs to completion.
    pub fn disable(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop_tx.try_send(());
        if std::thread::current().id() == worker.thread {
            // Called from inside the action: the loop exits on its own.
            return;
        }
        match worker.join.join() {
            Ok(()) => tracing::debug!(timer = %self.name, "timer disabled"),
            Err(e) => tracing::warn!(timer = %self.name, ?e, "timer thread panicked during shutdown"),
        }
    }
}

fn run_worker(shared: &Arc<TimerShared>, action: &Mutex<Action>, stop_rx: &xch::Receiver<()>) {
    let handle = TimerHandle {
        shared: shared.clone(),
    };
    'run: loop {
        if !shared.running.load(Ordering::Relaxed) {
            break;
        }
        let mut rearms = shared.rearms.load(Ordering::Relaxed);
        loop {
            match stop_rx.recv_timeout(shared.until_deadline()) {
                Err(xch::RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(xch::RecvTimeoutError::Disconnected) => break 'run,
            }
            // A reset from another thread during the wait moves the deadline.
            let seen = shared.rearms.load(Ordering::Relaxed);
            if seen == rearms || shared.until_deadline().is_zero() {
                break;
            }
            rearms = seen;
        }
        if !shared.running.load(Ordering::Relaxed) {
            break;
        }
        shared.rearm_after_wait();

        {
            let mut f = action.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (*f)(&handle))) {
                shared.panics.fetch_add(1, Ordering::Relaxed);
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".into());
                tracing::error!(panic = %msg, "periodic action panicked; timer keeps running");
            }
        }
        shared.ticks.fetch_add(1, Ordering::Relaxed);
        shared.check_overrun();
    }
    tracing::trace!("timer thread exiting cleanly");
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.disable();
    }
}
