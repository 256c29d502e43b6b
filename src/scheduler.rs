//! Detection loop scheduling.
//!
//! - `LoopScheduler`: Idle → Running ⇄ Paused → Stopped state machine with a
//!   fixed tick period measured from tick to tick.
//! - `CycleGuard`: atomic test-and-set flag; a held `CyclePermit` means a
//!   cycle is in flight and dropping it (on any exit path, unwinding
//!   included) releases the guard.
//! - `CycleDispatcher`: runs each cycle on its own thread under a permit. A
//!   tick that finds the guard held is skipped, never queued.
//! - `run_loop`: drives the scheduler from a trigger channel.
//!
//! Pausing and stopping only stop new cycles from being scheduled. A cycle
//! already in flight always runs to completion.

use anyhow::{anyhow, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Fixed period between cycle starts.
pub const DETECTION_PERIOD: Duration = Duration::from_millis(2000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// External lifecycle triggers (feed hidden/shown, shutdown).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Pause,
    Resume,
    Stop,
}

impl Trigger {
    /// Operator command words: `pause`/`hide`, `resume`/`show`, `stop`/`quit`.
    pub fn from_command(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "pause" | "hide" => Some(Trigger::Pause),
            "resume" | "show" => Some(Trigger::Resume),
            "stop" | "quit" => Some(Trigger::Stop),
            _ => None,
        }
    }
}

/// Tick scheduling state machine. Pure: callers pass the current instant.
#[derive(Debug)]
pub struct LoopScheduler {
    state: LoopState,
    period: Duration,
    next_tick: Option<Instant>,
}

impl LoopScheduler {
    pub fn new(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(anyhow!("detection period must be greater than zero"));
        }
        Ok(Self {
            state: LoopState::Idle,
            period,
            next_tick: None,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Deadline of the next periodic tick, if the timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Idle → Running. Returns true when a cycle should fire immediately.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state != LoopState::Idle {
            return false;
        }
        self.arm(now)
    }

    /// Running → Paused. Cancels the timer.
    pub fn pause(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Paused;
        self.next_tick = None;
        true
    }

    /// Paused → Running, exactly like start. Returns true when a cycle should fire.
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.state != LoopState::Paused {
            return false;
        }
        self.arm(now)
    }

    /// Any state → Stopped. Terminal.
    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
        self.next_tick = None;
    }

    /// Apply a trigger. Returns true when a cycle should fire immediately.
    pub fn apply(&mut self, trigger: Trigger, now: Instant) -> bool {
        match trigger {
            Trigger::Pause => {
                self.pause();
                false
            }
            Trigger::Resume => self.resume(now),
            Trigger::Stop => {
                self.stop();
                false
            }
        }
    }

    /// Returns true when a periodic tick is due at `now`.
    ///
    /// Ticks that were missed entirely are dropped; the timer re-arms at the
    /// next period boundary after `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(deadline) = self.next_tick else {
            return false;
        };
        if self.state != LoopState::Running || now < deadline {
            return false;
        }
        let mut next = deadline + self.period;
        while next <= now {
            next += self.period;
        }
        self.next_tick = Some(next);
        true
    }

    fn arm(&mut self, now: Instant) -> bool {
        self.state = LoopState::Running;
        self.next_tick = Some(now + self.period);
        true
    }
}

/// At-most-one-cycle guard.
#[derive(Clone, Debug, Default)]
pub struct CycleGuard {
    busy: Arc<AtomicBool>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag if it is clear. `None` means a cycle is already in flight.
    pub fn try_acquire(&self) -> Option<CyclePermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CyclePermit {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the guard is held. Releases on drop.
#[derive(Debug)]
pub struct CyclePermit {
    busy: Arc<AtomicBool>,
}

impl Drop for CyclePermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// One capture → encode → send → render pass.
pub trait Cycle: Send + Sync + 'static {
    fn run_cycle(&self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    /// The guard was held; the tick was dropped.
    Skipped,
}

pub struct CycleDispatcher<C: Cycle> {
    cycle: Arc<C>,
    guard: CycleGuard,
    in_flight: Option<JoinHandle<()>>,
    started: u64,
    skipped: u64,
}

impl<C: Cycle> CycleDispatcher<C> {
    pub fn new(cycle: Arc<C>) -> Self {
        Self {
            cycle,
            guard: CycleGuard::new(),
            in_flight: None,
            started: 0,
            skipped: 0,
        }
    }

    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    /// Start a cycle unless one is already running.
    pub fn dispatch(&mut self) -> Dispatch {
        let Some(permit) = self.guard.try_acquire() else {
            self.skipped += 1;
            log::debug!("tick skipped: previous cycle still in flight");
            return Dispatch::Skipped;
        };
        // The previous thread released the guard, so it is done or about to return.
        if let Some(previous) = self.in_flight.take() {
            let _ = previous.join();
        }
        let cycle = self.cycle.clone();
        self.started += 1;
        let seq = self.started;
        self.in_flight = Some(std::thread::spawn(move || {
            let _permit = permit;
            match panic::catch_unwind(AssertUnwindSafe(|| cycle.run_cycle())) {
                Ok(Ok(())) => log::trace!("cycle #{} complete", seq),
                Ok(Err(e)) => log::debug!("cycle #{} aborted: {:#}", seq, e),
                Err(_) => log::error!("cycle #{} panicked", seq),
            }
        }));
        Dispatch::Started
    }

    /// Block until the in-flight cycle (if any) has finished.
    pub fn wait_idle(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            let _ = handle.join();
        }
    }

    pub fn started(&self) -> u64 {
        self.started
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Drive `scheduler` until a `Stop` trigger arrives or every trigger sender is gone.
///
/// Starts the scheduler (one immediate cycle), then dispatches on every due
/// tick and every resume. `on_state` observes each state change. On exit the
/// in-flight cycle, if any, is allowed to finish.
pub fn run_loop<C: Cycle>(
    scheduler: &mut LoopScheduler,
    dispatcher: &mut CycleDispatcher<C>,
    triggers: &Receiver<Trigger>,
    mut on_state: impl FnMut(LoopState),
) {
    if scheduler.start(Instant::now()) {
        on_state(scheduler.state());
        dispatcher.dispatch();
    }

    while scheduler.state() != LoopState::Stopped {
        let received = match scheduler.next_deadline() {
            Some(deadline) => {
                triggers.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => triggers.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(trigger) => {
                let before = scheduler.state();
                let fire = scheduler.apply(trigger, Instant::now());
                if scheduler.state() != before {
                    log::info!("detection loop {:?} → {:?}", before, scheduler.state());
                    on_state(scheduler.state());
                }
                if fire {
                    dispatcher.dispatch();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if scheduler.poll(Instant::now()) {
                    dispatcher.dispatch();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("trigger channel closed; stopping detection loop");
                scheduler.stop();
                on_state(scheduler.state());
            }
        }
    }

    dispatcher.wait_idle();
    log::info!(
        "detection loop stopped: {} cycles started, {} ticks skipped",
        dispatcher.started(),
        dispatcher.skipped()
    );
}
