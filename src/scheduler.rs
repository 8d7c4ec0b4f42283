//! Cooperative interval scheduler.
//!
//! Drives every recurring activity of the node from one host-owned tick
//! loop.  There are no timers or threads behind it: the host calls
//! [`Scheduler::tick`] with the current monotonic time and the currently
//! held token, and due tasks run synchronously, one after another.
//!
//! ```text
//!   host loop ──tick(now, token)──▶ Scheduler
//!                                    │  for task in registration order:
//!                                    │    due? ── no ──▶ next
//!                                    │     │
//!                                    │    yes ─ authenticated && token == None ──▶ skip
//!                                    │     │
//!                                    │    callback(ctx[, token])?   (error aborts the tick)
//!                                    │    last_fired = now
//!                                    ▼
//! ```
//!
//! Due rule: a task that has never fired is due on the first tick;
//! afterwards it is due when `now - last_fired >= period`.  Firing records
//! `last_fired = now`, so a late tick shifts the phase instead of being
//! backfilled.

use log::{debug, info, trace};

use crate::auth::AuthToken;
use crate::error::{Error, Result};

/// Maximum number of registered tasks (stack-allocated table).
pub const MAX_TASKS: usize = 8;

/// Callback of a plain interval task.
pub type IntervalFn<C> = fn(&mut C) -> Result<()>;

/// Callback of a task that needs the server credential.
pub type AuthenticatedFn<C> = fn(&mut C, &AuthToken) -> Result<()>;

/// What runs when a task is due.
enum TaskAction<C> {
    Plain(IntervalFn<C>),
    Authenticated(AuthenticatedFn<C>),
}

/// Internal bookkeeping for a registered task.
struct IntervalTask<C> {
    label: &'static str,
    period_ms: u64,
    last_fired_ms: Option<u64>,
    action: TaskAction<C>,
}

impl<C> IntervalTask<C> {
    fn is_due(&self, now_ms: u64) -> bool {
        match self.last_fired_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.period_ms,
        }
    }
}

/// The scheduler engine.
///
/// `C` is the context every callback receives mutably.  Tasks are
/// registered once at setup and never removed.
pub struct Scheduler<C> {
    tasks: heapless::Vec<IntervalTask<C>, MAX_TASKS>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            tasks: heapless::Vec::new(),
        }
    }

    /// Register a recurring task that runs regardless of authentication.
    pub fn register_interval(
        &mut self,
        label: &'static str,
        period_ms: u32,
        callback: IntervalFn<C>,
    ) -> Result<()> {
        self.push(label, period_ms, TaskAction::Plain(callback))
    }

    /// Register a recurring task that only runs while a token is held.
    ///
    /// On ticks without a token the task is skipped and its `last_fired`
    /// is left untouched, so it runs on the first tick after a token
    /// becomes available.
    pub fn register_authenticated_interval(
        &mut self,
        label: &'static str,
        period_ms: u32,
        callback: AuthenticatedFn<C>,
    ) -> Result<()> {
        self.push(label, period_ms, TaskAction::Authenticated(callback))
    }

    fn push(&mut self, label: &'static str, period_ms: u32, action: TaskAction<C>) -> Result<()> {
        if period_ms == 0 {
            return Err(Error::Config("interval period must be non-zero"));
        }
        let task = IntervalTask {
            label,
            period_ms: u64::from(period_ms),
            last_fired_ms: None,
            action,
        };
        if self.tasks.push(task).is_err() {
            return Err(Error::Config("scheduler task table full"));
        }
        info!(
            "Scheduler: registered '{}' every {}ms (slot {})",
            label,
            period_ms,
            self.tasks.len() - 1
        );
        Ok(())
    }

    /// Run every due task once, in registration order.
    ///
    /// Returns how many tasks fired.  The first callback error stops the
    /// tick and is returned unchanged; tasks after it do not run.
    pub fn tick(&mut self, now_ms: u64, token: Option<&AuthToken>, ctx: &mut C) -> Result<usize> {
        let mut fired = 0;

        for task in &mut self.tasks {
            if !task.is_due(now_ms) {
                continue;
            }

            let outcome = match (&task.action, token) {
                (TaskAction::Plain(callback), _) => callback(ctx),
                (TaskAction::Authenticated(callback), Some(token)) => callback(ctx, token),
                (TaskAction::Authenticated(_), None) => {
                    trace!("Scheduler: '{}' skipped, no token", task.label);
                    continue;
                }
            };

            task.last_fired_ms = Some(now_ms);
            fired += 1;

            if let Err(e) = outcome {
                debug!("Scheduler: '{}' failed at {}ms: {}", task.label, now_ms, e);
                return Err(e);
            }
        }

        Ok(fired)
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Timestamp of the last firing of `label`, if it has fired.
    pub fn last_fired(&self, label: &str) -> Option<u64> {
        self.tasks
            .iter()
            .find(|t| t.label == label)
            .and_then(|t| t.last_fired_ms)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
