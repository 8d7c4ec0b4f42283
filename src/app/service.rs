//! Node service: the hexagonal core.
//!
//! [`NodeService`] owns the interval scheduler and the context its tasks
//! run against.  The host loop only ever calls [`NodeService::tick`] with
//! the current time and token; everything else happens inside the two
//! registered tasks.
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  ResetWatchdog ────▶ │  "reset-watchdog"   (1 s)    │ ──▶ ResetAction
//!                      │                              │
//!  SensorPort ───────▶ │  "report-measurements" (3 m) │ ──▶ ReportingGate ──▶ ReportTransport
//!  PanicOutbox ──────▶ │   authenticated              │      (panics, report, device log)
//!                      └──────────────────────────────┘ ──▶ EventSink
//! ```
//!
//! Each report tick first drains stored panic reports, then builds and
//! submits the measurement report, then uploads the device log.

use embedded_hal::digital::InputPin;
use log::{debug, info, warn};

use crate::auth::AuthToken;
use crate::config::{NodeConfig, REPORT_CAPACITY};
use crate::diagnostics::{PanicOutbox, PanicReport};
use crate::drivers::reset_button::{ResetState, ResetWatchdog};
use crate::error::Result;
use crate::gate::ReportingGate;
use crate::report::Report;
use crate::scheduler::Scheduler;

use super::device_log::DeviceLog;
use super::events::AppEvent;
use super::ports::{EventSink, ReportTransport, ResetAction, SensorPort};
use super::stat::DeviceStat;

pub const RESET_TASK: &str = "reset-watchdog";
pub const REPORT_TASK: &str = "report-measurements";

// ───────────────────────────────────────────────────────────────
// Task context
// ───────────────────────────────────────────────────────────────

/// Everything the scheduled tasks touch.
pub struct NodeContext<S, T, P, R, E> {
    pub sensors: S,
    pub gate: ReportingGate<T>,
    pub watchdog: ResetWatchdog<P>,
    pub reset: R,
    pub sink: E,
    /// Panic reports awaiting delivery, oldest first.
    pub panics: PanicOutbox,
    /// Lines for the next device log upload.
    pub log: DeviceLog,
    now_ms: u64,
}

impl<S, T, P, R, E> NodeContext<S, T, P, R, E>
where
    T: ReportTransport,
    P: InputPin,
    E: EventSink,
{
    pub fn new(
        sensors: S,
        transport: T,
        watchdog: ResetWatchdog<P>,
        reset: R,
        sink: E,
        panics: PanicOutbox,
    ) -> Self {
        Self {
            sensors,
            gate: ReportingGate::new(transport),
            watchdog,
            reset,
            sink,
            panics,
            log: DeviceLog::new(),
            now_ms: 0,
        }
    }

    /// Publish an event and keep the notable ones for the device log.
    pub fn emit(&mut self, event: AppEvent) {
        self.log.note(self.now_ms, &event);
        self.sink.emit(&event);
    }

    /// Deliver queued panic reports through the gate, oldest first.
    /// Returns how many the server accepted.
    fn flush_panics(&mut self, token: &AuthToken) -> usize {
        let Self {
            gate, panics, sink, ..
        } = self;
        panics.deliver(|panic| {
            gate.submit_panic(token, panic)?;
            sink.emit(&AppEvent::PanicFlushed);
            Ok(())
        })
    }

    fn upload_log(&mut self, token: &AuthToken) {
        if self.log.is_empty() {
            return;
        }
        if self.log.dropped() > 0 {
            let dropped = self.log.dropped();
            self.log
                .push(self.now_ms, format_args!("{} earlier line(s) dropped", dropped));
        }
        if self.gate.submit_log(token, &self.log).is_ok() {
            let bytes = self.log.as_bytes().len();
            self.log.clear();
            self.sink.emit(&AppEvent::LogUploaded { bytes });
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tasks
// ───────────────────────────────────────────────────────────────

fn poll_reset<S, T, P, R, E>(ctx: &mut NodeContext<S, T, P, R, E>) -> Result<()>
where
    T: ReportTransport,
    P: InputPin,
    R: ResetAction,
    E: EventSink,
{
    let before = ctx.watchdog.state();
    let after = ctx.watchdog.poll(&mut ctx.reset);
    if after == ResetState::Triggered && before != ResetState::Triggered {
        ctx.emit(AppEvent::ResetTriggered);
    }
    Ok(())
}

fn report_measurements<S, T, P, R, E>(
    ctx: &mut NodeContext<S, T, P, R, E>,
    token: &AuthToken,
) -> Result<()>
where
    S: SensorPort,
    T: ReportTransport,
    P: InputPin,
    E: EventSink,
{
    debug!("Handle measurements");
    ctx.flush_panics(token);

    // Overflow is fatal: the error aborts the tick and the host halts.
    let report = Report::<REPORT_CAPACITY>::build(|doc| ctx.sensors.record(doc))?;

    let stat = DeviceStat::collect(ctx.now_ms);
    match ctx.gate.submit(token, &report, &stat) {
        Ok(ack) => {
            ctx.emit(AppEvent::ReportSubmitted {
                bytes: report.len(),
                fields: report.field_count(),
            });
            if let Some(version) = ack.latest_version.filter(|v| v.as_str() != stat.version) {
                ctx.emit(AppEvent::UpdateAvailable { version });
            }
            // Only once the server has answered; a failed tick's line
            // goes out with the next accepted report.
            ctx.upload_log(token);
        }
        Err(e) => ctx.emit(AppEvent::ReportFailed(e)),
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// NodeService
// ───────────────────────────────────────────────────────────────

pub struct NodeService<S, T, P, R, E> {
    config: NodeConfig,
    scheduler: Scheduler<NodeContext<S, T, P, R, E>>,
    ctx: NodeContext<S, T, P, R, E>,
}

impl<S, T, P, R, E> NodeService<S, T, P, R, E>
where
    S: SensorPort,
    T: ReportTransport,
    P: InputPin,
    R: ResetAction,
    E: EventSink,
{
    /// Construct the service.  Nothing runs until [`setup`](Self::setup).
    pub fn new(config: NodeConfig, ctx: NodeContext<S, T, P, R, E>) -> Self {
        Self {
            config,
            scheduler: Scheduler::new(),
            ctx,
        }
    }

    /// Initialise sensors and register the recurring tasks.
    ///
    /// A sensor that fails to start is reported and left in place; its
    /// fields read `null` until it recovers.
    pub fn setup(&mut self) -> Result<()> {
        let mut faults = heapless::Vec::<AppEvent, 4>::new();
        self.ctx.sensors.begin_all(&mut |sensor, error| {
            warn!("Sensor '{}' failed to start: {}", sensor, error);
            if faults.push(AppEvent::SensorFault { sensor, error }).is_err() {
                warn!("Too many sensor faults to report");
            }
        });
        for fault in faults {
            self.ctx.emit(fault);
        }

        self.scheduler.register_interval(
            RESET_TASK,
            self.config.reset_poll_interval_ms,
            poll_reset::<S, T, P, R, E>,
        )?;
        self.scheduler.register_authenticated_interval(
            REPORT_TASK,
            self.config.report_interval_ms,
            report_measurements::<S, T, P, R, E>,
        )?;

        let tasks = self.scheduler.task_count();
        info!("NodeService ready ({} tasks)", tasks);
        self.ctx.emit(AppEvent::Started { tasks });
        Ok(())
    }

    /// Run every due task.  An error here is fatal; the caller halts.
    pub fn tick(&mut self, now_ms: u64, token: Option<&AuthToken>) -> Result<usize> {
        self.ctx.now_ms = now_ms;
        self.scheduler.tick(now_ms, token, &mut self.ctx)
    }

    /// Fatal path: persist `report`, then hand every undelivered panic to
    /// the gate while a token is held.  The caller halts afterwards.
    pub fn report_fatal(&mut self, report: &PanicReport, token: Option<&AuthToken>) {
        self.ctx.panics.record(report);
        match token {
            Some(token) => {
                self.ctx.flush_panics(token);
            }
            None => warn!("No token; panic report kept for the next boot"),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler<NodeContext<S, T, P, R, E>> {
        &self.scheduler
    }

    pub fn context(&self) -> &NodeContext<S, T, P, R, E> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut NodeContext<S, T, P, R, E> {
        &mut self.ctx
    }
}
