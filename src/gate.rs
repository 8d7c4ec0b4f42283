//! Reporting gate: the only path from a finished report to the network.
//!
//! The gate is called from the authenticated report task, so a token is
//! always in hand.  It submits exactly once per call and never retries;
//! connectivity and backoff belong to the transport adapter.  Failures are
//! counted and handed back for logging, never escalated.

use log::{debug, warn};

use crate::app::device_log::DeviceLog;
use crate::app::ports::{ReportAck, ReportTransport};
use crate::app::stat::DeviceStat;
use crate::auth::AuthToken;
use crate::diagnostics::PanicReport;
use crate::error::CommsError;
use crate::report::Report;

pub struct ReportingGate<T> {
    transport: T,
    submitted: u32,
    failed: u32,
}

impl<T: ReportTransport> ReportingGate<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            submitted: 0,
            failed: 0,
        }
    }

    /// Hand a complete report to the transport.
    pub fn submit<const N: usize>(
        &mut self,
        token: &AuthToken,
        report: &Report<N>,
        stat: &DeviceStat,
    ) -> Result<ReportAck, CommsError> {
        debug!(
            "gate: submitting {} fields ({} bytes)",
            report.field_count(),
            report.len()
        );
        match self.transport.submit_report(token, report.as_bytes(), stat) {
            Ok(ack) => {
                self.submitted += 1;
                Ok(ack)
            }
            Err(e) => {
                self.failed += 1;
                warn!("gate: report not delivered ({})", e);
                Err(e)
            }
        }
    }

    /// Hand a panic report to the transport.
    pub fn submit_panic(
        &mut self,
        token: &AuthToken,
        panic: &PanicReport,
    ) -> Result<(), CommsError> {
        self.transport.submit_panic(token, panic).inspect_err(|e| {
            self.failed += 1;
            warn!("gate: panic report not delivered ({})", e);
        })
    }

    /// Upload the device log.  An empty log is not sent.
    pub fn submit_log(&mut self, token: &AuthToken, log: &DeviceLog) -> Result<(), CommsError> {
        if log.is_empty() {
            return Ok(());
        }
        self.transport.submit_log(token, log.as_bytes()).inspect_err(|e| {
            self.failed += 1;
            warn!("gate: device log not delivered ({})", e);
        })
    }

    /// Reports accepted by the transport since boot.
    pub fn submitted(&self) -> u32 {
        self.submitted
    }

    /// Submissions the transport failed since boot.
    pub fn failed(&self) -> u32 {
        self.failed
    }
}
