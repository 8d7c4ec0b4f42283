//! Mock adapters for integration tests.
//!
//! Every port the node service consumes has a recording stand-in here so
//! tests can drive ticks by hand and assert on what went out.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin};
use fieldnode::adapters::nvs::NvsAdapter;
use fieldnode::app::events::AppEvent;
use fieldnode::app::ports::{
    EventSink, ReportAck, ReportTransport, ResetAction, SensorPort, StoragePort,
};
use fieldnode::app::service::{NodeContext, NodeService};
use fieldnode::app::stat::{DeviceStat, FirmwareVersion};
use fieldnode::auth::AuthToken;
use fieldnode::config::NodeConfig;
use fieldnode::diagnostics::{PanicOutbox, PanicReport};
use fieldnode::drivers::reset_button::ResetWatchdog;
use fieldnode::error::{CommsError, Error, ReportError, SensorError, StorageError};
use fieldnode::report::ReportDoc;

// ── Sensors ───────────────────────────────────────────────────

/// What the mock sensor writes on each report tick.
#[derive(Debug, Clone)]
pub enum Readings {
    /// The five regular fields with fixed values.
    Nominal,
    /// Same shape, but the air sensor read fails.
    AirFailed,
    /// More fields than any report buffer holds.
    Oversized,
    /// The five regular fields, with values that move on every sample.
    Drifting,
}

pub struct MockSensors {
    pub readings: Readings,
    pub begin_error: Option<(&'static str, SensorError)>,
    pub records: usize,
}

impl MockSensors {
    pub fn new(readings: Readings) -> Self {
        Self {
            readings,
            begin_error: None,
            records: 0,
        }
    }
}

impl SensorPort for MockSensors {
    fn begin_all(&mut self, on_error: &mut dyn FnMut(&'static str, Error)) {
        if let Some((name, e)) = self.begin_error {
            on_error(name, e.into());
        }
    }

    fn record<const N: usize>(&mut self, doc: &mut ReportDoc<N>) -> Result<(), ReportError> {
        self.records += 1;
        match self.readings {
            Readings::Nominal => {
                doc.set("air_temperature_celsius", 21.5_f32)?;
                doc.set("air_humidity_percentage", 55.5_f32)?;
                doc.set("air_heat_index_celsius", 21.25_f32)?;
                doc.set("soil_resistivity_raw", 467_u32)?;
                doc.set("soil_temperature_celsius", 18.5_f32)
            }
            Readings::AirFailed => {
                let failed: Result<f32, SensorError> = Err(SensorError::Timeout);
                doc.set("air_temperature_celsius", failed)?;
                doc.set("air_humidity_percentage", failed)?;
                doc.set("air_heat_index_celsius", failed)?;
                doc.set("soil_resistivity_raw", 467_u32)?;
                doc.set("soil_temperature_celsius", 18.5_f32)
            }
            Readings::Oversized => {
                for i in 0..64 {
                    let name = format!("padding_field_with_a_long_name_{i}");
                    doc.set(&name, 123_456_u32)?;
                }
                Ok(())
            }
            Readings::Drifting => {
                // Quarter steps stay exact in f32.
                let step = self.records as f32 * 0.25;
                doc.set("air_temperature_celsius", 20.0 + step)?;
                doc.set("air_humidity_percentage", 50.0 + step)?;
                doc.set("air_heat_index_celsius", 20.0 + step)?;
                doc.set("soil_resistivity_raw", 400 + self.records as u32)?;
                doc.set("soil_temperature_celsius", 15.0 + step)
            }
        }
    }
}

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Report { token: Vec<u8>, payload: String },
    Panic { token: Vec<u8>, panic: PanicReport },
    Log { token: Vec<u8>, text: String },
}

/// Records every submission; shares the log so tests can inspect it
/// after the transport has moved into the service.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Rc<RefCell<Vec<Sent>>>,
    pub fail_with: Rc<RefCell<Option<CommsError>>>,
    /// Sent back as `latest_version` with every accepted report.
    pub latest_version: Rc<RefCell<Option<FirmwareVersion>>>,
}

impl RecordingTransport {
    pub fn reports(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|s| match s {
                Sent::Report { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn panics(&self) -> Vec<PanicReport> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|s| match s {
                Sent::Panic { panic, .. } => Some(panic.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|s| match s {
                Sent::Log { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn outcome(&self) -> Result<(), CommsError> {
        match *self.fail_with.borrow() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl ReportTransport for RecordingTransport {
    fn submit_report(
        &mut self,
        token: &AuthToken,
        payload: &[u8],
        _stat: &DeviceStat,
    ) -> Result<ReportAck, CommsError> {
        self.outcome()?;
        self.sent.borrow_mut().push(Sent::Report {
            token: token.as_bytes().to_vec(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        });
        Ok(ReportAck {
            latest_version: self.latest_version.borrow().clone(),
        })
    }

    fn submit_panic(&mut self, token: &AuthToken, panic: &PanicReport) -> Result<(), CommsError> {
        self.outcome()?;
        self.sent.borrow_mut().push(Sent::Panic {
            token: token.as_bytes().to_vec(),
            panic: panic.clone(),
        });
        Ok(())
    }

    fn submit_log(&mut self, token: &AuthToken, log: &[u8]) -> Result<(), CommsError> {
        self.outcome()?;
        self.sent.borrow_mut().push(Sent::Log {
            token: token.as_bytes().to_vec(),
            text: String::from_utf8_lossy(log).into_owned(),
        });
        Ok(())
    }
}

// ── Storage ───────────────────────────────────────────────────

/// Simulated NVS shared between the test and the service, so the test
/// can look at the panic ring and "reboot" onto the same flash.
#[derive(Clone)]
pub struct SharedStorage(pub Rc<RefCell<NvsAdapter>>);

impl SharedStorage {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(NvsAdapter::new().unwrap())))
    }
}

impl StoragePort for SharedStorage {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.0.borrow().read(ns, key, buf)
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.0.borrow_mut().write(ns, key, data)
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.0.borrow_mut().delete(ns, key)
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.0.borrow().exists(ns, key)
    }

    fn erase_namespace(&mut self, ns: &str) -> Result<(), StorageError> {
        self.0.borrow_mut().erase_namespace(ns)
    }
}

// ── Reset button ──────────────────────────────────────────────

/// Pin whose level the test sets between ticks (true = high).
#[derive(Clone)]
pub struct SharedPin(pub Rc<RefCell<bool>>);

impl SharedPin {
    pub fn released() -> Self {
        Self(Rc::new(RefCell::new(true)))
    }

    pub fn set_high(&self, high: bool) {
        *self.0.borrow_mut() = high;
    }
}

impl ErrorType for SharedPin {
    type Error = Infallible;
}

impl InputPin for SharedPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(*self.0.borrow())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!*self.0.borrow())
    }
}

#[derive(Clone, Default)]
pub struct CountingReset(pub Rc<RefCell<u32>>);

impl CountingReset {
    pub fn count(&self) -> u32 {
        *self.0.borrow()
    }
}

impl ResetAction for CountingReset {
    fn factory_reset(&mut self) {
        *self.0.borrow_mut() += 1;
    }
}

// ── Events ────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink(pub Rc<RefCell<Vec<AppEvent>>>);

impl RecordingSink {
    pub fn events(&self) -> Vec<AppEvent> {
        self.0.borrow().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type TestService =
    NodeService<MockSensors, RecordingTransport, SharedPin, CountingReset, RecordingSink>;

/// Handles that stay with the test after the service takes ownership.
pub struct Harness {
    pub service: TestService,
    pub transport: RecordingTransport,
    pub pin: SharedPin,
    pub reset: CountingReset,
    pub sink: RecordingSink,
    pub storage: SharedStorage,
}

pub fn harness(config: NodeConfig, sensors: MockSensors) -> Harness {
    harness_on(config, sensors, SharedStorage::new())
}

/// Boot a node on existing flash contents.
pub fn harness_on(config: NodeConfig, sensors: MockSensors, storage: SharedStorage) -> Harness {
    let transport = RecordingTransport::default();
    let pin = SharedPin::released();
    let reset = CountingReset::default();
    let sink = RecordingSink::default();

    let watchdog = ResetWatchdog::new(
        pin.clone(),
        config.reset_active_level,
        config.reset_debounce_samples,
    );
    let ctx = NodeContext::new(
        sensors,
        transport.clone(),
        watchdog,
        reset.clone(),
        sink.clone(),
        PanicOutbox::open(Box::new(storage.clone())),
    );
    Harness {
        service: NodeService::new(config, ctx),
        transport,
        pin,
        reset,
        sink,
        storage,
    }
}

pub fn token() -> AuthToken {
    AuthToken::from_bytes(b"s3cr3t-token").unwrap()
}
