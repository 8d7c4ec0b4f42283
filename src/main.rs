//! Fieldnode firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SensorSet      HttpTransport   NvsAdapter     Esp32Time       │
//! │  (SensorPort)   (Transport)     (Config+NVS)   (uptime)        │
//! │  GpioInput      FactoryReset    LogEventSink                   │
//! │  (reset pin)    (ResetAction)   (EventSink)                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              NodeService (pure logic)                  │    │
//! │  │  Scheduler · Report builder · Gate · Reset watchdog    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Result;
use log::{error, info, warn};

use fieldnode::adapters::factory_reset::FactoryReset;
use fieldnode::adapters::http::HttpTransport;
use fieldnode::adapters::log_sink::LogEventSink;
use fieldnode::adapters::nvs::NvsAdapter;
use fieldnode::adapters::time::Esp32TimeAdapter;
use fieldnode::app::ports::{ConfigPort, TokenSource};
use fieldnode::app::service::{NodeContext, NodeService};
use fieldnode::auth::StoredToken;
use fieldnode::config::NodeConfig;
use fieldnode::diagnostics::{self, PanicOutbox, PanicReport};
use fieldnode::drivers::hw_init::{self, GpioInput};
use fieldnode::drivers::reset_button::ResetWatchdog;
use fieldnode::pins;
use fieldnode::sensors::SensorSet;
use fieldnode::sensors::dht::Dht22;
use fieldnode::sensors::soil_resistivity::SoilResistivitySensor;
use fieldnode::sensors::soil_temperature::Ds18b20;

/// Idle time between scheduler ticks.  Well below the reset poll period.
const TICK_SLEEP_MS: u32 = 50;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Fieldnode v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Storage + config ───────────────────────────────────
    let nvs = NvsAdapter::new()?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            NodeConfig::default()
        }
    };
    config.validate()?;
    diagnostics::install_panic_handler();

    // ── 3. Hardware ───────────────────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        error!("HAL init failed: {}", e);
        diagnostics::halt();
    }

    // ── 4. Credentials + stored panics ────────────────────────
    let token = StoredToken::load(&nvs);
    // Slots are erased only as the server accepts each report.
    let panics = PanicOutbox::open(Box::new(nvs));

    // ── 5. Wire the node ──────────────────────────────────────
    let sensors = SensorSet::new(
        Dht22::new(pins::AIR_DHT_GPIO),
        SoilResistivitySensor::new(&config),
        Ds18b20::new(pins::SOIL_TEMP_ONEWIRE_GPIO),
    );
    let watchdog = ResetWatchdog::new(
        GpioInput::new(pins::FACTORY_RESET_GPIO),
        config.reset_active_level,
        config.reset_debounce_samples,
    );
    let ctx = NodeContext::new(
        sensors,
        HttpTransport::new(&config.server_url)?,
        watchdog,
        FactoryReset::new(NvsAdapter::new()?),
        LogEventSink::new(),
        panics,
    );

    let mut service = NodeService::new(config, ctx);
    service.setup()?;

    // ── 6. Tick loop ──────────────────────────────────────────
    let clock = Esp32TimeAdapter::new();
    info!("System ready. Entering tick loop.");
    loop {
        if let Err(e) = service.tick(clock.uptime_ms(), token.token()) {
            error!("Tick failed: {}", e);
            let report = PanicReport::from_error(file!(), line!(), "main", &e);
            service.report_fatal(&report, token.token());
            diagnostics::halt();
        }
        #[cfg(target_os = "espidf")]
        esp_idf_hal::delay::FreeRtos::delay_ms(TICK_SLEEP_MS);
        #[cfg(not(target_os = "espidf"))]
        std::thread::sleep(std::time::Duration::from_millis(u64::from(TICK_SLEEP_MS)));
    }
}
