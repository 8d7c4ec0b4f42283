//! Node service end-to-end behaviour against mock adapters.

use fieldnode::app::events::AppEvent;
use fieldnode::app::service::{REPORT_TASK, RESET_TASK};
use fieldnode::app::stat::FirmwareVersion;
use fieldnode::config::NodeConfig;
use fieldnode::diagnostics::{PanicLog, PanicReport};
use fieldnode::drivers::reset_button::ResetState;
use fieldnode::error::{CommsError, Error, ReportError, SensorError};

use crate::mock_hw::{
    MockSensors, Readings, Sent, SharedStorage, harness, harness_on, token,
};

const NOMINAL: &str = concat!(
    r#"{"air_temperature_celsius":21.5,"air_humidity_percentage":55.5,"#,
    r#""air_heat_index_celsius":21.25,"soil_resistivity_raw":467,"#,
    r#""soil_temperature_celsius":18.5}"#
);

#[test]
fn setup_registers_both_tasks() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();

    assert_eq!(h.service.scheduler().task_count(), 2);
    assert_eq!(h.sink.events(), vec![AppEvent::Started { tasks: 2 }]);
}

#[test]
fn sensor_that_fails_to_start_is_reported() {
    let mut sensors = MockSensors::new(Readings::Nominal);
    sensors.begin_error = Some(("dht22", SensorError::NotPresent));
    let mut h = harness(NodeConfig::default(), sensors);
    h.service.setup().unwrap();

    let events = h.sink.events();
    assert_eq!(
        events[0],
        AppEvent::SensorFault {
            sensor: "dht22",
            error: Error::Sensor(SensorError::NotPresent),
        }
    );
    assert_eq!(events[1], AppEvent::Started { tasks: 2 });
}

#[test]
fn no_report_without_token() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();

    for t in (0..=600_000).step_by(1000) {
        h.service.tick(t, None).unwrap();
    }

    assert!(h.transport.reports().is_empty());
    assert_eq!(h.service.context().sensors.records, 0);
    assert_eq!(h.service.scheduler().last_fired(REPORT_TASK), None);
    assert_eq!(h.service.scheduler().last_fired(RESET_TASK), Some(600_000));
}

#[test]
fn report_fires_as_soon_as_token_appears() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    let tok = token();

    h.service.tick(0, None).unwrap();
    h.service.tick(5_000, None).unwrap();
    assert!(h.transport.reports().is_empty());

    // Never fired, so due on the first authenticated tick.
    h.service.tick(6_000, Some(&tok)).unwrap();
    assert_eq!(h.transport.reports(), vec![NOMINAL.to_string()]);
    assert_eq!(h.service.scheduler().last_fired(REPORT_TASK), Some(6_000));

    h.service.tick(185_999, Some(&tok)).unwrap();
    assert_eq!(h.transport.reports().len(), 1);
    h.service.tick(186_000, Some(&tok)).unwrap();
    assert_eq!(h.transport.reports().len(), 2);
}

#[test]
fn report_carries_the_token() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    h.service.tick(0, Some(&token())).unwrap();

    let sent = h.transport.sent.borrow();
    match &sent[0] {
        Sent::Report { token, .. } => assert_eq!(token, b"s3cr3t-token"),
        other => panic!("unexpected submission {other:?}"),
    }
}

#[test]
fn report_event_describes_payload() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    h.service.tick(0, Some(&token())).unwrap();

    assert!(h.sink.events().contains(&AppEvent::ReportSubmitted {
        bytes: NOMINAL.len(),
        fields: 5,
    }));
    assert_eq!(h.service.context().gate.submitted(), 1);
}

#[test]
fn failed_read_serializes_as_null() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::AirFailed));
    h.service.setup().unwrap();
    h.service.tick(0, Some(&token())).unwrap();

    assert_eq!(
        h.transport.reports()[0],
        concat!(
            r#"{"air_temperature_celsius":null,"air_humidity_percentage":null,"#,
            r#""air_heat_index_celsius":null,"soil_resistivity_raw":467,"#,
            r#""soil_temperature_celsius":18.5}"#
        )
    );
}

#[test]
fn overflowing_report_aborts_the_tick() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Oversized));
    h.service.setup().unwrap();

    let err = h.service.tick(0, Some(&token())).unwrap_err();
    match err {
        Error::Report(ReportError::Overflow { needed, capacity }) => {
            assert_eq!(capacity, fieldnode::config::REPORT_CAPACITY);
            assert!(needed > capacity);
        }
        other => panic!("expected overflow, got {other:?}"),
    }
    assert!(h.transport.sent.borrow().is_empty());
}

#[test]
fn transport_failure_is_logged_not_fatal() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    *h.transport.fail_with.borrow_mut() = Some(CommsError::Status(503));

    assert_eq!(h.service.tick(0, Some(&token())).unwrap(), 2);
    assert!(
        h.sink
            .events()
            .contains(&AppEvent::ReportFailed(CommsError::Status(503)))
    );
    assert_eq!(h.service.context().gate.failed(), 1);
    // No retry before the next period.
    h.service.tick(1_000, Some(&token())).unwrap();
    assert_eq!(h.service.context().gate.failed(), 1);
}

#[test]
fn sustained_press_triggers_reset_once() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    h.pin.set_high(false);

    for t in [0, 1_000, 2_000, 3_000] {
        h.service.tick(t, None).unwrap();
        assert_eq!(h.reset.count(), 0, "early trigger at {t}");
    }
    h.service.tick(4_000, None).unwrap();
    assert_eq!(h.reset.count(), 1);
    assert_eq!(h.service.context().watchdog.state(), ResetState::Triggered);

    for t in (5_000..20_000).step_by(1000) {
        h.service.tick(t, None).unwrap();
    }
    assert_eq!(h.reset.count(), 1);
    let resets = h
        .sink
        .events()
        .into_iter()
        .filter(|e| *e == AppEvent::ResetTriggered)
        .count();
    assert_eq!(resets, 1);
}

#[test]
fn bounce_restarts_the_count() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();

    let mut t = 0;
    for pressed in [true, true, true, true, false, true, true, true, true] {
        h.pin.set_high(!pressed);
        h.service.tick(t, None).unwrap();
        t += 1_000;
    }
    assert_eq!(h.reset.count(), 0);
    assert_eq!(h.service.context().watchdog.state(), ResetState::Debouncing(4));

    h.service.tick(t, None).unwrap();
    assert_eq!(h.reset.count(), 1);
}

#[test]
fn ticks_between_polls_do_not_sample() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    h.pin.set_high(false);

    // Twenty ticks inside one poll period count as one sample.
    for t in (0..1_000).step_by(50) {
        h.service.tick(t, None).unwrap();
    }
    assert_eq!(h.service.context().watchdog.state(), ResetState::Debouncing(1));
}

/// Flash left behind by earlier boots that crashed.
fn crashed_before(reports: &[PanicReport]) -> SharedStorage {
    let mut storage = SharedStorage::new();
    let mut log = PanicLog::new();
    log.init(&storage);
    for report in reports {
        log.record(&mut storage, report);
    }
    storage
}

fn stored_panics(storage: &SharedStorage) -> usize {
    PanicLog::new().count(storage)
}

#[test]
fn stored_panics_go_out_before_the_report() {
    let older = PanicReport::new("src/main.rs", 10, "main", "first");
    let newer = PanicReport::new("src/main.rs", 20, "main", "second");
    let storage = crashed_before(&[older.clone(), newer.clone()]);
    let mut h = harness_on(
        NodeConfig::default(),
        MockSensors::new(Readings::Nominal),
        storage,
    );
    assert_eq!(h.service.context().panics.len(), 2);
    h.service.setup().unwrap();

    h.service.tick(0, Some(&token())).unwrap();

    assert_eq!(h.transport.panics(), vec![older, newer]);
    assert!(h.service.context().panics.is_empty());
    assert_eq!(stored_panics(&h.storage), 0);
    let sent = h.transport.sent.borrow();
    assert!(matches!(sent[2], Sent::Report { .. }));
    let flushed = h
        .sink
        .events()
        .into_iter()
        .filter(|e| *e == AppEvent::PanicFlushed)
        .count();
    assert_eq!(flushed, 2);
}

#[test]
fn undelivered_panics_stay_on_flash() {
    let storage = crashed_before(&[PanicReport::new("src/main.rs", 10, "main", "boom")]);
    let mut h = harness_on(
        NodeConfig::default(),
        MockSensors::new(Readings::Nominal),
        storage,
    );
    h.service.setup().unwrap();
    *h.transport.fail_with.borrow_mut() = Some(CommsError::RequestFailed);

    h.service.tick(0, Some(&token())).unwrap();
    assert_eq!(h.service.context().panics.len(), 1);
    assert_eq!(stored_panics(&h.storage), 1);

    *h.transport.fail_with.borrow_mut() = None;
    h.service.tick(180_000, Some(&token())).unwrap();
    assert!(h.service.context().panics.is_empty());
    assert_eq!(h.transport.panics().len(), 1);
    assert_eq!(stored_panics(&h.storage), 0);
}

#[test]
fn reboot_after_failed_delivery_retries_the_same_panic() {
    let report = PanicReport::new("src/main.rs", 10, "main", "boom");
    let storage = crashed_before(std::slice::from_ref(&report));

    let mut first = harness_on(
        NodeConfig::default(),
        MockSensors::new(Readings::Nominal),
        storage.clone(),
    );
    first.service.setup().unwrap();
    *first.transport.fail_with.borrow_mut() = Some(CommsError::Status(500));
    first.service.tick(0, Some(&token())).unwrap();
    drop(first);

    let mut second = harness_on(
        NodeConfig::default(),
        MockSensors::new(Readings::Nominal),
        storage,
    );
    assert_eq!(second.service.context().panics.len(), 1);
    second.service.setup().unwrap();
    second.service.tick(0, Some(&token())).unwrap();
    assert_eq!(second.transport.panics(), vec![report]);
    assert_eq!(stored_panics(&second.storage), 0);
}

#[test]
fn fatal_panic_goes_through_the_gate() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    let tok = token();

    *h.transport.fail_with.borrow_mut() = Some(CommsError::Status(503));
    let first = PanicReport::new("src/main.rs", 1, "main", "first");
    h.service.report_fatal(&first, Some(&tok));
    assert_eq!(h.service.context().gate.failed(), 1);
    assert_eq!(h.service.context().panics.len(), 1);
    assert_eq!(stored_panics(&h.storage), 1);

    *h.transport.fail_with.borrow_mut() = None;
    let second = PanicReport::new("src/main.rs", 2, "main", "second");
    h.service.report_fatal(&second, Some(&tok));
    assert_eq!(h.transport.panics(), vec![first, second]);
    assert_eq!(h.service.context().gate.failed(), 1);
    assert!(h.service.context().panics.is_empty());
    assert_eq!(stored_panics(&h.storage), 0);
}

#[test]
fn fatal_panic_without_token_waits_for_next_boot() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();

    h.service
        .report_fatal(&PanicReport::new("src/main.rs", 1, "main", "boom"), None);
    assert!(h.transport.sent.borrow().is_empty());
    assert_eq!(stored_panics(&h.storage), 1);
}

#[test]
fn device_log_follows_the_next_accepted_report() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    let tok = token();

    *h.transport.fail_with.borrow_mut() = Some(CommsError::Status(503));
    h.service.tick(0, Some(&tok)).unwrap();
    assert!(h.transport.logs().is_empty());
    assert_eq!(h.service.context().gate.failed(), 1);

    *h.transport.fail_with.borrow_mut() = None;
    h.service.tick(180_000, Some(&tok)).unwrap();
    let logs = h.transport.logs();
    assert_eq!(logs.len(), 1);
    let lines: Vec<&str> = logs[0].lines().collect();
    assert!(lines[0].starts_with("[0] started v"));
    assert_eq!(lines[1], "[0] report not delivered: server returned HTTP 503");
    assert!(h.sink.events().contains(&AppEvent::LogUploaded { bytes: logs[0].len() }));
    assert!(h.service.context().log.is_empty());

    // Nothing notable since the upload.
    h.service.tick(360_000, Some(&tok)).unwrap();
    assert_eq!(h.transport.logs().len(), 1);
    assert_eq!(h.transport.reports().len(), 2);
}

#[test]
fn newer_firmware_on_server_is_announced() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    let tok = token();

    *h.transport.latest_version.borrow_mut() = Some(FirmwareVersion::try_from("9.9.9").unwrap());
    h.service.tick(0, Some(&tok)).unwrap();
    let version = FirmwareVersion::try_from("9.9.9").unwrap();
    assert!(h.sink.events().contains(&AppEvent::UpdateAvailable { version }));
    assert!(h.transport.logs()[0].contains("server offers firmware 9.9.9"));

    h.sink.0.borrow_mut().clear();
    let running = FirmwareVersion::try_from(env!("CARGO_PKG_VERSION")).unwrap();
    *h.transport.latest_version.borrow_mut() = Some(running);
    h.service.tick(180_000, Some(&tok)).unwrap();
    assert!(
        !h.sink
            .events()
            .iter()
            .any(|e| matches!(e, AppEvent::UpdateAvailable { .. }))
    );
}

#[test]
fn every_report_tick_samples_afresh() {
    let mut h = harness(NodeConfig::default(), MockSensors::new(Readings::Drifting));
    h.service.setup().unwrap();
    let tok = token();

    for (n, t) in [0, 180_000, 360_000].into_iter().enumerate() {
        h.service.tick(t, Some(&tok)).unwrap();
        assert_eq!(h.service.context().sensors.records, n + 1);
        // Ticks inside the period must not touch the sensors.
        h.service.tick(t + 1_000, Some(&tok)).unwrap();
        assert_eq!(h.service.context().sensors.records, n + 1);
    }

    let reports = h.transport.reports();
    assert_eq!(reports.len(), 3);
    assert_eq!(
        reports[0],
        concat!(
            r#"{"air_temperature_celsius":20.25,"air_humidity_percentage":50.25,"#,
            r#""air_heat_index_celsius":20.25,"soil_resistivity_raw":401,"#,
            r#""soil_temperature_celsius":15.25}"#
        )
    );
    assert!(reports[1].contains(r#""soil_resistivity_raw":402"#));
    assert!(reports[2].contains(r#""soil_resistivity_raw":403"#));
    assert_ne!(reports[0], reports[1]);
    assert_ne!(reports[1], reports[2]);
}

#[test]
fn custom_interval_is_honoured() {
    let config = NodeConfig {
        report_interval_ms: 10_000,
        ..NodeConfig::default()
    };
    let mut h = harness(config, MockSensors::new(Readings::Nominal));
    h.service.setup().unwrap();
    let tok = token();

    for t in (0..=30_000).step_by(1_000) {
        h.service.tick(t, Some(&tok)).unwrap();
    }
    assert_eq!(h.transport.reports().len(), 4);
}
