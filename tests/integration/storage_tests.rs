//! Credential, panic log and factory reset flows over the NVS adapter.

use fieldnode::adapters::factory_reset::FactoryReset;
use fieldnode::adapters::nvs::NvsAdapter;
use fieldnode::app::ports::{ResetAction, StoragePort, TokenSource};
use fieldnode::auth::{AUTH_NAMESPACE, StoredToken, TOKEN_KEY};
use fieldnode::diagnostics::{PanicLog, PanicOutbox, PanicReport};
use fieldnode::error::CommsError;

use crate::mock_hw::SharedStorage;

#[test]
fn token_survives_reload() {
    let mut nvs = NvsAdapter::new().unwrap();
    assert!(StoredToken::load(&nvs).token().is_none());

    // Written by the provisioning tool.
    nvs.write(AUTH_NAMESPACE, TOKEN_KEY, b"issued-by-server").unwrap();

    let reloaded = StoredToken::load(&nvs);
    assert_eq!(reloaded.token().unwrap().as_bytes(), b"issued-by-server");
}

#[test]
fn factory_reset_leaves_node_unprovisioned() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write(AUTH_NAMESPACE, TOKEN_KEY, b"tok").unwrap();

    let mut reset = FactoryReset::new(nvs);
    reset.factory_reset();

    assert!(!reset.storage().exists(AUTH_NAMESPACE, TOKEN_KEY));
    assert!(StoredToken::load(reset.storage()).token().is_none());
}

#[test]
fn panic_log_survives_reboot_and_drains() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut log = PanicLog::new();
    log.init(&nvs);
    log.record(&mut nvs, &PanicReport::new("src/main.rs", 1, "main", "one"));
    log.record(&mut nvs, &PanicReport::new("src/main.rs", 2, "main", "two"));

    // Next boot.
    let mut log = PanicLog::new();
    log.init(&nvs);
    assert_eq!(log.count(&nvs), 2);

    let stored = log.read_all(&nvs);
    let lines: Vec<u32> = stored.iter().map(|p| p.report.line).collect();
    assert_eq!(lines, vec![1, 2]);
    assert_eq!(log.count(&nvs), 2);

    for p in &stored {
        log.remove(&mut nvs, p.slot);
    }
    assert_eq!(log.count(&nvs), 0);
}

#[test]
fn panics_outlive_a_boot_that_cannot_deliver() {
    let storage = SharedStorage::new();
    {
        let mut nvs = storage.clone();
        let mut log = PanicLog::new();
        log.init(&nvs);
        log.record(&mut nvs, &PanicReport::new("src/main.rs", 1, "main", "one"));
        log.record(&mut nvs, &PanicReport::new("src/main.rs", 2, "main", "two"));
    }

    // Boot 2: the server is unreachable.
    let mut outbox = PanicOutbox::open(Box::new(storage.clone()));
    assert_eq!(outbox.len(), 2);
    assert_eq!(outbox.deliver(|_| Err(CommsError::RequestFailed)), 0);
    drop(outbox);

    // Boot 3: both reports are still on flash.
    let mut outbox = PanicOutbox::open(Box::new(storage.clone()));
    assert_eq!(outbox.len(), 2);
    let mut seen = Vec::new();
    assert_eq!(
        outbox.deliver(|p| {
            seen.push(p.line);
            Ok(())
        }),
        2
    );
    assert_eq!(seen, vec![1, 2]);
    assert_eq!(PanicLog::new().count(&storage), 0);
}
