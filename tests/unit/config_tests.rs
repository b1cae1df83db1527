//! Loading engine configuration from JSON files.

use std::io::Write;
use std::sync::Arc;
use ticketbook_rs::prelude::*;

#[test]
fn config_file_drives_codes_and_ttl() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{ "code_prefix": "GIG", "code_length": 6, "default_reservation_ttl_ms": 120000 }}"#
    )
    .expect("write config");

    let config = EngineConfig::from_json_file(file.path()).expect("load");
    assert_eq!(config.code_prefix, "GIG");
    assert_eq!(config.issuance_timeout_ms, EngineConfig::default().issuance_timeout_ms);

    let clock = Arc::new(ManualClock::new(1_000_000));
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let event_id = EventId::new();
    events.upsert(EventInfo::published(event_id, 90_000_000, 99_000_000));
    let buyer = customers.register();
    let engine = InventoryEngine::builder(events, customers)
        .with_config(config)
        .with_clock(clock)
        .build()
        .expect("engine");
    let general = engine
        .register_ticket_type(TicketType::new(event_id, "General", 5))
        .expect("ticket type");

    let held = engine
        .issue_reservation(
            ReservationRequest::new(general.id(), event_id, buyer),
            IssueOptions::default(),
        )
        .expect("reserve")
        .remove(0);
    assert!(held.ticket.code.starts_with("GIG-"));
    assert_eq!(held.ticket.code.len(), "GIG-".len() + 6);
    assert_eq!(held.ticket.reservation_expires_at(), Some(1_000_000 + 120_000));
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = EngineConfig::from_json_file(dir.path().join("absent.json"));
    assert!(matches!(result, Err(InventoryError::Config { .. })));
}

#[test]
fn invalid_config_is_rejected_by_the_builder() {
    let events = Arc::new(InMemoryEventDirectory::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let config = EngineConfig {
        reaper_batch_size: 0,
        ..EngineConfig::default()
    };
    let result = InventoryEngine::builder(events, customers)
        .with_config(config)
        .build();
    assert!(matches!(result, Err(InventoryError::Config { .. })));
}
