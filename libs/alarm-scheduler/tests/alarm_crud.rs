//! Integration tests for customizable alarm CRUD and persistence
//!
//! Covers web-id handling, capacity limits, compaction on delete and the
//! JSON file round trip.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use alarm_scheduler::{
    AlarmAction, AlarmError, AlarmPersistence, AlarmRecord, AlarmStore, CustomAlarmSpec, DayMask,
    JsonFilePersistence, MemoryPersistence, SystemAlarmSpec, TimeField, MAX_ALARMS,
};
use tracing_test::traced_test;

fn noop(_: &mut (), _: u16) {}

fn spec(name: &str, hour: u8, minute: u8) -> CustomAlarmSpec {
    CustomAlarmSpec::new(name, DayMask::ALL, hour, minute)
        .description(format!("{} description", name))
        .type_label("LOG")
}

fn names(store: &AlarmStore) -> Vec<String> {
    store.iter().map(|a| a.meta().name.clone()).collect()
}

#[test]
fn test_add_then_find_by_web_id() {
    let mut store: AlarmStore = AlarmStore::default();
    store
        .add_member(SystemAlarmSpec::every(5), noop)
        .unwrap();

    let index = store
        .add_customizable(
            spec("Water plants", 6, 45).parameter(12),
            Some(AlarmAction::Member(noop)),
        )
        .unwrap();
    assert_eq!(index, 1);

    let web_id = store.get(index).unwrap().web_id();
    assert_eq!(web_id, 1);
    assert_eq!(store.find_by_web_id(web_id), Ok(index));

    let alarm = store.get(store.find_by_web_id(web_id).unwrap()).unwrap();
    assert!(alarm.is_customizable());
    assert!(alarm.enabled());
    assert_eq!(alarm.meta().name, "Water plants");
    assert_eq!(alarm.meta().type_label, "LOG");
    assert_eq!(alarm.hour(), TimeField::At(6));
    assert_eq!(alarm.minute(), TimeField::At(45));
    assert_eq!(alarm.parameter(), 12);
    assert_eq!(alarm.interval_minutes(), 0);
    assert!(alarm.cache().is_never_fired());
}

#[test]
fn test_capacity_exhaustion_leaves_store_unchanged() {
    let persistence = MemoryPersistence::new();
    let mut store: AlarmStore = AlarmStore::new(persistence.clone());

    for _ in 0..4 {
        store.add_member(SystemAlarmSpec::every(1), noop).unwrap();
    }
    for i in 0..(MAX_ALARMS - 4) {
        store
            .add_customizable(spec(&format!("alarm {}", i), 1, 0), None)
            .unwrap();
    }
    assert!(store.is_full());

    let saves = persistence.save_count();
    let before = names(&store);

    assert_eq!(
        store.add_customizable(spec("one too many", 2, 0), None),
        Err(AlarmError::CapacityExceeded { max: MAX_ALARMS })
    );
    assert_eq!(
        store.add_member(SystemAlarmSpec::every(1), noop),
        Err(AlarmError::CapacityExceeded { max: MAX_ALARMS })
    );

    assert_eq!(store.count(), MAX_ALARMS);
    assert_eq!(names(&store), before);
    assert_eq!(persistence.save_count(), saves);
}

#[test]
fn test_delete_compacts_and_preserves_order() {
    let mut store: AlarmStore = AlarmStore::default();
    store.add_member(SystemAlarmSpec::every(1), noop).unwrap();
    for (name, hour) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        store.add_customizable(spec(name, hour, 0), None).unwrap();
    }
    // web ids: a=1 b=2 c=3 d=4, slots 1..=4
    assert_eq!(store.find_by_web_id(3), Ok(3));

    store.delete_customizable(2).unwrap();

    assert_eq!(store.count(), 4);
    assert_eq!(names(&store), vec!["", "a", "c", "d"]);
    assert_eq!(store.find_by_web_id(2), Err(AlarmError::NotFound(2)));
    // c moved down a slot but kept its id
    assert_eq!(store.find_by_web_id(3), Ok(2));
    assert_eq!(store.delete_customizable(2), Err(AlarmError::NotFound(2)));
}

#[test]
fn test_unknown_web_id_is_not_found() {
    let mut store: AlarmStore = AlarmStore::default();
    store.add_customizable(spec("only", 5, 5), None).unwrap();

    assert_eq!(
        store.modify_customizable(42, spec("x", 1, 1), Some(AlarmAction::Member(noop))),
        Err(AlarmError::NotFound(42))
    );
    assert_eq!(store.set_enabled(42, true), Err(AlarmError::NotFound(42)));
    assert_eq!(store.delete_customizable(42), Err(AlarmError::NotFound(42)));
    assert_eq!(store.count(), 1);
}

#[test]
#[traced_test]
fn test_persistence_failure_is_logged_not_returned() {
    let persistence = MemoryPersistence::new();
    persistence.set_fail_saves(true);
    let mut store: AlarmStore = AlarmStore::new(persistence.clone());

    let index = store.add_customizable(spec("kept", 8, 0), None).unwrap();
    store.set_enabled(1, false).unwrap();

    assert_eq!(store.count(), 1);
    assert!(!store.get(index).unwrap().enabled());
    assert_eq!(persistence.save_count(), 0);
    assert!(logs_contain("Failed to persist"));
}

#[test]
fn test_json_file_round_trip_restores_web_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customizable_alarms.json");

    {
        let mut store: AlarmStore = AlarmStore::new(JsonFilePersistence::new(&path));
        store.add_member(SystemAlarmSpec::every(1), noop).unwrap();
        store
            .add_customizable(
                CustomAlarmSpec::new("Pump on", DayMask::WEEKDAYS, 6, 0)
                    .type_label("RELAY_ON")
                    .parameter(1),
                None,
            )
            .unwrap();
        store.add_customizable(spec("temp", 7, 0), None).unwrap();
        store
            .add_customizable(spec("Pump off", 6, 30).enabled(false), None)
            .unwrap();
        store.delete_customizable(2).unwrap();
    }

    let mut restored: AlarmStore = AlarmStore::new(JsonFilePersistence::new(&path));
    restored.add_member(SystemAlarmSpec::every(1), noop).unwrap();
    let loaded = restored
        .load_customizables(|record| {
            (record.action == "RELAY_ON").then_some(AlarmAction::Member(noop))
        })
        .unwrap();
    assert_eq!(loaded, 2);

    let pump_on = restored.get(restored.find_by_web_id(1).unwrap()).unwrap();
    assert_eq!(pump_on.day_mask(), DayMask::WEEKDAYS);
    assert_eq!(pump_on.parameter(), 1);
    assert!(pump_on.action().is_some());

    let pump_off = restored.get(restored.find_by_web_id(3).unwrap()).unwrap();
    assert!(!pump_off.enabled());
    assert!(pump_off.action().is_none());

    assert!(restored.find_by_web_id(2).is_err());
    assert_eq!(restored.next_web_id(), 4);
}

#[test]
fn test_load_skips_invalid_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");
    std::fs::write(
        &path,
        r#"{
            "version": "1.0",
            "timestamp": 0,
            "total": 6,
            "alarms": [
                { "id": 1, "name": "Valid", "day": 2, "hour": 7, "minute": 0, "action": "LOG" },
                { "id": 2, "name": "", "hour": 7, "minute": 0 },
                { "id": 3, "name": "Bad hour", "hour": 24, "minute": 0 },
                { "id": 4, "name": "Bad minute", "hour": 7, "minute": 60 },
                { "id": 0, "name": "Bad id", "hour": 7, "minute": 0 },
                { "name": "No id", "hour": 7, "minute": 0 }
            ]
        }"#,
    )
    .unwrap();

    let persistence = JsonFilePersistence::new(&path);
    assert_eq!(persistence.load().unwrap().len(), 6);

    let mut store: AlarmStore = AlarmStore::new(persistence);
    assert_eq!(store.load_customizables(|_| None).unwrap(), 1);

    let alarm = store.get(0).unwrap();
    assert_eq!(alarm.web_id(), 1);
    assert_eq!(alarm.day_mask(), DayMask::MONDAY);
}

#[test]
fn test_load_failure_keeps_existing_alarms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");
    std::fs::write(&path, "{ definitely not json").unwrap();

    let mut store: AlarmStore = AlarmStore::new(JsonFilePersistence::new(&path));
    store.add_member(SystemAlarmSpec::every(1), noop).unwrap();

    assert!(store.load_customizables(|_| None).is_err());
    assert_eq!(store.count(), 1);
}

#[test]
fn test_records_exported_for_persistence() {
    let mut store: AlarmStore = AlarmStore::default();
    store.add_member(SystemAlarmSpec::every(1), noop).unwrap();
    store
        .add_customizable(
            CustomAlarmSpec::new("Gate", DayMask::SATURDAY, 22, 15).type_label("RELAY_OFF"),
            None,
        )
        .unwrap();

    let records: Vec<AlarmRecord> = store.customizable_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 1);
    assert_eq!(records[0].day, 7);
    assert_eq!(records[0].day_mask, Some(DayMask::SATURDAY.bits()));
    assert_eq!((records[0].hour, records[0].minute), (22, 15));
    assert_eq!(records[0].action, "RELAY_OFF");
}
