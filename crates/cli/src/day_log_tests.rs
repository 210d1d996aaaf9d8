// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn events_round_trip_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let log = DayLog::new(Some(dir.path()));

    log.push(&DayEvent::Phase { phase: "CLOSING".to_owned(), at: 100 });
    log.push(&DayEvent::Breakdown { operator: 1, at: 101 });
    log.push(&DayEvent::Resume { operator: 1, at: 102 });

    let events = log.read_all();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], DayEvent::Phase { phase, at: 100 } if phase == "CLOSING"));
    assert!(matches!(&events[1], DayEvent::Breakdown { operator: 1, at: 101 }));
    assert!(matches!(&events[2], DayEvent::Resume { operator: 1, at: 102 }));
}

#[test]
fn a_pathless_log_stays_silent() {
    let log = DayLog::new(None);
    log.push(&DayEvent::Panic { at: 1 });
    assert!(log.read_all().is_empty());
}

#[test]
fn lines_are_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let log = DayLog::new(Some(dir.path()));
    log.push(&DayEvent::Panic { at: 7 });

    let raw = std::fs::read_to_string(dir.path().join("day_events.jsonl")).unwrap();
    let line = raw.lines().next().unwrap();
    let value: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(value["event"], "panic");
    assert_eq!(value["at"], 7);
}
