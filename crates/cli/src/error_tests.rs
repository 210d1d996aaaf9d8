// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn refusal_strings_are_stable() {
    assert_eq!(Refusal::Closed.as_str(), "CLOSED");
    assert_eq!(Refusal::Unsupervised.as_str(), "UNSUPERVISED");
    assert_eq!(Refusal::RegistryFull.as_str(), "REGISTRY_FULL");
    assert_eq!(Refusal::InvalidPass.as_str(), "INVALID_PASS");
    assert_eq!(Refusal::Interrupted.as_str(), "INTERRUPTED");
    assert_eq!(Refusal::Breakdown.as_str(), "BREAKDOWN");
}

#[test]
fn display_matches_as_str() {
    assert_eq!(Refusal::Breakdown.to_string(), "BREAKDOWN");
}

#[test]
fn exit_codes_are_distinct() {
    let codes = [exit::OK, exit::STARTUP, exit::USAGE, exit::ALREADY_RUNNING, exit::PANIC];
    for (i, a) in codes.iter().enumerate() {
        for b in &codes[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(exit::OK, 0);
}
