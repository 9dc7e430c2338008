//! Assertions over manifests.

use std::collections::HashSet;

use crate::core::{Slot, StageName, TopicState};
use crate::store::Manifest;

/// Asserts that no artifact key appears twice in the persisted manifest.
///
/// # Panics
///
/// Panics if the manifest cannot be serialized or holds a duplicate key.
pub fn assert_unique_keys(manifest: &Manifest) {
    let raw: serde_json::Value =
        serde_json::from_slice(&manifest.to_json_vec().expect("manifest serializes"))
            .expect("manifest is valid json");
    let entries = raw["entries"].as_array().expect("entries array");
    let mut seen = HashSet::new();
    for entry in entries {
        let key = entry["key"].to_string();
        assert!(seen.insert(key.clone()), "duplicate manifest key {key}");
    }
}

/// Asserts that the topic slot has exactly the given stages recorded.
///
/// # Panics
///
/// Panics if the recorded stages differ.
pub fn assert_stages_recorded(manifest: &Manifest, slot: Slot, expected: &[StageName]) {
    let stages: Vec<StageName> = manifest.entries_for(slot).map(|e| e.key.stage).collect();
    assert_eq!(stages, expected, "stages recorded for {slot}");
}

/// Asserts the last topic state recorded for `slot`.
///
/// # Panics
///
/// Panics if the slot has no state-carrying entry or a different one.
pub fn assert_final_state(manifest: &Manifest, slot: Slot, expected: TopicState) {
    let state = manifest
        .entries_for(slot)
        .filter_map(|e| e.state)
        .max_by_key(|s| state_rank(*s));
    assert_eq!(state, Some(expected), "final state of {slot}");
}

fn state_rank(state: TopicState) -> u8 {
    match state {
        TopicState::Pending => 0,
        TopicState::Searching => 1,
        TopicState::Summarizing => 2,
        TopicState::ImageFetching => 3,
        TopicState::Synthesizing => 4,
        TopicState::SlideBuilding => 5,
        TopicState::Complete | TopicState::PartialComplete | TopicState::Failed => 6,
    }
}
