//! Testing utilities for roundup runs.
//!
//! This module provides:
//! - Scripted provider fakes with call logs
//! - Sample configurations and image bytes
//! - Manifest assertions

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_final_state, assert_stages_recorded, assert_unique_keys};
pub use fixtures::{fast_policy, jpeg_bytes, png_bytes, sample_config, tagged_png};
pub use mocks::{
    FakeProviders, FakeSpeech, RecordingEncoder, RecordingRenderer, Script, Scripted,
    ScriptedImages, ScriptedSearch, ScriptedText,
};
