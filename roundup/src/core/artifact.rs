//! Deterministic artifact keys.
//!
//! A key is derived only from the stage, the slot and a sequence number, so
//! it can be computed before a stage runs and is identical across reruns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::StageName;

/// Where an artifact belongs in the final running order.
///
/// Declaration order is assembly order: intro, topics by number, outro,
/// then the assembled outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Slot {
    /// Intro narration.
    Intro,
    /// A topic, by its 1-based number assigned at run start.
    Topic(usize),
    /// Outro narration.
    Outro,
    /// Outputs of the assembly stage.
    Final,
}

impl Slot {
    /// Returns the topic number for topic slots.
    #[must_use]
    pub fn topic_number(&self) -> Option<usize> {
        match self {
            Self::Topic(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intro => f.write_str("intro"),
            Self::Topic(n) => write!(f, "topic_{n:02}"),
            Self::Outro => f.write_str("outro"),
            Self::Final => f.write_str("final"),
        }
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intro" => Ok(Self::Intro),
            "outro" => Ok(Self::Outro),
            "final" => Ok(Self::Final),
            other => other
                .strip_prefix("topic_")
                .and_then(|n| n.parse::<usize>().ok())
                .map(Self::Topic)
                .ok_or_else(|| format!("unknown slot '{other}'")),
        }
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

impl TryFrom<String> for Slot {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Deterministic identity of a produced artifact.
///
/// Field order gives the manifest its ordering: by slot, then by stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Slot the artifact belongs to.
    pub slot: Slot,
    /// Stage that produces it.
    pub stage: StageName,
    /// Sequence number within the stage and slot.
    pub seq: u32,
}

impl ArtifactKey {
    /// Creates a key with sequence number zero.
    #[must_use]
    pub fn new(stage: StageName, slot: Slot) -> Self {
        Self { slot, stage, seq: 0 }
    }

    /// Sets the sequence number.
    #[must_use]
    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.stage, self.slot, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display_is_zero_padded() {
        assert_eq!(Slot::Topic(3).to_string(), "topic_03");
        assert_eq!(Slot::Topic(42).to_string(), "topic_42");
        assert_eq!(Slot::Intro.to_string(), "intro");
    }

    #[test]
    fn test_slot_parse() {
        assert_eq!("topic_07".parse::<Slot>(), Ok(Slot::Topic(7)));
        assert_eq!("outro".parse::<Slot>(), Ok(Slot::Outro));
        assert!("topic_x".parse::<Slot>().is_err());
    }

    #[test]
    fn test_slot_order_is_running_order() {
        let mut slots = vec![Slot::Final, Slot::Topic(2), Slot::Outro, Slot::Topic(1), Slot::Intro];
        slots.sort();
        assert_eq!(
            slots,
            vec![Slot::Intro, Slot::Topic(1), Slot::Topic(2), Slot::Outro, Slot::Final]
        );
    }

    #[test]
    fn test_key_display() {
        let key = ArtifactKey::new(StageName::Speech, Slot::Topic(1));
        assert_eq!(key.to_string(), "speech:topic_01:0");
        assert_eq!(key.with_seq(2).to_string(), "speech:topic_01:2");
    }

    #[test]
    fn test_key_is_independent_of_anything_but_position() {
        let a = ArtifactKey::new(StageName::Image, Slot::Topic(4));
        let b = ArtifactKey::new(StageName::Image, Slot::Topic(4));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_serializes_slot_as_string() {
        let key = ArtifactKey::new(StageName::Slide, Slot::Topic(9));
        let json = serde_json::to_value(key).unwrap();
        assert_eq!(json["slot"], "topic_09");
        assert_eq!(json["stage"], "slide");
        let back: ArtifactKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);
    }
}
