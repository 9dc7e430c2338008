//! Topic identity and state.

use serde::{Deserialize, Serialize};

use super::{Slot, TopicState, TopicStatus};

/// One configured topic.
///
/// Numbers are assigned once at run start from configuration order and
/// never change with completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// 1-based sequence number.
    pub number: usize,
    /// Display label.
    pub label: String,
    /// Candidate base queries.
    pub queries: Vec<String>,
    /// Current state; only the topic's own pipeline changes it.
    pub state: TopicState,
}

impl Topic {
    /// Creates a pending topic.
    #[must_use]
    pub fn new(number: usize, label: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            number,
            label: label.into(),
            queries,
            state: TopicState::Pending,
        }
    }

    /// The artifact slot of this topic.
    #[must_use]
    pub fn slot(&self) -> Slot {
        Slot::Topic(self.number)
    }

    /// Coarse status.
    #[must_use]
    pub fn status(&self) -> TopicStatus {
        self.state.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_topic_is_pending() {
        let topic = Topic::new(2, "OpenAI", vec!["OpenAI news".to_string()]);
        assert_eq!(topic.state, TopicState::Pending);
        assert_eq!(topic.status(), TopicStatus::Pending);
        assert_eq!(topic.slot(), Slot::Topic(2));
    }
}
