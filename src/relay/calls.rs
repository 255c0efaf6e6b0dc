use std::collections::HashMap;

/// A tool call the upstream announced during the current response turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingToolCall {
    call_id: String,
    previous_item_id: Option<String>,
    completed: bool,
}

impl PendingToolCall {
    pub(crate) fn previous_item_id(&self) -> Option<&str> {
        self.previous_item_id.as_deref()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    /// First completion of an announced call; the tool should run.
    Ready { previous_item_id: Option<String> },
    /// The call was already completed in this turn.
    Duplicate,
    /// The call id was never announced.
    Unknown,
}

/// Tool calls of the current turn, private to one connection pair.
///
/// Calls stay in the set after completing so that the end of the turn knows a
/// new response has to be requested for the model to see the tool output.
#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    calls: HashMap<String, PendingToolCall>,
    continuation_due: bool,
}

impl PendingCalls {
    /// Records a function-call item. Returns `false` if the call id is already known.
    pub(crate) fn announce(&mut self, call_id: &str, previous_item_id: Option<&str>) -> bool {
        if self.calls.contains_key(call_id) {
            return false;
        }
        self.calls.insert(
            call_id.to_string(),
            PendingToolCall {
                call_id: call_id.to_string(),
                previous_item_id: previous_item_id.map(str::to_string),
                completed: false,
            },
        );
        true
    }

    pub(crate) fn complete(&mut self, call_id: &str) -> Completion {
        self.continuation_due = true;
        match self.calls.get_mut(call_id) {
            Some(call) if call.completed => Completion::Duplicate,
            Some(call) => {
                call.completed = true;
                Completion::Ready {
                    previous_item_id: call.previous_item_id.clone(),
                }
            }
            None => Completion::Unknown,
        }
    }

    pub(crate) fn get(&self, call_id: &str) -> Option<&PendingToolCall> {
        self.calls.get(call_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }

    /// Clears the turn. Returns whether a response continuation must be requested.
    pub(crate) fn finish_turn(&mut self) -> bool {
        let due = self.continuation_due || !self.calls.is_empty();
        if !self.calls.is_empty() {
            let ids: Vec<&str> = self.calls.values().map(|c| c.call_id.as_str()).collect();
            tracing::debug!("clearing tool calls at end of turn: {:?}", ids);
        }
        self.calls.clear();
        self.continuation_due = false;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announce_once_per_call_id() {
        let mut calls = PendingCalls::default();

        assert!(calls.announce("c1", Some("item_0")));
        assert!(!calls.announce("c1", Some("item_9")));

        assert_eq!(calls.len(), 1);
        assert_eq!(calls.get("c1").unwrap().previous_item_id(), Some("item_0"));
    }

    #[test]
    fn test_completion_is_ready_then_duplicate() {
        let mut calls = PendingCalls::default();
        calls.announce("c1", Some("item_0"));

        assert_eq!(
            calls.complete("c1"),
            Completion::Ready {
                previous_item_id: Some("item_0".to_string())
            }
        );
        assert_eq!(calls.complete("c1"), Completion::Duplicate);
    }

    #[test]
    fn test_unknown_completion_does_not_create_an_entry() {
        let mut calls = PendingCalls::default();

        assert_eq!(calls.complete("ghost"), Completion::Unknown);
        assert_eq!(calls.len(), 0);
        assert!(calls.finish_turn(), "the injected output still needs a new response");
    }

    #[test]
    fn test_finish_turn_clears_everything_once() {
        let mut calls = PendingCalls::default();
        calls.announce("c1", None);
        calls.announce("c2", None);
        calls.complete("c1");

        assert!(calls.finish_turn());
        assert_eq!(calls.len(), 0);
        assert!(!calls.finish_turn());
    }

    #[test]
    fn test_quiet_turn_needs_no_continuation() {
        let mut calls = PendingCalls::default();
        assert!(!calls.finish_turn());
    }
}
