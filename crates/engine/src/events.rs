//! Event types emitted by the formula editor.
//!
//! The editor never touches the surrounding catalog itself. Anything that
//! should happen outside the formula (importing a referenced variable,
//! opening a creation flow) comes back to the caller as a value.

use crate::catalog::VariableRef;
use crate::formula::{Token, TokenId};

/// A token passed the append gate and is now part of the sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAccepted {
    pub token: Token,
    /// Set when the token references a variable the editing context does not
    /// hold yet. The caller decides whether and when to import it.
    pub catalog_import: Option<VariableRef>,
}

/// What happened when the input buffer was committed (Enter).
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// The input became a token.
    Accepted(TokenAccepted),
    /// A creation request went out for this name.
    CreationRequested { name: String },
    /// Another creation request is still outstanding; input kept.
    CreationPending { name: String },
    /// Nothing to commit (empty or too short to create). Input kept.
    Ignored,
}

/// Log of editor activity, drained by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    Accepted { token: TokenId, import: Option<String> },
    Rejected { message: String },
    Removed { token: TokenId },
    CreationRequested { name: String },
    CreationResolved { name: String, id: String },
    CreationFailed { name: String, reason: String },
}

/// Simple event collector.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<EditorEvent>,
}

impl EventCollector {
    pub fn push(&mut self, event: EditorEvent) {
        self.events.push(event);
    }

    pub fn take(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_take_drains() {
        let mut c = EventCollector::default();
        c.push(EditorEvent::Rejected { message: "bad".into() });
        c.push(EditorEvent::CreationRequested { name: "Wall".into() });
        assert_eq!(c.take().len(), 2);
        assert!(c.take().is_empty());
    }
}
