//! Conversation states
//!
//! Idle → Listening → Processing → Speaking → Idle, with Terminated as the
//! terminal state. Only the conversation loop changes the current state.

use serde::Serialize;

/// Public conversation state, as announced to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationState {
    /// Waiting for the hotkey
    #[default]
    Idle,
    /// Recording the question
    Listening,
    /// Transcribing and querying the language service
    Processing,
    /// Synthesizing and playing the answer
    Speaking,
    /// Loop finished, no further transitions
    Terminated,
}

impl ConversationState {
    /// Name used on the observer wire protocol
    pub fn wire_name(self) -> &'static str {
        match self {
            ConversationState::Idle => "inactivo",
            ConversationState::Listening => "escuchar",
            ConversationState::Processing => "procesar",
            ConversationState::Speaking => "hablar",
            ConversationState::Terminated => "terminado",
        }
    }

    pub fn is_idle(self) -> bool {
        matches!(self, ConversationState::Idle)
    }

    pub fn is_terminated(self) -> bool {
        matches!(self, ConversationState::Terminated)
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "Idle"),
            ConversationState::Listening => write!(f, "Listening"),
            ConversationState::Processing => write!(f, "Processing"),
            ConversationState::Speaking => write!(f, "Speaking"),
            ConversationState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// State change event pushed to every observer
///
/// Serializes as `{"estado": "<wire name>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateEvent {
    estado: &'static str,
}

impl StateEvent {
    pub fn new(state: ConversationState) -> Self {
        Self {
            estado: state.wire_name(),
        }
    }

    pub fn wire_name(&self) -> &'static str {
        self.estado
    }

    pub fn to_json(&self) -> String {
        // A struct with one &'static str field always serializes
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"estado\":\"{}\"}}", self.estado))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let state = ConversationState::default();
        assert!(state.is_idle());
        assert!(!state.is_terminated());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(ConversationState::Listening.wire_name(), "escuchar");
        assert_eq!(ConversationState::Processing.wire_name(), "procesar");
        assert_eq!(ConversationState::Speaking.wire_name(), "hablar");
        assert_eq!(ConversationState::Idle.wire_name(), "inactivo");
        assert_eq!(ConversationState::Terminated.wire_name(), "terminado");
    }

    #[test]
    fn test_event_json_shape() {
        let event = StateEvent::new(ConversationState::Speaking);
        assert_eq!(event.to_json(), r#"{"estado":"hablar"}"#);

        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["estado"], "hablar");
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", ConversationState::Processing), "Processing");
        assert_eq!(format!("{}", ConversationState::Terminated), "Terminated");
    }
}
