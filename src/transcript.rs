//! The in-memory conversation transcript.
//!
//! A transcript is the strictly chronological record of user/assistant
//! turns for one session. It lives only in process memory and is
//! discarded on exit; nothing here touches the disk.

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name used in the Ollama messages array.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One (role, text) entry in the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Append-only sequence of turns.
///
/// The backing Vec is private and only push accessors are exposed, so a
/// turn can never be reordered or removed once recorded.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            text: text.into(),
        });
    }

    /// Append an assistant turn.
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            text: text.into(),
        });
    }

    /// The recorded turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.len(), 0);
    }

    #[test]
    fn test_push_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.push_user("hello");
        transcript.push_assistant("hi there");
        transcript.push_user("how are you?");

        let turns = transcript.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0], Turn { role: Role::User, text: "hello".to_string() });
        assert_eq!(turns[1], Turn { role: Role::Assistant, text: "hi there".to_string() });
        assert_eq!(turns[2], Turn { role: Role::User, text: "how are you?".to_string() });
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}
