//! Session identity.

use std::fmt;

use uuid::Uuid;

/// Stable identifier of one accepted connection (browser or hub).
///
/// Registries key their membership by this id; it also tags every
/// per-session log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_distinct() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_display_is_hyphenated_uuid() {
        let id = SessionId::new();
        assert_eq!(id.to_string().len(), 36);
    }
}
