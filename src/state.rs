//! State identifiers
//!
//! States are opaque string tokens. The core never inspects their structure;
//! two states are the same state when their strings are equal.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// State every newly observed user starts in
pub const INITIAL_STATE: &str = "idle";

/// Name of one node in the conversation graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The designated initial state (`"idle"`)
    pub fn initial() -> Self {
        Self(INITIAL_STATE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for StateId {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<&StateId> for StateId {
    fn from(value: &StateId) -> Self {
        value.clone()
    }
}

impl AsRef<str> for StateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StateId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StateId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A closed, statically known set of states.
///
/// Bots that want compile-time checked states implement this for an enum and
/// call [`HandlerRegistry::validate`](crate::registry::HandlerRegistry::validate)
/// at startup. The engine itself keeps working with [`StateId`].
///
/// ```
/// use statebot::state::{StateId, StateKind};
///
/// #[derive(Clone, Copy)]
/// enum Flow {
///     Idle,
///     Menu,
/// }
///
/// impl StateKind for Flow {
///     fn all() -> &'static [Self] {
///         &[Flow::Idle, Flow::Menu]
///     }
///
///     fn name(&self) -> &'static str {
///         match self {
///             Flow::Idle => "idle",
///             Flow::Menu => "menu",
///         }
///     }
/// }
///
/// assert_eq!(Flow::Menu.state_id(), StateId::from("menu"));
/// ```
pub trait StateKind: Sized + 'static {
    /// Every member of the set
    fn all() -> &'static [Self];

    /// The identifier this member is registered and persisted under
    fn name(&self) -> &'static str;

    fn state_id(&self) -> StateId {
        StateId::from(self.name())
    }

    /// Look a persisted identifier back up in the set
    fn from_state_id(id: &StateId) -> Option<&'static Self> {
        Self::all().iter().find(|kind| kind.name() == id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Flow {
        Idle,
        Welcome,
    }

    impl StateKind for Flow {
        fn all() -> &'static [Self] {
            &[Flow::Idle, Flow::Welcome]
        }

        fn name(&self) -> &'static str {
            match self {
                Flow::Idle => "idle",
                Flow::Welcome => "welcome",
            }
        }
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(StateId::default(), StateId::from(INITIAL_STATE));
        assert_eq!(StateId::initial().as_str(), "idle");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&StateId::from("menu")).unwrap();
        assert_eq!(json, "\"menu\"");

        let back: StateId = serde_json::from_str("\"menu\"").unwrap();
        assert_eq!(back, "menu");
    }

    #[test]
    fn equality_is_exact_string_match() {
        assert_ne!(StateId::from("Menu"), StateId::from("menu"));
        assert_ne!(StateId::from("menu "), StateId::from("menu"));
    }

    #[test]
    fn state_kind_round_trips_through_id() {
        let id = Flow::Welcome.state_id();
        assert_eq!(Flow::from_state_id(&id), Some(&Flow::Welcome));
        assert_eq!(Flow::from_state_id(&StateId::from("nope")), None);
    }
}
