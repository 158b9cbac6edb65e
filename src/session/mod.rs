//! Per-user session state
//!
//! Every user the engine talks to gets a [`UserData`] record: freeform
//! variables, the pattern of the last matched trigger, and a bounded
//! input/reply history. The [`SessionStore`] trait hides the storage so a
//! different backend can be plugged in; the default [`MemoryStore`] keeps
//! everything in process memory.
//!
//! Stores must serialize mutations per user and allow concurrent reads;
//! the reply phase calls every method through `&self`.

mod memory;

pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many inputs and replies each user's history retains
pub const HISTORY_SIZE: usize = 9;

/// Sentinel for history slots and variables that were never set
pub const UNDEFINED: &str = "undefined";

/// Bounded FIFO of a user's conversation, newest first
///
/// Both sides always hold exactly [`HISTORY_SIZE`] entries; slots not yet
/// filled hold the `"undefined"` sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub input: Vec<String>,
    pub reply: Vec<String>,
}

impl Default for History {
    fn default() -> Self {
        Self {
            input: vec![UNDEFINED.to_string(); HISTORY_SIZE],
            reply: vec![UNDEFINED.to_string(); HISTORY_SIZE],
        }
    }
}

impl History {
    /// Prepend one exchange, dropping the oldest
    pub fn push(&mut self, input: &str, reply: &str) {
        self.input.insert(0, input.to_string());
        self.reply.insert(0, reply.to_string());
        self.input.truncate(HISTORY_SIZE);
        self.reply.truncate(HISTORY_SIZE);
    }
}

/// Everything the engine knows about one user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserData {
    /// Freeform variables (`<set>`, `{topic=}`, API setters)
    pub vars: HashMap<String, String>,
    /// Pattern text of the last matched trigger
    pub last_match: Option<String>,
    /// Bounded conversation history
    pub history: History,
}

/// What to do with the frozen copy when thawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThawAction {
    /// Restore the frozen copy and delete it
    Thaw,
    /// Restore the frozen copy but keep it around
    Keep,
    /// Delete the frozen copy without restoring
    Discard,
}

/// Storage backend for user sessions
///
/// Users are created lazily by `init`; reads of unknown users return
/// `None` rather than creating them.
pub trait SessionStore: Send + Sync {
    /// Create the user's record if it does not exist
    fn init(&self, username: &str);

    /// Set or unset one variable (`None` removes it)
    fn set(&self, username: &str, name: &str, value: Option<String>);

    /// Merge a map of variables into the user's record
    fn set_many(&self, username: &str, vars: HashMap<String, String>);

    /// Read one variable
    fn get(&self, username: &str, name: &str) -> Option<String>;

    /// Clone the user's full record
    fn get_user(&self, username: &str) -> Option<UserData>;

    /// Clone every user's record
    fn get_all(&self) -> HashMap<String, UserData>;

    /// Prepend one exchange onto the user's history
    fn add_history(&self, username: &str, input: &str, reply: &str);

    /// Clone the user's history
    fn history(&self, username: &str) -> Option<History>;

    /// Record (or clear) the last matched trigger pattern
    fn set_last_match(&self, username: &str, pattern: Option<String>);

    /// Read the last matched trigger pattern
    fn last_match(&self, username: &str) -> Option<String>;

    /// Delete one user's record (and any frozen copy)
    fn clear(&self, username: &str);

    /// Delete every record
    fn clear_all(&self);

    /// Snapshot the user's record beside the live one
    fn freeze(&self, username: &str) -> crate::Result<()>;

    /// Restore or discard the snapshot
    fn thaw(&self, username: &str, action: ThawAction) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_bounds() {
        let mut history = History::default();
        assert_eq!(history.input.len(), HISTORY_SIZE);
        assert_eq!(history.reply.len(), HISTORY_SIZE);

        for i in 0..20 {
            history.push(&format!("in{}", i), &format!("out{}", i));
            assert_eq!(history.input.len(), HISTORY_SIZE);
            assert_eq!(history.reply.len(), HISTORY_SIZE);
        }
        assert_eq!(history.input[0], "in19");
        assert_eq!(history.reply[8], "out11");
    }

    #[test]
    fn test_history_sentinel() {
        let history = History::default();
        assert!(history.input.iter().all(|slot| slot == UNDEFINED));
    }
}
