//! Abstract syntax tree produced by the parser
//!
//! One [`Root`] per parsed document. The engine merges roots from every
//! loaded file into its own tables before sorting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A `+` trigger and everything attached to it
///
/// Immutable once parsed; the engine and sort buffer share triggers by
/// reference counting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trigger {
    /// The raw pattern text of the `+` line
    pub pattern: String,
    /// `-` reply lines, in script order
    pub reply: Vec<String>,
    /// `*` condition lines, in script order
    pub condition: Vec<String>,
    /// `@` redirect target, if any
    pub redirect: Option<String>,
    /// `%` previous-reply constraint, if any
    pub previous: Option<String>,
}

/// A named bucket of triggers
#[derive(Debug, Clone, Default)]
pub struct Topic {
    /// Triggers in script order
    pub triggers: Vec<Arc<Trigger>>,
    /// Topics pooled at equal matching priority
    pub includes: HashSet<String>,
    /// Topics layered at strictly lower matching priority
    pub inherits: HashSet<String>,
}

/// `> object NAME LANG` body, delivered verbatim to a language handler
#[derive(Debug, Clone)]
pub struct ObjectMacro {
    pub name: String,
    pub language: String,
    pub code: Vec<String>,
}

/// The `!` definitions of a document
#[derive(Debug, Clone, Default)]
pub struct Begin {
    /// `! global` settings
    pub global: HashMap<String, String>,
    /// `! var` bot variables
    pub var: HashMap<String, String>,
    /// `! sub` message substitutions
    pub sub: HashMap<String, String>,
    /// `! person` person substitutions
    pub person: HashMap<String, String>,
    /// `! array` definitions
    pub array: HashMap<String, Vec<String>>,
}

/// Everything one parse pass produced
#[derive(Debug, Clone, Default)]
pub struct Root {
    pub begin: Begin,
    pub topics: HashMap<String, Topic>,
    pub objects: Vec<ObjectMacro>,
}

impl Root {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create a topic by name
    pub fn topic(&mut self, name: &str) -> &mut Topic {
        self.topics.entry(name.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_created_on_demand() {
        let mut root = Root::new();
        root.topic("random").triggers.push(Arc::new(Trigger {
            pattern: "hello".into(),
            reply: vec!["hi".into()],
            ..Default::default()
        }));
        assert_eq!(root.topics.len(), 1);
        assert_eq!(root.topics["random"].triggers[0].pattern, "hello");
    }
}
