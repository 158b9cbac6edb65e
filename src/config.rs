//! Configuration for the Rivet engine

use regex::Regex;

/// Default recursion ceiling for redirects, tag loops, and topic walks
pub const DEFAULT_DEPTH: usize = 50;

/// Highest script version this engine understands
pub const RS_VERSION: f64 = 2.0;

/// Line-continuation separator used when a `^` line extends the one above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatMode {
    /// Join continuations with nothing in between
    #[default]
    None,
    /// Join continuations with a newline
    Newline,
    /// Join continuations with a single space
    Space,
}

impl ConcatMode {
    /// The literal separator inserted between a line and its continuation
    pub fn separator(self) -> &'static str {
        match self {
            ConcatMode::None => "",
            ConcatMode::Newline => "\n",
            ConcatMode::Space => " ",
        }
    }

    /// Parse a `! local concat = ...` value; unknown names return `None`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(ConcatMode::None),
            "newline" => Some(ConcatMode::Newline),
            "space" => Some(ConcatMode::Space),
            _ => None,
        }
    }
}

/// Whether trigger patterns and user messages pass through the morpheme
/// preprocessor before matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphemeMode {
    /// Match raw text
    #[default]
    None,
    /// Run the registered [`crate::Preprocessor`] over `+` patterns and
    /// user messages
    Separation,
}

/// The reply strings used when `throw_exceptions` is off
///
/// Each field corresponds to one error kind; overriding a field changes
/// what the user sees when that condition occurs mid-conversation.
#[derive(Debug, Clone)]
pub struct ErrorMessages {
    pub deep_recursion: String,
    pub replies_not_sorted: String,
    pub default_topic_not_found: String,
    pub reply_not_matched: String,
    pub reply_not_found: String,
    pub object_not_found: String,
    pub cannot_divide_by_zero: String,
    pub cannot_math_variable: String,
    pub cannot_math_value: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            deep_recursion: "ERR: Deep Recursion Detected".into(),
            replies_not_sorted: "ERR: Replies Not Sorted".into(),
            default_topic_not_found: "ERR: No default topic 'random' was found".into(),
            reply_not_matched: "ERR: No Reply Matched".into(),
            reply_not_found: "ERR: No Reply Found".into(),
            object_not_found: "[ERR: Object Not Found]".into(),
            cannot_divide_by_zero: "[ERR: Can't Divide By Zero]".into(),
            cannot_math_variable: "[ERR: Can't Perform Math Operation On Non-Numeric Variable]"
                .into(),
            cannot_math_value: "[ERR: Can't Perform Math Operation With Non-Numeric Value]".into(),
        }
    }
}

/// Engine options
///
/// All knobs apply engine-wide. Options that affect parsing (`strict`,
/// `force_case`, `concat`, `morpheme`) must be set before scripts load.
#[derive(Debug, Clone)]
pub struct Config {
    /// Raise errors for fatal reply-phase conditions instead of returning
    /// the corresponding [`ErrorMessages`] string
    pub throw_exceptions: bool,

    /// Fail on the first syntax error instead of logging and skipping
    pub strict: bool,

    /// Relax the trigger character class and strip unicode punctuation
    /// from incoming messages
    pub utf8: bool,

    /// Characters stripped from messages in UTF-8 mode
    pub unicode_punctuation: Regex,

    /// Lowercase every `+` trigger pattern and topic name at parse time
    pub force_case: bool,

    /// Default separator for `^` line continuations
    pub concat: ConcatMode,

    /// Morpheme preprocessing mode for triggers and user messages
    pub morpheme: MorphemeMode,

    /// Recursion ceiling; every bounded loop in the engine gives up here
    pub depth: usize,

    /// Reply strings used when `throw_exceptions` is off
    pub errors: ErrorMessages,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            throw_exceptions: false,
            strict: true,
            utf8: false,
            unicode_punctuation: Regex::new(r"[.,!?;:]").unwrap(),
            force_case: false,
            concat: ConcatMode::None,
            morpheme: MorphemeMode::None,
            depth: DEFAULT_DEPTH,
            errors: ErrorMessages::default(),
        }
    }
}

impl Config {
    /// Enable or disable thrown errors
    pub fn with_throw_exceptions(mut self, on: bool) -> Self {
        self.throw_exceptions = on;
        self
    }

    /// Enable or disable strict parsing
    pub fn with_strict(mut self, on: bool) -> Self {
        self.strict = on;
        self
    }

    /// Enable or disable UTF-8 mode
    pub fn with_utf8(mut self, on: bool) -> Self {
        self.utf8 = on;
        self
    }

    /// Override the unicode punctuation class stripped in UTF-8 mode
    pub fn with_unicode_punctuation(mut self, pattern: &str) -> crate::Result<Self> {
        self.unicode_punctuation = Regex::new(pattern).map_err(|e| crate::RivetError::Parse {
            file: "config".into(),
            line: 0,
            message: format!("bad unicode punctuation pattern: {}", e),
        })?;
        Ok(self)
    }

    /// Enable or disable forced lowercasing of triggers and topic names
    pub fn with_force_case(mut self, on: bool) -> Self {
        self.force_case = on;
        self
    }

    /// Set the default line-continuation mode
    pub fn with_concat(mut self, mode: ConcatMode) -> Self {
        self.concat = mode;
        self
    }

    /// Set the morpheme preprocessing mode
    pub fn with_morpheme(mut self, mode: MorphemeMode) -> Self {
        self.morpheme = mode;
        self
    }

    /// Set the recursion ceiling (minimum 1)
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth.max(1);
        self
    }

    /// Override the error reply strings
    pub fn with_errors(mut self, errors: ErrorMessages) -> Self {
        self.errors = errors;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.depth, 50);
        assert!(config.strict);
        assert!(!config.utf8);
        assert_eq!(config.concat, ConcatMode::None);
    }

    #[test]
    fn test_concat_separator() {
        assert_eq!(ConcatMode::None.separator(), "");
        assert_eq!(ConcatMode::Newline.separator(), "\n");
        assert_eq!(ConcatMode::Space.separator(), " ");
        assert_eq!(ConcatMode::from_name("space"), Some(ConcatMode::Space));
        assert_eq!(ConcatMode::from_name("tabs"), None);
    }

    #[test]
    fn test_depth_floor() {
        let config = Config::default().with_depth(0);
        assert_eq!(config.depth, 1);
    }
}
