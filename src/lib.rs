//! # Rivet: a reply-script engine
//!
//! Rivet interprets RiveScript-style documents: declarative scripts that
//! pair triggers (user-input patterns) with replies, grouped into topics.
//! Load scripts, sort them once, then serve replies to any number of users.
//!
//! ```rust,ignore
//! use rivet::Rivet;
//!
//! let mut bot = Rivet::new();
//! bot.stream("+ hello bot\n- Hello, human!")?;
//! bot.sort_replies();
//! let reply = bot.reply("local-user", "Hello bot")?;
//! ```
//!
//! Sessions, topic inheritance, `%Previous` chains, conditionals, object
//! macros, and a pluggable Korean-morpheme preprocessor are built in.

pub mod ast;
pub mod config;
pub mod handlers;
pub mod morpheme;
pub mod parser;
pub mod session;

mod brain;
mod patterns;
mod runtime;
mod sorter;
mod text;

// Re-exports for convenience
pub use config::{ConcatMode, Config, ErrorMessages, MorphemeMode};
pub use handlers::{ObjectHandler, Subroutine};
pub use morpheme::Preprocessor;
pub use runtime::Rivet;
pub use session::{History, MemoryStore, SessionStore, ThawAction, UserData, HISTORY_SIZE};

/// Result type for Rivet operations
pub type Result<T> = std::result::Result<T, RivetError>;

/// Errors that can occur while loading scripts or generating replies
///
/// When `Config::throw_exceptions` is false, the reply-phase variants are
/// rendered through the configured [`ErrorMessages`] strings instead of
/// being returned as errors.
#[derive(Debug, thiserror::Error)]
pub enum RivetError {
    #[error("syntax error in {file} line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("deep recursion detected")]
    DeepRecursion,

    #[error("replies were not sorted (call sort_replies first)")]
    RepliesNotSorted,

    #[error("no default topic 'random' was found")]
    NoDefaultTopic,

    #[error("no trigger matched the message")]
    ReplyNotMatched,

    #[error("the matched trigger yielded no reply")]
    ReplyNotFound,

    #[error("no object macro named '{0}'")]
    ObjectNotFound(String),

    #[error("no session data for user '{0}'")]
    NoSuchUser(String),

    #[error("cannot divide by zero")]
    DivideByZero,

    #[error("cannot do math on non-numeric variable '{0}'")]
    MathVariable(String),

    #[error("cannot do math with non-numeric value '{0}'")]
    MathValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
