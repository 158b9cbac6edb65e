//! Small string utilities used by the sorter and the brain

use crate::patterns::{RE_NASTIES, RE_NON_WORDS, RE_WS};

/// Trigger characters that disqualify the atomic fast path
const SPECIALS: [char; 7] = ['*', '#', '_', '(', '[', '<', '{'];

/// Count the words in a trigger pattern.
///
/// When `all` is false, wildcards (`*`, `#`, `_`), alternation pipes, and
/// optional brackets separate words without counting as words themselves.
/// When `all` is true every whitespace-separated token counts, which is
/// what substitution sorting wants.
pub fn word_count(pattern: &str, all: bool) -> usize {
    if all {
        pattern.split_whitespace().count()
    } else {
        RE_NON_WORDS
            .split(pattern)
            .filter(|w| !w.is_empty())
            .count()
    }
}

/// Strip everything that is not a plain word character or space
pub fn strip_nasties(text: &str) -> String {
    RE_NASTIES.replace_all(text, "").into_owned()
}

/// Collapse runs of whitespace and trim the ends
pub fn collapse_ws(text: &str) -> String {
    RE_WS.replace_all(text, " ").trim().to_string()
}

/// A pattern with no wildcards, optionals, or tags can be matched by
/// string equality instead of a compiled regex
pub fn is_atomic(pattern: &str) -> bool {
    !pattern.chars().any(|c| SPECIALS.contains(&c))
}

/// Title-case every word (the `{formal}` format)
pub fn formal(text: &str) -> String {
    text.split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capitalize only the first character (the `{sentence}` format)
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_wildcards() {
        assert_eq!(word_count("hello bot", false), 2);
        assert_eq!(word_count("my name is *", false), 3);
        assert_eq!(word_count("*", false), 0);
        assert_eq!(word_count("* _ #", false), 0);
        assert_eq!(word_count("what is your [real] name", false), 5);
    }

    #[test]
    fn test_word_count_all() {
        assert_eq!(word_count("a b c", true), 3);
        assert_eq!(word_count("* _", true), 2);
    }

    #[test]
    fn test_strip_nasties() {
        assert_eq!(strip_nasties("Hello, Bot!"), "Hello Bot");
        assert_eq!(strip_nasties("a@b.com"), "abcom");
    }

    #[test]
    fn test_is_atomic() {
        assert!(is_atomic("hello bot"));
        assert!(!is_atomic("hello *"));
        assert!(!is_atomic("[the] bot"));
        assert!(!is_atomic("<bot name>"));
        assert!(!is_atomic("hi {weight=2}"));
    }

    #[test]
    fn test_formats() {
        assert_eq!(formal("hello there bot"), "Hello There Bot");
        assert_eq!(capitalize("hello there"), "Hello there");
        assert_eq!(capitalize(""), "");
    }
}
