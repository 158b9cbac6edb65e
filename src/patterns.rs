//! Pre-compiled regular expressions shared by the parser, sorter, and brain

use regex::Regex;
use std::sync::LazyLock;

/// `{weight=N}` tag on a trigger or reply
pub static RE_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\{weight=(\d+)\}").expect("weight regex"));

/// `{inherits=N}` label prepended by the sorter's topic walk
pub static RE_INHERITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{inherits=(\d+)\}").expect("inherits regex"));

/// `{topic=name}` setter inside a reply
pub static RE_TOPIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{topic=(.+?)\}").expect("topic regex"));

/// `<set name=value>` user-variable assignment
pub static RE_SET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<set (.+?)=(.+?)>").expect("set regex"));

/// `{random}a|b{/random}` block
pub static RE_RANDOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{random\}(.+?)\{/random\}").expect("random regex"));

/// `<call>name args</call>` object-macro invocation
pub static RE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<call>(.+?)</call>").expect("call regex"));

/// `{@target}` inline redirect
pub static RE_REDIRECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{@(.+?)\}").expect("redirect regex"));

/// `LEFT op RIGHT` comparison inside a `*` condition
pub static RE_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s+(==|eq|!=|ne|<>|<=|>=|<|>)\s+(.+?)$").expect("condition regex")
});

/// Innermost `<...>` tag (contains no nested tags)
pub static RE_ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>]+?)>").expect("any-tag regex"));

/// `[optional]` group in a trigger
pub static RE_OPTIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.+?)\]").expect("optional regex"));

/// `(@name)` array reference
pub static RE_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(@([A-Za-z0-9_]+)\)").expect("array regex"));

/// `<bot name>` bot-variable reference in a trigger
pub static RE_BOT_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<bot (.+?)>").expect("bot-var regex"));

/// `<get name>` user-variable reference in a trigger
pub static RE_USER_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<get (.+?)>").expect("user-var regex"));

/// `\x00i\x00` placeholder left by the substitution engine
pub static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\x00(\\d+)\x00").expect("placeholder regex"));

/// A trigger consisting only of `*` tokens, which must match empty input too
pub static RE_ZERO_WIDTH_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\*(\s+\*)*\s*$").expect("zero-width-star regex"));

/// Characters stripped from messages in UTF-8 mode
pub static RE_META: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\\<>]").expect("meta regex"));

/// Broader symbol class stripped from bot replies in UTF-8 mode
pub static RE_SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.?,!;:@#$%^&*()+-]").expect("symbols regex"));

/// Anything that is not a plain word character or space
pub static RE_NASTIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 ]").expect("nasties regex"));

/// Runs of whitespace, for collapsing
pub static RE_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Token separators that do not count as words in a trigger
pub static RE_NON_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s*#_|\[\]]+").expect("non-words regex"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_capture() {
        let caps = RE_WEIGHT.captures("hello {weight=25}").unwrap();
        assert_eq!(&caps[1], "25");
    }

    #[test]
    fn test_condition_ops() {
        for op in ["==", "eq", "!=", "ne", "<>", "<", "<=", ">", ">="] {
            let line = format!("<get a> {} 5", op);
            let caps = RE_CONDITION.captures(&line).unwrap();
            assert_eq!(&caps[2], op, "operator {} should capture whole", op);
        }
    }

    #[test]
    fn test_zero_width_star() {
        assert!(RE_ZERO_WIDTH_STAR.is_match("*"));
        assert!(RE_ZERO_WIDTH_STAR.is_match("* *"));
        assert!(!RE_ZERO_WIDTH_STAR.is_match("* hello"));
    }

    #[test]
    fn test_any_tag_innermost() {
        let caps = RE_ANY_TAG.captures("<set a=<get b>>").unwrap();
        assert_eq!(&caps[1], "get b");
    }
}
