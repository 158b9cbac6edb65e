//! Trigger pattern to regular expression rewriting

use crate::patterns::{
    RE_ARRAY, RE_BOT_VAR, RE_OPTIONAL, RE_USER_VAR, RE_WEIGHT, RE_ZERO_WIDTH_STAR,
};
use crate::runtime::Rivet;
use crate::session::{HISTORY_SIZE, UNDEFINED};
use crate::text::strip_nasties;

use regex::{NoExpand, Regex};
use std::sync::LazyLock;
use tracing::warn;

static RE_PIPE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|{2,}").expect("pipe-runs regex"));

static RE_PIPE_AFTER_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\(|\[)\|").expect("pipe-after-open regex"));

static RE_PIPE_BEFORE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|(\)|\])").expect("pipe-before-close regex"));

impl Rivet {
    /// Rewrite a trigger pattern into regular-expression source
    ///
    /// The result is compiled anchored (`^...$`) by the caller. Every
    /// expanding step is bounded by the recursion limit so pathological
    /// self-referential patterns cannot spin.
    pub(crate) fn trigger_regexp(&self, username: &str, pattern: &str) -> String {
        // A pattern of pure wildcards must match the empty string too, so
        // its stars compile to (.*?) instead of (.+?).
        let mut pattern = if RE_ZERO_WIDTH_STAR.is_match(pattern) {
            pattern.replace('*', "<zerowidthstar>")
        } else {
            pattern.to_string()
        };

        pattern = pattern.replace('*', "(.+?)");
        pattern = pattern.replace('#', r"(\d+?)");
        pattern = pattern.replace('_', r"(\w+?)");
        pattern = RE_WEIGHT.replace_all(&pattern, "").into_owned();
        pattern = pattern.replace("<zerowidthstar>", "(.*?)");

        // Empty alternation entries would compile but match nothing useful.
        pattern = RE_PIPE_RUNS.replace_all(&pattern, "|").into_owned();
        pattern = RE_PIPE_AFTER_OPEN.replace_all(&pattern, "$1").into_owned();
        pattern = RE_PIPE_BEFORE_CLOSE
            .replace_all(&pattern, "$1")
            .into_owned();

        // Literal @ (an escaped e-mail address, say) must survive array
        // expansion in UTF-8 mode.
        if self.config.utf8 {
            pattern = pattern.replace("\\@", "\\u0040");
        }

        // Optionals: every alternative may be present with surrounding
        // space, or the whole group may be absent.
        let mut giveup = 0;
        while let Some(caps) = RE_OPTIONAL.captures(&pattern) {
            giveup += 1;
            if giveup > self.config.depth {
                warn!(username, "infinite loop expanding optionals");
                break;
            }
            let inner = caps[1].to_string();
            let alternatives: Vec<String> = inner
                .split('|')
                .map(|alt| format!(r"(?:\s|\b)+{}(?:\s|\b)+", alt))
                .collect();
            let mut pipes = alternatives.join("|");
            // Wildcards inside an optional must not capture.
            pipes = pipes.replace("(.+?)", "(?:.+?)");
            pipes = pipes.replace(r"(\d+?)", r"(?:\d+?)");
            pipes = pipes.replace(r"(\w+?)", r"(?:\w+?)");

            let group = format!(r"(?:{}|(?:\s|\b)+)", pipes);
            match Regex::new(&format!(r"\s*\[{}\]\s*", regex::escape(&inner))) {
                Ok(re) => pattern = re.replace_all(&pattern, NoExpand(&group)).into_owned(),
                Err(err) => {
                    warn!(username, "bad optional group: {}", err);
                    break;
                }
            }
        }

        // The `_` wildcard matches letters only, not digits; `\w` was just
        // a stand-in that won't confuse the optionals logic above.
        pattern = pattern.replace(r"\w", r"[^\s\d]");

        // Array references.
        let mut giveup = 0;
        while pattern.contains('@') {
            giveup += 1;
            if giveup > self.config.depth {
                warn!(username, "infinite loop expanding arrays");
                break;
            }
            let Some(caps) = RE_ARRAY.captures(&pattern) else {
                break;
            };
            let name = caps[1].to_string();
            let expansion = match self.array.get(&name) {
                Some(items) => format!("(?:{})", items.join("|")),
                None => String::new(),
            };
            pattern = pattern.replace(&format!("(@{})", name), &expansion);
        }

        // Bot variables; missing ones collapse to nothing.
        let mut giveup = 0;
        while pattern.contains("<bot") {
            giveup += 1;
            if giveup > self.config.depth {
                warn!(username, "infinite loop expanding bot variables");
                break;
            }
            let Some(caps) = RE_BOT_VAR.captures(&pattern) else {
                break;
            };
            let name = caps[1].to_string();
            let value = self
                .vars
                .read()
                .unwrap()
                .get(&name)
                .map(|value| strip_nasties(&value.to_lowercase()))
                .unwrap_or_default();
            pattern = pattern.replace(&format!("<bot {}>", name), &value);
        }

        // User variables; missing ones read as the undefined sentinel.
        let mut giveup = 0;
        while pattern.contains("<get") {
            giveup += 1;
            if giveup > self.config.depth {
                warn!(username, "infinite loop expanding user variables");
                break;
            }
            let Some(caps) = RE_USER_VAR.captures(&pattern) else {
                break;
            };
            let name = caps[1].to_string();
            let value = self
                .sessions
                .get(username, &name)
                .map(|value| value.to_lowercase())
                .unwrap_or_else(|| UNDEFINED.to_string());
            pattern = pattern.replace(&format!("<get {}>", name), &value);
        }

        // Input and reply history; unfilled slots read as "undefined".
        if pattern.contains("<input") || pattern.contains("<reply") {
            pattern = pattern.replace("<input>", "<input1>");
            pattern = pattern.replace("<reply>", "<reply1>");
            let history = self.sessions.history(username).unwrap_or_default();
            for i in 1..=HISTORY_SIZE {
                pattern = pattern.replace(
                    &format!("<input{}>", i),
                    &strip_nasties(&history.input[i - 1].to_lowercase()),
                );
                pattern = pattern.replace(
                    &format!("<reply{}>", i),
                    &strip_nasties(&history.reply[i - 1].to_lowercase()),
                );
            }
        }

        if self.config.utf8 {
            pattern = pattern.replace("\\u0040", "@");
        }

        pattern
    }
}

#[cfg(test)]
mod tests {
    use crate::Rivet;

    fn bot() -> Rivet {
        let mut bot = Rivet::new();
        bot.stream("! array colors = red green blue\n! var name = rivet bot")
            .unwrap();
        bot.sort_replies();
        bot
    }

    #[test]
    fn test_wildcards() {
        let bot = bot();
        assert_eq!(bot.trigger_regexp("user", "my name is *"), "my name is (.+?)");
        assert_eq!(bot.trigger_regexp("user", "i am # years old"), r"i am (\d+?) years old");
        assert_eq!(bot.trigger_regexp("user", "call me _"), r"call me ([^\s\d]+?)");
    }

    #[test]
    fn test_zero_width_star() {
        let bot = bot();
        assert_eq!(bot.trigger_regexp("user", "*"), "(.*?)");
        assert_eq!(bot.trigger_regexp("user", "hello *"), "hello (.+?)");
    }

    #[test]
    fn test_weight_stripped() {
        let bot = bot();
        assert_eq!(bot.trigger_regexp("user", "hello {weight=10}"), "hello");
    }

    #[test]
    fn test_optionals() {
        let bot = bot();
        let source = bot.trigger_regexp("user", "what is your [real] name");
        assert_eq!(
            source,
            r"what is your(?:(?:\s|\b)+real(?:\s|\b)+|(?:\s|\b)+)name"
        );
        let re = regex::Regex::new(&format!("^{}$", source)).unwrap();
        assert!(re.is_match("what is your real name"));
        assert!(re.is_match("what is your name"));
        assert!(!re.is_match("what is your fake name"));
    }

    #[test]
    fn test_optional_wildcard_does_not_capture() {
        let bot = bot();
        let source = bot.trigger_regexp("user", "tell me [about *] now");
        assert!(source.contains("(?:.+?)"));
        assert!(!source.contains("(.+?)"));
    }

    #[test]
    fn test_array_expansion() {
        let bot = bot();
        assert_eq!(
            bot.trigger_regexp("user", "i like (@colors)"),
            "i like (?:red|green|blue)"
        );
        // Unknown arrays expand to nothing.
        assert_eq!(bot.trigger_regexp("user", "i like (@shapes)"), "i like ");
    }

    #[test]
    fn test_bot_and_user_vars() {
        let bot = bot();
        assert_eq!(
            bot.trigger_regexp("user", "you are <bot name>"),
            "you are rivet bot"
        );
        assert_eq!(bot.trigger_regexp("user", "you are <bot motto>"), "you are ");

        bot.set_uservar("user", "name", "Alice");
        assert_eq!(bot.trigger_regexp("user", "i am <get name>"), "i am alice");
        assert_eq!(
            bot.trigger_regexp("user", "i am <get nothing>"),
            "i am undefined"
        );
    }

    #[test]
    fn test_history_expansion() {
        let bot = bot();
        assert_eq!(
            bot.trigger_regexp("user", "you said <reply1>"),
            "you said undefined"
        );
    }
}
