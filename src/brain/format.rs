//! Message formatting and the substitution engine

use crate::config::MorphemeMode;
use crate::patterns::{RE_META, RE_PLACEHOLDER, RE_SYMBOLS};
use crate::runtime::Rivet;
use crate::text::{collapse_ws, strip_nasties};

use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

impl Rivet {
    /// Normalize a message the way triggers expect to see it
    ///
    /// Both the user's input and (for `%Previous` matching) the bot's
    /// last reply go through here, so matching is case- and
    /// punctuation-blind. The result is idempotent.
    pub(crate) fn format_message(&self, message: &str, bot_reply: bool) -> String {
        let mut message = message.to_string();

        if self.config.morpheme == MorphemeMode::Separation {
            if let Some(preprocessor) = &self.preprocessor {
                message = preprocessor.analyze(&message);
            }
        }

        message = message.to_lowercase();
        message = self.substitute(&message, &self.sub, &self.sorted.sub);

        if self.config.utf8 {
            message = RE_META.replace_all(&message, "").into_owned();
            message = self
                .config
                .unicode_punctuation
                .replace_all(&message, "")
                .into_owned();
            if bot_reply {
                message = RE_SYMBOLS.replace_all(&message, "").into_owned();
            }
        } else {
            message = strip_nasties(&message);
        }

        collapse_ws(&message)
    }

    /// Replace whole-word occurrences of each key with its value
    ///
    /// Keys are visited in the sorted (longest-first) order and each hit
    /// becomes a numeric placeholder first, so a substitution's output
    /// can never be re-substituted by a later key.
    pub(crate) fn substitute(
        &self,
        message: &str,
        map: &HashMap<String, String>,
        sorted: &[String],
    ) -> String {
        if map.is_empty() {
            return message.to_string();
        }

        let mut values: Vec<&String> = Vec::new();
        let mut message = message.to_string();

        for key in sorted {
            let Some(value) = map.get(key) else { continue };
            let quoted = regex::escape(key);
            let placeholder = format!("\x00{}\x00", values.len());
            values.push(value);

            // Word boundaries are the string ends or non-word characters
            // on both sides.
            let rules = [
                (format!("^{}$", quoted), placeholder.clone()),
                (format!(r"^{}(\W+)", quoted), format!("{}$1", placeholder)),
                (
                    format!(r"(\W+){}(\W+)", quoted),
                    format!("${{1}}{}$2", placeholder),
                ),
                (format!(r"(\W+){}$", quoted), format!("${{1}}{}", placeholder)),
            ];
            for (pattern, replacement) in rules {
                match Regex::new(&pattern) {
                    Ok(re) => {
                        message = re.replace_all(&message, replacement.as_str()).into_owned();
                    }
                    Err(err) => warn!(key, "bad substitution pattern: {}", err),
                }
            }
        }

        // Resolve placeholders; bounded in case a value itself contains
        // placeholder bytes.
        let mut tries = 0;
        while message.contains('\x00') {
            tries += 1;
            if tries > self.config.depth {
                warn!("deep recursion resolving substitution placeholders");
                break;
            }
            let Some(caps) = RE_PLACEHOLDER.captures(&message) else {
                break;
            };
            let index: usize = caps[1].parse().unwrap_or(0);
            let value = values.get(index).map(|s| s.as_str()).unwrap_or_default();
            message = message.replace(&format!("\x00{}\x00", index), value);
        }

        message
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::Rivet;

    fn bot_with_subs() -> Rivet {
        let mut bot = Rivet::new();
        bot.stream(
            "! sub what's = what is\n\
             ! sub whats = what is\n\
             ! sub u = you",
        )
        .unwrap();
        bot.sort_replies();
        bot
    }

    #[test]
    fn test_format_basic() {
        let bot = bot_with_subs();
        assert_eq!(bot.format_message("Hello,   Bot!", false), "hello bot");
    }

    #[test]
    fn test_format_applies_substitutions() {
        let bot = bot_with_subs();
        assert_eq!(
            bot.format_message("What's  your name", false),
            "what is your name"
        );
        // Whole words only: 'u' must not fire inside 'up'.
        assert_eq!(bot.format_message("wake up u", false), "wake up you");
    }

    #[test]
    fn test_substituted_text_not_resubstituted() {
        let mut bot = Rivet::new();
        bot.stream("! sub a = b\n! sub b = c").unwrap();
        bot.sort_replies();
        assert_eq!(bot.format_message("a b", false), "b c");
    }

    #[test]
    fn test_format_idempotent() {
        let bot = bot_with_subs();
        let once = bot.format_message("What's Up, U?!", false);
        assert_eq!(bot.format_message(&once, false), once);
    }

    #[test]
    fn test_utf8_keeps_unicode_strips_punctuation() {
        let mut bot = Rivet::with_config(Config::default().with_utf8(true));
        bot.stream("+ hola\n- hi").unwrap();
        bot.sort_replies();
        assert_eq!(bot.format_message("¿Hola, señor?", false), "¿hola señor");
    }
}
