//! Reply template tag evaluation
//!
//! Tags expand in a fixed order: arrays, shortcut tags, stars and
//! history, `{random}`, string-format blocks, then an iterative pass
//! that always evaluates the innermost `<...>` tag first (so nestings
//! like `<set a=<get b>>` work), and finally topic setters, inline
//! redirects, and `<call>` macros.

use crate::patterns::{
    RE_ANY_TAG, RE_ARRAY, RE_CALL, RE_RANDOM, RE_REDIRECT, RE_TOPIC, RE_WEIGHT,
};
use crate::runtime::Rivet;
use crate::session::{HISTORY_SIZE, UNDEFINED};
use crate::text::{capitalize, formal};
use crate::{Result, RivetError};

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static RE_PERSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{person\}(.+?)\{/person\}").expect("person regex"));

static RE_FORMAL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{formal\}(.+?)\{/formal\}").expect("formal regex"));

static RE_SENTENCE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{sentence\}(.+?)\{/sentence\}").expect("sentence regex"));

static RE_UPPERCASE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{uppercase\}(.+?)\{/uppercase\}").expect("uppercase regex"));

static RE_LOWERCASE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{lowercase\}(.+?)\{/lowercase\}").expect("lowercase regex"));

impl Rivet {
    /// Expand every tag in a reply template
    pub(crate) fn process_tags(
        &self,
        username: &str,
        _message: &str,
        reply: &str,
        captured_stars: &[String],
        captured_botstars: &[String],
        step: usize,
    ) -> Result<String> {
        // Index 0 is a reserved sentinel; star 1 always exists.
        let mut stars: Vec<String> = vec![String::new()];
        stars.extend(captured_stars.iter().cloned());
        if stars.len() == 1 {
            stars.push(UNDEFINED.to_string());
        }
        let mut botstars: Vec<String> = vec![String::new()];
        botstars.extend(captured_botstars.iter().cloned());
        if botstars.len() == 1 {
            botstars.push(UNDEFINED.to_string());
        }

        let mut reply = reply.to_string();

        // Arrays in replies become random picks.
        let mut giveup = 0;
        while let Some(caps) = RE_ARRAY.captures(&reply) {
            giveup += 1;
            if giveup > self.config.depth {
                warn!("infinite loop expanding reply arrays");
                break;
            }
            let name = caps[1].to_string();
            let insert = match self.array.get(&name) {
                Some(items) => format!("{{random}}{}{{/random}}", items.join("|")),
                None => String::new(),
            };
            reply = reply.replace(&format!("(@{})", name), &insert);
        }

        // Legacy shortcuts expand to their block forms.
        reply = reply.replace("<person>", "{person}<star>{/person}");
        reply = reply.replace("<@>", "{@<star>}");
        reply = reply.replace("<formal>", "{formal}<star>{/formal}");
        reply = reply.replace("<sentence>", "{sentence}<star>{/sentence}");
        reply = reply.replace("<uppercase>", "{uppercase}<star>{/uppercase}");
        reply = reply.replace("<lowercase>", "{lowercase}<star>{/lowercase}");

        reply = RE_WEIGHT.replace_all(&reply, "").into_owned();

        // Stars.
        reply = reply.replace("<star>", &stars[1]);
        reply = reply.replace("<botstar>", &botstars[1]);
        for (i, star) in stars.iter().enumerate().skip(1) {
            reply = reply.replace(&format!("<star{}>", i), star);
        }
        for (i, star) in botstars.iter().enumerate().skip(1) {
            reply = reply.replace(&format!("<botstar{}>", i), star);
        }

        // History.
        reply = reply.replace("<input>", "<input1>");
        reply = reply.replace("<reply>", "<reply1>");
        if reply.contains("<input") || reply.contains("<reply") {
            let history = self.sessions.history(username).unwrap_or_default();
            for i in 1..=HISTORY_SIZE {
                reply = reply.replace(&format!("<input{}>", i), &history.input[i - 1]);
                reply = reply.replace(&format!("<reply{}>", i), &history.reply[i - 1]);
            }
        }

        // Identity and escape codes.
        reply = reply.replace("<id>", username);
        reply = reply.replace("\\s", " ");
        reply = reply.replace("\\n", "\n");
        reply = reply.replace("\\#", "#");

        // {random} picks.
        let mut giveup = 0;
        while let Some(caps) = RE_RANDOM.captures(&reply) {
            giveup += 1;
            if giveup > self.config.depth {
                warn!("infinite loop processing random blocks");
                break;
            }
            let text = caps[1].to_string();
            let options: Vec<&str> = if text.contains('|') {
                text.split('|').collect()
            } else {
                text.split(' ').collect()
            };
            let insert = if options.is_empty() {
                String::new()
            } else {
                options[self.random_index(options.len())].to_string()
            };
            reply = reply.replace(&format!("{{random}}{}{{/random}}", text), &insert);
        }

        // Person substitution and string formats.
        let formats: [(&str, &Regex); 5] = [
            ("person", &*RE_PERSON_BLOCK),
            ("formal", &*RE_FORMAL_BLOCK),
            ("sentence", &*RE_SENTENCE_BLOCK),
            ("uppercase", &*RE_UPPERCASE_BLOCK),
            ("lowercase", &*RE_LOWERCASE_BLOCK),
        ];
        for (name, block) in formats {
            let mut giveup = 0;
            while let Some(caps) = block.captures(&reply) {
                giveup += 1;
                if giveup > self.config.depth {
                    warn!(format = name, "infinite loop processing format blocks");
                    break;
                }
                let content = caps[1].to_string();
                let insert = match name {
                    "person" => self.substitute(&content, &self.person, &self.sorted.person),
                    "formal" => formal(&content),
                    "sentence" => capitalize(&content),
                    "uppercase" => content.to_uppercase(),
                    "lowercase" => content.to_lowercase(),
                    _ => content.clone(),
                };
                reply = reply.replace(
                    &format!("{{{0}}}{1}{{/{0}}}", name, content),
                    &insert,
                );
            }
        }

        // Iterative inner-tag evaluation. <call> bodies must wait until
        // their arguments are fully expanded, so they hide as braces.
        reply = reply.replace("<call>", "{__call__}");
        reply = reply.replace("</call>", "{/__call__}");

        let mut giveup = 0;
        while let Some(caps) = RE_ANY_TAG.captures(&reply) {
            giveup += 1;
            if giveup > self.config.depth {
                warn!("infinite loop evaluating inner tags");
                break;
            }
            let inside = caps[1].to_string();
            let mut parts = inside.split(' ');
            let tag = parts.next().unwrap_or("").to_lowercase();
            let data = parts.collect::<Vec<_>>().join(" ");
            let mut insert = String::new();

            match tag.as_str() {
                "bot" | "env" => {
                    let target = if tag == "bot" { &self.vars } else { &self.global };
                    match data.split_once('=') {
                        Some((name, value)) => {
                            target
                                .write()
                                .unwrap()
                                .insert(name.to_string(), value.to_string());
                        }
                        None => {
                            insert = target
                                .read()
                                .unwrap()
                                .get(&data)
                                .cloned()
                                .unwrap_or_else(|| UNDEFINED.to_string());
                        }
                    }
                }
                "set" => {
                    if let Some((name, value)) = data.split_once('=') {
                        self.sessions.set(username, name, Some(value.to_string()));
                    }
                }
                "get" => {
                    insert = self
                        .sessions
                        .get(username, &data)
                        .unwrap_or_else(|| UNDEFINED.to_string());
                }
                "add" | "sub" | "mult" | "div" => {
                    insert = self.math_tag(username, &tag, &data)?;
                }
                _ => {
                    // Unknown tag; escape it so it survives to the output.
                    insert = format!("\x00{}\x01", inside);
                }
            }
            reply = reply.replace(&format!("<{}>", inside), &insert);
        }

        // Restore escaped unknown tags.
        reply = reply.replace('\x00', "<");
        reply = reply.replace('\x01', ">");

        // Topic setter.
        let mut giveup = 0;
        while let Some(caps) = RE_TOPIC.captures(&reply) {
            giveup += 1;
            if giveup > self.config.depth {
                warn!("infinite loop processing topic tags");
                break;
            }
            let name = caps[1].to_string();
            self.sessions.set(username, "topic", Some(name.clone()));
            reply = reply.replace(&format!("{{topic={}}}", name), "");
        }

        // Inline redirects splice a whole sub-reply in.
        let mut giveup = 0;
        while let Some(caps) = RE_REDIRECT.captures(&reply) {
            giveup += 1;
            if giveup > self.config.depth {
                warn!("infinite loop processing inline redirects");
                break;
            }
            let raw = caps[1].to_string();
            let target = raw.trim().to_string();
            debug!(target = target.as_str(), "inline redirection");
            let sub_reply = self.get_reply(username, &target, false, step + 1)?;
            reply = reply.replace(&format!("{{@{}}}", raw), &sub_reply);
        }

        // Object macro calls run last, on fully expanded arguments.
        reply = reply.replace("{__call__}", "<call>");
        reply = reply.replace("{/__call__}", "</call>");
        let mut giveup = 0;
        while let Some(caps) = RE_CALL.captures(&reply) {
            giveup += 1;
            if giveup > self.config.depth {
                warn!("infinite loop processing call tags");
                break;
            }
            let text = caps[1].to_string();
            let output = self.call_macro(&text)?;
            reply = reply.replace(&format!("<call>{}</call>", text), &output);
        }

        Ok(reply)
    }

    /// Run one `<add|sub|mult|div name=value>` tag
    ///
    /// Returns the text to splice in: empty on success, an error string
    /// (or raised error) on failure.
    fn math_tag(&self, username: &str, op: &str, data: &str) -> Result<String> {
        let Some((name, value)) = data.split_once('=') else {
            return Ok(String::new());
        };

        let value: i64 = match value.trim().parse() {
            Ok(value) => value,
            Err(_) => return self.error_reply(RivetError::MathValue(value.to_string())),
        };
        let current = self
            .sessions
            .get(username, name)
            .unwrap_or_else(|| "0".to_string());
        let current: i64 = match current.parse() {
            Ok(current) => current,
            Err(_) => return self.error_reply(RivetError::MathVariable(name.to_string())),
        };

        let result = match op {
            "add" => current + value,
            "sub" => current - value,
            "mult" => current * value,
            "div" => {
                if value == 0 {
                    return self.error_reply(RivetError::DivideByZero);
                }
                current / value
            }
            _ => current,
        };
        self.sessions.set(username, name, Some(result.to_string()));
        Ok(String::new())
    }

    /// Dispatch a `<call>` body to a subroutine or language handler
    fn call_macro(&self, text: &str) -> Result<String> {
        let mut args = parse_call_args(text.trim());
        if args.is_empty() {
            return self.error_reply(RivetError::ObjectNotFound(String::new()));
        }
        let name = args.remove(0);

        // Native subroutines take precedence over language handlers.
        if let Some(subroutine) = self.subroutines.get(&name) {
            return Ok(subroutine(self, &args));
        }
        if let Some(language) = self.objlangs.get(&name) {
            if let Some(handler) = self.handlers.get(language) {
                return match handler.call(self, &name, &args) {
                    Ok(output) => Ok(output),
                    Err(err) => {
                        warn!(name = name.as_str(), "object macro failed: {}", err);
                        Ok(String::new())
                    }
                };
            }
        }
        self.error_reply(RivetError::ObjectNotFound(name))
    }
}

/// Split `<call>` arguments on whitespace, honoring double quotes
///
/// Quotes delimit a single argument and are consumed; an unbalanced
/// quote swallows the rest of the string.
fn parse_call_args(text: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut buffer = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        if ch.is_whitespace() && !in_quotes {
            if !buffer.is_empty() {
                args.push(std::mem::take(&mut buffer));
            }
        } else if ch == '"' {
            if in_quotes && !buffer.is_empty() {
                args.push(std::mem::take(&mut buffer));
            }
            in_quotes = !in_quotes;
        } else {
            buffer.push(ch);
        }
    }
    if !buffer.is_empty() {
        args.push(buffer);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::parse_call_args;
    use crate::Rivet;

    fn bot(script: &str) -> Rivet {
        let mut bot = Rivet::new().with_seed(11);
        bot.stream(script).unwrap();
        bot.sort_replies();
        bot
    }

    #[test]
    fn test_parse_call_args() {
        assert_eq!(parse_call_args("upper hello"), vec!["upper", "hello"]);
        assert_eq!(
            parse_call_args(r#"send "hello there" now"#),
            vec!["send", "hello there", "now"]
        );
        assert_eq!(
            parse_call_args(r#"send "unterminated rest"#),
            vec!["send", "unterminated rest"]
        );
    }

    #[test]
    fn test_nested_set_get() {
        let bot = bot(
            "+ copy name\n- <set copy=<get name>>copied\n\
             + my name is *\n- <set name=<star>>ok",
        );
        assert_eq!(bot.reply("user", "my name is alice").unwrap(), "ok");
        assert_eq!(bot.reply("user", "copy name").unwrap(), "copied");
        assert_eq!(bot.get_uservar("user", "copy").as_deref(), Some("alice"));
    }

    #[test]
    fn test_bot_and_env_tags() {
        let bot = bot("+ who are you\n- i am <bot name>, env is <env mode>");
        bot.set_variable("name", "rivet");
        bot.set_global("mode", "test");
        assert_eq!(
            bot.reply("user", "who are you").unwrap(),
            "i am rivet, env is test"
        );
    }

    #[test]
    fn test_bot_tag_assignment() {
        let bot = bot("+ rename yourself *\n- <bot name=<star>>done");
        bot.reply("user", "rename yourself iris").unwrap();
        assert_eq!(bot.get_variable("name").as_deref(), Some("iris"));
    }

    #[test]
    fn test_formal_and_sentence_blocks() {
        let bot = bot(
            "+ formal *\n- {formal}<star>{/formal}\n\
             + describe *\n- {sentence}<star>{/sentence}",
        );
        assert_eq!(
            bot.reply("user", "formal alice smith").unwrap(),
            "Alice Smith"
        );
        assert_eq!(
            bot.reply("user", "describe something nice").unwrap(),
            "Something nice"
        );
    }

    #[test]
    fn test_person_substitution() {
        let bot = bot(
            "! person i am = you are\n! person you are = i am\n\
             + say *\n- <person>",
        );
        assert_eq!(
            bot.reply("user", "say i am happy").unwrap(),
            "you are happy"
        );
    }

    #[test]
    fn test_random_block_stable_under_seed() {
        let bot = bot("+ greet\n- {random}hi|hello|hey{/random} there");
        let reply = bot.reply("user", "greet").unwrap();
        assert!(["hi there", "hello there", "hey there"].contains(&reply.as_str()));
    }

    #[test]
    fn test_math_errors() {
        let bot = bot(
            "+ divide by zero\n- <div count=0>done\n\
             + add junk\n- <add count=x>done\n\
             + break variable\n- <set count=abc><add count=1>done",
        );
        assert_eq!(
            bot.reply("user", "divide by zero").unwrap(),
            "[ERR: Can't Divide By Zero]done"
        );
        assert_eq!(
            bot.reply("user", "add junk").unwrap(),
            "[ERR: Can't Perform Math Operation With Non-Numeric Value]done"
        );
        assert_eq!(
            bot.reply("user", "break variable").unwrap(),
            "[ERR: Can't Perform Math Operation On Non-Numeric Variable]done"
        );
    }

    #[test]
    fn test_unknown_call_target() {
        let bot = bot("+ run\n- <call>nothing</call>");
        assert_eq!(bot.reply("user", "run").unwrap(), "[ERR: Object Not Found]");
    }

    #[test]
    fn test_subroutine_beats_handler_name() {
        struct NullHandler;
        impl crate::ObjectHandler for NullHandler {
            fn load(&mut self, _name: &str, _code: &[String]) -> crate::Result<()> {
                Ok(())
            }
            fn call(
                &self,
                _rivet: &Rivet,
                _name: &str,
                _args: &[String],
            ) -> crate::Result<String> {
                Ok("handler".into())
            }
        }

        let mut bot = Rivet::new();
        bot.set_handler("js", Box::new(NullHandler));
        bot.set_subroutine("greet", |_rivet: &Rivet, _args: &[String]| {
            "subroutine".to_string()
        });
        bot.stream("> object greet js\nreturn 'handler'\n< object\n+ run\n- <call>greet</call>")
            .unwrap();
        bot.sort_replies();
        assert_eq!(bot.reply("user", "run").unwrap(), "subroutine");
    }

    #[test]
    fn test_quoted_call_args() {
        let mut bot = Rivet::new();
        bot.set_subroutine("count", |_rivet: &Rivet, args: &[String]| {
            args.len().to_string()
        });
        bot.stream("+ count words\n- <call>count one \"two three\" four</call>")
            .unwrap();
        bot.sort_replies();
        assert_eq!(bot.reply("user", "count words").unwrap(), "3");
    }

    #[test]
    fn test_inline_redirect() {
        let bot = bot("+ hello\n- hi there\n+ greet me\n- well, {@hello}");
        assert_eq!(bot.reply("user", "greet me").unwrap(), "well, hi there");
    }

    #[test]
    fn test_escape_codes_and_id() {
        let bot = bot("+ who am i\n- you\\sare\\s<id>");
        assert_eq!(bot.reply("alice", "who am i").unwrap(), "you are alice");
    }

    #[test]
    fn test_array_in_reply() {
        let bot = bot("! array yes = yeah yep\n+ confirm\n- (@yes)");
        let reply = bot.reply("user", "confirm").unwrap();
        assert!(["yeah", "yep"].contains(&reply.as_str()));
    }
}
