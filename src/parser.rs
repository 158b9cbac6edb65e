//! Script parser: source lines in, [`Root`] AST out
//!
//! The parser is line oriented. Each line's first non-space character is
//! the command; the rest is its payload. Continuations (`^`) and previous
//! constraints (`%`) are consumed by looking ahead from the line they
//! extend, so the main loop can treat them as no-ops.
//!
//! In strict mode the first syntax error aborts the parse; otherwise the
//! offending line is logged and skipped.

use crate::ast::{ObjectMacro, Root, Trigger};
use crate::config::{ConcatMode, Config, MorphemeMode, RS_VERSION};
use crate::morpheme::Preprocessor;
use crate::{Result, RivetError};

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::warn;

/// Value that deletes a definition instead of setting it
const UNDEF_TAG: &str = "<undef>";

static RE_DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(version|local|global|var|array|sub|person)(\s+.+?)?\s*=\s*.+$")
        .expect("define regex")
});

static RE_TOPIC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_\-\s]").expect("topic-name regex"));

static RE_TOPIC_NAME_ANY_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-\s]").expect("topic-name regex"));

static RE_OBJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-\s]").expect("object-name regex"));

static RE_TRIGGER_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9(|)\[\]*_#@{}<>=/\s]").expect("trigger-chars regex"));

static RE_TRIGGER_UTF8_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z\\.]").expect("utf8-trigger regex"));

static RE_EMPTY_PIPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*\||\|\s*\)|\[\s*\||\|\s*\]|\|\s*\|").expect("empty-pipe regex")
});

static RE_CONDITION_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.+?\s*(==|eq|!=|ne|<>|<=|>=|<|>)\s*.+?=>.+?$").expect("condition-shape regex")
});

/// One parse pass over a single document
pub struct Parser<'a> {
    config: &'a Config,
    preprocessor: Option<&'a dyn Preprocessor>,
}

impl<'a> Parser<'a> {
    pub fn new(config: &'a Config, preprocessor: Option<&'a dyn Preprocessor>) -> Self {
        Self {
            config,
            preprocessor,
        }
    }

    /// Parse source lines into an AST
    ///
    /// `filename` is only a label for diagnostics.
    pub fn parse(&self, filename: &str, lines: &[&str]) -> Result<Root> {
        let mut ast = Root::new();

        // Parser state
        let mut topic = String::from("random");
        let mut in_comment = false;
        let mut in_object = false;
        let mut obj_name = String::new();
        let mut obj_lang = String::new();
        let mut obj_buffer: Vec<String> = Vec::new();
        let mut cur_trigger: Option<Trigger> = None;
        let mut is_that: Option<String> = None;
        let mut local_options: HashMap<String, String> = HashMap::new();

        for lp in 0..lines.len() {
            let lineno = lp + 1;
            let raw = lines[lp];
            let mut line = raw.trim().to_string();

            // Object macro bodies are delivered verbatim until the end tag.
            if in_object {
                if line.contains("< object") || line.contains("<object") {
                    if !obj_name.is_empty() && !obj_lang.is_empty() {
                        ast.objects.push(ObjectMacro {
                            name: obj_name.clone(),
                            language: obj_lang.clone(),
                            code: obj_buffer.clone(),
                        });
                    }
                    obj_name.clear();
                    obj_lang.clear();
                    obj_buffer.clear();
                    in_object = false;
                } else {
                    obj_buffer.push(raw.to_string());
                }
                continue;
            }

            if line.is_empty() {
                continue;
            }

            // Comments.
            if line.starts_with("//") {
                continue;
            }
            if line.starts_with("/*") {
                if !line.contains("*/") {
                    in_comment = true;
                }
                continue;
            }
            if line.contains("*/") {
                in_comment = false;
                continue;
            }
            if in_comment {
                continue;
            }

            if line.len() < 2 {
                warn!(file = filename, line = lineno, "weird single-character line");
                continue;
            }

            let cmd = line.remove(0);
            let mut line = line.trim().to_string();

            // Inline comments.
            if let Some(idx) = line.find(" // ") {
                line.truncate(idx);
                line = line.trim_end().to_string();
            }

            // Morpheme separation applies to trigger patterns before
            // anything else looks at them.
            if cmd == '+' && self.config.morpheme == MorphemeMode::Separation {
                if let Some(pre) = self.preprocessor {
                    line = pre.analyze(&line);
                }
            }
            if cmd == '+' && self.config.force_case {
                line = line.to_lowercase();
            }

            if let Err(message) = self.check_syntax(cmd, &line) {
                if self.config.strict {
                    return Err(RivetError::Parse {
                        file: filename.to_string(),
                        line: lineno,
                        message,
                    });
                }
                warn!(file = filename, line = lineno, "{}", message);
                continue;
            }

            // Look ahead to absorb %Previous and ^Continue lines.
            if cmd != '^' {
                if cmd == '+' {
                    is_that = None;
                }
                for look in &lines[lp + 1..] {
                    let look = look.trim();
                    if look.len() < 2 {
                        continue;
                    }
                    let Some(look_cmd) = look.chars().next() else {
                        continue;
                    };
                    let look_line = look[look_cmd.len_utf8()..].trim();
                    if look_line.is_empty() {
                        continue;
                    }
                    if look_cmd != '^' && look_cmd != '%' {
                        break;
                    }

                    if cmd == '+' {
                        if look_cmd == '%' {
                            is_that = Some(look_line.to_string());
                            break;
                        }
                        is_that = None;
                    }

                    if cmd == '!' {
                        if look_cmd == '^' {
                            line.push_str("<crlf>");
                            line.push_str(look_line);
                        }
                        continue;
                    }

                    if look_cmd == '^' {
                        let concat = local_options
                            .get("concat")
                            .and_then(|name| ConcatMode::from_name(name))
                            .unwrap_or(self.config.concat);
                        line.push_str(concat.separator());
                        line.push_str(look_line);
                    }
                }
            }

            match cmd {
                '!' => {
                    if let Err(message) = self.handle_define(&mut ast, &mut local_options, &line) {
                        if self.config.strict {
                            return Err(RivetError::Parse {
                                file: filename.to_string(),
                                line: lineno,
                                message,
                            });
                        }
                        warn!(file = filename, line = lineno, "{}", message);
                    }
                }
                '>' => {
                    let mut fields = line.split_whitespace();
                    let kind = fields.next().unwrap_or("");
                    let mut name = fields.next().unwrap_or("").to_string();
                    let rest: Vec<&str> = fields.collect();

                    let kind = if kind == "begin" {
                        name = "__begin__".into();
                        "topic"
                    } else {
                        kind
                    };

                    match kind {
                        "topic" => {
                            if self.config.force_case {
                                name = name.to_lowercase();
                            }
                            flush_trigger(&mut ast, &topic, &mut cur_trigger);
                            topic = name.clone();
                            ast.topic(&topic);

                            // `includes`/`inherits` toggle which set the
                            // following topic names land in.
                            let mut mode = "";
                            for field in rest {
                                if field == "includes" || field == "inherits" {
                                    mode = field;
                                } else if mode == "includes" {
                                    ast.topic(&topic).includes.insert(field.to_string());
                                } else if mode == "inherits" {
                                    ast.topic(&topic).inherits.insert(field.to_string());
                                }
                            }
                        }
                        "object" => {
                            let lang = rest.first().map(|l| l.to_lowercase()).unwrap_or_default();
                            if lang.is_empty() {
                                warn!(
                                    file = filename,
                                    line = lineno,
                                    "no programming language specified for object '{}'",
                                    name
                                );
                            }
                            obj_name = name;
                            obj_lang = lang;
                            obj_buffer.clear();
                            in_object = true;
                        }
                        _ => {
                            warn!(file = filename, line = lineno, "unknown label type '{}'", kind);
                        }
                    }
                }
                '<' => {
                    if line == "begin" || line == "topic" {
                        flush_trigger(&mut ast, &topic, &mut cur_trigger);
                        topic = "random".into();
                    }
                    // `< object` is caught by the object-body branch above.
                }
                '+' => {
                    flush_trigger(&mut ast, &topic, &mut cur_trigger);
                    cur_trigger = Some(Trigger {
                        pattern: line,
                        previous: is_that.take(),
                        ..Default::default()
                    });
                }
                '-' => match cur_trigger.as_mut() {
                    None => {
                        self.line_error(filename, lineno, "response found before trigger")?;
                    }
                    Some(trigger) if trigger.redirect.is_some() => {
                        self.line_error(filename, lineno, "response on a redirected trigger")?;
                    }
                    Some(trigger) => trigger.reply.push(line),
                },
                '*' => match cur_trigger.as_mut() {
                    None => {
                        self.line_error(filename, lineno, "condition found before trigger")?;
                    }
                    Some(trigger) => trigger.condition.push(line),
                },
                '@' => match cur_trigger.as_mut() {
                    None => {
                        self.line_error(filename, lineno, "redirect found before trigger")?;
                    }
                    Some(trigger) if !trigger.reply.is_empty() => {
                        self.line_error(filename, lineno, "redirect on a trigger with replies")?;
                    }
                    Some(trigger) => trigger.redirect = Some(line),
                },
                '%' | '^' => {
                    // Consumed by the look-ahead pass.
                }
                _ => {
                    warn!(file = filename, line = lineno, "unknown command '{}'", cmd);
                }
            }
        }

        flush_trigger(&mut ast, &topic, &mut cur_trigger);
        Ok(ast)
    }

    /// Handle a `! KIND NAME = VALUE` definition
    fn handle_define(
        &self,
        ast: &mut Root,
        local_options: &mut HashMap<String, String>,
        line: &str,
    ) -> std::result::Result<(), String> {
        let (left, value) = match line.split_once('=') {
            Some((left, value)) => (left.trim(), value.trim().to_string()),
            None => (line.trim(), String::new()),
        };
        let mut parts = left.split_whitespace();
        let kind = parts.next().unwrap_or("");
        let name = parts.collect::<Vec<_>>().join(" ");

        // Fake line breaks only mean something to arrays.
        let value = if kind == "array" {
            value
        } else {
            value.replace("<crlf>", "")
        };

        if kind == "version" {
            let version: f64 = value
                .parse()
                .map_err(|_| format!("can't parse script version '{}'", value))?;
            if version > RS_VERSION {
                return Err(format!(
                    "script version {} is newer than supported version {}",
                    version, RS_VERSION
                ));
            }
            return Ok(());
        }

        if name.is_empty() {
            return Err("undefined variable name".into());
        }
        if value.is_empty() {
            return Err("undefined variable value".into());
        }

        match kind {
            "local" => {
                local_options.insert(name, value);
            }
            "global" => set_or_undef(&mut ast.begin.global, &name, value),
            "var" => set_or_undef(&mut ast.begin.var, &name, value),
            "sub" => set_or_undef(&mut ast.begin.sub, &name, value),
            "person" => set_or_undef(&mut ast.begin.person, &name, value),
            "array" => {
                if value == UNDEF_TAG {
                    ast.begin.array.remove(&name);
                } else {
                    let mut fields: Vec<String> = Vec::new();
                    for part in value.split("<crlf>") {
                        if part.contains('|') {
                            fields.extend(part.split('|').map(str::to_string));
                        } else {
                            fields.extend(part.split_whitespace().map(str::to_string));
                        }
                    }
                    for field in &mut fields {
                        *field = field.replace("\\s", " ");
                    }
                    ast.begin.array.insert(name, fields);
                }
            }
            _ => return Err(format!("unknown definition type '{}'", kind)),
        }
        Ok(())
    }

    /// Validate one line's shape; returns a human-readable complaint
    fn check_syntax(&self, cmd: char, line: &str) -> std::result::Result<(), String> {
        match cmd {
            '!' => {
                if !RE_DEFINE.is_match(line) {
                    return Err(
                        "invalid format for !Definition line: must be '! type name = value' or \
                         '! type = value'"
                            .into(),
                    );
                }
                if line.starts_with("array") {
                    if let Some((_, value)) = line.split_once('=') {
                        let value = value.trim();
                        if value.starts_with('|') || value.ends_with('|') {
                            return Err("piped arrays can't begin or end with a |".into());
                        }
                        if value.contains("||") {
                            return Err("piped arrays can't include blank entries".into());
                        }
                    }
                }
            }
            '>' => {
                let mut parts = line.split_whitespace();
                match parts.next() {
                    Some("begin") => {
                        if parts.next().is_some() {
                            return Err("the 'begin' label takes no additional arguments".into());
                        }
                    }
                    Some("topic") => {
                        let names = &line["topic".len()..];
                        let validator = if self.config.force_case {
                            &*RE_TOPIC_NAME_ANY_CASE
                        } else {
                            &*RE_TOPIC_NAME
                        };
                        if validator.is_match(names) {
                            return Err("topics should be lowercased and contain only letters, \
                                        numbers, - and _"
                                .into());
                        }
                    }
                    Some("object") => {
                        if RE_OBJECT_NAME.is_match(&line["object".len()..]) {
                            return Err(
                                "objects can only contain letters, numbers, - and _".into()
                            );
                        }
                    }
                    _ => return Err("unknown label type".into()),
                }
            }
            '+' | '%' | '@' => {
                if self.config.utf8 {
                    if RE_TRIGGER_UTF8_FORBIDDEN.is_match(line) {
                        return Err("triggers can't contain uppercase letters, backslashes or \
                                    dots in UTF-8 mode"
                            .into());
                    }
                } else if RE_TRIGGER_CHARS.is_match(line) {
                    return Err("triggers may only contain lowercase letters, numbers, and \
                                these symbols: ( | ) [ ] * _ # @ { } < > = /"
                        .into());
                }
                if RE_EMPTY_PIPE.is_match(line) {
                    return Err("pipes can't be empty or adjacent to brackets".into());
                }
                let mut parens = 0i32;
                let mut square = 0i32;
                let mut curly = 0i32;
                let mut angle = 0i32;
                for ch in line.chars() {
                    match ch {
                        '(' => parens += 1,
                        ')' => parens -= 1,
                        '[' => square += 1,
                        ']' => square -= 1,
                        '{' => curly += 1,
                        '}' => curly -= 1,
                        '<' => angle += 1,
                        '>' => angle -= 1,
                        _ => {}
                    }
                }
                if parens != 0 {
                    return Err("unmatched parenthesis brackets".into());
                }
                if square != 0 {
                    return Err("unmatched square brackets".into());
                }
                if curly != 0 {
                    return Err("unmatched curly brackets".into());
                }
                if angle != 0 {
                    return Err("unmatched angle brackets".into());
                }
            }
            '*' => {
                if !RE_CONDITION_SHAPE.is_match(line) {
                    return Err(
                        "invalid format for !Condition: should be like '* value symbol value \
                         => response'"
                            .into(),
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Report a structural error on a line; fatal in strict mode
    fn line_error(&self, filename: &str, lineno: usize, message: &str) -> Result<()> {
        if self.config.strict {
            return Err(RivetError::Parse {
                file: filename.to_string(),
                line: lineno,
                message: message.to_string(),
            });
        }
        warn!(file = filename, line = lineno, "{}", message);
        Ok(())
    }
}

/// Move the trigger under construction into its topic
fn flush_trigger(ast: &mut Root, topic: &str, cur: &mut Option<Trigger>) {
    if let Some(trigger) = cur.take() {
        ast.topic(topic).triggers.push(Arc::new(trigger));
    }
}

fn set_or_undef(map: &mut HashMap<String, String>, name: &str, value: String) {
    if value == UNDEF_TAG {
        map.remove(name);
    } else {
        map.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(script: &str) -> Root {
        let config = Config::default();
        let parser = Parser::new(&config, None);
        let lines: Vec<&str> = script.lines().collect();
        parser.parse("test.rive", &lines).unwrap()
    }

    fn parse_err(script: &str) -> RivetError {
        let config = Config::default();
        let parser = Parser::new(&config, None);
        let lines: Vec<&str> = script.lines().collect();
        parser.parse("test.rive", &lines).unwrap_err()
    }

    #[test]
    fn test_basic_trigger() {
        let ast = parse("+ hello bot\n- hello human");
        let topic = &ast.topics["random"];
        assert_eq!(topic.triggers.len(), 1);
        assert_eq!(topic.triggers[0].pattern, "hello bot");
        assert_eq!(topic.triggers[0].reply, vec!["hello human"]);
    }

    #[test]
    fn test_defines() {
        let ast = parse(
            "! version = 2.0\n\
             ! var name = Rivet\n\
             ! sub what's = what is\n\
             ! array colors = red green blue\n\
             ! array sizes = small|medium large|huge",
        );
        assert_eq!(ast.begin.var["name"], "Rivet");
        assert_eq!(ast.begin.sub["what's"], "what is");
        assert_eq!(
            ast.begin.array["colors"],
            vec!["red", "green", "blue"]
        );
        assert_eq!(
            ast.begin.array["sizes"],
            vec!["small", "medium large", "huge"]
        );
    }

    #[test]
    fn test_array_continuation_and_space_escape() {
        let ast = parse("! array greek = alpha beta\n^ gamma|delta\\sprime");
        assert_eq!(
            ast.begin.array["greek"],
            vec!["alpha", "beta", "gamma", "delta prime"]
        );
    }

    #[test]
    fn test_version_too_new() {
        let err = parse_err("! version = 2.1");
        assert!(matches!(err, RivetError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_topic_includes_inherits() {
        let ast = parse(
            "> topic child includes aux inherits parent base\n\
             + hello\n\
             - hi\n\
             < topic",
        );
        let child = &ast.topics["child"];
        assert!(child.includes.contains("aux"));
        assert!(child.inherits.contains("parent"));
        assert!(child.inherits.contains("base"));
        assert_eq!(child.triggers.len(), 1);
    }

    #[test]
    fn test_begin_block_is_special_topic() {
        let ast = parse("> begin\n+ request\n- {ok}\n< begin");
        assert_eq!(ast.topics["__begin__"].triggers[0].pattern, "request");
    }

    #[test]
    fn test_previous_lookahead() {
        let ast = parse(
            "+ knock knock\n\
             - who is there\n\
             + *\n\
             % who is there\n\
             - <star> who",
        );
        let topic = &ast.topics["random"];
        assert_eq!(topic.triggers.len(), 2);
        assert_eq!(topic.triggers[0].previous, None);
        assert_eq!(topic.triggers[1].previous.as_deref(), Some("who is there"));
    }

    #[test]
    fn test_continuation_concat_modes() {
        let config = Config::default().with_concat(ConcatMode::Space);
        let parser = Parser::new(&config, None);
        let lines = vec!["+ hello robot", "- Hello", "^ there."];
        let ast = parser.parse("test.rive", &lines).unwrap();
        assert_eq!(ast.topics["random"].triggers[0].reply[0], "Hello there.");
    }

    #[test]
    fn test_local_concat_overrides_config() {
        let ast = parse("! local concat = newline\n+ hi\n- line one\n^ line two");
        assert_eq!(
            ast.topics["random"].triggers[0].reply[0],
            "line one\nline two"
        );
    }

    #[test]
    fn test_object_macro_body() {
        let ast = parse(
            "> object upper js\n\
             var text = args.join(' ')\n\
             return text.toUpperCase()\n\
             < object",
        );
        assert_eq!(ast.objects.len(), 1);
        assert_eq!(ast.objects[0].name, "upper");
        assert_eq!(ast.objects[0].language, "js");
        assert_eq!(ast.objects[0].code.len(), 2);
    }

    #[test]
    fn test_comments() {
        let ast = parse(
            "// a line comment\n\
             /* a block\n\
             comment */\n\
             + hello // inline comment\n\
             - hi",
        );
        assert_eq!(ast.topics["random"].triggers[0].pattern, "hello");
    }

    #[test]
    fn test_redirect_and_reply_conflict() {
        let err = parse_err("+ hey\n@ hello\n- nope");
        assert!(matches!(err, RivetError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_response_before_trigger() {
        assert!(matches!(
            parse_err("- orphan reply"),
            RivetError::Parse { line: 1, .. }
        ));
    }

    #[test]
    fn test_strict_rejects_uppercase_trigger() {
        assert!(matches!(
            parse_err("+ Hello Bot\n- hi"),
            RivetError::Parse { .. }
        ));
    }

    #[test]
    fn test_strict_rejects_unbalanced_brackets() {
        assert!(matches!(
            parse_err("+ hello [bot\n- hi"),
            RivetError::Parse { .. }
        ));
    }

    #[test]
    fn test_non_strict_skips_bad_lines() {
        let config = Config::default().with_strict(false);
        let parser = Parser::new(&config, None);
        let lines = vec!["+ Hello Bot", "- hi", "+ hello", "- hello there"];
        let ast = parser.parse("test.rive", &lines).unwrap();
        // The uppercase trigger was dropped; its reply became an orphan and
        // was skipped too.
        assert_eq!(ast.topics["random"].triggers.len(), 1);
        assert_eq!(ast.topics["random"].triggers[0].pattern, "hello");
    }

    #[test]
    fn test_force_case_lowercases_triggers() {
        let config = Config::default().with_force_case(true);
        let parser = Parser::new(&config, None);
        let lines = vec!["+ Hello Bot", "- hi"];
        let ast = parser.parse("test.rive", &lines).unwrap();
        assert_eq!(ast.topics["random"].triggers[0].pattern, "hello bot");
    }

    #[test]
    fn test_morpheme_preprocessor_on_triggers() {
        let config = Config::default()
            .with_utf8(true)
            .with_morpheme(MorphemeMode::Separation);
        let pre: Box<dyn Preprocessor> = Box::new(|text: &str| format!("{} !", text.trim()));
        let parser = Parser::new(&config, Some(pre.as_ref()));
        let lines = vec!["+ hello", "- hi"];
        let ast = parser.parse("test.rive", &lines).unwrap();
        assert_eq!(ast.topics["random"].triggers[0].pattern, "hello !");
    }

    #[test]
    fn test_condition_shape_enforced() {
        assert!(matches!(
            parse_err("+ test\n* malformed condition\n- nope"),
            RivetError::Parse { line: 2, .. }
        ));
        let ast = parse("+ test\n* <get a> == yes => correct\n- fallback");
        assert_eq!(
            ast.topics["random"].triggers[0].condition[0],
            "<get a> == yes => correct"
        );
    }

    #[test]
    fn test_undef_removes_definition() {
        let ast = parse("! var name = Rivet\n! var name = <undef>");
        assert!(!ast.begin.var.contains_key("name"));
    }
}
