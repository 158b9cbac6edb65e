//! Reply generation
//!
//! The brain matches a formatted user message against the sorted trigger
//! buffer and evaluates the winning trigger's reply template. Matching
//! honors the user's current topic, topic inheritance, and `%Previous`
//! constraints; template evaluation lives in the sibling modules.

mod format;
mod regexp;
mod tags;

use crate::ast::Trigger;
use crate::patterns::{RE_SET, RE_TOPIC, RE_WEIGHT};
use crate::runtime::Rivet;
use crate::session::UNDEFINED;
use crate::text::is_atomic;
use crate::{Result, RivetError};

use regex::Regex;
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, warn};

thread_local! {
    static CURRENT_USER: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Binds the current user for the duration of one `reply` call and
/// clears it on every exit path, including errors
struct CurrentUserGuard;

impl CurrentUserGuard {
    fn bind(username: &str) -> Self {
        CURRENT_USER.with(|cell| *cell.borrow_mut() = Some(username.to_string()));
        Self
    }
}

impl Drop for CurrentUserGuard {
    fn drop(&mut self) {
        CURRENT_USER.with(|cell| *cell.borrow_mut() = None);
    }
}

impl Rivet {
    /// The user being served by the running `reply` call on this thread
    ///
    /// Object macros consult this to learn which session they serve.
    pub fn current_user(&self) -> Option<String> {
        CURRENT_USER.with(|cell| cell.borrow().clone())
    }

    /// Fetch a reply for a user's message
    pub fn reply(&self, username: &str, message: &str) -> Result<String> {
        debug!(username, message, "asked to reply");
        let _guard = CurrentUserGuard::bind(username);

        self.sessions.init(username);
        let message = self.format_message(message, false);

        let reply = if self.topics.contains_key("__begin__") {
            // The begin block gets first say; its {ok} marks where the
            // real reply goes.
            let mut begin = self.get_reply(username, "request", true, 0)?;
            if begin.contains("{ok}") {
                let inner = self.get_reply(username, &message, false, 0)?;
                begin = begin.replace("{ok}", &inner);
            }
            self.process_tags(username, &message, &begin, &[], &[], 0)?
        } else {
            self.get_reply(username, &message, false, 0)?
        };

        self.sessions.add_history(username, &message, &reply);
        Ok(reply)
    }

    /// Match one (possibly redirected) message and evaluate its reply
    pub(crate) fn get_reply(
        &self,
        username: &str,
        message: &str,
        is_begin: bool,
        step: usize,
    ) -> Result<String> {
        if self.sorted.is_empty() {
            return self.error_reply(RivetError::RepliesNotSorted);
        }
        if step > self.config.depth {
            warn!(username, step, "deep recursion while getting a reply");
            return self.error_reply(RivetError::DeepRecursion);
        }

        let mut topic = self
            .sessions
            .get(username, "topic")
            .unwrap_or_else(|| "random".to_string());
        if !self.topics.contains_key(&topic) {
            warn!(
                username,
                topic = topic.as_str(),
                "user is in an unknown topic, resetting to random"
            );
            topic = "random".to_string();
            self.sessions
                .set(username, "topic", Some("random".to_string()));
        }
        if is_begin {
            topic = "__begin__".to_string();
        }
        if !self.topics.contains_key(&topic) {
            return self.error_reply(RivetError::NoDefaultTopic);
        }

        let mut stars: Vec<String> = Vec::new();
        let mut botstars: Vec<String> = Vec::new();
        let mut matched: Option<Arc<Trigger>> = None;

        // %Previous constraints only apply to the user's own message, not
        // to redirected ones.
        if step == 0 {
            let all_topics = if is_begin {
                vec![topic.clone()]
            } else {
                self.topic_tree(&topic, 0)
            };

            'previous: for top in &all_topics {
                let Some(thats) = self.sorted.thats.get(top) else {
                    continue;
                };
                if thats.is_empty() {
                    continue;
                }
                debug!(topic = top.as_str(), "topic has %Previous triggers");

                // The bot's last reply, formatted like user input.
                let last_reply = self
                    .sessions
                    .history(username)
                    .map(|history| history.reply[0].clone())
                    .unwrap_or_else(|| UNDEFINED.to_string());
                let last_reply = self.format_message(&last_reply, true);

                for entry in thats {
                    let bot_side = self.trigger_regexp(username, &entry.text);
                    let Some(re) = compile_anchored(&bot_side) else {
                        continue;
                    };
                    let Some(caps) = re.captures(&last_reply) else {
                        continue;
                    };
                    debug!(previous = entry.text.as_str(), "bot side matched");
                    botstars = collect_stars(&caps);

                    // The bot side matched; now the user's message has to
                    // match the trigger itself.
                    let pattern = &entry.pointer.pattern;
                    if is_atomic(pattern) {
                        if message == pattern.as_str() {
                            matched = Some(entry.pointer.clone());
                            break 'previous;
                        }
                    } else {
                        let user_side = self.trigger_regexp(username, pattern);
                        if let Some(re) = compile_anchored(&user_side) {
                            if let Some(caps) = re.captures(message) {
                                stars = collect_stars(&caps);
                                matched = Some(entry.pointer.clone());
                                break 'previous;
                            }
                        }
                    }
                }
            }
        }

        // Ordinary matching against the topic's sorted buffer.
        if matched.is_none() {
            if let Some(entries) = self.sorted.topics.get(&topic) {
                for entry in entries {
                    let pattern = &entry.text;
                    if is_atomic(pattern) {
                        if message == pattern.as_str() {
                            matched = Some(entry.pointer.clone());
                            break;
                        }
                    } else {
                        let source = self.trigger_regexp(username, pattern);
                        if let Some(re) = compile_anchored(&source) {
                            if let Some(caps) = re.captures(message) {
                                stars = collect_stars(&caps);
                                matched = Some(entry.pointer.clone());
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.sessions.set_last_match(
            username,
            matched.as_ref().map(|trigger| trigger.pattern.clone()),
        );

        let Some(trigger) = matched else {
            return self.error_reply(RivetError::ReplyNotMatched);
        };
        debug!(pattern = trigger.pattern.as_str(), "found a match");

        let mut reply = String::new();
        if let Some(redirect) = &trigger.redirect {
            let target = self
                .process_tags(username, message, redirect, &stars, &botstars, step)?
                .to_lowercase();
            debug!(target = target.as_str(), "redirecting");
            reply = self.get_reply(username, &target, is_begin, step + 1)?;
        } else {
            // First passing condition wins; otherwise draw from the
            // weighted reply pool.
            for row in &trigger.condition {
                if let Some(candidate) =
                    self.evaluate_condition(username, message, row, &stars, &botstars, step)?
                {
                    reply = candidate;
                    break;
                }
            }

            if reply.is_empty() && !trigger.reply.is_empty() {
                let mut bucket: Vec<usize> = Vec::new();
                for (index, text) in trigger.reply.iter().enumerate() {
                    let weight = RE_WEIGHT
                        .captures(text)
                        .and_then(|caps| caps[1].parse::<usize>().ok())
                        .unwrap_or(1)
                        .max(1);
                    bucket.extend(std::iter::repeat(index).take(weight));
                }
                reply = trigger.reply[bucket[self.random_index(bucket.len())]].clone();
            }
        }

        if reply.is_empty() {
            return self.error_reply(RivetError::ReplyNotFound);
        }

        if is_begin {
            // Inside the begin block only state-mutating tags run; the
            // rest wait for the combined post-processing pass.
            let mut giveup = 0;
            while let Some(caps) = RE_TOPIC.captures(&reply) {
                giveup += 1;
                if giveup > self.config.depth {
                    warn!("infinite loop processing begin topic tags");
                    break;
                }
                let name = caps[1].to_string();
                self.sessions.set(username, "topic", Some(name.clone()));
                reply = reply.replace(&format!("{{topic={}}}", name), "");
            }
            let mut giveup = 0;
            while let Some(caps) = RE_SET.captures(&reply) {
                giveup += 1;
                if giveup > self.config.depth {
                    warn!("infinite loop processing begin set tags");
                    break;
                }
                let name = caps[1].to_string();
                let value = caps[2].to_string();
                self.sessions.set(username, &name, Some(value.clone()));
                reply = reply.replace(&format!("<set {}={}>", name, value), "");
            }
            reply = reply.trim().to_string();
        } else {
            reply = self.process_tags(username, message, &reply, &stars, &botstars, step)?;
        }
        Ok(reply)
    }

    /// Evaluate one `* LEFT op RIGHT => REPLY` row
    fn evaluate_condition(
        &self,
        username: &str,
        message: &str,
        row: &str,
        stars: &[String],
        botstars: &[String],
        step: usize,
    ) -> Result<Option<String>> {
        let Some((comparison, candidate)) = row.split_once("=>") else {
            return Ok(None);
        };
        let Some(caps) = crate::patterns::RE_CONDITION.captures(comparison.trim()) else {
            return Ok(None);
        };

        let mut left =
            self.process_tags(username, message, caps[1].trim(), stars, botstars, step)?;
        let op = caps[2].to_string();
        let mut right =
            self.process_tags(username, message, caps[3].trim(), stars, botstars, step)?;

        if left.is_empty() {
            left = UNDEFINED.to_string();
        }
        if right.is_empty() {
            right = UNDEFINED.to_string();
        }

        let passed = match op.as_str() {
            "eq" | "==" => left == right,
            "ne" | "!=" | "<>" => left != right,
            _ => {
                // Numeric comparisons fail silently on non-numbers.
                match (left.parse::<f64>(), right.parse::<f64>()) {
                    (Ok(l), Ok(r)) => match op.as_str() {
                        "<" => l < r,
                        "<=" => l <= r,
                        ">" => l > r,
                        ">=" => l >= r,
                        _ => false,
                    },
                    _ => false,
                }
            }
        };

        Ok(passed.then(|| candidate.trim().to_string()))
    }

    /// The topic plus everything it transitively includes or inherits
    pub(crate) fn topic_tree(&self, topic: &str, depth: usize) -> Vec<String> {
        if depth > self.config.depth {
            warn!(topic, "deep recursion while walking the topic tree");
            return Vec::new();
        }
        let mut topics = vec![topic.to_string()];
        if let Some(data) = self.topics.get(topic) {
            for includes in &data.includes {
                topics.extend(self.topic_tree(includes, depth + 1));
            }
            for inherits in &data.inherits {
                topics.extend(self.topic_tree(inherits, depth + 1));
            }
        }
        topics
    }

    /// Either raise an error or render it as a reply string, depending
    /// on `throw_exceptions`
    pub(crate) fn error_reply(&self, err: RivetError) -> Result<String> {
        if self.config.throw_exceptions {
            return Err(err);
        }
        let errors = &self.config.errors;
        Ok(match err {
            RivetError::DeepRecursion => errors.deep_recursion.clone(),
            RivetError::RepliesNotSorted => errors.replies_not_sorted.clone(),
            RivetError::NoDefaultTopic => errors.default_topic_not_found.clone(),
            RivetError::ReplyNotMatched => errors.reply_not_matched.clone(),
            RivetError::ReplyNotFound => errors.reply_not_found.clone(),
            RivetError::ObjectNotFound(_) => errors.object_not_found.clone(),
            RivetError::DivideByZero => errors.cannot_divide_by_zero.clone(),
            RivetError::MathVariable(_) => errors.cannot_math_variable.clone(),
            RivetError::MathValue(_) => errors.cannot_math_value.clone(),
            other => other.to_string(),
        })
    }
}

/// Stars are the capture groups, in order; unmatched groups are empty
fn collect_stars(caps: &regex::Captures) -> Vec<String> {
    caps.iter()
        .skip(1)
        .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect()
}

/// Compile a rewritten trigger anchored to the whole message
fn compile_anchored(source: &str) -> Option<Regex> {
    match Regex::new(&format!("^{}$", source)) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(source, "failed to compile trigger regexp: {}", err);
            None
        }
    }
}
