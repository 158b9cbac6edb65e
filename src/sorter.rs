//! Trigger sorting: assigns the total matching order
//!
//! Runs once after all scripts load. For every topic the sorter collects
//! the triggers reachable through `includes`/`inherits` edges, then ranks
//! them: weight first, then inheritance distance, then a specificity
//! class, then word count and length. The reply phase walks the result
//! top to bottom and stops at the first match, so this order *is* the
//! matching policy.

use crate::ast::Trigger;
use crate::patterns::{RE_INHERITS, RE_WEIGHT};
use crate::runtime::Rivet;
use crate::text::{is_atomic, word_count};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// One slot in the sorted matching buffer
///
/// `text` is the pattern the matcher compiles (it may carry an
/// `{inherits=N}` label only transiently, inside the sorter); `pointer`
/// is the trigger the reply phase serves when the slot matches.
#[derive(Debug, Clone)]
pub(crate) struct SortedTriggerEntry {
    pub text: String,
    pub pointer: Arc<Trigger>,
}

/// The complete sorted state of the engine
#[derive(Debug, Clone, Default)]
pub(crate) struct SortBuffer {
    /// Matching order per topic
    pub topics: HashMap<String, Vec<SortedTriggerEntry>>,
    /// Matching order for `%Previous` patterns per topic
    pub thats: HashMap<String, Vec<SortedTriggerEntry>>,
    /// Substitution keys, longest first
    pub sub: Vec<String>,
    /// Person-substitution keys, longest first
    pub person: Vec<String>,
}

impl SortBuffer {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Specificity classes, in flatten order
#[derive(Default)]
struct SortTrack {
    atomic: BTreeMap<usize, Vec<SortedTriggerEntry>>,
    option: BTreeMap<usize, Vec<SortedTriggerEntry>>,
    alpha: BTreeMap<usize, Vec<SortedTriggerEntry>>,
    number: BTreeMap<usize, Vec<SortedTriggerEntry>>,
    wild: BTreeMap<usize, Vec<SortedTriggerEntry>>,
    under: Vec<SortedTriggerEntry>,
    pound: Vec<SortedTriggerEntry>,
    star: Vec<SortedTriggerEntry>,
}

impl Rivet {
    /// Sort all loaded triggers into the matching buffer
    ///
    /// Must be called after loading and before the first `reply`. The
    /// buffer is rebuilt from scratch, so calling it twice is harmless.
    pub fn sort_replies(&mut self) {
        let mut sorted = SortBuffer::default();

        let topic_names: Vec<String> = self.topics.keys().cloned().collect();
        debug!("sorting triggers for {} topics", topic_names.len());

        for topic in &topic_names {
            debug!(topic = topic.as_str(), "analyzing topic");

            let triggers = self.topic_triggers(topic, false, 0, 0, false);
            sorted
                .topics
                .insert(topic.clone(), sort_trigger_set(triggers));

            let previous = self.topic_triggers(topic, true, 0, 0, false);
            sorted.thats.insert(topic.clone(), sort_trigger_set(previous));
        }

        sorted.sub = sort_list_by_length(self.sub.keys());
        sorted.person = sort_list_by_length(self.person.keys());

        self.sorted = sorted;
    }

    /// Collect all triggers reachable from a topic
    ///
    /// `thats` selects `%Previous` triggers (keyed by their previous
    /// pattern) instead of plain ones. `includes` pools triggers at equal
    /// priority; `inherits` layers them behind the inheriting topic by
    /// prefixing an `{inherits=N}` label the sort consumes.
    fn topic_triggers(
        &self,
        topic: &str,
        thats: bool,
        depth: usize,
        inheritance: usize,
        inherited: bool,
    ) -> Vec<SortedTriggerEntry> {
        if depth > self.config.depth {
            warn!(topic, "deep recursion while collecting topic triggers");
            return Vec::new();
        }

        // Triggers of this topic itself.
        let mut in_this_topic: Vec<SortedTriggerEntry> = Vec::new();
        if let Some(data) = self.topics.get(topic) {
            for trigger in &data.triggers {
                match (thats, &trigger.previous) {
                    (false, _) => in_this_topic.push(SortedTriggerEntry {
                        text: trigger.pattern.clone(),
                        pointer: trigger.clone(),
                    }),
                    (true, Some(previous)) => in_this_topic.push(SortedTriggerEntry {
                        text: previous.clone(),
                        pointer: trigger.clone(),
                    }),
                    (true, None) => {}
                }
            }
        }

        // Triggers of included and inherited topics.
        let mut triggers: Vec<SortedTriggerEntry> = Vec::new();
        if let Some(data) = self.topics.get(topic) {
            for includes in &data.includes {
                triggers.extend(self.topic_triggers(
                    includes,
                    thats,
                    depth + 1,
                    inheritance,
                    false,
                ));
            }
            for inherits in &data.inherits {
                triggers.extend(self.topic_triggers(
                    inherits,
                    thats,
                    depth + 1,
                    inheritance + 1,
                    true,
                ));
            }
        }

        let labeled = self
            .topics
            .get(topic)
            .map(|data| !data.inherits.is_empty())
            .unwrap_or(false)
            || inherited;
        for mut entry in in_this_topic {
            if labeled {
                entry.text = format!("{{inherits={}}}{}", inheritance, entry.text);
            }
            triggers.push(entry);
        }
        triggers
    }
}

/// Rank a set of triggers into their final matching order
fn sort_trigger_set(triggers: Vec<SortedTriggerEntry>) -> Vec<SortedTriggerEntry> {
    // Bucket by weight, highest first.
    let mut prior: BTreeMap<i64, Vec<SortedTriggerEntry>> = BTreeMap::new();
    for entry in triggers {
        let weight = RE_WEIGHT
            .captures(&entry.text)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0);
        prior.entry(weight).or_default().push(entry);
    }

    let mut running: Vec<SortedTriggerEntry> = Vec::new();
    for (_, bucket) in prior.into_iter().rev() {
        // Bucket again by inheritance level; triggers without a label
        // sort after every labeled one.
        let mut track: BTreeMap<i64, SortTrack> = BTreeMap::new();
        let mut highest_inherits: i64 = -1;

        for mut entry in bucket {
            let inherits = match RE_INHERITS.captures(&entry.text) {
                Some(caps) => {
                    let level: i64 = caps[1].parse().unwrap_or(0);
                    highest_inherits = highest_inherits.max(level);
                    entry.text = RE_INHERITS.replace_all(&entry.text, "").into_owned();
                    level
                }
                None => -1,
            };
            classify(track.entry(inherits).or_default(), entry);
        }

        // Move the unlabeled group to the bottom of this weight band.
        if let Some(unlabeled) = track.remove(&-1) {
            track.insert(highest_inherits + 1, unlabeled);
        }

        for (_, group) in track {
            running.extend(sort_by_words(group.atomic));
            running.extend(sort_by_words(group.option));
            running.extend(sort_by_words(group.alpha));
            running.extend(sort_by_words(group.number));
            running.extend(sort_by_words(group.wild));
            running.extend(sort_by_length(group.under));
            running.extend(sort_by_length(group.pound));
            running.extend(sort_by_length(group.star));
        }
    }
    running
}

/// Put one trigger into its specificity class
fn classify(track: &mut SortTrack, entry: SortedTriggerEntry) {
    let pattern = &entry.text;
    let words = word_count(pattern, false);

    if is_atomic(pattern) {
        track.atomic.entry(words).or_default().push(entry);
    } else if pattern.contains('[') {
        track.option.entry(words).or_default().push(entry);
    } else if pattern.contains('_') {
        if words > 0 {
            track.alpha.entry(words).or_default().push(entry);
        } else {
            track.under.push(entry);
        }
    } else if pattern.contains('#') {
        if words > 0 {
            track.number.entry(words).or_default().push(entry);
        } else {
            track.pound.push(entry);
        }
    } else if words > 0 {
        track.wild.entry(words).or_default().push(entry);
    } else {
        track.star.push(entry);
    }
}

/// Flatten word-count buckets, most words first; ties go to the longer
/// pattern, then to natural string order
fn sort_by_words(buckets: BTreeMap<usize, Vec<SortedTriggerEntry>>) -> Vec<SortedTriggerEntry> {
    let mut out = Vec::new();
    for (_, bucket) in buckets.into_iter().rev() {
        out.extend(sort_by_length(bucket));
    }
    out
}

/// Longest pattern first; ties in natural string order
fn sort_by_length(mut bucket: Vec<SortedTriggerEntry>) -> Vec<SortedTriggerEntry> {
    bucket.sort_by(|a, b| {
        b.text
            .chars()
            .count()
            .cmp(&a.text.chars().count())
            .then_with(|| a.text.cmp(&b.text))
    });
    bucket
}

/// Sort map keys for substitution: most words first, then longest
fn sort_list_by_length<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut list: Vec<String> = keys.cloned().collect();
    list.sort_by(|a, b| {
        word_count(b, true)
            .cmp(&word_count(a, true))
            .then_with(|| b.chars().count().cmp(&a.chars().count()))
            .then_with(|| a.cmp(b))
    });
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rivet;

    fn sorted_patterns(script: &str) -> Vec<String> {
        let mut bot = Rivet::new();
        bot.stream(script).unwrap();
        bot.sort_replies();
        bot.sorted.topics["random"]
            .iter()
            .map(|entry| entry.text.clone())
            .collect()
    }

    #[test]
    fn test_specificity_order() {
        let order = sorted_patterns(
            "+ *\n- w\n\
             + hello bot\n- a\n\
             + hello *\n- c\n\
             + hello [there] bot\n- b\n\
             + hello _\n- d\n\
             + hello #\n- e",
        );
        assert_eq!(
            order,
            vec![
                "hello bot",
                "hello [there] bot",
                "hello _",
                "hello #",
                "hello *",
                "*",
            ]
        );
    }

    #[test]
    fn test_word_count_order() {
        let order = sorted_patterns(
            "+ hi\n- a\n\
             + hello there robot friend\n- b\n\
             + hello there\n- c",
        );
        assert_eq!(order, vec!["hello there robot friend", "hello there", "hi"]);
    }

    #[test]
    fn test_weight_beats_specificity() {
        let order = sorted_patterns(
            "+ hello bot\n- a\n\
             + * {weight=10}\n- b",
        );
        // The weighted wildcard outranks the atomic trigger, and the
        // weight tag survives in the buffer for the matcher to strip.
        assert!(order[0].contains('*'));
        assert_eq!(order[1], "hello bot");
    }

    #[test]
    fn test_inheritance_layers() {
        let mut bot = Rivet::new();
        bot.stream(
            "> topic parent\n+ *\n- parent catch\n< topic\n\
             > topic child inherits parent\n+ hello\n- child hi\n< topic",
        )
        .unwrap();
        bot.sort_replies();
        let child: Vec<String> = bot.sorted.topics["child"]
            .iter()
            .map(|entry| entry.text.clone())
            .collect();
        // Child's own trigger outranks the inherited catch-all even
        // though the labels are stripped by sort time.
        assert_eq!(child, vec!["hello", "*"]);
    }

    #[test]
    fn test_includes_pool_at_equal_priority() {
        let mut bot = Rivet::new();
        bot.stream(
            "> topic a includes b\n+ apple pie\n- a\n< topic\n\
             > topic b\n+ banana split milkshake\n- b\n< topic",
        )
        .unwrap();
        bot.sort_replies();
        let pool: Vec<String> = bot.sorted.topics["a"]
            .iter()
            .map(|entry| entry.text.clone())
            .collect();
        // Pooled triggers interleave purely by specificity: the included
        // three-word trigger beats the local two-word one.
        assert_eq!(pool, vec!["banana split milkshake", "apple pie"]);
    }

    #[test]
    fn test_double_sort_is_noop() {
        let mut bot = Rivet::new();
        bot.stream("+ hello bot\n- hi\n+ *\n- catch").unwrap();
        bot.sort_replies();
        let first: Vec<String> = bot.sorted.topics["random"]
            .iter()
            .map(|entry| entry.text.clone())
            .collect();
        bot.sort_replies();
        let second: Vec<String> = bot.sorted.topics["random"]
            .iter()
            .map(|entry| entry.text.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_thats_sorted_by_previous() {
        let mut bot = Rivet::new();
        bot.stream(
            "+ knock knock\n- who is there\n\
             + *\n% who is there\n- <star> who",
        )
        .unwrap();
        bot.sort_replies();
        let thats = &bot.sorted.thats["random"];
        assert_eq!(thats.len(), 1);
        assert_eq!(thats[0].text, "who is there");
        assert_eq!(thats[0].pointer.pattern, "*");
    }

    #[test]
    fn test_substitution_key_order() {
        let mut bot = Rivet::new();
        bot.stream("! sub whats = what is\n! sub what's up = what is up\n! sub u = you")
            .unwrap();
        bot.sort_replies();
        assert_eq!(bot.sorted.sub, vec!["what's up", "whats", "u"]);
    }

    #[test]
    fn test_no_ties_in_rank() {
        let order = sorted_patterns(
            "+ alpha beta\n- a\n\
             + gamma delta\n- b\n\
             + alpha gamma\n- c",
        );
        // Longer patterns first; equal words and length fall back to
        // natural string order.
        assert_eq!(order, vec!["alpha gamma", "gamma delta", "alpha beta"]);
    }
}
