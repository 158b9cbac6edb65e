//! Morpheme preprocessing plug-in
//!
//! Korean text often needs morpheme separation before pattern matching
//! works: particles attach to nouns, so `저는` never equals `저`. The
//! engine stays agnostic of any analyzer; register an implementation of
//! [`Preprocessor`] and switch [`crate::MorphemeMode::Separation`] on, and
//! every `+` trigger and user message passes through it before matching.

/// A pluggable morpheme analyzer
///
/// Implementations receive raw UTF-8 text and return the rewritten text,
/// typically with morphemes separated by spaces.
pub trait Preprocessor: Send + Sync {
    /// Rewrite one utterance or trigger pattern
    fn analyze(&self, text: &str) -> String;
}

impl<F> Preprocessor for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn analyze(&self, text: &str) -> String {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_preprocessor() {
        let pre: Box<dyn Preprocessor> = Box::new(|text: &str| text.replace("는", " 는"));
        assert_eq!(pre.analyze("저는"), "저 는");
    }
}
