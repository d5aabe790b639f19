//! Presence signal extraction from classifier output.
//!
//! The inference service returns free text; a [`SignalExtractor`] decides
//! whether that text counts as a detection. A [`Debouncer`] can sit between
//! the extractor and the tracker to suppress single-frame flicker.

/// Decides whether a classifier description reports the target.
pub trait SignalExtractor: Send {
    fn extract(&self, description: &str) -> bool;
}

/// Case-insensitive substring match against a keyword set.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    keywords: Vec<String>,
}

impl KeywordExtractor {
    /// Create an extractor matching any of `keywords`.
    ///
    /// Blank keywords are ignored.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Parse keywords from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        Self::new(s.split(','))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(["person", "people"])
    }
}

impl SignalExtractor for KeywordExtractor {
    fn extract(&self, description: &str) -> bool {
        let text = description.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Requires runs of identical raw signals before the reported signal flips.
///
/// With `open_after == 1` and `close_after == 1` the debouncer passes the raw
/// signal through unchanged.
#[derive(Debug, Clone)]
pub struct Debouncer {
    open_after: u32,
    close_after: u32,
    state: bool,
    run: u32,
}

impl Debouncer {
    /// Create a debouncer. Zero thresholds are treated as 1.
    pub fn new(open_after: u32, close_after: u32) -> Self {
        Self {
            open_after: open_after.max(1),
            close_after: close_after.max(1),
            state: false,
            run: 0,
        }
    }

    /// Feed one raw signal and get the debounced one.
    pub fn update(&mut self, raw: bool) -> bool {
        if raw == self.state {
            self.run = 0;
            return self.state;
        }

        self.run += 1;
        let needed = if raw { self.open_after } else { self.close_after };
        if self.run >= needed {
            self.state = raw;
            self.run = 0;
        }
        self.state
    }

    /// Current debounced state.
    pub fn state(&self) -> bool {
        self.state
    }

    /// Return to the absent state, e.g. after a forced shutdown.
    pub fn reset(&mut self) {
        self.state = false;
        self.run = 0;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let extractor = KeywordExtractor::default();
        assert!(extractor.extract("A Person is standing near the fence."));
        assert!(extractor.extract("Two PEOPLE walking"));
        assert!(!extractor.extract("A deer grazing in a field at night."));
    }

    #[test]
    fn test_custom_keywords_from_csv() {
        let extractor = KeywordExtractor::from_csv("Elephant, tiger ,,");
        assert_eq!(extractor.keywords(), &["elephant", "tiger"]);
        assert!(extractor.extract("an elephant near the waterhole"));
        assert!(extractor.extract("TIGER"));
        assert!(!extractor.extract("a person"));
    }

    #[test]
    fn test_empty_keyword_set_never_matches() {
        let extractor = KeywordExtractor::new(Vec::<String>::new());
        assert!(!extractor.extract("anything at all"));
    }

    #[test]
    fn test_debouncer_passthrough() {
        let mut debouncer = Debouncer::default();
        let raw = [true, false, true, true, false, false, true];
        for r in raw {
            assert_eq!(debouncer.update(r), r);
        }
    }

    #[test]
    fn test_debouncer_requires_runs() {
        let mut debouncer = Debouncer::new(2, 3);

        assert!(!debouncer.update(true));
        assert!(!debouncer.update(false));
        assert!(!debouncer.update(true));
        assert!(debouncer.update(true));

        // A single absent frame does not close.
        assert!(debouncer.update(false));
        assert!(debouncer.update(true));
        assert!(debouncer.update(false));
        assert!(debouncer.update(false));
        assert!(!debouncer.update(false));
    }

    #[test]
    fn test_debouncer_reset() {
        let mut debouncer = Debouncer::new(1, 5);
        assert!(debouncer.update(true));
        debouncer.reset();
        assert!(!debouncer.state());
    }
}
