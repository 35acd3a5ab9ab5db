//! Whole-word keyword matching
//!
//! Keywords match only at word boundaries, so "cart" does not fire on
//! "cartoon" and "api" does not fire on "rapid". Multi-word keywords
//! match as a phrase.

use regex::{RegexSet, RegexSetBuilder};

/// A compiled set of keywords matched against lowercased text
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<String>,
    set: RegexSet,
}

impl KeywordSet {
    /// Compile a keyword list; blank keywords are dropped
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let set = RegexSetBuilder::new(keywords.iter().map(|k| word_pattern(k)))
            .case_insensitive(true)
            .build()?;

        Ok(Self { keywords, set })
    }

    /// A set that matches nothing
    pub fn empty() -> Self {
        Self {
            keywords: Vec::new(),
            set: RegexSet::empty(),
        }
    }

    /// Number of distinct keywords present in `text`
    pub fn hits(&self, text: &str) -> usize {
        self.set.matches(text).iter().count()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.set.is_match(text)
    }

    /// Keywords present in `text`, in declaration order
    pub fn matched<'a>(&'a self, text: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.set.matches(text).into_iter().map(|i| self.keywords[i].as_str())
    }
}

/// Escaped keyword anchored at word boundaries where it starts or ends
/// with a word character
fn word_pattern(keyword: &str) -> String {
    let starts_word = keyword.chars().next().is_some_and(is_word_char);
    let ends_word = keyword.chars().next_back().is_some_and(is_word_char);

    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(keyword),
        if ends_word { r"\b" } else { "" }
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keywords: &[&str]) -> KeywordSet {
        KeywordSet::new(keywords).unwrap()
    }

    #[test]
    fn keywords_inside_other_words_do_not_match() {
        let keywords = set(&["api", "ads", "store", "cart", "pci", "sso", "shop"]);
        let text = "a rapid prototype of a special lesson planner that leads to a workshop to restore a cartoon";
        assert_eq!(keywords.hits(text), 0);
        assert!(!keywords.is_match(text));
    }

    #[test]
    fn whole_words_and_phrases_match() {
        let keywords = set(&["online store", "store", "cart", "e-commerce", "i'm new"]);
        let text = "i'm new to e-commerce and want an online store, with a cart.";
        assert_eq!(keywords.hits(text), 5);
        assert_eq!(
            keywords.matched(text).collect::<Vec<_>>(),
            vec!["online store", "store", "cart", "e-commerce", "i'm new"]
        );
    }

    #[test]
    fn metacharacters_are_literal() {
        let keywords = set(&["c++", "next.js"]);
        assert_eq!(keywords.hits("built with c++ and next.js"), 2);
        assert_eq!(keywords.hits("built with c and nextxjs"), 0);
    }

    #[test]
    fn blank_keywords_and_empty_sets_never_match() {
        assert_eq!(set(&["", "  "]).hits("anything"), 0);
        assert_eq!(KeywordSet::empty().hits("anything"), 0);
        assert_eq!(set(&[" Appointment "]).hits("an appointment"), 1);
    }
}
