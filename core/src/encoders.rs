//! Encoders that produced the feature matrix upstream. They ship with the
//! artifacts for inspection only; ranking never consults them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vocabulary of the text vectorizer: term -> column, plus per-column idf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextEncoder {
    pub vocabulary: BTreeMap<String, u32>,
    #[serde(default)]
    pub idf: Vec<f32>,
}

impl TextEncoder {
    pub fn len(&self) -> usize { self.vocabulary.len() }

    pub fn is_empty(&self) -> bool { self.vocabulary.is_empty() }

    pub fn term_index(&self, term: &str) -> Option<u32> { self.vocabulary.get(term).copied() }
}

/// Multi-label genre encoder: the ordered list of known genre classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenreEncoder {
    classes: Vec<String>,
}

impl GenreEncoder {
    pub fn new(classes: Vec<String>) -> Self { Self { classes } }

    pub fn classes(&self) -> &[String] { &self.classes }

    /// Sorted class indices present in `genres`. Unknown genres are ignored.
    pub fn encode<S: AsRef<str>>(&self, genres: &[S]) -> Vec<u32> {
        let mut out: Vec<u32> = genres
            .iter()
            .filter_map(|g| self.classes.iter().position(|c| c == g.as_ref()))
            .map(|i| i as u32)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encoders {
    #[serde(default)]
    pub text: Option<TextEncoder>,
    #[serde(default)]
    pub genres: Option<GenreEncoder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_encoding_is_sorted_and_skips_unknown() {
        let enc = GenreEncoder::new(vec!["Fiction".into(), "History".into(), "Science".into()]);
        assert_eq!(enc.encode(&["Science", "Poetry", "Fiction", "Science"]), vec![0, 2]);
        assert!(enc.encode::<&str>(&[]).is_empty());
    }

    #[test]
    fn vocabulary_lookup() {
        let text: TextEncoder = serde_json::from_str(r#"{"vocabulary":{"habit":0,"work":1}}"#).unwrap();
        assert_eq!(text.term_index("work"), Some(1));
        assert_eq!(text.term_index("time"), None);
        assert!(text.idf.is_empty());
    }
}
