//! Approximate title matching.
//!
//! Similarity is the gestalt (Ratcliff/Obershelp) ratio `2·M / T`, where `T`
//! is the combined length of both strings and `M` the number of characters
//! in matching blocks. Blocks are found by taking the longest common
//! contiguous run and recursing on the pieces to its left and right.

use crate::error::RecommendError;
use std::collections::HashMap;

pub const DEFAULT_CUTOFF: f64 = 0.6;

/// Sequences at least this long get the popular-element heuristic.
const AUTOJUNK_MIN_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct TitleMatch<'a> {
    /// Position in the candidate list.
    pub position: usize,
    pub title: &'a str,
    pub ratio: f64,
}

pub fn validate_cutoff(cutoff: f64) -> Result<f64, RecommendError> {
    if (0.0..=1.0).contains(&cutoff) {
        Ok(cutoff)
    } else {
        Err(RecommendError::InvalidCutoff(cutoff))
    }
}

/// Best title with ratio >= `cutoff`; ties go to the earliest candidate.
pub fn resolve<'a, S: AsRef<str>>(query: &str, titles: &'a [S], cutoff: f64) -> Option<&'a str> {
    resolve_match(query, titles, cutoff).map(|m| m.title)
}

pub fn resolve_match<'a, S: AsRef<str>>(query: &str, titles: &'a [S], cutoff: f64) -> Option<TitleMatch<'a>> {
    let q: Vec<char> = query.chars().collect();
    let index = SeqIndex::new(&q);
    let mut best: Option<TitleMatch<'a>> = None;
    for (position, title) in titles.iter().enumerate() {
        let title = title.as_ref();
        let t: Vec<char> = title.chars().collect();
        if quick_ratio_chars(&t, &q) < cutoff {
            continue;
        }
        let r = index.ratio_against(&t);
        if r >= cutoff && best.as_ref().map_or(true, |b| r > b.ratio) {
            best = Some(TitleMatch { position, title, ratio: r });
        }
    }
    best
}

/// Gestalt similarity of `a` against `b`, in [0, 1].
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    SeqIndex::new(&b).ratio_against(&a)
}

/// Cheap upper bound on [`ratio`] from the shared character multiset.
pub fn quick_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    quick_ratio_chars(&a, &b)
}

fn quick_ratio_chars(a: &[char], b: &[char]) -> f64 {
    let mut avail: HashMap<char, isize> = HashMap::new();
    for c in b {
        *avail.entry(*c).or_insert(0) += 1;
    }
    let mut matches = 0usize;
    for c in a {
        let n = avail.entry(*c).or_insert(0);
        if *n > 0 {
            matches += 1;
        }
        *n -= 1;
    }
    calculate_ratio(matches, a.len() + b.len())
}

fn calculate_ratio(matches: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        2.0 * matches as f64 / total as f64
    }
}

/// Position index over the second sequence, reused across candidates.
struct SeqIndex<'b> {
    b: &'b [char],
    b2j: HashMap<char, Vec<usize>>,
}

impl<'b> SeqIndex<'b> {
    fn new(b: &'b [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }
        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let ntest = n / 100 + 1;
            b2j.retain(|_, idxs| idxs.len() <= ntest);
        }
        Self { b, b2j }
    }

    fn ratio_against(&self, a: &[char]) -> f64 {
        calculate_ratio(self.matched_chars(a), a.len() + self.b.len())
    }

    /// Total size of all matching blocks between `a` and `b`.
    fn matched_chars(&self, a: &[char]) -> usize {
        let mut total = 0;
        let mut queue = vec![(0, a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.longest_match(a, alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        total
    }

    /// Longest block `a[i..i+k] == b[j..j+k]` within the given bounds,
    /// preferring the smallest `i`, then the smallest `j`.
    fn longest_match(&self, a: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let b = self.b;
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0);
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(js) = self.b2j.get(&a[i]) {
                for &j in js {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                    next.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = next;
        }
        // Popular characters never seed a block but may still extend one.
        while besti > alo && bestj > blo && a[besti - 1] == b[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi && bestj + bestsize < bhi && a[besti + bestsize] == b[bestj + bestsize] {
            bestsize += 1;
        }
        (besti, bestj, bestsize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_basics() {
        assert_eq!(ratio("abcd", "bcde"), 0.75);
        assert_eq!(ratio("", ""), 1.0);
        assert_eq!(ratio("abc", ""), 0.0);
        assert_eq!(ratio("Deep Work", "Deep Work"), 1.0);
        assert!((ratio("Atomic Habits", "atomic habit") - 0.8).abs() < 1e-12);
    }

    #[test]
    fn quick_ratio_bounds_ratio() {
        for (a, b) in [("apple", "appel"), ("Make Time", "atomic habit"), ("abcd", "dcba")] {
            assert!(quick_ratio(a, b) >= ratio(a, b));
        }
    }

    #[test]
    fn picks_best_candidate() {
        let words = ["ape", "apple", "peach", "puppy"];
        assert_eq!(resolve("appel", &words, DEFAULT_CUTOFF), Some("apple"));
        assert_eq!(resolve("zzzz", &words, DEFAULT_CUTOFF), None);
    }

    #[test]
    fn ties_prefer_earliest_candidate() {
        let titles = ["abcx", "abcy"];
        let m = resolve_match("abc", &titles, 0.5).unwrap();
        assert_eq!(m.position, 0);
        assert_eq!(m.title, "abcx");
    }

    #[test]
    fn long_repetitive_query_still_matches_itself() {
        let s = "ab".repeat(125);
        assert_eq!(ratio(&s, &s), 1.0);
    }

    #[test]
    fn cutoff_validation() {
        assert!(validate_cutoff(0.6).is_ok());
        assert!(validate_cutoff(1.5).is_err());
        assert!(validate_cutoff(f64::NAN).is_err());
    }
}
