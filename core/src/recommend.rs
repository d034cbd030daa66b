use crate::catalog::RowId;
use crate::error::RecommendError;
use crate::fuzzy::{self, DEFAULT_CUTOFF};
use crate::store::CatalogStore;
use serde::Serialize;
use std::cmp::Ordering;
use std::num::NonZeroUsize;

/// Score assigned to the matched row against itself. Cosine similarity never
/// goes below -1, so this row always ranks last.
pub const SELF_SIMILARITY: f32 = -2.0;

/// What the dashboard shows for each recommended book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub title: String,
    pub author: String,
    pub rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredRow {
    pub row: RowId,
    pub score: f32,
}

/// Full result of a lookup, score included.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRecommendations {
    pub matched_row: RowId,
    pub matched_title: String,
    pub rows: Vec<ScoredRow>,
}

/// Trim user input and reject blank queries before they reach the recommender.
pub fn validate_query(text: &str) -> Result<&str, RecommendError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(RecommendError::EmptyQuery)
    } else {
        Ok(trimmed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Recommender<'a> {
    store: &'a CatalogStore,
    cutoff: f64,
}

impl<'a> Recommender<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self { store, cutoff: DEFAULT_CUTOFF }
    }

    pub fn with_cutoff(store: &'a CatalogStore, cutoff: f64) -> Result<Self, RecommendError> {
        Ok(Self { store, cutoff: fuzzy::validate_cutoff(cutoff)? })
    }

    pub fn cutoff(&self) -> f64 { self.cutoff }

    /// Books most similar to the catalog title closest to `query`.
    pub fn recommend(&self, query: &str, top_n: NonZeroUsize) -> Result<Vec<Recommendation>, RecommendError> {
        let ranked = self.recommend_scored(query, top_n)?;
        Ok(self.project(&ranked.rows))
    }

    pub fn recommend_scored(&self, query: &str, top_n: NonZeroUsize) -> Result<RankedRecommendations, RecommendError> {
        let catalog = self.store.catalog();
        let matched = fuzzy::resolve(query, catalog.titles(), self.cutoff)
            .ok_or_else(|| RecommendError::NotFound { query: query.to_string() })?;
        let row = catalog
            .first_row_of(matched)
            .ok_or_else(|| RecommendError::NotFound { query: query.to_string() })?;
        tracing::debug!(query, matched, row, "resolved title");
        Ok(RankedRecommendations {
            matched_row: row,
            matched_title: matched.to_string(),
            rows: self.rank(row, top_n),
        })
    }

    /// Top `top_n` rows by similarity to `row`, excluding `row` itself.
    /// Score descending, catalog order on ties.
    pub fn rank(&self, row: RowId, top_n: NonZeroUsize) -> Vec<ScoredRow> {
        let Some(mut sims) = self.store.features().similarities(row as usize) else {
            return Vec::new();
        };
        sims[row as usize] = SELF_SIMILARITY;

        let mut scored: Vec<ScoredRow> = sims
            .into_iter()
            .enumerate()
            .filter(|(r, _)| *r != row as usize)
            .map(|(r, score)| ScoredRow { row: r as RowId, score })
            .collect();

        let n = top_n.get().min(scored.len());
        if n == 0 {
            return Vec::new();
        }
        if n < scored.len() {
            scored.select_nth_unstable_by(n - 1, by_score_then_row);
            scored.truncate(n);
        }
        scored.sort_by(by_score_then_row);
        scored
    }

    pub fn project(&self, rows: &[ScoredRow]) -> Vec<Recommendation> {
        let catalog = self.store.catalog();
        rows.iter()
            .filter_map(|s| catalog.get(s.row))
            .map(|b| Recommendation { title: b.title.clone(), author: b.author.clone(), rating: b.rating })
            .collect()
    }
}

fn by_score_then_row(a: &ScoredRow, b: &ScoredRow) -> Ordering {
    b.score.total_cmp(&a.score).then(a.row.cmp(&b.row))
}
