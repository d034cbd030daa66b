use thiserror::Error;

/// Structural problems found while assembling the store. Always fatal.
#[derive(Debug, Error, PartialEq)]
pub enum LoadError {
    #[error("feature matrix has {features} rows but catalog has {books} books")]
    RowCountMismatch { books: usize, features: usize },

    #[error("malformed feature matrix: {0}")]
    MalformedMatrix(String),

    #[error("meta.json declares {declared} books but catalog.bin holds {actual}")]
    MetaMismatch { declared: u32, actual: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecommendError {
    /// No catalog title cleared the fuzzy cutoff. A normal outcome.
    #[error("Book '{query}' not found or no close match.")]
    NotFound { query: String },

    #[error("Please enter a book title.")]
    EmptyQuery,

    #[error("fuzzy cutoff must be within [0, 1], got {0}")]
    InvalidCutoff(f64),
}

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("unknown chart: {0}")]
    UnknownChart(String),
}
