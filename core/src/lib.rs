//! Catalog store and content-based recommender for an audiobook dataset.

pub mod catalog;
pub mod encoders;
pub mod error;
pub mod features;
pub mod fuzzy;
pub mod persist;
pub mod recommend;
pub mod stats;
pub mod store;

pub use catalog::{Book, Catalog, RowId};
pub use encoders::{Encoders, GenreEncoder, TextEncoder};
pub use error::{LoadError, RecommendError, StatsError};
pub use features::{FeatureMatrix, SparseRow};
pub use recommend::{Recommendation, Recommender, ScoredRow};
pub use store::CatalogStore;
