use crate::catalog::{Book, Catalog};
use crate::encoders::Encoders;
use crate::error::LoadError;
use crate::features::FeatureMatrix;

/// Everything loaded at startup. Immutable once built; share it behind `Arc`.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    catalog: Catalog,
    features: FeatureMatrix,
    encoders: Encoders,
}

impl CatalogStore {
    /// Assemble the store, refusing inconsistent artifacts.
    pub fn new(books: Vec<Book>, features: FeatureMatrix, encoders: Encoders) -> Result<Self, LoadError> {
        features.validate()?;
        if features.rows() != books.len() {
            return Err(LoadError::RowCountMismatch { books: books.len(), features: features.rows() });
        }
        tracing::debug!(books = books.len(), dims = features.cols(), nnz = features.nnz(), "catalog store assembled");
        Ok(Self { catalog: Catalog::new(books), features, encoders })
    }

    pub fn catalog(&self) -> &Catalog { &self.catalog }

    pub fn features(&self) -> &FeatureMatrix { &self.features }

    pub fn encoders(&self) -> &Encoders { &self.encoders }
}
