use crate::error::LoadError;
use crate::{Book, CatalogStore, Encoders, FeatureMatrix};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_books: u32,
    pub num_features: u32,
    pub nnz: u64,
    pub created_at: String,
    pub version: u32,
}

pub struct ArtifactPaths {
    pub root: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn catalog(&self) -> PathBuf { self.root.join("catalog.bin") }
    pub fn features(&self) -> PathBuf { self.root.join("features.bin") }
    pub fn encoders(&self) -> PathBuf { self.root.join("encoders.json") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value).with_context(|| format!("encoding {}", path.display()))?;
    w.flush()?;
    Ok(())
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let value = bincode::deserialize(&buf).with_context(|| format!("decoding {}", path.display()))?;
    Ok(value)
}

pub fn save_catalog(paths: &ArtifactPaths, books: &[Book]) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_bincode(&paths.catalog(), &books)
}

pub fn load_catalog(paths: &ArtifactPaths) -> Result<Vec<Book>> {
    read_bincode(&paths.catalog())
}

pub fn save_features(paths: &ArtifactPaths, features: &FeatureMatrix) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_bincode(&paths.features(), features)
}

pub fn load_features(paths: &ArtifactPaths) -> Result<FeatureMatrix> {
    read_bincode(&paths.features())
}

pub fn save_encoders(paths: &ArtifactPaths, encoders: &Encoders) -> Result<()> {
    create_dir_all(&paths.root)?;
    let path = paths.encoders();
    let f = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(f), encoders)?;
    Ok(())
}

/// Encoders are optional; a missing file yields empty encoders.
pub fn load_encoders(paths: &ArtifactPaths) -> Result<Encoders> {
    let path = paths.encoders();
    if !path.exists() {
        return Ok(Encoders::default());
    }
    let f = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let encoders = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {}", path.display()))?;
    Ok(encoders)
}

pub fn save_meta(paths: &ArtifactPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &ArtifactPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let mut f = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf).with_context(|| format!("parsing {}", path.display()))?;
    Ok(meta)
}

/// Load every artifact and assemble the store. Any inconsistency is fatal.
pub fn load_store(paths: &ArtifactPaths) -> Result<CatalogStore> {
    load_store_with_meta(paths).map(|(store, _)| store)
}

pub fn load_store_with_meta(paths: &ArtifactPaths) -> Result<(CatalogStore, MetaFile)> {
    let meta = load_meta(paths)?;
    if meta.version != ARTIFACT_VERSION {
        tracing::warn!(found = meta.version, expected = ARTIFACT_VERSION, "artifact version differs");
    }
    let books = load_catalog(paths)?;
    if meta.num_books as usize != books.len() {
        return Err(LoadError::MetaMismatch { declared: meta.num_books, actual: books.len() }.into());
    }
    let features = load_features(paths)?;
    let encoders = load_encoders(paths)?;
    let store = CatalogStore::new(books, features, encoders)
        .with_context(|| format!("inconsistent artifacts in {}", paths.root.display()))?;
    tracing::info!(
        books = store.catalog().len(),
        dims = store.features().cols(),
        nnz = store.features().nnz(),
        created_at = %meta.created_at,
        "catalog store loaded"
    );
    Ok((store, meta))
}
