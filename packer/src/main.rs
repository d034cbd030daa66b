use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use recsys_core::encoders::{Encoders, GenreEncoder, TextEncoder};
use recsys_core::error::RecommendError;
use recsys_core::fuzzy::DEFAULT_CUTOFF;
use recsys_core::persist::{load_store, load_store_with_meta, save_catalog, save_encoders, save_features, save_meta, ArtifactPaths, MetaFile, ARTIFACT_VERSION};
use recsys_core::recommend::validate_query;
use recsys_core::{Book, CatalogStore, FeatureMatrix, Recommender};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Rows whose L2 norm is further than this from 1.0 trigger a warning.
const NORM_TOLERANCE: f32 = 1e-3;

#[derive(Parser)]
#[command(name = "packer")]
#[command(about = "Pack, inspect and query audiobook recommendation artifacts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a catalog and its precomputed feature rows into artifacts
    Pack {
        /// Catalog input (JSON, JSONL, or a directory of them)
        #[arg(long)]
        catalog: String,
        /// Feature rows as JSONL, one row per book in catalog order
        #[arg(long)]
        features: String,
        /// Output artifact directory
        #[arg(long)]
        output: String,
        /// Feature dimensionality; inferred from the rows when omitted
        #[arg(long)]
        dims: Option<usize>,
        /// L2-normalise rows before writing
        #[arg(long, default_value_t = false)]
        normalize: bool,
        /// Text vectorizer vocabulary (JSON)
        #[arg(long)]
        vocabulary: Option<String>,
        /// Genre encoder classes (JSON array)
        #[arg(long)]
        genre_classes: Option<String>,
    },
    /// Load artifacts and report what they contain
    Inspect {
        #[arg(long, default_value = "./artifacts")]
        artifacts: String,
    },
    /// Recommend books similar to a title
    Query {
        #[arg(long, default_value = "./artifacts")]
        artifacts: String,
        /// Title to look up (fuzzy matched)
        #[arg(long)]
        title: String,
        #[arg(long, default_value_t = 5)]
        top_n: usize,
        #[arg(long, default_value_t = DEFAULT_CUTOFF)]
        cutoff: f64,
        /// Show similarity scores
        #[arg(long, default_value_t = false)]
        scores: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureLine {
    Dense(Vec<f32>),
    Sparse { indices: Vec<u32>, values: Vec<f32> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VocabularyInput {
    Encoder(TextEncoder),
    Terms(BTreeMap<String, u32>),
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Pack { catalog, features, output, dims, normalize, vocabulary, genre_classes } => {
            pack(&catalog, &features, &output, dims, normalize, vocabulary.as_deref(), genre_classes.as_deref())
        }
        Commands::Inspect { artifacts } => inspect(&artifacts),
        Commands::Query { artifacts, title, top_n, cutoff, scores } => query(&artifacts, &title, top_n, cutoff, scores),
    }
}

fn pack(catalog: &str, features: &str, output: &str, dims: Option<usize>, normalize: bool, vocabulary: Option<&str>, genre_classes: Option<&str>) -> Result<()> {
    let books = read_catalog(Path::new(catalog))?;
    tracing::info!(books = books.len(), "catalog ingested");

    let mut matrix = read_features(Path::new(features), dims)?;
    tracing::info!(rows = matrix.rows(), dims = matrix.cols(), nnz = matrix.nnz(), "feature rows ingested");
    if matrix.rows() != books.len() {
        bail!("{} feature rows for {} books; rows must align with the catalog", matrix.rows(), books.len());
    }
    if normalize {
        matrix.normalize_rows();
    } else {
        let off = matrix.unnormalized_rows(NORM_TOLERANCE);
        if !off.is_empty() {
            tracing::warn!(count = off.len(), first = off[0], "rows are not unit length; cosine scores will be skewed (pass --normalize)");
        }
    }

    let encoders = Encoders {
        text: vocabulary.map(read_vocabulary).transpose()?,
        genres: genre_classes.map(read_genre_classes).transpose()?,
    };

    // Validate exactly what the server will load.
    let store = CatalogStore::new(books, matrix, encoders)?;

    let paths = ArtifactPaths::new(output);
    save_catalog(&paths, store.catalog().books())?;
    save_features(&paths, store.features())?;
    save_encoders(&paths, store.encoders())?;
    let meta = MetaFile {
        num_books: u32::try_from(store.catalog().len()).context("catalog has more than u32::MAX books")?,
        num_features: u32::try_from(store.features().cols()).context("feature dimensionality exceeds u32::MAX")?,
        nnz: store.features().nnz() as u64,
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: ARTIFACT_VERSION,
    };
    save_meta(&paths, &meta)?;

    tracing::info!(output, "artifacts written");
    Ok(())
}

fn inspect(artifacts: &str) -> Result<()> {
    let paths = ArtifactPaths::new(artifacts);
    let (store, meta) = load_store_with_meta(&paths)?;
    let encoders = store.encoders();
    tracing::info!(
        books = meta.num_books,
        dims = meta.num_features,
        nnz = meta.nnz,
        created_at = %meta.created_at,
        version = meta.version,
        vocabulary = encoders.text.as_ref().map_or(0, |t| t.len()),
        genre_classes = encoders.genres.as_ref().map_or(0, |g| g.classes().len()),
        "artifacts"
    );
    Ok(())
}

fn query(artifacts: &str, title: &str, top_n: usize, cutoff: f64, scores: bool) -> Result<()> {
    let title = match validate_query(title) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e}");
            return Ok(());
        }
    };
    let top_n = NonZeroUsize::new(top_n).context("--top-n must be at least 1")?;
    let store = load_store(&ArtifactPaths::new(artifacts))?;
    let rec = Recommender::with_cutoff(&store, cutoff)?;

    match rec.recommend_scored(title, top_n) {
        Ok(ranked) => {
            println!("Top recommendations for '{}':", ranked.matched_title);
            for (rank, s) in ranked.rows.iter().enumerate() {
                let Some(book) = store.catalog().get(s.row) else { continue };
                if scores {
                    println!("{:>2}. {} by {} ({:.1}) score={:.4}", rank + 1, book.title, book.author, book.rating, s.score);
                } else {
                    println!("{:>2}. {} by {} ({:.1})", rank + 1, book.title, book.author, book.rating);
                }
            }
            Ok(())
        }
        Err(e @ RecommendError::NotFound { .. }) => {
            tracing::info!(query = title, "no close title");
            eprintln!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn read_catalog(input: &Path) -> Result<Vec<Book>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("catalog input {} does not exist", input.display());
    }

    let mut books = Vec::new();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_catalog_jsonl(&file, &mut books)?;
        } else {
            read_catalog_json(&file, &mut books)?;
        }
    }
    Ok(books)
}

fn read_catalog_jsonl(file: &Path, books: &mut Vec<Book>) -> Result<()> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let book: Book = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        books.push(book);
    }
    Ok(())
}

fn read_catalog_json(file: &Path, books: &mut Vec<Book>) -> Result<()> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for (n, v) in arr.into_iter().enumerate() {
                books.push(serde_json::from_value(v).with_context(|| format!("{}: entry {n}", file.display()))?);
            }
        }
        serde_json::Value::Object(_) => books.push(serde_json::from_value(json).with_context(|| format!("{}: book", file.display()))?),
        _ => tracing::warn!(file = %file.display(), "skipping non-object JSON"),
    }
    Ok(())
}

fn read_features(file: &Path, dims: Option<usize>) -> Result<FeatureMatrix> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
    let mut rows: Vec<(Vec<u32>, Vec<f32>)> = Vec::new();
    let mut inferred = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let parsed: FeatureLine = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        let row = match parsed {
            FeatureLine::Dense(values) => {
                inferred = inferred.max(values.len());
                values.into_iter().enumerate().filter(|(_, v)| *v != 0.0).map(|(c, v)| (c as u32, v)).unzip()
            }
            FeatureLine::Sparse { indices, values } => {
                if let Some(max) = indices.iter().max() {
                    inferred = inferred.max(*max as usize + 1);
                }
                (indices, values)
            }
        };
        rows.push(row);
    }
    let n_cols = match dims {
        Some(d) if d < inferred => bail!("--dims {d} is smaller than the widest row ({inferred})"),
        Some(d) => d,
        None => inferred,
    };
    Ok(FeatureMatrix::from_sparse_rows(rows, n_cols)?)
}

fn read_vocabulary(path: &str) -> Result<TextEncoder> {
    let f = File::open(path).with_context(|| format!("opening {path}"))?;
    let parsed: VocabularyInput = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {path}"))?;
    Ok(match parsed {
        VocabularyInput::Encoder(enc) => enc,
        VocabularyInput::Terms(vocabulary) => TextEncoder { vocabulary, idf: Vec::new() },
    })
}

fn read_genre_classes(path: &str) -> Result<GenreEncoder> {
    let f = File::open(path).with_context(|| format!("opening {path}"))?;
    let classes: Vec<String> = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {path}"))?;
    Ok(GenreEncoder::new(classes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn packs_dataset_json_with_joined_genres() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join("books.json");
        fs::write(
            &catalog,
            r#"[
                {"Book Name":"Atomic Habits","Author":"James Clear","Rating":4.8,"Number of Reviews":120,
                 "Price":699.0,"Genres":"Self Help, Productivity","Listening Time Minutes":335},
                {"Book Name":"Deep Work","Author":"Cal Newport","Rating":4.6,"Number of Reviews":80,
                 "Price":599.0,"Genres":"Productivity","Listening Time Minutes":460}
            ]"#,
        )
        .unwrap();
        let features = dir.path().join("features.jsonl");
        fs::write(&features, "[3.0, 4.0]\n{\"indices\": [1], \"values\": [2.0]}\n").unwrap();
        let out = dir.path().join("artifacts");

        pack(catalog.to_str().unwrap(), features.to_str().unwrap(), out.to_str().unwrap(), None, true, None, None).unwrap();

        let (store, meta) = load_store_with_meta(&ArtifactPaths::new(&out)).unwrap();
        assert_eq!(meta.num_books, 2);
        assert_eq!(meta.num_features, 2);
        let first = store.catalog().get(0).unwrap();
        assert_eq!(first.title, "Atomic Habits");
        assert_eq!(first.genres, vec!["Self Help".to_string(), "Productivity".to_string()]);
        assert_eq!(store.catalog().get(1).unwrap().genres, vec!["Productivity".to_string()]);
        assert!(store.features().is_row_normalized(1e-5));
    }

    #[test]
    fn misaligned_feature_rows_abort_packing() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join("books.jsonl");
        fs::write(&catalog, "{\"title\":\"Solo\",\"author\":\"A\",\"rating\":4.0}\n").unwrap();
        let features = dir.path().join("features.jsonl");
        fs::write(&features, "[1.0]\n[1.0]\n").unwrap();
        let out = dir.path().join("artifacts");

        let err = pack(catalog.to_str().unwrap(), features.to_str().unwrap(), out.to_str().unwrap(), None, false, None, None).unwrap_err();
        assert!(err.to_string().contains("must align"));
        assert!(!out.join("catalog.bin").exists());
    }

    #[test]
    fn malformed_catalog_json_names_the_file() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join("broken.json");
        fs::write(&catalog, "[{\"title\": 1}]").unwrap();
        let err = read_catalog(&catalog).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
