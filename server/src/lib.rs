use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use recsys_core::error::RecommendError;
use recsys_core::fuzzy::{validate_cutoff, DEFAULT_CUTOFF};
use recsys_core::persist::{load_store, ArtifactPaths};
use recsys_core::recommend::validate_query;
use recsys_core::stats::{chart_data, Chart, ChartData};
use recsys_core::{Book, CatalogStore, Recommender};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub artifacts: PathBuf,
    pub cutoff: f64,
    pub default_top_n: usize,
    pub max_top_n: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { artifacts: PathBuf::from("./artifacts"), cutoff: DEFAULT_CUTOFF, default_top_n: 5, max_top_n: 100 }
    }
}

#[derive(Deserialize)]
pub struct RecommendParams {
    #[serde(default)]
    pub q: String,
    pub k: Option<usize>,
    #[serde(default)]
    pub scores: bool,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub query: String,
    pub matched_title: String,
    pub took_s: f64,
    pub results: Vec<RecommendHit>,
}

#[derive(Serialize)]
pub struct RecommendHit {
    pub title: String,
    pub author: String,
    pub rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Serialize)]
pub struct MetaResponse {
    pub books: usize,
    pub dims: usize,
    pub nnz: usize,
    pub vocabulary: usize,
    pub genre_classes: usize,
    pub cutoff: f64,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: impl ToString, query: Option<String>) -> ApiError {
    (status, Json(ErrorBody { error: error.to_string(), query }))
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CatalogStore>,
    pub cutoff: f64,
    pub default_top_n: usize,
    pub max_top_n: usize,
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    // Inconsistent artifacts stop startup here.
    let store = load_store(&ArtifactPaths::new(&config.artifacts))?;
    build_app_with_store(Arc::new(store), &config)
}

pub fn build_app_with_store(store: Arc<CatalogStore>, config: &ServerConfig) -> Result<Router> {
    let cutoff = validate_cutoff(config.cutoff)?;
    let max_top_n = config.max_top_n.max(1);
    let app_state = AppState {
        store,
        cutoff,
        default_top_n: config.default_top_n.clamp(1, max_top_n),
        max_top_n,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/recommend", get(recommend_handler))
        .route("/book/:row", get(book_handler))
        .route("/eda", get(charts_handler))
        .route("/eda/:chart", get(chart_handler))
        .route("/meta", get(meta_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn recommend_handler(State(state): State<AppState>, Query(params): Query<RecommendParams>) -> Result<Json<RecommendResponse>, ApiError> {
    let start = std::time::Instant::now();
    let query = validate_query(&params.q).map_err(|e| api_error(StatusCode::BAD_REQUEST, e, None))?;
    let k = params.k.unwrap_or(state.default_top_n).clamp(1, state.max_top_n);
    let top_n = NonZeroUsize::new(k).unwrap_or(NonZeroUsize::MIN);

    let rec = Recommender::with_cutoff(&state.store, state.cutoff).map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e, None))?;
    let ranked = match rec.recommend_scored(query, top_n) {
        Ok(r) => r,
        Err(e @ RecommendError::NotFound { .. }) => {
            tracing::info!(query, "no close title");
            return Err(api_error(StatusCode::NOT_FOUND, e, Some(query.to_string())));
        }
        Err(e) => return Err(api_error(StatusCode::BAD_REQUEST, e, Some(query.to_string()))),
    };

    let results = rec
        .project(&ranked.rows)
        .into_iter()
        .zip(&ranked.rows)
        .map(|(r, s)| RecommendHit { title: r.title, author: r.author, rating: r.rating, score: params.scores.then_some(s.score) })
        .collect();

    let elapsed = start.elapsed();
    tracing::debug!(query, matched = %ranked.matched_title, k, took_s = elapsed.as_secs_f64(), "recommendation served");
    Ok(Json(RecommendResponse { query: query.to_string(), matched_title: ranked.matched_title, took_s: elapsed.as_secs_f64(), results }))
}

pub async fn book_handler(State(state): State<AppState>, Path(row): Path<u32>) -> Result<Json<Book>, ApiError> {
    state
        .store
        .catalog()
        .get(row)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "not found", None))
}

pub async fn charts_handler() -> Json<Vec<&'static str>> {
    Json(Chart::ALL.iter().map(|c| c.name()).collect())
}

pub async fn chart_handler(State(state): State<AppState>, Path(chart): Path<String>) -> Result<Json<ChartData>, ApiError> {
    let chart: Chart = chart.parse().map_err(|e| api_error(StatusCode::NOT_FOUND, e, None))?;
    Ok(Json(chart_data(state.store.catalog(), chart)))
}

pub async fn meta_handler(State(state): State<AppState>) -> Json<MetaResponse> {
    let store = &state.store;
    let encoders = store.encoders();
    Json(MetaResponse {
        books: store.catalog().len(),
        dims: store.features().cols(),
        nnz: store.features().nnz(),
        vocabulary: encoders.text.as_ref().map_or(0, |t| t.len()),
        genre_classes: encoders.genres.as_ref().map_or(0, |g| g.classes().len()),
        cutoff: state.cutoff,
    })
}
