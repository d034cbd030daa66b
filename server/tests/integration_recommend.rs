use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use recsys_core::persist::{save_catalog, save_features, save_meta, ArtifactPaths, MetaFile, ARTIFACT_VERSION};
use recsys_core::{Book, FeatureMatrix};
use recsys_server::{build_app, ServerConfig};
use serde_json::Value;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_artifacts(dir: &std::path::Path) {
    let paths = ArtifactPaths::new(dir);
    let book = |title: &str, author: &str, rating: f64, genres: &[&str]| Book {
        title: title.into(),
        author: author.into(),
        rating,
        reviews: 250,
        price: 499.0,
        genres: genres.iter().map(|g| g.to_string()).collect(),
        listening_minutes: 320,
    };
    let books = vec![
        book("Atomic Habits", "James Clear", 4.8, &["Self Help", "Productivity"]),
        book("Deep Work", "Cal Newport", 4.6, &["Productivity"]),
        book("Make Time", "Jake Knapp", 4.3, &["Productivity"]),
    ];
    save_catalog(&paths, &books).unwrap();

    // Unit rows: Deep Work is the nearer neighbour of Atomic Habits.
    let features = FeatureMatrix::from_sparse_rows(
        vec![(vec![0], vec![1.0]), (vec![0, 1], vec![0.8, 0.6]), (vec![0, 2], vec![0.6, 0.8])],
        3,
    )
    .unwrap();
    save_features(&paths, &features).unwrap();

    let meta = MetaFile { num_books: 3, num_features: 3, nnz: 5, created_at: "2024-01-01T00:00:00Z".into(), version: ARTIFACT_VERSION };
    save_meta(&paths, &meta).unwrap();
}

fn app_for(dir: &std::path::Path) -> Router {
    build_app(ServerConfig { artifacts: dir.to_path_buf(), ..ServerConfig::default() }).unwrap()
}

async fn call(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

#[tokio::test]
async fn recommend_returns_ranked_neighbours() {
    let dir = tempdir().unwrap();
    build_tiny_artifacts(dir.path());

    let (status, body) = call(app_for(dir.path()), "/recommend?q=atomic%20habit&k=5").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["matched_title"], "Atomic Habits");
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["title"], "Deep Work");
    assert_eq!(arr[1]["title"], "Make Time");
    assert!(arr[0].get("score").is_none());
}

#[tokio::test]
async fn scores_are_opt_in() {
    let dir = tempdir().unwrap();
    build_tiny_artifacts(dir.path());

    let (status, body) = call(app_for(dir.path()), "/recommend?q=Deep%20Work&k=1&scores=true").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["title"], "Atomic Habits");
    assert!((arr[0]["score"].as_f64().unwrap() - 0.8).abs() < 1e-6);
}

#[tokio::test]
async fn scores_line_up_with_their_books() {
    let dir = tempdir().unwrap();
    build_tiny_artifacts(dir.path());

    let (status, body) = call(app_for(dir.path()), "/recommend?q=atomic%20habit&k=2&scores=true").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr[0]["title"], "Deep Work");
    assert_eq!(arr[0]["author"], "Cal Newport");
    assert!((arr[0]["score"].as_f64().unwrap() - 0.8).abs() < 1e-6);
    assert_eq!(arr[1]["title"], "Make Time");
    assert!((arr[1]["score"].as_f64().unwrap() - 0.6).abs() < 1e-6);
}

#[tokio::test]
async fn unknown_title_is_404_and_blank_is_400() {
    let dir = tempdir().unwrap();
    build_tiny_artifacts(dir.path());

    let (status, body) = call(app_for(dir.path()), "/recommend?q=xyzxyz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["query"], "xyzxyz");
    assert_eq!(json["error"], "Book 'xyzxyz' not found or no close match.");

    let (status, _) = call(app_for(dir.path()), "/recommend?q=%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(app_for(dir.path()), "/recommend").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn eda_and_book_endpoints() {
    let dir = tempdir().unwrap();
    build_tiny_artifacts(dir.path());

    let (status, body) = call(app_for(dir.path()), "/eda").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert!(names.contains(&"top-genres".to_string()));

    let (status, body) = call(app_for(dir.path()), "/eda/top-genres").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["kind"], "bars");
    assert_eq!(json["data"][0]["genre"], "Productivity");
    assert_eq!(json["data"][0]["count"], 3);

    let (status, _) = call(app_for(dir.path()), "/eda/pie-chart").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(app_for(dir.path()), "/book/1").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["author"], "Cal Newport");

    let (status, _) = call(app_for(dir.path()), "/book/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn inconsistent_artifacts_fail_startup() {
    let dir = tempdir().unwrap();
    build_tiny_artifacts(dir.path());
    let paths = ArtifactPaths::new(dir.path());
    save_features(&paths, &FeatureMatrix::from_dense_rows(&[vec![1.0]]).unwrap()).unwrap();
    assert!(build_app(ServerConfig { artifacts: dir.path().to_path_buf(), ..ServerConfig::default() }).is_err());
}
