//! Aggregations behind the dashboard's exploratory charts.

use crate::catalog::Catalog;
use crate::error::StatsError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const RATING_BINS: usize = 20;
pub const REVIEW_BINS: usize = 50;
pub const PRICE_BINS: usize = 30;
pub const TOP_GENRES: usize = 20;

/// Columns of the correlation matrix, in order.
pub const CORRELATION_COLUMNS: [&str; 4] = ["rating", "reviews", "price", "listening_minutes"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chart {
    RatingDistribution,
    ReviewDistribution,
    PriceDistribution,
    TopGenres,
    FeatureCorrelation,
    ListeningTimeVsRating,
}

impl Chart {
    pub const ALL: [Chart; 6] = [
        Chart::RatingDistribution,
        Chart::ReviewDistribution,
        Chart::PriceDistribution,
        Chart::TopGenres,
        Chart::FeatureCorrelation,
        Chart::ListeningTimeVsRating,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Chart::RatingDistribution => "rating-distribution",
            Chart::ReviewDistribution => "review-distribution",
            Chart::PriceDistribution => "price-distribution",
            Chart::TopGenres => "top-genres",
            Chart::FeatureCorrelation => "feature-correlation",
            Chart::ListeningTimeVsRating => "listening-time-vs-rating",
        }
    }
}

impl fmt::Display for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Chart {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chart::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| StatsError::UnknownChart(s.to_string()))
    }
}

/// `counts[i]` covers `[edges[i], edges[i + 1])`; the last bin is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// `None` where a column has no variance.
    pub values: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ChartData {
    Histogram(Histogram),
    Bars(Vec<GenreCount>),
    Correlation(CorrelationMatrix),
    Scatter(Vec<Point>),
}

pub fn chart_data(catalog: &Catalog, chart: Chart) -> ChartData {
    match chart {
        Chart::RatingDistribution => {
            let v: Vec<f64> = catalog.iter().map(|b| b.rating).collect();
            ChartData::Histogram(histogram(&v, RATING_BINS))
        }
        Chart::ReviewDistribution => {
            let v: Vec<f64> = catalog.iter().map(|b| b.reviews as f64 + 1.0).collect();
            ChartData::Histogram(log_histogram(&v, REVIEW_BINS))
        }
        Chart::PriceDistribution => {
            let v: Vec<f64> = catalog.iter().map(|b| b.price).collect();
            ChartData::Histogram(histogram(&v, PRICE_BINS))
        }
        Chart::TopGenres => ChartData::Bars(top_genres(catalog, TOP_GENRES)),
        Chart::FeatureCorrelation => ChartData::Correlation(correlation_matrix(catalog)),
        Chart::ListeningTimeVsRating => ChartData::Scatter(
            catalog
                .iter()
                .map(|b| Point { x: b.listening_minutes as f64, y: b.rating })
                .collect(),
        ),
    }
}

/// Equal-width histogram over the finite values' range.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let Some((mut lo, mut hi)) = min_max(&finite) else {
        return Histogram { edges: Vec::new(), counts: Vec::new() };
    };
    if bins == 0 {
        return Histogram { edges: Vec::new(), counts: Vec::new() };
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
    let mut counts = vec![0u64; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Histogram { edges, counts }
}

/// Histogram whose edges are evenly spaced in log10. Non-positive values are skipped.
pub fn log_histogram(values: &[f64], bins: usize) -> Histogram {
    let logs: Vec<f64> = values.iter().filter(|v| **v > 0.0).map(|v| v.log10()).collect();
    let h = histogram(&logs, bins);
    Histogram { edges: h.edges.into_iter().map(|e| 10f64.powf(e)).collect(), counts: h.counts }
}

/// Most common genres; equal counts keep first-seen order.
pub fn top_genres(catalog: &Catalog, n: usize) -> Vec<GenreCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for genre in catalog.iter().flat_map(|b| b.genres.iter()) {
        let c = counts.entry(genre.as_str()).or_insert_with(|| {
            order.push(genre.as_str());
            0
        });
        *c += 1;
    }
    let mut ranked: Vec<GenreCount> = order
        .into_iter()
        .map(|g| GenreCount { genre: g.to_string(), count: counts[g] })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(n);
    ranked
}

pub fn correlation_matrix(catalog: &Catalog) -> CorrelationMatrix {
    let cols: [Vec<f64>; 4] = [
        catalog.iter().map(|b| b.rating).collect(),
        catalog.iter().map(|b| b.reviews as f64).collect(),
        catalog.iter().map(|b| b.price).collect(),
        catalog.iter().map(|b| b.listening_minutes as f64).collect(),
    ];
    let values = cols
        .iter()
        .map(|x| cols.iter().map(|y| pearson(x, y)).collect::<Vec<_>>())
        .collect();
    CorrelationMatrix { columns: CORRELATION_COLUMNS.iter().map(|c| c.to_string()).collect(), values }
}

/// Pearson correlation; `None` for fewer than two points or zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(values.iter().fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))))
}
