//! HTTP façade over published artifacts.
//!
//! Handlers read artifacts from the data directory on every request and
//! return them as-is, or lightly filtered (year cutoff, category, top-N).
//! Failures come back as `{"error": "..."}`: 404 when an artifact was never
//! published, 500 when it cannot be read or parsed.

use crate::keywords::{CategoryKeywords, TopTerm, TopTermsDocument};
use crate::output;
use crate::recent::RecentAbstract;
use crate::trends::TrendTable;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared server state
#[derive(Debug, Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub cutoff_year: i32,
}

/// Structured API failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Artifact has not been published
    NotAvailable(String),
    /// Artifact exists but cannot be read or parsed
    Corrupt(String),
    /// Request parameters are invalid
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotAvailable(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Corrupt(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// `/top_terms` result size when `top_n` is not given
pub const DEFAULT_TOP_TERMS: usize = 10;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the router with all dashboard routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/trends", get(trends_handler))
        .route("/category_distribution", get(category_distribution_handler))
        .route("/stats", get(stats_handler))
        .route("/forecast", get(forecast_handler))
        .route("/top_keywords", get(top_keywords_handler))
        .route("/top_terms", get(top_terms_handler))
        .route("/co_occurrence", get(co_occurrence_handler))
        .route("/recent_abstracts", get(recent_abstracts_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn read_artifact(state: &AppState, name: &str, label: &str) -> Result<Vec<u8>, ApiError> {
    let path = state.data_dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Artifact not published");
            Err(ApiError::NotAvailable(format!("{} not available", label)))
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read artifact");
            Err(ApiError::Corrupt(format!("{} unreadable: {}", label, e)))
        }
    }
}

async fn load_json<T: DeserializeOwned>(
    state: &AppState,
    name: &str,
    label: &str,
) -> Result<T, ApiError> {
    let bytes = read_artifact(state, name, label).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        error!(artifact = name, error = %e, "Corrupt artifact");
        ApiError::Corrupt(format!("{} corrupt: {}", label, e))
    })
}

/// Health check endpoint
pub async fn health_handler() -> &'static str {
    "OK"
}

/// Category × year table, years up to the cutoff
pub async fn trends_handler(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let bytes = read_artifact(&state, output::TRENDS_CSV, "Trend data").await?;
    let table = TrendTable::read_csv(bytes.as_slice()).map_err(|e| {
        error!(error = %e, "Corrupt trend table");
        ApiError::Corrupt(format!("Trend data corrupt: {}", e))
    })?;
    Ok(Json(json!({ "trends": table.records_through(state.cutoff_year) })))
}

pub async fn category_distribution_handler(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    load_json(&state, output::CATEGORY_DISTRIBUTION, "Category distribution")
        .await
        .map(Json)
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    load_json(&state, output::DASHBOARD_STATS, "Dashboard stats")
        .await
        .map(Json)
}

pub async fn forecast_handler(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    load_json(&state, output::FORECAST_DATA, "Forecast data")
        .await
        .map(Json)
}

pub async fn co_occurrence_handler(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    load_json(&state, output::CO_OCCURRENCE, "Co-occurrence data")
        .await
        .map(Json)
}

/// Optional category filter
#[derive(Debug, Default, Deserialize)]
pub struct KeywordQuery {
    pub category: Option<String>,
}

pub async fn top_keywords_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeywordQuery>,
) -> ApiResult<Vec<CategoryKeywords>> {
    let mut lists: Vec<CategoryKeywords> =
        load_json(&state, output::TOP_KEYWORDS, "Keyword data").await?;
    if let Some(category) = non_empty(query.category.as_deref()) {
        lists.retain(|l| l.category == category);
    }
    Ok(Json(lists))
}

/// Category filter and result size, both optional.
///
/// `top_n` is capped by what the pipeline published: `global_top_n` terms
/// without a category, `category_top_n` with one.
#[derive(Debug, Default, Deserialize)]
pub struct TopTermsQuery {
    pub category: Option<String>,
    pub top_n: Option<String>,
}

pub async fn top_terms_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopTermsQuery>,
) -> ApiResult<Vec<TopTerm>> {
    let top_n = match non_empty(query.top_n.as_deref()) {
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
            ApiError::BadRequest(format!("top_n must be a non-negative integer, got '{}'", raw))
        })?),
        None => None,
    };
    let document: TopTermsDocument = load_json(&state, output::TOP_TERMS, "Top terms").await?;
    let ranking = document.ranking(non_empty(query.category.as_deref()));
    let n = top_n.unwrap_or(DEFAULT_TOP_TERMS).min(ranking.len());
    Ok(Json(ranking[..n].to_vec()))
}

/// Recent abstracts, years up to the cutoff
pub async fn recent_abstracts_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<RecentAbstract>> {
    let mut recent: Vec<RecentAbstract> =
        load_json(&state, output::RECENT_ABSTRACTS, "Recent abstracts").await?;
    recent.retain(|r| r.year <= state.cutoff_year);
    Ok(Json(recent))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::CategoryTopTerms;
    use crate::output::write_json_atomic;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> Arc<AppState> {
        Arc::new(AppState {
            data_dir: dir.path().to_path_buf(),
            cutoff_year: 2024,
        })
    }

    fn top_term(term: &str, count: u64, category: &str) -> TopTerm {
        TopTerm {
            term: term.to_string(),
            count,
            category: category.to_string(),
            references: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_available() {
        let dir = TempDir::new().expect("temp dir");
        let result = stats_handler(State(state(&dir))).await;
        assert_eq!(
            result.err(),
            Some(ApiError::NotAvailable("Dashboard stats not available".to_string()))
        );
    }

    #[tokio::test]
    async fn test_corrupt_artifact() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join(output::FORECAST_DATA), "{not json").expect("write");
        let result = forecast_handler(State(state(&dir))).await;
        assert!(matches!(result, Err(ApiError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_trends_filtered_to_cutoff() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(
            dir.path().join(output::TRENDS_CSV),
            "Year,Oncology\n2023,4\n2024,5\n2025,9\n",
        )
        .expect("write");
        let Json(body) = trends_handler(State(state(&dir))).await.expect("trends");
        let rows = body["trends"].as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["Year"], json!(2024));
        assert_eq!(rows[1]["Oncology"], json!(5));
    }

    #[tokio::test]
    async fn test_top_terms_filters() {
        let dir = TempDir::new().expect("temp dir");
        let document = TopTermsDocument {
            global: vec![top_term("tumor", 9, "Oncology"), top_term("ecg", 6, "Cardiology")],
            categories: vec![
                CategoryTopTerms {
                    category: "Oncology".to_string(),
                    terms: vec![
                        top_term("tumor", 9, "Oncology"),
                        top_term("cancer", 5, "Oncology"),
                    ],
                },
                CategoryTopTerms {
                    category: "Cardiology".to_string(),
                    terms: vec![top_term("ecg", 6, "Cardiology")],
                },
            ],
        };
        write_json_atomic(dir.path(), output::TOP_TERMS, &document).expect("publish");

        let query = TopTermsQuery {
            category: Some("Oncology".to_string()),
            top_n: Some("1".to_string()),
        };
        let Json(body) = top_terms_handler(State(state(&dir)), Query(query))
            .await
            .expect("top terms");
        assert_eq!(body, vec![top_term("tumor", 9, "Oncology")]);

        let bad = TopTermsQuery {
            category: None,
            top_n: Some("ten".to_string()),
        };
        let result = top_terms_handler(State(state(&dir)), Query(bad)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_top_terms_category_outside_global_ranking() {
        let dir = TempDir::new().expect("temp dir");
        let oncology: Vec<TopTerm> = (0..12u64)
            .map(|i| top_term(&format!("onc{}", i), 111 - i, "Oncology"))
            .collect();
        let document = TopTermsDocument {
            global: oncology[..10].to_vec(),
            categories: vec![
                CategoryTopTerms {
                    category: "Oncology".to_string(),
                    terms: oncology.clone(),
                },
                CategoryTopTerms {
                    category: "Cardiology".to_string(),
                    terms: vec![top_term("ecg", 5, "Cardiology")],
                },
            ],
        };
        write_json_atomic(dir.path(), output::TOP_TERMS, &document).expect("publish");

        let query = TopTermsQuery {
            category: Some("Cardiology".to_string()),
            top_n: None,
        };
        let Json(body) = top_terms_handler(State(state(&dir)), Query(query))
            .await
            .expect("top terms");
        assert_eq!(body, vec![top_term("ecg", 5, "Cardiology")]);

        let query = TopTermsQuery {
            category: Some("Oncology".to_string()),
            top_n: Some("12".to_string()),
        };
        let Json(body) = top_terms_handler(State(state(&dir)), Query(query))
            .await
            .expect("top terms");
        assert_eq!(body.len(), 12);

        let Json(body) = top_terms_handler(State(state(&dir)), Query(TopTermsQuery::default()))
            .await
            .expect("top terms");
        assert_eq!(body.len(), 10);
    }

    #[tokio::test]
    async fn test_recent_abstracts_cutoff() {
        let dir = TempDir::new().expect("temp dir");
        let recent = vec![
            RecentAbstract {
                title: "future".to_string(),
                year: 2026,
                pmid: "9".to_string(),
            },
            RecentAbstract {
                title: "gene".to_string(),
                year: 2024,
                pmid: "1".to_string(),
            },
        ];
        write_json_atomic(dir.path(), output::RECENT_ABSTRACTS, &recent).expect("publish");
        let Json(body) = recent_abstracts_handler(State(state(&dir)))
            .await
            .expect("recent");
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].pmid, "1");
    }

    #[tokio::test]
    async fn test_top_keywords_category_filter() {
        let dir = TempDir::new().expect("temp dir");
        let lists = vec![
            CategoryKeywords {
                category: "Oncology".to_string(),
                keywords: Vec::new(),
            },
            CategoryKeywords {
                category: "Neurology".to_string(),
                keywords: Vec::new(),
            },
        ];
        write_json_atomic(dir.path(), output::TOP_KEYWORDS, &lists).expect("publish");
        let query = KeywordQuery {
            category: Some("Neurology".to_string()),
        };
        let Json(body) = top_keywords_handler(State(state(&dir)), Query(query))
            .await
            .expect("keywords");
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].category, "Neurology");
    }
}
