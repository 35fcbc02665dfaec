//! API route definitions.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::analysis::render::{render_anomalies, render_history, render_point};
use crate::analysis::timeline::build_timeline;
use crate::analysis::analyze_patterns;
use crate::storage;
use crate::telemetry::validate::validate_point;
use crate::telemetry::TelemetryPoint;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/ingest/batch", post(ingest_batch))
        .route("/anomalies", get(anomalies))
        .route("/anomalies/history", get(anomaly_history))
        .route("/patterns", get(patterns))
        .route("/analysis/context", get(analysis_context))
}

/// Run a storage call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(result?)
}

async fn latest_or_404(state: &AppState) -> Result<TelemetryPoint, ApiError> {
    let pool = state.pool.clone();
    blocking(move || storage::latest_point(&pool))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(
                "no metrics available, ingest metrics first using POST /api/v1/ingest".to_string(),
            )
        })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn ingest(State(state): State<AppState>, Json(payload): Json<Value>) -> Result<Json<Value>, ApiError> {
    let point = validate_point(&payload).map_err(ApiError::Invalid)?;

    let pool = state.pool.clone();
    let stored = point.clone();
    let id = blocking(move || storage::save_point(&pool, &stored)).await?;
    info!(id, timestamp = point.timestamp().unwrap_or("-"), "metrics ingested");

    Ok(Json(json!({ "data": point, "meta": { "id": id } })))
}

async fn ingest_batch(
    State(state): State<AppState>,
    Json(payloads): Json<Vec<Value>>,
) -> Result<Json<Value>, ApiError> {
    let mut valid = Vec::with_capacity(payloads.len());
    let mut rejected = Vec::new();
    for (index, payload) in payloads.iter().enumerate() {
        match validate_point(payload) {
            Ok(point) => valid.push(point),
            Err(issues) => {
                warn!(index, issues = issues.len(), "batch entry failed validation");
                rejected.push(json!({ "index": index, "errors": issues }));
            }
        }
    }

    let pool = state.pool.clone();
    let stored = blocking(move || storage::save_points(&pool, &valid)).await?;
    info!(stored, failed = rejected.len(), "batch ingestion complete");

    Ok(Json(json!({
        "data": { "stored": stored, "failed": rejected.len() },
        "meta": { "rejected": rejected }
    })))
}

async fn anomalies(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let point = latest_or_404(&state).await?;
    let result = state.evaluator.evaluate(&point);
    info!(summary = %result.summary, "anomaly detection completed");

    Ok(Json(json!({
        "data": result,
        "meta": { "timestamp": point.timestamp() }
    })))
}

async fn anomaly_history(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.evaluator.history_summary() }))
}

#[derive(Debug, Deserialize)]
struct PatternQuery {
    points: Option<usize>,
}

async fn patterns(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Result<Json<Value>, ApiError> {
    let batch = &state.config.batch;
    let requested = query.points.unwrap_or(batch.default_points);
    if !(batch.min_points..=batch.max_points).contains(&requested) {
        return Err(ApiError::BadRequest(format!(
            "points must be between {} and {}",
            batch.min_points, batch.max_points
        )));
    }

    let pool = state.pool.clone();
    let points = blocking(move || storage::recent_points(&pool, requested)).await?;
    if points.len() < batch.min_points {
        return Err(ApiError::NotFound(format!(
            "need at least {} stored points for pattern analysis, found {}",
            batch.min_points,
            points.len()
        )));
    }

    let timeline = if batch.shared_history {
        state.evaluator.replay(&points)
    } else {
        build_timeline(state.catalog.clone(), &points)
    };
    let report = analyze_patterns(&timeline);

    Ok(Json(json!({
        "data": { "timeline": timeline, "patterns": report },
        "meta": {
            "request_id": Uuid::new_v4(),
            "points": points.len(),
            "shared_history": batch.shared_history
        }
    })))
}

async fn analysis_context(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let point = latest_or_404(&state).await?;
    let result = state.evaluator.evaluate(&point);
    let history = state.evaluator.history_summary();

    Ok(Json(json!({
        "data": {
            "metrics": render_point(&point),
            "anomalies": render_anomalies(&result),
            "history": render_history(&history)
        },
        "meta": {
            "anomaly_count": result.total_count,
            "critical_anomalies": result.critical_count(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }
    })))
}
