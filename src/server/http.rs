// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::error;
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;

use virus_scanner_service::delta::ChangeDelta;
use virus_scanner_service::pipeline::{DeltaAck, Pipeline, ScanRequestError};
use virus_scanner_service::recorder::AnalysisDocument;
use virus_scanner_service::scanner::VirusScanner;
use virus_scanner_service::sparql::TripleStore;

const GREETING: &str = "Hello from virus-scanner-service";

type AppState<S, V> = State<Arc<Pipeline<S, V>>>;

/// Routes of the service. Request bodies up to `max_body_size` bytes are
/// accepted, and a panicking handler answers 500.
pub fn router<S, V>(pipeline: Arc<Pipeline<S, V>>, max_body_size: usize) -> Router
where
    S: TripleStore + 'static,
    V: VirusScanner + 'static,
{
    Router::new()
        .route("/", get(hello))
        .route("/delta", post(delta::<S, V>))
        .route("/scan", post(scan::<S, V>))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CatchPanicLayer::new())
        .with_state(pipeline)
}

async fn hello() -> &'static str {
    GREETING
}

/// Delta notifications are acknowledged before any scanning happens.
async fn delta<S, V>(State(pipeline): AppState<S, V>, Json(delta): Json<ChangeDelta>) -> StatusCode
where
    S: TripleStore + 'static,
    V: VirusScanner + 'static,
{
    match pipeline.handle_delta(&delta) {
        DeltaAck::NoInserts | DeltaAck::NoFiles => StatusCode::NO_CONTENT,
        DeltaAck::Accepted { .. } => StatusCode::ACCEPTED,
    }
}

/// A body that is not declared as JSON carries no `file`.
async fn scan<S, V>(
    State(pipeline): AppState<S, V>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<AnalysisDocument>), (StatusCode, String)>
where
    S: TripleStore + 'static,
    V: VirusScanner + 'static,
{
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => {
            let e = ScanRequestError::MissingFile;
            return Err((status_for(&e), e.to_string()));
        }
        Err(rejection) => return Err((rejection.status(), rejection.body_text())),
    };

    match pipeline.scan_single(&body).await {
        Ok(recorded) => Ok((StatusCode::CREATED, Json(recorded.to_document()))),
        Err(e) => Err((status_for(&e), e.to_string())),
    }
}

fn status_for(e: &ScanRequestError) -> StatusCode {
    match e {
        ScanRequestError::MissingFile | ScanRequestError::InvalidFile(_) => StatusCode::BAD_REQUEST,
        ScanRequestError::PhysicalFile(_) | ScanRequestError::Unresolved(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ScanRequestError::Storage(inner) => {
            error!("Scan request failed: {inner}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
