//! HTTP surface: one crawl per request.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crawler::{
    CancelHandle, CancelReason, CrawlError, CrawlOutcome, CrawlRequest, CrawlResult,
    ScrapingService,
};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct PartialBody {
    #[serde(flatten)]
    result: CrawlResult,
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

pub fn router(service: Arc<ScrapingService>) -> Router {
    Router::new()
        .route("/api/scrape", post(scrape_handler))
        .route("/health", get(health_handler))
        .with_state(service)
}

pub async fn serve(cfg: &Config, service: Arc<ScrapingService>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn scrape_handler(
    State(service): State<Arc<ScrapingService>>,
    body: Result<Json<CrawlRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if let Err(e) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, e);
    }

    let cancel = CancelHandle::new();
    // Dropped with this future when the client goes away.
    let guard = cancel.cancel_on_drop();

    let run = tokio::spawn({
        let service = Arc::clone(&service);
        let cancel = cancel.clone();
        async move { service.run(&req, &cancel, None).await }
    });

    let joined = run.await;
    guard.disarm();

    match joined {
        Ok(Ok(CrawlOutcome::Completed(result))) => (StatusCode::OK, Json(result)).into_response(),
        Ok(Ok(CrawlOutcome::Cancelled { reason, partial })) => {
            warn!(?reason, kept = partial.total_count, "Crawl cancelled");
            let error = match reason {
                CancelReason::Deadline => "run deadline exceeded",
                CancelReason::Requested => "run cancelled",
            };
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(PartialBody {
                    result: partial,
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
        Ok(Err(CrawlError::Invalid(e))) => error_response(StatusCode::BAD_REQUEST, e),
        Ok(Err(e)) => {
            error!(error = %e, "Crawl failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Err(e) => {
            error!(error = %e, "Crawl task aborted");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "crawl task aborted")
        }
    }
}
