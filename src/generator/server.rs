// HTTP surface of the mock price generator
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::prices::PriceBook;

#[derive(Debug, Deserialize)]
pub struct PriceParams {
    pub asset_name: Option<String>,
    pub market: Option<String>,
}

pub fn app(book: Arc<PriceBook>) -> axum::Router {
    axum::Router::new()
        .route("/price", get(price))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(book)
}

pub async fn serve<F>(listener: TcpListener, book: Arc<PriceBook>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = ?listener.local_addr()?, "Price generator listening");
    axum::serve(listener, app(book)).with_graceful_shutdown(shutdown).await
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// Missing or blank query fields, reported like a validation error.
fn missing_fields(fields: &[&str]) -> Response {
    let detail: Vec<_> = fields
        .iter()
        .map(|field| {
            json!({
                "type": "missing",
                "loc": ["query", field],
                "msg": "Field required",
                "input": null,
            })
        })
        .collect();
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": detail }))).into_response()
}

async fn price(State(book): State<Arc<PriceBook>>, Query(params): Query<PriceParams>) -> Response {
    let (asset, market) = match (present(params.asset_name), present(params.market)) {
        (Some(asset), Some(market)) => (asset, market),
        (None, Some(_)) => return missing_fields(&["asset_name"]),
        (Some(_), None) => return missing_fields(&["market"]),
        (None, None) => return missing_fields(&["asset_name", "market"]),
    };

    match book.quote(&asset, &market) {
        Ok(quote) => Json(quote).into_response(),
        Err(e) => {
            debug!(asset = %asset, market = %market, error = %e, "Rejected price request");
            (StatusCode::NOT_FOUND, Json(json!({ "detail": e.to_string() }))).into_response()
        }
    }
}
