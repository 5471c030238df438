use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use fxwatch_core::domain::currency::CurrencyCode;
use fxwatch_core::domain::snapshot::AVERAGE_WINDOW;
use fxwatch_core::domain::subscription::{NewSubscription, Subscription};
use fxwatch_core::error::{IngestError, ValidationError};
use fxwatch_core::notify::{NotificationEngine, WebhookDispatcher};
use fxwatch_core::storage::Storage;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    pub storage: Option<Arc<dyn Storage>>,
    pub dispatcher: Arc<dyn WebhookDispatcher>,
    pub supported_bases: Vec<CurrencyCode>,
}

impl AppState {
    fn storage(&self) -> Result<&Arc<dyn Storage>, ApiError> {
        self.storage.as_ref().ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "storage is unavailable".to_string(),
        ))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/exchange", post(register_webhook))
        .route("/exchange/latest", post(get_latest))
        .route("/exchange/average", post(get_average))
        .route("/exchange/evaluationtrigger", get(evaluation_trigger))
        .route(
            "/exchange/:id",
            get(get_webhook).delete(delete_webhook),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct PairRequest {
    #[serde(rename = "baseCurrency")]
    base_currency: String,
    #[serde(rename = "targetCurrency")]
    target_currency: String,
}

impl PairRequest {
    fn codes(&self) -> Result<(CurrencyCode, CurrencyCode), ApiError> {
        let base = self.base_currency.parse::<CurrencyCode>().map_err(bad_request)?;
        let target = self.target_currency.parse::<CurrencyCode>().map_err(bad_request)?;
        Ok((base, target))
    }
}

async fn register_webhook(
    State(state): State<AppState>,
    payload: Result<Json<NewSubscription>, JsonRejection>,
) -> Result<(StatusCode, String), ApiError> {
    let Json(request) = payload.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("could not decode webhook registration: {e}"),
        )
    })?;

    let registration = request
        .validate(&state.supported_bases)
        .map_err(|e| match e {
            ValidationError::UnsupportedBase { .. } => (StatusCode::NOT_IMPLEMENTED, e.to_string()),
            other => bad_request(other),
        })?;

    let id = state
        .storage()?
        .insert_subscription(&registration)
        .await
        .map_err(internal)?;

    tracing::info!(
        %id,
        base = %registration.base_currency,
        target = %registration.target_currency,
        "registered webhook"
    );
    Ok((StatusCode::CREATED, id))
}

async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .storage()?
        .get_subscription(&id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("no webhook with id {id}")))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .storage()?
        .delete_subscription(&id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(not_found(format!("no webhook with id {id}")));
    }
    tracing::info!(%id, "deleted webhook");
    Ok(StatusCode::OK)
}

async fn get_latest(
    State(state): State<AppState>,
    payload: Result<Json<PairRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    let Json(request) = payload.map_err(bad_request)?;
    let (base, target) = request.codes()?;

    let (rate, _date) = state
        .storage()?
        .latest_rate(&base, &target)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("no stored rate for {base}/{target}")))?;
    Ok(rate.to_string())
}

async fn get_average(
    State(state): State<AppState>,
    payload: Result<Json<PairRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    let Json(request) = payload.map_err(bad_request)?;
    let (base, target) = request.codes()?;

    let average = state
        .storage()?
        .average_rate(&base, &target, AVERAGE_WINDOW)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            not_found(format!(
                "fewer than {AVERAGE_WINDOW} stored rates for {base}/{target}"
            ))
        })?;
    Ok(average.to_string())
}

async fn evaluation_trigger(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let engine = NotificationEngine::new(state.storage()?.clone(), state.dispatcher.clone());
    match engine.evaluate_latest().await {
        Ok(dispatched) => {
            tracing::info!(dispatched, "manual evaluation finished");
            Ok(StatusCode::OK)
        }
        Err(IngestError::Dispatch(failure)) => Err((StatusCode::BAD_GATEWAY, failure.to_string())),
        Err(err) => Err(internal(err)),
    }
}

fn bad_request(err: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn not_found(message: String) -> ApiError {
    (StatusCode::NOT_FOUND, message)
}

fn internal(err: impl Into<anyhow::Error>) -> ApiError {
    let err = err.into();
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
