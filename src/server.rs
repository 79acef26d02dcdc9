use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::forecast::artifact::PredictionArtifact;
use crate::forecast::{self, PredictionError, PredictionRequest};

#[derive(Clone)]
struct AppState {
    artifact: Arc<PredictionArtifact>,
}

#[derive(Error, Debug)]
enum ApiError {
    #[error("An error occurred during prediction: {0}")]
    Prediction(#[from] PredictionError),
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::Prediction(_) => tracing::error!(error = %self, "prediction failed"),
            ApiError::Validation(_) => tracing::debug!(error = %self, "rejected query"),
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct PredictionResponse {
    current_energy: f64,
    current_humidity: f64,
    current_hour: i64,
    current_month: i64,
    predicted_next_hour_generation: f64,
}

impl PredictionResponse {
    fn new(request: PredictionRequest, prediction: f64) -> Self {
        Self {
            current_energy: request.current_energy,
            current_humidity: request.current_humidity,
            current_hour: request.current_hour,
            current_month: request.current_month,
            predicted_next_hour_generation: forecast::round_generation(prediction),
        }
    }
}

/// GET /api/predict_next_generation
/// Forecast generation for the hour after the given observation
async fn predict_next_generation(
    State(state): State<AppState>,
    query: Result<Query<PredictionRequest>, QueryRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Query(request) = query?;
    if let Some(field) = request.non_finite_field() {
        return Err(ApiError::Validation(format!(
            "{field} must be a finite number"
        )));
    }

    let prediction = forecast::predict_next_generation(&state.artifact, &request)?;

    Ok(Json(PredictionResponse::new(request, prediction)))
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

pub fn router(artifact: Arc<PredictionArtifact>) -> Router {
    let state = AppState { artifact };

    Router::new()
        .route("/health", get(health))
        .route("/api/predict_next_generation", get(predict_next_generation))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: &Config, artifact: PredictionArtifact) -> anyhow::Result<()> {
    let app = router(Arc::new(artifact));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    tracing::info!("  GET /health");
    tracing::info!(
        "  GET /api/predict_next_generation?current_energy=..&current_humidity=..&current_hour=..&current_month=.."
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::tests::{FailingRegressor, IdentityScaler, fixed_artifact};
    use serde_json::Value;
    use std::sync::atomic::Ordering;

    async fn spawn(artifact: PredictionArtifact) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::new(artifact));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn predict_url(base: &str, energy: f64, humidity: f64, hour: i64, month: i64) -> String {
        format!(
            "{base}/api/predict_next_generation?current_energy={energy}&current_humidity={humidity}&current_hour={hour}&current_month={month}"
        )
    }

    #[tokio::test]
    async fn test_health() {
        let (artifact, _) = fixed_artifact(1.0);
        let base = spawn(artifact).await;

        let response = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_daylight_prediction_is_rounded_and_echoed() {
        let (artifact, calls) = fixed_artifact(37.456_789);
        let base = spawn(artifact).await;

        let response = reqwest::get(predict_url(&base, 120.5, 61.0, 10, 4))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: PredictionResponse = response.json().await.unwrap();
        assert_eq!(
            body,
            PredictionResponse {
                current_energy: 120.5,
                current_humidity: 61.0,
                current_hour: 10,
                current_month: 4,
                predicted_next_hour_generation: 37.46,
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_night_returns_zero_without_model() {
        let (artifact, calls) = fixed_artifact(500.0);
        let base = spawn(artifact).await;

        for (hour, month) in [(22, 6), (23, 12)] {
            let response = reqwest::get(predict_url(&base, 900.0, 10.0, hour, month))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body: PredictionResponse = response.json().await.unwrap();
            assert_eq!(body.predicted_next_hour_generation, 0.0);
            assert_eq!(body.current_hour, hour);
            assert_eq!(body.current_month, month);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_negative_prediction_is_clamped() {
        let (artifact, _) = fixed_artifact(-12.0);
        let base = spawn(artifact).await;

        let body: PredictionResponse = reqwest::get(predict_url(&base, 1.0, 1.0, 12, 7))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.predicted_next_hour_generation, 0.0);
    }

    #[tokio::test]
    async fn test_prediction_failure_is_internal_error() {
        let artifact =
            PredictionArtifact::new(Arc::new(FailingRegressor), Arc::new(IdentityScaler));
        let base = spawn(artifact).await;

        let response = reqwest::get(predict_url(&base, 1.0, 1.0, 12, 7))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body["detail"],
            "An error occurred during prediction: model exploded"
        );

        // server keeps serving after a failed prediction
        let response = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_shape_mismatch_from_artifact_is_internal_error() {
        let artifact = PredictionArtifact::from_json(
            r#"{
                "scaler": { "kind": "standard", "mean": [0, 0, 0, 0], "scale": [1, 1, 1, 1] },
                "model": { "kind": "linear", "coefficients": [1, 1, 1, 1], "intercept": 0 }
            }"#,
        )
        .unwrap();
        let base = spawn(artifact).await;

        let response = reqwest::get(predict_url(&base, 1.0, 1.0, 12, 7))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.unwrap();
        assert!(
            body["detail"]
                .as_str()
                .unwrap()
                .contains("expected 4 features, got 3")
        );
    }

    #[tokio::test]
    async fn test_missing_parameter_is_rejected() {
        let (artifact, calls) = fixed_artifact(1.0);
        let base = spawn(artifact).await;

        let response = reqwest::get(format!(
            "{base}/api/predict_next_generation?current_energy=1&current_humidity=2&current_hour=3"
        ))
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains("current_month"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extreme_hour_is_answered() {
        let (artifact, calls) = fixed_artifact(4.2);
        let base = spawn(artifact).await;

        let response = reqwest::get(predict_url(&base, 1.0, 1.0, i64::MAX, 6))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: PredictionResponse = response.json().await.unwrap();
        assert_eq!(body.current_hour, i64::MAX);
        assert_eq!(body.predicted_next_hour_generation, 4.2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tie_is_rounded_to_even() {
        let (artifact, _) = fixed_artifact(10.125);
        let base = spawn(artifact).await;

        let body: PredictionResponse = reqwest::get(predict_url(&base, 1.0, 1.0, 12, 7))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.predicted_next_hour_generation, 10.12);
    }

    #[tokio::test]
    async fn test_non_finite_inputs_are_rejected() {
        let (artifact, calls) = fixed_artifact(1.0);
        let base = spawn(artifact).await;

        for query in [
            "current_energy=nan&current_humidity=2",
            "current_energy=inf&current_humidity=2",
            "current_energy=1&current_humidity=-inf",
        ] {
            let response = reqwest::get(format!(
                "{base}/api/predict_next_generation?{query}&current_hour=11&current_month=6"
            ))
            .await
            .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{query}");
            let body: Value = response.json().await.unwrap();
            assert!(
                body["detail"]
                    .as_str()
                    .unwrap()
                    .contains("must be a finite number")
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_infinite_prediction_is_internal_error() {
        let (artifact, _) = fixed_artifact(f64::INFINITY);
        let base = spawn(artifact).await;

        let response = reqwest::get(predict_url(&base, 1.0, 1.0, 12, 7))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_non_integer_hour_is_rejected() {
        let (artifact, _) = fixed_artifact(1.0);
        let base = spawn(artifact).await;

        let response = reqwest::get(format!(
            "{base}/api/predict_next_generation?current_energy=1&current_humidity=2&current_hour=noon&current_month=6"
        ))
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
