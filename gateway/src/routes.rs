use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use site_selector::{AnalysisRequest, AnalysisResult, GeoPoint, ScoredSite, SelectorError, WeightVector};

use crate::AppState;

#[derive(Deserialize)]
pub struct ScoreSiteRequest {
    pub longitude: f64,
    pub latitude: f64,
    pub weights: Option<WeightVector>,
}

pub struct ApiError(SelectorError);

impl From<SelectorError> for ApiError {
    fn from(err: SelectorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!("Analysis failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let result = state.selector.analyze(&request).await?;
    Ok(Json(result))
}

/// Full-mode deep analysis of one point
pub async fn score_site(
    State(state): State<AppState>,
    Json(request): Json<ScoreSiteRequest>,
) -> Result<Json<ScoredSite>, ApiError> {
    let point = GeoPoint::new(request.longitude, request.latitude);
    let site = state.selector.score_site(point, request.weights).await?;
    Ok(Json(site))
}
