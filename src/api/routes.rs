//! HTTP route handlers for the API

use super::AppState;
use crate::error::CoreError;
use crate::models::TrainerSession;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

/// Days covered by history/attendance queries without `from`
const DEFAULT_RANGE_DAYS: i64 = 30;

// ============================================================================
// Errors
// ============================================================================

/// Status code for each error kind. 409/404/410/400 are terminal for the
/// call; 5xx may be retried by the client.
pub fn status_for(e: &CoreError) -> StatusCode {
    match e {
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::NotFound(..) => StatusCode::NOT_FOUND,
        CoreError::Expired(_) => StatusCode::GONE,
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (
            status,
            Json(serde_json::json!({
                "error": self.to_string(),
                "code": self.kind()
            })),
        )
            .into_response()
    }
}

/// Malformed bodies and query strings are validation errors, reported in
/// the same `{error, code}` shape as every other failure
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, CoreError> {
    body.map(|Json(value)| value)
        .map_err(|e| CoreError::Validation(e.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, CoreError> {
    query
        .map(|Query(value)| value)
        .map_err(|e| CoreError::Validation(e.body_text()))
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub trainer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: String,
}

pub async fn start_session(
    State(state): State<AppState>,
    body: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, CoreError> {
    let req = json_body(body)?;
    let session = state.controller.start_session(&req.trainer_id).await?;
    Ok(Json(serde_json::json!({
        "sessionId": session.id,
        "startTime": session.start_time,
    })))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, CoreError> {
    let req = json_body(body)?;
    let session = state.controller.heartbeat(&req.session_id).await?;
    Ok(Json(serde_json::json!({
        "sessionId": session.id,
        "lastHeartbeatAt": session.last_heartbeat_at,
    })))
}

pub async fn end_session(
    State(state): State<AppState>,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, CoreError> {
    let req = json_body(body)?;
    let session = state.controller.end_session(&req.session_id).await?;
    Ok(Json(serde_json::json!({
        "sessionId": session.id,
        "endTime": session.end_time,
        "durationMs": session.duration_ms(),
    })))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrainerSession>, CoreError> {
    let session = state.controller.get_session(&id).await?;
    Ok(Json(session))
}

pub async fn current_session(
    State(state): State<AppState>,
    Path(trainer_id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let session = state.controller.current_session(&trainer_id).await?;
    Ok(Json(serde_json::json!({ "session": session })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub trainer_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl RangeQuery {
    /// Inclusive date range; defaults to the last 30 days ending today
    fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), CoreError> {
        if self.trainer_id.trim().is_empty() {
            return Err(CoreError::Validation("trainerId is required".to_string()));
        }
        let to = match &self.to {
            Some(raw) => parse_date("to", raw)?,
            None => today,
        };
        let from = match &self.from {
            Some(raw) => parse_date("from", raw)?,
            None => to - Duration::days(DEFAULT_RANGE_DAYS - 1),
        };
        if from > to {
            return Err(CoreError::Validation(format!(
                "from ({}) is after to ({})",
                from, to
            )));
        }
        Ok((from, to))
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::Validation(format!("{} must be YYYY-MM-DD, got '{}'", field, raw)))
}

pub async fn session_history(
    State(state): State<AppState>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> Result<impl IntoResponse, CoreError> {
    let query = query_params(query)?;
    let today = state.controller.aggregator().date_of(Utc::now());
    let (from, to) = query.resolve(today)?;

    let sessions = state
        .controller
        .session_history(&query.trainer_id, from, to)
        .await?;
    Ok(Json(serde_json::json!({
        "trainerId": query.trainer_id,
        "from": from,
        "to": to,
        "sessions": sessions,
    })))
}

// ============================================================================
// Attendance
// ============================================================================

pub async fn list_attendance(
    State(state): State<AppState>,
    query: Result<Query<RangeQuery>, QueryRejection>,
) -> Result<impl IntoResponse, CoreError> {
    let query = query_params(query)?;
    let aggregator = state.controller.aggregator();
    let today = aggregator.date_of(Utc::now());
    let (from, to) = query.resolve(today)?;

    let records = aggregator
        .list_attendance(&query.trainer_id, from, to)
        .await?;
    Ok(Json(serde_json::json!({
        "trainerId": query.trainer_id,
        "from": from,
        "to": to,
        "records": records,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub trainer_id: String,
    pub date: String,
}

/// Recompute one trainer-day on demand
pub async fn aggregate_attendance(
    State(state): State<AppState>,
    body: Result<Json<AggregateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, CoreError> {
    let req = json_body(body)?;
    if req.trainer_id.trim().is_empty() {
        return Err(CoreError::Validation("trainerId is required".to_string()));
    }
    let date = parse_date("date", &req.date)?;

    let record = state
        .controller
        .aggregator()
        .aggregate(&req.trainer_id, date)
        .await?;
    Ok((StatusCode::OK, Json(record)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(from: Option<&str>, to: Option<&str>) -> RangeQuery {
        RangeQuery {
            trainer_id: "T".to_string(),
            from: from.map(String::from),
            to: to.map(String::from),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&CoreError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&CoreError::NotFound("Session", "x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&CoreError::Expired("x".into())), StatusCode::GONE);
        assert_eq!(
            status_for(&CoreError::StoreUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&CoreError::Config("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_range_defaults_to_last_thirty_days() {
        let today = day(2024, 3, 31);
        let (from, to) = query(None, None).resolve(today).unwrap();
        assert_eq!(to, today);
        assert_eq!(from, day(2024, 3, 2));
    }

    #[test]
    fn test_range_rejects_bad_input() {
        let today = day(2024, 3, 31);
        assert!(query(Some("03/01/2024"), None).resolve(today).is_err());
        assert!(query(Some("2024-03-10"), Some("2024-03-01")).resolve(today).is_err());

        let mut blank = query(None, None);
        blank.trainer_id = " ".to_string();
        assert!(blank.resolve(today).is_err());
    }
}
