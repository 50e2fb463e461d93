//! REST API for the finance chatbot backend
//!
//! Exposes the profile, transaction, insight, and chat operations over
//! HTTP for the frontend UI.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::chat::handle_chat_turn;
use crate::error::AdvisorError;
use crate::ingest::parse_transactions_csv;
use crate::insights::{plan_emergency_fund, summarize_budget};
use crate::models::{Profile, UserKind};
use crate::nlp::ReplyGenerator;
use crate::store::FinanceStore;
use crate::tax::estimate_tax_india;
use crate::Result;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub user_id: String,
    pub kind: String,
    pub age: i64,
    pub monthly_income: f64,
    pub fixed_expenses: f64,
    /// Comma-separated goals text, as entered in the sidebar form.
    #[serde(default)]
    pub goals: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub months: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TaxQuery {
    pub annual_income: f64,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<FinanceStore>,
    pub generator: Arc<dyn ReplyGenerator>,
}

/// Validation errors map to 400; everything else is a server-side failure.
fn error_status(error: &AdvisorError) -> StatusCode {
    match error {
        AdvisorError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: AdvisorError) -> (StatusCode, Json<ApiResponse>) {
    (error_status(&error), Json(ApiResponse::error(error.to_string())))
}

/// Check the sidebar-form ranges before anything reaches the store.
fn validate_profile(req: ProfileRequest) -> Result<Profile> {
    if req.user_id.trim().is_empty() {
        return Err(AdvisorError::Validation("user_id must not be empty".to_string()));
    }
    let kind = UserKind::parse(&req.kind).ok_or_else(|| {
        AdvisorError::Validation(format!(
            "kind must be 'student' or 'professional', got '{}'",
            req.kind
        ))
    })?;
    if !(10..=100).contains(&req.age) {
        return Err(AdvisorError::Validation(format!(
            "age must be between 10 and 100, got {}",
            req.age
        )));
    }
    if req.monthly_income < 0.0 {
        return Err(AdvisorError::Validation(
            "monthly_income must be non-negative".to_string(),
        ));
    }
    if req.fixed_expenses < 0.0 {
        return Err(AdvisorError::Validation(
            "fixed_expenses must be non-negative".to_string(),
        ));
    }

    Ok(Profile {
        user_id: req.user_id.trim().to_string(),
        kind,
        age: req.age as u8,
        monthly_income: req.monthly_income,
        fixed_expenses: req.fixed_expenses,
        goals: Profile::parse_goals(&req.goals),
    })
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn save_profile(
    State(state): State<ApiState>,
    Json(req): Json<ProfileRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let profile = match validate_profile(req) {
        Ok(profile) => profile,
        Err(error) => return failure(error),
    };

    match state.store.upsert_profile(&profile).await {
        Ok(()) => {
            info!(user_id = %profile.user_id, "Profile saved");
            (StatusCode::OK, Json(ApiResponse::success(profile)))
        }
        Err(error) => failure(error),
    }
}

async fn get_profile(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.store.get_profile(&user_id).await {
        // A missing profile is a normal empty result, not an error.
        Ok(profile) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "profile": profile }))),
        ),
        Err(error) => failure(error),
    }
}

async fn upload_transactions(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    body: String,
) -> (StatusCode, Json<ApiResponse>) {
    let rows = match parse_transactions_csv(body.as_bytes()) {
        Ok(rows) => rows,
        Err(error) => return failure(error),
    };

    match state.store.add_transactions(&user_id, &rows).await {
        Ok(inserted) => {
            info!(user_id = %user_id, inserted, "Transactions uploaded");
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({ "inserted": inserted }))),
            )
        }
        Err(error) => failure(error),
    }
}

async fn list_transactions(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    let months = query.months.unwrap_or(6);
    match state.store.fetch_transactions(&user_id, months).await {
        Ok(transactions) => (StatusCode::OK, Json(ApiResponse::success(transactions))),
        Err(error) => failure(error),
    }
}

async fn summary(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    let months = query.months.unwrap_or(6);
    match state.store.category_summary(&user_id, months).await {
        Ok(summary) => (StatusCode::OK, Json(ApiResponse::success(summary))),
        Err(error) => failure(error),
    }
}

/// The three insight cards, computed from the stored profile.
async fn insights_cards(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let profile = match state.store.get_profile(&user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            return failure(AdvisorError::Validation(
                "Save a profile before requesting insights".to_string(),
            ))
        }
        Err(error) => return failure(error),
    };

    // Emergency funds scale off fixed expenses when known, else half of income.
    let baseline = if profile.fixed_expenses > 0.0 {
        profile.fixed_expenses
    } else {
        profile.monthly_income * 0.5
    };

    let data = serde_json::json!({
        "budget": summarize_budget(profile.monthly_income, Some(profile.fixed_expenses)),
        "emergency_fund": plan_emergency_fund(baseline),
        "tax": estimate_tax_india(profile.monthly_income * 12.0),
    });
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

async fn tax_estimate(Query(query): Query<TaxQuery>) -> (StatusCode, Json<ApiResponse>) {
    let estimate = estimate_tax_india(query.annual_income);
    (StatusCode::OK, Json(ApiResponse::success(estimate)))
}

async fn history(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    let limit = query.limit.unwrap_or(50);
    match state.store.fetch_history(&user_id, limit).await {
        Ok(messages) => (StatusCode::OK, Json(ApiResponse::success(messages))),
        Err(error) => failure(error),
    }
}

async fn chat(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return failure(AdvisorError::Validation("message must not be empty".to_string()));
    }

    match handle_chat_turn(&state.store, state.generator.as_ref(), &req.user_id, &req.message)
        .await
    {
        Ok(reply) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "reply": reply }))),
        ),
        Err(error) => failure(error),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(store: Arc<FinanceStore>, generator: Arc<dyn ReplyGenerator>) -> Router {
    let state = ApiState { store, generator };

    Router::new()
        .route("/health", get(health))
        .route("/api/profile", post(save_profile))
        .route("/api/profile/:user_id", get(get_profile))
        .route(
            "/api/transactions/:user_id",
            post(upload_transactions).get(list_transactions),
        )
        .route("/api/summary/:user_id", get(summary))
        .route("/api/insights/:user_id", get(insights_cards))
        .route("/api/tax", get(tax_estimate))
        .route("/api/history/:user_id", get(history))
        .route("/api/chat", post(chat))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    store: Arc<FinanceStore>,
    generator: Arc<dyn ReplyGenerator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(store, generator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str, age: i64, income: f64, expenses: f64) -> ProfileRequest {
        ProfileRequest {
            user_id: "demo_user".to_string(),
            kind: kind.to_string(),
            age,
            monthly_income: income,
            fixed_expenses: expenses,
            goals: "build emergency fund, pay education loan".to_string(),
        }
    }

    #[test]
    fn test_validate_profile_accepts_good_input() {
        let profile = validate_profile(request("professional", 29, 50_000.0, 20_000.0)).unwrap();
        assert_eq!(profile.kind, UserKind::Professional);
        assert_eq!(profile.goals.len(), 2);
    }

    #[test]
    fn test_validate_profile_rejects_bad_kind() {
        let error = validate_profile(request("retired", 29, 50_000.0, 0.0)).unwrap_err();
        assert!(matches!(error, AdvisorError::Validation(_)));
    }

    #[test]
    fn test_validate_profile_rejects_age_out_of_range() {
        assert!(validate_profile(request("student", 9, 0.0, 0.0)).is_err());
        assert!(validate_profile(request("student", 101, 0.0, 0.0)).is_err());
        assert!(validate_profile(request("student", 10, 0.0, 0.0)).is_ok());
        assert!(validate_profile(request("student", 100, 0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_validate_profile_rejects_negative_amounts() {
        assert!(validate_profile(request("student", 22, -1.0, 0.0)).is_err());
        assert!(validate_profile(request("student", 22, 0.0, -1.0)).is_err());
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let error = AdvisorError::Validation("nope".to_string());
        assert_eq!(error_status(&error), StatusCode::BAD_REQUEST);
        let error = AdvisorError::Database("down".to_string());
        assert_eq!(error_status(&error), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_bad_upload_persists_nothing() {
        let state = ApiState {
            store: Arc::new(FinanceStore::in_memory()),
            generator: Arc::new(crate::nlp::OfflineGenerator),
        };

        let body = "date,description,amount\n2026-05-01,Groceries,1200\n".to_string();
        let (status, Json(response)) = upload_transactions(
            State(state.clone()),
            Path("u1".to_string()),
            body,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response.error.unwrap().contains("category"));

        let persisted = state.store.fetch_transactions("u1", 120).await.unwrap();
        assert!(persisted.is_empty());
    }
}
