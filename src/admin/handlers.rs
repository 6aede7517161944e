use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::admin::auth::AdminSession;
use crate::admin::session::{password_matches, session_ref};
use crate::audit::{AuditDocument, AuditEntry, AuditReport, EventOrigin};
use crate::error::{AdminError, AuthError};
use crate::http::request::user_agent;
use crate::http::server::AppState;
use crate::security::{AllowEntry, ClientIdentity};

const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_token: String,
    pub expires_in_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub client_ip: String,
    pub development_mode: bool,
    pub allow_list_entries: usize,
    pub rate_limit_records: usize,
    pub csrf_tokens: usize,
    pub active_sessions: usize,
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecorded {
    pub id: Uuid,
    pub action: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowListView {
    pub entries: Vec<String>,
    pub development_mode: bool,
}

#[derive(Deserialize)]
pub struct AllowListChange {
    pub entry: String,
}

fn origin(identity: &ClientIdentity, headers: &HeaderMap, session: Option<&AdminSession>) -> EventOrigin {
    EventOrigin::new(identity.ip.clone())
        .with_user_agent(user_agent(headers))
        .with_session(session.map(|s| session_ref(&s.0)))
}

fn allow_list_view(state: &AppState) -> AllowListView {
    let policy = state.access.snapshot();
    AllowListView {
        entries: policy.allow_entries.iter().map(ToString::to_string).collect(),
        development_mode: policy.development_mode,
    }
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn issue_csrf_token(State(state): State<AppState>) -> Json<CsrfTokenResponse> {
    Json(CsrfTokenResponse {
        csrf_token: state.csrf.issue(),
    })
}

pub async fn login(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let now = state.clock.now();

    if !password_matches(&body.password, &state.admin.password) {
        tracing::warn!(client_ip = %identity.ip, "Admin login failed");
        state
            .audit
            .record(AuditEntry::login(now, origin(&identity, &headers, None), false))
            .await;
        return Err(AuthError::InvalidCredentials);
    }

    let session = AdminSession(state.sessions.create());
    let entry = AuditEntry::login(now, origin(&identity, &headers, Some(&session)), true);
    if let Some(alert) = state.audit.record(entry).await {
        tracing::warn!(
            client_ip = %identity.ip,
            severity = ?alert.severity,
            alerts = alert.alerts.len(),
            "Suspicious admin login"
        );
    }
    tracing::info!(client_ip = %identity.ip, "Admin logged in");

    Ok(Json(LoginResponse {
        session_token: session.0,
        expires_in_secs: state.admin.session_ttl_secs,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Extension(session): Extension<AdminSession>,
    headers: HeaderMap,
) -> StatusCode {
    let entry = AuditEntry::logout(state.clock.now(), origin(&identity, &headers, Some(&session)));
    state.sessions.revoke(&session.0);
    state.audit.record(entry).await;
    tracing::info!(client_ip = %identity.ip, "Admin logged out");
    StatusCode::NO_CONTENT
}

pub async fn get_status(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
) -> Json<SystemStatus> {
    let policy = state.access.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        client_ip: identity.ip,
        development_mode: policy.development_mode,
        allow_list_entries: policy.allow_entries.len(),
        rate_limit_records: state.limiter.len(),
        csrf_tokens: state.csrf.len(),
        active_sessions: state.sessions.len(),
    })
}

pub async fn record_action(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Extension(session): Extension<AdminSession>,
    headers: HeaderMap,
    Json(body): Json<ActionRequest>,
) -> Result<(StatusCode, Json<ActionRecorded>), AdminError> {
    let action = body.action.trim();
    if action.is_empty() {
        return Err(AdminError::BadRequest("action must not be empty".into()));
    }

    let mut entry = AuditEntry::action(state.clock.now(), origin(&identity, &headers, Some(&session)), action);
    for (key, value) in body.details {
        entry = entry.with_detail(key, value);
    }
    let id = entry.id;

    state.audit.append(entry).await?;

    Ok((
        StatusCode::CREATED,
        Json(ActionRecorded {
            id,
            action: action.to_string(),
        }),
    ))
}

pub async fn get_audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditReport>, AdminError> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    Ok(Json(state.audit.query(limit).await?))
}

pub async fn export_audit_log(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Extension(session): Extension<AdminSession>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AdminError> {
    let entry = AuditEntry::action(
        state.clock.now(),
        origin(&identity, &headers, Some(&session)),
        "audit_export",
    );
    state.audit.record(entry).await;

    let document: AuditDocument = state.audit.export().await?;
    Ok((
        [(header::CONTENT_DISPOSITION, "attachment; filename=\"audit-log.json\"")],
        Json(document),
    ))
}

pub async fn get_allowlist(State(state): State<AppState>) -> Json<AllowListView> {
    Json(allow_list_view(&state))
}

pub async fn add_allowlist_entry(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Extension(session): Extension<AdminSession>,
    headers: HeaderMap,
    Json(body): Json<AllowListChange>,
) -> Result<Json<AllowListView>, AdminError> {
    let entry: AllowEntry = body
        .entry
        .parse()
        .map_err(|e| AdminError::BadRequest(format!("invalid allow-list entry: {}", e)))?;

    let added = state.access.add_entry(entry.clone());
    tracing::info!(entry = %entry, added, client_ip = %identity.ip, "Allow-list entry added");

    let audit = AuditEntry::action(
        state.clock.now(),
        origin(&identity, &headers, Some(&session)),
        "allowlist_add",
    )
    .with_detail("entry", entry.to_string())
    .with_detail("changed", added);
    state.audit.record(audit).await;

    Ok(Json(allow_list_view(&state)))
}

pub async fn remove_allowlist_entry(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Extension(session): Extension<AdminSession>,
    headers: HeaderMap,
    Json(body): Json<AllowListChange>,
) -> Result<Json<AllowListView>, AdminError> {
    let entry: AllowEntry = body
        .entry
        .parse()
        .map_err(|e| AdminError::BadRequest(format!("invalid allow-list entry: {}", e)))?;

    let removed = state.access.remove_entry(&entry);
    tracing::info!(entry = %entry, removed, client_ip = %identity.ip, "Allow-list entry removed");

    let audit = AuditEntry::action(
        state.clock.now(),
        origin(&identity, &headers, Some(&session)),
        "allowlist_remove",
    )
    .with_detail("entry", entry.to_string())
    .with_detail("changed", removed);
    state.audit.record(audit).await;

    Ok(Json(allow_list_view(&state)))
}
