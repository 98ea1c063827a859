use std::sync::Arc;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::error;

use crate::error::ClanError;
use crate::extract::ExtractedStats;
use crate::ledger::{Export, ImportReport, Ledger, Scope};
use crate::power::RosterSide;
use crate::server::api::{self, BoardResponse};
use crate::server::state::AppState;
use crate::stats::{ImportMode, UpsertOutcome};

pub const SECRET_HEADER: &str = "x-clanstats-secret";
pub const PIN_HEADER: &str = "x-clan-pin";

/// Screenshots routinely exceed axum's 2 MB default.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub struct ApiError(ClanError);

impl From<ClanError> for ApiError {
    fn from(err: ClanError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        error_response(status, &self.0.to_string())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"status": "error", "message": message}))).into_response()
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// `Json` whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError(ClanError::validation(format!(
        "invalid request body: {}",
        rejection.body_text()
    )))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/power", get(power_board))
        .route("/api/power/mode/toggle", post(toggle_mode))
        .route("/api/power/calc-mode", put(set_calc_mode))
        .route(
            "/api/power/:side/members",
            post(add_power_member).delete(clear_power_roster),
        )
        .route(
            "/api/power/:side/members/:index",
            put(edit_power_member).delete(delete_power_member),
        )
        .route("/api/power/:side/total", put(set_clan_total))
        .route("/api/members", get(list_members).post(upsert_member))
        .route("/api/members/clear", post(clear_members))
        .route("/api/members/import", post(import_members))
        .route("/api/members/export", get(export_members))
        .route("/api/members/:key", delete(delete_member))
        .route(
            "/api/extract",
            post(extract_stats).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/api/clans", get(list_clans).post(create_clan))
        .route("/api/clans/:clan", delete(delete_clan))
        .route("/api/clans/:clan/unlock", post(unlock_clan))
        .route(
            "/api/clans/:clan/members",
            get(list_clan_members).post(upsert_clan_member),
        )
        .route("/api/clans/:clan/members/clear", post(clear_clan_members))
        .route("/api/clans/:clan/members/import", post(import_clan_members))
        .route("/api/clans/:clan/members/export", get(export_clan_members))
        .route("/api/clans/:clan/members/:key", delete(delete_clan_member))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn secret(headers: &HeaderMap) -> Option<String> {
    header(headers, SECRET_HEADER).map(str::to_owned)
}

fn clan_pin(headers: &HeaderMap) -> String {
    header(headers, PIN_HEADER).unwrap_or_default().to_owned()
}

fn clan_scope<'a>(name: &'a str, pin: &'a str) -> Scope<'a> {
    Scope::Clan { name, pin }
}

/// Runs a store operation on the blocking pool; the ledger does synchronous file I/O.
async fn with_ledger<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    F: FnOnce(&Ledger) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let ledger = Arc::clone(&state.ledger);
    let result = tokio::task::spawn_blocking(move || op(&ledger))
        .await
        .map_err(|err| ClanError::Internal(format!("store task did not complete: {err}")))?;
    Ok(result?)
}

fn parse_side(raw: &str) -> ApiResult<RosterSide> {
    RosterSide::parse(raw).ok_or_else(|| {
        ClanError::validation(format!("unknown side '{raw}' (expected clan1 or clan2)")).into()
    })
}

fn parse_index(raw: &str) -> ApiResult<usize> {
    raw.parse().map_err(|_| {
        ClanError::validation(format!("member index must be a number, got '{raw}'")).into()
    })
}

fn parse_import_mode(params: &api::ImportParams) -> ApiResult<ImportMode> {
    match params.mode.as_deref() {
        None => Ok(ImportMode::Merge),
        Some(raw) => ImportMode::parse(raw).ok_or_else(|| {
            ClanError::validation(format!(
                "unknown import mode '{raw}' (expected merge or replace)"
            ))
            .into()
        }),
    }
}

fn export_response(export: Export) -> Response {
    (
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.file_name),
            ),
        ],
        export.body,
    )
        .into_response()
}

async fn health() -> Json<api::HealthResponse> {
    Json(api::health_payload())
}

async fn power_board(State(state): State<AppState>) -> Json<BoardResponse> {
    Json(api::board_payload(&state.board()))
}

async fn toggle_mode(State(state): State<AppState>) -> Json<api::ModeToggleResponse> {
    let clan1_mode = state.board().toggle_mode();
    Json(api::ModeToggleResponse {
        clan1_mode,
        clan2_mode: clan1_mode.opposite(),
    })
}

async fn set_calc_mode(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<api::CalcModeRequest>,
) -> Json<BoardResponse> {
    let mut board = state.board();
    board.set_calc_mode(req.calc_mode);
    Json(api::board_payload(&board))
}

async fn add_power_member(
    State(state): State<AppState>,
    Path(side): Path<String>,
    ApiJson(req): ApiJson<api::PowerMemberRequest>,
) -> ApiResult<(StatusCode, Json<api::MemberAddedResponse>)> {
    let side = parse_side(&side)?;
    let mut board = state.board();
    let index = board.add_member(side, req.into())?;
    Ok((
        StatusCode::CREATED,
        Json(api::MemberAddedResponse {
            index,
            side: board.view(side),
        }),
    ))
}

async fn edit_power_member(
    State(state): State<AppState>,
    Path((side, index)): Path<(String, String)>,
    ApiJson(req): ApiJson<api::PowerMemberRequest>,
) -> ApiResult<Json<crate::power::SideView>> {
    let side = parse_side(&side)?;
    let index = parse_index(&index)?;
    let mut board = state.board();
    board.edit_member(side, index, req.into())?;
    Ok(Json(board.view(side)))
}

async fn delete_power_member(
    State(state): State<AppState>,
    Path((side, index)): Path<(String, String)>,
) -> ApiResult<Json<crate::power::SideView>> {
    let side = parse_side(&side)?;
    let index = parse_index(&index)?;
    let mut board = state.board();
    board.remove_member(side, index)?;
    Ok(Json(board.view(side)))
}

async fn clear_power_roster(
    State(state): State<AppState>,
    Path(side): Path<String>,
) -> ApiResult<Json<crate::power::SideView>> {
    let side = parse_side(&side)?;
    let mut board = state.board();
    board.clear(side);
    Ok(Json(board.view(side)))
}

async fn set_clan_total(
    State(state): State<AppState>,
    Path(side): Path<String>,
    ApiJson(req): ApiJson<api::ClanTotalRequest>,
) -> ApiResult<Json<crate::power::SideView>> {
    let side = parse_side(&side)?;
    let mut board = state.board();
    board.set_clan_total_power(side, req.clan_total_power);
    Ok(Json(board.view(side)))
}

async fn list_members(State(state): State<AppState>) -> ApiResult<Json<api::MembersResponse>> {
    let store = with_ledger(&state, |ledger| ledger.members(Scope::Default)).await?;
    Ok(Json(api::members_payload(&store)))
}

async fn upsert_member(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<api::UpsertRequest>,
) -> ApiResult<Json<UpsertOutcome>> {
    let outcome = with_ledger(&state, move |ledger| {
        ledger.upsert(Scope::Default, &req.name, req.atk, req.def)
    })
    .await?;
    Ok(Json(outcome))
}

async fn delete_member(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<api::DeletedResponse>> {
    let secret = secret(&headers);
    let removed = with_ledger(&state, move |ledger| {
        ledger.delete(Scope::Default, &key, secret.as_deref())
    })
    .await?;
    Ok(Json(api::DeletedResponse {
        status: "ok",
        deleted: removed.name,
    }))
}

async fn clear_members(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<api::ClearedResponse>> {
    let secret = secret(&headers);
    let cleared = with_ledger(&state, move |ledger| {
        ledger.clear(Scope::Default, secret.as_deref())
    })
    .await?;
    Ok(Json(api::ClearedResponse {
        status: "ok",
        cleared,
    }))
}

async fn import_members(
    State(state): State<AppState>,
    Query(params): Query<api::ImportParams>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Json<ImportReport>> {
    let mode = parse_import_mode(&params)?;
    let secret = secret(&headers);
    let report = with_ledger(&state, move |ledger| {
        ledger.import(Scope::Default, payload, mode, secret.as_deref())
    })
    .await?;
    Ok(Json(report))
}

async fn export_members(State(state): State<AppState>) -> ApiResult<Response> {
    let export = with_ledger(&state, |ledger| ledger.export(Scope::Default)).await?;
    Ok(export_response(export))
}

/// Raw image body; the `Content-Type` header names its format.
async fn extract_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ExtractedStats>> {
    let mime_type = header(&headers, CONTENT_TYPE.as_str()).unwrap_or_default();
    let stats = state.extractor.extract(&body, mime_type).await?;
    Ok(Json(stats))
}

async fn list_clans(State(state): State<AppState>) -> ApiResult<Json<api::ClansResponse>> {
    let clans = with_ledger(&state, Ledger::list_clans).await?;
    Ok(Json(api::ClansResponse { clans }))
}

async fn create_clan(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<api::CreateClanRequest>,
) -> ApiResult<(StatusCode, Json<crate::stats::ClanSummary>)> {
    let summary =
        with_ledger(&state, move |ledger| ledger.create_clan(&req.name, &req.pin)).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn unlock_clan(
    State(state): State<AppState>,
    Path(clan): Path<String>,
    ApiJson(req): ApiJson<api::UnlockRequest>,
) -> ApiResult<Json<api::UnlockResponse>> {
    let key = crate::stats::normalize_key(&clan);
    let store = with_ledger(&state, move |ledger| ledger.unlock_clan(&clan, &req.pin)).await?;
    Ok(Json(api::UnlockResponse {
        clan: key,
        members: api::members_payload(&store),
    }))
}

async fn delete_clan(
    State(state): State<AppState>,
    Path(clan): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<api::DeletedResponse>> {
    let secret = secret(&headers);
    let deleted = with_ledger(&state, move |ledger| {
        ledger.delete_clan(&clan, secret.as_deref())
    })
    .await?;
    Ok(Json(api::DeletedResponse {
        status: "ok",
        deleted,
    }))
}

async fn list_clan_members(
    State(state): State<AppState>,
    Path(clan): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<api::MembersResponse>> {
    let pin = clan_pin(&headers);
    let store = with_ledger(&state, move |ledger| {
        ledger.members(clan_scope(&clan, &pin))
    })
    .await?;
    Ok(Json(api::members_payload(&store)))
}

async fn upsert_clan_member(
    State(state): State<AppState>,
    Path(clan): Path<String>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<api::UpsertRequest>,
) -> ApiResult<Json<UpsertOutcome>> {
    let pin = clan_pin(&headers);
    let outcome = with_ledger(&state, move |ledger| {
        ledger.upsert(clan_scope(&clan, &pin), &req.name, req.atk, req.def)
    })
    .await?;
    Ok(Json(outcome))
}

async fn delete_clan_member(
    State(state): State<AppState>,
    Path((clan, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<api::DeletedResponse>> {
    let pin = clan_pin(&headers);
    let secret = secret(&headers);
    let removed = with_ledger(&state, move |ledger| {
        ledger.delete(clan_scope(&clan, &pin), &key, secret.as_deref())
    })
    .await?;
    Ok(Json(api::DeletedResponse {
        status: "ok",
        deleted: removed.name,
    }))
}

async fn clear_clan_members(
    State(state): State<AppState>,
    Path(clan): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<api::ClearedResponse>> {
    let pin = clan_pin(&headers);
    let secret = secret(&headers);
    let cleared = with_ledger(&state, move |ledger| {
        ledger.clear(clan_scope(&clan, &pin), secret.as_deref())
    })
    .await?;
    Ok(Json(api::ClearedResponse {
        status: "ok",
        cleared,
    }))
}

async fn import_clan_members(
    State(state): State<AppState>,
    Path(clan): Path<String>,
    Query(params): Query<api::ImportParams>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Json<ImportReport>> {
    let mode = parse_import_mode(&params)?;
    let pin = clan_pin(&headers);
    let secret = secret(&headers);
    let report = with_ledger(&state, move |ledger| {
        ledger.import(clan_scope(&clan, &pin), payload, mode, secret.as_deref())
    })
    .await?;
    Ok(Json(report))
}

async fn export_clan_members(
    State(state): State<AppState>,
    Path(clan): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let pin = clan_pin(&headers);
    let export = with_ledger(&state, move |ledger| {
        ledger.export(clan_scope(&clan, &pin))
    })
    .await?;
    Ok(export_response(export))
}
