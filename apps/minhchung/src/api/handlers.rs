//! # API Endpoint Handlers
//!
//! Every registry call runs on the blocking pool; redb transactions are
//! synchronous.

use super::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    types::{
        ApiResponse, AuditDto, BackupData, CreateCriterionRequest, CreateDepartmentRequest,
        CriterionDto, DepartmentDto, EvidenceCodeDto, GenerateRequest, HealthResponse, ListData,
        ListQuery, RestoreRequest, StatisticsDto, UpdateRequest,
    },
};
use crate::config::Role;
use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use minhchung_core::{
    CriterionId, DepartmentId, EvidenceCodeId, EvidenceCodePatch, McError, NewEvidenceCode,
    Registry, snapshot_checksum, snapshot_digest,
};
use std::sync::Arc;

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// Run a registry call on the blocking pool.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Registry) -> Result<T, McError> + Send + 'static,
    T: Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    tokio::task::spawn_blocking(move || f(&registry))
        .await
        .map_err(|e| ApiError::Internal(format!("Registry task failed: {e}")))?
        .map_err(ApiError::from)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e.body_text())))
}

fn path_id(path: Result<Path<u64>, PathRejection>) -> Result<u64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid id: {}", e.body_text())))
}

// =============================================================================
// HEALTH
// =============================================================================

/// Health check endpoint. Not enveloped and never authenticated.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// EVIDENCE CODES
// =============================================================================

/// `POST /evidence-codes/generate`
pub async fn generate_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<EvidenceCodeDto> {
    user.require(Role::Manager)?;
    let request = body(payload)?;
    let new_code = NewEvidenceCode {
        department_id: DepartmentId(request.department_id),
        criterion_id: CriterionId(request.criterion_id),
        description: request.description,
        created_by: user.user_id,
    };
    let record = blocking(&state, move |registry| registry.generate(&new_code)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            EvidenceCodeDto::from(record),
            "Evidence code generated",
        )),
    ))
}

/// `GET /evidence-codes`
pub async fn list_handler(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<ListData<EvidenceCodeDto>> {
    let Query(query) =
        query.map_err(|e| ApiError::BadRequest(format!("Invalid query: {}", e.body_text())))?;
    let filter = query.filter();
    let page = query.page_request();
    let page = blocking(&state, move |registry| registry.list(&filter, page)).await?;
    ok(ListData::from_page(page))
}

/// `GET /evidence-codes/{id}`
pub async fn get_handler(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<EvidenceCodeDto> {
    let id = EvidenceCodeId(path_id(path)?);
    let record = blocking(&state, move |registry| registry.get(id)).await?;
    ok(record.into())
}

/// `GET /evidence-codes/by-code/{code}`
pub async fn get_by_code_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<EvidenceCodeDto> {
    let record = blocking(&state, move |registry| registry.get_by_code(&code)).await?;
    ok(record.into())
}

/// `PUT /evidence-codes/{id}`
pub async fn update_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<EvidenceCodeDto> {
    user.require(Role::Manager)?;
    let id = EvidenceCodeId(path_id(path)?);
    let patch = EvidenceCodePatch::from(body(payload)?);
    let record = blocking(&state, move |registry| registry.update(id, &patch)).await?;
    tracing::info!(id = %record.id, user_id = %user.user_id, "evidence code updated");
    Ok((
        StatusCode::OK,
        Json(ApiResponse::with_message(
            record.into(),
            "Evidence code updated",
        )),
    ))
}

/// `DELETE /evidence-codes/{id}`: soft delete.
pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<EvidenceCodeDto> {
    user.require(Role::Manager)?;
    let id = EvidenceCodeId(path_id(path)?);
    let record = blocking(&state, move |registry| registry.soft_delete(id)).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::with_message(
            record.into(),
            "Evidence code deactivated",
        )),
    ))
}

/// `GET /evidence-codes/audit`
pub async fn audit_handler(State(state): State<AppState>) -> ApiResult<AuditDto> {
    let report = blocking(&state, Registry::verify_integrity).await?;
    ok(report.into())
}

// =============================================================================
// DEPARTMENTS
// =============================================================================

pub async fn list_departments_handler(
    State(state): State<AppState>,
) -> ApiResult<Vec<DepartmentDto>> {
    let departments = blocking(&state, Registry::departments).await?;
    ok(departments.into_iter().map(Into::into).collect())
}

pub async fn create_department_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateDepartmentRequest>, JsonRejection>,
) -> ApiResult<DepartmentDto> {
    user.require(Role::Admin)?;
    let request = body(payload)?;
    let department = blocking(&state, move |registry| {
        registry.create_department(&request.code, &request.name)
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(department.into())),
    ))
}

pub async fn get_department_handler(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<DepartmentDto> {
    let id = DepartmentId(path_id(path)?);
    let department = blocking(&state, move |registry| registry.department(id)).await?;
    ok(department.into())
}

/// Deactivates; existing codes keep referring to it.
pub async fn deactivate_department_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<DepartmentDto> {
    user.require(Role::Admin)?;
    let id = DepartmentId(path_id(path)?);
    let department =
        blocking(&state, move |registry| registry.set_department_active(id, false)).await?;
    ok(department.into())
}

// =============================================================================
// CRITERIA
// =============================================================================

pub async fn list_criteria_handler(State(state): State<AppState>) -> ApiResult<Vec<CriterionDto>> {
    let criteria = blocking(&state, Registry::criteria).await?;
    ok(criteria.into_iter().map(Into::into).collect())
}

pub async fn create_criterion_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateCriterionRequest>, JsonRejection>,
) -> ApiResult<CriterionDto> {
    user.require(Role::Admin)?;
    let request = body(payload)?;
    let criterion = blocking(&state, move |registry| {
        registry.create_criterion(&request.code, &request.name, request.standard.as_deref())
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(criterion.into())),
    ))
}

pub async fn get_criterion_handler(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<CriterionDto> {
    let id = CriterionId(path_id(path)?);
    let criterion = blocking(&state, move |registry| registry.criterion(id)).await?;
    ok(criterion.into())
}

pub async fn deactivate_criterion_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<CriterionDto> {
    user.require(Role::Admin)?;
    let id = CriterionId(path_id(path)?);
    let criterion =
        blocking(&state, move |registry| registry.set_criterion_active(id, false)).await?;
    ok(criterion.into())
}

// =============================================================================
// BACKUP & STATISTICS
// =============================================================================

/// `POST /backups`
pub async fn backup_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<BackupData> {
    user.require(Role::Admin)?;
    let (bytes, checksum) = blocking(&state, |registry| {
        let bytes = registry.backup()?;
        let checksum = snapshot_checksum(&bytes)?;
        Ok((bytes, checksum))
    })
    .await?;
    tracing::info!(size = bytes.len(), user_id = %user.user_id, "backup exported");
    ok(BackupData {
        digest: snapshot_digest(&bytes),
        checksum: format!("{checksum:016x}"),
        size: bytes.len(),
        data: STANDARD.encode(&bytes),
    })
}

/// `POST /backups/restore`
///
/// A snapshot that fails validation is the caller's fault (400); only a
/// storage failure is a server error.
pub async fn restore_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<RestoreRequest>, JsonRejection>,
) -> ApiResult<StatisticsDto> {
    user.require(Role::Admin)?;
    let request = body(payload)?;
    let bytes = STANDARD
        .decode(request.data.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64: {e}")))?;

    let stats = blocking(&state, move |registry| registry.restore(&bytes))
        .await
        .map_err(|e| match e {
            ApiError::Core(err) if !matches!(err, McError::Storage(_)) => {
                ApiError::BadRequest(format!("Invalid snapshot: {err}"))
            }
            other => other,
        })?;
    tracing::info!(user_id = %user.user_id, "registry restored over HTTP");
    Ok((
        StatusCode::OK,
        Json(ApiResponse::with_message(stats.into(), "Registry restored")),
    ))
}

/// `GET /statistics`
pub async fn statistics_handler(State(state): State<AppState>) -> ApiResult<StatisticsDto> {
    let stats = blocking(&state, Registry::statistics).await?;
    ok(stats.into())
}
