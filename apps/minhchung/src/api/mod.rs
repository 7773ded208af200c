//! # minhchung HTTP API Module
//!
//! REST API over the evidence-code registry, built on axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (never authenticated)
//! - `GET /evidence-codes` - List codes, newest first
//! - `POST /evidence-codes/generate` - Issue the next code in a bucket
//! - `GET|PUT|DELETE /evidence-codes/{id}` - Read, update, soft delete
//! - `GET /evidence-codes/by-code/{code}` - Look up by code string
//! - `GET /evidence-codes/audit` - Bucket integrity audit
//! - `GET|POST /departments`, `GET|DELETE /departments/{id}`
//! - `GET|POST /criteria`, `GET|DELETE /criteria/{id}`
//! - `POST /backups`, `POST /backups/restore`
//! - `GET /statistics`
//!
//! ## Middleware (outer to inner)
//!
//! Tracing, CORS, body limit, rate limiting, authentication.

mod auth;
mod error;
mod handlers;
mod middleware;
mod types;

pub use auth::{AuthUser, Authenticator};
pub use error::{ApiError, status_for};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    ApiResponse, AuditDto, BackupData, CodeCountsDto, CreateCriterionRequest,
    CreateDepartmentRequest, CriterionDto, DepartmentDto, DepartmentUsageDto, EvidenceCodeDto,
    GenerateRequest, HealthResponse, ListData, ListQuery, Pagination, PeriodUsageDto,
    ReferenceCountsDto, RestoreRequest, StatisticsDto, UpdateRequest,
};

use crate::config::{Config, ServerConfig};
use crate::error::AppError;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use minhchung_core::Registry;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub auth: Arc<Authenticator>,
}

impl AppState {
    #[must_use]
    pub fn new(registry: Registry, auth: Authenticator) -> Self {
        Self {
            registry: Arc::new(registry),
            auth: Arc::new(auth),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build the CORS layer from `server.cors_origins`.
///
/// - `["*"]`: all origins
/// - unset: localhost only
/// - otherwise: the listed origins
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    match origins {
        Some([only]) if only == "*" => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
                    Ok(value) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(value)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed)
                    .allow_methods(CORS_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => build_localhost_cors(),
    }
}

/// Restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:5173",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:5173",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    if state.auth.is_enabled() {
        tracing::info!("Bearer token authentication enabled");
    } else {
        tracing::warn!(
            "Authentication DISABLED: every request acts as the system admin. \
             Configure [[auth.tokens]] or MINHCHUNG_API_KEY to enable it."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/evidence-codes", get(handlers::list_handler))
        .route("/evidence-codes/generate", post(handlers::generate_handler))
        .route("/evidence-codes/audit", get(handlers::audit_handler))
        .route(
            "/evidence-codes/by-code/{code}",
            get(handlers::get_by_code_handler),
        )
        .route(
            "/evidence-codes/{id}",
            get(handlers::get_handler)
                .put(handlers::update_handler)
                .delete(handlers::delete_handler),
        )
        .route(
            "/departments",
            get(handlers::list_departments_handler).post(handlers::create_department_handler),
        )
        .route(
            "/departments/{id}",
            get(handlers::get_department_handler).delete(handlers::deactivate_department_handler),
        )
        .route(
            "/criteria",
            get(handlers::list_criteria_handler).post(handlers::create_criterion_handler),
        )
        .route(
            "/criteria/{id}",
            get(handlers::get_criterion_handler).delete(handlers::deactivate_criterion_handler),
        )
        .route("/backups", post(handlers::backup_handler))
        .route("/backups/restore", post(handlers::restore_handler))
        .route("/statistics", get(handlers::statistics_handler))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            auth::auth_middleware,
        ));

    if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(config.cors_origins.as_deref()))
                .layer(DefaultBodyLimit::max(config.body_limit_bytes)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve until Ctrl-C.
pub async fn run_server(config: &Config, registry: Registry) -> Result<(), AppError> {
    let state = AppState::new(registry, Authenticator::new(&config.auth));
    let router = create_router(state, &config.server);
    let addr = config.server.bind_address();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Server(format!("Bind {addr} failed: {e}")))?;

    tracing::info!("minhchung HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Server(e.to_string()))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
