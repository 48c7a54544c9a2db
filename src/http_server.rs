use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::records::{NamedRecord, Record, RecordStore, record_key};

/// Header carrying the shared secret on mutating calls
pub const SECRET_HEADER: &str = "Secret";

/// HTTP server for managing the record table at runtime
pub struct AdminServer {
    state: AdminState,
    bind_addr: SocketAddr,
}

impl AdminServer {
    pub fn new(
        store: Arc<RecordStore>,
        zone: impl Into<String>,
        secret: impl Into<String>,
        bind_addr: SocketAddr,
    ) -> Self {
        Self {
            state: AdminState {
                store,
                zone: Arc::from(zone.into()),
                secret: Arc::from(secret.into()),
            },
            bind_addr,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Binds the admin listener and serves until the listener fails.
    pub async fn start(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        info!("Admin API on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }
}

#[derive(Clone)]
pub struct AdminState {
    store: Arc<RecordStore>,
    zone: Arc<str>,
    secret: Arc<str>,
}

/// Builds the `/api` routes over the given state.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/api/records", get(list_records).post(create_record))
        .route(
            "/api/records/{name}",
            get(show_record).put(update_record).delete(delete_record),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Compares the presented secret with the configured one. A missing header
/// counts as the empty string.
pub fn secret_matches(presented: Option<&str>, configured: &str) -> bool {
    presented.unwrap_or_default() == configured
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Incorrect shared secret")]
    IncorrectSecret,

    #[error("Invalid record name {0:?}")]
    InvalidName(String),

    #[error("Record {0:?} not found")]
    NotFound(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminError::IncorrectSecret => StatusCode::FORBIDDEN,
            AdminError::InvalidName(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, self.to_string()).into_response()
    }
}

/// Precondition of the mutating routes. Must come before any body extractor
/// so a bad secret is rejected before the payload is even read.
pub struct RequireSecret;

impl FromRequestParts<AdminState> for RequireSecret {
    type Rejection = AdminError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AdminState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok());

        if secret_matches(presented, &state.secret) {
            Ok(RequireSecret)
        } else {
            warn!("Rejected {} {}: incorrect shared secret", parts.method, parts.uri);
            Err(AdminError::IncorrectSecret)
        }
    }
}

impl AdminState {
    fn key(&self, name: &str) -> Result<String, AdminError> {
        record_key(name, &self.zone).ok_or_else(|| AdminError::InvalidName(name.to_string()))
    }
}

async fn list_records(State(state): State<AdminState>) -> Json<HashMap<String, Record>> {
    Json(state.store.snapshot())
}

async fn create_record(
    _secret: RequireSecret,
    State(state): State<AdminState>,
    Json(payload): Json<NamedRecord>,
) -> Result<(StatusCode, Json<NamedRecord>), AdminError> {
    let name = state.key(&payload.name)?;
    state.store.set(&name, payload.record);
    info!("Created record {} -> {}", name, payload.record.address);

    Ok((
        StatusCode::CREATED,
        Json(NamedRecord {
            record: payload.record,
            name,
        }),
    ))
}

async fn show_record(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<Record>, AdminError> {
    let key = state.key(&name)?;
    state
        .store
        .get(&key)
        .map(Json)
        .ok_or(AdminError::NotFound(key))
}

async fn update_record(
    _secret: RequireSecret,
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(record): Json<Record>,
) -> Result<Json<Record>, AdminError> {
    let key = state.key(&name)?;
    let previous = state.store.set(&key, record);
    info!("Updated record {} -> {} (was {:?})", key, record.address, previous);
    Ok(Json(record))
}

async fn delete_record(
    _secret: RequireSecret,
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AdminError> {
    let key = state.key(&name)?;
    match state.store.delete(&key) {
        Some(_) => info!("Deleted record {}", key),
        None => debug!("Delete of absent record {}", key),
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_matches() {
        assert!(secret_matches(Some("hunter2"), "hunter2"));
        assert!(!secret_matches(Some("hunter3"), "hunter2"));
        assert!(!secret_matches(None, "hunter2"));
        assert!(secret_matches(None, ""));
    }

    #[test]
    fn test_admin_error_status() {
        assert_eq!(
            AdminError::IncorrectSecret.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AdminError::InvalidName(String::new()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AdminError::NotFound("www".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
