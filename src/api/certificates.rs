use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use super::ApiResult;
use crate::{certificate::CertificateView, server::AppState};

/// Public lookup, no caller id needed
#[utoipa::path(
    context_path = "/api/certificates",
    path = "/{id}",
    method(get),
    params(("id" = Uuid, Path, description = "Certificate id")),
    responses(
        (status = 200, description = "Certificate is authentic", body = CertificateView),
        (status = 404, description = "No such certificate")
    )
)]
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<CertificateView> {
    Ok(Json(state.issuer.verify(id).await?))
}

pub fn get_certificates_scope() -> Router<Arc<AppState>> {
    Router::new().route("/certificates/{id}", get(verify))
}
