use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::client::RegistryError;
use crate::cnpj::CnpjError;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("CNPJ não informado")]
    MissingCnpj,
    #[error("{0}")]
    InvalidCnpj(#[from] CnpjError),
    #[error("Muitas requisições. Tente novamente em {} segundos", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },
    #[error("CNPJ não encontrado")]
    NotFound,
    #[error("Tempo esgotado ao consultar o serviço de CNPJ")]
    Timeout,
    #[error("Serviço de consulta sobrecarregado. Tente novamente mais tarde")]
    UpstreamRateLimited,
    #[error("Serviço de consulta indisponível")]
    UpstreamUnavailable { detail: String },
    #[error("Erro interno ao consultar CNPJ")]
    Internal { detail: String },
    #[error("Método não permitido")]
    MethodNotAllowed,
    #[error("Rota não encontrada")]
    RouteNotFound,
}

fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl LookupError {
    pub fn internal(detail: impl Into<String>) -> Self {
        LookupError::Internal {
            detail: detail.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            LookupError::MissingCnpj | LookupError::InvalidCnpj(_) => StatusCode::BAD_REQUEST,
            LookupError::NotFound | LookupError::RouteNotFound => StatusCode::NOT_FOUND,
            LookupError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            LookupError::Timeout => StatusCode::REQUEST_TIMEOUT,
            LookupError::RateLimited { .. } | LookupError::UpstreamRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            LookupError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            LookupError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            LookupError::InvalidCnpj(reason) => Some(reason.code().to_string()),
            LookupError::UpstreamUnavailable { detail } | LookupError::Internal { detail } => {
                Some(detail.clone())
            }
            _ => None,
        }
    }

    /// Render with `details` only when `detailed` is set. Validation reason
    /// codes are always included since they carry no internal state.
    pub fn into_response_with(self, detailed: bool) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": true,
            "message": self.to_string(),
        });

        if let LookupError::InvalidCnpj(reason) = &self {
            body["reason"] = json!(reason.code());
        }
        if detailed {
            if let Some(detail) = self.detail() {
                body["details"] = json!(detail);
            }
        }

        let retry_after = match &self {
            LookupError::RateLimited { retry_after } => Some(retry_after_secs(retry_after)),
            _ => None,
        };
        if let Some(secs) = retry_after {
            body["retryAfter"] = json!(secs);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

impl From<RegistryError> for LookupError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Upstream { status: 404 } => LookupError::NotFound,
            RegistryError::Upstream { status: 429 } => LookupError::UpstreamRateLimited,
            RegistryError::Timeout(_) => LookupError::Timeout,
            RegistryError::Transport(detail) => LookupError::UpstreamUnavailable { detail },
            other @ (RegistryError::Upstream { .. } | RegistryError::Decode(_)) => {
                LookupError::internal(other.to_string())
            }
        }
    }
}
