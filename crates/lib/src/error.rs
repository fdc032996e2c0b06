//! Gateway error taxonomy shared by the dispatcher, the worker, and startup.

/// Errors the gateway distinguishes when deciding how to answer the caller.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The raw body could not be parsed into a known payload shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A payload kind we do not handle. Never fatal; answered with a no-op ok.
    #[error("unknown delivery kind: {0}")]
    UnknownDeliveryKind(String),

    /// History fetch, generation, or outbound send failed.
    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    /// Required settings absent at startup.
    #[error("missing required configuration: {}", .0.join(", "))]
    ConfigurationMissing(Vec<String>),
}

impl GatewayError {
    /// HTTP status for this error when it escapes synchronous dispatch.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            GatewayError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnknownDeliveryKind(_) => StatusCode::OK,
            GatewayError::CollaboratorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ConfigurationMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
