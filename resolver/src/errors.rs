use crate::legislative::UpstreamError;
use http::StatusCode;
use thiserror::Error;

/// Errors surfaced to callers of the lookup endpoint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("postcode is required")]
    MissingPostcode,

    #[error("client credentials are required")]
    MissingCredentials,

    #[error("unauthorised client")]
    Unauthorized,

    #[error("no representative found for this postcode")]
    NotFound,

    #[error("legislative data lookup failed")]
    Upstream(#[source] UpstreamError),
}

impl ResolveError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResolveError::MissingPostcode => StatusCode::BAD_REQUEST,
            ResolveError::MissingCredentials => StatusCode::UNAUTHORIZED,
            ResolveError::Unauthorized => StatusCode::FORBIDDEN,
            ResolveError::NotFound => StatusCode::NOT_FOUND,
            ResolveError::Upstream(e) => e.status_code(),
        }
    }

    /// Low-cardinality label used for metrics and events.
    pub fn outcome(&self) -> &'static str {
        match self {
            ResolveError::MissingPostcode => "invalid_request",
            ResolveError::MissingCredentials => "unauthenticated",
            ResolveError::Unauthorized => "forbidden",
            ResolveError::NotFound => "not_found",
            ResolveError::Upstream(_) => "upstream_error",
        }
    }
}
