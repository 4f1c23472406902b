use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response
/// HttpError is used to generate a synthetic error response
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong while handling a single request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Failed to identify client: {0}")]
    ClientKey(String),

    #[error("Client rate limit exceeded for route {route}")]
    TooManyRequests { route: String },

    #[error("Route rate limit exceeded for {route}")]
    RouteOverloaded { route: String },

    #[error("Failed to get response from upstream: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl HttpError {
    /// Label used for the `error_type` metric attribute
    pub fn error_type(&self) -> &'static str {
        match self {
            HttpError::ClientKey(_) => "client_key",
            HttpError::TooManyRequests { .. } => "too_many_requests",
            HttpError::RouteOverloaded { .. } => "route_overloaded",
            HttpError::UpstreamUnavailable(_) => "upstream_unavailable",
            HttpError::InvalidUri(_) => "invalid_uri",
        }
    }
}

impl From<&HttpError> for StatusCode {
    fn from(e: &HttpError) -> StatusCode {
        match e {
            HttpError::ClientKey(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            HttpError::RouteOverloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            HttpError::InvalidUri(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<HttpError> for StatusCode {
    fn from(e: HttpError) -> StatusCode {
        StatusCode::from(&e)
    }
}
