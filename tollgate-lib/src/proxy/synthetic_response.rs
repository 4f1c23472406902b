use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;

use crate::proxy::http_result::HttpError;

pub type RespBody = BoxBody<Bytes, hyper::Error>;

/// Build a 4xx/5xx response whose body is the status text, e.g. "Too Many Requests".
pub fn synthetic_error_response(status_code: StatusCode) -> Response<RespBody> {
    let text = status_code.canonical_reason().unwrap_or("Error");
    let body = Full::new(Bytes::from_static(text.as_bytes()))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = status_code;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    resp
}

impl From<HttpError> for Response<RespBody> {
    fn from(e: HttpError) -> Self {
        synthetic_error_response(StatusCode::from(&e))
    }
}
