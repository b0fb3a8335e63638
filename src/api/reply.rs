//! JSON replies and body parsing shared by the handlers

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::error::AppError;

pub type HandlerResult = Result<Response, Infallible>;

/// Request body over the size cap
#[derive(Debug)]
pub struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// Request body stream failed mid-read
#[derive(Debug)]
pub struct BodyUnreadable;

impl warp::reject::Reject for BodyUnreadable {}

pub fn json<T: Serialize>(body: &T) -> Response {
    warp::reply::json(body).into_response()
}

pub fn json_status<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

/// `{error}` body with the given status
pub fn error(status: StatusCode, message: &str) -> Response {
    json_status(&json!({ "error": message }), status)
}

pub fn unauthorized() -> Response {
    error(StatusCode::UNAUTHORIZED, "Unauthorized")
}

pub fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "Not found")
}

pub fn invalid_request() -> Response {
    error(StatusCode::BAD_REQUEST, "Invalid request")
}

/// Status and sanitized message from an [`AppError`]
pub fn app_error(e: &AppError) -> Response {
    error(e.status_code(), &e.public_message())
}

/// Parse a JSON body; a bad body becomes `400 {error: message}`
pub fn parse_body<T: DeserializeOwned>(body: &Bytes, message: &str) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        error(StatusCode::BAD_REQUEST, message)
    })
}

/// Map rejections that no route handled to JSON errors
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    // Body rejections outrank path and method misses from sibling routes
    let response = if err.find::<BodyTooLarge>().is_some() {
        error(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
    } else if err.find::<BodyUnreadable>().is_some() {
        invalid_request()
    } else if err.is_not_found() {
        not_found()
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err.find::<warp::filters::cors::CorsForbidden>().is_some() {
        error(StatusCode::FORBIDDEN, "Forbidden")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        invalid_request()
    } else {
        tracing::warn!(rejection = ?err, "Unhandled rejection");
        error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };
    Ok(response)
}
