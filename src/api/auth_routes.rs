//! Registration and login

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;

use super::reply::{self, HandlerResult};
use super::{json_body, with_state, SharedState};
use crate::auth::{hash_password, verify_password};
use crate::store::StoreError;

#[derive(Debug, Deserialize)]
struct RegisterBody {
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

pub fn routes(state: SharedState) -> BoxedFilter<(Response,)> {
    let register = warp::path!("api" / "auth" / "register")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(register);

    let login = warp::path!("api" / "auth" / "login")
        .and(warp::post())
        .and(with_state(state))
        .and(json_body())
        .and_then(login);

    register.or(login).unify().boxed()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Field problems, keyed by field name
fn validate_registration(body: &RegisterBody) -> Vec<Value> {
    let mut issues = Vec::new();
    match body.email.as_deref().map(str::trim) {
        None => issues.push(json!({"path": "email", "message": "Required"})),
        Some(email) if !looks_like_email(email) => {
            issues.push(json!({"path": "email", "message": "Invalid email"}))
        }
        Some(_) => {}
    }
    match body.password.as_deref() {
        None => issues.push(json!({"path": "password", "message": "Required"})),
        Some(p) if p.chars().count() < 6 => issues.push(
            json!({"path": "password", "message": "String must contain at least 6 character(s)"}),
        ),
        Some(_) => {}
    }
    issues
}

async fn register(state: SharedState, body: Bytes) -> HandlerResult {
    let body: RegisterBody = match reply::parse_body(&body, "Invalid request body") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let issues = validate_registration(&body);
    if !issues.is_empty() {
        return Ok(reply::json_status(
            &json!({"error": "Validation failed", "issues": issues}),
            StatusCode::BAD_REQUEST,
        ));
    }
    let (Some(email), Some(password)) = (body.email.as_deref(), body.password.as_deref()) else {
        return Ok(reply::invalid_request());
    };
    let email = email.trim().to_lowercase();
    info!(email = %email, "Registration attempt");

    if state.store.find_user_by_email(&email).await.is_some() {
        return Ok(reply::error(StatusCode::BAD_REQUEST, "Email already in use"));
    }

    let password_hash = match hash_password(password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Password hashing failed");
            return Ok(reply::error(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed"));
        }
    };
    let user = match state.store.create_user(&email, password_hash, body.name).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => {
            return Ok(reply::error(StatusCode::CONFLICT, "Email already in use"))
        }
        Err(e) => return Ok(reply::app_error(&e.into())),
    };

    match state.auth.sign(user.id, &user.email, &user.role) {
        Ok(token) => Ok(reply::json(&json!({
            "user": {"id": user.id, "email": user.email, "role": user.role},
            "token": token,
        }))),
        Err(e) => Ok(reply::app_error(&e.into())),
    }
}

async fn login(state: SharedState, body: Bytes) -> HandlerResult {
    let body: LoginBody = match reply::parse_body(&body, "Invalid request") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    if !looks_like_email(body.email.trim()) || body.password.chars().count() < 6 {
        return Ok(reply::invalid_request());
    }

    let user = match state.store.find_user_by_email(&body.email).await {
        Some(user) if verify_password(&body.password, &user.password_hash) => user,
        _ => return Ok(reply::error(StatusCode::UNAUTHORIZED, "Invalid credentials")),
    };

    match state.auth.sign(user.id, &user.email, &user.role) {
        Ok(token) => Ok(reply::json(&json!({ "token": token }))),
        Err(e) => Ok(reply::app_error(&e.into())),
    }
}
