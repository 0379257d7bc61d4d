/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `auth` and `store`.)

Every response body is JSON. Failures are reported as `{"error": "..."}`
with a conventional status code; see `ApiError`.
*/
use std::{
    fmt::Display,
    path::Path,
    sync::Arc,
};

use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{
        DefaultBodyLimit, Extension, FromRequest, FromRequestParts, Multipart,
        OriginalUri, rejection::JsonRejection,
    },
    http::{header, request::Parts, HeaderMap, Method, Request, StatusCode},
    Json,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
    routing::{get, post},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::auth::Claims;
use crate::config::Glob;
use crate::student::StudentInput;

pub mod attendance;
pub mod auth;
pub mod reports;
pub mod students;

/// Path prefix under which stored photos are served.
pub const UPLOAD_PREFIX: &str = "/uploads/";

static UNSAFE_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({ "error": self.to_string() }))
        ).into_response()
    }
}

/// Log the real problem; tell the client only `public_msg`.
pub fn internal<E: Display>(public_msg: &str, e: E) -> ApiError {
    log::error!("{}: {}", public_msg, &e);
    ApiError::Internal(public_msg.to_owned())
}

pub fn bad_json(r: JsonRejection) -> ApiError {
    log::trace!("Rejecting request body: {}", &r);
    ApiError::BadRequest(format!("Invalid request body: {}", r.body_text()))
}

/// Parse a `:id` path segment.
pub fn parse_id(s: &str) -> Result<i32, ApiError> {
    match s.parse::<i32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ApiError::BadRequest("Invalid student ID".to_owned())),
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let val = headers.get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_owned()))?;
    let val = val.to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid token".to_owned()))?;

    let mut parts = val.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(tok), None) if !tok.is_empty() => Ok(tok),
        _ => Err(ApiError::Unauthorized("Invalid token".to_owned())),
    }
}

/// Middleware that rejects requests without a valid bearer token and makes
/// the token's `Claims` available to the handlers behind it.
pub async fn require_auth<B>(
    mut req: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let glob: Arc<Glob> = match req.extensions().get::<Arc<Glob>>() {
        Some(g) => g.clone(),
        None => {
            return Err(internal(
                "Internal server error",
                "global state missing from request extensions"
            ));
        },
    };

    let claims = {
        let token = bearer_token(req.headers())?;
        glob.auth.check_token(token).map_err(|e| {
            log::debug!("Rejected token: {}", &e);
            ApiError::Unauthorized("Invalid token".to_owned())
        })?
    };
    log::trace!("Request authenticated as {:?} ({}).", &claims.email, &claims.role);

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Claims>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Missing token".to_owned()))
    }
}

/// A file sent in the `photo` part of a multipart student form.
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Student fields from either a JSON body or a `multipart/form-data` body.
#[derive(Debug)]
pub struct StudentForm {
    pub input: StudentInput,
    pub photo: Option<Upload>,
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers.get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("multipart/form-data"))
}

#[async_trait]
impl<S> FromRequest<S, Body> for StudentForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(req.headers()) {
            let Json(input) = Json::<StudentInput>::from_request(req, state).await
                .map_err(bad_json)?;
            return Ok(StudentForm { input, photo: None });
        }

        let mut form = Multipart::from_request(req, state).await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let malformed = |e: axum::extract::multipart::MultipartError| {
            ApiError::BadRequest(format!("Malformed form data: {}", &e))
        };

        let mut input = StudentInput::default();
        let mut photo: Option<Upload> = None;
        while let Some(field) = form.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or("").to_owned();
            if name == "photo" {
                let file_name = field.file_name().unwrap_or("photo").to_owned();
                let bytes = field.bytes().await.map_err(malformed)?;
                if !bytes.is_empty() {
                    photo = Some(Upload { file_name, bytes });
                }
                continue;
            }

            let slot = match name.as_str() {
                "firstName" => &mut input.first_name,
                "lastName" => &mut input.last_name,
                "phone" => &mut input.phone,
                "email" => &mut input.email,
                "instituteCode" => &mut input.institute_code,
                "batch" => &mut input.batch,
                x => {
                    log::trace!("Ignoring form field {:?}.", x);
                    continue;
                },
            };
            *slot = Some(field.text().await.map_err(malformed)?);
        }

        Ok(StudentForm { input, photo })
    }
}

fn stored_file_name(original: &str, millis: i128) -> String {
    let base = original.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");
    let clean = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        format!("{}-photo", millis)
    } else {
        format!("{}-{}", millis, clean)
    }
}

/// Writes `up` into `dir` and returns the path it will be served from.
pub async fn save_upload(dir: &Path, up: &Upload) -> Result<String, std::io::Error> {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let name = stored_file_name(&up.file_name, millis);
    tokio::fs::write(dir.join(&name), &up.bytes).await?;
    log::trace!("Stored upload {:?} as {:?}.", &up.file_name, &name);
    Ok(format!("{}{}", UPLOAD_PREFIX, &name))
}

/// Best-effort removal of a stored photo; failures are only logged.
pub async fn remove_photo(dir: &Path, served_path: &str) {
    let name = match served_path.strip_prefix(UPLOAD_PREFIX) {
        Some(n) if !n.is_empty() && !n.contains('/') && !n.contains("..") => n,
        _ => {
            log::warn!("Not removing photo with unexpected path {:?}.", served_path);
            return;
        },
    };

    if let Err(e) = tokio::fs::remove_file(dir.join(name)).await {
        log::warn!("Unable to remove photo {:?}: {}", name, &e);
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Student Attendance API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": ["POST /api/auth/register", "POST /api/auth/login"],
            "students": [
                "GET /api/students", "POST /api/students",
                "GET /api/students/:id", "PUT /api/students/:id",
                "DELETE /api/students/:id"
            ],
            "attendance": [
                "GET /api/attendance", "POST /api/attendance",
                "POST /api/attendance/bulk"
            ],
            "reports": ["GET /api/reports/summary"],
            "users": ["GET /api/users"],
        }
    }))
}

async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
    log::trace!("No route for {} {}.", &method, uri.path());
    ApiError::NotFound(format!("Route {} {} not found", &method, uri.path()))
}

/// The complete application.
pub fn router(glob: Arc<Glob>, max_body_bytes: usize) -> Router {
    // Known paths answer unsupported methods with the same JSON 404 as
    // unknown paths.
    let protected = Router::new()
        .route(
            "/students",
            get(students::list).post(students::create).fallback(not_found)
        )
        .route(
            "/students/:id",
            get(students::get_one).put(students::update).delete(students::delete)
                .fallback(not_found)
        )
        .route(
            "/attendance",
            get(attendance::query).post(attendance::record).fallback(not_found)
        )
        .route("/attendance/bulk", post(attendance::bulk).fallback(not_found))
        .route("/reports/summary", get(reports::summary).fallback(not_found))
        .route("/users", get(reports::users).fallback(not_found))
        .route_layer(middleware::from_fn(require_auth));

    let api = Router::new()
        .route("/auth/register", post(auth::register).fallback(not_found))
        .route("/auth/login", post(auth::login).fallback(not_found))
        .merge(protected);

    Router::new()
        .route("/", get(root).fallback(not_found))
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&glob.upload_dir))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(Extension(glob))
}
