/*!
Registration and login.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth,
    config::Glob,
    user::{LoginRequest, NewUser, RegisterRequest, Role},
};
use super::{bad_json, internal, ApiError};

pub async fn register(
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(bad_json)?;
    log::trace!("register( {:?}, {:?} ) called.", &body.email, &body.institute_code);

    let reg = body.check().map_err(ApiError::BadRequest)?;

    const FAIL: &str = "Registration failed. Please try again.";
    let password_hash = auth::hash_password(reg.password)
        .map_err(|e| internal(FAIL, e))?;

    let new_user = NewUser {
        name: &reg.name,
        email: reg.email,
        password_hash: &password_hash,
        phone: reg.phone,
        institute_code: reg.institute_code,
        role: Role::User,
    };

    let u = match glob.store.insert_user(&new_user).await {
        Err(e) => { return Err(internal(FAIL, e)); },
        Ok(None) => {
            return Err(ApiError::Conflict(
                "User with this email already exists".to_owned()
            ));
        },
        Ok(Some(u)) => u,
    };
    log::info!("Registered {:?} for institute {:?}.", &u.email, &u.institute_code);

    let token = glob.auth.issue_token(&u).map_err(|e| internal(FAIL, e))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "token": token,
            "user": u.public(),
        }))
    ))
}

pub async fn login(
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(bad_json)?;
    log::trace!("login( {:?} ) called.", &body.email);

    let (email, password) = body.check().map_err(ApiError::BadRequest)?;

    const FAIL: &str = "Login failed. Please try again.";
    let bad_creds = || ApiError::Unauthorized("Invalid credentials".to_owned());

    let u = match glob.store.get_user_by_email(email).await {
        Err(e) => { return Err(internal(FAIL, e)); },
        Ok(None) => { return Err(bad_creds()); },
        Ok(Some(u)) => u,
    };
    if !auth::check_password(password, &u.password_hash) {
        log::trace!("Bad password for {:?}.", &u.email);
        return Err(bad_creds());
    }

    let token = glob.auth.issue_token(&u).map_err(|e| internal(FAIL, e))?;

    Ok(Json(json!({
        "token": token,
        "user": u.public(),
    })))
}
