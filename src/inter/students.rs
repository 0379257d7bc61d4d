/*!
Student CRUD. Staff see and touch only students of their own institute.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::Claims,
    config::Glob,
    student::{Student, StudentInput},
};
use super::{internal, parse_id, remove_photo, save_upload, ApiError, StudentForm};

const WRONG_INSTITUTE: &str = "Access denied: Student belongs to a different institute";

/// Fetch a student the caller is allowed to see.
async fn accessible_student(
    glob: &Glob,
    claims: &Claims,
    id: i32,
    fail_msg: &str,
) -> Result<Student, ApiError> {
    let s = match glob.store.get_student(id).await {
        Err(e) => { return Err(internal(fail_msg, e)); },
        Ok(None) => { return Err(ApiError::NotFound("Student not found".to_owned())); },
        Ok(Some(s)) => s,
    };

    if !claims.may_access(&s.institute_code) {
        log::trace!(
            "{:?} denied access to student {} of {:?}.",
            &claims.email, &s.id, &s.institute_code
        );
        return Err(ApiError::Forbidden(WRONG_INSTITUTE.to_owned()));
    }

    Ok(s)
}

/// Zero rows changed by a non-empty update means the student went away
/// after it was looked up.
fn check_updated(rows: u64, input: &StudentInput) -> Result<(), ApiError> {
    if rows == 0 && !input.is_empty() {
        return Err(ApiError::NotFound("Student not found".to_owned()));
    }
    Ok(())
}

/// Stores the uploaded photo, if any, and records its path in `form.input`.
async fn attach_photo(
    glob: &Glob,
    form: &mut StudentForm,
    fail_msg: &str,
) -> Result<(), ApiError> {
    if let Some(up) = form.photo.as_ref() {
        let path = save_upload(&glob.upload_dir, up).await
            .map_err(|e| internal(fail_msg, e))?;
        form.input.photo = Some(path);
    }
    Ok(())
}

pub async fn list(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
) -> Result<Json<Vec<Student>>, ApiError> {
    log::trace!("students::list( {:?} ) called.", &claims.email);

    glob.store.get_students(claims.scope()).await
        .map(Json)
        .map_err(|e| internal("Failed to fetch students", e))
}

pub async fn get_one(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
    Path(id): Path<String>,
) -> Result<Json<Student>, ApiError> {
    log::trace!("students::get_one( {:?}, {:?} ) called.", &claims.email, &id);

    let id = parse_id(&id)?;
    let s = accessible_student(&glob, &claims, id, "Failed to fetch student").await?;
    Ok(Json(s))
}

pub async fn create(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
    mut form: StudentForm,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    log::trace!("students::create( {:?}, {:?} ) called.", &claims.email, &form.input);

    const FAIL: &str = "Failed to create student";

    if let Some(code) = claims.scope() {
        form.input.institute_code = Some(code.to_owned());
    }
    form.input.validate(true).map_err(ApiError::BadRequest)?;
    attach_photo(&glob, &mut form, FAIL).await?;

    let id = match glob.store.insert_student(&form.input).await {
        Ok(id) => id,
        Err(e) => {
            if let Some(p) = form.input.photo.as_deref() {
                remove_photo(&glob.upload_dir, p).await;
            }
            return Err(internal(FAIL, e));
        },
    };
    log::info!("{:?} created student {}.", &claims.email, &id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Student created successfully" }))
    ))
}

pub async fn update(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
    Path(id): Path<String>,
    mut form: StudentForm,
) -> Result<Json<Value>, ApiError> {
    log::trace!(
        "students::update( {:?}, {:?}, {:?} ) called.",
        &claims.email, &id, &form.input
    );

    const FAIL: &str = "Failed to update student";

    let id = parse_id(&id)?;
    let existing = accessible_student(&glob, &claims, id, FAIL).await?;

    if let Some(code) = claims.scope() {
        match form.input.institute_code.as_deref() {
            Some(c) if !c.is_empty() && c != code => {
                return Err(ApiError::Forbidden(
                    "Access denied: Cannot transfer student to a different institute".to_owned()
                ));
            },
            _ => { form.input.institute_code = None; },
        }
    }
    form.input.validate(false).map_err(ApiError::BadRequest)?;
    attach_photo(&glob, &mut form, FAIL).await?;

    if form.input.is_empty() {
        log::debug!("{:?} sent an empty update for student {}.", &claims.email, &id);
    }
    let outcome = glob.store.update_student(id, &form.input).await
        .map_err(|e| internal(FAIL, e))
        .and_then(|n| check_updated(n, &form.input));
    if let Err(e) = outcome {
        if let Some(p) = form.input.photo.as_deref() {
            remove_photo(&glob.upload_dir, p).await;
        }
        return Err(e);
    }

    // A replaced photo is no longer referenced by anything.
    if let (Some(_), Some(old)) = (form.input.photo.as_ref(), existing.photo.as_deref()) {
        remove_photo(&glob.upload_dir, old).await;
    }

    Ok(Json(json!({ "ok": true, "message": "Student updated successfully" })))
}

pub async fn delete(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    log::trace!("students::delete( {:?}, {:?} ) called.", &claims.email, &id);

    const FAIL: &str = "Failed to delete student";

    let id = parse_id(&id)?;
    let existing = accessible_student(&glob, &claims, id, FAIL).await?;

    match glob.store.delete_student(id).await {
        Err(e) => { return Err(internal(FAIL, e)); },
        Ok(false) => {
            return Err(ApiError::NotFound("Student not found".to_owned()));
        },
        Ok(true) => {},
    }
    log::info!("{:?} deleted student {}.", &claims.email, &id);

    if let Some(p) = existing.photo.as_deref() {
        remove_photo(&glob.upload_dir, p).await;
    }

    Ok(Json(json!({ "ok": true, "message": "Student deleted successfully" })))
}
