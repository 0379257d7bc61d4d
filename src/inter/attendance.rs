/*!
Recording and querying attendance.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Query, rejection::{JsonRejection, QueryRejection}},
    Json,
};
use serde_json::{json, Value};

use crate::{
    attendance::{AttendanceQuery, AttendanceRow, BulkRequest, RecordRequest},
    auth::Claims,
    config::Glob,
};
use super::{bad_json, internal, ApiError};

pub async fn record(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<RecordRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(bad_json)?;
    log::trace!("attendance::record( {:?}, {:?} ) called.", &claims.email, &body);

    const FAIL: &str = "Failed to record attendance";

    let rec = body.check().map_err(ApiError::BadRequest)?;

    let s = match glob.store.get_student(rec.student_id).await {
        Err(e) => { return Err(internal(FAIL, e)); },
        Ok(None) => { return Err(ApiError::NotFound("Student not found".to_owned())); },
        Ok(Some(s)) => s,
    };
    if !claims.may_access(&s.institute_code) {
        return Err(ApiError::Forbidden(
            "Access denied: Student belongs to a different institute".to_owned()
        ));
    }

    let id = glob.store.insert_attendance(rec.student_id, rec.date, rec.status).await
        .map_err(|e| internal(FAIL, e))?;

    Ok(Json(json!({ "id": id, "message": "Attendance recorded successfully" })))
}

/**
Saves a whole day's attendance for a list of students.

Every referenced student must exist and be visible to the caller before
anything is written.
*/
pub async fn bulk(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(bad_json)?;
    log::trace!(
        "attendance::bulk( {:?}, {:?}, [ {} records ] ) called.",
        &claims.email, &body.date, body.records.as_ref().map_or(0, |r| r.len())
    );

    const FAIL: &str = "Failed to save attendance";

    let batch = body.check().map_err(ApiError::BadRequest)?;

    let ids = batch.student_ids();
    let found = glob.store.get_students_by_ids(&ids).await
        .map_err(|e| internal(FAIL, e))?;
    if found.len() != ids.len() {
        let missing: Vec<String> = ids.iter()
            .filter(|id| !found.iter().any(|s| s.id == **id))
            .map(|id| id.to_string())
            .collect();
        return Err(ApiError::NotFound(format!(
            "Student not found: {}", missing.join(", ")
        )));
    }
    if let Some(s) = found.iter().find(|s| !claims.may_access(&s.institute_code)) {
        log::trace!(
            "{:?} denied bulk attendance for student {} of {:?}.",
            &claims.email, &s.id, &s.institute_code
        );
        return Err(ApiError::Forbidden(
            "Access denied: Student belongs to a different institute".to_owned()
        ));
    }

    let count = glob.store.save_bulk_attendance(&batch).await
        .map_err(|e| internal(FAIL, e))?;
    log::info!(
        "{:?} saved attendance for {} students on {}.",
        &claims.email, &count, &batch.date
    );

    Ok(Json(json!({
        "ok": true,
        "count": count,
        "message": format!("Attendance saved for {} students", count),
    })))
}

pub async fn query(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
    q: Result<Query<AttendanceQuery>, QueryRejection>,
) -> Result<Json<Vec<AttendanceRow>>, ApiError> {
    let Query(q) = q.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    log::trace!("attendance::query( {:?}, {:?} ) called.", &claims.email, &q);

    let filter = q.filter().map_err(ApiError::BadRequest)?;

    glob.store.get_attendance(&filter, claims.scope()).await
        .map(Json)
        .map_err(|e| internal("Failed to fetch attendance records", e))
}
