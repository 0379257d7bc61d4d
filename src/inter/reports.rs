/*!
Read-only reports: the per-student attendance summary and, for admins, the
list of accounts.
*/
use std::sync::Arc;

use axum::{extract::Extension, Json};

use crate::{
    attendance::SummaryRow,
    auth::Claims,
    config::Glob,
    user::PublicUser,
};
use super::{internal, ApiError};

pub async fn summary(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
) -> Result<Json<Vec<SummaryRow>>, ApiError> {
    log::trace!("reports::summary( {:?} ) called.", &claims.email);

    glob.store.attendance_summary(claims.scope()).await
        .map(Json)
        .map_err(|e| internal("Failed to generate report", e))
}

pub async fn users(
    claims: Claims,
    Extension(glob): Extension<Arc<Glob>>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    log::trace!("reports::users( {:?} ) called.", &claims.email);

    if !claims.is_admin() {
        return Err(ApiError::Forbidden("Access denied. Admin only.".to_owned()));
    }

    let users = glob.store.get_users().await
        .map_err(|e| internal("Failed to fetch users", e))?;
    Ok(Json(users.iter().map(|u| u.public()).collect()))
}
