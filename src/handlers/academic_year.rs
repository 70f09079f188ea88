use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{AcademicYear, CreateAcademicYearRequest},
    state::AppState,
};
use axum::{Json, extract::State};

/// Register an academic year with its Ethiopian New Year anchor date
#[utoipa::path(
    post,
    path = "/api/v1/academic-years",
    request_body = CreateAcademicYearRequest,
    responses(
        (status = 201, description = "Academic year created", body = AcademicYear),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Academic year name already exists"),
    ),
    security(("bearer_auth" = [])),
    tag = "Academic Years"
)]
pub async fn create_academic_year(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateAcademicYearRequest>,
) -> AppResult<(axum::http::StatusCode, Json<AcademicYear>)> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(
            "Academic year name cannot be empty".to_string(),
        ));
    }

    let year = sqlx::query_as::<_, AcademicYear>(
        r#"INSERT INTO academic_years (name, new_year_date)
           VALUES ($1, $2)
           RETURNING *"#,
    )
    .bind(name)
    .bind(body.new_year_date)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(format!("Academic year '{name}' already exists"))
        }
        other => AppError::Database(other),
    })?;

    Ok((axum::http::StatusCode::CREATED, Json(year)))
}

/// List all academic years
#[utoipa::path(
    get,
    path = "/api/v1/academic-years",
    responses(
        (status = 200, description = "List of academic years", body = Vec<AcademicYear>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Academic Years"
)]
pub async fn list_academic_years(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<AcademicYear>>> {
    let years =
        sqlx::query_as::<_, AcademicYear>("SELECT * FROM academic_years ORDER BY new_year_date DESC")
            .fetch_all(&state.db)
            .await?;

    Ok(Json(years))
}
