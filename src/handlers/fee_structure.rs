use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{
        CreateFeeStructureRequest, FeeSchedule, FeeStructure, FeeStructureDetail, FeeStructureItem,
    },
    services::{calendar, fees, invoice},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Create a fee structure for a grade. Any previously active structure for
/// the same grade and year is superseded (kept for audit, marked inactive).
#[utoipa::path(
    post,
    path = "/api/v1/fee-structures",
    request_body = CreateFeeStructureRequest,
    responses(
        (status = 201, description = "Fee structure created", body = FeeStructureDetail),
        (status = 400, description = "Invalid months, items or amounts"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Academic year or GL account not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fee Structures"
)]
pub async fn create_fee_structure(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateFeeStructureRequest>,
) -> AppResult<(axum::http::StatusCode, Json<FeeStructureDetail>)> {
    if body.grade_level.trim().is_empty() {
        return Err(AppError::Validation("Grade level cannot be empty".to_string()));
    }
    if body.months.is_empty() {
        return Err(AppError::Validation(
            "A fee structure must bill at least one month".to_string(),
        ));
    }
    for month in &body.months {
        calendar::month_name(*month)?;
    }
    if body.items.is_empty() {
        return Err(AppError::Validation(
            "A fee structure must have at least one line item".to_string(),
        ));
    }
    for item in &body.items {
        if item.category.trim().is_empty() {
            return Err(AppError::Validation("Item category cannot be empty".to_string()));
        }
        if item.amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Item '{}' must have a positive amount",
                item.category
            )));
        }
    }

    invoice::find_academic_year(&state.db, body.academic_year_id).await?;

    let account_ids: Vec<Uuid> = body
        .items
        .iter()
        .map(|item| item.account_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let known_accounts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM gl_accounts WHERE id = ANY($1)")
            .bind(&account_ids)
            .fetch_one(&state.db)
            .await?;
    if known_accounts != account_ids.len() as i64 {
        return Err(AppError::NotFound(
            "One or more GL accounts do not exist".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;

    let superseded = sqlx::query(
        "UPDATE fee_structures SET active = FALSE
         WHERE academic_year_id = $1 AND grade_level = $2 AND active",
    )
    .bind(body.academic_year_id)
    .bind(body.grade_level.trim())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let structure = sqlx::query_as::<_, FeeStructure>(
        r#"INSERT INTO fee_structures (academic_year_id, grade_level, name, months)
           VALUES ($1, $2, $3, $4)
           RETURNING *"#,
    )
    .bind(body.academic_year_id)
    .bind(body.grade_level.trim())
    .bind(body.name.trim())
    .bind(&body.months)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(body.items.len());
    for (idx, item) in body.items.iter().enumerate() {
        let row = sqlx::query_as::<_, FeeStructureItem>(
            r#"INSERT INTO fee_structure_items (fee_structure_id, category, amount, account_id, position)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(structure.id)
        .bind(item.category.trim())
        .bind(item.amount)
        .bind(item.account_id)
        .bind((idx + 1) as i32)
        .fetch_one(&mut *tx)
        .await?;
        items.push(row);
    }

    tx.commit().await?;

    if superseded > 0 {
        info!(
            "Fee structure {} supersedes {} previous structure(s) for {} / year {}",
            structure.id, superseded, structure.grade_level, structure.academic_year_id
        );
    }

    Ok((
        axum::http::StatusCode::CREATED,
        Json(FeeStructureDetail { structure, items }),
    ))
}

/// List all fee structures
#[utoipa::path(
    get,
    path = "/api/v1/fee-structures",
    responses(
        (status = 200, description = "List of fee structures", body = Vec<FeeStructure>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fee Structures"
)]
pub async fn list_fee_structures(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<FeeStructure>>> {
    let structures =
        sqlx::query_as::<_, FeeStructure>("SELECT * FROM fee_structures ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;

    Ok(Json(structures))
}

/// Get a fee structure with its line items
#[utoipa::path(
    get,
    path = "/api/v1/fee-structures/{structure_id}",
    params(("structure_id" = Uuid, Path, description = "Fee structure ID")),
    responses(
        (status = 200, description = "Fee structure detail", body = FeeStructureDetail),
        (status = 404, description = "Fee structure not found"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fee Structures"
)]
pub async fn get_fee_structure(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(structure_id): Path<Uuid>,
) -> AppResult<Json<FeeStructureDetail>> {
    let structure = fees::find_structure(&state.db, structure_id).await?;
    let items = fees::structure_items(&state.db, structure_id).await?;

    Ok(Json(FeeStructureDetail { structure, items }))
}

#[derive(Debug, Deserialize)]
pub struct ResolveFeeQuery {
    pub grade_level: String,
    pub academic_year_id: Uuid,
}

/// Resolve the active fee structure for a grade into its per-month schedule
#[utoipa::path(
    get,
    path = "/api/v1/fee-structures/resolve",
    params(
        ("grade_level" = String, Query, description = "Grade level, e.g. 'Grade 4'"),
        ("academic_year_id" = Uuid, Query, description = "Academic year ID"),
    ),
    responses(
        (status = 200, description = "Resolved monthly schedule", body = FeeSchedule),
        (status = 404, description = "No active fee structure for the grade and year"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fee Structures"
)]
pub async fn resolve_fee_structure(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ResolveFeeQuery>,
) -> AppResult<Json<FeeSchedule>> {
    let schedule = fees::resolve(&state.db, query.grade_level.trim(), query.academic_year_id).await?;
    Ok(Json(schedule))
}
