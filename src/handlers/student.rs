use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{
        ClassOverviewResponse, Invoice, InvoiceBalance, Student, StudentBalanceResponse,
        StudentOverview, StudentRef,
    },
    services::latefee,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub as_of_date: Option<NaiveDate>,
}

/// Per-invoice and aggregate balance for one student, with late fees brought
/// current as of the requested date before anything is summed.
#[utoipa::path(
    get,
    path = "/api/v1/students/{student_ref}/balance",
    params(
        ("student_ref" = String, Path, description = "Canonical SCHOOL:CLASS:STUDENT reference"),
        ("as_of_date" = Option<NaiveDate>, Query, description = "Assessment date, defaults to today"),
    ),
    responses(
        (status = 200, description = "Student balance", body = StudentBalanceResponse),
        (status = 400, description = "Malformed student reference"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Balances"
)]
pub async fn get_student_balance(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(student_ref): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> AppResult<Json<StudentBalanceResponse>> {
    let student_ref: StudentRef = student_ref.parse().map_err(AppError::from)?;
    let as_of = query.as_of_date.unwrap_or_else(|| Utc::now().date_naive());

    latefee::recompute_late_fees(&state.db, as_of, Some(&student_ref)).await?;

    let invoices = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE student_ref = $1 ORDER BY due_date, month_number",
    )
    .bind(student_ref.to_string())
    .fetch_all(&state.db)
    .await?;

    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE student_ref = $1")
        .bind(student_ref.to_string())
        .fetch_optional(&state.db)
        .await?;

    let total_invoiced: Decimal = invoices.iter().map(|inv| inv.net_amount).sum();
    let total_paid: Decimal = invoices.iter().map(|inv| inv.paid_amount).sum();

    Ok(Json(StudentBalanceResponse {
        student_ref,
        full_name: student.map(|s| s.full_name),
        as_of_date: as_of,
        invoices: invoices.iter().map(InvoiceBalance::from).collect(),
        total_invoiced,
        total_paid,
        total_outstanding: total_invoiced - total_paid,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClassOverviewQuery {
    pub academic_year_id: Option<Uuid>,
}

/// Billing overview for every active student of a grade. Figures reflect the
/// most recent late-fee recompute.
#[utoipa::path(
    get,
    path = "/api/v1/classes/{grade_level}/overview",
    params(
        ("grade_level" = String, Path, description = "Grade level, e.g. 'Grade 4'"),
        ("academic_year_id" = Option<Uuid>, Query, description = "Restrict to one academic year"),
    ),
    responses(
        (status = 200, description = "Class overview", body = ClassOverviewResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Balances"
)]
pub async fn get_class_overview(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(grade_level): Path<String>,
    Query(query): Query<ClassOverviewQuery>,
) -> AppResult<Json<ClassOverviewResponse>> {
    let students = sqlx::query_as::<_, StudentOverview>(
        r#"SELECT s.student_ref,
                  s.full_name,
                  COUNT(i.id) AS invoice_count,
                  COALESCE(SUM(i.net_amount), 0) AS total_invoiced,
                  COALESCE(SUM(i.paid_amount), 0) AS total_paid,
                  COALESCE(SUM(i.net_amount - i.paid_amount), 0) AS total_outstanding,
                  COUNT(i.id) FILTER (WHERE i.status = 'overdue') AS overdue_count
           FROM students s
           LEFT JOIN invoices i
             ON i.student_ref = s.student_ref
            AND ($2::uuid IS NULL OR i.academic_year_id = $2)
           WHERE s.grade_level = $1 AND s.active
           GROUP BY s.student_ref, s.full_name
           ORDER BY s.full_name"#,
    )
    .bind(&grade_level)
    .bind(query.academic_year_id)
    .fetch_all(&state.db)
    .await?;

    let total_invoiced: Decimal = students.iter().map(|s| s.total_invoiced).sum();
    let total_paid: Decimal = students.iter().map(|s| s.total_paid).sum();

    Ok(Json(ClassOverviewResponse {
        grade_level,
        students,
        total_invoiced,
        total_paid,
        total_outstanding: total_invoiced - total_paid,
    }))
}
