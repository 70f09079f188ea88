use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{
        GenerateInvoicesRequest, GenerateInvoicesResponse, Invoice, InvoiceStatus,
        RecomputeLateFeesRequest, RecomputeLateFeesResponse, ResetInvoicesRequest,
        ResetInvoicesResponse, StudentRef,
    },
    services::{invoice, latefee},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

/// Generate one invoice per student per billable month of a fee structure.
/// Already-invoiced (student, month) pairs are skipped, so re-running after
/// a roster change only fills the gaps.
#[utoipa::path(
    post,
    path = "/api/v1/invoices/generate",
    request_body = GenerateInvoicesRequest,
    responses(
        (status = 201, description = "Invoices generated", body = GenerateInvoicesResponse),
        (status = 400, description = "Empty roster"),
        (status = 404, description = "Fee structure not found"),
        (status = 409, description = "Structure superseded or concurrent generation"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Invoices"
)]
pub async fn generate_invoices(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<GenerateInvoicesRequest>,
) -> AppResult<(axum::http::StatusCode, Json<GenerateInvoicesResponse>)> {
    if body.student_refs.is_empty() {
        return Err(AppError::Validation(
            "At least one student is required".to_string(),
        ));
    }

    let issue_date = body.issue_date.unwrap_or_else(|| Utc::now().date_naive());
    let (invoices, skipped) = invoice::generate_invoices(
        &state.db,
        body.fee_structure_id,
        &body.student_refs,
        issue_date,
    )
    .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(GenerateInvoicesResponse {
            created: invoices.len(),
            skipped,
            invoices,
        }),
    ))
}

/// Re-assess late fees on every unpaid invoice as of a date. Safe to run any
/// number of times; each run sets the fee from scratch.
#[utoipa::path(
    post,
    path = "/api/v1/invoices/recompute-late-fees",
    request_body = RecomputeLateFeesRequest,
    responses(
        (status = 200, description = "Sweep finished", body = RecomputeLateFeesResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Invoices"
)]
pub async fn recompute_late_fees(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<RecomputeLateFeesRequest>,
) -> AppResult<Json<RecomputeLateFeesResponse>> {
    let as_of = body.as_of_date.unwrap_or_else(|| Utc::now().date_naive());
    let (examined, updated) =
        latefee::recompute_late_fees(&state.db, as_of, body.student_ref.as_ref()).await?;

    Ok(Json(RecomputeLateFeesResponse {
        as_of_date: as_of,
        examined,
        updated,
    }))
}

/// Delete a structure's invoices so generation can start over. Refused once
/// any of them carries a payment.
#[utoipa::path(
    post,
    path = "/api/v1/invoices/reset",
    request_body = ResetInvoicesRequest,
    responses(
        (status = 200, description = "Invoices deleted", body = ResetInvoicesResponse),
        (status = 409, description = "Invoices already carry payments"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Invoices"
)]
pub async fn reset_invoices(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<ResetInvoicesRequest>,
) -> AppResult<Json<ResetInvoicesResponse>> {
    let deleted = invoice::reset_invoices(&state.db, body.fee_structure_id).await?;
    Ok(Json(ResetInvoicesResponse { deleted }))
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub student_ref: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub fee_structure_id: Option<Uuid>,
}

/// List invoices, optionally filtered by student, status or structure
#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(
        ("student_ref" = Option<String>, Query, description = "Canonical SCHOOL:CLASS:STUDENT reference"),
        ("status" = Option<InvoiceStatus>, Query, description = "Invoice status filter"),
        ("fee_structure_id" = Option<Uuid>, Query, description = "Fee structure filter"),
    ),
    responses(
        (status = 200, description = "List of invoices", body = Vec<Invoice>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Invoices"
)]
pub async fn list_invoices(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> AppResult<Json<Vec<Invoice>>> {
    let student_ref: Option<StudentRef> = query
        .student_ref
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(AppError::from)?;

    let invoices = sqlx::query_as::<_, Invoice>(
        r#"SELECT * FROM invoices
           WHERE ($1::text IS NULL OR student_ref = $1)
             AND ($2::invoice_status IS NULL OR status = $2)
             AND ($3::uuid IS NULL OR fee_structure_id = $3)
           ORDER BY due_date, month_number, student_ref"#,
    )
    .bind(student_ref.map(|s| s.to_string()))
    .bind(query.status)
    .bind(query.fee_structure_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(invoices))
}

/// Get a single invoice
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{invoice_id}",
    params(("invoice_id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice detail", body = Invoice),
        (status = 404, description = "Invoice not found"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Invoices"
)]
pub async fn get_invoice(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(invoice_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {invoice_id} not found")))?;

    Ok(Json(invoice))
}
