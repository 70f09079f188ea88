use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{Payment, RecordPaymentRequest, RecordPaymentResponse, StudentRef},
    services::allocation,
    state::AppState,
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

/// Record a payment and settle it against the selected invoices.
///
/// The amount is split oldest month first; a single-invoice payment is
/// refused while an older month of the same year is still unpaid, and an
/// amount above everything outstanding is refused as an overpayment.
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded and allocated", body = RecordPaymentResponse),
        (status = 400, description = "Missing reference or invalid amount"),
        (status = 404, description = "Invoice not found for the student"),
        (status = 409, description = "Duplicate reference, overpayment or sequential lock"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn record_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<RecordPaymentRequest>,
) -> AppResult<(axum::http::StatusCode, Json<RecordPaymentResponse>)> {
    let (payments, allocations, invoices) =
        allocation::record_payment(&state.db, &body, &auth.name).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(RecordPaymentResponse {
            payments,
            allocations,
            invoices,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub student_ref: Option<String>,
}

/// List payments, optionally for one student
#[utoipa::path(
    get,
    path = "/api/v1/payments",
    params(
        ("student_ref" = Option<String>, Query, description = "Canonical SCHOOL:CLASS:STUDENT reference"),
    ),
    responses(
        (status = 200, description = "List of payments", body = Vec<Payment>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> AppResult<Json<Vec<Payment>>> {
    let student_ref: Option<StudentRef> = query
        .student_ref
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(AppError::from)?;

    let payments = sqlx::query_as::<_, Payment>(
        r#"SELECT * FROM payments
           WHERE ($1::text IS NULL OR student_ref = $1)
           ORDER BY created_at DESC"#,
    )
    .bind(student_ref.map(|s| s.to_string()))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(payments))
}
