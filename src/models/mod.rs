// src/models/mod.rs

mod student_ref;

pub use student_ref::{StudentRef, StudentRefParseError};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ─── Academic Year ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AcademicYear {
    pub id: Uuid,
    pub name: String,
    /// Gregorian date of Meskerem 1, the anchor every month start is counted from.
    pub new_year_date: NaiveDate,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAcademicYearRequest {
    /// e.g. "2018 EC"
    pub name: String,
    pub new_year_date: NaiveDate,
}

// ─── Fee Structure ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FeeStructure {
    pub id: Uuid,
    pub academic_year_id: Uuid,
    pub grade_level: String,
    pub name: String,
    /// Ethiopian month numbers (1..=13) this structure bills.
    pub months: Vec<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FeeStructureItem {
    pub id: Uuid,
    pub fee_structure_id: Uuid,
    pub category: String,
    pub amount: Decimal,
    pub account_id: Uuid,
    pub position: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFeeStructureRequest {
    pub academic_year_id: Uuid,
    pub grade_level: String,
    pub name: String,
    pub months: Vec<i32>,
    pub items: Vec<FeeItemInput>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FeeItemInput {
    pub category: String,
    pub amount: Decimal,
    pub account_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeeStructureDetail {
    pub structure: FeeStructure,
    pub items: Vec<FeeStructureItem>,
}

/// Per-month billing plan derived from a fee structure.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FeeSchedule {
    pub fee_structure_id: Uuid,
    pub monthly_amount: Decimal,
    pub months: Vec<i32>,
    /// Revenue account the platform posts these invoices against.
    pub account_id: Uuid,
}

// ─── Late Fee Rules ───────────────────────────────────────────────────────────

// sqlx 0.8: custom Postgres enums need #[sqlx(type_name = "...")] on the enum
// so the runtime row decoder can map them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq)]
#[sqlx(type_name = "late_fee_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LateFeeKind {
    FixedAmount,
    PercentageOfTotal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LateFeeRule {
    pub id: Uuid,
    pub name: String,
    pub kind: LateFeeKind,
    /// Flat amount for `fixed_amount`; percentage for `percentage_of_total`,
    /// e.g. 2.5 means 2.5% of the invoice total.
    pub value: Decimal,
    /// Days past the due date before this rule starts to bite.
    pub grace_period_days: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLateFeeRuleRequest {
    pub name: String,
    pub kind: LateFeeKind,
    pub value: Decimal,
    pub grace_period_days: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLateFeeRuleRequest {
    pub name: Option<String>,
    pub value: Option<Decimal>,
    pub grace_period_days: Option<i32>,
    pub active: Option<bool>,
}

// ─── Invoice ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    PartiallyPaid,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub fee_structure_id: Uuid,
    pub academic_year_id: Uuid,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub student_ref: StudentRef,
    pub month_number: i32,
    pub month_name: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub late_fee_amount: Decimal,
    pub net_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Amount still owed: `net_amount - paid_amount`.
    pub fn balance(&self) -> Decimal {
        self.net_amount - self.paid_amount
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateInvoicesRequest {
    pub fee_structure_id: Uuid,
    #[schema(value_type = Vec<String>)]
    pub student_refs: Vec<StudentRef>,
    /// Defaults to today when omitted.
    pub issue_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateInvoicesResponse {
    pub created: usize,
    pub skipped: usize,
    pub invoices: Vec<Invoice>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecomputeLateFeesRequest {
    /// Defaults to today when omitted.
    pub as_of_date: Option<NaiveDate>,
    /// Restrict the sweep to a single student.
    #[schema(value_type = Option<String>)]
    pub student_ref: Option<StudentRef>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecomputeLateFeesResponse {
    pub as_of_date: NaiveDate,
    pub examined: usize,
    pub updated: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetInvoicesRequest {
    pub fee_structure_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetInvoicesResponse {
    pub deleted: u64,
}

// ─── Payments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobileMoney,
    Cheque,
}

impl PaymentMethod {
    /// Cash is handed over at the school desk and carries no external
    /// transaction id; every other method must quote one.
    pub fn requires_reference(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub student_ref: StudentRef,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PaymentAllocation {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    #[schema(value_type = String)]
    pub student_ref: StudentRef,
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// Defaults to today when omitted.
    pub payment_date: Option<NaiveDate>,
    /// External transaction id; required for every method except cash.
    pub reference: Option<String>,
    pub notes: Option<String>,
    /// Invoices this payment may settle, usually one month or a run of months.
    pub invoice_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordPaymentResponse {
    pub payments: Vec<Payment>,
    pub allocations: Vec<PaymentAllocation>,
    pub invoices: Vec<Invoice>,
}

// ─── Balances & Reporting ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Student {
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub student_ref: StudentRef,
    pub full_name: String,
    pub grade_level: String,
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudentBalanceResponse {
    #[schema(value_type = String)]
    pub student_ref: StudentRef,
    pub full_name: Option<String>,
    pub as_of_date: NaiveDate,
    pub invoices: Vec<InvoiceBalance>,
    pub total_invoiced: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceBalance {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub month_number: i32,
    pub month_name: String,
    pub due_date: NaiveDate,
    pub net_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: InvoiceStatus,
}

impl From<&Invoice> for InvoiceBalance {
    fn from(invoice: &Invoice) -> Self {
        InvoiceBalance {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            month_number: invoice.month_number,
            month_name: invoice.month_name.clone(),
            due_date: invoice.due_date,
            net_amount: invoice.net_amount,
            paid_amount: invoice.paid_amount,
            balance: invoice.balance(),
            status: invoice.status.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StudentOverview {
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub student_ref: StudentRef,
    pub full_name: String,
    pub invoice_count: i64,
    pub total_invoiced: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
    pub overdue_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClassOverviewResponse {
    pub grade_level: String,
    pub students: Vec<StudentOverview>,
    pub total_invoiced: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
}

// ─── JWT Claims ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub exp: usize,
    pub iat: usize,
}
