// src/openapi.rs

use crate::models::{
    AcademicYear, ClassOverviewResponse, CreateAcademicYearRequest, CreateFeeStructureRequest,
    CreateLateFeeRuleRequest, FeeItemInput, FeeSchedule, FeeStructure, FeeStructureDetail,
    FeeStructureItem, GenerateInvoicesRequest, GenerateInvoicesResponse, Invoice, InvoiceBalance,
    InvoiceStatus, LateFeeKind, LateFeeRule, Payment, PaymentAllocation, PaymentMethod,
    RecomputeLateFeesRequest, RecomputeLateFeesResponse, RecordPaymentRequest,
    RecordPaymentResponse, ResetInvoicesRequest, ResetInvoicesResponse, Student,
    StudentBalanceResponse, StudentOverview, UpdateLateFeeRuleRequest,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "School Billing API",
        version = "1.0.0",
        description = "Monthly invoicing and settlement engine for schools running on the \
            Ethiopian academic calendar. Generates per-student monthly invoices from fee \
            structures, accrues configurable late fees past due dates, and settles payments \
            oldest month first with duplicate-reference protection.",
        contact(
            name = "School Billing Support",
            email = "support@yourcompany.com"
        ),
        license(name = "MIT")
    ),
    paths(
        // Academic years
        crate::handlers::academic_year::create_academic_year,
        crate::handlers::academic_year::list_academic_years,
        // Fee structures
        crate::handlers::fee_structure::create_fee_structure,
        crate::handlers::fee_structure::list_fee_structures,
        crate::handlers::fee_structure::get_fee_structure,
        crate::handlers::fee_structure::resolve_fee_structure,
        // Late fee rules
        crate::handlers::late_fee_rule::create_late_fee_rule,
        crate::handlers::late_fee_rule::list_late_fee_rules,
        crate::handlers::late_fee_rule::update_late_fee_rule,
        // Invoices
        crate::handlers::invoice::generate_invoices,
        crate::handlers::invoice::recompute_late_fees,
        crate::handlers::invoice::reset_invoices,
        crate::handlers::invoice::list_invoices,
        crate::handlers::invoice::get_invoice,
        // Payments
        crate::handlers::payment::record_payment,
        crate::handlers::payment::list_payments,
        // Balances
        crate::handlers::student::get_student_balance,
        crate::handlers::student::get_class_overview,
    ),
    components(
        schemas(
            CreateAcademicYearRequest, AcademicYear,
            CreateFeeStructureRequest, FeeItemInput, FeeStructure, FeeStructureItem,
            FeeStructureDetail, FeeSchedule,
            CreateLateFeeRuleRequest, UpdateLateFeeRuleRequest, LateFeeRule, LateFeeKind,
            GenerateInvoicesRequest, GenerateInvoicesResponse, Invoice, InvoiceStatus,
            RecomputeLateFeesRequest, RecomputeLateFeesResponse,
            ResetInvoicesRequest, ResetInvoicesResponse,
            RecordPaymentRequest, RecordPaymentResponse, Payment, PaymentMethod,
            PaymentAllocation,
            Student, StudentBalanceResponse, InvoiceBalance,
            ClassOverviewResponse, StudentOverview,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Academic Years", description = "Anchor the Ethiopian calendar to Gregorian dates"),
        (name = "Fee Structures", description = "Per-grade billing plans and their monthly schedules"),
        (name = "Late Fee Rules", description = "Fixed and percentage penalties with grace windows"),
        (name = "Invoices", description = "Generate, inspect and re-assess monthly invoices"),
        (name = "Payments", description = "Record payments settled oldest month first"),
        (name = "Balances", description = "Student and class level outstanding balances"),
    )
)]
pub struct ApiDoc;
