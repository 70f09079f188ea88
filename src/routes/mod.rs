// src/routes/mod.rs

use crate::{
    handlers::{
        academic_year::{create_academic_year, list_academic_years},
        fee_structure::{
            create_fee_structure, get_fee_structure, list_fee_structures, resolve_fee_structure,
        },
        invoice::{
            generate_invoices, get_invoice, list_invoices, recompute_late_fees, reset_invoices,
        },
        late_fee_rule::{create_late_fee_rule, list_late_fee_rules, update_late_fee_rule},
        payment::{list_payments, record_payment},
        student::{get_class_overview, get_student_balance},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, patch, post},
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // ─── Academic Years ───────────────────────────────────
        .route(
            "/academic-years",
            post(create_academic_year).get(list_academic_years),
        )
        // ─── Fee Structures ───────────────────────────────────
        .route(
            "/fee-structures",
            post(create_fee_structure).get(list_fee_structures),
        )
        .route("/fee-structures/resolve", get(resolve_fee_structure))
        .route("/fee-structures/{structure_id}", get(get_fee_structure))
        // ─── Late Fee Rules ───────────────────────────────────
        .route(
            "/late-fee-rules",
            post(create_late_fee_rule).get(list_late_fee_rules),
        )
        .route("/late-fee-rules/{rule_id}", patch(update_late_fee_rule))
        // ─── Invoices ─────────────────────────────────────────
        .route("/invoices/generate", post(generate_invoices))
        .route("/invoices/recompute-late-fees", post(recompute_late_fees))
        .route("/invoices/reset", post(reset_invoices))
        .route("/invoices", get(list_invoices))
        .route("/invoices/{invoice_id}", get(get_invoice))
        // ─── Payments ─────────────────────────────────────────
        .route("/payments", post(record_payment).get(list_payments))
        // ─── Balances ─────────────────────────────────────────
        .route("/students/{student_ref}/balance", get(get_student_balance))
        .route("/classes/{grade_level}/overview", get(get_class_overview))
}
