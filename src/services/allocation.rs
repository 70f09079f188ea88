// src/services/allocation.rs

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::{Invoice, InvoiceStatus, Payment, PaymentAllocation, RecordPaymentRequest},
    services::latefee::{self, LateFeeService},
};

pub struct AllocationService;

/// One slice of a payment applied to one invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationStep {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub new_paid_amount: Decimal,
    pub new_status: InvoiceStatus,
}

impl AllocationService {
    /// Split `amount` across `invoices`, oldest month first. Each invoice is
    /// filled up to its balance before the next one sees a birr; a payment
    /// larger than everything outstanding is refused outright.
    pub fn plan(invoices: &[Invoice], amount: Decimal) -> AppResult<Vec<AllocationStep>> {
        let mut ordered: Vec<&Invoice> = invoices.iter().collect();
        ordered.sort_by_key(|inv| (inv.due_date, inv.month_number));

        let total_outstanding: Decimal = ordered.iter().map(|inv| inv.balance()).sum();
        if amount > total_outstanding {
            return Err(AppError::Overpayment {
                amount,
                balance: total_outstanding,
            });
        }

        let mut remaining = amount;
        let mut steps = Vec::new();

        for invoice in ordered {
            if remaining <= Decimal::ZERO {
                break;
            }
            let slice = remaining.min(invoice.balance());
            if slice <= Decimal::ZERO {
                continue;
            }

            let new_paid = invoice.paid_amount + slice;
            let new_status = if new_paid >= invoice.net_amount {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::PartiallyPaid
            };

            steps.push(AllocationStep {
                invoice_id: invoice.id,
                amount: slice,
                new_paid_amount: new_paid,
                new_status,
            });
            remaining -= slice;
        }

        Ok(steps)
    }

    /// A payment aimed at a single invoice must not leapfrog an older unpaid
    /// month of the same academic year. Batches are exempt by construction:
    /// the oldest-first split settles earlier months before later ones.
    pub fn check_sequential(target: &Invoice, siblings: &[Invoice]) -> AppResult<()> {
        let blocking = siblings
            .iter()
            .filter(|inv| {
                inv.id != target.id
                    && inv.month_number < target.month_number
                    && inv.status != InvoiceStatus::Paid
            })
            .min_by_key(|inv| inv.month_number);

        match blocking {
            Some(inv) => Err(AppError::SequentialPaymentLock {
                month_name: target.month_name.clone(),
                blocking_month: inv.month_number,
                blocking_month_name: inv.month_name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Note attached to the n-th payment row of a batch. Only the first row
    /// keeps the raw reference (it must stay unique per transaction); every
    /// row of the batch carries a derived `ref/<seq>` marker in the note so
    /// the rows can be tied back together.
    pub fn batch_note(
        notes: Option<&str>,
        reference: Option<&str>,
        seq: usize,
        total: usize,
    ) -> Option<String> {
        if total <= 1 {
            return notes.map(str::to_string);
        }

        let mut parts = vec![format!("part {seq}/{total}")];
        if let Some(reference) = reference {
            parts.push(format!("ref {reference}/{seq}"));
        }
        if let Some(notes) = notes {
            parts.push(notes.to_string());
        }
        Some(parts.join("; "))
    }
}

/// Record a payment and settle it against the selected invoices inside one
/// transaction. The candidate rows are locked first, late fees are brought up
/// to the payment date under that lock, and only then is the split planned
/// and written out. Returns the payment rows, their invoice-level
/// allocations, and the settled invoices.
pub async fn record_payment(
    db: &PgPool,
    request: &RecordPaymentRequest,
    recorded_by: &str,
) -> AppResult<(Vec<Payment>, Vec<PaymentAllocation>, Vec<Invoice>)> {
    validate_amount(request.amount)?;
    if request.invoice_ids.is_empty() {
        return Err(AppError::Validation(
            "At least one invoice must be selected".to_string(),
        ));
    }
    let distinct: HashSet<Uuid> = request.invoice_ids.iter().copied().collect();
    if distinct.len() != request.invoice_ids.len() {
        return Err(AppError::Validation(
            "Duplicate invoice ids in payment request".to_string(),
        ));
    }

    let reference = normalize_reference(request)?;
    let payment_date = request
        .payment_date
        .unwrap_or_else(|| Utc::now().date_naive());

    let rules = latefee::active_rules(db).await?;

    let mut tx = db.begin().await?;

    // Fast duplicate check; the partial unique index on payments.reference
    // still decides the winner if two submissions race past it.
    if let Some(ref reference) = reference {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM payments WHERE reference = $1)")
                .bind(reference)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(AppError::DuplicateReference(reference.clone()));
        }
    }

    // Lock the candidates for the whole settlement.
    let mut invoices = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices
         WHERE id = ANY($1) AND student_ref = $2
         ORDER BY due_date, month_number
         FOR UPDATE",
    )
    .bind(&request.invoice_ids)
    .bind(request.student_ref.to_string())
    .fetch_all(&mut *tx)
    .await?;

    if invoices.len() != request.invoice_ids.len() {
        let found: HashSet<Uuid> = invoices.iter().map(|inv| inv.id).collect();
        let missing = request
            .invoice_ids
            .iter()
            .find(|id| !found.contains(id))
            .copied()
            .unwrap_or_default();
        return Err(AppError::NotFound(format!(
            "Invoice {} not found for student {}",
            missing, request.student_ref
        )));
    }

    if let [single] = invoices.as_slice() {
        let siblings = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices
             WHERE student_ref = $1 AND academic_year_id = $2 AND month_number < $3",
        )
        .bind(request.student_ref.to_string())
        .bind(single.academic_year_id)
        .bind(single.month_number)
        .fetch_all(&mut *tx)
        .await?;
        AllocationService::check_sequential(single, &siblings)?;
    }

    // Bring late fees up to the payment date while we hold the locks, so the
    // split sees the balances the payer actually owes.
    for invoice in &mut invoices {
        let assessment = LateFeeService::assess(invoice, &rules, payment_date);
        if assessment.differs_from(invoice) {
            sqlx::query(
                "UPDATE invoices
                 SET late_fee_amount = $2, net_amount = $3, status = $4, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(invoice.id)
            .bind(assessment.late_fee)
            .bind(assessment.net_amount)
            .bind(&assessment.status)
            .execute(&mut *tx)
            .await?;

            invoice.late_fee_amount = assessment.late_fee;
            invoice.net_amount = assessment.net_amount;
            invoice.status = assessment.status;
        }
    }

    let steps = AllocationService::plan(&invoices, request.amount)?;

    let total_rows = steps.len();
    let mut payments = Vec::with_capacity(total_rows);
    let mut allocations = Vec::with_capacity(total_rows);

    for (idx, step) in steps.iter().enumerate() {
        let seq = idx + 1;
        let row_reference = if seq == 1 { reference.as_deref() } else { None };
        let note = AllocationService::batch_note(
            request.notes.as_deref(),
            reference.as_deref(),
            seq,
            total_rows,
        );

        let payment = sqlx::query_as::<_, Payment>(
            r#"INSERT INTO payments (
                invoice_id, student_ref, amount, method, payment_date,
                reference, notes, recorded_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *"#,
        )
        .bind(step.invoice_id)
        .bind(request.student_ref.to_string())
        .bind(step.amount)
        .bind(&request.method)
        .bind(payment_date)
        .bind(row_reference)
        .bind(&note)
        .bind(recorded_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateReference(reference.clone().unwrap_or_default())
            }
            other => AppError::Database(other),
        })?;

        let allocation = sqlx::query_as::<_, PaymentAllocation>(
            "INSERT INTO payment_allocations (payment_id, invoice_id, amount)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(payment.id)
        .bind(step.invoice_id)
        .bind(step.amount)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE invoices SET paid_amount = $2, status = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(step.invoice_id)
        .bind(step.new_paid_amount)
        .bind(&step.new_status)
        .execute(&mut *tx)
        .await?;

        payments.push(payment);
        allocations.push(allocation);
    }

    let settled = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE id = ANY($1) ORDER BY due_date, month_number",
    )
    .bind(&request.invoice_ids)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Recorded payment of {} from {} across {} invoice row(s)",
        request.amount, request.student_ref, total_rows
    );

    Ok((payments, allocations, settled))
}

fn validate_amount(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Payment amount must be positive".to_string(),
        ));
    }
    // The NUMERIC(14,2) columns would silently round anything finer, leaving
    // the stored rows off the requested amount by a sub-cent sliver.
    if amount.normalize().scale() > 2 {
        return Err(AppError::Validation(
            "Payment amount cannot be finer than cents".to_string(),
        ));
    }
    Ok(())
}

fn normalize_reference(request: &RecordPaymentRequest) -> AppResult<Option<String>> {
    let trimmed = request
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    if request.method.requires_reference() && trimmed.is_none() {
        return Err(AppError::Validation(
            "A transaction reference is required for non-cash payments".to_string(),
        ));
    }

    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentMethod, StudentRef};
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(month: i32, due: NaiveDate, net: Decimal, paid: Decimal) -> Invoice {
        let now = Utc::now();
        let status = if paid >= net {
            InvoiceStatus::Paid
        } else if paid > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Issued
        };
        Invoice {
            id: Uuid::new_v4(),
            invoice_number: format!("INV-TEST-{month:02}"),
            fee_structure_id: Uuid::new_v4(),
            academic_year_id: Uuid::new_v4(),
            student_ref: StudentRef::new("SCH001", "4A", "ST0042"),
            month_number: month,
            month_name: crate::services::calendar::month_name(month)
                .unwrap()
                .to_string(),
            issue_date: due - Duration::days(15),
            due_date: due,
            total_amount: net,
            discount_amount: Decimal::ZERO,
            late_fee_amount: Decimal::ZERO,
            net_amount: net,
            paid_amount: paid,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn three_open_months() -> Vec<Invoice> {
        vec![
            invoice(3, date(2025, 11, 10), dec!(100), Decimal::ZERO),
            invoice(4, date(2025, 12, 10), dec!(100), Decimal::ZERO),
            invoice(5, date(2026, 1, 9), dec!(100), Decimal::ZERO),
        ]
    }

    #[test]
    fn splits_oldest_first_and_stops_when_exhausted() {
        let invoices = three_open_months();
        let steps = AllocationService::plan(&invoices, dec!(150)).unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].invoice_id, invoices[0].id);
        assert_eq!(steps[0].amount, dec!(100));
        assert_eq!(steps[0].new_status, InvoiceStatus::Paid);
        assert_eq!(steps[1].invoice_id, invoices[1].id);
        assert_eq!(steps[1].amount, dec!(50));
        assert_eq!(steps[1].new_status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut invoices = three_open_months();
        invoices.reverse();
        let steps = AllocationService::plan(&invoices, dec!(150)).unwrap();

        assert_eq!(steps[0].amount, dec!(100));
        assert_eq!(steps[0].new_status, InvoiceStatus::Paid);
        // Oldest due date absorbed the full slice despite arriving last.
        let oldest = invoices.iter().find(|inv| inv.month_number == 3).unwrap();
        assert_eq!(steps[0].invoice_id, oldest.id);
    }

    #[test]
    fn exact_amount_settles_everything() {
        let invoices = three_open_months();
        let steps = AllocationService::plan(&invoices, dec!(300)).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.new_status == InvoiceStatus::Paid));
    }

    #[test]
    fn overpayment_is_refused_with_the_outstanding_balance() {
        let invoices = three_open_months();
        let err = AllocationService::plan(&invoices, dec!(350)).unwrap_err();
        match err {
            AppError::Overpayment { amount, balance } => {
                assert_eq!(amount, dec!(350));
                assert_eq!(balance, dec!(300));
            }
            other => panic!("expected overpayment, got {other:?}"),
        }
    }

    #[test]
    fn partially_paid_invoice_only_absorbs_its_balance() {
        let invoices = vec![
            invoice(3, date(2025, 11, 10), dec!(100), dec!(60)),
            invoice(4, date(2025, 12, 10), dec!(100), Decimal::ZERO),
        ];
        let steps = AllocationService::plan(&invoices, dec!(100)).unwrap();

        assert_eq!(steps[0].amount, dec!(40));
        assert_eq!(steps[0].new_paid_amount, dec!(100));
        assert_eq!(steps[0].new_status, InvoiceStatus::Paid);
        assert_eq!(steps[1].amount, dec!(60));
        assert_eq!(steps[1].new_status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn single_invoice_payment_is_blocked_by_an_older_unpaid_month() {
        let unpaid_hidar = invoice(3, date(2025, 11, 10), dec!(100), Decimal::ZERO);
        let target_tahsas = invoice(4, date(2025, 12, 10), dec!(100), Decimal::ZERO);

        let err = AllocationService::check_sequential(
            &target_tahsas,
            std::slice::from_ref(&unpaid_hidar),
        )
        .unwrap_err();

        match err {
            AppError::SequentialPaymentLock {
                month_name,
                blocking_month,
                blocking_month_name,
            } => {
                assert_eq!(month_name, "Tahsas");
                assert_eq!(blocking_month, 3);
                assert_eq!(blocking_month_name, "Hidar");
            }
            other => panic!("expected sequential lock, got {other:?}"),
        }
    }

    #[test]
    fn sequential_check_passes_once_earlier_months_are_paid() {
        let paid_hidar = invoice(3, date(2025, 11, 10), dec!(100), dec!(100));
        let target = invoice(4, date(2025, 12, 10), dec!(100), Decimal::ZERO);
        assert!(
            AllocationService::check_sequential(&target, std::slice::from_ref(&paid_hidar)).is_ok()
        );
        assert!(AllocationService::check_sequential(&target, &[]).is_ok());
    }

    #[test]
    fn earliest_blocking_month_is_the_one_named() {
        let target = invoice(6, date(2026, 2, 8), dec!(100), Decimal::ZERO);
        let blockers = vec![
            invoice(5, date(2026, 1, 9), dec!(100), Decimal::ZERO),
            invoice(2, date(2025, 10, 11), dec!(100), Decimal::ZERO),
        ];
        match AllocationService::check_sequential(&target, &blockers).unwrap_err() {
            AppError::SequentialPaymentLock { blocking_month, .. } => {
                assert_eq!(blocking_month, 2)
            }
            other => panic!("expected sequential lock, got {other:?}"),
        }
    }

    fn payment_request(method: PaymentMethod, reference: Option<&str>) -> RecordPaymentRequest {
        RecordPaymentRequest {
            student_ref: StudentRef::new("SCH001", "4A", "ST0042"),
            amount: dec!(100),
            method,
            payment_date: None,
            reference: reference.map(str::to_string),
            notes: None,
            invoice_ids: vec![Uuid::new_v4()],
        }
    }

    #[test]
    fn cash_payments_do_not_need_a_reference() {
        let request = payment_request(PaymentMethod::Cash, None);
        assert_eq!(normalize_reference(&request).unwrap(), None);
    }

    #[test]
    fn non_cash_payments_require_a_reference() {
        let missing = payment_request(PaymentMethod::BankTransfer, None);
        assert!(normalize_reference(&missing).is_err());

        let blank = payment_request(PaymentMethod::MobileMoney, Some("   "));
        assert!(normalize_reference(&blank).is_err());

        let trimmed = payment_request(PaymentMethod::BankTransfer, Some("  TXN99 "));
        assert_eq!(
            normalize_reference(&trimmed).unwrap(),
            Some("TXN99".to_string())
        );
    }

    #[test]
    fn amounts_finer_than_cents_are_rejected() {
        assert!(validate_amount(dec!(100)).is_ok());
        assert!(validate_amount(dec!(99.99)).is_ok());
        // Trailing zeros are scale, not precision.
        assert!(validate_amount(dec!(100.000)).is_ok());

        assert!(validate_amount(dec!(10.555)).is_err());
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(dec!(-5)).is_err());
    }

    #[test]
    fn single_row_note_passes_user_notes_through() {
        assert_eq!(AllocationService::batch_note(None, Some("TXN1"), 1, 1), None);
        assert_eq!(
            AllocationService::batch_note(Some("term fees"), None, 1, 1),
            Some("term fees".to_string())
        );
    }

    #[test]
    fn batch_rows_carry_sequence_and_derived_reference() {
        assert_eq!(
            AllocationService::batch_note(None, Some("TXN123"), 2, 3),
            Some("part 2/3; ref TXN123/2".to_string())
        );
        assert_eq!(
            AllocationService::batch_note(Some("paid at branch"), Some("TXN123"), 1, 2),
            Some("part 1/2; ref TXN123/1; paid at branch".to_string())
        );
        assert_eq!(
            AllocationService::batch_note(None, None, 3, 3),
            Some("part 3/3".to_string())
        );
    }

    // The tests below need a migrated Postgres; run them with DATABASE_URL
    // set and `cargo test -- --ignored`. Fixtures are marker-suffixed so a
    // shared database can absorb repeated runs.

    async fn connect_and_migrate() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = PgPool::connect(&url).await.expect("failed to connect");
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("migrations failed");
        db
    }

    /// Seeds a year, an inactive structure and one 100-birr invoice per
    /// month; returns the student's canonical reference and the invoice ids.
    async fn seed_invoices(db: &PgPool, marker: Uuid, months: &[i32]) -> (String, Vec<Uuid>) {
        let year_id: Uuid = sqlx::query_scalar(
            "INSERT INTO academic_years (name, new_year_date)
             VALUES ($1, '2025-09-11') RETURNING id",
        )
        .bind(format!("year-{marker}"))
        .fetch_one(db)
        .await
        .expect("year insert");

        let structure_id: Uuid = sqlx::query_scalar(
            "INSERT INTO fee_structures (academic_year_id, grade_level, name, months, active)
             VALUES ($1, $2, 'settlement fixture', $3, FALSE) RETURNING id",
        )
        .bind(year_id)
        .bind(format!("grade-{marker}"))
        .bind(months)
        .fetch_one(db)
        .await
        .expect("structure insert");

        let student = format!("SCH-{marker}:4A:ST1");
        let mut invoice_ids = Vec::new();
        for &month in months {
            let id: Uuid = sqlx::query_scalar(
                "INSERT INTO invoices (invoice_number, fee_structure_id, academic_year_id,
                     student_ref, month_number, month_name, issue_date, due_date,
                     total_amount, net_amount)
                 VALUES ($1, $2, $3, $4, $5, $6, '2025-09-11', '2025-09-26', 100, 100)
                 RETURNING id",
            )
            .bind(format!("INV-{marker}-{month:02}"))
            .bind(structure_id)
            .bind(year_id)
            .bind(&student)
            .bind(month)
            .bind(crate::services::calendar::month_name(month).unwrap())
            .fetch_one(db)
            .await
            .expect("invoice insert");
            invoice_ids.push(id);
        }
        (student, invoice_ids)
    }

    #[tokio::test]
    #[ignore]
    async fn duplicate_reference_is_rejected_even_across_invoices() {
        let db = connect_and_migrate().await;
        let marker = Uuid::new_v4();
        let (student, invoice_ids) = seed_invoices(&db, marker, &[1, 2]).await;

        let reference = format!("TXN-{marker}");
        let insert_payment = "INSERT INTO payments
                 (invoice_id, student_ref, amount, method, payment_date, reference, recorded_by)
             VALUES ($1, $2, 100, 'bank_transfer', '2025-10-01', $3, 'tester')";

        sqlx::query(insert_payment)
            .bind(invoice_ids[0])
            .bind(&student)
            .bind(&reference)
            .execute(&db)
            .await
            .expect("first submission must pass");

        // Same slip against a different invoice: the partial unique index is
        // the arbiter, not just the application-level pre-check.
        let second = sqlx::query(insert_payment)
            .bind(invoice_ids[1])
            .bind(&student)
            .bind(&reference)
            .execute(&db)
            .await;
        match second {
            Err(sqlx::Error::Database(db_err)) => assert!(db_err.is_unique_violation()),
            other => panic!("expected a unique violation, got {other:?}"),
        }

        // Cash rows carry no reference and must not collide with each other.
        for invoice_id in &invoice_ids {
            sqlx::query(
                "INSERT INTO payments (invoice_id, student_ref, amount, method,
                     payment_date, recorded_by)
                 VALUES ($1, $2, 10, 'cash', '2025-10-01', 'tester')",
            )
            .bind(invoice_id)
            .bind(&student)
            .execute(&db)
            .await
            .expect("cash rows without a reference must not collide");
        }
    }

    #[tokio::test]
    #[ignore]
    async fn settling_a_payment_returns_its_allocation_rows() {
        let db = connect_and_migrate().await;
        let marker = Uuid::new_v4();
        let (_, invoice_ids) = seed_invoices(&db, marker, &[1]).await;

        let request = RecordPaymentRequest {
            student_ref: StudentRef::new(format!("SCH-{marker}"), "4A", "ST1"),
            amount: dec!(100),
            method: PaymentMethod::Cash,
            payment_date: Some(date(2025, 10, 1)),
            reference: None,
            notes: None,
            invoice_ids: invoice_ids.clone(),
        };

        let (payments, allocations, invoices) =
            record_payment(&db, &request, "tester").await.unwrap();

        assert_eq!(payments.len(), 1);
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].payment_id, payments[0].id);
        assert_eq!(allocations[0].invoice_id, invoice_ids[0]);
        assert_eq!(allocations[0].amount, dec!(100));
        assert_eq!(invoices[0].paid_amount, dec!(100));

        let stored: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payment_allocations WHERE payment_id = $1")
                .bind(payments[0].id)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(stored, 1);
    }
}
