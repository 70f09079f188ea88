// src/services/invoice.rs

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::{AcademicYear, Invoice, StudentRef},
    services::{
        calendar, fees,
        latefee::{self, LateFeeService},
    },
};

pub struct InvoiceService;

impl InvoiceService {
    /// Pair every student with every billable month, skipping combinations
    /// that already carry an invoice. Re-running generation is therefore
    /// idempotent and safe for roster extensions. A roster listing the same
    /// student twice is rejected outright; it would only collide with itself
    /// on the (structure, student, month) unique key.
    pub fn plan_generation(
        students: &[StudentRef],
        months: &[i32],
        existing: &HashSet<(String, i32)>,
    ) -> AppResult<(Vec<(StudentRef, i32)>, usize)> {
        let distinct: HashSet<&StudentRef> = students.iter().collect();
        if distinct.len() != students.len() {
            return Err(AppError::Validation(
                "Duplicate student references in generation request".to_string(),
            ));
        }

        let mut to_create = Vec::new();
        let mut skipped = 0;

        for student in students {
            for &month in months {
                if existing.contains(&(student.to_string(), month)) {
                    skipped += 1;
                } else {
                    to_create.push((student.clone(), month));
                }
            }
        }

        Ok((to_create, skipped))
    }

    /// `INV-<timestamp>-<student>-<month>`. The invoices unique constraint is
    /// the real duplication guard; the number exists for humans and audits.
    pub fn invoice_number(issued_at: DateTime<Utc>, student: &StudentRef, month: i32) -> String {
        format!(
            "INV-{}-{}-{:02}",
            issued_at.format("%Y%m%d%H%M%S"),
            student.compact(),
            month
        )
    }
}

/// Generate one invoice per student per billable month of the structure.
/// Returns the created invoices and how many pairs were skipped as existing.
pub async fn generate_invoices(
    db: &PgPool,
    fee_structure_id: Uuid,
    students: &[StudentRef],
    issue_date: NaiveDate,
) -> AppResult<(Vec<Invoice>, usize)> {
    let structure = fees::find_structure(db, fee_structure_id).await?;
    if !structure.active {
        return Err(AppError::Conflict(format!(
            "Fee structure {} has been superseded; generate from the active structure",
            structure.id
        )));
    }

    let items = fees::structure_items(db, structure.id).await?;
    let schedule = fees::build_schedule(&structure, &items)?;

    let year = find_academic_year(db, structure.academic_year_id).await?;
    let rules = latefee::active_rules(db).await?;
    let grace_days = LateFeeService::shortest_grace(&rules);

    let mut tx = db.begin().await?;

    let existing: HashSet<(String, i32)> = sqlx::query_as::<_, InvoiceKeyRow>(
        "SELECT student_ref, month_number FROM invoices WHERE fee_structure_id = $1",
    )
    .bind(structure.id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|row| (row.student_ref, row.month_number))
    .collect();

    let (to_create, skipped) =
        InvoiceService::plan_generation(students, &schedule.months, &existing)?;

    let issued_at = Utc::now();
    let mut created = Vec::with_capacity(to_create.len());

    for (student, month) in to_create {
        let month_name = calendar::month_name(month)?;
        let due = calendar::due_date(year.new_year_date, month, grace_days)?;
        let number = InvoiceService::invoice_number(issued_at, &student, month);

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"INSERT INTO invoices (
                invoice_number, fee_structure_id, academic_year_id, student_ref,
                month_number, month_name, issue_date, due_date,
                total_amount, discount_amount, late_fee_amount, net_amount, paid_amount, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, 0, $9, 0, 'issued')
            RETURNING *"#,
        )
        .bind(&number)
        .bind(structure.id)
        .bind(structure.academic_year_id)
        .bind(student.to_string())
        .bind(month)
        .bind(month_name)
        .bind(issue_date)
        .bind(due)
        .bind(schedule.monthly_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            // A concurrent generation run won the insert for this pair.
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("Invoice for {student} month {month} already exists"))
            }
            other => AppError::Database(other),
        })?;

        created.push(invoice);
    }

    tx.commit().await?;

    info!(
        "Generated {} invoices ({} skipped) for fee structure {}",
        created.len(),
        skipped,
        fee_structure_id
    );

    Ok((created, skipped))
}

/// Delete every invoice of a structure so generation can start over. Refused
/// once any of those invoices carries a payment.
pub async fn reset_invoices(db: &PgPool, fee_structure_id: Uuid) -> AppResult<u64> {
    let mut tx = db.begin().await?;

    let paid_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payment_allocations pa
         JOIN invoices i ON i.id = pa.invoice_id
         WHERE i.fee_structure_id = $1",
    )
    .bind(fee_structure_id)
    .fetch_one(&mut *tx)
    .await?;

    if paid_rows > 0 {
        return Err(AppError::Conflict(
            "Cannot reset invoices that already carry payments".to_string(),
        ));
    }

    let deleted = sqlx::query("DELETE FROM invoices WHERE fee_structure_id = $1")
        .bind(fee_structure_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    info!("Reset {deleted} invoices for fee structure {fee_structure_id}");
    Ok(deleted)
}

pub async fn find_academic_year(db: &PgPool, id: Uuid) -> AppResult<AcademicYear> {
    sqlx::query_as::<_, AcademicYear>("SELECT * FROM academic_years WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Academic year {id} not found")))
}

#[derive(sqlx::FromRow)]
struct InvoiceKeyRow {
    student_ref: String,
    month_number: i32,
}
