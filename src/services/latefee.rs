// src/services/latefee.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    errors::AppResult,
    models::{Invoice, InvoiceStatus, LateFeeKind, LateFeeRule, StudentRef},
};

pub struct LateFeeService;

/// Figures an invoice should carry as of an assessment date.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub late_fee: Decimal,
    pub net_amount: Decimal,
    pub status: InvoiceStatus,
}

impl Assessment {
    pub fn differs_from(&self, invoice: &Invoice) -> bool {
        self.late_fee != invoice.late_fee_amount
            || self.net_amount != invoice.net_amount
            || self.status != invoice.status
    }
}

impl LateFeeService {
    /// Recompute the cumulative late fee for one invoice as of `as_of`.
    ///
    /// The fee is set from scratch on every assessment, never added to, so
    /// running the sweep any number of times lands on the same figures. A
    /// rule contributes only once its own grace window is strictly exceeded;
    /// active rules stack. Paid invoices are left exactly as they are, and a
    /// fee walk-back never hands collected money back: the reassessed net is
    /// floored at `paid_amount`, settling the invoice once everything still
    /// owed is covered.
    pub fn assess(invoice: &Invoice, rules: &[LateFeeRule], as_of: NaiveDate) -> Assessment {
        if invoice.status == InvoiceStatus::Paid {
            return Assessment {
                late_fee: invoice.late_fee_amount,
                net_amount: invoice.net_amount,
                status: InvoiceStatus::Paid,
            };
        }

        let days_past_due = (as_of - invoice.due_date).num_days();

        let accrued = rules
            .iter()
            .filter(|rule| rule.active && days_past_due > rule.grace_period_days as i64)
            .map(|rule| match rule.kind {
                LateFeeKind::FixedAmount => rule.value,
                LateFeeKind::PercentageOfTotal => invoice.total_amount * rule.value / dec!(100),
            })
            .sum::<Decimal>()
            .round_dp(2);

        // A rule change (deactivation, longer grace) may drop the accrued fee
        // below what payments have already covered. Keeping the collected
        // excess as fee holds `paid_amount <= net_amount` without refunds.
        let collected_floor =
            invoice.paid_amount - invoice.total_amount + invoice.discount_amount;
        let late_fee = accrued.max(collected_floor);
        let net_amount = invoice.total_amount + late_fee - invoice.discount_amount;

        // With no fee in force the status stays payment-driven; this also
        // walks an invoice back from overdue when a rule is deactivated.
        let status = if invoice.paid_amount > Decimal::ZERO && invoice.paid_amount >= net_amount {
            InvoiceStatus::Paid
        } else if late_fee > Decimal::ZERO {
            InvoiceStatus::Overdue
        } else if invoice.paid_amount > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Issued
        };

        Assessment {
            late_fee,
            net_amount,
            status,
        }
    }

    /// Grace window used for due dates: the tightest window among active
    /// rules, zero when none is configured.
    pub fn shortest_grace(rules: &[LateFeeRule]) -> i32 {
        rules
            .iter()
            .filter(|rule| rule.active)
            .map(|rule| rule.grace_period_days)
            .min()
            .unwrap_or(0)
    }
}

pub async fn active_rules(db: &PgPool) -> AppResult<Vec<LateFeeRule>> {
    let rules = sqlx::query_as::<_, LateFeeRule>(
        "SELECT * FROM late_fee_rules WHERE active ORDER BY grace_period_days, created_at",
    )
    .fetch_all(db)
    .await?;
    Ok(rules)
}

/// Re-assess every unpaid invoice (optionally one student's) and persist the
/// rows whose figures moved. Returns `(examined, updated)`.
pub async fn recompute_late_fees(
    db: &PgPool,
    as_of: NaiveDate,
    student: Option<&StudentRef>,
) -> AppResult<(usize, usize)> {
    let rules = active_rules(db).await?;

    let invoices = match student {
        Some(student_ref) => {
            sqlx::query_as::<_, Invoice>(
                "SELECT * FROM invoices WHERE status <> 'paid' AND student_ref = $1",
            )
            .bind(student_ref.to_string())
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE status <> 'paid'")
                .fetch_all(db)
                .await?
        }
    };

    let examined = invoices.len();
    let mut updated = 0;

    for invoice in &invoices {
        let assessment = LateFeeService::assess(invoice, &rules, as_of);
        if assessment.differs_from(invoice) {
            apply_assessment(db, invoice.id, &assessment).await?;
            updated += 1;
        }
    }

    if updated > 0 {
        info!(
            "Late-fee sweep as of {}: {} of {} invoices updated",
            as_of, updated, examined
        );
    }

    Ok((examined, updated))
}

async fn apply_assessment(db: &PgPool, invoice_id: Uuid, assessment: &Assessment) -> AppResult<()> {
    // The status guard covers a payment settling the invoice between our
    // read and this write.
    sqlx::query(
        "UPDATE invoices
         SET late_fee_amount = $2, net_amount = $3, status = $4, updated_at = NOW()
         WHERE id = $1 AND status <> 'paid'",
    )
    .bind(invoice_id)
    .bind(assessment.late_fee)
    .bind(assessment.net_amount)
    .bind(&assessment.status)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(due: NaiveDate, total: Decimal, paid: Decimal, status: InvoiceStatus) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            invoice_number: "INV-TEST".to_string(),
            fee_structure_id: Uuid::new_v4(),
            academic_year_id: Uuid::new_v4(),
            student_ref: StudentRef::new("SCH001", "4A", "ST0042"),
            month_number: 3,
            month_name: "Hidar".to_string(),
            issue_date: due - Duration::days(15),
            due_date: due,
            total_amount: total,
            discount_amount: Decimal::ZERO,
            late_fee_amount: Decimal::ZERO,
            net_amount: total,
            paid_amount: paid,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn rule(kind: LateFeeKind, value: Decimal, grace: i32, active: bool) -> LateFeeRule {
        let now = Utc::now();
        LateFeeRule {
            id: Uuid::new_v4(),
            name: format!("rule-{grace}"),
            kind,
            value,
            grace_period_days: grace,
            active,
            created_at: now,
            updated_at: now,
        }
    }

    fn two_tier_rules() -> Vec<LateFeeRule> {
        vec![
            rule(LateFeeKind::FixedAmount, dec!(50), 15, true),
            rule(LateFeeKind::FixedAmount, dec!(100), 30, true),
        ]
    }

    #[test]
    fn rules_stack_as_their_grace_windows_pass() {
        let due = date(2025, 11, 10);
        let inv = invoice(due, dec!(1000), Decimal::ZERO, InvoiceStatus::Issued);
        let rules = two_tier_rules();

        let at_10 = LateFeeService::assess(&inv, &rules, due + Duration::days(10));
        assert_eq!(at_10.late_fee, Decimal::ZERO);
        assert_eq!(at_10.status, InvoiceStatus::Issued);

        let at_20 = LateFeeService::assess(&inv, &rules, due + Duration::days(20));
        assert_eq!(at_20.late_fee, dec!(50));
        assert_eq!(at_20.net_amount, dec!(1050));
        assert_eq!(at_20.status, InvoiceStatus::Overdue);

        let at_35 = LateFeeService::assess(&inv, &rules, due + Duration::days(35));
        assert_eq!(at_35.late_fee, dec!(150));
        assert_eq!(at_35.net_amount, dec!(1150));
    }

    #[test]
    fn grace_boundary_is_strict() {
        let due = date(2025, 11, 10);
        let inv = invoice(due, dec!(1000), Decimal::ZERO, InvoiceStatus::Issued);
        let rules = vec![rule(LateFeeKind::FixedAmount, dec!(50), 15, true)];

        let on_boundary = LateFeeService::assess(&inv, &rules, due + Duration::days(15));
        assert_eq!(on_boundary.late_fee, Decimal::ZERO);

        let past_boundary = LateFeeService::assess(&inv, &rules, due + Duration::days(16));
        assert_eq!(past_boundary.late_fee, dec!(50));
    }

    #[test]
    fn assessment_is_idempotent() {
        let due = date(2025, 11, 10);
        let mut inv = invoice(due, dec!(1000), Decimal::ZERO, InvoiceStatus::Issued);
        let rules = two_tier_rules();
        let as_of = due + Duration::days(40);

        let first = LateFeeService::assess(&inv, &rules, as_of);
        assert!(first.differs_from(&inv));
        inv.late_fee_amount = first.late_fee;
        inv.net_amount = first.net_amount;
        inv.status = first.status.clone();

        let second = LateFeeService::assess(&inv, &rules, as_of);
        assert_eq!(second, first);
        assert!(!second.differs_from(&inv));
    }

    #[test]
    fn percentage_rules_use_the_invoice_total() {
        let due = date(2025, 11, 10);
        let inv = invoice(due, dec!(2000), Decimal::ZERO, InvoiceStatus::Issued);
        let rules = vec![rule(LateFeeKind::PercentageOfTotal, dec!(2.5), 0, true)];

        let assessed = LateFeeService::assess(&inv, &rules, due + Duration::days(1));
        assert_eq!(assessed.late_fee, dec!(50.00));
        assert_eq!(assessed.net_amount, dec!(2050.00));
    }

    #[test]
    fn paid_invoices_are_never_reopened() {
        let due = date(2025, 11, 10);
        let mut inv = invoice(due, dec!(1000), dec!(1050), InvoiceStatus::Paid);
        inv.late_fee_amount = dec!(50);
        inv.net_amount = dec!(1050);

        let assessed = LateFeeService::assess(&inv, &two_tier_rules(), due + Duration::days(200));
        assert_eq!(assessed.status, InvoiceStatus::Paid);
        assert_eq!(assessed.late_fee, dec!(50));
        assert!(!assessed.differs_from(&inv));
    }

    #[test]
    fn deactivated_rules_walk_the_fee_back() {
        let due = date(2025, 11, 10);
        let mut inv = invoice(due, dec!(1000), Decimal::ZERO, InvoiceStatus::Overdue);
        inv.late_fee_amount = dec!(50);
        inv.net_amount = dec!(1050);

        let rules = vec![rule(LateFeeKind::FixedAmount, dec!(50), 15, false)];
        let assessed = LateFeeService::assess(&inv, &rules, due + Duration::days(40));
        assert_eq!(assessed.late_fee, Decimal::ZERO);
        assert_eq!(assessed.net_amount, dec!(1000));
        assert_eq!(assessed.status, InvoiceStatus::Issued);
    }

    #[test]
    fn walk_back_never_drops_net_below_the_amount_collected() {
        let due = date(2025, 11, 10);
        // 1020 of the 1050 net (incl. a 50 fee) was paid before every rule
        // got switched off. The collected excess over the base 1000 stays as
        // fee, and covering everything still owed settles the invoice.
        let mut inv = invoice(due, dec!(1000), dec!(1020), InvoiceStatus::PartiallyPaid);
        inv.late_fee_amount = dec!(50);
        inv.net_amount = dec!(1050);

        let assessed = LateFeeService::assess(&inv, &[], due + Duration::days(40));
        assert_eq!(assessed.late_fee, dec!(20));
        assert_eq!(assessed.net_amount, dec!(1020));
        assert_eq!(assessed.status, InvoiceStatus::Paid);
        assert!(inv.paid_amount <= assessed.net_amount);
    }

    #[test]
    fn covering_the_reassessed_net_settles_the_invoice() {
        let due = date(2025, 11, 10);
        // Grace shortened the fee from 50 to 20 after 1020 was already in:
        // paid now equals net, so the invoice is settled, not left partial.
        let mut inv = invoice(due, dec!(1000), dec!(1020), InvoiceStatus::PartiallyPaid);
        inv.late_fee_amount = dec!(50);
        inv.net_amount = dec!(1050);

        let rules = vec![rule(LateFeeKind::FixedAmount, dec!(20), 15, true)];
        let assessed = LateFeeService::assess(&inv, &rules, due + Duration::days(40));
        assert_eq!(assessed.late_fee, dec!(20));
        assert_eq!(assessed.net_amount, dec!(1020));
        assert_eq!(assessed.status, InvoiceStatus::Paid);
    }

    #[test]
    fn partial_payment_survives_a_zero_fee_assessment() {
        let due = date(2025, 11, 10);
        let inv = invoice(due, dec!(1000), dec!(400), InvoiceStatus::PartiallyPaid);
        let assessed = LateFeeService::assess(&inv, &two_tier_rules(), due - Duration::days(3));
        assert_eq!(assessed.late_fee, Decimal::ZERO);
        assert_eq!(assessed.status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn shortest_grace_ignores_inactive_rules() {
        let rules = vec![
            rule(LateFeeKind::FixedAmount, dec!(50), 15, true),
            rule(LateFeeKind::FixedAmount, dec!(10), 5, false),
            rule(LateFeeKind::FixedAmount, dec!(100), 30, true),
        ];
        assert_eq!(LateFeeService::shortest_grace(&rules), 15);
        assert_eq!(LateFeeService::shortest_grace(&[]), 0);
    }
}
