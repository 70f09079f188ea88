// src/services/fees.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::{FeeSchedule, FeeStructure, FeeStructureItem},
};

/// Collapse a structure and its line items into the per-month schedule that
/// invoice generation works from.
pub fn build_schedule(
    structure: &FeeStructure,
    items: &[FeeStructureItem],
) -> AppResult<FeeSchedule> {
    let first = items
        .iter()
        .min_by_key(|item| item.position)
        .ok_or_else(|| AppError::Internal(format!("fee structure {} has no items", structure.id)))?;

    let monthly_amount = items.iter().map(|item| item.amount).sum();

    // Months may arrive unsorted or duplicated from admin input; the schedule
    // is where they become canonical.
    let mut months = structure.months.clone();
    months.sort_unstable();
    months.dedup();

    Ok(FeeSchedule {
        fee_structure_id: structure.id,
        monthly_amount,
        months,
        account_id: first.account_id,
    })
}

/// Active structure for a grade and academic year, collapsed to a schedule.
pub async fn resolve(
    db: &PgPool,
    grade_level: &str,
    academic_year_id: Uuid,
) -> AppResult<FeeSchedule> {
    let structure = sqlx::query_as::<_, FeeStructure>(
        "SELECT * FROM fee_structures
         WHERE grade_level = $1 AND academic_year_id = $2 AND active",
    )
    .bind(grade_level)
    .bind(academic_year_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!(
            "No active fee structure for grade '{grade_level}' in that academic year"
        ))
    })?;

    let items = structure_items(db, structure.id).await?;
    build_schedule(&structure, &items)
}

pub async fn find_structure(db: &PgPool, id: Uuid) -> AppResult<FeeStructure> {
    sqlx::query_as::<_, FeeStructure>("SELECT * FROM fee_structures WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fee structure {id} not found")))
}

pub async fn structure_items(
    db: &PgPool,
    fee_structure_id: Uuid,
) -> AppResult<Vec<FeeStructureItem>> {
    let items = sqlx::query_as::<_, FeeStructureItem>(
        "SELECT * FROM fee_structure_items WHERE fee_structure_id = $1 ORDER BY position",
    )
    .bind(fee_structure_id)
    .fetch_all(db)
    .await?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn structure(months: Vec<i32>) -> FeeStructure {
        FeeStructure {
            id: Uuid::new_v4(),
            academic_year_id: Uuid::new_v4(),
            grade_level: "Grade 4".to_string(),
            name: "Grade 4 standard".to_string(),
            months,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn item(structure_id: Uuid, amount: rust_decimal::Decimal, position: i32) -> FeeStructureItem {
        FeeStructureItem {
            id: Uuid::new_v4(),
            fee_structure_id: structure_id,
            category: format!("item-{position}"),
            amount,
            account_id: Uuid::new_v4(),
            position,
        }
    }

    #[test]
    fn schedule_sums_all_line_items() {
        let s = structure(vec![1, 2, 3]);
        let items = vec![
            item(s.id, dec!(800), 1),
            item(s.id, dec!(150), 2),
            item(s.id, dec!(50), 3),
        ];
        let schedule = build_schedule(&s, &items).unwrap();
        assert_eq!(schedule.monthly_amount, dec!(1000));
        assert_eq!(schedule.fee_structure_id, s.id);
    }

    #[test]
    fn schedule_dedupes_and_orders_months() {
        let s = structure(vec![5, 1, 3, 1, 5]);
        let items = vec![item(s.id, dec!(500), 1)];
        let schedule = build_schedule(&s, &items).unwrap();
        assert_eq!(schedule.months, vec![1, 3, 5]);
    }

    #[test]
    fn schedule_posts_against_the_first_item_account() {
        let s = structure(vec![1]);
        let tuition = item(s.id, dec!(900), 1);
        let transport = item(s.id, dec!(100), 2);
        let expected = tuition.account_id;
        // Order in the slice must not matter, only `position` does.
        let schedule = build_schedule(&s, &[transport, tuition]).unwrap();
        assert_eq!(schedule.account_id, expected);
    }

    #[test]
    fn schedule_requires_at_least_one_item() {
        let s = structure(vec![1, 2]);
        assert!(build_schedule(&s, &[]).is_err());
    }
}
