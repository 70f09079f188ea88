use crate::{
    auth::AuthUser,
    errors::{AppError, AppResult},
    models::{CreateLateFeeRuleRequest, LateFeeKind, LateFeeRule, UpdateLateFeeRuleRequest},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn validate_rule_value(kind: &LateFeeKind, value: Decimal) -> AppResult<()> {
    if value <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Rule value must be greater than zero".to_string(),
        ));
    }
    if *kind == LateFeeKind::PercentageOfTotal && value > Decimal::ONE_HUNDRED {
        return Err(AppError::Validation(
            "Percentage rules cannot exceed 100".to_string(),
        ));
    }
    Ok(())
}

/// Create a late fee rule. Rules stack: every active rule whose grace window
/// has passed contributes to an overdue invoice's fee.
#[utoipa::path(
    post,
    path = "/api/v1/late-fee-rules",
    request_body = CreateLateFeeRuleRequest,
    responses(
        (status = 201, description = "Rule created", body = LateFeeRule),
        (status = 400, description = "Invalid value or grace period"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Late Fee Rules"
)]
pub async fn create_late_fee_rule(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateLateFeeRuleRequest>,
) -> AppResult<(axum::http::StatusCode, Json<LateFeeRule>)> {
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Rule name cannot be empty".to_string()));
    }
    validate_rule_value(&body.kind, body.value)?;
    if body.grace_period_days < 0 {
        return Err(AppError::Validation(
            "Grace period cannot be negative".to_string(),
        ));
    }

    let rule = sqlx::query_as::<_, LateFeeRule>(
        r#"INSERT INTO late_fee_rules (name, kind, value, grace_period_days)
           VALUES ($1, $2, $3, $4)
           RETURNING *"#,
    )
    .bind(body.name.trim())
    .bind(&body.kind)
    .bind(body.value)
    .bind(body.grace_period_days)
    .fetch_one(&state.db)
    .await?;

    Ok((axum::http::StatusCode::CREATED, Json(rule)))
}

/// List all late fee rules
#[utoipa::path(
    get,
    path = "/api/v1/late-fee-rules",
    responses(
        (status = 200, description = "List of rules", body = Vec<LateFeeRule>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Late Fee Rules"
)]
pub async fn list_late_fee_rules(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<LateFeeRule>>> {
    let rules = sqlx::query_as::<_, LateFeeRule>(
        "SELECT * FROM late_fee_rules ORDER BY grace_period_days, created_at",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rules))
}

/// Amend or deactivate a late fee rule. The next recompute sweep re-assesses
/// every unpaid invoice under the amended rule set.
#[utoipa::path(
    patch,
    path = "/api/v1/late-fee-rules/{rule_id}",
    request_body = UpdateLateFeeRuleRequest,
    params(("rule_id" = Uuid, Path, description = "Late fee rule ID")),
    responses(
        (status = 200, description = "Rule updated", body = LateFeeRule),
        (status = 400, description = "Invalid value or grace period"),
        (status = 404, description = "Rule not found"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Late Fee Rules"
)]
pub async fn update_late_fee_rule(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    Json(body): Json<UpdateLateFeeRuleRequest>,
) -> AppResult<Json<LateFeeRule>> {
    let existing = sqlx::query_as::<_, LateFeeRule>("SELECT * FROM late_fee_rules WHERE id = $1")
        .bind(rule_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Late fee rule {rule_id} not found")))?;

    if let Some(value) = body.value {
        validate_rule_value(&existing.kind, value)?;
    }
    if matches!(body.grace_period_days, Some(grace) if grace < 0) {
        return Err(AppError::Validation(
            "Grace period cannot be negative".to_string(),
        ));
    }
    if matches!(body.name.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(AppError::Validation("Rule name cannot be empty".to_string()));
    }

    let rule = sqlx::query_as::<_, LateFeeRule>(
        r#"UPDATE late_fee_rules
           SET name = COALESCE($2, name),
               value = COALESCE($3, value),
               grace_period_days = COALESCE($4, grace_period_days),
               active = COALESCE($5, active),
               updated_at = NOW()
           WHERE id = $1
           RETURNING *"#,
    )
    .bind(rule_id)
    .bind(body.name.as_deref().map(str::trim))
    .bind(body.value)
    .bind(body.grace_period_days)
    .bind(body.active)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(rule))
}
