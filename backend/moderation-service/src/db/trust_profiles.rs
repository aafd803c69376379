//! Trust ledger queries.
//!
//! Every counter change is one `INSERT .. ON CONFLICT DO UPDATE .. RETURNING`
//! statement so concurrent writers never lose an update.

use crate::error::Result;
use crate::models::{LedgerField, TrustProfile};
use sqlx::PgExecutor;

const PROFILE_COLUMNS: &str = "user_id, spam_score, abuse_score, trust_score, total_violations, \
     warning_count, is_suspended, is_banned, last_violation_at, updated_at";

pub async fn find<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<Option<TrustProfile>> {
    let profile = sqlx::query_as::<_, TrustProfile>(&format!(
        "SELECT {} FROM trust_profiles WHERE user_id = $1",
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(profile)
}

pub async fn find_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i64,
) -> Result<Option<TrustProfile>> {
    let profile = sqlx::query_as::<_, TrustProfile>(&format!(
        "SELECT {} FROM trust_profiles WHERE user_id = $1 FOR UPDATE",
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(profile)
}

pub async fn apply_violation<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i64,
    trust_decay: i32,
    field: LedgerField,
    amount: i32,
) -> Result<TrustProfile> {
    let (spam, abuse) = match field {
        LedgerField::Spam => (amount, 0),
        LedgerField::Abuse => (0, amount),
    };

    let profile = sqlx::query_as::<_, TrustProfile>(&format!(
        r#"
        INSERT INTO trust_profiles (
            user_id, spam_score, abuse_score, trust_score, total_violations,
            last_violation_at, updated_at
        )
        VALUES ($1, LEAST($3, 100), LEAST($4, 100), GREATEST(100 - $2, 0), 1, NOW(), NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            spam_score = LEAST(trust_profiles.spam_score + $3, 100),
            abuse_score = LEAST(trust_profiles.abuse_score + $4, 100),
            trust_score = GREATEST(trust_profiles.trust_score - $2, 0),
            total_violations = trust_profiles.total_violations + 1,
            last_violation_at = NOW(),
            updated_at = NOW()
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .bind(trust_decay)
    .bind(spam)
    .bind(abuse)
    .fetch_one(executor)
    .await?;

    Ok(profile)
}

pub async fn increment_warning_count<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i64,
) -> Result<TrustProfile> {
    let profile = sqlx::query_as::<_, TrustProfile>(&format!(
        r#"
        INSERT INTO trust_profiles (user_id, warning_count, updated_at)
        VALUES ($1, 1, NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            warning_count = trust_profiles.warning_count + 1,
            updated_at = NOW()
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(profile)
}

pub async fn decrement_warning_count<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i64,
) -> Result<TrustProfile> {
    let profile = sqlx::query_as::<_, TrustProfile>(&format!(
        r#"
        INSERT INTO trust_profiles (user_id, updated_at)
        VALUES ($1, NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            warning_count = GREATEST(trust_profiles.warning_count - 1, 0),
            updated_at = NOW()
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(profile)
}

/// Sets the suspension flag; returns true only if it changed
pub async fn set_suspended<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<bool> {
    let changed: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO trust_profiles (user_id, is_suspended, updated_at)
        VALUES ($1, TRUE, NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            is_suspended = TRUE,
            updated_at = NOW()
        WHERE NOT trust_profiles.is_suspended
        RETURNING user_id
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(changed.is_some())
}

/// Clears the suspension flag; returns true only if it was set
pub async fn clear_suspended<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE trust_profiles
        SET is_suspended = FALSE, updated_at = NOW()
        WHERE user_id = $1 AND is_suspended
        "#,
    )
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Sets the ban flag; returns true only if it changed
pub async fn set_banned<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<bool> {
    let changed: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO trust_profiles (user_id, is_banned, updated_at)
        VALUES ($1, TRUE, NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            is_banned = TRUE,
            updated_at = NOW()
        WHERE NOT trust_profiles.is_banned
        RETURNING user_id
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(changed.is_some())
}

pub async fn clear_banned<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE trust_profiles
        SET is_banned = FALSE, updated_at = NOW()
        WHERE user_id = $1 AND is_banned
        "#,
    )
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
