use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::database::Database;
use crate::error::Error;
use crate::provider::ProviderId;

use super::cost::{compute_cost, compute_end_date, normalize_categories, require_reason};
use super::lifecycle::{self, Command};
use super::{Boost, BoostId, BoostStatus, CancelActor};

/// Platform rules applied when a boost is created.
#[derive(Clone, Debug, PartialEq)]
pub struct BoostPolicy {
    pub daily_cost: Decimal,
    pub max_duration_days: i32,
    pub allow_concurrent_boosts: bool,
}

#[derive(Clone, Debug)]
pub struct NewBoost {
    pub provider_id: ProviderId,
    pub duration_days: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub pre_approved: bool,
}

#[tracing::instrument(skip(db))]
pub async fn create_boost(
    db: &dyn Database,
    policy: &BoostPolicy,
    new_boost: NewBoost,
    created_by: String,
    now: DateTime<Utc>,
) -> Result<Boost, Error> {
    let total_cost = compute_cost(
        new_boost.duration_days,
        policy.daily_cost,
        policy.max_duration_days,
    )?;
    let categories = normalize_categories(new_boost.categories)?;
    let end_date = new_boost
        .start_date
        .map(|start_date| compute_end_date(start_date, new_boost.duration_days))
        .transpose()?;

    let provider_id = new_boost.provider_id;
    db.providers()
        .fetch_provider_by_id(provider_id)
        .await?
        .ok_or(Error::ProviderNotFound { provider_id })?;

    let mut boost = Boost {
        id: BoostId::new(),
        provider_id,
        categories,
        duration_days: new_boost.duration_days,
        start_date: new_boost.start_date,
        end_date,
        daily_cost: policy.daily_cost,
        total_cost,
        status: BoostStatus::Pending,
        created_by_admin: true,
        created_by: created_by.clone(),
        approval: None,
        resolution: None,
        created_at: now,
        modified_at: now,
        version: 0,
    };

    if new_boost.pre_approved {
        let transition = lifecycle::plan(&boost, Command::Approve { by: created_by }, now)?;
        transition.apply(&mut boost);
    }
    boost.check_invariants()?;

    if policy.allow_concurrent_boosts {
        db.boosts().insert_boost(&boost).await?;
    } else {
        db.boosts().insert_exclusive_boost(&boost).await?;
    }

    info!(boost_id = %boost.id, status = %boost.status, "boost created");

    Ok(boost)
}

#[tracing::instrument(skip(db))]
pub async fn get_boost_by_id(db: &dyn Database, boost_id: BoostId) -> Result<Boost, Error> {
    let boost = db
        .boosts()
        .fetch_boost_by_id(boost_id)
        .await?
        .ok_or(Error::BoostNotFound { boost_id })?;

    Ok(boost)
}

#[tracing::instrument(skip(db))]
pub async fn approve_boost(
    db: &dyn Database,
    boost_id: BoostId,
    by: String,
    now: DateTime<Utc>,
) -> Result<Boost, Error> {
    let boost = get_boost_by_id(db, boost_id).await?;

    transition_boost(db, boost, Command::Approve { by }, now).await
}

#[tracing::instrument(skip(db))]
pub async fn reject_boost(
    db: &dyn Database,
    boost_id: BoostId,
    by: String,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Boost, Error> {
    let reason = require_reason(boost_id, reason)?;
    let boost = get_boost_by_id(db, boost_id).await?;

    let command = Command::Reject {
        by,
        reason: Some(reason),
    };
    transition_boost(db, boost, command, now).await
}

#[tracing::instrument(skip(db))]
pub async fn cancel_boost(
    db: &dyn Database,
    boost_id: BoostId,
    by: String,
    reason: Option<String>,
    actor: CancelActor,
    now: DateTime<Utc>,
) -> Result<Boost, Error> {
    let reason = match actor {
        CancelActor::Admin => Some(require_reason(boost_id, reason)?),
        CancelActor::User => reason,
    };
    let boost = get_boost_by_id(db, boost_id).await?;

    let command = Command::Cancel { by, reason, actor };
    transition_boost(db, boost, command, now).await
}

/// Expires a boost exactly as it was read by the caller. Used by the sweeper,
/// which must not act on anything newer than what it inspected.
#[tracing::instrument(skip(db))]
pub async fn expire_boost(db: &dyn Database, boost: Boost, now: DateTime<Utc>) -> Result<Boost, Error> {
    transition_boost(db, boost, Command::Expire, now).await
}

/// Plans `command` against `boost` and writes it if nobody else has written
/// the boost since it was read.
#[tracing::instrument(skip(db))]
pub async fn transition_boost(
    db: &dyn Database,
    boost: Boost,
    command: Command,
    now: DateTime<Utc>,
) -> Result<Boost, Error> {
    let transition = lifecycle::plan(&boost, command, now)?;

    let mut planned = boost.clone();
    transition.clone().apply(&mut planned);
    planned.check_invariants()?;

    let previous = boost.status;
    let boost = db.boosts().update_boost_transition(boost, transition).await?;

    info!(
        boost_id = %boost.id,
        from = %previous,
        to = %boost.status,
        version = boost.version,
        "boost transitioned"
    );

    Ok(boost)
}
