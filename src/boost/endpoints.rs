use std::collections::HashMap;

use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::manager::{self, BoostPolicy, NewBoost};
use super::query::{self, BoostSort, ListBoosts, PageRequest, Pagination};
use super::sweeper::{ExpirySweeper, SweepSummary};
use super::timing::{self, TimeRemaining};
use super::{Boost, BoostId, BoostStatus, CancelActor, Resolution};
use crate::clock::Clock;
use crate::database::Database;
use crate::error::Error;
use crate::identity::AdminIdentity;
use crate::provider::{Provider, ProviderBody, ProviderId};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoostBody {
    pub provider_id: ProviderId,
    pub duration_days: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    #[serde(default)]
    pub pre_approved: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBoostsParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub start_date_from: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Option<String>,
}

impl ListBoostsParams {
    fn into_request(self) -> Result<ListBoosts, Error> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(status) => Some(status.parse::<BoostStatus>()?),
        };
        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") => BoostSort::default(),
            Some(sort) => sort.parse()?,
        };

        Ok(ListBoosts {
            status,
            search: self.search,
            category: self.category,
            start_date_from: self.start_date_from,
            page: PageRequest::new(self.page, self.limit)?,
            sort,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostBody {
    pub id: BoostId,
    pub provider_id: ProviderId,
    pub provider: Option<ProviderBody>,
    pub categories: Vec<String>,
    pub duration_days: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub daily_cost: Decimal,
    pub total_cost: Decimal,
    pub status: BoostStatus,
    pub created_by_admin: bool,
    pub created_by: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub progress_percent: Option<f64>,
    pub time_remaining: Option<TimeRemaining>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub version: i64,
}

impl BoostBody {
    pub fn render(boost: Boost, provider: Option<Provider>, now: DateTime<Utc>) -> BoostBody {
        let mut body = BoostBody {
            id: boost.id,
            provider_id: boost.provider_id,
            provider: provider.map(ProviderBody::render),
            categories: boost.categories,
            duration_days: boost.duration_days,
            start_date: boost.start_date,
            end_date: boost.end_date,
            daily_cost: boost.daily_cost,
            total_cost: boost.total_cost,
            status: boost.status,
            created_by_admin: boost.created_by_admin,
            created_by: boost.created_by,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            cancellation_reason: None,
            expired_at: None,
            progress_percent: None,
            time_remaining: None,
            created_at: boost.created_at,
            modified_at: boost.modified_at,
            version: boost.version,
        };

        if let Some(approval) = boost.approval {
            body.approved_by = Some(approval.by);
            body.approved_at = Some(approval.at);
        }

        match boost.resolution {
            Some(Resolution::Rejected { by, at, reason }) => {
                body.rejected_by = Some(by);
                body.rejected_at = Some(at);
                body.rejection_reason = Some(reason);
            }
            Some(Resolution::Cancelled { by, at, reason, .. }) => {
                body.cancelled_by = Some(by);
                body.cancelled_at = Some(at);
                body.cancellation_reason = reason;
            }
            Some(Resolution::Expired { at }) => {
                body.expired_at = Some(at);
            }
            None => {}
        }

        if let (Some(start_date), Some(end_date)) = (boost.start_date, boost.end_date) {
            body.progress_percent = Some(timing::progress(start_date, end_date, now));
            body.time_remaining = Some(timing::remaining(end_date, now));
        }

        body
    }

    pub async fn render_one(db: &dyn Database, boost: Boost, now: DateTime<Utc>) -> Result<BoostBody, Error> {
        let provider = db.providers().fetch_provider_by_id(boost.provider_id).await?;

        Ok(BoostBody::render(boost, provider, now))
    }

    pub async fn render_many(
        db: &dyn Database,
        boosts: Vec<Boost>,
        now: DateTime<Utc>,
    ) -> Result<Vec<BoostBody>, Error> {
        let mut provider_ids: Vec<ProviderId> = boosts.iter().map(|boost| boost.provider_id).collect();
        provider_ids.sort();
        provider_ids.dedup();

        let providers: HashMap<ProviderId, Provider> = db
            .providers()
            .fetch_providers_by_ids(&provider_ids)
            .await?
            .into_iter()
            .map(|provider| (provider.id, provider))
            .collect();

        Ok(boosts
            .into_iter()
            .map(|boost| {
                let provider = providers.get(&boost.provider_id).cloned();
                BoostBody::render(boost, provider, now)
            })
            .collect())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostListBody {
    pub items: Vec<BoostBody>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProviderBody {
    pub provider_id: ProviderId,
    pub name: Option<String>,
    pub boost_count: i64,
    pub boosted_days: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsBody {
    pub total_active_boosts: u64,
    pub total_pending_boosts: u64,
    pub average_boost_duration: f64,
    pub top_boosted_providers: Vec<TopProviderBody>,
}

#[get("/admin/boosts")]
#[tracing::instrument(skip(db, clock))]
pub async fn get_boosts(
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    _admin: AdminIdentity,
    params: Query<ListBoostsParams>,
) -> Result<Json<BoostListBody>, Error> {
    let request = params.into_inner().into_request()?;

    let page = query::list_boosts(db.get_ref(), request).await?;
    let items = BoostBody::render_many(db.get_ref(), page.items, clock.now()).await?;

    Ok(Json(BoostListBody {
        items,
        pagination: page.pagination,
    }))
}

#[get("/admin/boosts/statistics")]
#[tracing::instrument(skip(db))]
pub async fn get_boost_statistics(
    db: Data<dyn Database>,
    _admin: AdminIdentity,
) -> Result<Json<StatisticsBody>, Error> {
    let statistics = query::get_statistics(db.get_ref()).await?;

    let provider_ids: Vec<ProviderId> = statistics
        .top_boosted_providers
        .iter()
        .map(|entry| entry.provider_id)
        .collect();
    let names: HashMap<ProviderId, String> = db
        .providers()
        .fetch_providers_by_ids(&provider_ids)
        .await?
        .into_iter()
        .map(|provider| (provider.id, provider.name))
        .collect();

    Ok(Json(StatisticsBody {
        total_active_boosts: statistics.total_active_boosts,
        total_pending_boosts: statistics.total_pending_boosts,
        average_boost_duration: statistics.average_boost_duration,
        top_boosted_providers: statistics
            .top_boosted_providers
            .into_iter()
            .map(|entry| TopProviderBody {
                name: names.get(&entry.provider_id).cloned(),
                provider_id: entry.provider_id,
                boost_count: entry.boost_count,
                boosted_days: entry.boosted_days,
            })
            .collect(),
    }))
}

#[get("/admin/boosts/{boost_id}")]
#[tracing::instrument(skip(db, clock))]
pub async fn get_boost_by_id(
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    _admin: AdminIdentity,
    params: Path<BoostId>,
) -> Result<Json<BoostBody>, Error> {
    let boost_id = params.into_inner();

    let boost = manager::get_boost_by_id(db.get_ref(), boost_id).await?;

    Ok(Json(BoostBody::render_one(db.get_ref(), boost, clock.now()).await?))
}

#[post("/admin/boosts/create")]
#[tracing::instrument(skip(db, clock, policy))]
pub async fn create_boost(
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    policy: Data<BoostPolicy>,
    admin: AdminIdentity,
    body: Json<CreateBoostBody>,
) -> Result<Json<BoostBody>, Error> {
    let body = body.into_inner();
    let now = clock.now();

    let new_boost = NewBoost {
        provider_id: body.provider_id,
        duration_days: body.duration_days,
        start_date: body.start_date,
        categories: body.categories,
        pre_approved: body.pre_approved,
    };
    let boost = manager::create_boost(db.get_ref(), policy.get_ref(), new_boost, admin.0, now).await?;

    Ok(Json(BoostBody::render_one(db.get_ref(), boost, now).await?))
}

#[post("/admin/boosts/{boost_id}/approve")]
#[tracing::instrument(skip(db, clock))]
pub async fn approve_boost(
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    admin: AdminIdentity,
    params: Path<BoostId>,
) -> Result<Json<BoostBody>, Error> {
    let boost_id = params.into_inner();
    let now = clock.now();

    let boost = manager::approve_boost(db.get_ref(), boost_id, admin.0, now).await?;

    Ok(Json(BoostBody::render_one(db.get_ref(), boost, now).await?))
}

#[post("/admin/boosts/{boost_id}/reject")]
#[tracing::instrument(skip(db, clock))]
pub async fn reject_boost(
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    admin: AdminIdentity,
    params: Path<BoostId>,
    body: Json<ReasonBody>,
) -> Result<Json<BoostBody>, Error> {
    let boost_id = params.into_inner();
    let reason = body.into_inner().reason;
    let now = clock.now();

    let boost = manager::reject_boost(db.get_ref(), boost_id, admin.0, reason, now).await?;

    Ok(Json(BoostBody::render_one(db.get_ref(), boost, now).await?))
}

#[post("/admin/boosts/{boost_id}/cancel")]
#[tracing::instrument(skip(db, clock))]
pub async fn cancel_boost(
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    admin: AdminIdentity,
    params: Path<BoostId>,
    body: Json<ReasonBody>,
) -> Result<Json<BoostBody>, Error> {
    let boost_id = params.into_inner();
    let reason = body.into_inner().reason;
    let now = clock.now();

    let boost = manager::cancel_boost(
        db.get_ref(),
        boost_id,
        admin.0,
        reason,
        CancelActor::Admin,
        now,
    )
    .await?;

    Ok(Json(BoostBody::render_one(db.get_ref(), boost, now).await?))
}

#[post("/admin/boosts/debug/trigger-expiry")]
#[tracing::instrument(skip(sweeper))]
pub async fn trigger_expiry(
    sweeper: Data<ExpirySweeper>,
    _admin: AdminIdentity,
) -> Result<Json<SweepSummary>, Error> {
    Ok(Json(sweeper.sweep().await?))
}
