use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::provider::ProviderId;
use crate::typedid::{TypedId, TypedIdMarker};

pub mod cost;
pub mod db;
pub mod endpoints;
pub mod lifecycle;
pub mod manager;
pub mod query;
pub mod sweeper;
pub mod timing;

pub type BoostId = TypedId<Boost>;

/// A paid, time-boxed priority placement for a provider in one or more
/// categories.
///
/// `start_date` and `end_date` are either both unset (pending without a
/// requested start) or `end_date == start_date + duration_days`. Costs are
/// snapshotted at creation and never change. `version` increases by one on
/// every status-changing write and guards those writes.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Boost {
    #[serde(rename = "_id")]
    pub id: BoostId,
    pub provider_id: ProviderId,
    pub categories: Vec<String>,
    pub duration_days: i32,
    #[serde(default, with = "crate::utils::optional_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::utils::optional_datetime")]
    pub end_date: Option<DateTime<Utc>>,
    pub daily_cost: Decimal,
    pub total_cost: Decimal,
    pub status: BoostStatus,
    pub created_by_admin: bool,
    pub created_by: String,
    pub approval: Option<Approval>,
    pub resolution: Option<Resolution>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
    pub version: i64,
}

impl TypedIdMarker for Boost {
    fn tag() -> &'static str {
        "BST"
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostStatus {
    Pending,
    Active,
    Expired,
    Rejected,
    CancelledByUser,
    CancelledByAdmin,
}

impl BoostStatus {
    pub const ALL: [BoostStatus; 6] = [
        BoostStatus::Pending,
        BoostStatus::Active,
        BoostStatus::Expired,
        BoostStatus::Rejected,
        BoostStatus::CancelledByUser,
        BoostStatus::CancelledByAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BoostStatus::Pending => "pending",
            BoostStatus::Active => "active",
            BoostStatus::Expired => "expired",
            BoostStatus::Rejected => "rejected",
            BoostStatus::CancelledByUser => "cancelled_by_user",
            BoostStatus::CancelledByAdmin => "cancelled_by_admin",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BoostStatus::Pending | BoostStatus::Active)
    }
}

impl Display for BoostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoostStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<BoostStatus, Error> {
        BoostStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidStatusFilter {
                status: s.to_string(),
            })
    }
}

/// The kinds of transition a boost can be asked to make.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostEvent {
    Approve,
    Reject,
    Cancel,
    Expire,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Approval {
    pub by: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelActor {
    User,
    Admin,
}

/// How a boost reached its terminal status. Exactly one is recorded, and only
/// once the boost is terminal.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Resolution {
    Rejected {
        by: String,
        #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
        at: DateTime<Utc>,
        reason: String,
    },
    Cancelled {
        by: String,
        #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
        at: DateTime<Utc>,
        reason: Option<String>,
        actor: CancelActor,
    },
    Expired {
        #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
        at: DateTime<Utc>,
    },
}

impl Resolution {
    fn matches(&self, status: BoostStatus) -> bool {
        match (self, status) {
            (Resolution::Rejected { .. }, BoostStatus::Rejected) => true,
            (Resolution::Expired { .. }, BoostStatus::Expired) => true,
            (Resolution::Cancelled { actor, .. }, BoostStatus::CancelledByUser) => {
                *actor == CancelActor::User
            }
            (Resolution::Cancelled { actor, .. }, BoostStatus::CancelledByAdmin) => {
                *actor == CancelActor::Admin
            }
            _ => false,
        }
    }
}

impl Boost {
    /// Checks the record-level invariants: cost and window arithmetic, and that
    /// the recorded approval and resolution agree with the status.
    pub fn check_invariants(&self) -> Result<(), Error> {
        let broken = |what: &str| Err(Error::ExistentialState(format!("boost {} {}", self.id, what)));

        if self.total_cost != cost::compute_total(self.duration_days, self.daily_cost) {
            return broken("has a total cost that does not match its duration");
        }

        match (self.start_date, self.end_date) {
            (Some(start), Some(end))
                if cost::compute_end_date(start, self.duration_days).ok() == Some(end) => {}
            (None, None) if self.approval.is_none() => {}
            _ => return broken("has an inconsistent time window"),
        }

        match (&self.resolution, self.status.is_terminal()) {
            (None, false) => {}
            (Some(resolution), true) if resolution.matches(self.status) => {}
            _ => return broken("has a resolution that does not match its status"),
        }

        let needs_approval = matches!(self.status, BoostStatus::Active | BoostStatus::Expired);
        if needs_approval && self.approval.is_none() {
            return broken("is live without an approval");
        }

        Ok(())
    }
}
