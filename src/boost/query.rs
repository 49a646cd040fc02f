use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mongodb::bson::{self, Document};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::Error;
use crate::provider::ProviderId;

use super::{Boost, BoostStatus};

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAXIMUM_PAGE_LIMIT: u64 = 100;
pub const TOP_PROVIDER_LIMIT: usize = 5;

/// Criteria shared by listing and counting. `provider_ids` is the resolved form
/// of a free-text search; `Some(vec![])` matches nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoostFilter {
    pub status: Option<BoostStatus>,
    pub provider_ids: Option<Vec<ProviderId>>,
    pub category: Option<String>,
    pub start_date_from: Option<DateTime<Utc>>,
}

impl BoostFilter {
    pub fn matches(&self, boost: &Boost) -> bool {
        if let Some(status) = self.status {
            if boost.status != status {
                return false;
            }
        }
        if let Some(provider_ids) = &self.provider_ids {
            if !provider_ids.contains(&boost.provider_id) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !boost.categories.iter().any(|c| c == category) {
                return false;
            }
        }
        if let Some(start_date_from) = self.start_date_from {
            match boost.start_date {
                Some(start_date) if start_date >= start_date_from => {}
                _ => return false,
            }
        }

        true
    }

    pub fn to_document(&self) -> Result<Document, Error> {
        let mut filter = bson::doc! {};
        if let Some(status) = self.status {
            filter.insert("status", status.as_str());
        }
        if let Some(provider_ids) = &self.provider_ids {
            filter.insert("provider_id", bson::doc! { "$in": bson::to_bson(provider_ids)? });
        }
        if let Some(category) = &self.category {
            filter.insert("categories", category.as_str());
        }
        if let Some(start_date_from) = self.start_date_from {
            filter.insert(
                "start_date",
                bson::doc! { "$gte": bson::DateTime::from_chrono(start_date_from) },
            );
        }

        Ok(filter)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SortField {
    CreatedAt,
    StartDate,
    EndDate,
    DurationDays,
}

impl SortField {
    fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::StartDate => "start_date",
            SortField::EndDate => "end_date",
            SortField::DurationDays => "duration_days",
        }
    }
}

/// Sort order for listings, always tie-broken by ascending id so pages stay
/// stable when timestamps collide.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoostSort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for BoostSort {
    fn default() -> BoostSort {
        BoostSort {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for BoostSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<BoostSort, Error> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, s),
        };

        let field = match name {
            "createdAt" | "created_at" => SortField::CreatedAt,
            "startDate" | "start_date" => SortField::StartDate,
            "endDate" | "end_date" => SortField::EndDate,
            "durationDays" | "duration_days" => SortField::DurationDays,
            _ => return Err(Error::InvalidSort { sort: s.to_string() }),
        };

        Ok(BoostSort { field, descending })
    }
}

impl BoostSort {
    pub fn to_document(&self) -> Document {
        let direction = if self.descending { -1 } else { 1 };
        let mut sort = bson::doc! {};
        sort.insert(self.field.column(), direction);
        sort.insert("_id", 1);
        sort
    }

    pub fn compare(&self, a: &Boost, b: &Boost) -> Ordering {
        let ordering = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::StartDate => a.start_date.cmp(&b.start_date),
            SortField::EndDate => a.end_date.cmp(&b.end_date),
            SortField::DurationDays => a.duration_days.cmp(&b.duration_days),
        };
        let ordering = if self.descending {
            ordering.reverse()
        } else {
            ordering
        };

        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Result<PageRequest, Error> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page == 0 || limit == 0 || limit > MAXIMUM_PAGE_LIMIT {
            return Err(Error::InvalidPagination { page, limit });
        }
        // the offset must fit the store's signed skip
        let in_range = (page - 1)
            .checked_mul(limit)
            .map_or(false, |skip| skip <= i64::MAX as u64);
        if !in_range {
            return Err(Error::InvalidPagination { page, limit });
        }

        Ok(PageRequest { page, limit })
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(request: &PageRequest, total: u64) -> Pagination {
        Pagination {
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoostPage {
    pub items: Vec<Boost>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug)]
pub struct ListBoosts {
    pub status: Option<BoostStatus>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub start_date_from: Option<DateTime<Utc>>,
    pub page: PageRequest,
    pub sort: BoostSort,
}

/// Boost count and boosted days for one provider, over approved campaigns.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ProviderBoostCount {
    #[serde(rename = "_id")]
    pub provider_id: ProviderId,
    pub boost_count: i64,
    pub boosted_days: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoostStatistics {
    pub total_active_boosts: u64,
    pub total_pending_boosts: u64,
    pub average_boost_duration: f64,
    pub top_boosted_providers: Vec<ProviderBoostCount>,
}

#[tracing::instrument(skip(db))]
pub async fn list_boosts(db: &dyn Database, request: ListBoosts) -> Result<BoostPage, Error> {
    let search = request
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty());

    let provider_ids = match search {
        Some(search) => Some(db.providers().search_provider_ids(search).await?),
        None => None,
    };

    let filter = BoostFilter {
        status: request.status,
        provider_ids,
        category: request
            .category
            .map(|category| category.trim().to_string())
            .filter(|category| !category.is_empty()),
        start_date_from: request.start_date_from,
    };

    if matches!(&filter.provider_ids, Some(ids) if ids.is_empty()) {
        return Ok(BoostPage {
            items: vec![],
            pagination: Pagination::new(&request.page, 0),
        });
    }

    let total = db.boosts().count_boosts(&filter).await?;
    let items = db
        .boosts()
        .fetch_boosts(&filter, &request.sort, &request.page)
        .await?;

    Ok(BoostPage {
        items,
        pagination: Pagination::new(&request.page, total),
    })
}

#[tracing::instrument(skip(db))]
pub async fn get_statistics(db: &dyn Database) -> Result<BoostStatistics, Error> {
    let active = BoostFilter {
        status: Some(BoostStatus::Active),
        ..BoostFilter::default()
    };
    let pending = BoostFilter {
        status: Some(BoostStatus::Pending),
        ..BoostFilter::default()
    };

    Ok(BoostStatistics {
        total_active_boosts: db.boosts().count_boosts(&active).await?,
        total_pending_boosts: db.boosts().count_boosts(&pending).await?,
        average_boost_duration: db.boosts().average_boost_duration().await?,
        top_boosted_providers: db
            .boosts()
            .top_boosted_providers(TOP_PROVIDER_LIMIT)
            .await?,
    })
}
