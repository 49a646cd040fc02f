//! An in-process [`Database`] with the same conditional-write semantics as the
//! MongoDB stores. Used by the test suites and for running the service locally
//! without a database server.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::boost::db::BoostStore;
use crate::boost::lifecycle::Transition;
use crate::boost::query::{BoostFilter, BoostSort, PageRequest, ProviderBoostCount};
use crate::boost::{Boost, BoostId, BoostStatus};
use crate::error::Error;
use crate::provider::db::ProviderStore;
use crate::provider::{Provider, ProviderId};

use super::Database;

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    boosts: MemoryBoostStore,
    providers: MemoryProviderStore,
}

impl MemoryDatabase {
    pub fn new() -> MemoryDatabase {
        MemoryDatabase::default()
    }
}

impl Database for MemoryDatabase {
    fn boosts(&self) -> &dyn BoostStore {
        &self.boosts
    }

    fn providers(&self) -> &dyn ProviderStore {
        &self.providers
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, Error> {
    mutex
        .lock()
        .map_err(|_| Error::ExistentialState("memory store lock was poisoned".to_string()))
}

#[derive(Debug, Default)]
pub struct MemoryBoostStore {
    boosts: Mutex<HashMap<BoostId, Boost>>,
}

impl MemoryBoostStore {
    fn matching(&self, filter: &BoostFilter) -> Result<Vec<Boost>, Error> {
        let boosts = lock(&self.boosts)?;

        Ok(boosts
            .values()
            .filter(|boost| filter.matches(boost))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BoostStore for MemoryBoostStore {
    async fn insert_boost(&self, boost: &Boost) -> Result<(), Error> {
        lock(&self.boosts)?.insert(boost.id, boost.clone());

        Ok(())
    }

    async fn insert_exclusive_boost(&self, boost: &Boost) -> Result<(), Error> {
        let mut boosts = lock(&self.boosts)?;
        let existing = boosts
            .values()
            .find(|stored| stored.provider_id == boost.provider_id && !stored.status.is_terminal());
        if let Some(existing) = existing {
            return Err(Error::ProviderAlreadyBoosted {
                provider_id: boost.provider_id,
                boost_id: existing.id,
            });
        }

        boosts.insert(boost.id, boost.clone());

        Ok(())
    }

    async fn fetch_boost_by_id(&self, boost_id: BoostId) -> Result<Option<Boost>, Error> {
        Ok(lock(&self.boosts)?.get(&boost_id).cloned())
    }

    async fn fetch_boosts(
        &self,
        filter: &BoostFilter,
        sort: &BoostSort,
        page: &PageRequest,
    ) -> Result<Vec<Boost>, Error> {
        let mut boosts = self.matching(filter)?;
        boosts.sort_by(|a, b| sort.compare(a, b));

        Ok(boosts
            .into_iter()
            .skip(page.skip() as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn count_boosts(&self, filter: &BoostFilter) -> Result<u64, Error> {
        Ok(self.matching(filter)?.len() as u64)
    }

    async fn fetch_ended_active_boosts(&self, now: DateTime<Utc>) -> Result<Vec<Boost>, Error> {
        let mut boosts: Vec<Boost> = lock(&self.boosts)?
            .values()
            .filter(|boost| boost.status == BoostStatus::Active)
            .filter(|boost| matches!(boost.end_date, Some(end_date) if end_date <= now))
            .cloned()
            .collect();
        boosts.sort_by(|a, b| a.end_date.cmp(&b.end_date).then_with(|| a.id.cmp(&b.id)));

        Ok(boosts)
    }

    async fn fetch_open_boosts_by_provider(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<Boost>, Error> {
        Ok(lock(&self.boosts)?
            .values()
            .filter(|boost| boost.provider_id == provider_id && !boost.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn average_boost_duration(&self) -> Result<f64, Error> {
        let boosts = lock(&self.boosts)?;
        if boosts.is_empty() {
            return Ok(0.0);
        }

        let total: i64 = boosts.values().map(|boost| boost.duration_days as i64).sum();

        Ok(total as f64 / boosts.len() as f64)
    }

    async fn top_boosted_providers(&self, limit: usize) -> Result<Vec<ProviderBoostCount>, Error> {
        let mut counts: HashMap<ProviderId, ProviderBoostCount> = HashMap::new();
        for boost in lock(&self.boosts)?.values() {
            if boost.approval.is_none() {
                continue;
            }
            let entry = counts
                .entry(boost.provider_id)
                .or_insert_with(|| ProviderBoostCount {
                    provider_id: boost.provider_id,
                    boost_count: 0,
                    boosted_days: 0,
                });
            entry.boost_count += 1;
            entry.boosted_days += boost.duration_days as i64;
        }

        let mut counts: Vec<ProviderBoostCount> = counts.into_values().collect();
        counts.sort_by(|a, b| {
            b.boost_count
                .cmp(&a.boost_count)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });
        counts.truncate(limit);

        Ok(counts)
    }

    async fn update_boost_transition(
        &self,
        mut boost: Boost,
        transition: Transition,
    ) -> Result<Boost, Error> {
        let mut boosts = lock(&self.boosts)?;
        let stored = boosts
            .get_mut(&boost.id)
            .filter(|stored| stored.version == boost.version)
            .ok_or(Error::ConcurrentModificationDetected)?;

        transition.apply(&mut boost);
        *stored = boost.clone();

        Ok(boost)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProviderStore {
    providers: Mutex<Vec<Provider>>,
}

#[async_trait]
impl ProviderStore for MemoryProviderStore {
    async fn insert_provider(&self, provider: &Provider) -> Result<(), Error> {
        lock(&self.providers)?.push(provider.clone());

        Ok(())
    }

    async fn count_providers(&self) -> Result<u64, Error> {
        Ok(lock(&self.providers)?.len() as u64)
    }

    async fn fetch_provider_by_id(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<Provider>, Error> {
        Ok(lock(&self.providers)?
            .iter()
            .find(|provider| provider.id == provider_id)
            .cloned())
    }

    async fn fetch_providers_by_ids(
        &self,
        provider_ids: &[ProviderId],
    ) -> Result<Vec<Provider>, Error> {
        Ok(lock(&self.providers)?
            .iter()
            .filter(|provider| provider_ids.contains(&provider.id))
            .cloned()
            .collect())
    }

    async fn search_provider_ids(&self, search: &str) -> Result<Vec<ProviderId>, Error> {
        Ok(lock(&self.providers)?
            .iter()
            .filter(|provider| provider.matches_search(search))
            .map(|provider| provider.id)
            .collect())
    }
}
