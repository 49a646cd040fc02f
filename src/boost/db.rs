use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson;
use mongodb::error::{Error as DatabaseError, ErrorKind, WriteFailure};
use mongodb::options::FindOptions;
use mongodb::Database;

use crate::database::MongoBoostStore;
use crate::error::Error;
use crate::provider::ProviderId;

use super::lifecycle::Transition;
use super::query::{BoostFilter, BoostSort, PageRequest, ProviderBoostCount};
use super::{Boost, BoostId, BoostStatus};

pub const BOOSTS: &str = "boosts";

// set only on exclusive pending or active boosts, unset once they resolve
const OPEN_PROVIDER_ID: &str = "open_provider_id";
const DUPLICATE_KEY: i32 = 11000;

pub async fn initialize(db: &Database) -> Result<(), Error> {
    db.run_command(
        bson::doc! {
            "createIndexes": BOOSTS,
            "indexes": [
                { "key": { "status": 1, "end_date": 1 }, "name": "by_status_and_end_date" },
                { "key": { "provider_id": 1, "status": 1 }, "name": "by_provider_id" },
                { "key": { "created_at": -1, "_id": 1 }, "name": "by_created_at" },
                {
                    "key": { OPEN_PROVIDER_ID: 1 },
                    "name": "one_open_boost_per_provider",
                    "unique": true,
                    "partialFilterExpression": { OPEN_PROVIDER_ID: { "$exists": true } },
                },
            ]
        },
        None,
    )
    .await?;

    Ok(())
}

#[async_trait]
pub trait BoostStore: Send + Sync {
    async fn insert_boost(&self, boost: &Boost) -> Result<(), Error>;

    /// Inserts the boost unless its provider already holds a pending or active
    /// boost, failing with `ProviderAlreadyBoosted` then. The check and the
    /// write are atomic with respect to other exclusive inserts.
    async fn insert_exclusive_boost(&self, boost: &Boost) -> Result<(), Error>;

    async fn fetch_boost_by_id(&self, boost_id: BoostId) -> Result<Option<Boost>, Error>;

    async fn fetch_boosts(
        &self,
        filter: &BoostFilter,
        sort: &BoostSort,
        page: &PageRequest,
    ) -> Result<Vec<Boost>, Error>;

    async fn count_boosts(&self, filter: &BoostFilter) -> Result<u64, Error>;

    /// Active boosts whose window closed at or before `now`, oldest end first.
    async fn fetch_ended_active_boosts(&self, now: DateTime<Utc>) -> Result<Vec<Boost>, Error>;

    /// Pending or active boosts held by the provider.
    async fn fetch_open_boosts_by_provider(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<Boost>, Error>;

    async fn average_boost_duration(&self) -> Result<f64, Error>;

    async fn top_boosted_providers(&self, limit: usize) -> Result<Vec<ProviderBoostCount>, Error>;

    /// Writes a planned transition only if the stored version still equals
    /// `boost.version`, returning the boost as written. Fails with
    /// `ConcurrentModificationDetected` otherwise and leaves the record as is.
    async fn update_boost_transition(
        &self,
        boost: Boost,
        transition: Transition,
    ) -> Result<Boost, Error>;
}

#[async_trait]
impl BoostStore for MongoBoostStore {
    #[tracing::instrument(skip(self))]
    async fn insert_boost(&self, boost: &Boost) -> Result<(), Error> {
        self.insert_one(boost, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn insert_exclusive_boost(&self, boost: &Boost) -> Result<(), Error> {
        let provider_id = boost.provider_id;
        let already_boosted = |open: Vec<Boost>| match open.first() {
            Some(existing) => Err(Error::ProviderAlreadyBoosted {
                provider_id,
                boost_id: existing.id,
            }),
            None => Ok(()),
        };

        // boosts stored without the marker are not covered by the index
        already_boosted(self.fetch_open_boosts_by_provider(provider_id).await?)?;

        let mut document = bson::to_document(boost)?;
        document.insert(OPEN_PROVIDER_ID, provider_id);

        match self
            .clone_with_type::<bson::Document>()
            .insert_one(document, None)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                already_boosted(self.fetch_open_boosts_by_provider(provider_id).await?)?;
                Err(Error::ConcurrentModificationDetected)
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_boost_by_id(&self, boost_id: BoostId) -> Result<Option<Boost>, Error> {
        let boost = self.find_one(bson::doc! { "_id": boost_id }, None).await?;

        Ok(boost)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_boosts(
        &self,
        filter: &BoostFilter,
        sort: &BoostSort,
        page: &PageRequest,
    ) -> Result<Vec<Boost>, Error> {
        let options = FindOptions::builder()
            .sort(sort.to_document())
            .skip(page.skip())
            .limit(page.limit as i64)
            .build();

        let boosts: Vec<Boost> = self
            .find(filter.to_document()?, options)
            .await?
            .try_collect()
            .await?;

        Ok(boosts)
    }

    #[tracing::instrument(skip(self))]
    async fn count_boosts(&self, filter: &BoostFilter) -> Result<u64, Error> {
        let count = self.count_documents(filter.to_document()?, None).await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_ended_active_boosts(&self, now: DateTime<Utc>) -> Result<Vec<Boost>, Error> {
        let options = FindOptions::builder()
            .sort(bson::doc! { "end_date": 1, "_id": 1 })
            .build();

        let boosts: Vec<Boost> = self
            .find(
                bson::doc! {
                    "status": BoostStatus::Active.as_str(),
                    "end_date": { "$lte": bson::DateTime::from_chrono(now) },
                },
                options,
            )
            .await?
            .try_collect()
            .await?;

        Ok(boosts)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_open_boosts_by_provider(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<Boost>, Error> {
        let boosts: Vec<Boost> = self
            .find(
                bson::doc! {
                    "provider_id": provider_id,
                    "status": { "$in": [
                        BoostStatus::Pending.as_str(),
                        BoostStatus::Active.as_str(),
                    ] },
                },
                None,
            )
            .await?
            .try_collect()
            .await?;

        Ok(boosts)
    }

    #[tracing::instrument(skip(self))]
    async fn average_boost_duration(&self) -> Result<f64, Error> {
        let mut cursor = self
            .aggregate(
                [bson::doc! {
                    "$group": { "_id": null, "average": { "$avg": "$duration_days" } }
                }],
                None,
            )
            .await?;

        let average = cursor
            .try_next()
            .await?
            .and_then(|doc| doc.get_f64("average").ok())
            .unwrap_or(0.0);

        Ok(average)
    }

    #[tracing::instrument(skip(self))]
    async fn top_boosted_providers(&self, limit: usize) -> Result<Vec<ProviderBoostCount>, Error> {
        let documents: Vec<bson::Document> = self
            .aggregate(
                [
                    bson::doc! { "$match": { "approval": { "$ne": null } } },
                    bson::doc! { "$group": {
                        "_id": "$provider_id",
                        "boost_count": { "$sum": 1_i64 },
                        "boosted_days": { "$sum": { "$toLong": "$duration_days" } },
                    } },
                    bson::doc! { "$sort": { "boost_count": -1, "_id": 1 } },
                    bson::doc! { "$limit": limit as i64 },
                ],
                None,
            )
            .await?
            .try_collect()
            .await?;

        let counts = documents
            .into_iter()
            .map(bson::from_document)
            .collect::<Result<Vec<ProviderBoostCount>, _>>()?;

        Ok(counts)
    }

    #[tracing::instrument(skip(self))]
    async fn update_boost_transition(
        &self,
        mut boost: Boost,
        transition: Transition,
    ) -> Result<Boost, Error> {
        let new_status = bson::to_bson(&transition.status)?;
        let new_approval = bson::to_bson(&transition.approval)?;
        let new_resolution = bson::to_bson(&transition.resolution)?;
        let new_start_date = transition.start_date.map(bson::DateTime::from_chrono);
        let new_end_date = transition.end_date.map(bson::DateTime::from_chrono);
        let new_modified_at = bson::DateTime::from_chrono(transition.modified_at);

        let mut update = bson::doc! {
            "$set": {
                "status": new_status,
                "start_date": new_start_date,
                "end_date": new_end_date,
                "approval": new_approval,
                "resolution": new_resolution,
                "modified_at": new_modified_at,
            },
            "$inc": { "version": 1_i64 },
        };
        if transition.status.is_terminal() {
            update.insert("$unset", bson::doc! { OPEN_PROVIDER_ID: "" });
        }

        let result = self
            .update_one(
                bson::doc! { "_id": boost.id, "version": boost.version },
                update,
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(Error::ConcurrentModificationDetected);
        }

        transition.apply(&mut boost);

        Ok(boost)
    }
}

fn is_duplicate_key(err: &DatabaseError) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}
