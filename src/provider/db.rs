use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson;

use crate::database::MongoProviderStore;
use crate::error::Error;

use super::{Provider, ProviderId};

#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn insert_provider(&self, provider: &Provider) -> Result<(), Error>;

    async fn count_providers(&self) -> Result<u64, Error>;

    async fn fetch_provider_by_id(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<Provider>, Error>;

    async fn fetch_providers_by_ids(
        &self,
        provider_ids: &[ProviderId],
    ) -> Result<Vec<Provider>, Error>;

    async fn search_provider_ids(&self, search: &str) -> Result<Vec<ProviderId>, Error>;
}

#[async_trait]
impl ProviderStore for MongoProviderStore {
    #[tracing::instrument(skip(self))]
    async fn insert_provider(&self, provider: &Provider) -> Result<(), Error> {
        self.insert_one(provider, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn count_providers(&self) -> Result<u64, Error> {
        let count = self.count_documents(bson::doc! {}, None).await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_provider_by_id(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<Provider>, Error> {
        let provider = self
            .find_one(bson::doc! { "_id": provider_id }, None)
            .await?;

        Ok(provider)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_providers_by_ids(
        &self,
        provider_ids: &[ProviderId],
    ) -> Result<Vec<Provider>, Error> {
        if provider_ids.is_empty() {
            return Ok(vec![]);
        }

        let ids = bson::to_bson(provider_ids)?;
        let providers: Vec<Provider> = self
            .find(bson::doc! { "_id": { "$in": ids } }, None)
            .await?
            .try_collect()
            .await?;

        Ok(providers)
    }

    #[tracing::instrument(skip(self))]
    async fn search_provider_ids(&self, search: &str) -> Result<Vec<ProviderId>, Error> {
        let pattern = regex::escape(search);

        let providers: Vec<Provider> = self
            .find(
                bson::doc! { "$or": [
                    { "name": { "$regex": pattern.as_str(), "$options": "i" } },
                    { "phone": { "$regex": pattern.as_str(), "$options": "i" } },
                ] },
                None,
            )
            .await?
            .try_collect()
            .await?;

        Ok(providers.into_iter().map(|provider| provider.id).collect())
    }
}
