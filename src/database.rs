use mongodb::{bson, Collection};

use crate::boost::db::BoostStore;
use crate::boost::Boost;
use crate::error::Error;
use crate::provider::db::ProviderStore;
use crate::provider::Provider;

pub mod memory;

pub type MongoBoostStore = Collection<Boost>;
pub type MongoProviderStore = Collection<Provider>;

/// Every store the service reads from or writes to. Handlers and managers only
/// ever see this trait, so the backing engine can be swapped for tests.
pub trait Database: Send + Sync {
    fn boosts(&self) -> &dyn BoostStore;

    fn providers(&self) -> &dyn ProviderStore;
}

#[derive(Debug, Clone)]
pub struct MongoDatabase {
    boosts: Collection<Boost>,
    providers: Collection<Provider>,
}

impl MongoDatabase {
    /// Pings the server and ensures the indexes the queries rely on.
    #[tracing::instrument(skip(db))]
    pub async fn initialize(db: mongodb::Database) -> Result<MongoDatabase, Error> {
        db.run_command(bson::doc! { "ping": 1 }, None).await?;

        crate::boost::db::initialize(&db).await?;

        Ok(MongoDatabase {
            boosts: db.collection(crate::boost::db::BOOSTS),
            providers: db.collection("providers"),
        })
    }
}

impl Database for MongoDatabase {
    fn boosts(&self) -> &dyn BoostStore {
        &self.boosts
    }

    fn providers(&self) -> &dyn ProviderStore {
        &self.providers
    }
}
