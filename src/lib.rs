use std::sync::Arc;

use actix_web::web::{self, Data, JsonConfig, PathConfig, QueryConfig, ServiceConfig};
use actix_web::{App, HttpResponse, HttpServer};
use mongodb::Client;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

pub mod boost;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod identity;
pub mod provider;
pub mod seed;
pub mod typedid;
pub mod utils;

use boost::endpoints;
use boost::sweeper::ExpirySweeper;
use clock::{Clock, SystemClock};
use config::{Settings, Storage};
use database::memory::MemoryDatabase;
use database::{Database, MongoDatabase};
use error::Error;

/// Registers the extractor error handlers and every boost endpoint. The
/// caller provides `Data<dyn Database>`, `Data<dyn Clock>`, `Data<BoostPolicy>`
/// and `Data<ExpirySweeper>`.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.app_data(JsonConfig::default().error_handler(|err, _req| {
        // format json errors with custom format
        Error::InvalidJson(err).into()
    }))
    .app_data(PathConfig::default().error_handler(|err, _req| {
        // format path errors with custom format
        Error::InvalidPath(err).into()
    }))
    .app_data(QueryConfig::default().error_handler(|err, _req| {
        // format query errors with custom format
        Error::InvalidQuery(err).into()
    }))
    .service(endpoints::get_boosts)
    .service(endpoints::get_boost_statistics)
    .service(endpoints::get_boost_by_id)
    .service(endpoints::create_boost)
    .service(endpoints::trigger_expiry)
    .service(endpoints::approve_boost)
    .service(endpoints::reject_boost)
    .service(endpoints::cancel_boost);
}

pub async fn path_does_not_exist() -> Result<HttpResponse, Error> {
    Err(Error::PathDoesNotExist)
}

async fn connect(settings: &Settings) -> Result<Arc<dyn Database>, Error> {
    match settings.storage {
        Storage::MongoDb => {
            info!("connecting to db: {}", settings.mongodb_uri);
            let client = Client::with_uri_str(&settings.mongodb_uri).await?;
            let db = MongoDatabase::initialize(client.database(&settings.database)).await?;

            Ok(Arc::new(db))
        }
        Storage::Memory => {
            warn!("using in-memory storage, nothing will persist across restarts");

            Ok(Arc::new(MemoryDatabase::new()))
        }
    }
}

/// Runs the service until the HTTP server shuts down, then stops the expiry
/// sweeper.
pub async fn run(settings: Settings) -> Result<(), Error> {
    let db = connect(&settings).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    if settings.seed {
        seed::seed(&*db, &*clock).await?;
    }

    let sweeper = Arc::new(ExpirySweeper::new(
        Arc::clone(&db),
        Arc::clone(&clock),
        settings.sweep_interval,
        settings.sweep_batch_size,
    ));
    sweeper.start();

    let db = Data::from(db);
    let clock = Data::from(clock);
    let policy = Data::new(settings.policy());
    let sweeper_data = Data::from(Arc::clone(&sweeper));

    info!("listening on {}", settings.bind_address);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .app_data(clock.clone())
            .app_data(policy.clone())
            .app_data(sweeper_data.clone())
            .wrap(TracingLogger::default())
            .configure(configure)
            .default_service(web::to(path_does_not_exist))
    })
    .bind(&settings.bind_address)?
    .run();

    let result = server.await;
    sweeper.stop().await;

    Ok(result?)
}
