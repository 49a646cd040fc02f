use tracing::info;

use crate::clock::Clock;
use crate::database::Database;
use crate::error::Error;
use crate::provider::{Provider, ProviderId};

const DEMO_PROVIDERS: [(&str, &str, &str); 4] = [
    ("Meera Joshi", "meera.joshi@example.com", "+91 98450 11223"),
    ("Arjun Rao", "arjun.rao@example.com", "+91 99001 45678"),
    ("Kavya Iyer", "kavya.iyer@example.com", "+91 90080 77310"),
    ("Rohan Mehta", "rohan.mehta@example.com", "+91 98200 55421"),
];

/// Fills an empty provider directory with demo astrologers. Does nothing if
/// any provider already exists.
#[tracing::instrument(skip(db, clock))]
pub async fn seed(db: &dyn Database, clock: &dyn Clock) -> Result<(), Error> {
    if db.providers().count_providers().await? > 0 {
        info!("provider directory is not empty, skipping seed");
        return Ok(());
    }

    let now = clock.now();
    for (name, email, phone) in DEMO_PROVIDERS {
        let provider = Provider {
            id: ProviderId::new(),
            name: name.to_string(),
            email: Some(email.to_string()),
            phone: Some(phone.to_string()),
            avatar: None,
            created_at: now,
        };

        db.providers().insert_provider(&provider).await?;
    }

    info!(count = DEMO_PROVIDERS.len(), "seeded demo providers");

    Ok(())
}
