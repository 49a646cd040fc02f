use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::typedid::{TypedId, TypedIdMarker};

pub mod db;

pub type ProviderId = TypedId<Provider>;

/// The directory's view of an astrologer. Boosts only ever read it, to show who
/// a campaign belongs to and to resolve free-text searches.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Provider {
    #[serde(rename = "_id")]
    pub id: ProviderId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Provider {
    /// Case-insensitive substring match on name or phone.
    pub fn matches_search(&self, search: &str) -> bool {
        let search = search.to_lowercase();
        self.name.to_lowercase().contains(&search)
            || self
                .phone
                .as_ref()
                .map(|phone| phone.to_lowercase().contains(&search))
                .unwrap_or(false)
    }
}

impl TypedIdMarker for Provider {
    fn tag() -> &'static str {
        "PRV"
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBody {
    pub id: ProviderId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

impl ProviderBody {
    pub fn render(provider: Provider) -> ProviderBody {
        ProviderBody {
            id: provider.id,
            name: provider.name,
            email: provider.email,
            phone: provider.phone,
            avatar: provider.avatar,
        }
    }
}
