pub mod groups;
pub mod messages;

use crate::storage::Profile;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Populated user reference embedded in message and group views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
    pub profile_image: Option<String>,
}

impl From<Profile> for UserRef {
    fn from(profile: Profile) -> Self {
        Self { id: profile.id, username: profile.username, profile_image: profile.profile_image }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub has_next: bool,
}

impl Pagination {
    #[must_use]
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = (total as u64).div_ceil(limit as u64) as i64;
        Self { total, page, limit, total_pages, has_next: page * limit < total }
    }
}
