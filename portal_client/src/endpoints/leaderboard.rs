use serde::{Deserialize, Serialize};

use super::UserProfile;
use crate::{ApiError, Portal, RequestSpec, Transport};

/// A user's standing on a leaderboard
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// The recorded score
    pub score: f64,
    /// The entry's rank among all entries in its categories
    pub rank: u32,
    /// The categories the score was recorded under
    pub categories: Vec<String>,
    /// The user who recorded the score
    pub user: UserProfile,
}

/// Leaderboard endpoints
#[derive(Debug)]
pub struct Leaderboard<'a, T: ?Sized> {
    portal: &'a Portal<T>,
}

impl<'a, T> Leaderboard<'a, T>
where
    T: Transport + ?Sized + 'static,
{
    pub(crate) fn new(portal: &'a Portal<T>) -> Self {
        Self { portal }
    }

    /// The entries recorded under `categories`, one page at a time
    pub async fn entries(
        &self,
        categories: &[&str],
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<LeaderboardEntry>, ApiError> {
        let spec = RequestSpec::get(self.portal.config().endpoint("/leaderboard/v1"))
            .with_query("categories", categories.join(","))
            .with_optional_query("page", page)
            .with_optional_query("limit", limit);
        self.portal.gateway().request_json(spec, Some("docs")).await
    }

    /// Records a score for the signed-in user under `categories`
    pub async fn record(
        &self,
        score: f64,
        categories: &[&str],
    ) -> Result<LeaderboardEntry, ApiError> {
        let spec = RequestSpec::post(self.portal.config().endpoint("/leaderboard/v1"))
            .with_json_body(serde_json::json!({
                "score": score,
                "categories": categories,
            }));
        self.portal.gateway().request_json(spec, None).await
    }
}
