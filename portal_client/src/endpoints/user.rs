use serde::{Deserialize, Serialize};

use crate::{ApiError, Portal, RequestSpec, Transport};

/// The kind of person behind an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserType {
    /// An adult
    Adult,
    /// A child
    Child,
    /// A teenager under the age of majority
    TeenMinor,
}

/// The role an account plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// A parent overseeing kids' accounts
    Parent,
    /// A kid's account
    Kid,
    /// An adult's own account
    Adult,
    /// A character account
    Character,
    /// A community account
    Community,
}

/// A user's public profile
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// The user's unique ID
    pub user_id: String,
    /// The kind of person behind the account
    pub user_type: UserType,
    /// The role the account plays
    pub account_type: AccountType,
    /// The user's handle
    pub handle: String,
    /// The user's first name, if shared
    #[serde(default)]
    pub first_name: Option<String>,
    /// The user's last name, if shared
    #[serde(default)]
    pub last_name: Option<String>,
    /// The ID of the user's profile picture
    #[serde(default)]
    pub profile_pic: Option<String>,
    /// The ID of the user's cover photo
    #[serde(default)]
    pub cover_photo: Option<String>,
    /// The user's country
    pub country: String,
    /// Whether this is an anonymous account
    #[serde(default)]
    pub anonymous: bool,
}

/// User profile endpoints
#[derive(Debug)]
pub struct Users<'a, T: ?Sized> {
    portal: &'a Portal<T>,
}

impl<'a, T> Users<'a, T>
where
    T: Transport + ?Sized + 'static,
{
    pub(crate) fn new(portal: &'a Portal<T>) -> Self {
        Self { portal }
    }

    /// The signed-in user's profile
    pub async fn my_profile(&self) -> Result<UserProfile, ApiError> {
        let spec = RequestSpec::get(self.portal.config().endpoint("/user/v1/my/profile"));
        self.portal.gateway().request_json(spec, None).await
    }

    /// The profiles of the signed-in user's friends
    pub async fn my_friends(&self) -> Result<Vec<UserProfile>, ApiError> {
        let spec = RequestSpec::get(self.portal.config().endpoint("/user/v1/my/friends"));
        self.portal.gateway().request_json(spec, None).await
    }

    /// Searches for users by `term`, one page at a time
    pub async fn search(
        &self,
        term: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<UserProfile>, ApiError> {
        let spec = RequestSpec::get(self.portal.config().endpoint("/user/v1/search"))
            .with_query("term", term)
            .with_optional_query("page", page)
            .with_optional_query("limit", limit);
        self.portal.gateway().request_json(spec, Some("docs")).await
    }

    /// A random selection of `count` users
    pub async fn random(&self, count: u32) -> Result<Vec<UserProfile>, ApiError> {
        let spec = RequestSpec::get(self.portal.config().endpoint("/user/v1/search/random"))
            .with_query("count", count);
        self.portal.gateway().request_json(spec, None).await
    }
}
