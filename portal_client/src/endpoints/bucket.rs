use serde_json::{json, Value};

use crate::{ApiError, ErrorCode, Portal, RequestSpec, Transport};

/// Data bucket endpoints
///
/// A bucket is a named JSON document shared between a set of users. Keys
/// within a bucket may be nested using dots, as in `scores.daily`.
#[derive(Debug)]
pub struct Buckets<'a, T: ?Sized> {
    portal: &'a Portal<T>,
}

impl<'a, T> Buckets<'a, T>
where
    T: Transport + ?Sized + 'static,
{
    pub(crate) fn new(portal: &'a Portal<T>) -> Self {
        Self { portal }
    }

    /// Creates a bucket shared with `users`
    ///
    /// Creating a bucket that already exists succeeds.
    pub async fn create(&self, name: &str, users: &[&str], public: bool) -> Result<(), ApiError> {
        let spec = RequestSpec::put(self.endpoint()).with_json_body(json!({
            "id": name,
            "users": users,
            "public": public,
        }));

        match self.portal.gateway().request::<()>(spec).await {
            Err(error) if error.code() == Some(ErrorCode::ALREADY_EXISTS) => {
                tracing::debug!(bucket = name, "bucket already exists");
                Ok(())
            }
            outcome => outcome,
        }
    }

    /// Writes `value` at `key`, returning the bucket's updated contents
    pub async fn write(&self, name: &str, key: &str, value: Value) -> Result<Value, ApiError> {
        let spec = RequestSpec::post(self.endpoint()).with_json_body(json!({
            "id": name,
            "key": key,
            "value": value,
        }));
        self.portal.gateway().request_at(spec, Some("data")).await
    }

    /// Reads the value at `key`, or the whole bucket if no key is given
    pub async fn read(&self, name: &str, key: Option<&str>) -> Result<Value, ApiError> {
        let spec = RequestSpec::get(self.endpoint())
            .with_query("id", name)
            .with_optional_query("key", key);
        self.portal.gateway().request_at(spec, Some("data")).await
    }

    /// Deletes a bucket
    pub async fn delete(&self, name: &str) -> Result<(), ApiError> {
        let spec = RequestSpec::delete(self.endpoint()).with_json_body(json!({ "id": name }));
        self.portal.gateway().request(spec).await
    }

    fn endpoint(&self) -> reqwest::Url {
        self.portal.config().endpoint("/app/v1/bucket")
    }
}
