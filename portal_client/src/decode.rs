//! Decoding of successful response bodies
//!
//! Portal responses often wrap the interesting value in an envelope, such as
//! `{"data": {...}}` or `{"docs": [...]}`. [`extract()`] walks a dotted key
//! path into such an envelope, and [`decode()`] combines that walk with
//! conversion into a requested [`FromResponse`] shape.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// A key path could not be followed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// A value along the path was not a JSON object
    #[error("value at `{key}` is not an object")]
    NotAnObject {
        /// The path up to the offending value
        key: String,
    },
    /// The path led nowhere
    #[error("no value at `{key}`")]
    MissingKey {
        /// The full path that was requested
        key: String,
    },
}

/// Walks `path`, split on `.`, through nested objects
///
/// Returns `Ok(None)` if any key along the path is absent. A value along the
/// path that is not an object, and therefore cannot be descended into, is an
/// error. An empty path yields `json` itself.
pub fn extract<'a>(json: &'a Value, path: &str) -> Result<Option<&'a Value>, ExtractError> {
    if path.is_empty() {
        return Ok(Some(json));
    }

    let mut current = json;
    let mut walked = 0;
    for key in path.split('.') {
        let object = current.as_object().ok_or_else(|| ExtractError::NotAnObject {
            key: path[..walked.max(1) - 1].to_owned(),
        })?;

        match object.get(key) {
            Some(next) => current = next,
            None => return Ok(None),
        }
        walked += key.len() + 1;
    }

    Ok(Some(current))
}

/// Like [`extract()`], but treats an absent value as an error
pub fn extract_required<'a>(json: &'a Value, path: &str) -> Result<&'a Value, ExtractError> {
    extract(json, path)?.ok_or_else(|| ExtractError::MissingKey {
        key: path.to_owned(),
    })
}

/// A successful response body did not have the requested shape
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body was not valid JSON, or did not deserialize into the target type
    #[error("response body could not be parsed")]
    Json(#[from] serde_json::Error),
    /// The body was JSON of the wrong kind
    #[error("expected a JSON {expected}")]
    WrongShape {
        /// The expected kind of JSON value
        expected: &'static str,
    },
    /// The requested key path could not be followed
    #[error("response envelope could not be unwrapped")]
    Extract(#[from] ExtractError),
}

/// A shape that a response body can be decoded into
pub trait FromResponse: Sized {
    /// Decodes the raw body
    fn from_body(body: Bytes) -> Result<Self, DecodeError> {
        Self::from_value(serde_json::from_slice(&body)?)
    }

    /// Decodes an already-parsed JSON value
    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

impl FromResponse for Bytes {
    fn from_body(body: Bytes) -> Result<Self, DecodeError> {
        Ok(body)
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(Bytes::from(serde_json::to_vec(&value)?))
    }
}

impl FromResponse for () {
    fn from_body(_: Bytes) -> Result<Self, DecodeError> {
        Ok(())
    }

    fn from_value(_: Value) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl FromResponse for Value {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl FromResponse for Map<String, Value> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(DecodeError::WrongShape { expected: "object" }),
        }
    }
}

impl FromResponse for Vec<Value> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Array(items) => Ok(items),
            _ => Err(DecodeError::WrongShape { expected: "array" }),
        }
    }
}

/// A typed record, deserialized with `serde`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwraps the record
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> FromResponse for Json<T> {
    fn from_body(body: Bytes) -> Result<Self, DecodeError> {
        Ok(Json(serde_json::from_slice(&body)?))
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(Json(serde_json::from_value(value)?))
    }
}

/// Decodes `body` into `R`, first descending into `key_path` if one is given
///
/// An absent value at `key_path` decodes as JSON `null`, so that optional
/// records can be expressed as `Json<Option<T>>`.
pub fn decode<R: FromResponse>(body: Bytes, key_path: Option<&str>) -> Result<R, DecodeError> {
    match key_path {
        None => R::from_body(body),
        Some(path) => {
            let mut root: Value = serde_json::from_slice(&body)?;
            let found = extract(&root, path)?.is_some();
            let value = if found {
                take_path(&mut root, path)
            } else {
                Value::Null
            };
            R::from_value(value)
        }
    }
}

fn take_path(root: &mut Value, path: &str) -> Value {
    if path.is_empty() {
        return root.take();
    }

    let mut current = root;
    for key in path.split('.') {
        current = match current.get_mut(key) {
            Some(next) => next,
            None => return Value::Null,
        };
    }
    current.take()
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    mod extract {
        use super::*;

        #[test]
        fn follows_nested_objects() {
            let json = json!({"data": {"profile": {"name": "a"}}});
            assert_eq!(
                extract(&json, "data.profile").unwrap(),
                Some(&json!({"name": "a"}))
            );
        }

        #[test]
        fn missing_intermediate_key_is_absent() {
            let json = json!({"data": {"profile": {"name": "a"}}});
            assert_eq!(extract(&json, "data.missing.x").unwrap(), None);
        }

        #[test]
        fn descending_into_a_scalar_is_an_error() {
            let json = json!({"data": {"count": 3}});
            assert_eq!(
                extract(&json, "data.count.value"),
                Err(ExtractError::NotAnObject {
                    key: "data.count".to_owned()
                })
            );
        }

        #[test]
        fn non_object_root_is_an_error() {
            assert_eq!(
                extract(&json!([1, 2]), "data"),
                Err(ExtractError::NotAnObject { key: String::new() })
            );
        }

        #[test]
        fn empty_path_is_the_root() {
            let json = json!(5);
            assert_eq!(extract(&json, "").unwrap(), Some(&json));
        }

        #[test]
        fn required_path_reports_the_missing_key() {
            let json = json!({"data": {}});
            assert_eq!(
                extract_required(&json, "data.value"),
                Err(ExtractError::MissingKey {
                    key: "data.value".to_owned()
                })
            );
        }
    }

    mod decode {
        use super::*;

        #[derive(Debug, Deserialize, PartialEq)]
        struct Profile {
            name: String,
        }

        fn body(value: Value) -> Bytes {
            Bytes::from(value.to_string())
        }

        #[test]
        fn raw_bytes_pass_through_unparsed() {
            let raw = Bytes::from_static(b"not json");
            let decoded: Bytes = decode(raw.clone(), None).unwrap();
            assert_eq!(decoded, raw);
        }

        #[test]
        fn typed_record_under_key_path() {
            let decoded: Json<Profile> = decode(
                body(json!({"data": {"profile": {"name": "a"}}})),
                Some("data.profile"),
            )
            .unwrap();
            assert_eq!(decoded.into_inner(), Profile { name: "a".into() });
        }

        #[test]
        fn missing_required_field_is_an_error() {
            let result: Result<Json<Profile>, _> = decode(body(json!({"nickname": "a"})), None);
            assert!(matches!(result, Err(DecodeError::Json(_))));
        }

        #[test]
        fn array_shape_rejects_objects() {
            let result: Result<Vec<Value>, _> = decode(body(json!({"docs": []})), None);
            assert!(matches!(
                result,
                Err(DecodeError::WrongShape { expected: "array" })
            ));
        }

        #[test]
        fn array_shape_under_key_path() {
            let decoded: Vec<Value> =
                decode(body(json!({"docs": [1, 2, 3]})), Some("docs")).unwrap();
            assert_eq!(decoded, vec![json!(1), json!(2), json!(3)]);
        }

        #[test]
        fn absent_key_path_decodes_as_null() {
            let decoded: Json<Option<Profile>> =
                decode(body(json!({"data": {}})), Some("data.profile")).unwrap();
            assert_eq!(decoded.into_inner(), None);
        }

        #[test]
        fn empty_key_path_decodes_the_whole_body() {
            let decoded: Value = decode(body(json!({"data": 1})), Some("")).unwrap();
            assert_eq!(decoded, json!({"data": 1}));
        }

        #[test]
        fn unit_ignores_the_body() {
            decode::<()>(Bytes::from_static(b""), None).unwrap();
        }
    }
}
