use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use serde::Serialize;

/// A description of a single call to the portal
///
/// A request is described independently of any particular HTTP library. It is
/// cloned each time the call is dispatched, so that a call rejected for an expired
/// credential can be replayed verbatim.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    method: Method,
    url: Url,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
}

impl RequestSpec {
    /// Constructs a spec for `method` on `url`
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Constructs a `GET` spec
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Constructs a `PUT` spec
    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Constructs a `POST` spec
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Constructs a `DELETE` spec
    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Appends a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends a query parameter if `value` is present
    pub fn with_optional_query(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    /// Adds an extra header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a JSON body
    pub fn with_json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` as the JSON body
    pub fn with_body<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with_json_body(serde_json::to_value(body)?))
    }

    /// The method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL, without query parameters added through [`with_query()`][Self::with_query()]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The query parameters, in insertion order
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// The extra headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The extra headers, for modification
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The JSON body, if any
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// The URL with all query parameters appended
    pub fn full_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        url
    }
}
