use std::fmt;

use predicates::{reflection, Predicate};

use crate::RequestSpec;

/// Attach the access token to every request
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyRequest;

impl Predicate<RequestSpec> for AnyRequest {
    #[inline]
    fn eval(&self, _: &RequestSpec) -> bool {
        true
    }

    fn find_case(&self, expected: bool, _: &RequestSpec) -> Option<reflection::Case> {
        if expected {
            None
        } else {
            Some(reflection::Case::new(Some(self), true))
        }
    }
}

impl reflection::PredicateReflection for AnyRequest {}
impl fmt::Display for AnyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any request")
    }
}

/// Attach the access token only to calls that leave over TLS
///
/// Useful when a gateway is pointed at a mix of portal hosts and plain-HTTP
/// local services, so the token is never sent in the clear.
#[derive(Clone, Copy, Debug)]
pub struct HttpsOnly;

impl Predicate<RequestSpec> for HttpsOnly {
    #[inline]
    fn eval(&self, spec: &RequestSpec) -> bool {
        spec.url().scheme() == "https"
    }

    fn find_case(&self, expected: bool, spec: &RequestSpec) -> Option<reflection::Case> {
        let sent_over_tls = self.eval(spec);
        (sent_over_tls != expected).then(|| {
            reflection::Case::new(Some(self), sent_over_tls).add_product(
                reflection::Product::new("url", spec.url().to_string()),
            )
        })
    }
}

impl reflection::PredicateReflection for HttpsOnly {}
impl fmt::Display for HttpsOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sent over https")
    }
}
