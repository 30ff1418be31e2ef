//! `Origin` allow-list for `WebSocket` upgrades.

use std::collections::BTreeMap;

use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, HeaderValue};
use tracing::{info, warn};

use crate::error::GatewayError;

/// Decides which browser origins may open a connection.
///
/// A request without an `Origin` header is refused. An origin is allowed
/// only when it is listed and mapped to `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: BTreeMap<String, bool>,
}

impl OriginPolicy {
    /// Build a policy from an origin -> allowed map.
    pub const fn new(allowed: BTreeMap<String, bool>) -> Self {
        Self { allowed }
    }

    /// Whether `origin` is allowed.
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed.get(origin).copied().unwrap_or(false)
    }

    /// Origins mapped to `true`.
    pub fn allowed_origins(&self) -> impl Iterator<Item = &str> {
        self.allowed
            .iter()
            .filter(|(_, allowed)| **allowed)
            .map(|(origin, _)| origin.as_str())
    }

    /// The allowed origins as header values, for the CORS layer.
    ///
    /// Entries that are not valid header values are skipped with a warning.
    pub fn header_values(&self) -> Vec<HeaderValue> {
        self.allowed_origins()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(origin, error = %e, "Ignoring origin that is not a valid header value");
                    None
                }
            })
            .collect()
    }

    /// Check the `Origin` header of an upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OriginRejected`] when the header is missing,
    /// not text, or not allowed.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        let Some(value) = headers.get(ORIGIN) else {
            warn!("Upgrade refused: no Origin header");
            return Err(GatewayError::OriginRejected(String::from("<missing>")));
        };
        let Ok(origin) = value.to_str() else {
            warn!("Upgrade refused: Origin header is not text");
            return Err(GatewayError::OriginRejected(String::from("<invalid>")));
        };

        let allowed = self.allows(origin);
        info!(origin, allowed, "Checking origin");
        if allowed {
            Ok(())
        } else {
            Err(GatewayError::OriginRejected(origin.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> OriginPolicy {
        OriginPolicy::new(BTreeMap::from([
            (String::from("http://localhost:3000"), true),
            (String::from("http://old.example"), false),
        ]))
    }

    fn headers(origin: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(origin) = origin {
            headers.insert(ORIGIN, HeaderValue::from_static(origin));
        }
        headers
    }

    #[test]
    fn listed_origin_is_allowed() {
        assert!(policy().check(&headers(Some("http://localhost:3000"))).is_ok());
    }

    #[test]
    fn missing_origin_is_refused() {
        assert!(matches!(
            policy().check(&headers(None)),
            Err(GatewayError::OriginRejected(_))
        ));
    }

    #[test]
    fn unknown_and_disabled_origins_are_refused() {
        assert!(policy().check(&headers(Some("http://evil.test"))).is_err());
        assert!(policy().check(&headers(Some("http://old.example"))).is_err());
        assert!(policy().check(&headers(Some(""))).is_err());
    }

    #[test]
    fn cors_values_only_include_enabled_origins() {
        let values = policy().header_values();
        assert_eq!(values, vec![HeaderValue::from_static("http://localhost:3000")]);
    }
}
