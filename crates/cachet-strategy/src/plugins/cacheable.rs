//! `cacheWillUpdate` filters deciding which responses may be cached.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cachet_types::{Error, Request, Response, Result};
use tracing::debug;

use crate::handler::StrategyHandler;
use crate::plugin::{Plugin, PluginHook};

/// Cacheability rule: a response is cacheable when its status is one of
/// `statuses` (if any are given) and at least one of `headers` matches (if
/// any are given).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableResponse {
    statuses: Vec<u16>,
    headers: BTreeMap<String, String>,
}

impl CacheableResponse {
    pub fn new(statuses: Vec<u16>, headers: BTreeMap<String, String>) -> Result<Self> {
        if statuses.is_empty() && headers.is_empty() {
            return Err(Error::InvalidConfig(
                "cacheable response rule needs at least one status or header".to_string(),
            ));
        }
        Ok(Self { statuses, headers })
    }

    pub fn from_statuses(statuses: impl IntoIterator<Item = u16>) -> Result<Self> {
        Self::new(statuses.into_iter().collect(), BTreeMap::new())
    }

    pub fn is_response_cacheable(&self, response: &Response) -> bool {
        let mut cacheable = true;

        if !self.statuses.is_empty() {
            cacheable = self.statuses.contains(&response.status());
        }

        if cacheable && !self.headers.is_empty() {
            cacheable = self
                .headers
                .iter()
                .any(|(name, value)| response.header_str(name.as_str()) == Some(value.as_str()));
        }

        cacheable
    }
}

/// Plugin form of [`CacheableResponse`].
#[derive(Debug, Clone)]
pub struct CacheableResponsePlugin {
    rule: CacheableResponse,
}

impl CacheableResponsePlugin {
    pub fn new(rule: CacheableResponse) -> Self {
        Self { rule }
    }
}

#[async_trait]
impl Plugin for CacheableResponsePlugin {
    fn name(&self) -> &str {
        "cacheable-response"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        _handler: &StrategyHandler,
        request: &Request,
        response: Response,
    ) -> Result<Option<Response>> {
        if self.rule.is_response_cacheable(&response) {
            Ok(Some(response))
        } else {
            debug!(
                url = %request.url(),
                status = response.status(),
                "response does not meet cacheability criteria"
            );
            Ok(None)
        }
    }
}

/// Keeps `200` and opaque responses. Added implicitly to strategies that
/// need to cache cross-origin responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOkAndOpaque;

#[async_trait]
impl Plugin for CacheOkAndOpaque {
    fn name(&self) -> &str {
        "cache-ok-and-opaque"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
        response: Response,
    ) -> Result<Option<Response>> {
        if response.status() == 200 || response.is_opaque() {
            Ok(Some(response))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachet_types::{HeaderValue, header};

    #[test]
    fn test_rule_requires_criteria() {
        assert!(matches!(
            CacheableResponse::new(vec![], BTreeMap::new()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_status_rule() {
        let rule = CacheableResponse::from_statuses([0, 200]).unwrap();
        assert!(rule.is_response_cacheable(&Response::ok("x")));
        assert!(rule.is_response_cacheable(&Response::opaque()));
        assert!(!rule.is_response_cacheable(&Response::new(404, "missing")));
    }

    #[test]
    fn test_header_rule_any_match() {
        let mut headers = BTreeMap::new();
        headers.insert("x-cache".to_string(), "yes".to_string());
        headers.insert("cache-control".to_string(), "public".to_string());
        let rule = CacheableResponse::new(vec![200], headers).unwrap();

        let tagged = Response::ok("x").with_header(
            header::HeaderName::from_static("x-cache"),
            HeaderValue::from_static("yes"),
        );
        assert!(rule.is_response_cacheable(&tagged));
        assert!(!rule.is_response_cacheable(&Response::ok("x")));

        let wrong_status = Response::new(500, "x").with_header(
            header::HeaderName::from_static("x-cache"),
            HeaderValue::from_static("yes"),
        );
        assert!(!rule.is_response_cacheable(&wrong_status));
    }
}
