//! Match predicate for page navigations.

use cachet_types::{Error, RequestMode, Result};
use regex::Regex;
use tracing::debug;

use crate::route::{MatchContext, MatchResult, RouteMatch, RouteMatcher};

/// Matches navigation requests whose path and query pass the allow and deny
/// lists. An empty allowlist allows everything; the denylist wins.
#[derive(Debug, Clone, Default)]
pub struct NavigationMatcher {
    allowlist: Vec<Regex>,
    denylist: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p)
                .map_err(|e| Error::InvalidRoute(format!("invalid navigation pattern '{p}': {e}")))
        })
        .collect()
}

impl NavigationMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowlist(mut self, patterns: &[&str]) -> Result<Self> {
        self.allowlist = compile(patterns)?;
        Ok(self)
    }

    pub fn with_denylist(mut self, patterns: &[&str]) -> Result<Self> {
        self.denylist = compile(patterns)?;
        Ok(self)
    }
}

impl RouteMatcher for NavigationMatcher {
    fn matches(&self, ctx: &MatchContext<'_>) -> MatchResult {
        if ctx.request.mode() != RequestMode::Navigate {
            return None;
        }

        let target = match ctx.url.query() {
            Some(query) => format!("{}?{}", ctx.url.path(), query),
            None => ctx.url.path().to_string(),
        };

        if let Some(denied) = self.denylist.iter().find(|re| re.is_match(&target)) {
            debug!(path = %target, pattern = %denied, "navigation denied");
            return None;
        }

        if self.allowlist.is_empty() || self.allowlist.iter().any(|re| re.is_match(&target)) {
            return Some(RouteMatch::Matched);
        }

        debug!(path = %target, "navigation not in allowlist");
        None
    }
}
