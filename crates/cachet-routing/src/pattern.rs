//! Regular-expression match predicate.

use cachet_types::{Error, Result};
use regex::Regex;
use tracing::debug;

use crate::route::{MatchContext, MatchResult, RouteMatch, RouteMatcher};

/// Matches the full URL against a regular expression.
///
/// Same-origin URLs match anywhere in the string. Cross-origin URLs only match
/// when the match starts at the beginning of the URL, so a pattern written for
/// local paths does not catch third-party URLs that happen to contain it.
/// Capture groups become positional parameters; groups that did not take part
/// in the match are empty strings.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidRoute(format!("invalid pattern '{pattern}': {e}")))?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl From<Regex> for RegexMatcher {
    fn from(regex: Regex) -> Self {
        Self { regex }
    }
}

impl RouteMatcher for RegexMatcher {
    fn matches(&self, ctx: &MatchContext<'_>) -> MatchResult {
        let url = ctx.url.as_str();
        let captures = self.regex.captures(url)?;
        let whole = captures.get(0)?;

        if !ctx.same_origin && whole.start() != 0 {
            debug!(
                pattern = %self.regex,
                url,
                "pattern matched cross-origin URL away from its start; ignoring"
            );
            return None;
        }

        let values = captures
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        Some(RouteMatch::Captures(values))
    }
}
