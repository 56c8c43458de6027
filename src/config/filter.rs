use std::collections::BTreeSet;

use regex::Regex;
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

// ---------------------------------------------------------------------------
// Glob patterns over qualified statistic names
// ---------------------------------------------------------------------------

/// Compile a glob into an anchored-prefix regex: `*` matches any run of
/// characters, everything else is literal. `mod.A` therefore also matches
/// `mod.A.std` and `mod.AB.std`.
pub fn glob_to_regex(pattern: &str) -> ConfigResult<Regex> {
    let source = format!("^{}", regex::escape(pattern).replace("\\*", ".*"));
    Regex::new(&source).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Restricts a reducer to the statistics whose qualified names match one of
/// its patterns.
///
/// `matched` is only as fresh as the last [`StatisticFilter::resolve`] call.
#[derive(Debug, Clone)]
pub struct StatisticFilter {
    patterns: Vec<String>,
    regexes: Vec<Regex>,
    matched: BTreeSet<String>,
}

impl StatisticFilter {
    pub fn new<I, S>(patterns: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let regexes = patterns
            .iter()
            .map(|p| glob_to_regex(p))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self {
            patterns,
            regexes,
            matched: BTreeSet::new(),
        })
    }

    /// Read a `Statistics:` entry: a whitespace-separated string or a list of
    /// strings. `None` when the entry is null or empty.
    pub fn from_value(value: &Value, context: &str) -> ConfigResult<Option<Self>> {
        let invalid = || ConfigError::InvalidSection {
            context: context.to_string(),
            expected: "a string or a list of strings",
        };
        let patterns: Vec<String> = match value {
            Value::Null => return Ok(None),
            Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
            Value::Sequence(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
                .collect::<ConfigResult<_>>()?,
            _ => return Err(invalid()),
        };
        if patterns.is_empty() {
            return Ok(None);
        }
        Self::new(patterns).map(Some)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regexes.iter().any(|re| re.is_match(name))
    }

    /// Recompute the matched set against the currently registered statistics.
    pub fn resolve<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let matched = names
            .into_iter()
            .filter(|name| self.matches(name))
            .map(str::to_string)
            .collect();
        self.matched = matched;
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matched(&self) -> &BTreeSet<String> {
        &self.matched
    }

    pub fn contains(&self, name: &str) -> bool {
        self.matched.contains(name)
    }
}
