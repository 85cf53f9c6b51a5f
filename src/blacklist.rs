use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Substring,
    Prefix,
    Exact,
    Regex,
}

/// What to do with a URL that cannot be parsed as an absolute URL with a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedUrlPolicy {
    /// Check the raw text against the patterns like any other URL.
    #[default]
    FailOpen,
    /// Treat every malformed URL as blacklisted.
    FailClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlacklistEntry {
    pub pattern: String,
    #[serde(default)]
    pub mode: MatchMode,
}

impl BlacklistEntry {
    pub fn new(pattern: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
        }
    }
}

#[derive(Debug)]
enum Rule {
    Substring(String),
    Prefix(String),
    Exact(String),
    Regex(Regex),
}

impl Rule {
    fn matches(&self, folded: &str) -> bool {
        match self {
            Rule::Substring(p) => folded.contains(p.as_str()),
            Rule::Prefix(p) => {
                folded.starts_with(p.as_str())
                    || strip_scheme(folded).is_some_and(|rest| rest.starts_with(p.as_str()))
            }
            Rule::Exact(p) => folded == p,
            Rule::Regex(re) => re.is_match(folded),
        }
    }
}

fn strip_scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(_, rest)| rest)
}

/// Deny-list of stream URL patterns, built once per run from configuration.
#[derive(Debug, Default)]
pub struct Blacklist {
    rules: Vec<Rule>,
    malformed: MalformedUrlPolicy,
}

impl Blacklist {
    pub fn new(entries: &[BlacklistEntry], malformed: MalformedUrlPolicy) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(entries.len());
        for entry in entries {
            let pattern = entry.pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            let folded = pattern.to_lowercase();
            let rule = match entry.mode {
                MatchMode::Substring => Rule::Substring(folded),
                MatchMode::Prefix => Rule::Prefix(folded),
                MatchMode::Exact => Rule::Exact(folded),
                MatchMode::Regex => {
                    let re = RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|source| ConfigError::BlacklistRegex {
                            pattern: pattern.to_string(),
                            source,
                        })?;
                    Rule::Regex(re)
                }
            };
            rules.push(rule);
        }
        Ok(Self { rules, malformed })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        let url = url.trim();
        if self.malformed == MalformedUrlPolicy::FailClosed && !is_well_formed(url) {
            return true;
        }
        let folded = url.to_lowercase();
        self.rules.iter().any(|rule| rule.matches(&folded))
    }
}

fn is_well_formed(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}
