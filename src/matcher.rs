use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::normalize::normalize_name;
use crate::source::ChannelRecord;
use crate::template::{Template, TemplateEntry};

/// What happens to a template channel for which no source offered a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Keep the channel with no URLs so gaps in the template stay visible.
    #[default]
    Emit,
    Omit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Upper bound on lines per channel; 0 means unlimited.
    pub max_lines: usize,
    pub unmatched: UnmatchedPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_lines: 10,
            unmatched: UnmatchedPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedChannel {
    pub category: String,
    pub channel_name: String,
    pub urls: Vec<String>,
}

impl ResolvedChannel {
    pub fn is_matched(&self) -> bool {
        !self.urls.is_empty()
    }

    /// Label of the line at `index` (0-based). The primary line has none.
    pub fn line_label(&self, index: usize) -> Option<String> {
        (index > 0).then(|| format!("线路 {}", index + 1))
    }
}

/// One template category with its resolved channels. Kept even when
/// `channels` is empty so the category still shows up in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCategory {
    pub name: String,
    pub channels: Vec<ResolvedChannel>,
}

/// Joins template channels with source records by normalized name.
///
/// Output follows template order. URLs keep the order in which records were
/// seen, first under the display name and then under each alias; repeated
/// URLs are kept once and the list is capped at `max_lines`.
pub fn match_channels(
    template: &Template,
    records: &[ChannelRecord],
    config: &MatchConfig,
) -> Vec<ResolvedChannel> {
    match_categories(template, records, config)
        .into_iter()
        .flat_map(|c| c.channels)
        .collect()
}

/// Same join as [`match_channels`], grouped by template category. Every
/// category appears exactly once, in template order.
pub fn match_categories(
    template: &Template,
    records: &[ChannelRecord],
    config: &MatchConfig,
) -> Vec<ResolvedCategory> {
    let mut by_name: HashMap<String, Vec<&str>> = HashMap::new();
    for record in records {
        by_name
            .entry(normalize_name(&record.name))
            .or_default()
            .push(record.url.as_str());
    }

    let cap = if config.max_lines == 0 {
        usize::MAX
    } else {
        config.max_lines
    };

    let mut resolved = Vec::with_capacity(template.categories.len());
    for category in &template.categories {
        let mut channels = Vec::with_capacity(category.channels.len());
        for entry in &category.channels {
            let urls = collect_urls(entry, &by_name, cap);
            if urls.is_empty() && config.unmatched == UnmatchedPolicy::Omit {
                continue;
            }
            channels.push(ResolvedChannel {
                category: entry.category.clone(),
                channel_name: entry.channel_name.clone(),
                urls,
            });
        }
        resolved.push(ResolvedCategory {
            name: category.name.clone(),
            channels,
        });
    }
    resolved
}

fn collect_urls(
    entry: &TemplateEntry,
    by_name: &HashMap<String, Vec<&str>>,
    cap: usize,
) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut urls: Vec<String> = Vec::new();
    let mut keys: HashSet<String> = HashSet::new();

    'names: for name in entry.names() {
        let key = normalize_name(name);
        if !keys.insert(key.clone()) {
            continue;
        }
        let Some(group) = by_name.get(&key) else {
            continue;
        };
        for url in group {
            if urls.len() >= cap {
                break 'names;
            }
            if seen.insert(*url) {
                urls.push((*url).to_string());
            }
        }
    }
    urls
}
