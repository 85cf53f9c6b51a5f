use std::path::Path;

use crate::error::TemplateError;

/// A channel slot in the template. `aliases` are extra names that should
/// match the same slot; `channel_name` is what gets displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub category: String,
    pub channel_name: String,
    pub aliases: Vec<String>,
}

impl TemplateEntry {
    /// The display name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.channel_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub channels: Vec<TemplateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    pub categories: Vec<Category>,
}

impl Template {
    pub fn entries(&self) -> impl Iterator<Item = &TemplateEntry> {
        self.categories.iter().flat_map(|c| c.channels.iter())
    }

    pub fn channel_count(&self) -> usize {
        self.categories.iter().map(|c| c.channels.len()).sum()
    }
}

fn category_header(line: &str) -> Option<&str> {
    if let Some(name) = line.strip_suffix("#genre#") {
        let name = name.trim_end();
        return Some(name.strip_suffix(',').unwrap_or(name).trim());
    }
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

/// Parses the category/channel template.
///
/// Headers are `Name,#genre#` or `[Name]`; every other non-blank line until
/// the next header is a channel. A channel line may carry `|`-separated
/// aliases, and anything after a comma is ignored so that a TXT playlist can
/// be used as a template directly.
pub fn load_template(raw: &str) -> Result<Template, TemplateError> {
    let raw = raw.trim_start_matches('\u{feff}');
    let mut categories: Vec<Category> = Vec::new();

    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        if let Some(name) = category_header(line) {
            if name.is_empty() {
                return Err(TemplateError::EmptyCategoryName { line: line_no });
            }
            categories.push(Category {
                name: name.to_string(),
                channels: Vec::new(),
            });
            continue;
        }

        let cell = line.split(',').next().unwrap_or(line);
        let mut names = cell
            .split('|')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let Some(channel_name) = names.next() else {
            continue;
        };
        let aliases: Vec<String> = names.collect();

        let Some(category) = categories.last_mut() else {
            return Err(TemplateError::ChannelOutsideCategory {
                line: line_no,
                name: channel_name,
            });
        };
        category.channels.push(TemplateEntry {
            category: category.name.clone(),
            channel_name,
            aliases,
        });
    }

    if categories.is_empty() {
        return Err(TemplateError::Empty);
    }
    Ok(Template { categories })
}

pub fn load_template_file(path: &Path) -> Result<Template, TemplateError> {
    let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_template(&raw)
}
