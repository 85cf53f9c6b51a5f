use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::de::Deserializer;
use serde::Deserialize;

use crate::blacklist::{Blacklist, BlacklistEntry, MalformedUrlPolicy, MatchMode};
use crate::error::ConfigError;
use crate::matcher::MatchConfig;
use crate::output::OutputOptions;
use crate::pipeline::{Announcement, Pipeline};
use crate::source::SourceFormat;

const ENV_PREFIX: &str = "LIVELIST";

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub template: TemplateSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default)]
    pub blacklist: BlacklistSettings,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub announcements: Vec<Announcement>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateSettings {
    #[serde(default = "default_template_path")]
    pub path: PathBuf,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            path: default_template_path(),
        }
    }
}

fn default_template_path() -> PathBuf {
    PathBuf::from("template.txt")
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceSettings {
    #[serde(default, alias = "url", deserialize_with = "deserialize_one_or_many")]
    pub urls: Vec<SourceLocation>,
}

/// A source given either as a bare URL/path or as `{ url, format }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SourceLocation {
    Plain(String),
    Detailed {
        url: String,
        #[serde(default)]
        format: Option<SourceFormat>,
    },
}

impl SourceLocation {
    pub fn url(&self) -> &str {
        match self {
            SourceLocation::Plain(url) => url,
            SourceLocation::Detailed { url, .. } => url,
        }
    }

    pub fn format(&self) -> Option<SourceFormat> {
        match self {
            SourceLocation::Plain(_) => None,
            SourceLocation::Detailed { format, .. } => *format,
        }
    }
}

fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<SourceLocation>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(SourceLocation),
        Many(Vec<SourceLocation>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlacklistSettings {
    pub patterns: Vec<PatternSetting>,
    /// Mode for patterns that don't name their own.
    pub mode: MatchMode,
    pub malformed_url: MalformedUrlPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatternSetting {
    Plain(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        mode: Option<MatchMode>,
    },
}

impl BlacklistSettings {
    pub fn entries(&self) -> Vec<BlacklistEntry> {
        self.patterns
            .iter()
            .map(|p| match p {
                PatternSetting::Plain(pattern) => BlacklistEntry::new(pattern.clone(), self.mode),
                PatternSetting::Detailed { pattern, mode } => {
                    BlacklistEntry::new(pattern.clone(), mode.unwrap_or(self.mode))
                }
            })
            .collect()
    }

    pub fn build(&self) -> Result<Blacklist, ConfigError> {
        Blacklist::new(&self.entries(), self.malformed_url)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub m3u_filename: String,
    pub txt_filename: String,
    pub logo_base_url: Option<String>,
    pub epg_urls: Vec<String>,
    pub label_lines: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        let options = OutputOptions::default();
        Self {
            dir: PathBuf::from("output"),
            m3u_filename: "live.m3u".to_string(),
            txt_filename: "live.txt".to_string(),
            logo_base_url: options.logo_base_url,
            epg_urls: options.epg_urls,
            label_lines: options.label_lines,
        }
    }
}

impl OutputSettings {
    pub fn options(&self) -> OutputOptions {
        OutputOptions {
            logo_base_url: self.logo_base_url.clone().filter(|s| !s.is_empty()),
            epg_urls: self.epg_urls.clone(),
            label_lines: self.label_lines,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            user_agent: format!("livelist/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Settings {
    /// Reads the TOML file at `path`, then applies `LIVELIST__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn pipeline(&self) -> Result<Pipeline, ConfigError> {
        Ok(Pipeline {
            blacklist: self.blacklist.build()?,
            match_config: self.matching,
            output: self.output.options(),
            announcements: self.announcements.clone(),
        })
    }
}
