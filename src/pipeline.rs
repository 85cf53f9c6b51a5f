use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::blacklist::Blacklist;
use crate::matcher::{match_categories, MatchConfig, ResolvedCategory, ResolvedChannel};
use crate::output::{format_m3u, format_txt_sections, OutputOptions};
use crate::source::{self, ChannelRecord, RecordIssueKind, SourceFormat};
use crate::template::Template;

/// Raw text of one fetched source. `format` is `None` when it should be detected.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub origin: String,
    pub format: Option<SourceFormat>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnouncementEntry {
    pub name: String,
    pub url: String,
}

/// A fixed group placed ahead of the template channels, e.g. an "updated at" notice.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Announcement {
    pub category: String,
    #[serde(default)]
    pub entries: Vec<AnnouncementEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub origin: String,
    pub format: Option<SourceFormat>,
    pub records: usize,
    pub malformed: usize,
    pub invalid_url: usize,
    pub blacklisted: usize,
}

impl SourceReport {
    pub fn dropped(&self) -> usize {
        self.malformed + self.invalid_url + self.blacklisted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub records: usize,
    pub malformed: usize,
    pub invalid_url: usize,
    pub blacklisted: usize,
    pub channels_resolved: usize,
    pub channels_unmatched: usize,
    pub unmatched: Vec<String>,
    pub lines_emitted: usize,
}

impl RunReport {
    pub fn dropped(&self) -> usize {
        self.malformed + self.invalid_url + self.blacklisted
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub resolved: Vec<ResolvedChannel>,
    pub m3u: String,
    pub txt: String,
    pub report: RunReport,
}

/// Everything one run needs besides its inputs. Built once from settings.
#[derive(Debug, Default)]
pub struct Pipeline {
    pub blacklist: Blacklist,
    pub match_config: MatchConfig,
    pub output: OutputOptions,
    pub announcements: Vec<Announcement>,
}

impl Pipeline {
    /// parse -> match -> format. Per-record problems only reduce coverage and
    /// are counted in the report.
    pub fn run(&self, template: &Template, sources: &[SourceText]) -> RunOutput {
        let mut report = RunReport::default();
        let mut records: Vec<ChannelRecord> = Vec::new();

        for src in sources {
            let format = src.format.unwrap_or_else(|| SourceFormat::detect(&src.text));
            let outcome = source::parse(&src.text, format, &self.blacklist);
            let source_report = SourceReport {
                origin: src.origin.clone(),
                format: Some(format),
                records: outcome.records.len(),
                malformed: outcome.count(RecordIssueKind::Malformed),
                invalid_url: outcome.count(RecordIssueKind::InvalidUrl),
                blacklisted: outcome.count(RecordIssueKind::Blacklisted),
            };
            info!(
                "Parsed source: origin={} format={} records={} dropped={}",
                source_report.origin,
                format,
                source_report.records,
                source_report.dropped()
            );
            if source_report.records == 0 {
                warn!("Source produced no usable records: origin={}", src.origin);
            }

            report.records += source_report.records;
            report.malformed += source_report.malformed;
            report.invalid_url += source_report.invalid_url;
            report.blacklisted += source_report.blacklisted;
            report.sources.push(source_report);
            records.extend(outcome.records);
        }

        let categories = match_categories(template, &records, &self.match_config);
        let matched: Vec<ResolvedChannel> = categories
            .iter()
            .flat_map(|category| category.channels.iter().cloned())
            .collect();
        for channel in &matched {
            if channel.is_matched() {
                report.channels_resolved += 1;
                report.lines_emitted += channel.urls.len();
            } else {
                debug!(
                    "No stream for template channel: category={} channel={}",
                    channel.category, channel.channel_name
                );
            }
        }
        // Omitted channels never reach `matched`, so count against the template.
        report.unmatched = unmatched_names(template, &matched);
        report.channels_unmatched = report.unmatched.len();

        let mut sections = self.announcement_sections();
        sections.extend(categories);
        let resolved: Vec<ResolvedChannel> = sections
            .iter()
            .flat_map(|section| section.channels.iter().cloned())
            .collect();

        let m3u = format_m3u(&resolved, &self.output);
        // TXT keeps a header for every template category, even an empty one.
        let txt = format_txt_sections(&sections, &self.output);

        info!(
            "Run complete: resolved={} unmatched={} lines={} records={} dropped={}",
            report.channels_resolved,
            report.channels_unmatched,
            report.lines_emitted,
            report.records,
            report.dropped()
        );

        RunOutput {
            resolved,
            m3u,
            txt,
            report,
        }
    }

    fn announcement_sections(&self) -> Vec<ResolvedCategory> {
        self.announcements
            .iter()
            .map(|group| ResolvedCategory {
                name: group.category.clone(),
                channels: group
                    .entries
                    .iter()
                    .map(|entry| ResolvedChannel {
                        category: group.category.clone(),
                        channel_name: entry.name.clone(),
                        urls: vec![entry.url.clone()],
                    })
                    .collect(),
            })
            .collect()
    }
}

fn unmatched_names(template: &Template, matched: &[ResolvedChannel]) -> Vec<String> {
    let mut resolved = matched.iter().filter(|c| c.is_matched()).peekable();
    let mut names = Vec::new();
    for entry in template.entries() {
        let hit = resolved.peek().is_some_and(|c| {
            c.category == entry.category && c.channel_name == entry.channel_name
        });
        if hit {
            resolved.next();
        } else {
            names.push(format!("{}/{}", entry.category, entry.channel_name));
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::{BlacklistEntry, MalformedUrlPolicy, MatchMode};
    use crate::matcher::UnmatchedPolicy;
    use crate::template::load_template;

    fn txt_source(origin: &str, text: &str) -> SourceText {
        SourceText {
            origin: origin.to_string(),
            format: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_report_counts() {
        let template = load_template("[A]\nX\nY\nZ\n").unwrap();
        let pipeline = Pipeline {
            blacklist: Blacklist::new(
                &[BlacklistEntry::new("bad.example.com", MatchMode::Substring)],
                MalformedUrlPolicy::FailOpen,
            )
            .unwrap(),
            ..Pipeline::default()
        };
        let sources = vec![
            txt_source("one", "X,http://x.example.com/1\nbroken\nY,ftp://y.example.com/1\n"),
            txt_source(
                "two",
                "#EXTM3U\n#EXTINF:-1,X\nhttp://x.example.com/2\n#EXTINF:-1,Z\nhttp://bad.example.com/z\n",
            ),
        ];
        let out = pipeline.run(&template, &sources);
        let r = &out.report;

        assert_eq!(r.sources.len(), 2);
        assert_eq!(r.sources[0].format, Some(SourceFormat::Txt));
        assert_eq!(r.sources[1].format, Some(SourceFormat::M3u));
        assert_eq!(r.records, 2);
        assert_eq!(r.malformed, 1);
        assert_eq!(r.invalid_url, 1);
        assert_eq!(r.blacklisted, 1);
        assert_eq!(r.dropped(), 3);
        assert_eq!(r.channels_resolved, 1);
        assert_eq!(r.channels_unmatched, 2);
        assert_eq!(r.unmatched, vec!["A/Y", "A/Z"]);
        assert_eq!(r.lines_emitted, 2);
    }

    #[test]
    fn test_unmatched_counted_when_omitted() {
        let template = load_template("[A]\nX\nY\n").unwrap();
        let pipeline = Pipeline {
            match_config: MatchConfig {
                unmatched: UnmatchedPolicy::Omit,
                ..MatchConfig::default()
            },
            ..Pipeline::default()
        };
        let out = pipeline.run(&template, &[txt_source("s", "Y,http://y.example.com/1\n")]);
        assert_eq!(out.resolved.len(), 1);
        assert_eq!(out.report.unmatched, vec!["A/X"]);
        assert!(!out.txt.contains("X,"));
        assert!(!out.m3u.contains(",X\n"));
    }

    #[test]
    fn test_announcements_come_first() {
        let template = load_template("[A]\nX\n").unwrap();
        let pipeline = Pipeline {
            announcements: vec![Announcement {
                category: "系统公告".to_string(),
                entries: vec![AnnouncementEntry {
                    name: "每日自动更新".to_string(),
                    url: "https://notice.example.com/update.png".to_string(),
                }],
            }],
            ..Pipeline::default()
        };
        let out = pipeline.run(&template, &[txt_source("s", "X,http://x.example.com/1\n")]);
        assert!(out.txt.starts_with("系统公告,#genre#\n每日自动更新,https://notice.example.com/update.png\nA,#genre#\n"));
        assert_eq!(out.resolved[0].category, "系统公告");
        assert_eq!(out.report.channels_resolved, 1);
    }

    #[test]
    fn test_declared_format_overrides_detection() {
        let template = load_template("[A]\nX\n").unwrap();
        let source = SourceText {
            origin: "s".to_string(),
            format: Some(SourceFormat::Txt),
            text: "#EXTINF:-1,X\nhttp://x.example.com/1\n".to_string(),
        };
        let out = Pipeline::default().run(&template, &[source]);
        assert_eq!(out.report.sources[0].format, Some(SourceFormat::Txt));
        assert_eq!(out.report.records, 0);
    }

    #[test]
    fn test_every_template_category_gets_a_txt_header() {
        let template = load_template("[A]\n[B]\nx\n[C]\ny\n").unwrap();
        let sources = [txt_source("s", "x,http://x.example.com/1\n")];

        let emit = Pipeline::default().run(&template, &sources);
        assert_eq!(
            emit.txt,
            "A,#genre#\nB,#genre#\nx,http://x.example.com/1\nC,#genre#\ny,\n"
        );

        let omit = Pipeline {
            match_config: MatchConfig {
                unmatched: UnmatchedPolicy::Omit,
                ..MatchConfig::default()
            },
            ..Pipeline::default()
        }
        .run(&template, &sources);
        assert_eq!(omit.txt, "A,#genre#\nB,#genre#\nx,http://x.example.com/1\nC,#genre#\n");
        assert_eq!(omit.report.unmatched, vec!["C/y"]);
        assert!(!omit.m3u.contains("group-title=\"A\""));
    }
}
