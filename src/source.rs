use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::{Host, Url};

use crate::blacklist::Blacklist;
use crate::error::ConfigError;

lazy_static! {
    static ref EXTINF_ATTR: Regex = Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap();
}

const ALLOWED_SCHEMES: &[&str] = &[
    "http", "https", "rtmp", "rtmps", "rtsp", "rtp", "udp", "mms", "mmsh", "p2p", "p3p",
];

/// How many leading lines are inspected when guessing the format.
const DETECT_WINDOW: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    M3u,
    Txt,
}

impl SourceFormat {
    pub fn detect(text: &str) -> Self {
        let mut lines = text
            .trim_start_matches('\u{feff}')
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(DETECT_WINDOW)
            .peekable();
        if lines.peek().is_some_and(|l| l.starts_with("#EXTM3U")) {
            return SourceFormat::M3u;
        }
        if lines.any(|l| l.starts_with("#EXTINF")) {
            SourceFormat::M3u
        } else {
            SourceFormat::Txt
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::M3u => f.write_str("m3u"),
            SourceFormat::Txt => f.write_str("txt"),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m3u" | "m3u8" => Ok(SourceFormat::M3u),
            "txt" => Ok(SourceFormat::Txt),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// One stream address found in a source, exactly as the source named it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRecord {
    pub name: String,
    pub url: String,
    pub line_label: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordIssueKind {
    Malformed,
    InvalidUrl,
    Blacklisted,
}

impl fmt::Display for RecordIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIssueKind::Malformed => f.write_str("malformed"),
            RecordIssueKind::InvalidUrl => f.write_str("invalid_url"),
            RecordIssueKind::Blacklisted => f.write_str("blacklisted"),
        }
    }
}

/// A dropped entry. `line` is 1-based within the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIssue {
    pub line: usize,
    pub kind: RecordIssueKind,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<ChannelRecord>,
    pub issues: Vec<RecordIssue>,
}

impl ParseOutcome {
    pub fn count(&self, kind: RecordIssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    fn drop_entry(&mut self, line: usize, kind: RecordIssueKind, detail: String) {
        debug!("Dropped source entry: line={} kind={} detail={}", line, kind, detail);
        self.issues.push(RecordIssue { line, kind, detail });
    }

    fn accept(&mut self, line: usize, record: ChannelRecord, blacklist: &Blacklist) {
        if let Err(reason) = validate_stream_url(&record.url) {
            self.drop_entry(
                line,
                RecordIssueKind::InvalidUrl,
                format!("{} ({}): {}", record.name, record.url, reason),
            );
        } else if blacklist.is_blacklisted(&record.url) {
            self.drop_entry(
                line,
                RecordIssueKind::Blacklisted,
                format!("{} ({})", record.name, record.url),
            );
        } else {
            self.records.push(record);
        }
    }
}

/// Parses raw source text into channel records, in input order. Entries that
/// are malformed, carry an unusable address or hit the blacklist are dropped
/// and reported in [`ParseOutcome::issues`].
pub fn parse(text: &str, format: SourceFormat, blacklist: &Blacklist) -> ParseOutcome {
    let text = text.trim_start_matches('\u{feff}');
    match format {
        SourceFormat::M3u => parse_m3u(text, blacklist),
        SourceFormat::Txt => parse_txt(text, blacklist),
    }
}

struct PendingEntry {
    line: usize,
    name: String,
    group: Option<String>,
}

fn parse_m3u(text: &str, blacklist: &Blacklist) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut pending: Option<PendingEntry> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(body) = line.strip_prefix("#EXTINF") {
            if let Some(prev) = pending.take() {
                outcome.drop_entry(
                    prev.line,
                    RecordIssueKind::Malformed,
                    format!("metadata for \"{}\" has no stream URL", prev.name),
                );
            }
            match parse_extinf(body) {
                Some((name, group)) => {
                    pending = Some(PendingEntry {
                        line: line_no,
                        name,
                        group,
                    })
                }
                None => outcome.drop_entry(
                    line_no,
                    RecordIssueKind::Malformed,
                    "metadata line without channel name".to_string(),
                ),
            }
            continue;
        }

        if let Some(group) = line.strip_prefix("#EXTGRP:") {
            if let Some(entry) = pending.as_mut() {
                let group = group.trim();
                if entry.group.is_none() && !group.is_empty() {
                    entry.group = Some(group.to_string());
                }
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        match pending.take() {
            Some(entry) => outcome.accept(
                line_no,
                ChannelRecord {
                    name: entry.name,
                    url: line.to_string(),
                    line_label: None,
                    group: entry.group,
                },
                blacklist,
            ),
            None => outcome.drop_entry(
                line_no,
                RecordIssueKind::Malformed,
                format!("stream URL without metadata: {}", line),
            ),
        }
    }

    if let Some(entry) = pending {
        outcome.drop_entry(
            entry.line,
            RecordIssueKind::Malformed,
            format!("metadata for \"{}\" has no stream URL", entry.name),
        );
    }

    outcome
}

/// Splits an `#EXTINF` body (everything after the tag) into the channel name
/// and its `group-title`.
fn parse_extinf(body: &str) -> Option<(String, Option<String>)> {
    let body = body.strip_prefix(':').unwrap_or(body);

    let mut in_quotes = false;
    let mut split_at = None;
    for (i, c) in body.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(i);
                break;
            }
            _ => {}
        }
    }
    let (attrs, title) = match split_at {
        Some(i) => (&body[..i], body[i + 1..].trim()),
        None => (body, ""),
    };

    let mut tvg_name = None;
    let mut group = None;
    for caps in EXTINF_ATTR.captures_iter(attrs) {
        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        match &caps[1] {
            "tvg-name" => tvg_name = Some(value.to_string()),
            "group-title" => group = Some(value.to_string()),
            _ => {}
        }
    }

    let name = if title.is_empty() { tvg_name? } else { title.to_string() };
    Some((name, group))
}

fn parse_txt(text: &str, blacklist: &Blacklist) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut group: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        let Some((name, rest)) = line.split_once(',') else {
            outcome.drop_entry(
                line_no,
                RecordIssueKind::Malformed,
                format!("missing comma: {}", line),
            );
            continue;
        };
        let name = name.trim();
        let rest = rest.trim();

        if rest.starts_with("#genre#") {
            group = (!name.is_empty()).then(|| name.to_string());
            continue;
        }

        let (url, line_label) = match rest.split_once('$') {
            Some((url, label)) => {
                let label = label.trim();
                (url.trim(), (!label.is_empty()).then(|| label.to_string()))
            }
            None => (rest, None),
        };

        if name.is_empty() || url.is_empty() {
            outcome.drop_entry(
                line_no,
                RecordIssueKind::Malformed,
                format!("empty name or URL: {}", line),
            );
            continue;
        }

        outcome.accept(
            line_no,
            ChannelRecord {
                name: name.to_string(),
                url: url.to_string(),
                line_label,
                group: group.clone(),
            },
            blacklist,
        );
    }

    outcome
}

/// Syntactic check of a stream address: known streaming scheme plus a host
/// that is an IP literal (v4 or bracketed v6) or a plausible domain name.
pub fn validate_stream_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(format!("unsupported scheme \"{}\"", url.scheme()));
    }
    match url.host() {
        None => Err("missing host".to_string()),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Ok(()),
        Some(Host::Domain(domain)) if is_plausible_domain(domain) => Ok(()),
        Some(Host::Domain(domain)) => Err(format!("implausible host \"{}\"", domain)),
    }
}

fn is_plausible_domain(domain: &str) -> bool {
    if domain.eq_ignore_ascii_case("localhost") {
        return true;
    }
    domain.contains('.')
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::{BlacklistEntry, MalformedUrlPolicy, MatchMode};

    fn no_blacklist() -> Blacklist {
        Blacklist::default()
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(SourceFormat::detect("#EXTM3U\n"), SourceFormat::M3u);
        assert_eq!(
            SourceFormat::detect("\n\n#EXTINF:-1,CCTV-1\nhttp://a.example/1"),
            SourceFormat::M3u
        );
        assert_eq!(
            SourceFormat::detect("央视频道,#genre#\nCCTV-1,http://a.example/1"),
            SourceFormat::Txt
        );
        assert_eq!(SourceFormat::detect(""), SourceFormat::Txt);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("M3U".parse::<SourceFormat>().unwrap(), SourceFormat::M3u);
        assert_eq!("m3u8".parse::<SourceFormat>().unwrap(), SourceFormat::M3u);
        assert_eq!(" txt ".parse::<SourceFormat>().unwrap(), SourceFormat::Txt);
        assert!("xml".parse::<SourceFormat>().is_err());
    }

    #[test]
    fn test_parse_m3u() {
        let data = r#"#EXTM3U x-tvg-url="http://epg.example/e.xml"
#EXTINF:-1 tvg-id="1" tvg-name="CCTV1" tvg-logo="http://logo/cctv1.png" group-title="央视, 高清",CCTV-1 综合
#EXTVLCOPT:network-caching=1000
http://[2409:8087:4c0a:22:1::11]:6410/live/1.m3u8
#EXTINF:-1 group-title="卫视",湖南卫视
https://hn.example.com/live.m3u8
"#;
        let out = parse(data, SourceFormat::M3u, &no_blacklist());
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].name, "CCTV-1 综合");
        assert_eq!(out.records[0].group.as_deref(), Some("央视, 高清"));
        assert_eq!(out.records[0].url, "http://[2409:8087:4c0a:22:1::11]:6410/live/1.m3u8");
        assert_eq!(out.records[1].name, "湖南卫视");
        assert_eq!(out.records[1].line_label, None);
    }

    #[test]
    fn test_m3u_falls_back_to_tvg_name_and_extgrp() {
        let data = "#EXTINF:-1 tvg-name=\"Dragon TV\",\n#EXTGRP:卫视\nhttp://dragon.example.com/1\n";
        let out = parse(data, SourceFormat::M3u, &no_blacklist());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].name, "Dragon TV");
        assert_eq!(out.records[0].group.as_deref(), Some("卫视"));
    }

    #[test]
    fn test_m3u_malformed_entries_are_skipped() {
        let data = "#EXTM3U
#EXTINF:-1,Orphan Meta
#EXTINF:-1,Good
http://good.example.com/1
http://orphan-url.example.com/2
#EXTINF:-1,
http://nameless.example.com/3
#EXTINF:-1,Trailing
";
        let out = parse(data, SourceFormat::M3u, &no_blacklist());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].name, "Good");
        assert_eq!(out.count(RecordIssueKind::Malformed), 5);
        assert_eq!(out.issues[0].line, 2);
    }

    #[test]
    fn test_parse_txt_with_labels_and_genres() {
        let data = "
央视频道,#genre#
CCTV-1,http://[2409:8087::1]:80/x$IPV6•线路22
CCTV-2,http://cctv2.example.com/live.m3u8$
卫视频道,#genre#
江西卫视,http://jx.example.com/live
";
        let out = parse(data, SourceFormat::Txt, &no_blacklist());
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[0].url, "http://[2409:8087::1]:80/x");
        assert_eq!(out.records[0].line_label.as_deref(), Some("IPV6•线路22"));
        assert_eq!(out.records[0].group.as_deref(), Some("央视频道"));
        assert_eq!(out.records[1].line_label, None);
        assert_eq!(out.records[2].group.as_deref(), Some("卫视频道"));
    }

    #[test]
    fn test_txt_malformed_lines() {
        let data = "no comma here\n,http://a.example.com/1\nCCTV-1,\n# comment\n// comment\nOK,http://ok.example.com/1\n";
        let out = parse(data, SourceFormat::Txt, &no_blacklist());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.count(RecordIssueKind::Malformed), 3);
        let lines: Vec<usize> = out.issues.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_urls_are_dropped() {
        let data = "A,ftp://files.example.com/a
B,http://
C,not-a-url
D,http://nodots/live
E,udp://239.1.1.1:5000
F,rtsp://192.168.178.1:554/?avm=1
G,http://localhost:8080/x
";
        let out = parse(data, SourceFormat::Txt, &no_blacklist());
        let names: Vec<&str> = out.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["E", "F", "G"]);
        assert_eq!(out.count(RecordIssueKind::InvalidUrl), 4);
    }

    #[test]
    fn test_blacklisted_records_are_dropped() {
        let bl = Blacklist::new(
            &[BlacklistEntry::new("stream1.freetv.fun", MatchMode::Substring)],
            MalformedUrlPolicy::FailOpen,
        )
        .unwrap();
        let data = "A,http://stream1.freetv.fun/a\nB,http://b.example.com/b\n";
        let out = parse(data, SourceFormat::Txt, &bl);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].name, "B");
        assert_eq!(out.count(RecordIssueKind::Blacklisted), 1);
    }

    #[test]
    fn test_output_order_is_input_order() {
        let data = "Z,http://z.example.com/1\nA,http://a.example.com/1\nZ,http://z.example.com/2\n";
        let out = parse(data, SourceFormat::Txt, &no_blacklist());
        let urls: Vec<&str> = out.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["http://z.example.com/1", "http://a.example.com/1", "http://z.example.com/2"]
        );
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let data = "\u{feff}#EXTM3U\n#EXTINF:-1,A\nhttp://a.example.com/1\n";
        assert_eq!(SourceFormat::detect(data), SourceFormat::M3u);
        let out = parse(data, SourceFormat::M3u, &no_blacklist());
        assert_eq!(out.records.len(), 1);
    }
}
