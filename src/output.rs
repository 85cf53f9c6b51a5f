use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::OutputError;
use crate::matcher::{ResolvedCategory, ResolvedChannel};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// `tvg-logo` becomes `<logo_base_url><channel name>.png` when set.
    pub logo_base_url: Option<String>,
    /// Advertised in the M3U header as `x-tvg-url`.
    pub epg_urls: Vec<String>,
    /// Append `$线路 N` to failover lines in the TXT output.
    pub label_lines: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            logo_base_url: None,
            epg_urls: Vec::new(),
            label_lines: true,
        }
    }
}

fn attr(value: &str) -> String {
    value.replace('"', "'")
}

pub fn format_m3u(resolved: &[ResolvedChannel], options: &OutputOptions) -> String {
    let mut out = String::from("#EXTM3U");
    if !options.epg_urls.is_empty() {
        out.push_str(&format!(" x-tvg-url=\"{}\"", attr(&options.epg_urls.join(","))));
    }
    out.push('\n');

    for channel in resolved {
        let name = attr(&channel.channel_name);
        let group = attr(&channel.category);

        if channel.urls.is_empty() {
            out.push_str(&format!(
                "#UNMATCHED group-title=\"{}\",{}\n",
                group, channel.channel_name
            ));
            continue;
        }

        let logo = options
            .logo_base_url
            .as_deref()
            .map(|base| format!(" tvg-logo=\"{}{}.png\"", attr(base), name))
            .unwrap_or_default();

        for (idx, url) in channel.urls.iter().enumerate() {
            out.push_str(&format!(
                "#EXTINF:-1 tvg-id=\"{}\" tvg-name=\"{}\"{} group-title=\"{}\",{}\n",
                idx + 1,
                name,
                logo,
                group,
                channel.channel_name
            ));
            out.push_str(url);
            out.push('\n');
        }
    }
    out
}

/// TVBox-style text playlist: a `category,#genre#` line whenever the
/// category changes, then `name,url` per line. Use [`format_txt_sections`]
/// to keep categories that have no channels.
pub fn format_txt(resolved: &[ResolvedChannel], options: &OutputOptions) -> String {
    let mut sections: Vec<ResolvedCategory> = Vec::new();
    for channel in resolved {
        match sections.last_mut() {
            Some(section) if section.name == channel.category => section.channels.push(channel.clone()),
            _ => sections.push(ResolvedCategory {
                name: channel.category.clone(),
                channels: vec![channel.clone()],
            }),
        }
    }
    format_txt_sections(&sections, options)
}

/// Writes one `category,#genre#` header per section, including empty ones,
/// followed by the section's channels.
pub fn format_txt_sections(sections: &[ResolvedCategory], options: &OutputOptions) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str(&format!("{},#genre#\n", section.name));

        for channel in &section.channels {
            if channel.urls.is_empty() {
                out.push_str(&format!("{},\n", channel.channel_name));
                continue;
            }

            for (idx, url) in channel.urls.iter().enumerate() {
                out.push_str(&format!("{},{}", channel.channel_name, url));
                if let Some(label) = channel.line_label(idx).filter(|_| options.label_lines) {
                    out.push('$');
                    out.push_str(&label);
                }
                out.push('\n');
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub m3u: PathBuf,
    pub txt: PathBuf,
}

/// Writes both playlists into `dir`, creating it if needed.
pub fn write_outputs(
    dir: &Path,
    m3u_filename: &str,
    txt_filename: &str,
    m3u: &str,
    txt: &str,
) -> Result<OutputPaths, OutputError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let paths = OutputPaths {
        m3u: dir.join(m3u_filename),
        txt: dir.join(txt_filename),
    };
    for (path, content) in [(&paths.m3u, m3u), (&paths.txt, txt)] {
        std::fs::write(path, content).map_err(|source| OutputError::Write {
            path: path.clone(),
            source,
        })?;
    }
    Ok(paths)
}
