pub mod blacklist;
pub mod error;
pub mod fetch;
pub mod matcher;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod settings;
pub mod source;
pub mod template;

pub use blacklist::{Blacklist, BlacklistEntry, MalformedUrlPolicy, MatchMode};
pub use matcher::{
    match_categories, match_channels, MatchConfig, ResolvedCategory, ResolvedChannel,
    UnmatchedPolicy,
};
pub use normalize::normalize_name;
pub use output::{format_m3u, format_txt, format_txt_sections, write_outputs, OutputOptions};
pub use pipeline::{Pipeline, RunOutput, RunReport, SourceText};
pub use source::{parse, ChannelRecord, ParseOutcome, SourceFormat};
pub use template::{load_template, load_template_file, Template, TemplateEntry};
