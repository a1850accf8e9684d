//! Output filename generation.

use chrono::{DateTime, Local, TimeZone};

use crate::config::FileConfig;

pub const PDF_EXTENSION: &str = ".pdf";
pub const TIMESTAMP_TOKEN: &str = "{timestamp}";

/// Filesystem-safe timestamp: no colons, second precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// A caller-supplied name gets the extension appended when missing;
/// otherwise the template is expanded with the current local time.
pub fn generate_filename(custom: Option<&str>, file: &FileConfig) -> String {
    generate_filename_at(custom, file, &Local::now())
}

pub fn generate_filename_at<Tz: TimeZone>(
    custom: Option<&str>,
    file: &FileConfig,
    now: &DateTime<Tz>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if let Some(name) = custom.map(str::trim).filter(|n| !n.is_empty()) {
        return with_extension(name);
    }

    let stem = if file.include_timestamp {
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        file.name_template.replace(TIMESTAMP_TOKEN, &stamp)
    } else {
        file.name_template
            .replace(TIMESTAMP_TOKEN, "")
            .trim_matches(|c| c == '-' || c == '_')
            .to_string()
    };

    let stem = if stem.is_empty() { "export" } else { stem.as_str() };
    with_extension(stem)
}

fn with_extension(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(PDF_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{PDF_EXTENSION}")
    }
}
