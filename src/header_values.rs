//! Header-value store (C4): ordered map of header identifiers to UTF-8
//! strings, plus the `header`/`header2`/`xheader` tab-delimited schema
//! parser (§4.6, §6.2) and the acquiry-date parser.

use crate::config::DateFormat;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The fixed vocabulary named in §3, mapped from the schema's two-letter
/// type codes. Anything outside this set is kept as an opaque extra key
/// (§9 "dynamic header-value vocabulary" design note), including the
/// documented-as-undocumented `unknown_dc` passthrough (§9 open question).
pub const KNOWN_IDENTIFIERS: &[&str] = &[
    "case_number",
    "description",
    "examiner_name",
    "evidence_number",
    "notes",
    "acquiry_date",
    "system_date",
    "acquiry_operating_system",
    "acquiry_software_version",
    "password",
    "compression_type",
    "model",
    "serial_number",
    "process_identifier",
    "unknown_dc",
    "unknown_tb",
    "extents",
];

/// Map a header schema's two-letter type code to its canonical long name.
///
/// EnCase6+ ("main"/header2) schemas use a different two-letter code for
/// several fields the older EWF1 ("header") schema names with a single
/// letter; both sides of each pair resolve to the same canonical name here
/// (`t`/`nt` -> notes, `m`/`ac` -> acquiry_date, …).
fn canonical_name(code: &str) -> &str {
    match code {
        "c" | "cn" => "case_number",
        "a" => "description",
        "e" | "ex" => "examiner_name",
        "n" => "evidence_number",
        "t" | "nt" => "notes",
        "m" | "ac" => "acquiry_date",
        "u" => "system_date",
        "ov" => "acquiry_operating_system",
        "sv" => "acquiry_software_version",
        "p" | "pwd" => "password",
        "r" => "compression_type",
        "md" | "mo" => "model",
        "sn" => "serial_number",
        "pid" => "process_identifier",
        "dc" => "unknown_dc",
        "tb" => "unknown_tb",
        "av" => "extents",
        other => other,
    }
}

/// Insertion-ordered `identifier -> value` store (§3). Keys are unique;
/// later `set` calls overwrite.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HeaderValueMap {
    values: IndexMap<String, String>,
}

impl HeaderValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(|s| s.as_str())
    }

    pub fn set(&mut self, id: impl Into<String>, value: impl Into<String>) {
        self.values.insert(id.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Merge `other` in, per the invariant that `header2` (UTF-16) takes
    /// precedence over `header` (codepage-text) on conflict (§3, §4.2).
    fn merge_preferring(&mut self, other: HeaderValueMap) {
        for (k, v) in other.values {
            self.values.insert(k, v);
        }
    }
}

/// Parse one `header`/`header2`/`xheader` payload (already decoded to UTF-8
/// text) per the §6.2 schema:
/// ```text
/// <format-version>\n
/// <n>\n
/// <type1>\t<type2>\t…\n
/// <val1>\t<val2>\t…\n
/// \n
/// ```
/// Malformed text never aborts the parse (§4.10): it is logged and any
/// fields already extracted are kept.
pub fn parse_header_text(text: &str) -> HeaderValueMap {
    let mut map = HeaderValueMap::new();
    let mut lines = text.lines();

    let Some(_format_version) = lines.next() else {
        warn!("empty header section");
        return map;
    };
    let Some(_count_line) = lines.next() else {
        warn!("header section missing column-count line");
        return map;
    };
    let Some(types_line) = lines.next() else {
        warn!("header section missing types line");
        return map;
    };
    let Some(values_line) = lines.next() else {
        warn!("header section missing values line");
        return map;
    };

    let types: Vec<&str> = types_line.split('\t').collect();
    let values: Vec<&str> = values_line.split('\t').collect();

    if types.len() != values.len() {
        warn!(types = types.len(), values = values.len(), "header types/values column mismatch");
    }

    for (code, value) in types.iter().zip(values.iter()) {
        if value.is_empty() {
            continue;
        }
        map.set(canonical_name(code), *value);
    }

    map
}

/// Columns written out by the segment-file writer, in a fixed, stable order.
const EXPORT_COLUMNS: &[(&str, &str)] = &[
    ("c", "case_number"),
    ("n", "evidence_number"),
    ("a", "description"),
    ("e", "examiner_name"),
    ("t", "notes"),
    ("m", "acquiry_date"),
    ("u", "system_date"),
    ("ov", "acquiry_operating_system"),
    ("sv", "acquiry_software_version"),
    ("p", "password"),
    ("r", "compression_type"),
    ("md", "model"),
    ("sn", "serial_number"),
    ("pid", "process_identifier"),
    ("dc", "unknown_dc"),
    ("av", "extents"),
];

/// Render a `header`/`header2` payload's text body (§6.2 schema), writing
/// only the identifiers actually present in `values`.
pub fn render_header_text(values: &HeaderValueMap) -> String {
    let present: Vec<(&str, &str)> =
        EXPORT_COLUMNS.iter().filter(|(_, name)| values.get(name).is_some()).copied().collect();

    let types_line = present.iter().map(|(code, _)| *code).collect::<Vec<_>>().join("\t");
    let values_line = present.iter().map(|(_, name)| values.get(name).unwrap_or("")).collect::<Vec<_>>().join("\t");

    format!("1\n{}\n{}\n{}\n\n", present.len(), types_line, values_line)
}

/// Merge a freshly parsed `header2` map over a `header` map, applying the
/// precedence invariant (§3).
pub fn merge_header_and_header2(header: Option<HeaderValueMap>, header2: Option<HeaderValueMap>) -> HeaderValueMap {
    let mut merged = header.unwrap_or_default();
    if let Some(h2) = header2 {
        merged.merge_preferring(h2);
    }
    merged
}

/// Parse the acquiry-date field's `YYYY M D H M S` space-delimited tuple
/// into POSIX seconds (§4.6). Presentation formatting per `DateFormat` is a
/// display concern left to callers (out of core scope, §1).
pub fn parse_acquiry_date(raw: &str) -> Option<i64> {
    let parts: Vec<i64> = raw.split_whitespace().filter_map(|p| p.parse().ok()).collect();
    if parts.len() != 6 {
        warn!(raw, "malformed acquiry-date field");
        return None;
    }
    let (year, month, day, hour, minute, second) =
        (parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]);
    let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?;
    let time = chrono::NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)?;
    Some(chrono::NaiveDateTime::new(date, time).and_utc().timestamp())
}

/// Render POSIX seconds per the configured presentation format. Kept minimal
/// (§1 non-goal: text/DFXML report formatting): only the handful of forms
/// the date-format knob itself enumerates are implemented.
pub fn format_date(posix_seconds: i64, format: DateFormat) -> String {
    let Some(dt) = chrono::DateTime::from_timestamp(posix_seconds, 0) else {
        return String::new();
    };
    match format {
        DateFormat::DayMonth => dt.format("%d/%m/%Y %H:%M:%S").to_string(),
        DateFormat::MonthDay => dt.format("%m/%d/%Y %H:%M:%S").to_string(),
        DateFormat::Ctime => dt.format("%a %b %e %H:%M:%S %Y").to_string(),
        DateFormat::Iso8601 => dt.to_rfc3339(),
    }
}
