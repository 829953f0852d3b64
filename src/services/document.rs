//! Line-preserving model of a Project Zomboid server configuration file.
//!
//! `servertest.ini` is a flat `key=value` file with no section headers and `#`
//! comments. [`ConfigDocument`] keeps every original line verbatim and only
//! rewrites the lines of keys that are explicitly set, so that
//! `ConfigDocument::parse(text)?.to_text() == text` for any untouched document.
//!
//! In B42+ the `Mods=` entries carry a backslash prefix (`Mods=\ModA;\ModB`).
//! The prefix is stripped by [`ConfigDocument::mod_ids`] and re-applied by
//! [`ConfigDocument::set_mod_ids`] according to the [`ModListFormat`] detected
//! at parse time.

use crate::models::ServerSetting;
use indexmap::IndexMap;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Key of the mod identifier list.
pub const MODS_KEY: &str = "Mods";

/// Key of the workshop identifier list.
pub const WORKSHOP_ITEMS_KEY: &str = "WorkshopItems";

/// Keys managed by the mod list, hidden from the server settings view.
pub const MOD_LIST_KEYS: [&str; 3] = [MODS_KEY, WORKSHOP_ITEMS_KEY, "Map"];

static MIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Min:\s*([\d.-]+)").expect("Invalid Min regex"));
static MAX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Max:\s*([\d.-]+)").expect("Invalid Max regex"));
static DEFAULT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Default:\s*(\S+)").expect("Invalid Default regex"));

/// Errors raised while reading a configuration document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Not a text configuration file (line {line}): {reason}")]
    Parse { line: usize, reason: String },
}

/// How mod ids are written on the `Mods=` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModListFormat {
    /// B42+: every mod id is prefixed with a backslash.
    #[default]
    B42,
    /// Pre-B42: plain mod ids.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    /// Full original text including the terminator.
    text: String,
    /// Key for `key=value` lines.
    key: Option<String>,
}

impl Line {
    fn parse(text: String, first: bool) -> Self {
        let body = strip_terminator(&text);
        let body = if first { body.trim_start_matches('\u{feff}') } else { body };
        let trimmed = body.trim();

        let key = if trimmed.is_empty() || trimmed.starts_with('#') {
            None
        } else {
            trimmed
                .split_once('=')
                .map(|(key, _)| key.trim())
                .filter(|key| !key.is_empty())
                .map(str::to_string)
        };

        Self { text, key }
    }

    fn terminator(&self) -> &str {
        &self.text[strip_terminator(&self.text).len()..]
    }

    /// Value after the first `=`, trimmed.
    fn value(&self) -> &str {
        strip_terminator(&self.text)
            .split_once('=')
            .map(|(_, value)| value.trim())
            .unwrap_or("")
    }

    /// Replace the value while keeping everything up to the `=` and the terminator.
    fn set_value(&mut self, value: &str) {
        let body = strip_terminator(&self.text);
        let Some(eq) = body.find('=') else {
            return;
        };
        let rewritten = format!("{}{}{}", &body[..=eq], value, self.terminator());
        self.text = rewritten;
    }
}

fn strip_terminator(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Ordered key/value view over a server configuration file.
///
/// Reads see the last occurrence of a duplicated key; writes rewrite every
/// occurrence. Unknown keys, comments and blank lines are never touched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigDocument {
    lines: Vec<Line>,
    /// Key -> index of its last line, in first-seen order.
    index: IndexMap<String, usize>,
    format: ModListFormat,
    crlf: bool,
}

impl ConfigDocument {
    /// Parse configuration text.
    ///
    /// Blank, comment and garbage lines are kept as opaque text; an empty file
    /// is a valid, empty document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] if the text contains NUL bytes, which
    /// means the file is binary rather than a configuration file.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        if let Some(pos) = text.find('\0') {
            let line = text[..pos].matches('\n').count() + 1;
            return Err(DocumentError::Parse {
                line,
                reason: "contains NUL bytes".to_string(),
            });
        }

        let lines: Vec<Line> = text
            .split_inclusive('\n')
            .enumerate()
            .map(|(i, raw)| Line::parse(raw.to_string(), i == 0))
            .collect();

        let crlf = lines.first().is_some_and(|l| l.text.ends_with("\r\n"));

        let mut doc = Self {
            lines,
            index: IndexMap::new(),
            format: ModListFormat::default(),
            crlf,
        };
        doc.reindex();
        doc.format = doc.detect_format();

        tracing::debug!(
            "Parsed configuration: {} lines, {} keys, format={:?}",
            doc.lines.len(),
            doc.index.len(),
            doc.format
        );

        Ok(doc)
    }

    /// Parse raw file bytes, rejecting anything that is not UTF-8 text.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            let line = bytes[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
            DocumentError::Parse {
                line,
                reason: format!("invalid UTF-8: {}", e),
            }
        })?;
        Self::parse(text)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, line) in self.lines.iter().enumerate() {
            if let Some(key) = &line.key {
                self.index.insert(key.clone(), i);
            }
        }
    }

    fn detect_format(&self) -> ModListFormat {
        let raw = self.raw_list(MODS_KEY);
        if raw.is_empty() || raw.iter().any(|id| id.starts_with('\\')) {
            ModListFormat::B42
        } else {
            ModListFormat::Legacy
        }
    }

    /// Serialize back to text.
    pub fn to_text(&self) -> String {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }

    pub fn format(&self) -> ModListFormat {
        self.format
    }

    pub fn line_ending(&self) -> &'static str {
        if self.crlf { "\r\n" } else { "\n" }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// `(key, value)` pairs in first-seen key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.index
            .iter()
            .map(move |(key, &i)| (key.as_str(), self.lines[i].value()))
    }

    /// Raw value of `key` (last occurrence), trimmed.
    pub fn get_scalar(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.lines[i].value())
    }

    /// Set `key` to `value` without any type checking.
    ///
    /// Lines already holding `value` are left byte-identical. A missing key is
    /// appended at the end of the document.
    pub fn set_scalar(&mut self, key: &str, value: &str) {
        if self.index.contains_key(key) {
            for line in self.lines.iter_mut() {
                if line.key.as_deref() == Some(key) && line.value() != value {
                    line.set_value(value);
                }
            }
            return;
        }

        let ending = self.line_ending();
        if let Some(last) = self.lines.last_mut() {
            if last.terminator().is_empty() {
                last.text.push_str(ending);
            }
        }
        self.lines.push(Line {
            text: format!("{}={}{}", key, value, ending),
            key: Some(key.to_string()),
        });
        self.index.insert(key.to_string(), self.lines.len() - 1);
    }

    fn raw_list(&self, key: &str) -> Vec<&str> {
        self.get_scalar(key)
            .map(|value| {
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Split a list value on `;`, trimming and dropping empty segments.
    /// Duplicates are kept.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.raw_list(key).into_iter().map(str::to_string).collect()
    }

    /// Join `values` with `;` (no trailing separator) and store them under `key`.
    pub fn set_list<S: AsRef<str>>(&mut self, key: &str, values: &[S]) {
        let joined = values
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(";");
        self.set_scalar(key, &joined);
    }

    /// Mod ids from `Mods=`, with the B42 backslash prefix stripped.
    pub fn mod_ids(&self) -> Vec<String> {
        self.raw_list(MODS_KEY)
            .into_iter()
            .map(|id| id.trim_start_matches('\\'))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Write `Mods=` in this document's format. Empty ids are skipped.
    pub fn set_mod_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        let prefix = match self.format {
            ModListFormat::B42 => "\\",
            ModListFormat::Legacy => "",
        };
        let formatted: Vec<String> = ids
            .iter()
            .map(AsRef::as_ref)
            .filter(|id| !id.is_empty())
            .map(|id| format!("{}{}", prefix, id.trim_start_matches('\\')))
            .collect();
        self.set_list(MODS_KEY, &formatted);
    }

    pub fn workshop_ids(&self) -> Vec<String> {
        self.get_list(WORKSHOP_ITEMS_KEY)
    }

    pub fn set_workshop_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        self.set_list(WORKSHOP_ITEMS_KEY, ids);
    }

    /// Read a boolean key; anything but `true` (any case) is false.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_scalar(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set_scalar(key, if value { "true" } else { "false" });
    }

    /// Every scalar key with its preceding comment, excluding the mod list keys.
    pub fn settings(&self) -> Vec<ServerSetting> {
        let mut settings = Vec::new();
        let mut comment_lines: Vec<&str> = Vec::new();

        for line in &self.lines {
            let body = strip_terminator(&line.text).trim();

            if body.starts_with('#') {
                comment_lines.push(body.trim_start_matches(['#', ' ']));
                continue;
            }

            let Some(key) = &line.key else {
                // Blank lines may separate a comment from its key
                if !body.is_empty() {
                    comment_lines.clear();
                }
                continue;
            };

            if MOD_LIST_KEYS.contains(&key.as_str()) {
                comment_lines.clear();
                continue;
            }

            let comment = comment_lines.join(" ");
            comment_lines.clear();

            let capture = |pattern: &Regex| {
                pattern
                    .captures(&comment)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            };

            settings.push(ServerSetting {
                key: key.clone(),
                value: line.value().to_string(),
                min: capture(&MIN_PATTERN).and_then(|v| v.parse().ok()),
                max: capture(&MAX_PATTERN).and_then(|v| v.parse().ok()),
                default: capture(&DEFAULT_PATTERN),
                comment,
            });
        }

        settings
    }

    /// Apply edited settings; keys are written verbatim.
    pub fn apply_settings<K, V, I>(&mut self, changes: I) -> usize
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut count = 0;
        for (key, value) in changes {
            self.set_scalar(key.as_ref(), value.as_ref());
            count += 1;
        }
        count
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(&line.text)?;
        }
        Ok(())
    }
}
