use std::collections::HashSet;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseFailure;

/// One desired file in the managed folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModEntry {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl ModEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: None,
            hash: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Declared hash, if it carries any digest at all.
    pub fn declared_hash(&self) -> Option<&str> {
        self.hash
            .as_deref()
            .map(str::trim)
            .filter(|hash| !hash.is_empty())
    }

    /// Entry-specific download URL, if one is set.
    pub fn explicit_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Ordered list of desired files, unique by filename.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub mods: Vec<ModEntry>,
}

impl Manifest {
    /// Build a manifest, dropping unsafe or duplicate filenames.
    pub fn new(entries: impl IntoIterator<Item = ModEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut mods = Vec::new();
        for entry in entries {
            if !is_plain_filename(&entry.filename) {
                warn!(
                    "manifest: dropping entry with unusable filename {:?}",
                    entry.filename
                );
                continue;
            }
            if !seen.insert(entry.filename.clone()) {
                warn!("manifest: duplicate entry for {}; keeping the first", entry.filename);
                continue;
            }
            mods.push(entry);
        }
        Self { mods }
    }

    pub fn from_listing(entries: Vec<ModEntry>) -> Self {
        Self::new(entries)
    }

    /// A bare list of filenames, with no hashes and no explicit URLs.
    pub fn from_filenames<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(filenames.into_iter().map(ModEntry::new))
    }

    pub fn entry(&self, filename: &str) -> Option<&ModEntry> {
        self.mods.iter().find(|entry| entry.filename == filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entry(filename).is_some()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.mods.iter().map(|entry| entry.filename.as_str())
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

/// Parse a `{"mods": [...]}` manifest document.
pub fn parse(document: &str) -> Result<Manifest, ParseFailure> {
    let mut root = match parse_json_payload(document)? {
        Value::Object(root) => root,
        other => return Err(ParseFailure::WrongShape(json_kind(&other))),
    };
    let Some(Value::Array(items)) = root.remove("mods") else {
        return Ok(Manifest::default());
    };
    let entries = items.iter().filter_map(|item| {
        let obj = item.as_object()?;
        let filename = string_field(obj, "filename")?;
        Some(ModEntry {
            filename,
            url: string_field(obj, "url"),
            hash: string_field(obj, "hash"),
        })
    });
    Ok(Manifest::new(entries))
}

/// Reject empty bodies and HTML pages before handing the payload to serde.
pub(crate) fn parse_json_payload(body: &str) -> Result<Value, ParseFailure> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }
    if trimmed.starts_with('<') {
        return Err(ParseFailure::UnexpectedHtml);
    }
    serde_json::from_str(trimmed).map_err(|err| ParseFailure::Malformed(err.to_string()))
}

pub(crate) fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
