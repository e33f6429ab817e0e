//! Tag records: the key-value content of a FlagCarrier tag.
//!
//! A [`TagRecord`] is a string-to-string map. Entries are kept sorted by key
//! so that encoding is deterministic.
//!
//! Two keys are reserved:
//!
//! - [`SIG_KEY`]: the base64 signature envelope, meaningful only as the very
//!   first field of an encoded payload
//! - [`SIG_VALID_KEY`]: a decode-time annotation (`"true"`/`"false"`) that is
//!   never read from the wire and never signed
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::record::{SignatureStatus, TagRecord};
//!
//! let mut record = TagRecord::new();
//! record.insert("display_name", "runner");
//! record.insert("country_code", "DE");
//!
//! assert_eq!(record.get("display_name"), Some("runner"));
//! assert_eq!(record.signature_status(), SignatureStatus::Absent);
//! ```

pub mod wire;

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key of the signature envelope field.
pub const SIG_KEY: &str = "sig";

/// Key of the decode-time verification annotation.
pub const SIG_VALID_KEY: &str = "sig_valid";

/// Key holding the display name of a tag's owner.
pub const DISPLAY_NAME_KEY: &str = "display_name";

/// Key listing the settings a provisioning tag carries.
pub const SETTINGS_LIST_KEY: &str = "set";

/// Display name that marks a tag as a provisioning tag.
pub const SETTINGS_TRIGGER: &str = "set";

/// Longest key accepted from the extra-data form, in characters.
pub const MAX_EXTRA_KEY_CHARS: usize = 32;

/// Longest value accepted from the extra-data form, in characters.
pub const MAX_EXTRA_VALUE_CHARS: usize = 255;

/// An ordered key-value map carried by a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagRecord {
    entries: BTreeMap<String, String>,
}

/// Outcome of signature verification as recorded in a decoded [`TagRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The leading signature verified.
    Valid,
    /// The leading signature did not verify.
    Invalid,
    /// No verification took place: no public key was configured, or the
    /// payload did not start with a signature field.
    Absent,
}

impl TagRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Returns the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns `true` if the record has an entry for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the entry for `key`.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the record has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }

    /// Interprets the [`SIG_VALID_KEY`] annotation.
    ///
    /// Any value other than `"true"` counts as invalid, matching how the
    /// annotation is parsed back as a boolean.
    #[must_use]
    pub fn signature_status(&self) -> SignatureStatus {
        match self.get(SIG_VALID_KEY) {
            None => SignatureStatus::Absent,
            Some("true") => SignatureStatus::Valid,
            Some(_) => SignatureStatus::Invalid,
        }
    }

    /// Iterates over the entries that are neither [`SIG_KEY`] nor
    /// [`SIG_VALID_KEY`].
    pub fn user_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != SIG_KEY && k.as_str() != SIG_VALID_KEY)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for TagRecord {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.entries
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for TagRecord {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagRecord {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Parses the free-text extra data of the write-tag form.
///
/// The text holds one `key=value` pair per line. Lines are trimmed, blank
/// lines are skipped and each line is split on its first `=`.
///
/// # Errors
///
/// Returns [`Error::InvalidExtraData`] if a line has no `=`, a key is longer
/// than [`MAX_EXTRA_KEY_CHARS`] or a value longer than [`MAX_EXTRA_VALUE_CHARS`].
///
/// # Example
///
/// ```
/// use flagcarrier_core::record::parse_extra_data;
///
/// let pairs = parse_extra_data("team=blue\n\n  seat = 12a \n").unwrap();
/// assert_eq!(pairs, vec![
///     ("team".to_string(), "blue".to_string()),
///     ("seat ".to_string(), " 12a".to_string()),
/// ]);
/// ```
pub fn parse_extra_data(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::InvalidExtraData(format!("line without '=': {line}")))?;

        if key.chars().count() > MAX_EXTRA_KEY_CHARS {
            return Err(Error::InvalidExtraData(format!(
                "key length > {MAX_EXTRA_KEY_CHARS}: {key}"
            )));
        }
        if value.chars().count() > MAX_EXTRA_VALUE_CHARS {
            return Err(Error::InvalidExtraData(format!(
                "value length > {MAX_EXTRA_VALUE_CHARS} for key {key}"
            )));
        }

        pairs.push((key.to_string(), value.to_string()));
    }

    Ok(pairs)
}

/// Extracts the settings carried by a provisioning tag.
///
/// A provisioning tag has `display_name = "set"` and a `set` entry listing
/// comma-separated setting names, each of which must also be present on the
/// tag. The returned pairs keep the order of the list.
///
/// Returns `None` if `record` is not a provisioning tag.
///
/// # Errors
///
/// Returns [`Error::MalformedSettings`] if a listed setting is missing.
pub fn settings_update(record: &TagRecord) -> Option<Result<Vec<(String, String)>>> {
    if record.get(DISPLAY_NAME_KEY) != Some(SETTINGS_TRIGGER) {
        return None;
    }
    let list = record.get(SETTINGS_LIST_KEY)?;

    Some(
        list.split(',')
            .map(|name| {
                record
                    .get(name)
                    .map(|value| (name.to_string(), value.to_string()))
                    .ok_or_else(|| Error::MalformedSettings(format!("{name} missing on tag")))
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_sorted_and_last_write_wins() {
        let mut record: TagRecord = [("b", "2"), ("a", "1")].into_iter().collect();
        record.insert("b", "3");

        let entries: Vec<_> = record.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (&"a".to_string(), &"1".to_string()));
        assert_eq!(record.get("b"), Some("3"));
    }

    #[test]
    fn signature_status_from_annotation() {
        let mut record = TagRecord::new();
        assert_eq!(record.signature_status(), SignatureStatus::Absent);

        record.insert(SIG_VALID_KEY, "true");
        assert_eq!(record.signature_status(), SignatureStatus::Valid);

        record.insert(SIG_VALID_KEY, "false");
        assert_eq!(record.signature_status(), SignatureStatus::Invalid);
    }

    #[test]
    fn user_entries_skip_reserved_keys() {
        let record: TagRecord = [
            (SIG_KEY, "abc"),
            (SIG_VALID_KEY, "true"),
            ("twitch_name", "runner"),
        ]
        .into_iter()
        .collect();

        let user: Vec<_> = record.user_entries().collect();
        assert_eq!(user, vec![("twitch_name", "runner")]);
    }

    #[test]
    fn serde_is_a_plain_map() {
        let record: TagRecord = [("k", "v")].into_iter().collect();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"k":"v"}"#);

        let back: TagRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn extra_data_splits_on_first_equals() {
        let pairs = parse_extra_data("url=https://x.org/?a=b").unwrap();
        assert_eq!(pairs, vec![("url".to_string(), "https://x.org/?a=b".to_string())]);
    }

    #[test]
    fn extra_data_rejects_bad_lines() {
        assert!(matches!(
            parse_extra_data("novalue"),
            Err(Error::InvalidExtraData(_))
        ));

        let long_key = format!("{}=v", "k".repeat(MAX_EXTRA_KEY_CHARS + 1));
        assert!(parse_extra_data(&long_key).is_err());
        let ok_key = format!("{}=v", "k".repeat(MAX_EXTRA_KEY_CHARS));
        assert!(parse_extra_data(&ok_key).is_ok());

        let long_value = format!("k={}", "v".repeat(MAX_EXTRA_VALUE_CHARS + 1));
        assert!(parse_extra_data(&long_value).is_err());
    }

    #[test]
    fn extra_data_empty_text() {
        assert!(parse_extra_data("\n \n").unwrap().is_empty());
    }

    #[test]
    fn settings_update_from_provisioning_tag() {
        let record: TagRecord = [
            (DISPLAY_NAME_KEY, SETTINGS_TRIGGER),
            (SETTINGS_LIST_KEY, "target_url,pos_avail"),
            ("target_url", "https://example.org/api"),
            ("pos_avail", "left,right"),
        ]
        .into_iter()
        .collect();

        let settings = settings_update(&record).unwrap().unwrap();
        assert_eq!(
            settings,
            vec![
                ("target_url".to_string(), "https://example.org/api".to_string()),
                ("pos_avail".to_string(), "left,right".to_string()),
            ]
        );
    }

    #[test]
    fn settings_update_missing_setting() {
        let record: TagRecord = [
            (DISPLAY_NAME_KEY, SETTINGS_TRIGGER),
            (SETTINGS_LIST_KEY, "target_url"),
        ]
        .into_iter()
        .collect();

        assert!(matches!(
            settings_update(&record),
            Some(Err(Error::MalformedSettings(_)))
        ));
    }

    #[test]
    fn settings_update_ignores_ordinary_tags() {
        let record: TagRecord = [(DISPLAY_NAME_KEY, "runner"), (SETTINGS_LIST_KEY, "x")]
            .into_iter()
            .collect();
        assert!(settings_update(&record).is_none());

        let record: TagRecord = [(DISPLAY_NAME_KEY, SETTINGS_TRIGGER)].into_iter().collect();
        assert!(settings_update(&record).is_none());
    }
}
