//! Transient lookup keys for one bind call

use crate::value::Value;

/// Unit separator, not expected inside key values.
const SEPARATOR: char = '\u{1f}';

/// Join values concatenated in declared column order.
///
/// Only meaningful within a single bind call. Built from
/// [`Value::to_key_string`], so `5` and `"5"` produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey(String);

impl MatchKey {
    /// `None` when any part is null.
    pub fn new<'a>(parts: impl IntoIterator<Item = &'a Value>) -> Option<Self> {
        let mut key = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if part.is_null() {
                return None;
            }
            if i > 0 {
                key.push(SEPARATOR);
            }
            key.push_str(&part.to_key_string());
        }
        Some(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
