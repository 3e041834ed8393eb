//! Run tags: the string-to-string map every retry decision is persisted in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Cached retry decision (`"true"` / `"false"`). Absent means "not yet evaluated".
pub const WILL_RETRY_TAG: &str = "will_retry";
/// Per-lineage ceiling on the number of retries.
pub const MAX_RETRIES_TAG: &str = "max_retries";
/// Ordinal of a run within its retry lineage (1 = first retry).
pub const RETRY_NUMBER_TAG: &str = "retry_number";
/// Requested re-execution strategy (`FROM_FAILURE` / `ALL_STEPS`).
pub const RETRY_STRATEGY_TAG: &str = "retry_strategy";
/// Per-run override of the deployment's asset/op failure retry policy.
pub const RETRY_ON_ASSET_OR_OP_FAILURE_TAG: &str = "retry_on_asset_or_op_failure";
/// Why the run failed (see [`crate::RunFailureReason`]).
pub const RUN_FAILURE_REASON_TAG: &str = "run_failure_reason";
/// Id of the retry submitted for this run. Durable "already retried" marker.
pub const AUTO_RETRY_RUN_ID_TAG: &str = "auto_retry_run_id";
/// Id of the run this run re-executes.
pub const PARENT_RUN_ID_TAG: &str = "parent_run_id";
/// Id of the first run of the lineage.
pub const ROOT_RUN_ID_TAG: &str = "root_run_id";
/// `"true"` when the run resumes from the point of failure.
pub const IS_RESUME_RETRY_TAG: &str = "is_resume_retry";

/// Bookkeeping tags that describe one specific attempt and must not leak into
/// a re-execution that inherits its parent's tags.
pub const TAGS_TO_OMIT_ON_RETRY: &[&str] = &[
    WILL_RETRY_TAG,
    AUTO_RETRY_RUN_ID_TAG,
    RUN_FAILURE_REASON_TAG,
    RETRY_NUMBER_TAG,
    PARENT_RUN_ID_TAG,
    ROOT_RUN_ID_TAG,
    IS_RESUME_RETRY_TAG,
];

/// Interpret an optional tag value as a boolean.
///
/// Absent values fall back to `default`. Present values are false only when they
/// read `false`, `none`, `0` or nothing at all (case-insensitive).
pub fn boolean_tag_value(value: Option<&str>, default: bool) -> bool {
    match value {
        None => default,
        Some(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            !matches!(normalized.as_str(), "false" | "none" | "0" | "")
        }
    }
}

/// Canonical string form used when writing boolean tags.
pub fn bool_tag_value(value: bool) -> String {
    let raw = if value { "true" } else { "false" };
    raw.to_string()
}

/// Unique string keys mapped to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunTags(BTreeMap<String, String>);

impl RunTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Merge `other` into `self`; keys present in both take `other`'s value.
    pub fn merge(&mut self, other: &RunTags) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Copy of these tags without the given keys.
    pub fn without(&self, keys: &[&str]) -> RunTags {
        self.0
            .iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Boolean view of a tag, see [`boolean_tag_value`].
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        boolean_tag_value(self.get(key), default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RunTags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for RunTags {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_tags_default_when_absent() {
        assert!(boolean_tag_value(None, true));
        assert!(!boolean_tag_value(None, false));
    }

    #[test]
    fn boolean_tags_are_false_only_for_falsy_spellings() {
        for falsy in ["false", "False", "FALSE", "none", "0", "", "  "] {
            assert!(!boolean_tag_value(Some(falsy), true), "{falsy:?} should be false");
        }
        for truthy in ["true", "True", "1", "yes"] {
            assert!(boolean_tag_value(Some(truthy), false), "{truthy:?} should be true");
        }
    }

    #[test]
    fn merge_is_last_write_wins() {
        let mut tags = RunTags::new().with("a", "1").with("b", "2");
        tags.merge(&RunTags::new().with("b", "3").with("c", "4"));

        assert_eq!(tags.get("a"), Some("1"));
        assert_eq!(tags.get("b"), Some("3"));
        assert_eq!(tags.get("c"), Some("4"));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn without_drops_retry_bookkeeping() {
        let tags = RunTags::new()
            .with("team", "data")
            .with(WILL_RETRY_TAG, "true")
            .with(AUTO_RETRY_RUN_ID_TAG, "abc")
            .with(MAX_RETRIES_TAG, "3");

        let inherited = tags.without(TAGS_TO_OMIT_ON_RETRY);

        assert_eq!(inherited.get("team"), Some("data"));
        assert_eq!(inherited.get(MAX_RETRIES_TAG), Some("3"));
        assert!(!inherited.contains(WILL_RETRY_TAG));
        assert!(!inherited.contains(AUTO_RETRY_RUN_ID_TAG));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

            #[test]
            fn inherited_tags_never_carry_bookkeeping(
                user in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,6}", 0..8),
                bookkeeping in proptest::sample::subsequence(TAGS_TO_OMIT_ON_RETRY.to_vec(), 0..TAGS_TO_OMIT_ON_RETRY.len()),
            ) {
                let mut tags: RunTags = user.clone().into_iter().collect();
                for key in &bookkeeping {
                    tags.insert(*key, "x");
                }

                let inherited = tags.without(TAGS_TO_OMIT_ON_RETRY);

                for key in TAGS_TO_OMIT_ON_RETRY {
                    prop_assert!(!inherited.contains(key));
                }
                for (k, v) in &user {
                    if !TAGS_TO_OMIT_ON_RETRY.contains(&k.as_str()) {
                        prop_assert_eq!(inherited.get(k), Some(v.as_str()));
                    }
                }
            }

            #[test]
            fn written_booleans_read_back(value in any::<bool>(), default in any::<bool>()) {
                let tags = RunTags::new().with(WILL_RETRY_TAG, bool_tag_value(value));
                prop_assert_eq!(tags.get_bool(WILL_RETRY_TAG, default), value);
            }
        }
    }
}
