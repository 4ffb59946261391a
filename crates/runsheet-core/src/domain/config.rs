//! Resolved run configuration and config diffs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::value::CellValue;

/// Config key -> value for one run, after overlaying the run's cells on the defaults.
/// Never contains `run_name`, `status` or `worker_name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunConfig(BTreeMap<String, CellValue>);

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: CellValue) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CellValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Fill keys the table does not know about from hard-coded fallbacks.
    ///
    /// Table values win; fallbacks only cover keys missing from the table.
    pub fn with_fallbacks(&self, fallbacks: &RunConfig) -> RunConfig {
        let mut merged = fallbacks.clone();
        for (key, value) in &self.0 {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Keys whose value in `self` is new or differs from `baseline`.
    ///
    /// Columns never disappear within a session, so keys missing from `self`
    /// are not reported.
    pub fn changed_since(&self, baseline: &RunConfig) -> BTreeSet<String> {
        self.0
            .iter()
            .filter(|(key, value)| !baseline.get(key).is_some_and(|old| old.same_as(value)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, CellValue> {
        self.0
    }
}

impl From<BTreeMap<String, CellValue>> for RunConfig {
    fn from(map: BTreeMap<String, CellValue>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, CellValue)> for RunConfig {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RunConfig {
    type Item = (&'a String, &'a CellValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, CellValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
