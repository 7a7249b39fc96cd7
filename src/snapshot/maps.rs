use crate::dom::EncodedId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Map of encoded element ids to a string (an XPath or a URL).
/// Uses IndexMap to preserve frame-then-document insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementMap {
    map: IndexMap<EncodedId, String>,
}

impl ElementMap {
    /// Create a new empty ElementMap
    pub fn new() -> Self {
        Self { map: IndexMap::new() }
    }

    /// Insert a value, keeping the position of an existing key
    pub fn insert(&mut self, id: EncodedId, value: impl Into<String>) {
        self.map.insert(id, value.into());
    }

    pub fn get(&self, id: &EncodedId) -> Option<&str> {
        self.map.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &EncodedId) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over all (id, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&EncodedId, &str)> {
        self.map.iter().map(|(id, v)| (id, v.as_str()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &EncodedId> {
        self.map.keys()
    }

    /// Entries belonging to one frame
    pub fn for_frame(&self, frame_ordinal: usize) -> impl Iterator<Item = (&EncodedId, &str)> {
        self.iter().filter(move |(id, _)| id.frame_ordinal == frame_ordinal)
    }

    /// Add every entry of `other`; existing keys are overwritten in place
    pub fn extend(&mut self, other: &ElementMap) {
        for (id, value) in other.iter() {
            self.insert(*id, value);
        }
    }

    /// Export to JSON for debugging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.map)
    }
}

impl FromIterator<(EncodedId, String)> for ElementMap {
    fn from_iter<I: IntoIterator<Item = (EncodedId, String)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}
