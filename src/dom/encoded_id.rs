use crate::error::BrowserError;
use crate::protocol::BackendNodeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// External name for a DOM node: `"<frame-ordinal>-<backend-node-id>"`.
///
/// Only valid within the capture that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodedId {
    pub frame_ordinal: usize,
    pub backend_node_id: BackendNodeId,
}

impl EncodedId {
    pub fn new(frame_ordinal: usize, backend_node_id: BackendNodeId) -> Self {
        Self {
            frame_ordinal,
            backend_node_id,
        }
    }
}

impl fmt::Display for EncodedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.frame_ordinal, self.backend_node_id)
    }
}

impl FromStr for EncodedId {
    type Err = BrowserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BrowserError::InvalidSelector(format!("'{}' is not an encoded element id", s));
        let (ordinal, backend) = s.trim().split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            frame_ordinal: ordinal.parse().map_err(|_| invalid())?,
            backend_node_id: backend.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for EncodedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EncodedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
