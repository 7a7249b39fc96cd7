//! DOM extraction and indexing
//!
//! This module turns a session's DOM into addressable data:
//! - [`EncodedId`]: frame-qualified node names (`"<ordinal>-<backendNodeId>"`)
//! - [`xpath`]: positional XPath construction and prefix arithmetic
//! - [`fetch`]: depth-adaptive DOM retrieval with subtree hydration
//! - [`SessionDomIndex`]: per-session node facts, sliceable per frame document

pub mod encoded_id;
pub mod fetch;
pub mod index;
pub mod xpath;

pub use encoded_id::EncodedId;
pub use fetch::{DomFetchConfig, get_dom_tree_with_fallback, hydrate_dom_tree};
pub use index::{FrameDomMaps, SessionDomIndex, build_session_dom_index};
