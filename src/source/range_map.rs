//! Range-key index for equality-joined links.
//!
//! A link whose source relation reads `domainKey==rangeKey` attaches every range
//! node whose `rangeKey` equals the domain node's `domainKey`. Scanning the range
//! collection once per domain node is quadratic, so the first lookup for a given
//! `(domain, path, range)` expression triple indexes every range node by its key
//! and later lookups in the same run reuse the index.

use std::collections::HashMap;

use crate::error::ConfigError;

use super::{SourceAdapter, XNode};

/// Join key → range nodes carrying that key, in document order.
pub type RangeMap<'a, 'i> = HashMap<String, Vec<XNode<'a, 'i>>>;

/// Per-run cache of range maps.
#[derive(Debug, Default)]
pub struct RangeMapCache<'a, 'i> {
    maps: HashMap<String, RangeMap<'a, 'i>>,
    builds: usize,
}

impl<'a, 'i> RangeMapCache<'a, 'i> {
    /// Number of distinct indexes held.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// How many times an index was built (a cache miss).
    pub fn builds(&self) -> usize {
        self.builds
    }
}

/// Identity of one range map.
///
/// Relative range expressions depend on where they are evaluated, so the base
/// node's structural path becomes part of the key for them.
pub fn range_map_key(domain_expr: &str, path_expr: &str, range_expr: &str, base: Option<&str>) -> String {
    match base {
        Some(base) => format!("{domain_expr}/{path_expr}/{range_expr}@{base}"),
        None => format!("{domain_expr}/{path_expr}/{range_expr}"),
    }
}

impl<'a, 'i> SourceAdapter<'a, 'i> {
    /// Range nodes whose `range_key` equals `key_value`.
    ///
    /// `range_expr` is evaluated against `base` (absolute expressions ignore it).
    /// The key is read from each range node, or from its parent when the node
    /// itself has none. Range nodes without a key are logged and left out.
    pub fn joined_range_nodes(
        &mut self,
        cache_key: &str,
        base: XNode<'a, 'i>,
        range_expr: &str,
        range_key: &str,
        key_value: &str,
    ) -> Result<Vec<XNode<'a, 'i>>, ConfigError> {
        if !self.range_maps.maps.contains_key(cache_key) {
            let map = self.build_range_map(base, range_expr, range_key)?;
            self.range_maps.maps.insert(cache_key.to_string(), map);
            self.range_maps.builds += 1;
        }
        Ok(self
            .range_maps
            .maps
            .get(cache_key)
            .and_then(|map| map.get(key_value))
            .cloned()
            .unwrap_or_default())
    }

    fn build_range_map(
        &mut self,
        base: XNode<'a, 'i>,
        range_expr: &str,
        range_key: &str,
    ) -> Result<RangeMap<'a, 'i>, ConfigError> {
        let mut map: RangeMap<'a, 'i> = HashMap::new();
        let nodes = self.select(base, range_expr)?;
        tracing::debug!(range = range_expr, key = range_key, nodes = nodes.len(), "building range map");
        for node in nodes {
            let mut key = self.scalar(node, range_key)?;
            if key.is_empty() {
                if let Some(parent) = node.parent() {
                    key = self.scalar(XNode::Node(parent), range_key)?;
                }
            }
            if key.is_empty() {
                tracing::warn!(
                    xpath = %node.structural_path(),
                    key = range_key,
                    "empty join key on range node"
                );
                continue;
            }
            map.entry(key).or_default().push(node);
        }
        Ok(map)
    }
}
