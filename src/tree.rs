//! Typed configuration tree with path addressing.
//!
//! A [`ConfigTree`] is an ordered mapping of string keys to [`ConfigValue`]s.
//! Paths are `/`-delimited ([`PathSpec`]). Resolution fails closed: any
//! missing segment makes the whole path absent. Grafting is a pure operation
//! that consumes the tree and returns the updated one.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DeployError, Result};

/// Scalar leaf value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

impl Scalar {
    /// Non-empty string content, if this is a string leaf
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
            Scalar::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// A node in the configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Node(ConfigTree),
    List(Vec<ConfigValue>),
    Leaf(Scalar),
}

impl ConfigValue {
    /// Look up a direct child by path segment.
    /// Lists are addressed by decimal index.
    pub fn child(&self, segment: &str) -> Option<&ConfigValue> {
        match self {
            ConfigValue::Node(tree) => tree.get(segment),
            ConfigValue::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            ConfigValue::Leaf(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&ConfigTree> {
        match self {
            ConfigValue::Node(tree) => Some(tree),
            _ => None,
        }
    }

    /// Build a list of string leaves
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConfigValue::List(
            items
                .into_iter()
                .map(|s| ConfigValue::Leaf(Scalar::String(s.into())))
                .collect(),
        )
    }

    /// Turn any value into a node so children can be attached.
    /// List elements keep their index as key; leaves are discarded.
    fn into_node(self) -> ConfigTree {
        match self {
            ConfigValue::Node(tree) => tree,
            ConfigValue::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            ConfigValue::Leaf(_) => ConfigTree::new(),
        }
    }
}

impl From<Scalar> for ConfigValue {
    fn from(value: Scalar) -> Self {
        ConfigValue::Leaf(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Leaf(value.into())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Leaf(value.into())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Leaf(value.into())
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Leaf(value.into())
    }
}

impl From<ConfigTree> for ConfigValue {
    fn from(tree: ConfigTree) -> Self {
        ConfigValue::Node(tree)
    }
}

/// Ordered mapping from keys to values, preserving insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(IndexMap<String, ConfigValue>);

impl ConfigTree {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigValue> {
        self.0.get_mut(key)
    }

    /// Insert or replace a direct child, keeping its position if it existed
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a direct child, keeping sibling order
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ConfigValue)> for ConfigTree {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ConfigTree {
    type Item = (String, ConfigValue);
    type IntoIter = indexmap::map::IntoIter<String, ConfigValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Slash-delimited address into a [`ConfigTree`].
/// Every segment is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSpec(String);

impl PathSpec {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || s.split('/').any(str::is_empty) {
            return Err(DeployError::InvalidPath {
                path: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Append further segments below this path
    pub fn join(&self, rest: &str) -> Result<Self> {
        Self::parse(&format!("{}/{}", self.0, rest))
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PathSpec {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Resolve a path against a tree. Absent if any segment is missing.
pub fn resolve_path<'a>(tree: &'a ConfigTree, path: &PathSpec) -> Option<&'a ConfigValue> {
    let mut segments = path.segments();
    let first = segments.next()?;
    segments.try_fold(tree.get(first)?, |value, segment| value.child(segment))
}

/// Graft `value` at `path`, creating intermediate nodes as needed.
/// Whatever was at the tail is replaced, siblings along the way are kept.
pub fn merge_at_path(tree: ConfigTree, path: &PathSpec, value: ConfigValue) -> ConfigTree {
    let segments: Vec<&str> = path.segments().collect();
    graft(tree, &segments, value)
}

fn graft(mut node: ConfigTree, segments: &[&str], value: ConfigValue) -> ConfigTree {
    match segments {
        [] => node,
        [last] => {
            node.insert(*last, value);
            node
        }
        [head, rest @ ..] => {
            let child = node
                .remove_in_place(head)
                .map(ConfigValue::into_node)
                .unwrap_or_default();
            node.insert(*head, ConfigValue::Node(graft(child, rest, value)));
            node
        }
    }
}

impl ConfigTree {
    /// Take a child out without disturbing its position on reinsert.
    fn remove_in_place(&mut self, key: &str) -> Option<ConfigValue> {
        self.0
            .get_mut(key)
            .map(|slot| std::mem::replace(slot, ConfigValue::Leaf(Scalar::Null)))
    }
}

/// Remove the value at `path` if present, returning the updated tree and
/// the removed value. Intermediate nodes are left in place even if emptied.
pub fn remove_at_path(mut tree: ConfigTree, path: &PathSpec) -> (ConfigTree, Option<ConfigValue>) {
    let segments: Vec<&str> = path.segments().collect();
    let removed = remove_segments(&mut tree, &segments);
    (tree, removed)
}

fn remove_segments(node: &mut ConfigTree, segments: &[&str]) -> Option<ConfigValue> {
    match segments {
        [] => None,
        [last] => node.remove(last),
        [head, rest @ ..] => match node.get_mut(head)? {
            ConfigValue::Node(child) => remove_segments(child, rest),
            _ => None,
        },
    }
}

/// Leaf-only projection of a tree: full path to scalar value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedConfig(IndexMap<String, Scalar>);

/// How a pattern is matched against flattened keys.
/// Matches respect segment boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// Key ends with the pattern
    Suffix,
    /// Key starts with the pattern
    Prefix,
}

impl KeyMatch {
    pub fn matches(self, key: &str, pattern: &str) -> bool {
        if key == pattern {
            return true;
        }
        match self {
            KeyMatch::Suffix => key
                .strip_suffix(pattern)
                .is_some_and(|head| head.ends_with('/')),
            KeyMatch::Prefix => key
                .strip_prefix(pattern)
                .is_some_and(|tail| tail.starts_with('/')),
        }
    }
}

impl FlattenedConfig {
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries whose key matches `pattern`
    pub fn filter_entries<'a, 'p>(
        &'a self,
        pattern: &'p str,
        mode: KeyMatch,
    ) -> impl Iterator<Item = (&'a String, &'a Scalar)> + 'p
    where
        'a: 'p,
    {
        self.0
            .iter()
            .filter(move |(key, _)| mode.matches(key, pattern))
    }

    /// Distinct values of the entries whose key matches `pattern`,
    /// in first-seen order
    pub fn filter<'a>(&'a self, pattern: &str, mode: KeyMatch) -> Vec<&'a Scalar> {
        let mut values: Vec<&'a Scalar> = Vec::new();
        for (key, value) in self.0.iter() {
            if !mode.matches(key, pattern) {
                continue;
            }
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }
}

/// Flatten a tree into full-path leaves.
/// List elements are addressed by index; empty containers produce nothing.
pub fn flatten(tree: &ConfigTree) -> FlattenedConfig {
    let mut out = IndexMap::new();
    for (key, value) in tree.iter() {
        flatten_into(value, key.clone(), &mut out);
    }
    FlattenedConfig(out)
}

fn flatten_into(value: &ConfigValue, prefix: String, out: &mut IndexMap<String, Scalar>) {
    match value {
        ConfigValue::Leaf(scalar) => {
            out.insert(prefix, scalar.clone());
        }
        ConfigValue::Node(tree) => {
            for (key, child) in tree.iter() {
                flatten_into(child, format!("{}/{}", prefix, key), out);
            }
        }
        ConfigValue::List(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, format!("{}/{}", prefix, i), out);
            }
        }
    }
}

/// Rebuild a tree from flattened leaves. Lists come back as index-keyed nodes.
pub fn unflatten(flat: &FlattenedConfig) -> Result<ConfigTree> {
    flat.iter().try_fold(ConfigTree::new(), |tree, (key, value)| {
        let path = PathSpec::parse(key)?;
        Ok(merge_at_path(tree, &path, ConfigValue::Leaf(value.clone())))
    })
}
