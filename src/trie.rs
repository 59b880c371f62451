//! Segment trie mapping `(method, path)` to a registered value.
//!
//! Nodes live in an arena and refer to their children by index. The tree is
//! filled during registration and only read afterwards, so a built tree can
//! be shared across threads without locking.

use crate::error::{ServerError, ServerResult};
use crate::http::Method;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// Marks a named parameter segment, e.g. `/user/:id`
pub const PARAM_MARKER: char = ':';

/// Marks a trailing wildcard segment, e.g. `/static/*filepath`
pub const WILDCARD_MARKER: char = '*';

type NodeId = usize;

const ROOT: NodeId = 0;

/// One segment of a route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

/// A parsed route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern such as `/files/:owner/*path`
    ///
    /// Fails when the pattern does not start with `/`, when a parameter or
    /// wildcard is unnamed or named twice, or when a wildcard is not the last
    /// segment.
    pub fn parse(raw: &str) -> ServerResult<Self> {
        let body = raw
            .strip_prefix('/')
            .ok_or_else(|| ServerError::pattern(raw, "must begin with '/'"))?;

        let mut segments = Vec::new();
        if body.is_empty() {
            return Ok(Self {
                raw: raw.to_string(),
                segments,
            });
        }

        let parts: Vec<&str> = body.split('/').collect();
        let last = parts.len() - 1;
        let mut names = HashSet::new();

        for (index, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(PARAM_MARKER) {
                Segment::Param(Self::capture_name(raw, name, PARAM_MARKER)?)
            } else if let Some(name) = part.strip_prefix(WILDCARD_MARKER) {
                if index != last {
                    return Err(ServerError::pattern(
                        raw,
                        format!("wildcard '{}{}' must be the last segment", WILDCARD_MARKER, name),
                    ));
                }
                Segment::Wildcard(Self::capture_name(raw, name, WILDCARD_MARKER)?)
            } else {
                Segment::Static(part.to_string())
            };

            if let Segment::Param(name) | Segment::Wildcard(name) = &segment {
                if !names.insert(name.clone()) {
                    return Err(ServerError::pattern(
                        raw,
                        format!("duplicate parameter name '{}'", name),
                    ));
                }
            }

            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    fn capture_name(raw: &str, name: &str, marker: char) -> ServerResult<String> {
        if name.is_empty() {
            return Err(ServerError::pattern(
                raw,
                format!("'{}' must be followed by a name", marker),
            ));
        }
        if name.contains([PARAM_MARKER, WILDCARD_MARKER]) {
            return Err(ServerError::pattern(
                raw,
                format!("invalid parameter name '{}'", name),
            ));
        }
        Ok(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Name of the trailing wildcard, if the pattern ends with one
    pub fn wildcard_name(&self) -> Option<&str> {
        match self.segments.last() {
            Some(Segment::Wildcard(name)) => Some(name),
            _ => None,
        }
    }

    fn capture_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| !matches!(segment, Segment::Static(_)))
            .count()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Path parameters captured by a lookup, in path order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pop(&mut self) {
        self.entries.pop();
    }
}

/// Outcome of a trie lookup
#[derive(Debug)]
pub enum Lookup<'a, T> {
    Matched { value: &'a T, params: Params },
    /// The path exists but not for this method; `allowed` lists the
    /// methods registered at every node the path reaches
    MethodNotAllowed { allowed: Vec<Method> },
    PathNotFound,
}

#[derive(Debug)]
struct Node<T> {
    statics: HashMap<String, NodeId>,
    param: Option<(String, NodeId)>,
    wildcard: Option<(String, NodeId)>,
    values: BTreeMap<Method, T>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            statics: HashMap::new(),
            param: None,
            wildcard: None,
            values: BTreeMap::new(),
        }
    }
}

/// Arena-backed segment trie
#[derive(Debug)]
pub struct PathTrie<T> {
    nodes: Vec<Node<T>>,
    max_params: usize,
}

impl<T> PathTrie<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
            max_params: 0,
        }
    }

    /// Register `value` for `method` at `pattern`
    pub fn insert(&mut self, method: Method, pattern: &Pattern, value: T) -> ServerResult<()> {
        let mut current = ROOT;
        for segment in pattern.segments() {
            current = self.child(current, segment, pattern)?;
        }

        let node = &mut self.nodes[current];
        if node.values.contains_key(&method) {
            return Err(ServerError::RouteConflict {
                method,
                pattern: pattern.as_str().to_string(),
            });
        }
        node.values.insert(method, value);

        self.max_params = self.max_params.max(pattern.capture_count());
        Ok(())
    }

    fn child(&mut self, parent: NodeId, segment: &Segment, pattern: &Pattern) -> ServerResult<NodeId> {
        let existing = match segment {
            Segment::Static(literal) => self.nodes[parent].statics.get(literal).copied(),
            Segment::Param(name) => {
                Self::named_child(&self.nodes[parent].param, name, PARAM_MARKER, pattern)?
            }
            Segment::Wildcard(name) => {
                Self::named_child(&self.nodes[parent].wildcard, name, WILDCARD_MARKER, pattern)?
            }
        };
        if let Some(id) = existing {
            return Ok(id);
        }

        let id = self.nodes.len();
        self.nodes.push(Node::new());

        let node = &mut self.nodes[parent];
        match segment {
            Segment::Static(literal) => {
                node.statics.insert(literal.clone(), id);
            }
            Segment::Param(name) => node.param = Some((name.clone(), id)),
            Segment::Wildcard(name) => node.wildcard = Some((name.clone(), id)),
        }
        Ok(id)
    }

    // A node has at most one parameter child and one wildcard child, so two
    // patterns sharing a prefix must agree on the capture name there.
    fn named_child(
        slot: &Option<(String, NodeId)>,
        name: &str,
        marker: char,
        pattern: &Pattern,
    ) -> ServerResult<Option<NodeId>> {
        match slot {
            Some((existing, id)) if existing == name => Ok(Some(*id)),
            Some((existing, _)) => Err(ServerError::pattern(
                pattern.as_str(),
                format!(
                    "'{marker}{name}' conflicts with existing '{marker}{existing}' at the same position"
                ),
            )),
            None => Ok(None),
        }
    }

    /// Find the value registered for `method` at `path`
    ///
    /// Children are tried static first, then the parameter, then the
    /// wildcard. A wildcard consumes the rest of the path, interior slashes
    /// included, without the leading slash.
    pub fn lookup(&self, method: Method, path: &str) -> Lookup<'_, T> {
        let tail = path.strip_prefix('/').unwrap_or(path);
        let remaining = if tail.is_empty() { None } else { Some(tail) };

        let mut params = Params::with_capacity(self.max_params);
        let mut allowed = BTreeSet::new();

        match self.search(ROOT, remaining, method, &mut params, &mut allowed) {
            Some(id) => match self.nodes[id].values.get(&method) {
                Some(value) => Lookup::Matched { value, params },
                None => Lookup::PathNotFound,
            },
            None if allowed.is_empty() => Lookup::PathNotFound,
            None => Lookup::MethodNotAllowed {
                allowed: allowed.into_iter().collect(),
            },
        }
    }

    fn search(
        &self,
        id: NodeId,
        remaining: Option<&str>,
        method: Method,
        params: &mut Params,
        allowed: &mut BTreeSet<Method>,
    ) -> Option<NodeId> {
        let node = &self.nodes[id];

        let remaining = match remaining {
            Some(remaining) => remaining,
            None => return self.terminal(id, method, allowed),
        };

        let (segment, rest) = match remaining.split_once('/') {
            Some((segment, rest)) => (segment, Some(rest)),
            None => (remaining, None),
        };

        if let Some(&child) = node.statics.get(segment) {
            if let Some(found) = self.search(child, rest, method, params, allowed) {
                return Some(found);
            }
        }

        if let Some((name, child)) = &node.param {
            if !segment.is_empty() {
                params.insert(name, segment);
                if let Some(found) = self.search(*child, rest, method, params, allowed) {
                    return Some(found);
                }
                params.pop();
            }
        }

        if let Some((name, child)) = &node.wildcard {
            if let Some(found) = self.terminal(*child, method, allowed) {
                params.insert(name, remaining);
                return Some(found);
            }
        }

        None
    }

    // Records the methods of a node that matches the path but not `method`,
    // so a miss reports the union over every candidate node.
    fn terminal(&self, id: NodeId, method: Method, allowed: &mut BTreeSet<Method>) -> Option<NodeId> {
        let values = &self.nodes[id].values;
        if values.contains_key(&method) {
            return Some(id);
        }
        allowed.extend(values.keys().copied());
        None
    }

    /// Whether `method` is already registered at `pattern`
    pub fn contains(&self, method: Method, pattern: &Pattern) -> bool {
        let mut current = ROOT;
        for segment in pattern.segments() {
            let node = &self.nodes[current];
            let next = match segment {
                Segment::Static(literal) => node.statics.get(literal).copied(),
                Segment::Param(name) => node
                    .param
                    .as_ref()
                    .filter(|(existing, _)| existing == name)
                    .map(|(_, id)| *id),
                Segment::Wildcard(name) => node
                    .wildcard
                    .as_ref()
                    .filter(|(existing, _)| existing == name)
                    .map(|(_, id)| *id),
            };
            match next {
                Some(id) => current = id,
                None => return false,
            }
        }
        self.nodes[current].values.contains_key(&method)
    }

    /// Transform every stored value, keeping the tree shape
    pub fn map<U, F>(self, mut f: F) -> PathTrie<U>
    where
        F: FnMut(Method, T) -> U,
    {
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| Node {
                statics: node.statics,
                param: node.param,
                wildcard: node.wildcard,
                values: node
                    .values
                    .into_iter()
                    .map(|(method, value)| (method, f(method, value)))
                    .collect(),
            })
            .collect();

        PathTrie {
            nodes,
            max_params: self.max_params,
        }
    }

    /// Number of registered (method, pattern) pairs
    pub fn len(&self) -> usize {
        self.nodes.iter().map(|node| node.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}
