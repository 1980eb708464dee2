//! Endpoint tree: parsed records folded into nested path segments.
//!
//! # Design
//! `/api/v3/tasks/:taskId/score/:direction` becomes
//! `api → v3 → tasks → <param> → score → <param>` with the record attached
//! under its method at the last node. Placeholder segments collapse into a
//! single parameter child per node whatever their literal name, so
//! `/tasks/:id` and `/tasks/:taskId` share a slot. The name seen first is
//! kept only for display.
//!
//! Children are owned, so the tree is acyclic by construction and depth only
//! grows along a path. It is never mutated after `build` and is shared
//! between proxies through an `Arc`.

use std::collections::BTreeMap;

use crate::apidoc::{is_placeholder, parse_apidoc, EndpointRecord, ParsedDoc, SkippedFragment};
use crate::error::ParseError;
use crate::http::HttpMethod;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointNode {
    children: BTreeMap<String, EndpointNode>,
    param: Option<(String, Box<EndpointNode>)>,
    methods: BTreeMap<HttpMethod, EndpointRecord>,
}

impl EndpointNode {
    /// Fold records into a single-rooted tree, in order. A later record for
    /// the same path and method replaces the earlier one.
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = EndpointRecord>,
    {
        let mut root = EndpointNode::default();
        for record in records {
            root.insert(record);
        }
        root
    }

    /// Parse apiDoc text and build the tree, returning the fragments the
    /// parser skipped.
    pub fn from_apidoc(text: &str) -> Result<(Self, Vec<SkippedFragment>), ParseError> {
        let ParsedDoc { endpoints, skipped } = parse_apidoc(text)?;
        tracing::debug!(endpoints = endpoints.len(), skipped = skipped.len(), "built endpoint tree");
        Ok((Self::build(endpoints), skipped))
    }

    fn insert(&mut self, record: EndpointRecord) {
        let mut node = self;
        for segment in &record.segments {
            node = if is_placeholder(segment) {
                let (name, child) = node
                    .param
                    .get_or_insert_with(|| (segment.clone(), Box::default()));
                if name != segment {
                    tracing::debug!(kept = %name, collapsed = %segment, "placeholder names differ");
                }
                child.as_mut()
            } else {
                node.children.entry(segment.clone()).or_default()
            };
        }
        if let Some(previous) = node.methods.insert(record.method, record) {
            tracing::warn!(method = %previous.method, uri = %previous.uri, "duplicate endpoint replaced");
        }
    }

    /// Child for `segment`: the literal child if present, else the parameter
    /// child, which accepts any value.
    pub fn child(&self, segment: &str) -> Option<&EndpointNode> {
        self.children
            .get(segment)
            .or_else(|| self.param.as_ref().map(|(_, child)| child.as_ref()))
    }

    pub fn has_param_child(&self) -> bool {
        self.param.is_some()
    }

    pub fn method(&self, method: HttpMethod) -> Option<&EndpointRecord> {
        self.methods.get(&method)
    }

    pub fn methods(&self) -> impl Iterator<Item = HttpMethod> + '_ {
        self.methods.keys().copied()
    }

    /// A terminal node has at least one method entry.
    pub fn is_terminal(&self) -> bool {
        !self.methods.is_empty()
    }

    /// Segments one can descend into from here; the parameter child is shown
    /// by its placeholder name.
    pub fn keys(&self) -> Vec<&str> {
        self.param
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(self.children.keys().map(String::as_str))
            .collect()
    }

    /// All records below this node, depth-first, literal children before the
    /// parameter child.
    pub fn endpoints(&self) -> Vec<&EndpointRecord> {
        let mut out: Vec<&EndpointRecord> = self.methods.values().collect();
        for child in self.children.values() {
            out.extend(child.endpoints());
        }
        if let Some((_, child)) = &self.param {
            out.extend(child.endpoints());
        }
        out
    }

    fn subnodes(&self) -> impl Iterator<Item = &EndpointNode> {
        self.children
            .values()
            .chain(self.param.iter().map(|(_, child)| child.as_ref()))
    }

    /// Every childless node carries at least one method.
    pub fn leaves_are_terminal(&self) -> bool {
        let has_children = self.subnodes().next().is_some();
        (has_children || self.is_terminal()) && self.subnodes().all(EndpointNode::leaves_are_terminal)
    }

    /// Longest root-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        self.subnodes().map(|c| c.depth() + 1).max().unwrap_or(0)
    }
}
