// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-name pattern routing.
//!
//! Patterns are dot-separated tokens: literals, single-token parameters
//! (`$name`), and a terminal full wildcard (`>`). Matching precedence at
//! each level is literal, then parameter, then full wildcard, with
//! backtracking so a dead literal branch falls back to a parameter one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::handler::Handler;

/// Router from resource names to registered handlers.
///
/// Immutable once the service starts; registration happens only while
/// the service is stopped.
#[derive(Clone, Default)]
pub(crate) struct Router {
    prefix: String,
    root: Node,
}

#[derive(Clone, Default)]
struct Node {
    literals: HashMap<String, Node>,
    param: Option<Box<ParamNode>>,
    /// Leaf for a terminal `>` token at this level.
    wild: Option<Leaf>,
    /// Leaf for a pattern ending exactly here.
    leaf: Option<Leaf>,
}

#[derive(Clone)]
struct ParamNode {
    name: String,
    node: Node,
}

#[derive(Clone)]
struct Leaf {
    handler: Arc<Handler>,
    group: Option<Vec<GroupPart>>,
    pattern: String,
}

#[derive(Clone)]
enum GroupPart {
    Literal(String),
    Param(String),
}

/// A successful lookup: the handler plus everything derived from the
/// matched pattern.
pub(crate) struct Found {
    pub handler: Arc<Handler>,
    pub params: HashMap<String, String>,
    /// Resolved group label; empty when the pattern has none.
    pub group: String,
    pub pattern: String,
}

impl Router {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            root: Node::default(),
        }
    }

    /// Register a handler under a pattern, with an optional group label.
    pub fn add(
        &mut self,
        pattern: &str,
        handler: Arc<Handler>,
        group: Option<&str>,
    ) -> Result<(), Error> {
        let full = merge_pattern(&self.prefix, pattern);
        if full.is_empty() {
            return Err(Error::InvalidPattern("empty pattern".to_string()));
        }

        let tokens: Vec<&str> = full.split('.').collect();
        let mut param_names = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            match validate_token(token, i == tokens.len() - 1)? {
                Token::Param(name) => param_names.push(name.to_string()),
                Token::Literal | Token::FullWildcard => {}
            }
        }

        let group = match group {
            Some(label) => Some(parse_group(label, &param_names, &full)?),
            None => None,
        };
        let leaf = Leaf {
            handler,
            group,
            pattern: full.clone(),
        };

        let mut node = &mut self.root;
        for token in &tokens {
            if *token == ">" {
                // validate_token already rejected a non-terminal `>`
                if node.wild.is_some() {
                    return Err(Error::DuplicatePattern(full));
                }
                node.wild = Some(leaf);
                return Ok(());
            }
            if let Some(name) = token.strip_prefix('$') {
                let param = node
                    .param
                    .get_or_insert_with(|| Box::new(ParamNode::new(name)));
                if param.name != name {
                    // two parameter siblings conflict regardless of name
                    return Err(Error::DuplicatePattern(full));
                }
                node = &mut param.node;
            } else {
                node = node.literals.entry((*token).to_string()).or_default();
            }
        }
        if node.leaf.is_some() {
            return Err(Error::DuplicatePattern(full));
        }
        node.leaf = Some(leaf);
        Ok(())
    }

    /// Look up the handler for a resource name.
    pub fn get(&self, rname: &str) -> Option<Found> {
        if rname.is_empty() {
            return None;
        }
        let tokens: Vec<&str> = rname.split('.').collect();
        let mut captured = Vec::new();
        let leaf = match_node(&self.root, &tokens, 0, &mut captured)?;

        let group = leaf
            .group
            .as_ref()
            .map(|parts| resolve_group(parts, &captured))
            .unwrap_or_default();

        Some(Found {
            handler: Arc::clone(&leaf.handler),
            params: captured.into_iter().collect(),
            group,
            pattern: leaf.pattern.clone(),
        })
    }

    /// Enumerate registered patterns for the system reset event:
    /// patterns whose handler serves get requests, and patterns whose
    /// handler serves access requests. Both lists are sorted.
    pub fn reset_patterns(&self) -> (Vec<String>, Vec<String>) {
        let mut resources = Vec::new();
        let mut access = Vec::new();
        collect_reset(&self.root, &mut resources, &mut access);
        resources.sort();
        access.sort();
        (resources, access)
    }
}

impl ParamNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            node: Node::default(),
        }
    }
}

enum Token<'a> {
    Literal,
    Param(&'a str),
    FullWildcard,
}

fn validate_token<'a>(token: &'a str, last: bool) -> Result<Token<'a>, Error> {
    if token == ">" {
        if !last {
            return Err(Error::InvalidPattern(
                "full wildcard only allowed in last position".to_string(),
            ));
        }
        return Ok(Token::FullWildcard);
    }
    if let Some(name) = token.strip_prefix('$') {
        if name.is_empty() || !is_valid_name(name) {
            return Err(Error::InvalidPattern(format!(
                "invalid parameter token: {}",
                token
            )));
        }
        return Ok(Token::Param(name));
    }
    if token.is_empty() || !is_valid_name(token) {
        return Err(Error::InvalidPattern(format!("invalid token: {}", token)));
    }
    Ok(Token::Literal)
}

fn is_valid_name(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Merge a pattern with the service-wide prefix.
fn merge_pattern(prefix: &str, pattern: &str) -> String {
    if prefix.is_empty() {
        pattern.to_string()
    } else if pattern.is_empty() {
        prefix.to_string()
    } else {
        format!("{}.{}", prefix, pattern)
    }
}

/// Translate a pattern into a bus subscription subject, replacing each
/// parameter token with the bus-level single-token wildcard.
pub(crate) fn subject_pattern(pattern: &str) -> String {
    pattern
        .split('.')
        .map(|t| if t.starts_with('$') { "*" } else { t })
        .collect::<Vec<_>>()
        .join(".")
}

fn match_node<'a>(
    node: &'a Node,
    tokens: &[&str],
    depth: usize,
    captured: &mut Vec<(String, String)>,
) -> Option<&'a Leaf> {
    if depth == tokens.len() {
        return node.leaf.as_ref();
    }
    if let Some(child) = node.literals.get(tokens[depth]) {
        if let Some(leaf) = match_node(child, tokens, depth + 1, captured) {
            return Some(leaf);
        }
    }
    if let Some(param) = &node.param {
        captured.push((param.name.clone(), tokens[depth].to_string()));
        if let Some(leaf) = match_node(&param.node, tokens, depth + 1, captured) {
            return Some(leaf);
        }
        captured.pop();
    }
    // `>` consumes this and all remaining tokens
    node.wild.as_ref()
}

fn parse_group(
    label: &str,
    param_names: &[String],
    pattern: &str,
) -> Result<Vec<GroupPart>, Error> {
    let mut parts = Vec::new();
    let mut rest = label;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            parts.push(GroupPart::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            Error::InvalidGroup(format!("unterminated parameter reference in: {}", label))
        })?;
        let name = &after[..end];
        if !param_names.iter().any(|p| p == name) {
            return Err(Error::InvalidGroup(format!(
                "group references parameter ${} not present in pattern {}",
                name, pattern
            )));
        }
        parts.push(GroupPart::Param(name.to_string()));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        parts.push(GroupPart::Literal(rest.to_string()));
    }
    Ok(parts)
}

fn resolve_group(parts: &[GroupPart], captured: &[(String, String)]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            GroupPart::Literal(s) => out.push_str(s),
            GroupPart::Param(name) => {
                if let Some((_, value)) = captured.iter().find(|(n, _)| n == name) {
                    out.push_str(value);
                }
            }
        }
    }
    out
}

fn collect_reset(node: &Node, resources: &mut Vec<String>, access: &mut Vec<String>) {
    for leaf in node.leaf.iter().chain(node.wild.iter()) {
        if leaf.handler.has_get() {
            resources.push(leaf.pattern.clone());
        }
        if leaf.handler.has_access() {
            access.push(leaf.pattern.clone());
        }
    }
    for child in node.literals.values() {
        collect_reset(child, resources, access);
    }
    if let Some(param) = &node.param {
        collect_reset(&param.node, resources, access);
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
