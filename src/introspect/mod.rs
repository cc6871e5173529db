//! Introspection data: what an object declares and which children it has.
//!
//! The wire format is the usual XML tree: a root `<node>` holding
//! `<interface>` elements (each with `<method>`/`<signal>` children carrying
//! `<arg>`s) and child `<node name=".."/>` elements.

/// XML to [`IntrospectionNode`].
pub mod parser;
/// [`IntrospectionNode`] to XML.
pub mod render;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use parser::parse_node;
pub use render::render_node;

/// Errors raised while reading introspection data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntrospectError {
    #[error("invalid XML: {0}")]
    Xml(String),

    #[error("expected root element <node>, found <{0}>")]
    UnexpectedRoot(String),

    #[error("<{element}> element without a name attribute")]
    MissingName {
        element: String,
    },
}

/// Member element kinds inside an interface declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Method,
    Signal,
}

impl MemberKind {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Signal => "signal",
        }
    }
}

/// Selects which member element kinds are parsed.
///
/// Interface names are recorded either way; skipping members only saves work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagFilter {
    pub methods: bool,
    pub signals: bool,
}

impl TagFilter {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            methods: true,
            signals: true,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            methods: false,
            signals: false,
        }
    }

    #[must_use]
    pub const fn matches(self, kind: MemberKind) -> bool {
        match kind {
            MemberKind::Method => self.methods,
            MemberKind::Signal => self.signals,
        }
    }
}

/// One `<arg>` of a method or signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDecl {
    pub name: Option<String>,
    pub signature: String,
    pub direction: Option<String>,
}

impl ArgDecl {
    #[must_use]
    pub fn input(name: &str, signature: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            signature: signature.to_string(),
            direction: Some("in".to_string()),
        }
    }

    #[must_use]
    pub fn output(name: &str, signature: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            signature: signature.to_string(),
            direction: Some("out".to_string()),
        }
    }
}

/// One declared interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    pub methods: BTreeMap<String, Vec<ArgDecl>>,
    pub signals: BTreeMap<String, Vec<ArgDecl>>,
}

impl InterfaceDecl {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn method(mut self, name: &str, args: Vec<ArgDecl>) -> Self {
        self.methods.insert(name.to_string(), args);
        self
    }

    #[must_use]
    pub fn signal(mut self, name: &str, args: Vec<ArgDecl>) -> Self {
        self.signals.insert(name.to_string(), args);
        self
    }

    /// Members of `kind`.
    #[must_use]
    pub const fn members(&self, kind: MemberKind) -> &BTreeMap<String, Vec<ArgDecl>> {
        match kind {
            MemberKind::Method => &self.methods,
            MemberKind::Signal => &self.signals,
        }
    }

    fn members_mut(&mut self, kind: MemberKind) -> &mut BTreeMap<String, Vec<ArgDecl>> {
        match kind {
            MemberKind::Method => &mut self.methods,
            MemberKind::Signal => &mut self.signals,
        }
    }
}

/// A parsed (or to-be-rendered) introspection node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionNode {
    pub interfaces: BTreeMap<String, InterfaceDecl>,
    /// Child names as declared, relative to this node.
    pub children: Vec<String>,
}

impl IntrospectionNode {
    #[must_use]
    pub fn declares(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
    }

    pub fn interface_names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    /// True when the remote side listed descendants as full relative paths
    /// (a child name containing `/`) instead of immediate children.
    #[must_use]
    pub fn is_pre_flattened(&self) -> bool {
        self.children.iter().any(|c| c.contains('/'))
    }

    /// Adds or merges an interface declaration.
    pub fn add_interface(&mut self, decl: InterfaceDecl) {
        let entry = self
            .interfaces
            .entry(decl.name.clone())
            .or_insert_with(|| InterfaceDecl::new(decl.name.clone()));
        for kind in [MemberKind::Method, MemberKind::Signal] {
            entry.members_mut(kind).extend(decl.members(kind).clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_flattened_detection() {
        let mut node = IntrospectionNode::default();
        node.children = vec!["a".into(), "b".into()];
        assert!(!node.is_pre_flattened());
        node.children.push("c/d".into());
        assert!(node.is_pre_flattened());
    }

    #[test]
    fn add_interface_merges_members() {
        let mut node = IntrospectionNode::default();
        node.add_interface(InterfaceDecl::new("x.Y").method("A", vec![]));
        node.add_interface(InterfaceDecl::new("x.Y").signal("B", vec![ArgDecl::output("v", "s")]));
        let decl = &node.interfaces["x.Y"];
        assert!(decl.methods.contains_key("A"));
        assert!(decl.signals.contains_key("B"));
        assert!(node.declares("x.Y"));
    }

    #[test]
    fn tag_filter() {
        assert!(TagFilter::all().matches(MemberKind::Signal));
        assert!(!TagFilter::none().matches(MemberKind::Method));
    }
}
