//! Content document models
//!
//! Two document shapes carry fact-consuming nodes:
//! - `content`: nodes partitioned by language
//! - `footnotes`: a flat list of footnotes, each tagged with one language
//!
//! Both implement [`FactSource`] so extraction, injection and reconciliation
//! never need to know which shape they are working on.

use crate::models::SyncStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed per-node flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFlags {
    /// Node is not managed through the cache at all
    pub exempt: bool,
    /// Render with empty text regardless of the cached value
    pub hide_value: bool,
    /// Read from the cache but never write author edits back
    pub no_cache_update: bool,
}

impl NodeFlags {
    pub fn is_default(&self) -> bool {
        *self == NodeFlags::default()
    }
}

/// A node in the content tree
///
/// Fact-consuming nodes carry a `factId`; table nodes carry a `tableId` and
/// row-major `cells`. Any node may have children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,

    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "NodeFlags::is_default")]
    pub flags: NodeFlags,

    /// Runtime status stamped by the read path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SyncStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    /// Convenience constructor for a fact-consuming leaf
    pub fn fact(fact_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            fact_id: Some(fact_id.into()),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Fact id if present (may still be blank)
    pub fn fact_ref(&self) -> Option<&str> {
        self.fact_id.as_deref()
    }

    /// Depth-first pre-order walk over this node and its descendants
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ContentNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut ContentNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

/// Nodes of one language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSection {
    #[serde(default)]
    pub nodes: Vec<ContentNode>,
}

/// Multi-language content document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDocument {
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageSection>,
}

/// One footnote in a footnote collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footnote {
    pub id: String,
    pub lang: String,
    #[serde(default)]
    pub nodes: Vec<ContentNode>,
}

/// Flat footnote collection, resolved against the project language list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootnoteCollection {
    #[serde(default)]
    pub footnotes: Vec<Footnote>,
}

/// Which languages an operation targets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LanguageScope {
    #[default]
    All,
    Only(String),
}

impl LanguageScope {
    pub fn includes(&self, lang: &str) -> bool {
        match self {
            LanguageScope::All => true,
            LanguageScope::Only(l) => l == lang,
        }
    }

    /// `"all"` (case-insensitive) or a language code
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("all") {
            LanguageScope::All
        } else {
            LanguageScope::Only(value.to_string())
        }
    }
}

/// A document shape that exposes its fact-consuming nodes per language
pub trait FactSource {
    /// Visit every node in document order as `(language, node)`
    fn visit<'a>(&'a self, languages: &[String], visit: &mut dyn FnMut(&str, &'a ContentNode));

    /// Mutable counterpart of [`FactSource::visit`]
    fn visit_mut(&mut self, languages: &[String], visit: &mut dyn FnMut(&str, &mut ContentNode));
}

impl FactSource for ContentDocument {
    // Content documents carry their own languages; the project list is not needed.
    fn visit<'a>(&'a self, _languages: &[String], visit: &mut dyn FnMut(&str, &'a ContentNode)) {
        for (lang, section) in &self.languages {
            for node in &section.nodes {
                node.walk(&mut |n| visit(lang, n));
            }
        }
    }

    fn visit_mut(&mut self, _languages: &[String], visit: &mut dyn FnMut(&str, &mut ContentNode)) {
        for (lang, section) in &mut self.languages {
            for node in &mut section.nodes {
                node.walk_mut(&mut |n| visit(lang, n));
            }
        }
    }
}

impl FactSource for FootnoteCollection {
    fn visit<'a>(&'a self, languages: &[String], visit: &mut dyn FnMut(&str, &'a ContentNode)) {
        for lang in languages {
            for footnote in self.footnotes.iter().filter(|f| &f.lang == lang) {
                for node in &footnote.nodes {
                    node.walk(&mut |n| visit(lang, n));
                }
            }
        }
    }

    fn visit_mut(&mut self, languages: &[String], visit: &mut dyn FnMut(&str, &mut ContentNode)) {
        for lang in languages {
            for footnote in self.footnotes.iter_mut().filter(|f| &f.lang == lang) {
                for node in &mut footnote.nodes {
                    node.walk_mut(&mut |n| visit(lang, n));
                }
            }
        }
    }
}

/// Any supported document, tagged by `kind` on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Document {
    Content(ContentDocument),
    Footnotes(FootnoteCollection),
}

impl Document {
    pub fn as_source(&self) -> &dyn FactSource {
        match self {
            Document::Content(doc) => doc,
            Document::Footnotes(doc) => doc,
        }
    }

    pub fn as_source_mut(&mut self) -> &mut dyn FactSource {
        match self {
            Document::Content(doc) => doc,
            Document::Footnotes(doc) => doc,
        }
    }

    /// All nodes in document order, cloned, for assertions and reports
    pub fn nodes(&self, languages: &[String]) -> Vec<(String, ContentNode)> {
        let mut out = Vec::new();
        self.as_source()
            .visit(languages, &mut |lang, node| out.push((lang.to_string(), node.clone())));
        out
    }

    /// First node carrying `fact_id` in `lang`
    pub fn find_fact(&self, languages: &[String], lang: &str, fact_id: &str) -> Option<ContentNode> {
        self.nodes(languages)
            .into_iter()
            .find(|(l, n)| l == lang && n.fact_ref() == Some(fact_id))
            .map(|(_, n)| n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs() -> Vec<String> {
        vec!["en".to_string(), "nl".to_string()]
    }

    #[test]
    fn test_content_document_parses_tagged_json() {
        let json = r#"{
            "kind": "content",
            "languages": {
                "en": { "nodes": [
                    { "text": "Revenue", "children": [ { "factId": "rev", "text": "10" } ] },
                    { "factId": "ebit", "text": "3", "flags": { "exempt": true } }
                ] }
            }
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();

        let nodes = doc.nodes(&langs());
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].1.fact_ref(), Some("rev"));
        assert!(nodes[2].1.flags.exempt);
    }

    #[test]
    fn test_footnotes_follow_project_language_order() {
        let doc = Document::Footnotes(FootnoteCollection {
            footnotes: vec![
                Footnote {
                    id: "f1".into(),
                    lang: "nl".into(),
                    nodes: vec![ContentNode::fact("a", "een")],
                },
                Footnote {
                    id: "f1".into(),
                    lang: "en".into(),
                    nodes: vec![ContentNode::fact("a", "one")],
                },
                Footnote {
                    id: "f2".into(),
                    lang: "de".into(),
                    nodes: vec![ContentNode::fact("b", "zwei")],
                },
            ],
        });

        let nodes = doc.nodes(&langs());
        let seen: Vec<_> = nodes.iter().map(|(l, n)| (l.as_str(), n.text.as_str())).collect();
        // "de" is not a project language
        assert_eq!(seen, vec![("en", "one"), ("nl", "een")]);
    }

    #[test]
    fn test_visit_mut_reaches_nested_nodes() {
        let mut doc = Document::Content(ContentDocument {
            languages: BTreeMap::from([(
                "en".to_string(),
                LanguageSection {
                    nodes: vec![ContentNode {
                        children: vec![ContentNode::fact("x", "old")],
                        ..Default::default()
                    }],
                },
            )]),
        });

        doc.as_source_mut().visit_mut(&langs(), &mut |_, node| {
            if node.fact_ref() == Some("x") {
                node.text = "new".into();
            }
        });

        assert_eq!(doc.find_fact(&langs(), "en", "x").unwrap().text, "new");
    }

    #[test]
    fn test_language_scope_parse() {
        assert_eq!(LanguageScope::parse("ALL"), LanguageScope::All);
        assert_eq!(LanguageScope::parse("en"), LanguageScope::Only("en".into()));
        assert!(LanguageScope::Only("en".into()).includes("en"));
        assert!(!LanguageScope::Only("en".into()).includes("nl"));
    }
}
