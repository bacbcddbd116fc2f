//! The ordered document tree the compiler consumes, plus the JSON
//! front-end that projects into it.
//!
//! The compiler never sees a concrete syntax: any front-end that can
//! produce a [`Document`] — an ordered map of name → (string | map) —
//! plugs in. JSON is the shipped front-end; iteration order always
//! equals authoring order.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::Error;

/// One value in a document: scalar text or a nested ordered map.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Map(Document),
}

impl Node {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Map(_) => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&Document> {
        match self {
            Self::Map(m) => Some(m),
            Self::Text(_) => None,
        }
    }
}

/// An ordered name → [`Node`] map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: IndexMap<String, Node>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous entry of the same name
    /// without disturbing its position.
    pub fn insert(&mut self, name: impl Into<String>, node: Node) {
        self.entries.insert(name.into(), node);
    }

    /// Shorthand for inserting scalar text.
    pub fn insert_text(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.insert(name, Node::Text(text.into()));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.entries.get(name)
    }

    /// Entries in authoring order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Project a JSON object into a document.
    ///
    /// Scalars other than strings (numbers, booleans, `null`) project to
    /// their textual form. Arrays have no projection and are rejected.
    ///
    /// # Errors
    ///
    /// `ParseSyntax` when the input is not valid JSON, the top level is
    /// not an object, or an array value is encountered.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::ParseSyntax(format!("error parsing JSON file: {e}")))?;
        match project_json(&value)? {
            Node::Map(doc) => Ok(doc),
            Node::Text(_) => Err(Error::ParseSyntax("top level item is not an object".into())),
        }
    }

    /// Like [`from_json_str`](Self::from_json_str), but first strips a
    /// trailing comma before a closing `}` on the next line.
    pub fn from_json_str_lenient(json: &str) -> Result<Self, Error> {
        static TRAILING_COMMA: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r",\s*?\n\s*\}").expect("trailing-comma pattern"));
        let sanitized = TRAILING_COMMA.replace_all(json, "}");
        Self::from_json_str(&sanitized)
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Node);
    type IntoIter = indexmap::map::Iter<'a, String, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn project_json(value: &serde_json::Value) -> Result<Node, Error> {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut doc = Document::new();
            for (key, val) in map {
                doc.insert(key.clone(), project_json(val)?);
            }
            Ok(Node::Map(doc))
        }
        Value::String(s) => Ok(Node::Text(s.clone())),
        Value::Number(n) => Ok(Node::Text(n.to_string())),
        Value::Bool(b) => Ok(Node::Text(b.to_string())),
        Value::Null => Ok(Node::Text("null".into())),
        Value::Array(_) => Err(Error::ParseSyntax(
            "arrays have no translation document projection".into(),
        )),
    }
}
