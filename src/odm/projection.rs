//! Field projections (`select`).

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::odm::ID_KEY;
use crate::odm::error::ModelError;
use crate::odm::filter::segments;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf,
    Branch(BTreeMap<String, Node>),
}

/// Parsed field selection.
///
/// Either an inclusion list (`"title author"`) or an exclusion list
/// (`"-body -likes"`). Tokens may be separated by whitespace or commas and
/// may be dotted paths. `_id` is kept by inclusion lists unless `-_id` is
/// given.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    include: bool,
    keep_id: bool,
    tree: BTreeMap<String, Node>,
}

impl Projection {
    /// Parses a selection string.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidProjection`] when the string selects
    /// nothing or mixes inclusions and exclusions (`-_id` excepted).
    pub fn parse(spec: &str) -> Result<Self, ModelError> {
        let tokens: Vec<&str> = spec
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            return Err(ModelError::InvalidProjection(
                "selection must name at least one field".to_string(),
            ));
        }

        let mut keep_id = true;
        let mut included = Vec::new();
        let mut excluded = Vec::new();

        for token in tokens {
            match token.strip_prefix('-') {
                Some(ID_KEY) => keep_id = false,
                Some(path) => excluded.push(path),
                None => included.push(token),
            }
        }

        if !included.is_empty() && !excluded.is_empty() {
            return Err(ModelError::InvalidProjection(
                "cannot mix inclusion and exclusion".to_string(),
            ));
        }

        let include = excluded.is_empty() && !included.is_empty();
        let paths = if include { included } else { excluded };

        let mut tree = BTreeMap::new();
        for path in paths {
            let segments = segments(path);
            if segments.is_empty() {
                return Err(ModelError::InvalidProjection(format!(
                    "invalid field path `{path}`"
                )));
            }
            insert(&mut tree, &segments);
        }

        if !include && !keep_id {
            tree.insert(ID_KEY.to_string(), Node::Leaf);
        }

        Ok(Self {
            include,
            keep_id,
            tree,
        })
    }

    /// Applies the projection to a raw document in place.
    pub fn apply(&self, doc: &mut Map<String, Value>) {
        if self.include {
            let mut projected = include_map(doc, &self.tree);
            if self.keep_id
                && let Some(id) = doc.get(ID_KEY)
            {
                projected.insert(ID_KEY.to_string(), id.clone());
            }
            *doc = projected;
        } else {
            exclude_map(doc, &self.tree);
        }
    }
}

fn insert(tree: &mut BTreeMap<String, Node>, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        tree.insert(head.to_string(), Node::Leaf);
        return;
    }

    let node = tree
        .entry(head.to_string())
        .or_insert_with(|| Node::Branch(BTreeMap::new()));

    // A shorter path already selects the whole subtree.
    if let Node::Branch(children) = node {
        insert(children, rest);
    }
}

fn include_map(map: &Map<String, Value>, tree: &BTreeMap<String, Node>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, node) in tree {
        let Some(value) = map.get(key) else {
            continue;
        };
        match node {
            Node::Leaf => {
                out.insert(key.clone(), value.clone());
            }
            Node::Branch(children) => {
                if let Some(projected) = include_value(value, children) {
                    out.insert(key.clone(), projected);
                }
            }
        }
    }
    out
}

fn include_value(value: &Value, tree: &BTreeMap<String, Node>) -> Option<Value> {
    match value {
        Value::Object(map) => Some(Value::Object(include_map(map, tree))),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| include_value(item, tree))
                .collect(),
        )),
        _ => None,
    }
}

fn exclude_map(map: &mut Map<String, Value>, tree: &BTreeMap<String, Node>) {
    for (key, node) in tree {
        match node {
            Node::Leaf => {
                map.remove(key);
            }
            Node::Branch(children) => {
                if let Some(value) = map.get_mut(key) {
                    exclude_value(value, children);
                }
            }
        }
    }
}

fn exclude_value(value: &mut Value, tree: &BTreeMap<String, Node>) {
    match value {
        Value::Object(map) => exclude_map(map, tree),
        Value::Array(items) => items.iter_mut().for_each(|item| exclude_value(item, tree)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "_id": "65a1b2c3d4e5f60718293a4b",
            "title": "Hello",
            "body": "Long text",
            "profile": { "bio": "hi", "website": "https://x.dev" },
            "comments": [
                { "author": "u1", "text": "a" },
                { "author": "u2", "text": "b" }
            ]
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn test_inclusion_keeps_id() {
        let mut doc = sample();
        Projection::parse("title").unwrap().apply(&mut doc);
        assert_eq!(
            Value::Object(doc),
            json!({ "_id": "65a1b2c3d4e5f60718293a4b", "title": "Hello" })
        );
    }

    #[test]
    fn test_inclusion_can_drop_id() {
        let mut doc = sample();
        Projection::parse("title -_id").unwrap().apply(&mut doc);
        assert_eq!(Value::Object(doc), json!({ "title": "Hello" }));
    }

    #[test]
    fn test_inclusion_nested_and_arrays() {
        let mut doc = sample();
        Projection::parse("profile.bio, comments.text")
            .unwrap()
            .apply(&mut doc);
        assert_eq!(doc["profile"], json!({ "bio": "hi" }));
        assert_eq!(doc["comments"], json!([{ "text": "a" }, { "text": "b" }]));
        assert!(doc.get("title").is_none());
    }

    #[test]
    fn test_exclusion() {
        let mut doc = sample();
        Projection::parse("-body -comments.author")
            .unwrap()
            .apply(&mut doc);
        assert!(doc.get("body").is_none());
        assert_eq!(doc["title"], "Hello");
        assert_eq!(doc["comments"], json!([{ "text": "a" }, { "text": "b" }]));
        assert!(doc.get("_id").is_some());
    }

    #[test]
    fn test_exclusion_of_id_only() {
        let mut doc = sample();
        Projection::parse("-_id").unwrap().apply(&mut doc);
        assert!(doc.get("_id").is_none());
        assert_eq!(doc["title"], "Hello");
    }

    #[test]
    fn test_shorter_path_wins() {
        let mut doc = sample();
        Projection::parse("profile profile.bio")
            .unwrap()
            .apply(&mut doc);
        assert_eq!(doc["profile"]["website"], "https://x.dev");
    }

    #[test]
    fn test_mixed_projection_is_rejected() {
        assert!(matches!(
            Projection::parse("title -body"),
            Err(ModelError::InvalidProjection(_))
        ));
    }

    #[test]
    fn test_empty_projection_is_rejected() {
        assert!(Projection::parse("  , ").is_err());
        assert!(Projection::parse("...").is_err());
    }
}
