//! Explicit resolution of references (`populate`).
//!
//! For one reference path, the ids found in every result document are
//! collected, fetched from the target collection in a single batch, and
//! either spliced into the plain JSON (lean mode) or attached to the
//! hydrated document.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::odm::ID_KEY;
use crate::odm::error::ModelError;
use crate::odm::filter::segments;
use crate::odm::id::DocumentId;
use crate::odm::model::{Context, Document, Model};
use crate::odm::projection::Projection;
use crate::odm::registry::{ModelDescriptor, RefPath};
use crate::odm::store::RawDocument;

/// One requested reference path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PopulateSpec {
    pub path: String,
    pub select: Option<String>,
}

/// Fails with [`ModelError::UnknownReference`] unless `path` is declared.
fn check_path<'a>(
    owner: &'a ModelDescriptor,
    path: &str,
) -> Result<&'a RefPath, ModelError> {
    owner
        .reference(path)
        .ok_or_else(|| ModelError::UnknownReference {
            model: owner.name,
            path: path.to_string(),
        })
}

/// A populate request checked against the registry, with its projection
/// parsed. Built before the main query touches the store.
pub(crate) struct PreparedPopulate {
    path: String,
    collection: &'static str,
    projection: Option<Projection>,
}

/// Validates `spec` for documents of `owner`.
///
/// # Errors
///
/// - [`ModelError::UnknownReference`] if the path is not declared
/// - [`ModelError::InvalidProjection`] if the selection does not parse
pub(crate) fn prepare(
    context: &Context,
    owner: &ModelDescriptor,
    spec: &PopulateSpec,
) -> Result<PreparedPopulate, ModelError> {
    let reference = check_path(owner, &spec.path)?;
    let target = context
        .registry
        .get(reference.target)
        .ok_or_else(|| ModelError::UnknownModel(reference.target.to_string()))?;
    let projection = spec.select.as_deref().map(Projection::parse).transpose()?;

    Ok(PreparedPopulate {
        path: spec.path.clone(),
        collection: target.collection,
        projection,
    })
}

/// Lean mode: replaces ids at the path by the referenced objects.
///
/// A single id that cannot be resolved becomes `null`; unresolved ids in a
/// list are dropped.
pub(crate) async fn populate_raw(
    context: &Context,
    owner: &ModelDescriptor,
    prepared: &PreparedPopulate,
    docs: &mut [RawDocument],
) -> Result<(), ModelError> {
    let segments = segments(&prepared.path);
    let ids: Vec<DocumentId> = docs
        .iter()
        .flat_map(|doc| collect_ids(doc, &segments))
        .collect();

    let found = fetch_targets(context, owner, prepared, ids).await?;

    for doc in docs.iter_mut() {
        replace_ids(doc, &segments, &found);
    }
    Ok(())
}

/// Hydrated mode: attaches the referenced objects under the path.
pub(crate) async fn populate_documents<M: Model>(
    context: &Context,
    owner: &ModelDescriptor,
    prepared: &PreparedPopulate,
    docs: &mut [Document<M>],
) -> Result<(), ModelError> {
    let segments = segments(&prepared.path);
    let per_doc = docs
        .iter()
        .map(|doc| doc.to_raw().map(|raw| collect_ids(&raw, &segments)))
        .collect::<Result<Vec<_>, _>>()?;

    let ids = per_doc.iter().flatten().copied().collect();
    let found = fetch_targets(context, owner, prepared, ids).await?;

    for (doc, ids) in docs.iter_mut().zip(per_doc) {
        let resolved = ids
            .iter()
            .filter_map(|id| found.get(id).cloned())
            .collect();
        doc.set_populated(&prepared.path, resolved);
    }
    Ok(())
}

async fn fetch_targets(
    context: &Context,
    owner: &ModelDescriptor,
    prepared: &PreparedPopulate,
    ids: Vec<DocumentId>,
) -> Result<HashMap<DocumentId, Value>, ModelError> {
    let mut seen = HashSet::new();
    let unique: Vec<DocumentId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }

    let raws = context
        .store
        .find_by_ids(prepared.collection, &unique)
        .await?;

    tracing::trace!(
        model = owner.name,
        path = %prepared.path,
        requested = unique.len(),
        found = raws.len(),
        "References populated"
    );

    let mut found = HashMap::with_capacity(raws.len());
    for mut raw in raws {
        let Some(id) = raw
            .get(ID_KEY)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DocumentId>().ok())
        else {
            continue;
        };
        if let Some(projection) = &prepared.projection {
            projection.apply(&mut raw);
        }
        found.insert(id, Value::Object(raw));
    }
    Ok(found)
}

/// Ids stored at `segments`, in document order.
fn collect_ids(doc: &RawDocument, segments: &[&str]) -> Vec<DocumentId> {
    let mut ids = Vec::new();
    let Some((head, rest)) = segments.split_first() else {
        return ids;
    };
    if let Some(value) = doc.get(*head) {
        collect_from_value(value, rest, &mut ids);
    }
    ids
}

fn collect_from_value(value: &Value, segments: &[&str], out: &mut Vec<DocumentId>) {
    match (value, segments.split_first()) {
        (Value::String(s), None) => out.extend(s.parse::<DocumentId>().ok()),
        (Value::Array(items), _) => {
            for item in items {
                collect_from_value(item, segments, out);
            }
        }
        (Value::Object(map), Some((head, rest))) => {
            if let Some(child) = map.get(*head) {
                collect_from_value(child, rest, out);
            }
        }
        _ => {}
    }
}

fn replace_ids(doc: &mut RawDocument, segments: &[&str], found: &HashMap<DocumentId, Value>) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if let Some(value) = doc.get_mut(*head) {
        replace_in_value(value, rest, found);
    }
}

fn replace_in_value(value: &mut Value, segments: &[&str], found: &HashMap<DocumentId, Value>) {
    match segments.split_first() {
        None => {
            let replacement = match value {
                Value::String(s) => resolve(s, found).unwrap_or(Value::Null),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .filter_map(|item| item.as_str().and_then(|s| resolve(s, found)))
                        .collect(),
                ),
                _ => return,
            };
            *value = replacement;
        }
        Some((head, rest)) => match value {
            Value::Object(map) => {
                if let Some(child) = map.get_mut(*head) {
                    replace_in_value(child, rest, found);
                }
            }
            Value::Array(items) => {
                for item in items {
                    replace_in_value(item, segments, found);
                }
            }
            _ => {}
        },
    }
}

fn resolve(raw_id: &str, found: &HashMap<DocumentId, Value>) -> Option<Value> {
    raw_id
        .parse::<DocumentId>()
        .ok()
        .and_then(|id| found.get(&id).cloned())
}
