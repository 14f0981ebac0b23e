//! Splitting a diff into sequentially applicable stages.
//!
//! Two dependency shapes cannot be satisfied inside a single apply
//! call: an index added on a field that the same call adds, and
//! relation fields between collections that do not exist until the
//! call completes (mutual or self references). [`split_stages`] turns
//! one diff into an ordered list of stage diffs, each free of such
//! dependencies; the generator writes one migration file per stage.

use std::collections::HashSet;

use crate::diff::{CollectionChange, SchemaDiff};

use drift_schema::Collection;

/// Split a diff into an ordered list of dependency-free stages.
///
/// A diff without internal dependencies yields a single stage; an
/// empty diff yields no stages at all. The input is not modified, and
/// concatenating the stages reproduces every change in the input.
pub fn split_stages(diff: &SchemaDiff) -> Vec<SchemaDiff> {
    if diff.is_empty() {
        return Vec::new();
    }

    let mut stages = Vec::new();
    let mut current = diff.clone();
    loop {
        let (stage, leftover) = first_pass(current);
        stages.push(stage);
        match leftover {
            Some(rest) => current = rest,
            None => break,
        }
    }
    stages
}

/// Extract everything applicable right now; the rest becomes the next
/// stage's input.
fn first_pass(diff: SchemaDiff) -> (SchemaDiff, Option<SchemaDiff>) {
    let (creates, mut deferred) = order_creates(diff.create_collections);
    let changes = defer_dependent_indexes(diff.modify_collections, &mut deferred);

    let stage = SchemaDiff {
        create_collections: creates,
        delete_collections: diff.delete_collections,
        modify_collections: changes,
    };
    if deferred.is_empty() {
        (stage, None)
    } else {
        let leftover = SchemaDiff {
            modify_collections: deferred,
            ..SchemaDiff::default()
        };
        (stage, Some(leftover))
    }
}

/// Order created collections so every intra-diff relation target is
/// created before the collection referencing it.
///
/// Relation cycles are broken at the first unplaced collection in diff
/// order: its offending relation fields (and any of its indexes built
/// on them) move into a follow-up [`CollectionChange`].
fn order_creates(creates: Vec<Collection>) -> (Vec<Collection>, Vec<CollectionChange>) {
    let all: HashSet<String> = creates.iter().map(|c| c.name().to_string()).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut remaining = creates;
    let mut sorted = Vec::with_capacity(remaining.len());
    let mut deferred = Vec::new();

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut i = 0;
        while i < remaining.len() {
            if is_satisfied(&remaining[i], &all, &placed) {
                let collection = remaining.remove(i);
                placed.insert(collection.name().to_string());
                sorted.push(collection);
                progressed = true;
            } else {
                i += 1;
            }
        }
        if !progressed {
            let mut collection = remaining.remove(0);
            deferred.push(strip_unplaced_relations(&mut collection, &all, &placed));
            placed.insert(collection.name().to_string());
            sorted.push(collection);
        }
    }

    (sorted, deferred)
}

/// Whether every relation target of `collection` either already exists
/// outside the diff or has been placed earlier in the stage.
fn is_satisfied(collection: &Collection, all: &HashSet<String>, placed: &HashSet<String>) -> bool {
    collection.fields.values().all(|field| {
        field
            .relation_target()
            .is_none_or(|target| !all.contains(target) || placed.contains(target))
    })
}

/// Remove relation fields whose target is not placed yet, along with
/// the indexes built on them, and return the follow-up change that
/// adds them back once every created collection exists.
fn strip_unplaced_relations(
    collection: &mut Collection,
    all: &HashSet<String>,
    placed: &HashSet<String>,
) -> CollectionChange {
    let mut follow_up = CollectionChange::new(collection.name());

    let fields = std::mem::take(&mut collection.fields);
    for (name, field) in fields {
        let unplaced = field
            .relation_target()
            .is_some_and(|target| all.contains(target) && !placed.contains(target));
        if unplaced {
            follow_up.add_fields.push(field);
        } else {
            collection.fields.insert(name, field);
        }
    }

    let indexes = std::mem::take(&mut collection.indexes);
    for index in indexes {
        let on_moved_field = follow_up
            .add_fields
            .iter()
            .any(|field| references_field(&index, field.name()));
        if on_moved_field {
            follow_up.add_indexes.push(index);
        } else {
            collection.indexes.push(index);
        }
    }

    follow_up
}

/// Move index additions that mention a field added in the same change
/// into follow-up changes.
fn defer_dependent_indexes(
    changes: Vec<CollectionChange>,
    deferred: &mut Vec<CollectionChange>,
) -> Vec<CollectionChange> {
    let mut kept = Vec::with_capacity(changes.len());
    for mut change in changes {
        let indexes = std::mem::take(&mut change.add_indexes);
        let mut follow_up = CollectionChange::new(&change.name);
        for index in indexes {
            let on_new_field = change
                .add_fields
                .iter()
                .any(|field| references_field(&index, field.name()));
            if on_new_field {
                follow_up.add_indexes.push(index);
            } else {
                change.add_indexes.push(index);
            }
        }
        if !follow_up.is_empty() {
            deferred.push(follow_up);
        }
        kept.push(change);
    }
    kept
}

/// Whether an index expression mentions a field name as a whole word.
///
/// Index strings are opaque SQL, so this is a boundary-checked
/// substring test, case-insensitive the way SQL identifiers are.
fn references_field(index: &str, field: &str) -> bool {
    if field.is_empty() {
        return false;
    }
    let haystack = index.to_ascii_lowercase();
    let needle = field.to_ascii_lowercase();
    for (start, _) in haystack.match_indices(&needle) {
        let before = haystack[..start].bytes().next_back();
        let after = haystack[start + needle.len()..].bytes().next();
        let bounded = |b: Option<u8>| b.is_none_or(|b| !b.is_ascii_alphanumeric() && b != b'_');
        if bounded(before) && bounded(after) {
            return true;
        }
    }
    false
}
