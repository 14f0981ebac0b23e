//! Migration script rendering.
//!
//! A migration file is a JavaScript-shaped script with one `migrate`
//! call: the first routine applies the change set, the second reverts
//! it. A fingerprint comment on the first line identifies the diff the
//! file was generated from, and a trailing comment block embeds the
//! checkpoint of the schema after the apply routine ran.

use serde_json::Value;

use drift_schema::Rule;

use crate::diff::SchemaDiff;
use crate::error::MigrateResult;
use crate::history::Checkpoint;
use crate::ops::Operation;

/// Marker prefix of the fingerprint comment.
pub const FINGERPRINT_PREFIX: &str = "// fingerprint:";
/// Marker line opening the checkpoint block.
pub const CHECKPOINT_BEGIN: &str = "// checkpoint:begin";
/// Marker line closing the checkpoint block.
pub const CHECKPOINT_END: &str = "// checkpoint:end";

/// Render a complete migration script.
pub fn render_script(
    fingerprint: &str,
    apply: &[Operation],
    revert: &[Operation],
    checkpoint: &Checkpoint,
) -> MigrateResult<String> {
    let mut out = String::new();

    out.push_str(FINGERPRINT_PREFIX);
    out.push(' ');
    out.push_str(fingerprint);
    out.push('\n');

    out.push_str("migrate((db) => {\n");
    for operation in apply {
        out.push_str(&render_operation(operation)?);
    }
    out.push_str("}, (db) => {\n");
    for operation in revert {
        out.push_str(&render_operation(operation)?);
    }
    out.push_str("});\n");

    out.push('\n');
    out.push_str(CHECKPOINT_BEGIN);
    out.push('\n');
    for line in serde_json::to_string_pretty(checkpoint)?.lines() {
        out.push_str("// ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(CHECKPOINT_END);
    out.push('\n');

    Ok(out)
}

/// Render one operation as a statement of the script body.
fn render_operation(operation: &Operation) -> MigrateResult<String> {
    Ok(match operation {
        Operation::CreateCollection(collection) => {
            let json = serde_json::to_value(collection)?;
            format!("  db.createCollection({});\n", multiline(&json)?)
        }
        Operation::DeleteCollection { collection } => {
            format!("  db.deleteCollection({});\n", js_string(collection)?)
        }
        Operation::AddField { collection, field } => {
            let json = serde_json::to_value(field)?;
            format!(
                "  db.addField({}, {});\n",
                js_string(collection)?,
                multiline(&json)?
            )
        }
        Operation::RemoveField { collection, field } => {
            format!(
                "  db.removeField({}, {});\n",
                js_string(collection)?,
                js_string(field)?
            )
        }
        Operation::UpdateField {
            collection,
            field,
            patch,
        } => {
            let json = serde_json::to_string(patch)?;
            format!(
                "  db.updateField({}, {}, {});\n",
                js_string(collection)?,
                js_string(field)?,
                json
            )
        }
        Operation::AddIndex { collection, index } => {
            format!(
                "  db.addIndex({}, {});\n",
                js_string(collection)?,
                js_string(index)?
            )
        }
        Operation::RemoveIndex { collection, index } => {
            format!(
                "  db.removeIndex({}, {});\n",
                js_string(collection)?,
                js_string(index)?
            )
        }
        Operation::SetRule {
            collection,
            slot,
            rule,
        } => match rule {
            // Clearing a slot back to unset is the two-argument form;
            // `null` always means locked.
            Rule::Unset => format!(
                "  db.setRule({}, {});\n",
                js_string(collection)?,
                js_string(slot.as_str())?
            ),
            Rule::Locked => format!(
                "  db.setRule({}, {}, null);\n",
                js_string(collection)?,
                js_string(slot.as_str())?
            ),
            Rule::Filter(expr) => format!(
                "  db.setRule({}, {}, {});\n",
                js_string(collection)?,
                js_string(slot.as_str())?,
                js_string(expr)?
            ),
        },
    })
}

/// Pretty-print a JSON value so continuation lines sit inside the call.
fn multiline(value: &Value) -> MigrateResult<String> {
    let json = serde_json::to_string_pretty(value)?;
    Ok(json.lines().collect::<Vec<_>>().join("\n  "))
}

fn js_string(value: &str) -> MigrateResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Derive a file-name slug from the collections a diff touches.
pub(crate) fn slug_for(diff: &SchemaDiff) -> String {
    let mut names: Vec<&str> = Vec::new();
    for name in diff
        .create_collections
        .iter()
        .map(|c| c.name())
        .chain(diff.delete_collections.iter().map(|c| c.name()))
        .chain(diff.modify_collections.iter().map(|cm| cm.name.as_str()))
    {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    match names.len() {
        0 => "update_schema".to_string(),
        1 => {
            let name = slugify(names[0]);
            let only_create = diff.delete_collections.is_empty()
                && diff.modify_collections.is_empty()
                && !diff.create_collections.is_empty();
            let only_delete = diff.create_collections.is_empty()
                && diff.modify_collections.is_empty()
                && !diff.delete_collections.is_empty();
            if only_create {
                format!("create_{name}")
            } else if only_delete {
                format!("delete_{name}")
            } else {
                format!("update_{name}")
            }
        }
        2 | 3 => {
            let joined = names
                .iter()
                .map(|name| slugify(name))
                .collect::<Vec<_>>()
                .join("_");
            format!("update_{joined}")
        }
        n => format!("update_{n}_collections"),
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "collection".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use drift_schema::{Collection, Field, Rule, RuleSlot, Schema};

    use crate::diff::compare;

    use super::*;

    fn checkpoint_of(schema: &Schema) -> Checkpoint {
        Checkpoint::capture(schema).unwrap()
    }

    #[test]
    fn test_script_layout() {
        let mut schema = Schema::new();
        schema.add_collection(Collection::base("posts").field(Field::text("title")));

        let apply = vec![Operation::CreateCollection(
            schema.get_collection("posts").unwrap().clone(),
        )];
        let revert = vec![Operation::DeleteCollection {
            collection: "posts".to_string(),
        }];

        let script =
            render_script("aaaa1111", &apply, &revert, &checkpoint_of(&schema)).unwrap();
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "// fingerprint: aaaa1111");
        assert_eq!(lines[1], "migrate((db) => {");
        assert_eq!(lines[2], "  db.createCollection({");
        assert!(script.contains("}, (db) => {"));
        assert!(script.contains("  db.deleteCollection(\"posts\");"));
        assert!(script.contains("// checkpoint:begin"));
        assert!(script.ends_with("// checkpoint:end\n"));
    }

    #[test]
    fn test_checkpoint_block_lines_are_comments() {
        let mut schema = Schema::new();
        schema.add_collection(Collection::base("posts"));

        let script = render_script("ff00", &[], &[], &checkpoint_of(&schema)).unwrap();
        let mut in_block = false;
        for line in script.lines() {
            if line == CHECKPOINT_BEGIN {
                in_block = true;
            } else if line == CHECKPOINT_END {
                in_block = false;
            } else if in_block {
                assert!(line.starts_with("// "), "not a comment line: {line}");
            }
        }
    }

    #[test]
    fn test_index_strings_are_escaped() {
        let op = Operation::AddIndex {
            collection: "posts".to_string(),
            index: "CREATE UNIQUE INDEX \"idx\" ON posts (title, body)".to_string(),
        };
        let rendered = render_operation(&op).unwrap();
        assert_eq!(
            rendered,
            "  db.addIndex(\"posts\", \"CREATE UNIQUE INDEX \\\"idx\\\" ON posts (title, body)\");\n"
        );
    }

    #[test]
    fn test_set_rule_forms() {
        let rule_op = |rule| Operation::SetRule {
            collection: "posts".to_string(),
            slot: RuleSlot::List,
            rule,
        };

        assert_eq!(
            render_operation(&rule_op(Rule::Unset)).unwrap(),
            "  db.setRule(\"posts\", \"list\");\n"
        );
        assert_eq!(
            render_operation(&rule_op(Rule::Locked)).unwrap(),
            "  db.setRule(\"posts\", \"list\", null);\n"
        );
        assert_eq!(
            render_operation(&rule_op(Rule::open())).unwrap(),
            "  db.setRule(\"posts\", \"list\", \"\");\n"
        );
        assert_eq!(
            render_operation(&rule_op(Rule::filter("id = @request.auth.id"))).unwrap(),
            "  db.setRule(\"posts\", \"list\", \"id = @request.auth.id\");\n"
        );
    }

    #[test]
    fn test_update_field_patch_is_compact() {
        let mut patch = serde_json::Map::new();
        patch.insert("required".to_string(), serde_json::json!(true));
        let op = Operation::UpdateField {
            collection: "posts".to_string(),
            field: "title".to_string(),
            patch,
        };
        assert_eq!(
            render_operation(&op).unwrap(),
            "  db.updateField(\"posts\", \"title\", {\"required\":true});\n"
        );
    }

    #[test]
    fn test_slug_single_collection() {
        let mut desired = Schema::new();
        desired.add_collection(Collection::base("BlogPosts"));

        let create = compare(&desired, None).unwrap();
        assert_eq!(slug_for(&create), "create_blogposts");

        let delete = compare(&Schema::new(), Some(&desired)).unwrap();
        assert_eq!(slug_for(&delete), "delete_blogposts");

        let mut changed = Schema::new();
        changed.add_collection(Collection::base("BlogPosts").field(Field::text("title")));
        let modify = compare(&changed, Some(&desired)).unwrap();
        assert_eq!(slug_for(&modify), "update_blogposts");
    }

    #[test]
    fn test_slug_few_and_many_collections() {
        let mut desired = Schema::new();
        desired.add_collection(Collection::base("posts"));
        desired.add_collection(Collection::base("users"));
        let diff = compare(&desired, None).unwrap();
        assert_eq!(slug_for(&diff), "update_posts_users");

        let mut many = Schema::new();
        for name in ["a", "b", "c", "d", "e"] {
            many.add_collection(Collection::base(name));
        }
        let diff = compare(&many, None).unwrap();
        assert_eq!(slug_for(&diff), "update_5_collections");
    }
}
