//! Migration script parsing.
//!
//! Parses the scripts the generator writes, plus hand-edited variants of
//! the same shape. The grammar is deliberately narrow: one `migrate`
//! call with two routines, each routine a sequence of
//! `<handle>.<operation>(...)` statements with JSON arguments. Anything
//! the parser does not recognize is a hard error, never a silent skip,
//! because a skipped operation would corrupt every schema replayed on
//! top of it.

use serde_json::Value;

use drift_schema::{Collection, Field, Rule, RuleSlot};

use crate::error::{MigrateError, MigrateResult};
use crate::history::Checkpoint;
use crate::ops::Operation;
use crate::script::{CHECKPOINT_BEGIN, CHECKPOINT_END, FINGERPRINT_PREFIX};

/// Everything a migration script contains.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScript {
    /// Fingerprint stamp, if the file carries one.
    pub fingerprint: Option<String>,
    /// Operations of the apply routine, in order.
    pub apply: Vec<Operation>,
    /// Operations of the revert routine, in order.
    pub revert: Vec<Operation>,
    /// Embedded checkpoint, if the file carries a well-formed one.
    pub checkpoint: Option<Checkpoint>,
}

/// Parse a complete migration script.
pub fn parse_script(source: &str) -> MigrateResult<ParsedScript> {
    let (apply, revert) = parse_migrate_call(source)?;
    Ok(ParsedScript {
        fingerprint: extract_fingerprint(source),
        apply,
        revert,
        checkpoint: extract_checkpoint(source)?,
    })
}

/// Parse only the apply operations of a script.
///
/// This is the seam replay and verification sit behind; they never look
/// at the raw script text themselves.
pub fn parse_operations(source: &str) -> MigrateResult<Vec<Operation>> {
    Ok(parse_migrate_call(source)?.0)
}

/// Extract the fingerprint stamp from a script, if present.
pub fn extract_fingerprint(source: &str) -> Option<String> {
    source
        .lines()
        .find_map(|line| line.trim().strip_prefix(FINGERPRINT_PREFIX))
        .map(|rest| rest.trim().to_string())
        .filter(|stamp| !stamp.is_empty())
}

/// Extract the embedded checkpoint from a script.
///
/// Returns `Ok(None)` when the script carries no checkpoint block at
/// all; a block that is present but broken is an error, and the caller
/// decides whether that is fatal.
pub fn extract_checkpoint(source: &str) -> MigrateResult<Option<Checkpoint>> {
    let mut json = String::new();
    let mut in_block = false;
    let mut found = false;

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed == CHECKPOINT_BEGIN {
            // The trailing block wins if an older one was left behind.
            in_block = true;
            found = true;
            json.clear();
            continue;
        }
        if trimmed == CHECKPOINT_END {
            in_block = false;
            continue;
        }
        if in_block {
            let Some(rest) = trimmed.strip_prefix("//") else {
                return Err(MigrateError::invalid_migration(
                    "checkpoint block holds a non-comment line",
                ));
            };
            json.push_str(rest.strip_prefix(' ').unwrap_or(rest));
            json.push('\n');
        }
    }

    if in_block {
        return Err(MigrateError::invalid_migration(
            "checkpoint block is missing its end marker",
        ));
    }
    if !found {
        return Ok(None);
    }

    let checkpoint = serde_json::from_str(&json).map_err(|err| {
        MigrateError::invalid_migration(format!("checkpoint block is not valid JSON: {err}"))
    })?;
    Ok(Some(checkpoint))
}

/// Parse the `migrate(apply, revert)` call of a script.
fn parse_migrate_call(source: &str) -> MigrateResult<(Vec<Operation>, Vec<Operation>)> {
    let mut cur = Cursor::new(source);

    cur.skip_trivia();
    let start = cur.pos;
    let Some(ident) = cur.eat_ident() else {
        return Err(cur.error("expected a `migrate(...)` call"));
    };
    if ident != "migrate" {
        return Err(MigrateError::script(
            start,
            format!("unknown top-level construct `{ident}`"),
        ));
    }
    cur.skip_trivia();
    cur.expect('(')?;

    let apply = parse_routine(&mut cur)?;
    cur.skip_trivia();
    cur.expect(',')?;
    let revert = parse_routine(&mut cur)?;

    cur.skip_trivia();
    cur.expect(')')?;
    cur.skip_trivia();
    if cur.peek() == Some(';') {
        cur.bump();
    }
    cur.skip_trivia();
    if !cur.at_end() {
        return Err(cur.error("unexpected content after the migrate call"));
    }

    Ok((apply, revert))
}

/// Parse one routine: `(handle) => { ... }` or `function (handle) { ... }`.
fn parse_routine(cur: &mut Cursor) -> MigrateResult<Vec<Operation>> {
    cur.skip_trivia();

    let mut is_function = false;
    if cur.looking_at_ident("function") {
        cur.eat_ident();
        cur.skip_trivia();
        // optional function name
        if cur.peek().is_some_and(is_ident_start) {
            cur.eat_ident();
            cur.skip_trivia();
        }
        is_function = true;
    }

    cur.expect('(')?;
    cur.skip_trivia();
    let Some(handle) = cur.eat_ident() else {
        return Err(cur.error("expected a handle parameter"));
    };
    let handle = handle.to_string();
    cur.skip_trivia();
    cur.expect(')')?;
    cur.skip_trivia();

    if !is_function {
        if !cur.looking_at("=>") {
            return Err(cur.error("expected `=>`"));
        }
        cur.pos += 2;
        cur.skip_trivia();
    }

    cur.expect('{')?;

    let mut operations = Vec::new();
    loop {
        cur.skip_trivia();
        match cur.peek() {
            Some('}') => {
                cur.bump();
                break;
            }
            Some(_) => operations.push(parse_statement(cur, &handle)?),
            None => return Err(cur.error("unterminated routine body")),
        }
    }

    Ok(operations)
}

/// Parse one `<handle>.<operation>(args);` statement.
fn parse_statement(cur: &mut Cursor, handle: &str) -> MigrateResult<Operation> {
    let start = cur.pos;
    let Some(ident) = cur.eat_ident() else {
        return Err(cur.error("expected a statement"));
    };
    if ident != handle {
        return Err(MigrateError::script(
            start,
            format!("unknown construct `{ident}`; only `{handle}.<operation>(...)` is supported"),
        ));
    }
    cur.skip_trivia();
    cur.expect('.')?;
    cur.skip_trivia();
    let Some(method) = cur.eat_ident() else {
        return Err(cur.error("expected an operation name"));
    };
    let method = method.to_string();
    cur.skip_trivia();
    cur.expect('(')?;
    let args = parse_args(cur)?;
    cur.skip_trivia();
    cur.expect(';')?;

    build_operation(start, &method, args)
}

/// Parse the argument list of a call, cursor positioned after `(`.
///
/// Arguments are JSON values; top-level commas separate them, and
/// brackets and string literals nest.
fn parse_args(cur: &mut Cursor) -> MigrateResult<Vec<Value>> {
    let mut args = Vec::new();
    let mut start = cur.pos;
    let mut depth = 0usize;

    loop {
        let Some(c) = cur.peek() else {
            return Err(cur.error("unterminated argument list"));
        };
        match c {
            '"' => {
                cur.bump();
                skip_string(cur)?;
            }
            '(' | '[' | '{' => {
                depth += 1;
                cur.bump();
            }
            ')' if depth == 0 => {
                let span = cur.src[start..cur.pos].trim();
                if !span.is_empty() {
                    args.push(parse_value(span, start)?);
                } else if !args.is_empty() {
                    return Err(cur.error("expected an argument"));
                }
                cur.bump();
                return Ok(args);
            }
            ',' if depth == 0 => {
                let span = cur.src[start..cur.pos].trim();
                if span.is_empty() {
                    return Err(cur.error("expected an argument"));
                }
                args.push(parse_value(span, start)?);
                cur.bump();
                start = cur.pos;
            }
            ')' | ']' | '}' => {
                if depth == 0 {
                    return Err(cur.error("unbalanced brackets in argument list"));
                }
                depth -= 1;
                cur.bump();
            }
            _ => cur.bump(),
        }
    }
}

fn parse_value(span: &str, offset: usize) -> MigrateResult<Value> {
    serde_json::from_str(span)
        .map_err(|err| MigrateError::script(offset, format!("invalid argument: {err}")))
}

/// Consume a string literal, opening quote already consumed.
fn skip_string(cur: &mut Cursor) -> MigrateResult<()> {
    loop {
        let Some(c) = cur.peek() else {
            return Err(cur.error("unterminated string literal"));
        };
        cur.bump();
        match c {
            '\\' => {
                if cur.peek().is_some() {
                    cur.bump();
                }
            }
            '"' => return Ok(()),
            _ => {}
        }
    }
}

/// Turn a parsed call into an operation.
fn build_operation(offset: usize, method: &str, args: Vec<Value>) -> MigrateResult<Operation> {
    match method {
        "createCollection" => {
            expect_arity(offset, method, &args, 1)?;
            let collection: Collection = decode(offset, "collection definition", &args[0])?;
            Ok(Operation::CreateCollection(collection))
        }
        "deleteCollection" => {
            expect_arity(offset, method, &args, 1)?;
            Ok(Operation::DeleteCollection {
                collection: string_arg(offset, method, &args, 0)?,
            })
        }
        "addField" => {
            expect_arity(offset, method, &args, 2)?;
            let field: Field = decode(offset, "field definition", &args[1])?;
            Ok(Operation::AddField {
                collection: string_arg(offset, method, &args, 0)?,
                field,
            })
        }
        "removeField" => {
            expect_arity(offset, method, &args, 2)?;
            Ok(Operation::RemoveField {
                collection: string_arg(offset, method, &args, 0)?,
                field: string_arg(offset, method, &args, 1)?,
            })
        }
        "updateField" => {
            expect_arity(offset, method, &args, 3)?;
            let Value::Object(patch) = args[2].clone() else {
                return Err(MigrateError::script(
                    offset,
                    format!("`{method}` takes an object patch as its third argument"),
                ));
            };
            Ok(Operation::UpdateField {
                collection: string_arg(offset, method, &args, 0)?,
                field: string_arg(offset, method, &args, 1)?,
                patch,
            })
        }
        "addIndex" => {
            expect_arity(offset, method, &args, 2)?;
            Ok(Operation::AddIndex {
                collection: string_arg(offset, method, &args, 0)?,
                index: string_arg(offset, method, &args, 1)?,
            })
        }
        "removeIndex" => {
            expect_arity(offset, method, &args, 2)?;
            Ok(Operation::RemoveIndex {
                collection: string_arg(offset, method, &args, 0)?,
                index: string_arg(offset, method, &args, 1)?,
            })
        }
        "setRule" => {
            if args.len() != 2 && args.len() != 3 {
                return Err(MigrateError::script(
                    offset,
                    format!("`setRule` takes 2 or 3 arguments, got {}", args.len()),
                ));
            }
            let collection = string_arg(offset, method, &args, 0)?;
            let slot_name = string_arg(offset, method, &args, 1)?;
            let Some(slot) = RuleSlot::parse(&slot_name) else {
                return Err(MigrateError::script(
                    offset,
                    format!("unknown rule slot `{slot_name}`"),
                ));
            };
            let rule = match args.get(2) {
                None => Rule::Unset,
                Some(Value::Null) => Rule::Locked,
                Some(Value::String(expr)) => Rule::Filter(expr.clone()),
                Some(other) => {
                    return Err(MigrateError::script(
                        offset,
                        format!("`setRule` takes null or a filter string, got {other}"),
                    ));
                }
            };
            Ok(Operation::SetRule {
                collection,
                slot,
                rule,
            })
        }
        _ => Err(MigrateError::script(
            offset,
            format!("unknown operation `{method}`"),
        )),
    }
}

fn expect_arity(offset: usize, method: &str, args: &[Value], n: usize) -> MigrateResult<()> {
    if args.len() != n {
        return Err(MigrateError::script(
            offset,
            format!("`{method}` takes {n} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

fn string_arg(offset: usize, method: &str, args: &[Value], index: usize) -> MigrateResult<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(MigrateError::script(
            offset,
            format!("`{method}` expects a string for argument {}, got {other}", index + 1),
        )),
        None => Err(MigrateError::script(
            offset,
            format!("`{method}` is missing argument {}", index + 1),
        )),
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    offset: usize,
    what: &str,
    value: &Value,
) -> MigrateResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|err| MigrateError::script(offset, format!("invalid {what}: {err}")))
}

/// Byte cursor over a script with comment-aware trivia skipping.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn looking_at(&self, pat: &str) -> bool {
        self.rest().starts_with(pat)
    }

    fn looking_at_ident(&self, ident: &str) -> bool {
        self.looking_at(ident)
            && !self.src[self.pos + ident.len()..]
                .chars()
                .next()
                .is_some_and(is_ident_continue)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.bump(),
                Some('/') if self.looking_at("//") => {
                    while let Some(c) = self.peek() {
                        self.bump();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.looking_at("/*") => {
                    self.pos += 2;
                    while !self.at_end() && !self.looking_at("*/") {
                        self.bump();
                    }
                    if self.looking_at("*/") {
                        self.pos += 2;
                    }
                }
                _ => break,
            }
        }
    }

    fn eat_ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return None;
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        Some(&self.src[start..self.pos])
    }

    fn expect(&mut self, c: char) -> MigrateResult<()> {
        if self.peek() == Some(c) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected `{c}`")))
        }
    }

    fn error(&self, message: impl Into<String>) -> MigrateError {
        MigrateError::script(self.pos, message)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use drift_schema::{Collection, Schema};

    use super::*;

    const BASIC: &str = r#"// fingerprint: abc123
migrate((db) => {
  db.createCollection({
    "name": "posts",
    "type": "base",
    "fields": [
      {"name": "title", "type": "text", "required": true}
    ]
  });
  db.addIndex("posts", "CREATE INDEX idx ON posts (title, body)");
}, (db) => {
  db.deleteCollection("posts");
});
"#;

    #[test]
    fn test_parse_basic_script() {
        let script = parse_script(BASIC).unwrap();

        assert_eq!(script.fingerprint.as_deref(), Some("abc123"));
        assert_eq!(script.apply.len(), 2);
        assert_eq!(script.revert.len(), 1);
        assert!(script.checkpoint.is_none());

        match &script.apply[0] {
            Operation::CreateCollection(collection) => {
                assert_eq!(collection.name(), "posts");
                assert!(collection.get_field("title").unwrap().required);
            }
            other => panic!("expected createCollection, got {:?}", other),
        }
        // the comma inside the SQL string does not split the argument
        match &script.apply[1] {
            Operation::AddIndex { index, .. } => {
                assert_eq!(index, "CREATE INDEX idx ON posts (title, body)");
            }
            other => panic!("expected addIndex, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_operations_returns_apply_side() {
        let ops = parse_operations(BASIC).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn test_any_handle_name() {
        let source = r#"migrate((txn) => {
  txn.deleteCollection("posts");
}, (txn) => {
});
"#;
        let script = parse_script(source).unwrap();
        assert_eq!(script.apply.len(), 1);
        assert!(script.revert.is_empty());
    }

    #[test]
    fn test_function_form() {
        let source = r#"migrate(function (db) {
  db.setRule("posts", "list", "");
}, function (db) {
  db.setRule("posts", "list");
});
"#;
        let script = parse_script(source).unwrap();
        assert_eq!(
            script.apply[0],
            Operation::SetRule {
                collection: "posts".to_string(),
                slot: RuleSlot::List,
                rule: Rule::open(),
            }
        );
        assert_eq!(
            script.revert[0],
            Operation::SetRule {
                collection: "posts".to_string(),
                slot: RuleSlot::List,
                rule: Rule::Unset,
            }
        );
    }

    #[test]
    fn test_set_rule_null_is_locked() {
        let source = r#"migrate((db) => {
  db.setRule("posts", "view", null);
}, (db) => {});
"#;
        let script = parse_script(source).unwrap();
        assert_eq!(
            script.apply[0],
            Operation::SetRule {
                collection: "posts".to_string(),
                slot: RuleSlot::View,
                rule: Rule::Locked,
            }
        );
    }

    #[test]
    fn test_unknown_operation_is_an_error() {
        let source = r#"migrate((db) => {
  db.dropEverything("posts");
}, (db) => {});
"#;
        let err = parse_operations(source).unwrap_err();
        match err {
            MigrateError::ParseScript { message, .. } => {
                assert!(message.contains("dropEverything"));
            }
            other => panic!("expected ParseScript, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_statement_is_an_error() {
        let source = r#"migrate((db) => {
  console.log("hello");
}, (db) => {});
"#;
        let err = parse_operations(source).unwrap_err();
        match err {
            MigrateError::ParseScript { message, offset } => {
                assert!(message.contains("console"));
                assert!(offset > 0);
            }
            other => panic!("expected ParseScript, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_top_level_construct() {
        let err = parse_operations("export default {};").unwrap_err();
        assert!(err.to_string().contains("export"));
    }

    #[test]
    fn test_missing_semicolon_is_an_error() {
        let source = r#"migrate((db) => {
  db.deleteCollection("posts")
}, (db) => {});
"#;
        assert!(parse_operations(source).is_err());
    }

    #[test]
    fn test_unknown_rule_slot_is_an_error() {
        let source = r#"migrate((db) => {
  db.setRule("posts", "admin", null);
}, (db) => {});
"#;
        let err = parse_operations(source).unwrap_err();
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn test_comments_between_statements_are_skipped() {
        let source = r#"// header comment
migrate((db) => {
  // add the posts collection
  db.createCollection({"name": "posts"});
  /* block comment */
  db.addIndex("posts", "CREATE INDEX idx ON posts (title)");
}, (db) => {
  db.deleteCollection("posts");
});
"#;
        let ops = parse_operations(source).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn test_empty_routines() {
        let ops = parse_script("migrate((db) => {}, (db) => {});").unwrap();
        assert!(ops.apply.is_empty());
        assert!(ops.revert.is_empty());
    }

    #[test]
    fn test_trailing_content_rejected() {
        let source = "migrate((db) => {}, (db) => {});\nmigrate((db) => {}, (db) => {});";
        assert!(parse_operations(source).is_err());
    }

    #[test]
    fn test_fingerprint_extraction() {
        assert_eq!(extract_fingerprint(BASIC).as_deref(), Some("abc123"));
        assert_eq!(extract_fingerprint("migrate((db) => {}, (db) => {});"), None);
        assert_eq!(extract_fingerprint("// fingerprint:\n"), None);
    }

    #[test]
    fn test_checkpoint_extraction_round_trip() {
        let mut schema = Schema::new();
        schema.add_collection(Collection::base("posts"));
        let checkpoint = Checkpoint::capture(&schema).unwrap();

        let script =
            crate::script::render_script("ff", &[], &[], &checkpoint).unwrap();
        let extracted = extract_checkpoint(&script).unwrap().unwrap();
        assert_eq!(extracted, checkpoint);
    }

    #[test]
    fn test_checkpoint_absent_is_none() {
        assert!(extract_checkpoint(BASIC).unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_bad_json_is_an_error() {
        let source = "migrate((db) => {}, (db) => {});\n// checkpoint:begin\n// {not json\n// checkpoint:end\n";
        assert!(extract_checkpoint(source).is_err());
    }

    #[test]
    fn test_checkpoint_missing_end_marker() {
        let source = "migrate((db) => {}, (db) => {});\n// checkpoint:begin\n// {}\n";
        assert!(extract_checkpoint(source).is_err());
    }

    #[test]
    fn test_rendered_scripts_parse_back() {
        let mut schema = Schema::new();
        schema.add_collection(Collection::base("posts"));

        let apply = vec![
            Operation::CreateCollection(Collection::base("posts")),
            Operation::SetRule {
                collection: "posts".to_string(),
                slot: RuleSlot::List,
                rule: Rule::filter("user = @request.auth.id"),
            },
        ];
        let revert = vec![
            Operation::SetRule {
                collection: "posts".to_string(),
                slot: RuleSlot::List,
                rule: Rule::Unset,
            },
            Operation::DeleteCollection {
                collection: "posts".to_string(),
            },
        ];
        let checkpoint = Checkpoint::capture(&schema).unwrap();

        let source =
            crate::script::render_script("deadbeef", &apply, &revert, &checkpoint).unwrap();
        let script = parse_script(&source).unwrap();

        assert_eq!(script.fingerprint.as_deref(), Some("deadbeef"));
        assert_eq!(script.apply, apply);
        assert_eq!(script.revert, revert);
        assert_eq!(script.checkpoint, Some(checkpoint));
    }
}
