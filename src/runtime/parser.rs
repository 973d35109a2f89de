//! Response Parser (C2)
//!
//! Extracts action tag blocks from free-form LLM text, repairs common YAML
//! mistakes LLMs make, and validates the result into [`Action`] values. This
//! is NOT a general XML or YAML parser — every heuristic here targets a
//! specific, observed failure mode in LLM-emitted action blocks.
//!
//! # Pipeline
//!
//! 1. Scan `text` for `<tag>...</tag>` blocks with [`TAG_RE`]; tags in
//!    [`IGNORED_TAGS`] (scratch thinking the LLM is encouraged to emit but
//!    that carries no action) are skipped entirely.
//! 2. If no closing tag is found, fall back to repair mode: take the body
//!    from the opening tag to the next opening tag or end of string (this
//!    can swallow trailing malformed content — a known, retained quirk).
//! 3. Run the block body through the sanitizer pipeline, then `serde_yaml`.
//! 4. Normalize keys from the camelCase the LLM tends to emit to the
//!    snake_case [`Action`] fields expect.
//! 5. Build and [`Action::validate`] the typed action.

use crate::runtime::action::{
    Action, AgentType, BatchCommand, ContextBootstrap, EditSpec, ReportedContext, TodoOperation,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_yaml::Value;

/// Tags the LLM is encouraged to use for scratch thinking; never treated as
/// action attempts.
const IGNORED_TAGS: &[&str] = &["think", "reasoning", "plan_md"];

const KNOWN_TAGS: &[&str] = &[
    "bash",
    "batch_bash",
    "finish",
    "todo",
    "file",
    "search",
    "scratchpad",
    "task_create",
    "add_context",
    "launch_subagent",
    "report",
];

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"(?s)<(\w+)>(.*?)</\1>").unwrap();
    static ref OPEN_TAG_RE: Regex = Regex::new(r"(?s)<(\w+)>").unwrap();
    static ref KEY_VALUE_RE: Regex = Regex::new(r"^(\s*)([A-Za-z_][\w-]*):\s*(.*)$").unwrap();
    static ref SIBLING_KEY_TAIL_RE: Regex = Regex::new(r"^[A-Za-z_][\w-]*\s*:\s*").unwrap();
    static ref REPORT_CONTEXT_RE: Regex =
        Regex::new(r#"(?s)<context\s+id="([^"]*)">(.*?)</context>"#).unwrap();
    static ref REPORT_COMMENTS_RE: Regex = Regex::new(r"(?s)<comments>(.*?)</comments>").unwrap();
}

/// Keys that get promoted to a `|` block scalar when their inline value
/// looks like it would break a naive single-line YAML scalar (§4.1 rule 1).
const BLOCK_PROMOTE_KEYS: &[&str] = &["description", "content", "comments", "oldString", "newString"];

/// One tag block found in the response text, whether or not it parsed.
#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub tag: String,
    pub action: Option<Action>,
    pub error: Option<String>,
}

/// The full result of parsing a single LLM turn's response text.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub blocks: Vec<ParsedBlock>,
    /// True if the text contained any non-ignored tag, regardless of
    /// whether it parsed or validated successfully (P7): distinguishes
    /// "the LLM proposed nothing" from "the LLM tried and failed".
    pub found_action_attempt: bool,
}

impl ParseOutcome {
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.blocks.iter().filter_map(|b| b.action.as_ref())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.blocks
            .iter()
            .filter_map(|b| b.error.as_deref().map(|e| (b.tag.as_str(), e)))
    }

    pub fn has_errors(&self) -> bool {
        self.blocks.iter().any(|b| b.error.is_some())
    }
}

/// Extracts and validates actions out of LLM response text.
#[derive(Debug, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut consumed = vec![false; text.len()];
        // (start offset in `text`, block) pairs, sorted into reading order
        // before being handed back — the two passes below discover blocks
        // out of textual order (clean matches first, then repair-mode gaps).
        let mut found: Vec<(usize, ParsedBlock)> = Vec::new();

        for cap in TAG_RE.captures_iter(text) {
            let whole = cap.get(0).unwrap();
            let tag = cap[1].to_string();
            let body = cap[2].to_string();
            mark_consumed(&mut consumed, whole.start(), whole.end());
            if let Some(block) = self.handle_tag(&mut outcome, tag, body) {
                found.push((whole.start(), block));
            }
        }

        // Repair mode: opening tags with no matching close, scanning only
        // text not already consumed by a clean match above.
        for cap in OPEN_TAG_RE.captures_iter(text) {
            let whole = cap.get(0).unwrap();
            if consumed[whole.start()] {
                continue;
            }
            let tag = cap[1].to_string();
            let rest = &text[whole.end()..];
            let body_end = rest.find('<').map(|i| whole.end() + i).unwrap_or(text.len());
            let body = text[whole.end()..body_end].to_string();
            mark_consumed(&mut consumed, whole.start(), body_end);
            if let Some(block) = self.handle_tag(&mut outcome, tag, body) {
                found.push((whole.start(), block));
            }
        }

        found.sort_by_key(|(start, _)| *start);
        outcome.blocks = found.into_iter().map(|(_, block)| block).collect();
        outcome
    }

    /// Builds and validates the block for one tag occurrence. Returns
    /// `None` for an ignored tag (e.g. `think`), which contributes neither
    /// a block nor an action attempt.
    fn handle_tag(&self, outcome: &mut ParseOutcome, tag: String, body: String) -> Option<ParsedBlock> {
        if IGNORED_TAGS.contains(&tag.as_str()) {
            return None;
        }
        outcome.found_action_attempt = true;

        if !KNOWN_TAGS.contains(&tag.as_str()) {
            return Some(ParsedBlock {
                tag,
                action: None,
                error: Some("unknown action tag".to_string()),
            });
        }

        Some(match build_action(&tag, &body) {
            Ok(action) => match action.validate() {
                Ok(()) => ParsedBlock {
                    tag,
                    action: Some(action),
                    error: None,
                },
                Err(e) => ParsedBlock {
                    tag,
                    action: None,
                    error: Some(format!("Validation error: {}", e)),
                },
            },
            Err(e) => ParsedBlock {
                tag,
                action: None,
                error: Some(e),
            },
        })
    }
}

fn mark_consumed(consumed: &mut [bool], start: usize, end: usize) {
    for slot in consumed.iter_mut().take(end.min(consumed.len())).skip(start) {
        *slot = true;
    }
}

/// True if `line` opens a sibling key at exactly `indent` (used to find
/// where a promoted/continued block's lines stop).
fn is_sibling_key_at(line: &str, indent: &str) -> bool {
    match line.strip_prefix(indent) {
        Some(rest) if !rest.starts_with(' ') && !rest.starts_with('\t') => {
            SIBLING_KEY_TAIL_RE.is_match(rest)
        }
        _ => false,
    }
}

/// Re-indents an already-written `content: |` block whose body lines don't
/// carry the two extra spaces a block scalar requires (§4.1 rule 4).
fn reindent_content_blocks(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        out.push(line.to_string());
        i += 1;
        let Some(caps) = KEY_VALUE_RE.captures(line) else { continue };
        let indent = caps[1].to_string();
        let key = caps[2].to_string();
        let value = caps[3].trim();
        if key != "content" || !(value == "|" || value.starts_with('|') || value.starts_with('>')) {
            continue;
        }
        let required = indent.len() + 2;
        while i < lines.len() {
            let l = lines[i];
            if l.trim().is_empty() {
                out.push(l.to_string());
                i += 1;
                continue;
            }
            if is_sibling_key_at(l, &indent) {
                break;
            }
            let cur_indent = l.len() - l.trim_start().len();
            if cur_indent < required {
                out.push(format!("{}{}", " ".repeat(required - cur_indent), l));
            } else {
                out.push(l.to_string());
            }
            i += 1;
        }
    }
    out.join("\n")
}

/// Ordered, LLM-output-targeted rewrites applied before YAML decoding.
/// Not a general YAML fixer — each rule targets one observed mistake.
///
/// 1. Promote `description`/`content`/`comments`/`oldString`/`newString`
///    values to a `|` block scalar when the inline value contains a colon,
///    spans onto following lines, or (for `content`) just runs long.
/// 2. Quote other scalar values that contain `": "`, which would otherwise
///    be misread as a nested mapping.
/// 3. Coerce `cmd:` the same way as rule 1 — multi-line shell commands are
///    the single most common YAML break in LLM output (scenario S2).
/// 4. Re-indent `content: |` bodies the LLM already wrote as a block scalar
///    but under-indented.
fn sanitize(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(caps) = KEY_VALUE_RE.captures(line) {
            let indent = caps[1].to_string();
            let key = caps[2].to_string();
            let value = caps[3].to_string();
            let already_block = value.trim_start().starts_with('|') || value.trim_start().starts_with('>');
            let is_promotable = BLOCK_PROMOTE_KEYS.contains(&key.as_str()) || key == "cmd";

            if is_promotable && !already_block {
                let mut cont: Vec<String> = Vec::new();
                let mut j = i + 1;
                while j < lines.len() {
                    let l = lines[j];
                    if l.trim().is_empty() {
                        cont.push(String::new());
                        j += 1;
                        continue;
                    }
                    if is_sibling_key_at(l, &indent) {
                        break;
                    }
                    cont.push(l.to_string());
                    j += 1;
                }
                let has_continuation = cont.iter().any(|l| !l.trim().is_empty());
                let needs_promotion = has_continuation
                    || value.contains(": ")
                    || (key == "content" && value.len() > 100);
                if needs_promotion {
                    out.push(format!("{}{}: |", indent, key));
                    let inner_indent = format!("{}  ", indent);
                    if !value.trim().is_empty() {
                        out.push(format!("{}{}", inner_indent, value.trim()));
                    }
                    for l in &cont {
                        if l.trim().is_empty() {
                            out.push(String::new());
                        } else {
                            out.push(format!("{}{}", inner_indent, l.trim_start()));
                        }
                    }
                    i = j;
                    continue;
                }
            } else if !already_block
                && !value.trim_start().starts_with('"')
                && !value.trim_start().starts_with('\'')
                && !value.trim_start().starts_with('[')
                && !value.trim_start().starts_with('{')
                && value.contains(": ")
            {
                let escaped = value.replace('"', "\\\"");
                out.push(format!("{}{}: \"{}\"", indent, key, escaped));
                i += 1;
                continue;
            }
        }
        out.push(line.to_string());
        i += 1;
    }
    reindent_content_blocks(&out.join("\n"))
}

/// Converts one camelCase key segment to snake_case.
fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Recursively renames mapping keys from camelCase to snake_case so they
/// line up with `Action`'s field names.
///
/// `filePaths` is deliberately left unrenamed here (a retained quirk); the
/// `FileMetadata::file_paths` field carries a serde alias so the value
/// still deserializes correctly despite the skipped rename.
fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                let new_key = match k.as_str() {
                    Some("filePaths") => k,
                    Some(s) => Value::String(camel_to_snake(s)),
                    None => k,
                };
                out.insert(new_key, normalize_keys(v));
            }
            Value::Mapping(out)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

fn parse_yaml(body: &str) -> Result<Value, String> {
    let sanitized = sanitize(body);
    let value: Value =
        serde_yaml::from_str(&sanitized).map_err(|e| format!("YAML parse error: {}", e))?;
    Ok(normalize_keys(value))
}

fn field<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

fn str_field(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    field(map, key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(map: &serde_yaml::Mapping, key: &str, default: bool) -> bool {
    field(map, key).and_then(Value::as_bool).unwrap_or(default)
}

fn u64_field(map: &serde_yaml::Mapping, key: &str, default: u64) -> u64 {
    field(map, key).and_then(Value::as_u64).unwrap_or(default)
}

fn as_mapping(value: Value, tag: &str) -> Result<serde_yaml::Mapping, String> {
    match value {
        Value::Mapping(m) => Ok(m),
        _ => Err(format!("[{}] expected a YAML mapping body", tag)),
    }
}

fn build_action(tag: &str, body: &str) -> Result<Action, String> {
    if tag == "report" {
        return build_report(body);
    }

    let value = parse_yaml(body)?;
    let map = as_mapping(value, tag)?;

    match tag {
        "bash" => Ok(Action::Bash {
            cmd: str_field(&map, "cmd").unwrap_or_default(),
            block: bool_field(&map, "block", true),
            timeout_secs: u64_field(&map, "timeout_secs", 60),
        }),
        "batch_bash" => {
            let commands = field(&map, "commands")
                .cloned()
                .map(serde_yaml::from_value::<Vec<BatchCommand>>)
                .transpose()
                .map_err(|e| format!("[batch_bash] commands: {}", e))?
                .unwrap_or_default();
            Ok(Action::BatchBash {
                commands,
                parallel: bool_field(&map, "parallel", true),
                continue_on_error: bool_field(&map, "continue_on_error", false),
            })
        }
        "finish" => Ok(Action::Finish {
            message: str_field(&map, "message").unwrap_or_else(|| "Task completed".to_string()),
        }),
        "todo" => {
            let operations = field(&map, "operations")
                .cloned()
                .map(serde_yaml::from_value::<Vec<TodoOperation>>)
                .transpose()
                .map_err(|e| format!("[todo] operations: {}", e))?
                .unwrap_or_default();
            Ok(Action::BatchTodo {
                operations,
                view_all: bool_field(&map, "view_all", false),
            })
        }
        "file" => build_file_action(&map),
        "search" => build_search_action(&map),
        "scratchpad" => build_scratchpad_action(&map),
        "task_create" => build_task_create(&map),
        "add_context" => Ok(Action::AddContext {
            id: str_field(&map, "id").unwrap_or_default(),
            content: str_field(&map, "content").unwrap_or_default(),
            reported_by: str_field(&map, "reported_by").unwrap_or_else(|| "?".to_string()),
            task_id: str_field(&map, "task_id"),
        }),
        "launch_subagent" => Ok(Action::LaunchSubagent {
            task_id: str_field(&map, "task_id").unwrap_or_default(),
        }),
        _ => Err(format!("[{}] unknown action tag", tag)),
    }
}

fn build_file_action(map: &serde_yaml::Mapping) -> Result<Action, String> {
    let op = str_field(map, "op").unwrap_or_else(|| "read".to_string());
    match op.as_str() {
        "read" => Ok(Action::Read {
            file_path: str_field(map, "file_path").unwrap_or_default(),
            offset: field(map, "offset").and_then(Value::as_u64),
            limit: field(map, "limit").and_then(Value::as_u64),
        }),
        "write" => Ok(Action::Write {
            file_path: str_field(map, "file_path").unwrap_or_default(),
            content: str_field(map, "content").unwrap_or_default(),
        }),
        "edit" => Ok(Action::Edit {
            file_path: str_field(map, "file_path").unwrap_or_default(),
            old_string: str_field(map, "old_string").unwrap_or_default(),
            new_string: str_field(map, "new_string").unwrap_or_default(),
            replace_all: bool_field(map, "replace_all", false),
        }),
        "multi_edit" => {
            let edits = field(map, "edits")
                .cloned()
                .map(serde_yaml::from_value::<Vec<EditSpec>>)
                .transpose()
                .map_err(|e| format!("[file] edits: {}", e))?
                .unwrap_or_default();
            Ok(Action::MultiEdit {
                file_path: str_field(map, "file_path").unwrap_or_default(),
                edits,
            })
        }
        "metadata" => {
            let file_paths = field(map, "file_paths")
                .or_else(|| field(map, "filePaths"))
                .cloned()
                .map(serde_yaml::from_value::<Vec<String>>)
                .transpose()
                .map_err(|e| format!("[file] file_paths: {}", e))?
                .unwrap_or_default();
            Ok(Action::FileMetadata { file_paths })
        }
        other => Err(format!("[file] unknown op: {}", other)),
    }
}

fn build_search_action(map: &serde_yaml::Mapping) -> Result<Action, String> {
    let op = str_field(map, "op").unwrap_or_else(|| "grep".to_string());
    match op.as_str() {
        "grep" => Ok(Action::Grep {
            pattern: str_field(map, "pattern").unwrap_or_default(),
            path: str_field(map, "path"),
            include: str_field(map, "include"),
        }),
        "glob" => Ok(Action::Glob {
            pattern: str_field(map, "pattern").unwrap_or_default(),
            path: str_field(map, "path"),
        }),
        "ls" => {
            let ignore = field(map, "ignore")
                .cloned()
                .map(serde_yaml::from_value::<Vec<String>>)
                .transpose()
                .map_err(|e| format!("[search] ignore: {}", e))?
                .unwrap_or_default();
            Ok(Action::Ls {
                path: str_field(map, "path").unwrap_or_default(),
                ignore,
            })
        }
        other => Err(format!("[search] unknown op: {}", other)),
    }
}

fn build_scratchpad_action(map: &serde_yaml::Mapping) -> Result<Action, String> {
    let op = str_field(map, "op").unwrap_or_else(|| "add".to_string());
    match op.as_str() {
        "add" => Ok(Action::AddNote {
            content: str_field(map, "content").unwrap_or_default(),
        }),
        "view_all" => Ok(Action::ViewAllNotes),
        other => Err(format!("[scratchpad] unknown op: {}", other)),
    }
}

fn build_task_create(map: &serde_yaml::Mapping) -> Result<Action, String> {
    let agent_type = match str_field(map, "agent_type").as_deref() {
        Some("coder") => AgentType::Coder,
        _ => AgentType::Explorer,
    };
    let context_refs = field(map, "context_refs")
        .cloned()
        .map(serde_yaml::from_value::<Vec<String>>)
        .transpose()
        .map_err(|e| format!("[task_create] context_refs: {}", e))?
        .unwrap_or_default();
    let context_bootstrap = field(map, "context_bootstrap")
        .cloned()
        .map(serde_yaml::from_value::<Vec<ContextBootstrap>>)
        .transpose()
        .map_err(|e| format!("[task_create] context_bootstrap: {}", e))?
        .unwrap_or_default();
    Ok(Action::TaskCreate {
        agent_type,
        title: str_field(map, "title").unwrap_or_default(),
        description: str_field(map, "description").unwrap_or_default(),
        context_refs,
        context_bootstrap,
        auto_launch: bool_field(map, "auto_launch", false),
    })
}

/// `report` bodies are usually YAML, but some models emit a hand-rolled
/// XML-within-YAML shape (`<context id="...">...</context>` blocks plus a
/// trailing `<comments>`). Try YAML first; fall back to tag scraping.
fn build_report(body: &str) -> Result<Action, String> {
    if let Ok(value) = parse_yaml(body) {
        if let Value::Mapping(map) = value {
            let contexts = field(&map, "contexts")
                .cloned()
                .map(serde_yaml::from_value::<Vec<ReportedContext>>)
                .transpose()
                .map_err(|e| format!("[report] contexts: {}", e))?
                .unwrap_or_default();
            let comments = str_field(&map, "comments").unwrap_or_default();
            return Ok(Action::Report { contexts, comments });
        }
    }

    let contexts = REPORT_CONTEXT_RE
        .captures_iter(body)
        .map(|cap| ReportedContext {
            id: cap[1].to_string(),
            content: cap[2].trim().to_string(),
        })
        .collect();
    let comments = REPORT_COMMENTS_RE
        .captures(body)
        .map(|cap| cap[1].trim().to_string())
        .unwrap_or_default();
    Ok(Action::Report { contexts, comments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_bash_block() {
        let text = "<bash>\ncmd: echo hi\ntimeout_secs: 10\n</bash>";
        let outcome = ResponseParser::new().parse(text);
        assert!(outcome.found_action_attempt);
        assert_eq!(outcome.blocks.len(), 1);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::Bash { cmd, timeout_secs, .. } => {
                assert_eq!(cmd, "echo hi");
                assert_eq!(*timeout_secs, 10);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn ignores_think_blocks() {
        let text = "<think>\nlet me consider <bash>fake</bash>\n</think>";
        let outcome = ResponseParser::new().parse(text);
        assert!(!outcome.found_action_attempt);
        assert!(outcome.blocks.is_empty());
    }

    #[test]
    fn repair_mode_handles_missing_closing_tag() {
        let text = "<finish>\nmessage: done for now\n<bash>\ncmd: ls\n</bash>";
        let outcome = ResponseParser::new().parse(text);
        assert!(outcome.found_action_attempt);
        assert_eq!(outcome.blocks.len(), 2);
        assert_eq!(outcome.blocks[0].tag, "finish");
        assert_eq!(outcome.blocks[1].tag, "bash");
    }

    #[test]
    fn camel_case_keys_are_normalized() {
        let text = "<file>\nop: read\nfilePath: src/main.rs\n</file>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::Read { file_path, .. } => assert_eq!(file_path, "src/main.rs"),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn file_paths_quirk_still_deserializes_via_alias() {
        let text = "<file>\nop: metadata\nfilePaths:\n  - a.rs\n  - b.rs\n</file>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::FileMetadata { file_paths } => {
                assert_eq!(file_paths, &vec!["a.rs".to_string(), "b.rs".to_string()])
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn unknown_tag_records_error_but_counts_as_attempt() {
        let text = "<frobnicate>\nfoo: bar\n</frobnicate>";
        let outcome = ResponseParser::new().parse(text);
        assert!(outcome.found_action_attempt);
        assert!(outcome.blocks[0].error.is_some());
    }

    #[test]
    fn validation_errors_are_reported_not_panicked() {
        let text = "<bash>\ncmd: \"\"\n</bash>";
        let outcome = ResponseParser::new().parse(text);
        assert!(outcome.blocks[0].action.is_none());
        assert!(outcome.blocks[0].error.as_ref().unwrap().contains("Validation error"));
    }

    #[test]
    fn sanitizes_multiline_cmd_without_block_markers() {
        // scenario S2: a multi-line shell command with no `|` block marker.
        let text = "<bash>\ncmd: echo \"line one\"\necho \"line two\"\ntimeout_secs: 10\n</bash>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::Bash { cmd, timeout_secs, .. } => {
                assert!(cmd.contains("line one"));
                assert!(cmd.contains("line two"));
                assert_eq!(*timeout_secs, 10);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn cmd_with_inline_colon_is_block_scalar_coerced() {
        let text = "<bash>\ncmd: curl http://host: 8080/health\n</bash>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::Bash { cmd, .. } => assert!(cmd.contains("http://host: 8080/health")),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn description_value_with_colon_is_promoted_to_block_scalar() {
        let text =
            "<task_create>\ntitle: fix it\ndescription: summary: needs a colon here\n</task_create>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::TaskCreate { description, .. } => {
                assert!(description.contains("summary: needs a colon here"))
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn other_scalar_with_colon_space_is_quoted_not_promoted() {
        let text = "<add_context>\nid: c1\ncontent: fine\nreported_by: Agent: primary\n</add_context>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::AddContext { reported_by, .. } => assert_eq!(reported_by, "Agent: primary"),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn under_indented_content_block_is_reindented() {
        let text = "<file>\nop: write\nfile_path: a.rs\ncontent: |\nfn main() {}\n</file>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::Write { content, .. } => assert_eq!(content.trim_end(), "fn main() {}"),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn report_falls_back_to_xml_scraping() {
        let text = "<report>\n<context id=\"ctx1\">some finding</context>\n<comments>looks done</comments>\n</report>";
        let outcome = ResponseParser::new().parse(text);
        match outcome.blocks[0].action.as_ref().unwrap() {
            Action::Report { contexts, comments } => {
                assert_eq!(contexts.len(), 1);
                assert_eq!(contexts[0].id, "ctx1");
                assert_eq!(comments, "looks done");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
