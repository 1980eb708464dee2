//! apiDoc parser: raw documentation text into endpoint records.
//!
//! # Design
//! The remote service documents its controllers with apiDoc comment tags.
//! Parsing is line-oriented and best-effort because the source text is not a
//! stable contract. Fragments that do not fit the grammar are skipped,
//! logged with `tracing::warn!` and collected in `ParsedDoc::skipped`, so a
//! caller can still assert how much of the document was understood. Only
//! lines that cannot be attached to an endpoint at all, or an endpoint whose
//! success block contradicts itself, abort the parse.
//!
//! Recognised tags:
//! ```text
//! @api {method} /path Title
//! @apiDescription text (continues on following untagged lines)
//! @apiParam (Group) {Type="a","b"} [field=default] description
//! @apiSuccess (201) {Type} field description
//! ```
//! Every other `@api*` tag is ignored.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::http::HttpMethod;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@api\s+\{(?P<method>[^}]*)\}\s+(?P<uri>\S+)\s*(?P<title>.*)$").unwrap());

// Shared grammar of `@apiParam` and `@apiSuccess`, after the tag itself.
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\((?P<group>[^)]*)\))?\s*(?:\{(?P<type>[^}]*)\})?\s*(?P<field>\[[^\]]*\]|[^\s(){}\[\]]+)\s*(?P<description>.*)$")
        .unwrap()
});

const DEFAULT_STATUS: u16 = 200;

/// Whether a path segment is a placeholder such as `:taskId` or `{taskId}`.
pub fn is_placeholder(segment: &str) -> bool {
    segment.starts_with(':') || segment.starts_with('{')
}

/// Where a documented parameter travels in the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamGroup {
    Path,
    Query,
    Body,
    Other(String),
}

impl ParamGroup {
    fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("parameter") | Some("body") => ParamGroup::Body,
            Some("path") => ParamGroup::Path,
            Some("query") => ParamGroup::Query,
            Some(other) => ParamGroup::Other(other.to_string()),
        }
    }
}

/// One documented request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub group: ParamGroup,
    /// Lower-cased type name, e.g. `string`, `uuid`. Empty when undocumented.
    pub kind: String,
    pub description: String,
    pub optional: bool,
    pub default: Option<String>,
    pub allowed: Vec<String>,
}

/// One HTTP method + path combination with its documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub method: HttpMethod,
    pub uri: String,
    pub segments: Vec<String>,
    pub title: String,
    pub description: String,
    pub params: BTreeMap<String, Param>,
    /// Documented success status.
    pub retcode: u16,
}

impl EndpointRecord {
    pub fn new(method: HttpMethod, uri: &str, title: &str) -> Self {
        let path = uri.split('?').next().unwrap_or(uri);
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            method,
            uri: path.to_string(),
            segments,
            title: title.trim().to_string(),
            description: String::new(),
            params: BTreeMap::new(),
            retcode: DEFAULT_STATUS,
        }
    }

    /// Non-optional query parameters, which must be supplied on every call.
    pub fn required_query(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|(_, p)| p.group == ParamGroup::Query && !p.optional)
            .map(|(name, _)| name.as_str())
    }

    /// `{method} /uri title` followed by the description and parameters.
    pub fn render(&self) -> String {
        let mut out = format!("{{{}}} {} {}\n", self.method, self.uri, self.title);
        if !self.description.is_empty() {
            out.push_str(&self.description);
            out.push('\n');
        }
        for (name, param) in &self.params {
            let optional = if param.optional { "optional " } else { "" };
            let default = param
                .default
                .as_deref()
                .map(|d| format!(" = {d}"))
                .unwrap_or_default();
            out.push_str(&format!("  {optional}\"{name}\"{default} of type \"{}\"", param.kind));
            if !param.allowed.is_empty() {
                out.push_str(&format!(" one of [{}]", param.allowed.join(" ")));
            }
            out.push('\n');
        }
        out
    }
}

/// A fragment the parser could not understand and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFragment {
    pub line: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDoc {
    pub endpoints: Vec<EndpointRecord>,
    pub skipped: Vec<SkippedFragment>,
}

struct Pending {
    record: EndpointRecord,
    declared_status: Option<u16>,
}

impl Pending {
    fn finish(mut self) -> EndpointRecord {
        self.record.retcode = self.declared_status.unwrap_or(DEFAULT_STATUS);
        self.record
    }
}

enum Block {
    /// No header seen yet.
    Start,
    Endpoint(Pending),
    /// Inside the block of a header that was skipped.
    Skipping,
}

struct Parser {
    endpoints: Vec<EndpointRecord>,
    skipped: Vec<SkippedFragment>,
    block: Block,
    in_description: bool,
}

impl Parser {
    fn skip(&mut self, line: usize, text: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(line, text, %reason, "skipping api documentation fragment");
        self.skipped.push(SkippedFragment {
            line,
            text: text.to_string(),
            reason,
        });
    }

    fn close_block(&mut self) {
        if let Block::Endpoint(pending) = std::mem::replace(&mut self.block, Block::Start) {
            self.endpoints.push(pending.finish());
        }
    }

    fn header(&mut self, line: usize, text: &str) {
        self.close_block();
        let Some(caps) = HEADER_RE.captures(text) else {
            self.skip(line, text, "malformed endpoint header");
            self.block = Block::Skipping;
            return;
        };
        let method = match caps["method"].parse::<HttpMethod>() {
            Ok(m) => m,
            Err(e) => {
                self.skip(line, text, e);
                self.block = Block::Skipping;
                return;
            }
        };
        let uri = &caps["uri"];
        if !uri.starts_with('/') {
            self.skip(line, text, "endpoint path must start with `/`");
            self.block = Block::Skipping;
            return;
        }
        self.block = Block::Endpoint(Pending {
            record: EndpointRecord::new(method, uri, &caps["title"]),
            declared_status: None,
        });
    }

    /// Whether an endpoint block is open to receive `text`. Lines inside a
    /// skipped block are dropped along with their header.
    fn is_associated(&self, line: usize, text: &str) -> Result<bool, ParseError> {
        match self.block {
            Block::Endpoint(_) => Ok(true),
            Block::Skipping => Ok(false),
            Block::Start => Err(ParseError::Unassociated {
                line,
                text: text.to_string(),
            }),
        }
    }

    fn param(&mut self, line: usize, text: &str, rest: &str) -> Result<(), ParseError> {
        if !self.is_associated(line, text)? {
            return Ok(());
        }
        let Some(caps) = FIELD_RE.captures(rest.trim()) else {
            self.skip(line, text, "malformed parameter");
            return Ok(());
        };
        let group = ParamGroup::from_label(caps.name("group").map(|m| m.as_str()));
        let (kind, allowed) = parse_type(caps.name("type").map(|m| m.as_str()).unwrap_or(""));
        let (name, optional, default) = parse_field(&caps["field"]);
        let description = caps["description"].trim().to_string();

        let Block::Endpoint(pending) = &mut self.block else {
            return Ok(());
        };
        if pending.record.params.contains_key(&name) {
            self.skip(line, text, format!("duplicate parameter `{name}`"));
            return Ok(());
        }
        pending.record.params.insert(
            name,
            Param {
                group,
                kind,
                description,
                optional,
                default,
                allowed,
            },
        );
        Ok(())
    }

    fn success(&mut self, line: usize, text: &str, rest: &str) -> Result<(), ParseError> {
        if !self.is_associated(line, text)? {
            return Ok(());
        }
        let Some(caps) = FIELD_RE.captures(rest.trim()) else {
            self.skip(line, text, "malformed success field");
            return Ok(());
        };
        let status = match caps.name("group").map(|m| m.as_str().trim()) {
            None | Some("") => DEFAULT_STATUS,
            Some(code) => match code.parse::<u16>() {
                Ok(code) => code,
                Err(_) => {
                    self.skip(line, text, format!("success group `{code}` is not a status code"));
                    return Ok(());
                }
            },
        };

        let Block::Endpoint(pending) = &mut self.block else {
            return Ok(());
        };
        match pending.declared_status {
            None => pending.declared_status = Some(status),
            Some(first) if first != status => {
                return Err(ParseError::ConflictingStatus {
                    line,
                    endpoint: format!("{} {}", pending.record.method, pending.record.uri),
                    first,
                    second: status,
                });
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn description(&mut self, text: &str) {
        if let Block::Endpoint(pending) = &mut self.block {
            let desc = &mut pending.record.description;
            if !desc.is_empty() {
                desc.push('\n');
            }
            desc.push_str(text.trim());
        }
    }
}

/// Strip comment decoration (`*`, `/`, indentation) and collapse runs of
/// spaces.
fn clean_line(raw: &str) -> String {
    let trimmed = raw.trim_start_matches([' ', '\t', '*', '/']).trim_end();
    let mut out = String::with_capacity(trimmed.len());
    let mut prev_space = false;
    for c in trimmed.chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

/// `String="a","b"` into (`string`, [`a`, `b`]).
fn parse_type(raw: &str) -> (String, Vec<String>) {
    match raw.split_once('=') {
        Some((kind, values)) => {
            let allowed = values
                .split(',')
                .map(|v| v.trim().trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
                .collect();
            (kind.trim().to_ascii_lowercase(), allowed)
        }
        None => (raw.trim().to_ascii_lowercase(), Vec::new()),
    }
}

/// `[name=default]` into (`name`, optional, `Some(default)`).
fn parse_field(raw: &str) -> (String, bool, Option<String>) {
    let (inner, optional) = match raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(inner) => (inner, true),
        None => (raw, false),
    };
    match inner.split_once('=') {
        Some((name, default)) => (
            name.to_string(),
            optional,
            Some(default.trim_matches('"').to_string()),
        ),
        None => (inner.to_string(), optional, None),
    }
}

/// Parse apiDoc text into endpoint records, in document order.
pub fn parse_apidoc(text: &str) -> Result<ParsedDoc, ParseError> {
    let mut parser = Parser {
        endpoints: Vec::new(),
        skipped: Vec::new(),
        block: Block::Start,
        in_description: false,
    };

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let text = clean_line(raw);

        if !text.starts_with("@api") {
            if parser.in_description && !text.is_empty() {
                parser.description(&text);
            }
            continue;
        }
        parser.in_description = false;

        let (tag, rest) = text
            .split_once(char::is_whitespace)
            .map(|(tag, rest)| (tag, rest.trim_start()))
            .unwrap_or((text.as_str(), ""));
        match tag {
            "@api" => parser.header(line, &text),
            "@apiParam" => parser.param(line, &text, rest)?,
            "@apiSuccess" => parser.success(line, &text, rest)?,
            "@apiDescription" => {
                parser.description(rest);
                parser.in_description = true;
            }
            other => tracing::trace!(line, tag = other, "ignoring api documentation tag"),
        }
    }
    parser.close_block();

    if parser.endpoints.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(ParsedDoc {
        endpoints: parser.endpoints,
        skipped: parser.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBHOOKS: &str = r#"
@api {post} /api/v3/user/webhook Create a new webhook - BETA
@apiParam (Body) {UUID} [id="Randomly Generated UUID"] The webhook's id
@apiParam (Body) {String} url The webhook's URL
@apiParam (Body) {Boolean} [enabled=true] If the webhook should be enabled
@apiParam (Body) {Sring="taskActivity","groupChatReceived"} [type="taskActivity"] The webhook's type.
@apiSuccess (201) {Object} data The created webhook
@apiSuccess (201) {UUID} data.id The uuid of the webhook
@api {put} /api/v3/user/webhook/:id Edit a webhook - BETA
@apiParam (Path) {UUID} id URL parameter - The id of the webhook to update
@apiSuccess {Object} data The updated webhook
@api {delete} /api/v3/user/webhook/:id Delete a webhook - BETA
@apiParam (Path) {UUID} id The id of the webhook to delete
@apiParam (Query) [dueDate] type Optional date to use for computing the nextDue field.
"#;

    #[test]
    fn parses_all_headers_in_order() {
        let doc = parse_apidoc(WEBHOOKS).unwrap();
        let got: Vec<_> = doc
            .endpoints
            .iter()
            .map(|e| (e.method, e.uri.as_str(), e.title.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (HttpMethod::Post, "/api/v3/user/webhook", "Create a new webhook - BETA"),
                (HttpMethod::Put, "/api/v3/user/webhook/:id", "Edit a webhook - BETA"),
                (HttpMethod::Delete, "/api/v3/user/webhook/:id", "Delete a webhook - BETA"),
            ]
        );
        assert!(doc.skipped.is_empty());
    }

    #[test]
    fn success_group_sets_retcode() {
        let doc = parse_apidoc(WEBHOOKS).unwrap();
        let codes: Vec<u16> = doc.endpoints.iter().map(|e| e.retcode).collect();
        assert_eq!(codes, vec![201, 200, 200]);
    }

    #[test]
    fn params_carry_group_type_default_and_choices() {
        let doc = parse_apidoc(WEBHOOKS).unwrap();
        let create = &doc.endpoints[0];

        let enabled = &create.params["enabled"];
        assert!(enabled.optional);
        assert_eq!(enabled.default.as_deref(), Some("true"));
        assert_eq!(enabled.kind, "boolean");
        assert_eq!(enabled.group, ParamGroup::Body);

        let kind = &create.params["type"];
        assert_eq!(kind.allowed, vec!["taskActivity", "groupChatReceived"]);
        assert_eq!(kind.default.as_deref(), Some("taskActivity"));

        let url = &create.params["url"];
        assert!(!url.optional);
        assert_eq!(url.description, "The webhook's URL");

        let delete = &doc.endpoints[2];
        assert_eq!(delete.params["id"].group, ParamGroup::Path);
        assert_eq!(delete.params["dueDate"].group, ParamGroup::Query);
        assert!(delete.params["dueDate"].optional);
    }

    #[test]
    fn conflicting_success_codes_fail() {
        let text = "@api {delete} /api/v3/user/webhook/:id Delete a webhook\n\
                    @apiParam (Path) {UUID} id The id\n\
                    @apiSuccess (201) {String} type The type\n\
                    @apiSuccess {Object} options The options\n";
        let err = parse_apidoc(text).unwrap_err();
        assert!(matches!(err, ParseError::ConflictingStatus { line: 4, first: 201, second: 200, .. }));
    }

    #[test]
    fn param_before_any_header_fails_with_line() {
        let text = "\n@apiParam (Path) {UUID} id The id\n@api {get} /api/v3/status Status\n";
        let err = parse_apidoc(text).unwrap_err();
        assert_eq!(
            err,
            ParseError::Unassociated {
                line: 2,
                text: "@apiParam (Path) {UUID} id The id".to_string()
            }
        );
    }

    #[test]
    fn malformed_header_is_skipped_with_its_params() {
        let text = "@api {patch} /api/v3/user Update\n\
                    @apiParam (Body) {String} name Name\n\
                    @api {get} /api/v3/user Get the user\n\
                    @api {get} api/v3/relative Missing slash\n";
        let doc = parse_apidoc(text).unwrap();
        assert_eq!(doc.endpoints.len(), 1);
        assert_eq!(doc.endpoints[0].uri, "/api/v3/user");
        assert!(doc.endpoints[0].params.is_empty());
        let lines: Vec<usize> = doc.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 4]);
    }

    #[test]
    fn malformed_param_is_skipped() {
        let text = "@api {get} /api/v3/user Get the user\n@apiParam (Query)\n";
        let doc = parse_apidoc(text).unwrap();
        assert_eq!(doc.endpoints.len(), 1);
        assert_eq!(doc.skipped.len(), 1);
        assert_eq!(doc.skipped[0].reason, "malformed parameter");
    }

    #[test]
    fn description_spans_lines_and_comment_markers_are_stripped() {
        let text = " * @api {get} /api/v3/tasks/user Get a user's tasks\n\
                    \x20* @apiDescription Returns the tasks of the\n\
                    \x20*   authenticated user.\n\
                    \x20* @apiParam (Query) {String=\"habits\",\"todos\"} [type] Filter\n\
                    \x20* not part of the description\n";
        let doc = parse_apidoc(text).unwrap();
        let tasks = &doc.endpoints[0];
        assert_eq!(tasks.description, "Returns the tasks of the\nauthenticated user.");
        assert_eq!(tasks.params["type"].allowed, vec!["habits", "todos"]);
    }

    #[test]
    fn tags_may_be_followed_by_tabs() {
        let text = "@api\t{get} /api/v3/tasks/user\tGet tasks\n\
                    @apiParam\t(Query) {String} type Filter\n\
                    @apiParam\t(Query)\n\
                    @apiSuccess\t(200) {Object} data Tasks\n";
        let doc = parse_apidoc(text).unwrap();
        let tasks = &doc.endpoints[0];
        assert_eq!(tasks.params["type"].group, ParamGroup::Query);
        assert_eq!(tasks.retcode, 200);
        assert_eq!(doc.skipped.len(), 1);
        assert_eq!(doc.skipped[0].line, 3);
    }

    #[test]
    fn same_path_with_different_methods() {
        let text = "@api {get} /api/v3/tasks/:taskId Get a task\n\
                    @api {put} /api/v3/tasks/:taskId Update a task\n\
                    @api {delete} /api/v3/tasks/:taskId Delete a task\n";
        let doc = parse_apidoc(text).unwrap();
        assert_eq!(doc.endpoints.len(), 3);
        assert!(doc.endpoints.iter().all(|e| e.segments == ["api", "v3", "tasks", ":taskId"]));
    }

    #[test]
    fn empty_document_is_an_error() {
        assert_eq!(parse_apidoc("").unwrap_err(), ParseError::Empty);
        assert_eq!(parse_apidoc("just prose\n@apiName Foo\n").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn query_string_is_dropped_from_segments() {
        let record = EndpointRecord::new(HttpMethod::Get, "/api/v3/content?language=en", "Content");
        assert_eq!(record.segments, vec!["api", "v3", "content"]);
        assert_eq!(record.uri, "/api/v3/content");
    }

    #[test]
    fn required_query_lists_only_mandatory_query_params() {
        let text = "@api {get} /api/v3/members/:memberId/objections/:interaction Check\n\
                    @apiParam (Path) {UUID} memberId The member\n\
                    @apiParam (Query) {String} since Start\n\
                    @apiParam (Query) {String} [until] End\n";
        let doc = parse_apidoc(text).unwrap();
        let required: Vec<&str> = doc.endpoints[0].required_query().collect();
        assert_eq!(required, vec!["since"]);
    }
}
