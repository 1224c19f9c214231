//! Tag-body parameter parsing for a single [`ToolSpec`].
//!
//! Accepts the canonical form, the fenced form and the one-parameter
//! shorthand:
//!
//! ~~~text
//! <search>
//! <query>cats</query>
//! </search>
//!
//! ```search
//! <query>cats</query>
//! ```
//!
//! <search>cats</search>
//! ~~~

use std::borrow::Cow;

use serde_json::{Map, Value};
use toolstream_core::tool::{ParamSpec, ToolSpec};

/// A parameter that failed to parse or validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamError {
    pub param: String,
    pub reason: String,
}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.param, self.reason)
    }
}

/// Result of parsing one tag against one spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub params: Map<String, Value>,
    pub errors: Vec<ParamError>,
    /// Byte offset in the input just past the consumed closing tag
    pub last_index: usize,
}

impl ParseOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse `text` as a call to `spec`.
///
/// Returns `None` when the text is not structurally a `spec.name` tag at all,
/// so the caller can try the next spec. Otherwise every declared parameter is
/// looked up and validated, and all failures are reported together.
pub fn parse_from_text(spec: &ToolSpec, text: &str) -> Option<ParseOutcome> {
    let (canonical, fenced_end) = match normalize_fenced(&spec.name, text) {
        Some((canonical, end)) => (Cow::Owned(canonical), Some(end)),
        None => (Cow::Borrowed(text), None),
    };

    let open = find_open_tag(&canonical, 0, |name| name == spec.name)?;
    // The tool tag must lead; a same-named tag nested in another tool's body
    // is not a call.
    if !canonical[..open.start].trim().is_empty() {
        return None;
    }
    let close_tag = format!("</{}>", open.full_name);
    let close_at = open.end + canonical[open.end..].find(&close_tag)?;
    let body = &canonical[open.end..close_at];
    let last_index = fenced_end.unwrap_or(close_at + close_tag.len());

    Some(parse_body(spec, body, last_index))
}

fn parse_body(spec: &ToolSpec, body: &str, last_index: usize) -> ParseOutcome {
    let found: Vec<(&ParamSpec, Option<&str>)> = spec
        .params
        .iter()
        .map(|p| (p, inner_tag_value(body, &p.name)))
        .collect();

    if let Some(outcome) = shorthand(spec, body, &found, last_index) {
        return outcome;
    }

    let mut params = Map::new();
    let mut errors = Vec::new();
    for (param, value) in found {
        match value {
            Some(raw) => match param.kind.validate_text(raw) {
                Ok(v) => {
                    params.insert(param.name.clone(), v);
                }
                Err(reason) => errors.push(ParamError {
                    param: param.name.clone(),
                    reason,
                }),
            },
            None if param.required => errors.push(ParamError {
                param: param.name.clone(),
                reason: "missing required parameter".into(),
            }),
            None => {
                if let Some(default) = &param.default {
                    params.insert(param.name.clone(), default.clone());
                }
            }
        }
    }

    ParseOutcome {
        params,
        errors,
        last_index,
    }
}

/// The single-required-parameter fallback: `<search>cats</search>`.
///
/// Only applies when the body holds none of the declared parameter tags, so a
/// body that tried the nested form and got it wrong still reports errors.
fn shorthand(
    spec: &ToolSpec,
    body: &str,
    found: &[(&ParamSpec, Option<&str>)],
    last_index: usize,
) -> Option<ParseOutcome> {
    let mut required = spec.required_params();
    let only = required.next()?;
    if required.next().is_some() || found.iter().any(|(_, v)| v.is_some()) {
        return None;
    }

    let value = only.kind.validate_text(body.trim()).ok()?;
    let mut params = Map::new();
    params.insert(only.name.clone(), value);
    for param in spec.params.iter().filter(|p| !p.required) {
        if let Some(default) = &param.default {
            params.insert(param.name.clone(), default.clone());
        }
    }

    Some(ParseOutcome {
        params,
        errors: Vec::new(),
        last_index,
    })
}

/// Rewrite ```` ```name ... ``` ```` as `<name>...</name>`.
///
/// Returns the canonical text and the byte offset just past the closing
/// fence in the original input (or its end when the fence is missing).
fn normalize_fenced(name: &str, text: &str) -> Option<(String, usize)> {
    let lead = text.len() - text.trim_start().len();
    let after_fence = text[lead..].strip_prefix("```")?.strip_prefix(name)?;
    // ```search_page must not be read as ```search
    if after_fence
        .chars()
        .next()
        .is_some_and(|c| !c.is_whitespace())
    {
        return None;
    }

    let inner_start = text.len() - after_fence.len();
    let (inner, end) = match after_fence.find("```") {
        Some(i) => (&after_fence[..i], inner_start + i + 3),
        None => (after_fence, text.len()),
    };
    Some((format!("<{name}>{inner}</{name}>"), end))
}

/// Value of the first `<name>value</name>` inside `body`, trimmed.
fn inner_tag_value<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    Some(body[start..start + len].trim())
}

/// An opening tag located by [`find_open_tag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenTag<'a> {
    /// Byte offset of `<`
    pub start: usize,
    /// Byte offset just past `>`
    pub end: usize,
    /// Tag name as written, namespace included (`browser.search`)
    pub full_name: &'a str,
    /// Tag name with any dotted namespace removed (`search`)
    pub name: &'a str,
}

/// Find the first opening tag at or after `from` whose namespace-stripped
/// name satisfies `accept`. Closing tags and tags with attributes are
/// skipped.
pub(crate) fn find_open_tag<'a>(
    text: &'a str,
    from: usize,
    accept: impl Fn(&str) -> bool,
) -> Option<OpenTag<'a>> {
    let mut cursor = from;
    while let Some(rel) = text[cursor..].find('<') {
        let start = cursor + rel;
        let rest = &text[start + 1..];
        let name_len = rest
            .find(|c: char| !is_tag_name_char(c))
            .unwrap_or(rest.len());
        let full_name = &rest[..name_len];
        if !full_name.is_empty() && rest[name_len..].starts_with('>') {
            let name = strip_namespace(full_name);
            if accept(name) {
                return Some(OpenTag {
                    start,
                    end: start + 1 + name_len + 1,
                    full_name,
                    name,
                });
            }
        }
        cursor = start + 1;
    }
    None
}

fn is_tag_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// `a.b.search` → `search`.
pub fn strip_namespace(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolstream_core::tool::ParamKind;

    fn search() -> ToolSpec {
        ToolSpec::new("search", "Search the web")
            .with_param(ParamSpec::required("query", ParamKind::string()))
            .with_param(
                ParamSpec::optional(
                    "limit",
                    ParamKind::Integer {
                        min: Some(1),
                        max: Some(10),
                    },
                )
                .with_default(5),
            )
            .with_param(ParamSpec::optional("site", ParamKind::string()))
    }

    fn fetch() -> ToolSpec {
        ToolSpec::new("fetch_page", "Fetch a page")
            .with_param(ParamSpec::required("url", ParamKind::Url))
            .with_param(ParamSpec::required("format", ParamKind::string()))
    }

    #[test]
    fn canonical_form() {
        let text = "<search>\n<query>cats</query>\n<limit>3</limit>\n</search>";
        let out = parse_from_text(&search(), text).unwrap();
        assert!(out.is_valid());
        assert_eq!(out.params["query"], "cats");
        assert_eq!(out.params["limit"], 3);
        assert!(!out.params.contains_key("site"));
        assert_eq!(out.last_index, text.len());
    }

    #[test]
    fn optional_default_applied_when_absent() {
        let out = parse_from_text(&search(), "<search><query>cats</query></search>").unwrap();
        assert_eq!(out.params["limit"], 5);
    }

    #[test]
    fn fenced_form() {
        let text = "```search\n<query>dogs</query>\n```";
        let out = parse_from_text(&search(), text).unwrap();
        assert!(out.is_valid());
        assert_eq!(out.params["query"], "dogs");
        assert_eq!(out.last_index, text.len());
    }

    #[test]
    fn fenced_name_must_match_exactly() {
        assert!(parse_from_text(&search(), "```search_page\n<query>x</query>\n```").is_none());
    }

    #[test]
    fn shorthand_single_required_param() {
        let out = parse_from_text(&search(), "<search>  black cats \n</search>").unwrap();
        assert!(out.is_valid());
        assert_eq!(out.params["query"], "black cats");
        assert_eq!(out.params["limit"], 5);
        assert!(!out.params.contains_key("site"));
    }

    #[test]
    fn shorthand_not_used_with_two_required_params() {
        let out = parse_from_text(&fetch(), "<fetch_page>https://example.com</fetch_page>").unwrap();
        assert_eq!(out.errors.len(), 2);
    }

    #[test]
    fn nested_form_errors_are_not_masked_by_shorthand() {
        let out = parse_from_text(&search(), "<search><limit>50</limit></search>").unwrap();
        let params: Vec<_> = out.errors.iter().map(|e| e.param.as_str()).collect();
        assert_eq!(params, vec!["query", "limit"]);
    }

    #[test]
    fn invalid_values_are_collected() {
        let text = "<fetch_page><url>not a url</url><format>md</format></fetch_page>";
        let out = parse_from_text(&fetch(), text).unwrap();
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].param, "url");
        assert!(out.errors[0].to_string().starts_with("url: "));
    }

    #[test]
    fn other_tool_is_structural_mismatch() {
        assert!(parse_from_text(&search(), "<fetch_page><url>x</url></fetch_page>").is_none());
        assert!(parse_from_text(&search(), "<search><query>unclosed").is_none());
    }

    #[test]
    fn nested_same_name_tag_is_not_a_call() {
        let text = "<fetch_page><url><search>x</search></url></fetch_page>";
        assert!(parse_from_text(&search(), text).is_none());
    }

    #[test]
    fn namespaced_tag_is_accepted() {
        let out =
            parse_from_text(&search(), "<browser.search><query>owls</query></browser.search>")
                .unwrap();
        assert_eq!(out.params["query"], "owls");
    }

    #[test]
    fn last_index_points_past_first_call() {
        let text = "<search>a</search>\n<search>b</search>";
        let out = parse_from_text(&search(), text).unwrap();
        assert_eq!(&text[..out.last_index], "<search>a</search>");
        let rest = &text[out.last_index..];
        let second = parse_from_text(&search(), rest).unwrap();
        assert_eq!(second.params["query"], "b");
    }

    #[test]
    fn find_open_tag_skips_closing_and_attribute_tags() {
        let text = "</x> <a href=1> <ns.search>";
        let tag = find_open_tag(text, 0, |_| true).unwrap();
        assert_eq!(tag.full_name, "ns.search");
        assert_eq!(tag.name, "search");
        assert_eq!(&text[tag.start..tag.end], "<ns.search>");
    }

    #[test]
    fn strip_namespace_variants() {
        assert_eq!(strip_namespace("a.b.search"), "search");
        assert_eq!(strip_namespace("search"), "search");
    }
}
