//! Language-aware extraction of semantic units from source files
//!
//! Parses source into a tree-sitter AST and extracts functions, classes and
//! methods with their signatures, bodies, and 1-based line spans. Dispatch
//! is a closed set keyed by file extension; unsupported extensions are a
//! typed error the indexer turns into a skip.
//!
//! Malformed sources still yield whatever parsed: tree-sitter produces an
//! error-tolerant tree, and units are extracted from the non-error subtrees
//! with [`ParseOutput::syntax_errors`] set so the caller can log a warning
//! and continue.

pub mod languages;

pub use languages::SourceLanguage;

use std::path::Path;
use std::time::Instant;

use tree_sitter::{Node, Parser};

use crate::domain::error::{Error, ParseErrorKind, Result};
use crate::domain::types::UnitKind;

/// A function, class, or method extracted from source
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticUnit {
    /// Unit kind
    pub kind: UnitKind,
    /// Identifier of the unit
    pub name: String,
    /// Enclosing class/impl/receiver type, for methods
    pub parent: Option<String>,
    /// Declaration text up to the body (parameters + return type)
    pub signature: String,
    /// Full unit text including the body
    pub body: String,
    /// Attached leading doc comment, when present
    pub doc: Option<String>,
    /// 1-based first line
    pub start_line: u32,
    /// 1-based last line
    pub end_line: u32,
    /// Byte offset of the unit start
    pub start_byte: usize,
    /// Byte offset just past the unit end
    pub end_byte: usize,
}

/// Result of parsing one file
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    /// Extracted units in source order
    pub units: Vec<SemanticUnit>,
    /// Wall-clock parse time in milliseconds
    pub parse_time_ms: u64,
    /// The language the file was parsed as
    pub language: SourceLanguage,
    /// Whether the tree contained syntax errors (units are the parsed prefix)
    pub syntax_errors: bool,
}

/// Stateless source parser; construct once and reuse across files
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceParser;

impl SourceParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a source file into semantic units.
    ///
    /// The language is inferred from the path's extension. Returns
    /// [`ParseErrorKind::UnsupportedLanguage`] for unknown extensions and
    /// [`ParseErrorKind::EmptyFile`] when there is nothing to extract.
    pub fn parse(&self, path: &Path, source: &[u8]) -> Result<ParseOutput> {
        let display = path.display().to_string();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let language = SourceLanguage::from_extension(ext).ok_or_else(|| {
            Error::parse(
                ParseErrorKind::UnsupportedLanguage,
                &display,
                format!("no grammar for extension `{ext}`"),
            )
        })?;

        if source.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(Error::parse(
                ParseErrorKind::EmptyFile,
                &display,
                "file is empty",
            ));
        }

        let started = Instant::now();
        let mut parser = Parser::new();
        parser.set_language(&language.grammar()).map_err(|e| {
            Error::internal(format!("grammar for {language} failed to load: {e}"))
        })?;

        let tree = parser.parse(source, None).ok_or_else(|| {
            Error::parse(
                ParseErrorKind::MalformedSyntax,
                &display,
                "tree-sitter produced no tree",
            )
        })?;

        let root = tree.root_node();
        let mut units = Vec::new();
        extract(language, root, source, None, &mut units);
        units.sort_by_key(|u| u.start_byte);

        Ok(ParseOutput {
            units,
            parse_time_ms: started.elapsed().as_millis() as u64,
            language,
            syntax_errors: root.has_error(),
        })
    }
}

fn node_text(node: Node<'_>, source: &[u8]) -> String {
    String::from_utf8_lossy(&source[node.byte_range()]).into_owned()
}

fn name_of(node: Node<'_>, source: &[u8], field: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name(field) {
        return Some(node_text(name, source));
    }
    // Fallback for grammars where the identifier is not a named field.
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|c| c.kind().contains("identifier"))
        .map(|c| node_text(c, source));
    found
}

/// Signature = declaration text from the unit start to its body block.
fn signature_of(node: Node<'_>, source: &[u8], body_field: &str) -> String {
    let end = node
        .child_by_field_name(body_field)
        .map(|b| b.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let start = node.start_byte();
    let raw = &source[start..end.max(start)];
    String::from_utf8_lossy(raw)
        .trim_end()
        .trim_end_matches(':')
        .trim_end()
        .to_string()
}

/// Collect contiguous comment siblings directly above the unit.
fn doc_of(node: Node<'_>, source: &[u8], comment_kinds: &[&str]) -> Option<String> {
    let mut lines = Vec::new();
    let mut prev = node.prev_sibling();
    let mut expected_end = node.start_position().row;
    while let Some(sibling) = prev {
        if !comment_kinds.contains(&sibling.kind()) {
            break;
        }
        // Only comments immediately adjacent (no blank line gaps) attach.
        if sibling.end_position().row + 1 < expected_end {
            break;
        }
        expected_end = sibling.start_position().row;
        lines.push(node_text(sibling, source));
        prev = sibling.prev_sibling();
    }
    if lines.is_empty() {
        None
    } else {
        lines.reverse();
        Some(lines.join("\n"))
    }
}

fn make_unit(
    node: Node<'_>,
    source: &[u8],
    kind: UnitKind,
    name: String,
    parent: Option<String>,
    lang: SourceLanguage,
) -> SemanticUnit {
    let rules = lang.rules();
    SemanticUnit {
        kind,
        name,
        parent,
        signature: signature_of(node, source, rules.body_field),
        body: node_text(node, source),
        doc: doc_of(node, source, rules.comment_kinds),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
    }
}

/// Go methods carry their receiver type instead of an enclosing class.
fn go_receiver(node: Node<'_>, source: &[u8]) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let text = node_text(receiver, source);
    Some(
        text.trim_matches(|c| c == '(' || c == ')')
            .rsplit(|c: char| c.is_whitespace() || c == '*')
            .next()
            .unwrap_or_default()
            .to_string(),
    )
}

fn extract(
    lang: SourceLanguage,
    node: Node<'_>,
    source: &[u8],
    parent: Option<&str>,
    out: &mut Vec<SemanticUnit>,
) {
    let rules = lang.rules();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.is_error() {
            continue;
        }
        let kind = child.kind();

        if rules.container_kinds.contains(&kind) {
            if let Some(name) = name_of(child, source, rules.name_field) {
                out.push(make_unit(
                    child,
                    source,
                    UnitKind::Class,
                    name.clone(),
                    parent.map(str::to_string),
                    lang,
                ));
                extract(lang, child, source, Some(&name), out);
                continue;
            }
        }

        if rules.transparent_containers.contains(&kind) {
            let name = child
                .child_by_field_name("type")
                .map(|n| node_text(n, source));
            extract(lang, child, source, name.as_deref(), out);
            continue;
        }

        if rules.method_kinds.contains(&kind) {
            let parent_name = if lang == SourceLanguage::Go {
                go_receiver(child, source)
            } else {
                parent.map(str::to_string)
            };
            if let Some(name) = name_of(child, source, rules.name_field) {
                out.push(make_unit(
                    child,
                    source,
                    UnitKind::Method,
                    name,
                    parent_name,
                    lang,
                ));
            }
            continue;
        }

        if rules.function_kinds.contains(&kind) {
            if let Some(name) = name_of(child, source, rules.name_field) {
                let unit_kind = if parent.is_some() {
                    UnitKind::Method
                } else {
                    UnitKind::Function
                };
                out.push(make_unit(
                    child,
                    source,
                    unit_kind,
                    name,
                    parent.map(str::to_string),
                    lang,
                ));
            }
            // Nested functions (closures, local helpers) stay part of the
            // enclosing unit's body; do not recurse.
            continue;
        }

        extract(lang, child, source, parent, out);
    }
}
