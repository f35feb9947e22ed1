//! Per-language extraction rules for the tree-sitter chunker
//!
//! Each supported language maps to a grammar plus the node kinds that yield
//! semantic units. JSX parses with the JavaScript grammar and TSX with the
//! TSX variant of the TypeScript grammar, so the dispatch table stays a
//! closed set keyed by file extension.

use serde::{Deserialize, Serialize};

/// Languages the chunker can parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    /// Python (`.py`)
    Python,
    /// JavaScript (`.js`)
    JavaScript,
    /// JSX (`.jsx`)
    Jsx,
    /// TypeScript (`.ts`)
    TypeScript,
    /// TSX (`.tsx`)
    Tsx,
    /// Java (`.java`)
    Java,
    /// Go (`.go`)
    Go,
    /// Rust (`.rs`)
    Rust,
}

impl SourceLanguage {
    /// Infer the language from a file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" => Some(Self::Python),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "jsx" => Some(Self::Jsx),
            "ts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "java" => Some(Self::Java),
            "go" => Some(Self::Go),
            "rs" => Some(Self::Rust),
            _ => None,
        }
    }

    /// Stable lowercase name stored in code-unit payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rust",
        }
    }

    /// The tree-sitter grammar for this language
    pub fn grammar(&self) -> tree_sitter::Language {
        match self {
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript | Self::Jsx => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    /// Extraction rules for this language
    pub fn rules(&self) -> &'static ExtractionRules {
        match self {
            Self::Python => &PYTHON_RULES,
            Self::JavaScript | Self::Jsx => &JAVASCRIPT_RULES,
            Self::TypeScript | Self::Tsx => &TYPESCRIPT_RULES,
            Self::Java => &JAVA_RULES,
            Self::Go => &GO_RULES,
            Self::Rust => &RUST_RULES,
        }
    }
}

impl std::fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node kinds that produce units, per language
///
/// `function_kinds` become functions at top level and methods inside a
/// container; `method_kinds` are always methods; `container_kinds` become
/// classes and provide the parent name for their nested units.
#[derive(Debug)]
pub struct ExtractionRules {
    /// Node kinds extracted as functions (or methods when nested)
    pub function_kinds: &'static [&'static str],
    /// Node kinds always extracted as methods
    pub method_kinds: &'static [&'static str],
    /// Class-like container node kinds
    pub container_kinds: &'static [&'static str],
    /// Container kinds that name a parent but are not units themselves
    /// (Rust `impl` blocks)
    pub transparent_containers: &'static [&'static str],
    /// Field holding the unit name; `None` falls back to the first
    /// identifier child
    pub name_field: &'static str,
    /// Field holding the body block, used to slice the signature text
    pub body_field: &'static str,
    /// Comment node kinds eligible as attached documentation
    pub comment_kinds: &'static [&'static str],
}

pub(crate) static PYTHON_RULES: ExtractionRules = ExtractionRules {
    function_kinds: &["function_definition"],
    method_kinds: &[],
    container_kinds: &["class_definition"],
    transparent_containers: &[],
    name_field: "name",
    body_field: "body",
    comment_kinds: &["comment"],
};

pub(crate) static JAVASCRIPT_RULES: ExtractionRules = ExtractionRules {
    function_kinds: &["function_declaration", "generator_function_declaration"],
    method_kinds: &["method_definition"],
    container_kinds: &["class_declaration"],
    transparent_containers: &[],
    name_field: "name",
    body_field: "body",
    comment_kinds: &["comment"],
};

pub(crate) static TYPESCRIPT_RULES: ExtractionRules = ExtractionRules {
    function_kinds: &["function_declaration", "generator_function_declaration"],
    method_kinds: &["method_definition"],
    container_kinds: &["class_declaration", "abstract_class_declaration"],
    transparent_containers: &[],
    name_field: "name",
    body_field: "body",
    comment_kinds: &["comment"],
};

pub(crate) static JAVA_RULES: ExtractionRules = ExtractionRules {
    function_kinds: &[],
    method_kinds: &["method_declaration", "constructor_declaration"],
    container_kinds: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
    ],
    transparent_containers: &[],
    name_field: "name",
    body_field: "body",
    comment_kinds: &["line_comment", "block_comment"],
};

pub(crate) static GO_RULES: ExtractionRules = ExtractionRules {
    function_kinds: &["function_declaration"],
    method_kinds: &["method_declaration"],
    container_kinds: &[],
    transparent_containers: &[],
    name_field: "name",
    body_field: "body",
    comment_kinds: &["comment"],
};

pub(crate) static RUST_RULES: ExtractionRules = ExtractionRules {
    function_kinds: &["function_item"],
    method_kinds: &[],
    container_kinds: &["struct_item", "enum_item", "trait_item"],
    transparent_containers: &["impl_item"],
    name_field: "name",
    body_field: "body",
    comment_kinds: &["line_comment", "block_comment"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch_is_closed() {
        assert_eq!(SourceLanguage::from_extension("py"), Some(SourceLanguage::Python));
        assert_eq!(SourceLanguage::from_extension("jsx"), Some(SourceLanguage::Jsx));
        assert_eq!(SourceLanguage::from_extension("TSX"), Some(SourceLanguage::Tsx));
        assert_eq!(SourceLanguage::from_extension("rb"), None);
        assert_eq!(SourceLanguage::from_extension(""), None);
    }

    #[test]
    fn grammars_load() {
        for lang in [
            SourceLanguage::Python,
            SourceLanguage::JavaScript,
            SourceLanguage::Jsx,
            SourceLanguage::TypeScript,
            SourceLanguage::Tsx,
            SourceLanguage::Java,
            SourceLanguage::Go,
            SourceLanguage::Rust,
        ] {
            let mut parser = tree_sitter::Parser::new();
            parser
                .set_language(&lang.grammar())
                .unwrap_or_else(|e| panic!("{lang}: {e}"));
        }
    }
}
