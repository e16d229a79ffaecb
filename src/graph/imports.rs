//! Lexical import extraction.
//!
//! This is deliberately regex-based, not a parser. It misses multi-line
//! import lists and happily matches imports inside strings or comments.

use crate::corpus::extension;
use regex::Regex;
use std::sync::OnceLock;

/// Extension groups the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSyntax {
    /// `.ts`, `.tsx`, `.js`, `.jsx`
    EcmaScript,
    /// `.py`
    Python,
}

impl ImportSyntax {
    pub fn for_name(name: &str) -> Option<Self> {
        match extension(name)? {
            "ts" | "tsx" | "js" | "jsx" => Some(ImportSyntax::EcmaScript),
            "py" => Some(ImportSyntax::Python),
            _ => None,
        }
    }

    fn patterns(&self) -> &'static [Regex] {
        match self {
            ImportSyntax::EcmaScript => ecmascript_patterns(),
            ImportSyntax::Python => python_patterns(),
        }
    }
}

fn ecmascript_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            // import { a } from './a'
            r#"import\s+.*?\s+from\s+['"]([^'"]+)['"]"#,
            // import './side-effect'
            r#"import\s+['"]([^'"]+)['"]"#,
            // require('./a')
            r#"require\(\s*['"]([^'"]+)['"]\s*\)"#,
        ])
    })
}

fn python_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"from\s+([\w.]+)\s+import\b",
            r"(?m)^import\s+([\w.]+)",
        ])
    })
}

fn compile(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|src| match Regex::new(src) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::error!(pattern = src, "invalid import pattern: {}", err);
                None
            }
        })
        .collect()
}

/// Raw import targets found in `content`, in pattern order.
///
/// Each pattern is scanned across the whole text before the next one runs,
/// so results are grouped by pattern rather than sorted by position.
/// Duplicates are kept. Unknown extensions yield nothing.
pub fn extract_imports(name: &str, content: &str) -> Vec<String> {
    let Some(syntax) = ImportSyntax::for_name(name) else {
        return Vec::new();
    };

    syntax
        .patterns()
        .iter()
        .flat_map(|re| re.captures_iter(content))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
