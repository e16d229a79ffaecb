//! Dependency graph between corpus files.
//!
//! Rebuilt from scratch whenever the corpus changes; there is no incremental
//! maintenance. Resolution is best-effort and never fails: references that
//! match no file are simply left out.

pub mod imports;

pub use imports::{extract_imports, ImportSyntax};

use crate::corpus::{FileKind, FileRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub name: String,
    pub kind: FileKind,
}

/// Directed `source → target` edge between file names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    /// Files that `name` imports, in edge order (duplicates included).
    pub fn dependencies_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == name)
            .map(|e| e.target.as_str())
    }

    /// Files that import `name`.
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.target == name)
            .map(|e| e.source.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Build the graph for `files`.
///
/// Every file becomes a node; only `source` files are scanned for imports.
pub fn build_graph(files: &[FileRecord]) -> DependencyGraph {
    let nodes = files
        .iter()
        .map(|f| GraphNode {
            id: f.id,
            name: f.name.clone(),
            kind: f.kind,
        })
        .collect();

    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    let mut edges = Vec::new();

    for file in files.iter().filter(|f| f.kind == FileKind::Source) {
        for reference in extract_imports(&file.name, &file.content) {
            match resolve_reference(&reference, &names) {
                Some(target) => edges.push(GraphEdge {
                    source: file.name.clone(),
                    target: target.to_string(),
                }),
                None => tracing::trace!(from = %file.name, %reference, "unresolved import"),
            }
        }
    }

    DependencyGraph { nodes, edges }
}

/// Match a raw import reference to one of `names`.
///
/// An exact name match wins. Otherwise the reference's last path segment is
/// compared with each extension-stripped name, either whole or as a
/// `/segment` suffix. Candidates are tried in corpus order, so the
/// earliest-ingested file wins a tie.
pub fn resolve_reference<'a>(reference: &str, names: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = names.iter().find(|n| **n == reference) {
        return Some(*exact);
    }

    let segment = reference.rsplit('/').next().unwrap_or(reference);
    let suffix = format!("/{}", segment);
    names
        .iter()
        .find(|name| {
            let stem = strip_extension(name);
            stem == segment || stem.ends_with(&suffix)
        })
        .copied()
}

/// Everything before the last `.`; empty when the name has no dot at all.
fn strip_extension(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, content: &str) -> FileRecord {
        FileRecord::new(name, content, FileKind::Source)
    }

    #[test]
    fn test_relative_import_resolves_by_suffix() {
        let files = vec![
            source("src/utils.ts", "export const x = 1;"),
            source("src/helper.ts", "export const y = 2;"),
            source("src/main.ts", "import { x } from './utils';"),
        ];
        let graph = build_graph(&files);

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(
            graph.edges,
            vec![GraphEdge {
                source: "src/main.ts".into(),
                target: "src/utils.ts".into(),
            }]
        );
        assert_eq!(graph.dependents_of("src/helper.ts").count(), 0);
    }

    #[test]
    fn test_unresolved_import_is_dropped() {
        let files = vec![source("a.js", "const m = require('nonexistent-module');")];
        let graph = build_graph(&files);
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_every_kind_is_a_node_but_only_source_is_scanned() {
        let files = vec![
            source("lib.ts", ""),
            FileRecord::new("notes.log", "import x from './lib'", FileKind::Log),
            FileRecord::new("shot.png", "aGk=", FileKind::Image),
            FileRecord::new("issue.ts", "import x from './lib'", FileKind::Issue),
        ];
        let graph = build_graph(&files);
        assert_eq!(graph.nodes.len(), 4);
        assert!(graph.edges.is_empty());
        assert_eq!(graph.nodes[2].kind, FileKind::Image);
    }

    #[test]
    fn test_exact_name_match_takes_precedence() {
        let names = ["pkg/react.js", "react"];
        assert_eq!(resolve_reference("react", &names), Some("react"));
    }

    #[test]
    fn test_tie_break_prefers_corpus_order() {
        let names = ["a/helper.ts", "b/helper.ts"];
        assert_eq!(resolve_reference("../helper", &names), Some("a/helper.ts"));
        let reversed = ["b/helper.ts", "a/helper.ts"];
        assert_eq!(resolve_reference("../helper", &reversed), Some("b/helper.ts"));
    }

    #[test]
    fn test_suffix_requires_segment_boundary() {
        let names = ["src/myutils.ts"];
        assert_eq!(resolve_reference("./utils", &names), None);
    }

    #[test]
    fn test_bare_name_matches_top_level_file() {
        let names = ["utils.py"];
        assert_eq!(resolve_reference("utils", &names), Some("utils.py"));
    }

    #[test]
    fn test_cycles_and_duplicate_edges_are_kept() {
        let files = vec![
            source("a.ts", "import b from './b';\nimport again from './b';"),
            source("b.ts", "import a from './a';"),
        ];
        let graph = build_graph(&files);
        assert_eq!(graph.dependencies_of("a.ts").collect::<Vec<_>>(), vec!["b.ts", "b.ts"]);
        assert_eq!(graph.dependencies_of("b.ts").collect::<Vec<_>>(), vec!["a.ts"]);
    }

    #[test]
    fn test_graph_serializes_for_visualization() {
        let files = vec![source("a.ts", "")];
        let json = build_graph(&files).to_json().unwrap();
        assert!(json.contains("\"kind\": \"source\""));
        assert!(json.contains("\"edges\": []"));
    }
}
