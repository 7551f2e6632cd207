//! Dependency-graph utilities over stored documents.
//!
//! Dependencies are plain id strings in `depends_on`; nothing checks them at
//! write time. The traversals here expand an explicit frontier with a
//! visited set, so cyclic graphs terminate and each document is reported
//! once. Dependencies whose target is not stored are skipped.

use std::collections::{HashMap, HashSet, VecDeque};

use ndi_core::{Document, DocumentId, Query, ANY_DEPENDENCY};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use crate::error::StorageError;
use crate::traits::Database;

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Every stored document that transitively depends on any of `seeds`.
///
/// Seeds are never reported, even when a cycle leads back to one or one
/// seed depends on another.
pub fn find_dependents(db: &dyn Database, seeds: &[DocumentId]) -> Result<Vec<Document>, StorageError> {
    let mut visited: HashSet<DocumentId> = seeds.iter().copied().collect();
    let mut frontier: VecDeque<DocumentId> = seeds.iter().copied().collect();
    let mut found = Vec::new();

    while let Some(current) = frontier.pop_front() {
        let query = Query::depends_on(ANY_DEPENDENCY, &current.to_string());
        for doc in db.search(&query)? {
            let id = doc.id();
            if visited.insert(id) {
                frontier.push_back(id);
                found.push(doc);
            }
        }
    }
    Ok(found)
}

/// Every stored document that any of `seeds` transitively depends on.
/// Seeds are never reported.
pub fn find_antecedents(db: &dyn Database, seeds: &[DocumentId]) -> Result<Vec<Document>, StorageError> {
    let mut visited: HashSet<DocumentId> = seeds.iter().copied().collect();
    let mut found = Vec::new();
    let mut frontier: Vec<Document> = fetch_by_ids(db, seeds)?.into_iter().flatten().collect();

    while !frontier.is_empty() {
        let targets: Vec<DocumentId> = frontier
            .iter()
            .flat_map(|doc| doc.dependencies().iter().filter_map(|d| d.target()))
            .filter(|id| !visited.contains(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if targets.is_empty() {
            break;
        }
        let query = Query::or(targets.iter().map(Query::id));
        frontier = Vec::new();
        for doc in db.search(&query)? {
            if visited.insert(doc.id()) {
                frontier.push(doc.clone());
                found.push(doc);
            }
        }
        // Targets that are not stored must not be asked for again.
        visited.extend(targets);
    }
    Ok(found)
}

/// Fetches documents by id with one query.
///
/// The result has one slot per input id, in input order; `None` marks an id
/// that is not stored.
pub fn fetch_by_ids(db: &dyn Database, ids: &[DocumentId]) -> Result<Vec<Option<Document>>, StorageError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let query = Query::or(ids.iter().map(Query::id));
    let by_id: HashMap<DocumentId, Document> = db
        .search(&query)?
        .into_iter()
        .map(|doc| (doc.id(), doc))
        .collect();
    Ok(ids.iter().map(|id| by_id.get(id).cloned()).collect())
}

// ---------------------------------------------------------------------------
// Missing dependency audit
// ---------------------------------------------------------------------------

/// A `depends_on` entry whose target is not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDependency {
    pub document: DocumentId,
    pub name: String,
    pub value: String,
}

/// Lists dependencies that point at documents absent from `db`.
///
/// With a non-empty `names` only those dependency slots are audited. Empty
/// values mean "no dependency" and are ignored.
pub fn find_missing_dependencies(
    db: &dyn Database,
    names: &[&str],
) -> Result<Vec<MissingDependency>, StorageError> {
    let stored: HashSet<String> = db.all_doc_ids()?.iter().map(|id| id.to_string()).collect();
    let query = if names.is_empty() {
        Query::has_dependency(ANY_DEPENDENCY)
    } else {
        Query::or(names.iter().map(|name| Query::has_dependency(name)))
    };

    let mut missing = Vec::new();
    for doc in db.search(&query)? {
        for dep in doc.dependencies() {
            if dep.value.is_empty() || stored.contains(&dep.value) {
                continue;
            }
            if !names.is_empty() && !names.contains(&dep.name.as_str()) {
                continue;
            }
            missing.push(MissingDependency {
                document: doc.id(),
                name: dep.name.clone(),
                value: dep.value.clone(),
            });
        }
    }
    missing.sort_by(|a, b| (a.document, &a.name).cmp(&(b.document, &b.name)));
    Ok(missing)
}

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

/// Dependency relation over a fixed document set.
///
/// Edges run from a dependency to its dependent. Dependencies on documents
/// outside the set are ignored.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<DocumentId, String>,
    index: HashMap<DocumentId, NodeIndex>,
}

/// Builds the dependency graph of `docs`.
pub fn build_adjacency(docs: &[Document]) -> DependencyGraph {
    let mut graph = DiGraph::new();
    let mut index = HashMap::with_capacity(docs.len());
    for doc in docs {
        let id = doc.id();
        index.entry(id).or_insert_with(|| graph.add_node(id));
    }
    for doc in docs {
        let dependent = index[&doc.id()];
        for dep in doc.dependencies() {
            let Some(target) = dep.target() else { continue };
            let Some(&dependency) = index.get(&target) else { continue };
            if graph.find_edge(dependency, dependent).is_none() {
                graph.add_edge(dependency, dependent, dep.name.clone());
            }
        }
    }
    DependencyGraph { graph, index }
}

impl DependencyGraph {
    /// Document ids in node order; this is the row/column order of
    /// [`adjacency_matrix`](Self::adjacency_matrix).
    pub fn node_ids(&self) -> Vec<DocumentId> {
        self.graph.node_weights().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// `m[i][j]` is true when document i depends on document j.
    pub fn adjacency_matrix(&self) -> Vec<Vec<bool>> {
        let n = self.graph.node_count();
        let mut matrix = vec![vec![false; n]; n];
        for edge in self.graph.raw_edges() {
            matrix[edge.target().index()][edge.source().index()] = true;
        }
        matrix
    }

    /// Documents in the set that directly depend on `id`.
    pub fn dependents_of(&self, id: &DocumentId) -> Vec<DocumentId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<DocumentId> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect();
        ids.sort();
        ids
    }

    /// Documents in the set that `id` directly depends on.
    pub fn dependencies_of(&self, id: &DocumentId) -> Vec<DocumentId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<DocumentId> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        ids.sort();
        ids
    }

    /// Ids ordered so every dependency precedes its dependents, or `None`
    /// if the set contains a cycle.
    pub fn topological_order(&self) -> Option<Vec<DocumentId>> {
        toposort(&self.graph, None)
            .ok()
            .map(|order| order.into_iter().map(|n| self.graph[n]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_depending_on(name: &str, targets: &[&Document]) -> Document {
        let mut doc = Document::new("base");
        for target in targets {
            doc.add_dependency_value_n(name, &target.id().to_string());
        }
        doc
    }

    #[test]
    fn adjacency_rows_are_dependents() {
        let a = Document::new("base");
        let b = doc_depending_on("input", &[&a]);
        let graph = build_adjacency(&[a.clone(), b.clone()]);

        assert_eq!(graph.node_ids(), vec![a.id(), b.id()]);
        assert_eq!(
            graph.adjacency_matrix(),
            vec![vec![false, false], vec![true, false]]
        );
        assert_eq!(graph.dependents_of(&a.id()), vec![b.id()]);
        assert_eq!(graph.dependencies_of(&b.id()), vec![a.id()]);
    }

    #[test]
    fn outside_dependencies_are_ignored() {
        let outside = Document::new("base");
        let a = doc_depending_on("input", &[&outside]);
        let graph = build_adjacency(std::slice::from_ref(&a));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let a = Document::new("base");
        let b = doc_depending_on("input", &[&a]);
        let c = doc_depending_on("input", &[&b]);
        let graph = build_adjacency(&[c.clone(), a.clone(), b.clone()]);
        assert_eq!(graph.topological_order().unwrap(), vec![a.id(), b.id(), c.id()]);
    }

    #[test]
    fn cycles_have_no_topological_order() {
        let mut a = Document::new("base");
        let b = doc_depending_on("input", &[&a]);
        a.add_dependency_value_n("loop", &b.id().to_string());
        assert!(build_adjacency(&[a, b]).topological_order().is_none());
    }
}
