//! Document class hierarchy.
//!
//! Documents declare a class name and a list of superclass names. A
//! [`ClassHierarchy`] records the parents of known classes so that `isa`
//! tests see through intermediate classes and aliases: a document declaring
//! superclass `B`, where `B` is registered with parent `A`, is also an `A`.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use indexmap::IndexMap;

/// Well-known classes and their direct parents.
const BUILTIN_CLASSES: &[(&str, &[&str])] = &[
    ("base", &[]),
    ("ndi_document", &["base"]),
    ("session", &["base"]),
    ("dataset_session_info", &["base"]),
    ("subject", &["base"]),
    ("element", &["base"]),
    ("probe", &["element"]),
    ("extracellular", &["probe"]),
    ("element_epoch", &["base"]),
    ("daqsystem", &["base"]),
    ("daqreader", &["base"]),
    ("daqreader_mfdaq", &["daqreader"]),
    ("epochfiles_ingested", &["base"]),
    ("daqreader_mfdaq_epochdata_ingested", &["epochfiles_ingested"]),
    ("daqmetadatareader_epochdata_ingested", &["epochfiles_ingested"]),
    ("syncgraph", &["base"]),
    ("syncrule", &["base"]),
    ("app", &["base"]),
    ("calculation", &["app"]),
    ("stimulus_presentation", &["base"]),
    ("stimulus_response", &["base"]),
    ("ontology_label", &["base"]),
];

/// Class name → direct parent names.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    parents: IndexMap<String, Vec<String>>,
}

impl ClassHierarchy {
    /// An empty hierarchy: only declared names match.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared built-in hierarchy of well-known document classes.
    pub fn builtin() -> &'static ClassHierarchy {
        static BUILTIN: OnceLock<ClassHierarchy> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let mut hierarchy = ClassHierarchy::new();
            for (class, parents) in BUILTIN_CLASSES {
                hierarchy.register(class, parents.iter().copied());
            }
            hierarchy
        })
    }

    /// Registers `class` with the given direct parents, appending to any
    /// parents already known.
    pub fn register<'a>(&mut self, class: &str, parents: impl IntoIterator<Item = &'a str>) {
        let entry = self.parents.entry(class.to_string()).or_default();
        for parent in parents {
            if !entry.iter().any(|p| p == parent) {
                entry.push(parent.to_string());
            }
        }
    }

    /// Returns true if the hierarchy knows `class`.
    pub fn contains(&self, class: &str) -> bool {
        self.parents.contains_key(class)
    }

    /// Direct parents of `class` (empty if unknown).
    pub fn parents(&self, class: &str) -> &[String] {
        self.parents.get(class).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// All transitive ancestors of `class`, excluding `class` itself unless a
    /// cycle leads back to it.
    pub fn ancestors(&self, class: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut frontier: Vec<&str> = self.parents(class).iter().map(|p| p.as_str()).collect();
        while let Some(next) = frontier.pop() {
            if seen.insert(next.to_string()) {
                frontier.extend(self.parents(next).iter().map(|p| p.as_str()));
            }
        }
        seen
    }

    /// The complete isa set for a document with the given class and declared
    /// superclasses: the class, each declared superclass, and every ancestor
    /// of either.
    pub fn resolve<'a>(
        &self,
        class: &str,
        declared: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        set.insert(class.to_string());
        set.extend(self.ancestors(class));
        for superclass in declared {
            set.insert(superclass.to_string());
            set.extend(self.ancestors(superclass));
        }
        set
    }
}
