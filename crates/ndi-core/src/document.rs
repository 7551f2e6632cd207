//! The [`Document`] record: identity, class hierarchy, property tree,
//! dependency edges, and file manifest.
//!
//! Well-known namespaces (`base`, `document_class`, `depends_on`, `files`)
//! are typed; every other top-level key is an extension namespace kept in
//! an ordered JSON tree so that collaborator-owned data round-trips through
//! persistence without loss.
//!
//! Serialized shape:
//!
//! ```json
//! {
//!   "base": {"id": "...", "session_id": "", "name": "", "datestamp": "..."},
//!   "document_class": {"definition": "...", "class_name": "probe",
//!                      "class_version": "1.0", "superclasses": [...]},
//!   "depends_on": [{"name": "subject_id", "value": "..."}],
//!   "files": {"file_list": [...], "file_info": [{"name": "...", "locations": [...]}]},
//!   "probe": {...}
//! }
//! ```

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::hierarchy::ClassHierarchy;
use crate::id::{unique_token, DocumentId};
use crate::properties::{flatten, get_path, set_path, split_path};

/// Prefix used for schema definition paths.
pub const DEFINITION_PREFIX: &str = "$NDIDOCUMENTPATH/";

// ---------------------------------------------------------------------------
// Well-known namespaces
// ---------------------------------------------------------------------------

/// The `base` namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base {
    id: DocumentId,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    datestamp: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// A declared superclass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superclass {
    pub class_name: String,
    pub definition: String,
}

impl Superclass {
    pub fn named(class_name: &str) -> Self {
        Superclass {
            class_name: class_name.to_string(),
            definition: format!("{}{}.json", DEFINITION_PREFIX, class_name),
        }
    }
}

#[derive(Serialize)]
struct SuperclassOut<'a> {
    definition: &'a str,
    class_name: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuperclassIn {
    Name(String),
    Entry {
        #[serde(default)]
        definition: String,
        #[serde(default)]
        class_name: Option<String>,
    },
}

impl Serialize for Superclass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SuperclassOut {
            definition: &self.definition,
            class_name: &self.class_name,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Superclass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SuperclassIn::deserialize(deserializer)? {
            SuperclassIn::Name(name) => Ok(Superclass::named(&name)),
            SuperclassIn::Entry {
                definition,
                class_name,
            } => {
                // Older records carry only the definition path; the class name
                // is the file stem.
                let class_name = class_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| class_from_definition(&definition));
                if class_name.is_empty() {
                    return Err(serde::de::Error::custom(
                        "superclass entry has neither class_name nor definition",
                    ));
                }
                Ok(Superclass {
                    class_name,
                    definition,
                })
            }
        }
    }
}

fn class_from_definition(definition: &str) -> String {
    let file = definition.rsplit(['/', '\\']).next().unwrap_or(definition);
    file.strip_suffix(".json").unwrap_or(file).to_string()
}

/// The `document_class` namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentClass {
    #[serde(default)]
    definition: String,
    class_name: String,
    #[serde(default)]
    class_version: Value,
    #[serde(default)]
    superclasses: Vec<Superclass>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// One named dependency edge. `value` is expected to be another document's
/// id but is not checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Dependency {
    /// The referenced id, if `value` is a well-formed id token.
    pub fn target(&self) -> Option<DocumentId> {
        DocumentId::parse(&self.value).ok()
    }
}

/// Where a file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    File,
    Url,
    #[serde(alias = "ndicloud")]
    Cloud,
}

impl LocationType {
    /// Infers the location type from the location string.
    pub fn detect(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            LocationType::Url
        } else if location.starts_with("ndic://") {
            LocationType::Cloud
        } else {
            LocationType::File
        }
    }
}

/// One location of a named file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLocation {
    #[serde(default)]
    pub uid: String,
    pub location: String,
    pub location_type: LocationType,
    #[serde(default)]
    pub ingest: bool,
    #[serde(default)]
    pub delete_original: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named file and its locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    #[serde(default)]
    pub locations: Vec<FileLocation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `files` namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub file_list: Vec<String>,
    #[serde(default)]
    pub file_info: Vec<FileInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileManifest {
    pub fn info(&self, name: &str) -> Option<&FileInfo> {
        self.file_info.iter().find(|f| f.name == name)
    }
}

/// Options for [`Document::add_file`]. Unset fields take defaults derived
/// from the location type.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOptions {
    pub ingest: Option<bool>,
    pub delete_original: Option<bool>,
    pub location_type: Option<LocationType>,
}

impl FileOptions {
    pub fn ingest(ingest: bool, delete_original: bool) -> Self {
        FileOptions {
            ingest: Some(ingest),
            delete_original: Some(delete_original),
            location_type: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A stored record.
///
/// Equality and hashing use the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    base: Base,
    document_class: DocumentClass,
    #[serde(default)]
    depends_on: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    files: Option<FileManifest>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Checks that `name` can be used as a single path component under a
/// document's binary directory.
///
/// Rejects empty names, absolute paths, path separators and `..`.
pub fn check_file_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::invalid("file name is empty"));
    }
    if name.contains(['/', '\\', '\0']) || name.contains("..") || Path::new(name).has_root() {
        return Err(CoreError::invalid(format!(
            "file name '{}' is not a plain file name",
            name
        )));
    }
    Ok(())
}

impl Document {
    /// Creates a blank document of `class` with a fresh id and datestamp.
    ///
    /// Superclasses are filled from the built-in class hierarchy.
    pub fn new(class: &str) -> Self {
        let superclasses = ClassHierarchy::builtin()
            .ancestors(class)
            .iter()
            .map(|name| Superclass::named(name))
            .collect();
        Document {
            base: Base {
                id: DocumentId::new(),
                session_id: String::new(),
                name: String::new(),
                datestamp: timestamp(),
                extra: Map::new(),
            },
            document_class: DocumentClass {
                definition: format!("{}{}.json", DEFINITION_PREFIX, class),
                class_name: class.to_string(),
                class_version: Value::String("1.0".to_string()),
                superclasses,
                extra: Map::new(),
            },
            depends_on: Vec::new(),
            files: None,
            properties: Map::new(),
        }
    }

    /// Creates a document of `class` and assigns each `(path, value)`.
    pub fn with_properties<'a>(
        class: &str,
        properties: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Self, CoreError> {
        let mut doc = Document::new(class);
        for (path, value) in properties {
            doc.set_property(path, value)?;
        }
        Ok(doc)
    }

    /// Parses a document from its JSON tree.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value).map_err(|e| CoreError::invalid(format!("malformed document: {}", e)))
    }

    /// Parses a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(|e| CoreError::invalid(format!("malformed document: {}", e)))
    }

    /// The full JSON tree of this document.
    pub fn to_value(&self) -> Value {
        // Serialization of this type cannot fail: every key is a string.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    // -----------------------------------------------------------------------
    // Identity and class
    // -----------------------------------------------------------------------

    pub fn id(&self) -> DocumentId {
        self.base.id
    }

    pub fn session_id(&self) -> &str {
        &self.base.session_id
    }

    pub fn set_session_id(&mut self, session_id: &str) -> &mut Self {
        self.base.session_id = session_id.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn datestamp(&self) -> &str {
        &self.base.datestamp
    }

    /// Parsed datestamp, if it is valid RFC 3339.
    pub fn datestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.base.datestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn class_name(&self) -> &str {
        &self.document_class.class_name
    }

    /// Declared superclass names, deduplicated, in declaration order.
    pub fn superclasses(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.document_class
            .superclasses
            .iter()
            .map(|s| s.class_name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Appends a declared superclass if not already present.
    pub fn add_superclass(&mut self, class: &str) -> &mut Self {
        if !self.document_class.superclasses.iter().any(|s| s.class_name == class) {
            self.document_class.superclasses.push(Superclass::named(class));
        }
        self
    }

    /// The class, declared superclasses, and all their ancestors under the
    /// built-in hierarchy.
    pub fn isa_set(&self) -> BTreeSet<String> {
        self.isa_set_in(ClassHierarchy::builtin())
    }

    pub fn isa_set_in(&self, hierarchy: &ClassHierarchy) -> BTreeSet<String> {
        hierarchy.resolve(self.class_name(), self.superclasses())
    }

    /// True if `class` is this document's class or any transitive superclass.
    pub fn isa(&self, class: &str) -> bool {
        self.isa_in(ClassHierarchy::builtin(), class)
    }

    pub fn isa_in(&self, hierarchy: &ClassHierarchy, class: &str) -> bool {
        if self.class_name() == class {
            return true;
        }
        self.isa_set_in(hierarchy).contains(class)
    }

    // -----------------------------------------------------------------------
    // Property tree
    // -----------------------------------------------------------------------

    /// Reads the value at a dot path anywhere in the document tree,
    /// including the well-known namespaces.
    pub fn field(&self, path: &str) -> Option<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let namespace = match head {
            "base" => serde_json::to_value(&self.base).ok()?,
            "document_class" => serde_json::to_value(&self.document_class).ok()?,
            "depends_on" => serde_json::to_value(&self.depends_on).ok()?,
            "files" => serde_json::to_value(self.files.as_ref()?).ok()?,
            other => self.properties.get(other)?.clone(),
        };
        match rest {
            None => Some(namespace),
            Some(rest) => get_path(&namespace, rest).cloned(),
        }
    }

    /// Borrowed access to an extension namespace value.
    pub fn property(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let root = self.properties.get(head)?;
        match rest {
            None => Some(root),
            Some(rest) => get_path(root, rest),
        }
    }

    /// Extension namespaces (every top-level key other than the well-known
    /// ones).
    pub fn extensions(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Assigns `value` at a dot path, creating intermediate objects.
    ///
    /// Writes to the well-known namespaces are validated by re-reading the
    /// whole document; `base.id` can never be rewritten.
    pub fn set_property(&mut self, path: &str, value: Value) -> Result<&mut Self, CoreError> {
        let parts = split_path(path)?;
        match parts[0] {
            "base" | "document_class" | "depends_on" | "files" => {
                if path == "base" || path == "base.id" {
                    return Err(CoreError::invalid("base.id is immutable"));
                }
                let id = self.id();
                let mut tree = match self.to_value() {
                    Value::Object(map) => map,
                    _ => return Err(CoreError::invalid("document did not serialize to an object")),
                };
                set_path(&mut tree, path, value)?;
                let updated = Document::from_value(Value::Object(tree))?;
                if updated.id() != id {
                    return Err(CoreError::invalid("base.id is immutable"));
                }
                *self = updated;
            }
            _ => set_path(&mut self.properties, path, value)?,
        }
        Ok(self)
    }

    /// Flattened `(path, value)` view, one column per leaf; dependencies
    /// become `depends_on_<name>` and the file manifest is omitted.
    pub fn to_flat_table(&self) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = self
            .depends_on
            .iter()
            .map(|d| (format!("depends_on_{}", d.name), Value::String(d.value.clone())))
            .collect();
        let mut tree = self.to_value();
        if let Value::Object(map) = &mut tree {
            map.remove("depends_on");
            map.remove("files");
        }
        out.extend(flatten(&tree));
        out
    }

    // -----------------------------------------------------------------------
    // Dependencies
    // -----------------------------------------------------------------------

    pub fn dependencies(&self) -> &[Dependency] {
        &self.depends_on
    }

    pub fn dependency_names(&self) -> Vec<&str> {
        self.depends_on.iter().map(|d| d.name.as_str()).collect()
    }

    /// The value of dependency `name`, or `DependencyNotFound`.
    pub fn dependency_value(&self, name: &str) -> Result<&str, CoreError> {
        self.find_dependency_value(name)
            .ok_or_else(|| CoreError::DependencyNotFound {
                name: name.to_string(),
            })
    }

    /// The value of dependency `name`, if present.
    pub fn find_dependency_value(&self, name: &str) -> Option<&str> {
        self.depends_on
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    /// Overwrites an existing dependency slot; fails if `name` is absent.
    pub fn set_dependency_value(&mut self, name: &str, value: &str) -> Result<&mut Self, CoreError> {
        match self.depends_on.iter_mut().find(|d| d.name == name) {
            Some(dep) => {
                dep.value = value.to_string();
                Ok(self)
            }
            None => Err(CoreError::DependencyNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Overwrites dependency `name`, appending it if absent.
    pub fn upsert_dependency_value(&mut self, name: &str, value: &str) -> &mut Self {
        match self.depends_on.iter_mut().find(|d| d.name == name) {
            Some(dep) => dep.value = value.to_string(),
            None => self.depends_on.push(Dependency {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
        self
    }

    /// Values of the numbered list `name_1, name_2, ...`, stopping at the
    /// first gap. Names compare case-insensitively.
    pub fn dependency_value_n(&self, name: &str) -> Vec<&str> {
        let mut values = Vec::new();
        for i in 1.. {
            let wanted = format!("{}_{}", name, i);
            match self
                .depends_on
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(&wanted))
            {
                Some(dep) => values.push(dep.value.as_str()),
                None => break,
            }
        }
        values
    }

    /// Appends `name_{k+1}` to the numbered list `name_1..name_k`.
    pub fn add_dependency_value_n(&mut self, name: &str, value: &str) -> &mut Self {
        let next = self.dependency_value_n(name).len() + 1;
        self.upsert_dependency_value(&format!("{}_{}", name, next), value)
    }

    /// Removes `name_n` from a numbered list and renumbers the entries after
    /// it so the list stays contiguous.
    pub fn remove_dependency_value_n(&mut self, name: &str, n: usize) -> Result<&mut Self, CoreError> {
        let count = self.dependency_value_n(name).len();
        if n == 0 || n > count {
            return Err(CoreError::invalid(format!(
                "cannot remove {}_{}: list has {} entries",
                name, n, count
            )));
        }
        let target = format!("{}_{}", name, n);
        self.depends_on
            .retain(|d| !d.name.eq_ignore_ascii_case(&target));
        for i in (n + 1)..=count {
            let old = format!("{}_{}", name, i);
            if let Some(dep) = self
                .depends_on
                .iter_mut()
                .find(|d| d.name.eq_ignore_ascii_case(&old))
            {
                dep.name = format!("{}_{}", name, i - 1);
            }
        }
        Ok(self)
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    pub fn files(&self) -> Option<&FileManifest> {
        self.files.as_ref()
    }

    pub fn has_files(&self) -> bool {
        self.files.as_ref().is_some_and(|f| !f.file_info.is_empty())
    }

    /// Names of files that have at least one recorded location entry.
    pub fn current_file_list(&self) -> Vec<&str> {
        self.files
            .as_ref()
            .map(|f| f.file_info.iter().map(|i| i.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Appends a location to file `name`, creating the manifest entry if new.
    ///
    /// Location type defaults to detection from the location string; `ingest`
    /// and `delete_original` default to true only for local files.
    pub fn add_file(&mut self, name: &str, location: &str, options: FileOptions) -> Result<&mut Self, CoreError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(CoreError::invalid(format!("file '{}' has an empty location", name)));
        }
        check_file_name(name)?;
        let location_type = options
            .location_type
            .unwrap_or_else(|| LocationType::detect(location));
        let is_file = location_type == LocationType::File;
        let entry = FileLocation {
            uid: unique_token(),
            location: location.to_string(),
            location_type,
            ingest: options.ingest.unwrap_or(is_file),
            delete_original: options.delete_original.unwrap_or(is_file),
            parameters: Value::String(String::new()),
            extra: Map::new(),
        };

        let manifest = self.files.get_or_insert_with(FileManifest::default);
        match manifest.file_info.iter_mut().find(|f| f.name == name) {
            Some(info) => info.locations.push(entry),
            None => manifest.file_info.push(FileInfo {
                name: name.to_string(),
                locations: vec![entry],
                extra: Map::new(),
            }),
        }
        if !manifest.file_list.iter().any(|f| f == name) {
            manifest.file_list.push(name.to_string());
        }
        Ok(self)
    }

    /// Checks `name` against `files.file_list`, accepting numbered names
    /// (`data_3` matches a declared `data_#`). Returns the index into
    /// `file_info` when a location entry exists.
    pub fn is_in_file_list(&self, name: &str) -> Result<Option<usize>, CoreError> {
        let not_found = || CoreError::FileNotInManifest {
            name: name.to_string(),
        };
        let manifest = self.files.as_ref().ok_or_else(not_found)?;

        let mut search = name.to_string();
        if let Some(pos) = name.rfind('_') {
            if name[pos + 1..].parse::<u64>().is_ok() {
                search = format!("{}#", &name[..=pos]);
            }
        }
        let declared = manifest
            .file_list
            .iter()
            .any(|f| f.eq_ignore_ascii_case(&search) || f.eq_ignore_ascii_case(name));
        if !declared {
            return Err(not_found());
        }
        Ok(manifest
            .file_info
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// The uid of the first location of file `name`.
    pub fn get_fuid(&self, name: &str) -> Option<&str> {
        let index = self.is_in_file_list(name).ok()??;
        self.files
            .as_ref()?
            .file_info
            .get(index)?
            .locations
            .first()
            .map(|l| l.uid.as_str())
    }

    /// Removes file `name` entirely, or only the matching `location`.
    pub fn remove_file(&mut self, name: &str, location: Option<&str>) -> Result<&mut Self, CoreError> {
        let Some(index) = self.is_in_file_list(name)? else {
            return Ok(self);
        };
        let Some(manifest) = self.files.as_mut() else {
            return Ok(self);
        };
        match location.filter(|l| !l.is_empty()) {
            None => {
                manifest.file_info.remove(index);
            }
            Some(location) => {
                let info = &mut manifest.file_info[index];
                info.locations
                    .retain(|l| !l.location.eq_ignore_ascii_case(location));
            }
        }
        Ok(self)
    }

    /// Empties `files.file_info`, keeping the declared `file_list`.
    pub fn reset_file_info(&mut self) -> &mut Self {
        if let Some(manifest) = self.files.as_mut() {
            manifest.file_info.clear();
        }
        self
    }

    /// Checks every name in the file manifest with [`check_file_name`].
    ///
    /// Documents read from JSON bypass [`Document::add_file`], so storage
    /// backends call this before writing.
    pub fn check_file_names(&self) -> Result<(), CoreError> {
        let Some(manifest) = self.files.as_ref() else {
            return Ok(());
        };
        manifest
            .file_info
            .iter()
            .map(|info| info.name.as_str())
            .chain(manifest.file_list.iter().map(String::as_str))
            .try_for_each(check_file_name)
    }

    /// Rewrites the location of every ingestible file location.
    ///
    /// `relocate` receives the file name and current location and returns
    /// the new location, or `None` to leave it alone. Used by storage
    /// backends when they take ownership of a file; returns how many
    /// locations changed.
    pub fn relocate_ingested_files(
        &mut self,
        mut relocate: impl FnMut(&str, &FileLocation) -> Option<String>,
    ) -> usize {
        let Some(manifest) = self.files.as_mut() else {
            return 0;
        };
        let mut changed = 0;
        for info in &mut manifest.file_info {
            for location in info.locations.iter_mut().filter(|l| l.ingest) {
                if let Some(new_location) = relocate(&info.name, location) {
                    location.location = new_location;
                    changed += 1;
                }
            }
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    /// Combines two documents: superclasses and dependencies of `other` are
    /// appended, other namespaces are only copied where `self` lacks them.
    /// The result keeps `self`'s id.
    pub fn merge(&self, other: &Document) -> Document {
        let mut merged = self.clone();
        for superclass in &other.document_class.superclasses {
            merged.document_class.superclasses.push(superclass.clone());
        }
        merged.depends_on.extend(other.depends_on.iter().cloned());
        for (key, value) in &other.properties {
            if !merged.properties.contains_key(key) {
                merged.properties.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Position and reference of the document with `id`.
    pub fn find_doc_by_id<'a>(docs: &'a [Document], id: &DocumentId) -> Option<(usize, &'a Document)> {
        docs.iter().enumerate().find(|(_, d)| d.id() == *id)
    }

    /// Position and reference of the document with the latest datestamp.
    /// Unparsable datestamps sort as oldest.
    pub fn find_newest(docs: &[Document]) -> Option<(usize, &Document)> {
        docs.iter()
            .enumerate()
            .max_by_key(|(_, d)| d.datestamp_utc())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_document_has_identity_and_class() {
        let doc = Document::new("probe");
        assert_eq!(doc.class_name(), "probe");
        assert_eq!(doc.session_id(), "");
        assert!(doc.datestamp_utc().is_some());
        assert!(doc.superclasses().contains(&"element"));
        assert!(doc.superclasses().contains(&"base"));
    }

    #[test]
    fn equality_is_by_id() {
        let a = Document::new("base");
        let mut b = a.clone();
        b.set_property("probe.name", json!("changed")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Document::new("base"));
    }

    #[test]
    fn isa_matches_class_and_ancestors() {
        let doc = Document::new("extracellular");
        assert!(doc.isa("extracellular"));
        assert!(doc.isa("probe"));
        assert!(doc.isa("base"));
        assert!(!doc.isa("subject"));
    }

    #[test]
    fn isa_resolves_declared_superclass_aliases() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.register("b", ["a"]);
        let mut doc = Document::new("custom");
        doc.add_superclass("b");
        assert!(doc.isa_in(&hierarchy, "a"));
        assert!(doc.isa_in(&hierarchy, "b"));
        assert!(!doc.isa_in(&ClassHierarchy::new(), "a"));
    }

    #[test]
    fn isa_through_builtin_alias() {
        let mut doc = Document::new("custom");
        doc.add_superclass("ndi_document");
        assert!(doc.isa("base"));
    }

    #[test]
    fn json_roundtrip_is_lossless() {
        let mut doc = Document::with_properties(
            "subject",
            [("subject.local_identifier", json!("mouse@lab")), ("subject.weight", json!(21.5))],
        )
        .unwrap();
        doc.upsert_dependency_value("session_id", &DocumentId::new().to_string());
        doc.add_file("data.bin", "/tmp/data.bin", FileOptions::default()).unwrap();

        let text = serde_json::to_string(&doc).unwrap();
        let back = Document::from_json(&text).unwrap();
        assert_eq!(back.to_value(), doc.to_value());
        assert_eq!(back.property("subject.weight"), Some(&json!(21.5)));
    }

    #[test]
    fn deserializes_legacy_superclass_entries() {
        let id = DocumentId::new();
        let value = json!({
            "base": {"id": id.to_string()},
            "document_class": {
                "class_name": "probe",
                "superclasses": [{"definition": "$NDIDOCUMENTPATH/element.json"}, "base"]
            }
        });
        let doc = Document::from_value(value).unwrap();
        assert_eq!(doc.id(), id);
        assert_eq!(doc.superclasses(), vec!["element", "base"]);
    }

    #[test]
    fn field_reads_well_known_and_extension_paths() {
        let doc = Document::with_properties("probe", [("probe.reference", json!(3))]).unwrap();
        assert_eq!(doc.field("base.id"), Some(json!(doc.id().to_string())));
        assert_eq!(doc.field("document_class.class_name"), Some(json!("probe")));
        assert_eq!(doc.field("probe.reference"), Some(json!(3)));
        assert_eq!(doc.field("probe.missing"), None);
        assert_eq!(doc.field("files"), None);
    }

    #[test]
    fn set_property_on_well_known_namespace() {
        let mut doc = Document::new("base");
        doc.set_property("base.name", json!("my doc")).unwrap();
        assert_eq!(doc.name(), "my doc");
        doc.set_property("base.session_id", json!("s1")).unwrap();
        assert_eq!(doc.session_id(), "s1");
    }

    #[test]
    fn base_id_is_immutable() {
        let mut doc = Document::new("base");
        let id = doc.id();
        let err = doc
            .set_property("base.id", json!(DocumentId::new().to_string()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert_eq!(doc.id(), id);
    }

    #[test]
    fn dependency_value_must_exist() {
        let mut doc = Document::new("base");
        assert!(matches!(
            doc.dependency_value("subject_id"),
            Err(CoreError::DependencyNotFound { .. })
        ));
        assert!(doc.set_dependency_value("subject_id", "x").is_err());
        assert!(doc.dependencies().is_empty());

        doc.upsert_dependency_value("subject_id", "x");
        assert_eq!(doc.dependency_value("subject_id").unwrap(), "x");
        doc.set_dependency_value("subject_id", "y").unwrap();
        assert_eq!(doc.find_dependency_value("subject_id"), Some("y"));
        assert_eq!(doc.dependencies().len(), 1);
    }

    #[test]
    fn numbered_dependencies() {
        let mut doc = Document::new("base");
        doc.add_dependency_value_n("probe", "p1");
        doc.add_dependency_value_n("probe", "p2");
        doc.add_dependency_value_n("probe", "p3");
        assert_eq!(doc.dependency_value_n("probe"), vec!["p1", "p2", "p3"]);
        assert_eq!(doc.dependency_names(), vec!["probe_1", "probe_2", "probe_3"]);

        doc.remove_dependency_value_n("probe", 2).unwrap();
        assert_eq!(doc.dependency_value_n("probe"), vec!["p1", "p3"]);
        assert!(doc.remove_dependency_value_n("probe", 5).is_err());
    }

    #[test]
    fn add_file_detects_location_type() {
        let mut doc = Document::new("base");
        doc.add_file("local.bin", "  /data/local.bin ", FileOptions::default()).unwrap();
        doc.add_file("remote.bin", "https://example.org/r.bin", FileOptions::default())
            .unwrap();
        doc.add_file("cloud.bin", "ndic://bucket/c.bin", FileOptions::default())
            .unwrap();

        let manifest = doc.files().unwrap();
        let local = &manifest.info("local.bin").unwrap().locations[0];
        assert_eq!(local.location, "/data/local.bin");
        assert_eq!(local.location_type, LocationType::File);
        assert!(local.ingest && local.delete_original);
        assert_eq!(local.uid.len(), 32);

        let remote = &manifest.info("remote.bin").unwrap().locations[0];
        assert_eq!(remote.location_type, LocationType::Url);
        assert!(!remote.ingest && !remote.delete_original);

        let cloud = &manifest.info("cloud.bin").unwrap().locations[0];
        assert_eq!(cloud.location_type, LocationType::Cloud);
        assert_eq!(manifest.file_list, vec!["local.bin", "remote.bin", "cloud.bin"]);
    }

    #[test]
    fn add_file_appends_locations_to_existing_entry() {
        let mut doc = Document::new("base");
        doc.add_file("f", "/a", FileOptions::default()).unwrap();
        doc.add_file("f", "/b", FileOptions::ingest(false, false)).unwrap();
        let info = doc.files().unwrap().info("f").unwrap();
        assert_eq!(info.locations.len(), 2);
        assert!(!info.locations[1].ingest);
        assert_eq!(doc.current_file_list(), vec!["f"]);
    }

    #[test]
    fn add_file_rejects_empty_location() {
        let mut doc = Document::new("base");
        let err = doc.add_file("f", "   ", FileOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert!(!doc.has_files());
    }

    #[test]
    fn add_file_rejects_path_like_names() {
        let mut doc = Document::new("base");
        for name in ["", "/etc/passwd", "../escape", "a/b", "a\\b", "..", "x..y"] {
            let err = doc.add_file(name, "/src/f", FileOptions::default()).unwrap_err();
            assert!(matches!(err, CoreError::InvalidArgument { .. }), "name {:?}", name);
        }
        assert!(!doc.has_files());
        doc.add_file("epoch_#.bin", "/src/f", FileOptions::default()).unwrap();
        assert!(doc.check_file_names().is_ok());
    }

    #[test]
    fn manifest_names_from_json_are_checked() {
        let mut value = Document::new("base").to_value();
        value["files"] = json!({
            "file_list": ["../../victim"],
            "file_info": [{"name": "../../victim", "locations": []}]
        });
        let doc = Document::from_json(&value.to_string()).unwrap();
        assert!(matches!(
            doc.check_file_names(),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn numbered_file_names_match_declared_pattern() {
        let mut doc = Document::new("base");
        doc.set_property("files.file_list", json!(["epoch_#"])).unwrap();
        assert_eq!(doc.is_in_file_list("epoch_3").unwrap(), None);
        assert!(doc.is_in_file_list("other").is_err());

        doc.add_file("epoch_3", "/e3", FileOptions::default()).unwrap();
        assert_eq!(doc.is_in_file_list("epoch_3").unwrap(), Some(0));
        assert!(doc.get_fuid("epoch_3").is_some());
    }

    #[test]
    fn remove_file_and_reset() {
        let mut doc = Document::new("base");
        doc.add_file("f", "/a", FileOptions::default()).unwrap();
        doc.add_file("f", "/b", FileOptions::default()).unwrap();
        doc.remove_file("f", Some("/A")).unwrap();
        assert_eq!(doc.files().unwrap().info("f").unwrap().locations.len(), 1);
        doc.remove_file("f", None).unwrap();
        assert!(!doc.has_files());
        assert!(doc.remove_file("nope", None).is_err());

        doc.add_file("g", "/g", FileOptions::default()).unwrap();
        doc.reset_file_info();
        assert!(doc.current_file_list().is_empty());
        assert_eq!(doc.files().unwrap().file_list, vec!["f", "g"]);
    }

    #[test]
    fn relocate_only_touches_ingested_locations() {
        let mut doc = Document::new("base");
        doc.add_file("a", "/src/a", FileOptions::default()).unwrap();
        doc.add_file("b", "https://x/b", FileOptions::default()).unwrap();
        let changed = doc.relocate_ingested_files(|name, _| Some(format!("/db/{}", name)));
        assert_eq!(changed, 1);
        let manifest = doc.files().unwrap();
        assert_eq!(manifest.info("a").unwrap().locations[0].location, "/db/a");
        assert_eq!(manifest.info("b").unwrap().locations[0].location, "https://x/b");
    }

    #[test]
    fn merge_appends_dependencies_and_keeps_own_fields() {
        let mut a = Document::with_properties("base", [("x.v", json!(1))]).unwrap();
        a.upsert_dependency_value("d1", "1");
        let mut b = Document::with_properties("base", [("x.v", json!(2)), ("y.v", json!(3))]).unwrap();
        b.upsert_dependency_value("d2", "2");

        let merged = a.merge(&b);
        assert_eq!(merged.id(), a.id());
        assert_eq!(merged.dependency_names(), vec!["d1", "d2"]);
        assert_eq!(merged.property("x.v"), Some(&json!(1)));
        assert_eq!(merged.property("y.v"), Some(&json!(3)));
    }

    #[test]
    fn find_by_id_and_newest() {
        let mut old = Document::new("base");
        old.set_property("base.datestamp", json!("2001-01-01T00:00:00Z")).unwrap();
        let new = Document::new("base");
        let docs = vec![new.clone(), old.clone()];

        assert_eq!(Document::find_doc_by_id(&docs, &old.id()).map(|(i, _)| i), Some(1));
        assert!(Document::find_doc_by_id(&docs, &DocumentId::new()).is_none());
        assert_eq!(Document::find_newest(&docs).map(|(i, _)| i), Some(0));
        assert!(Document::find_newest(&[]).is_none());
    }

    #[test]
    fn flat_table_has_dependency_columns() {
        let mut doc = Document::with_properties("base", [("x.v", json!(1))]).unwrap();
        doc.upsert_dependency_value("subject_id", "abc");
        doc.add_file("f", "/f", FileOptions::default()).unwrap();
        let table = doc.to_flat_table();
        assert_eq!(table[0], ("depends_on_subject_id".to_string(), json!("abc")));
        assert!(table.iter().any(|(k, v)| k == "x.v" && *v == json!(1)));
        assert!(table.iter().all(|(k, _)| !k.starts_with("files")));
    }
}
