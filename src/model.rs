use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Prefix for synthetic database targets: `db::TABLE` or `db::TABLE.COLUMN`.
pub const SYNTHETIC_DB_PREFIX: &str = "db::";
/// Prefix for synthetic external resources (queues, third-party APIs, ...).
pub const SYNTHETIC_EXT_PREFIX: &str = "ext::";

pub fn is_synthetic_id(id: &str) -> bool {
    id.starts_with(SYNTHETIC_DB_PREFIX) || id.starts_with(SYNTHETIC_EXT_PREFIX)
}

/// Architectural bucket derived from a symbol kind. Never stored as a source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Backend,
    Database,
    View,
    Frontend,
    Unknown,
}

impl Layer {
    pub const ALL: [Layer; 5] = [
        Layer::Backend,
        Layer::Database,
        Layer::View,
        Layer::Frontend,
        Layer::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Backend => "backend",
            Layer::Database => "database",
            Layer::View => "view",
            Layer::Frontend => "frontend",
            Layer::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search domain a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Code,
    Docs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Entity,
    EntityField,
    Class,
    Interface,
    Function,
    Method,
    Module,
    Endpoint,
    Service,
    Table,
    Column,
    DbView,
    Procedure,
    Template,
    ViewBinding,
    FormField,
    ViewBlock,
    Component,
    Script,
    StateField,
    DocSection,
    DocHeading,
    Unknown,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 23] = [
        SymbolKind::Entity,
        SymbolKind::EntityField,
        SymbolKind::Class,
        SymbolKind::Interface,
        SymbolKind::Function,
        SymbolKind::Method,
        SymbolKind::Module,
        SymbolKind::Endpoint,
        SymbolKind::Service,
        SymbolKind::Table,
        SymbolKind::Column,
        SymbolKind::DbView,
        SymbolKind::Procedure,
        SymbolKind::Template,
        SymbolKind::ViewBinding,
        SymbolKind::FormField,
        SymbolKind::ViewBlock,
        SymbolKind::Component,
        SymbolKind::Script,
        SymbolKind::StateField,
        SymbolKind::DocSection,
        SymbolKind::DocHeading,
        SymbolKind::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Entity => "entity",
            SymbolKind::EntityField => "entity_field",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Module => "module",
            SymbolKind::Endpoint => "endpoint",
            SymbolKind::Service => "service",
            SymbolKind::Table => "table",
            SymbolKind::Column => "column",
            SymbolKind::DbView => "db_view",
            SymbolKind::Procedure => "procedure",
            SymbolKind::Template => "template",
            SymbolKind::ViewBinding => "view_binding",
            SymbolKind::FormField => "form_field",
            SymbolKind::ViewBlock => "view_block",
            SymbolKind::Component => "component",
            SymbolKind::Script => "script",
            SymbolKind::StateField => "state_field",
            SymbolKind::DocSection => "doc_section",
            SymbolKind::DocHeading => "doc_heading",
            SymbolKind::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<SymbolKind> {
        let value = raw.trim().to_ascii_lowercase();
        SymbolKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
    }

    /// The one kind-to-layer table. Every query that needs a layer goes through here.
    pub fn layer(self) -> Layer {
        match self {
            SymbolKind::Entity
            | SymbolKind::EntityField
            | SymbolKind::Class
            | SymbolKind::Interface
            | SymbolKind::Function
            | SymbolKind::Method
            | SymbolKind::Module
            | SymbolKind::Endpoint
            | SymbolKind::Service => Layer::Backend,
            SymbolKind::Table | SymbolKind::Column | SymbolKind::DbView | SymbolKind::Procedure => {
                Layer::Database
            }
            SymbolKind::Template
            | SymbolKind::ViewBinding
            | SymbolKind::FormField
            | SymbolKind::ViewBlock => Layer::View,
            SymbolKind::Component | SymbolKind::Script | SymbolKind::StateField => {
                Layer::Frontend
            }
            SymbolKind::DocSection | SymbolKind::DocHeading | SymbolKind::Unknown => {
                Layer::Unknown
            }
        }
    }

    pub fn domain(self) -> Domain {
        match self {
            SymbolKind::DocSection | SymbolKind::DocHeading => Domain::Docs,
            _ => Domain::Code,
        }
    }

    /// Kinds where a lineage trace may start.
    pub fn is_source_role(self) -> bool {
        matches!(
            self,
            SymbolKind::ViewBinding | SymbolKind::FormField | SymbolKind::StateField
        )
    }

    /// Kinds where a lineage trace is complete.
    pub fn is_sink_role(self) -> bool {
        matches!(self, SymbolKind::Column | SymbolKind::Table)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Calls,
    Extends,
    Implements,
    Imports,
    Includes,
    Contains,
    MapsTo,
    BindsTo,
    Reads,
    Writes,
    Queries,
    Submits,
    Renders,
    References,
}

impl RefKind {
    pub const ALL: [RefKind; 14] = [
        RefKind::Calls,
        RefKind::Extends,
        RefKind::Implements,
        RefKind::Imports,
        RefKind::Includes,
        RefKind::Contains,
        RefKind::MapsTo,
        RefKind::BindsTo,
        RefKind::Reads,
        RefKind::Writes,
        RefKind::Queries,
        RefKind::Submits,
        RefKind::Renders,
        RefKind::References,
    ];

    /// Kinds that carry data between layers. Structural kinds (extends, contains, ...) are excluded.
    pub const FLOW: [RefKind; 8] = [
        RefKind::BindsTo,
        RefKind::MapsTo,
        RefKind::Reads,
        RefKind::Writes,
        RefKind::Queries,
        RefKind::Submits,
        RefKind::Calls,
        RefKind::Renders,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RefKind::Calls => "calls",
            RefKind::Extends => "extends",
            RefKind::Implements => "implements",
            RefKind::Imports => "imports",
            RefKind::Includes => "includes",
            RefKind::Contains => "contains",
            RefKind::MapsTo => "maps_to",
            RefKind::BindsTo => "binds_to",
            RefKind::Reads => "reads",
            RefKind::Writes => "writes",
            RefKind::Queries => "queries",
            RefKind::Submits => "submits",
            RefKind::Renders => "renders",
            RefKind::References => "references",
        }
    }

    pub fn parse(raw: &str) -> Option<RefKind> {
        let value = raw.trim().to_ascii_lowercase();
        if value == "maps_to_column" {
            return Some(RefKind::MapsTo);
        }
        RefKind::ALL.iter().copied().find(|kind| kind.as_str() == value)
    }

    pub fn is_flow(self) -> bool {
        RefKind::FLOW.contains(&self)
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certainty of a reference. Declaration order is weakest first so `Ord` ranks strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Inferred,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Inferred => "inferred",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Confidence> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            "inferred" => Some(Confidence::Inferred),
            _ => None,
        }
    }

    /// Weakest confidence of the sequence; `High` when empty.
    pub fn weakest<I: IntoIterator<Item = Confidence>>(values: I) -> Confidence {
        values.into_iter().min().unwrap_or(Confidence::High)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form key/value map shared copy-on-write between clones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Arc<BTreeMap<String, Value>>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_json_text(&self) -> String {
        serde_json::to_string(self.0.as_ref()).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn parse_json_text(text: &str) -> Result<Self, serde_json::Error> {
        let map: BTreeMap<String, Value> = serde_json::from_str(text)?;
        Ok(Self(Arc::new(map)))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Arc::new(map))
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, Value>::deserialize(deserializer).map(|map| Self(Arc::new(map)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub line_start: i64,
    pub line_end: i64,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Symbol {
    pub fn new(
        kind: SymbolKind,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        file_path: impl Into<String>,
        line_start: i64,
        line_end: i64,
    ) -> Self {
        let qualified_name = qualified_name.into();
        let file_path = file_path.into();
        Self {
            id: Symbol::derive_id(&file_path, &qualified_name),
            kind,
            name: name.into(),
            qualified_name,
            file_path,
            line_start,
            line_end,
            attributes: Attributes::new(),
            label: None,
        }
    }

    pub fn derive_id(file_path: &str, qualified_name: &str) -> String {
        format!("{file_path}::{qualified_name}")
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn layer(&self) -> Layer {
        self.kind.layer()
    }

    /// Snapshot standing in for a synthetic target that has no node of its own.
    pub fn synthetic(id: &str) -> Option<Symbol> {
        if let Some(rest) = id.strip_prefix(SYNTHETIC_DB_PREFIX) {
            let (kind, name) = match rest.rsplit_once('.') {
                Some((_, column)) => (SymbolKind::Column, column),
                None => (SymbolKind::Table, rest),
            };
            return Some(Symbol {
                id: id.to_string(),
                kind,
                name: name.to_string(),
                qualified_name: rest.to_string(),
                file_path: String::new(),
                line_start: 0,
                line_end: 0,
                attributes: Attributes::new(),
                label: None,
            });
        }
        id.strip_prefix(SYNTHETIC_EXT_PREFIX).map(|rest| Symbol {
            id: id.to_string(),
            kind: SymbolKind::Unknown,
            name: rest.to_string(),
            qualified_name: rest.to_string(),
            file_path: String::new(),
            line_start: 0,
            line_end: 0,
            attributes: Attributes::new(),
            label: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub source_id: String,
    pub target_id: String,
    pub kind: RefKind,
    pub confidence: Confidence,
    #[serde(default)]
    pub evidence: Attributes,
}

impl Reference {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, kind: RefKind) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            confidence: Confidence::High,
            evidence: Attributes::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.evidence.insert(key, value);
        self
    }

    pub fn key(&self) -> RefKey {
        RefKey {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            kind: self.kind,
        }
    }
}

/// Deduplication key of a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefKey {
    pub source_id: String,
    pub target_id: String,
    pub kind: RefKind,
}

/// Compact symbol view returned by search and query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSummary {
    pub id: String,
    pub kind: SymbolKind,
    pub layer: Layer,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub line_start: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<&Symbol> for SymbolSummary {
    fn from(s: &Symbol) -> Self {
        SymbolSummary {
            id: s.id.clone(),
            kind: s.kind,
            layer: s.kind.layer(),
            name: s.name.clone(),
            qualified_name: s.qualified_name.clone(),
            file_path: s.file_path.clone(),
            line_start: s.line_start,
            label: s.label.clone(),
        }
    }
}

impl From<Symbol> for SymbolSummary {
    fn from(s: Symbol) -> Self {
        SymbolSummary {
            id: s.id,
            kind: s.kind,
            layer: s.kind.layer(),
            name: s.name,
            qualified_name: s.qualified_name,
            file_path: s.file_path,
            line_start: s.line_start,
            label: s.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_tag() {
        for kind in SymbolKind::ALL {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        for kind in RefKind::ALL {
            assert_eq!(RefKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("no_such_kind"), None);
        assert_eq!(RefKind::parse("maps_to_column"), Some(RefKind::MapsTo));
    }

    #[test]
    fn layer_table() {
        assert_eq!(SymbolKind::Entity.layer(), Layer::Backend);
        assert_eq!(SymbolKind::Column.layer(), Layer::Database);
        assert_eq!(SymbolKind::ViewBinding.layer(), Layer::View);
        assert_eq!(SymbolKind::Component.layer(), Layer::Frontend);
        assert_eq!(SymbolKind::DocSection.layer(), Layer::Unknown);
    }

    #[test]
    fn weakest_confidence_ignores_order() {
        let values = [Confidence::Medium, Confidence::Low, Confidence::High];
        assert_eq!(Confidence::weakest(values), Confidence::Low);
        assert_eq!(Confidence::weakest(Vec::new()), Confidence::High);
        assert!(Confidence::Inferred < Confidence::Low);
    }

    #[test]
    fn synthetic_column_snapshot() {
        let column = Symbol::synthetic("db::orders.total").unwrap();
        assert_eq!(column.kind, SymbolKind::Column);
        assert_eq!(column.name, "total");
        assert_eq!(column.qualified_name, "orders.total");
        assert!(column.kind.is_sink_role());

        let table = Symbol::synthetic("db::orders").unwrap();
        assert_eq!(table.kind, SymbolKind::Table);
        assert!(Symbol::synthetic("src/a.py::A").is_none());
    }

    #[test]
    fn attributes_are_copy_on_write() {
        let mut original = Attributes::new();
        original.insert("table", "orders");
        let mut copy = original.clone();
        copy.insert("table", "invoices");
        assert_eq!(original.get("table"), Some(&Value::from("orders")));
        assert_eq!(copy.get("table"), Some(&Value::from("invoices")));
    }

    #[test]
    fn corrupt_attribute_text_is_an_error() {
        assert!(Attributes::parse_json_text("{not json").is_err());
        assert!(Attributes::parse_json_text("[1,2]").is_err());
        assert_eq!(Attributes::parse_json_text("{}").unwrap().len(), 0);
    }
}
