//! In-memory model of Liberty timing libraries.
//!
//! A Liberty file is an ordered tree of groups. Each group has a name, an
//! optional identifier, a set of simple or complex attributes, and nested
//! sub-groups. This crate models that tree ([`Group`]), the lookup tables
//! and table templates that timing groups carry ([`lut`]), SI-prefixed unit
//! strings ([`units`]), a strict text renderer ([`write`]), and a reader
//! sufficient to load libraries back for comparison ([`parse`]).
#![warn(missing_docs)]

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod lut;
pub mod parse;
pub mod units;
pub mod write;

#[cfg(test)]
mod tests;

pub use lut::{LookupTable, TableTemplate};
pub use write::WriteOptions;

/// The result type returned by liberty library functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible liberty errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A group name or identifier containing characters outside `\w`.
    #[error("invalid liberty name `{0}`")]
    InvalidName(ArcStr),
    /// Attempted to merge groups with different names or identifiers.
    #[error("cannot merge group `{theirs}` into group `{ours}`")]
    MergeMismatch {
        /// The receiving group's display name.
        ours: ArcStr,
        /// The incoming group's display name.
        theirs: ArcStr,
    },
    /// A lookup table whose value count does not match its index shape.
    #[error("lookup table `{table}` has {values} values for a {rows}x{cols} index shape")]
    LutShape {
        /// The table name.
        table: ArcStr,
        /// The number of values supplied.
        values: usize,
        /// The number of `index_1` entries.
        rows: usize,
        /// The number of `index_2` entries (1 for 1-D tables).
        cols: usize,
    },
    /// A lookup with the wrong number of index values for the table.
    #[error("lookup into table `{table}` gave {given} index values, expected {arity}")]
    IndexArity {
        /// The table name.
        table: ArcStr,
        /// The number of index values supplied.
        given: usize,
        /// The table's dimension count.
        arity: usize,
    },
    /// A lookup by index value that is not present in the table's index.
    #[error("value {value} not found in index_{axis} of table `{table}`")]
    IndexNotFound {
        /// The table name.
        table: ArcStr,
        /// The missing index value.
        value: f64,
        /// The axis searched (1 or 2).
        axis: usize,
    },
    /// An SI-prefixed quantity that could not be parsed.
    #[error("invalid SI-prefixed quantity `{0}`")]
    InvalidUnit(ArcStr),
    /// An error parsing liberty source text.
    #[error("error parsing liberty source: {0}")]
    Parse(String),
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A boolean attribute, rendered unquoted.
    Bool(bool),
    /// An integer attribute.
    Int(i64),
    /// A floating-point attribute, rendered with the writer's precision.
    Float(f64),
    /// A string attribute, quoted when required by its content.
    Str(ArcStr),
    /// A complex (parenthesized) attribute.
    List(Vec<Value>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(ArcStr::from(value))
    }
}

impl From<ArcStr> for Value {
    fn from(value: ArcStr) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl Value {
    /// Returns the contained string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the value as a float, converting integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Extracts every number reachable from this value.
    ///
    /// Strings are split on commas and whitespace, which is how quoted
    /// `index_1`/`values` lists store their contents after parsing.
    pub fn numbers(&self) -> Vec<f64> {
        match self {
            Self::Int(i) => vec![*i as f64],
            Self::Float(f) => vec![*f],
            Self::Str(s) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .filter_map(|t| t.parse().ok())
                .collect(),
            Self::List(items) => items.iter().flat_map(|v| v.numbers()).collect(),
            Self::Bool(_) => vec![],
        }
    }
}

/// A child of a [`Group`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupItem {
    /// A nested group.
    Group(Group),
    /// A `lu_table_template` group.
    Template(TableTemplate),
    /// A lookup table group (`cell_rise`, `rise_constraint`, ...).
    Table(LookupTable),
}

impl GroupItem {
    fn key(&self) -> ChildKey {
        match self {
            Self::Group(g) => (g.name.clone(), g.identifier.clone(), g.tag.clone()),
            Self::Template(t) => (
                arcstr::literal!("lu_table_template"),
                Some(t.name().clone()),
                None,
            ),
            Self::Table(t) => (t.name().clone(), Some(t.template().name().clone()), None),
        }
    }

    /// Returns the contained group, if this is a plain group.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the contained lookup table, if any.
    pub fn as_table(&self) -> Option<&LookupTable> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Group> for GroupItem {
    fn from(value: Group) -> Self {
        Self::Group(value)
    }
}

impl From<LookupTable> for GroupItem {
    fn from(value: LookupTable) -> Self {
        Self::Table(value)
    }
}

impl From<TableTemplate> for GroupItem {
    fn from(value: TableTemplate) -> Self {
        Self::Template(value)
    }
}

/// The key a child is stored under: (name, identifier, tag).
///
/// The tag distinguishes same-named anonymous sub-groups (such as the
/// several `timing ()` groups under one pin) when merging; it is never
/// rendered.
pub type ChildKey = (ArcStr, Option<ArcStr>, Option<ArcStr>);

/// A liberty group: name, optional identifier, attributes, and children.
///
/// Attributes and children preserve insertion order; insertion of a child
/// whose (name, identifier, tag) key already exists merges into the
/// existing child instead of appending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    name: ArcStr,
    identifier: Option<ArcStr>,
    tag: Option<ArcStr>,
    attributes: IndexMap<ArcStr, Value>,
    children: IndexMap<ChildKey, GroupItem>,
}

fn valid_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

impl Group {
    /// Creates a new group with no identifier.
    pub fn new(name: impl Into<ArcStr>) -> Result<Self> {
        let name = name.into();
        if !valid_name(&name) {
            return Err(Error::InvalidName(name));
        }
        Ok(Self {
            name,
            ..Default::default()
        })
    }

    /// Creates a new group with an identifier.
    pub fn with_identifier(name: impl Into<ArcStr>, identifier: impl Into<ArcStr>) -> Result<Self> {
        let mut group = Self::new(name)?;
        let identifier = identifier.into();
        if !valid_name(&identifier) {
            return Err(Error::InvalidName(identifier));
        }
        group.identifier = Some(identifier);
        Ok(group)
    }

    /// Sets the merge tag of this group.
    pub fn with_tag(mut self, tag: impl Into<ArcStr>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// The group name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The group identifier, if any.
    pub fn identifier(&self) -> Option<&ArcStr> {
        self.identifier.as_ref()
    }

    fn display_name(&self) -> ArcStr {
        match &self.identifier {
            Some(id) => arcstr::format!("{} ({})", self.name, id),
            None => self.name.clone(),
        }
    }

    /// Adds or replaces an attribute.
    pub fn add_attribute(&mut self, name: impl Into<ArcStr>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Returns an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Iterates over attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&ArcStr, &Value)> {
        self.attributes.iter()
    }

    /// Inserts a child, merging with an existing child of the same key.
    pub fn add_item(&mut self, item: impl Into<GroupItem>) {
        let item = item.into();
        let key = item.key();
        match (self.children.get_mut(&key), item) {
            (Some(GroupItem::Group(ours)), GroupItem::Group(theirs)) => {
                // Keys matched, so merge cannot fail.
                ours.merge(theirs).expect("children with equal keys merge");
            }
            (Some(GroupItem::Table(ours)), GroupItem::Table(theirs)) => {
                ours.overlay(&theirs);
            }
            (Some(slot), item) => *slot = item,
            (None, item) => {
                self.children.insert(key, item);
            }
        }
    }

    /// Inserts a sub-group; shorthand for [`Group::add_item`].
    pub fn add_group(&mut self, group: Group) {
        self.add_item(group);
    }

    /// Finds a direct sub-group by name and optional identifier, ignoring tags.
    pub fn sub_group(&self, name: &str, identifier: Option<&str>) -> Option<&Group> {
        self.children.values().find_map(|c| match c {
            GroupItem::Group(g)
                if g.name == name && g.identifier.as_deref() == identifier =>
            {
                Some(g)
            }
            _ => None,
        })
    }

    /// Iterates over all direct sub-groups (skipping tables and templates).
    pub fn sub_groups(&self) -> impl Iterator<Item = &Group> {
        self.children.values().filter_map(GroupItem::as_group)
    }

    /// Iterates over all direct children in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &GroupItem> {
        self.children.values()
    }

    /// Iterates over direct lookup tables.
    pub fn tables(&self) -> impl Iterator<Item = &LookupTable> {
        self.children.values().filter_map(GroupItem::as_table)
    }

    /// Merges `other` into `self`.
    ///
    /// Names, identifiers, and tags must match. Attributes take the union
    /// with `other` winning on conflicts; children merge recursively by key.
    pub fn merge(&mut self, other: Group) -> Result<()> {
        if self.name != other.name
            || self.identifier != other.identifier
            || self.tag != other.tag
        {
            return Err(Error::MergeMismatch {
                ours: self.display_name(),
                theirs: other.display_name(),
            });
        }
        for (name, value) in other.attributes {
            self.attributes.insert(name, value);
        }
        for (_, child) in other.children {
            self.add_item(child);
        }
        Ok(())
    }

    /// Collects every table template referenced by tables in this subtree,
    /// deduplicated by template name.
    pub fn referenced_templates(&self) -> Vec<TableTemplate> {
        let mut out: IndexMap<ArcStr, TableTemplate> = IndexMap::new();
        self.collect_templates(&mut out);
        let mut templates: Vec<_> = out.into_values().collect();
        templates.sort_by(|a, b| a.name().cmp(b.name()));
        templates
    }

    fn collect_templates(&self, out: &mut IndexMap<ArcStr, TableTemplate>) {
        for child in self.children.values() {
            match child {
                GroupItem::Group(g) => g.collect_templates(out),
                GroupItem::Table(t) => {
                    out.entry(t.template().name().clone())
                        .or_insert_with(|| t.template().clone());
                }
                GroupItem::Template(_) => {}
            }
        }
    }

    /// Inserts children at the front of the child list, after none but
    /// before all existing children. Used to place `lu_table_template`
    /// groups ahead of cells at the library level.
    pub fn prepend_items(&mut self, items: impl IntoIterator<Item = GroupItem>) {
        for (i, item) in items.into_iter().enumerate() {
            self.children.shift_insert(i, item.key(), item);
        }
    }
}
