//! Entity metadata: the single source of truth driving SQL generation, row
//! mapping, schema management and relationship loading.
//!
//! A descriptor is built once per entity type (inside `Entity::meta`, behind a
//! `OnceLock`) and is immutable afterwards. Structural validation that only
//! needs the entity itself runs in [`MetaBuilder::build`]; checks that span
//! entities (navigation targets, link entities, foreign key references) run
//! when the entity is registered with a [`Registry`], because dereferencing
//! another entity's metadata during `build` would re-enter its `OnceLock`
//! initializer on cyclic navigation graphs.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};
use crate::row::Row;
use crate::types::{LogicalType, Value};

/// Late-bound reference to another entity's metadata.
///
/// A plain `fn` pointer so descriptors stay `'static` and navigation graphs
/// may be cyclic (Author ↔ Book).
pub type MetaRef = fn() -> &'static EntityMeta;

/// The role a column plays in optimistic concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionRole {
    #[default]
    None,
    /// Incremented by one on every successful update.
    Integer,
    /// Assigned a fresh UTC marker on every successful update.
    Timestamp,
}

/// A foreign key reference to another table's column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

/// Descriptor of a single column.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub ty: LogicalType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub version: VersionRole,
    pub references: Option<ForeignKey>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        ColumnMeta {
            name: name.into(),
            ty,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            version: VersionRole::None,
            references: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn version(mut self, role: VersionRole) -> Self {
        self.version = role;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }
}

/// A relationship that the include planner knows how to load.
#[derive(Clone)]
pub enum Navigation {
    /// This entity holds a foreign key to one row of the target.
    ToOne {
        name: String,
        local_fk: String,
        target: MetaRef,
    },
    /// The target holds a foreign key back to this entity's primary key.
    ToMany {
        name: String,
        remote_fk: String,
        target: MetaRef,
    },
    /// Rows of a registered link entity connect this entity to the target.
    ManyToMany {
        name: String,
        link: MetaRef,
        this_fk: String,
        other_fk: String,
        target: MetaRef,
    },
}

impl Navigation {
    pub fn name(&self) -> &str {
        match self {
            Navigation::ToOne { name, .. }
            | Navigation::ToMany { name, .. }
            | Navigation::ManyToMany { name, .. } => name,
        }
    }

    pub fn target(&self) -> &'static EntityMeta {
        match self {
            Navigation::ToOne { target, .. }
            | Navigation::ToMany { target, .. }
            | Navigation::ManyToMany { target, .. } => target(),
        }
    }
}

impl fmt::Debug for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Navigation::ToOne { name, local_fk, .. } => f
                .debug_struct("ToOne")
                .field("name", name)
                .field("local_fk", local_fk)
                .finish_non_exhaustive(),
            Navigation::ToMany {
                name, remote_fk, ..
            } => f
                .debug_struct("ToMany")
                .field("name", name)
                .field("remote_fk", remote_fk)
                .finish_non_exhaustive(),
            Navigation::ManyToMany {
                name,
                this_fk,
                other_fk,
                ..
            } => f
                .debug_struct("ManyToMany")
                .field("name", name)
                .field("this_fk", this_fk)
                .field("other_fk", other_fk)
                .finish_non_exhaustive(),
        }
    }
}

/// A secondary index, possibly composite, possibly unique.
#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexMeta {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndexMeta {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Type-erased entry points used by the include planner to materialize and
/// stitch related entities without knowing their concrete types.
pub struct EntityVtable {
    pub(crate) from_row: fn(&Row) -> Result<Box<dyn Any + Send>>,
    pub(crate) column_value: fn(&(dyn Any + Send), &str) -> Option<Value>,
    pub(crate) attach: fn(&mut (dyn Any + Send), &str, Vec<Box<dyn Any + Send>>) -> Result<()>,
}

impl fmt::Debug for EntityVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntityVtable")
    }
}

/// Immutable descriptor of an entity type.
#[derive(Debug)]
pub struct EntityMeta {
    entity: &'static str,
    table: String,
    columns: Vec<ColumnMeta>,
    navigations: Vec<Navigation>,
    indexes: Vec<IndexMeta>,
    pk: usize,
    version: Option<usize>,
    vtable: EntityVtable,
}

impl EntityMeta {
    pub fn builder(entity: &'static str, table: impl Into<String>) -> MetaBuilder {
        MetaBuilder {
            entity,
            table: table.into(),
            columns: Vec::new(),
            navigations: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// The entity's logical name (its type name by convention).
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> &ColumnMeta {
        &self.columns[self.pk]
    }

    pub fn version_column(&self) -> Option<&ColumnMeta> {
        self.version.map(|i| &self.columns[i])
    }

    pub fn navigations(&self) -> &[Navigation] {
        &self.navigations
    }

    pub fn navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.name() == name)
    }

    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    /// Columns written by INSERT: everything except the auto-increment key.
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|c| !c.auto_increment)
    }

    /// Columns written by a whole-row UPDATE: everything except the primary key
    /// and the version column, which the mutation planner handles itself.
    pub fn update_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns
            .iter()
            .filter(|c| !c.primary_key && c.version == VersionRole::None)
    }

    pub(crate) fn vtable(&self) -> &EntityVtable {
        &self.vtable
    }
}

/// Builder for [`EntityMeta`]; see the module docs for what is validated here
/// versus at registration.
pub struct MetaBuilder {
    entity: &'static str,
    table: String,
    columns: Vec<ColumnMeta>,
    navigations: Vec<Navigation>,
    indexes: Vec<IndexMeta>,
}

impl MetaBuilder {
    pub fn column(mut self, column: ColumnMeta) -> Self {
        self.columns.push(column);
        self
    }

    /// Declare a to-one navigation: `local_fk` on this entity points at the
    /// target's primary key.
    pub fn belongs_to(mut self, name: impl Into<String>, local_fk: impl Into<String>, target: MetaRef) -> Self {
        self.navigations.push(Navigation::ToOne {
            name: name.into(),
            local_fk: local_fk.into(),
            target,
        });
        self
    }

    /// Declare an inverse to-many navigation: `remote_fk` on the target points
    /// back at this entity's primary key.
    pub fn has_many(mut self, name: impl Into<String>, remote_fk: impl Into<String>, target: MetaRef) -> Self {
        self.navigations.push(Navigation::ToMany {
            name: name.into(),
            remote_fk: remote_fk.into(),
            target,
        });
        self
    }

    /// Declare a many-to-many navigation through a registered link entity.
    pub fn many_to_many(
        mut self,
        name: impl Into<String>,
        link: MetaRef,
        this_fk: impl Into<String>,
        other_fk: impl Into<String>,
        target: MetaRef,
    ) -> Self {
        self.navigations.push(Navigation::ManyToMany {
            name: name.into(),
            link,
            this_fk: this_fk.into(),
            other_fk: other_fk.into(),
            target,
        });
        self
    }

    pub fn index(mut self, index: IndexMeta) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn build<E: Entity>(self) -> Result<EntityMeta> {
        let entity = self.entity;
        let fail = |msg: String| Error::config(format!("entity `{entity}`: {msg}"));

        if self.columns.is_empty() {
            return Err(fail("no columns declared".into()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(fail(format!("duplicate column `{}`", column.name)));
            }
        }

        let pks: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect();
        let pk = match pks.as_slice() {
            [single] => *single,
            [] => return Err(fail("no primary key column".into())),
            _ => return Err(fail("more than one primary key column".into())),
        };

        let versions: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.version != VersionRole::None)
            .map(|(i, _)| i)
            .collect();
        let version = match versions.as_slice() {
            [] => None,
            [single] => Some(*single),
            _ => return Err(fail("more than one version column".into())),
        };
        if let Some(i) = version {
            let column = &self.columns[i];
            let ok = match column.version {
                VersionRole::Integer => {
                    matches!(column.ty, LogicalType::Int | LogicalType::Long)
                }
                VersionRole::Timestamp => matches!(column.ty, LogicalType::DateTime),
                VersionRole::None => unreachable!(),
            };
            if !ok {
                return Err(fail(format!(
                    "version column `{}` has an incompatible type",
                    column.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(fail(format!("duplicate index `{}`", index.name)));
            }
            if index.columns.is_empty() {
                return Err(fail(format!("index `{}` has no columns", index.name)));
            }
            for col in &index.columns {
                if !self.columns.iter().any(|c| &c.name == col) {
                    return Err(fail(format!(
                        "index `{}` references unknown column `{col}`",
                        index.name
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for nav in &self.navigations {
            if !seen.insert(nav.name().to_owned()) {
                return Err(fail(format!("duplicate navigation `{}`", nav.name())));
            }
            if let Navigation::ToOne { name, local_fk, .. } = nav {
                if !self.columns.iter().any(|c| &c.name == local_fk) {
                    return Err(fail(format!(
                        "navigation `{name}` references unknown local column `{local_fk}`"
                    )));
                }
            }
        }

        Ok(EntityMeta {
            entity: self.entity,
            table: self.table,
            columns: self.columns,
            navigations: self.navigations,
            indexes: self.indexes,
            pk,
            version,
            vtable: EntityVtable {
                from_row: |row| Ok(Box::new(E::from_row(row)?) as Box<dyn Any + Send>),
                column_value: |entity, column| {
                    entity.downcast_ref::<E>().and_then(|e| e.value_of(column))
                },
                attach: |entity, nav, children| {
                    let entity = entity
                        .downcast_mut::<E>()
                        .ok_or_else(|| Error::invalid_state("entity type confusion in include planner"))?;
                    entity.attach(nav, children)
                },
            },
        })
    }
}

/// A typed record mapped to one table.
///
/// Implementations are mechanical; every method is driven by the column list
/// declared in [`Entity::meta`].
pub trait Entity: Sized + Send + 'static {
    /// This entity's descriptor; built once and cached for the process lifetime.
    fn meta() -> &'static EntityMeta;

    /// Rebuild an instance from a result row. Columns are matched by name;
    /// extra columns in the row are ignored.
    fn from_row(row: &Row) -> Result<Self>;

    /// The current value of a declared column, `None` for unknown names.
    fn value_of(&self, column: &str) -> Option<Value>;

    /// Write back a server-assigned value (generated key, bumped version).
    fn put(&mut self, column: &str, value: Value) -> Result<()>;

    /// Receive related entities loaded by an include. `children` downcast to
    /// the navigation's target type. The default rejects all navigations.
    fn attach(&mut self, nav: &str, children: Vec<Box<dyn Any + Send>>) -> Result<()> {
        let _ = children;
        Err(Error::invalid_state(format!(
            "entity `{}` has no loadable navigation `{nav}`",
            Self::meta().entity()
        )))
    }

    /// All column values in declaration order.
    fn values(&self) -> Vec<Value> {
        Self::meta()
            .columns()
            .iter()
            .map(|c| self.value_of(&c.name).unwrap_or(Value::Null))
            .collect()
    }
}

/// Downcast helper for [`Entity::attach`] implementations.
pub fn downcast_children<E: Entity>(children: Vec<Box<dyn Any + Send>>) -> Result<Vec<E>> {
    children
        .into_iter()
        .map(|child| {
            child
                .downcast::<E>()
                .map(|boxed| *boxed)
                .map_err(|_| Error::invalid_state("related entity has unexpected type"))
        })
        .collect()
}

/// The set of entities known to one engine instance.
///
/// Registration walks navigation edges so that every reachable entity is
/// present, then validates the cross-entity constraints that
/// [`MetaBuilder::build`] cannot check on its own.
#[derive(Debug, Default)]
pub struct Registry {
    by_entity: HashMap<&'static str, &'static EntityMeta>,
    by_table: HashMap<String, &'static str>,
}

impl Registry {
    pub fn register(&mut self, meta: &'static EntityMeta) -> Result<()> {
        let mut pending = vec![meta];

        while let Some(meta) = pending.pop() {
            if self.by_entity.contains_key(meta.entity()) {
                continue;
            }
            if let Some(other) = self.by_table.get(meta.table()) {
                if *other != meta.entity() {
                    return Err(Error::config(format!(
                        "entities `{}` and `{other}` both map to table `{}`",
                        meta.entity(),
                        meta.table()
                    )));
                }
            }

            self.by_entity.insert(meta.entity(), meta);
            self.by_table.insert(meta.table().to_owned(), meta.entity());

            for nav in meta.navigations() {
                pending.push(nav.target());
                if let Navigation::ManyToMany { link, .. } = nav {
                    pending.push(link());
                }
            }
        }

        self.validate()
    }

    pub fn get(&self, entity: &str) -> Option<&'static EntityMeta> {
        self.by_entity.get(entity).copied()
    }

    pub fn entities(&self) -> impl Iterator<Item = &'static EntityMeta> + '_ {
        self.by_entity.values().copied()
    }

    fn validate(&self) -> Result<()> {
        for meta in self.by_entity.values() {
            for nav in meta.navigations() {
                let target = nav.target();
                let fail = |msg: String| {
                    Error::config(format!(
                        "entity `{}`, navigation `{}`: {msg}",
                        meta.entity(),
                        nav.name()
                    ))
                };

                if !self.by_entity.contains_key(target.entity()) {
                    return Err(fail(format!("target `{}` is not registered", target.entity())));
                }

                match nav {
                    Navigation::ToOne { .. } => {}
                    Navigation::ToMany { remote_fk, .. } => {
                        if target.column(remote_fk).is_none() {
                            return Err(fail(format!(
                                "target `{}` has no column `{remote_fk}`",
                                target.entity()
                            )));
                        }
                    }
                    Navigation::ManyToMany {
                        link,
                        this_fk,
                        other_fk,
                        ..
                    } => {
                        let link = link();
                        if !self.by_entity.contains_key(link.entity()) {
                            return Err(fail(format!(
                                "link entity `{}` is not registered",
                                link.entity()
                            )));
                        }
                        for fk in [this_fk, other_fk] {
                            if link.column(fk).is_none() {
                                return Err(fail(format!(
                                    "link entity `{}` has no column `{fk}`",
                                    link.entity()
                                )));
                            }
                        }
                    }
                }
            }

            for column in meta.columns() {
                if let Some(fk) = &column.references {
                    let Some(entity) = self.by_table.get(&fk.table) else {
                        return Err(Error::config(format!(
                            "entity `{}`, column `{}`: foreign key target table `{}` is not registered",
                            meta.entity(),
                            column.name,
                            fk.table
                        )));
                    };
                    let target = self.by_entity[entity];
                    if target.column(&fk.column).is_none() {
                        return Err(Error::config(format!(
                            "entity `{}`, column `{}`: foreign key target `{}`.`{}` does not exist",
                            meta.entity(),
                            column.name,
                            fk.table,
                            fk.column
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
