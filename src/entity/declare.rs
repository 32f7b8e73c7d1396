//! Builder through which an entity type describes its table mapping.

use crate::entity::{Collection, Entity, Reference};
use crate::mapping::association::{AssociationBinding, ManyToOneBinding, OneToManyBinding};
use crate::models::{AssociationKind, AssociationSpec, SortOrder, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldRole {
    Persistent,
    /// Never read from or written to the database
    Transient,
    /// Class-level constant, not stored per row
    Constant,
}

#[derive(Debug, Clone)]
pub(crate) struct FieldDecl {
    pub(crate) name: String,
    pub(crate) column: Option<String>,
    pub(crate) kind: ValueKind,
    pub(crate) role: FieldRole,
    pub(crate) immutable: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct TableDecl {
    pub(crate) name: String,
    pub(crate) primary_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Last {
    Field(usize),
    Association(usize),
}

/// Declared table mapping of `E`.
///
/// Modifiers such as [`EntityDecl::immutable`] or [`EntityDecl::lazy`] apply to
/// the most recently declared field or association. A modifier that does not
/// fit the preceding declaration makes resolution fail.
///
/// ```ignore
/// EntityDecl::<Self>::new()
///     .table("employee", &["id"])
///     .field("id", ValueKind::Int)
///     .column("name", "full_name", ValueKind::Text)
///     .field("dept_id", ValueKind::Int)
///     .many_to_one::<Department>("department", &["dept_id"], |e| &mut e.department)
///     .lazy()
/// ```
pub struct EntityDecl<E> {
    pub(crate) type_name: String,
    pub(crate) table: Option<TableDecl>,
    pub(crate) auto_generate_keys: bool,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) associations: Vec<Box<dyn AssociationBinding<E>>>,
    pub(crate) parent: Option<Box<EntityDecl<E>>>,
    pub(crate) errors: Vec<String>,
    last: Option<Last>,
}

impl<E: Entity> EntityDecl<E> {
    /// Declaration named after the Rust type.
    ///
    /// Association slots are closures over `&mut E`, so name the entity type
    /// up front: `EntityDecl::<Self>::new()`.
    pub fn new() -> Self {
        Self::named(short_type_name::<E>())
    }

    /// Declaration with an explicit type name, used for supertypes.
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            auto_generate_keys: true,
            fields: Vec::new(),
            associations: Vec::new(),
            parent: None,
            errors: Vec::new(),
            last: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Map to `name` with the given primary key fields, in key order.
    pub fn table(mut self, name: impl Into<String>, primary_keys: &[&str]) -> Self {
        self.table = Some(TableDecl {
            name: name.into(),
            primary_keys: primary_keys.iter().map(|k| k.to_string()).collect(),
        });
        self
    }

    /// Whether the database generates primary key values. Defaults to true.
    pub fn auto_generate_keys(mut self, enabled: bool) -> Self {
        self.auto_generate_keys = enabled;
        self
    }

    /// Persistable field stored in a column of the same name.
    pub fn field(self, name: &str, kind: ValueKind) -> Self {
        self.push_field(name, None, kind, FieldRole::Persistent)
    }

    /// Persistable field stored in a differently named column.
    pub fn column(self, name: &str, column: &str, kind: ValueKind) -> Self {
        self.push_field(name, Some(column.to_string()), kind, FieldRole::Persistent)
    }

    pub fn transient(self, name: &str) -> Self {
        self.push_field(name, None, ValueKind::Any, FieldRole::Transient)
    }

    pub fn constant(self, name: &str) -> Self {
        self.push_field(name, None, ValueKind::Any, FieldRole::Constant)
    }

    /// Keep the preceding field out of UPDATE statements.
    pub fn immutable(mut self) -> Self {
        match self.last {
            Some(Last::Field(idx)) => self.fields[idx].immutable = true,
            _ => self.misuse("immutable()", "a field"),
        }
        self
    }

    pub fn many_to_one<P: Entity>(
        mut self,
        name: &str,
        foreign_keys: &[&str],
        slot: fn(&mut E) -> &mut Reference<P>,
    ) -> Self {
        let spec = association_spec::<P>(AssociationKind::ManyToOne, foreign_keys);
        self.associations
            .push(Box::new(ManyToOneBinding::new(name, spec, slot)));
        self.last = Some(Last::Association(self.associations.len() - 1));
        self
    }

    /// `foreign_keys` name fields of the child entity, matched positionally
    /// against this entity's primary keys.
    pub fn one_to_many<C: Entity>(
        mut self,
        name: &str,
        foreign_keys: &[&str],
        slot: fn(&mut E) -> &mut Collection<C>,
    ) -> Self {
        let spec = association_spec::<C>(AssociationKind::OneToMany, foreign_keys);
        self.associations
            .push(Box::new(OneToManyBinding::new(name, spec, slot)));
        self.last = Some(Last::Association(self.associations.len() - 1));
        self
    }

    /// Defer loading of the preceding association until first access.
    pub fn lazy(self) -> Self {
        self.with_association("lazy()", |spec| spec.lazy = true)
    }

    /// Extra SQL for a one-to-many WHERE clause.
    pub fn condition(self, sql: &str) -> Self {
        let sql = sql.to_string();
        self.with_one_to_many("condition()", move |spec| spec.condition = Some(sql))
    }

    /// Child field name, or a verbatim ORDER BY fragment.
    pub fn order_by(self, sort_field: &str) -> Self {
        let field = sort_field.to_string();
        self.with_one_to_many("order_by()", move |spec| spec.order_by = Some(field))
    }

    pub fn sort(self, order: SortOrder) -> Self {
        self.with_one_to_many("sort()", move |spec| spec.sort = order)
    }

    /// Declared supertype. Consulted when this declaration carries no table,
    /// and otherwise contributes its fields after this declaration's own.
    pub fn extends(mut self, parent: EntityDecl<E>) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    fn push_field(mut self, name: &str, column: Option<String>, kind: ValueKind, role: FieldRole) -> Self {
        if self.fields.iter().any(|f| f.name == name) {
            self.errors.push(format!("field '{}' is declared twice", name));
        }
        self.fields.push(FieldDecl {
            name: name.to_string(),
            column,
            kind,
            role,
            immutable: false,
        });
        self.last = Some(Last::Field(self.fields.len() - 1));
        self
    }

    fn with_association(mut self, modifier: &str, apply: impl FnOnce(&mut AssociationSpec)) -> Self {
        match self.last {
            Some(Last::Association(idx)) => apply(self.associations[idx].spec_mut()),
            _ => self.misuse(modifier, "an association"),
        }
        self
    }

    fn with_one_to_many(mut self, modifier: &str, apply: impl FnOnce(&mut AssociationSpec)) -> Self {
        match self.last {
            Some(Last::Association(idx))
                if self.associations[idx].spec().kind == AssociationKind::OneToMany =>
            {
                apply(self.associations[idx].spec_mut())
            }
            _ => self.misuse(modifier, "a one-to-many association"),
        }
        self
    }

    fn misuse(&mut self, modifier: &str, expected: &str) {
        self.errors.push(format!("{} must follow {}", modifier, expected));
    }
}

impl<E: Entity> Default for EntityDecl<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn association_spec<T: Entity>(kind: AssociationKind, foreign_keys: &[&str]) -> AssociationSpec {
    AssociationSpec {
        kind,
        target: short_type_name::<T>(),
        foreign_keys: foreign_keys.iter().map(|k| k.to_string()).collect(),
        condition: None,
        order_by: None,
        sort: SortOrder::Asc,
        lazy: false,
    }
}

/// Last path segment of the Rust type name, generics stripped.
pub(crate) fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
