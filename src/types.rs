//! Type descriptors.
//!
//! An immutable tree of typed nodes describing a shape. The validator compiler
//! consumes these read-only; constructors here do no validation of their own.
//! Cache identity is the `Rc` pointer, not structural equality: two
//! structurally identical descriptors built separately compile independently.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{ClassTag, Value};

pub type TypeRef = Rc<Type>;

#[derive(Debug)]
pub struct Type {
    pub kind: TypeKind,
    /// Display name; used in generated fragment names and diagnostics.
    pub name: Option<String>,
    /// Custom predicates, run after the structural check passes.
    pub checks: Vec<Predicate>,
}

#[derive(Debug)]
pub enum TypeKind {
    Number,
    Int,
    String,
    Bool,
    Constant(Value),
    Date,
    Binary,
    Instance(ClassTag),
    Array(TypeRef),
    Tuple(Vec<TypeRef>),
    Struct(IndexMap<String, Field>),
    ObjectMap { key: TypeRef, value: TypeRef },
    Map { key: TypeRef, value: TypeRef },
    Set(TypeRef),
    Union(Vec<TypeRef>),
    Intersection(Vec<TypeRef>),
    Recursive(Resolver),
}

/// A struct field. `optional` (and readonly-optional) means `Undefined` is
/// accepted before the field type is consulted; `readonly` has no runtime
/// effect on checking.
#[derive(Debug, Clone)]
pub struct Field {
    pub ty: TypeRef,
    pub optional: bool,
    pub readonly: bool,
}

impl Field {
    pub fn of(ty: impl Into<TypeRef>) -> Self {
        Field { ty: ty.into(), optional: false, readonly: false }
    }

    pub fn optional(ty: impl Into<TypeRef>) -> Self {
        Field { ty: ty.into(), optional: true, readonly: false }
    }

    pub fn readonly(ty: impl Into<TypeRef>) -> Self {
        Field { ty: ty.into(), optional: false, readonly: true }
    }

    pub fn readonly_optional(ty: impl Into<TypeRef>) -> Self {
        Field { ty: ty.into(), optional: true, readonly: true }
    }
}

/// A user-supplied `value -> bool` check, compared by pointer identity.
#[derive(Clone)]
pub struct Predicate(Rc<dyn Fn(&Value) -> bool>);

impl Predicate {
    pub fn new(f: impl Fn(&Value) -> bool + 'static) -> Self {
        Predicate(Rc::new(f))
    }

    pub fn test(&self, value: &Value) -> bool {
        (self.0)(value)
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Lazy reference to another descriptor; resolved only when generation
/// actually reaches the node. The one legal way to close a descriptor cycle.
#[derive(Clone)]
pub struct Resolver(Rc<dyn Fn() -> TypeRef>);

impl Resolver {
    pub fn new(f: impl Fn() -> TypeRef + 'static) -> Self {
        Resolver(Rc::new(f))
    }

    pub fn resolve(&self) -> TypeRef {
        (self.0)()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Resolver(..)")
    }
}

// ----------------------------- Constructors ------------------------------- //

impl Type {
    fn leaf(kind: TypeKind) -> Type {
        Type { kind, name: None, checks: Vec::new() }
    }

    pub fn number() -> Type {
        Type::leaf(TypeKind::Number)
    }

    pub fn int() -> Type {
        Type::leaf(TypeKind::Int)
    }

    pub fn string() -> Type {
        Type::leaf(TypeKind::String)
    }

    pub fn bool() -> Type {
        Type::leaf(TypeKind::Bool)
    }

    pub fn constant(value: impl Into<Value>) -> Type {
        Type::leaf(TypeKind::Constant(value.into()))
    }

    pub fn date() -> Type {
        Type::leaf(TypeKind::Date)
    }

    pub fn binary() -> Type {
        Type::leaf(TypeKind::Binary)
    }

    pub fn instance(class: ClassTag) -> Type {
        Type::leaf(TypeKind::Instance(class))
    }

    pub fn array(element: impl Into<TypeRef>) -> Type {
        Type::leaf(TypeKind::Array(element.into()))
    }

    pub fn tuple<I>(components: I) -> Type
    where
        I: IntoIterator,
        I::Item: Into<TypeRef>,
    {
        Type::leaf(TypeKind::Tuple(components.into_iter().map(Into::into).collect()))
    }

    pub fn struct_of<K, I>(fields: I) -> Type
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Field)>,
    {
        Type::leaf(TypeKind::Struct(
            fields.into_iter().map(|(k, f)| (k.into(), f)).collect(),
        ))
    }

    pub fn object_map(key: impl Into<TypeRef>, value: impl Into<TypeRef>) -> Type {
        Type::leaf(TypeKind::ObjectMap { key: key.into(), value: value.into() })
    }

    pub fn map_of(key: impl Into<TypeRef>, value: impl Into<TypeRef>) -> Type {
        Type::leaf(TypeKind::Map { key: key.into(), value: value.into() })
    }

    pub fn set_of(element: impl Into<TypeRef>) -> Type {
        Type::leaf(TypeKind::Set(element.into()))
    }

    pub fn union<I>(components: I) -> Type
    where
        I: IntoIterator,
        I::Item: Into<TypeRef>,
    {
        Type::leaf(TypeKind::Union(components.into_iter().map(Into::into).collect()))
    }

    pub fn intersection<I>(components: I) -> Type
    where
        I: IntoIterator,
        I::Item: Into<TypeRef>,
    {
        Type::leaf(TypeKind::Intersection(
            components.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn recursive(resolve: impl Fn() -> TypeRef + 'static) -> Type {
        Type::leaf(TypeKind::Recursive(Resolver::new(resolve)))
    }

    pub fn named(mut self, name: impl Into<String>) -> Type {
        self.name = Some(name.into());
        self
    }

    pub fn checked(mut self, predicate: impl Fn(&Value) -> bool + 'static) -> Type {
        self.checks.push(Predicate::new(predicate));
        self
    }

    pub fn rc(self) -> TypeRef {
        Rc::new(self)
    }
}

// ------------------------------ Identity key ------------------------------ //

/// Descriptor identity for caching. Holds the `Rc` so a cached entry pins its
/// descriptor alive; hashes and compares by pointer.
#[derive(Clone)]
pub struct TypeKey(TypeRef);

impl TypeKey {
    pub fn new(ty: &TypeRef) -> Self {
        TypeKey(ty.clone())
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeKey({:p})", Rc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_not_structure_is_the_cache_key() {
        let a = Type::string().rc();
        let b = Type::string().rc();
        let mut set = HashSet::new();
        set.insert(TypeKey::new(&a));
        assert!(set.contains(&TypeKey::new(&a)));
        assert!(!set.contains(&TypeKey::new(&b)));
        let a2 = a.clone();
        assert!(set.contains(&TypeKey::new(&a2)));
    }

    #[test]
    fn constructors_compose() {
        let ty = Type::struct_of([
            ("id", Field::of(Type::string())),
            ("score", Field::optional(Type::number())),
        ])
        .named("player")
        .rc();
        let TypeKind::Struct(fields) = &ty.kind else { panic!("expected struct") };
        assert!(fields["score"].optional);
        assert_eq!(ty.name.as_deref(), Some("player"));
    }
}
