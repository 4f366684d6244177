#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum TypeSpecError {
    #[error("T.any expects at least one type")]
    #[diagnostic(code(runsig::types::empty_union))]
    EmptyUnion,
    #[error("T.all expects at least one type")]
    #[diagnostic(code(runsig::types::empty_intersection))]
    EmptyIntersection,
}

/// Container kinds with element types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Generic {
    Array(TypeSpec),
    Set(TypeSpec),
    Enumerable(TypeSpec),
    Hash { key: TypeSpec, value: TypeSpec },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKey {
    Symbol(String),
    String(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// `T.untyped`
    Any,
    /// `T.noreturn`
    NoReturn,
    /// A class or module name.
    Simple(String),
    /// A class object that is the named class or one of its subclasses.
    ClassOf(String),
    Union(Vec<TypeSpec>),
    Intersection(Vec<TypeSpec>),
    Nilable(TypeSpec),
    Generic(Generic),
    Tuple(Vec<TypeSpec>),
    Shape(Vec<(ShapeKey, TypeSpec)>),
}

/// An immutable, shared type constraint.
///
/// Unions and intersections are kept flat and deduplicated; a union that
/// admits `nil` is always represented as `Nilable` around the rest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeSpec(Arc<TypeKind>);

impl TypeSpec {
    fn from_kind(kind: TypeKind) -> Self {
        TypeSpec(Arc::new(kind))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0
    }

    pub fn untyped() -> Self {
        Self::from_kind(TypeKind::Any)
    }

    pub fn noreturn() -> Self {
        Self::from_kind(TypeKind::NoReturn)
    }

    pub fn simple(name: impl Into<String>) -> Self {
        Self::from_kind(TypeKind::Simple(name.into()))
    }

    pub fn class_of(name: impl Into<String>) -> Self {
        Self::from_kind(TypeKind::ClassOf(name.into()))
    }

    pub fn nilable(inner: TypeSpec) -> Self {
        match inner.kind() {
            TypeKind::Nilable(_) | TypeKind::Any => inner,
            TypeKind::Simple(n) if n == "NilClass" => inner,
            TypeKind::NoReturn => Self::simple("NilClass"),
            _ => Self::from_kind(TypeKind::Nilable(inner)),
        }
    }

    /// `T::Boolean`
    pub fn boolean() -> Self {
        Self::from_kind(TypeKind::Union(vec![
            Self::simple("TrueClass"),
            Self::simple("FalseClass"),
        ]))
    }

    pub fn any_of(members: impl IntoIterator<Item = TypeSpec>) -> Result<Self, TypeSpecError> {
        let members: Vec<TypeSpec> = members.into_iter().collect();
        if members.is_empty() {
            return Err(TypeSpecError::EmptyUnion);
        }

        let mut flat: Vec<TypeSpec> = Vec::new();
        let mut admits_nil = false;
        for m in members {
            match m.kind() {
                TypeKind::Any => return Ok(m),
                TypeKind::NoReturn => {}
                TypeKind::Simple(n) if n == "NilClass" => admits_nil = true,
                TypeKind::Union(ms) => push_unique(&mut flat, ms.iter().cloned()),
                TypeKind::Nilable(inner) => {
                    admits_nil = true;
                    match inner.kind() {
                        TypeKind::Union(ms) => push_unique(&mut flat, ms.iter().cloned()),
                        _ => push_unique(&mut flat, [inner.clone()]),
                    }
                }
                _ => push_unique(&mut flat, [m.clone()]),
            }
        }

        let core = match flat.len() {
            0 if admits_nil => return Ok(Self::simple("NilClass")),
            0 => return Ok(Self::noreturn()),
            1 => flat.remove(0),
            _ => Self::from_kind(TypeKind::Union(flat)),
        };
        Ok(if admits_nil { Self::nilable(core) } else { core })
    }

    pub fn all_of(members: impl IntoIterator<Item = TypeSpec>) -> Result<Self, TypeSpecError> {
        let members: Vec<TypeSpec> = members.into_iter().collect();
        if members.is_empty() {
            return Err(TypeSpecError::EmptyIntersection);
        }

        let mut flat: Vec<TypeSpec> = Vec::new();
        for m in members {
            match m.kind() {
                TypeKind::Any => {}
                TypeKind::Intersection(ms) => push_unique(&mut flat, ms.iter().cloned()),
                _ => push_unique(&mut flat, [m.clone()]),
            }
        }

        Ok(match flat.len() {
            0 => Self::untyped(),
            1 => flat.remove(0),
            _ => Self::from_kind(TypeKind::Intersection(flat)),
        })
    }

    pub fn array_of(elem: TypeSpec) -> Self {
        Self::from_kind(TypeKind::Generic(Generic::Array(elem)))
    }

    pub fn set_of(elem: TypeSpec) -> Self {
        Self::from_kind(TypeKind::Generic(Generic::Set(elem)))
    }

    pub fn enumerable_of(elem: TypeSpec) -> Self {
        Self::from_kind(TypeKind::Generic(Generic::Enumerable(elem)))
    }

    pub fn hash_of(key: TypeSpec, value: TypeSpec) -> Self {
        Self::from_kind(TypeKind::Generic(Generic::Hash { key, value }))
    }

    pub fn tuple(elems: impl IntoIterator<Item = TypeSpec>) -> Self {
        Self::from_kind(TypeKind::Tuple(elems.into_iter().collect()))
    }

    pub fn shape(fields: impl IntoIterator<Item = (ShapeKey, TypeSpec)>) -> Self {
        Self::from_kind(TypeKind::Shape(fields.into_iter().collect()))
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self.kind(), TypeKind::Any)
    }

    /// Display name, e.g. `T.nilable(T::Array[String])`.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

fn push_unique(out: &mut Vec<TypeSpec>, items: impl IntoIterator<Item = TypeSpec>) {
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
}

fn is_boolean(members: &[TypeSpec]) -> bool {
    let simple = |t: &TypeSpec, name: &str| matches!(t.kind(), TypeKind::Simple(n) if n == name);
    members.len() == 2
        && members.iter().any(|m| simple(m, "TrueClass"))
        && members.iter().any(|m| simple(m, "FalseClass"))
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeSpec]) -> fmt::Result {
    for (i, t) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{t}")?;
    }
    Ok(())
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Any => f.write_str("T.untyped"),
            TypeKind::NoReturn => f.write_str("T.noreturn"),
            TypeKind::Simple(name) => f.write_str(name),
            TypeKind::ClassOf(name) => write!(f, "T.class_of({name})"),
            TypeKind::Union(ms) if is_boolean(ms) => f.write_str("T::Boolean"),
            TypeKind::Union(ms) => {
                f.write_str("T.any(")?;
                write_joined(f, ms)?;
                f.write_str(")")
            }
            TypeKind::Intersection(ms) => {
                f.write_str("T.all(")?;
                write_joined(f, ms)?;
                f.write_str(")")
            }
            TypeKind::Nilable(inner) => write!(f, "T.nilable({inner})"),
            TypeKind::Generic(Generic::Array(e)) => write!(f, "T::Array[{e}]"),
            TypeKind::Generic(Generic::Set(e)) => write!(f, "T::Set[{e}]"),
            TypeKind::Generic(Generic::Enumerable(e)) => write!(f, "T::Enumerable[{e}]"),
            TypeKind::Generic(Generic::Hash { key, value }) => {
                write!(f, "T::Hash[{key}, {value}]")
            }
            TypeKind::Tuple(elems) => {
                f.write_str("[")?;
                write_joined(f, elems)?;
                f.write_str("]")
            }
            TypeKind::Shape(fields) => {
                f.write_str("{")?;
                for (i, (key, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match key {
                        ShapeKey::Symbol(k) => write!(f, "{k}: {t}")?,
                        ShapeKey::String(k) => write!(f, "{k:?} => {t}")?,
                    }
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn s(name: &str) -> TypeSpec {
        TypeSpec::simple(name)
    }

    #[test]
    fn display_names() {
        assert_eq!(s("String").name(), "String");
        assert_eq!(TypeSpec::nilable(s("String")).name(), "T.nilable(String)");
        assert_eq!(
            TypeSpec::any_of([s("Integer"), s("String")]).unwrap().name(),
            "T.any(Integer, String)"
        );
        assert_eq!(
            TypeSpec::all_of([s("Readable"), s("Writable")]).unwrap().name(),
            "T.all(Readable, Writable)"
        );
        assert_eq!(TypeSpec::array_of(s("Integer")).name(), "T::Array[Integer]");
        assert_eq!(
            TypeSpec::hash_of(s("Symbol"), TypeSpec::untyped()).name(),
            "T::Hash[Symbol, T.untyped]"
        );
        assert_eq!(TypeSpec::boolean().name(), "T::Boolean");
        assert_eq!(
            TypeSpec::nilable(TypeSpec::boolean()).name(),
            "T.nilable(T::Boolean)"
        );
        assert_eq!(
            TypeSpec::tuple([s("Integer"), s("String")]).name(),
            "[Integer, String]"
        );
        assert_eq!(
            TypeSpec::shape([
                (ShapeKey::Symbol("a".into()), s("Integer")),
                (ShapeKey::String("b".into()), s("String")),
            ])
            .name(),
            "{a: Integer, \"b\" => String}"
        );
        assert_eq!(TypeSpec::class_of("Numeric").name(), "T.class_of(Numeric)");
    }

    #[test]
    fn union_flattens_and_hoists_nil() {
        let inner = TypeSpec::any_of([s("A"), s("B")]).unwrap();
        let t = TypeSpec::any_of([inner, s("NilClass"), s("C"), s("A")]).unwrap();
        assert_eq!(t.name(), "T.nilable(T.any(A, B, C))");

        let t = TypeSpec::any_of([TypeSpec::nilable(s("A")), s("B")]).unwrap();
        assert_eq!(t.name(), "T.nilable(T.any(A, B))");
    }

    #[test]
    fn singleton_sets_collapse() {
        assert_eq!(TypeSpec::any_of([s("A"), s("A")]).unwrap(), s("A"));
        assert_eq!(TypeSpec::all_of([s("A")]).unwrap(), s("A"));
        assert_eq!(TypeSpec::any_of([s("NilClass")]).unwrap(), s("NilClass"));
    }

    #[test]
    fn empty_sets_are_rejected() {
        assert_eq!(TypeSpec::any_of([]), Err(TypeSpecError::EmptyUnion));
        assert_eq!(TypeSpec::all_of([]), Err(TypeSpecError::EmptyIntersection));
    }

    #[test]
    fn untyped_absorbs_unions() {
        let t = TypeSpec::any_of([s("A"), TypeSpec::untyped()]).unwrap();
        assert!(t.is_untyped());
        assert_eq!(TypeSpec::nilable(TypeSpec::untyped()), TypeSpec::untyped());
    }

    #[test]
    fn nilable_is_idempotent() {
        let once = TypeSpec::nilable(s("String"));
        assert_eq!(TypeSpec::nilable(once.clone()), once);
    }

    fn leaf() -> impl Strategy<Value = TypeSpec> {
        prop_oneof![
            Just(s("Integer")),
            Just(s("String")),
            Just(s("Symbol")),
            Just(s("NilClass")),
            Just(TypeSpec::noreturn()),
        ]
    }

    fn spec() -> impl Strategy<Value = TypeSpec> {
        leaf().prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4)
                    .prop_map(|ms| TypeSpec::any_of(ms).unwrap()),
                prop::collection::vec(inner.clone(), 1..4)
                    .prop_map(|ms| TypeSpec::all_of(ms).unwrap()),
                inner.prop_map(TypeSpec::nilable),
            ]
        })
    }

    fn assert_normalized(t: &TypeSpec) {
        match t.kind() {
            TypeKind::Union(ms) => {
                assert!(ms.len() >= 2);
                for m in ms {
                    assert!(!matches!(
                        m.kind(),
                        TypeKind::Union(_) | TypeKind::Nilable(_) | TypeKind::NoReturn
                    ));
                    assert!(!matches!(m.kind(), TypeKind::Simple(n) if n == "NilClass"));
                    assert_normalized(m);
                }
            }
            TypeKind::Intersection(ms) => {
                assert!(ms.len() >= 2);
                for m in ms {
                    assert!(!matches!(m.kind(), TypeKind::Intersection(_)));
                    assert_normalized(m);
                }
            }
            TypeKind::Nilable(inner) => {
                assert!(!matches!(inner.kind(), TypeKind::Nilable(_)));
                assert_normalized(inner);
            }
            _ => {}
        }
    }

    proptest! {
        #[test]
        fn constructed_specs_stay_normalized(t in spec()) {
            assert_normalized(&t);
        }

        #[test]
        fn union_is_order_insensitive_for_nil(t in spec()) {
            let a = TypeSpec::any_of([t.clone(), s("NilClass")]).unwrap();
            let b = TypeSpec::any_of([s("NilClass"), t.clone()]).unwrap();
            prop_assert_eq!(a.name(), b.name());
        }
    }
}
