#![forbid(unsafe_code)]

use runsig_object::{ClassRegistry, Value};

use crate::scope::BindScope;
use crate::types::{Generic, ShapeKey, TypeKind, TypeSpec};

const TRUNCATE_HEAD: usize = 30;
const TRUNCATE_TAIL: usize = 30;

/// How far into generic containers a match looks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    /// Container class only.
    Shallow,
    /// Container class and every element.
    Recursive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub ok: bool,
    /// Empty when `ok`.
    pub diagnostic: String,
}

/// Checks values against type specs for one class registry.
#[derive(Clone, Copy)]
pub struct Matcher<'a> {
    classes: &'a ClassRegistry,
    scope: Option<&'a BindScope>,
    depth: Depth,
    include_value: bool,
}

impl<'a> Matcher<'a> {
    pub fn new(classes: &'a ClassRegistry) -> Self {
        Matcher {
            classes,
            scope: None,
            depth: Depth::Recursive,
            include_value: true,
        }
    }

    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    pub fn include_value(mut self, include: bool) -> Self {
        self.include_value = include;
        self
    }

    pub fn within(mut self, scope: &'a BindScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn matches(&self, value: &Value, spec: &TypeSpec) -> MatchResult {
        if self.is_valid(value, spec) {
            MatchResult {
                ok: true,
                diagnostic: String::new(),
            }
        } else {
            MatchResult {
                ok: false,
                diagnostic: self.describe_mismatch(value, spec),
            }
        }
    }

    pub fn is_valid(&self, value: &Value, spec: &TypeSpec) -> bool {
        if self.scope.is_some_and(|s| s.asserts(value, spec)) {
            return true;
        }

        match spec.kind() {
            TypeKind::Any => true,
            TypeKind::NoReturn => false,
            TypeKind::Simple(name) => self
                .classes
                .lookup(name)
                .is_some_and(|class| self.classes.is_a(value, class)),
            TypeKind::ClassOf(name) => match (value, self.classes.lookup(name)) {
                (Value::Class(id), Some(class)) => self.classes.is_descendant(*id, class),
                _ => false,
            },
            TypeKind::Union(members) => members.iter().any(|m| self.is_valid(value, m)),
            TypeKind::Intersection(members) => members.iter().all(|m| self.is_valid(value, m)),
            TypeKind::Nilable(inner) => value.is_nil() || self.is_valid(value, inner),
            TypeKind::Generic(generic) => self.generic_valid(value, generic),
            TypeKind::Tuple(elems) => match value {
                Value::Array(items) => {
                    items.len() == elems.len()
                        && items.iter().zip(elems).all(|(v, t)| self.is_valid(v, t))
                }
                _ => false,
            },
            TypeKind::Shape(fields) => match value {
                Value::Hash(entries) => {
                    entries.len() == fields.len()
                        && fields.iter().all(|(key, t)| {
                            value
                                .hash_get(&shape_key_value(key))
                                .is_some_and(|v| self.is_valid(v, t))
                        })
                }
                _ => false,
            },
        }
    }

    fn generic_valid(&self, value: &Value, generic: &Generic) -> bool {
        let deep = self.depth == Depth::Recursive;
        match (generic, value) {
            (Generic::Array(e) | Generic::Enumerable(e), Value::Array(items))
            | (Generic::Set(e) | Generic::Enumerable(e), Value::Set(items)) => {
                !deep || items.iter().all(|v| self.is_valid(v, e))
            }
            (Generic::Hash { key, value: val }, Value::Hash(entries)) => {
                !deep
                    || entries
                        .iter()
                        .all(|(k, v)| self.is_valid(k, key) && self.is_valid(v, val))
            }
            (Generic::Enumerable(e), Value::Hash(entries)) => {
                !deep
                    || entries.iter().all(|(k, v)| {
                        self.is_valid(&Value::Array(vec![k.clone(), v.clone()]), e)
                    })
            }
            _ => false,
        }
    }

    /// `Expected type <spec>, got type <class>[ with value <inspect>]`
    pub fn describe_mismatch(&self, value: &Value, spec: &TypeSpec) -> String {
        format!("Expected type {spec}, got {}", self.describe_obj(value))
    }

    pub fn describe_obj(&self, value: &Value) -> String {
        let class = self.classes.class_name_of(value);
        match value {
            // The class already names the value.
            Value::Nil | Value::Bool(_) => format!("type {class}"),
            _ if self.include_value => format!(
                "type {class} with value {}",
                truncate_middle(&self.classes.inspect(value), TRUNCATE_HEAD, TRUNCATE_TAIL)
            ),
            _ => format!("type {class}"),
        }
    }
}

/// `matches(value, spec)` with default options.
pub fn matches(classes: &ClassRegistry, value: &Value, spec: &TypeSpec) -> MatchResult {
    Matcher::new(classes).matches(value, spec)
}

fn shape_key_value(key: &ShapeKey) -> Value {
    match key {
        ShapeKey::Symbol(s) => Value::Symbol(s.clone()),
        ShapeKey::String(s) => Value::String(s.clone()),
    }
}

pub(crate) fn truncate_middle(s: &str, head: usize, tail: usize) -> String {
    let count = s.chars().count();
    if count <= head + tail + 3 {
        return s.to_string();
    }
    let start: String = s.chars().take(head).collect();
    let end: String = s.chars().skip(count - tail).collect();
    format!("{start}...{end}")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn s(name: &str) -> TypeSpec {
        TypeSpec::simple(name)
    }

    #[test]
    fn simple_types_follow_ancestry() {
        let reg = ClassRegistry::new();
        let m = Matcher::new(&reg);
        assert!(m.is_valid(&Value::Integer(1), &s("Integer")));
        assert!(m.is_valid(&Value::Integer(1), &s("Numeric")));
        assert!(m.is_valid(&Value::Integer(1), &s("Comparable")));
        assert!(!m.is_valid(&Value::Integer(1), &s("String")));
        assert!(!m.is_valid(&Value::Integer(1), &s("NoSuchClass")));
    }

    #[test]
    fn let_style_diagnostic() {
        let reg = ClassRegistry::new();
        let r = matches(&reg, &Value::Integer(1), &s("String"));
        assert!(!r.ok);
        assert_eq!(r.diagnostic, "Expected type String, got type Integer with value 1");

        let r = Matcher::new(&reg)
            .include_value(false)
            .matches(&Value::Integer(1), &s("String"));
        assert_eq!(r.diagnostic, "Expected type String, got type Integer");
    }

    #[test]
    fn nil_and_booleans_never_print_their_value() {
        let reg = ClassRegistry::new();
        let r = matches(&reg, &Value::Nil, &s("String"));
        assert_eq!(r.diagnostic, "Expected type String, got type NilClass");
        let r = matches(&reg, &Value::Bool(true), &s("String"));
        assert_eq!(r.diagnostic, "Expected type String, got type TrueClass");
    }

    #[test]
    fn union_diagnostic_names_every_member() {
        let reg = ClassRegistry::new();
        let t = TypeSpec::any_of([s("Integer"), s("Float")]).unwrap();
        let r = matches(&reg, &Value::sym("a"), &t);
        assert_eq!(
            r.diagnostic,
            "Expected type T.any(Integer, Float), got type Symbol with value :a"
        );
        assert!(matches(&reg, &Value::Float(1.5), &t).ok);
    }

    #[test]
    fn nilable_accepts_nil() {
        let reg = ClassRegistry::new();
        let t = TypeSpec::nilable(s("String"));
        assert!(matches(&reg, &Value::Nil, &t).ok);
        assert!(matches(&reg, &Value::str("x"), &t).ok);
        assert!(!matches(&reg, &Value::Integer(0), &t).ok);
    }

    #[test]
    fn generic_depth() {
        let reg = ClassRegistry::new();
        let t = TypeSpec::array_of(s("String"));
        let v = Value::Array(vec![Value::str("a"), Value::Integer(2)]);
        assert!(!Matcher::new(&reg).is_valid(&v, &t));
        assert!(Matcher::new(&reg).depth(Depth::Shallow).is_valid(&v, &t));
        assert!(!Matcher::new(&reg).depth(Depth::Shallow).is_valid(&Value::Set(vec![]), &t));

        let h = TypeSpec::hash_of(s("Symbol"), s("Integer"));
        let ok = Value::Hash(vec![(Value::sym("a"), Value::Integer(1))]);
        let bad = Value::Hash(vec![(Value::str("a"), Value::Integer(1))]);
        assert!(Matcher::new(&reg).is_valid(&ok, &h));
        assert!(!Matcher::new(&reg).is_valid(&bad, &h));
    }

    #[test]
    fn enumerable_covers_arrays_sets_and_hash_pairs() {
        let reg = ClassRegistry::new();
        let m = Matcher::new(&reg);
        let t = TypeSpec::enumerable_of(s("Integer"));
        assert!(m.is_valid(&Value::Array(vec![Value::Integer(1)]), &t));
        assert!(m.is_valid(&Value::Set(vec![Value::Integer(1)]), &t));
        let pairs = TypeSpec::enumerable_of(TypeSpec::tuple([s("Symbol"), s("Integer")]));
        let h = Value::Hash(vec![(Value::sym("a"), Value::Integer(1))]);
        assert!(m.is_valid(&h, &pairs));
        assert!(!m.is_valid(&Value::str("abc"), &t));
    }

    #[test]
    fn tuples_and_shapes() {
        let reg = ClassRegistry::new();
        let m = Matcher::new(&reg).depth(Depth::Shallow);
        let tuple = TypeSpec::tuple([s("Integer"), s("String")]);
        assert!(m.is_valid(&Value::Array(vec![Value::Integer(1), Value::str("a")]), &tuple));
        assert!(!m.is_valid(&Value::Array(vec![Value::Integer(1)]), &tuple));

        let shape = TypeSpec::shape([(ShapeKey::Symbol("id".into()), s("Integer"))]);
        assert!(m.is_valid(&Value::Hash(vec![(Value::sym("id"), Value::Integer(3))]), &shape));
        assert!(!m.is_valid(&Value::Hash(vec![(Value::sym("id"), Value::Nil)]), &shape));
        assert!(!m.is_valid(
            &Value::Hash(vec![
                (Value::sym("id"), Value::Integer(3)),
                (Value::sym("extra"), Value::Integer(4)),
            ]),
            &shape
        ));
    }

    #[test]
    fn class_of_matches_class_objects() {
        let mut reg = ClassRegistry::new();
        let base = reg.define_class("Base", None).unwrap();
        let child = reg.define_class("Child", Some("Base")).unwrap();
        let m = Matcher::new(&reg);
        let t = TypeSpec::class_of("Base");
        assert!(m.is_valid(&Value::Class(base), &t));
        assert!(m.is_valid(&Value::Class(child), &t));
        assert!(!m.is_valid(&reg.instantiate(child).unwrap(), &t));
        assert!(m.is_valid(&Value::Class(child), &s("Class")));
    }

    #[test]
    fn intersection_needs_every_member() {
        let mut reg = ClassRegistry::new();
        let readable = reg.define_module("Readable").unwrap();
        let writable = reg.define_module("Writable").unwrap();
        let bad = reg.define_class("BadArticle", None).unwrap();
        let good = reg.define_class("GoodArticle", None).unwrap();
        reg.include_module(bad, writable).unwrap();
        reg.include_module(good, writable).unwrap();
        reg.include_module(good, readable).unwrap();

        let t = TypeSpec::all_of([s("Readable"), s("Writable")]).unwrap();
        let m = Matcher::new(&reg);
        assert!(m.is_valid(&reg.instantiate(good).unwrap(), &t));
        assert!(!m.is_valid(&reg.instantiate(bad).unwrap(), &t));
    }

    #[test]
    fn scope_capabilities_satisfy_intersections_for_the_receiver_only() {
        let mut reg = ClassRegistry::new();
        reg.define_module("Readable").unwrap();
        reg.define_module("Writable").unwrap();
        let c = reg.define_class("Plain", None).unwrap();
        let receiver = reg.instantiate(c).unwrap();
        let other = reg.instantiate(c).unwrap();

        let t = TypeSpec::all_of([s("Readable"), s("Writable")]).unwrap();
        let mut scope = BindScope::new(receiver.clone());
        scope.record(&t);

        let m = Matcher::new(&reg).within(&scope);
        assert!(m.is_valid(&receiver, &t));
        assert!(m.is_valid(&receiver, &s("Readable")));
        assert!(!m.is_valid(&other, &t));
    }

    #[test]
    fn long_values_are_truncated_in_the_middle() {
        let reg = ClassRegistry::new();
        let long = "x".repeat(100);
        let r = matches(&reg, &Value::str(long), &s("Integer"));
        let expected_value = format!("\"{}...{}\"", "x".repeat(29), "x".repeat(29));
        assert!(r.diagnostic.ends_with(&expected_value), "{}", r.diagnostic);
    }

    proptest! {
        #[test]
        fn value_toggle_only_changes_text(i in any::<i64>(), include in any::<bool>()) {
            let reg = ClassRegistry::new();
            let spec = TypeSpec::simple("String");
            let a = Matcher::new(&reg).include_value(include).matches(&Value::Integer(i), &spec);
            let b = Matcher::new(&reg).include_value(!include).matches(&Value::Integer(i), &spec);
            prop_assert_eq!(a.ok, b.ok);
            prop_assert!(a.diagnostic.starts_with("Expected type String, got type Integer"));
        }

        #[test]
        fn untyped_accepts_everything(i in any::<i64>(), s in ".*") {
            let reg = ClassRegistry::new();
            prop_assert!(matches(&reg, &Value::Integer(i), &TypeSpec::untyped()).ok);
            prop_assert!(matches(&reg, &Value::String(s), &TypeSpec::untyped()).ok);
        }
    }
}
