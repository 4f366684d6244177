//! JSON scenario format.
//!
//! Types are written as class names (`"String"`, `"T.untyped"`,
//! `"T::Boolean"`) or single-key objects (`{"nilable": "String"}`,
//! `{"hash": ["Symbol", "Integer"]}`). Values are plain JSON, with
//! `{"$symbol": ..}`, `{"$new": ..}`, `{"$class": ..}`, `{"$set": [..]}`
//! and `{"$hash": [[k, v], ..]}` for host values JSON cannot express. Plain
//! objects become hashes with symbol keys.

use std::collections::BTreeMap;
use std::path::Path;

use miette::{miette, Diagnostic};
use runsig_core::{
    BuilderError, CheckedLevel, DeclBuilder, MethodParam, ParamKind, ShapeKey, TypeSpec,
    TypeSpecError,
};
use runsig_object::{ClassRegistry, ObjectError, Value};
use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ScenarioError {
    #[error("unsupported value {0}")]
    #[diagnostic(code(runsig::scenario::value))]
    Value(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Type(#[from] TypeSpecError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| miette!("failed to read scenario {}: {e}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> miette::Result<Self> {
        serde_json::from_str(content).map_err(|e| miette!("invalid scenario: {e}"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub module: bool,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub includes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Define(MethodDecl),
    Call(CallDecl),
    Must(AssertDecl),
    Let(AssertDecl),
    Cast(AssertDecl),
    Bind(AssertDecl),
    Absurd(AssertDecl),
    DeepClone(AssertDecl),
}

impl Step {
    pub fn label(&self) -> String {
        match self {
            Step::Define(m) => format!("define {}#{}", m.owner, m.name),
            Step::Call(c) => format!("call {}", c.method),
            Step::Must(_) => "T.must".to_string(),
            Step::Let(_) => "T.let".to_string(),
            Step::Cast(_) => "T.cast".to_string(),
            Step::Bind(_) => "T.bind".to_string(),
            Step::Absurd(_) => "T.absurd".to_string(),
            Step::DeepClone(_) => "deep_clone".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodDecl {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub sig: Option<SigDecl>,
    #[serde(default)]
    pub body: BodyDecl,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default = "default_param_kind")]
    pub kind: ParamKind,
}

fn default_param_kind() -> ParamKind {
    ParamKind::Positional
}

impl ParamDecl {
    pub fn to_param(&self) -> MethodParam {
        MethodParam::new(self.name.as_str(), self.kind)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigDecl {
    #[serde(default, rename = "final")]
    pub is_final: bool,
    /// Builder combinators, applied in order.
    pub steps: Vec<SigStep>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigStep {
    Params(BTreeMap<String, TypeExpr>),
    Returns(TypeExpr),
    Void,
    Abstract,
    Overridable,
    Override,
    Checked(CheckedLevel),
}

impl SigDecl {
    /// Replay the combinators against a builder. Type errors in the
    /// scenario surface as builder errors.
    pub fn apply(&self, mut builder: DeclBuilder) -> Result<DeclBuilder, BuilderError> {
        for step in &self.steps {
            builder = match step {
                SigStep::Params(params) => {
                    let mut typed = Vec::with_capacity(params.len());
                    for (name, ty) in params {
                        typed.push((name.clone(), to_builder_type(ty)?));
                    }
                    builder.params(typed)?
                }
                SigStep::Returns(ty) => builder.returns(to_builder_type(ty)?)?,
                SigStep::Void => builder.void()?,
                SigStep::Abstract => builder.abstract_method()?,
                SigStep::Overridable => builder.overridable()?,
                SigStep::Override => builder.overrides()?,
                SigStep::Checked(level) => builder.checked(*level)?,
            };
        }
        Ok(builder)
    }
}

fn to_builder_type(ty: &TypeExpr) -> Result<TypeSpec, BuilderError> {
    ty.to_spec().map_err(|e| BuilderError::new(e.to_string()))
}

/// What a scenario method does when called.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodyDecl {
    /// `T.bind(self, ..)` before anything else.
    #[serde(default)]
    pub bind: Option<TypeExpr>,
    /// Return this parameter's value.
    #[serde(default)]
    pub return_arg: Option<String>,
    #[serde(default, rename = "return")]
    pub value: Option<Json>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallDecl {
    pub receiver: Json,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Json>,
    #[serde(default)]
    pub keywords: BTreeMap<String, Json>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssertDecl {
    #[serde(default)]
    pub value: Json,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeExpr>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum TypeExpr {
    Name(String),
    Compound(Compound),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compound {
    Any(Vec<TypeExpr>),
    All(Vec<TypeExpr>),
    Nilable(Box<TypeExpr>),
    Array(Box<TypeExpr>),
    Set(Box<TypeExpr>),
    Enumerable(Box<TypeExpr>),
    Hash(Box<TypeExpr>, Box<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Shape(BTreeMap<String, TypeExpr>),
    ClassOf(String),
}

impl TypeExpr {
    pub fn to_spec(&self) -> Result<TypeSpec, TypeSpecError> {
        let all = |items: &[TypeExpr]| {
            items
                .iter()
                .map(TypeExpr::to_spec)
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(match self {
            TypeExpr::Name(name) => match name.as_str() {
                "T.untyped" => TypeSpec::untyped(),
                "T.noreturn" => TypeSpec::noreturn(),
                "T::Boolean" => TypeSpec::boolean(),
                other => TypeSpec::simple(other),
            },
            TypeExpr::Compound(c) => match c {
                Compound::Any(items) => TypeSpec::any_of(all(items)?)?,
                Compound::All(items) => TypeSpec::all_of(all(items)?)?,
                Compound::Nilable(inner) => TypeSpec::nilable(inner.to_spec()?),
                Compound::Array(inner) => TypeSpec::array_of(inner.to_spec()?),
                Compound::Set(inner) => TypeSpec::set_of(inner.to_spec()?),
                Compound::Enumerable(inner) => TypeSpec::enumerable_of(inner.to_spec()?),
                Compound::Hash(k, v) => TypeSpec::hash_of(k.to_spec()?, v.to_spec()?),
                Compound::Tuple(items) => TypeSpec::tuple(all(items)?),
                Compound::Shape(fields) => TypeSpec::shape(
                    fields
                        .iter()
                        .map(|(k, t)| -> Result<(ShapeKey, TypeSpec), TypeSpecError> {
                            Ok((ShapeKey::Symbol(k.clone()), t.to_spec()?))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                Compound::ClassOf(name) => TypeSpec::class_of(name.as_str()),
            },
        })
    }
}

/// Build a host value. `$new` instantiates through `classes`.
pub fn to_value(classes: &ClassRegistry, json: &Json) -> Result<Value, ScenarioError> {
    Ok(match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::Integer(i),
            (None, Some(f)) => Value::Float(f),
            _ => return Err(ScenarioError::Value(n.to_string())),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| to_value(classes, v))
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(map) => {
            if let Some(Json::String(name)) = map.get("$symbol") {
                Value::Symbol(name.clone())
            } else if let Some(Json::String(name)) = map.get("$class") {
                Value::Class(classes.require(name)?)
            } else if let Some(Json::String(name)) = map.get("$new") {
                let class = classes.require(name)?;
                let mut ivars = BTreeMap::new();
                if let Some(Json::Object(fields)) = map.get("ivars") {
                    for (k, v) in fields {
                        ivars.insert(format!("@{k}"), to_value(classes, v)?);
                    }
                }
                classes.instantiate_with(class, ivars)?
            } else if let Some(Json::Array(items)) = map.get("$set") {
                Value::Set(
                    items
                        .iter()
                        .map(|v| to_value(classes, v))
                        .collect::<Result<_, _>>()?,
                )
            } else if let Some(Json::Array(pairs)) = map.get("$hash") {
                let mut entries = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    match pair {
                        Json::Array(kv) if kv.len() == 2 => {
                            entries.push((to_value(classes, &kv[0])?, to_value(classes, &kv[1])?));
                        }
                        other => return Err(ScenarioError::Value(other.to_string())),
                    }
                }
                Value::Hash(entries)
            } else {
                let mut entries = Vec::with_capacity(map.len());
                for (k, v) in map {
                    entries.push((Value::Symbol(k.clone()), to_value(classes, v)?));
                }
                Value::Hash(entries)
            }
        }
    })
}
