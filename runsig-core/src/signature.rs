#![forbid(unsafe_code)]

//! Method signatures and the declaration builder that produces them.
//!
//! A declaration goes through two states: *building*, while the sig block
//! runs against a [`DeclBuilder`], and *finalized*, once
//! [`DeclBuilder::finalize`] has checked that the combinators form a
//! complete signature. Builder errors are reported through the
//! signature-builder handler; semantic problems found when the finalized
//! declaration is turned into a [`Signature`] go to the signature-validation
//! handler.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BuilderError;
use crate::location::SourceLocation;
use crate::types::TypeSpec;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckedLevel {
    #[default]
    Always,
    Tests,
    Never,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Standard,
    Abstract,
    Overridable,
    Override,
}

impl Mode {
    pub fn display(&self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Abstract => ".abstract",
            Mode::Overridable => ".overridable",
            Mode::Override => ".override",
        }
    }

    /// Children that redefine a method in this mode must say `.override`.
    pub fn requires_override(&self) -> bool {
        matches!(self, Mode::Abstract | Mode::Overridable | Mode::Override)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Positional,
    OptionalPositional,
    Keyword,
    OptionalKeyword,
    Rest,
    Block,
}

impl ParamKind {
    pub fn is_required(&self) -> bool {
        matches!(self, ParamKind::Positional | ParamKind::Keyword)
    }
}

/// A parameter of the host method, as defined (no type).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodParam {
    pub name: String,
    pub kind: ParamKind,
}

impl MethodParam {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        MethodParam {
            name: name.into(),
            kind,
        }
    }
}

/// A typed parameter of a finalized signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    /// For rest parameters, the type of each element.
    pub ty: TypeSpec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnSpec {
    Returns(TypeSpec),
    Void,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
}

impl MethodRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        MethodRef {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.name)
    }
}

/// The raw result of running a sig block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Declaration {
    pub params: Option<Vec<(String, TypeSpec)>>,
    pub returns: Option<ReturnSpec>,
    pub mode: Mode,
    pub checked: Option<CheckedLevel>,
    pub is_final: bool,
}

pub struct DeclBuilder {
    decl: Declaration,
}

/// A deferred sig block; run on the first call of the method it declares.
pub type SigBlock = Arc<dyn Fn(DeclBuilder) -> Result<DeclBuilder, BuilderError> + Send + Sync>;

impl DeclBuilder {
    pub fn new(is_final: bool) -> Self {
        DeclBuilder {
            decl: Declaration {
                is_final,
                ..Declaration::default()
            },
        }
    }

    pub fn params<I, S>(mut self, params: I) -> Result<Self, BuilderError>
    where
        I: IntoIterator<Item = (S, TypeSpec)>,
        S: Into<String>,
    {
        if self.decl.params.is_some() {
            return Err(BuilderError::new(
                "You can't call .params twice in a signature.",
            ));
        }
        let params: Vec<(String, TypeSpec)> =
            params.into_iter().map(|(n, t)| (n.into(), t)).collect();
        let mut seen = BTreeSet::new();
        for (name, _) in &params {
            if !seen.insert(name.as_str()) {
                return Err(BuilderError::new(format!(
                    "Parameter `{name}` is declared more than once."
                )));
            }
        }
        self.decl.params = Some(params);
        Ok(self)
    }

    pub fn returns(mut self, ty: TypeSpec) -> Result<Self, BuilderError> {
        match self.decl.returns {
            Some(ReturnSpec::Void) => Err(BuilderError::new(
                "You can't call .returns after calling .void.",
            )),
            Some(ReturnSpec::Returns(_)) => Err(BuilderError::new(
                "You can't call .returns multiple times in a signature.",
            )),
            None => {
                self.decl.returns = Some(ReturnSpec::Returns(ty));
                Ok(self)
            }
        }
    }

    pub fn void(mut self) -> Result<Self, BuilderError> {
        match self.decl.returns {
            Some(ReturnSpec::Returns(_)) => Err(BuilderError::new(
                "You can't call .void after calling .returns.",
            )),
            Some(ReturnSpec::Void) => Err(BuilderError::new(
                "You can't call .void multiple times in a signature.",
            )),
            None => {
                self.decl.returns = Some(ReturnSpec::Void);
                Ok(self)
            }
        }
    }

    pub fn mode(mut self, mode: Mode) -> Result<Self, BuilderError> {
        let current = self.decl.mode;
        if current == Mode::Standard {
            self.decl.mode = mode;
            return Ok(self);
        }
        if current == mode {
            return Err(BuilderError::new(format!(
                "`{}` cannot be repeated in a single signature.",
                mode.display()
            )));
        }
        Err(BuilderError::new(format!(
            "`{}` cannot be combined with `{}`.",
            mode.display(),
            current.display()
        )))
    }

    pub fn abstract_method(self) -> Result<Self, BuilderError> {
        self.mode(Mode::Abstract)
    }

    pub fn overridable(self) -> Result<Self, BuilderError> {
        self.mode(Mode::Overridable)
    }

    pub fn overrides(self) -> Result<Self, BuilderError> {
        self.mode(Mode::Override)
    }

    pub fn checked(mut self, level: CheckedLevel) -> Result<Self, BuilderError> {
        if self.decl.checked.is_some() {
            return Err(BuilderError::new(
                "You can't call .checked multiple times in a signature.",
            ));
        }
        self.decl.checked = Some(level);
        Ok(self)
    }

    pub fn finalize(self) -> Result<Declaration, BuilderError> {
        if self.decl.returns.is_none() {
            return Err(BuilderError::new(
                "You must provide a return type; use the `.returns` or `.void` builder methods.",
            ));
        }
        Ok(self.decl)
    }
}

/// A finalized, immutable method contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub method: MethodRef,
    pub params: Vec<Param>,
    pub returns: ReturnSpec,
    pub mode: Mode,
    pub is_final: bool,
    pub checked: CheckedLevel,
    /// Where the method was defined.
    pub definition: SourceLocation,
}

impl Signature {
    /// Pair a finalized declaration with the host method's parameter list.
    /// Fails with a validation message when the names disagree.
    pub fn build(
        method: MethodRef,
        method_params: &[MethodParam],
        decl: &Declaration,
        default_checked: CheckedLevel,
        definition: SourceLocation,
    ) -> Result<Signature, String> {
        let declared: &[(String, TypeSpec)] = decl.params.as_deref().unwrap_or(&[]);

        let missing: Vec<&str> = method_params
            .iter()
            .filter(|p| !declared.iter().any(|(n, _)| *n == p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "The declaration for `{}` is missing parameter(s): {}",
                method.name,
                missing.join(", ")
            ));
        }

        let extra: Vec<&str> = declared
            .iter()
            .filter(|(n, _)| !method_params.iter().any(|p| p.name == *n))
            .map(|(n, _)| n.as_str())
            .collect();
        if !extra.is_empty() {
            return Err(format!(
                "The declaration for `{}` has extra parameter(s): {}",
                method.name,
                extra.join(", ")
            ));
        }

        let params = method_params
            .iter()
            .filter_map(|p| {
                declared
                    .iter()
                    .find(|(n, _)| *n == p.name)
                    .map(|(_, ty)| Param {
                        name: p.name.clone(),
                        kind: p.kind,
                        ty: ty.clone(),
                    })
            })
            .collect();

        Ok(Signature {
            method,
            params,
            returns: decl.returns.clone().unwrap_or(ReturnSpec::Void),
            mode: decl.mode,
            is_final: decl.is_final,
            checked: decl.checked.unwrap_or(default_checked),
            definition,
        })
    }

    /// Every parameter and the return typed `T.untyped`.
    pub fn untyped(
        method: MethodRef,
        method_params: &[MethodParam],
        definition: SourceLocation,
    ) -> Signature {
        Signature {
            method,
            params: method_params
                .iter()
                .map(|p| Param {
                    name: p.name.clone(),
                    kind: p.kind,
                    ty: TypeSpec::untyped(),
                })
                .collect(),
            returns: ReturnSpec::Returns(TypeSpec::untyped()),
            mode: Mode::Standard,
            is_final: false,
            checked: CheckedLevel::Never,
            definition,
        }
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn return_type(&self) -> Option<&TypeSpec> {
        match &self.returns {
            ReturnSpec::Returns(t) => Some(t),
            ReturnSpec::Void => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> TypeSpec {
        TypeSpec::simple("Symbol")
    }

    fn loc() -> SourceLocation {
        SourceLocation::new("lib/foo.rb", 3, 1)
    }

    #[test]
    fn void_after_returns_is_rejected() {
        let err = DeclBuilder::new(false)
            .returns(sym())
            .and_then(DeclBuilder::void)
            .err()
            .unwrap();
        assert_eq!(err.message, "You can't call .void after calling .returns.");
    }

    #[test]
    fn returns_after_void_is_rejected() {
        let err = DeclBuilder::new(false)
            .void()
            .and_then(|b| b.returns(sym()))
            .err()
            .unwrap();
        assert_eq!(err.message, "You can't call .returns after calling .void.");
    }

    #[test]
    fn modes_cannot_be_combined() {
        let err = DeclBuilder::new(false)
            .abstract_method()
            .and_then(DeclBuilder::overrides)
            .err()
            .unwrap();
        assert_eq!(err.message, "`.override` cannot be combined with `.abstract`.");

        let err = DeclBuilder::new(false)
            .overridable()
            .and_then(DeclBuilder::overridable)
            .err()
            .unwrap();
        assert_eq!(err.message, "`.overridable` cannot be repeated in a single signature.");
    }

    #[test]
    fn finalize_requires_a_return() {
        let err = DeclBuilder::new(false)
            .params([("a", TypeSpec::simple("String"))])
            .and_then(DeclBuilder::finalize)
            .err()
            .unwrap();
        assert!(err.message.starts_with("You must provide a return type"));
    }

    #[test]
    fn duplicate_params_and_double_checked() {
        let err = DeclBuilder::new(false)
            .params([("a", sym()), ("a", sym())])
            .err()
            .unwrap();
        assert_eq!(err.message, "Parameter `a` is declared more than once.");

        let err = DeclBuilder::new(false)
            .checked(CheckedLevel::Never)
            .and_then(|b| b.checked(CheckedLevel::Always))
            .err()
            .unwrap();
        assert_eq!(err.message, "You can't call .checked multiple times in a signature.");
    }

    #[test]
    fn build_orders_params_like_the_method() {
        let decl = DeclBuilder::new(true)
            .params([("b", sym()), ("a", TypeSpec::simple("String"))])
            .and_then(|b| b.returns(sym()))
            .and_then(DeclBuilder::finalize)
            .unwrap();
        let method_params = [
            MethodParam::new("a", ParamKind::Positional),
            MethodParam::new("b", ParamKind::Keyword),
        ];
        let sig = Signature::build(
            MethodRef::new("Foo", "bar"),
            &method_params,
            &decl,
            CheckedLevel::Always,
            loc(),
        )
        .unwrap();
        assert_eq!(sig.params[0].name, "a");
        assert_eq!(sig.param("b").map(|p| p.kind), Some(ParamKind::Keyword));
        assert!(sig.param("c").is_none());
        assert!(sig.is_final);
        assert_eq!(sig.return_type(), Some(&sym()));
    }

    #[test]
    fn build_reports_missing_and_extra_params() {
        let decl = DeclBuilder::new(false)
            .params([("x", sym())])
            .and_then(DeclBuilder::void)
            .and_then(DeclBuilder::finalize)
            .unwrap();
        let missing = Signature::build(
            MethodRef::new("Foo", "bar"),
            &[
                MethodParam::new("x", ParamKind::Positional),
                MethodParam::new("y", ParamKind::Positional),
            ],
            &decl,
            CheckedLevel::Always,
            loc(),
        )
        .unwrap_err();
        assert_eq!(missing, "The declaration for `bar` is missing parameter(s): y");

        let extra = Signature::build(
            MethodRef::new("Foo", "bar"),
            &[],
            &decl,
            CheckedLevel::Always,
            loc(),
        )
        .unwrap_err();
        assert_eq!(extra, "The declaration for `bar` has extra parameter(s): x");
    }
}
