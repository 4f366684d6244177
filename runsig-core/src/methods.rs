#![forbid(unsafe_code)]

//! The method table: signature declaration, method definition, and calls
//! checked against the declared signature.
//!
//! A `sig` is attached to the next method defined on the same owner. The
//! declaration is not evaluated until the method is first called; that
//! first call runs the sig block, finalizes and validates the result, and
//! caches the outcome so each failure reaches its handler exactly once.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use runsig_object::{ClassId, ClassRegistry, Value};
use tracing::{debug, trace};

use crate::assertions::Checker;
use crate::config::Configuration;
use crate::error::{BuilderError, RunsigError};
use crate::failure::{
    CallFailure, CallKind, Failure, SigBuilderFailure, SigValidationContext, SigValidationFailure,
};
use crate::location::SourceLocation;
use crate::matcher::{Depth, Matcher};
use crate::scope::BindScope;
use crate::signature::{
    CheckedLevel, DeclBuilder, Declaration, MethodParam, MethodRef, Mode, ParamKind, ReturnSpec,
    SigBlock, Signature,
};
use crate::types::TypeSpec;
use crate::validation::{self, SuperMethod};

/// Arguments of one call.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
    pub block: Option<Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        CallArgs {
            positional: values.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.push((name.into(), value.into()));
        self
    }

    pub fn with_block(mut self, block: Value) -> Self {
        self.block = Some(block);
        self
    }
}

pub type MethodBody =
    Arc<dyn for<'f, 'r> Fn(&'f mut Frame<'r>) -> Result<Value, RunsigError> + Send + Sync>;

#[derive(Clone)]
struct PendingSig {
    block: SigBlock,
    is_final: bool,
    location: SourceLocation,
}

type Resolved = Result<Option<Arc<Signature>>, RunsigError>;

struct MethodEntry {
    owner: ClassId,
    name: String,
    params: Vec<MethodParam>,
    body: MethodBody,
    sig: Option<PendingSig>,
    definition: SourceLocation,
    resolved: OnceLock<Resolved>,
}

impl MethodEntry {
    fn is_final(&self) -> bool {
        self.sig.as_ref().is_some_and(|s| s.is_final)
    }
}

/// Classes, methods and the policy their calls are checked under.
pub struct Runtime {
    classes: ClassRegistry,
    methods: HashMap<(ClassId, String), Arc<MethodEntry>>,
    pending: HashMap<ClassId, PendingSig>,
    config: Arc<Configuration>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime checked under the process-wide configuration.
    pub fn new() -> Self {
        Self::with_config(Configuration::global())
    }

    pub fn with_config(config: Arc<Configuration>) -> Self {
        Runtime {
            classes: ClassRegistry::new(),
            methods: HashMap::new(),
            pending: HashMap::new(),
            config,
        }
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn checker(&self) -> Checker<'_> {
        Checker::new(&self.classes, &self.config)
    }

    /// Declare the signature of the next method defined on `owner`.
    #[track_caller]
    pub fn sig<F>(&mut self, owner: ClassId, block: F) -> Result<(), RunsigError>
    where
        F: Fn(DeclBuilder) -> Result<DeclBuilder, BuilderError> + Send + Sync + 'static,
    {
        self.push_sig(owner, Arc::new(block), false, SourceLocation::caller())
    }

    /// Like [`Runtime::sig`], and the method may never be redefined or
    /// overridden.
    #[track_caller]
    pub fn sig_final<F>(&mut self, owner: ClassId, block: F) -> Result<(), RunsigError>
    where
        F: Fn(DeclBuilder) -> Result<DeclBuilder, BuilderError> + Send + Sync + 'static,
    {
        self.push_sig(owner, Arc::new(block), true, SourceLocation::caller())
    }

    fn push_sig(
        &mut self,
        owner: ClassId,
        block: SigBlock,
        is_final: bool,
        location: SourceLocation,
    ) -> Result<(), RunsigError> {
        if self.pending.contains_key(&owner) {
            return Err(RunsigError::SigBuilder(BuilderError::new(
                "You called sig twice without declaring a method in between",
            )));
        }
        self.pending.insert(
            owner,
            PendingSig {
                block,
                is_final,
                location,
            },
        );
        Ok(())
    }

    /// Define `name` on `owner`, consuming any pending sig. Redefining a
    /// final method, or overriding an ancestor's final method, is reported
    /// to the signature-validation handler before the definition happens.
    #[track_caller]
    pub fn define_method<F>(
        &mut self,
        owner: ClassId,
        name: &str,
        params: Vec<MethodParam>,
        body: F,
    ) -> Result<(), RunsigError>
    where
        F: for<'f, 'r> Fn(&'f mut Frame<'r>) -> Result<Value, RunsigError> + Send + Sync + 'static,
    {
        let definition = SourceLocation::caller();
        let sig = self.pending.remove(&owner);
        let owner_name = self.classes.name(owner).to_string();

        if self
            .methods
            .get(&(owner, name.to_string()))
            .is_some_and(|existing| existing.is_final())
        {
            self.report_final(validation::final_redefinition_message(name, &owner_name))?;
        }
        if let Some(ancestor) = self.super_entry(owner, name).filter(|e| e.is_final()) {
            let ancestor_name = self.classes.name(ancestor.owner).to_string();
            self.report_final(validation::final_override_message(
                name,
                &ancestor_name,
                &owner_name,
            ))?;
        }

        debug!(owner = %owner_name, method = name, typed = sig.is_some(), "define method");
        self.methods.insert(
            (owner, name.to_string()),
            Arc::new(MethodEntry {
                owner,
                name: name.to_string(),
                params,
                body: Arc::new(body),
                sig,
                definition,
                resolved: OnceLock::new(),
            }),
        );
        Ok(())
    }

    fn report_final(&self, message: String) -> Result<(), RunsigError> {
        self.config.dispatch(Failure::SigValidation(SigValidationFailure {
            error: RunsigError::SigValidation { message },
            context: None,
        }))
    }

    pub fn method_defined(&self, owner: ClassId, name: &str) -> bool {
        self.methods.contains_key(&(owner, name.to_string()))
    }

    fn find_entry(&self, class: ClassId, name: &str) -> Option<&Arc<MethodEntry>> {
        self.classes
            .ancestors(class)
            .into_iter()
            .find_map(|c| self.methods.get(&(c, name.to_string())))
    }

    fn super_entry(&self, owner: ClassId, name: &str) -> Option<&Arc<MethodEntry>> {
        self.classes
            .ancestors(owner)
            .into_iter()
            .skip(1)
            .find_map(|c| self.methods.get(&(c, name.to_string())))
    }

    /// The signature in effect for `name` on `owner`, resolving it if this
    /// is the first time it is needed. `None` for methods without a sig.
    pub fn signature(
        &self,
        owner: ClassId,
        name: &str,
    ) -> Result<Option<Arc<Signature>>, RunsigError> {
        match self.methods.get(&(owner, name.to_string())) {
            Some(entry) => self.resolve(entry),
            None => Err(RunsigError::NoMethod {
                method: name.to_string(),
                class: self.classes.name(owner).to_string(),
            }),
        }
    }

    fn resolve(&self, entry: &MethodEntry) -> Resolved {
        entry.resolved.get_or_init(|| self.build_signature(entry)).clone()
    }

    fn build_signature(&self, entry: &MethodEntry) -> Resolved {
        let Some(pending) = &entry.sig else {
            return Ok(None);
        };
        let method = MethodRef::new(self.classes.name(entry.owner), entry.name.as_str());
        trace!(%method, "resolving signature");
        let untyped = || {
            Ok(Some(Arc::new(Signature::untyped(
                method.clone(),
                &entry.params,
                entry.definition.clone(),
            ))))
        };

        let built = (pending.block)(DeclBuilder::new(pending.is_final));
        let decl = match built.and_then(DeclBuilder::finalize) {
            Ok(decl) => decl,
            Err(error) => {
                self.config.dispatch(Failure::SigBuilder(SigBuilderFailure {
                    error,
                    method: method.clone(),
                    location: pending.location.clone(),
                }))?;
                return untyped();
            }
        };

        let super_entry = self.super_entry(entry.owner, &entry.name);
        let super_signature = match super_entry {
            Some(sup) => self.resolve(sup)?,
            None => None,
        };

        let signature = match Signature::build(
            method.clone(),
            &entry.params,
            &decl,
            self.config.default_checked_level(),
            entry.definition.clone(),
        ) {
            Ok(signature) => Arc::new(signature),
            Err(message) => {
                self.report_invalid(message, &method, decl, None, super_signature)?;
                return untyped();
            }
        };

        let sup = super_entry.map(|e| SuperMethod {
            owner: self.classes.name(e.owner),
            signature: super_signature.as_deref(),
        });
        if let Err(message) = validation::validate_signature(&signature, sup) {
            self.report_invalid(message, &method, decl, Some(signature), super_signature)?;
            return untyped();
        }
        Ok(Some(signature))
    }

    fn report_invalid(
        &self,
        message: String,
        method: &MethodRef,
        declaration: Declaration,
        signature: Option<Arc<Signature>>,
        super_signature: Option<Arc<Signature>>,
    ) -> Result<(), RunsigError> {
        self.config.dispatch(Failure::SigValidation(SigValidationFailure {
            error: RunsigError::SigValidation { message },
            context: Some(SigValidationContext {
                method: method.clone(),
                declaration,
                signature,
                super_signature,
            }),
        }))
    }

    fn should_check(&self, level: CheckedLevel) -> bool {
        match level {
            CheckedLevel::Always => true,
            CheckedLevel::Tests => self.config.checking_for_sigs_marked_checked_tests(),
            CheckedLevel::Never => false,
        }
    }

    /// Call `name` on `receiver`.
    #[track_caller]
    pub fn call(&self, receiver: &Value, name: &str, args: CallArgs) -> Result<Value, RunsigError> {
        let location = SourceLocation::caller();
        let class = self.classes.class_of(receiver);
        let entry = self.find_entry(class, name).ok_or_else(|| RunsigError::NoMethod {
            method: name.to_string(),
            class: self.classes.class_name_of(receiver).to_string(),
        })?;

        let signature = self.resolve(entry)?;
        if signature.as_ref().is_some_and(|s| s.mode == Mode::Abstract) {
            return Err(RunsigError::NotImplemented {
                message: format!(
                    "The method `{name}` on {} is declared as `abstract`. It does not have an implementation.",
                    self.classes.name(entry.owner)
                ),
            });
        }

        let bound = bind_arguments(&entry.params, args)?;
        let returns_void = signature
            .as_ref()
            .is_some_and(|s| s.returns == ReturnSpec::Void);
        let checked = signature.filter(|s| self.should_check(s.checked));

        if let Some(sig) = &checked {
            let nil = Value::Nil;
            for param in &sig.params {
                let values: Vec<&Value> = match (param.kind, bound.locals.get(&param.name)) {
                    (ParamKind::Rest, Some(Value::Array(items))) => items.iter().collect(),
                    (ParamKind::Block, value) => vec![value.unwrap_or(&nil)],
                    (_, Some(value)) => vec![value],
                    (_, None) => Vec::new(),
                };
                for value in values {
                    self.check_call_value(
                        sig,
                        CallKind::Parameter,
                        Some(&param.name),
                        &param.ty,
                        value,
                        &location,
                    )?;
                }
            }
        }

        let mut frame = Frame {
            runtime: self,
            receiver: receiver.clone(),
            locals: bound.locals,
            scope: BindScope::new(receiver.clone()),
        };
        let result = (entry.body)(&mut frame)?;

        if let Some(sig) = &checked {
            if let ReturnSpec::Returns(ty) = &sig.returns {
                self.check_call_value(sig, CallKind::Return, None, ty, &result, &location)?;
            }
        }
        if returns_void { Ok(Value::Nil) } else { Ok(result) }
    }

    fn check_call_value(
        &self,
        sig: &Arc<Signature>,
        kind: CallKind,
        name: Option<&str>,
        expected: &TypeSpec,
        value: &Value,
        location: &SourceLocation,
    ) -> Result<(), RunsigError> {
        let result = Matcher::new(&self.classes)
            .depth(Depth::Shallow)
            .include_value(self.config.include_value_in_errors())
            .matches(value, expected);
        if result.ok {
            return Ok(());
        }
        let label = match name {
            Some(name) => format!("{} '{name}'", kind.display()),
            None => "Return value".to_string(),
        };
        let message = format!(
            "{label}: {}\nCaller: {location}\nDefinition: {}",
            result.diagnostic, sig.definition
        );
        self.config.dispatch(Failure::CallValidation(CallFailure {
            signature: sig.clone(),
            name: name.map(str::to_string),
            kind,
            expected: expected.clone(),
            value: value.clone(),
            location: location.clone(),
            message,
        }))
    }
}

struct BoundArgs {
    locals: BTreeMap<String, Value>,
}

fn arity_error(given: usize, required: usize, optional: usize, rest: bool) -> RunsigError {
    let expected = if rest {
        format!("{required}+")
    } else if optional > 0 {
        format!("{required}..{}", required + optional)
    } else {
        required.to_string()
    };
    RunsigError::Argument {
        message: format!("wrong number of arguments (given {given}, expected {expected})"),
    }
}

fn bind_arguments(params: &[MethodParam], args: CallArgs) -> Result<BoundArgs, RunsigError> {
    let count = |kind: ParamKind| params.iter().filter(|p| p.kind == kind).count();
    let required = count(ParamKind::Positional);
    let optional = count(ParamKind::OptionalPositional);
    let rest = count(ParamKind::Rest) > 0;
    let given = args.positional.len();
    if given < required || (!rest && given > required + optional) {
        return Err(arity_error(given, required, optional, rest));
    }

    let mut locals = BTreeMap::new();
    let mut positional = args.positional.into_iter();
    let mut spare_optional = given - required;
    let mut keywords = args.keywords;

    for param in params {
        match param.kind {
            ParamKind::Positional => {
                if let Some(v) = positional.next() {
                    locals.insert(param.name.clone(), v);
                }
            }
            ParamKind::OptionalPositional => {
                if spare_optional > 0 {
                    spare_optional -= 1;
                    if let Some(v) = positional.next() {
                        locals.insert(param.name.clone(), v);
                    }
                }
            }
            ParamKind::Rest => {
                let taken: Vec<Value> = positional.by_ref().take(spare_optional).collect();
                spare_optional = 0;
                locals.insert(param.name.clone(), Value::Array(taken));
            }
            ParamKind::Keyword | ParamKind::OptionalKeyword => {
                match keywords.iter().position(|(k, _)| *k == param.name) {
                    Some(i) => {
                        let (_, v) = keywords.remove(i);
                        locals.insert(param.name.clone(), v);
                    }
                    None if param.kind == ParamKind::Keyword => {
                        return Err(RunsigError::Argument {
                            message: format!("missing keyword: :{}", param.name),
                        });
                    }
                    None => {}
                }
            }
            ParamKind::Block => {
                if let Some(block) = &args.block {
                    locals.insert(param.name.clone(), block.clone());
                }
            }
        }
    }

    if let Some((unknown, _)) = keywords.first() {
        return Err(RunsigError::Argument {
            message: format!("unknown keyword: :{unknown}"),
        });
    }
    Ok(BoundArgs { locals })
}

/// The view a method body has of its own call.
pub struct Frame<'r> {
    runtime: &'r Runtime,
    receiver: Value,
    locals: BTreeMap<String, Value>,
    scope: BindScope,
}

impl<'r> Frame<'r> {
    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    /// A bound parameter; absent optionals are `None`.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    pub fn runtime(&self) -> &'r Runtime {
        self.runtime
    }

    pub fn checker(&self) -> Checker<'r> {
        self.runtime.checker()
    }

    /// `T.bind(self, spec)` for the rest of this call.
    #[track_caller]
    pub fn bind(&mut self, spec: &TypeSpec) -> Result<Value, RunsigError> {
        Checker::new(&self.runtime.classes, &self.runtime.config).bind(&mut self.scope, spec)
    }

    /// Whether `value` satisfies `spec`, counting capabilities bound in
    /// this call.
    pub fn satisfies(&self, value: &Value, spec: &TypeSpec) -> bool {
        Matcher::new(&self.runtime.classes)
            .within(&self.scope)
            .is_valid(value, spec)
    }

    #[track_caller]
    pub fn call(&self, receiver: &Value, name: &str, args: CallArgs) -> Result<Value, RunsigError> {
        self.runtime.call(receiver, name, args)
    }

    /// Call `name` on this frame's receiver.
    #[track_caller]
    pub fn call_self(&self, name: &str, args: CallArgs) -> Result<Value, RunsigError> {
        self.runtime.call(&self.receiver, name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(list: &[(&str, ParamKind)]) -> Vec<MethodParam> {
        list.iter().map(|(n, k)| MethodParam::new(*n, *k)).collect()
    }

    #[test]
    fn binds_optional_and_rest() {
        let p = params(&[
            ("a", ParamKind::Positional),
            ("b", ParamKind::OptionalPositional),
            ("rest", ParamKind::Rest),
        ]);
        let bound = bind_arguments(&p, CallArgs::positional([Value::Integer(1)])).unwrap();
        assert_eq!(bound.locals.get("a"), Some(&Value::Integer(1)));
        assert_eq!(bound.locals.get("b"), None);
        assert_eq!(bound.locals.get("rest"), Some(&Value::Array(vec![])));

        let bound = bind_arguments(
            &p,
            CallArgs::positional([1, 2, 3, 4].map(Value::Integer)),
        )
        .unwrap();
        assert_eq!(bound.locals.get("b"), Some(&Value::Integer(2)));
        assert_eq!(
            bound.locals.get("rest"),
            Some(&Value::Array(vec![Value::Integer(3), Value::Integer(4)]))
        );
    }

    #[test]
    fn arity_and_keyword_errors() {
        let p = params(&[("a", ParamKind::Positional), ("k", ParamKind::Keyword)]);
        let err = bind_arguments(&p, CallArgs::new()).err().unwrap();
        assert_eq!(err.to_string(), "wrong number of arguments (given 0, expected 1)");

        let err = bind_arguments(&p, CallArgs::new().arg(Value::Integer(1))).err().unwrap();
        assert_eq!(err.to_string(), "missing keyword: :k");

        let err = bind_arguments(
            &p,
            CallArgs::new()
                .arg(Value::Integer(1))
                .keyword("k", Value::Nil)
                .keyword("z", Value::Nil),
        )
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "unknown keyword: :z");

        let opt = params(&[("a", ParamKind::OptionalPositional)]);
        let err = bind_arguments(&opt, CallArgs::positional([Value::Nil, Value::Nil]))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "wrong number of arguments (given 2, expected 0..1)");
    }
}
