#![forbid(unsafe_code)]

//! Inline assertions: `must`, `typed_let`, `cast`, `bind` and `absurd`.
//!
//! Each one checks, dispatches a failure to the inline handler on mismatch,
//! and resolves to the original value when the handler returns normally.
//! With runtime assertions disabled they return the input untouched.

use runsig_object::{ClassRegistry, Value};
use tracing::trace;

use crate::config::Configuration;
use crate::error::RunsigError;
use crate::failure::{Assertion, Failure, InlineFailure};
use crate::location::SourceLocation;
use crate::matcher::{Depth, Matcher};
use crate::scope::BindScope;
use crate::types::TypeSpec;

#[derive(Clone, Copy)]
pub struct Checker<'a> {
    classes: &'a ClassRegistry,
    config: &'a Configuration,
}

impl<'a> Checker<'a> {
    pub fn new(classes: &'a ClassRegistry, config: &'a Configuration) -> Self {
        Checker { classes, config }
    }

    fn matcher(&self) -> Matcher<'a> {
        Matcher::new(self.classes)
            .depth(Depth::Recursive)
            .include_value(self.config.include_value_in_errors())
    }

    /// Fails when `value` is nil.
    #[track_caller]
    pub fn must(&self, value: Value) -> Result<Value, RunsigError> {
        let location = SourceLocation::caller();
        if !self.config.runtime_assertions_enabled() || !value.is_nil() {
            return Ok(value);
        }
        self.fail(
            Assertion::Must,
            "Passed `nil` into T.must".to_string(),
            value,
            None,
            location,
        )
    }

    /// Declares `value` to be of `spec`.
    #[track_caller]
    pub fn typed_let(&self, value: Value, spec: &TypeSpec) -> Result<Value, RunsigError> {
        self.check(Assertion::Let, value, spec, None, SourceLocation::caller())
    }

    /// Like `typed_let`, but marks an explicit cast.
    #[track_caller]
    pub fn cast(&self, value: Value, spec: &TypeSpec) -> Result<Value, RunsigError> {
        self.check(Assertion::Cast, value, spec, None, SourceLocation::caller())
    }

    /// Re-type the scope's receiver as `spec`. On success the receiver
    /// satisfies `spec` and each of its intersection members for the rest
    /// of the scope.
    #[track_caller]
    pub fn bind(&self, scope: &mut BindScope, spec: &TypeSpec) -> Result<Value, RunsigError> {
        let location = SourceLocation::caller();
        let receiver = scope.receiver().clone();
        if !self.config.runtime_assertions_enabled() {
            return Ok(receiver);
        }
        if self.matcher().within(scope).is_valid(&receiver, spec) {
            trace!(%spec, "bind");
            scope.record(spec);
            return Ok(receiver);
        }
        self.check(Assertion::Bind, receiver, spec, Some(&*scope), location)
    }

    /// Marks code that must be unreachable; reaching it always fails.
    #[track_caller]
    pub fn absurd(&self, value: Value) -> Result<Value, RunsigError> {
        let location = SourceLocation::caller();
        if !self.config.runtime_assertions_enabled() {
            return Ok(value);
        }
        let mut message = "Control flow reached T.absurd.".to_string();
        if self.config.include_value_in_errors() {
            message.push_str(" Got value: ");
            message.push_str(&self.classes.inspect(&value));
        }
        self.fail(Assertion::Absurd, message, value, None, location)
    }

    fn check(
        &self,
        assertion: Assertion,
        value: Value,
        spec: &TypeSpec,
        scope: Option<&BindScope>,
        location: SourceLocation,
    ) -> Result<Value, RunsigError> {
        if !self.config.runtime_assertions_enabled() {
            return Ok(value);
        }
        let matcher = match scope {
            Some(scope) => self.matcher().within(scope),
            None => self.matcher(),
        };
        let result = matcher.matches(&value, spec);
        if result.ok {
            return Ok(value);
        }
        let message = format!("{}: {}", assertion.label(), result.diagnostic);
        self.fail(assertion, message, value, Some(spec.clone()), location)
    }

    fn fail(
        &self,
        assertion: Assertion,
        message: String,
        value: Value,
        expected: Option<TypeSpec>,
        location: SourceLocation,
    ) -> Result<Value, RunsigError> {
        let message = format!("{message}\nCaller: {location}");
        let failure = Failure::InlineType(InlineFailure {
            error: RunsigError::InlineType { message },
            assertion,
            value: value.clone(),
            expected,
            location,
        });
        self.config.dispatch(failure)?;
        Ok(value)
    }
}
