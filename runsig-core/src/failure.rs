#![forbid(unsafe_code)]

//! Failure payloads handed to the configurable error handlers.

use std::sync::Arc;

use runsig_object::Value;

use crate::error::{BuilderError, RunsigError};
use crate::location::SourceLocation;
use crate::signature::{Declaration, MethodRef, Signature};
use crate::types::TypeSpec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerKind {
    InlineTypeError,
    SigBuilderError,
    SigValidationError,
    CallValidationError,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 4] = [
        HandlerKind::InlineTypeError,
        HandlerKind::SigBuilderError,
        HandlerKind::SigValidationError,
        HandlerKind::CallValidationError,
    ];

    pub fn display(&self) -> &'static str {
        match self {
            HandlerKind::InlineTypeError => "inline_type_error_handler",
            HandlerKind::SigBuilderError => "sig_builder_error_handler",
            HandlerKind::SigValidationError => "sig_validation_error_handler",
            HandlerKind::CallValidationError => "call_validation_error_handler",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// The inline assertion that produced a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assertion {
    Must,
    Let,
    Cast,
    Bind,
    Absurd,
}

impl Assertion {
    pub fn label(&self) -> &'static str {
        match self {
            Assertion::Must => "T.must",
            Assertion::Let => "T.let",
            Assertion::Cast => "T.cast",
            Assertion::Bind => "T.bind",
            Assertion::Absurd => "T.absurd",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Parameter,
    Return,
}

impl CallKind {
    pub fn display(&self) -> &'static str {
        match self {
            CallKind::Parameter => "Parameter",
            CallKind::Return => "Return",
        }
    }
}

#[derive(Clone, Debug)]
pub struct InlineFailure {
    pub error: RunsigError,
    pub assertion: Assertion,
    pub value: Value,
    /// Absent for `must` and `absurd`.
    pub expected: Option<TypeSpec>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug)]
pub struct SigBuilderFailure {
    pub error: BuilderError,
    pub method: MethodRef,
    pub location: SourceLocation,
}

#[derive(Clone, Debug)]
pub struct SigValidationContext {
    pub method: MethodRef,
    pub declaration: Declaration,
    pub signature: Option<Arc<Signature>>,
    pub super_signature: Option<Arc<Signature>>,
}

#[derive(Clone, Debug)]
pub struct SigValidationFailure {
    pub error: RunsigError,
    /// Empty for final-method violations.
    pub context: Option<SigValidationContext>,
}

#[derive(Clone, Debug)]
pub struct CallFailure {
    pub signature: Arc<Signature>,
    /// Parameter name; `None` for the return value.
    pub name: Option<String>,
    pub kind: CallKind,
    pub expected: TypeSpec,
    pub value: Value,
    pub location: SourceLocation,
    pub message: String,
}

#[derive(Clone, Debug)]
pub enum Failure {
    InlineType(InlineFailure),
    SigBuilder(SigBuilderFailure),
    SigValidation(SigValidationFailure),
    CallValidation(CallFailure),
}

impl Failure {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Failure::InlineType(_) => HandlerKind::InlineTypeError,
            Failure::SigBuilder(_) => HandlerKind::SigBuilderError,
            Failure::SigValidation(_) => HandlerKind::SigValidationError,
            Failure::CallValidation(_) => HandlerKind::CallValidationError,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Failure::InlineType(f) => f.error.to_string(),
            Failure::SigBuilder(f) => f.error.message.clone(),
            Failure::SigValidation(f) => f.error.to_string(),
            Failure::CallValidation(f) => f.message.clone(),
        }
    }

    /// What the default handler raises.
    pub fn into_default_error(self) -> RunsigError {
        match self {
            Failure::InlineType(f) => f.error,
            Failure::SigBuilder(f) => RunsigError::SigBuilder(f.error),
            Failure::SigValidation(f) => f.error,
            Failure::CallValidation(f) => RunsigError::CallValidation { message: f.message },
        }
    }
}

/// A replacement for one of the default error handlers.
///
/// Returning `Ok(())` suppresses the failure and lets execution continue;
/// returning an error propagates it to the operation that failed.
pub trait FailureHandler: Send + Sync {
    fn handle(&self, failure: Failure) -> Result<(), RunsigError>;
}

impl<F> FailureHandler for F
where
    F: Fn(Failure) -> Result<(), RunsigError> + Send + Sync,
{
    fn handle(&self, failure: Failure) -> Result<(), RunsigError> {
        self(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_error_keeps_the_message() {
        let failure = Failure::SigBuilder(SigBuilderFailure {
            error: BuilderError::new("boom"),
            method: MethodRef::new("Foo", "bar"),
            location: SourceLocation::new("a.rb", 1, 1),
        });
        assert_eq!(failure.kind(), HandlerKind::SigBuilderError);
        assert_eq!(failure.message(), "boom");
        let err = failure.into_default_error();
        assert!(matches!(err, RunsigError::SigBuilder(_)));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn closures_are_handlers() {
        let handler = |f: Failure| -> Result<(), RunsigError> {
            Err(RunsigError::raised(crate::error::FatalKind::RuntimeError, f.message()))
        };
        let failure = Failure::SigValidation(SigValidationFailure {
            error: RunsigError::SigValidation {
                message: "bad".into(),
            },
            context: None,
        });
        let err = handler.handle(failure).unwrap_err();
        assert_eq!(err.to_string(), "bad");
    }
}
