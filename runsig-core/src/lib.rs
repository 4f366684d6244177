#![forbid(unsafe_code)]

//! Runtime type checking for a dynamically typed host: type specs and the
//! matcher, method signatures checked at call time, inline assertions, and
//! the policy store that decides what happens when a check fails.

pub mod assertions;
pub mod config;
pub mod error;
pub mod failure;
pub mod location;
pub mod matcher;
pub mod methods;
pub mod props;
pub mod scope;
pub mod signature;
pub mod types;
mod validation;

pub use assertions::Checker;
pub use config::{handler_fn, Configuration, PolicyFile, SharedHandler, DEFAULT_SCALAR_TYPES};
pub use error::{BuilderError, ConfigError, FatalKind, RunsigError};
pub use failure::{
    Assertion, CallFailure, CallKind, Failure, FailureHandler, HandlerKind, InlineFailure,
    SigBuilderFailure, SigValidationContext, SigValidationFailure,
};
pub use location::SourceLocation;
pub use matcher::{matches, Depth, MatchResult, Matcher};
pub use methods::{CallArgs, Frame, MethodBody, Runtime};
pub use props::deep_clone_object;
pub use scope::BindScope;
pub use signature::{
    CheckedLevel, DeclBuilder, Declaration, MethodParam, MethodRef, Mode, Param, ParamKind,
    ReturnSpec, SigBlock, Signature,
};
pub use types::{Generic, ShapeKey, TypeKind, TypeSpec, TypeSpecError};

pub use runsig_object::{ClassId, ClassRegistry, Value};
