#![forbid(unsafe_code)]

use miette::Diagnostic;
use runsig_object::ObjectError;
use thiserror::Error;

use crate::types::TypeSpecError;

/// The host exception class a fatal error surfaces as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatalKind {
    TypeError,
    ArgumentError,
    RuntimeError,
    NoMethodError,
}

impl FatalKind {
    pub fn display(&self) -> &'static str {
        match self {
            FatalKind::TypeError => "TypeError",
            FatalKind::ArgumentError => "ArgumentError",
            FatalKind::RuntimeError => "RuntimeError",
            FatalKind::NoMethodError => "NoMethodError",
        }
    }
}

/// An invalid combinator sequence in a signature declaration.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(runsig::sig_builder))]
pub struct BuilderError {
    pub message: String,
}

impl BuilderError {
    pub fn new(message: impl Into<String>) -> Self {
        BuilderError {
            message: message.into(),
        }
    }
}

/// Invalid configuration input. Never routed through a handler.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Provided values must all be class name strings.")]
    #[diagnostic(code(runsig::config::scalar_types))]
    ScalarTypes,

    #[error("{0}")]
    #[diagnostic(code(runsig::config::unsupported))]
    Unsupported(String),

    #[error("failed to read policy file {path}: {message}")]
    #[diagnostic(code(runsig::config::io))]
    Io { path: String, message: String },

    #[error("invalid policy file: {0}")]
    #[diagnostic(code(runsig::config::parse))]
    Parse(String),
}

impl ConfigError {
    pub fn fatal_kind(&self) -> FatalKind {
        match self {
            ConfigError::Unsupported(_) => FatalKind::RuntimeError,
            _ => FatalKind::ArgumentError,
        }
    }
}

#[derive(Clone, Debug, Error, Diagnostic)]
pub enum RunsigError {
    /// `must` / `typed_let` / `cast` / `bind` / `absurd` mismatch.
    #[error("{message}")]
    #[diagnostic(code(runsig::inline))]
    InlineType { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    SigBuilder(BuilderError),

    #[error("{message}")]
    #[diagnostic(code(runsig::sig_validation))]
    SigValidation { message: String },

    #[error("{message}")]
    #[diagnostic(code(runsig::call_validation))]
    CallValidation { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    TypeSpec(#[from] TypeSpecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Object(#[from] ObjectError),

    /// Wrong arity or unknown keywords at a call.
    #[error("{message}")]
    #[diagnostic(code(runsig::argument))]
    Argument { message: String },

    #[error("undefined method `{method}' for an instance of {class}")]
    #[diagnostic(code(runsig::no_method))]
    NoMethod { method: String, class: String },

    #[error("{message}")]
    #[diagnostic(code(runsig::not_implemented))]
    NotImplemented { message: String },

    /// Raised by a user-supplied handler or method body.
    #[error("{message}")]
    #[diagnostic(code(runsig::raised))]
    Raised { kind: FatalKind, message: String },
}

impl RunsigError {
    pub fn raised(kind: FatalKind, message: impl Into<String>) -> Self {
        RunsigError::Raised {
            kind,
            message: message.into(),
        }
    }

    pub fn fatal_kind(&self) -> FatalKind {
        match self {
            RunsigError::InlineType { .. } | RunsigError::CallValidation { .. } => {
                FatalKind::TypeError
            }
            RunsigError::SigBuilder(_)
            | RunsigError::TypeSpec(_)
            | RunsigError::Object(_)
            | RunsigError::Argument { .. } => FatalKind::ArgumentError,
            RunsigError::SigValidation { .. } | RunsigError::NotImplemented { .. } => {
                FatalKind::RuntimeError
            }
            RunsigError::Config(e) => e.fatal_kind(),
            RunsigError::NoMethod { .. } => FatalKind::NoMethodError,
            RunsigError::Raised { kind, .. } => *kind,
        }
    }
}
