#![forbid(unsafe_code)]

//! The policy store: error handlers, feature toggles and the scalar-type
//! allowlist.
//!
//! Every setter takes effect immediately for every caller sharing the
//! instance. Toggles are atomics and can be read on the hot path without
//! locking. A handler is cloned out of its slot before it runs, so reading a
//! slot and invoking the handler are not atomic with respect to a concurrent
//! `set_handler`; callers that reconfigure handlers across threads must
//! synchronize themselves.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use regex::Regex;
use runsig_object::Value;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, RunsigError};
use crate::failure::{Failure, FailureHandler, HandlerKind};
use crate::signature::CheckedLevel;

pub type SharedHandler = Arc<dyn FailureHandler>;

/// Wrap a closure as a handler.
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(Failure) -> Result<(), RunsigError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub const DEFAULT_SCALAR_TYPES: &[&str] = &[
    "NilClass",
    "TrueClass",
    "FalseClass",
    "Integer",
    "Float",
    "String",
    "Symbol",
    "Time",
    "Date",
    "BigDecimal",
    "T::Enum",
];

fn is_class_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z][A-Za-z0-9_]*(::[A-Z][A-Za-z0-9_]*)*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

fn default_scalar_types() -> Arc<BTreeSet<String>> {
    Arc::new(DEFAULT_SCALAR_TYPES.iter().map(|s| s.to_string()).collect())
}

fn level_to_u8(level: CheckedLevel) -> u8 {
    match level {
        CheckedLevel::Always => 0,
        CheckedLevel::Tests => 1,
        CheckedLevel::Never => 2,
    }
}

fn level_from_u8(raw: u8) -> CheckedLevel {
    match raw {
        1 => CheckedLevel::Tests,
        2 => CheckedLevel::Never,
        _ => CheckedLevel::Always,
    }
}

pub struct Configuration {
    handlers: [RwLock<Option<SharedHandler>>; 4],
    include_value: AtomicBool,
    runtime_assertions: AtomicBool,
    checked_tests: AtomicBool,
    vm_prop_serde: AtomicBool,
    default_checked: AtomicU8,
    scalar_types: RwLock<Arc<BTreeSet<String>>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            handlers: Default::default(),
            include_value: AtomicBool::new(true),
            runtime_assertions: AtomicBool::new(true),
            checked_tests: AtomicBool::new(false),
            vm_prop_serde: AtomicBool::new(false),
            default_checked: AtomicU8::new(level_to_u8(CheckedLevel::Always)),
            scalar_types: RwLock::new(default_scalar_types()),
        }
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let custom: Vec<&str> = HandlerKind::ALL
            .iter()
            .filter(|k| self.handlers[k.index()].read().is_some())
            .map(|k| k.display())
            .collect();
        f.debug_struct("Configuration")
            .field("custom_handlers", &custom)
            .field("include_value", &self.include_value_in_errors())
            .field("runtime_assertions", &self.runtime_assertions_enabled())
            .field("checked_tests", &self.checking_for_sigs_marked_checked_tests())
            .field("vm_prop_serde", &self.use_vm_prop_serde())
            .field("default_checked", &self.default_checked_level())
            .finish()
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance used when no configuration is supplied.
    pub fn global() -> Arc<Configuration> {
        static GLOBAL: OnceLock<Arc<Configuration>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Configuration::new())).clone()
    }

    // ---- handlers ----

    /// Install `handler` for `kind`; `None` restores the default (raise).
    pub fn set_handler(&self, kind: HandlerKind, handler: Option<SharedHandler>) {
        debug!(handler = kind.display(), custom = handler.is_some(), "set handler");
        *self.handlers[kind.index()].write() = handler;
    }

    pub fn handler(&self, kind: HandlerKind) -> Option<SharedHandler> {
        self.handlers[kind.index()].read().clone()
    }

    pub fn set_inline_type_error_handler(&self, handler: Option<SharedHandler>) {
        self.set_handler(HandlerKind::InlineTypeError, handler);
    }

    pub fn set_sig_builder_error_handler(&self, handler: Option<SharedHandler>) {
        self.set_handler(HandlerKind::SigBuilderError, handler);
    }

    pub fn set_sig_validation_error_handler(&self, handler: Option<SharedHandler>) {
        self.set_handler(HandlerKind::SigValidationError, handler);
    }

    pub fn set_call_validation_error_handler(&self, handler: Option<SharedHandler>) {
        self.set_handler(HandlerKind::CallValidationError, handler);
    }

    /// Route `failure` to its handler. `Ok(())` means a custom handler
    /// observed the failure and returned normally.
    pub fn dispatch(&self, failure: Failure) -> Result<(), RunsigError> {
        let kind = failure.kind();
        match self.handler(kind) {
            Some(handler) => {
                debug!(handler = kind.display(), message = %failure.message(), "custom handler");
                handler.handle(failure)
            }
            None => {
                debug!(handler = kind.display(), message = %failure.message(), "default handler");
                Err(failure.into_default_error())
            }
        }
    }

    // ---- toggles ----

    pub fn include_value_in_type_errors(&self) {
        self.include_value.store(true, Ordering::Release);
    }

    pub fn exclude_value_in_type_errors(&self) {
        self.include_value.store(false, Ordering::Release);
    }

    pub fn include_value_in_errors(&self) -> bool {
        self.include_value.load(Ordering::Acquire)
    }

    pub fn enable_runtime_type_assertions(&self) {
        self.runtime_assertions.store(true, Ordering::Release);
    }

    /// Turn every inline assertion into a pass-through. Unsafe: mismatches
    /// go unnoticed.
    pub fn disable_runtime_type_assertions(&self) {
        self.runtime_assertions.store(false, Ordering::Release);
    }

    pub fn runtime_assertions_enabled(&self) -> bool {
        self.runtime_assertions.load(Ordering::Acquire)
    }

    pub fn enable_checking_for_sigs_marked_checked_tests(&self) {
        self.checked_tests.store(true, Ordering::Release);
    }

    pub fn checking_for_sigs_marked_checked_tests(&self) -> bool {
        self.checked_tests.load(Ordering::Acquire)
    }

    pub fn set_default_checked_level(&self, level: CheckedLevel) {
        self.default_checked.store(level_to_u8(level), Ordering::Release);
    }

    pub fn default_checked_level(&self) -> CheckedLevel {
        level_from_u8(self.default_checked.load(Ordering::Acquire))
    }

    // ---- native prop serde ----

    pub fn can_enable_vm_prop_serde(&self) -> bool {
        cfg!(feature = "native-prop-serde")
    }

    pub fn enable_vm_prop_serde(&self) -> Result<(), ConfigError> {
        if !self.can_enable_vm_prop_serde() {
            return Err(unsupported_prop_serde());
        }
        self.vm_prop_serde.store(true, Ordering::Release);
        Ok(())
    }

    pub fn disable_vm_prop_serde(&self) {
        self.vm_prop_serde.store(false, Ordering::Release);
    }

    pub fn use_vm_prop_serde(&self) -> bool {
        self.vm_prop_serde.load(Ordering::Acquire)
    }

    // ---- scalar types ----

    /// Replace the allowlist. Every entry must be a class-name string;
    /// otherwise the previous allowlist is kept.
    pub fn set_scalar_types(&self, values: &[Value]) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        for value in values {
            match value {
                Value::String(s) if is_class_name(s) => {
                    names.insert(s.clone());
                }
                _ => return Err(ConfigError::ScalarTypes),
            }
        }
        *self.scalar_types.write() = Arc::new(names);
        Ok(())
    }

    pub fn scalar_types(&self) -> Arc<BTreeSet<String>> {
        self.scalar_types.read().clone()
    }

    pub fn is_scalar_type(&self, class_name: &str) -> bool {
        self.scalar_types.read().contains(class_name)
    }

    /// Restore every knob to its initial state.
    pub fn reset_to_defaults(&self) {
        for kind in HandlerKind::ALL {
            *self.handlers[kind.index()].write() = None;
        }
        self.include_value_in_type_errors();
        self.enable_runtime_type_assertions();
        self.checked_tests.store(false, Ordering::Release);
        self.disable_vm_prop_serde();
        self.set_default_checked_level(CheckedLevel::Always);
        *self.scalar_types.write() = default_scalar_types();
    }

    /// Apply every setting present in `policy`. Scalar types are validated
    /// before anything is changed.
    pub fn apply_policy(&self, policy: &PolicyFile) -> Result<(), ConfigError> {
        let scalars = policy
            .scalar_types
            .as_ref()
            .map(|list| list.iter().map(toml_to_value).collect::<Vec<_>>());
        if let Some(values) = &scalars {
            if !values
                .iter()
                .all(|v| matches!(v, Value::String(s) if is_class_name(s)))
            {
                return Err(ConfigError::ScalarTypes);
            }
        }
        if policy.vm_prop_serde == Some(true) && !self.can_enable_vm_prop_serde() {
            return Err(unsupported_prop_serde());
        }

        if let Some(values) = scalars {
            self.set_scalar_types(&values)?;
        }
        match policy.include_value_in_type_errors {
            Some(true) => self.include_value_in_type_errors(),
            Some(false) => self.exclude_value_in_type_errors(),
            None => {}
        }
        match policy.runtime_type_assertions {
            Some(true) => self.enable_runtime_type_assertions(),
            Some(false) => self.disable_runtime_type_assertions(),
            None => {}
        }
        if let Some(level) = policy.default_checked_level {
            self.set_default_checked_level(level);
        }
        if let Some(on) = policy.check_sigs_marked_checked_tests {
            self.checked_tests.store(on, Ordering::Release);
        }
        match policy.vm_prop_serde {
            Some(true) => self.enable_vm_prop_serde()?,
            Some(false) => self.disable_vm_prop_serde(),
            None => {}
        }
        debug!(?policy, "applied policy");
        Ok(())
    }
}

fn unsupported_prop_serde() -> ConfigError {
    ConfigError::Unsupported(
        "Ruby VM is not setup to use native code for Prop serialization.".into(),
    )
}

fn toml_to_value(v: &toml::Value) -> Value {
    match v {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::Integer(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Array(items) => Value::Array(items.iter().map(toml_to_value).collect()),
        _ => Value::Nil,
    }
}

/// Policy settings read from a TOML file. Absent keys leave the current
/// setting untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    pub include_value_in_type_errors: Option<bool>,

    #[serde(default)]
    pub runtime_type_assertions: Option<bool>,

    #[serde(default)]
    pub default_checked_level: Option<CheckedLevel>,

    #[serde(default)]
    pub check_sigs_marked_checked_tests: Option<bool>,

    #[serde(default)]
    pub vm_prop_serde: Option<bool>,

    /// Kept loosely typed so non-string entries surface as a configuration
    /// error rather than a parse error.
    #[serde(default)]
    pub scalar_types: Option<Vec<toml::Value>>,
}

impl PolicyFile {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
