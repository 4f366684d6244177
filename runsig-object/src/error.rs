#![forbid(unsafe_code)]

use miette::Diagnostic;
use thiserror::Error;

#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ObjectError {
    #[error("uninitialized constant {0}")]
    #[diagnostic(code(runsig::object::unknown_constant))]
    UnknownConstant(String),

    #[error("superclass mismatch for class {0}")]
    #[diagnostic(code(runsig::object::superclass_mismatch))]
    SuperclassMismatch(String),

    #[error("{0} is not a class")]
    #[diagnostic(code(runsig::object::not_a_class))]
    NotAClass(String),

    #[error("{0} is not a module")]
    #[diagnostic(code(runsig::object::not_a_module))]
    NotAModule(String),

    #[error("cyclic include detected")]
    #[diagnostic(code(runsig::object::cyclic_include))]
    CyclicInclude,

    #[error("undefined method `new' for module {0}")]
    #[diagnostic(code(runsig::object::not_instantiable))]
    NotInstantiable(String),
}
