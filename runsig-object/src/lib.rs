#![forbid(unsafe_code)]

//! Host object model: dynamic values and the class registry they are
//! checked against.

mod class;
mod error;
mod inspect;
mod value;

pub use class::{builtin, ClassId, ClassInfo, ClassKind, ClassRegistry};
pub use error::ObjectError;
pub use value::{Object, Value};
