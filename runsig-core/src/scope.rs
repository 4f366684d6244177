#![forbid(unsafe_code)]

use runsig_object::Value;

use crate::types::{TypeKind, TypeSpec};

/// Capabilities asserted for a receiver by `bind` within one call scope.
///
/// The receiver's class is never changed; the matcher consults the scope
/// instead, so a receiver bound to `T.all(A, B)` satisfies `A`, `B`, and the
/// intersection itself for as long as the scope lives.
#[derive(Clone, Debug)]
pub struct BindScope {
    receiver: Value,
    capabilities: Vec<TypeSpec>,
}

impl BindScope {
    pub fn new(receiver: Value) -> Self {
        BindScope {
            receiver,
            capabilities: Vec::new(),
        }
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn capabilities(&self) -> &[TypeSpec] {
        &self.capabilities
    }

    pub fn asserts(&self, value: &Value, spec: &TypeSpec) -> bool {
        value.identical(&self.receiver) && self.capabilities.contains(spec)
    }

    pub(crate) fn record(&mut self, spec: &TypeSpec) {
        let mut add = |t: TypeSpec| {
            if !self.capabilities.contains(&t) {
                self.capabilities.push(t);
            }
        };
        add(spec.clone());
        if let TypeKind::Intersection(members) = spec.kind() {
            for m in members {
                add(m.clone());
            }
        }
    }
}
