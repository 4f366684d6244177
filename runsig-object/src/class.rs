#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::ObjectError;
use crate::value::{Object, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Module,
}

impl ClassKind {
    pub fn display(&self) -> &'static str {
        match self {
            ClassKind::Class => "class",
            ClassKind::Module => "module",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub kind: ClassKind,
    pub superclass: Option<ClassId>,
    /// Included modules, in inclusion order.
    pub includes: Vec<ClassId>,
}

/// Well-known ids of the classes every registry starts with.
pub mod builtin {
    use super::ClassId;

    pub const BASIC_OBJECT: ClassId = ClassId(0);
    pub const OBJECT: ClassId = ClassId(1);
    pub const KERNEL: ClassId = ClassId(2);
    pub const COMPARABLE: ClassId = ClassId(3);
    pub const ENUMERABLE: ClassId = ClassId(4);
    pub const NIL_CLASS: ClassId = ClassId(5);
    pub const TRUE_CLASS: ClassId = ClassId(6);
    pub const FALSE_CLASS: ClassId = ClassId(7);
    pub const NUMERIC: ClassId = ClassId(8);
    pub const INTEGER: ClassId = ClassId(9);
    pub const FLOAT: ClassId = ClassId(10);
    pub const STRING: ClassId = ClassId(11);
    pub const SYMBOL: ClassId = ClassId(12);
    pub const ARRAY: ClassId = ClassId(13);
    pub const HASH: ClassId = ClassId(14);
    pub const SET: ClassId = ClassId(15);
    pub const PROC: ClassId = ClassId(16);
    pub const MODULE: ClassId = ClassId(17);
    pub const CLASS: ClassId = ClassId(18);
}

/// Classes and modules known to the host, with single inheritance and
/// module inclusion.
#[derive(Clone, Debug)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    by_name: HashMap<String, ClassId>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        use builtin::*;

        let mut reg = ClassRegistry {
            classes: Vec::new(),
            by_name: HashMap::new(),
        };
        // Order must follow the ids in `builtin`.
        reg.push("BasicObject", ClassKind::Class, None, vec![]);
        reg.push("Object", ClassKind::Class, Some(BASIC_OBJECT), vec![]);
        reg.push("Kernel", ClassKind::Module, None, vec![]);
        reg.push("Comparable", ClassKind::Module, None, vec![]);
        reg.push("Enumerable", ClassKind::Module, None, vec![]);
        reg.push("NilClass", ClassKind::Class, Some(OBJECT), vec![]);
        reg.push("TrueClass", ClassKind::Class, Some(OBJECT), vec![]);
        reg.push("FalseClass", ClassKind::Class, Some(OBJECT), vec![]);
        reg.push("Numeric", ClassKind::Class, Some(OBJECT), vec![COMPARABLE]);
        reg.push("Integer", ClassKind::Class, Some(NUMERIC), vec![]);
        reg.push("Float", ClassKind::Class, Some(NUMERIC), vec![]);
        reg.push("String", ClassKind::Class, Some(OBJECT), vec![COMPARABLE]);
        reg.push("Symbol", ClassKind::Class, Some(OBJECT), vec![COMPARABLE]);
        reg.push("Array", ClassKind::Class, Some(OBJECT), vec![ENUMERABLE]);
        reg.push("Hash", ClassKind::Class, Some(OBJECT), vec![ENUMERABLE]);
        reg.push("Set", ClassKind::Class, Some(OBJECT), vec![ENUMERABLE]);
        reg.push("Proc", ClassKind::Class, Some(OBJECT), vec![]);
        reg.push("Module", ClassKind::Class, Some(OBJECT), vec![]);
        reg.push("Class", ClassKind::Class, Some(MODULE), vec![]);
        reg.classes[OBJECT.index()].includes.push(KERNEL);
        reg
    }

    fn push(
        &mut self,
        name: &str,
        kind: ClassKind,
        superclass: Option<ClassId>,
        includes: Vec<ClassId>,
    ) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            id,
            name: name.to_string(),
            kind,
            superclass,
            includes,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Define (or reopen) a class. `superclass` defaults to `Object`.
    pub fn define_class(
        &mut self,
        name: &str,
        superclass: Option<&str>,
    ) -> Result<ClassId, ObjectError> {
        let parent = match superclass {
            Some(s) => {
                let id = self.require(s)?;
                if self.classes[id.index()].kind != ClassKind::Class {
                    return Err(ObjectError::NotAClass(s.to_string()));
                }
                id
            }
            None => builtin::OBJECT,
        };

        if let Some(existing) = self.lookup(name) {
            let info = &self.classes[existing.index()];
            if info.kind != ClassKind::Class {
                return Err(ObjectError::NotAClass(name.to_string()));
            }
            if superclass.is_some() && info.superclass != Some(parent) {
                return Err(ObjectError::SuperclassMismatch(name.to_string()));
            }
            return Ok(existing);
        }

        Ok(self.push(name, ClassKind::Class, Some(parent), vec![]))
    }

    /// Define (or reopen) a module.
    pub fn define_module(&mut self, name: &str) -> Result<ClassId, ObjectError> {
        if let Some(existing) = self.lookup(name) {
            if self.classes[existing.index()].kind != ClassKind::Module {
                return Err(ObjectError::NotAModule(name.to_string()));
            }
            return Ok(existing);
        }
        Ok(self.push(name, ClassKind::Module, None, vec![]))
    }

    pub fn include_module(&mut self, target: ClassId, module: ClassId) -> Result<(), ObjectError> {
        let info = self.info(module)?;
        if info.kind != ClassKind::Module {
            return Err(ObjectError::NotAModule(info.name.clone()));
        }
        self.info(target)?;
        if target == module || self.ancestors(module).contains(&target) {
            return Err(ObjectError::CyclicInclude);
        }
        let includes = &mut self.classes[target.index()].includes;
        if !includes.contains(&module) {
            includes.push(module);
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<ClassId, ObjectError> {
        self.lookup(name)
            .ok_or_else(|| ObjectError::UnknownConstant(name.to_string()))
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.index())
    }

    fn info(&self, id: ClassId) -> Result<&ClassInfo, ObjectError> {
        self.get(id)
            .ok_or_else(|| ObjectError::UnknownConstant(format!("#<Class id={}>", id.0)))
    }

    pub fn name(&self, id: ClassId) -> &str {
        self.get(id).map(|c| c.name.as_str()).unwrap_or("<anonymous>")
    }

    /// Method resolution order: the class, its included modules (last
    /// included first), then the superclass chain.
    pub fn ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        self.collect_ancestors(id, &mut out);
        out
    }

    fn collect_ancestors(&self, id: ClassId, out: &mut Vec<ClassId>) {
        let Some(info) = self.get(id) else {
            return;
        };
        if out.contains(&id) {
            return;
        }
        out.push(id);
        for module in info.includes.iter().rev() {
            self.collect_ancestors(*module, out);
        }
        if let Some(parent) = info.superclass {
            self.collect_ancestors(parent, out);
        }
    }

    pub fn is_descendant(&self, id: ClassId, ancestor: ClassId) -> bool {
        id == ancestor || self.ancestors(id).contains(&ancestor)
    }

    pub fn class_of(&self, value: &Value) -> ClassId {
        match value {
            Value::Nil => builtin::NIL_CLASS,
            Value::Bool(true) => builtin::TRUE_CLASS,
            Value::Bool(false) => builtin::FALSE_CLASS,
            Value::Integer(_) => builtin::INTEGER,
            Value::Float(_) => builtin::FLOAT,
            Value::String(_) => builtin::STRING,
            Value::Symbol(_) => builtin::SYMBOL,
            Value::Array(_) => builtin::ARRAY,
            Value::Hash(_) => builtin::HASH,
            Value::Set(_) => builtin::SET,
            Value::Class(id) => match self.get(*id).map(|c| c.kind) {
                Some(ClassKind::Module) => builtin::MODULE,
                _ => builtin::CLASS,
            },
            Value::Object(obj) => obj.class(),
        }
    }

    pub fn class_name_of(&self, value: &Value) -> &str {
        self.name(self.class_of(value))
    }

    pub fn is_a(&self, value: &Value, class: ClassId) -> bool {
        self.is_descendant(self.class_of(value), class)
    }

    pub fn instantiate(&self, class: ClassId) -> Result<Value, ObjectError> {
        self.instantiate_with(class, BTreeMap::new())
    }

    pub fn instantiate_with(
        &self,
        class: ClassId,
        ivars: BTreeMap<String, Value>,
    ) -> Result<Value, ObjectError> {
        let info = self.info(class)?;
        if info.kind == ClassKind::Module {
            return Err(ObjectError::NotInstantiable(info.name.clone()));
        }
        Ok(Value::Object(Arc::new(Object::new(class, ivars))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_line_up_with_ids() {
        let reg = ClassRegistry::new();
        assert_eq!(reg.name(builtin::INTEGER), "Integer");
        assert_eq!(reg.name(builtin::CLASS), "Class");
        assert_eq!(reg.lookup("Set"), Some(builtin::SET));
    }

    #[test]
    fn integer_descends_from_numeric_and_comparable() {
        let reg = ClassRegistry::new();
        assert!(reg.is_a(&Value::Integer(1), builtin::NUMERIC));
        assert!(reg.is_a(&Value::Integer(1), builtin::COMPARABLE));
        assert!(reg.is_a(&Value::Integer(1), builtin::KERNEL));
        assert!(!reg.is_a(&Value::Integer(1), builtin::STRING));
    }

    #[test]
    fn included_modules_show_up_in_ancestors() {
        let mut reg = ClassRegistry::new();
        let readable = reg.define_module("Readable").unwrap();
        let writable = reg.define_module("Writable").unwrap();
        let article = reg.define_class("Article", None).unwrap();
        reg.include_module(article, writable).unwrap();
        reg.include_module(article, readable).unwrap();

        let ancestors = reg.ancestors(article);
        assert_eq!(&ancestors[..3], &[article, readable, writable]);
        assert!(ancestors.contains(&builtin::OBJECT));
    }

    #[test]
    fn reopening_with_a_different_superclass_fails() {
        let mut reg = ClassRegistry::new();
        reg.define_class("Base", None).unwrap();
        let child = reg.define_class("Child", Some("Base")).unwrap();
        assert_eq!(reg.define_class("Child", None).unwrap(), child);
        assert_eq!(
            reg.define_class("Child", Some("String")),
            Err(ObjectError::SuperclassMismatch("Child".to_string()))
        );
    }

    #[test]
    fn modules_cannot_be_instantiated() {
        let mut reg = ClassRegistry::new();
        let m = reg.define_module("Helpers").unwrap();
        assert!(matches!(reg.instantiate(m), Err(ObjectError::NotInstantiable(_))));
        assert_eq!(reg.class_of(&Value::Class(m)), builtin::MODULE);
    }

    #[test]
    fn cyclic_includes_are_rejected() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_module("A").unwrap();
        let b = reg.define_module("B").unwrap();
        let c = reg.define_module("C").unwrap();
        reg.include_module(a, b).unwrap();
        reg.include_module(b, c).unwrap();

        assert_eq!(reg.include_module(b, a), Err(ObjectError::CyclicInclude));
        assert_eq!(reg.include_module(c, a), Err(ObjectError::CyclicInclude));
        assert_eq!(reg.include_module(a, a), Err(ObjectError::CyclicInclude));
        assert_eq!(reg.ancestors(a), vec![a, b, c]);
        assert!(!reg.is_a(&Value::Class(a), builtin::STRING));
    }

    #[test]
    fn only_modules_can_be_included() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", None).unwrap();
        let b = reg.define_class("B", None).unwrap();
        assert_eq!(
            reg.include_module(a, b),
            Err(ObjectError::NotAModule("B".to_string()))
        );
    }
}
