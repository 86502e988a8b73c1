//! Method-table model of managed types, as introspected at the boundary.

use crate::types::members::{Method, MethodDescription};
use gc_arena::{unsafe_empty_collect, Collect};
use std::{
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
    iter,
};

pub mod members;
pub mod overrides;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeDefinition {
    pub namespace: Option<String>,
    pub name: String,
    pub extends: Option<TypeDescription>,
    pub methods: Vec<Method>,
}

impl TypeDefinition {
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.into(),
            extends: None,
            methods: vec![],
        }
    }

    pub fn extends(mut self, base: TypeDescription) -> Self {
        self.extends = Some(base);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Type metadata lives for the rest of the process, like loaded assemblies do.
    pub fn leak(self) -> TypeDescription {
        TypeDescription {
            definition: Box::leak(Box::new(self)),
        }
    }
}

#[derive(Clone, Copy)]
pub struct TypeDescription {
    pub definition: &'static TypeDefinition,
}
unsafe_empty_collect!(TypeDescription);

impl Debug for TypeDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl PartialEq for TypeDescription {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.definition, other.definition)
    }
}

impl Eq for TypeDescription {}

impl Hash for TypeDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.definition as *const TypeDefinition).hash(state);
    }
}

impl TypeDescription {
    pub fn type_name(&self) -> String {
        match self.definition.namespace.as_deref() {
            None | Some("") => self.definition.name.clone(),
            Some(ns) => format!("{}.{}", ns, self.definition.name),
        }
    }

    pub fn base(&self) -> Option<TypeDescription> {
        self.definition.extends
    }

    /// This type followed by its base types, most derived first.
    pub fn ancestors(&self) -> impl Iterator<Item = TypeDescription> {
        iter::successors(Some(*self), TypeDescription::base)
    }

    pub fn is_subclass_of(&self, other: TypeDescription) -> bool {
        self.ancestors().skip(1).any(|a| a == other)
    }

    /// Methods declared directly on this type.
    pub fn methods(&self) -> impl Iterator<Item = MethodDescription> + '_ {
        self.definition.methods.iter().map(|method| MethodDescription {
            parent: *self,
            method,
        })
    }
}
