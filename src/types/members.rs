use crate::types::TypeDescription;
use std::{
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Accessibility {
    Private,
    Family,
    Assembly,
    Public,
}

/// Whether a virtual method takes over its base's dispatch slot or starts a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VtableLayout {
    ReuseSlot,
    NewSlot,
}

/// One entry of a managed type's method table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub instance: bool,
    pub accessibility: Accessibility,
    pub virtual_member: bool,
    pub abstract_member: bool,
    pub sealed: bool,
    pub vtable_layout: VtableLayout,
    /// Full names of the parameter types, in declaration order.
    pub parameters: Vec<String>,
}

impl Method {
    /// A public, non-virtual instance method with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: true,
            accessibility: Accessibility::Public,
            virtual_member: false,
            abstract_member: false,
            sealed: false,
            vtable_layout: VtableLayout::ReuseSlot,
            parameters: vec![],
        }
    }

    /// `virtual` (or `new virtual`): opens a fresh dispatch slot.
    pub fn new_virtual(name: impl Into<String>) -> Self {
        Self {
            virtual_member: true,
            vtable_layout: VtableLayout::NewSlot,
            ..Self::new(name)
        }
    }

    /// `override`: reuses the slot of a base virtual.
    pub fn override_of(name: impl Into<String>) -> Self {
        Self {
            virtual_member: true,
            vtable_layout: VtableLayout::ReuseSlot,
            ..Self::new(name)
        }
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn abstract_member(mut self) -> Self {
        self.abstract_member = true;
        self
    }

    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.instance = false;
        self
    }

    pub fn matches_signature(&self, name: &str, parameters: &[&str]) -> bool {
        self.name == name
            && self.parameters.len() == parameters.len()
            && self.parameters.iter().zip(parameters).all(|(p, q)| p == q)
    }
}

#[derive(Clone, Copy)]
pub struct MethodDescription {
    pub parent: TypeDescription,
    pub method: &'static Method,
}

impl MethodDescription {
    pub fn name(&self) -> &'static str {
        &self.method.name
    }

    pub fn parameters(&self) -> Vec<&'static str> {
        self.method.parameters.iter().map(String::as_str).collect()
    }
}

impl Debug for MethodDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.parent.type_name(),
            self.method.name,
            self.method.parameters.join(", ")
        )
    }
}

impl PartialEq for MethodDescription {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.method, other.method)
    }
}

impl Eq for MethodDescription {}

impl Hash for MethodDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.method as *const Method).hash(state);
    }
}
