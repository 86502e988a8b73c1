//! Deciding whether a managed method genuinely overrides a base virtual.
//!
//! A method that is virtual but opens a new slot (`new virtual`, or the first
//! declaration of a virtual) shares a name and signature with base methods without
//! replacing them, so dispatching through the base slot would bypass it.
//!
//! Every query here is answered from the method table alone: no allocation of
//! managed state, no cache.

use crate::types::{
    members::{Accessibility, MethodDescription, VtableLayout},
    TypeDescription,
};
use bitvec::prelude::*;

impl MethodDescription {
    /// Virtual-dispatchable and reusing its base's slot.
    pub fn has_override(&self) -> bool {
        self.method.virtual_member && self.method.vtable_layout == VtableLayout::ReuseSlot
    }
}

impl TypeDescription {
    /// Finds an instance method by exact name and parameter types, of any
    /// visibility, searching this type first and then its bases. Private methods
    /// of base types are not visible from a derived type.
    pub fn find_instance_method(&self, name: &str, parameters: &[&str]) -> Option<MethodDescription> {
        self.ancestors().enumerate().find_map(|(depth, ancestor)| {
            ancestor.methods().find(|m| {
                m.method.instance
                    && (depth == 0 || m.method.accessibility != Accessibility::Private)
                    && m.method.matches_signature(name, parameters)
            })
        })
    }

    pub fn has_override(&self, name: &str, parameters: &[&str]) -> bool {
        self.find_instance_method(name, parameters)
            .is_some_and(|m| m.has_override())
    }
}

/// Override facts for a fixed list of base virtual slots, computed once per type
/// and handed to whatever builds that type's dispatch table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverrideMask {
    bits: BitVec,
}

impl OverrideMask {
    pub fn compute(ty: TypeDescription, slots: &[MethodDescription]) -> Self {
        let mut bits = bitvec![0; slots.len()];
        for (index, slot) in slots.iter().enumerate() {
            if ty.has_override(slot.name(), &slot.parameters()) {
                bits.set(index, true);
            }
        }
        Self { bits }
    }

    pub fn overrides(&self, slot: usize) -> bool {
        self.bits.get(slot).is_some_and(|bit| *bit)
    }

    pub fn overridden_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn any(&self) -> bool {
        self.bits.any()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}
