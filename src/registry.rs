//! Identity-preserving lookup from native instances to their managed wrappers.
//!
//! The marshalers only consume [`ManagedInstances`]; [`InstanceRegistry`] is the
//! lifecycle component that normally implements it, living in the managed heap's
//! root so its weak references are traced with everything else.

use crate::{
    object::{NativeIdentity, NativeObject, ObjectHandle},
    types::TypeDescription,
    GCHandle,
};
use gc_arena::{lock::RefLock, Collect, Gc, GcWeak};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Lookup-or-create capability for managed wrappers.
pub trait ManagedInstances<'gc> {
    /// Whether wrappers of `class` can be produced at all.
    fn supports(&self, class: TypeDescription) -> bool;

    /// Returns the live wrapper for `identity`, creating one of `class` when none
    /// exists and `create_if_absent` is set. Two calls with the same identity
    /// return the same wrapper while it is alive.
    fn resolve(
        &self,
        gc: GCHandle<'gc>,
        class: TypeDescription,
        identity: NativeIdentity,
        create_if_absent: bool,
    ) -> Option<ObjectHandle<'gc>>;
}

/// Entry count below which dead entries are left in place.
const PURGE_THRESHOLD: usize = 256;

#[derive(Collect)]
#[collect(no_drop)]
struct Instances<'gc> {
    entries: HashMap<NativeIdentity, GcWeak<'gc, NativeObject>>,
    // dead entries are purged once `entries` grows to this size
    purge_at: usize,
}

impl<'gc> Instances<'gc> {
    fn purge_dead(&mut self, gc: GCHandle<'gc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.upgrade(gc).is_some());
        self.purge_at = PURGE_THRESHOLD.max(self.entries.len() * 2);
        before - self.entries.len()
    }
}

/// Entries hold weak references only, so the registry never keeps a wrapper alive.
/// Entries of collected wrappers are dropped lazily, whenever an insert finds the
/// map at its purge size, or eagerly through [`InstanceRegistry::purge_dead`].
#[derive(Collect)]
#[collect(no_drop)]
pub struct InstanceRegistry<'gc> {
    instances: Gc<'gc, RefLock<Instances<'gc>>>,
    classes: HashSet<TypeDescription>,
}

impl<'gc> InstanceRegistry<'gc> {
    pub fn new(gc: GCHandle<'gc>) -> Self {
        Self {
            instances: Gc::new(
                gc,
                RefLock::new(Instances {
                    entries: HashMap::new(),
                    purge_at: PURGE_THRESHOLD,
                }),
            ),
            classes: HashSet::new(),
        }
    }

    pub fn with_class(mut self, class: TypeDescription) -> Self {
        self.register_class(class);
        self
    }

    pub fn register_class(&mut self, class: TypeDescription) {
        self.classes.insert(class);
    }

    /// Drops the entry for a native instance that native code destroyed. A later
    /// lookup of the same address creates a fresh wrapper.
    pub fn forget(&self, gc: GCHandle<'gc>, identity: NativeIdentity) -> bool {
        self.instances
            .borrow_mut(gc)
            .entries
            .remove(&identity)
            .is_some()
    }

    /// Removes entries whose wrapper has been collected.
    pub fn purge_dead(&self, gc: GCHandle<'gc>) -> usize {
        self.instances.borrow_mut(gc).purge_dead(gc)
    }

    /// Number of entries, dead or alive.
    pub fn len(&self) -> usize {
        self.instances.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_count(&self, gc: GCHandle<'gc>) -> usize {
        self.instances
            .borrow()
            .entries
            .values()
            .filter(|weak| weak.upgrade(gc).is_some())
            .count()
    }

    fn lookup(&self, gc: GCHandle<'gc>, identity: NativeIdentity) -> Option<ObjectHandle<'gc>> {
        self.instances.borrow().entries.get(&identity)?.upgrade(gc)
    }
}

impl<'gc> ManagedInstances<'gc> for InstanceRegistry<'gc> {
    fn supports(&self, class: TypeDescription) -> bool {
        self.classes.contains(&class)
    }

    fn resolve(
        &self,
        gc: GCHandle<'gc>,
        class: TypeDescription,
        identity: NativeIdentity,
        create_if_absent: bool,
    ) -> Option<ObjectHandle<'gc>> {
        if let Some(live) = self.lookup(gc, identity) {
            return Some(live);
        }
        if !create_if_absent || !self.supports(class) {
            return None;
        }

        let handle = Gc::new(gc, NativeObject::new(identity, class));
        let mut instances = self.instances.borrow_mut(gc);
        if instances.entries.len() >= instances.purge_at {
            let purged = instances.purge_dead(gc);
            debug!(purged, remaining = instances.entries.len(), "purged dead wrapper entries");
        }
        instances.entries.insert(identity, Gc::downgrade(handle));
        debug!(?identity, ?class, "created managed wrapper");
        Some(handle)
    }
}
