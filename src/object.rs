use crate::{
    array::element_count,
    buffer::{NativeAllocator, NativeBuffer},
    error::MarshalError,
    registry::ManagedInstances,
    types::TypeDescription,
    GCHandle,
};
use gc_arena::{unsafe_empty_collect, Collect, Collection, Gc};
use std::{
    ffi::c_void,
    fmt::{Debug, Formatter},
    mem::size_of,
};
use tracing::{trace, warn};

/// Address of a native object instance, used as its identity.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NativeIdentity(usize);
unsafe_empty_collect!(NativeIdentity);

impl NativeIdentity {
    pub const NULL: Self = Self(0);
    pub const SIZE: usize = size_of::<usize>();

    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub fn addr(self) -> usize {
        self.0
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    fn read(source: &[u8]) -> Self {
        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&source[..Self::SIZE]);
        Self(usize::from_ne_bytes(bytes))
    }

    fn write(self, dest: &mut [u8]) {
        dest[..Self::SIZE].copy_from_slice(&self.0.to_ne_bytes());
    }
}

impl Debug for NativeIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeIdentity({:#x})", self.0)
    }
}

/// Managed wrapper around exactly one native instance.
#[derive(Debug)]
pub struct NativeObject {
    native_instance: NativeIdentity,
    class: TypeDescription,
}
unsafe_empty_collect!(NativeObject);

impl NativeObject {
    pub fn new(native_instance: NativeIdentity, class: TypeDescription) -> Self {
        Self {
            native_instance,
            class,
        }
    }

    pub fn native_instance(&self) -> NativeIdentity {
        self.native_instance
    }

    pub fn class(&self) -> TypeDescription {
        self.class
    }
}

pub type ObjectHandle<'gc> = Gc<'gc, NativeObject>;

/// Nullable reference to a managed wrapper, compared by reference identity.
#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct ObjectRef<'gc>(pub Option<ObjectHandle<'gc>>);

unsafe impl<'gc> Collect for ObjectRef<'gc> {
    fn trace(&self, cc: &Collection) {
        if let Some(h) = self.0 {
            h.trace(cc);
        }
    }
}

impl PartialEq for ObjectRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(l), Some(r)) => Gc::ptr_eq(l, r),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for ObjectRef<'_> {}

impl Debug for ObjectRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            None => write!(f, "null"),
            Some(h) => write!(f, "{:?}@{:?}", h.class, h.native_instance),
        }
    }
}

impl<'gc> ObjectRef<'gc> {
    pub const NULL: Self = Self(None);

    pub fn new(gc: GCHandle<'gc>, native_instance: NativeIdentity, class: TypeDescription) -> Self {
        Self(Some(Gc::new(gc, NativeObject::new(native_instance, class))))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The wrapped identity, or the null identity for a null reference.
    pub fn native_instance(&self) -> NativeIdentity {
        self.0.map_or(NativeIdentity::NULL, |h| h.native_instance)
    }
}

impl<'gc> From<ObjectHandle<'gc>> for ObjectRef<'gc> {
    fn from(handle: ObjectHandle<'gc>) -> Self {
        Self(Some(handle))
    }
}

/// Arrays of wrapper references, crossing as packed pointer-width native identities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjArrayMarshaler {
    class: TypeDescription,
}

impl ObjArrayMarshaler {
    /// `class` is the wrapper type every decoded element is resolved as.
    pub fn new(class: TypeDescription) -> Self {
        Self { class }
    }

    pub fn class(&self) -> TypeDescription {
        self.class
    }

    /// Writes each element's native identity into its slot; null references become
    /// null identities. The wrappers themselves stay on the managed side.
    pub fn encode<A: NativeAllocator + ?Sized>(&self, allocator: &A, values: &[ObjectRef<'_>]) -> NativeBuffer {
        let mut buffer = allocator.allocate(NativeIdentity::SIZE * values.len());
        for (slot, value) in buffer
            .payload_mut()
            .chunks_exact_mut(NativeIdentity::SIZE)
            .zip(values)
        {
            value.native_instance().write(slot);
        }
        trace!(elements = values.len(), class = ?self.class, "encoded object array");
        buffer
    }

    /// Resolves every slot to its wrapper through `instances`, creating missing ones.
    ///
    /// Fails before resolving anything when `instances` has no capability for this
    /// marshaler's class. The buffer is not released.
    pub fn decode<'gc, R: ManagedInstances<'gc> + ?Sized>(
        &self,
        gc: GCHandle<'gc>,
        instances: &R,
        buffer: &NativeBuffer,
    ) -> Result<Vec<ObjectRef<'gc>>, MarshalError> {
        let count = element_count(buffer.length(), NativeIdentity::SIZE)?;
        if !instances.supports(self.class) {
            warn!(class = ?self.class, "no managed instance capability for wrapper class");
            return Err(MarshalError::MissingCapability {
                type_name: self.class.type_name(),
            });
        }

        let values = buffer
            .payload()
            .chunks_exact(NativeIdentity::SIZE)
            .map(|slot| {
                let identity = NativeIdentity::read(slot);
                if identity.is_null() {
                    return Ok(ObjectRef::NULL);
                }
                let handle = instances
                    .resolve(gc, self.class, identity, true)
                    .ok_or(MarshalError::UnresolvedInstance { identity })?;
                self.check_class(handle)?;
                Ok(ObjectRef::from(handle))
            })
            .collect::<Result<Vec<_>, MarshalError>>()?;
        trace!(elements = count, class = ?self.class, "decoded object array");
        Ok(values)
    }

    /// A live wrapper registered under another class must be this class or derive from it.
    fn check_class(&self, handle: ObjectHandle<'_>) -> Result<(), MarshalError> {
        let found = handle.class();
        if found == self.class || found.is_subclass_of(self.class) {
            return Ok(());
        }
        warn!(
            identity = ?handle.native_instance(),
            expected = ?self.class,
            ?found,
            "live wrapper has an unrelated class"
        );
        Err(MarshalError::ClassMismatch {
            identity: handle.native_instance(),
            expected: self.class.type_name(),
            found: found.type_name(),
        })
    }
}
