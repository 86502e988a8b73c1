//! Boundary self-check run by the command line tool against a real native allocator.

use crate::{
    array::PodArrayMarshaler,
    buffer::NativeAllocator,
    object::{NativeIdentity, ObjArrayMarshaler, ObjectRef},
    registry::{InstanceRegistry, ManagedInstances},
    string::{CLRString, StringUtf8, StringUtf8Copy},
    types::TypeDefinition,
};
use gc_arena::{Arena, Rootable};
use std::fmt::{Display, Formatter};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeCheck {
    pub name: &'static str,
    pub outcome: Result<(), String>,
}

impl ProbeCheck {
    fn new(name: &'static str, outcome: Result<(), String>) -> Self {
        match &outcome {
            Ok(()) => info!(check = name, "passed"),
            Err(reason) => info!(check = name, %reason, "failed"),
        }
        Self { name, outcome }
    }

    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl Display for ProbeCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            Ok(()) => write!(f, "ok    {}", self.name),
            Err(reason) => write!(f, "FAIL  {}: {reason}", self.name),
        }
    }
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(actual: T, expected: T) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected:?}, got {actual:?}"))
    }
}

/// Pushes `text`, a small value array and an object array through `allocator`
/// and reads each back.
pub fn probe_allocator(allocator: &dyn NativeAllocator, text: &str) -> Vec<ProbeCheck> {
    let mut checks = vec![];
    let managed = CLRString::from(text);

    let buffer = StringUtf8.encode(allocator, &managed);
    let outcome = expect_eq(buffer.length() as usize, text.len() + 1)
        .and_then(|_| StringUtf8.decode(&buffer).map_err(|e| e.to_string()))
        .and_then(|decoded| expect_eq(decoded, managed.clone()));
    allocator.release(buffer);
    checks.push(ProbeCheck::new("utf-8 text, native owned", outcome));

    let buffer = StringUtf8.encode(allocator, &managed);
    let outcome = StringUtf8Copy::new()
        .decode(allocator, buffer)
        .map_err(|e| e.to_string())
        .and_then(|decoded| expect_eq(decoded, managed));
    checks.push(ProbeCheck::new("utf-8 text, released after read", outcome));

    let values = [1i32, -2, 3, i32::MAX];
    let marshaler = PodArrayMarshaler::<i32>::new();
    let buffer = marshaler.encode(allocator, &values);
    let outcome = marshaler
        .decode(&buffer)
        .map_err(|e| e.to_string())
        .and_then(|decoded| expect_eq(decoded.as_slice(), values.as_slice()));
    allocator.release(buffer);
    checks.push(ProbeCheck::new("value array", outcome));

    checks.push(ProbeCheck::new("object array", probe_object_array(allocator)));
    checks
}

fn probe_object_array(allocator: &dyn NativeAllocator) -> Result<(), String> {
    let class = TypeDefinition::new(Some("Probe"), "Component").leak();
    let arena =
        Arena::<Rootable![InstanceRegistry<'_>]>::new(|mc| InstanceRegistry::new(mc).with_class(class));
    let marshaler = ObjArrayMarshaler::new(class);

    arena.mutate(|gc, registry| {
        // identities are never dereferenced, so any distinct addresses will do
        let first = ObjectRef(registry.resolve(gc, class, NativeIdentity::from_addr(0x1000), true));
        let second = ObjectRef(registry.resolve(gc, class, NativeIdentity::from_addr(0x2000), true));
        let values = [first, ObjectRef::NULL, second];

        let buffer = marshaler.encode(allocator, &values);
        let outcome = marshaler
            .decode(gc, registry, &buffer)
            .map_err(|e| e.to_string())
            .and_then(|decoded| expect_eq(decoded.as_slice(), values.as_slice()));
        allocator.release(buffer);
        outcome
    })
}
