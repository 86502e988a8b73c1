mod common;

use common::HeapAllocator;
use gc_arena::{Arena, Gc, Rootable};
use interop_rs::{
    marshal::{CustomMarshaler, ManagedValue, MarshalAs, MarshalEnv, Marshaler},
    types::TypeDefinition,
    CLRString, InstanceRegistry, MarshalError, NativeAllocator, NativeBuffer, NativeIdentity,
    ObjArrayMarshaler, ObjectRef, PodArrayMarshaler, Scalar, StringUtf8, StringUtf8Copy,
    ValueArray,
};
use proptest::prelude::*;

type RegistryArena = Arena<Rootable![InstanceRegistry<'_>]>;

/// Simulates a buffer that arrived from native code by address only.
fn from_native(buffer: NativeBuffer) -> NativeBuffer {
    let raw = buffer.into_raw();
    unsafe { NativeBuffer::from_raw(raw) }.unwrap()
}

#[test]
fn native_owned_text_is_never_released_by_decode() {
    let alloc = HeapAllocator::default();
    let buffer = from_native(StringUtf8.encode_str(&alloc, "Urho3D"));

    for _ in 0..3 {
        assert_eq!(StringUtf8.decode(&buffer).unwrap(), CLRString::from("Urho3D"));
    }
    assert_eq!(alloc.live(), 1);
    assert_eq!(alloc.releases(), 0);
    alloc.release(buffer);
}

#[test]
fn release_after_read_frees_exactly_once_on_success_and_failure() {
    let alloc = HeapAllocator::default();
    let decoder = StringUtf8Copy::new();

    let good = from_native(StringUtf8.encode_str(&alloc, "by value"));
    assert_eq!(decoder.decode(&alloc, good).unwrap().as_string(), "by value");

    let mut bad = alloc.allocate(3);
    bad.payload_mut().copy_from_slice(&[0xc3, 0x28, 0]);
    assert!(matches!(decoder.decode(&alloc, bad), Err(MarshalError::InvalidUtf8(_))));

    assert_eq!(alloc.live(), 0);
    assert_eq!(alloc.releases(), 2);
}

#[test]
fn release_after_read_decoders_are_per_thread() {
    let alloc = HeapAllocator::default();
    std::thread::scope(|scope| {
        for worker in 0..4 {
            let alloc = &alloc;
            scope.spawn(move || {
                let decoder = StringUtf8Copy::new();
                for i in 0..50 {
                    let text = format!("worker {worker} message {i}");
                    let buffer = StringUtf8.encode_str(alloc, &text);
                    assert_eq!(decoder.decode(alloc, buffer).unwrap().as_string(), text);
                }
            });
        }
    });
    assert_eq!(alloc.live(), 0);
    assert_eq!(alloc.releases(), 200);
}

#[test]
fn value_array_length_header_is_byte_length() {
    let alloc = HeapAllocator::default();
    let marshaler = PodArrayMarshaler::<[f32; 4]>::new();
    let colors = [[1.0, 0.0, 0.0, 1.0], [0.25, 0.5, 0.75, 1.0]];

    let buffer = marshaler.encode(&alloc, &colors);
    assert_eq!(buffer.length(), 32);
    assert_eq!(marshaler.decode(&buffer).unwrap(), colors);
    alloc.release(buffer);
}

#[test]
fn value_array_rejects_partial_elements() {
    let alloc = HeapAllocator::default();
    let buffer = alloc.allocate(6);
    assert_eq!(
        PodArrayMarshaler::<u32>::new().decode(&buffer),
        Err(MarshalError::MisalignedLength {
            length: 6,
            element_size: 4
        })
    );
    alloc.release(buffer);
}

#[test]
fn object_array_preserves_identity_and_nulls() {
    let alloc = HeapAllocator::default();
    let node = TypeDefinition::new(Some("Urho3D"), "Node").leak();
    let arena = RegistryArena::new(|mc| InstanceRegistry::new(mc).with_class(node));
    let marshaler = ObjArrayMarshaler::new(node);

    arena.mutate(|gc, registry| {
        let mut native = alloc.allocate(3 * NativeIdentity::SIZE);
        for (slot, addr) in native
            .payload_mut()
            .chunks_exact_mut(NativeIdentity::SIZE)
            .zip([0x100usize, 0, 0x100])
        {
            slot.copy_from_slice(&addr.to_ne_bytes());
        }

        let first = marshaler.decode(gc, registry, &native).unwrap();
        let second = marshaler.decode(gc, registry, &native).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first[1].is_null());
        // same native instance maps to the same wrapper, within and across calls
        let (a, b) = (first[0].0.unwrap(), first[2].0.unwrap());
        assert!(Gc::ptr_eq(a, b));
        assert_eq!(first, second);
        assert_eq!(a.native_instance(), NativeIdentity::from_addr(0x100));

        let encoded = marshaler.encode(&alloc, &first);
        assert_eq!(encoded.payload(), native.payload());
        alloc.release(encoded);
        alloc.release(native);
    });
    assert_eq!(alloc.live(), 0);
}

#[test]
fn object_array_without_capability_fails_whole() {
    let alloc = HeapAllocator::default();
    let node = TypeDefinition::new(Some("Urho3D"), "Node").leak();
    let arena = RegistryArena::new(|mc| InstanceRegistry::new(mc));

    arena.mutate(|gc, registry| {
        let values = [ObjectRef::new(gc, NativeIdentity::from_addr(0x200), node)];
        let buffer = ObjArrayMarshaler::new(node).encode(&alloc, &values);
        assert_eq!(
            ObjArrayMarshaler::new(node).decode(gc, registry, &buffer),
            Err(MarshalError::MissingCapability {
                type_name: "Urho3D.Node".to_string()
            })
        );
        assert_eq!(registry.live_count(gc), 0);
        alloc.release(buffer);
    });
}

#[test]
fn marshaler_dispatch_round_trips_every_kind() {
    let alloc = HeapAllocator::default();
    let node = TypeDefinition::new(Some("Urho3D"), "Node").leak();
    let arena = RegistryArena::new(|mc| InstanceRegistry::new(mc).with_class(node));

    arena.mutate(|gc, registry| {
        let env = MarshalEnv {
            gc,
            allocator: &alloc,
            instances: registry,
        };
        let wrapper = ObjectRef::new(gc, NativeIdentity::from_addr(0x300), node);
        let cases = [
            (MarshalAs::Utf8String, ManagedValue::String(CLRString::from("scene"))),
            (
                MarshalAs::PodArray(Scalar::Float64),
                ManagedValue::ValueArray(ValueArray::from_slice(&[0.5f64, -8.0])),
            ),
            (
                MarshalAs::ObjArray(node),
                ManagedValue::ObjectArray(vec![ObjectRef::NULL]),
            ),
        ];
        for (marshal_as, value) in cases {
            let marshaler = Marshaler::for_parameter(marshal_as);
            let buffer = marshaler.marshal_managed_to_native(&env, &value).unwrap();
            let raw = buffer.into_raw();
            let decoded = marshaler
                .marshal_native_to_managed(&env, unsafe { NativeBuffer::from_raw(raw) })
                .unwrap();
            assert_eq!(decoded, value);
            marshaler.clean_up_native_data(&env, unsafe { NativeBuffer::from_raw(raw) }.unwrap());
        }

        // a wrapper created elsewhere is not the registry's wrapper for that address
        let marshaler = Marshaler::for_parameter(MarshalAs::ObjArray(node));
        let value = ManagedValue::ObjectArray(vec![wrapper]);
        let raw = marshaler.marshal_managed_to_native(&env, &value).unwrap().into_raw();
        let ManagedValue::ObjectArray(decoded) = marshaler
            .marshal_native_to_managed(&env, unsafe { NativeBuffer::from_raw(raw) })
            .unwrap()
        else {
            panic!("expected an object array");
        };
        assert_eq!(decoded[0].native_instance(), wrapper.native_instance());
        assert_ne!(decoded[0], wrapper);
        marshaler.clean_up_native_data(&env, unsafe { NativeBuffer::from_raw(raw) }.unwrap());
    });
    assert_eq!(alloc.live(), 0);
}

#[test]
fn release_after_read_marshaler_frees_its_buffer() {
    let alloc = HeapAllocator::default();
    let arena = RegistryArena::new(|mc| InstanceRegistry::new(mc));

    arena.mutate(|gc, registry| {
        let env = MarshalEnv {
            gc,
            allocator: &alloc,
            instances: registry,
        };
        let marshaler = Marshaler::for_parameter(MarshalAs::Utf8StringCopy);
        let value = ManagedValue::String(CLRString::from("returned"));
        let buffer = marshaler.marshal_managed_to_native(&env, &value);
        assert_eq!(marshaler.marshal_native_to_managed(&env, buffer), Ok(value));
    });
    assert_eq!(alloc.live(), 0);
}

proptest! {
    #[test]
    fn text_survives_both_variants(text in "\\PC*") {
        let alloc = HeapAllocator::default();
        let managed = CLRString::from(&text);

        let buffer = StringUtf8.encode(&alloc, &managed);
        prop_assert_eq!(buffer.length() as usize, text.len() + 1);
        prop_assert_eq!(StringUtf8.decode(&buffer).unwrap(), managed.clone());
        prop_assert_eq!(StringUtf8Copy::new().decode(&alloc, buffer).unwrap(), managed);
        prop_assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn value_arrays_copy_verbatim(values in proptest::collection::vec(any::<i64>(), 0..64)) {
        let alloc = HeapAllocator::default();
        let marshaler = PodArrayMarshaler::<i64>::new();

        let buffer = marshaler.encode(&alloc, &values);
        prop_assert_eq!(buffer.length() as usize, values.len() * 8);
        prop_assert_eq!(marshaler.decode(&buffer).unwrap(), values);
        alloc.release(buffer);
    }
}
