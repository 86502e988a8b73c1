use interop_rs::types::{
    members::{Accessibility, Method},
    overrides::OverrideMask,
    TypeDefinition,
};

#[test]
fn script_component_overrides_feed_a_dispatch_mask() {
    let component = TypeDefinition::new(Some("Urho3D"), "LogicComponent")
        .method(Method::new_virtual("Start"))
        .method(Method::new_virtual("Update").with_parameters(["System.Single"]))
        .method(Method::new_virtual("PostUpdate").with_parameters(["System.Single"]))
        .method(
            Method::new_virtual("FixedUpdate")
                .with_parameters(["System.Single"])
                .with_accessibility(Accessibility::Family),
        )
        .leak();
    let script = TypeDefinition::new(Some("Game"), "Spinner")
        .extends(component)
        .method(Method::override_of("Update").with_parameters(["System.Single"]))
        .method(
            Method::override_of("FixedUpdate")
                .with_parameters(["System.Single"])
                .with_accessibility(Accessibility::Family),
        )
        .method(Method::new_virtual("PostUpdate").with_parameters(["System.Single"]))
        .leak();

    let slots: Vec<_> = component.methods().collect();
    let mask = OverrideMask::compute(script, &slots);

    assert_eq!(mask.overridden_slots().collect::<Vec<_>>(), vec![1, 3]);
    assert!(mask.any());
    assert!(!OverrideMask::compute(component, &slots).any());

    // repeated queries give the same answer
    for _ in 0..3 {
        assert!(script.has_override("Update", &["System.Single"]));
        assert!(!script.has_override("PostUpdate", &["System.Single"]));
    }
}
