//! The built-in introspection objects every server exposes: `dicey.Registry`
//! at `/dicey/registry`, one `dicey.Trait` object per registered trait
//! under `/dicey/registry/traits/`, and `dicey.SignalManager` at
//! `/dicey/server`.
//!
//! These mirror the `dicey.*` traits the reference server wires up
//! internally (`src/ipc/server/server-traits.c` in the original), re-derived
//! here from spec §4.9's description of what each must expose.

use super::{Element, ElementKind, Registry, Trait};

pub const TRAIT_REGISTRY: &str = "dicey.Registry";
pub const TRAIT_INTROSPECTION: &str = "dicey.Introspection";
pub const TRAIT_TRAIT: &str = "dicey.Trait";
pub const TRAIT_SIGNAL_MANAGER: &str = "dicey.SignalManager";

pub const PATH_REGISTRY: &str = "/dicey/registry";
pub const PATH_SERVER: &str = "/dicey/server";

/// Installs every built-in trait and object into a fresh registry. Called
/// once by [`super::Registry::with_builtins`].
pub fn install(reg: &mut Registry) {
    install_trait_trait(reg);
    install_registry_trait(reg);
    install_introspection_trait(reg);
    install_signal_manager_trait(reg);

    reg.add_object(PATH_REGISTRY, [TRAIT_REGISTRY.to_string(), TRAIT_INTROSPECTION.to_string()])
        .expect("builtin traits were just registered");
    reg.add_object(PATH_SERVER, [TRAIT_SIGNAL_MANAGER.to_string(), TRAIT_INTROSPECTION.to_string()])
        .expect("builtin traits were just registered");
}

fn install_trait_trait(reg: &mut Registry) {
    let mut t = Trait::new(TRAIT_TRAIT);
    t.add_element("Properties", Element::property("[{ss}]", true));
    t.add_element("Signals", Element::property("[{ss}]", true));
    t.add_element("Operations", Element::property("[{ss}]", true));
    reg.add_trait(t).expect("registered once at bootstrap");
}

fn install_registry_trait(reg: &mut Registry) {
    let mut t = Trait::new(TRAIT_REGISTRY);
    t.add_element("Objects", Element::property("[@]", true));
    t.add_element("Traits", Element::property("[s]", true));
    t.add_element("PathExists", Element::operation("@ -> b"));
    t.add_element("TraitExists", Element::operation("s -> b"));
    t.add_element("ElementExists", Element::operation("{@%} -> b"));
    reg.add_trait(t).expect("registered once at bootstrap");
}

fn install_introspection_trait(reg: &mut Registry) {
    let mut t = Trait::new(TRAIT_INTROSPECTION);
    t.add_element("Data", Element::property("{s[{ss}]}", true));
    reg.add_trait(t).expect("registered once at bootstrap");
}

fn install_signal_manager_trait(reg: &mut Registry) {
    let mut t = Trait::new(TRAIT_SIGNAL_MANAGER);
    // Input is (path, selector) -- the selector is the signal to
    // (un)subscribe to on the path, which may itself be an alias. Subscribe
    // returns Unit if the path was already canonical, or the canonical
    // PATH it was an alias for, per spec §4.9; Unsubscribe returns nothing.
    t.add_element("Subscribe", Element::operation("{@%} -> v"));
    t.add_element("Unsubscribe", Element::operation("{@%} -> $"));
    reg.add_trait(t).expect("registered once at bootstrap");
}

/// All elements exposed by a trait, as `(name, signature)` pairs --
/// `dicey.Trait.Properties`/`Signals`/`Operations` each filter this by
/// [`ElementKind`].
pub fn elements_of_kind<'a>(t: &'a Trait, kind: ElementKind) -> impl Iterator<Item = (&'a str, &'a str)> {
    t.elements().filter(move |(_, e)| e.kind == kind).map(|(name, e)| (name, e.signature.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_builtins_registers_fixed_objects() {
        let reg = Registry::with_builtins();
        assert!(reg.contains_object(PATH_REGISTRY));
        assert!(reg.contains_object(PATH_SERVER));
        assert!(reg.contains_trait(TRAIT_REGISTRY));
        assert!(reg.contains_trait(TRAIT_SIGNAL_MANAGER));
    }

    #[test]
    fn registering_a_trait_creates_its_introspection_object() {
        let mut reg = Registry::with_builtins();
        let mut t = Trait::new("counter.Counter");
        t.add_element("Value", Element::property("i", false));
        reg.add_trait(t).unwrap();

        assert!(reg.contains_object("/dicey/registry/traits/counter.Counter"));
    }

    #[test]
    fn elements_of_kind_filters_correctly() {
        let reg = Registry::with_builtins();
        let t = reg.get_trait(TRAIT_REGISTRY).unwrap();
        let ops: Vec<_> = elements_of_kind(t, ElementKind::Operation).collect();
        assert_eq!(ops.len(), 3);
        let props: Vec<_> = elements_of_kind(t, ElementKind::Property).collect();
        assert_eq!(props.len(), 2);
    }
}
