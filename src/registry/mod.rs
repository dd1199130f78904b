//! The object/trait registry: what paths, traits and elements a server
//! exposes, plus path aliasing.
//!
//! Mirrors `include/dicey/ipc/registry.h` and `include/dicey/ipc/traits.h`.
//! A path is either a canonical object (with its own set of implemented
//! traits) or an alias resolving to one; the same string is never both.

pub mod builtins;

use crate::error::{DiceyError, Result};
use crate::hashtable::{HashSetResult, Table};
use crate::wire::typedescr::Signature;

/// The three kinds of member a trait can declare, matching
/// `enum dicey_element_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Operation,
    Property,
    Signal,
}

/// One member of a trait: its kind and its value (or `input -> output`)
/// signature. Properties additionally track whether they are read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    pub signature: String,
    pub readonly: bool,
}

impl Element {
    pub fn operation(signature: impl Into<String>) -> Element {
        Element { kind: ElementKind::Operation, signature: signature.into(), readonly: false }
    }

    pub fn property(signature: impl Into<String>, readonly: bool) -> Element {
        Element { kind: ElementKind::Property, signature: signature.into(), readonly }
    }

    pub fn signal(signature: impl Into<String>) -> Element {
        Element { kind: ElementKind::Signal, signature: signature.into(), readonly: false }
    }

    /// Parses this element's signature, failing only if a caller registered
    /// a malformed one -- every registered element's signature is checked
    /// at registration time, so this should never fail in practice.
    pub fn parsed_signature(&self) -> Result<Signature> {
        Signature::parse(&self.signature)
    }
}

/// A named collection of elements, matching `struct dicey_trait`.
#[derive(Debug, Clone, Default)]
pub struct Trait {
    pub name: String,
    elements: Table<Element>,
}

impl Trait {
    pub fn new(name: impl Into<String>) -> Self {
        Trait { name: name.into(), elements: Table::new() }
    }

    pub fn add_element(&mut self, name: impl Into<String>, elem: Element) -> HashSetResult {
        let (result, _old) = self.elements.set(name, elem);
        result
    }

    pub fn get_element(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }

    pub fn contains_element(&self, name: &str) -> bool {
        self.elements.contains(name)
    }

    pub fn elements(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.elements.iter()
    }
}

/// An object: a path that implements one or more traits, matching
/// `struct dicey_object`.
#[derive(Debug, Clone, Default)]
pub struct Object {
    traits: std::collections::HashSet<String>,
}

impl Object {
    pub fn new(traits: impl IntoIterator<Item = String>) -> Self {
        Object { traits: traits.into_iter().collect() }
    }

    pub fn implements(&self, trait_name: &str) -> bool {
        self.traits.contains(trait_name)
    }

    pub fn traits(&self) -> impl Iterator<Item = &str> {
        self.traits.iter().map(|s| s.as_str())
    }
}

/// The registry: the full set of objects, traits and path aliases a server
/// instance exposes. Matches `struct dicey_registry`, with the alias table
/// spec §4.9 adds on top.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    paths: Table<Object>,
    aliases: Table<String>,
    traits: Table<Trait>,
}

impl Registry {
    /// A registry with no objects or traits registered -- callers normally
    /// want [`Registry::with_builtins`] instead.
    pub fn new() -> Self {
        Registry { paths: Table::new(), aliases: Table::new(), traits: Table::new() }
    }

    /// A registry pre-populated with the introspection objects every
    /// server exposes (`/dicey/registry`, `/dicey/server`, and one
    /// `/dicey/registry/traits/<T>` per registered trait as traits are
    /// added). See [`builtins`].
    pub fn with_builtins() -> Self {
        let mut reg = Registry::new();
        builtins::install(&mut reg);
        reg
    }

    pub fn add_trait(&mut self, t: Trait) -> Result<()> {
        if self.traits.contains(&t.name) {
            return Err(DiceyError::Already);
        }
        let name = t.name.clone();
        self.traits.set(name, t);

        // Every trait gets its own introspectable object, once the
        // bootstrap trait describing it is itself available.
        if self.traits.contains(builtins::TRAIT_TRAIT) {
            let obj_path = format!("/dicey/registry/traits/{name}");
            if !self.paths.contains(&obj_path) {
                let _ = self.add_object(obj_path, [builtins::TRAIT_TRAIT.to_string()]);
            }
        }
        Ok(())
    }

    pub fn get_trait(&self, name: &str) -> Option<&Trait> {
        self.traits.get(name)
    }

    pub fn get_trait_mut(&mut self, name: &str) -> Option<&mut Trait> {
        self.traits.get_mut(name)
    }

    pub fn contains_trait(&self, name: &str) -> bool {
        self.traits.contains(name)
    }

    pub fn trait_names(&self) -> impl Iterator<Item = &str> {
        self.traits.keys()
    }

    /// Registers a new object at `path`, implementing `implemented_traits`.
    /// Every named trait must already be registered. `path` must not
    /// already name an object or an alias.
    pub fn add_object<I>(&mut self, path: impl Into<String>, implemented_traits: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let path = path.into();
        if self.paths.contains(&path) || self.aliases.contains(&path) {
            return Err(DiceyError::Already);
        }
        let mut traits: std::collections::HashSet<String> = implemented_traits.into_iter().collect();
        for t in &traits {
            if !self.traits.contains(t) {
                return Err(DiceyError::TraitNotFound);
            }
        }
        // Every object is introspectable, once the trait describing that
        // capability is itself registered (it is not, during bootstrap
        // installation of the builtins themselves).
        if self.traits.contains(builtins::TRAIT_INTROSPECTION) {
            traits.insert(builtins::TRAIT_INTROSPECTION.to_string());
        }
        self.paths.set(path, Object { traits });
        Ok(())
    }

    pub fn contains_object(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn get_object(&self, path: &str) -> Option<&Object> {
        self.paths.get(path)
    }

    pub fn object_paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys()
    }

    /// Removes the object at `path`, along with every alias that resolves
    /// to it.
    pub fn remove_object(&mut self, path: &str) -> Result<Object> {
        let obj = self.paths.remove(path).ok_or(DiceyError::PathNotFound)?;
        let dangling: Vec<String> =
            self.aliases.iter().filter(|(_, target)| *target == path).map(|(alias, _)| alias.to_string()).collect();
        for alias in dangling {
            self.aliases.remove(&alias);
        }
        Ok(obj)
    }

    /// Points `alias` at `canonical`, which must already name a real
    /// object. `alias` must not already name an object or another alias.
    pub fn add_alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Result<()> {
        let alias = alias.into();
        let canonical = canonical.into();
        if self.paths.contains(&alias) || self.aliases.contains(&alias) {
            return Err(DiceyError::Already);
        }
        if !self.paths.contains(&canonical) {
            return Err(DiceyError::PathNotFound);
        }
        self.aliases.set(alias, canonical);
        Ok(())
    }

    /// Removes `alias`, failing with [`DiceyError::PathNotAlias`] if `alias`
    /// is not a registered alias (it may be a real object, or unknown
    /// entirely).
    pub fn remove_alias(&mut self, alias: &str) -> Result<String> {
        self.aliases.remove(alias).ok_or(DiceyError::PathNotAlias)
    }

    /// Resolves `path` to the canonical path of the object it names,
    /// following one alias hop if necessary.
    pub fn resolve_path<'a>(&'a self, path: &'a str) -> Result<&'a str> {
        if self.paths.contains(path) {
            return Ok(path);
        }
        match self.aliases.get(path) {
            Some(canonical) => Ok(canonical.as_str()),
            None => Err(DiceyError::PathNotFound),
        }
    }

    /// Full resolution chain for a `(path, trait, element)` address:
    /// alias -> canonical path -> object -> trait -> element, each step
    /// failing with its own specific error.
    pub fn get_element(&self, path: &str, trait_name: &str, elem: &str) -> Result<&Element> {
        let canonical = self.resolve_path(path)?;
        let object = self.paths.get(canonical).ok_or(DiceyError::PathNotFound)?;
        if !object.implements(trait_name) {
            return Err(DiceyError::TraitNotFound);
        }
        let t = self.traits.get(trait_name).ok_or(DiceyError::TraitNotFound)?;
        t.get_element(elem).ok_or(DiceyError::ElementNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> Registry {
        let mut reg = Registry::new();
        let mut t = Trait::new("counter.Counter");
        t.add_element("Value", Element::property("i", false));
        t.add_element("Tick", Element::signal("i"));
        reg.add_trait(t).unwrap();
        reg.add_object("/counter", ["counter.Counter".to_string()]).unwrap();
        reg
    }

    #[test]
    fn add_object_requires_registered_trait() {
        let mut reg = Registry::new();
        assert!(matches!(
            reg.add_object("/x", ["nope.Nope".to_string()]),
            Err(DiceyError::TraitNotFound)
        ));
    }

    #[test]
    fn get_element_resolution_chain() {
        let reg = sample_registry();
        let elem = reg.get_element("/counter", "counter.Counter", "Value").unwrap();
        assert_eq!(elem.kind, ElementKind::Property);

        assert!(matches!(reg.get_element("/missing", "counter.Counter", "Value"), Err(DiceyError::PathNotFound)));
        assert!(matches!(reg.get_element("/counter", "other.Other", "Value"), Err(DiceyError::TraitNotFound)));
        assert!(matches!(reg.get_element("/counter", "counter.Counter", "Nope"), Err(DiceyError::ElementNotFound)));
    }

    #[test]
    fn alias_resolves_to_canonical_and_can_be_removed() {
        let mut reg = sample_registry();
        reg.add_alias("/counter/alias", "/counter").unwrap();
        assert_eq!(reg.resolve_path("/counter/alias").unwrap(), "/counter");

        let elem = reg.get_element("/counter/alias", "counter.Counter", "Value").unwrap();
        assert_eq!(elem.kind, ElementKind::Property);

        reg.remove_alias("/counter/alias").unwrap();
        assert!(matches!(reg.resolve_path("/counter/alias"), Err(DiceyError::PathNotFound)));
    }

    #[test]
    fn removing_object_drops_its_aliases() {
        let mut reg = sample_registry();
        reg.add_alias("/counter/alias", "/counter").unwrap();
        reg.remove_object("/counter").unwrap();
        assert!(!reg.contains_object("/counter"));
        assert!(matches!(reg.remove_alias("/counter/alias"), Err(DiceyError::PathNotAlias)));
    }

    #[test]
    fn path_cannot_be_both_object_and_alias() {
        let mut reg = sample_registry();
        assert!(matches!(
            reg.add_object("/counter", ["counter.Counter".to_string()]),
            Err(DiceyError::Already)
        ));
        reg.add_alias("/counter/alias", "/counter").unwrap();
        assert!(matches!(reg.add_alias("/counter/alias", "/counter"), Err(DiceyError::Already)));
    }
}
