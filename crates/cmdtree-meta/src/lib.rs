//! Typed metadata attached to registered commands.
//!
//! A [`CommandMeta`] is assembled once through a [`Builder`] and is immutable
//! afterwards; one instance is shared by every node a command is reachable
//! through. Values are looked up with a typed [`Key`]. A key may carry a
//! fallback derivation that is evaluated lazily when the key has no value.
//!
//! The engine itself only consults [`HIDDEN_FROM`] (and the legacy [`HIDDEN`]
//! switch) to decide where a command is visible.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A place where a command or node can be displayed or hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    /// Suggestions while typing a command.
    Suggestions,
    /// Help menus and command listings.
    Help,
}

impl Location {
    pub const ALL: [Location; 2] = [Location::Suggestions, Location::Help];

    /// Stable index, for per-location counters.
    pub const fn index(self) -> usize {
        match self {
            Location::Suggestions => 0,
            Location::Help => 1,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Suggestions => f.write_str("suggestions"),
            Location::Help => f.write_str("help"),
        }
    }
}

/// Runtime representation of a value type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
}

impl TypeToken {
    pub fn of<V: 'static>() -> Self {
        Self {
            id: TypeId::of::<V>(),
            name: std::any::type_name::<V>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Computes a value for a key that has none, from the rest of the meta.
pub type Fallback<V> = fn(&MetaView<'_>) -> Option<V>;

/// A typed key into a [`CommandMeta`].
///
/// The value type is part of the key, so the same name can never be read back
/// as a different type. Rust generics are always fully parameterised, which
/// rules out raw (erased) value types by construction.
pub struct Key<V> {
    name: Cow<'static, str>,
    fallback: Option<Fallback<V>>,
    _value: PhantomData<fn() -> V>,
}

impl<V: 'static> Key<V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            fallback: None,
            _value: PhantomData,
        }
    }

    pub const fn with_fallback(name: &'static str, fallback: Fallback<V>) -> Self {
        Self {
            name: Cow::Borrowed(name),
            fallback: Some(fallback),
            _value: PhantomData,
        }
    }

    /// Key with a name only known at runtime.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            fallback: None,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> TypeToken {
        TypeToken::of::<V>()
    }

    pub fn fallback(&self) -> Option<Fallback<V>> {
        self.fallback
    }
}

impl<V> Clone for Key<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fallback: self.fallback,
            _value: PhantomData,
        }
    }
}

impl<V: 'static> fmt::Debug for Key<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("type", &self.value_type())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

pub static DESCRIPTION: Key<String> = Key::new("description");

pub static LONG_DESCRIPTION: Key<String> = Key::new("long-description");

/// Locations where a command should not be displayed. Empty when absent.
pub static HIDDEN_FROM: Key<BTreeSet<Location>> =
    Key::with_fallback("cmdtree:hidden_from", no_locations);

/// Legacy all-or-nothing switch. Derived from [`HIDDEN_FROM`] when absent:
/// a command hidden from every location counts as hidden.
pub static HIDDEN: Key<bool> = Key::with_fallback("cmdtree:hidden", hidden_everywhere);

fn no_locations(_: &MetaView<'_>) -> Option<BTreeSet<Location>> {
    Some(BTreeSet::new())
}

fn hidden_everywhere(meta: &MetaView<'_>) -> Option<bool> {
    let hidden = meta.get(&HIDDEN_FROM)?;
    Some(Location::ALL.iter().all(|loc| hidden.contains(loc)))
}

#[derive(Clone)]
struct Entry {
    token: TypeToken,
    value: Arc<dyn Any + Send + Sync>,
}

/// Immutable metadata of one command.
#[derive(Clone, Default)]
pub struct CommandMeta {
    values: Arc<BTreeMap<String, Entry>>,
}

impl CommandMeta {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the value for `key`, deriving it through the key's fallback when
    /// no value was stored.
    pub fn get<V: Clone + 'static>(&self, key: &Key<V>) -> Option<V> {
        self.resolve(key, &[])
    }

    pub fn get_or_default<V: Clone + 'static>(&self, key: &Key<V>, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Whether a value was stored for `key` (fallbacks are not consulted).
    pub fn contains<V: 'static>(&self, key: &Key<V>) -> bool {
        self.values
            .get(key.name())
            .is_some_and(|entry| entry.token == TypeToken::of::<V>())
    }

    /// Names of stored keys with their value types, in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, TypeToken)> + '_ {
        self.values
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.token))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the command should be kept out of `location`.
    pub fn is_hidden_from(&self, location: Location) -> bool {
        self.get_or_default(&HIDDEN_FROM, BTreeSet::new())
            .contains(&location)
            || self.get(&HIDDEN).unwrap_or(false)
    }

    fn resolve<V: Clone + 'static>(&self, key: &Key<V>, deriving: &[String]) -> Option<V> {
        if let Some(entry) = self.values.get(key.name()) {
            if entry.token == TypeToken::of::<V>() {
                return entry.value.downcast_ref::<V>().cloned();
            }
        }

        // A fallback never observes the key it is deriving, directly or
        // through another key's fallback.
        if deriving.iter().any(|name| name == key.name()) {
            return None;
        }
        let fallback = key.fallback?;
        let mut chain = deriving.to_vec();
        chain.push(key.name().to_string());
        fallback(&MetaView {
            meta: self,
            deriving: chain,
        })
    }
}

impl fmt::Debug for CommandMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

/// Read access handed to fallback derivations.
pub struct MetaView<'a> {
    meta: &'a CommandMeta,
    deriving: Vec<String>,
}

impl MetaView<'_> {
    pub fn get<V: Clone + 'static>(&self, key: &Key<V>) -> Option<V> {
        self.meta.resolve(key, &self.deriving)
    }

    pub fn get_or_default<V: Clone + 'static>(&self, key: &Key<V>, default: V) -> V {
        self.get(key).unwrap_or(default)
    }
}

/// Collects values before the meta is frozen.
#[derive(Default)]
pub struct Builder {
    values: BTreeMap<String, Entry>,
}

impl Builder {
    pub fn with<V: Send + Sync + 'static>(mut self, key: &Key<V>, value: V) -> Self {
        self.values.insert(
            key.name().to_string(),
            Entry {
                token: TypeToken::of::<V>(),
                value: Arc::new(value),
            },
        );
        self
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.with(&DESCRIPTION, description.into())
    }

    pub fn hidden_from(self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.with(&HIDDEN_FROM, locations.into_iter().collect::<BTreeSet<_>>())
    }

    /// Copy every stored value of `other`; values set later win.
    pub fn with_all(mut self, other: &CommandMeta) -> Self {
        for (name, entry) in other.values.iter() {
            self.values.insert(name.clone(), entry.clone());
        }
        self
    }

    pub fn build(self) -> CommandMeta {
        CommandMeta {
            values: Arc::new(self.values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static RETRIES: Key<u32> = Key::new("retries");
    static LABEL: Key<String> = Key::with_fallback("label", label_from_description);
    static LOOP_A: Key<String> = Key::with_fallback("loop-a", from_loop_b);
    static LOOP_B: Key<String> = Key::with_fallback("loop-b", from_loop_a);

    fn label_from_description(meta: &MetaView<'_>) -> Option<String> {
        meta.get(&DESCRIPTION).map(|d| format!("[{d}]"))
    }

    fn from_loop_b(meta: &MetaView<'_>) -> Option<String> {
        meta.get(&LOOP_B).map(|v| format!("a:{v}"))
    }

    fn from_loop_a(meta: &MetaView<'_>) -> Option<String> {
        meta.get(&LOOP_A).map(|v| format!("b:{v}"))
    }

    #[test]
    fn stored_values_are_returned_by_type() {
        let meta = CommandMeta::builder()
            .with(&RETRIES, 3)
            .description("Send a message")
            .build();

        assert_eq!(meta.get(&RETRIES), Some(3));
        assert_eq!(meta.get(&DESCRIPTION).as_deref(), Some("Send a message"));
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn mismatched_type_reads_as_absent() {
        let meta = CommandMeta::builder().with(&RETRIES, 3).build();
        let wrong: Key<String> = Key::named("retries");
        assert_eq!(meta.get(&wrong), None);
        assert!(!meta.contains(&wrong));
        assert!(meta.contains(&RETRIES));
    }

    #[test]
    fn fallback_is_derived_only_on_miss() {
        let derived = CommandMeta::builder().description("ping").build();
        assert_eq!(derived.get(&LABEL).as_deref(), Some("[ping]"));

        let stored = CommandMeta::builder()
            .description("ping")
            .with(&LABEL, "explicit".to_string())
            .build();
        assert_eq!(stored.get(&LABEL).as_deref(), Some("explicit"));

        assert_eq!(CommandMeta::empty().get(&LABEL), None);
        assert_eq!(
            CommandMeta::empty().get_or_default(&LABEL, "none".to_string()),
            "none"
        );
    }

    #[test]
    fn fallback_cycles_terminate() {
        let meta = CommandMeta::empty();
        assert_eq!(meta.get(&LOOP_A), None);

        let seeded = CommandMeta::builder()
            .with(&LOOP_B, "x".to_string())
            .build();
        assert_eq!(seeded.get(&LOOP_A).as_deref(), Some("a:x"));
    }

    #[test]
    fn hidden_from_defaults_to_visible_everywhere() {
        let meta = CommandMeta::empty();
        assert_eq!(meta.get(&HIDDEN_FROM), Some(BTreeSet::new()));
        assert_eq!(meta.get(&HIDDEN), Some(false));
        assert!(!meta.is_hidden_from(Location::Suggestions));
        assert!(!meta.is_hidden_from(Location::Help));
    }

    #[test]
    fn hidden_is_derived_from_locations() {
        let partial = CommandMeta::builder()
            .hidden_from([Location::Help])
            .build();
        assert_eq!(partial.get(&HIDDEN), Some(false));
        assert!(partial.is_hidden_from(Location::Help));
        assert!(!partial.is_hidden_from(Location::Suggestions));

        let full = CommandMeta::builder().hidden_from(Location::ALL).build();
        assert_eq!(full.get(&HIDDEN), Some(true));

        let legacy = CommandMeta::builder().with(&HIDDEN, true).build();
        assert!(legacy.is_hidden_from(Location::Suggestions));
        assert!(legacy.is_hidden_from(Location::Help));
    }

    #[test]
    fn builder_copies_other_meta() {
        let base = CommandMeta::builder().with(&RETRIES, 1).build();
        let merged = CommandMeta::builder()
            .with_all(&base)
            .description("merged")
            .build();
        assert_eq!(merged.get(&RETRIES), Some(1));
        assert_eq!(
            merged.entries().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["description", "retries"]
        );
    }

    #[test]
    fn location_serializes_kebab_case() {
        let json = serde_json::to_string(&Location::Suggestions).unwrap();
        assert_eq!(json, "\"suggestions\"");
        let back: Location = serde_json::from_str("\"help\"").unwrap();
        assert_eq!(back, Location::Help);
    }
}
