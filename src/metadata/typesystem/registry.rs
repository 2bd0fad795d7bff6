//! Central type registry.
//!
//! This module provides the [`TypeRegistry`], a thread-safe registry owning every type
//! descriptor for the lifetime of the process. It serves as the single source of type identity:
//! mapping caches, compiled artifacts and runtime values refer to types by [`Token`] and resolve
//! them here.
//!
//! # Registry Architecture
//!
//! - **Token-based lookup**: Primary index, a lock-free `SkipMap`
//! - **Name-based lookup**: Secondary index by full name (`DashMap`)
//! - **Constructed types**: `Nullable<T>`, sequences and key/value pairs are interned, asking
//!   for `List<Order>` twice yields the very same descriptor
//! - **Primitives**: pre-registered under reserved tokens
//!
//! # Thread Safety
//!
//! - Lock-free data structures for primary storage (`SkipMap`)
//! - Concurrent hash maps for indices (`DashMap`)
//! - Atomic operations for token generation
//!
//! # Examples
//!
//! ```rust
//! use dotmapper::metadata::typesystem::{PrimitiveKind, TypeRegistry};
//!
//! let registry = TypeRegistry::new();
//! let int = registry.primitive(PrimitiveKind::I4);
//!
//! let first = registry.list_of(&int);
//! let second = registry.list_of(&int);
//! assert_eq!(first.token, second.token);
//! assert_eq!(first.fullname(), "System.Collections.Generic.List<System.Int32>");
//! ```

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use strum::IntoEnumIterator;

use crate::metadata::{
    member::{MemberFlags, MemberKind},
    token::{Token, TABLE_TYPESPEC},
    typesystem::{
        MapType, MapTypeRc, PrimitiveKind, SequenceKind, TypeFlags, TypeFlavor, TypeRef,
        Visibility,
    },
};

/// Interning key of constructed types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstructedKey {
    Nullable(Token),
    Sequence(SequenceKind, Token),
    Dictionary(Token, Token),
    KeyValuePair(Token, Token),
}

/// Central registry for all types known to the mapping engine
pub struct TypeRegistry {
    /// Primary storage, token to descriptor
    types: SkipMap<Token, MapTypeRc>,
    /// Full name index
    fullnames: DashMap<String, Token>,
    /// Interned constructed types
    constructed: DashMap<ConstructedKey, MapTypeRc>,
    /// Pre-registered primitives, in `PrimitiveKind` declaration order
    primitives: Vec<MapTypeRc>,
    /// Next free row for user-declared types
    next_typedef: AtomicU32,
    /// Next free row for constructed types
    next_typespec: AtomicU32,
}

impl TypeRegistry {
    /// Create a new registry with all primitives registered
    #[must_use]
    pub fn new() -> Self {
        let primitives: Vec<MapTypeRc> = PrimitiveKind::iter()
            .map(|kind| {
                Arc::new(MapType::new(
                    kind.token(),
                    TypeFlavor::Primitive(kind),
                    kind.namespace(),
                    kind.name(),
                    Visibility::Public,
                    TypeFlags::DEFAULT_CTOR | TypeFlags::SEALED,
                    Vec::new(),
                ))
            })
            .collect();

        let registry = TypeRegistry {
            types: SkipMap::new(),
            fullnames: DashMap::new(),
            constructed: DashMap::new(),
            primitives,
            next_typedef: AtomicU32::new(1),
            next_typespec: AtomicU32::new(1),
        };

        for primitive in &registry.primitives {
            registry.insert(primitive);
        }

        registry
    }

    /// Allocate the next free token of `table`
    ///
    /// ## Arguments
    /// * 'table' - `TABLE_TYPEDEF` for user types, `TABLE_TYPESPEC` for constructed types
    pub fn next_token(&self, table: u8) -> Token {
        let row = if table == TABLE_TYPESPEC {
            self.next_typespec.fetch_add(1, Ordering::Relaxed)
        } else {
            self.next_typedef.fetch_add(1, Ordering::Relaxed)
        };
        Token::from_parts(table, row)
    }

    /// Insert a new type into the registry
    ///
    /// ## Arguments
    /// * 'new_type' - The type to insert
    pub fn insert(&self, new_type: &MapTypeRc) {
        self.fullnames.insert(new_type.fullname(), new_type.token);
        self.types.insert(new_type.token, new_type.clone());
    }

    /// Get a type by its token
    #[must_use]
    pub fn get(&self, token: &Token) -> Option<MapTypeRc> {
        self.types.get(token).map(|entry| entry.value().clone())
    }

    /// Get a type by its full name (`Namespace.Name`)
    #[must_use]
    pub fn get_by_fullname(&self, fullname: &str) -> Option<MapTypeRc> {
        let token = *self.fullnames.get(fullname)?;
        self.get(&token)
    }

    /// Get a built-in primitive
    #[must_use]
    pub fn primitive(&self, kind: PrimitiveKind) -> MapTypeRc {
        self.primitives[kind as usize].clone()
    }

    /// Shortcut for `System.Object`
    #[must_use]
    pub fn object(&self) -> MapTypeRc {
        self.primitive(PrimitiveKind::Object)
    }

    /// Shortcut for `System.String`
    #[must_use]
    pub fn string(&self) -> MapTypeRc {
        self.primitive(PrimitiveKind::String)
    }

    /// `Nullable<T>`. Reference types and nullables are already nullable and returned as-is.
    pub fn nullable_of(&self, inner: &MapTypeRc) -> MapTypeRc {
        if inner.accepts_null() {
            return inner.clone();
        }

        self.intern(ConstructedKey::Nullable(inner.token), || {
            let ty = MapType::new(
                self.next_token(TABLE_TYPESPEC),
                TypeFlavor::Nullable,
                "System",
                format!("Nullable<{}>", inner.fullname()),
                Visibility::Public,
                TypeFlags::DEFAULT_CTOR | TypeFlags::SEALED,
                vec![TypeRef::new(inner)],
            );
            Arc::new(ty)
        })
    }

    /// `T[]`
    pub fn array_of(&self, element: &MapTypeRc) -> MapTypeRc {
        self.sequence_of(SequenceKind::Array, element)
    }

    /// `List<T>`
    pub fn list_of(&self, element: &MapTypeRc) -> MapTypeRc {
        self.sequence_of(SequenceKind::List, element)
    }

    /// `ReadOnlyCollection<T>`
    pub fn fixed_list_of(&self, element: &MapTypeRc) -> MapTypeRc {
        self.sequence_of(SequenceKind::FixedList, element)
    }

    /// `IEnumerable<T>`
    pub fn enumerable_of(&self, element: &MapTypeRc) -> MapTypeRc {
        self.sequence_of(SequenceKind::Enumerable, element)
    }

    /// A single-argument sequence type of the given kind.
    ///
    /// For `SequenceKind::Dictionary` the element is treated as the value type with `Object`
    /// keys; use [`TypeRegistry::dictionary_of`] to choose the key type.
    pub fn sequence_of(&self, kind: SequenceKind, element: &MapTypeRc) -> MapTypeRc {
        if kind == SequenceKind::Dictionary {
            return self.dictionary_of(&self.object(), element);
        }

        let enumerable = (kind != SequenceKind::Enumerable).then(|| self.enumerable_of(element));

        self.intern(ConstructedKey::Sequence(kind, element.token), || {
            let (namespace, name) = match kind {
                SequenceKind::Array => (element.namespace.clone(), format!("{}[]", element.name)),
                SequenceKind::List => (
                    "System.Collections.Generic".to_string(),
                    format!("List<{}>", element.fullname()),
                ),
                SequenceKind::FixedList => (
                    "System.Collections.ObjectModel".to_string(),
                    format!("ReadOnlyCollection<{}>", element.fullname()),
                ),
                _ => (
                    "System.Collections.Generic".to_string(),
                    format!("IEnumerable<{}>", element.fullname()),
                ),
            };
            let flags = match kind {
                SequenceKind::Enumerable => TypeFlags::ABSTRACT,
                _ => TypeFlags::DEFAULT_CTOR,
            };

            let ty = Arc::new(MapType::new(
                self.next_token(TABLE_TYPESPEC),
                TypeFlavor::Sequence(kind),
                namespace,
                name,
                Visibility::Public,
                flags,
                vec![TypeRef::new(element)],
            ));
            ty.set_enumerates(element);
            if let Some(enumerable) = &enumerable {
                ty.interfaces.push(TypeRef::new(enumerable));
            }
            ty
        })
    }

    /// `KeyValuePair<K, V>`, a value type with `Key` and `Value` members
    pub fn key_value_pair_of(&self, key: &MapTypeRc, value: &MapTypeRc) -> MapTypeRc {
        self.intern(ConstructedKey::KeyValuePair(key.token, value.token), || {
            let ty = Arc::new(MapType::new(
                self.next_token(TABLE_TYPESPEC),
                TypeFlavor::KeyValuePair,
                "System.Collections.Generic",
                format!("KeyValuePair<{}, {}>", key.fullname(), value.fullname()),
                Visibility::Public,
                TypeFlags::DEFAULT_CTOR | TypeFlags::SEALED,
                vec![TypeRef::new(key), TypeRef::new(value)],
            ));
            ty.add_member(
                "Key",
                key,
                MemberKind::Property,
                MemberFlags::default(),
                Visibility::Public,
            );
            ty.add_member(
                "Value",
                value,
                MemberKind::Property,
                MemberFlags::default(),
                Visibility::Public,
            );
            ty
        })
    }

    /// `Dictionary<K, V>`, enumerating `KeyValuePair<K, V>`
    pub fn dictionary_of(&self, key: &MapTypeRc, value: &MapTypeRc) -> MapTypeRc {
        let pair = self.key_value_pair_of(key, value);
        let enumerable = self.enumerable_of(&pair);

        self.intern(ConstructedKey::Dictionary(key.token, value.token), || {
            let ty = Arc::new(MapType::new(
                self.next_token(TABLE_TYPESPEC),
                TypeFlavor::Sequence(SequenceKind::Dictionary),
                "System.Collections.Generic",
                format!("Dictionary<{}, {}>", key.fullname(), value.fullname()),
                Visibility::Public,
                TypeFlags::DEFAULT_CTOR,
                vec![TypeRef::new(key), TypeRef::new(value)],
            ));
            ty.set_enumerates(&pair);
            ty.interfaces.push(TypeRef::new(&enumerable));
            ty
        })
    }

    /// Returns the interned type for `key`, creating and registering it with `create` if needed.
    ///
    /// `create` runs while the interning shard is locked and must not intern other types.
    fn intern<F>(&self, key: ConstructedKey, create: F) -> MapTypeRc
    where
        F: FnOnce() -> MapTypeRc,
    {
        if let Some(existing) = self.constructed.get(&key) {
            return existing.value().clone();
        }

        self.constructed
            .entry(key)
            .or_insert_with(|| {
                let new_type = create();
                self.insert(&new_type);
                new_type
            })
            .value()
            .clone()
    }

    /// Returns the number of types in the registry
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if there are no types in the registry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns an iterator over all types in the registry
    pub fn iter(&self) -> crossbeam_skiplist::map::Iter<'_, Token, MapTypeRc> {
        self.types.iter()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_registered() {
        let registry = TypeRegistry::new();
        for kind in PrimitiveKind::iter() {
            let ty = registry.primitive(kind);
            assert_eq!(ty.token, kind.token());
            assert_eq!(registry.get(&kind.token()).unwrap().token, kind.token());
        }
        assert!(registry.get_by_fullname("System.Int32").is_some());
        assert_eq!(registry.len(), PrimitiveKind::iter().count());
    }

    #[test]
    fn test_constructed_types_are_interned() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);

        assert_eq!(registry.array_of(&int).token, registry.array_of(&int).token);
        assert_ne!(registry.array_of(&int).token, registry.list_of(&int).token);
        assert_eq!(
            registry.nullable_of(&int).token,
            registry.nullable_of(&int).token
        );
        assert!(registry.array_of(&int).token.is_constructed());
    }

    #[test]
    fn test_nullable_of_reference_type_is_identity() {
        let registry = TypeRegistry::new();
        let string = registry.string();
        assert_eq!(registry.nullable_of(&string).token, string.token);

        let int = registry.primitive(PrimitiveKind::I4);
        let nullable = registry.nullable_of(&int);
        assert_eq!(registry.nullable_of(&nullable).token, nullable.token);
        assert_eq!(nullable.nullable_inner().unwrap().token, int.token);
    }

    #[test]
    fn test_dictionary_enumerates_pairs() {
        let registry = TypeRegistry::new();
        let string = registry.string();
        let int = registry.primitive(PrimitiveKind::I4);
        let dictionary = registry.dictionary_of(&string, &int);
        let pair = dictionary.enumerates().unwrap();

        assert_eq!(pair.flavor, TypeFlavor::KeyValuePair);
        assert!(pair.member("Key", false).is_some());
        assert!(pair.member("Value", false).is_some());
        assert_eq!(pair.token, registry.key_value_pair_of(&string, &int).token);
    }

    #[test]
    fn test_list_implements_enumerable() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);
        let list = registry.list_of(&int);
        let enumerable = registry.enumerable_of(&int);

        assert!(list.is_assignable_to(&enumerable));
        assert!(!enumerable.is_assignable_to(&list));
    }

    #[test]
    fn test_concurrent_interning() {
        use rayon::prelude::*;

        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);
        let tokens: Vec<Token> = (0..64)
            .into_par_iter()
            .map(|_| registry.list_of(&int).token)
            .collect();

        assert!(tokens.windows(2).all(|w| w[0] == w[1]));
    }
}
