use std::sync::{Arc, Weak};

use bitflags::bitflags;

use crate::{
    metadata::{
        token::Token,
        typesystem::{MapType, MapTypeRc, PrimitiveKind},
    },
    Error, Result,
};

/// A smart reference to a `MapType` that holds a weak reference, so that self-referential
/// type graphs (`Node { Children: List<Node> }`) don't leak, while still remembering the
/// token of the referenced type for diagnostics.
#[derive(Clone, Debug)]
pub struct TypeRef {
    token: Token,
    weak_ref: Weak<MapType>,
}

impl TypeRef {
    /// Create a new `TypeRef` from a strong reference
    pub fn new(strong_ref: &MapTypeRc) -> Self {
        Self {
            token: strong_ref.token,
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the type, returning None if the type has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<MapTypeRc> {
        self.weak_ref.upgrade()
    }

    /// Get a strong reference to the type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the owning registry has been dropped.
    pub fn get(&self) -> Result<MapTypeRc> {
        self.weak_ref.upgrade().ok_or(Error::TypeNotFound(self.token))
    }

    /// The token of the referenced type, available even if the type was dropped
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Check if the referenced type is still alive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak_ref.strong_count() > 0
    }
}

impl From<&MapTypeRc> for TypeRef {
    fn from(strong_ref: &MapTypeRc) -> Self {
        Self::new(strong_ref)
    }
}

/// Visibility of a type or member.
///
/// Only fully public surface may be bound by the emitted backend; any plan touching
/// something else stays on the interpreted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Visible to everyone
    #[default]
    Public,
    /// Visible inside the declaring assembly only
    Internal,
    /// Visible inside the declaring type only
    Private,
    /// A public type nested inside another type
    NestedPublic,
    /// A non-public type nested inside another type
    NestedPrivate,
}

impl Visibility {
    /// Returns `true` when the surface is reachable from outside its declaring scope
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public | Visibility::NestedPublic)
    }
}

/// The shape of a sequence type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum SequenceKind {
    /// `T[]` - fixed size, indexable
    Array,
    /// `ReadOnlyCollection<T>` - fixed size, indexable
    FixedList,
    /// `List<T>` - growable, indexable
    List,
    /// `IEnumerable<T>` - cursor access only
    Enumerable,
    /// `Dictionary<K, V>` - growable, enumerates `KeyValuePair<K, V>`
    Dictionary,
}

impl SequenceKind {
    /// Sequences with a direct index accessor
    #[must_use]
    pub fn is_indexable(&self) -> bool {
        matches!(
            self,
            SequenceKind::Array | SequenceKind::FixedList | SequenceKind::List
        )
    }

    /// Sequences whose size must be known at allocation time
    #[must_use]
    pub fn is_fixed_size(&self) -> bool {
        matches!(self, SequenceKind::Array | SequenceKind::FixedList)
    }

    /// Sequences exposing a direct length/count property
    #[must_use]
    pub fn has_direct_count(&self) -> bool {
        !matches!(self, SequenceKind::Enumerable)
    }
}

/// Represents type flavors in the type system
#[derive(Debug, Clone, PartialEq)]
pub enum TypeFlavor {
    /// Built-in primitive (numeric, char, bool, decimal, string, object, datetime)
    Primitive(PrimitiveKind),
    /// Enumeration with its underlying integral representation
    Enum {
        /// The underlying integral kind
        underlying: PrimitiveKind,
    },
    /// `Nullable<T>`, the wrapped type is the first generic argument
    Nullable,
    /// A sequence type, element (or key and value) types are the generic arguments
    Sequence(SequenceKind),
    /// `KeyValuePair<K, V>`
    KeyValuePair,
    /// Reference type with members
    Class,
    /// Value type with members
    ValueType,
    /// Interface with members
    Interface,
}

impl TypeFlavor {
    /// Check if this is a primitive type
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeFlavor::Primitive(_))
    }

    /// Check if this is a value type
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeFlavor::Primitive(kind) => kind.is_value_type(),
            TypeFlavor::Enum { .. }
            | TypeFlavor::Nullable
            | TypeFlavor::KeyValuePair
            | TypeFlavor::ValueType => true,
            _ => false,
        }
    }

    /// Check if this is a reference type
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        match self {
            TypeFlavor::Primitive(kind) => !kind.is_value_type(),
            TypeFlavor::Sequence(_) | TypeFlavor::Class | TypeFlavor::Interface => true,
            _ => false,
        }
    }

    /// Check if values of this flavor carry named members
    #[must_use]
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            TypeFlavor::Class
                | TypeFlavor::ValueType
                | TypeFlavor::Interface
                | TypeFlavor::KeyValuePair
        )
    }

    /// Try to get the primitive kind if this is a primitive type
    #[must_use]
    pub fn to_primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            TypeFlavor::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }
}

bitflags! {
    /// Type level attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u32 {
        /// The type can not be instantiated
        const ABSTRACT = 0x0001;
        /// The type exposes a public zero-argument constructor
        const DEFAULT_CTOR = 0x0002;
        /// The non-generic `IEnumerable` marker interface
        const UNTYPED_ENUMERABLE = 0x0004;
        /// Sealed, nothing may derive from it
        const SEALED = 0x0008;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_categories() {
        assert!(TypeFlavor::Primitive(PrimitiveKind::I4).is_value_type());
        assert!(TypeFlavor::Primitive(PrimitiveKind::String).is_reference_type());
        assert!(TypeFlavor::Nullable.is_value_type());
        assert!(TypeFlavor::Sequence(SequenceKind::List).is_reference_type());
        assert!(TypeFlavor::ValueType.is_complex());
        assert!(!TypeFlavor::Sequence(SequenceKind::Array).is_complex());
    }

    #[test]
    fn test_sequence_kind_shape() {
        assert!(SequenceKind::Array.is_fixed_size());
        assert!(SequenceKind::List.is_indexable());
        assert!(!SequenceKind::Enumerable.is_indexable());
        assert!(!SequenceKind::Enumerable.has_direct_count());
        assert!(SequenceKind::Dictionary.has_direct_count());
    }

    #[test]
    fn test_visibility() {
        assert!(Visibility::Public.is_public());
        assert!(Visibility::NestedPublic.is_public());
        assert!(!Visibility::Internal.is_public());
        assert!(!Visibility::NestedPrivate.is_public());
    }
}
