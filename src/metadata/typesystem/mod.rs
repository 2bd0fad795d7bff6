//! Type descriptors for the mapping engine.
//!
//! This module replaces runtime reflection with explicit, process-lifetime type descriptors. The
//! resolution strategy, the lowering step and the runtime all work against [`MapType`] and never
//! against any host-language reflection API.
//!
//! # Key Components
//!
//! - [`MapType`]: A single type (class, struct, interface, enum, primitive or constructed type)
//! - [`TypeRegistry`]: Owns every descriptor, interns constructed types
//! - [`TypeBuilder`]: Fluent construction of user types
//! - [`TypeCompatibility`]: Assignability and convertibility decisions
//! - [`TypePair`]: The `(source, destination)` identity used as cache key everywhere
//!
//! # Examples
//!
//! ```rust
//! use dotmapper::metadata::typesystem::{PrimitiveKind, TypeBuilder, TypeRegistry};
//!
//! let registry = TypeRegistry::new();
//! let customer = TypeBuilder::class(&registry, "Demo", "Customer")
//!     .property("Id", &registry.primitive(PrimitiveKind::I4))
//!     .property("Name", &registry.primitive(PrimitiveKind::String))
//!     .build();
//!
//! assert_eq!(customer.fullname(), "Demo.Customer");
//! assert!(customer.member("name", true).is_some());
//! ```

mod base;
mod builder;
mod compat;
mod primitives;
mod registry;
mod sequence;

use std::{
    collections::{HashSet, VecDeque},
    fmt,
    sync::OnceLock,
};

pub use base::{SequenceKind, TypeFlags, TypeFlavor, TypeRef, Visibility};
pub use builder::TypeBuilder;
pub use compat::TypeCompatibility;
pub use primitives::{is_legal_primitive_conversion, PrimitiveKind};
pub use registry::TypeRegistry;

use crate::{
    metadata::{
        member::{Member, MemberFlags, MemberKind, MemberRc},
        token::Token,
    },
    value::NativeFn,
};

/// Reference to a `MapType`
pub type MapTypeRc = std::sync::Arc<MapType>;

/// An ordered `(source, destination)` pair of type identities.
///
/// Identity is by token, never by structure: two structurally identical types are still two
/// different pairs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TypePair {
    /// Token of the source type
    pub source: Token,
    /// Token of the destination type
    pub destination: Token,
}

impl TypePair {
    /// Create a new pair from two tokens
    #[must_use]
    pub fn new(source: Token, destination: Token) -> Self {
        TypePair {
            source,
            destination,
        }
    }

    /// Create a new pair from two descriptors
    #[must_use]
    pub fn of(source: &MapType, destination: &MapType) -> Self {
        TypePair::new(source.token, destination.token)
    }

    /// A pair mapping a type onto itself
    #[must_use]
    pub fn is_same_type(&self) -> bool {
        self.source == self.destination
    }
}

impl fmt::Display for TypePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// A user-defined conversion operator (`op_Implicit` / `op_Explicit`).
#[derive(Clone)]
pub struct ConversionOperator {
    /// Type accepted by the operator
    pub source: TypeRef,
    /// Type produced by the operator
    pub target: TypeRef,
    /// `true` for implicit operators
    pub implicit: bool,
    /// The conversion itself, called with exactly one argument
    pub func: NativeFn,
}

impl fmt::Debug for ConversionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionOperator")
            .field("source", &self.source.token())
            .field("target", &self.target.token())
            .field("implicit", &self.implicit)
            .field("func", &self.func.name())
            .finish()
    }
}

/// A type known to the mapping engine.
///
/// Members are stored in declaration order; a derived type starts with the members of its base
/// type (the very same `MemberRc`s), so a base member's slot index is valid in every derived
/// type as well.
pub struct MapType {
    /// Token
    pub token: Token,
    /// Namespace, empty for types declared outside of one
    pub namespace: String,
    /// Simple name, constructed types render their arguments (`List<Demo.Order>`)
    pub name: String,
    /// The type flavor
    pub flavor: TypeFlavor,
    /// Declared visibility
    pub visibility: Visibility,
    /// Type attributes
    pub flags: TypeFlags,
    /// This types base aka 'extends'
    base: OnceLock<TypeRef>,
    /// All interfaces this type implements
    pub interfaces: boxcar::Vec<TypeRef>,
    /// All fields and properties, base members first
    pub members: boxcar::Vec<MemberRc>,
    /// Generic arguments of constructed types
    pub generic_args: Vec<TypeRef>,
    /// User-defined conversion operators declared by this type
    pub conversions: boxcar::Vec<ConversionOperator>,
    /// Named constants of enumerations
    pub literals: boxcar::Vec<(String, i64)>,
    /// Element type produced by this types own enumerator
    enumerates: OnceLock<TypeRef>,
}

impl MapType {
    /// Create a new instance of a `MapType`
    #[must_use]
    pub fn new(
        token: Token,
        flavor: TypeFlavor,
        namespace: impl Into<String>,
        name: impl Into<String>,
        visibility: Visibility,
        flags: TypeFlags,
        generic_args: Vec<TypeRef>,
    ) -> Self {
        MapType {
            token,
            namespace: namespace.into(),
            name: name.into(),
            flavor,
            visibility,
            flags,
            base: OnceLock::new(),
            interfaces: boxcar::Vec::new(),
            members: boxcar::Vec::new(),
            generic_args,
            conversions: boxcar::Vec::new(),
            literals: boxcar::Vec::new(),
            enumerates: OnceLock::new(),
        }
    }

    /// Returns the full name (Namespace.Name) of the type
    #[must_use]
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{0}.{1}", self.namespace, self.name)
        }
    }

    /// Access the base type of this type, if it exists
    #[must_use]
    pub fn base(&self) -> Option<MapTypeRc> {
        self.base.get().and_then(TypeRef::upgrade)
    }

    /// Set the base type. Returns `false` if a base type was already set.
    pub fn set_base(&self, base: &MapTypeRc) -> bool {
        self.base.set(TypeRef::new(base)).is_ok()
    }

    /// The element type produced by this types own enumerator, if declared
    #[must_use]
    pub fn enumerates(&self) -> Option<MapTypeRc> {
        self.enumerates.get().and_then(TypeRef::upgrade)
    }

    /// Declare the element type produced by this types own enumerator
    pub fn set_enumerates(&self, element: &MapTypeRc) -> bool {
        self.enumerates.set(TypeRef::new(element)).is_ok()
    }

    /// Get the generic argument at `index`
    #[must_use]
    pub fn generic_arg(&self, index: usize) -> Option<MapTypeRc> {
        self.generic_args.get(index).and_then(TypeRef::upgrade)
    }

    /// The wrapped type of a `Nullable<T>`, `None` for every other type
    #[must_use]
    pub fn nullable_inner(&self) -> Option<MapTypeRc> {
        match self.flavor {
            TypeFlavor::Nullable => self.generic_arg(0),
            _ => None,
        }
    }

    /// Returns `true` if the type can hold `null`
    #[must_use]
    pub fn accepts_null(&self) -> bool {
        matches!(self.flavor, TypeFlavor::Nullable) || !self.flavor.is_value_type()
    }

    /// Returns `true` if this type, and every generic argument of it, is publicly visible
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.visibility.is_public()
            && self
                .generic_args
                .iter()
                .all(|arg| arg.upgrade().is_some_and(|arg| arg.is_public()))
    }

    /// The name of the enum literal holding `value`
    #[must_use]
    pub fn literal_name(&self, value: i64) -> Option<String> {
        self.literals
            .iter()
            .find(|(_, (_, v))| *v == value)
            .map(|(_, (name, _))| name.clone())
    }

    /// Find a member by name
    ///
    /// ## Arguments
    /// * 'name'             - The member name to look for
    /// * 'case_insensitive' - Fall back to an ASCII case-insensitive comparison
    #[must_use]
    pub fn member(&self, name: &str, case_insensitive: bool) -> Option<MemberRc> {
        if let Some((_, member)) = self.members.iter().find(|(_, m)| m.name == name) {
            return Some(member.clone());
        }

        if case_insensitive {
            return self
                .members
                .iter()
                .find(|(_, m)| m.name.eq_ignore_ascii_case(name))
                .map(|(_, member)| member.clone());
        }

        None
    }

    /// Declare a new member at the end of the member list.
    ///
    /// Types are normally completed through [`TypeBuilder`]; this is public so self-referencing
    /// members (`Node.Children: List<Node>`) can be added once the type itself exists.
    pub fn add_member(
        &self,
        name: &str,
        ty: &MapTypeRc,
        kind: MemberKind,
        flags: MemberFlags,
        visibility: Visibility,
    ) -> MemberRc {
        let member = std::sync::Arc::new(Member {
            name: name.to_string(),
            declaring: self.token,
            declaring_name: self.fullname(),
            ty: TypeRef::new(ty),
            index: self.members.count(),
            kind,
            flags,
            visibility,
        });
        self.members.push(member.clone());
        member
    }

    /// The storage slot of `member` inside instances of this type.
    ///
    /// Members declared by this type or inherited from a base type keep their index; members of
    /// an unrelated type (usually an interface) are matched by name.
    #[must_use]
    pub fn slot_of(&self, member: &Member) -> Option<usize> {
        if let Some(own) = self.members.get(member.index) {
            if own.declaring == member.declaring && own.index == member.index {
                return Some(member.index);
            }
        }

        self.members
            .iter()
            .find(|(_, m)| m.name == member.name)
            .map(|(index, _)| index)
    }

    /// Returns `true` if a value of this type may be stored in a location of type `target`
    /// without any conversion (identity, base type, implemented interface or `Object`)
    #[must_use]
    pub fn is_assignable_to(&self, target: &MapType) -> bool {
        self.distance_to(target).is_some()
    }

    /// Number of steps up the assignability chain (base types and interfaces) from this type to
    /// `target`. `Some(0)` for the type itself, `None` if `target` is not reachable.
    #[must_use]
    pub fn distance_to(&self, target: &MapType) -> Option<usize> {
        if self.token == target.token {
            return Some(0);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((self.supertypes(), 1usize));

        while let Some((level, distance)) = queue.pop_front() {
            for ty in level {
                if !visited.insert(ty.token) {
                    continue;
                }
                if ty.token == target.token {
                    return Some(distance);
                }
                queue.push_back((ty.supertypes(), distance + 1));
            }
        }

        if target.token == PrimitiveKind::Object.token() {
            return Some(visited.len() + 1);
        }

        None
    }

    /// Direct supertypes: the base type followed by the implemented interfaces
    fn supertypes(&self) -> Vec<MapTypeRc> {
        let mut result = Vec::new();
        if let Some(base) = self.base() {
            result.push(base);
        }
        for (_, interface) in self.interfaces.iter() {
            if let Some(interface) = interface.upgrade() {
                result.push(interface);
            }
        }
        result
    }
}

impl fmt::Debug for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapType")
            .field("token", &self.token)
            .field("fullname", &self.fullname())
            .field("flavor", &self.flavor)
            .field("members", &self.members.count())
            .finish()
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}
