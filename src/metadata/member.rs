//! Fields and properties of mapped types.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bitflags::bitflags;

use crate::metadata::{
    token::Token,
    typesystem::{TypeRef, Visibility},
};

/// Reference to a `Member`
pub type MemberRc = Arc<Member>;

bitflags! {
    /// Member level attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u32 {
        /// The member has a getter (or is a field)
        const READABLE = 0x0001;
        /// The member has a setter (or is a non-readonly field)
        const WRITABLE = 0x0002;
        /// Marked with the `[Ignore]` opt-out, never populated by convention
        const IGNORED = 0x0004;
    }
}

impl Default for MemberFlags {
    fn default() -> Self {
        MemberFlags::READABLE | MemberFlags::WRITABLE
    }
}

/// Storage kind of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A plain field
    Field,
    /// A property with accessors
    Property,
}

/// A field or property declared by a [`MapType`](crate::metadata::typesystem::MapType).
///
/// Identity is the declaring type together with the slot index. Derived types share the very
/// same `MemberRc` for inherited members, so inherited members compare equal to the base
/// declaration.
pub struct Member {
    /// Member name
    pub name: String,
    /// Token of the declaring type
    pub declaring: Token,
    /// Full name of the declaring type, used for diagnostics
    pub declaring_name: String,
    /// Type of the stored value
    pub ty: TypeRef,
    /// Slot index inside instances of the declaring type
    pub index: usize,
    /// Field or property
    pub kind: MemberKind,
    /// Accessor and opt-out flags
    pub flags: MemberFlags,
    /// Declared visibility
    pub visibility: Visibility,
}

impl Member {
    /// Returns `true` if the member has a getter
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.flags.contains(MemberFlags::READABLE)
    }

    /// Returns `true` if the member has a setter
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.flags.contains(MemberFlags::WRITABLE)
    }

    /// Returns `true` if the member carries the `[Ignore]` opt-out
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.flags.contains(MemberFlags::IGNORED)
    }

    /// `Type.Member`, as reported by validation errors
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_name, self.name)
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.declaring == other.declaring && self.index == other.index
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.qualified_name())
            .field("index", &self.index)
            .field("ty", &self.ty.token())
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

#[cfg(test)]
mod tests {
    use crate::metadata::typesystem::{PrimitiveKind, TypeBuilder, TypeRegistry};

    #[test]
    fn test_inherited_member_identity() {
        let registry = TypeRegistry::new();
        let base = TypeBuilder::class(&registry, "Demo", "Entity")
            .property("Id", &registry.primitive(PrimitiveKind::I4))
            .build();
        let derived = TypeBuilder::class(&registry, "Demo", "Customer")
            .extends(&base)
            .build();

        let from_base = base.member("Id", false).unwrap();
        let from_derived = derived.member("Id", false).unwrap();
        assert_eq!(from_base, from_derived);
        assert_eq!(from_derived.qualified_name(), "Demo.Entity.Id");
    }

    #[test]
    fn test_default_flags() {
        let registry = TypeRegistry::new();
        let ty = TypeBuilder::class(&registry, "Demo", "Holder")
            .property("A", &registry.primitive(PrimitiveKind::I4))
            .readonly_property("B", &registry.primitive(PrimitiveKind::I4))
            .ignored_property("C", &registry.primitive(PrimitiveKind::I4))
            .build();

        let a = ty.member("A", false).unwrap();
        let b = ty.member("B", false).unwrap();
        let c = ty.member("C", false).unwrap();
        assert!(a.is_readable() && a.is_writable());
        assert!(b.is_readable() && !b.is_writable());
        assert!(c.is_ignored());
    }
}
