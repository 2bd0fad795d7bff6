//! Builder for user-declared types.
//!
//! This module provides the [`TypeBuilder`] struct, which offers a fluent API for declaring
//! classes, value types, interfaces and enumerations and registering them in a
//! [`TypeRegistry`]. Members of the base type are copied in front of the members declared by
//! the builder, so slot indices of inherited members stay stable.
//!
//! # Example
//!
//! ```rust
//! use dotmapper::metadata::typesystem::{PrimitiveKind, TypeBuilder, TypeRegistry};
//!
//! let registry = TypeRegistry::new();
//! let order = TypeBuilder::class(&registry, "Demo", "Order")
//!     .property("Amount", &registry.primitive(PrimitiveKind::Decimal))
//!     .build();
//! let customer = TypeBuilder::class(&registry, "Demo", "Customer")
//!     .property("Orders", &registry.list_of(&order))
//!     .build();
//!
//! assert_eq!(customer.members.count(), 1);
//! ```

use crate::{
    metadata::{
        member::{MemberFlags, MemberKind},
        token::TABLE_TYPEDEF,
        typesystem::{
            ConversionOperator, MapType, MapTypeRc, PrimitiveKind, TypeFlags, TypeFlavor, TypeRef,
            TypeRegistry, Visibility,
        },
    },
    value::NativeFn,
};

/// A member declared through the builder
struct PendingMember {
    name: String,
    ty: MapTypeRc,
    kind: MemberKind,
    flags: MemberFlags,
    visibility: Visibility,
}

/// A conversion operator declared through the builder, `None` stands for the type being built
struct PendingConversion {
    source: Option<MapTypeRc>,
    target: Option<MapTypeRc>,
    implicit: bool,
    func: NativeFn,
}

/// Provides a fluent API for declaring types
pub struct TypeBuilder<'a> {
    /// Type registry receiving the finished type
    registry: &'a TypeRegistry,
    namespace: String,
    name: String,
    flavor: TypeFlavor,
    visibility: Visibility,
    flags: TypeFlags,
    base: Option<MapTypeRc>,
    interfaces: Vec<MapTypeRc>,
    members: Vec<PendingMember>,
    conversions: Vec<PendingConversion>,
    literals: Vec<(String, i64)>,
    enumerates: Option<MapTypeRc>,
}

impl<'a> TypeBuilder<'a> {
    fn start(registry: &'a TypeRegistry, flavor: TypeFlavor, namespace: &str, name: &str) -> Self {
        let flags = match flavor {
            TypeFlavor::Class | TypeFlavor::ValueType => TypeFlags::DEFAULT_CTOR,
            TypeFlavor::Interface => TypeFlags::ABSTRACT,
            _ => TypeFlags::empty(),
        };

        TypeBuilder {
            registry,
            namespace: namespace.to_string(),
            name: name.to_string(),
            flavor,
            visibility: Visibility::Public,
            flags,
            base: None,
            interfaces: Vec::new(),
            members: Vec::new(),
            conversions: Vec::new(),
            literals: Vec::new(),
            enumerates: None,
        }
    }

    /// Start building a class with the given name
    ///
    /// ## Arguments
    /// * 'registry'  - The registry the type is added to
    /// * 'namespace' - Namespace for a class type
    /// * 'name'      - Name for a class type
    #[must_use]
    pub fn class(registry: &'a TypeRegistry, namespace: &str, name: &str) -> Self {
        Self::start(registry, TypeFlavor::Class, namespace, name)
    }

    /// Start building a value type with the given name
    #[must_use]
    pub fn value_type(registry: &'a TypeRegistry, namespace: &str, name: &str) -> Self {
        Self::start(registry, TypeFlavor::ValueType, namespace, name)
    }

    /// Start building an interface with the given name
    #[must_use]
    pub fn interface(registry: &'a TypeRegistry, namespace: &str, name: &str) -> Self {
        Self::start(registry, TypeFlavor::Interface, namespace, name)
    }

    /// Start building an enumeration with the given underlying integral kind
    #[must_use]
    pub fn enumeration(
        registry: &'a TypeRegistry,
        namespace: &str,
        name: &str,
        underlying: PrimitiveKind,
    ) -> Self {
        Self::start(registry, TypeFlavor::Enum { underlying }, namespace, name)
    }

    /// Set the declared visibility
    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Mark the type abstract, it can no longer be constructed
    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.flags.insert(TypeFlags::ABSTRACT);
        self.flags.remove(TypeFlags::DEFAULT_CTOR);
        self
    }

    /// Remove the public zero-argument constructor
    #[must_use]
    pub fn without_default_ctor(mut self) -> Self {
        self.flags.remove(TypeFlags::DEFAULT_CTOR);
        self
    }

    /// Set the base type
    #[must_use]
    pub fn extends(mut self, base: &MapTypeRc) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Add an implemented interface
    #[must_use]
    pub fn implements(mut self, interface: &MapTypeRc) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    /// Declare that the type enumerates elements of `element` through its own enumerator
    #[must_use]
    pub fn enumerates(mut self, element: &MapTypeRc) -> Self {
        self.enumerates = Some(element.clone());
        self
    }

    /// Declare that the type implements the non-generic `IEnumerable` only
    #[must_use]
    pub fn untyped_enumerable(mut self) -> Self {
        self.flags.insert(TypeFlags::UNTYPED_ENUMERABLE);
        self
    }

    /// Add a member with full control over kind, flags and visibility
    #[must_use]
    pub fn member(
        mut self,
        name: &str,
        ty: &MapTypeRc,
        kind: MemberKind,
        flags: MemberFlags,
        visibility: Visibility,
    ) -> Self {
        self.members.push(PendingMember {
            name: name.to_string(),
            ty: ty.clone(),
            kind,
            flags,
            visibility,
        });
        self
    }

    /// Add a public read/write field
    #[must_use]
    pub fn field(self, name: &str, ty: &MapTypeRc) -> Self {
        self.member(
            name,
            ty,
            MemberKind::Field,
            MemberFlags::default(),
            Visibility::Public,
        )
    }

    /// Add a public read/write property
    #[must_use]
    pub fn property(self, name: &str, ty: &MapTypeRc) -> Self {
        self.member(
            name,
            ty,
            MemberKind::Property,
            MemberFlags::default(),
            Visibility::Public,
        )
    }

    /// Add a public getter-only property
    #[must_use]
    pub fn readonly_property(self, name: &str, ty: &MapTypeRc) -> Self {
        self.member(
            name,
            ty,
            MemberKind::Property,
            MemberFlags::READABLE,
            Visibility::Public,
        )
    }

    /// Add a public property carrying the `[Ignore]` opt-out
    #[must_use]
    pub fn ignored_property(self, name: &str, ty: &MapTypeRc) -> Self {
        self.member(
            name,
            ty,
            MemberKind::Property,
            MemberFlags::default() | MemberFlags::IGNORED,
            Visibility::Public,
        )
    }

    /// Add a private read/write field
    #[must_use]
    pub fn private_field(self, name: &str, ty: &MapTypeRc) -> Self {
        self.member(
            name,
            ty,
            MemberKind::Field,
            MemberFlags::default(),
            Visibility::Private,
        )
    }

    /// Add a named enum constant
    #[must_use]
    pub fn literal(mut self, name: &str, value: i64) -> Self {
        self.literals.push((name.to_string(), value));
        self
    }

    /// Declare a conversion operator from the type being built to `target`
    #[must_use]
    pub fn conversion_to(mut self, target: &MapTypeRc, implicit: bool, func: NativeFn) -> Self {
        self.conversions.push(PendingConversion {
            source: None,
            target: Some(target.clone()),
            implicit,
            func,
        });
        self
    }

    /// Declare a conversion operator from `source` to the type being built
    #[must_use]
    pub fn conversion_from(mut self, source: &MapTypeRc, implicit: bool, func: NativeFn) -> Self {
        self.conversions.push(PendingConversion {
            source: Some(source.clone()),
            target: None,
            implicit,
            func,
        });
        self
    }

    /// Create the type and register it
    pub fn build(self) -> MapTypeRc {
        let token = self.registry.next_token(TABLE_TYPEDEF);
        let new_type = std::sync::Arc::new(MapType::new(
            token,
            self.flavor,
            self.namespace,
            self.name,
            self.visibility,
            self.flags,
            Vec::new(),
        ));

        if let Some(base) = &self.base {
            new_type.set_base(base);
            for (_, inherited) in base.members.iter() {
                new_type.members.push(inherited.clone());
            }
        }

        for interface in &self.interfaces {
            new_type.interfaces.push(TypeRef::new(interface));
        }

        for pending in self.members {
            new_type.add_member(
                &pending.name,
                &pending.ty,
                pending.kind,
                pending.flags,
                pending.visibility,
            );
        }

        for pending in self.conversions {
            let source = pending.source.unwrap_or_else(|| new_type.clone());
            let target = pending.target.unwrap_or_else(|| new_type.clone());
            new_type.conversions.push(ConversionOperator {
                source: TypeRef::new(&source),
                target: TypeRef::new(&target),
                implicit: pending.implicit,
                func: pending.func,
            });
        }

        for literal in self.literals {
            new_type.literals.push(literal);
        }

        if let Some(element) = &self.enumerates {
            new_type.set_enumerates(element);
        }

        self.registry.insert(&new_type);
        new_type
    }
}
