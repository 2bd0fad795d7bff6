//! Collection shape classification.
//!
//! Decides whether a type is a sequence and which element type it produces, independent of the
//! concrete collection (array, list, read-only list, generic enumerable, dictionary or a user
//! type implementing an enumerable interface). Text is never treated as a sequence.

use crate::metadata::typesystem::{MapType, MapTypeRc, SequenceKind, TypeFlags, TypeFlavor};

impl MapType {
    /// Returns `true` for every iterable type except `String`
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        match self.flavor {
            TypeFlavor::Sequence(_) => true,
            TypeFlavor::Primitive(_) | TypeFlavor::Enum { .. } | TypeFlavor::Nullable => false,
            _ => {
                self.flags.contains(TypeFlags::UNTYPED_ENUMERABLE)
                    || self.enumerates().is_some()
                    || self
                        .interfaces
                        .iter()
                        .any(|(_, i)| i.upgrade().is_some_and(|i| i.is_sequence()))
                    || self.base().is_some_and(|base| base.is_sequence())
            }
        }
    }

    /// The element type of a sequence type.
    ///
    /// Arrays report their element type directly. Otherwise the types own enumerator wins, then
    /// the generic enumerable interfaces it implements, then its base type. Dictionaries produce
    /// their `KeyValuePair<K, V>`. Returns `None` for non-sequences and for sequences only known
    /// through the non-generic `IEnumerable`, whose elements must be treated as `Object`.
    #[must_use]
    pub fn element_type(&self) -> Option<MapTypeRc> {
        if let TypeFlavor::Sequence(SequenceKind::Array) = self.flavor {
            return self.generic_arg(0);
        }

        if let Some(element) = self.enumerates() {
            return Some(element);
        }

        for (_, interface) in self.interfaces.iter() {
            if let Some(element) = interface.upgrade().and_then(|i| i.element_type()) {
                return Some(element);
            }
        }

        if let Some(element) = self.base().and_then(|base| base.element_type()) {
            return Some(element);
        }

        match self.flavor {
            TypeFlavor::Sequence(SequenceKind::Dictionary) => None,
            TypeFlavor::Sequence(_) => self.generic_arg(0),
            _ => None,
        }
    }

    /// The shape used when iterating or materializing this sequence type.
    ///
    /// User types implementing an enumerable interface are treated as cursor-only
    /// `Enumerable`s. Returns `None` for non-sequences.
    #[must_use]
    pub fn sequence_kind(&self) -> Option<SequenceKind> {
        match self.flavor {
            TypeFlavor::Sequence(kind) => Some(kind),
            _ if self.is_sequence() => Some(SequenceKind::Enumerable),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::metadata::typesystem::{PrimitiveKind, SequenceKind, TypeBuilder, TypeRegistry};

    #[test]
    fn test_string_is_not_a_sequence() {
        let registry = TypeRegistry::new();
        assert!(!registry.string().is_sequence());
        assert!(registry.string().element_type().is_none());
    }

    #[test]
    fn test_constructed_sequences() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);

        for ty in [
            registry.array_of(&int),
            registry.list_of(&int),
            registry.fixed_list_of(&int),
            registry.enumerable_of(&int),
        ] {
            assert!(ty.is_sequence());
            assert_eq!(ty.element_type().unwrap().token, int.token);
        }

        assert_eq!(
            registry.array_of(&int).sequence_kind(),
            Some(SequenceKind::Array)
        );
    }

    #[test]
    fn test_user_collection_through_interface() {
        let registry = TypeRegistry::new();
        let order = TypeBuilder::class(&registry, "Demo", "Order").build();
        let orders = TypeBuilder::class(&registry, "Demo", "OrderCollection")
            .implements(&registry.enumerable_of(&order))
            .build();

        assert!(orders.is_sequence());
        assert_eq!(orders.element_type().unwrap().token, order.token);
        assert_eq!(orders.sequence_kind(), Some(SequenceKind::Enumerable));
    }

    #[test]
    fn test_own_enumerator_wins_over_interfaces() {
        let registry = TypeRegistry::new();
        let order = TypeBuilder::class(&registry, "Demo", "Order").build();
        let line = TypeBuilder::class(&registry, "Demo", "Line").build();
        let mixed = TypeBuilder::class(&registry, "Demo", "Mixed")
            .implements(&registry.enumerable_of(&order))
            .enumerates(&line)
            .build();

        assert_eq!(mixed.element_type().unwrap().token, line.token);
    }

    #[test]
    fn test_untyped_enumerable_has_unknown_element() {
        let registry = TypeRegistry::new();
        let bag = TypeBuilder::class(&registry, "Demo", "Bag")
            .untyped_enumerable()
            .build();

        assert!(bag.is_sequence());
        assert!(bag.element_type().is_none());
    }

    #[test]
    fn test_dictionary_element_is_pair() {
        let registry = TypeRegistry::new();
        let string = registry.string();
        let int = registry.primitive(PrimitiveKind::I4);
        let dictionary = registry.dictionary_of(&string, &int);

        let element = dictionary.element_type().unwrap();
        assert_eq!(
            element.token,
            registry.key_value_pair_of(&string, &int).token
        );
    }
}
