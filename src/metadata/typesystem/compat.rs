//! Type compatibility analysis.
//!
//! [`TypeCompatibility`] answers two questions for the resolution strategy: may a source value be
//! stored in a destination location as-is ([`TypeCompatibility::is_assignable`]), and if not, is
//! there a conversion path ([`TypeCompatibility::are_convertible`]). Neither ever fails, the
//! absence of a path is reported as `false` and the caller decides what that means.
//!
//! Conversion operators are discovered once per declaring type and cached afterwards, so types
//! are expected to be complete before they take part in a mapping.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;

use crate::metadata::{
    token::Token,
    typesystem::{
        is_legal_primitive_conversion, ConversionOperator, MapType, MapTypeRc, TypeFlavor,
    },
};

/// Operators declared by one type, keyed by `(source, target)`
type OperatorTable = Arc<HashMap<(Token, Token), ConversionOperator>>;

/// Assignability and convertibility decisions with a per-type operator cache
#[derive(Default)]
pub struct TypeCompatibility {
    operators: DashMap<Token, OperatorTable>,
}

impl TypeCompatibility {
    /// Create a new analyzer with an empty operator cache
    #[must_use]
    pub fn new() -> Self {
        TypeCompatibility {
            operators: DashMap::new(),
        }
    }

    /// Returns `true` if a `source` value can be stored in a `destination` location without any
    /// conversion step: identical types, base types, implemented interfaces, `Object`, and
    /// wrapping `T` into `Nullable<T>`.
    #[must_use]
    pub fn is_assignable(&self, source: &MapType, destination: &MapType) -> bool {
        if source.is_assignable_to(destination) {
            return true;
        }

        destination
            .nullable_inner()
            .is_some_and(|inner| inner.token == source.token)
    }

    /// Returns `true` if a conversion path from `source` to `destination` exists.
    ///
    /// Nullable wrappers are removed on both sides first. A path exists for user-defined
    /// conversion operators, legal primitive conversions (numeric widening and narrowing,
    /// `Char` and `Decimal` included), and enum conversions from or to any numeric type or
    /// another enum, going through the underlying integral representation.
    #[must_use]
    pub fn are_convertible(&self, source: &MapTypeRc, destination: &MapTypeRc) -> bool {
        if self.conversion(source, destination).is_some() {
            return true;
        }

        let source = source.nullable_inner().unwrap_or_else(|| source.clone());
        let destination = destination
            .nullable_inner()
            .unwrap_or_else(|| destination.clone());

        if source.token == destination.token {
            return true;
        }

        if self.conversion(&source, &destination).is_some() {
            return true;
        }

        match (&source.flavor, &destination.flavor) {
            (TypeFlavor::Primitive(from), TypeFlavor::Primitive(to)) => {
                is_legal_primitive_conversion(*from, *to)
            }
            (TypeFlavor::Enum { .. }, TypeFlavor::Enum { .. }) => true,
            (TypeFlavor::Enum { underlying }, TypeFlavor::Primitive(to)) => {
                to.is_numeric() && is_legal_primitive_conversion(*underlying, *to)
            }
            (TypeFlavor::Primitive(from), TypeFlavor::Enum { underlying }) => {
                from.is_numeric() && is_legal_primitive_conversion(*from, *underlying)
            }
            _ => false,
        }
    }

    /// Find a user-defined conversion operator from `source` to `destination`.
    ///
    /// Operators declared by the source type are preferred over operators declared by the
    /// destination type; within a type, implicit operators win over explicit ones.
    #[must_use]
    pub fn conversion(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
    ) -> Option<ConversionOperator> {
        let key = (source.token, destination.token);
        for declaring in [source, destination] {
            if let Some(operator) = self.operators_of(declaring).get(&key) {
                return Some(operator.clone());
            }
        }
        None
    }

    /// Cached operator table of `ty`, scanning its declared conversions on first access
    fn operators_of(&self, ty: &MapType) -> OperatorTable {
        if let Some(table) = self.operators.get(&ty.token) {
            return table.clone();
        }

        let mut table: HashMap<(Token, Token), ConversionOperator> = HashMap::new();
        for (_, operator) in ty.conversions.iter() {
            let key = (operator.source.token(), operator.target.token());
            match table.get(&key) {
                Some(existing) if existing.implicit || !operator.implicit => {}
                _ => {
                    table.insert(key, operator.clone());
                }
            }
        }

        let table = Arc::new(table);
        self.operators.insert(ty.token, table.clone());
        table
    }
}
