//! Built-in primitive types.
//!
//! Primitives are registered by every [`TypeRegistry`](crate::metadata::typesystem::TypeRegistry)
//! on construction and live under reserved tokens in the `0xF0` table, so two registries agree on
//! the identity of `System.Int32` without any coordination.

use strum::{EnumCount, EnumIter};

use crate::metadata::token::Token;

/// The built-in primitive kinds understood by the mapping engine.
///
/// Besides the numeric types this covers the handful of reference and value types that receive
/// special treatment during lowering: `String` (textual representation), `DateTime` (culture
/// aware parsing) and `Object` (the unknown element type of untyped sequences).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum PrimitiveKind {
    /// System.Boolean - true/false value
    Boolean,
    /// System.Char - UTF-16 code unit
    Char,
    /// System.SByte - signed 8-bit integer
    I1,
    /// System.Byte - unsigned 8-bit integer
    U1,
    /// System.Int16 - signed 16-bit integer
    I2,
    /// System.UInt16 - unsigned 16-bit integer
    U2,
    /// System.Int32 - signed 32-bit integer
    I4,
    /// System.UInt32 - unsigned 32-bit integer
    U4,
    /// System.Int64 - signed 64-bit integer
    I8,
    /// System.UInt64 - unsigned 64-bit integer
    U8,
    /// System.Single - 32-bit floating point
    R4,
    /// System.Double - 64-bit floating point
    R8,
    /// System.Decimal - exact base-10 number
    Decimal,
    /// System.String - immutable text
    String,
    /// System.Object - root of all types
    Object,
    /// System.DateTime - calendar date and time of day
    DateTime,
}

impl PrimitiveKind {
    /// Get the reserved token for this primitive
    #[must_use]
    pub fn token(&self) -> Token {
        Token::new(match self {
            PrimitiveKind::Boolean => 0xF000_0002,
            PrimitiveKind::Char => 0xF000_0003,
            PrimitiveKind::I1 => 0xF000_0004,
            PrimitiveKind::U1 => 0xF000_0005,
            PrimitiveKind::I2 => 0xF000_0006,
            PrimitiveKind::U2 => 0xF000_0007,
            PrimitiveKind::I4 => 0xF000_0008,
            PrimitiveKind::U4 => 0xF000_0009,
            PrimitiveKind::I8 => 0xF000_000A,
            PrimitiveKind::U8 => 0xF000_000B,
            PrimitiveKind::R4 => 0xF000_000C,
            PrimitiveKind::R8 => 0xF000_000D,
            PrimitiveKind::Decimal => 0xF000_000E,
            PrimitiveKind::String => 0xF000_000F,
            PrimitiveKind::Object => 0xF000_0010,
            PrimitiveKind::DateTime => 0xF000_0011,
        })
    }

    /// Look up the primitive kind owning a reserved token
    #[must_use]
    pub fn from_token(token: Token) -> Option<Self> {
        use strum::IntoEnumIterator;

        if !token.is_primitive() {
            return None;
        }
        PrimitiveKind::iter().find(|kind| kind.token() == token)
    }

    /// The simple name of the primitive, as found in the `System` namespace
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::I1 => "SByte",
            PrimitiveKind::U1 => "Byte",
            PrimitiveKind::I2 => "Int16",
            PrimitiveKind::U2 => "UInt16",
            PrimitiveKind::I4 => "Int32",
            PrimitiveKind::U4 => "UInt32",
            PrimitiveKind::I8 => "Int64",
            PrimitiveKind::U8 => "UInt64",
            PrimitiveKind::R4 => "Single",
            PrimitiveKind::R8 => "Double",
            PrimitiveKind::Decimal => "Decimal",
            PrimitiveKind::String => "String",
            PrimitiveKind::Object => "Object",
            PrimitiveKind::DateTime => "DateTime",
        }
    }

    /// The namespace all primitives live in
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        "System"
    }

    /// Returns `true` for primitives with value semantics
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        !matches!(self, PrimitiveKind::String | PrimitiveKind::Object)
    }

    /// Returns `true` for the integral kinds (enum underlying candidates)
    #[must_use]
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::I1
                | PrimitiveKind::U1
                | PrimitiveKind::I2
                | PrimitiveKind::U2
                | PrimitiveKind::I4
                | PrimitiveKind::U4
                | PrimitiveKind::I8
                | PrimitiveKind::U8
        )
    }

    /// Returns `true` for every kind taking part in numeric conversions, `Char` included
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.is_integral()
            || matches!(
                self,
                PrimitiveKind::Char
                    | PrimitiveKind::R4
                    | PrimitiveKind::R8
                    | PrimitiveKind::Decimal
            )
    }

    /// Returns `true` if values of this kind are immutable and may be shared between the source
    /// and destination graph even when cloning
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        !matches!(self, PrimitiveKind::Object)
    }
}

/// Legal primitive-to-primitive conversions.
///
/// Every numeric kind (including `Char` and `Decimal`) converts to every other numeric kind, with
/// explicit narrowing semantics at runtime. `Boolean`, `String` and `DateTime` only convert to
/// themselves; string and date special cases are handled during lowering, not here.
#[must_use]
pub fn is_legal_primitive_conversion(source: PrimitiveKind, destination: PrimitiveKind) -> bool {
    if source == destination {
        return true;
    }

    source.is_numeric() && destination.is_numeric()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_tokens_are_unique_and_reversible() {
        let mut seen = std::collections::HashSet::new();
        for kind in PrimitiveKind::iter() {
            assert!(kind.token().is_primitive());
            assert!(seen.insert(kind.token()));
            assert_eq!(PrimitiveKind::from_token(kind.token()), Some(kind));
        }
        assert_eq!(seen.len(), PrimitiveKind::COUNT);
    }

    #[test]
    fn test_from_token_rejects_user_types() {
        assert_eq!(PrimitiveKind::from_token(Token::new(0x0200_0008)), None);
    }

    #[test]
    fn test_conversion_table() {
        assert!(is_legal_primitive_conversion(PrimitiveKind::I4, PrimitiveKind::Decimal));
        assert!(is_legal_primitive_conversion(PrimitiveKind::Decimal, PrimitiveKind::I4));
        assert!(is_legal_primitive_conversion(PrimitiveKind::R8, PrimitiveKind::U1));
        assert!(is_legal_primitive_conversion(PrimitiveKind::Char, PrimitiveKind::I4));
        assert!(!is_legal_primitive_conversion(PrimitiveKind::Boolean, PrimitiveKind::I4));
        assert!(!is_legal_primitive_conversion(PrimitiveKind::I4, PrimitiveKind::Boolean));
        assert!(!is_legal_primitive_conversion(PrimitiveKind::String, PrimitiveKind::I4));
        assert!(is_legal_primitive_conversion(PrimitiveKind::String, PrimitiveKind::String));
    }

    #[test]
    fn test_value_type_classification() {
        assert!(PrimitiveKind::DateTime.is_value_type());
        assert!(PrimitiveKind::Decimal.is_value_type());
        assert!(!PrimitiveKind::String.is_value_type());
        assert!(!PrimitiveKind::Object.is_value_type());
    }
}
