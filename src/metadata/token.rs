//! Type identity tokens.
//!
//! Every type descriptor registered with a [`TypeRegistry`](crate::metadata::typesystem::TypeRegistry)
//! is identified by a [`Token`]. Like ECMA-335 metadata tokens, the upper byte encodes the table
//! (the kind of descriptor) and the lower 24 bits the row within it:
//!
//! | Table | Meaning |
//! |-------|---------|
//! | `0x02` | User-declared type (class, struct, interface, enum) |
//! | `0x1B` | Constructed type (nullable, sequence, key/value pair) |
//! | `0xF0` | Built-in primitive |
//!
//! Type pairs, proposal caches and the compiled-map registry are all keyed by tokens, so two
//! descriptors with identical structure are still different types.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Table byte of user-declared types.
pub const TABLE_TYPEDEF: u8 = 0x02;
/// Table byte of constructed types (nullable, sequences, key/value pairs).
pub const TABLE_TYPESPEC: u8 = 0x1B;
/// Table byte of built-in primitives.
pub const TABLE_PRIMITIVE: u8 = 0xF0;

/// A process-unique identity for a registered type.
///
/// # Examples
///
/// ```rust
/// use dotmapper::metadata::token::Token;
///
/// let token = Token::new(0x0200_0001);
/// assert_eq!(token.table(), 0x02);
/// assert_eq!(token.row(), 1);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Create a new token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table byte and a row number.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table byte of this token.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the row within the table.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` if this is the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the token names a built-in primitive.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.table() == TABLE_PRIMITIVE
    }

    /// Returns `true` if the token names a constructed type.
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.table() == TABLE_TYPESPEC
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(TABLE_TYPEDEF, 5);
        assert_eq!(token.value(), 0x0200_0005);
        assert_eq!(token.table(), TABLE_TYPEDEF);
        assert_eq!(token.row(), 5);
    }

    #[test]
    fn test_token_row_is_masked() {
        let token = Token::from_parts(TABLE_TYPESPEC, 0x0100_0002);
        assert_eq!(token.table(), TABLE_TYPESPEC);
        assert_eq!(token.row(), 2);
    }

    #[test]
    fn test_token_kinds() {
        assert!(Token::new(0xF000_0008).is_primitive());
        assert!(Token::new(0x1B00_0001).is_constructed());
        assert!(!Token::new(0x0200_0001).is_primitive());
        assert!(Token::new(0).is_null());
    }

    #[test]
    fn test_token_display() {
        let token = Token(0x0200_0001);
        assert_eq!(format!("{}", token), "0x02000001");
        let debug_str = format!("{:?}", token);
        assert!(debug_str.contains("table: 0x02"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn test_token_as_map_key() {
        let mut map = HashMap::new();
        map.insert(Token(0x0200_0001), "Customer");
        map.insert(Token(0x0200_0002), "CustomerDto");
        assert_eq!(map.get(&Token(0x0200_0001)), Some(&"Customer"));
        assert_eq!(map.len(), 2);
    }
}
