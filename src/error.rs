use thiserror::Error;

use crate::metadata::{token::Token, typesystem::TypePair};

macro_rules! codegen_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::CodeGeneration {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::CodeGeneration {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Resolution-time errors ([`Error::RecursiveRelationship`]) abort the whole resolve call and
/// leave the proposal cache untouched. Finalize-time errors ([`Error::IncompatibleMapping`],
/// [`Error::CodeGeneration`]) abort the finalize call; the offending tree is simply never
/// registered as a compiled artifact.
///
/// # Error Categories
///
/// ## Resolution Errors
/// - [`Error::RecursiveRelationship`] - A type cycle was found and the policy demands failure
/// - [`Error::IncompatibleMapping`] - Destination members without a satisfiable source
///
/// ## Compilation Errors
/// - [`Error::CodeGeneration`] - Lowering hit an impossible construction
///
/// ## Usage Errors
/// - [`Error::MapNotFound`] - No compiled artifact exists for the requested shape
/// - [`Error::Argument`] - Malformed override templates or conversion functions
/// - [`Error::TypeNotFound`] - A type token is not known to the registry
///
/// ## Execution Errors
/// - [`Error::Evaluation`] - A compiled plan failed while running
/// - [`Error::LockError`] - Thread synchronization failure
///
/// # Examples
///
/// ```rust,no_run
/// use dotmapper::{Error, Mapper, TypeRegistry, MapperConfig, Value};
/// use std::sync::Arc;
///
/// let registry = Arc::new(TypeRegistry::new());
/// let mapper = Mapper::new(Arc::clone(&registry), MapperConfig::strict());
/// # let (source, destination) = (registry.object(), registry.object());
///
/// match mapper.map(&source, &destination, &Value::Null) {
///     Ok(mapped) => println!("mapped: {mapped}"),
///     Err(Error::IncompatibleMapping { members, .. }) => {
///         eprintln!("unmapped destination members: {}", members.join(", "));
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A recursive type relationship was found while resolving a type pair.
    ///
    /// Only raised when the configured [`RecursionPolicy`](crate::RecursionPolicy) is `Throw`.
    /// With the default policy the repetition point is silently omitted instead.
    #[error("Recursive relationship detected while resolving {source_name} -> {destination_name} ({pair})")]
    RecursiveRelationship {
        /// The type pair that appeared twice on the resolution stack
        pair: TypePair,
        /// Full name of the source type
        source_name: String,
        /// Full name of the destination type
        destination_name: String,
    },

    /// One or more destination members could not be satisfied from the source.
    ///
    /// Reported once per finalize call, listing every offending member, and only when
    /// strict coverage is requested.
    #[error("Incompatible mapping {pair} - unmapped destination members: {}", .members.join(", "))]
    IncompatibleMapping {
        /// The root type pair of the finalized tree
        pair: TypePair,
        /// `Type.Member` names of every destination member without a source
        members: Vec<String>,
    },

    /// Lowering encountered an impossible construction.
    ///
    /// Raised for types without any usable constructor, illegal string or date conversions
    /// while the matching special case is disabled, and malformed constructor templates.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what could not be generated
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Code generation - {file}:{line}: {message}")]
    CodeGeneration {
        /// The message to be printed for the CodeGeneration error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// No compiled artifact exists for the requested type pair and parameter shape.
    #[error("No compiled mapping found for {pair} (extra parameter: {extra})")]
    MapNotFound {
        /// The requested type pair
        pair: TypePair,
        /// Whether the lookup asked for the extra-parameter variant
        extra: bool,
    },

    /// Malformed custom-override template, unknown destination member or a conversion
    /// function with the wrong arity.
    #[error("Invalid argument - {0}")]
    Argument(String),

    /// A type token is not registered.
    #[error("Failed to find type in TypeRegistry - {0}")]
    TypeNotFound(Token),

    /// Runtime failure while executing a compiled mapping.
    ///
    /// Covers null dereferences under the `Crash` source-null policy, failed string to date
    /// parsing, and errors reported by native functions used inside override expressions.
    #[error("Evaluation failed - {0}")]
    Evaluation(String),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when trying to acquire a mutex or rwlock that is in a poisoned state.
    #[error("Failed to lock target")]
    LockError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codegen_error_macro() {
        let err = codegen_error!("no constructor for {}", "Demo.Thing");
        match err {
            Error::CodeGeneration { message, file, .. } => {
                assert_eq!(message, "no constructor for Demo.Thing");
                assert!(file.ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_incompatible_message_lists_members() {
        let err = Error::IncompatibleMapping {
            pair: TypePair::new(Token::new(0x0200_0001), Token::new(0x0200_0002)),
            members: vec!["Dto.A".to_string(), "Dto.B".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("Dto.A, Dto.B"));
    }
}
