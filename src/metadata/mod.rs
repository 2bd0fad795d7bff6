//! Type metadata for the mapping engine.
//!
//! Everything the resolution strategy knows about types comes from this module: explicit type
//! descriptors instead of runtime reflection, members with their accessor flags, and the
//! member-matching conventions.
//!
//! # Key Components
//!
//! - [`token`] - Process-unique type identities
//! - [`typesystem`] - Type descriptors, the registry and compatibility rules
//! - [`member`] - Fields and properties
//! - [`provider`] - Member discovery and name based matching conventions

/// Fields and properties of mapped types
pub mod member;
/// Member discovery and matching conventions
pub mod provider;
/// Type identities
pub mod token;
/// Type descriptors
pub mod typesystem;
