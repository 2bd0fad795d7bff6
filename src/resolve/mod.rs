//! Mapping resolution.
//!
//! Resolution decides *what* gets mapped: for a `(source, destination)` type pair it produces a
//! [`ProposedTypeMapping`] tree describing every member assignment, nested object and collection
//! element boundary. Nothing is executable yet; the tree is handed to the
//! [`compiler`](crate::compiler) for lowering, after callers had the chance to edit it.
//!
//! # Key Components
//!
//! - [`MappingStrategy`] - The resolver, owning the proposal and override caches
//! - [`CustomMapping`] - Per-member override tables parsed from template lambdas
//! - [`ProposedTypeMapping`] / [`ProposedMemberMapping`] - The resolved tree

mod custom;
mod proposed;
mod strategy;

pub use custom::CustomMapping;
pub use proposed::{
    Constructor, ProposedMemberMapping, ProposedTypeMapping, SequenceShape, SourceAccess,
};
pub use strategy::{MappingStrategy, MemberFilter, ResolveOptions};
