// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # dotmapper
//!
//! Convention-based object-to-object mapping with compiled mapping functions.
//!
//! Given a source type and a destination type, `dotmapper` works out which destination members
//! can be filled from which source members (by name, by flattened navigation paths such as
//! `CustomerName <- Customer.Name`, or by user supplied override expressions), lowers that
//! proposal into a straight-line mapping plan and compiles the plan into a callable function.
//!
//! ## Features
//!
//! - **🔍 Convention matching** - exact and case-insensitive names, flattened paths, `Count` and
//!   `Sum` aggregates over collections
//! - **🧩 Override templates** - `src => new Dst { .. }` and `(src, dst) => dst { .. }` lambdas,
//!   inherited through base types and interfaces
//! - **♻️ Recursion control** - cycle detection with fail or omit policies, depth bounds, deep
//!   cloning of same-type pairs
//! - **⚡ Compiled plans** - closure-compiled functions for public surface, an interpreter for
//!   everything else
//! - **🔒 Concurrent** - resolution caches and the artifact registry are safe to share between
//!   threads
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dotmapper::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let string = registry.string();
//! let int = registry.primitive(PrimitiveKind::I4);
//! let source = TypeBuilder::class(&registry, "Demo", "Person")
//!     .property("Name", &string)
//!     .property("Age", &int)
//!     .build();
//! let target = TypeBuilder::class(&registry, "Demo", "PersonDto")
//!     .property("Name", &string)
//!     .property("Age", &registry.primitive(PrimitiveKind::I8))
//!     .build();
//!
//! let mapper = Mapper::new(registry.clone(), MapperConfig::default());
//! let person = ObjectRef::new(&source);
//! person.set_field("Name", "Ada")?;
//! person.set_field("Age", 36)?;
//!
//! let dto = mapper.map(&source, &target, &Value::Object(person))?;
//! assert_eq!(dto.field("Age")?, Value::I8(36));
//! # Ok::<(), dotmapper::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Type descriptors, members and member matching conventions
//! - [`value`] - Runtime values and conversions
//! - [`expr`] - Expression trees for templates and plans
//! - [`resolve`] - Resolution of type pairs into proposed mapping trees
//! - [`compiler`] - Lowering, plan passes and execution backends
//! - [`mapper`] - The [`Mapper`] facade and the registry of compiled artifacts
//! - [`Error`] and [`Result`] - Error handling
//!
//! Resolution is pure with respect to its inputs and caches finished subtrees; compilation
//! happens once per pair and variant, after which mapping is a lock-free lookup and a call.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotmapper::prelude::*;
///
/// let registry = TypeRegistry::new();
/// let config = MapperConfig::strict();
/// assert!(config.strict);
/// assert_eq!(registry.string().fullname(), "System.String");
/// ```
pub mod prelude;

/// Mapper configuration
pub mod config;

/// Type metadata: descriptors, members, tokens and matching conventions
pub mod metadata;

/// Runtime values
pub mod value;

/// Expression trees
pub mod expr;

/// Resolution of type pairs into proposed mapping trees
pub mod resolve;

/// Lowering, plan passes and execution backends
pub mod compiler;

/// The mapper facade and compiled artifact registry
pub mod mapper;

/// `dotmapper` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotmapper` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotmapper::{Error, Mapper, MapperConfig, TypeRegistry};
/// use dotmapper::metadata::typesystem::TypeBuilder;
///
/// let registry = Arc::new(TypeRegistry::new());
/// let a = TypeBuilder::class(&registry, "Demo", "A").build();
/// let b = TypeBuilder::class(&registry, "Demo", "B")
///     .property("Missing", &registry.string())
///     .build();
///
/// let mapper = Mapper::new(registry.clone(), MapperConfig::strict());
/// let tree = mapper.resolve(&a, &b)?;
/// match mapper.finalize(&tree) {
///     Err(Error::IncompatibleMapping { members, .. }) => assert_eq!(members, ["Demo.B.Missing"]),
///     other => panic!("unexpected {other:?}"),
/// }
/// # Ok::<(), dotmapper::Error>(())
/// ```
pub use error::Error;

pub use config::{
    CollectionPolicy, DepthLimits, MapperConfig, NullSourcePolicy, RecursionPolicy, SpecialCases,
};
pub use mapper::{Mapper, MemberMap};
pub use metadata::typesystem::TypeRegistry;
pub use value::Value;
