//! # dotmapper Prelude
//!
//! The types needed to declare types, configure a mapper and map values, re-exported for glob
//! imports.
//!
//! ```rust
//! use dotmapper::prelude::*;
//! ```

pub use crate::{Error, Result};

pub use crate::config::{
    CollectionPolicy, DepthLimits, MapperConfig, NullSourcePolicy, RecursionPolicy, SpecialCases,
};

pub use crate::mapper::{Mapper, MemberMap, PlanRepository, PrebuiltPlan};

pub use crate::metadata::{
    member::{Member, MemberRc},
    provider::{ConventionMemberProvider, MemberProvider},
    token::Token,
    typesystem::{MapType, MapTypeRc, PrimitiveKind, TypeBuilder, TypePair, TypeRegistry},
};

pub use crate::resolve::{
    Constructor, CustomMapping, ProposedMemberMapping, ProposedTypeMapping, ResolveOptions,
};

pub use crate::expr::{BinaryOp, Expr, Param};

pub use crate::value::{Culture, NativeFn, ObjectRef, SequenceRef, Value};
