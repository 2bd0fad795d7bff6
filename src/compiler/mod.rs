//! Turning proposed mapping trees into callable functions.
//!
//! This module sits between resolution and the mapper facade:
//!
//! - [`crate::resolve`] - what gets mapped (proposed mapping trees)
//! - [`compiler`](self) - how it gets executed (plans, passes, backends)
//! - [`crate::mapper`] - registration and lookup of compiled artifacts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  lower()                     ProposedTypeMapping → MappingPlan   │
//! │    ├─ leaves                 assignments, guarded by conditions  │
//! │    ├─ nested objects         construct or reuse, null-guarded    │
//! │    ├─ collections            allocate, indexed/cursor loops      │
//! │    └─ outer null check       per NullSourcePolicy                │
//! │                                                                  │
//! │  PassScheduler               fixed order, each pass total        │
//! │    ├─ NullSafetyPass         override chains become `?.`         │
//! │    ├─ SubstitutionPass       placeholders become plan locals     │
//! │    ├─ AccessibilityPass      public-surface verdict              │
//! │    └─ ClosureCollapsePass    pre-evaluated closures              │
//! │                                                                  │
//! │  CompiledFunction            backend selection                   │
//! │    ├─ Emitted                process-wide EmissionModule         │
//! │    └─ Interpreted            statement-walking fallback          │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod backend;
mod emit;
mod interpreter;
mod lower;
mod pass;
mod passes;
mod plan;
mod scheduler;

pub use backend::CompiledFunction;
pub use emit::{EmissionModule, EmittedFunction};
pub use interpreter::execute;
pub use lower::{lower, LowerContext};
pub use pass::PlanPass;
pub use passes::{AccessibilityPass, ClosureCollapsePass, NullSafetyPass, SubstitutionPass};
pub use plan::{LocalDecl, MappingPlan, Place, Stmt};
pub use scheduler::PassScheduler;

use log::trace;

use crate::{metadata::typesystem::MapTypeRc, resolve::ProposedTypeMapping, Result};

/// Lower `tree` and run the standard pass pipeline over the result.
///
/// ## Arguments
/// * 'tree'  - The proposed mapping tree
/// * 'extra' - Type of the extra argument, if the mapping takes one
/// * 'ctx'   - Policy and lookup tables
///
/// # Errors
/// Returns [`crate::Error::CodeGeneration`] from lowering and any error of a pass.
pub fn build_plan(
    tree: &ProposedTypeMapping,
    extra: Option<&MapTypeRc>,
    ctx: &LowerContext<'_>,
) -> Result<MappingPlan> {
    let mut plan = lower(tree, extra, ctx)?;
    let changed = PassScheduler::new().run_pipeline(&mut plan, ctx.config)?;
    trace!("{}: {changed} passes changed the plan", plan.pair);
    Ok(plan)
}
