//! Plan legality passes.
//!
//! Run in this order by the [`PassScheduler`](crate::compiler::PassScheduler):
//!
//! 1. [`NullSafetyPass`] - null-propagating navigation inside override bodies
//! 2. [`SubstitutionPass`] - override placeholders bound to plan locals
//! 3. [`AccessibilityPass`] - public-surface verdict for native emission
//! 4. [`ClosureCollapsePass`] - pre-evaluated closures for interpreter-only plans

mod accessibility;
mod collapse;
mod nullsafety;
mod substitute;

pub use accessibility::AccessibilityPass;
pub use collapse::ClosureCollapsePass;
pub use nullsafety::NullSafetyPass;
pub use substitute::SubstitutionPass;
