//! Pass scheduler for the plan legality pipeline.
//!
//! The `PassScheduler` runs the plan passes in their fixed order. Unlike an optimizing pipeline
//! there is no fixpoint iteration: every pass is total and later passes depend on the complete
//! result of the earlier ones (substitution needs the null-safe bodies, collapsing needs the
//! accessibility verdict).

use log::trace;

use crate::{
    compiler::{
        pass::PlanPass,
        passes::{AccessibilityPass, ClosureCollapsePass, NullSafetyPass, SubstitutionPass},
        plan::MappingPlan,
    },
    config::MapperConfig,
    Result,
};

/// Runs plan passes in order
pub struct PassScheduler {
    /// The passes, in execution order
    pub passes: Vec<Box<dyn PlanPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PassScheduler {
    /// Creates the standard pipeline: null safety, substitution, accessibility, collapse.
    #[must_use]
    pub fn new() -> Self {
        Self {
            passes: vec![
                Box::new(NullSafetyPass::new()),
                Box::new(SubstitutionPass::new()),
                Box::new(AccessibilityPass::new()),
                Box::new(ClosureCollapsePass::new()),
            ],
        }
    }

    /// Creates a scheduler running exactly `passes`.
    #[must_use]
    pub fn with_passes(passes: Vec<Box<dyn PlanPass>>) -> Self {
        Self { passes }
    }

    /// Runs every pass once, in order.
    ///
    /// # Arguments
    ///
    /// * `plan` - The plan to transform.
    /// * `config` - The mapper configuration.
    ///
    /// # Returns
    ///
    /// The number of passes that changed the plan.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by a pass; later passes do not run.
    pub fn run_pipeline(&self, plan: &mut MappingPlan, config: &MapperConfig) -> Result<usize> {
        let mut changed = 0;
        for pass in &self.passes {
            if !pass.should_run(plan, config) {
                trace!("{}: skipped", pass.name());
                continue;
            }
            if pass.run(plan, config)? {
                trace!("{}: changed {}", pass.name(), plan.pair);
                changed += 1;
            }
        }
        Ok(changed)
    }
}
