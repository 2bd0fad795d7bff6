//! The plan pass trait.

use crate::{compiler::plan::MappingPlan, config::MapperConfig, Result};

/// A rewrite over a lowered [`MappingPlan`].
///
/// Passes run in the fixed order of the [`PassScheduler`](crate::compiler::PassScheduler); each
/// pass runs to completion over the whole plan before the next one starts.
pub trait PlanPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run under `config`?
    ///
    /// Called before `run`. Override to skip passes disabled by configuration.
    fn should_run(&self, _plan: &MappingPlan, _config: &MapperConfig) -> bool {
        true
    }

    /// Run the pass over `plan`.
    ///
    /// Returns `true` if the plan was changed, `false` otherwise.
    ///
    /// # Arguments
    ///
    /// * `plan` - The plan to transform.
    /// * `config` - The mapper configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the plan.
    fn run(&self, plan: &mut MappingPlan, config: &MapperConfig) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
