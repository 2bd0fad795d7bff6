//! Choosing between the emitted and the interpreted backend.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    compiler::{emit::EmissionModule, emit::EmittedFunction, interpreter, plan::MappingPlan},
    config::MapperConfig,
    value::Value,
    Result,
};

/// A callable compiled mapping
#[derive(Clone, Debug)]
pub enum CompiledFunction {
    /// Executed by walking the plan
    Interpreted(Arc<MappingPlan>),
    /// Emitted into the process-wide module
    Emitted(Arc<EmittedFunction>),
}

impl CompiledFunction {
    /// Compile a finished plan.
    ///
    /// Plans touching only public surface are emitted when `config` allows native emission.
    /// Everything else, emission failures included, runs interpreted; this never fails.
    #[must_use]
    pub fn compile(plan: MappingPlan, config: &MapperConfig) -> Self {
        if !config.native_emission {
            debug!("{}: native emission disabled, interpreting", plan.pair);
            return CompiledFunction::Interpreted(Arc::new(plan));
        }

        if !plan.public {
            warn!(
                "{} touches non-public surface, falling back to the interpreter",
                plan.pair
            );
            return CompiledFunction::Interpreted(Arc::new(plan));
        }

        match EmissionModule::global().emit(&plan) {
            Ok(function) => CompiledFunction::Emitted(function),
            Err(error) => {
                warn!("{}: emission failed ({error}), falling back to the interpreter", plan.pair);
                CompiledFunction::Interpreted(Arc::new(plan))
            }
        }
    }

    /// Returns `true` for the emitted backend
    #[must_use]
    pub fn is_emitted(&self) -> bool {
        matches!(self, CompiledFunction::Emitted(_))
    }

    /// Run the mapping.
    ///
    /// ## Arguments
    /// * 'source'      - The source value
    /// * 'destination' - The existing destination, `null` to construct a new one
    /// * 'extra'       - The extra argument, for mappings finalized with one
    ///
    /// # Errors
    /// Returns [`crate::Error::Evaluation`] for runtime failures of the mapping.
    pub fn invoke(
        &self,
        source: &Value,
        destination: &Value,
        extra: Option<&Value>,
    ) -> Result<Value> {
        match self {
            CompiledFunction::Interpreted(plan) => {
                interpreter::execute(plan, source, destination, extra)
            }
            CompiledFunction::Emitted(function) => function.invoke(source, destination, extra),
        }
    }
}
