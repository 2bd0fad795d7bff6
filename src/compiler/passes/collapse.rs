//! Closure collapsing for non-public plans.
//!
//! A plan flagged by the accessibility scan is executed by the interpreter only. Nested lambdas
//! that do not depend on any plan local are evaluated once here and replaced by the resulting
//! closure constant, so executing the plan never rebuilds them.

use std::{collections::HashSet, sync::Arc};

use crate::{
    compiler::{pass::PlanPass, plan::MappingPlan},
    config::MapperConfig,
    expr::{Closure, Expr, Frame},
    value::{Callable, Value},
    Result,
};

/// Pre-evaluates closed nested lambdas of non-public plans
pub struct ClosureCollapsePass;

impl Default for ClosureCollapsePass {
    fn default() -> Self {
        Self::new()
    }
}

impl ClosureCollapsePass {
    /// Creates a new closure collapse pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PlanPass for ClosureCollapsePass {
    fn name(&self) -> &'static str {
        "closure-collapse"
    }

    fn should_run(&self, plan: &MappingPlan, _config: &MapperConfig) -> bool {
        !plan.public
    }

    fn run(&self, plan: &mut MappingPlan, _config: &MapperConfig) -> Result<bool> {
        let unbound = HashSet::new();
        let mut collapsed = 0usize;

        plan.map_exprs(&mut |expr| {
            expr.transform(&mut |node| match node {
                Expr::Lambda(lambda) if Expr::Lambda(lambda.clone()).is_closed(&unbound) => {
                    collapsed += 1;
                    let closure = Closure::new(lambda, Frame::default());
                    Ok(Expr::Const(Value::Func(Callable::Closure(Arc::new(closure)))))
                }
                other => Ok(other),
            })
        })?;

        Ok(collapsed > 0)
    }

    fn description(&self) -> &'static str {
        "Replaces nested closed lambdas of non-public plans with pre-evaluated closures"
    }
}
