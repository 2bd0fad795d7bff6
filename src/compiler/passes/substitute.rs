//! Placeholder substitution.
//!
//! Override bodies and constructor templates are spliced into a plan as [`Expr::Override`]
//! nodes that still speak in terms of the template's own parameters. This pass replaces every
//! bound parameter with the plan local it was bound to and drops the `Override` wrapper, so the
//! remaining plan only references locals.

use crate::{
    compiler::{pass::PlanPass, plan::MappingPlan},
    config::MapperConfig,
    expr::{Expr, ExprRewriter, ParamSubstitution},
    Result,
};

/// Binds override placeholders to plan locals
pub struct SubstitutionPass;

impl Default for SubstitutionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstitutionPass {
    /// Creates a new substitution pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PlanPass for SubstitutionPass {
    fn name(&self) -> &'static str {
        "substitution"
    }

    fn run(&self, plan: &mut MappingPlan, _config: &MapperConfig) -> Result<bool> {
        let mut spliced = 0usize;
        plan.map_exprs(&mut |expr| {
            expr.transform(&mut |node| match node {
                Expr::Override { body, bindings } => {
                    spliced += 1;
                    let mut substitution = bindings
                        .into_iter()
                        .fold(ParamSubstitution::new(), |substitution, (param, local)| {
                            substitution.with(param, Expr::Local(local))
                        });
                    substitution.apply(*body)
                }
                other => Ok(other),
            })
        })?;
        Ok(spliced > 0)
    }

    fn description(&self) -> &'static str {
        "Replaces override placeholder parameters with the plan's source and destination locals"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::plan::Stmt,
        expr::{BinaryOp, Param},
        metadata::typesystem::{TypeBuilder, TypeRegistry},
    };

    #[test]
    fn test_override_is_unwrapped_and_bound() {
        let registry = TypeRegistry::new();
        let string = registry.string();
        let person = TypeBuilder::class(&registry, "Demo", "Person")
            .property("First", &string)
            .property("Last", &string)
            .build();

        let p = Param::new("p", &person);
        let body = Expr::binary(
            BinaryOp::Concat,
            Expr::param(&p).path("First").unwrap(),
            Expr::param(&p).path("Last").unwrap(),
        );

        let mut plan = MappingPlan::new(&person, &string, None);
        plan.body = vec![Stmt::Return(Expr::Override {
            body: Box::new(body),
            bindings: vec![(p.id, plan.source)],
        })];

        let changed = SubstitutionPass::new()
            .run(&mut plan, &MapperConfig::default())
            .unwrap();
        assert!(changed);

        let Stmt::Return(value) = &plan.body[0] else {
            panic!("expected the return");
        };
        assert_eq!(value.to_string(), "($0.First ++ $0.Last)");
        assert!(!value.references(p.id));
    }

    #[test]
    fn test_plan_without_overrides_is_unchanged() {
        let registry = TypeRegistry::new();
        let object = registry.object();
        let mut plan = MappingPlan::new(&object, &object, None);
        plan.body = vec![Stmt::Return(Expr::Local(plan.source))];

        let changed = SubstitutionPass::new()
            .run(&mut plan, &MapperConfig::default())
            .unwrap();
        assert!(!changed);
    }
}
