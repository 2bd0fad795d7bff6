//! Null-safety rewriting of override expressions.
//!
//! User overrides navigate freely (`c => c.Company.Address.City`); generated code does not. This
//! pass turns every navigation inside a spliced override body into a null-propagating access, so
//! a `null` anywhere along the chain yields `null` instead of failing the whole mapping.
//!
//! # Exemptions
//!
//! - Accesses directly on a parameter or local (`c.Company`): the boundary itself is guarded by
//!   the plan's null checks
//! - Accesses on value-typed targets, which cannot be `null`
//! - Container sizes (`Orders.Count`), which are never rewritten
//!
//! # Example
//!
//! Before:
//! ```text
//! {c.Company.Address.City}
//! ```
//!
//! After:
//! ```text
//! {c.Company?.Address?.City}
//! ```

use crate::{
    compiler::{pass::PlanPass, plan::MappingPlan},
    config::MapperConfig,
    expr::Expr,
    metadata::typesystem::TypeFlavor,
    Result,
};

/// Makes member chains inside override bodies null-propagating
pub struct NullSafetyPass;

impl Default for NullSafetyPass {
    fn default() -> Self {
        Self::new()
    }
}

impl NullSafetyPass {
    /// Creates a new null-safety pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_exempt(target: &Expr) -> bool {
        if matches!(target, Expr::Param(_) | Expr::Local(_)) {
            return true;
        }
        target.static_type().is_some_and(|ty| {
            ty.flavor.is_value_type() && !matches!(ty.flavor, TypeFlavor::Nullable)
        })
    }

    /// Rewrite one override body, counting the accesses made null-safe
    fn rewrite_body(body: Expr, rewritten: &mut usize) -> Result<Expr> {
        body.transform(&mut |node| match node {
            Expr::Member {
                target,
                member,
                null_safe: false,
            } if !Self::is_exempt(&target) => {
                *rewritten += 1;
                Ok(Expr::Member {
                    target,
                    member,
                    null_safe: true,
                })
            }
            other => Ok(other),
        })
    }
}

impl PlanPass for NullSafetyPass {
    fn name(&self) -> &'static str {
        "null-safety"
    }

    fn should_run(&self, _plan: &MappingPlan, config: &MapperConfig) -> bool {
        config.null_safety
    }

    fn run(&self, plan: &mut MappingPlan, _config: &MapperConfig) -> Result<bool> {
        let mut rewritten = 0;
        plan.map_exprs(&mut |expr| {
            expr.transform(&mut |node| match node {
                Expr::Override { body, bindings } => Ok(Expr::Override {
                    body: Box::new(Self::rewrite_body(*body, &mut rewritten)?),
                    bindings,
                }),
                other => Ok(other),
            })
        })?;
        Ok(rewritten > 0)
    }

    fn description(&self) -> &'static str {
        "Rewrites member chains in override expressions into null-propagating chains"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::plan::{Place, Stmt},
        expr::{LocalId, Param},
        metadata::typesystem::{TypeBuilder, TypeRegistry},
    };

    #[test]
    fn test_rewrites_only_override_chains() {
        let registry = TypeRegistry::new();
        let string = registry.string();
        let address = TypeBuilder::class(&registry, "Demo", "Address")
            .property("City", &string)
            .build();
        let company = TypeBuilder::class(&registry, "Demo", "Company")
            .property("Address", &address)
            .build();
        let dto = TypeBuilder::class(&registry, "Demo", "CompanyDto")
            .property("City", &string)
            .build();

        let c = Param::new("c", &company);
        let body = Expr::param(&c).path("Address.City").unwrap();
        let generated = Expr::Local(LocalId(0))
            .member(&company.member("Address", false).unwrap())
            .member(&address.member("City", false).unwrap());

        let mut plan = MappingPlan::new(&company, &dto, None);
        let city = dto.member("City", false).unwrap();
        plan.body = vec![
            Stmt::Assign {
                place: Place::Member {
                    target: plan.destination,
                    member: city.clone(),
                },
                value: Expr::Override {
                    body: Box::new(body),
                    bindings: vec![(c.id, plan.source)],
                },
            },
            Stmt::Assign {
                place: Place::Member {
                    target: plan.destination,
                    member: city,
                },
                value: generated,
            },
            Stmt::Return(Expr::Local(plan.destination)),
        ];

        let changed = NullSafetyPass::new()
            .run(&mut plan, &MapperConfig::default())
            .unwrap();
        assert!(changed);

        let Stmt::Assign { value, .. } = &plan.body[0] else {
            panic!("expected the assignment");
        };
        assert_eq!(value.to_string(), "{c.Address?.City}");

        let Stmt::Assign { value, .. } = &plan.body[1] else {
            panic!("expected the assignment");
        };
        assert_eq!(value.to_string(), "$0.Address.City");
    }

    #[test]
    fn test_value_typed_targets_are_exempt() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(crate::metadata::typesystem::PrimitiveKind::I4);
        let point = TypeBuilder::value_type(&registry, "Demo", "Point")
            .field("X", &int)
            .build();
        let shape = TypeBuilder::class(&registry, "Demo", "Shape")
            .property("Origin", &point)
            .build();

        let s = Param::new("s", &shape);
        let body = Expr::param(&s).path("Origin.X").unwrap();
        let rewritten = NullSafetyPass::rewrite_body(body, &mut 0).unwrap();
        assert_eq!(rewritten.to_string(), "s.Origin.X");
    }

    #[test]
    fn test_disabled_by_config() {
        let registry = TypeRegistry::new();
        let object = registry.object();
        let plan = MappingPlan::new(&object, &object, None);
        let config = MapperConfig::default().with_null_safety(false);
        assert!(!NullSafetyPass::new().should_run(&plan, &config));
    }
}
