//! Accessibility scan.
//!
//! Native emission may only touch public surface. This pass walks the finished plan and clears
//! [`MappingPlan::public`] as soon as it finds a non-public type (generic arguments included), a
//! non-public member, a private native function, or a captured host value. The plan itself is
//! never changed.

use log::debug;

use crate::{
    compiler::{pass::PlanPass, plan::MappingPlan, plan::Place, plan::Stmt},
    config::MapperConfig,
    expr::Expr,
    metadata::{member::Member, typesystem::MapType},
    value::{Callable, Value},
    Result,
};

/// Decides whether a plan touches only public surface
pub struct AccessibilityPass;

impl Default for AccessibilityPass {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessibilityPass {
    /// Creates a new accessibility pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn member_is_public(member: &Member) -> bool {
        member.visibility.is_public() && member.ty.upgrade().is_some_and(|ty| ty.is_public())
    }

    /// The first non-public thing a single node touches, for diagnostics
    fn violation(expr: &Expr) -> Option<String> {
        let ty_violation = |ty: &MapType| (!ty.is_public()).then(|| format!("type {ty}"));

        match expr {
            Expr::Captured { name, .. } => Some(format!("captured value {name}")),
            Expr::Const(Value::Func(Callable::Closure(_))) => Some("closure constant".into()),
            Expr::Const(Value::Func(Callable::Native(func))) | Expr::Call { func, .. }
                if !func.is_public() =>
            {
                Some(format!("function {}", func.name()))
            }
            Expr::Member { member, .. } if !Self::member_is_public(member) => {
                Some(format!("member {}", member.qualified_name()))
            }
            Expr::New { ty, inits } => ty_violation(ty).or_else(|| {
                inits
                    .iter()
                    .find(|(member, _)| !Self::member_is_public(member))
                    .map(|(member, _)| format!("member {}", member.qualified_name()))
            }),
            Expr::Bind { bindings, .. } => bindings
                .iter()
                .find(|(member, _)| !Self::member_is_public(member))
                .map(|(member, _)| format!("member {}", member.qualified_name())),
            Expr::Convert { ty, .. }
            | Expr::Default(ty)
            | Expr::NewObject(ty)
            | Expr::NewSequence { ty, .. }
            | Expr::Aggregate { ty, .. } => ty_violation(ty),
            Expr::Lambda(lambda) => lambda
                .params
                .iter()
                .filter_map(|param| param.ty.upgrade())
                .find_map(|ty| ty_violation(&ty)),
            _ => None,
        }
    }

    fn place_violation(place: &Place) -> Option<String> {
        match place {
            Place::Member { member, .. } if !Self::member_is_public(member) => {
                Some(format!("member {}", member.qualified_name()))
            }
            _ => None,
        }
    }

    fn stmt_violation(stmt: &Stmt) -> Option<String> {
        match stmt {
            Stmt::Assign { place, .. } => Self::place_violation(place),
            Stmt::If {
                then, otherwise, ..
            } => then
                .iter()
                .chain(otherwise.iter())
                .find_map(Self::stmt_violation),
            Stmt::ForIndex { body, .. } | Stmt::ForEach { body, .. } => {
                body.iter().find_map(Self::stmt_violation)
            }
            Stmt::Append { .. } | Stmt::Return(_) => None,
        }
    }

    /// Scan `plan`, returning what makes it non-public
    #[must_use]
    pub fn scan(plan: &MappingPlan) -> Option<String> {
        if let Some(local) = plan.locals.iter().find(|local| !local.ty.is_public()) {
            return Some(format!("type {} of local {}", local.ty, local.name));
        }
        if let Some(found) = plan.body.iter().find_map(Self::stmt_violation) {
            return Some(found);
        }

        let mut found = None;
        plan.visit_exprs(&mut |expr| {
            expr.walk(&mut |node| {
                if found.is_none() {
                    found = Self::violation(node);
                }
            });
        });
        found
    }
}

impl PlanPass for AccessibilityPass {
    fn name(&self) -> &'static str {
        "accessibility"
    }

    fn run(&self, plan: &mut MappingPlan, _config: &MapperConfig) -> Result<bool> {
        let public = match Self::scan(plan) {
            Some(reason) => {
                debug!("{} touches non-public surface: {reason}", plan.pair);
                false
            }
            None => true,
        };
        let changed = plan.public != public;
        plan.public = public;
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Flags plans that touch non-public types, members, functions or captured values"
    }
}
