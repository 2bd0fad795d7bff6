use std::collections::HashMap;

use crate::{
    expr::{Expr, ParamId},
    Result,
};

/// A post-order expression rewrite.
///
/// `rewrite` is called once per node after all children of that node have been rewritten.
/// Returning the node unchanged keeps it.
pub trait ExprRewriter {
    /// Rewrite one node whose children are already rewritten
    ///
    /// # Errors
    /// Implementations may reject a node, which aborts the whole rewrite.
    fn rewrite(&mut self, expr: Expr) -> Result<Expr>;

    /// Apply this rewriter to every node of `expr`
    ///
    /// # Errors
    /// Returns the first error reported by [`ExprRewriter::rewrite`].
    fn apply(&mut self, expr: Expr) -> Result<Expr>
    where
        Self: Sized,
    {
        expr.transform(&mut |node| self.rewrite(node))
    }
}

/// Replaces parameters with arbitrary expressions
#[derive(Default)]
pub struct ParamSubstitution {
    replacements: HashMap<ParamId, Expr>,
}

impl ParamSubstitution {
    /// Create an empty substitution
    #[must_use]
    pub fn new() -> Self {
        ParamSubstitution {
            replacements: HashMap::new(),
        }
    }

    /// Replace every occurrence of `param` with `replacement`
    #[must_use]
    pub fn with(mut self, param: ParamId, replacement: Expr) -> Self {
        self.replacements.insert(param, replacement);
        self
    }

    /// Returns `true` if nothing is replaced
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }
}

impl ExprRewriter for ParamSubstitution {
    fn rewrite(&mut self, expr: Expr) -> Result<Expr> {
        if let Expr::Param(param) = &expr {
            if let Some(replacement) = self.replacements.get(&param.id) {
                return Ok(replacement.clone());
            }
        }
        Ok(expr)
    }
}
