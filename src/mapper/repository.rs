//! Hand-authored plans supplied by the caller.
//!
//! A [`PlanRepository`] is consulted before a pair is resolved. A [`PrebuiltPlan`] it returns
//! replaces the whole boundary: the compiled mapping calls it with the source and the existing
//! destination and uses whatever it returns.

use std::{cell::RefCell, collections::HashSet, fmt, sync::Arc};

use crate::{metadata::typesystem::TypePair, value::NativeFn, value::Value, Error, Result};

/// Signature of a prebuilt plan, called with `(source, existing destination)`
pub type PrebuiltFn = dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync;

thread_local! {
    /// Prebuilt plans currently running on this thread
    static IN_USE: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Removes a plan from the in-use set, also on error paths
struct InUseGuard(usize);

impl Drop for InUseGuard {
    fn drop(&mut self) {
        IN_USE.with(|set| {
            set.borrow_mut().remove(&self.0);
        });
    }
}

/// A caller-supplied plan for one pair
#[derive(Clone)]
pub struct PrebuiltPlan {
    name: Arc<str>,
    func: Arc<PrebuiltFn>,
}

impl PrebuiltPlan {
    /// Wrap a function as a prebuilt plan
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        PrebuiltPlan {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    /// Name, for diagnostics
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the plan.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if this plan is already running on the current thread, and any
    /// error of the plan itself.
    pub fn invoke(&self, source: &Value, destination: &Value) -> Result<Value> {
        let key = Arc::as_ptr(&self.func).cast::<()>() as usize;
        let entered = IN_USE.with(|set| set.borrow_mut().insert(key));
        if !entered {
            return Err(Error::Argument(format!(
                "prebuilt plan '{}' is already in use on this thread",
                self.name
            )));
        }
        let _guard = InUseGuard(key);

        (self.func)(source, destination)
    }

    /// The plan as a native function of `(source, existing destination)`, for lowering
    #[must_use]
    pub fn as_native(&self) -> NativeFn {
        let plan = self.clone();
        NativeFn::new(&format!("Prebuilt.{}", self.name), move |args| {
            let source = args.first().cloned().unwrap_or_default();
            let destination = args.get(1).cloned().unwrap_or_default();
            plan.invoke(&source, &destination)
        })
    }
}

impl fmt::Debug for PrebuiltPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrebuiltPlan")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Supplies prebuilt plans by pair
pub trait PlanRepository: Send + Sync {
    /// The prebuilt plan for `pair`, if the repository has one
    fn try_get_prebuilt_plan(&self, pair: TypePair) -> Option<PrebuiltPlan>;
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    };

    use super::*;

    #[test]
    fn test_invoke_passes_arguments() {
        let plan = PrebuiltPlan::new("echo", |source, _| Ok(source.clone()));
        let result = plan.invoke(&Value::from(7), &Value::Null).unwrap();
        assert_eq!(result, Value::I4(7));
    }

    #[test]
    fn test_reentrant_use_is_an_error() {
        static PLAN: OnceLock<PrebuiltPlan> = OnceLock::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let plan = PLAN.get_or_init(|| {
            PrebuiltPlan::new("reentrant", |source, destination| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                PLAN.get()
                    .ok_or(Error::LockError)?
                    .invoke(source, destination)
            })
        });

        let result = plan.invoke(&Value::Null, &Value::Null);
        assert!(matches!(result, Err(Error::Argument(_))));

        // released on the error path, so the outer call runs again
        let again = plan.invoke(&Value::Null, &Value::Null);
        assert!(matches!(again, Err(Error::Argument(_))));
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }
}
