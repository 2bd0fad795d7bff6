//! Native emission of mapping plans.
//!
//! Emission translates a plan once into a tree of boxed Rust closures, one per statement, with
//! the frequent expression shapes (locals, constants, member reads on locals, null tests,
//! conversions, conditionals) compiled into dedicated closures and everything else delegated to
//! [`evaluate`]. Executing an emitted function therefore never re-dispatches on the statement
//! tree.
//!
//! All emitted functions are registered in one process-wide [`EmissionModule`], created lazily on
//! first use and guarded by a lock while a function is added. The module only holds weak
//! references: a function lives as long as the [`MemberMap`](crate::MemberMap) owning it, and is
//! released when a re-registration drops that map. The slot table itself only grows, by one weak
//! pointer per emission.

use std::{
    fmt,
    sync::{Arc, Mutex, OnceLock, Weak},
};

use log::debug;

use crate::{
    compiler::{
        interpreter::{self, Flow},
        plan::{MappingPlan, Stmt},
    },
    expr::{evaluate, truthy, usize_of, Expr, Frame, LocalId},
    value::{convert, Value},
    Error, Result,
};

type ExprFn = Box<dyn Fn(&Frame) -> Result<Value> + Send + Sync>;
type StmtFn = Box<dyn Fn(&mut Frame) -> Result<Flow> + Send + Sync>;

/// The module tracking every emitted function
pub struct EmissionModule {
    functions: boxcar::Vec<Weak<EmittedFunction>>,
    lock: Mutex<()>,
}

/// Process-wide; slots are appended and never reclaimed
static MODULE: OnceLock<EmissionModule> = OnceLock::new();

impl Default for EmissionModule {
    fn default() -> Self {
        Self::new()
    }
}

impl EmissionModule {
    /// An empty module
    #[must_use]
    pub fn new() -> Self {
        EmissionModule {
            functions: boxcar::Vec::new(),
            lock: Mutex::new(()),
        }
    }

    /// The process-wide module, created on first access
    pub fn global() -> &'static EmissionModule {
        MODULE.get_or_init(|| {
            debug!("creating emission module");
            EmissionModule::new()
        })
    }

    /// Number of functions emitted so far, released ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.count()
    }

    /// Number of emitted functions still owned by a compiled map
    #[must_use]
    pub fn live(&self) -> usize {
        self.functions
            .iter()
            .filter(|(_, function)| function.strong_count() > 0)
            .count()
    }

    /// Returns `true` if nothing was emitted yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emit `plan` into this module.
    ///
    /// # Errors
    /// Returns [`Error::CodeGeneration`] for plans touching non-public surface and
    /// [`Error::LockError`] if the module lock is poisoned.
    pub fn emit(&self, plan: &MappingPlan) -> Result<Arc<EmittedFunction>> {
        if !plan.public {
            return Err(codegen_error!(
                "{} touches non-public surface and cannot be emitted",
                plan.pair
            ));
        }

        let _guard = lock!(self.lock);
        let name = format!(
            "Map_{:08X}_{:08X}",
            plan.pair.source.value(),
            plan.pair.destination.value()
        );
        let function = Arc::new(EmittedFunction {
            name,
            locals: plan.locals.len(),
            source: plan.source,
            destination: plan.destination,
            extra: plan.extra,
            body: compile_block(&plan.body),
        });
        let slot = self.functions.push(Arc::downgrade(&function));
        debug!("emitted {} into slot {slot}", function.name);
        Ok(function)
    }
}

/// A plan compiled into closures
pub struct EmittedFunction {
    name: String,
    locals: usize,
    source: LocalId,
    destination: LocalId,
    extra: Option<LocalId>,
    body: Vec<StmtFn>,
}

impl EmittedFunction {
    /// Name of the function inside the module
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the function.
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] for runtime failures, like the interpreter.
    pub fn invoke(
        &self,
        source: &Value,
        destination: &Value,
        extra: Option<&Value>,
    ) -> Result<Value> {
        let mut frame = interpreter::enter(
            self.locals,
            self.source,
            self.destination,
            self.extra,
            source,
            destination,
            extra,
        )?;

        match run_block(&self.body, &mut frame)? {
            Flow::Return(value) => Ok(value),
            Flow::Continue => Err(Error::Evaluation(format!(
                "{} ended without a result",
                self.name
            ))),
        }
    }
}

impl fmt::Debug for EmittedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmittedFunction")
            .field("name", &self.name)
            .field("statements", &self.body.len())
            .finish_non_exhaustive()
    }
}

fn run_block(body: &[StmtFn], frame: &mut Frame) -> Result<Flow> {
    for stmt in body {
        if let Flow::Return(value) = stmt(frame)? {
            return Ok(Flow::Return(value));
        }
    }
    Ok(Flow::Continue)
}

fn compile_block(body: &[Stmt]) -> Vec<StmtFn> {
    body.iter().map(compile_stmt).collect()
}

fn compile_stmt(stmt: &Stmt) -> StmtFn {
    match stmt {
        Stmt::Assign { place, value } => {
            let place = place.clone();
            let value = compile_expr(value);
            Box::new(move |frame| {
                let value = value(frame)?;
                interpreter::assign(frame, &place, value)?;
                Ok(Flow::Continue)
            })
        }
        Stmt::If {
            test,
            then,
            otherwise,
        } => {
            let test = compile_expr(test);
            let then = compile_block(then);
            let otherwise = compile_block(otherwise);
            Box::new(move |frame| {
                if truthy(&test(frame)?)? {
                    run_block(&then, frame)
                } else {
                    run_block(&otherwise, frame)
                }
            })
        }
        Stmt::ForIndex { index, count, body } => {
            let index = *index;
            let count = compile_expr(count);
            let body = compile_block(body);
            Box::new(move |frame| {
                let count = usize_of(&count(frame)?)?;
                for i in 0..count {
                    frame.set_local(index, interpreter::index_value(i)?)?;
                    if let Flow::Return(value) = run_block(&body, frame)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Continue)
            })
        }
        Stmt::ForEach {
            cursor,
            sequence,
            body,
        } => {
            let cursor = *cursor;
            let sequence = compile_expr(sequence);
            let body = compile_block(body);
            Box::new(move |frame| {
                let sequence = sequence(frame)?;
                if sequence.is_null() {
                    return Err(Error::Evaluation(
                        "null reference enumerating a collection".to_string(),
                    ));
                }
                for item in sequence.items()? {
                    frame.set_local(cursor, item)?;
                    if let Flow::Return(value) = run_block(&body, frame)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Continue)
            })
        }
        Stmt::Append { sequence, value } => {
            let sequence = *sequence;
            let value = compile_expr(value);
            Box::new(move |frame| {
                let value = value(frame)?;
                interpreter::append(frame, sequence, value)?;
                Ok(Flow::Continue)
            })
        }
        Stmt::Return(value) => {
            let value = compile_expr(value);
            Box::new(move |frame| Ok(Flow::Return(value(frame)?)))
        }
    }
}

fn compile_expr(expr: &Expr) -> ExprFn {
    match expr {
        Expr::Local(local) => {
            let local = *local;
            Box::new(move |frame| frame.local(local))
        }
        Expr::Const(value) => {
            let value = value.clone();
            Box::new(move |_| Ok(value.clone()))
        }
        Expr::Member {
            target,
            member,
            null_safe,
        } => {
            let target = compile_expr(target);
            let member = member.clone();
            let null_safe = *null_safe;
            Box::new(move |frame| {
                let target = target(frame)?;
                if null_safe && target.is_null() {
                    return Ok(Value::Null);
                }
                target.get_member(&member)
            })
        }
        Expr::IsNull(inner) => {
            let inner = compile_expr(inner);
            Box::new(move |frame| Ok(Value::Boolean(inner(frame)?.is_null())))
        }
        Expr::Convert { expr, ty } => {
            let inner = compile_expr(expr);
            let ty = ty.clone();
            Box::new(move |frame| convert(&inner(frame)?, &ty))
        }
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            let test = compile_expr(test);
            let then = compile_expr(then);
            let otherwise = compile_expr(otherwise);
            Box::new(move |frame| {
                if truthy(&test(frame)?)? {
                    then(frame)
                } else {
                    otherwise(frame)
                }
            })
        }
        other => {
            let other = other.clone();
            Box::new(move |frame| evaluate(&other, frame))
        }
    }
}
