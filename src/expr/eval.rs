//! Tree-walking expression evaluation.

use std::{cmp::Ordering, sync::Arc};

use crate::{
    expr::{AggregateKind, BinaryOp, Expr, Lambda, LocalId, ParamId},
    metadata::typesystem::{MapTypeRc, PrimitiveKind},
    value::{
        convert, convert_primitive, parse_date, to_text, Callable, SequenceRef, Value,
    },
    Error, Result,
};

/// Evaluation environment: plan locals plus bound lambda parameters
#[derive(Clone, Debug, Default)]
pub struct Frame {
    locals: Vec<Value>,
    params: Vec<(ParamId, Value)>,
}

impl Frame {
    /// A frame with `count` locals, all `null`
    #[must_use]
    pub fn new(count: usize) -> Self {
        Frame {
            locals: vec![Value::Null; count],
            params: Vec::new(),
        }
    }

    /// Read a local
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the local does not exist.
    pub fn local(&self, id: LocalId) -> Result<Value> {
        self.locals
            .get(id.0)
            .cloned()
            .ok_or_else(|| Error::Evaluation(format!("unknown local {id}")))
    }

    /// Mutable access to a local
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the local does not exist.
    pub fn local_mut(&mut self, id: LocalId) -> Result<&mut Value> {
        self.locals
            .get_mut(id.0)
            .ok_or_else(|| Error::Evaluation(format!("unknown local {id}")))
    }

    /// Write a local
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the local does not exist.
    pub fn set_local(&mut self, id: LocalId, value: Value) -> Result<()> {
        *self.local_mut(id)? = value;
        Ok(())
    }

    /// Bind a parameter, shadowing earlier bindings of the same parameter
    pub fn bind(&mut self, param: ParamId, value: Value) {
        self.params.push((param, value));
    }

    /// Read a bound parameter
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the parameter is not bound.
    pub fn param(&self, param: ParamId) -> Result<Value> {
        self.params
            .iter()
            .rev()
            .find(|(id, _)| *id == param)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| Error::Evaluation(format!("unbound parameter {param:?}")))
    }
}

/// An evaluated lambda with the frame it was created in
#[derive(Debug)]
pub struct Closure {
    lambda: Arc<Lambda>,
    frame: Frame,
}

impl Closure {
    /// Capture `lambda` in `frame`
    #[must_use]
    pub fn new(lambda: Arc<Lambda>, frame: Frame) -> Self {
        Closure { lambda, frame }
    }

    /// Number of declared parameters
    #[must_use]
    pub fn arity(&self) -> usize {
        self.lambda.params.len()
    }

    /// Call the closure
    ///
    /// # Errors
    /// Returns [`Error::Argument`] on arity mismatch and any error of the body.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.arity() {
            return Err(Error::Argument(format!(
                "lambda expects {} arguments, got {}",
                self.arity(),
                args.len()
            )));
        }

        let mut frame = self.frame.clone();
        for (param, arg) in self.lambda.params.iter().zip(args) {
            frame.bind(param.id, arg.clone());
        }
        evaluate(&self.lambda.body, &frame)
    }
}

/// Evaluate `expr` in `frame`.
///
/// # Errors
/// Returns [`Error::Evaluation`] for null dereferences, failed conversions and type mismatches,
/// and any error reported by called functions.
pub fn evaluate(expr: &Expr, frame: &Frame) -> Result<Value> {
    match expr {
        Expr::Param(param) => frame.param(param.id),
        Expr::Local(id) => frame.local(*id),
        Expr::Const(value) => Ok(value.clone()),
        Expr::Captured { cell, .. } => Ok(read_lock!(cell).clone()),
        Expr::Member {
            target,
            member,
            null_safe,
        } => {
            let target = evaluate(target, frame)?;
            if *null_safe && target.is_null() {
                return Ok(Value::Null);
            }
            target.get_member(member)
        }
        Expr::Count(inner) => {
            let sequence = evaluate(inner, frame)?;
            Ok(Value::I4(count_of(&sequence)?))
        }
        Expr::Index { sequence, index } => {
            let sequence = evaluate(sequence, frame)?;
            let index = evaluate(index, frame)?;
            element_at(&sequence, &index)
        }
        Expr::Binary { op, left, right } => binary(*op, left, right, frame),
        Expr::Convert { expr, ty } => convert(&evaluate(expr, frame)?, ty),
        Expr::ToText(inner) => to_text(&evaluate(inner, frame)?),
        Expr::ParseDate { expr, culture } => parse_date(&evaluate(expr, frame)?, *culture),
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            if truthy(&evaluate(test, frame)?)? {
                evaluate(then, frame)
            } else {
                evaluate(otherwise, frame)
            }
        }
        Expr::IsNull(inner) => Ok(Value::Boolean(evaluate(inner, frame)?.is_null())),
        Expr::Coalesce(left, right) => {
            let value = evaluate(left, frame)?;
            if value.is_null() {
                evaluate(right, frame)
            } else {
                Ok(value)
            }
        }
        Expr::Default(ty) => Ok(Value::default_for(ty)),
        Expr::New { ty, inits } => {
            let mut instance = Value::new_instance(ty);
            for (member, init) in inits {
                let value = evaluate(init, frame)?;
                instance.set_member(member, value)?;
            }
            Ok(instance)
        }
        Expr::Bind { target, bindings } => {
            let mut instance = evaluate(target, frame)?;
            for (member, binding) in bindings {
                let value = evaluate(binding, frame)?;
                instance.set_member(member, value)?;
            }
            Ok(instance)
        }
        Expr::NewObject(ty) => Ok(Value::new_instance(ty)),
        Expr::NewSequence { ty, len } => {
            let items = match len {
                Some(len) => {
                    let len = usize_of(&evaluate(len, frame)?)?;
                    let element = ty
                        .element_type()
                        .map_or(Value::Null, |element| Value::default_for(&element));
                    vec![element; len]
                }
                None => Vec::new(),
            };
            Ok(Value::Sequence(SequenceRef::new(ty, items)))
        }
        Expr::Aggregate {
            kind,
            source,
            selector,
            ty,
        } => aggregate(*kind, &evaluate(source, frame)?, selector.as_ref(), ty, frame),
        Expr::Lambda(lambda) => Ok(Value::Func(Callable::Closure(Arc::new(Closure::new(
            lambda.clone(),
            frame.clone(),
        ))))),
        Expr::Invoke { callee, args } => {
            let callee = evaluate(callee, frame)?;
            let args = evaluate_all(args, frame)?;
            match callee {
                Value::Func(callable) => callable.call(&args),
                other => Err(Error::Evaluation(format!(
                    "{} is not callable",
                    other.kind_name()
                ))),
            }
        }
        Expr::Call { func, args } => func.call(&evaluate_all(args, frame)?),
        Expr::Override { body, bindings } => {
            let mut inner = frame.clone();
            for (param, local) in bindings {
                inner.bind(*param, frame.local(*local)?);
            }
            evaluate(body, &inner)
        }
    }
}

fn evaluate_all(args: &[Expr], frame: &Frame) -> Result<Vec<Value>> {
    args.iter().map(|arg| evaluate(arg, frame)).collect()
}

pub(crate) fn truthy(value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        Error::Evaluation(format!("expected a Boolean, got {}", value.kind_name()))
    })
}

fn count_of(sequence: &Value) -> Result<i32> {
    match sequence {
        Value::Sequence(sequence) => i32::try_from(sequence.len()?)
            .map_err(|_| Error::Evaluation("collection too large".to_string())),
        Value::Null => Err(Error::Evaluation(
            "null reference reading Count".to_string(),
        )),
        other => Err(Error::Evaluation(format!(
            "{} is not a collection",
            other.kind_name()
        ))),
    }
}

pub(crate) fn usize_of(value: &Value) -> Result<usize> {
    match convert_primitive(value, PrimitiveKind::I8)? {
        Value::I8(v) => usize::try_from(v)
            .map_err(|_| Error::Evaluation(format!("{v} is not a valid index or length"))),
        other => Err(Error::Evaluation(format!(
            "{} is not an integral value",
            other.kind_name()
        ))),
    }
}

pub(crate) fn element_at(sequence: &Value, index: &Value) -> Result<Value> {
    match sequence {
        Value::Sequence(sequence) => sequence.get(usize_of(index)?),
        Value::Null => Err(Error::Evaluation(
            "null reference indexing a collection".to_string(),
        )),
        other => Err(Error::Evaluation(format!(
            "{} is not indexable",
            other.kind_name()
        ))),
    }
}

fn aggregate(
    kind: AggregateKind,
    source: &Value,
    selector: Option<&Arc<Lambda>>,
    ty: &MapTypeRc,
    frame: &Frame,
) -> Result<Value> {
    let items = match source {
        Value::Sequence(sequence) => sequence.items()?,
        Value::Null => {
            return Err(Error::Evaluation(format!(
                "null reference in {kind} aggregation"
            )))
        }
        other => {
            return Err(Error::Evaluation(format!(
                "{} is not a collection",
                other.kind_name()
            )))
        }
    };

    match kind {
        AggregateKind::Count => convert(&Value::I8(items.len() as i64), ty),
        AggregateKind::Sum => {
            let selector = selector.map(|lambda| Closure::new(lambda.clone(), frame.clone()));
            let mut total = Value::default_for(ty);
            for item in items {
                let value = match &selector {
                    Some(selector) => selector.call(std::slice::from_ref(&item))?,
                    None => item,
                };
                if value.is_null() {
                    continue;
                }
                total = arithmetic(BinaryOp::Add, &total, &value)?;
            }
            convert(&total, ty)
        }
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, frame: &Frame) -> Result<Value> {
    match op {
        BinaryOp::AndAlso => {
            if !truthy(&evaluate(left, frame)?)? {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(truthy(&evaluate(right, frame)?)?))
        }
        BinaryOp::OrElse => {
            if truthy(&evaluate(left, frame)?)? {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(truthy(&evaluate(right, frame)?)?))
        }
        _ => {
            let left = evaluate(left, frame)?;
            let right = evaluate(right, frame)?;
            match op {
                BinaryOp::Concat => concat(&left, &right),
                BinaryOp::Equal => Ok(Value::Boolean(equals(&left, &right)?)),
                BinaryOp::NotEqual => Ok(Value::Boolean(!equals(&left, &right)?)),
                BinaryOp::LessThan => Ok(Value::Boolean(
                    compare(&left, &right)? == Some(Ordering::Less),
                )),
                BinaryOp::GreaterThan => Ok(Value::Boolean(
                    compare(&left, &right)? == Some(Ordering::Greater),
                )),
                BinaryOp::Add if left.as_str().is_some() || right.as_str().is_some() => {
                    concat(&left, &right)
                }
                _ => arithmetic(op, &left, &right),
            }
        }
    }
}

fn concat(left: &Value, right: &Value) -> Result<Value> {
    let mut text = String::new();
    for part in [left, right] {
        if let Value::String(part) = to_text(part)? {
            text.push_str(&part);
        }
    }
    Ok(Value::string(&text))
}

fn numeric_kind(value: &Value) -> Option<PrimitiveKind> {
    Some(match value {
        Value::Char(_) => PrimitiveKind::Char,
        Value::I1(_) => PrimitiveKind::I1,
        Value::U1(_) => PrimitiveKind::U1,
        Value::I2(_) => PrimitiveKind::I2,
        Value::U2(_) => PrimitiveKind::U2,
        Value::I4(_) => PrimitiveKind::I4,
        Value::U4(_) => PrimitiveKind::U4,
        Value::I8(_) => PrimitiveKind::I8,
        Value::U8(_) => PrimitiveKind::U8,
        Value::R4(_) => PrimitiveKind::R4,
        Value::R8(_) => PrimitiveKind::R8,
        Value::Decimal(_) => PrimitiveKind::Decimal,
        _ => return None,
    })
}

/// Binary numeric promotion, everything narrower than `Int32` widens to `Int32`
fn promote(left: PrimitiveKind, right: PrimitiveKind) -> PrimitiveKind {
    use PrimitiveKind::{Decimal, I4, I8, R4, R8, U4, U8};

    let either = |kind| left == kind || right == kind;
    if either(Decimal) {
        Decimal
    } else if either(R8) {
        R8
    } else if either(R4) {
        R4
    } else if either(U8) {
        U8
    } else if either(I8) {
        I8
    } else if left == U4 && right == U4 {
        U4
    } else if either(U4) {
        I8
    } else {
        I4
    }
}

/// Both operands converted to their promoted common type, `None` if either is not numeric
fn promoted(left: &Value, right: &Value) -> Result<Option<(Value, Value)>> {
    match (numeric_kind(left), numeric_kind(right)) {
        (Some(l), Some(r)) => {
            let kind = promote(l, r);
            Ok(Some((
                convert_primitive(left, kind)?,
                convert_primitive(right, kind)?,
            )))
        }
        _ => Ok(None),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let Some(operands) = promoted(left, right)? else {
        return Err(Error::Evaluation(format!(
            "operator {op} is not defined for {} and {}",
            left.kind_name(),
            right.kind_name()
        )));
    };

    macro_rules! integral {
        ($variant:ident, $x:expr, $y:expr) => {
            Value::$variant(match op {
                BinaryOp::Subtract => $x.wrapping_sub($y),
                BinaryOp::Multiply => $x.wrapping_mul($y),
                _ => $x.wrapping_add($y),
            })
        };
    }

    macro_rules! floating {
        ($variant:ident, $x:expr, $y:expr) => {
            Value::$variant(match op {
                BinaryOp::Subtract => $x - $y,
                BinaryOp::Multiply => $x * $y,
                _ => $x + $y,
            })
        };
    }

    Ok(match operands {
        (Value::I4(x), Value::I4(y)) => integral!(I4, x, y),
        (Value::U4(x), Value::U4(y)) => integral!(U4, x, y),
        (Value::I8(x), Value::I8(y)) => integral!(I8, x, y),
        (Value::U8(x), Value::U8(y)) => integral!(U8, x, y),
        (Value::R4(x), Value::R4(y)) => floating!(R4, x, y),
        (Value::R8(x), Value::R8(y)) => floating!(R8, x, y),
        (Value::Decimal(x), Value::Decimal(y)) => {
            let result = match op {
                BinaryOp::Subtract => x.checked_sub(y),
                BinaryOp::Multiply => x.checked_mul(y),
                _ => x.checked_add(y),
            };
            Value::Decimal(
                result.ok_or_else(|| Error::Evaluation("Decimal overflow".to_string()))?,
            )
        }
        (l, r) => {
            return Err(Error::Evaluation(format!(
                "operator {op} is not defined for {} and {}",
                l.kind_name(),
                r.kind_name()
            )))
        }
    })
}

fn equals(left: &Value, right: &Value) -> Result<bool> {
    match promoted(left, right)? {
        Some((l, r)) => Ok(l == r),
        None => Ok(left == right),
    }
}

fn compare(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    if let (Value::DateTime(l), Value::DateTime(r)) = (left, right) {
        return Ok(Some(l.cmp(r)));
    }

    Ok(match promoted(left, right)? {
        Some((Value::I4(l), Value::I4(r))) => Some(l.cmp(&r)),
        Some((Value::U4(l), Value::U4(r))) => Some(l.cmp(&r)),
        Some((Value::I8(l), Value::I8(r))) => Some(l.cmp(&r)),
        Some((Value::U8(l), Value::U8(r))) => Some(l.cmp(&r)),
        Some((Value::R4(l), Value::R4(r))) => l.partial_cmp(&r),
        Some((Value::R8(l), Value::R8(r))) => l.partial_cmp(&r),
        Some((Value::Decimal(l), Value::Decimal(r))) => Some(l.cmp(&r)),
        _ => None,
    })
}
