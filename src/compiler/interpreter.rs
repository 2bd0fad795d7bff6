//! Interpreted execution of mapping plans.
//!
//! The interpreter walks the statements of a [`MappingPlan`] directly, evaluating expressions with
//! [`evaluate`]. It accepts every plan, including plans touching non-public surface, and is the
//! path every emission failure falls back to.

use crate::{
    compiler::plan::{MappingPlan, Place, Stmt},
    expr::{evaluate, truthy, usize_of, Frame, LocalId},
    value::Value,
    Error, Result,
};

/// Outcome of running a statement
pub(crate) enum Flow {
    /// Continue with the next statement
    Continue,
    /// The plan returned
    Return(Value),
}

/// Run `plan` with its source, existing destination and extra argument.
///
/// # Errors
/// Returns [`Error::Evaluation`] for runtime failures of the plan, for a missing extra argument
/// of a plan that takes one, and for a plan that ends without returning.
pub fn execute(
    plan: &MappingPlan,
    source: &Value,
    destination: &Value,
    extra: Option<&Value>,
) -> Result<Value> {
    let mut frame = enter(
        plan.locals.len(),
        plan.source,
        plan.destination,
        plan.extra,
        source,
        destination,
        extra,
    )?;

    match run_block(&plan.body, &mut frame)? {
        Flow::Return(value) => Ok(value),
        Flow::Continue => Err(Error::Evaluation(format!(
            "mapping {} ended without a result",
            plan.pair
        ))),
    }
}

/// Build the initial frame of a plan invocation
pub(crate) fn enter(
    locals: usize,
    source_local: LocalId,
    destination_local: LocalId,
    extra_local: Option<LocalId>,
    source: &Value,
    destination: &Value,
    extra: Option<&Value>,
) -> Result<Frame> {
    let mut frame = Frame::new(locals);
    frame.set_local(source_local, source.clone())?;
    frame.set_local(destination_local, destination.clone())?;

    match (extra_local, extra) {
        (Some(local), Some(extra)) => frame.set_local(local, extra.clone())?,
        (Some(_), None) => {
            return Err(Error::Evaluation(
                "mapping expects an extra argument".to_string(),
            ))
        }
        (None, _) => {}
    }
    Ok(frame)
}

fn run_block(body: &[Stmt], frame: &mut Frame) -> Result<Flow> {
    for stmt in body {
        if let Flow::Return(value) = run(stmt, frame)? {
            return Ok(Flow::Return(value));
        }
    }
    Ok(Flow::Continue)
}

fn run(stmt: &Stmt, frame: &mut Frame) -> Result<Flow> {
    match stmt {
        Stmt::Assign { place, value } => {
            let value = evaluate(value, frame)?;
            assign(frame, place, value)?;
        }
        Stmt::If {
            test,
            then,
            otherwise,
        } => {
            let branch = if truthy(&evaluate(test, frame)?)? {
                then
            } else {
                otherwise
            };
            return run_block(branch, frame);
        }
        Stmt::ForIndex { index, count, body } => {
            let count = usize_of(&evaluate(count, frame)?)?;
            for i in 0..count {
                frame.set_local(*index, index_value(i)?)?;
                if let Flow::Return(value) = run_block(body, frame)? {
                    return Ok(Flow::Return(value));
                }
            }
        }
        Stmt::ForEach {
            cursor,
            sequence,
            body,
        } => {
            let sequence = evaluate(sequence, frame)?;
            if sequence.is_null() {
                return Err(Error::Evaluation(
                    "null reference enumerating a collection".to_string(),
                ));
            }
            for item in sequence.items()? {
                frame.set_local(*cursor, item)?;
                if let Flow::Return(value) = run_block(body, frame)? {
                    return Ok(Flow::Return(value));
                }
            }
        }
        Stmt::Append { sequence, value } => {
            let value = evaluate(value, frame)?;
            append(frame, *sequence, value)?;
        }
        Stmt::Return(value) => return Ok(Flow::Return(evaluate(value, frame)?)),
    }
    Ok(Flow::Continue)
}

/// Store `value` into `place`; struct members are updated in the local holding the struct
pub(crate) fn assign(frame: &mut Frame, place: &Place, value: Value) -> Result<()> {
    match place {
        Place::Local(local) => frame.set_local(*local, value),
        Place::Member { target, member } => frame.local_mut(*target)?.set_member(member, value),
        Place::Element { sequence, index } => {
            let index = usize_of(&frame.local(*index)?)?;
            match frame.local(*sequence)? {
                Value::Sequence(sequence) => sequence.set(index, value),
                other => Err(Error::Evaluation(format!(
                    "cannot store an element into {}",
                    other.kind_name()
                ))),
            }
        }
    }
}

/// Append `value` to the growable collection held by `sequence`
pub(crate) fn append(frame: &Frame, sequence: LocalId, value: Value) -> Result<()> {
    match frame.local(sequence)? {
        Value::Sequence(sequence) => sequence.push(value),
        other => Err(Error::Evaluation(format!(
            "cannot append to {}",
            other.kind_name()
        ))),
    }
}

pub(crate) fn index_value(index: usize) -> Result<Value> {
    i32::try_from(index)
        .map(Value::I4)
        .map_err(|_| Error::Evaluation(format!("loop index {index} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::Expr,
        metadata::typesystem::{PrimitiveKind, TypeBuilder, TypeRegistry},
        value::SequenceRef,
    };

    #[test]
    fn test_assign_member_and_return() {
        let registry = TypeRegistry::new();
        let string = registry.string();
        let person = TypeBuilder::class(&registry, "Demo", "Person")
            .property("Name", &string)
            .build();
        let name = person.member("Name", false).unwrap();

        let mut plan = MappingPlan::new(&string, &person, None);
        plan.body = vec![
            Stmt::Assign {
                place: Place::Local(plan.destination),
                value: Expr::NewObject(person.clone()),
            },
            Stmt::Assign {
                place: Place::Member {
                    target: plan.destination,
                    member: name,
                },
                value: Expr::Local(plan.source),
            },
            Stmt::Return(Expr::Local(plan.destination)),
        ];

        let result = execute(&plan, &Value::string("Ada"), &Value::Null, None).unwrap();
        assert_eq!(result.field("Name").unwrap(), Value::string("Ada"));
    }

    #[test]
    fn test_loops_fill_sequences() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);
        let list = registry.list_of(&int);
        let array = registry.array_of(&int);

        let mut plan = MappingPlan::new(&list, &array, None);
        let index = plan.declare("i", &int);
        let copy = plan.declare("copy", &list);
        let item = plan.declare("item", &int);
        plan.body = vec![
            Stmt::Assign {
                place: Place::Local(plan.destination),
                value: Expr::NewSequence {
                    ty: array.clone(),
                    len: Some(Box::new(Expr::Local(plan.source).count())),
                },
            },
            Stmt::ForIndex {
                index,
                count: Expr::Local(plan.source).count(),
                body: vec![Stmt::Assign {
                    place: Place::Element {
                        sequence: plan.destination,
                        index,
                    },
                    value: Expr::Index {
                        sequence: Box::new(Expr::Local(plan.source)),
                        index: Box::new(Expr::Local(index)),
                    },
                }],
            },
            Stmt::Assign {
                place: Place::Local(copy),
                value: Expr::NewSequence { ty: list.clone(), len: None },
            },
            Stmt::ForEach {
                cursor: item,
                sequence: Expr::Local(plan.destination),
                body: vec![Stmt::Append {
                    sequence: copy,
                    value: Expr::Local(item),
                }],
            },
            Stmt::Return(Expr::Local(copy)),
        ];

        let source = Value::Sequence(SequenceRef::new(&list, vec![Value::I4(3), Value::I4(4)]));
        let result = execute(&plan, &source, &Value::Null, None).unwrap();
        assert_eq!(result.items().unwrap(), vec![Value::I4(3), Value::I4(4)]);
    }

    #[test]
    fn test_missing_return_and_extra_are_errors() {
        let registry = TypeRegistry::new();
        let object = registry.object();

        let plan = MappingPlan::new(&object, &object, None);
        assert!(matches!(
            execute(&plan, &Value::Null, &Value::Null, None),
            Err(Error::Evaluation(_))
        ));

        let mut with_extra = MappingPlan::new(&object, &object, Some(&object));
        with_extra.body = vec![Stmt::Return(Expr::Local(LocalId(2)))];
        assert!(execute(&with_extra, &Value::Null, &Value::Null, None).is_err());
        assert_eq!(
            execute(&with_extra, &Value::Null, &Value::Null, Some(&Value::I4(9))).unwrap(),
            Value::I4(9)
        );
    }
}
