//! Lowering of proposed mapping trees into plans.
//!
//! [`lower`] mirrors the tree recursively: leaves become assignments, complex children construct
//! (or reuse) a nested destination and recurse into it, collection children allocate, iterate
//! and map their elements. Override expressions are spliced in as [`Expr::Override`] nodes so
//! the later passes can still tell them apart from generated code.

use std::sync::Arc;

use dashmap::DashMap;
use log::trace;

use crate::{
    compiler::plan::{MappingPlan, Place, Stmt},
    config::{CollectionPolicy, MapperConfig, NullSourcePolicy},
    expr::{AggregateKind, BinaryOp, Expr, Lambda, LocalId, Param},
    metadata::{
        member::MemberRc,
        provider::{FlattenedPath, PathStep},
        token::Token,
        typesystem::{
            MapType, MapTypeRc, PrimitiveKind, SequenceKind, TypeCompatibility, TypeFlags,
            TypeFlavor, TypeRegistry,
        },
    },
    resolve::{Constructor, ProposedTypeMapping, SequenceShape, SourceAccess},
    value::Value,
    Result,
};

/// Everything lowering reads besides the tree itself
pub struct LowerContext<'a> {
    /// Mapper policy
    pub config: &'a MapperConfig,
    /// Conversion decisions
    pub compat: &'a TypeCompatibility,
    /// Registry, for primitive types used by generated code
    pub registry: &'a TypeRegistry,
    /// Mapper-wide constructor table
    pub constructors: &'a DashMap<Token, Constructor>,
}

/// Lower a proposed mapping tree into an executable plan.
///
/// ## Arguments
/// * 'tree'  - The root of the tree
/// * 'extra' - Type of the extra argument, if the plan takes one
/// * 'ctx'   - Policy and lookup tables
///
/// # Errors
/// Returns [`crate::Error::CodeGeneration`] for types without a usable constructor, malformed
/// constructor templates, text or date conversions while the matching special case is disabled,
/// and overrides reading an extra argument the plan does not take.
pub fn lower(
    tree: &ProposedTypeMapping,
    extra: Option<&MapTypeRc>,
    ctx: &LowerContext<'_>,
) -> Result<MappingPlan> {
    let (source, destination) = match (&tree.sequence, tree.is_enumerable) {
        (Some(shape), true) => (shape.source.clone(), shape.destination.clone()),
        _ => (tree.source_type.clone(), tree.destination_type.clone()),
    };

    let mut lowering = Lowering {
        ctx,
        root: tree,
        plan: MappingPlan::new(&source, &destination, extra),
    };
    let body = lowering.lower_root(tree, &source, &destination)?;
    lowering.plan.body = body;

    trace!(
        "lowered {} -> {} into {} statements",
        source,
        destination,
        lowering.plan.statement_count()
    );
    Ok(lowering.plan)
}

struct Lowering<'a> {
    ctx: &'a LowerContext<'a>,
    root: &'a ProposedTypeMapping,
    plan: MappingPlan,
}

impl Lowering<'_> {
    fn lower_root(
        &mut self,
        tree: &ProposedTypeMapping,
        source: &MapTypeRc,
        destination: &MapTypeRc,
    ) -> Result<Vec<Stmt>> {
        let src = self.plan.source;
        let dst = self.plan.destination;
        let mut body = Vec::new();

        if source.accepts_null() {
            let on_null = match self.ctx.config.null_source {
                NullSourcePolicy::ReturnNull => Some(Expr::Default(destination.clone())),
                NullSourcePolicy::NewInstance => {
                    Some(self.construct(tree, destination, src, dst)?)
                }
                NullSourcePolicy::Crash => None,
            };
            if let Some(value) = on_null {
                body.push(Stmt::If {
                    test: Expr::Local(src).is_null(),
                    then: vec![Stmt::Return(value)],
                    otherwise: Vec::new(),
                });
            }
        }

        if let Some(prebuilt) = &tree.prebuilt {
            body.push(Stmt::Return(Expr::call(
                &prebuilt.as_native(),
                vec![Expr::Local(src), Expr::Local(dst)],
            )));
        } else if let (Some(shape), true) = (&tree.sequence, tree.is_enumerable) {
            let items = self.lower_collection(
                tree,
                shape,
                Expr::Local(src),
                Some(Expr::Local(dst)),
                "items",
                &mut body,
            )?;
            body.push(Stmt::Return(Expr::Local(items)));
        } else if is_complex_pair(source, destination) {
            body.push(Stmt::If {
                test: Expr::Local(dst).is_null(),
                then: vec![Stmt::Assign {
                    place: Place::Local(dst),
                    value: self.construct(tree, destination, src, dst)?,
                }],
                otherwise: Vec::new(),
            });
            self.populate(tree, src, dst, &mut body)?;
            body.push(Stmt::Return(Expr::Local(dst)));
        } else {
            let value = self.convert_value(Expr::Local(src), Some(source), destination)?;
            body.push(Stmt::Return(value));
        }

        Ok(body)
    }

    /// Assign every leaf and child of `node` from `src` into `dst`
    fn populate(
        &mut self,
        node: &ProposedTypeMapping,
        src: LocalId,
        dst: LocalId,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        for member in &node.members {
            if member.ignored {
                continue;
            }
            let Some(access) = &member.source else {
                continue;
            };

            let destination = member.destination.ty.get()?;
            let value = self.source_value(node, access, src, dst)?;
            let value = self.convert_value(value, member.source_type.as_ref(), &destination)?;
            let assign = Stmt::Assign {
                place: Place::Member {
                    target: dst,
                    member: member.destination.clone(),
                },
                value,
            };

            match &member.condition {
                Some(condition) => out.push(Stmt::If {
                    test: Self::condition(condition, src, dst),
                    then: vec![assign],
                    otherwise: Vec::new(),
                }),
                None => out.push(assign),
            }
        }

        for child in &node.children {
            if child.ignored {
                continue;
            }
            let mut stmts = Vec::new();
            self.lower_child(node, child, src, dst, &mut stmts)?;

            match &child.condition {
                Some(condition) => out.push(Stmt::If {
                    test: Self::condition(condition, src, dst),
                    then: stmts,
                    otherwise: Vec::new(),
                }),
                None => out.extend(stmts),
            }
        }

        Ok(())
    }

    fn lower_child(
        &mut self,
        parent: &ProposedTypeMapping,
        child: &ProposedTypeMapping,
        src: LocalId,
        dst: LocalId,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let Some(member) = &child.destination_member else {
            return Err(codegen_error!(
                "nested mapping {} -> {} has no destination member",
                child.source_type,
                child.destination_type
            ));
        };
        let assign_back = |value: Expr| Stmt::Assign {
            place: Place::Member {
                target: dst,
                member: member.clone(),
            },
            value,
        };

        if let Some(prebuilt) = &child.prebuilt {
            let source = self.child_source(parent, child, src, dst)?;
            let existing = Expr::Local(dst).member(member);
            out.push(assign_back(Expr::call(
                &prebuilt.as_native(),
                vec![source, existing],
            )));
            return Ok(());
        }

        if let Some(shape) = &child.sequence {
            let source = self.child_source(parent, child, src, dst)?;
            let existing = (self.ctx.config.collections == CollectionPolicy::Preserve)
                .then(|| Expr::Local(dst).member(member));
            let items = self.lower_collection(child, shape, source, existing, &member.name, out)?;
            out.push(assign_back(Expr::Local(items)));
            return Ok(());
        }

        if child.inline {
            let target = self
                .plan
                .declare(&format!("dst_{}", member.name), &child.destination_type);
            self.obtain(child, member, dst, src, target, out)?;
            self.populate(child, src, target, out)?;
            out.push(assign_back(Expr::Local(target)));
            return Ok(());
        }

        let source = self
            .plan
            .declare(&format!("src_{}", member.name), &child.source_type);
        out.push(Stmt::Assign {
            place: Place::Local(source),
            value: self.child_source(parent, child, src, dst)?,
        });

        let target = self
            .plan
            .declare(&format!("dst_{}", member.name), &child.destination_type);
        let mut build = Vec::new();
        self.obtain(child, member, dst, source, target, &mut build)?;
        self.populate(child, source, target, &mut build)?;
        build.push(assign_back(Expr::Local(target)));

        if child.source_type.accepts_null() {
            let default = Expr::Default(member.ty.get()?);
            out.push(Stmt::If {
                test: Expr::Local(source).is_null(),
                then: vec![assign_back(default)],
                otherwise: build,
            });
        } else {
            out.extend(build);
        }
        Ok(())
    }

    /// Fill `target` with a reused or newly constructed nested destination
    fn obtain(
        &mut self,
        node: &ProposedTypeMapping,
        member: &MemberRc,
        parent: LocalId,
        source: LocalId,
        target: LocalId,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let construct = self.construct(node, &node.destination_type, source, target)?;

        if self.ctx.config.reuse_existing {
            out.push(Stmt::Assign {
                place: Place::Local(target),
                value: Expr::Local(parent).member(member),
            });
            out.push(Stmt::If {
                test: Expr::Local(target).is_null(),
                then: vec![Stmt::Assign {
                    place: Place::Local(target),
                    value: construct,
                }],
                otherwise: Vec::new(),
            });
        } else {
            out.push(Stmt::Assign {
                place: Place::Local(target),
                value: construct,
            });
        }
        Ok(())
    }

    /// Allocate, iterate and fill a destination collection; returns the local holding it
    fn lower_collection(
        &mut self,
        node: &ProposedTypeMapping,
        shape: &SequenceShape,
        source: Expr,
        existing: Option<Expr>,
        label: &str,
        out: &mut Vec<Stmt>,
    ) -> Result<LocalId> {
        let int = self.ctx.registry.primitive(PrimitiveKind::I4);
        let source_kind = shape.source.sequence_kind().unwrap_or(SequenceKind::Enumerable);
        let destination_kind = shape
            .destination
            .sequence_kind()
            .unwrap_or(SequenceKind::Enumerable);
        let fixed = destination_kind.is_fixed_size();

        let items = self.plan.declare(&format!("src_{label}"), &shape.source);
        out.push(Stmt::Assign {
            place: Place::Local(items),
            value: source,
        });
        let result = self.plan.declare(&format!("dst_{label}"), &shape.destination);

        let mut build = Vec::new();
        let preserve = match existing {
            Some(existing)
                if !fixed && self.ctx.config.collections == CollectionPolicy::Preserve =>
            {
                build.push(Stmt::Assign {
                    place: Place::Local(result),
                    value: existing,
                });
                build.push(Stmt::If {
                    test: Expr::Local(result).is_null(),
                    then: vec![Stmt::Assign {
                        place: Place::Local(result),
                        value: Expr::NewSequence {
                            ty: shape.destination.clone(),
                            len: None,
                        },
                    }],
                    otherwise: Vec::new(),
                });
                true
            }
            _ => {
                let len =
                    fixed.then(|| Box::new(Self::count(Expr::Local(items), source_kind, &int)));
                build.push(Stmt::Assign {
                    place: Place::Local(result),
                    value: Expr::NewSequence {
                        ty: shape.destination.clone(),
                        len,
                    },
                });
                false
            }
        };
        let by_index = fixed && !preserve;

        let item = self.plan.declare("item", &node.source_type);
        if source_kind.is_indexable() {
            let index = self.plan.declare("i", &int);
            let mut body = vec![Stmt::Assign {
                place: Place::Local(item),
                value: Expr::Index {
                    sequence: Box::new(Expr::Local(items)),
                    index: Box::new(Expr::Local(index)),
                },
            }];
            let value = self.element_value(node, item, &mut body)?;
            body.push(if by_index {
                Stmt::Assign {
                    place: Place::Element {
                        sequence: result,
                        index,
                    },
                    value,
                }
            } else {
                Stmt::Append {
                    sequence: result,
                    value,
                }
            });
            build.push(Stmt::ForIndex {
                index,
                count: Expr::Local(items).count(),
                body,
            });
        } else {
            let counter = by_index.then(|| self.plan.declare("k", &int));
            let mut body = Vec::new();
            let value = self.element_value(node, item, &mut body)?;
            match counter {
                Some(counter) => {
                    build.push(Stmt::Assign {
                        place: Place::Local(counter),
                        value: Expr::constant(0),
                    });
                    body.push(Stmt::Assign {
                        place: Place::Element {
                            sequence: result,
                            index: counter,
                        },
                        value,
                    });
                    body.push(Stmt::Assign {
                        place: Place::Local(counter),
                        value: Expr::binary(
                            BinaryOp::Add,
                            Expr::Local(counter),
                            Expr::constant(1),
                        ),
                    });
                }
                None => body.push(Stmt::Append {
                    sequence: result,
                    value,
                }),
            }
            build.push(Stmt::ForEach {
                cursor: item,
                sequence: Expr::Local(items),
                body,
            });
        }

        out.push(Stmt::If {
            test: Expr::Local(items).is_null(),
            then: vec![Stmt::Assign {
                place: Place::Local(result),
                value: Expr::Default(shape.destination.clone()),
            }],
            otherwise: build,
        });
        Ok(result)
    }

    /// The mapped value of one collection element held by `item`
    fn element_value(
        &mut self,
        node: &ProposedTypeMapping,
        item: LocalId,
        out: &mut Vec<Stmt>,
    ) -> Result<Expr> {
        if let Some(prebuilt) = &node.prebuilt {
            return Ok(Expr::call(
                &prebuilt.as_native(),
                vec![Expr::Local(item), Expr::constant(Value::Null)],
            ));
        }

        let source = node.source_type.clone();
        let destination = node.destination_type.clone();
        if source.token == destination.token && !self.ctx.config.clone_same_types {
            return Ok(Expr::Local(item));
        }

        if is_complex_pair(&source, &destination) {
            let target = self.plan.declare("item_dst", &destination);
            let mut build = vec![Stmt::Assign {
                place: Place::Local(target),
                value: self.construct(node, &destination, item, target)?,
            }];
            self.populate(node, item, target, &mut build)?;

            if source.accepts_null() {
                out.push(Stmt::If {
                    test: Expr::Local(item).is_null(),
                    then: vec![Stmt::Assign {
                        place: Place::Local(target),
                        value: Expr::Default(destination.clone()),
                    }],
                    otherwise: build,
                });
            } else {
                out.extend(build);
            }
            return Ok(Expr::Local(target));
        }

        self.convert_value(Expr::Local(item), Some(&source), &destination)
    }

    /// Number of elements, through the direct count where the shape has one
    fn count(sequence: Expr, kind: SequenceKind, int: &MapTypeRc) -> Expr {
        if kind.has_direct_count() {
            sequence.count()
        } else {
            Expr::Aggregate {
                kind: AggregateKind::Count,
                source: Box::new(sequence),
                selector: None,
                ty: int.clone(),
            }
        }
    }

    fn child_source(
        &self,
        parent: &ProposedTypeMapping,
        child: &ProposedTypeMapping,
        src: LocalId,
        dst: LocalId,
    ) -> Result<Expr> {
        match &child.source_member {
            Some(access) => self.source_value(parent, access, src, dst),
            None => Ok(Expr::Local(src)),
        }
    }

    fn source_value(
        &self,
        node: &ProposedTypeMapping,
        access: &SourceAccess,
        src: LocalId,
        dst: LocalId,
    ) -> Result<Expr> {
        match access {
            SourceAccess::Member(member) => Ok(Expr::Local(src).member(member)),
            SourceAccess::Path(path) => self.path_value(Expr::Local(src), path),
            SourceAccess::Override(value) => self.splice_override(node, value, src, dst),
        }
    }

    /// Navigate a flattened path; every access after the first is null-propagating
    fn path_value(&self, base: Expr, path: &FlattenedPath) -> Result<Expr> {
        let mut current = base;
        let mut first = true;

        for step in &path.steps {
            current = match step {
                PathStep::Member(member) => {
                    let next = Expr::Member {
                        target: Box::new(current),
                        member: member.clone(),
                        null_safe: !first,
                    };
                    first = false;
                    next
                }
                PathStep::Count => Expr::conditional(
                    current.clone().is_null(),
                    Expr::Default(path.ty.clone()),
                    current.count(),
                ),
                PathStep::Sum(member) => {
                    let element = self
                        .ctx
                        .registry
                        .get(&member.declaring)
                        .ok_or(crate::Error::TypeNotFound(member.declaring))?;
                    let param = Param::new("e", &element);
                    let selector = Lambda {
                        body: Expr::param(&param).member(member),
                        params: vec![param],
                    };
                    Expr::conditional(
                        current.clone().is_null(),
                        Expr::Default(path.ty.clone()),
                        Expr::Aggregate {
                            kind: AggregateKind::Sum,
                            source: Box::new(current),
                            selector: Some(Arc::new(selector)),
                            ty: path.ty.clone(),
                        },
                    )
                }
            };
        }

        Ok(current)
    }

    /// Bind an override body to the locals of the boundary it populates
    fn splice_override(
        &self,
        node: &ProposedTypeMapping,
        value: &Expr,
        src: LocalId,
        dst: LocalId,
    ) -> Result<Expr> {
        let Some(custom) = &node.custom else {
            return Err(codegen_error!(
                "override for {} -> {} without an override table",
                node.source_type,
                node.destination_type
            ));
        };

        let mut bindings = vec![(custom.param.id, src)];
        if let Some(extra) = &custom.extra {
            if value.references(extra.id) {
                let Some(local) = self.plan.extra else {
                    return Err(codegen_error!(
                        "override for {} reads the extra argument, but the mapping takes none",
                        node.destination_type
                    ));
                };
                bindings.push((extra.id, local));
            }
        }
        if let Some(destination) = &custom.destination_param {
            bindings.push((destination.id, dst));
        }

        Ok(Expr::Override {
            body: Box::new(value.clone()),
            bindings,
        })
    }

    /// How to obtain a new instance of `ty`.
    ///
    /// Constructor tables of the current node and the root come first, then the mapper-wide
    /// table, then a public default constructor.
    fn construct(
        &self,
        node: &ProposedTypeMapping,
        ty: &MapTypeRc,
        src: LocalId,
        dst: LocalId,
    ) -> Result<Expr> {
        let found = node
            .constructors
            .iter()
            .chain(self.root.constructors.iter())
            .find(|(token, _)| *token == ty.token)
            .map(|(_, constructor)| constructor.clone())
            .or_else(|| {
                self.ctx
                    .constructors
                    .get(&ty.token)
                    .map(|entry| entry.value().clone())
            });

        if let Some(constructor) = found {
            return Self::splice_constructor(ty, &constructor, src, dst);
        }

        if ty.is_sequence() {
            return Ok(Expr::NewSequence {
                ty: ty.clone(),
                len: ty
                    .sequence_kind()
                    .is_some_and(|kind| kind.is_fixed_size())
                    .then(|| Box::new(Expr::constant(0))),
            });
        }

        let constructible = match ty.flavor {
            TypeFlavor::ValueType | TypeFlavor::KeyValuePair => true,
            TypeFlavor::Class => {
                ty.flags.contains(TypeFlags::DEFAULT_CTOR)
                    && !ty.flags.contains(TypeFlags::ABSTRACT)
            }
            _ => false,
        };
        if constructible {
            return Ok(Expr::NewObject(ty.clone()));
        }

        Err(codegen_error!(
            "no usable constructor for {}",
            ty.fullname()
        ))
    }

    fn splice_constructor(
        ty: &MapType,
        constructor: &Constructor,
        src: LocalId,
        dst: LocalId,
    ) -> Result<Expr> {
        match constructor {
            Constructor::Factory(func) => Ok(Expr::call(func, vec![Expr::Local(src)])),
            Constructor::Template(Expr::Lambda(lambda))
                if (1..=2).contains(&lambda.params.len()) =>
            {
                let mut bindings = vec![(lambda.params[0].id, src)];
                if let Some(destination) = lambda.params.get(1) {
                    bindings.push((destination.id, dst));
                }
                Ok(Expr::Override {
                    body: Box::new(lambda.body.clone()),
                    bindings,
                })
            }
            Constructor::Template(other) => Err(codegen_error!(
                "malformed constructor template for {}: {}",
                ty.fullname(),
                other
            )),
        }
    }

    /// Call a guard lambda with `(src)` or `(src, dst)`
    fn condition(condition: &Arc<Lambda>, src: LocalId, dst: LocalId) -> Expr {
        let mut args = vec![Expr::Local(src)];
        if condition.params.len() > 1 {
            args.push(Expr::Local(dst));
        }
        Expr::Invoke {
            callee: Box::new(Expr::Lambda(condition.clone())),
            args,
        }
    }

    /// Materialize the conversion from a `source` typed value into `destination`
    fn convert_value(
        &self,
        value: Expr,
        source: Option<&MapTypeRc>,
        destination: &MapTypeRc,
    ) -> Result<Expr> {
        let Some(source) = source else {
            return Ok(if needs_conversion(destination) {
                value.convert(destination)
            } else {
                value
            });
        };
        let special = &self.ctx.config.special_cases;

        if is_text(destination) && !is_text(source) {
            if !special.to_string {
                return Err(codegen_error!(
                    "converting {} to {} needs the ToString special case",
                    source.fullname(),
                    destination.fullname()
                ));
            }
            return Ok(Expr::ToText(Box::new(value)));
        }

        if is_text(source) && is_date(destination) {
            if !special.parse_dates {
                return Err(codegen_error!(
                    "converting {} to {} needs the date parsing special case",
                    source.fullname(),
                    destination.fullname()
                ));
            }
            return Ok(Expr::ParseDate {
                expr: Box::new(value),
                culture: special.culture,
            });
        }

        let unwrapped = |ty: &MapTypeRc| ty.nullable_inner().unwrap_or_else(|| ty.clone());
        let operator = self
            .ctx
            .compat
            .conversion(source, destination)
            .or_else(|| {
                self.ctx
                    .compat
                    .conversion(&unwrapped(source), &unwrapped(destination))
            });
        if let Some(operator) = operator {
            let call = Expr::call(&operator.func, vec![value.clone()]);
            return Ok(if source.accepts_null() {
                Expr::conditional(value.is_null(), Expr::Default(destination.clone()), call)
            } else {
                call
            });
        }

        if self.ctx.compat.is_assignable(source, destination) {
            return Ok(value);
        }

        if let (Some(inner), None) = (source.nullable_inner(), destination.nullable_inner()) {
            return Ok(value.coalesce(Expr::Default(inner)).convert(destination));
        }

        Ok(value.convert(destination))
    }
}

fn is_complex_pair(source: &MapType, destination: &MapType) -> bool {
    source.flavor.is_complex() && destination.flavor.is_complex()
}

fn is_text(ty: &MapType) -> bool {
    matches!(ty.flavor, TypeFlavor::Primitive(PrimitiveKind::String))
}

fn is_date(ty: &MapTypeRc) -> bool {
    let inner = ty.nullable_inner().unwrap_or_else(|| ty.clone());
    matches!(inner.flavor, TypeFlavor::Primitive(PrimitiveKind::DateTime))
}

fn needs_conversion(ty: &MapType) -> bool {
    matches!(
        ty.flavor,
        TypeFlavor::Primitive(_) | TypeFlavor::Enum { .. } | TypeFlavor::Nullable
    )
}
