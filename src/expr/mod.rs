//! Expression trees.
//!
//! [`Expr`] is the code representation shared by user-supplied override templates and the
//! lowered mapping plans. Templates are built as [`Expr::Lambda`]s over [`Param`]s; lowering
//! turns resolved member mappings into expressions over plan locals ([`Expr::Local`]) and splices
//! template bodies in through [`Expr::Override`] until the substitution pass binds their
//! parameters.
//!
//! # Key Components
//!
//! - [`Expr`]: The expression node
//! - [`Param`] / [`ParamId`]: Lambda parameters with process-unique identities
//! - [`ExprRewriter`]: Post-order rewriting, used by every plan pass
//! - [`evaluate`]: Tree-walking evaluation against a [`Frame`]
//!
//! # Examples
//!
//! ```rust
//! use dotmapper::expr::{BinaryOp, Expr, Param};
//! use dotmapper::metadata::typesystem::{TypeBuilder, TypeRegistry};
//!
//! let registry = TypeRegistry::new();
//! let string = registry.string();
//! let customer = TypeBuilder::class(&registry, "Demo", "Customer")
//!     .property("FirstName", &string)
//!     .property("LastName", &string)
//!     .build();
//!
//! let c = Param::new("c", &customer);
//! let full_name = Expr::binary(
//!     BinaryOp::Concat,
//!     Expr::param(&c).path("FirstName")?,
//!     Expr::param(&c).path("LastName")?,
//! );
//! assert_eq!(full_name.to_string(), "(c.FirstName ++ c.LastName)");
//! # Ok::<(), dotmapper::Error>(())
//! ```

mod eval;
mod rewriter;

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, RwLock,
    },
};

use strum::Display;

pub use eval::{evaluate, Closure, Frame};
pub(crate) use eval::{truthy, usize_of};
pub use rewriter::{ExprRewriter, ParamSubstitution};

use crate::{
    metadata::{
        member::MemberRc,
        typesystem::{MapTypeRc, TypeRef},
    },
    value::{Culture, NativeFn, Value},
    Error, Result,
};

static NEXT_PARAM: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of a lambda parameter
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ParamId(u32);

impl ParamId {
    fn next() -> Self {
        ParamId(NEXT_PARAM.fetch_add(1, Ordering::Relaxed))
    }
}

/// A lambda parameter
#[derive(Clone, Debug)]
pub struct Param {
    /// Identity, never shared between two `Param::new` calls
    pub id: ParamId,
    /// Name, for display only
    pub name: Arc<str>,
    /// Declared type
    pub ty: TypeRef,
}

impl Param {
    /// Create a new parameter with a fresh identity
    #[must_use]
    pub fn new(name: &str, ty: &MapTypeRc) -> Self {
        Param {
            id: ParamId::next(),
            name: Arc::from(name),
            ty: TypeRef::new(ty),
        }
    }
}

/// Index of a local slot inside a mapping plan
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct LocalId(pub usize);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Binary operators
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum BinaryOp {
    /// Numeric addition, concatenation if either operand is a string
    #[strum(serialize = "+")]
    Add,
    /// Numeric subtraction
    #[strum(serialize = "-")]
    Subtract,
    /// Numeric multiplication
    #[strum(serialize = "*")]
    Multiply,
    /// Text concatenation of both operands, `null` renders as empty text
    #[strum(serialize = "++")]
    Concat,
    /// Equality
    #[strum(serialize = "==")]
    Equal,
    /// Inequality
    #[strum(serialize = "!=")]
    NotEqual,
    /// Numeric less-than
    #[strum(serialize = "<")]
    LessThan,
    /// Numeric greater-than
    #[strum(serialize = ">")]
    GreaterThan,
    /// Short-circuit and
    #[strum(serialize = "&&")]
    AndAlso,
    /// Short-circuit or
    #[strum(serialize = "||")]
    OrElse,
}

/// Aggregations over a sequence
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum AggregateKind {
    /// Number of elements
    Count,
    /// Sum of the (selected) elements
    Sum,
}

/// A lambda expression
#[derive(Clone, Debug)]
pub struct Lambda {
    /// Parameters in declaration order
    pub params: Vec<Param>,
    /// The body
    pub body: Expr,
}

/// An expression node
#[derive(Clone, Debug)]
pub enum Expr {
    /// A lambda parameter
    Param(Param),
    /// A plan local
    Local(LocalId),
    /// A constant
    Const(Value),
    /// A value captured from the host environment, read at evaluation time
    Captured {
        /// Name, for display only
        name: Arc<str>,
        /// The shared storage
        cell: Arc<RwLock<Value>>,
    },
    /// Member read, `target?.member` if `null_safe`
    Member {
        /// Object or struct to read from
        target: Box<Expr>,
        /// The member
        member: MemberRc,
        /// Yield `null` instead of failing on a `null` target
        null_safe: bool,
    },
    /// Number of elements of a sequence
    Count(Box<Expr>),
    /// Element access
    Index {
        /// The sequence
        sequence: Box<Expr>,
        /// The index, any integral value
        index: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// The operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Built-in conversion
    Convert {
        /// The value to convert
        expr: Box<Expr>,
        /// Target type
        ty: MapTypeRc,
    },
    /// `ToString()`
    ToText(Box<Expr>),
    /// Parse text into a `DateTime`
    ParseDate {
        /// The text
        expr: Box<Expr>,
        /// Culture used for parsing
        culture: Culture,
    },
    /// `test ? then : otherwise`
    Conditional {
        /// The condition
        test: Box<Expr>,
        /// Value if `test` holds
        then: Box<Expr>,
        /// Value otherwise
        otherwise: Box<Expr>,
    },
    /// `expr == null`
    IsNull(Box<Expr>),
    /// `left ?? right`
    Coalesce(Box<Expr>, Box<Expr>),
    /// `default(T)`
    Default(MapTypeRc),
    /// Member-initialization of a new instance, `new T { A = .., B = .. }`
    New {
        /// The constructed type
        ty: MapTypeRc,
        /// Member initializers in order
        inits: Vec<(MemberRc, Expr)>,
    },
    /// Member binding on an existing instance, `target.A = ..; target.B = ..; target`
    Bind {
        /// The instance to populate
        target: Box<Expr>,
        /// Member assignments in order
        bindings: Vec<(MemberRc, Expr)>,
    },
    /// A new instance with default members, `new T()`
    NewObject(MapTypeRc),
    /// A new collection; with a length for fixed-size collections
    NewSequence {
        /// The collection type
        ty: MapTypeRc,
        /// Number of default elements to allocate
        len: Option<Box<Expr>>,
    },
    /// Aggregation over a sequence
    Aggregate {
        /// Count or sum
        kind: AggregateKind,
        /// The sequence
        source: Box<Expr>,
        /// Projection applied to every element before summing
        selector: Option<Arc<Lambda>>,
        /// Result type
        ty: MapTypeRc,
    },
    /// A lambda, evaluates to a closure
    Lambda(Arc<Lambda>),
    /// Call of a function value
    Invoke {
        /// Expression producing the function
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Call of a known native function
    Call {
        /// The function
        func: NativeFn,
        /// Arguments
        args: Vec<Expr>,
    },
    /// A template body spliced into a plan, parameters bound to plan locals
    Override {
        /// Body of the template
        body: Box<Expr>,
        /// Parameter bindings
        bindings: Vec<(ParamId, LocalId)>,
    },
}

impl Expr {
    /// Reference a parameter
    #[must_use]
    pub fn param(param: &Param) -> Expr {
        Expr::Param(param.clone())
    }

    /// A constant
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Expr {
        Expr::Const(value.into())
    }

    /// A captured host value that can be changed between invocations through the returned cell
    #[must_use]
    pub fn captured(name: &str, value: impl Into<Value>) -> (Expr, Arc<RwLock<Value>>) {
        let cell = Arc::new(RwLock::new(value.into()));
        (
            Expr::Captured {
                name: Arc::from(name),
                cell: cell.clone(),
            },
            cell,
        )
    }

    /// Member read
    #[must_use]
    pub fn member(self, member: &MemberRc) -> Expr {
        Expr::Member {
            target: Box::new(self),
            member: member.clone(),
            null_safe: false,
        }
    }

    /// Follow a dotted member path (`"Customer.Address.City"`) starting at this expression.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if a segment does not name a member of the static type reached
    /// so far.
    pub fn path(self, path: &str) -> Result<Expr> {
        let mut current = self;
        for segment in path.split('.') {
            let ty = current.static_type().ok_or_else(|| {
                Error::Argument(format!("cannot resolve '{segment}' on an untyped expression"))
            })?;
            let member = ty
                .member(segment, false)
                .ok_or_else(|| Error::Argument(format!("{ty} has no member '{segment}'")))?;
            current = current.member(&member);
        }
        Ok(current)
    }

    /// Binary operation
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `test ? then : otherwise`
    #[must_use]
    pub fn conditional(test: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// Built-in conversion into `ty`
    #[must_use]
    pub fn convert(self, ty: &MapTypeRc) -> Expr {
        Expr::Convert {
            expr: Box::new(self),
            ty: ty.clone(),
        }
    }

    /// `self == null`
    #[must_use]
    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    /// `self ?? fallback`
    #[must_use]
    pub fn coalesce(self, fallback: Expr) -> Expr {
        Expr::Coalesce(Box::new(self), Box::new(fallback))
    }

    /// Number of elements
    #[must_use]
    pub fn count(self) -> Expr {
        Expr::Count(Box::new(self))
    }

    /// Call a native function
    #[must_use]
    pub fn call(func: &NativeFn, args: Vec<Expr>) -> Expr {
        Expr::Call {
            func: func.clone(),
            args,
        }
    }

    /// A lambda over `params`
    #[must_use]
    pub fn lambda(params: Vec<Param>, body: Expr) -> Expr {
        Expr::Lambda(Arc::new(Lambda { params, body }))
    }

    /// Member-initialization of a new `ty`, members given by name
    ///
    /// ## Arguments
    /// * 'ty'    - The constructed type
    /// * 'inits' - `(member name, value)` pairs
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `ty` has no member of a given name.
    pub fn new_object(ty: &MapTypeRc, inits: Vec<(&str, Expr)>) -> Result<Expr> {
        let mut resolved = Vec::with_capacity(inits.len());
        for (name, value) in inits {
            let member = ty
                .member(name, false)
                .ok_or_else(|| Error::Argument(format!("{ty} has no member '{name}'")))?;
            resolved.push((member, value));
        }
        Ok(Expr::New {
            ty: ty.clone(),
            inits: resolved,
        })
    }

    /// The statically known type of this expression, where it can be told without a registry
    #[must_use]
    pub fn static_type(&self) -> Option<MapTypeRc> {
        match self {
            Expr::Param(param) => param.ty.upgrade(),
            Expr::Member { member, .. } => member.ty.upgrade(),
            Expr::Convert { ty, .. }
            | Expr::Default(ty)
            | Expr::New { ty, .. }
            | Expr::NewObject(ty)
            | Expr::NewSequence { ty, .. }
            | Expr::Aggregate { ty, .. } => Some(ty.clone()),
            Expr::Conditional { then, .. } => then.static_type(),
            Expr::Bind { target, .. } => target.static_type(),
            Expr::Coalesce(left, _) => left.static_type(),
            Expr::Override { body, .. } => body.static_type(),
            _ => None,
        }
    }

    /// Direct children in evaluation order; lambda bodies included
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Param(_)
            | Expr::Local(_)
            | Expr::Const(_)
            | Expr::Captured { .. }
            | Expr::Default(_)
            | Expr::NewObject(_) => Vec::new(),
            Expr::Member { target, .. } => vec![&**target],
            Expr::Count(inner)
            | Expr::ToText(inner)
            | Expr::IsNull(inner)
            | Expr::Convert { expr: inner, .. }
            | Expr::ParseDate { expr: inner, .. }
            | Expr::Override { body: inner, .. } => vec![&**inner],
            Expr::Index { sequence, index } => vec![&**sequence, &**index],
            Expr::Binary { left, right, .. } | Expr::Coalesce(left, right) => {
                vec![&**left, &**right]
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => vec![&**test, &**then, &**otherwise],
            Expr::New { inits, .. } => inits.iter().map(|(_, value)| value).collect(),
            Expr::Bind { target, bindings } => {
                let mut result: Vec<&Expr> = vec![&**target];
                result.extend(bindings.iter().map(|(_, value)| value));
                result
            }
            Expr::NewSequence { len, .. } => len.iter().map(|len| &**len).collect(),
            Expr::Aggregate {
                source, selector, ..
            } => {
                let mut result: Vec<&Expr> = vec![&**source];
                if let Some(selector) = selector {
                    result.push(&selector.body);
                }
                result
            }
            Expr::Lambda(lambda) => vec![&lambda.body],
            Expr::Invoke { callee, args } => {
                let mut result: Vec<&Expr> = vec![&**callee];
                result.extend(args.iter());
                result
            }
            Expr::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child)`
    ///
    /// # Errors
    /// Returns the first error reported by `f`.
    pub fn map_children<F>(self, f: &mut F) -> Result<Expr>
    where
        F: FnMut(Expr) -> Result<Expr>,
    {
        let boxed = |expr: Box<Expr>, f: &mut F| -> Result<Box<Expr>> { Ok(Box::new(f(*expr)?)) };

        Ok(match self {
            leaf @ (Expr::Param(_)
            | Expr::Local(_)
            | Expr::Const(_)
            | Expr::Captured { .. }
            | Expr::Default(_)
            | Expr::NewObject(_)) => leaf,
            Expr::Member {
                target,
                member,
                null_safe,
            } => Expr::Member {
                target: boxed(target, f)?,
                member,
                null_safe,
            },
            Expr::Count(inner) => Expr::Count(boxed(inner, f)?),
            Expr::ToText(inner) => Expr::ToText(boxed(inner, f)?),
            Expr::IsNull(inner) => Expr::IsNull(boxed(inner, f)?),
            Expr::Convert { expr, ty } => Expr::Convert {
                expr: boxed(expr, f)?,
                ty,
            },
            Expr::ParseDate { expr, culture } => Expr::ParseDate {
                expr: boxed(expr, f)?,
                culture,
            },
            Expr::Override { body, bindings } => Expr::Override {
                body: boxed(body, f)?,
                bindings,
            },
            Expr::Index { sequence, index } => Expr::Index {
                sequence: boxed(sequence, f)?,
                index: boxed(index, f)?,
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: boxed(left, f)?,
                right: boxed(right, f)?,
            },
            Expr::Coalesce(left, right) => Expr::Coalesce(boxed(left, f)?, boxed(right, f)?),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => Expr::Conditional {
                test: boxed(test, f)?,
                then: boxed(then, f)?,
                otherwise: boxed(otherwise, f)?,
            },
            Expr::New { ty, inits } => Expr::New {
                ty,
                inits: inits
                    .into_iter()
                    .map(|(member, value)| Ok((member, f(value)?)))
                    .collect::<Result<_>>()?,
            },
            Expr::Bind { target, bindings } => Expr::Bind {
                target: boxed(target, f)?,
                bindings: bindings
                    .into_iter()
                    .map(|(member, value)| Ok((member, f(value)?)))
                    .collect::<Result<_>>()?,
            },
            Expr::NewSequence { ty, len } => Expr::NewSequence {
                ty,
                len: len.map(|len| boxed(len, f)).transpose()?,
            },
            Expr::Aggregate {
                kind,
                source,
                selector,
                ty,
            } => Expr::Aggregate {
                kind,
                source: boxed(source, f)?,
                selector: selector
                    .map(|selector| -> Result<Arc<Lambda>> {
                        Ok(Arc::new(Lambda {
                            params: selector.params.clone(),
                            body: f(selector.body.clone())?,
                        }))
                    })
                    .transpose()?,
                ty,
            },
            Expr::Lambda(lambda) => Expr::Lambda(Arc::new(Lambda {
                params: lambda.params.clone(),
                body: f(lambda.body.clone())?,
            })),
            Expr::Invoke { callee, args } => Expr::Invoke {
                callee: boxed(callee, f)?,
                args: args.into_iter().map(&mut *f).collect::<Result<_>>()?,
            },
            Expr::Call { func, args } => Expr::Call {
                func,
                args: args.into_iter().map(&mut *f).collect::<Result<_>>()?,
            },
        })
    }

    /// Post-order transformation: children first, then `f` on the rebuilt node
    ///
    /// # Errors
    /// Returns the first error reported by `f`.
    pub fn transform<F>(self, f: &mut F) -> Result<Expr>
    where
        F: FnMut(Expr) -> Result<Expr>,
    {
        let rebuilt = self.map_children(&mut |child| child.transform(f))?;
        f(rebuilt)
    }

    /// Visit every node, parents before children
    pub fn walk<'e>(&'e self, visitor: &mut dyn FnMut(&'e Expr)) {
        visitor(self);
        for child in self.children() {
            child.walk(visitor);
        }
    }

    /// Returns `true` if the expression refers to no plan local and no parameter other than
    /// the ones in `bound`, so it can be evaluated without a plan frame.
    #[must_use]
    pub fn is_closed(&self, bound: &HashSet<ParamId>) -> bool {
        match self {
            Expr::Param(param) => bound.contains(&param.id),
            Expr::Local(_) | Expr::Override { .. } => false,
            Expr::Lambda(lambda) => {
                let mut inner = bound.clone();
                inner.extend(lambda.params.iter().map(|p| p.id));
                lambda.body.is_closed(&inner)
            }
            Expr::Aggregate {
                source, selector, ..
            } => {
                source.is_closed(bound)
                    && selector.as_ref().map_or(true, |selector| {
                        let mut inner = bound.clone();
                        inner.extend(selector.params.iter().map(|p| p.id));
                        selector.body.is_closed(&inner)
                    })
            }
            other => other.children().iter().all(|child| child.is_closed(bound)),
        }
    }

    /// Returns `true` if `param` occurs anywhere in this expression
    #[must_use]
    pub fn references(&self, param: ParamId) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            if let Expr::Param(p) = expr {
                found |= p.id == param;
            }
        });
        found
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            Ok(())
        }

        match self {
            Expr::Param(param) => f.write_str(&param.name),
            Expr::Local(local) => write!(f, "{local}"),
            Expr::Const(value) => write!(f, "{value}"),
            Expr::Captured { name, .. } => write!(f, "captured({name})"),
            Expr::Member {
                target,
                member,
                null_safe,
            } => {
                let access = if *null_safe { "?." } else { "." };
                write!(f, "{target}{access}{}", member.name)
            }
            Expr::Count(inner) => write!(f, "{inner}.Count"),
            Expr::Index { sequence, index } => write!(f, "{sequence}[{index}]"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Convert { expr, ty } => write!(f, "({}){expr}", ty.name),
            Expr::ToText(inner) => write!(f, "{inner}.ToString()"),
            Expr::ParseDate { expr, culture } => write!(f, "DateTime.Parse({expr}, {culture})"),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => write!(f, "({test} ? {then} : {otherwise})"),
            Expr::IsNull(inner) => write!(f, "({inner} == null)"),
            Expr::Coalesce(left, right) => write!(f, "({left} ?? {right})"),
            Expr::Default(ty) => write!(f, "default({})", ty.name),
            Expr::New { ty, inits } => {
                write!(f, "new {} {{ ", ty.name)?;
                for (i, (member, value)) in inits.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {value}", member.name)?;
                }
                f.write_str(" }")
            }
            Expr::Bind { target, bindings } => {
                write!(f, "{target} {{ ")?;
                for (i, (member, value)) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, ".{} = {value}", member.name)?;
                }
                f.write_str(" }")
            }
            Expr::NewObject(ty) => write!(f, "new {}()", ty.name),
            Expr::NewSequence { ty, len: Some(len) } => write!(f, "new {}({len})", ty.name),
            Expr::NewSequence { ty, len: None } => write!(f, "new {}()", ty.name),
            Expr::Aggregate {
                kind,
                source,
                selector,
                ..
            } => match selector {
                Some(selector) => write!(f, "{source}.{kind}({})", Expr::Lambda(selector.clone())),
                None => write!(f, "{source}.{kind}()"),
            },
            Expr::Lambda(lambda) => {
                f.write_str("(")?;
                for (i, param) in lambda.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&param.name)?;
                }
                write!(f, ") => {}", lambda.body)
            }
            Expr::Invoke { callee, args } => {
                write!(f, "{callee}(")?;
                list(f, args)?;
                f.write_str(")")
            }
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                list(f, args)?;
                f.write_str(")")
            }
            Expr::Override { body, .. } => write!(f, "{{{body}}}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::{PrimitiveKind, TypeBuilder, TypeRegistry};

    #[test]
    fn test_path_resolution() {
        let registry = TypeRegistry::new();
        let address = TypeBuilder::class(&registry, "Demo", "Address")
            .property("City", &registry.string())
            .build();
        let customer = TypeBuilder::class(&registry, "Demo", "Customer")
            .property("Address", &address)
            .build();

        let c = Param::new("c", &customer);
        let city = Expr::param(&c).path("Address.City").unwrap();
        assert_eq!(city.to_string(), "c.Address.City");
        assert_eq!(city.static_type().unwrap().token, registry.string().token);

        assert!(Expr::param(&c).path("Address.Zip").is_err());
    }

    #[test]
    fn test_params_are_unique() {
        let registry = TypeRegistry::new();
        let a = Param::new("x", &registry.object());
        let b = Param::new("x", &registry.object());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_is_closed() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);
        let x = Param::new("x", &int);

        let body = Expr::binary(BinaryOp::Add, Expr::param(&x), Expr::constant(1));
        let lambda = Expr::lambda(vec![x.clone()], body.clone());

        assert!(lambda.is_closed(&HashSet::new()));
        assert!(!body.is_closed(&HashSet::new()));
        assert!(!Expr::Local(LocalId(0)).is_closed(&HashSet::new()));
        assert!(body.references(x.id));
    }

    #[test]
    fn test_transform_is_post_order() {
        let sum = Expr::binary(BinaryOp::Add, Expr::constant(1), Expr::constant(2));
        let mut seen = Vec::new();
        let rebuilt = sum
            .transform(&mut |expr| {
                seen.push(expr.to_string());
                Ok(expr)
            })
            .unwrap();

        assert_eq!(seen, vec!["1", "2", "(1 + 2)"]);
        assert_eq!(rebuilt.to_string(), "(1 + 2)");
    }

    #[test]
    fn test_new_object_rejects_unknown_members() {
        let registry = TypeRegistry::new();
        let dto = TypeBuilder::class(&registry, "Demo", "Dto")
            .property("Name", &registry.string())
            .build();

        assert!(Expr::new_object(&dto, vec![("Name", Expr::constant("x"))]).is_ok());
        assert!(Expr::new_object(&dto, vec![("Missing", Expr::constant("x"))]).is_err());
    }
}
