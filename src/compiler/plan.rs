//! The executable mapping plan.
//!
//! A [`MappingPlan`] is a small structured program over numbered locals. Local `$0` holds the
//! source, `$1` the destination (`null` unless mapping into an existing instance) and, for plans
//! finalized with an extra parameter, `$2` the extra argument. Every plan ends in a [`Stmt::Return`].

use std::fmt;

use crate::{
    expr::{Expr, LocalId},
    metadata::{
        member::MemberRc,
        typesystem::{MapTypeRc, TypePair},
    },
    value::Value,
    Result,
};

/// A declared local
#[derive(Clone, Debug)]
pub struct LocalDecl {
    /// Display name
    pub name: String,
    /// Static type
    pub ty: MapTypeRc,
}

/// An assignable location
#[derive(Clone, Debug)]
pub enum Place {
    /// A local
    Local(LocalId),
    /// A member of the instance held by a local
    Member {
        /// The local holding the instance
        target: LocalId,
        /// The member
        member: MemberRc,
    },
    /// An element of the sequence held by a local
    Element {
        /// The local holding the sequence
        sequence: LocalId,
        /// The local holding the index
        index: LocalId,
    },
}

/// A plan statement
#[derive(Clone, Debug)]
pub enum Stmt {
    /// `place = value`
    Assign {
        /// Target location
        place: Place,
        /// Assigned value
        value: Expr,
    },
    /// `if (test) { then } else { otherwise }`
    If {
        /// The condition
        test: Expr,
        /// Statements run when the condition holds
        then: Vec<Stmt>,
        /// Statements run otherwise
        otherwise: Vec<Stmt>,
    },
    /// `for (index = 0; index < count; index++) { body }`
    ForIndex {
        /// Loop counter
        index: LocalId,
        /// Number of iterations, evaluated once
        count: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// `foreach (cursor in sequence) { body }`
    ForEach {
        /// Current element
        cursor: LocalId,
        /// The iterated sequence
        sequence: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// `sequence.Add(value)`
    Append {
        /// The local holding the growable sequence
        sequence: LocalId,
        /// Appended value
        value: Expr,
    },
    /// `return value`
    Return(Expr),
}

impl Stmt {
    /// Apply `f` to every expression of this statement, nested statements included
    ///
    /// # Errors
    /// Returns the first error of `f`.
    pub fn map_exprs(&mut self, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<()> {
        fn take(expr: &mut Expr, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<()> {
            let owned = std::mem::replace(expr, Expr::Const(Value::Null));
            *expr = f(owned)?;
            Ok(())
        }

        match self {
            Stmt::Assign { value, .. } | Stmt::Append { value, .. } | Stmt::Return(value) => {
                take(value, f)
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                take(test, f)?;
                for stmt in then.iter_mut().chain(otherwise.iter_mut()) {
                    stmt.map_exprs(f)?;
                }
                Ok(())
            }
            Stmt::ForIndex { count, body, .. } => {
                take(count, f)?;
                for stmt in body {
                    stmt.map_exprs(f)?;
                }
                Ok(())
            }
            Stmt::ForEach { sequence, body, .. } => {
                take(sequence, f)?;
                for stmt in body {
                    stmt.map_exprs(f)?;
                }
                Ok(())
            }
        }
    }

    /// Visit every expression of this statement, nested statements included
    pub fn visit_exprs<'s>(&'s self, f: &mut dyn FnMut(&'s Expr)) {
        match self {
            Stmt::Assign { value, .. } | Stmt::Append { value, .. } | Stmt::Return(value) => {
                f(value);
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                f(test);
                for stmt in then.iter().chain(otherwise.iter()) {
                    stmt.visit_exprs(f);
                }
            }
            Stmt::ForIndex { count, body, .. } => {
                f(count);
                for stmt in body {
                    stmt.visit_exprs(f);
                }
            }
            Stmt::ForEach { sequence, body, .. } => {
                f(sequence);
                for stmt in body {
                    stmt.visit_exprs(f);
                }
            }
        }
    }

    fn count(&self) -> usize {
        1 + match self {
            Stmt::If {
                then, otherwise, ..
            } => then.iter().chain(otherwise.iter()).map(Stmt::count).sum(),
            Stmt::ForIndex { body, .. } | Stmt::ForEach { body, .. } => {
                body.iter().map(Stmt::count).sum()
            }
            _ => 0,
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, plan: &MappingPlan, indent: usize) -> fmt::Result {
        let pad = "    ".repeat(indent);
        match self {
            Stmt::Assign { place, value } => {
                writeln!(f, "{pad}{} = {value};", plan.place_name(place))
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                writeln!(f, "{pad}if ({test}) {{")?;
                for stmt in then {
                    stmt.write(f, plan, indent + 1)?;
                }
                if !otherwise.is_empty() {
                    writeln!(f, "{pad}}} else {{")?;
                    for stmt in otherwise {
                        stmt.write(f, plan, indent + 1)?;
                    }
                }
                writeln!(f, "{pad}}}")
            }
            Stmt::ForIndex { index, count, body } => {
                writeln!(f, "{pad}for ({index} = 0; {index} < {count}; {index}++) {{")?;
                for stmt in body {
                    stmt.write(f, plan, indent + 1)?;
                }
                writeln!(f, "{pad}}}")
            }
            Stmt::ForEach {
                cursor,
                sequence,
                body,
            } => {
                writeln!(f, "{pad}foreach ({cursor} in {sequence}) {{")?;
                for stmt in body {
                    stmt.write(f, plan, indent + 1)?;
                }
                writeln!(f, "{pad}}}")
            }
            Stmt::Append { sequence, value } => writeln!(f, "{pad}{sequence}.Add({value});"),
            Stmt::Return(value) => writeln!(f, "{pad}return {value};"),
        }
    }
}

/// A lowered, executable mapping
#[derive(Clone, Debug)]
pub struct MappingPlan {
    /// The pair this plan maps
    pub pair: TypePair,
    /// Every local, indexed by `LocalId`
    pub locals: Vec<LocalDecl>,
    /// Local holding the source
    pub source: LocalId,
    /// Local holding the (existing or constructed) destination
    pub destination: LocalId,
    /// Local holding the extra argument
    pub extra: Option<LocalId>,
    /// The statements
    pub body: Vec<Stmt>,
    /// Only public surface is touched; set by the accessibility scan
    pub public: bool,
}

impl MappingPlan {
    /// An empty plan with the source and destination locals declared
    ///
    /// ## Arguments
    /// * 'source'      - Source type
    /// * 'destination' - Destination type
    /// * 'extra'       - Type of the extra argument, if the plan takes one
    #[must_use]
    pub fn new(source: &MapTypeRc, destination: &MapTypeRc, extra: Option<&MapTypeRc>) -> Self {
        let mut plan = MappingPlan {
            pair: TypePair::of(source, destination),
            locals: Vec::new(),
            source: LocalId(0),
            destination: LocalId(1),
            extra: None,
            body: Vec::new(),
            public: true,
        };
        plan.source = plan.declare("src", source);
        plan.destination = plan.declare("dst", destination);
        plan.extra = extra.map(|ty| plan.declare("extra", ty));
        plan
    }

    /// Declare a new local
    pub fn declare(&mut self, name: &str, ty: &MapTypeRc) -> LocalId {
        self.locals.push(LocalDecl {
            name: name.to_string(),
            ty: ty.clone(),
        });
        LocalId(self.locals.len() - 1)
    }

    /// Total number of statements, nested ones included
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.body.iter().map(Stmt::count).sum()
    }

    /// Apply `f` to every expression of the plan
    ///
    /// # Errors
    /// Returns the first error of `f`.
    pub fn map_exprs(&mut self, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<()> {
        for stmt in &mut self.body {
            stmt.map_exprs(f)?;
        }
        Ok(())
    }

    /// Visit every expression of the plan
    pub fn visit_exprs<'s>(&'s self, f: &mut dyn FnMut(&'s Expr)) {
        for stmt in &self.body {
            stmt.visit_exprs(f);
        }
    }

    fn place_name(&self, place: &Place) -> String {
        match place {
            Place::Local(id) => id.to_string(),
            Place::Member { target, member } => format!("{target}.{}", member.name),
            Place::Element { sequence, index } => format!("{sequence}[{index}]"),
        }
    }
}

impl fmt::Display for MappingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "// {} ({} statements, {})",
            self.pair,
            self.statement_count(),
            if self.public { "public" } else { "non-public" }
        )?;
        for (index, local) in self.locals.iter().enumerate() {
            writeln!(f, "// {} {}: {}", LocalId(index), local.name, local.ty)?;
        }
        for stmt in &self.body {
            stmt.write(f, self, 0)?;
        }
        Ok(())
    }
}
