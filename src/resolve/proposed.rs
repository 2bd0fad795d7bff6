//! The proposed mapping tree.
//!
//! A [`ProposedTypeMapping`] is one object boundary: the root pair, a nested complex member, or
//! the element boundary of a collection member. Nodes are plain data; callers may edit a freshly
//! resolved tree (ignore members, add guards, install constructors) before finalizing it.

use std::{fmt, sync::Arc};

use crate::{
    expr::{Expr, Lambda},
    mapper::PrebuiltPlan,
    metadata::{
        member::MemberRc,
        provider::FlattenedPath,
        token::Token,
        typesystem::{MapTypeRc, TypePair},
    },
    resolve::CustomMapping,
    value::NativeFn,
};

/// How a constructed destination instance is obtained
#[derive(Clone, Debug)]
pub enum Constructor {
    /// A one- or two-parameter lambda `(src[, dst]) => ..` spliced into the plan
    Template(Expr),
    /// A factory called with the source value
    Factory(NativeFn),
}

/// Where the value of a destination member comes from
#[derive(Clone, Debug)]
pub enum SourceAccess {
    /// A source member
    Member(MemberRc),
    /// A flattened navigation path
    Path(FlattenedPath),
    /// A custom override expression over the template placeholders
    Override(Expr),
}

impl SourceAccess {
    fn key(&self) -> String {
        match self {
            SourceAccess::Member(member) => member.qualified_name(),
            SourceAccess::Path(path) => path.describe(),
            SourceAccess::Override(expr) => format!("{{{expr}}}"),
        }
    }
}

impl fmt::Display for SourceAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAccess::Member(member) => f.write_str(&member.name),
            SourceAccess::Path(path) => write!(f, "{path}"),
            SourceAccess::Override(expr) => write!(f, "{expr}"),
        }
    }
}

/// The collection types around an element boundary
#[derive(Clone, Debug)]
pub struct SequenceShape {
    /// The source collection type
    pub source: MapTypeRc,
    /// The destination collection type
    pub destination: MapTypeRc,
}

/// A single member assignment
#[derive(Clone, Debug)]
pub struct ProposedMemberMapping {
    /// Value source, `None` for ignored members
    pub source: Option<SourceAccess>,
    /// The populated member
    pub destination: MemberRc,
    /// Static type of the source value, if known
    pub source_type: Option<MapTypeRc>,
    /// Do not populate this member
    pub ignored: bool,
    /// Only assign when this predicate over `(src)` or `(src, dst)` holds
    pub condition: Option<Arc<Lambda>>,
}

impl ProposedMemberMapping {
    /// A leaf fed from `source`
    #[must_use]
    pub fn new(
        source: SourceAccess,
        destination: &MemberRc,
        source_type: Option<MapTypeRc>,
    ) -> Self {
        ProposedMemberMapping {
            source: Some(source),
            destination: destination.clone(),
            source_type,
            ignored: false,
            condition: None,
        }
    }

    /// An ignored leaf
    #[must_use]
    pub fn ignored(destination: &MemberRc) -> Self {
        ProposedMemberMapping {
            source: None,
            destination: destination.clone(),
            source_type: None,
            ignored: true,
            condition: None,
        }
    }
}

/// Equality is by the `(source, destination)` member pair
impl PartialEq for ProposedMemberMapping {
    fn eq(&self, other: &Self) -> bool {
        self.destination == other.destination
            && self.source.as_ref().map(SourceAccess::key)
                == other.source.as_ref().map(SourceAccess::key)
    }
}

impl Eq for ProposedMemberMapping {}

/// One object boundary of a proposed mapping
#[derive(Clone, Debug)]
pub struct ProposedTypeMapping {
    /// The pair this node was requested for; the collection pair for a root collection mapping
    pub pair: TypePair,
    /// Member-bearing source type (the element type for collection boundaries)
    pub source_type: MapTypeRc,
    /// Member-bearing destination type (the element type for collection boundaries)
    pub destination_type: MapTypeRc,
    /// How the parent reads the source of this boundary, `None` at the root and inline
    pub source_member: Option<SourceAccess>,
    /// The parent member receiving this boundary, `None` at the root
    pub destination_member: Option<MemberRc>,
    /// Leaf assignments in destination member order
    pub members: Vec<ProposedMemberMapping>,
    /// Nested boundaries in destination member order
    pub children: Vec<ProposedTypeMapping>,
    /// Override table applying to this boundary
    pub custom: Option<Arc<CustomMapping>>,
    /// Do not populate this boundary
    pub ignored: bool,
    /// Only populate when this predicate over `(src)` or `(src, dst)` holds
    pub condition: Option<Arc<Lambda>>,
    /// The boundary itself is the outer collection being mapped
    pub is_enumerable: bool,
    /// The collection types, for collection boundaries
    pub sequence: Option<SequenceShape>,
    /// Constructed purely from a nested override table, reading the parent's source
    pub inline: bool,
    /// Destination members without a satisfiable source
    pub incompatible: Vec<MemberRc>,
    /// Resolution stopped early below this node; never reuse it from a cache
    pub do_not_cache: bool,
    /// A hand-authored plan replacing this boundary
    pub prebuilt: Option<PrebuiltPlan>,
    /// Constructor overrides for types constructed by this mapping
    pub constructors: Vec<(Token, Constructor)>,
    /// Number of nested boundary levels below this node
    pub height: usize,
}

impl ProposedTypeMapping {
    /// An empty node for a member-bearing pair
    #[must_use]
    pub fn new(source_type: &MapTypeRc, destination_type: &MapTypeRc) -> Self {
        ProposedTypeMapping {
            pair: TypePair::of(source_type, destination_type),
            source_type: source_type.clone(),
            destination_type: destination_type.clone(),
            source_member: None,
            destination_member: None,
            members: Vec::new(),
            children: Vec::new(),
            custom: None,
            ignored: false,
            condition: None,
            is_enumerable: false,
            sequence: None,
            inline: false,
            incompatible: Vec::new(),
            do_not_cache: false,
            prebuilt: None,
            constructors: Vec::new(),
            height: 0,
        }
    }

    /// The member-bearing pair; differs from [`pair`](Self::pair) only for root collections
    #[must_use]
    pub fn element_pair(&self) -> TypePair {
        TypePair::of(&self.source_type, &self.destination_type)
    }

    /// Returns `true` for collection boundaries
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.sequence.is_some()
    }

    /// Recompute [`height`](Self::height) from the children
    pub fn update_height(&mut self) {
        self.height = self
            .children
            .iter()
            .map(|child| child.height + 1)
            .max()
            .unwrap_or(0);
    }

    /// The leaf for a destination member
    pub fn member_mut(&mut self, name: &str) -> Option<&mut ProposedMemberMapping> {
        self.members
            .iter_mut()
            .find(|m| m.destination.name == name)
    }

    /// The nested boundary for a destination member
    pub fn child_mut(&mut self, name: &str) -> Option<&mut ProposedTypeMapping> {
        self.children.iter_mut().find(|child| {
            child
                .destination_member
                .as_ref()
                .is_some_and(|m| m.name == name)
        })
    }

    /// Ignore a destination member, leaf or nested. Returns `false` if nothing maps it.
    pub fn ignore_member(&mut self, name: &str) -> bool {
        if let Some(member) = self.member_mut(name) {
            member.ignored = true;
            return true;
        }
        if let Some(child) = self.child_mut(name) {
            child.ignored = true;
            return true;
        }
        false
    }

    /// Guard a leaf with a predicate. Returns `false` if no leaf maps the member.
    pub fn set_condition(&mut self, name: &str, condition: Arc<Lambda>) -> bool {
        match self.member_mut(name) {
            Some(member) => {
                member.condition = Some(condition);
                true
            }
            None => false,
        }
    }

    /// Use `constructor` whenever this mapping constructs an instance of `ty`
    pub fn construct_with(&mut self, ty: &MapTypeRc, constructor: Constructor) {
        self.constructors.retain(|(token, _)| *token != ty.token);
        self.constructors.push((ty.token, constructor));
    }

    /// Number of boundaries in this tree
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ProposedTypeMapping::node_count).sum::<usize>()
    }

    /// Every incompatible destination member of this tree, skipping ignored boundaries
    #[must_use]
    pub fn all_incompatible(&self) -> Vec<MemberRc> {
        if self.ignored {
            return Vec::new();
        }
        let mut result = self.incompatible.clone();
        for child in &self.children {
            result.extend(child.all_incompatible());
        }
        result
    }

    /// Returns `true` if the tree could be cached as a whole
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !self.do_not_cache && self.children.iter().all(ProposedTypeMapping::is_cacheable)
    }

    /// Structural equality: same pairs, same leaves, same children in the same order
    #[must_use]
    pub fn structurally_equal(&self, other: &ProposedTypeMapping) -> bool {
        self.pair == other.pair
            && self.element_pair() == other.element_pair()
            && self.ignored == other.ignored
            && self.is_enumerable == other.is_enumerable
            && self.members == other.members
            && self.members.iter().zip(&other.members).all(|(a, b)| a.ignored == b.ignored)
            && self.destination_member == other.destination_member
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.structurally_equal(b))
    }

    /// Detach from a parent position, used before storing a node in the cache
    #[must_use]
    pub fn detached(&self) -> ProposedTypeMapping {
        ProposedTypeMapping {
            source_member: None,
            destination_member: None,
            sequence: None,
            is_enumerable: false,
            condition: None,
            ignored: false,
            ..self.clone()
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        let target = self
            .destination_member
            .as_ref()
            .map_or_else(|| "<root>".to_string(), |m| m.name.clone());
        let source = self
            .source_member
            .as_ref()
            .map_or_else(String::new, |s| format!(" <- {s}"));
        let shape = if self.is_collection() { "[]" } else { "" };
        writeln!(
            f,
            "{pad}{target}{shape}{source}: {} -> {}{}",
            self.source_type,
            self.destination_type,
            if self.ignored { " (ignored)" } else { "" }
        )?;
        for member in &self.members {
            match (&member.source, member.ignored) {
                (_, true) | (None, _) => {
                    writeln!(f, "{pad}  {} (ignored)", member.destination.name)?;
                }
                (Some(source), false) => {
                    writeln!(f, "{pad}  {} <- {source}", member.destination.name)?;
                }
            }
        }
        for child in &self.children {
            child.write_tree(f, indent + 1)?;
        }
        for member in &self.incompatible {
            writeln!(f, "{pad}  {} (incompatible)", member.name)?;
        }
        Ok(())
    }
}

impl fmt::Display for ProposedTypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}
