//! The mapping resolution strategy.
//!
//! [`MappingStrategy`] turns a type pair into a [`ProposedTypeMapping`]. It walks destination
//! members through the configured [`MemberProvider`], matches them against source members or
//! flattened paths, and recurses into complex members and collection elements.
//!
//! # Recursion
//!
//! Every resolve call owns a private stack of the pairs currently being resolved. A pair already
//! on that stack is a cycle: with [`RecursionPolicy::Throw`] the call fails, otherwise the
//! repeated occurrence is omitted. Nodes strictly between the first occurrence and the cut depend
//! on where the walk started, so they are never cached.
//!
//! Depth bounds omit deeper children instead of failing. A node losing a child that way, and every
//! ancestor of it, is marked `do_not_cache`.
//!
//! # Caching
//!
//! Finished subtrees are cached per pair and shared by every caller of the strategy. Reads are
//! lock-free; inserts go through a dedicated lock. A cached tree of height `h` is reused at depth
//! `d` only while `d + h` stays within the configured bounds.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use log::{debug, trace};

use crate::{
    config::{MapperConfig, RecursionPolicy},
    mapper::PlanRepository,
    metadata::{
        member::{Member, MemberRc},
        provider::MemberProvider,
        typesystem::{
            MapType, MapTypeRc, PrimitiveKind, TypeCompatibility, TypeFlavor, TypePair,
            TypeRegistry,
        },
    },
    resolve::{
        CustomMapping, ProposedMemberMapping, ProposedTypeMapping, SequenceShape, SourceAccess,
    },
    Error, Result,
};

/// Decides per destination member whether it takes part in a resolution.
///
/// Called with the destination type and member; returning `false` skips the member entirely.
pub type MemberFilter = dyn Fn(&MapType, &Member) -> bool + Send + Sync;

/// Per-call options of [`MappingStrategy::resolve`]
#[derive(Clone, Default)]
pub struct ResolveOptions {
    /// Policy hook; its presence bypasses the proposal cache for the whole tree
    pub hook: Option<Arc<MemberFilter>>,
    /// Explicit overrides for the root pair; bypasses the cache for the root only
    pub custom: Option<Arc<CustomMapping>>,
}

impl ResolveOptions {
    /// No hook and no explicit overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a policy hook
    #[must_use]
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&MapType, &Member) -> bool + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Use explicit overrides for the root pair
    #[must_use]
    pub fn with_custom(mut self, custom: CustomMapping) -> Self {
        self.custom = Some(Arc::new(custom));
        self
    }
}

/// An override table registered for a pair
struct RegisteredOverride {
    source: MapTypeRc,
    destination: MapTypeRc,
    mapping: Arc<CustomMapping>,
    order: u64,
}

/// State of one resolve call
struct Scope<'a> {
    stack: Vec<TypePair>,
    hook: Option<&'a MemberFilter>,
    use_cache: bool,
}

/// What a finished subtree tells its ancestors
#[derive(Clone, Copy, Default)]
struct Marks {
    /// Lowest stack position a cycle was cut back to
    cut: Option<usize>,
    /// A depth bound omitted a child somewhere below
    truncated: bool,
}

impl Marks {
    fn merge(&mut self, other: Marks) {
        self.cut = match (self.cut, other.cut) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.truncated |= other.truncated;
    }
}

/// Resolves type pairs into proposed mapping trees
pub struct MappingStrategy {
    registry: Arc<TypeRegistry>,
    config: Arc<MapperConfig>,
    provider: Arc<dyn MemberProvider>,
    compat: TypeCompatibility,
    repository: Option<Arc<dyn PlanRepository>>,
    /// Finished, detached subtrees per pair
    cache: SkipMap<TypePair, Arc<ProposedTypeMapping>>,
    /// Override tables as registered
    overrides: SkipMap<TypePair, RegisteredOverride>,
    /// Combined (own plus inherited) override tables per pair
    customs: DashMap<TypePair, Option<Arc<CustomMapping>>>,
    order: AtomicU64,
    /// Bumped by every registration; cache writes from an older generation are dropped
    generation: AtomicU64,
    write_lock: Mutex<()>,
}

impl MappingStrategy {
    /// Create a new strategy
    ///
    /// ## Arguments
    /// * 'registry' - Registry owning every type taking part in a mapping
    /// * 'config'   - Read-only policy
    /// * 'provider' - Member discovery and matching conventions
    #[must_use]
    pub fn new(
        registry: Arc<TypeRegistry>,
        config: Arc<MapperConfig>,
        provider: Arc<dyn MemberProvider>,
    ) -> Self {
        MappingStrategy {
            registry,
            config,
            provider,
            compat: TypeCompatibility::new(),
            repository: None,
            cache: SkipMap::new(),
            overrides: SkipMap::new(),
            customs: DashMap::new(),
            order: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Consult `repository` for prebuilt plans before resolving a pair
    pub fn set_repository(&mut self, repository: Arc<dyn PlanRepository>) {
        self.repository = Some(repository);
    }

    /// The configuration this strategy resolves with
    #[must_use]
    pub fn config(&self) -> &Arc<MapperConfig> {
        &self.config
    }

    /// The type compatibility analyzer shared with lowering
    #[must_use]
    pub fn compatibility(&self) -> &TypeCompatibility {
        &self.compat
    }

    /// Register an override table for a pair.
    ///
    /// Tables registered for a base type or interface destination also apply to derived
    /// destinations. Registering clears every cached proposal.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the write lock is poisoned.
    pub fn register(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        mapping: CustomMapping,
    ) -> Result<()> {
        let pair = TypePair::of(source, destination);
        let _guard = lock!(self.write_lock);

        self.overrides.insert(
            pair,
            RegisteredOverride {
                source: source.clone(),
                destination: destination.clone(),
                mapping: Arc::new(mapping),
                order: self.order.fetch_add(1, Ordering::Relaxed),
            },
        );
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
        self.customs.clear();

        debug!("registered overrides for {source} -> {destination}");
        Ok(())
    }

    /// The cached proposal for a pair, if any
    #[must_use]
    pub fn cached(&self, pair: &TypePair) -> Option<Arc<ProposedTypeMapping>> {
        self.cache.get(pair).map(|entry| entry.value().clone())
    }

    /// Number of registrations so far
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Drop every cached proposal
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Resolve a pair into a proposed mapping tree.
    ///
    /// Collection pairs resolve their element pair and wrap it into an enumerable root.
    ///
    /// ## Arguments
    /// * 'source'      - The source type
    /// * 'destination' - The destination type
    /// * 'options'     - Policy hook and explicit root overrides
    ///
    /// # Errors
    /// Returns [`Error::RecursiveRelationship`] when a cycle is found and the recursion policy is
    /// [`RecursionPolicy::Throw`]. Nothing of a failed call is cached.
    pub fn resolve(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        options: &ResolveOptions,
    ) -> Result<ProposedTypeMapping> {
        debug!("resolving {source} -> {destination}");
        let mut scope = Scope {
            stack: Vec::new(),
            hook: options.hook.as_deref(),
            use_cache: options.hook.is_none(),
        };
        let custom = options.custom.as_ref();

        let node = if source.is_sequence() && destination.is_sequence() {
            let element_source = self.element_of(source);
            let element_destination = self.element_of(destination);

            let mut node = if self.is_identity_element(&element_source, &element_destination)
                || !Self::is_complex_pair(&element_source, &element_destination)
            {
                ProposedTypeMapping::new(&element_source, &element_destination)
            } else {
                self.resolve_pair(&element_source, &element_destination, custom, &mut scope)?
                    .0
                    .unwrap_or_else(|| {
                        ProposedTypeMapping::new(&element_source, &element_destination)
                    })
            };
            node.pair = TypePair::of(source, destination);
            node.is_enumerable = true;
            node.sequence = Some(SequenceShape {
                source: source.clone(),
                destination: destination.clone(),
            });
            node
        } else {
            self.resolve_pair(source, destination, custom, &mut scope)?
                .0
                .unwrap_or_else(|| ProposedTypeMapping::new(source, destination))
        };

        debug!(
            "resolved {source} -> {destination}: {} boundaries, height {}",
            node.node_count(),
            node.height
        );
        Ok(node)
    }

    /// The combined override table applying to a pair.
    ///
    /// Registered tables whose destination is the pair's destination or one of its supertypes,
    /// and whose source is the pair's source or one of its supertypes, are merged closest first.
    /// Ties on the destination distance go to the closer source, then to registration order.
    ///
    /// # Errors
    /// Returns errors of [`CustomMapping::combine`].
    pub fn custom_for(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        explicit: Option<&Arc<CustomMapping>>,
    ) -> Result<Option<Arc<CustomMapping>>> {
        let pair = TypePair::of(source, destination);
        let generation = self.generation.load(Ordering::Acquire);
        if explicit.is_none() {
            if let Some(entry) = self.customs.get(&pair) {
                return Ok(entry.value().clone());
            }
        }

        let mut candidates: Vec<(usize, usize, u64, Arc<CustomMapping>)> = self
            .overrides
            .iter()
            .filter_map(|entry| {
                let registered = entry.value();
                let destination_distance = destination.distance_to(&registered.destination)?;
                let source_distance = source.distance_to(&registered.source)?;
                Some((
                    destination_distance,
                    source_distance,
                    registered.order,
                    registered.mapping.clone(),
                ))
            })
            .collect();
        candidates.sort_by_key(|(destination, source, order, _)| (*destination, *source, *order));

        let combined = match (explicit, candidates.first()) {
            (Some(root), None) => Some(root.clone()),
            (None, None) => None,
            (Some(root), Some(_)) => {
                let others: Vec<&CustomMapping> =
                    candidates.iter().map(|(_, _, _, m)| m.as_ref()).collect();
                Some(Arc::new(CustomMapping::combine(root, &others)?))
            }
            (None, Some((0, 0, _, own))) => {
                let others: Vec<&CustomMapping> =
                    candidates[1..].iter().map(|(_, _, _, m)| m.as_ref()).collect();
                if others.is_empty() {
                    Some(own.clone())
                } else {
                    Some(Arc::new(CustomMapping::combine(own, &others)?))
                }
            }
            (None, Some(_)) => {
                let others: Vec<&CustomMapping> =
                    candidates.iter().map(|(_, _, _, m)| m.as_ref()).collect();
                let root = CustomMapping::new(source, destination);
                Some(Arc::new(CustomMapping::combine(&root, &others)?))
            }
        };

        if explicit.is_none() {
            let _guard = lock!(self.write_lock);
            if self.generation.load(Ordering::Acquire) == generation {
                self.customs.insert(pair, combined.clone());
            }
        }
        Ok(combined)
    }

    /// Resolve one boundary, honoring the recursion guard, prebuilt plans and the cache.
    ///
    /// Returns `None` for a cut cycle.
    fn resolve_pair(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        explicit: Option<&Arc<CustomMapping>>,
        scope: &mut Scope<'_>,
    ) -> Result<(Option<ProposedTypeMapping>, Marks)> {
        let pair = TypePair::of(source, destination);
        let depth = scope.stack.len();

        if let Some(position) = scope.stack.iter().position(|p| *p == pair) {
            let bounded_clone = pair.is_same_type()
                && self.config.clone_same_types
                && self.config.depth.clone.is_some();
            if !bounded_clone {
                if self.config.recursion == RecursionPolicy::Throw {
                    return Err(Error::RecursiveRelationship {
                        pair,
                        source_name: source.fullname(),
                        destination_name: destination.fullname(),
                    });
                }
                trace!("cut cycle {source} -> {destination} at depth {depth}");
                return Ok((
                    None,
                    Marks {
                        cut: Some(position),
                        truncated: false,
                    },
                ));
            }
        }

        if let Some(repository) = &self.repository {
            if let Some(plan) = repository.try_get_prebuilt_plan(pair) {
                debug!("using prebuilt plan '{}' for {pair}", plan.name());
                let mut node = ProposedTypeMapping::new(source, destination);
                node.prebuilt = Some(plan);
                return Ok((Some(node), Marks::default()));
            }
        }

        let cacheable = scope.use_cache && explicit.is_none();
        if cacheable {
            if let Some(entry) = self.cache.get(&pair) {
                let cached = entry.value();
                if self.fits(depth, cached.height) {
                    debug!("proposal cache hit for {source} -> {destination}");
                    return Ok((Some(cached.as_ref().clone()), Marks::default()));
                }
            }
            debug!("proposal cache miss for {source} -> {destination}");
        }

        let generation = self.generation.load(Ordering::Acquire);
        scope.stack.push(pair);
        let built = self.build_node(source, destination, explicit, scope);
        scope.stack.pop();
        let (mut node, marks) = built?;

        if marks.truncated || marks.cut.is_some_and(|cut| cut < depth) {
            node.do_not_cache = true;
        }

        if cacheable && node.is_cacheable() {
            let _guard = lock!(self.write_lock);
            if self.generation.load(Ordering::Acquire) == generation {
                self.cache.insert(pair, Arc::new(node.detached()));
            } else {
                trace!("dropping stale proposal for {source} -> {destination}");
            }
        }

        Ok((Some(node), marks))
    }

    /// Member-level resolution of one boundary
    fn build_node(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        explicit: Option<&Arc<CustomMapping>>,
        scope: &mut Scope<'_>,
    ) -> Result<(ProposedTypeMapping, Marks)> {
        let mut node = ProposedTypeMapping::new(source, destination);
        let mut marks = Marks::default();

        if !Self::is_complex_pair(source, destination) {
            return Ok((node, marks));
        }

        let custom = self.custom_for(source, destination, explicit)?;
        node.custom = custom.clone();

        for member in self.provider.destination_members(destination) {
            self.resolve_member(&mut node, &member, custom.as_deref(), scope, &mut marks)?;
        }

        node.update_height();
        Ok((node, marks))
    }

    fn resolve_member(
        &self,
        node: &mut ProposedTypeMapping,
        member: &MemberRc,
        custom: Option<&CustomMapping>,
        scope: &mut Scope<'_>,
        marks: &mut Marks,
    ) -> Result<()> {
        if self.provider.is_ignored(member) {
            node.members.push(ProposedMemberMapping::ignored(member));
            return Ok(());
        }

        if let Some(hook) = scope.hook {
            if !hook(&node.destination_type, member) {
                trace!("hook skipped {member}");
                return Ok(());
            }
        }

        if let Some(custom) = custom {
            if custom.is_ignored(member) {
                node.members.push(ProposedMemberMapping::ignored(member));
                return Ok(());
            }
            if let Some(value) = custom.override_for(member) {
                node.members.push(ProposedMemberMapping::new(
                    SourceAccess::Override(value.clone()),
                    member,
                    value.static_type(),
                ));
                return Ok(());
            }
            if let Some(nested) = custom.nested_for(member) {
                let child = Self::inline_child(&node.source_type, member, nested);
                node.children.push(child);
                return Ok(());
            }
        }

        let Some(destination) = member.ty.upgrade() else {
            self.unsatisfied(node, member);
            return Ok(());
        };

        let source_type = node.source_type.clone();
        let found = self
            .provider
            .match_source_member(&source_type, member)
            .and_then(|m| m.ty.upgrade().map(|ty| (SourceAccess::Member(m), ty)))
            .or_else(|| {
                self.provider
                    .propose_flattened_path(&source_type, member)
                    .map(|path| {
                        let ty = path.ty.clone();
                        (SourceAccess::Path(path), ty)
                    })
            });
        let Some((access, source)) = found else {
            self.unsatisfied(node, member);
            return Ok(());
        };

        let deep_copy = self.config.clone_same_types
            && source.token == destination.token
            && (destination.flavor.is_complex() || destination.is_sequence());

        if !deep_copy && self.is_leaf(&source, &destination) {
            node.members.push(ProposedMemberMapping::new(
                access,
                member,
                Some(source),
            ));
            return Ok(());
        }

        if source.is_sequence() && destination.is_sequence() {
            let element_source = self.element_of(&source);
            let element_destination = self.element_of(&destination);
            let shape = SequenceShape {
                source,
                destination,
            };
            self.attach_child(
                node,
                member,
                access,
                (&element_source, &element_destination),
                Some(shape),
                scope,
                marks,
            )
        } else if Self::is_complex_pair(&source, &destination) {
            self.attach_child(
                node,
                member,
                access,
                (&source, &destination),
                None,
                scope,
                marks,
            )
        } else {
            self.unsatisfied(node, member);
            Ok(())
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn attach_child(
        &self,
        node: &mut ProposedTypeMapping,
        member: &MemberRc,
        access: SourceAccess,
        (source, destination): (&MapTypeRc, &MapTypeRc),
        shape: Option<SequenceShape>,
        scope: &mut Scope<'_>,
        marks: &mut Marks,
    ) -> Result<()> {
        let depth = scope.stack.len();
        let pair = TypePair::of(source, destination);
        if let Some(bound) = self.config.depth_bound(pair.is_same_type()) {
            if depth > bound {
                debug!("depth bound {bound} omits {member} at depth {depth}");
                node.do_not_cache = true;
                marks.truncated = true;
                return Ok(());
            }
        }

        let child = if shape.is_some() && self.is_identity_element(source, destination) {
            Some(ProposedTypeMapping::new(source, destination))
        } else if shape.is_some() && !Self::is_complex_pair(source, destination) {
            let untyped = matches!(source.flavor, TypeFlavor::Primitive(PrimitiveKind::Object));
            if !untyped && !self.is_leaf(source, destination) {
                self.unsatisfied(node, member);
                return Ok(());
            }
            Some(ProposedTypeMapping::new(source, destination))
        } else {
            let (child, child_marks) = self.resolve_pair(source, destination, None, scope)?;
            marks.merge(child_marks);
            child
        };

        let Some(mut child) = child else {
            return Ok(());
        };
        child.source_member = Some(access);
        child.destination_member = Some(member.clone());
        child.sequence = shape;
        node.children.push(child);
        node.update_height();
        Ok(())
    }

    /// A boundary populated only from a nested override table
    fn inline_child(
        source: &MapTypeRc,
        member: &MemberRc,
        nested: &CustomMapping,
    ) -> ProposedTypeMapping {
        let mut child = ProposedTypeMapping::new(source, &nested.destination);
        child.inline = true;
        child.destination_member = Some(member.clone());
        child.custom = Some(Arc::new(nested.clone()));

        for (target, value) in &nested.overrides {
            child.members.push(ProposedMemberMapping::new(
                SourceAccess::Override(value.clone()),
                target,
                value.static_type(),
            ));
        }
        for target in &nested.ignored {
            child.members.push(ProposedMemberMapping::ignored(target));
        }
        for (target, inner) in &nested.nested {
            child.children.push(Self::inline_child(source, target, inner));
        }
        child.update_height();
        child
    }

    fn unsatisfied(&self, node: &mut ProposedTypeMapping, member: &MemberRc) {
        trace!("no source for {member}");
        if self.config.strict {
            node.incompatible.push(member.clone());
        }
    }

    /// Assignable, convertible, or handled by a text/date special case
    fn is_leaf(&self, source: &MapTypeRc, destination: &MapTypeRc) -> bool {
        self.compat.is_assignable(source, destination)
            || self.compat.are_convertible(source, destination)
            || Self::is_special_case(source, destination)
    }

    fn is_special_case(source: &MapTypeRc, destination: &MapTypeRc) -> bool {
        let text = |ty: &MapType| matches!(ty.flavor, TypeFlavor::Primitive(PrimitiveKind::String));
        let date = destination
            .nullable_inner()
            .unwrap_or_else(|| destination.clone());

        (text(destination) && !text(source))
            || (text(source)
                && matches!(date.flavor, TypeFlavor::Primitive(PrimitiveKind::DateTime)))
    }

    fn is_complex_pair(source: &MapType, destination: &MapType) -> bool {
        source.flavor.is_complex() && destination.flavor.is_complex()
    }

    /// Same element types without cloning are copied as-is
    fn is_identity_element(&self, source: &MapType, destination: &MapType) -> bool {
        source.token == destination.token && !self.config.clone_same_types
    }

    fn element_of(&self, sequence: &MapType) -> MapTypeRc {
        sequence
            .element_type()
            .unwrap_or_else(|| self.registry.object())
    }

    /// A cached tree of `height` may be placed at `depth` without exceeding a bound
    fn fits(&self, depth: usize, height: usize) -> bool {
        let clone = if self.config.clone_same_types {
            self.config.depth.clone
        } else {
            None
        };
        [self.config.depth.general, clone]
            .into_iter()
            .flatten()
            .all(|bound| depth + height <= bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{OnceLock, Weak};

    use crate::{
        config::{DepthLimits, MapperConfig},
        expr::Expr,
        metadata::provider::{ConventionMemberProvider, FlattenedPath},
        test::fixtures::Fixtures,
    };

    fn strategy(fixtures: &Fixtures, config: MapperConfig) -> MappingStrategy {
        let provider = Arc::new(ConventionMemberProvider::new(
            fixtures.registry.clone(),
            config.case_insensitive,
        ));
        MappingStrategy::new(fixtures.registry.clone(), Arc::new(config), provider)
    }

    #[test]
    fn test_flattened_members_and_override() {
        let fixtures = Fixtures::new();
        let strategy = strategy(&fixtures, MapperConfig::default());
        let custom = CustomMapping::new(&fixtures.customer, &fixtures.customer_dto);
        let first = Expr::param(&custom.param).path("FirstName").unwrap();
        let last = Expr::param(&custom.param).path("LastName").unwrap();
        let custom = custom
            .with_override(
                "FullName",
                Expr::binary(crate::expr::BinaryOp::Concat, first, last),
            )
            .unwrap();

        let tree = strategy
            .resolve(
                &fixtures.customer,
                &fixtures.customer_dto,
                &ResolveOptions::new().with_custom(custom),
            )
            .unwrap();

        let names: Vec<String> = tree
            .members
            .iter()
            .map(|m| format!("{} <- {}", m.destination.name, m.source.as_ref().unwrap()))
            .collect();
        assert!(names.contains(&"OrderCount <- Orders.Count".to_string()));
        assert!(names.contains(&"OrderAmount <- Orders.Sum(Amount)".to_string()));
        assert!(names.iter().any(|n| n.starts_with("FullName <- ")));
    }

    /// Registers one override on the strategy the first time members are listed
    struct RegisteringProvider {
        inner: ConventionMemberProvider,
        strategy: OnceLock<Weak<MappingStrategy>>,
        pending: Mutex<Option<(MapTypeRc, MapTypeRc, CustomMapping)>>,
    }

    impl MemberProvider for RegisteringProvider {
        fn destination_members(&self, ty: &MapType) -> Vec<MemberRc> {
            let pending = self.pending.lock().unwrap().take();
            if let Some((source, destination, mapping)) = pending {
                let strategy = self.strategy.get().and_then(Weak::upgrade).unwrap();
                strategy.register(&source, &destination, mapping).unwrap();
            }
            self.inner.destination_members(ty)
        }

        fn match_source_member(&self, source: &MapType, destination: &Member) -> Option<MemberRc> {
            self.inner.match_source_member(source, destination)
        }

        fn is_ignored(&self, destination: &Member) -> bool {
            self.inner.is_ignored(destination)
        }

        fn propose_flattened_path(
            &self,
            source: &MapType,
            destination: &Member,
        ) -> Option<FlattenedPath> {
            self.inner.propose_flattened_path(source, destination)
        }
    }

    #[test]
    fn test_registration_during_resolution_is_not_cached_stale() {
        let fixtures = Fixtures::new();
        let custom = CustomMapping::new(&fixtures.customer, &fixtures.customer_dto);
        let last = Expr::param(&custom.param).path("LastName").unwrap();
        let custom = custom.with_override("FullName", last).unwrap();

        let provider = Arc::new(RegisteringProvider {
            inner: ConventionMemberProvider::new(fixtures.registry.clone(), false),
            strategy: OnceLock::new(),
            pending: Mutex::new(Some((
                fixtures.customer.clone(),
                fixtures.customer_dto.clone(),
                custom,
            ))),
        });
        let strategy = Arc::new(MappingStrategy::new(
            fixtures.registry.clone(),
            Arc::new(MapperConfig::default()),
            provider.clone(),
        ));
        provider.strategy.set(Arc::downgrade(&strategy)).unwrap();

        let pair = TypePair::of(&fixtures.customer, &fixtures.customer_dto);
        let options = ResolveOptions::new();
        let stale = strategy
            .resolve(&fixtures.customer, &fixtures.customer_dto, &options)
            .unwrap();
        assert!(stale.custom.is_none());
        assert_eq!(strategy.generation(), 1);
        assert!(strategy.cached(&pair).is_none());

        let fresh = strategy
            .resolve(&fixtures.customer, &fixtures.customer_dto, &options)
            .unwrap();
        assert!(fresh.custom.is_some());
        assert!(strategy.cached(&pair).is_some());
    }

    #[test]
    fn test_resolution_is_deterministic_and_cached() {
        let fixtures = Fixtures::new();
        let strategy = strategy(&fixtures, MapperConfig::default());
        let options = ResolveOptions::new();

        let first = strategy
            .resolve(&fixtures.customer, &fixtures.customer_view, &options)
            .unwrap();
        let pair = TypePair::of(&fixtures.customer, &fixtures.customer_view);
        assert!(strategy.cached(&pair).is_some());

        let second = strategy
            .resolve(&fixtures.customer, &fixtures.customer_view, &options)
            .unwrap();
        assert!(first.structurally_equal(&second));
    }

    #[test]
    fn test_cycle_is_cut_with_ignore_policy() {
        let fixtures = Fixtures::new();
        let strategy = strategy(&fixtures, MapperConfig::default());

        let tree = strategy
            .resolve(&fixtures.node, &fixtures.node_dto, &ResolveOptions::new())
            .unwrap();

        assert!(tree.members.iter().any(|m| m.destination.name == "Name"));
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_cycle_fails_with_throw_policy() {
        let fixtures = Fixtures::new();
        let strategy = strategy(&fixtures, MapperConfig::strict());

        let result = strategy.resolve(&fixtures.node, &fixtures.node_dto, &ResolveOptions::new());
        assert!(matches!(result, Err(Error::RecursiveRelationship { .. })));

        let pair = TypePair::of(&fixtures.node, &fixtures.node_dto);
        assert!(strategy.cached(&pair).is_none());
    }

    #[test]
    fn test_depth_bound_marks_do_not_cache() {
        let fixtures = Fixtures::new();
        let config = MapperConfig::cloning().with_depth(DepthLimits::new().with_clone(2));
        let strategy = strategy(&fixtures, config);

        let tree = strategy
            .resolve(&fixtures.node, &fixtures.node, &ResolveOptions::new())
            .unwrap();

        assert_eq!(tree.height, 2);
        assert!(tree.do_not_cache);
        let pair = TypePair::of(&fixtures.node, &fixtures.node);
        assert!(strategy.cached(&pair).is_none());
    }

    #[test]
    fn test_strict_records_incompatible_members() {
        let fixtures = Fixtures::new();
        let strategy = strategy(&fixtures, MapperConfig::strict());

        let tree = strategy
            .resolve(&fixtures.customer, &fixtures.customer_dto, &ResolveOptions::new())
            .unwrap();

        let missing: Vec<String> = tree
            .all_incompatible()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(missing, vec!["FullName".to_string()]);
    }

    #[test]
    fn test_hook_skips_members_and_bypasses_cache() {
        let fixtures = Fixtures::new();
        let strategy = strategy(&fixtures, MapperConfig::default());
        let options = ResolveOptions::new().with_hook(|_, member| member.name != "Name");

        let tree = strategy
            .resolve(&fixtures.customer, &fixtures.customer_view, &options)
            .unwrap();

        assert!(tree.members.iter().all(|m| m.destination.name != "Name"));
        let pair = TypePair::of(&fixtures.customer, &fixtures.customer_view);
        assert!(strategy.cached(&pair).is_none());
    }

    #[test]
    fn test_inherited_override_applies_to_concrete_destination() {
        let fixtures = Fixtures::new();
        let strategy = strategy(&fixtures, MapperConfig::default());
        let custom = CustomMapping::new(&fixtures.customer, &fixtures.named);
        let value = Expr::param(&custom.param).path("LastName").unwrap();
        strategy
            .register(
                &fixtures.customer,
                &fixtures.named,
                custom.with_override("Name", value).unwrap(),
            )
            .unwrap();

        let tree = strategy
            .resolve(&fixtures.customer, &fixtures.contact, &ResolveOptions::new())
            .unwrap();
        let name = tree
            .members
            .iter()
            .find(|m| m.destination.name == "Name")
            .unwrap();

        assert_eq!(name.destination.declaring, fixtures.contact.token);
        assert!(matches!(name.source, Some(SourceAccess::Override(_))));
    }
}
