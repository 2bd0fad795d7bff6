//! The mapper facade.
//!
//! A [`Mapper`] ties resolution, lowering and compilation together and owns every piece of
//! shared state: the type registry, the configuration, the [`MappingStrategy`] with its caches,
//! the mapper-wide constructor table, an optional [`PlanRepository`] and the registry of
//! compiled artifacts ([`MemberMap`]s).
//!
//! # Lifecycle
//!
//! 1. Register override tables and constructors
//! 2. [`Mapper::resolve`] a pair into a [`ProposedTypeMapping`], optionally edit it
//! 3. [`Mapper::finalize`] the tree into a registered [`MemberMap`]
//! 4. [`Mapper::map`] values, or call the member map directly
//!
//! [`Mapper::map`] resolves and finalizes on first use, so steps 2 and 3 are only needed to
//! customize a tree.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotmapper::{Mapper, MapperConfig, TypeRegistry, Value};
//! use dotmapper::metadata::typesystem::TypeBuilder;
//! use dotmapper::value::ObjectRef;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let string = registry.string();
//! let person = TypeBuilder::class(&registry, "Demo", "Person")
//!     .property("Name", &string)
//!     .build();
//! let dto = TypeBuilder::class(&registry, "Demo", "PersonDto")
//!     .property("Name", &string)
//!     .build();
//!
//! let mapper = Mapper::new(registry.clone(), MapperConfig::default());
//! let source = ObjectRef::new(&person);
//! source.set_field("Name", "Ada")?;
//!
//! let mapped = mapper.map(&person, &dto, &Value::Object(source))?;
//! assert_eq!(mapped.field("Name")?, Value::string("Ada"));
//! # Ok::<(), dotmapper::Error>(())
//! ```

mod registry;
mod repository;

pub use registry::{MapKey, MapRegistry};
pub use repository::{PlanRepository, PrebuiltFn, PrebuiltPlan};

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use log::debug;
use rayon::prelude::*;

use crate::{
    compiler::{build_plan, CompiledFunction, LowerContext},
    config::MapperConfig,
    expr::Expr,
    metadata::{
        provider::{ConventionMemberProvider, MemberProvider},
        token::Token,
        typesystem::{MapTypeRc, TypePair, TypeRegistry},
    },
    resolve::{Constructor, CustomMapping, MappingStrategy, ProposedTypeMapping, ResolveOptions},
    value::Value,
    Error, Result,
};

/// A compiled, registered mapping for one pair
pub struct MemberMap {
    /// The mapped pair
    pub pair: TypePair,
    /// Type of the extra argument, for the extra-argument variant
    pub extra: Option<MapTypeRc>,
    function: CompiledFunction,
    debug: Option<String>,
}

impl MemberMap {
    /// Wrap a compiled function
    ///
    /// ## Arguments
    /// * 'pair'     - The mapped pair
    /// * 'extra'    - Type of the extra argument, if the function takes one
    /// * 'function' - The compiled function
    /// * 'debug'    - Textual dump of the plan, if kept
    #[must_use]
    pub fn new(
        pair: TypePair,
        extra: Option<MapTypeRc>,
        function: CompiledFunction,
        debug: Option<String>,
    ) -> Self {
        MemberMap {
            pair,
            extra,
            function,
            debug,
        }
    }

    /// Run the mapping.
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] for runtime failures of the mapping.
    pub fn invoke(
        &self,
        source: &Value,
        destination: &Value,
        extra: Option<&Value>,
    ) -> Result<Value> {
        self.function.invoke(source, destination, extra)
    }

    /// Textual dump of the lowered plan, kept when `debug_plans` is on
    #[must_use]
    pub fn debug_plan(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    /// Returns `true` if the mapping runs emitted code
    #[must_use]
    pub fn is_emitted(&self) -> bool {
        self.function.is_emitted()
    }

    /// The compiled function
    #[must_use]
    pub fn function(&self) -> &CompiledFunction {
        &self.function
    }
}

impl fmt::Debug for MemberMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberMap")
            .field("pair", &self.pair)
            .field("extra", &self.extra.as_ref().map(|ty| ty.fullname()))
            .field("emitted", &self.is_emitted())
            .finish_non_exhaustive()
    }
}

/// Resolves, compiles and runs object-to-object mappings
pub struct Mapper {
    registry: Arc<TypeRegistry>,
    config: Arc<MapperConfig>,
    strategy: MappingStrategy,
    constructors: DashMap<Token, Constructor>,
    maps: MapRegistry,
}

impl Mapper {
    /// Create a mapper with the convention member provider
    ///
    /// ## Arguments
    /// * 'registry' - Registry owning every mapped type
    /// * 'config'   - Mapper policy
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, config: MapperConfig) -> Self {
        let provider = Arc::new(ConventionMemberProvider::new(
            registry.clone(),
            config.case_insensitive,
        ));
        Self::with_provider(registry, config, provider)
    }

    /// Create a mapper with a custom member provider
    #[must_use]
    pub fn with_provider(
        registry: Arc<TypeRegistry>,
        config: MapperConfig,
        provider: Arc<dyn MemberProvider>,
    ) -> Self {
        let config = Arc::new(config);
        Mapper {
            strategy: MappingStrategy::new(registry.clone(), config.clone(), provider),
            registry,
            config,
            constructors: DashMap::new(),
            maps: MapRegistry::new(),
        }
    }

    /// Consult `repository` for prebuilt plans before resolving any pair
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn PlanRepository>) -> Self {
        self.strategy.set_repository(repository);
        self
    }

    /// The type registry
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// The resolution strategy, for cache inspection
    #[must_use]
    pub fn strategy(&self) -> &MappingStrategy {
        &self.strategy
    }

    /// Register an override table for a pair
    ///
    /// Every compiled map is dropped, pairs mapped before are compiled again on next use.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the strategy lock is poisoned.
    pub fn register(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        mapping: CustomMapping,
    ) -> Result<()> {
        self.strategy.register(source, destination, mapping)?;
        self.maps.clear()
    }

    /// Parse and register an override template (`src => new Dst { .. }` or
    /// `(src, dst) => dst { .. }`) for a pair
    ///
    /// # Errors
    /// Returns [`Error::Argument`] for malformed templates.
    pub fn register_template(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        template: &Expr,
    ) -> Result<()> {
        let mapping = CustomMapping::parse(destination, template)?;
        self.register(source, destination, mapping)
    }

    /// Install a mapper-wide constructor for `ty`, used by every mapping constructing it
    pub fn construct_with(&self, ty: &MapTypeRc, constructor: Constructor) {
        self.constructors.insert(ty.token, constructor);
    }

    /// Resolve a pair with the registered overrides
    ///
    /// # Errors
    /// Returns [`Error::RecursiveRelationship`] for cycles under the `Throw` policy.
    pub fn resolve(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
    ) -> Result<ProposedTypeMapping> {
        self.strategy.resolve(source, destination, &ResolveOptions::new())
    }

    /// Resolve a pair with a policy hook or an explicit root override table
    ///
    /// # Errors
    /// Returns [`Error::RecursiveRelationship`] for cycles under the `Throw` policy.
    pub fn resolve_with(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        options: &ResolveOptions,
    ) -> Result<ProposedTypeMapping> {
        self.strategy.resolve(source, destination, options)
    }

    /// Compile and register `tree` as the plain variant of its pair.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleMapping`] under strict coverage when destination members stay
    /// unmapped, and [`Error::CodeGeneration`] when lowering fails. Nothing is registered then.
    pub fn finalize(&self, tree: &ProposedTypeMapping) -> Result<Arc<MemberMap>> {
        self.finalize_inner(tree, None)
    }

    /// Compile and register `tree` as the extra-argument variant of its pair
    ///
    /// # Errors
    /// As [`Mapper::finalize`].
    pub fn finalize_with_extra(
        &self,
        tree: &ProposedTypeMapping,
        extra: &MapTypeRc,
    ) -> Result<Arc<MemberMap>> {
        self.finalize_inner(tree, Some(extra))
    }

    fn finalize_inner(
        &self,
        tree: &ProposedTypeMapping,
        extra: Option<&MapTypeRc>,
    ) -> Result<Arc<MemberMap>> {
        if self.config.strict {
            let missing = tree.all_incompatible();
            if !missing.is_empty() {
                return Err(Error::IncompatibleMapping {
                    pair: tree.pair,
                    members: missing.iter().map(|member| member.qualified_name()).collect(),
                });
            }
        }

        let ctx = LowerContext {
            config: &self.config,
            compat: self.strategy.compatibility(),
            registry: &self.registry,
            constructors: &self.constructors,
        };
        let plan = build_plan(tree, extra, &ctx)?;
        let debug = self.config.debug_plans.then(|| plan.to_string());
        let pair = plan.pair;

        let function = CompiledFunction::compile(plan, &self.config);
        debug!(
            "finalized {pair} ({}, {})",
            if extra.is_some() { "extra" } else { "plain" },
            if function.is_emitted() { "emitted" } else { "interpreted" }
        );

        let map = Arc::new(MemberMap::new(pair, extra.cloned(), function, debug));
        let key = MapKey {
            pair,
            extra: extra.is_some(),
        };
        self.maps.insert(key, map.clone())?;
        Ok(map)
    }

    /// The registered plain artifact for a pair
    #[must_use]
    pub fn member_map(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
    ) -> Option<Arc<MemberMap>> {
        self.maps.get(&MapKey::plain(TypePair::of(source, destination)))
    }

    /// The plain artifact for a pair, resolved and finalized on first use
    fn plain_map(&self, source: &MapTypeRc, destination: &MapTypeRc) -> Result<Arc<MemberMap>> {
        if let Some(map) = self.member_map(source, destination) {
            return Ok(map);
        }
        let tree = self.resolve(source, destination)?;
        self.finalize(&tree)
    }

    /// Map `value` into a new destination
    ///
    /// # Errors
    /// Returns resolution and finalize errors on first use, and [`Error::Evaluation`] for runtime
    /// failures.
    pub fn map(&self, source: &MapTypeRc, destination: &MapTypeRc, value: &Value) -> Result<Value> {
        self.plain_map(source, destination)?
            .invoke(value, &Value::Null, None)
    }

    /// Map `value` into an existing destination instance
    ///
    /// # Errors
    /// As [`Mapper::map`].
    pub fn map_into(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        value: &Value,
        existing: &Value,
    ) -> Result<Value> {
        self.plain_map(source, destination)?
            .invoke(value, existing, None)
    }

    /// Map `value` with an extra argument through the extra-argument variant
    ///
    /// # Errors
    /// Returns [`Error::MapNotFound`] if the pair was never finalized with an extra argument.
    pub fn map_with(
        &self,
        source: &MapTypeRc,
        destination: &MapTypeRc,
        value: &Value,
        extra: &Value,
    ) -> Result<Value> {
        let pair = TypePair::of(source, destination);
        let map = self
            .maps
            .get(&MapKey::with_extra(pair))
            .ok_or(Error::MapNotFound { pair, extra: true })?;
        map.invoke(value, &Value::Null, Some(extra))
    }

    /// Resolve and finalize many independent pairs in parallel
    ///
    /// # Errors
    /// Returns the first error of any pair; pairs finalized before stay registered.
    pub fn precompile(&self, pairs: &[(MapTypeRc, MapTypeRc)]) -> Result<Vec<Arc<MemberMap>>> {
        pairs
            .par_iter()
            .map(|(source, destination)| self.plain_map(source, destination))
            .collect()
    }

    /// Number of registered artifacts
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.maps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NullSourcePolicy,
        test::fixtures::{customer_value, Fixtures},
    };

    #[test]
    fn test_map_finalizes_on_first_use() {
        let fixtures = Fixtures::new();
        let mapper = Mapper::new(fixtures.registry.clone(), MapperConfig::default());
        assert!(mapper.member_map(&fixtures.customer, &fixtures.customer_view).is_none());

        let source = customer_value(&fixtures, "John", "Doe", &[40, 75]);
        let view = mapper
            .map(&fixtures.customer, &fixtures.customer_view, &source)
            .unwrap();

        assert_eq!(view.field("Name").unwrap(), Value::string("John Doe"));
        assert_eq!(view.field("Orders").unwrap().items().unwrap().len(), 2);
        assert!(mapper.member_map(&fixtures.customer, &fixtures.customer_view).is_some());
        assert_eq!(mapper.compiled_count(), 1);
    }

    #[test]
    fn test_map_with_requires_extra_variant() {
        let fixtures = Fixtures::new();
        let mapper = Mapper::new(fixtures.registry.clone(), MapperConfig::default());
        let source = customer_value(&fixtures, "John", "Doe", &[]);

        let result = mapper.map_with(
            &fixtures.customer,
            &fixtures.customer_view,
            &source,
            &Value::string("x"),
        );
        assert!(matches!(result, Err(Error::MapNotFound { extra: true, .. })));
    }

    #[test]
    fn test_debug_plan_kept_on_request() {
        let fixtures = Fixtures::new();
        let config = MapperConfig::default()
            .with_debug_plans(true)
            .with_null_source(NullSourcePolicy::ReturnNull);
        let mapper = Mapper::new(fixtures.registry.clone(), config);

        let tree = mapper.resolve(&fixtures.customer, &fixtures.customer_view).unwrap();
        let map = mapper.finalize(&tree).unwrap();
        let dump = map.debug_plan().unwrap();
        assert!(dump.contains("return"));
        assert!(dump.contains("Demo.Customer"));
    }

    #[test]
    fn test_precompile_in_parallel() {
        let fixtures = Fixtures::new();
        let mapper = Mapper::new(fixtures.registry.clone(), MapperConfig::default());
        let maps = mapper
            .precompile(&[
                (fixtures.customer.clone(), fixtures.customer_view.clone()),
                (fixtures.node.clone(), fixtures.node_dto.clone()),
            ])
            .unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(mapper.compiled_count(), 2);
    }
}
