//! Mapper configuration types.
//!
//! This module provides the read-only policy consulted throughout resolution, lowering and
//! compilation.
//!
//! # Overview
//!
//! - [`MapperConfig`] - Top-level configuration container
//! - [`DepthLimits`] - Recursion bounds for nested and cloned members
//! - [`SpecialCases`] - String and date conversion toggles
//! - [`RecursionPolicy`], [`NullSourcePolicy`], [`CollectionPolicy`] - Behavior selectors
//!
//! # Configuration Presets
//!
//! - [`MapperConfig::strict()`] - Every destination member must be mapped, cycles fail
//! - [`MapperConfig::cloning()`] - Same-type mappings produce deep copies
//! - [`MapperConfig::lenient()`] - Case-insensitive, reuse existing objects, keep collections
//!
//! # Example
//!
//! ```rust
//! use dotmapper::{DepthLimits, MapperConfig};
//!
//! let config = MapperConfig {
//!     depth: DepthLimits::new().with_general(4),
//!     debug_plans: true,
//!     ..MapperConfig::strict()
//! };
//! assert!(config.strict);
//! assert_eq!(config.depth.general, Some(4));
//! ```

use crate::value::Culture;

/// What to do when a type pair appears twice on one resolution path
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecursionPolicy {
    /// Fail with [`Error::RecursiveRelationship`](crate::Error::RecursiveRelationship)
    Throw,
    /// Omit the repeated occurrence
    #[default]
    Ignore,
}

/// What a mapping produces for a `null` source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NullSourcePolicy {
    /// Return `null`, or the default for value-typed destinations
    #[default]
    ReturnNull,
    /// Do not check; reading the source fails with an evaluation error
    Crash,
    /// Return a freshly constructed destination
    NewInstance,
}

/// What happens to the contents of an existing destination collection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollectionPolicy {
    /// Allocate a new collection
    #[default]
    Replace,
    /// Append to the existing growable collection
    Preserve,
}

/// Recursion bounds.
///
/// A bound of `n` allows `n` nested levels below the root; `None` is unbounded. Exceeding a bound
/// omits the deeper child, it is never an error.
///
/// | Limit | Default Value |
/// |-------|---------------|
/// | `general` | unbounded |
/// | `clone` | 3 |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthLimits {
    /// Bound for pairs of different types
    pub general: Option<usize>,
    /// Bound for same-type pairs while cloning
    pub clone: Option<usize>,
}

impl Default for DepthLimits {
    fn default() -> Self {
        DepthLimits {
            general: None,
            clone: Some(3),
        }
    }
}

impl DepthLimits {
    /// Default limits
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the general bound
    #[must_use]
    pub fn with_general(mut self, depth: usize) -> Self {
        self.general = Some(depth);
        self
    }

    /// Set the clone bound
    #[must_use]
    pub fn with_clone(mut self, depth: usize) -> Self {
        self.clone = Some(depth);
        self
    }

    /// Remove every bound
    #[must_use]
    pub fn unbounded() -> Self {
        DepthLimits {
            general: None,
            clone: None,
        }
    }
}

/// Conversion special cases for text and dates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialCases {
    /// Convert non-text sources into text destinations through `ToString()`
    pub to_string: bool,
    /// Parse text sources into date destinations
    pub parse_dates: bool,
    /// Culture used when parsing dates
    pub culture: Culture,
}

impl Default for SpecialCases {
    fn default() -> Self {
        SpecialCases {
            to_string: true,
            parse_dates: true,
            culture: Culture::Invariant,
        }
    }
}

/// Configuration of a [`Mapper`](crate::Mapper).
///
/// # Default Configuration
///
/// - Case-insensitive member matching, non-strict coverage
/// - Cycles are silently cut, general depth unbounded, clone depth 3
/// - `null` sources map to `null`
/// - Nested destinations and collections are replaced
/// - Native emission and null-safety rewriting enabled
#[derive(Clone, Debug)]
pub struct MapperConfig {
    /// Fall back to case-insensitive member name matching
    pub case_insensitive: bool,

    /// Every destination member must be satisfiable.
    ///
    /// Violations are reported at finalize time as
    /// [`Error::IncompatibleMapping`](crate::Error::IncompatibleMapping).
    pub strict: bool,

    /// Behavior on recursive type relationships
    pub recursion: RecursionPolicy,

    /// Recursion bounds
    pub depth: DepthLimits,

    /// Behavior on a `null` source
    pub null_source: NullSourcePolicy,

    /// Populate a non-null existing nested destination instead of constructing a new one
    pub reuse_existing: bool,

    /// Behavior on existing destination collections
    pub collections: CollectionPolicy,

    /// Allow compiling plans into the process-wide emission module
    pub native_emission: bool,

    /// Rewrite member chains in override expressions into null-propagating chains
    pub null_safety: bool,

    /// Same-type complex members are deep-copied instead of shared
    pub clone_same_types: bool,

    /// String and date special cases
    pub special_cases: SpecialCases,

    /// Keep a textual dump of every lowered plan
    pub debug_plans: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            case_insensitive: true,
            strict: false,
            recursion: RecursionPolicy::Ignore,
            depth: DepthLimits::default(),
            null_source: NullSourcePolicy::ReturnNull,
            reuse_existing: false,
            collections: CollectionPolicy::Replace,
            native_emission: true,
            null_safety: true,
            clone_same_types: false,
            special_cases: SpecialCases::default(),
            debug_plans: false,
        }
    }
}

impl MapperConfig {
    /// Every destination member must be mapped and recursive relationships fail
    #[must_use]
    pub fn strict() -> Self {
        MapperConfig {
            strict: true,
            recursion: RecursionPolicy::Throw,
            ..Default::default()
        }
    }

    /// Same-type mappings produce deep copies up to the clone depth
    #[must_use]
    pub fn cloning() -> Self {
        MapperConfig {
            clone_same_types: true,
            ..Default::default()
        }
    }

    /// Reuse existing nested objects and keep existing collection contents
    #[must_use]
    pub fn lenient() -> Self {
        MapperConfig {
            reuse_existing: true,
            collections: CollectionPolicy::Preserve,
            null_source: NullSourcePolicy::NewInstance,
            ..Default::default()
        }
    }

    /// Set strict coverage
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set case-insensitive matching
    #[must_use]
    pub fn with_case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    /// Set the recursion policy
    #[must_use]
    pub fn with_recursion(mut self, policy: RecursionPolicy) -> Self {
        self.recursion = policy;
        self
    }

    /// Set the depth limits
    #[must_use]
    pub fn with_depth(mut self, depth: DepthLimits) -> Self {
        self.depth = depth;
        self
    }

    /// Set the null source policy
    #[must_use]
    pub fn with_null_source(mut self, policy: NullSourcePolicy) -> Self {
        self.null_source = policy;
        self
    }

    /// Set reuse of existing nested objects
    #[must_use]
    pub fn with_reuse_existing(mut self, enabled: bool) -> Self {
        self.reuse_existing = enabled;
        self
    }

    /// Set the collection policy
    #[must_use]
    pub fn with_collections(mut self, policy: CollectionPolicy) -> Self {
        self.collections = policy;
        self
    }

    /// Allow or forbid native emission
    #[must_use]
    pub fn with_native_emission(mut self, enabled: bool) -> Self {
        self.native_emission = enabled;
        self
    }

    /// Enable or disable null-safety rewriting
    #[must_use]
    pub fn with_null_safety(mut self, enabled: bool) -> Self {
        self.null_safety = enabled;
        self
    }

    /// Enable or disable deep copies of same-type members
    #[must_use]
    pub fn with_clone_same_types(mut self, enabled: bool) -> Self {
        self.clone_same_types = enabled;
        self
    }

    /// Set the string and date special cases
    #[must_use]
    pub fn with_special_cases(mut self, special_cases: SpecialCases) -> Self {
        self.special_cases = special_cases;
        self
    }

    /// Keep textual plan dumps
    #[must_use]
    pub fn with_debug_plans(mut self, enabled: bool) -> Self {
        self.debug_plans = enabled;
        self
    }

    /// The depth bound applying to a pair
    ///
    /// ## Arguments
    /// * 'same_type' - The pair maps a type onto itself
    #[must_use]
    pub fn depth_bound(&self, same_type: bool) -> Option<usize> {
        if same_type && self.clone_same_types {
            self.depth.clone
        } else {
            self.depth.general
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapperConfig::default();
        assert!(config.case_insensitive);
        assert!(!config.strict);
        assert_eq!(config.recursion, RecursionPolicy::Ignore);
        assert_eq!(config.depth.general, None);
        assert_eq!(config.depth.clone, Some(3));
        assert!(config.special_cases.to_string);
    }

    #[test]
    fn test_presets() {
        assert_eq!(MapperConfig::strict().recursion, RecursionPolicy::Throw);
        assert!(MapperConfig::cloning().clone_same_types);
        assert_eq!(
            MapperConfig::lenient().collections,
            CollectionPolicy::Preserve
        );
    }

    #[test]
    fn test_depth_bound_selection() {
        let config = MapperConfig::cloning().with_depth(DepthLimits::new().with_general(7));
        assert_eq!(config.depth_bound(true), Some(3));
        assert_eq!(config.depth_bound(false), Some(7));

        let plain = MapperConfig::default().with_depth(DepthLimits::new().with_general(7));
        assert_eq!(plain.depth_bound(true), Some(7));
    }
}
