//! Member discovery and matching conventions.
//!
//! The resolution strategy never inspects member lists directly; it asks a [`MemberProvider`]
//! which destination members exist, which source member feeds each of them, which members opt
//! out of mapping, and whether a destination member can be fed through a flattened path
//! (`CompanyName` from `Company.Name`). [`ConventionMemberProvider`] implements the name based
//! conventions used by default.

use std::{fmt, sync::Arc};

use crate::metadata::{
    member::{Member, MemberRc},
    typesystem::{MapType, MapTypeRc, PrimitiveKind, TypeFlavor, TypeRegistry},
};

/// Deepest navigation a flattened path may take
const MAX_FLATTEN_DEPTH: usize = 8;

/// One step of a flattened source path
#[derive(Clone, Debug)]
pub enum PathStep {
    /// Read a member
    Member(MemberRc),
    /// Number of elements of the sequence reached so far
    Count,
    /// Sum of a member over every element of the sequence reached so far
    Sum(MemberRc),
}

/// A source path standing in for a missing direct source member
#[derive(Clone, Debug)]
pub struct FlattenedPath {
    /// Steps starting at the source instance
    pub steps: Vec<PathStep>,
    /// Type of the value produced by the last step
    pub ty: MapTypeRc,
}

impl FlattenedPath {
    /// Dotted rendering, used for diagnostics and plan dumps
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            match step {
                PathStep::Member(member) => parts.push(member.name.clone()),
                PathStep::Count => parts.push("Count".to_string()),
                PathStep::Sum(member) => parts.push(format!("Sum({})", member.name)),
            }
        }
        parts.join(".")
    }
}

impl fmt::Display for FlattenedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Supplies member lists and matching decisions to the resolution strategy
pub trait MemberProvider: Send + Sync {
    /// The members of `ty` that can be populated, in declaration order
    fn destination_members(&self, ty: &MapType) -> Vec<MemberRc>;

    /// The member of `source` feeding `destination`, if any
    fn match_source_member(&self, source: &MapType, destination: &Member) -> Option<MemberRc>;

    /// Returns `true` if `destination` opts out of convention mapping
    fn is_ignored(&self, destination: &Member) -> bool;

    /// A navigation path through `source` feeding `destination`, if any
    fn propose_flattened_path(
        &self,
        source: &MapType,
        destination: &Member,
    ) -> Option<FlattenedPath>;
}

/// The default, name based member conventions
pub struct ConventionMemberProvider {
    registry: Arc<TypeRegistry>,
    case_insensitive: bool,
}

impl ConventionMemberProvider {
    /// Create a new provider
    ///
    /// ## Arguments
    /// * 'registry'         - Registry used to look up result types of aggregations
    /// * 'case_insensitive' - Fall back to ASCII case-insensitive name matching
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, case_insensitive: bool) -> Self {
        ConventionMemberProvider {
            registry,
            case_insensitive,
        }
    }

    fn readable_members(ty: &MapType) -> impl Iterator<Item = MemberRc> + '_ {
        ty.members
            .iter()
            .map(|(_, member)| member)
            .filter(|member| member.is_readable())
            .cloned()
    }

    fn find_readable(&self, ty: &MapType, name: &str) -> Option<MemberRc> {
        Self::readable_members(ty)
            .find(|member| member.name == name)
            .or_else(|| {
                if self.case_insensitive {
                    Self::readable_members(ty).find(|member| member.name.eq_ignore_ascii_case(name))
                } else {
                    None
                }
            })
    }

    /// The remainder of `name` after `prefix`, if `name` is strictly longer and starts with it
    fn strip_prefix<'n>(&self, name: &'n str, prefix: &str) -> Option<&'n str> {
        let head = name.get(..prefix.len())?;
        let matches = if self.case_insensitive {
            head.eq_ignore_ascii_case(prefix)
        } else {
            head == prefix
        };
        if matches && name.len() > prefix.len() {
            name.get(prefix.len()..)
        } else {
            None
        }
    }

    fn names_equal(&self, left: &str, right: &str) -> bool {
        left == right || (self.case_insensitive && left.eq_ignore_ascii_case(right))
    }

    /// Prefixes a member may be matched with: its name, and for sequences the singular form
    fn prefixes(member: &Member, is_sequence: bool) -> Vec<String> {
        let mut prefixes = vec![member.name.clone()];
        if is_sequence {
            if let Some(singular) = member.name.strip_suffix('s') {
                if !singular.is_empty() {
                    prefixes.push(singular.to_string());
                }
            }
        }
        prefixes
    }

    fn flatten(
        &self,
        source: &MapType,
        rest: &str,
        mut steps: Vec<PathStep>,
        depth: usize,
    ) -> Option<FlattenedPath> {
        if depth >= MAX_FLATTEN_DEPTH {
            return None;
        }

        let mut candidates: Vec<(String, MemberRc, MapTypeRc)> = Vec::new();
        for member in Self::readable_members(source) {
            let Some(ty) = member.ty.upgrade() else {
                continue;
            };
            for prefix in Self::prefixes(&member, ty.is_sequence()) {
                if self.strip_prefix(rest, &prefix).is_some() {
                    candidates.push((prefix, member.clone(), ty.clone()));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        for (prefix, member, ty) in candidates {
            let Some(remainder) = self.strip_prefix(rest, &prefix) else {
                continue;
            };

            if ty.is_sequence() {
                if let Some(path) = self.flatten_sequence(&member, &ty, remainder, &steps) {
                    return Some(path);
                }
                continue;
            }

            if !ty.flavor.is_complex() {
                continue;
            }

            if let Some(direct) = self.find_readable(&ty, remainder) {
                if let Some(direct_ty) = direct.ty.upgrade() {
                    let mut found = steps.clone();
                    found.push(PathStep::Member(member.clone()));
                    found.push(PathStep::Member(direct));
                    return Some(FlattenedPath {
                        steps: found,
                        ty: direct_ty,
                    });
                }
            }

            steps.push(PathStep::Member(member.clone()));
            if let Some(path) = self.flatten(&ty, remainder, steps.clone(), depth + 1) {
                return Some(path);
            }
            steps.pop();
        }

        None
    }

    /// `XCount` / `XLength` and `XMember` (a sum of a numeric element member)
    fn flatten_sequence(
        &self,
        member: &MemberRc,
        ty: &MapType,
        remainder: &str,
        steps: &[PathStep],
    ) -> Option<FlattenedPath> {
        let mut found = steps.to_vec();
        found.push(PathStep::Member(member.clone()));

        if self.names_equal(remainder, "Count") || self.names_equal(remainder, "Length") {
            found.push(PathStep::Count);
            return Some(FlattenedPath {
                steps: found,
                ty: self.registry.primitive(PrimitiveKind::I4),
            });
        }

        let element = ty.element_type()?;
        if !element.flavor.is_complex() {
            return None;
        }

        let summed = self.find_readable(&element, remainder)?;
        let summed_ty = summed.ty.upgrade()?;
        let result_ty = summed_ty.nullable_inner().unwrap_or_else(|| summed_ty.clone());
        match result_ty.flavor {
            TypeFlavor::Primitive(kind) if kind.is_numeric() && kind != PrimitiveKind::Char => {
                found.push(PathStep::Sum(summed));
                Some(FlattenedPath {
                    steps: found,
                    ty: result_ty,
                })
            }
            _ => None,
        }
    }
}

impl MemberProvider for ConventionMemberProvider {
    fn destination_members(&self, ty: &MapType) -> Vec<MemberRc> {
        ty.members
            .iter()
            .map(|(_, member)| member)
            .filter(|member| member.is_writable())
            .cloned()
            .collect()
    }

    fn match_source_member(&self, source: &MapType, destination: &Member) -> Option<MemberRc> {
        self.find_readable(source, &destination.name)
    }

    fn is_ignored(&self, destination: &Member) -> bool {
        destination.is_ignored()
    }

    fn propose_flattened_path(
        &self,
        source: &MapType,
        destination: &Member,
    ) -> Option<FlattenedPath> {
        self.flatten(source, &destination.name, Vec::new(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeBuilder;

    fn provider(registry: &Arc<TypeRegistry>) -> ConventionMemberProvider {
        ConventionMemberProvider::new(registry.clone(), true)
    }

    #[test]
    fn test_exact_then_case_insensitive() {
        let registry = Arc::new(TypeRegistry::new());
        let source = TypeBuilder::class(&registry, "Demo", "Source")
            .property("id", &registry.primitive(PrimitiveKind::I4))
            .property("Id", &registry.primitive(PrimitiveKind::I8))
            .property("name", &registry.string())
            .build();
        let destination = TypeBuilder::class(&registry, "Demo", "Dest")
            .property("Id", &registry.primitive(PrimitiveKind::I4))
            .property("Name", &registry.string())
            .build();

        let id = destination.member("Id", false).unwrap();
        let name = destination.member("Name", false).unwrap();

        let matched = provider(&registry).match_source_member(&source, &id).unwrap();
        assert_eq!(matched.name, "Id");

        assert!(provider(&registry).match_source_member(&source, &name).is_some());
        let strict = ConventionMemberProvider::new(registry.clone(), false);
        assert!(strict.match_source_member(&source, &name).is_none());
    }

    #[test]
    fn test_flatten_nested_member() {
        let registry = Arc::new(TypeRegistry::new());
        let company = TypeBuilder::class(&registry, "Demo", "Company")
            .property("Name", &registry.string())
            .build();
        let employee = TypeBuilder::class(&registry, "Demo", "Employee")
            .property("Company", &company)
            .build();
        let dto = TypeBuilder::class(&registry, "Demo", "EmployeeDto")
            .property("CompanyName", &registry.string())
            .build();

        let member = dto.member("CompanyName", false).unwrap();
        let path = provider(&registry)
            .propose_flattened_path(&employee, &member)
            .unwrap();
        assert_eq!(path.describe(), "Company.Name");
        assert_eq!(path.ty.token, registry.string().token);
    }

    #[test]
    fn test_flatten_two_levels() {
        let registry = Arc::new(TypeRegistry::new());
        let address = TypeBuilder::class(&registry, "Demo", "Address")
            .property("City", &registry.string())
            .build();
        let customer = TypeBuilder::class(&registry, "Demo", "Customer")
            .property("Address", &address)
            .build();
        let order = TypeBuilder::class(&registry, "Demo", "Order")
            .property("Customer", &customer)
            .build();
        let dto = TypeBuilder::class(&registry, "Demo", "OrderDto")
            .property("CustomerAddressCity", &registry.string())
            .build();

        let member = dto.member("CustomerAddressCity", false).unwrap();
        let path = provider(&registry)
            .propose_flattened_path(&order, &member)
            .unwrap();
        assert_eq!(path.describe(), "Customer.Address.City");
    }

    #[test]
    fn test_sequence_count_and_sum() {
        let registry = Arc::new(TypeRegistry::new());
        let decimal = registry.primitive(PrimitiveKind::Decimal);
        let order = TypeBuilder::class(&registry, "Demo", "Order")
            .property("Amount", &decimal)
            .property("Note", &registry.string())
            .build();
        let customer = TypeBuilder::class(&registry, "Demo", "Customer")
            .property("Orders", &registry.list_of(&order))
            .build();
        let dto = TypeBuilder::class(&registry, "Demo", "CustomerDto")
            .property("OrderCount", &registry.primitive(PrimitiveKind::I4))
            .property("OrderAmount", &decimal)
            .property("OrderNote", &registry.string())
            .build();

        let provider = provider(&registry);
        let count = dto.member("OrderCount", false).unwrap();
        let path = provider.propose_flattened_path(&customer, &count).unwrap();
        assert_eq!(path.describe(), "Orders.Count");

        let amount = dto.member("OrderAmount", false).unwrap();
        let path = provider.propose_flattened_path(&customer, &amount).unwrap();
        assert_eq!(path.describe(), "Orders.Sum(Amount)");
        assert_eq!(path.ty.token, decimal.token);

        let note = dto.member("OrderNote", false).unwrap();
        assert!(provider.propose_flattened_path(&customer, &note).is_none());
    }

    #[test]
    fn test_destination_members_and_ignore() {
        let registry = Arc::new(TypeRegistry::new());
        let dto = TypeBuilder::class(&registry, "Demo", "Dto")
            .property("Name", &registry.string())
            .readonly_property("Computed", &registry.string())
            .ignored_property("Secret", &registry.string())
            .build();

        let provider = provider(&registry);
        let members = provider.destination_members(&dto);
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Secret"]);

        let secret = dto.member("Secret", false).unwrap();
        assert!(provider.is_ignored(&secret));
    }
}
