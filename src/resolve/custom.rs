//! Custom override tables.
//!
//! A [`CustomMapping`] is parsed from a template lambda describing how to construct a destination:
//!
//! - `src => new Dto { A = .., B = .. }` or `(src, extra) => new Dto { .. }`
//! - `(src, dst) => dst { .A = .., .B = .. }`
//!
//! Every initializer becomes an override for the destination member of the same name. An
//! initializer that itself constructs a new object (`Address = new AddressDto { .. }`) becomes a
//! nested table for that member.

use crate::{
    expr::{Expr, ExprRewriter, Param, ParamSubstitution},
    metadata::{
        member::{Member, MemberRc},
        typesystem::MapTypeRc,
    },
    Error, Result,
};

/// Per-destination-member override expressions for one object boundary
#[derive(Clone, Debug)]
pub struct CustomMapping {
    /// Placeholder standing for the source instance
    pub param: Param,
    /// Placeholder standing for the extra argument, for two-parameter construction templates
    pub extra: Option<Param>,
    /// Placeholder standing for the destination instance, for binding templates
    pub destination_param: Option<Param>,
    /// The destination type the table was declared for
    pub destination: MapTypeRc,
    /// Override expressions in declaration order
    pub overrides: Vec<(MemberRc, Expr)>,
    /// Nested tables for members constructed inline
    pub nested: Vec<(MemberRc, CustomMapping)>,
    /// Members explicitly excluded from mapping
    pub ignored: Vec<MemberRc>,
}

impl CustomMapping {
    /// An empty table for `destination`
    #[must_use]
    pub fn new(source: &MapTypeRc, destination: &MapTypeRc) -> Self {
        CustomMapping {
            param: Param::new("src", source),
            extra: None,
            destination_param: None,
            destination: destination.clone(),
            overrides: Vec::new(),
            nested: Vec::new(),
            ignored: Vec::new(),
        }
    }

    /// Parse a template lambda into an override table.
    ///
    /// ## Arguments
    /// * 'destination' - The destination type the template constructs
    /// * 'template'    - A lambda whose body is a construction or a binding
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if the template is not a one- or two-parameter lambda, its body
    /// is neither form, it constructs an unrelated type, or it names a member the destination
    /// does not have.
    pub fn parse(destination: &MapTypeRc, template: &Expr) -> Result<Self> {
        let Expr::Lambda(lambda) = template else {
            return Err(Error::Argument(format!(
                "override template for {destination} must be a lambda, got {template}"
            )));
        };

        let (param, second) = match lambda.params.as_slice() {
            [param] => (param.clone(), None),
            [param, second] => (param.clone(), Some(second.clone())),
            params => {
                return Err(Error::Argument(format!(
                    "override template for {destination} must take one or two parameters, got {}",
                    params.len()
                )))
            }
        };

        match &lambda.body {
            Expr::New { ty, inits } => {
                Self::check_constructed(destination, ty)?;
                let mut mapping = CustomMapping {
                    param,
                    extra: second,
                    destination_param: None,
                    destination: destination.clone(),
                    overrides: Vec::new(),
                    nested: Vec::new(),
                    ignored: Vec::new(),
                };
                mapping.fill(inits)?;
                Ok(mapping)
            }
            Expr::Bind { target, bindings } => {
                let bound_to_destination = matches!(
                    (target.as_ref(), &second),
                    (Expr::Param(target), Some(dst)) if target.id == dst.id
                );
                if !bound_to_destination {
                    return Err(Error::Argument(format!(
                        "binding template for {destination} must bind its second parameter"
                    )));
                }
                let mut mapping = CustomMapping {
                    param,
                    extra: None,
                    destination_param: second,
                    destination: destination.clone(),
                    overrides: Vec::new(),
                    nested: Vec::new(),
                    ignored: Vec::new(),
                };
                mapping.fill(bindings)?;
                Ok(mapping)
            }
            other => Err(Error::Argument(format!(
                "override template for {destination} must construct or bind, got {other}"
            ))),
        }
    }

    fn check_constructed(destination: &MapTypeRc, constructed: &MapTypeRc) -> Result<()> {
        if constructed.token == destination.token
            || constructed.is_assignable_to(destination)
            || destination.is_assignable_to(constructed)
        {
            Ok(())
        } else {
            Err(Error::Argument(format!(
                "override template for {destination} constructs unrelated type {constructed}"
            )))
        }
    }

    fn destination_member(&self, name: &str) -> Result<MemberRc> {
        self.destination.member(name, false).ok_or_else(|| {
            Error::Argument(format!("{} has no member '{name}'", self.destination))
        })
    }

    fn fill(&mut self, inits: &[(MemberRc, Expr)]) -> Result<()> {
        for (declared, value) in inits {
            let member = self.destination_member(&declared.name)?;
            match value {
                Expr::New { ty, inits } if ty.flavor.is_complex() => {
                    let mut nested = CustomMapping {
                        param: self.param.clone(),
                        extra: self.extra.clone(),
                        destination_param: None,
                        destination: ty.clone(),
                        overrides: Vec::new(),
                        nested: Vec::new(),
                        ignored: Vec::new(),
                    };
                    nested.fill(inits)?;
                    self.nested.push((member, nested));
                }
                _ => self.overrides.push((member, value.clone())),
            }
        }
        Ok(())
    }

    /// Set or replace the override for a member
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if the destination has no such member.
    pub fn with_override(mut self, name: &str, value: Expr) -> Result<Self> {
        let member = self.destination_member(name)?;
        self.overrides.retain(|(m, _)| m.name != member.name);
        self.overrides.push((member, value));
        Ok(self)
    }

    /// Exclude a member from mapping
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if the destination has no such member.
    pub fn ignore(mut self, name: &str) -> Result<Self> {
        let member = self.destination_member(name)?;
        self.overrides.retain(|(m, _)| m.name != member.name);
        self.nested.retain(|(m, _)| m.name != member.name);
        self.ignored.push(member);
        Ok(self)
    }

    /// The override expression for `member`, matched by name
    #[must_use]
    pub fn override_for(&self, member: &Member) -> Option<&Expr> {
        self.overrides
            .iter()
            .find(|(m, _)| m.name == member.name)
            .map(|(_, value)| value)
    }

    /// The nested table for `member`, matched by name
    #[must_use]
    pub fn nested_for(&self, member: &Member) -> Option<&CustomMapping> {
        self.nested
            .iter()
            .find(|(m, _)| m.name == member.name)
            .map(|(_, nested)| nested)
    }

    /// Returns `true` if `member` is explicitly excluded
    #[must_use]
    pub fn is_ignored(&self, member: &Member) -> bool {
        self.ignored.iter().any(|m| m.name == member.name)
    }

    /// Returns `true` if the table says anything about `member`
    #[must_use]
    pub fn covers(&self, member: &Member) -> bool {
        self.override_for(member).is_some()
            || self.nested_for(member).is_some()
            || self.is_ignored(member)
    }

    /// Returns `true` if any expression reads the extra argument
    #[must_use]
    pub fn uses_extra(&self) -> bool {
        let Some(extra) = &self.extra else {
            return false;
        };
        self.overrides
            .iter()
            .any(|(_, value)| value.references(extra.id))
            || self.nested.iter().any(|(_, nested)| nested.uses_extra())
    }

    /// All expressions of this table and its nested tables
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut result: Vec<&Expr> = self.overrides.iter().map(|(_, value)| value).collect();
        for (_, nested) in &self.nested {
            result.extend(nested.expressions());
        }
        result
    }

    /// Merge inherited tables into `root`.
    ///
    /// `others` are applied in order; an entry is only taken if nothing earlier already covers
    /// that member. Taken expressions are re-homed onto `root`'s placeholders and their members
    /// are re-resolved by name on `root`'s destination type, entries naming a member the
    /// destination lacks are dropped.
    ///
    /// # Errors
    /// Returns the first error of the placeholder substitution.
    pub fn combine(root: &CustomMapping, others: &[&CustomMapping]) -> Result<CustomMapping> {
        let mut combined = root.clone();

        for other in others {
            let mut substitution =
                ParamSubstitution::new().with(other.param.id, Expr::param(&combined.param));
            if let Some(extra) = &other.extra {
                let target = combined
                    .extra
                    .get_or_insert_with(|| extra.clone())
                    .clone();
                substitution = substitution.with(extra.id, Expr::param(&target));
            }
            if let Some(dst) = &other.destination_param {
                let destination = combined.destination.clone();
                let target = combined
                    .destination_param
                    .get_or_insert_with(|| Param::new("dst", &destination))
                    .clone();
                substitution = substitution.with(dst.id, Expr::param(&target));
            }

            for (member, value) in &other.overrides {
                if combined.covers(member) {
                    continue;
                }
                if let Some(own) = combined.destination.member(&member.name, false) {
                    let value = substitution.apply(value.clone())?;
                    combined.overrides.push((own, value));
                }
            }

            for (member, nested) in &other.nested {
                if combined.covers(member) {
                    continue;
                }
                if let Some(own) = combined.destination.member(&member.name, false) {
                    let nested = nested.rehome(&mut substitution, &combined)?;
                    combined.nested.push((own, nested));
                }
            }

            for member in &other.ignored {
                if combined.covers(member) {
                    continue;
                }
                if let Some(own) = combined.destination.member(&member.name, false) {
                    combined.ignored.push(own);
                }
            }
        }

        Ok(combined)
    }

    fn rehome(
        &self,
        substitution: &mut ParamSubstitution,
        root: &CustomMapping,
    ) -> Result<CustomMapping> {
        let mut overrides = Vec::with_capacity(self.overrides.len());
        for (member, value) in &self.overrides {
            overrides.push((member.clone(), substitution.apply(value.clone())?));
        }
        let mut nested = Vec::with_capacity(self.nested.len());
        for (member, inner) in &self.nested {
            nested.push((member.clone(), inner.rehome(substitution, root)?));
        }
        Ok(CustomMapping {
            param: root.param.clone(),
            extra: root.extra.clone(),
            destination_param: None,
            destination: self.destination.clone(),
            overrides,
            nested,
            ignored: self.ignored.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::BinaryOp,
        metadata::typesystem::{PrimitiveKind, TypeBuilder, TypeRegistry},
        test::fixtures::Fixtures,
    };

    #[test]
    fn test_parse_construction_template() {
        let fx = Fixtures::new();
        let c = Param::new("c", &fx.customer);
        let template = Expr::lambda(
            vec![c.clone()],
            Expr::new_object(
                &fx.customer_dto,
                vec![(
                    "FullName",
                    Expr::binary(
                        BinaryOp::Concat,
                        Expr::param(&c).path("FirstName").unwrap(),
                        Expr::param(&c).path("LastName").unwrap(),
                    ),
                )],
            )
            .unwrap(),
        );

        let mapping = CustomMapping::parse(&fx.customer_dto, &template).unwrap();
        assert_eq!(mapping.overrides.len(), 1);
        let full_name = fx.customer_dto.member("FullName", false).unwrap();
        assert!(mapping.override_for(&full_name).is_some());
        assert!(!mapping.uses_extra());
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        let registry = TypeRegistry::new();
        let dto = TypeBuilder::class(&registry, "Demo", "Dto")
            .property("Name", &registry.string())
            .build();
        let x = Param::new("x", &dto);

        let not_lambda = Expr::constant(1);
        assert!(matches!(
            CustomMapping::parse(&dto, &not_lambda),
            Err(Error::Argument(_))
        ));

        let wrong_body = Expr::lambda(vec![x.clone()], Expr::constant(1));
        assert!(matches!(
            CustomMapping::parse(&dto, &wrong_body),
            Err(Error::Argument(_))
        ));

        let other = TypeBuilder::class(&registry, "Demo", "Other")
            .property("Name", &registry.string())
            .build();
        let unrelated = Expr::lambda(
            vec![x],
            Expr::new_object(&other, vec![("Name", Expr::constant("n"))]).unwrap(),
        );
        assert!(matches!(
            CustomMapping::parse(&dto, &unrelated),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_parse_binding_template() {
        let registry = TypeRegistry::new();
        let source = TypeBuilder::class(&registry, "Demo", "Source")
            .property("Value", &registry.primitive(PrimitiveKind::I4))
            .build();
        let dto = TypeBuilder::class(&registry, "Demo", "Dto")
            .property("Total", &registry.primitive(PrimitiveKind::I4))
            .build();
        let total = dto.member("Total", false).unwrap();

        let src = Param::new("src", &source);
        let dst = Param::new("dst", &dto);
        let template = Expr::lambda(
            vec![src.clone(), dst.clone()],
            Expr::Bind {
                target: Box::new(Expr::param(&dst)),
                bindings: vec![(total.clone(), Expr::param(&src).path("Value").unwrap())],
            },
        );

        let mapping = CustomMapping::parse(&dto, &template).unwrap();
        assert_eq!(mapping.destination_param.as_ref().unwrap().id, dst.id);
        assert!(mapping.extra.is_none());
        assert!(mapping.override_for(&total).is_some());

        let wrong_target = Expr::lambda(
            vec![src.clone(), dst],
            Expr::Bind {
                target: Box::new(Expr::param(&src)),
                bindings: vec![],
            },
        );
        assert!(CustomMapping::parse(&dto, &wrong_target).is_err());
    }

    #[test]
    fn test_nested_construction_becomes_nested_table() {
        let registry = TypeRegistry::new();
        let address_dto = TypeBuilder::class(&registry, "Demo", "AddressDto")
            .property("City", &registry.string())
            .build();
        let dto = TypeBuilder::class(&registry, "Demo", "Dto")
            .property("Address", &address_dto)
            .build();
        let src = Param::new("src", &registry.object());

        let template = Expr::lambda(
            vec![src],
            Expr::new_object(
                &dto,
                vec![(
                    "Address",
                    Expr::new_object(&address_dto, vec![("City", Expr::constant("Oslo"))])
                        .unwrap(),
                )],
            )
            .unwrap(),
        );

        let mapping = CustomMapping::parse(&dto, &template).unwrap();
        assert!(mapping.overrides.is_empty());
        let address = dto.member("Address", false).unwrap();
        let nested = mapping.nested_for(&address).unwrap();
        assert_eq!(nested.overrides.len(), 1);
        assert_eq!(nested.param.id, mapping.param.id);
    }

    #[test]
    fn test_combine_rehomes_inherited_overrides() {
        let registry = TypeRegistry::new();
        let string = registry.string();
        let source = TypeBuilder::class(&registry, "Demo", "Source")
            .property("Label", &string)
            .build();
        let named = TypeBuilder::interface(&registry, "Demo", "INamed")
            .property("Name", &string)
            .build();
        let concrete = TypeBuilder::class(&registry, "Demo", "Concrete")
            .implements(&named)
            .property("Name", &string)
            .property("Code", &string)
            .build();

        let s = Param::new("s", &source);
        let inherited = CustomMapping::parse(
            &named,
            &Expr::lambda(
                vec![s.clone()],
                Expr::new_object(&named, vec![("Name", Expr::param(&s).path("Label").unwrap())])
                    .unwrap(),
            ),
        )
        .unwrap();

        let root = CustomMapping::new(&source, &concrete)
            .with_override("Code", Expr::constant("X"))
            .unwrap();
        let combined = CustomMapping::combine(&root, &[&inherited]).unwrap();

        let name = concrete.member("Name", false).unwrap();
        let value = combined.override_for(&name).unwrap();
        assert!(value.references(combined.param.id));
        assert!(!value.references(s.id));

        let (member, _) = combined
            .overrides
            .iter()
            .find(|(m, _)| m.name == "Name")
            .unwrap();
        assert_eq!(member.declaring, concrete.token);
    }

    #[test]
    fn test_ignore_and_unknown_member() {
        let registry = TypeRegistry::new();
        let dto = TypeBuilder::class(&registry, "Demo", "Dto")
            .property("Name", &registry.string())
            .build();

        let mapping = CustomMapping::new(&registry.object(), &dto)
            .ignore("Name")
            .unwrap();
        let name = dto.member("Name", false).unwrap();
        assert!(mapping.is_ignored(&name));
        assert!(mapping.covers(&name));

        assert!(CustomMapping::new(&registry.object(), &dto)
            .ignore("Missing")
            .is_err());
    }
}
