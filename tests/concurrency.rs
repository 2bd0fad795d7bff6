//! Integration tests for concurrent use of one mapper and for prebuilt plans.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dotmapper::{prelude::*, Result};
use rayon::prelude::*;

fn person_types(registry: &TypeRegistry, count: usize) -> Vec<(MapTypeRc, MapTypeRc)> {
    let string = registry.string();
    let int = registry.primitive(PrimitiveKind::I4);
    (0..count)
        .map(|i| {
            let source = TypeBuilder::class(registry, "Load", &format!("Person{i}"))
                .property("Name", &string)
                .property("Age", &int)
                .build();
            let destination = TypeBuilder::class(registry, "Load", &format!("PersonDto{i}"))
                .property("Name", &string)
                .property("Age", &registry.primitive(PrimitiveKind::I8))
                .build();
            (source, destination)
        })
        .collect()
}

/// Parallel first use of the same pair from many threads agrees on the result.
#[test]
fn test_parallel_map_of_one_pair() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let pairs = person_types(&registry, 1);
    let (source, destination) = &pairs[0];
    let mapper = Mapper::new(registry.clone(), MapperConfig::default());

    let ages: Vec<Value> = (0..64)
        .into_par_iter()
        .map(|age| {
            let person = ObjectRef::new(source);
            person.set_field("Name", "Ada")?;
            person.set_field("Age", age)?;
            let mapped = mapper.map(source, destination, &Value::Object(person))?;
            mapped.field("Age")
        })
        .collect::<Result<_>>()?;

    for (age, value) in ages.iter().enumerate() {
        assert_eq!(*value, Value::I8(age as i64));
    }
    assert_eq!(mapper.compiled_count(), 1);
    Ok(())
}

/// `precompile` registers every independent pair.
#[test]
fn test_precompile_many_pairs() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let pairs = person_types(&registry, 16);
    let mapper = Mapper::new(registry.clone(), MapperConfig::default());

    let maps = mapper.precompile(&pairs)?;
    assert_eq!(maps.len(), 16);
    assert_eq!(mapper.compiled_count(), 16);
    for (source, destination) in &pairs {
        assert!(mapper.member_map(source, destination).is_some());
    }
    Ok(())
}

/// Concurrent resolutions of a pair produce structurally equal proposals.
#[test]
fn test_parallel_resolution_is_deterministic() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let pairs = person_types(&registry, 1);
    let (source, destination) = &pairs[0];
    let mapper = Mapper::new(registry.clone(), MapperConfig::default());

    let trees = (0..32)
        .into_par_iter()
        .map(|_| mapper.resolve(source, destination))
        .collect::<Result<Vec<_>>>()?;
    assert!(trees.iter().all(|tree| tree.structurally_equal(&trees[0])));
    Ok(())
}

struct Repository {
    pair: TypePair,
    plan: PrebuiltPlan,
    lookups: AtomicUsize,
}

impl PlanRepository for Repository {
    fn try_get_prebuilt_plan(&self, pair: TypePair) -> Option<PrebuiltPlan> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        (pair == self.pair).then(|| self.plan.clone())
    }
}

/// A repository plan replaces resolution of its pair, including nested occurrences.
#[test]
fn test_prebuilt_plan_replaces_nested_pair() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let string = registry.string();
    let address = TypeBuilder::class(&registry, "Geo", "Address")
        .property("City", &string)
        .build();
    let address_dto = TypeBuilder::class(&registry, "Geo", "AddressDto")
        .property("City", &string)
        .build();
    let company = TypeBuilder::class(&registry, "Geo", "Company")
        .property("Address", &address)
        .build();
    let company_dto = TypeBuilder::class(&registry, "Geo", "CompanyDto")
        .property("Address", &address_dto)
        .build();

    let target = address_dto.clone();
    let plan = PrebuiltPlan::new("upper-city", move |source, _| {
        let city = source.field("City")?;
        let dto = ObjectRef::new(&target);
        dto.set_field("City", city.as_str().unwrap_or_default().to_uppercase().as_str())?;
        Ok(Value::Object(dto))
    });
    let repository = Arc::new(Repository {
        pair: TypePair::of(&address, &address_dto),
        plan,
        lookups: AtomicUsize::new(0),
    });

    let mapper = Mapper::new(registry.clone(), MapperConfig::default())
        .with_repository(repository.clone());

    let home = ObjectRef::new(&address);
    home.set_field("City", "oslo")?;
    let value = ObjectRef::new(&company);
    value.set_field("Address", Value::Object(home))?;

    let mapped = mapper.map(&company, &company_dto, &Value::Object(value))?;
    assert_eq!(mapped.field("Address")?.field("City")?, Value::string("OSLO"));
    assert!(repository.lookups.load(Ordering::SeqCst) >= 2);
    Ok(())
}
