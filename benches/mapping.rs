//! Benchmarks for mapping execution.
//!
//! Compares the emitted and the interpreted backend on the same customer/order mapping, and
//! measures resolution plus compilation of a fresh pair.

extern crate dotmapper;

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, Criterion};
use dotmapper::{prelude::*, value::Decimal};

struct Fixture {
    registry: Arc<TypeRegistry>,
    customer: MapTypeRc,
    customer_dto: MapTypeRc,
    source: Value,
}

fn fixture() -> Fixture {
    let registry = Arc::new(TypeRegistry::new());
    let string = registry.string();
    let int = registry.primitive(PrimitiveKind::I4);
    let decimal = registry.primitive(PrimitiveKind::Decimal);

    let order = TypeBuilder::class(&registry, "Bench", "Order")
        .property("Amount", &decimal)
        .build();
    let orders = registry.list_of(&order);
    let customer = TypeBuilder::class(&registry, "Bench", "Customer")
        .property("ID", &int)
        .property("Name", &string)
        .property("Orders", &orders)
        .build();
    let customer_dto = TypeBuilder::class(&registry, "Bench", "CustomerDto")
        .property("ID", &registry.primitive(PrimitiveKind::I8))
        .property("Name", &string)
        .property("OrderCount", &int)
        .property("OrderAmount", &decimal)
        .build();

    let items = (0..16)
        .map(|amount| {
            let order_value = ObjectRef::new(&order);
            order_value
                .set_field("Amount", Decimal::from(amount))
                .unwrap();
            Value::Object(order_value)
        })
        .collect();
    let value = ObjectRef::new(&customer);
    value.set_field("ID", 1).unwrap();
    value.set_field("Name", "Doe").unwrap();
    value
        .set_field("Orders", SequenceRef::new(&orders, items))
        .unwrap();

    Fixture {
        registry,
        customer,
        customer_dto,
        source: Value::Object(value),
    }
}

/// Invoke an already compiled mapping with the given backend.
fn bench_invoke(c: &mut Criterion, name: &str, emission: bool) {
    let fixture = fixture();
    let config = MapperConfig::default().with_native_emission(emission);
    let mapper = Mapper::new(fixture.registry.clone(), config);
    let tree = mapper
        .resolve(&fixture.customer, &fixture.customer_dto)
        .unwrap();
    let map = mapper.finalize(&tree).unwrap();

    c.bench_function(name, |b| {
        b.iter(|| {
            let mapped = map
                .invoke(black_box(&fixture.source), &Value::Null, None)
                .unwrap();
            black_box(mapped)
        });
    });
}

fn bench_emitted(c: &mut Criterion) {
    bench_invoke(c, "map_customer_emitted", true);
}

fn bench_interpreted(c: &mut Criterion) {
    bench_invoke(c, "map_customer_interpreted", false);
}

/// Resolution and compilation of a pair on a fresh mapper.
fn bench_finalize(c: &mut Criterion) {
    let fixture = fixture();

    c.bench_function("resolve_and_finalize", |b| {
        b.iter(|| {
            let mapper = Mapper::new(fixture.registry.clone(), MapperConfig::default());
            let tree = mapper
                .resolve(&fixture.customer, &fixture.customer_dto)
                .unwrap();
            black_box(mapper.finalize(&tree).unwrap())
        });
    });
}

criterion_group!(benches, bench_emitted, bench_interpreted, bench_finalize);
criterion_main!(benches);
