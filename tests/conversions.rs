//! Integration tests for value conversions and collection shapes.

use std::sync::Arc;

use chrono::NaiveDate;
use dotmapper::{
    metadata::typesystem::SequenceKind,
    prelude::*,
    value::Decimal,
    Result,
};

fn holder(registry: &TypeRegistry, name: &str, members: &[(&str, &MapTypeRc)]) -> MapTypeRc {
    members
        .iter()
        .fold(TypeBuilder::class(registry, "Conv", name), |builder, (member, ty)| {
            builder.property(member, ty)
        })
        .build()
}

/// Legal numeric conversions keep the value; an empty nullable becomes the default.
#[test]
fn test_numeric_conversions_preserve_values() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let int = registry.primitive(PrimitiveKind::I4);
    let long = registry.primitive(PrimitiveKind::I8);
    let double = registry.primitive(PrimitiveKind::R8);
    let decimal = registry.primitive(PrimitiveKind::Decimal);
    let nullable_int = registry.nullable_of(&int);

    let source = holder(
        &registry,
        "Source",
        &[
            ("ToDecimal", &int),
            ("ToDouble", &int),
            ("FromDecimal", &decimal),
            ("Present", &nullable_int),
            ("Missing", &nullable_int),
        ],
    );
    let destination = holder(
        &registry,
        "Destination",
        &[
            ("ToDecimal", &decimal),
            ("ToDouble", &double),
            ("FromDecimal", &int),
            ("Present", &long),
            ("Missing", &long),
        ],
    );

    let value = ObjectRef::new(&source);
    value.set_field("ToDecimal", 12)?;
    value.set_field("ToDouble", -3)?;
    value.set_field("FromDecimal", Decimal::from(40))?;
    value.set_field("Present", 5)?;

    let mapper = Mapper::new(registry.clone(), MapperConfig::default());
    let mapped = mapper.map(&source, &destination, &Value::Object(value))?;

    assert_eq!(mapped.field("ToDecimal")?, Value::Decimal(Decimal::from(12)));
    assert_eq!(mapped.field("ToDouble")?, Value::R8(-3.0));
    assert_eq!(mapped.field("FromDecimal")?, Value::I4(40));
    assert_eq!(mapped.field("Present")?, Value::I8(5));
    assert_eq!(mapped.field("Missing")?, Value::I8(0));
    Ok(())
}

/// Text destinations render the source; date destinations parse text.
#[test]
fn test_text_and_date_special_cases() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let int = registry.primitive(PrimitiveKind::I4);
    let string = registry.string();
    let date = registry.primitive(PrimitiveKind::DateTime);

    let source = holder(&registry, "Raw", &[("Count", &int), ("Since", &string)]);
    let destination = holder(&registry, "Typed", &[("Count", &string), ("Since", &date)]);

    let value = ObjectRef::new(&source);
    value.set_field("Count", 42)?;
    value.set_field("Since", "2024-03-01")?;
    let value = Value::Object(value);

    let mapper = Mapper::new(registry.clone(), MapperConfig::default());
    let mapped = mapper.map(&source, &destination, &value)?;
    assert_eq!(mapped.field("Count")?, Value::string("42"));
    let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    assert_eq!(mapped.field("Since")?, Value::DateTime(expected));

    let config = MapperConfig::default().with_special_cases(SpecialCases {
        parse_dates: false,
        ..SpecialCases::default()
    });
    let mapper = Mapper::new(registry.clone(), config);
    assert!(matches!(
        mapper.map(&source, &destination, &value),
        Err(Error::CodeGeneration { .. })
    ));
    Ok(())
}

/// Every collection shape maps onto every other shape, keeping element order.
#[test]
fn test_sequence_shapes() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let int = registry.primitive(PrimitiveKind::I4);
    let item = holder(&registry, "Item", &[("Value", &int)]);
    let long = registry.primitive(PrimitiveKind::I8);
    let item_dto = holder(&registry, "ItemDto", &[("Value", &long)]);
    let mapper = Mapper::new(registry.clone(), MapperConfig::default());

    let kinds = [
        SequenceKind::Array,
        SequenceKind::FixedList,
        SequenceKind::List,
        SequenceKind::Enumerable,
    ];
    for source_kind in kinds {
        for destination_kind in kinds {
            let source = registry.sequence_of(source_kind, &item);
            let destination = registry.sequence_of(destination_kind, &item_dto);

            let mut items = Vec::new();
            for n in [1, 2] {
                let element = ObjectRef::new(&item);
                element.set_field("Value", n)?;
                items.push(Value::Object(element));
            }
            let value = Value::Sequence(SequenceRef::new(&source, items));

            let mapped = mapper.map(&source, &destination, &value)?;
            let values = mapped
                .items()?
                .iter()
                .map(|element| element.field("Value"))
                .collect::<Result<Vec<_>>>()?;
            assert_eq!(
                values,
                vec![Value::I8(1), Value::I8(2)],
                "{source_kind} -> {destination_kind}"
            );
        }
    }
    Ok(())
}

/// A null source collection yields a null destination collection.
#[test]
fn test_null_collection_member() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new());
    let int = registry.primitive(PrimitiveKind::I4);
    let long = registry.primitive(PrimitiveKind::I8);
    let source = holder(&registry, "Bag", &[("Items", &registry.list_of(&int))]);
    let destination = holder(&registry, "BagDto", &[("Items", &registry.array_of(&long))]);

    let mapper = Mapper::new(registry.clone(), MapperConfig::default());
    let mapped = mapper.map(&source, &destination, &Value::Object(ObjectRef::new(&source)))?;
    assert!(mapped.field("Items")?.is_null());

    let filled = ObjectRef::new(&source);
    filled.set_field(
        "Items",
        SequenceRef::new(&registry.list_of(&int), vec![Value::I4(4), Value::I4(5)]),
    )?;
    let mapped = mapper.map(&source, &destination, &Value::Object(filled))?;
    assert_eq!(mapped.field("Items")?.items()?, vec![Value::I8(4), Value::I8(5)]);
    Ok(())
}
