//! A small customer/order domain used across the unit tests.

use std::sync::Arc;

use crate::{
    metadata::{
        member::{MemberFlags, MemberKind},
        typesystem::{MapTypeRc, PrimitiveKind, TypeBuilder, TypeRegistry, Visibility},
    },
    value::{Decimal, ObjectRef, SequenceRef, Value},
};

/// Types of the test domain, all registered in `registry`
pub struct Fixtures {
    pub registry: Arc<TypeRegistry>,
    pub order: MapTypeRc,
    /// FirstName, LastName, ID, Name, Orders: List<Order>
    pub customer: MapTypeRc,
    /// FullName, OrderCount, OrderAmount; FullName has no source counterpart
    pub customer_dto: MapTypeRc,
    /// ID (widened), Name, Orders: List<Order>
    pub customer_view: MapTypeRc,
    /// Name, Children: List<Node>
    pub node: MapTypeRc,
    /// Name, Children: List<NodeDto>
    pub node_dto: MapTypeRc,
    /// Interface `Demo.INamed` with a Name
    pub named: MapTypeRc,
    /// Class implementing `Demo.INamed`, plus an Email
    pub contact: MapTypeRc,
    /// Value: int
    pub numbers: MapTypeRc,
    /// Value: string
    pub texts: MapTypeRc,
}

impl Fixtures {
    pub fn new() -> Self {
        let registry = Arc::new(TypeRegistry::new());
        let string = registry.string();
        let int = registry.primitive(PrimitiveKind::I4);
        let long = registry.primitive(PrimitiveKind::I8);
        let decimal = registry.primitive(PrimitiveKind::Decimal);

        let order = TypeBuilder::class(&registry, "Demo", "Order")
            .property("Amount", &decimal)
            .build();
        let orders = registry.list_of(&order);

        let customer = TypeBuilder::class(&registry, "Demo", "Customer")
            .property("FirstName", &string)
            .property("LastName", &string)
            .property("ID", &int)
            .property("Name", &string)
            .property("Orders", &orders)
            .build();
        let customer_dto = TypeBuilder::class(&registry, "Demo", "CustomerDto")
            .property("FullName", &string)
            .property("OrderCount", &int)
            .property("OrderAmount", &decimal)
            .build();
        let customer_view = TypeBuilder::class(&registry, "Demo", "CustomerView")
            .property("ID", &long)
            .property("Name", &string)
            .property("Orders", &orders)
            .build();

        let node = TypeBuilder::class(&registry, "Demo", "Node")
            .property("Name", &string)
            .build();
        node.add_member(
            "Children",
            &registry.list_of(&node),
            MemberKind::Property,
            MemberFlags::default(),
            Visibility::Public,
        );
        let node_dto = TypeBuilder::class(&registry, "Demo", "NodeDto")
            .property("Name", &string)
            .build();
        node_dto.add_member(
            "Children",
            &registry.list_of(&node_dto),
            MemberKind::Property,
            MemberFlags::default(),
            Visibility::Public,
        );

        let named = TypeBuilder::interface(&registry, "Demo", "INamed")
            .property("Name", &string)
            .build();
        let contact = TypeBuilder::class(&registry, "Demo", "Contact")
            .implements(&named)
            .property("Name", &string)
            .property("Email", &string)
            .build();

        let numbers = TypeBuilder::class(&registry, "Demo", "Numbers")
            .property("Value", &int)
            .build();
        let texts = TypeBuilder::class(&registry, "Demo", "Texts")
            .property("Value", &string)
            .build();

        Fixtures {
            registry,
            order,
            customer,
            customer_dto,
            customer_view,
            node,
            node_dto,
            named,
            contact,
            numbers,
            texts,
        }
    }
}

/// A customer instance with the given names and one order per amount
pub fn customer_value(fixtures: &Fixtures, first: &str, last: &str, amounts: &[i64]) -> Value {
    let orders: Vec<Value> = amounts
        .iter()
        .map(|amount| {
            let order = ObjectRef::new(&fixtures.order);
            order.set_field("Amount", Decimal::from(*amount)).unwrap();
            Value::Object(order)
        })
        .collect();

    let customer = ObjectRef::new(&fixtures.customer);
    customer.set_field("FirstName", first).unwrap();
    customer.set_field("LastName", last).unwrap();
    customer.set_field("ID", 7).unwrap();
    customer
        .set_field("Name", format!("{first} {last}").as_str())
        .unwrap();
    customer
        .set_field(
            "Orders",
            SequenceRef::new(&fixtures.registry.list_of(&fixtures.order), orders),
        )
        .unwrap();
    Value::Object(customer)
}
