//! Runtime values.
//!
//! Compiled mappings read and write [`Value`]s. Scalars are stored inline, `String` is shared and
//! immutable, value types ([`StructValue`]) are copied on assignment, and class instances and
//! collections are shared mutable references ([`ObjectRef`], [`SequenceRef`]) whose identity is
//! the pointer identity of the underlying allocation.
//!
//! # Value Mapping
//!
//! | Type flavor | Variant |
//! |-------------|---------|
//! | Primitives | [`Value::Boolean`] .. [`Value::DateTime`] |
//! | Enumerations | [`Value::Enum`] |
//! | `Nullable<T>` | the inner variant, or [`Value::Null`] |
//! | Value types, key/value pairs | [`Value::Struct`] |
//! | Classes, interfaces | [`Value::Object`] |
//! | Sequences | [`Value::Sequence`] |
//! | Lambdas, native functions | [`Value::Func`] |

mod convert;

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub(crate) use convert::convert_primitive;
pub use convert::{convert, parse_date, to_text, Culture};
pub use rust_decimal::Decimal;

use crate::{
    expr::Closure,
    metadata::{
        member::Member,
        typesystem::{MapType, MapTypeRc, PrimitiveKind, TypeFlavor},
    },
    Error, Result,
};

/// Signature of native functions
pub type NativeFnPtr = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A named native function usable from override expressions and conversion operators.
#[derive(Clone)]
pub struct NativeFn {
    name: Arc<str>,
    public: bool,
    func: Arc<NativeFnPtr>,
}

impl NativeFn {
    /// Create a new publicly visible native function
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        NativeFn {
            name: Arc::from(name),
            public: true,
            func: Arc::new(func),
        }
    }

    /// Create a native function standing for non-public code
    pub fn private<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        NativeFn {
            public: false,
            ..NativeFn::new(name, func)
        }
    }

    /// The function name, used for diagnostics
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the function is publicly visible
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Call the function
    ///
    /// # Errors
    /// Returns whatever error the function itself reports.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

/// A callable runtime value
#[derive(Clone, Debug)]
pub enum Callable {
    /// A native function
    Native(NativeFn),
    /// An evaluated lambda with its captured environment
    Closure(Arc<Closure>),
}

impl Callable {
    /// Call with positional arguments
    ///
    /// # Errors
    /// Returns [`Error::Argument`] on arity mismatch and any error of the callee.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match self {
            Callable::Native(native) => native.call(args),
            Callable::Closure(closure) => closure.call(args),
        }
    }

    fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Callable::Closure(a), Callable::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// An enumeration value
#[derive(Clone, Debug)]
pub struct EnumValue {
    /// The enumeration type
    pub ty: MapTypeRc,
    /// The underlying integral value
    pub value: i64,
}

/// A value type instance, copied on assignment
#[derive(Clone, Debug)]
pub struct StructValue {
    /// The value type
    pub ty: MapTypeRc,
    /// One slot per member of `ty`
    pub slots: Vec<Value>,
}

impl StructValue {
    /// Read a member
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the member does not belong to this type.
    pub fn get(&self, member: &Member) -> Result<Value> {
        let slot = slot(&self.ty, member)?;
        Ok(self.slots[slot].clone())
    }

    /// Write a member
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the member does not belong to this type.
    pub fn set(&mut self, member: &Member, value: Value) -> Result<()> {
        let slot = slot(&self.ty, member)?;
        self.slots[slot] = value;
        Ok(())
    }
}

/// Storage of a class instance
#[derive(Debug)]
pub struct ObjectData {
    /// The runtime type of the instance
    pub ty: MapTypeRc,
    /// One slot per member of `ty`
    pub slots: Vec<Value>,
}

/// A shared reference to a class instance
#[derive(Clone, Debug)]
pub struct ObjectRef(Arc<RwLock<ObjectData>>);

impl ObjectRef {
    /// Allocate a new instance of `ty` with every member set to its default
    #[must_use]
    pub fn new(ty: &MapTypeRc) -> Self {
        ObjectRef(Arc::new(RwLock::new(ObjectData {
            ty: ty.clone(),
            slots: default_slots(ty),
        })))
    }

    /// The runtime type of the instance
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the instance lock is poisoned.
    pub fn ty(&self) -> Result<MapTypeRc> {
        Ok(read_lock!(self.0).ty.clone())
    }

    /// Read a member
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the member does not belong to the instance type.
    pub fn get(&self, member: &Member) -> Result<Value> {
        let data = read_lock!(self.0);
        let slot = slot(&data.ty, member)?;
        Ok(data.slots[slot].clone())
    }

    /// Write a member
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the member does not belong to the instance type.
    pub fn set(&self, member: &Member, value: Value) -> Result<()> {
        let mut data = write_lock!(self.0);
        let slot = slot(&data.ty, member)?;
        data.slots[slot] = value;
        Ok(())
    }

    /// Read a member by name
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if the instance type has no such member.
    pub fn field(&self, name: &str) -> Result<Value> {
        let data = read_lock!(self.0);
        let member = data
            .ty
            .member(name, false)
            .ok_or_else(|| Error::Argument(format!("{} has no member {}", data.ty, name)))?;
        let slot = slot(&data.ty, &member)?;
        Ok(data.slots[slot].clone())
    }

    /// Write a member by name
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if the instance type has no such member.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let mut data = write_lock!(self.0);
        let member = data
            .ty
            .member(name, false)
            .ok_or_else(|| Error::Argument(format!("{} has no member {}", data.ty, name)))?;
        let slot = slot(&data.ty, &member)?;
        data.slots[slot] = value.into();
        Ok(())
    }

    /// Snapshot of all slots
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the instance lock is poisoned.
    pub fn slots(&self) -> Result<Vec<Value>> {
        Ok(read_lock!(self.0).slots.clone())
    }

    /// Returns `true` if both references point to the same instance
    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Storage of a collection
#[derive(Debug)]
pub struct SequenceData {
    /// The runtime collection type
    pub ty: MapTypeRc,
    /// Elements in order; dictionaries hold `KeyValuePair` structs
    pub items: Vec<Value>,
}

/// A shared reference to a collection
#[derive(Clone, Debug)]
pub struct SequenceRef(Arc<RwLock<SequenceData>>);

impl SequenceRef {
    /// Create a new collection of type `ty` holding `items`
    #[must_use]
    pub fn new(ty: &MapTypeRc, items: Vec<Value>) -> Self {
        SequenceRef(Arc::new(RwLock::new(SequenceData {
            ty: ty.clone(),
            items,
        })))
    }

    /// The runtime collection type
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the collection lock is poisoned.
    pub fn ty(&self) -> Result<MapTypeRc> {
        Ok(read_lock!(self.0).ty.clone())
    }

    /// Number of elements
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the collection lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(read_lock!(self.0).items.len())
    }

    /// Returns `true` if the collection holds no elements
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the collection lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Element at `index`
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if `index` is out of range.
    pub fn get(&self, index: usize) -> Result<Value> {
        let data = read_lock!(self.0);
        data.items.get(index).cloned().ok_or_else(|| {
            Error::Evaluation(format!(
                "index {index} out of range for {} of length {}",
                data.ty,
                data.items.len()
            ))
        })
    }

    /// Replace the element at `index`
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if `index` is out of range.
    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        let mut data = write_lock!(self.0);
        let len = data.items.len();
        match data.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::Evaluation(format!(
                "index {index} out of range for collection of length {len}"
            ))),
        }
    }

    /// Append an element
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the collection lock is poisoned.
    pub fn push(&self, value: Value) -> Result<()> {
        write_lock!(self.0).items.push(value);
        Ok(())
    }

    /// Snapshot of all elements
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the collection lock is poisoned.
    pub fn items(&self) -> Result<Vec<Value>> {
        Ok(read_lock!(self.0).items.clone())
    }

    /// Returns `true` if both references point to the same collection
    #[must_use]
    pub fn ptr_eq(&self, other: &SequenceRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A runtime value
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// `null`, also the empty `Nullable<T>`
    #[default]
    Null,
    /// System.Boolean
    Boolean(bool),
    /// System.Char
    Char(char),
    /// System.SByte
    I1(i8),
    /// System.Byte
    U1(u8),
    /// System.Int16
    I2(i16),
    /// System.UInt16
    U2(u16),
    /// System.Int32
    I4(i32),
    /// System.UInt32
    U4(u32),
    /// System.Int64
    I8(i64),
    /// System.UInt64
    U8(u64),
    /// System.Single
    R4(f32),
    /// System.Double
    R8(f64),
    /// System.Decimal
    Decimal(Decimal),
    /// System.String
    String(Arc<str>),
    /// System.DateTime
    DateTime(NaiveDateTime),
    /// Enumeration value
    Enum(EnumValue),
    /// Value type instance
    Struct(Box<StructValue>),
    /// Class instance
    Object(ObjectRef),
    /// Collection
    Sequence(SequenceRef),
    /// Callable
    Func(Callable),
}

impl Value {
    /// Create a string value
    #[must_use]
    pub fn string(text: &str) -> Self {
        Value::String(Arc::from(text))
    }

    /// Returns `true` for [`Value::Null`]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The default value of `ty`: zero for numbers, `null` for reference types and nullables,
    /// and a struct of defaults for value types
    #[must_use]
    pub fn default_for(ty: &MapTypeRc) -> Value {
        match &ty.flavor {
            TypeFlavor::Primitive(kind) => match kind {
                PrimitiveKind::Boolean => Value::Boolean(false),
                PrimitiveKind::Char => Value::Char('\0'),
                PrimitiveKind::I1 => Value::I1(0),
                PrimitiveKind::U1 => Value::U1(0),
                PrimitiveKind::I2 => Value::I2(0),
                PrimitiveKind::U2 => Value::U2(0),
                PrimitiveKind::I4 => Value::I4(0),
                PrimitiveKind::U4 => Value::U4(0),
                PrimitiveKind::I8 => Value::I8(0),
                PrimitiveKind::U8 => Value::U8(0),
                PrimitiveKind::R4 => Value::R4(0.0),
                PrimitiveKind::R8 => Value::R8(0.0),
                PrimitiveKind::Decimal => Value::Decimal(Decimal::ZERO),
                PrimitiveKind::DateTime => Value::DateTime(min_date_time()),
                PrimitiveKind::String | PrimitiveKind::Object => Value::Null,
            },
            TypeFlavor::Enum { .. } => Value::Enum(EnumValue {
                ty: ty.clone(),
                value: 0,
            }),
            TypeFlavor::ValueType | TypeFlavor::KeyValuePair => {
                Value::Struct(Box::new(StructValue {
                    ty: ty.clone(),
                    slots: default_slots(ty),
                }))
            }
            TypeFlavor::Nullable
            | TypeFlavor::Class
            | TypeFlavor::Interface
            | TypeFlavor::Sequence(_) => Value::Null,
        }
    }

    /// A freshly constructed instance of `ty`: an object with default members for classes, an
    /// empty collection for sequences, the default value for everything else
    #[must_use]
    pub fn new_instance(ty: &MapTypeRc) -> Value {
        match &ty.flavor {
            TypeFlavor::Class => Value::Object(ObjectRef::new(ty)),
            _ if ty.is_sequence() => Value::Sequence(SequenceRef::new(ty, Vec::new())),
            _ => Value::default_for(ty),
        }
    }

    /// Read a member of an object or struct
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] for `null` and for values without members.
    pub fn get_member(&self, member: &Member) -> Result<Value> {
        match self {
            Value::Object(object) => object.get(member),
            Value::Struct(data) => data.get(member),
            Value::Null => Err(Error::Evaluation(format!(
                "null reference reading {}",
                member.qualified_name()
            ))),
            other => Err(Error::Evaluation(format!(
                "cannot read {} from {}",
                member.qualified_name(),
                other.kind_name()
            ))),
        }
    }

    /// Write a member of an object or struct. Structs are updated in place.
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] for `null` and for values without members.
    pub fn set_member(&mut self, member: &Member, value: Value) -> Result<()> {
        match self {
            Value::Object(object) => object.set(member, value),
            Value::Struct(data) => data.set(member, value),
            Value::Null => Err(Error::Evaluation(format!(
                "null reference writing {}",
                member.qualified_name()
            ))),
            other => Err(Error::Evaluation(format!(
                "cannot write {} on {}",
                member.qualified_name(),
                other.kind_name()
            ))),
        }
    }

    /// Read a member by name, convenient for inspecting mapped results
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if there is no such member.
    pub fn field(&self, name: &str) -> Result<Value> {
        match self {
            Value::Object(object) => object.field(name),
            Value::Struct(data) => {
                let member = data
                    .ty
                    .member(name, false)
                    .ok_or_else(|| Error::Argument(format!("{} has no member {}", data.ty, name)))?;
                data.get(&member)
            }
            other => Err(Error::Argument(format!(
                "{} has no member {}",
                other.kind_name(),
                name
            ))),
        }
    }

    /// Elements of a collection
    ///
    /// # Errors
    /// Returns [`Error::Evaluation`] if the value is not a collection.
    pub fn items(&self) -> Result<Vec<Value>> {
        match self {
            Value::Sequence(sequence) => sequence.items(),
            other => Err(Error::Evaluation(format!(
                "{} is not a collection",
                other.kind_name()
            ))),
        }
    }

    /// The string content, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    /// The boolean content, if this is a boolean
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// The object reference, if this is a class instance
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The collection reference, if this is a collection
    #[must_use]
    pub fn as_sequence(&self) -> Option<&SequenceRef> {
        match self {
            Value::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "Boolean",
            Value::Char(_) => "Char",
            Value::I1(_) => "SByte",
            Value::U1(_) => "Byte",
            Value::I2(_) => "Int16",
            Value::U2(_) => "UInt16",
            Value::I4(_) => "Int32",
            Value::U4(_) => "UInt32",
            Value::I8(_) => "Int64",
            Value::U8(_) => "UInt64",
            Value::R4(_) => "Single",
            Value::R8(_) => "Double",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::DateTime(_) => "DateTime",
            Value::Enum(_) => "Enum",
            Value::Struct(_) => "Struct",
            Value::Object(_) => "Object",
            Value::Sequence(_) => "Sequence",
            Value::Func(_) => "Func",
        }
    }

    /// Deep structural comparison: objects and collections are compared member by member and
    /// element by element instead of by reference.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if an instance lock is poisoned.
    pub fn structurally_equal(&self, other: &Value) -> Result<bool> {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                if a.ptr_eq(b) {
                    return Ok(true);
                }
                if a.ty()?.token != b.ty()?.token {
                    return Ok(false);
                }
                all_structurally_equal(&a.slots()?, &b.slots()?)
            }
            (Value::Sequence(a), Value::Sequence(b)) => {
                if a.ptr_eq(b) {
                    return Ok(true);
                }
                all_structurally_equal(&a.items()?, &b.items()?)
            }
            (Value::Struct(a), Value::Struct(b)) => {
                if a.ty.token != b.ty.token {
                    return Ok(false);
                }
                all_structurally_equal(&a.slots, &b.slots)
            }
            _ => Ok(self == other),
        }
    }
}

fn all_structurally_equal(left: &[Value], right: &[Value]) -> Result<bool> {
    if left.len() != right.len() {
        return Ok(false);
    }
    for (a, b) in left.iter().zip(right) {
        if !a.structurally_equal(b)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality of scalars by value and of objects, collections and functions by identity
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::I1(a), Value::I1(b)) => a == b,
            (Value::U1(a), Value::U1(b)) => a == b,
            (Value::I2(a), Value::I2(b)) => a == b,
            (Value::U2(a), Value::U2(b)) => a == b,
            (Value::I4(a), Value::I4(b)) => a == b,
            (Value::U4(a), Value::U4(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::R4(a), Value::R4(b)) => a == b,
            (Value::R8(a), Value::R8(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a.ty.token == b.ty.token && a.value == b.value,
            (Value::Struct(a), Value::Struct(b)) => a.ty.token == b.ty.token && a.slots == b.slots,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Sequence(a), Value::Sequence(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::String(text) => write!(f, "\"{text}\""),
            Value::Object(object) => match object.ty() {
                Ok(ty) => write!(f, "{ty} {{..}}"),
                Err(_) => f.write_str("<poisoned>"),
            },
            Value::Sequence(sequence) => match sequence.len() {
                Ok(len) => write!(f, "[{len} items]"),
                Err(_) => f.write_str("<poisoned>"),
            },
            Value::Struct(data) => write!(f, "{} {{..}}", data.ty),
            Value::Func(Callable::Native(native)) => write!(f, "{}()", native.name()),
            Value::Func(Callable::Closure(_)) => f.write_str("<closure>"),
            other => match to_text(other) {
                Ok(Value::String(text)) => f.write_str(&text),
                _ => f.write_str(other.kind_name()),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I4(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I8(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::R8(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

impl From<SequenceRef> for Value {
    fn from(value: SequenceRef) -> Self {
        Value::Sequence(value)
    }
}

/// `DateTime.MinValue`
fn min_date_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .map(|date| date.and_time(NaiveTime::MIN))
        .unwrap_or_default()
}

fn default_slots(ty: &MapType) -> Vec<Value> {
    ty.members
        .iter()
        .map(|(_, member)| match member.ty.upgrade() {
            Some(member_ty) => Value::default_for(&member_ty),
            None => Value::Null,
        })
        .collect()
}

fn slot(ty: &MapType, member: &Member) -> Result<usize> {
    ty.slot_of(member).ok_or_else(|| {
        Error::Evaluation(format!(
            "{} is not a member of {}",
            member.qualified_name(),
            ty.fullname()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::{TypeBuilder, TypeRegistry};

    #[test]
    fn test_defaults() {
        let registry = TypeRegistry::new();
        assert_eq!(
            Value::default_for(&registry.primitive(PrimitiveKind::I4)),
            Value::I4(0)
        );
        assert_eq!(Value::default_for(&registry.string()), Value::Null);
        let int = registry.primitive(PrimitiveKind::I4);
        assert_eq!(Value::default_for(&registry.nullable_of(&int)), Value::Null);

        let date = Value::default_for(&registry.primitive(PrimitiveKind::DateTime));
        assert_eq!(date.to_string(), "01/01/0001 00:00:00");
    }

    #[test]
    fn test_object_members() {
        let registry = TypeRegistry::new();
        let customer = TypeBuilder::class(&registry, "Demo", "Customer")
            .property("Id", &registry.primitive(PrimitiveKind::I4))
            .property("Name", &registry.string())
            .build();

        let instance = Value::new_instance(&customer);
        let object = instance.as_object().unwrap();
        assert_eq!(object.field("Id").unwrap(), Value::I4(0));
        assert_eq!(object.field("Name").unwrap(), Value::Null);

        object.set_field("Name", "Doe").unwrap();
        assert_eq!(instance.field("Name").unwrap(), Value::string("Doe"));
        assert!(object.field("Missing").is_err());
    }

    #[test]
    fn test_struct_is_copied() {
        let registry = TypeRegistry::new();
        let point = TypeBuilder::value_type(&registry, "Demo", "Point")
            .field("X", &registry.primitive(PrimitiveKind::I4))
            .build();
        let x = point.member("X", false).unwrap();

        let original = Value::default_for(&point);
        let mut copy = original.clone();
        if let Value::Struct(data) = &mut copy {
            data.set(&x, Value::I4(5)).unwrap();
        }

        assert_eq!(original.field("X").unwrap(), Value::I4(0));
        assert_eq!(copy.field("X").unwrap(), Value::I4(5));
    }

    #[test]
    fn test_identity_versus_structure() {
        let registry = TypeRegistry::new();
        let node = TypeBuilder::class(&registry, "Demo", "Node")
            .property("Name", &registry.string())
            .build();

        let a = Value::new_instance(&node);
        let b = Value::new_instance(&node);
        a.as_object().unwrap().set_field("Name", "x").unwrap();
        b.as_object().unwrap().set_field("Name", "x").unwrap();

        assert_ne!(a, b);
        assert!(a.structurally_equal(&b).unwrap());
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_sequence_operations() {
        let registry = TypeRegistry::new();
        let list = registry.list_of(&registry.primitive(PrimitiveKind::I4));
        let sequence = SequenceRef::new(&list, vec![Value::I4(1)]);

        sequence.push(Value::I4(2)).unwrap();
        sequence.set(0, Value::I4(7)).unwrap();
        assert_eq!(sequence.len().unwrap(), 2);
        assert_eq!(sequence.get(0).unwrap(), Value::I4(7));
        assert!(sequence.get(5).is_err());
        assert!(sequence.set(5, Value::Null).is_err());
    }

    #[test]
    fn test_null_member_access() {
        let registry = TypeRegistry::new();
        let customer = TypeBuilder::class(&registry, "Demo", "Customer")
            .property("Name", &registry.string())
            .build();
        let name = customer.member("Name", false).unwrap();

        let err = Value::Null.get_member(&name).unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }
}
