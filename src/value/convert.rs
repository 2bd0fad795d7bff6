//! Runtime value conversions.
//!
//! Conversions follow unchecked `System.Convert`-style semantics: narrowing between integral
//! types wraps, floating point to integral truncates toward zero, and enumerations convert through
//! their underlying integral value. Decimals are the exception: a decimal outside the range of
//! the target fails instead of wrapping.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use strum::{Display, EnumIter};

use crate::{
    metadata::typesystem::{MapTypeRc, PrimitiveKind, TypeFlavor},
    value::{Callable, Decimal, EnumValue, Value},
    Error, Result,
};

/// Culture used when parsing dates from text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Culture {
    /// Culture-independent formats
    #[default]
    Invariant,
    /// English (United States), month first
    EnUs,
    /// English (United Kingdom), day first
    EnGb,
    /// German (Germany), day first with dots
    DeDe,
}

impl Culture {
    /// Date and time patterns tried in order
    fn date_time_formats(self) -> &'static [&'static str] {
        match self {
            Culture::Invariant | Culture::EnUs => &[
                "%m/%d/%Y %H:%M:%S",
                "%m/%d/%Y %H:%M",
                "%m/%d/%Y %I:%M:%S %p",
                "%m/%d/%Y %I:%M %p",
            ],
            Culture::EnGb => &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"],
            Culture::DeDe => &["%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"],
        }
    }

    /// Date-only patterns tried in order
    fn date_formats(self) -> &'static [&'static str] {
        match self {
            Culture::Invariant | Culture::EnUs => &["%m/%d/%Y"],
            Culture::EnGb => &["%d/%m/%Y"],
            Culture::DeDe => &["%d.%m.%Y"],
        }
    }
}

/// Round-trip patterns accepted by every culture
const ISO_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d"];

/// Parse text into a `DateTime` value.
///
/// `null` stays `null`, an existing date is returned unchanged.
///
/// ## Arguments
/// * 'value'   - The text to parse
/// * 'culture' - Culture selecting the day/month order
///
/// # Errors
/// Returns [`Error::Evaluation`] if the text matches none of the culture's patterns.
pub fn parse_date(value: &Value, culture: Culture) -> Result<Value> {
    let text = match value {
        Value::Null => return Ok(Value::Null),
        Value::DateTime(_) => return Ok(value.clone()),
        Value::String(text) => text.trim(),
        other => {
            return Err(Error::Evaluation(format!(
                "cannot parse a date from {}",
                other.kind_name()
            )))
        }
    };

    let date_times = ISO_DATE_TIME_FORMATS
        .iter()
        .chain(culture.date_time_formats());
    for format in date_times {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Value::DateTime(parsed));
        }
    }

    for format in ISO_DATE_FORMATS.iter().chain(culture.date_formats()) {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return Ok(Value::DateTime(parsed.and_time(NaiveTime::MIN)));
        }
    }

    Err(Error::Evaluation(format!(
        "'{text}' is not a valid date for culture {culture}"
    )))
}

/// Render a value as text, the way `ToString()` would.
///
/// `null` stays `null`. Enumerations render their literal name, or the number if no literal
/// matches; class instances and collections render their type's full name.
///
/// # Errors
/// Returns [`Error::LockError`] if an instance lock is poisoned.
pub fn to_text(value: &Value) -> Result<Value> {
    let text = match value {
        Value::Null => return Ok(Value::Null),
        Value::String(_) => return Ok(value.clone()),
        Value::Boolean(true) => "True".to_string(),
        Value::Boolean(false) => "False".to_string(),
        Value::Char(c) => c.to_string(),
        Value::I1(v) => v.to_string(),
        Value::U1(v) => v.to_string(),
        Value::I2(v) => v.to_string(),
        Value::U2(v) => v.to_string(),
        Value::I4(v) => v.to_string(),
        Value::U4(v) => v.to_string(),
        Value::I8(v) => v.to_string(),
        Value::U8(v) => v.to_string(),
        Value::R4(v) => v.to_string(),
        Value::R8(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::DateTime(v) => v.format("%m/%d/%Y %H:%M:%S").to_string(),
        Value::Enum(EnumValue { ty, value }) => ty
            .literal_name(*value)
            .unwrap_or_else(|| value.to_string()),
        Value::Struct(data) => data.ty.fullname(),
        Value::Object(object) => object.ty()?.fullname(),
        Value::Sequence(sequence) => sequence.ty()?.fullname(),
        Value::Func(Callable::Native(native)) => native.name().to_string(),
        Value::Func(Callable::Closure(_)) => "Closure".to_string(),
    };
    Ok(Value::string(&text))
}

/// Convert `value` into a value of type `target`.
///
/// `null` becomes the default of non-nullable targets. Nullable targets convert into their inner
/// type. Class instances, structs and collections are passed through unchanged; user-defined
/// conversion operators are not considered here.
///
/// ## Arguments
/// * 'value'  - The value to convert
/// * 'target' - The type to convert into
///
/// # Errors
/// Returns [`Error::Evaluation`] if no conversion between the runtime value and the target type
/// exists, or the converted number has no representation in the target type.
pub fn convert(value: &Value, target: &MapTypeRc) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::default_for(target));
    }

    match &target.flavor {
        TypeFlavor::Nullable => match target.nullable_inner() {
            Some(inner) => convert(value, &inner),
            None => Ok(value.clone()),
        },
        TypeFlavor::Primitive(kind) => convert_primitive(value, *kind),
        TypeFlavor::Enum { underlying } => {
            if let Value::Enum(EnumValue { ty, value }) = value {
                if ty.token == target.token {
                    return Ok(Value::Enum(EnumValue {
                        ty: ty.clone(),
                        value: *value,
                    }));
                }
            }
            let converted = number_to(to_number(value)?, *underlying)?;
            Ok(Value::Enum(EnumValue {
                ty: target.clone(),
                value: integral_of(&converted)?,
            }))
        }
        _ => Ok(value.clone()),
    }
}

pub(crate) fn convert_primitive(value: &Value, kind: PrimitiveKind) -> Result<Value> {
    match kind {
        PrimitiveKind::Object => Ok(value.clone()),
        PrimitiveKind::String => to_text(value),
        PrimitiveKind::DateTime => parse_date(value, Culture::Invariant),
        PrimitiveKind::Boolean => match value {
            Value::Boolean(_) => Ok(value.clone()),
            other => Err(Error::Evaluation(format!(
                "cannot convert {} to Boolean",
                other.kind_name()
            ))),
        },
        _ => number_to(to_number(value)?, kind),
    }
}

/// Intermediate numeric representation
#[derive(Clone, Copy, Debug)]
enum Number {
    Int(i128),
    Single(f32),
    Float(f64),
    Dec(Decimal),
}

fn to_number(value: &Value) -> Result<Number> {
    Ok(match value {
        Value::Char(c) => Number::Int(i128::from(u32::from(*c))),
        Value::I1(v) => Number::Int(i128::from(*v)),
        Value::U1(v) => Number::Int(i128::from(*v)),
        Value::I2(v) => Number::Int(i128::from(*v)),
        Value::U2(v) => Number::Int(i128::from(*v)),
        Value::I4(v) => Number::Int(i128::from(*v)),
        Value::U4(v) => Number::Int(i128::from(*v)),
        Value::I8(v) => Number::Int(i128::from(*v)),
        Value::U8(v) => Number::Int(i128::from(*v)),
        Value::R4(v) => Number::Single(*v),
        Value::R8(v) => Number::Float(*v),
        Value::Decimal(v) => Number::Dec(*v),
        Value::Enum(EnumValue { value, .. }) => Number::Int(i128::from(*value)),
        other => {
            return Err(Error::Evaluation(format!(
                "{} is not a numeric value",
                other.kind_name()
            )))
        }
    })
}

fn truncate(number: Number) -> i128 {
    match number {
        Number::Int(v) => v,
        Number::Single(v) => f64::from(v).trunc() as i128,
        Number::Float(v) => v.trunc() as i128,
        Number::Dec(v) => v.trunc().to_i128().unwrap_or_default(),
    }
}

fn out_of_range(number: impl std::fmt::Display, kind: PrimitiveKind) -> Error {
    Error::Evaluation(format!("{number} is outside the range of {}", kind.name()))
}

/// Checked conversion out of a decimal, `OverflowException`-style
fn decimal_to(value: Decimal, kind: PrimitiveKind) -> Result<Value> {
    let integral = value.trunc();
    let converted = match kind {
        PrimitiveKind::I1 => integral.to_i8().map(Value::I1),
        PrimitiveKind::U1 => integral.to_u8().map(Value::U1),
        PrimitiveKind::I2 => integral.to_i16().map(Value::I2),
        PrimitiveKind::U2 => integral.to_u16().map(Value::U2),
        PrimitiveKind::I4 => integral.to_i32().map(Value::I4),
        PrimitiveKind::U4 => integral.to_u32().map(Value::U4),
        PrimitiveKind::I8 => integral.to_i64().map(Value::I8),
        PrimitiveKind::U8 => integral.to_u64().map(Value::U8),
        PrimitiveKind::Char => integral
            .to_u16()
            .and_then(|unit| char::from_u32(u32::from(unit)))
            .map(Value::Char),
        PrimitiveKind::R4 => value.to_f32().map(Value::R4),
        PrimitiveKind::R8 => value.to_f64().map(Value::R8),
        PrimitiveKind::Decimal => Some(Value::Decimal(value)),
        other => {
            return Err(Error::Evaluation(format!(
                "{} is not a numeric type",
                other.name()
            )))
        }
    };
    converted.ok_or_else(|| out_of_range(value, kind))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn number_to(number: Number, kind: PrimitiveKind) -> Result<Value> {
    if let Number::Dec(value) = number {
        return decimal_to(value, kind);
    }

    Ok(match kind {
        PrimitiveKind::I1 => Value::I1(truncate(number) as i8),
        PrimitiveKind::U1 => Value::U1(truncate(number) as u8),
        PrimitiveKind::I2 => Value::I2(truncate(number) as i16),
        PrimitiveKind::U2 => Value::U2(truncate(number) as u16),
        PrimitiveKind::I4 => Value::I4(truncate(number) as i32),
        PrimitiveKind::U4 => Value::U4(truncate(number) as u32),
        PrimitiveKind::I8 => Value::I8(truncate(number) as i64),
        PrimitiveKind::U8 => Value::U8(truncate(number) as u64),
        PrimitiveKind::Char => {
            let unit = truncate(number) as u16;
            let c = char::from_u32(u32::from(unit)).ok_or_else(|| {
                Error::Evaluation(format!("0x{unit:04X} is not a valid character"))
            })?;
            Value::Char(c)
        }
        PrimitiveKind::R4 => Value::R4(match number {
            Number::Int(v) => v as f32,
            Number::Single(v) => v,
            Number::Float(v) => v as f32,
            Number::Dec(v) => v.to_f32().unwrap_or_default(),
        }),
        PrimitiveKind::R8 => Value::R8(match number {
            Number::Int(v) => v as f64,
            Number::Single(v) => f64::from(v),
            Number::Float(v) => v,
            Number::Dec(v) => v.to_f64().unwrap_or_default(),
        }),
        PrimitiveKind::Decimal => {
            let converted = match number {
                Number::Int(v) => Decimal::from_i128(v),
                Number::Single(v) => Decimal::from_f32(v),
                Number::Float(v) => Decimal::from_f64(v),
                Number::Dec(v) => Some(v),
            };
            Value::Decimal(converted.ok_or_else(|| out_of_range(format!("{number:?}"), kind))?)
        }
        other => {
            return Err(Error::Evaluation(format!(
                "{} is not a numeric type",
                other.name()
            )))
        }
    })
}

fn integral_of(value: &Value) -> Result<i64> {
    Ok(match value {
        Value::I1(v) => i64::from(*v),
        Value::U1(v) => i64::from(*v),
        Value::I2(v) => i64::from(*v),
        Value::U2(v) => i64::from(*v),
        Value::I4(v) => i64::from(*v),
        Value::U4(v) => i64::from(*v),
        Value::I8(v) => *v,
        #[allow(clippy::cast_possible_wrap)]
        Value::U8(v) => *v as i64,
        other => {
            return Err(Error::Evaluation(format!(
                "{} is not an integral value",
                other.kind_name()
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::{TypeBuilder, TypeRegistry};

    #[test]
    fn test_numeric_narrowing_wraps_and_truncates() {
        let registry = TypeRegistry::new();
        let byte = registry.primitive(PrimitiveKind::U1);
        let int = registry.primitive(PrimitiveKind::I4);

        assert_eq!(convert(&Value::I4(300), &byte).unwrap(), Value::U1(44));
        assert_eq!(convert(&Value::R8(-7.9), &int).unwrap(), Value::I4(-7));
        let decimal: Decimal = "115.50".parse().unwrap();
        assert_eq!(
            convert(&Value::Decimal(decimal), &int).unwrap(),
            Value::I4(115)
        );
    }

    #[test]
    fn test_decimal_narrowing_is_checked() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);
        let byte = registry.primitive(PrimitiveKind::U1);
        let decimal = registry.primitive(PrimitiveKind::Decimal);

        let large = Value::Decimal(Decimal::from(3_000_000_000_i64));
        assert!(matches!(convert(&large, &int), Err(Error::Evaluation(_))));
        assert!(convert(&Value::Decimal(Decimal::from(-1)), &byte).is_err());
        assert_eq!(
            convert(&Value::Decimal(Decimal::from(255)), &byte).unwrap(),
            Value::U1(255)
        );
        assert!(convert(&Value::R8(1e30), &decimal).is_err());
    }

    #[test]
    fn test_to_decimal_is_exact() {
        let registry = TypeRegistry::new();
        let decimal = registry.primitive(PrimitiveKind::Decimal);

        let converted = convert(&Value::R8(0.1), &decimal).unwrap();
        assert_eq!(converted.to_string(), "0.1");
        assert!(convert(&Value::R8(f64::INFINITY), &decimal).is_err());
    }

    #[test]
    fn test_null_handling() {
        let registry = TypeRegistry::new();
        let int = registry.primitive(PrimitiveKind::I4);
        let nullable = registry.nullable_of(&int);

        assert_eq!(convert(&Value::Null, &int).unwrap(), Value::I4(0));
        assert_eq!(convert(&Value::Null, &nullable).unwrap(), Value::Null);
        assert_eq!(convert(&Value::I8(5), &nullable).unwrap(), Value::I4(5));
    }

    #[test]
    fn test_enum_conversions() {
        let registry = TypeRegistry::new();
        let status = TypeBuilder::enumeration(&registry, "Demo", "Status", PrimitiveKind::I4)
            .literal("Active", 1)
            .build();
        let int = registry.primitive(PrimitiveKind::I4);

        let active = convert(&Value::I4(1), &status).unwrap();
        assert_eq!(to_text(&active).unwrap(), Value::string("Active"));
        assert_eq!(convert(&active, &int).unwrap(), Value::I4(1));

        let unknown = convert(&Value::I4(9), &status).unwrap();
        assert_eq!(to_text(&unknown).unwrap(), Value::string("9"));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&Value::Boolean(true)).unwrap(), Value::string("True"));
        assert_eq!(to_text(&Value::R8(42.0)).unwrap(), Value::string("42"));
        assert_eq!(to_text(&Value::R8(1.5)).unwrap(), Value::string("1.5"));
        assert_eq!(to_text(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_date_cultures() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_time(NaiveTime::MIN);

        let us = parse_date(&Value::string("03/04/2024"), Culture::EnUs).unwrap();
        assert_eq!(us, Value::DateTime(expected));

        let gb = parse_date(&Value::string("04/03/2024"), Culture::EnGb).unwrap();
        assert_eq!(gb, Value::DateTime(expected));

        let de = parse_date(&Value::string("04.03.2024"), Culture::DeDe).unwrap();
        assert_eq!(de, Value::DateTime(expected));

        let iso = parse_date(&Value::string("2024-03-04"), Culture::DeDe).unwrap();
        assert_eq!(iso, Value::DateTime(expected));

        assert!(parse_date(&Value::string("not a date"), Culture::Invariant).is_err());
        assert_eq!(parse_date(&Value::Null, Culture::Invariant).unwrap(), Value::Null);
    }

    #[test]
    fn test_boolean_only_from_boolean() {
        let registry = TypeRegistry::new();
        let boolean = registry.primitive(PrimitiveKind::Boolean);
        assert!(convert(&Value::I4(1), &boolean).is_err());
        assert_eq!(
            convert(&Value::Boolean(true), &boolean).unwrap(),
            Value::Boolean(true)
        );
    }
}
