//! Scalar value encoding and decoding.

use bson::{Binary, Bson, oid::ObjectId, spec::BinarySubtype};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::{
    context::ResolutionContext,
    error::{DatastoreError, DatastoreResult},
    expression::{BsonExpression, BsonFieldValue, DocumentValue, FieldValue, PropertyBoxValue},
    property::{Property, PropertyBox},
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
    value::{EnumCodecStrategy, PropertyType, TemporalType, Value},
};

/// Encodes the value of the identifier property through the [`DocumentIdHandler`].
///
/// [`DocumentIdHandler`]: crate::id::DocumentIdHandler
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentIdEncoder;

impl ExpressionResolver<FieldValue, BsonExpression> for DocumentIdEncoder {
    fn resolve(
        &self,
        expression: &FieldValue,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<BsonExpression>> {
        let (Some(property), Some(document)) = (&expression.property, context.document_context())
        else {
            return Ok(None);
        };
        if !document.is_id_path(property.path()) || expression.value.is_null() {
            return Ok(None);
        }

        context
            .document_id_handler()
            .encode_bson(&expression.value)
            .map(|id| Some(BsonExpression(id)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY - 1
    }
}

/// Decodes the `_id` value into the identifier property type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentIdDecoder;

impl ExpressionResolver<BsonFieldValue, FieldValue> for DocumentIdDecoder {
    fn resolve(
        &self,
        expression: &BsonFieldValue,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<FieldValue>> {
        let Some(document) = context.document_context() else {
            return Ok(None);
        };
        if !document.is_id_path(expression.property.path()) {
            return Ok(None);
        }

        context
            .document_id_handler()
            .decode_bson(&expression.value, expression.property.property_type())
            .transpose()
            .map(|value| value.map(|value| FieldValue::typed(value, expression.property.clone())))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY - 1
    }
}

/// Encodes any [`Value`] into BSON, using the property (when known) for type context.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldValueEncoder;

impl ExpressionResolver<FieldValue, BsonExpression> for FieldValueEncoder {
    fn resolve(
        &self,
        expression: &FieldValue,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<BsonExpression>> {
        encode_value(&expression.value, expression.property.as_ref(), context)
            .map(|value| Some(BsonExpression(value)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

/// Decodes BSON into a [`Value`] of the declared property type.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldValueDecoder;

impl ExpressionResolver<BsonFieldValue, FieldValue> for FieldValueDecoder {
    fn resolve(
        &self,
        expression: &BsonFieldValue,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<FieldValue>> {
        let property = &expression.property;
        decode_value(&expression.value, property.property_type(), property, context)
            .map(|value| Some(FieldValue::typed(value, property.clone())))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

fn date_time(instant: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(instant.timestamp_millis()))
}

fn instant(value: &bson::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value.timestamp_millis())
}

fn element_property(property: Option<&Property>) -> Option<Property> {
    match property {
        Some(property) => match property.property_type() {
            PropertyType::Array(element) => Some(Property::new(property.path().clone(), (**element).clone())),
            _ => None,
        },
        None => None,
    }
}

pub(crate) fn encode_value(
    value: &Value,
    property: Option<&Property>,
    context: &ResolutionContext,
) -> DatastoreResult<Bson> {
    let encoded = match value {
        Value::Null => Bson::Null,
        Value::String(value) => Bson::String(value.clone()),
        Value::Boolean(value) => Bson::Boolean(*value),
        Value::Integer(value) => Bson::Int32(*value),
        Value::Long(value) => Bson::Int64(*value),
        Value::Double(value) => Bson::Double(*value),
        Value::BigInteger(value) => Bson::String(value.to_string()),
        Value::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.clone(),
        }),
        Value::ObjectId(id) => Bson::ObjectId(*id),
        Value::Date(date) => date_time(date.and_time(NaiveTime::MIN).and_utc()),
        Value::DateTime(value) => match property.and_then(Property::temporal_type) {
            Some(TemporalType::Date) => date_time(value.date_naive().and_time(NaiveTime::MIN).and_utc()),
            _ => date_time(*value),
        },
        Value::LocalDateTime(value) => date_time(value.and_utc()),
        Value::Time(time) => date_time(NaiveDate::default().and_time(*time).and_utc()),
        Value::Enum(constant) => encode_enum(constant, property, context.enum_codec_strategy())?,
        Value::Array(items) => {
            let element = element_property(property);
            let encoded = items
                .iter()
                .map(|item| {
                    context
                        .resolve_or_fail::<BsonExpression, _>(&FieldValue {
                            value: item.clone(),
                            property: element.clone(),
                        })
                        .map(BsonExpression::into_value)
                })
                .collect::<DatastoreResult<Vec<_>>>()?;
            Bson::Array(encoded)
        }
        Value::PropertyBox(value) => Bson::Document(encode_embedded(value, context)?),
        Value::Document(document) => Bson::Document(document.clone()),
    };

    Ok(encoded)
}

fn encode_enum(
    constant: &str,
    property: Option<&Property>,
    strategy: EnumCodecStrategy,
) -> DatastoreResult<Bson> {
    match strategy {
        EnumCodecStrategy::Name => Ok(Bson::String(constant.to_string())),
        EnumCodecStrategy::Ordinal => {
            let Some(PropertyType::Enum(enum_type)) = property.map(Property::property_type) else {
                return Err(DatastoreError::InvalidExpression(format!(
                    "Enum constant '{constant}' cannot be encoded by ordinal without its enum type"
                )));
            };
            let ordinal = enum_type.ordinal_of(constant).ok_or_else(|| {
                DatastoreError::InvalidExpression(format!(
                    "'{constant}' is not a constant of {}",
                    enum_type.name()
                ))
            })?;
            i32::try_from(ordinal)
                .map(Bson::Int32)
                .map_err(|e| DatastoreError::InvalidExpression(e.to_string()))
        }
    }
}

fn encode_embedded(value: &PropertyBox, context: &ResolutionContext) -> DatastoreResult<bson::Document> {
    context
        .for_embedded(value.property_set())
        .resolve_or_fail::<DocumentValue, _>(&PropertyBoxValue(value.clone()))
        .map(|document| document.0)
}

fn integral(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64).then_some(value as i64)
}

pub(crate) fn decode_value(
    value: &Bson,
    property_type: &PropertyType,
    property: &Property,
    context: &ResolutionContext,
) -> DatastoreResult<Value> {
    if matches!(value, Bson::Null | Bson::Undefined) {
        return Ok(Value::Null);
    }

    let decoded = match (property_type, value) {
        (PropertyType::String, Bson::String(value)) => Some(Value::String(value.clone())),
        (PropertyType::String, Bson::ObjectId(id)) => Some(Value::String(id.to_hex())),
        (PropertyType::Boolean, Bson::Boolean(value)) => Some(Value::Boolean(*value)),
        (PropertyType::Integer, Bson::Int32(value)) => Some(Value::Integer(*value)),
        (PropertyType::Integer, Bson::Int64(value)) => i32::try_from(*value).ok().map(Value::Integer),
        (PropertyType::Integer, Bson::Double(value)) => integral(*value)
            .and_then(|value| i32::try_from(value).ok())
            .map(Value::Integer),
        (PropertyType::Long, Bson::Int32(value)) => Some(Value::Long(i64::from(*value))),
        (PropertyType::Long, Bson::Int64(value)) => Some(Value::Long(*value)),
        (PropertyType::Long, Bson::Double(value)) => integral(*value).map(Value::Long),
        (PropertyType::Double, Bson::Double(value)) => Some(Value::Double(*value)),
        (PropertyType::Double, Bson::Int32(value)) => Some(Value::Double(f64::from(*value))),
        (PropertyType::Double, Bson::Int64(value)) => Some(Value::Double(*value as f64)),
        (PropertyType::BigInteger, Bson::String(value)) => value.parse().ok().map(Value::BigInteger),
        (PropertyType::BigInteger, Bson::Int32(value)) => u128::try_from(*value).ok().map(Value::BigInteger),
        (PropertyType::BigInteger, Bson::Int64(value)) => u128::try_from(*value).ok().map(Value::BigInteger),
        (PropertyType::BigInteger | PropertyType::Bytes, Bson::ObjectId(id)) => {
            Some(context.document_id_handler().decode(id, property_type)?)
        }
        (PropertyType::Bytes, Bson::Binary(binary)) => Some(Value::Bytes(binary.bytes.clone())),
        (PropertyType::ObjectId, Bson::ObjectId(id)) => Some(Value::ObjectId(*id)),
        (PropertyType::ObjectId, Bson::String(value)) => ObjectId::parse_str(value).ok().map(Value::ObjectId),
        (PropertyType::Date, Bson::DateTime(value)) => instant(value).map(|i| Value::Date(i.date_naive())),
        (PropertyType::DateTime, Bson::DateTime(value)) => instant(value).map(Value::DateTime),
        (PropertyType::LocalDateTime, Bson::DateTime(value)) => {
            instant(value).map(|i| Value::LocalDateTime(i.naive_utc()))
        }
        (PropertyType::Time, Bson::DateTime(value)) => instant(value).map(|i| Value::Time(i.time())),
        (PropertyType::Enum(enum_type), Bson::String(constant)) => enum_type
            .ordinal_of(constant)
            .map(|_| Value::Enum(constant.clone())),
        (PropertyType::Enum(enum_type), Bson::Int32(ordinal)) => usize::try_from(*ordinal)
            .ok()
            .and_then(|ordinal| enum_type.constant(ordinal))
            .map(|constant| Value::Enum(constant.to_string())),
        (PropertyType::Enum(enum_type), Bson::Int64(ordinal)) => usize::try_from(*ordinal)
            .ok()
            .and_then(|ordinal| enum_type.constant(ordinal))
            .map(|constant| Value::Enum(constant.to_string())),
        (PropertyType::Array(element), Bson::Array(items)) => {
            let element = Property::new(property.path().clone(), (**element).clone());
            let decoded = items
                .iter()
                .map(|item| {
                    context
                        .resolve_or_fail::<FieldValue, _>(&BsonFieldValue::new(item.clone(), element.clone()))
                        .map(|field| field.value)
                })
                .collect::<DatastoreResult<Vec<_>>>()?;
            Some(Value::Array(decoded))
        }
        (PropertyType::Embedded(set), Bson::Document(document)) => {
            let decoded = context
                .for_embedded(set)
                .resolve_or_fail::<PropertyBoxValue, _>(&DocumentValue(document.clone()))?;
            Some(Value::PropertyBox(decoded.0))
        }
        (PropertyType::Document, Bson::Document(document)) => Some(Value::Document(document.clone())),
        _ => None,
    };

    decoded.ok_or_else(|| DatastoreError::TypeMismatch {
        path: property.name(),
        expected: property_type.to_string(),
        actual: format!("{:?}", value.element_type()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{property::PropertySet, value::EnumType};
    use chrono::TimeZone;
    use rstest::rstest;

    fn encode(context: &ResolutionContext, value: Value, property: Property) -> Bson {
        context
            .resolve_or_fail::<BsonExpression, _>(&FieldValue::typed(value, property))
            .unwrap()
            .into_value()
    }

    fn decode(context: &ResolutionContext, value: Bson, property: Property) -> DatastoreResult<Value> {
        context
            .resolve_or_fail::<FieldValue, _>(&BsonFieldValue::new(value, property))
            .map(|field| field.value)
    }

    fn color() -> PropertyType {
        PropertyType::Enum(EnumType::new("Color", ["Red", "Green", "Blue"]))
    }

    #[rstest]
    #[case(EnumCodecStrategy::Name, Bson::String("Green".to_string()))]
    #[case(EnumCodecStrategy::Ordinal, Bson::Int32(1))]
    fn enum_strategies(#[case] strategy: EnumCodecStrategy, #[case] expected: Bson) {
        let context = ResolutionContext::builder().enum_codec_strategy(strategy).build();
        let property = Property::named("color", color());

        let encoded = encode(&context, Value::Enum("Green".to_string()), property.clone());
        assert_eq!(encoded, expected);
        assert_eq!(
            decode(&context, encoded, property).unwrap(),
            Value::Enum("Green".to_string())
        );
    }

    #[test]
    fn enum_decoding_accepts_either_form() {
        let context = ResolutionContext::default();
        let property = Property::named("color", color());

        assert_eq!(
            decode(&context, Bson::Int64(2), property.clone()).unwrap(),
            Value::Enum("Blue".to_string())
        );
        assert!(decode(&context, Bson::String("Purple".to_string()), property).is_err());
    }

    #[test]
    fn date_granularity_truncates() {
        let context = ResolutionContext::default();
        let instant = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let property = Property::named("at", PropertyType::DateTime).temporal(TemporalType::Date);

        let encoded = encode(&context, Value::DateTime(instant), property);
        let midnight = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(encoded, Bson::DateTime(bson::DateTime::from_millis(midnight.timestamp_millis())));
    }

    #[test]
    fn time_is_stored_on_epoch_day() {
        let context = ResolutionContext::default();
        let property = Property::named("at", PropertyType::Time);
        let time = NaiveTime::from_hms_opt(8, 15, 0).unwrap();

        let encoded = encode(&context, Value::Time(time), property.clone());
        assert_eq!(encoded, Bson::DateTime(bson::DateTime::from_millis(((8 * 60 + 15) * 60) * 1000)));
        assert_eq!(decode(&context, encoded, property).unwrap(), Value::Time(time));
    }

    #[rstest]
    #[case(PropertyType::Long, Bson::Int32(7), Value::Long(7))]
    #[case(PropertyType::Double, Bson::Int64(3), Value::Double(3.0))]
    #[case(PropertyType::Integer, Bson::Double(4.0), Value::Integer(4))]
    #[case(PropertyType::BigInteger, Bson::String("12345678901234567890".to_string()), Value::BigInteger(12345678901234567890))]
    fn numeric_widening(#[case] ty: PropertyType, #[case] stored: Bson, #[case] expected: Value) {
        let context = ResolutionContext::default();
        assert_eq!(decode(&context, stored, Property::named("n", ty)).unwrap(), expected);
    }

    #[rstest]
    #[case(PropertyType::Integer, Bson::String("x".to_string()))]
    #[case(PropertyType::Integer, Bson::Int64(i64::MAX))]
    #[case(PropertyType::Integer, Bson::Double(1.5))]
    #[case(PropertyType::Boolean, Bson::Int32(1))]
    fn incompatible_values_are_rejected(#[case] ty: PropertyType, #[case] stored: Bson) {
        let context = ResolutionContext::default();
        assert!(matches!(
            decode(&context, stored, Property::named("n", ty)),
            Err(DatastoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn arrays_use_element_type() {
        let context = ResolutionContext::builder()
            .enum_codec_strategy(EnumCodecStrategy::Ordinal)
            .build();
        let property = Property::named("colors", PropertyType::array_of(color()));
        let value = Value::Array(vec![Value::Enum("Blue".to_string()), Value::Enum("Red".to_string())]);

        let encoded = encode(&context, value.clone(), property.clone());
        assert_eq!(encoded, Bson::Array(vec![Bson::Int32(2), Bson::Int32(0)]));
        assert_eq!(decode(&context, encoded, property).unwrap(), value);
    }

    #[test]
    fn identifier_goes_through_handler_only_in_document_scope() {
        let id = ObjectId::new();
        let property = Property::named("id", PropertyType::String).identifier();
        let set = PropertySet::new([property.clone()]);
        let root = ResolutionContext::default();
        let scoped = root.for_document(&set).unwrap();

        assert_eq!(encode(&scoped, Value::String(id.to_hex()), property.clone()), Bson::ObjectId(id));
        assert_eq!(encode(&root, Value::String(id.to_hex()), property.clone()), Bson::String(id.to_hex()));
        assert_eq!(
            decode(&scoped, Bson::ObjectId(id), property).unwrap(),
            Value::String(id.to_hex())
        );
    }
}
