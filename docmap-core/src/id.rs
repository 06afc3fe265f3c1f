//! Document identifier handling.
//!
//! MongoDB stores the document identifier in the reserved `_id` field, natively as an
//! [`ObjectId`]. The [`DocumentIdHandler`] converts between that native type and the
//! property types admitted as identifiers, and a [`DocumentIdResolver`] decides which
//! property of a [`PropertySet`] plays the identifier role.

use std::fmt::Debug;

use bson::{Bson, oid::ObjectId};

use crate::{
    error::{DatastoreError, DatastoreResult},
    property::{Property, PropertySet},
    value::{PropertyType, Value},
};

/// The reserved document identifier field name.
pub const ID_FIELD_NAME: &str = "_id";

const OBJECT_ID_LEN: usize = 12;

/// Converts identifiers between `ObjectId` and the admitted property types:
/// `String` (24 hex digits), `BigInteger`, `Bytes` (12 bytes) and `ObjectId` itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentIdHandler;

impl DocumentIdHandler {
    /// Whether properties of the given type may act as document identifier.
    pub fn is_admitted(&self, property_type: &PropertyType) -> bool {
        matches!(
            property_type,
            PropertyType::String
                | PropertyType::BigInteger
                | PropertyType::Bytes
                | PropertyType::ObjectId
        )
    }

    /// Encodes an identifier value into an `ObjectId`.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::InvalidDocumentIdentifier`] if the value is of an
    /// inadmissible type or does not denote a valid `ObjectId`.
    pub fn encode(&self, value: &Value) -> DatastoreResult<ObjectId> {
        match value {
            Value::ObjectId(id) => Ok(*id),
            Value::String(hex) => ObjectId::parse_str(hex).map_err(|e| {
                DatastoreError::InvalidDocumentIdentifier(format!(
                    "'{hex}' is not a valid ObjectId: {e}"
                ))
            }),
            Value::BigInteger(number) => {
                if *number >> (OBJECT_ID_LEN * 8) != 0 {
                    return Err(DatastoreError::InvalidDocumentIdentifier(format!(
                        "{number} does not fit in an ObjectId"
                    )));
                }
                let wide = number.to_be_bytes();
                let mut bytes = [0u8; OBJECT_ID_LEN];
                bytes.copy_from_slice(&wide[wide.len() - OBJECT_ID_LEN..]);
                Ok(ObjectId::from_bytes(bytes))
            }
            Value::Bytes(raw) => {
                let bytes: [u8; OBJECT_ID_LEN] = raw.as_slice().try_into().map_err(|_| {
                    DatastoreError::InvalidDocumentIdentifier(format!(
                        "An ObjectId requires {OBJECT_ID_LEN} bytes, got {}",
                        raw.len()
                    ))
                })?;
                Ok(ObjectId::from_bytes(bytes))
            }
            other => Err(DatastoreError::InvalidDocumentIdentifier(format!(
                "Values of type {} cannot be used as document identifier",
                other.type_name()
            ))),
        }
    }

    /// Decodes an `ObjectId` into a value of the given identifier type.
    pub fn decode(&self, id: &ObjectId, property_type: &PropertyType) -> DatastoreResult<Value> {
        match property_type {
            PropertyType::ObjectId => Ok(Value::ObjectId(*id)),
            PropertyType::String => Ok(Value::String(id.to_hex())),
            PropertyType::BigInteger => {
                let mut wide = [0u8; 16];
                wide[16 - OBJECT_ID_LEN..].copy_from_slice(&id.bytes());
                Ok(Value::BigInteger(u128::from_be_bytes(wide)))
            }
            PropertyType::Bytes => Ok(Value::Bytes(id.bytes().to_vec())),
            other => Err(DatastoreError::InvalidDocumentIdentifier(format!(
                "Type {other} is not admitted as document identifier"
            ))),
        }
    }

    /// Encodes an identifier value into its `_id` BSON representation.
    pub fn encode_bson(&self, value: &Value) -> DatastoreResult<Bson> {
        self.encode(value).map(Bson::ObjectId)
    }

    /// Decodes an `_id` BSON value, if it holds an `ObjectId`.
    pub fn decode_bson(&self, value: &Bson, property_type: &PropertyType) -> Option<DatastoreResult<Value>> {
        match value {
            Bson::ObjectId(id) => Some(self.decode(id, property_type)),
            _ => None,
        }
    }
}

/// Chooses the property of a set that maps to the `_id` field.
pub trait DocumentIdResolver: Send + Sync + Debug {
    /// Returns the identifier property, `None` if the set has none.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::InvalidDocumentIdentifier`] when the choice would be
    /// ambiguous or the candidate has an inadmissible type.
    fn resolve_document_id_property(
        &self,
        set: &PropertySet,
        handler: &DocumentIdHandler,
    ) -> DatastoreResult<Option<Property>>;
}

/// Picks the identifier by precedence: the single declared identifier property, then the
/// single property named `_id`, then the single root `ObjectId` property.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDocumentIdResolver;

impl DefaultDocumentIdResolver {
    fn admitted(property: &Property, handler: &DocumentIdHandler) -> DatastoreResult<Property> {
        if handler.is_admitted(property.property_type()) {
            Ok(property.clone())
        } else {
            Err(DatastoreError::InvalidDocumentIdentifier(format!(
                "Property '{}' of type {} cannot be used as document identifier",
                property.name(),
                property.property_type()
            )))
        }
    }
}

impl DocumentIdResolver for DefaultDocumentIdResolver {
    fn resolve_document_id_property(
        &self,
        set: &PropertySet,
        handler: &DocumentIdHandler,
    ) -> DatastoreResult<Option<Property>> {
        let declared: Vec<&Property> = set.identifiers().collect();
        match declared.as_slice() {
            [single] => {
                let chosen = Self::admitted(single, handler)?;
                if let Some(shadowed) = set.iter().find(|p| !p.is_identifier() && p.name() == ID_FIELD_NAME) {
                    return Err(DatastoreError::InvalidDocumentIdentifier(format!(
                        "Property '{}' maps to '{ID_FIELD_NAME}' but '{}' is the declared identifier",
                        shadowed.name(),
                        chosen.name()
                    )));
                }
                return Ok(Some(chosen));
            }
            [] => {}
            _ => {
                return Err(DatastoreError::InvalidDocumentIdentifier(format!(
                    "{} properties are declared as identifier",
                    declared.len()
                )));
            }
        }

        let named: Vec<&Property> = set.iter().filter(|p| p.name() == ID_FIELD_NAME).collect();
        match named.as_slice() {
            [single] => return Self::admitted(single, handler).map(Some),
            [] => {}
            _ => {
                return Err(DatastoreError::InvalidDocumentIdentifier(format!(
                    "{} properties are named '{ID_FIELD_NAME}'",
                    named.len()
                )));
            }
        }

        let mut object_ids = set
            .iter()
            .filter(|p| p.path().is_root() && *p.property_type() == PropertyType::ObjectId);
        match (object_ids.next(), object_ids.next()) {
            (Some(single), None) => Ok(Some(single.clone())),
            _ => Ok(None),
        }
    }
}
