//! Record formats a range field can be read from.
//!
//! Formats are a closed set: the schema's variant is inspected once when the
//! indexer is built, and every record afterwards goes through the matching
//! extractor arm.

use apache_avro::types::Value as AvroValue;
use apache_avro::Schema as AvroSchema;
use prost_reflect::{DescriptorPool, DynamicMessage, Kind, MessageDescriptor, Value as ProtoValue};

use crate::error::{RangeIndexError, RangeIndexResult};
use crate::padder::{FieldKind, RangeNumber};

const AVRO: &str = "Avro";
const PROTOBUF: &str = "Protobuf";

/// Value schema of a mirrored topic.
#[derive(Debug, Clone)]
pub enum RecordSchema {
    Avro(AvroSchema),
    Protobuf(MessageDescriptor),
}

impl RecordSchema {
    pub fn parse_avro(text: &str) -> RangeIndexResult<Self> {
        AvroSchema::parse_str(text)
            .map(RecordSchema::Avro)
            .map_err(|e| RangeIndexError::invalid_schema(AVRO, e.to_string()))
    }

    /// Looks up `message` in an encoded `FileDescriptorSet`.
    pub fn from_descriptor_set(bytes: &[u8], message: &str) -> RangeIndexResult<Self> {
        let pool = DescriptorPool::decode(bytes)
            .map_err(|e| RangeIndexError::invalid_schema(PROTOBUF, e.to_string()))?;
        pool.get_message_by_name(message)
            .map(RecordSchema::Protobuf)
            .ok_or_else(|| {
                RangeIndexError::invalid_schema(
                    PROTOBUF,
                    format!("message {message} not found in descriptor set"),
                )
            })
    }

    pub fn format(&self) -> &'static str {
        match self {
            RecordSchema::Avro(_) => AVRO,
            RecordSchema::Protobuf(_) => PROTOBUF,
        }
    }

    /// Builds a record of this schema from its JSON form.
    pub fn record_from_json(&self, json: serde_json::Value) -> RangeIndexResult<MirrorRecord> {
        match self {
            RecordSchema::Avro(schema) => AvroValue::from(json)
                .resolve(schema)
                .map(MirrorRecord::Avro)
                .map_err(|e| RangeIndexError::conversion(e.to_string())),
            RecordSchema::Protobuf(descriptor) => {
                DynamicMessage::deserialize(descriptor.clone(), json)
                    .map(MirrorRecord::Protobuf)
                    .map_err(|e| RangeIndexError::conversion(e.to_string()))
            }
        }
    }
}

/// A deserialized topic value.
#[derive(Debug, Clone)]
pub enum MirrorRecord {
    Avro(AvroValue),
    Protobuf(DynamicMessage),
}

impl MirrorRecord {
    pub fn format(&self) -> &'static str {
        match self {
            MirrorRecord::Avro(_) => AVRO,
            MirrorRecord::Protobuf(_) => PROTOBUF,
        }
    }

    /// JSON form served by the mirror endpoints.
    pub fn to_json(&self) -> RangeIndexResult<serde_json::Value> {
        match self {
            MirrorRecord::Avro(value) => serde_json::Value::try_from(value.clone())
                .map_err(|e| RangeIndexError::conversion(e.to_string())),
            MirrorRecord::Protobuf(message) => serde_json::to_value(message)
                .map_err(|e| RangeIndexError::conversion(e.to_string())),
        }
    }
}

/// Reads a named integer field, one arm per record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeFieldExtractor {
    Avro,
    Protobuf,
}

impl RangeFieldExtractor {
    pub fn for_schema(schema: &RecordSchema) -> Self {
        match schema {
            RecordSchema::Avro(_) => RangeFieldExtractor::Avro,
            RecordSchema::Protobuf(_) => RangeFieldExtractor::Protobuf,
        }
    }

    fn format(&self) -> &'static str {
        match self {
            RangeFieldExtractor::Avro => AVRO,
            RangeFieldExtractor::Protobuf => PROTOBUF,
        }
    }

    /// Resolves the integer width of `field`. Anything but a 32 or 64-bit
    /// signed integer is rejected here, before any record is indexed.
    pub fn field_kind(&self, schema: &RecordSchema, field: &str) -> RangeIndexResult<FieldKind> {
        match (self, schema) {
            (RangeFieldExtractor::Avro, RecordSchema::Avro(schema)) => avro_field_kind(schema, field),
            (RangeFieldExtractor::Protobuf, RecordSchema::Protobuf(descriptor)) => {
                proto_field_kind(descriptor, field)
            }
            (extractor, schema) => Err(RangeIndexError::FormatMismatch {
                expected: extractor.format(),
                found: schema.format(),
            }),
        }
    }

    pub fn extract(
        &self,
        record: &MirrorRecord,
        field: &str,
        kind: FieldKind,
    ) -> RangeIndexResult<RangeNumber> {
        match (self, record) {
            (RangeFieldExtractor::Avro, MirrorRecord::Avro(value)) => {
                extract_avro(value, field, kind)
            }
            (RangeFieldExtractor::Protobuf, MirrorRecord::Protobuf(message)) => {
                extract_proto(message, field, kind)
            }
            (extractor, record) => Err(RangeIndexError::FormatMismatch {
                expected: extractor.format(),
                found: record.format(),
            }),
        }
    }
}

fn avro_field_kind(schema: &AvroSchema, field: &str) -> RangeIndexResult<FieldKind> {
    let record = match schema {
        AvroSchema::Record(record) => record,
        _ => return Err(RangeIndexError::NotARecord { format: AVRO }),
    };
    let field_schema = record
        .fields
        .iter()
        .find(|f| f.name == field)
        .map(|f| &f.schema)
        .ok_or_else(|| RangeIndexError::missing_field(field, AVRO))?;

    if let Some(kind) = avro_integer_kind(field_schema) {
        return Ok(kind);
    }
    // Nullable fields are unions; the first integer variant decides the width.
    if let AvroSchema::Union(union) = field_schema {
        if let Some(kind) = union.variants().iter().find_map(avro_integer_kind) {
            return Ok(kind);
        }
    }
    Err(RangeIndexError::unsupported_type(
        field,
        avro_schema_name(field_schema),
    ))
}

fn avro_integer_kind(schema: &AvroSchema) -> Option<FieldKind> {
    match schema {
        AvroSchema::Int | AvroSchema::Date | AvroSchema::TimeMillis => Some(FieldKind::Int),
        AvroSchema::Long
        | AvroSchema::TimeMicros
        | AvroSchema::TimestampMillis
        | AvroSchema::TimestampMicros => Some(FieldKind::Long),
        _ => None,
    }
}

fn avro_schema_name(schema: &AvroSchema) -> &'static str {
    match schema {
        AvroSchema::Null => "null",
        AvroSchema::Boolean => "boolean",
        AvroSchema::Float => "float",
        AvroSchema::Double => "double",
        AvroSchema::String => "string",
        AvroSchema::Bytes => "bytes",
        AvroSchema::Union(_) => "union",
        AvroSchema::Record(_) => "record",
        AvroSchema::Array(_) => "array",
        AvroSchema::Map(_) => "map",
        AvroSchema::Enum(_) => "enum",
        _ => "complex type",
    }
}

fn extract_avro(value: &AvroValue, field: &str, kind: FieldKind) -> RangeIndexResult<RangeNumber> {
    let fields = match value {
        AvroValue::Record(fields) => fields,
        _ => return Err(RangeIndexError::NotARecord { format: AVRO }),
    };
    let mut value = fields
        .iter()
        .find(|(name, _)| name == field)
        .map(|(_, v)| v)
        .ok_or_else(|| RangeIndexError::missing_field(field, AVRO))?;
    if let AvroValue::Union(_, inner) = value {
        value = inner.as_ref();
    }

    match (kind, value) {
        (FieldKind::Int, AvroValue::Int(v))
        | (FieldKind::Int, AvroValue::Date(v))
        | (FieldKind::Int, AvroValue::TimeMillis(v)) => Ok(RangeNumber::Int(*v)),
        (FieldKind::Long, AvroValue::Long(v))
        | (FieldKind::Long, AvroValue::TimeMicros(v))
        | (FieldKind::Long, AvroValue::TimestampMillis(v))
        | (FieldKind::Long, AvroValue::TimestampMicros(v)) => Ok(RangeNumber::Long(*v)),
        (FieldKind::Long, AvroValue::Int(v)) => Ok(RangeNumber::Long(i64::from(*v))),
        (_, AvroValue::Null) => Err(RangeIndexError::MissingValue {
            field: field.to_string(),
        }),
        (expected, other) => Err(RangeIndexError::ValueTypeMismatch {
            field: field.to_string(),
            expected,
            found: avro_value_name(other).to_string(),
        }),
    }
}

fn avro_value_name(value: &AvroValue) -> &'static str {
    match value {
        AvroValue::Null => "null",
        AvroValue::Boolean(_) => "boolean",
        AvroValue::Int(_) => "int",
        AvroValue::Long(_) => "long",
        AvroValue::Float(_) => "float",
        AvroValue::Double(_) => "double",
        AvroValue::String(_) => "string",
        AvroValue::Bytes(_) => "bytes",
        _ => "complex value",
    }
}

fn proto_field_kind(descriptor: &MessageDescriptor, field: &str) -> RangeIndexResult<FieldKind> {
    let field_descriptor = descriptor
        .get_field_by_name(field)
        .ok_or_else(|| RangeIndexError::missing_field(field, PROTOBUF))?;
    if field_descriptor.is_list() || field_descriptor.is_map() {
        return Err(RangeIndexError::unsupported_type(field, "repeated field"));
    }

    match field_descriptor.kind() {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Ok(FieldKind::Int),
        // Unsigned values widen to long; u64 values above i64::MAX fail at extraction.
        Kind::Int64
        | Kind::Sint64
        | Kind::Sfixed64
        | Kind::Uint32
        | Kind::Fixed32
        | Kind::Uint64
        | Kind::Fixed64 => Ok(FieldKind::Long),
        Kind::Message(message) => Err(RangeIndexError::unsupported_type(
            field,
            message.full_name(),
        )),
        Kind::Enum(en) => Err(RangeIndexError::unsupported_type(field, en.full_name())),
        other => Err(RangeIndexError::unsupported_type(
            field,
            format!("{other:?}").to_lowercase(),
        )),
    }
}

fn extract_proto(
    message: &DynamicMessage,
    field: &str,
    kind: FieldKind,
) -> RangeIndexResult<RangeNumber> {
    let value = message
        .get_field_by_name(field)
        .ok_or_else(|| RangeIndexError::missing_field(field, PROTOBUF))?;

    match (kind, value.as_ref()) {
        (FieldKind::Int, ProtoValue::I32(v)) => Ok(RangeNumber::Int(*v)),
        (FieldKind::Long, ProtoValue::I64(v)) => Ok(RangeNumber::Long(*v)),
        (FieldKind::Long, ProtoValue::U32(v)) => Ok(RangeNumber::Long(i64::from(*v))),
        (FieldKind::Long, ProtoValue::U64(v)) => i64::try_from(*v)
            .map(RangeNumber::Long)
            .map_err(|_| RangeIndexError::ValueOutOfRange {
                field: field.to_string(),
                value: *v,
            }),
        (expected, other) => Err(RangeIndexError::ValueTypeMismatch {
            field: field.to_string(),
            expected,
            found: proto_value_name(other).to_string(),
        }),
    }
}

fn proto_value_name(value: &ProtoValue) -> &'static str {
    match value {
        ProtoValue::Bool(_) => "bool",
        ProtoValue::I32(_) => "int32",
        ProtoValue::I64(_) => "int64",
        ProtoValue::U32(_) => "uint32",
        ProtoValue::U64(_) => "uint64",
        ProtoValue::F32(_) => "float",
        ProtoValue::F64(_) => "double",
        ProtoValue::String(_) => "string",
        ProtoValue::Bytes(_) => "bytes",
        ProtoValue::EnumNumber(_) => "enum",
        ProtoValue::Message(_) => "message",
        ProtoValue::List(_) => "list",
        ProtoValue::Map(_) => "map",
        #[allow(unreachable_patterns)]
        _ => "value",
    }
}
