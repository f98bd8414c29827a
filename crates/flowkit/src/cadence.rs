//! JSON-Cadence interchange values.
//!
//! Every value is an object `{"type": T, "value": V}`. Transaction arguments,
//! script arguments and results, and event payloads all use this encoding.

use serde_json::{Map, Value as Json, json};

use crate::{address::Address, error::CadenceError};

/// Numeric type names. Values are always carried as decimal strings.
pub const NUMBER_TYPES: &[&str] = &[
    "Int", "Int8", "Int16", "Int32", "Int64", "Int128", "Int256", "UInt", "UInt8", "UInt16",
    "UInt32", "UInt64", "UInt128", "UInt256", "Word8", "Word16", "Word32", "Word64", "Word128",
    "Word256", "Fix64", "UFix64",
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
pub enum CompositeKind {
    Struct,
    Resource,
    Event,
    Contract,
    Enum,
}

/// A decoded JSON-Cadence value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Optional(Option<Box<Value>>),
    Bool(bool),
    String(String),
    Character(String),
    Address(Address),
    /// Integer or fixed-point number of the given type.
    Number { ty: String, value: String },
    Array(Vec<Value>),
    Dictionary(Vec<(Value, Value)>),
    Composite {
        kind: CompositeKind,
        id: String,
        fields: Vec<(String, Value)>,
    },
    Path { domain: String, identifier: String },
    /// Static type values are kept opaque.
    Type(Json),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn uint64(value: u64) -> Self {
        Value::Number {
            ty: "UInt64".to_string(),
            value: value.to_string(),
        }
    }

    pub fn ufix64(value: &str) -> Self {
        Value::Number {
            ty: "UFix64".to_string(),
            value: value.to_string(),
        }
    }

    /// The JSON-Cadence type tag of this value.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Void => "Void",
            Value::Optional(_) => "Optional",
            Value::Bool(_) => "Bool",
            Value::String(_) => "String",
            Value::Character(_) => "Character",
            Value::Address(_) => "Address",
            Value::Number { ty, .. } => ty,
            Value::Array(_) => "Array",
            Value::Dictionary(_) => "Dictionary",
            Value::Composite { kind, .. } => match kind {
                CompositeKind::Struct => "Struct",
                CompositeKind::Resource => "Resource",
                CompositeKind::Event => "Event",
                CompositeKind::Contract => "Contract",
                CompositeKind::Enum => "Enum",
            },
            Value::Path { .. } => "Path",
            Value::Type(_) => "Type",
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(address) => Some(*address),
            Value::Optional(Some(inner)) => inner.as_address(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Character(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a field of a composite value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Composite { fields, .. } => {
                fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Void => json!({ "type": "Void" }),
            Value::Optional(inner) => json!({
                "type": "Optional",
                "value": inner.as_ref().map(|v| v.to_json()),
            }),
            Value::Bool(b) => json!({ "type": "Bool", "value": b }),
            Value::String(s) => json!({ "type": "String", "value": s }),
            Value::Character(c) => json!({ "type": "Character", "value": c }),
            Value::Address(a) => json!({ "type": "Address", "value": a.to_hex_with_prefix() }),
            Value::Number { ty, value } => json!({ "type": ty, "value": value }),
            Value::Array(items) => json!({
                "type": "Array",
                "value": items.iter().map(Value::to_json).collect::<Vec<_>>(),
            }),
            Value::Dictionary(entries) => json!({
                "type": "Dictionary",
                "value": entries
                    .iter()
                    .map(|(k, v)| json!({ "key": k.to_json(), "value": v.to_json() }))
                    .collect::<Vec<_>>(),
            }),
            Value::Composite { id, fields, .. } => json!({
                "type": self.type_name(),
                "value": {
                    "id": id,
                    "fields": fields
                        .iter()
                        .map(|(name, value)| json!({ "name": name, "value": value.to_json() }))
                        .collect::<Vec<_>>(),
                },
            }),
            Value::Path { domain, identifier } => json!({
                "type": "Path",
                "value": { "domain": domain, "identifier": identifier },
            }),
            Value::Type(static_type) => json!({ "type": "Type", "value": { "staticType": static_type } }),
        }
    }

    pub fn from_json(json: &Json) -> Result<Self, CadenceError> {
        let object = json
            .as_object()
            .ok_or_else(|| CadenceError::Invalid(format!("expected an object, got {json}")))?;
        let ty = object
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| CadenceError::Invalid("missing 'type'".to_string()))?;
        let value = object.get("value").unwrap_or(&Json::Null);

        let decoded = match ty {
            "Void" => Value::Void,
            "Optional" => match value {
                Json::Null => Value::Optional(None),
                inner => Value::Optional(Some(Box::new(Value::from_json(inner)?))),
            },
            "Bool" => Value::Bool(
                value
                    .as_bool()
                    .ok_or_else(|| invalid(ty, "expected a boolean"))?,
            ),
            "String" => Value::String(expect_str(ty, value)?.to_string()),
            "Character" => Value::Character(expect_str(ty, value)?.to_string()),
            "Address" => Value::Address(
                Address::from_hex(expect_str(ty, value)?)
                    .map_err(|e| invalid(ty, &e.to_string()))?,
            ),
            t if NUMBER_TYPES.contains(&t) => Value::Number {
                ty: t.to_string(),
                value: expect_str(ty, value)?.to_string(),
            },
            "Array" => Value::Array(
                expect_array(ty, value)?
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            "Dictionary" => Value::Dictionary(
                expect_array(ty, value)?
                    .iter()
                    .map(|entry| {
                        let key = entry.get("key").ok_or_else(|| invalid(ty, "missing key"))?;
                        let val = entry
                            .get("value")
                            .ok_or_else(|| invalid(ty, "missing value"))?;
                        Ok((Value::from_json(key)?, Value::from_json(val)?))
                    })
                    .collect::<Result<_, CadenceError>>()?,
            ),
            "Struct" | "Resource" | "Event" | "Contract" | "Enum" => {
                let kind = ty
                    .parse::<CompositeKind>()
                    .map_err(|_| CadenceError::UnsupportedType(ty.to_string()))?;
                decode_composite(kind, value)?
            }
            "Path" => Value::Path {
                domain: expect_str(ty, &value["domain"])?.to_string(),
                identifier: expect_str(ty, &value["identifier"])?.to_string(),
            },
            "Type" => Value::Type(value.get("staticType").cloned().unwrap_or(Json::Null)),
            other => return Err(CadenceError::UnsupportedType(other.to_string())),
        };
        Ok(decoded)
    }

    /// Encode to JSON bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CadenceError> {
        let json: Json =
            serde_json::from_slice(bytes).map_err(|e| CadenceError::Invalid(e.to_string()))?;
        Value::from_json(&json)
    }
}

fn decode_composite(kind: CompositeKind, value: &Json) -> Result<Value, CadenceError> {
    let ty = kind.to_string();
    let empty = Map::new();
    let object = value.as_object().unwrap_or(&empty);
    let id = object
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(&ty, "missing id"))?
        .to_string();
    let fields = object
        .get("fields")
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|field| {
            let name = field
                .get("name")
                .and_then(Json::as_str)
                .ok_or_else(|| invalid(&ty, "field without name"))?;
            let value = field
                .get("value")
                .ok_or_else(|| invalid(&ty, "field without value"))?;
            Ok((name.to_string(), Value::from_json(value)?))
        })
        .collect::<Result<_, CadenceError>>()?;
    Ok(Value::Composite { kind, id, fields })
}

fn invalid(ty: &str, reason: &str) -> CadenceError {
    CadenceError::Invalid(format!("{ty}: {reason}"))
}

fn expect_str<'a>(ty: &str, value: &'a Json) -> Result<&'a str, CadenceError> {
    value.as_str().ok_or_else(|| invalid(ty, "expected a string"))
}

fn expect_array<'a>(ty: &str, value: &'a Json) -> Result<&'a Vec<Json>, CadenceError> {
    value.as_array().ok_or_else(|| invalid(ty, "expected an array"))
}
