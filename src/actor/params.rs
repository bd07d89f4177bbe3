/// Parameter values and their canonical projection
///
/// Every actor parameter is expressed as a [`ParamValue`]. The canonical form
/// is plain JSON: records and maps become objects (keys sorted), sequences
/// become arrays and primitives map one to one. This projection is the input
/// of cache-key derivation, so it must be deterministic.
use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
    /// A named set of fields, in declaration order.
    Record(Vec<(String, ParamValue)>),
}

impl ParamValue {
    /// Build a record from `(field, value)` pairs.
    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: Into<String>,
    {
        ParamValue::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An empty record, for actors whose parameter class has no fields.
    pub fn empty_record() -> Self {
        ParamValue::Record(Vec::new())
    }

    /// Project into canonical JSON.
    ///
    /// Fails on non-finite floats and on records that repeat a field name.
    pub fn to_canonical(&self) -> Result<Value> {
        self.project("params")
    }

    fn project(&self, path: &str) -> Result<Value> {
        Ok(match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::Number(Number::from(*i)),
            ParamValue::Float(f) => {
                let number = Number::from_f64(*f).ok_or_else(|| Error::UnsupportedParam {
                    path: path.to_string(),
                    reason: format!("non-finite float {f}"),
                })?;
                Value::Number(number)
            }
            ParamValue::Str(s) => Value::String(s.clone()),
            ParamValue::Seq(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.project(&format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>>>()?,
            ),
            ParamValue::Map(entries) => {
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(key.clone(), value.project(&format!("{path}.{key}"))?);
                }
                Value::Object(object)
            }
            ParamValue::Record(fields) => {
                let mut object = Map::new();
                for (name, value) in fields {
                    let projected = value.project(&format!("{path}.{name}"))?;
                    if object.insert(name.clone(), projected).is_some() {
                        return Err(Error::UnsupportedParam {
                            path: path.to_string(),
                            reason: format!("record repeats field {name}"),
                        });
                    }
                }
                Value::Object(object)
            }
        })
    }

    /// Field names of a record or map, `None` for any other value.
    pub fn field_names(&self) -> Option<Vec<&str>> {
        match self {
            ParamValue::Record(fields) => Some(fields.iter().map(|(k, _)| k.as_str()).collect()),
            ParamValue::Map(entries) => Some(entries.keys().map(String::as_str).collect()),
            _ => None,
        }
    }

    /// Value of field `name` in a record or map.
    pub fn field(&self, name: &str) -> Option<&ParamValue> {
        match self {
            ParamValue::Record(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            ParamValue::Map(entries) => entries.get(name),
            _ => None,
        }
    }

    /// Copy of a record or map without the named fields; other values are
    /// returned unchanged.
    pub fn without_fields(&self, names: &[&str]) -> ParamValue {
        match self {
            ParamValue::Record(fields) => ParamValue::Record(
                fields
                    .iter()
                    .filter(|(k, _)| !names.contains(&k.as_str()))
                    .cloned()
                    .collect(),
            ),
            ParamValue::Map(entries) => ParamValue::Map(
                entries
                    .iter()
                    .filter(|(k, _)| !names.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Convert any serializable value. JSON objects become records.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::from_json(serde_json::to_value(value)?)
    }

    /// Convert a JSON value. Integers beyond the `i64` range are rejected
    /// rather than silently turned into floats.
    pub fn from_json(value: Value) -> Result<Self> {
        Self::convert_json(value, "params")
    }

    fn convert_json(value: Value, path: &str) -> Result<Self> {
        Ok(match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ParamValue::Int(i)
                } else if n.is_f64() {
                    ParamValue::Float(n.as_f64().unwrap_or(f64::NAN))
                } else {
                    return Err(Error::UnsupportedParam {
                        path: path.to_string(),
                        reason: format!("integer {n} does not fit in i64"),
                    });
                }
            }
            Value::String(s) => ParamValue::Str(s),
            Value::Array(items) => ParamValue::Seq(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Self::convert_json(item, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(object) => ParamValue::Record(
                object
                    .into_iter()
                    .map(|(k, v)| {
                        let value = Self::convert_json(v, &format!("{path}.{k}"))?;
                        Ok((k, value))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    /// Convert a TOML value read from a configuration file.
    pub fn from_toml(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ParamValue::Str(s),
            toml::Value::Integer(i) => ParamValue::Int(i),
            toml::Value::Float(f) => ParamValue::Float(f),
            toml::Value::Boolean(b) => ParamValue::Bool(b),
            toml::Value::Datetime(dt) => ParamValue::Str(dt.to_string()),
            toml::Value::Array(items) => {
                ParamValue::Seq(items.into_iter().map(Self::from_toml).collect())
            }
            toml::Value::Table(table) => ParamValue::Record(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_toml(v)))
                    .collect(),
            ),
        }
    }

    /// Deserialize into a typed parameter struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_canonical()?)?)
    }
}

/// Conversion into [`ParamValue`].
pub trait ToParam {
    fn to_param(&self) -> ParamValue;
}

impl ToParam for ParamValue {
    fn to_param(&self) -> ParamValue {
        self.clone()
    }
}

impl ToParam for bool {
    fn to_param(&self) -> ParamValue {
        ParamValue::Bool(*self)
    }
}

macro_rules! int_to_param {
    ($($t:ty),*) => {
        $(impl ToParam for $t {
            fn to_param(&self) -> ParamValue {
                ParamValue::Int(*self as i64)
            }
        })*
    };
}

int_to_param!(i8, i16, i32, i64, u8, u16, u32);

impl ToParam for f32 {
    fn to_param(&self) -> ParamValue {
        ParamValue::Float(*self as f64)
    }
}

impl ToParam for f64 {
    fn to_param(&self) -> ParamValue {
        ParamValue::Float(*self)
    }
}

impl ToParam for str {
    fn to_param(&self) -> ParamValue {
        ParamValue::Str(self.to_string())
    }
}

impl ToParam for String {
    fn to_param(&self) -> ParamValue {
        ParamValue::Str(self.clone())
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> ParamValue {
        match self {
            Some(value) => value.to_param(),
            None => ParamValue::Null,
        }
    }
}

impl<T: ToParam> ToParam for Vec<T> {
    fn to_param(&self) -> ParamValue {
        ParamValue::Seq(self.iter().map(ToParam::to_param).collect())
    }
}

impl<T: ToParam> ToParam for BTreeMap<String, T> {
    fn to_param(&self) -> ParamValue {
        ParamValue::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_param()))
                .collect(),
        )
    }
}

impl<T: ToParam> ToParam for HashMap<String, T> {
    fn to_param(&self) -> ParamValue {
        ParamValue::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_param()))
                .collect(),
        )
    }
}
