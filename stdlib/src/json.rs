use anyhow::{Context, Result, bail};
use serde_json::{Map, Number, Value as Json};
use v9vm_core::val::{DictMap, MAX_NESTING, Special, Value};
use v9vm_core::vm::{BuiltinTable, CallContext};

use crate::{BuiltinModule, string_arg};

/// `json_encode` and `json_decode`.
#[derive(Debug, Default)]
pub struct JsonModule;

impl BuiltinModule for JsonModule {
    fn name(&self) -> &str {
        "json"
    }

    fn register(&self, table: &mut BuiltinTable) {
        table.register("json_encode", 1, 1, Self::encode);
        table.register("json_decode", 1, 1, Self::decode);
    }
}

impl JsonModule {
    fn encode(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let json = value_to_json(&args[0])?;
        Ok(Value::string(serde_json::to_string(&json)?))
    }

    fn decode(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let text = string_arg(args, 0, "json_decode")?;
        if text.trim().is_empty() {
            return Ok(Value::Special(Special::None));
        }
        let json: Json = serde_json::from_str(&text).with_context(|| format!("E491: JSON decode error at '{text}'"))?;
        Ok(value_from_json(&json))
    }
}

/// Convert a decoded JSON document into a script value. `null` becomes
/// `v:null`; integers that fit become numbers, everything else floats.
pub fn value_from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Special(Special::Null),
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Number(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::string(s.as_str()),
        Json::Array(items) => Value::list(items.iter().map(value_from_json).collect()),
        Json::Object(map) => {
            let mut dict = DictMap::with_capacity_and_hasher(map.len(), Default::default());
            for (k, v) in map {
                dict.insert(k.clone(), value_from_json(v));
            }
            Value::dict(dict)
        }
    }
}

/// Convert a script value into JSON. Function values, jobs and channels have
/// no JSON form.
pub fn value_to_json(value: &Value) -> Result<Json> {
    to_json_at(value, 0)
}

fn to_json_at(value: &Value, depth: usize) -> Result<Json> {
    if depth > MAX_NESTING {
        bail!("E724: variable nested too deep for displaying");
    }
    Ok(match value {
        Value::Number(n) => Json::Number((*n).into()),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => Json::Number(n),
            None => bail!("E474: Invalid argument: {f}"),
        },
        Value::Bool(b) => Json::Bool(*b),
        Value::Special(_) => Json::Null,
        Value::String(s) => Json::String(s.clone().unwrap_or_default()),
        Value::List(l) => {
            let mut items = Vec::new();
            if let Some(l) = l {
                for item in l.borrow().iter() {
                    items.push(to_json_at(item, depth + 1)?);
                }
            }
            Json::Array(items)
        }
        Value::Dict(d) => {
            let mut map = Map::new();
            if let Some(d) = d {
                for (k, v) in d.borrow().iter() {
                    map.insert(k.clone(), to_json_at(v, depth + 1)?);
                }
            }
            Json::Object(map)
        }
        Value::Blob(b) => {
            let bytes = b.as_ref().map(|b| b.borrow().clone()).unwrap_or_default();
            Json::Array(bytes.into_iter().map(|byte| Json::Number(byte.into())).collect())
        }
        Value::Func(_) | Value::Partial(_) | Value::Job(_) | Value::Channel(_) | Value::Unknown | Value::Void => {
            bail!("E474: Invalid argument: cannot encode {} as JSON", value.type_name())
        }
    })
}
