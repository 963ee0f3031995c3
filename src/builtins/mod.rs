// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The whitelisted builtin surface: functions, type constructors, and the
//! per-type attribute tables the evaluator consults.

mod aggregates;
mod arrays;
mod conversions;
mod io;
pub(crate) mod modules;
mod numbers;
mod objects;
pub(crate) mod pathlib;
mod sequences;
mod sets;
mod strings;
pub(crate) mod types;
pub(crate) mod utils;

use crate::exceptions::{attribute_error, Result};
use crate::interpreter::Interpreter;
use crate::value::{Class, Value};

use core::fmt;
use std::collections::HashMap;

use indexmap::IndexMap;
use lazy_static::lazy_static;

/// Keyword arguments of a call, in source order.
pub type Kwargs = IndexMap<String, Value>;

pub type BuiltinFcn = fn(&mut Interpreter, &[Value], &Kwargs) -> Result<Value>;
pub type MethodFcn = fn(&mut Interpreter, &Value, &[Value], &Kwargs) -> Result<Value>;

/// One entry of the builtin function registry.
pub struct BuiltinDef {
    pub name: &'static str,
    pub(crate) fcn: BuiltinFcn,
}

impl fmt::Debug for BuiltinDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinDef").field("name", &self.name).finish()
    }
}

/// A builtin method bound to its receiver.
#[derive(Debug)]
pub struct BoundMethod {
    pub name: &'static str,
    pub recv: Value,
    pub(crate) fcn: MethodFcn,
}

pub(crate) type Registry = HashMap<&'static str, BuiltinDef>;
pub(crate) type MethodTable = HashMap<&'static str, MethodFcn>;

#[rustfmt::skip]
lazy_static! {
    pub(crate) static ref BUILTINS: Registry = {
        let mut m: Registry = Registry::new();
        numbers::register(&mut m);
        aggregates::register(&mut m);
        conversions::register(&mut m);
        types::register(&mut m);
        sequences::register(&mut m);
        io::register(&mut m);
        m
    };
}

const CLASSES: [(&str, Class); 17] = [
    ("bool", Class::Bool),
    ("int", Class::Int),
    ("float", Class::Float),
    ("str", Class::Str),
    ("bytes", Class::Bytes),
    ("list", Class::List),
    ("tuple", Class::Tuple),
    ("dict", Class::Dict),
    ("set", Class::Set),
    ("frozenset", Class::FrozenSet),
    ("range", Class::Range),
    ("slice", Class::Slice),
    ("enumerate", Class::Enumerate),
    ("reversed", Class::Reversed),
    ("zip", Class::Zip),
    ("object", Class::Object),
    ("type", Class::Type),
];

/// Resolves a name against the builtin registry: functions first, then
/// type objects, then the exception hierarchy.
pub(crate) fn lookup_name(name: &str) -> Option<Value> {
    if let Some(def) = BUILTINS.get(name) {
        return Some(Value::Builtin(def));
    }
    if let Some((_, class)) = CLASSES.iter().find(|(n, _)| *n == name) {
        return Some(Value::Class(*class));
    }
    crate::exceptions::ExcType::from_name(name).map(|t| Value::Class(Class::Exc(t)))
}

/// Attribute access against the fixed per-type attribute tables.
pub(crate) fn lookup_attr(vm: &mut Interpreter, obj: &Value, name: &str) -> Result<Value> {
    let method = |table: &MethodTable, obj: &Value, name: &str| -> Result<Value> {
        match table.get_key_value(name) {
            Some((key, fcn)) => Ok(Value::BoundMethod(crate::Rc::new(BoundMethod {
                name: *key,
                recv: obj.clone(),
                fcn: *fcn,
            }))),
            None => Err(attribute_error(obj.type_name(), name)),
        }
    };
    match obj {
        Value::Slice(s) => match name {
            "start" => Ok(s.start.clone().unwrap_or(Value::None)),
            "stop" => Ok(s.stop.clone().unwrap_or(Value::None)),
            "step" => Ok(s.step.clone().unwrap_or(Value::None)),
            _ => Err(attribute_error("slice", name)),
        },
        Value::Exception(e) => match name {
            "args" => Ok(e.args_tuple()),
            _ => Err(attribute_error(obj.type_name(), name)),
        },
        Value::Module(id) => modules::module_attr(*id, name),
        Value::Path(_) => pathlib::lookup_attr(vm, obj, name),
        Value::Str(_) => method(&strings::METHODS, obj, name),
        Value::Bytes(_) => method(&strings::BYTES_METHODS, obj, name),
        Value::List(_) => method(&arrays::LIST_METHODS, obj, name),
        Value::Tuple(_) => method(&arrays::TUPLE_METHODS, obj, name),
        Value::Dict(_) => method(&objects::METHODS, obj, name),
        Value::Set(_) => method(&sets::SET_METHODS, obj, name),
        Value::FrozenSet(_) => method(&sets::FROZEN_METHODS, obj, name),
        other => Err(attribute_error(other.type_name(), name)),
    }
}
