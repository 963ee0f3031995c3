// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The restricted module table: `os`, `sys`, `pathlib`.
//!
//! `os.getenv` reads the sandboxed environment map supplied by the host;
//! the real process environment is never consulted.

use crate::builtins::utils::{ensure_args_range, only_kwargs};
use crate::builtins::{BuiltinDef, Kwargs};
use crate::exceptions::{raise, ExcType, Raised, Result};
use crate::interpreter::Interpreter;
use crate::value::{Class, ModuleId, StreamKind, Value};

use lazy_static::lazy_static;

lazy_static! {
    static ref GETENV: BuiltinDef = BuiltinDef {
        name: "getenv",
        fcn: getenv,
    };
}

pub(crate) fn import_module(name: &str) -> Result<Value> {
    match ModuleId::from_name(name) {
        Some(id) => Ok(Value::Module(id)),
        None => Err(raise(
            ExcType::ModuleNotFoundError,
            format!("No module named '{name}'"),
        )),
    }
}

pub(crate) fn import_from(_vm: &mut Interpreter, module: &str, name: &str) -> Result<Value> {
    let id = match ModuleId::from_name(module) {
        Some(id) => id,
        None => {
            return Err(raise(
                ExcType::ModuleNotFoundError,
                format!("No module named '{module}'"),
            ))
        }
    };
    module_attr(id, name).map_err(|_| {
        raise(
            ExcType::ImportError,
            format!("cannot import name '{name}' from '{module}'"),
        )
    })
}

pub(crate) fn module_attr(id: ModuleId, name: &str) -> Result<Value> {
    match (id, name) {
        (ModuleId::Os, "getenv") => Ok(Value::Builtin(&GETENV)),
        (ModuleId::Sys, "stdout") => Ok(Value::TextStream(StreamKind::Stdout)),
        (ModuleId::Sys, "stderr") => Ok(Value::TextStream(StreamKind::Stderr)),
        (ModuleId::Pathlib, "Path" | "PurePosixPath" | "PosixPath") => {
            Ok(Value::Class(Class::PosixPath))
        }
        (id, name) => Err(attribute_error_for_module(id, name)),
    }
}

fn attribute_error_for_module(id: ModuleId, name: &str) -> Raised {
    raise(
        ExcType::AttributeError,
        format!("module '{}' has no attribute '{name}'", id.name()),
    )
}

fn getenv(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("getenv", args, 1, 2)?;
    only_kwargs("getenv", kwargs, &["default"])?;
    let name = match &args[0] {
        Value::Str(s) => s.clone(),
        other => {
            return Err(crate::exceptions::type_error(format!(
                "str expected, not {}",
                other.type_name()
            )))
        }
    };
    let default = match (args.get(1), kwargs.get("default")) {
        (Some(v), None) | (None, Some(v)) => v.clone(),
        _ => Value::None,
    };
    Ok(match vm.env.get(&*name) {
        Some(v) => Value::from(v.as_str()),
        None => default,
    })
}
