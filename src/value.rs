// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::pathlib::PurePath;
use crate::builtins::{BoundMethod, BuiltinDef};
use crate::exceptions::{raise, Exc, ExcType, Result};
use crate::number;
use crate::Rc;

use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use indexmap::{IndexMap, IndexSet};
use serde::de::{self, Deserializer, MapAccess, SeqAccess};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

// Comparisons and reprs walk container structure recursively; cycles are
// caught by pointer identity, pathological depth by this bound.
const MAX_RECURSION: usize = 500;

/// A script value.
///
/// Immutable variants share their payload behind `Rc`; mutable containers
/// (`List`, `Dict`, `Set`, `Iterator`) add a `RefCell` and carry identity
/// via their allocation address. Cloning a `Value` is always cheap and
/// never copies container contents.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<IndexMap<Value, Value>>>),
    Set(Rc<RefCell<IndexSet<Value>>>),
    FrozenSet(Rc<IndexSet<Value>>),
    Range(Rc<RangeValue>),
    Slice(Rc<SliceValue>),
    Iterator(Rc<RefCell<IterValue>>),
    Builtin(&'static BuiltinDef),
    BoundMethod(Rc<BoundMethod>),
    Class(Class),
    Exception(Exc),
    Module(ModuleId),
    /// A user-defined `def` or `lambda`. Parsed and bindable, but calling
    /// one raises `TypeError` (user-defined bodies do not execute).
    Function(Rc<FunctionDef>),
    /// A host-declared name whose invocation suspends the evaluator.
    ExternalFunction(Rc<str>),
    Path(Rc<PurePath>),
    TextStream(StreamKind),
    /// A featureless `object()` instance; only identity distinguishes it.
    Object(Rc<()>),
}

/// `range(start, stop, step)` with a non-zero step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start, self.stop, self.step);
        let span = if step > 0 {
            stop.saturating_sub(start)
        } else {
            start.saturating_sub(stop)
        };
        if span <= 0 {
            0
        } else {
            let step = step.unsigned_abs();
            ((span as u64 - 1) / step + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nth(&self, i: usize) -> Option<i64> {
        if i < self.len() {
            Some(self.start + self.step * i as i64)
        } else {
            None
        }
    }
}

/// `slice(start, stop, step)`; members may be any value and are validated
/// only when the slice is applied to a sequence.
#[derive(Debug, Clone)]
pub struct SliceValue {
    pub start: Option<Value>,
    pub stop: Option<Value>,
    pub step: Option<Value>,
}

/// Opaque iterator state; stepped by the evaluator.
#[derive(Debug)]
pub enum IterValue {
    List {
        list: Rc<RefCell<Vec<Value>>>,
        pos: usize,
    },
    Tuple {
        items: Rc<[Value]>,
        pos: usize,
    },
    Str {
        s: Rc<str>,
        pos: usize,
    },
    Bytes {
        b: Rc<[u8]>,
        pos: usize,
    },
    Range {
        range: RangeValue,
        emitted: usize,
    },
    /// Dict/set iteration over keys materialized at iterator creation.
    Keys {
        kind: &'static str,
        keys: Vec<Value>,
        pos: usize,
    },
    Enumerate {
        inner: Rc<RefCell<IterValue>>,
        count: i64,
    },
    Zip {
        iters: Vec<Rc<RefCell<IterValue>>>,
    },
    Reversed {
        items: Vec<Value>,
        pos: usize,
    },
    Filter {
        predicate: Option<Box<Value>>,
        inner: Rc<RefCell<IterValue>>,
    },
}

impl IterValue {
    pub fn kind(&self) -> &'static str {
        match self {
            IterValue::List { .. } => "list_iterator",
            IterValue::Tuple { .. } => "tuple_iterator",
            IterValue::Str { .. } => "str_iterator",
            IterValue::Bytes { .. } => "bytes_iterator",
            IterValue::Range { .. } => "range_iterator",
            IterValue::Keys { kind, .. } => kind,
            IterValue::Enumerate { .. } => "enumerate",
            IterValue::Zip { .. } => "zip",
            IterValue::Reversed { .. } => "reversed",
            IterValue::Filter { .. } => "filter",
        }
    }
}

/// Built-in type objects exposed to scripts as callables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    Object,
    Type,
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Tuple,
    List,
    Dict,
    Set,
    FrozenSet,
    Range,
    Slice,
    Enumerate,
    Reversed,
    Zip,
    Filter,
    Function,
    Module,
    TextIOWrapper,
    PosixPath,
    Exc(ExcType),
}

impl Class {
    pub const fn name(self) -> &'static str {
        use Class::*;
        match self {
            Object => "object",
            Type => "type",
            NoneType => "NoneType",
            Bool => "bool",
            Int => "int",
            Float => "float",
            Str => "str",
            Bytes => "bytes",
            Tuple => "tuple",
            List => "list",
            Dict => "dict",
            Set => "set",
            FrozenSet => "frozenset",
            Range => "range",
            Slice => "slice",
            Enumerate => "enumerate",
            Reversed => "reversed",
            Zip => "zip",
            Filter => "filter",
            Function => "function",
            Module => "module",
            TextIOWrapper => "_io.TextIOWrapper",
            PosixPath => "PosixPath",
            Exc(t) => t.name(),
        }
    }
}

/// The restricted module table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Os,
    Sys,
    Pathlib,
}

impl ModuleId {
    pub const fn name(self) -> &'static str {
        match self {
            ModuleId::Os => "os",
            ModuleId::Sys => "sys",
            ModuleId::Pathlib => "pathlib",
        }
    }

    pub fn from_name(name: &str) -> Option<ModuleId> {
        match name {
            "os" => Some(ModuleId::Os),
            "sys" => Some(ModuleId::Sys),
            "pathlib" => Some(ModuleId::Pathlib),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub const fn stream_name(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// An inert user-defined function object.
#[derive(Debug)]
pub struct FunctionDef {
    pub name: Rc<str>,
}

impl Value {
    pub fn new_list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn new_dict(map: IndexMap<Value, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(map)))
    }

    pub fn new_set(items: IndexSet<Value>) -> Value {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn new_tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items.into())
    }

    pub fn empty_tuple() -> Value {
        Value::Tuple(Rc::from([] as [Value; 0]))
    }

    /// The script-visible type name, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Range(_) => "range",
            Value::Slice(_) => "slice",
            Value::Iterator(it) => it.borrow().kind(),
            Value::Builtin(_) => "builtin_function_or_method",
            Value::BoundMethod(_) => "builtin_function_or_method",
            Value::Class(_) => "type",
            Value::Exception(e) => e.class().name(),
            Value::Module(_) => "module",
            Value::Function(_) => "function",
            Value::ExternalFunction(_) => "function",
            Value::Path(_) => "PosixPath",
            Value::TextStream(_) => "_io.TextIOWrapper",
            Value::Object(_) => "object",
        }
    }

    /// The type object `type(x)` evaluates to.
    pub fn class(&self) -> Class {
        match self {
            Value::None => Class::NoneType,
            Value::Bool(_) => Class::Bool,
            Value::Int(_) => Class::Int,
            Value::Float(_) => Class::Float,
            Value::Str(_) => Class::Str,
            Value::Bytes(_) => Class::Bytes,
            Value::Tuple(_) => Class::Tuple,
            Value::List(_) => Class::List,
            Value::Dict(_) => Class::Dict,
            Value::Set(_) => Class::Set,
            Value::FrozenSet(_) => Class::FrozenSet,
            Value::Range(_) => Class::Range,
            Value::Slice(_) => Class::Slice,
            Value::Iterator(it) => match &*it.borrow() {
                IterValue::Enumerate { .. } => Class::Enumerate,
                IterValue::Zip { .. } => Class::Zip,
                IterValue::Reversed { .. } => Class::Reversed,
                IterValue::Filter { .. } => Class::Filter,
                _ => Class::Object,
            },
            Value::Builtin(_) | Value::BoundMethod(_) => Class::Function,
            Value::Class(_) => Class::Type,
            Value::Exception(e) => Class::Exc(e.class()),
            Value::Module(_) => Class::Module,
            Value::Function(_) | Value::ExternalFunction(_) => Class::Function,
            Value::Path(_) => Class::PosixPath,
            Value::TextStream(_) => Class::TextIOWrapper,
            Value::Object(_) => Class::Object,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::FrozenSet(s) => !s.is_empty(),
            Value::Range(r) => !r.is_empty(),
            _ => true,
        }
    }

    /// Length of sized containers, `None` for unsized values.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::Tuple(t) => Some(t.len()),
            Value::List(l) => Some(l.borrow().len()),
            Value::Dict(d) => Some(d.borrow().len()),
            Value::Set(s) => Some(s.borrow().len()),
            Value::FrozenSet(s) => Some(s.len()),
            Value::Range(r) => Some(r.len()),
            _ => None,
        }
    }

    /// Whether the value may be used as a dict/set key.
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::List(_)
            | Value::Dict(_)
            | Value::Set(_)
            | Value::Iterator(_)
            | Value::Slice(_) => false,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }

    pub fn check_hashable(&self) -> Result<()> {
        if self.is_hashable() {
            Ok(())
        } else {
            Err(raise(
                ExcType::TypeError,
                format!("unhashable type: '{}'", self.type_name()),
            ))
        }
    }

    /// Address used for identity (`is`, `id`) of reference-backed values.
    pub fn address(&self) -> Option<usize> {
        match self {
            Value::Str(p) => Some(Rc::as_ptr(p) as *const u8 as usize),
            Value::Bytes(p) => Some(Rc::as_ptr(p) as *const u8 as usize),
            Value::Tuple(p) => Some(Rc::as_ptr(p) as *const u8 as usize),
            Value::List(p) => Some(Rc::as_ptr(p) as usize),
            Value::Dict(p) => Some(Rc::as_ptr(p) as usize),
            Value::Set(p) => Some(Rc::as_ptr(p) as usize),
            Value::FrozenSet(p) => Some(Rc::as_ptr(p) as *const u8 as usize),
            Value::Range(p) => Some(Rc::as_ptr(p) as usize),
            Value::Slice(p) => Some(Rc::as_ptr(p) as usize),
            Value::Iterator(p) => Some(Rc::as_ptr(p) as usize),
            Value::BoundMethod(p) => Some(Rc::as_ptr(p) as usize),
            Value::Exception(p) => Some(Rc::as_ptr(p) as usize),
            Value::Function(p) => Some(Rc::as_ptr(p) as usize),
            Value::ExternalFunction(p) => Some(Rc::as_ptr(p) as *const u8 as usize),
            Value::Path(p) => Some(Rc::as_ptr(p) as usize),
            Value::Builtin(d) => Some(*d as *const BuiltinDef as usize),
            Value::Object(p) => Some(Rc::as_ptr(p) as usize),
            _ => None,
        }
    }

    /// Identity comparison (`is`). Singletons compare by value, reference
    /// values by address.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::TextStream(a), Value::TextStream(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => match (self.address(), other.address()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    pub fn repr_str(&self) -> String {
        let mut visited = Vec::new();
        self.repr_impl(&mut visited, 0)
    }

    /// `str()` semantics: identity for strings, message form for
    /// exceptions, `repr` for everything else.
    pub fn str_value(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(e) => e.message(),
            Value::Path(p) => p.as_posix(),
            _ => self.repr_str(),
        }
    }

    fn repr_impl(&self, visited: &mut Vec<usize>, depth: usize) -> String {
        if depth > MAX_RECURSION {
            return "...".to_string();
        }
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => number::float_repr(*f),
            Value::Str(s) => repr_string(s),
            Value::Bytes(b) => repr_bytes(b),
            Value::Tuple(items) => self.with_visited(visited, |visited| match items.len() {
                0 => "()".to_string(),
                1 => format!("({},)", items[0].repr_impl(visited, depth + 1)),
                _ => {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|v| v.repr_impl(visited, depth + 1))
                        .collect();
                    format!("({})", parts.join(", "))
                }
            }),
            Value::List(items) => self.with_visited(visited, |visited| {
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|v| v.repr_impl(visited, depth + 1))
                    .collect();
                format!("[{}]", parts.join(", "))
            }),
            Value::Dict(map) => self.with_visited(visited, |visited| {
                let parts: Vec<String> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| {
                        format!(
                            "{}: {}",
                            k.repr_impl(visited, depth + 1),
                            v.repr_impl(visited, depth + 1)
                        )
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }),
            Value::Set(items) => self.with_visited(visited, |visited| {
                let items = items.borrow();
                if items.is_empty() {
                    "set()".to_string()
                } else {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|v| v.repr_impl(visited, depth + 1))
                        .collect();
                    format!("{{{}}}", parts.join(", "))
                }
            }),
            Value::FrozenSet(items) => self.with_visited(visited, |visited| {
                if items.is_empty() {
                    "frozenset()".to_string()
                } else {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|v| v.repr_impl(visited, depth + 1))
                        .collect();
                    format!("frozenset({{{}}})", parts.join(", "))
                }
            }),
            Value::Range(r) => {
                if r.step == 1 {
                    format!("range({}, {})", r.start, r.stop)
                } else {
                    format!("range({}, {}, {})", r.start, r.stop, r.step)
                }
            }
            Value::Slice(s) => {
                let part = |v: &Option<Value>, visited: &mut Vec<usize>| match v {
                    Some(v) => v.repr_impl(visited, depth + 1),
                    None => "None".to_string(),
                };
                let start = part(&s.start, visited);
                let stop = part(&s.stop, visited);
                let step = part(&s.step, visited);
                format!("slice({start}, {stop}, {step})")
            }
            Value::Iterator(it) => {
                let ptr = Rc::as_ptr(it) as usize;
                format!("<{} object at {:#x}>", it.borrow().kind(), ptr)
            }
            Value::Builtin(def) => format!("<built-in function {}>", def.name),
            Value::BoundMethod(m) => format!(
                "<built-in method {} of {} object at {:#x}>",
                m.name,
                m.recv.type_name(),
                m.recv.address().unwrap_or(0)
            ),
            Value::Class(c) => format!("<class '{}'>", c.name()),
            Value::Exception(e) => {
                let parts: Vec<String> = e
                    .args()
                    .iter()
                    .map(|v| v.repr_impl(visited, depth + 1))
                    .collect();
                format!("{}({})", e.class().name(), parts.join(", "))
            }
            Value::Module(m) => format!("<module '{}'>", m.name()),
            Value::Function(f) => {
                format!("<function {} at {:#x}>", f.name, Rc::as_ptr(f) as usize)
            }
            Value::ExternalFunction(name) => format!("<external function {name}>"),
            Value::Object(p) => format!("<object object at {:#x}>", Rc::as_ptr(p) as usize),
            Value::Path(p) => format!("PosixPath({})", repr_string(&p.as_posix())),
            Value::TextStream(kind) => format!(
                "<_io.TextIOWrapper name='<{}>' mode='w' encoding='utf-8'>",
                kind.stream_name()
            ),
        }
    }

    fn with_visited<F: FnOnce(&mut Vec<usize>) -> String>(
        &self,
        visited: &mut Vec<usize>,
        f: F,
    ) -> String {
        let addr = match self.address() {
            Some(addr) => addr,
            None => return f(visited),
        };
        if visited.contains(&addr) {
            return match self {
                Value::List(_) => "[...]".to_string(),
                Value::Tuple(_) => "(...)".to_string(),
                _ => "{...}".to_string(),
            };
        }
        visited.push(addr);
        let out = f(visited);
        visited.pop();
        out
    }
}

/// String repr with source-language quote selection and escapes.
pub fn repr_string(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub fn repr_bytes(b: &[u8]) -> String {
    let mut out = String::with_capacity(b.len() + 3);
    out.push_str("b'");
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push('\'');
    out
}

/// Structural equality with the numeric tower (`Bool`, `Int`, `Float`
/// cross-compare numerically).
///
/// Fails with `RecursionError` on pathological nesting depth; cycles are
/// handled by identity short-circuiting.
pub fn eq_values(a: &Value, b: &Value, depth: usize) -> Result<bool> {
    if depth > MAX_RECURSION {
        return Err(raise(
            ExcType::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    if a.is_same(b) {
        // NaN still compares unequal to itself through `==`.
        if let Value::Float(x) = a {
            return Ok(!x.is_nan());
        }
        return Ok(true);
    }
    Ok(match (a, b) {
        (
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
        ) => number::eq(a, b),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) => eq_slices(x, y, depth)?,
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            eq_slices(&x, &y, depth)?
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            if x.len() != y.len() {
                return Ok(false);
            }
            for (k, v) in x.iter() {
                match y.get(k) {
                    Some(w) if eq_values(v, w, depth + 1)? => {}
                    _ => return Ok(false),
                }
            }
            true
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().all(|v| y.contains(v))
        }
        (Value::FrozenSet(x), Value::FrozenSet(y)) => {
            x.len() == y.len() && x.iter().all(|v| y.contains(v))
        }
        (Value::Set(x), Value::FrozenSet(y)) => {
            let x = x.borrow();
            x.len() == y.len() && x.iter().all(|v| y.contains(v))
        }
        (Value::FrozenSet(x), Value::Set(y)) => {
            let y = y.borrow();
            x.len() == y.len() && x.iter().all(|v| y.contains(v))
        }
        (Value::Range(x), Value::Range(y)) => {
            // Ranges compare as the sequences they denote.
            x.len() == y.len()
                && (x.is_empty() || (x.start == y.start && (x.len() == 1 || x.step == y.step)))
        }
        (Value::Class(x), Value::Class(y)) => x == y,
        (Value::Path(x), Value::Path(y)) => x == y,
        (Value::None, Value::None) => true,
        _ => false,
    })
}

fn eq_slices(a: &[Value], b: &[Value], depth: usize) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b.iter()) {
        if !eq_values(x, y, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Ordering where the source language defines it; `TypeError` otherwise.
pub fn cmp_values(a: &Value, b: &Value, depth: usize) -> Result<Ordering> {
    if depth > MAX_RECURSION {
        return Err(raise(
            ExcType::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    match (a, b) {
        (
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
        ) => number::cmp(a, b),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Ok(x.cmp(y)),
        (Value::Tuple(x), Value::Tuple(y)) => cmp_slices(x, y, depth),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            cmp_slices(&x, &y, depth)
        }
        _ => Err(raise(
            ExcType::TypeError,
            format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ),
        )),
    }
}

fn cmp_slices(a: &[Value], b: &[Value], depth: usize) -> Result<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        if !eq_values(x, y, depth + 1)? {
            return cmp_values(x, y, depth + 1);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

// Trait equality is the total, key-usable relation: structural like
// `eq_values` but reflexive (NaN keys match themselves). Used by the
// insertion-ordered maps and by tests.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if let (Value::Float(a), Value::Float(b)) = (self, other) {
            if a.is_nan() && b.is_nan() {
                return true;
            }
        }
        if self.is_same(other) {
            return true;
        }
        eq_values(self, other, 0).unwrap_or(false)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::None => 0u8.hash(state),
            // The numeric tower hashes consistently across Bool/Int/Float.
            Value::Bool(b) => (*b as i64).hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    (*f as i64).hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Value::Str(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Tuple(items) => {
                1u8.hash(state);
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Value::FrozenSet(items) => {
                // Order-insensitive combination.
                let mut acc: u64 = 0;
                for item in items.iter() {
                    let mut h = std::collections::hash_map::DefaultHasher::new();
                    item.hash(&mut h);
                    acc = acc.wrapping_add(h.finish());
                }
                acc.hash(state);
            }
            Value::Range(r) => r.hash(state),
            Value::Class(c) => c.hash(state),
            Value::Module(m) => m.hash(state),
            Value::TextStream(k) => k.hash(state),
            Value::Path(p) => p.as_posix().hash(state),
            other => other.address().unwrap_or(0).hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr_str())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::new_list(items)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::None => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::List(items) => {
                let items = items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(map) => {
                let map = map.borrow();
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    match k {
                        Value::Str(_) => out.serialize_entry(k, v)?,
                        other => out.serialize_entry(&other.repr_str(), v)?,
                    }
                }
                out.end()
            }
            Value::Set(items) => {
                let items = items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::FrozenSet(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            other => serializer.serialize_str(&other.repr_str()),
        }
    }
}

struct ValueVisitor;

impl<'de> de::Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a json value")
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::None)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::None)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E>
    where
        E: de::Error,
    {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| E::custom("integer out of range"))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::new_list(items))
    }

    fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = IndexMap::new();
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
            map.insert(Value::from(k), v);
        }
        Ok(Value::new_dict(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl Value {
    pub fn from_json_str(json: &str) -> anyhow::Result<Value> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_str(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_tower_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_eq!(Value::Bool(false), Value::Float(0.0));
        assert_ne!(Value::Int(1), Value::Int(2));
        assert_ne!(Value::Int(1), Value::from("1"));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::new_list(vec![]).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::new_list(vec![Value::None]).is_truthy());
    }

    #[test]
    fn repr_forms() {
        assert_eq!(Value::None.repr_str(), "None");
        assert_eq!(Value::Bool(true).repr_str(), "True");
        assert_eq!(Value::Float(1.0).repr_str(), "1.0");
        assert_eq!(Value::from("it's").repr_str(), "\"it's\"");
        assert_eq!(Value::from("a\nb").repr_str(), "'a\\nb'");
        assert_eq!(Value::new_tuple(vec![Value::Int(1)]).repr_str(), "(1,)");
        assert_eq!(
            Value::new_list(vec![Value::Int(1), Value::from("x")]).repr_str(),
            "[1, 'x']"
        );
        assert_eq!(Value::new_set(IndexSet::new()).repr_str(), "set()");
        assert_eq!(
            Value::Range(Rc::new(RangeValue {
                start: 0,
                stop: 5,
                step: 1
            }))
            .repr_str(),
            "range(0, 5)"
        );
        assert_eq!(Value::Bytes(Rc::from(&b"a\x00"[..])).repr_str(), "b'a\\x00'");
    }

    #[test]
    fn cyclic_repr() {
        let list = Rc::new(RefCell::new(vec![Value::Int(1)]));
        let value = Value::List(list.clone());
        list.borrow_mut().push(value.clone());
        assert_eq!(value.repr_str(), "[1, [...]]");
    }

    #[test]
    fn identity_of_mutables() {
        let a = Value::new_list(vec![]);
        let b = Value::new_list(vec![]);
        assert!(a.is_same(&a.clone()));
        assert!(!a.is_same(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn hashing_follows_tower() {
        use std::collections::hash_map::DefaultHasher;
        fn h(v: &Value) -> u64 {
            let mut state = DefaultHasher::new();
            v.hash(&mut state);
            state.finish()
        }
        assert_eq!(h(&Value::Int(1)), h(&Value::Float(1.0)));
        assert_eq!(h(&Value::Int(1)), h(&Value::Bool(true)));
        assert!(Value::new_list(vec![]).check_hashable().is_err());
        assert!(Value::new_tuple(vec![Value::new_list(vec![])])
            .check_hashable()
            .is_err());
        assert!(Value::new_tuple(vec![Value::Int(1)])
            .check_hashable()
            .is_ok());
    }

    #[test]
    fn ordering_rules() {
        assert_eq!(
            cmp_values(&Value::Int(1), &Value::Float(1.5), 0).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            cmp_values(&Value::from("a"), &Value::from("b"), 0).unwrap(),
            Ordering::Less
        );
        let err = cmp_values(&Value::Int(1), &Value::from("a"), 0).unwrap_err();
        let exc = &err;
        assert_eq!(exc.class(), ExcType::TypeError);
        assert_eq!(
            exc.message(),
            "'<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn range_len() {
        let r = |start, stop, step| RangeValue { start, stop, step };
        assert_eq!(r(0, 5, 1).len(), 5);
        assert_eq!(r(0, 5, 2).len(), 3);
        assert_eq!(r(5, 0, -1).len(), 5);
        assert_eq!(r(0, 0, 1).len(), 0);
        assert_eq!(r(5, 0, 1).len(), 0);
    }

    #[test]
    fn json_round_trip() {
        let v = Value::from_json_str(r#"{"a": [1, 2.5, "x", null, true]}"#).unwrap();
        assert_eq!(v.repr_str(), "{'a': [1, 2.5, 'x', None, True]}");
        assert_eq!(
            Value::new_tuple(vec![Value::Int(1), Value::Int(2)])
                .to_json_str()
                .unwrap(),
            "[1,2]"
        );
    }
}
