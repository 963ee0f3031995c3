// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The evaluation engine: an explicit-state machine over compiled
//! instructions.
//!
//! All evaluator state (operand stack, scope chain, handler blocks, the
//! exception-being-handled stack) lives in the [`Interpreter`] value
//! rather than on the Rust call stack, so execution can stop at an
//! external-function call site and continue later: suspension records the
//! pending call and returns out with every frame intact; resume pushes
//! the delivered value (or raises the delivered exception) and re-enters
//! the dispatch loop.

use crate::ast::{BinaryOp, CompareOp, UnaryOp};
use crate::builtins::{self, Kwargs};
use crate::compiler::{Instr, Program};
use crate::exceptions::{
    attribute_error, not_callable, not_iterable, raise, raise_exc, type_error, value_error, Exc,
    ExcType, ExceptionValue, Raised, Result, TracebackFrame,
};
use crate::limits::ResourceTracker;
use crate::number;
use crate::value::{
    cmp_values, eq_values, Class, IterValue, RangeValue, SliceValue, Value,
};
use crate::Rc;

use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;
use std::io::Write;

use indexmap::{IndexMap, IndexSet};

pub(crate) type Scope = HashMap<Rc<str>, Value>;

/// Where `print` output goes.
pub enum PrintTarget {
    /// The host process's stdout/stderr.
    Standard,
    Callback(PrintCallback),
}

pub type PrintCallback = Box<dyn FnMut(&str, &str)>;

impl PrintTarget {
    pub fn emit(&mut self, stream: &str, text: &str) {
        match self {
            PrintTarget::Standard => {
                if stream == "stderr" {
                    let _ = std::io::stderr().write_all(text.as_bytes());
                } else {
                    let _ = std::io::stdout().write_all(text.as_bytes());
                }
            }
            PrintTarget::Callback(callback) => callback(stream, text),
        }
    }
}

/// The call description handed to the host at a suspension point.
#[derive(Debug, Clone)]
pub(crate) struct PendingCall {
    pub function: Rc<str>,
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

/// Terminal state of one `start`/`resume` invocation.
pub(crate) enum Outcome {
    Complete(Value),
    Suspended(PendingCall),
}

/// An active exception-handler region.
#[derive(Debug, Clone, Copy)]
struct Block {
    handler: usize,
    stack_len: usize,
    scope_len: usize,
    handled_len: usize,
}

enum Flow {
    Next,
    Jump(usize),
    Return(Value),
    Suspend(PendingCall),
}

enum Called {
    Value(Value),
    Suspend(PendingCall),
}

#[derive(Default)]
struct IdTable {
    map: HashMap<usize, i64>,
    next: i64,
}

impl IdTable {
    fn id_of(&mut self, v: &Value) -> i64 {
        match v.address() {
            Some(addr) => {
                let next = &mut self.next;
                *self.map.entry(addr).or_insert_with(|| {
                    *next += 16;
                    0x7f00_0000_0000 + *next
                })
            }
            None => {
                use core::hash::{Hash, Hasher};
                let mut h = std::collections::hash_map::DefaultHasher::new();
                v.hash(&mut h);
                (h.finish() as i64).unsigned_abs() as i64 & 0x3fff_ffff_ffff
            }
        }
    }
}

pub(crate) struct Interpreter {
    program: Rc<Program>,
    ip: usize,
    stack: Vec<Value>,
    blocks: Vec<Block>,
    scopes: Vec<Scope>,
    /// Exceptions currently being handled, innermost last.
    handled: Vec<Exc>,
    /// Exception in flight between unwinding and `PushHandled`.
    unwound: Option<Exc>,
    pub(crate) tracker: ResourceTracker,
    pub(crate) print: PrintTarget,
    pub(crate) env: Rc<IndexMap<String, String>>,
    ids: IdTable,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("script", &self.program.script_name)
            .field("ip", &self.ip)
            .field("stack_depth", &self.stack.len())
            .finish()
    }
}

impl Interpreter {
    pub fn new(
        program: Rc<Program>,
        tracker: ResourceTracker,
        print: PrintTarget,
        env: Rc<IndexMap<String, String>>,
    ) -> Self {
        Self {
            program,
            ip: 0,
            stack: vec![],
            blocks: vec![],
            scopes: vec![Scope::new()],
            handled: vec![],
            unwound: None,
            tracker,
            print,
            env,
            ids: IdTable::default(),
        }
    }

    /// Binds a name in the module scope before execution starts.
    pub fn bind_global(&mut self, name: &str, value: Value) {
        self.scopes[0].insert(Rc::from(name), value);
    }

    pub fn run(&mut self) -> Result<Outcome, Exc> {
        self.tracker.reset_steps();
        self.dispatch()
    }

    pub fn resume_value(&mut self, value: Value) -> Result<Outcome, Exc> {
        self.tracker.reset_steps();
        self.stack.push(value);
        self.dispatch()
    }

    pub fn resume_exception(&mut self, exc: Exc) -> Result<Outcome, Exc> {
        self.tracker.reset_steps();
        // The exception surfaces at the call site; `ip` already points
        // past the call instruction.
        let call_ip = self.ip.saturating_sub(1);
        self.handle_raise(raise_exc(exc), call_ip)?;
        self.dispatch()
    }

    fn dispatch(&mut self) -> Result<Outcome, Exc> {
        loop {
            let instr = match self.program.instrs.get(self.ip) {
                Some(instr) => instr.clone(),
                None => return Ok(Outcome::Complete(Value::None)),
            };
            let stepped = self.tracker.step();
            let flow = match stepped {
                Ok(()) => self.execute(&instr),
                Err(e) => Err(e),
            };
            match flow {
                Ok(Flow::Next) => self.ip += 1,
                Ok(Flow::Jump(target)) => self.ip = target,
                Ok(Flow::Return(value)) => return Ok(Outcome::Complete(value)),
                Ok(Flow::Suspend(call)) => {
                    self.ip += 1;
                    return Ok(Outcome::Suspended(call));
                }
                Err(err) => {
                    let ip = self.ip;
                    self.handle_raise(err, ip)?;
                }
            }
        }
    }

    /// Routes a raised exception: attaches the traceback frame, records
    /// implicit context, then either jumps to the innermost handler or
    /// propagates out as a fault.
    fn handle_raise(&mut self, err: Raised, at_ip: usize) -> core::result::Result<(), Exc> {
        let exc = err.0;
        let line = self.program.lines.get(at_ip).copied().unwrap_or(0);
        exc.push_frame(TracebackFrame {
            script: self.program.script_name.clone(),
            line,
            text: self.program.source.line_text(line).to_string(),
        });
        if let Some(active) = self.handled.last() {
            if !Rc::ptr_eq(active, &exc) {
                exc.set_context(active.clone());
            }
        }
        match self.blocks.pop() {
            Some(block) => {
                self.stack.truncate(block.stack_len);
                self.scopes.truncate(block.scope_len);
                self.handled.truncate(block.handled_len);
                self.unwound = Some(exc);
                self.ip = block.handler;
                Ok(())
            }
            None => Err(exc),
        }
    }

    fn alloc(&mut self) -> Result<()> {
        self.tracker.allocate()
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len() - n;
        self.stack.split_off(at)
    }

    fn execute(&mut self, instr: &Instr) -> Result<Flow> {
        match instr {
            Instr::LoadConst(i) => {
                let v = self.program.consts[*i as usize].clone();
                self.stack.push(v);
            }
            Instr::LoadName(i) => {
                let name = self.program.names[*i as usize].clone();
                let v = self.load_name(&name)?;
                self.stack.push(v);
            }
            Instr::StoreName(i) => {
                let name = self.program.names[*i as usize].clone();
                let v = self.pop();
                self.scopes
                    .last_mut()
                    .expect("module scope present")
                    .insert(name, v);
            }
            Instr::DeleteName(i) => {
                let name = self.program.names[*i as usize].clone();
                let mut removed = false;
                for scope in self.scopes.iter_mut().rev() {
                    if scope.remove(&name).is_some() {
                        removed = true;
                        break;
                    }
                }
                if !removed {
                    return Err(crate::exceptions::name_error(&name));
                }
            }
            Instr::LoadAttr(i) => {
                let name = self.program.names[*i as usize].clone();
                let obj = self.pop();
                let v = builtins::lookup_attr(self, &obj, &name)?;
                self.stack.push(v);
            }
            Instr::StoreAttr(i) | Instr::DeleteAttr(i) => {
                let name = self.program.names[*i as usize].clone();
                let obj = self.pop();
                if matches!(instr, Instr::StoreAttr(_)) {
                    self.pop();
                }
                return Err(attribute_error(obj.type_name(), &name));
            }
            Instr::LoadSubscript => {
                let index = self.pop();
                let obj = self.pop();
                let v = self.subscript_load(&obj, &index)?;
                self.stack.push(v);
            }
            Instr::StoreSubscript => {
                let index = self.pop();
                let obj = self.pop();
                let value = self.pop();
                self.subscript_store(&obj, index, value)?;
            }
            Instr::DeleteSubscript => {
                let index = self.pop();
                let obj = self.pop();
                self.subscript_delete(&obj, &index)?;
            }
            Instr::Pop => {
                self.pop();
            }
            Instr::Dup => {
                let v = self.stack.last().expect("operand stack underflow").clone();
                self.stack.push(v);
            }
            Instr::Dup2 => {
                let n = self.stack.len();
                let a = self.stack[n - 2].clone();
                let b = self.stack[n - 1].clone();
                self.stack.push(a);
                self.stack.push(b);
            }
            Instr::Rot2 => {
                let n = self.stack.len();
                self.stack.swap(n - 1, n - 2);
            }
            Instr::Rot3 => {
                let top = self.pop();
                let n = self.stack.len();
                self.stack.insert(n - 2, top);
            }
            Instr::BuildList(n) => {
                self.alloc()?;
                let items = self.pop_n(*n as usize);
                self.stack.push(Value::new_list(items));
            }
            Instr::BuildTuple(n) => {
                self.alloc()?;
                let items = self.pop_n(*n as usize);
                self.stack.push(Value::new_tuple(items));
            }
            Instr::BuildSet(n) => {
                self.alloc()?;
                let items = self.pop_n(*n as usize);
                let mut set = IndexSet::new();
                for item in items {
                    item.check_hashable()?;
                    set.insert(item);
                }
                self.stack.push(Value::new_set(set));
            }
            Instr::BuildDict(n) => {
                self.alloc()?;
                let items = self.pop_n(*n as usize * 2);
                let mut map = IndexMap::new();
                let mut iter = items.into_iter();
                while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                    k.check_hashable()?;
                    map.insert(k, v);
                }
                self.stack.push(Value::new_dict(map));
            }
            Instr::BuildSlice(n) => {
                self.alloc()?;
                let step = if *n == 3 { Some(self.pop()) } else { None };
                let stop = self.pop();
                let start = self.pop();
                let field = |v: Value| match v {
                    Value::None => None,
                    other => Some(other),
                };
                self.stack.push(Value::Slice(Rc::new(SliceValue {
                    start: field(start),
                    stop: field(stop),
                    step: step.and_then(field),
                })));
            }
            Instr::UnpackSequence(n) => {
                let v = self.pop();
                let items = self.unpack(&v, *n as usize)?;
                for item in items.into_iter().rev() {
                    self.stack.push(item);
                }
            }
            Instr::Unary(op) => {
                let v = self.pop();
                let out = self.unary_op(*op, &v)?;
                self.stack.push(out);
            }
            Instr::Binary(op) => {
                let b = self.pop();
                let a = self.pop();
                let out = self.binary_op(*op, &a, &b, false)?;
                self.stack.push(out);
            }
            Instr::BinaryInplace(op) => {
                let b = self.pop();
                let a = self.pop();
                let out = self.binary_op(*op, &a, &b, true)?;
                self.stack.push(out);
            }
            Instr::Compare(op) => {
                let b = self.pop();
                let a = self.pop();
                let out = self.compare_op(*op, &a, &b)?;
                self.stack.push(Value::Bool(out));
            }
            Instr::Jump(t) => return Ok(Flow::Jump(*t as usize)),
            Instr::PopJumpIfFalse(t) => {
                let v = self.pop();
                if !v.is_truthy() {
                    return Ok(Flow::Jump(*t as usize));
                }
            }
            Instr::PopJumpIfTrue(t) => {
                let v = self.pop();
                if v.is_truthy() {
                    return Ok(Flow::Jump(*t as usize));
                }
            }
            Instr::JumpIfFalseOrPop(t) => {
                let keep = !self.stack.last().expect("operand").is_truthy();
                if keep {
                    return Ok(Flow::Jump(*t as usize));
                }
                self.pop();
            }
            Instr::JumpIfTrueOrPop(t) => {
                let keep = self.stack.last().expect("operand").is_truthy();
                if keep {
                    return Ok(Flow::Jump(*t as usize));
                }
                self.pop();
            }
            Instr::GetIter => {
                let v = self.pop();
                let it = self.make_iter(v)?;
                self.stack.push(Value::Iterator(it));
            }
            Instr::ForIter(t) => {
                let it = match self.stack.last() {
                    Some(Value::Iterator(it)) => it.clone(),
                    other => unreachable!("for-iter over non-iterator {other:?}"),
                };
                match self.iter_next(&it)? {
                    Some(v) => self.stack.push(v),
                    None => {
                        self.pop();
                        return Ok(Flow::Jump(*t as usize));
                    }
                }
            }
            Instr::Call { argc, kwnames } => {
                let kwargs = match kwnames {
                    Some(ci) => {
                        let names = match &self.program.consts[*ci as usize] {
                            Value::Tuple(names) => names.clone(),
                            other => unreachable!("kwnames const is {other:?}"),
                        };
                        let values = self.pop_n(names.len());
                        let mut kwargs = Kwargs::new();
                        for (name, value) in names.iter().zip(values) {
                            if let Value::Str(s) = name {
                                kwargs.insert(s.to_string(), value);
                            }
                        }
                        kwargs
                    }
                    None => Kwargs::new(),
                };
                let args = self.pop_n(*argc as usize);
                let callee = self.pop();
                match self.call_value(callee, args, kwargs)? {
                    Called::Value(v) => self.stack.push(v),
                    Called::Suspend(call) => return Ok(Flow::Suspend(call)),
                }
            }
            Instr::ListAppend(depth) => {
                let v = self.pop();
                let idx = self.stack.len() - *depth as usize - 1;
                match &self.stack[idx] {
                    Value::List(list) => list.borrow_mut().push(v),
                    other => unreachable!("append target is {other:?}"),
                }
            }
            Instr::SetAdd(depth) => {
                let v = self.pop();
                v.check_hashable()?;
                let idx = self.stack.len() - *depth as usize - 1;
                match &self.stack[idx] {
                    Value::Set(set) => {
                        set.borrow_mut().insert(v);
                    }
                    other => unreachable!("set-add target is {other:?}"),
                }
            }
            Instr::MapAdd(depth) => {
                let v = self.pop();
                let k = self.pop();
                k.check_hashable()?;
                let idx = self.stack.len() - *depth as usize - 1;
                match &self.stack[idx] {
                    Value::Dict(map) => {
                        map.borrow_mut().insert(k, v);
                    }
                    other => unreachable!("map-add target is {other:?}"),
                }
            }
            Instr::EnterScope => {
                self.alloc()?;
                self.scopes.push(Scope::new());
            }
            Instr::ExitScope => {
                self.scopes.pop();
            }
            Instr::PushExcept(handler) => {
                self.blocks.push(Block {
                    handler: *handler as usize,
                    stack_len: self.stack.len(),
                    scope_len: self.scopes.len(),
                    handled_len: self.handled.len(),
                });
            }
            Instr::PopBlock => {
                self.blocks.pop();
            }
            Instr::Raise(argc) => return Err(self.make_raise(*argc)?),
            Instr::PushHandled => {
                let exc = self.unwound.take().expect("unwound exception present");
                self.handled.push(exc);
            }
            Instr::PopHandled => {
                self.handled.pop();
            }
            Instr::LoadExc => {
                let exc = self.handled.last().expect("active exception").clone();
                self.stack.push(Value::Exception(exc));
            }
            Instr::LoadExcInfo => {
                let exc = self.handled.last().expect("active exception").clone();
                self.stack.push(Value::Class(Class::Exc(exc.class())));
                self.stack.push(Value::Exception(exc));
                self.stack.push(Value::None);
            }
            Instr::CheckExcMatch => {
                let spec = self.pop();
                let exc = self.handled.last().expect("active exception").clone();
                let matched = exc_matches(&exc, &spec)?;
                self.stack.push(Value::Bool(matched));
            }
            Instr::ReRaise => {
                let exc = self.handled.pop().expect("active exception");
                return Err(raise_exc(exc));
            }
            Instr::Import(i) => {
                let name = self.program.names[*i as usize].clone();
                let module = builtins::modules::import_module(&name)?;
                self.stack.push(module);
            }
            Instr::ImportFrom { module, name } => {
                let module_name = self.program.names[*module as usize].clone();
                let attr = self.program.names[*name as usize].clone();
                let v = builtins::modules::import_from(self, &module_name, &attr)?;
                self.stack.push(v);
            }
            Instr::Return => {
                let v = self.pop();
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Next)
    }

    fn load_name(&mut self, name: &str) -> Result<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Ok(v.clone());
            }
        }
        builtins::lookup_name(name).ok_or_else(|| crate::exceptions::name_error(name))
    }

    fn make_raise(&mut self, argc: u8) -> Result<Raised> {
        match argc {
            0 => match self.handled.last() {
                Some(exc) => Ok(raise_exc(exc.clone())),
                None => Ok(raise(
                    ExcType::RuntimeError,
                    "No active exception to reraise",
                )),
            },
            1 => {
                let v = self.pop();
                let exc = to_exception(v)?;
                Ok(raise_exc(exc))
            }
            2 => {
                let cause = self.pop();
                let v = self.pop();
                let exc = to_exception(v)?;
                match cause {
                    Value::None => {
                        exc.suppress_context();
                    }
                    other => {
                        let cause = match other {
                            Value::Class(Class::Exc(t)) => ExceptionValue::new(t, vec![]),
                            Value::Exception(e) => e,
                            _ => {
                                return Ok(type_error(
                                    "exception causes must derive from BaseException",
                                ))
                            }
                        };
                        exc.set_cause(Some(cause));
                    }
                }
                Ok(raise_exc(exc))
            }
            other => unreachable!("raise argc {other}"),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn call_value(&mut self, callee: Value, args: Vec<Value>, kwargs: Kwargs) -> Result<Called> {
        match callee {
            Value::ExternalFunction(name) => Ok(Called::Suspend(PendingCall {
                function: name,
                args,
                kwargs,
            })),
            Value::Builtin(def) => {
                self.tracker.enter_call()?;
                let result = (def.fcn)(self, &args, &kwargs);
                self.tracker.exit_call();
                result.map(Called::Value)
            }
            Value::BoundMethod(method) => {
                self.tracker.enter_call()?;
                let result = (method.fcn)(self, &method.recv, &args, &kwargs);
                self.tracker.exit_call();
                result.map(Called::Value)
            }
            Value::Class(class) => {
                self.tracker.enter_call()?;
                let result = builtins::types::construct(self, class, &args, &kwargs);
                self.tracker.exit_call();
                result.map(Called::Value)
            }
            Value::Function(_) => Err(type_error(
                "calling user-defined functions is not yet supported",
            )),
            other => Err(not_callable(other.type_name())),
        }
    }

    /// Calls a value that is known not to suspend (builtins, classes,
    /// bound methods). Used by iterator predicates and builtins that take
    /// callables.
    pub(crate) fn call_simple(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match self.call_value(callee.clone(), args, Kwargs::new())? {
            Called::Value(v) => Ok(v),
            Called::Suspend(_) => Err(type_error(
                "external functions cannot be called from this context",
            )),
        }
    }

    pub(crate) fn id_of(&mut self, v: &Value) -> i64 {
        self.ids.id_of(v)
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    pub(crate) fn make_iter(&mut self, v: Value) -> Result<Rc<RefCell<IterValue>>> {
        if let Value::Iterator(it) = v {
            return Ok(it);
        }
        self.alloc()?;
        let iter = match v {
            Value::List(list) => IterValue::List { list, pos: 0 },
            Value::Tuple(items) => IterValue::Tuple { items, pos: 0 },
            Value::Str(s) => IterValue::Str { s, pos: 0 },
            Value::Bytes(b) => IterValue::Bytes { b, pos: 0 },
            Value::Range(r) => IterValue::Range {
                range: *r,
                emitted: 0,
            },
            Value::Dict(map) => IterValue::Keys {
                kind: "dict_keyiterator",
                keys: map.borrow().keys().cloned().collect(),
                pos: 0,
            },
            Value::Set(set) => IterValue::Keys {
                kind: "set_iterator",
                keys: set.borrow().iter().cloned().collect(),
                pos: 0,
            },
            Value::FrozenSet(set) => IterValue::Keys {
                kind: "set_iterator",
                keys: set.iter().cloned().collect(),
                pos: 0,
            },
            other => return Err(not_iterable(other.type_name())),
        };
        Ok(Rc::new(RefCell::new(iter)))
    }

    pub(crate) fn iter_next(&mut self, it: &Rc<RefCell<IterValue>>) -> Result<Option<Value>> {
        // Compound iterators recurse; the borrow is dropped first.
        enum Step {
            Done(Option<Value>),
            Enumerate(Rc<RefCell<IterValue>>),
            Zip(Vec<Rc<RefCell<IterValue>>>),
            Filter(Option<Value>, Rc<RefCell<IterValue>>),
        }
        let step = {
            let mut iter = it.borrow_mut();
            match &mut *iter {
                IterValue::List { list, pos } => {
                    let list = list.borrow();
                    if *pos < list.len() {
                        let v = list[*pos].clone();
                        *pos += 1;
                        Step::Done(Some(v))
                    } else {
                        Step::Done(None)
                    }
                }
                IterValue::Tuple { items, pos } => {
                    if *pos < items.len() {
                        let v = items[*pos].clone();
                        *pos += 1;
                        Step::Done(Some(v))
                    } else {
                        Step::Done(None)
                    }
                }
                IterValue::Str { s, pos } => match s[*pos..].chars().next() {
                    Some(c) => {
                        *pos += c.len_utf8();
                        Step::Done(Some(Value::from(c.to_string())))
                    }
                    None => Step::Done(None),
                },
                IterValue::Bytes { b, pos } => {
                    if *pos < b.len() {
                        let v = Value::Int(b[*pos] as i64);
                        *pos += 1;
                        Step::Done(Some(v))
                    } else {
                        Step::Done(None)
                    }
                }
                IterValue::Range { range, emitted } => match range.nth(*emitted) {
                    Some(v) => {
                        *emitted += 1;
                        Step::Done(Some(Value::Int(v)))
                    }
                    None => Step::Done(None),
                },
                IterValue::Keys { keys, pos, .. } => {
                    if *pos < keys.len() {
                        let v = keys[*pos].clone();
                        *pos += 1;
                        Step::Done(Some(v))
                    } else {
                        Step::Done(None)
                    }
                }
                IterValue::Reversed { items, pos } => {
                    if *pos < items.len() {
                        let v = items[items.len() - 1 - *pos].clone();
                        *pos += 1;
                        Step::Done(Some(v))
                    } else {
                        Step::Done(None)
                    }
                }
                IterValue::Enumerate { inner, .. } => Step::Enumerate(inner.clone()),
                IterValue::Zip { iters } => Step::Zip(iters.clone()),
                IterValue::Filter { predicate, inner } => {
                    Step::Filter(predicate.as_deref().cloned(), inner.clone())
                }
            }
        };
        match step {
            Step::Done(v) => Ok(v),
            Step::Enumerate(inner) => match self.iter_next(&inner)? {
                Some(v) => {
                    self.alloc()?;
                    let count = {
                        let mut iter = it.borrow_mut();
                        match &mut *iter {
                            IterValue::Enumerate { count, .. } => {
                                let c = *count;
                                *count += 1;
                                c
                            }
                            _ => unreachable!("enumerate state changed"),
                        }
                    };
                    Ok(Some(Value::new_tuple(vec![Value::Int(count), v])))
                }
                None => Ok(None),
            },
            Step::Zip(iters) => {
                if iters.is_empty() {
                    return Ok(None);
                }
                let mut items = Vec::with_capacity(iters.len());
                for inner in &iters {
                    match self.iter_next(inner)? {
                        Some(v) => items.push(v),
                        None => return Ok(None),
                    }
                }
                self.alloc()?;
                Ok(Some(Value::new_tuple(items)))
            }
            Step::Filter(predicate, inner) => loop {
                let v = match self.iter_next(&inner)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                let keep = match &predicate {
                    None => v.is_truthy(),
                    Some(f) => self.call_simple(f, vec![v.clone()])?.is_truthy(),
                };
                if keep {
                    return Ok(Some(v));
                }
            },
        }
    }

    /// Materializes any iterable into a vector.
    pub(crate) fn collect_iterable(&mut self, v: Value) -> Result<Vec<Value>> {
        match v {
            Value::List(list) => Ok(list.borrow().clone()),
            Value::Tuple(items) => Ok(items.to_vec()),
            other => {
                let it = self.make_iter(other)?;
                let mut out = vec![];
                while let Some(v) = self.iter_next(&it)? {
                    out.push(v);
                }
                Ok(out)
            }
        }
    }

    fn unpack(&mut self, v: &Value, n: usize) -> Result<Vec<Value>> {
        let items = match v {
            Value::List(list) => list.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            other => {
                if !matches!(
                    other,
                    Value::Str(_)
                        | Value::Bytes(_)
                        | Value::Dict(_)
                        | Value::Set(_)
                        | Value::FrozenSet(_)
                        | Value::Range(_)
                        | Value::Iterator(_)
                ) {
                    return Err(type_error(format!(
                        "cannot unpack non-iterable {} object",
                        other.type_name()
                    )));
                }
                self.collect_iterable(other.clone())?
            }
        };
        match items.len().cmp(&n) {
            Ordering::Less => Err(value_error(format!(
                "not enough values to unpack (expected {n}, got {})",
                items.len()
            ))),
            Ordering::Greater => Err(value_error(format!(
                "too many values to unpack (expected {n})"
            ))),
            Ordering::Equal => Ok(items),
        }
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn unary_op(&mut self, op: UnaryOp, v: &Value) -> Result<Value> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
            UnaryOp::Neg => number::neg(v).unwrap_or_else(|| {
                Err(type_error(format!(
                    "bad operand type for unary -: '{}'",
                    v.type_name()
                )))
            }),
            UnaryOp::Pos => number::pos(v).ok_or_else(|| {
                type_error(format!("bad operand type for unary +: '{}'", v.type_name()))
            }),
            UnaryOp::Invert => match number::as_int_operand(v) {
                Some(i) => Ok(Value::Int(!i)),
                None => Err(type_error(format!(
                    "bad operand type for unary ~: '{}'",
                    v.type_name()
                ))),
            },
        }
    }

    fn binary_op(&mut self, op: BinaryOp, a: &Value, b: &Value, inplace: bool) -> Result<Value> {
        let result = match op {
            BinaryOp::Add => match (a, b) {
                (Value::Str(x), Value::Str(y)) => {
                    self.alloc()?;
                    let mut s = x.to_string();
                    s.push_str(y);
                    Some(Ok(Value::from(s)))
                }
                (Value::Bytes(x), Value::Bytes(y)) => {
                    self.alloc()?;
                    let mut out = x.to_vec();
                    out.extend_from_slice(y);
                    Some(Ok(Value::Bytes(out.into())))
                }
                (Value::List(x), Value::List(y)) => {
                    if inplace {
                        if Rc::ptr_eq(x, y) {
                            let doubled = x.borrow().clone();
                            x.borrow_mut().extend(doubled);
                        } else {
                            let extra = y.borrow().clone();
                            x.borrow_mut().extend(extra);
                        }
                        Some(Ok(a.clone()))
                    } else {
                        self.alloc()?;
                        let mut out = x.borrow().clone();
                        out.extend(y.borrow().iter().cloned());
                        Some(Ok(Value::new_list(out)))
                    }
                }
                (Value::Tuple(x), Value::Tuple(y)) => {
                    self.alloc()?;
                    let mut out = x.to_vec();
                    out.extend(y.iter().cloned());
                    Some(Ok(Value::new_tuple(out)))
                }
                _ => number::add(a, b),
            },
            BinaryOp::Sub => match (a, b) {
                (Value::Set(_) | Value::FrozenSet(_), Value::Set(_) | Value::FrozenSet(_)) => {
                    self.alloc()?;
                    Some(Ok(set_op(a, b, SetOp::Difference)))
                }
                _ => number::sub(a, b),
            },
            BinaryOp::Mul => match (a, b) {
                (Value::Str(_) | Value::Bytes(_) | Value::List(_) | Value::Tuple(_), Value::Int(_) | Value::Bool(_))
                | (Value::Int(_) | Value::Bool(_), Value::Str(_) | Value::Bytes(_) | Value::List(_) | Value::Tuple(_)) => {
                    let (seq, n) = if matches!(a, Value::Int(_) | Value::Bool(_)) {
                        (b, number::as_int_operand(a).expect("numeric operand"))
                    } else {
                        (a, number::as_int_operand(b).expect("numeric operand"))
                    };
                    self.alloc()?;
                    Some(self.repeat_sequence(seq, n))
                }
                _ => number::mul(a, b),
            },
            BinaryOp::Div => match (a, b) {
                (Value::Path(p), Value::Str(s)) => {
                    self.alloc()?;
                    Some(Ok(Value::Path(Rc::new(p.join(s)))))
                }
                (Value::Path(p), Value::Path(q)) => {
                    self.alloc()?;
                    Some(Ok(Value::Path(Rc::new(p.join(&q.as_posix())))))
                }
                (Value::Str(s), Value::Path(p)) => {
                    self.alloc()?;
                    Some(Ok(Value::Path(Rc::new(
                        crate::builtins::pathlib::PurePath::new(s).join(&p.as_posix()),
                    ))))
                }
                _ => number::truediv(a, b),
            },
            BinaryOp::FloorDiv => number::floordiv(a, b),
            BinaryOp::Mod => number::modulo(a, b),
            BinaryOp::Pow => number::pow(a, b),
            BinaryOp::BitAnd => match (a, b) {
                (Value::Set(_) | Value::FrozenSet(_), Value::Set(_) | Value::FrozenSet(_)) => {
                    self.alloc()?;
                    Some(Ok(set_op(a, b, SetOp::Intersection)))
                }
                _ => int_bitwise(a, b, |x, y| x & y),
            },
            BinaryOp::BitOr => match (a, b) {
                (Value::Set(_) | Value::FrozenSet(_), Value::Set(_) | Value::FrozenSet(_)) => {
                    self.alloc()?;
                    Some(Ok(set_op(a, b, SetOp::Union)))
                }
                _ => int_bitwise(a, b, |x, y| x | y),
            },
            BinaryOp::BitXor => match (a, b) {
                (Value::Set(_) | Value::FrozenSet(_), Value::Set(_) | Value::FrozenSet(_)) => {
                    self.alloc()?;
                    Some(Ok(set_op(a, b, SetOp::SymmetricDifference)))
                }
                _ => int_bitwise(a, b, |x, y| x ^ y),
            },
            BinaryOp::Shl => match (number::as_int_operand(a), number::as_int_operand(b)) {
                (Some(x), Some(y)) => Some(number::shl(x, y)),
                _ => None,
            },
            BinaryOp::Shr => match (number::as_int_operand(a), number::as_int_operand(b)) {
                (Some(x), Some(y)) => Some(number::shr(x, y)),
                _ => None,
            },
        };
        match result {
            Some(r) => r,
            None => Err(type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op_symbol(op),
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn repeat_sequence(&mut self, seq: &Value, n: i64) -> Result<Value> {
        let count = n.max(0) as usize;
        let len = seq.length().unwrap_or(0);
        if len.checked_mul(count).map_or(true, |total| total > u32::MAX as usize) {
            return Err(raise(ExcType::MemoryError, "repeated sequence is too large"));
        }
        Ok(match seq {
            Value::Str(s) => Value::from(s.repeat(count)),
            Value::Bytes(b) => Value::Bytes(b.repeat(count).into()),
            Value::List(items) => {
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Value::new_list(out)
            }
            Value::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Value::new_tuple(out)
            }
            other => unreachable!("repeat of {other:?}"),
        })
    }

    fn compare_op(&mut self, op: CompareOp, a: &Value, b: &Value) -> Result<bool> {
        match op {
            CompareOp::Eq => eq_values(a, b, 0),
            CompareOp::Ne => Ok(!eq_values(a, b, 0)?),
            CompareOp::Is => Ok(a.is_same(b)),
            CompareOp::IsNot => Ok(!a.is_same(b)),
            CompareOp::In => self.contains(b, a),
            CompareOp::NotIn => Ok(!self.contains(b, a)?),
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                if is_set_like(a) && is_set_like(b) {
                    return Ok(set_compare(op, a, b));
                }
                let ord = cmp_values(a, b, 0).map_err(|err| {
                    // Report the operator actually used.
                    if err.class() == ExcType::TypeError {
                        type_error(format!(
                            "'{}' not supported between instances of '{}' and '{}'",
                            compare_symbol(op),
                            a.type_name(),
                            b.type_name()
                        ))
                    } else {
                        err
                    }
                })?;
                Ok(match op {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Ge => ord != Ordering::Less,
                    _ => unreachable!(),
                })
            }
        }
    }

    fn contains(&mut self, container: &Value, item: &Value) -> Result<bool> {
        match container {
            Value::Str(s) => match item {
                Value::Str(sub) => Ok(s.contains(&**sub)),
                other => Err(type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::Bytes(b) => match item {
                Value::Bytes(sub) => {
                    Ok(sub.is_empty() || b.windows(sub.len()).any(|w| w == &**sub))
                }
                Value::Int(i) => {
                    if *i < 0 || *i > 255 {
                        Err(value_error("byte must be in range(0, 256)"))
                    } else {
                        Ok(b.contains(&(*i as u8)))
                    }
                }
                other => Err(type_error(format!(
                    "a bytes-like object is required, not '{}'",
                    other.type_name()
                ))),
            },
            Value::Dict(map) => {
                item.check_hashable()?;
                Ok(map.borrow().contains_key(item))
            }
            Value::Set(set) => {
                item.check_hashable()?;
                Ok(set.borrow().contains(item))
            }
            Value::FrozenSet(set) => {
                item.check_hashable()?;
                Ok(set.contains(item))
            }
            Value::List(list) => {
                let items = list.borrow().clone();
                for v in &items {
                    if eq_values(v, item, 0)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Tuple(items) => {
                for v in items.iter() {
                    if eq_values(v, item, 0)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Range(r) => match item {
                Value::Int(i) => {
                    if r.step > 0 {
                        Ok(*i >= r.start && *i < r.stop && (i - r.start) % r.step == 0)
                    } else {
                        Ok(*i <= r.start && *i > r.stop && (r.start - i) % (-r.step) == 0)
                    }
                }
                _ => Ok(false),
            },
            Value::Iterator(it) => {
                let it = it.clone();
                while let Some(v) = self.iter_next(&it)? {
                    if eq_values(&v, item, 0)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Subscription
    // ------------------------------------------------------------------

    pub(crate) fn subscript_load(&mut self, obj: &Value, index: &Value) -> Result<Value> {
        if let Value::Slice(slice) = index {
            return self.slice_load(obj, slice);
        }
        match obj {
            Value::Dict(map) => {
                index.check_hashable()?;
                match map.borrow().get(index) {
                    Some(v) => Ok(v.clone()),
                    None => Err(raise_exc(ExceptionValue::new(
                        ExcType::KeyError,
                        vec![index.clone()],
                    ))),
                }
            }
            Value::List(list) => {
                let list = list.borrow();
                let i = self.sequence_index(obj, index, list.len(), "list")?;
                Ok(list[i].clone())
            }
            Value::Tuple(items) => {
                let i = self.sequence_index(obj, index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = self.sequence_index(obj, index, chars.len(), "string")?;
                Ok(Value::from(chars[i].to_string()))
            }
            Value::Bytes(b) => {
                let i = self.sequence_index(obj, index, b.len(), "index")?;
                Ok(Value::Int(b[i] as i64))
            }
            Value::Range(r) => {
                let i = self.sequence_index(obj, index, r.len(), "range object index")?;
                Ok(Value::Int(r.nth(i).expect("index validated")))
            }
            other => Err(type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn sequence_index(
        &self,
        obj: &Value,
        index: &Value,
        len: usize,
        what: &str,
    ) -> Result<usize> {
        let i = match number::as_int_operand(index) {
            Some(i) => i,
            None => {
                return Err(type_error(format!(
                    "{} indices must be integers or slices, not {}",
                    obj.type_name(),
                    index.type_name()
                )))
            }
        };
        let adjusted = if i < 0 { i + len as i64 } else { i };
        if adjusted < 0 || adjusted >= len as i64 {
            let msg = match what {
                "index" => "index out of range".to_string(),
                "range object index" => "range object index out of range".to_string(),
                other => format!("{other} index out of range"),
            };
            return Err(raise(ExcType::IndexError, msg));
        }
        Ok(adjusted as usize)
    }

    fn slice_load(&mut self, obj: &Value, slice: &SliceValue) -> Result<Value> {
        let len = match obj.length() {
            Some(len) if !matches!(obj, Value::Dict(_) | Value::Set(_) | Value::FrozenSet(_)) => {
                len
            }
            _ => {
                return Err(type_error(format!(
                    "'{}' object is not subscriptable",
                    obj.type_name()
                )))
            }
        };
        let indices = slice_indices(slice, len)?;
        self.alloc()?;
        Ok(match obj {
            Value::List(list) => {
                let list = list.borrow();
                Value::new_list(indices.iter().map(|&i| list[i].clone()).collect())
            }
            Value::Tuple(items) => {
                Value::new_tuple(indices.iter().map(|&i| items[i].clone()).collect())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Value::from(indices.iter().map(|&i| chars[i]).collect::<String>())
            }
            Value::Bytes(b) => {
                Value::Bytes(indices.iter().map(|&i| b[i]).collect::<Vec<u8>>().into())
            }
            Value::Range(r) => {
                let (start, stop, step) = slice_bounds(slice, len)?;
                let new_start = r.start + r.step * start;
                let new_stop = r.start + r.step * stop;
                let new_step = r.step * step;
                Value::Range(Rc::new(RangeValue {
                    start: new_start,
                    stop: new_stop,
                    step: new_step,
                }))
            }
            other => {
                return Err(type_error(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                )))
            }
        })
    }

    fn subscript_store(&mut self, obj: &Value, index: Value, value: Value) -> Result<()> {
        match obj {
            Value::Dict(map) => {
                index.check_hashable()?;
                map.borrow_mut().insert(index, value);
                Ok(())
            }
            Value::List(list) => {
                if let Value::Slice(slice) = &index {
                    return self.list_slice_store(list, slice, value);
                }
                let len = list.borrow().len();
                let i = match number::as_int_operand(&index) {
                    Some(i) => i,
                    None => {
                        return Err(type_error(format!(
                            "list indices must be integers or slices, not {}",
                            index.type_name()
                        )))
                    }
                };
                let adjusted = if i < 0 { i + len as i64 } else { i };
                if adjusted < 0 || adjusted >= len as i64 {
                    return Err(raise(
                        ExcType::IndexError,
                        "list assignment index out of range",
                    ));
                }
                list.borrow_mut()[adjusted as usize] = value;
                Ok(())
            }
            other => Err(type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn list_slice_store(
        &mut self,
        list: &Rc<RefCell<Vec<Value>>>,
        slice: &SliceValue,
        value: Value,
    ) -> Result<()> {
        let new_items = self.collect_iterable(value)?;
        let len = list.borrow().len();
        let (start, stop, step) = slice_bounds(slice, len)?;
        if step == 1 {
            let stop = (stop.max(start)) as usize;
            let start = start as usize;
            list.borrow_mut().splice(start..stop, new_items);
            return Ok(());
        }
        let indices = slice_indices(slice, len)?;
        if indices.len() != new_items.len() {
            return Err(value_error(format!(
                "attempt to assign sequence of size {} to extended slice of size {}",
                new_items.len(),
                indices.len()
            )));
        }
        let mut items = list.borrow_mut();
        for (i, v) in indices.into_iter().zip(new_items) {
            items[i] = v;
        }
        Ok(())
    }

    fn subscript_delete(&mut self, obj: &Value, index: &Value) -> Result<()> {
        match obj {
            Value::Dict(map) => {
                index.check_hashable()?;
                match map.borrow_mut().shift_remove(index) {
                    Some(_) => Ok(()),
                    None => Err(raise_exc(ExceptionValue::new(
                        ExcType::KeyError,
                        vec![index.clone()],
                    ))),
                }
            }
            Value::List(list) => {
                if let Value::Slice(slice) = index {
                    let len = list.borrow().len();
                    let mut indices = slice_indices(slice, len)?;
                    indices.sort_unstable();
                    let mut items = list.borrow_mut();
                    for i in indices.into_iter().rev() {
                        items.remove(i);
                    }
                    return Ok(());
                }
                let len = list.borrow().len();
                let i = self.sequence_index(obj, index, len, "list")?;
                list.borrow_mut().remove(i);
                Ok(())
            }
            other => Err(type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }
}

// ----------------------------------------------------------------------
// Free helpers
// ----------------------------------------------------------------------

fn to_exception(v: Value) -> Result<Exc> {
    match v {
        Value::Class(Class::Exc(t)) => Ok(ExceptionValue::new(t, vec![])),
        Value::Exception(e) => Ok(e),
        _ => Err(type_error("exceptions must derive from BaseException")),
    }
}

fn exc_matches(exc: &Exc, spec: &Value) -> Result<bool> {
    match spec {
        Value::Class(Class::Exc(t)) => Ok(exc.class().is_subtype_of(*t)),
        Value::Tuple(items) => {
            for item in items.iter() {
                if exc_matches(exc, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn is_set_like(v: &Value) -> bool {
    matches!(v, Value::Set(_) | Value::FrozenSet(_))
}

fn set_items(v: &Value) -> IndexSet<Value> {
    match v {
        Value::Set(s) => s.borrow().clone(),
        Value::FrozenSet(s) => (**s).clone(),
        other => unreachable!("set operand is {other:?}"),
    }
}

enum SetOp {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
}

fn set_op(a: &Value, b: &Value, op: SetOp) -> Value {
    let x = set_items(a);
    let y = set_items(b);
    let out: IndexSet<Value> = match op {
        SetOp::Union => x.union(&y).cloned().collect(),
        SetOp::Intersection => x.intersection(&y).cloned().collect(),
        SetOp::Difference => x.difference(&y).cloned().collect(),
        SetOp::SymmetricDifference => x.symmetric_difference(&y).cloned().collect(),
    };
    if matches!(a, Value::FrozenSet(_)) {
        Value::FrozenSet(Rc::new(out))
    } else {
        Value::new_set(out)
    }
}

fn set_compare(op: CompareOp, a: &Value, b: &Value) -> bool {
    let x = set_items(a);
    let y = set_items(b);
    match op {
        CompareOp::Lt => x.len() < y.len() && x.is_subset(&y),
        CompareOp::Le => x.is_subset(&y),
        CompareOp::Gt => y.len() < x.len() && y.is_subset(&x),
        CompareOp::Ge => y.is_subset(&x),
        _ => unreachable!("set comparison operator"),
    }
}

fn int_bitwise(
    a: &Value,
    b: &Value,
    f: impl FnOnce(i64, i64) -> i64,
) -> Option<Result<Value>> {
    match (number::as_int_operand(a), number::as_int_operand(b)) {
        (Some(x), Some(y)) => Some(Ok(Value::Int(f(x, y)))),
        _ => None,
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "** or pow()",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
    }
}

fn compare_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
        _ => "==",
    }
}

/// Slice bounds `(start, stop, step)` after defaulting, negative
/// adjustment, and clamping.
pub(crate) fn slice_bounds(slice: &SliceValue, len: usize) -> Result<(i64, i64, i64)> {
    let get = |v: &Option<Value>, what: &str| -> Result<Option<i64>> {
        match v {
            None => Ok(None),
            Some(v) => match number::as_int_operand(v) {
                Some(i) => Ok(Some(i)),
                None => Err(type_error(format!(
                    "slice {what} must be integers or None"
                ))),
            },
        }
    };
    let step = get(&slice.step, "indices")?.unwrap_or(1);
    if step == 0 {
        return Err(value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let adjust = |i: i64| -> i64 {
        let i = if i < 0 { i + len } else { i };
        if step > 0 {
            i.clamp(0, len)
        } else {
            i.clamp(-1, len - 1)
        }
    };
    let start = match get(&slice.start, "indices")? {
        Some(i) => adjust(i),
        None => {
            if step > 0 {
                0
            } else {
                len - 1
            }
        }
    };
    let stop = match get(&slice.stop, "indices")? {
        Some(i) => adjust(i),
        None => {
            if step > 0 {
                len
            } else {
                -1
            }
        }
    };
    Ok((start, stop, step))
}

/// Concrete element indices a slice selects, in iteration order.
pub(crate) fn slice_indices(slice: &SliceValue, len: usize) -> Result<Vec<usize>> {
    let (start, stop, step) = slice_bounds(slice, len)?;
    let mut out = vec![];
    let mut i = start;
    if step > 0 {
        while i < stop {
            if i >= 0 && (i as usize) < len {
                out.push(i as usize);
            }
            i += step;
        }
    } else {
        while i > stop {
            if i >= 0 && (i as usize) < len {
                out.push(i as usize);
            }
            i += step;
        }
    }
    Ok(out)
}
