// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Lowers the AST to a flat instruction sequence executed by the
//! interpreter's explicit frame machinery.
//!
//! Control flow is resolved to jumps at compile time. `finally` bodies are
//! duplicated on every exit path (normal, handled exception, `break`,
//! `continue`), so the runtime block stack only tracks exception handlers.

use crate::ast::*;
use crate::exceptions::{ExcType, Result};
use crate::lexer::{Source, Span};
use crate::value::{Class, FunctionDef, Value};
use crate::Rc;


#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Instr {
    LoadConst(u32),
    LoadName(u32),
    StoreName(u32),
    DeleteName(u32),
    LoadAttr(u32),
    StoreAttr(u32),
    DeleteAttr(u32),
    LoadSubscript,
    StoreSubscript,
    DeleteSubscript,
    Pop,
    Dup,
    Dup2,
    Rot2,
    Rot3,
    BuildList(u32),
    BuildTuple(u32),
    BuildSet(u32),
    BuildDict(u32),
    BuildSlice(u8),
    UnpackSequence(u32),
    Unary(UnaryOp),
    Binary(BinaryOp),
    BinaryInplace(BinaryOp),
    Compare(CompareOp),
    Jump(u32),
    PopJumpIfFalse(u32),
    PopJumpIfTrue(u32),
    JumpIfFalseOrPop(u32),
    JumpIfTrueOrPop(u32),
    GetIter,
    ForIter(u32),
    Call { argc: u32, kwnames: Option<u32> },
    ListAppend(u32),
    SetAdd(u32),
    MapAdd(u32),
    EnterScope,
    ExitScope,
    PushExcept(u32),
    PopBlock,
    Raise(u8),
    PushHandled,
    PopHandled,
    LoadExc,
    LoadExcInfo,
    CheckExcMatch,
    ReRaise,
    Import(u32),
    ImportFrom { module: u32, name: u32 },
    Return,
}

/// A compiled script: instructions plus the tables they index into.
#[derive(Debug)]
pub(crate) struct Program {
    pub instrs: Vec<Instr>,
    /// Source line of each instruction, for tracebacks.
    pub lines: Vec<u32>,
    pub consts: Vec<Value>,
    pub names: Vec<Rc<str>>,
    pub source: Source,
    pub script_name: Rc<str>,
}

/// Compile-time context entries mirroring the runtime block structure,
/// consulted when `break`/`continue` cross protected regions.
enum Ctx {
    Loop {
        is_for: bool,
        continue_target: u32,
        break_jumps: Vec<usize>,
    },
    Except,
    Finally {
        body: Vec<Stmt>,
    },
    With,
    Handler,
}

pub(crate) struct Compiler {
    instrs: Vec<Instr>,
    lines: Vec<u32>,
    consts: Vec<Value>,
    names: Vec<Rc<str>>,
    source: Source,
    script_name: Rc<str>,
    line: u32,
    ctx: Vec<Ctx>,
}

impl Compiler {
    pub fn new(source: Source, script_name: &str) -> Self {
        Self {
            instrs: vec![],
            lines: vec![],
            consts: vec![],
            names: vec![],
            source,
            script_name: Rc::from(script_name),
            line: 1,
            ctx: vec![],
        }
    }

    pub fn compile_module(mut self, stmts: &[Stmt]) -> Result<Program> {
        let last_expr = matches!(stmts.last(), Some(Stmt::Expr { .. }));
        for (i, stmt) in stmts.iter().enumerate() {
            // The value of the last top-level expression statement is the
            // run's output.
            if i + 1 == stmts.len() && last_expr {
                if let Stmt::Expr { value } = stmt {
                    self.set_line(value.span());
                    self.compile_expr(value)?;
                    self.emit(Instr::Return);
                    break;
                }
            }
            self.compile_stmt(stmt)?;
        }
        if !last_expr {
            let none = self.const_idx(Value::None);
            self.emit(Instr::LoadConst(none));
            self.emit(Instr::Return);
        }
        Ok(Program {
            instrs: self.instrs,
            lines: self.lines,
            consts: self.consts,
            names: self.names,
            source: self.source,
            script_name: self.script_name,
        })
    }

    fn emit(&mut self, instr: Instr) -> usize {
        self.instrs.push(instr);
        self.lines.push(self.line);
        self.instrs.len() - 1
    }

    fn here(&self) -> u32 {
        self.instrs.len() as u32
    }

    fn set_line(&mut self, span: &Span) {
        self.line = span.line;
    }

    fn patch(&mut self, at: usize, target: u32) {
        match &mut self.instrs[at] {
            Instr::Jump(t)
            | Instr::PopJumpIfFalse(t)
            | Instr::PopJumpIfTrue(t)
            | Instr::JumpIfFalseOrPop(t)
            | Instr::JumpIfTrueOrPop(t)
            | Instr::ForIter(t)
            | Instr::PushExcept(t) => *t = target,
            other => unreachable!("patching non-jump instruction {other:?}"),
        }
    }

    fn const_idx(&mut self, value: Value) -> u32 {
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    fn name_idx(&mut self, name: &str) -> u32 {
        if let Some(i) = self.names.iter().position(|n| &**n == name) {
            return i as u32;
        }
        self.names.push(Rc::from(name));
        (self.names.len() - 1) as u32
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr { value } => {
                self.set_line(value.span());
                self.compile_expr(value)?;
                self.emit(Instr::Pop);
            }
            Stmt::Assign {
                span,
                targets,
                value,
            } => {
                self.set_line(span);
                self.compile_expr(value)?;
                for (i, target) in targets.iter().enumerate() {
                    if i + 1 < targets.len() {
                        self.emit(Instr::Dup);
                    }
                    self.compile_store(target)?;
                }
            }
            Stmt::AugAssign {
                span,
                target,
                op,
                value,
            } => {
                self.set_line(span);
                self.compile_aug_assign(target, *op, value)?;
            }
            Stmt::If {
                span,
                test,
                body,
                orelse,
            } => {
                self.set_line(span);
                self.compile_expr(test)?;
                let jump_else = self.emit(Instr::PopJumpIfFalse(0));
                self.compile_stmts(body)?;
                if orelse.is_empty() {
                    let target = self.here();
                    self.patch(jump_else, target);
                } else {
                    let jump_end = self.emit(Instr::Jump(0));
                    let target = self.here();
                    self.patch(jump_else, target);
                    self.compile_stmts(orelse)?;
                    let target = self.here();
                    self.patch(jump_end, target);
                }
            }
            Stmt::While {
                span,
                test,
                body,
                orelse,
            } => {
                self.set_line(span);
                let start = self.here();
                self.compile_expr(test)?;
                let jump_else = self.emit(Instr::PopJumpIfFalse(0));
                self.ctx.push(Ctx::Loop {
                    is_for: false,
                    continue_target: start,
                    break_jumps: vec![],
                });
                self.compile_stmts(body)?;
                self.emit(Instr::Jump(start));
                let break_jumps = match self.ctx.pop() {
                    Some(Ctx::Loop { break_jumps, .. }) => break_jumps,
                    _ => unreachable!("loop context"),
                };
                let target = self.here();
                self.patch(jump_else, target);
                self.compile_stmts(orelse)?;
                let end = self.here();
                for j in break_jumps {
                    self.patch(j, end);
                }
            }
            Stmt::For {
                span,
                target,
                iter,
                body,
                orelse,
            } => {
                self.set_line(span);
                self.compile_expr(iter)?;
                self.emit(Instr::GetIter);
                let start = self.here();
                let for_iter = self.emit(Instr::ForIter(0));
                self.compile_store(target)?;
                self.ctx.push(Ctx::Loop {
                    is_for: true,
                    continue_target: start,
                    break_jumps: vec![],
                });
                self.compile_stmts(body)?;
                self.emit(Instr::Jump(start));
                let break_jumps = match self.ctx.pop() {
                    Some(Ctx::Loop { break_jumps, .. }) => break_jumps,
                    _ => unreachable!("loop context"),
                };
                let target = self.here();
                self.patch(for_iter, target);
                self.compile_stmts(orelse)?;
                let end = self.here();
                for j in break_jumps {
                    self.patch(j, end);
                }
            }
            Stmt::Try {
                span,
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.set_line(span);
                self.compile_try(body, handlers, orelse, finalbody)?;
            }
            Stmt::With {
                span,
                context,
                target,
                body,
            } => {
                self.set_line(span);
                self.compile_with(context, target.as_ref(), body)?;
            }
            Stmt::Raise { span, exc, cause } => {
                self.set_line(span);
                match (exc, cause) {
                    (None, _) => {
                        self.emit(Instr::Raise(0));
                    }
                    (Some(exc), None) => {
                        self.compile_expr(exc)?;
                        self.emit(Instr::Raise(1));
                    }
                    (Some(exc), Some(cause)) => {
                        self.compile_expr(exc)?;
                        self.compile_expr(cause)?;
                        self.emit(Instr::Raise(2));
                    }
                }
            }
            Stmt::Assert { span, test, msg } => {
                self.set_line(span);
                self.compile_expr(test)?;
                let jump_ok = self.emit(Instr::PopJumpIfTrue(0));
                let cls = self.const_idx(Value::Class(Class::Exc(ExcType::AssertionError)));
                self.emit(Instr::LoadConst(cls));
                let argc = match msg {
                    Some(msg) => {
                        self.compile_expr(msg)?;
                        1
                    }
                    None => 0,
                };
                self.emit(Instr::Call {
                    argc,
                    kwnames: None,
                });
                self.emit(Instr::Raise(1));
                let target = self.here();
                self.patch(jump_ok, target);
            }
            Stmt::Import {
                span,
                module,
                asname,
            } => {
                self.set_line(span);
                let module_idx = self.name_idx(module.text());
                self.emit(Instr::Import(module_idx));
                let binding = match asname {
                    Some(a) => a.text(),
                    None => module.text().split('.').next().unwrap_or(module.text()),
                };
                let binding = self.name_idx(binding);
                self.emit(Instr::StoreName(binding));
            }
            Stmt::FromImport {
                span,
                module,
                names,
            } => {
                self.set_line(span);
                let module_idx = self.name_idx(module.text());
                for (name, asname) in names {
                    let name_i = self.name_idx(name.text());
                    self.emit(Instr::ImportFrom {
                        module: module_idx,
                        name: name_i,
                    });
                    let binding = match asname {
                        Some(a) => a.text(),
                        None => name.text(),
                    };
                    let binding = self.name_idx(binding);
                    self.emit(Instr::StoreName(binding));
                }
            }
            Stmt::FunctionDef { span, name, .. } => {
                self.set_line(span);
                let func = self.const_idx(Value::Function(Rc::new(FunctionDef {
                    name: Rc::from(name.text()),
                })));
                self.emit(Instr::LoadConst(func));
                let binding = self.name_idx(name.text());
                self.emit(Instr::StoreName(binding));
            }
            Stmt::Global { .. } => {
                // Only module scope compiles statements; `global` there is
                // a no-op.
            }
            Stmt::Del { span, targets } => {
                self.set_line(span);
                for target in targets {
                    self.compile_delete(target)?;
                }
            }
            Stmt::Break { span } => {
                self.set_line(span);
                self.compile_loop_exit(true)?;
            }
            Stmt::Continue { span } => {
                self.set_line(span);
                self.compile_loop_exit(false)?;
            }
            Stmt::Pass => {}
        }
        Ok(())
    }

    fn compile_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> Result<()> {
        let has_finally = !finalbody.is_empty();
        let has_handlers = !handlers.is_empty();

        let fin_push = if has_finally {
            let at = self.emit(Instr::PushExcept(0));
            self.ctx.push(Ctx::Finally {
                body: finalbody.to_vec(),
            });
            Some(at)
        } else {
            None
        };

        let exc_push = if has_handlers {
            let at = self.emit(Instr::PushExcept(0));
            self.ctx.push(Ctx::Except);
            Some(at)
        } else {
            None
        };

        self.compile_stmts(body)?;

        if has_handlers {
            self.emit(Instr::PopBlock);
            self.ctx.pop();
        }
        self.compile_stmts(orelse)?;

        // Normal-path finally runs with its protection already popped.
        if has_finally {
            self.emit(Instr::PopBlock);
            let fin = self.ctx.pop();
            self.compile_stmts(finalbody)?;
            if let Some(fin) = fin {
                self.ctx.push(fin);
            }
        }
        let mut end_jumps = vec![self.emit(Instr::Jump(0))];

        if has_handlers {
            let target = self.here();
            self.patch(exc_push.expect("handler block"), target);
            self.emit(Instr::PushHandled);
            let mut next_jumps: Vec<usize> = vec![];
            for handler in handlers {
                for j in next_jumps.drain(..) {
                    let target = self.here();
                    self.patch(j, target);
                }
                self.set_line(&handler.span);
                if let Some(class) = &handler.class {
                    self.compile_expr(class)?;
                    self.emit(Instr::CheckExcMatch);
                    next_jumps.push(self.emit(Instr::PopJumpIfFalse(0)));
                }
                if let Some(name) = &handler.name {
                    self.emit(Instr::LoadExc);
                    let n = self.name_idx(name.text());
                    self.emit(Instr::StoreName(n));
                }
                self.ctx.push(Ctx::Handler);
                self.compile_stmts(&handler.body)?;
                self.ctx.pop();
                if let Some(name) = &handler.name {
                    let n = self.name_idx(name.text());
                    self.emit(Instr::DeleteName(n));
                }
                self.emit(Instr::PopHandled);
                if has_finally {
                    self.emit(Instr::PopBlock);
                    let fin = self.ctx.pop();
                    self.compile_stmts(finalbody)?;
                    if let Some(fin) = fin {
                        self.ctx.push(fin);
                    }
                }
                end_jumps.push(self.emit(Instr::Jump(0)));
            }
            for j in next_jumps {
                let target = self.here();
                self.patch(j, target);
            }
            // No clause matched: propagate, reaching the finally handler
            // if one is active.
            self.emit(Instr::ReRaise);
        }

        if has_finally {
            self.ctx.pop();
            let target = self.here();
            self.patch(fin_push.expect("finally block"), target);
            self.emit(Instr::PushHandled);
            self.compile_stmts(finalbody)?;
            self.emit(Instr::ReRaise);
        }

        let end = self.here();
        for j in end_jumps {
            self.patch(j, end);
        }
        Ok(())
    }

    fn compile_with(
        &mut self,
        context: &Expr,
        target: Option<&Expr>,
        body: &[Stmt],
    ) -> Result<()> {
        self.compile_expr(context)?;
        self.emit(Instr::Dup);
        let enter = self.name_idx("__enter__");
        self.emit(Instr::LoadAttr(enter));
        self.emit(Instr::Call {
            argc: 0,
            kwnames: None,
        });
        match target {
            Some(target) => self.compile_store(target)?,
            None => {
                self.emit(Instr::Pop);
            }
        }

        let block = self.emit(Instr::PushExcept(0));
        self.ctx.push(Ctx::With);
        self.compile_stmts(body)?;
        self.ctx.pop();
        self.emit(Instr::PopBlock);
        self.emit_exit_call();
        self.emit(Instr::Pop);
        let end_jump = self.emit(Instr::Jump(0));

        let target_ip = self.here();
        self.patch(block, target_ip);
        self.emit(Instr::PushHandled);
        let exit = self.name_idx("__exit__");
        self.emit(Instr::LoadAttr(exit));
        self.emit(Instr::LoadExcInfo);
        self.emit(Instr::Call {
            argc: 3,
            kwnames: None,
        });
        let suppress = self.emit(Instr::PopJumpIfTrue(0));
        self.emit(Instr::ReRaise);
        let target_ip = self.here();
        self.patch(suppress, target_ip);
        self.emit(Instr::PopHandled);

        let end = self.here();
        self.patch(end_jump, end);
        Ok(())
    }

    /// `__exit__(None, None, None)` for non-exception exits; the context
    /// manager is at TOS and is consumed.
    fn emit_exit_call(&mut self) {
        let exit = self.name_idx("__exit__");
        self.emit(Instr::LoadAttr(exit));
        let none = self.const_idx(Value::None);
        self.emit(Instr::LoadConst(none));
        self.emit(Instr::LoadConst(none));
        self.emit(Instr::LoadConst(none));
        self.emit(Instr::Call {
            argc: 3,
            kwnames: None,
        });
    }

    /// `break`/`continue`: emits cleanup for every context between the
    /// statement and the innermost loop, then the loop exit itself.
    fn compile_loop_exit(&mut self, is_break: bool) -> Result<()> {
        match self.ctx.pop() {
            Some(Ctx::Loop {
                is_for,
                continue_target,
                mut break_jumps,
            }) => {
                if is_break {
                    if is_for {
                        // Discard the iterator left on the stack.
                        self.emit(Instr::Pop);
                    }
                    break_jumps.push(self.emit(Instr::Jump(0)));
                } else {
                    self.emit(Instr::Jump(continue_target));
                }
                self.ctx.push(Ctx::Loop {
                    is_for,
                    continue_target,
                    break_jumps,
                });
                Ok(())
            }
            Some(entry) => {
                match &entry {
                    Ctx::Except => {
                        self.emit(Instr::PopBlock);
                    }
                    Ctx::Handler => {
                        self.emit(Instr::PopHandled);
                    }
                    Ctx::With => {
                        self.emit(Instr::PopBlock);
                        self.emit_exit_call();
                        self.emit(Instr::Pop);
                    }
                    Ctx::Finally { body } => {
                        self.emit(Instr::PopBlock);
                        let body = body.clone();
                        self.compile_stmts(&body)?;
                    }
                    Ctx::Loop { .. } => unreachable!("handled above"),
                }
                let result = self.compile_loop_exit(is_break);
                self.ctx.push(entry);
                result
            }
            None => unreachable!("parser rejects break/continue outside loops"),
        }
    }

    fn compile_aug_assign(&mut self, target: &Expr, op: BinaryOp, value: &Expr) -> Result<()> {
        match target {
            Expr::Name(span) => {
                let n = self.name_idx(span.text());
                self.emit(Instr::LoadName(n));
                self.compile_expr(value)?;
                self.emit(Instr::BinaryInplace(op));
                self.emit(Instr::StoreName(n));
            }
            Expr::Subscript {
                value: obj, index, ..
            } => {
                self.compile_expr(obj)?;
                self.compile_subscript_index(index)?;
                self.emit(Instr::Dup2);
                self.emit(Instr::LoadSubscript);
                self.compile_expr(value)?;
                self.emit(Instr::BinaryInplace(op));
                self.emit(Instr::Rot3);
                self.emit(Instr::StoreSubscript);
            }
            Expr::Attribute {
                value: obj, attr, ..
            } => {
                self.compile_expr(obj)?;
                self.emit(Instr::Dup);
                let n = self.name_idx(attr.text());
                self.emit(Instr::LoadAttr(n));
                self.compile_expr(value)?;
                self.emit(Instr::BinaryInplace(op));
                self.emit(Instr::Rot2);
                self.emit(Instr::StoreAttr(n));
            }
            other => {
                return Err(other
                    .span()
                    .error("illegal expression for augmented assignment"))
            }
        }
        Ok(())
    }

    fn compile_store(&mut self, target: &Expr) -> Result<()> {
        match target {
            Expr::Name(span) => {
                let n = self.name_idx(span.text());
                self.emit(Instr::StoreName(n));
            }
            Expr::Tuple { items, .. } | Expr::List { items, .. } => {
                self.emit(Instr::UnpackSequence(items.len() as u32));
                for item in items {
                    self.compile_store(item)?;
                }
            }
            Expr::Subscript { value, index, .. } => {
                self.compile_expr(value)?;
                self.compile_subscript_index(index)?;
                self.emit(Instr::StoreSubscript);
            }
            Expr::Attribute { value, attr, .. } => {
                self.compile_expr(value)?;
                let n = self.name_idx(attr.text());
                self.emit(Instr::StoreAttr(n));
            }
            other => return Err(other.span().error("cannot assign to expression")),
        }
        Ok(())
    }

    fn compile_delete(&mut self, target: &Expr) -> Result<()> {
        match target {
            Expr::Name(span) => {
                let n = self.name_idx(span.text());
                self.emit(Instr::DeleteName(n));
            }
            Expr::Subscript { value, index, .. } => {
                self.compile_expr(value)?;
                self.compile_subscript_index(index)?;
                self.emit(Instr::DeleteSubscript);
            }
            Expr::Attribute { value, attr, .. } => {
                self.compile_expr(value)?;
                let n = self.name_idx(attr.text());
                self.emit(Instr::DeleteAttr(n));
            }
            Expr::Tuple { items, .. } | Expr::List { items, .. } => {
                for item in items {
                    self.compile_delete(item)?;
                }
            }
            other => return Err(other.span().error("cannot delete expression")),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::None(span) => {
                self.set_line(span);
                let c = self.const_idx(Value::None);
                self.emit(Instr::LoadConst(c));
            }
            Expr::True(span) => {
                self.set_line(span);
                let c = self.const_idx(Value::Bool(true));
                self.emit(Instr::LoadConst(c));
            }
            Expr::False(span) => {
                self.set_line(span);
                let c = self.const_idx(Value::Bool(false));
                self.emit(Instr::LoadConst(c));
            }
            Expr::Int { span, value } => {
                self.set_line(span);
                let c = self.const_idx(Value::Int(*value));
                self.emit(Instr::LoadConst(c));
            }
            Expr::Float { span, value } => {
                self.set_line(span);
                let c = self.const_idx(Value::Float(*value));
                self.emit(Instr::LoadConst(c));
            }
            Expr::Str { span, value } => {
                self.set_line(span);
                let c = self.const_idx(Value::Str(value.clone()));
                self.emit(Instr::LoadConst(c));
            }
            Expr::Bytes { span, value } => {
                self.set_line(span);
                let c = self.const_idx(Value::Bytes(value.clone()));
                self.emit(Instr::LoadConst(c));
            }
            Expr::Name(span) => {
                self.set_line(span);
                let n = self.name_idx(span.text());
                self.emit(Instr::LoadName(n));
            }
            Expr::Tuple { span, items } => {
                self.set_line(span);
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Instr::BuildTuple(items.len() as u32));
            }
            Expr::List { span, items } => {
                self.set_line(span);
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Instr::BuildList(items.len() as u32));
            }
            Expr::Set { span, items } => {
                self.set_line(span);
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Instr::BuildSet(items.len() as u32));
            }
            Expr::Dict { span, pairs } => {
                self.set_line(span);
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.emit(Instr::BuildDict(pairs.len() as u32));
            }
            Expr::ListCompr {
                span,
                term,
                generators,
            } => {
                self.set_line(span);
                self.emit(Instr::BuildList(0));
                let depth = generators.len() as u32;
                self.compile_comprehension(generators, &mut |c| {
                    c.compile_expr(term)?;
                    c.emit(Instr::ListAppend(depth));
                    Ok(())
                })?;
            }
            Expr::SetCompr {
                span,
                term,
                generators,
            } => {
                self.set_line(span);
                self.emit(Instr::BuildSet(0));
                let depth = generators.len() as u32;
                self.compile_comprehension(generators, &mut |c| {
                    c.compile_expr(term)?;
                    c.emit(Instr::SetAdd(depth));
                    Ok(())
                })?;
            }
            Expr::DictCompr {
                span,
                key,
                value,
                generators,
            } => {
                self.set_line(span);
                self.emit(Instr::BuildDict(0));
                let depth = generators.len() as u32;
                self.compile_comprehension(generators, &mut |c| {
                    c.compile_expr(key)?;
                    c.compile_expr(value)?;
                    c.emit(Instr::MapAdd(depth));
                    Ok(())
                })?;
            }
            Expr::BoolExpr { span, op, values } => {
                self.set_line(span);
                let mut jumps = vec![];
                for (i, value) in values.iter().enumerate() {
                    self.compile_expr(value)?;
                    if i + 1 < values.len() {
                        let at = match op {
                            BoolOp::And => self.emit(Instr::JumpIfFalseOrPop(0)),
                            BoolOp::Or => self.emit(Instr::JumpIfTrueOrPop(0)),
                        };
                        jumps.push(at);
                    }
                }
                let end = self.here();
                for j in jumps {
                    self.patch(j, end);
                }
            }
            Expr::Unary { span, op, operand } => {
                self.compile_expr(operand)?;
                self.set_line(span);
                self.emit(Instr::Unary(*op));
            }
            Expr::Binary {
                span,
                op,
                left,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.set_line(span);
                self.emit(Instr::Binary(*op));
            }
            Expr::Compare { span, left, ops } => {
                self.set_line(span);
                self.compile_compare(left, ops)?;
            }
            Expr::Ternary {
                span,
                test,
                body,
                orelse,
            } => {
                self.set_line(span);
                self.compile_expr(test)?;
                let jump_else = self.emit(Instr::PopJumpIfFalse(0));
                self.compile_expr(body)?;
                let jump_end = self.emit(Instr::Jump(0));
                let target = self.here();
                self.patch(jump_else, target);
                self.compile_expr(orelse)?;
                let end = self.here();
                self.patch(jump_end, end);
            }
            Expr::Lambda { span, .. } => {
                self.set_line(span);
                let c = self.const_idx(Value::Function(Rc::new(FunctionDef {
                    name: Rc::from("<lambda>"),
                })));
                self.emit(Instr::LoadConst(c));
            }
            Expr::Call {
                span,
                func,
                args,
                keywords,
            } => {
                self.compile_expr(func)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let kwnames = if keywords.is_empty() {
                    None
                } else {
                    let names: Vec<Value> = keywords
                        .iter()
                        .map(|(name, _)| Value::from(name.text()))
                        .collect();
                    for (_, value) in keywords {
                        self.compile_expr(value)?;
                    }
                    Some(self.const_idx(Value::new_tuple(names)))
                };
                self.set_line(span);
                self.emit(Instr::Call {
                    argc: args.len() as u32,
                    kwnames,
                });
            }
            Expr::Attribute { span, value, attr } => {
                self.compile_expr(value)?;
                self.set_line(span);
                let n = self.name_idx(attr.text());
                self.emit(Instr::LoadAttr(n));
            }
            Expr::Subscript { span, value, index } => {
                self.compile_expr(value)?;
                self.compile_subscript_index(index)?;
                self.set_line(span);
                self.emit(Instr::LoadSubscript);
            }
            Expr::SliceExpr { .. } => {
                self.compile_subscript_index(expr)?;
            }
        }
        Ok(())
    }

    fn compile_subscript_index(&mut self, index: &Expr) -> Result<()> {
        if let Expr::SliceExpr {
            span,
            lower,
            upper,
            step,
        } = index
        {
            self.set_line(span);
            match lower {
                Some(e) => self.compile_expr(e)?,
                None => {
                    let none = self.const_idx(Value::None);
                    self.emit(Instr::LoadConst(none));
                }
            }
            match upper {
                Some(e) => self.compile_expr(e)?,
                None => {
                    let none = self.const_idx(Value::None);
                    self.emit(Instr::LoadConst(none));
                }
            }
            match step {
                Some(e) => {
                    self.compile_expr(e)?;
                    self.emit(Instr::BuildSlice(3));
                }
                None => {
                    self.emit(Instr::BuildSlice(2));
                }
            }
            Ok(())
        } else {
            self.compile_expr(index)
        }
    }

    fn compile_compare(&mut self, left: &Expr, ops: &[(CompareOp, Expr)]) -> Result<()> {
        self.compile_expr(left)?;
        if ops.len() == 1 {
            let (op, rhs) = &ops[0];
            self.compile_expr(rhs)?;
            self.emit(Instr::Compare(*op));
            return Ok(());
        }
        // Chained comparison: each operand is evaluated at most once, and
        // the chain short-circuits on the first false link.
        let mut cleanup_jumps = vec![];
        let mut end_jumps = vec![];
        for (i, (op, rhs)) in ops.iter().enumerate() {
            self.compile_expr(rhs)?;
            if i + 1 < ops.len() {
                self.emit(Instr::Dup);
                self.emit(Instr::Rot3);
                self.emit(Instr::Compare(*op));
                cleanup_jumps.push(self.emit(Instr::JumpIfFalseOrPop(0)));
            } else {
                self.emit(Instr::Compare(*op));
                end_jumps.push(self.emit(Instr::Jump(0)));
            }
        }
        let cleanup = self.here();
        for j in cleanup_jumps {
            self.patch(j, cleanup);
        }
        self.emit(Instr::Rot2);
        self.emit(Instr::Pop);
        let end = self.here();
        for j in end_jumps {
            self.patch(j, end);
        }
        Ok(())
    }

    /// Nested comprehension loops; `emit_term` produces and accumulates
    /// the innermost term.
    fn compile_comprehension(
        &mut self,
        generators: &[Comprehension],
        emit_term: &mut dyn FnMut(&mut Compiler) -> Result<()>,
    ) -> Result<()> {
        self.emit(Instr::EnterScope);
        self.compile_generator_level(generators, 0, emit_term)?;
        self.emit(Instr::ExitScope);
        Ok(())
    }

    fn compile_generator_level(
        &mut self,
        generators: &[Comprehension],
        level: usize,
        emit_term: &mut dyn FnMut(&mut Compiler) -> Result<()>,
    ) -> Result<()> {
        if level == generators.len() {
            return emit_term(self);
        }
        let generator = &generators[level];
        self.compile_expr(&generator.iter)?;
        self.emit(Instr::GetIter);
        let start = self.here();
        let for_iter = self.emit(Instr::ForIter(0));
        self.compile_store(&generator.target)?;
        for condition in &generator.conditions {
            self.compile_expr(condition)?;
            self.emit(Instr::PopJumpIfFalse(start));
        }
        self.compile_generator_level(generators, level + 1, emit_term)?;
        self.emit(Instr::Jump(start));
        let done = self.here();
        self.patch(for_iter, done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Source;
    use crate::parser::Parser;

    fn compile(code: &str) -> Result<Program> {
        let source = Source::from_contents("test.py".to_string(), code.to_string())?;
        let stmts = Parser::new(&source)?.parse_module()?;
        Compiler::new(source, "test.py").compile_module(&stmts)
    }

    #[test]
    fn trailing_expression_returns() {
        let program = compile("x = 1\nx + 2\n").unwrap();
        assert_eq!(program.instrs.last(), Some(&Instr::Return));
        // The final expression is not popped.
        let pops = program
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::Pop))
            .count();
        assert_eq!(pops, 0);
    }

    #[test]
    fn non_expression_tail_returns_none() {
        let program = compile("x = 1\n").unwrap();
        let n = program.instrs.len();
        assert_eq!(program.instrs[n - 1], Instr::Return);
        assert!(matches!(program.instrs[n - 2], Instr::LoadConst(_)));
    }

    #[test]
    fn loop_has_conditional_exit() {
        let program = compile("while x:\n    y = 1\n").unwrap();
        assert!(program
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::PopJumpIfFalse(_))));
    }

    #[test]
    fn try_emits_block_instructions() {
        let program = compile("try:\n    x()\nexcept ValueError:\n    pass\n").unwrap();
        assert!(program
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::PushExcept(_))));
        assert!(program
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::PushHandled)));
        assert!(program
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::CheckExcMatch)));
        assert!(program.instrs.iter().any(|i| matches!(i, Instr::ReRaise)));
    }

    #[test]
    fn lines_track_instructions() {
        let program = compile("x = 1\ny = 2\n").unwrap();
        assert_eq!(program.instrs.len(), program.lines.len());
        assert!(program.lines.contains(&1));
        assert!(program.lines.contains(&2));
    }

    #[test]
    fn comprehension_scopes() {
        let program = compile("[x for x in y]\n").unwrap();
        assert!(program
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::EnterScope)));
        assert!(program.instrs.iter().any(|i| matches!(i, Instr::ExitScope)));
        assert!(program
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::ListAppend(1))));
    }
}
