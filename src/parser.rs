// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::exceptions::Result;
use crate::lexer::*;

const KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Recursive-descent parser for the script subset.
///
/// Statement structure comes from `Newline`/`Indent`/`Dedent` tokens; the
/// expression grammar is standard precedence climbing. `def`/`lambda`
/// bodies are parsed for validity and discarded, since user-defined
/// functions never execute.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    tok: Token,
    function_depth: usize,
    loop_depth: usize,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            lexer,
            tok,
            function_depth: 0,
            loop_depth: 0,
        })
    }

    pub fn parse_module(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![];
        loop {
            match self.tok.kind {
                TokenKind::Eof => break,
                TokenKind::Newline => self.advance()?,
                _ => self.parse_stmt_line(&mut stmts)?,
            }
        }
        Ok(stmts)
    }

    fn advance(&mut self) -> Result<()> {
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn take(&mut self) -> Result<Token> {
        let tok = self.tok.clone();
        self.advance()?;
        Ok(tok)
    }

    fn token_text(&self) -> &str {
        match self.tok.kind {
            TokenKind::Ident | TokenKind::Symbol => self.tok.span.text(),
            _ => "",
        }
    }

    fn is_symbol(&self, sym: &str) -> bool {
        self.tok.kind == TokenKind::Symbol && self.tok.span.text() == sym
    }

    fn is_ident(&self, text: &str) -> bool {
        self.tok.kind == TokenKind::Ident && self.tok.span.text() == text
    }

    fn eat_symbol(&mut self, sym: &str) -> Result<bool> {
        if self.is_symbol(sym) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_ident(&mut self, text: &str) -> Result<bool> {
        if self.is_ident(text) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<Span> {
        if self.is_symbol(sym) {
            let span = self.tok.span.clone();
            self.advance()?;
            Ok(span)
        } else {
            Err(self.tok.span.error(&format!("expected '{sym}'")))
        }
    }

    fn expect_ident_kw(&mut self, text: &str) -> Result<Span> {
        if self.is_ident(text) {
            let span = self.tok.span.clone();
            self.advance()?;
            Ok(span)
        } else {
            Err(self.tok.span.error(&format!("expected '{text}'")))
        }
    }

    fn expect_name(&mut self) -> Result<Span> {
        if self.tok.kind == TokenKind::Ident && !KEYWORDS.contains(&self.tok.span.text()) {
            let span = self.tok.span.clone();
            self.advance()?;
            Ok(span)
        } else {
            Err(self.tok.span.error("expected a name"))
        }
    }

    fn expect_newline(&mut self) -> Result<()> {
        match self.tok.kind {
            TokenKind::Newline => self.advance(),
            TokenKind::Eof => Ok(()),
            _ => Err(self.tok.span.error("invalid syntax")),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_stmt_line(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        if self.tok.kind == TokenKind::Ident {
            let compound = match self.tok.span.text() {
                "if" => Some(self.parse_if()?),
                "while" => Some(self.parse_while()?),
                "for" => Some(self.parse_for()?),
                "try" => Some(self.parse_try()?),
                "with" => Some(self.parse_with()?),
                "def" => Some(self.parse_def()?),
                "class" => {
                    return Err(self.tok.span.error("class definitions are not supported"))
                }
                "async" | "await" | "yield" => {
                    return Err(self.tok.span.error("invalid syntax"))
                }
                _ => None,
            };
            if let Some(stmt) = compound {
                out.push(stmt);
                return Ok(());
            }
        }
        loop {
            out.push(self.parse_simple_stmt()?);
            if !self.eat_symbol(";")? {
                break;
            }
            if matches!(self.tok.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
        }
        self.expect_newline()
    }

    /// Parses `: NEWLINE INDENT stmt+ DEDENT` or an inline `: stmt` body.
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_symbol(":")?;
        let mut body = vec![];
        if self.tok.kind == TokenKind::Newline {
            self.advance()?;
            while self.tok.kind == TokenKind::Newline {
                self.advance()?;
            }
            if self.tok.kind != TokenKind::Indent {
                return Err(self.tok.span.error("expected an indented block"));
            }
            self.advance()?;
            loop {
                match self.tok.kind {
                    TokenKind::Dedent => {
                        self.advance()?;
                        break;
                    }
                    TokenKind::Newline => self.advance()?,
                    TokenKind::Eof => break,
                    _ => self.parse_stmt_line(&mut body)?,
                }
            }
        } else {
            self.parse_stmt_line(&mut body)?;
        }
        if body.is_empty() {
            return Err(self.tok.span.error("expected an indented block"));
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let span = self.expect_ident_kw("if")?;
        let test = self.parse_expr()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_tail()?;
        Ok(Stmt::If {
            span,
            test,
            body,
            orelse,
        })
    }

    fn parse_else_tail(&mut self) -> Result<Vec<Stmt>> {
        if self.is_ident("elif") {
            let span = self.take()?.span;
            let test = self.parse_expr()?;
            let body = self.parse_block()?;
            let orelse = self.parse_else_tail()?;
            Ok(vec![Stmt::If {
                span,
                test,
                body,
                orelse,
            }])
        } else if self.eat_ident("else")? {
            self.parse_block()
        } else {
            Ok(vec![])
        }
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let span = self.expect_ident_kw("while")?;
        let test = self.parse_expr()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        let body = body?;
        let orelse = if self.eat_ident("else")? {
            self.parse_block()?
        } else {
            vec![]
        };
        Ok(Stmt::While {
            span,
            test,
            body,
            orelse,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let span = self.expect_ident_kw("for")?;
        let target = self.parse_target_list()?;
        self.expect_ident_kw("in")?;
        let iter = self.parse_expr_list()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        let body = body?;
        let orelse = if self.eat_ident("else")? {
            self.parse_block()?
        } else {
            vec![]
        };
        Ok(Stmt::For {
            span,
            target,
            iter,
            body,
            orelse,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        let span = self.expect_ident_kw("try")?;
        let body = self.parse_block()?;
        let mut handlers = vec![];
        let mut saw_bare = false;
        while self.is_ident("except") {
            let hspan = self.take()?.span;
            if saw_bare {
                return Err(hspan.error("default 'except:' must be last"));
            }
            let (class, name) = if self.is_symbol(":") {
                saw_bare = true;
                (None, None)
            } else {
                let class = self.parse_expr()?;
                let name = if self.eat_ident("as")? {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(class), name)
            };
            let hbody = self.parse_block()?;
            handlers.push(ExceptHandler {
                span: hspan,
                class,
                name,
                body: hbody,
            });
        }
        let orelse = if self.eat_ident("else")? {
            if handlers.is_empty() {
                return Err(span.error("'else' clause requires 'except'"));
            }
            self.parse_block()?
        } else {
            vec![]
        };
        let finalbody = if self.eat_ident("finally")? {
            self.parse_block()?
        } else {
            vec![]
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(span.error("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::Try {
            span,
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn parse_with(&mut self) -> Result<Stmt> {
        let span = self.expect_ident_kw("with")?;
        let mut items = vec![];
        loop {
            let context = self.parse_expr()?;
            let target = if self.eat_ident("as")? {
                let t = self.parse_primary_target()?;
                Some(t)
            } else {
                None
            };
            items.push((context, target));
            if !self.eat_symbol(",")? {
                break;
            }
        }
        let body = self.parse_block()?;
        // Multiple context managers nest inside-out.
        let mut stmt = None;
        for (context, target) in items.into_iter().rev() {
            let inner = match stmt.take() {
                Some(s) => vec![s],
                None => body.clone(),
            };
            stmt = Some(Stmt::With {
                span: span.clone(),
                context,
                target,
                body: inner,
            });
        }
        Ok(stmt.expect("with has at least one item"))
    }

    fn parse_def(&mut self) -> Result<Stmt> {
        let span = self.expect_ident_kw("def")?;
        let name = self.expect_name()?;
        self.expect_symbol("(")?;
        let mut params = vec![];
        while !self.is_symbol(")") {
            let pname = self.expect_name()?;
            if self.eat_symbol(":")? {
                // Annotations are validated and discarded.
                self.parse_expr()?;
            }
            if self.eat_symbol("=")? {
                self.parse_expr()?;
            }
            params.push(pname);
            if !self.eat_symbol(",")? {
                break;
            }
        }
        self.expect_symbol(")")?;
        if self.eat_symbol("->")? {
            self.parse_expr()?;
        }
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        body?;
        Ok(Stmt::FunctionDef { span, name, params })
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt> {
        if self.tok.kind == TokenKind::Ident {
            let span = self.tok.span.clone();
            match self.tok.span.text() {
                "pass" => {
                    self.advance()?;
                    return Ok(Stmt::Pass);
                }
                "break" => {
                    self.advance()?;
                    if self.loop_depth == 0 {
                        return Err(span.error("'break' outside loop"));
                    }
                    return Ok(Stmt::Break { span });
                }
                "continue" => {
                    self.advance()?;
                    if self.loop_depth == 0 {
                        return Err(span.error("'continue' not properly in loop"));
                    }
                    return Ok(Stmt::Continue { span });
                }
                "return" => {
                    self.advance()?;
                    if self.function_depth == 0 {
                        return Err(span.error("'return' outside function"));
                    }
                    if !matches!(self.tok.kind, TokenKind::Newline | TokenKind::Eof)
                        && !self.is_symbol(";")
                    {
                        self.parse_expr_list()?;
                    }
                    // Inside an inert `def` body; nothing to keep.
                    return Ok(Stmt::Pass);
                }
                "raise" => {
                    self.advance()?;
                    let exc = if matches!(self.tok.kind, TokenKind::Newline | TokenKind::Eof)
                        || self.is_symbol(";")
                    {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    let cause = if exc.is_some() && self.eat_ident("from")? {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    return Ok(Stmt::Raise { span, exc, cause });
                }
                "assert" => {
                    self.advance()?;
                    let test = self.parse_expr()?;
                    let msg = if self.eat_symbol(",")? {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    return Ok(Stmt::Assert { span, test, msg });
                }
                "import" => {
                    self.advance()?;
                    let module = self.parse_module_name()?;
                    let asname = if self.eat_ident("as")? {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    return Ok(Stmt::Import {
                        span,
                        module,
                        asname,
                    });
                }
                "from" => {
                    self.advance()?;
                    let module = self.parse_module_name()?;
                    self.expect_ident_kw("import")?;
                    let mut names = vec![];
                    loop {
                        let name = self.expect_name()?;
                        let asname = if self.eat_ident("as")? {
                            Some(self.expect_name()?)
                        } else {
                            None
                        };
                        names.push((name, asname));
                        if !self.eat_symbol(",")? {
                            break;
                        }
                    }
                    return Ok(Stmt::FromImport {
                        span,
                        module,
                        names,
                    });
                }
                "global" => {
                    self.advance()?;
                    let mut names = vec![self.expect_name()?];
                    while self.eat_symbol(",")? {
                        names.push(self.expect_name()?);
                    }
                    return Ok(Stmt::Global { span, names });
                }
                "nonlocal" => {
                    if self.function_depth == 0 {
                        return Err(span.error("nonlocal declaration not allowed at module level"));
                    }
                    self.advance()?;
                    let mut names = vec![self.expect_name()?];
                    while self.eat_symbol(",")? {
                        names.push(self.expect_name()?);
                    }
                    // Inside an inert `def` body; nothing to keep.
                    return Ok(Stmt::Pass);
                }
                "del" => {
                    self.advance()?;
                    let mut targets = vec![self.parse_primary_target()?];
                    while self.eat_symbol(",")? {
                        targets.push(self.parse_primary_target()?);
                    }
                    return Ok(Stmt::Del { span, targets });
                }
                _ => {}
            }
        }
        self.parse_expr_or_assign()
    }

    fn parse_module_name(&mut self) -> Result<Span> {
        let first = self.expect_name()?;
        let mut span = first;
        while self.is_symbol(".") {
            self.advance()?;
            let next = self.expect_name()?;
            span = Span {
                source: span.source.clone(),
                line: span.line,
                col: span.col,
                start: span.start,
                end: next.end,
            };
        }
        Ok(span)
    }

    fn parse_expr_or_assign(&mut self) -> Result<Stmt> {
        let span = self.tok.span.clone();
        let first = self.parse_expr_list()?;

        if let Some(op) = self.aug_assign_op() {
            self.advance()?;
            self.check_target(&first, false)?;
            let value = self.parse_expr_list()?;
            return Ok(Stmt::AugAssign {
                span,
                target: first,
                op,
                value,
            });
        }

        if self.is_symbol("=") {
            let mut targets = vec![first];
            let mut value = None;
            while self.eat_symbol("=")? {
                let next = self.parse_expr_list()?;
                if let Some(prev) = value.replace(next) {
                    targets.push(prev);
                }
            }
            let value = value.expect("at least one right-hand side");
            for target in &targets {
                self.check_target(target, true)?;
            }
            return Ok(Stmt::Assign {
                span,
                targets,
                value,
            });
        }

        Ok(Stmt::Expr { value: first })
    }

    fn aug_assign_op(&self) -> Option<BinaryOp> {
        if self.tok.kind != TokenKind::Symbol {
            return None;
        }
        Some(match self.tok.span.text() {
            "+=" => BinaryOp::Add,
            "-=" => BinaryOp::Sub,
            "*=" => BinaryOp::Mul,
            "/=" => BinaryOp::Div,
            "//=" => BinaryOp::FloorDiv,
            "%=" => BinaryOp::Mod,
            "**=" => BinaryOp::Pow,
            "&=" => BinaryOp::BitAnd,
            "|=" => BinaryOp::BitOr,
            "^=" => BinaryOp::BitXor,
            "<<=" => BinaryOp::Shl,
            ">>=" => BinaryOp::Shr,
            _ => return None,
        })
    }

    fn check_target(&self, expr: &Expr, allow_unpack: bool) -> Result<()> {
        match expr {
            Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => Ok(()),
            Expr::Tuple { items, span } | Expr::List { items, span } => {
                if !allow_unpack {
                    return Err(span
                        .error("'tuple' is an illegal expression for augmented assignment"));
                }
                for item in items {
                    self.check_target(item, true)?;
                }
                Ok(())
            }
            other => Err(other.span().error("cannot assign to expression")),
        }
    }

    /// A single assignable target (for `del`, `with ... as`).
    fn parse_primary_target(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        self.check_target(&expr, true)?;
        Ok(expr)
    }

    /// `for` targets: `x`, `x, y`, `(x, y)` etc.
    fn parse_target_list(&mut self) -> Result<Expr> {
        let span = self.tok.span.clone();
        let first = self.parse_postfix()?;
        if self.is_symbol(",") {
            let mut items = vec![first];
            while self.eat_symbol(",")? {
                if self.is_ident("in") {
                    break;
                }
                items.push(self.parse_postfix()?);
            }
            let tuple = Expr::Tuple { span, items };
            self.check_target(&tuple, true)?;
            Ok(tuple)
        } else {
            self.check_target(&first, true)?;
            Ok(first)
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// `expr (',' expr)*` — a tuple when a comma appears.
    fn parse_expr_list(&mut self) -> Result<Expr> {
        let span = self.tok.span.clone();
        let first = self.parse_expr()?;
        if !self.is_symbol(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_symbol(",")? {
            if self.expr_list_ends() {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple { span, items })
    }

    fn expr_list_ends(&self) -> bool {
        matches!(self.tok.kind, TokenKind::Newline | TokenKind::Eof)
            || self.is_symbol("=")
            || self.is_symbol(")")
            || self.is_symbol("]")
            || self.is_symbol("}")
            || self.is_symbol(";")
            || self.is_symbol(":")
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        if self.is_ident("lambda") {
            return self.parse_lambda();
        }
        let span = self.tok.span.clone();
        let body = self.parse_or()?;
        if self.eat_ident("if")? {
            let test = self.parse_or()?;
            self.expect_ident_kw("else")?;
            let orelse = self.parse_expr()?;
            return Ok(Expr::Ternary {
                span,
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        let span = self.expect_ident_kw("lambda")?;
        let mut params = vec![];
        while !self.is_symbol(":") {
            params.push(self.expect_name()?);
            if self.eat_symbol("=")? {
                self.parse_expr()?;
            }
            if !self.eat_symbol(",")? {
                break;
            }
        }
        self.expect_symbol(":")?;
        self.function_depth += 1;
        let body = self.parse_expr();
        self.function_depth -= 1;
        body?;
        Ok(Expr::Lambda { span, params })
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let span = self.tok.span.clone();
        let first = self.parse_and()?;
        if !self.is_ident("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_ident("or")? {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolExpr {
            span,
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let span = self.tok.span.clone();
        let first = self.parse_not()?;
        if !self.is_ident("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_ident("and")? {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolExpr {
            span,
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.is_ident("not") {
            let span = self.take()?.span;
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                span,
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Result<Option<CompareOp>> {
        if self.tok.kind == TokenKind::Symbol {
            let op = match self.tok.span.text() {
                "<" => Some(CompareOp::Lt),
                "<=" => Some(CompareOp::Le),
                "==" => Some(CompareOp::Eq),
                "!=" => Some(CompareOp::Ne),
                ">=" => Some(CompareOp::Ge),
                ">" => Some(CompareOp::Gt),
                _ => None,
            };
            if op.is_some() {
                self.advance()?;
            }
            return Ok(op);
        }
        if self.is_ident("in") {
            self.advance()?;
            return Ok(Some(CompareOp::In));
        }
        if self.is_ident("not") {
            // Only `not in` is a comparison; a lone `not` here is an error
            // caught by the caller.
            self.advance()?;
            self.expect_ident_kw("in")?;
            return Ok(Some(CompareOp::NotIn));
        }
        if self.is_ident("is") {
            self.advance()?;
            if self.eat_ident("not")? {
                return Ok(Some(CompareOp::IsNot));
            }
            return Ok(Some(CompareOp::Is));
        }
        Ok(None)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let span = self.tok.span.clone();
        let left = self.parse_bitor()?;
        let mut ops = vec![];
        while let Some(op) = self.comparison_op()? {
            let right = self.parse_bitor()?;
            ops.push((op, right));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                span,
                left: Box::new(left),
                ops,
            })
        }
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        let mut left = self.parse_bitxor()?;
        while self.is_symbol("|") {
            let span = self.take()?.span;
            let right = self.parse_bitxor()?;
            left = Expr::Binary {
                span,
                op: BinaryOp::BitOr,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        let mut left = self.parse_bitand()?;
        while self.is_symbol("^") {
            let span = self.take()?.span;
            let right = self.parse_bitand()?;
            left = Expr::Binary {
                span,
                op: BinaryOp::BitXor,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        let mut left = self.parse_shift()?;
        while self.is_symbol("&") {
            let span = self.take()?.span;
            let right = self.parse_shift()?;
            left = Expr::Binary {
                span,
                op: BinaryOp::BitAnd,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let mut left = self.parse_arith()?;
        loop {
            let op = match self.token_text() {
                "<<" => BinaryOp::Shl,
                ">>" => BinaryOp::Shr,
                _ => break,
            };
            let span = self.take()?.span;
            let right = self.parse_arith()?;
            left = Expr::Binary {
                span,
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.token_text() {
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Sub,
                _ => break,
            };
            let span = self.take()?.span;
            let right = self.parse_term()?;
            left = Expr::Binary {
                span,
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.token_text() {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                "//" => BinaryOp::FloorDiv,
                "%" => BinaryOp::Mod,
                _ => break,
            };
            let span = self.take()?.span;
            let right = self.parse_factor()?;
            left = Expr::Binary {
                span,
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let op = match self.token_text() {
            "-" => Some(UnaryOp::Neg),
            "+" => Some(UnaryOp::Pos),
            "~" => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.take()?.span;
            let operand = self.parse_factor()?;
            return Ok(Expr::Unary {
                span,
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let left = self.parse_postfix()?;
        if self.is_symbol("**") {
            let span = self.take()?.span;
            // `**` binds tighter than unary on the right: right-associative.
            let right = self.parse_factor()?;
            return Ok(Expr::Binary {
                span,
                op: BinaryOp::Pow,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.is_symbol("(") {
                expr = self.parse_call(expr)?;
            } else if self.is_symbol("[") {
                let span = self.take()?.span;
                let index = self.parse_subscript_index()?;
                self.expect_symbol("]")?;
                expr = Expr::Subscript {
                    span,
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.is_symbol(".") {
                let span = self.take()?.span;
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    span,
                    value: Box::new(expr),
                    attr,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_subscript_index(&mut self) -> Result<Expr> {
        let span = self.tok.span.clone();
        let lower = if self.is_symbol(":") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if !self.is_symbol(":") {
            return Ok(*lower.expect("non-slice subscript has an index"));
        }
        self.advance()?;
        let upper = if self.is_symbol(":") || self.is_symbol("]") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let step = if self.eat_symbol(":")? {
            if self.is_symbol("]") {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            }
        } else {
            None
        };
        Ok(Expr::SliceExpr {
            span,
            lower,
            upper,
            step,
        })
    }

    fn parse_call(&mut self, func: Expr) -> Result<Expr> {
        let span = self.expect_symbol("(")?;
        let mut args = vec![];
        let mut keywords: Vec<(Span, Expr)> = vec![];
        while !self.is_symbol(")") {
            // `name=expr` is a keyword argument; need one-token lookahead
            // distinguishing it from an expression starting with a name.
            if self.tok.kind == TokenKind::Ident && !KEYWORDS.contains(&self.tok.span.text()) {
                let name_span = self.tok.span.clone();
                let save = self.tok.clone();
                self.advance()?;
                if self.is_symbol("=") {
                    self.advance()?;
                    let value = self.parse_expr()?;
                    keywords.push((name_span, value));
                    if !self.eat_symbol(",")? {
                        break;
                    }
                    continue;
                }
                // Not a keyword argument: rewind the name and parse an
                // expression beginning with it.
                let expr = self.parse_postfix_from_name(save)?;
                let expr = self.continue_expr(expr)?;
                if !keywords.is_empty() {
                    return Err(expr
                        .span()
                        .error("positional argument follows keyword argument"));
                }
                if self.is_ident("for") && args.is_empty() {
                    let generators = self.parse_generators()?;
                    args.push(Expr::ListCompr {
                        span: span.clone(),
                        term: Box::new(expr),
                        generators,
                    });
                    break;
                }
                args.push(expr);
                if !self.eat_symbol(",")? {
                    break;
                }
                continue;
            }
            let expr = self.parse_expr()?;
            if !keywords.is_empty() {
                return Err(expr
                    .span()
                    .error("positional argument follows keyword argument"));
            }
            if self.is_ident("for") && args.is_empty() {
                let generators = self.parse_generators()?;
                args.push(Expr::ListCompr {
                    span: span.clone(),
                    term: Box::new(expr),
                    generators,
                });
                break;
            }
            args.push(expr);
            if !self.eat_symbol(",")? {
                break;
            }
        }
        self.expect_symbol(")")?;
        Ok(Expr::Call {
            span,
            func: Box::new(func),
            args,
            keywords,
        })
    }

    /// Resumes expression parsing after a consumed leading name token.
    fn parse_postfix_from_name(&mut self, name: Token) -> Result<Expr> {
        let mut expr = Expr::Name(name.span);
        loop {
            if self.is_symbol("(") {
                expr = self.parse_call(expr)?;
            } else if self.is_symbol("[") {
                let span = self.take()?.span;
                let index = self.parse_subscript_index()?;
                self.expect_symbol("]")?;
                expr = Expr::Subscript {
                    span,
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.is_symbol(".") {
                let span = self.take()?.span;
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    span,
                    value: Box::new(expr),
                    attr,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Continues precedence climbing with `expr` as the leftmost operand.
    fn continue_expr(&mut self, mut expr: Expr) -> Result<Expr> {
        if self.is_symbol("**") {
            let span = self.take()?.span;
            let right = self.parse_factor()?;
            expr = Expr::Binary {
                span,
                op: BinaryOp::Pow,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        loop {
            let op = match self.token_text() {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                "//" => BinaryOp::FloorDiv,
                "%" => BinaryOp::Mod,
                _ => break,
            };
            let span = self.take()?.span;
            let right = self.parse_factor()?;
            expr = Expr::Binary {
                span,
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        loop {
            let op = match self.token_text() {
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Sub,
                _ => break,
            };
            let span = self.take()?.span;
            let right = self.parse_term()?;
            expr = Expr::Binary {
                span,
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        loop {
            let op = match self.token_text() {
                "<<" => BinaryOp::Shl,
                ">>" => BinaryOp::Shr,
                _ => break,
            };
            let span = self.take()?.span;
            let right = self.parse_arith()?;
            expr = Expr::Binary {
                span,
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        while self.is_symbol("&") {
            let span = self.take()?.span;
            let right = self.parse_shift()?;
            expr = Expr::Binary {
                span,
                op: BinaryOp::BitAnd,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        while self.is_symbol("^") {
            let span = self.take()?.span;
            let right = self.parse_bitand()?;
            expr = Expr::Binary {
                span,
                op: BinaryOp::BitXor,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        while self.is_symbol("|") {
            let span = self.take()?.span;
            let right = self.parse_bitxor()?;
            expr = Expr::Binary {
                span,
                op: BinaryOp::BitOr,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        let mut ops = vec![];
        let span = expr.span().clone();
        while let Some(op) = self.comparison_op()? {
            let right = self.parse_bitor()?;
            ops.push((op, right));
        }
        if !ops.is_empty() {
            expr = Expr::Compare {
                span: span.clone(),
                left: Box::new(expr),
                ops,
            };
        }
        if self.is_ident("and") {
            let mut values = vec![expr];
            while self.eat_ident("and")? {
                values.push(self.parse_not()?);
            }
            expr = Expr::BoolExpr {
                span: span.clone(),
                op: BoolOp::And,
                values,
            };
        }
        if self.is_ident("or") {
            let mut values = vec![expr];
            while self.eat_ident("or")? {
                values.push(self.parse_and()?);
            }
            expr = Expr::BoolExpr {
                span: span.clone(),
                op: BoolOp::Or,
                values,
            };
        }
        if self.eat_ident("if")? {
            let test = self.parse_or()?;
            self.expect_ident_kw("else")?;
            let orelse = self.parse_expr()?;
            expr = Expr::Ternary {
                span,
                test: Box::new(test),
                body: Box::new(expr),
                orelse: Box::new(orelse),
            };
        }
        Ok(expr)
    }

    fn parse_generators(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = vec![];
        while self.is_ident("for") {
            self.advance()?;
            let target = self.parse_target_list()?;
            self.expect_ident_kw("in")?;
            let iter = self.parse_or()?;
            let mut conditions = vec![];
            while self.eat_ident("if")? {
                conditions.push(self.parse_or()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let span = self.tok.span.clone();
        match self.tok.kind {
            TokenKind::Int => {
                let value = match self.tok.literal {
                    Literal::Int(v) => v,
                    _ => return Err(span.error("invalid number literal")),
                };
                self.advance()?;
                Ok(Expr::Int { span, value })
            }
            TokenKind::Float => {
                let value = match self.tok.literal {
                    Literal::Float(v) => v,
                    _ => return Err(span.error("invalid number literal")),
                };
                self.advance()?;
                Ok(Expr::Float { span, value })
            }
            TokenKind::Str => {
                let mut value = match &self.tok.literal {
                    Literal::Str(s) => s.to_string(),
                    _ => return Err(span.error("invalid string literal")),
                };
                self.advance()?;
                // Adjacent string literals concatenate.
                while self.tok.kind == TokenKind::Str {
                    match &self.tok.literal {
                        Literal::Str(s) => value.push_str(s),
                        _ => break,
                    }
                    self.advance()?;
                }
                Ok(Expr::Str {
                    span,
                    value: value.as_str().into(),
                })
            }
            TokenKind::Bytes => {
                let value = match &self.tok.literal {
                    Literal::Bytes(b) => b.clone(),
                    _ => return Err(span.error("invalid bytes literal")),
                };
                self.advance()?;
                Ok(Expr::Bytes { span, value })
            }
            TokenKind::Ident => match self.tok.span.text() {
                "None" => {
                    self.advance()?;
                    Ok(Expr::None(span))
                }
                "True" => {
                    self.advance()?;
                    Ok(Expr::True(span))
                }
                "False" => {
                    self.advance()?;
                    Ok(Expr::False(span))
                }
                "lambda" => self.parse_lambda(),
                kw if KEYWORDS.contains(&kw) => Err(span.error("invalid syntax")),
                _ => {
                    self.advance()?;
                    Ok(Expr::Name(span))
                }
            },
            TokenKind::Symbol => match self.tok.span.text() {
                "(" => self.parse_paren(),
                "[" => self.parse_list_display(),
                "{" => self.parse_braces(),
                _ => Err(span.error("invalid syntax")),
            },
            _ => Err(span.error("invalid syntax")),
        }
    }

    fn parse_paren(&mut self) -> Result<Expr> {
        let span = self.expect_symbol("(")?;
        if self.eat_symbol(")")? {
            return Ok(Expr::Tuple { span, items: vec![] });
        }
        let first = self.parse_expr()?;
        if self.is_ident("for") {
            let generators = self.parse_generators()?;
            self.expect_symbol(")")?;
            return Ok(Expr::ListCompr {
                span,
                term: Box::new(first),
                generators,
            });
        }
        if self.is_symbol(",") {
            let mut items = vec![first];
            while self.eat_symbol(",")? {
                if self.is_symbol(")") {
                    break;
                }
                items.push(self.parse_expr()?);
            }
            self.expect_symbol(")")?;
            return Ok(Expr::Tuple { span, items });
        }
        self.expect_symbol(")")?;
        Ok(first)
    }

    fn parse_list_display(&mut self) -> Result<Expr> {
        let span = self.expect_symbol("[")?;
        if self.eat_symbol("]")? {
            return Ok(Expr::List { span, items: vec![] });
        }
        let first = self.parse_expr()?;
        if self.is_ident("for") {
            let generators = self.parse_generators()?;
            self.expect_symbol("]")?;
            return Ok(Expr::ListCompr {
                span,
                term: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_symbol(",")? {
            if self.is_symbol("]") {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect_symbol("]")?;
        Ok(Expr::List { span, items })
    }

    fn parse_braces(&mut self) -> Result<Expr> {
        let span = self.expect_symbol("{")?;
        if self.eat_symbol("}")? {
            return Ok(Expr::Dict { span, pairs: vec![] });
        }
        let first = self.parse_expr()?;
        if self.eat_symbol(":")? {
            let value = self.parse_expr()?;
            if self.is_ident("for") {
                let generators = self.parse_generators()?;
                self.expect_symbol("}")?;
                return Ok(Expr::DictCompr {
                    span,
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            let mut pairs = vec![(first, value)];
            while self.eat_symbol(",")? {
                if self.is_symbol("}") {
                    break;
                }
                let k = self.parse_expr()?;
                self.expect_symbol(":")?;
                let v = self.parse_expr()?;
                pairs.push((k, v));
            }
            self.expect_symbol("}")?;
            return Ok(Expr::Dict { span, pairs });
        }
        if self.is_ident("for") {
            let generators = self.parse_generators()?;
            self.expect_symbol("}")?;
            return Ok(Expr::SetCompr {
                span,
                term: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_symbol(",")? {
            if self.is_symbol("}") {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect_symbol("}")?;
        Ok(Expr::Set { span, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> Result<Vec<Stmt>> {
        let source = Source::from_contents("test.py".to_string(), code.to_string())?;
        Parser::new(&source)?.parse_module()
    }

    #[test]
    fn simple_statements() {
        let stmts = parse("x = 1\ny = x + 2\ny\n").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Stmt::Assign { .. }));
        assert!(matches!(stmts[2], Stmt::Expr { .. }));
    }

    #[test]
    fn compound_statements() {
        let stmts = parse(
            "if a:\n    b = 1\nelif c:\n    b = 2\nelse:\n    b = 3\nwhile b:\n    break\n",
        )
        .unwrap();
        assert_eq!(stmts.len(), 2);
        match &stmts[0] {
            Stmt::If { orelse, .. } => assert!(matches!(orelse[0], Stmt::If { .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn try_except_finally() {
        let stmts =
            parse("try:\n    x()\nexcept ValueError as e:\n    pass\nfinally:\n    y = 1\n")
                .unwrap();
        match &stmts[0] {
            Stmt::Try {
                handlers,
                finalbody,
                ..
            } => {
                assert_eq!(handlers.len(), 1);
                assert!(handlers[0].name.is_some());
                assert_eq!(finalbody.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn call_args_and_kwargs() {
        let stmts = parse("func(1, 2, x='hello', y=True)\n").unwrap();
        match &stmts[0] {
            Stmt::Expr {
                value: Expr::Call { args, keywords, .. },
            } => {
                assert_eq!(args.len(), 2);
                assert_eq!(keywords.len(), 2);
                assert_eq!(keywords[0].0.text(), "x");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn positional_after_keyword_rejected() {
        let err = parse("func(a=1, 2)\n").unwrap_err();
        let exc = &err;
        assert_eq!(
            exc.message(),
            "positional argument follows keyword argument"
        );
    }

    #[test]
    fn chained_comparison() {
        let stmts = parse("1 < x <= 10\n").unwrap();
        match &stmts[0] {
            Stmt::Expr {
                value: Expr::Compare { ops, .. },
            } => assert_eq!(ops.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn comprehension_forms() {
        let stmts = parse("[x * 2 for x in xs if x]\n{x for x in xs}\n{k: v for k, v in xs}\n")
            .unwrap();
        assert!(matches!(
            stmts[0],
            Stmt::Expr {
                value: Expr::ListCompr { .. }
            }
        ));
        assert!(matches!(
            stmts[1],
            Stmt::Expr {
                value: Expr::SetCompr { .. }
            }
        ));
        assert!(matches!(
            stmts[2],
            Stmt::Expr {
                value: Expr::DictCompr { .. }
            }
        ));
    }

    #[test]
    fn slices() {
        let stmts = parse("a[1:2:3]\na[:2]\na[::2]\na[1]\n").unwrap();
        assert_eq!(stmts.len(), 4);
        match &stmts[3] {
            Stmt::Expr {
                value: Expr::Subscript { index, .. },
            } => assert!(matches!(**index, Expr::Int { .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nonlocal_at_module_scope_is_syntax_error() {
        let err = parse("nonlocal x\n").unwrap_err();
        let exc = &err;
        assert_eq!(exc.class(), crate::exceptions::ExcType::SyntaxError);
        assert_eq!(
            exc.message(),
            "nonlocal declaration not allowed at module level"
        );
    }

    #[test]
    fn return_outside_function_is_syntax_error() {
        let err = parse("return 1\n").unwrap_err();
        let exc = &err;
        assert_eq!(exc.message(), "'return' outside function");
    }

    #[test]
    fn def_and_lambda_parse_but_stay_inert() {
        let stmts = parse("def f(x, y=1):\n    return x\ng = lambda x: x + 1\n").unwrap();
        assert!(matches!(stmts[0], Stmt::FunctionDef { .. }));
        match &stmts[1] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::Lambda { .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn def_body_rules_apply() {
        assert!(parse("def f():\n    return 1\n").is_ok());
        assert!(parse("def f():\n    nonlocal x\n").is_ok());
    }

    #[test]
    fn multiple_assignment_targets() {
        let stmts = parse("a = b = 1\na, b = 1, 2\n").unwrap();
        match &stmts[0] {
            Stmt::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match &stmts[1] {
            Stmt::Assign { targets, .. } => {
                assert!(matches!(targets[0], Expr::Tuple { .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn imports() {
        let stmts = parse("import os\nfrom pathlib import Path\n").unwrap();
        match &stmts[0] {
            Stmt::Import { module, .. } => assert_eq!(module.text(), "os"),
            other => panic!("unexpected {other:?}"),
        }
        match &stmts[1] {
            Stmt::FromImport { module, names, .. } => {
                assert_eq!(module.text(), "pathlib");
                assert_eq!(names[0].0.text(), "Path");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn break_outside_loop_rejected() {
        let err = parse("break\n").unwrap_err();
        let exc = &err;
        assert_eq!(exc.message(), "'break' outside loop");
    }

    #[test]
    fn genexp_argument() {
        let stmts = parse("sum(x * x for x in xs)\n").unwrap();
        match &stmts[0] {
            Stmt::Expr {
                value: Expr::Call { args, .. },
            } => assert!(matches!(args[0], Expr::ListCompr { .. })),
            other => panic!("unexpected {other:?}"),
        }
    }
}
