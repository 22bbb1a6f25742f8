use crate::lexer::Lexer;
use crate::token::{Tok, TokKind};
use crate::SyntaxError;
use clasp_ast::ast::{Ast, Binding, ExprId, ExprKind, Ident};
use clasp_ast::span::SourceLocation;

/// Maximum nesting depth for expressions.
/// This prevents stack overflow from deeply nested input.
const MAX_NESTING_DEPTH: u32 = 512;

/// Parse one program (a single expression) into an AST arena.
pub fn parse_str(src: &str) -> Result<Ast, SyntaxError> {
    let mut p = Parser::new(src)?;
    let root = p.parse_expr()?;
    if !matches!(p.cur.kind, TokKind::Eof) {
        return Err(p.parse_err("redundant token(s)", p.cur.sl));
    }
    p.ast.set_root(root);
    Ok(p.ast)
}

struct Parser<'a> {
    lex: Lexer<'a>,
    cur: Tok,
    nxt: Tok,
    /// Current nesting depth of parse_expr
    depth: u32,
    ast: Ast,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, SyntaxError> {
        let mut lex = Lexer::new(src);
        let cur = lex.next_tok()?;
        let nxt = lex.next_tok()?;
        Ok(Self {
            lex,
            cur,
            nxt,
            depth: 0,
            ast: Ast::default(),
        })
    }

    fn parse_err(&self, msg: impl Into<String>, sl: SourceLocation) -> SyntaxError {
        SyntaxError::Parse {
            msg: msg.into(),
            sl,
        }
    }

    fn bump(&mut self) -> Result<Tok, SyntaxError> {
        let next = self.lex.next_tok()?;
        Ok(std::mem::replace(
            &mut self.cur,
            std::mem::replace(&mut self.nxt, next),
        ))
    }

    fn at(&self, k: &TokKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(k)
    }

    fn expect(&mut self, k: TokKind) -> Result<Tok, SyntaxError> {
        if self.at(&k) {
            self.bump()
        } else {
            Err(self.parse_err(
                format!("expected {:?}, found {:?}", k, self.cur.kind),
                self.cur.sl,
            ))
        }
    }

    /// Increment depth and check limit
    fn enter_nesting(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.parse_err(
                format!("maximum nesting depth exceeded (limit: {MAX_NESTING_DEPTH})"),
                self.cur.sl,
            ));
        }
        Ok(())
    }

    fn exit_nesting(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn parse_ident(&mut self) -> Result<Ident, SyntaxError> {
        match &self.cur.kind {
            TokKind::Ident(_) => {
                let tok = self.bump()?;
                let TokKind::Ident(text) = tok.kind else {
                    // at() matched on the discriminant above
                    return Err(self.parse_err("expected identifier", tok.sl));
                };
                Ok(Ident { text, sl: tok.sl })
            }
            other => Err(self.parse_err(format!("expected identifier, found {other:?}"), self.cur.sl)),
        }
    }

    fn parse_expr(&mut self) -> Result<ExprId, SyntaxError> {
        self.enter_nesting()?;
        let id = self.parse_expr_inner()?;
        self.exit_nesting();
        Ok(id)
    }

    fn parse_expr_inner(&mut self) -> Result<ExprId, SyntaxError> {
        match &self.cur.kind {
            TokKind::Int(v) => {
                let v = *v;
                let tok = self.bump()?;
                Ok(self.ast.push(ExprKind::Int(v), tok.sl))
            }
            TokKind::Str(_) => {
                let tok = self.bump()?;
                let TokKind::Str(raw) = tok.kind else {
                    return Err(self.parse_err("expected string literal", tok.sl));
                };
                Ok(self.ast.push(ExprKind::Str(raw), tok.sl))
            }
            TokKind::KwLambda => self.parse_lambda(),
            TokKind::KwLetrec => self.parse_letrec(),
            TokKind::KwIf => self.parse_if(),
            TokKind::Ident(_) => {
                let ident = self.parse_ident()?;
                Ok(self.ast.push(ExprKind::Var(ident.text), ident.sl))
            }
            TokKind::LBrace => self.parse_sequence(),
            TokKind::LParen => {
                if matches!(self.nxt.kind, TokKind::Intrinsic(_)) {
                    self.parse_intrinsic_call()
                } else {
                    self.parse_expr_call()
                }
            }
            TokKind::At => self.parse_at(),
            TokKind::Eof => Err(self.parse_err("incomplete token stream", self.cur.sl)),
            other => Err(self.parse_err(format!("unexpected token {other:?}"), self.cur.sl)),
        }
    }

    /// `lambda ( ident* ) expr`
    fn parse_lambda(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.expect(TokKind::KwLambda)?;
        self.expect(TokKind::LParen)?;
        let mut params = Vec::new();
        while matches!(self.cur.kind, TokKind::Ident(_)) {
            params.push(self.parse_ident()?);
        }
        self.expect(TokKind::RParen)?;
        let body = self.parse_expr()?;
        Ok(self.ast.push(ExprKind::Lambda { params, body }, start.sl))
    }

    /// `letrec ( (ident expr)* ) expr`
    fn parse_letrec(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.expect(TokKind::KwLetrec)?;
        self.expect(TokKind::LParen)?;
        let mut bindings = Vec::new();
        while matches!(self.cur.kind, TokKind::Ident(_)) {
            let name = self.parse_ident()?;
            let value = self.parse_expr()?;
            bindings.push(Binding { name, value });
        }
        self.expect(TokKind::RParen)?;
        let body = self.parse_expr()?;
        Ok(self.ast.push(ExprKind::Letrec { bindings, body }, start.sl))
    }

    fn parse_if(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.expect(TokKind::KwIf)?;
        let cond = self.parse_expr()?;
        let then_branch = self.parse_expr()?;
        let else_branch = self.parse_expr()?;
        Ok(self.ast.push(
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            },
            start.sl,
        ))
    }

    /// `{ expr+ }` — the empty sequence is rejected.
    fn parse_sequence(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.expect(TokKind::LBrace)?;
        let mut exprs = Vec::new();
        while !matches!(self.cur.kind, TokKind::RBrace | TokKind::Eof) {
            exprs.push(self.parse_expr()?);
        }
        if exprs.is_empty() {
            return Err(self.parse_err("zero-length sequence", start.sl));
        }
        self.expect(TokKind::RBrace)?;
        Ok(self.ast.push(ExprKind::Seq(exprs), start.sl))
    }

    /// `( .intrinsic expr* )`
    fn parse_intrinsic_call(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.expect(TokKind::LParen)?;
        let tok = self.bump()?;
        let TokKind::Intrinsic(name) = tok.kind else {
            return Err(self.parse_err("expected intrinsic", tok.sl));
        };
        let mut args = Vec::new();
        while !matches!(self.cur.kind, TokKind::RParen | TokKind::Eof) {
            args.push(self.parse_expr()?);
        }
        self.expect(TokKind::RParen)?;
        Ok(self.ast.push(ExprKind::Intrinsic { name, args }, start.sl))
    }

    /// `( expr expr* )`
    fn parse_expr_call(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.expect(TokKind::LParen)?;
        let callee = self.parse_expr()?;
        let mut args = Vec::new();
        while !matches!(self.cur.kind, TokKind::RParen | TokKind::Eof) {
            args.push(self.parse_expr()?);
        }
        self.expect(TokKind::RParen)?;
        Ok(self.ast.push(ExprKind::Call { callee, args }, start.sl))
    }

    /// `@ ident expr`
    fn parse_at(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.expect(TokKind::At)?;
        let field = self.parse_ident()?;
        let target = self.parse_expr()?;
        Ok(self.ast.push(ExprKind::At { field, target }, start.sl))
    }
}
