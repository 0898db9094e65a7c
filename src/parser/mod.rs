//! Recursive-descent parser.
//!
//! Block forms require `: NEWLINE INDENT ... DEDENT`; single-line block
//! bodies are rejected with a dedicated message. Error messages name the
//! expected token and add a hint for the common slips (missing `:`,
//! unclosed delimiters, flvtest syntax at top level, assignment at sector
//! scope).

mod expr;

#[cfg(test)]
mod tests;

use crate::ast;
use crate::diagnostics::Diagnostic;
use crate::span::Span;
use crate::token::{keyword_text, punctuator, Token, TokenKind};

pub(crate) type ParseResult<T> = Result<T, Diagnostic>;

pub fn parse_program(tokens: Vec<Token>) -> ParseResult<ast::Program> {
    let mut cur = Cursor::new(tokens);
    let mut items: Vec<ast::Item> = Vec::new();
    let mut run: Option<Span> = None;

    let start_span = cur.peek().span.clone();

    while !cur.at(TokenKind::Eof) {
        if cur.at(TokenKind::Nl) || cur.at(TokenKind::Dedent) {
            cur.advance();
            continue;
        }
        if cur.at(TokenKind::KwRun) {
            run = Some(parse_run(&mut cur)?);
            while cur.at(TokenKind::Nl) {
                cur.advance();
            }
            cur.expect(TokenKind::Eof, Some("run() must be the last item"))?;
            break;
        }
        items.push(parse_top_item(&mut cur)?);
    }

    let span = start_span.merge(&cur.peek().span);
    Ok(ast::Program { items, run, span })
}

fn expected_label(kind: TokenKind) -> String {
    match kind {
        TokenKind::Nl => "newline".into(),
        TokenKind::Indent => "indentation".into(),
        TokenKind::Dedent => "dedentation".into(),
        TokenKind::Eof => "end of file".into(),
        _ => {
            if let Some(sym) = punctuator(kind) {
                format!("'{}'", sym)
            } else if let Some(kw) = keyword_text(kind) {
                format!("keyword '{}'", kw)
            } else {
                format!("{:?}", kind)
            }
        }
    }
}

fn describe_token(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Nl => "newline".into(),
        TokenKind::Eof => "end of file".into(),
        TokenKind::Indent => "indentation".into(),
        TokenKind::Dedent => "dedentation".into(),
        TokenKind::Ident => format!("identifier '{}'", tok.text),
        _ => {
            if let Some(sym) = punctuator(tok.kind) {
                format!("'{}'", sym)
            } else {
                format!("{:?}", tok.kind)
            }
        }
    }
}

pub(crate) struct Cursor {
    tokens: Vec<Token>,
    i: usize,
}

impl Cursor {
    fn new(tokens: Vec<Token>) -> Self {
        Cursor { tokens, i: 0 }
    }

    pub(crate) fn peek(&self) -> &Token {
        let j = self.i.min(self.tokens.len() - 1);
        &self.tokens[j]
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let j = (self.i + n).min(self.tokens.len() - 1);
        &self.tokens[j]
    }

    /// Most recently consumed token.
    pub(crate) fn prev(&self) -> &Token {
        &self.tokens[self.i.saturating_sub(1)]
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.i < self.tokens.len() - 1 {
            self.i += 1;
        }
        t
    }

    pub(crate) fn save(&self) -> usize {
        self.i
    }

    pub(crate) fn restore(&mut self, at: usize) {
        self.i = at;
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, msg: Option<&str>) -> ParseResult<Token> {
        let t = self.peek();
        if t.kind != kind {
            let got = describe_token(t);
            let base = msg
                .map(String::from)
                .unwrap_or_else(|| format!("Expected {}", expected_label(kind)));
            let mut hints: Vec<&str> = Vec::new();
            match kind {
                TokenKind::Colon => hints.push("missing ':' before an indented block"),
                TokenKind::RParen => hints.push("missing ')' to close grouped expression or call"),
                TokenKind::RBracket => hints.push("missing ']' to close index or type arguments"),
                TokenKind::Arrow => hints.push("expected '->' before handler or match arm body"),
                _ => {}
            }
            let closing = matches!(
                kind,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
            );
            if t.kind == TokenKind::Eof && closing {
                hints.push("reached end of file while closing delimiters");
            }
            if t.kind == TokenKind::Nl && closing {
                hints.push("a closing delimiter may be missing before newline");
            }
            let mut full = format!("{}, got {}", base, got);
            if !hints.is_empty() {
                full = format!("{}; hint: {}", full, hints.join("; "));
            }
            return Err(Diagnostic::parse(full, t.span.clone()));
        }
        Ok(self.advance())
    }
}

fn parse_run(cur: &mut Cursor) -> ParseResult<Span> {
    let kw = cur.expect(TokenKind::KwRun, None)?;
    cur.expect(TokenKind::LParen, None)?;
    cur.expect(TokenKind::RParen, None)?;
    Ok(kw.span.merge(&cur.prev().span))
}

fn parse_top_item(cur: &mut Cursor) -> ParseResult<ast::Item> {
    match cur.peek().kind {
        TokenKind::KwType => Ok(ast::Item::Type(parse_type_decl(cur)?)),
        TokenKind::KwConst => Ok(ast::Item::Const(parse_const_decl(cur)?)),
        TokenKind::KwLet => Ok(ast::Item::Let(parse_let_decl(cur)?)),
        TokenKind::KwNeed => Ok(ast::Item::Need(parse_need_decl(cur)?)),
        TokenKind::KwFn => Ok(ast::Item::Fn(parse_fn_decl(cur)?)),
        TokenKind::KwPattern => Ok(ast::Item::Pattern(parse_pattern_decl(cur)?)),
        TokenKind::KwMixin => Ok(ast::Item::Mixin(parse_mixin_decl(cur)?)),
        TokenKind::KwUse => {
            // `use mixin Foo v1` (mixin system) vs `use std.option` (modules).
            if cur.peek_nth(1).kind == TokenKind::KwMixin {
                Ok(ast::Item::UseMixin(parse_use_mixin(cur)?))
            } else {
                Ok(ast::Item::Use(parse_use(cur)?))
            }
        }
        TokenKind::KwResolve => Ok(ast::Item::ResolveMixin(parse_resolve_mixin(cur)?)),
        TokenKind::KwSector => Ok(ast::Item::Sector(parse_sector_decl(cur)?)),
        TokenKind::KwOn => Ok(ast::Item::Handler(parse_on_handler(cur)?)),
        _ => {
            let t = cur.peek();
            if t.kind == TokenKind::Ident && t.text == "test" {
                return Err(Diagnostic::parse(
                    "Unexpected top-level token: identifier 'test'; hint: `test \"name\" -> do:` is flvtest syntax and must run via flvtest/pytest",
                    t.span.clone(),
                ));
            }
            Err(Diagnostic::parse(
                format!("Unexpected top-level token: {}", describe_token(t)),
                t.span.clone(),
            ))
        }
    }
}

pub(crate) fn parse_ident(cur: &mut Cursor) -> ParseResult<ast::Ident> {
    let t = cur.peek();
    match t.kind {
        TokenKind::Ident
        | TokenKind::KwOk
        | TokenKind::KwErr
        | TokenKind::KwSome
        | TokenKind::KwNone => {
            let t = cur.advance();
            Ok(ast::Ident::new(t.text, t.span))
        }
        _ => Err(Diagnostic::parse(
            format!("Expected identifier, got {}", describe_token(t)),
            t.span.clone(),
        )),
    }
}

fn parse_version_token(cur: &mut Cursor) -> ParseResult<u32> {
    let t = cur.expect(TokenKind::Ident, Some("Expected version like v1"))?;
    let digits = t.text.strip_prefix('v');
    match digits {
        Some(d) if !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()) => d
            .parse::<u32>()
            .map_err(|_| Diagnostic::parse("Expected version like v1", t.span.clone())),
        _ => Err(Diagnostic::parse("Expected version like v1", t.span)),
    }
}

pub(crate) fn parse_qualified_name(cur: &mut Cursor) -> ParseResult<ast::QualifiedName> {
    let first = parse_ident(cur)?;
    let mut parts = vec![first];
    while cur.eat(TokenKind::Dot).is_some() {
        parts.push(parse_ident(cur)?);
    }
    let span = parts[0].span.merge(&parts[parts.len() - 1].span);
    Ok(ast::QualifiedName::new(parts, span))
}

pub(crate) fn parse_type_ref(cur: &mut Cursor) -> ParseResult<ast::TypeRef> {
    if cur.eat(TokenKind::LParen).is_some() {
        let inner = parse_type_ref(cur)?;
        let r = cur.expect(TokenKind::RParen, None)?;
        let span = inner.span().merge(&r.span);
        return Ok(ast::TypeRef::Paren(Box::new(inner), span));
    }
    let name = parse_qualified_name(cur)?;
    if cur.eat(TokenKind::LBracket).is_some() {
        let mut args = vec![parse_type_ref(cur)?];
        while cur.eat(TokenKind::Comma).is_some() {
            args.push(parse_type_ref(cur)?);
        }
        let rb = cur.expect(TokenKind::RBracket, None)?;
        let span = name.span.merge(&rb.span);
        return Ok(ast::TypeRef::Name(ast::TypeName {
            name,
            args: Some(args),
            span,
        }));
    }
    let span = name.span.clone();
    Ok(ast::TypeRef::Name(ast::TypeName {
        name,
        args: None,
        span,
    }))
}

fn parse_type_decl(cur: &mut Cursor) -> ParseResult<ast::TypeDecl> {
    let kw = cur.expect(TokenKind::KwType, None)?;
    let name = parse_qualified_name(cur)?;
    let mut params: Option<Vec<ast::Ident>> = None;
    if cur.eat(TokenKind::LBracket).is_some() {
        let mut ps = vec![parse_ident(cur)?];
        while cur.eat(TokenKind::Comma).is_some() {
            ps.push(parse_ident(cur)?);
        }
        cur.expect(TokenKind::RBracket, None)?;
        params = Some(ps);
    }
    cur.expect(TokenKind::Eq, Some("Expected '=' after type declaration"))?;

    let rhs = if cur.at(TokenKind::LBrace) {
        ast::TypeRhs::Record(parse_record_type(cur)?)
    } else {
        parse_sum_or_alias(cur)?
    };

    let span = kw.span.merge(rhs.span());
    Ok(ast::TypeDecl {
        name,
        params,
        rhs,
        span,
    })
}

fn parse_record_type(cur: &mut Cursor) -> ParseResult<ast::RecordType> {
    let l = cur.expect(TokenKind::LBrace, None)?;
    let mut fields: Vec<ast::FieldDecl> = Vec::new();
    if !cur.at(TokenKind::RBrace) {
        fields.push(parse_field_decl(cur)?);
        while cur.eat(TokenKind::Comma).is_some() {
            if cur.at(TokenKind::RBrace) {
                break;
            }
            fields.push(parse_field_decl(cur)?);
        }
    }
    let r = cur.expect(TokenKind::RBrace, None)?;
    Ok(ast::RecordType {
        fields,
        span: l.span.merge(&r.span),
    })
}

fn parse_field_decl(cur: &mut Cursor) -> ParseResult<ast::FieldDecl> {
    let name = parse_ident(cur)?;
    cur.expect(TokenKind::Colon, None)?;
    let ty = parse_type_ref(cur)?;
    let span = name.span.merge(ty.span());
    Ok(ast::FieldDecl { name, ty, span })
}

/// Sum type uses `|` between variants; anything else is an alias TypeRef.
/// A lone variant without `|`, or a malformed sum, backtracks to an alias.
fn parse_sum_or_alias(cur: &mut Cursor) -> ParseResult<ast::TypeRhs> {
    let save = cur.save();
    if let Ok(Some(sum)) = try_parse_sum(cur) {
        return Ok(ast::TypeRhs::Sum(sum));
    }
    cur.restore(save);
    let alias = parse_type_ref(cur)?;
    Ok(ast::TypeRhs::Alias(alias))
}

fn try_parse_sum(cur: &mut Cursor) -> ParseResult<Option<ast::SumType>> {
    let v0 = parse_variant_decl(cur)?;
    if cur.eat(TokenKind::Bar).is_none() {
        return Ok(None);
    }
    let mut variants = vec![v0];
    loop {
        variants.push(parse_variant_decl(cur)?);
        if cur.eat(TokenKind::Bar).is_none() {
            break;
        }
    }
    let span = variants[0].span.merge(&variants[variants.len() - 1].span);
    Ok(Some(ast::SumType { variants, span }))
}

fn parse_variant_decl(cur: &mut Cursor) -> ParseResult<ast::VariantDecl> {
    let name = parse_ident(cur)?;
    if cur.eat(TokenKind::LParen).is_some() {
        let mut payload: Vec<ast::TypeRef> = Vec::new();
        if !cur.at(TokenKind::RParen) {
            payload.push(parse_type_ref(cur)?);
            while cur.eat(TokenKind::Comma).is_some() {
                payload.push(parse_type_ref(cur)?);
            }
        }
        let rp = cur.expect(TokenKind::RParen, None)?;
        let span = name.span.merge(&rp.span);
        return Ok(ast::VariantDecl {
            name,
            payload: Some(payload),
            span,
        });
    }
    let span = name.span.clone();
    Ok(ast::VariantDecl {
        name,
        payload: None,
        span,
    })
}

fn parse_const_decl(cur: &mut Cursor) -> ParseResult<ast::ConstDecl> {
    let kw = cur.expect(TokenKind::KwConst, None)?;
    let name = parse_ident(cur)?;
    cur.expect(TokenKind::Eq, Some("Expected '=' after const name"))?;
    let value = expr::parse_expr(cur)?;
    let span = kw.span.merge(value.span());
    Ok(ast::ConstDecl { name, value, span })
}

fn parse_let_decl(cur: &mut Cursor) -> ParseResult<ast::LetDecl> {
    let kw = cur.expect(TokenKind::KwLet, None)?;
    let name = parse_ident(cur)?;
    cur.expect(TokenKind::Eq, Some("Expected '=' after let name"))?;
    let value = expr::parse_expr(cur)?;
    let span = kw.span.merge(value.span());
    Ok(ast::LetDecl { name, value, span })
}

fn parse_need_decl(cur: &mut Cursor) -> ParseResult<ast::NeedDecl> {
    let kw = cur.expect(TokenKind::KwNeed, None)?;
    let mut attrs: Option<ast::NeedAttr> = None;
    if cur.eat(TokenKind::LParen).is_some() {
        let mut cache = None;
        let mut cache_fail = None;
        while !cur.at(TokenKind::RParen) {
            let key = parse_ident(cur)?;
            cur.expect(TokenKind::Eq, None)?;
            let val = cur.expect(TokenKind::Str, None)?;
            if key.name == "cache" {
                cache = Some(val.text.clone());
            }
            if key.name == "cacheFail" {
                cache_fail = Some(val.text.clone());
            }
            if cur.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let rp = cur.expect(TokenKind::RParen, None)?;
        attrs = Some(ast::NeedAttr {
            cache,
            cache_fail,
            span: kw.span.merge(&rp.span),
        });
    }
    let name = parse_ident(cur)?;
    cur.expect(TokenKind::Eq, Some("Expected '=' after need name"))?;
    let value = expr::parse_expr(cur)?;
    let span = kw.span.merge(value.span());
    Ok(ast::NeedDecl {
        name,
        attrs,
        value,
        span,
    })
}

pub(crate) fn parse_param(cur: &mut Cursor) -> ParseResult<ast::ParamDecl> {
    let kind = if cur.eat(TokenKind::Star).is_some() {
        ast::ParamKind::Varargs
    } else if cur.eat(TokenKind::StarStar).is_some() {
        ast::ParamKind::Varkw
    } else {
        ast::ParamKind::Normal
    };
    let name = parse_ident(cur)?;
    cur.expect(TokenKind::Colon, None)?;
    let ty = parse_type_ref(cur)?;
    let span = name.span.merge(ty.span());
    Ok(ast::ParamDecl {
        name,
        ty,
        kind,
        span,
    })
}

fn parse_param_list(cur: &mut Cursor) -> ParseResult<(Vec<ast::ParamDecl>, Token)> {
    cur.expect(TokenKind::LParen, None)?;
    let mut params: Vec<ast::ParamDecl> = Vec::new();
    if !cur.at(TokenKind::RParen) {
        params.push(parse_param(cur)?);
        while cur.eat(TokenKind::Comma).is_some() {
            params.push(parse_param(cur)?);
        }
    }
    let rp = cur.expect(TokenKind::RParen, None)?;
    Ok((params, rp))
}

fn parse_fn_decl(cur: &mut Cursor) -> ParseResult<ast::FnDecl> {
    let kw = cur.expect(TokenKind::KwFn, None)?;
    let mut sector_qual: Option<ast::Ident> = None;
    if cur.eat(TokenKind::At).is_some() {
        sector_qual = Some(parse_ident(cur)?);
    }
    let name = parse_ident(cur)?;
    let mut type_params: Option<Vec<ast::Ident>> = None;
    if cur.eat(TokenKind::LBracket).is_some() {
        let mut tps = vec![parse_ident(cur)?];
        while cur.eat(TokenKind::Comma).is_some() {
            tps.push(parse_ident(cur)?);
        }
        cur.expect(TokenKind::RBracket, None)?;
        type_params = Some(tps);
    }
    let (params, _rp) = parse_param_list(cur)?;

    let mut ret_type: Option<ast::TypeRef> = None;
    if cur.eat(TokenKind::Arrow).is_some() {
        ret_type = Some(parse_type_ref(cur)?);
    }

    cur.expect(
        TokenKind::Eq,
        Some("Expected '=' after function signature (use '= expr' or '= do:')"),
    )?;
    let body = parse_fn_body(cur)?;
    let span = kw.span.merge(body.span());
    Ok(ast::FnDecl {
        name,
        sector_qual,
        type_params,
        params,
        ret_type,
        body,
        span,
    })
}

pub(crate) fn parse_fn_body(cur: &mut Cursor) -> ParseResult<ast::FnBody> {
    if cur.at(TokenKind::KwDo) {
        let kw = cur.advance();
        let block = parse_block_after_colon(cur, &kw.span)?;
        let span = kw.span.merge(&block.span);
        return Ok(ast::FnBody::Do(block, span));
    }
    let e = expr::parse_expr(cur)?;
    Ok(ast::FnBody::Expr(e))
}

pub(crate) fn parse_block_after_colon(cur: &mut Cursor, start_span: &Span) -> ParseResult<ast::Block> {
    cur.expect(TokenKind::Colon, Some("Expected ':' before block body"))?;
    cur.expect(
        TokenKind::Nl,
        Some("Expected newline after ':' before block body (single-line blocks are not supported)"),
    )?;
    cur.expect(TokenKind::Indent, Some("Expected indented block body"))?;
    let mut stmts: Vec<ast::Stmt> = Vec::new();
    while !cur.at(TokenKind::Dedent) && !cur.at(TokenKind::Eof) {
        if cur.at(TokenKind::Nl) {
            cur.advance();
            continue;
        }
        stmts.push(parse_stmt(cur)?);
        if cur.at(TokenKind::Nl) {
            cur.advance();
        }
    }
    let ded = cur.expect(TokenKind::Dedent, None)?;
    Ok(ast::Block {
        stmts,
        span: start_span.merge(&ded.span),
    })
}

fn parse_sector_decl(cur: &mut Cursor) -> ParseResult<ast::SectorDecl> {
    let kw = cur.expect(TokenKind::KwSector, None)?;
    let name = parse_ident(cur)?;
    cur.expect(TokenKind::Colon, Some("Expected ':' after sector name"))?;
    cur.expect(TokenKind::Nl, Some("Expected newline after sector header"))?;
    cur.expect(TokenKind::Indent, Some("Expected indented sector body"))?;
    let mut items: Vec<ast::SectorItem> = Vec::new();
    while !cur.at(TokenKind::Dedent) && !cur.at(TokenKind::Eof) {
        if cur.at(TokenKind::Nl) {
            cur.advance();
            continue;
        }
        match cur.peek().kind {
            TokenKind::KwLet => items.push(ast::SectorItem::Let(parse_let_decl(cur)?)),
            TokenKind::KwNeed => items.push(ast::SectorItem::Need(parse_need_decl(cur)?)),
            TokenKind::KwFn => items.push(ast::SectorItem::Fn(parse_fn_decl(cur)?)),
            TokenKind::KwOn => items.push(ast::SectorItem::Handler(parse_on_handler(cur)?)),
            _ => {
                let bad = cur.peek();
                if bad.kind == TokenKind::Ident && cur.peek_nth(1).kind == TokenKind::Eq {
                    return Err(Diagnostic::parse(
                        "Unexpected sector item: assignment at sector scope; hint: use `let name = ...` (assignments belong in handler/fn bodies)",
                        bad.span.clone(),
                    ));
                }
                return Err(Diagnostic::parse(
                    "Unexpected sector item; expected one of: let, need, fn, on",
                    bad.span.clone(),
                ));
            }
        }
        if cur.at(TokenKind::Nl) {
            cur.advance();
        }
    }
    let ded = cur.expect(TokenKind::Dedent, None)?;
    let span = kw.span.merge(&ded.span);
    Ok(ast::SectorDecl { name, items, span })
}

fn parse_event_pattern(cur: &mut Cursor) -> ParseResult<ast::EventPattern> {
    let name = parse_qualified_name(cur)?;
    if cur.eat(TokenKind::LParen).is_some() {
        let mut args: Vec<ast::Expr> = Vec::new();
        if !cur.at(TokenKind::RParen) {
            args.push(expr::parse_expr(cur)?);
            while cur.eat(TokenKind::Comma).is_some() {
                if cur.at(TokenKind::RParen) {
                    break;
                }
                args.push(expr::parse_expr(cur)?);
            }
        }
        let rp = cur.expect(TokenKind::RParen, None)?;
        let span = name.span.merge(&rp.span);
        return Ok(ast::EventPattern::Call(name, args, span));
    }
    Ok(ast::EventPattern::Type(name))
}

fn parse_on_handler(cur: &mut Cursor) -> ParseResult<ast::OnHandler> {
    let kw = cur.expect(TokenKind::KwOn, None)?;
    let event = parse_event_pattern(cur)?;
    let mut binder: Option<ast::Ident> = None;
    let mut when: Option<ast::Expr> = None;
    if cur.eat(TokenKind::KwAs).is_some() {
        binder = Some(parse_ident(cur)?);
    }
    if cur.eat(TokenKind::KwWhen).is_some() {
        when = Some(expr::parse_expr(cur)?);
    }
    cur.expect(TokenKind::Arrow, None)?;
    let body = if cur.at(TokenKind::KwDo) {
        let kw_do = cur.advance();
        let block = parse_block_after_colon(cur, &kw_do.span)?;
        let span = kw_do.span.merge(&block.span);
        ast::HandlerBody::Do(block, span)
    } else {
        ast::HandlerBody::Expr(expr::parse_expr(cur)?)
    };

    let span = kw.span.merge(body.span());
    Ok(ast::OnHandler {
        id: ast::NodeId::fresh(),
        event,
        binder,
        when,
        body,
        span,
    })
}

fn parse_mixin_decl(cur: &mut Cursor) -> ParseResult<ast::MixinDecl> {
    let kw = cur.expect(TokenKind::KwMixin, None)?;
    let name = parse_qualified_name(cur)?;
    let version = parse_version_token(cur)?;
    cur.expect(TokenKind::KwInto, None)?;
    let target = if cur.eat(TokenKind::KwSector).is_some() {
        ast::MixinTarget::Sector(parse_ident(cur)?)
    } else {
        // Allow explicit `into type T`.
        cur.eat(TokenKind::KwType);
        ast::MixinTarget::Type(parse_qualified_name(cur)?)
    };

    cur.expect(TokenKind::Colon, Some("Expected ':' after mixin header"))?;
    cur.expect(TokenKind::Nl, Some("Expected newline after mixin header"))?;
    cur.expect(TokenKind::Indent, Some("Expected indented mixin body"))?;
    let mut items: Vec<ast::MixinItem> = Vec::new();
    while !cur.at(TokenKind::Dedent) && !cur.at(TokenKind::Eof) {
        if cur.at(TokenKind::Nl) {
            cur.advance();
            continue;
        }
        if cur.at(TokenKind::KwPattern) {
            items.push(ast::MixinItem::Pattern(parse_pattern_decl(cur)?));
            continue;
        }
        if cur.at(TokenKind::KwFn) {
            items.push(ast::MixinItem::FnAdd(parse_mixin_add(cur)?));
            continue;
        }
        if cur.at(TokenKind::KwAround) {
            items.push(ast::MixinItem::Around(parse_mixin_around(cur)?));
            continue;
        }
        if cur.at(TokenKind::Ident) && cur.peek().text == "hook" {
            items.push(ast::MixinItem::Hook(parse_mixin_hook(cur)?));
            continue;
        }
        // Type-target mixins may add record fields as `name: Type`.
        if cur.at(TokenKind::Ident) && cur.peek_nth(1).kind == TokenKind::Colon {
            items.push(ast::MixinItem::FieldAdd(parse_mixin_field_add(cur)?));
            continue;
        }
        let bad = cur.peek();
        if bad.kind == TokenKind::Ident && cur.peek_nth(1).kind == TokenKind::Eq {
            return Err(Diagnostic::parse(
                "Unexpected mixin item: assignment at mixin scope; hint: use `fn ... = ...` or `name: Type` (type mixins)",
                bad.span.clone(),
            ));
        }
        if matches!(
            bad.kind,
            TokenKind::KwLet | TokenKind::KwNeed | TokenKind::KwOn
        ) {
            return Err(Diagnostic::parse(
                "Unexpected mixin item: declarations like let/need/on are not valid inside mixins (use fn/around/hook/pattern)",
                bad.span.clone(),
            ));
        }
        let msg = match target {
            ast::MixinTarget::Sector(_) => {
                "Expected mixin item; sector mixins support: pattern, fn, around, hook"
            }
            ast::MixinTarget::Type(_) => {
                "Expected mixin item; type mixins support: pattern, fn, around, hook, field: Type"
            }
        };
        return Err(Diagnostic::parse(msg, bad.span.clone()));
    }
    let ded = cur.expect(TokenKind::Dedent, None)?;
    let span = kw.span.merge(&ded.span);
    Ok(ast::MixinDecl {
        name,
        version,
        target,
        items,
        span,
    })
}

fn parse_fn_signature(cur: &mut Cursor, start: &Span) -> ParseResult<ast::FnSignature> {
    let name = parse_ident(cur)?;
    let (params, rp) = parse_param_list(cur)?;
    let mut ret_type: Option<ast::TypeRef> = None;
    if cur.eat(TokenKind::Arrow).is_some() {
        ret_type = Some(parse_type_ref(cur)?);
    }
    let span = start.merge(&rp.span);
    Ok(ast::FnSignature {
        name,
        params,
        ret_type,
        span,
    })
}

fn parse_mixin_add(cur: &mut Cursor) -> ParseResult<ast::MixinFnAdd> {
    let kw = cur.expect(TokenKind::KwFn, None)?;
    let sig = parse_fn_signature(cur, &kw.span)?;
    cur.expect(
        TokenKind::Eq,
        Some("Expected '=' after mixin function signature (use '= expr' or '= do:')"),
    )?;
    let body = parse_fn_body(cur)?;
    let span = kw.span.merge(body.span());
    Ok(ast::MixinFnAdd { sig, body, span })
}

fn parse_mixin_around(cur: &mut Cursor) -> ParseResult<ast::MixinAround> {
    let kw = cur.expect(TokenKind::KwAround, None)?;
    cur.expect(TokenKind::KwFn, None)?;
    let sig = parse_fn_signature(cur, &kw.span)?;
    let block = parse_block_after_colon(cur, &kw.span)?;
    let span = kw.span.merge(&block.span);
    Ok(ast::MixinAround { sig, block, span })
}

fn parse_mixin_field_add(cur: &mut Cursor) -> ParseResult<ast::MixinFieldAdd> {
    let name = parse_ident(cur)?;
    cur.expect(TokenKind::Colon, None)?;
    let ty = parse_type_ref(cur)?;
    let span = name.span.merge(ty.span());
    Ok(ast::MixinFieldAdd { name, ty, span })
}

fn parse_hook_with_options(
    cur: &mut Cursor,
) -> ParseResult<std::collections::BTreeMap<String, String>> {
    let mut opts = std::collections::BTreeMap::new();
    if !(cur.at(TokenKind::Ident) && cur.peek().text == "with") {
        return Ok(opts);
    }

    cur.advance();
    cur.expect(TokenKind::LParen, Some("Expected '(' after hook with"))?;
    while !cur.at(TokenKind::RParen) {
        let key = if cur.at(TokenKind::KwConst) {
            let t = cur.advance();
            t.text
        } else {
            parse_ident(cur)?.name
        };
        cur.expect(TokenKind::Eq, Some("Expected '=' in hook with(...) option"))?;
        let t = cur.peek().clone();
        match t.kind {
            TokenKind::Str | TokenKind::Bool | TokenKind::Ident => {
                let v = cur.advance();
                opts.insert(key, v.text);
            }
            TokenKind::Int => {
                if cur.peek().text == "0"
                    && cur.peek_nth(1).kind == TokenKind::Minus
                    && cur.peek_nth(2).kind == TokenKind::Int
                {
                    // Historical negative form `0-5`; plain negative ints are
                    // preferred in source.
                    let v0 = cur.advance().text;
                    cur.advance();
                    let v2 = cur.advance().text;
                    opts.insert(key, format!("{}-{}", v0, v2));
                } else {
                    let v = cur.advance();
                    opts.insert(key, v.text);
                }
            }
            TokenKind::Minus if cur.peek_nth(1).kind == TokenKind::Int => {
                cur.advance();
                let v = cur.advance();
                opts.insert(key, format!("-{}", v.text));
            }
            _ => {
                return Err(Diagnostic::parse(
                    "Expected hook option value (str/bool/int/ident)",
                    t.span,
                ));
            }
        }
        if cur.eat(TokenKind::Comma).is_none() {
            break;
        }
    }
    cur.expect(TokenKind::RParen, Some("Expected ')' to close hook with(...)"))?;
    Ok(opts)
}

fn parse_mixin_hook(cur: &mut Cursor) -> ParseResult<ast::MixinHook> {
    let hook_kw = cur.expect(TokenKind::Ident, Some("Expected 'hook' item in mixin body"))?;
    if hook_kw.text != "hook" {
        return Err(Diagnostic::parse(
            "Expected 'hook' item in mixin body",
            hook_kw.span,
        ));
    }

    let point_tok = cur.expect(TokenKind::Ident, Some("Expected hook point (head/tail/invoke)"))?;
    let point = match point_tok.text.as_str() {
        "head" => ast::HookPoint::Head,
        "tail" => ast::HookPoint::Tail,
        "invoke" => ast::HookPoint::Invoke,
        _ => {
            return Err(Diagnostic::parse(
                "Expected hook point (head/tail/invoke)",
                point_tok.span,
            ));
        }
    };

    cur.expect(TokenKind::KwFn, None)?;
    let sig = parse_fn_signature(cur, &hook_kw.span)?;

    let opts = parse_hook_with_options(cur)?;

    cur.expect(
        TokenKind::Eq,
        Some("Expected '=' after hook signature (use '= expr' or '= do:')"),
    )?;
    let body = parse_fn_body(cur)?;
    let span = hook_kw.span.merge(body.span());
    Ok(ast::MixinHook {
        point,
        sig,
        body,
        opts,
        span,
    })
}

fn parse_use_mixin(cur: &mut Cursor) -> ParseResult<ast::UseMixinStmt> {
    let kw = cur.expect(TokenKind::KwUse, None)?;
    cur.expect(TokenKind::KwMixin, None)?;
    let name = parse_qualified_name(cur)?;
    let version = parse_version_token(cur)?;
    let span = kw.span.merge(&cur.prev().span);
    Ok(ast::UseMixinStmt {
        name,
        version,
        span,
    })
}

fn parse_use(cur: &mut Cursor) -> ParseResult<ast::UseStmt> {
    let kw = cur.expect(TokenKind::KwUse, None)?;
    let name = parse_qualified_name(cur)?;
    let span = kw.span.merge(&name.span);
    Ok(ast::UseStmt { name, span })
}

fn parse_resolve_mixin(cur: &mut Cursor) -> ParseResult<ast::ResolveMixinStmt> {
    let kw = cur.expect(TokenKind::KwResolve, None)?;
    // `mixin-conflict` lexes as three tokens and is re-assembled here.
    let a_tok = cur.peek().clone();
    let a = match a_tok.kind {
        TokenKind::Ident | TokenKind::KwMixin => cur.advance(),
        _ => return Err(Diagnostic::parse("Expected 'mixin-conflict'", a_tok.span)),
    };
    cur.expect(TokenKind::Minus, Some("Expected 'mixin-conflict'"))?;
    let b = cur.expect(TokenKind::Ident, Some("Expected 'mixin-conflict'"))?;
    if a.text != "mixin" || b.text != "conflict" {
        return Err(Diagnostic::parse(
            "Expected 'mixin-conflict'",
            a.span.merge(&b.span),
        ));
    }

    cur.expect(TokenKind::Colon, None)?;
    cur.expect(TokenKind::Nl, None)?;
    cur.expect(TokenKind::Indent, None)?;
    let mut rules: Vec<ast::PreferRule> = Vec::new();
    while !cur.at(TokenKind::Dedent) && !cur.at(TokenKind::Eof) {
        if cur.at(TokenKind::Nl) {
            cur.advance();
            continue;
        }
        let pr_kw = cur.expect(TokenKind::KwPrefer, None)?;
        let prefer_name = parse_qualified_name(cur)?;
        let prefer_ver = parse_version_token(cur)?;
        cur.expect(TokenKind::KwOver, None)?;
        let over_name = parse_qualified_name(cur)?;
        let over_ver = parse_version_token(cur)?;
        let span = pr_kw.span.merge(&cur.prev().span);
        rules.push(ast::PreferRule {
            prefer: ast::PreferRef {
                name: prefer_name,
                version: prefer_ver,
            },
            over: ast::PreferRef {
                name: over_name,
                version: over_ver,
            },
            span,
        });
        if cur.at(TokenKind::Nl) {
            cur.advance();
        }
    }
    let ded = cur.expect(TokenKind::Dedent, None)?;
    let span = kw.span.merge(&ded.span);
    Ok(ast::ResolveMixinStmt { rules, span })
}

fn parse_pattern_decl(cur: &mut Cursor) -> ParseResult<ast::PatternDecl> {
    let kw = cur.expect(TokenKind::KwPattern, None)?;
    let name = parse_qualified_name(cur)?;
    cur.expect(TokenKind::Eq, Some("Expected '=' after pattern name"))?;
    let pat = expr::parse_pattern(cur)?;
    let span = kw.span.merge(pat.span());
    Ok(ast::PatternDecl { name, pat, span })
}

fn parse_stmt(cur: &mut Cursor) -> ParseResult<ast::Stmt> {
    match cur.peek().kind {
        TokenKind::KwLet => {
            let kw = cur.advance();
            let name = parse_ident(cur)?;
            cur.expect(TokenKind::Eq, None)?;
            let value = expr::parse_expr(cur)?;
            let span = kw.span.merge(value.span());
            return Ok(ast::Stmt::Let(ast::LetStmt { name, value, span }));
        }
        TokenKind::KwEmit => {
            let kw = cur.advance();
            let e = expr::parse_expr(cur)?;
            let span = kw.span.merge(e.span());
            return Ok(ast::Stmt::Emit(e, span));
        }
        TokenKind::KwReturn => {
            let kw = cur.advance();
            let e = expr::parse_expr(cur)?;
            let span = kw.span.merge(e.span());
            return Ok(ast::Stmt::Return(e, span));
        }
        TokenKind::KwStop => {
            let kw = cur.advance();
            cur.expect(TokenKind::LParen, None)?;
            cur.expect(TokenKind::RParen, None)?;
            return Ok(ast::Stmt::Stop(kw.span));
        }
        TokenKind::KwYield => {
            let kw = cur.advance();
            cur.expect(TokenKind::LParen, None)?;
            cur.expect(TokenKind::RParen, None)?;
            return Ok(ast::Stmt::Yield(kw.span));
        }
        TokenKind::KwIf => return parse_if_stmt(cur),
        TokenKind::KwFor => return parse_for_stmt(cur),
        _ => {}
    }

    let save = cur.save();
    if let Some(lvalue) = try_parse_lvalue(cur)? {
        let op = match cur.peek().kind {
            TokenKind::Eq => Some(ast::AssignOp::Set),
            TokenKind::PlusEq => Some(ast::AssignOp::Add),
            TokenKind::MinusEq => Some(ast::AssignOp::Sub),
            TokenKind::StarEq => Some(ast::AssignOp::Mul),
            TokenKind::SlashEq => Some(ast::AssignOp::Div),
            _ => None,
        };
        if let Some(op) = op {
            cur.advance();
            let value = expr::parse_expr(cur)?;
            let span = lvalue.span().merge(value.span());
            return Ok(ast::Stmt::Assign(ast::AssignStmt {
                target: lvalue,
                op,
                value,
                span,
            }));
        }
    }
    cur.restore(save);

    let e = expr::parse_expr(cur)?;
    let span = e.span().clone();
    Ok(ast::Stmt::Expr(e, span))
}

/// Lvalue parse for assignment statements. Member/index lvalues are built
/// from the base identifier, not the full postfix chain; this mirrors the
/// historical assignment behavior (`a.b.c = x` assigns field `c` through
/// `a`).
fn try_parse_lvalue(cur: &mut Cursor) -> ParseResult<Option<ast::LValue>> {
    match cur.peek().kind {
        TokenKind::Ident
        | TokenKind::KwOk
        | TokenKind::KwErr
        | TokenKind::KwSome
        | TokenKind::KwNone => {}
        _ => return Ok(None),
    }
    let base = parse_ident(cur)?;
    let mut lv = ast::LValue::Var(base.clone());
    loop {
        if cur.eat(TokenKind::Dot).is_some() {
            let field = parse_ident(cur)?;
            let span = lv.span().merge(&field.span);
            lv = ast::LValue::Member {
                object: Box::new(ast::Expr::Var(base.renumbered())),
                field,
                span,
            };
            continue;
        }
        if cur.eat(TokenKind::LBracket).is_some() {
            let idx = expr::parse_expr(cur)?;
            let rb = cur.expect(TokenKind::RBracket, None)?;
            let span = lv.span().merge(&rb.span);
            lv = ast::LValue::Index {
                object: Box::new(ast::Expr::Var(base.renumbered())),
                index: Box::new(idx),
                span,
            };
            continue;
        }
        break;
    }
    Ok(Some(lv))
}

fn parse_if_stmt(cur: &mut Cursor) -> ParseResult<ast::Stmt> {
    let kw = cur.expect(TokenKind::KwIf, None)?;
    let cond = expr::parse_expr(cur)?;
    let then_block = parse_block_after_colon(cur, &kw.span)?;
    let mut else_block: Option<ast::Block> = None;
    if cur.at(TokenKind::KwElse) {
        let kw_else = cur.advance();
        else_block = Some(parse_block_after_colon(cur, &kw_else.span)?);
    }
    let end = else_block
        .as_ref()
        .map(|b| b.span.clone())
        .unwrap_or_else(|| then_block.span.clone());
    let span = kw.span.merge(&end);
    Ok(ast::Stmt::If(ast::IfStmt {
        cond,
        then_block,
        else_block,
        span,
    }))
}

fn parse_for_stmt(cur: &mut Cursor) -> ParseResult<ast::Stmt> {
    let kw = cur.expect(TokenKind::KwFor, None)?;
    let binder = parse_ident(cur)?;
    cur.expect(TokenKind::KwIn, None)?;
    let iterable = expr::parse_expr(cur)?;
    let body = parse_block_after_colon(cur, &kw.span)?;
    let span = kw.span.merge(&body.span);
    Ok(ast::Stmt::For(ast::ForStmt {
        binder,
        iterable,
        body,
        span,
    }))
}
