//! Expression, pattern and match parsing.
//!
//! Precedence: `or` < `and` < comparisons < additive < multiplicative.
//! Unary `-`/`not` bind tighter than any binary operator. Postfix call,
//! member, index and try-suffix apply left to right. `|>` sits below the
//! binary operators and collects stages into a single PipeExpr.

use super::{
    parse_block_after_colon, parse_ident, parse_qualified_name, Cursor, ParseResult,
};
use crate::ast;
use crate::diagnostics::Diagnostic;
use crate::token::TokenKind;

fn precedence(kind: TokenKind) -> Option<u8> {
    let p = match kind {
        TokenKind::KwOr => 10,
        TokenKind::KwAnd => 20,
        TokenKind::EqEq
        | TokenKind::Neq
        | TokenKind::Lt
        | TokenKind::Lte
        | TokenKind::Gt
        | TokenKind::Gte => 30,
        TokenKind::Plus | TokenKind::Minus => 40,
        TokenKind::Star | TokenKind::Slash => 50,
        _ => return None,
    };
    Some(p)
}

pub(crate) fn parse_expr(cur: &mut Cursor) -> ParseResult<ast::Expr> {
    parse_pipe(cur)
}

fn parse_pipe(cur: &mut Cursor) -> ParseResult<ast::Expr> {
    let head = parse_binary(cur, 0)?;
    let mut stages: Vec<ast::Expr> = Vec::new();
    while cur.eat(TokenKind::Pipe).is_some() {
        stages.push(parse_binary(cur, 0)?);
    }
    if let Some(last) = stages.last() {
        let span = head.span().merge(last.span());
        return Ok(ast::Expr::Pipe(ast::PipeExpr {
            head: Box::new(head),
            stages,
            span,
        }));
    }
    Ok(head)
}

fn parse_binary(cur: &mut Cursor, min_prec: u8) -> ParseResult<ast::Expr> {
    let mut left = parse_unary(cur)?;
    loop {
        let op = cur.peek().kind;
        let prec = match precedence(op) {
            Some(p) if p >= min_prec => p,
            _ => break,
        };
        let tok = cur.advance();
        let right = parse_binary(cur, prec + 1)?;
        let span = left.span().merge(right.span());
        left = ast::Expr::Binary(ast::BinaryExpr {
            op: tok.text,
            left: Box::new(left),
            right: Box::new(right),
            span,
        });
    }
    Ok(left)
}

fn parse_unary(cur: &mut Cursor) -> ParseResult<ast::Expr> {
    if cur.at(TokenKind::Minus) || cur.at(TokenKind::KwNot) {
        let tok = cur.advance();
        let inner = parse_unary(cur)?;
        let span = tok.span.merge(inner.span());
        return Ok(ast::Expr::Unary(ast::UnaryExpr {
            op: tok.text,
            expr: Box::new(inner),
            span,
        }));
    }
    parse_postfix(cur)
}

fn parse_call_arg(cur: &mut Cursor) -> ParseResult<ast::CallArg> {
    if cur.eat(TokenKind::Star).is_some() {
        let v = parse_expr(cur)?;
        let span = v.span().clone();
        return Ok(ast::CallArg::Star { value: v, span });
    }
    if cur.eat(TokenKind::StarStar).is_some() {
        let v = parse_expr(cur)?;
        let span = v.span().clone();
        return Ok(ast::CallArg::StarStar { value: v, span });
    }
    let kw_head = matches!(
        cur.peek().kind,
        TokenKind::Ident | TokenKind::KwOk | TokenKind::KwErr | TokenKind::KwSome | TokenKind::KwNone
    );
    if kw_head && cur.peek_nth(1).kind == TokenKind::Eq {
        let name = parse_ident(cur)?;
        cur.expect(TokenKind::Eq, None)?;
        let v = parse_expr(cur)?;
        let span = name.span.merge(v.span());
        return Ok(ast::CallArg::Kw {
            name,
            value: v,
            span,
        });
    }
    let v = parse_expr(cur)?;
    let span = v.span().clone();
    Ok(ast::CallArg::Pos { value: v, span })
}

fn parse_postfix(cur: &mut Cursor) -> ParseResult<ast::Expr> {
    let mut expr = parse_primary(cur)?;
    loop {
        if cur.eat(TokenKind::LParen).is_some() {
            let mut args: Vec<ast::CallArg> = Vec::new();
            if !cur.at(TokenKind::RParen) {
                args.push(parse_call_arg(cur)?);
                while cur.eat(TokenKind::Comma).is_some() {
                    if cur.at(TokenKind::RParen) {
                        break;
                    }
                    args.push(parse_call_arg(cur)?);
                }
            }
            let rp = cur.expect(TokenKind::RParen, None)?;
            let span = expr.span().merge(&rp.span);
            expr = ast::Expr::Call(ast::CallExpr {
                callee: Box::new(expr),
                args,
                span,
            });
            continue;
        }
        if cur.eat(TokenKind::Dot).is_some() {
            let field = parse_ident(cur)?;
            let span = expr.span().merge(&field.span);
            expr = ast::Expr::Member(ast::MemberExpr {
                object: Box::new(expr),
                field,
                span,
            });
            continue;
        }
        if cur.eat(TokenKind::LBracket).is_some() {
            let idx = parse_expr(cur)?;
            let rb = cur.expect(TokenKind::RBracket, None)?;
            let span = expr.span().merge(&rb.span);
            expr = ast::Expr::Index(ast::IndexExpr {
                object: Box::new(expr),
                index: Box::new(idx),
                span,
            });
            continue;
        }
        if cur.eat(TokenKind::Qmark).is_some() {
            let q = cur.prev();
            let span = expr.span().merge(&q.span);
            expr = ast::Expr::TrySuffix(ast::TrySuffixExpr {
                inner: Box::new(expr),
                span,
            });
            continue;
        }
        break;
    }
    Ok(expr)
}

fn parse_sector_call_args(cur: &mut Cursor) -> ParseResult<(ast::Ident, ast::Ident, Vec<ast::Expr>, crate::token::Token)> {
    let sector = parse_ident(cur)?;
    cur.expect(TokenKind::Dot, None)?;
    let fn_name = parse_ident(cur)?;
    cur.expect(TokenKind::LParen, None)?;
    let mut args: Vec<ast::Expr> = Vec::new();
    if !cur.at(TokenKind::RParen) {
        args.push(parse_expr(cur)?);
        while cur.eat(TokenKind::Comma).is_some() {
            if cur.at(TokenKind::RParen) {
                break;
            }
            args.push(parse_expr(cur)?);
        }
    }
    let rp = cur.expect(TokenKind::RParen, None)?;
    Ok((sector, fn_name, args, rp))
}

fn parse_primary(cur: &mut Cursor) -> ParseResult<ast::Expr> {
    let t = cur.peek().clone();

    match t.kind {
        TokenKind::Int => {
            let tok = cur.advance();
            return Ok(ast::Expr::Lit(ast::Literal {
                lit: ast::Lit::Int(tok.text),
                span: tok.span,
            }));
        }
        TokenKind::Float => {
            let tok = cur.advance();
            return Ok(ast::Expr::Lit(ast::Literal {
                lit: ast::Lit::Float(tok.text),
                span: tok.span,
            }));
        }
        TokenKind::Str => {
            let tok = cur.advance();
            return Ok(ast::Expr::Lit(ast::Literal {
                lit: ast::Lit::Str(tok.text),
                span: tok.span,
            }));
        }
        TokenKind::Bytes => {
            let tok = cur.advance();
            return Ok(ast::Expr::Lit(ast::Literal {
                lit: ast::Lit::Bytes(tok.text),
                span: tok.span,
            }));
        }
        TokenKind::Bool => {
            let tok = cur.advance();
            return Ok(ast::Expr::Lit(ast::Literal {
                lit: ast::Lit::Bool(tok.text == "true"),
                span: tok.span,
            }));
        }
        TokenKind::Ident
        | TokenKind::KwOk
        | TokenKind::KwErr
        | TokenKind::KwSome
        | TokenKind::KwNone => {
            let ident = parse_ident(cur)?;
            return Ok(ast::Expr::Var(ident));
        }
        TokenKind::LBrace => return parse_record_lit(cur),
        TokenKind::KwMatch => return parse_match(cur),
        _ => {}
    }

    if cur.eat(TokenKind::LParen).is_some() {
        // Unit literal: `()`
        if cur.at(TokenKind::RParen) {
            let rp = cur.expect(TokenKind::RParen, None)?;
            return Ok(ast::Expr::Tuple(ast::TupleLit {
                items: vec![],
                span: rp.span,
            }));
        }
        let first = parse_expr(cur)?;
        if cur.eat(TokenKind::Comma).is_some() {
            let mut items = vec![first];
            if !cur.at(TokenKind::RParen) {
                items.push(parse_expr(cur)?);
                while cur.eat(TokenKind::Comma).is_some() {
                    if cur.at(TokenKind::RParen) {
                        break;
                    }
                    items.push(parse_expr(cur)?);
                }
            }
            let rp = cur.expect(TokenKind::RParen, None)?;
            let span = items[0].span().merge(&rp.span);
            return Ok(ast::Expr::Tuple(ast::TupleLit { items, span }));
        }
        cur.expect(TokenKind::RParen, None)?;
        return Ok(first);
    }

    if cur.at(TokenKind::KwAwait) {
        let kw = cur.advance();
        let qn = parse_qualified_name(cur)?;
        let span = kw.span.merge(&qn.span);
        return Ok(ast::Expr::Await(ast::AwaitExpr {
            event_type: qn,
            span,
        }));
    }

    if cur.at(TokenKind::KwRpc) {
        let kw = cur.advance();
        let (sector, fn_name, args, rp) = parse_sector_call_args(cur)?;
        let span = kw.span.merge(&rp.span);
        return Ok(ast::Expr::Rpc(ast::SectorCallExpr {
            sector,
            fn_name,
            args,
            span,
        }));
    }

    if cur.at(TokenKind::KwCall) {
        let kw = cur.advance();
        let (sector, fn_name, args, rp) = parse_sector_call_args(cur)?;
        let span = kw.span.merge(&rp.span);
        return Ok(ast::Expr::CallSector(ast::SectorCallExpr {
            sector,
            fn_name,
            args,
            span,
        }));
    }

    if cur.at(TokenKind::KwProceed) {
        let kw = cur.advance();
        cur.expect(TokenKind::LParen, None)?;
        let mut args: Vec<ast::Expr> = Vec::new();
        if !cur.at(TokenKind::RParen) {
            args.push(parse_expr(cur)?);
            while cur.eat(TokenKind::Comma).is_some() {
                if cur.at(TokenKind::RParen) {
                    break;
                }
                args.push(parse_expr(cur)?);
            }
        }
        let rp = cur.expect(TokenKind::RParen, None)?;
        let span = kw.span.merge(&rp.span);
        return Ok(ast::Expr::Proceed(ast::ProceedExpr { args, span }));
    }

    Err(Diagnostic::parse("Expected expression", t.span))
}

fn parse_record_lit(cur: &mut Cursor) -> ParseResult<ast::Expr> {
    let l = cur.expect(TokenKind::LBrace, None)?;
    let mut items: Vec<ast::RecordItem> = Vec::new();
    if !cur.at(TokenKind::RBrace) {
        items.push(parse_record_item(cur)?);
        while cur.eat(TokenKind::Comma).is_some() {
            if cur.at(TokenKind::RBrace) {
                break;
            }
            items.push(parse_record_item(cur)?);
        }
    }
    let r = cur.expect(TokenKind::RBrace, None)?;
    Ok(ast::Expr::Record(ast::RecordLit {
        items,
        span: l.span.merge(&r.span),
    }))
}

fn parse_record_item(cur: &mut Cursor) -> ParseResult<ast::RecordItem> {
    let key = parse_ident(cur)?;
    cur.expect(TokenKind::Eq, None)?;
    let value = parse_expr(cur)?;
    let span = key.span.merge(value.span());
    Ok(ast::RecordItem { key, value, span })
}

fn parse_match(cur: &mut Cursor) -> ParseResult<ast::Expr> {
    let kw = cur.expect(TokenKind::KwMatch, None)?;
    let scrut = parse_expr(cur)?;
    cur.expect(TokenKind::Colon, Some("Expected ':' after match scrutinee"))?;
    cur.expect(TokenKind::Nl, Some("Expected newline after match header"))?;
    cur.expect(TokenKind::Indent, Some("Expected indented match arms"))?;
    let mut arms: Vec<ast::MatchArm> = Vec::new();
    while !cur.at(TokenKind::Dedent) && !cur.at(TokenKind::Eof) {
        if cur.at(TokenKind::Nl) {
            cur.advance();
            continue;
        }
        if cur.at(TokenKind::Arrow) {
            return Err(Diagnostic::parse(
                "Expected match arm pattern before '->'",
                cur.peek().span.clone(),
            ));
        }
        if cur.at(TokenKind::KwDo) {
            return Err(Diagnostic::parse(
                "Expected match arm pattern before 'do:'",
                cur.peek().span.clone(),
            ));
        }
        let pat = parse_pattern(cur)?;
        cur.expect(TokenKind::Arrow, Some("Expected '->' after match arm pattern"))?;
        if cur.at(TokenKind::Nl) {
            return Err(Diagnostic::parse(
                "Expected match arm body after '->' (expression or do: block)",
                cur.peek().span.clone(),
            ));
        }
        let body = if cur.at(TokenKind::KwDo) {
            let kw_do = cur.advance();
            let block = parse_block_after_colon(cur, &kw_do.span)?;
            let span = kw_do.span.merge(&block.span);
            ast::MatchArmBody::Do(block, span)
        } else {
            ast::MatchArmBody::Expr(parse_expr(cur)?)
        };
        if cur.at(TokenKind::Nl) {
            cur.advance();
        }
        let span = pat.span().merge(body.span());
        arms.push(ast::MatchArm { pat, body, span });
    }
    let ded = cur.expect(TokenKind::Dedent, None)?;
    let span = kw.span.merge(&ded.span);
    Ok(ast::Expr::Match(ast::MatchExpr {
        scrutinee: Box::new(scrut),
        arms,
        span,
    }))
}

pub(crate) fn parse_pattern(cur: &mut Cursor) -> ParseResult<ast::Pattern> {
    let t = cur.peek().clone();
    if t.kind == TokenKind::Ident && t.text == "_" {
        cur.advance();
        return Ok(ast::Pattern::Wildcard(t.span));
    }

    if t.kind == TokenKind::Bool {
        let tok = cur.advance();
        return Ok(ast::Pattern::Bool(tok.text == "true", tok.span));
    }

    let name = parse_qualified_name(cur)?;
    if cur.eat(TokenKind::LParen).is_some() {
        let mut args: Vec<ast::Pattern> = Vec::new();
        if !cur.at(TokenKind::RParen) {
            args.push(parse_pattern(cur)?);
            while cur.eat(TokenKind::Comma).is_some() {
                args.push(parse_pattern(cur)?);
            }
        }
        let rp = cur.expect(TokenKind::RParen, None)?;
        let span = name.span.merge(&rp.span);
        return Ok(ast::Pattern::Ctor(ast::PCtor {
            name,
            args: Some(args),
            span,
        }));
    }

    if name.parts.len() == 1 {
        // Uppercase identifiers are constructors or pattern aliases; this
        // also makes nullary constructors like `None` parse as constructor
        // patterns rather than binders.
        let first_upper = name.parts[0]
            .name
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false);
        if first_upper {
            let span = name.span.clone();
            return Ok(ast::Pattern::Ctor(ast::PCtor {
                name,
                args: None,
                span,
            }));
        }
        let ident = name.parts.into_iter().next().unwrap();
        return Ok(ast::Pattern::Var(ident));
    }
    let span = name.span.clone();
    Ok(ast::Pattern::Ctor(ast::PCtor {
        name,
        args: None,
        span,
    }))
}
