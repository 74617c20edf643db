use crate::{
    ast::ast::{BinaryOp, Expr, ExprKind, UnaryOp},
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
    Span,
};

use super::{lookups::BindingPower, parser::Parser};

pub fn parse_expr(parser: &mut Parser, bp: BindingPower) -> Result<Expr, Error> {
    // First parse NUD
    let token_kind = parser.current_token_kind();
    if !parser.get_nud_lookup().contains_key(&token_kind) {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: parser.current_token().value.clone(),
            },
            parser.get_position(),
        ));
    }

    let mut left = parser.get_nud_lookup().get(&token_kind).unwrap()(parser)?;

    // While the current token has an infix role and binds tighter than the
    // caller, keep extending the left-hand side. Tokens without a LED end
    // the expression, which is what lets statements sit on bare newlines.
    loop {
        let token_kind = parser.current_token_kind();
        if !parser.get_led_lookup().contains_key(&token_kind) {
            break;
        }
        let token_bp = *parser
            .get_bp_lookup()
            .get(&token_kind)
            .unwrap_or(&BindingPower::Default);
        if token_bp <= bp {
            break;
        }

        left = parser.get_led_lookup().get(&token_kind).unwrap()(parser, left, token_bp)?;
    }

    Ok(left)
}

pub fn parse_primary_expr(parser: &mut Parser) -> Result<Expr, Error> {
    match parser.current_token_kind() {
        TokenKind::Number => {
            let value = parser.current_token().value.clone();
            let position = parser.get_position();

            let kind = if value.contains('.') {
                match value.parse::<f64>() {
                    Ok(f) => ExprKind::Float(f),
                    Err(_) => {
                        return Err(Error::new(ErrorImpl::NumberParseError { token: value }, position))
                    }
                }
            } else {
                match value.parse::<i64>() {
                    Ok(i) => ExprKind::Int(i),
                    Err(_) => {
                        return Err(Error::new(ErrorImpl::NumberParseError { token: value }, position))
                    }
                }
            };

            Ok(Expr {
                id: parser.advance_id(),
                span: parser.advance().span.clone(),
                kind,
            })
        }
        TokenKind::Identifier => Ok(Expr {
            id: parser.advance_id(),
            kind: ExprKind::Identifier(parser.current_token().value.clone()),
            span: parser.advance().span.clone(),
        }),
        TokenKind::String => Ok(Expr {
            id: parser.advance_id(),
            kind: ExprKind::Str(parser.current_token().value.clone()),
            span: parser.advance().span.clone(),
        }),
        _ => Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: parser.current_token().value.clone(),
            },
            parser.get_position(),
        )),
    }
}

pub fn parse_literal_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let id = parser.advance_id();
    let token = parser.advance().clone();

    let kind = match token.kind {
        TokenKind::True => ExprKind::Bool(true),
        TokenKind::False => ExprKind::Bool(false),
        TokenKind::Null => ExprKind::Null,
        _ => {
            return Err(Error::new(
                ErrorImpl::UnexpectedToken { token: token.value },
                token.span.start,
            ))
        }
    };

    Ok(Expr {
        id,
        span: token.span,
        kind,
    })
}

pub fn parse_binary_expr(parser: &mut Parser, left: Expr, bp: BindingPower) -> Result<Expr, Error> {
    let operator_token = parser.advance().clone();
    let op = binary_op(operator_token.kind);

    let right = parse_expr(parser, bp)?;

    Ok(Expr {
        id: parser.advance_id(),
        span: Span {
            start: left.span.start.clone(),
            end: right.span.end.clone(),
        },
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    })
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Dash => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::At => BinaryOp::MatMul,
        TokenKind::Equals => BinaryOp::Eq,
        TokenKind::NotEquals => BinaryOp::NotEq,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEquals => BinaryOp::LessEq,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEquals => BinaryOp::GreaterEq,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        // Only operator tokens are registered with parse_binary_expr
        _ => unreachable!("{:?} is not a binary operator", kind),
    }
}

pub fn parse_prefix_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let operator_token = parser.advance().clone();
    let op = match operator_token.kind {
        TokenKind::Not => UnaryOp::Not,
        _ => UnaryOp::Neg,
    };

    let rhs = parse_expr(parser, BindingPower::Unary)?;

    Ok(Expr {
        id: parser.advance_id(),
        span: Span {
            start: operator_token.span.start.clone(),
            end: rhs.span.end.clone(),
        },
        kind: ExprKind::Unary {
            op,
            operand: Box::new(rhs),
        },
    })
}

pub fn parse_assignment_expr(parser: &mut Parser, left: Expr, _bp: BindingPower) -> Result<Expr, Error> {
    parser.advance();
    // Right associative, so the value is parsed from the lowest level
    let rhs = parse_expr(parser, BindingPower::Default)?;

    Ok(Expr {
        id: parser.advance_id(),
        span: Span {
            start: left.span.start.clone(),
            end: rhs.span.end.clone(),
        },
        kind: ExprKind::Assign {
            target: Box::new(left),
            value: Box::new(rhs),
        },
    })
}

pub fn parse_grouping_expr(parser: &mut Parser) -> Result<Expr, Error> {
    parser.expect(TokenKind::OpenParen)?;
    let expr = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::CloseParen)?;

    Ok(expr)
}

pub fn parse_call_expr(parser: &mut Parser, left: Expr, _bp: BindingPower) -> Result<Expr, Error> {
    parser.expect(TokenKind::OpenParen)?;

    let mut args = vec![];

    while parser.current_token_kind() != TokenKind::CloseParen {
        args.push(parse_expr(parser, BindingPower::Comma)?);

        if parser.current_token_kind() == TokenKind::Comma {
            parser.advance();
        }
    }

    parser.expect(TokenKind::CloseParen)?;

    Ok(Expr {
        id: parser.advance_id(),
        span: Span {
            start: left.span.start.clone(),
            end: parser.get_position(),
        },
        kind: ExprKind::Call {
            callee: Box::new(left),
            args,
        },
    })
}

pub fn parse_index_expr(parser: &mut Parser, left: Expr, _bp: BindingPower) -> Result<Expr, Error> {
    parser.expect(TokenKind::OpenBracket)?;
    let index = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::CloseBracket)?;

    Ok(Expr {
        id: parser.advance_id(),
        span: Span {
            start: left.span.start.clone(),
            end: parser.get_position(),
        },
        kind: ExprKind::Index {
            target: Box::new(left),
            index: Box::new(index),
        },
    })
}

pub fn parse_member_expr(parser: &mut Parser, left: Expr, _bp: BindingPower) -> Result<Expr, Error> {
    parser.expect(TokenKind::Dot)?;
    let member = parser.expect(TokenKind::Identifier)?;

    Ok(Expr {
        id: parser.advance_id(),
        span: Span {
            start: left.span.start.clone(),
            end: member.span.end.clone(),
        },
        kind: ExprKind::Field {
            target: Box::new(left),
            field: member.value,
        },
    })
}

pub fn parse_array_literal_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.expect(TokenKind::OpenBracket)?.span.start.clone();

    let mut elements = vec![];

    while parser.current_token_kind() != TokenKind::CloseBracket {
        elements.push(parse_expr(parser, BindingPower::Comma)?);

        if parser.current_token_kind() == TokenKind::Comma {
            parser.advance();
        }
    }

    let end = parser.expect(TokenKind::CloseBracket)?.span.end.clone();

    Ok(Expr {
        id: parser.advance_id(),
        span: Span { start, end },
        kind: ExprKind::Array(elements),
    })
}

pub fn parse_construct_expr(parser: &mut Parser) -> Result<Expr, Error> {
    // $Point(1, 2)
    let start = parser.expect(TokenKind::Dollar)?.span.start.clone();

    let error = Error::new(
        ErrorImpl::UnexpectedTokenDetailed {
            token: parser.current_token().value.clone(),
            message: String::from("expected a struct or class name after `$`"),
        },
        parser.get_position(),
    );
    let name = parser.expect_error(TokenKind::Identifier, Some(error))?.value;

    parser.expect(TokenKind::OpenParen)?;

    let mut args = vec![];

    while parser.current_token_kind() != TokenKind::CloseParen {
        args.push(parse_expr(parser, BindingPower::Comma)?);

        if parser.current_token_kind() == TokenKind::Comma {
            parser.advance();
        }
    }

    let end = parser.expect(TokenKind::CloseParen)?.span.end.clone();

    Ok(Expr {
        id: parser.advance_id(),
        span: Span { start, end },
        kind: ExprKind::Construct { name, args },
    })
}
