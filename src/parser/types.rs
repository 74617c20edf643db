//! Type annotation parsing.
//!
//! Handles named types and array types. Like expression parsing this goes
//! through NUD/LED lookup tables, though the grammar only ever needs the
//! identifier NUD and the `[` LED.

use std::collections::HashMap;

use crate::{
    ast::{
        ast::Expr,
        types::{TypeExpr, TypeExprKind},
    },
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
};

use super::{expr::parse_expr, lookups::BindingPower, parser::Parser};

pub type TypeNUDHandler = fn(&mut Parser) -> Result<TypeExpr, Error>;
pub type TypeLEDHandler = fn(&mut Parser, TypeExpr, BindingPower) -> Result<TypeExpr, Error>;

pub type TypeNUDLookup = HashMap<TokenKind, TypeNUDHandler>;
pub type TypeLEDLookup = HashMap<TokenKind, TypeLEDHandler>;
pub type TypeBPLookup = HashMap<TokenKind, BindingPower>;

pub fn create_token_type_lookups(parser: &mut Parser) {
    parser.type_nud(TokenKind::Identifier, parse_named_type);
    parser.type_led(TokenKind::OpenBracket, BindingPower::Call, parse_array_type);
}

pub fn parse_named_type(parser: &mut Parser) -> Result<TypeExpr, Error> {
    let id = parser.advance_id();
    let token = parser.expect(TokenKind::Identifier)?;

    Ok(TypeExpr {
        id,
        span: token.span,
        kind: TypeExprKind::Named(token.value),
    })
}

/// Parses the bracket suffixes of an array annotation.
///
/// `Int[2][1]` means two elements of type `Int[1]`, so the dimensions are
/// collected first and folded from the innermost outwards.
pub fn parse_array_type(
    parser: &mut Parser,
    left: TypeExpr,
    _bp: BindingPower,
) -> Result<TypeExpr, Error> {
    let mut dimensions: Vec<Option<Expr>> = Vec::new();

    while parser.current_token_kind() == TokenKind::OpenBracket {
        parser.advance();

        let size = if parser.current_token_kind() != TokenKind::CloseBracket {
            Some(parse_expr(parser, BindingPower::Default)?)
        } else {
            None
        };

        parser.expect(TokenKind::CloseBracket)?;
        dimensions.push(size);
    }

    let mut ty = left;
    for size in dimensions.into_iter().rev() {
        ty = TypeExpr {
            id: parser.advance_id(),
            span: ty.span.clone(),
            kind: TypeExprKind::Array {
                element: Box::new(ty),
                size: size.map(Box::new),
            },
        };
    }

    Ok(ty)
}

pub fn parse_type(parser: &mut Parser, bp: BindingPower) -> Result<TypeExpr, Error> {
    // First parse NUD
    let token_kind = parser.current_token_kind();
    if !parser.get_type_nud_lookup().contains_key(&token_kind) {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: parser.current_token().value.clone(),
            },
            parser.get_position(),
        ));
    }

    let mut left = parser.get_type_nud_lookup().get(&token_kind).unwrap()(parser)?;

    loop {
        let token_kind = parser.current_token_kind();
        if !parser.get_type_led_lookup().contains_key(&token_kind) {
            break;
        }
        let token_bp = *parser
            .get_type_bp_lookup()
            .get(&token_kind)
            .unwrap_or(&BindingPower::Default);
        if token_bp <= bp {
            break;
        }

        left = parser.get_type_led_lookup().get(&token_kind).unwrap()(parser, left, token_bp)?;
    }

    Ok(left)
}
