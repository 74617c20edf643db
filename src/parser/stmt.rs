use std::rc::Rc;

use crate::{
    ast::{
        statements::{FieldDecl, FunDecl, Param, Stmt, StmtKind, TypeDecl},
        types::TypeExpr,
    },
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
    parser::{expr::parse_expr, lookups::BindingPower},
    Span,
};

use super::{parser::Parser, types::parse_type};

pub fn parse_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    if parser.get_stmt_lookup().contains_key(&parser.current_token_kind()) {
        return parser.get_stmt_lookup().get(&parser.current_token_kind()).unwrap()(parser);
    }

    let expr = parse_expr(parser, BindingPower::Default)?;
    parser.skip_semicolons();

    Ok(Stmt {
        id: parser.advance_id(),
        span: expr.span.clone(),
        kind: StmtKind::Expression(expr),
    })
}

pub fn parse_var_decl_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start_token = parser.advance().clone();

    let error = Error::new(
        ErrorImpl::UnexpectedTokenDetailed {
            token: parser.current_token().value.clone(),
            message: String::from("expected identifier during variable declaration"),
        },
        parser.get_position(),
    );
    let variable_name = parser.expect_error(TokenKind::Identifier, Some(error))?.value;

    // Declarations always carry an explicit type
    parser.expect(TokenKind::Colon)?;
    let explicit_type = parse_type(parser, BindingPower::Default)?;

    let assigned_value = if parser.current_token_kind() == TokenKind::Assignment {
        parser.advance();
        Some(parse_expr(parser, BindingPower::Default)?)
    } else {
        None
    };

    parser.skip_semicolons();

    Ok(Stmt {
        id: parser.advance_id(),
        span: Span {
            start: start_token.span.start.clone(),
            end: parser.get_position(),
        },
        kind: StmtKind::VarDecl {
            name: variable_name,
            ty: explicit_type,
            init: assigned_value,
        },
    })
}

pub fn parse_if_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start.clone();

    let condition = parse_expr(parser, BindingPower::Default)?;
    let body = parse_stmt(parser)?;

    let else_body = if parser.current_token_kind() == TokenKind::Else {
        parser.advance();
        Some(Box::new(parse_stmt(parser)?))
    } else {
        None
    };

    Ok(Stmt {
        id: parser.advance_id(),
        span: Span {
            start,
            end: parser.get_position(),
        },
        kind: StmtKind::If {
            condition,
            then_body: Box::new(body),
            else_body,
        },
    })
}

pub fn parse_while_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start.clone();

    let condition = parse_expr(parser, BindingPower::Default)?;
    let body = parse_stmt(parser)?;

    Ok(Stmt {
        id: parser.advance_id(),
        span: Span {
            start,
            end: parser.get_position(),
        },
        kind: StmtKind::While {
            condition,
            body: Box::new(body),
        },
    })
}

pub fn parse_block_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.current_token().span.start.clone();
    let statements = parse_block_body(parser)?;

    Ok(Stmt {
        id: parser.advance_id(),
        span: Span {
            start,
            end: parser.get_position(),
        },
        kind: StmtKind::Block(statements),
    })
}

/// Parses `{ ... }` and returns the inner statements.
pub fn parse_block_body(parser: &mut Parser) -> Result<Vec<Stmt>, Error> {
    parser.expect(TokenKind::OpenCurly)?;

    let mut statements = Vec::new();
    parser.skip_semicolons();
    while parser.current_token_kind() != TokenKind::CloseCurly {
        statements.push(parse_stmt(parser)?);
        parser.skip_semicolons();
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(statements)
}

pub fn parse_fun_decl_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let fun = parse_fun_decl(parser)?;

    Ok(Stmt {
        id: parser.advance_id(),
        span: fun.span.clone(),
        kind: StmtKind::FunDecl(fun),
    })
}

pub fn parse_fun_decl(parser: &mut Parser) -> Result<Rc<FunDecl>, Error> {
    let start = parser.expect(TokenKind::Fun)?.span.start.clone();

    let identifier = parser.expect(TokenKind::Identifier)?.value;

    parser.expect(TokenKind::OpenParen)?;

    let mut parameters = Vec::new();
    while parser.current_token_kind() != TokenKind::CloseParen {
        let name_token = parser.expect(TokenKind::Identifier)?;
        parser.expect(TokenKind::Colon)?;
        let ty = parse_type(parser, BindingPower::Default)?;
        parameters.push(Param {
            id: parser.advance_id(),
            span: name_token.span,
            name: name_token.value,
            ty,
        });

        if parser.current_token_kind() == TokenKind::Comma {
            parser.advance();
        }
    }

    parser.expect(TokenKind::CloseParen)?;

    let return_type = if parser.current_token_kind() == TokenKind::Colon {
        parser.advance();
        Some(parse_type(parser, BindingPower::Default)?)
    } else {
        None
    };

    let body = parse_block_body(parser)?;

    Ok(Rc::new(FunDecl {
        id: parser.advance_id(),
        span: Span {
            start,
            end: parser.get_position(),
        },
        name: identifier,
        params: parameters,
        return_type,
        body,
    }))
}

pub fn parse_struct_decl_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let decl = parse_type_decl(parser, false)?;

    Ok(Stmt {
        id: parser.advance_id(),
        span: decl.span.clone(),
        kind: StmtKind::StructDecl(decl),
    })
}

pub fn parse_class_decl_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let decl = parse_type_decl(parser, true)?;

    Ok(Stmt {
        id: parser.advance_id(),
        span: decl.span.clone(),
        kind: StmtKind::ClassDecl(decl),
    })
}

fn parse_type_decl(parser: &mut Parser, allow_methods: bool) -> Result<Rc<TypeDecl>, Error> {
    let start = parser.advance().span.start.clone();

    let identifier = parser.expect(TokenKind::Identifier)?.value;

    parser.expect(TokenKind::OpenCurly)?;

    let mut fields = Vec::new();
    let mut methods = Vec::new();

    parser.skip_semicolons();
    while parser.current_token_kind() != TokenKind::CloseCurly {
        match parser.current_token_kind() {
            TokenKind::Var => {
                parser.advance();
                let name_token = parser.expect(TokenKind::Identifier)?;
                parser.expect(TokenKind::Colon)?;
                let ty = parse_field_type(parser)?;
                fields.push(FieldDecl {
                    id: parser.advance_id(),
                    span: name_token.span,
                    name: name_token.value,
                    ty,
                });
            }
            TokenKind::Fun if allow_methods => {
                methods.push(parse_fun_decl(parser)?);
            }
            _ => {
                return Err(Error::new(
                    ErrorImpl::UnexpectedTokenDetailed {
                        token: parser.current_token().value.clone(),
                        message: String::from("expected a field declaration"),
                    },
                    parser.get_position(),
                ))
            }
        }
        parser.skip_semicolons();
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(Rc::new(TypeDecl {
        id: parser.advance_id(),
        span: Span {
            start,
            end: parser.get_position(),
        },
        name: identifier,
        fields,
        methods,
    }))
}

fn parse_field_type(parser: &mut Parser) -> Result<TypeExpr, Error> {
    parse_type(parser, BindingPower::Default)
}

pub fn parse_return_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start.clone();

    let value = match parser.current_token_kind() {
        TokenKind::Semicolon | TokenKind::CloseCurly | TokenKind::EOF => None,
        _ => Some(parse_expr(parser, BindingPower::Default)?),
    };

    parser.skip_semicolons();

    Ok(Stmt {
        id: parser.advance_id(),
        span: Span {
            start,
            end: parser.get_position(),
        },
        kind: StmtKind::Return(value),
    })
}
