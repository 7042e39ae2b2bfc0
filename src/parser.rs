//! The parser: model text in, declaration tree out.
//!
//! A hand-written recursive-descent parser over the token stream from [`crate::lexer`]. It builds
//! the tree only; name resolution happens later in [`crate::symbols`]. The first malformed
//! statement aborts parsing with a [`CompileError::Syntax`] carrying the offending position and
//! what the parser was looking for.
use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use crate::lexer::{lex, line_col, Span, Token};

/// Parse a complete model file (model section, optional data block, `end;`).
pub fn parse(src: &str) -> CompileResult<ModelFile> {
    Parser::new(src)?.parse_model_file()
}

/// Parse a standalone data file (`data; … end;`, or bare data statements).
pub fn parse_data(src: &str) -> CompileResult<Vec<DataStatement>> {
    let mut parser = Parser::new(src)?;
    if parser.eat(&Token::Data) {
        parser.expect(&Token::Semi, "`;`")?;
    }
    parser.parse_data_statements()
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> CompileResult<Self> {
        Ok(Self {
            src,
            tokens: lex(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consume the next token if it equals `token`.
    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// A syntax error at the current position.
    fn expected(&self, expected: &str) -> CompileError {
        let (offset, found) = match self.tokens.get(self.pos) {
            Some((token, span)) => (span.start, token.to_string()),
            None => (self.src.len(), "end of input".to_string()),
        };
        let (line, column) = line_col(self.src, offset);
        CompileError::Syntax {
            line,
            column,
            expected: expected.to_string(),
            found,
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> CompileResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn ident(&mut self, expected: &str) -> CompileResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.expected(expected)),
        }
    }

    fn parse_model_file(&mut self) -> CompileResult<ModelFile> {
        let mut model = ModelFile::default();
        loop {
            match self.peek() {
                Some(Token::Set) => {
                    self.pos += 1;
                    model.declarations.push(Declaration::Set(self.parse_set()?));
                }
                Some(Token::Param) => {
                    self.pos += 1;
                    model
                        .declarations
                        .push(Declaration::Param(self.parse_param()?));
                }
                Some(Token::Var) => {
                    self.pos += 1;
                    model.declarations.push(Declaration::Var(self.parse_var()?));
                }
                Some(Token::SubjectTo) => {
                    self.pos += 1;
                    model
                        .declarations
                        .push(Declaration::Constraint(self.parse_constraint()?));
                }
                Some(Token::Maximize) => {
                    self.pos += 1;
                    model
                        .declarations
                        .push(Declaration::Objective(self.parse_objective(ObjectiveSense::Maximize)?));
                }
                Some(Token::Minimize) => {
                    self.pos += 1;
                    model
                        .declarations
                        .push(Declaration::Objective(self.parse_objective(ObjectiveSense::Minimize)?));
                }
                Some(Token::Solve) => {
                    // A terminal marker only; nothing to record
                    self.pos += 1;
                    self.expect(&Token::Semi, "`;`")?;
                }
                Some(Token::Data) => {
                    self.pos += 1;
                    self.expect(&Token::Semi, "`;`")?;
                    model.data = self.parse_data_statements()?;
                }
                Some(Token::End) => {
                    self.pos += 1;
                    self.expect(&Token::Semi, "`;`")?;
                    break;
                }
                Some(_) => return Err(self.expected("a statement keyword")),
                None => break,
            }
        }
        if self.pos < self.tokens.len() {
            return Err(self.expected("end of input"));
        }
        Ok(model)
    }

    /// `set NAME [:= lo..hi | := {i in S : pred}] ;`
    fn parse_set(&mut self) -> CompileResult<SetDecl> {
        let name = self.ident("a set name")?;
        let body = if self.eat(&Token::Assign) {
            if self.peek() == Some(&Token::BraceOpen) {
                Some(SetBody::Builder(self.parse_index_header()?))
            } else {
                let lo = self.parse_expr()?;
                self.expect(&Token::DotDot, "`..`")?;
                let hi = self.parse_expr()?;
                Some(SetBody::Range(lo, hi))
            }
        } else {
            None
        };
        self.expect(&Token::Semi, "`;`")?;
        Ok(SetDecl { name, body })
    }

    /// `param NAME [{header}] [, >= expr]… [:= expr] ;`
    fn parse_param(&mut self) -> CompileResult<ParamDecl> {
        let name = self.ident("a parameter name")?;
        let header = self.parse_optional_header()?;

        let mut restrictions = Vec::new();
        let mut value = None;
        loop {
            // Attribute separators are optional
            let _ = self.eat(&Token::Comma);
            match self.peek() {
                Some(Token::Semi) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Assign) => {
                    self.pos += 1;
                    value = Some(self.parse_expr()?);
                }
                Some(op) => {
                    let op = match op {
                        Token::Eq => CmpOp::Eq,
                        Token::NotEq => CmpOp::NotEq,
                        Token::Lt => CmpOp::Lt,
                        Token::LtEq => CmpOp::LtEq,
                        Token::Gt => CmpOp::Gt,
                        Token::GtEq => CmpOp::GtEq,
                        _ => return Err(self.expected("a parameter attribute or `;`")),
                    };
                    self.pos += 1;
                    restrictions.push(ParamRestriction {
                        op,
                        bound: self.parse_expr()?,
                    });
                }
                None => return Err(self.expected("`;`")),
            }
        }

        Ok(ParamDecl {
            name,
            header,
            restrictions,
            value,
        })
    }

    /// `var NAME [{header}] [integer|binary] [>= expr] [<= expr] ;`
    fn parse_var(&mut self) -> CompileResult<VarDecl> {
        let name = self.ident("a variable name")?;
        let header = self.parse_optional_header()?;

        let mut domain = VarDomain::default();
        let mut lower = None;
        let mut upper = None;
        loop {
            let _ = self.eat(&Token::Comma);
            match self.peek() {
                Some(Token::Semi) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Integer) => {
                    self.pos += 1;
                    domain = VarDomain::Integer;
                }
                Some(Token::Binary) => {
                    self.pos += 1;
                    domain = VarDomain::Binary;
                }
                Some(Token::GtEq) => {
                    self.pos += 1;
                    lower = Some(self.parse_expr()?);
                }
                Some(Token::LtEq) => {
                    self.pos += 1;
                    upper = Some(self.parse_expr()?);
                }
                _ => return Err(self.expected("a variable attribute or `;`")),
            }
        }

        Ok(VarDecl {
            name,
            header,
            domain,
            lower,
            upper,
        })
    }

    /// `s.t. NAME [{header}] : lhs (=|<=|>=) rhs ;`
    fn parse_constraint(&mut self) -> CompileResult<ConstraintDecl> {
        let name = self.ident("a constraint name")?;
        let header = self.parse_optional_header()?;
        self.expect(&Token::Colon, "`:`")?;
        let lhs = self.parse_expr()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::LtEq) => CmpOp::LtEq,
            Some(Token::GtEq) => CmpOp::GtEq,
            _ => return Err(self.expected("`=`, `<=` or `>=`")),
        };
        self.pos += 1;
        let rhs = self.parse_expr()?;
        self.expect(&Token::Semi, "`;`")?;
        Ok(ConstraintDecl {
            name,
            header,
            lhs,
            op,
            rhs,
        })
    }

    /// `maximize NAME : expr ;` (or `minimize`)
    fn parse_objective(&mut self, sense: ObjectiveSense) -> CompileResult<ObjectiveDecl> {
        let name = self.ident("an objective name")?;
        self.expect(&Token::Colon, "`:`")?;
        let expr = self.parse_expr()?;
        self.expect(&Token::Semi, "`;`")?;
        Ok(ObjectiveDecl { name, sense, expr })
    }

    fn parse_optional_header(&mut self) -> CompileResult<Option<IndexHeader>> {
        if self.peek() == Some(&Token::BraceOpen) {
            Ok(Some(self.parse_index_header()?))
        } else {
            Ok(None)
        }
    }

    /// `{i in S, j in 1..n : pred}`
    fn parse_index_header(&mut self) -> CompileResult<IndexHeader> {
        self.expect(&Token::BraceOpen, "`{`")?;
        let mut entries = Vec::new();
        loop {
            let var = self.ident("an index variable")?;
            self.expect(&Token::In, "`in`")?;
            let set = match self.peek() {
                // A named set, unless the name starts a range expression (`m in k..n`)
                Some(Token::Ident(name))
                    if !matches!(
                        self.tokens.get(self.pos + 1).map(|(t, _)| t),
                        Some(Token::DotDot)
                    ) =>
                {
                    let name = name.clone();
                    self.pos += 1;
                    SetRef::Named(name)
                }
                _ => {
                    let lo = self.parse_expr()?;
                    self.expect(&Token::DotDot, "`..`")?;
                    let hi = self.parse_expr()?;
                    SetRef::Range(Box::new(lo), Box::new(hi))
                }
            };
            entries.push(IndexEntry { var, set });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let filter = if self.eat(&Token::Colon) {
            Some(self.parse_predicate()?)
        } else {
            None
        };
        self.expect(&Token::BraceClose, "`}`")?;
        Ok(IndexHeader { entries, filter })
    }

    fn parse_predicate(&mut self) -> CompileResult<Predicate> {
        let mut lhs = self.parse_predicate_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_predicate_and()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_predicate_and(&mut self) -> CompileResult<Predicate> {
        let mut lhs = self.parse_predicate_atom()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_predicate_atom()?;
            lhs = Predicate::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_predicate_atom(&mut self) -> CompileResult<Predicate> {
        if self.eat(&Token::Not) {
            return Ok(Predicate::Not(Box::new(self.parse_predicate_atom()?)));
        }

        // `(` can open either a parenthesised predicate or a parenthesised scalar expression;
        // try the predicate reading first and fall back on the comparison reading.
        if self.peek() == Some(&Token::ParenOpen) {
            let saved = self.pos;
            self.pos += 1;
            if let Ok(inner) = self.parse_predicate() {
                if self.eat(&Token::ParenClose) {
                    return Ok(inner);
                }
            }
            self.pos = saved;
        }

        let lhs = self.parse_expr()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::NotEq,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::LtEq) => CmpOp::LtEq,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::GtEq) => CmpOp::GtEq,
            _ => return Err(self.expected("a comparison operator")),
        };
        self.pos += 1;
        let rhs = self.parse_expr()?;
        Ok(Predicate::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_expr(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> CompileResult<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_factor()?)))
            }
            Some(Token::Int(value)) => {
                let value = *value;
                self.pos += 1;
                Ok(Expr::Number(value as f64))
            }
            Some(Token::Float(value)) => {
                let value = *value;
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Token::ParenOpen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(&Token::ParenClose, "`)`")?;
                Ok(inner)
            }
            Some(Token::Sum) => {
                self.pos += 1;
                let header = self.parse_index_header()?;
                // The summand extends over the following product, not any later `+`/`-` terms
                let body = self.parse_term()?;
                Ok(Expr::Sum {
                    header,
                    body: Box::new(body),
                })
            }
            Some(Token::If) => {
                self.pos += 1;
                let condition = self.parse_predicate()?;
                self.expect(&Token::Then, "`then`")?;
                let then = self.parse_expr()?;
                let otherwise = if self.eat(&Token::Else) {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                Ok(Expr::If {
                    condition,
                    then: Box::new(then),
                    otherwise,
                })
            }
            Some(Token::Ident(_)) => {
                let name = self.ident("an identifier")?;
                let mut subscripts = Vec::new();
                if self.eat(&Token::BracketOpen) {
                    loop {
                        subscripts.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::BracketClose, "`]`")?;
                }
                Ok(Expr::Ref { name, subscripts })
            }
            _ => Err(self.expected("an expression")),
        }
    }

    fn parse_data_statements(&mut self) -> CompileResult<Vec<DataStatement>> {
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Set) => {
                    self.pos += 1;
                    let name = self.ident("a set name")?;
                    self.expect(&Token::Assign, "`:=`")?;
                    let mut elements = Vec::new();
                    while !self.eat(&Token::Semi) {
                        if self.peek().is_none() {
                            return Err(self.expected("`;`"));
                        }
                        elements.push(self.parse_data_atom()?);
                        let _ = self.eat(&Token::Comma);
                    }
                    statements.push(DataStatement::Set { name, elements });
                }
                Some(Token::Param) => {
                    self.pos += 1;
                    let name = self.ident("a parameter name")?;
                    let columns = if self.eat(&Token::Colon) {
                        let mut columns = Vec::new();
                        while self.peek() != Some(&Token::Assign) {
                            if self.peek().is_none() {
                                return Err(self.expected("`:=`"));
                            }
                            columns.push(self.parse_data_atom()?);
                        }
                        Some(columns)
                    } else {
                        None
                    };
                    self.expect(&Token::Assign, "`:=`")?;
                    let mut atoms = Vec::new();
                    while !self.eat(&Token::Semi) {
                        if self.peek().is_none() {
                            return Err(self.expected("`;`"));
                        }
                        atoms.push(self.parse_data_atom()?);
                        let _ = self.eat(&Token::Comma);
                    }
                    statements.push(DataStatement::Param {
                        name,
                        columns,
                        atoms,
                    });
                }
                Some(Token::End) => {
                    self.pos += 1;
                    self.expect(&Token::Semi, "`;`")?;
                    break;
                }
                Some(_) => return Err(self.expected("`set`, `param` or `end`")),
                None => break,
            }
        }
        Ok(statements)
    }

    fn parse_data_atom(&mut self) -> CompileResult<DataAtom> {
        let negative = self.eat(&Token::Minus);
        match self.peek() {
            Some(Token::Int(value)) => {
                let value = if negative { -value } else { *value };
                self.pos += 1;
                Ok(DataAtom::Int(value))
            }
            Some(Token::Float(value)) => {
                let value = if negative { -value } else { *value };
                self.pos += 1;
                Ok(DataAtom::Float(value))
            }
            Some(Token::Ident(name)) if !negative => {
                let name = name.clone();
                self.pos += 1;
                Ok(DataAtom::Name(name))
            }
            _ => Err(self.expected("a data value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_range() {
        let model = parse("param n >= 1; set MONTHS := 1..n; end;").unwrap();
        assert_eq!(model.declarations.len(), 2);
        let Declaration::Set(set) = &model.declarations[1] else {
            panic!("expected a set declaration");
        };
        assert_eq!(set.name, "MONTHS");
        assert!(matches!(set.body, Some(SetBody::Range(_, _))));
    }

    #[test]
    fn test_parse_var_attributes() {
        let model = parse("set N; var x{i in N, j in N : i <> j} binary; end;").unwrap();
        let var = model.variables().next().unwrap();
        assert_eq!(var.name, "x");
        assert_eq!(var.domain, VarDomain::Binary);
        let header = var.header.as_ref().unwrap();
        assert_eq!(header.arity(), 2);
        assert!(header.filter.is_some());
    }

    #[test]
    fn test_parse_constraint_with_filter() {
        let src = "set P; set M; param d{p in P, m in M};
                   var s{p in P, m in M} >= 0;
                   s.t. MinD{p in P, m in M : m > 1}: s[p,m] >= 0.5 * d[p,m];
                   end;";
        let model = parse(src).unwrap();
        let constraint = model.constraints().next().unwrap();
        assert_eq!(constraint.name, "MinD");
        assert_eq!(constraint.op, CmpOp::GtEq);
        assert!(constraint.header.as_ref().unwrap().filter.is_some());
    }

    #[test]
    fn test_parse_objective_with_sum() {
        let src = "set P; param c{p in P}; var x{p in P} >= 0;
                   maximize profit: sum{p in P} c[p] * x[p];
                   solve; end;";
        let model = parse(src).unwrap();
        let objective = model.objective().unwrap();
        assert_eq!(objective.sense, ObjectiveSense::Maximize);
        assert!(matches!(objective.expr, Expr::Sum { .. }));
    }

    #[test]
    fn test_sum_body_stops_at_additive_term() {
        // sum{...} a[i] * x[i] + 5 must parse as (sum …) + 5
        let src = "set I; param a{i in I}; var x{i in I};
                   minimize z: sum{i in I} a[i] * x[i] + 5; end;";
        let model = parse(src).unwrap();
        let Expr::Binary { op, lhs, .. } = &model.objective().unwrap().expr else {
            panic!("expected a binary expression at the top");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(**lhs, Expr::Sum { .. }));
    }

    #[test]
    fn test_parse_conditional() {
        let src = "set N; param n; var f{i in N};
                   s.t. Bal{k in N}: f[k] = if k = 1 then n - 1 else -1;
                   end;";
        let model = parse(src).unwrap();
        let constraint = model.constraints().next().unwrap();
        let Expr::If { otherwise, .. } = &constraint.rhs else {
            panic!("expected a conditional");
        };
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_parse_data_block() {
        let src = "set P; param d{p in P};
                   data;
                   set P := A B;
                   param d := A 100 B 60;
                   end;";
        let model = parse(src).unwrap();
        assert_eq!(model.data.len(), 2);
        assert_eq!(
            model.data[0],
            DataStatement::Set {
                name: "P".to_string(),
                elements: vec![DataAtom::Name("A".into()), DataAtom::Name("B".into())],
            }
        );
    }

    #[test]
    fn test_parse_tabular_param_data() {
        let src = "data;
                   param c : 1 2 :=
                     1 0 10
                     2 10 0;
                   end;";
        let statements = parse_data(src).unwrap();
        let DataStatement::Param { columns, atoms, .. } = &statements[0] else {
            panic!("expected a param statement");
        };
        assert_eq!(
            columns.as_deref(),
            Some(&[DataAtom::Int(1), DataAtom::Int(2)][..])
        );
        assert_eq!(atoms.len(), 6);
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = parse("set ;").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                line: 1,
                column: 5,
                expected: "a set name".to_string(),
                found: "`;`".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_relational_operator() {
        let err = parse("set P; var x; s.t. C: x + 1; end;").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
        assert!(err.to_string().contains("expected `=`, `<=` or `>=`"));
    }
}
