//! The symbol table: a single validation pass over the declaration tree.
//!
//! Runs before any set or expression resolution, so later phases can assume every referenced name
//! exists with the right kind and arity, and that set/parameter definitions are acyclic. The
//! resulting definition order is what the model resolver follows, which is why forward references
//! inside index headers are fine while circular definitions are rejected here.
use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{Graph, NodeIndex};
use std::collections::HashMap;

/// The kind of entity a name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    /// A set
    Set,
    /// A parameter
    Parameter,
    /// A decision variable
    Variable,
    /// A constraint family
    Constraint,
    /// The objective
    Objective,
}

/// What the table records about one declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// The entity kind
    pub kind: SymbolKind,
    /// The declared index arity
    pub arity: usize,
}

/// Every declared name, with kind and arity, plus the dependency order of definitions.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: IndexMap<String, Symbol>,
    /// Set and parameter names in an order where every definition precedes its uses
    pub definition_order: Vec<String>,
}

impl SymbolTable {
    /// Validate the declaration tree and build the table.
    pub fn build(model: &ModelFile) -> CompileResult<Self> {
        let mut table = SymbolTable::default();

        // Declaration pass: register every name before checking any reference, so a constraint
        // may reference a set declared after it in the file.
        for declaration in &model.declarations {
            let (kind, arity) = match declaration {
                Declaration::Set(_) => (SymbolKind::Set, 0),
                Declaration::Param(d) => (SymbolKind::Parameter, d.arity()),
                Declaration::Var(d) => (SymbolKind::Variable, d.arity()),
                Declaration::Constraint(d) => (
                    SymbolKind::Constraint,
                    d.header.as_ref().map_or(0, IndexHeader::arity),
                ),
                Declaration::Objective(_) => (SymbolKind::Objective, 0),
            };
            table.declare(declaration.name(), kind, arity)?;
        }

        // Reference pass
        let mut checker = Checker {
            table: &table,
            scope: Vec::new(),
        };
        for declaration in &model.declarations {
            checker.check_declaration(declaration)?;
            debug_assert!(checker.scope.is_empty());
        }

        table.definition_order = definition_order(model, &table)?;
        Ok(table)
    }

    /// Register a name, failing if it is already bound.
    pub fn declare(&mut self, name: &str, kind: SymbolKind, arity: usize) -> CompileResult<()> {
        if let Some(existing) = self.symbols.get(name) {
            return Err(CompileError::DuplicateSymbol {
                name: name.to_string(),
                existing: existing.kind.to_string(),
            });
        }
        self.symbols.insert(name.to_string(), Symbol { kind, arity });
        Ok(())
    }

    /// Look up a name, failing if it was never declared.
    pub fn resolve(&self, name: &str) -> CompileResult<&Symbol> {
        self.symbols
            .get(name)
            .ok_or_else(|| CompileError::UnknownSymbol(name.to_string()))
    }

    /// Look up a name if it was declared.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Whether `name` is declared as the given kind.
    pub fn is_kind(&self, name: &str, kind: SymbolKind) -> bool {
        self.symbols.get(name).is_some_and(|s| s.kind == kind)
    }
}

/// Walks declarations checking that every reference resolves with the declared kind and arity.
///
/// `scope` tracks the index variables bound by enclosing headers; they shadow global names.
struct Checker<'a> {
    table: &'a SymbolTable,
    scope: Vec<String>,
}

impl Checker<'_> {
    fn check_declaration(&mut self, declaration: &Declaration) -> CompileResult<()> {
        match declaration {
            Declaration::Set(d) => match &d.body {
                Some(SetBody::Range(lo, hi)) => {
                    self.check_expr(lo)?;
                    self.check_expr(hi)
                }
                Some(SetBody::Builder(header)) => {
                    let bound = self.check_header(header)?;
                    self.pop(bound);
                    Ok(())
                }
                None => Ok(()),
            },
            Declaration::Param(d) => {
                let bound = self.check_optional_header(d.header.as_ref())?;
                for restriction in &d.restrictions {
                    self.check_expr(&restriction.bound)?;
                }
                if let Some(value) = &d.value {
                    self.check_expr(value)?;
                }
                self.pop(bound);
                Ok(())
            }
            Declaration::Var(d) => {
                let bound = self.check_optional_header(d.header.as_ref())?;
                if let Some(lower) = &d.lower {
                    self.check_expr(lower)?;
                }
                if let Some(upper) = &d.upper {
                    self.check_expr(upper)?;
                }
                self.pop(bound);
                Ok(())
            }
            Declaration::Constraint(d) => {
                let bound = self.check_optional_header(d.header.as_ref())?;
                self.check_expr(&d.lhs)?;
                self.check_expr(&d.rhs)?;
                self.pop(bound);
                Ok(())
            }
            Declaration::Objective(d) => self.check_expr(&d.expr),
        }
    }

    fn check_optional_header(&mut self, header: Option<&IndexHeader>) -> CompileResult<usize> {
        header.map_or(Ok(0), |h| self.check_header(h))
    }

    /// Check a header, leaving its index variables in scope. Returns how many were bound.
    fn check_header(&mut self, header: &IndexHeader) -> CompileResult<usize> {
        for entry in &header.entries {
            match &entry.set {
                SetRef::Named(name) => {
                    let symbol = self.table.resolve(name)?;
                    if symbol.kind != SymbolKind::Set {
                        return Err(CompileError::instance(format!(
                            "`{name}` is a {} but is used as a set",
                            symbol.kind
                        )));
                    }
                }
                SetRef::Range(lo, hi) => {
                    self.check_expr(lo)?;
                    self.check_expr(hi)?;
                }
            }
            // Bind immediately: a later entry's range may reference this variable
            self.scope.push(entry.var.clone());
        }
        if let Some(filter) = &header.filter {
            self.check_predicate(filter)?;
        }
        Ok(header.entries.len())
    }

    fn pop(&mut self, count: usize) {
        self.scope.truncate(self.scope.len() - count);
    }

    fn check_predicate(&mut self, predicate: &Predicate) -> CompileResult<()> {
        match predicate {
            Predicate::Compare { lhs, rhs, .. } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)
            }
            Predicate::And(lhs, rhs) | Predicate::Or(lhs, rhs) => {
                self.check_predicate(lhs)?;
                self.check_predicate(rhs)
            }
            Predicate::Not(inner) => self.check_predicate(inner),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Number(_) => Ok(()),
            Expr::Ref { name, subscripts } => {
                if self.scope.iter().any(|v| v == name) {
                    if !subscripts.is_empty() {
                        return Err(CompileError::ShapeMismatch {
                            name: name.clone(),
                            expected: 0,
                            found: subscripts.len(),
                        });
                    }
                    return Ok(());
                }
                let Some(symbol) = self.table.get(name) else {
                    if subscripts.is_empty() {
                        // An undeclared bare name is a symbolic element literal, as in `p = basic`
                        return Ok(());
                    }
                    return Err(CompileError::UnknownSymbol(name.to_string()));
                };
                match symbol.kind {
                    SymbolKind::Parameter | SymbolKind::Variable => {
                        if subscripts.len() != symbol.arity {
                            return Err(CompileError::ShapeMismatch {
                                name: name.clone(),
                                expected: symbol.arity,
                                found: subscripts.len(),
                            });
                        }
                    }
                    kind => {
                        return Err(CompileError::instance(format!(
                            "`{name}` is a {kind} and cannot appear in an expression"
                        )));
                    }
                }
                for subscript in subscripts {
                    self.check_expr(subscript)?;
                }
                Ok(())
            }
            Expr::Neg(inner) => self.check_expr(inner),
            Expr::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)
            }
            Expr::Sum { header, body } => {
                let bound = self.check_header(header)?;
                self.check_expr(body)?;
                self.pop(bound);
                Ok(())
            }
            Expr::If {
                condition,
                then,
                otherwise,
            } => {
                self.check_predicate(condition)?;
                self.check_expr(then)?;
                if let Some(otherwise) = otherwise {
                    self.check_expr(otherwise)?;
                }
                Ok(())
            }
        }
    }
}

/// Order set/parameter definitions so every definition precedes its uses.
///
/// Builds the dependency graph of definitions and topologically sorts it; a cycle (including a
/// self-reference) is a `CyclicDefinition` error naming a symbol on the cycle.
fn definition_order(model: &ModelFile, table: &SymbolTable) -> CompileResult<Vec<String>> {
    let mut graph: Graph<String, ()> = Graph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for declaration in &model.declarations {
        if matches!(declaration, Declaration::Set(_) | Declaration::Param(_)) {
            let node = graph.add_node(declaration.name().to_string());
            nodes.insert(declaration.name(), node);
        }
    }

    for declaration in &model.declarations {
        let Some(&target) = nodes.get(declaration.name()) else {
            continue;
        };
        let mut dependencies = Vec::new();
        collect_declaration_deps(declaration, table, &mut dependencies);
        for dependency in dependencies {
            if let Some(&source) = nodes.get(dependency.as_str()) {
                graph.add_edge(source, target, ());
            }
        }
    }

    let order = toposort(&graph, None)
        .map_err(|cycle| CompileError::CyclicDefinition(graph[cycle.node_id()].clone()))?;
    Ok(order.into_iter().map(|node| graph[node].clone()).collect())
}

/// Collect the set/parameter names a definition depends on.
fn collect_declaration_deps(
    declaration: &Declaration,
    table: &SymbolTable,
    out: &mut Vec<String>,
) {
    match declaration {
        Declaration::Set(d) => match &d.body {
            Some(SetBody::Range(lo, hi)) => {
                collect_expr_deps(lo, table, out);
                collect_expr_deps(hi, table, out);
            }
            Some(SetBody::Builder(header)) => collect_header_deps(header, table, out),
            None => {}
        },
        Declaration::Param(d) => {
            if let Some(header) = &d.header {
                collect_header_deps(header, table, out);
            }
            for restriction in &d.restrictions {
                collect_expr_deps(&restriction.bound, table, out);
            }
            if let Some(value) = &d.value {
                collect_expr_deps(value, table, out);
            }
        }
        _ => {}
    }
}

fn collect_header_deps(header: &IndexHeader, table: &SymbolTable, out: &mut Vec<String>) {
    for entry in &header.entries {
        match &entry.set {
            SetRef::Named(name) => out.push(name.clone()),
            SetRef::Range(lo, hi) => {
                collect_expr_deps(lo, table, out);
                collect_expr_deps(hi, table, out);
            }
        }
    }
    if let Some(filter) = &header.filter {
        collect_predicate_deps(filter, table, out);
    }
}

fn collect_predicate_deps(predicate: &Predicate, table: &SymbolTable, out: &mut Vec<String>) {
    match predicate {
        Predicate::Compare { lhs, rhs, .. } => {
            collect_expr_deps(lhs, table, out);
            collect_expr_deps(rhs, table, out);
        }
        Predicate::And(lhs, rhs) | Predicate::Or(lhs, rhs) => {
            collect_predicate_deps(lhs, table, out);
            collect_predicate_deps(rhs, table, out);
        }
        Predicate::Not(inner) => collect_predicate_deps(inner, table, out),
    }
}

fn collect_expr_deps(expr: &Expr, table: &SymbolTable, out: &mut Vec<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ref { name, subscripts } => {
            if table.is_kind(name, SymbolKind::Parameter) || table.is_kind(name, SymbolKind::Set) {
                out.push(name.clone());
            }
            for subscript in subscripts {
                collect_expr_deps(subscript, table, out);
            }
        }
        Expr::Neg(inner) => collect_expr_deps(inner, table, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_expr_deps(lhs, table, out);
            collect_expr_deps(rhs, table, out);
        }
        Expr::Sum { header, body } => {
            collect_header_deps(header, table, out);
            collect_expr_deps(body, table, out);
        }
        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            collect_predicate_deps(condition, table, out);
            collect_expr_deps(then, table, out);
            if let Some(otherwise) = otherwise {
                collect_expr_deps(otherwise, table, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn build(src: &str) -> CompileResult<SymbolTable> {
        SymbolTable::build(&parse(src).unwrap())
    }

    #[test]
    fn test_declares_kinds_and_arities() {
        let table = build(
            "set P; param d{p in P}; var x{p in P} >= 0;
             s.t. C{p in P}: x[p] <= d[p];
             maximize z: sum{p in P} x[p]; end;",
        )
        .unwrap();
        assert_eq!(
            *table.resolve("d").unwrap(),
            Symbol {
                kind: SymbolKind::Parameter,
                arity: 1
            }
        );
        assert_eq!(table.resolve("x").unwrap().kind, SymbolKind::Variable);
        assert_eq!(table.resolve("C").unwrap().kind, SymbolKind::Constraint);
    }

    #[test]
    fn test_duplicate_symbol() {
        let err = build("set P; param P; end;").unwrap_err();
        assert_eq!(
            err,
            CompileError::DuplicateSymbol {
                name: "P".to_string(),
                existing: "set".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_symbol() {
        let err = build("set P; var x{p in P}; s.t. C{p in P}: x[p] <= d[p]; end;").unwrap_err();
        assert_eq!(err, CompileError::UnknownSymbol("d".to_string()));
    }

    #[test]
    fn test_bare_name_in_filter_is_an_element_literal() {
        // `basic` is undeclared and unsubscripted, so it names a set element
        build("set P; var x{p in P}; s.t. C{p in P : p = basic}: x[p] >= 1; end;").unwrap();
    }

    #[test]
    fn test_forward_reference_is_fine() {
        // The constraint references a set declared after it
        build("var x; s.t. C: x <= sum{p in P} 1; set P; end;").unwrap();
    }

    #[test]
    fn test_shape_mismatch() {
        let err = build("set P; param d{p in P}; var x; s.t. C: x <= d[1,2]; end;").unwrap_err();
        assert_eq!(
            err,
            CompileError::ShapeMismatch {
                name: "d".to_string(),
                expected: 1,
                found: 2,
            }
        );
    }

    #[test]
    fn test_subscripted_index_variable_is_a_shape_mismatch() {
        let err = build("set P; var x{p in P}; s.t. C{p in P}: x[p[1]] >= 0; end;").unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { expected: 0, .. }));
    }

    #[test]
    fn test_cyclic_definition() {
        let err = build("param a := b + 1; param b := a + 1; end;").unwrap_err();
        assert!(matches!(err, CompileError::CyclicDefinition(_)));
    }

    #[test]
    fn test_self_referential_definition() {
        let err = build("param a := a + 1; end;").unwrap_err();
        assert_eq!(err, CompileError::CyclicDefinition("a".to_string()));
    }

    #[test]
    fn test_definition_order_follows_dependencies() {
        let table = build("set M := 1..n; param n; end;").unwrap();
        assert_eq!(table.definition_order, vec!["n", "M"]);
    }
}
