//! The instance generator: from a resolved model to a solver-ready sparse system.
//!
//! Columns are allocated per (variable, index tuple), then each constraint family is instantiated
//! into one row per surviving tuple, with variable terms moved to the left and constants to the
//! right. Row and column order follow declaration order and set order, so regenerating from
//! unchanged inputs is byte-identical.
use crate::ast::{CmpOp, Declaration, ObjectiveSense, VarDomain};
use crate::error::{CompileError, CompileResult};
use crate::eval;
use crate::model::Model;
use crate::sets::{IndexTuple, IndexValue};
use indexmap::IndexMap;
use log::info;
use std::fmt;
use std::rc::Rc;

/// Identifies one decision column: a variable name and a concrete index tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    /// The variable name
    pub name: Rc<str>,
    /// The index tuple (empty for scalar variables)
    pub tuple: IndexTuple,
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tuple.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.tuple)
        }
    }
}

/// A map from fully-indexed variables to column indices.
///
/// The entries are ordered (see [`IndexMap`]): iteration order is allocation order, which the
/// evaluator and the solver adapter both rely on when mapping results back onto named variables.
#[derive(Default, Debug)]
pub struct VariableMap(IndexMap<ColumnKey, usize>);

impl VariableMap {
    /// Allocate the next column for the given variable instance.
    ///
    /// Panics on a duplicate instance; set resolution guarantees tuples are unique per variable.
    pub fn insert(&mut self, name: Rc<str>, tuple: IndexTuple) -> usize {
        let column = self.0.len();
        let existing = self.0.insert(ColumnKey { name, tuple }, column).is_some();
        assert!(!existing, "duplicate entry for variable instance");
        column
    }

    /// Look up the column for a variable instance.
    pub fn get(&self, name: &str, tuple: &IndexTuple) -> Option<usize> {
        let key = ColumnKey {
            name: Rc::from(name),
            tuple: tuple.clone(),
        };
        self.0.get(&key).copied()
    }

    /// Iterate over the allocated keys in column order.
    pub fn keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.0.keys()
    }
}

/// One decision column of the generated instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// The variable instance this column stands for
    pub key: ColumnKey,
    /// The declared domain
    pub domain: VarDomain,
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

/// One concrete constraint row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The constraint-template name
    pub template: Rc<str>,
    /// The index tuple this row was instantiated at
    pub tuple: IndexTuple,
    /// Column coefficients, in first-reference order
    pub terms: Vec<(usize, f64)>,
    /// The relational operator
    pub op: CmpOp,
    /// The right-hand-side constant
    pub rhs: f64,
}

impl Row {
    /// The row's label, e.g. `Capacity[3]` or `MaxDemand[A,2]`.
    pub fn label(&self) -> String {
        if self.tuple.is_empty() {
            self.template.to_string()
        } else {
            format!("{}[{}]", self.template, self.tuple)
        }
    }
}

/// Parse a row label back into its template name and index tuple.
///
/// The inverse of [`Row::label`]; used when reporting and when cross-referencing solver output.
pub fn parse_row_label(label: &str) -> Option<(String, IndexTuple)> {
    match label.split_once('[') {
        None => Some((label.to_string(), IndexTuple::default())),
        Some((template, rest)) => {
            let inner = rest.strip_suffix(']')?;
            let tuple = inner
                .split(',')
                .map(|part| match part.parse::<i64>() {
                    Ok(v) => IndexValue::Int(v),
                    Err(_) => IndexValue::Name(Rc::from(part)),
                })
                .collect();
            Some((template.to_string(), tuple))
        }
    }
}

/// The objective row.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// The declared objective name
    pub name: String,
    /// Maximise or minimise
    pub sense: ObjectiveSense,
    /// Column coefficients
    pub terms: Vec<(usize, f64)>,
    /// A constant offset, reported but invisible to the solver
    pub constant: f64,
}

/// The fully materialised, solver-ready instance.
#[derive(Debug)]
pub struct Instance {
    /// Decision columns, in allocation order
    pub columns: Vec<Column>,
    /// Constraint rows, in template-declaration and tuple order
    pub rows: Vec<Row>,
    /// The objective row
    pub objective: Objective,
}

/// Generate the concrete instance for a resolved model.
pub fn build(model: &Model) -> CompileResult<Instance> {
    let objective_decl = single_objective(model)?;

    // Columns first: constraint evaluation needs the full variable map
    let mut variables = VariableMap::default();
    let mut columns = Vec::new();
    for decl in model.file.variables() {
        let name: Rc<str> = Rc::from(decl.name.as_str());
        for (bindings, tuple) in model.resolve_optional_header(decl.header.as_ref())? {
            let (lower, upper) = if decl.domain == VarDomain::Binary {
                // The binary annotation dominates any stated bound
                (0.0, 1.0)
            } else {
                let lower = match &decl.lower {
                    Some(expr) => eval::eval_scalar(model, expr, &bindings)?
                        .as_number("a variable bound")?,
                    None => 0.0,
                };
                let upper = match &decl.upper {
                    Some(expr) => eval::eval_scalar(model, expr, &bindings)?
                        .as_number("a variable bound")?,
                    None => f64::INFINITY,
                };
                (lower, upper)
            };
            let column = variables.insert(Rc::clone(&name), tuple.clone());
            debug_assert_eq!(column, columns.len());
            columns.push(Column {
                key: ColumnKey {
                    name: Rc::clone(&name),
                    tuple,
                },
                domain: decl.domain,
                lower,
                upper,
            });
        }
    }

    let mut rows = Vec::new();
    for decl in model.file.constraints() {
        let template: Rc<str> = Rc::from(decl.name.as_str());
        for (bindings, tuple) in model.resolve_optional_header(decl.header.as_ref())? {
            let mut form = eval::eval_linear(model, &variables, &decl.lhs, &bindings)?;
            let mut rhs = eval::eval_linear(model, &variables, &decl.rhs, &bindings)?;
            rhs.scale(-1.0);
            form.add(&rhs);
            // A variable appearing on both sides can cancel to a zero coefficient
            form.coefficients.retain(|_, coefficient| *coefficient != 0.0);

            if !form.has_variables() {
                // Both sides reduced to constants; flag it rather than silently dropping the row
                let row = Row {
                    template: Rc::clone(&template),
                    tuple,
                    terms: Vec::new(),
                    op: decl.op,
                    rhs: 0.0,
                };
                return Err(CompileError::instance(format!(
                    "constraint `{}` contains no variable terms",
                    row.label()
                )));
            }

            rows.push(Row {
                template: Rc::clone(&template),
                tuple,
                terms: form.coefficients.into_iter().collect(),
                op: decl.op,
                rhs: -form.constant,
            });
        }
    }

    let objective_form = eval::eval_linear(
        model,
        &variables,
        &objective_decl.expr,
        &crate::sets::Bindings::new(),
    )?;
    let objective = Objective {
        name: objective_decl.name.clone(),
        sense: objective_decl.sense,
        terms: objective_form.coefficients.into_iter().collect(),
        constant: objective_form.constant,
    };

    info!(
        "generated instance: {} column(s), {} row(s)",
        columns.len(),
        rows.len()
    );

    Ok(Instance {
        columns,
        rows,
        objective,
    })
}

/// The model's single objective declaration.
fn single_objective(model: &Model) -> CompileResult<&crate::ast::ObjectiveDecl> {
    let mut objectives = model.file.declarations.iter().filter_map(|d| match d {
        Declaration::Objective(o) => Some(o),
        _ => None,
    });
    let first = objectives
        .next()
        .ok_or_else(|| CompileError::instance("model declares no objective"))?;
    if objectives.next().is_some() {
        return Err(CompileError::instance(
            "model declares more than one objective",
        ));
    }
    Ok(first)
}
