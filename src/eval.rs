//! The expression evaluator.
//!
//! Two interpretations share one AST. *Scalar* evaluation folds an expression to a number (or a
//! symbolic element) under a set of index bindings; it is used for subscripts, range bounds,
//! filter predicates, parameter values and variable bounds. *Linear* evaluation walks constraint
//! and objective bodies and produces a [`LinearForm`]: coefficients keyed by decision column plus
//! a constant. Evaluation is purely functional over immutable bindings, so it can safely be rerun
//! for every concrete row.
use crate::ast::{BinOp, CmpOp, Expr, Predicate};
use crate::error::{CompileError, CompileResult};
use crate::instance::VariableMap;
use crate::model::Model;
use crate::sets::{self, Bindings, IndexValue};
use indexmap::IndexMap;
use std::rc::Rc;

/// The result of evaluating an expression in a scalar context.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// A number
    Num(f64),
    /// A symbolic set element (admits equality tests only)
    Sym(Rc<str>),
}

impl From<&IndexValue> for ScalarValue {
    fn from(value: &IndexValue) -> Self {
        match value {
            IndexValue::Int(v) => ScalarValue::Num(*v as f64),
            IndexValue::Name(s) => ScalarValue::Sym(Rc::clone(s)),
        }
    }
}

impl ScalarValue {
    /// The numeric value, or an error if the value is symbolic.
    pub fn as_number(&self, context: &str) -> CompileResult<f64> {
        match self {
            ScalarValue::Num(v) => Ok(*v),
            ScalarValue::Sym(s) => Err(CompileError::instance(format!(
                "symbolic value `{s}` cannot be used as a number in {context}"
            ))),
        }
    }

    /// Convert to an index-tuple component. Numbers must be integral.
    pub fn into_index_value(self) -> CompileResult<IndexValue> {
        match self {
            ScalarValue::Num(v) if v.fract() == 0.0 => Ok(IndexValue::Int(v as i64)),
            ScalarValue::Num(v) => Err(CompileError::instance(format!(
                "subscript value {v} is not an integer"
            ))),
            ScalarValue::Sym(s) => Ok(IndexValue::Name(s)),
        }
    }
}

/// A linear expression after full expansion: coefficients per decision column plus a constant.
///
/// Coefficient order follows first reference, which is deterministic, so identical inputs always
/// produce identical forms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearForm {
    /// Coefficients keyed by column index
    pub coefficients: IndexMap<usize, f64>,
    /// The constant term
    pub constant: f64,
}

impl LinearForm {
    /// A form consisting of a constant only.
    pub fn constant(value: f64) -> Self {
        Self {
            coefficients: IndexMap::new(),
            constant: value,
        }
    }

    /// A form consisting of a single unit-coefficient column.
    pub fn column(column: usize) -> Self {
        let mut coefficients = IndexMap::new();
        coefficients.insert(column, 1.0);
        Self {
            coefficients,
            constant: 0.0,
        }
    }

    /// Whether the form references any decision column.
    pub fn has_variables(&self) -> bool {
        !self.coefficients.is_empty()
    }

    /// Add another form, merging coefficients for identical columns.
    pub fn add(&mut self, other: &LinearForm) {
        for (&column, &coefficient) in &other.coefficients {
            *self.coefficients.entry(column).or_insert(0.0) += coefficient;
        }
        self.constant += other.constant;
    }

    /// Scale all coefficients and the constant.
    pub fn scale(&mut self, factor: f64) {
        for coefficient in self.coefficients.values_mut() {
            *coefficient *= factor;
        }
        self.constant *= factor;
    }
}

/// Evaluate an expression to a scalar under the given bindings.
pub fn eval_scalar(model: &Model, expr: &Expr, bindings: &Bindings) -> CompileResult<ScalarValue> {
    match expr {
        Expr::Number(value) => Ok(ScalarValue::Num(*value)),
        Expr::Ref { name, subscripts } => {
            if subscripts.is_empty() {
                if let Some(value) = bindings.get(name) {
                    return Ok(value.into());
                }
                // A bare name that is neither bound nor a parameter reads as a set element
                if !model.is_parameter(name) {
                    return Ok(ScalarValue::Sym(Rc::from(name.as_str())));
                }
            }
            let tuple = eval_tuple(model, subscripts, bindings)?;
            Ok(ScalarValue::Num(model.param_value(name, &tuple)?))
        }
        Expr::Neg(inner) => {
            let value = eval_scalar(model, inner, bindings)?.as_number("negation")?;
            Ok(ScalarValue::Num(-value))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval_scalar(model, lhs, bindings)?.as_number("arithmetic")?;
            let rhs = eval_scalar(model, rhs, bindings)?.as_number("arithmetic")?;
            let value = match op {
                BinOp::Add => lhs + rhs,
                BinOp::Sub => lhs - rhs,
                BinOp::Mul => lhs * rhs,
                BinOp::Div => {
                    if rhs == 0.0 {
                        return Err(CompileError::instance("division by zero"));
                    }
                    lhs / rhs
                }
            };
            Ok(ScalarValue::Num(value))
        }
        Expr::Sum { header, body } => {
            let mut total = 0.0;
            for inner in sets::resolve_header(model, header, bindings)? {
                total += eval_scalar(model, body, &inner)?.as_number("a summation")?;
            }
            Ok(ScalarValue::Num(total))
        }
        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            if eval_predicate(model, condition, bindings)? {
                eval_scalar(model, then, bindings)
            } else if let Some(otherwise) = otherwise {
                eval_scalar(model, otherwise, bindings)
            } else {
                Ok(ScalarValue::Num(0.0))
            }
        }
    }
}

/// Evaluate a filter predicate under the given bindings.
pub fn eval_predicate(
    model: &Model,
    predicate: &Predicate,
    bindings: &Bindings,
) -> CompileResult<bool> {
    match predicate {
        Predicate::Compare { op, lhs, rhs } => {
            let lhs = eval_scalar(model, lhs, bindings)?;
            let rhs = eval_scalar(model, rhs, bindings)?;
            compare(*op, &lhs, &rhs)
        }
        Predicate::And(lhs, rhs) => {
            Ok(eval_predicate(model, lhs, bindings)? && eval_predicate(model, rhs, bindings)?)
        }
        Predicate::Or(lhs, rhs) => {
            Ok(eval_predicate(model, lhs, bindings)? || eval_predicate(model, rhs, bindings)?)
        }
        Predicate::Not(inner) => Ok(!eval_predicate(model, inner, bindings)?),
    }
}

/// Apply a comparison operator to two scalar values.
pub(crate) fn compare(op: CmpOp, lhs: &ScalarValue, rhs: &ScalarValue) -> CompileResult<bool> {
    match (lhs, rhs) {
        (ScalarValue::Num(a), ScalarValue::Num(b)) => Ok(match op {
            CmpOp::Eq => a == b,
            CmpOp::NotEq => a != b,
            CmpOp::Lt => a < b,
            CmpOp::LtEq => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::GtEq => a >= b,
        }),
        (ScalarValue::Sym(a), ScalarValue::Sym(b)) => match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::NotEq => Ok(a != b),
            _ => Err(CompileError::instance(format!(
                "symbolic elements `{a}` and `{b}` only admit equality comparisons"
            ))),
        },
        _ => Err(CompileError::instance(
            "cannot compare a symbolic element with a number",
        )),
    }
}

/// Evaluate subscript expressions into an index tuple.
pub fn eval_tuple(
    model: &Model,
    subscripts: &[Expr],
    bindings: &Bindings,
) -> CompileResult<crate::sets::IndexTuple> {
    subscripts
        .iter()
        .map(|expr| eval_scalar(model, expr, bindings)?.into_index_value())
        .collect()
}

/// Evaluate an expression to a [`LinearForm`] under the given bindings.
///
/// Parameter references and literals fold into the constant; variable references contribute
/// coefficient entries keyed by the fully-indexed column. Products of two variable expressions
/// are rejected as nonlinear.
pub fn eval_linear(
    model: &Model,
    variables: &VariableMap,
    expr: &Expr,
    bindings: &Bindings,
) -> CompileResult<LinearForm> {
    match expr {
        Expr::Number(value) => Ok(LinearForm::constant(*value)),
        Expr::Ref { name, subscripts } => {
            if subscripts.is_empty() {
                if let Some(value) = bindings.get(name) {
                    let value = ScalarValue::from(value).as_number("a linear expression")?;
                    return Ok(LinearForm::constant(value));
                }
            }
            if model.is_variable(name) {
                let tuple = eval_tuple(model, subscripts, bindings)?;
                let column = variables.get(name, &tuple).ok_or_else(|| {
                    CompileError::instance(format!(
                        "variable `{name}[{tuple}]` is referenced outside its declared domain"
                    ))
                })?;
                Ok(LinearForm::column(column))
            } else {
                let tuple = eval_tuple(model, subscripts, bindings)?;
                Ok(LinearForm::constant(model.param_value(name, &tuple)?))
            }
        }
        Expr::Neg(inner) => {
            let mut form = eval_linear(model, variables, inner, bindings)?;
            form.scale(-1.0);
            Ok(form)
        }
        Expr::Binary { op, lhs, rhs } => {
            let mut lhs = eval_linear(model, variables, lhs, bindings)?;
            let rhs = eval_linear(model, variables, rhs, bindings)?;
            match op {
                BinOp::Add => {
                    lhs.add(&rhs);
                    Ok(lhs)
                }
                BinOp::Sub => {
                    let mut rhs = rhs;
                    rhs.scale(-1.0);
                    lhs.add(&rhs);
                    Ok(lhs)
                }
                BinOp::Mul => {
                    if lhs.has_variables() && rhs.has_variables() {
                        return Err(CompileError::instance(
                            "nonlinear term: product of two expressions containing variables",
                        ));
                    }
                    if lhs.has_variables() {
                        lhs.scale(rhs.constant);
                        Ok(lhs)
                    } else {
                        let mut rhs = rhs;
                        rhs.scale(lhs.constant);
                        Ok(rhs)
                    }
                }
                BinOp::Div => {
                    if rhs.has_variables() {
                        return Err(CompileError::instance(
                            "nonlinear term: division by an expression containing variables",
                        ));
                    }
                    if rhs.constant == 0.0 {
                        return Err(CompileError::instance("division by zero"));
                    }
                    lhs.scale(1.0 / rhs.constant);
                    Ok(lhs)
                }
            }
        }
        Expr::Sum { header, body } => {
            let mut total = LinearForm::default();
            for inner in sets::resolve_header(model, header, bindings)? {
                total.add(&eval_linear(model, variables, body, &inner)?);
            }
            Ok(total)
        }
        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            if eval_predicate(model, condition, bindings)? {
                eval_linear(model, variables, then, bindings)
            } else if let Some(otherwise) = otherwise {
                eval_linear(model, variables, otherwise, bindings)
            } else {
                Ok(LinearForm::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sets::IndexTuple;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn model() -> Model {
        Model::from_text(
            "set P; set M := 1..3;
             param d{p in P, m in M};
             var x{p in P, m in M} >= 0;
             minimize z: sum{p in P, m in M} d[p,m] * x[p,m];
             data;
             set P := A B;
             param d : 1 2 3 :=
               A 10 20 30
               B 1 2 3;
             end;",
        )
        .unwrap()
    }

    fn expr(src: &str) -> Expr {
        // Parse an expression by embedding it in an objective statement
        let model =
            crate::parser::parse(&format!("minimize z: {src}; end;")).unwrap();
        model.objective().unwrap().expr.clone()
    }

    fn variables(model: &Model) -> VariableMap {
        let mut map = VariableMap::default();
        for p in ["A", "B"] {
            for m in 1..=3 {
                let tuple = IndexTuple(vec![
                    IndexValue::Name(p.into()),
                    IndexValue::Int(m),
                ]);
                map.insert("x".into(), tuple);
            }
        }
        map
    }

    #[rstest]
    fn test_scalar_parameter_lookup(model: Model) {
        let bindings = Bindings::new()
            .with("p", IndexValue::Name("A".into()))
            .with("m", IndexValue::Int(2));
        let value = eval_scalar(&model, &expr("d[p,m]"), &bindings).unwrap();
        assert_eq!(value, ScalarValue::Num(20.0));
    }

    #[rstest]
    fn test_scalar_index_arithmetic(model: Model) {
        let bindings = Bindings::new()
            .with("p", IndexValue::Name("A".into()))
            .with("m", IndexValue::Int(3));
        let value = eval_scalar(&model, &expr("d[p,m-1]"), &bindings).unwrap();
        assert_eq!(value, ScalarValue::Num(20.0));
    }

    #[rstest]
    fn test_scalar_out_of_range_subscript_is_missing_value(model: Model) {
        // The period-zero boundary: m-1 at m=1 must be a hard error, not a silent zero
        let bindings = Bindings::new()
            .with("p", IndexValue::Name("A".into()))
            .with("m", IndexValue::Int(1));
        let err = eval_scalar(&model, &expr("d[p,m-1]"), &bindings).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingParameterValue {
                name: "d".to_string(),
                tuple: "A,0".to_string(),
            }
        );
    }

    #[rstest]
    fn test_predicate_comparisons(model: Model) {
        let bindings = Bindings::new().with("m", IndexValue::Int(2));
        let parse_pred = |src: &str| {
            let parsed = crate::parser::parse(&format!(
                "set S; var q{{i in S : {src}}}; end;"
            ))
            .unwrap();
            parsed.variables().next().unwrap().header.clone().unwrap().filter.unwrap()
        };
        assert!(eval_predicate(&model, &parse_pred("m > 1"), &bindings).unwrap());
        assert!(!eval_predicate(&model, &parse_pred("m = 1"), &bindings).unwrap());
        assert!(eval_predicate(&model, &parse_pred("m > 1 and m < 3"), &bindings).unwrap());
        assert!(eval_predicate(&model, &parse_pred("m = 1 or m = 2"), &bindings).unwrap());
        assert!(eval_predicate(&model, &parse_pred("not m = 1"), &bindings).unwrap());
    }

    #[rstest]
    fn test_linear_sum_expansion(model: Model) {
        let vars = variables(&model);
        let form = eval_linear(
            &model,
            &vars,
            &expr("sum{p in P, m in M} d[p,m] * x[p,m]"),
            &Bindings::new(),
        )
        .unwrap();
        assert_eq!(form.coefficients.len(), 6);
        assert_approx_eq!(f64, form.constant, 0.0);
        // First column is x[A,1] with coefficient d[A,1] = 10
        let (&column, &coefficient) = form.coefficients.first().unwrap();
        assert_eq!(column, 0);
        assert_approx_eq!(f64, coefficient, 10.0);
    }

    #[rstest]
    fn test_linear_merges_repeated_columns(model: Model) {
        let vars = variables(&model);
        let form = eval_linear(
            &model,
            &vars,
            &expr("x[A,1] + 2 * x[A,1] + 5"),
            &Bindings::new(),
        )
        .unwrap();
        assert_eq!(form.coefficients.len(), 1);
        assert_approx_eq!(f64, form.coefficients[0], 3.0);
        assert_approx_eq!(f64, form.constant, 5.0);
    }

    #[rstest]
    fn test_linear_conditional_scalar(model: Model) {
        let vars = variables(&model);
        let bindings = Bindings::new().with("m", IndexValue::Int(1));
        let form = eval_linear(
            &model,
            &vars,
            &expr("if m = 1 then 7 else -1"),
            &bindings,
        )
        .unwrap();
        assert_approx_eq!(f64, form.constant, 7.0);

        let bindings = Bindings::new().with("m", IndexValue::Int(2));
        let form = eval_linear(
            &model,
            &vars,
            &expr("if m = 1 then 7 else -1"),
            &bindings,
        )
        .unwrap();
        assert_approx_eq!(f64, form.constant, -1.0);
    }

    #[rstest]
    fn test_linear_conditional_without_else_is_zero(model: Model) {
        let vars = variables(&model);
        let bindings = Bindings::new().with("m", IndexValue::Int(2));
        let form =
            eval_linear(&model, &vars, &expr("if m = 1 then 7"), &bindings).unwrap();
        assert_approx_eq!(f64, form.constant, 0.0);
        assert!(!form.has_variables());
    }

    #[rstest]
    fn test_nonlinear_product_rejected(model: Model) {
        let vars = variables(&model);
        let err = eval_linear(
            &model,
            &vars,
            &expr("x[A,1] * x[B,1]"),
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InstanceBuild(_)));
    }
}
