//! The HiGHS adapter: hands a generated instance to the solver and maps the outcome back onto
//! named variables.
use crate::ast::{CmpOp, ObjectiveSense, VarDomain};
use crate::instance::{ColumnKey, Instance};
use anyhow::{bail, Result};
use highs::{HighsModelStatus, RowProblem as Problem, Sense};
use log::warn;
use std::fmt;

/// Caller-supplied limits on how long the solver may run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Budget {
    /// Wall-clock limit in seconds
    pub time_limit: Option<f64>,
    /// Simplex iteration limit
    pub iteration_limit: Option<i32>,
}

/// The outcome of a solve, as reported by the backend.
///
/// Infeasibility and unboundedness are outcomes, not errors; the caller decides what to do with
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SolveStatus {
    /// A provably optimal solution was found
    Optimal,
    /// The constraints admit no solution
    Infeasible,
    /// The objective can be improved without bound
    Unbounded,
    /// The time or iteration budget ran out first
    TimeLimit,
}

/// A solved instance: status, objective value and per-variable values.
pub struct Solution {
    /// How the solve ended
    pub status: SolveStatus,
    /// The objective value, when a solution exists
    pub objective: Option<f64>,
    /// Variable values in column order, empty unless the status is optimal
    pub values: Vec<(ColumnKey, f64)>,
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.objective {
            Some(objective) => write!(f, "{} (objective {objective})", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Solve a generated instance within the given budget.
///
/// Returns `Err` only for backend failures (model or solve errors); every expected outcome,
/// including infeasibility, comes back as a [`Solution`].
pub fn solve(instance: &Instance, budget: &Budget) -> Result<Solution> {
    let mut problem = Problem::default();

    // Objective coefficients are attached at column creation
    let mut costs = vec![0.0; instance.columns.len()];
    for &(column, coefficient) in &instance.objective.terms {
        costs[column] += coefficient;
    }

    let mut columns = Vec::with_capacity(instance.columns.len());
    for (column, cost) in instance.columns.iter().zip(&costs) {
        let bounds = column.lower..=column.upper;
        let col = match column.domain {
            VarDomain::Continuous => problem.add_column(*cost, bounds),
            VarDomain::Integer | VarDomain::Binary => problem.add_integer_column(*cost, bounds),
        };
        columns.push(col);
    }

    for row in &instance.rows {
        let terms = row.terms.iter().map(|&(column, coeff)| (columns[column], coeff));
        match row.op {
            CmpOp::Eq => problem.add_row(row.rhs..=row.rhs, terms),
            CmpOp::LtEq => problem.add_row(..=row.rhs, terms),
            CmpOp::GtEq => problem.add_row(row.rhs.., terms),
            _ => bail!("unsupported relational operator `{}` in row `{}`", row.op, row.label()),
        };
    }

    let sense = match instance.objective.sense {
        ObjectiveSense::Maximize => Sense::Maximise,
        ObjectiveSense::Minimize => Sense::Minimise,
    };
    let mut model = problem.optimise(sense);
    if let Some(seconds) = budget.time_limit {
        model.set_option("time_limit", seconds);
    }
    if let Some(iterations) = budget.iteration_limit {
        model.set_option("simplex_iteration_limit", iterations);
    }

    let solved = model.solve();
    let status = match solved.status() {
        HighsModelStatus::Optimal => SolveStatus::Optimal,
        HighsModelStatus::Infeasible => SolveStatus::Infeasible,
        HighsModelStatus::Unbounded => SolveStatus::Unbounded,
        HighsModelStatus::UnboundedOrInfeasible => {
            warn!("backend could not separate unbounded from infeasible");
            SolveStatus::Unbounded
        }
        HighsModelStatus::ReachedTimeLimit | HighsModelStatus::ReachedIterationLimit => {
            SolveStatus::TimeLimit
        }
        status => bail!("solver failed with status {status:?}"),
    };

    if status != SolveStatus::Optimal {
        return Ok(Solution {
            status,
            objective: None,
            values: Vec::new(),
        });
    }

    let primal = solved.get_solution();
    let values: Vec<_> = instance
        .columns
        .iter()
        .zip(primal.columns())
        .map(|(column, &value)| (column.key.clone(), value))
        .collect();

    // HiGHS reports the objective without the constant offset, so compute it from the columns
    let objective = instance.objective.constant
        + values
            .iter()
            .zip(&costs)
            .map(|((_, value), cost)| value * cost)
            .sum::<f64>();

    Ok(Solution {
        status,
        objective: Some(objective),
        values,
    })
}
