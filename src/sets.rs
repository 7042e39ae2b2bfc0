//! Index values, index tuples and the set resolver.
//!
//! The resolver turns an index header into the ordered sequence of bindings it denotes: one
//! binding per element for a single set, the full Cartesian product for a multi-set header
//! (leftmost entry varying slowest) and, when a filter is present, only the tuples that survive
//! it. Emission order here fixes the row/column order of the generated instance, so it must be
//! stable.
use crate::ast::{IndexHeader, Predicate, SetRef};
use crate::error::{CompileError, CompileResult};
use crate::eval::{self, ScalarValue};
use crate::model::Model;
use itertools::Itertools;
use std::fmt;
use std::rc::Rc;

/// A concrete value an index variable can take.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexValue {
    /// An integer element, e.g. a month number
    Int(i64),
    /// A symbolic element, e.g. a product name
    Name(Rc<str>),
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Int(v) => write!(f, "{v}"),
            IndexValue::Name(s) => write!(f, "{s}"),
        }
    }
}

/// A concrete assignment of values to the index variables of a header, in header order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct IndexTuple(pub Vec<IndexValue>);

impl IndexTuple {
    /// Whether the tuple has no components (scalar entities).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IndexTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

impl FromIterator<IndexValue> for IndexTuple {
    fn from_iter<T: IntoIterator<Item = IndexValue>>(iter: T) -> Self {
        IndexTuple(iter.into_iter().collect())
    }
}

/// An immutable stack of index-variable bindings.
///
/// Inner bindings (later pushes) shadow outer ones, so a summation comprehension can reuse an
/// index-variable name without touching the enclosing scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(Vec<(Rc<str>, IndexValue)>);

impl Bindings {
    /// An empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of `self` with `name` bound to `value`.
    pub fn with(&self, name: &str, value: IndexValue) -> Self {
        let mut inner = self.0.clone();
        inner.push((Rc::from(name), value));
        Bindings(inner)
    }

    /// Look up a binding, innermost first.
    pub fn get(&self, name: &str) -> Option<&IndexValue> {
        self.0
            .iter()
            .rev()
            .find_map(|(n, v)| (n.as_ref() == name).then_some(v))
    }
}

/// Resolve an index header into the ordered bindings it denotes.
///
/// Each returned binding set extends `outer` with one value per header entry. Entries resolve
/// left to right, so a later entry's range bounds may reference an earlier entry's variable.
/// Tuples are generated eagerly and then filtered; an empty result is legitimate, not an error.
pub fn resolve_header(
    model: &Model,
    header: &IndexHeader,
    outer: &Bindings,
) -> CompileResult<Vec<Bindings>> {
    let mut current = vec![outer.clone()];
    for entry in &header.entries {
        let mut next = Vec::new();
        for bindings in &current {
            for value in candidates(model, &entry.var, &entry.set, bindings)? {
                next.push(bindings.with(&entry.var, value));
            }
        }
        current = next;
    }

    if let Some(predicate) = &header.filter {
        let mut surviving = Vec::with_capacity(current.len());
        for bindings in current {
            if eval::eval_predicate(model, predicate, &bindings)? {
                surviving.push(bindings);
            }
        }
        current = surviving;
    }

    Ok(current)
}

/// The index tuple a header denotes under the given bindings.
pub fn header_tuple(header: &IndexHeader, bindings: &Bindings) -> IndexTuple {
    header
        .entries
        .iter()
        .map(|entry| {
            bindings
                .get(&entry.var)
                .expect("header variable must be bound")
                .clone()
        })
        .collect()
}

/// The ordered elements an entry's set reference denotes.
fn candidates(
    model: &Model,
    var: &str,
    set: &SetRef,
    bindings: &Bindings,
) -> CompileResult<Vec<IndexValue>> {
    match set {
        SetRef::Named(name) => Ok(model.set_elements(name)?.to_vec()),
        SetRef::Range(lo, hi) => resolve_range(model, var, lo, hi, bindings),
    }
}

/// Resolve `lo..hi` into consecutive integer elements.
pub fn resolve_range(
    model: &Model,
    name: &str,
    lo: &crate::ast::Expr,
    hi: &crate::ast::Expr,
    bindings: &Bindings,
) -> CompileResult<Vec<IndexValue>> {
    let lo = range_bound(model, name, lo, bindings)?;
    let hi = range_bound(model, name, hi, bindings)?;
    if hi < lo {
        return Err(CompileError::InvalidRange {
            name: name.to_string(),
            reason: format!("{lo}..{hi} is empty"),
        });
    }
    Ok((lo..=hi).map(IndexValue::Int).collect())
}

fn range_bound(
    model: &Model,
    name: &str,
    expr: &crate::ast::Expr,
    bindings: &Bindings,
) -> CompileResult<i64> {
    match eval::eval_scalar(model, expr, bindings)? {
        ScalarValue::Num(v) if v.fract() == 0.0 => Ok(v as i64),
        ScalarValue::Num(v) => Err(CompileError::InvalidRange {
            name: name.to_string(),
            reason: format!("bound {v} is not an integer"),
        }),
        ScalarValue::Sym(s) => Err(CompileError::InvalidRange {
            name: name.to_string(),
            reason: format!("bound `{s}` is not numeric"),
        }),
    }
}

/// Evaluate a predicate for each binding, keeping only those for which it holds.
///
/// Shared by filtered builder sets, which carry exactly one governing entry.
pub fn filter_elements(
    model: &Model,
    header: &IndexHeader,
    outer: &Bindings,
) -> CompileResult<Vec<IndexValue>> {
    if header.entries.len() != 1 {
        return Err(CompileError::instance(
            "a derived set must be built from a single governing set",
        ));
    }
    let var = header.entries[0].var.clone();
    let bindings = resolve_header(model, header, outer)?;
    Ok(bindings
        .into_iter()
        .map(|b| b.get(&var).expect("builder variable must be bound").clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use rstest::{fixture, rstest};

    #[fixture]
    fn model() -> Model {
        Model::from_text(
            "set P; param n; set M := 1..n; var x{p in P, m in M} >= 0;
             minimize z: sum{p in P, m in M} x[p,m];
             data; set P := A B; param n := 2; end;",
        )
        .unwrap()
    }

    fn header(src: &str) -> IndexHeader {
        // Parse a tiny model just to get a header out of it
        let model = crate::parser::parse(&format!("set P; set M; var q{src}; end;")).unwrap();
        model.variables().next().unwrap().header.clone().unwrap()
    }

    #[rstest]
    fn test_single_set_order(model: Model) {
        let bindings = resolve_header(&model, &header("{p in P}"), &Bindings::new()).unwrap();
        let elements: Vec<_> = bindings
            .iter()
            .map(|b| b.get("p").unwrap().to_string())
            .collect();
        assert_eq!(elements, vec!["A", "B"]);
    }

    #[rstest]
    fn test_range_resolves_in_order(model: Model) {
        // Scenario: a 1..3 range yields (1),(2),(3) in that order
        let h = header("{i in 1..3}");
        let bindings = resolve_header(&model, &h, &Bindings::new()).unwrap();
        let tuples: Vec<_> = bindings.iter().map(|b| header_tuple(&h, b)).collect();
        assert_eq!(
            tuples,
            vec![
                IndexTuple(vec![IndexValue::Int(1)]),
                IndexTuple(vec![IndexValue::Int(2)]),
                IndexTuple(vec![IndexValue::Int(3)]),
            ]
        );
    }

    #[rstest]
    fn test_cartesian_product_leftmost_slowest(model: Model) {
        let h = header("{p in P, m in M}");
        let bindings = resolve_header(&model, &h, &Bindings::new()).unwrap();
        let tuples: Vec<_> = bindings
            .iter()
            .map(|b| header_tuple(&h, b).to_string())
            .collect();
        assert_eq!(tuples, vec!["A,1", "A,2", "B,1", "B,2"]);
    }

    #[rstest]
    fn test_filter_keeps_surviving_tuples(model: Model) {
        let bindings =
            resolve_header(&model, &header("{m in M : m > 1}"), &Bindings::new()).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].get("m"), Some(&IndexValue::Int(2)));
    }

    #[rstest]
    fn test_filter_may_exclude_everything(model: Model) {
        // Scenario: a filter excluding every tuple yields zero bindings, not an error
        let bindings =
            resolve_header(&model, &header("{m in M : m > 5}"), &Bindings::new()).unwrap();
        assert!(bindings.is_empty());
    }

    #[rstest]
    fn test_dependent_range(model: Model) {
        let h = header("{i in 1..2, j in 1..i}");
        let bindings = resolve_header(&model, &h, &Bindings::new()).unwrap();
        let tuples: Vec<_> = bindings
            .iter()
            .map(|b| header_tuple(&h, b).to_string())
            .collect();
        assert_eq!(tuples, vec!["1,1", "2,1", "2,2"]);
    }

    #[rstest]
    fn test_empty_range_is_invalid(model: Model) {
        let err = resolve_header(&model, &header("{i in 1..0}"), &Bindings::new()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidRange { .. }));
    }

    #[test]
    fn test_bindings_shadowing() {
        let outer = Bindings::new().with("m", IndexValue::Int(1));
        let inner = outer.with("m", IndexValue::Int(2));
        assert_eq!(inner.get("m"), Some(&IndexValue::Int(2)));
        assert_eq!(outer.get("m"), Some(&IndexValue::Int(1)));
    }
}
