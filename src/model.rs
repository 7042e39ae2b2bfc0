//! The resolved model: declarations plus concrete sets and parameter values.
//!
//! Compilation runs parse → symbol table → data binding → resolution, in that order. Sets and
//! parameters resolve in dependency order (from the symbol table), so a range set `1..n` sees the
//! scalar `n` it needs. Once built, a [`Model`] is immutable; instance generation and every
//! evaluator call only read from it, which also means independent compilations never share
//! mutable state.
use crate::ast::{DataStatement, Declaration, IndexHeader, ModelFile, ParamDecl, SetBody, SetDecl};
use crate::data::{self, RawData};
use crate::error::{CompileError, CompileResult};
use crate::eval::{self, ScalarValue};
use crate::parser;
use crate::sets::{self, Bindings, IndexTuple, IndexValue};
use crate::symbols::{SymbolKind, SymbolTable};
use indexmap::IndexMap;
use log::debug;

/// A validated model with every set and parameter resolved to concrete values.
#[derive(Debug)]
pub struct Model {
    /// The declaration tree
    pub file: ModelFile,
    /// Every declared name with kind and arity
    pub symbols: SymbolTable,
    sets: IndexMap<String, Vec<IndexValue>>,
    params: IndexMap<String, IndexMap<IndexTuple, f64>>,
}

impl Model {
    /// Compile a model from source text (with any data block inline).
    pub fn from_text(src: &str) -> CompileResult<Model> {
        Self::from_file(parser::parse(src)?, Vec::new())
    }

    /// Compile a model from source text plus a separate data file.
    pub fn from_text_with_data(model_src: &str, data_src: &str) -> CompileResult<Model> {
        Self::from_file(parser::parse(model_src)?, parser::parse_data(data_src)?)
    }

    /// Compile a parsed model file, appending any extra data statements to its own data block.
    pub fn from_file(file: ModelFile, extra_data: Vec<DataStatement>) -> CompileResult<Model> {
        let symbols = SymbolTable::build(&file)?;

        let mut statements = file.data.clone();
        statements.extend(extra_data);
        let mut raw = data::bind(&statements, &symbols)?;

        let mut model = Model {
            file,
            symbols,
            sets: IndexMap::new(),
            params: IndexMap::new(),
        };

        for name in model.symbols.definition_order.clone() {
            let declaration = model
                .file
                .declarations
                .iter()
                .find(|d| d.name() == name)
                .expect("definition order only lists declared names")
                .clone();
            match declaration {
                Declaration::Set(decl) => {
                    let elements = model.resolve_set(&decl, &mut raw)?;
                    debug!("set `{}` resolved to {} element(s)", decl.name, elements.len());
                    model.sets.insert(decl.name, elements);
                }
                Declaration::Param(decl) => {
                    let values = model.resolve_param(&decl, &mut raw)?;
                    debug!("parameter `{}` bound over {} tuple(s)", decl.name, values.len());
                    model.params.insert(decl.name, values);
                }
                _ => unreachable!("definition order only contains sets and parameters"),
            }
        }

        Ok(model)
    }

    fn resolve_set(&self, decl: &SetDecl, raw: &mut RawData) -> CompileResult<Vec<IndexValue>> {
        let supplied = raw.sets.shift_remove(&decl.name);
        match &decl.body {
            Some(body) => {
                if supplied.is_some() {
                    return Err(CompileError::instance(format!(
                        "set `{}` is defined in the model and assigned in the data block",
                        decl.name
                    )));
                }
                match body {
                    SetBody::Range(lo, hi) => {
                        sets::resolve_range(self, &decl.name, lo, hi, &Bindings::new())
                    }
                    SetBody::Builder(header) => {
                        sets::filter_elements(self, header, &Bindings::new())
                    }
                }
            }
            None => supplied.ok_or_else(|| {
                CompileError::instance(format!("no elements supplied for set `{}`", decl.name))
            }),
        }
    }

    fn resolve_param(
        &self,
        decl: &ParamDecl,
        raw: &mut RawData,
    ) -> CompileResult<IndexMap<IndexTuple, f64>> {
        let supplied = raw.params.shift_remove(&decl.name).unwrap_or_default();
        if decl.value.is_some() && !supplied.is_empty() {
            return Err(CompileError::instance(format!(
                "parameter `{}` is defined in the model and assigned in the data block",
                decl.name
            )));
        }

        // One (bindings, tuple) pair per element of the declared domain
        let domain: Vec<(Bindings, IndexTuple)> = match &decl.header {
            None => vec![(Bindings::new(), IndexTuple::default())],
            Some(header) => sets::resolve_header(self, header, &Bindings::new())?
                .into_iter()
                .map(|b| {
                    let tuple = sets::header_tuple(header, &b);
                    (b, tuple)
                })
                .collect(),
        };

        let mut values = IndexMap::with_capacity(domain.len());
        for (bindings, tuple) in domain {
            let value = match supplied.get(&tuple) {
                Some(value) => *value,
                None => match &decl.value {
                    Some(expr) => eval::eval_scalar(self, expr, &bindings)?
                        .as_number(&format!("the value of parameter `{}`", decl.name))?,
                    None => {
                        return Err(CompileError::MissingParameterValue {
                            name: decl.name.clone(),
                            tuple: tuple.to_string(),
                        });
                    }
                },
            };
            self.check_restrictions(decl, &bindings, &tuple, value)?;
            values.insert(tuple, value);
        }

        // Data entries outside the declared domain are a mistake, not extra coverage
        if let Some(tuple) = supplied.keys().find(|t| !values.contains_key(*t)) {
            return Err(CompileError::instance(format!(
                "parameter `{}[{tuple}]` is assigned in the data block but is outside the \
                 declared domain",
                decl.name
            )));
        }

        Ok(values)
    }

    fn check_restrictions(
        &self,
        decl: &ParamDecl,
        bindings: &Bindings,
        tuple: &IndexTuple,
        value: f64,
    ) -> CompileResult<()> {
        for restriction in &decl.restrictions {
            let bound = eval::eval_scalar(self, &restriction.bound, bindings)?
                .as_number("a parameter restriction")?;
            let holds = eval::compare(
                restriction.op,
                &ScalarValue::Num(value),
                &ScalarValue::Num(bound),
            )?;
            if !holds {
                return Err(CompileError::instance(format!(
                    "parameter `{}[{tuple}]` value {value} violates the restriction `{} {bound}`",
                    decl.name, restriction.op
                )));
            }
        }
        Ok(())
    }

    /// The resolved elements of a named set, in declaration order.
    pub fn set_elements(&self, name: &str) -> CompileResult<&[IndexValue]> {
        self.sets
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| CompileError::UnknownSymbol(name.to_string()))
    }

    /// The bound value of a parameter at the given tuple.
    pub fn param_value(&self, name: &str, tuple: &IndexTuple) -> CompileResult<f64> {
        let values = self
            .params
            .get(name)
            .ok_or_else(|| CompileError::UnknownSymbol(name.to_string()))?;
        values
            .get(tuple)
            .copied()
            .ok_or_else(|| CompileError::MissingParameterValue {
                name: name.to_string(),
                tuple: tuple.to_string(),
            })
    }

    /// Whether `name` is declared as a decision variable.
    pub fn is_variable(&self, name: &str) -> bool {
        self.symbols.is_kind(name, SymbolKind::Variable)
    }

    /// Whether `name` is declared as a parameter.
    pub fn is_parameter(&self, name: &str) -> bool {
        self.symbols.is_kind(name, SymbolKind::Parameter)
    }

    /// Resolve an optional header into bindings, treating `None` as the single empty binding.
    pub fn resolve_optional_header(
        &self,
        header: Option<&IndexHeader>,
    ) -> CompileResult<Vec<(Bindings, IndexTuple)>> {
        match header {
            None => Ok(vec![(Bindings::new(), IndexTuple::default())]),
            Some(header) => Ok(sets::resolve_header(self, header, &Bindings::new())?
                .into_iter()
                .map(|b| {
                    let tuple = sets::header_tuple(header, &b);
                    (b, tuple)
                })
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_set_from_scalar_parameter() {
        let model =
            Model::from_text("param n; set M := 1..n; data; param n := 3; end;").unwrap();
        assert_eq!(
            model.set_elements("M").unwrap(),
            &[IndexValue::Int(1), IndexValue::Int(2), IndexValue::Int(3)]
        );
    }

    #[test]
    fn test_derived_filtered_set() {
        let model = Model::from_text(
            "set M := 1..4; set LATE := {m in M : m > 2}; end;",
        )
        .unwrap();
        assert_eq!(
            model.set_elements("LATE").unwrap(),
            &[IndexValue::Int(3), IndexValue::Int(4)]
        );
    }

    #[test]
    fn test_missing_parameter_value_names_tuple() {
        // A missing data entry is a hard error naming the exact tuple, never a default zero
        let err = Model::from_text(
            "set P; param d{p in P};
             data; set P := A B; param d := A 100; end;",
        )
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingParameterValue {
                name: "d".to_string(),
                tuple: "B".to_string(),
            }
        );
    }

    #[test]
    fn test_model_level_parameter_value() {
        let model = Model::from_text(
            "set M := 1..3; param double{m in M} := 2 * m; end;",
        )
        .unwrap();
        let tuple = IndexTuple(vec![IndexValue::Int(3)]);
        assert_eq!(model.param_value("double", &tuple).unwrap(), 6.0);
    }

    #[test]
    fn test_restriction_violation() {
        let err = Model::from_text(
            "set P; param d{p in P} >= 0;
             data; set P := A; param d := A -5; end;",
        )
        .unwrap_err();
        assert!(err.to_string().contains("violates the restriction `>= 0`"));
    }

    #[test]
    fn test_value_outside_domain() {
        let err = Model::from_text(
            "set P; param d{p in P};
             data; set P := A; param d := A 1 B 2; end;",
        )
        .unwrap_err();
        assert!(err.to_string().contains("outside the declared domain"));
    }

    #[test]
    fn test_set_without_elements() {
        let err = Model::from_text("set P; param d{p in P}; end;").unwrap_err();
        assert!(err.to_string().contains("no elements supplied for set `P`"));
    }

    #[test]
    fn test_unresolvable_range_bound() {
        // n is declared but never given a value
        let err = Model::from_text("param n; set M := 1..n; end;").unwrap_err();
        assert!(matches!(err, CompileError::MissingParameterValue { .. }));
    }
}
