//! Binding data-block statements to declared sets and parameters.
//!
//! The parser leaves data as raw atoms because it does not know arities; this module interprets
//! them against the symbol table. Flat parameter data is read in groups of (arity subscripts +
//! one value); tabular data (`param c : 1 2 3 := …`) covers the two-subscript case used by
//! distance matrices. Everything is validated as it is read, in the manner of the input readers
//! this engine grew out of: duplicates and malformed groups fail immediately with the entry
//! named.
use crate::ast::{DataAtom, DataStatement};
use crate::error::{CompileError, CompileResult};
use crate::sets::{IndexTuple, IndexValue};
use crate::symbols::{SymbolKind, SymbolTable};
use indexmap::IndexMap;
use std::rc::Rc;

/// Raw set memberships and parameter values from the data block(s).
#[derive(Debug, Default, PartialEq)]
pub struct RawData {
    /// Explicitly enumerated set elements, in supplied order
    pub sets: IndexMap<String, Vec<IndexValue>>,
    /// Parameter values keyed by index tuple
    pub params: IndexMap<String, IndexMap<IndexTuple, f64>>,
}

/// Interpret data statements against the declared symbols.
pub fn bind(statements: &[DataStatement], table: &SymbolTable) -> CompileResult<RawData> {
    let mut data = RawData::default();
    for statement in statements {
        match statement {
            DataStatement::Set { name, elements } => bind_set(&mut data, table, name, elements)?,
            DataStatement::Param {
                name,
                columns,
                atoms,
            } => bind_param(&mut data, table, name, columns.as_deref(), atoms)?,
        }
    }
    Ok(data)
}

fn bind_set(
    data: &mut RawData,
    table: &SymbolTable,
    name: &str,
    elements: &[DataAtom],
) -> CompileResult<()> {
    let symbol = table.resolve(name)?;
    if symbol.kind != SymbolKind::Set {
        return Err(CompileError::instance(format!(
            "`{name}` is a {} but the data block assigns it set elements",
            symbol.kind
        )));
    }
    if data.sets.contains_key(name) {
        return Err(CompileError::instance(format!(
            "set `{name}` is assigned twice in the data block"
        )));
    }

    let mut resolved = Vec::with_capacity(elements.len());
    for atom in elements {
        let element = index_value(name, atom)?;
        if resolved.contains(&element) {
            return Err(CompileError::instance(format!(
                "set `{name}` contains duplicate element `{element}`"
            )));
        }
        resolved.push(element);
    }
    data.sets.insert(name.to_string(), resolved);
    Ok(())
}

fn bind_param(
    data: &mut RawData,
    table: &SymbolTable,
    name: &str,
    columns: Option<&[DataAtom]>,
    atoms: &[DataAtom],
) -> CompileResult<()> {
    let symbol = table.resolve(name)?;
    if symbol.kind != SymbolKind::Parameter {
        return Err(CompileError::instance(format!(
            "`{name}` is a {} but the data block assigns it parameter values",
            symbol.kind
        )));
    }

    let entries = data.params.entry(name.to_string()).or_default();
    match columns {
        Some(columns) => bind_tabular(entries, name, symbol.arity, columns, atoms),
        None => bind_flat(entries, name, symbol.arity, atoms),
    }
}

/// `param NAME := t1 … tk v  t1 … tk v …;`
fn bind_flat(
    entries: &mut IndexMap<IndexTuple, f64>,
    name: &str,
    arity: usize,
    atoms: &[DataAtom],
) -> CompileResult<()> {
    let group = arity + 1;
    if atoms.is_empty() || atoms.len() % group != 0 {
        return Err(CompileError::instance(format!(
            "data for parameter `{name}` must come in groups of {arity} subscript(s) and a value"
        )));
    }
    for chunk in atoms.chunks(group) {
        let tuple: IndexTuple = chunk[..arity]
            .iter()
            .map(|atom| index_value(name, atom))
            .collect::<CompileResult<_>>()?;
        insert_value(entries, name, tuple, numeric_value(name, &chunk[arity])?)?;
    }
    Ok(())
}

/// `param NAME : c1 c2 … := r v v … r v v …;`
fn bind_tabular(
    entries: &mut IndexMap<IndexTuple, f64>,
    name: &str,
    arity: usize,
    columns: &[DataAtom],
    atoms: &[DataAtom],
) -> CompileResult<()> {
    if arity != 2 {
        return Err(CompileError::instance(format!(
            "tabular data is only valid for two-subscript parameters, but `{name}` takes {arity}"
        )));
    }
    let columns: Vec<IndexValue> = columns
        .iter()
        .map(|atom| index_value(name, atom))
        .collect::<CompileResult<_>>()?;
    let width = columns.len() + 1;
    if columns.is_empty() || atoms.is_empty() || atoms.len() % width != 0 {
        return Err(CompileError::instance(format!(
            "tabular data for parameter `{name}` must have one value per column label"
        )));
    }
    for chunk in atoms.chunks(width) {
        let row = index_value(name, &chunk[0])?;
        for (column, atom) in columns.iter().zip(&chunk[1..]) {
            let tuple = IndexTuple(vec![row.clone(), column.clone()]);
            insert_value(entries, name, tuple, numeric_value(name, atom)?)?;
        }
    }
    Ok(())
}

fn insert_value(
    entries: &mut IndexMap<IndexTuple, f64>,
    name: &str,
    tuple: IndexTuple,
    value: f64,
) -> CompileResult<()> {
    if entries.insert(tuple.clone(), value).is_some() {
        return Err(CompileError::instance(format!(
            "parameter `{name}[{tuple}]` is assigned twice in the data block"
        )));
    }
    Ok(())
}

fn index_value(name: &str, atom: &DataAtom) -> CompileResult<IndexValue> {
    match atom {
        DataAtom::Int(v) => Ok(IndexValue::Int(*v)),
        DataAtom::Name(s) => Ok(IndexValue::Name(Rc::from(s.as_str()))),
        DataAtom::Float(v) => Err(CompileError::instance(format!(
            "`{v}` cannot be a set element or subscript of `{name}`"
        ))),
    }
}

fn numeric_value(name: &str, atom: &DataAtom) -> CompileResult<f64> {
    match atom {
        DataAtom::Int(v) => Ok(*v as f64),
        DataAtom::Float(v) => Ok(*v),
        DataAtom::Name(s) => Err(CompileError::instance(format!(
            "expected a numeric value for parameter `{name}`, found `{s}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, parse_data};

    fn bind_src(model: &str, data_src: &str) -> CompileResult<RawData> {
        let table = SymbolTable::build(&parse(model).unwrap()).unwrap();
        bind(&parse_data(data_src).unwrap(), &table)
    }

    const MODEL: &str = "set P; param n; param d{p in P}; param c{i in P, j in P}; end;";

    #[test]
    fn test_bind_scalar_and_flat() {
        let data = bind_src(MODEL, "data; set P := A B; param n := 5; param d := A 1.5 B 2; end;")
            .unwrap();
        assert_eq!(
            data.sets["P"],
            vec![IndexValue::Name("A".into()), IndexValue::Name("B".into())]
        );
        assert_eq!(data.params["n"][&IndexTuple::default()], 5.0);
        assert_eq!(
            data.params["d"][&IndexTuple(vec![IndexValue::Name("B".into())])],
            2.0
        );
    }

    #[test]
    fn test_bind_tabular() {
        let data = bind_src(
            MODEL,
            "data; set P := A B;
             param c : A B :=
               A 0 10
               B 10 0;
             end;",
        )
        .unwrap();
        let tuple = IndexTuple(vec![IndexValue::Name("A".into()), IndexValue::Name("B".into())]);
        assert_eq!(data.params["c"][&tuple], 10.0);
        assert_eq!(data.params["c"].len(), 4);
    }

    #[test]
    fn test_duplicate_set_element() {
        let err = bind_src(MODEL, "data; set P := A A; end;").unwrap_err();
        assert!(err.to_string().contains("duplicate element `A`"));
    }

    #[test]
    fn test_duplicate_param_entry() {
        let err = bind_src(MODEL, "data; param d := A 1 A 2; end;").unwrap_err();
        assert!(err.to_string().contains("assigned twice"));
    }

    #[test]
    fn test_malformed_group() {
        let err = bind_src(MODEL, "data; param d := A 1 B; end;").unwrap_err();
        assert!(matches!(err, CompileError::InstanceBuild(_)));
    }

    #[test]
    fn test_unknown_parameter_in_data() {
        let err = bind_src(MODEL, "data; param zz := 1; end;").unwrap_err();
        assert_eq!(err, CompileError::UnknownSymbol("zz".to_string()));
    }
}
