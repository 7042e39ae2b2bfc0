//! A front end for declarative linear optimisation models.
//!
//! Models are written in a MathProg-style language: sets, indexed parameters, variables,
//! constraint families and an objective. Compilation resolves every index set, evaluates the
//! linear expressions and produces a sparse instance, which is handed to the HiGHS backend.
#![warn(missing_docs)]
pub mod ast;
pub mod cli;
pub mod data;
pub mod error;
pub mod eval;
pub mod instance;
pub mod lexer;
pub mod log;
pub mod model;
pub mod output;
pub mod parser;
pub mod sets;
pub mod settings;
pub mod solver;
pub mod symbols;
