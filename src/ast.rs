//! The declaration tree produced by the parser.
//!
//! Nothing here is resolved: names are plain strings, sets are unevaluated expressions and
//! parameter values are raw atoms. The symbol table validates the tree and the resolver/evaluator
//! give it meaning.

/// Which way the objective is optimised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    /// Maximise the objective expression
    Maximize,
    /// Minimise the objective expression
    Minimize,
}

/// A comparison operator, used both in constraints and in filter predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "<>",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        };
        write!(f, "{s}")
    }
}

/// An arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// A reference to the set governing one index-header entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SetRef {
    /// A named set
    Named(String),
    /// An inline numeric range, `lo..hi`
    Range(Box<Expr>, Box<Expr>),
}

/// One `ident in set` entry of an index header.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// The fresh index variable bound by this entry
    pub var: String,
    /// The set the variable ranges over
    pub set: SetRef,
}

/// An index-tuple comprehension header, `{p in products, m in months : m > 1}`.
///
/// Entries nest left-to-right: the leftmost variable varies slowest. The optional filter keeps
/// only the tuples for which the predicate holds.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHeader {
    /// The governing entries, in declaration order
    pub entries: Vec<IndexEntry>,
    /// The filter predicate, if any
    pub filter: Option<Predicate>,
}

impl IndexHeader {
    /// The number of index variables the header binds.
    pub fn arity(&self) -> usize {
        self.entries.len()
    }
}

/// A boolean predicate over index bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A comparison between two scalar expressions
    Compare {
        /// The operator
        op: CmpOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Both predicates hold
    And(Box<Predicate>, Box<Predicate>),
    /// At least one predicate holds
    Or(Box<Predicate>, Box<Predicate>),
    /// The predicate does not hold
    Not(Box<Predicate>),
}

/// An expression-tree node.
///
/// A single tagged union covers scalar and linear expressions; the evaluator decides which
/// interpretation applies at each site.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal
    Number(f64),
    /// A reference to a parameter, variable or index variable, with subscript expressions
    Ref {
        /// The referenced name
        name: String,
        /// One subscript expression per governing set (empty for scalars and index variables)
        subscripts: Vec<Expr>,
    },
    /// Unary negation
    Neg(Box<Expr>),
    /// A binary arithmetic combination
    Binary {
        /// The operator
        op: BinOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// A summation comprehension, `sum{i in S : pred} body`
    Sum {
        /// The header binding the fresh index variables
        header: IndexHeader,
        /// The summed expression
        body: Box<Expr>,
    },
    /// A conditional, `if pred then e [else e]`; without `else` the false branch is 0
    If {
        /// The predicate
        condition: Predicate,
        /// Value when the predicate holds
        then: Box<Expr>,
        /// Value when it does not (defaults to 0)
        otherwise: Option<Box<Expr>>,
    },
}

/// The variable domain stated in a `var` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarDomain {
    /// A continuous variable
    #[default]
    Continuous,
    /// An integer variable
    Integer,
    /// A binary variable; bounds are always [0, 1], whatever else is stated
    Binary,
}

/// A `set` declaration. The body is only present for derived sets (`:=` in the model section);
/// otherwise membership comes from the data block.
#[derive(Debug, Clone, PartialEq)]
pub struct SetDecl {
    /// The set name
    pub name: String,
    /// The defining expression, if the set is derived
    pub body: Option<SetBody>,
}

/// The defining expression of a derived set.
#[derive(Debug, Clone, PartialEq)]
pub enum SetBody {
    /// A numeric range, `lo..hi`
    Range(Expr, Expr),
    /// A builder over a governing set with an optional filter, `{i in S : pred}`
    Builder(IndexHeader),
}

/// A value restriction attached to a `param` declaration, e.g. `>= 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRestriction {
    /// The comparison the value must satisfy
    pub op: CmpOp,
    /// The bound expression (evaluated with no index bindings)
    pub bound: Expr,
}

/// A `param` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    /// The parameter name
    pub name: String,
    /// The governing index header, if the parameter is indexed
    pub header: Option<IndexHeader>,
    /// Value restrictions (`>= 0` and similar)
    pub restrictions: Vec<ParamRestriction>,
    /// A model-section value expression, evaluated per index tuple
    pub value: Option<Expr>,
}

impl ParamDecl {
    /// The parameter's declared index arity.
    pub fn arity(&self) -> usize {
        self.header.as_ref().map_or(0, IndexHeader::arity)
    }
}

/// A `var` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    /// The variable name
    pub name: String,
    /// The governing index header, if the variable is indexed
    pub header: Option<IndexHeader>,
    /// The declared domain
    pub domain: VarDomain,
    /// An explicit lower bound expression (defaults to 0)
    pub lower: Option<Expr>,
    /// An explicit upper bound expression (defaults to +inf)
    pub upper: Option<Expr>,
}

impl VarDecl {
    /// The variable's declared index arity.
    pub fn arity(&self) -> usize {
        self.header.as_ref().map_or(0, IndexHeader::arity)
    }
}

/// A constraint family, `s.t. Name{header} : lhs op rhs;`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDecl {
    /// The template name
    pub name: String,
    /// The governing index header, if the family is indexed
    pub header: Option<IndexHeader>,
    /// The left-hand side expression
    pub lhs: Expr,
    /// The relational operator (`=`, `<=` or `>=`)
    pub op: CmpOp,
    /// The right-hand side expression
    pub rhs: Expr,
}

/// The objective statement. Exactly one per model.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveDecl {
    /// The objective name
    pub name: String,
    /// Whether to maximise or minimise
    pub sense: ObjectiveSense,
    /// The objective expression
    pub expr: Expr,
}

/// A top-level declaration in the model section.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// A `set` statement
    Set(SetDecl),
    /// A `param` statement
    Param(ParamDecl),
    /// A `var` statement
    Var(VarDecl),
    /// An `s.t.` statement
    Constraint(ConstraintDecl),
    /// A `maximize`/`minimize` statement
    Objective(ObjectiveDecl),
}

impl Declaration {
    /// The declared name.
    pub fn name(&self) -> &str {
        match self {
            Declaration::Set(d) => &d.name,
            Declaration::Param(d) => &d.name,
            Declaration::Var(d) => &d.name,
            Declaration::Constraint(d) => &d.name,
            Declaration::Objective(d) => &d.name,
        }
    }
}

/// A raw value appearing in a data block: an index element or a numeric entry.
///
/// The parser cannot tell which yet; the data binder interprets atoms against declared arities.
#[derive(Debug, Clone, PartialEq)]
pub enum DataAtom {
    /// An integer, usable both as an index element and as a value
    Int(i64),
    /// A symbolic token, usable only as an index element
    Name(String),
    /// A float, usable only as a value
    Float(f64),
}

impl std::fmt::Display for DataAtom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataAtom::Int(v) => write!(f, "{v}"),
            DataAtom::Name(s) => write!(f, "{s}"),
            DataAtom::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One statement of a data block.
#[derive(Debug, Clone, PartialEq)]
pub enum DataStatement {
    /// `set NAME := el el … ;`
    Set {
        /// The set name
        name: String,
        /// The elements, in order
        elements: Vec<DataAtom>,
    },
    /// `param NAME := …;` (flat) or `param NAME : c1 c2 … := …;` (tabular)
    Param {
        /// The parameter name
        name: String,
        /// Column labels for the tabular form
        columns: Option<Vec<DataAtom>>,
        /// The flat list of atoms after `:=`
        atoms: Vec<DataAtom>,
    },
}

/// A parsed model file: the declaration tree plus an optional data block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelFile {
    /// Model-section declarations, in source order
    pub declarations: Vec<Declaration>,
    /// Data-block statements, in source order
    pub data: Vec<DataStatement>,
}

impl ModelFile {
    /// Iterate over the constraint families in declaration order.
    pub fn constraints(&self) -> impl Iterator<Item = &ConstraintDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Constraint(c) => Some(c),
            _ => None,
        })
    }

    /// Iterate over the variable declarations in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &VarDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Var(v) => Some(v),
            _ => None,
        })
    }

    /// The objective statement, if one was declared.
    pub fn objective(&self) -> Option<&ObjectiveDecl> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::Objective(o) => Some(o),
            _ => None,
        })
    }
}
