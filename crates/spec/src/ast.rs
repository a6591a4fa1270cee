//! Abstract syntax tree for Swarm formulas and behaviors
//!
//! One variant per node kind. Property rewriting and abstract evaluation
//! both work by matching on these enums; there is no string-keyed attribute
//! access anywhere.

use std::fmt;

/// Binary (or n-ary, left-folded) operators over integer expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    /// Nondeterministic draw from `[lhs..rhs)`, written `lhs..rhs`
    RangeNondet,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::RangeNondet => "..",
        }
    }
}

/// Comparison operators. Comparisons always yield a 0/1 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
        }
    }
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Abs,
    Min,
    Max,
    Not,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Not => "not",
        }
    }
}

/// Quantifiers for agent variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quant {
    Forall,
    Exists,
}

/// A quantified agent variable: `forall Worker w` binds `w` over the id
/// range of kind `Worker`.
#[derive(Debug, Clone, PartialEq)]
pub struct QVar {
    pub quant: Quant,
    pub kind: String,
    pub name: String,
}

/// A reference to a (possibly array) variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    pub offset: Option<Box<Expr>>,
}

impl VarRef {
    pub fn scalar(name: impl Into<String>) -> Self {
        VarRef {
            name: name.into(),
            offset: None,
        }
    }
}

/// Expressions and (quantified) formulas.
///
/// After quantifier elimination no `QFormula` remains; after extern
/// substitution no `RefExt` remains; after var-of specialization no `Ref`
/// with a non-empty `of` remains (they become `Label`s or id literals).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(i64),
    /// Variable reference; `of` names a quantified agent variable when the
    /// reference crosses agents (`x of w`).
    Ref {
        var: VarRef,
        of: Option<String>,
    },
    /// Reference to an extern parameter (`_n`).
    RefExt(String),
    /// Opaque state-variable label introduced by quantifier elimination
    /// (`x_2` stands for "variable x of agent 2").
    Label(String),
    Bin {
        op: BinOp,
        operands: Vec<Expr>,
    },
    Call {
        fun: Builtin,
        operands: Vec<Expr>,
    },
    Cmp {
        op: CmpOp,
        operands: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    /// Unary arithmetic negation.
    Neg(Box<Expr>),
    QFormula {
        qvars: Vec<QVar>,
        condition: Box<Expr>,
    },
    /// `pick <size> [Kind]`: a set of distinct agent ids drawn each step.
    Pick {
        size: usize,
        kind: Option<String>,
        /// Optional side condition; scanned but not enforced.
        where_clause: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Depth-first iterator over this node and all descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Names of all plain variable references in the tree.
    pub fn ref_names(&self) -> Vec<&str> {
        self.walk()
            .filter_map(|e| match e {
                Expr::Ref { var, .. } => Some(var.name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Names of all labels introduced by quantifier elimination.
    pub fn label_names(&self) -> Vec<&str> {
        self.walk()
            .filter_map(|e| match e {
                Expr::Label(l) => Some(l.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn contains_ref(&self, name: &str) -> bool {
        self.ref_names().iter().any(|n| *n == name)
    }
}

/// Depth-first expression iterator.
pub struct Walk<'a> {
    stack: Vec<&'a Expr>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Expr;

    fn next(&mut self) -> Option<&'a Expr> {
        let node = self.stack.pop()?;
        match node {
            Expr::Literal(_) | Expr::RefExt(_) | Expr::Label(_) => {}
            Expr::Ref { var, .. } => {
                if let Some(off) = &var.offset {
                    self.stack.push(off);
                }
            }
            Expr::Bin { operands, .. }
            | Expr::Call { operands, .. }
            | Expr::Cmp { operands, .. } => {
                // Reversed so operands pop in source order
                self.stack.extend(operands.iter().rev());
            }
            Expr::If { cond, then, els } => {
                self.stack.push(els);
                self.stack.push(then);
                self.stack.push(cond);
            }
            Expr::Neg(inner) => self.stack.push(inner),
            Expr::QFormula { condition, .. } => self.stack.push(condition),
            Expr::Pick { where_clause, .. } => {
                if let Some(w) = where_clause {
                    self.stack.push(w);
                }
            }
        }
        Some(node)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Ref { var, of } => {
                write!(f, "{}", var.name)?;
                if let Some(off) = &var.offset {
                    write!(f, "[{}]", off)?;
                }
                if let Some(of) = of {
                    write!(f, " of {}", of)?;
                }
                Ok(())
            }
            Expr::RefExt(name) => write!(f, "_{}", name),
            Expr::Label(l) => write!(f, "{}", l),
            Expr::Bin { op, operands } => {
                let parts: Vec<String> = operands.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(&format!(" {} ", op.symbol())))
            }
            Expr::Call { fun, operands } => {
                let parts: Vec<String> = operands.iter().map(|e| e.to_string()).collect();
                write!(f, "{}({})", fun.name(), parts.join(", "))
            }
            Expr::Cmp { op, operands } => {
                let parts: Vec<String> = operands.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(&format!(" {} ", op.symbol())))
            }
            Expr::If { cond, then, els } => {
                write!(f, "(if {} then {} else {})", cond, then, els)
            }
            Expr::Neg(inner) => write!(f, "-{}", inner),
            Expr::QFormula { qvars, condition } => {
                for q in qvars {
                    let kw = match q.quant {
                        Quant::Forall => "forall",
                        Quant::Exists => "exists",
                    };
                    write!(f, "{} {} {}, ", kw, q.kind, q.name)?;
                }
                write!(f, "{}", condition)
            }
            Expr::Pick {
                size,
                kind,
                where_clause,
            } => {
                write!(f, "pick {}", size)?;
                if let Some(k) = kind {
                    write!(f, " {}", k)?;
                }
                if let Some(w) = where_clause {
                    write!(f, " where {}", w)?;
                }
                Ok(())
            }
        }
    }
}

/// Where an assignment lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignKind {
    /// Interface store, `<-`
    Interface,
    /// Stigmergic store, `<~`
    Stigmergy,
    /// Shared environment, `<--`
    Environment,
    /// Block-local scratch variable, `:=`
    Local,
}

impl AssignKind {
    pub fn arrow(&self) -> &'static str {
        match self {
            AssignKind::Interface => "<-",
            AssignKind::Stigmergy => "<~",
            AssignKind::Environment => "<--",
            AssignKind::Local => ":=",
        }
    }
}

/// A (multi-)assignment: `x, y <- e1, e2`. Lhs and rhs lengths match.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub kind: AssignKind,
    pub lhs: Vec<VarRef>,
    pub rhs: Vec<Expr>,
}

/// Composition operators for processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositionOp {
    /// `;`
    Seq,
    /// `++`
    Choice,
    /// `||`
    Par,
}

/// Behavior processes.
#[derive(Debug, Clone, PartialEq)]
pub enum Process {
    Skip,
    Assign(Assign),
    /// Atomic block of assignments, executed without interleaving.
    Block(Vec<Assign>),
    Composition {
        op: CompositionOp,
        operands: Vec<Process>,
    },
    Guarded {
        cond: Expr,
        body: Box<Process>,
    },
    Call(String),
}

impl Process {
    /// Depth-first iterator over this process node and all descendants.
    /// Does not follow `Call`s; callers resolve those against the process
    /// definitions of the agent or system.
    pub fn walk(&self) -> ProcessWalk<'_> {
        ProcessWalk { stack: vec![self] }
    }

    /// All call targets in this process tree.
    pub fn call_names(&self) -> Vec<&str> {
        self.walk()
            .filter_map(|p| match p {
                Process::Call(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Depth-first process iterator.
pub struct ProcessWalk<'a> {
    stack: Vec<&'a Process>,
}

impl<'a> Iterator for ProcessWalk<'a> {
    type Item = &'a Process;

    fn next(&mut self) -> Option<&'a Process> {
        let node = self.stack.pop()?;
        match node {
            Process::Skip | Process::Assign(_) | Process::Block(_) | Process::Call(_) => {}
            // Reversed so siblings pop in source order
            Process::Composition { operands, .. } => self.stack.extend(operands.iter().rev()),
            Process::Guarded { body, .. } => self.stack.push(body),
        }
        Some(node)
    }
}

/// Temporal modality of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Always,
    Eventually,
    Finally,
    Fairly,
    FairlyInf,
    Between,
}

impl Modality {
    pub fn parse(word: &str) -> Option<Modality> {
        match word {
            "always" => Some(Modality::Always),
            "eventually" => Some(Modality::Eventually),
            "finally" => Some(Modality::Finally),
            "fairly" => Some(Modality::Fairly),
            "fairly_inf" => Some(Modality::FairlyInf),
            "between" => Some(Modality::Between),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Modality::Always => "always",
            Modality::Eventually => "eventually",
            Modality::Finally => "finally",
            Modality::Fairly => "fairly",
            Modality::FairlyInf => "fairly_inf",
            Modality::Between => "between",
        }
    }
}

/// A parsed temporal property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub modality: Modality,
    pub formula: Expr,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x_plus_one() -> Expr {
        Expr::Bin {
            op: BinOp::Add,
            operands: vec![
                Expr::Ref {
                    var: VarRef::scalar("x"),
                    of: None,
                },
                Expr::Literal(1),
            ],
        }
    }

    #[test]
    fn test_walk_visits_all_nodes() {
        let e = Expr::Cmp {
            op: CmpOp::Lt,
            operands: vec![x_plus_one(), Expr::Literal(5)],
        };
        assert_eq!(e.walk().count(), 5);
    }

    #[test]
    fn test_ref_names() {
        let e = x_plus_one();
        assert_eq!(e.ref_names(), vec!["x"]);
        assert!(e.contains_ref("x"));
        assert!(!e.contains_ref("y"));
    }

    #[test]
    fn test_display_roundtrippable_shape() {
        let e = Expr::Cmp {
            op: CmpOp::Le,
            operands: vec![
                Expr::Ref {
                    var: VarRef::scalar("x"),
                    of: Some("w".into()),
                },
                Expr::RefExt("bound".into()),
            ],
        };
        assert_eq!(e.to_string(), "(x of w <= _bound)");
    }

    #[test]
    fn test_process_walk_and_calls() {
        let p = Process::Composition {
            op: CompositionOp::Seq,
            operands: vec![
                Process::Guarded {
                    cond: Expr::Literal(1),
                    body: Box::new(Process::Call("Work".into())),
                },
                Process::Call("Behavior".into()),
            ],
        };
        assert_eq!(p.walk().count(), 4);
        assert_eq!(p.call_names(), vec!["Work", "Behavior"]);
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!(Modality::parse("always"), Some(Modality::Always));
        assert_eq!(Modality::parse("fairly_inf"), Some(Modality::FairlyInf));
        assert_eq!(Modality::parse("sometimes"), None);
    }
}
