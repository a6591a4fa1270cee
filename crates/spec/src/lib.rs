//! Swarm specification front-end
//!
//! AST sum types, a recursive-descent parser for the formula and behavior
//! fragments the driver receives as text, and the structured system
//! information (`Info`) deserialized from the encoder's info bundle.

pub mod ast;
pub mod info;
pub mod parser;

pub use ast::{
    Assign, AssignKind, BinOp, Builtin, CmpOp, CompositionOp, Expr, Modality, Process, Property,
    QVar, Quant, VarRef,
};
pub use info::{AgentKind, Info, Init, PickDecl, Spawn, Store, ValueSet, Variable, UNDEF};
pub use parser::{eval_ground, parse_expr, parse_formula, parse_process, parse_property, Parser};
