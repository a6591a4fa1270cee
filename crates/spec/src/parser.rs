//! Recursive-descent parser for Swarm property, assume, and behavior texts
//!
//! The surface compiler ships these fragments to the driver as plain text
//! (see the info bundle in `info.rs`); this module turns them into the sum
//! types of `ast.rs`. The parser keeps no hidden state: every entry point
//! takes a string and returns a value or an error message.

use crate::ast::{
    Assign, AssignKind, BinOp, Builtin, CmpOp, CompositionOp, Expr, Modality, Process, Property,
    QVar, Quant, VarRef,
};

/// A token with source position information.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(text: String, line: usize, column: usize) -> Self {
        Token { text, line, column }
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

/// Multi-character operators, longest first so the tokenizer is greedy.
const OPERATORS: &[&str] = &[
    "<--", "<~", "<-", "->", "++", "||", ":=", "..", ">=", "<=", "!=", "(", ")", "[", "]", "{",
    "}", ",", ";", "=", "<", ">", "+", "-", "*", "/", "%",
];

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        'scan: while i < chars.len() {
            if chars[i].is_whitespace() {
                i += 1;
                continue;
            }
            // Line comment
            if chars[i] == '#' {
                break;
            }
            let rest: String = chars[i..].iter().collect();
            for op in OPERATORS {
                if rest.starts_with(op) {
                    tokens.push(Token::new(op.to_string(), line_no, i));
                    i += op.len();
                    continue 'scan;
                }
            }
            if chars[i].is_ascii_digit() {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                tokens.push(Token::new(
                    chars[start..i].iter().collect(),
                    line_no,
                    start,
                ));
                continue;
            }
            if chars[i].is_alphabetic() || chars[i] == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::new(
                    chars[start..i].iter().collect(),
                    line_no,
                    start,
                ));
                continue;
            }
            tokens.push(Token::new(chars[i].to_string(), line_no, i));
            i += 1;
        }
    }
    tokens
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokens: tokenize(source),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_text(&self) -> &str {
        self.tokens.get(self.pos).map(|t| t.text.as_str()).unwrap_or("")
    }

    fn check(&self, text: &str) -> bool {
        self.peek().map(|t| t.text == text).unwrap_or(false)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn consume(&mut self, text: &str) -> Result<(), String> {
        match self.peek() {
            Some(t) if t.text == text => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(format!(
                "Expected '{}' but found '{}' at line {}, column {}",
                text,
                t.text,
                t.line + 1,
                t.column + 1
            )),
            None => Err(format!("Expected '{}' but input ended", text)),
        }
    }

    fn expect_end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!(
                "Unexpected trailing input '{}' at line {}, column {}",
                t.text,
                t.line + 1,
                t.column + 1
            )),
        }
    }

    // ---------------- formulas ----------------

    /// Parse a property: `<modality> <formula>`.
    pub fn parse_property(&mut self) -> Result<Property, String> {
        let head = self
            .advance()
            .ok_or_else(|| "Empty property text".to_string())?;
        let modality = Modality::parse(&head.text)
            .ok_or_else(|| format!("Unrecognized modality '{}'", head.text))?;
        let formula = self.parse_formula()?;
        self.expect_end()?;
        Ok(Property { modality, formula })
    }

    /// Parse a (possibly quantified) formula.
    pub fn parse_formula(&mut self) -> Result<Expr, String> {
        let mut qvars = Vec::new();
        while self.check("forall") || self.check("exists") {
            let quant = if self.check("forall") {
                Quant::Forall
            } else {
                Quant::Exists
            };
            self.advance();
            let kind = self.identifier("agent kind")?;
            let name = self.identifier("quantified variable")?;
            self.consume(",")?;
            qvars.push(QVar { quant, kind, name });
        }
        let condition = self.parse_bexpr()?;
        if qvars.is_empty() {
            Ok(condition)
        } else {
            Ok(Expr::QFormula {
                qvars,
                condition: Box::new(condition),
            })
        }
    }

    fn identifier(&mut self, what: &str) -> Result<String, String> {
        let tok = self
            .advance()
            .ok_or_else(|| format!("Expected {} but input ended", what))?;
        let first = tok.text.chars().next().unwrap_or(' ');
        if first.is_alphabetic() || first == '_' {
            Ok(tok.text)
        } else {
            Err(format!(
                "Expected {} but found '{}' at line {}, column {}",
                what,
                tok.text,
                tok.line + 1,
                tok.column + 1
            ))
        }
    }

    fn parse_bexpr(&mut self) -> Result<Expr, String> {
        let mut operands = vec![self.parse_bterm()?];
        while self.check("or") {
            self.advance();
            operands.push(self.parse_bterm()?);
        }
        if operands.len() == 1 {
            Ok(operands.pop().unwrap())
        } else {
            Ok(Expr::Bin {
                op: BinOp::Or,
                operands,
            })
        }
    }

    fn parse_bterm(&mut self) -> Result<Expr, String> {
        let mut operands = vec![self.parse_bfactor()?];
        while self.check("and") {
            self.advance();
            operands.push(self.parse_bfactor()?);
        }
        if operands.len() == 1 {
            Ok(operands.pop().unwrap())
        } else {
            Ok(Expr::Bin {
                op: BinOp::And,
                operands,
            })
        }
    }

    fn parse_bfactor(&mut self) -> Result<Expr, String> {
        if self.check("true") {
            self.advance();
            return Ok(Expr::Literal(1));
        }
        if self.check("false") {
            self.advance();
            return Ok(Expr::Literal(0));
        }
        if self.check("not") {
            self.advance();
            let inner = self.parse_bfactor()?;
            return Ok(Expr::Call {
                fun: Builtin::Not,
                operands: vec![inner],
            });
        }
        // A parenthesized boolean, or a comparison whose left side happens
        // to start with '('. Try the boolean reading first and backtrack.
        if self.check("(") {
            let save = self.pos;
            self.advance();
            if let Ok(inner) = self.parse_bexpr() {
                if self.check(")") {
                    self.advance();
                    // Guard against "(e) < e2": only accept if no
                    // comparison operator follows.
                    if !self.at_cmp_op() {
                        return Ok(inner);
                    }
                }
            }
            self.pos = save;
        }
        self.parse_comparison()
    }

    fn at_cmp_op(&self) -> bool {
        matches!(self.peek_text(), "<" | ">" | "<=" | ">=" | "=" | "!=")
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_expr()?;
        let op = match self.peek_text() {
            "<" => CmpOp::Lt,
            ">" => CmpOp::Gt,
            "<=" => CmpOp::Le,
            ">=" => CmpOp::Ge,
            "=" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            other => {
                return Err(format!(
                    "Expected comparison operator, found '{}'",
                    if other.is_empty() { "<end>" } else { other }
                ))
            }
        };
        self.advance();
        let rhs = self.parse_expr()?;
        Ok(Expr::Cmp {
            op,
            operands: vec![lhs, rhs],
        })
    }

    // ---------------- expressions ----------------

    /// Parse an arithmetic expression.
    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek_text() {
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Bin {
                op,
                operands: vec![lhs, rhs],
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek_text() {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "%" => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Expr::Bin {
                op,
                operands: vec![lhs, rhs],
            };
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, String> {
        if self.check("-") {
            self.advance();
            let inner = self.parse_factor()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        if self.check("(") {
            self.advance();
            let inner = self.parse_expr()?;
            self.consume(")")?;
            return Ok(inner);
        }
        if self.check("if") {
            self.advance();
            let cond = self.parse_bexpr()?;
            self.consume("then")?;
            let then = self.parse_expr()?;
            self.consume("else")?;
            let els = self.parse_expr()?;
            return Ok(Expr::If {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            });
        }
        let tok = self
            .advance()
            .ok_or_else(|| "Expected expression but input ended".to_string())?;
        if tok.text.chars().all(|c| c.is_ascii_digit()) {
            return tok
                .text
                .parse::<i64>()
                .map(Expr::Literal)
                .map_err(|e| format!("Invalid integer '{}': {}", tok.text, e));
        }
        if let Some(ext) = tok.text.strip_prefix('_') {
            if !ext.is_empty() {
                return Ok(Expr::RefExt(ext.to_string()));
            }
        }
        let first = tok.text.chars().next().unwrap_or(' ');
        if !first.is_alphabetic() {
            return Err(format!(
                "Unexpected token '{}' at line {}, column {}",
                tok.text,
                tok.line + 1,
                tok.column + 1
            ));
        }
        match tok.text.as_str() {
            "abs" | "min" | "max" => {
                let fun = match tok.text.as_str() {
                    "abs" => Builtin::Abs,
                    "min" => Builtin::Min,
                    _ => Builtin::Max,
                };
                self.consume("(")?;
                let mut operands = vec![self.parse_expr()?];
                while self.check(",") {
                    self.advance();
                    operands.push(self.parse_expr()?);
                }
                self.consume(")")?;
                Ok(Expr::Call { fun, operands })
            }
            "pick" => {
                let size_tok = self
                    .advance()
                    .ok_or_else(|| "Expected pick size".to_string())?;
                let size: usize = size_tok
                    .text
                    .parse()
                    .map_err(|e| format!("Invalid pick size '{}': {}", size_tok.text, e))?;
                let kind = match self.peek() {
                    Some(t)
                        if t.text.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) =>
                    {
                        Some(self.advance().unwrap().text)
                    }
                    _ => None,
                };
                let where_clause = if self.check("where") {
                    self.advance();
                    Some(Box::new(self.parse_bexpr()?))
                } else {
                    None
                };
                Ok(Expr::Pick {
                    size,
                    kind,
                    where_clause,
                })
            }
            _ => {
                let mut var = VarRef {
                    name: tok.text,
                    offset: None,
                };
                if self.check("[") {
                    self.advance();
                    let off = self.parse_expr()?;
                    self.consume("]")?;
                    var.offset = Some(Box::new(off));
                }
                let of = if self.check("of") {
                    self.advance();
                    Some(self.identifier("agent variable after 'of'")?)
                } else {
                    None
                };
                Ok(Expr::Ref { var, of })
            }
        }
    }

    /// Parse an assignment right-hand side: an expression, optionally a
    /// nondeterministic range `lo .. hi`.
    fn parse_rhs(&mut self) -> Result<Expr, String> {
        let lo = self.parse_expr()?;
        if self.check("..") {
            self.advance();
            let hi = self.parse_expr()?;
            return Ok(Expr::Bin {
                op: BinOp::RangeNondet,
                operands: vec![lo, hi],
            });
        }
        Ok(lo)
    }

    // ---------------- processes ----------------

    /// Parse a behavior process.
    pub fn parse_process(&mut self) -> Result<Process, String> {
        let proc = self.parse_par()?;
        self.expect_end()?;
        Ok(proc)
    }

    fn parse_par(&mut self) -> Result<Process, String> {
        let mut operands = vec![self.parse_choice()?];
        while self.check("||") {
            self.advance();
            operands.push(self.parse_choice()?);
        }
        Ok(combine(CompositionOp::Par, operands))
    }

    fn parse_choice(&mut self) -> Result<Process, String> {
        let mut operands = vec![self.parse_seq()?];
        while self.check("++") {
            self.advance();
            operands.push(self.parse_seq()?);
        }
        Ok(combine(CompositionOp::Choice, operands))
    }

    fn parse_seq(&mut self) -> Result<Process, String> {
        let mut operands = vec![self.parse_pterm()?];
        while self.check(";") {
            self.advance();
            operands.push(self.parse_pterm()?);
        }
        Ok(combine(CompositionOp::Seq, operands))
    }

    fn parse_pterm(&mut self) -> Result<Process, String> {
        if self.check("(") {
            self.advance();
            let inner = self.parse_par()?;
            self.consume(")")?;
            return Ok(inner);
        }
        if self.check("{") {
            return self.parse_block();
        }
        if self.check("Skip") {
            self.advance();
            return Ok(Process::Skip);
        }
        // Guard: a boolean expression followed by `->`. Try it and
        // backtrack if the arrow never shows up.
        let save = self.pos;
        if let Ok(cond) = self.parse_bexpr() {
            if self.check("->") {
                self.advance();
                let body = self.parse_par()?;
                return Ok(Process::Guarded {
                    cond,
                    body: Box::new(body),
                });
            }
        }
        self.pos = save;
        // Call: capitalized identifier not followed by an assignment arrow
        if let Some(t) = self.peek() {
            let is_upper = t.text.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
            if is_upper {
                let name = self.advance().unwrap().text;
                return Ok(Process::Call(name));
            }
        }
        self.parse_assign().map(Process::Assign)
    }

    fn parse_block(&mut self) -> Result<Process, String> {
        self.consume("{")?;
        let mut assigns = vec![self.parse_assign()?];
        while self.check(";") {
            self.advance();
            assigns.push(self.parse_assign()?);
        }
        self.consume("}")?;
        Ok(Process::Block(assigns))
    }

    fn parse_assign(&mut self) -> Result<Assign, String> {
        let mut lhs = vec![self.parse_lhs_ref()?];
        while self.check(",") {
            self.advance();
            lhs.push(self.parse_lhs_ref()?);
        }
        let kind = match self.peek_text() {
            "<-" => AssignKind::Interface,
            "<~" => AssignKind::Stigmergy,
            "<--" => AssignKind::Environment,
            ":=" => AssignKind::Local,
            other => {
                return Err(format!(
                    "Expected assignment arrow, found '{}'",
                    if other.is_empty() { "<end>" } else { other }
                ))
            }
        };
        self.advance();
        let mut rhs = vec![self.parse_rhs()?];
        while self.check(",") {
            self.advance();
            rhs.push(self.parse_rhs()?);
        }
        if lhs.len() != rhs.len() {
            return Err(format!(
                "Assignment arity mismatch: {} targets, {} values",
                lhs.len(),
                rhs.len()
            ));
        }
        Ok(Assign { kind, lhs, rhs })
    }

    fn parse_lhs_ref(&mut self) -> Result<VarRef, String> {
        let name = self.identifier("assignment target")?;
        let mut var = VarRef { name, offset: None };
        if self.check("[") {
            self.advance();
            let off = self.parse_expr()?;
            self.consume("]")?;
            var.offset = Some(Box::new(off));
        }
        Ok(var)
    }
}

fn combine(op: CompositionOp, mut operands: Vec<Process>) -> Process {
    if operands.len() == 1 {
        operands.pop().unwrap()
    } else {
        Process::Composition { op, operands }
    }
}

/// Parse a property text (`always forall A a, ...`).
pub fn parse_property(text: &str) -> Result<Property, String> {
    Parser::new(text).parse_property()
}

/// Parse a bare (possibly quantified) formula, as used by `assume` clauses.
pub fn parse_formula(text: &str) -> Result<Expr, String> {
    let mut p = Parser::new(text);
    let f = p.parse_formula()?;
    p.expect_end()?;
    Ok(f)
}

/// Parse an arithmetic expression, as used by variable initializers.
pub fn parse_expr(text: &str) -> Result<Expr, String> {
    let mut p = Parser::new(text);
    let e = p.parse_expr()?;
    p.expect_end()?;
    Ok(e)
}

/// Parse a behavior process definition body.
pub fn parse_process(text: &str) -> Result<Process, String> {
    Parser::new(text).parse_process()
}

/// Evaluate a ground expression, with `id` bound to the given agent id.
/// Initializers may mention `id` (`id % 2`) but nothing else.
pub fn eval_ground(expr: &Expr, id: i64) -> Result<i64, String> {
    match expr {
        Expr::Literal(v) => Ok(*v),
        Expr::Ref { var, of: None } if var.name == "id" && var.offset.is_none() => Ok(id),
        Expr::Neg(inner) => Ok(-eval_ground(inner, id)?),
        Expr::Bin { op, operands } => {
            let vals: Result<Vec<i64>, String> =
                operands.iter().map(|e| eval_ground(e, id)).collect();
            let vals = vals?;
            vals.into_iter()
                .reduce(|a, b| match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => if b == 0 { 0 } else { a / b },
                    BinOp::Mod => if b == 0 { 0 } else { a.rem_euclid(b) },
                    BinOp::And => i64::from(a != 0 && b != 0),
                    BinOp::Or => i64::from(a != 0 || b != 0),
                    BinOp::RangeNondet => a,
                })
                .ok_or_else(|| "Empty operand list".to_string())
        }
        Expr::Call { fun, operands } => {
            let vals: Result<Vec<i64>, String> =
                operands.iter().map(|e| eval_ground(e, id)).collect();
            let vals = vals?;
            match fun {
                Builtin::Abs => Ok(vals[0].abs()),
                Builtin::Min => Ok(vals.iter().copied().min().unwrap_or(0)),
                Builtin::Max => Ok(vals.iter().copied().max().unwrap_or(0)),
                Builtin::Not => Ok(i64::from(vals[0] == 0)),
            }
        }
        other => Err(format!("Not a ground expression: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignKind, BinOp, CmpOp, CompositionOp, Modality, Quant};

    #[test]
    fn test_tokenize_multichar_operators() {
        let toks = tokenize("a <-- b <~ c <- d -> e");
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "<--", "b", "<~", "c", "<-", "d", "->", "e"]);
    }

    #[test]
    fn test_parse_property_always() {
        let p = parse_property("always forall Worker w, x of w < 2").unwrap();
        assert_eq!(p.modality, Modality::Always);
        match p.formula {
            Expr::QFormula { qvars, condition } => {
                assert_eq!(qvars.len(), 1);
                assert_eq!(qvars[0].quant, Quant::Forall);
                assert_eq!(qvars[0].kind, "Worker");
                assert_eq!(qvars[0].name, "w");
                assert!(matches!(*condition, Expr::Cmp { op: CmpOp::Lt, .. }));
            }
            other => panic!("expected quantified formula, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested_quantifiers() {
        let f = parse_formula("forall A a, exists B b, x of a = y of b").unwrap();
        match f {
            Expr::QFormula { qvars, .. } => {
                assert_eq!(qvars.len(), 2);
                assert_eq!(qvars[1].quant, Quant::Exists);
            }
            other => panic!("expected quantified formula, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_boolean_precedence() {
        // "a = 1 or b = 2 and c = 3" groups the `and` tighter
        let f = parse_formula("a = 1 or b = 2 and c = 3").unwrap();
        match f {
            Expr::Bin { op: BinOp::Or, operands } => {
                assert_eq!(operands.len(), 2);
                assert!(matches!(
                    operands[1],
                    Expr::Bin { op: BinOp::And, .. }
                ));
            }
            other => panic!("expected or at top, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_extern_and_array_ref() {
        let e = parse_expr("dir[_k + 1] * 2").unwrap();
        match e {
            Expr::Bin { op: BinOp::Mul, operands } => match &operands[0] {
                Expr::Ref { var, of: None } => {
                    assert_eq!(var.name, "dir");
                    assert!(var.offset.is_some());
                }
                other => panic!("expected ref, got {:?}", other),
            },
            other => panic!("expected product, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_process_choice_and_guard() {
        let p = parse_process("x < 2 -> x <- x + 1 ++ Reset").unwrap();
        match p {
            Process::Composition { op: CompositionOp::Choice, operands } => {
                assert_eq!(operands.len(), 2);
                assert!(matches!(operands[0], Process::Guarded { .. }));
                assert!(matches!(operands[1], Process::Call(_)));
            }
            other => panic!("expected choice, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_block_with_local() {
        let p = parse_process("{ t := x + 1; x <- t; y <~ t }").unwrap();
        match p {
            Process::Block(assigns) => {
                assert_eq!(assigns.len(), 3);
                assert_eq!(assigns[0].kind, AssignKind::Local);
                assert_eq!(assigns[1].kind, AssignKind::Interface);
                assert_eq!(assigns[2].kind, AssignKind::Stigmergy);
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pick_rhs() {
        let p = parse_process("mate <- pick 2 Worker").unwrap();
        match p {
            Process::Assign(a) => {
                assert!(matches!(
                    a.rhs[0],
                    Expr::Pick { size: 2, kind: Some(ref k), .. } if k == "Worker"
                ));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_range_nondet_rhs() {
        let p = parse_process("x <- 0 .. 10").unwrap();
        match p {
            Process::Assign(a) => assert!(matches!(
                a.rhs[0],
                Expr::Bin { op: BinOp::RangeNondet, .. }
            )),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_seq_then_call() {
        let p = parse_process("x <- 1 - x; Behavior").unwrap();
        match p {
            Process::Composition { op: CompositionOp::Seq, operands } => {
                assert_eq!(operands.len(), 2);
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_eval_ground_id() {
        let e = parse_expr("id % 2 + 1").unwrap();
        assert_eq!(eval_ground(&e, 0).unwrap(), 1);
        assert_eq!(eval_ground(&e, 3).unwrap(), 2);
    }

    #[test]
    fn test_eval_ground_rejects_free_vars() {
        let e = parse_expr("x + 1").unwrap();
        assert!(eval_ground(&e, 0).is_err());
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = parse_formula("x + ").unwrap_err();
        assert!(err.contains("ended"), "unexpected message: {}", err);
    }
}
