//! SMT-backed concretization
//!
//! Builds a model of the initial state, the scheduler, and the per-step
//! pick arrays under the specification's assumptions, then extracts
//! concrete values for one simulation run. Randomization happens through
//! retractable soft constraints; past models are blocked so consecutive
//! runs differ. The solver instance is owned exclusively by this type and
//! the RNG is injected at construction, seeded by the orchestrator.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;
use z3::ast::{Ast, Bool, Int};
use z3::{Context, SatResult, Solver};

use swarm_spec::ast::{BinOp, Builtin, CmpOp, Expr};
use swarm_spec::{Info, Store, ValueSet};

use crate::errors::{DriverError, DriverResult, ExitStatus};
use crate::property::{rewrite_assume, StateLabel};
use crate::template::Template;

/// One concrete assignment for everything nondeterministic in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteModel {
    /// Per agent: (flat index, value) pairs of the interface store.
    pub iface: Vec<Vec<(usize, i64)>>,
    /// Per agent: (flat index, value) pairs of the stigmergy store.
    pub lstig: Vec<Vec<(usize, i64)>>,
    pub env: Vec<(usize, i64)>,
    pub sched: Vec<i64>,
    /// Pick arrays: name, cell width, then `steps × size` values.
    pub picks: Vec<(String, usize, Vec<Vec<i64>>)>,
}

impl ConcreteModel {
    fn fmt_intvec(vals: &[i64]) -> String {
        let parts: Vec<String> = vals.iter().map(|v| v.to_string()).collect();
        format!("{{ {} }}", parts.join(","))
    }

    /// The `globals` fragment: scheduler and pick arrays.
    pub fn fmt_globals(&self, steps: usize) -> String {
        let mut out = format!(
            "TYPEOFAGENTID sched[{}] = {};",
            steps,
            ConcreteModel::fmt_intvec(&self.sched)
        );
        for (name, size, rows) in &self.picks {
            let formatted: Vec<String> =
                rows.iter().map(|r| ConcreteModel::fmt_intvec(r)).collect();
            out.push_str(&format!(
                "\nTYPEOFAGENTID {}[{}][{}] = {{ {} }};",
                name,
                steps,
                size,
                formatted.join(", ")
            ));
        }
        out
    }

    /// The `inits` fragment. Cells whose value is zero are omitted: the
    /// compiler default already covers them.
    pub fn fmt_inits(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for (tid, cells) in self.iface.iter().enumerate() {
            for (idx, v) in cells {
                if *v != 0 {
                    lines.push(format!("I[{}][{}] = {};", tid, idx, v));
                }
            }
        }
        for (tid, cells) in self.lstig.iter().enumerate() {
            for (idx, v) in cells {
                if *v != 0 {
                    lines.push(format!("Lvalue[{}][{}] = {};", tid, idx, v));
                }
            }
        }
        for (idx, v) in &self.env {
            if *v != 0 {
                lines.push(format!("E[{}] = {};", idx, v));
            }
        }
        lines.join("\n")
    }
}

struct PickArray<'ctx> {
    name: String,
    size: usize,
    vars: Vec<Vec<Int<'ctx>>>,
}

/// The concretization problem. State machine: `Ready -> Solving ->
/// Sat | Unsat(retract softs) | Failed`; a successful call adds a
/// blocking clause so the next one produces a different model.
pub struct Concretizer<'ctx> {
    ctx: &'ctx Context,
    info: &'ctx Info,
    solver: Solver<'ctx>,
    steps: usize,
    fair: bool,
    agents: usize,
    attrs: Vec<Vec<(usize, Int<'ctx>)>>,
    lstigs: Vec<Vec<(usize, Int<'ctx>)>>,
    envs: Vec<(usize, Int<'ctx>)>,
    sched: Vec<Int<'ctx>>,
    picks: Vec<PickArray<'ctx>>,
    softs: Vec<Bool<'ctx>>,
    pending_blocks: Vec<Bool<'ctx>>,
    scope_pushed: bool,
    rng: StdRng,
}

impl<'ctx> Concretizer<'ctx> {
    pub fn new(
        ctx: &'ctx Context,
        info: &'ctx Info,
        steps: usize,
        fair: bool,
        seed: u64,
    ) -> DriverResult<Self> {
        debug!("concretization: random seed is {}", seed);
        let mut c = Concretizer {
            ctx,
            info,
            solver: Solver::new(ctx),
            steps,
            fair,
            agents: info.spawn.num_agents(),
            attrs: Vec::new(),
            lstigs: Vec::new(),
            envs: Vec::new(),
            sched: Vec::new(),
            picks: Vec::new(),
            softs: Vec::new(),
            pending_blocks: Vec::new(),
            scope_pushed: false,
            rng: StdRng::seed_from_u64(seed),
        };
        c.setup_initial_state()?;
        c.setup_scheduler();
        c.setup_assumes()?;
        Ok(c)
    }

    fn is_an_agent(&self, var: &Int<'ctx>) -> Bool<'ctx> {
        let zero = Int::from_i64(self.ctx, 0);
        let n = Int::from_i64(self.ctx, self.agents as i64);
        Bool::and(self.ctx, &[&var.ge(&zero), &var.lt(&n)])
    }

    fn is_of_kind(&self, var: &Int<'ctx>, kind: &str) -> DriverResult<Bool<'ctx>> {
        let (lo, hi) = self
            .info
            .spawn
            .range_of(kind)
            .map_err(DriverError::backend)?;
        let lo = Int::from_i64(self.ctx, lo as i64);
        let hi = Int::from_i64(self.ctx, hi as i64);
        Ok(Bool::and(self.ctx, &[&var.ge(&lo), &var.lt(&hi)]))
    }

    fn value_constraint(&self, cell: &Int<'ctx>, values: &ValueSet) -> Bool<'ctx> {
        match values {
            ValueSet::Range(lo, hi) => {
                let lo = Int::from_i64(self.ctx, *lo);
                let hi = Int::from_i64(self.ctx, *hi);
                Bool::and(self.ctx, &[&cell.ge(&lo), &cell.lt(&hi)])
            }
            ValueSet::List(vs) => {
                let eqs: Vec<Bool<'ctx>> = vs
                    .iter()
                    .map(|v| cell._eq(&Int::from_i64(self.ctx, *v)))
                    .collect();
                let refs: Vec<&Bool<'ctx>> = eqs.iter().collect();
                Bool::or(self.ctx, &refs)
            }
        }
    }

    fn setup_initial_state(&mut self) -> DriverResult<()> {
        for tid in 0..self.agents {
            let kind = self.info.spawn.agent_at(tid).map_err(DriverError::backend)?;
            let mut attrs = Vec::new();
            let mut lstigs = Vec::new();
            for (store, vars, out) in [
                (Store::Iface, &kind.iface, &mut attrs),
                (Store::Lstig, &kind.lstig, &mut lstigs),
            ] {
                let letter = store.letter();
                for v in vars {
                    let values = v.values(tid).map_err(DriverError::backend)?;
                    for off in 0..v.size {
                        let idx = v.index + off;
                        let cell =
                            Int::new_const(self.ctx, format!("{}_{:0>2}_{:0>2}", letter, tid, idx));
                        self.solver.assert(&self.value_constraint(&cell, &values));
                        out.push((idx, cell));
                    }
                }
            }
            self.attrs.push(attrs);
            self.lstigs.push(lstigs);
        }

        for v in &self.info.env {
            let values = v.values(0).map_err(DriverError::backend)?;
            for off in 0..v.size {
                let idx = v.index + off;
                let cell = Int::new_const(self.ctx, format!("E_{:0>2}", idx));
                self.solver.assert(&self.value_constraint(&cell, &values));
                self.envs.push((idx, cell));
            }
        }
        Ok(())
    }

    fn setup_scheduler(&mut self) {
        for i in 0..self.steps {
            let s = Int::new_const(self.ctx, format!("sched__{}", i));
            let c = self.is_an_agent(&s);
            self.solver.assert(&c);
            self.sched.push(s);
        }
        if self.fair && !self.info.has_stigmergy() {
            // Round-robin schedule. Stigmergic systems interleave
            // propagation steps, so the constraint only applies without
            // stigmergy.
            if let Some(first) = self.sched.first() {
                self.solver.assert(&first._eq(&Int::from_i64(self.ctx, 0)));
            }
            let last_id = Int::from_i64(self.ctx, self.agents as i64 - 1);
            let zero = Int::from_i64(self.ctx, 0);
            let one = Int::from_i64(self.ctx, 1);
            for i in 1..self.steps {
                let prev = &self.sched[i - 1];
                let next = Int::add(self.ctx, &[prev, &one]);
                let wrapped = prev._eq(&last_id).ite(&zero, &next);
                self.solver.assert(&self.sched[i]._eq(&wrapped));
            }
        } else if self.fair {
            debug!("fair scheduling constraints suppressed: system has stigmergy");
        }
    }

    fn setup_assumes(&mut self) -> DriverResult<()> {
        for text in &self.info.assumes {
            let formula = rewrite_assume(self.info, text).map_err(|e| {
                DriverError::new(ExitStatus::ParsingError, format!("assume '{}': {}", text, e))
            })?;
            let constraint = self.z3_bool(&formula)?;
            self.solver.assert(&constraint);
        }
        Ok(())
    }

    /// Register a pick array and its constraints.
    pub fn add_pick(&mut self, name: &str, size: usize, kind: Option<&str>) -> DriverResult<()> {
        if self.picks.iter().any(|p| p.name == name) {
            return Ok(());
        }
        let mut vars: Vec<Vec<Int<'ctx>>> = Vec::with_capacity(self.steps);
        for step in 0..self.steps {
            vars.push(
                (0..size)
                    .map(|i| {
                        Int::new_const(self.ctx, format!("pick_{}__{}__{}", name, step, i))
                    })
                    .collect(),
            );
        }

        // Which agent kinds actually use this pick
        let users: Vec<&str> = self
            .info
            .spawn
            .kinds()
            .filter(|k| k.uses_pick(name))
            .map(|k| k.name.as_str())
            .collect();

        for step in 0..self.steps {
            let cells = &vars[step];
            let mut if_can_pick: Vec<Bool<'ctx>> = Vec::new();
            for cell in cells {
                if_can_pick.push(match kind {
                    Some(k) => self.is_of_kind(cell, k)?,
                    None => self.is_an_agent(cell),
                });
            }
            // Picks are distinct within a step
            for j in 0..size {
                for i in 0..j {
                    if_can_pick.push(cells[i]._eq(&cells[j]).not());
                }
            }
            // An agent cannot pick itself
            for cell in cells {
                if_can_pick.push(cell._eq(&self.sched[step]).not());
            }

            let can_pick = if users.is_empty() {
                Bool::from_bool(self.ctx, false)
            } else {
                let mut of_kinds = Vec::new();
                for u in &users {
                    of_kinds.push(self.is_of_kind(&self.sched[step], u)?);
                }
                let refs: Vec<&Bool<'ctx>> = of_kinds.iter().collect();
                Bool::or(self.ctx, &refs)
            };

            let zero = Int::from_i64(self.ctx, 0);
            let all_zero: Vec<Bool<'ctx>> = cells.iter().map(|c| c._eq(&zero)).collect();
            let picked_refs: Vec<&Bool<'ctx>> = if_can_pick.iter().collect();
            let zero_refs: Vec<&Bool<'ctx>> = all_zero.iter().collect();
            let constraint = can_pick.ite(
                &Bool::and(self.ctx, &picked_refs),
                &Bool::and(self.ctx, &zero_refs),
            );
            self.solver.assert(&constraint);
        }

        self.picks.push(PickArray {
            name: name.to_string(),
            size,
            vars,
        });
        Ok(())
    }

    /// Register every pick declared by the emitted program.
    pub fn add_picks_from(&mut self, template: &Template) -> DriverResult<()> {
        for p in template.scan_picks() {
            self.add_pick(&p.name, p.size, p.kind.as_deref())?;
        }
        Ok(())
    }

    // ---------------- soft-constraint layer ----------------

    fn add_soft_constraints(&mut self) {
        let mut softs: Vec<(Bool<'ctx>, Bool<'ctx>)> = Vec::new();
        let mut counter = 0usize;
        let mut fresh = |ctx: &'ctx Context, tag: &str| {
            counter += 1;
            Bool::new_const(ctx, format!("soft_{}_{}", tag, counter))
        };

        for (store, per_agent) in [(Store::Iface, &self.attrs), (Store::Lstig, &self.lstigs)] {
            for (tid, cells) in per_agent.iter().enumerate() {
                for (idx, cell) in cells {
                    let Some(var) = self.info.var_at(store, *idx) else {
                        continue;
                    };
                    let Ok(values) = var.values(tid) else { continue };
                    if values.len() <= 1 {
                        continue;
                    }
                    let rnd = values
                        .nth(self.rng.gen_range(0..values.len()))
                        .unwrap_or(0);
                    let b = fresh(self.ctx, store.letter());
                    let implied = cell._eq(&Int::from_i64(self.ctx, rnd));
                    softs.push((b.clone(), b.implies(&implied)));
                }
            }
        }
        for (idx, cell) in &self.envs {
            let Some(var) = self.info.var_at(Store::Env, *idx) else {
                continue;
            };
            let Ok(values) = var.values(0) else { continue };
            if values.len() <= 1 {
                continue;
            }
            let rnd = values
                .nth(self.rng.gen_range(0..values.len()))
                .unwrap_or(0);
            let b = fresh(self.ctx, "E");
            let implied = cell._eq(&Int::from_i64(self.ctx, rnd));
            softs.push((b.clone(), b.implies(&implied)));
        }

        // Soft preferences on pick cells, drawn without replacement
        for pick in &self.picks {
            let base: Vec<i64> = self
                .info
                .spawn
                .kinds()
                .find(|k| k.uses_pick(&pick.name))
                .and_then(|k| self.info.spawn.range_of(&k.name).ok())
                .map(|(lo, hi)| (lo as i64..hi as i64).collect())
                .unwrap_or_else(|| (0..self.agents as i64).collect());
            for cells in &pick.vars {
                let mut choices = base.clone();
                choices.shuffle(&mut self.rng);
                for cell in cells {
                    let Some(choice) = choices.pop() else { break };
                    let b = fresh(self.ctx, "pick");
                    let implied = cell._eq(&Int::from_i64(self.ctx, choice));
                    softs.push((b.clone(), b.implies(&implied)));
                }
            }
        }

        for (b, implication) in softs {
            self.solver.assert(&implication);
            self.softs.push(b);
        }
    }

    /// Solve for one concrete model. Soft constraints are retracted from
    /// the tail of a shuffled order until the problem becomes
    /// satisfiable; an unsat result with no softs left fails the run.
    pub fn concretize(&mut self) -> DriverResult<ConcreteModel> {
        if self.scope_pushed {
            self.solver.pop(1);
        }
        for block in std::mem::take(&mut self.pending_blocks) {
            self.solver.assert(&block);
        }
        self.solver.push();
        self.scope_pushed = true;
        self.softs.clear();
        self.add_soft_constraints();

        let mut assumptions = self.softs.clone();
        assumptions.shuffle(&mut self.rng);
        let mut result = self.solver.check_assumptions(&assumptions);
        while !matches!(result, SatResult::Sat) {
            if assumptions.pop().is_none() {
                return Err(DriverError::concretization_failed());
            }
            result = self.solver.check_assumptions(&assumptions);
        }

        let model = self
            .solver
            .get_model()
            .ok_or_else(|| DriverError::backend("Solver produced no model"))?;
        let eval = |x: &Int<'ctx>| -> DriverResult<i64> {
            model
                .eval(x, true)
                .and_then(|v| v.as_i64())
                .ok_or_else(|| DriverError::backend("Model is missing a value"))
        };

        let mut concrete = ConcreteModel {
            iface: Vec::new(),
            lstig: Vec::new(),
            env: Vec::new(),
            sched: Vec::new(),
            picks: Vec::new(),
        };
        let mut block: Vec<Bool<'ctx>> = Vec::new();
        let mut track = |cell: &Int<'ctx>, value: i64, block: &mut Vec<Bool<'ctx>>| {
            block.push(cell._eq(&Int::from_i64(self.ctx, value)).not());
        };

        for cells in &self.attrs {
            let mut row = Vec::new();
            for (idx, cell) in cells {
                let v = eval(cell)?;
                track(cell, v, &mut block);
                row.push((*idx, v));
            }
            concrete.iface.push(row);
        }
        for cells in &self.lstigs {
            let mut row = Vec::new();
            for (idx, cell) in cells {
                let v = eval(cell)?;
                track(cell, v, &mut block);
                row.push((*idx, v));
            }
            concrete.lstig.push(row);
        }
        for (idx, cell) in &self.envs {
            let v = eval(cell)?;
            track(cell, v, &mut block);
            concrete.env.push((*idx, v));
        }
        for cell in &self.sched {
            let v = eval(cell)?;
            track(cell, v, &mut block);
            concrete.sched.push(v);
        }
        for pick in &self.picks {
            let mut rows = Vec::new();
            for cells in &pick.vars {
                let mut row = Vec::new();
                for cell in cells {
                    let v = eval(cell)?;
                    track(cell, v, &mut block);
                    row.push(v);
                }
                rows.push(row);
            }
            concrete.picks.push((pick.name.clone(), pick.size, rows));
        }

        if !block.is_empty() {
            let refs: Vec<&Bool<'ctx>> = block.iter().collect();
            self.pending_blocks.push(Bool::or(self.ctx, &refs));
        }
        Ok(concrete)
    }

    // ---------------- formula translation ----------------

    fn cell_for(&self, label: &str) -> DriverResult<Int<'ctx>> {
        let parsed = StateLabel::parse(label, self.info).map_err(DriverError::backend)?;
        let idx = parsed.index();
        let found = match parsed.store() {
            Store::Iface => self
                .attrs
                .get(parsed.tid)
                .and_then(|cells| cells.iter().find(|(i, _)| *i == idx)),
            Store::Lstig => self
                .lstigs
                .get(parsed.tid)
                .and_then(|cells| cells.iter().find(|(i, _)| *i == idx)),
            Store::Env => self.envs.iter().find(|(i, _)| *i == idx),
        };
        found
            .map(|(_, cell)| cell.clone())
            .ok_or_else(|| DriverError::backend(format!("No store cell for label '{}'", label)))
    }

    fn z3_int(&self, expr: &Expr) -> DriverResult<Int<'ctx>> {
        match expr {
            Expr::Literal(v) => Ok(Int::from_i64(self.ctx, *v)),
            Expr::Label(l) => self.cell_for(l),
            // A plain reference in an assumption addresses the shared
            // environment; per-agent stores need an `of` qualifier.
            Expr::Ref { var, of: None } => {
                let decl = self
                    .info
                    .lookup_var(&var.name)
                    .map_err(DriverError::backend)?;
                let off = match &var.offset {
                    None => 0,
                    Some(e) => match e.as_ref() {
                        Expr::Literal(k) => *k as usize,
                        other => {
                            return Err(DriverError::backend(format!(
                                "non-literal array offset in assumption: {}",
                                other
                            )))
                        }
                    },
                };
                if decl.store != Store::Env {
                    return Err(DriverError::backend(format!(
                        "reference '{}' needs an 'of' qualifier in assumptions",
                        var.name
                    )));
                }
                let idx = decl.index + off;
                self.envs
                    .iter()
                    .find(|(i, _)| *i == idx)
                    .map(|(_, cell)| cell.clone())
                    .ok_or_else(|| {
                        DriverError::backend(format!("No environment cell at index {}", idx))
                    })
            }
            Expr::Neg(inner) => Ok(self.z3_int(inner)?.unary_minus()),
            Expr::Bin { op, operands } => {
                let vals: DriverResult<Vec<Int<'ctx>>> =
                    operands.iter().map(|e| self.z3_int(e)).collect();
                let vals = vals?;
                let refs: Vec<&Int<'ctx>> = vals.iter().collect();
                match op {
                    BinOp::Add => Ok(Int::add(self.ctx, &refs)),
                    BinOp::Sub => Ok(Int::sub(self.ctx, &refs)),
                    BinOp::Mul => Ok(Int::mul(self.ctx, &refs)),
                    BinOp::Div => Ok(vals[1..]
                        .iter()
                        .fold(vals[0].clone(), |a, b| a.div(b))),
                    BinOp::Mod => Ok(vals[1..]
                        .iter()
                        .fold(vals[0].clone(), |a, b| a.modulo(b))),
                    other => Err(DriverError::backend(format!(
                        "operator '{}' in arithmetic position",
                        other.symbol()
                    ))),
                }
            }
            Expr::Call { fun, operands } => {
                let vals: DriverResult<Vec<Int<'ctx>>> =
                    operands.iter().map(|e| self.z3_int(e)).collect();
                let vals = vals?;
                let zero = Int::from_i64(self.ctx, 0);
                match fun {
                    Builtin::Abs => {
                        let x = &vals[0];
                        Ok(x.lt(&zero).ite(&x.unary_minus(), x))
                    }
                    Builtin::Min => Ok(vals[1..]
                        .iter()
                        .fold(vals[0].clone(), |a, b| a.lt(b).ite(&a, b))),
                    Builtin::Max => Ok(vals[1..]
                        .iter()
                        .fold(vals[0].clone(), |a, b| a.gt(b).ite(&a, b))),
                    Builtin::Not => {
                        let one = Int::from_i64(self.ctx, 1);
                        Ok(vals[0]._eq(&zero).ite(&one, &zero))
                    }
                }
            }
            Expr::If { cond, then, els } => {
                let c = self.z3_bool(cond)?;
                Ok(c.ite(&self.z3_int(then)?, &self.z3_int(els)?))
            }
            Expr::Cmp { .. } => {
                let b = self.z3_bool(expr)?;
                let one = Int::from_i64(self.ctx, 1);
                let zero = Int::from_i64(self.ctx, 0);
                Ok(b.ite(&one, &zero))
            }
            other => Err(DriverError::backend(format!(
                "cannot lower to SMT: {}",
                other
            ))),
        }
    }

    fn z3_bool(&self, expr: &Expr) -> DriverResult<Bool<'ctx>> {
        match expr {
            Expr::Literal(v) => Ok(Bool::from_bool(self.ctx, *v != 0)),
            Expr::Cmp { op, operands } => {
                if operands.len() != 2 {
                    return Err(DriverError::backend("malformed comparison"));
                }
                let a = self.z3_int(&operands[0])?;
                let b = self.z3_int(&operands[1])?;
                Ok(match op {
                    CmpOp::Lt => a.lt(&b),
                    CmpOp::Gt => a.gt(&b),
                    CmpOp::Le => a.le(&b),
                    CmpOp::Ge => a.ge(&b),
                    CmpOp::Eq => a._eq(&b),
                    CmpOp::Ne => a._eq(&b).not(),
                })
            }
            Expr::Bin {
                op: BinOp::And,
                operands,
            } => {
                let bools: DriverResult<Vec<Bool<'ctx>>> =
                    operands.iter().map(|e| self.z3_bool(e)).collect();
                let bools = bools?;
                let refs: Vec<&Bool<'ctx>> = bools.iter().collect();
                Ok(Bool::and(self.ctx, &refs))
            }
            Expr::Bin {
                op: BinOp::Or,
                operands,
            } => {
                let bools: DriverResult<Vec<Bool<'ctx>>> =
                    operands.iter().map(|e| self.z3_bool(e)).collect();
                let bools = bools?;
                let refs: Vec<&Bool<'ctx>> = bools.iter().collect();
                Ok(Bool::or(self.ctx, &refs))
            }
            Expr::Call {
                fun: Builtin::Not,
                operands,
            } => Ok(self.z3_bool(&operands[0])?.not()),
            Expr::If { cond, then, els } => {
                let c = self.z3_bool(cond)?;
                Ok(c.ite(&self.z3_bool(then)?, &self.z3_bool(els)?))
            }
            other => {
                let zero = Int::from_i64(self.ctx, 0);
                Ok(self.z3_int(other)?._eq(&zero).not())
            }
        }
    }
}

/// Apply a concrete model to the emitted program: rewrite pick usages to
/// be step-indexed, blank the symbolic sections, and fill the concrete
/// globals, initializers, and scheduler.
pub fn apply_source_concretization(
    template: &mut Template,
    model: &ConcreteModel,
    steps: usize,
) -> DriverResult<()> {
    for pick in template.scan_picks() {
        template.rewrite_pick_usages(&pick.name);
    }
    template.blank(crate::template::HOLE_SYMBOLIC_SCHEDULER)?;
    template.blank(crate::template::HOLE_SYMBOLIC_PICK)?;
    template.fill(
        crate::template::HOLE_CONCRETE_GLOBALS,
        &model.fmt_globals(steps),
    )?;
    template.fill(crate::template::HOLE_CONCRETE_INIT, &model.fmt_inits())?;
    template.fill(
        crate::template::HOLE_CONCRETE_SCHEDULER,
        "scheduled = sched[__LABS_step];",
    )?;
    template.blank(crate::template::HOLE_SYMBOLIC_INIT)?;
    Ok(())
}

/// Prepare the program for the SAT-level path: the initial state stays
/// symbolic, but the scheduler is turned into an array the weak
/// assumptions can steer. With a fair scheduler and no stigmergy the
/// round-robin schedule is substituted directly instead.
pub fn apply_sat_concretization(
    template: &mut Template,
    info: &Info,
    steps: usize,
    fair: bool,
) -> DriverResult<()> {
    if !fair {
        template.blank(crate::template::HOLE_SYMBOLIC_SCHEDULER)?;
        template.fill(
            crate::template::HOLE_CONCRETE_SCHEDULER,
            "scheduled = sched[__LABS_step];",
        )?;
        template.replace_marker(
            "init();",
            "init();\n    TYPEOFAGENTID sched[BOUND];\n    \
             for (unsigned i = 0; i < BOUND; ++i) {\n        \
             sched[i] = __CPROVER_nondet_int();\n        \
             sched[i] = sched[i] < MAXCOMPONENTS ? sched[i] : 0;\n    }",
        );
    } else if !info.has_stigmergy() {
        template.blank(crate::template::HOLE_SYMBOLIC_SCHEDULER)?;
        template.fill(
            crate::template::HOLE_CONCRETE_SCHEDULER,
            "scheduled = sched[__LABS_step];",
        )?;
        let agents = info.spawn.num_agents();
        let sched: Vec<String> = (0..steps).map(|i| (i % agents).to_string()).collect();
        template.fill(
            crate::template::HOLE_CONCRETE_GLOBALS,
            &format!(
                "TYPEOFAGENTID sched[{}] = {{ {} }};",
                steps,
                sched.join(", ")
            ),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_spec::Info;
    use z3::Config;

    fn ctx() -> Context {
        Context::new(&Config::new())
    }

    #[test]
    fn test_blocking_clause_forces_variation() {
        let info = Info::parse("agent A 0,2\niface 0=x=0..8\n", &[]).unwrap();
        let ctx = ctx();
        let mut c = Concretizer::new(&ctx, &info, 2, false, 42).unwrap();
        let first = c.concretize().unwrap();
        let second = c.concretize().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_fair_round_robin_schedule() {
        let info = Info::parse("agent A 0,4\niface 0=x=0\n", &[]).unwrap();
        let ctx = ctx();
        let mut c = Concretizer::new(&ctx, &info, 8, true, 7).unwrap();
        let m = c.concretize().unwrap();
        assert_eq!(m.sched, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_fair_suppressed_with_stigmergy() {
        let info = Info::parse("agent A 0,3\nlstig 0=pos=0..4\n", &[]).unwrap();
        let ctx = ctx();
        let mut c = Concretizer::new(&ctx, &info, 4, true, 7).unwrap();
        let m = c.concretize().unwrap();
        // Only bounds are guaranteed here
        assert!(m.sched.iter().all(|s| (0..3).contains(s)));
    }

    #[test]
    fn test_assume_constrains_environment() {
        let info = Info::parse(
            "agent A 0,3\niface 0=x=0..2\nenvironment 0=e=0..10\nassume forall A a, e >= 5\n",
            &[],
        )
        .unwrap();
        let ctx = ctx();
        let mut c = Concretizer::new(&ctx, &info, 2, false, 3).unwrap();
        let m = c.concretize().unwrap();
        let e = m.env[0].1;
        assert!((5..10).contains(&e), "e = {}", e);
    }

    #[test]
    fn test_pick_cells_valid() {
        let info = Info::parse(
            "agent A 0,4\niface 0=x=0\npick mate 2 A\n\
             process A Behavior = mate <- pick 2 A; Behavior\n",
            &[],
        )
        .unwrap();
        let ctx = ctx();
        let mut c = Concretizer::new(&ctx, &info, 4, false, 11).unwrap();
        c.add_pick("mate", 2, Some("A")).unwrap();
        let m = c.concretize().unwrap();
        let (_, _, rows) = &m.picks[0];
        for (step, row) in rows.iter().enumerate() {
            let all_zero = row.iter().all(|v| *v == 0);
            if all_zero {
                continue;
            }
            assert_ne!(row[0], row[1], "picks not distinct at step {}", step);
            for v in row {
                assert!((0..4).contains(v));
                assert_ne!(*v, m.sched[step], "agent picked itself at step {}", step);
            }
        }
    }

    #[test]
    fn test_unsatisfiable_assume_fails() {
        let info = Info::parse(
            "agent A 0,2\nenvironment 0=e=0..4\nassume forall A a, e > 9\n",
            &[],
        )
        .unwrap();
        let ctx = ctx();
        let mut c = Concretizer::new(&ctx, &info, 2, false, 3).unwrap();
        assert!(c.concretize().is_err());
    }

    #[test]
    fn test_source_concretization_fills_holes() {
        let program = "\
// ___concrete-globals___
// ___end concrete-globals___
// ___symbolic-scheduler___
scheduled = nondet();
// ___end symbolic-scheduler___
// ___concrete-scheduler___
// ___end concrete-scheduler___
// ___symbolic-pick___
// ___end symbolic-pick___
// ___concrete-init___
// ___end concrete-init___
// ___symbolic-init___
I[0][0] = nondet();
// ___end symbolic-init___
";
        let info = Info::parse("agent A 0,2\niface 0=x=1..5\n", &[]).unwrap();
        let ctx = ctx();
        let mut c = Concretizer::new(&ctx, &info, 2, false, 5).unwrap();
        let model = c.concretize().unwrap();
        let mut t = Template::new(program);
        apply_source_concretization(&mut t, &model, 2).unwrap();
        let text = t.text();
        assert!(text.contains("TYPEOFAGENTID sched[2]"));
        assert!(text.contains("scheduled = sched[__LABS_step];"));
        assert!(!text.contains("scheduled = nondet();"));
        assert!(!text.contains("I[0][0] = nondet();"));
        assert!(text.contains("I[0][0] = "));
    }

    #[test]
    fn test_sat_concretization_free_scheduler() {
        let program = "\
// ___symbolic-scheduler___
scheduled = nondet();
// ___end symbolic-scheduler___
// ___concrete-scheduler___
// ___end concrete-scheduler___
void main(void) { init(); }
";
        let info = Info::parse("agent A 0,2\niface 0=x=0..2\n", &[]).unwrap();
        let mut t = Template::new(program);
        apply_sat_concretization(&mut t, &info, 4, false).unwrap();
        assert!(t.text().contains("TYPEOFAGENTID sched[BOUND];"));
        assert!(t.text().contains("__CPROVER_nondet_int()"));
    }

    #[test]
    fn test_sat_concretization_fair_round_robin() {
        let program = "\
// ___concrete-globals___
// ___end concrete-globals___
// ___symbolic-scheduler___
// ___end symbolic-scheduler___
// ___concrete-scheduler___
// ___end concrete-scheduler___
";
        let info = Info::parse("agent A 0,3\niface 0=x=0..2\n", &[]).unwrap();
        let mut t = Template::new(program);
        apply_sat_concretization(&mut t, &info, 6, true).unwrap();
        assert!(t
            .text()
            .contains("TYPEOFAGENTID sched[6] = { 0, 1, 2, 0, 1, 2 };"));
    }

    #[test]
    fn test_fmt_fragments() {
        let m = ConcreteModel {
            iface: vec![vec![(0, 7)], vec![(0, 0)]],
            lstig: vec![vec![], vec![]],
            env: vec![(0, 5)],
            sched: vec![0, 1],
            picks: vec![("mate".to_string(), 2, vec![vec![1, 2], vec![0, 2]])],
        };
        let globals = m.fmt_globals(2);
        assert!(globals.contains("TYPEOFAGENTID sched[2] = { 0,1 };"));
        assert!(globals.contains("TYPEOFAGENTID mate[2][2] = { { 1,2 }, { 0,2 } };"));
        let inits = m.fmt_inits();
        assert!(inits.contains("I[0][0] = 7;"));
        assert!(!inits.contains("I[1][0]"));
        assert!(inits.contains("E[0] = 5;"));
    }
}
