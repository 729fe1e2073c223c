//! Semi-naive fixpoint evaluation over an [`AnalyzedProgram`].
//!
//! Each stratum runs one full round over every rule, then delta rounds in
//! which each recursive rule is re-run once per recursive body atom with that
//! atom reading only the facts derived in the previous round.

use std::collections::BTreeSet;
use std::time::Instant;

use faultline_dsl::Value;
use tracing::debug;

use crate::program::{AnalyzedProgram, CompiledRule, Filter, Slot, Stratum};
use crate::store::FactStore;
use crate::{Closure, EvalError, Interrupt, Program, RuleEvaluator};

/// Poll the interrupt once per this many candidate rows inside a join.
const INTERRUPT_STRIDE: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalLimits {
    /// Maximum number of facts the rules may derive on top of the base facts.
    pub max_derived_facts: Option<usize>,
}

/// The built-in [`RuleEvaluator`].
#[derive(Debug, Clone, Default)]
pub struct SemiNaiveEvaluator {
    limits: EvalLimits,
}

impl SemiNaiveEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: EvalLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> EvalLimits {
        self.limits
    }

    pub fn evaluate_analyzed(
        &self,
        program: &AnalyzedProgram,
        interrupt: &dyn Interrupt,
    ) -> Result<Closure, EvalError> {
        let started = Instant::now();
        let mut store = FactStore::new();
        for fact in &program.facts {
            store.insert_fact(fact);
        }

        let mut derived = 0usize;
        for (level, stratum) in program.strata.iter().enumerate() {
            if interrupt.is_interrupted() {
                return Err(EvalError::Interrupted);
            }
            let rounds = self.evaluate_stratum(stratum, &mut store, &mut derived, interrupt)?;
            debug!(
                stratum = level,
                rules = stratum.rules.len(),
                rounds,
                derived,
                "stratum reached fixpoint"
            );
        }

        debug!(
            base_facts = program.facts.len(),
            derived,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluation finished"
        );
        Ok(Closure::new(store, program.arities.clone()))
    }

    fn evaluate_stratum(
        &self,
        stratum: &Stratum,
        store: &mut FactStore,
        derived: &mut usize,
        interrupt: &dyn Interrupt,
    ) -> Result<usize, EvalError> {
        let empty = FactStore::new();

        let mut fresh = FactStore::new();
        for rule in &stratum.rules {
            if interrupt.is_interrupted() {
                return Err(EvalError::Interrupted);
            }
            let plan = Plan::new(rule, None);
            self.join(store, &empty, interrupt, *derived)
                .run(&plan, &mut fresh)?;
        }
        let mut delta = absorb(store, fresh, derived);
        let mut rounds = 1;

        let recursive: Vec<(&CompiledRule, Vec<usize>)> = stratum
            .rules
            .iter()
            .map(|rule| (rule, rule.recursive_positions(&stratum.predicates)))
            .filter(|(_, positions)| !positions.is_empty())
            .collect();

        while !delta.is_empty() {
            let mut fresh = FactStore::new();
            for (rule, positions) in &recursive {
                for &position in positions {
                    if interrupt.is_interrupted() {
                        return Err(EvalError::Interrupted);
                    }
                    let plan = Plan::new(*rule, Some(position));
                    self.join(store, &delta, interrupt, *derived)
                        .run(&plan, &mut fresh)?;
                }
            }
            delta = absorb(store, fresh, derived);
            rounds += 1;
        }
        Ok(rounds)
    }

    fn join<'a>(
        &self,
        full: &'a FactStore,
        delta: &'a FactStore,
        interrupt: &'a dyn Interrupt,
        derived: usize,
    ) -> Join<'a> {
        Join {
            full,
            delta,
            interrupt,
            ticks: 0,
            limit: self.limits.max_derived_facts,
            derived,
        }
    }
}

/// Move one round's new facts into `store`; they become the next delta.
fn absorb(store: &mut FactStore, fresh: FactStore, derived: &mut usize) -> FactStore {
    for (predicate, row) in fresh.facts() {
        store.insert(predicate, row.to_vec());
    }
    *derived += fresh.len();
    fresh
}

impl RuleEvaluator for SemiNaiveEvaluator {
    fn evaluate(&self, program: &Program, interrupt: &dyn Interrupt) -> Result<Closure, EvalError> {
        let analyzed = program.analyze()?;
        self.evaluate_analyzed(&analyzed, interrupt)
    }
}

// ============================================================================
// Join plans
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Full,
    Delta,
}

/// Atom order for one rule variant, plus which filters become checkable
/// after each prefix of that order is bound.
struct Plan<'r> {
    rule: &'r CompiledRule,
    order: Vec<(usize, Source)>,
    ready: Vec<Vec<usize>>,
}

impl<'r> Plan<'r> {
    fn new(rule: &'r CompiledRule, delta_at: Option<usize>) -> Self {
        let mut order = Vec::with_capacity(rule.positives.len());
        if let Some(i) = delta_at {
            order.push((i, Source::Delta));
        }
        order.extend(
            (0..rule.positives.len())
                .filter(|i| Some(*i) != delta_at)
                .map(|i| (i, Source::Full)),
        );

        let mut ready = vec![Vec::new(); order.len() + 1];
        let mut placed = vec![false; rule.filters.len()];
        let mut bound: BTreeSet<usize> = BTreeSet::new();
        for (depth, checks) in ready.iter_mut().enumerate() {
            for (f, filter) in rule.filters.iter().enumerate() {
                if !placed[f] && filter.vars().iter().all(|v| bound.contains(v)) {
                    placed[f] = true;
                    checks.push(f);
                }
            }
            if let Some((atom, _)) = order.get(depth) {
                bound.extend(rule.positives[*atom].slots.iter().filter_map(|s| match s {
                    Slot::Var(i) => Some(*i),
                    _ => None,
                }));
            }
        }

        Self { rule, order, ready }
    }
}

/// Backtracking join for one plan. New head rows go into the round's
/// `out` store, which must stay within `limit` together with `derived`.
struct Join<'a> {
    full: &'a FactStore,
    delta: &'a FactStore,
    interrupt: &'a dyn Interrupt,
    ticks: usize,
    limit: Option<usize>,
    derived: usize,
}

impl Join<'_> {
    fn run(&mut self, plan: &Plan<'_>, out: &mut FactStore) -> Result<(), EvalError> {
        let mut bindings: Vec<Option<Value>> = vec![None; plan.rule.var_count];
        self.step(plan, 0, &mut bindings, out)
    }

    fn step(
        &mut self,
        plan: &Plan<'_>,
        depth: usize,
        bindings: &mut [Option<Value>],
        out: &mut FactStore,
    ) -> Result<(), EvalError> {
        for &f in &plan.ready[depth] {
            if !self.filter_holds(&plan.rule.filters[f], bindings) {
                return Ok(());
            }
        }

        let Some(&(index, source)) = plan.order.get(depth) else {
            let head = &plan.rule.head;
            let row = head
                .slots
                .iter()
                .map(|slot| resolve(slot, bindings).cloned())
                .collect::<Option<Vec<_>>>();
            if let Some(row) = row {
                self.emit(plan.rule, row, out)?;
            }
            return Ok(());
        };

        let atom = &plan.rule.positives[index];
        let store = match source {
            Source::Full => self.full,
            Source::Delta => self.delta,
        };
        let Some(relation) = store.relation(&atom.predicate) else {
            return Ok(());
        };

        let key: Vec<Option<Value>> = atom
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Wildcard => None,
                other => resolve(other, bindings).cloned(),
            })
            .collect();
        let key: Vec<Option<&Value>> = key.iter().map(Option::as_ref).collect();

        for row in relation.select(&key) {
            self.ticks += 1;
            if self.ticks % INTERRUPT_STRIDE == 0 && self.interrupt.is_interrupted() {
                return Err(EvalError::Interrupted);
            }

            let mut newly_bound = Vec::new();
            let mut consistent = true;
            for (slot, value) in atom.slots.iter().zip(row) {
                let Slot::Var(i) = slot else {
                    continue;
                };
                match &bindings[*i] {
                    Some(existing) if existing != value => {
                        consistent = false;
                        break;
                    }
                    Some(_) => {}
                    None => {
                        bindings[*i] = Some(value.clone());
                        newly_bound.push(*i);
                    }
                }
            }

            if consistent {
                self.step(plan, depth + 1, bindings, out)?;
            }
            for i in newly_bound {
                bindings[i] = None;
            }
        }
        Ok(())
    }

    fn emit(
        &self,
        rule: &CompiledRule,
        row: Vec<Value>,
        out: &mut FactStore,
    ) -> Result<(), EvalError> {
        let predicate = rule.head.predicate.as_str();
        if self.full.contains(predicate, &row) || !out.insert(predicate, row) {
            return Ok(());
        }
        match self.limit {
            Some(limit) if self.derived + out.len() > limit => {
                debug!(rule = %rule.text, limit, "fact limit reached inside join");
                Err(EvalError::FactLimitExceeded { limit })
            }
            _ => Ok(()),
        }
    }

    fn filter_holds(&self, filter: &Filter, bindings: &[Option<Value>]) -> bool {
        match filter {
            Filter::Absent(atom) => {
                let key: Vec<Option<&Value>> = atom
                    .slots
                    .iter()
                    .map(|slot| match slot {
                        Slot::Wildcard => None,
                        other => resolve(other, bindings),
                    })
                    .collect();
                !self
                    .full
                    .relation(&atom.predicate)
                    .is_some_and(|relation| relation.any(&key))
            }
            Filter::Compare { op, left, right } => {
                match (resolve(left, bindings), resolve(right, bindings)) {
                    (Some(l), Some(r)) => op.holds(l, r),
                    _ => false,
                }
            }
        }
    }
}

fn resolve<'v>(slot: &'v Slot, bindings: &'v [Option<Value>]) -> Option<&'v Value> {
    match slot {
        Slot::Const(value) => Some(value),
        Slot::Var(i) => bindings.get(*i).and_then(Option::as_ref),
        Slot::Wildcard => None,
    }
}
