//! In-memory fact store with per-column value indexes.
//!
//! Every relation keeps:
//! - rows in insertion order (stable iteration for a given input),
//! - `row -> id` for duplicate suppression and membership tests,
//! - one `value -> {row ids}` index per column.
//!
//! Lookups pick the most selective bound column and filter the remaining
//! bound positions by scanning that bucket.

use std::collections::{BTreeMap, HashMap};

use faultline_dsl::{Fact, Value};

#[derive(Debug, Clone)]
pub struct Relation {
    arity: usize,
    rows: Vec<Vec<Value>>,
    row_ids: HashMap<Vec<Value>, usize>,
    columns: Vec<HashMap<Value, Vec<usize>>>,
}

impl Relation {
    pub fn new(arity: usize) -> Self {
        Self {
            arity,
            rows: Vec::new(),
            row_ids: HashMap::new(),
            columns: vec![HashMap::new(); arity],
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn contains(&self, row: &[Value]) -> bool {
        self.row_ids.contains_key(row)
    }

    /// Insert a row; returns `false` if it was already present.
    pub fn insert(&mut self, row: Vec<Value>) -> bool {
        debug_assert_eq!(row.len(), self.arity);
        if self.row_ids.contains_key(&row) {
            return false;
        }
        let id = self.rows.len();
        for (col, value) in row.iter().enumerate() {
            self.columns[col].entry(value.clone()).or_default().push(id);
        }
        self.row_ids.insert(row.clone(), id);
        self.rows.push(row);
        true
    }

    /// Rows whose bound positions (`Some`) equal the given values.
    pub fn select<'a>(&'a self, bound: &[Option<&Value>]) -> Vec<&'a [Value]> {
        if bound.len() != self.arity {
            return Vec::new();
        }

        let mut best: Option<&Vec<usize>> = None;
        for (col, value) in bound.iter().enumerate() {
            let Some(value) = value else {
                continue;
            };
            let Some(bucket) = self.columns[col].get(*value) else {
                return Vec::new();
            };
            if best.map_or(true, |b| bucket.len() < b.len()) {
                best = Some(bucket);
            }
        }

        let matches = |row: &[Value]| {
            bound
                .iter()
                .zip(row)
                .all(|(want, got)| want.map_or(true, |w| w == got))
        };

        match best {
            Some(ids) => ids
                .iter()
                .map(|&id| self.rows[id].as_slice())
                .filter(|row| matches(*row))
                .collect(),
            None => self.rows().collect(),
        }
    }

    /// `true` if any row matches the bound positions.
    pub fn any(&self, bound: &[Option<&Value>]) -> bool {
        if bound.iter().all(Option::is_some) {
            let row: Vec<Value> = bound.iter().filter_map(|v| v.cloned()).collect();
            return self.contains(&row);
        }
        !self.select(bound).is_empty()
    }
}

/// Relations keyed by predicate name.
#[derive(Debug, Default, Clone)]
pub struct FactStore {
    relations: BTreeMap<String, Relation>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(&self, predicate: &str) -> Option<&Relation> {
        self.relations.get(predicate)
    }

    pub fn insert(&mut self, predicate: &str, row: Vec<Value>) -> bool {
        match self.relations.get_mut(predicate) {
            Some(rel) => rel.insert(row),
            None => {
                let mut rel = Relation::new(row.len());
                rel.insert(row);
                self.relations.insert(predicate.to_string(), rel);
                true
            }
        }
    }

    pub fn insert_fact(&mut self, fact: &Fact) -> bool {
        self.insert(&fact.predicate, fact.args.clone())
    }

    pub fn contains(&self, predicate: &str, row: &[Value]) -> bool {
        self.relation(predicate).is_some_and(|r| r.contains(row))
    }

    /// Total number of stored facts across all predicates.
    pub fn len(&self) -> usize {
        self.relations.values().map(Relation::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.values().all(Relation::is_empty)
    }

    /// Every stored fact, grouped by predicate name and then in insertion order.
    pub fn facts(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.relations
            .iter()
            .flat_map(|(name, rel)| rel.rows().map(move |row| (name.as_str(), row)))
    }

    /// Predicate names with their arities, sorted by name.
    pub fn predicates(&self) -> impl Iterator<Item = (&str, usize)> {
        self.relations
            .iter()
            .map(|(name, rel)| (name.as_str(), rel.arity()))
    }
}
