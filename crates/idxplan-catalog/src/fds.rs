//! Functional dependencies over table column ids
//!
//! A strict key determines at most one row. A lax key does so only among rows
//! where every key column is non-null. Constant columns are pinned to a single
//! value by the filter.

use idxplan_common::IdSet;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuncDepSet {
    all: IdSet,
    not_null: IdSet,
    consts: IdSet,
    strict_keys: Vec<IdSet>,
    lax_keys: Vec<IdSet>,
}

impl FuncDepSet {
    /// Dependencies of a plain table scan
    pub fn new_tablescan_fds(
        all: IdSet,
        not_null: IdSet,
        strict_keys: Vec<IdSet>,
        lax_keys: Vec<IdSet>,
    ) -> Self {
        let mut fds = Self {
            all,
            not_null,
            consts: IdSet::new(),
            strict_keys,
            lax_keys,
        };
        fds.normalize();
        fds
    }

    /// Dependencies after pinning `consts` through equality lookups
    pub fn new_lookup_fds(base: &FuncDepSet, consts: &IdSet) -> Self {
        let consts = base.consts.union(consts);
        // equality against a constant rejects NULL
        let not_null = base.not_null.union(&consts);

        let mut strict_keys: Vec<IdSet> = base
            .strict_keys
            .iter()
            .map(|k| k.difference(&consts))
            .collect();
        let mut lax_keys = Vec::new();
        for key in &base.lax_keys {
            let reduced = key.difference(&consts);
            if key.is_subset_of(&not_null) {
                strict_keys.push(reduced);
            } else {
                lax_keys.push(reduced);
            }
        }

        let mut fds = Self {
            all: base.all.clone(),
            not_null,
            consts,
            strict_keys,
            lax_keys,
        };
        fds.normalize();
        fds
    }

    /// Sorts keys shortest first and drops keys implied by a shorter one
    fn normalize(&mut self) {
        let key_order = |a: &IdSet, b: &IdSet| {
            a.len()
                .cmp(&b.len())
                .then_with(|| a.iter().cmp(b.iter()))
        };
        self.strict_keys.sort_by(key_order);
        self.strict_keys.dedup();
        let mut kept: Vec<IdSet> = Vec::new();
        for key in self.strict_keys.drain(..) {
            if !kept.iter().any(|k| k.is_subset_of(&key)) {
                kept.push(key);
            }
        }
        self.strict_keys = kept;

        self.lax_keys.sort_by(key_order);
        self.lax_keys.dedup();
        let strict = &self.strict_keys;
        self.lax_keys
            .retain(|lax| !strict.iter().any(|k| k.is_subset_of(lax)));
    }

    /// The filter returns at most one row
    pub fn has_max1_row(&self) -> bool {
        self.strict_keys.first().is_some_and(IdSet::is_empty)
    }

    /// Shortest strict key
    pub fn strict_key(&self) -> Option<&IdSet> {
        self.strict_keys.first()
    }

    /// Shortest lax key
    pub fn lax_key(&self) -> Option<&IdSet> {
        self.lax_keys.first()
    }

    pub fn constants(&self) -> &IdSet {
        &self.consts
    }

    pub fn not_null(&self) -> &IdSet {
        &self.not_null
    }

    pub fn all(&self) -> &IdSet {
        &self.all
    }
}

impl fmt::Display for FuncDepSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.consts.is_empty() {
            parts.push(format!("constant{}", self.consts));
        }
        for k in &self.strict_keys {
            parts.push(format!("key{k}"));
        }
        for k in &self.lax_keys {
            parts.push(format!("lax-key{k}"));
        }
        write!(f, "{}", parts.join("; "))
    }
}
