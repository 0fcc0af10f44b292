// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Index multisets and term enumeration.
//!
//! A multiset of variable indices is stored sorted, so `[1, 0]` and `[0, 1]`
//! are the same key. Ordered Dyson labels are plain `Vec<usize>`.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Multiset of non-negative indices in canonical (non-decreasing) order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct Multiset(Vec<usize>);

impl Multiset {
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        Self(indices)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Number of elements counted with multiplicity.
    pub fn order(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Number of occurrences of `index`.
    pub fn count(&self, index: usize) -> usize {
        self.0.iter().filter(|&&i| i == index).count()
    }

    /// Distinct elements in increasing order.
    pub fn distinct(&self) -> Vec<usize> {
        let mut out = self.0.clone();
        out.dedup();
        out
    }

    pub fn is_submultiset_of(&self, other: &Multiset) -> bool {
        self.distinct()
            .into_iter()
            .all(|i| self.count(i) <= other.count(i))
    }

    /// `self \ other`, or `None` if `other` is not contained in `self`.
    pub fn difference(&self, other: &Multiset) -> Option<Multiset> {
        let mut remaining = self.0.clone();
        for &i in &other.0 {
            let pos = remaining.iter().position(|&j| j == i)?;
            remaining.remove(pos);
        }
        Some(Multiset(remaining))
    }

    /// Multiset sum.
    pub fn union(&self, other: &Multiset) -> Multiset {
        let mut out = self.0.clone();
        out.extend_from_slice(&other.0);
        Multiset::new(out)
    }

    /// All non-empty sub-multisets, including `self`.
    pub fn submultisets(&self) -> Vec<Multiset> {
        let distinct = self.distinct();
        let counts: Vec<usize> = distinct.iter().map(|&i| self.count(i)).collect();
        let mut out = Vec::new();
        let mut choice = vec![0usize; distinct.len()];
        loop {
            // odometer over multiplicities
            let mut k = 0;
            while k < choice.len() && choice[k] == counts[k] {
                choice[k] = 0;
                k += 1;
            }
            if k == choice.len() {
                break;
            }
            choice[k] += 1;
            let mut elements = Vec::new();
            for (idx, &n) in distinct.iter().zip(&choice) {
                elements.extend(std::iter::repeat(*idx).take(n));
            }
            out.push(Multiset(elements));
        }
        out.sort_by(canonical_cmp);
        out
    }

    /// Exponents of each variable, for `num_vars` variables.
    pub fn powers(&self, num_vars: usize) -> Vec<usize> {
        let mut powers = vec![0; num_vars];
        for &i in &self.0 {
            if i < num_vars {
                powers[i] += 1;
            }
        }
        powers
    }
}

impl From<Vec<usize>> for Multiset {
    fn from(indices: Vec<usize>) -> Self {
        Multiset::new(indices)
    }
}

impl From<Multiset> for Vec<usize> {
    fn from(m: Multiset) -> Self {
        m.0
    }
}

impl fmt::Display for Multiset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl PartialOrd for Multiset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Multiset {
    fn cmp(&self, other: &Self) -> Ordering {
        canonical_cmp(self, other)
    }
}

fn canonical_cmp(a: &Multiset, b: &Multiset) -> Ordering {
    label_cmp(&a.0, &b.0)
}

/// Canonical label order: by length, then lexicographically.
pub fn label_cmp(a: &[usize], b: &[usize]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// All ordered `k`-tuples over `indices` with repetition, lexicographic.
pub fn ordered_terms(indices: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::new()];
    for _ in 0..k {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                indices.iter().map(move |&i| {
                    let mut next = prefix.clone();
                    next.push(i);
                    next
                })
            })
            .collect();
    }
    out
}

/// All `k`-multisets over `indices`, lexicographic.
pub fn combinations_with_replacement(indices: &[usize], k: usize) -> Vec<Multiset> {
    fn extend(indices: &[usize], start: usize, k: usize, prefix: &mut Vec<usize>, out: &mut Vec<Multiset>) {
        if prefix.len() == k {
            out.push(Multiset(prefix.clone()));
            return;
        }
        for pos in start..indices.len() {
            prefix.push(indices[pos]);
            extend(indices, pos, k, prefix, out);
            prefix.pop();
        }
    }
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut out = Vec::new();
    extend(&sorted, 0, k, &mut Vec::with_capacity(k), &mut out);
    out
}

/// Canonicalize and deduplicate multisets, keeping first-seen order.
pub fn clean_index_multisets(multisets: &[Vec<usize>]) -> Vec<Multiset> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for m in multisets {
        let m = Multiset::new(m.clone());
        if seen.insert(m.clone()) {
            out.push(m);
        }
    }
    out
}

/// Dyson labels plus every suffix they need, sorted canonically.
pub fn complete_dyson_terms(terms: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut set = BTreeSet::new();
    for term in terms {
        for start in 0..term.len() {
            set.insert(term[start..].to_vec());
        }
    }
    let mut out: Vec<Vec<usize>> = set.into_iter().collect();
    out.sort_by(|a, b| label_cmp(a, b));
    out
}

/// Multisets plus every non-empty sub-multiset, sorted canonically.
pub fn complete_symmetric_terms(terms: &[Multiset]) -> Vec<Multiset> {
    let mut set = BTreeSet::new();
    for term in terms {
        set.extend(term.submultisets());
    }
    set.into_iter().collect()
}

/// Number of `k`-multisets over `r` symbols, `C(r + k − 1, k)`.
pub fn multiset_count(r: usize, k: usize) -> usize {
    if k == 0 {
        return 1;
    }
    if r == 0 {
        return 0;
    }
    let mut num: u128 = 1;
    for i in 0..k {
        num = num * (r + i) as u128 / (i + 1) as u128;
    }
    num as usize
}
