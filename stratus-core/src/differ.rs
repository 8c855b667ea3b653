//! Differ - Compare desired elements with observed elements to build a ConvergencePlan
//!
//! Elements are matched by their natural key, not by full structural equality,
//! so fields the provider adds on its own (descriptions, generated ids) never
//! cause an element to be removed and re-added. Elements whose key appears in
//! the protected set are never scheduled for removal.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// Identity of an element within one diff domain
pub trait NaturalKey {
    type Key: Eq + Hash + Clone + Debug;

    fn natural_key(&self) -> Self::Key;

    /// Whether `self` (desired) must replace `observed` although both share a key.
    ///
    /// Domains where the key is the whole identity keep the default.
    fn requires_replacement(&self, _observed: &Self) -> bool {
        false
    }
}

/// An observed element that has to be swapped for its desired counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement<T> {
    pub from: T,
    pub to: T,
}

/// Minimal set of operations moving observed state toward desired state
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergencePlan<T> {
    /// Desired, not observed
    pub to_add: Vec<T>,
    /// Observed, not desired, not protected
    pub to_remove: Vec<T>,
    /// Same key on both sides with content that must change
    pub to_replace: Vec<Replacement<T>>,
    /// Same key on both sides, nothing to do
    pub unchanged: Vec<T>,
}

impl<T> Default for ConvergencePlan<T> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
            to_replace: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

impl<T> ConvergencePlan<T> {
    /// Returns true when applying the plan would not call the provider
    pub fn is_converged(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_replace.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            add: self.to_add.len(),
            remove: self.to_remove.len(),
            replace: self.to_replace.len(),
            unchanged: self.unchanged.len(),
        }
    }

    /// Elements that have to be taken away, including the old side of replacements
    pub fn removals(&self) -> impl Iterator<Item = &T> {
        self.to_remove
            .iter()
            .chain(self.to_replace.iter().map(|r| &r.from))
    }

    /// Elements that have to be put in place, including the new side of replacements
    pub fn additions(&self) -> impl Iterator<Item = &T> {
        self.to_add.iter().chain(self.to_replace.iter().map(|r| &r.to))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub add: usize,
    pub remove: usize,
    pub replace: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to remove, {} to replace, {} unchanged",
            self.add, self.remove, self.replace, self.unchanged
        )
    }
}

/// Keep the first element for every key
fn dedup_by_key<T: NaturalKey>(elements: &[T]) -> Vec<(T::Key, &T)> {
    let mut seen = HashSet::new();
    elements
        .iter()
        .filter_map(|e| {
            let key = e.natural_key();
            seen.insert(key.clone()).then_some((key, e))
        })
        .collect()
}

/// Compute the convergence plan for one domain
pub fn compute_convergence<T>(desired: &[T], observed: &[T], protected: &[T]) -> ConvergencePlan<T>
where
    T: NaturalKey + Clone,
{
    let protected: HashSet<T::Key> = protected.iter().map(NaturalKey::natural_key).collect();
    let desired = dedup_by_key(desired);
    let observed = dedup_by_key(observed);

    let observed_by_key: HashMap<&T::Key, &T> = observed.iter().map(|(k, e)| (k, *e)).collect();
    let desired_keys: HashSet<&T::Key> = desired.iter().map(|(k, _)| k).collect();

    let mut plan = ConvergencePlan::default();

    for (key, wanted) in &desired {
        match observed_by_key.get(key) {
            Some(current) if wanted.requires_replacement(current) => {
                plan.to_replace.push(Replacement {
                    from: (*current).clone(),
                    to: (*wanted).clone(),
                });
            }
            Some(_) => plan.unchanged.push((*wanted).clone()),
            None => plan.to_add.push((*wanted).clone()),
        }
    }

    for (key, current) in &observed {
        if !desired_keys.contains(key) && !protected.contains(key) {
            plan.to_remove.push((*current).clone());
        }
    }

    plan
}
