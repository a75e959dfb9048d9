//! Generic old/new comparison helpers.
//!
//! Only enforced on UPDATE. Each helper appends to an [`ErrorList`] rather
//! than returning early so one pass reports every forbidden change.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use serde::Serialize;

use crate::webhooks::field::{ErrorList, FieldError, FieldPath};

pub const IMMUTABLE: &str = "field is immutable";

/// Hard immutable: any difference is an error.
pub fn immutable<T>(errs: &mut ErrorList, path: FieldPath, old: &T, new: &T)
where
    T: PartialEq + Serialize + ?Sized,
{
    if old != new {
        errs.push(FieldError::invalid(path, new, IMMUTABLE));
    }
}

/// Immutable once set: unset to anything is allowed, anything else must match.
pub fn immutable_once_set<T>(
    errs: &mut ErrorList,
    path: FieldPath,
    old: &Option<T>,
    new: &Option<T>,
) where
    T: PartialEq + Serialize,
{
    if old.is_some() && old != new {
        errs.push(FieldError::invalid(path, new, "field is immutable once set"));
    }
}

/// One-directional: the only permitted change is unset to `sentinel`.
pub fn one_directional<T>(
    errs: &mut ErrorList,
    path: FieldPath,
    old: &Option<T>,
    new: &Option<T>,
    sentinel: &T,
) where
    T: PartialEq + Serialize,
{
    let allowed = old == new || (old.is_none() && new.as_ref() == Some(sentinel));
    if !allowed {
        errs.push(FieldError::invalid(path, new, IMMUTABLE));
    }
}

/// Unordered comparison, for lists whose order carries no meaning.
pub fn immutable_set<T>(errs: &mut ErrorList, path: FieldPath, old: &[T], new: &[T])
where
    T: Ord + Serialize,
{
    let old_set: BTreeSet<&T> = old.iter().collect();
    let new_set: BTreeSet<&T> = new.iter().collect();
    if old_set != new_set {
        errs.push(FieldError::invalid(path, new, IMMUTABLE));
    }
}

/// Compare a keyed collection item by item.
///
/// `compare` runs for every key present on both sides, with the path of the
/// item in `new`. Added and removed keys are left to the caller.
pub fn keyed<T, K, F, C>(
    errs: &mut ErrorList,
    path: FieldPath,
    old: &[T],
    new: &[T],
    key: F,
    mut compare: C,
) where
    K: Eq + Hash,
    F: Fn(&T) -> K,
    C: FnMut(&mut ErrorList, FieldPath, &T, &T),
{
    let old_by_key: HashMap<K, &T> = old.iter().map(|item| (key(item), item)).collect();
    for (i, item) in new.iter().enumerate() {
        if let Some(previous) = old_by_key.get(&key(item)) {
            compare(errs, path.index(i), previous, item);
        }
    }
}
