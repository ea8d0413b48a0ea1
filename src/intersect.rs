//! Excess-field accounting across intersection components.
//!
//! While one intersection check runs, each struct/object-map component claims
//! the field names it knows about instead of rejecting strangers on the spot.
//! Claims are grouped per concrete object (fields may be claimed at any depth
//! reached through nested unions/intersections), and a single combined check
//! runs once at the outermost intersection.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Failure;
use crate::value::{Value, json_quote};

/// Live only for the duration of one intersection check invocation; never
/// shared between check invocations, so checking stays reentrant.
pub struct IntersectionContext<'v> {
    claims: RefCell<Vec<Claim<'v>>>,
}

struct Claim<'v> {
    object: &'v IndexMap<String, Value>,
    claimed: Vec<Rc<BTreeSet<String>>>,
}

impl<'v> IntersectionContext<'v> {
    pub fn new() -> Self {
        IntersectionContext { claims: RefCell::new(Vec::new()) }
    }

    /// Record that `fields` are legitimate on `object`. Claims for the same
    /// object (by address) accumulate.
    pub fn claim(&self, object: &'v IndexMap<String, Value>, fields: Rc<BTreeSet<String>>) {
        let mut claims = self.claims.borrow_mut();
        for claim in claims.iter_mut() {
            if std::ptr::eq(claim.object, object) {
                claim.claimed.push(fields);
                return;
            }
        }
        claims.push(Claim { object, claimed: vec![fields] });
    }

    /// Fold a nested intersection's claims into this one.
    pub fn absorb(&self, child: IntersectionContext<'v>) {
        let mut claims = self.claims.borrow_mut();
        for incoming in child.claims.into_inner() {
            let existing = claims
                .iter_mut()
                .find(|claim| std::ptr::eq(claim.object, incoming.object));
            match existing {
                Some(claim) => claim.claimed.extend(incoming.claimed),
                None => claims.push(incoming),
            }
        }
    }

    /// The combined excess-field check: every key of every registered object
    /// must be claimed by at least one component.
    pub fn check(&self) -> Option<Failure> {
        for claim in self.claims.borrow().iter() {
            for (key, value) in claim.object {
                let known = claim.claimed.iter().any(|set| set.contains(key));
                if !known {
                    return Some(
                        Failure::new(value, format!("!claimed_fields.has({})", json_quote(key)))
                            .push_field(key.clone()),
                    );
                }
            }
        }
        None
    }
}

impl Default for IntersectionContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Direct excess-field check used when no intersection context is active.
pub(crate) fn check_no_extra_fields(
    object: &IndexMap<String, Value>,
    known: &BTreeSet<String>,
    set_name: &str,
) -> Option<Failure> {
    for (key, value) in object {
        if !known.contains(key) {
            return Some(
                Failure::new(value, format!("!{set_name}.has({})", json_quote(key)))
                    .push_field(key.clone()),
            );
        }
    }
    None
}
