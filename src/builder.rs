//! Build orchestration.
//!
//! One `ValidatorBuilder` per option set. It owns all caches: raw checks by
//! descriptor identity, the in-progress set used for cycle detection, and the
//! two wrapped forms handed to callers. Cycles are broken with a proxy slot:
//! a re-entered node gets a forwarder whose target cell is filled when the
//! original build completes. A failed top-level build evicts everything it
//! cached, so no stale forwarder can survive into a later request.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Failure, ValidationError};
use crate::fragments::{Check, check_fn};
use crate::generate::Generator;
use crate::types::{TypeKey, TypeRef};
use crate::value::Value;

// ------------------------------- Options ---------------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFieldPolicy {
    #[default]
    ValidationError,
    AllowAnything,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    #[default]
    ValidationError,
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassInstancePolicy {
    #[default]
    CheckByInstanceof,
    ThrowOnBuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ValidatorOptions {
    #[serde(default)]
    pub on_unknown_field_in_object: UnknownFieldPolicy,
    #[serde(default)]
    pub on_nan_when_expected_number: NanPolicy,
    #[serde(default)]
    pub on_class_instance: ClassInstancePolicy,
}

// ----------------------------- Wrapped forms ------------------------------- //

/// `Ok(())` on a valid value, the first mismatch otherwise.
pub type AssertingValidator = Rc<dyn Fn(&Value) -> Result<(), ValidationError>>;

/// `None` on a valid value, the first mismatch otherwise.
pub type ReportingValidator = Rc<dyn Fn(&Value) -> Option<ValidationError>>;

fn wrap_asserting(raw: Check) -> AssertingValidator {
    Rc::new(move |value| match raw(value, None) {
        None => Ok(()),
        Some(failure) => Err(ValidationError::from_failure(failure, value)),
    })
}

fn wrap_reporting(raw: Check) -> ReportingValidator {
    Rc::new(move |value| {
        raw(value, None).map(|failure| ValidationError::from_failure(failure, value))
    })
}

// ------------------------------- Builder ----------------------------------- //

type ProxySlot = Rc<OnceCell<Check>>;

fn forwarder(slot: ProxySlot) -> Check {
    check_fn(move |value, ctx| match slot.get() {
        Some(check) => check(value, ctx),
        // unreachable once the originating build has completed
        None => Some(Failure::new(value, "<validator is still being built>")),
    })
}

pub struct ValidatorBuilder {
    opts: ValidatorOptions,
    raw: RefCell<HashMap<TypeKey, Check>>,
    /// `None` until re-entry is detected; then the proxy slot to fill.
    in_progress: RefCell<HashMap<TypeKey, Option<ProxySlot>>>,
    /// Raw entries added during the current top-level request, for eviction
    /// when the request fails.
    pass_added: RefCell<Vec<TypeKey>>,
    asserting: RefCell<HashMap<TypeKey, AssertingValidator>>,
    reporting: RefCell<HashMap<TypeKey, ReportingValidator>>,
}

impl ValidatorBuilder {
    pub fn new(opts: ValidatorOptions) -> Self {
        ValidatorBuilder {
            opts,
            raw: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashMap::new()),
            pass_added: RefCell::new(Vec::new()),
            asserting: RefCell::new(HashMap::new()),
            reporting: RefCell::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> ValidatorOptions {
        self.opts
    }

    pub fn build_asserting(&self, ty: &TypeRef) -> Result<AssertingValidator, BuildError> {
        self.build_wrap_cached(ty, &self.asserting, wrap_asserting)
    }

    pub fn build_reporting(&self, ty: &TypeRef) -> Result<ReportingValidator, BuildError> {
        self.build_wrap_cached(ty, &self.reporting, wrap_reporting)
    }

    fn build_wrap_cached<T: Clone>(
        &self,
        ty: &TypeRef,
        cache: &RefCell<HashMap<TypeKey, T>>,
        wrap: impl FnOnce(Check) -> T,
    ) -> Result<T, BuildError> {
        let key = TypeKey::new(ty);
        if let Some(wrapped) = cache.borrow().get(&key) {
            return Ok(wrapped.clone());
        }

        let built = self.build_internal(ty);
        // a top-level request leaves no in-progress state behind either way
        self.in_progress.borrow_mut().clear();
        match built {
            Ok(raw) => {
                self.pass_added.borrow_mut().clear();
                let wrapped = wrap(raw);
                cache.borrow_mut().insert(key, wrapped.clone());
                Ok(wrapped)
            }
            Err(err) => {
                let mut raw_cache = self.raw.borrow_mut();
                for added in self.pass_added.borrow_mut().drain(..) {
                    raw_cache.remove(&added);
                }
                Err(err)
            }
        }
    }

    /// Raw check for one node: cached, in-progress (cycle), or freshly built.
    pub(crate) fn build_internal(&self, ty: &TypeRef) -> Result<Check, BuildError> {
        let key = TypeKey::new(ty);
        if let Some(check) = self.raw.borrow().get(&key) {
            return Ok(check.clone());
        }

        {
            let mut in_progress = self.in_progress.borrow_mut();
            if let Some(slot) = in_progress.get_mut(&key) {
                let proxy = slot.get_or_insert_with(|| Rc::new(OnceCell::new())).clone();
                return Ok(forwarder(proxy));
            }
            in_progress.insert(key.clone(), None);
        }

        let built = Generator::new(self).build(ty, true);

        let proxy = self.in_progress.borrow_mut().remove(&key).flatten();
        let check = built?;
        if let Some(slot) = proxy {
            let _ = slot.set(check.clone());
        }
        self.raw.borrow_mut().insert(key.clone(), check.clone());
        self.pass_added.borrow_mut().push(key);
        Ok(check)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Type};
    use crate::value::{ClassTag, Value};
    use indexmap::IndexMap;

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    #[test]
    fn wrapped_validators_are_cached_per_descriptor_identity() {
        let builder = ValidatorBuilder::new(ValidatorOptions::default());
        let ty = Type::struct_of([("a", Field::of(Type::number()))]).rc();
        let first = builder.build_reporting(&ty).unwrap();
        let second = builder.build_reporting(&ty).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        // a structurally identical but distinct descriptor builds separately
        let other = Type::struct_of([("a", Field::of(Type::number()))]).rc();
        let third = builder.build_reporting(&other).unwrap();
        assert!(!Rc::ptr_eq(&first, &third));
    }

    #[test]
    fn asserting_and_reporting_forms_agree() {
        let builder = ValidatorBuilder::new(ValidatorOptions::default());
        let ty = Type::string().rc();
        let asserting = builder.build_asserting(&ty).unwrap();
        let reporting = builder.build_reporting(&ty).unwrap();
        assert!(asserting(&Value::from("ok")).is_ok());
        assert!(reporting(&Value::from("ok")).is_none());
        let err = asserting(&Value::from(1i64)).unwrap_err();
        let reported = reporting(&Value::from(1i64)).expect("mismatch");
        assert_eq!(err.expression, reported.expression);
    }

    #[test]
    fn recursive_descriptors_build_and_check() {
        let slot: Rc<OnceCell<crate::types::TypeRef>> = Rc::new(OnceCell::new());
        let resolver_slot = slot.clone();
        let node = Type::struct_of([
            ("value", Field::of(Type::number())),
            (
                "next",
                Field::optional(Type::recursive(move || {
                    resolver_slot.get().expect("node descriptor set").clone()
                })),
            ),
        ])
        .named("list_node")
        .rc();
        slot.set(node.clone()).ok().expect("slot set once");

        let builder = ValidatorBuilder::new(ValidatorOptions::default());
        let check = builder.build_reporting(&node).unwrap();

        let good = obj(vec![
            ("value", Value::from(1i64)),
            ("next", obj(vec![("value", Value::from(2i64))])),
        ]);
        assert!(check(&good).is_none());

        let bad = obj(vec![
            ("value", Value::from(1i64)),
            ("next", obj(vec![("value", Value::from("two"))])),
        ]);
        let err = check(&bad).expect("bad tail");
        // the optional-field wrapper reports at the field holding the bad node
        assert_eq!(err.path_string(), "value.next");
    }

    #[test]
    fn failed_builds_leave_no_stale_cache_entries() {
        let opts = ValidatorOptions {
            on_class_instance: ClassInstancePolicy::ThrowOnBuild,
            ..ValidatorOptions::default()
        };
        let builder = ValidatorBuilder::new(opts);
        let forbidden = Type::struct_of([(
            "handle",
            Field::of(Type::instance(ClassTag::new("Handle"))),
        )])
        .rc();

        for _ in 0..2 {
            let err = builder.build_reporting(&forbidden).err().unwrap();
            assert!(matches!(err, BuildError::ClassInstancesDisabled { .. }));
        }

        // the builder stays usable after a failed pass
        let fine = Type::number().rc();
        let check = builder.build_reporting(&fine).unwrap();
        assert!(check(&Value::from(3i64)).is_none());
    }

    #[test]
    fn raw_cache_reuses_subvalidators_across_requests() {
        let builder = ValidatorBuilder::new(ValidatorOptions::default());
        let inner = Type::struct_of([("x", Field::of(Type::number()))]).rc();
        let outer_a =
            Type::struct_of([("inner", Field::of(inner.clone()))]).rc();
        let outer_b = Type::array(inner.clone()).rc();

        builder.build_reporting(&outer_a).unwrap();
        let direct = builder.build_reporting(&inner).unwrap();
        let via_array = builder.build_reporting(&outer_b).unwrap();

        let mut map = IndexMap::new();
        map.insert("x".to_owned(), Value::from(1i64));
        assert!(direct(&Value::Object(map.clone())).is_none());
        assert!(via_array(&Value::Array(vec![Value::Object(map)])).is_none());
    }

    #[test]
    fn options_round_trip_through_serde() {
        let opts = ValidatorOptions {
            on_unknown_field_in_object: UnknownFieldPolicy::AllowAnything,
            on_nan_when_expected_number: NanPolicy::Allow,
            on_class_instance: ClassInstancePolicy::ThrowOnBuild,
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("allow_anything"), "{json}");
        let back: ValidatorOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);

        let defaults: ValidatorOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, ValidatorOptions::default());
    }
}
