//! Structural validator compiler.
//!
//! Descriptor trees (`Type`) describe the shape of runtime values (`Value`);
//! a `ValidatorBuilder` compiles a descriptor into a tree of composed check
//! closures, one unit per node, with caching by descriptor identity and proxy
//! forwarding for recursive shapes. A failed value yields a single
//! `ValidationError` carrying the bad value, the access path to it, and the
//! checking expression it tripped on.
//!
//! Design notes:
//! - Two validators of the same descriptor (`Rc` identity) are the same
//!   closure; structural twins compile independently.
//! - Checking is pure and reentrant; building is single-threaded per builder.
//! - Unions of tagged structs dispatch through inferred discriminator fields;
//!   intersections account for excess object fields across all components
//!   before rejecting strangers.

pub mod analyze;
pub mod builder;
pub mod error;
mod fragments;
mod generate;
mod intersect;
pub mod types;
pub mod value;
pub mod wrap;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub use builder::{
    AssertingValidator, ClassInstancePolicy, NanPolicy, ReportingValidator, UnknownFieldPolicy,
    ValidatorBuilder, ValidatorOptions,
};
pub use error::{BuildError, PathPart, ValidationError};
pub use types::{Field, Predicate, Resolver, Type, TypeKind, TypeRef};
pub use value::{ClassTag, ConstantSet, Value};
pub use wrap::{ExtraArgumentsPolicy, FunctionCheckOptions, validated_fn};

thread_local! {
    static BUILDERS: RefCell<HashMap<ValidatorOptions, Rc<ValidatorBuilder>>> =
        RefCell::new(HashMap::new());
}

/// The shared builder for an option set. Builders with equal options share
/// all caches; distinct option sets never do.
pub fn validator_builder(options: ValidatorOptions) -> Rc<ValidatorBuilder> {
    BUILDERS.with(|builders| {
        builders
            .borrow_mut()
            .entry(options)
            .or_insert_with(|| Rc::new(ValidatorBuilder::new(options)))
            .clone()
    })
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    fn reporting(ty: &TypeRef) -> ReportingValidator {
        validator_builder(ValidatorOptions::default())
            .build_reporting(ty)
            .expect("build")
    }

    #[test]
    fn builders_are_shared_per_option_set() {
        let a = validator_builder(ValidatorOptions::default());
        let b = validator_builder(ValidatorOptions::default());
        assert!(Rc::ptr_eq(&a, &b));
        let c = validator_builder(ValidatorOptions {
            on_nan_when_expected_number: NanPolicy::Allow,
            ..ValidatorOptions::default()
        });
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn primitive_checks_and_messages() {
        let check = reporting(&Type::int().rc());
        assert!(check(&Value::from(3i64)).is_none());
        let err = check(&Value::from(3.5)).expect("not integral");
        assert!(err.expression.contains("% 1"), "{}", err.expression);
        let msg = err.to_string();
        assert!(msg.contains("bad value at path value"), "{msg}");

        let check = reporting(&Type::bool().rc());
        assert!(check(&Value::from(true)).is_none());
        assert!(check(&Value::from(0i64)).is_some());
    }

    #[test]
    fn nan_policy_gates_numbers_but_never_ints() {
        let strict = reporting(&Type::number().rc());
        assert!(strict(&Value::from(f64::NAN)).is_some());

        let lax = validator_builder(ValidatorOptions {
            on_nan_when_expected_number: NanPolicy::Allow,
            ..ValidatorOptions::default()
        });
        let number = lax.build_reporting(&Type::number().rc()).unwrap();
        assert!(number(&Value::from(f64::NAN)).is_none());
        let int = lax.build_reporting(&Type::int().rc()).unwrap();
        assert!(int(&Value::from(f64::NAN)).is_some());
    }

    #[test]
    fn structs_report_paths_and_reject_strangers() {
        let ty = Type::struct_of([
            ("name", Field::of(Type::string())),
            ("score", Field::optional(Type::number())),
        ])
        .rc();
        let check = reporting(&ty);

        assert!(check(&obj(vec![("name", Value::from("a"))])).is_none());
        assert!(
            check(&obj(vec![("name", Value::from("a")), ("score", Value::from(1i64))])).is_none()
        );

        let err = check(&obj(vec![("name", Value::from(7i64))])).expect("bad name");
        assert_eq!(err.path_string(), "value.name");

        let err = check(&obj(vec![
            ("name", Value::from("a")),
            ("extra", Value::Null),
        ]))
        .expect("stranger");
        assert_eq!(err.path_string(), "value.extra");
        assert!(err.expression.contains("known_fields"), "{}", err.expression);
    }

    #[test]
    fn unknown_field_policy_admits_strangers() {
        let lax = validator_builder(ValidatorOptions {
            on_unknown_field_in_object: UnknownFieldPolicy::AllowAnything,
            ..ValidatorOptions::default()
        });
        let ty = Type::struct_of([("a", Field::of(Type::number()))]).rc();
        let check = lax.build_reporting(&ty).unwrap();
        assert!(
            check(&obj(vec![("a", Value::from(1i64)), ("b", Value::Null)])).is_none()
        );
    }

    #[test]
    fn arrays_tuples_maps_and_sets() {
        let arr = reporting(&Type::array(Type::string()).rc());
        assert!(arr(&Value::Array(vec![Value::from("x")])).is_none());
        let err = arr(&Value::Array(vec![Value::from("x"), Value::from(2i64)])).unwrap();
        assert_eq!(err.path_string(), "value[1]");

        let tup = reporting(&Type::tuple([Type::string().rc(), Type::number().rc()]).rc());
        assert!(tup(&Value::Array(vec![Value::from("x"), Value::from(1i64)])).is_none());
        let err = tup(&Value::Array(vec![Value::from("x")])).unwrap();
        assert!(err.expression.contains("tuple.length !== 2"), "{}", err.expression);

        let map = reporting(&Type::map_of(Type::string(), Type::number()).rc());
        assert!(
            map(&Value::Map(vec![(Value::from("k"), Value::from(1i64))])).is_none()
        );
        let err = map(&Value::Map(vec![(Value::from("k"), Value::from("v"))])).unwrap();
        assert_eq!(err.path_string(), "value.k");
        let err = map(&Value::Map(vec![(Value::from(5i64), Value::from(1i64))])).unwrap();
        assert!(err.path_string().contains("(as key)"), "{}", err.path_string());

        let set = reporting(&Type::set_of(Type::number()).rc());
        assert!(set(&Value::Set(vec![Value::from(1i64)])).is_none());
        let err = set(&Value::Set(vec![Value::from("no")])).unwrap();
        // set elements have no addressable position
        assert_eq!(err.path_string(), "value");
    }

    #[test]
    fn object_maps_check_values_and_constant_keys() {
        let open = reporting(&Type::object_map(Type::string(), Type::number()).rc());
        assert!(open(&obj(vec![("a", Value::from(1i64))])).is_none());
        let err = open(&obj(vec![("a", Value::from("x"))])).unwrap();
        assert_eq!(err.path_string(), "value.a");

        let keyed = reporting(
            &Type::object_map(
                Type::union([Type::constant("left"), Type::constant("right")]),
                Type::union([Type::constant(Value::Undefined).rc(), Type::number().rc()]),
            )
            .rc(),
        );
        assert!(keyed(&obj(vec![("left", Value::from(1i64))])).is_none());
        let err = keyed(&obj(vec![
            ("left", Value::from(1i64)),
            ("middle", Value::from(2i64)),
        ]))
        .unwrap();
        assert_eq!(err.path_string(), "value.middle");
        assert!(err.expression.contains("allowed_values"), "{}", err.expression);
    }

    #[test]
    fn single_constant_keys_leave_object_maps_open() {
        // a lone constant is not a constant union, so the map iterates the
        // keys actually present and applies no key-set accounting
        let check = reporting(&Type::object_map(Type::constant("a"), Type::number()).rc());
        assert!(check(&obj(vec![("b", Value::from(5i64))])).is_none());
        let err = check(&obj(vec![("b", Value::from("x"))])).unwrap();
        assert_eq!(err.path_string(), "value.b");
    }

    #[test]
    fn constant_unions_use_set_membership() {
        let ty = Type::union([
            Type::constant("a"),
            Type::constant("b"),
            Type::constant(1i64),
        ])
        .rc();
        let check = reporting(&ty);
        assert!(check(&Value::from("a")).is_none());
        assert!(check(&Value::from(1i64)).is_none());
        let err = check(&Value::from("c")).expect("not a member");
        assert!(err.expression.contains("has(union_element)"), "{}", err.expression);
    }

    #[test]
    fn discriminated_unions_dispatch_on_the_tag() {
        let circle = Type::struct_of([
            ("kind", Field::of(Type::constant("circle"))),
            ("radius", Field::of(Type::number())),
        ])
        .rc();
        let square = Type::struct_of([
            ("kind", Field::of(Type::constant("square"))),
            ("side", Field::of(Type::number())),
        ])
        .rc();
        let shape = Type::union([circle, square]).named("shape").rc();
        let check = reporting(&shape);

        assert!(check(&obj(vec![
            ("kind", Value::from("circle")),
            ("radius", Value::from(2i64)),
        ]))
        .is_none());
        assert!(check(&obj(vec![
            ("kind", Value::from("square")),
            ("side", Value::from(2i64)),
        ]))
        .is_none());

        // wrong tag value hits the dispatch mismatch directly
        let err = check(&obj(vec![
            ("kind", Value::from("triangle")),
            ("side", Value::from(2i64)),
        ]))
        .expect("unknown tag");
        assert!(
            err.expression.contains("allowedConstantUnionValues.has(value.kind)"),
            "{}",
            err.expression
        );

        // right tag, wrong body
        assert!(check(&obj(vec![
            ("kind", Value::from("circle")),
            ("side", Value::from(2i64)),
        ]))
        .is_some());

        // non-object input with no non-object members
        let err = check(&Value::from(5i64)).expect("not an object");
        assert_eq!(err.expression, "!is_object(value)");
    }

    #[test]
    fn mixed_unions_check_non_objects_against_non_struct_members() {
        let a = Type::struct_of([("tag", Field::of(Type::constant("a")))]).rc();
        let b = Type::struct_of([("tag", Field::of(Type::constant("b")))]).rc();
        let ty = Type::union([a, b, Type::string().rc()]).rc();
        let check = reporting(&ty);
        assert!(check(&Value::from("hello")).is_none());
        assert!(check(&obj(vec![("tag", Value::from("a"))])).is_none());
        assert!(check(&Value::from(5i64)).is_some());
    }

    #[test]
    fn flat_unions_chain_member_conditions() {
        let ty = Type::union([Type::string().rc(), Type::number().rc()]).rc();
        let check = reporting(&ty);
        assert!(check(&Value::from("x")).is_none());
        assert!(check(&Value::from(1i64)).is_none());
        let err = check(&Value::Null).expect("neither");
        assert!(err.expression.contains(" && "), "{}", err.expression);
    }

    #[test]
    fn union_members_keep_their_own_stranger_checks() {
        // outside an intersection no member claims fields for another, so the
        // merged object is a stranger to both
        let ty = Type::union([
            Type::struct_of([("a", Field::of(Type::number()))]).rc(),
            Type::struct_of([("b", Field::of(Type::number()))]).rc(),
        ])
        .rc();
        let check = reporting(&ty);
        assert!(check(&obj(vec![("a", Value::from(1i64))])).is_none());
        assert!(check(&obj(vec![("b", Value::from(2i64))])).is_none());
        assert!(check(&obj(vec![
            ("a", Value::from(1i64)),
            ("b", Value::from(2i64)),
        ]))
        .is_some());
    }

    #[test]
    fn intersections_of_structs_share_field_accounting() {
        let named = Type::struct_of([("name", Field::of(Type::string()))]).rc();
        let scored = Type::struct_of([("score", Field::of(Type::number()))]).rc();
        let both = Type::intersection([named, scored]).rc();
        let check = reporting(&both);

        assert!(check(&obj(vec![
            ("name", Value::from("a")),
            ("score", Value::from(1i64)),
        ]))
        .is_none());

        // a field neither component claims is excess
        let err = check(&obj(vec![
            ("name", Value::from("a")),
            ("score", Value::from(1i64)),
            ("other", Value::Null),
        ]))
        .expect("unclaimed field");
        assert_eq!(err.path_string(), "value.other");
        assert!(err.expression.contains("claimed_fields"), "{}", err.expression);

        // missing component fields still fail
        assert!(check(&obj(vec![("name", Value::from("a"))])).is_some());
    }

    #[test]
    fn intersections_of_unions_accept_every_combination() {
        let ab = Type::union([
            Type::struct_of([("a", Field::of(Type::number()))]).rc(),
            Type::struct_of([("b", Field::of(Type::number()))]).rc(),
        ])
        .rc();
        let cd = Type::union([
            Type::struct_of([("c", Field::of(Type::number()))]).rc(),
            Type::struct_of([("d", Field::of(Type::number()))]).rc(),
        ])
        .rc();
        let check = reporting(&Type::intersection([ab, cd]).rc());

        assert!(check(&obj(vec![
            ("a", Value::from(1i64)),
            ("c", Value::from(2i64)),
        ]))
        .is_none());
        assert!(check(&obj(vec![
            ("b", Value::from(1i64)),
            ("d", Value::from(2i64)),
        ]))
        .is_none());
        // each union settles on its first passing member, so a field only a
        // later member could claim stays unclaimed
        assert!(check(&obj(vec![
            ("a", Value::from(1i64)),
            ("b", Value::from(2i64)),
            ("d", Value::from(3i64)),
        ]))
        .is_some());
        // a field belonging to no member is excess
        assert!(check(&obj(vec![
            ("a", Value::from(1i64)),
            ("c", Value::from(2i64)),
            ("z", Value::from(3i64)),
        ]))
        .is_some());
    }

    #[test]
    fn unions_of_intersections_accept_either_branch() {
        let left = Type::intersection([
            Type::struct_of([("a", Field::of(Type::number()))]).rc(),
            Type::struct_of([("b", Field::of(Type::number()))]).rc(),
        ])
        .rc();
        let right = Type::intersection([
            Type::struct_of([("c", Field::of(Type::number()))]).rc(),
            Type::struct_of([("d", Field::of(Type::number()))]).rc(),
        ])
        .rc();
        let check = reporting(&Type::union([left, right]).rc());

        assert!(check(&obj(vec![
            ("a", Value::from(1i64)),
            ("b", Value::from(2i64)),
        ]))
        .is_none());
        assert!(check(&obj(vec![
            ("c", Value::from(1i64)),
            ("d", Value::from(2i64)),
        ]))
        .is_none());
        assert!(check(&obj(vec![
            ("a", Value::from(1i64)),
            ("d", Value::from(2i64)),
        ]))
        .is_some());
    }

    #[test]
    fn class_instances_check_by_tag_identity() {
        let animal = ClassTag::new("Animal");
        let cat = ClassTag::subclass("Cat", &animal);
        let check = reporting(&Type::instance(animal.clone()).rc());
        assert!(check(&Value::Instance(cat)).is_none());
        assert!(check(&Value::Instance(ClassTag::new("Animal"))).is_some());
        let err = check(&Value::from(1i64)).unwrap();
        assert!(err.expression.contains("instanceof cls_Animal"), "{}", err.expression);
    }

    #[test]
    fn custom_predicates_run_after_structural_checks() {
        let ty = Type::string()
            .checked(|v| matches!(v, Value::String(s) if !s.is_empty()))
            .rc();
        let check = reporting(&ty);
        assert!(check(&Value::from("x")).is_none());
        let err = check(&Value::from("")).expect("empty string");
        assert!(err.expression.contains("user_validator"), "{}", err.expression);
        // structural mismatch wins over the predicate
        assert!(check(&Value::from(1i64)).is_some());
    }

    #[test]
    fn dates_binaries_and_exotic_constants() {
        let date = reporting(&Type::date().rc());
        assert!(date(&Value::Date(chrono::Utc::now())).is_none());
        assert!(date(&Value::from("2020-01-01")).is_some());

        let binary = reporting(&Type::binary().rc());
        assert!(binary(&Value::Binary(vec![1, 2, 3])).is_none());
        assert!(binary(&Value::Array(vec![Value::from(1i64)])).is_some());

        let half = reporting(&Type::constant(0.5).rc());
        assert!(half(&Value::from(0.5)).is_none());
        let err = half(&Value::from(0.25)).unwrap();
        assert!(err.expression.contains("const_of_number"), "{}", err.expression);
    }
}
