//! Code fragments and the symbol table behind one compiled validator.
//!
//! A validator is assembled from fragments instead of emitted as source text:
//! an *expression fragment* is a failure-predicate plus a renderer that bakes
//! the checking expression's text for a given value-access string, and a
//! *declared fragment* is a named function cell that may be filled after
//! creation (forward/self-reference). Captured externals (sub-validators,
//! constant sets, class tags, predicates) get collision-free names so failure
//! expressions and diagnostics stay readable and deterministic.

use std::collections::BTreeSet;
use std::rc::Rc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;

use crate::error::{BuildError, Failure};
use crate::intersect::IntersectionContext;
use crate::types::Predicate;
use crate::value::{ClassTag, ConstantSet, Value};

/// One unit of compiled checking logic: `None` means the value passed.
/// The context parameter threads intersection bookkeeping through the checks
/// that participate in it; everything else passes `None`.
pub type Check =
    Rc<dyn for<'v> Fn(&'v Value, Option<&IntersectionContext<'v>>) -> Option<Failure>>;

/// Pins the higher-ranked closure signature so inference never early-binds
/// the value lifetime.
pub(crate) fn check_fn(
    f: impl for<'v> Fn(&'v Value, Option<&IntersectionContext<'v>>) -> Option<Failure> + 'static,
) -> Check {
    Rc::new(f)
}

pub(crate) type FailsFn =
    Rc<dyn for<'v> Fn(&'v Value, Option<&IntersectionContext<'v>>) -> bool>;

pub(crate) fn fails_fn(
    f: impl for<'v> Fn(&'v Value, Option<&IntersectionContext<'v>>) -> bool + 'static,
) -> FailsFn {
    Rc::new(f)
}

// ------------------------------ Fragments --------------------------------- //

/// Expression-shaped checking logic, inlined at each use site.
#[derive(Clone)]
pub(crate) struct ExprPart {
    /// Renders the failing condition for a given value-access string.
    pub render: Rc<dyn Fn(&str) -> String>,
    /// True when the condition holds, i.e. the check FAILED.
    pub fails: FailsFn,
}

/// Named, independently invocable checking logic; body filled in after
/// creation so fragments can reference themselves and each other.
#[derive(Clone)]
pub(crate) struct DeclaredFragment {
    name: String,
    cell: Rc<OnceCell<Check>>,
}

impl DeclaredFragment {
    fn empty(name: String) -> Self {
        DeclaredFragment { name, cell: Rc::new(OnceCell::new()) }
    }

    /// A fragment whose body is already known (imported validators).
    pub fn resolved(name: String, check: Check) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(check);
        DeclaredFragment { name, cell: Rc::new(cell) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fill(&self, check: Check) {
        let _ = self.cell.set(check);
    }

    pub fn is_filled(&self) -> bool {
        self.cell.get().is_some()
    }

    fn forwarding_check(&self) -> Check {
        let cell = self.cell.clone();
        let name = self.name.clone();
        check_fn(move |value, ctx| match cell.get() {
            Some(check) => check(value, ctx),
            // unreachable after a successful assemble()
            None => Some(Failure::new(value, format!("<{name} is not yet defined>"))),
        })
    }
}

#[derive(Clone)]
pub(crate) enum CodePart {
    Expr(ExprPart),
    Func(DeclaredFragment),
}

impl CodePart {
    /// The expression text of this part applied at a use site.
    pub fn text(&self, value_code: &str) -> String {
        match self {
            CodePart::Expr(expr) => (expr.render)(value_code),
            CodePart::Func(frag) => format!("{}({value_code}, int_ctx)", frag.name()),
        }
    }

    /// Compile a use site: expression parts bake their rendered text into the
    /// produced failure, function parts delegate to the fragment body.
    pub fn to_check(&self, value_code: &str) -> Check {
        match self {
            CodePart::Expr(expr) => {
                let rendered = (expr.render)(value_code);
                let fails = expr.fails.clone();
                check_fn(move |value, ctx| {
                    if fails(value, ctx) {
                        Some(Failure::new(value, rendered.clone()))
                    } else {
                        None
                    }
                })
            }
            CodePart::Func(frag) => frag.forwarding_check(),
        }
    }

    /// Pass/fail view of this part, for embedding into condition chains.
    pub fn fails(&self) -> FailsFn {
        match self {
            CodePart::Expr(expr) => expr.fails.clone(),
            CodePart::Func(frag) => {
                let check = frag.forwarding_check();
                fails_fn(move |value, ctx| check(value, ctx).is_some())
            }
        }
    }
}

// -------------------------- Captured parameters ---------------------------- //

/// An external value captured by generated logic under a stable name.
pub(crate) enum ParamValue {
    Check(Check),
    Predicate(Predicate),
    Constant(Value),
    ConstantSet(Rc<ConstantSet>),
    Class(ClassTag),
    FieldSet(Rc<BTreeSet<String>>),
}

impl ParamValue {
    /// Deep equality for deduplication; opaque callables compare by pointer.
    fn deep_equals(&self, other: &ParamValue) -> bool {
        match (self, other) {
            (ParamValue::Check(a), ParamValue::Check(b)) => Rc::ptr_eq(a, b),
            (ParamValue::Predicate(a), ParamValue::Predicate(b)) => a == b,
            (ParamValue::Constant(a), ParamValue::Constant(b)) => a == b,
            (ParamValue::ConstantSet(a), ParamValue::ConstantSet(b)) => **a == **b,
            (ParamValue::Class(a), ParamValue::Class(b)) => a == b,
            (ParamValue::FieldSet(a), ParamValue::FieldSet(b)) => a == b,
            _ => false,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Check(_) => "validator",
            ParamValue::Predicate(_) => "predicate",
            ParamValue::Constant(_) => "constant",
            ParamValue::ConstantSet(_) => "constant set",
            ParamValue::Class(_) => "class tag",
            ParamValue::FieldSet(_) => "field set",
        }
    }
}

// ------------------------------ Symbol table ------------------------------- //

/// Local variable names the generated logic conceptually owns; never issued
/// as parameter or fragment identifiers.
const RESERVED_NAMES: &[&str] = &[
    "check_result",
    "i",
    "prop_name",
    "obj",
    "tuple",
    "arr",
    "value",
    "int_ctx",
    "parent_int_ctx",
    "union_element",
    "map",
    "set",
    "key",
];

static ANGLE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<").expect("regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s>,.:]+").expect("regex"));
static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("regex"));
static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("regex"));

pub(crate) fn sanitize_identifier(base: &str) -> String {
    let s = ANGLE_OPEN.replace_all(base, "_of_");
    let s = SEPARATORS.replace_all(&s, "_");
    let s = NON_IDENT.replace_all(&s, "");
    let s = UNDERSCORE_RUNS.replace_all(&s, "_");
    let s = s.trim_matches('_');
    if s.is_empty() { "p".to_owned() } else { s.to_owned() }
}

#[derive(Default)]
pub(crate) struct SymbolTable {
    parameters: IndexMap<String, ParamValue>,
    fragments: IndexMap<String, DeclaredFragment>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    fn identifier_in_use(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
            || self.fragments.contains_key(name)
            || RESERVED_NAMES.contains(&name)
    }

    /// A fresh identifier derived from `name`; collisions get `_N` suffixes.
    pub fn unused_identifier(&self, name: &str) -> String {
        let base = sanitize_identifier(name);
        let mut candidate = base.clone();
        let mut counter = 1;
        while self.identifier_in_use(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }
        candidate
    }

    /// Stable name for a captured value. A deep-equal value under the same
    /// base name reuses the existing binding; a conflicting one is suffixed.
    pub fn bind_parameter(&mut self, suggested: &str, value: ParamValue) -> String {
        let base = sanitize_identifier(suggested);
        let mut name = base.clone();
        let mut counter = 1;
        while self.identifier_in_use(&name) {
            if let Some(existing) = self.parameters.get(&name) {
                if existing.deep_equals(&value) {
                    return name;
                }
            }
            name = format!("{base}_{counter}");
            counter += 1;
        }
        self.parameters.insert(name.clone(), value);
        name
    }

    /// A fresh, uniquely named, initially empty declared fragment.
    pub fn declare_fragment(&mut self, suggested: &str) -> DeclaredFragment {
        let name = self.unused_identifier(suggested);
        let fragment = DeclaredFragment::empty(name.clone());
        self.fragments.insert(name, fragment.clone());
        fragment
    }

    /// Deterministic rendering of everything this table holds; the closure
    /// world's stand-in for "the generated source" in diagnostics.
    pub fn listing(&self) -> String {
        let mut lines = Vec::new();
        let mut fragment_names: Vec<&String> = self.fragments.keys().collect();
        fragment_names.sort();
        for name in fragment_names {
            let state = if self.fragments[name.as_str()].is_filled() { "filled" } else { "unfilled" };
            lines.push(format!("fn {name} [{state}]"));
        }
        let mut parameter_names: Vec<&String> = self.parameters.keys().collect();
        parameter_names.sort();
        for name in parameter_names {
            lines.push(format!("param {name}: {}", self.parameters[name.as_str()].kind_name()));
        }
        lines.join("\n")
    }

    /// Produce the single compiled check from the entry fragment. Fails if
    /// any declared fragment was never filled; the error carries the listing
    /// so a generation bug is observable.
    pub fn assemble(&self, entry: CodePart) -> Result<Check, BuildError> {
        for (name, fragment) in &self.fragments {
            if !fragment.is_filled() {
                return Err(BuildError::Assemble {
                    reason: format!("fragment {name} was declared but never filled"),
                    listing: self.listing(),
                });
            }
        }
        match entry {
            // the entry wrapper takes a bare value; no enclosing context exists
            CodePart::Expr(_) => {
                let site = entry.to_check("value");
                Ok(check_fn(move |value, _ctx| site(value, None)))
            }
            CodePart::Func(fragment) => Ok(fragment.forwarding_check()),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitization_strips_and_collapses() {
        assert_eq!(sanitize_identifier("Array<My Type>"), "Array_of_My_Type");
        assert_eq!(sanitize_identifier("a.b:c,d"), "a_b_c_d");
        assert_eq!(sanitize_identifier("__x__"), "x");
        assert_eq!(sanitize_identifier("???"), "p");
    }

    #[test]
    fn reserved_and_taken_names_get_suffixes() {
        let mut table = SymbolTable::new();
        assert_eq!(table.unused_identifier("value"), "value_1");
        let first = table.bind_parameter("cls_Point", ParamValue::Constant(Value::Null));
        assert_eq!(first, "cls_Point");
        let second = table.bind_parameter("cls_Point", ParamValue::Constant(Value::from(1i64)));
        assert_eq!(second, "cls_Point_1");
    }

    #[test]
    fn deep_equal_parameters_share_one_binding() {
        let mut table = SymbolTable::new();
        let a = table.bind_parameter("const_of_string", ParamValue::Constant(Value::from("x")));
        let b = table.bind_parameter("const_of_string", ParamValue::Constant(Value::from("x")));
        assert_eq!(a, b);
        let c = table.bind_parameter("const_of_string", ParamValue::Constant(Value::from("y")));
        assert_ne!(a, c);
    }

    #[test]
    fn unfilled_fragment_fails_assembly_with_listing() {
        let mut table = SymbolTable::new();
        let fragment = table.declare_fragment("validate_thing");
        let err = table.assemble(CodePart::Func(fragment)).err().unwrap();
        let BuildError::Assemble { reason, listing } = err else { panic!("assemble error") };
        assert!(reason.contains("validate_thing"), "{reason}");
        assert!(listing.contains("fn validate_thing [unfilled]"), "{listing}");
    }

    #[test]
    fn declared_fragments_support_self_reference() {
        let mut table = SymbolTable::new();
        let fragment = table.declare_fragment("validate_chain");
        // body refers to itself through the cell before it is filled
        let self_call = CodePart::Func(fragment.clone()).to_check("value.next");
        fragment.fill(check_fn(move |value, ctx| match value {
            Value::Object(map) => match map.get("next") {
                Some(next) => self_call(next, ctx),
                None => None,
            },
            Value::Null => None,
            other => Some(Failure::new(other, "!is_object(value)")),
        }));
        let check = table.assemble(CodePart::Func(fragment)).expect("assembles");

        let chain = Value::Object(
            [(
                "next".to_owned(),
                Value::Object([("next".to_owned(), Value::Null)].into_iter().collect()),
            )]
            .into_iter()
            .collect(),
        );
        assert!(check(&chain, None).is_none());
        let broken = Value::Object(
            [("next".to_owned(), Value::from(5i64))].into_iter().collect(),
        );
        assert!(check(&broken, None).is_some());
    }

    #[test]
    fn expression_sites_bake_their_access_text() {
        let part = CodePart::Expr(ExprPart {
            render: Rc::new(|vc| format!("!is_number({vc})")),
            fails: fails_fn(|value, _ctx| !matches!(value, Value::Number(_))),
        });
        let site = part.to_check("tuple[2]");
        let failure = site(&Value::from("oops"), None).expect("fails");
        assert_eq!(failure.expression, "!is_number(tuple[2])");
        assert!(site(&Value::from(1i64), None).is_none());
    }
}
