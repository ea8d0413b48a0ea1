//! Per-kind validator generation.
//!
//! One `Generator` exists per raw build request. It walks a descriptor tree
//! and produces a `CodePart` for each node: cheap kinds become expression
//! parts, structured kinds become declared fragments. Sub-nodes are normally
//! requested from the orchestrator and imported as captured parameters; the
//! exception is union components of intersections, which are inlined so the
//! intersection context reaches structs hiding inside expression-shaped
//! unions (an imported expression entry drops the context).

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::analyze::{
    DiscriminatorPack, constant_union_values, find_discriminators, for_each_terminal,
};
use crate::builder::{ClassInstancePolicy, NanPolicy, UnknownFieldPolicy, ValidatorBuilder};
use crate::error::{BuildError, Failure, is_valid_identifier};
use crate::fragments::{
    Check, CodePart, DeclaredFragment, ExprPart, FailsFn, ParamValue, SymbolTable, check_fn,
    fails_fn,
};
use crate::intersect::{IntersectionContext, check_no_extra_fields};
use crate::types::{Field, Predicate, Type, TypeKey, TypeKind, TypeRef};
use crate::value::{ClassTag, ConstantSet, MAX_SAFE_INTEGER, Value, json_quote};

fn property_access(base: &str, key: &str) -> String {
    if is_valid_identifier(key) {
        format!("{base}.{key}")
    } else {
        format!("{base}[{}]", json_quote(key))
    }
}

/// Custom predicates of one descriptor, OR-joined into a single clause.
struct PredChain {
    render: Rc<dyn Fn(&str) -> String>,
    fails: Rc<dyn Fn(&Value) -> bool>,
}

type PredTail = Option<Rc<dyn Fn(&Value) -> Option<Failure>>>;

fn run_tail(tail: &PredTail, value: &Value) -> Option<Failure> {
    tail.as_ref().and_then(|t| t(value))
}

pub(crate) struct Generator<'b> {
    manager: &'b ValidatorBuilder,
    table: SymbolTable,
    /// Declared-fragment reuse within this one build, keyed by descriptor
    /// identity.
    declared: HashMap<TypeKey, DeclaredFragment>,
}

impl<'b> Generator<'b> {
    pub fn new(manager: &'b ValidatorBuilder) -> Self {
        Generator { manager, table: SymbolTable::new(), declared: HashMap::new() }
    }

    pub fn build(mut self, ty: &TypeRef, prevent_reuse: bool) -> Result<Check, BuildError> {
        let part = self.part(ty, prevent_reuse)?;
        self.table.assemble(part)
    }

    /// The normal path imports the node's cached validator from the
    /// orchestrator; `prevent_reuse` generates it in place instead.
    fn part(&mut self, ty: &TypeRef, prevent_reuse: bool) -> Result<CodePart, BuildError> {
        if !prevent_reuse {
            let check = self.manager.build_internal(ty)?;
            return Ok(self.import_check(ty, check));
        }
        self.part_uncached(ty)
    }

    fn import_check(&mut self, ty: &TypeRef, check: Check) -> CodePart {
        let suggested = format!("validate_{}", ty.name.as_deref().unwrap_or("value"));
        let name = self.table.bind_parameter(&suggested, ParamValue::Check(check.clone()));
        CodePart::Func(DeclaredFragment::resolved(name, check))
    }

    fn part_uncached(&mut self, ty: &TypeRef) -> Result<CodePart, BuildError> {
        match &ty.kind {
            TypeKind::Number => Ok(self.number_part(ty)),
            TypeKind::Int => Ok(self.int_part(ty)),
            TypeKind::String => Ok(self.condition_part(
                ty,
                |vc| format!("!is_string({vc})"),
                |v, _| !matches!(v, Value::String(_)),
            )),
            TypeKind::Bool => Ok(self.condition_part(
                ty,
                |vc| format!("({vc} !== true && {vc} !== false)"),
                |v, _| !matches!(v, Value::Bool(_)),
            )),
            TypeKind::Constant(value) => Ok(self.constant_part(ty, value)),
            TypeKind::Date => Ok(self.condition_part(
                ty,
                |vc| format!("!is_date({vc})"),
                |v, _| !matches!(v, Value::Date(_)),
            )),
            TypeKind::Binary => Ok(self.condition_part(
                ty,
                |vc| format!("!is_binary({vc})"),
                |v, _| !matches!(v, Value::Binary(_)),
            )),
            TypeKind::Instance(tag) => self.instance_part(ty, tag),
            TypeKind::Array(element) => self.array_part(ty, element),
            TypeKind::Tuple(components) => self.tuple_part(ty, components),
            TypeKind::Struct(_) => self.struct_part(ty),
            TypeKind::ObjectMap { key, value } => self.object_map_part(ty, key, value),
            TypeKind::Map { key, value } => self.map_part(ty, key, value),
            TypeKind::Set(element) => self.set_part(ty, element),
            TypeKind::Union(components) => self.union_part(ty, components),
            TypeKind::Intersection(components) => self.intersection_part(ty, components),
            TypeKind::Recursive(resolver) => {
                let resolved = resolver.resolve();
                self.part(&resolved, false)
            }
        }
    }

    // ------------------------- Expression kinds --------------------------- //

    fn number_part(&mut self, ty: &Type) -> CodePart {
        let reject_nan =
            self.manager.options().on_nan_when_expected_number == NanPolicy::ValidationError;
        self.condition_part(
            ty,
            move |vc| {
                let base = format!("!is_number({vc})");
                if reject_nan { format!("({base} || is_nan({vc}))") } else { base }
            },
            move |v, _| match v {
                Value::Number(n) => reject_nan && n.is_nan(),
                _ => true,
            },
        )
    }

    fn int_part(&mut self, ty: &Type) -> CodePart {
        let reject_nan =
            self.manager.options().on_nan_when_expected_number == NanPolicy::ValidationError;
        self.condition_part(
            ty,
            move |vc| {
                let base = format!("!is_number({vc}) || ({vc} % 1) !== 0");
                if reject_nan { format!("({base} || is_nan({vc}))") } else { base }
            },
            // NaN % 1 is NaN, so NaN fails regardless of the NaN policy
            |v, _| match v {
                Value::Number(n) => n.fract() != 0.0,
                _ => true,
            },
        )
    }

    fn constant_part(&mut self, ty: &Type, value: &Value) -> CodePart {
        let literal = self.const_to_code(value);
        let expected = value.clone();
        self.condition_part(
            ty,
            move |vc| format!("{vc} !== {literal}"),
            move |v, _| *v != expected,
        )
    }

    fn instance_part(&mut self, ty: &Type, tag: &ClassTag) -> Result<CodePart, BuildError> {
        if self.manager.options().on_class_instance == ClassInstancePolicy::ThrowOnBuild {
            return Err(BuildError::ClassInstancesDisabled { class: tag.name().to_owned() });
        }
        let suggested = if tag.name().len() > 50 {
            "constructor".to_owned()
        } else {
            format!("cls_{}", tag.name())
        };
        let name = self.table.bind_parameter(&suggested, ParamValue::Class(tag.clone()));
        let expected = tag.clone();
        Ok(self.condition_part(
            ty,
            move |vc| format!("!({vc} instanceof {name})"),
            move |v, _| match v {
                Value::Instance(tag) => !tag.extends(&expected),
                _ => true,
            },
        ))
    }

    // ------------------------- Fragment kinds ----------------------------- //

    fn array_part(&mut self, ty: &TypeRef, element: &TypeRef) -> Result<CodePart, BuildError> {
        self.fragment(ty, "array", |g, frag| {
            let element_check = g.part(element, false)?.to_check("arr[i]");
            let tail = g.predicate_tail(ty, "arr");
            frag.fill(check_fn(move |value, _ctx| {
                let Value::Array(items) = value else {
                    return Some(Failure::new(value, "!is_array(arr)"));
                };
                for (i, item) in items.iter().enumerate() {
                    if let Some(failure) = element_check(item, None) {
                        return Some(failure.push_index(i));
                    }
                }
                run_tail(&tail, value)
            }));
            Ok(())
        })
    }

    fn tuple_part(&mut self, ty: &TypeRef, components: &[TypeRef]) -> Result<CodePart, BuildError> {
        self.fragment(ty, "tuple", |g, frag| {
            let mut slots = Vec::new();
            for (i, component) in components.iter().enumerate() {
                slots.push(g.part(component, false)?.to_check(&format!("tuple[{i}]")));
            }
            let length_expr = format!("tuple.length !== {}", components.len());
            let expected_len = components.len();
            let tail = g.predicate_tail(ty, "tuple");
            frag.fill(check_fn(move |value, _ctx| {
                let Value::Array(items) = value else {
                    return Some(Failure::new(value, "!is_array(tuple)"));
                };
                if items.len() != expected_len {
                    return Some(Failure::new(value, length_expr.clone()));
                }
                for (i, slot) in slots.iter().enumerate() {
                    if let Some(failure) = slot(&items[i], None) {
                        return Some(failure.push_index(i));
                    }
                }
                run_tail(&tail, value)
            }));
            Ok(())
        })
    }

    fn struct_part(&mut self, ty: &TypeRef) -> Result<CodePart, BuildError> {
        self.fragment(ty, "struct", |g, frag| {
            let TypeKind::Struct(fields) = &ty.kind else { unreachable!("struct kind") };
            let mut names: Vec<String> = fields.keys().cloned().collect();
            names.sort();
            let field_set: Rc<BTreeSet<String>> = Rc::new(names.iter().cloned().collect());
            let set_name = g
                .table
                .bind_parameter("known_fields", ParamValue::FieldSet(field_set.clone()));

            let mut field_checks = Vec::new();
            for name in &names {
                let part = g.field_part(&fields[name.as_str()])?;
                let check = part.to_check(&property_access("struct", name));
                field_checks.push((name.clone(), check));
            }

            let allow_extra = g.manager.options().on_unknown_field_in_object
                == UnknownFieldPolicy::AllowAnything;
            let tail = g.predicate_tail(ty, "struct");
            frag.fill(check_fn(move |value, ctx| {
                let Value::Object(map) = value else {
                    return Some(Failure::new(value, "!is_object(struct)"));
                };
                let undefined = Value::Undefined;
                for (name, check) in &field_checks {
                    // a missing field is checked as undefined, context-free
                    let result = match map.get(name.as_str()) {
                        Some(field_value) => check(field_value, ctx),
                        None => check(&undefined, None),
                    };
                    if let Some(failure) = result {
                        return Some(failure.push_field(name.clone()));
                    }
                }
                if !allow_extra {
                    match ctx {
                        Some(context) => context.claim(map, field_set.clone()),
                        None => {
                            if let Some(failure) =
                                check_no_extra_fields(map, &field_set, &set_name)
                            {
                                return Some(failure);
                            }
                        }
                    }
                }
                run_tail(&tail, value)
            }));
            Ok(())
        })
    }

    /// Optional fields wrap the inner part in an undefined-admitting
    /// expression; the inner failure detail is discarded at such sites.
    fn field_part(&mut self, field: &Field) -> Result<CodePart, BuildError> {
        if !field.optional {
            return self.part(&field.ty, false);
        }
        let inner = self.part(&field.ty, false)?;
        let inner_for_render = inner.clone();
        let inner_fails = inner.fails();
        Ok(self.condition_part(
            &field.ty,
            move |vc| format!("({vc} !== undefined && {})", inner_for_render.text(vc)),
            move |v, ctx| !v.is_undefined() && inner_fails(v, ctx),
        ))
    }

    fn object_map_part(
        &mut self,
        ty: &TypeRef,
        key: &TypeRef,
        value_ty: &TypeRef,
    ) -> Result<CodePart, BuildError> {
        self.fragment(ty, "object_map", |g, frag| {
            let value_check = g.part(value_ty, false)?.to_check("object_map[propName]");
            let allow_extra = g.manager.options().on_unknown_field_in_object
                == UnknownFieldPolicy::AllowAnything;
            let tail = g.predicate_tail(ty, "object_map");

            match constant_union_values(key) {
                // known key set: iterate the allowed keys, then account for
                // strangers
                Some(key_values) => {
                    let set = Rc::new(ConstantSet::new(&key_values));
                    let set_name = g
                        .table
                        .bind_parameter("allowed_values", ParamValue::ConstantSet(set));
                    let keys: Vec<String> =
                        key_values.iter().map(Value::property_key).collect();
                    let key_set: Rc<BTreeSet<String>> =
                        Rc::new(keys.iter().cloned().collect());
                    frag.fill(check_fn(move |value, ctx| {
                        let Value::Object(map) = value else {
                            return Some(Failure::new(value, "!is_object(object_map)"));
                        };
                        let undefined = Value::Undefined;
                        for key in &keys {
                            let result = match map.get(key.as_str()) {
                                Some(entry) => value_check(entry, ctx),
                                None => value_check(&undefined, None),
                            };
                            if let Some(failure) = result {
                                return Some(failure.push_field(key.clone()));
                            }
                        }
                        if !allow_extra {
                            match ctx {
                                Some(context) => context.claim(map, key_set.clone()),
                                None => {
                                    if let Some(failure) =
                                        check_no_extra_fields(map, &key_set, &set_name)
                                    {
                                        return Some(failure);
                                    }
                                }
                            }
                        }
                        run_tail(&tail, value)
                    }));
                }
                // open key set: object keys are strings by construction, so
                // only values are checked
                None => {
                    frag.fill(check_fn(move |value, ctx| {
                        let Value::Object(map) = value else {
                            return Some(Failure::new(value, "!is_object(object_map)"));
                        };
                        for (key, entry) in map {
                            if let Some(failure) = value_check(entry, ctx) {
                                return Some(failure.push_field(key.clone()));
                            }
                        }
                        run_tail(&tail, value)
                    }));
                }
            }
            Ok(())
        })
    }

    fn map_part(
        &mut self,
        ty: &TypeRef,
        key: &TypeRef,
        value_ty: &TypeRef,
    ) -> Result<CodePart, BuildError> {
        self.fragment(ty, "map", |g, frag| {
            let key_check = g.part(key, false)?.to_check("key");
            let value_check = g.part(value_ty, false)?.to_check("value");
            let tail = g.predicate_tail(ty, "map");
            frag.fill(check_fn(move |value, _ctx| {
                let Value::Map(entries) = value else {
                    return Some(Failure::new(value, "!is_map(map)"));
                };
                for (entry_key, entry_value) in entries {
                    if let Some(failure) = key_check(entry_key, None) {
                        return Some(
                            failure.push_field(format!("{} (as key)", entry_key.property_key())),
                        );
                    }
                    if let Some(failure) = value_check(entry_value, None) {
                        return Some(failure.push_field(entry_key.property_key()));
                    }
                }
                run_tail(&tail, value)
            }));
            Ok(())
        })
    }

    fn set_part(&mut self, ty: &TypeRef, element: &TypeRef) -> Result<CodePart, BuildError> {
        self.fragment(ty, "set", |g, frag| {
            let element_check = g.part(element, false)?.to_check("value");
            let tail = g.predicate_tail(ty, "set");
            frag.fill(check_fn(move |value, _ctx| {
                let Value::Set(items) = value else {
                    return Some(Failure::new(value, "!is_set(set)"));
                };
                for item in items {
                    // set elements have no addressable position
                    if let Some(failure) = element_check(item, None) {
                        return Some(failure);
                    }
                }
                run_tail(&tail, value)
            }));
            Ok(())
        })
    }

    // ----------------------------- Unions --------------------------------- //

    fn union_part(&mut self, ty: &TypeRef, components: &[TypeRef]) -> Result<CodePart, BuildError> {
        if let Some(values) = constant_union_values(ty) {
            return self.fragment(ty, "constant_union", |g, frag| {
                let set = Rc::new(ConstantSet::new(&values));
                g.table
                    .bind_parameter("allowed_values", ParamValue::ConstantSet(set.clone()));
                let expression = format!("!Set({}).has(union_element)", set.rendered());
                let tail = g.predicate_tail(ty, "union_element");
                frag.fill(check_fn(move |value, _ctx| {
                    if !set.contains(value) {
                        return Some(Failure::new(value, expression.clone()));
                    }
                    run_tail(&tail, value)
                }));
                Ok(())
            });
        }

        let struct_members: Vec<TypeRef> = components
            .iter()
            .filter(|c| matches!(c.kind, TypeKind::Struct(_)))
            .cloned()
            .collect();

        // fewer than two structs: no discrimination to be had, pack all
        // member conditions into one chain
        if struct_members.len() < 2 {
            let mut parts = Vec::new();
            for component in components {
                parts.push(self.part(component, false)?);
            }
            let parts_for_render = parts.clone();
            let fails: Vec<FailsFn> = parts.iter().map(CodePart::fails).collect();
            return Ok(self.condition_part(
                ty,
                move |vc| {
                    let texts: Vec<String> =
                        parts_for_render.iter().map(|p| p.text(vc)).collect();
                    format!("({})", texts.join(" && "))
                },
                move |v, ctx| fails.iter().all(|f| f(v, ctx)),
            ));
        }

        let object_map_members: Vec<TypeRef> = components
            .iter()
            .filter(|c| matches!(c.kind, TypeKind::ObjectMap { .. }))
            .cloned()
            .collect();
        let mut discriminated = struct_members;
        discriminated.extend(object_map_members);
        let pack = find_discriminators(&discriminated);

        // everything non-struct lands in the non-object branch, object maps
        // included (they also sit in the discriminator pack)
        let non_object: Vec<TypeRef> = components
            .iter()
            .filter(|c| !matches!(c.kind, TypeKind::Struct(_)))
            .cloned()
            .collect();

        self.fragment(ty, "union", |g, frag| {
            let mut non_object_checks = Vec::new();
            for component in &non_object {
                non_object_checks.push(g.part(component, false)?.to_check("value"));
            }
            let dispatch = g.compile_pack(&pack)?;
            let tail = g.predicate_tail(ty, "value");
            frag.fill(check_fn(move |value, ctx| {
                if !value.is_plain_object() {
                    if non_object_checks.is_empty() {
                        return Some(Failure::new(value, "!is_object(value)"));
                    }
                    if let Some(failure) = all_fail(&non_object_checks, value, ctx) {
                        return Some(failure);
                    }
                } else if let Some(failure) = dispatch(value, ctx) {
                    return Some(failure);
                }
                run_tail(&tail, value)
            }));
            Ok(())
        })
    }

    /// Compile a discriminator pack into dispatching logic over the checked
    /// object. Leaf member lists keep the all-must-fail chain semantics; an
    /// empty default under a dispatching group is a hard mismatch on the
    /// dispatch property itself.
    fn compile_pack(&mut self, pack: &DiscriminatorPack) -> Result<Check, BuildError> {
        match pack {
            DiscriminatorPack::Members(members) => {
                let mut checks = Vec::new();
                for member in members {
                    checks.push(self.part(member, false)?.to_check("value"));
                }
                Ok(check_fn(move |value, ctx| all_fail(&checks, value, ctx)))
            }
            DiscriminatorPack::Group { property, mapping, default } => {
                let mut arms = Vec::new();
                for (arm_value, sub_pack) in mapping {
                    // keeps exotic case literals visible as captured params
                    self.const_to_code(arm_value);
                    arms.push((arm_value.clone(), self.compile_pack(sub_pack)?));
                }
                let default_is_empty =
                    matches!(&**default, DiscriminatorPack::Members(m) if m.is_empty());
                let default_check =
                    if default_is_empty { None } else { Some(self.compile_pack(default)?) };
                let mismatch_expr = format!(
                    "!allowedConstantUnionValues.has({})",
                    property_access("value", property)
                );
                let property = property.clone();
                Ok(check_fn(move |value, ctx| {
                    let Value::Object(map) = value else { return None };
                    let undefined = Value::Undefined;
                    let field = map.get(property.as_str()).unwrap_or(&undefined);
                    for (arm_value, check) in &arms {
                        if field == arm_value {
                            return check(value, ctx);
                        }
                    }
                    match &default_check {
                        Some(check) => check(value, ctx),
                        None => Some(Failure::new(value, mismatch_expr.clone())),
                    }
                }))
            }
        }
    }

    // -------------------------- Intersections ------------------------------ //

    fn intersection_part(
        &mut self,
        ty: &TypeRef,
        components: &[TypeRef],
    ) -> Result<CodePart, BuildError> {
        let mut parts = Vec::new();
        for component in components {
            let force_inline = matches!(component.kind, TypeKind::Union(_));
            parts.push(self.part(component, force_inline)?);
        }

        let mut has_struct = false;
        for_each_terminal(ty, &mut |terminal| {
            if matches!(terminal.kind, TypeKind::Struct(_)) {
                has_struct = true;
            }
        });

        // no struct terminal anywhere: a plain first-failure chain suffices
        if !has_struct {
            let parts_for_render = parts.clone();
            let fails: Vec<FailsFn> = parts.iter().map(CodePart::fails).collect();
            return Ok(self.condition_part(
                ty,
                move |vc| {
                    let texts: Vec<String> =
                        parts_for_render.iter().map(|p| p.text(vc)).collect();
                    format!("({})", texts.join(" || "))
                },
                move |v, ctx| fails.iter().any(|f| f(v, ctx)),
            ));
        }

        let allow_extra = self.manager.options().on_unknown_field_in_object
            == UnknownFieldPolicy::AllowAnything;
        self.fragment(ty, "intersection", move |g, frag| {
            let checks: Vec<Check> = parts.iter().map(|p| p.to_check("value")).collect();
            let tail = g.predicate_tail(ty, "value");
            frag.fill(check_fn(move |value, parent_ctx| {
                if allow_extra {
                    for check in &checks {
                        if let Some(failure) = check(value, None) {
                            return Some(failure);
                        }
                    }
                } else {
                    let local = IntersectionContext::new();
                    for check in &checks {
                        if let Some(failure) = check(value, Some(&local)) {
                            return Some(failure);
                        }
                    }
                    // the combined excess check runs at the outermost
                    // intersection only
                    match parent_ctx {
                        Some(parent) => parent.absorb(local),
                        None => {
                            if let Some(failure) = local.check() {
                                return Some(failure);
                            }
                        }
                    }
                }
                run_tail(&tail, value)
            }));
            Ok(())
        })
    }

    // ----------------------------- Shared ---------------------------------- //

    fn fragment(
        &mut self,
        ty: &TypeRef,
        default_name: &str,
        fill: impl FnOnce(&mut Self, &DeclaredFragment) -> Result<(), BuildError>,
    ) -> Result<CodePart, BuildError> {
        let key = TypeKey::new(ty);
        if let Some(existing) = self.declared.get(&key) {
            return Ok(CodePart::Func(existing.clone()));
        }
        let suggested = format!("validate_{}", ty.name.as_deref().unwrap_or(default_name));
        let fragment = self.table.declare_fragment(&suggested);
        // registered before filling so self-references resolve to it
        self.declared.insert(key, fragment.clone());
        fill(self, &fragment)?;
        Ok(CodePart::Func(fragment))
    }

    /// Inline rendering of a literal; values with no inline form become
    /// captured parameters.
    fn const_to_code(&mut self, value: &Value) -> String {
        match value {
            Value::Undefined => "void 0".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => json_quote(s),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => {
                format!("{}", *n as i64)
            }
            other => {
                let suggested = format!("const_of_{}", typeof_name(other));
                self.table.bind_parameter(&suggested, ParamValue::Constant(other.clone()))
            }
        }
    }

    fn predicates(&mut self, ty: &Type) -> Option<PredChain> {
        if matches!(ty.kind, TypeKind::Recursive(_) | TypeKind::Constant(_))
            || ty.checks.is_empty()
        {
            return None;
        }
        let mut named: Vec<(String, Predicate)> = Vec::new();
        for predicate in &ty.checks {
            let name = self
                .table
                .bind_parameter("user_validator", ParamValue::Predicate(predicate.clone()));
            named.push((name, predicate.clone()));
        }
        let names: Vec<String> = named.iter().map(|(n, _)| n.clone()).collect();
        let render = Rc::new(move |vc: &str| {
            let clauses: Vec<String> = names.iter().map(|n| format!("!{n}({vc})")).collect();
            if clauses.len() == 1 { clauses[0].clone() } else { format!("({})", clauses.join(" || ")) }
        });
        let predicates: Vec<Predicate> = named.into_iter().map(|(_, p)| p).collect();
        let fails = Rc::new(move |v: &Value| predicates.iter().any(|p| !p.test(v)));
        Some(PredChain { render, fails })
    }

    /// Trailing predicate check inside a declared fragment.
    fn predicate_tail(&mut self, ty: &Type, value_code: &str) -> PredTail {
        self.predicates(ty).map(|chain| {
            let expression = (chain.render)(value_code);
            let fails = chain.fails;
            Rc::new(move |value: &Value| {
                if fails(value) { Some(Failure::new(value, expression.clone())) } else { None }
            }) as Rc<dyn Fn(&Value) -> Option<Failure>>
        })
    }

    /// Expression part from a failing condition, with the descriptor's
    /// custom predicates OR-ed into the same clause.
    fn condition_part(
        &mut self,
        ty: &Type,
        render: impl Fn(&str) -> String + 'static,
        fails: impl for<'v> Fn(&'v Value, Option<&IntersectionContext<'v>>) -> bool + 'static,
    ) -> CodePart {
        match self.predicates(ty) {
            None => CodePart::Expr(ExprPart { render: Rc::new(render), fails: fails_fn(fails) }),
            Some(PredChain { render: pred_render, fails: pred_fails }) => {
                CodePart::Expr(ExprPart {
                    render: Rc::new(move |vc| format!("({} || {})", render(vc), pred_render(vc))),
                    fails: fails_fn(move |v, ctx| fails(v, ctx) || pred_fails(v)),
                })
            }
        }
    }
}

/// Members chain semantics: the value passes if any member accepts it; when
/// every member rejects it, the last member's failure is the reported one.
fn all_fail<'v>(
    checks: &[Check],
    value: &'v Value,
    ctx: Option<&IntersectionContext<'v>>,
) -> Option<Failure> {
    let mut last = None;
    for check in checks {
        match check(value, ctx) {
            None => return None,
            Some(failure) => last = Some(failure),
        }
    }
    last
}

fn typeof_name(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        _ => "object",
    }
}
