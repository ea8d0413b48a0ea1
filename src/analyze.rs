//! Pure analyses over descriptor trees: constant-union flattening and
//! discriminator inference for struct unions.

use indexmap::IndexMap;

use crate::types::{Field, TypeKind, TypeRef};
use crate::value::Value;

// --------------------------- Constant unions ------------------------------ //

/// If `ty` is a union whose every terminal (recursing through nested unions)
/// is a constant, the flattened list of literal values; `None` otherwise. A
/// bare constant does not qualify: only the field-level variant below accepts
/// one.
pub fn constant_union_values(ty: &TypeRef) -> Option<Vec<Value>> {
    if !matches!(ty.kind, TypeKind::Union(_)) {
        return None;
    }
    let mut out = Vec::new();
    if collect_constants(ty, &mut out) { Some(out) } else { None }
}

/// Field-level variant: an optional field additionally admits `Undefined`.
pub(crate) fn field_constant_values(field: &Field) -> Option<Vec<Value>> {
    let mut out = Vec::new();
    if field.optional {
        out.push(Value::Undefined);
    }
    if collect_constants(&field.ty, &mut out) { Some(out) } else { None }
}

fn collect_constants(ty: &TypeRef, out: &mut Vec<Value>) -> bool {
    match &ty.kind {
        TypeKind::Constant(value) => {
            out.push(value.clone());
            true
        }
        TypeKind::Union(components) => {
            components.iter().all(|c| collect_constants(c, out))
        }
        _ => false,
    }
}

// ------------------------- Terminal enumeration --------------------------- //

/// Visit every terminal, expanding unions and intersections.
pub(crate) fn for_each_terminal(ty: &TypeRef, visit: &mut impl FnMut(&TypeRef)) {
    match &ty.kind {
        TypeKind::Union(components) | TypeKind::Intersection(components) => {
            for component in components {
                for_each_terminal(component, visit);
            }
        }
        _ => visit(ty),
    }
}

// ---------------------------- Discriminators ------------------------------ //

/// Recursive field-keyed partition of struct/object-map union members.
///
/// Either a flat member list (no further discrimination possible) or a group
/// keyed on one property. A member lacking the property, or holding a
/// non-constant value there, lands in `default` and is re-partitioned on the
/// next candidate; a member whose property is a constant union appears under
/// each of its literal values.
#[derive(Debug)]
pub enum DiscriminatorPack {
    Members(Vec<TypeRef>),
    Group {
        property: String,
        mapping: Vec<(Value, DiscriminatorPack)>,
        default: Box<DiscriminatorPack>,
    },
}

/// Rank candidate properties by descending distinct-literal count (stable on
/// first-seen order for ties) and partition the members. The ranking is a
/// heuristic, intentionally kept as-is for behavioral compatibility.
pub fn find_discriminators(members: &[TypeRef]) -> DiscriminatorPack {
    let mut candidates: IndexMap<String, Vec<Value>> = IndexMap::new();
    for member in members {
        let TypeKind::Struct(fields) = &member.kind else { continue };
        for (name, field) in fields {
            let Some(values) = field_constant_values(field) else { continue };
            let seen = candidates.entry(name.clone()).or_default();
            for value in values {
                if !seen.contains(&value) {
                    seen.push(value);
                }
            }
        }
    }

    let mut order: Vec<String> = candidates.keys().cloned().collect();
    order.sort_by(|a, b| candidates[b].len().cmp(&candidates[a].len()));

    group_by_keys(members.to_vec(), &order, 0)
}

fn group_by_keys(members: Vec<TypeRef>, keys: &[String], i: usize) -> DiscriminatorPack {
    if i >= keys.len() {
        return DiscriminatorPack::Members(members);
    }

    match group_by_key(members, &keys[i]) {
        DiscriminatorPack::Members(flat) => group_by_keys(flat, keys, i + 1),
        DiscriminatorPack::Group { property, mapping, default } => {
            let mapping = mapping
                .into_iter()
                .map(|(value, pack)| {
                    let pack = match pack {
                        DiscriminatorPack::Members(flat) => group_by_keys(flat, keys, i + 1),
                        group => group,
                    };
                    (value, pack)
                })
                .collect();
            let default = match *default {
                DiscriminatorPack::Members(flat) => Box::new(group_by_keys(flat, keys, i + 1)),
                group => Box::new(group),
            };
            DiscriminatorPack::Group { property, mapping, default }
        }
    }
}

fn group_by_key(members: Vec<TypeRef>, key: &str) -> DiscriminatorPack {
    let mut default = Vec::new();
    let mut mapping: Vec<(Value, Vec<TypeRef>)> = Vec::new();

    for member in members {
        let values = match &member.kind {
            TypeKind::Struct(fields) => fields.get(key).and_then(field_constant_values),
            _ => None, // object maps have no fixed fields
        };
        let Some(values) = values else {
            default.push(member);
            continue;
        };
        for value in values {
            match mapping.iter_mut().find(|(v, _)| *v == value) {
                Some((_, bucket)) => bucket.push(member.clone()),
                None => mapping.push((value, vec![member.clone()])),
            }
        }
    }

    if mapping.is_empty() {
        DiscriminatorPack::Members(default)
    } else {
        DiscriminatorPack::Group {
            property: key.to_owned(),
            mapping: mapping
                .into_iter()
                .map(|(value, bucket)| (value, DiscriminatorPack::Members(bucket)))
                .collect(),
            default: Box::new(DiscriminatorPack::Members(default)),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
