//! Union replacement: substitute transformed-string members with their parse
//! targets, collapse degenerate results, and otherwise build a per-runtime-
//! kind decoding choice whose string branch combines case matchers, parsed
//! scalars, and the plain pass-through in that order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::attributes::TypeAttributes;
use crate::error::TransformError;
use crate::graph::{PrimKind, Type, TypeKind, TypeRef};
use crate::transformer::{BranchSet, Transformation, Transformer};

use super::enums::make_enum_transformer;
use super::RewriteContext;

/// One string-shaped way into the union. The rank fixes alternative order:
/// case matchers first, parses next, the plain member last, so the
/// accept-anything pass-through can never shadow the others.
enum StringMember {
    Cases { member: TypeRef, cases: BTreeSet<String> },
    Parsed { member: TypeRef },
    Plain { member: TypeRef },
}

impl StringMember {
    fn rank(&self) -> u8 {
        match self {
            StringMember::Cases { .. } => 0,
            StringMember::Parsed { .. } => 1,
            StringMember::Plain { .. } => 2,
        }
    }
}

pub(crate) fn replace_union(
    ctx: &mut RewriteContext<'_>,
    old: TypeRef,
    forwarding: TypeRef,
) -> Result<TypeRef, TransformError> {
    let Type::Union { members } = ctx.old().get(old).clone() else {
        return Err(TransformError::UnsupportedKind {
            kind: ctx.old().get(old).kind(),
        });
    };
    if members.is_empty() {
        return Err(TransformError::EmptyUnion {
            context: format!("replacing union {old}"),
        });
    }
    for &kind in members.keys() {
        if matches!(kind, TypeKind::Any | TypeKind::Union) {
            return Err(TransformError::UnsupportedUnionMember { kind });
        }
    }

    // New member set, keyed by the kind each member has *after* transformed-
    // string substitution. Plain members carry over first so a substitution
    // can reuse an existing member of its target kind.
    let mut carried: BTreeMap<TypeKind, TypeRef> = BTreeMap::new();
    let mut string_members: Vec<StringMember> = Vec::new();
    let mut extra_attrs = TypeAttributes::default();

    for (&kind, &member) in &members {
        if kind.transformed().is_some() {
            continue;
        }
        let carried_ref = ctx.reconstitute_type(member)?;
        carried.insert(kind, carried_ref);
        match kind {
            TypeKind::String => string_members.push(StringMember::Plain { member: carried_ref }),
            TypeKind::Enum => {
                let Type::Enum { cases } = ctx.old().get(member).clone() else {
                    unreachable!("union member keyed enum is not an enum");
                };
                string_members.push(StringMember::Cases {
                    member: carried_ref,
                    cases,
                });
            }
            _ => {}
        }
    }

    for (&kind, &member) in &members {
        let Some(ts) = kind.transformed() else {
            continue;
        };
        let target_kind = ts.parse_target().kind();
        let carried_ref = match carried.get(&target_kind) {
            Some(&r) => r,
            None => {
                let r = ctx.get_primitive(ts.parse_target(), TypeAttributes::default());
                carried.insert(target_kind, r);
                r
            }
        };
        // The substituted member's attributes move to the carrier.
        extra_attrs =
            extra_attrs.combine(&ctx.reconstitute_attributes(ctx.old().attributes(member)));
        string_members.push(StringMember::Parsed { member: carried_ref });
    }

    if carried.contains_key(&TypeKind::Class) && carried.contains_key(&TypeKind::Map) {
        return Err(TransformError::ClassAndMapMembers);
    }

    // One effective kind left: no union to decode into, the handle becomes
    // an alias and whatever attributes we gathered are dropped.
    let distinct: BTreeSet<TypeRef> = carried.values().copied().collect();
    if distinct.len() == 1 {
        if let Some(&single) = distinct.iter().next() {
            ctx.set_lost_type_attributes();
            ctx.forward_replacement(forwarding, single);
        }
        return Ok(forwarding);
    }

    let union_attrs = ctx.reconstitute_attributes(ctx.old().attributes(old));
    let target = ctx.get_union(union_attrs, carried.clone());
    let string_ref = ctx.get_string_type(TypeAttributes::default(), None);

    string_members.sort_by_key(StringMember::rank);
    let mut alternatives: Vec<Transformer> = Vec::new();
    for entry in &string_members {
        match entry {
            StringMember::Cases { member, cases } => {
                let combined = make_enum_transformer(
                    string_ref,
                    cases,
                    Some(&Transformer::UnionInstantiate { member: *member }),
                );
                let Transformer::Choice {
                    alternatives: matchers,
                    ..
                } = combined
                else {
                    unreachable!("enum transformer is always a choice");
                };
                alternatives.extend(matchers);
            }
            StringMember::Parsed { member } => alternatives.push(Transformer::ParseString {
                source: string_ref,
                next: Some(Box::new(Transformer::UnionInstantiate { member: *member })),
            }),
            StringMember::Plain { member } => {
                alternatives.push(Transformer::UnionInstantiate { member: *member })
            }
        }
    }
    let string_branch = match alternatives.len() {
        0 => None,
        1 => alternatives.into_iter().next().map(|only| {
            Box::new(Transformer::Decode {
                source: string_ref,
                next: Some(Box::new(only)),
            })
        }),
        _ => Some(Box::new(Transformer::Decode {
            source: string_ref,
            next: Some(Box::new(Transformer::Choice {
                source: string_ref,
                alternatives,
            })),
        })),
    };

    let direct = |kind: TypeKind| -> Option<Box<Transformer>> {
        carried.get(&kind).map(|&member| {
            Box::new(Transformer::Decode {
                source: member,
                next: Some(Box::new(Transformer::UnionInstantiate { member })),
            })
        })
    };
    // Class/map exclusivity was checked above; at most one of these exists.
    let object = direct(TypeKind::Class).or_else(|| direct(TypeKind::Map));
    let branches = BranchSet {
        null: direct(TypeKind::Null),
        integer: direct(TypeKind::Integer),
        double: direct(TypeKind::Double),
        boolean: direct(TypeKind::Bool),
        string: string_branch,
        array: direct(TypeKind::Array),
        object,
    };

    let forward = Transformer::DecodingChoice {
        source: forwarding,
        branches,
    };
    let t9n = Transformation::new(target, forward);
    ctx.fill_replacement(
        forwarding,
        Type::Primitive(PrimKind::Any),
        extra_attrs.with_transformation(Arc::new(t9n)),
    );
    Ok(forwarding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PrimKind, TypeGraph};
    use crate::rewrite::{default_needs_transformer, flatten_transformed_types, RunConfig,
        StringTypeMapping};
    use crate::transformer::eval::{run, Direction};
    use serde_json::json;

    #[test]
    fn bool_string_member_substitutes_a_bool_member() {
        let mut g = TypeGraph::new();
        let null = g.add(Type::Primitive(PrimKind::Null), TypeAttributes::default());
        let bstr = g.add(Type::Primitive(PrimKind::BoolString), TypeAttributes::default());
        let mut members = BTreeMap::new();
        members.insert(TypeKind::Null, null);
        members.insert(TypeKind::BoolString, bstr);
        let u = g.add(Type::Union { members }, TypeAttributes::default());
        g.set_top_level("root", u);

        let mapping = StringTypeMapping::default();
        let config = RunConfig::default();
        let pred = default_needs_transformer(&mapping, false);
        let out = flatten_transformed_types(&g, &mapping, &config, &pred).unwrap();

        let carrier = out.resolve(out.top_levels()["root"]);
        let t9n = out.attributes(carrier).transformation().unwrap();
        let Type::Union { members } = out.get(t9n.target_type()) else {
            panic!("target is the rebuilt union");
        };
        assert!(members.contains_key(&TypeKind::Null));
        assert!(members.contains_key(&TypeKind::Bool));
        assert!(!members.contains_key(&TypeKind::BoolString));

        assert_eq!(
            run(&out, t9n.forward(), Direction::Decode, &json!("true")),
            Some(json!(true))
        );
        assert_eq!(
            run(&out, t9n.forward(), Direction::Decode, &json!(null)),
            Some(json!(null))
        );
        assert_eq!(run(&out, t9n.forward(), Direction::Decode, &json!("maybe")), None);
    }

    #[test]
    fn native_mapping_keeps_the_transformed_member() {
        let mut g = TypeGraph::new();
        let null = g.add(Type::Primitive(PrimKind::Null), TypeAttributes::default());
        let bstr = g.add(Type::Primitive(PrimKind::BoolString), TypeAttributes::default());
        let mut members = BTreeMap::new();
        members.insert(TypeKind::Null, null);
        members.insert(TypeKind::BoolString, bstr);
        let u = g.add(Type::Union { members }, TypeAttributes::default());
        g.set_top_level("root", u);

        // The scalar itself is natively representable, so only the union is
        // replaced; the union strategy still substitutes its members.
        let mapping =
            StringTypeMapping::with_native([crate::graph::TransformedStringKind::BoolString]);
        let config = RunConfig::default();
        let pred = default_needs_transformer(&mapping, false);
        let out = flatten_transformed_types(&g, &mapping, &config, &pred).unwrap();
        let carrier = out.resolve(out.top_levels()["root"]);
        assert!(out.attributes(carrier).transformation().is_some());
    }
}
