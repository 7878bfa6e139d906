//! Enum replacement: the carrier is a plain string, the transformer a choice
//! of case matchers. Also home to `make_enum_transformer`, which the union
//! strategy reuses for enum members inside a combined string branch.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::attributes::TypeAttributes;
use crate::error::TransformError;
use crate::graph::{PrimKind, Type, TypeRef};
use crate::transformer::{Transformation, Transformer};

use super::RewriteContext;

/// A choice of one `StringMatch` → `StringProduce` pair per case, cases in
/// lexicographic order. Each alternative only fires on its exact literal, so
/// alternative order among the matchers is immaterial; it is fixed anyway so
/// output is stable. `continuation` follows every produced case (the union
/// strategy passes a member wrapper here).
pub(crate) fn make_enum_transformer(
    string_ref: TypeRef,
    cases: &BTreeSet<String>,
    continuation: Option<&Transformer>,
) -> Transformer {
    let alternatives = cases
        .iter()
        .map(|case| Transformer::StringMatch {
            source: string_ref,
            next: Box::new(Transformer::StringProduce {
                source: string_ref,
                next: continuation.cloned().map(Box::new),
                literal: case.clone(),
            }),
            literal: case.clone(),
        })
        .collect();
    Transformer::Choice {
        source: string_ref,
        alternatives,
    }
}

pub(crate) fn replace_enum(
    ctx: &mut RewriteContext<'_>,
    old: TypeRef,
    forwarding: TypeRef,
) -> Result<TypeRef, TransformError> {
    let Type::Enum { cases } = ctx.old().get(old).clone() else {
        return Err(TransformError::UnsupportedKind {
            kind: ctx.old().get(old).kind(),
        });
    };
    let attrs = ctx.reconstitute_attributes(ctx.old().attributes(old));
    let target = ctx.get_enum(attrs, cases.clone());

    let forward = Transformer::Decode {
        source: forwarding,
        next: Some(Box::new(make_enum_transformer(forwarding, &cases, None))),
    };
    let t9n = Transformation::new(target, forward);
    ctx.fill_replacement(
        forwarding,
        Type::Primitive(PrimKind::String),
        TypeAttributes::default().with_transformation(Arc::new(t9n)),
    );
    Ok(forwarding)
}
