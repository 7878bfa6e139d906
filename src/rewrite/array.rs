//! Array item lifting: the carrier erases items to `any` so the outer decode
//! stays shape-only; the transformation documents the real item type and maps
//! a per-item decode over every element.

use std::sync::Arc;

use crate::attributes::TypeAttributes;
use crate::error::TransformError;
use crate::graph::{PrimKind, Type, TypeRef};
use crate::transformer::{Transformation, Transformer};

use super::RewriteContext;

pub(crate) fn replace_array(
    ctx: &mut RewriteContext<'_>,
    old: TypeRef,
    forwarding: TypeRef,
) -> Result<TypeRef, TransformError> {
    let Type::Array { items } = ctx.old().get(old).clone() else {
        return Err(TransformError::UnsupportedKind {
            kind: ctx.old().get(old).kind(),
        });
    };
    let attrs = ctx.reconstitute_attributes(ctx.old().attributes(old));
    let any_ref = ctx.get_primitive(PrimKind::Any, TypeAttributes::default());

    // The reconstituted item may itself be a carrier; its own transformation
    // composes with the per-item decode, so narrowing still happens.
    let real_items = ctx.reconstitute_type(items)?;
    let target = ctx.get_array(attrs, real_items);

    let forward = Transformer::ArrayDecode {
        source: forwarding,
        item: Box::new(Transformer::Decode {
            source: any_ref,
            next: None,
        }),
        item_target: real_items,
        next: None,
    };
    let t9n = Transformation::new(target, forward);
    ctx.fill_replacement(
        forwarding,
        Type::Array { items: any_ref },
        TypeAttributes::default().with_transformation(Arc::new(t9n)),
    );
    Ok(forwarding)
}
