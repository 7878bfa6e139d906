//! Transformed-string scalar replacement: a plain string carrier whose
//! transformation parses into the narrower primitive.

use std::sync::Arc;

use crate::attributes::TypeAttributes;
use crate::error::TransformError;
use crate::graph::{PrimKind, TransformedStringKind, Type, TypeRef};
use crate::transformer::{Transformation, Transformer};

use super::RewriteContext;

pub(crate) fn replace_transformed_string(
    ctx: &mut RewriteContext<'_>,
    old: TypeRef,
    forwarding: TypeRef,
    kind: TransformedStringKind,
) -> Result<TypeRef, TransformError> {
    // The original type's attributes land on the parse target, where the
    // decoded value lives.
    let attrs = ctx.reconstitute_attributes(ctx.old().attributes(old));
    let target = ctx.get_primitive(kind.parse_target(), attrs);

    let forward = Transformer::Decode {
        source: forwarding,
        next: Some(Box::new(Transformer::ParseString {
            source: forwarding,
            next: None,
        })),
    };
    let t9n = Transformation::new(target, forward);
    ctx.fill_replacement(
        forwarding,
        Type::Primitive(PrimKind::String),
        TypeAttributes::default().with_transformation(Arc::new(t9n)),
    );
    Ok(forwarding)
}
