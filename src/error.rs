//! Fatal invariant violations. Every variant is a generator defect, never an
//! expected input-data condition; the whole pass aborts on the first one.

use thiserror::Error;

use crate::graph::TypeKind;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("union has no members while building {context}")]
    EmptyUnion { context: String },

    #[error("union has both class and map members; cannot discriminate two object-shaped representations")]
    ClassAndMapMembers,

    #[error("union member of kind {kind:?} is not supported by the union transformer")]
    UnsupportedUnionMember { kind: TypeKind },

    #[error("no replacement strategy for {kind:?} type (predicate marked a kind this pass cannot handle)")]
    UnsupportedKind { kind: TypeKind },

    #[error("transformer cannot be reversed: {reason}")]
    Irreversible { reason: &'static str },

    #[error("replacement strategy returned a handle other than its forwarding handle")]
    ForwardingMismatch,

    #[error("rewrite `{tag}` left type slot {index} unfilled")]
    UnfilledSlot { tag: String, index: usize },

    #[error("rewrite `{tag}` was given a non-singleton replacement group")]
    NonSingletonGroup { tag: String },
}
