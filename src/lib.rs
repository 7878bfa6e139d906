//! Type-graph transformation synthesis: rewrite a type graph so types a
//! target cannot represent directly become representable carrier types, each
//! carrying a transformer tree that documents how to decode a carried value
//! into the real type and (by structural reversal) encode it back.

pub mod attributes;
pub mod cli;
pub mod describe;
pub mod error;
pub mod graph;
pub mod rewrite;
pub mod transformer;
