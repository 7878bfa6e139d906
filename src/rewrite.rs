//! The canonicalizing graph rewrite: replacement groups, forwarding handles,
//! memoized reconstitution, and the orchestrator that drives the per-kind
//! replacement strategies.
//!
//! The discipline that makes this safe on cyclic graphs: every replacement
//! group gets its forwarding handle allocated *before* any strategy runs, and
//! compound types reconstitute reserve-first, so a type's own subtree may
//! freely reference the handle being built. Reconstitution is memoized per
//! old handle, so reconstituting the same subtype twice within one run yields
//! the same new handle and sharing survives the rewrite.

pub mod array;
pub mod enums;
pub mod scalar;
pub mod union;

use std::collections::{BTreeMap, BTreeSet};

use crate::attributes::TypeAttributes;
use crate::error::TransformError;
use crate::graph::{PrimKind, TransformedStringKind, Type, TypeGraph, TypeKind, TypeRef};

const REWRITE_TAG: &str = "flatten-transformed-types";

/// Read-only debug switches. Printing has no semantic effect; output is
/// synchronous, order-preserving stderr.
#[derive(Copy, Clone, Debug, Default)]
pub struct RunConfig {
    pub debug_print_transformations: bool,
    pub debug_print_reconstitution: bool,
}

/// Which transformed-string kinds the target renderer represents natively.
/// Consumed read-only; the default predicate derives the replacement set
/// from it.
#[derive(Clone, Debug, Default)]
pub struct StringTypeMapping {
    native: BTreeSet<TransformedStringKind>,
}

impl StringTypeMapping {
    pub fn with_native(kinds: impl IntoIterator<Item = TransformedStringKind>) -> Self {
        StringTypeMapping {
            native: kinds.into_iter().collect(),
        }
    }

    pub fn supports(&self, kind: TransformedStringKind) -> bool {
        self.native.contains(&kind)
    }
}

/// The predicate a consuming renderer would supply: enums and unions always
/// need a transformer, arrays only when the caller asks for item lifting,
/// transformed-string scalars whenever the mapping lacks native support.
pub fn default_needs_transformer(
    mapping: &StringTypeMapping,
    lift_arrays: bool,
) -> impl Fn(&TypeGraph, TypeRef) -> bool + '_ {
    move |g, r| match g.get(r) {
        Type::Enum { .. } | Type::Union { .. } => true,
        Type::Array { .. } => lift_arrays,
        Type::Primitive(p) => p.transformed().is_some_and(|t| !mapping.supports(t)),
        _ => false,
    }
}

/// Per-invocation rewrite state: the graph under construction, the
/// old-handle → new-handle memo (which doubles as the forwarding table for
/// replacement groups), and the canonicalization table for constructor-made
/// types.
pub struct RewriteContext<'a> {
    old: &'a TypeGraph,
    new: TypeGraph,
    canonical: BTreeMap<Type, Vec<TypeRef>>,
    forwarding: BTreeMap<TypeRef, TypeRef>,
    mapping: &'a StringTypeMapping,
    allow_lossy_conflation: bool,
    debug_reconstitution: bool,
}

impl<'a> RewriteContext<'a> {
    fn new(
        old: &'a TypeGraph,
        mapping: &'a StringTypeMapping,
        allow_lossy_conflation: bool,
        config: &RunConfig,
    ) -> Self {
        RewriteContext {
            old,
            new: TypeGraph::new(),
            canonical: BTreeMap::new(),
            forwarding: BTreeMap::new(),
            mapping,
            allow_lossy_conflation,
            debug_reconstitution: config.debug_print_reconstitution,
        }
    }

    pub fn old(&self) -> &TypeGraph {
        self.old
    }

    pub fn string_mapping(&self) -> &StringTypeMapping {
        self.mapping
    }

    pub fn new_attributes(&self, r: TypeRef) -> &TypeAttributes {
        self.new.attributes(r)
    }

    fn reserve(&mut self) -> TypeRef {
        self.new.reserve()
    }

    /// Fill a replacement group's forwarding handle. Deliberately bypasses
    /// canonicalization: a carrier holds a transformation, and
    /// transformations are never shared across distinct types.
    pub fn fill_replacement(&mut self, handle: TypeRef, ty: Type, attrs: TypeAttributes) {
        self.new.fill(handle, ty, attrs);
    }

    /// Collapse a replacement group's handle onto an existing type
    /// (degenerate union).
    pub fn forward_replacement(&mut self, handle: TypeRef, target: TypeRef) {
        self.new.forward(handle, target);
    }

    /// Flag that attributes could not be carried across the rewrite.
    pub fn set_lost_type_attributes(&mut self) {
        self.new.set_lost_type_attributes();
    }

    /// Hook point for attribute migration; attributes carry over unchanged.
    pub fn reconstitute_attributes(&self, attrs: &TypeAttributes) -> TypeAttributes {
        attrs.clone()
    }

    fn add_canonical(&mut self, ty: Type, attrs: TypeAttributes) -> TypeRef {
        if let Some(candidates) = self.canonical.get(&ty) {
            if self.allow_lossy_conflation {
                if let Some(&r) = candidates.first() {
                    let merged = self.new.attributes(r).clone().combine(&attrs);
                    *self.new.attributes_mut(r) = merged;
                    return r;
                }
            } else {
                // No lossy shortcuts: structural identity alone is not
                // enough, the attributes must agree too.
                for &r in candidates {
                    if *self.new.attributes(r) == attrs {
                        return r;
                    }
                }
            }
        }
        let r = self.new.add(ty.clone(), attrs);
        self.canonical.entry(ty).or_default().push(r);
        r
    }

    /// Fill a reserve-first compound slot, collapsing onto an existing
    /// structurally identical type when one exists.
    fn fill_compound(&mut self, slot: TypeRef, ty: Type, attrs: TypeAttributes) -> TypeRef {
        if !self.allow_lossy_conflation {
            if let Some(candidates) = self.canonical.get(&ty) {
                for &r in candidates {
                    if r != slot && *self.new.attributes(r) == attrs {
                        self.new.forward(slot, r);
                        return r;
                    }
                }
            }
        }
        self.new.fill(slot, ty.clone(), attrs);
        self.canonical.entry(ty).or_default().push(slot);
        slot
    }

    // Canonicalizing constructors. Each returns a handle deduplicated by
    // structural identity within the new graph.

    pub fn get_primitive(&mut self, kind: PrimKind, attrs: TypeAttributes) -> TypeRef {
        self.add_canonical(Type::Primitive(kind), attrs)
    }

    /// A string type, optionally restricted to a fixed case set (an enum).
    pub fn get_string_type(
        &mut self,
        attrs: TypeAttributes,
        restriction: Option<BTreeSet<String>>,
    ) -> TypeRef {
        match restriction {
            Some(cases) => self.get_enum(attrs, cases),
            None => self.get_primitive(PrimKind::String, attrs),
        }
    }

    pub fn get_enum(&mut self, attrs: TypeAttributes, cases: BTreeSet<String>) -> TypeRef {
        self.add_canonical(Type::Enum { cases }, attrs)
    }

    pub fn get_array(&mut self, attrs: TypeAttributes, items: TypeRef) -> TypeRef {
        self.add_canonical(Type::Array { items }, attrs)
    }

    pub fn get_union(
        &mut self,
        attrs: TypeAttributes,
        members: BTreeMap<TypeKind, TypeRef>,
    ) -> TypeRef {
        self.add_canonical(Type::Union { members }, attrs)
    }

    /// Carry an old type over into the new graph, transformed if it belongs
    /// to a replacement group. Memoized and cycle-safe: compound types
    /// reserve their handle before recursing into children.
    pub fn reconstitute_type(&mut self, old_ref: TypeRef) -> Result<TypeRef, TransformError> {
        let old_ref = self.old.resolve(old_ref);
        if let Some(&r) = self.forwarding.get(&old_ref) {
            return Ok(r);
        }
        if self.debug_reconstitution {
            eprintln!(
                "reconstituting {old_ref} ({})",
                self.old.get(old_ref).kind().name()
            );
        }
        let attrs = self.reconstitute_attributes(self.old.attributes(old_ref));
        match self.old.get(old_ref).clone() {
            Type::Primitive(kind) => {
                let r = self.get_primitive(kind, attrs);
                self.forwarding.insert(old_ref, r);
                Ok(r)
            }
            Type::Enum { cases } => {
                let r = self.get_enum(attrs, cases);
                self.forwarding.insert(old_ref, r);
                Ok(r)
            }
            Type::Array { items } => {
                let slot = self.reserve();
                self.forwarding.insert(old_ref, slot);
                let items = self.reconstitute_type(items)?;
                Ok(self.fill_compound(slot, Type::Array { items }, attrs))
            }
            Type::Map { values } => {
                let slot = self.reserve();
                self.forwarding.insert(old_ref, slot);
                let values = self.reconstitute_type(values)?;
                Ok(self.fill_compound(slot, Type::Map { values }, attrs))
            }
            Type::Class { properties } => {
                let slot = self.reserve();
                self.forwarding.insert(old_ref, slot);
                let mut rebuilt = BTreeMap::new();
                for (name, child) in properties {
                    rebuilt.insert(name, self.reconstitute_type(child)?);
                }
                Ok(self.fill_compound(slot, Type::Class { properties: rebuilt }, attrs))
            }
            Type::Union { members } => {
                let slot = self.reserve();
                self.forwarding.insert(old_ref, slot);
                let mut rebuilt = BTreeMap::new();
                for (kind, member) in members {
                    rebuilt.insert(kind, self.reconstitute_type(member)?);
                }
                Ok(self.fill_compound(slot, Type::Union { members: rebuilt }, attrs))
            }
        }
    }
}

impl TypeGraph {
    /// Rewrite this graph: every group is replaced through `replacer` (called
    /// once per group with a pre-allocated forwarding handle), everything
    /// else is carried over by structural identity, shared rather than
    /// copied.
    pub fn rewrite<R>(
        &self,
        tag: &str,
        mapping: &StringTypeMapping,
        allow_lossy_conflation: bool,
        groups: &[Vec<TypeRef>],
        config: &RunConfig,
        mut replacer: R,
    ) -> Result<TypeGraph, TransformError>
    where
        R: FnMut(&[TypeRef], &mut RewriteContext<'_>, TypeRef) -> Result<TypeRef, TransformError>,
    {
        let mut ctx = RewriteContext::new(self, mapping, allow_lossy_conflation, config);

        // Forwarding handles first, so strategies can reconstruct subtypes
        // that transitively reference a type still being replaced.
        let mut handles = Vec::with_capacity(groups.len());
        for group in groups {
            let handle = ctx.reserve();
            for &old in group {
                ctx.forwarding.insert(self.resolve(old), handle);
            }
            handles.push(handle);
        }

        for (group, &handle) in groups.iter().zip(&handles) {
            let produced = replacer(group, &mut ctx, handle)?;
            if produced != handle {
                return Err(TransformError::ForwardingMismatch);
            }
        }

        for (name, &r) in self.top_levels() {
            let carried = ctx.reconstitute_type(r)?;
            ctx.new.set_top_level(name.clone(), carried);
        }

        let new = ctx.new;
        if let Some(slot) = new.unfilled_slot() {
            return Err(TransformError::UnfilledSlot {
                tag: tag.to_string(),
                index: slot.index(),
            });
        }
        Ok(new)
    }
}

/// The transformation-synthesis pass: ask the predicate which types need a
/// transformer, give each its own singleton replacement group (transformers
/// are never shared across distinct types), dispatch by kind to a strategy,
/// and attach the finished transformation to the produced carrier.
pub fn flatten_transformed_types(
    graph: &TypeGraph,
    mapping: &StringTypeMapping,
    config: &RunConfig,
    needs_transformer: &dyn Fn(&TypeGraph, TypeRef) -> bool,
) -> Result<TypeGraph, TransformError> {
    let groups: Vec<Vec<TypeRef>> = graph
        .all_type_refs()
        .filter(|&r| needs_transformer(graph, r))
        .map(|r| vec![r])
        .collect();

    graph.rewrite(
        REWRITE_TAG,
        mapping,
        false,
        &groups,
        config,
        |group, ctx, forwarding| {
            let &[old] = group else {
                return Err(TransformError::NonSingletonGroup {
                    tag: REWRITE_TAG.to_string(),
                });
            };
            let produced = match ctx.old().get(old).kind() {
                TypeKind::Union => union::replace_union(ctx, old, forwarding)?,
                TypeKind::Array => array::replace_array(ctx, old, forwarding)?,
                TypeKind::Enum => enums::replace_enum(ctx, old, forwarding)?,
                kind => match kind.transformed() {
                    Some(ts) => scalar::replace_transformed_string(ctx, old, forwarding, ts)?,
                    None => return Err(TransformError::UnsupportedKind { kind }),
                },
            };
            if config.debug_print_transformations {
                debug_print_transformation(ctx, produced)?;
            }
            Ok(produced)
        },
    )
}

fn debug_print_transformation(
    ctx: &RewriteContext<'_>,
    produced: TypeRef,
) -> Result<(), TransformError> {
    // A degenerate union forwards to its single member and carries nothing.
    let Some(t9n) = ctx.new_attributes(produced).transformation().cloned() else {
        return Ok(());
    };
    eprintln!(
        "transformation for {produced} (target {}):",
        t9n.target_type()
    );
    eprint!("{}", t9n.forward());
    eprintln!("reverse:");
    eprint!("{}", t9n.reverse()?);
    Ok(())
}
