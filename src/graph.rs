//! Type graph storage: a closed vocabulary of structural types held in an
//! arena and addressed by stable `TypeRef` handles.
//!
//! The graph is a DAG that may contain cycles (recursive classes), so nothing
//! here assumes tree shape. Slots can be *reserved* before their body exists
//! (forwarding handles, so a type's own subtree may reference it) and can
//! *forward* to another slot (a degenerate union collapsing to its single
//! surviving member). All observable orders go through `BTreeMap`/`BTreeSet`
//! so repeated runs produce identical output.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::attributes::TypeAttributes;

/// Stable handle to a type slot. Cheap to copy, ordered for deterministic
/// iteration, meaningful only within the graph that issued it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeRef(u32);

impl TypeRef {
    pub(crate) fn new(index: usize) -> Self {
        TypeRef(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primitive kinds, including the transformed-string scalars: textual
/// encodings of a narrower primitive (e.g. `"42"` standing for `42`).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PrimKind {
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    IntegerString,
    BoolString,
}

impl PrimKind {
    pub fn kind(self) -> TypeKind {
        match self {
            PrimKind::Any => TypeKind::Any,
            PrimKind::Null => TypeKind::Null,
            PrimKind::Bool => TypeKind::Bool,
            PrimKind::Integer => TypeKind::Integer,
            PrimKind::Double => TypeKind::Double,
            PrimKind::String => TypeKind::String,
            PrimKind::IntegerString => TypeKind::IntegerString,
            PrimKind::BoolString => TypeKind::BoolString,
        }
    }

    /// The transformed-string view of this kind, if it has one.
    pub fn transformed(self) -> Option<TransformedStringKind> {
        match self {
            PrimKind::IntegerString => Some(TransformedStringKind::IntegerString),
            PrimKind::BoolString => Some(TransformedStringKind::BoolString),
            _ => None,
        }
    }
}

/// The transformed-string scalar kinds this pass knows how to parse.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TransformedStringKind {
    IntegerString,
    BoolString,
}

impl TransformedStringKind {
    /// The narrower primitive a successful parse yields.
    pub fn parse_target(self) -> PrimKind {
        match self {
            TransformedStringKind::IntegerString => PrimKind::Integer,
            TransformedStringKind::BoolString => PrimKind::Bool,
        }
    }

    pub fn prim(self) -> PrimKind {
        match self {
            TransformedStringKind::IntegerString => PrimKind::IntegerString,
            TransformedStringKind::BoolString => PrimKind::BoolString,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransformedStringKind::IntegerString => "integer-string",
            TransformedStringKind::BoolString => "bool-string",
        }
    }
}

/// Closed kind enumeration used for union member keying and for dispatch in
/// the rewrite orchestrator. Union members are keyed by kind: at most one
/// member per kind, by construction.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TypeKind {
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    IntegerString,
    BoolString,
    Array,
    Class,
    Map,
    Enum,
    Union,
}

impl TypeKind {
    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Any => "any",
            TypeKind::Null => "null",
            TypeKind::Bool => "bool",
            TypeKind::Integer => "integer",
            TypeKind::Double => "double",
            TypeKind::String => "string",
            TypeKind::IntegerString => "integer-string",
            TypeKind::BoolString => "bool-string",
            TypeKind::Array => "array",
            TypeKind::Class => "class",
            TypeKind::Map => "map",
            TypeKind::Enum => "enum",
            TypeKind::Union => "union",
        }
    }

    pub fn transformed(self) -> Option<TransformedStringKind> {
        match self {
            TypeKind::IntegerString => Some(TransformedStringKind::IntegerString),
            TypeKind::BoolString => Some(TransformedStringKind::BoolString),
            _ => None,
        }
    }
}

/// A type node. Class and map are opaque to the replacement strategies (both
/// render as "object"), but their children are visible so reconstitution can
/// recurse through them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Type {
    Primitive(PrimKind),
    Array { items: TypeRef },
    Class { properties: BTreeMap<String, TypeRef> },
    Map { values: TypeRef },
    Enum { cases: BTreeSet<String> },
    Union { members: BTreeMap<TypeKind, TypeRef> },
}

impl Type {
    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Primitive(p) => p.kind(),
            Type::Array { .. } => TypeKind::Array,
            Type::Class { .. } => TypeKind::Class,
            Type::Map { .. } => TypeKind::Map,
            Type::Enum { .. } => TypeKind::Enum,
            Type::Union { .. } => TypeKind::Union,
        }
    }

    /// Direct children, in deterministic order.
    pub fn children(&self) -> Vec<TypeRef> {
        match self {
            Type::Primitive(_) => Vec::new(),
            Type::Array { items } => vec![*items],
            Type::Map { values } => vec![*values],
            Type::Class { properties } => properties.values().copied().collect(),
            Type::Enum { .. } => Vec::new(),
            Type::Union { members } => members.values().copied().collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Slot {
    /// Handle allocated, body not yet filled in.
    Reserved,
    Filled(Type),
    /// This slot is an alias for another (degenerate union collapse).
    Forward(TypeRef),
}

/// The arena. Attribute storage is parallel to the slot table; named
/// top-levels are the entry points a rewrite carries over.
#[derive(Clone, Debug, Default)]
pub struct TypeGraph {
    slots: Vec<Slot>,
    attrs: Vec<TypeAttributes>,
    top_levels: BTreeMap<String, TypeRef>,
    lost_type_attributes: bool,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle whose body will be filled in later. Required for
    /// self-referential types: the body may mention the handle it fills.
    pub fn reserve(&mut self) -> TypeRef {
        let r = TypeRef::new(self.slots.len());
        self.slots.push(Slot::Reserved);
        self.attrs.push(TypeAttributes::default());
        r
    }

    /// Fill a previously reserved slot.
    pub fn fill(&mut self, r: TypeRef, ty: Type, attrs: TypeAttributes) {
        match self.slots[r.index()] {
            Slot::Reserved => {
                self.slots[r.index()] = Slot::Filled(ty);
                self.attrs[r.index()] = attrs;
            }
            _ => panic!("type slot {r} filled twice"),
        }
    }

    /// Turn a reserved slot into an alias for `target`.
    pub fn forward(&mut self, r: TypeRef, target: TypeRef) {
        match self.slots[r.index()] {
            Slot::Reserved => self.slots[r.index()] = Slot::Forward(target),
            _ => panic!("type slot {r} forwarded after being filled"),
        }
    }

    pub fn add(&mut self, ty: Type, attrs: TypeAttributes) -> TypeRef {
        let r = self.reserve();
        self.fill(r, ty, attrs);
        r
    }

    /// Follow forward slots to the canonical handle.
    pub fn resolve(&self, mut r: TypeRef) -> TypeRef {
        loop {
            match &self.slots[r.index()] {
                Slot::Forward(next) => r = *next,
                _ => return r,
            }
        }
    }

    pub fn get(&self, r: TypeRef) -> &Type {
        let r = self.resolve(r);
        match &self.slots[r.index()] {
            Slot::Filled(ty) => ty,
            Slot::Reserved => panic!("type slot {r} read before being filled"),
            Slot::Forward(_) => unreachable!(),
        }
    }

    pub fn attributes(&self, r: TypeRef) -> &TypeAttributes {
        let r = self.resolve(r);
        &self.attrs[r.index()]
    }

    pub(crate) fn attributes_mut(&mut self, r: TypeRef) -> &mut TypeAttributes {
        let r = self.resolve(r);
        &mut self.attrs[r.index()]
    }

    /// Every canonical (non-forwarding) slot, in no semantically meaningful
    /// order. Reserved slots are skipped; a finished graph has none.
    pub fn all_type_refs(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Filled(_) => Some(TypeRef::new(i)),
            _ => None,
        })
    }

    pub fn set_top_level(&mut self, name: impl Into<String>, r: TypeRef) {
        self.top_levels.insert(name.into(), r);
    }

    pub fn top_levels(&self) -> &BTreeMap<String, TypeRef> {
        &self.top_levels
    }

    pub fn lost_type_attributes(&self) -> bool {
        self.lost_type_attributes
    }

    pub(crate) fn set_lost_type_attributes(&mut self) {
        self.lost_type_attributes = true;
    }

    pub(crate) fn unfilled_slot(&self) -> Option<TypeRef> {
        self.slots.iter().enumerate().find_map(|(i, s)| match s {
            Slot::Reserved => Some(TypeRef::new(i)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_follows_forward_chains() {
        let mut g = TypeGraph::new();
        let a = g.add(Type::Primitive(PrimKind::Bool), TypeAttributes::default());
        let b = g.reserve();
        let c = g.reserve();
        g.forward(b, a);
        g.forward(c, b);
        assert_eq!(g.resolve(c), a);
        assert!(matches!(g.get(c), Type::Primitive(PrimKind::Bool)));
    }

    #[test]
    fn reserve_then_fill_allows_self_reference() {
        let mut g = TypeGraph::new();
        let class = g.reserve();
        let mut properties = BTreeMap::new();
        properties.insert("next".to_string(), class);
        g.fill(class, Type::Class { properties }, TypeAttributes::default());
        let Type::Class { properties } = g.get(class) else {
            panic!("expected class");
        };
        assert_eq!(properties["next"], class);
    }

    #[test]
    fn enum_cases_iterate_lexicographically() {
        let cases: BTreeSet<String> =
            ["Red", "Blue", "Green"].iter().map(|s| s.to_string()).collect();
        let sorted: Vec<&str> = cases.iter().map(|s| s.as_str()).collect();
        assert_eq!(sorted, vec!["Blue", "Green", "Red"]);
    }

    #[test]
    fn transformed_string_parse_targets() {
        assert_eq!(
            TransformedStringKind::IntegerString.parse_target(),
            PrimKind::Integer
        );
        assert_eq!(TransformedStringKind::BoolString.parse_target(), PrimKind::Bool);
        assert_eq!(PrimKind::Integer.transformed(), None);
    }

    #[test]
    fn all_type_refs_skips_forward_slots() {
        let mut g = TypeGraph::new();
        let a = g.add(Type::Primitive(PrimKind::Null), TypeAttributes::default());
        let b = g.reserve();
        g.forward(b, a);
        let refs: Vec<TypeRef> = g.all_type_refs().collect();
        assert_eq!(refs, vec![a]);
    }
}
