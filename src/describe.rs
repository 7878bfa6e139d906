//! Graph documents: a JSON description format for type graphs, used by the
//! CLI to feed the pass and to print its result.
//!
//! Input documents name their top-level types; nested types are written
//! inline and `{"kind": "ref", "name": ...}` points back at a named type, so
//! recursive shapes are expressible. Export is a flat table keyed by slot
//! handle, with synthesized transformations rendered as indented trees.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::attributes::TypeAttributes;
use crate::graph::{PrimKind, Type, TypeGraph, TypeKind, TypeRef};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TypeDesc {
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    IntegerString,
    BoolString,
    Array { items: Box<TypeDesc> },
    Class { properties: IndexMap<String, TypeDesc> },
    Map { values: Box<TypeDesc> },
    Enum { cases: Vec<String> },
    Union { members: Vec<TypeDesc> },
    Ref { name: String },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NamedType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub desc: TypeDesc,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GraphDoc {
    pub types: IndexMap<String, NamedType>,
}

/// Deserialize with JSON-path context in error messages.
pub fn load_doc(src: &str) -> Result<GraphDoc> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, GraphDoc>(de).map_err(|err| {
        let path = err.path().to_string();
        anyhow!("at JSON path {path} -> {}", err.into_inner())
    })
}

/// Build the arena graph from a document. Named types are reserved up front
/// and filled in a second pass, so references may point forward or at the
/// type currently being built.
pub fn build_graph(doc: &GraphDoc) -> Result<TypeGraph> {
    let mut g = TypeGraph::new();
    let mut named: BTreeMap<String, TypeRef> = BTreeMap::new();
    for name in doc.types.keys() {
        let r = g.reserve();
        named.insert(name.clone(), r);
        g.set_top_level(name.clone(), r);
    }
    for (name, entry) in &doc.types {
        if matches!(entry.desc, TypeDesc::Ref { .. }) {
            bail!("top-level type `{name}` cannot be a bare reference");
        }
        let ty = build_type(&mut g, doc, &named, &entry.desc)
            .with_context(|| format!("building top-level type `{name}`"))?;
        let attrs = match &entry.description {
            Some(d) => TypeAttributes::default().with_description(d),
            None => TypeAttributes::default(),
        };
        g.fill(named[name], ty, attrs);
    }
    Ok(g)
}

fn build_type(
    g: &mut TypeGraph,
    doc: &GraphDoc,
    named: &BTreeMap<String, TypeRef>,
    desc: &TypeDesc,
) -> Result<Type> {
    Ok(match desc {
        TypeDesc::Any => Type::Primitive(PrimKind::Any),
        TypeDesc::Null => Type::Primitive(PrimKind::Null),
        TypeDesc::Bool => Type::Primitive(PrimKind::Bool),
        TypeDesc::Integer => Type::Primitive(PrimKind::Integer),
        TypeDesc::Double => Type::Primitive(PrimKind::Double),
        TypeDesc::String => Type::Primitive(PrimKind::String),
        TypeDesc::IntegerString => Type::Primitive(PrimKind::IntegerString),
        TypeDesc::BoolString => Type::Primitive(PrimKind::BoolString),
        TypeDesc::Array { items } => Type::Array {
            items: build_ref(g, doc, named, items)?,
        },
        TypeDesc::Map { values } => Type::Map {
            values: build_ref(g, doc, named, values)?,
        },
        TypeDesc::Class { properties } => {
            let mut built = BTreeMap::new();
            for (prop, child) in properties {
                built.insert(prop.clone(), build_ref(g, doc, named, child)?);
            }
            Type::Class { properties: built }
        }
        TypeDesc::Enum { cases } => Type::Enum {
            cases: cases.iter().cloned().collect::<BTreeSet<String>>(),
        },
        TypeDesc::Union { members } => {
            let mut built = BTreeMap::new();
            for member in members {
                let kind = desc_kind(doc, member)?;
                let r = build_ref(g, doc, named, member)?;
                if built.insert(kind, r).is_some() {
                    bail!("union has two members of kind `{}`", kind.name());
                }
            }
            Type::Union { members: built }
        }
        TypeDesc::Ref { .. } => bail!("a reference is not a type body"),
    })
}

fn build_ref(
    g: &mut TypeGraph,
    doc: &GraphDoc,
    named: &BTreeMap<String, TypeRef>,
    desc: &TypeDesc,
) -> Result<TypeRef> {
    match desc {
        TypeDesc::Ref { name } => named
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("unknown type reference `{name}`")),
        _ => {
            let ty = build_type(g, doc, named, desc)?;
            Ok(g.add(ty, TypeAttributes::default()))
        }
    }
}

/// The kind a member description denotes, following references through the
/// named table. Hop-bounded so a cycle of bare references is an error rather
/// than a hang.
fn desc_kind(doc: &GraphDoc, desc: &TypeDesc) -> Result<TypeKind> {
    let mut desc = desc;
    let mut hops = 0usize;
    while let TypeDesc::Ref { name } = desc {
        hops += 1;
        if hops > doc.types.len() {
            bail!("reference cycle through `{name}`");
        }
        desc = &doc
            .types
            .get(name)
            .ok_or_else(|| anyhow!("unknown type reference `{name}`"))?
            .desc;
    }
    Ok(match desc {
        TypeDesc::Any => TypeKind::Any,
        TypeDesc::Null => TypeKind::Null,
        TypeDesc::Bool => TypeKind::Bool,
        TypeDesc::Integer => TypeKind::Integer,
        TypeDesc::Double => TypeKind::Double,
        TypeDesc::String => TypeKind::String,
        TypeDesc::IntegerString => TypeKind::IntegerString,
        TypeDesc::BoolString => TypeKind::BoolString,
        TypeDesc::Array { .. } => TypeKind::Array,
        TypeDesc::Class { .. } => TypeKind::Class,
        TypeDesc::Map { .. } => TypeKind::Map,
        TypeDesc::Enum { .. } => TypeKind::Enum,
        TypeDesc::Union { .. } => TypeKind::Union,
        TypeDesc::Ref { .. } => unreachable!("references resolved above"),
    })
}

/// Render a finished graph as a flat JSON table: top-level bindings, one
/// entry per canonical slot, transformations with both direction trees.
pub fn export_graph(graph: &TypeGraph) -> Result<Value> {
    let mut types = Vec::new();
    for r in graph.all_type_refs() {
        let mut entry = serde_json::Map::new();
        entry.insert("ref".to_string(), json!(r.to_string()));
        entry.insert("type".to_string(), describe_type(graph, graph.get(r)));
        let attrs = graph.attributes(r);
        if let Some(ds) = attrs.descriptions() {
            entry.insert("descriptions".to_string(), json!(ds));
        }
        if let Some(t9n) = attrs.transformation() {
            entry.insert(
                "transformation".to_string(),
                json!({
                    "target": t9n.target_type().to_string(),
                    "forward": t9n.forward().to_string(),
                    "reverse": t9n.reverse()?.to_string(),
                }),
            );
        }
        types.push(Value::Object(entry));
    }
    let top_levels: serde_json::Map<String, Value> = graph
        .top_levels()
        .iter()
        .map(|(name, &r)| (name.clone(), json!(graph.resolve(r).to_string())))
        .collect();
    Ok(json!({
        "top-levels": top_levels,
        "lost-type-attributes": graph.lost_type_attributes(),
        "types": types,
    }))
}

fn describe_type(graph: &TypeGraph, ty: &Type) -> Value {
    let handle = |r: TypeRef| json!(graph.resolve(r).to_string());
    match ty {
        Type::Primitive(p) => json!({ "kind": p.kind().name() }),
        Type::Array { items } => json!({ "kind": "array", "items": handle(*items) }),
        Type::Map { values } => json!({ "kind": "map", "values": handle(*values) }),
        Type::Class { properties } => {
            let props: serde_json::Map<String, Value> = properties
                .iter()
                .map(|(name, &r)| (name.clone(), handle(r)))
                .collect();
            json!({ "kind": "class", "properties": props })
        }
        Type::Enum { cases } => json!({ "kind": "enum", "cases": cases }),
        Type::Union { members } => {
            let members: serde_json::Map<String, Value> = members
                .iter()
                .map(|(kind, &r)| (kind.name().to_string(), handle(r)))
                .collect();
            json!({ "kind": "union", "members": members })
        }
    }
}
