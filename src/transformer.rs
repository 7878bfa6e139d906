//! Transformer IR: the vocabulary of decode-direction instruction nodes, the
//! structural reversal that derives the encode tree from the decode tree, and
//! the `Transformation` pair that carries both.
//!
//! Every node names the type of the value it consumes (`source`); all but the
//! terminal nodes carry an optional continuation. An absent continuation
//! means "the output is the final decoded value". Nodes are built once during
//! the pass and never mutated afterward; the renderer only reads them.
//!
//! Reversal is total over this node set (one rule per kind) and runs in
//! continuation-accumulator form: reversing the chain `a → b → c` produces
//! `rev(c) → rev(b) → rev(a)`, threading the already-reversed prefix through
//! as the accumulated continuation.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::error::TransformError;
use crate::graph::TypeRef;

/// One branch per runtime kind of an untyped value. Exactly one branch fires
/// for any given input; an absent branch means the kind is not part of the
/// union being decoded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BranchSet {
    pub null: Option<Box<Transformer>>,
    pub integer: Option<Box<Transformer>>,
    pub double: Option<Box<Transformer>>,
    pub boolean: Option<Box<Transformer>>,
    pub string: Option<Box<Transformer>>,
    pub array: Option<Box<Transformer>>,
    pub object: Option<Box<Transformer>>,
}

impl BranchSet {
    /// Branches in fixed presentation order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Transformer)> {
        [
            ("null", &self.null),
            ("integer", &self.integer),
            ("double", &self.double),
            ("bool", &self.boolean),
            ("string", &self.string),
            ("array", &self.array),
            ("object", &self.object),
        ]
        .into_iter()
        .filter_map(|(name, b)| b.as_deref().map(|t| (name, t)))
    }

    fn try_map(
        &self,
        mut f: impl FnMut(&Transformer) -> Result<Transformer, TransformError>,
    ) -> Result<BranchSet, TransformError> {
        let mut map = |b: &Option<Box<Transformer>>| -> Result<_, TransformError> {
            Ok(b.as_deref().map(&mut f).transpose()?.map(Box::new))
        };
        Ok(BranchSet {
            null: map(&self.null)?,
            integer: map(&self.integer)?,
            double: map(&self.double)?,
            boolean: map(&self.boolean)?,
            string: map(&self.string)?,
            array: map(&self.array)?,
            object: map(&self.object)?,
        })
    }
}

/// A single decode step. See the module docs for the chain/reversal rules.
#[derive(Clone, Debug, PartialEq)]
pub enum Transformer {
    /// Interpret a raw value of `source` as itself.
    Decode {
        source: TypeRef,
        next: Option<Box<Transformer>>,
    },
    /// Parse a string into a narrower scalar; fails on unparsable input. The
    /// target kind is deliberately not stored here: renderers derive it from
    /// the `UnionInstantiate` continuation's member, or from the enclosing
    /// transformation's target for a bare scalar chain.
    ParseString {
        source: TypeRef,
        next: Option<Box<Transformer>>,
    },
    /// Format a scalar back to text. Only ever synthesized by reversal.
    Stringify {
        source: TypeRef,
        next: Option<Box<Transformer>>,
    },
    /// Proceed only if the input equals `literal` exactly.
    StringMatch {
        source: TypeRef,
        next: Box<Transformer>,
        literal: String,
    },
    /// Ignore the input and emit `literal`.
    StringProduce {
        source: TypeRef,
        next: Option<Box<Transformer>>,
        literal: String,
    },
    /// Try alternatives in order; exactly one is expected to match for valid
    /// input.
    Choice {
        source: TypeRef,
        alternatives: Vec<Transformer>,
    },
    /// Wrap a value as belonging to a specific union member. Terminal.
    UnionInstantiate { member: TypeRef },
    /// Top-level dispatcher over the runtime kind of an untyped value.
    DecodingChoice {
        source: TypeRef,
        branches: BranchSet,
    },
    /// Map `item` over every element, producing an array of `item_target`.
    ArrayDecode {
        source: TypeRef,
        item: Box<Transformer>,
        item_target: TypeRef,
        next: Option<Box<Transformer>>,
    },
}

impl Transformer {
    /// The type of the value this node consumes.
    pub fn source_type(&self) -> TypeRef {
        match self {
            Transformer::Decode { source, .. }
            | Transformer::ParseString { source, .. }
            | Transformer::Stringify { source, .. }
            | Transformer::StringMatch { source, .. }
            | Transformer::StringProduce { source, .. }
            | Transformer::Choice { source, .. }
            | Transformer::DecodingChoice { source, .. }
            | Transformer::ArrayDecode { source, .. } => *source,
            Transformer::UnionInstantiate { member } => *member,
        }
    }

    /// Derive the encode-direction node for this decode tree. `target` is the
    /// type the forward tree produces overall; `continuation` is the
    /// already-reversed prefix of the enclosing chain.
    pub(crate) fn reverse_with(
        &self,
        target: TypeRef,
        continuation: Option<Box<Transformer>>,
    ) -> Result<Transformer, TransformError> {
        match self {
            Transformer::Decode { next, .. } => {
                reverse_producer(next, target, continuation, |source, next| {
                    Transformer::Decode { source, next }
                })
            }
            Transformer::ParseString { next, .. } => {
                reverse_producer(next, target, continuation, |source, next| {
                    Transformer::Stringify { source, next }
                })
            }
            Transformer::Stringify { next, .. } => {
                reverse_producer(next, target, continuation, |source, next| {
                    Transformer::ParseString { source, next }
                })
            }
            Transformer::StringMatch { next, literal, .. } => {
                // "require input equals lit" becomes "emit lit".
                let produce = Transformer::StringProduce {
                    source: next.source_type(),
                    next: continuation,
                    literal: literal.clone(),
                };
                next.reverse_with(target, Some(Box::new(produce)))
            }
            Transformer::StringProduce { next, literal, .. } => {
                // The inverse of "always emit lit" is "accept only lit"; the
                // match needs somewhere to go, so a bare producer at the end
                // of a chain is malformed.
                let continuation = continuation.ok_or(TransformError::Irreversible {
                    reason: "string producer without a continuation",
                })?;
                match next {
                    None => Ok(Transformer::StringMatch {
                        source: target,
                        next: continuation,
                        literal: literal.clone(),
                    }),
                    Some(k) => {
                        let matcher = Transformer::StringMatch {
                            source: k.source_type(),
                            next: continuation,
                            literal: literal.clone(),
                        };
                        k.reverse_with(target, Some(Box::new(matcher)))
                    }
                }
            }
            Transformer::Choice { alternatives, .. } => {
                let alternatives = alternatives
                    .iter()
                    .map(|a| a.reverse_with(target, continuation.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Transformer::Choice {
                    source: target,
                    alternatives,
                })
            }
            Transformer::UnionInstantiate { member } => {
                // Unwrap back to the raw member value.
                Ok(Transformer::Decode {
                    source: *member,
                    next: continuation,
                })
            }
            Transformer::DecodingChoice { branches, .. } => {
                if continuation.is_some() {
                    return Err(TransformError::Irreversible {
                        reason: "decoding choice with a continuation",
                    });
                }
                // Same shape, every branch reversed; encoding dispatches on
                // the type tag carried at runtime.
                Ok(Transformer::DecodingChoice {
                    source: target,
                    branches: branches.try_map(|b| b.reverse_with(target, None))?,
                })
            }
            Transformer::ArrayDecode {
                item,
                item_target,
                next,
                ..
            } => {
                // Map is self-dual: reverse the item transformer and swap the
                // item types.
                let rev_item = Box::new(item.reverse_with(*item_target, None)?);
                let rev_item_target = item.source_type();
                match next {
                    None => Ok(Transformer::ArrayDecode {
                        source: target,
                        item: rev_item,
                        item_target: rev_item_target,
                        next: continuation,
                    }),
                    Some(k) => {
                        let node = Transformer::ArrayDecode {
                            source: k.source_type(),
                            item: rev_item,
                            item_target: rev_item_target,
                            next: continuation,
                        };
                        k.reverse_with(target, Some(Box::new(node)))
                    }
                }
            }
        }
    }
}

/// Shared rule for the identity-shaped producer nodes: the reversal node
/// lands at the end of the reversed chain, consuming either the overall
/// target (no continuation in the forward tree) or the continuation's source.
fn reverse_producer(
    next: &Option<Box<Transformer>>,
    target: TypeRef,
    continuation: Option<Box<Transformer>>,
    make: impl FnOnce(TypeRef, Option<Box<Transformer>>) -> Transformer,
) -> Result<Transformer, TransformError> {
    match next {
        None => Ok(make(target, continuation)),
        Some(k) => {
            let node = make(k.source_type(), continuation);
            k.reverse_with(target, Some(Box::new(node)))
        }
    }
}

impl fmt::Display for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, self, 0)
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, t: &Transformer, indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    match t {
        Transformer::Decode { source, next } => {
            writeln!(f, "{pad}decode {source}")?;
            write_next(f, next, indent)
        }
        Transformer::ParseString { source, next } => {
            writeln!(f, "{pad}parse-string {source}")?;
            write_next(f, next, indent)
        }
        Transformer::Stringify { source, next } => {
            writeln!(f, "{pad}stringify {source}")?;
            write_next(f, next, indent)
        }
        Transformer::StringMatch {
            source,
            next,
            literal,
        } => {
            writeln!(f, "{pad}match {literal:?} {source}")?;
            write_node(f, next, indent + 1)
        }
        Transformer::StringProduce {
            source,
            next,
            literal,
        } => {
            writeln!(f, "{pad}produce {literal:?} {source}")?;
            write_next(f, next, indent)
        }
        Transformer::Choice {
            source,
            alternatives,
        } => {
            writeln!(f, "{pad}choice {source}")?;
            for alt in alternatives {
                write_node(f, alt, indent + 1)?;
            }
            Ok(())
        }
        Transformer::UnionInstantiate { member } => {
            writeln!(f, "{pad}union-instantiate {member}")
        }
        Transformer::DecodingChoice { source, branches } => {
            writeln!(f, "{pad}decoding-choice {source}")?;
            for (name, branch) in branches.iter() {
                writeln!(f, "{pad}  {name}:")?;
                write_node(f, branch, indent + 2)?;
            }
            Ok(())
        }
        Transformer::ArrayDecode {
            source,
            item,
            item_target,
            next,
        } => {
            writeln!(f, "{pad}array-decode {source} -> items {item_target}")?;
            write_node(f, item, indent + 1)?;
            write_next(f, next, indent)
        }
    }
}

fn write_next(
    f: &mut fmt::Formatter<'_>,
    next: &Option<Box<Transformer>>,
    indent: usize,
) -> fmt::Result {
    match next {
        None => Ok(()),
        Some(k) => write_node(f, k, indent + 1),
    }
}

/// The immutable pair attached to a replacement type: the type the decode
/// tree produces plus the forward tree itself. The reverse tree is derived
/// structurally on first use and memoized; it is never recomputed.
#[derive(Debug)]
pub struct Transformation {
    target: TypeRef,
    forward: Transformer,
    reversed: OnceCell<Transformer>,
}

impl PartialEq for Transformation {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.forward == other.forward
    }
}

impl Transformation {
    pub fn new(target: TypeRef, forward: Transformer) -> Self {
        Transformation {
            target,
            forward,
            reversed: OnceCell::new(),
        }
    }

    /// The type the forward tree decodes into (the shape this carrier really
    /// represents).
    pub fn target_type(&self) -> TypeRef {
        self.target
    }

    pub fn forward(&self) -> &Transformer {
        &self.forward
    }

    /// The encode tree, computed at most once per transformation.
    pub fn reverse(&self) -> Result<&Transformer, TransformError> {
        self.reversed
            .get_or_try_init(|| self.forward.reverse_with(self.target, None))
    }
}

/// Test-only interpreter over `serde_json::Value`, modeling what generated
/// code would do with these trees. The pass itself never executes a
/// transformer; this exists so the round-trip properties can be exercised.
#[cfg(test)]
pub(crate) mod eval {
    use serde_json::Value;

    use super::{Transformation, Transformer};
    use crate::graph::{TypeGraph, TypeKind, TypeRef};

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub enum Direction {
        Decode,
        Encode,
    }

    pub fn run(
        graph: &TypeGraph,
        t: &Transformer,
        dir: Direction,
        value: &Value,
    ) -> Option<Value> {
        run_to(graph, t, dir, value, None)
    }

    /// `target` is the enclosing transformation's target when known; parse
    /// strictness derives from it where no union member continuation names
    /// the kind.
    fn run_to(
        graph: &TypeGraph,
        t: &Transformer,
        dir: Direction,
        value: &Value,
        target: Option<TypeRef>,
    ) -> Option<Value> {
        match t {
            Transformer::Decode { next, .. } => run_next(graph, next, dir, value.clone(), target),
            Transformer::ParseString { next, .. } => {
                let s = value.as_str()?;
                let kind = match next.as_deref() {
                    Some(Transformer::UnionInstantiate { member }) => {
                        Some(graph.get(*member).kind())
                    }
                    _ => target.map(|r| graph.get(r).kind()),
                };
                // Parse strictly per the member/target kind, as generated
                // code does; a tree with neither in sight accepts any scalar
                // text.
                let parsed = match kind {
                    Some(TypeKind::Integer) => Value::from(s.parse::<i64>().ok()?),
                    Some(TypeKind::Bool) => Value::from(s.parse::<bool>().ok()?),
                    Some(TypeKind::Double) => Value::from(s.parse::<f64>().ok()?),
                    _ => {
                        if let Ok(i) = s.parse::<i64>() {
                            Value::from(i)
                        } else if let Ok(b) = s.parse::<bool>() {
                            Value::from(b)
                        } else if let Ok(x) = s.parse::<f64>() {
                            Value::from(x)
                        } else {
                            return None;
                        }
                    }
                };
                run_next(graph, next, dir, parsed, target)
            }
            Transformer::Stringify { next, .. } => {
                let text = match value {
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::String(s) => s.clone(),
                    _ => return None,
                };
                run_next(graph, next, dir, Value::from(text), target)
            }
            Transformer::StringMatch { next, literal, .. } => {
                if value.as_str()? == literal {
                    run_to(graph, next, dir, value, target)
                } else {
                    None
                }
            }
            Transformer::StringProduce { next, literal, .. } => {
                run_next(graph, next, dir, Value::from(literal.clone()), target)
            }
            Transformer::Choice { alternatives, .. } => alternatives
                .iter()
                .find_map(|a| run_to(graph, a, dir, value, target)),
            Transformer::UnionInstantiate { .. } => Some(value.clone()),
            Transformer::DecodingChoice { branches, .. } => {
                let branch = match value {
                    Value::Null => branches.null.as_deref(),
                    Value::Bool(_) => branches.boolean.as_deref(),
                    Value::Number(n) if n.is_i64() || n.is_u64() => branches.integer.as_deref(),
                    Value::Number(_) => branches.double.as_deref(),
                    Value::String(_) => branches.string.as_deref(),
                    Value::Array(_) => branches.array.as_deref(),
                    Value::Object(_) => branches.object.as_deref(),
                };
                run_to(graph, branch?, dir, value, target)
            }
            Transformer::ArrayDecode {
                item,
                item_target,
                next,
                ..
            } => {
                let xs = value.as_array()?;
                let mut out = Vec::with_capacity(xs.len());
                for el in xs {
                    let mut v = el.clone();
                    // Encoding an element whose type sits behind a carrier
                    // applies the carrier's reverse first.
                    if dir == Direction::Encode {
                        if let Some(t9n) =
                            graph.attributes(item.source_type()).transformation()
                        {
                            v = run_to(graph, t9n.reverse().ok()?, dir, &v, None)?;
                        }
                    }
                    v = run_to(graph, item, dir, &v, None)?;
                    // Decoding into a carrier item applies the carrier's own
                    // transformation, exactly as generated code does.
                    if dir == Direction::Decode {
                        if let Some(t9n) = graph.attributes(*item_target).transformation() {
                            v = run_to(graph, t9n.forward(), dir, &v, Some(t9n.target_type()))?;
                        }
                    }
                    out.push(v);
                }
                run_next(graph, next, dir, Value::from(out), target)
            }
        }
    }

    fn run_next(
        graph: &TypeGraph,
        next: &Option<Box<Transformer>>,
        dir: Direction,
        value: Value,
        target: Option<TypeRef>,
    ) -> Option<Value> {
        match next {
            None => Some(value),
            Some(k) => run_to(graph, k, dir, &value, target),
        }
    }

    /// Decode `raw`, then encode the result back. Returns (decoded, encoded).
    pub fn round_trip(
        graph: &TypeGraph,
        t9n: &Transformation,
        raw: &Value,
    ) -> Option<(Value, Value)> {
        let decoded = run_to(
            graph,
            t9n.forward(),
            Direction::Decode,
            raw,
            Some(t9n.target_type()),
        )?;
        let encoded = run_to(graph, t9n.reverse().ok()?, Direction::Encode, &decoded, None)?;
        Some((decoded, encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::eval::{round_trip, run, Direction};
    use super::*;
    use crate::attributes::TypeAttributes;
    use crate::graph::{PrimKind, Type, TypeGraph};
    use serde_json::json;

    fn scalar_graph() -> (TypeGraph, TypeRef, TypeRef) {
        let mut g = TypeGraph::new();
        let string = g.add(Type::Primitive(PrimKind::String), TypeAttributes::default());
        let integer = g.add(Type::Primitive(PrimKind::Integer), TypeAttributes::default());
        (g, string, integer)
    }

    fn parse_chain(string: TypeRef) -> Transformer {
        Transformer::Decode {
            source: string,
            next: Some(Box::new(Transformer::ParseString {
                source: string,
                next: None,
            })),
        }
    }

    #[test]
    fn parse_chain_reverses_to_stringify_then_decode() {
        let (_g, string, integer) = scalar_graph();
        let reversed = parse_chain(string).reverse_with(integer, None).unwrap();
        assert_eq!(
            reversed,
            Transformer::Stringify {
                source: integer,
                next: Some(Box::new(Transformer::Decode {
                    source: string,
                    next: None,
                })),
            }
        );
    }

    #[test]
    fn scalar_transformation_round_trips() {
        let (g, string, integer) = scalar_graph();
        let t9n = Transformation::new(integer, parse_chain(string));
        let (decoded, encoded) = round_trip(&g, &t9n, &json!("42")).unwrap();
        assert_eq!(decoded, json!(42));
        assert_eq!(encoded, json!("42"));
    }

    #[test]
    fn unparsable_input_is_a_decode_failure() {
        let (g, string, _integer) = scalar_graph();
        let forward = parse_chain(string);
        assert_eq!(run(&g, &forward, Direction::Decode, &json!("forty-two")), None);
        assert_eq!(run(&g, &forward, Direction::Decode, &json!(17)), None);
    }

    #[test]
    fn match_and_produce_are_mutual_inverses() {
        let (_g, string, target) = scalar_graph();
        let forward = Transformer::StringMatch {
            source: string,
            next: Box::new(Transformer::StringProduce {
                source: string,
                next: None,
                literal: "on".to_string(),
            }),
            literal: "on".to_string(),
        };
        let reversed = forward.reverse_with(target, None).unwrap();
        // "require then emit" flips into "require then emit" the other way
        // around: the reverse must still only accept the literal.
        let Transformer::StringMatch { source, next, literal } = reversed else {
            panic!("expected string match at the head of the reverse");
        };
        assert_eq!(source, target);
        assert_eq!(literal, "on");
        let Transformer::StringProduce { literal, .. } = *next else {
            panic!("expected string produce after the match");
        };
        assert_eq!(literal, "on");
    }

    #[test]
    fn bare_string_producer_is_irreversible() {
        let (_g, string, target) = scalar_graph();
        let t = Transformer::StringProduce {
            source: string,
            next: None,
            literal: "x".to_string(),
        };
        let err = t.reverse_with(target, None).unwrap_err();
        assert!(matches!(err, TransformError::Irreversible { .. }));
    }

    #[test]
    fn reverse_is_memoized_per_transformation() {
        let (_g, string, integer) = scalar_graph();
        let t9n = Transformation::new(integer, parse_chain(string));
        let first = t9n.reverse().unwrap() as *const Transformer;
        let second = t9n.reverse().unwrap() as *const Transformer;
        assert_eq!(first, second);
    }

    #[test]
    fn choice_reversal_preserves_alternative_order() {
        let (_g, string, target) = scalar_graph();
        let case = |lit: &str| Transformer::StringMatch {
            source: string,
            next: Box::new(Transformer::StringProduce {
                source: string,
                next: None,
                literal: lit.to_string(),
            }),
            literal: lit.to_string(),
        };
        let forward = Transformer::Choice {
            source: string,
            alternatives: vec![case("Blue"), case("Red")],
        };
        let Transformer::Choice { alternatives, .. } =
            forward.reverse_with(target, None).unwrap()
        else {
            panic!("expected choice");
        };
        let literals: Vec<&str> = alternatives
            .iter()
            .map(|a| match a {
                Transformer::StringMatch { literal, .. } => literal.as_str(),
                _ => panic!("expected string match alternatives"),
            })
            .collect();
        assert_eq!(literals, vec!["Blue", "Red"]);
    }

    #[test]
    fn array_decode_reversal_swaps_item_types() {
        let (mut g, string, integer) = scalar_graph();
        let any = g.add(Type::Primitive(PrimKind::Any), TypeAttributes::default());
        let arr_any = g.add(Type::Array { items: any }, TypeAttributes::default());
        let arr_real = g.add(Type::Array { items: string }, TypeAttributes::default());
        let forward = Transformer::ArrayDecode {
            source: arr_any,
            item: Box::new(Transformer::Decode {
                source: any,
                next: None,
            }),
            item_target: string,
            next: None,
        };
        let Transformer::ArrayDecode {
            source,
            item,
            item_target,
            next,
        } = forward.reverse_with(arr_real, None).unwrap()
        else {
            panic!("expected array decode");
        };
        assert_eq!(source, arr_real);
        assert_eq!(item_target, any);
        assert_eq!(next, None);
        assert_eq!(
            *item,
            Transformer::Decode {
                source: string,
                next: None,
            }
        );
        let _ = integer;
    }

    #[test]
    fn display_renders_an_indented_tree() {
        let (_g, string, _integer) = scalar_graph();
        let text = parse_chain(string).to_string();
        assert!(text.starts_with("decode #0"));
        assert!(text.contains("\n  parse-string #0"));
    }
}
