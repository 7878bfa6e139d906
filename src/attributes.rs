//! Type attributes: an associative, mergeable bag of metadata keyed by
//! attribute kind. Combine is commutative and associative per key, so merge
//! order never changes the result.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::transformer::Transformation;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum AttrKind {
    Description,
    Transformation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Free-form descriptions; combine is set union.
    Descriptions(BTreeSet<String>),
    /// The synthesized transformation. Attached to exactly one replacement
    /// type; combining two distinct transformations is an internal defect.
    Transformation(Arc<Transformation>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeAttributes {
    entries: BTreeMap<AttrKind, AttrValue>,
}

impl TypeAttributes {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        let entry = self
            .entries
            .entry(AttrKind::Description)
            .or_insert_with(|| AttrValue::Descriptions(BTreeSet::new()));
        let AttrValue::Descriptions(set) = entry else {
            unreachable!("description key holds non-description value");
        };
        set.insert(text.into());
        self
    }

    pub fn with_transformation(mut self, t: Arc<Transformation>) -> Self {
        self.entries
            .insert(AttrKind::Transformation, AttrValue::Transformation(t));
        self
    }

    pub fn descriptions(&self) -> Option<&BTreeSet<String>> {
        match self.entries.get(&AttrKind::Description) {
            Some(AttrValue::Descriptions(set)) => Some(set),
            _ => None,
        }
    }

    pub fn transformation(&self) -> Option<&Arc<Transformation>> {
        match self.entries.get(&AttrKind::Transformation) {
            Some(AttrValue::Transformation(t)) => Some(t),
            _ => None,
        }
    }

    /// Merge two bags. Per-key combine: descriptions union; transformations
    /// must not conflict (they are never shared across distinct types, so two
    /// different values meeting here indicates a pass bug).
    pub fn combine(mut self, other: &TypeAttributes) -> Self {
        for (kind, value) in &other.entries {
            match self.entries.get_mut(kind) {
                None => {
                    self.entries.insert(*kind, value.clone());
                }
                Some(existing) => match (existing, value) {
                    (AttrValue::Descriptions(a), AttrValue::Descriptions(b)) => {
                        a.extend(b.iter().cloned());
                    }
                    (AttrValue::Transformation(a), AttrValue::Transformation(b)) => {
                        assert!(
                            Arc::ptr_eq(a, b) || **a == **b,
                            "combined two distinct transformations"
                        );
                    }
                    _ => unreachable!("attribute kind key maps to mismatched value"),
                },
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_unions_descriptions() {
        let a = TypeAttributes::default().with_description("first");
        let b = TypeAttributes::default()
            .with_description("second")
            .with_description("first");
        let ab = a.clone().combine(&b);
        let ba = b.combine(&a);
        assert_eq!(ab, ba);
        let set = ab.descriptions().unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("first") && set.contains("second"));
    }

    #[test]
    fn empty_bag_reports_nothing() {
        let attrs = TypeAttributes::default();
        assert!(attrs.is_empty());
        assert!(attrs.descriptions().is_none());
        assert!(attrs.transformation().is_none());
    }
}
