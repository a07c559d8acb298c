//! Isolate-independent value trees.

use crate::buffer::TransferBuffer;
use crate::reference::ReferenceHandle;
use crate::typed_view::EncodedView;
use core_types::ErrorKind;
use isolate::value::same_value_number;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// A value detached from any heap.
///
/// Produced by encoding a [`isolate::Value`] and turned back into one by
/// decoding into any isolate, any number of times. Objects appear at most
/// once; later occurrences of the same object in one tree are
/// [`IsolatedValue::BackRef`]s to the index at which it was first emitted,
/// counting objects in depth-first order.
///
/// Equality is deep, with SameValue semantics for numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IsolatedValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean primitive
    Boolean(bool),
    /// Number
    Number(f64),
    /// Arbitrary precision integer
    BigInt(BigInt),
    /// String
    String(String),
    /// Plain object with its enumerable own properties in own-key order
    Object(Vec<(String, IsolatedValue)>),
    /// Array with its present elements; every other index below `length`
    /// is a hole
    Array {
        /// Value of `length`
        length: u32,
        /// Present elements in ascending index order
        elements: Vec<(u32, IsolatedValue)>,
        /// Enumerable non-index properties
        properties: Vec<(String, IsolatedValue)>,
    },
    /// ArrayBuffer contents
    ArrayBuffer(Vec<u8>),
    /// Typed array or DataView
    View {
        /// Kind, layout and backing buffer
        view: Box<EncodedView>,
        /// Enumerable non-index properties
        properties: Vec<(String, IsolatedValue)>,
    },
    /// Error instance
    Error {
        /// Error category
        kind: ErrorKind,
        /// Value of `name`
        name: String,
        /// Value of `message`
        message: String,
        /// Value of `stack`, when it is a string
        stack: Option<String>,
    },
    /// Opaque handle to a value left in its owner isolate; keeps the
    /// target retained while the tree is alive
    Reference(ReferenceHandle),
    /// Serialized copy carried as an opaque object
    Copy(TransferBuffer),
    /// Object emitted earlier in the same tree
    BackRef(u32),
}

impl IsolatedValue {
    /// Whether this leaf is a primitive.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            IsolatedValue::Undefined
                | IsolatedValue::Null
                | IsolatedValue::Boolean(_)
                | IsolatedValue::Number(_)
                | IsolatedValue::BigInt(_)
                | IsolatedValue::String(_)
        )
    }

    /// `typeof` the decoded value would report.
    pub fn type_of(&self) -> &str {
        match self {
            IsolatedValue::Undefined => "undefined",
            IsolatedValue::Boolean(_) => "boolean",
            IsolatedValue::Number(_) => "number",
            IsolatedValue::BigInt(_) => "bigint",
            IsolatedValue::String(_) => "string",
            IsolatedValue::Reference(handle) => handle.type_of(),
            _ => "object",
        }
    }

    /// Every reference handle in the tree, including those inside nested
    /// copies.
    pub fn references(&self) -> Vec<ReferenceHandle> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references(&self, found: &mut Vec<ReferenceHandle>) {
        let properties = match self {
            IsolatedValue::Reference(handle) => {
                found.push(handle.clone());
                return;
            }
            IsolatedValue::Copy(buffer) => {
                found.extend(buffer.references().iter().cloned());
                return;
            }
            IsolatedValue::Object(properties) => properties,
            IsolatedValue::Array {
                elements,
                properties,
                ..
            } => {
                for (_, element) in elements {
                    element.collect_references(found);
                }
                properties
            }
            IsolatedValue::View { properties, .. } => properties,
            _ => return,
        };
        for (_, value) in properties {
            value.collect_references(found);
        }
    }
}

fn same_properties(a: &[(String, IsolatedValue)], b: &[(String, IsolatedValue)]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
}

impl PartialEq for IsolatedValue {
    fn eq(&self, other: &Self) -> bool {
        use IsolatedValue as V;
        match (self, other) {
            (V::Undefined, V::Undefined) | (V::Null, V::Null) => true,
            (V::Boolean(a), V::Boolean(b)) => a == b,
            (V::Number(a), V::Number(b)) => same_value_number(*a, *b),
            (V::BigInt(a), V::BigInt(b)) => a == b,
            (V::String(a), V::String(b)) => a == b,
            (V::Object(a), V::Object(b)) => same_properties(a, b),
            (
                V::Array {
                    length: la,
                    elements: ea,
                    properties: pa,
                },
                V::Array {
                    length: lb,
                    elements: eb,
                    properties: pb,
                },
            ) => la == lb && ea == eb && same_properties(pa, pb),
            (V::ArrayBuffer(a), V::ArrayBuffer(b)) => a == b,
            (
                V::View {
                    view: va,
                    properties: pa,
                },
                V::View {
                    view: vb,
                    properties: pb,
                },
            ) => va == vb && same_properties(pa, pb),
            (
                V::Error {
                    kind: ka,
                    name: na,
                    message: ma,
                    stack: sa,
                },
                V::Error {
                    kind: kb,
                    name: nb,
                    message: mb,
                    stack: sb,
                },
            ) => ka == kb && na == nb && ma == mb && sa == sb,
            (V::Reference(a), V::Reference(b)) => a == b,
            (V::Copy(a), V::Copy(b)) => a == b,
            (V::BackRef(a), V::BackRef(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for IsolatedValue {
    fn from(b: bool) -> Self {
        IsolatedValue::Boolean(b)
    }
}

impl From<f64> for IsolatedValue {
    fn from(n: f64) -> Self {
        IsolatedValue::Number(n)
    }
}

impl From<&str> for IsolatedValue {
    fn from(s: &str) -> Self {
        IsolatedValue::String(s.to_string())
    }
}

impl From<String> for IsolatedValue {
    fn from(s: String) -> Self {
        IsolatedValue::String(s)
    }
}
