// diff.rs: Semantic comparison of day collections.
//
// Two collections are equal when they hold the same multiset of
// (category, quantity, note) triples. Record ids and list order do not
// matter, and an absent collection is equal to an empty one. Equality is
// decided on a canonical Signature; content hashes are SHA-256 over the
// signature's text form, so equal collections always hash the same.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use crate::hasher::hash_str;
use crate::op::StagedOp;
use crate::record::{is_empty_collection, Record};

/// Quantities are compared at thousandth precision.
const QUANTITY_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Triple {
    category: String,
    quantity: Quantity,
    note: String,
}

impl Triple {
    fn of(record: &Record) -> Self {
        Self {
            category: record.category.clone(),
            quantity: quantize(record.quantity),
            note: record.note.clone(),
        }
    }
}

/// A quantity as compared. Values whose thousandths do not fit an `i64`
/// are compared by their exact bit pattern instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Quantity {
    Thousandths(i64),
    Exact(u64),
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thousandths(n) => write!(f, "{}", n),
            Self::Exact(bits) => write!(f, "x{:016x}", bits),
        }
    }
}

/// Non-finite quantities count as zero.
fn quantize(quantity: f64) -> Quantity {
    if !quantity.is_finite() {
        return Quantity::Thousandths(0);
    }
    let scaled = (quantity * QUANTITY_SCALE).round();
    // `i64::MAX as f64` is 2^63, one past the largest i64.
    if scaled >= i64::MIN as f64 && scaled < i64::MAX as f64 {
        Quantity::Thousandths(scaled as i64)
    } else {
        Quantity::Exact(quantity.to_bits())
    }
}

/// Order- and identity-independent form of a day collection.
///
/// Holds each distinct triple once, sorted, with the number of records
/// that folded into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    folded: Vec<(Triple, usize)>,
}

impl Signature {
    /// Stable text rendering; the input to [`Signature::hash`].
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        for (triple, count) in &self.folded {
            // Debug formatting quotes and escapes the strings, so no
            // category or note can forge a separator.
            let _ = write!(
                out,
                "{}*{:?}|{}|{:?};",
                count, triple.category, triple.quantity, triple.note
            );
        }
        out
    }

    /// Lowercase hex SHA-256 of the canonical text.
    pub fn hash(&self) -> String {
        hash_str(&self.to_canonical_string())
    }
}

/// Build the canonical signature of a collection. `None` and `Some(&[])`
/// produce the same (empty) signature.
pub fn canonicalize(records: Option<&[Record]>) -> Signature {
    let mut counts: BTreeMap<Triple, usize> = BTreeMap::new();
    for record in records.unwrap_or_default() {
        *counts.entry(Triple::of(record)).or_default() += 1;
    }
    Signature {
        folded: counts.into_iter().collect(),
    }
}

/// Semantic equality of two collections.
pub fn equal(a: Option<&[Record]>, b: Option<&[Record]>) -> bool {
    if is_empty_collection(a) && is_empty_collection(b) {
        return true;
    }
    canonicalize(a) == canonicalize(b)
}

/// Content hash of a collection (hex SHA-256 of its signature).
pub fn content_hash(records: Option<&[Record]>) -> String {
    canonicalize(records).hash()
}

/// Classify a draft against its base, resolving to `Noop` when the two are
/// semantically equal.
pub fn classify(base: Option<&[Record]>, draft: Option<&[Record]>) -> StagedOp {
    if equal(base, draft) {
        return StagedOp::Noop;
    }
    StagedOp::from_shape(is_empty_collection(base), is_empty_collection(draft))
}
