//! The in-memory [`Source`] abstraction: the fact or intent a [sourced
//! entity](crate::entity) folds into its state and that a
//! [`Journal`](crate::journal::Journal) persists through an adapter.

use std::fmt::Debug;

/// A [`Source`] (the spec calls it a "Record") is an immutable fact that has
/// been, or will be, appended to a stream.
///
/// Records are compared by `(concrete type, identity)`, not by structural
/// equality of their payload -- two `Deposit(10)` events with different
/// identities are different records. Implementations get this for free as
/// long as `identity()` is stable for the same logical occurrence.
pub trait Source: Debug + Send + Sync {
    /// Creation timestamp of this record, in epoch milliseconds.
    fn created_at(&self) -> i64;

    /// Type-version of this record's shape, starting at 1. Bumped whenever
    /// the payload shape changes in a way that requires upcasting.
    fn type_version(&self) -> u32 {
        1
    }

    /// The record's type name, as derived from its concrete Rust type.
    /// Implementors typically return `std::any::type_name::<Self>()`'s last
    /// path segment, or a fixed string for a hand-rolled enum variant.
    fn type_name(&self) -> &'static str;

    /// Optional identity for this occurrence. Empty by default.
    fn identity(&self) -> String {
        String::new()
    }
}

/// Extension of [`Source`] for records that track an explicit identity and,
/// optionally, a parent identity (e.g. a line item referencing its order).
pub trait Identified: Source {
    /// The unique identity of this record.
    fn identity(&self) -> String;

    /// The identity of a logically-parent record, if any.
    fn parent_identity(&self) -> Option<String> {
        None
    }
}

/// Distinguished "no record" value, used to fill empty slots in typed
/// sequences (e.g. a fixed-size window of "last N events" that hasn't been
/// fully populated yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullRecord;

impl Source for NullRecord {
    fn created_at(&self) -> i64 {
        0
    }

    fn type_version(&self) -> u32 {
        0
    }

    fn type_name(&self) -> &'static str {
        "null-record"
    }

    fn identity(&self) -> String {
        String::new()
    }
}

/// Returns `true` if two records refer to the same logical occurrence,
/// i.e. same concrete type name and same identity.
pub fn same_occurrence(a: &dyn Source, b: &dyn Source) -> bool {
    a.type_name() == b.type_name() && Source::identity(a) == Source::identity(b)
}
