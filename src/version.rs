//! Optimistic concurrency control: stream versions and the expected-version
//! sentinels accepted by every [`Journal`](crate::journal::Journal) append
//! variant.

/// A 1-based stream version, or a global position. Both are modeled as
/// `u64`; the type alias exists purely for readability at call sites.
pub type Version = u64;

/// Expected-version sentinel accepted by all `append*` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip the concurrency check entirely; assign `current + 1`.
    Any,

    /// Succeed only if the stream has never held a visible entry.
    NoStream,

    /// Succeed only if the stream currently holds at least one visible entry.
    StreamExists,

    /// Require that the stream's current version is exactly this value.
    Concrete(Version),
}

impl ExpectedVersion {
    /// Validates `self` against a stream's current version, returning the
    /// version the append should use for the *first* new entry (i.e.
    /// `current + 1`) or `None` if the check fails.
    pub fn check(self, current: Version) -> Option<Version> {
        let satisfied = match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => current == 0,
            ExpectedVersion::StreamExists => current > 0,
            ExpectedVersion::Concrete(v) => v == current + 1,
        };

        satisfied.then_some(current + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_always_succeeds() {
        assert_eq!(ExpectedVersion::Any.check(0), Some(1));
        assert_eq!(ExpectedVersion::Any.check(41), Some(42));
    }

    #[test]
    fn no_stream_requires_empty_stream() {
        assert_eq!(ExpectedVersion::NoStream.check(0), Some(1));
        assert_eq!(ExpectedVersion::NoStream.check(1), None);
    }

    #[test]
    fn stream_exists_requires_non_empty_stream() {
        assert_eq!(ExpectedVersion::StreamExists.check(0), None);
        assert_eq!(ExpectedVersion::StreamExists.check(3), Some(4));
    }

    #[test]
    fn concrete_requires_exact_next_version() {
        assert_eq!(ExpectedVersion::Concrete(6).check(5), Some(6));
        assert_eq!(ExpectedVersion::Concrete(6).check(4), None);
        assert_eq!(ExpectedVersion::Concrete(6).check(6), None);
    }
}
