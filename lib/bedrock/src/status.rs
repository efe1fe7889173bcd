//! The status space: every recoverable error in the substrate is one of
//! these kinds, carried by value.
//!
//! Programmer errors (invariant violations) are deliberately *not* here as
//! return values; they panic, naming the kind in the message.

use std::fmt;

/// Error kinds shared across the substrate and its collaborators.
///
/// The discriminants form a single signed 32-bit status space so the kinds
/// can cross FFI-ish boundaries by value; [`Status::code`] exposes them.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// An argument failed validation.
    InvalidParameter = -1,
    /// The operation is not legal in the object's current state.
    InvalidStateTransition = -2,
    /// An allocation or a thread spawn failed.
    InsufficientResources = -3,
    /// The operation lost the race with a shutdown already in progress.
    ShutdownInProgress = -4,
    /// The named entity does not exist.
    NotFound = -5,
    /// The object has already been run down; it will never accept work again.
    TooLate = -6,
    /// A growth operation hit a configured upper bound.
    QuotaExceeded = -7,
    /// An arithmetic operation would overflow.
    IntegerOverflow = -8,
    /// A lock was released by something that does not own it.
    MutantNotOwned = -9,
    /// A buffer boundary was violated (allocator header corruption).
    BufferOverflow = -10,
}

impl Status {
    /// The raw value of this kind in the signed 32-bit status space.
    pub fn code(self) -> i32 {
        self as i32
    }

    fn as_str(self) -> &'static str {
        match self {
            Status::InvalidParameter => "invalid parameter",
            Status::InvalidStateTransition => "invalid state transition",
            Status::InsufficientResources => "insufficient resources",
            Status::ShutdownInProgress => "shutdown in progress",
            Status::NotFound => "not found",
            Status::TooLate => "too late",
            Status::QuotaExceeded => "quota exceeded",
            Status::IntegerOverflow => "integer overflow",
            Status::MutantNotOwned => "mutant not owned",
            Status::BufferOverflow => "buffer overflow",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_distinct() {
        let kinds = [
            Status::InvalidParameter,
            Status::InvalidStateTransition,
            Status::InsufficientResources,
            Status::ShutdownInProgress,
            Status::NotFound,
            Status::TooLate,
            Status::QuotaExceeded,
            Status::IntegerOverflow,
            Status::MutantNotOwned,
            Status::BufferOverflow,
        ];

        for (i, kind) in kinds.iter().enumerate() {
            assert_eq!(kind.code(), -(i as i32) - 1);
        }
    }

    #[test]
    fn display_names_the_kind_and_code() {
        assert_eq!(
            Status::ShutdownInProgress.to_string(),
            "shutdown in progress (-4)"
        );
    }
}
