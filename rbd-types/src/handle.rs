//! Generation-checked handles for bodies and joints.
//!
//! Entities live in slot-based registries inside the world. A handle names
//! a slot plus the generation it was created under; a handle whose
//! generation no longer matches the slot resolves to nothing instead of
//! aliasing whatever was allocated there later.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle to a rigid body in a world.
///
/// Handles stay valid until the body is destroyed. After destruction the
/// slot may be reused, but the stale handle will no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

impl BodyHandle {
    /// Create a handle from raw parts.
    ///
    /// Normally handles come from the world's `add_body`; this exists for
    /// serialization round-trips and tests.
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the body registry.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation this handle was issued under.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({}v{})", self.index, self.generation)
    }
}

/// Handle to a joint in a world.
///
/// Same contract as [`BodyHandle`]: destroying the joint invalidates the
/// handle even if the slot is later reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointHandle {
    index: u32,
    generation: u32,
}

impl JointHandle {
    /// Create a handle from raw parts.
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the joint registry.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation this handle was issued under.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for JointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({}v{})", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_round_trip() {
        let h = BodyHandle::from_raw(7, 3);
        assert_eq!(h.index(), 7);
        assert_eq!(h.generation(), 3);
        assert_eq!(h.to_string(), "Body(7v3)");
    }

    #[test]
    fn test_generation_distinguishes_handles() {
        let old = JointHandle::from_raw(0, 1);
        let reused = JointHandle::from_raw(0, 2);
        assert_ne!(old, reused);
    }

    #[test]
    fn test_handles_are_ordered() {
        let a = BodyHandle::from_raw(1, 0);
        let b = BodyHandle::from_raw(2, 0);
        assert!(a < b);
    }
}
