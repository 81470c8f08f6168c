//! Opaque position + orientation value.
//!
//! The core consumes placements verbatim and imposes no validity constraints
//! beyond "constructible default"; the algebra lives in `glam`.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub pos: Vec3,
    pub rot: Quat,
}

impl Placement {
    pub const IDENTITY: Self = Self {
        pos: Vec3::ZERO,
        rot: Quat::IDENTITY,
    };

    pub fn new(pos: Vec3, rot: Quat) -> Self {
        Self { pos, rot }
    }

    pub fn from_pos(pos: Vec3) -> Self {
        Self {
            pos,
            rot: Quat::IDENTITY,
        }
    }

    pub fn from_rot(rot: Quat) -> Self {
        Self {
            pos: Vec3::ZERO,
            rot,
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let p = Placement::default();
        assert_eq!(p.pos, Vec3::ZERO);
        assert_eq!(p.rot, Quat::IDENTITY);
    }

    #[test]
    fn serde_roundtrip() {
        let p = Placement::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_z(0.3));
        let json = serde_json::to_string(&p).unwrap();
        let back: Placement = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
