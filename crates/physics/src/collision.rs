//! Collision groups, collider tags and pair filtering.

use rapier3d::prelude::*;
use std::collections::HashSet;

/// Collision groups for different body categories.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionGroup {
    /// Static environment (ground, decor, porch, house body)
    Environment = 1 << 0,
    /// Roof panels and the snow layers sitting on them
    Surface = 1 << 1,
    /// Falling snow clumps
    Clump = 1 << 2,
    /// Cornice segments, snow blocks and their broken pieces
    Segment = 1 << 3,
}

impl CollisionGroup {
    /// Create a collision group for environment.
    pub fn environment() -> (Group, Group) {
        let membership = Group::from_bits_retain(Self::Environment as u32);
        let filter = Group::ALL;
        (membership, filter)
    }

    /// Create a collision group for roof surfaces.
    pub fn surface() -> (Group, Group) {
        let membership = Group::from_bits_retain(Self::Surface as u32);
        let filter = Group::ALL;
        (membership, filter)
    }

    /// Clumps never collide with each other, which keeps simultaneous
    /// avalanche spawns from jittering against one another.
    pub fn clump() -> (Group, Group) {
        let membership = Group::from_bits_retain(Self::Clump as u32);
        let filter = Group::from_bits_retain(
            Self::Environment as u32 | Self::Surface as u32 | Self::Segment as u32,
        );
        (membership, filter)
    }

    /// Create a collision group for cornice segments and blocks.
    pub fn segment() -> (Group, Group) {
        let membership = Group::from_bits_retain(Self::Segment as u32);
        let filter = Group::ALL;
        (membership, filter)
    }
}

/// What a collider represents. Replaces matching on scene object names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColliderTag {
    Ground,
    Decor,
    Porch,
    /// House body / walls: solid, but not somewhere snow settles.
    Structure,
    /// Bare roof panel.
    Roof,
    /// Snow layer collider of a surface snow field.
    SnowSurface,
    Clump,
    Cornice,
    Block,
}

impl ColliderTag {
    /// A clump touching one of these has landed.
    pub fn is_landing_target(self) -> bool {
        matches!(self, ColliderTag::Ground | ColliderTag::Decor | ColliderTag::Porch)
    }

    /// Roof category. Contacts with these never count as a landing.
    pub fn is_roof(self) -> bool {
        matches!(self, ColliderTag::Roof | ColliderTag::SnowSurface)
    }

    pub fn groups(self) -> InteractionGroups {
        let (membership, filter) = match self {
            ColliderTag::Ground | ColliderTag::Decor | ColliderTag::Porch | ColliderTag::Structure => {
                CollisionGroup::environment()
            }
            ColliderTag::Roof | ColliderTag::SnowSurface => CollisionGroup::surface(),
            ColliderTag::Clump => CollisionGroup::clump(),
            ColliderTag::Cornice | ColliderTag::Block => CollisionGroup::segment(),
        };
        InteractionGroups::new(membership, filter)
    }

    /// Dynamic categories opt into pair filtering so individual pairs can
    /// be switched off at runtime.
    pub fn filters_contacts(self) -> bool {
        matches!(self, ColliderTag::Clump | ColliderTag::Cornice | ColliderTag::Block)
    }
}

/// Collider pairs whose contacts are dropped by the solver.
#[derive(Debug, Default)]
pub struct IgnoredPairs {
    pairs: HashSet<((u32, u32), (u32, u32))>,
}

impl IgnoredPairs {
    fn key(a: ColliderHandle, b: ColliderHandle) -> ((u32, u32), (u32, u32)) {
        let (ka, kb) = (a.into_raw_parts(), b.into_raw_parts());
        if ka <= kb {
            (ka, kb)
        } else {
            (kb, ka)
        }
    }

    pub fn insert(&mut self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.pairs.insert(Self::key(a, b))
    }

    pub fn contains(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.pairs.contains(&Self::key(a, b))
    }

    /// Forget every pair involving `handle` (called when its body is removed).
    pub fn forget(&mut self, handle: ColliderHandle) {
        let raw = handle.into_raw_parts();
        self.pairs.retain(|(a, b)| *a != raw && *b != raw);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl PhysicsHooks for IgnoredPairs {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        if self.contains(context.collider1, context.collider2) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clumps_do_not_interact_with_clumps() {
        let clump = ColliderTag::Clump.groups();
        assert!(!clump.test(clump), "clump vs clump must be filtered");
        assert!(clump.test(ColliderTag::Ground.groups()));
        assert!(clump.test(ColliderTag::SnowSurface.groups()));
        assert!(clump.test(ColliderTag::Cornice.groups()));
    }

    #[test]
    fn ignored_pairs_are_order_independent() {
        let a = ColliderHandle::from_raw_parts(1, 0);
        let b = ColliderHandle::from_raw_parts(7, 2);
        let mut pairs = IgnoredPairs::default();
        assert!(pairs.insert(b, a));
        assert!(pairs.contains(a, b));
        assert!(!pairs.insert(a, b), "same pair inserted twice");
        pairs.forget(a);
        assert!(pairs.is_empty());
    }
}
