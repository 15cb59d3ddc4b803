//! Fixed-capacity point-sample pool shared by surface snow and the ground sink.
//!
//! Slots are never compacted or reordered. Killing a sample zeroes its
//! remaining lifetime and clears its liveness flag; the slot is reused by a
//! later emission. Handles are plain slot indices and stay valid for the
//! lifetime of the store.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// One point sample. `#[repr(C)]` + `Pod` so a renderer can upload the
/// whole slot array as-is.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SnowParticle {
    pub position: Vec3,
    pub remaining_lifetime: f32,
    pub size: f32,
    alive: u32,
}

impl SnowParticle {
    pub fn new(position: Vec3, lifetime: f32, size: f32) -> Self {
        Self {
            position,
            remaining_lifetime: lifetime,
            size,
            alive: u32::from(lifetime > 0.0),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive != 0
    }

    fn kill(&mut self) {
        self.remaining_lifetime = 0.0;
        self.alive = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleHandle(u32);

impl ParticleHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct ParticleStore {
    slots: Vec<SnowParticle>,
    capacity: usize,
    live: usize,
    /// Lowest slot index that might be free.
    free_hint: usize,
}

impl ParticleStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            live: 0,
            free_hint: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live samples.
    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn is_full(&self) -> bool {
        self.live >= self.capacity
    }

    /// Insert a sample into the first dead slot. Returns `None` when full or
    /// when `lifetime` is not positive.
    pub fn emit(&mut self, position: Vec3, lifetime: f32, size: f32) -> Option<ParticleHandle> {
        if lifetime <= 0.0 || self.is_full() {
            return None;
        }
        let particle = SnowParticle::new(position, lifetime, size);
        let index = match self.slots[self.free_hint..].iter().position(|p| !p.is_alive()) {
            Some(offset) => {
                let index = self.free_hint + offset;
                self.slots[index] = particle;
                index
            }
            None => {
                self.slots.push(particle);
                self.slots.len() - 1
            }
        };
        self.free_hint = index + 1;
        self.live += 1;
        Some(ParticleHandle(index as u32))
    }

    pub fn get(&self, handle: ParticleHandle) -> Option<&SnowParticle> {
        self.slots.get(handle.index()).filter(|p| p.is_alive())
    }

    pub fn kill(&mut self, handle: ParticleHandle) -> bool {
        let index = handle.index();
        match self.slots.get_mut(index) {
            Some(p) if p.is_alive() => {
                p.kill();
                self.live -= 1;
                self.free_hint = self.free_hint.min(index);
                true
            }
            _ => false,
        }
    }

    /// Kill every live sample matching `predicate`. Returns how many died.
    pub fn kill_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&SnowParticle) -> bool,
    {
        let mut killed = 0;
        let mut first = None;
        for (i, p) in self.slots.iter_mut().enumerate() {
            if p.is_alive() && predicate(p) {
                p.kill();
                killed += 1;
                first.get_or_insert(i);
            }
        }
        self.live -= killed;
        if let Some(i) = first {
            self.free_hint = self.free_hint.min(i);
        }
        killed
    }

    /// Kill every live sample within `radius` of `center` (same space as the samples).
    pub fn kill_within(&mut self, center: Vec3, radius: f32) -> usize {
        let r2 = radius * radius;
        self.kill_where(|p| p.position.distance_squared(center) < r2)
    }

    pub fn kill_all(&mut self) -> usize {
        self.kill_where(|_| true)
    }

    /// Count down lifetimes and kill what expires.
    pub fn age(&mut self, dt: f32) -> usize {
        for p in self.slots.iter_mut().filter(|p| p.is_alive()) {
            p.remaining_lifetime -= dt;
        }
        self.kill_where(|p| p.remaining_lifetime <= 0.0)
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (ParticleHandle, &SnowParticle)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_alive())
            .map(|(i, p)| (ParticleHandle(i as u32), p))
    }

    /// Every slot, dead ones included, in slot order.
    pub fn slots(&self) -> &[SnowParticle] {
        &self.slots
    }

    /// The slot array as raw bytes for bulk upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_respects_capacity() {
        let mut store = ParticleStore::with_capacity(3);
        for i in 0..5 {
            store.emit(Vec3::splat(i as f32), 1.0, 0.05);
        }
        assert_eq!(store.live_count(), 3);
        assert!(store.is_full());
    }

    #[test]
    fn dead_slots_are_reused_in_place() {
        let mut store = ParticleStore::with_capacity(4);
        let handles: Vec<_> = (0..4)
            .filter_map(|i| store.emit(Vec3::new(i as f32, 0.0, 0.0), 10.0, 0.05))
            .collect();
        assert!(store.kill(handles[1]));
        assert!(!store.kill(handles[1]), "second kill of the same slot is a no-op");
        assert_eq!(store.get(handles[1]), None);

        let reused = store.emit(Vec3::new(9.0, 0.0, 0.0), 10.0, 0.05);
        assert_eq!(reused, Some(handles[1]));
        assert_eq!(store.slots().len(), 4, "store never grows past its slots");
    }

    #[test]
    fn kill_within_only_touches_samples_inside_radius() {
        let mut store = ParticleStore::with_capacity(16);
        for i in 0..10 {
            store.emit(Vec3::new(i as f32 * 0.1, 0.0, 0.0), 10.0, 0.05);
        }
        let before = store.live_count();
        let killed = store.kill_within(Vec3::ZERO, 0.25);
        assert_eq!(killed, 3);
        assert_eq!(store.live_count(), before - 3);
        assert!(store
            .slots()
            .iter()
            .filter(|p| !p.is_alive())
            .all(|p| p.remaining_lifetime == 0.0));
    }

    #[test]
    fn aging_expires_short_lived_samples() {
        let mut store = ParticleStore::with_capacity(4);
        store.emit(Vec3::ZERO, 0.1, 0.05);
        store.emit(Vec3::ONE, 5.0, 0.05);
        assert_eq!(store.age(0.2), 1);
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn byte_view_covers_every_slot() {
        let mut store = ParticleStore::with_capacity(2);
        store.emit(Vec3::ZERO, 1.0, 0.05);
        store.emit(Vec3::ONE, 1.0, 0.05);
        assert_eq!(store.as_bytes().len(), 2 * std::mem::size_of::<SnowParticle>());
    }
}
