// sv_lag_history.rs -- per-slot history of entity transforms and animation
//
// Every tracked slot owns a LagTrack: records ordered newest first, one per
// distinct simulation time, trimmed by age in sv_lag_record.

use std::collections::VecDeque;

use lagcomp_common::common::com_dprintf;
use lagcomp_common::q_shared::{Vec3, MAX_OVERLAYS};

use crate::sv_lag_world::{SubjectId, SubjectKind};

/// Runaway-growth ceiling for a single track.
pub const MAX_TRACK_RECORDS: usize = 1000;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LagFlags: u32 {
        const ALIVE             = 1 << 0;
        const ORIGIN_CHANGED    = 1 << 8;
        const ANGLES_CHANGED    = 1 << 9;
        const SIZE_CHANGED      = 1 << 10;
        const ANIMATION_CHANGED = 1 << 11;
    }
}

impl LagFlags {
    /// Bits describing attributes a rewind modified.
    pub const CHANGE_MASK: LagFlags = LagFlags::ORIGIN_CHANGED
        .union(LagFlags::ANGLES_CHANGED)
        .union(LagFlags::SIZE_CHANGED)
        .union(LagFlags::ANIMATION_CHANGED);
}

/// One animation overlay layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayerRecord {
    pub sequence: i32,
    pub cycle: f32,
    pub weight: f32,
    pub order: i32,
}

/// One historical sample of a subject.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LagRecord {
    pub flags: LagFlags,
    pub simulation_time: f32,
    pub origin: Vec3,
    pub angles: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub layers: [LayerRecord; MAX_OVERLAYS],
    pub layer_count: usize,
    pub master_sequence: i32,
    pub master_cycle: f32,
}

impl Default for LagRecord {
    fn default() -> Self {
        Self {
            flags: LagFlags::empty(),
            simulation_time: 0.0,
            origin: [0.0; 3],
            angles: [0.0; 3],
            mins: [0.0; 3],
            maxs: [0.0; 3],
            layers: [LayerRecord::default(); MAX_OVERLAYS],
            layer_count: 0,
            master_sequence: 0,
            master_cycle: 0.0,
        }
    }
}

impl LagRecord {
    pub fn is_alive(&self) -> bool {
        self.flags.contains(LagFlags::ALIVE)
    }

    /// Layers actually carried by this record.
    pub fn active_layers(&self) -> &[LayerRecord] {
        &self.layers[..self.layer_count.min(MAX_OVERLAYS)]
    }
}

// ============================================================
// LagTrack
// ============================================================

#[derive(Clone, Debug, Default)]
pub struct LagTrack {
    records: VecDeque<LagRecord>,
}

impl LagTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Newest record.
    pub fn head(&self) -> Option<&LagRecord> {
        self.records.front()
    }

    /// Oldest record.
    pub fn tail(&self) -> Option<&LagRecord> {
        self.records.back()
    }

    /// Records from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &LagRecord> {
        self.records.iter()
    }

    /// Drop records older than `dead_time` from the tail. Returns how many went.
    pub fn evict_older_than(&mut self, dead_time: f32) -> usize {
        let mut removed = 0;
        while let Some(tail) = self.records.back() {
            // if tail is within limits, stop
            if tail.simulation_time >= dead_time {
                break;
            }
            self.records.pop_back();
            removed += 1;
        }
        removed
    }

    /// Add a record at the head. Records not strictly newer than the current
    /// head are refused so bracket searches never see equal timestamps.
    pub fn push_head(&mut self, record: LagRecord) -> bool {
        if let Some(head) = self.records.front() {
            if head.simulation_time >= record.simulation_time {
                return false;
            }
        }

        if self.records.len() >= MAX_TRACK_RECORDS {
            com_dprintf(&format!(
                "LagTrack: {} records, dropping oldest (t={:.3})\n",
                self.records.len(),
                self.records.back().map_or(0.0, |r| r.simulation_time)
            ));
            self.records.pop_back();
        }

        self.records.push_front(record);
        true
    }
}

// ============================================================
// SlotTable -- dense per-slot storage for players and npcs
// ============================================================

#[derive(Clone, Debug, Default)]
pub struct SlotTable<T> {
    players: Vec<T>,
    npcs: Vec<T>,
}

impl<T: Default + Clone> SlotTable<T> {
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
            npcs: Vec::new(),
        }
    }

    /// Grow or shrink to match the world's slot counts. New slots are default.
    pub fn resize(&mut self, players: usize, npcs: usize) {
        self.players.resize(players, T::default());
        self.npcs.resize(npcs, T::default());
    }

    pub fn get(&self, id: SubjectId) -> Option<&T> {
        match id.kind {
            SubjectKind::Player => self.players.get(id.slot),
            SubjectKind::Npc => self.npcs.get(id.slot),
        }
    }

    pub fn get_mut(&mut self, id: SubjectId) -> Option<&mut T> {
        match id.kind {
            SubjectKind::Player => self.players.get_mut(id.slot),
            SubjectKind::Npc => self.npcs.get_mut(id.slot),
        }
    }

    pub fn player_slots(&self) -> usize {
        self.players.len()
    }

    pub fn npc_slots(&self) -> usize {
        self.npcs.len()
    }

    /// Every slot id, players first.
    pub fn ids(&self) -> impl Iterator<Item = SubjectId> {
        (0..self.players.len())
            .map(SubjectId::player)
            .chain((0..self.npcs.len()).map(SubjectId::npc))
    }

    /// Reset every entry to its default.
    pub fn fill_default(&mut self) {
        self.players.iter_mut().for_each(|v| *v = T::default());
        self.npcs.iter_mut().for_each(|v| *v = T::default());
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.players.iter_mut().chain(self.npcs.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(time: f32, x: f32) -> LagRecord {
        LagRecord {
            flags: LagFlags::ALIVE,
            simulation_time: time,
            origin: [x, 0.0, 0.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_push_head_orders_newest_first() {
        let mut track = LagTrack::new();
        assert!(track.push_head(record_at(1.0, 0.0)));
        assert!(track.push_head(record_at(1.1, 1.0)));
        assert!(track.push_head(record_at(1.2, 2.0)));

        let times: Vec<f32> = track.iter().map(|r| r.simulation_time).collect();
        assert_eq!(times, vec![1.2, 1.1, 1.0]);
        assert_eq!(track.head().map(|r| r.origin[0]), Some(2.0));
        assert_eq!(track.tail().map(|r| r.origin[0]), Some(0.0));
    }

    #[test]
    fn test_push_head_refuses_duplicate_time() {
        let mut track = LagTrack::new();
        assert!(track.push_head(record_at(2.0, 0.0)));
        assert!(!track.push_head(record_at(2.0, 5.0)));
        assert!(!track.push_head(record_at(1.5, 5.0)));
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_evict_older_than() {
        let mut track = LagTrack::new();
        for i in 0..10 {
            track.push_head(record_at(i as f32 * 0.1, i as f32));
        }
        let removed = track.evict_older_than(0.45);
        assert_eq!(removed, 5);
        assert!(track.tail().is_some_and(|r| r.simulation_time >= 0.45));
        assert_eq!(track.len(), 5);
    }

    #[test]
    fn test_track_ceiling_drops_oldest() {
        let mut track = LagTrack::new();
        for i in 0..(MAX_TRACK_RECORDS + 5) {
            track.push_head(record_at(i as f32, 0.0));
        }
        assert_eq!(track.len(), MAX_TRACK_RECORDS);
        assert_eq!(track.tail().map(|r| r.simulation_time), Some(5.0));
    }

    #[test]
    fn test_slot_table_addresses_kinds_separately() {
        let mut table: SlotTable<i32> = SlotTable::new();
        table.resize(2, 3);
        *table.get_mut(SubjectId::player(1)).unwrap() = 7;
        *table.get_mut(SubjectId::npc(1)).unwrap() = 9;
        assert_eq!(table.get(SubjectId::player(1)), Some(&7));
        assert_eq!(table.get(SubjectId::npc(1)), Some(&9));
        assert_eq!(table.get(SubjectId::player(2)), None);
        assert_eq!(table.ids().count(), 5);
        table.fill_default();
        assert_eq!(table.get(SubjectId::npc(1)), Some(&0));
    }

    #[test]
    fn test_active_layers_capped() {
        let mut record = record_at(0.0, 0.0);
        record.layer_count = 3;
        assert_eq!(record.active_layers().len(), 3);
        record.layer_count = MAX_OVERLAYS + 4;
        assert_eq!(record.active_layers().len(), MAX_OVERLAYS);
    }
}
