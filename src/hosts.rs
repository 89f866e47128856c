use crate::config::{ALTERNATE_TRACK_GRADE, PlannerConfig};
use crate::data::{Level, LevelCounts, LeveledSubject, Room, RoomHost, RoomId, Student};
use crate::demand::DemandRemap;
use crate::error::PlannerError;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One host per room for a leveled subject block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAssignment {
    pub host_by_room: BTreeMap<RoomId, RoomHost>,
    /// Rooms each running level was sized to after any reduction.
    pub rooms_needed: LevelCounts,
    /// Rooms pinned to the Tahsili track for this subject.
    pub fixed_rooms: BTreeSet<RoomId>,
}

impl HostAssignment {
    pub fn host(&self, room_id: RoomId) -> Option<RoomHost> {
        self.host_by_room.get(&room_id).copied()
    }

    pub fn rooms_hosting(&self, level: Level) -> impl Iterator<Item = RoomId> + '_ {
        self.host_by_room
            .iter()
            .filter(move |(_, host)| **host == RoomHost::Level(level))
            .map(|(room, _)| *room)
    }
}

/// Rooms of the alternate-track grade sit out Qudrat subjects.
pub fn is_fixed_room(subject: LeveledSubject, room: &Room) -> bool {
    subject.is_qudrat() && room.grade == ALTERNATE_TRACK_GRADE
}

/// `max(1, ceil(demand / ideal))` for every running level with demand.
pub fn rooms_needed(remap: &DemandRemap, ideal_capacity: usize) -> LevelCounts {
    let mut needed = LevelCounts::default();
    for level in &remap.levels_running {
        let demand = remap.effective[*level];
        if demand > 0 {
            needed[*level] = demand.div_ceil(ideal_capacity).max(1);
        }
    }
    needed
}

// students left over if `level` lost one of its rooms
fn overflow_after_removal(demand: usize, rooms: usize, ideal_capacity: usize) -> usize {
    demand.saturating_sub((rooms - 1) * ideal_capacity)
}

/// Takes rooms away until the plan fits, always from the level that overflows least.
///
/// A level never drops below one room. If every level is already at one room the
/// plan is left over-sized and the greedy pass simply runs out of rooms.
pub fn shrink_to_fit(
    needed: &mut LevelCounts,
    remap: &DemandRemap,
    available: usize,
    ideal_capacity: usize,
) {
    let mut total = needed.total();
    while total > available {
        let reducible = remap
            .levels_running
            .iter()
            .copied()
            .filter(|level| needed[*level] > 1)
            .min_by_key(|level| {
                let demand = remap.effective[*level];
                (
                    overflow_after_removal(demand, needed[*level], ideal_capacity),
                    demand,
                    *level,
                )
            });
        let Some(level) = reducible else {
            warn!(
                "{} needs {} rooms but only {} are available; nothing left to reduce",
                remap.subject, total, available
            );
            break;
        };
        needed[level] -= 1;
        total -= 1;
        debug!("Dropped one {} room for {}", level, remap.subject);
    }
}

// home-room headcount per effective level, for candidate rooms only
fn room_level_counts(
    remap: &DemandRemap,
    students: &[Student],
    candidates: &[&Room],
) -> HashMap<RoomId, LevelCounts> {
    let mut counts: HashMap<RoomId, LevelCounts> = candidates
        .iter()
        .map(|room| (room.id, LevelCounts::default()))
        .collect();
    for student in students {
        if student.has_completed(remap.subject) {
            continue;
        }
        if let Some(room_counts) = counts.get_mut(&student.homeroom) {
            room_counts[remap.effective_level(student)] += 1;
        }
    }
    counts
}

fn pick_best_room(
    candidates: &[&Room],
    assigned: &BTreeSet<RoomId>,
    counts: &HashMap<RoomId, LevelCounts>,
    level: Level,
) -> Option<RoomId> {
    candidates
        .iter()
        .filter(|room| !assigned.contains(&room.id))
        .min_by_key(|room| {
            let here = counts.get(&room.id).map(|c| c[level]).unwrap_or(0);
            (Reverse(here), room.id)
        })
        .map(|room| room.id)
}

/// Assigns every room a host level for `remap.subject`.
///
/// Levels are placed in descending demand order, each room going to where most of
/// that level's students already sit. Leftover rooms take the top-demand level, and
/// manual overrides are applied last when they name a running level on a movable room.
pub fn assign_hosts(
    remap: &DemandRemap,
    students: &[Student],
    rooms: &[Room],
    overrides: &BTreeMap<RoomId, RoomHost>,
    config: &PlannerConfig,
) -> Result<HostAssignment, PlannerError> {
    if rooms.is_empty() {
        return Err(PlannerError::EmptyRoomInventory);
    }
    let subject = remap.subject;
    let ideal = config.ideal_capacity();

    let candidates: Vec<&Room> = rooms
        .iter()
        .filter(|room| !is_fixed_room(subject, room))
        .sorted_by_key(|room| room.id)
        .collect();
    let counts = room_level_counts(remap, students, &candidates);

    let mut needed = rooms_needed(remap, ideal);
    shrink_to_fit(&mut needed, remap, candidates.len(), ideal);

    // stable, so equal demand keeps L1..L3 order
    let level_order: Vec<Level> = remap
        .levels_running
        .iter()
        .copied()
        .sorted_by_key(|level| Reverse(remap.effective[*level]))
        .collect();

    let mut host_by_room = BTreeMap::new();
    let mut assigned = BTreeSet::new();
    for level in &level_order {
        for _ in 0..needed[*level] {
            let Some(room_id) = pick_best_room(&candidates, &assigned, &counts, *level) else {
                break;
            };
            host_by_room.insert(room_id, RoomHost::Level(*level));
            assigned.insert(room_id);
        }
    }

    let fallback = level_order.first().copied().unwrap_or(Level::L2);
    for room in &candidates {
        host_by_room
            .entry(room.id)
            .or_insert(RoomHost::Level(fallback));
    }

    let fixed_rooms: BTreeSet<RoomId> = rooms
        .iter()
        .filter(|room| is_fixed_room(subject, room))
        .map(|room| room.id)
        .collect();
    for room_id in &fixed_rooms {
        host_by_room.insert(*room_id, RoomHost::AutoTahsili);
    }

    for room in rooms {
        let Some(host) = overrides.get(&room.id) else {
            continue;
        };
        match host {
            RoomHost::Level(level)
                if remap.is_running(*level) && !fixed_rooms.contains(&room.id) =>
            {
                host_by_room.insert(room.id, *host);
            }
            _ => debug!("Ignoring host override {} for room {}", host, room.id),
        }
    }

    info!(
        "Assigned hosts for {} across {} rooms (needed {:?})",
        subject,
        rooms.len(),
        needed
    );

    Ok(HostAssignment {
        host_by_room,
        rooms_needed: needed,
        fixed_rooms,
    })
}
