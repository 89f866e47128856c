use crate::config::PlannerConfig;
use crate::data::{
    Level, LevelCounts, LeveledSubject, Room, RoomHost, RoomId, RoutingPolicy, Student, StudentId,
};
use crate::demand::{DemandRemap, remap_demand};
use crate::error::PlannerError;
use crate::hosts::{HostAssignment, assign_hosts};
use itertools::Itertools;
use log::{info, trace};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Where every student would sit for one subject block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub placements: BTreeMap<StudentId, RoomId>,
    /// Headcount per room once everyone is placed.
    pub occupancy: BTreeMap<RoomId, usize>,
    /// Students who must stay home because their level has no room.
    pub forced_stays: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMapRow {
    pub room_id: RoomId,
    pub room_name: String,
    pub grade: u8,
    pub host: RoomHost,
    pub fixed: bool,
    pub stay: usize,
    pub in_count: usize,
    pub out_count: usize,
    pub effective_count: usize,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorstRoom {
    pub room_id: RoomId,
    pub effective: usize,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMapSummary {
    pub stay: usize,
    #[serde(rename = "move")]
    pub moves: usize,
    pub forced_stays: usize,
    pub worst_room: Option<WorstRoom>,
}

/// Host map plus the movement it causes, for one leveled subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMapPreview {
    pub subject: LeveledSubject,
    pub host_by_room: BTreeMap<RoomId, RoomHost>,
    pub rows: Vec<RoomMapRow>,
    pub summary: RoomMapSummary,
    pub level_demand: LevelCounts,
    pub levels_running: Vec<Level>,
    pub rooms_needed: LevelCounts,
    pub placements: BTreeMap<StudentId, RoomId>,
}

/// Places students into the rooms hosting their effective level.
///
/// Students are visited in id order. A student stays home when done with the
/// subject or when their home room already hosts their level; otherwise they take
/// the hosting room with the most capacity left, lowest id first.
pub fn simulate_placement(
    remap: &DemandRemap,
    hosts: &HostAssignment,
    students: &[Student],
    rooms: &[Room],
) -> Placement {
    let capacity: HashMap<RoomId, usize> =
        rooms.iter().map(|r| (r.id, r.capacity as usize)).collect();
    let mut occupancy: BTreeMap<RoomId, usize> = rooms.iter().map(|r| (r.id, 0)).collect();
    let mut placements = BTreeMap::new();
    let mut forced_stays = 0;

    for student in students.iter().sorted_by(|a, b| a.id.cmp(&b.id)) {
        let target = place_student(remap, hosts, student, &capacity, &occupancy);
        let room_id = match target {
            Some(room_id) => room_id,
            None => {
                if !student.has_completed(remap.subject) {
                    forced_stays += 1;
                    trace!("{} has no {} room and stays home", student.id, remap.subject);
                }
                student.homeroom
            }
        };
        placements.insert(student.id.clone(), room_id);
        *occupancy.entry(room_id).or_insert(0) += 1;
    }

    Placement {
        placements,
        occupancy,
        forced_stays,
    }
}

// None means the student stays home without a hosting room
fn place_student(
    remap: &DemandRemap,
    hosts: &HostAssignment,
    student: &Student,
    capacity: &HashMap<RoomId, usize>,
    occupancy: &BTreeMap<RoomId, usize>,
) -> Option<RoomId> {
    if student.has_completed(remap.subject) {
        return None;
    }
    let level = remap.effective_level(student);
    if !remap.is_running(level) {
        return None;
    }
    if hosts.host(student.homeroom) == Some(RoomHost::Level(level)) {
        return Some(student.homeroom);
    }
    hosts.rooms_hosting(level).min_by_key(|room_id| {
        let cap = capacity.get(room_id).copied().unwrap_or(0) as i64;
        let used = occupancy.get(room_id).copied().unwrap_or(0) as i64;
        (Reverse(cap - used), *room_id)
    })
}

/// Runs the demand remap, host assignment and placement for one subject.
///
/// Fails when the policy would orphan students or there are no rooms.
pub fn build_room_map(
    subject: LeveledSubject,
    students: &[Student],
    rooms: &[Room],
    policy: &RoutingPolicy,
    overrides: &BTreeMap<RoomId, RoomHost>,
    config: &PlannerConfig,
) -> Result<RoomMapPreview, PlannerError> {
    let remap = remap_demand(students, subject, policy);
    remap.ensure_routable()?;
    let hosts = assign_hosts(&remap, students, rooms, overrides, config)?;
    let placement = simulate_placement(&remap, &hosts, students, rooms);

    let home: HashMap<&str, RoomId> =
        students.iter().map(|s| (s.id.as_str(), s.homeroom)).collect();
    let rows: Vec<RoomMapRow> = rooms
        .iter()
        .sorted_by_key(|room| room.id)
        .filter_map(|room| {
            let host = hosts.host(room.id)?;
            let (mut stay, mut in_count, mut out_count) = (0, 0, 0);
            for (student_id, target) in &placement.placements {
                let home_room = home.get(student_id.as_str()).copied();
                match (home_room == Some(room.id), *target == room.id) {
                    (true, true) => stay += 1,
                    (false, true) => in_count += 1,
                    (true, false) => out_count += 1,
                    (false, false) => {}
                }
            }
            Some(RoomMapRow {
                room_id: room.id,
                room_name: room.name.clone(),
                grade: room.grade,
                host,
                fixed: hosts.fixed_rooms.contains(&room.id),
                stay,
                in_count,
                out_count,
                effective_count: placement.occupancy.get(&room.id).copied().unwrap_or(0),
                capacity: room.capacity,
            })
        })
        .collect();

    let mut worst_room: Option<WorstRoom> = None;
    for row in &rows {
        if worst_room.is_none_or(|w| row.effective_count > w.effective) {
            worst_room = Some(WorstRoom {
                room_id: row.room_id,
                effective: row.effective_count,
                capacity: row.capacity,
            });
        }
    }
    let summary = RoomMapSummary {
        stay: rows.iter().map(|r| r.stay).sum(),
        moves: rows.iter().map(|r| r.out_count).sum(),
        forced_stays: placement.forced_stays,
        worst_room,
    };

    info!(
        "{} room map: {} stay, {} move, {} forced stays",
        subject, summary.stay, summary.moves, summary.forced_stays
    );

    Ok(RoomMapPreview {
        subject,
        host_by_room: hosts.host_by_room,
        rows,
        summary,
        level_demand: remap.effective,
        levels_running: remap.levels_running,
        rooms_needed: hosts.rooms_needed,
        placements: placement.placements,
    })
}
