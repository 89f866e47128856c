use crate::config::{ALTERNATE_TRACK_GRADE, PlannerConfig};
use crate::data::{
    Assignments, Catalog, Course, CourseId, Day, Grade, Level, LevelCounts, LeveledSubject,
    MoveResolutions, RoomHost, RoomId, RoutingPolicy, SLOTS, Student, Subject, Timeslot, Whitelist,
};
use crate::error::PlannerError;
use crate::placement::{RoomMapPreview, build_room_map};
use crate::resolver::{UnplacedMove, auto_resolve};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// The three levels of one leveled subject running side by side in one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamGroup {
    pub id: String,
    pub subject: LeveledSubject,
    pub slot: Timeslot,
    pub slot_label: String,
    pub pattern: String,
    /// Sorted L1, L2, L3.
    pub courses: Vec<Course>,
}

impl StreamGroup {
    pub fn course_for(&self, level: Level) -> Option<&Course> {
        self.courses.iter().find(|c| c.level == Some(level))
    }
}

/// Groups leveled courses by subject and first slot, keeping only complete streams.
pub fn build_stream_groups(courses: &[Course]) -> Vec<StreamGroup> {
    let mut groups = Vec::new();
    for subject in LeveledSubject::ALL {
        let mut by_slot: BTreeMap<Timeslot, Vec<&Course>> = BTreeMap::new();
        for course in courses.iter().filter(|c| c.subject == subject.subject()) {
            if let Some(slot) = course.first_slot() {
                by_slot.entry(slot).or_default().push(course);
            }
        }

        for (slot, members) in by_slot {
            let levels: BTreeSet<Level> = members.iter().filter_map(|c| c.level).collect();
            if members.len() != 3 || levels.len() != 3 {
                debug!(
                    "Skipping incomplete {} stream at slot {} ({} courses)",
                    subject,
                    slot,
                    members.len()
                );
                continue;
            }
            let slot_label = SLOTS
                .iter()
                .find(|s| s.id == slot)
                .map(|s| s.start.to_string())
                .unwrap_or_else(|| slot.to_string());
            groups.push(StreamGroup {
                id: format!("sg-{}-{}", subject.subject().key(), slot),
                subject,
                slot,
                slot_label,
                pattern: members[0].pattern.clone(),
                courses: members
                    .into_iter()
                    .sorted_by_key(|c| c.level)
                    .cloned()
                    .collect(),
            });
        }
    }
    groups
}

/// Everything the campus planner needs to seed a weekly grid.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampusPlan {
    /// Selected stream group id per leveled subject.
    pub streams: BTreeMap<LeveledSubject, String>,
    pub policies: BTreeMap<LeveledSubject, RoutingPolicy>,
    pub host_overrides: BTreeMap<LeveledSubject, BTreeMap<RoomId, RoomHost>>,
    /// Grade-wide course chosen per grade and subject.
    pub grade_courses: BTreeMap<Grade, BTreeMap<Subject, CourseId>>,
}

impl CampusPlan {
    pub fn policy(&self, subject: LeveledSubject) -> RoutingPolicy {
        self.policies.get(&subject).copied().unwrap_or_default()
    }
}

fn find_stream<'g>(
    groups: &'g [StreamGroup],
    subject: LeveledSubject,
    id: &str,
) -> Result<&'g StreamGroup, PlannerError> {
    groups
        .iter()
        .find(|g| g.subject == subject && g.id == id)
        .ok_or_else(|| PlannerError::UnknownStreamGroup(id.to_string()))
}

/// Courses allowed to run: running levels of each selected stream plus the grade-wide picks.
pub fn build_campus_whitelist(
    plan: &CampusPlan,
    groups: &[StreamGroup],
) -> Result<Whitelist, PlannerError> {
    let mut whitelist = Whitelist::new();
    for (subject, stream_id) in &plan.streams {
        let group = find_stream(groups, *subject, stream_id)?;
        let policy = plan.policy(*subject);
        for course in &group.courses {
            if course.level.is_some_and(|level| policy.runs(level)) {
                whitelist.insert(course.id.clone());
            }
        }
    }
    for selection in plan.grade_courses.values() {
        whitelist.extend(selection.values().cloned());
    }
    Ok(whitelist)
}

/// Rejects inventories no plan can work with, and warns when rooms are overfull.
pub fn check_inventory(catalog: &Catalog, config: &PlannerConfig) -> Result<(), PlannerError> {
    if catalog.rooms.is_empty() {
        return Err(PlannerError::EmptyRoomInventory);
    }
    let by_grade = catalog.students.iter().map(|s| s.grade).counts();
    for (grade, students) in by_grade.into_iter().sorted() {
        let seats: usize = catalog
            .rooms
            .iter()
            .filter(|r| r.grade == grade)
            .map(|_| config.max_room_capacity as usize)
            .sum();
        if seats == 0 {
            return Err(PlannerError::MissingGradeRooms { grade, students });
        }
        if students > seats {
            warn!(
                "Grade {} has {} students for {} seats at the hard room limit",
                grade, students, seats
            );
        }
    }
    Ok(())
}

/// A cell whose course was replaced while overlaying grade-wide selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellConflict {
    pub room_id: RoomId,
    pub day: Day,
    pub slot: Timeslot,
    pub previous_course_id: CourseId,
    pub next_course_id: CourseId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPlan {
    pub assignments: Assignments,
    pub whitelist: Whitelist,
    pub conflicts: Vec<CellConflict>,
    pub previews: BTreeMap<LeveledSubject, RoomMapPreview>,
    pub resolutions: MoveResolutions,
    pub unplaced: Vec<UnplacedMove>,
}

// grade-12 Tahsili courses take over senior rooms wherever the Qudrat stream meets
fn assign_tahsili_for_qudrat(
    grid: &mut Assignments,
    catalog: &Catalog,
    group: &StreamGroup,
) -> Vec<CourseId> {
    let stream_cells: HashSet<(Day, Timeslot)> = group
        .courses
        .iter()
        .flat_map(|c| c.meetings.iter().map(|m| (m.day, m.slot)))
        .collect();
    let tahsili: Vec<&Course> = catalog
        .courses
        .iter()
        .filter(|c| c.subject.is_tahsili() && c.grade == Some(ALTERNATE_TRACK_GRADE))
        .collect();

    let mut placed = BTreeSet::new();
    for room in catalog.rooms.iter().filter(|r| r.grade == ALTERNATE_TRACK_GRADE) {
        for course in &tahsili {
            for meeting in &course.meetings {
                if stream_cells.contains(&(meeting.day, meeting.slot)) {
                    grid.set(room.id, meeting.day, meeting.slot, course.id.clone());
                    placed.insert(course.id.clone());
                }
            }
        }
    }
    placed.into_iter().collect()
}

/// Seeds the weekly grid from a campus plan and auto-resolves the moves it causes.
///
/// Each selected stream is sized with [`build_room_map`] and every room gets the
/// course of the level it hosts. Grade-wide selections are then written over the
/// rooms of their grade; any cell that already held a different course is
/// reported as a [`CellConflict`].
pub fn apply_campus_plan(
    catalog: &Catalog,
    plan: &CampusPlan,
    config: &PlannerConfig,
) -> Result<AppliedPlan, PlannerError> {
    check_inventory(catalog, config)?;
    let groups = build_stream_groups(&catalog.courses);
    let mut whitelist = build_campus_whitelist(plan, &groups)?;
    let mut grid = Assignments::new();
    let mut previews = BTreeMap::new();
    let no_overrides = BTreeMap::new();

    for (subject, stream_id) in &plan.streams {
        let group = find_stream(&groups, *subject, stream_id)?;
        let overrides = plan.host_overrides.get(subject).unwrap_or(&no_overrides);
        let preview = build_room_map(
            *subject,
            &catalog.students,
            &catalog.rooms,
            &plan.policy(*subject),
            overrides,
            config,
        )?;

        for (room_id, host) in &preview.host_by_room {
            let Some(course) = host.level().and_then(|level| group.course_for(level)) else {
                continue;
            };
            if whitelist.contains(&course.id) {
                grid.assign_course(*room_id, course);
            }
        }
        if subject.is_qudrat() {
            whitelist.extend(assign_tahsili_for_qudrat(&mut grid, catalog, group));
        }
        previews.insert(*subject, preview);
    }

    let mut conflicts = Vec::new();
    for (grade, selection) in &plan.grade_courses {
        let rooms = catalog
            .rooms
            .iter()
            .filter(|r| r.grade == *grade)
            .sorted_by_key(|r| r.id)
            .collect_vec();
        for course_id in selection.values() {
            let Some(course) = catalog.course(course_id) else {
                warn!("Grade {} selection names unknown course {}", grade, course_id);
                continue;
            };
            for room in &rooms {
                for meeting in &course.meetings {
                    match grid.set(room.id, meeting.day, meeting.slot, course.id.clone()) {
                        Some(previous) if previous != course.id => conflicts.push(CellConflict {
                            room_id: room.id,
                            day: meeting.day,
                            slot: meeting.slot,
                            previous_course_id: previous,
                            next_course_id: course.id.clone(),
                        }),
                        _ => {}
                    }
                }
            }
        }
    }

    let resolved = auto_resolve(catalog, &grid, &whitelist, &MoveResolutions::new());
    info!(
        "Applied campus plan: {} cells filled, {} conflicts, {} moves resolved",
        grid.filled_cells(),
        conflicts.len(),
        resolved.placed
    );

    Ok(AppliedPlan {
        assignments: grid,
        whitelist,
        conflicts,
        previews,
        resolutions: resolved.resolutions,
        unplaced: resolved.unplaced,
    })
}

/// Courses that could be placed in a cell by hand.
pub fn available_courses<'c>(
    catalog: &'c Catalog,
    whitelist: &Whitelist,
    assignments: &Assignments,
    room_id: RoomId,
    day: Day,
    slot: Timeslot,
    subject: Option<Subject>,
) -> Vec<&'c Course> {
    let room_grade = catalog.room(room_id).map(|r| r.grade);
    catalog
        .courses
        .iter()
        .filter(|c| whitelist.contains(&c.id))
        .filter(|c| c.meets_at(day, slot))
        .filter(|c| subject.is_none_or(|s| c.subject == s))
        .filter(|c| !c.subject.is_grade_wide() || c.grade == room_grade)
        .filter(|c| assignments.get(room_id, day, slot) != Some(c.id.as_str()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStats {
    pub total: usize,
    pub filled: usize,
    pub unresolved: usize,
    pub done: bool,
}

pub fn schedule_stats(
    catalog: &Catalog,
    assignments: &Assignments,
    unresolved: usize,
) -> ScheduleStats {
    let total = catalog.rooms.len() * Day::ALL.len() * SLOTS.len();
    let filled = catalog
        .rooms
        .iter()
        .cartesian_product(Day::ALL)
        .cartesian_product(SLOTS.iter())
        .filter(|((room, day), slot)| assignments.get(room.id, *day, slot.id).is_some())
        .count();
    ScheduleStats {
        total,
        filled,
        unresolved,
        done: filled == total && unresolved == 0,
    }
}

// students done with a subject drop out of its demand
fn level_demand<'s>(
    students: impl Iterator<Item = &'s Student>,
) -> BTreeMap<LeveledSubject, LevelCounts> {
    let mut totals: BTreeMap<LeveledSubject, LevelCounts> = LeveledSubject::ALL
        .into_iter()
        .map(|s| (s, LevelCounts::default()))
        .collect();
    for student in students {
        for (subject, counts) in totals.iter_mut() {
            if !student.has_completed(*subject) {
                counts[student.need(*subject)] += 1;
            }
        }
    }
    totals
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandSnapshot {
    pub totals: BTreeMap<LeveledSubject, LevelCounts>,
    pub done_q: usize,
    pub still_q: usize,
}

pub fn demand_snapshot(students: &[Student]) -> DemandSnapshot {
    let done_q = students.iter().filter(|s| s.done_q()).count();
    DemandSnapshot {
        totals: level_demand(students.iter()),
        done_q,
        still_q: students.len() - done_q,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomProfile {
    pub room_id: RoomId,
    pub grade: Grade,
    pub level_demand: BTreeMap<LeveledSubject, LevelCounts>,
    pub qudrat_done: usize,
    /// Seniors still sitting Qudrat.
    pub qudrat_pending: usize,
    pub total: usize,
    pub students: Vec<Student>,
}

pub fn room_profile(catalog: &Catalog, room_id: RoomId) -> Option<RoomProfile> {
    let room = catalog.room(room_id)?;
    let students: Vec<Student> = catalog
        .students
        .iter()
        .filter(|s| s.homeroom == room_id)
        .cloned()
        .collect();
    let qudrat_done = students.iter().filter(|s| s.done_q()).count();
    let qudrat_pending = students
        .iter()
        .filter(|s| !s.done_q() && s.grade == ALTERNATE_TRACK_GRADE)
        .count();
    Some(RoomProfile {
        room_id,
        grade: room.grade,
        level_demand: level_demand(students.iter()),
        qudrat_done,
        qudrat_pending,
        total: students.len(),
        students,
    })
}
