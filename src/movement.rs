use crate::config::ALTERNATE_TRACK_GRADE;
use crate::data::{
    Assignments, BlockKey, Catalog, Course, Day, LeveledSubject, MoveResolutions, Room, RoomId,
    Student, Timeslot, Whitelist,
};
use crate::rules::{course_matches_student, need_label};
use log::trace;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A room running a course the student could join instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOption {
    pub room_id: RoomId,
    pub course_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MustMove {
    #[serde(flatten)]
    pub student: Student,
    pub needed_label: String,
    pub options: Vec<MoveOption>,
    /// Destination already recorded for this block, if any.
    pub resolved: Option<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StayReason {
    /// Done with the subject and no Tahsili course runs elsewhere.
    CompletedSubject { subject: LeveledSubject },
    NoSupply { need: String },
    /// Matching courses run, but every one of those rooms is full at this cell.
    AtCapacity { need: String },
}

impl fmt::Display for StayReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StayReason::CompletedSubject { subject } if subject.is_qudrat() => {
                f.write_str("Done with Qudrat, self-study (no Tahsili option this slot)")
            }
            StayReason::CompletedSubject { subject } => write!(
                f,
                "Done with {}, self-study (no follow-on course this slot)",
                subject
            ),
            StayReason::NoSupply { need } => write!(
                f,
                "No matching course running somewhere on campus for this slot ({})",
                need
            ),
            StayReason::AtCapacity { need } => {
                write!(f, "Every matching room is full for this slot ({})", need)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcedStay {
    #[serde(flatten)]
    pub student: Student,
    pub reason: StayReason,
    pub message: String,
}

impl ForcedStay {
    fn new(student: &Student, reason: StayReason) -> Self {
        Self {
            student: student.clone(),
            message: reason.to_string(),
            reason,
        }
    }
}

/// Who sits where for one room at one day and slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementResult {
    pub aligned: Vec<Student>,
    pub must_move_out: Vec<MustMove>,
    pub forced_stay: Vec<ForcedStay>,
    pub move_ins: Vec<Student>,
    pub block_key: BlockKey,
    pub effective_here: usize,
}

enum Outcome {
    Aligned,
    MustMove(MustMove),
    ForcedStay(ForcedStay),
}

/// Read-only view over one planning session, indexed for cell lookups.
pub struct MovementView<'a> {
    catalog: &'a Catalog,
    assignments: &'a Assignments,
    resolutions: &'a MoveResolutions,
    whitelist: &'a Whitelist,
    courses: HashMap<&'a str, &'a Course>,
    rooms: Vec<&'a Room>,
}

impl<'a> MovementView<'a> {
    pub fn new(
        catalog: &'a Catalog,
        assignments: &'a Assignments,
        resolutions: &'a MoveResolutions,
        whitelist: &'a Whitelist,
    ) -> Self {
        let courses = catalog.courses.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut rooms: Vec<&Room> = catalog.rooms.iter().collect();
        rooms.sort_by_key(|room| room.id);
        Self {
            catalog,
            assignments,
            resolutions,
            whitelist,
            courses,
            rooms,
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn assignments(&self) -> &'a Assignments {
        self.assignments
    }

    pub fn resolutions(&self) -> &'a MoveResolutions {
        self.resolutions
    }

    /// Rooms in id order.
    pub fn rooms(&self) -> &[&'a Room] {
        &self.rooms
    }

    pub fn course(&self, course_id: &str) -> Option<&'a Course> {
        self.courses.get(course_id).copied()
    }

    pub fn course_at(&self, room_id: RoomId, day: Day, slot: Timeslot) -> Option<&'a Course> {
        self.assignments
            .get(room_id, day, slot)
            .and_then(|id| self.course(id))
    }

    /// Resolution for the block if one exists, else the home room.
    pub fn current_room(&self, student: &Student, block_key: &BlockKey) -> RoomId {
        self.resolutions
            .get(&student.id, block_key)
            .unwrap_or(student.homeroom)
    }

    /// Whitelisted courses in other rooms at the same cell that fit `student` and `keep`.
    pub fn options_where(
        &self,
        student: &Student,
        from_room: RoomId,
        day: Day,
        slot: Timeslot,
        keep: impl Fn(&Course) -> bool,
    ) -> Vec<MoveOption> {
        self.rooms
            .iter()
            .filter(|room| room.id != from_room)
            .filter_map(|room| {
                let course = self.course_at(room.id, day, slot)?;
                let usable = self.whitelist.contains(&course.id)
                    && course_matches_student(course, student)
                    && keep(course);
                usable.then(|| MoveOption {
                    room_id: room.id,
                    course_id: course.id.clone(),
                })
            })
            .collect()
    }

    /// Whether any room runs a whitelisted Qudrat course at this cell.
    pub fn qudrat_running(&self, day: Day, slot: Timeslot) -> bool {
        self.rooms.iter().any(|room| {
            self.course_at(room.id, day, slot)
                .is_some_and(|c| c.subject.is_qudrat() && self.whitelist.contains(&c.id))
        })
    }

    /// Block key of the course in every occupied room at this cell.
    pub fn home_blocks(&self, day: Day, slot: Timeslot) -> HashMap<RoomId, BlockKey> {
        self.rooms
            .iter()
            .filter_map(|room| {
                self.course_at(room.id, day, slot)
                    .map(|course| (room.id, course.block_key()))
            })
            .collect()
    }

    /// Classifies every student present in `room_id` at one cell.
    pub fn classify(&self, room_id: RoomId, day: Day, slot: Timeslot) -> MovementResult {
        let Some(course) = self.course_at(room_id, day, slot) else {
            return MovementResult::default();
        };
        let block_key = course.block_key();
        let students = &self.catalog.students;
        let qudrat_running = self.qudrat_running(day, slot);
        let blocks = self.home_blocks(day, slot);
        let open_rooms: HashSet<RoomId> = self
            .rooms
            .iter()
            .filter(|room| {
                cell_occupancy(students, &blocks, self.resolutions, room.id)
                    < room.capacity as usize
            })
            .map(|room| room.id)
            .collect();
        let cell = Cell {
            course,
            block_key: &block_key,
            room_id,
            day,
            slot,
            open_rooms: &open_rooms,
        };

        let mut result = MovementResult {
            block_key: block_key.clone(),
            ..Default::default()
        };
        for student in students.iter().filter(|s| s.homeroom == room_id) {
            if self.current_room(student, &block_key) != room_id {
                continue;
            }
            match self.classify_student(&cell, student, qudrat_running) {
                Outcome::Aligned => result.aligned.push(student.clone()),
                Outcome::MustMove(entry) => result.must_move_out.push(entry),
                Outcome::ForcedStay(stay) => result.forced_stay.push(stay),
            }
        }

        result.move_ins = students
            .iter()
            .filter(|s| {
                s.homeroom != room_id && self.resolutions.get(&s.id, &block_key) == Some(room_id)
            })
            .cloned()
            .collect();
        result.effective_here =
            effective_room_count(students, self.resolutions, &block_key, room_id);

        trace!(
            "Room {} {} slot {}: {} aligned, {} must move, {} forced",
            room_id,
            day,
            slot,
            result.aligned.len(),
            result.must_move_out.len(),
            result.forced_stay.len()
        );
        result
    }

    fn classify_student(
        &self,
        cell: &Cell<'_>,
        student: &Student,
        qudrat_running: bool,
    ) -> Outcome {
        let course = cell.course;
        let senior_in_qudrat = student.grade == ALTERNATE_TRACK_GRADE && !student.done_q();

        if course.subject.is_tahsili() && senior_in_qudrat && !qudrat_running {
            return Outcome::Aligned;
        }
        if course_matches_student(course, student) {
            return Outcome::Aligned;
        }

        if let Some(subject) = course.subject.leveled().filter(|s| student.has_completed(*s)) {
            let options = self.options_where(student, cell.room_id, cell.day, cell.slot, |c| {
                c.subject.is_tahsili()
            });
            return self.outcome(
                cell,
                student,
                options,
                format!("Tahsili Grade {}", student.grade),
                StayReason::CompletedSubject { subject },
            );
        }

        if course.subject.is_tahsili() && senior_in_qudrat {
            let options = self.options_where(student, cell.room_id, cell.day, cell.slot, |c| {
                c.subject.is_qudrat()
            });
            return self.outcome(
                cell,
                student,
                options,
                "Qudrat (not done)".to_string(),
                StayReason::NoSupply {
                    need: "Qudrat".to_string(),
                },
            );
        }

        let options = self.options_where(student, cell.room_id, cell.day, cell.slot, |_| true);
        let need = need_label(course.subject, student);
        self.outcome(
            cell,
            student,
            options,
            need.clone(),
            StayReason::NoSupply { need },
        )
    }

    // Unresolved students only see rooms with a free seat. A recorded destination
    // keeps the move listed whatever the headcount.
    fn outcome(
        &self,
        cell: &Cell<'_>,
        student: &Student,
        options: Vec<MoveOption>,
        needed_label: String,
        reason: StayReason,
    ) -> Outcome {
        if options.is_empty() {
            return Outcome::ForcedStay(ForcedStay::new(student, reason));
        }
        let resolved = self.resolutions.get(&student.id, cell.block_key);
        let options = match resolved {
            Some(_) => options,
            None => options
                .into_iter()
                .filter(|option| cell.open_rooms.contains(&option.room_id))
                .collect(),
        };
        if options.is_empty() {
            let reason = StayReason::AtCapacity { need: needed_label };
            return Outcome::ForcedStay(ForcedStay::new(student, reason));
        }
        Outcome::MustMove(MustMove {
            student: student.clone(),
            needed_label,
            options,
            resolved,
        })
    }
}

struct Cell<'c> {
    course: &'c Course,
    block_key: &'c BlockKey,
    room_id: RoomId,
    day: Day,
    slot: Timeslot,
    open_rooms: &'c HashSet<RoomId>,
}

/// Home count minus resolved-out plus resolved-in, for one block.
pub fn effective_room_count(
    students: &[Student],
    resolutions: &MoveResolutions,
    block_key: &BlockKey,
    room_id: RoomId,
) -> usize {
    let mut count = 0;
    for student in students {
        let destination = resolutions.get(&student.id, block_key);
        let here = match destination {
            Some(room) => room == room_id,
            None => student.homeroom == room_id,
        };
        if here {
            count += 1;
        }
    }
    count
}

/// Headcount of `room_id` at one cell, following each student's resolution for
/// the block running in their own home room.
pub fn cell_occupancy(
    students: &[Student],
    home_blocks: &HashMap<RoomId, BlockKey>,
    resolutions: &MoveResolutions,
    room_id: RoomId,
) -> usize {
    students
        .iter()
        .filter(|s| {
            let destination = home_blocks
                .get(&s.homeroom)
                .and_then(|block| resolutions.get(&s.id, block));
            destination.unwrap_or(s.homeroom) == room_id
        })
        .count()
}

pub fn compute_movement(
    catalog: &Catalog,
    assignments: &Assignments,
    resolutions: &MoveResolutions,
    whitelist: &Whitelist,
    room_id: RoomId,
    day: Day,
    slot: Timeslot,
) -> MovementResult {
    MovementView::new(catalog, assignments, resolutions, whitelist).classify(room_id, day, slot)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{Level, Meeting, StudentNeeds, Subject, SubjectFlags};

    pub(crate) fn room(id: RoomId, grade: u8, capacity: u32) -> Room {
        Room {
            id,
            name: format!("Room {}", 101 + id),
            grade,
            capacity,
        }
    }

    pub(crate) fn student(id: &str, homeroom: RoomId, grade: u8, esl: Level) -> Student {
        Student {
            id: id.to_string(),
            name: id.to_string(),
            homeroom,
            grade,
            done: SubjectFlags::default(),
            needs: StudentNeeds {
                kammi: Level::L2,
                lafthi: Level::L2,
                esl,
            },
        }
    }

    pub(crate) fn course_at_sun4(
        id: &str,
        subject: Subject,
        level: Option<Level>,
        grade: Option<u8>,
    ) -> Course {
        Course::new(
            id,
            subject,
            level,
            grade,
            vec![
                Meeting { day: Day::Sun, slot: 4 },
                Meeting { day: Day::Tue, slot: 4 },
            ],
        )
    }

    /// Two grade-10 rooms running ESL L1 and L2 on Sun slot 4.
    pub(crate) fn esl_session(students: Vec<Student>) -> (Catalog, Assignments, Whitelist) {
        let courses = vec![
            course_at_sun4("esl-1", Subject::Esl, Some(Level::L1), None),
            course_at_sun4("esl-2", Subject::Esl, Some(Level::L2), None),
        ];
        let mut grid = Assignments::new();
        grid.assign_course(0, &courses[0]);
        grid.assign_course(1, &courses[1]);
        let whitelist = courses.iter().map(|c| c.id.clone()).collect();
        let catalog = Catalog {
            rooms: vec![room(0, 10, 22), room(1, 10, 22)],
            students,
            courses,
        };
        (catalog, grid, whitelist)
    }

    /// Room 0 on Sun slot 4 with nothing resolved yet.
    fn sun4(catalog: &Catalog, grid: &Assignments, whitelist: &Whitelist) -> MovementResult {
        compute_movement(catalog, grid, &MoveResolutions::new(), whitelist, 0, Day::Sun, 4)
    }

    #[test]
    fn mismatch_moves_or_stays() {
        let (catalog, grid, whitelist) = esl_session(vec![
            student("s1", 0, 10, Level::L1),
            student("s2", 0, 10, Level::L2),
            student("s3", 0, 10, Level::L3),
        ]);
        let resolutions = MoveResolutions::new();
        let result =
            compute_movement(&catalog, &grid, &resolutions, &whitelist, 0, Day::Sun, 4);

        assert_eq!(result.aligned.len(), 1);
        assert_eq!(result.must_move_out.len(), 1);
        let entry = &result.must_move_out[0];
        assert_eq!(entry.student.id, "s2");
        assert_eq!(entry.needed_label, "ESL (IELTS) L2");
        assert_eq!(
            entry.options,
            vec![MoveOption {
                room_id: 1,
                course_id: "esl-2".to_string()
            }]
        );
        assert_eq!(entry.resolved, None);

        assert_eq!(result.forced_stay.len(), 1);
        assert_eq!(
            result.forced_stay[0].message,
            "No matching course running somewhere on campus for this slot (ESL (IELTS) L3)"
        );
        assert_eq!(result.effective_here, 3);
        assert_eq!(result.block_key.as_str(), "esl|slot4|Sun/Tue");
    }

    #[test]
    fn resolved_student_moves_in_elsewhere() {
        let (catalog, grid, whitelist) = esl_session(vec![
            student("s1", 0, 10, Level::L1),
            student("s2", 0, 10, Level::L2),
        ]);
        let key = BlockKey("esl|slot4|Sun/Tue".to_string());
        let mut resolutions = MoveResolutions::new();
        resolutions.insert("s2", &key, 1);

        let view = MovementView::new(&catalog, &grid, &resolutions, &whitelist);
        let home = view.classify(0, Day::Sun, 4);
        assert!(home.must_move_out.is_empty());
        assert_eq!(home.effective_here, 1);

        let away = view.classify(1, Day::Tue, 4);
        assert_eq!(away.move_ins.len(), 1);
        assert_eq!(away.move_ins[0].id, "s2");
        assert_eq!(away.effective_here, 1);
    }

    #[test]
    fn pending_resolution_is_reported_on_must_move() {
        let (catalog, grid, whitelist) = esl_session(vec![student("s2", 0, 10, Level::L2)]);
        let key = BlockKey("esl|slot4|Sun/Tue".to_string());
        let mut resolutions = MoveResolutions::new();
        // pointing at the home room keeps the student here
        resolutions.insert("s2", &key, 0);
        let result =
            compute_movement(&catalog, &grid, &resolutions, &whitelist, 0, Day::Sun, 4);
        assert_eq!(result.must_move_out[0].resolved, Some(0));
    }

    #[test]
    fn non_whitelisted_courses_are_not_options() {
        let (catalog, grid, _) = esl_session(vec![student("s2", 0, 10, Level::L2)]);
        let whitelist: Whitelist = ["esl-1".to_string()].into_iter().collect();
        let result = sun4(&catalog, &grid, &whitelist);
        assert!(result.must_move_out.is_empty());
        assert_eq!(result.forced_stay.len(), 1);
    }

    #[test]
    fn empty_or_unknown_cell_is_empty() {
        let (catalog, mut grid, whitelist) = esl_session(vec![student("s1", 0, 10, Level::L1)]);
        let resolutions = MoveResolutions::new();
        assert_eq!(
            compute_movement(&catalog, &grid, &resolutions, &whitelist, 0, Day::Mon, 1),
            MovementResult::default()
        );
        grid.set(0, Day::Mon, 1, "missing");
        assert_eq!(
            compute_movement(&catalog, &grid, &resolutions, &whitelist, 0, Day::Mon, 1),
            MovementResult::default()
        );
    }

    fn senior_session(with_qudrat: bool, senior: Student) -> (Catalog, Assignments, Whitelist) {
        let mut courses = vec![course_at_sun4("tm-12", Subject::TMath, None, Some(12))];
        if with_qudrat {
            courses.push(course_at_sun4("kammi-2", Subject::Kammi, Some(Level::L2), None));
        }
        let mut grid = Assignments::new();
        for (room_id, course) in courses.iter().enumerate() {
            grid.assign_course(room_id as RoomId, course);
        }
        let whitelist = courses.iter().map(|c| c.id.clone()).collect();
        let catalog = Catalog {
            rooms: vec![room(0, 12, 18), room(1, 10, 22)],
            students: vec![senior],
            courses,
        };
        (catalog, grid, whitelist)
    }

    #[test]
    fn senior_in_tahsili_is_exempt_when_no_qudrat_runs() {
        let (catalog, grid, whitelist) = senior_session(false, student("q", 0, 12, Level::L1));
        let result = sun4(&catalog, &grid, &whitelist);
        assert_eq!(result.aligned.len(), 1);
        assert!(result.forced_stay.is_empty());
    }

    #[test]
    fn senior_in_tahsili_moves_to_running_qudrat() {
        let (catalog, grid, whitelist) = senior_session(true, student("q", 0, 12, Level::L1));
        let result = sun4(&catalog, &grid, &whitelist);
        assert!(result.aligned.is_empty());
        assert_eq!(result.must_move_out.len(), 1);
        assert_eq!(result.must_move_out[0].needed_label, "Qudrat (not done)");
        assert_eq!(result.must_move_out[0].options[0].course_id, "kammi-2");
    }

    #[test]
    fn senior_with_unmatched_qudrat_level_stays() {
        let mut senior = student("q", 0, 12, Level::L1);
        senior.needs.kammi = Level::L3;
        let (catalog, grid, whitelist) = senior_session(true, senior);
        let result = sun4(&catalog, &grid, &whitelist);
        assert_eq!(result.forced_stay.len(), 1);
        assert_eq!(
            result.forced_stay[0].reason,
            StayReason::NoSupply {
                need: "Qudrat".to_string()
            }
        );
    }

    #[test]
    fn completed_qudrat_goes_to_tahsili() {
        let kammi = course_at_sun4("kammi-2", Subject::Kammi, Some(Level::L2), None);
        let tahsili = course_at_sun4("tm-12", Subject::TMath, None, Some(12));
        let mut grid = Assignments::new();
        grid.assign_course(0, &kammi);
        grid.assign_course(1, &tahsili);
        let mut done = student("d", 0, 12, Level::L1);
        done.done.kammi = true;
        done.done.lafthi = true;
        let mut catalog = Catalog {
            rooms: vec![room(0, 11, 22), room(1, 12, 18)],
            students: vec![done],
            courses: vec![kammi, tahsili],
        };
        let whitelist: Whitelist = catalog.courses.iter().map(|c| c.id.clone()).collect();

        let result = sun4(&catalog, &grid, &whitelist);
        assert_eq!(result.must_move_out.len(), 1);
        assert_eq!(result.must_move_out[0].needed_label, "Tahsili Grade 12");

        // same student, no Tahsili supply
        catalog.courses.truncate(1);
        let result = sun4(&catalog, &grid, &whitelist);
        assert_eq!(
            result.forced_stay[0].message,
            "Done with Qudrat, self-study (no Tahsili option this slot)"
        );
    }

    #[test]
    fn completed_esl_self_studies_or_joins_tahsili() {
        let mut done = student("e", 0, 10, Level::L1);
        done.done.esl = true;
        let (mut catalog, mut grid, mut whitelist) = esl_session(vec![done]);

        let result = sun4(&catalog, &grid, &whitelist);
        assert!(result.aligned.is_empty());
        assert!(result.must_move_out.is_empty());
        assert_eq!(
            result.forced_stay[0].reason,
            StayReason::CompletedSubject {
                subject: LeveledSubject::Esl
            }
        );
        assert_eq!(
            result.forced_stay[0].message,
            "Done with ESL (IELTS), self-study (no follow-on course this slot)"
        );

        // room 1 switches to grade-10 Tahsili Math at the same time
        let tahsili = course_at_sun4("tm-10", Subject::TMath, None, Some(10));
        grid.assign_course(1, &tahsili);
        whitelist.insert(tahsili.id.clone());
        catalog.courses.push(tahsili);

        let result = sun4(&catalog, &grid, &whitelist);
        assert!(result.forced_stay.is_empty());
        assert_eq!(result.must_move_out.len(), 1);
        let entry = &result.must_move_out[0];
        assert_eq!(entry.needed_label, "Tahsili Grade 10");
        assert_eq!(
            entry.options,
            vec![MoveOption {
                room_id: 1,
                course_id: "tm-10".to_string()
            }]
        );
    }

    #[test]
    fn full_destinations_turn_moves_into_stays() {
        let (mut catalog, grid, whitelist) = esl_session(vec![
            student("s1", 0, 10, Level::L2),
            student("s2", 1, 10, Level::L2),
        ]);
        catalog.rooms[1].capacity = 1;

        let result = sun4(&catalog, &grid, &whitelist);
        assert!(result.must_move_out.is_empty());
        assert_eq!(
            result.forced_stay[0].reason,
            StayReason::AtCapacity {
                need: "ESL (IELTS) L2".to_string()
            }
        );
        assert_eq!(
            result.forced_stay[0].message,
            "Every matching room is full for this slot (ESL (IELTS) L2)"
        );

        // a recorded destination keeps the move listed
        let mut resolutions = MoveResolutions::new();
        resolutions.insert("s1", &BlockKey("esl|slot4|Sun/Tue".to_string()), 0);
        let result =
            compute_movement(&catalog, &grid, &resolutions, &whitelist, 0, Day::Sun, 4);
        assert_eq!(result.must_move_out.len(), 1);
        assert_eq!(result.must_move_out[0].resolved, Some(0));
    }

    #[test]
    fn occupancy_follows_home_block_resolutions() {
        let (catalog, grid, whitelist) = esl_session(vec![
            student("s1", 0, 10, Level::L1),
            student("s2", 0, 10, Level::L2),
            student("s3", 1, 10, Level::L2),
        ]);
        let mut resolutions = MoveResolutions::new();
        let view = MovementView::new(&catalog, &grid, &resolutions, &whitelist);
        let blocks = view.home_blocks(Day::Sun, 4);
        assert_eq!(cell_occupancy(&catalog.students, &blocks, &resolutions, 1), 1);

        resolutions.insert("s2", &BlockKey("esl|slot4|Sun/Tue".to_string()), 1);
        assert_eq!(cell_occupancy(&catalog.students, &blocks, &resolutions, 1), 2);
        assert_eq!(cell_occupancy(&catalog.students, &blocks, &resolutions, 0), 1);
    }
}
