use crate::config::ALTERNATE_TRACK_GRADE;
use crate::data::{
    Catalog, Course, Day, Grade, Level, LeveledSubject, Meeting, Room, Student, StudentNeeds,
    Subject, SubjectFlags, Timeslot,
};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const GRADES: [Grade; 3] = [10, 11, 12];

const DONE_QUDRAT_RATE: f64 = 0.65;

const TEACHERS: [&str; 20] = [
    "Abdullah Al-Qahtani",
    "Fahad Al-Dosari",
    "Omar Al-Shehri",
    "Khalid Al-Ghamdi",
    "Saud Al-Harbi",
    "Turki Al-Otaibi",
    "Nasser Al-Zahrani",
    "Majed Al-Malki",
    "Yazeed Al-Anazi",
    "Sultan Al-Rashid",
    "Badr Al-Shammari",
    "Hamdan Al-Sabah",
    "Rayan Al-Farhan",
    "Talal Al-Hazmi",
    "Ziyad Al-Amri",
    "Hamad Al-Mutairi",
    "Saleh Al-Jasser",
    "Mishaal Al-Salem",
    "Yahya Al-Harthi",
    "Ali Al-Fayez",
];

const FIRST_NAMES: [&str; 20] = [
    "Abdullah", "Faisal", "Omar", "Khalid", "Tariq", "Zaid", "Hamad", "Nasser", "Sultan", "Badr",
    "Saud", "Majed", "Yazeed", "Turki", "Rayan", "Talal", "Ziyad", "Ali", "Saleh", "Mishaal",
];

const LAST_NAMES: [&str; 8] = [
    "Al-Qahtani",
    "Al-Dosari",
    "Al-Shehri",
    "Al-Ghamdi",
    "Al-Harbi",
    "Al-Otaibi",
    "Al-Zahrani",
    "Al-Malki",
];

// L1/L2/L3 weights per subject and grade
fn level_weights(subject: LeveledSubject, grade: Grade) -> [u32; 3] {
    match (subject, grade) {
        (LeveledSubject::Kammi, 10) => [50, 40, 10],
        (LeveledSubject::Kammi, 11) => [25, 45, 30],
        (LeveledSubject::Kammi, _) => [10, 35, 55],
        (LeveledSubject::Lafthi, 10) => [50, 45, 5],
        (LeveledSubject::Lafthi, 11) => [20, 50, 30],
        (LeveledSubject::Lafthi, _) => [5, 40, 55],
        (LeveledSubject::Esl, 10) => [55, 40, 5],
        (LeveledSubject::Esl, 11) => [30, 50, 20],
        (LeveledSubject::Esl, _) => [15, 45, 40],
    }
}

/// Seeded generator for demo rooms, students and the standard course catalog.
///
/// All randomness comes from the owned `StdRng`, so the same seed always yields the
/// same dataset.
pub struct DatasetGenerator {
    rng: StdRng,
    teacher_cursor: usize,
    next_course: usize,
}

impl DatasetGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            teacher_cursor: 0,
            next_course: 1,
        }
    }

    pub fn default_rooms() -> Vec<Room> {
        [(10, 22), (10, 22), (11, 22), (11, 22), (12, 18)]
            .into_iter()
            .enumerate()
            .map(|(i, (grade, capacity))| Room {
                id: i as u32,
                name: format!("Room {}", 101 + i),
                grade,
                capacity,
            })
            .collect()
    }

    fn pick_level(&mut self, subject: LeveledSubject, grade: Grade) -> Level {
        let weights = level_weights(subject, grade);
        let mut roll = self.rng.gen_range(0..weights.iter().sum::<u32>());
        for (level, weight) in Level::ALL.into_iter().zip(weights) {
            if roll < weight {
                return level;
            }
            roll -= weight;
        }
        Level::L3
    }

    /// Fills every room to capacity with students of the room's grade.
    pub fn students(&mut self, rooms: &[Room]) -> Vec<Student> {
        let mut students = Vec::new();
        for room in rooms {
            for i in 0..room.capacity as usize {
                let n = room.id as usize;
                let name = format!(
                    "{} {}",
                    FIRST_NAMES[(n * 13 + i) % FIRST_NAMES.len()],
                    LAST_NAMES[(n * 7 + i) % LAST_NAMES.len()]
                );
                let done_q =
                    room.grade == ALTERNATE_TRACK_GRADE && self.rng.gen_bool(DONE_QUDRAT_RATE);
                let needs = StudentNeeds {
                    kammi: self.pick_level(LeveledSubject::Kammi, room.grade),
                    lafthi: self.pick_level(LeveledSubject::Lafthi, room.grade),
                    esl: self.pick_level(LeveledSubject::Esl, room.grade),
                };
                students.push(Student {
                    id: format!("s{}", students.len() + 1),
                    name,
                    homeroom: room.id,
                    grade: room.grade,
                    done: SubjectFlags {
                        kammi: done_q,
                        lafthi: done_q,
                        esl: false,
                    },
                    needs,
                });
            }
        }
        debug!("Generated {} students across {} rooms", students.len(), rooms.len());
        students
    }

    fn next_teacher(&mut self) -> &'static str {
        let name = TEACHERS[self.teacher_cursor % TEACHERS.len()];
        self.teacher_cursor += 1;
        name
    }

    fn course(
        &mut self,
        subject: Subject,
        level: Option<Level>,
        grade: Option<Grade>,
        days: &[Day],
        slot: Timeslot,
        segment: Option<&str>,
    ) -> Course {
        let meetings = days.iter().map(|day| Meeting { day: *day, slot }).collect();
        let id = format!("c{}", self.next_course);
        let mut course = Course::new(id, subject, level, grade, meetings);
        self.next_course += 1;
        course.segment = segment.map(str::to_string);
        course.teacher_name = self.next_teacher().to_string();
        course
    }

    /// The standard week: two streams per leveled subject plus grade-wide courses.
    pub fn courses(&mut self) -> Vec<Course> {
        use Day::{Mon, Sun, Thu, Tue, Wed};

        let streams: [(Subject, &[Day], Timeslot, Option<&str>); 6] = [
            (Subject::Kammi, &[Sun, Mon, Tue, Thu], 1, Some("Ufuq")),
            (Subject::Kammi, &[Sun, Mon, Wed, Thu], 3, Some("Tracks")),
            (Subject::Lafthi, &[Sun, Tue, Wed, Thu], 2, Some("Ufuq")),
            (Subject::Lafthi, &[Sun, Tue, Wed, Thu], 5, Some("Tracks")),
            (Subject::Esl, &[Sun, Tue, Thu], 4, None),
            (Subject::Esl, &[Sun, Tue, Thu], 6, None),
        ];
        let grade_wide: [(Subject, &[Day], Timeslot); 4] = [
            (Subject::Ministry, &[Mon, Wed], 4),
            (Subject::Ministry, &[Mon, Wed], 6),
            (Subject::Future, &[Wed], 7),
            (Subject::TMath, &Day::ALL, 7),
        ];
        let senior_tahsili: [(Subject, &[Day], Timeslot); 3] = [
            (Subject::TPhysics, &[Sun, Tue], 1),
            (Subject::TChem, &[Mon, Thu], 2),
            (Subject::TBio, &[Wed, Thu], 3),
        ];

        let mut courses = Vec::new();
        for (subject, days, slot, segment) in streams {
            for level in Level::ALL {
                courses.push(self.course(subject, Some(level), None, days, slot, segment));
            }
        }
        for (subject, days, slot) in grade_wide {
            for grade in GRADES {
                courses.push(self.course(subject, None, Some(grade), days, slot, None));
            }
        }
        for (subject, days, slot) in senior_tahsili {
            courses.push(self.course(subject, None, Some(ALTERNATE_TRACK_GRADE), days, slot, None));
        }
        courses
    }

    pub fn catalog(&mut self) -> Catalog {
        let rooms = Self::default_rooms();
        let students = self.students(&rooms);
        let courses = self.courses();
        Catalog {
            rooms,
            students,
            courses,
        }
    }
}
