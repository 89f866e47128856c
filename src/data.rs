use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Index, IndexMut};

// Type aliases for clarity
pub type RoomId = u32;
pub type CourseId = String;
pub type StudentId = String;
pub type Timeslot = u32;
pub type Grade = u8;

/// Course ids that are allowed to run on campus after a plan is applied.
pub type Whitelist = BTreeSet<CourseId>;

/// Proficiency tier of a leveled subject. Purely nominal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    L1,
    L2,
    L3,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::L1, Level::L2, Level::L3];
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::L1 => "L1",
            Level::L2 => "L2",
            Level::L3 => "L3",
        };
        f.write_str(label)
    }
}

/// One value per level, serialized as `{"L1": .., "L2": .., "L3": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerLevel<T> {
    #[serde(rename = "L1")]
    pub l1: T,
    #[serde(rename = "L2")]
    pub l2: T,
    #[serde(rename = "L3")]
    pub l3: T,
}

impl<T> PerLevel<T> {
    pub fn new(l1: T, l2: T, l3: T) -> Self {
        Self { l1, l2, l3 }
    }
}

impl<T> Index<Level> for PerLevel<T> {
    type Output = T;

    fn index(&self, level: Level) -> &T {
        match level {
            Level::L1 => &self.l1,
            Level::L2 => &self.l2,
            Level::L3 => &self.l3,
        }
    }
}

impl<T> IndexMut<Level> for PerLevel<T> {
    fn index_mut(&mut self, level: Level) -> &mut T {
        match level {
            Level::L1 => &mut self.l1,
            Level::L2 => &mut self.l2,
            Level::L3 => &mut self.l3,
        }
    }
}

pub type LevelCounts = PerLevel<usize>;

impl PerLevel<usize> {
    pub fn total(&self) -> usize {
        self.l1 + self.l2 + self.l3
    }
}

/// Subjects taught in three levels; the ones a routing policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeveledSubject {
    Kammi,
    Lafthi,
    Esl,
}

impl LeveledSubject {
    pub const ALL: [LeveledSubject; 3] = [
        LeveledSubject::Kammi,
        LeveledSubject::Lafthi,
        LeveledSubject::Esl,
    ];

    pub fn subject(self) -> Subject {
        match self {
            LeveledSubject::Kammi => Subject::Kammi,
            LeveledSubject::Lafthi => Subject::Lafthi,
            LeveledSubject::Esl => Subject::Esl,
        }
    }

    /// Kammi and Lafthi together make up Qudrat.
    pub fn is_qudrat(self) -> bool {
        self.subject().is_qudrat()
    }
}

impl fmt::Display for LeveledSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.subject(), f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Kammi,
    Lafthi,
    Esl,
    Ministry,
    Future,
    TMath,
    TChem,
    TBio,
    TPhysics,
}

impl Subject {
    /// Key used inside block keys and stream group ids.
    pub fn key(self) -> &'static str {
        match self {
            Subject::Kammi => "kammi",
            Subject::Lafthi => "lafthi",
            Subject::Esl => "esl",
            Subject::Ministry => "ministry",
            Subject::Future => "future",
            Subject::TMath => "t_math",
            Subject::TChem => "t_chem",
            Subject::TBio => "t_bio",
            Subject::TPhysics => "t_physics",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Subject::Kammi => "Qudrat Kammi",
            Subject::Lafthi => "Qudrat Lafthi",
            Subject::Esl => "ESL (IELTS)",
            Subject::Ministry => "Ministry English",
            Subject::Future => "Future Skills",
            Subject::TMath => "Tahsili Math",
            Subject::TChem => "Tahsili Chem",
            Subject::TBio => "Tahsili Bio",
            Subject::TPhysics => "Tahsili Physics",
        }
    }

    pub fn leveled(self) -> Option<LeveledSubject> {
        match self {
            Subject::Kammi => Some(LeveledSubject::Kammi),
            Subject::Lafthi => Some(LeveledSubject::Lafthi),
            Subject::Esl => Some(LeveledSubject::Esl),
            Subject::Ministry
            | Subject::Future
            | Subject::TMath
            | Subject::TChem
            | Subject::TBio
            | Subject::TPhysics => None,
        }
    }

    pub fn is_qudrat(self) -> bool {
        matches!(self, Subject::Kammi | Subject::Lafthi)
    }

    /// Tahsili subjects form the alternate track for students done with Qudrat.
    pub fn is_tahsili(self) -> bool {
        matches!(
            self,
            Subject::TMath | Subject::TChem | Subject::TBio | Subject::TPhysics
        )
    }

    /// Courses every student of one grade takes together.
    pub fn is_grade_wide(self) -> bool {
        matches!(self, Subject::Ministry | Subject::Future) || self.is_tahsili()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
}

impl Day {
    pub const ALL: [Day; 5] = [Day::Sun, Day::Mon, Day::Tue, Day::Wed, Day::Thu];
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Day::Sun => "Sun",
            Day::Mon => "Mon",
            Day::Tue => "Tue",
            Day::Wed => "Wed",
            Day::Thu => "Thu",
        };
        f.write_str(label)
    }
}

/// A period of the school day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotDef {
    pub id: Timeslot,
    pub start: &'static str,
    pub end: &'static str,
}

pub const SLOTS: [SlotDef; 7] = [
    SlotDef { id: 1, start: "07:47", end: "08:32" },
    SlotDef { id: 2, start: "08:35", end: "09:20" },
    SlotDef { id: 3, start: "09:23", end: "10:08" },
    SlotDef { id: 4, start: "10:18", end: "11:03" },
    SlotDef { id: 5, start: "11:06", end: "11:51" },
    SlotDef { id: 6, start: "11:54", end: "12:39" },
    SlotDef { id: 7, start: "12:42", end: "13:27" },
];

/// Represents a physical homeroom with a given capacity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub grade: Grade,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct SubjectFlags {
    pub kammi: bool,
    pub lafthi: bool,
    pub esl: bool,
}

impl SubjectFlags {
    pub fn get(&self, subject: LeveledSubject) -> bool {
        match subject {
            LeveledSubject::Kammi => self.kammi,
            LeveledSubject::Lafthi => self.lafthi,
            LeveledSubject::Esl => self.esl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StudentNeeds {
    pub kammi: Level,
    pub lafthi: Level,
    pub esl: Level,
}

impl StudentNeeds {
    pub fn get(&self, subject: LeveledSubject) -> Level {
        match subject {
            LeveledSubject::Kammi => self.kammi,
            LeveledSubject::Lafthi => self.lafthi,
            LeveledSubject::Esl => self.esl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub homeroom: RoomId,
    pub grade: Grade,
    #[serde(default)]
    pub done: SubjectFlags,
    pub needs: StudentNeeds,
}

impl Student {
    pub fn need(&self, subject: LeveledSubject) -> Level {
        self.needs.get(subject)
    }

    pub fn has_completed(&self, subject: LeveledSubject) -> bool {
        self.done.get(subject)
    }

    /// Done with both Qudrat subjects.
    pub fn done_q(&self) -> bool {
        self.done.kammi && self.done.lafthi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Meeting {
    pub day: Day,
    pub slot: Timeslot,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    pub subject: Subject,
    pub level: Option<Level>,
    pub grade: Option<Grade>,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub teacher_name: String,
    pub meetings: Vec<Meeting>,
    pub pattern: String,
}

impl Course {
    /// Builds a course and derives its recurrence pattern from the meetings.
    pub fn new(
        id: impl Into<CourseId>,
        subject: Subject,
        level: Option<Level>,
        grade: Option<Grade>,
        meetings: Vec<Meeting>,
    ) -> Self {
        let pattern = day_pattern(&meetings);
        Self {
            id: id.into(),
            subject,
            level,
            grade,
            segment: None,
            teacher_name: String::new(),
            meetings,
            pattern,
        }
    }

    pub fn first_slot(&self) -> Option<Timeslot> {
        self.meetings.first().map(|m| m.slot)
    }

    pub fn meets_at(&self, day: Day, slot: Timeslot) -> bool {
        self.meetings.iter().any(|m| m.day == day && m.slot == slot)
    }

    /// Identifies this recurring course across the week.
    pub fn block_key(&self) -> BlockKey {
        let slot = self
            .first_slot()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        BlockKey(format!("{}|slot{}|{}", self.subject.key(), slot, self.pattern))
    }
}

/// Distinct meeting days in meeting order, joined with `/`.
pub fn day_pattern(meetings: &[Meeting]) -> String {
    let mut days: Vec<Day> = Vec::new();
    for meeting in meetings {
        if !days.contains(&meeting.day) {
            days.push(meeting.day);
        }
    }
    days.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Key of a recurring weekly course; movement is tracked per block, not per cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BlockKey(pub String);

impl BlockKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a room stands for one leveled subject block.
///
/// On the wire a host is a bare string: `"L1"`, `"L2"`, `"L3"` or `"AUTO_TAHSILI"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomHost {
    Level(Level),
    /// Structurally excluded from the subject; runs the Tahsili track instead.
    AutoTahsili,
}

impl RoomHost {
    pub fn level(self) -> Option<Level> {
        match self {
            RoomHost::Level(level) => Some(level),
            RoomHost::AutoTahsili => None,
        }
    }
}

impl fmt::Display for RoomHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomHost::Level(level) => fmt::Display::fmt(level, f),
            RoomHost::AutoTahsili => f.write_str("AUTO_TAHSILI"),
        }
    }
}

impl Serialize for RoomHost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomHost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        const HOSTS: &[&str] = &["L1", "L2", "L3", "AUTO_TAHSILI"];
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "L1" => Ok(RoomHost::Level(Level::L1)),
            "L2" => Ok(RoomHost::Level(Level::L2)),
            "L3" => Ok(RoomHost::Level(Level::L3)),
            "AUTO_TAHSILI" => Ok(RoomHost::AutoTahsili),
            other => Err(de::Error::unknown_variant(other, HOSTS)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleForceMove {
    pub target: Level,
    pub count: f64,
}

/// The middle level splits its students both ways.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitForceMove {
    pub to_l1: f64,
    pub to_l3: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ForceMoveRules {
    #[serde(rename = "L1")]
    pub l1: SingleForceMove,
    #[serde(rename = "L2")]
    pub l2: SplitForceMove,
    #[serde(rename = "L3")]
    pub l3: SingleForceMove,
}

/// Which levels of one subject run, and where students of a closed level go.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPolicy {
    pub run: PerLevel<bool>,
    pub force_move: ForceMoveRules,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            run: PerLevel::new(true, true, true),
            force_move: ForceMoveRules {
                l1: SingleForceMove {
                    target: Level::L2,
                    count: 0.0,
                },
                l2: SplitForceMove::default(),
                l3: SingleForceMove {
                    target: Level::L2,
                    count: 0.0,
                },
            },
        }
    }
}

impl RoutingPolicy {
    pub fn runs(&self, level: Level) -> bool {
        self.run[level]
    }

    pub fn levels_running(&self) -> Vec<Level> {
        Level::ALL.into_iter().filter(|l| self.runs(*l)).collect()
    }
}

/// Weekly grid: room -> day -> slot -> course id. Missing entries are empty cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Assignments {
    cells: BTreeMap<RoomId, BTreeMap<Day, BTreeMap<Timeslot, CourseId>>>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: RoomId, day: Day, slot: Timeslot) -> Option<&str> {
        self.cells
            .get(&room_id)?
            .get(&day)?
            .get(&slot)
            .map(|c| c.as_str())
    }

    /// Writes a cell and returns the course it replaced, if any.
    pub fn set(
        &mut self,
        room_id: RoomId,
        day: Day,
        slot: Timeslot,
        course_id: impl Into<CourseId>,
    ) -> Option<CourseId> {
        self.cells
            .entry(room_id)
            .or_default()
            .entry(day)
            .or_default()
            .insert(slot, course_id.into())
    }

    /// Places every meeting of `course` in `room_id`.
    pub fn assign_course(&mut self, room_id: RoomId, course: &Course) {
        for meeting in &course.meetings {
            self.set(room_id, meeting.day, meeting.slot, course.id.clone());
        }
    }

    /// Returns a copy of the grid with `course` removed from `room_id`.
    pub fn without_course(&self, room_id: RoomId, course: &Course) -> Assignments {
        let mut next = self.clone();
        if let Some(days) = next.cells.get_mut(&room_id) {
            for meeting in &course.meetings {
                if let Some(slots) = days.get_mut(&meeting.day) {
                    if slots.get(&meeting.slot) == Some(&course.id) {
                        slots.remove(&meeting.slot);
                    }
                }
            }
        }
        next
    }

    /// Assigned slots of one room on one day, in slot order.
    pub fn slots(&self, room_id: RoomId, day: Day) -> impl Iterator<Item = (Timeslot, &str)> + '_ {
        self.cells
            .get(&room_id)
            .and_then(|days| days.get(&day))
            .into_iter()
            .flat_map(|slots| slots.iter().map(|(slot, course)| (*slot, course.as_str())))
    }

    pub fn filled_cells(&self) -> usize {
        self.cells
            .values()
            .flat_map(|days| days.values())
            .map(|slots| slots.len())
            .sum()
    }
}

/// student id -> block key -> destination room. Absent entries are unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MoveResolutions {
    by_student: BTreeMap<StudentId, BTreeMap<BlockKey, RoomId>>,
}

impl MoveResolutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, student_id: &str, block_key: &BlockKey) -> Option<RoomId> {
        self.by_student.get(student_id)?.get(block_key).copied()
    }

    /// Records a destination unless one already exists. Returns whether it was recorded.
    pub fn insert(&mut self, student_id: &str, block_key: &BlockKey, room_id: RoomId) -> bool {
        let blocks = self.by_student.entry(student_id.to_string()).or_default();
        if blocks.contains_key(block_key) {
            return false;
        }
        blocks.insert(block_key.clone(), room_id);
        true
    }

    pub fn len(&self) -> usize {
        self.by_student.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BlockKey, RoomId)> + '_ {
        self.by_student.iter().flat_map(|(student, blocks)| {
            blocks
                .iter()
                .map(move |(block, room)| (student.as_str(), block, *room))
        })
    }
}

/// Rooms, students and courses for one planning session.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Catalog {
    pub rooms: Vec<Room>,
    pub students: Vec<Student>,
    pub courses: Vec<Course>,
}

impl Catalog {
    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting(day: Day, slot: Timeslot) -> Meeting {
        Meeting { day, slot }
    }

    #[test]
    fn block_key_uses_first_slot_and_pattern() {
        let course = Course::new(
            "c1",
            Subject::Kammi,
            Some(Level::L1),
            None,
            vec![meeting(Day::Sun, 1), meeting(Day::Mon, 1), meeting(Day::Thu, 1)],
        );
        assert_eq!(course.pattern, "Sun/Mon/Thu");
        assert_eq!(course.block_key().as_str(), "kammi|slot1|Sun/Mon/Thu");
    }

    #[test]
    fn block_key_without_meetings_uses_placeholder() {
        let course = Course::new("c9", Subject::Future, None, Some(10), vec![]);
        assert_eq!(course.block_key().as_str(), "future|slot?|");
    }

    #[test]
    fn assignments_set_and_remove_course() {
        let course = Course::new(
            "c4",
            Subject::Esl,
            Some(Level::L2),
            None,
            vec![meeting(Day::Sun, 4), meeting(Day::Tue, 4)],
        );
        let mut grid = Assignments::new();
        grid.assign_course(3, &course);
        grid.set(3, Day::Mon, 4, "c7");

        assert_eq!(grid.get(3, Day::Sun, 4), Some("c4"));
        assert_eq!(grid.get(3, Day::Wed, 4), None);
        assert_eq!(grid.filled_cells(), 3);

        let cleared = grid.without_course(3, &course);
        assert_eq!(cleared.get(3, Day::Sun, 4), None);
        assert_eq!(cleared.get(3, Day::Mon, 4), Some("c7"));
        // the original grid is left untouched
        assert_eq!(grid.get(3, Day::Tue, 4), Some("c4"));
    }

    #[test]
    fn resolutions_never_overwrite() {
        let key = BlockKey("esl|slot4|Sun/Tue/Thu".to_string());
        let mut resolutions = MoveResolutions::new();
        assert!(resolutions.insert("s1", &key, 2));
        assert!(!resolutions.insert("s1", &key, 5));
        assert_eq!(resolutions.get("s1", &key), Some(2));
        assert_eq!(resolutions.len(), 1);
    }

    #[test]
    fn grid_round_trips_through_json() {
        let mut grid = Assignments::new();
        grid.set(0, Day::Sun, 1, "c1");
        let json = serde_json::to_string(&grid).unwrap();
        assert_eq!(json, r#"{"0":{"Sun":{"1":"c1"}}}"#);
        let back: Assignments = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn room_hosts_are_bare_strings() {
        assert_eq!(
            serde_json::to_string(&RoomHost::AutoTahsili).unwrap(),
            "\"AUTO_TAHSILI\""
        );
        assert_eq!(
            serde_json::to_string(&RoomHost::Level(Level::L2)).unwrap(),
            "\"L2\""
        );

        let overrides: BTreeMap<RoomId, RoomHost> =
            serde_json::from_str(r#"{"0":"L1","4":"AUTO_TAHSILI"}"#).unwrap();
        assert_eq!(overrides[&0], RoomHost::Level(Level::L1));
        assert_eq!(overrides[&4], RoomHost::AutoTahsili);
        assert!(serde_json::from_str::<RoomHost>(r#""L4""#).is_err());
        assert!(serde_json::from_str::<RoomHost>(r#"{"LEVEL":"L2"}"#).is_err());
    }
}
