use crate::data::{Grade, Level, LeveledSubject};
use thiserror::Error;

/// Conditions the planner refuses to work around.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlannerError {
    #[error("Room inventory is empty")]
    EmptyRoomInventory,

    #[error("Grade {grade} has {students} students but no rooms")]
    MissingGradeRooms { grade: Grade, students: usize },

    #[error(
        "{count} {subject} students would be left at {level}, which is not running; raise the force-move counts"
    )]
    OrphanedStudents {
        subject: LeveledSubject,
        level: Level,
        count: usize,
    },

    #[error("Unknown stream group `{0}`")]
    UnknownStreamGroup(String),
}
