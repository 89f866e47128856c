use crate::config::ALTERNATE_TRACK_GRADE;
use crate::data::{Course, Student, Subject};

/// Whether `student` belongs in `course` as scheduled.
pub fn course_matches_student(course: &Course, student: &Student) -> bool {
    if course.subject.is_tahsili() {
        if course.grade != Some(student.grade) {
            return false;
        }
        // seniors only join Tahsili once Qudrat is behind them
        return !(student.grade == ALTERNATE_TRACK_GRADE && !student.done_q());
    }

    match course.subject.leveled() {
        Some(subject) => {
            !student.has_completed(subject) && course.level == Some(student.need(subject))
        }
        None => course.grade == Some(student.grade),
    }
}

/// Human-readable course name, e.g. `Qudrat Kammi L2` or `Ministry English G11`.
pub fn course_label(course: &Course) -> String {
    let mut label = course.subject.name().to_string();
    if let Some(level) = course.level {
        label.push_str(&format!(" {}", level));
    }
    if let Some(grade) = course.grade {
        label.push_str(&format!(" G{}", grade));
    }
    label
}

/// What a student still needs from a subject, for must-move listings.
pub fn need_label(subject: Subject, student: &Student) -> String {
    match subject.leveled() {
        Some(leveled) => format!("{} {}", subject.name(), student.need(leveled)),
        None => format!("{} Grade {}", subject.name(), student.grade),
    }
}
