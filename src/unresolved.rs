use crate::data::{BlockKey, Day, RoomId, StudentId, Timeslot};
use crate::movement::{MovementView, MustMove};
use log::debug;
use serde::Serialize;
use std::collections::HashSet;

/// A must-move with no recorded destination, tagged with where it was first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedMove {
    #[serde(flatten)]
    pub entry: MustMove,
    pub day: Day,
    pub slot: Timeslot,
    pub from_room: RoomId,
    pub block_key: BlockKey,
}

/// Sweeps every assigned cell and lists each pending move once per (student, block).
pub fn unresolved_moves(view: &MovementView<'_>) -> Vec<UnresolvedMove> {
    let mut seen: HashSet<(StudentId, BlockKey)> = HashSet::new();
    let mut pending = Vec::new();

    for room in view.rooms() {
        for day in Day::ALL {
            for (slot, _) in view.assignments().slots(room.id, day) {
                let movement = view.classify(room.id, day, slot);
                if movement.block_key.is_empty() {
                    continue;
                }
                for entry in movement.must_move_out {
                    if entry.resolved.is_some() {
                        continue;
                    }
                    let key = (entry.student.id.clone(), movement.block_key.clone());
                    if !seen.insert(key) {
                        continue;
                    }
                    pending.push(UnresolvedMove {
                        entry,
                        day,
                        slot,
                        from_room: room.id,
                        block_key: movement.block_key.clone(),
                    });
                }
            }
        }
    }

    debug!("{} unresolved moves", pending.len());
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Level, MoveResolutions};
    use crate::movement::tests::{esl_session, student};

    #[test]
    fn each_student_block_is_listed_once() {
        let (catalog, grid, whitelist) = esl_session(vec![
            student("s1", 0, 10, Level::L2),
            student("s2", 0, 10, Level::L2),
            student("s3", 1, 10, Level::L1),
        ]);
        let resolutions = MoveResolutions::new();
        let view = MovementView::new(&catalog, &grid, &resolutions, &whitelist);
        let pending = unresolved_moves(&view);

        // two meetings per week, but one entry per student
        assert_eq!(pending.len(), 3);
        let mut keys: Vec<(&str, &BlockKey)> = pending
            .iter()
            .map(|m| (m.entry.student.id.as_str(), &m.block_key))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 3);

        let first = &pending[0];
        assert_eq!(first.day, Day::Sun);
        assert_eq!(first.slot, 4);
        assert_eq!(first.from_room, 0);
    }

    #[test]
    fn resolved_moves_are_skipped() {
        let (catalog, grid, whitelist) = esl_session(vec![
            student("s1", 0, 10, Level::L2),
            student("s2", 0, 10, Level::L2),
        ]);
        let mut resolutions = MoveResolutions::new();
        resolutions.insert("s1", &BlockKey("esl|slot4|Sun/Tue".to_string()), 1);
        let view = MovementView::new(&catalog, &grid, &resolutions, &whitelist);
        let pending = unresolved_moves(&view);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry.student.id, "s2");
    }

    #[test]
    fn serializes_flat() {
        let (catalog, grid, whitelist) = esl_session(vec![student("s1", 0, 10, Level::L2)]);
        let resolutions = MoveResolutions::new();
        let view = MovementView::new(&catalog, &grid, &resolutions, &whitelist);
        let json = serde_json::to_value(unresolved_moves(&view)).unwrap();
        assert_eq!(json[0]["id"], "s1");
        assert_eq!(json[0]["fromRoom"], 0);
        assert_eq!(json[0]["neededLabel"], "ESL (IELTS) L2");
        assert_eq!(json[0]["blockKey"], "esl|slot4|Sun/Tue");
    }
}
