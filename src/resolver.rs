use crate::data::{
    Assignments, BlockKey, Catalog, Day, MoveResolutions, RoomId, StudentId, Timeslot, Whitelist,
};
use crate::movement::{MovementView, cell_occupancy};
use crate::unresolved::unresolved_moves;
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnplacedReason {
    NoOptions,
    AtCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedMove {
    pub student_id: StudentId,
    pub block_key: BlockKey,
    pub from_room: RoomId,
    pub reason: UnplacedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoResolution {
    /// The caller's resolutions plus every destination filled in this pass.
    pub resolutions: MoveResolutions,
    pub placed: usize,
    pub unplaced: Vec<UnplacedMove>,
}

/// Fills in a destination for every pending move that still has room somewhere.
///
/// Moves are taken in (block key, origin room, student id) order. Each goes to the
/// option with the most seats left, then the emptier room, then the lower room id.
/// Seats are counted at the cell where the move was found and include destinations
/// chosen earlier in the same pass. Existing entries are never touched.
pub fn auto_resolve(
    catalog: &Catalog,
    assignments: &Assignments,
    whitelist: &Whitelist,
    existing: &MoveResolutions,
) -> AutoResolution {
    let view = MovementView::new(catalog, assignments, existing, whitelist);
    let pending = unresolved_moves(&view)
        .into_iter()
        .sorted_by(|a, b| {
            (&a.block_key, a.from_room, &a.entry.student.id).cmp(&(
                &b.block_key,
                b.from_room,
                &b.entry.student.id,
            ))
        })
        .collect_vec();

    let capacity: HashMap<RoomId, usize> = catalog
        .rooms
        .iter()
        .map(|room| (room.id, room.capacity as usize))
        .collect();
    let mut home_blocks: HashMap<(Day, Timeslot), HashMap<RoomId, BlockKey>> = HashMap::new();
    let mut resolutions = existing.clone();
    let mut placed = 0;
    let mut unplaced = Vec::new();

    for pending_move in pending {
        let student_id = pending_move.entry.student.id.as_str();
        if resolutions.get(student_id, &pending_move.block_key).is_some() {
            continue;
        }
        let blocks = home_blocks
            .entry((pending_move.day, pending_move.slot))
            .or_insert_with(|| view.home_blocks(pending_move.day, pending_move.slot));

        let best = pending_move
            .entry
            .options
            .iter()
            .filter_map(|option| {
                let seats = capacity.get(&option.room_id).copied()?;
                let occupied =
                    cell_occupancy(&catalog.students, blocks, &resolutions, option.room_id);
                let remaining = seats.saturating_sub(occupied);
                (remaining > 0).then_some((option.room_id, remaining, occupied))
            })
            .min_by_key(|(room_id, remaining, occupied)| {
                (Reverse(*remaining), *occupied, *room_id)
            });

        match best {
            Some((room_id, remaining, _)) => {
                resolutions.insert(student_id, &pending_move.block_key, room_id);
                placed += 1;
                debug!(
                    "{} -> room {} for {} ({} seats left)",
                    student_id,
                    room_id,
                    pending_move.block_key,
                    remaining - 1
                );
            }
            None => {
                let reason = if pending_move.entry.options.is_empty() {
                    UnplacedReason::NoOptions
                } else {
                    UnplacedReason::AtCapacity
                };
                unplaced.push(UnplacedMove {
                    student_id: student_id.to_string(),
                    block_key: pending_move.block_key.clone(),
                    from_room: pending_move.from_room,
                    reason,
                });
            }
        }
    }

    info!(
        "Auto-resolve placed {} moves, {} left unresolved",
        placed,
        unplaced.len()
    );

    AutoResolution {
        resolutions,
        placed,
        unplaced,
    }
}
