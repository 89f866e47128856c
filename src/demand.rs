use crate::data::{Level, LevelCounts, LeveledSubject, RoutingPolicy, Student, StudentId};
use crate::error::PlannerError;
use itertools::Itertools;
use log::{debug, trace};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Result of routing one subject's students through a [`RoutingPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandRemap {
    pub subject: LeveledSubject,
    /// Raw need per level, ignoring the policy.
    pub base: LevelCounts,
    /// Need per level after force-moves.
    pub effective: LevelCounts,
    /// Students whose effective level differs from their raw need.
    pub moved: usize,
    pub levels_running: Vec<Level>,
    /// Students left at a level that does not run.
    pub orphaned: LevelCounts,
    pub effective_levels: BTreeMap<StudentId, Level>,
}

impl DemandRemap {
    pub fn effective_level(&self, student: &Student) -> Level {
        self.effective_levels
            .get(&student.id)
            .copied()
            .unwrap_or_else(|| student.need(self.subject))
    }

    pub fn is_running(&self, level: Level) -> bool {
        self.levels_running.contains(&level)
    }

    /// Rejects a policy that leaves students at a closed level.
    pub fn ensure_routable(&self) -> Result<(), PlannerError> {
        match Level::ALL.into_iter().find(|l| self.orphaned[*l] > 0) {
            Some(level) => Err(PlannerError::OrphanedStudents {
                subject: self.subject,
                level,
                count: self.orphaned[level],
            }),
            None => Ok(()),
        }
    }
}

/// Demand summary of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDemand {
    pub base: LevelCounts,
    pub effective: LevelCounts,
    pub merged_count: usize,
    pub levels_running: Vec<Level>,
    pub orphaned: LevelCounts,
}

impl From<&DemandRemap> for SubjectDemand {
    fn from(remap: &DemandRemap) -> Self {
        Self {
            base: remap.base,
            effective: remap.effective,
            merged_count: remap.moved,
            levels_running: remap.levels_running.clone(),
            orphaned: remap.orphaned,
        }
    }
}

/// Rounds and clamps a force-move count into `[0, max]`. Non-finite input counts as zero.
pub fn clamp_count(value: f64, max: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let rounded = value.round();
    if rounded >= max as f64 {
        max
    } else {
        rounded as usize
    }
}

/// A force-move may never target its own level.
pub fn normalize_target(source: Level, target: Level) -> Level {
    if target != source {
        return target;
    }
    match source {
        Level::L1 | Level::L3 => Level::L2,
        Level::L2 => Level::L1,
    }
}

// consecutive (destination, count) runs for one sorted partition
fn partition_routes(level: Level, size: usize, policy: &RoutingPolicy) -> Vec<(Level, usize)> {
    if policy.runs(level) {
        return vec![(level, size)];
    }
    match level {
        Level::L2 => {
            let rule = policy.force_move.l2;
            let to_l1 = clamp_count(rule.to_l1, size);
            let to_l3 = clamp_count(rule.to_l3, size - to_l1);
            vec![
                (Level::L1, to_l1),
                (Level::L3, to_l3),
                (Level::L2, size - to_l1 - to_l3),
            ]
        }
        Level::L1 | Level::L3 => {
            let rule = if level == Level::L1 {
                policy.force_move.l1
            } else {
                policy.force_move.l3
            };
            let count = clamp_count(rule.count, size);
            vec![
                (normalize_target(level, rule.target), count),
                (level, size - count),
            ]
        }
    }
}

/// Redistributes one subject's demand according to `policy`.
///
/// Students who are done with the subject are left out. Each raw-level partition is
/// sorted by student id so the same input always moves the same students.
pub fn remap_demand(
    students: &[Student],
    subject: LeveledSubject,
    policy: &RoutingPolicy,
) -> DemandRemap {
    let grouped: HashMap<Level, Vec<&Student>> = students
        .iter()
        .filter(|s| !s.has_completed(subject))
        .map(|s| (s.need(subject), s))
        .into_group_map();

    let mut base = LevelCounts::default();
    let mut effective = LevelCounts::default();
    let mut orphaned = LevelCounts::default();
    let mut effective_levels = BTreeMap::new();
    let mut moved = 0;

    for level in Level::ALL {
        let source: Vec<&Student> = grouped
            .get(&level)
            .map(|v| v.iter().copied().sorted_by(|a, b| a.id.cmp(&b.id)).collect())
            .unwrap_or_default();
        base[level] = source.len();

        let mut cursor = source.iter();
        for (destination, count) in partition_routes(level, source.len(), policy) {
            for student in cursor.by_ref().take(count) {
                effective_levels.insert(student.id.clone(), destination);
                effective[destination] += 1;
                if destination != level {
                    moved += 1;
                }
            }
            if !policy.runs(destination) {
                orphaned[destination] += count;
            }
        }
        trace!(
            "{} {}: {} students, {} running",
            subject,
            level,
            source.len(),
            policy.runs(level)
        );
    }

    debug!(
        "Remapped {} demand: base {:?}, effective {:?}, {} moved",
        subject, base, effective, moved
    );

    DemandRemap {
        subject,
        base,
        effective,
        moved,
        levels_running: policy.levels_running(),
        orphaned,
        effective_levels,
    }
}

/// Demand summary for every leveled subject. Subjects without a policy run all levels.
pub fn demand_by_subject(
    students: &[Student],
    policies: &BTreeMap<LeveledSubject, RoutingPolicy>,
) -> BTreeMap<LeveledSubject, SubjectDemand> {
    LeveledSubject::ALL
        .into_iter()
        .map(|subject| {
            let policy = policies.get(&subject).copied().unwrap_or_default();
            let remap = remap_demand(students, subject, &policy);
            (subject, SubjectDemand::from(&remap))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PerLevel, SingleForceMove, SplitForceMove, StudentNeeds, SubjectFlags};

    fn student(id: &str, esl: Level) -> Student {
        Student {
            id: id.to_string(),
            name: id.to_string(),
            homeroom: 0,
            grade: 10,
            done: SubjectFlags::default(),
            needs: StudentNeeds {
                kammi: Level::L1,
                lafthi: Level::L1,
                esl,
            },
        }
    }

    fn cohort(l1: usize, l2: usize, l3: usize) -> Vec<Student> {
        let mut students = Vec::new();
        let mut n = 1;
        for (level, count) in [(Level::L1, l1), (Level::L2, l2), (Level::L3, l3)] {
            for _ in 0..count {
                students.push(student(&format!("s{}", n), level));
                n += 1;
            }
        }
        students
    }

    #[test]
    fn default_policy_keeps_everyone() {
        let students = cohort(5, 4, 3);
        let remap = remap_demand(&students, LeveledSubject::Esl, &RoutingPolicy::default());
        assert_eq!(remap.base, PerLevel::new(5, 4, 3));
        assert_eq!(remap.effective, remap.base);
        assert_eq!(remap.moved, 0);
        assert!(remap.ensure_routable().is_ok());
    }

    #[test]
    fn closed_middle_level_splits_both_ways() {
        let students = cohort(2, 6, 1);
        let mut policy = RoutingPolicy::default();
        policy.run.l2 = false;
        policy.force_move.l2 = SplitForceMove {
            to_l1: 4.0,
            to_l3: 2.0,
        };

        let remap = remap_demand(&students, LeveledSubject::Esl, &policy);
        assert_eq!(remap.effective, PerLevel::new(6, 0, 3));
        assert_eq!(remap.effective.total(), remap.base.total());
        assert_eq!(remap.moved, 6);
        assert_eq!(remap.levels_running, vec![Level::L1, Level::L3]);
        assert!(remap.ensure_routable().is_ok());
    }

    #[test]
    fn partitions_are_taken_in_id_order() {
        // s10 sorts before s3 and s4
        let students = vec![
            student("s4", Level::L3),
            student("s10", Level::L3),
            student("s3", Level::L3),
        ];
        let mut policy = RoutingPolicy::default();
        policy.run.l3 = false;
        policy.force_move.l3 = SingleForceMove {
            target: Level::L2,
            count: 3.0,
        };
        let remap = remap_demand(&students, LeveledSubject::Esl, &policy);
        assert_eq!(remap.effective_levels["s10"], Level::L2);

        policy.force_move.l3.count = 1.0;
        let partial = remap_demand(&students, LeveledSubject::Esl, &policy);
        assert_eq!(partial.effective_levels["s10"], Level::L2);
        assert_eq!(partial.effective_levels["s3"], Level::L3);
        assert_eq!(partial.effective_levels["s4"], Level::L3);
    }

    #[test]
    fn shortfall_is_rejected() {
        let students = cohort(3, 3, 3);
        let mut policy = RoutingPolicy::default();
        policy.run.l1 = false;
        policy.force_move.l1.count = 1.0;

        let remap = remap_demand(&students, LeveledSubject::Esl, &policy);
        assert_eq!(remap.orphaned, PerLevel::new(2, 0, 0));
        assert_eq!(remap.effective.total(), remap.base.total());
        assert_eq!(
            remap.ensure_routable(),
            Err(PlannerError::OrphanedStudents {
                subject: LeveledSubject::Esl,
                level: Level::L1,
                count: 2,
            })
        );
    }

    #[test]
    fn bad_counts_clamp_to_zero_or_partition() {
        assert_eq!(clamp_count(f64::NAN, 10), 0);
        assert_eq!(clamp_count(f64::INFINITY, 10), 0);
        assert_eq!(clamp_count(-3.0, 10), 0);
        assert_eq!(clamp_count(2.6, 10), 3);
        assert_eq!(clamp_count(40.0, 10), 10);
    }

    #[test]
    fn self_target_is_normalized() {
        assert_eq!(normalize_target(Level::L1, Level::L1), Level::L2);
        assert_eq!(normalize_target(Level::L3, Level::L3), Level::L2);
        assert_eq!(normalize_target(Level::L2, Level::L2), Level::L1);
        assert_eq!(normalize_target(Level::L1, Level::L3), Level::L3);

        let students = cohort(3, 0, 0);
        let mut policy = RoutingPolicy::default();
        policy.run.l1 = false;
        policy.force_move.l1 = SingleForceMove {
            target: Level::L1,
            count: 3.0,
        };
        let remap = remap_demand(&students, LeveledSubject::Esl, &policy);
        assert_eq!(remap.effective, PerLevel::new(0, 3, 0));
    }

    #[test]
    fn completed_students_are_excluded() {
        let mut students = cohort(2, 2, 0);
        students[0].done.esl = true;
        let remap = remap_demand(&students, LeveledSubject::Esl, &RoutingPolicy::default());
        assert_eq!(remap.base, PerLevel::new(1, 2, 0));
        assert!(!remap.effective_levels.contains_key("s1"));
    }

    #[test]
    fn demand_is_conserved_for_every_subject() {
        let students = cohort(7, 9, 4);
        let mut policies = BTreeMap::new();
        let mut esl = RoutingPolicy::default();
        esl.run.l3 = false;
        esl.force_move.l3.count = 2.0;
        policies.insert(LeveledSubject::Esl, esl);

        let demand = demand_by_subject(&students, &policies);
        assert_eq!(demand.len(), 3);
        for summary in demand.values() {
            assert_eq!(summary.base.total(), summary.effective.total());
        }
        assert_eq!(demand[&LeveledSubject::Esl].merged_count, 2);
        assert_eq!(demand[&LeveledSubject::Esl].orphaned.l3, 2);
    }
}
