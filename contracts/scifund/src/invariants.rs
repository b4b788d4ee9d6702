#![allow(dead_code)]

extern crate std;

use crate::types::{Project, ProjectStatus};

/// Funding goal must always be positive.
pub fn assert_goal_positive(project: &Project) {
    assert!(
        project.funding_goal > 0,
        "project {} has non-positive goal ({})",
        project.id,
        project.funding_goal
    );
}

/// Funding and escrow never go negative, and escrow never exceeds what was
/// contributed.
pub fn assert_balances_consistent(project: &Project) {
    assert!(project.current_funding >= 0, "project {} funding negative", project.id);
    assert!(project.escrow >= 0, "project {} escrow negative", project.id);
    assert!(
        project.escrow <= project.current_funding,
        "project {} escrow {} exceeds funding {}",
        project.id,
        project.escrow,
        project.current_funding
    );
}

/// A project past `Active` must have reached its goal.
pub fn assert_status_matches_funding(project: &Project) {
    if project.status != ProjectStatus::Active {
        assert!(
            project.current_funding >= project.funding_goal,
            "project {} is {:?} with funding {} below goal {}",
            project.id,
            project.status,
            project.current_funding,
            project.funding_goal
        );
    }
}

/// After a contribution of `amount`, funding grows by exactly `amount`.
pub fn assert_contribution_applied(before: i128, after: i128, amount: i128) {
    assert_eq!(
        after,
        before + amount,
        "contribution not applied: {} + {} != {}",
        before,
        amount,
        after
    );
}

/// Only forward transitions are allowed:
///   Active -> Funded -> Completed
pub fn assert_valid_status_transition(from: ProjectStatus, to: ProjectStatus) {
    let valid = from == to
        || matches!(
            (from, to),
            (ProjectStatus::Active, ProjectStatus::Funded)
                | (ProjectStatus::Funded, ProjectStatus::Completed)
        );
    assert!(valid, "invalid status transition from {:?} to {:?}", from, to);
}

/// Fields fixed at creation never change.
pub fn assert_project_immutable_fields(original: &Project, current: &Project) {
    assert_eq!(original.id, current.id, "project id changed");
    assert_eq!(original.researcher, current.researcher, "researcher changed");
    assert_eq!(original.token, current.token, "token changed");
    assert_eq!(original.funding_goal, current.funding_goal, "goal changed");
    assert_eq!(original.deadline, current.deadline, "deadline changed");
    assert_eq!(original.content_hash, current.content_hash, "content hash changed");
}

/// Project IDs are sequential starting from 1.
pub fn assert_sequential_ids(projects: &[Project]) {
    for (i, project) in projects.iter().enumerate() {
        assert_eq!(project.id, i as u64 + 1, "expected id {}, got {}", i + 1, project.id);
    }
}

pub fn assert_all_project_invariants(project: &Project) {
    assert_goal_positive(project);
    assert_balances_consistent(project);
    assert_status_matches_funding(project);
}
