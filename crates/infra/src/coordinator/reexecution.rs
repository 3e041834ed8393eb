//! Construction of re-execution runs (pure).

use relaunch_core::tags::{
    IS_RESUME_RETRY_TAG, PARENT_RUN_ID_TAG, RETRY_STRATEGY_TAG, ROOT_RUN_ID_TAG,
    TAGS_TO_OMIT_ON_RETRY, bool_tag_value,
};
use relaunch_core::{ReexecutionStrategy, Run, RunStatus, RunTags};

use super::r#trait::ReexecutionRequest;

/// Build the (not yet persisted) child run described by `request`.
///
/// - Parent tags are inherited minus per-attempt bookkeeping, then `extra_tags`
///   are applied, then lineage tags are written last so they cannot be spoofed.
/// - Op/asset selection comes from the resolved job, so a subset parent yields a
///   subset child.
/// - FROM_FAILURE takes the parent's step plan (every step of the job when the
///   parent had none) minus the steps the parent completed. When that leaves
///   nothing, the whole plan runs again. ALL_STEPS always runs every step of the
///   (subset) job.
pub fn build_reexecution_run(request: &ReexecutionRequest) -> Run {
    let parent = &request.parent_run;
    let job = &request.remote_job;
    let root_run_id = parent.lineage_root();

    let mut tags = if request.use_parent_run_tags {
        parent.tags.without(TAGS_TO_OMIT_ON_RETRY)
    } else {
        RunTags::new()
    };
    tags.merge(&request.extra_tags);
    tags.insert(PARENT_RUN_ID_TAG, parent.run_id.to_string());
    tags.insert(ROOT_RUN_ID_TAG, root_run_id.to_string());
    tags.insert(RETRY_STRATEGY_TAG, request.strategy.as_str());
    tags.insert(IS_RESUME_RETRY_TAG, bool_tag_value(request.strategy.is_resume()));

    let step_keys = match request.strategy {
        ReexecutionStrategy::FromFailure => {
            let plan = parent
                .step_keys_to_execute
                .clone()
                .unwrap_or_else(|| job.step_keys.clone());
            let remaining: Vec<String> = plan
                .iter()
                .filter(|step| !request.succeeded_steps.contains(*step))
                .cloned()
                .collect();
            if remaining.is_empty() { plan } else { remaining }
        }
        ReexecutionStrategy::AllSteps => job.step_keys.clone(),
    };

    let mut run = Run::new(job.name())
        .with_status(RunStatus::NotStarted)
        .with_tags(tags)
        .with_origin(job.origin.clone())
        .with_step_keys(step_keys);
    run.parent_run_id = Some(parent.run_id);
    run.root_run_id = Some(root_run_id);
    run.op_selection = job.op_selection.clone();
    run.asset_selection = job.asset_selection.clone();
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use relaunch_core::JobOrigin;
    use relaunch_core::tags::{
        AUTO_RETRY_RUN_ID_TAG, MAX_RETRIES_TAG, RETRY_NUMBER_TAG, RUN_FAILURE_REASON_TAG,
        WILL_RETRY_TAG,
    };

    use crate::workspace::RemoteJob;

    fn remote_job(steps: &[&str]) -> RemoteJob {
        RemoteJob {
            origin: JobOrigin::new("loc", "repo", "etl"),
            op_selection: None,
            asset_selection: None,
            step_keys: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn failed_parent() -> Run {
        Run::new("etl")
            .with_status(RunStatus::Failure)
            .with_origin(JobOrigin::new("loc", "repo", "etl"))
            .with_tag("team", "data")
            .with_tag(MAX_RETRIES_TAG, "2")
            .with_tag(WILL_RETRY_TAG, "true")
            .with_tag(RUN_FAILURE_REASON_TAG, "STEP_FAILURE")
            .with_tag(AUTO_RETRY_RUN_ID_TAG, "stale")
            .with_tag(RETRY_NUMBER_TAG, "1")
    }

    #[test]
    fn child_inherits_user_tags_but_not_bookkeeping() {
        let parent = failed_parent();
        let request = ReexecutionRequest::new(
            parent.clone(),
            remote_job(&["a", "b"]),
            ReexecutionStrategy::FromFailure,
        )
        .with_extra_tags(RunTags::new().with(RETRY_NUMBER_TAG, "2"));

        let child = build_reexecution_run(&request);

        assert_eq!(child.status, RunStatus::NotStarted);
        assert_eq!(child.parent_run_id, Some(parent.run_id));
        assert_eq!(child.root_run_id, Some(parent.run_id));
        assert_eq!(child.tags.get("team"), Some("data"));
        assert_eq!(child.tags.get(MAX_RETRIES_TAG), Some("2"));
        assert_eq!(child.tags.get(RETRY_NUMBER_TAG), Some("2"));
        assert_eq!(child.tags.get(IS_RESUME_RETRY_TAG), Some("true"));
        assert_eq!(child.tags.get(RETRY_STRATEGY_TAG), Some("FROM_FAILURE"));
        assert_eq!(child.tags.get(PARENT_RUN_ID_TAG), Some(parent.run_id.to_string().as_str()));
        assert!(!child.tags.contains(WILL_RETRY_TAG));
        assert!(!child.tags.contains(AUTO_RETRY_RUN_ID_TAG));
        assert!(!child.tags.contains(RUN_FAILURE_REASON_TAG));
    }

    #[test]
    fn parent_tags_can_be_dropped() {
        let request = ReexecutionRequest::new(
            failed_parent(),
            remote_job(&["a"]),
            ReexecutionStrategy::AllSteps,
        )
        .with_use_parent_run_tags(false);

        let child = build_reexecution_run(&request);

        assert!(!child.tags.contains("team"));
        assert_eq!(child.tags.get(IS_RESUME_RETRY_TAG), Some("false"));
    }

    #[test]
    fn root_is_carried_through_the_lineage() {
        let root = failed_parent();
        let first = build_reexecution_run(&ReexecutionRequest::new(
            root.clone(),
            remote_job(&["a"]),
            ReexecutionStrategy::FromFailure,
        ));
        let second = build_reexecution_run(&ReexecutionRequest::new(
            first.clone(),
            remote_job(&["a"]),
            ReexecutionStrategy::FromFailure,
        ));

        assert_eq!(second.parent_run_id, Some(first.run_id));
        assert_eq!(second.root_run_id, Some(root.run_id));
    }

    #[test]
    fn step_plan_depends_on_strategy() {
        let parent = failed_parent().with_step_keys(["b"]);
        let job = remote_job(&["a", "b", "c"]);

        let resumed = build_reexecution_run(&ReexecutionRequest::new(
            parent.clone(),
            job.clone(),
            ReexecutionStrategy::FromFailure,
        ));
        assert_eq!(resumed.step_keys_to_execute, Some(vec!["b".to_string()]));

        let full = build_reexecution_run(&ReexecutionRequest::new(
            parent,
            job,
            ReexecutionStrategy::AllSteps,
        ));
        assert_eq!(
            full.step_keys_to_execute,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn subset_selection_follows_the_resolved_job() {
        let mut job = remote_job(&["transform"]);
        job.asset_selection = Some(BTreeSet::from(["clean".to_string()]));

        let child = build_reexecution_run(&ReexecutionRequest::new(
            failed_parent(),
            job,
            ReexecutionStrategy::AllSteps,
        ));

        assert_eq!(child.asset_selection, Some(BTreeSet::from(["clean".to_string()])));
        assert_eq!(child.op_selection, None);
        assert_eq!(child.step_keys_to_execute, Some(vec!["transform".to_string()]));
    }

    #[test]
    fn from_failure_skips_completed_steps() {
        let job = remote_job(&["extract", "load"]);

        let resumed = build_reexecution_run(
            &ReexecutionRequest::new(failed_parent(), job.clone(), ReexecutionStrategy::FromFailure)
                .with_succeeded_steps(["extract"]),
        );
        assert_eq!(resumed.step_keys_to_execute, Some(vec!["load".to_string()]));

        let full = build_reexecution_run(
            &ReexecutionRequest::new(failed_parent(), job, ReexecutionStrategy::AllSteps)
                .with_succeeded_steps(["extract"]),
        );
        assert_eq!(
            full.step_keys_to_execute,
            Some(vec!["extract".to_string(), "load".to_string()])
        );
    }

    #[test]
    fn from_failure_with_nothing_left_reruns_the_plan() {
        let request = ReexecutionRequest::new(
            failed_parent(),
            remote_job(&["extract", "load"]),
            ReexecutionStrategy::FromFailure,
        )
        .with_succeeded_steps(["extract", "load"]);

        let child = build_reexecution_run(&request);

        assert_eq!(
            child.step_keys_to_execute,
            Some(vec!["extract".to_string(), "load".to_string()])
        );
    }
}
