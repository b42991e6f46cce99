//! New cases pick up watchers from their project, folders and organization.

use casewatch_core::AssetKind;
use casewatch_reconcile::{AutoSubscriber, CycleRunner, AUTO_SUBSCRIBE_AUTHOR};
use casewatch_test_utils::{
    tracked_asset, AssetRegistry, CaseBuilder, FakeHierarchy, FakeSupportActions, MockStore,
    RecordingNotifier, ScriptedCaseSource,
};
use std::sync::Arc;

fn hierarchy() -> FakeHierarchy {
    FakeHierarchy::new()
        .with_project("555", "shop-prod", "folders/F")
        .with_folder("F", "organizations/100")
}

fn runner_with(
    store: Arc<MockStore>,
    actions: Arc<FakeSupportActions>,
    source: Arc<ScriptedCaseSource>,
) -> CycleRunner {
    let subscriber = AutoSubscriber::new(Arc::new(hierarchy()), store.clone(), actions);
    CycleRunner::new("100", source, store, Arc::new(RecordingNotifier::new()))
        .with_auto_subscriber(subscriber)
}

#[tokio::test]
async fn new_case_gets_one_merged_silent_comment() {
    let store = Arc::new(MockStore::new());
    for asset in [
        tracked_asset("C-org", AssetKind::Organization, "organizations/100", &["org@x.com"]),
        tracked_asset("C-folder", AssetKind::Folder, "F", &["folder@x.com", "org@x.com"]),
        tracked_asset("C-proj", AssetKind::Project, "555", &["proj@x.com"]),
        tracked_asset("C-other", AssetKind::Project, "elsewhere", &["nope@x.com"]),
    ] {
        store.upsert_asset(&asset).await.unwrap();
    }
    let actions = Arc::new(FakeSupportActions::new());
    let source = Arc::new(
        ScriptedCaseSource::new()
            .then_cases(vec![CaseBuilder::new("C4").parent("projects/555").build()]),
    );
    let mut runner = runner_with(store, actions.clone(), source);

    let summary = runner.run_cycle().await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.subscribed_emails, 3);
    assert_eq!(summary.autosubscribe_failures, 0);

    let comments = actions.comments();
    assert_eq!(comments.len(), 1);
    let comment = &comments[0];
    assert_eq!(comment.case_number, "C4");
    assert!(!comment.notify);
    assert_eq!(comment.author_label, AUTO_SUBSCRIBE_AUTHOR);
    for email in ["org@x.com", "folder@x.com", "proj@x.com"] {
        assert!(comment.body.contains(email), "missing {email}");
        assert_eq!(comment.body.matches(email).count(), 1);
    }
    assert!(!comment.body.contains("nope@x.com"));

    let mut subscribed = actions.subscribers("C4");
    subscribed.sort();
    assert_eq!(subscribed, vec!["folder@x.com", "org@x.com", "proj@x.com"]);
}

#[tokio::test]
async fn existing_cases_are_not_resubscribed() {
    let store = Arc::new(MockStore::new());
    store
        .upsert_asset(&tracked_asset("C1", AssetKind::Project, "555", &["a@x.com"]))
        .await
        .unwrap();
    let actions = Arc::new(FakeSupportActions::new());
    let case = CaseBuilder::new("C4").parent("projects/555").build();
    let source = Arc::new(
        ScriptedCaseSource::new()
            .then_cases(vec![case.clone()])
            .then_cases(vec![CaseBuilder::new("C4")
                .parent("projects/555")
                .updated_at(3)
                .build()]),
    );
    let mut runner = runner_with(store, actions.clone(), source);

    runner.run_cycle().await.unwrap();
    runner.run_cycle().await.unwrap();
    assert_eq!(actions.comments().len(), 1);
}

#[tokio::test]
async fn hierarchy_failure_does_not_block_cycle() {
    let store = Arc::new(MockStore::new());
    store
        .upsert_asset(&tracked_asset("C1", AssetKind::Project, "555", &["a@x.com"]))
        .await
        .unwrap();
    let actions = Arc::new(FakeSupportActions::new());
    let source = Arc::new(ScriptedCaseSource::new().then_cases(vec![
        CaseBuilder::new("lost").parent("projects/unknown").build(),
        CaseBuilder::new("C4").parent("projects/555").build(),
    ]));
    let mut runner = runner_with(store.clone(), actions.clone(), source);

    let summary = runner.run_cycle().await.unwrap();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.autosubscribe_failures, 1);
    assert!(store.snapshot("lost").is_some());
    assert_eq!(actions.comments().len(), 1);
    assert_eq!(actions.comments()[0].case_number, "C4");
}
