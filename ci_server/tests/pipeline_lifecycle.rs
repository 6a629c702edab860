mod common;

use std::sync::atomic::Ordering;

use ci_pipeline_manager::manager::{PipelineManager, RecentCounts};
use ci_pipeline_manager::models::pipeline::{
    CodeScan, GeneralTrigger, Pipeline, PostCommitTrigger, PushTrigger, ScmTrigger,
    SonarQubeConfig, SonarQubeScan,
};
use ci_pipeline_manager::models::project::{Integration, QueryParams, ScmType, SonarQubeServer};
use ci_pipeline_manager::models::record::Status;
use ci_pipeline_manager::scm::EventType;
use ci_pipeline_manager::store::DataStore;
use ci_pipeline_manager::ManagerError;

use common::*;

fn push() -> ScmTrigger {
    ScmTrigger {
        push: Some(PushTrigger {
            stages: vec![],
            branches: vec!["main".into()],
        }),
        ..Default::default()
    }
}

fn with_quality_gate(mut pipeline: Pipeline, gate: i64) -> Pipeline {
    if let Some(build) = pipeline.build.as_mut() {
        build.stages.code_scan = Some(CodeScan {
            sonar_qube: Some(SonarQubeScan {
                name: "sonar".into(),
                config: Some(SonarQubeConfig {
                    language: None,
                    threshold: gate,
                }),
            }),
        });
    }
    pipeline
}

async fn add_sonar_integration(h: &Harness) {
    h.store
        .insert_integration(Integration {
            name: "sonar".into(),
            sonar_qube: Some(SonarQubeServer {
                address: "http://sonar.test".into(),
                token: "sonar-token".into(),
            }),
        })
        .unwrap();
}

#[tokio::test]
async fn gitlab_create_registers_push_webhook() {
    let h = harness(ScmType::Gitlab).await;

    let created = h
        .manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();

    let id = created.id.clone().unwrap();
    let expected = format!("{CALLBACK}/{id}/gitlabwebhook");
    assert_eq!(created.webhook(), Some(expected.as_str()));
    assert_eq!(created.project_id, h.project.id);
    assert!(created.created_time.is_some());

    let hooks = h.provider.hooks();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].repo_url, REPO);
    assert_eq!(hooks[0].hook.url, expected);
    assert_eq!(hooks[0].hook.events, vec![EventType::Push]);

    let stored = h.store.find_pipeline_by_id(&id).await.unwrap();
    assert_eq!(stored.webhook(), Some(expected.as_str()));
}

#[tokio::test]
async fn nameless_pipeline_fails_without_side_effects() {
    let h = harness(ScmType::Gitlab).await;
    let mut pipeline = triggered_pipeline("", push());
    pipeline.alias.clear();

    let err = h.manager.create_pipeline(PROJECT, pipeline).await.unwrap_err();

    assert!(matches!(err, ManagerError::ValidationFailed { .. }));
    assert_eq!(h.provider.creates(), 0);
    let (_, total) = h
        .manager
        .list_pipelines(PROJECT, &QueryParams::default(), RecentCounts::default())
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn derived_name_collision_gets_random_suffix() {
    let h = harness(ScmType::Gitlab).await;
    let aliased = || Pipeline {
        alias: "My App".into(),
        ..Default::default()
    };

    let first = h.manager.create_pipeline(PROJECT, aliased()).await.unwrap();
    let second = h.manager.create_pipeline(PROJECT, aliased()).await.unwrap();

    assert_eq!(first.name, "my-app");
    assert!(second.name.starts_with("my-app-"));
    assert_ne!(second.name, first.name);
    assert_eq!(second.alias, "My App");
}

#[tokio::test]
async fn explicit_name_collision_is_rejected() {
    let h = harness(ScmType::Gitlab).await;
    h.manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();

    let err = h
        .manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::AlreadyExists(_)));
    assert_eq!(h.provider.creates(), 1);
    assert_eq!(h.provider.hooks().len(), 1);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let h = harness(ScmType::Gitlab).await;
    let err = h
        .manager
        .create_pipeline("ghost", triggered_pipeline("build", push()))
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::ContentNotFound(_)));
}

#[tokio::test]
async fn webhook_permission_denial_stores_nothing() {
    let h = harness(ScmType::Gitlab).await;
    h.provider
        .deny_create
        .store(true, Ordering::SeqCst);

    let err = h
        .manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::CreateWebhookPermissionDenied(ref name) if name == "build"));
    assert!(err.to_string().contains("grant webhook permission"));
    assert!(matches!(
        h.manager.get_pipeline(PROJECT, "build", RecentCounts::default()).await,
        Err(ManagerError::ContentNotFound(_))
    ));
}

#[tokio::test]
async fn failed_update_restores_old_webhook_and_keeps_pipeline() {
    let h = harness(ScmType::Gitlab).await;
    let created = h
        .manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();
    let old_url = created.webhook().unwrap().to_string();

    h.provider
        .fail_next_create
        .store(true, Ordering::SeqCst);
    let mut update = triggered_pipeline(
        "build",
        ScmTrigger {
            pull_request: Some(GeneralTrigger::default()),
            ..Default::default()
        },
    );
    update.description = "changed".into();

    let err = h
        .manager
        .update_pipeline(PROJECT, "build", update)
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::Scm(_)));

    let hooks = h.provider.hooks();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].hook.url, old_url);
    assert_eq!(hooks[0].hook.events, vec![EventType::Push]);

    let stored = h
        .manager
        .get_pipeline(PROJECT, "build", RecentCounts::default())
        .await
        .unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn failed_webhook_delete_aborts_update() {
    let h = harness(ScmType::Gitlab).await;
    let created = h
        .manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();

    h.provider
        .fail_delete
        .store(true, Ordering::SeqCst);
    let result = h
        .manager
        .update_pipeline(PROJECT, "build", triggered_pipeline("build", push()))
        .await;

    assert!(result.is_err());
    assert_eq!(h.provider.creates(), 1);
    let stored = h.store.find_pipeline_by_id(created.id.as_deref().unwrap()).await.unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn update_merges_fields_and_keeps_identity() {
    let h = harness(ScmType::Gitlab).await;
    let mut original = triggered_pipeline("build", push());
    original.owner = "alice".into();
    original.alias = "Build".into();
    let created = h.manager.create_pipeline(PROJECT, original).await.unwrap();

    let update = Pipeline {
        name: "renamed".into(),
        alias: "Build v2".into(),
        description: "nightly".into(),
        auto_trigger: created.auto_trigger.clone(),
        ..Default::default()
    };
    let updated = h
        .manager
        .update_pipeline(PROJECT, "build", update)
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, "build");
    assert_eq!(updated.project_id, created.project_id);
    assert_eq!(updated.created_time, created.created_time);
    assert_eq!(updated.alias, "Build v2");
    assert_eq!(updated.description, "nightly");
    assert_eq!(updated.owner, "alice");
    assert_eq!(updated.build, created.build);
    assert!(updated.updated_time.is_some());
    // Same id, same callback URL; the old registration was replaced, not duplicated.
    assert_eq!(updated.webhook(), created.webhook());
    assert_eq!(h.provider.hooks().len(), 1);
}

#[tokio::test]
async fn update_can_drop_the_trigger() {
    let h = harness(ScmType::Gitlab).await;
    h.manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();

    let update = Pipeline {
        alias: "manual only".into(),
        ..Default::default()
    };
    let updated = h
        .manager
        .update_pipeline(PROJECT, "build", update)
        .await
        .unwrap();

    assert!(updated.auto_trigger.is_none());
    assert!(h.provider.hooks().is_empty());
}

#[tokio::test]
async fn delete_removes_records_logs_webhook_and_quality_gate() {
    let h = harness(ScmType::Gitlab).await;
    add_sonar_integration(&h).await;
    let created = h
        .manager
        .create_pipeline(PROJECT, with_quality_gate(triggered_pipeline("build", push()), 2))
        .await
        .unwrap();
    let id = created.id.clone().unwrap();

    h.store.insert_record(record("r1", &id, Status::Success, day(1, 1))).unwrap();
    let log_dir = h.log_home.join(&h.project.id).join(&id);
    std::fs::create_dir_all(&log_dir).unwrap();
    std::fs::write(log_dir.join("r1.log"), "ok").unwrap();

    h.manager.delete_pipeline(PROJECT, "build").await.unwrap();

    assert_eq!(h.store.record_count(&id).unwrap(), 0);
    assert!(!log_dir.exists());
    assert!(h.provider.hooks().is_empty());
    assert!(h.gate.calls().contains(&GateCall::DeleteProject { key: id.clone() }));
    assert!(matches!(
        h.manager.get_pipeline_by_id(&id).await,
        Err(ManagerError::ContentNotFound(_))
    ));
}

#[tokio::test]
async fn delete_survives_webhook_cleanup_failure() {
    let h = harness(ScmType::Gitlab).await;
    h.manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();
    h.provider
        .fail_delete
        .store(true, Ordering::SeqCst);

    h.manager.delete_pipeline(PROJECT, "build").await.unwrap();

    assert!(matches!(
        h.manager.get_pipeline(PROJECT, "build", RecentCounts::default()).await,
        Err(ManagerError::ContentNotFound(_))
    ));
}

#[tokio::test]
async fn clear_deletes_every_pipeline_of_the_project() {
    let h = harness(ScmType::Gitlab).await;
    for name in ["a", "b", "c"] {
        h.manager
            .create_pipeline(PROJECT, triggered_pipeline(name, push()))
            .await
            .unwrap();
    }
    assert_eq!(h.provider.hooks().len(), 3);

    h.manager.clear_pipelines_of_project(PROJECT).await.unwrap();

    let (items, total) = h
        .manager
        .list_pipelines(PROJECT, &QueryParams::default(), RecentCounts::default())
        .await
        .unwrap();
    assert!(items.is_empty());
    assert_eq!(total, 0);
    assert!(h.provider.hooks().is_empty());
}

#[tokio::test]
async fn listing_attaches_recent_records_to_every_pipeline() {
    let h = harness(ScmType::Gitlab).await;
    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let p = h
            .manager
            .create_pipeline(PROJECT, triggered_pipeline(name, push()))
            .await
            .unwrap();
        ids.push(p.id.unwrap());
    }
    for id in &ids {
        h.store.insert_record(record(&format!("{id}-1"), id, Status::Success, day(1, 1))).unwrap();
        h.store.insert_record(record(&format!("{id}-2"), id, Status::Failed, day(1, 2))).unwrap();
        h.store.insert_record(record(&format!("{id}-3"), id, Status::Success, day(1, 3))).unwrap();
    }

    let counts = RecentCounts {
        recent: 2,
        recent_success: 1,
        recent_failed: 5,
    };
    let (items, total) = h
        .manager
        .list_pipelines(PROJECT, &QueryParams::default(), counts)
        .await
        .unwrap();

    assert_eq!(total, 3);
    for pipeline in &items {
        let id = pipeline.id.as_deref().unwrap();
        assert_eq!(pipeline.recent_records.len(), 2);
        assert_eq!(pipeline.recent_records[0].id, format!("{id}-3"));
        assert_eq!(pipeline.recent_success_records.len(), 1);
        assert_eq!(pipeline.recent_failed_records.len(), 1);
        assert_eq!(pipeline.recent_failed_records[0].status, Status::Failed);
    }
}

#[tokio::test]
async fn svn_post_commit_pipelines_are_found_by_repo_id() {
    let h = harness(ScmType::Svn).await;
    let mut pipeline = triggered_pipeline(
        "svn-build",
        ScmTrigger {
            post_commit: Some(PostCommitTrigger::default()),
            ..Default::default()
        },
    );
    pipeline.build = Some(repo_build("svn://svn.test/repo/trunk", ScmType::Svn));

    let created = h.manager.create_pipeline(PROJECT, pipeline).await.unwrap();

    assert!(created.webhook().is_none());
    assert_eq!(h.provider.creates(), 0);
    let found = h.manager.find_svn_hooks_pipelines("uuid-1").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "svn-build");
    assert!(matches!(
        h.manager.find_svn_hooks_pipelines("other").await,
        Err(ManagerError::ContentNotFound(_))
    ));
}

#[tokio::test]
async fn quality_gate_is_provisioned_and_existing_project_tolerated() {
    let h = harness(ScmType::Gitlab).await;
    add_sonar_integration(&h).await;
    h.gate
        .project_exists
        .store(true, Ordering::SeqCst);

    let mut pipeline = with_quality_gate(triggered_pipeline("build", push()), 3);
    pipeline.alias = "Build".into();
    let created = h.manager.create_pipeline(PROJECT, pipeline).await.unwrap();
    let id = created.id.unwrap();

    assert_eq!(
        h.gate.calls(),
        vec![
            GateCall::CreateProject {
                key: id.clone(),
                name: "Build".into()
            },
            GateCall::SetGate { key: id, gate_id: 3 },
        ]
    );
}

#[tokio::test]
async fn quality_gate_failure_tears_down_new_webhook() {
    let h = harness(ScmType::Gitlab).await;
    add_sonar_integration(&h).await;
    h.gate.fail_set.store(true, Ordering::SeqCst);

    let err = h
        .manager
        .create_pipeline(PROJECT, with_quality_gate(triggered_pipeline("build", push()), 3))
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::QualityGate(_)));
    assert_eq!(h.provider.creates(), 1);
    assert!(h.provider.hooks().is_empty());
    let (_, total) = h
        .manager
        .list_pipelines(PROJECT, &QueryParams::default(), RecentCounts::default())
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn statistics_cover_the_requested_days() {
    let h = harness(ScmType::Gitlab).await;
    let created = h
        .manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();
    let id = created.id.unwrap();
    h.store.insert_record(record("r1", &id, Status::Success, day(1, 10))).unwrap();
    h.store.insert_record(record("r2", &id, Status::Success, day(2, 10))).unwrap();
    h.store.insert_record(record("r3", &id, Status::Failed, day(3, 10))).unwrap();
    h.store.insert_record(record("late", &id, Status::Failed, day(9, 10))).unwrap();

    let stats = h
        .manager
        .get_statistics(PROJECT, "build", day(1, 0), day(3, 23))
        .await
        .unwrap();

    assert_eq!(stats.details.len(), 3);
    assert_eq!(stats.overview.total, 3);
    assert_eq!(stats.overview.success_ratio, "66.67%");
    assert_eq!(stats.details[1].status.success, 1);
}

#[tokio::test]
async fn non_ascii_alias_is_transliterated_into_a_name() {
    let h = harness(ScmType::Gitlab).await;
    let created = h
        .manager
        .create_pipeline(
            PROJECT,
            Pipeline {
                alias: "构建流水线".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!created.name.is_empty());
    assert!(created
        .name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    assert_eq!(created.alias, "构建流水线");
}

#[tokio::test]
async fn symbol_only_alias_falls_back_to_a_random_name() {
    let h = harness(ScmType::Gitlab).await;
    let created = h
        .manager
        .create_pipeline(
            PROJECT,
            Pipeline {
                alias: "!!!".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(created.name.len(), 6);
    assert!(created.name.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn raised_threshold_selects_gate_for_existing_pipeline() {
    let h = harness(ScmType::Gitlab).await;
    add_sonar_integration(&h).await;
    let created = h
        .manager
        .create_pipeline(PROJECT, with_quality_gate(triggered_pipeline("build", push()), 3))
        .await
        .unwrap();
    let id = created.id.clone().unwrap();
    h.gate.calls.lock().unwrap().clear();

    let updated = h
        .manager
        .update_pipeline(
            PROJECT,
            "build",
            with_quality_gate(triggered_pipeline("build", push()), 5),
        )
        .await
        .unwrap();

    assert_eq!(updated.id.as_deref(), Some(id.as_str()));
    assert_eq!(updated.quality_gate_threshold(), 5);
    let calls = h.gate.calls();
    assert!(matches!(&calls[0], GateCall::CreateProject { key, .. } if *key == id));
    assert_eq!(calls.last(), Some(&GateCall::SetGate { key: id, gate_id: 5 }));
}

#[tokio::test]
async fn unchanged_threshold_skips_quality_gate() {
    let h = harness(ScmType::Gitlab).await;
    add_sonar_integration(&h).await;
    h.manager
        .create_pipeline(PROJECT, with_quality_gate(triggered_pipeline("build", push()), 3))
        .await
        .unwrap();
    h.gate.calls.lock().unwrap().clear();

    let mut update = with_quality_gate(triggered_pipeline("build", push()), 3);
    update.description = "same gate".into();
    h.manager
        .update_pipeline(PROJECT, "build", update)
        .await
        .unwrap();

    assert!(h.gate.calls().is_empty());
}

#[tokio::test]
async fn quality_gate_failure_on_update_keeps_webhook_in_sync() {
    let h = harness(ScmType::Gitlab).await;
    add_sonar_integration(&h).await;
    let created = h
        .manager
        .create_pipeline(PROJECT, triggered_pipeline("build", push()))
        .await
        .unwrap();
    let old_url = created.webhook().unwrap().to_string();

    // Drop the trigger and raise the threshold in one update.
    h.gate.fail_set.store(true, Ordering::SeqCst);
    let update = with_quality_gate(
        Pipeline {
            build: Some(repo_build(REPO, ScmType::Gitlab)),
            ..Default::default()
        },
        3,
    );
    let err = h
        .manager
        .update_pipeline(PROJECT, "build", update)
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::QualityGate(_)));

    let stored = h
        .manager
        .get_pipeline(PROJECT, "build", RecentCounts::default())
        .await
        .unwrap();
    let hooks = h.provider.hooks();
    assert_eq!(stored, created);
    assert_eq!(stored.webhook().is_some(), !hooks.is_empty());
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].hook.url, old_url);
}
