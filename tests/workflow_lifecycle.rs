mod common;

use std::sync::Arc;

use common::{eventually, fast_policy, user};
use rfp_backend::dispatch::{InlineDispatcher, Job, JobRunner, RecordingDispatcher};
use rfp_backend::domain::{
    CompleteUploadRequest, CreateRfpRequest, NewVersionRequest, Role, RfpStatus,
    UpdateRfpRequest,
};
use rfp_backend::services::email::CapturingChannel;
use rfp_backend::services::{DocumentService, LocalDocumentStore};
use rfp_backend::store::{MemoryStore, RfpStore};
use rfp_backend::workflow::{WorkflowEngine, WorkflowError};
use uuid::Uuid;

fn create_request(title: &str) -> CreateRfpRequest {
    CreateRfpRequest {
        title: title.to_string(),
        description: Some("Ergonomic desks for the Lisbon office".to_string()),
        requirements: Some("Delivery within 30 days".to_string()),
    }
}

#[tokio::test]
async fn buyer_and_supplier_walk_an_rfp_to_approval() {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(CapturingChannel::new());
    let runner = Arc::new(JobRunner::new(store.clone(), channel.clone(), fast_policy(3)));
    let engine = WorkflowEngine::new(store.clone(), Arc::new(InlineDispatcher::new(runner)));

    let buyer = user(store.as_ref(), "buyer@acme.io", Role::Buyer).await;
    let supplier = user(store.as_ref(), "sales@desks.io", Role::Supplier).await;

    let rfp = engine.create(&buyer, create_request("Desks")).await.unwrap();
    assert_eq!(rfp.status, RfpStatus::Draft);

    let rfp = engine
        .request_transition(rfp.id, &buyer, RfpStatus::Published)
        .await
        .unwrap();
    assert_eq!(rfp.status, RfpStatus::Published);

    engine
        .submit_response(rfp.id, &supplier, Some("offer text".to_string()))
        .await
        .unwrap();
    let current = store.get_rfp(rfp.id).await.unwrap().unwrap();
    assert_eq!(current.status, RfpStatus::ResponseSubmitted);
    let responses = store.list_responses(rfp.id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].content, "offer text");
    assert_eq!(responses[0].supplier_id, supplier.id);

    engine
        .request_transition(rfp.id, &buyer, RfpStatus::UnderReview)
        .await
        .unwrap();
    let approved = engine
        .request_transition(rfp.id, &buyer, RfpStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, RfpStatus::Approved);

    let err = engine
        .request_transition(rfp.id, &buyer, RfpStatus::Published)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidTransition {
            from: RfpStatus::Approved,
            to: RfpStatus::Published
        }
    ));

    // Published + response submitted + approved to owner, approved to supplier
    assert!(eventually(|| channel.sent().len() == 4).await);
    let sent = channel.sent();
    let subjects_for = |to: &str| {
        let mut subjects: Vec<String> = sent
            .iter()
            .filter(|m| m.to == to)
            .map(|m| m.subject.clone())
            .collect();
        subjects.sort();
        subjects
    };
    assert_eq!(
        subjects_for("buyer@acme.io"),
        vec!["RFP APPROVED", "RFP Published", "RFP Response Submitted"]
    );
    assert_eq!(subjects_for("sales@desks.io"), vec!["RFP APPROVED"]);

    let activity = store.list_activity(rfp.id).await.unwrap();
    let status_changes: Vec<_> = activity
        .iter()
        .filter(|a| a.action == "status_changed")
        .filter_map(|a| a.details.clone())
        .collect();
    assert_eq!(
        status_changes,
        vec![
            "DRAFT -> PUBLISHED",
            "PUBLISHED -> RESPONSE_SUBMITTED",
            "RESPONSE_SUBMITTED -> UNDER_REVIEW",
            "UNDER_REVIEW -> APPROVED",
        ]
    );
}

#[tokio::test]
async fn another_buyer_cannot_touch_the_rfp() {
    let store = Arc::new(MemoryStore::new());
    let engine = WorkflowEngine::new(store.clone(), Arc::new(RecordingDispatcher::default()));
    let owner = user(store.as_ref(), "owner@acme.io", Role::Buyer).await;
    let other = user(store.as_ref(), "other@acme.io", Role::Buyer).await;

    let rfp = engine.create(&owner, create_request("Chairs")).await.unwrap();
    for target in RfpStatus::ALL {
        assert!(matches!(
            engine.request_transition(rfp.id, &other, target).await,
            Err(WorkflowError::Forbidden(_))
        ));
    }
    assert!(matches!(
        engine
            .update_content(
                rfp.id,
                &other,
                UpdateRfpRequest {
                    title: Some("Mine now".to_string()),
                    ..Default::default()
                },
            )
            .await,
        Err(WorkflowError::Forbidden(_))
    ));
    let stored = store.get_rfp(rfp.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RfpStatus::Draft);
    assert_eq!(stored.title, "Chairs");
}

#[tokio::test]
async fn committed_transition_is_notified_even_if_rfp_is_deleted() {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(CapturingChannel::new());
    let runner = Arc::new(JobRunner::new(store.clone(), channel.clone(), fast_policy(3)));
    let engine = WorkflowEngine::new(store.clone(), Arc::new(InlineDispatcher::new(runner)));
    let buyer = user(store.as_ref(), "buyer@acme.io", Role::Buyer).await;

    let rfp = engine.create(&buyer, create_request("Lamps")).await.unwrap();
    engine
        .request_transition(rfp.id, &buyer, RfpStatus::Published)
        .await
        .unwrap();
    engine.delete(rfp.id, &buyer).await.unwrap();

    assert!(eventually(|| channel.sent().len() == 1).await);
    let sent = &channel.sent()[0];
    assert_eq!(sent.to, "buyer@acme.io");
    assert_eq!(sent.subject, "RFP Published");
    assert!(sent.html_body.contains("Lamps"));
}

#[tokio::test]
async fn indexing_twice_leaves_projection_identical() {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(CapturingChannel::new());
    let runner = JobRunner::new(store.clone(), channel, fast_policy(1));
    let engine = WorkflowEngine::new(store.clone(), Arc::new(RecordingDispatcher::default()));
    let buyer = user(store.as_ref(), "buyer@acme.io", Role::Buyer).await;

    let rfp = engine.create(&buyer, create_request("Standing desks")).await.unwrap();
    let job = Job::IndexRfp { rfp_id: rfp.id };

    runner.run(&job).await.unwrap();
    let first = store.search_projection(rfp.id).await.unwrap().unwrap();
    runner.run(&job).await.unwrap();
    let second = store.search_projection(rfp.id).await.unwrap().unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());

    // Indexing a deleted RFP is a no-op
    engine.delete(rfp.id, &buyer).await.unwrap();
    runner.run(&job).await.unwrap();
    assert!(store.search_projection(rfp.id).await.unwrap().is_none());
}

#[tokio::test]
async fn search_sees_content_after_reindex() {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(CapturingChannel::new());
    let runner = Arc::new(JobRunner::new(store.clone(), channel, fast_policy(3)));
    let engine = WorkflowEngine::new(store.clone(), Arc::new(InlineDispatcher::new(runner)));
    let buyer = user(store.as_ref(), "buyer@acme.io", Role::Buyer).await;

    let rfp = engine.create(&buyer, create_request("Desks")).await.unwrap();
    engine
        .update_content(
            rfp.id,
            &buyer,
            UpdateRfpRequest {
                requirements: Some("Bamboo tops only".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut found = false;
    for _ in 0..200 {
        let (hits, _) = engine.search(&buyer, "bamboo", 10, 0).await.unwrap();
        if hits.iter().any(|r| r.id == rfp.id) {
            found = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(found);
}

#[tokio::test]
async fn document_versions_grow_monotonically() {
    let store = Arc::new(MemoryStore::new());
    let root = std::env::temp_dir().join(format!("rfp-docs-{}", Uuid::new_v4()));
    let documents = DocumentService::new(store.clone(), Arc::new(LocalDocumentStore::new(&root, 900)));
    let engine = WorkflowEngine::new(store.clone(), Arc::new(RecordingDispatcher::default()));
    let buyer = user(store.as_ref(), "buyer@acme.io", Role::Buyer).await;
    let rfp = engine.create(&buyer, create_request("Desks")).await.unwrap();

    let completed = documents
        .complete_upload(
            &buyer,
            CompleteUploadRequest {
                rfp_id: rfp.id,
                key: "rfp/desks/scope-v1.pdf".to_string(),
                filename: "scope.pdf".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.version_number, 1);

    for n in 2..=3 {
        let version = documents
            .upload_new_version(
                completed.document_id,
                &buyer,
                NewVersionRequest {
                    key: format!("rfp/desks/scope-v{}.pdf", n),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(version.version_number, n);
    }

    let reverted = documents.revert(completed.document_id, 1, &buyer).await.unwrap();
    assert_eq!(reverted.version_number, 4);
    assert_eq!(reverted.storage_key, "rfp/desks/scope-v1.pdf");
    assert_eq!(reverted.notes.as_deref(), Some("Reverted to 1"));

    let versions = documents
        .list_versions(completed.document_id, &buyer)
        .await
        .unwrap();
    let numbers: Vec<i32> = versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![4, 3, 2, 1]);
    assert_eq!(versions[3].storage_key, "rfp/desks/scope-v1.pdf");

    let _ = std::fs::remove_dir_all(root);
}
