use crate::InMemoryStateStoreProvider;
use serde_json::json;
use signoff_core::{
    ApproverRule, ApproverScope, DefinitionRepository, EngineError, NoopEventHandler,
    OrgDirectoryRepository, OrgUnit, OrgUnitId, OrgUnitKind, Payload, PersonId, RequestAction,
    RequestRepository, RequestStatus, RoleAssignment, StepDefinition, TimelineAction,
    TimelineEntry, TimelineRepository, WorkflowDefId, WorkflowDefinition,
};
use std::sync::Arc;

fn unit(id: &str, kind: OrgUnitKind, parent: Option<&str>) -> OrgUnit {
    OrgUnit::new(
        OrgUnitId(id.to_string()),
        kind,
        parent.map(|p| OrgUnitId(p.to_string())),
        id,
    )
}

async fn seed_directory(provider: &InMemoryStateStoreProvider) {
    let (_, _, _, directory, _) = provider.create_repositories();

    for u in [
        unit("acme", OrgUnitKind::Organization, None),
        unit("corporate", OrgUnitKind::Directorate, Some("acme")),
        unit("technology", OrgUnitKind::Department, Some("corporate")),
        unit("it-ops", OrgUnitKind::Division, Some("technology")),
    ] {
        directory.save_unit(&u).await.unwrap();
    }

    directory
        .assign_role(&RoleAssignment::new("p-manager", "DirectManager", "it-ops"))
        .await
        .unwrap();
    directory
        .assign_role(&RoleAssignment::new("p-hr", "HR", "technology"))
        .await
        .unwrap();
}

fn leave_definition() -> WorkflowDefinition {
    WorkflowDefinition::new(
        "leave_request",
        "Leave Request",
        vec![
            StepDefinition::new(
                0,
                ApproverRule::new("DirectManager", ApproverScope::RequesterUnit),
            ),
            StepDefinition::new(
                1,
                ApproverRule::new(
                    "HR",
                    ApproverScope::RequesterAncestor(OrgUnitKind::Department),
                ),
            ),
        ],
    )
}

#[tokio::test]
async fn test_engine_runs_against_provider_repositories() {
    let provider = InMemoryStateStoreProvider::new();
    seed_directory(&provider).await;

    let engine = signoff_core::ApprovalEngine::with_repositories(
        provider.create_repositories(),
        Arc::new(NoopEventHandler),
    );

    engine.create_definition(leave_definition()).await.unwrap();

    let request_id = engine
        .submit(
            PersonId("p-emp".to_string()),
            &WorkflowDefId("leave_request".to_string()),
            OrgUnitId("it-ops".to_string()),
            Payload::new(json!({"days": 2})),
        )
        .await
        .unwrap();

    let (status, step) = engine
        .act(
            &request_id,
            &PersonId("p-manager".to_string()),
            RequestAction::Approve,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(status, RequestStatus::Pending);
    assert_eq!(step, 1);

    let (status, _) = engine
        .act(
            &request_id,
            &PersonId("p-hr".to_string()),
            RequestAction::Approve,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(status, RequestStatus::Approved);

    // Replay from the shared timeline store matches the projection
    let replayed = engine.replay(&request_id).await.unwrap();
    assert_eq!(replayed, (RequestStatus::Approved, 1));
}

#[tokio::test]
async fn test_request_update_is_version_guarded() {
    let provider = InMemoryStateStoreProvider::new();
    seed_directory(&provider).await;
    let (requests, definitions, ..) = provider.create_repositories();

    definitions.save(&leave_definition()).await.unwrap();

    let mut instance = signoff_core::RequestInstance::new_draft(
        &leave_definition(),
        PersonId("p-emp".to_string()),
        OrgUnitId("it-ops".to_string()),
        Payload::null(),
    )
    .unwrap();
    instance.submit().unwrap();
    requests.insert(&instance).await.unwrap();

    // A stale writer holds the pre-mutation copy
    let stale = instance.clone();
    let stale_version = stale.version;

    let mut winner = instance.clone();
    winner.approve(&PersonId("p-manager".to_string())).unwrap();
    requests.update(&winner, stale_version).await.unwrap();

    // The stale writer loses with ConcurrentModification
    let mut loser = stale.clone();
    loser.approve(&PersonId("p-manager".to_string())).unwrap();
    let result = requests.update(&loser, stale_version).await;

    assert!(matches!(
        result,
        Err(EngineError::ConcurrentModification { .. })
    ));

    // Exactly one advance is visible
    let stored = requests.find_by_id(&instance.id).await.unwrap().unwrap();
    assert_eq!(stored.current_step, 1);
}

#[tokio::test]
async fn test_timeline_sequences_are_per_request_and_gap_free() {
    let provider = InMemoryStateStoreProvider::new();
    let (_, _, timeline, _, _) = provider.create_repositories();

    let req_a = signoff_core::RequestId("req-a".to_string());
    let req_b = signoff_core::RequestId("req-b".to_string());
    let actor = PersonId("p-1".to_string());

    for (request, action) in [
        (&req_a, TimelineAction::Submit),
        (&req_b, TimelineAction::Submit),
        (&req_a, TimelineAction::Approve),
        (&req_a, TimelineAction::Reject),
        (&req_b, TimelineAction::Cancel),
    ] {
        timeline
            .append(TimelineEntry::new(
                request.clone(),
                actor.clone(),
                action,
                0,
                None,
                None,
            ))
            .await
            .unwrap();
    }

    let log_a = timeline.list_for_request(&req_a).await.unwrap();
    let log_b = timeline.list_for_request(&req_b).await.unwrap();

    assert_eq!(
        log_a.iter().map(|e| e.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        log_b.iter().map(|e| e.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn test_directory_rejects_bad_attachment() {
    let provider = InMemoryStateStoreProvider::new();
    let (_, _, _, directory, _) = provider.create_repositories();

    directory
        .save_unit(&unit("acme", OrgUnitKind::Organization, None))
        .await
        .unwrap();

    // A department cannot attach directly to an organization
    let result = directory
        .save_unit(&unit("hr", OrgUnitKind::Department, Some("acme")))
        .await;
    assert!(matches!(result, Err(EngineError::ScopeResolution(_))));

    // A parent that does not exist is refused outright
    let result = directory
        .save_unit(&unit("finance", OrgUnitKind::Directorate, Some("ghost")))
        .await;
    assert!(matches!(result, Err(EngineError::OrgUnitNotFound(_))));
}

#[tokio::test]
async fn test_role_assignments_shared_between_repository_handles() {
    let provider = InMemoryStateStoreProvider::new();
    seed_directory(&provider).await;

    // A second handle over the same provider sees the seeded assignments
    let (_, _, _, directory, _) = provider.create_repositories();
    let holders = directory
        .role_holders(
            &signoff_core::RoleName("DirectManager".to_string()),
            &OrgUnitId("it-ops".to_string()),
        )
        .await
        .unwrap();

    assert!(holders.contains(&PersonId("p-manager".to_string())));
}
