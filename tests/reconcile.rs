mod common;

use common::TestWorkspace;
use crm_sync::{
    authz::{Viewer, can_edit, editable_rows},
    backend::{ResourceKind, Role, SheetKind, load_rows, memory::MemoryBackend},
    error::{SyncError, ValidationError},
    events::{EventBus, SyncEvent},
    reconcile::{ImportRequest, Reconciler},
    row::OwnerRefs,
    sheet::SheetOptions,
};

fn pipeline_request() -> ImportRequest {
    ImportRequest {
        owner_id: Some("boss@x.com".to_string()),
        ..ImportRequest::for_resource(ResourceKind::Pipeline)
    }
}

#[test]
fn pipeline_upload_dedups_derives_and_respects_ownership() {
    let workspace = TestWorkspace::new();
    let path = workspace.pipeline_csv("pipeline.csv");
    let backend = MemoryBackend::new();
    let bus = EventBus::new();
    let events = bus.subscribe();
    let reconciler = Reconciler::new(&backend, &bus);

    let first = reconciler
        .import_file(&path, &SheetOptions::default(), &pipeline_request())
        .expect("first import");
    assert_eq!(first.added, 2);
    assert_eq!(first.message(), "Success 2 rows added");
    assert_eq!(first.derived_contacts, Some(1));
    let received = events.try_iter().collect::<Vec<_>>();
    assert!(received.contains(&SyncEvent::Imported {
        resource: ResourceKind::Pipeline,
        added: 2
    }));
    assert!(received.contains(&SyncEvent::StoreUpdated {
        resource: ResourceKind::Contacts
    }));

    let second = reconciler
        .import_file(&path, &SheetOptions::default(), &pipeline_request())
        .expect("second import");
    assert_eq!(second.added, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(backend.items(SheetKind::Pipeline).len(), 2);

    let contacts = backend.contacts();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].contact, "Jane Roe");

    let stored = backend.items(SheetKind::Pipeline);
    assert_eq!(stored[0].data["Size, RUB mn"], "1,500");

    let mut rows = load_rows(&backend, ResourceKind::Pipeline).expect("rows");
    let viewer = Viewer::new("u_1", "a@x.com", Role::Employee);
    assert!(rows.iter().all(|row| !can_edit(Some(&viewer), row)));

    rows[1].owner = OwnerRefs::single("a@x.com");
    let editable = editable_rows(Some(&viewer), &rows);
    assert_eq!(editable.len(), 1);
    assert_eq!(editable[0].get("Company"), Some("Globex"));
}

#[test]
fn blank_rows_never_count_as_added() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "companies.csv",
        "Company,Sector,Contacted person,Methods to reach out,Status,Comments\n\
         Acme,Retail,Ann,email,New,\n\
         ,,,,,\n\
         \" \",,,,,\n",
    );
    let backend = MemoryBackend::new();
    let bus = EventBus::new();
    let outcome = Reconciler::new(&backend, &bus)
        .import_file(
            &path,
            &SheetOptions::default(),
            &ImportRequest::for_resource(ResourceKind::Companies),
        )
        .expect("import");
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.dropped_empty, 2);
    assert_eq!(backend.items(SheetKind::Companies).len(), 1);
}

#[test]
fn wrong_headers_are_rejected_before_any_call() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("prices.csv", "Name,Price\nWidget,3\n");
    let backend = MemoryBackend::new();
    let bus = EventBus::new();
    let events = bus.subscribe();
    let err = Reconciler::new(&backend, &bus)
        .import_file(
            &path,
            &SheetOptions::default(),
            &ImportRequest::for_resource(ResourceKind::Pipeline),
        )
        .unwrap_err();
    match err {
        SyncError::Validation(ValidationError::SchemaMismatch { resource, missing }) => {
            assert_eq!(resource, ResourceKind::Pipeline);
            assert!(missing.contains(&"Company".to_string()));
            assert!(missing.contains(&"Date".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.calls(), 0);
    assert!(matches!(
        events.try_recv().expect("failure event"),
        SyncEvent::ImportFailed {
            resource: Some(ResourceKind::Pipeline),
            ..
        }
    ));
}

#[test]
fn derived_contacts_are_unique_and_owned() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "pipeline.csv",
        &format!(
            "{}\nB Corp,2024-01-01,,,,,Bob,,,,,\nA Corp,2024-01-02,,,,,\"Alice, Bob\",,,,,\n",
            common::PIPELINE_HEADER
        ),
    );
    let backend = MemoryBackend::new();
    let bus = EventBus::new();
    let request = ImportRequest {
        owner_id: Some("u_9".to_string()),
        ..ImportRequest::for_resource(ResourceKind::Pipeline)
    };
    Reconciler::new(&backend, &bus)
        .import_file(&path, &SheetOptions::default(), &request)
        .expect("import");

    let mut contacts = backend
        .contacts()
        .into_iter()
        .map(|c| (c.contact, c.owner_id))
        .collect::<Vec<_>>();
    contacts.sort();
    assert_eq!(
        contacts,
        [
            ("Alice".to_string(), Some("u_9".to_string())),
            ("Bob".to_string(), Some("u_9".to_string())),
        ]
    );
}

#[test]
fn headers_without_a_resource_pick_the_matching_collection() {
    let workspace = TestWorkspace::new();
    let path = workspace.pipeline_csv("upload.csv");
    let backend = MemoryBackend::new();
    let bus = EventBus::new();
    let outcome = Reconciler::new(&backend, &bus)
        .import_file(&path, &SheetOptions::default(), &ImportRequest::default())
        .expect("import");
    assert_eq!(outcome.resource, ResourceKind::Pipeline);
    assert_eq!(outcome.added, 2);
}
