use super::*;
use crate::record::{CardDetails, Payload};
use crate::sync::{MemoryRemote, SyncEvent};
use std::time::Duration;

fn service() -> (Arc<RecordService>, Arc<MemoryRemote>) {
    let remote = Arc::new(MemoryRemote::default());
    let store = Arc::new(ReplicaStore::new());
    let engine = Arc::new(SyncEngine::new(
        store,
        remote.clone(),
        Duration::from_millis(500),
    ));
    (Arc::new(RecordService::new(engine)), remote)
}

fn text(title: &str, body: &str) -> Record {
    Record::new_local(title, Payload::Text(body.to_string())).unwrap()
}

#[test]
fn test_create_marks_record_new() {
    let (service, _) = service();
    let mut record = text("Mail", "hunter2");
    record.is_new = false;
    record.is_synced = true;
    record.id = Some(Uuid::new_v4());

    let created = service.create(record).unwrap();

    assert!(created.is_new);
    assert!(!created.is_synced);
    assert_eq!(service.read(&[]).unwrap().len(), 1);
}

#[test]
fn test_create_rejects_invalid_record() {
    let (service, _) = service();

    let err = service.create(text("", "x")).unwrap_err();

    assert!(matches!(err, KeeperError::Validation(_)));
    assert!(service.read(&[]).unwrap().is_empty());
}

#[test]
fn test_update_flips_synced_flag() {
    let (service, _) = service();
    let mut created = service.create(text("Mail", "a")).unwrap();
    created.is_new = false;
    created.is_synced = true;

    created.set_data(&Payload::Text("b".to_string())).unwrap();
    let updated = service.update(created.clone()).unwrap();

    assert!(!updated.is_synced);
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(
        service.read_one(created.id.unwrap()).unwrap().data().unwrap(),
        Payload::Text("b".to_string())
    );
}

#[test]
fn test_update_rejects_bad_card() {
    let (service, _) = service();
    let card = CardDetails {
        number: "4111111111111111".to_string(),
        exp_month: "12".to_string(),
        exp_year: "30".to_string(),
        cvc: "321".to_string(),
    };
    let mut created = service
        .create(Record::new_local("Visa", Payload::Card(card.clone())).unwrap())
        .unwrap();

    created
        .set_data(&Payload::Card(CardDetails {
            number: String::new(),
            ..card
        }))
        .unwrap();

    assert!(service.update(created).is_err());
}

#[test]
fn test_read_one_missing_is_not_found() {
    let (service, _) = service();
    let err = service.read_one(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, KeeperError::NotFound(_)));
}

#[tokio::test]
async fn test_create_then_push_is_synced() {
    let (service, remote) = service();
    let cancel = CancellationToken::new();
    let ids: Vec<Uuid> = ["a", "b", "c"]
        .into_iter()
        .map(|t| service.create(text(t, "x")).unwrap().id.unwrap())
        .collect();

    service.sync_to_remote(&cancel).await.unwrap();

    for id in ids {
        let record = service.read_one(id).unwrap();
        assert!(!record.is_new);
        assert!(record.is_synced);
    }
    assert_eq!(remote.len().unwrap(), 3);
}

#[tokio::test]
async fn test_delete_removes_local_and_remote() {
    let (service, remote) = service();
    let cancel = CancellationToken::new();
    let pushed = service.create(text("pushed", "x")).unwrap();
    service.sync_to_remote(&cancel).await.unwrap();
    let local_only = service.create(text("local", "y")).unwrap();

    service
        .delete(&[pushed.id.unwrap(), local_only.id.unwrap()], &cancel)
        .await
        .unwrap();

    assert!(service.read(&[]).unwrap().is_empty());
    assert!(remote.is_empty().unwrap());
}

#[tokio::test]
async fn test_delete_of_local_only_record_skips_remote() {
    let (service, remote) = service();
    let cancel = CancellationToken::new();
    remote.set_authenticated(false);
    let local_only = service.create(text("local", "y")).unwrap();

    service
        .delete(&[local_only.id.unwrap()], &cancel)
        .await
        .unwrap();

    assert!(service.read(&[]).unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_keeps_local_removal_when_remote_fails() {
    let (service, remote) = service();
    let cancel = CancellationToken::new();
    let pushed = service.create(text("pushed", "x")).unwrap();
    service.sync_to_remote(&cancel).await.unwrap();
    remote.set_authenticated(false);

    let err = service
        .delete(&[pushed.id.unwrap()], &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, KeeperError::Auth(_)));
    assert!(service.read(&[]).unwrap().is_empty());
    assert_eq!(remote.len().unwrap(), 1);
}

#[tokio::test]
async fn test_delete_with_no_ids_is_noop() {
    let (service, _) = service();
    service.create(text("keep", "x")).unwrap();
    service.delete(&[], &CancellationToken::new()).await.unwrap();
    assert_eq!(service.read(&[]).unwrap().len(), 1);
}

#[tokio::test]
async fn test_handle_round_trips_commands() {
    let (service, remote) = service();
    let cancel = CancellationToken::new();
    remote.external_write(text("Test", "from remote")).unwrap();
    let (dispatcher, handle) = CommandDispatcher::new(service, cancel.clone(), 8);
    let task = tokio::spawn(dispatcher.run());
    let mut events = handle.subscribe();

    let hydrated = handle.initialize().await.unwrap();
    assert_eq!(hydrated.len(), 1);
    assert_eq!(events.recv().await.unwrap(), SyncEvent::Hydrated { count: 1 });

    let created = handle.create(text("Local", "x")).await.unwrap();
    assert_eq!(handle.read(Vec::new()).await.unwrap().len(), 2);

    let pushed = handle.sync_to_remote().await.unwrap();
    assert_eq!(pushed.len(), 1);
    assert_eq!(events.recv().await.unwrap(), SyncEvent::Pushed { count: 1 });

    let stored = handle.read_one(created.id.unwrap()).await.unwrap();
    assert!(stored.is_synced);

    assert_eq!(handle.sync_from_remote().await.unwrap(), 2);

    handle.delete(vec![created.id.unwrap()]).await.unwrap();
    assert!(matches!(
        handle.read_one(created.id.unwrap()).await,
        Err(KeeperError::NotFound(_))
    ));

    cancel.cancel();
    task.await.unwrap();
    assert!(matches!(
        handle.read(Vec::new()).await,
        Err(KeeperError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_dispatcher_stops_when_handles_drop() {
    let (service, _) = service();
    let (dispatcher, handle) = CommandDispatcher::new(service, CancellationToken::new(), 1);
    let task = tokio::spawn(dispatcher.run());

    drop(handle);

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}
