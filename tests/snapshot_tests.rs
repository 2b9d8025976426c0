use kart_steward::config::StewardConfig;
use kart_steward::ledger::{HistoryAction, InfringementInput, SessionSnapshot};
use kart_steward::session::SessionStatus;
use kart_steward::{Steward, StewardError};
use tempfile::TempDir;

async fn seeded(dir: &TempDir) -> Steward {
    let mut config = StewardConfig::with_data_dir(dir.path());
    config.export.dir = Some(dir.path().join("exports"));
    let steward = Steward::open(config).await.unwrap();

    steward.start_session("Saturday Heat").await.unwrap();
    for _ in 0..3 {
        steward
            .record(
                InfringementInput::new(11, "White line infringement")
                    .with_turn("2")
                    .with_observer("Marshal 5"),
            )
            .await
            .unwrap();
    }
    let pending = steward.list_pending().await.unwrap();
    steward.apply_penalty(pending[0].id, "Clerk").await.unwrap();
    steward
        .record(InfringementInput::new(27, "Contact").with_penalty("Drive through"))
        .await
        .unwrap();
    steward
}

#[tokio::test]
async fn test_export_reads_without_switching() {
    let dir = TempDir::new().unwrap();
    let steward = seeded(&dir).await;
    steward.start_session("Sunday Heat").await.unwrap();

    let snapshot = steward.export_session("Saturday Heat").await.unwrap();

    assert_eq!(
        steward.router().current_session().as_deref(),
        Some("Sunday Heat")
    );
    assert_eq!(snapshot.session_info.name, "Saturday Heat");
    assert_eq!(snapshot.session_info.status, Some(SessionStatus::Closed));
    assert_eq!(snapshot.infringements.len(), 4);
    let ids: Vec<i64> = snapshot.infringements.iter().map(|i| i.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
    assert_eq!(snapshot.infringements[2].history.len(), 2);
}

#[tokio::test]
async fn test_export_unknown_session() {
    let dir = TempDir::new().unwrap();
    let steward = seeded(&dir).await;

    let err = steward.export_session("Nope").await.unwrap_err();
    assert!(matches!(err, StewardError::NotFound(_)));
}

#[tokio::test]
async fn test_import_under_new_name_reproduces_session() {
    let dir = TempDir::new().unwrap();
    let steward = seeded(&dir).await;
    let original = steward.list_all().await.unwrap();
    let original_history = steward.history_for_kart(11).await.unwrap();
    let snapshot = steward.export_session("Saturday Heat").await.unwrap();

    let summary = steward
        .import_session(snapshot.clone(), Some("Saturday Replay"))
        .await
        .unwrap();

    assert_eq!(summary.session.name, "Saturday Replay");
    assert_eq!(summary.infringements, 4);
    assert_eq!(summary.history, 5);
    assert_eq!(
        Some(summary.session.started_at),
        snapshot.session_info.started_at
    );
    assert_eq!(
        steward.router().current_session().as_deref(),
        Some("Saturday Replay")
    );

    let imported = steward.list_all().await.unwrap();
    assert_eq!(imported.len(), original.len());
    for (copy, source) in imported.iter().zip(&original) {
        assert_eq!(copy.kart_number, source.kart_number);
        assert_eq!(copy.description, source.description);
        assert_eq!(copy.turn_number, source.turn_number);
        assert_eq!(copy.observer, source.observer);
        assert_eq!(copy.warning_count, source.warning_count);
        assert_eq!(copy.penalty_due, source.penalty_due);
        assert_eq!(copy.penalty_description, source.penalty_description);
        assert_eq!(copy.penalty_taken_at, source.penalty_taken_at);
        assert_eq!(copy.created_at, source.created_at);
    }

    let history = steward.history_for_kart(11).await.unwrap();
    let actions: Vec<HistoryAction> = history.iter().map(|h| h.action).collect();
    let original_actions: Vec<HistoryAction> =
        original_history.iter().map(|h| h.action).collect();
    assert_eq!(actions, original_actions);

    let sessions = steward.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions.iter().filter(|s| s.is_active()).count(), 1);
}

#[tokio::test]
async fn test_import_existing_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let steward = seeded(&dir).await;
    let snapshot = steward.export_session("Saturday Heat").await.unwrap();

    let err = steward.import_session(snapshot, None).await.unwrap_err();
    assert!(matches!(err, StewardError::AlreadyExists(_)));
    assert_eq!(steward.list_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_file_round_trip_into_fresh_store() {
    let source_dir = TempDir::new().unwrap();
    let source = seeded(&source_dir).await;
    let path = source
        .export_session_to_file("Saturday Heat")
        .await
        .unwrap();

    let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(file_name.starts_with("Saturday_Heat_"));
    assert!(file_name.ends_with(".json"));
    assert!(path.starts_with(source_dir.path().join("exports")));

    let target_dir = TempDir::new().unwrap();
    let target = Steward::open(StewardConfig::with_data_dir(target_dir.path()))
        .await
        .unwrap();
    let summary = target.import_session_file(&path, None).await.unwrap();

    assert_eq!(summary.session.name, "Saturday Heat");
    assert_eq!(target.list_all().await.unwrap().len(), 4);
    assert_eq!(target.list_pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_imported_session_keeps_counting() {
    let dir = TempDir::new().unwrap();
    let steward = seeded(&dir).await;
    let snapshot = steward.export_session("Saturday Heat").await.unwrap();
    steward
        .import_session(snapshot, Some("Continued"))
        .await
        .unwrap();

    // The served penalty in the copy still closes the cycle.
    let next = steward
        .record(InfringementInput::new(11, "White line infringement"))
        .await
        .unwrap();
    assert_eq!(next.warning_count, 1);
}

#[tokio::test]
async fn test_minimal_snapshot_imports() {
    let dir = TempDir::new().unwrap();
    let steward = Steward::open(StewardConfig::with_data_dir(dir.path()))
        .await
        .unwrap();

    let snapshot: SessionSnapshot = serde_json::from_str(
        r#"{
            "session_info": {"name": "Legacy Club"},
            "infringements": [
                {"id": 7, "kart_number": 3, "description": "Contact",
                 "created_at": "2026-03-01T10:00:00Z"},
                {"id": 2, "kart_number": 3, "description": "Blocking",
                 "created_at": "2026-03-01T09:00:00Z",
                 "history": [{"action": "created", "performed_by": "Clerk",
                              "timestamp": "2026-03-01T09:00:00Z"}]}
            ],
            "exported_at": "2026-03-01T12:00:00Z"
        }"#,
    )
    .unwrap();

    let summary = steward.import_session(snapshot, None).await.unwrap();
    assert_eq!(summary.infringements, 2);
    assert_eq!(summary.history, 1);

    let all = steward.list_all().await.unwrap();
    assert_eq!(all[0].description, "Contact");
    assert_eq!(all[1].description, "Blocking");
    assert!(all[1].id < all[0].id);
}

#[tokio::test]
async fn test_import_invalid_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let steward = seeded(&dir).await;
    let snapshot = steward.export_session("Saturday Heat").await.unwrap();

    let err = steward
        .import_session(snapshot, Some("bad/name"))
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::Validation(_)));
}
