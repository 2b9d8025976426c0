use kart_steward::config::StewardConfig;
use kart_steward::ledger::{HistoryAction, InfringementInput};
use kart_steward::{Steward, StewardError};
use tempfile::TempDir;

const LINE: &str = "White line infringement";

async fn open_with_session(dir: &TempDir) -> Steward {
    let steward = Steward::open(StewardConfig::with_data_dir(dir.path()))
        .await
        .unwrap();
    steward.start_session("Test Session").await.unwrap();
    steward
}

fn line(kart: i64) -> InfringementInput {
    InfringementInput::new(kart, LINE)
        .with_turn("4")
        .with_observer("Marshal 2")
        .performed_by("Race Control")
}

#[tokio::test]
async fn test_third_line_warning_becomes_penalty() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;

    let first = steward.record(line(12)).await.unwrap();
    let second = steward.record(line(12)).await.unwrap();
    let third = steward.record(line(12)).await.unwrap();

    assert_eq!(first.warning_count, 1);
    assert!(!first.penalty_due);
    assert_eq!(first.penalty_description.as_deref(), Some("Warning"));

    assert_eq!(second.warning_count, 2);
    assert!(!second.penalty_due);

    assert_eq!(third.warning_count, 3);
    assert!(third.penalty_due);
    assert_eq!(third.penalty_description.as_deref(), Some("5 sec Stop & Go"));
}

#[tokio::test]
async fn test_karts_are_counted_separately() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;

    steward.record(line(1)).await.unwrap();
    steward.record(line(1)).await.unwrap();
    let other = steward.record(line(2)).await.unwrap();

    assert_eq!(other.warning_count, 1);
}

#[tokio::test]
async fn test_pending_penalty_closes_cycle() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    for _ in 0..3 {
        steward.record(line(5)).await.unwrap();
    }

    // Still pending, but the cycle is over.
    let fourth = steward.record(line(5)).await.unwrap();
    assert_eq!(fourth.warning_count, 1);
    assert!(!fourth.penalty_due);
}

#[tokio::test]
async fn test_apply_penalty_resets_line_warnings() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    steward.record(line(8)).await.unwrap();
    steward.record(line(8)).await.unwrap();
    let third = steward.record(line(8)).await.unwrap();

    let served = steward.apply_penalty(third.id, "Race Control").await.unwrap();
    assert!(!served.penalty_due);
    assert!(served.penalty_taken_at.is_some());
    assert_eq!(served.warning_count, 0);
    assert_eq!(served.penalty_description.as_deref(), Some("5 sec Stop & Go"));

    let fourth = steward.record(line(8)).await.unwrap();
    assert_eq!(fourth.warning_count, 1);

    let err = steward.apply_penalty(third.id, "Race Control").await.unwrap_err();
    assert!(matches!(err, StewardError::InvalidState(_)));
}

#[tokio::test]
async fn test_marshal_decision_overrides_count() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;

    let drive_through = steward
        .record(line(3).with_penalty("Drive through"))
        .await
        .unwrap();
    assert_eq!(drive_through.warning_count, 1);
    assert!(drive_through.penalty_due);
    assert_eq!(
        drive_through.penalty_description.as_deref(),
        Some("Drive through")
    );

    let nfa = steward
        .record(line(3).with_penalty("No further action"))
        .await
        .unwrap();
    assert!(!nfa.penalty_due);

    // "Warning" defers to the count; the override above reset it.
    let warned = steward.record(line(3).with_penalty("Warning")).await.unwrap();
    assert_eq!(warned.warning_count, 2);
    assert!(!warned.penalty_due);
}

#[tokio::test]
async fn test_other_infringements() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;

    let plain = steward
        .record(InfringementInput::new(9, "Blocking"))
        .await
        .unwrap();
    assert_eq!(plain.warning_count, 1);
    assert!(!plain.penalty_due);
    assert!(plain.penalty_description.is_none());

    let penalised = steward
        .record(InfringementInput::new(9, "Contact").with_penalty("Drive through"))
        .await
        .unwrap();
    assert!(penalised.penalty_due);

    let warned = steward
        .record(InfringementInput::new(9, "Contact").with_penalty("warning"))
        .await
        .unwrap();
    assert!(!warned.penalty_due);
    assert_eq!(warned.warning_count, 1);

    // Other categories do not feed the line count.
    let first_line = steward.record(line(9)).await.unwrap();
    assert_eq!(first_line.warning_count, 1);
}

#[tokio::test]
async fn test_amend_unchanged_input_keeps_decision() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    steward.record(line(14)).await.unwrap();
    let second = steward.record(line(14)).await.unwrap();
    steward.record(line(14)).await.unwrap();

    let amended = steward.amend(second.id, line(14)).await.unwrap();

    assert_eq!(amended.warning_count, 2);
    assert!(!amended.penalty_due);
    assert_eq!(amended.created_at, second.created_at);
}

#[tokio::test]
async fn test_amend_reclassifies() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    let recorded = steward.record(line(15)).await.unwrap();

    let amended = steward
        .amend(
            recorded.id,
            InfringementInput::new(15, "Contact")
                .with_turn("7")
                .with_penalty("Drive through")
                .performed_by("Clerk"),
        )
        .await
        .unwrap();

    assert_eq!(amended.description, "Contact");
    assert_eq!(amended.turn_number.as_deref(), Some("7"));
    assert!(amended.penalty_due);
    assert_eq!(amended.penalty_description.as_deref(), Some("Drive through"));

    let history = steward.history_for_kart(15).await.unwrap();
    assert_eq!(history[0].action, HistoryAction::Updated);
    assert_eq!(history[0].performed_by, "Clerk");
}

#[tokio::test]
async fn test_amend_keeps_served_penalty() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    let recorded = steward
        .record(line(16).with_penalty("Drive through"))
        .await
        .unwrap();
    steward.apply_penalty(recorded.id, "Race Control").await.unwrap();

    let amended = steward
        .amend(recorded.id, line(16).with_penalty("Drive through"))
        .await
        .unwrap();

    assert!(!amended.penalty_due);
    assert!(amended.penalty_taken_at.is_some());
    assert_eq!(amended.warning_count, 0);
}

#[tokio::test]
async fn test_amend_missing_is_not_found() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;

    let err = steward.amend(404, line(1)).await.unwrap_err();
    assert!(matches!(err, StewardError::NotFound(_)));
}

#[tokio::test]
async fn test_record_validates_input() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;

    let err = steward
        .record(InfringementInput::new(3, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::Validation(_)));
    assert!(steward.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_deletes_record_and_history() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    let kept = steward.record(line(20)).await.unwrap();
    let doomed = steward.record(line(20)).await.unwrap();

    let removed = steward.remove(doomed.id, "Race Control").await.unwrap();
    assert_eq!(removed.id, doomed.id);

    let err = steward.get(doomed.id).await.unwrap_err();
    assert!(matches!(err, StewardError::NotFound(_)));

    let history = steward.history_for_kart(20).await.unwrap();
    assert!(history.iter().all(|h| h.infringement_id == kept.id));

    let err = steward.remove(doomed.id, "Race Control").await.unwrap_err();
    assert!(matches!(err, StewardError::NotFound(_)));
}

#[tokio::test]
async fn test_apply_all_pending() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    let a = steward
        .record(line(30).with_penalty("Drive through"))
        .await
        .unwrap();
    let b = steward
        .record(InfringementInput::new(30, "Contact").with_penalty("Stop and go"))
        .await
        .unwrap();
    steward.record(line(31).with_penalty("Drive through")).await.unwrap();

    let outcome = steward.apply_all_pending(30, "Race Control").await.unwrap();
    assert_eq!(outcome.kart_number, 30);
    let ids: Vec<i64> = outcome.applied.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);
    assert!(
        outcome
            .applied
            .iter()
            .all(|i| i.penalty_taken_at == Some(outcome.penalty_taken_at))
    );

    let pending = steward.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kart_number, 31);

    let history = steward.history_for_kart(30).await.unwrap();
    let applied = history
        .iter()
        .filter(|h| h.action == HistoryAction::PenaltyApplied)
        .count();
    assert_eq!(applied, 2);

    let err = steward.apply_all_pending(30, "Race Control").await.unwrap_err();
    assert!(matches!(err, StewardError::InvalidState(_)));
}

#[tokio::test]
async fn test_list_pending_oldest_first() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    let first = steward
        .record(InfringementInput::new(40, "Contact").with_penalty("Drive through"))
        .await
        .unwrap();
    steward.record(line(41)).await.unwrap();
    let second = steward
        .record(InfringementInput::new(42, "Jump start").with_penalty("10 sec"))
        .await
        .unwrap();

    let pending = steward.list_pending().await.unwrap();
    let ids: Vec<i64> = pending.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_pagination() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    let mut ids = Vec::new();
    for kart in 1..=5 {
        ids.push(
            steward
                .record(InfringementInput::new(kart, "Contact"))
                .await
                .unwrap()
                .id,
        );
    }
    ids.reverse();

    let page = steward.list_paginated(2, Some(2)).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.page, 2);
    let got: Vec<i64> = page.items.iter().map(|i| i.id).collect();
    assert_eq!(got, ids[2..4].to_vec());

    let last = steward.list_paginated(3, Some(2)).await.unwrap();
    assert_eq!(last.items.len(), 1);

    let beyond = steward.list_paginated(9, Some(2)).await.unwrap();
    assert_eq!(beyond.page, 1);
    assert_eq!(beyond.items[0].id, ids[0]);

    let zero = steward.list_paginated(0, Some(2)).await.unwrap();
    assert_eq!(zero.page, 1);

    let tiny = steward.list_paginated(1, Some(0)).await.unwrap();
    assert_eq!(tiny.page_size, 1);

    let huge = steward.list_paginated(1, Some(50_000)).await.unwrap();
    assert_eq!(huge.page_size, 1000);
    assert_eq!(huge.items.len(), 5);
}

#[tokio::test]
async fn test_pagination_empty_session() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;

    let page = steward.list_paginated(3, None).await.unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.total, 0);
    assert_eq!(page.total_pages, 0);
    assert_eq!(page.page_size, 50);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_history_newest_first() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    let recorded = steward
        .record(line(50).with_penalty("Drive through"))
        .await
        .unwrap();
    steward.apply_penalty(recorded.id, "Clerk").await.unwrap();

    let history = steward.history_for_kart(50).await.unwrap();
    let actions: Vec<HistoryAction> = history.iter().map(|h| h.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::PenaltyApplied, HistoryAction::Created]
    );
    assert_eq!(history[1].performed_by, "Race Control");
    assert_eq!(history[1].observer.as_deref(), Some("Marshal 2"));
    assert!(history[1].details.contains(LINE));

    let err = steward.history_for_kart(99).await.unwrap_err();
    assert!(matches!(err, StewardError::NotFound(_)));
}

#[tokio::test]
async fn test_no_active_session_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let steward = Steward::open(StewardConfig::with_data_dir(dir.path()))
        .await
        .unwrap();

    let err = steward.record(line(1)).await.unwrap_err();
    assert!(matches!(err, StewardError::StorageUnavailable(_)));
    assert!(err.public_message().contains("no active session"));

    let err = steward.list_pending().await.unwrap_err();
    assert!(matches!(err, StewardError::StorageUnavailable(_)));
}

#[tokio::test]
async fn test_shorter_window_still_counts_recent_warnings() {
    let dir = TempDir::new().unwrap();
    let steward = open_with_session(&dir).await;
    steward.set_warning_expiry_minutes(1).await.unwrap();

    steward.record(line(60)).await.unwrap();
    let second = steward.record(line(60)).await.unwrap();
    assert_eq!(second.warning_count, 2);
}
