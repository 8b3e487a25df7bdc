//! Fix loop and AI assists: free allowance, credit gating, tier gating and
//! patch application.

mod common;

use std::sync::atomic::Ordering;

use common::{harness, Harness, Reply};
use dc_backend::{CleanCodeResponse, EditResponse, FixResponse};
use dc_canvas::CanvasError;
use dc_credits::DeductOutcome;
use dc_domain::code::RunState;
use dc_domain::credit::{Feature, Tier};
use dc_domain::message::Message;
use dc_sessions::{pending_fix_scope, PendingFixKey};

const ENTRY: &str = "m1:python";

async fn failing_entry(h: &Harness) {
    h.backend.reply_error("Traceback: NameError: name 'x' is not defined");
    h.coordinator.turn_started();
    h.coordinator
        .turn_completed(&[Message::assistant("```python\nprint(x)\n```").with_id("m1")])
        .await;
    assert_eq!(h.coordinator.run_state(ENTRY), RunState::Failed);
}

async fn fix(h: &Harness) -> Result<dc_canvas::FixOutcome, CanvasError> {
    h.fix.request_fix(ENTRY, "NameError: x", "print(x)").await
}

/// Yield until the stub has received `n` fix requests.
async fn wait_fix_calls(h: &Harness, n: usize) {
    for _ in 0..100 {
        if h.backend.fix_calls.load(Ordering::SeqCst) >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("fix service never called");
}

#[tokio::test]
async fn first_three_attempts_are_free() {
    let h = harness().ledger(0, 0, Tier::Free).build().await;
    failing_entry(&h).await;

    for attempt in 1..=3 {
        let outcome = fix(&h).await.unwrap();
        assert_eq!(outcome.attempt, attempt);
        assert!(!outcome.paid);
        assert!(outcome.deduction.is_none());
    }
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 3);
}

#[tokio::test]
async fn fourth_attempt_without_credits_never_calls_the_service() {
    let h = harness().ledger(0, 0, Tier::Free).build().await;
    failing_entry(&h).await;
    for _ in 0..3 {
        fix(&h).await.unwrap();
    }

    let err = fix(&h).await.unwrap_err();
    assert!(matches!(
        err,
        CanvasError::InsufficientCredits {
            required: 1,
            remaining: 0
        }
    ));
    assert_eq!(h.backend.fix_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 3);
}

#[tokio::test]
async fn fourth_attempt_with_credits_is_paid() {
    let h = harness().ledger(5, 0, Tier::Free).build().await;
    failing_entry(&h).await;
    for _ in 0..3 {
        fix(&h).await.unwrap();
    }

    let outcome = fix(&h).await.unwrap();
    assert_eq!(outcome.attempt, 4);
    assert!(outcome.paid);
    assert_eq!(outcome.deduction, Some(DeductOutcome::Confirmed));
    assert_eq!(h.credits.remaining(), 4);
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unlimited_ledger_never_deducts() {
    let h = harness().ledger(999_999_999, 0, Tier::Free).build().await;
    failing_entry(&h).await;
    for _ in 0..5 {
        fix(&h).await.unwrap();
    }
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.credits.ledger().unwrap().used, 0);
}

#[tokio::test]
async fn tier_gate_short_circuits() {
    let h = harness()
        .credits(|c| {
            c.features.insert(Feature::AiFix, Tier::Pro);
        })
        .build()
        .await;
    failing_entry(&h).await;

    let err = fix(&h).await.unwrap_err();
    assert!(matches!(
        err,
        CanvasError::RequiresUpgrade {
            feature: Feature::AiFix
        }
    ));
    assert_eq!(h.backend.fix_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 0);
}

#[tokio::test]
async fn empty_error_text_is_rejected() {
    let h = harness().build().await;
    failing_entry(&h).await;
    let err = h.fix.request_fix(ENTRY, "   ", "print(x)").await.unwrap_err();
    assert!(matches!(err, CanvasError::EmptyErrorText));
    assert_eq!(h.backend.fix_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fix_replaces_code_clears_error_and_does_not_run() {
    let h = harness().build().await;
    failing_entry(&h).await;
    let runs_before = h.backend.execute_count();
    assert!(h.coordinator.last_error(ENTRY).is_some());

    let outcome = fix(&h).await.unwrap();

    assert_eq!(outcome.entry.code, "print('fixed')");
    assert_eq!(h.coordinator.entry(ENTRY).unwrap().code, "print('fixed')");
    assert!(h.coordinator.last_error(ENTRY).is_none());
    assert_eq!(h.coordinator.run_state(ENTRY), RunState::NotRun);
    assert_eq!(h.backend.execute_count(), runs_before);
}

#[tokio::test]
async fn transport_failure_is_a_network_error_and_not_counted() {
    let h = harness().build().await;
    failing_entry(&h).await;
    *h.backend.fix_reply.lock() = Reply::Transport;

    let err = fix(&h).await.unwrap_err();
    assert!(matches!(err, CanvasError::Network(_)));
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 0);
    assert_eq!(h.coordinator.entry(ENTRY).unwrap().code, "print(x)");
}

#[tokio::test]
async fn service_refusal_counts_and_keeps_code() {
    let h = harness().build().await;
    failing_entry(&h).await;
    *h.backend.fix_reply.lock() = Reply::Respond(FixResponse {
        error: Some("could not understand the error".into()),
        ..FixResponse::default()
    });

    let err = fix(&h).await.unwrap_err();
    assert!(matches!(err, CanvasError::Service(ref m) if m.contains("could not")));
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 1);
    assert_eq!(h.coordinator.entry(ENTRY).unwrap().code, "print(x)");
}

#[tokio::test]
async fn counter_never_drops_within_a_turn_and_resets_on_the_next() {
    let h = harness().build().await;
    failing_entry(&h).await;
    fix(&h).await.unwrap();
    fix(&h).await.unwrap();
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 2);

    // Re-running and re-extracting within the turn keeps the count.
    h.coordinator.execute(ENTRY).await.unwrap();
    h.coordinator
        .extract(&[Message::assistant("```python\nprint(x)\n```").with_id("m1")]);
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 2);

    h.coordinator.turn_started();
    h.coordinator
        .turn_completed(&[Message::assistant("```python\nprint(x + 1)\n```").with_id("m1")])
        .await;
    assert_eq!(h.coordinator.run_state(ENTRY), RunState::Failed);
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 0);
}

#[tokio::test]
async fn turn_without_code_resets_the_budget_and_keeps_entries() {
    let h = harness().build().await;
    failing_entry(&h).await;
    fix(&h).await.unwrap();
    fix(&h).await.unwrap();
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 2);

    h.coordinator.turn_started();
    let outcome = h
        .coordinator
        .turn_completed(&[Message::assistant("That should work now.").with_id("m2")])
        .await;
    assert!(outcome.message_key.is_none());
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 0);
    assert!(h.coordinator.entry(ENTRY).is_some());
    assert_eq!(h.fix.availability(ENTRY).unwrap().free_remaining, 3);
}

#[tokio::test]
async fn error_looking_code_is_offered_a_fix_when_it_has_a_counter() {
    let h = harness().canvas(|c| c.auto_run = false).build().await;
    h.coordinator.turn_started();
    h.coordinator
        .turn_completed(&[Message::assistant(
            "```python\ntry:\n    run()\nexcept Exception as error:\n    print(error)\n```",
        )
        .with_id("m1")])
        .await;

    assert!(h.coordinator.last_error(ENTRY).is_none());
    assert!(h.fix.can_offer_fix(ENTRY));

    let availability = h.fix.availability(ENTRY).unwrap();
    assert_eq!(availability.free_remaining, 3);
    assert!(!availability.next_attempt_paid);
}

#[tokio::test]
async fn clean_code_without_errors_is_not_offered_a_fix() {
    let h = harness().canvas(|c| c.auto_run = false).build().await;
    h.coordinator.turn_started();
    h.coordinator
        .turn_completed(&[Message::assistant("```python\nprint(1)\n```").with_id("m1")])
        .await;
    assert!(!h.fix.can_offer_fix(ENTRY));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AI edit and cleanup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn ai_edit_requires_pro() {
    let h = harness().build().await;
    failing_entry(&h).await;

    let err = h.assist.request_edit(ENTRY, "use pandas").await.unwrap_err();
    assert!(matches!(
        err,
        CanvasError::RequiresUpgrade {
            feature: Feature::AiEdit
        }
    ));
    assert_eq!(h.backend.edit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ai_edit_applies_patch_and_charges_credit() {
    let h = harness().ledger(3, 0, Tier::Pro).build().await;
    failing_entry(&h).await;
    let runs_before = h.backend.execute_count();

    let outcome = h.assist.request_edit(ENTRY, "use pandas").await.unwrap();
    assert_eq!(outcome.entry.code, "print('edited')");
    assert_eq!(outcome.cost, 1);
    assert_eq!(h.credits.remaining(), 2);
    assert_eq!(h.backend.execute_count(), runs_before);
}

#[tokio::test]
async fn ai_edit_service_error_keeps_code() {
    let h = harness().ledger(3, 0, Tier::Pro).build().await;
    failing_entry(&h).await;
    *h.backend.edit_reply.lock() = Reply::Respond(EditResponse {
        error: Some("prompt unclear".into()),
        ..EditResponse::default()
    });

    assert!(matches!(
        h.assist.request_edit(ENTRY, "?").await,
        Err(CanvasError::Service(_))
    ));
    assert_eq!(h.coordinator.entry(ENTRY).unwrap().code, "print(x)");
    assert_eq!(h.credits.remaining(), 3);
}

#[tokio::test]
async fn cleanup_is_free_by_default() {
    let h = harness().ledger(0, 0, Tier::Free).build().await;
    failing_entry(&h).await;

    let outcome = h.assist.request_cleanup(ENTRY).await.unwrap();
    assert_eq!(outcome.entry.code, "print('clean')");
    assert!(outcome.deduction.is_none());
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-flight fixes and stale responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn in_flight_fix_is_visible_until_it_returns() {
    let h = harness().build().await;
    failing_entry(&h).await;
    h.backend.fix_delay_ms.store(50, Ordering::SeqCst);

    let observe = async {
        wait_fix_calls(&h, 1).await;
        let pending = h.fix.availability(ENTRY).unwrap().pending.unwrap();
        assert_eq!(pending.entry_id, ENTRY);
        assert_eq!(pending.attempt, 1);
        assert_eq!(pending.error_text, "NameError: x");
        let snapshot = h.coordinator.snapshot();
        assert_eq!(snapshot.pending_fixes.len(), 1);
        assert!(snapshot.pending_fixes.contains_key(ENTRY));
    };
    let (outcome, ()) = tokio::join!(fix(&h), observe);

    assert_eq!(outcome.unwrap().attempt, 1);
    assert!(h.fix.pending_fix(ENTRY).is_none());
    assert!(h.coordinator.snapshot().pending_fixes.is_empty());
}

#[tokio::test]
async fn fix_response_for_another_session_is_dropped() {
    let h = harness()
        .credits(|c| c.free_fix_attempts = 0)
        .ledger(5, 0, Tier::Free)
        .build()
        .await;
    failing_entry(&h).await;
    *h.backend.fix_reply.lock() = Reply::Respond(FixResponse {
        fixed_code: Some("print('fixed')".into()),
        session_id: Some("other".into()),
        ..FixResponse::default()
    });

    let err = fix(&h).await.unwrap_err();
    assert!(matches!(err, CanvasError::SessionChanged { .. }));
    assert_eq!(h.coordinator.entry(ENTRY).unwrap().code, "print(x)");
    assert_eq!(h.coordinator.fix_attempts().get(ENTRY), 0);
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.credits.remaining(), 5);
}

#[tokio::test]
async fn session_switch_during_fix_drops_the_result() {
    let h = harness()
        .credits(|c| c.free_fix_attempts = 0)
        .ledger(5, 0, Tier::Free)
        .build()
        .await;
    failing_entry(&h).await;
    h.backend.fix_delay_ms.store(50, Ordering::SeqCst);

    let switch = async {
        wait_fix_calls(&h, 1).await;
        assert!(h.coordinator.switch_session("s2"));
        let old_scope = pending_fix_scope("s1", ENTRY);
        assert!(h.coordinator.store().get::<PendingFixKey>(&old_scope).is_none());
    };
    let (result, ()) = tokio::join!(fix(&h), switch);

    assert!(matches!(result, Err(CanvasError::SessionChanged { .. })));
    assert!(h.coordinator.entry(ENTRY).is_none());
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.credits.remaining(), 5);
}

#[tokio::test]
async fn ai_edit_response_for_another_session_is_dropped() {
    let h = harness().ledger(3, 0, Tier::Pro).build().await;
    failing_entry(&h).await;
    *h.backend.edit_reply.lock() = Reply::Respond(EditResponse {
        edited_code: Some("print('edited')".into()),
        session_id: Some("other".into()),
        ..EditResponse::default()
    });

    let err = h.assist.request_edit(ENTRY, "use pandas").await.unwrap_err();
    assert!(matches!(err, CanvasError::SessionChanged { .. }));
    assert_eq!(h.coordinator.entry(ENTRY).unwrap().code, "print(x)");
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.credits.remaining(), 3);
}

#[tokio::test]
async fn cleanup_response_for_another_session_is_dropped() {
    let h = harness()
        .credits(|c| c.cleanup_cost = 1)
        .ledger(3, 0, Tier::Pro)
        .build()
        .await;
    failing_entry(&h).await;
    *h.backend.clean_reply.lock() = Reply::Respond(CleanCodeResponse {
        cleaned_code: "print('clean')".into(),
        session_id: Some("other".into()),
    });

    let err = h.assist.request_cleanup(ENTRY).await.unwrap_err();
    assert!(matches!(err, CanvasError::SessionChanged { .. }));
    assert_eq!(h.coordinator.entry(ENTRY).unwrap().code, "print(x)");
    assert_eq!(h.backend.deduct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.credits.remaining(), 3);
}
