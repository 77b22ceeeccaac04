use super::*;
use crate::frame::ErrorCode;
use crate::state::test_helpers;

#[test]
fn error_codes_are_grepable() {
    assert_eq!(DeckError::NotFound("p".into()).error_code(), "E_DECK_NOT_FOUND");
    assert_eq!(DeckError::Unauthorized("p".into()).error_code(), "E_UNAUTHORIZED");
    assert_eq!(DeckError::NotFound("p".into()).to_string(), "deck not found: p");
}

#[tokio::test]
async fn bulk_delete_of_nothing_touches_nothing() {
    // Short-circuits before any query, so even a dead pool succeeds.
    let state = test_helpers::test_app_state();
    let deleted = bulk_delete_decks(&state.pool, &[], uuid::Uuid::new_v4())
        .await
        .expect("no-op delete");
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn database_failures_surface_as_database_errors() {
    let state = test_helpers::test_app_state();
    let result = get_deck(&state.pool, "missing-project").await;
    assert!(matches!(result, Err(DeckError::Database(_))));
}

#[test]
fn summary_serializes_for_listing() {
    let summary = DeckSummary { project_id: "p1".into(), title: Some("Talk".into()) };
    let json = serde_json::to_value(&summary).expect("serialize");
    assert_eq!(json.get("project_id").and_then(|v| v.as_str()), Some("p1"));
    assert_eq!(json.get("title").and_then(|v| v.as_str()), Some("Talk"));
}
