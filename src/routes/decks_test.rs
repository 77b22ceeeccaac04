use super::*;

#[test]
fn deck_errors_map_to_http_statuses() {
    assert_eq!(deck_error_to_status(DeckError::NotFound("p".into())), StatusCode::NOT_FOUND);
    assert_eq!(deck_error_to_status(DeckError::Unauthorized("p".into())), StatusCode::FORBIDDEN);
}

#[test]
fn deck_response_carries_raw_project_when_unparsed() {
    // ParseFailure degrades: the raw JSON is still handed to the caller.
    let record = DeckRecord {
        project_id: "p".into(),
        title: None,
        project: "{broken".into(),
        owner_id: Uuid::new_v4(),
        document: None,
    };
    let response = to_response(record);
    assert_eq!(response.project, "{broken");
    assert!(response.document.is_none());

    let json = serde_json::to_value(&response).expect("serialize");
    assert_eq!(json.get("project").and_then(|v| v.as_str()), Some("{broken"));
    assert!(json.get("document").expect("document key").is_null());
}
