use pretty_assertions::assert_eq;
use types::{BundlePage, FinalizedBundle, FinalizedBundlesResponse, PageCursor, PoolResponse};

const BUNDLES_PAGE: &str = r#"{
  "finalized_bundles": [
    {
      "pool_id": "1",
      "id": "0",
      "storage_id": "Dc9tJgq7xqXcJTh1m4VQbOFWtCxE1Nn3qFxIkYMnVnA",
      "uploader": "kyve1qnf86dkvvtpdukx30r3qvkkdgrzj9ndwwgc8ld",
      "from_index": "0",
      "to_index": "150",
      "from_key": "1",
      "to_key": "150",
      "bundle_summary": "150",
      "data_hash": "0b7d2d33a1c2c8a3a3e1bd1e4c66f2b6d3c9b0c3b5a38c1b1e3b3b9c8b0d6f1a",
      "finalized_at": {"height": "300", "timestamp": "2023-03-14T10:00:00Z"},
      "storage_provider_id": 2,
      "compression_id": 1
    }
  ],
  "pagination": {"next_key": "AAAAAAAAAAE="}
}"#;

#[test]
fn decodes_finalized_bundles_page() {
    let response: FinalizedBundlesResponse = serde_json::from_str(BUNDLES_PAGE).unwrap();
    let page = BundlePage::try_from(response).unwrap();

    assert_eq!(
        page.bundles,
        vec![FinalizedBundle {
            id: 0,
            storage_id: "Dc9tJgq7xqXcJTh1m4VQbOFWtCxE1Nn3qFxIkYMnVnA".to_string(),
            storage_provider_id: 2,
            compression_id: 1,
            from_key: "1".to_string(),
            to_key: "150".to_string(),
            data_hash: "0b7d2d33a1c2c8a3a3e1bd1e4c66f2b6d3c9b0c3b5a38c1b1e3b3b9c8b0d6f1a".to_string(),
        }]
    );

    let next = page.next.expect("page has a continuation");
    assert_eq!(next.as_str(), "AAAAAAAAAAE=");
    assert_eq!(next.to_raw().unwrap(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
}

#[test]
fn empty_or_missing_next_key_ends_the_index() {
    for body in [
        r#"{"finalized_bundles": [], "pagination": {"next_key": ""}}"#,
        r#"{"finalized_bundles": [], "pagination": {"next_key": null}}"#,
        r#"{"finalized_bundles": []}"#,
    ] {
        let response: FinalizedBundlesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(BundlePage::try_from(response).unwrap().next, None);
    }
}

#[test]
fn rejects_non_base64_cursor() {
    let response: FinalizedBundlesResponse =
        serde_json::from_str(r#"{"finalized_bundles": [], "pagination": {"next_key": "not base64!"}}"#).unwrap();
    assert!(BundlePage::try_from(response).is_err());
}

#[test]
fn cursor_round_trips_raw_bytes() {
    let cursor = PageCursor::from_raw(b"page-2");
    assert_eq!(cursor.to_raw().unwrap(), b"page-2".to_vec());
    assert_eq!(
        PageCursor::from_next_key(Some(cursor.as_str().to_string())).unwrap(),
        Some(cursor)
    );
}

#[test]
fn decodes_pool_metadata() {
    let body = r#"{
      "pool": {
        "id": "1",
        "data": {
          "id": "1",
          "name": "Cosmos Hub",
          "runtime": "@kyvejs/tendermint-bsync",
          "start_key": "5200791",
          "current_key": "5300000",
          "current_summary": "",
          "total_bundles": "1000"
        },
        "bundle_proposal": {}
      }
    }"#;

    let response: PoolResponse = serde_json::from_str(body).unwrap();
    assert_eq!(response.pool.id, 1);
    assert_eq!(response.pool.runtime(), "@kyvejs/tendermint-bsync");
    assert_eq!(response.pool.data.start_key, "5200791");
    assert_eq!(response.pool.data.current_key, "5300000");
}
