use super::*;
use crate::error::NetworkError;
use crate::net::mock::{GatedTransport, Pending, RecordingTransport, ok_json, status};
use crate::net::transport::ApiResponse;
use records::{Annotation, Code, Message, NewAnnotation, NewCode, ValidationError};
use serde_json::json;
use tokio::sync::mpsc;

fn gated_table() -> (Arc<CrudTable<Code>>, mpsc::UnboundedReceiver<Pending>) {
    let (transport, gate) = GatedTransport::new();
    let api = ApiClient::new(Arc::new(transport));
    (Arc::new(CrudTable::new(api)), gate)
}

fn recording_table(replies: Vec<Result<ApiResponse, NetworkError>>) -> (CrudTable<Code>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::with_replies(replies));
    (CrudTable::new(ApiClient::new(transport.clone())), transport)
}

fn labels(rows: &[Code]) -> Vec<&str> {
    rows.iter().map(|c| c.code.as_str()).collect()
}

#[tokio::test]
async fn late_response_from_superseded_fetch_is_discarded() {
    let (table, mut gate) = gated_table();

    let first = tokio::spawn({
        let table = table.clone();
        async move { table.refresh().await }
    });
    let (req_a, reply_a) = gate.recv().await.unwrap();

    let second = tokio::spawn({
        let table = table.clone();
        async move { table.set_sorting(Some(Sorting::desc("code"))).await }
    });
    let (req_b, reply_b) = gate.recv().await.unwrap();

    assert!(req_a.query.is_empty());
    assert_eq!(req_b.query[0], ("key", "code".to_owned()));

    reply_b
        .send(Ok(ok_json(json!([{ "id": 2, "code": "B" }, { "id": 1, "code": "A" }]))))
        .unwrap();
    assert!(second.await.unwrap().unwrap().is_applied());

    reply_a
        .send(Ok(ok_json(json!([{ "id": 9, "code": "STALE" }]))))
        .unwrap();
    assert!(matches!(first.await.unwrap().unwrap(), Refresh::Superseded));

    let view = table.view();
    assert_eq!(labels(&view.rows), ["B", "A"]);
    assert_eq!(view.generation, 2);
    assert_eq!(view.query.sorting, Some(Sorting::desc("code")));
    assert!(!view.loading);
    assert!(view.error.is_none());
}

#[tokio::test]
async fn superseded_failure_does_not_mark_the_view() {
    let (table, mut gate) = gated_table();
    let mut events = table.subscribe();

    let first = tokio::spawn({
        let table = table.clone();
        async move { table.refresh().await }
    });
    let (_, reply_a) = gate.recv().await.unwrap();
    let second = tokio::spawn({
        let table = table.clone();
        async move { table.refresh().await }
    });
    let (_, reply_b) = gate.recv().await.unwrap();

    reply_b.send(Ok(ok_json(json!([{ "id": 1, "code": "A" }])))).unwrap();
    second.await.unwrap().unwrap();
    reply_a.send(Ok(status(500, "boom"))).unwrap();
    assert!(matches!(first.await.unwrap().unwrap(), Refresh::Superseded));

    assert!(table.view().error.is_none());
    assert!(matches!(events.try_recv().unwrap(), TableEvent::Updated { generation: 2, .. }));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn applied_fetch_emits_updated_event() {
    let (table, _) = recording_table(vec![Ok(ok_json(json!([{ "id": 1, "code": "POSITIVE" }])))]);
    let mut events = table.subscribe();

    let outcome = table.refresh().await.unwrap();
    assert!(outcome.is_applied());

    match events.try_recv().unwrap() {
        TableEvent::Updated { generation, rows } => {
            assert_eq!(generation, 1);
            assert_eq!(labels(&rows), ["POSITIVE"]);
        }
        TableEvent::Failed { message } => panic!("unexpected failure: {message}"),
    }
}

#[tokio::test]
async fn failed_fetch_keeps_snapshot_and_sets_inline_error() {
    let (table, _) = recording_table(vec![
        Ok(ok_json(json!([{ "id": 1, "code": "KEEP" }]))),
        Err(NetworkError::Request("connection refused".to_owned())),
    ]);
    table.refresh().await.unwrap();
    let mut events = table.subscribe();

    let err = table.refresh().await.unwrap_err();
    assert!(matches!(err, CrudError::Network(_)));

    let view = table.view();
    assert_eq!(labels(&view.rows), ["KEEP"]);
    assert_eq!(view.generation, 1);
    assert!(view.error.as_deref().is_some_and(|e| e.contains("connection refused")));
    assert!(matches!(events.try_recv().unwrap(), TableEvent::Failed { .. }));
}

#[tokio::test]
async fn invalid_sort_key_fails_before_any_request() {
    let (table, transport) = recording_table(vec![]);
    let err = table
        .set_sorting(Some(Sorting::asc("content")))
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::Validation(_)));
    assert!(transport.seen().is_empty());
    let view = table.view();
    assert!(view.error.is_none());
    assert!(view.query.sorting.is_none());
}

#[tokio::test]
async fn message_filter_is_rejected_for_codes() {
    let (table, transport) = recording_table(vec![]);
    let err = table.set_message_filter(Some(3)).await.unwrap_err();
    assert!(matches!(err, CrudError::Validation(_)));
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn set_page_sends_page_params() {
    let (table, transport) = recording_table(vec![Ok(ok_json(json!([])))]);
    table
        .set_page(Some(Page::new(1, 10).unwrap()))
        .await
        .unwrap();
    let seen = transport.seen();
    assert_eq!(seen[0].query, vec![("page", "1".to_owned()), ("page_size", "10".to_owned())]);
    assert_eq!(table.view().query.page, Some(Page { index: 1, size: 10 }));
}

#[tokio::test]
async fn create_refetches_the_view() {
    let (table, transport) = recording_table(vec![
        Ok(ok_json(json!({ "id": 5, "code": "NEW" }))),
        Ok(ok_json(json!([{ "id": 5, "code": "NEW" }]))),
    ]);
    let created = table
        .create(&NewCode { code: "NEW".to_owned() })
        .await
        .unwrap();
    assert_eq!(created.id, 5);
    assert_eq!(labels(&table.rows()), ["NEW"]);

    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].path, "codes/");
}

#[tokio::test]
async fn failed_delete_leaves_rows_untouched() {
    let (table, transport) = recording_table(vec![
        Ok(ok_json(json!([{ "id": 3, "code": "USED" }]))),
        Ok(status(409, "code 3 is referenced by 1 annotation(s)")),
    ]);
    table.refresh().await.unwrap();

    let err = table.delete(3).await.unwrap_err();
    assert!(matches!(err, CrudError::Conflict(_)));
    assert_eq!(labels(&table.rows()), ["USED"]);
    assert!(table.view().error.is_some());
    assert_eq!(transport.seen().len(), 2);
}

#[tokio::test]
async fn invalid_draft_does_not_mark_the_view() {
    let (table, transport) = recording_table(vec![]);
    let err = table
        .create(&NewCode { code: " ".to_owned() })
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::Validation(_)));
    assert!(table.view().error.is_none());
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn repeated_delete_is_success_then_not_found() {
    let (table, _) = recording_table(vec![
        Ok(ApiResponse { status: 204, body: String::new() }),
        Ok(ok_json(json!([]))),
        Ok(status(404, "code 3 not found")),
    ]);
    table.delete(3).await.unwrap();
    let err = table.delete(3).await.unwrap_err();
    assert!(matches!(err, CrudError::NotFound(_)));
}

#[tokio::test]
async fn page_change_keeps_pending_sort() {
    let (table, mut gate) = gated_table();

    let sort = tokio::spawn({
        let table = table.clone();
        async move { table.set_sorting(Some(Sorting::desc("code"))).await }
    });
    let (_, reply_sort) = gate.recv().await.unwrap();
    assert_eq!(table.view().requested.sorting, Some(Sorting::desc("code")));
    assert!(table.view().query.sorting.is_none());

    let page = tokio::spawn({
        let table = table.clone();
        async move { table.set_page(Some(Page::new(0, 10).unwrap())).await }
    });
    let (req_page, reply_page) = gate.recv().await.unwrap();
    assert_eq!(
        req_page.query,
        [
            ("key", "code".to_owned()),
            ("order", "desc".to_owned()),
            ("page", "0".to_owned()),
            ("page_size", "10".to_owned()),
        ]
    );

    reply_page
        .send(Ok(ok_json(json!([{ "id": 2, "code": "B" }, { "id": 1, "code": "A" }]))))
        .unwrap();
    assert!(page.await.unwrap().unwrap().is_applied());
    reply_sort.send(Ok(ok_json(json!([{ "id": 9, "code": "STALE" }])))).unwrap();
    assert!(matches!(sort.await.unwrap().unwrap(), Refresh::Superseded));

    let view = table.view();
    assert_eq!(labels(&view.rows), ["B", "A"]);
    assert_eq!(view.query.sorting, Some(Sorting::desc("code")));
    assert_eq!(view.query.page, Some(Page { index: 0, size: 10 }));
}

#[tokio::test]
async fn refetch_after_create_keeps_pending_sort() {
    let (table, mut gate) = gated_table();

    let sort = tokio::spawn({
        let table = table.clone();
        async move { table.set_sorting(Some(Sorting::desc("code"))).await }
    });
    let (_, reply_sort) = gate.recv().await.unwrap();

    let create = tokio::spawn({
        let table = table.clone();
        async move { table.create(&NewCode { code: "NEW".to_owned() }).await }
    });
    let (req_create, reply_create) = gate.recv().await.unwrap();
    assert!(req_create.body.is_some());
    reply_create.send(Ok(ok_json(json!({ "id": 5, "code": "NEW" })))).unwrap();

    let (req_refetch, reply_refetch) = gate.recv().await.unwrap();
    assert_eq!(req_refetch.query, [("key", "code".to_owned()), ("order", "desc".to_owned())]);
    reply_refetch
        .send(Ok(ok_json(json!([{ "id": 5, "code": "NEW" }, { "id": 1, "code": "A" }]))))
        .unwrap();
    assert_eq!(create.await.unwrap().unwrap().id, 5);

    reply_sort.send(Ok(ok_json(json!([{ "id": 1, "code": "A" }])))).unwrap();
    assert!(matches!(sort.await.unwrap().unwrap(), Refresh::Superseded));

    let view = table.view();
    assert_eq!(labels(&view.rows), ["NEW", "A"]);
    assert_eq!(view.query.sorting, Some(Sorting::desc("code")));
}

#[tokio::test]
async fn rejected_sort_does_not_change_requested_query() {
    let (table, transport) = recording_table(vec![Ok(ok_json(json!([])))]);
    table.set_sorting(Some(Sorting::desc("content"))).await.unwrap_err();
    table.refresh().await.unwrap();
    assert!(transport.seen()[0].query.is_empty());
    assert!(table.view().requested.sorting.is_none());
}

fn annotation_table(replies: Vec<Result<ApiResponse, NetworkError>>) -> (CrudTable<Annotation>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::with_replies(replies));
    (CrudTable::new(ApiClient::new(transport.clone())), transport)
}

fn greeting() -> Message {
    Message { id: 1, content: "hello".to_owned() }
}

#[tokio::test]
async fn annotation_span_is_checked_before_create() {
    let (table, transport) = annotation_table(vec![]);
    let draft = NewAnnotation { start_idx: 2, end_idx: 9, code_id: 1, message_id: 1 };

    let err = table.create_annotation(&greeting(), &draft).await.unwrap_err();
    assert!(matches!(err, CrudError::Validation(ValidationError::SpanOutOfRange { end_idx: 9, len: 5 })));
    assert!(transport.seen().is_empty());
    assert!(table.view().error.is_none());
}

#[tokio::test]
async fn annotation_span_is_checked_before_update() {
    let (table, transport) = annotation_table(vec![]);
    let record = Annotation { id: 4, start_idx: 0, end_idx: 6, code_id: 1, message_id: 1 };

    let err = table.update_annotation(&greeting(), &record).await.unwrap_err();
    assert!(matches!(err, CrudError::Validation(ValidationError::SpanOutOfRange { .. })));
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn annotation_within_message_is_created_and_refetched() {
    let row = json!({ "id": 7, "start_idx": 0, "end_idx": 5, "code_id": 1, "message_id": 1 });
    let (table, transport) = annotation_table(vec![Ok(ok_json(row.clone())), Ok(ok_json(json!([row])))]);
    let draft = NewAnnotation { start_idx: 0, end_idx: 5, code_id: 1, message_id: 1 };

    let created = table.create_annotation(&greeting(), &draft).await.unwrap();
    assert_eq!(created.id, 7);
    assert_eq!(table.rows().len(), 1);
    assert_eq!(transport.seen().len(), 2);
}
