//! Drives the HTTP client against a real router backed by the in-memory store.

use std::sync::Arc;

use client::{ApiClient, ClientConfig, CrudError, CrudTable, TableEvent};
use records::{
    Annotation, AnnotationWithCode, Code, ListQuery, Message, NewAnnotation, NewCode, NewMessage, Sorting, is_ordered,
};
use server::services::MemoryStore;
use server::state::AppState;

async fn spawn_backend() -> ApiClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::routes::app(AppState::new(Arc::new(MemoryStore::new())));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let config = ClientConfig::new(&format!("http://{addr}/")).unwrap();
    ApiClient::from_config(&config).unwrap()
}

#[tokio::test]
async fn annotate_a_message_and_read_it_back_with_its_code() {
    let api = spawn_backend().await;
    api.health().await.unwrap();

    let code: Code = api.create::<Code>(&NewCode { code: "POSITIVE".into() }).await.unwrap();
    let message: Message = api
        .create::<Message>(&NewMessage { content: "I love this".into() })
        .await
        .unwrap();
    let draft = NewAnnotation { start_idx: 0, end_idx: 6, code_id: code.id, message_id: message.id };
    assert_eq!(draft.covered(&message.content), Some("I love"));
    api.create_annotation(&message, &draft).await.unwrap();

    let rows: Vec<AnnotationWithCode> = api
        .list(&ListQuery::default().for_message(message.id))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].code, "POSITIVE");
    assert_eq!((rows[0].start_idx, rows[0].end_idx), (0, 6));
}

#[tokio::test]
async fn update_round_trips_and_delete_twice_is_not_found() {
    let api = spawn_backend().await;
    let mut code: Code = api.create::<Code>(&NewCode { code: "NEG".into() }).await.unwrap();
    code.code = "NEGATIVE".into();
    let updated = api.update(&code).await.unwrap();
    assert_eq!(updated, code);
    assert_eq!(api.get::<Code>(code.id).await.unwrap(), code);

    api.delete::<Code>(code.id).await.unwrap();
    let err = api.delete::<Code>(code.id).await.unwrap_err();
    assert!(matches!(err, CrudError::NotFound(_)));
}

#[tokio::test]
async fn referenced_code_cannot_be_deleted() {
    let api = spawn_backend().await;
    let code: Code = api.create::<Code>(&NewCode { code: "USED".into() }).await.unwrap();
    let message: Message = api
        .create::<Message>(&NewMessage { content: "hello".into() })
        .await
        .unwrap();
    let annotation: Annotation = api
        .create_annotation(&message, &NewAnnotation { start_idx: 1, end_idx: 4, code_id: code.id, message_id: message.id })
        .await
        .unwrap();

    let err = api.delete::<Code>(code.id).await.unwrap_err();
    assert!(matches!(err, CrudError::Conflict(_)));

    api.delete::<Annotation>(annotation.id).await.unwrap();
    api.delete::<Code>(code.id).await.unwrap();
}

#[tokio::test]
async fn duplicate_code_is_a_conflict() {
    let api = spawn_backend().await;
    api.create::<Code>(&NewCode { code: "X".into() }).await.unwrap();
    let err = api.create::<Code>(&NewCode { code: "X".into() }).await.unwrap_err();
    assert!(matches!(err, CrudError::Conflict(_)));
}

#[tokio::test]
async fn sorted_table_is_monotonic() {
    let api = spawn_backend().await;
    for content in ["delta", "alpha", "charlie", "bravo"] {
        api.create::<Message>(&NewMessage { content: content.into() })
            .await
            .unwrap();
    }
    let table: CrudTable<Message> = CrudTable::new(api.clone());
    let mut events = table.subscribe();

    let sorting = Sorting::desc("content");
    table.set_sorting(Some(sorting.clone())).await.unwrap();
    let rows = table.rows();
    assert!(is_ordered(&rows, &sorting));
    assert_eq!(rows[0].content, "delta");
    assert!(matches!(events.recv().await.unwrap(), TableEvent::Updated { generation: 1, .. }));

    table
        .create(&NewMessage { content: "echo".into() })
        .await
        .unwrap();
    assert_eq!(table.rows()[0].content, "echo");
}

#[tokio::test]
async fn invalid_sort_key_never_reaches_the_backend() {
    let api = spawn_backend().await;
    let table: CrudTable<Code> = CrudTable::new(api);
    let err = table
        .set_sorting(Some(Sorting::asc("content")))
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::Validation(_)));
    assert_eq!(table.view().generation, 0);
}

#[tokio::test]
async fn seed_and_count() {
    let api = spawn_backend().await;
    assert_eq!(api.count_messages().await.unwrap(), 0);
    assert_eq!(api.seed().await.unwrap(), 2);
    assert_eq!(api.seed().await.unwrap(), 0);
    assert_eq!(api.count_messages().await.unwrap(), 2);
}
