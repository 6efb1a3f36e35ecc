use super::*;
use std::sync::{Arc, Mutex};

use clap::CommandFactory;
use client::NetworkError;
use client::net::{ApiRequest, ApiResponse, Transport};
use tokio::sync::oneshot;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parses_list_with_sorting_and_paging() {
    let cli = Cli::try_parse_from([
        "annotate", "--api-url", "http://localhost:9000", "code", "list", "--key", "code", "--order", "desc", "--page",
        "1", "--page-size", "10",
    ])
    .unwrap();
    assert_eq!(cli.api_url, "http://localhost:9000");
    let Command::Code(CodeCommand { command: CodeSubcommand::List(args) }) = cli.command else {
        panic!("expected code list");
    };
    let query = args.into_query::<Code>().unwrap();
    assert_eq!(query.sorting, Some(records::Sorting::desc("code")));
    assert_eq!(query.page, Some(records::Page { index: 1, size: 10 }));
}

#[test]
fn list_args_reject_keys_the_kind_lacks() {
    let args = ListArgs { key: Some("content".into()), ..ListArgs::default() };
    let err = args.into_query::<Code>().unwrap_err();
    assert!(matches!(err, CliError::Crud(CrudError::Validation(_))));

    let args = ListArgs { message_id: Some(2), ..ListArgs::default() };
    assert!(args.into_query::<Message>().is_err());
    let args = ListArgs { message_id: Some(2), ..ListArgs::default() };
    assert_eq!(args.into_query::<Annotation>().unwrap().message_id, Some(2));
}

#[test]
fn parses_annotation_create_span() {
    let cli = Cli::try_parse_from([
        "annotate", "annotation", "create", "--message-id", "3", "--code-id", "4", "--start", "0", "--end", "6",
    ])
    .unwrap();
    let Command::Annotation(AnnotationCommand { command: AnnotationSubcommand::Create(span) }) = cli.command else {
        panic!("expected annotation create");
    };
    assert_eq!(span.draft(), NewAnnotation { start_idx: 0, end_idx: 6, code_id: 4, message_id: 3 });
}

#[test]
fn parses_watch_kind_and_limits() {
    let cli = Cli::try_parse_from(["annotate", "watch", "annotated", "--interval-secs", "2", "--changes", "1", "--message-id", "5"])
        .unwrap();
    let Command::Watch(args) = cli.command else {
        panic!("expected watch");
    };
    assert_eq!(args.kind, Kind::Annotated);
    assert_eq!(args.interval_secs, 2);
    assert_eq!(args.changes, Some(1));
    assert_eq!(args.list.message_id, Some(5));
}

/// Answers every list with one code and fires `stop` while the first
/// request is still in flight.
struct StopDuringRefresh {
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait::async_trait]
impl Transport for StopDuringRefresh {
    async fn send(&self, _request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        if let Some(stop) = self.stop.lock().unwrap().take() {
            stop.send(()).unwrap();
        }
        Ok(ApiResponse { status: 200, body: serde_json::json!([{ "id": 1, "code": "greeting" }]).to_string() })
    }
}

#[tokio::test]
async fn watch_honours_stop_raised_during_refresh() {
    let (stop_tx, stop_rx) = oneshot::channel();
    let transport = StopDuringRefresh { stop: Mutex::new(Some(stop_tx)) };
    let table = CrudTable::<Code>::new(ApiClient::new(Arc::new(transport)));
    let args = WatchArgs { kind: Kind::Code, interval_secs: 60, changes: None, list: ListArgs::default() };

    let printed = tokio::time::timeout(Duration::from_secs(5), watch_until(&table, &args, stop_rx))
        .await
        .expect("watch kept running after stop")
        .unwrap();
    assert_eq!(printed, 1);
}

#[tokio::test]
async fn watch_stops_at_change_limit() {
    let (_stop_tx, stop_rx) = oneshot::channel::<()>();
    let transport = StopDuringRefresh { stop: Mutex::new(None) };
    let table = CrudTable::<Code>::new(ApiClient::new(Arc::new(transport)));
    let args = WatchArgs { kind: Kind::Code, interval_secs: 60, changes: Some(1), list: ListArgs::default() };

    let printed = watch_until(&table, &args, stop_rx).await.unwrap();
    assert_eq!(printed, 1);
}
