#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use client::config::{ConfigError, Timeouts};
use client::{ApiClient, ClientConfig, CrudError, CrudTable, TableEvent};
use records::{
    Annotation, AnnotationWithCode, Code, ListParams, ListQuery, Message, NewAnnotation, NewCode, NewMessage,
    RecordId, Resource, Writable,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Crud(#[from] CrudError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<records::ValidationError> for CliError {
    fn from(err: records::ValidationError) -> Self {
        Self::Crud(CrudError::Validation(err))
    }
}

#[derive(Parser, Debug)]
#[command(name = "annotate", about = "Message annotation API CLI")]
struct Cli {
    #[arg(long, env = "API_URL", default_value = client::config::DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, env = "API_REQUEST_TIMEOUT_SECS", default_value_t = client::config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the backend answers `/healthz`.
    Ping,
    /// Print the number of stored messages.
    Count,
    /// Insert the demo messages if there are none.
    Seed,
    Message(MessageCommand),
    Code(CodeCommand),
    Annotation(AnnotationCommand),
    /// Annotations joined with their code label (read-only).
    Annotated(AnnotatedCommand),
    /// Re-fetch a table on an interval and print every change.
    Watch(WatchArgs),
}

/// Sorting, paging and filtering shared by every `list`.
#[derive(Args, Debug, Clone, Default)]
struct ListArgs {
    #[arg(long)]
    key: Option<String>,
    #[arg(long)]
    order: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    page_size: Option<u32>,
    #[arg(long)]
    message_id: Option<RecordId>,
}

impl ListArgs {
    fn into_query<R: Resource>(self) -> Result<ListQuery, CliError> {
        let params = ListParams {
            key: self.key,
            order: self.order,
            page: self.page,
            page_size: self.page_size,
            message_id: self.message_id,
        };
        Ok(params.into_query::<R>()?)
    }
}

#[derive(Args, Debug)]
struct MessageCommand {
    #[command(subcommand)]
    command: MessageSubcommand,
}

#[derive(Subcommand, Debug)]
enum MessageSubcommand {
    List(ListArgs),
    Get { id: RecordId },
    Create {
        #[arg(long)]
        content: String,
    },
    Update {
        id: RecordId,
        #[arg(long)]
        content: String,
    },
    Delete { id: RecordId },
}

#[derive(Args, Debug)]
struct CodeCommand {
    #[command(subcommand)]
    command: CodeSubcommand,
}

#[derive(Subcommand, Debug)]
enum CodeSubcommand {
    List(ListArgs),
    Get { id: RecordId },
    Create {
        #[arg(long)]
        code: String,
    },
    Update {
        id: RecordId,
        #[arg(long)]
        code: String,
    },
    Delete { id: RecordId },
}

#[derive(Args, Debug, Clone)]
struct SpanArgs {
    #[arg(long)]
    message_id: RecordId,
    #[arg(long)]
    code_id: RecordId,
    #[arg(long)]
    start: i64,
    #[arg(long)]
    end: i64,
}

impl SpanArgs {
    fn draft(&self) -> NewAnnotation {
        NewAnnotation { start_idx: self.start, end_idx: self.end, code_id: self.code_id, message_id: self.message_id }
    }
}

#[derive(Args, Debug)]
struct AnnotationCommand {
    #[command(subcommand)]
    command: AnnotationSubcommand,
}

#[derive(Subcommand, Debug)]
enum AnnotationSubcommand {
    List(ListArgs),
    Get { id: RecordId },
    Create(SpanArgs),
    Update {
        id: RecordId,
        #[command(flatten)]
        span: SpanArgs,
    },
    Delete { id: RecordId },
}

#[derive(Args, Debug)]
struct AnnotatedCommand {
    #[command(subcommand)]
    command: AnnotatedSubcommand,
}

#[derive(Subcommand, Debug)]
enum AnnotatedSubcommand {
    List(ListArgs),
    Get { id: RecordId },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Message,
    Code,
    Annotation,
    Annotated,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(value_enum)]
    kind: Kind,

    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    #[arg(long, help = "Stop after this many printed changes")]
    changes: Option<usize>,

    #[command(flatten)]
    list: ListArgs,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::new(&cli.api_url)?.with_timeouts(Timeouts {
        request_secs: cli.timeout_secs,
        ..Timeouts::default()
    });
    let api = ApiClient::from_config(&config)?;

    match cli.command {
        Command::Ping => {
            api.health().await?;
            println!("ok");
            Ok(())
        }
        Command::Count => {
            println!("{}", api.count_messages().await?);
            Ok(())
        }
        Command::Seed => {
            let inserted = api.seed().await?;
            print_json(&serde_json::json!({ "inserted": inserted }))
        }
        Command::Message(message) => run_message(&api, message.command).await,
        Command::Code(code) => run_code(&api, code.command).await,
        Command::Annotation(annotation) => run_annotation(&api, annotation.command).await,
        Command::Annotated(annotated) => run_annotated(&api, annotated.command).await,
        Command::Watch(args) => match args.kind {
            Kind::Message => watch::<Message>(api, &args).await,
            Kind::Code => watch::<Code>(api, &args).await,
            Kind::Annotation => watch::<Annotation>(api, &args).await,
            Kind::Annotated => watch::<AnnotationWithCode>(api, &args).await,
        },
    }
}

async fn run_message(api: &ApiClient, command: MessageSubcommand) -> Result<(), CliError> {
    match command {
        MessageSubcommand::List(args) => list::<Message>(api, args).await,
        MessageSubcommand::Get { id } => print_json(&api.get::<Message>(id).await?),
        MessageSubcommand::Create { content } => {
            print_json(&api.create::<Message>(&NewMessage { content }).await?)
        }
        MessageSubcommand::Update { id, content } => print_json(&api.update(&Message { id, content }).await?),
        MessageSubcommand::Delete { id } => delete::<Message>(api, id).await,
    }
}

async fn run_code(api: &ApiClient, command: CodeSubcommand) -> Result<(), CliError> {
    match command {
        CodeSubcommand::List(args) => list::<Code>(api, args).await,
        CodeSubcommand::Get { id } => print_json(&api.get::<Code>(id).await?),
        CodeSubcommand::Create { code } => print_json(&api.create::<Code>(&NewCode { code }).await?),
        CodeSubcommand::Update { id, code } => print_json(&api.update(&Code { id, code }).await?),
        CodeSubcommand::Delete { id } => delete::<Code>(api, id).await,
    }
}

async fn run_annotation(api: &ApiClient, command: AnnotationSubcommand) -> Result<(), CliError> {
    match command {
        AnnotationSubcommand::List(args) => list::<Annotation>(api, args).await,
        AnnotationSubcommand::Get { id } => print_json(&api.get::<Annotation>(id).await?),
        AnnotationSubcommand::Create(span) => {
            // Fetch the target first so the span is checked before submitting.
            let message = api.get::<Message>(span.message_id).await?;
            let draft = span.draft();
            let created = api.create_annotation(&message, &draft).await?;
            if let Some(text) = draft.covered(&message.content) {
                tracing::info!(id = created.id, covered = text, "annotation created");
            }
            print_json(&created)
        }
        AnnotationSubcommand::Update { id, span } => {
            let message = api.get::<Message>(span.message_id).await?;
            let draft = span.draft();
            draft.check_span(&message)?;
            print_json(&api.update(&Annotation::from_draft(id, draft)).await?)
        }
        AnnotationSubcommand::Delete { id } => delete::<Annotation>(api, id).await,
    }
}

async fn run_annotated(api: &ApiClient, command: AnnotatedSubcommand) -> Result<(), CliError> {
    match command {
        AnnotatedSubcommand::List(args) => list::<AnnotationWithCode>(api, args).await,
        AnnotatedSubcommand::Get { id } => print_json(&api.get::<AnnotationWithCode>(id).await?),
    }
}

async fn list<R: Resource>(api: &ApiClient, args: ListArgs) -> Result<(), CliError> {
    let query = args.into_query::<R>()?;
    let rows = api.list::<R>(&query).await?;
    print_json(&rows)
}

async fn delete<R: Writable>(api: &ApiClient, id: RecordId) -> Result<(), CliError> {
    api.delete::<R>(id).await?;
    print_json(&serde_json::json!({ "deleted": id }))
}

async fn watch<R: Resource>(api: ApiClient, args: &WatchArgs) -> Result<(), CliError> {
    let query = args.list.clone().into_query::<R>()?;
    let table = CrudTable::<R>::with_query(api, query);
    watch_until(&table, args, tokio::signal::ctrl_c()).await?;
    Ok(())
}

/// Refresh `table` on every tick until `stop` resolves or the change limit
/// is reached. Returns the number of printed changes.
async fn watch_until<R: Resource, S: Future>(
    table: &CrudTable<R>,
    args: &WatchArgs,
    stop: S,
) -> Result<usize, CliError> {
    let mut events = table.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    let mut last: Option<String> = None;
    let mut printed = 0_usize;
    // Polled across passes so a stop raised mid-refresh is not dropped.
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                if let Err(e) = table.refresh().await {
                    tracing::debug!(error = %e, "watch refresh failed");
                }
            }
        }

        while let Ok(event) = events.try_recv() {
            match event {
                TableEvent::Updated { generation, rows } => {
                    let rendered = serde_json::to_string(&rows[..])?;
                    if last.as_deref() == Some(rendered.as_str()) {
                        continue;
                    }
                    println!("# generation {generation}: {} row(s)", rows.len());
                    print_json(&rows[..])?;
                    last = Some(rendered);
                    printed += 1;
                }
                TableEvent::Failed { message } => {
                    tracing::warn!(error = %message, "watch refresh failed");
                }
            }
        }

        if args.changes.is_some_and(|limit| printed >= limit) {
            break;
        }
    }
    Ok(printed)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
