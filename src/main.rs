use clap::{Args, Parser, Subcommand};
use dynamo_copy::{CopyConfig, DynamoCopy, Error, RandomSleeper, TableHandle};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "dynamo-copy", version, about, arg_required_else_help = true)]
struct AppArgs {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true, env = "DYNAMO_COPY_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copies DynamoDB records from a source to a target table
    CopyTable(CopyTableArgs),
}

#[derive(Debug, Args)]
struct CopyTableArgs {
    /// Table to read from
    source_table: String,

    /// Table to write into
    target_table: String,

    /// Profile to use for the source table
    #[arg(short, long, env = "DYNAMO_COPY_SOURCE_PROFILE")]
    source_profile: Option<String>,

    /// Profile to use for the target table
    #[arg(short, long, env = "DYNAMO_COPY_TARGET_PROFILE")]
    target_profile: Option<String>,

    /// IAM role to assume for the source table
    #[arg(long, env = "DYNAMO_COPY_SOURCE_ROLE_ARN")]
    source_role_arn: Option<String>,

    /// IAM role to assume for the target table
    #[arg(long, env = "DYNAMO_COPY_TARGET_ROLE_ARN")]
    target_role_arn: Option<String>,

    /// Read provisioned capacity held on the source table during the copy
    #[arg(short, long, default_value_t = 0, env = "DYNAMO_COPY_READ_UNITS")]
    read_units: i64,

    /// Write provisioned capacity held on the target table during the copy
    #[arg(short, long, default_value_t = 0, env = "DYNAMO_COPY_WRITE_UNITS")]
    write_units: i64,

    /// Number of parallel segment scans
    #[arg(long, default_value_t = 1, env = "DYNAMO_COPY_READ_WORKERS")]
    read_workers: usize,

    /// Number of parallel batch writers
    #[arg(long, default_value_t = 1, env = "DYNAMO_COPY_WRITE_WORKERS")]
    write_workers: usize,
}

#[tokio::main]
async fn main() {
    let args = AppArgs::parse();
    init_tracing(args.debug);

    if let Err(e) = main_impl(args.command).await {
        error!("copy-table error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "dynamo_copy=debug"
    } else {
        "dynamo_copy=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn main_impl(command: Command) -> Result<(), Error> {
    match command {
        Command::CopyTable(args) => copy_table(args).await,
    }
}

async fn copy_table(args: CopyTableArgs) -> Result<(), Error> {
    let source = dynamo_copy::dynamodb_backend(
        args.source_profile.as_deref(),
        args.source_role_arn.as_deref(),
    )
    .await;
    let target = dynamo_copy::dynamodb_backend(
        args.target_profile.as_deref(),
        args.target_role_arn.as_deref(),
    )
    .await;

    let config = CopyConfig::new(
        args.read_units,
        args.write_units,
        args.read_workers,
        args.write_workers,
    );

    DynamoCopy::new(
        config,
        TableHandle::new(Arc::new(source), args.source_table),
        TableHandle::new(Arc::new(target), args.target_table),
        Arc::new(RandomSleeper),
    )
    .run()
    .await
}
