//! mongowire - read a collection through a server-side cursor
//!
//! Connects to a MongoDB server over plaintext TCP or TLS, runs a `find`,
//! pulls the remaining batches with `getMore` and prints every document as
//! relaxed extended JSON, one per line.
//!
//! # Usage
//!
//! ```bash
//! mongowire shop.orders --filter '{"status": "open"}' --batch-size 500
//! mongowire shop.orders --host db.internal --tls --tls-ca-file ca.pem -n 10
//! ```

use std::sync::Arc;

use bson::{Bson, Document};
use tracing::{Level, debug, info, warn};

use mongowire::cli::CliInterface;
use mongowire::connection::{CommandExecutor, MongoConnection};
use mongowire::cursor::{BatchSource, CursorBatches, MongoCursor};
use mongowire::error::Result;
use mongowire::protocol::{FindCommand, Namespace};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Connect and read the requested namespace
/// 4. Close the connection, whatever the outcome of the read
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);

    if let Some(path) = cli.config_path() {
        debug!("Using configuration file {}", path.display());
    }

    let namespace = cli.namespace()?;
    let filter = cli.filter()?;

    let connection_config = &cli.config().connection;
    let connection = Arc::new(
        MongoConnection::connect(
            &connection_config.host,
            connection_config.port,
            connection_config.transport_config(),
        )
        .await?,
    );

    let result = read_namespace(&cli, Arc::clone(&connection), namespace, filter).await;

    if let Err(e) = connection.close().await {
        debug!("Closing connection to {} failed: {}", connection.address(), e);
    }
    result
}

/// Open a cursor on `namespace` and print its documents
async fn read_namespace(
    cli: &CliInterface,
    connection: Arc<MongoConnection>,
    namespace: Namespace,
    filter: Document,
) -> Result<()> {
    let cursor_config = &cli.config().cursor;

    let mut find = FindCommand::new(namespace.collection(), filter);
    find.batch_size = Some(cursor_config.batch_size);
    find.max_time_ms = cursor_config.max_time_ms;
    find.read_concern = cursor_config.read_concern();

    let reply = connection
        .execute(find.to_document()?, &namespace, None, None)
        .await?;

    let executor: Arc<dyn CommandExecutor> = connection;
    let mut cursor = MongoCursor::from_reply(reply, namespace, executor, None, None, None)?;
    cursor.set_max_time_ms(cursor_config.max_time_ms);
    cursor.set_read_concern(cursor_config.read_concern());

    let mut batches = CursorBatches::new(cursor, cursor_config.batch_size);
    let limit = cli.args().limit;

    // Ctrl+C stops the read but still releases the server cursor
    let drained = tokio::select! {
        result = print_batches(&mut batches, limit) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, closing cursor");
            Ok(())
        }
    };

    info!("Fetched {} documents", batches.total_fetched());
    let closed = batches.close().await;
    drained.and(closed)
}

/// Print documents batch by batch until the cursor is exhausted or `limit`
/// documents were printed
async fn print_batches(batches: &mut CursorBatches, limit: Option<u64>) -> Result<()> {
    let mut printed = 0u64;
    let reached = |printed: u64| limit.is_some_and(|limit| printed >= limit);

    while !reached(printed) {
        let Some(batch) = batches.next_batch().await? else {
            return Ok(());
        };
        for document in batch {
            if reached(printed) {
                break;
            }
            println!("{}", Bson::Document(document).into_relaxed_extjson());
            printed += 1;
        }
    }

    debug!("Limit of {} documents reached", printed);
    Ok(())
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level = if cli.args().very_verbose {
        Level::TRACE
    } else if cli.args().verbose {
        Level::DEBUG
    } else {
        cli.config().logging.level.to_tracing_level()
    };

    // Logs go to stderr so stdout stays pure JSON
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    // Configure timestamps
    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
