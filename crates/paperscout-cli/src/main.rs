use std::io::Write;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use paperscout_api::LibraryClient;
use paperscout_core::{
    Applied, ControllerUpdate, QuerySettings, SessionController, SessionOutcome,
};

mod config_file;
mod output;

use output::ColorMode;

const DEFAULT_SERVER: &str = "http://localhost:5000";

/// Paperscout - Personalized arXiv paper recommendations from your Zotero library
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Base URL of the recommendation service
    #[arg(long)]
    server: Option<String>,

    /// Zotero user ID
    #[arg(long)]
    zotero_id: Option<String>,

    /// Zotero API key
    #[arg(long)]
    zotero_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a recommendation session and print the ranked papers
    Recommend {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Comma-separated arXiv categories (default: cs.AI,cs.CV,cs.LG,cs.CL)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,

        /// Start of the publication date range (YYYY-MM-DD, requires --date-end)
        #[arg(long)]
        date_start: Option<String>,

        /// End of the publication date range (YYYY-MM-DD, requires --date-start)
        #[arg(long)]
        date_end: Option<String>,

        /// Comma-separated Zotero item keys to use as references (default: all)
        #[arg(long, value_delimiter = ',')]
        paper_keys: Vec<String>,

        /// Bypass the server-side result cache
        #[arg(long)]
        force_refresh: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// List the saved papers in your Zotero library
    Papers {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Show only this collection
        #[arg(long)]
        collection: Option<String>,

        /// Group the listing by collection
        #[arg(long)]
        by_collection: bool,

        /// List collection names only
        #[arg(long)]
        collections: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Force the server to re-fetch your library from Zotero
    RefreshCache {
        #[command(flatten)]
        connect: ConnectArgs,
    },

    /// Drop the server-side library cache
    ClearCache {
        #[command(flatten)]
        connect: ConnectArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Recommend {
            connect,
            categories,
            date_start,
            date_end,
            paper_keys,
            force_refresh,
            no_color,
        } => {
            recommend(
                connect,
                categories,
                date_start,
                date_end,
                paper_keys,
                force_refresh,
                no_color,
            )
            .await
        }
        Command::Papers {
            connect,
            collection,
            by_collection,
            collections,
            no_color,
        } => papers(connect, collection, by_collection, collections, no_color).await,
        Command::RefreshCache { connect } => {
            let client = login(connect).await?;
            let message = client.refresh_library_cache().await?;
            println!("{}", message);
            Ok(())
        }
        Command::ClearCache { connect } => {
            let client = login(connect).await?;
            let message = client.clear_library_cache().await?;
            println!("{}", message);
            Ok(())
        }
    }
}

/// Build a client and log in. Resolution order for every value:
/// CLI flags > env vars > config file > defaults.
async fn login(connect: ConnectArgs) -> anyhow::Result<LibraryClient> {
    let config = config_file::load_config();

    let server = connect
        .server
        .or_else(|| std::env::var("PAPERSCOUT_SERVER").ok())
        .or_else(|| {
            config
                .server
                .as_ref()
                .and_then(|s| s.base_url.clone())
        })
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let zotero_id = connect
        .zotero_id
        .or_else(|| std::env::var("ZOTERO_ID").ok())
        .or_else(|| {
            config
                .credentials
                .as_ref()
                .and_then(|c| c.zotero_id.clone())
        });
    let zotero_key = connect
        .zotero_key
        .or_else(|| std::env::var("ZOTERO_KEY").ok())
        .or_else(|| {
            config
                .credentials
                .as_ref()
                .and_then(|c| c.zotero_key.clone())
        });

    let (zotero_id, zotero_key) = match (zotero_id, zotero_key) {
        (Some(id), Some(key)) => (id, key),
        _ => anyhow::bail!(
            "Zotero credentials not configured. Pass --zotero-id/--zotero-key, \
             set ZOTERO_ID/ZOTERO_KEY, or add a [credentials] section to {}",
            config_file::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string())
        ),
    };

    let client = LibraryClient::new(&server)?;
    client.login(&zotero_id, &zotero_key).await?;
    Ok(client)
}

#[allow(clippy::too_many_arguments)]
async fn recommend(
    connect: ConnectArgs,
    categories: Vec<String>,
    date_start: Option<String>,
    date_end: Option<String>,
    paper_keys: Vec<String>,
    force_refresh: bool,
    no_color: bool,
) -> anyhow::Result<()> {
    let config = config_file::load_config();
    let client = login(connect).await?;
    let color = ColorMode(!no_color);

    let mut settings = QuerySettings::default();
    let categories = if categories.is_empty() {
        config
            .query
            .as_ref()
            .and_then(|q| q.categories.clone())
            .unwrap_or_default()
    } else {
        categories
    };
    if !categories.is_empty() {
        settings.set_categories(categories);
    }

    let date_start = date_start.or_else(|| {
        config
            .query
            .as_ref()
            .and_then(|q| q.date_start.clone())
    });
    let date_end = date_end.or_else(|| {
        config
            .query
            .as_ref()
            .and_then(|q| q.date_end.clone())
    });
    if let (Some(start), Some(end)) = (&date_start, &date_end) {
        settings.set_date_range(start, end);
        if settings.date_range().is_none() {
            anyhow::bail!("Invalid date range: expected YYYY-MM-DD,YYYY-MM-DD");
        }
    } else if date_start.is_some() || date_end.is_some() {
        anyhow::bail!("--date-start and --date-end must be given together");
    }

    if !paper_keys.is_empty() {
        // The sentinel collapse needs the library size.
        let library = client.papers().await?;
        settings.set_selected_keys(paper_keys, library.papers.len());
    }

    let transport = Arc::new(client.sse_transport());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut controller = SessionController::new(transport, tx);

    let bar = indicatif::ProgressBar::new(100);
    bar.set_style(
        indicatif::ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/dim}] {percent}% {msg}",
        )
        .unwrap()
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar.set_message("正在连接...");

    if force_refresh {
        controller.refresh(&settings)?;
    } else {
        match controller.apply_settings(&settings)? {
            Applied::Started(_) => {}
            Applied::Unchanged => unreachable!("fresh controller has no prior fingerprint"),
        }
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let result = loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                controller.leave_view();
                bar.abandon_with_message("已取消");
                return Ok(());
            }
            event = rx.recv() => event,
        };
        let Some(event) = event else {
            anyhow::bail!("session ended without a result");
        };
        match controller.handle_event(event) {
            Some(ControllerUpdate::Progress(snapshot)) => {
                bar.set_position(snapshot.percent as u64);
                let line = if snapshot.stats_line.is_empty() {
                    snapshot.message
                } else {
                    snapshot.stats_line
                };
                bar.set_message(line);
            }
            Some(ControllerUpdate::Finished(result)) => break result,
            None => {}
        }
    };
    bar.finish_and_clear();

    let mut stdout = std::io::stdout();
    match result {
        Ok(SessionOutcome::Ranked {
            papers,
            reference_count,
            cached,
        }) => {
            output::print_recommendations(&mut stdout, &papers, reference_count, cached, color)?;
        }
        Ok(SessionOutcome::Empty { message }) => {
            output::print_empty_outcome(&mut stdout, &message, color)?;
        }
        Err(err) => anyhow::bail!("{}", err),
    }
    stdout.flush()?;
    Ok(())
}

async fn papers(
    connect: ConnectArgs,
    collection: Option<String>,
    by_collection: bool,
    collections: bool,
    no_color: bool,
) -> anyhow::Result<()> {
    let client = login(connect).await?;
    let color = ColorMode(!no_color);
    let mut stdout = std::io::stdout();

    if collections {
        for name in client.collections().await? {
            writeln!(stdout, "{}", name)?;
        }
        return Ok(());
    }

    let library = client.papers().await?;
    output::print_library(
        &mut stdout,
        &library,
        collection.as_deref(),
        by_collection,
        color,
    )?;
    Ok(())
}
