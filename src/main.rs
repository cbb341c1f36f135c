use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wikiquery::admission::UserIdentity;
use wikiquery::backend::SocketBackend;
use wikiquery::config::SearchConfig;
use wikiquery::content::NullContentStore;
use wikiquery::error::SearchResult;
use wikiquery::namespace::{NamespaceSet, NamespaceTable};
use wikiquery::output;
use wikiquery::query::request::Sort;
use wikiquery::results::ResultSet;
use wikiquery::searcher::{Compiled, SearchOptions, Searcher};

#[derive(Parser)]
#[command(name = "wikiquery")]
#[command(about = "Compile and run wiki search queries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Search gateway socket
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = 20)]
    limit: usize,

    #[arg(long, global = true, default_value_t = 0)]
    offset: usize,

    /// Comma-separated namespace ids or names, or `all`
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// relevance, title_asc, title_desc, incoming_links_asc, incoming_links_desc or none
    #[arg(long, global = true, default_value = "relevance")]
    sort: Sort,

    /// Search as this logged-in user (anonymous otherwise)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled full-text request without running it
    Compile {
        #[arg(trailing_var_arg = true, required = true)]
        term: Vec<String>,
    },
    /// Full-text search
    Search {
        #[arg(trailing_var_arg = true, required = true)]
        term: Vec<String>,
    },
    /// Title prefix search
    Prefix {
        #[arg(trailing_var_arg = true)]
        term: Vec<String>,
    },
    /// Near-exact title search
    NearMatch {
        #[arg(trailing_var_arg = true, required = true)]
        term: Vec<String>,
    },
    /// Pages similar to the given pages
    MoreLike {
        /// Page ids
        #[arg(required = true)]
        page_ids: Vec<u64>,

        /// Only pages linked to a wikibase item
        #[arg(long)]
        only_wikibase: bool,
    },
    /// Check that the search gateway answers
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SearchConfig::load_from(path)?,
        None => SearchConfig::load()?,
    };
    let backend = match &cli.socket {
        Some(path) => SocketBackend::new(path),
        None => SocketBackend::default(),
    };
    let searcher = Searcher::new(Arc::new(config), Arc::new(NullContentStore), backend);
    let options = search_options(&cli, searcher.namespace_table())?;
    let color = !cli.no_color;

    match &cli.command {
        Commands::Compile { term } => {
            let compiled = searcher.compile_text(&term.join(" "), &options);
            let out = match compiled {
                Compiled::NoResultsPossible(warnings) => json!({
                    "no_results_possible": true,
                    "warnings": warnings,
                }),
                Compiled::Request(request) => json!({
                    "description": request.description(),
                    "indices": request.indices(),
                    "params": request.params(),
                    "body": request.body(),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Search { term } => {
            let result = searcher.compile_and_execute(&term.join(" "), &options).await;
            report(result, cli.json, color)?;
        }
        Commands::Prefix { term } => {
            let result = searcher.prefix_search(&term.join(" "), &options).await;
            report(result, cli.json, color)?;
        }
        Commands::NearMatch { term } => {
            let result = searcher.near_match_search(&term.join(" "), &options).await;
            report(result, cli.json, color)?;
        }
        Commands::MoreLike {
            page_ids,
            only_wikibase,
        } => {
            let result = searcher
                .more_like_these(page_ids, *only_wikibase, &options)
                .await;
            report(result, cli.json, color)?;
        }
        Commands::Ping => {
            searcher
                .ping()
                .await
                .with_context(|| format!("No answer on {}", searcher.backend().path().display()))?;
            println!("ok");
        }
    }

    Ok(())
}

fn search_options(cli: &Cli, table: &NamespaceTable) -> Result<SearchOptions> {
    let namespaces = cli
        .namespace
        .as_deref()
        .map(|spec| parse_namespaces(table, spec))
        .transpose()?;
    let user = match &cli.user {
        Some(name) => UserIdentity::LoggedIn(name.clone()),
        None => UserIdentity::default(),
    };

    Ok(SearchOptions {
        offset: cli.offset,
        limit: cli.limit,
        namespaces,
        sort: cli.sort,
        user,
        ..Default::default()
    })
}

fn parse_namespaces(table: &NamespaceTable, spec: &str) -> Result<NamespaceSet> {
    if spec.trim().eq_ignore_ascii_case("all") {
        return Ok(NamespaceSet::All);
    }
    let mut ids = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<i32>().ok().or_else(|| table.lookup(part)) {
            Some(id) => ids.push(id),
            None => bail!("Unknown namespace: {}", part),
        }
    }
    Ok(NamespaceSet::only(ids))
}

fn report(result: SearchResult<ResultSet>, as_json: bool, color: bool) -> Result<()> {
    match result {
        Ok(results) if as_json => println!("{}", serde_json::to_string_pretty(&results)?),
        Ok(results) => output::print_results(&results, color)?,
        Err(e) => {
            output::print_error(&e, color)?;
            std::process::exit(1);
        }
    }
    Ok(())
}
