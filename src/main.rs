use std::path::Path;
use std::process;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use clusterforge::cli::{
    action_request, add_services, format_add_services, format_catalog_summary, format_layout, format_nodes,
    format_stages, plan_stages, solve_layout, solve_nodes, summarize_catalog, Cli, CommandError, CommandResult,
    Commands, OutputFormat,
};
use clusterforge::cluster::Cluster;
use clusterforge::config::{load_catalog_file, load_document};
use clusterforge::layout::ClusterCreateRequest;
use clusterforge::settings::load_settings;

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    match run(&cli) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> CommandResult<String> {
    let settings = load_settings(cli.config.as_deref())?;
    debug!("Using settings: {:?}", settings);

    match &cli.command {
        Commands::Validate(args) => {
            let catalog = load_catalog_file(&args.catalog)?;
            let summary = summarize_catalog(&catalog);
            info!("Catalog {} has {} services", args.catalog.display(), summary.services.len());
            render(cli.output, &summary, |s| format_catalog_summary(s, &args.catalog.display().to_string()))
        }

        Commands::Layout(args) => {
            let catalog = load_catalog_file(&args.catalog)?;
            let request: ClusterCreateRequest = load_document(&args.request)?;
            if args.nodes {
                let nodes = solve_nodes(&catalog, &settings, &request)?;
                render(cli.output, &nodes, |n| format_nodes(n))
            } else {
                let report = solve_layout(&catalog, &settings, &request)?;
                render(cli.output, &report, format_layout)
            }
        }

        Commands::Plan(args) => {
            let catalog = load_catalog_file(&args.catalog)?;
            let cluster = load_cluster(&args.cluster)?;
            let request = action_request(args.action, &args.services, &args.nodes);
            let stages = plan_stages(&catalog, &cluster, request, args.raw)?;
            info!("Planned {} for cluster {} in {} stages", args.action, cluster.id, stages.len());
            render(cli.output, &stages, |s| format_stages(s))
        }

        Commands::AddServices(args) => {
            let catalog = load_catalog_file(&args.catalog)?;
            let cluster = load_cluster(&args.cluster)?;
            let report = add_services(&catalog, &settings, &cluster, &args.services)?;
            render(cli.output, &report, format_add_services)
        }
    }
}

fn load_cluster(path: &Path) -> CommandResult<Cluster> {
    Ok(load_document(path)?)
}

fn render<T, F>(format: OutputFormat, value: &T, table: F) -> CommandResult<String>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Table => Ok(table(value)),
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map(|json| json + "\n")
            .map_err(CommandError::from),
    }
}
