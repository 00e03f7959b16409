use bolt_config::config::{self, get_config, CONFIG_PATH};
use bolt_core::{error::BoltError, BoltResult};
use bolt_dl::http_client::configure_http_client;
use bolt_utils::path::resolve_path;
use build::{build_package, list_dependencies, BuildOptions};
use clap::Parser;
use cli::{Args, Commands};
use fetch::{fetch, print_tag};
use index::update_index;
use logging::setup_logging;
use tracing::debug;
use ureq::Proxy;
use utils::COLOR;

mod build;
mod cli;
mod fetch;
mod index;
mod logging;
mod progress;
mod utils;

fn handle_cli() -> BoltResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        let mut color = COLOR.write().unwrap();
        *color = false;
    }

    if let Some(ref c) = args.config {
        let mut config_path = CONFIG_PATH.write().unwrap();
        *config_path = resolve_path(c)?;
    }

    config::init()?;
    let config = get_config();

    let proxy = match args.proxy.as_deref() {
        Some(proxy) => {
            Some(Proxy::new(proxy).map_err(|err| {
                BoltError::Custom(format!("invalid proxy '{proxy}': {err}"))
            })?)
        }
        None => None,
    };
    let user_agent = args.user_agent.clone().or_else(|| config.user_agent.clone());

    configure_http_client(|client| {
        if proxy.is_some() {
            client.proxy = proxy;
        }

        if let Some(user_agent) = user_agent {
            client.user_agent = Some(user_agent);
        }
    });

    debug!("using config {}", CONFIG_PATH.read().unwrap().display());

    match args.command {
        Commands::Build {
            descriptor,
            work_dir,
            stage,
            skip_unpack,
            skip_patch,
        } => {
            build_package(
                &descriptor,
                BuildOptions {
                    work_dir,
                    stages: stage,
                    skip_unpack,
                    skip_patch,
                },
            )?;
        }
        Commands::Deps {
            descriptor,
        } => list_dependencies(&descriptor)?,
        Commands::Index {
            repo,
            force_full,
        } => update_index(&repo, force_full)?,
        Commands::Fetch {
            url,
            output,
            sha256,
        } => fetch(&url, output.as_deref(), sha256, args.quiet)?,
        Commands::Tag {
            url,
        } => print_tag(&url)?,
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
