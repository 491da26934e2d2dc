//! Shipwright CLI - run the native build of a package through CMake

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shipwright::core::errors::ShimError;
use shipwright::core::platform::Platform;
use shipwright::ops::{partition, setup, SetupContext, SetupOptions};
use shipwright::util::args::extract_options;
use shipwright::util::diagnostic::emit;
use shipwright::util::process::SystemExecutor;
use shipwright::util::{GlobalContext, Shell};

mod cli;

use cli::Cli;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if let Some(err) = e.downcast_ref::<ShimError>() {
                emit(&err.to_diagnostic(), std::io::stderr().is_terminal());
                std::process::exit(err.exit_code());
            }
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = partition(&argv)?;

    // Shim options travel in the packaging group.
    let (shim_args, packaging) = extract_options(&args.packaging, Cli::SPECS);
    args.packaging = packaging;

    let program = args.program.clone().unwrap_or_else(|| "shipwright".to_string());
    let cli = match Cli::try_parse_from(std::iter::once(program).chain(shim_args)) {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            e.print()?;
            return Ok(0);
        }
        Err(e) => {
            let message = e.to_string();
            return Err(ShimError::usage(message.trim_start_matches("error: ").trim()).into());
        }
    };

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("shipwright=debug")
        } else {
            EnvFilter::new("shipwright=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let shell = Shell::from_flags(cli.quiet, cli.verbose, false);
    let gctx = match &cli.manifest_path {
        Some(path) => GlobalContext::from_manifest_path(path)?,
        None => GlobalContext::new()?,
    };

    let executor = SystemExecutor;
    let ctx = SetupContext {
        gctx: &gctx,
        shell: &shell,
        executor: &executor,
        platform: Platform::current(&gctx)?,
    };
    let opts = SetupOptions {
        args,
        skip_cmake: cli.skip_cmake,
        force_cmake: cli.force_cmake,
        plat_name: cli.plat_name,
        hide_listing: cli.hide_listing,
        keep_probe: cli.keep_probe,
    };

    let plan = setup(&ctx, &opts)?;
    let json = serde_json::to_string_pretty(&plan).context("failed to serialize setup plan")?;

    match &cli.plan {
        Some(path) => std::fs::write(path, format!("{}\n", json))
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    Ok(0)
}
