// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use dispatchdesk_app::demo::{CustomerDirectory, trip_store};
use dispatchdesk_app::{OptionSource, PersonalizationStore, ScopeKey};
use dispatchdesk_db::Store;
use dispatchdesk_remote::{Endpoint, OptionClient, RowUpdateClient};
use dispatchdesk_tui::{ScreenSettings, ScreenState};
use runtime::DeskRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DISPATCHDESK_LOG";
const SCREEN: &str = "trips";
const COMPONENT: &str = "grid";
const OPTION_SOURCE: &str = "customers";
const ROW_RESOURCE: &str = "trips";
const DEMO_TRIPS: usize = 60;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `dispatchdesk --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;
    init_logging(options.log_stderr)?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or DISPATCHDESK_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;

    let settings = ScreenSettings {
        selection: config.selection_mode()?,
        blur: config.blur_policy()?,
        fetch: config.fetch_settings()?,
    };

    let (option_source, row_updates) = if config.remote_enabled() {
        let endpoint = Endpoint::new(config.remote_base_url(), config.remote_timeout()?)
            .with_context(|| {
                format!(
                    "invalid [remote] config in {}; fix base_url/timeout values",
                    options.config_path.display()
                )
            })?;
        let source: Arc<dyn OptionSource> =
            Arc::new(OptionClient::new(endpoint.clone(), OPTION_SOURCE)?);
        (source, Some(RowUpdateClient::new(endpoint, ROW_RESOURCE)))
    } else {
        let source: Arc<dyn OptionSource> = Arc::new(CustomerDirectory::new());
        (source, None)
    };
    if options.check_only {
        return Ok(());
    }

    let scope = ScopeKey::new(config.user_name(), SCREEN, COMPONENT);
    let mut personalization = PersonalizationStore::new(store);
    let document = personalization.load(&scope);
    tracing::info!(
        scope = %scope,
        personalized = document.is_some(),
        remote = config.remote_enabled(),
        "opening trips screen"
    );

    let mut state = ScreenState::new(
        "Trips",
        trip_store(DEMO_TRIPS),
        settings,
        document.as_ref(),
    );
    let mut runtime = DeskRuntime::new(personalization, scope, option_source, row_updates);
    dispatchdesk_tui::run_app(&mut state, &mut runtime)
}

fn init_logging(to_stderr: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if to_stderr {
        builder.with_writer(io::stderr).try_init()
    } else {
        let path = log_path()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
    };
    installed.map_err(|error| anyhow!("install logger: {error}"))
}

fn log_path() -> Result<PathBuf> {
    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; run with --log-stderr to log to the terminal")
    })?;
    let app_dir = data_root.join(dispatchdesk_db::APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("dispatchdesk.log"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    log_stderr: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        log_stderr: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--log-stderr" => {
                options.log_stderr = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("dispatchdesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Keep personalization in memory only");
    println!("  --check                  Validate config, database and remote settings");
    println!("  --log-stderr             Log to stderr instead of the log file");
    println!("  --help                   Show this help");
    println!();
    println!("Set {LOG_ENV} (for example {LOG_ENV}=debug) to change log verbosity.");
}
