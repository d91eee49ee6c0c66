use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use scenelink_core::{BridgeConfig, Script, Session};
use scenelink_sandbox::CsgrsEvaluator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("scenelink")
        .version(scenelink_core::VERSION)
        .about("Host <-> sandbox bridge for interactive 3D scenes")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Replay a JSON command script against an in-process sandbox")
                .arg(
                    Arg::new("script")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the script"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration as TOML"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));
    let config = load_config(matches.get_one::<PathBuf>("config"))?;

    match matches.subcommand() {
        Some(("run", args)) => {
            let path = args
                .get_one::<PathBuf>("script")
                .context("missing script path")?;
            let script = Script::load(path)?;
            tracing::info!(steps = script.len(), script = %path.display(), "running script");

            let session = Session::connect(&config, Arc::new(CsgrsEvaluator))?;
            let outcome = script.run(&session).await;
            session.teardown().await;

            let reports = outcome?;
            let failed = reports.iter().filter(|r| !r.success).count();
            for report in &reports {
                println!("{}", serde_json::to_string(report)?);
            }
            tracing::info!(steps = reports.len(), failed, "script finished");

            if failed > 0 {
                std::process::exit(1);
            }
        }
        Some(("config", _)) => {
            print!("{}", config.to_toml_string()?);
        }
        _ => unreachable!("clap requires a subcommand"),
    }
    Ok(())
}
