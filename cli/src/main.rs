use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{arg, ArgAction, ArgMatches, Command};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use revpop_ws_client::{ApiRegistry, Manager, ManagerConfig};
use revpop_ws_core::types::ProbeResult;
use revpop_ws_env::{default_fallbacks, parse_with_default_node, Config};
use revpop_ws_transport::WsConnector;

fn cli() -> Command {
    Command::new("revpop-ws")
        .about("Command line tools for RevPop node connections")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(arg!(-c --config <CONFIG> "The path to config file"))
        .arg(arg!(-u --url <URL> "Primary node, or one of mainnet, testnet, local"))
        .arg(arg!(-f --fallback <URL> "Fallback node, may be repeated").action(ArgAction::Append))
        .arg(arg!(-t --timeout <MS> "Connect timeout in milliseconds"))
        .arg(arg!(--"auto-fallback" "Reconnect to a fallback node when the connection drops"))
        .subcommand(Command::new("connect").about("Connect and print the handshake"))
        .subcommand(Command::new("check").about("Measure the latency of every node"))
        .subcommand(
            Command::new("exec")
                .about("Call an api method")
                .arg(arg!(<NAMESPACE> "The api namespace, e.g. database"))
                .arg(arg!(<METHOD> "The method name"))
                .arg(arg!([PARAMS] "The params as a JSON array").default_value("[]"))
                .arg_required_else_help(true),
        )
}

async fn manager_config(matches: &ArgMatches) -> anyhow::Result<ManagerConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let path = PathBuf::from(path);
            let config = Config::from_path(&path).await?;
            match config.connection {
                Some(ref conn) => Some(ManagerConfig::try_from(conn)?),
                None => bail!("Missing [connection] in {}", path.display()),
            }
        }
        None => None,
    };

    if let Some(url) = matches.get_one::<String>("url") {
        let base = config.take().unwrap_or_else(|| {
            ManagerConfig::new(parse_with_default_node(url)).with_fallbacks(default_fallbacks(url))
        });
        config = Some(ManagerConfig {
            url: parse_with_default_node(url).to_owned(),
            ..base
        });
    }
    let Some(mut config) = config else {
        bail!("Either --config or --url is required");
    };

    let fallbacks: Vec<String> = matches
        .get_many::<String>("fallback")
        .map(|urls| urls.map(|u| parse_with_default_node(u).to_owned()).collect())
        .unwrap_or_default();
    if !fallbacks.is_empty() {
        config = config.with_fallbacks(fallbacks);
    }
    if let Some(ms) = matches.get_one::<String>("timeout") {
        let ms: u64 = ms.parse().context("Invalid timeout")?;
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }
    if matches.get_flag("auto-fallback") {
        config = config.with_auto_fallback(true);
    }
    Ok(config)
}

async fn connect(config: ManagerConfig) -> anyhow::Result<()> {
    let registry = ApiRegistry::global();
    let api = registry.instance_with_config(Some(config), false).await?;
    let handshake = api.connect_with_fallback().await?;
    println!("Node:      {}", api.manager().url().await);
    println!("Chain id:  {}", handshake.chain_id);
    println!(
        "Network:   {}",
        handshake.network_name.as_deref().unwrap_or("unknown")
    );
    println!(
        "Apis:      {}",
        handshake.apis.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("Prefix:    {}", api.chain_config().address_prefix);
    registry.close().await;
    Ok(())
}

async fn check(config: ManagerConfig) -> anyhow::Result<()> {
    let manager = Manager::new(config, Arc::new(WsConnector::default()));
    let report = manager.check_connections().await;
    for (url, latency) in report.ranked() {
        println!("{:>8} ms  {}", latency.as_millis(), url);
    }
    for (url, result) in report.iter() {
        if let ProbeResult::Failed(e) = result {
            println!("{:>11}  {} ({})", "failed", url, e);
        }
    }
    if report.ranked().is_empty() {
        bail!("No node is reachable");
    }
    Ok(())
}

async fn exec(config: ManagerConfig, namespace: &str, method: &str, params: &str) -> anyhow::Result<()> {
    let params: Vec<Value> = serde_json::from_str(params).context("Params must be a JSON array")?;
    let registry = ApiRegistry::global();
    let api = registry.instance_with_config(Some(config), false).await?;
    api.connect_with_fallback().await?;
    info!("Exec {}.{} on {}", namespace, method, api.manager().url().await);
    let res = api.exec(namespace, method, params).await;
    registry.close().await;
    println!("{}", serde_json::to_string_pretty(&res?)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = cli().get_matches();
    let config = manager_config(&matches).await?;

    match matches.subcommand() {
        Some(("connect", _)) => connect(config).await,
        Some(("check", _)) => check(config).await,
        Some(("exec", sub_matches)) => {
            let namespace = sub_matches.get_one::<String>("NAMESPACE").expect("required");
            let method = sub_matches.get_one::<String>("METHOD").expect("required");
            let params = sub_matches.get_one::<String>("PARAMS").expect("default");
            exec(config, namespace, method, params).await
        }
        _ => unreachable!(),
    }
}
