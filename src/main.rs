use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};
use orange_streams::addons::aggregator::{AddonOutcome, StreamReport};
use orange_streams::cli::{CliConfig, CliPlugins};
use orange_streams::core::events::EngineEvent;
use orange_streams::core::model::{AddonAuth, AddonDescriptor, AuthKind, ContentType};
use orange_streams::i18n::{get_messages, Locale, Messages};
use orange_streams::{Engine, EngineOptions};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

fn title_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("id")
            .help("Canonical title id, e.g. tt0111161 or tt0944947:1:2")
            .required(true)
            .num_args(1),
    )
    .arg(
        Arg::new("type")
            .long("type")
            .short('t')
            .help("Content type: movie, series, anime, channel, tv")
            .default_value("movie")
            .num_args(1),
    )
}

fn build_cli(plugins: &CliPlugins) -> Command {
    let add = Command::new("add")
        .about("Register an addon from its manifest URL (or refresh it)")
        .arg(Arg::new("manifest_url").help("Manifest URL").required(true).num_args(1))
        .arg(
            Arg::new("auth_bearer")
                .long("auth-bearer")
                .help("Send this key as `Authorization: Bearer <key>`")
                .num_args(1),
        )
        .arg(
            Arg::new("auth_query")
                .long("auth-query")
                .help("Send this key as the `api_key` query parameter")
                .conflicts_with("auth_bearer")
                .num_args(1),
        );
    let test = Command::new("test")
        .about("Fetch and check a manifest without registering it")
        .arg(Arg::new("manifest_url").help("Manifest URL").required(true).num_args(1));

    let addon = Command::new("addon")
        .about("Manage streaming addons")
        .subcommand_required(true)
        .subcommand(plugins.augment_command(add))
        .subcommand(plugins.augment_command(test))
        .subcommand(Command::new("list").about("List registered addons"))
        .subcommand(
            Command::new("remove")
                .about("Unregister an addon")
                .arg(Arg::new("id").help("Addon id").required(true).num_args(1)),
        );

    let streams = title_args(Command::new("streams").about("List ranked streams for a title")).arg(
        Arg::new("limit")
            .long("limit")
            .help("Show at most this many streams")
            .default_value("25")
            .num_args(1),
    );

    let play = title_args(Command::new("play").about("Resolve a stream of a title to a playable URL")).arg(
        Arg::new("pick")
            .long("pick")
            .help("1-based position in the ranked stream list")
            .default_value("1")
            .num_args(1),
    );

    let debrid = Command::new("debrid")
        .about("Configure the debrid service used for torrent streams")
        .subcommand_required(true)
        .subcommand(plugins.augment_command(Command::new("set").about("Store debrid settings")))
        .subcommand(Command::new("show").about("Show stored debrid settings"));

    Command::new("OrangeStreams")
        .about("Addon-based stream finder with debrid link resolution")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("data_dir")
                .long("data-dir")
                .help("Directory holding the addon and settings store")
                .default_value("./orange-streams")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("locale")
                .long("locale")
                .help("Message language: en or zh")
                .default_value("en")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log debug output to stderr (RUST_LOG overrides)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(addon)
        .subcommand(plugins.augment_command(streams))
        .subcommand(plugins.augment_command(play))
        .subcommand(debrid)
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// Innermost subcommand and its matches.
fn leaf(matches: &ArgMatches) -> (&str, &ArgMatches) {
    let mut name = "";
    let mut current = matches;
    while let Some((n, sub)) = current.subcommand() {
        name = n;
        current = sub;
    }
    (name, current)
}

fn arg<'a>(m: &'a ArgMatches, id: &str) -> anyhow::Result<&'a str> {
    m.get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing argument `{}`", id))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let plugins = CliPlugins::with_defaults();
    let matches = build_cli(&plugins).get_matches();

    init_tracing(matches.get_count("verbose"));
    let msgs = get_messages(Locale::from_str(arg(&matches, "locale")?));
    let data_dir = PathBuf::from(arg(&matches, "data_dir")?);

    let (leaf_name, leaf_matches) = leaf(&matches);
    let mut cfg = CliConfig::default();
    plugins.apply_matches(leaf_name, leaf_matches, &mut cfg)?;

    let opts = EngineOptions { http: cfg.http.clone(), ..EngineOptions::default() };
    let engine = Engine::open(&data_dir, opts)
        .await
        .with_context(|| format!("open store in {}", data_dir.display()))?;

    match matches.subcommand() {
        Some(("addon", m)) => run_addon(&engine, m, msgs).await,
        Some(("streams", m)) => run_streams(&engine, m, msgs).await,
        Some(("play", m)) => run_play(&engine, m, &cfg, msgs).await,
        Some(("debrid", m)) => run_debrid(&engine, m, &cfg, msgs).await,
        _ => Ok(()),
    }
}

async fn run_addon(engine: &Engine, m: &ArgMatches, msgs: &Messages) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let auth = match (sub.get_one::<String>("auth_bearer"), sub.get_one::<String>("auth_query")) {
                (Some(key), _) => Some(AddonAuth { kind: AuthKind::HeaderBearer, key: key.clone() }),
                (None, Some(key)) => Some(AddonAuth { kind: AuthKind::QueryParam, key: key.clone() }),
                (None, None) => None,
            };
            let added = engine.add_or_update_addon(arg(sub, "manifest_url")?, auth).await?;
            println!("{}: {}", msgs.addon_added, describe(&added));
        }
        Some(("test", sub)) => {
            let probe = engine.test_addon(arg(sub, "manifest_url")?).await?;
            println!("{}", describe(&probe.descriptor));
            let caps = &probe.capabilities;
            println!(
                "  stream={} catalog={} meta={} subtitles={}",
                caps.can_stream, caps.can_search, caps.can_provide_metadata, caps.can_provide_subtitles
            );
            if probe.problems.is_empty() {
                println!("{}", msgs.probe_ok);
            } else {
                println!("{}:", msgs.probe_problems);
                for p in &probe.problems {
                    println!("  - {}", p);
                }
            }
        }
        Some(("list", _)) => {
            let addons = engine.list_addons().await?;
            if addons.is_empty() {
                println!("{}", msgs.no_addons);
                return Ok(());
            }
            println!("{}:", msgs.addons_header);
            for a in &addons {
                println!("- {}", describe(a));
                println!("  {}", a.manifest_url);
            }
        }
        Some(("remove", sub)) => {
            let id = arg(sub, "id")?;
            if engine.remove_addon(id).await? {
                println!("{}: {}", msgs.addon_removed, id);
            } else {
                println!("{}: {}", msgs.addon_not_found, id);
            }
        }
        _ => {}
    }
    Ok(())
}

fn describe(a: &AddonDescriptor) -> String {
    let resources: Vec<&str> = a.resources.iter().map(|r| r.as_str()).collect();
    let types: Vec<&str> = a.supported_types.iter().map(|t| t.as_str()).collect();
    format!(
        "{} ({}) v{} [{}] {{{}}}",
        a.name,
        a.id,
        a.version,
        resources.join(","),
        types.join(",")
    )
}

fn content_type(m: &ArgMatches) -> anyhow::Result<ContentType> {
    Ok(ContentType::parse(arg(m, "type")?))
}

async fn run_streams(engine: &Engine, m: &ArgMatches, msgs: &Messages) -> anyhow::Result<()> {
    let limit: usize = arg(m, "limit")?.parse().context("--limit")?;
    let report = engine.fetch_streams(arg(m, "id")?, content_type(m)?).await?;
    print_report(&report, limit, msgs);
    Ok(())
}

fn print_report(report: &StreamReport, limit: usize, msgs: &Messages) {
    for outcome in &report.outcomes {
        match outcome {
            AddonOutcome::Failed { addon_id, error } => {
                eprintln!("[{}] {} {}: {}", msgs.info_prefix, addon_id, msgs.addon_failed, error)
            }
            AddonOutcome::Skipped { addon_id, reason } => {
                eprintln!("[{}] {} {}: {}", msgs.info_prefix, addon_id, msgs.addon_skipped, reason)
            }
            AddonOutcome::Streams { .. } => {}
        }
    }

    if report.candidates.is_empty() {
        println!("{}", msgs.no_streams);
        return;
    }
    println!("{} ({}):", msgs.streams_header, report.candidates.len());
    for (i, c) in report.candidates.iter().take(limit).enumerate() {
        let title = c.title.lines().next().unwrap_or_default();
        let size = if c.size_label.is_empty() { "-" } else { c.size_label.as_str() };
        let seeds = c.seeds.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        let kind = if c.is_torrent() { "torrent" } else { "http" };
        println!(
            "{:>3}. [{:<7}] {} | {} | seeds {} | {} | {}",
            i + 1,
            c.quality.label(),
            title,
            size,
            seeds,
            kind,
            c.source_addon_name
        );
    }
}

async fn run_play(engine: &Engine, m: &ArgMatches, cfg: &CliConfig, msgs: &Messages) -> anyhow::Result<()> {
    let pick: usize = arg(m, "pick")?.parse().context("--pick")?;
    let report = engine.fetch_streams(arg(m, "id")?, content_type(m)?).await?;
    let candidate = pick
        .checked_sub(1)
        .and_then(|i| report.candidates.get(i))
        .ok_or_else(|| anyhow::anyhow!("{}: {} ({} available)", msgs.pick_out_of_range, pick, report.candidates.len()))?;

    let mut debrid = engine.load_debrid_config().await?;
    cfg.debrid.apply(&mut debrid);

    if candidate.is_torrent() && !debrid.is_configured() {
        if let Some(magnet) = candidate.magnet_uri() {
            println!("{}", msgs.magnet_hint);
            println!("{}", magnet);
            return Ok(());
        }
    }

    let pb = if candidate.is_torrent() {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")?.tick_chars("|/-\\ "));
        pb.set_prefix(format!("[{} {}]", msgs.resolving, debrid.service));
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let ui_task = pb.clone().map(|spinner| {
        let mut rx = engine.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(EngineEvent::DebridStatusChanged { status, attempt, .. }) => {
                        spinner.set_message(format!("{} (#{})", status, attempt));
                    }
                    Ok(EngineEvent::Error { scope, message }) => {
                        spinner.println(format!("[ERR] {}: {}", scope, message));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let result = engine.resolve_to_playable_url(candidate, &debrid).await;
    if let Some(task) = ui_task {
        task.abort();
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let url = result?;
    println!("{}: {}", msgs.playable_url, url);
    Ok(())
}

async fn run_debrid(engine: &Engine, m: &ArgMatches, cfg: &CliConfig, msgs: &Messages) -> anyhow::Result<()> {
    let mut stored = engine.load_debrid_config().await?;
    match m.subcommand() {
        Some(("set", _)) => {
            if cfg.debrid.is_empty() {
                anyhow::bail!("nothing to change; pass --debrid-service and/or --debrid-key");
            }
            cfg.debrid.apply(&mut stored);
            engine.save_debrid_config(&stored).await?;
            println!("{}: {}", msgs.debrid_saved, stored.service);
        }
        Some(("show", _)) => {
            if !stored.is_configured() {
                println!("{}", msgs.debrid_none);
                return Ok(());
            }
            let key = if stored.api_key.is_empty() { "(missing)".to_string() } else { mask(&stored.api_key) };
            println!("service: {}", stored.service);
            println!("api key: {}", key);
            println!("poll interval: {} ms, max polls: {}", stored.poll_interval_ms, stored.max_attempts);
        }
        _ => {}
    }
    Ok(())
}

fn mask(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}
