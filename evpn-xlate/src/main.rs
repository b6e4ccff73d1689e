// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use slog::info;
use strum::IntoEnumIterator;
use structopt::StructOpt;

use common::logging::LogFormat;
use evpn_xlate::config::Config;
use evpn_xlate::events::load_events;
use evpn_xlate::events::Outcome;
use evpn_xlate::events::Replay;
use evpn_xlate::table::TableType;
use evpn_xlate::Translator;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "evpn-xlate",
    about = "translate EVPN gateway objects into pipeline table operations"
)]
struct Opt {
    #[structopt(
        long,
        about = "send log data to the named file rather than stdout"
    )]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        about = "log format",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: Option<LogFormat>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// List every pipeline table the translators program.
    Tables,
    /// Print the static entries programmed at startup.
    Static {
        #[structopt(long, short = "c", parse(from_os_str))]
        config: PathBuf,
        /// Print the operations removing the entries instead.
        #[structopt(long)]
        teardown: bool,
    },
    /// Replay a json array of object adds and deletes against an in-memory
    /// model of the tables.
    Replay {
        #[structopt(long, short = "c", parse(from_os_str))]
        config: PathBuf,
        #[structopt(parse(from_os_str))]
        events: PathBuf,
    },
}

#[derive(Serialize)]
struct PoolUsage<'a> {
    pool: &'a str,
    in_use: usize,
    capacity: u32,
}

// Use the command-line arguments to update the run-time config.
fn update_from_cli(opts: &Opt, config: &mut Config) {
    if let Some(log_file) = &opts.log_file {
        config.log_file = Some(log_file.to_string());
    }

    if let Some(log_format) = opts.log_format {
        config.log_format = log_format;
    }
}

fn build_config(opts: &Opt, path: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    update_from_cli(opts, &mut config);
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(value)
        .context("serializing output")?;
    println!("{s}");
    Ok(())
}

fn print_tables() {
    for table in TableType::iter() {
        let kind = if table.is_mod_table() { "rewrite" } else { "match" };
        println!("{:<8} {}", kind, table.name());
    }
}

fn print_static(opts: &Opt, path: &Path, teardown: bool) -> anyhow::Result<()> {
    let config = build_config(opts, path)?;
    let log = common::logging::init(
        "evpn-xlate",
        &config.log_file,
        config.log_format,
    )?;
    let translator = Translator::new(&log, config)?;
    let ops = if teardown {
        translator.shutdown()?
    } else {
        translator.startup()?
    };
    print_json(&ops)
}

fn replay(opts: &Opt, path: &Path, events: &Path) -> anyhow::Result<()> {
    let config = build_config(opts, path)?;
    let log = common::logging::init(
        "evpn-xlate",
        &config.log_file,
        config.log_format,
    )?;
    let events = load_events(events)
        .with_context(|| format!("loading events {}", events.display()))?;
    let translator = Translator::new(&log, config)?;
    let mut replay = Replay::new(&log, &translator);

    let ops = replay.startup().context("programming static entries")?;
    print_json(&Outcome {
        event: "startup".to_string(),
        ops,
        sa_config: None,
    })?;
    for (idx, event) in events.iter().enumerate() {
        let outcome = replay
            .apply(event)
            .with_context(|| format!("event {idx}: {event}"))?;
        print_json(&outcome)?;
    }

    let pools: Vec<PoolUsage> = translator
        .pools()
        .usage()
        .into_iter()
        .map(|(pool, in_use, capacity)| PoolUsage {
            pool,
            in_use,
            capacity,
        })
        .collect();
    print_json(&serde_json::json!({
        "tables": replay.tables().usage(),
        "pools": pools,
    }))?;
    info!(log, "replay complete";
        "events" => events.len(),
        "entries" => replay.tables().len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = Opt::from_args();

    match &opts.cmd {
        Command::Tables => {
            print_tables();
            Ok(())
        }
        Command::Static { config, teardown } => {
            print_static(&opts, config, *teardown)
        }
        Command::Replay { config, events } => replay(&opts, config, events),
    }
}
