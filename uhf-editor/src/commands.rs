use anyhow::{anyhow, bail, Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uhf_engine::content::{resource_from_file, scan_directory};
use uhf_engine::models::MANIFEST_FILE;
use uhf_engine::resolver::DurationProbe;
use uhf_engine::timefmt::{format_duration, format_time_of_day, parse_offset};
use uhf_engine::{
    Channel, FsStorage, ProbeChain, ProbeConfig, ResolverSession, ResourceField, SaveReport,
};

use crate::cli::{Command, DayRef, Field};
use crate::foreground::{resolve_day, PromptMode};

/// Everything commands share for one run of the editor.
pub struct Session {
    pub probe_config: ProbeConfig,
    pub probe: Arc<dyn DurationProbe>,
    pub resolver: ResolverSession,
    pub prompt_mode: PromptMode,
}

impl Session {
    pub fn new(probe_config: ProbeConfig, prompt_mode: PromptMode) -> Self {
        let probe = Arc::new(ProbeChain::from_config(&probe_config));
        Self {
            probe_config,
            probe,
            resolver: ResolverSession::new(),
            prompt_mode,
        }
    }
}

fn day_ordinal(channel: &Channel, day: DayRef) -> Result<i64> {
    let ordinal = match day {
        DayRef::Ordinal(ordinal) => ordinal,
        DayRef::Date(date) => channel
            .ordinal_for_date(date)
            .ok_or_else(|| anyhow!("no schedule covers {}", date))?,
    };
    if channel.locate(ordinal).is_none() {
        bail!(
            "day {} is outside the channel (0..{})",
            ordinal,
            channel.total_days()
        );
    }
    Ok(ordinal)
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_number(value: Option<String>, what: &str) -> Result<Option<i32>> {
    optional(value)
        .map(|v| {
            v.trim()
                .parse::<i32>()
                .with_context(|| format!("{} must be a number", what))
        })
        .transpose()
}

pub async fn run(command: Command, dir: &Path, session: &Session) -> Result<()> {
    let storage = Arc::new(FsStorage::new(dir));

    if let Command::New { weeks, start } = command {
        if dir.join(MANIFEST_FILE).exists() {
            bail!("{} already holds a channel", dir.display());
        }
        let mut channel = Channel::create(storage, weeks, start)?;
        let report = channel.save()?;
        print_save_report(&report);
        println!("Created a {} week channel in {}", weeks, dir.display());
        return finish(&report);
    }

    let mut channel =
        Channel::open(storage).with_context(|| format!("Cannot open channel in {}", dir.display()))?;
    let mutating = command.is_mutating();
    execute(&mut channel, command, session).await?;

    if mutating && channel.is_dirty() {
        let report = channel.save()?;
        print_save_report(&report);
        return finish(&report);
    }
    Ok(())
}

async fn execute(channel: &mut Channel, command: Command, session: &Session) -> Result<()> {
    match command {
        Command::New { .. } => bail!("{} already holds a channel", channel.root().display()),
        Command::Info => print_info(channel),
        Command::Day { day } => {
            let ordinal = day_ordinal(channel, day)?;
            if channel.needs_resolution(ordinal, &session.resolver) {
                resolve(channel, ordinal, session).await?;
            }
            print_day(channel, ordinal, session);
        }
        Command::Resolve { day } => {
            let ordinal = day_ordinal(channel, day)?;
            resolve(channel, ordinal, session).await?;
        }
        Command::Add {
            day,
            time,
            file,
            category,
        } => {
            let ordinal = day_ordinal(channel, day)?;
            let file = absolute(&file)?;
            let resource =
                resource_from_file(channel.root(), &file, session.probe.as_ref(), &session.probe_config)
                    .ok_or_else(|| anyhow!("{} cannot be scheduled", file.display()))?;
            let id = channel.insert_program(ordinal, time, resource, category)?;
            println!("Scheduled {} at {} as {}", file.display(), format_time_of_day(time), id);
        }
        Command::Move { day, from, to } => {
            let ordinal = day_ordinal(channel, day)?;
            channel.set_program_start_time(ordinal, from, to)?;
        }
        Command::Shift { day, time, minutes } => {
            let ordinal = day_ordinal(channel, day)?;
            let moved = channel.shift_program_start_time(ordinal, time, minutes)?;
            println!("Program now starts at {}", format_time_of_day(moved));
        }
        Command::Delete { day, time } => {
            let ordinal = day_ordinal(channel, day)?;
            let removed = channel.delete_program(ordinal, time)?;
            println!("Removed {}", removed.resource_id);
        }
        Command::Rekey { day, time, new_id } => {
            let ordinal = day_ordinal(channel, day)?;
            let rewritten = channel.rekey_resource(ordinal, time, &new_id)?;
            println!("{} programs now use {}", rewritten, new_id);
        }
        Command::Set {
            day,
            time,
            field,
            value,
        } => {
            let ordinal = day_ordinal(channel, day)?;
            let field = match field {
                Field::Title => ResourceField::Title(optional(value)),
                Field::Description => ResourceField::Description(optional(value)),
                Field::Series => ResourceField::SeriesId(optional(value)),
                Field::Year => ResourceField::Year(parse_number(value, "year")?),
                Field::Order => ResourceField::Order(parse_number(value, "order")?),
                Field::Offset => {
                    ResourceField::StartOffset(optional(value).as_deref().and_then(parse_offset))
                }
                Field::Path => {
                    let path = optional(value).ok_or_else(|| anyhow!("a path is required"))?;
                    let duration =
                        channel.set_resource_path(ordinal, time, &path, session.probe.as_ref())?;
                    println!("Duration is {}", format_duration(duration));
                    return Ok(());
                }
            };
            channel.set_resource_field(ordinal, time, field)?;
        }
        Command::Scan { dir } => {
            let dir = absolute(&dir)?;
            let resources =
                scan_directory(channel.root(), &dir, session.probe.as_ref(), &session.probe_config)?;
            let scheduled = channel.schedule_paths();
            for resource in &resources {
                println!(
                    "{:>8} {}{}",
                    format_duration(resource.duration),
                    resource.path,
                    if scheduled.contains(&resource.path) { "  [scheduled]" } else { "" }
                );
            }
            println!("{} files can be scheduled", resources.len());
        }
        Command::Validate => {
            let report = channel.validate();
            if report.is_clean() {
                println!("No problems found");
            } else {
                for issue in &report.issues {
                    println!("{}", issue);
                }
                bail!("{} problems found", report.issues.len());
            }
        }
        Command::FixDurations => {
            let changed = channel.reassign_durations(session.probe.as_ref());
            println!("Updated {} durations", changed);
        }
        Command::ExportResources { output } => {
            let count = channel.export_resource_database(&output)?;
            println!("Wrote {} resources to {}", count, output.display());
        }
        Command::Offset { days } => {
            channel.offset_schedule(days)?;
        }
        Command::Bobd { time } => {
            let time = channel.set_beginning_of_broadcast_day(&time)?;
            println!("Broadcast day begins at {}", format_time_of_day(time));
        }
        Command::ListNew { id, path, title } => {
            channel.create_list(&id, title, &path)?;
        }
        Command::ListAdd { id, file } => {
            let file = absolute(&file)?;
            let resource =
                resource_from_file(channel.root(), &file, session.probe.as_ref(), &session.probe_config)
                    .ok_or_else(|| anyhow!("{} cannot be added", file.display()))?;
            match channel.add_resource_to_list(&id, resource)? {
                Some(key) => println!("Added as {}", key),
                None => println!("{} is already in list {}", file.display(), id),
            }
        }
        Command::ListRemove { id, keys } => {
            let removed = channel.remove_list_resources(&id, &keys)?;
            println!("Removed {} entries", removed);
        }
        Command::SeriesAdd { id, title } => {
            channel.add_series(&id, &title)?;
        }
    }
    Ok(())
}

async fn resolve(channel: &mut Channel, ordinal: i64, session: &Session) -> Result<()> {
    let report = resolve_day(
        channel,
        ordinal,
        session.probe.clone(),
        &session.resolver,
        session.prompt_mode,
    )
    .await?;
    tracing::info!(
        "Resolved {} durations after {} prompts",
        report.resolved.len(),
        report.prompts
    );
    for path in &report.blacklisted {
        println!("Unresolved: {}", path);
    }
    Ok(())
}

fn absolute(file: &Path) -> Result<PathBuf> {
    if file.is_absolute() {
        return Ok(file.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(file))
}

fn print_info(channel: &Channel) {
    let manifest = channel.manifest();
    let info = manifest.info.clone().unwrap_or_default();
    println!("Title:       {}", info.title.as_deref().unwrap_or("(untitled)"));
    if let Some(description) = info.description.as_deref() {
        println!("Description: {}", description);
    }
    if let Some(bobd) = manifest.beginning_of_broadcast_day {
        println!("Day begins:  {}", format_time_of_day(bobd));
    }
    println!("Days:        {}", channel.total_days());
    for descriptor in &manifest.schedules {
        println!("  {}  {}", descriptor.start_date, descriptor.schedule_path);
    }
    for (id, list) in channel.lists() {
        println!("List {}: {} entries", id, list.resources.len());
    }
    if let Some(series) = &manifest.series {
        for (id, s) in series {
            println!("Series {}: {}", id, s.title);
        }
    }
}

fn print_day(channel: &Channel, ordinal: i64, session: &Session) {
    match channel.date_for(ordinal) {
        Some(date) => println!("Day {} ({})", ordinal, date.format("%A %Y-%m-%d")),
        None => println!("Day {}", ordinal),
    }
    for row in channel.day_schedule_with_hints(ordinal, &session.resolver.hints) {
        println!(
            "{} {:>8} {}{}{}",
            format_time_of_day(row.start_time),
            format_duration(row.duration),
            row.title,
            if row.has_description { " *" } else { "" },
            if row.error { "  [missing]" } else { "" }
        );
    }
}

fn print_save_report(report: &SaveReport) {
    if report.manifest_written {
        tracing::info!("Wrote manifest");
    }
    for path in &report.schedules_written {
        tracing::info!("Wrote {}", path);
    }
    for id in &report.lists_written {
        tracing::info!("Wrote list {}", id);
    }
    for failure in &report.failures {
        eprintln!("Save failed: {}", failure);
    }
}

fn finish(report: &SaveReport) -> Result<()> {
    if report.is_complete() {
        Ok(())
    } else {
        bail!("{} files could not be written", report.failures.len())
    }
}
