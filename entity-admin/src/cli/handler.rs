//! Command handlers

use anyhow::{Context, Result};
use colored::*;
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::{Cli, Commands, DeleteArgs, RelationsArgs, SaveArgs};
use crate::config::Settings;
use crate::context::RequestContext;
use crate::manager::{EntityManager, ReconcileResult, RelativeDataManager};
use crate::record::Record;
use crate::schema::{EntityDef, Schema, load_schema};
use crate::storage::{MemoryStorage, SqliteStorage, Storage};

/// Run a parsed command line
pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let schema = load_schema(&cli.schema)?;

    if let Commands::Relations(args) = &cli.command {
        return show_relations(&schema, args);
    }

    if cli.dry_run {
        println!("{}", "Dry run: writes go to an empty in-memory store".dimmed());
        let storage = MemoryStorage::new();
        let outcome = execute(&cli.command, &schema, &storage, &settings, true).await;
        print_operations(&storage);
        return outcome;
    }

    let url = cli
        .database
        .clone()
        .unwrap_or_else(|| settings.database.url.clone());
    let storage = SqliteStorage::connect(&url, settings.database.max_connections).await?;
    storage.ensure_schema(&schema).await?;

    execute(&cli.command, &schema, &storage, &settings, false).await
}

async fn execute(
    command: &Commands,
    schema: &Schema,
    storage: &dyn Storage,
    settings: &Settings,
    dry_run: bool,
) -> Result<()> {
    match command {
        Commands::Init => {
            for line in init_lines(schema, dry_run) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Save(args) => handle_save(args, schema, storage, settings).await,
        Commands::Delete(args) => handle_delete(args, schema, storage, settings).await,
        Commands::Relations(args) => show_relations(schema, args),
    }
}

async fn handle_save(
    args: &SaveArgs,
    schema: &Schema,
    storage: &dyn Storage,
    settings: &Settings,
) -> Result<()> {
    let payload = read_payload(&args.payload)?;
    let id = args.id.as_deref().map(parse_id);
    let entity = schema.require(&args.entity)?;
    let context = RequestContext::for_entity(entity).with_settings(&settings.reconcile);

    let result = if args.relations_only {
        let mut manager =
            RelativeDataManager::new(storage, schema, &args.entity, payload, id, context)?;
        manager.save().await?
    } else {
        let mut manager = EntityManager::new(storage, schema, &args.entity, payload, id, context)?;
        manager.save().await?
    };

    report("save", entity, &result)
}

async fn handle_delete(
    args: &DeleteArgs,
    schema: &Schema,
    storage: &dyn Storage,
    settings: &Settings,
) -> Result<()> {
    let entity = schema.require(&args.entity)?;
    let context = match &args.fields {
        Some(fields) => RequestContext::new(fields.iter().map(|f| f.trim())),
        None => RequestContext::for_entity(entity),
    }
    .with_settings(&settings.reconcile);
    let id = Some(parse_id(&args.id));

    let result = if args.relations_only {
        let mut manager =
            RelativeDataManager::new(storage, schema, &args.entity, Record::new(), id, context)?;
        manager.delete().await?
    } else {
        let mut manager =
            EntityManager::new(storage, schema, &args.entity, Record::new(), id, context)?;
        manager.delete().await?
    };

    report("delete", entity, &result)
}

/// One line per entity table; nothing is created under a dry run
fn init_lines(schema: &Schema, dry_run: bool) -> Vec<String> {
    schema
        .entities()
        .map(|entity| {
            if dry_run {
                format!("{} would create table {}", "-".dimmed(), entity.name)
            } else {
                format!("{} {}", "✓".bright_green(), entity.name)
            }
        })
        .collect()
}

fn show_relations(schema: &Schema, args: &RelationsArgs) -> Result<()> {
    let entities: Vec<&EntityDef> = match &args.entity {
        Some(name) => vec![schema.require(name)?],
        None => schema.entities().collect(),
    };

    for entity in entities {
        println!("{} ({})", entity.name.bold(), entity.primary_key.dimmed());
        if entity.relations.is_empty() {
            println!("  {}", "no relations".dimmed());
        }
        for relation in &entity.relations {
            let status = if relation.is_reconcilable() {
                String::new()
            } else {
                format!(" {}", "not reconcilable".red())
            };
            println!("  {} → {}{}", relation.name.cyan(), relation.target, status);
            for (column, source) in relation.columns() {
                println!("    {} = {}", column, source);
            }
            for condition in relation.dropped_conditions() {
                println!("    {} {}", "dropped".yellow(), condition);
            }
        }
    }
    Ok(())
}

fn report(action: &str, entity: &EntityDef, result: &ReconcileResult) -> Result<()> {
    for (key, note) in result.notes.iter() {
        println!("  {} {}", key.yellow(), note);
    }

    if result.is_success() {
        let id = result.id().map(Value::to_string).unwrap_or_default();
        println!("{} {} {} {}", "✓".bright_green(), action, entity.name, id.bold());
        return Ok(());
    }

    anyhow::bail!(
        "{} of {} was rolled back: {}",
        action,
        entity.name,
        result.error_message().unwrap_or("Unknown error")
    )
}

fn print_operations(storage: &MemoryStorage) {
    let operations = storage.operations();
    println!();
    println!("{} issued writes:", operations.len());
    for operation in operations {
        let id = operation.id().map(Value::to_string).unwrap_or_default();
        println!(
            "  {} {} {}",
            operation.operation_type().cyan(),
            operation.entity(),
            id
        );
    }
}

/// Numeric keys become numbers, anything else stays text
fn parse_id(text: &str) -> Value {
    match text.trim().parse::<i64>() {
        Ok(id) => Value::from(id),
        Err(_) => Value::String(text.trim().to_string()),
    }
}

fn read_payload(path: &Path) -> Result<Record> {
    if !path.exists() {
        anyhow::bail!("Payload file does not exist: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in payload file: {}", path.display()))?;

    match value {
        Value::Object(record) => Ok(record),
        _ => anyhow::bail!("Payload must be a JSON object: {}", path.display()),
    }
}
