//! Command implementations.
//!
//! Each command opens the image, runs against a [`VariableStore`] and writes
//! its report to the supplied writer. The volatile region only lives for the
//! duration of one command.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};
use varstore::{FileMedia, NvMedia, RegionKind, StoreConfig, VariableStore};
use varstore_format::Attributes;

use crate::config::{Cli, Command, KeyArgs};
use crate::error::{CliError, Result};

type FileStore = VariableStore<FileMedia>;

/// One row of `list --json`.
#[derive(Debug, Serialize)]
struct VariableRow {
    name: String,
    vendor: String,
    attributes: String,
    size: usize,
    data: String,
}

/// Run the parsed command line.
pub fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let config = cli.store_config()?;

    if let Command::Init { size } = cli.command {
        return init(&cli.image, size, config, out);
    }

    let mut store = open(&cli.image, config)?;
    match &cli.command {
        Command::Init { .. } => Ok(()),
        Command::List { json } => list(&store, *json, out),
        Command::Get { key, raw } => get(&store, key, *raw, out),
        Command::Set {
            key,
            attributes,
            data,
        } => {
            let bytes = data.bytes()?;
            set(&mut store, key, *attributes, &bytes, out)
        }
        Command::Delete { key } => delete(&mut store, key, out),
        Command::Info { attributes } => query(&store, *attributes, out),
        Command::Compact => compact(&mut store, out),
        Command::Dump => dump(&store, out),
    }
}

fn open(path: &Path, config: StoreConfig) -> Result<FileStore> {
    let media = FileMedia::open(path).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Opened {} ({} bytes)", path.display(), media.image().len());
    Ok(VariableStore::open(config, media)?)
}

fn init(path: &Path, size: usize, config: StoreConfig, out: &mut impl Write) -> Result<()> {
    let media = FileMedia::create(path, size).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let store = VariableStore::open(config, media)?;
    info!("Formatted {} with {} bytes", path.display(), size);
    writeln!(
        out,
        "initialized {} ({} bytes free)",
        path.display(),
        store.region(RegionKind::NonVolatile).free_space()
    )?;
    Ok(())
}

fn list(store: &FileStore, json: bool, out: &mut impl Write) -> Result<()> {
    let mut rows = Vec::new();
    for variable in store.variables() {
        let variable = variable?;
        rows.push(VariableRow {
            name: variable.key.name.to_string(),
            vendor: variable.key.vendor.to_string(),
            attributes: variable.attributes.to_string(),
            size: variable.data.len(),
            data: hex::encode(&variable.data),
        });
    }

    if json {
        serde_json::to_writer_pretty(&mut *out, &rows)?;
        writeln!(out)?;
        return Ok(());
    }

    for row in &rows {
        writeln!(
            out,
            "{:<24} {} {:<12} {:>6} bytes",
            row.name, row.vendor, row.attributes, row.size
        )?;
    }
    Ok(())
}

fn get(store: &FileStore, key: &KeyArgs, raw: bool, out: &mut impl Write) -> Result<()> {
    let variable = store.get_variable(&key.name, key.vendor)?;
    if raw {
        out.write_all(&variable.data)?;
        return Ok(());
    }

    writeln!(out, "{}", variable.key)?;
    writeln!(out, "attributes: {}", variable.attributes)?;
    writeln!(out, "size: {}", variable.data.len())?;
    for chunk in variable.data.chunks(16) {
        writeln!(out, "  {}", hex::encode(chunk))?;
    }
    Ok(())
}

fn set(
    store: &mut FileStore,
    key: &KeyArgs,
    attributes: Attributes,
    data: &[u8],
    out: &mut impl Write,
) -> Result<()> {
    if data.is_empty() {
        return Err(CliError::InvalidInput(
            "empty data deletes the variable; use `delete`".to_string(),
        ));
    }
    if !attributes.is_non_volatile() {
        warn!("{} is volatile and will not outlive this command", key.name);
    }

    store.set(&key.name, key.vendor, attributes, data)?;
    info!("Set {} ({} bytes, {})", key.name, data.len(), attributes);
    writeln!(out, "set {} ({} bytes)", key.name, data.len())?;
    Ok(())
}

fn delete(store: &mut FileStore, key: &KeyArgs, out: &mut impl Write) -> Result<()> {
    store.set(&key.name, key.vendor, Attributes::default(), &[])?;
    info!("Deleted {}", key.name);
    writeln!(out, "deleted {}", key.name)?;
    Ok(())
}

fn query(store: &FileStore, attributes: Attributes, out: &mut impl Write) -> Result<()> {
    let info = store.query_info(attributes)?;
    serde_json::to_writer_pretty(&mut *out, &info)?;
    writeln!(out)?;
    Ok(())
}

fn compact(store: &mut FileStore, out: &mut impl Write) -> Result<()> {
    let outcome = store.compact(RegionKind::NonVolatile)?;
    writeln!(
        out,
        "reclaimed {} bytes (tail {:#x} -> {:#x})",
        outcome.reclaimed(),
        outcome.old_tail,
        outcome.new_tail
    )?;
    Ok(())
}

fn dump(store: &FileStore, out: &mut impl Write) -> Result<()> {
    let region = store.region(RegionKind::NonVolatile);
    writeln!(
        out,
        "{} region: {} bytes, tail {:#x}, free {}",
        region.kind(),
        region.size(),
        region.tail(),
        region.free_space()
    )?;

    for entry in region.view().entries() {
        let key = entry
            .key()
            .map_or_else(|e| format!("<{e}>"), |key| key.to_string());
        let state = format!("{:?}", entry.state());
        writeln!(
            out,
            "{:#08x} {:<12} {:<12} {} ({} bytes)",
            entry.offset(),
            state,
            entry.attributes(),
            key,
            entry.data().len()
        )?;
    }
    Ok(())
}
