use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use lsp_types::TextDocumentContentChangeEvent;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::json;
use tracing::{error, info};

use vue_virtual_docs::bridge::{DiskFilesystem, FilesystemBridge, WatcherRegistry};
use vue_virtual_docs::config::DocumentOptions;
use vue_virtual_docs::documents::{CompositeDocument, DocumentStore};
use vue_virtual_docs::logging::{init_logger, FileLogging};
use vue_virtual_docs::sfc::{BlockSlot, VirtualId};

#[derive(Parser, Debug)]
#[command(name = "vue-virtual-docs")]
#[command(about = "Inspect the virtual documents derived from a Vue single-file component")]
struct Args {
    /// Composite file to open
    file: PathBuf,

    /// Print the generated text of a block: a virtual identifier, or
    /// `template`, `script`, `script-setup`, `style:<n>`, `<tag>:<n>`
    #[arg(long, value_name = "ID")]
    block: Option<String>,

    /// Print the synthesized main module
    #[arg(long)]
    main: bool,

    /// Map a byte offset in the file to its block and back
    #[arg(long, value_name = "OFFSET")]
    map: Option<usize>,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,

    /// Keep running and re-print the summary whenever the file changes
    #[arg(long)]
    watch: bool,

    /// Log level for stderr (otherwise RUST_LOG, then "info")
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Disable ANSI colors in stderr logs
    #[arg(long)]
    no_color: bool,

    /// Also write DEBUG-level logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn parse_slot(selector: &str) -> Option<BlockSlot> {
    match selector {
        "template" => Some(BlockSlot::Template),
        "script" => Some(BlockSlot::Script),
        "script-setup" => Some(BlockSlot::ScriptSetup),
        _ => {
            let (name, index) = selector.split_once(':')?;
            let index = index.parse().ok()?;
            Some(match name {
                "style" => BlockSlot::Style(index),
                _ => BlockSlot::Custom { name: name.to_string(), index },
            })
        }
    }
}

fn print_summary(document: &CompositeDocument, as_json: bool) -> Result<()> {
    let descriptor = document.descriptor();
    let blocks: Vec<_> = descriptor
        .in_document_order()
        .into_iter()
        .map(|(slot, block)| {
            json!({
                "id": document.block_id(&slot),
                "type": block.kind.as_str(),
                "lang": block.language(),
                "start": block.range.start,
                "end": block.range.end,
                "fallback": block.is_fallback(),
            })
        })
        .collect();
    let errors: Vec<_> = document
        .errors()
        .into_iter()
        .map(|e| json!({ "message": e.message, "start": e.range.start, "end": e.range.end }))
        .collect();

    if as_json {
        let summary = json!({
            "file": document.file_name(),
            "version": document.version(),
            "main": document.main_file_name(),
            "blocks": blocks,
            "activeIds": document.active_ids(),
            "errors": errors,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} (version {})", document.file_name(), document.version());
    for (slot, block) in descriptor.in_document_order() {
        let id = document.block_id(&slot).unwrap_or_else(|| "<no identifier>".to_string());
        println!("  {:>6}..{:<6} {}", block.range.start, block.range.end, id);
    }
    println!("  main: {}", document.main_file_name());
    for error in document.errors() {
        println!("  error: {}", error);
    }
    Ok(())
}

fn print_mapping(document: &CompositeDocument, offset: usize, as_json: bool) -> Result<()> {
    let Some(block) = document.doc_at(offset) else {
        bail!("Offset {} is not inside any block of {}", offset, document.file_name());
    };
    let generated = block.generated_offset_at(offset);
    let back = generated.and_then(|generated| block.absolute_offset_at(generated));
    let zone = generated.map(|generated| {
        if block.is_offset_in_template_globals(generated) {
            "template-globals"
        } else if block.is_offset_in_ignored_zone(generated) {
            "ignored"
        } else {
            "mapped"
        }
    });

    if as_json {
        let mapping = json!({
            "offset": offset,
            "block": block.file_name(),
            "generated": generated,
            "absolute": back,
            "zone": zone,
        });
        println!("{}", serde_json::to_string_pretty(&mapping)?);
    } else {
        match (generated, back) {
            (Some(generated), Some(back)) => {
                println!("{} -> {}:{} -> {}", offset, block.file_name(), generated, back)
            }
            (Some(generated), None) => {
                println!("{} -> {}:{} -> <unknown>", offset, block.file_name(), generated)
            }
            _ => println!("{} -> {}:<unknown>", offset, block.file_name()),
        }
    }
    Ok(())
}

fn run(args: &Args, bridge: &FilesystemBridge, file_name: &str) -> Result<()> {
    let document = bridge.open_composite(file_name)?;

    if let Some(selector) = &args.block {
        let id = if VirtualId::is_virtual(selector) {
            selector.clone()
        } else {
            let slot = parse_slot(selector).with_context(|| format!("Unknown block `{}`", selector))?;
            document
                .block_id(&slot)
                .with_context(|| format!("{} has no {} block", file_name, selector))?
        };
        match bridge.read(&id) {
            Some(text) => println!("{}", text),
            None => bail!("No generated text for {}", id),
        }
        return Ok(());
    }

    if args.main {
        match bridge.read(document.main_file_name()) {
            Some(text) => println!("{}", text),
            None => bail!("No main module for {}", file_name),
        }
        return Ok(());
    }

    if let Some(offset) = args.map {
        return print_mapping(&document, offset, args.json);
    }

    print_summary(&document, args.json)
}

fn watch(args: &Args, bridge: &FilesystemBridge, file_name: &str) -> Result<()> {
    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .context("Failed to create file watcher")?;
    watcher
        .watch(args.file.as_path(), RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", file_name))?;
    info!("Watching {}", file_name);

    let document = bridge.open_composite(file_name)?;
    let mut version = document.version();
    for event in rx {
        match event {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                let text = std::fs::read_to_string(file_name)
                    .with_context(|| format!("Failed to re-read {}", file_name))?;
                if text == document.text() {
                    continue;
                }
                version += 1;
                let change = TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text,
                };
                bridge.host_edit(file_name, &[change], version);
                run(args, bridge, file_name)?;
            }
            Ok(_) => {}
            Err(e) => error!("Watch error: {}", e),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file_logging = match &args.log_file {
        Some(path) => FileLogging::Path(path.clone()),
        None if args.watch => FileLogging::Session,
        None => FileLogging::Disabled,
    };
    let _guard = init_logger(args.no_color, args.log_level.as_deref(), file_logging)
        .context("Failed to initialize logging")?;

    let path = std::fs::canonicalize(&args.file)
        .with_context(|| format!("Failed to resolve {}", args.file.display()))?;
    let file_name = path.to_string_lossy().into_owned();

    let store = Arc::new(DocumentStore::new(DocumentOptions::default()));
    let bridge = FilesystemBridge::new(Arc::new(DiskFilesystem), store, WatcherRegistry::new());

    run(&args, &bridge, &file_name)?;
    if args.watch {
        watch(&args, &bridge, &file_name)?;
    }
    bridge.shutdown();
    Ok(())
}
