//! SDJ Validator CLI
//!
//! Builds SDJ documents, reports validation failures, and runs path and
//! entity/item queries against them.
//!
//! Usage:
//!   sdj-validate check ./documents
//!   sdj-validate query site.json --path home.home_page1
//!   sdj-validate --lexicon basics.json inspect site.json

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sdj_schema::{
    Document, DocumentDoc, EntitySearch, Host, HostOptions, ItemSearch, Lexicon, LexiconDoc,
    NodeId, SdjConfig,
};
use similar::{ChangeTag, TextDiff};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sdj-validate")]
#[command(about = "Validate and query self-describing JSON documents")]
struct Cli {
    /// Config file layered over sdj.toml and SDJ__* variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lexicon JSON files, registered in order
    #[arg(short, long)]
    lexicon: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build documents strictly and report failures
    Check {
        /// A document, or a directory searched for *.json
        path: PathBuf,

        /// Show the round-trip diff for documents that change on output
        #[arg(long)]
        diff: bool,
    },

    /// Print a document's items and entities
    Inspect { file: PathBuf },

    /// Find data nodes
    Query {
        file: PathBuf,

        /// Dotted or slashed data path
        #[arg(long)]
        path: Option<String>,

        /// Entity key
        #[arg(long)]
        entity_key: Option<String>,

        /// Item key
        #[arg(long)]
        item_key: Option<String>,
    },

    /// Print the lexicon generated from a document's description
    Lexicon { file: PathBuf },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SdjConfig::load_from(cli.config.as_deref()).context("loading config")?;
    let lexicons = cli
        .lexicon
        .iter()
        .map(|path| load_lexicon(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let new_host = || -> anyhow::Result<Host> {
        let options = lexicons
            .iter()
            .cloned()
            .fold(HostOptions::default().with_config(config.clone()), HostOptions::with_lexicon);
        Ok(Host::new(options)?)
    };

    match cli.command {
        Commands::Check { path, diff } => {
            let files = json_files(&path);
            if files.is_empty() {
                bail!("no JSON documents under {}", path.display());
            }

            let mut failed = 0;
            for file in &files {
                // Each document gets its own host so description names never collide
                let host = new_host()?;
                match check_file(file, &host, diff) {
                    Ok(summary) => println!("✅ {}: {}", file.display(), summary),
                    Err(e) => {
                        failed += 1;
                        println!("❌ {}: {:#}", file.display(), e);
                    }
                }
            }

            println!();
            println!("{} checked, {} failed", files.len(), failed);
            if failed > 0 {
                bail!("{} document(s) failed", failed);
            }
        }

        Commands::Inspect { file } => {
            let host = new_host()?;
            let document = load_document(&file, &host)?;
            let description = document.description();

            println!("📘 {} ({})", description.name(), description.info().uniq_id);
            println!("   lang: {}", description.lang());
            if !description.lexicons().is_empty() {
                println!("   lexicons: {}", description.lexicons().join(", "));
            }

            println!();
            println!("Items:");
            for item in description.items() {
                println!(
                    "  {:>3}  {:<24} {:<10} {}",
                    item.id(),
                    item.key(),
                    item.type_name(),
                    item.limiter()
                );
            }

            println!();
            println!("Entities:");
            for entity in description.entities() {
                println!(
                    "  {:>3}  {:<24} {:<14} parents {:?} children {:?} extends {:?}",
                    entity.id(),
                    entity.key(),
                    entity.limiter().to_string(),
                    entity.parent_ids(),
                    entity.child_ids(),
                    entity.extend_ids()
                );
            }
        }

        Commands::Query {
            file,
            path,
            entity_key,
            item_key,
        } => {
            let host = new_host()?;
            let document = load_document(&file, &host)?;
            let found: Vec<NodeId> = match (path, entity_key, item_key) {
                (Some(path), _, _) => document.data_by_path(&path).into_iter().collect(),
                (_, Some(key), _) => document.data_by_entity(&EntitySearch::key(key), None),
                (_, _, Some(key)) => document.data_by_item(&ItemSearch::key(key), None),
                _ => bail!("one of --path, --entity-key or --item-key is required"),
            };

            if found.is_empty() {
                println!("No matching data");
            }
            for node in found {
                let tree = document.tree();
                let entity = tree
                    .node(node)
                    .and_then(|data| document.description().entity(data.entity_id()))
                    .map(|entity| entity.key().to_string())
                    .unwrap_or_default();
                println!("{}  [{}]", tree.path(node), entity);
            }
        }

        Commands::Lexicon { file } => {
            let host = new_host()?;
            let value = read_json(&file)?;
            let doc = DocumentDoc::from_json(value, &host)?;
            let lexicon = Lexicon::from_description(&doc.description);
            println!("{}", serde_json::to_string_pretty(lexicon.doc())?);
        }
    }

    Ok(())
}

fn json_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn load_lexicon(path: &Path) -> anyhow::Result<Lexicon> {
    let doc: LexiconDoc = serde_json::from_value(read_json(path)?)
        .with_context(|| format!("lexicon {}", path.display()))?;
    Ok(Lexicon::from_doc(doc))
}

fn load_document<'h>(path: &Path, host: &'h Host) -> anyhow::Result<Document<'h>> {
    Document::from_json(read_json(path)?, host).with_context(|| format!("building {}", path.display()))
}

fn check_file(path: &Path, host: &Host, show_diff: bool) -> anyhow::Result<String> {
    let input = read_json(path)?;
    let document = Document::from_json(input.clone(), host)?;
    if !document.is_valid() {
        bail!("data failed validation");
    }

    let before = serde_json::to_string_pretty(&input)?;
    let after = serde_json::to_string_pretty(&document.to_json()?)?;
    let diff = TextDiff::from_lines(&before, &after);
    let mut changed = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {}
            ChangeTag::Delete | ChangeTag::Insert => {
                changed += 1;
                if show_diff {
                    let sign = if change.tag() == ChangeTag::Delete { "-" } else { "+" };
                    print!("    {}{}", sign, change);
                }
            }
        }
    }

    let description = document.description();
    let mut summary = format!(
        "'{}' {} entities, {} items, {} data nodes",
        description.name(),
        description.entities().len(),
        description.items().len(),
        document.tree().len()
    );
    if changed > 0 {
        summary.push_str(&format!(" ({} lines differ on output)", changed));
    }
    Ok(summary)
}
