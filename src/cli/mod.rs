//! Command-line interface for jarcat.
//!
//! Provides commands for cataloging archives, updating the preview cache,
//! browsing the catalog and dumping databases as plaintext SQL.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OpenFlags};

use crate::config::{self, ResolvedConfig};
use crate::core::{PreviewCache, Scanner};
use crate::store::plaintext::dump_connection;
use crate::store::{Catalog, ReferenceStore};

/// jarcat - J2ME archive catalog and model preview cache
#[derive(Parser, Debug)]
#[command(name = "jarcat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Catalog archives into a database
    Catalog {
        /// Catalog database (created if missing)
        db: PathBuf,

        /// Archive paths or glob patterns; the parent folder names the title
        #[arg(required = true)]
        archives: Vec<String>,
    },

    /// Extract images and render model previews
    Previews {
        /// Catalog database, populated by `catalog`
        db: PathBuf,

        /// Working directory for previews.sqlite, full/ and thumbs/
        workdir: PathBuf,

        /// Only render the model at this entry path
        #[arg(long)]
        resource: Option<String>,

        /// Archive paths or glob patterns
        #[arg(required = true)]
        archives: Vec<String>,
    },

    /// List cataloged titles
    Titles {
        /// Catalog database
        db: PathBuf,
    },

    /// Show archives and resources of a title
    Show {
        /// Catalog database
        db: PathBuf,

        /// Title name
        title: String,
    },

    /// Write a SQLite database as plaintext SQL
    Dump {
        /// SQLite database file
        db: PathBuf,

        /// Output file ("-" for stdout)
        #[arg(default_value = "-")]
        output: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Catalog { db, archives } => {
                let cfg = config::load_config()?;
                catalog_archives(&cfg, &db, &archives)
            }
            Commands::Previews {
                db,
                workdir,
                resource,
                archives,
            } => {
                let cfg = config::load_config()?;
                update_previews(&cfg, &db, &workdir, resource.as_deref(), &archives).await
            }
            Commands::Titles { db } => list_titles(&db),
            Commands::Show { db, title } => show_title(&db, &title),
            Commands::Dump { db, output } => dump_database(&db, &output),
            Commands::Config => show_config(),
        }
    }
}

/// Expand glob patterns; plain paths pass through unchanged
pub fn expand_archives(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(pattern));
            continue;
        }

        let before = paths.len();
        for entry in glob::glob(pattern)
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?
        {
            paths.push(entry.with_context(|| format!("Failed to expand: {}", pattern))?);
        }
        if paths.len() == before {
            tracing::warn!(%pattern, "Pattern matched no archives");
        }
    }

    Ok(paths)
}

fn open_catalog(db: &Path) -> Result<Catalog> {
    Catalog::open(db).with_context(|| format!("Failed to open catalog: {}", db.display()))
}

/// Scan archives into the catalog
fn catalog_archives(cfg: &ResolvedConfig, db: &Path, patterns: &[String]) -> Result<()> {
    let archives = expand_archives(patterns)?;
    let catalog = open_catalog(db)?;
    let codec = cfg.codec();
    let scanner = Scanner::new(&catalog, cfg.denylist(), codec.as_ref(), cfg.scan_options());

    let summary = scanner.scan_all(&archives);
    let counts = catalog.counts()?;

    println!(
        "Cataloged {} archive(s), skipped {}, failed {} ({} row(s) changed)",
        summary.cataloged.len(),
        summary.skipped,
        summary.failed.len(),
        summary.rows_changed()
    );
    println!(
        "Catalog: {} titles, {} archives, {} resources",
        counts.titles, counts.archives, counts.resources
    );

    if !summary.is_success() {
        for (path, err) in &summary.failed {
            eprintln!("  {}: {}", path.display(), err);
        }
        bail!("{} archive(s) could not be cataloged", summary.failed.len());
    }

    Ok(())
}

/// Run the image extraction and model preview passes
async fn update_previews(
    cfg: &ResolvedConfig,
    db: &Path,
    workdir: &Path,
    resource: Option<&str>,
    patterns: &[String],
) -> Result<()> {
    let archives = expand_archives(patterns)?;
    let catalog = open_catalog(db)?;
    let reference = ReferenceStore::open(&cfg.reference).with_context(|| {
        format!("Failed to open reference store: {}", cfg.reference.display())
    })?;
    let codec = cfg.codec();
    let renderer = cfg.command_renderer();

    let cache = PreviewCache::open(workdir, &catalog, &reference, codec.as_ref(), &renderer)
        .with_context(|| format!("Failed to open preview cache in {}", workdir.display()))?
        .with_denylist(cfg.denylist())
        .with_options(cfg.preview_options());

    let summary = cache.update_previews(&archives, resource).await?;

    println!(
        "Images: {} extracted, {} present, {} failed",
        summary.images_extracted, summary.images_present, summary.image_failures
    );
    println!(
        "Previews: {} rendered, {} up to date, {} denylisted, {} failed",
        summary.rendered, summary.up_to_date, summary.denylisted, summary.render_failures
    );

    if !summary.is_success() {
        for (path, err) in &summary.failed_archives {
            eprintln!("  {}: {}", path.display(), err);
        }
        bail!(
            "{} archive(s) failed, {} preview(s) failed",
            summary.failed_archives.len(),
            summary.render_failures
        );
    }

    Ok(())
}

fn list_titles(db: &Path) -> Result<()> {
    let catalog = open_catalog(db)?;
    let titles = catalog.titles()?;

    if titles.is_empty() {
        println!("Catalog is empty. Use 'jarcat catalog <db> <archives...>' to add archives.");
        return Ok(());
    }

    for title in &titles {
        println!("{}", title);
    }
    println!("\nTotal: {} titles", titles.len());

    Ok(())
}

fn show_title(db: &Path, title: &str) -> Result<()> {
    let catalog = open_catalog(db)?;
    let archives = catalog.archives_for_title(title)?;

    if archives.is_empty() {
        bail!("No archives for title: {}", title);
    }

    println!("{}", title);
    println!("{}", "=".repeat(title.chars().count()));
    println!();

    for row in &archives {
        let a = &row.record;
        println!("{}  {}", a.sha1, a.filename);
        println!("  MIDlet-Name:  {}", a.midlet_name);
        println!("  Size:         {} bytes, {} entries", a.size, a.entry_count);
        println!("  File types:   {}", a.filetypes_joined());
        println!(
            "  Models:       {} MBAC, {} M3G{}",
            a.mbac_count,
            a.m3g_count,
            if a.obfuscated { " (obfuscated)" } else { "" }
        );
        if let (Some(min), Some(max)) = (a.min_timestamp, a.max_timestamp) {
            println!("  Timestamps:   {} .. {}", min, max);
        }
        if let Some(w) = &a.widest {
            println!("  Widest:       {}x{} {}", w.width, w.height, w.path);
        }
        if let Some(t) = &a.tallest {
            println!("  Tallest:      {}x{} {}", t.width, t.height, t.path);
        }
        println!(
            "  Icon:         {}",
            a.icon.as_ref().map_or("(none)".to_string(), |i| format!("{} bytes", i.len()))
        );
        println!();
    }

    let resources = catalog.resources_for_title(title)?;
    println!("{:<42} {:<6} {:>10} {:>11}  {}", "SHA1", "TYPE", "SIZE", "DIMENSIONS", "FILENAME");
    println!("{}", "-".repeat(100));
    for r in &resources {
        let dimensions = match (r.width, r.height) {
            (Some(w), Some(h)) => format!("{}x{}", w, h),
            _ => String::new(),
        };
        println!(
            "{:<42} {:<6} {:>10} {:>11}  {}",
            r.sha1.as_str(),
            r.kind,
            r.size,
            dimensions,
            r.filename
        );
    }
    println!("\nTotal: {} resources", resources.len());

    Ok(())
}

fn dump_database(db: &Path, output: &Path) -> Result<()> {
    let conn = Connection::open_with_flags(db, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database: {}", db.display()))?;
    let sql = dump_connection(&conn)?;

    if output == Path::new("-") {
        print!("{}", sql);
    } else {
        std::fs::write(output, sql)
            .with_context(|| format!("Failed to write dump: {}", output.display()))?;
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::load_config()?;

    println!("jarcat configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Reference store: {}", cfg.reference.display());
    println!();
    println!("Scanning:");
    println!("  Uncategorized title: {}", cfg.uncategorized_title);
    println!("  Max image pixels:    {}", cfg.max_image_pixels);
    println!("  Denylist entries:    {}", cfg.denylist().len());
    println!();
    println!("Rendering:");
    println!("  Decoder:  {}", display_command(&cfg.decoder));
    println!("  Renderer: {}", display_command(&cfg.renderer));
    println!();
    println!("Asset codec:");
    println!("  Normalizer: {}", display_command(&cfg.normalizer));
    println!("  Detector:   {}", display_command(&cfg.detector));

    Ok(())
}

fn display_command(command: &[String]) -> String {
    if command.is_empty() {
        "(not configured)".to_string()
    } else {
        command.join(" ")
    }
}
