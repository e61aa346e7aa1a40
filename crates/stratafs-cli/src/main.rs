//! stratafs command-line tool.
//!
//! Packs host directories into stratafs roots and inspects existing ones.
//!
//! Usage:
//!   stratafs pack assets/ game.pak --provider pack --compression deflate
//!   stratafs list game.pak --long
//!   stratafs cat game.pak /characters/hero.txt
//!   stratafs extract game.pak out/
//!
//! Passwords are read from the environment variable named in the config
//! (`STRATAFS_PASSWORD` by default).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use stratafs_core::{
    Compression, FileSystem, FolderProvider, PackProvider, ProviderOptions, VfsConfig, VfsContext,
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Virtual file system packer and inspector.
#[derive(Parser, Debug)]
#[command(name = "stratafs")]
#[command(about = "Pack, list and extract stratafs roots")]
struct Args {
    /// RON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider name; defaults to `pack` for files, `folder` for directories
    #[arg(short, long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pack a host directory into a new root
    Pack {
        /// Host directory to read
        source: PathBuf,
        /// Physical root to write
        target: PathBuf,
        /// Payload compression for pack providers
        #[arg(long)]
        compression: Option<Compression>,
        /// Deflate level, 0-9
        #[arg(long)]
        level: Option<u32>,
    },
    /// List the files in a root
    List {
        root: PathBuf,
        /// Show sizes, offsets and timestamps
        #[arg(short, long)]
        long: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write one file's decoded bytes to stdout
    Cat { root: PathBuf, path: String },
    /// Copy every file of a root into a host directory
    Extract { root: PathBuf, dest: PathBuf },
    /// Summarize a root
    Info { root: PathBuf },
    /// List registered providers
    Providers {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => VfsConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => VfsConfig::default(),
    };
    let context = VfsContext::from_config(&config)?;
    let options = ProviderOptions::from_config(&config);

    match args.command {
        Command::Pack {
            source,
            target,
            compression,
            level,
        } => {
            let mut options = options;
            options.compression = compression;
            if let Some(level) = level {
                options.compression_level = level;
            }
            let provider = match &args.provider {
                Some(name) => name.clone(),
                None => config.provider.clone(),
            };
            pack(&context, &provider, &options, &source, &target)
        }
        Command::List { root, long, json } => {
            let fs = open(&context, args.provider.as_deref(), &options, &root)?;
            list(&fs, long, json)
        }
        Command::Cat { root, path } => {
            let fs = open(&context, args.provider.as_deref(), &options, &root)?;
            let data = fs
                .read_file(&path)
                .with_context(|| format!("failed to read {path}"))?;
            std::io::stdout().lock().write_all(&data)?;
            Ok(())
        }
        Command::Extract { root, dest } => {
            let fs = open(&context, args.provider.as_deref(), &options, &root)?;
            extract(&fs, &dest)
        }
        Command::Info { root } => {
            let fs = open(&context, args.provider.as_deref(), &options, &root)?;
            print_info(&fs, &root);
            Ok(())
        }
        Command::Providers { json } => {
            let providers = context.providers();
            if json {
                println!("{}", serde_json::to_string_pretty(&providers)?);
            } else {
                let default = context.default_provider().unwrap_or_default();
                for p in providers {
                    let marker = if p.name == default { "*" } else { " " };
                    println!("{marker} {:<14} {}", p.name, p.description);
                }
            }
            Ok(())
        }
    }
}

/// Mount an existing root, guessing the provider from what is on disk.
fn open(
    context: &VfsContext,
    provider: Option<&str>,
    options: &ProviderOptions,
    root: &Path,
) -> Result<Arc<FileSystem>> {
    let provider = match provider {
        Some(name) => name,
        None if root.is_file() => PackProvider::NAME,
        None => FolderProvider::NAME,
    };
    let fs = context.create_file_system("input", provider, options)?;
    fs.set_root(root)
        .with_context(|| format!("failed to open {}", root.display()))?;
    fs.mount_all()
        .with_context(|| format!("failed to mount {}", root.display()))?;
    Ok(fs)
}

fn pack(
    context: &VfsContext,
    provider: &str,
    options: &ProviderOptions,
    source: &Path,
    target: &Path,
) -> Result<()> {
    if !source.is_dir() {
        bail!("{} is not a directory", source.display());
    }
    let fs = context.create_file_system("output", provider, options)?;

    let mut pending = vec![source.to_path_buf()];
    let mut count = 0usize;
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
            let host = entry?.path();
            if host.is_dir() {
                pending.push(host);
                continue;
            }
            let virtual_path = virtual_path(source, &host)?;
            let data = fs::read(&host).with_context(|| format!("failed to read {}", host.display()))?;
            fs.write_file(&virtual_path, &data)?;
            debug!(path = %virtual_path, size = data.len(), "added");
            count += 1;
        }
    }

    fs.save(target)
        .with_context(|| format!("failed to save {}", target.display()))?;
    info!(
        files = count,
        size = fs.total_size(false),
        stored = fs.total_size(true),
        target = %target.display(),
        "packed"
    );
    Ok(())
}

/// `source/a/b.txt` → `/a/b.txt`.
fn virtual_path(source: &Path, host: &Path) -> Result<String> {
    let relative = host.strip_prefix(source)?;
    let mut path = String::new();
    for component in relative.components() {
        let segment = component
            .as_os_str()
            .to_str()
            .with_context(|| format!("{} is not valid UTF-8", host.display()))?;
        path.push('/');
        path.push_str(segment);
    }
    Ok(path)
}

fn list(fs: &FileSystem, long: bool, json: bool) -> Result<()> {
    let files = fs.files();
    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }
    for file in files {
        if long {
            println!(
                "{:>10} {:>10} {:>10} {} {}{}",
                file.size,
                file.compressed_size,
                file.offset,
                file.timestamp.format("%Y-%m-%d %H:%M"),
                file.full_path,
                if file.is_encrypted { " (encrypted)" } else { "" },
            );
        } else {
            println!("{}", file.full_path);
        }
    }
    Ok(())
}

fn extract(fs: &FileSystem, dest: &Path) -> Result<()> {
    let files = fs.files();
    for file in &files {
        let host = file
            .full_path
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(dest.to_path_buf(), |acc, segment| acc.join(segment));
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = fs
            .read_file(&file.full_path)
            .with_context(|| format!("failed to read {}", file.full_path))?;
        fs::write(&host, data).with_context(|| format!("failed to write {}", host.display()))?;
    }
    info!(files = files.len(), dest = %dest.display(), "extracted");
    Ok(())
}

fn print_info(fs: &FileSystem, root: &Path) {
    let files = fs.files();
    let size = fs.total_size(false);
    let stored = fs.total_size(true);
    println!("root:       {}", root.display());
    println!("provider:   {}", fs.provider_name());
    println!("files:      {}", files.len());
    println!("size:       {size}");
    println!("stored:     {stored}");
    if size > 0 {
        println!("ratio:      {:.1}%", stored as f64 * 100.0 / size as f64);
    }
    println!(
        "encrypted:  {}",
        files.iter().filter(|f| f.is_encrypted).count()
    );
}
