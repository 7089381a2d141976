//! tarctl - List, extract and create tar archives.
//!
//! A thin front end over the `tar-codec` facade. Archives are read from and
//! written to files, or to stdin/stdout when given as `-`.

use std::{
    fs::File,
    io::{self, IsTerminal, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

use tar_codec::{
    fs::HostFileSystem, ArchiveOptions, Entry, NameEncoding, Ownership, TarBuilder, TarExtractor,
    DEFAULT_BLOCK_FACTOR,
};

/// List, extract and create tar archives.
#[derive(Parser, Debug)]
#[command(name = "tarctl", version, about)]
struct App {
    #[command(flatten)]
    format: FormatOptions,

    #[command(subcommand)]
    cmd: Command,
}

/// Options describing the archive format.
#[derive(Args, Debug)]
struct FormatOptions {
    /// Number of 512-byte blocks per record.
    #[arg(long, short = 'b', global = true, default_value_t = DEFAULT_BLOCK_FACTOR)]
    block_factor: usize,

    /// Store and read names as Latin-1 instead of UTF-8.
    #[arg(long, global = true)]
    latin1: bool,

    /// Translate line endings of text files.
    #[arg(long, global = true)]
    ascii: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the entries of an archive
    List {
        /// The archive (use `-` for stdin)
        #[arg(default_value = "-")]
        archive: PathBuf,
    },
    /// Extract an archive into a directory
    Extract {
        /// The archive (use `-` for stdin)
        archive: PathBuf,
        /// Destination directory
        #[arg(long, short = 'C', default_value = ".")]
        directory: PathBuf,
        /// Allow entries to be extracted outside of the destination
        #[arg(long)]
        allow_parent_traversal: bool,
        /// Don't overwrite existing files
        #[arg(long, short = 'k')]
        keep_old_files: bool,
    },
    /// Create an archive from files and directories
    Create {
        /// The archive to write (use `-` for stdout)
        archive: PathBuf,
        /// Files and directories to add
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Don't descend into directories
        #[arg(long)]
        no_recurse: bool,
        /// Remove this leading directory from entry names
        #[arg(long)]
        root_path: Option<String>,
        /// Directory to put in front of entry names
        #[arg(long)]
        prefix: Option<String>,
        /// Owner stamped on every entry, as UID:NAME
        #[arg(long, value_parser = parse_id_name, requires = "group")]
        owner: Option<(u64, String)>,
        /// Group stamped on every entry, as GID:NAME
        #[arg(long, value_parser = parse_id_name, requires = "owner")]
        group: Option<(u64, String)>,
    },
}

/// Parse `ID:NAME`; the name may be empty.
fn parse_id_name(value: &str) -> Result<(u64, String)> {
    let Some((id, name)) = value.split_once(':') else {
        bail!("expected ID:NAME, got {value:?}");
    };
    let id = id
        .parse()
        .with_context(|| format!("invalid numeric id {id:?}"))?;
    Ok((id, name.to_owned()))
}

impl FormatOptions {
    fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            name_encoding: if self.latin1 {
                NameEncoding::Latin1
            } else {
                NameEncoding::Utf8
            },
            block_factor: self.block_factor,
            ascii_translate: self.ascii,
            ..ArchiveOptions::default()
        }
    }
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("Failed to open archive: {path:?}"))?;
    Ok(Box::new(file))
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        if stdout.is_terminal() {
            bail!("Refusing to write an archive to a terminal. Redirect stdout or use a file path.");
        }
        return Ok(Box::new(stdout.lock()));
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create archive: {path:?}"))?;
    Ok(Box::new(file))
}

fn spinner() -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} entries: {wide_msg}") {
        progress.set_style(style);
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Progress callback advancing `progress` and printing skip messages.
fn report_to(progress: &ProgressBar) -> impl FnMut(&Entry, Option<&str>) + 'static {
    let progress = progress.clone();
    move |entry, message| match message {
        Some(message) => progress.println(format!("{}: {message}", entry.name())),
        None => {
            progress.inc(1);
            progress.set_message(entry.name().to_owned());
        }
    }
}

fn list(options: ArchiveOptions, archive: &Path) -> Result<()> {
    let mut extractor = TarExtractor::with_options(open_input(archive)?, options)?;
    let entries = extractor
        .list()
        .with_context(|| format!("Failed to read archive: {archive:?}"))?;

    let mut out = io::stdout().lock();
    for entry in entries {
        write!(
            out,
            "{:06o} {}/{} {:>10} {:>12} {}",
            entry.mode() & 0o7777,
            owner_label(entry.user_name(), entry.uid()),
            owner_label(entry.group_name(), entry.gid()),
            entry.size(),
            entry.mtime(),
            entry.name()
        )?;
        if entry.type_flag().is_link() {
            write!(out, " -> {}", entry.link_name())?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn owner_label(name: &str, id: u64) -> String {
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_owned()
    }
}

fn extract(
    options: ArchiveOptions,
    archive: &Path,
    directory: &Path,
    allow_parent_traversal: bool,
) -> Result<()> {
    let mut extractor = TarExtractor::with_options(open_input(archive)?, options)?;
    let progress = spinner();
    extractor.set_progress(report_to(&progress));
    let result = extractor
        .extract_with(directory, allow_parent_traversal)
        .with_context(|| format!("Failed to extract {archive:?} into {directory:?}"));
    progress.finish_and_clear();
    result
}

fn create(
    options: ArchiveOptions,
    archive: &Path,
    paths: &[PathBuf],
    recurse: bool,
    user_info: Option<Ownership>,
) -> Result<()> {
    let mut builder = TarBuilder::with_options(open_output(archive)?, options)?;
    builder.set_user_info(user_info);
    let progress = spinner();
    builder.set_progress(report_to(&progress));

    let result = paths.iter().try_for_each(|path| {
        let entry = Entry::from_path(&HostFileSystem, path)
            .with_context(|| format!("Failed to examine {path:?}"))?;
        debug!("adding {path:?} as {:?}", entry.name());
        builder
            .write_entry(&entry, recurse)
            .with_context(|| format!("Failed to archive {path:?}"))
    });
    progress.finish_and_clear();
    result?;

    builder
        .finish()
        .with_context(|| format!("Failed to finish archive: {archive:?}"))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = App::parse();
    let mut options = args.format.archive_options();

    match args.cmd {
        Command::List { archive } => list(options, &archive),
        Command::Extract {
            archive,
            directory,
            allow_parent_traversal,
            keep_old_files,
        } => {
            options.keep_old_files = keep_old_files;
            extract(options, &archive, &directory, allow_parent_traversal)
        }
        Command::Create {
            archive,
            paths,
            no_recurse,
            root_path,
            prefix,
            owner,
            group,
        } => {
            options.root_path = root_path;
            options.path_prefix = prefix;
            let user_info = owner.zip(group).map(|((uid, user_name), (gid, group_name))| {
                Ownership {
                    uid,
                    user_name,
                    gid,
                    group_name,
                }
            });
            create(options, &archive, &paths, !no_recurse, user_info)
        }
    }
}
