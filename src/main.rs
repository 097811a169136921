//! Main entry point for the inzip CLI application.
//!
//! This binary lists, reads and extracts entries of local ZIP archives and
//! edits them in place.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use inzip::cli::Command;
use inzip::{
    Cli, CompressionMethod, DosDateTime, LocalFile, OpenOptions, ZipArchive, ZipEntry,
    ZipExtractor, logging,
};

/// Application entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let options = OpenOptions::new().default_encoding(cli.encoding);

    match cli.command {
        Command::List { archive, long } => {
            let zip = open(&archive, options, false)?;
            list_files(&zip, long);
        }
        Command::Cat { archive, names } => {
            let zip = open(&archive, options, false)?;
            let extractor = ZipExtractor::new(&zip);
            let mut stdout = io::stdout().lock();
            for name in &names {
                extractor
                    .extract_to_writer(name, &mut stdout)
                    .with_context(|| format!("failed to read {name}"))?;
            }
            stdout.flush()?;
        }
        Command::Extract {
            archive,
            patterns,
            extract_dir,
            exclude,
            never_overwrite,
            overwrite,
            junk_paths,
            quiet,
        } => {
            let zip = open(&archive, options, false)?;
            let settings = ExtractSettings {
                extract_dir,
                never_overwrite,
                overwrite,
                junk_paths,
                quiet,
            };
            extract_files(&zip, &patterns, &exclude, &settings)?;
        }
        Command::Add {
            archive,
            files,
            store,
            name,
            level,
        } => {
            if name.is_some() && files.len() > 1 {
                bail!("--as needs exactly one file");
            }
            let options = options.compression_level(level);
            let mut zip = if archive.exists() {
                open(&archive, options, true)?
            } else {
                options
                    .create(LocalFile::new(&archive))
                    .with_context(|| format!("failed to create {}", archive.display()))?
            };
            let method = if store {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            for file in &files {
                let entry_name = match &name {
                    Some(name) => name.clone(),
                    None => entry_name_for(file),
                };
                add_path(&mut zip, file, entry_name, method)?;
            }
        }
        Command::Rm { archive, names } => {
            let mut zip = open(&archive, options, true)?;
            for name in &names {
                zip.delete_entry(name)
                    .with_context(|| format!("failed to delete {name}"))?;
                println!("  deleting: {name}");
            }
        }
        Command::Touch { archive, names } => {
            let mut zip = open(&archive, options, true)?;
            let now = DosDateTime::from_datetime(&Local::now().naive_local());
            for name in &names {
                let mut entry = zip
                    .entry(name)
                    .cloned()
                    .with_context(|| format!("no such entry: {name}"))?;
                entry.set_modified(now);
                zip.update_entry(&entry)?;
            }
        }
        Command::Defrag { archive } => {
            let mut zip = open(&archive, options, true)?;
            let before = fs::metadata(&archive)?.len();
            zip.defragment()
                .with_context(|| format!("failed to defragment {}", archive.display()))?;
            let after = fs::metadata(&archive)?.len();
            println!(
                "{}: {} -> {} ({} reclaimed)",
                archive.display(),
                format_size(before),
                format_size(after),
                format_size(before.saturating_sub(after))
            );
        }
    }

    Ok(())
}

fn open(path: &Path, options: OpenOptions, writable: bool) -> Result<ZipArchive<LocalFile>> {
    let store = if writable {
        LocalFile::new(path)
    } else {
        LocalFile::read_only(path)
    };
    options
        .open(store)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// List entries in the archive.
///
/// Supports two output formats:
/// - Simple format: just entry names, one per line
/// - Long format (`-l`): detailed table with size, compression ratio, and timestamps
fn list_files(zip: &ZipArchive<LocalFile>, long: bool) {
    if !long {
        for entry in zip.entries() {
            println!("{}", entry.name());
        }
        return;
    }

    // Print table header for verbose output
    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    // Track totals for summary line
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in zip.entries() {
        let (year, month, day) = entry.modified().date();
        let (hour, minute, _second) = entry.modified().time();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.size(),
            entry.compressed_size(),
            ratio(entry.compressed_size(), entry.size()),
            year,
            month,
            day,
            hour,
            minute,
            entry.name()
        );

        // Accumulate totals (excluding directories)
        if !entry.is_dir() {
            total_uncompressed += entry.size();
            total_compressed += entry.compressed_size();
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );
    if !zip.comment().is_empty() {
        println!("{}", zip.comment());
    }
}

/// Compression ratio as percentage saved.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "   0%".to_string()
    }
}

struct ExtractSettings {
    extract_dir: Option<PathBuf>,
    never_overwrite: bool,
    overwrite: bool,
    junk_paths: bool,
    quiet: bool,
}

fn extract_files(
    zip: &ZipArchive<LocalFile>,
    patterns: &[String],
    exclude: &[String],
    settings: &ExtractSettings,
) -> Result<()> {
    let extractor = ZipExtractor::new(zip);

    // Apply filters to determine which files to extract:
    // 1. Skip directories (they are created automatically during extraction)
    // 2. If specific files are requested, only include matching entries
    // 3. Exclude files matching the exclusion patterns
    let selected = zip.entries().iter().filter(|e| {
        if e.is_dir() {
            return false;
        }
        if !patterns.is_empty() && !patterns.iter().any(|p| matches_entry(p, e.name())) {
            return false;
        }
        !exclude
            .iter()
            .any(|x| e.name().contains(x.as_str()) || glob_match(x, e.name()))
    });

    for entry in selected {
        let name = entry.name();
        let Some(relative) = safe_relative_path(name, settings.junk_paths) else {
            eprintln!("Skipping: {name} (unsafe path)");
            continue;
        };
        let output_path = match &settings.extract_dir {
            Some(dir) => dir.join(relative),
            None => relative,
        };

        // Handle existing files based on overwrite options
        if output_path.exists() {
            if settings.never_overwrite {
                if !settings.quiet {
                    eprintln!("Skipping: {name} (file exists)");
                }
                continue;
            }
            if !settings.overwrite {
                if !settings.quiet {
                    eprintln!("Skipping: {name} (use -o to overwrite)");
                }
                continue;
            }
        }

        if !settings.quiet {
            println!("  extracting: {name}");
        }
        extractor
            .extract_to_file(name, &output_path)
            .with_context(|| format!("failed to extract {name}"))?;
    }

    Ok(())
}

/// Pattern with wildcards: glob match. Otherwise exact match on the full
/// name or the base name.
fn matches_entry(pattern: &str, name: &str) -> bool {
    if has_glob_chars(pattern) {
        return glob_match(pattern, name);
    }
    let basename = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    name == pattern || basename == pattern
}

/// Map an entry name to a relative output path, refusing absolute paths and
/// `..` components.
fn safe_relative_path(name: &str, junk_paths: bool) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for part in name.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part if part.contains(':') || part.contains('\\') => return None,
            part => path.push(part),
        }
    }
    if junk_paths {
        path = PathBuf::from(path.file_name()?);
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Archive name for a path given on the command line: forward slashes, no
/// leading `./` or `/`.
fn entry_name_for(path: &Path) -> String {
    let name = path.to_string_lossy().replace('\\', "/");
    let mut name = name.as_str();
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    name.to_string()
}

fn add_path(
    zip: &mut ZipArchive<LocalFile>,
    path: &Path,
    name: String,
    method: CompressionMethod,
) -> Result<()> {
    let metadata = fs::metadata(path).with_context(|| format!("cannot read {}", path.display()))?;
    let modified = metadata
        .modified()
        .map(|t| DosDateTime::from_datetime(&DateTime::<Local>::from(t).naive_local()))
        .unwrap_or_default();

    if metadata.is_dir() {
        let dir = ZipEntry::directory(name.trim_end_matches('/')).with_modified(modified);
        let dir_name = dir.name().to_string();
        if zip.entry(&dir_name).is_none() {
            zip.add_entry(dir)?;
            println!("  adding: {dir_name}");
        }

        let mut children: Vec<_> = fs::read_dir(path)?.collect::<io::Result<_>>()?;
        children.sort_by_key(|c| c.file_name());
        for child in children {
            let child_name = format!("{dir_name}{}", child.file_name().to_string_lossy());
            add_path(zip, &child.path(), child_name, method)?;
        }
        return Ok(());
    }

    let verb = if zip.entry(&name).is_some() {
        zip.delete_entry(&name)?;
        "updating"
    } else {
        "adding"
    };

    let mut entry = ZipEntry::new(name.as_str())
        .with_method(method)
        .with_modified(modified);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        entry = entry.with_unix_mode(metadata.permissions().mode());
    }

    let mut input = fs::File::open(path)?;
    if let Some(mut writer) = zip.add_entry(entry)? {
        io::copy(&mut input, &mut writer)
            .with_context(|| format!("failed to write {}", path.display()))?;
        writer.finish()?;
    }
    println!("  {verb}: {name}");
    Ok(())
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Match an entry name against `*` and `?` wildcards. `*` may span `/`.
///
/// Backtracks only to the most recent `*`, so long names with many
/// wildcards stay linear in practice.
fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    // (pattern index after the star, name index it was tried at)
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p + 1, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((after, tried)) => {
                    star = Some((after, tried + 1));
                    p = after;
                    n = tried + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Archive sizes for the defrag summary.
fn format_size(size: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if size < 1024 {
        return format!("{size} bytes");
    }
    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(!glob_match("*.txt", "readme.md"));
        assert!(glob_match("docs/*/*.md", "docs/api/intro.md"));
        assert!(glob_match("*a*b", "xxaxxab"));
        assert!(glob_match("**", ""));
        assert!(!glob_match("?", ""));
        assert!(!glob_match("a*c", "abcd"));
        assert!(has_glob_chars("img?.png") && !has_glob_chars("img.png"));
    }

    #[test]
    fn ratio_column_has_fixed_width() {
        assert_eq!(ratio(0, 0), "   0%");
        assert_eq!(ratio(50, 100), "  50%");
        assert_eq!(ratio(0, 0).len(), ratio(1, 3).len());
    }

    #[test]
    fn entry_matching() {
        assert!(matches_entry("readme.txt", "docs/readme.txt"));
        assert!(matches_entry("docs/*", "docs/readme.txt"));
        assert!(!matches_entry("notes.txt", "docs/readme.txt"));
    }

    #[test]
    fn unsafe_paths_are_refused() {
        assert_eq!(safe_relative_path("a/b.txt", false), Some(PathBuf::from("a/b.txt")));
        assert_eq!(safe_relative_path("a/b.txt", true), Some(PathBuf::from("b.txt")));
        assert_eq!(safe_relative_path("/etc/passwd", false), Some(PathBuf::from("etc/passwd")));
        assert_eq!(safe_relative_path("../evil", false), None);
        assert_eq!(safe_relative_path("C:/x", false), None);
    }

    #[test]
    fn names_from_paths() {
        assert_eq!(entry_name_for(Path::new("./docs/a.txt")), "docs/a.txt");
        assert_eq!(entry_name_for(Path::new("/tmp/a.txt")), "tmp/a.txt");
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(5 << 40), "5120.00 GB");
    }
}
