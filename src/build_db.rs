//! Compile-flag extraction from a `compile_commands.json` build database.
//!
//! When the watched source belongs to a larger project, the bare configured
//! flags rarely suffice; the build database records what the real build
//! used. [`find_database`] walks upward from the source file looking in the
//! usual places, and [`flags_for`] pulls the entry for the source file,
//! keeping include paths (made absolute against the entry's directory),
//! defines, and the dialect/codegen flags worth replaying.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Search upward from `start` for a build database.
///
/// For each ancestor directory the well-known spots are checked:
/// `compile_commands.json` directly, then under `build/`, `out/`, and
/// `debug/`.
pub fn find_database(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    let mut dir = if start.is_dir() {
        Some(start.as_path())
    } else {
        start.parent()
    };
    while let Some(current) = dir {
        for candidate in [
            current.join("compile_commands.json"),
            current.join("build").join("compile_commands.json"),
            current.join("out").join("compile_commands.json"),
            current.join("debug").join("compile_commands.json"),
        ] {
            if candidate.exists() {
                return Some(candidate);
            }
        }
        dir = current.parent();
    }
    None
}

/// Extract the replayable flags for `source` from the database at `db_path`.
///
/// Returns an empty list when the database is unreadable or has no entry
/// for the file; the pipeline then falls back to configured flags alone.
pub fn flags_for(source: &Path, db_path: &Path) -> Vec<String> {
    let text = match std::fs::read_to_string(db_path) {
        Ok(text) => text,
        Err(err) => {
            warn!(db = %db_path.display(), %err, "cannot read build database");
            return Vec::new();
        }
    };
    let entries: serde_json::Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(err) => {
            warn!(db = %db_path.display(), %err, "cannot parse build database");
            return Vec::new();
        }
    };
    let Some(entries) = entries.as_array() else {
        warn!(db = %db_path.display(), "build database is not an array");
        return Vec::new();
    };

    let abs_source = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());

    for entry in entries {
        let dir = PathBuf::from(entry.get("directory").and_then(|v| v.as_str()).unwrap_or("."));
        let Some(file) = entry.get("file").and_then(|v| v.as_str()) else {
            continue;
        };
        let entry_file = dir.join(file);
        let entry_file = entry_file.canonicalize().unwrap_or(entry_file);
        if entry_file != abs_source {
            continue;
        }
        let Some(command) = entry.get("command").and_then(|v| v.as_str()) else {
            continue;
        };
        let flags = extract_flags(command, &dir);
        debug!(source = %source.display(), ?flags, "flags from build database");
        return flags;
    }

    Vec::new()
}

/// Keep `-I` (absolutized), `-D`, `-std`, `-f`, and `-m` flags from a
/// recorded compile command, skipping the program name.
fn extract_flags(command: &str, entry_dir: &Path) -> Vec<String> {
    let mut flags = Vec::new();
    for arg in split_command(command).into_iter().skip(1) {
        if let Some(include) = arg.strip_prefix("-I") {
            let path = Path::new(include);
            if path.is_absolute() {
                flags.push(arg);
            } else {
                let absolute = entry_dir.join(path);
                let absolute = absolute.canonicalize().unwrap_or(absolute);
                flags.push(format!("-I{}", absolute.display()));
            }
        } else if ["-D", "-std", "-f", "-m"]
            .iter()
            .any(|prefix| arg.starts_with(prefix))
        {
            flags.push(arg);
        }
    }
    flags
}

/// Split a recorded shell command into words, honoring single and double
/// quotes. Recorded commands are plain argv joins, so this does not need a
/// full shell grammar.
fn split_command(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
