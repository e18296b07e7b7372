//! Script discovery
//!
//! Scripts come from two places: files in the script directory with a
//! recognised extension (sorted by file name), then entries of the optional
//! manifest file in file order. Priority is decided per script:
//!
//! 1. an explicit `<priority> <path>` manifest entry,
//! 2. the leading digits of the file name (`10-network.sh` runs at 10),
//! 3. the configured default priority.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::scripts::script::Script;

/// Where to look for scripts
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Directory scanned for scripts
    pub script_dir: PathBuf,

    /// Optional manifest listing additional script paths
    pub manifest: Option<PathBuf>,

    /// File extensions (without the dot) picked up by the directory scan
    pub extensions: Vec<String>,

    /// Priority of scripts that carry none
    pub default_priority: i64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from("/usr/share/spirit-box"),
            manifest: Some(PathBuf::from("/usr/share/spirit-box/scripts")),
            extensions: vec!["sh".to_string()],
            default_priority: 100,
        }
    }
}

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub priority: Option<i64>,
    pub path: PathBuf,
}

/// Discover every script, in discovery order
pub async fn discover(options: &DiscoveryOptions) -> Vec<Script> {
    let mut scripts = scan_dir(options).await;

    let Some(manifest) = &options.manifest else {
        return scripts;
    };

    let manifest = File::new(manifest);
    if !manifest.exists().await {
        info!("No script manifest at {}", manifest.path().display());
        return scripts;
    }

    let contents = match manifest.read_string().await {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Unable to read script manifest {}: {}", manifest.path().display(), e);
            return scripts;
        }
    };

    for entry in parse_manifest(&contents) {
        let path = if entry.path.is_absolute() {
            entry.path
        } else {
            options.script_dir.join(entry.path)
        };

        if scripts.iter().any(|s| s.path == path) {
            debug!("Manifest entry {} already discovered", path.display());
            continue;
        }

        let priority = entry
            .priority
            .unwrap_or_else(|| priority_of(&path, options.default_priority));

        if File::new(&path).exists().await {
            scripts.push(Script::new(path, priority));
        } else {
            warn!("Script does not exist: {}", path.display());
            scripts.push(Script::failed(path, priority, "script does not exist"));
        }
    }

    scripts
}

async fn scan_dir(options: &DiscoveryOptions) -> Vec<Script> {
    let dir = Dir::new(&options.script_dir);
    if !dir.exists().await {
        info!("No script directory at {}", dir.path().display());
        return Vec::new();
    }

    let files = match dir.list_files().await {
        Ok(files) => files,
        Err(e) => {
            warn!("Unable to list scripts in {}: {}", dir.path().display(), e);
            return Vec::new();
        }
    };

    files
        .into_iter()
        .filter(|path| has_extension(path, &options.extensions))
        .map(|path| {
            let priority = priority_of(&path, options.default_priority);
            Script::new(path, priority)
        })
        .collect()
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.trim_start_matches('.') == ext))
        .unwrap_or(false)
}

/// Priority from the leading digits of the file name
pub fn priority_of(path: &Path, default_priority: i64) -> i64 {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return default_priority;
    };
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(default_priority)
}

/// Parse manifest contents: `path` or `<priority> path` per line
pub fn parse_manifest(contents: &str) -> Vec<ManifestEntry> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            if let Some((first, rest)) = line.split_once(char::is_whitespace) {
                if let Ok(priority) = first.parse::<i64>() {
                    return ManifestEntry {
                        priority: Some(priority),
                        path: PathBuf::from(rest.trim()),
                    };
                }
            }
            ManifestEntry {
                priority: None,
                path: PathBuf::from(line),
            }
        })
        .collect()
}
