use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Configuration for a test run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub jobs: usize,
    pub filter: Option<String>,
    pub timing: bool,
    pub json: Option<PathBuf>,
    pub verbose: bool,
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: num_cpus::get(),
            filter: None,
            timing: false,
            json: None,
            verbose: false,
            parallel: true,
        }
    }
}

/// Expand the command line paths into a sorted list of fixtures.
/// Directories are searched recursively for `*.ebb`; other paths may be glob
/// patterns.
pub fn discover(paths: &[PathBuf], filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            found.extend(glob_paths(&path.join("**").join("*.ebb"))?);
        } else if path.exists() {
            found.push(path.clone());
        } else {
            let matches = glob_paths(path)?;
            if matches.is_empty() {
                anyhow::bail!("no fixtures match `{}`", path.display());
            }
            found.extend(matches);
        }
    }
    found.sort();
    found.dedup();
    if let Some(filter) = filter {
        found.retain(|p| p.to_string_lossy().contains(filter));
    }
    Ok(found)
}

fn glob_paths(pattern: &Path) -> Result<Vec<PathBuf>> {
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern).with_context(|| format!("invalid pattern `{}`", pattern))?;
    paths
        .map(|entry| entry.with_context(|| format!("cannot read a match of `{}`", pattern)))
        .filter(|entry| entry.as_ref().map_or(true, |p| p.is_file()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filetests() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("filetests")
    }

    #[test]
    fn directories_are_searched_recursively() {
        let found = discover(&[filetests()], None).unwrap();
        assert!(!found.is_empty());
        assert!(found.iter().all(|p| p.extension().map_or(false, |e| e == "ebb")));
        assert!(found.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn filter_keeps_matching_paths() {
        let found = discover(&[filetests()], Some("regalloc")).unwrap();
        assert!(!found.is_empty());
        assert!(found.iter().all(|p| p.to_string_lossy().contains("regalloc")));
    }

    #[test]
    fn missing_paths_are_errors() {
        let err = discover(&[PathBuf::from("no/such/*.ebb")], None).unwrap_err();
        assert!(err.to_string().contains("no fixtures match"));
    }
}
