//! Driver and LLVM version detection cache. Callers hand in the probe
//! result parser; the cache memoizes per inspected file, keyed by the
//! file's modification time, so cold starts re-parse and nothing else
//! does. The cache is process-wide behind a mutex and is strictly an
//! optimization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;

fn cache() -> &'static Mutex<HashMap<PathBuf, (Option<SystemTime>, u32)>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, (Option<SystemTime>, u32)>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Look up the version of `path`, re-running `probe` only when the file
/// changed since the cached answer
pub fn detect_version(path: &Path, probe: impl FnOnce(&Path) -> Option<u32>) -> Option<u32> {
    let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
    if let Ok(cache) = cache().lock() {
        if let Some(&(cached_mtime, version)) = cache.get(path) {
            if cached_mtime == mtime {
                return Some(version);
            }
        }
    }
    let version = probe(path)?;
    if let Ok(mut cache) = cache().lock() {
        cache.insert(path.to_path_buf(), (mtime, version));
    }
    Some(version)
}

/// Parse the version triple out of `llvm-config --version`-style output
/// into `major*10000 + minor*100 + patch`
pub fn parse_llvm_version(text: &str) -> Option<u32> {
    let mut parts = text.trim().split('.');
    let major: u32 = parts.next()?.trim().parse().ok()?;
    let minor: u32 = parts
        .next()
        .and_then(|p| {
            p.trim_end_matches(|c: char| !c.is_ascii_digit())
                .parse()
                .ok()
        })
        .unwrap_or(0);
    let patch: u32 = parts
        .next()
        .and_then(|p| {
            p.trim_end_matches(|c: char| !c.is_ascii_digit())
                .parse()
                .ok()
        })
        .unwrap_or(0);
    Some(major * 10000 + minor * 100 + patch)
}

/// Parse the Mesa version out of a `version: 17.0.2 (git-...)` style
/// string into the same `major*10000 + minor*100 + patch` form
pub fn parse_mesa_version(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let version: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    parse_llvm_version(&version)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_version_parsers() {
        assert_eq!(parse_llvm_version("3.9.1"), Some(30901));
        assert_eq!(parse_llvm_version("4.0.0svn"), Some(40000));
        assert_eq!(parse_llvm_version("15.0"), Some(150000));
        assert_eq!(parse_llvm_version("x"), None);
        assert_eq!(parse_mesa_version("Mesa 17.0.2 (git-f0ba7d8)"), Some(170002));
        assert_eq!(parse_mesa_version("no digits"), None);
    }

    #[test]
    fn test_cache_memoizes_per_path() {
        let calls = AtomicU32::new(0);
        let path = Path::new("/nonexistent/llvm-config-for-cache-test");
        let probe = |_: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(30901)
        };
        assert_eq!(detect_version(path, probe), Some(30901));
        assert_eq!(detect_version(path, probe), Some(30901));
        // second lookup was served from the cache
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
