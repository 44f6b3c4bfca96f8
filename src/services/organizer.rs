//! Moves a reconciled episode file into the library tree and writes its
//! sibling `.nfo` metadata stub.
//!
//! Grounded on the original resolver's `organizer` module: destination path
//! is `library_root/<safe-title>/Season NN/<safe-title> - SNNENN.ext`, where
//! `safe-title` replaces path separators with " - " and a display title has
//! any trailing season token stripped first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Strips a trailing season marker ("Season 2", "S2", "第2季", ...) so the
/// library folder name doesn't duplicate the season subdirectory.
#[must_use]
pub fn display_title(title: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\s*(?:season\s?\d+|s\d+|\d+(?:st|nd|rd|th)\s+season|第\s?\d+\s?[季期])\s*$")
            .expect("static regex pattern is valid")
    });
    re.replace(title, "").trim().to_string()
}

/// Replaces path separators (forward slash, fullwidth slash, backslash) with
/// " - " and squeezes whitespace, so a title can never escape its intended
/// directory.
#[must_use]
pub fn safe_name(title: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let replaced = title.replace(['/', '／', '\\'], " - ");
    whitespace.replace_all(replaced.trim(), " ").into_owned()
}

#[derive(Debug, Clone)]
pub struct OrganizedFile {
    pub destination: PathBuf,
    pub nfo_path: PathBuf,
}

/// Moves `source` into `library_root/<safe-title>/Season NN/<safe-title> -
/// SNNENN.ext` and writes a minimal Kodi/Jellyfin-compatible `.nfo` next to
/// it. Returns the final paths.
pub async fn organize_file(
    library_root: &Path,
    show_title: &str,
    season: i32,
    ep_no: i32,
    source: &Path,
) -> Result<OrganizedFile> {
    let safe = safe_name(&display_title(show_title));
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mkv");

    let season_dir = library_root.join(&safe).join(format!("Season {season:02}"));
    tokio::fs::create_dir_all(&season_dir)
        .await
        .with_context(|| format!("creating {season_dir:?}"))?;

    let stem = format!("{safe} - S{season:02}E{ep_no:02}");
    let destination = season_dir.join(format!("{stem}.{ext}"));
    let nfo_path = season_dir.join(format!("{stem}.nfo"));

    tokio::fs::rename(source, &destination)
        .await
        .with_context(|| format!("moving {source:?} to {destination:?}"))?;

    let nfo = format!(
        "<episodedetails>\n  <plot></plot>\n  <lockdata>false</lockdata>\n  <title>{stem}</title>\n  <showtitle>{safe}</showtitle>\n  <episode>{ep_no}</episode>\n  <season>{season}</season>\n</episodedetails>\n"
    );
    tokio::fs::write(&nfo_path, nfo)
        .await
        .with_context(|| format!("writing {nfo_path:?}"))?;

    Ok(OrganizedFile {
        destination,
        nfo_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_season_suffix() {
        assert_eq!(display_title("Frieren Season 2"), "Frieren");
        assert_eq!(display_title("Frieren S2"), "Frieren");
        assert_eq!(display_title("Frieren"), "Frieren");
    }

    #[test]
    fn replaces_path_separators() {
        assert_eq!(safe_name("Attack/Titan"), "Attack - Titan");
        assert_eq!(safe_name("A\\B／C"), "A - B - C");
        assert_eq!(safe_name("Normal Title"), "Normal Title");
    }

    #[test]
    fn squeezes_internal_whitespace() {
        assert_eq!(safe_name("A   B\tC"), "A B C");
    }
}
