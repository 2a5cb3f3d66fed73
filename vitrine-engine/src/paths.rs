//! Physical path derivation.
//!
//! Only directory names are persisted. A container's path is its parent's
//! path joined with its directory name, and the root album maps to the
//! gallery's media root. Thumbnail and optimized renditions may live under
//! alternate roots that mirror the same relative layout.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use vitrine_core::{
    AssetSnapshot, GallerySettings, NodeId, NodeKind, RenditionKind, ValidationError,
    VitrineResult,
};

use crate::context::EngineContext;
use crate::metadata::file_stem;

/// Deepest album nesting followed before a parent chain is treated as a cycle.
pub(crate) const MAX_DEPTH: usize = 256;

const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Root directory that holds files of `kind`.
pub fn rendition_root(settings: &GallerySettings, kind: RenditionKind) -> &Path {
    let alternate = match kind {
        RenditionKind::Thumbnail => settings.thumbnail_path.as_deref(),
        RenditionKind::Optimized => settings.optimized_path.as_deref(),
        RenditionKind::Original => None,
    };
    alternate.unwrap_or(&settings.media_object_path)
}

/// Every distinct root a container's directory exists under.
pub fn directory_roots(settings: &GallerySettings) -> Vec<&Path> {
    let mut roots: Vec<&Path> = Vec::with_capacity(3);
    for kind in RenditionKind::ALL {
        let root = rendition_root(settings, kind);
        if !roots.contains(&root) {
            roots.push(root);
        }
    }
    roots
}

/// Make `name` usable as a single directory segment, at most `max_len` chars.
pub fn sanitize_directory_name(name: &str, max_len: usize) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    let truncated: String = cleaned.chars().take(max_len.max(1)).collect();
    let truncated = truncated.trim_end().to_string();
    if truncated.is_empty() {
        "Album".chars().take(max_len.max(1)).collect()
    } else {
        truncated
    }
}

/// `base`, or `base(1)`, `base(2)`, ... whichever is not among `taken`
/// (compared case-insensitively). Suffixed names are truncated so they still
/// fit in `max_len`.
pub fn unique_directory_name(base: &str, taken: &[String], max_len: usize) -> String {
    let base = sanitize_directory_name(base, max_len);
    let taken: HashSet<String> = taken.iter().map(|t| t.to_lowercase()).collect();
    if !taken.contains(&base.to_lowercase()) {
        return base;
    }
    (1..=taken.len() + 1)
        .map(|n| {
            let suffix = format!("({})", n);
            let room = max_len.saturating_sub(suffix.chars().count()).max(1);
            let head: String = base.chars().take(room).collect();
            format!("{}{}", head.trim_end(), suffix)
        })
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .unwrap_or(base)
}

/// `name`, or `stem(1).ext`, `stem(2).ext`, ... whichever is not in `taken`
/// (lowercased names).
pub fn unique_file_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(&name.to_lowercase()) {
        return name.to_string();
    }
    let stem = file_stem(name);
    let extension = &name[stem.len()..];
    (1..=taken.len() + 1)
        .map(|n| format!("{}({}){}", stem, n, extension))
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .unwrap_or_else(|| name.to_string())
}

impl EngineContext {
    /// Relative directory of a persisted container as the store knows it,
    /// walking parent ids through the snapshot tiers.
    pub(crate) fn stored_relative_dir(&self, container_id: NodeId) -> VitrineResult<PathBuf> {
        let mut segments = Vec::new();
        let mut current = Some(container_id);
        let mut depth = 0;

        while let Some(id) = current {
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(ValidationError::CircularReference {
                    id: container_id,
                    destination: id,
                }
                .into());
            }
            let AssetSnapshot::Container(snapshot) = self.fetch_snapshot(id, Some(NodeKind::Container))?
            else {
                break;
            };
            if snapshot.record.parent_id.is_some() {
                segments.push(snapshot.record.directory_name.clone());
            }
            current = snapshot.record.parent_id;
        }

        Ok(segments.iter().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_directory_name() {
        assert_eq!(sanitize_directory_name("  Summer: 2024?  ", 25), "Summer 2024");
        assert_eq!(sanitize_directory_name("a/b\\c", 25), "abc");
        assert_eq!(sanitize_directory_name("Trailing...", 25), "Trailing");
        assert_eq!(sanitize_directory_name("***", 25), "Album");
        assert_eq!(sanitize_directory_name("Very long album title", 9), "Very long");
    }

    #[test]
    fn test_unique_directory_name_appends_counter() {
        let taken = vec!["Trip".to_string(), "trip(1)".to_string()];
        assert_eq!(unique_directory_name("Trip", &taken, 25), "Trip(2)");
        assert_eq!(unique_directory_name("Other", &taken, 25), "Other");
    }

    #[test]
    fn test_unique_directory_name_respects_length() {
        let taken = vec!["Abcdef".to_string()];
        let name = unique_directory_name("Abcdef", &taken, 6);
        assert_eq!(name, "Abc(1)");
        assert!(name.chars().count() <= 6);
    }

    #[test]
    fn test_unique_file_name() {
        let taken: HashSet<String> = ["beach.jpg", "beach(1).jpg"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(unique_file_name("Beach.jpg", &taken), "Beach(2).jpg");
        assert_eq!(unique_file_name("dune.jpg", &taken), "dune.jpg");
    }

    #[test]
    fn test_rendition_roots() {
        let mut settings = GallerySettings::new(1, "/media");
        assert_eq!(directory_roots(&settings), vec![Path::new("/media")]);

        settings.thumbnail_path = Some(PathBuf::from("/thumbs"));
        assert_eq!(rendition_root(&settings, RenditionKind::Thumbnail), Path::new("/thumbs"));
        assert_eq!(rendition_root(&settings, RenditionKind::Optimized), Path::new("/media"));
        assert_eq!(
            directory_roots(&settings),
            vec![Path::new("/thumbs"), Path::new("/media")]
        );
    }
}
