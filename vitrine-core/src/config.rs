//! Configuration types
//!
//! Two layers: [`GallerySettings`] are per-gallery values persisted as
//! name/value pairs in the record store, and [`EngineConfig`] is the
//! process-wide configuration read from the environment at startup.

use crate::{ConfigError, GalleryId, MetadataDefinition, MetadataKind, VitrineError, VitrineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// GALLERY SETTINGS
// ============================================================================

/// Names of the persisted gallery settings.
///
/// Every stored pair is routed through [`GallerySettings::apply`], which
/// matches on this enum exhaustively; adding a variant without a setter is a
/// compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingName {
    MediaObjectPath,
    ThumbnailPath,
    OptimizedPath,
    ThumbnailFilePrefix,
    OptimizedFilePrefix,
    ExtractMetadata,
    DefaultAlbumSortKind,
    DefaultAlbumSortAscending,
    MaxDirectoryNameLength,
    MetadataDisplaySettings,
}

impl SettingName {
    pub const ALL: [SettingName; 10] = [
        SettingName::MediaObjectPath,
        SettingName::ThumbnailPath,
        SettingName::OptimizedPath,
        SettingName::ThumbnailFilePrefix,
        SettingName::OptimizedFilePrefix,
        SettingName::ExtractMetadata,
        SettingName::DefaultAlbumSortKind,
        SettingName::DefaultAlbumSortAscending,
        SettingName::MaxDirectoryNameLength,
        SettingName::MetadataDisplaySettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingName::MediaObjectPath => "MediaObjectPath",
            SettingName::ThumbnailPath => "ThumbnailPath",
            SettingName::OptimizedPath => "OptimizedPath",
            SettingName::ThumbnailFilePrefix => "ThumbnailFilePrefix",
            SettingName::OptimizedFilePrefix => "OptimizedFilePrefix",
            SettingName::ExtractMetadata => "ExtractMetadata",
            SettingName::DefaultAlbumSortKind => "DefaultAlbumSortKind",
            SettingName::DefaultAlbumSortAscending => "DefaultAlbumSortAscending",
            SettingName::MaxDirectoryNameLength => "MaxDirectoryNameLength",
            SettingName::MetadataDisplaySettings => "MetadataDisplaySettings",
        }
    }
}

impl fmt::Display for SettingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SettingName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownSetting {
                name: s.to_string(),
            })
    }
}

/// Typed settings of one gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GallerySettings {
    pub gallery_id: GalleryId,
    /// Root directory of the gallery's albums and originals.
    pub media_object_path: PathBuf,
    /// Alternate root for thumbnail files; `None` stores them beside the originals.
    pub thumbnail_path: Option<PathBuf>,
    /// Alternate root for optimized files; `None` stores them beside the originals.
    pub optimized_path: Option<PathBuf>,
    pub thumbnail_file_prefix: String,
    pub optimized_file_prefix: String,
    pub extract_metadata: bool,
    pub default_album_sort_kind: MetadataKind,
    pub default_album_sort_ascending: bool,
    pub max_directory_name_length: usize,
    pub metadata_definitions: Vec<MetadataDefinition>,
}

impl GallerySettings {
    pub fn new(gallery_id: GalleryId, media_object_path: impl Into<PathBuf>) -> Self {
        Self {
            gallery_id,
            media_object_path: media_object_path.into(),
            thumbnail_path: None,
            optimized_path: None,
            thumbnail_file_prefix: "zThumb_".to_string(),
            optimized_file_prefix: "zOpt_".to_string(),
            extract_metadata: true,
            default_album_sort_kind: MetadataKind::DateAdded,
            default_album_sort_ascending: true,
            max_directory_name_length: 25,
            metadata_definitions: MetadataDefinition::defaults(),
        }
    }

    /// Build settings from stored name/value pairs on top of the defaults.
    pub fn from_pairs<'a, I>(gallery_id: GalleryId, pairs: I) -> VitrineResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Self::new(gallery_id, PathBuf::new());
        for (name, value) in pairs {
            let name: SettingName = name.parse()?;
            settings.apply(name, value)?;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Assign one stored value to its typed field.
    pub fn apply(&mut self, name: SettingName, value: &str) -> VitrineResult<()> {
        match name {
            SettingName::MediaObjectPath => self.media_object_path = PathBuf::from(value),
            SettingName::ThumbnailPath => self.thumbnail_path = optional_path(value),
            SettingName::OptimizedPath => self.optimized_path = optional_path(value),
            SettingName::ThumbnailFilePrefix => self.thumbnail_file_prefix = value.to_string(),
            SettingName::OptimizedFilePrefix => self.optimized_file_prefix = value.to_string(),
            SettingName::ExtractMetadata => self.extract_metadata = parse_bool(name, value)?,
            SettingName::DefaultAlbumSortKind => {
                self.default_album_sort_kind =
                    value.parse().map_err(|reason| invalid(name, value, reason))?;
            }
            SettingName::DefaultAlbumSortAscending => {
                self.default_album_sort_ascending = parse_bool(name, value)?;
            }
            SettingName::MaxDirectoryNameLength => {
                self.max_directory_name_length = value
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid(name, value, e.to_string()))?;
            }
            SettingName::MetadataDisplaySettings => {
                let mut defs: Vec<MetadataDefinition> = serde_json::from_str(value)
                    .map_err(|e| invalid(name, value, e.to_string()))?;
                defs.sort_by_key(|d| d.sequence);
                self.metadata_definitions = defs;
            }
        }
        Ok(())
    }

    /// Validate the settings.
    ///
    /// Validates:
    /// - media_object_path is not empty
    /// - max_directory_name_length > 0
    /// - thumbnail and optimized prefixes differ
    pub fn validate(&self) -> VitrineResult<()> {
        if self.media_object_path.as_os_str().is_empty() {
            return Err(VitrineError::Config(ConfigError::MissingRequired {
                field: SettingName::MediaObjectPath.to_string(),
            }));
        }

        if self.max_directory_name_length == 0 {
            return Err(VitrineError::Config(ConfigError::InvalidValue {
                field: SettingName::MaxDirectoryNameLength.to_string(),
                value: "0".to_string(),
                reason: "max_directory_name_length must be greater than 0".to_string(),
            }));
        }

        if self.thumbnail_file_prefix == self.optimized_file_prefix {
            return Err(VitrineError::Config(ConfigError::InvalidValue {
                field: SettingName::OptimizedFilePrefix.to_string(),
                value: self.optimized_file_prefix.clone(),
                reason: "thumbnail and optimized prefixes must differ".to_string(),
            }));
        }

        Ok(())
    }

    /// Definition for a metadata kind, if the gallery defines one.
    pub fn definition(&self, kind: MetadataKind) -> Option<&MetadataDefinition> {
        self.metadata_definitions.iter().find(|d| d.kind == kind)
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

fn parse_bool(name: SettingName, value: &str) -> VitrineResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(name, value, "expected a boolean".to_string())),
    }
}

fn invalid(name: SettingName, value: &str, reason: String) -> VitrineError {
    VitrineError::Config(ConfigError::InvalidValue {
        field: name.to_string(),
        value: value.to_string(),
        reason,
    })
}

// ============================================================================
// ENGINE CONFIGURATION
// ============================================================================

/// Backend used for the asset and leaf snapshot tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheBackendKind {
    /// Process-local hash maps.
    Memory,
    /// Memory-mapped LMDB environment on local disk.
    Lmdb,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(CacheBackendKind::Memory),
            "lmdb" => Ok(CacheBackendKind::Lmdb),
            _ => Err(ConfigError::InvalidValue {
                field: "VITRINE_CACHE_BACKEND".to_string(),
                value: s.to_string(),
                reason: "expected `memory` or `lmdb`".to_string(),
            }),
        }
    }
}

/// Process-wide engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cache_backend: CacheBackendKind,
    /// Directory for the LMDB environment when `cache_backend` is `Lmdb`.
    pub cache_path: PathBuf,
    pub cache_max_mb: usize,
    /// Maximum number of read-only nodes held by the inflated tier.
    pub inflated_cache_capacity: usize,
    /// Install the JSON tracing subscriber when a gallery is built from this
    /// configuration.
    pub log_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_backend: CacheBackendKind::Memory,
            cache_path: std::env::temp_dir().join("vitrine-cache"),
            cache_max_mb: 256,
            inflated_cache_capacity: 10_000,
            log_json: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create EngineConfig from environment variables.
    ///
    /// Environment variables:
    /// - `VITRINE_CACHE_BACKEND`: `memory` or `lmdb` (default: memory)
    /// - `VITRINE_CACHE_PATH`: LMDB directory (default: `$TMPDIR/vitrine-cache`)
    /// - `VITRINE_CACHE_MAX_MB`: LMDB map size in megabytes (default: 256)
    /// - `VITRINE_INFLATED_CACHE_CAPACITY`: inflated tier bound (default: 10000)
    /// - `VITRINE_LOG_JSON`: "true" for JSON log lines (default: false)
    pub fn from_env() -> VitrineResult<Self> {
        let defaults = Self::default();

        let cache_backend = match std::env::var("VITRINE_CACHE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.cache_backend,
        };

        let cache_path = std::env::var("VITRINE_CACHE_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_path);

        let cache_max_mb = std::env::var("VITRINE_CACHE_MAX_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cache_max_mb);

        let inflated_cache_capacity = std::env::var("VITRINE_INFLATED_CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.inflated_cache_capacity);

        let log_json = std::env::var("VITRINE_LOG_JSON")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let config = Self {
            cache_backend,
            cache_path,
            cache_max_mb,
            inflated_cache_capacity,
            log_json,
        };
        config.validate()?;
        Ok(config)
    }

    /// Select the snapshot backend.
    pub fn with_cache_backend(mut self, backend: CacheBackendKind) -> Self {
        self.cache_backend = backend;
        self
    }

    /// Set the LMDB directory.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Set the inflated tier bound.
    pub fn with_inflated_capacity(mut self, capacity: usize) -> Self {
        self.inflated_cache_capacity = capacity;
        self
    }

    pub fn with_log_json(mut self, log_json: bool) -> Self {
        self.log_json = log_json;
        self
    }

    pub fn validate(&self) -> VitrineResult<()> {
        if self.inflated_cache_capacity == 0 {
            return Err(VitrineError::Config(ConfigError::InvalidValue {
                field: "inflated_cache_capacity".to_string(),
                value: "0".to_string(),
                reason: "inflated_cache_capacity must be greater than 0".to_string(),
            }));
        }
        if self.cache_backend == CacheBackendKind::Lmdb && self.cache_max_mb == 0 {
            return Err(VitrineError::Config(ConfigError::InvalidValue {
                field: "cache_max_mb".to_string(),
                value: "0".to_string(),
                reason: "cache_max_mb must be greater than 0 for the LMDB backend".to_string(),
            }));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_applies_typed_values() {
        let settings = GallerySettings::from_pairs(
            1,
            [
                ("MediaObjectPath", "/srv/gallery"),
                ("ThumbnailPath", "/srv/thumbs"),
                ("ExtractMetadata", "false"),
                ("DefaultAlbumSortKind", "Title"),
                ("DefaultAlbumSortAscending", "no"),
                ("MaxDirectoryNameLength", "40"),
            ],
        )
        .unwrap();

        assert_eq!(settings.media_object_path, PathBuf::from("/srv/gallery"));
        assert_eq!(settings.thumbnail_path, Some(PathBuf::from("/srv/thumbs")));
        assert_eq!(settings.optimized_path, None);
        assert!(!settings.extract_metadata);
        assert_eq!(settings.default_album_sort_kind, MetadataKind::Title);
        assert!(!settings.default_album_sort_ascending);
        assert_eq!(settings.max_directory_name_length, 40);
    }

    #[test]
    fn test_unknown_setting_is_rejected() {
        let err = GallerySettings::from_pairs(
            1,
            [("MediaObjectPath", "/srv/gallery"), ("EnableTelepathy", "true")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VitrineError::Config(ConfigError::UnknownSetting { ref name }) if name == "EnableTelepathy"
        ));
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let err = GallerySettings::from_pairs(
            1,
            [("MediaObjectPath", "/srv/gallery"), ("MaxDirectoryNameLength", "lots")],
        )
        .unwrap_err();
        assert!(matches!(err, VitrineError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_media_path_fails_validation() {
        let err = GallerySettings::from_pairs(1, [("ExtractMetadata", "true")]).unwrap_err();
        assert!(matches!(err, VitrineError::Config(ConfigError::MissingRequired { .. })));
    }

    #[test]
    fn test_metadata_display_settings_json() {
        let defs = vec![
            MetadataDefinition::new(MetadataKind::Caption, "{Caption}", 2),
            MetadataDefinition::new(MetadataKind::Title, "{Title}", 1),
        ];
        let json = serde_json::to_string(&defs).unwrap();
        let mut settings = GallerySettings::new(1, "/srv/gallery");
        settings
            .apply(SettingName::MetadataDisplaySettings, &json)
            .unwrap();
        assert_eq!(settings.metadata_definitions.len(), 2);
        assert_eq!(settings.metadata_definitions[0].kind, MetadataKind::Title);
    }

    #[test]
    fn test_setting_name_parse_ignores_case() {
        assert_eq!(
            "extractmetadata".parse::<SettingName>().unwrap(),
            SettingName::ExtractMetadata
        );
    }

    #[test]
    fn test_engine_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::default()
            .with_inflated_capacity(0)
            .validate()
            .is_err());
        assert_eq!(
            "LMDB".parse::<CacheBackendKind>().unwrap(),
            CacheBackendKind::Lmdb
        );
        assert!("redis".parse::<CacheBackendKind>().is_err());
    }
}
