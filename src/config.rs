use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default chunk size in lines, roughly a model's practical context budget.
pub const DEFAULT_CHUNK_LINES: usize = 400;

/// Default overlap between consecutive chunks, in lines.
pub const DEFAULT_CHUNK_OVERLAP: usize = 40;

/// File extensions considered eligible source files. Both the startup sync
/// and the watcher go through this single list so they never diverge.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // Systems / compiled
    "rs", "c", "h", "cpp", "cc", "hpp", "go", "zig", "java", "kt", "scala", "cs", "swift",
    // Scripting
    "py", "pyi", "rb", "php", "lua", "pl", "sh", "bash", "zsh",
    // JavaScript / TypeScript
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "vue", "svelte",
    // Data / config / docs
    "json", "yaml", "yml", "toml", "sql", "proto", "graphql", "md", "rst", "txt",
];

/// Extensionless file names that are still worth indexing.
pub const SUPPORTED_FILE_NAMES: &[&str] = &["dockerfile", "makefile", "justfile", "rakefile"];

/// Check whether a lowercase extension (without the leading dot) is eligible.
pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Deterministic SHA-256 expansion, no model or network needed.
    Hash,
    /// On-device Qwen3 embedding model.
    Local,
    /// OpenAI-compatible HTTP endpoint.
    OpenAi,
}

impl EmbedderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hash" | "offline" => Some(Self::Hash),
            "local" | "qwen3" => Some(Self::Local),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub dimensions: Option<usize>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    pub hash_dimensions: usize,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub listen_addr: String,
    pub data_dir: String,
    pub root: PathBuf,
    pub poll_interval_ms: u64,
    pub chunk_lines: usize,
    pub chunk_overlap: usize,
    pub max_file_size_bytes: usize,
    pub exclude_patterns: Vec<String>,
    pub sync_on_start: bool,
    pub prune_deleted: bool,
    pub embedder: EmbedderConfig,
    /// Bearer token required on `/api/*` and `/shutdown` when set.
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or unparseable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str, default: bool| {
            get(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };

        let port = get("CODEINDEX_PORT").unwrap_or_else(|| "9731".to_string());

        let data_dir = get("CODEINDEX_DATA_DIR").unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|d| d.join("codeindex-backend").to_string_lossy().to_string())
                .unwrap_or_else(|| ".codeindex-data".to_string())
        });

        let root = get("CODEINDEX_ROOT")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let exclude_patterns = get("CODEINDEX_EXCLUDE")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let embedder = EmbedderConfig {
            kind: get("CODEINDEX_EMBEDDER")
                .and_then(|v| EmbedderKind::parse(&v))
                .unwrap_or(EmbedderKind::Hash),
            hash_dimensions: parsed("CODEINDEX_HASH_DIM")
                .filter(|d| *d > 0)
                .map(|d| d as usize)
                .unwrap_or(128),
            openai: OpenAiConfig {
                api_key: get("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
                base_url: get("CODEINDEX_OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: get("CODEINDEX_OPENAI_MODEL")
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                dimensions: parsed("CODEINDEX_OPENAI_DIMENSIONS").map(|d| d as usize),
                timeout_secs: parsed("CODEINDEX_OPENAI_TIMEOUT_SECS").unwrap_or(30),
            },
        };

        Self {
            listen_addr: format!("127.0.0.1:{}", port),
            data_dir,
            root,
            poll_interval_ms: parsed("CODEINDEX_POLL_INTERVAL_MS").unwrap_or(1000),
            chunk_lines: parsed("CODEINDEX_CHUNK_LINES")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_CHUNK_LINES),
            chunk_overlap: parsed("CODEINDEX_CHUNK_OVERLAP")
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            max_file_size_bytes: parsed("CODEINDEX_MAX_FILE_SIZE")
                .map(|v| v as usize)
                .unwrap_or(10 * 1024 * 1024), // 10MB
            exclude_patterns,
            sync_on_start: flag("CODEINDEX_SYNC_ON_START", true),
            prune_deleted: flag("CODEINDEX_PRUNE_DELETED", false),
            embedder,
            auth_token: get("CODEINDEX_AUTH_TOKEN").filter(|t| !t.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("CODEINDEX_DATA_DIR", "/tmp/idx"), ("CODEINDEX_ROOT", "/src")]);
        assert_eq!(config.listen_addr, "127.0.0.1:9731");
        assert_eq!(config.data_dir, "/tmp/idx");
        assert_eq!(config.root, PathBuf::from("/src"));
        assert_eq!(config.chunk_lines, 400);
        assert_eq!(config.chunk_overlap, 40);
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.sync_on_start);
        assert!(!config.prune_deleted);
        assert_eq!(config.embedder.kind, EmbedderKind::Hash);
        assert_eq!(config.embedder.hash_dimensions, 128);
        assert!(config.exclude_patterns.is_empty());
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_from(&[
            ("CODEINDEX_PORT", "8000"),
            ("CODEINDEX_CHUNK_LINES", "50"),
            ("CODEINDEX_CHUNK_OVERLAP", "not-a-number"),
            ("CODEINDEX_EXCLUDE", "vendor/**, *.min.js ,"),
            ("CODEINDEX_PRUNE_DELETED", "true"),
            ("CODEINDEX_EMBEDDER", "OpenAI"),
            ("OPENAI_API_KEY", "  "),
            ("CODEINDEX_AUTH_TOKEN", "s3cret"),
        ]);
        assert_eq!(config.listen_addr, "127.0.0.1:8000");
        assert_eq!(config.chunk_lines, 50);
        assert_eq!(config.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(config.exclude_patterns, vec!["vendor/**", "*.min.js"]);
        assert!(config.prune_deleted);
        assert_eq!(config.embedder.kind, EmbedderKind::OpenAi);
        assert!(config.embedder.openai.api_key.is_none());
        assert_eq!(config.auth_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("rs"));
        assert!(is_supported_extension("py"));
        assert!(!is_supported_extension("png"));
    }
}
