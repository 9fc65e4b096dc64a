use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_PINECONE_CONTROLLER_URL: &str = "https://api.pinecone.io";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {reason}")]
    InvalidValue {
        /// Offending variable name.
        key: String,
        /// Human readable explanation.
        reason: String,
    },
    /// One or more variables failed validation; every problem is listed.
    #[error("Invalid configuration:\n{}", describe_problems(.0))]
    Invalid(Vec<ConfigError>),
    /// Configuration was installed twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

fn describe_problems(problems: &[ConfigError]) -> String {
    problems
        .iter()
        .map(|problem| format!("  - {problem}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deployment mode, mirroring the conventional `development`/`production` split.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnvironment {
    /// Local development: verbose logging.
    Development,
    /// Production deployment.
    Production,
}

impl FromStr for AppEnvironment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

/// Unit used to measure chunk sizes and overlaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkUnit {
    /// Unicode scalar values.
    Characters,
    /// `cl100k_base` tokens counted with `tiktoken`.
    Tokens,
}

impl FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Runtime configuration for the Docura server.
#[derive(Clone)]
pub struct Config {
    /// Deployment mode (`APP_ENV`, falling back to `NODE_ENV`).
    pub environment: AppEnvironment,
    /// HTTP listen port.
    pub port: u16,
    /// API key for the Gemini embedding and generation endpoints.
    pub gemini_api_key: String,
    /// Base URL of the Gemini REST API.
    pub gemini_api_base: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Chat model identifier used by both chain stages.
    pub chat_model: String,
    /// Sampling temperature for generation.
    pub chat_temperature: f32,
    /// Pinecone API key.
    pub pinecone_api_key: String,
    /// Pinecone environment label.
    pub pinecone_environment: String,
    /// Name of the shared Pinecone index.
    pub pinecone_index_name: String,
    /// Pinecone control-plane base URL used to look up the index host.
    pub pinecone_controller_url: String,
    /// Explicit data-plane host; skips the control-plane lookup when set.
    pub pinecone_index_host: Option<String>,
    /// Namespace used when a query does not name one.
    pub pinecone_namespace: String,
    /// Age in days after which upload namespaces are deleted (`0` disables expiry).
    pub vector_expiration_days: u32,
    /// Period of the background expiry sweep in seconds (`0` disables the task).
    pub expiry_sweep_interval_secs: u64,
    /// Target chunk size.
    pub text_splitter_chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Unit for chunk size and overlap.
    pub text_splitter_unit: ChunkUnit,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Directory holding in-flight uploads.
    pub upload_dir: PathBuf,
    /// Request body limit for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// Browser origin allowed to call the API.
    pub cors_allowed_origin: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("port", &self.port)
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_api_base", &self.gemini_api_base)
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("chat_temperature", &self.chat_temperature)
            .field("pinecone_api_key", &"<redacted>")
            .field("pinecone_environment", &self.pinecone_environment)
            .field("pinecone_index_name", &self.pinecone_index_name)
            .field("pinecone_controller_url", &self.pinecone_controller_url)
            .field("pinecone_index_host", &self.pinecone_index_host)
            .field("pinecone_namespace", &self.pinecone_namespace)
            .field("vector_expiration_days", &self.vector_expiration_days)
            .field("expiry_sweep_interval_secs", &self.expiry_sweep_interval_secs)
            .field("text_splitter_chunk_size", &self.text_splitter_chunk_size)
            .field("text_splitter_chunk_overlap", &self.text_splitter_chunk_overlap)
            .field("text_splitter_unit", &self.text_splitter_unit)
            .field("retrieval_top_k", &self.retrieval_top_k)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("cors_allowed_origin", &self.cors_allowed_origin)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Every missing or malformed variable is collected so that a single startup failure
    /// reports the complete list instead of the first problem only.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader::new(lookup);

        let environment = match env.optional("APP_ENV").or_else(|| env.optional("NODE_ENV")) {
            Some(value) => value.parse().unwrap_or_else(|()| {
                env.reject("APP_ENV", "expected `development` or `production`");
                AppEnvironment::Development
            }),
            None => AppEnvironment::Development,
        };

        let config = Self {
            environment,
            port: env.parsed("PORT", DEFAULT_PORT),
            gemini_api_key: env.required("GEMINI_API_KEY"),
            gemini_api_base: env.string_or("GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE),
            embedding_model: env.string_or("GEMINI_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            chat_model: env.string_or("GEMINI_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            chat_temperature: env.parsed("GEMINI_TEMPERATURE", 0.2),
            pinecone_api_key: env.required("PINECONE_API_KEY"),
            pinecone_environment: env.required("PINECONE_ENVIRONMENT"),
            pinecone_index_name: env.required("PINECONE_INDEX_NAME"),
            pinecone_controller_url: env
                .string_or("PINECONE_CONTROLLER_URL", DEFAULT_PINECONE_CONTROLLER_URL),
            pinecone_index_host: env.optional("PINECONE_INDEX_HOST"),
            pinecone_namespace: env.string_or("PINECONE_NAMESPACE", "my-docs"),
            vector_expiration_days: env.parsed("VECTOR_EXPIRATION_DAYS", 1),
            expiry_sweep_interval_secs: env.parsed("EXPIRY_SWEEP_INTERVAL_SECS", 3600),
            text_splitter_chunk_size: env.parsed("TEXT_SPLITTER_CHUNK_SIZE", 1000),
            text_splitter_chunk_overlap: env.parsed("TEXT_SPLITTER_CHUNK_OVERLAP", 200),
            text_splitter_unit: match env.optional("TEXT_SPLITTER_UNIT") {
                Some(value) => value.parse().unwrap_or_else(|()| {
                    env.reject("TEXT_SPLITTER_UNIT", "expected `characters` or `tokens`");
                    ChunkUnit::Characters
                }),
                None => ChunkUnit::Characters,
            },
            retrieval_top_k: env.parsed("RETRIEVAL_TOP_K", 5),
            upload_dir: PathBuf::from(env.string_or("UPLOAD_DIR", "uploads")),
            max_upload_bytes: {
                let megabytes = env.parsed::<usize>("MAX_UPLOAD_MB", 25);
                megabytes.checked_mul(1024 * 1024).unwrap_or_else(|| {
                    env.reject("MAX_UPLOAD_MB", "value is too large");
                    0
                })
            },
            cors_allowed_origin: env.optional("CORS_ALLOWED_ORIGIN"),
        };

        if config.text_splitter_chunk_size == 0 {
            env.reject("TEXT_SPLITTER_CHUNK_SIZE", "must be greater than zero");
        } else if config.text_splitter_chunk_overlap >= config.text_splitter_chunk_size {
            env.reject(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                "must be smaller than TEXT_SPLITTER_CHUNK_SIZE",
            );
        }
        if config.retrieval_top_k == 0 {
            env.reject("RETRIEVAL_TOP_K", "must be at least 1");
        }
        if !(0.0..=2.0).contains(&config.chat_temperature) {
            env.reject("GEMINI_TEMPERATURE", "must be between 0 and 2");
        }

        env.finish(config)
    }
}

/// Accumulates validation problems while reading variables.
struct EnvReader<F> {
    lookup: F,
    problems: Vec<ConfigError>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            problems: Vec::new(),
        }
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&mut self, key: &str) -> String {
        self.optional(key).unwrap_or_else(|| {
            self.problems
                .push(ConfigError::MissingVariable(key.to_string()));
            String::new()
        })
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            Some(value) => value.parse().unwrap_or_else(|err: T::Err| {
                self.reject(key, &err.to_string());
                default
            }),
            None => default,
        }
    }

    fn reject(&mut self, key: &str, reason: &str) {
        self.problems.push(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        });
    }

    fn finish(self, config: Config) -> Result<Config, ConfigError> {
        if self.problems.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(self.problems))
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}
