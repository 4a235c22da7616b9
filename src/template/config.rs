//! Engine configuration
//!
//! `defaults/template.default.toml` is embedded into the crate so that the
//! documented defaults and [`EngineConfig::default`] stay in sync. Applications
//! layer their own files and overrides on top of those defaults via [`Loader`]
//! before deserializing into [`EngineConfig`].

use crate::template::error::{TemplateError, TemplateResult};
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../../defaults/template.default.toml");

/// Top-level configuration consumed by [`Engine`](crate::template::engine::Engine).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    pub delimiters: Delimiters,
    pub engine: EngineSettings,
    pub shapes: ShapeConfig,
    pub placeholders: PlaceholderConfig,
}

/// The delimiter triple used to recognise tags, and its escaped form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Delimiters {
    pub prefix: String,
    pub separator: String,
    pub suffix: String,
    pub escaped: EscapedDelimiters,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EscapedDelimiters {
    pub prefix: String,
    pub separator: String,
    pub suffix: String,
}

impl Delimiters {
    /// Wrap a tag declaration back into prefix/suffix.
    pub fn wrap(&self, name: &str, param: &str) -> String {
        format!(
            "{}{}{}{}{}",
            self.prefix, name, self.separator, param, self.suffix
        )
    }

    /// Reject delimiter triples the lexer cannot work with.
    pub fn validate(&self) -> TemplateResult<()> {
        let fields = [
            ("prefix", &self.prefix),
            ("separator", &self.separator),
            ("suffix", &self.suffix),
            ("escaped prefix", &self.escaped.prefix),
            ("escaped separator", &self.escaped.separator),
            ("escaped suffix", &self.escaped.suffix),
        ];
        for (label, value) in fields {
            if value.is_empty() {
                return Err(TemplateError::Config(format!("{} must not be empty", label)));
            }
        }
        if self.prefix == self.separator || self.suffix == self.separator {
            return Err(TemplateError::Config(
                "prefix and suffix must differ from the separator".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters {
            prefix: "{".to_string(),
            separator: ":".to_string(),
            suffix: "}".to_string(),
            escaped: EscapedDelimiters {
                prefix: "&#123;".to_string(),
                separator: "&#58;".to_string(),
                suffix: "&#125;".to_string(),
            },
        }
    }
}

/// What to do with a tag no plugin is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownTagPolicy {
    /// Fail the evaluation
    #[default]
    Abort,
    /// Emit nothing
    Ignore,
    /// Emit the tag and its raw body unchanged
    Keep,
    /// Emit a visible marker around the raw body
    Debug,
}

/// What to do with a close tag that has no matching open tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DanglingEndPolicy {
    /// Emit the close tag literally
    #[default]
    Keep,
    /// Emit nothing
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineSettings {
    pub unknown_tag: UnknownTagPolicy,
    pub dangling_end: DanglingEndPolicy,
    pub max_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            unknown_tag: UnknownTagPolicy::Abort,
            dangling_end: DanglingEndPolicy::Keep,
            max_depth: 64,
        }
    }
}

/// Separators used when decoding list and key-value bodies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShapeConfig {
    pub list_delimiter: String,
    pub kv_separator: String,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        ShapeConfig {
            list_delimiter: "|#|".to_string(),
            kv_separator: "=".to_string(),
        }
    }
}

/// Syntax of the `{:=key}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaceholderConfig {
    pub prefix: String,
    pub suffix: String,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        PlaceholderConfig {
            prefix: "{:=".to_string(),
            suffix: "}".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            delimiters: Delimiters::default(),
            engine: EngineSettings::default(),
            shapes: ShapeConfig::default(),
            placeholders: PlaceholderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_unknown_tag(mut self, policy: UnknownTagPolicy) -> Self {
        self.engine.unknown_tag = policy;
        self
    }

    pub fn with_dangling_end(mut self, policy: DanglingEndPolicy) -> Self {
        self.engine.dangling_end = policy;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.engine.max_depth = depth;
        self
    }

    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer TOML text, e.g. configuration embedded by the application.
    pub fn with_toml(mut self, toml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(toml, FileFormat::Toml));
        self
    }

    /// Apply a single key/value override.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<EngineConfig, ConfigError> {
    Loader::new().build()
}
