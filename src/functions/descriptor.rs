//! # Function Descriptor
//!
//! Metadata for one deployable unit, read from `function.json`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{FunctionError, FunctionResult};

/// Descriptor file name marking a function directory
pub const DESCRIPTOR_FILE: &str = "function.json";

/// User code entry file inside a function directory
pub const ENTRY_FILE: &str = "index.js";

/// Properties injected by discovery that authors may not set
pub const RESERVED_PROPERTIES: &[&str] = &["directory"];

/// Default memory size in MB
pub const DEFAULT_MEMORY_MB: u32 = 1536;

/// Default timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u32 = 15;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Get
    }
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(format!("unsupported HTTP method \"{}\"", other)),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Unique function name
    pub name: String,

    /// Source location, injected by discovery
    #[serde(skip)]
    pub directory: PathBuf,

    /// Route template with `{param}` segments
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub method: HttpMethod,

    /// Memory limit in MB
    #[serde(default)]
    pub memory: Option<u32>,

    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u32>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl FunctionDescriptor {
    /// Create a descriptor rooted at `directory`
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            path: None,
            method: HttpMethod::default(),
            memory: None,
            timeout: None,
            env: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Attach an HTTP route
    pub fn with_route(mut self, method: HttpMethod, path: impl Into<String>) -> Self {
        self.method = method;
        self.path = Some(path.into());
        self
    }

    /// Parse and validate the contents of a descriptor file found in `directory`
    pub fn parse(contents: &str, directory: &Path) -> FunctionResult<Self> {
        let raw: Value = serde_json::from_str(contents).map_err(|e| {
            FunctionError::Validation(format!(
                "{} in {} is not valid JSON: {}",
                DESCRIPTOR_FILE,
                directory.display(),
                e
            ))
        })?;

        Self::from_value(raw, directory)
    }

    /// Validate an already parsed descriptor object found in `directory`
    pub fn from_value(raw: Value, directory: &Path) -> FunctionResult<Self> {
        validate_description(&raw)?;

        // Authored nulls mean "use the default".
        let mut fields = raw.clone();
        if let Some(object) = fields.as_object_mut() {
            object.retain(|_, v| !v.is_null());
        }

        let mut descriptor: FunctionDescriptor = serde_json::from_value(fields)
            .map_err(|e| FunctionError::Validation(format!("{}.{}", e, debug_info(&raw))))?;
        descriptor.directory = directory.to_path_buf();
        Ok(descriptor)
    }

    /// Path of the user code entry file
    pub fn entry_file(&self) -> PathBuf {
        self.directory.join(ENTRY_FILE)
    }

    /// Whether the function is reachable over HTTP
    pub fn is_routable(&self) -> bool {
        self.path.is_some()
    }

    pub fn memory_mb(&self) -> u32 {
        self.memory.unwrap_or(DEFAULT_MEMORY_MB)
    }

    /// Timeout, falling back to a deployment-wide default
    pub fn timeout_secs(&self, deployment_default: Option<u32>) -> u32 {
        self.timeout
            .or(deployment_default)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

/// Validate a raw descriptor object before it is deserialized.
///
/// `method` defaults to GET, so a routed function always resolves to a
/// concrete method; an authored method that is not a known verb is rejected.
pub fn validate_description(raw: &Value) -> FunctionResult<()> {
    let object = raw.as_object().ok_or_else(|| {
        FunctionError::Validation(format!(
            "A function description must be an object.{}",
            debug_info(raw)
        ))
    })?;

    match object.get("name") {
        Some(Value::String(name)) if !name.is_empty() => {}
        _ => {
            return Err(FunctionError::Validation(format!(
                "\"name\" property is required for a function.{}",
                debug_info(raw)
            )))
        }
    }

    for property in RESERVED_PROPERTIES {
        if object.contains_key(*property) {
            return Err(FunctionError::Validation(format!(
                "\"{}\" property name is reserved inside \"{}\".{}",
                property,
                DESCRIPTOR_FILE,
                debug_info(raw)
            )));
        }
    }

    if let Some(path) = object.get("path").filter(|v| !v.is_null()) {
        match path.as_str() {
            Some(p) if p.starts_with('/') => {}
            _ => {
                return Err(FunctionError::Validation(format!(
                    "\"path\" must be a string starting with \"/\".{}",
                    debug_info(raw)
                )))
            }
        }
    }

    if let Some(method) = object.get("method").filter(|v| !v.is_null()) {
        let valid = method
            .as_str()
            .map(|m| m.parse::<HttpMethod>().is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(FunctionError::Validation(format!(
                "\"method\" must be one of GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS.{}",
                debug_info(raw)
            )));
        }
    }

    Ok(())
}

fn debug_info(raw: &Value) -> String {
    format!("\n\n{}", raw)
}
