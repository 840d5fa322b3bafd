//! # Hot Transform Pipeline
//!
//! Every local request regenerates the function's wrapper from the source on
//! disk, compiles it and runs it. Compiled modules are cached only in
//! production-like stages, keyed by entry file and a hash of the generated
//! text; every other stage evicts before each invocation so edits show up
//! on the next request.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::node::{Invocation, ModuleRuntime};
use crate::bundle::{compile_source, Artifact, Compiler};
use crate::codegen::{CodeGenerator, GenerateMode};
use crate::functions::{FunctionDescriptor, FunctionError, FunctionResult, HandlerResponse};
use crate::observability::Event;

type CacheKey = (PathBuf, String);

/// Outcome of compiling a function for local use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledModule {
    Ready(Artifact),
    /// Compilation failed; invoking answers 500 with the message
    Failed { message: String },
}

/// 500 response carrying an error message as a JSON string body
pub fn failure_response(message: &str) -> HandlerResponse {
    HandlerResponse::new(500, Value::from(message).to_string())
}

pub struct HotTransformPipeline {
    generator: CodeGenerator,
    compiler: Arc<dyn Compiler>,
    runtime: Arc<dyn ModuleRuntime>,
    stage: String,
    production: bool,
    env: BTreeMap<String, String>,
    cache: RwLock<HashMap<CacheKey, Arc<CompiledModule>>>,
}

impl HotTransformPipeline {
    pub fn new(
        generator: CodeGenerator,
        compiler: Arc<dyn Compiler>,
        runtime: Arc<dyn ModuleRuntime>,
        stage: &str,
        production_stages: &[String],
    ) -> Self {
        Self {
            generator,
            compiler,
            runtime,
            stage: stage.to_string(),
            production: production_stages.iter().any(|s| s == stage),
            env: BTreeMap::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Environment shared by every function, overlaid by each descriptor's own
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Number of cached compiled modules
    pub fn cached_modules(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Generate and compile, or reuse a cached module in production-like stages
    pub async fn load(&self, descriptor: &FunctionDescriptor) -> FunctionResult<Arc<CompiledModule>> {
        let source = match self
            .generator
            .generate(descriptor, &self.stage, GenerateMode::Local)
            .await
        {
            Ok(source) => source,
            Err(FunctionError::Compile(message)) => {
                return Ok(Arc::new(CompiledModule::Failed { message }))
            }
            Err(e) => return Err(e),
        };

        let entry = descriptor.entry_file();
        let key: CacheKey = (entry.clone(), hex::encode(Sha256::digest(source.as_bytes())));

        if self.production {
            if let Some(module) = self.cached(&key)? {
                debug!(event = %Event::ModuleCacheHit, function = %descriptor.name);
                return Ok(module);
            }
        }

        // Outside production nothing survives a request; in production this
        // drops modules built from older text.
        let evicted = self.evict(&entry)?;
        if evicted > 0 {
            debug!(event = %Event::ModuleEvicted, function = %descriptor.name, evicted);
        }

        let module = match compile_source(self.compiler.as_ref(), &source, &descriptor.directory).await {
            Ok(artifact) => CompiledModule::Ready(artifact),
            Err(FunctionError::Compile(message)) => {
                warn!(
                    event = %Event::CompileFailed,
                    function = %descriptor.name,
                    error = %message,
                );
                CompiledModule::Failed { message }
            }
            Err(e) => return Err(e),
        };
        let module = Arc::new(module);

        if self.production {
            self.write_cache()?.insert(key, module.clone());
        }

        Ok(module)
    }

    /// Run one request through the function
    pub async fn invoke(
        &self,
        descriptor: &FunctionDescriptor,
        event: &Value,
    ) -> FunctionResult<HandlerResponse> {
        let module = self.load(descriptor).await?;

        let artifact = match module.as_ref() {
            CompiledModule::Ready(artifact) => artifact,
            CompiledModule::Failed { message } => return Ok(failure_response(message)),
        };

        let mut env = self.env.clone();
        env.extend(descriptor.env.clone());
        let request_id = Uuid::new_v4().to_string();
        let context = json!({
            "awsRequestId": request_id,
            "functionName": descriptor.name,
            "stage": self.stage,
        });

        let result = self
            .runtime
            .invoke(Invocation {
                function: &descriptor.name,
                artifact,
                directory: &descriptor.directory,
                env: &env,
                event,
                context: &context,
            })
            .await;

        match result {
            Ok(response) => {
                info!(
                    event = %Event::InvocationComplete,
                    function = %descriptor.name,
                    request_id = %request_id,
                    status = response.status_code,
                );
                Ok(response)
            }
            Err(FunctionError::Runtime(message)) => {
                warn!(
                    event = %Event::InvocationFailed,
                    function = %descriptor.name,
                    request_id = %request_id,
                    error = %message,
                );
                Ok(failure_response(&message))
            }
            Err(e) => Err(e),
        }
    }

    fn cached(&self, key: &CacheKey) -> FunctionResult<Option<Arc<CompiledModule>>> {
        let cache = self
            .cache
            .read()
            .map_err(|_| FunctionError::Internal("module cache lock poisoned".into()))?;
        Ok(cache.get(key).cloned())
    }

    fn evict(&self, entry: &Path) -> FunctionResult<usize> {
        let mut cache = self.write_cache()?;
        let before = cache.len();
        cache.retain(|(path, _), _| path.as_path() != entry);
        Ok(before - cache.len())
    }

    fn write_cache(
        &self,
    ) -> FunctionResult<std::sync::RwLockWriteGuard<'_, HashMap<CacheKey, Arc<CompiledModule>>>> {
        self.cache
            .write()
            .map_err(|_| FunctionError::Internal("module cache lock poisoned".into()))
    }
}
