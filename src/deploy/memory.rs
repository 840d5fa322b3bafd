//! # In-Memory Platform
//!
//! A [`Platform`] that keeps remote state in process and records every call.
//! Versions are numbered from 1 per function, as on Lambda.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::platform::{
    content_hash, Platform, PlatformError, PlatformResult, RemoteFunctionConfig,
    RemoteFunctionState,
};

/// Platform operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    GetFunctionConfig,
    CreateFunction,
    CheckCode,
    PublishCode,
    UpdateConfig,
    GetAlias,
    CreateAlias,
    UpdateAlias,
    DeleteVersion,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCall {
    pub kind: CallKind,
    pub function: String,
    /// Alias and/or version argument, `alias@version`
    pub detail: Option<String>,
}

/// A function as the platform stores it
#[derive(Debug, Clone)]
pub struct StoredFunction {
    pub content_hash: String,
    pub config: RemoteFunctionConfig,
    /// Published versions still present
    pub versions: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    last_version: u64,
    /// Configuration reads left before a code update settles
    pending_reads: usize,
}

impl StoredFunction {
    fn publish(&mut self) -> String {
        self.last_version += 1;
        let version = self.last_version.to_string();
        self.versions.push(version.clone());
        version
    }
}

#[derive(Debug, Default)]
struct State {
    functions: BTreeMap<String, StoredFunction>,
    calls: Vec<PlatformCall>,
    failures: HashMap<(CallKind, Option<String>), String>,
    update_reads: usize,
}

/// Recording in-memory platform
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `kind` call fail with a remote error, for one function or all
    pub fn fail(&self, kind: CallKind, function: Option<&str>, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state
                .failures
                .insert((kind, function.map(str::to_string)), message.to_string());
        }
    }

    /// Keep each published code update in progress for the next `reads`
    /// configuration reads. A configuration update in that window conflicts.
    pub fn delay_updates(&self, reads: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.update_reads = reads;
        }
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Number of `kind` calls made so far
    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.clear();
        }
    }

    /// Snapshot of a stored function
    pub fn function(&self, name: &str) -> Option<StoredFunction> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.functions.get(name).cloned())
    }

    fn lock(&self) -> PlatformResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| PlatformError::Remote("platform state lock poisoned".into()))
    }

    /// Record the call and apply any configured failure
    fn enter(
        &self,
        kind: CallKind,
        function: &str,
        detail: Option<String>,
    ) -> PlatformResult<MutexGuard<'_, State>> {
        let mut state = self.lock()?;
        state.calls.push(PlatformCall {
            kind,
            function: function.to_string(),
            detail,
        });

        let failure = state
            .failures
            .get(&(kind, Some(function.to_string())))
            .or_else(|| state.failures.get(&(kind, None)))
            .cloned();
        match failure {
            Some(message) => Err(PlatformError::Remote(message)),
            None => Ok(state),
        }
    }
}

fn missing(name: &str) -> PlatformError {
    PlatformError::NotFound(format!("Function not found: {}", name))
}

fn stored<'a>(state: &'a mut State, name: &str) -> PlatformResult<&'a mut StoredFunction> {
    state.functions.get_mut(name).ok_or_else(|| missing(name))
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn get_function_config(&self, name: &str) -> PlatformResult<RemoteFunctionState> {
        let mut state = self.enter(CallKind::GetFunctionConfig, name, None)?;
        let function = stored(&mut state, name)?;
        let update_in_progress = function.pending_reads > 0;
        function.pending_reads = function.pending_reads.saturating_sub(1);
        Ok(RemoteFunctionState {
            content_hash: function.content_hash.clone(),
            update_in_progress,
        })
    }

    async fn create_function(
        &self,
        name: &str,
        package: &[u8],
        config: &RemoteFunctionConfig,
    ) -> PlatformResult<String> {
        let mut state = self.enter(CallKind::CreateFunction, name, None)?;
        if state.functions.contains_key(name) {
            return Err(PlatformError::Remote(format!(
                "Function already exist: {}",
                name
            )));
        }
        let mut function = StoredFunction {
            content_hash: content_hash(package),
            config: config.clone(),
            versions: Vec::new(),
            aliases: BTreeMap::new(),
            last_version: 0,
            pending_reads: 0,
        };
        let version = function.publish();
        state.functions.insert(name.to_string(), function);
        Ok(version)
    }

    async fn check_code(&self, name: &str, package: &[u8]) -> PlatformResult<String> {
        let mut state = self.enter(CallKind::CheckCode, name, None)?;
        stored(&mut state, name)?;
        Ok(content_hash(package))
    }

    async fn publish_code(&self, name: &str, package: &[u8]) -> PlatformResult<String> {
        let mut state = self.enter(CallKind::PublishCode, name, None)?;
        let reads = state.update_reads;
        let function = stored(&mut state, name)?;
        function.content_hash = content_hash(package);
        function.pending_reads = reads;
        Ok(function.publish())
    }

    async fn update_config(&self, name: &str, config: &RemoteFunctionConfig) -> PlatformResult<()> {
        let mut state = self.enter(CallKind::UpdateConfig, name, None)?;
        let function = stored(&mut state, name)?;
        if function.pending_reads > 0 {
            return Err(PlatformError::Remote(format!(
                "ResourceConflictException: An update is in progress for resource: {}",
                name
            )));
        }
        // Tags are not part of a configuration update.
        let tags = std::mem::take(&mut function.config.tags);
        function.config = RemoteFunctionConfig {
            tags,
            ..config.clone()
        };
        Ok(())
    }

    async fn get_alias(&self, name: &str, alias: &str) -> PlatformResult<String> {
        let mut state = self.enter(CallKind::GetAlias, name, Some(alias.to_string()))?;
        let function = stored(&mut state, name)?;
        function
            .aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("Alias not found: {}:{}", name, alias)))
    }

    async fn create_alias(&self, name: &str, alias: &str, version: &str) -> PlatformResult<()> {
        let detail = Some(format!("{}@{}", alias, version));
        let mut state = self.enter(CallKind::CreateAlias, name, detail)?;
        let function = stored(&mut state, name)?;
        if function.aliases.contains_key(alias) {
            return Err(PlatformError::Remote(format!(
                "Alias already exists: {}:{}",
                name, alias
            )));
        }
        function.aliases.insert(alias.to_string(), version.to_string());
        Ok(())
    }

    async fn update_alias(&self, name: &str, alias: &str, version: &str) -> PlatformResult<()> {
        let detail = Some(format!("{}@{}", alias, version));
        let mut state = self.enter(CallKind::UpdateAlias, name, detail)?;
        let function = stored(&mut state, name)?;
        match function.aliases.get_mut(alias) {
            Some(target) => {
                *target = version.to_string();
                Ok(())
            }
            None => Err(PlatformError::NotFound(format!(
                "Alias not found: {}:{}",
                name, alias
            ))),
        }
    }

    async fn delete_version(&self, name: &str, version: &str) -> PlatformResult<()> {
        let mut state = self.enter(CallKind::DeleteVersion, name, Some(version.to_string()))?;
        let function = stored(&mut state, name)?;
        if let Some(alias) = function
            .aliases
            .iter()
            .find(|(_, v)| v.as_str() == version)
            .map(|(a, _)| a.clone())
        {
            return Err(PlatformError::Remote(format!(
                "Version {} is still referenced by alias {}",
                version, alias
            )));
        }
        let index = function
            .versions
            .iter()
            .position(|v| v == version)
            .ok_or_else(|| PlatformError::NotFound(format!("{}:{}", name, version)))?;
        function.versions.remove(index);
        Ok(())
    }
}
