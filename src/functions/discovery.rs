//! # Function Discovery
//!
//! Walks a directory tree looking for `function.json` files. Sibling entries
//! are inspected concurrently; each branch recurses depth-first. A directory
//! holding a descriptor is a function directory and is never descended into.
//!
//! A walk for requested names stops entering new directories once every name
//! has resolved. A duplicate seen before that point is rejected just like in
//! a full walk; one that only exists in directories never entered is not.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::descriptor::{FunctionDescriptor, DESCRIPTOR_FILE};
use super::errors::{FunctionError, FunctionResult};
use crate::observability::Event;

/// Requested names, shared by all branches of a walk
#[derive(Debug, Default)]
struct Checklist {
    pending: Vec<String>,
    resolved: HashSet<String>,
}

type SharedChecklist = Arc<Mutex<Checklist>>;

/// Discovery options
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Directories whose path matches any of these are skipped
    pub ignore: Vec<Regex>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            ignore: default_ignore(),
        }
    }
}

fn default_ignore() -> Vec<Regex> {
    Regex::new("node_modules").into_iter().collect()
}

impl DiscoveryOptions {
    /// Build options from configured ignore patterns
    pub fn from_patterns(patterns: &[String]) -> FunctionResult<Self> {
        let ignore = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    FunctionError::Config(format!("Invalid ignore pattern \"{}\": {}", p, e))
                })
            })
            .collect::<FunctionResult<Vec<_>>>()?;
        Ok(Self { ignore })
    }

    fn is_ignored(&self, directory: &Path) -> bool {
        let path = directory.to_string_lossy();
        self.ignore.iter().any(|r| r.is_match(&path))
    }
}

/// Discover functions under `root`.
///
/// With `names`, only those functions are returned and any that cannot be
/// found fail the whole call with [`FunctionError::NotFound`].
pub async fn discover(
    names: Option<&[String]>,
    root: &Path,
    options: &DiscoveryOptions,
) -> FunctionResult<Vec<FunctionDescriptor>> {
    let checklist: Option<SharedChecklist> = names.map(|n| {
        Arc::new(Mutex::new(Checklist {
            pending: n.to_vec(),
            ..Checklist::default()
        }))
    });

    let found = walk(root.to_path_buf(), checklist, options).await?;

    if let Some(requested) = names {
        let found_names: HashSet<&str> = found.iter().map(|f| f.name.as_str()).collect();
        let missing: Vec<String> = requested
            .iter()
            .filter(|n| !found_names.contains(n.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FunctionError::NotFound(missing));
        }
    }

    ensure_unique_names(&found)?;

    debug!(
        event = %Event::FunctionsDiscovered,
        root = %root.display(),
        count = found.len(),
    );

    Ok(found)
}

fn walk<'a>(
    directory: PathBuf,
    checklist: Option<SharedChecklist>,
    options: &'a DiscoveryOptions,
) -> BoxFuture<'a, FunctionResult<Vec<FunctionDescriptor>>> {
    async move {
        if let Some(checklist) = &checklist {
            let resolved_all = lock(checklist)?.pending.is_empty();
            if resolved_all {
                return Ok(Vec::new());
            }
        }

        if options.is_ignored(&directory) {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&directory)
            .await
            .map_err(|e| FunctionError::read(&directory, e))?;

        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FunctionError::read(&directory, e))?
        {
            children.push(entry.path());
        }

        let branches = children
            .into_iter()
            .map(|child| visit(child, checklist.clone(), options));

        let found = try_join_all(branches).await?;
        Ok(found.into_iter().flatten().collect())
    }
    .boxed()
}

async fn visit(
    child: PathBuf,
    checklist: Option<SharedChecklist>,
    options: &DiscoveryOptions,
) -> FunctionResult<Vec<FunctionDescriptor>> {
    let metadata = tokio::fs::metadata(&child)
        .await
        .map_err(|e| FunctionError::read(&child, e))?;

    if !metadata.is_dir() {
        return Ok(Vec::new());
    }

    let descriptor_path = child.join(DESCRIPTOR_FILE);
    let contents = match tokio::fs::read_to_string(&descriptor_path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return walk(child, checklist, options).await;
        }
        Err(e) => return Err(FunctionError::read(descriptor_path, e)),
    };

    let raw: Value = serde_json::from_str(&contents).map_err(|e| {
        FunctionError::Validation(format!(
            "{} is not valid JSON: {}",
            descriptor_path.display(),
            e
        ))
    })?;

    if let Some(checklist) = &checklist {
        let name = raw.get("name").and_then(Value::as_str).unwrap_or_default();
        let mut checklist = lock(checklist)?;
        if checklist.resolved.contains(name) {
            return Err(duplicate_name(name, &child));
        }
        match checklist.pending.iter().position(|n| n == name) {
            Some(index) => {
                let name = checklist.pending.remove(index);
                checklist.resolved.insert(name);
            }
            None => return Ok(Vec::new()),
        }
    }

    Ok(vec![FunctionDescriptor::from_value(raw, &child)?])
}

fn lock(checklist: &SharedChecklist) -> FunctionResult<std::sync::MutexGuard<'_, Checklist>> {
    checklist
        .lock()
        .map_err(|_| FunctionError::Internal("Lock poisoned".into()))
}

fn ensure_unique_names(functions: &[FunctionDescriptor]) -> FunctionResult<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for function in functions {
        if !seen.insert(function.name.as_str()) {
            return Err(duplicate_name(&function.name, &function.directory));
        }
    }
    Ok(())
}

fn duplicate_name(name: &str, directory: &Path) -> FunctionError {
    FunctionError::Validation(format!(
        "Function name \"{}\" is used more than once (second occurrence in {}).",
        name,
        directory.display()
    ))
}
