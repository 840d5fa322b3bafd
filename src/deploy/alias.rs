//! # Stage Aliases
//!
//! A stage alias names the one live version of a function for that stage.
//! Promotion moves the alias first and only then retires the version it
//! pointed at.

use tracing::{info, warn};

use super::platform::{Platform, PlatformResult};
use crate::observability::Event;

/// Result of promoting a version under an alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    /// The alias did not exist and now points at the new version
    Created,
    /// The alias moved; `retired` was the previous target
    Moved {
        retired: String,
        /// Whether the retired version was deleted
        deleted: bool,
    },
    /// The alias already pointed at the new version
    Unchanged,
}

/// Point `alias` of function `name` at `version`.
///
/// Failing to delete the retired version is logged, not returned; the alias
/// stays moved.
pub async fn promote(
    platform: &dyn Platform,
    name: &str,
    alias: &str,
    version: &str,
) -> PlatformResult<Promotion> {
    let current = match platform.get_alias(name, alias).await {
        Ok(current) => Some(current),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    let Some(retired) = current else {
        platform.create_alias(name, alias, version).await?;
        info!(event = %Event::AliasCreated, function = name, alias, version);
        return Ok(Promotion::Created);
    };

    if retired == version {
        return Ok(Promotion::Unchanged);
    }

    platform.update_alias(name, alias, version).await?;
    info!(
        event = %Event::AliasUpdated,
        function = name,
        alias,
        from = %retired,
        to = version,
    );

    let deleted = match platform.delete_version(name, &retired).await {
        Ok(()) => {
            info!(event = %Event::VersionDeleted, function = name, version = %retired);
            true
        }
        Err(e) => {
            warn!(
                event = %Event::VersionDeleteFailed,
                function = name,
                version = %retired,
                error = %e,
            );
            false
        }
    };

    Ok(Promotion::Moved { retired, deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::memory::{CallKind, MemoryPlatform};
    use crate::deploy::platform::RemoteFunctionConfig;
    use std::collections::BTreeMap;

    async fn platform_with_versions(count: usize) -> MemoryPlatform {
        let platform = MemoryPlatform::new();
        let config = RemoteFunctionConfig {
            memory_mb: 128,
            timeout_secs: 3,
            role: "arn:aws:iam::123456789012:role/lambda".into(),
            runtime: "nodejs20.x".into(),
            handler: "index.handler".into(),
            dead_letter_target: None,
            environment: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        platform.create_function("f", b"1", &config).await.unwrap();
        for i in 1..count {
            platform
                .publish_code("f", i.to_string().as_bytes())
                .await
                .unwrap();
        }
        platform.clear_calls();
        platform
    }

    #[tokio::test]
    async fn test_creates_missing_alias() {
        let platform = platform_with_versions(1).await;
        let promotion = promote(&platform, "f", "dev", "1").await.unwrap();

        assert_eq!(promotion, Promotion::Created);
        assert_eq!(platform.count(CallKind::CreateAlias), 1);
        assert_eq!(platform.count(CallKind::DeleteVersion), 0);
    }

    #[tokio::test]
    async fn test_moves_then_deletes() {
        let platform = platform_with_versions(2).await;
        promote(&platform, "f", "dev", "1").await.unwrap();
        platform.clear_calls();

        let promotion = promote(&platform, "f", "dev", "2").await.unwrap();
        assert_eq!(
            promotion,
            Promotion::Moved {
                retired: "1".into(),
                deleted: true
            }
        );

        let kinds: Vec<CallKind> = platform.calls().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CallKind::GetAlias, CallKind::UpdateAlias, CallKind::DeleteVersion]
        );
        assert_eq!(platform.function("f").unwrap().versions, vec!["2"]);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_alias_moved() {
        let platform = platform_with_versions(2).await;
        promote(&platform, "f", "dev", "1").await.unwrap();
        platform.fail(CallKind::DeleteVersion, None, "throttled");

        let promotion = promote(&platform, "f", "dev", "2").await.unwrap();
        assert_eq!(
            promotion,
            Promotion::Moved {
                retired: "1".into(),
                deleted: false
            }
        );
        assert_eq!(platform.get_alias("f", "dev").await.unwrap(), "2");
    }

    #[tokio::test]
    async fn test_same_version_is_unchanged() {
        let platform = platform_with_versions(1).await;
        promote(&platform, "f", "dev", "1").await.unwrap();
        platform.clear_calls();

        assert_eq!(
            promote(&platform, "f", "dev", "1").await.unwrap(),
            Promotion::Unchanged
        );
        assert_eq!(platform.count(CallKind::UpdateAlias), 0);
        assert_eq!(platform.count(CallKind::DeleteVersion), 0);
    }
}
