//! Observable events for fnctl
//!
//! Every log line carries one of these as its `event` field.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Descriptors discovered
    FunctionsDiscovered,

    // Build
    /// Wrapper module generated
    CodeGenerated,
    /// Bundler finished
    CompileComplete,
    /// Bundler failed
    CompileFailed,
    /// Deployment package written
    ArchiveWritten,

    // Deployment
    /// Deployment of one function begins
    DeployBegin,
    /// Function absent remotely, creating
    FunctionCreated,
    /// Remote code matches the new artifact
    CodeUnchanged,
    /// New code version published
    CodePublished,
    /// Waiting for a code update to settle
    UpdatePending,
    /// Configuration reconciled
    ConfigUpdated,
    /// Deployment of one function complete
    DeployComplete,
    /// Batch aborted
    DeployFailed,

    // Alias management
    /// Stage alias created
    AliasCreated,
    /// Stage alias moved to a new version
    AliasUpdated,
    /// Retired version deleted
    VersionDeleted,
    /// Retired version could not be deleted
    VersionDeleteFailed,

    // Local simulation
    /// Dev server listening
    Serving,
    /// Request routed to a function
    RequestRouted,
    /// Request rejected by the router
    RequestRejected,
    /// Compiled module served from cache
    ModuleCacheHit,
    /// Compiled module evicted before invocation
    ModuleEvicted,
    /// Function invocation complete
    InvocationComplete,
    /// Function invocation failed
    InvocationFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::FunctionsDiscovered => "FUNCTIONS_DISCOVERED",

            Event::CodeGenerated => "CODE_GENERATED",
            Event::CompileComplete => "COMPILE_COMPLETE",
            Event::CompileFailed => "COMPILE_FAILED",
            Event::ArchiveWritten => "ARCHIVE_WRITTEN",

            Event::DeployBegin => "DEPLOY_BEGIN",
            Event::FunctionCreated => "FUNCTION_CREATED",
            Event::CodeUnchanged => "CODE_UNCHANGED",
            Event::CodePublished => "CODE_PUBLISHED",
            Event::UpdatePending => "UPDATE_PENDING",
            Event::ConfigUpdated => "CONFIG_UPDATED",
            Event::DeployComplete => "DEPLOY_COMPLETE",
            Event::DeployFailed => "DEPLOY_FAILED",

            Event::AliasCreated => "ALIAS_CREATED",
            Event::AliasUpdated => "ALIAS_UPDATED",
            Event::VersionDeleted => "VERSION_DELETED",
            Event::VersionDeleteFailed => "VERSION_DELETE_FAILED",

            Event::Serving => "FNCTL_SERVING",
            Event::RequestRouted => "REQUEST_ROUTED",
            Event::RequestRejected => "REQUEST_REJECTED",
            Event::ModuleCacheHit => "MODULE_CACHE_HIT",
            Event::ModuleEvicted => "MODULE_EVICTED",
            Event::InvocationComplete => "INVOCATION_COMPLETE",
            Event::InvocationFailed => "INVOCATION_FAILED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_strings() {
        assert_eq!(Event::DeployBegin.as_str(), "DEPLOY_BEGIN");
        assert_eq!(Event::AliasUpdated.to_string(), "ALIAS_UPDATED");
    }
}
