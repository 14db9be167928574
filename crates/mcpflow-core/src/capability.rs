//! Capability records for MCP peers.
//!
//! Capabilities are negotiated during the initialization handshake and
//! determine which methods either side may send or handle. Both sides use
//! the same symmetric [`Capabilities`] record; presence of a sub-record
//! means "supported", and sub-fields refine behavior.
//!
//! The method→capability mapping lives in [`required_capability`]; the
//! engine consults it before sending requests (peer gate) and when
//! registering handlers (local gate).

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capability record advertised by a peer during initialization.
///
/// The record is symmetric: servers typically declare `tools`, `resources`,
/// `prompts`, `logging`, `completions`, and `tasks`, while clients declare
/// `roots`, `sampling`, and `elicitation`. Nothing in the wire format
/// restricts which side declares what.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    /// Log message emission support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    /// LLM sampling support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    /// Filesystem roots support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    /// User-input elicitation support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
    /// Tool support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Resource support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Prompt support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    /// Argument-completion support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,
    /// Long-running task support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksCapability>,
}

impl Capabilities {
    /// Create an empty capability record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable tool support.
    #[must_use]
    pub fn with_tools(mut self) -> Self {
        self.tools = Some(ToolsCapability::default());
        self
    }

    /// Enable tool support with change notifications.
    #[must_use]
    pub fn with_tools_and_changes(mut self) -> Self {
        self.tools = Some(ToolsCapability {
            list_changed: Some(true),
        });
        self
    }

    /// Enable resource support.
    #[must_use]
    pub fn with_resources(mut self) -> Self {
        self.resources = Some(ResourcesCapability::default());
        self
    }

    /// Enable resource support with subscriptions and change notifications.
    #[must_use]
    pub fn with_resources_and_subscriptions(mut self) -> Self {
        self.resources = Some(ResourcesCapability {
            subscribe: Some(true),
            list_changed: Some(true),
        });
        self
    }

    /// Enable prompt support.
    #[must_use]
    pub fn with_prompts(mut self) -> Self {
        self.prompts = Some(PromptsCapability::default());
        self
    }

    /// Enable completion support.
    #[must_use]
    pub fn with_completions(mut self) -> Self {
        self.completions = Some(CompletionsCapability::default());
        self
    }

    /// Enable logging support.
    #[must_use]
    pub fn with_logging(mut self) -> Self {
        self.logging = Some(LoggingCapability {});
        self
    }

    /// Enable sampling support.
    #[must_use]
    pub fn with_sampling(mut self) -> Self {
        self.sampling = Some(SamplingCapability {});
        self
    }

    /// Enable roots support.
    #[must_use]
    pub fn with_roots(mut self) -> Self {
        self.roots = Some(RootsCapability::default());
        self
    }

    /// Enable roots support with change notifications.
    #[must_use]
    pub fn with_roots_and_changes(mut self) -> Self {
        self.roots = Some(RootsCapability {
            list_changed: Some(true),
        });
        self
    }

    /// Enable elicitation support (form mode).
    #[must_use]
    pub fn with_elicitation(mut self) -> Self {
        self.elicitation = Some(ElicitationCapability {
            form: Some(true),
            url: None,
        });
        self
    }

    /// Enable task support without augmentable methods.
    #[must_use]
    pub fn with_tasks(mut self) -> Self {
        self.tasks = Some(TasksCapability::default());
        self
    }

    /// Enable task support, declaring which methods may be task-augmented.
    #[must_use]
    pub fn with_tasks_for<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requests = methods
            .into_iter()
            .map(|m| (m.into(), Value::Object(serde_json::Map::new())))
            .collect();
        self.tasks = Some(TasksCapability {
            list_changed: Some(true),
            requests: Some(requests),
        });
        self
    }

    /// Check if tools are supported.
    #[must_use]
    pub const fn has_tools(&self) -> bool {
        self.tools.is_some()
    }

    /// Check if resources are supported.
    #[must_use]
    pub const fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    /// Check if prompts are supported.
    #[must_use]
    pub const fn has_prompts(&self) -> bool {
        self.prompts.is_some()
    }

    /// Check if tasks are supported.
    #[must_use]
    pub const fn has_tasks(&self) -> bool {
        self.tasks.is_some()
    }

    /// Check whether this record satisfies a capability requirement.
    #[must_use]
    pub fn satisfies(&self, requirement: CapabilityRequirement) -> bool {
        use CapabilityFamily as F;
        match requirement {
            CapabilityRequirement::Family(family) => match family {
                F::Logging => self.logging.is_some(),
                F::Sampling => self.sampling.is_some(),
                F::Roots => self.roots.is_some(),
                F::Elicitation => self.elicitation.is_some(),
                F::Tools => self.tools.is_some(),
                F::Resources => self.resources.is_some(),
                F::Prompts => self.prompts.is_some(),
                F::Completions => self.completions.is_some(),
                F::Tasks => self.tasks.is_some(),
            },
            CapabilityRequirement::ResourceSubscribe => self
                .resources
                .as_ref()
                .and_then(|r| r.subscribe)
                .unwrap_or(false),
            CapabilityRequirement::ListChanged(family) => {
                let flag = match family {
                    F::Roots => self.roots.as_ref().and_then(|c| c.list_changed),
                    F::Tools => self.tools.as_ref().and_then(|c| c.list_changed),
                    F::Resources => self.resources.as_ref().and_then(|c| c.list_changed),
                    F::Prompts => self.prompts.as_ref().and_then(|c| c.list_changed),
                    F::Completions => self.completions.as_ref().and_then(|c| c.list_changed),
                    F::Tasks => self.tasks.as_ref().and_then(|c| c.list_changed),
                    F::Logging | F::Sampling | F::Elicitation => None,
                };
                flag.unwrap_or(false)
            }
        }
    }

    /// Assert that this (peer) record permits sending `method`.
    ///
    /// Methods with no capability mapping pass with an advisory log; a
    /// declared-but-missing capability yields a method-not-found error
    /// naming the capability.
    pub fn ensure_peer_capability(&self, method: &str) -> Result<(), McpError> {
        let Some(requirement) = required_capability(method) else {
            tracing::debug!(method, "no capability mapping for method; allowing");
            return Ok(());
        };
        if self.satisfies(requirement) {
            Ok(())
        } else {
            Err(McpError::method_not_found(format!(
                "peer does not support {requirement} (required for {method})"
            )))
        }
    }

    /// Assert that this (local) record permits handling `method`.
    ///
    /// Unlike the peer gate this is a configuration error, surfaced at
    /// handler-registration time.
    pub fn ensure_local_capability(&self, method: &str) -> Result<(), McpError> {
        let Some(requirement) = required_capability(method) else {
            tracing::debug!(method, "no capability mapping for handler; allowing");
            return Ok(());
        };
        if self.satisfies(requirement) {
            Ok(())
        } else {
            Err(McpError::internal(format!(
                "handler for {method} requires the {requirement} capability, which is not declared"
            )))
        }
    }

    /// Assert that `method` may be task-augmented against this record.
    pub fn ensure_task_augmentation(&self, method: &str) -> Result<(), McpError> {
        let supported = self
            .tasks
            .as_ref()
            .and_then(|t| t.requests.as_ref())
            .is_some_and(|requests| requests.contains_key(method));
        if supported {
            Ok(())
        } else {
            Err(McpError::method_not_found(format!(
                "tasks capability does not cover {method} (tasks.requests)"
            )))
        }
    }
}

/// Tool capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsCapability {
    /// If true, the declaring side sends tool list changed notifications.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesCapability {
    /// If true, the declaring side supports resource subscriptions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// If true, the declaring side sends resource list changed notifications.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompt capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptsCapability {
    /// If true, the declaring side sends prompt list changed notifications.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Completion capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionsCapability {
    /// If true, the declaring side sends completion list changed notifications.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Roots capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootsCapability {
    /// If true, the declaring side sends roots list changed notifications.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Elicitation capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElicitationCapability {
    /// If true, form-mode elicitation is supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<bool>,
    /// If true, URL-mode elicitation is supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<bool>,
}

/// Logging capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// Sampling capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingCapability {}

/// Task capability flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TasksCapability {
    /// If true, the declaring side sends task list changed notifications.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
    /// Methods that may be task-augmented, keyed by method name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<serde_json::Map<String, Value>>,
}

/// A capability family referenced by the method→capability map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityFamily {
    /// `logging`
    Logging,
    /// `sampling`
    Sampling,
    /// `roots`
    Roots,
    /// `elicitation`
    Elicitation,
    /// `tools`
    Tools,
    /// `resources`
    Resources,
    /// `prompts`
    Prompts,
    /// `completions`
    Completions,
    /// `tasks`
    Tasks,
}

impl CapabilityFamily {
    const fn name(self) -> &'static str {
        match self {
            Self::Logging => "logging",
            Self::Sampling => "sampling",
            Self::Roots => "roots",
            Self::Elicitation => "elicitation",
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Prompts => "prompts",
            Self::Completions => "completions",
            Self::Tasks => "tasks",
        }
    }
}

/// What a method requires from the peer's capability record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityRequirement {
    /// The named sub-record must be present.
    Family(CapabilityFamily),
    /// `resources.subscribe` must be declared true.
    ResourceSubscribe,
    /// The family must declare `listChanged = true`.
    ListChanged(CapabilityFamily),
}

impl std::fmt::Display for CapabilityRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Family(family) => write!(f, "{}", family.name()),
            Self::ResourceSubscribe => write!(f, "resources.subscribe"),
            Self::ListChanged(family) => write!(f, "{}.listChanged", family.name()),
        }
    }
}

/// The capability a method requires, or `None` for unmapped methods
/// (`initialize`, `ping`, and anything unknown).
#[must_use]
pub fn required_capability(method: &str) -> Option<CapabilityRequirement> {
    use CapabilityFamily as F;
    use CapabilityRequirement as R;
    let requirement = match method {
        "resources/list" | "resources/read" | "resources/templates/list" => {
            R::Family(F::Resources)
        }
        "resources/subscribe" | "resources/unsubscribe" => R::ResourceSubscribe,
        "tools/list" | "tools/call" => R::Family(F::Tools),
        "prompts/list" | "prompts/get" => R::Family(F::Prompts),
        "logging/setLevel" => R::Family(F::Logging),
        "completion/complete" => R::Family(F::Completions),
        "sampling/createMessage" => R::Family(F::Sampling),
        "elicitation/create" => R::Family(F::Elicitation),
        "roots/list" => R::Family(F::Roots),
        m if m.starts_with("tasks/") => R::Family(F::Tasks),
        m => {
            let family = list_changed_family(m)?;
            R::ListChanged(family)
        }
    };
    Some(requirement)
}

fn list_changed_family(method: &str) -> Option<CapabilityFamily> {
    let inner = method
        .strip_prefix("notifications/")?
        .strip_suffix("/list_changed")?;
    match inner {
        "roots" => Some(CapabilityFamily::Roots),
        "tools" => Some(CapabilityFamily::Tools),
        "resources" => Some(CapabilityFamily::Resources),
        "prompts" => Some(CapabilityFamily::Prompts),
        "completions" => Some(CapabilityFamily::Completions),
        "tasks" => Some(CapabilityFamily::Tasks),
        _ => None,
    }
}

/// Peer identity exchanged during initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
    /// Human-readable display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Implementation {
    /// Create a new implementation descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            title: None,
        }
    }

    /// Set the display title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Initialize request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol version the client prefers.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client capabilities.
    pub capabilities: Capabilities,
    /// Client identity.
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

impl InitializeParams {
    /// Create initialize parameters advertising the latest protocol version.
    #[must_use]
    pub fn new(client_info: Implementation, capabilities: Capabilities) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            client_info,
        }
    }
}

/// Initialize response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version the server selected.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Optional usage instructions for this server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl InitializeResult {
    /// Create an initialize result advertising the latest protocol version.
    #[must_use]
    pub fn new(server_info: Implementation, capabilities: Capabilities) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info,
            instructions: None,
        }
    }

    /// Set usage instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// The latest protocol version supported by this implementation.
pub const PROTOCOL_VERSION: &str = "2025-11-25";

/// All protocol versions supported by this implementation.
///
/// Version negotiation happens during initialization:
/// 1. The client sends its preferred (latest) version
/// 2. The server echoes it if supported, or counter-offers its own preferred
///    version
/// 3. The client must support the server's version or disconnect
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[
    "2025-11-25", // Latest - tasks, side-channel queues
    "2025-06-18", // Elicitation, structured output
    "2025-03-26", // Streamable HTTP, tool annotations
    "2024-11-05", // Original MCP specification
];

/// Check if a protocol version is supported by this implementation.
#[must_use]
pub fn is_version_supported(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// Negotiate a protocol version between client and server.
///
/// Returns the requested version when supported, otherwise this
/// implementation's preferred (latest) version as a counter-offer. The
/// client decides whether it can live with the returned version.
#[must_use]
pub fn negotiate_version(requested_version: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|&&v| v == requested_version)
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trip() {
        let caps = Capabilities::new()
            .with_tools_and_changes()
            .with_resources_and_subscriptions()
            .with_tasks_for(["tools/call"]);

        assert!(caps.has_tools());
        assert!(caps.has_resources());
        assert!(caps.has_tasks());
        assert!(caps.satisfies(CapabilityRequirement::ResourceSubscribe));
        assert!(caps.satisfies(CapabilityRequirement::ListChanged(CapabilityFamily::Tools)));

        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["tools"]["listChanged"], true);
        assert!(json["tasks"]["requests"].get("tools/call").is_some());
        let back: Capabilities = serde_json::from_value(json).unwrap();
        assert_eq!(back, caps);
    }

    #[test]
    fn method_map() {
        use CapabilityFamily as F;
        use CapabilityRequirement as R;
        assert_eq!(required_capability("tools/call"), Some(R::Family(F::Tools)));
        assert_eq!(
            required_capability("resources/subscribe"),
            Some(R::ResourceSubscribe)
        );
        assert_eq!(
            required_capability("tasks/result"),
            Some(R::Family(F::Tasks))
        );
        assert_eq!(
            required_capability("notifications/prompts/list_changed"),
            Some(R::ListChanged(F::Prompts))
        );
        assert_eq!(required_capability("initialize"), None);
        assert_eq!(required_capability("ping"), None);
        assert_eq!(required_capability("vendor/custom"), None);
    }

    #[test]
    fn peer_gate_names_capability() {
        let caps = Capabilities::new().with_prompts();
        let err = caps.ensure_peer_capability("tools/call").unwrap_err();
        assert!(err.to_string().contains("tools"));
        assert!(caps.ensure_peer_capability("prompts/get").is_ok());
        // Unknown methods are advisory, never an error.
        assert!(caps.ensure_peer_capability("vendor/custom").is_ok());
    }

    #[test]
    fn task_augmentation_gate() {
        let caps = Capabilities::new().with_tasks_for(["tools/call"]);
        assert!(caps.ensure_task_augmentation("tools/call").is_ok());
        assert!(caps.ensure_task_augmentation("prompts/get").is_err());

        let bare = Capabilities::new().with_tasks();
        assert!(bare.ensure_task_augmentation("tools/call").is_err());
    }

    #[test]
    fn version_negotiation() {
        assert!(is_version_supported("2025-11-25"));
        assert!(is_version_supported("2024-11-05"));
        assert!(!is_version_supported("1.0.0"));
        assert_eq!(negotiate_version("2024-11-05"), "2024-11-05");
        assert_eq!(negotiate_version("1.0.0"), PROTOCOL_VERSION);
    }

    #[test]
    fn initialize_payloads() {
        let params = InitializeParams::new(
            Implementation::new("test-client", "1.0.0"),
            Capabilities::new().with_sampling(),
        );
        assert_eq!(params.protocol_version, PROTOCOL_VERSION);

        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("clientInfo").is_some());
        assert!(json.get("protocolVersion").is_some());

        let result = InitializeResult::new(
            Implementation::new("test-server", "1.0.0"),
            Capabilities::new().with_tools(),
        )
        .instructions("be gentle");
        assert!(result.instructions.is_some());
    }
}
