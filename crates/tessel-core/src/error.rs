//! Error types for Tessel

use std::collections::HashMap;
use thiserror::Error;

/// Context information for errors to aid in debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Operation that was being performed when the error occurred
    pub operation: String,
    /// Component or module where the error occurred
    pub component: String,
    /// Additional contextual data
    pub metadata: HashMap<String, String>,
    /// Call path if available
    pub call_path: Option<String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            component: component.into(),
            metadata: HashMap::new(),
            call_path: None,
        }
    }

    /// Add metadata to the context
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Add call path information
    pub fn with_call_path(mut self, path: impl Into<String>) -> Self {
        self.call_path = Some(path.into());
        self
    }

    /// Format context for logging
    pub fn format_for_log(&self) -> String {
        let mut parts = vec![
            format!("operation={}", self.operation),
            format!("component={}", self.component),
        ];

        if !self.metadata.is_empty() {
            let mut entries: Vec<_> = self.metadata.iter().collect();
            entries.sort();
            let metadata_str = entries
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("metadata=[{}]", metadata_str));
        }

        if let Some(ref path) = self.call_path {
            parts.push(format!("call_path={}", path));
        }

        parts.join(", ")
    }
}

/// Main error type for Tessel operations
#[derive(Debug, Error)]
pub enum TesselError {
    #[error("Device error: {message}")]
    Device {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Initialization error: {message}")]
    Initialization {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Unsupported: {message}")]
    Unsupported {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Other error: {message}")]
    Other {
        message: String,
        context: Option<ErrorContext>,
    },

    /// A handle that is the invalid sentinel, out of range, or points at a destroyed slot
    #[error("Invalid {kind} handle {index:?}")]
    InvalidHandle {
        kind: &'static str,
        index: Option<u32>,
    },

    #[error("No active pipeline: call use_shader before binding resources")]
    NoActivePipeline,

    #[error("Nothing to draw: bind a mesh before calling draw")]
    NoMeshBound,

    #[error("Binding mismatch: {samplers} samplers supplied for {textures} textures")]
    BindingMismatch { samplers: usize, textures: usize },

    /// The device rejected the creation of a resource
    #[error("Failed to create {kind}: {message}")]
    ResourceCreation { kind: &'static str, message: String },

    #[error("Failed to load {stage} shader: {message}")]
    ShaderLoad { stage: &'static str, message: String },

    /// A single texture row does not fit the staging buffer
    #[error("Texture row of {row_bytes} bytes exceeds staging capacity of {capacity} bytes")]
    RowExceedsStaging { row_bytes: u64, capacity: u32 },

    #[error("Range {offset}..{offset}+{length} exceeds resource size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("Expected {expected} bytes of data, got {actual}")]
    DataTooShort { expected: u64, actual: u64 },

    #[error("No completed download for ticket {ticket}")]
    UnknownDownload { ticket: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TesselError {
    /// Create a device error with context
    pub fn device_with_context<S: Into<String>>(msg: S, context: ErrorContext) -> Self {
        Self::Device {
            message: msg.into(),
            context: Some(context),
        }
    }

    /// Create an initialization error with context
    pub fn initialization_with_context<S: Into<String>>(msg: S, context: ErrorContext) -> Self {
        Self::Initialization {
            message: msg.into(),
            context: Some(context),
        }
    }

    /// Create a configuration error with context
    pub fn configuration_with_context<S: Into<String>>(msg: S, context: ErrorContext) -> Self {
        Self::Configuration {
            message: msg.into(),
            context: Some(context),
        }
    }

    /// Create an unsupported-operation error with context
    pub fn unsupported_with_context<S: Into<String>>(msg: S, context: ErrorContext) -> Self {
        Self::Unsupported {
            message: msg.into(),
            context: Some(context),
        }
    }

    /// Create a device error from a string
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::Device {
            message: msg.into(),
            context: None,
        }
    }

    /// Create an initialization error from a string
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::Initialization {
            message: msg.into(),
            context: None,
        }
    }

    /// Create a configuration error from a string
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration {
            message: msg.into(),
            context: None,
        }
    }

    /// Create an unsupported-operation error from a string
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported {
            message: msg.into(),
            context: None,
        }
    }

    /// Create an other error from a string
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other {
            message: msg.into(),
            context: None,
        }
    }

    /// Creation failure for a resource of the given kind
    pub fn creation<S: Into<String>>(kind: &'static str, msg: S) -> Self {
        Self::ResourceCreation {
            kind,
            message: msg.into(),
        }
    }

    /// Get the error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Device { context, .. }
            | Self::Initialization { context, .. }
            | Self::Configuration { context, .. }
            | Self::Unsupported { context, .. }
            | Self::Other { context, .. } => context.as_ref(),
            _ => None,
        }
    }

    /// Whether this error reports a violated call precondition rather than a device failure
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidHandle { .. }
                | Self::NoActivePipeline
                | Self::NoMeshBound
                | Self::BindingMismatch { .. }
                | Self::OutOfBounds { .. }
                | Self::DataTooShort { .. }
        )
    }

    /// Format error with context for logging
    pub fn format_for_log(&self) -> String {
        let base_msg = self.to_string();
        if let Some(context) = self.context() {
            format!("{} [{}]", base_msg, context.format_for_log())
        } else {
            base_msg
        }
    }
}

/// Result type alias for Tessel operations
pub type Result<T> = std::result::Result<T, TesselError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_formatting_is_stable() {
        let ctx = ErrorContext::new("create_texture", "renderer")
            .with_metadata("width", 0)
            .with_metadata("format", "rgba8_unorm")
            .with_call_path("Renderer::create_texture");

        assert_eq!(
            ctx.format_for_log(),
            "operation=create_texture, component=renderer, \
             metadata=[format=rgba8_unorm, width=0], call_path=Renderer::create_texture"
        );
    }

    #[test]
    fn test_format_for_log_includes_context() {
        let err = TesselError::configuration_with_context(
            "staging capacity must be a multiple of 4",
            ErrorContext::new("validate", "config"),
        );
        let line = err.format_for_log();
        assert!(line.starts_with("Configuration error: staging capacity"));
        assert!(line.contains("operation=validate"));

        let plain = TesselError::NoActivePipeline;
        assert!(plain.context().is_none());
        assert_eq!(plain.format_for_log(), plain.to_string());
    }

    #[test]
    fn test_precondition_classification() {
        assert!(TesselError::BindingMismatch {
            samplers: 2,
            textures: 1
        }
        .is_precondition());
        assert!(TesselError::InvalidHandle {
            kind: "buffer",
            index: None
        }
        .is_precondition());
        assert!(!TesselError::creation("texture", "out of memory").is_precondition());
        assert!(!TesselError::RowExceedsStaging {
            row_bytes: 64,
            capacity: 16
        }
        .is_precondition());
    }

    #[test]
    fn test_io_conversion() {
        fn read() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(read(), Err(TesselError::Io(_))));
    }
}
