use thiserror::Error;

/// Errors raised while resolving and scheduling the package graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("{}", unknown_package_message(.name, .referenced_by.as_deref()))]
    UnknownPackage {
        name: String,
        referenced_by: Option<String>,
    },

    #[error("Duplicate package name: {0}")]
    DuplicatePackage(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ExecutorError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DependencyCycle(_) => 2,
            Self::UnknownPackage { .. } => 3,
            Self::DuplicatePackage(_) | Self::InvalidPattern { .. } => 11,
        }
    }
}

fn unknown_package_message(name: &str, referenced_by: Option<&str>) -> String {
    match referenced_by {
        Some(parent) => format!("Unknown package '{name}' (required by '{parent}')"),
        None => format!("Unknown package '{name}'"),
    }
}
