//! Workspace packages and their discovery from `package.json` manifests.

mod discover;
mod package;

pub use discover::discover;
pub use package::Package;
