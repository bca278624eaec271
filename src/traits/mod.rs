//! Core traits shared by scopes and components.

mod dispose;
mod resolver;

pub use dispose::Dispose;
pub use resolver::ScopeResolveExt;
