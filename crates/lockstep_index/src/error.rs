//! Spatial-index error types.

/// Errors raised while configuring the spatial index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// Every one of the 64 group bits is taken.
    #[error("cannot allocate group `{0}`: all 64 index groups are in use")]
    GroupsExhausted(String),

    #[error("index group `{0}` is already allocated")]
    DuplicateGroup(String),
}
