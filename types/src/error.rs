use thiserror::Error;

/// Fatal conditions for a witness run. Every variant aborts the run;
/// recovery is restart-and-resume from the last durably committed height.
#[derive(Debug, Error)]
pub enum Error {
    #[error("witness decode failed: {0}")]
    Decode(String),

    #[error("state inconsistency at height {height}: {detail}")]
    StateInconsistency { height: u64, detail: String },

    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    #[error("commitment mismatch at height {height}: {detail}")]
    CommitmentMismatch { height: u64, detail: String },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("witness store: {0}")]
    Store(String),

    #[error("account tree: {0}")]
    Tree(String),
}

pub type Result<T> = core::result::Result<T, Error>;
