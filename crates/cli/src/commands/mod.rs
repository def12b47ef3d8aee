pub mod replay;
pub mod snapshot;
