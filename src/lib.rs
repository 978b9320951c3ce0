//! Workspace root stub. The real crates live under `crates/`.
