//! Runtime plumbing shared by the plugin.

pub mod runtime;
