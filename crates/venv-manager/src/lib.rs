//! Venv-Manager: Python environment integration for fnship
//!
//! This crate provides the dependency-installation layer for fnship.
//! It drives the `venv` stdlib module and pip to build an isolated
//! installed-package tree that the packager archives.
//!
//! ## Layer 2 - Environment/Tooling
//!
//! Focus: correct subprocess handling and installed-tree resolution.

pub mod error;
pub mod venv;

pub use error::{Result, VenvError};
pub use venv::{is_python_available, InstallReport, VirtualEnv};
