//! monopub adapters - npm and pnpm collaborators
//!
//! [`PnpmTool`] bumps, builds and publishes packages by running `npm` and
//! `pnpm` inside the package directory. [`NpmRegistry`] reads published
//! metadata with `npm view`.

mod command;
pub mod pnpm;
pub mod registry;

pub use command::{CommandOutput, ToolCommand};
pub use pnpm::PnpmTool;
pub use registry::NpmRegistry;
