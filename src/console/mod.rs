//! One-shot console commands that run beside the script slot: ad-hoc shell
//! command lines and interpreter package management.

pub mod command;
pub mod package;

pub use command::{run_program, run_shell_command};
pub use package::{run_package_command, PackageAction};
