// CLI module
//
// This module contains command-line interface functionality:
// - arguments: Command-line argument parsing and settings overrides

pub mod arguments;

pub use arguments::DevproxyArguments;
