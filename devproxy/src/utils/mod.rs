// Utilities module
//
// This module contains common utility functions:
// - path: Lexical URL path manipulation
// - validation: Common validation helpers

pub mod path;
pub mod validation;
