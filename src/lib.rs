// Workflow model, YAML parser and validation
pub mod workflow;

// Compilation façade: file/struct entry points and error kinds
pub mod compiler;

// Code generator and build driver
pub mod generator;

// Environment-derived configuration
pub mod config;

// Runtime services linked into generated executables
pub mod runtime;

// Subprocess inference workers (client + server halves)
pub mod worker;

// Native inference boundary (llama.cpp)
pub mod llama;
