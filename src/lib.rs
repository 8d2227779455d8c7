//! # class-scene
//!
//! The class registry and resolution engine behind whole-program analysis of JVM
//! and Android programs.
//!
//! ## Architecture
//!
//! - **scene**: The context object tying everything together; bulk loading, basic classes, main class
//! - **registry**: Name-to-descriptor table with application/library/phantom partitions and a mutation counter
//! - **resolver**: Drives classes through hierarchy, signature and body resolution levels
//! - **source**: The class-source contract and an in-memory provider
//! - **locator**: Class path indexing and class-file reading
//! - **classpath**: Effective class path and Java runtime detection
//! - **runtime**: Core runtime classes used when no runtime modules are on disk
//! - **android**: Android platform jar selection and manifest reading
//! - **numberer**: Dense ids for classes, members, locals, units and contexts
//! - **cache**: Counter-stamped analysis artifacts (hierarchy, call graph, points-to, ...)
//! - **hierarchy**, **callgraph**, **analysis**: The artifacts themselves
//! - **entry_points**: Entry point providers
//! - **names**: Quoting of reserved identifiers and signature helpers

pub mod analysis;
pub mod android;
pub mod cache;
pub mod callgraph;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod entry_points;
pub mod error;
pub mod hierarchy;
pub mod locator;
pub mod model;
pub mod names;
pub mod numberer;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod scene;
pub mod source;
