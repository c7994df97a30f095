// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' and 'transform/export.rs' use mmap to map files into memory

//! # classmend
//!
//! A load-time patching engine for compiled JVM classes. `classmend` sits behind a runtime's
//! class loading hook, matches every class about to be defined against a set of declarative patch
//! rules, and rewrites the matching ones (down to single instructions) before they ever run.
//!
//! The typical use is defensive: switching off a vulnerable code path or redacting a sensitive
//! value inside a third-party library without rebuilding it.
//!
//! ## Features
//!
//! - **Lazy parsing** - classes nobody patches are never parsed
//! - **Declarative selectors** - classes, methods and instructions, with namespace prefixes and
//!   partial descriptors
//! - **Validated up front** - malformed patch definitions are rejected at registration, not at
//!   load time
//! - **Verifiable output** - stack map frames are recomputed against a shared, lazily resolved
//!   type hierarchy
//! - **Fail safe** - a failing patch is rolled back and logged, and the hook never lets an error
//!   or a panic reach the loading thread
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use classmend::prelude::*;
//!
//! let settings = MapSettings::new().with("patch.log4j.jndi", "true");
//! let mut registry = PatchRegistry::with_settings(Arc::new(settings));
//!
//! registry.register(
//!     PatchDefinition::new("JndiLookup")
//!         .category("log4j")
//!         .target(TargetSelector::new("org/apache/logging/log4j/core/lookup/JndiLookup"))
//!         .action(
//!             PatchAction::new(
//!                 "lookup",
//!                 "jndi",
//!                 Executable::method(|_, method, _| {
//!                     let code = method.clear_body();
//!                     code.instructions.push(Insn::op(opcodes::ACONST_NULL));
//!                     code.instructions.push(Insn::op(opcodes::ARETURN));
//!                     Ok(())
//!                 }),
//!             )
//!             .method(MethodSelector::new(
//!                 "lookup",
//!                 "(Lorg/apache/logging/log4j/core/LogEvent;Ljava/lang/String;)",
//!             )),
//!         ),
//! );
//!
//! let hook = ClassFileHook::new(registry.build_transformer());
//! // the host runtime then calls `hook.transform(loader, name, bytes)` for every class it loads
//! # let _ = hook;
//! ```
//!
//! ## Architecture
//!
//! - [`classfile`] - the class file model, its reader and writer
//! - [`loader`] - where class bytes come from when the hierarchy needs them
//! - [`hierarchy`] - the type hierarchy resolver and its process-wide cache
//! - [`matcher`] - the selector predicates
//! - [`patch`] - patch definitions, validation and the registry
//! - [`transform`] - the transformation pipeline
//! - [`hook`] - the boundary to the host runtime
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber itself. Rejected
//! definitions and crashed transforms are reported at `error`, failing actions and failed exports
//! at `warn`, everything else at `debug`.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust
/// use classmend::prelude::*;
///
/// let registry = PatchRegistry::new();
/// let hook = ClassFileHook::new(registry.build_transformer());
/// # let _ = hook;
/// ```
pub mod prelude;

/// Byte sources and the bounds-checked big-endian parser.
pub mod file;

/// The class file model: parse, edit and write JVM class files.
///
/// # Examples
///
/// ```rust
/// use classmend::classfile::{ClassBuilder, ClassFile};
///
/// let bytes = ClassBuilder::new("org/demo/Empty").constructor().build()?;
/// let class = ClassFile::parse(&bytes)?;
/// assert_eq!(class.name, "org/demo/Empty");
/// assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
/// # Ok::<(), classmend::Error>(())
/// ```
pub mod classfile;

/// Resource spaces class headers are resolved from.
pub mod loader;

pub mod hierarchy;

pub mod matcher;

pub mod patch;

pub mod transform;

pub mod hook;

/// `classmend` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classmend` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use classmend::{classfile::ClassFile, Error};
///
/// match ClassFile::parse(b"not a class") {
///     Ok(_) => unreachable!(),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Bounds-checked big-endian reader used by every decoder in the crate.
pub use file::parser::Parser;
