//! natjar engine
//!
//! Compiles selected methods of a JVM program to native code and repackages
//! the program so those methods run through JNI:
//! - **Class model**: class-file codec and the program index (`classfile`, `index`)
//! - **Selection**: which methods are translated (`select`)
//! - **Translation**: bytecode to the native IR (`compiler`, `ir`)
//! - **Patch-back**: stubs, trampolines and the loader class (`postprocess`)
//! - **Packaging**: cross-compilation and jar output (`artifact`, `archive`)
//!
//! [`Session`] runs the whole pipeline for one set of [`CompileOptions`].

#![warn(rust_2018_idioms)]

pub mod archive;
pub mod artifact;
pub mod classfile;
pub mod compiler;
pub mod config;
pub mod error;
pub mod index;
pub mod ir;
pub mod postprocess;
pub mod select;
pub mod session;

pub use artifact::{ToolchainDriver, ToolchainError};
pub use compiler::{CompileError, Compiler};
pub use config::{CompileOptions, Config, ConfigError, MethodPattern};
pub use error::{Error, Result};
pub use index::{ClassId, MethodId, ProgramIndex};
pub use postprocess::{PatchReport, Postprocessor};
pub use select::{select_for_compilation, SkipNotice};
pub use session::{EmbeddedArtifact, Session, SessionReport};
