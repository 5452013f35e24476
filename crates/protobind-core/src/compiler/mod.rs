//! Schema compiler.
//!
//! Turns serialized descriptors into a linked [`DescriptorPool`]. Two inputs
//! are accepted:
//!
//! - a `FileDescriptorSet` (as written by `protoc --descriptor_set_out`),
//!   where every file is a root;
//! - a protoc `CodeGeneratorRequest` (plugin mode), where the roots are the
//!   files protoc asked to generate.
//!
//! Either way the dependency closure of the roots is linked and a
//! [`LinkedSchema`] is returned, listing the files the generator stage
//! should render.

mod generator;
mod link;
mod options;

use crate::descriptor::DescriptorPool;
use crate::error::Result;
use link::Linker;
use prost::Message;
use prost_types::compiler::CodeGeneratorRequest;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use tracing::debug;

pub use generator::{GeneratedFile, Generator, SchemaWriter};
pub use options::{GeneratorOptions, DEFAULT_SUFFIX};

pub(crate) use link::to_lower_camel_case;

/// Output of a successful link
#[derive(Debug, Clone)]
pub struct LinkedSchema {
    pool: DescriptorPool,
    files_to_generate: Vec<String>,
}

impl LinkedSchema {
    /// The linked descriptors
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Consumes the schema, keeping only the pool
    pub fn into_pool(self) -> DescriptorPool {
        self.pool
    }

    /// Files the generator stage should render, dependencies first
    pub fn files_to_generate(&self) -> &[String] {
        &self.files_to_generate
    }
}

/// Links descriptor inputs into a [`LinkedSchema`]
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: GeneratorOptions,
}

impl Compiler {
    /// Creates a compiler with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compiler with the given generator options
    pub fn with_options(options: GeneratorOptions) -> Self {
        Self { options }
    }

    /// Returns the generator options
    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Links a serialized `FileDescriptorSet`; every file in it is a root.
    pub fn compile_descriptor_set(&self, bytes: &[u8]) -> Result<LinkedSchema> {
        let set = FileDescriptorSet::decode(bytes)?;
        debug!("Decoded descriptor set with {} files", set.file.len());
        let roots: Vec<String> = set.file.iter().map(|f| f.name().to_string()).collect();
        self.compile_files(&set.file, &roots)
    }

    /// Links the files of a plugin request; roots are `file_to_generate`.
    pub fn compile_request(&self, request: &CodeGeneratorRequest) -> Result<LinkedSchema> {
        debug!(
            "Plugin request: {} files, {} to generate",
            request.proto_file.len(),
            request.file_to_generate.len()
        );
        self.compile_files(&request.proto_file, &request.file_to_generate)
    }

    /// Links the dependency closure of `roots` out of `files`.
    pub fn compile_files(
        &self,
        files: &[FileDescriptorProto],
        roots: &[String],
    ) -> Result<LinkedSchema> {
        let (pool, linked) = Linker::new(files).link(roots)?;

        let files_to_generate = if self.options.skip_imported {
            linked.into_iter().filter(|f| roots.contains(f)).collect()
        } else {
            linked
        };
        debug!(
            "Linked {} messages, {} enums; {} files to generate",
            pool.messages.len(),
            pool.enums.len(),
            files_to_generate.len()
        );

        Ok(LinkedSchema {
            pool,
            files_to_generate,
        })
    }
}
