//! protobind - protoc front end, protoc plugin and message transcoder
//!
//! Without a subcommand the binary acts as a protoc plugin: it reads a
//! `CodeGeneratorRequest` from stdin and writes a `CodeGeneratorResponse` to
//! stdout. The `compile` subcommand drives protoc with this binary as the
//! plugin; `encode` and `decode` convert messages between JSON and the
//! binary wire format using a descriptor set.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use prost::Message;
use prost_types::compiler::{code_generator_response, CodeGeneratorRequest, CodeGeneratorResponse};
use protobind_core::{
    BinaryCodec, Codec, Compiler, Generator, GeneratorOptions, JsonCodec, SchemaWriter,
};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Oldest protoc that supports plugins with parameters
const MIN_PROTOC_VERSION: (u32, u32, u32) = (2, 3, 0);

/// Feature bit for proto3 `optional` fields in plugin responses
const FEATURE_PROTO3_OPTIONAL: u64 = 1;

/// Protocol Buffers schema compiler, protoc plugin and transcoder
#[derive(Parser, Debug)]
#[command(name = "protobind")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run protoc on .proto files with protobind as the plugin
    Compile(CompileArgs),
    /// Convert a JSON message to the binary wire format
    Encode(TranscodeArgs),
    /// Convert a binary message to JSON
    Decode(TranscodeArgs),
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// .proto files or directories containing them
    #[arg(required = true)]
    protos: Vec<PathBuf>,

    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Additional import search paths
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// protoc executable
    #[arg(long, default_value = "protoc")]
    protoc: PathBuf,

    /// Also write a JSON summary of each file
    #[arg(short, long)]
    json: bool,

    /// Only generate the files named on the command line
    #[arg(long)]
    skip_imported: bool,

    /// Copy source comments into the output
    #[arg(long)]
    comments: bool,

    /// Emit insertion point markers
    #[arg(long)]
    insertions: bool,

    /// Leave the generation date out of file headers
    #[arg(long)]
    no_timestamp: bool,

    /// Generator option as key[=value] (repeatable)
    #[arg(short = 'D', long = "define", value_name = "KEY[=VALUE]")]
    define: Vec<String>,

    /// Bundled import directory, searched before --include
    #[arg(long, env = "PROTOBIND_INCLUDE")]
    bundled_include: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TranscodeArgs {
    /// Serialized FileDescriptorSet (protoc --descriptor_set_out)
    #[arg(short = 'd', long = "descriptor-set")]
    descriptor_set: PathBuf,

    /// Fully-qualified message type
    #[arg(short = 't', long = "type")]
    type_name: String,

    /// Input file (stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Indent JSON output
    #[arg(long)]
    pretty: bool,
}

/// Failures caused by the environment or the invocation rather than by
/// protobind itself. These exit with status 1.
#[derive(Debug, thiserror::Error)]
enum UsageError {
    #[error("protoc not found: {0}")]
    ProtocNotFound(String),

    #[error("protoc {found} is too old, {required} or newer is required")]
    ProtocTooOld { found: String, required: String },

    #[error("input does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("no .proto files found under {0}")]
    NoProtos(PathBuf),

    #[error("invalid definition: {0}")]
    InvalidDefine(String),

    #[error("protoc failed with {0}")]
    ProtocFailed(std::process::ExitStatus),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing; stdout carries plugin responses and payloads
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Compile(ref args)) => compile(args),
        Some(Commands::Encode(ref args)) => encode(args),
        Some(Commands::Decode(ref args)) => decode(args),
        None => run_plugin(io::stdin().lock(), io::stdout().lock()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            if e.downcast_ref::<UsageError>().is_some() {
                ExitCode::from(1)
            } else {
                ExitCode::from(255)
            }
        }
    }
}

/// Plugin mode: one request in, one response out
fn run_plugin(mut input: impl Read, mut output: impl Write) -> Result<()> {
    let mut buf = Vec::new();
    input
        .read_to_end(&mut buf)
        .context("Failed to read plugin request from stdin")?;
    let request =
        CodeGeneratorRequest::decode(buf.as_slice()).context("Failed to decode plugin request")?;

    let response = plugin_response(&request);
    output
        .write_all(&response.encode_to_vec())
        .context("Failed to write plugin response")?;
    output.flush()?;
    Ok(())
}

/// Builds the response for a request; schema problems go into `error`.
fn plugin_response(request: &CodeGeneratorRequest) -> CodeGeneratorResponse {
    let mut response = CodeGeneratorResponse {
        supported_features: Some(FEATURE_PROTO3_OPTIONAL),
        ..Default::default()
    };

    let generated = GeneratorOptions::parse(request.parameter()).and_then(|options| {
        let schema = Compiler::with_options(options.clone()).compile_request(request)?;
        SchemaWriter::new().generate(&schema, &options)
    });

    match generated {
        Ok(files) => {
            info!("Generated {} files", files.len());
            response.file = files
                .into_iter()
                .map(|f| code_generator_response::File {
                    name: Some(f.name),
                    content: Some(f.content),
                    ..Default::default()
                })
                .collect();
        }
        Err(e) => {
            warn!("Generation failed: {}", e);
            response.error = Some(e.to_string());
        }
    }
    response
}

fn compile(args: &CompileArgs) -> Result<()> {
    let version = check_protoc(&args.protoc)?;
    info!("Using protoc {}", version);

    let protos = resolve_protos(&args.protos)?;
    let options = generator_options(args, &protos)?;

    let mut proto_paths = Vec::new();
    if let Some(bundled) = args.bundled_include.as_ref().filter(|p| p.is_dir()) {
        proto_paths.push(bundled.clone());
    }
    proto_paths.extend(args.include.iter().cloned());
    if args.include.is_empty() {
        proto_paths.push(PathBuf::from("."));
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create directory: {}", args.out.display()))?;
    let plugin = std::env::current_exe().context("Failed to locate the protobind executable")?;

    let mut command = Command::new(&args.protoc);
    command.arg(format!("--plugin=protoc-gen-protobind={}", plugin.display()));
    for path in &proto_paths {
        command.arg(format!("--proto_path={}", path.display()));
    }
    command.arg(format!(
        "--protobind_out={}:{}",
        options.to_query(),
        args.out.display()
    ));
    command.args(&protos);

    debug!("Running {:?}", command);
    let status = command
        .status()
        .with_context(|| format!("Failed to run {}", args.protoc.display()))?;
    if !status.success() {
        return Err(UsageError::ProtocFailed(status).into());
    }

    println!("Wrote output for {} files to {}", protos.len(), args.out.display());
    Ok(())
}

/// Runs `protoc --version` and checks it against [`MIN_PROTOC_VERSION`]
fn check_protoc(protoc: &Path) -> Result<String> {
    let output = Command::new(protoc)
        .arg("--version")
        .output()
        .map_err(|e| UsageError::ProtocNotFound(format!("{}: {}", protoc.display(), e)))?;
    if !output.status.success() {
        return Err(UsageError::ProtocNotFound(format!(
            "{} --version exited with {}",
            protoc.display(),
            output.status
        ))
        .into());
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let found = parse_protoc_version(&text)
        .ok_or_else(|| UsageError::ProtocNotFound(format!("unrecognised version '{}'", text)))?;
    if found < MIN_PROTOC_VERSION {
        let (major, minor, patch) = MIN_PROTOC_VERSION;
        return Err(UsageError::ProtocTooOld {
            found: text,
            required: format!("{}.{}.{}", major, minor, patch),
        }
        .into());
    }
    Ok(text)
}

/// Parses `libprotoc X.Y[.Z]`; missing components count as zero.
fn parse_protoc_version(text: &str) -> Option<(u32, u32, u32)> {
    let version = text.split_whitespace().last()?;
    // Release candidates report e.g. 3.21.0-rc1
    let version = version.split('-').next()?;
    let mut parts = version.split('.').map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some((major, minor, patch))
}

/// Expands directories into the `.proto` files below them
fn resolve_protos(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut protos = Vec::new();

    for input in inputs {
        if !input.exists() {
            return Err(UsageError::MissingInput(input.clone()).into());
        }
        if input.is_file() {
            protos.push(input.clone());
            continue;
        }

        let before = protos.len();
        for entry in WalkDir::new(input)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "proto") {
                trace!("Found {}", path.display());
                protos.push(path.to_path_buf());
            }
        }
        if protos.len() == before {
            return Err(UsageError::NoProtos(input.clone()).into());
        }
    }

    Ok(protos)
}

fn generator_options(args: &CompileArgs, protos: &[PathBuf]) -> Result<GeneratorOptions> {
    let mut options = GeneratorOptions::new()
        .comments(args.comments)
        .json(args.json)
        .skip_imported(args.skip_imported)
        .insertions(args.insertions)
        .no_timestamp(args.no_timestamp)
        .protos(protos.iter().map(|p| p.display().to_string()));

    for define in &args.define {
        options
            .define(define)
            .map_err(|e| UsageError::InvalidDefine(e.to_string()))?;
    }
    Ok(options)
}

fn read_input(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn load_schema(path: &Path) -> Result<protobind_core::LinkedSchema> {
    if !path.is_file() {
        return Err(UsageError::MissingInput(path.to_path_buf()).into());
    }
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
    Compiler::new()
        .compile_descriptor_set(&bytes)
        .with_context(|| format!("Failed to link descriptor set: {}", path.display()))
}

fn encode(args: &TranscodeArgs) -> Result<()> {
    let schema = load_schema(&args.descriptor_set)?;
    let input = read_input(args.input.as_deref())?;
    let out = json_to_binary(&schema, &args.type_name, &input)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&out)?;
    stdout.flush()?;
    Ok(())
}

fn decode(args: &TranscodeArgs) -> Result<()> {
    let schema = load_schema(&args.descriptor_set)?;
    let input = read_input(args.input.as_deref())?;
    let out = binary_to_json(&schema, &args.type_name, &input, args.pretty)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&out)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

fn json_to_binary(
    schema: &protobind_core::LinkedSchema,
    type_name: &str,
    input: &[u8],
) -> Result<Vec<u8>> {
    let message = JsonCodec::new()
        .decode(schema.pool(), type_name, input)
        .with_context(|| format!("Failed to parse JSON as {}", type_name))?;
    BinaryCodec
        .encode(schema.pool(), &message)
        .with_context(|| format!("Failed to encode {}", type_name))
}

fn binary_to_json(
    schema: &protobind_core::LinkedSchema,
    type_name: &str,
    input: &[u8],
    pretty: bool,
) -> Result<Vec<u8>> {
    let message = BinaryCodec
        .decode(schema.pool(), type_name, input)
        .with_context(|| format!("Failed to decode {}", type_name))?;
    let codec = if pretty {
        JsonCodec::new().pretty()
    } else {
        JsonCodec::new()
    };
    codec
        .encode(schema.pool(), &message)
        .with_context(|| format!("Failed to render {} as JSON", type_name))
}
