//! Generator stage.
//!
//! A [`Generator`] turns a [`LinkedSchema`] into output files. The only
//! generator shipped is [`SchemaWriter`], which renders the linked model back
//! to `.proto` text (plus an optional JSON summary). Alternative output
//! formats plug in by implementing the trait.

use super::{to_lower_camel_case, GeneratorOptions, LinkedSchema};
use crate::descriptor::{
    DescriptorPool, EnumId, ExtensionId, FieldDescriptor, FieldType, FileDescriptor, Label,
    MessageDescriptor, MessageId, ServiceDescriptor, Syntax,
};
use crate::error::{Error, Result};
use crate::wire::MAX_FIELD_NUMBER;
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::fmt::Write as FmtWrite;
use std::ops::Range;
use tracing::{debug, info};

/// One file produced by a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the output directory
    pub name: String,
    /// File contents
    pub content: String,
}

/// Produces output files from a linked schema
pub trait Generator {
    /// Generates every file for `schema.files_to_generate()`
    fn generate(
        &mut self,
        schema: &LinkedSchema,
        options: &GeneratorOptions,
    ) -> Result<Vec<GeneratedFile>>;
}

/// Renders linked files back to `.proto` schema text
#[derive(Debug, Clone)]
pub struct SchemaWriter {
    indent_str: String,
    timestamp: Option<DateTime<Utc>>,
}

impl Default for SchemaWriter {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            timestamp: None,
        }
    }
}

fn render_error(_: std::fmt::Error) -> Error {
    Error::schema("generator", "failed to format output")
}

/// `dir/name.proto` -> `dir/name`
fn base_name(file: &str) -> &str {
    file.strip_suffix(".proto").unwrap_or(file)
}

impl SchemaWriter {
    /// Creates a writer with two-space indentation
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Pins the header timestamp instead of using the current time
    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    fn header(&self, options: &GeneratorOptions, source: &str) -> String {
        let mut header = format!(
            "// Generated by protobind {} from {}\n",
            crate::VERSION,
            source
        );
        if !options.no_timestamp {
            let at = self.timestamp.unwrap_or_else(Utc::now);
            header.push_str(&format!("// Date: {}\n", at.to_rfc3339()));
        }
        header.push('\n');
        header
    }

    fn render(
        &self,
        pool: &DescriptorPool,
        file: &FileDescriptor,
        options: &GeneratorOptions,
        part: Part,
    ) -> Result<String> {
        let mut output = self.header(options, file.name());
        let mut renderer = Renderer {
            writer: &mut output,
            pool,
            options,
            indent_str: &self.indent_str,
            indent_level: 0,
            syntax: file.syntax(),
        };
        renderer.write_file(file, part).map_err(render_error)?;
        Ok(output)
    }

    fn generate_file(
        &self,
        pool: &DescriptorPool,
        file: &FileDescriptor,
        options: &GeneratorOptions,
    ) -> Result<Vec<GeneratedFile>> {
        let base = base_name(file.name());
        let suffix = options.output_suffix();
        let mut generated = Vec::new();

        if options.multifile {
            for &id in file.messages() {
                let message = pool.message(id);
                generated.push(GeneratedFile {
                    name: format!("{}/{}{}", base, message.name(), suffix),
                    content: self.render(pool, file, options, Part::Message(id))?,
                });
            }
            let has_rest = !file.enums().is_empty()
                || !file.extensions().is_empty()
                || !file.services().is_empty();
            if has_rest {
                generated.push(GeneratedFile {
                    name: format!("{}{}", base, suffix),
                    content: self.render(pool, file, options, Part::Rest)?,
                });
            }
        } else {
            generated.push(GeneratedFile {
                name: format!("{}{}", base, suffix),
                content: self.render(pool, file, options, Part::Whole)?,
            });
        }

        if options.json {
            let summary = summarize_file(pool, file);
            generated.push(GeneratedFile {
                name: format!("{}.json", base),
                content: serde_json::to_string_pretty(&summary)?,
            });
        }

        Ok(generated)
    }
}

impl Generator for SchemaWriter {
    fn generate(
        &mut self,
        schema: &LinkedSchema,
        options: &GeneratorOptions,
    ) -> Result<Vec<GeneratedFile>> {
        let pool = schema.pool();
        let mut generated = Vec::new();

        for name in schema.files_to_generate() {
            let file = pool
                .get_file_by_name(name)
                .ok_or_else(|| Error::schema(name, "file is not part of the linked schema"))?;
            if options.verbose {
                info!("Generating schema text for {}", name);
            } else {
                debug!("Generating schema text for {}", name);
            }
            generated.extend(self.generate_file(pool, file, options)?);
        }

        Ok(generated)
    }
}

/// Which declarations of a file one output holds
#[derive(Debug, Clone, Copy)]
enum Part {
    Whole,
    Message(MessageId),
    Rest,
}

struct Renderer<'a, W: FmtWrite> {
    writer: &'a mut W,
    pool: &'a DescriptorPool,
    options: &'a GeneratorOptions,
    indent_str: &'a str,
    indent_level: usize,
    syntax: Syntax,
}

impl<'a, W: FmtWrite> Renderer<'a, W> {
    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_comments(&mut self, comments: Option<&str>) -> std::fmt::Result {
        let Some(comments) = comments.filter(|_| self.options.comments) else {
            return Ok(());
        };
        for line in comments.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                self.writeln("//")?;
            } else {
                self.writeln(&format!("// {}", line.trim_start()))?;
            }
        }
        Ok(())
    }

    fn write_insertion_point(&mut self, name: &str) -> std::fmt::Result {
        if self.options.insertions {
            self.writeln(&format!("// @@protoc_insertion_point({})", name))?;
        }
        Ok(())
    }

    fn write_file(&mut self, file: &FileDescriptor, part: Part) -> std::fmt::Result {
        writeln!(self.writer, "syntax = \"{}\";", file.syntax().as_str())?;
        writeln!(self.writer)?;

        if !file.package().is_empty() {
            writeln!(self.writer, "package {};", file.package())?;
            writeln!(self.writer)?;
        }

        if !file.dependencies().is_empty() {
            for dep in file.dependencies() {
                writeln!(self.writer, "import \"{}\";", dep)?;
            }
            writeln!(self.writer)?;
        }

        let (whole, rest) = match part {
            Part::Whole => (true, true),
            Part::Rest => (false, true),
            Part::Message(id) => {
                self.write_message(id)?;
                (false, false)
            }
        };

        if rest {
            for service in file.services() {
                self.write_service(service)?;
            }
        }
        if whole {
            for &id in file.messages() {
                self.write_message(id)?;
            }
        }
        if rest {
            for &id in file.enums() {
                self.write_enum(id)?;
            }
            self.write_extensions(file.extensions())?;
        }

        self.write_insertion_point("module_scope")
    }

    fn write_service(&mut self, service: &ServiceDescriptor) -> std::fmt::Result {
        writeln!(self.writer, "service {} {{", service.name())?;
        self.indent();

        for method in service.methods() {
            let input = format!(".{}", self.pool.message(method.input()).full_name());
            let output = format!(".{}", self.pool.message(method.output()).full_name());
            let input = if method.is_client_streaming() {
                format!("stream {}", input)
            } else {
                input
            };
            let output = if method.is_server_streaming() {
                format!("stream {}", output)
            } else {
                output
            };
            self.write_indent()?;
            writeln!(
                self.writer,
                "rpc {}({}) returns ({});",
                method.name(),
                input,
                output
            )?;
        }

        self.dedent();
        writeln!(self.writer, "}}")?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_message(&mut self, id: MessageId) -> std::fmt::Result {
        let pool = self.pool;
        let message = pool.message(id);

        self.write_comments(message.comments())?;
        self.writeln(&format!("message {} {{", message.name()))?;
        self.indent();

        self.write_reserved(message.reserved_ranges(), message.reserved_names())?;

        for &nested in message.nested_messages() {
            if pool.message(nested).is_map_entry() {
                continue;
            }
            self.write_message(nested)?;
        }

        for &enum_id in message.nested_enums() {
            self.write_enum(enum_id)?;
        }

        let mut written_oneofs = Vec::new();
        for field in message.fields() {
            match field.real_oneof_index() {
                None => self.write_field(field)?,
                Some(index) if written_oneofs.contains(&index) => {}
                Some(index) => {
                    written_oneofs.push(index);
                    self.write_oneof(message, index)?;
                }
            }
        }

        self.write_extensions(message.scoped_extensions())?;

        for range in message.extension_ranges() {
            self.write_indent()?;
            writeln!(
                self.writer,
                "extensions {} to {};",
                range.start,
                range_end(range)
            )?;
        }

        self.write_insertion_point(&format!("class_scope:{}", message.full_name()))?;

        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;

        Ok(())
    }

    fn write_reserved(&mut self, ranges: &[Range<u32>], names: &[String]) -> std::fmt::Result {
        if !names.is_empty() {
            self.write_indent()?;
            write!(self.writer, "reserved ")?;
            for (i, name) in names.iter().enumerate() {
                if i > 0 {
                    write!(self.writer, ", ")?;
                }
                write!(self.writer, "\"{}\"", name)?;
            }
            writeln!(self.writer, ";")?;
        }

        if !ranges.is_empty() {
            self.write_indent()?;
            write!(self.writer, "reserved ")?;
            for (i, range) in ranges.iter().enumerate() {
                if i > 0 {
                    write!(self.writer, ", ")?;
                }
                if range.start + 1 == range.end {
                    write!(self.writer, "{}", range.start)?;
                } else {
                    write!(self.writer, "{} to {}", range.start, range_end(range))?;
                }
            }
            writeln!(self.writer, ";")?;
        }

        Ok(())
    }

    fn map_entry_types(&self, field: &FieldDescriptor) -> Option<(String, String)> {
        let FieldType::Message(id) = field.field_type() else {
            return None;
        };
        let entry = self.pool.message(*id);
        if !entry.is_map_entry() {
            return None;
        }
        let key = entry.field(1)?;
        let value = entry.field(2)?;
        Some((self.field_type_name(key), self.field_type_name(value)))
    }

    /// Members of a oneof block are written in the block's first field slot.
    fn write_oneof(&mut self, message: &MessageDescriptor, index: usize) -> std::fmt::Result {
        let name = message.oneofs().get(index).map(String::as_str).unwrap_or_default();
        self.writeln(&format!("oneof {} {{", name))?;
        self.indent();
        for field in message.fields() {
            if field.real_oneof_index() == Some(index) {
                self.write_field(field)?;
            }
        }
        self.dedent();
        self.writeln("}")
    }

    fn field_label(&self, field: &FieldDescriptor) -> &'static str {
        if field.is_proto3_optional() {
            return "optional";
        }
        if field.real_oneof_index().is_some() {
            return "";
        }
        match (field.label(), self.syntax) {
            (Label::Optional, Syntax::Proto3) => "",
            (label, _) => label.as_str(),
        }
    }

    fn field_type_name(&self, field: &FieldDescriptor) -> String {
        match field.type_name() {
            Some(name) => format!(".{}", name),
            None => field.field_type().name().to_string(),
        }
    }

    fn write_field(&mut self, field: &FieldDescriptor) -> std::fmt::Result {
        self.write_comments(field.comments())?;
        self.write_indent()?;

        if let Some((key, value)) = self.map_entry_types(field) {
            writeln!(
                self.writer,
                "map<{}, {}> {} = {};",
                key,
                value,
                field.name(),
                field.number()
            )?;
            return Ok(());
        }

        let label = self.field_label(field);
        if !label.is_empty() {
            write!(self.writer, "{} ", label)?;
        }
        write!(
            self.writer,
            "{} {} = {}",
            self.field_type_name(field),
            field.name(),
            field.number()
        )?;
        self.write_field_options(field)?;
        writeln!(self.writer, ";")
    }

    fn write_field_options(&mut self, field: &FieldDescriptor) -> std::fmt::Result {
        let mut options = Vec::new();

        if let Some(default) = field.declared_default() {
            let formatted = match field.field_type() {
                FieldType::String => format!("\"{}\"", escape_string(default)),
                // Bytes defaults are already C-escaped in descriptors.
                FieldType::Bytes => format!("\"{}\"", default),
                _ => default.to_string(),
            };
            options.push(format!("default = {}", formatted));
        }

        if field.json_name() != to_lower_camel_case(field.name()) {
            options.push(format!("json_name = \"{}\"", field.json_name()));
        }

        if field.is_list() && field.field_type().is_packable() {
            match (self.syntax, field.is_packed()) {
                (Syntax::Proto2, true) => options.push("packed = true".to_string()),
                (Syntax::Proto3, false) => options.push("packed = false".to_string()),
                _ => {}
            }
        }

        if !options.is_empty() {
            write!(self.writer, " [{}]", options.join(", "))?;
        }

        Ok(())
    }

    fn write_enum(&mut self, id: EnumId) -> std::fmt::Result {
        let pool = self.pool;
        let enum_type = pool.enum_type(id);
        self.write_comments(enum_type.comments())?;
        self.writeln(&format!("enum {} {{", enum_type.name()))?;
        self.indent();

        let values = enum_type.values();
        let aliased = values
            .iter()
            .enumerate()
            .any(|(i, v)| values[..i].iter().any(|earlier| earlier.number == v.number));
        if aliased {
            self.writeln("option allow_alias = true;")?;
        }

        for value in values {
            self.writeln(&format!("{} = {};", value.name, value.number))?;
        }

        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;

        Ok(())
    }

    fn write_extensions(&mut self, ids: &[ExtensionId]) -> std::fmt::Result {
        let pool = self.pool;
        let mut remaining: Vec<&FieldDescriptor> = ids.iter().map(|&id| pool.extension(id)).collect();

        // One extend block per extendee, in first-declaration order.
        while let Some(first) = remaining.first() {
            let extendee = first.containing_type().to_string();
            let (group, rest): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|ext| ext.containing_type() == extendee);
            remaining = rest;

            self.writeln(&format!("extend .{} {{", extendee))?;
            self.indent();
            for extension in group {
                self.write_field(extension)?;
            }
            self.dedent();
            self.writeln("}")?;
            writeln!(self.writer)?;
        }

        Ok(())
    }
}

fn range_end(range: &Range<u32>) -> String {
    if range.end == MAX_FIELD_NUMBER + 1 {
        "max".to_string()
    } else {
        (range.end - 1).to_string()
    }
}

/// Escape a string for proto syntax
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                result.push_str(&format!("\\x{:02x}", c as u8));
            }
            _ => result.push(c),
        }
    }
    result
}

fn summarize_field(pool: &DescriptorPool, field: &FieldDescriptor) -> JsonValue {
    let mut summary = json!({
        "name": field.name(),
        "jsonName": field.json_name(),
        "number": field.number(),
        "label": field.label().as_str(),
        "type": field.field_type().name(),
    });
    if let Some(type_name) = field.type_name() {
        summary["typeName"] = json!(type_name);
    }
    if field.is_packed() {
        summary["packed"] = json!(true);
    }
    if let Some(default) = field.declared_default() {
        summary["default"] = json!(default);
    }
    if field.is_extension() {
        summary["extendee"] = json!(field.containing_type());
        summary["fullName"] = json!(field.full_name());
    }
    if let FieldType::Enum(id) = field.field_type() {
        summary["enum"] = json!(pool.enum_type(*id).full_name());
    }
    if let Some(index) = field.real_oneof_index() {
        let message = pool.message(field.containing_message());
        if let Some(name) = message.oneofs().get(index) {
            summary["oneof"] = json!(name);
        }
    }
    if field.is_proto3_optional() {
        summary["proto3Optional"] = json!(true);
    }
    summary
}

fn summarize_message(pool: &DescriptorPool, id: MessageId, out: &mut Vec<JsonValue>) {
    let message = pool.message(id);
    let fields: Vec<_> = message
        .fields()
        .iter()
        .map(|f| summarize_field(pool, f))
        .collect();
    let ranges: Vec<_> = message
        .extension_ranges()
        .iter()
        .map(|r| json!([r.start, r.end - 1]))
        .collect();
    out.push(json!({
        "name": message.full_name(),
        "fields": fields,
        "extensionRanges": ranges,
    }));
    for &nested in message.nested_messages() {
        summarize_message(pool, nested, out);
    }
}

fn collect_enums(pool: &DescriptorPool, id: MessageId, out: &mut Vec<EnumId>) {
    let message = pool.message(id);
    out.extend_from_slice(message.nested_enums());
    for &nested in message.nested_messages() {
        collect_enums(pool, nested, out);
    }
}

fn collect_extensions(pool: &DescriptorPool, id: MessageId, out: &mut Vec<ExtensionId>) {
    let message = pool.message(id);
    out.extend_from_slice(message.scoped_extensions());
    for &nested in message.nested_messages() {
        collect_extensions(pool, nested, out);
    }
}

/// Machine-readable overview of one linked file
fn summarize_file(pool: &DescriptorPool, file: &FileDescriptor) -> JsonValue {
    let mut messages = Vec::new();
    let mut enum_ids = file.enums().to_vec();
    let mut extension_ids = file.extensions().to_vec();
    for &id in file.messages() {
        summarize_message(pool, id, &mut messages);
        collect_enums(pool, id, &mut enum_ids);
        collect_extensions(pool, id, &mut extension_ids);
    }

    let enums: Vec<_> = enum_ids
        .iter()
        .map(|&id| {
            let enum_type = pool.enum_type(id);
            let values: Vec<_> = enum_type
                .values()
                .iter()
                .map(|v| json!({ "name": v.name, "number": v.number }))
                .collect();
            json!({ "name": enum_type.full_name(), "values": values })
        })
        .collect();

    let extensions: Vec<_> = extension_ids
        .iter()
        .map(|&id| summarize_field(pool, pool.extension(id)))
        .collect();

    let services: Vec<_> = file
        .services()
        .iter()
        .map(|service| {
            let methods: Vec<_> = service
                .methods()
                .iter()
                .map(|m| {
                    json!({
                        "name": m.name(),
                        "input": pool.message(m.input()).full_name(),
                        "output": pool.message(m.output()).full_name(),
                        "clientStreaming": m.is_client_streaming(),
                        "serverStreaming": m.is_server_streaming(),
                    })
                })
                .collect();
            json!({ "name": service.full_name(), "methods": methods })
        })
        .collect();

    json!({
        "file": file.name(),
        "package": file.package(),
        "syntax": file.syntax().as_str(),
        "dependencies": file.dependencies(),
        "messages": messages,
        "enums": enums,
        "extensions": extensions,
        "services": services,
    })
}
