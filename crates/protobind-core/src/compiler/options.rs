//! Generator configuration carried in the protoc plugin parameter.
//!
//! protoc hands plugins a single opaque parameter string. The front end
//! encodes [`GeneratorOptions`] into it as a percent-encoded query string
//! (`comments=1&options%5Bsuffix%5D=.txt`) and the plugin parses it back,
//! rejecting anything it does not understand.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Output extension used when no `suffix` option is given
pub const DEFAULT_SUFFIX: &str = ".proto.txt";

/// Options accepted by the generator stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Emit leading source comments
    pub comments: bool,
    /// Also emit a JSON summary per generated file
    pub json: bool,
    /// Generate only the requested files, not their imports
    pub skip_imported: bool,
    /// Log generator progress
    pub verbose: bool,
    /// Source paths given to the front end, in command-line order
    pub protos: Vec<String>,
    /// One output file per top-level message
    pub multifile: bool,
    /// Emit insertion-point marker comments
    pub insertions: bool,
    /// Leave out the generation timestamp header
    pub no_timestamp: bool,
    /// Output file extension, [`DEFAULT_SUFFIX`] when unset
    pub suffix: Option<String>,
    /// Generator options without a dedicated field
    pub extra: BTreeMap<String, String>,
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "" | "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::invalid_option(
            key,
            format!("expected 1, 0, true or false, got '{}'", value),
        )),
    }
}

fn bracketed<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?.strip_prefix('[')?.strip_suffix(']')
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Decodes `%XX` escapes and `+` (space) as produced by form encoding.
fn percent_decode(input: &str) -> Result<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let decoded = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| Some(hex_value(hex[0])? << 4 | hex_value(hex[1])?))
                    .ok_or_else(|| Error::invalid_option(input, "malformed percent escape"))?;
                out.push(decoded);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| Error::invalid_option(input, "not valid UTF-8"))
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

impl GeneratorOptions {
    /// Creates options with every flag off
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the plugin parameter string
    pub fn parse(query: &str) -> Result<Self> {
        let mut options = Self::default();
        let mut protos = BTreeMap::new();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = percent_decode(raw_key)?;
            let value = percent_decode(raw_value)?;

            match key.as_str() {
                "comments" => options.comments = parse_flag(&key, &value)?,
                "json" => options.json = parse_flag(&key, &value)?,
                "skip-imported" => options.skip_imported = parse_flag(&key, &value)?,
                "verbose" => options.verbose = parse_flag(&key, &value)?,
                _ => {
                    if let Some(index) = bracketed(&key, "protos") {
                        let index: usize = index
                            .parse()
                            .map_err(|_| Error::invalid_option(&key, "index is not a number"))?;
                        protos.insert(index, value);
                    } else if let Some(name) = bracketed(&key, "options") {
                        options.set_option(name, &value)?;
                    } else {
                        return Err(Error::invalid_option(&key, "unknown generator option"));
                    }
                }
            }
        }

        options.protos = protos.into_values().collect();
        Ok(options)
    }

    /// Encodes the options as a parameter string that [`Self::parse`] accepts
    pub fn to_query(&self) -> String {
        let mut pairs = Vec::new();
        let flags = [
            ("comments", self.comments),
            ("json", self.json),
            ("skip-imported", self.skip_imported),
            ("verbose", self.verbose),
        ];
        for (key, set) in flags {
            if set {
                pairs.push(format!("{}=1", key));
            }
        }
        for (index, path) in self.protos.iter().enumerate() {
            pairs.push(format!(
                "{}={}",
                percent_encode(&format!("protos[{}]", index)),
                percent_encode(path)
            ));
        }

        let mut options: Vec<(String, String)> = Vec::new();
        let hoisted = [
            ("multifile", self.multifile),
            ("insertions", self.insertions),
            ("no-timestamp", self.no_timestamp),
        ];
        for (key, set) in hoisted {
            if set {
                options.push((key.to_string(), "1".to_string()));
            }
        }
        if let Some(suffix) = &self.suffix {
            options.push(("suffix".to_string(), suffix.clone()));
        }
        options.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (key, value) in options {
            pairs.push(format!(
                "{}={}",
                percent_encode(&format!("options[{}]", key)),
                percent_encode(&value)
            ));
        }

        pairs.join("&")
    }

    /// Applies a `key=value` definition; a bare `key` means `key=1`.
    pub fn define(&mut self, definition: &str) -> Result<()> {
        let (key, value) = definition.split_once('=').unwrap_or((definition, "1"));
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::invalid_option(definition, "definition has no key"));
        }
        self.set_option(key, value)
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "multifile" => self.multifile = parse_flag(key, value)?,
            "insertions" => self.insertions = parse_flag(key, value)?,
            "no-timestamp" => self.no_timestamp = parse_flag(key, value)?,
            "suffix" => {
                if value.is_empty() {
                    return Err(Error::invalid_option(key, "suffix cannot be empty"));
                }
                self.suffix = Some(value.to_string());
            }
            _ => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Output file extension
    pub fn output_suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or(DEFAULT_SUFFIX)
    }

    /// Looks up a generator option without a dedicated field
    pub fn option(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Sets whether to emit comments
    pub fn comments(mut self, enabled: bool) -> Self {
        self.comments = enabled;
        self
    }

    /// Sets whether to emit JSON summaries
    pub fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    /// Sets whether to skip imported files
    pub fn skip_imported(mut self, enabled: bool) -> Self {
        self.skip_imported = enabled;
        self
    }

    /// Sets whether to log progress
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    /// Sets whether to split output per message
    pub fn multifile(mut self, enabled: bool) -> Self {
        self.multifile = enabled;
        self
    }

    /// Sets whether to emit insertion points
    pub fn insertions(mut self, enabled: bool) -> Self {
        self.insertions = enabled;
        self
    }

    /// Sets whether to drop the timestamp header
    pub fn no_timestamp(mut self, enabled: bool) -> Self {
        self.no_timestamp = enabled;
        self
    }

    /// Sets the output extension
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Records the source paths handed to protoc
    pub fn protos(mut self, protos: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.protos = protos.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_flags() {
        let options = GeneratorOptions::parse("comments=1&json&skip-imported=false").unwrap();
        assert!(options.comments);
        assert!(options.json);
        assert!(!options.skip_imported);
        assert!(!options.verbose);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(GeneratorOptions::parse("").unwrap(), GeneratorOptions::default());
    }

    #[test]
    fn test_parse_options_and_protos() {
        let options = GeneratorOptions::parse(
            "protos%5B1%5D=b.proto&protos%5B0%5D=dir%2Fa.proto\
             &options%5Bmultifile%5D=1&options%5Bsuffix%5D=.txt&options%5Bpkg%5D=my+app",
        )
        .unwrap();
        assert_eq!(options.protos, vec!["dir/a.proto", "b.proto"]);
        assert!(options.multifile);
        assert_eq!(options.output_suffix(), ".txt");
        assert_eq!(options.option("pkg"), Some("my app"));
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let err = GeneratorOptions::parse("color=blue").unwrap_err();
        assert!(matches!(err, Error::InvalidOption { ref key, .. } if key == "color"));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(GeneratorOptions::parse("comments=maybe").is_err());
        assert!(GeneratorOptions::parse("protos%5Bx%5D=a.proto").is_err());
        assert!(GeneratorOptions::parse("json=%ZZ").is_err());
        assert!(GeneratorOptions::parse("options%5Bsuffix%5D=").is_err());
    }

    #[test]
    fn test_query_round_trip() {
        let mut options = GeneratorOptions::new()
            .comments(true)
            .skip_imported(true)
            .insertions(true)
            .no_timestamp(true)
            .suffix(".schema")
            .protos(["a b.proto", "c:d.proto"]);
        options.define("author=Jane Doe & co").unwrap();

        let query = options.to_query();
        assert!(!query.contains(':'));
        assert!(!query.contains(','));
        assert_eq!(GeneratorOptions::parse(&query).unwrap(), options);
    }

    #[test]
    fn test_define() {
        let mut options = GeneratorOptions::new();
        options.define("multifile").unwrap();
        options.define("suffix=.out").unwrap();
        options.define("x=1=2").unwrap();
        assert!(options.multifile);
        assert_eq!(options.output_suffix(), ".out");
        assert_eq!(options.option("x"), Some("1=2"));
        assert!(options.define("=value").is_err());
        assert_eq!(GeneratorOptions::new().output_suffix(), DEFAULT_SUFFIX);
    }
}
