use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::error::ConfigurationError;
use crate::job::JobConfiguration;

/// A job script with `{{ name }}` placeholders
///
/// Text outside placeholders is kept byte for byte. Rendering fails unless every placeholder
/// resolves to a non-empty value.
#[derive(Clone, Debug)]
pub struct ScriptTemplate {
    source: String,
}

#[derive(Debug, PartialEq)]
enum Segment<'t> {
    Literal(&'t str),
    Placeholder { name: &'t str, offset: usize },
}

impl ScriptTemplate {
    /// The ParaView server script shipped with the launcher
    pub fn embedded() -> ScriptTemplate {
        /// included job script template
        static PARAVIEW: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/paraview.sh"));
        ScriptTemplate { source: PARAVIEW.to_string() }
    }

    pub fn new(source: &str) -> Result<ScriptTemplate, ConfigurationError> {
        parse(source)?;
        Ok(ScriptTemplate { source: source.to_string() })
    }

    pub fn from_path(path: &Path) -> Result<ScriptTemplate, ConfigurationError> {
        info!("Reading job script template {}", path.display());
        let source = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.display().to_string(),
            source,
        })?;
        ScriptTemplate::new(&source)
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Result<Vec<&str>, ConfigurationError> {
        let mut names: Vec<&str> = Vec::new();
        for segment in parse(&self.source)? {
            if let Segment::Placeholder { name, .. } = segment {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Render the job script using TinyTemplate
    pub fn render(&self, config: &JobConfiguration) -> Result<String, ConfigurationError> {
        let segments = parse(&self.source)?;
        let values = placeholder_values(config);

        let unresolved: Vec<String> = self
            .placeholders()?
            .into_iter()
            .filter(|name| values.get(*name).map_or(true, |value| value.trim().is_empty()))
            .map(str::to_string)
            .collect();
        if !unresolved.is_empty() {
            return Err(ConfigurationError::Unresolved(unresolved));
        }
        for (key, value) in &values {
            if value.contains(['\n', '\r']) {
                return Err(ConfigurationError::InvalidValue {
                    key: key.to_string(),
                    reason: "line breaks aren't allowed in job script values".to_string(),
                });
            }
        }

        let source = tinytemplate_source(&segments)?;
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&format_unescaped);
        tt.add_template("script", &source)?;
        let script = tt.render("script", &values)?;
        debug!("Rendered job script:\n{script}");
        Ok(script)
    }
}

/// Values available to the template, keyed by placeholder name
fn placeholder_values(config: &JobConfiguration) -> BTreeMap<&'static str, String> {
    let mut values = BTreeMap::from([
        ("account", config.account.clone()),
        ("name", config.job_name.clone()),
        ("stdout", config.stdout_path().display().to_string()),
        ("stderr", config.stderr_path().display().to_string()),
        ("nodes", config.nodes.to_string()),
        ("timeLimit", config.time_limit.to_string()),
        ("partition", config.partition.clone()),
        ("displays", config.displays.to_string()),
    ]);
    if let Some(path) = &config.auth_key_file {
        values.insert("authKeyFile", path.display().to_string());
    }
    values
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn parse(source: &str) -> Result<Vec<Segment>, ConfigurationError> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let inner = &rest[start + 2..];
        let end = inner.find("}}").ok_or_else(|| ConfigurationError::MalformedTemplate {
            offset: offset + start,
            reason: "placeholder is never closed".to_string(),
        })?;
        let name = inner[..end].trim();
        if !is_identifier(name) {
            return Err(ConfigurationError::MalformedTemplate {
                offset: offset + start,
                reason: format!("{name:?} is not a placeholder name"),
            });
        }
        segments.push(Segment::Placeholder { name, offset: offset + start });

        let consumed = start + 2 + end + 2;
        rest = &rest[consumed..];
        offset += consumed;
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

/// Rewrite placeholders as TinyTemplate values, escaping literal braces
///
/// TinyTemplate reads a backslash right before `{` (or at the very end) as an escape, so a
/// template can't put one there.
fn tinytemplate_source(segments: &[Segment]) -> Result<String, ConfigurationError> {
    let mut source = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                for c in text.chars() {
                    if c == '{' {
                        source.push('\\');
                    }
                    source.push(c);
                }
            }
            Segment::Placeholder { name, offset } => {
                if source.ends_with('\\') {
                    return Err(ConfigurationError::MalformedTemplate {
                        offset: *offset,
                        reason: "a backslash can't precede a placeholder".to_string(),
                    });
                }
                source.push('{');
                source.push_str(name);
                source.push('}');
            }
        }
    }
    if source.ends_with('\\') {
        return Err(ConfigurationError::MalformedTemplate {
            offset: source.len(),
            reason: "template can't end with a backslash".to_string(),
        });
    }
    Ok(source)
}
