//! Compiles `config/threshold_layer.toml` into the Rust source the firmware
//! crate `include!`s at build time.
//!
//! The generated file only names `ProcessorConfigSource`, `AxisPairing` and
//! `BindingParams`, which must be in scope at the include site.

use std::{collections::BTreeSet, fmt, fmt::Write as _, fs, path::Path};

use serde::Deserialize;

/// Slot capacity of the processor; binding layers index into it.
pub const MAX_LAYER_SLOTS: u32 = 16;
/// The excluded-position count is carried in a `u8` on the device.
pub const MAX_EXCLUDED_POSITIONS: usize = u8::MAX as usize;

#[derive(Debug)]
pub enum ConfigCompilerError {
    Io(String),
    Parse(String),
    Validation(String),
}

impl fmt::Display for ConfigCompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "io error: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigCompilerError {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AxisPairingSetting {
    #[default]
    PerSample,
    SyncReport,
}

impl AxisPairingSetting {
    fn variant_name(self) -> &'static str {
        match self {
            Self::PerSample => "PerSample",
            Self::SyncReport => "SyncReport",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessorSection {
    #[serde(default)]
    pub require_prior_idle_ms: u32,
    #[serde(default)]
    pub excluded_positions: Vec<u32>,
    #[serde(default)]
    pub axis_pairing: AxisPairingSetting,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingSection {
    pub layer: u32,
    pub timeout_ms: i32,
    pub activation_threshold: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfigFile {
    pub processor: ProcessorSection,
    #[serde(rename = "binding")]
    pub bindings: Vec<BindingSection>,
}

pub fn parse_config_str(source: &str) -> Result<LayerConfigFile, ConfigCompilerError> {
    toml::from_str(source).map_err(|e| ConfigCompilerError::Parse(e.to_string()))
}

pub fn parse_config_file(path: &Path) -> Result<LayerConfigFile, ConfigCompilerError> {
    let source = fs::read_to_string(path)
        .map_err(|e| ConfigCompilerError::Io(format!("{}: {e}", path.display())))?;
    parse_config_str(&source)
}

pub fn validate_config(config: &LayerConfigFile) -> Result<(), ConfigCompilerError> {
    let processor = &config.processor;
    if processor.excluded_positions.len() > MAX_EXCLUDED_POSITIONS {
        return Err(validation(format!(
            "processor.excluded_positions holds {} entries; at most {MAX_EXCLUDED_POSITIONS} are supported",
            processor.excluded_positions.len()
        )));
    }

    let mut seen_positions = BTreeSet::new();
    for position in &processor.excluded_positions {
        if !seen_positions.insert(*position) {
            return Err(validation(format!(
                "processor.excluded_positions contains duplicate position {position}"
            )));
        }
    }

    if config.bindings.is_empty() {
        return Err(validation("at least one [[binding]] is required".into()));
    }

    let mut seen_layers = BTreeSet::new();
    for binding in &config.bindings {
        if binding.layer >= MAX_LAYER_SLOTS {
            return Err(validation(format!(
                "binding.layer {} is out of range; layers must be < {MAX_LAYER_SLOTS}",
                binding.layer
            )));
        }
        if !seen_layers.insert(binding.layer) {
            return Err(validation(format!(
                "binding.layer {} is bound more than once",
                binding.layer
            )));
        }
        if !(0..=i32::from(i16::MAX)).contains(&binding.timeout_ms) {
            return Err(validation(format!(
                "binding.timeout_ms {} must be within 0..={}",
                binding.timeout_ms,
                i16::MAX
            )));
        }
    }

    Ok(())
}

pub fn render_generated_config(config: &LayerConfigFile) -> String {
    let processor = &config.processor;
    let excluded = processor
        .excluded_positions
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::new();
    out.push_str("// @generated by layer_config_compiler. Do not edit.\n\n");
    out.push_str(
        "pub const PROCESSOR_CONFIG_SOURCE: ProcessorConfigSource = ProcessorConfigSource {\n",
    );
    let _ = writeln!(
        out,
        "    require_prior_idle_ms: {},",
        processor.require_prior_idle_ms
    );
    let _ = writeln!(out, "    excluded_positions: &[{excluded}],");
    let _ = writeln!(
        out,
        "    axis_pairing: AxisPairing::{},",
        processor.axis_pairing.variant_name()
    );
    out.push_str("    bindings: &[\n");
    for binding in &config.bindings {
        out.push_str("        BindingParams {\n");
        let _ = writeln!(out, "            layer: {},", binding.layer);
        let _ = writeln!(out, "            timeout_ms: {},", binding.timeout_ms);
        let _ = writeln!(
            out,
            "            activation_threshold: {},",
            binding.activation_threshold
        );
        out.push_str("        },\n");
    }
    out.push_str("    ],\n};\n");
    out
}

pub fn generate_from_path(path: &Path) -> Result<String, ConfigCompilerError> {
    let config = parse_config_file(path)?;
    validate_config(&config)?;
    Ok(render_generated_config(&config))
}

fn validation(msg: String) -> ConfigCompilerError {
    ConfigCompilerError::Validation(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[processor]

[[binding]]
layer = 1
timeout_ms = 0
activation_threshold = 0
"#;

    #[test]
    fn processor_fields_default_when_omitted() {
        let config = parse_config_str(MINIMAL).expect("minimal config should parse");
        assert_eq!(config.processor, ProcessorSection::default());
        assert_eq!(config.processor.axis_pairing, AxisPairingSetting::PerSample);
        validate_config(&config).expect("minimal config should validate");
    }

    #[test]
    fn empty_excluded_list_renders_empty_slice() {
        let config = parse_config_str(MINIMAL).expect("minimal config should parse");
        let rendered = render_generated_config(&config);
        assert!(rendered.contains("excluded_positions: &[],"));
        assert!(rendered.contains("require_prior_idle_ms: 0,"));
    }

    #[test]
    fn excluded_list_at_capacity_is_accepted() {
        let mut config = parse_config_str(MINIMAL).expect("minimal config should parse");
        config.processor.excluded_positions = (0..MAX_EXCLUDED_POSITIONS as u32).collect();
        validate_config(&config).expect("255 excluded positions fit the u8 count");

        config.processor.excluded_positions.push(1_000);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigCompilerError::Validation(_))
        ));
    }
}
