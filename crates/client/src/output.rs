// Output formatting for the CLI

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Labelled fields where a command has them, pretty JSON otherwise
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn is_text(self) -> bool {
        self == OutputFormat::Text
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        Ok(match self {
            OutputFormat::Text | OutputFormat::Json => serde_json::to_string_pretty(value)?,
            OutputFormat::Yaml => serde_yaml::to_string(value)?.trim_end().to_string(),
        })
    }

    pub fn print<T: Serialize>(self, value: &T) -> Result<()> {
        println!("{}", self.render(value)?);
        Ok(())
    }
}

/// `Label:` padded to a fixed column, then the value
pub fn field_line(label: &str, value: &str) -> String {
    format!("{:<14} {}", format!("{label}:"), value)
}
