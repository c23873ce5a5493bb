#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_WIDTH: usize = 4;
pub const DEFAULT_SEPARATOR: char = '.';
pub const MAX_WIDTH: usize = 9;

/// Encoding and placement parameters for one tree.
///
/// Passed explicitly into the codec and every store; nothing about the encoding is global.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PathConfig {
    /// Number of decimal digits per octant.
    pub width: usize,
    pub separator: char,
    /// Schema holding the table (Postgres only).
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            separator: DEFAULT_SEPARATOR,
            schema: "public".to_string(),
            table: "ltree_nodes".to_string(),
            column: "path".to_string(),
        }
    }
}

impl PathConfig {
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Largest octant encodable at this width, `10^width - 1`.
    pub fn max_octant(&self) -> u32 {
        10u32.pow(self.width as u32) - 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.width > MAX_WIDTH {
            return Err(Error::InvalidConfig(format!(
                "width must be within 1..={MAX_WIDTH}, got {}",
                self.width
            )));
        }
        if self.separator.is_ascii_digit() || self.separator == '*' || self.separator.is_whitespace()
        {
            return Err(Error::InvalidConfig(format!(
                "separator {:?} collides with octant or pattern syntax",
                self.separator
            )));
        }
        for (what, ident) in [
            ("schema", &self.schema),
            ("table", &self.table),
            ("column", &self.column),
        ] {
            if !is_identifier(ident) {
                return Err(Error::InvalidConfig(format!(
                    "{what} {ident:?} is not a plain SQL identifier"
                )));
            }
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
