//! Entry point strings.

use std::fmt;
use std::str::FromStr;

use crate::error::{ToolError, ToolResult};

/// Parsed `<module-locator>:<function-name>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    locator: String,
    function: String,
}

impl Entry {
    /// Splits `raw` at its first colon.
    ///
    /// Everything after the first colon is the function name, so locators may
    /// not contain colons but function names may.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidEntry`] when there is no colon or either
    /// half is blank.
    pub fn parse(raw: &str) -> ToolResult<Self> {
        let invalid = || ToolError::InvalidEntry {
            entry: raw.to_owned(),
        };
        let (locator, function) = raw.split_once(':').ok_or_else(invalid)?;
        let (locator, function) = (locator.trim(), function.trim());
        if locator.is_empty() || function.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            locator: locator.to_owned(),
            function: function.to_owned(),
        })
    }

    /// Module locator half.
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Function name half.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }
}

impl FromStr for Entry {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.locator, self.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_first_colon() {
        let entry = Entry::parse("tools.weather.forecast:fetch:v2").unwrap();
        assert_eq!(entry.locator(), "tools.weather.forecast");
        assert_eq!(entry.function(), "fetch:v2");
        assert_eq!(entry.to_string(), "tools.weather.forecast:fetch:v2");
    }

    #[test]
    fn rejects_missing_halves() {
        for raw in ["no-colon", ":run", "tools/echo:", " : ", ""] {
            let err = Entry::parse(raw).unwrap_err();
            assert!(matches!(err, ToolError::InvalidEntry { .. }), "{raw}");
            assert_eq!(err.to_string(), "Invalid entry");
        }
    }
}
