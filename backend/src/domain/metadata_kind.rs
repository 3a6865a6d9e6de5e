//! Metadata object kinds annotated by the dashboard.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kinds of metadata records that get quality scores and endpoint links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataKind {
    /// Raw data elements; the only kind with stored data values.
    DataElement,
    /// Indicators derived from data elements.
    Indicator,
    /// Indicators computed over program (event/tracker) data.
    ProgramIndicator,
}

impl MetadataKind {
    /// Plural API collection name, e.g. `dataElements`.
    pub fn collection(self) -> &'static str {
        match self {
            Self::DataElement => "dataElements",
            Self::Indicator => "indicators",
            Self::ProgramIndicator => "programIndicators",
        }
    }

    /// Whether raw data values exist for this kind.
    pub fn has_raw_values(self) -> bool {
        matches!(self, Self::DataElement)
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// The string named no known metadata kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metadata kind `{0}`")]
pub struct UnknownMetadataKind(String);

impl FromStr for MetadataKind {
    type Err = UnknownMetadataKind;

    /// Accepts the API collection names (`dataElements`, `indicators`,
    /// `programIndicators`) and their singular forms.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "dataElements" | "dataElement" => Ok(Self::DataElement),
            "indicators" | "indicator" => Ok(Self::Indicator),
            "programIndicators" | "programIndicator" => Ok(Self::ProgramIndicator),
            other => Err(UnknownMetadataKind(other.to_owned())),
        }
    }
}
