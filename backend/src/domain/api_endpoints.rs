//! Canonical API endpoint links for one metadata record.
//!
//! Links are only ever built from a validated [`Uid`]; anything else is
//! rejected with [`InvalidUid`] before a URL is formatted.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::metadata_kind::MetadataKind;
use super::uid::{InvalidUid, Uid};

/// Default analytics period dimension.
pub const DEFAULT_PERIOD: &str = "LAST_12_MONTHS";
/// Default analytics organisation unit dimension.
pub const DEFAULT_ORG_UNIT: &str = "USER_ORGUNIT";

/// Optional dimensions and extras for [`build_endpoints`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOptions {
    /// Period dimension; [`DEFAULT_PERIOD`] when unset or blank.
    pub period: Option<String>,
    /// Organisation unit dimension; [`DEFAULT_ORG_UNIT`] when unset or blank.
    pub org_unit: Option<String>,
    /// Also build the maintenance web UI link.
    pub include_web_ui: bool,
}

impl EndpointOptions {
    fn period(&self) -> &str {
        non_blank(self.period.as_deref()).unwrap_or(DEFAULT_PERIOD)
    }

    fn org_unit(&self) -> &str {
        non_blank(self.org_unit.as_deref()).unwrap_or(DEFAULT_ORG_UNIT)
    }
}

/// Endpoint links for one metadata record.
///
/// ## Invariants
/// - Only constructed from a [`Uid`] that passed validation.
/// - `data_values` is present for data elements only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpointSet {
    /// Aggregated analytics query for the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<String>,
    /// Metadata document for the record.
    pub metadata: String,
    /// Raw data value retrieval, data elements only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_values: Option<String>,
    /// Maintenance app page, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_ui: Option<String>,
}

/// Build the endpoint set for `uid` of the given `kind` under `base_url`.
///
/// `base_url` is the server's API root (for example `https://x/api`);
/// trailing slashes are ignored. The analytics dimension is a single
/// `dimension` parameter joining `dx`, `pe` and `ou` with `;`. Period and
/// organisation unit values are percent-encoded.
///
/// # Errors
///
/// Returns [`InvalidUid`] when `uid` is not an 11-character alphanumeric
/// identifier.
///
/// # Examples
/// ```
/// use sqlview_backend::domain::{EndpointOptions, MetadataKind, build_endpoints};
///
/// let set = build_endpoints(
///     MetadataKind::DataElement,
///     "OwvmJaiVIBU",
///     "https://x/api",
///     &EndpointOptions::default(),
/// )
/// .expect("valid uid");
/// assert!(set.data_values.is_some());
/// assert!(set.analytics.as_deref().is_some_and(|url| url.contains("dimension=dx:OwvmJaiVIBU")));
/// assert!(build_endpoints(MetadataKind::DataElement, "abc-123-def", "https://x/api", &EndpointOptions::default()).is_err());
/// ```
pub fn build_endpoints(
    kind: MetadataKind,
    uid: &str,
    base_url: &str,
    options: &EndpointOptions,
) -> Result<ApiEndpointSet, InvalidUid> {
    let uid = Uid::parse(uid)?;
    let base = base_url.trim().trim_end_matches('/');
    let period = query_value(options.period());
    let org_unit = query_value(options.org_unit());

    let analytics = format!("{base}/analytics.json?dimension=dx:{uid};pe:{period};ou:{org_unit}");
    let metadata = format!("{base}/{collection}/{uid}.json", collection = kind.collection());
    let data_values = kind.has_raw_values().then(|| {
        format!("{base}/dataValueSets.json?dataElement={uid}&period={period}&orgUnit={org_unit}")
    });
    let web_ui = options
        .include_web_ui
        .then(|| maintenance_url(kind, &uid, base));

    Ok(ApiEndpointSet {
        analytics: Some(analytics),
        metadata,
        data_values,
        web_ui,
    })
}

fn maintenance_url(kind: MetadataKind, uid: &Uid, api_base: &str) -> String {
    let root = api_base.strip_suffix("/api").unwrap_or(api_base);
    let section = match kind {
        MetadataKind::DataElement => "dataElementSection/dataElement",
        MetadataKind::Indicator => "indicatorSection/indicator",
        MetadataKind::ProgramIndicator => "programSection/programIndicator",
    };
    format!("{root}/dhis-web-maintenance/index.html#/edit/{section}/{uid}")
}

fn query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
