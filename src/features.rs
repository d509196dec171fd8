//! Feature Layout & Validation
//!
//! The model was trained on 30 URL features in a fixed order. Uploaded CSVs
//! must carry every one of them; column order and extra columns don't matter,
//! the validator selects and reorders them into the canonical layout.

use serde::Serialize;

/// Total number of features
pub const FEATURE_COUNT: usize = 30;

macro_rules! feature_layout {
    ($($field:ident => $name:literal),+ $(,)?) => {
        /// One validated input row, fields in canonical order
        #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
        pub struct FeatureRow {
            $(
                #[serde(rename = $name)]
                pub $field: f64,
            )+
        }

        /// Feature names in exact order the model expects them
        pub const FEATURE_LAYOUT: [&str; FEATURE_COUNT] = [$($name),+];

        impl FeatureRow {
            pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
                let [$($field),+] = values;
                Self { $($field),+ }
            }

            pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
                [$(self.$field),+]
            }
        }
    };
}

feature_layout! {
    having_ip_address => "having_IP_Address",
    url_length => "URL_Length",
    shortining_service => "Shortining_Service",
    having_at_symbol => "having_At_Symbol",
    double_slash_redirecting => "double_slash_redirecting",
    prefix_suffix => "Prefix_Suffix",
    having_sub_domain => "having_Sub_Domain",
    ssl_final_state => "SSLfinal_State",
    domain_registeration_length => "Domain_registeration_length",
    favicon => "Favicon",
    port => "port",
    https_token => "HTTPS_token",
    request_url => "Request_URL",
    url_of_anchor => "URL_of_Anchor",
    links_in_tags => "Links_in_tags",
    sfh => "SFH",
    submitting_to_email => "Submitting_to_email",
    abnormal_url => "Abnormal_URL",
    redirect => "Redirect",
    on_mouseover => "on_mouseover",
    right_click => "RightClick",
    pop_up_widnow => "popUpWidnow",
    iframe => "Iframe",
    age_of_domain => "age_of_domain",
    dns_record => "DNSRecord",
    web_traffic => "web_traffic",
    page_rank => "Page_Rank",
    google_index => "Google_Index",
    links_pointing_to_page => "Links_pointing_to_page",
    statistical_report => "Statistical_report",
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Input CSV is missing required features. Missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Feature data must be numeric (-1, 0, 1). Error during conversion: Unable to parse string \"{value}\" at row {row}, column {column}")]
    NonNumeric {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Input CSV contains no data rows")]
    Empty,

    #[error("Unexpected preprocessing error: {0}")]
    Preprocessing(String),
}

/// Uploaded table before validation: header names plus raw string cells
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Decode a CSV document with a header row
    pub fn from_csv(data: &[u8]) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data);

        // Header names are matched verbatim, surrounding spaces included
        let headers = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Remove a column by name, returning its cells
    pub fn take_column(&mut self, name: &str) -> Option<Vec<String>> {
        let idx = self.column_index(name)?;
        self.headers.remove(idx);

        let cells = self
            .rows
            .iter_mut()
            .map(|row| {
                if idx < row.len() {
                    row.remove(idx)
                } else {
                    String::new()
                }
            })
            .collect();
        Some(cells)
    }
}

/// Check, reorder and numerically coerce an uploaded table
pub fn validate(table: &RawTable) -> Result<Vec<FeatureRow>, ValidationError> {
    let missing: Vec<String> = FEATURE_LAYOUT
        .iter()
        .filter(|name| table.column_index(name).is_none())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing));
    }

    let mut positions = [0usize; FEATURE_COUNT];
    for (slot, name) in positions.iter_mut().zip(FEATURE_LAYOUT) {
        // presence checked above
        *slot = table.column_index(name).unwrap_or_default();
    }

    if table.rows.is_empty() {
        return Err(ValidationError::Empty);
    }

    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| -> Result<FeatureRow, ValidationError> {
            let mut values = [0f64; FEATURE_COUNT];
            for (feature, &col) in positions.iter().enumerate() {
                let raw = row.get(col).map(String::as_str).unwrap_or("");
                values[feature] = parse_numeric(raw).ok_or_else(|| ValidationError::NonNumeric {
                    row: row_idx,
                    column: FEATURE_LAYOUT[feature],
                    value: raw.to_string(),
                })?;
            }
            Ok(FeatureRow::from_array(values))
        })
        .collect()
}

/// Parse a cell as a finite number
pub fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Render a CSV document with the canonical header and the given rows
#[cfg(test)]
pub(crate) fn csv_with(rows: &[[i8; FEATURE_COUNT]]) -> String {
    let mut out = FEATURE_LAYOUT.join(",");
    out.push('\n');
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
