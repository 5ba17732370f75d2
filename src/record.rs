//! Term store record types.
//!
//! One `TermRecord` per distinct extracted term, each carrying a category
//! label and the publications that mention it. Deserialization is lenient
//! at the reference level (a bad `Year` only drops that reference from
//! year-keyed aggregates) and strict at the record level (a bad `count`
//! makes the whole entry malformed).

use serde::{Deserialize, Deserializer, Serialize};

/// Category assigned when the extraction step left none
pub const DEFAULT_CATEGORY: &str = "General/Other";

/// PubMed landing page prefix used for reference links
pub const PUBMED_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// One entry of the term store
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TermRecord {
    #[serde(default = "default_category", deserialize_with = "de_category")]
    pub category: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub co_occurrence: Vec<String>,
}

impl Default for TermRecord {
    fn default() -> Self {
        Self {
            category: default_category(),
            count: 0,
            references: Vec::new(),
            co_occurrence: Vec::new(),
        }
    }
}

/// One publication mentioning a term
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reference {
    #[serde(rename = "PMID")]
    pub pmid: Option<String>,
    /// Publication year, `None` when absent or not a positive integer
    #[serde(rename = "Year")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "Abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
}

impl Reference {
    /// Year if it passes the configured lower bound.
    pub fn valid_year(&self, min_year: Option<i32>) -> Option<i32> {
        self.year.filter(|y| min_year.map_or(true, |min| *y >= min))
    }

    /// PubMed link for this reference, if it has a PMID
    pub fn link(&self) -> Option<String> {
        self.pmid.as_ref().map(|p| format!("{}/{}/", PUBMED_URL, p))
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn de_category<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(default_category))
}

/// Wire shape of a reference: either a full object or a bare PMID string
#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Full {
        #[serde(rename = "PMID", default)]
        pmid: serde_json::Value,
        #[serde(rename = "Year", default)]
        year: serde_json::Value,
        #[serde(default)]
        title: Option<String>,
        #[serde(rename = "Abstract", default)]
        abstract_text: Option<String>,
    },
    Bare(String),
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawReference::deserialize(deserializer)? {
            RawReference::Full {
                pmid,
                year,
                title,
                abstract_text,
            } => Reference {
                pmid: pmid_from_value(&pmid),
                year: year_from_value(&year),
                title,
                abstract_text,
            },
            RawReference::Bare(pmid) => Reference {
                pmid: Some(pmid.trim().to_string()).filter(|p| !p.is_empty()),
                ..Default::default()
            },
        })
    }
}

/// Normalize a PMID that may arrive as a string or a number
fn pmid_from_value(val: &serde_json::Value) -> Option<String> {
    match val {
        serde_json::Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accept positive integers and integer strings; everything else is no year.
pub fn year_from_value(val: &serde_json::Value) -> Option<i32> {
    let year = match val {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    i32::try_from(year).ok().filter(|y| *y > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_sparse_record() -> serde_json::Result<()> {
        let record: TermRecord = serde_json::from_str(r#"{"references": []}"#)?;
        assert_eq!(record.category, DEFAULT_CATEGORY);
        assert_eq!(record.count, 0);
        assert!(record.co_occurrence.is_empty());

        let record: TermRecord = serde_json::from_str(r#"{"category": null, "count": 2}"#)?;
        assert_eq!(record.category, DEFAULT_CATEGORY);
        Ok(())
    }

    #[test]
    fn test_year_variants() {
        use serde_json::json;
        assert_eq!(year_from_value(&json!(2020)), Some(2020));
        assert_eq!(year_from_value(&json!("2019")), Some(2019));
        assert_eq!(year_from_value(&json!("20x9")), None);
        assert_eq!(year_from_value(&json!(2020.5)), None);
        assert_eq!(year_from_value(&json!(-3)), None);
        assert_eq!(year_from_value(&json!(0)), None);
        assert_eq!(year_from_value(&json!(null)), None);
    }

    #[test]
    fn test_reference_leniency() -> serde_json::Result<()> {
        let record: TermRecord = serde_json::from_str(
            r#"{
                "category": "Oncology",
                "count": 3,
                "references": [
                    {"PMID": 123, "Year": "unknown"},
                    {"PMID": "", "Year": 2021, "title": "  "},
                    "456"
                ]
            }"#,
        )?;
        assert_eq!(record.references.len(), 3);
        assert_eq!(record.references[0].pmid.as_deref(), Some("123"));
        assert_eq!(record.references[0].year, None);
        assert_eq!(record.references[1].pmid, None);
        assert_eq!(record.references[1].year, Some(2021));
        assert_eq!(record.references[1].title.as_deref(), Some("  "));
        assert_eq!(record.references[2].pmid.as_deref(), Some("456"));
        Ok(())
    }

    #[test]
    fn test_negative_count_is_malformed() {
        let parsed = serde_json::from_str::<TermRecord>(r#"{"count": -1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_valid_year_lower_bound() {
        let reference = Reference {
            year: Some(2014),
            ..Default::default()
        };
        assert_eq!(reference.valid_year(None), Some(2014));
        assert_eq!(reference.valid_year(Some(2015)), None);
    }

    #[test]
    fn test_link() {
        let reference = Reference {
            pmid: Some("42".to_string()),
            ..Default::default()
        };
        assert_eq!(
            reference.link().as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/42/")
        );
    }
}
