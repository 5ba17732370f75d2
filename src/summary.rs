//! Summary & Forecast Builder.
//!
//! Derives dashboard statistics from the trend matrix alone (no store
//! re-read). Callers pass the matrix already restricted to the cutoff year.

use crate::error::{OptionExt, Result};
use crate::keywords::KeywordRanking;
use crate::trends::CategoryYearMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of most recent yearly totals the forecast averages over
pub const FORECAST_WINDOW: usize = 3;

/// Shown in place of a growth category when no category has a usable baseline
pub const NO_GROWTH_CATEGORY: &str = "N/A";

/// `dashboard_stats.json` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_publications: u64,
    pub top_category: String,
    /// Growth of `top_category`, formatted `X.XX%`
    pub growth_rate: String,
    pub growth_category: String,
    /// Growth of `growth_category`, formatted `X.XX%`
    pub category_growth: String,
    pub top_keywords: Vec<KeywordCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub term: String,
    pub count: u64,
}

/// `forecast_data.json` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// `[last_year, last_year + 1]`, as labels
    pub years: Vec<String>,
    /// `[last_year_total, projected_next]`
    pub counts: Vec<u64>,
}

/// Row of `category_distribution.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub count: u64,
}

/// Category with the largest total; ties go to the first name in sorted order.
pub fn top_category(matrix: &CategoryYearMatrix) -> Result<String> {
    let mut best: Option<(&str, u64)> = None;
    for category in matrix.categories() {
        let total = matrix.category_total(category);
        if best.map_or(true, |(_, b)| total > b) {
            best = Some((category, total));
        }
    }
    best.map(|(c, _)| c.to_string())
        .ok_or_empty("no categories in trend matrix")
}

/// Percent change between the two most recent years, rounded to 2 decimals.
///
/// Categories with a zero count in the earlier year have no defined growth
/// and are left out. Fewer than two years on the axis yields an empty map.
pub fn growth_rates(matrix: &CategoryYearMatrix) -> BTreeMap<String, f64> {
    let years = matrix.years();
    let [.., y1, y2] = years.as_slice() else {
        return BTreeMap::new();
    };
    matrix
        .categories()
        .filter_map(|category| {
            let before = matrix.get(category, *y1);
            let after = matrix.get(category, *y2);
            (before > 0).then(|| {
                let growth = (after as f64 - before as f64) / before as f64 * 100.0;
                (category.to_string(), round2(growth))
            })
        })
        .collect()
}

/// Category with the highest defined growth; ties go to the first sorted name.
pub fn growth_category(rates: &BTreeMap<String, f64>) -> Option<(&str, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for (category, rate) in rates {
        if best.map_or(true, |(_, b)| *rate > b) {
            best = Some((category.as_str(), *rate));
        }
    }
    best
}

/// Build the dashboard summary.
///
/// `top_keywords` lists the leading category's first `top_keywords` ranked terms.
pub fn build_summary(
    matrix: &CategoryYearMatrix,
    keywords: &KeywordRanking,
    top_keywords: usize,
) -> Result<DashboardSummary> {
    let top = top_category(matrix)?;
    let rates = growth_rates(matrix);
    let (growth_cat, growth_val) = growth_category(&rates)
        .map(|(c, r)| (c.to_string(), r))
        .unwrap_or_else(|| (NO_GROWTH_CATEGORY.to_string(), 0.0));

    let top_keywords = keywords
        .category(&top)
        .unwrap_or_default()
        .iter()
        .take(top_keywords)
        .map(|c| KeywordCount {
            term: c.term.clone(),
            count: c.count,
        })
        .collect();

    Ok(DashboardSummary {
        total_publications: matrix.total(),
        growth_rate: format_percent(rates.get(&top).copied().unwrap_or(0.0)),
        top_category: top,
        growth_category: growth_cat,
        category_growth: format_percent(growth_val),
        top_keywords,
    })
}

/// Naive one-year projection of the yearly total.
///
/// Mean period-over-period growth over the last [`FORECAST_WINDOW`] totals,
/// skipping steps from a zero total; 0% when no step is usable.
pub fn build_forecast(matrix: &CategoryYearMatrix) -> Result<Forecast> {
    let years = matrix.years();
    let last_year = *years.last().ok_or_empty("no years in trend matrix")?;
    let totals: Vec<u64> = years.iter().map(|y| matrix.year_total(*y)).collect();
    let last_total = totals.last().copied().unwrap_or(0);

    let window = &totals[totals.len().saturating_sub(FORECAST_WINDOW)..];
    let steps: Vec<f64> = window
        .windows(2)
        .filter(|pair| pair[0] > 0)
        .map(|pair| (pair[1] as f64 - pair[0] as f64) / pair[0] as f64)
        .collect();
    let mean_growth = if steps.is_empty() {
        0.0
    } else {
        steps.iter().sum::<f64>() / steps.len() as f64
    };

    let projected = (last_total as f64 * (1.0 + mean_growth)).round().max(0.0) as u64;

    Ok(Forecast {
        years: vec![last_year.to_string(), (last_year + 1).to_string()],
        counts: vec![last_total, projected],
    })
}

/// Per-category totals, largest first, ties by name
pub fn category_distribution(matrix: &CategoryYearMatrix) -> Vec<CategoryShare> {
    let mut shares: Vec<CategoryShare> = matrix
        .categories()
        .map(|c| CategoryShare {
            category: c.to_string(),
            count: matrix.category_total(c),
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    shares
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrendsError;

    fn matrix(cells: &[(&str, i32, u64)]) -> CategoryYearMatrix {
        let mut m = CategoryYearMatrix::new();
        for (c, y, n) in cells {
            m.add(c, *y, *n);
        }
        m
    }

    #[test]
    fn test_top_category_tie_goes_to_sorted_first() -> Result<()> {
        let m = matrix(&[("Oncology", 2020, 5), ("Cardiology", 2020, 5), ("AI Methods", 2021, 2)]);
        assert_eq!(top_category(&m)?, "Cardiology");
        Ok(())
    }

    #[test]
    fn test_top_category_empty() {
        assert!(matches!(
            top_category(&CategoryYearMatrix::new()),
            Err(TrendsError::EmptyAggregate(_))
        ));
    }

    #[test]
    fn test_growth_guard_excludes_zero_baseline() {
        let m = matrix(&[
            ("Oncology", 2022, 10),
            ("Oncology", 2023, 12),
            ("Neurology", 2023, 5),
        ]);
        let rates = growth_rates(&m);
        assert_eq!(rates.len(), 1);
        assert_eq!(rates.get("Oncology"), Some(&20.0));
        assert_eq!(growth_category(&rates), Some(("Oncology", 20.0)));
    }

    #[test]
    fn test_growth_needs_two_years() {
        let m = matrix(&[("Oncology", 2023, 3)]);
        assert!(growth_rates(&m).is_empty());
    }

    #[test]
    fn test_forecast_mean_growth() -> Result<()> {
        let m = matrix(&[
            ("Oncology", 2021, 60),
            ("Cardiology", 2021, 40),
            ("Oncology", 2022, 110),
            ("Oncology", 2023, 121),
        ]);
        let forecast = build_forecast(&m)?;
        assert_eq!(forecast.years, vec!["2023".to_string(), "2024".to_string()]);
        assert_eq!(forecast.counts, vec![121, 133]);
        Ok(())
    }

    #[test]
    fn test_forecast_uses_last_three_years_only() -> Result<()> {
        let m = matrix(&[
            ("Oncology", 2019, 1),
            ("Oncology", 2020, 100),
            ("Oncology", 2021, 100),
            ("Oncology", 2022, 100),
        ]);
        assert_eq!(build_forecast(&m)?.counts, vec![100, 100]);
        Ok(())
    }

    #[test]
    fn test_forecast_without_usable_growth() -> Result<()> {
        let single = matrix(&[("Oncology", 2024, 7)]);
        assert_eq!(build_forecast(&single)?.counts, vec![7, 7]);
        assert!(build_forecast(&CategoryYearMatrix::new()).is_err());
        Ok(())
    }

    #[test]
    fn test_summary_fields() -> Result<()> {
        let m = matrix(&[
            ("Oncology", 2023, 4),
            ("Oncology", 2024, 5),
            ("Cardiology", 2023, 1),
            ("Cardiology", 2024, 3),
        ]);
        let summary = build_summary(&m, &KeywordRanking::default(), 10)?;
        assert_eq!(summary.total_publications, 13);
        assert_eq!(summary.top_category, "Oncology");
        assert_eq!(summary.growth_rate, "25.00%");
        assert_eq!(summary.growth_category, "Cardiology");
        assert_eq!(summary.category_growth, "200.00%");
        assert!(summary.top_keywords.is_empty());
        Ok(())
    }

    #[test]
    fn test_summary_without_growth() -> Result<()> {
        let m = matrix(&[("Oncology", 2024, 5)]);
        let summary = build_summary(&m, &KeywordRanking::default(), 10)?;
        assert_eq!(summary.growth_category, NO_GROWTH_CATEGORY);
        assert_eq!(summary.growth_rate, "0.00%");
        Ok(())
    }

    #[test]
    fn test_distribution_order() {
        let m = matrix(&[("b", 2020, 2), ("a", 2020, 2), ("c", 2021, 9)]);
        let names: Vec<String> = category_distribution(&m)
            .into_iter()
            .map(|s| s.category)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
