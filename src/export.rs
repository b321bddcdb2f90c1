use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::batch::{BatchReport, MatchReport, RowOutcome};
use crate::fair_odds::percent;
use crate::market::Market;

pub struct ExportReport {
    pub rows: usize,
    pub failed: usize,
    pub opportunities: usize,
}

/// Writes a scan to a workbook with a "Matches" sheet (every row, failed rows
/// carry their error) and an "Opportunities" sheet (ranked subset).
pub fn export_batch(report: &BatchReport, path: &Path) -> Result<ExportReport> {
    let match_rows = matches_rows(report);
    let opportunity_rows = opportunities_rows(&report.opportunities);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Matches")?;
        write_rows(sheet, &match_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Opportunities")?;
        write_rows(sheet, &opportunity_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        rows: report.rows.len(),
        failed: report.failures().count(),
        opportunities: report.opportunities.len(),
    })
}

fn matches_rows(report: &BatchReport) -> Vec<Vec<String>> {
    let mut header = vec![
        "#".to_string(),
        "Match".to_string(),
        "xG Home".to_string(),
        "xG Away".to_string(),
    ];
    for market in Market::BATCH {
        header.push(format!("{market} %"));
        header.push(format!("{market} Fair"));
        header.push(format!("{market} Odds"));
        header.push(format!("{market} Value"));
    }
    header.push("Error".to_string());

    let mut rows = vec![header];
    rows.extend(report.rows.iter().map(outcome_row));
    rows
}

fn outcome_row(outcome: &RowOutcome) -> Vec<String> {
    let mut row = vec![(outcome.position + 1).to_string(), outcome.label.clone()];
    match &outcome.result {
        Ok(report) => {
            row.push(format!("{:.2}", report.distribution.lambda_home));
            row.push(format!("{:.2}", report.distribution.lambda_away));
            for market in Market::BATCH {
                match report.line(market) {
                    Some(line) => {
                        row.push(format!("{:.2}", line.probability_pct));
                        row.push(line.fair_odds.to_string());
                        row.push(line.market_odds.to_string());
                        row.push(line.tag.as_str().to_string());
                    }
                    None => row.extend(std::iter::repeat_n(String::new(), 4)),
                }
            }
            row.push(String::new());
        }
        Err(err) => {
            row.extend(std::iter::repeat_n(String::new(), 2 + Market::BATCH.len() * 4));
            row.push(err.to_string());
        }
    }
    row
}

fn opportunities_rows(reports: &[MatchReport]) -> Vec<Vec<String>> {
    let header = [
        "Rank", "Match", "Home Win %", "Draw %", "Away Win %", "Over 2.5 %", "Value On",
    ]
    .map(str::to_string)
    .to_vec();

    let mut rows = vec![header];
    for (idx, report) in reports.iter().enumerate() {
        let d = &report.distribution;
        let value_on = report
            .lines
            .iter()
            .filter(|l| l.verdict.is_favorable())
            .map(|l| l.market.label())
            .collect::<Vec<_>>()
            .join(", ");
        rows.push(vec![
            (idx + 1).to_string(),
            report.label.clone(),
            format!("{:.2}", percent(d.p_home_win)),
            format!("{:.2}", percent(d.p_draw)),
            format!("{:.2}", percent(d.p_away_win)),
            format!("{:.2}", percent(d.p_over(crate::poisson::REFERENCE_LINE))),
            value_on,
        ]);
    }
    rows
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchSettings, FixtureRequest, run_batch};
    use crate::market::MarketOdds;
    use crate::ranker::OpportunityPolicy;

    fn report() -> BatchReport {
        let mut good = FixtureRequest {
            home: "A".to_string(),
            away: "B".to_string(),
            lambda_home: Some(2.2),
            lambda_away: Some(1.3),
            ..FixtureRequest::default()
        };
        good.odds.insert(Market::HomeWin, MarketOdds::Valid(10.0));
        let bad = FixtureRequest {
            home: "C".to_string(),
            ..FixtureRequest::default()
        };
        let settings = BatchSettings {
            max_goals: 10,
            cutoff: 0.4,
            policy: OpportunityPolicy::default(),
            parallelism: 1,
        };
        run_batch(&[good, bad], None, &settings)
    }

    #[test]
    fn rows_are_rectangular() {
        let rows = matches_rows(&report());
        assert_eq!(rows.len(), 3);
        let width = rows[0].len();
        assert!(rows.iter().all(|r| r.len() == width));
        assert_eq!(rows[1][1], "A x B");
        assert_eq!(rows[1][7], "value");
        assert!(rows[2][width - 1].starts_with("missing input"));
    }

    #[test]
    fn opportunities_sheet_lists_value_markets() {
        let report = report();
        let rows = opportunities_rows(&report.opportunities);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[1][6], "Home Win");
    }

    #[test]
    fn saves_workbook() {
        let path = std::env::temp_dir().join(format!("fairodds-export-{}.xlsx", std::process::id()));
        let summary = export_batch(&report(), &path).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.opportunities, 1);
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}
