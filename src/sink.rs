//! Visualization sinks
//!
//! The core hands each finished table to a [`VisualizationSink`]; drawing is
//! the sink's business. Bundled sinks write the tables as CSV or JSON files
//! into an output directory given at construction, or keep them in memory.

use crate::aggregation::{CategoryRevenue, MonthlyRevenue};
use crate::cohort::CohortMatrix;
use crate::error::AnalyticsError;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const REVENUE_BY_MONTH: &str = "revenue_by_month";
pub const TOP_CATEGORIES: &str = "top_categories_revenue";
pub const COHORT_ACTIVITY: &str = "cohort_activity";

/// Consumer of the three analytic tables.
pub trait VisualizationSink {
    fn render_monthly_revenue(&mut self, rows: &[MonthlyRevenue]) -> Result<(), AnalyticsError>;

    fn render_top_categories(&mut self, rows: &[CategoryRevenue]) -> Result<(), AnalyticsError>;

    fn render_cohort_matrix(&mut self, matrix: &CohortMatrix) -> Result<(), AnalyticsError>;

    /// Where the output went, if the sink writes to disk.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Writes each table to `<output_dir>/<name>.csv`.
#[derive(Debug, Clone)]
pub struct CsvSink {
    output_dir: PathBuf,
}

impl CsvSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        CsvSink {
            output_dir: output_dir.into(),
        }
    }

    fn writer(&self, name: &str) -> Result<(csv::Writer<File>, PathBuf), AnalyticsError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.csv", name));
        Ok((csv::Writer::from_path(&path)?, path))
    }
}

impl VisualizationSink for CsvSink {
    fn render_monthly_revenue(&mut self, rows: &[MonthlyRevenue]) -> Result<(), AnalyticsError> {
        let (mut writer, path) = self.writer(REVENUE_BY_MONTH)?;
        writer.write_record(["month_start", "revenue", "smoothed_revenue"])?;
        for row in rows {
            writer.write_record([
                row.month.first_day().to_string(),
                row.revenue.to_string(),
                row.smoothed_revenue.to_string(),
            ])?;
        }
        writer.flush()?;
        info!("Wrote {} monthly revenue rows to {}", rows.len(), path.display());
        Ok(())
    }

    fn render_top_categories(&mut self, rows: &[CategoryRevenue]) -> Result<(), AnalyticsError> {
        let (mut writer, path) = self.writer(TOP_CATEGORIES)?;
        writer.write_record(["category", "revenue"])?;
        for row in rows {
            writer.write_record([row.category.clone(), row.revenue.to_string()])?;
        }
        writer.flush()?;
        info!("Wrote {} categories to {}", rows.len(), path.display());
        Ok(())
    }

    fn render_cohort_matrix(&mut self, matrix: &CohortMatrix) -> Result<(), AnalyticsError> {
        let (mut writer, path) = self.writer(COHORT_ACTIVITY)?;

        let mut header = vec!["cohort_month".to_string()];
        header.extend(matrix.column_labels());
        writer.write_record(&header)?;

        for (label, cells) in matrix.row_labels().into_iter().zip(matrix.cells()) {
            let mut record = Vec::with_capacity(cells.len() + 1);
            record.push(label);
            record.extend(cells.iter().map(|count| count.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        info!("Wrote {} cohorts to {}", matrix.cohorts().len(), path.display());
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.output_dir)
    }
}

/// Writes each table to `<output_dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct JsonSink {
    output_dir: PathBuf,
}

impl JsonSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        JsonSink {
            output_dir: output_dir.into(),
        }
    }

    fn write<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<(), AnalyticsError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.json", name));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}

impl VisualizationSink for JsonSink {
    fn render_monthly_revenue(&mut self, rows: &[MonthlyRevenue]) -> Result<(), AnalyticsError> {
        let records: Vec<_> = rows
            .iter()
            .map(|row| {
                json!({
                    "month_start": row.month.first_day().to_string(),
                    "revenue": row.revenue,
                    "smoothed_revenue": row.smoothed_revenue,
                })
            })
            .collect();
        self.write(REVENUE_BY_MONTH, &records)
    }

    fn render_top_categories(&mut self, rows: &[CategoryRevenue]) -> Result<(), AnalyticsError> {
        self.write(TOP_CATEGORIES, &rows)
    }

    fn render_cohort_matrix(&mut self, matrix: &CohortMatrix) -> Result<(), AnalyticsError> {
        let body = json!({
            "rows": matrix.row_labels(),
            "columns": matrix.offsets(),
            "cells": matrix.cells(),
        });
        self.write(COHORT_ACTIVITY, &body)
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.output_dir)
    }
}

/// Keeps the most recent table of each kind in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub top_categories: Vec<CategoryRevenue>,
    pub cohort_matrix: Option<CohortMatrix>,
    /// Number of render calls received
    pub renders: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisualizationSink for RecordingSink {
    fn render_monthly_revenue(&mut self, rows: &[MonthlyRevenue]) -> Result<(), AnalyticsError> {
        self.monthly_revenue = rows.to_vec();
        self.renders += 1;
        Ok(())
    }

    fn render_top_categories(&mut self, rows: &[CategoryRevenue]) -> Result<(), AnalyticsError> {
        self.top_categories = rows.to_vec();
        self.renders += 1;
        Ok(())
    }

    fn render_cohort_matrix(&mut self, matrix: &CohortMatrix) -> Result<(), AnalyticsError> {
        self.cohort_matrix = Some(matrix.clone());
        self.renders += 1;
        Ok(())
    }
}

/// Short currency label for axis ticks and console summaries: `$1.2B`,
/// `$3.4M`, `$12K`, `$950`.
pub fn format_currency_short(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000_000.0 {
        format!("${:.1}B", value / 1_000_000_000.0)
    } else if magnitude >= 1_000_000.0 {
        format!("${:.1}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("${:.0}K", value / 1_000.0)
    } else {
        format!("${:.0}", value)
    }
}
