//! Cohort Reshaper
//!
//! Turns the long-form cohort activity rows into a dense cohort × offset grid
//! with explicit zeros, so the rendered matrix has no ragged edges.

use crate::aggregation::CohortActivity;
use crate::calendar::MonthKey;
use crate::config::MAX_COHORT_MONTH_LIMIT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Active customers per cohort month (rows) and month offset (columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortMatrix {
    cohorts: Vec<MonthKey>,
    offsets: Vec<u32>,
    cells: Vec<Vec<u64>>,
}

impl CohortMatrix {
    /// Builds the dense matrix.
    ///
    /// Rows are every cohort present in `rows`, oldest first; columns are
    /// offsets `0..=max_month`. Missing buckets are zero. A row whose offset
    /// lies past `max_month` contributes no cell, but its cohort still gets a
    /// row. If a bucket is repeated, the last value wins.
    ///
    /// `max_month` is capped at [`MAX_COHORT_MONTH_LIMIT`].
    pub fn from_long(rows: &[CohortActivity], max_month: u32) -> Self {
        let max_month = max_month.min(MAX_COHORT_MONTH_LIMIT);
        let cohorts: Vec<MonthKey> = rows
            .iter()
            .map(|row| row.cohort_month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let offsets: Vec<u32> = (0..=max_month).collect();
        let mut cells = vec![vec![0u64; offsets.len()]; cohorts.len()];

        for row in rows {
            if row.month_offset > max_month {
                continue;
            }
            if let Ok(index) = cohorts.binary_search(&row.cohort_month) {
                cells[index][row.month_offset as usize] = row.active_customers;
            }
        }

        CohortMatrix {
            cohorts,
            offsets,
            cells,
        }
    }

    pub fn cohorts(&self) -> &[MonthKey] {
        &self.cohorts
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Grid in row-major order, one inner vector per cohort.
    pub fn cells(&self) -> &[Vec<u64>] {
        &self.cells
    }

    pub fn row(&self, cohort: MonthKey) -> Option<&[u64]> {
        self.cohorts
            .binary_search(&cohort)
            .ok()
            .map(|index| self.cells[index].as_slice())
    }

    /// Cell value, or `None` when the cohort or offset is outside the matrix.
    pub fn get(&self, cohort: MonthKey, offset: u32) -> Option<u64> {
        self.row(cohort)?.get(offset as usize).copied()
    }

    /// `YYYY-MM` labels for the rows.
    pub fn row_labels(&self) -> Vec<String> {
        self.cohorts.iter().map(MonthKey::label).collect()
    }

    pub fn column_labels(&self) -> Vec<String> {
        self.offsets.iter().map(|offset| offset.to_string()).collect()
    }

    pub fn total_active(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }
}
