//! Allow-list and post-date filters applied to the opportunity table.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use grants_core::OpportunityField;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::{OpportunityTable, TableRow};

pub const OPPORTUNITY_CATEGORIES: &[&str] = &["D", "M", "C", "E", "O"];

pub const FUNDING_INSTRUMENT_TYPES: &[&str] = &["G", "CA", "O", "PC"];

pub const FUNDING_ACTIVITY_CATEGORIES: &[&str] = &[
    "ACA", "AG", "AR", "BC", "CD", "CP", "DPR", "ED", "ELT", "EN", "ENV", "FN", "HL", "HO", "HU",
    "ISS", "IS", "LJL", "NR", "RA", "RD", "ST", "T", "O",
];

pub const ELIGIBLE_APPLICANT_CODES: &[&str] = &[
    "99", "00", "01", "02", "04", "05", "06", "07", "08", "11", "12", "13", "20", "21", "22", "23",
    "25",
];

/// How far back from the run time a post date may lie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PostDateWindow {
    #[serde(rename = "today")]
    Today,
    #[default]
    #[serde(rename = "last_3_days")]
    Last3Days,
    #[serde(rename = "one_week")]
    OneWeek,
    #[serde(rename = "four_weeks")]
    FourWeeks,
    #[serde(rename = "all")]
    All,
}

impl PostDateWindow {
    pub fn name(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Last3Days => "last_3_days",
            Self::OneWeek => "one_week",
            Self::FourWeeks => "four_weeks",
            Self::All => "all",
        }
    }

    fn lookback(self) -> Option<Duration> {
        match self {
            Self::Last3Days => Some(Duration::days(3)),
            Self::OneWeek => Some(Duration::weeks(1)),
            Self::FourWeeks => Some(Duration::weeks(4)),
            Self::Today | Self::All => None,
        }
    }

    /// Whether a row posted on `post_date` falls inside the window ending at
    /// `now`. Post dates count from midnight; a missing date matches only
    /// [`PostDateWindow::All`].
    pub fn contains(self, post_date: Option<NaiveDate>, now: NaiveDateTime) -> bool {
        if self == Self::All {
            return true;
        }
        let Some(date) = post_date else {
            return false;
        };
        match self.lookback() {
            Some(lookback) => {
                let posted = date.and_time(NaiveTime::MIN);
                posted >= now - lookback && posted <= now
            }
            None => date == now.date(),
        }
    }
}

impl fmt::Display for PostDateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Allow-lists and window for one run. Lists omitted from a YAML override keep
/// their built-in values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub opportunity_categories: Vec<String>,
    pub funding_instrument_types: Vec<String>,
    pub funding_activity_categories: Vec<String>,
    pub eligible_applicants: Vec<String>,
    pub post_date_window: PostDateWindow,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            opportunity_categories: owned(OPPORTUNITY_CATEGORIES),
            funding_instrument_types: owned(FUNDING_INSTRUMENT_TYPES),
            funding_activity_categories: owned(FUNDING_ACTIVITY_CATEGORIES),
            eligible_applicants: owned(ELIGIBLE_APPLICANT_CODES),
            post_date_window: PostDateWindow::default(),
        }
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl FilterConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing filter config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn with_window(mut self, window: PostDateWindow) -> Self {
        self.post_date_window = window;
        self
    }

    /// Stages in application order: the four allow-lists, then the window.
    pub fn stages(&self) -> Vec<FilterStage> {
        vec![
            FilterStage::allow_list(
                OpportunityField::OpportunityCategory,
                &self.opportunity_categories,
            ),
            FilterStage::allow_list(
                OpportunityField::FundingInstrumentType,
                &self.funding_instrument_types,
            ),
            FilterStage::allow_list(
                OpportunityField::CategoryOfFundingActivity,
                &self.funding_activity_categories,
            ),
            FilterStage::allow_list(OpportunityField::EligibleApplicants, &self.eligible_applicants),
            FilterStage::PostDate(self.post_date_window),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStage {
    /// Keep rows whose column value is exactly one of `allowed`.
    AllowList {
        field: OpportunityField,
        allowed: BTreeSet<String>,
    },
    PostDate(PostDateWindow),
}

impl FilterStage {
    pub fn allow_list<S: AsRef<str>>(field: OpportunityField, allowed: &[S]) -> Self {
        Self::AllowList {
            field,
            allowed: allowed.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::AllowList { field, .. } => field.column_name().to_string(),
            Self::PostDate(window) => format!("Post Date ({window})"),
        }
    }

    pub fn matches(&self, row: &TableRow, now: NaiveDateTime) -> bool {
        match self {
            Self::AllowList { field, allowed } => allowed.contains(row.record.value(*field)),
            Self::PostDate(window) => window.contains(row.post_date, now),
        }
    }

    pub fn apply(&self, table: OpportunityTable, now: NaiveDateTime) -> OpportunityTable {
        table.retain_rows(|row| self.matches(row, now))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCount {
    pub stage: String,
    pub rows_remaining: usize,
}

#[derive(Debug, Clone)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn new(stages: Vec<FilterStage>) -> Self {
        Self { stages }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.stages())
    }

    /// Run every stage in order, recording how many rows survive each.
    pub fn apply(
        &self,
        table: OpportunityTable,
        now: NaiveDateTime,
    ) -> (OpportunityTable, Vec<StageCount>) {
        let mut counts = Vec::with_capacity(self.stages.len());
        let mut table = table;
        for stage in &self.stages {
            table = stage.apply(table, now);
            debug!(stage = %stage.label(), rows = table.len(), "filter applied");
            counts.push(StageCount {
                stage: stage.label(),
                rows_remaining: table.len(),
            });
        }
        (table, counts)
    }
}
