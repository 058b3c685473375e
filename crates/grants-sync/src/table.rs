//! Row/column view over parsed opportunity records.

use std::borrow::Cow;

use chrono::NaiveDate;
use grants_core::{OpportunityField, OpportunityRecord};

/// Output rendering of a parsed post date.
pub const POST_DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

/// Parse a `MMDDYYYY` post date. Anything other than eight ASCII digits
/// naming a real calendar day yields `None`.
pub fn parse_post_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let month: u32 = raw[0..2].parse().ok()?;
    let day: u32 = raw[2..4].parse().ok()?;
    let year: i32 = raw[4..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub record: OpportunityRecord,
    pub post_date: Option<NaiveDate>,
}

impl TableRow {
    pub fn new(record: OpportunityRecord) -> Self {
        let post_date = parse_post_date(&record.post_date);
        Self { record, post_date }
    }

    /// Cell value as it appears in the output table. The post date column
    /// carries the parsed date, or nothing when it did not parse.
    pub fn cell(&self, field: OpportunityField) -> Cow<'_, str> {
        match field {
            OpportunityField::PostDate => match self.post_date {
                Some(date) => Cow::Owned(date.format(POST_DATE_OUTPUT_FORMAT).to_string()),
                None => Cow::Borrowed(""),
            },
            other => Cow::Borrowed(self.record.value(other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpportunityTable {
    rows: Vec<TableRow>,
}

impl OpportunityTable {
    pub fn from_records(records: Vec<OpportunityRecord>) -> Self {
        Self {
            rows: records.into_iter().map(TableRow::new).collect(),
        }
    }

    pub fn column_names() -> impl Iterator<Item = &'static str> {
        OpportunityField::ALL.into_iter().map(OpportunityField::column_name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn head(&self, n: usize) -> &[TableRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Raw values of one column, in row order.
    pub fn column(&self, field: OpportunityField) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row.record.value(field))
    }

    /// Rows whose post date did not parse.
    pub fn null_post_dates(&self) -> usize {
        self.rows.iter().filter(|row| row.post_date.is_none()).count()
    }

    /// Consume the table and return only the rows `keep` accepts, in order.
    pub fn retain_rows<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&TableRow) -> bool,
    {
        Self {
            rows: self.rows.into_iter().filter(|row| keep(row)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, post_date: &str) -> OpportunityRecord {
        OpportunityRecord {
            opportunity_id: id.to_string(),
            post_date: post_date.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn post_dates_parse_from_month_day_year() {
        assert_eq!(
            parse_post_date("01152024"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            parse_post_date("02292024"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn unparsable_post_dates_become_null() {
        for raw in ["99999999", "02302024", "", "2024-01-15", "1152024", "0115202a", "011520245"] {
            assert_eq!(parse_post_date(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn table_exposes_columns_and_null_dates() {
        let table = OpportunityTable::from_records(vec![
            record("1", "01152024"),
            record("2", "99999999"),
        ]);

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.column(OpportunityField::OpportunityId).collect::<Vec<_>>(),
            vec!["1", "2"]
        );
        assert_eq!(
            table.rows().iter().map(|row| row.post_date).collect::<Vec<_>>(),
            vec![NaiveDate::from_ymd_opt(2024, 1, 15), None]
        );
        assert_eq!(table.null_post_dates(), 1);

        assert_eq!(table.rows()[0].cell(OpportunityField::PostDate), "2024-01-15");
        assert_eq!(table.rows()[1].cell(OpportunityField::PostDate), "");
        assert_eq!(table.rows()[1].cell(OpportunityField::OpportunityId), "2");
    }

    #[test]
    fn retain_rows_keeps_order_and_head_is_bounded() {
        let table = OpportunityTable::from_records(vec![
            record("1", ""),
            record("2", ""),
            record("3", ""),
        ]);
        assert_eq!(table.head(10).len(), 3);
        assert_eq!(table.head(2).len(), 2);

        let narrowed = table.retain_rows(|row| row.record.opportunity_id != "2");
        assert_eq!(
            narrowed.column(OpportunityField::OpportunityId).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
        assert_eq!(OpportunityTable::column_names().count(), 26);
    }
}
