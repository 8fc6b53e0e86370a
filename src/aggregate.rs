//! Row filtering and bucket counting
//!
//! Turns one table returned by a remote call into the labeled counts of a
//! metric. Every bucket declared in `row_count` yields exactly one
//! [`StatRow`], so a bucket that matched nothing is still reported as zero.

use std::collections::BTreeMap;

use tracing::error;

use crate::{
    StatRow,
    config::TableMetric,
    error::CollectError,
    value::{Row, Value, field},
};

/// Bucket value that matches every row
const TOTAL: &str = "total";

struct Bucket<'a> {
    field: &'a str,
    name: String,
    prefix: String,
    total: bool,
    count: f64,
}

impl Bucket<'_> {
    fn matches(&self, row: &Row) -> bool {
        self.total
            || field_text(row, self.field)
                .is_some_and(|text| text.to_lowercase().starts_with(&self.prefix))
    }
}

/// Count the rows of a table into the buckets of a metric.
///
/// Label values are lower-cased. Buckets whose configured value is neither a
/// string nor an integer are reported and left out of the result.
pub fn aggregate<'a, I>(
    rows: I,
    metric: &TableMetric,
    system: &str,
    usage: &str,
    server: &str,
) -> Vec<StatRow>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut buckets = Vec::new();
    for (field, value) in metric.buckets() {
        match value.as_label() {
            Some(name) => buckets.push(Bucket {
                field,
                prefix: name.to_lowercase(),
                total: name.eq_ignore_ascii_case(TOTAL),
                name,
                count: 0.0,
            }),
            None => {
                let err = CollectError::Configuration(format!(
                    "row_count of field '{field}' contains a {} value, only strings and integers are allowed",
                    value.kind()
                ));
                error!(metric = %metric.name, system, error = %err, "skipping bucket");
            }
        }
    }

    for row in rows {
        if !passes_filter(row, &metric.row_filter) {
            continue;
        }
        for bucket in buckets.iter_mut().filter(|bucket| bucket.matches(row)) {
            bucket.count += 1.0;
        }
    }

    buckets
        .into_iter()
        .map(|bucket| {
            let count = format!("{}_{}", bucket.field, bucket.name);
            StatRow::new(bucket.count, system, usage, server, &count)
        })
        .collect()
}

/// A row passes an empty filter, or one where any field equals any of its values.
pub fn passes_filter(row: &Row, filter: &BTreeMap<String, Vec<Value>>) -> bool {
    if filter.is_empty() {
        return true;
    }

    filter.iter().any(|(name, accepted)| {
        let Some(text) = field_text(row, name) else {
            return false;
        };
        let text = text.to_lowercase();
        accepted
            .iter()
            .filter_map(Value::as_label)
            .any(|value| value.to_lowercase() == text)
    })
}

fn field_text(row: &Row, name: &str) -> Option<String> {
    field(row, name).and_then(Value::as_label)
}
