use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Local};
use serde_json::Value;

use crate::atomic_file;
use crate::credentials::InstitutionId;

const INSTITUTION_COLUMN: &str = "institution_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Balances,
    Transactions,
    Holdings,
    InvestmentTransactions,
}

impl ExportKind {
    /// Subdirectory of the output dir the export is written to
    pub fn dir_name(self) -> &'static str {
        match self {
            ExportKind::Balances => "balances",
            ExportKind::Transactions => "transactions",
            ExportKind::Holdings => "holdings",
            ExportKind::InvestmentTransactions => "investment_transactions",
        }
    }
}

impl Display for ExportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dir_name().replace('_', " "))
    }
}

/// Keep only records of the given accounts. No accounts means no filter.
pub fn filter_accounts(records: Vec<Value>, accounts: &[String]) -> Vec<Value> {
    if accounts.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| {
            record
                .get("account_id")
                .and_then(Value::as_str)
                .is_some_and(|id| accounts.iter().any(|account| account == id))
        })
        .collect()
}

/// Flatten nested objects into `parent.child` columns. Arrays are kept as JSON text,
/// null becomes an empty cell.
pub fn flatten(record: &Value) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    flatten_into(&mut result, None, record);
    result
}

fn flatten_into(result: &mut BTreeMap<String, String>, prefix: Option<&str>, value: &Value) {
    let cell = match value {
        Value::Object(fields) => {
            for (key, value) in fields {
                let key = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key.clone(),
                };
                flatten_into(result, Some(&key), value);
            }
            return;
        }
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    result.insert(prefix.unwrap_or("value").to_string(), cell);
}

/// Render records as CSV with `institution_id` as the first column and the union of
/// all record fields, sorted, after it
pub fn to_csv(institution_id: &InstitutionId, records: &[Value]) -> Result<Vec<u8>> {
    let rows: Vec<BTreeMap<String, String>> = records.iter().map(flatten).collect();
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .filter(|column| *column != INSTITUTION_COLUMN)
        .collect();

    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(std::iter::once(INSTITUTION_COLUMN).chain(columns.iter().copied()))?;
    for row in &rows {
        writer.write_record(
            std::iter::once(institution_id.as_str()).chain(
                columns
                    .iter()
                    .map(|column| row.get(*column).map(String::as_str).unwrap_or("")),
            ),
        )?;
    }
    writer.into_inner().context("Failed to finish CSV output")
}

/// `<output_dir>/<kind>/<institution>_<YYYYmmdd-HHMMSS>.csv`
pub fn output_path(
    output_dir: &Path,
    kind: ExportKind,
    institution_id: &InstitutionId,
    now: DateTime<Local>,
) -> PathBuf {
    output_dir.join(kind.dir_name()).join(format!(
        "{}_{}.csv",
        institution_id.as_str(),
        now.format("%Y%m%d-%H%M%S")
    ))
}

pub async fn write_export(
    output_dir: &Path,
    kind: ExportKind,
    institution_id: &InstitutionId,
    records: &[Value],
    now: DateTime<Local>,
) -> Result<PathBuf> {
    let path = output_path(output_dir, kind, institution_id, now);
    let content = to_csv(institution_id, records)?;
    atomic_file::write_atomic(&path, &content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {} {kind} rows to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use serde_json::json;

    use super::*;

    fn institution() -> InstitutionId {
        InstitutionId::new("ins_109508").unwrap()
    }

    #[test]
    fn flattens_nested_objects() {
        let flat = flatten(&json!({
            "account_id": "acc-1",
            "balances": {"available": 100.5, "current": null, "iso_currency_code": "USD"},
            "category": ["Food", "Restaurants"],
            "pending": false,
        }));

        assert_eq!(
            BTreeMap::from([
                ("account_id".to_string(), "acc-1".to_string()),
                ("balances.available".to_string(), "100.5".to_string()),
                ("balances.current".to_string(), String::new()),
                ("balances.iso_currency_code".to_string(), "USD".to_string()),
                ("category".to_string(), "[\"Food\",\"Restaurants\"]".to_string()),
                ("pending".to_string(), "false".to_string()),
            ]),
            flat
        );
    }

    #[test]
    fn csv_has_union_of_columns() {
        let records = vec![
            json!({"account_id": "a", "amount": 1.5}),
            json!({"account_id": "b", "name": "Coffee, large"}),
        ];

        let csv = String::from_utf8(to_csv(&institution(), &records).unwrap()).unwrap();

        assert_eq!(
            "institution_id,account_id,amount,name\n\
             ins_109508,a,1.5,\n\
             ins_109508,b,,\"Coffee, large\"\n",
            csv
        );
    }

    #[test]
    fn empty_export_has_only_header() {
        let csv = String::from_utf8(to_csv(&institution(), &[]).unwrap()).unwrap();
        assert_eq!("institution_id\n", csv);
    }

    #[test]
    fn filters_by_account() {
        let records = vec![
            json!({"account_id": "a"}),
            json!({"account_id": "b"}),
            json!({"no_account": true}),
        ];
        assert_eq!(3, filter_accounts(records.clone(), &[]).len());
        assert_eq!(
            vec![json!({"account_id": "b"})],
            filter_accounts(records, &["b".to_string()])
        );
    }

    #[test]
    fn output_path_is_per_kind_and_timestamped() {
        let now = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            PathBuf::from("/out/investment_transactions/ins_109508_20260102-030405.csv"),
            output_path(
                Path::new("/out"),
                ExportKind::InvestmentTransactions,
                &institution(),
                now
            )
        );
    }

    #[tokio::test]
    async fn writes_export_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let path = write_export(
            tempdir.path(),
            ExportKind::Balances,
            &institution(),
            &[json!({"account_id": "a"})],
            now,
        )
        .await
        .unwrap();

        assert!(path.starts_with(tempdir.path().join("balances")));
        assert_eq!(
            "institution_id,account_id\nins_109508,a\n",
            std::fs::read_to_string(path).unwrap()
        );
    }
}
