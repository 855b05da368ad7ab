// Per-category CSV reports

use std::path::{Path, PathBuf};

use idrecon_recon::{Category, ClassifiedRecord, ReportBuckets};

use crate::error::ReportError;
use crate::row::{ReportRow, HEADER};
use crate::ReportOptions;

/// Write one bucket to `path`. An empty bucket still gets the header line.
pub fn export(path: &Path, records: &[ClassifiedRecord], options: &ReportOptions) -> Result<usize, ReportError> {
    let csv_err = |source| ReportError::Csv { path: path.to_path_buf(), source };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;

    writer.write_record(HEADER).map_err(csv_err)?;
    for record in records {
        let row = ReportRow::from_classified(record, options);
        writer.write_record(row.fields()).map_err(csv_err)?;
    }

    writer.flush().map_err(|source| ReportError::Io { path: path.to_path_buf(), source })?;
    Ok(records.len())
}

/// Write all four category files into `dir`, one result per category.
///
/// A failure on one file does not stop the others.
pub fn export_all(
    dir: &Path,
    buckets: &ReportBuckets,
    options: &ReportOptions,
) -> Vec<(Category, Result<PathBuf, ReportError>)> {
    buckets
        .iter()
        .map(|(category, records)| {
            let path = dir.join(category.csv_file_name());
            let result = export(&path, records, options).map(|_| path);
            (category, result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use idrecon_recon::DivergenceRecord;
    use std::fs;
    use tempfile::tempdir;

    fn classified(id: &str, category: Category, email: Option<&str>) -> ClassifiedRecord {
        ClassifiedRecord {
            record: DivergenceRecord::from_raw(id, format!("sso-{id}"), "111.111.111-11", "222.222.222-22"),
            exists_in_management_side: category != Category::BothMissing,
            exists_in_accounts_side: matches!(category, Category::EmailMatch | Category::Other),
            common_email: email.map(str::to_string),
            category,
        }
    }

    #[test]
    fn empty_bucket_writes_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let n = export(&path, &[], &ReportOptions::default()).unwrap();
        assert_eq!(n, 0);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "id_accounts,sso_id_gestao,cpf_gestao,cpf_accounts,existe_segurado_gestao,\
             existe_segurado_accounts,dono_real_eh_accounts,email_comum\n"
        );
    }

    #[test]
    fn rows_follow_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("match.csv");
        let records = vec![classified("a1", Category::EmailMatch, Some("a@x.com"))];
        export(&path, &records, &ReportOptions::default()).unwrap();

        let mut reader = ::csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 8);
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "a1");
        assert_eq!(&rows[0][1], "sso-a1");
        assert_eq!(&rows[0][2], "222.222.222-22");
        assert_eq!(&rows[0][3], "111.111.111-11");
        assert_eq!(&rows[0][4], "YES");
        assert_eq!(&rows[0][5], "YES");
        assert_eq!(&rows[0][6], "YES");
        assert_eq!(&rows[0][7], "a@x.com");
    }

    #[test]
    fn export_all_writes_four_files() {
        let dir = tempdir().unwrap();
        let mut buckets = ReportBuckets::default();
        buckets.push(classified("a1", Category::OneMissing, None));

        let results = export_all(dir.path(), &buckets, &ReportOptions::default());
        assert_eq!(results.len(), 4);
        for (category, result) in results {
            let path = result.unwrap();
            assert_eq!(path.file_name().unwrap(), category.csv_file_name());
            let lines = fs::read_to_string(&path).unwrap().lines().count();
            let expected = if category == Category::OneMissing { 2 } else { 1 };
            assert_eq!(lines, expected, "{category}");
        }
    }

    #[test]
    fn one_failed_file_does_not_stop_the_rest() {
        let dir = tempdir().unwrap();
        // A directory squatting on one file name makes only that write fail
        fs::create_dir(dir.path().join(Category::BothMissing.csv_file_name())).unwrap();

        let results = export_all(dir.path(), &ReportBuckets::default(), &ReportOptions::default());
        let failed: Vec<_> = results.iter().filter(|(_, r)| r.is_err()).map(|(c, _)| *c).collect();
        assert_eq!(failed, vec![Category::BothMissing]);
        assert!(dir.path().join(Category::Other.csv_file_name()).is_file());
    }
}
