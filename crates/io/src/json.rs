// JSON run summary

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use idrecon_recon::ReconResult;

use crate::error::ReportError;

/// Pretty-printed summary (meta + counts), without row data.
pub fn summary_string(result: &ReconResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

/// Write the summary JSON to `path`.
pub fn export_summary(path: &Path, result: &ReconResult) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Io { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, result)
        .map_err(|source| ReportError::Json { path: path.to_path_buf(), source })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idrecon_recon::engine::{run, ReconInput};
    use idrecon_recon::DivergenceRecord;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_summary_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");

        let input = ReconInput {
            records: vec![DivergenceRecord::from_raw("a1", "s1", "1", "2")],
            ..Default::default()
        };
        let result = run(&input).unwrap();
        export_summary(&path, &result).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["summary"]["total"], 1);
        assert_eq!(parsed["summary"]["both_missing"], 1);
        assert_eq!(parsed["meta"]["email_tie_break"], "last");
        assert_eq!(summary_string(&result).unwrap().trim(), fs::read_to_string(&path).unwrap().trim());
    }
}
