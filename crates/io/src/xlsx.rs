// Consolidated Excel workbook: one sheet per category

use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};

use idrecon_recon::{ClassifiedRecord, ReportBuckets};

use crate::error::ReportError;
use crate::row::{ReportRow, HEADER};
use crate::ReportOptions;

/// Text written in the first column of a sheet with no records.
pub const PLACEHOLDER: &str = "(no records)";

const HEADER_FILL: u32 = 0x1F4E78;

/// Statistics from a workbook export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportResult {
    pub sheets_written: usize,
    pub rows_written: usize,
}

/// Write the four buckets as sheets of one workbook, in report order.
///
/// Each sheet has a styled, frozen header row and autofit columns. Empty
/// sheets get the header plus a placeholder row.
pub fn export(path: &Path, buckets: &ReportBuckets, options: &ReportOptions) -> Result<ExportResult, ReportError> {
    let xlsx_err = |source| ReportError::Xlsx { path: path.to_path_buf(), source };

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let placeholder_format = Format::new().set_italic().set_font_color(Color::Gray);

    let mut workbook = Workbook::new();
    let mut result = ExportResult::default();

    for (category, records) in buckets.iter() {
        let worksheet = workbook
            .add_worksheet()
            .set_name(category.sheet_name())
            .map_err(xlsx_err)?;

        write_sheet(worksheet, records, options, &header_format, &placeholder_format).map_err(xlsx_err)?;

        result.sheets_written += 1;
        result.rows_written += records.len();
    }

    workbook.save(path).map_err(xlsx_err)?;
    Ok(result)
}

fn write_sheet(
    worksheet: &mut Worksheet,
    records: &[ClassifiedRecord],
    options: &ReportOptions,
    header_format: &Format,
    placeholder_format: &Format,
) -> Result<(), XlsxError> {
    for (col, title) in HEADER.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, header_format)?;
    }

    if records.is_empty() {
        worksheet.write_string_with_format(1, 0, PLACEHOLDER, placeholder_format)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        let report_row = ReportRow::from_classified(record, options);
        for (col, value) in report_row.fields().iter().enumerate() {
            worksheet.write_string(row, col as u16, *value)?;
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Reader, Xlsx};
    use idrecon_recon::{Category, DivergenceRecord};
    use tempfile::tempdir;

    fn classified(id: &str, category: Category) -> ClassifiedRecord {
        ClassifiedRecord {
            record: DivergenceRecord::from_raw(id, "sso", "111.111.111-11", "222.222.222-22"),
            exists_in_management_side: true,
            exists_in_accounts_side: true,
            common_email: Some("a@x.com".into()),
            category,
        }
    }

    #[test]
    fn four_sheets_in_report_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let mut buckets = ReportBuckets::default();
        buckets.push(classified("a1", Category::EmailMatch));
        buckets.push(classified("a2", Category::EmailMatch));

        let result = export(&path, &buckets, &ReportOptions::default()).unwrap();
        assert_eq!(result, ExportResult { sheets_written: 4, rows_written: 2 });

        let mut wb: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(
            wb.sheet_names(),
            vec!["Email Duplicado", "Um CPF Inexistente", "Ambos Inexistentes", "Outros"]
        );

        let range = wb.worksheet_range("Email Duplicado").unwrap();
        assert_eq!(range.get_size(), (3, 8));
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        assert_eq!(rows[0][0], "id_accounts");
        assert_eq!(rows[0][7], "email_comum");
        assert_eq!(rows[1][0], "a1");
        assert_eq!(rows[2][0], "a2");
        assert_eq!(rows[2][7], "a@x.com");
    }

    #[test]
    fn empty_sheet_has_header_and_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        export(&path, &ReportBuckets::default(), &ReportOptions::default()).unwrap();

        let mut wb: Xlsx<_> = open_workbook(&path).unwrap();
        let range = wb.worksheet_range("Outros").unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "id_accounts");
        assert_eq!(rows[1][0], PLACEHOLDER);
    }
}
