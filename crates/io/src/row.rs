// One report line, shared by the CSV and workbook writers

use idrecon_recon::{format_tax_id, ClassifiedRecord};

use crate::ReportOptions;

/// Column header, in output order.
pub const HEADER: [&str; 8] = [
    "id_accounts",
    "sso_id_gestao",
    "cpf_gestao",
    "cpf_accounts",
    "existe_segurado_gestao",
    "existe_segurado_accounts",
    "dono_real_eh_accounts",
    "email_comum",
];

pub fn flag(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub account_id: String,
    pub management_id: String,
    pub tax_id_management: String,
    pub tax_id_accounts: String,
    pub exists_management: &'static str,
    pub exists_accounts: &'static str,
    pub accounts_is_owner: &'static str,
    pub common_email: String,
}

impl ReportRow {
    pub fn from_classified(record: &ClassifiedRecord, options: &ReportOptions) -> Self {
        let display = |raw: &str| {
            if options.mask_tax_ids {
                format_tax_id(raw)
            } else {
                raw.to_string()
            }
        };
        let r = &record.record;
        Self {
            account_id: r.account_id.clone(),
            management_id: r.management_id.clone(),
            tax_id_management: display(&r.tax_id_management_raw),
            tax_id_accounts: display(&r.tax_id_accounts_raw),
            exists_management: flag(record.exists_in_management_side),
            exists_accounts: flag(record.exists_in_accounts_side),
            accounts_is_owner: flag(record.accounts_is_authoritative()),
            common_email: record.common_email.clone().unwrap_or_default(),
        }
    }

    pub fn fields(&self) -> [&str; 8] {
        [
            self.account_id.as_str(),
            self.management_id.as_str(),
            self.tax_id_management.as_str(),
            self.tax_id_accounts.as_str(),
            self.exists_management,
            self.exists_accounts,
            self.accounts_is_owner,
            self.common_email.as_str(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idrecon_recon::{Category, DivergenceRecord};

    fn classified(exists_m: bool, exists_a: bool, email: Option<&str>, category: Category) -> ClassifiedRecord {
        ClassifiedRecord {
            record: DivergenceRecord::from_raw("acc-1", "sso-1", "12345678909", "987.654.321-00"),
            exists_in_management_side: exists_m,
            exists_in_accounts_side: exists_a,
            common_email: email.map(str::to_string),
            category,
        }
    }

    #[test]
    fn columns_follow_header_order() {
        let row = ReportRow::from_classified(
            &classified(true, true, Some("a@x.com"), Category::EmailMatch),
            &ReportOptions::default(),
        );
        assert_eq!(
            row.fields(),
            ["acc-1", "sso-1", "987.654.321-00", "12345678909", "YES", "YES", "YES", "a@x.com"]
        );
    }

    #[test]
    fn owner_flag_mirrors_accounts_side() {
        let row = ReportRow::from_classified(
            &classified(true, false, None, Category::OneMissing),
            &ReportOptions::default(),
        );
        assert_eq!(row.exists_management, "YES");
        assert_eq!(row.exists_accounts, "NO");
        assert_eq!(row.accounts_is_owner, "NO");
        assert_eq!(row.common_email, "");
    }

    #[test]
    fn masking_rewrites_tax_ids() {
        let options = ReportOptions { mask_tax_ids: true };
        let row = ReportRow::from_classified(&classified(false, false, None, Category::BothMissing), &options);
        assert_eq!(row.tax_id_accounts, "123.456.789-09");
        assert_eq!(row.tax_id_management, "987.654.321-00");
    }
}
