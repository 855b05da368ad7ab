//! Canonical tax-ID keys.
//!
//! A canonical key is the tax ID with every non-digit character removed. It is
//! the only thing ever compared across stores. The same rule runs inside the
//! source queries as `regexp_replace(cpf_cnpj, '[^0-9]', '', 'g')`.

/// Normalize an optional tax ID.
///
/// `None` stays `None`. Anything else maps to the ASCII digits it contains,
/// which may be an empty string (`""` → `Some("")`, `"abc"` → `Some("")`).
pub fn normalize_tax_id(input: Option<&str>) -> Option<String> {
    input.map(canonical_key)
}

/// Digits-only form of `raw`. Empty when `raw` has no digits.
pub fn canonical_key(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxIdKind {
    /// Individual taxpayer (11 digits).
    Cpf,
    /// Legal entity (14 digits).
    Cnpj,
    Unknown,
}

impl TaxIdKind {
    pub fn of(key: &str) -> Self {
        match key.len() {
            11 => Self::Cpf,
            14 => Self::Cnpj,
            _ => Self::Unknown,
        }
    }
}

/// Render the usual display mask for a tax ID.
///
/// CPF: `000.000.000-00`, CNPJ: `00.000.000/0000-00`. Values of any other
/// length come back as their canonical digits.
pub fn format_tax_id(raw: &str) -> String {
    let c = canonical_key(raw);
    match TaxIdKind::of(&c) {
        TaxIdKind::Cpf => format!("{}.{}.{}-{}", &c[..3], &c[3..6], &c[6..9], &c[9..]),
        TaxIdKind::Cnpj => format!(
            "{}.{}.{}/{}-{}",
            &c[..2],
            &c[2..5],
            &c[5..8],
            &c[8..12],
            &c[12..]
        ),
        TaxIdKind::Unknown => c,
    }
}
