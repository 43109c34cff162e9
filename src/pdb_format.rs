//! Structural checks on PDB text supplied by users.
//!
//! Only `ATOM` records are inspected. Every other record type passes through
//! untouched, which keeps HETATM, REMARK and friends from failing an upload.

const ATOM_MARKER: &str = "ATOM";
const ATOM_COLUMNS: usize = 12;
const MAX_RESIDUE_NAME_LEN: usize = 3;

fn is_number(token: &str) -> bool {
    token.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false)
}

/// Check that every `ATOM` record has the whitespace-separated column layout
/// the external tool expects, and that at least one such record exists.
pub fn is_valid_structure(text: &str) -> bool {
    let mut atom_count = 0usize;

    for line in text.split('\n') {
        let columns: Vec<&str> = line.split_whitespace().collect();

        if columns.first() != Some(&ATOM_MARKER) {
            continue;
        }
        atom_count += 1;

        if columns.len() != ATOM_COLUMNS {
            return false;
        }

        // Serial number
        if !is_number(columns[1]) {
            return false;
        }

        if columns[3].chars().count() > MAX_RESIDUE_NAME_LEN {
            return false;
        }

        // Residue sequence number, x, y, z, occupancy, temperature factor
        if !columns[5..11].iter().all(|c| is_number(c)) {
            return false;
        }
    }

    atom_count > 0
}

/// Display name taken from the first `TITLE` record: the text after the first
/// colon, minus its final character, trimmed.
pub fn title_name(text: &str) -> Option<String> {
    let line = text
        .split('\n')
        .map(str::trim)
        .find(|line| line.starts_with("TITLE"))?;

    let after_colon = line.split(':').nth(1)?;
    let mut chars = after_colon.chars();
    chars.next_back();
    let name = chars.as_str().trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
