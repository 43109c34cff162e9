//! Parsers for the flat files the torsion tool writes.
//!
//! The tool emits one angle per line, alternating psi and phi, starting with
//! psi. A line at position `p` belongs to residue `ceil(p / 2) + offset`.
//! Blank lines are skipped but still count towards `p`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleKind {
    Psi,
    Phi,
}

impl AngleKind {
    fn for_position(position: usize) -> Self {
        if position % 2 == 0 {
            AngleKind::Psi
        } else {
            AngleKind::Phi
        }
    }
}

/// One backbone dihedral of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Torsion {
    pub num: i64,
    #[serde(rename = "type")]
    pub kind: AngleKind,
    pub value: String,
}

/// Outcome of driving one dihedral towards its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformMeta {
    pub num: i64,
    #[serde(rename = "type")]
    pub kind: AngleKind,
    pub result_torsion: Option<String>,
    pub requested_torsion: Option<String>,
    pub deviation: Option<String>,
}

/// Serialized form of a segment's torsions (`{"tors": [...]}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorsionBlob {
    pub tors: Vec<Torsion>,
}

/// Serialized form of a transform's metadata (`{"transformMeta": [...]}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaBlob {
    pub transform_meta: Vec<TransformMeta>,
}

fn residue_index(position: usize, offset: i64) -> i64 {
    offset.saturating_add(position.div_ceil(2) as i64)
}

/// Non-blank lines paired with their position before skipping
fn positioned_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split('\n')
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
}

/// Parse a torsion file: one value per line
pub fn parse_torsions(text: &str, offset: i64) -> Vec<Torsion> {
    positioned_lines(text)
        .map(|(position, line)| Torsion {
            num: residue_index(position, offset),
            kind: AngleKind::for_position(position),
            value: line.to_string(),
        })
        .collect()
}

/// Parse a transform metadata file: whitespace-separated columns where
/// column 0 (initial value) is ignored and columns 1-3 are the resulting,
/// requested and deviation values
pub fn parse_transform_meta(text: &str, offset: i64) -> Vec<TransformMeta> {
    positioned_lines(text)
        .map(|(position, line)| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            let column = |i: usize| columns.get(i).map(|v| v.to_string());
            TransformMeta {
                num: residue_index(position, offset),
                kind: AngleKind::for_position(position),
                result_torsion: column(1),
                requested_torsion: column(2),
                deviation: column(3),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternation_with_blank_line() {
        let parsed = parse_torsions("10\n20\n\n30", 0);
        assert_eq!(
            parsed,
            vec![
                Torsion { num: 0, kind: AngleKind::Psi, value: "10".into() },
                Torsion { num: 1, kind: AngleKind::Phi, value: "20".into() },
                // Position 3 after the skipped blank: ceil(3/2) = 2, odd => phi
                Torsion { num: 2, kind: AngleKind::Phi, value: "30".into() },
            ]
        );
    }

    #[test]
    fn test_offset_shifts_indices() {
        let parsed = parse_torsions("-60.1\n-45.2\n-61.0\n-44.9", 290);
        let nums: Vec<i64> = parsed.iter().map(|t| t.num).collect();
        let kinds: Vec<AngleKind> = parsed.iter().map(|t| t.kind).collect();
        assert_eq!(nums, vec![290, 291, 291, 292]);
        assert_eq!(
            kinds,
            vec![AngleKind::Psi, AngleKind::Phi, AngleKind::Psi, AngleKind::Phi]
        );
    }

    #[test]
    fn test_offset_near_max_saturates() {
        let parsed = parse_torsions("1\n2\n3\n4", i64::MAX - 1);
        let nums: Vec<i64> = parsed.iter().map(|t| t.num).collect();
        assert_eq!(nums, vec![i64::MAX - 1, i64::MAX, i64::MAX, i64::MAX]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_torsions("", 5).is_empty());
        assert!(parse_transform_meta("", 5).is_empty());
    }

    #[test]
    fn test_meta_columns() {
        let text = "1.0\t-57.2\t-57.0\t0.2\n2.0  118.1  120.0  -1.9\n";
        let parsed = parse_transform_meta(text, 10);
        assert_eq!(parsed.len(), 2);

        assert_eq!(parsed[0].num, 10);
        assert_eq!(parsed[0].kind, AngleKind::Psi);
        assert_eq!(parsed[0].result_torsion.as_deref(), Some("-57.2"));
        assert_eq!(parsed[0].requested_torsion.as_deref(), Some("-57.0"));
        assert_eq!(parsed[0].deviation.as_deref(), Some("0.2"));

        assert_eq!(parsed[1].num, 11);
        assert_eq!(parsed[1].kind, AngleKind::Phi);
        assert_eq!(parsed[1].deviation.as_deref(), Some("-1.9"));
    }

    #[test]
    fn test_meta_short_line_leaves_missing_columns_empty() {
        let parsed = parse_transform_meta("1.0 2.0", 0);
        assert_eq!(parsed[0].result_torsion.as_deref(), Some("2.0"));
        assert_eq!(parsed[0].requested_torsion, None);
        assert_eq!(parsed[0].deviation, None);
    }

    #[test]
    fn test_blob_json_shape() {
        let blob = MetaBlob {
            transform_meta: parse_transform_meta("0 1 2 3", 0),
        };
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["transformMeta"][0]["type"], "psi");
        assert_eq!(json["transformMeta"][0]["resultTorsion"], "1");
        assert_eq!(json["transformMeta"][0]["requestedTorsion"], "2");
        assert_eq!(json["transformMeta"][0]["deviation"], "3");

        let tors = TorsionBlob { tors: parse_torsions("5", 0) };
        let json = serde_json::to_value(&tors).unwrap();
        assert_eq!(json["tors"][0]["num"], 0);
        assert_eq!(json["tors"][0]["value"], "5");
    }
}
