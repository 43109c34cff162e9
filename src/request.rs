//! Typed cut and transform requests built from loosely-typed JSON bodies.
//!
//! Checks run in a fixed order and stop at the first failure, so a body with
//! several problems always reports the same code.

use serde_json::Value;
use std::fmt;

use crate::command::TargetTorsion;
use crate::constants::codes;
use crate::pdb_format;

/// Where the structure to cut comes from
#[derive(Debug, Clone, PartialEq)]
pub enum StructureSource {
    /// Fetched by the tool from the structure database
    Code(String),
    /// Supplied in the request body, already format-checked
    Upload(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CutRequest {
    pub name: Option<String>,
    pub source: StructureSource,
    pub chain: String,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub segment_id: String,
    pub target_phi: Vec<TargetTorsion>,
    pub target_psi: Vec<TargetTorsion>,
    pub constrained_phi: Vec<u32>,
    pub constrained_psi: Vec<u32>,
    /// Only a JSON boolean counts; anything else is treated as absent
    pub show_on_main: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    NoStructureSource,
    NoChain,
    InvalidRange,
    NoSegmentId,
    BadTargetTorsions,
    BadConstrainedTorsions,
    BadStructureFormat,
}

impl RequestError {
    pub fn code(&self) -> i64 {
        match self {
            RequestError::NoStructureSource => codes::NO_STRUCTURE_SOURCE,
            RequestError::NoChain => codes::NO_CHAIN,
            RequestError::InvalidRange => codes::INVALID_RANGE,
            RequestError::NoSegmentId => codes::NO_SEGMENT_ID,
            RequestError::BadTargetTorsions => codes::BAD_TARGET_TORSIONS,
            RequestError::BadConstrainedTorsions => codes::BAD_CONSTRAINED_TORSIONS,
            RequestError::BadStructureFormat => codes::BAD_STRUCTURE_FORMAT,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RequestError::NoStructureSource => "no structure code or uploaded structure",
            RequestError::NoChain => "no chain",
            RequestError::InvalidRange => "start and end must be integers with 1 <= start < end <= 9999",
            RequestError::NoSegmentId => "no segment id",
            RequestError::BadTargetTorsions => "malformed target torsions",
            RequestError::BadConstrainedTorsions => "malformed constrained torsions",
            RequestError::BadStructureFormat => "malformed uploaded structure",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for RequestError {}

/// A field that is present, a string, and not zero-length
pub fn non_empty_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// An integral JSON number; `2.0` counts, `2.5` does not
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(v) = value.as_i64() {
        return Some(v);
    }
    let v = value.as_f64()?;
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn as_positive_index(value: &Value) -> Option<u32> {
    as_integer(value)
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
}

/// The PDB residue sequence number field is four columns wide
const MAX_RESIDUE: i64 = 9999;

fn parse_range(body: &Value) -> Option<(i64, i64)> {
    let start = body.get("start")?;
    let end = body.get("end")?;
    // Both must be numbers before the integer check, so "1" is rejected
    if !start.is_number() || !end.is_number() {
        return None;
    }
    let (start, end) = (as_integer(start)?, as_integer(end)?);
    if start >= 1 && start < end && end <= MAX_RESIDUE {
        Some((start, end))
    } else {
        None
    }
}

fn parse_target_torsions(value: Option<&Value>) -> Option<Vec<TargetTorsion>> {
    value?
        .as_array()?
        .iter()
        .map(|item| {
            let res = as_positive_index(item.get("res")?)?;
            let target = item.get("targetTors")?.as_f64()?;
            Some(TargetTorsion { res, target })
        })
        .collect()
}

fn parse_constrained_torsions(value: Option<&Value>) -> Option<Vec<u32>> {
    value?.as_array()?.iter().map(as_positive_index).collect()
}

impl CutRequest {
    pub fn from_json(body: &Value) -> Result<Self, RequestError> {
        let upload = body.get("ownPdbObject").filter(|v| !v.is_null());
        let code = non_empty_str(body, "pdbCode").map(str::trim);

        if code.is_none() && upload.and_then(Value::as_str).map_or(true, str::is_empty) {
            return Err(RequestError::NoStructureSource);
        }

        let chain = non_empty_str(body, "chain").ok_or(RequestError::NoChain)?;
        let (start, end) = parse_range(body).ok_or(RequestError::InvalidRange)?;

        let name = body
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let source = match upload {
            Some(upload) => {
                let text = upload.as_str().ok_or(RequestError::BadStructureFormat)?;
                if !pdb_format::is_valid_structure(text) {
                    return Err(RequestError::BadStructureFormat);
                }
                StructureSource::Upload(text.to_string())
            }
            None => match code.filter(|c| !c.is_empty()) {
                Some(code) => StructureSource::Code(code.to_string()),
                None => return Err(RequestError::NoStructureSource),
            },
        };

        Ok(CutRequest {
            name,
            source,
            chain: chain.trim().to_string(),
            start,
            end,
        })
    }
}

impl TransformRequest {
    pub fn from_json(body: &Value) -> Result<Self, RequestError> {
        let segment_id = non_empty_str(body, "segmentId").ok_or(RequestError::NoSegmentId)?;

        let target_psi = parse_target_torsions(body.get("targetPsi"));
        let target_phi = parse_target_torsions(body.get("targetPhi"));
        let (target_phi, target_psi) = match (target_phi, target_psi) {
            (Some(phi), Some(psi)) => (phi, psi),
            _ => return Err(RequestError::BadTargetTorsions),
        };

        let constrained_psi = parse_constrained_torsions(body.get("constrPsi"));
        let constrained_phi = parse_constrained_torsions(body.get("constrPhi"));
        let (constrained_phi, constrained_psi) = match (constrained_phi, constrained_psi) {
            (Some(phi), Some(psi)) => (phi, psi),
            _ => return Err(RequestError::BadConstrainedTorsions),
        };

        Ok(TransformRequest {
            segment_id: segment_id.to_string(),
            target_phi,
            target_psi,
            constrained_phi,
            constrained_psi,
            show_on_main: body.get("showOnMain").and_then(Value::as_bool),
        })
    }
}
