//! Builds the shell command that drives the external torsion tool.
//!
//! String arguments are interpolated inside single-quoted literals of the
//! tool's own language, so every `'` is doubled. Nothing else is sanitised:
//! paths come from our own id generator, but chain names and protein codes
//! come straight from the request.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::ToolConfig;

/// A residue index paired with the torsion value requested for it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetTorsion {
    pub res: u32,
    pub target: f64,
}

/// One invocation of the external tool with all of its typed parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOperation {
    /// Fetch a structure by database code and cut a segment from it
    CutByCode {
        protein_code: String,
        chain: String,
        start: i64,
        end: i64,
        pdb_out: PathBuf,
        torsions_out: PathBuf,
        error_out: PathBuf,
        names_out: PathBuf,
    },
    /// Cut a segment from a structure the user uploaded
    CutByUpload {
        input: PathBuf,
        chain: String,
        start: i64,
        end: i64,
        pdb_out: PathBuf,
        torsions_out: PathBuf,
        error_out: PathBuf,
    },
    /// Drive a stored segment towards target torsions
    Transform {
        input: PathBuf,
        pdb_out: PathBuf,
        target_phi: Vec<TargetTorsion>,
        target_psi: Vec<TargetTorsion>,
        constrained_phi: Vec<u32>,
        constrained_psi: Vec<u32>,
        error_out: PathBuf,
        meta_out: PathBuf,
    },
}

/// Double every single quote
pub fn escape_quotes(value: &str) -> String {
    value.replace('\'', "''")
}

fn escape_path(path: &Path) -> String {
    escape_quotes(&path.to_string_lossy())
}

/// `[res target;res target]`, or `[]` when empty
pub fn target_torsion_list(torsions: &[TargetTorsion]) -> String {
    let pairs: Vec<String> = torsions
        .iter()
        .map(|t| format!("{} {}", t.res, t.target))
        .collect();
    format!("[{}]", pairs.join(";"))
}

/// `[a b c ]`, or `[]` when empty
pub fn number_list(values: &[u32]) -> String {
    let mut out = String::from("[");
    for value in values {
        let _ = write!(out, "{} ", value);
    }
    out.push(']');
    out
}

impl ToolOperation {
    /// The function call understood by the tool, without the launcher wrapper
    pub fn call(&self) -> String {
        match self {
            ToolOperation::CutByCode {
                protein_code,
                chain,
                start,
                end,
                pdb_out,
                torsions_out,
                error_out,
                names_out,
            } => format!(
                "Segment_cut('{}', '{}', {}, {},'{}', '{}', '{}', '{}')",
                escape_quotes(protein_code),
                escape_quotes(chain),
                start,
                end,
                escape_path(pdb_out),
                escape_path(torsions_out),
                escape_path(error_out),
                escape_path(names_out),
            ),
            ToolOperation::CutByUpload {
                input,
                chain,
                start,
                end,
                pdb_out,
                torsions_out,
                error_out,
            } => format!(
                "Segment_cut_own_pdb('{}', '{}', {}, {},'{}', '{}', '{}')",
                escape_path(input),
                escape_quotes(chain),
                start,
                end,
                escape_path(pdb_out),
                escape_path(torsions_out),
                escape_path(error_out),
            ),
            ToolOperation::Transform {
                input,
                pdb_out,
                target_phi,
                target_psi,
                constrained_phi,
                constrained_psi,
                error_out,
                meta_out,
            } => format!(
                "Loop_Modeller_Transform('{}', '{}', {}, {}, {}, {}, '{}', '{}')",
                escape_path(input),
                escape_path(pdb_out),
                target_torsion_list(target_phi),
                target_torsion_list(target_psi),
                number_list(constrained_phi),
                number_list(constrained_psi),
                escape_path(error_out),
                escape_path(meta_out),
            ),
        }
    }

    /// Full shell command: change into the tool directory and run the call
    /// headless, making sure the interpreter exits even if the call throws
    pub fn command(&self, tool: &ToolConfig) -> String {
        format!(
            "cd {} && {} -nodisplay -nosplash -r \"try; {}; catch exception; disp('exception'); end; exit;\"",
            tool.dir.display(),
            tool.executable,
            self.call()
        )
    }
}
