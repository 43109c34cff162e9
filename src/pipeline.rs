//! Cut and transform flows: id, artifact paths, tool run, parse, store.
//!
//! Nothing is written to the database until every tool output has been read,
//! and the runner has already removed those outputs by then. A failed insert
//! therefore loses the artifacts; the request fails with a generic error.

use log::info;
use std::sync::Arc;

use crate::command::ToolOperation;
use crate::error::ApiError;
use crate::ident::IdGenerator;
use crate::pdb_format;
use crate::request::{CutRequest, StructureSource, TransformRequest};
use crate::store::{PdbStore, Segment, Transform};
use crate::tool::{ArtifactPaths, TempInput, ToolJob, ToolOutput, ToolRunner};
use crate::torsions::{parse_torsions, parse_transform_meta, MetaBlob, TorsionBlob};

/// Result of a successful cut
#[derive(Debug, Clone, PartialEq)]
pub struct CutOutcome {
    pub segment_id: String,
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct Pipeline {
    store: PdbStore,
    runner: ToolRunner,
    ids: Arc<dyn IdGenerator>,
    paths: ArtifactPaths,
}

fn take_output(output: &mut ToolOutput, path: &std::path::Path) -> Result<String, ApiError> {
    output
        .take(path)
        .ok_or_else(|| ApiError::Internal(format!("Tool output '{}' was not collected", path.display())))
}

impl Pipeline {
    pub fn new(
        store: PdbStore,
        runner: ToolRunner,
        ids: Arc<dyn IdGenerator>,
        paths: ArtifactPaths,
    ) -> Self {
        Self {
            store,
            runner,
            ids,
            paths,
        }
    }

    pub fn store(&self) -> &PdbStore {
        &self.store
    }

    /// Cut a segment out of a database structure or an uploaded one and store it
    pub async fn cut(&self, request: CutRequest, owner: Option<i64>) -> Result<CutOutcome, ApiError> {
        let id = self.ids.generate();
        let pdb_out = self.paths.pdb(&id);
        let torsions_out = self.paths.torsions(&id);
        let names_out = self.paths.names(&id);
        let error_out = self.paths.error(&id);

        let mut required = vec![pdb_out.clone(), torsions_out.clone()];
        let (operation, input) = match &request.source {
            StructureSource::Code(code) => {
                // The tool only has to name the segment when the user did not
                if request.name.is_none() {
                    required.push(names_out.clone());
                }
                let operation = ToolOperation::CutByCode {
                    protein_code: code.clone(),
                    chain: request.chain.clone(),
                    start: request.start,
                    end: request.end,
                    pdb_out: pdb_out.clone(),
                    torsions_out: torsions_out.clone(),
                    error_out: error_out.clone(),
                    names_out: names_out.clone(),
                };
                (operation, None)
            }
            StructureSource::Upload(text) => {
                let input_path = self.paths.uploaded(&id);
                let operation = ToolOperation::CutByUpload {
                    input: input_path.clone(),
                    chain: request.chain.clone(),
                    start: request.start,
                    end: request.end,
                    pdb_out: pdb_out.clone(),
                    torsions_out: torsions_out.clone(),
                    error_out: error_out.clone(),
                };
                let input = TempInput {
                    path: input_path,
                    contents: text.clone(),
                };
                (operation, Some(input))
            }
        };

        let mut output = self
            .runner
            .run(ToolJob {
                operation,
                input,
                error_file: error_out,
                required,
                optional: vec![names_out.clone()],
            })
            .await?;

        let pdb = take_output(&mut output, &pdb_out)?;
        let torsions_text = take_output(&mut output, &torsions_out)?;
        let tool_name = output
            .take(&names_out)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let (pdb_name, shared, title) = match &request.source {
            StructureSource::Code(code) => (Some(code.clone()), true, None),
            StructureSource::Upload(text) => (None, false, pdb_format::title_name(text)),
        };
        let name = request.name.or(tool_name).or(title);

        let torsions = serde_json::to_string(&TorsionBlob {
            tors: parse_torsions(torsions_text.trim(), request.start),
        })?;

        let segment = Segment {
            id: id.clone(),
            pdb_name,
            name: name.clone(),
            chain: request.chain,
            start: request.start,
            end: request.end,
            torsions,
            shared,
            show_on_main: false,
            pdb,
            owner,
        };
        self.store.create_segment(&segment).await?;
        info!(
            "Stored segment {} (chain {}, {}-{})",
            id, segment.chain, segment.start, segment.end
        );

        Ok(CutOutcome {
            segment_id: id,
            name,
        })
    }

    /// Drive a stored segment towards the requested torsions and store the result.
    /// Returns the new transform id.
    pub async fn transform(
        &self,
        request: TransformRequest,
        owner: Option<i64>,
    ) -> Result<String, ApiError> {
        let segment = self
            .store
            .find_segment(&request.segment_id)
            .await?
            .ok_or(ApiError::SegmentNotFound)?;

        let date_created = chrono::Utc::now().timestamp_millis();
        let id = self.ids.generate();
        let input_path = self.paths.pdb(&id);
        let pdb_out = self.paths.transformed_pdb(&id);
        let meta_out = self.paths.transform_meta(&id);
        let error_out = self.paths.error(&id);

        let operation = ToolOperation::Transform {
            input: input_path.clone(),
            pdb_out: pdb_out.clone(),
            target_phi: request.target_phi,
            target_psi: request.target_psi,
            constrained_phi: request.constrained_phi,
            constrained_psi: request.constrained_psi,
            error_out: error_out.clone(),
            meta_out: meta_out.clone(),
        };

        let mut output = self
            .runner
            .run(ToolJob {
                operation,
                input: Some(TempInput {
                    path: input_path,
                    contents: segment.pdb.clone(),
                }),
                error_file: error_out,
                required: vec![pdb_out.clone(), meta_out.clone()],
                optional: Vec::new(),
            })
            .await?;

        let pdb = take_output(&mut output, &pdb_out)?;
        let meta_text = take_output(&mut output, &meta_out)?;
        let meta = serde_json::to_string(&MetaBlob {
            transform_meta: parse_transform_meta(meta_text.trim(), segment.start),
        })?;

        // Only private segments may keep their transforms off the main page
        let show_on_main = match request.show_on_main {
            Some(flag) if !segment.shared => flag,
            _ => true,
        };

        let transform = Transform {
            id: id.clone(),
            name: Some(date_created.to_string()),
            shared: true,
            show_on_main,
            meta,
            pdb: pdb.trim().to_string(),
            date_created,
            segment_id: segment.id,
            owner,
        };
        self.store.create_transform(&transform).await?;
        info!("Stored transform {} of segment {}", id, transform.segment_id);

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use crate::db::{create_test_connection_in_temporary_file, init_database_schema};
    use crate::ident::SequentialIds;
    use crate::tool::{ArtifactFs, FnLauncher, MemoryFs};
    use std::io;
    use std::path::{Path, PathBuf};

    const UPLOAD: &str = "HEADER    TEST\nTITLE     MOLECULE: LYSOZYME;\nATOM      1  N   ALA A   1      11.104   6.134  -6.504  1.00  0.00           N\n";

    async fn pipeline_with<F>(tool: F) -> (Pipeline, MemoryFs, tempfile::TempDir)
    where
        F: Fn(&MemoryFs, &str) -> io::Result<bool> + Send + Sync + 'static,
    {
        let (pool, guard) = create_test_connection_in_temporary_file().await.unwrap();
        init_database_schema(&pool).await.unwrap();

        let fs = MemoryFs::new();
        let tool_fs = fs.clone();
        let runner = ToolRunner::new(
            ToolConfig {
                dir: PathBuf::from("/opt/tool"),
                executable: "matlab".to_string(),
            },
            Arc::new(FnLauncher(move |cmd: &str| tool(&tool_fs, cmd))),
            Arc::new(fs.clone()),
        );
        let pipeline = Pipeline::new(
            PdbStore::new(pool),
            runner,
            Arc::new(SequentialIds::new("id")),
            ArtifactPaths::new("/work", "/errors"),
        );
        (pipeline, fs, guard)
    }

    fn write(fs: &MemoryFs, path: &str, contents: &str) -> io::Result<()> {
        fs.write(Path::new(path), contents)
    }

    fn cut_by_code(name: Option<&str>) -> CutRequest {
        CutRequest {
            name: name.map(str::to_string),
            source: StructureSource::Code("1adg".to_string()),
            chain: "A".to_string(),
            start: 290,
            end: 301,
        }
    }

    #[tokio::test]
    async fn test_cut_by_code_uses_tool_name() {
        let (pipeline, fs, _guard) = pipeline_with(|fs, cmd| {
            assert!(cmd.contains("Segment_cut('1adg', 'A', 290, 301"));
            write(fs, "/work/id1.pdb", "ATOM segment")?;
            write(fs, "/work/id1.tors", "-60\n-45\n\n")?;
            write(fs, "/work/id1.names", "ALCOHOL DEHYDROGENASE\n")?;
            Ok(true)
        })
        .await;

        let outcome = pipeline.cut(cut_by_code(None), Some(3)).await.unwrap();
        assert_eq!(outcome.segment_id, "id1");
        assert_eq!(outcome.name.as_deref(), Some("ALCOHOL DEHYDROGENASE"));

        let stored = pipeline.store().find_segment("id1").await.unwrap().unwrap();
        assert_eq!(stored.pdb_name.as_deref(), Some("1adg"));
        assert!(stored.shared);
        assert_eq!(stored.owner, Some(3));
        assert_eq!(stored.pdb, "ATOM segment");

        let blob: TorsionBlob = serde_json::from_str(&stored.torsions).unwrap();
        assert_eq!(blob.tors.len(), 2);
        assert_eq!(blob.tors[0].num, 290);
        assert_eq!(blob.tors[1].num, 291);

        assert!(fs.paths().is_empty());
    }

    #[tokio::test]
    async fn test_cut_by_code_requires_names_file_without_user_name() {
        let (pipeline, _fs, _guard) = pipeline_with(|fs, _| {
            write(fs, "/work/id1.pdb", "ATOM")?;
            write(fs, "/work/id1.tors", "1")?;
            Ok(true)
        })
        .await;

        let err = pipeline.cut(cut_by_code(None), None).await.unwrap_err();
        assert!(matches!(err, ApiError::Tool(_)));
        assert_eq!(err.code(), 0);
        assert!(pipeline.store().find_segment("id1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_name_wins() {
        let (pipeline, _fs, _guard) = pipeline_with(|fs, _| {
            write(fs, "/work/id1.pdb", "ATOM")?;
            write(fs, "/work/id1.tors", "1")?;
            write(fs, "/work/id1.names", "TOOL NAME")?;
            Ok(true)
        })
        .await;

        let outcome = pipeline.cut(cut_by_code(Some("mine")), None).await.unwrap();
        assert_eq!(outcome.name.as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn test_cut_by_upload_is_private_and_named_from_title() {
        let (pipeline, fs, _guard) = pipeline_with(|fs, cmd| {
            assert!(cmd.contains("Segment_cut_own_pdb('/work/id1.custom'"));
            assert!(fs.exists(Path::new("/work/id1.custom")));
            write(fs, "/work/id1.pdb", "ATOM cut")?;
            write(fs, "/work/id1.tors", "10")?;
            Ok(true)
        })
        .await;

        let request = CutRequest {
            name: None,
            source: StructureSource::Upload(UPLOAD.to_string()),
            chain: "A".to_string(),
            start: 1,
            end: 2,
        };
        let outcome = pipeline.cut(request, None).await.unwrap();
        assert_eq!(outcome.name.as_deref(), Some("LYSOZYME"));

        let stored = pipeline.store().find_segment("id1").await.unwrap().unwrap();
        assert!(!stored.shared);
        assert_eq!(stored.pdb_name, None);
        assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());
    }

    #[tokio::test]
    async fn test_tool_error_code_is_surfaced() {
        let (pipeline, _fs, _guard) = pipeline_with(|fs, _| {
            write(fs, "/errors/id1.error", "1203")?;
            Ok(true)
        })
        .await;

        let err = pipeline.cut(cut_by_code(Some("x")), None).await.unwrap_err();
        assert_eq!(err.code(), 1203);
    }

    async fn seed_segment(pipeline: &Pipeline, shared: bool) {
        seed_segment_with_id(pipeline, "seg", shared).await;
    }

    async fn seed_segment_with_id(pipeline: &Pipeline, id: &str, shared: bool) {
        let segment = Segment {
            id: id.to_string(),
            pdb_name: None,
            name: None,
            chain: "A".to_string(),
            start: 100,
            end: 110,
            torsions: r#"{"tors":[]}"#.to_string(),
            shared,
            show_on_main: false,
            pdb: "ATOM source".to_string(),
            owner: Some(1),
        };
        pipeline.store().create_segment(&segment).await.unwrap();
    }

    fn transform_request(show_on_main: Option<bool>) -> TransformRequest {
        TransformRequest {
            segment_id: "seg".to_string(),
            target_phi: vec![],
            target_psi: vec![],
            constrained_phi: vec![],
            constrained_psi: vec![],
            show_on_main,
        }
    }

    fn transform_tool(fs: &MemoryFs, cmd: &str) -> io::Result<bool> {
        assert!(cmd.contains("Loop_Modeller_Transform('/work/id1.pdb', '/work/id1_result.pdb'"));
        assert_eq!(fs.read_to_string(Path::new("/work/id1.pdb"))?, "ATOM source");
        write(fs, "/work/id1_result.pdb", "\nATOM moved\n")?;
        write(fs, "/work/id1_transform.meta", "1 -57.2 -57.0 0.2\n2 118 120 -2\n")?;
        Ok(true)
    }

    #[tokio::test]
    async fn test_transform_stores_result() {
        let (pipeline, fs, _guard) = pipeline_with(transform_tool).await;
        seed_segment(&pipeline, true).await;

        let id = pipeline.transform(transform_request(Some(false)), Some(1)).await.unwrap();
        assert_eq!(id, "id1");

        let stored = pipeline.store().find_transform("id1").await.unwrap().unwrap();
        assert_eq!(stored.pdb, "ATOM moved");
        assert_eq!(stored.segment_id, "seg");
        assert_eq!(stored.name, Some(stored.date_created.to_string()));
        // Shared segment: the flag is ignored
        assert!(stored.show_on_main);

        let meta: MetaBlob = serde_json::from_str(&stored.meta).unwrap();
        assert_eq!(meta.transform_meta[0].num, 100);
        assert_eq!(meta.transform_meta[1].deviation.as_deref(), Some("-2"));

        assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());
    }

    #[tokio::test]
    async fn test_private_segment_honours_show_on_main() {
        let (pipeline, _fs, _guard) = pipeline_with(transform_tool).await;
        seed_segment(&pipeline, false).await;

        pipeline.transform(transform_request(Some(false)), None).await.unwrap();
        let stored = pipeline.store().find_transform("id1").await.unwrap().unwrap();
        assert!(!stored.show_on_main);
    }

    #[tokio::test]
    async fn test_transform_of_missing_segment() {
        let (pipeline, _fs, _guard) = pipeline_with(|_, _| panic!("tool must not run")).await;
        let err = pipeline.transform(transform_request(None), None).await.unwrap_err();
        assert!(matches!(err, ApiError::SegmentNotFound));
    }

    #[tokio::test]
    async fn test_cut_insert_failure_keeps_existing_row() {
        let (pipeline, fs, _guard) = pipeline_with(|fs, _| {
            write(fs, "/work/id1.pdb", "ATOM new cut")?;
            write(fs, "/work/id1.tors", "1\n2")?;
            Ok(true)
        })
        .await;
        // The next generated id is already taken
        seed_segment_with_id(&pipeline, "id1", true).await;

        let err = pipeline.cut(cut_by_code(Some("dup")), Some(7)).await.unwrap_err();
        assert!(matches!(err, ApiError::Store(_)), "{}", err);
        assert_eq!(err.code(), 0);
        assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());

        let stored = pipeline.store().find_segment("id1").await.unwrap().unwrap();
        assert_eq!(stored.pdb, "ATOM source");
        assert_eq!((stored.start, stored.end), (100, 110));
        assert_eq!(stored.owner, Some(1));
        assert_eq!(stored.name, None);
    }

    #[tokio::test]
    async fn test_transform_insert_failure_keeps_existing_row() {
        let (pipeline, fs, _guard) = pipeline_with(transform_tool).await;
        seed_segment(&pipeline, true).await;
        let existing = Transform {
            id: "id1".to_string(),
            name: Some("earlier".to_string()),
            shared: true,
            show_on_main: false,
            meta: r#"{"transformMeta":[]}"#.to_string(),
            pdb: "ATOM earlier".to_string(),
            date_created: 1,
            segment_id: "seg".to_string(),
            owner: Some(1),
        };
        pipeline.store().create_transform(&existing).await.unwrap();

        let err = pipeline.transform(transform_request(None), Some(2)).await.unwrap_err();
        assert!(matches!(err, ApiError::Store(_)), "{}", err);
        assert_eq!(err.code(), 0);
        assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());

        let stored = pipeline.store().find_transform("id1").await.unwrap().unwrap();
        assert_eq!(stored.pdb, "ATOM earlier");
        assert_eq!(stored.name.as_deref(), Some("earlier"));
        assert_eq!(stored.owner, Some(1));
        assert!(!stored.show_on_main);
    }
}
