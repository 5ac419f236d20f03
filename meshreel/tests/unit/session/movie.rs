use super::*;

use crate::foundation::error::{ConfigError, EnvironmentError, PlanError};
use crate::mesh::graph::MeshGraph;
use crate::plan::traversal::TraversalTransform;
use crate::scene::atlas::InMemoryAtlas;
use crate::scene::cifti::BrainModels;
use crate::testkit::{chain_mesh, gifti_ascii, left, scratch_dir, two_islands};
use crate::tools::runner::InvocationError;
use crate::tools::scripted::ScriptedRunner;

const SCENE: &str = r#"<SceneFile Version="3">
 <Scene Index="0" Type="SCENE_TYPE_FULL">
  <Name>movie</Name>
  <Object Type="class" Class="BrainStructure" Name="b0">
   <Object Type="enumeratedType" Name="m_structure">CORTEX_LEFT</Object>
   <Object Type="pathName" Name="primaryAnatomicalSurface">L.surf.gii</Object>
  </Object>
  <Object Type="integer" Name="m_rowIndex">0</Object>
  <Object Type="integer" Name="m_surfaceVertexIndex">0</Object>
 </Scene>
</SceneFile>"#;

struct Fixture {
    dir: PathBuf,
    request: MovieRequest,
}

impl Fixture {
    fn new(name: &str, plan: PlanRequest) -> Self {
        let dir = scratch_dir("movie", name);
        std::fs::write(dir.join("movie.scene"), SCENE).unwrap();
        std::fs::write(dir.join("L.surf.gii"), gifti_ascii(&chain_mesh())).unwrap();
        let request = MovieRequest::new(
            dir.join("movie.scene"),
            "movie",
            dir.join("out").join("movie.mp4"),
            plan,
        );
        Self { dir, request }
    }

    fn opts(&self) -> MovieOpts {
        MovieOpts {
            width: 8,
            height: 6,
            workers: 2,
            work_root: Some(self.dir.join("work")),
            ..MovieOpts::default()
        }
    }

    fn session(&self, runner: &Arc<ScriptedRunner>, opts: MovieOpts) -> MovieSession {
        MovieSession::new(tools(), runner.clone(), opts)
    }

    fn work_is_clean(&self) -> bool {
        let work = self.dir.join("work");
        !work.exists() || std::fs::read_dir(work).unwrap().count() == 0
    }
}

fn tools() -> ToolPaths {
    ToolPaths::new("/opt/workbench/wb_command", "/opt/ffmpeg/ffmpeg")
}

fn chain_atlas() -> InMemoryAtlas {
    InMemoryAtlas::new()
        .with_rows(BrainModels::from_surfaces([(left(), 100, (0..100).collect())]))
        .with_graph(left(), MeshGraph::from_mesh(&chain_mesh()).unwrap())
}

fn fail_frame(index: usize) -> Arc<ScriptedRunner> {
    let suffix = format!("frame{index:09}.scene");
    Arc::new(ScriptedRunner::emulating_tools_except(move |inv| {
        (inv.tool == ExternalTool::Renderer
            && inv.arg_str(1).is_some_and(|scene| scene.ends_with(&suffix)))
        .then(|| InvocationError::NonZeroExit {
            code: Some(134),
            output: "segfault".to_string(),
        })
    }))
}

#[test]
fn rows_end_to_end() {
    let fx = Fixture::new("end-to-end", PlanRequest::rows(["10", "20"]));
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let session = fx.session(&runner, fx.opts());

    let report = session.generate_with_atlas(&fx.request, &chain_atlas()).unwrap();

    assert_eq!(report.frames, 4);
    assert_eq!(report.renders, 4);
    assert!(report.skipped.is_empty());
    assert_eq!(report.output, fx.request.output);
    assert!(fx.request.output.is_file());
    assert_eq!(runner.calls_for(ExternalTool::Renderer).len(), 4);
    assert_eq!(runner.calls_for(ExternalTool::Encoder).len(), 1);
    assert_eq!(
        session.history(),
        vec![
            Stage::Idle,
            Stage::Planning,
            Stage::Rendering,
            Stage::Assembling,
            Stage::Done
        ]
    );
    assert!(fx.work_is_clean());
}

#[test]
fn failed_frame_aborts_before_encoding() {
    let fx = Fixture::new("incomplete", PlanRequest::rows(["10", "20"]));
    let runner = fail_frame(2);
    let session = fx.session(&runner, fx.opts());

    let err = session
        .generate_with_atlas(&fx.request, &chain_atlas())
        .unwrap_err();

    match err {
        MeshreelError::Assembly(AssemblyError::IncompleteRender { failed, total }) => {
            assert_eq!(failed, vec![2]);
            assert_eq!(total, 4);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(runner.calls_for(ExternalTool::Renderer).len(), 4);
    assert!(runner.calls_for(ExternalTool::Encoder).is_empty());
    assert!(!fx.request.output.exists());
    assert_eq!(session.stage(), Stage::Failed);
    assert!(fx.work_is_clean());
}

#[test]
fn failures_within_the_threshold_are_skipped() {
    let fx = Fixture::new("threshold", PlanRequest::rows(["10", "20"]));
    let runner = fail_frame(1);
    let opts = MovieOpts {
        max_failed_fraction: 0.25,
        ..fx.opts()
    };

    let report = fx
        .session(&runner, opts)
        .generate_with_atlas(&fx.request, &chain_atlas())
        .unwrap();
    assert_eq!(report.skipped, vec![1]);
    assert_eq!(report.frames, 4);
    assert_eq!(runner.calls_for(ExternalTool::Encoder).len(), 1);
}

#[test]
fn planning_errors_render_nothing() {
    let fx = Fixture::new("disconnected", PlanRequest::rows(["0", "4"]));
    let atlas = InMemoryAtlas::new()
        .with_rows(BrainModels::from_surfaces([(left(), 6, (0..6).collect())]))
        .with_graph(left(), MeshGraph::from_mesh(&two_islands()).unwrap());
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let session = fx.session(&runner, fx.opts());

    let err = session.generate_with_atlas(&fx.request, &atlas).unwrap_err();
    assert!(matches!(
        err,
        MeshreelError::Planning(PlanError::Disconnected { from: 0, to: 4, .. })
    ));
    assert!(runner.calls().is_empty());
    assert_eq!(
        session.history(),
        vec![Stage::Idle, Stage::Planning, Stage::Failed]
    );
    assert!(fx.work_is_clean());
}

#[test]
fn configuration_and_environment_fail_first() {
    let fx = Fixture::new("config", PlanRequest::rows(["10", "20"]));
    let runner = Arc::new(ScriptedRunner::emulating_tools());

    let mut request = fx.request.clone();
    request.plan.transform = TraversalTransform {
        closed: true,
        reverse: true,
        loops: 1,
    };
    let err = fx
        .session(&runner, fx.opts())
        .generate_with_atlas(&request, &chain_atlas())
        .unwrap_err();
    assert!(matches!(
        err,
        MeshreelError::Configuration(ConfigError::MutuallyExclusiveFlags)
    ));

    let session = MovieSession::new(ToolPaths::default(), runner.clone(), fx.opts());
    let err = session
        .generate_with_atlas(&fx.request, &chain_atlas())
        .unwrap_err();
    assert!(matches!(
        err,
        MeshreelError::Environment(EnvironmentError::RendererNotFound { .. })
    ));
    assert_eq!(session.history(), vec![Stage::Idle, Stage::Failed]);

    let mut request = fx.request.clone();
    request.scene_name = "missing".to_string();
    let err = fx
        .session(&runner, fx.opts())
        .generate_with_atlas(&request, &chain_atlas())
        .unwrap_err();
    assert!(matches!(
        err,
        MeshreelError::Configuration(ConfigError::SceneNotFound { .. })
    ));

    let odd = MovieOpts {
        width: 7,
        ..fx.opts()
    };
    assert!(fx
        .session(&runner, odd)
        .generate_with_atlas(&fx.request, &chain_atlas())
        .is_err());
    assert!(runner.calls().is_empty());
}

#[test]
fn kept_frames_include_the_manifest() {
    let fx = Fixture::new("keep", PlanRequest::rows(["10", "20"]));
    let keep = fx.dir.join("kept");
    let runner = fail_frame(3);
    let opts = MovieOpts {
        keep_frames: Some(keep.clone()),
        ..fx.opts()
    };

    let err = fx
        .session(&runner, opts)
        .generate_with_atlas(&fx.request, &chain_atlas())
        .unwrap_err();
    assert!(matches!(
        err,
        MeshreelError::Assembly(AssemblyError::IncompleteRender { .. })
    ));

    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(keep.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["entries"].as_array().unwrap().len(), 4);
    assert_eq!(manifest["entries"][3]["outcome"]["status"], "failed");
    assert!(keep.join("frames").join("frame000000000.png").is_file());
    assert!(keep.join("scenes").join("frame000000003.scene").is_file());
    assert!(fx.work_is_clean());
}

#[test]
fn vertex_mode_reads_the_scene_surface() {
    let fx = Fixture::new("vertex-mode", PlanRequest {
        waypoints: vec!["CORTEX_LEFT".into(), "10".into(), "20".into()],
        vertex_mode: true,
        ..PlanRequest::default()
    });
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let keep = fx.dir.join("kept");
    let opts = MovieOpts {
        keep_frames: Some(keep.clone()),
        ..fx.opts()
    };

    let report = fx.session(&runner, opts).generate(&fx.request).unwrap();
    assert_eq!(report.frames, 4);
    assert_eq!(report.kept_frames, Some(keep.clone()));

    let scene = std::fs::read_to_string(keep.join("scenes").join("frame000000001.scene")).unwrap();
    assert!(scene.contains(r#"Name="m_surfaceVertexIndex">14</Object>"#));
    assert!(scene.contains(r#"Name="m_rowIndex">-1</Object>"#));
    assert!(fx.work_is_clean());
}

#[test]
fn cancelled_session_stops_before_planning() {
    let fx = Fixture::new("cancel", PlanRequest::rows(["10", "20"]));
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let session = fx.session(&runner, fx.opts());
    session.cancel_token().cancel();

    let err = session
        .generate_with_atlas(&fx.request, &chain_atlas())
        .unwrap_err();
    assert!(matches!(err, MeshreelError::Cancelled));
    assert!(runner.calls().is_empty());
    assert_eq!(session.stage(), Stage::Failed);
}

#[test]
fn option_validation() {
    assert!(MovieOpts::default().validate().is_ok());
    for bad in [
        MovieOpts {
            height: 1081,
            ..MovieOpts::default()
        },
        MovieOpts {
            framerate: 0,
            ..MovieOpts::default()
        },
        MovieOpts {
            workers: 0,
            ..MovieOpts::default()
        },
        MovieOpts {
            max_failed_fraction: 1.5,
            ..MovieOpts::default()
        },
    ] {
        assert!(bad.validate().is_err(), "{bad:?}");
    }
}
