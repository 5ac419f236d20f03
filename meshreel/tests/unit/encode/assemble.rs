use super::*;

use crate::foundation::error::FrameFailure;
use crate::render::dispatch::ManifestEntry;
use crate::testkit::{row_position, scratch_dir};
use crate::tools::scripted::ScriptedRunner;

/// Manifest over `outcomes`: `Some(k)` is rendered into `frames/frame{k}.png`, `None` failed.
fn manifest(dir: &Path, outcomes: &[Option<usize>]) -> RenderManifest {
    let frames = dir.join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    let entries = outcomes
        .iter()
        .enumerate()
        .map(|(index, outcome)| {
            let outcome = match outcome {
                Some(k) => {
                    let path = frames.join(format!("frame{k:09}.png"));
                    image::RgbaImage::new(4, 2).save(&path).unwrap();
                    FrameOutcome::Rendered { path }
                }
                None => FrameOutcome::Failed {
                    reason: FrameFailure::Timeout {
                        after: Duration::from_secs(1),
                    },
                },
            };
            ManifestEntry {
                index,
                position: row_position(index as u32, index as u32),
                outcome,
                shared_with: None,
            }
        })
        .collect();
    RenderManifest {
        width: 4,
        height: 2,
        entries,
    }
}

fn assembler(runner: Arc<ScriptedRunner>) -> FrameAssembler {
    FrameAssembler::new("/usr/bin/ffmpeg", runner, CancelToken::new())
}

fn sequence_len(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("sequence")).unwrap().count()
}

#[test]
fn complete_manifest_is_encoded_once_in_order() {
    let dir = scratch_dir("assemble", "complete");
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let output = dir.join("out").join("movie.mp4");
    let opts = AssembleOpts {
        framerate: 12,
        ..AssembleOpts::default()
    };

    let report = assembler(runner.clone())
        .assemble(&manifest(&dir, &[Some(0), Some(1), Some(2), Some(3)]), &dir, &output, &opts)
        .unwrap();

    assert_eq!(report.frames, 4);
    assert!(report.skipped.is_empty());
    assert_eq!(report.bytes, b"scripted video".len() as u64);
    assert_eq!(sequence_len(&dir), 4);

    let calls = runner.calls_for(ExternalTool::Encoder);
    assert_eq!(calls.len(), 1);
    let args = calls[0]
        .args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(args[..4], ["-hide_banner", "-y", "-framerate", "12"]);
    assert!(args.contains(&dir.join("sequence").join("frame%09d.png").display().to_string()));
    assert_eq!(args.last().map(String::as_str), Some(output.to_str().unwrap()));
}

#[test]
fn shared_frames_appear_at_every_index() {
    let dir = scratch_dir("assemble", "shared");
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let output = dir.join("movie.mp4");

    let report = assembler(runner)
        .assemble(
            &manifest(&dir, &[Some(0), Some(1), Some(0)]),
            &dir,
            &output,
            &AssembleOpts::default(),
        )
        .unwrap();

    assert_eq!(report.frames, 3);
    assert_eq!(sequence_len(&dir), 3);
    assert!(dir.join("sequence").join("frame000000002.png").is_file());
}

#[test]
fn failed_frames_block_encoding_by_default() {
    let dir = scratch_dir("assemble", "incomplete");
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let output = dir.join("movie.mp4");

    let err = assembler(runner.clone())
        .assemble(
            &manifest(&dir, &[Some(0), None, Some(2)]),
            &dir,
            &output,
            &AssembleOpts::default(),
        )
        .unwrap_err();

    match err {
        MeshreelError::Assembly(AssemblyError::IncompleteRender { failed, total }) => {
            assert_eq!(failed, vec![1]);
            assert_eq!(total, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(runner.calls().is_empty());
    assert!(!output.exists());
}

#[test]
fn skip_failed_encodes_the_rendered_frames() {
    let dir = scratch_dir("assemble", "skip");
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let output = dir.join("movie.mp4");
    let opts = AssembleOpts {
        skip_failed: true,
        ..AssembleOpts::default()
    };

    let report = assembler(runner)
        .assemble(&manifest(&dir, &[Some(0), None, Some(2)]), &dir, &output, &opts)
        .unwrap();
    assert_eq!(report.frames, 2);
    assert_eq!(report.skipped, vec![1]);
    assert_eq!(sequence_len(&dir), 2);

    let err = assembler(Arc::new(ScriptedRunner::emulating_tools()))
        .assemble(&manifest(&dir, &[None, None]), &dir, &output, &opts)
        .unwrap_err();
    assert!(matches!(
        err,
        MeshreelError::Assembly(AssemblyError::IncompleteRender { .. })
    ));
}

#[test]
fn empty_manifest_is_rejected() {
    let dir = scratch_dir("assemble", "empty");
    let err = assembler(Arc::new(ScriptedRunner::emulating_tools()))
        .assemble(&manifest(&dir, &[]), &dir, &dir.join("movie.mp4"), &AssembleOpts::default())
        .unwrap_err();
    assert!(matches!(
        err,
        MeshreelError::Assembly(AssemblyError::EmptyManifest)
    ));
}

#[test]
fn encoder_failure_or_empty_output_is_encoding_failed() {
    let dir = scratch_dir("assemble", "encoder-failure");
    let output = dir.join("movie.mp4");
    let failing = Arc::new(ScriptedRunner::emulating_tools_except(|_| {
        Some(InvocationError::NonZeroExit {
            code: Some(1),
            output: "Unknown encoder 'libx264'".to_string(),
        })
    }));
    let err = assembler(failing)
        .assemble(&manifest(&dir, &[Some(0)]), &dir, &output, &AssembleOpts::default())
        .unwrap_err();
    match err {
        MeshreelError::Assembly(AssemblyError::EncodingFailed { reason }) => {
            assert!(reason.contains("libx264"), "{reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let silent = Arc::new(ScriptedRunner::new(|_| Ok(Default::default())));
    let err = assembler(silent)
        .assemble(&manifest(&dir, &[Some(0)]), &dir, &output, &AssembleOpts::default())
        .unwrap_err();
    match err {
        MeshreelError::Assembly(AssemblyError::EncodingFailed { reason }) => {
            assert!(reason.contains("no output"), "{reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn existing_output_is_kept_without_overwrite() {
    let dir = scratch_dir("assemble", "no-overwrite");
    let output = dir.join("movie.mp4");
    std::fs::write(&output, b"old").unwrap();
    let runner = Arc::new(ScriptedRunner::emulating_tools());
    let opts = AssembleOpts {
        overwrite: false,
        ..AssembleOpts::default()
    };

    let err = assembler(runner.clone())
        .assemble(&manifest(&dir, &[Some(0)]), &dir, &output, &opts)
        .unwrap_err();
    assert!(matches!(err, MeshreelError::Configuration(_)));
    assert!(runner.calls().is_empty());
    assert_eq!(std::fs::read(&output).unwrap(), b"old");
}

#[test]
fn cancelled_encode_reports_cancellation() {
    let dir = scratch_dir("assemble", "cancel");
    let cancel = CancelToken::new();
    cancel.cancel();
    let assembler = FrameAssembler::new(
        "/usr/bin/ffmpeg",
        Arc::new(ScriptedRunner::emulating_tools()),
        cancel,
    );
    let err = assembler
        .assemble(
            &manifest(&dir, &[Some(0)]),
            &dir,
            &dir.join("movie.mp4"),
            &AssembleOpts::default(),
        )
        .unwrap_err();
    assert!(matches!(err, MeshreelError::Cancelled));
}

#[test]
fn encoder_command_line() {
    let inv = encode_invocation(
        Path::new("/opt/ffmpeg"),
        Path::new("/tmp/seq/frame%09d.png"),
        Path::new("/out/movie.mp4"),
        24,
        false,
        Duration::from_secs(30),
    );
    assert_eq!(inv.tool, ExternalTool::Encoder);
    assert_eq!(inv.timeout, Duration::from_secs(30));
    assert_eq!(
        inv.command_line(),
        "/opt/ffmpeg -hide_banner -n -framerate 24 -start_number 0 -i /tmp/seq/frame%09d.png \
         -c:v libx264 -r 24 -pix_fmt yuv420p /out/movie.mp4"
    );
}

#[test]
fn invalid_options_are_rejected() {
    assert!(AssembleOpts::default().validate().is_ok());
    let zero_fps = AssembleOpts {
        framerate: 0,
        ..AssembleOpts::default()
    };
    assert!(zero_fps.validate().is_err());
}
