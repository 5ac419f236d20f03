use super::*;

#[cfg(unix)]
fn sh(script: &str) -> Invocation {
    Invocation::new(ExternalTool::Renderer, "/bin/sh").args(["-c", script])
}

#[test]
fn command_line_quotes_arguments_with_spaces() {
    let inv = Invocation::new(ExternalTool::Encoder, "/usr/bin/ffmpeg")
        .args(["-i", "my frames/frame%09d.png"])
        .arg("out.mp4");
    assert_eq!(
        inv.command_line(),
        "/usr/bin/ffmpeg -i 'my frames/frame%09d.png' out.mp4"
    );
    assert_eq!(inv.arg_str(2), Some("out.mp4"));
}

#[test]
fn tail_keeps_last_non_empty_lines() {
    assert_eq!(tail_lines("a\n\nb\nc\n", 2), "b\nc");
    assert_eq!(tail_lines("", 3), "");
}

#[test]
fn invocation_errors_map_to_frame_failures() {
    assert_eq!(
        FrameFailure::from(InvocationError::Timeout(Duration::from_secs(3))),
        FrameFailure::Timeout {
            after: Duration::from_secs(3)
        }
    );
    assert_eq!(
        FrameFailure::from(InvocationError::Cancelled),
        FrameFailure::Cancelled
    );
}

#[cfg(unix)]
#[test]
fn captures_output_and_environment() {
    let inv = sh("echo \"threads=$OMP_NUM_THREADS\"; echo warn 1>&2").env("OMP_NUM_THREADS", "1");
    let out = ProcessRunner::new().run(&inv, &CancelToken::new()).unwrap();
    assert_eq!(out.stdout.trim(), "threads=1");
    assert_eq!(out.stderr.trim(), "warn");
}

#[cfg(unix)]
#[test]
fn non_zero_exit_reports_code_and_stderr_tail() {
    let inv = sh("echo 'scene not found' 1>&2; exit 3");
    let err = ProcessRunner::new()
        .run(&inv, &CancelToken::new())
        .unwrap_err();
    assert_eq!(
        err,
        InvocationError::NonZeroExit {
            code: Some(3),
            output: "scene not found".to_string()
        }
    );
}

#[cfg(unix)]
#[test]
fn hung_process_is_killed_at_timeout() {
    let inv = sh("sleep 30").timeout(Duration::from_millis(100));
    let started = Instant::now();
    let err = ProcessRunner::new()
        .run(&inv, &CancelToken::new())
        .unwrap_err();
    assert_eq!(err, InvocationError::Timeout(Duration::from_millis(100)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn cancelled_token_kills_the_process() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = ProcessRunner::new().run(&sh("sleep 30"), &cancel).unwrap_err();
    assert_eq!(err, InvocationError::Cancelled);
}

#[test]
fn missing_program_is_a_spawn_error() {
    let inv = Invocation::new(ExternalTool::Renderer, "/nonexistent/wb_command");
    let err = ProcessRunner::new()
        .run(&inv, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, InvocationError::Spawn { .. }));
}
