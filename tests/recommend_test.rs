#![cfg(unix)]

use std::time::Duration;

use harvestify::{error::DownstreamError, recommend::Recommender};

/// `sh -c <script> sh <snapshot> <model>`: the script sees the paths as `$1` and `$2`.
fn shell(script: &str, timeout: Duration) -> Recommender {
    Recommender::new(
        vec!["sh".into(), "-c".into(), script.into(), "sh".into()],
        "model.pkl",
        timeout,
    )
}

#[tokio::test]
async fn returns_ids_printed_by_the_engine() {
    let snapshot = tempfile::NamedTempFile::new().unwrap();
    let engine = shell(
        r#"test -f "$1" && test "$2" = model.pkl && echo '["t1", "t2"]'"#,
        Duration::from_secs(5),
    );

    let ids = engine.run(snapshot.path()).await.unwrap();
    assert_eq!(ids, vec!["t1".to_string(), "t2".to_string()]);
}

#[tokio::test]
async fn non_zero_exit_carries_stderr() {
    let engine = shell("echo boom >&2; exit 3", Duration::from_secs(5));

    let err = engine.run("snapshot.json".as_ref()).await.unwrap_err();
    match err {
        DownstreamError::NonZeroExit { code, stderr } => {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn slow_engine_times_out() {
    let engine = shell("sleep 5", Duration::from_millis(100));

    let err = engine.run("snapshot.json".as_ref()).await.unwrap_err();
    assert!(matches!(err, DownstreamError::Timeout(_)));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let engine = Recommender::new(
        vec!["/nonexistent/recommender".into()],
        "model.pkl",
        Duration::from_secs(5),
    );

    let err = engine.run("snapshot.json".as_ref()).await.unwrap_err();
    assert!(matches!(err, DownstreamError::Spawn(_)));
}

#[tokio::test]
async fn garbage_output_is_unparsable() {
    let engine = shell("echo 'model crashed'", Duration::from_secs(5));

    let err = engine.run("snapshot.json".as_ref()).await.unwrap_err();
    assert!(matches!(err, DownstreamError::UnparsableOutput(_)));
}
