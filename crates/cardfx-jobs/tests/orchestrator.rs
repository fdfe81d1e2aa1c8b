#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use cardfx_jobs::{
    JobError, JobEvent, JobId, JobState, JobStatus, Orchestrator, StageResult, StageStatus,
};
use cardfx_pipeline::decode::encode_png;
use cardfx_pipeline::{
    FilterKind, FilterOptions, PipelineConfig, PipelineError, RgbaImage, StageKind,
};
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(30);

fn card_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        if (x / 40 + y / 40) % 2 == 0 {
            image::Rgba([210, 150, 110, 255])
        } else {
            image::Rgba([30, 50, 80, 255])
        }
    });
    encode_png(&img).unwrap()
}

async fn finished(orchestrator: &Orchestrator, id: JobId) -> JobStatus {
    timeout(LIMIT, orchestrator.wait_for(id))
        .await
        .expect("job did not finish in time")
        .expect("job disappeared")
}

#[tokio::test]
async fn job_runs_every_stage_and_publishes_artifacts() {
    let orchestrator = Orchestrator::new();
    let id = orchestrator
        .start_processing(card_png(320, 240), PipelineConfig::default())
        .unwrap();

    let status = finished(&orchestrator, id).await;
    assert_eq!(status.state, JobState::Completed);
    assert!(status.is_complete);
    assert!((status.overall_progress() - 1.0).abs() < f64::EPSILON);
    assert_eq!(status.current_stage_index, 2);
    for stage in &status.stages {
        assert_eq!(stage.status, StageStatus::Completed, "{}", stage.name);
        assert_eq!(stage.progress, 100);
        assert!(stage.duration.is_some());
        assert!(stage.error.is_none());
    }

    let processed = orchestrator
        .artifact(status.processed_url.as_deref().unwrap())
        .unwrap();
    let metadata = status.metadata.as_ref().unwrap();
    assert_eq!(processed.dimensions, metadata.processed);
    assert!(metadata.applied_crop.is_some());

    let thumbnail = orchestrator
        .artifact(status.thumbnail_url.as_deref().unwrap())
        .unwrap();
    assert!(thumbnail.dimensions.width.max(thumbnail.dimensions.height) <= 200);
    assert!(orchestrator.artifact(status.preview_url.as_deref().unwrap()).is_some());

    let Some(StageResult::Preview {
        placeholder_url, ..
    }) = &status.stages[0].result
    else {
        panic!("preview stage has no preview result");
    };
    assert!(orchestrator.artifact(placeholder_url).is_some());
}

#[tokio::test]
async fn events_arrive_in_stage_order() {
    let orchestrator = Orchestrator::new();
    let mut events = orchestrator.subscribe();
    let id = orchestrator
        .start_processing(card_png(96, 96), PipelineConfig::default())
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let event = timeout(LIMIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(event.job_id(), id);
        let terminal = event.is_terminal();
        if !matches!(event, JobEvent::StageProgress { .. }) {
            seen.push(event);
        }
        if terminal {
            break;
        }
    }

    let names: Vec<String> = seen
        .iter()
        .map(|e| match e {
            JobEvent::Started { .. } => "started".to_owned(),
            JobEvent::StageStarted { index, .. } => format!("start{index}"),
            JobEvent::StageCompleted { index, .. } => format!("done{index}"),
            JobEvent::Completed { .. } => "completed".to_owned(),
            other => format!("{other:?}"),
        })
        .collect();
    assert_eq!(
        names,
        [
            "started",
            "start0",
            "done0",
            "start1",
            "done1",
            "start2",
            "done2",
            "completed"
        ]
    );
}

#[tokio::test]
async fn undecodable_input_fails_the_first_stage() {
    let orchestrator = Orchestrator::new();
    let id = orchestrator
        .start_processing(b"definitely not an image".to_vec(), PipelineConfig::default())
        .unwrap();

    let status = finished(&orchestrator, id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(!status.is_complete);
    assert_eq!(status.stages[0].status, StageStatus::Failed);
    assert!(status.stages[0].error.as_deref().unwrap().contains("decode"));
    assert!(
        status.stages[1..]
            .iter()
            .all(|s| s.status == StageStatus::Pending)
    );
    assert!(status.error.is_some());
    assert!(orchestrator.artifacts().urls_for(id).is_empty());
}

#[tokio::test]
async fn empty_input_fails_the_job() {
    let orchestrator = Orchestrator::new();
    let id = orchestrator
        .start_processing(Vec::new(), PipelineConfig::default())
        .unwrap();
    let status = finished(&orchestrator, id).await;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.current_stage_index, 0);
}

#[tokio::test]
async fn invalid_config_is_rejected_synchronously() {
    let orchestrator = Orchestrator::new();
    let config = PipelineConfig {
        filter: Some(FilterOptions::new(FilterKind::Vivid).with_intensity(3.0)),
        ..PipelineConfig::default()
    };
    let err = orchestrator
        .start_processing(card_png(10, 10), config)
        .unwrap_err();
    assert!(matches!(
        err,
        JobError::Pipeline(PipelineError::InvalidConfig(_))
    ));
    assert!(orchestrator.jobs().is_empty());
}

#[tokio::test]
async fn abort_before_first_stage_runs_nothing() {
    let orchestrator = Orchestrator::new();
    let id = orchestrator
        .start_processing(card_png(64, 64), PipelineConfig::default())
        .unwrap();
    // The runner task has not been polled yet on this single-threaded runtime.
    assert!(orchestrator.abort_job(id));
    assert!(!orchestrator.abort_job(id));

    let status = finished(&orchestrator, id).await;
    assert_eq!(status.state, JobState::Aborted);
    tokio::task::yield_now().await;
    let status = orchestrator.job_status(id).unwrap();
    assert!(
        status
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Pending)
    );
    assert!(orchestrator.artifacts().is_empty());
}

/// Wait until every task spawned on the current runtime has returned.
async fn runners_idle() {
    let handle = tokio::runtime::Handle::current();
    timeout(LIMIT, async {
        while handle.metrics().num_alive_tasks() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job runner did not return in time");
}

#[tokio::test]
async fn abort_mid_job_discards_later_stages_and_revokes_artifacts() {
    let orchestrator = Orchestrator::new();
    let mut events = orchestrator.subscribe();
    let config = PipelineConfig {
        enhancements: cardfx_pipeline::EnhancementOptions {
            sharpen: true,
            auto_enhance: true,
            ..Default::default()
        },
        ..PipelineConfig::default()
    };
    let id = orchestrator
        .start_processing(card_png(400, 300), config)
        .unwrap();

    // On this single-threaded runtime the runner is parked on the blocking
    // processing stage whenever this task observes its start, so the abort
    // lands while that stage is in flight.
    loop {
        if let JobEvent::StageStarted { index: 1, .. } =
            timeout(LIMIT, events.recv()).await.unwrap().unwrap()
        {
            break;
        }
    }
    let preview_url = orchestrator.job_status(id).unwrap().preview_url.unwrap();
    assert!(orchestrator.artifact(&preview_url).is_some());

    assert!(orchestrator.abort_job(id));
    assert!(orchestrator.artifact(&preview_url).is_none());

    // The runner returns only after the in-flight stage has finished and
    // its output was thrown away.
    runners_idle().await;
    let status = orchestrator.job_status(id).unwrap();
    assert_eq!(status.state, JobState::Aborted);
    assert!(status.processed_url.is_none());
    assert!(status.thumbnail_url.is_none());
    assert_eq!(status.stages[1].status, StageStatus::Processing);
    assert!(status.stages[1].result.is_none());
    assert_eq!(status.stages[2].status, StageStatus::Pending);
    assert!(orchestrator.artifacts().urls_for(id).is_empty());

    // Nothing about the job is broadcast after it was aborted.
    let mut after_abort = Vec::new();
    let mut aborted = false;
    while let Ok(event) = events.try_recv() {
        if aborted {
            after_abort.push(event);
        } else {
            aborted = matches!(event, JobEvent::Aborted { .. });
        }
    }
    assert!(aborted);
    assert!(after_abort.is_empty(), "events after abort: {after_abort:?}");
}

#[tokio::test]
async fn observed_statuses_never_move_backward() {
    let orchestrator = Orchestrator::new();
    let id = orchestrator
        .start_processing(card_png(200, 200), PipelineConfig::default())
        .unwrap();
    let mut rx = orchestrator.watch(id).unwrap();

    let mut snapshots = vec![rx.borrow_and_update().clone()];
    while !snapshots.last().unwrap().state.is_terminal() {
        timeout(LIMIT, rx.changed()).await.unwrap().unwrap();
        snapshots.push(rx.borrow_and_update().clone());
    }

    for pair in snapshots.windows(2) {
        for (before, after) in pair[0].stages.iter().zip(&pair[1].stages) {
            assert!(after.status.rank() >= before.status.rank());
            assert!(after.progress >= before.progress);
        }
        assert!(pair[1].overall_progress() >= pair[0].overall_progress());
    }
    assert_eq!(snapshots.last().unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn batch_jobs_are_independent() {
    let orchestrator = Orchestrator::new();
    let inputs = vec![card_png(80, 120), b"junk".to_vec(), card_png(120, 80)];
    let ids = orchestrator
        .start_batch(inputs, &PipelineConfig::default())
        .await
        .unwrap();
    assert_eq!(ids.len(), 3);

    let mut states = Vec::new();
    for id in &ids {
        states.push(finished(&orchestrator, *id).await.state);
    }
    assert_eq!(
        states,
        [JobState::Completed, JobState::Failed, JobState::Completed]
    );
}

#[tokio::test]
async fn custom_stage_list_is_respected() {
    let orchestrator = Orchestrator::new();
    let config = PipelineConfig {
        stages: vec![StageKind::Thumbnail],
        ..PipelineConfig::default()
    };
    let id = orchestrator
        .start_processing(card_png(300, 100), config)
        .unwrap();
    let status = finished(&orchestrator, id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.stages.len(), 1);
    assert_eq!(status.stages[0].name, "thumbnail");
    assert!(status.preview_url.is_none());
    assert!(status.thumbnail_url.is_some());
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let orchestrator = Orchestrator::new();
    let ghost = JobId::new(9_999);
    assert!(orchestrator.job_status(ghost).is_none());
    assert!(orchestrator.wait_for(ghost).await.is_none());
    assert!(!orchestrator.abort_job(ghost));
    assert!(matches!(
        orchestrator.release_job(ghost),
        Err(JobError::UnknownJob(id)) if id == ghost
    ));
}

#[tokio::test]
async fn release_and_reset_revoke_everything() {
    let orchestrator = Orchestrator::new();
    let first = orchestrator
        .start_processing(card_png(64, 64), PipelineConfig::default())
        .unwrap();
    let second = orchestrator
        .start_processing(card_png(64, 64), PipelineConfig::default())
        .unwrap();
    let done = finished(&orchestrator, first).await;
    finished(&orchestrator, second).await;

    let url = done.thumbnail_url.unwrap();
    assert!(orchestrator.artifact(&url).is_some());
    orchestrator.release_job(first).unwrap();
    assert!(orchestrator.job_status(first).is_none());
    assert!(orchestrator.artifact(&url).is_none());
    assert!(!orchestrator.artifacts().urls_for(second).is_empty());

    orchestrator.reset();
    assert!(orchestrator.jobs().is_empty());
    assert!(orchestrator.artifacts().is_empty());
}

#[test]
fn starting_outside_a_runtime_is_an_error() {
    let orchestrator = Orchestrator::new();
    let err = orchestrator
        .start_processing(card_png(8, 8), PipelineConfig::default())
        .unwrap_err();
    assert!(matches!(err, JobError::NoRuntime(_)));
    assert!(orchestrator.jobs().is_empty());
}
