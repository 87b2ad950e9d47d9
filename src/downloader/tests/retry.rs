use super::*;

#[tokio::test]
async fn always_failing_fetch_stops_at_the_ceiling() {
    let fakes = Fakes::with_fetcher(3, |journal| ScriptedFetcher::new(journal).always_failing());
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;

    let stream = archiver.start_download(request("novel", true)).await.unwrap();
    let task_id = stream.task().task_id.clone();
    let (outcomes, summary) = collect(stream).await;

    let errors: Vec<_> = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Error)
        .collect();
    assert_eq!(errors.len(), 5);
    assert!(errors.iter().all(|o| o.part == 1));
    let retries: Vec<_> = errors.iter().map(|o| o.retries_remaining.unwrap()).collect();
    assert_eq!(retries, vec![4, 3, 2, 1, 0]);
    assert!(errors[0].message.contains("HTTP Error 412"));

    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(summary.errors, 5);
    assert_eq!(fakes.fetcher.fetched_parts(), vec![1; 5], "later parts never attempted");
    assert_eq!(
        archiver.task_status(&task_id).await.unwrap().status,
        TaskStatus::Failed
    );
}

#[tokio::test]
async fn failed_part_is_retried_in_place() {
    let fakes = Fakes::with_fetcher(3, |journal| ScriptedFetcher::new(journal).failing(2, 2));
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;

    let (outcomes, summary) = collect(archiver.start_download(request("novel", true)).await.unwrap()).await;

    assert_eq!(fakes.fetcher.fetched_parts(), vec![1, 2, 2, 2, 3]);
    let statuses: Vec<_> = milestones(&outcomes)
        .iter()
        .map(|o| (o.part, o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (1, OutcomeStatus::Success),
            (2, OutcomeStatus::Error),
            (2, OutcomeStatus::Error),
            (2, OutcomeStatus::Success),
            (3, OutcomeStatus::Success),
        ]
    );
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.errors, 2);
}

#[tokio::test]
async fn error_events_report_progress_through_the_failed_part() {
    let fakes = Fakes::with_fetcher(4, |journal| ScriptedFetcher::new(journal).failing(2, 1));
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;

    let (outcomes, _) = collect(archiver.start_download(request("novel", true)).await.unwrap()).await;

    let error = outcomes
        .iter()
        .find(|o| o.status == OutcomeStatus::Error)
        .unwrap();
    assert_eq!(error.part, 2);
    assert_eq!(error.progress, 50.0);
}

#[tokio::test]
async fn errors_accumulate_across_parts() {
    let fakes = Fakes::with_fetcher(3, |journal| {
        ScriptedFetcher::new(journal)
            .failing(1, 3)
            .failing(2, 3)
    });
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;

    let (_, summary) = collect(archiver.start_download(request("novel", true)).await.unwrap()).await;

    // three errors on part 1, the fifth error overall lands on part 2
    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(summary.errors, 5);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(fakes.fetcher.fetched_parts(), vec![1, 1, 1, 1, 2, 2]);
}

#[tokio::test]
async fn missing_output_counts_as_failure() {
    let fakes = Fakes::with_fetcher(1, |journal| ScriptedFetcher::new(journal).without_output());
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;

    let (outcomes, summary) = collect(archiver.start_download(request("novel", true)).await.unwrap()).await;

    let first_error = outcomes
        .iter()
        .find(|o| o.status == OutcomeStatus::Error)
        .unwrap();
    assert!(first_error.message.contains("did not appear"), "{}", first_error.message);
    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert!(archiver.ledger().is_empty().await);
    assert!(fakes.tagger.written().is_empty());
}

#[tokio::test]
async fn parts_finished_before_failure_still_get_tags() {
    let fakes = Fakes::with_fetcher(2, |journal| ScriptedFetcher::new(journal).failing(2, 5));
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;

    let (_, summary) = collect(archiver.start_download(request("novel", true)).await.unwrap()).await;

    assert_eq!(summary.outcome, RunOutcome::Failed);
    let written = fakes.tagger.written();
    assert_eq!(written.len(), 1);
    assert!(written[0].path.ends_with("novel-1.mp3"));
}
