use super::*;

#[tokio::test]
async fn partial_file_is_continued_in_place() {
    let fakes = Fakes::new(2);
    let (archiver, temp_dir) = create_test_archiver(&fakes).await;
    let dir = task_dir(temp_dir.path(), "novel");
    std::fs::create_dir_all(&dir).unwrap();

    let partial = dir.join("novel-1.mp3");
    std::fs::write(&partial, vec![1u8; PART_SIZE]).unwrap();
    let fingerprint = Fingerprint::compute(&collection(), 1, &title_of(1));
    archiver
        .ledger()
        .record(
            fingerprint.clone(),
            &collection(),
            1,
            &crate::types::MediaInfo {
                title: title_of(1),
                ..Default::default()
            },
            &partial,
        )
        .await
        .unwrap();
    std::fs::write(&partial, vec![1u8; PART_SIZE / 2]).unwrap();
    assert_eq!(
        archiver.ledger().classify(&fingerprint).await,
        Classification::ResumablePartial(partial.clone())
    );

    let (outcomes, summary) = collect(archiver.start_download(request("novel", true)).await.unwrap()).await;

    let fetches = fakes.fetcher.fetches();
    assert_eq!(fetches[0], (1, OutputTarget::Continue(partial.clone())));
    assert!(matches!(fetches[1].1, OutputTarget::Fresh(_)));
    assert_eq!(milestones(&outcomes)[0].status, OutcomeStatus::Success);
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(std::fs::metadata(&partial).unwrap().len(), PART_SIZE as u64);
    assert!(matches!(
        archiver.ledger().classify(&fingerprint).await,
        Classification::Complete(_)
    ));
}

#[tokio::test]
async fn file_grown_by_tagging_still_counts_as_complete() {
    let fakes = Fakes::new(1);
    let (archiver, temp_dir) = create_test_archiver(&fakes).await;

    collect(archiver.start_download(request("novel", true)).await.unwrap()).await;
    let path = task_dir(temp_dir.path(), "novel").join("novel-1.mp3");
    std::fs::write(&path, vec![1u8; PART_SIZE + 512]).unwrap();

    let (outcomes, _) = collect(archiver.start_download(request("novel", true)).await.unwrap()).await;

    assert_eq!(outcomes[0].status, OutcomeStatus::Skip);
    assert_eq!(fakes.fetcher.fetched_parts(), vec![1]);
}
