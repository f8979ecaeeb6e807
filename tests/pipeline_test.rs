// End-to-end runs over a temporary config dir and project

use reflect_lib::config::Paths;
use reflect_lib::core::Recorder;
use reflect_lib::docs::{
    project_target, ApprovedEntry, DocumentOutcome, Merger, BEGIN_MARKER, END_MARKER,
};
use reflect_lib::intelligence::{MergeDisposition, SectionTag};
use reflect_lib::review::{ReviewSession, ReviewState, Strategy};
use reflect_lib::QueueStore;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn workspace() -> (TempDir, Paths, PathBuf) {
    let temp = TempDir::new().unwrap();
    let claude = temp.path().join("claude");
    let project = temp.path().join("a");
    fs::create_dir_all(&claude).unwrap();
    fs::create_dir_all(&project).unwrap();
    (temp, Paths::with_claude_dir(&claude), project)
}

#[tokio::test]
async fn test_queued_correction_applied_from_its_project() -> anyhow::Result<()> {
    let (_temp, paths, project) = workspace();

    // Written the way a hook script would, no timestamp
    let queue = serde_json::json!([
        { "message": "no, use Postgres not SQLite", "project": project }
    ]);
    fs::write(&paths.queue_file, queue.to_string())?;

    let mut session = ReviewSession::new(paths.clone(), Some(project.clone()), false)?;
    session.collect(Vec::new()).await?;
    session.filter()?;
    session.dedupe()?;
    let summary = session.summarize().await?;

    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.items[0].text, "Use Postgres not SQLite.");
    assert_eq!(summary.items[0].scope.to_string(), "project");

    session.choose_strategy(Strategy::ApplyAll).await?;
    let result = session.confirm().await?;

    assert_eq!(result.applied_count, 1);
    assert_eq!(session.state(), ReviewState::Cleared);
    assert!(QueueStore::new(&paths.queue_file).is_empty().await?);

    let doc = fs::read_to_string(project.join("CLAUDE.md"))?;
    assert!(doc.starts_with("# Project Memory\n"));
    assert!(doc.contains("- Use Postgres not SQLite."));
    assert!(!paths.global_document().exists());
    Ok(())
}

#[tokio::test]
async fn test_captured_turn_reaches_the_document() -> anyhow::Result<()> {
    let (_temp, paths, project) = workspace();
    let store = QueueStore::new(&paths.queue_file);
    let recorder = Recorder::new(store)?;
    let project_path = project.to_string_lossy().into_owned();

    assert!(recorder
        .record("remember: run cargo fmt before committing", &project_path)
        .await?
        .is_some());
    assert!(recorder.record("thanks, looks good", &project_path).await?.is_none());

    let mut session = ReviewSession::new(paths.clone(), Some(project.clone()), false)?;
    session.collect(Vec::new()).await?;
    session.filter()?;
    session.dedupe()?;
    session.summarize().await?;
    session.choose_strategy(Strategy::ApplyAll).await?;
    let result = session.confirm().await?;

    assert_eq!(result.applied_count, 1);
    assert!(recorder.store().is_empty().await?);
    Ok(())
}

#[tokio::test]
async fn test_preview_changes_nothing() -> anyhow::Result<()> {
    let (_temp, paths, project) = workspace();
    let queue = serde_json::json!([
        { "message": "no, use Postgres not SQLite", "project": project }
    ]);
    fs::write(&paths.queue_file, queue.to_string())?;
    let before = fs::read(&paths.queue_file)?;

    let mut session = ReviewSession::new(paths.clone(), Some(project.clone()), true)?;
    session.collect(Vec::new()).await?;
    session.filter()?;
    session.dedupe()?;
    session.summarize().await?;

    assert!(session.choose_strategy(Strategy::SkipAll).await.is_err());
    assert_eq!(fs::read(&paths.queue_file)?, before);
    assert!(!project.join("CLAUDE.md").exists());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_appends_both_land() {
    let (_temp, paths, project) = workspace();
    let project = project.to_string_lossy().into_owned();

    let mut tasks = Vec::new();
    for text in ["no, use pnpm not npm", "actually, use uv not pip"] {
        let store = QueueStore::new(&paths.queue_file);
        let recorder = Recorder::new(store).unwrap();
        let project = project.clone();
        tasks.push(tokio::spawn(async move {
            recorder.record(text, &project).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_some());
    }

    let queued = QueueStore::new(&paths.queue_file).read().await.unwrap();
    assert_eq!(queued.len(), 2);
}

#[tokio::test]
async fn test_managed_block_apply_twice_is_byte_identical() -> anyhow::Result<()> {
    let (_temp, _paths, project) = workspace();
    let path = project.join("CLAUDE.md");
    fs::write(
        &path,
        format!(
            "# App\n\nHand-written notes stay put.\n\n{}\n### Tool Usage\n- Use pnpm.\n{}\n",
            BEGIN_MARKER, END_MARKER
        ),
    )?;

    let target = project_target(&project);
    let entries = vec![ApprovedEntry {
        text: "Use Postgres not SQLite.".to_string(),
        section_tag: SectionTag::Conventions,
        disposition: MergeDisposition::New,
        existing: None,
        sources: Vec::new(),
    }];

    let first = Merger::apply_all(&[(target.clone(), entries.clone())]).await;
    assert_eq!(first[0].outcome, DocumentOutcome::Applied { entries: 1 });
    let once = fs::read(&path)?;

    let second = Merger::apply_all(&[(target, entries)]).await;
    assert_eq!(second[0].outcome, DocumentOutcome::Unchanged);
    assert_eq!(fs::read(&path)?, once);

    let text = String::from_utf8(once)?;
    assert!(text.starts_with("# App\n\nHand-written notes stay put.\n"));
    assert!(text.find("### Tool Usage").unwrap() < text.find("### Conventions").unwrap());
    Ok(())
}
