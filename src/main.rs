// reflect - remembers what you corrected so your assistant doesn't have to be told twice
//
// This is the main entry point. Parses CLI args and dispatches to handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reflect_lib::{
    config::{Action, Paths, ProcessOptions, RunMode},
    core::{HookInput, ProjectDetector, Recorder},
    docs::{
        auto_memory_path, find_target_files, read_all_memory_entries, read_auto_memory,
        project_folder_name, RunResult, Router,
    },
    intelligence::{
        Analyzer, ConsolidationChoice, ConsolidationProposal, ExistingMatch, Learning, WorkItem,
    },
    review::{Resolution, ReviewDriver, ReviewSession, Strategy, Summary, SummaryItem},
    transcript::TranscriptScanner,
    QueueStore,
};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reflect")]
#[command(about = "Captures corrections you give your coding assistant and merges them into its memory files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one user turn for a correction and queue it (hook entry point)
    Capture {
        /// Turn text; read the hook payload from stdin when absent
        #[arg(long)]
        text: Option<String>,
        /// Project the turn belongs to (defaults to the detected root)
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Review queued corrections and merge approved ones
    Process {
        /// Show what would happen without touching anything
        #[arg(long)]
        preview: bool,
        /// Also scan transcripts from the last N days
        #[arg(long)]
        days: Option<u32>,
        /// process, review-pending, dedupe-pass or list-targets
        #[arg(long, default_value = "process")]
        action: Action,
        /// Apply everything without prompting
        #[arg(short, long)]
        yes: bool,
    },
    /// Inspect or empty the queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Look through past transcripts for corrections
    Scan {
        /// Only transcripts from the last N days
        #[arg(long)]
        days: Option<u32>,
        /// Put what was found in the queue
        #[arg(long)]
        enqueue: bool,
    },
    /// List the memory files learnings can land in
    Targets,
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Show queued corrections
    List,
    /// Drop everything in the queue
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // WARN by default, RUST_LOG=debug to see every match and skip.
    // Stderr only: hook stdout goes back to the host.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let paths = Paths::from_env().context("Could not resolve the config directory")?;

    match cli.command {
        Commands::Capture { text, project } => handle_capture(&paths, text, project).await,
        Commands::Process {
            preview,
            days,
            action,
            yes,
        } => {
            let options = ProcessOptions {
                mode: if preview { RunMode::Preview } else { RunMode::Apply },
                history_window_days: days,
                action,
            };
            handle_process(&paths, &options, yes).await
        }
        Commands::Queue { command } => match command {
            QueueCommands::List => handle_queue_list(&paths).await,
            QueueCommands::Clear => handle_queue_clear(&paths).await,
        },
        Commands::Scan { days, enqueue } => handle_scan(&paths, days, enqueue).await,
        Commands::Targets => handle_targets(&paths).await,
    }
}

async fn handle_capture(paths: &Paths, text: Option<String>, project: Option<PathBuf>) -> Result<()> {
    // The host turn goes on no matter what happens here
    match capture(paths, text, project).await {
        Ok(Some(candidate)) => debug!(text = %candidate.raw_text, "Captured"),
        Ok(None) => {}
        Err(e) => warn!("{}", e.user_message()),
    }
    Ok(())
}

async fn capture(
    paths: &Paths,
    text: Option<String>,
    project: Option<PathBuf>,
) -> reflect_lib::Result<Option<reflect_lib::queue::CandidateCorrection>> {
    let mut input = match text {
        Some(prompt) => HookInput {
            prompt,
            ..HookInput::default()
        },
        None => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw)?;
            if raw.trim().is_empty() {
                return Ok(None);
            }
            HookInput::parse(&raw)?
        }
    };
    if let Some(project) = project {
        input.cwd = Some(project.to_string_lossy().into_owned());
    }

    let recorder = Recorder::new(QueueStore::new(&paths.queue_file))?;
    recorder.record_hook(&input).await
}

async fn handle_process(paths: &Paths, options: &ProcessOptions, yes: bool) -> Result<()> {
    let project_root = ProjectDetector::detect(std::env::current_dir()?)?;

    match options.action {
        Action::ListTargets => return handle_targets(paths).await,
        Action::DedupePass => return handle_dedupe_pass(paths, &project_root).await,
        Action::Process | Action::ReviewPending => {}
    }

    let scanned = match (options.action, options.history_window_days) {
        (Action::Process, Some(days)) => {
            let scanner = TranscriptScanner::new(paths.clone());
            let report = scanner
                .scan(&project_root.to_string_lossy(), Some(days))
                .await;
            println!(
                "Scanned {} transcript(s): {} possible correction(s)",
                report.files_scanned,
                report.candidates.len()
            );
            report.into_work_items()
        }
        _ => Vec::new(),
    };

    let mut session = ReviewSession::new(paths.clone(), Some(project_root), options.is_preview())?;
    let mut driver = TerminalDriver::new(yes);

    match session.run(scanned, &mut driver).await {
        Ok(Some(result)) => print_result(&result),
        Ok(None) if options.is_preview() => println!("\nPreview only. Nothing was changed."),
        Ok(None) => println!("\nNothing applied. The queue is unchanged."),
        Err(e) => {
            eprintln!("✗ {}", e.user_message());
            return Err(e.into());
        }
    }

    Ok(())
}

async fn handle_dedupe_pass(paths: &Paths, project_root: &Path) -> Result<()> {
    let store = QueueStore::new(&paths.queue_file);
    let items: Vec<WorkItem> = store.read().await?.into_iter().map(WorkItem::queued).collect();
    let entries = read_all_memory_entries(paths, Some(project_root)).await;

    let analyzer = Analyzer::new()?;
    let router = Router::new()?;
    let report = analyzer.analyze(&items, &entries);

    println!("\nDedupe pass");
    println!("{}", "=".repeat(60));
    println!("Queued:       {}", report.candidates_seen);
    println!("Learnings:    {}", report.learnings.len());
    println!("Rejected:     {}", report.rejected.len());
    println!("Clusters:     {}", report.proposals.len());
    println!("Already known: {}", report.duplicates_found());

    for proposal in &report.proposals {
        println!("\n  {} → {}", proposal.group_id, proposal.proposed_text);
        for &m in &proposal.members {
            println!("     · {}", report.learnings[m].actionable_text);
        }
    }

    for (learning, hits) in report.learnings.iter().zip(&report.existing) {
        if hits.is_empty() {
            continue;
        }
        println!(
            "\n  {} (memory topic: {})",
            learning.actionable_text,
            router.suggest_memory_topic(&learning.actionable_text)
        );
        print_hits(hits);
    }

    println!("{}", "=".repeat(60));
    Ok(())
}

async fn handle_queue_list(paths: &Paths) -> Result<()> {
    let store = QueueStore::new(&paths.queue_file);
    let queued = store.read().await?;

    if queued.is_empty() {
        println!("The queue is empty.");
        return Ok(());
    }

    let now = chrono::Utc::now();
    println!("\nQueued corrections ({}):", queued.len());
    println!("{}", "=".repeat(60));
    for (i, c) in queued.iter().enumerate() {
        println!(
            "{:3}. [{} {:.0}%] {}",
            i + 1,
            c.source_type,
            c.confidence * 100.0,
            c.raw_text
        );
        println!(
            "     {} · {} day(s) old",
            c.source_project_path,
            c.age_days(now)
        );
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

async fn handle_queue_clear(paths: &Paths) -> Result<()> {
    let store = QueueStore::new(&paths.queue_file);
    let count = store.len().await?;
    store.clear().await?;
    println!("✓ Cleared {} queued correction(s)", count);
    Ok(())
}

async fn handle_scan(paths: &Paths, days: Option<u32>, enqueue: bool) -> Result<()> {
    let project_root = ProjectDetector::detect(std::env::current_dir()?)?;
    let project = project_root.to_string_lossy().into_owned();

    let scanner = TranscriptScanner::new(paths.clone());
    let report = scanner.scan(&project, days).await;

    println!(
        "\nScanned {} transcript(s) in {} (language: {})",
        report.files_scanned,
        scanner.transcript_dir(&project).display(),
        report.language
    );
    if report.lines_skipped > 0 {
        println!("Skipped {} unreadable line(s)", report.lines_skipped);
    }

    if report.candidates.is_empty() {
        println!("No corrections found.");
        return Ok(());
    }

    println!("{}", "=".repeat(60));
    for (i, found) in report.candidates.iter().enumerate() {
        println!(
            "{:3}. [{} {:.0}%] {}",
            i + 1,
            found.candidate.source_type,
            found.candidate.confidence * 100.0,
            found.candidate.raw_text
        );
    }
    println!("{}", "=".repeat(60));

    if enqueue {
        let store = QueueStore::new(&paths.queue_file);
        let queued = store.read().await?;
        let fresh: Vec<_> = report
            .candidates
            .into_iter()
            .map(|s| s.candidate)
            .filter(|c| !queued.iter().any(|q| q.raw_text.trim() == c.raw_text.trim()))
            .collect();
        let total = store.append_many(&fresh).await?;
        println!("✓ Queued {} new correction(s), {} waiting for review", fresh.len(), total);
    }

    Ok(())
}

async fn handle_targets(paths: &Paths) -> Result<()> {
    let project_root = ProjectDetector::detect(std::env::current_dir()?)?;
    let files = find_target_files(paths, Some(&project_root)).await;

    let name = ProjectDetector::get_project_name(&project_root).unwrap_or_default();
    println!("\nMemory files for {} ({})", name, project_root.display());
    println!("{}", "=".repeat(60));
    if files.is_empty() {
        println!("  (none yet; ./CLAUDE.md and ~/.claude/CLAUDE.md are created on first apply)");
    }
    for file in &files {
        println!("  {:<14} {}", file.kind.to_string(), file.relative_path);
        let rule_paths = file.rule_paths();
        if !rule_paths.is_empty() {
            println!("  {:<14} applies to {}", "", rule_paths.join(", "));
        }
    }

    let project = project_root.to_string_lossy();
    let memory_dir = auto_memory_path(paths, &project);
    let topics = read_auto_memory(&memory_dir).await;
    if !topics.is_empty() {
        println!("\nAuto memory ({}):", project_folder_name(&project));
        for topic in &topics {
            println!("  {:<20} {} entr(ies)", topic.name, topic.entries.len());
        }
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

fn print_result(result: &RunResult) {
    println!("\n{}", "=".repeat(60));
    println!("Applied: {}   Skipped: {}", result.applied_count, result.skipped_count);
    for status in &result.per_document_status {
        println!("  {} {}", status.outcome, status.path.display());
    }
    if result.failed_documents().next().is_some() {
        println!("\nLearnings for failed documents stay queued for the next run.");
    }
    println!("{}", "=".repeat(60));
}

fn print_hits(hits: &[ExistingMatch]) {
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "     {}) {}:{} {} ({:.0}% overlap{})",
            i + 1,
            hit.entry.relative_path,
            hit.entry.line,
            hit.entry.text,
            hit.overlap * 100.0,
            if hit.exact { ", exact" } else { "" }
        );
    }
}

fn print_item(position: usize, item: &SummaryItem) {
    let mut flags = Vec::new();
    if item.stale {
        flags.push("stale");
    }
    if item.ambiguous {
        flags.push("ambiguous");
    }
    if item.scope_flagged {
        flags.push("scope guessed");
    }
    let disposition = item
        .disposition
        .map(|d| d.to_string())
        .unwrap_or_else(|| "undecided".to_string());

    println!("{:3}. {}", position + 1, item.text);
    println!(
        "     {} · {} → {} [{}]{}",
        item.scope,
        item.section,
        item.target,
        disposition,
        if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        }
    );
}

/// Interactive review in the terminal; `--yes` answers everything
struct TerminalDriver {
    yes: bool,
}

impl TerminalDriver {
    fn new(yes: bool) -> Self {
        Self { yes }
    }

    // None on EOF
    fn prompt(&self, question: &str) -> Option<String> {
        print!("{} ", question);
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl ReviewDriver for TerminalDriver {
    fn consolidate(
        &mut self,
        proposals: &[ConsolidationProposal],
        learnings: &[Learning],
    ) -> Vec<ConsolidationChoice> {
        // Merged wording is a human call; unattended runs keep them apart
        if self.yes {
            return Vec::new();
        }

        let mut choices = Vec::new();
        for proposal in proposals {
            println!("\nThese look like the same thing ({}):", proposal.group_id);
            for &m in &proposal.members {
                println!("   · {}", learnings[m].actionable_text);
            }
            println!("   → {}", proposal.proposed_text);

            let choice = match self.prompt("[a]ccept, [k]eep separate, [e]dit?").as_deref() {
                Some("a") => ConsolidationChoice::Accept,
                Some("e") => match self.prompt("Merged text:") {
                    Some(text) if !text.is_empty() => ConsolidationChoice::Edit(text),
                    _ => ConsolidationChoice::KeepSeparate,
                },
                _ => ConsolidationChoice::KeepSeparate,
            };
            choices.push(choice);
        }
        choices
    }

    fn resolve(&mut self, learning: &Learning, hits: &[ExistingMatch]) -> Option<(usize, Resolution)> {
        // Left undecided, it stays queued
        if self.yes {
            return None;
        }

        println!("\n{}", learning.actionable_text);
        println!("   is close to what's already there:");
        print_hits(hits);

        let hit = if hits.len() > 1 {
            let answer = self.prompt("Which line (number)?")?;
            answer.parse::<usize>().ok()?.checked_sub(1).filter(|i| *i < hits.len())?
        } else {
            0
        };

        match self
            .prompt("[m]erge, [r]eplace, [a]dd anyway, [s]kip, Enter to decide later?")?
            .as_str()
        {
            "m" => {
                let text = self.prompt("Merged text:")?;
                (!text.is_empty()).then_some((hit, Resolution::Merge(text)))
            }
            "r" => Some((hit, Resolution::Replace)),
            "a" => Some((hit, Resolution::AddAnyway)),
            "s" => Some((hit, Resolution::Skip)),
            _ => None,
        }
    }

    fn show_summary(&mut self, summary: &Summary) {
        println!("\n{}", "=".repeat(60));
        if summary.is_empty() {
            println!("Nothing to review.");
            println!("{}", "=".repeat(60));
            return;
        }

        println!("Learnings ({}):", summary.items.len());
        for (position, item) in summary.items.iter().enumerate() {
            print_item(position, item);
        }

        if !summary.rejected.is_empty() {
            println!("\nNot learnings ({}), cleared with this review:", summary.rejected.len());
            for rejection in &summary.rejected {
                println!("   · {} ({})", rejection.raw_text, rejection.reason);
            }
        }
        if summary.undecided() > 0 {
            println!(
                "\n{} learning(s) overlap existing lines and need a decision.",
                summary.undecided()
            );
        }
        println!("{}", "=".repeat(60));
    }

    fn choose_strategy(&mut self, _summary: &Summary) -> Option<Strategy> {
        if self.yes {
            return Some(Strategy::ApplyAll);
        }

        loop {
            match self
                .prompt("\n[a]pply all, [s]elect, [r]eview details, s[k]ip all, [q]uit?")?
                .as_str()
            {
                "a" => return Some(Strategy::ApplyAll),
                "s" => return Some(Strategy::Select),
                "r" => return Some(Strategy::ReviewDetails),
                "k" => return Some(Strategy::SkipAll),
                "q" => return None,
                _ => continue,
            }
        }
    }

    fn show_details(&mut self, summary: &Summary) {
        for (position, item) in summary.items.iter().enumerate() {
            print_item(position, item);
            println!(
                "     from {} ({}), standing {:.0}%{}",
                item.source_project_path,
                item.source_type,
                item.standing * 100.0,
                item.group
                    .as_deref()
                    .map(|g| format!(", {}", g))
                    .unwrap_or_default()
            );
            if !item.existing.is_empty() {
                print_hits(&item.existing);
            }
        }
    }

    fn select(&mut self, summary: &Summary) -> Vec<usize> {
        let Some(answer) = self.prompt("Numbers to apply (e.g. 1,3):") else {
            return Vec::new();
        };
        answer
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(|n| n.trim().parse::<usize>().ok())
            .filter_map(|n| n.checked_sub(1))
            .filter_map(|position| summary.items.get(position).map(|item| item.index))
            .collect()
    }

    fn confirm(&mut self, summary: &Summary, selected: &[usize]) -> bool {
        if self.yes {
            return true;
        }

        let ready = summary
            .items
            .iter()
            .filter(|item| selected.contains(&item.index) && item.disposition.is_some())
            .count();
        matches!(
            self.prompt(&format!("Apply {} learning(s)? [y/N]", ready)).as_deref(),
            Some("y") | Some("yes")
        )
    }
}
