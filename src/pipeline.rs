use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::compact::{CompactionStats, TableCompactor};
use crate::settings::Settings;
use crate::error::Result;
use crate::fetcher::{listing_url, PageFetcher, RawPage};
use crate::parser;
use crate::records::RepositoryRecord;
use crate::staging::StagingWriter;

/// Worker pool for the per-page map. Built once by the caller and dropped at exit.
pub struct ExecutionContext {
    pool: rayon::ThreadPool,
}

impl ExecutionContext {
    /// `workers == 0` lets rayon pick the thread count.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("etl-worker-{}", i))
            .build()?;
        Ok(ExecutionContext { pool })
    }

    /// Map `f` over `items` in parallel; results keep input order.
    pub fn map_indexed<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync + Send,
    {
        self.pool
            .install(|| items.par_iter().enumerate().map(|(i, t)| f(i, t)).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Parsing,
    Staging,
    Compacting,
    Done,
    FetchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// At least one listing fetch returned non-200; nothing new was staged.
    FetchFailed { compacted: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFetch {
    pub url: String,
    pub status: u16,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Every stage entered, in order.
    pub stages: Vec<Stage>,
    pub failed: Vec<FailedFetch>,
    pub staged_batches: usize,
    pub staged_records: usize,
    pub compaction: Option<CompactionStats>,
}

/// Fetch → parse → stage → compact, once per invocation.
pub struct PipelineDriver<F> {
    fetcher: F,
    settings: Settings,
}

impl<F: PageFetcher> PipelineDriver<F> {
    pub fn new(fetcher: F, settings: Settings) -> Self {
        PipelineDriver { fetcher, settings }
    }

    pub async fn run(&self, exec: &ExecutionContext) -> Result<RunReport> {
        let mut report = RunReport {
            outcome: RunOutcome::Completed,
            stages: Vec::new(),
            failed: Vec::new(),
            staged_batches: 0,
            staged_records: 0,
            compaction: None,
        };

        enter(&mut report, Stage::Fetching);
        let mut pages = Vec::with_capacity(self.settings.org_urls.len());
        for org_url in &self.settings.org_urls {
            let page = self.fetcher.fetch(&listing_url(org_url)).await?;
            if page.is_ok() {
                pages.push(page);
            } else {
                println!(
                    "Failed to fetch repository data from {}. Status code: {}",
                    page.source_url, page.status
                );
                report.failed.push(FailedFetch {
                    url: page.source_url,
                    status: page.status,
                });
            }
        }

        if !report.failed.is_empty() {
            enter(&mut report, Stage::FetchFailed);
            let compacted = self.settings.compact_on_fetch_failure;
            report.outcome = RunOutcome::FetchFailed { compacted };
            if !compacted {
                warn!("Leaving {} untouched", self.settings.table_path.display());
                return Ok(report);
            }
            warn!("Compacting existing staging data despite fetch failure");
        } else {
            enter(&mut report, Stage::Parsing);
            let parsed: Vec<_> = self
                .parse_pages(exec, &pages)?
                .into_iter()
                .filter(|records| !records.is_empty())
                .collect();

            enter(&mut report, Stage::Staging);
            report.staged_records = self.stage_batches(exec, &parsed)?;
            report.staged_batches = parsed.len();
        }

        enter(&mut report, Stage::Compacting);
        let compactor = TableCompactor::new(
            &self.settings.staging_dir,
            self.settings.staging_pattern.as_str(),
        );
        report.compaction = Some(compactor.compact(&self.settings.table_path)?);

        enter(&mut report, Stage::Done);
        Ok(report)
    }

    fn parse_pages(
        &self,
        exec: &ExecutionContext,
        pages: &[RawPage],
    ) -> Result<Vec<Vec<RepositoryRecord>>> {
        let origin = self.settings.site_origin.as_str();
        exec.map_indexed(pages, |_, page| parser::process_page(page, origin))
            .into_iter()
            .collect()
    }

    /// Writes batch `i` for the `i`th non-empty page; returns the number of records staged.
    fn stage_batches(
        &self,
        exec: &ExecutionContext,
        parsed: &[Vec<RepositoryRecord>],
    ) -> Result<usize> {
        let writer = StagingWriter::new(&self.settings.staging_dir);
        let pb = progress_bar(parsed.len());

        let written = exec
            .map_indexed(parsed, |i, records| {
                let res = writer.write(i, records).map(|_| records.len());
                pb.inc(1);
                res
            })
            .into_iter()
            .collect::<Result<Vec<_>>>();

        pb.finish_and_clear();
        let written = written?;
        info!(
            "Staged {} batches under {}",
            written.len(),
            writer.dir().display()
        );
        Ok(written.iter().sum())
    }
}

fn enter(report: &mut RunReport, stage: Stage) {
    info!(?stage, "Pipeline stage");
    report.stages.push(stage);
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}
