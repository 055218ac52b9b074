//! Pipeline orchestrator.
//!
//! Sequences the Collect, Analyze and Curate phases of a run through the
//! phase state machine, records every failure into the run's statistics and
//! decides per phase whether the run continues. Periodic runs additionally
//! cluster the window's embeddings, score trends and deliver a trend report.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{debug, error, info, warn, Instrument, Span};

use trendwire_core::config::TrendwireConfig;
use trendwire_core::types::{Embedding, Item, ItemStatus};
use trendwire_insight::cluster::VectorClusterer;
use trendwire_insight::dedup::Deduplicator;
use trendwire_insight::digest::{DigestBuilder, ReportWindow, TrendReportBuilder};
use trendwire_insight::error::InsightError;
use trendwire_insight::trend::TrendScorer;
use trendwire_storage::store::ItemStore;

use crate::collaborators::{AnalyzerOutput, Collector, ContentExtractor, DigestSink, SemanticAnalyzer};
use crate::curation::Curator;
use crate::error::{CollaboratorError, ErrorKind};
use crate::retry::{default_classify, execute, run_with_timeout, RetryPolicy};
use crate::state_machine::{self, PhaseMachine, PipelineState};
use crate::stats::{PipelineRunStats, RunKind};

/// External collaborators of a pipeline run.
#[derive(Clone)]
pub struct Collaborators {
    pub collector: Arc<dyn Collector>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub analyzer: Arc<dyn SemanticAnalyzer>,
    pub sink: Arc<dyn DigestSink>,
}

/// Result of analyzing one item, recorded into the run stats afterwards.
enum ItemOutcome {
    Analyzed,
    Failed { key: String, kind: ErrorKind, message: String },
}

/// Drives daily and periodic pipeline runs.
pub struct PipelineOrchestrator {
    store: Arc<dyn ItemStore>,
    collaborators: Collaborators,
    config: TrendwireConfig,
    retry: RetryPolicy,
    curator: Curator,
    clusterer: VectorClusterer,
    scorer: TrendScorer,
    span: Span,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn ItemStore>,
        collaborators: Collaborators,
        config: TrendwireConfig,
    ) -> Result<Self, InsightError> {
        let curator = Curator::new(config.curation.clone(), Deduplicator::new(&config.dedup)?);
        let clusterer = VectorClusterer::new(config.clustering.clone())?;
        let scorer = TrendScorer::new(config.trends.clone())?;
        Ok(Self {
            store,
            collaborators,
            retry: RetryPolicy::from(&config.retry),
            config,
            curator,
            clusterer,
            scorer,
            span: Span::none(),
        })
    }

    /// Attach the span every component of this orchestrator logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.curator = self.curator.with_span(span.clone());
        self.clusterer = self.clusterer.with_span(span.clone());
        self.scorer = self.scorer.with_span(span.clone());
        self.span = span;
        self
    }

    /// Collect, analyze and deliver a digest of the last
    /// `pipeline.daily_window_hours` before `now`.
    pub async fn run_daily(&self, now: DateTime<Utc>) -> PipelineRunStats {
        let since = now - chrono::Duration::hours(self.config.pipeline.daily_window_hours);
        let window = ReportWindow {
            period: now.format("%Y-%m-%d").to_string(),
            since,
            until: now,
        };
        self.run(RunKind::Daily, window).await
    }

    /// Collect and analyze, then deliver a trend report and a digest covering
    /// the `days` before `now`.
    pub async fn run_periodic(&self, now: DateTime<Utc>, days: i64) -> PipelineRunStats {
        let since = now - chrono::Duration::days(days.max(1));
        let window = ReportWindow {
            period: format!("{}_{}", since.format("%Y-%m-%d"), now.format("%Y-%m-%d")),
            since,
            until: now,
        };
        self.run(RunKind::Periodic, window).await
    }

    async fn run(&self, kind: RunKind, window: ReportWindow) -> PipelineRunStats {
        let mut stats = PipelineRunStats::new(kind);
        let mut machine = PhaseMachine::new();
        info!(
            parent: &self.span,
            run_id = %stats.run_id,
            kind = %kind,
            period = %window.period,
            "Pipeline run started"
        );

        let outcome = AssertUnwindSafe(self.run_phases(&mut stats, &mut machine, kind, &window))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            error!(parent: &self.span, phase = %machine.state(), %message, "Pipeline phase panicked");
            stats.record_error(machine.state(), ErrorKind::Unexpected, message, None);
            machine.fail();
        }

        stats.finish(machine.state());
        info!(
            parent: &self.span,
            run_id = %stats.run_id,
            state = %stats.state,
            collected = stats.collected,
            stored = stats.stored,
            analyzed = stats.analyzed,
            curated = stats.curated,
            errors = stats.errors.len(),
            "Pipeline run finished"
        );
        stats
    }

    async fn run_phases(
        &self,
        stats: &mut PipelineRunStats,
        machine: &mut PhaseMachine,
        kind: RunKind,
        window: &ReportWindow,
    ) {
        if !self.step(machine, stats, PipelineState::Collecting) {
            return;
        }
        let collector_ok = self.collect_phase(stats).await;
        let next = state_machine::after_collect(collector_ok, stats.stored);
        if next == PipelineState::Failed && collector_ok {
            warn!(parent: &self.span, collected = stats.collected, "No new items stored; skipping analysis");
        }
        if !self.step(machine, stats, next) {
            return;
        }

        let phase_fatal = !self.analyze_phase(stats).await;
        if !self.step(machine, stats, state_machine::after_analyze(phase_fatal)) {
            return;
        }

        let mut delivered = true;
        if kind == RunKind::Periodic {
            delivered &= self.trend_phase(stats, window).await;
        }
        delivered &= self.curate_phase(stats, window).await;
        self.step(machine, stats, state_machine::after_curate(delivered));
    }

    /// Advance the machine; returns whether the run is still live.
    fn step(
        &self,
        machine: &mut PhaseMachine,
        stats: &mut PipelineRunStats,
        to: PipelineState,
    ) -> bool {
        if let Err(e) = machine.advance(to) {
            stats.record_error(machine.state(), ErrorKind::Unexpected, e.to_string(), None);
            machine.fail();
            return false;
        }
        debug!(parent: &self.span, phase = %to, "Entered phase");
        !machine.state().is_terminal()
    }

    // ---- Collect ----

    /// Returns whether the collector succeeded.
    async fn collect_phase(&self, stats: &mut PipelineRunStats) -> bool {
        let phase = PipelineState::Collecting;
        let collector = &self.collaborators.collector;

        let raw = match execute(&self.retry, || collector.collect(), default_classify)
            .instrument(self.span.clone())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                error!(parent: &self.span, collector = collector.name(), error = %e, "Collection failed");
                stats.record_error(phase, ErrorKind::Collection, e.to_string(), None);
                return false;
            }
        };
        stats.collected = raw.len();

        let collected_at = Utc::now();
        for raw_item in raw {
            let item = Item::from_raw(raw_item, collected_at);
            if item.key.trim().is_empty() {
                stats.record_error(
                    phase,
                    ErrorKind::InvalidItem,
                    format!("Item without identity key: {}", item.title),
                    None,
                );
                continue;
            }
            match self.store.insert_if_absent(&item) {
                Ok(true) => stats.stored += 1,
                Ok(false) => debug!(parent: &self.span, key = %item.key, "Already stored"),
                Err(e) => {
                    stats.record_error(phase, ErrorKind::Storage, e.to_string(), Some(&item.key))
                }
            }
        }

        info!(
            parent: &self.span,
            collector = collector.name(),
            collected = stats.collected,
            stored = stats.stored,
            "Collect phase complete"
        );
        true
    }

    // ---- Analyze ----

    /// Returns `false` when the phase could not run at all.
    async fn analyze_phase(&self, stats: &mut PipelineRunStats) -> bool {
        let phase = PipelineState::Analyzing;
        let pending = match self
            .store
            .list_by_status(ItemStatus::Collected, self.config.pipeline.analyze_batch_limit)
        {
            Ok(items) => items,
            Err(e) => {
                error!(parent: &self.span, error = %e, "Could not load items to analyze");
                stats.record_error(phase, ErrorKind::Storage, e.to_string(), None);
                return false;
            }
        };

        let mut ready = Vec::with_capacity(pending.len());
        for item in pending {
            if let Some(item) = self.ensure_content(item, stats).await {
                ready.push(item);
            }
        }

        let concurrency = self.config.pipeline.analyze_concurrency.max(1);
        let limit = Duration::from_secs(self.config.pipeline.analyze_timeout_secs.max(1));
        let outcomes: Vec<ItemOutcome> = stream::iter(ready)
            .map(|item| self.analyze_item(item, limit))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ItemOutcome::Analyzed => stats.analyzed += 1,
                ItemOutcome::Failed { key, kind, message } => {
                    stats.record_error(phase, kind, message, Some(&key))
                }
            }
        }

        info!(
            parent: &self.span,
            analyzed = stats.analyzed,
            extraction_failed = stats.extraction_failed,
            concurrency,
            "Analyze phase complete"
        );
        true
    }

    /// Fetch content for items collected without it. Items whose extraction
    /// fails are marked `ExtractionFailed` and dropped from the phase.
    async fn ensure_content(&self, mut item: Item, stats: &mut PipelineRunStats) -> Option<Item> {
        if item.content.is_some() {
            return Some(item);
        }
        let phase = PipelineState::Analyzing;
        let extractor = &self.collaborators.extractor;

        let extracted = execute(&self.retry, || extractor.extract(&item.key), default_classify)
            .instrument(self.span.clone())
            .await
            .and_then(|content| {
                if content.trim().is_empty() {
                    Err(CollaboratorError::Other("extracted content is empty".to_string()))
                } else {
                    Ok(content)
                }
            });

        match extracted {
            Ok(content) => {
                if let Err(e) = self.store.update_content(&item.key, &content) {
                    stats.record_error(phase, ErrorKind::Storage, e.to_string(), Some(&item.key));
                    return None;
                }
                item.content = Some(content);
                Some(item)
            }
            Err(e) => {
                warn!(parent: &self.span, key = %item.key, error = %e, "Content extraction failed");
                stats.extraction_failed += 1;
                stats.record_error(phase, ErrorKind::Extraction, e.to_string(), Some(&item.key));
                if let Err(e) = self.store.update_status(&item.key, ItemStatus::ExtractionFailed) {
                    stats.record_error(phase, ErrorKind::Storage, e.to_string(), Some(&item.key));
                }
                None
            }
        }
    }

    async fn analyze_item(&self, item: Item, limit: Duration) -> ItemOutcome {
        let analyzer = &self.collaborators.analyzer;
        let result = execute(
            &self.retry,
            || {
                let analyzer = Arc::clone(analyzer);
                let item = item.clone();
                async move {
                    match run_with_timeout(limit, async move { analyzer.analyze(&item).await }).await
                    {
                        Ok(result) => result,
                        Err(timeout) => Err(CollaboratorError::from(timeout)),
                    }
                }
            },
            default_classify,
        )
        .instrument(self.span.clone())
        .await;

        let output: AnalyzerOutput = match result {
            Ok(output) => output,
            Err(e) => {
                warn!(parent: &self.span, key = %item.key, error = %e, "Analysis failed");
                return ItemOutcome::Failed {
                    key: item.key,
                    kind: ErrorKind::Analysis,
                    message: e.to_string(),
                };
            }
        };

        let embedding = output
            .embedding
            .filter(|v| !v.is_empty())
            .map(|v| Embedding::new(item.key.clone(), self.config.pipeline.embedding_model.clone(), v));

        match self
            .store
            .record_analysis(&item.key, &output.analysis, embedding.as_ref(), Utc::now())
        {
            Ok(()) => {
                debug!(parent: &self.span, key = %item.key, "Item analyzed");
                ItemOutcome::Analyzed
            }
            Err(e) => ItemOutcome::Failed {
                key: item.key,
                kind: ErrorKind::Storage,
                message: e.to_string(),
            },
        }
    }

    // ---- Curate ----

    /// Returns whether a digest was delivered.
    async fn curate_phase(&self, stats: &mut PipelineRunStats, window: &ReportWindow) -> bool {
        let phase = PipelineState::Curating;
        let candidates = match self.store.top_by_priority(
            ItemStatus::Analyzed,
            window.since,
            window.until,
            self.curator.candidate_pool(),
        ) {
            Ok(items) => items,
            Err(e) => {
                stats.record_error(phase, ErrorKind::Storage, e.to_string(), None);
                return false;
            }
        };

        let selected = self.curator.select(candidates);
        stats.curated = selected.len();
        if selected.is_empty() {
            warn!(parent: &self.span, period = %window.period, "No items to deliver");
            stats.record_error(
                phase,
                ErrorKind::Delivery,
                format!("No analyzed items to deliver for {}", window.period),
                None,
            );
            return false;
        }

        let digest = DigestBuilder::new().build(&window.period, &selected, Utc::now());
        let sink = &self.collaborators.sink;
        if let Err(e) = execute(&self.retry, || sink.deliver_digest(&digest), default_classify)
            .instrument(self.span.clone())
            .await
        {
            error!(parent: &self.span, error = %e, "Digest delivery failed");
            stats.record_error(phase, ErrorKind::Delivery, e.to_string(), None);
            return false;
        }
        stats.delivered = true;

        for item in &selected {
            if let Err(e) = self.store.update_status(&item.key, ItemStatus::Reported) {
                stats.record_error(phase, ErrorKind::Storage, e.to_string(), Some(&item.key));
            }
        }
        info!(parent: &self.span, period = %window.period, items = selected.len(), "Digest delivered");
        true
    }

    // ---- Trends (periodic) ----

    /// Returns whether the trend report was delivered.
    async fn trend_phase(&self, stats: &mut PipelineRunStats, window: &ReportWindow) -> bool {
        let phase = PipelineState::Curating;
        let model = &self.config.pipeline.embedding_model;

        let (items, vectors): (Vec<Item>, Vec<Vec<f32>>) =
            match self.store.embedded_items(model, window.since, window.until) {
                Ok(pairs) => pairs.into_iter().map(|(item, emb)| (item, emb.vector)).unzip(),
                Err(e) => {
                    stats.record_error(phase, ErrorKind::Storage, e.to_string(), None);
                    (Vec::new(), Vec::new())
                }
            };

        let clustering = self.clusterer.cluster(&vectors, &items);
        let hot_trends = match &clustering {
            Ok(result) => {
                stats.clustered = result.labels.iter().filter(|l| l.is_some()).count();
                self.scorer.identify_hot_trends(&result.clusters)
            }
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Clustering skipped");
                stats.record_error(phase, ErrorKind::Clustering, e.to_string(), None);
                Vec::new()
            }
        };

        let current = match self.reportable_items(window.since, window.until) {
            Ok(items) => items,
            Err(e) => {
                stats.record_error(phase, ErrorKind::Storage, e.to_string(), None);
                Vec::new()
            }
        };
        let span = window.until - window.since;
        let previous = self
            .reportable_items(
                window.since - span,
                window.since - chrono::Duration::milliseconds(1),
            )
            .unwrap_or_else(|e| {
                stats.record_error(phase, ErrorKind::Storage, e.to_string(), None);
                Vec::new()
            });
        let baseline = if previous.is_empty() {
            None
        } else {
            Some(previous.as_slice())
        };
        let emerging = self.scorer.detect_emerging_topics(&current, baseline);

        let report = TrendReportBuilder::new(self.config.clustering.representatives_per_cluster)
            .build(
                window.clone(),
                clustering.as_ref(),
                hot_trends,
                emerging,
                Utc::now(),
            );

        let sink = &self.collaborators.sink;
        match execute(&self.retry, || sink.deliver_trend_report(&report), default_classify)
            .instrument(self.span.clone())
            .await
        {
            Ok(()) => {
                stats.trend_report_delivered = true;
                info!(
                    parent: &self.span,
                    hot_trends = report.hot_trends.len(),
                    emerging = report.emerging.topics.len(),
                    clusters = report.clusters.len(),
                    "Trend report delivered"
                );
                true
            }
            Err(e) => {
                error!(parent: &self.span, error = %e, "Trend report delivery failed");
                stats.record_error(phase, ErrorKind::Delivery, e.to_string(), None);
                false
            }
        }
    }

    /// Analyzed or reported items published in `[since, until]`.
    fn reportable_items(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> trendwire_core::Result<Vec<Item>> {
        Ok(self
            .store
            .list_in_range(since, until)?
            .into_iter()
            .filter(|i| matches!(i.status, ItemStatus::Analyzed | ItemStatus::Reported))
            .collect())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: unknown payload".to_string()
    }
}
