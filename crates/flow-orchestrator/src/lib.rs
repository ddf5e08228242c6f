use chrono::{Local, NaiveDate, Timelike};
use flow_dashboard::{render_dashboard, SectorMap};
use gamma_exposure::{join_records, GammaExposureEngine};
use notification_service::NotificationService;
use options_core::{FlowError, Session, Snapshot, SurfaceRow};
use sentiment_delta::{ComparisonWindow, SentimentDelta, SentimentDeltaEngine};
use snapshot_store::SnapshotStore;
use std::path::PathBuf;
use std::time::Duration;
use volatility_skew::SkewEngine;
use yahoo_client::YahooClient;

pub mod universe;

/// Settings for one scheduled collection run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    /// Tickers per batch; batches are logged as progress units.
    pub batch_size: usize,
    /// Pause between consecutive fetches inside a batch.
    pub request_delay: Duration,
    pub tickers: Vec<String>,
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` supplies the process
    /// environment. Tests pass values directly instead of mutating
    /// process-global state.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let tickers = lookup("FLOW_TICKERS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(universe::active_tickers);

        Self {
            data_dir: lookup("OPTIONS_DATA_DIR")
                .unwrap_or_else(|| "options_data".to_string())
                .into(),
            batch_size: lookup("FLOW_BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            request_delay: Duration::from_secs(
                lookup("FLOW_REQUEST_DELAY_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
            tickers,
        }
    }
}

/// Outcome of a run, for logging and exit-status decisions.
#[derive(Debug)]
pub struct RunReport {
    pub trading_date: NaiveDate,
    pub session: Session,
    pub processed: usize,
    pub failed: Vec<String>,
    pub gamma_records: usize,
    pub skew_records: usize,
    pub comparison: Option<ComparisonWindow>,
}

/// Wires the collectors, engines, store, and notifier into the scheduled
/// morning/evening pipeline.
pub struct FlowOrchestrator {
    client: YahooClient,
    store: SnapshotStore,
    notifier: NotificationService,
    gamma_engine: GammaExposureEngine,
    skew_engine: SkewEngine,
    sentiment_engine: SentimentDeltaEngine,
    sectors: SectorMap,
    config: RunConfig,
}

impl FlowOrchestrator {
    pub fn new(config: RunConfig, notifier: NotificationService) -> Self {
        Self {
            client: YahooClient::new(),
            store: SnapshotStore::new(&config.data_dir),
            notifier,
            gamma_engine: GammaExposureEngine::new(),
            skew_engine: SkewEngine::new(),
            sentiment_engine: SentimentDeltaEngine::new(),
            sectors: SectorMap::builtin(),
            config,
        }
    }

    /// Execute one collection run for the current wall-clock session.
    pub async fn run(&self) -> Result<RunReport, FlowError> {
        let now = Local::now();
        let session = Session::from_hour(now.hour());
        let trading_date = now.date_naive();
        tracing::info!("Starting {} run for {}", session, trading_date);

        let (gamma_records, snapshot, failed) = self.collect(trading_date, session).await;

        if gamma_records.is_empty() {
            tracing::warn!("No gamma records produced this run");
        } else {
            let joined = join_records(&gamma_records);
            self.store
                .save_gamma_records(trading_date, session, &joined)?;
            self.notifier.send_gamma_feed(&gamma_records).await;
        }

        if snapshot.is_empty() {
            tracing::warn!("Empty surface snapshot, skipping skew and sentiment");
            return Ok(RunReport {
                trading_date,
                session,
                processed: self.config.tickers.len() - failed.len(),
                failed,
                gamma_records: gamma_records.len(),
                skew_records: 0,
                comparison: None,
            });
        }

        self.store.save_surface(&snapshot)?;

        let window = match session {
            Session::Morning => ComparisonWindow::Overnight,
            Session::Evening => ComparisonWindow::Daily,
        };
        let comparison = match self.run_comparison(window, &snapshot).await {
            Ok(ran) => ran.then_some(window),
            Err(e) => {
                tracing::warn!("Sentiment comparison failed: {}", e);
                None
            }
        };

        let skew_records = self.skew_engine.analyze(&snapshot);
        self.store.save_json(
            trading_date,
            session,
            "skew_analysis.json",
            &skew_records,
        )?;
        tracing::info!("Skew analysis produced {} records", skew_records.len());

        if !failed.is_empty() {
            tracing::warn!("Failed tickers: {}", failed.join(", "));
        }
        tracing::info!("Run completed for {} {}", trading_date, session);

        Ok(RunReport {
            trading_date,
            session,
            processed: self.config.tickers.len() - failed.len(),
            failed,
            gamma_records: gamma_records.len(),
            skew_records: skew_records.len(),
            comparison,
        })
    }

    /// Fetch every ticker in batches, producing gamma records and the
    /// flattened surface snapshot. A failed ticker is counted, never fatal.
    async fn collect(
        &self,
        trading_date: NaiveDate,
        session: Session,
    ) -> (Vec<String>, Snapshot, Vec<String>) {
        let mut gamma_records = Vec::new();
        let mut snapshot = Snapshot::new(trading_date, session);
        let mut failed = Vec::new();

        let total_batches =
            (self.config.tickers.len() + self.config.batch_size - 1) / self.config.batch_size;
        for (batch_index, batch) in self.config.tickers.chunks(self.config.batch_size).enumerate() {
            tracing::info!("Processing batch {}/{}", batch_index + 1, total_batches);
            for (i, symbol) in batch.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(self.config.request_delay).await;
                }
                match self.process_ticker(symbol, trading_date).await {
                    Ok((record, rows)) => {
                        if let Some(record) = record {
                            gamma_records.push(record);
                        }
                        snapshot.rows.extend(rows);
                        tracing::debug!("{} completed", symbol);
                    }
                    Err(e) => {
                        tracing::warn!("{} failed: {}", symbol, e);
                        failed.push(symbol.clone());
                    }
                }
            }
        }
        (gamma_records, snapshot, failed)
    }

    /// One ticker: liveness probe, chain fetch, gamma profile over the
    /// standard band, surface flattening.
    async fn process_ticker(
        &self,
        symbol: &str,
        trading_date: NaiveDate,
    ) -> Result<(Option<String>, Vec<SurfaceRow>), FlowError> {
        // The chart probe both validates the ticker still trades and
        // supplies a previous close when the chain quote omits one.
        let (_, chart_prev_close) = self.client.fetch_spot(symbol).await?;

        let mut chain = self.client.fetch_option_chain(symbol).await?;
        if chain.prev_close.is_none() {
            chain.prev_close = chart_prev_close;
        }

        let record = self
            .gamma_engine
            .profile(&chain, trading_date)
            .map(|p| p.tradingview_record());
        if record.is_none() {
            tracing::warn!("No gamma coverage in strike band for {}", symbol);
        }

        Ok((record, chain.surface_rows(trading_date)))
    }

    /// Compare against the previous evening snapshot, persist the artifacts,
    /// and notify. Returns whether a reference snapshot existed.
    async fn run_comparison(
        &self,
        window: ComparisonWindow,
        current: &Snapshot,
    ) -> Result<bool, FlowError> {
        let Some(reference) = self.store.previous_evening(current.trading_date)? else {
            tracing::info!(
                "No previous evening snapshot, skipping {} comparison",
                window.as_str()
            );
            return Ok(false);
        };

        tracing::info!("Analyzing {} changes", window.as_str());
        let delta: SentimentDelta = self
            .sentiment_engine
            .analyze(window, &reference, current);
        tracing::info!(
            "{} sentiment: {} contracts matched, volume weighted: {}",
            window.as_str(),
            delta.contracts.len(),
            delta.weighting.is_volume_weighted()
        );

        let title = match window {
            ComparisonWindow::Overnight => "OVERNIGHT SENTIMENT DASHBOARD",
            ComparisonWindow::Daily => "DAILY SENTIMENT DASHBOARD",
        };
        let dashboard = render_dashboard(title, &delta.summary, &self.sectors);

        let date = current.trading_date;
        let session = current.session;
        self.store.save_text(
            date,
            session,
            &format!("{}_dashboard.txt", window.as_str()),
            &dashboard,
        )?;
        self.store.save_json(
            date,
            session,
            &format!("{}_analysis.json", window.as_str()),
            &delta.contracts,
        )?;
        self.store.save_json(
            date,
            session,
            &format!("{}_sentiment_summary.json", window.as_str()),
            &delta.summary,
        )?;

        self.notifier.send_sentiment(window, &delta.summary).await;
        Ok(true)
    }
}
